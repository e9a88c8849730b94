// Error codes implementation
// This module contains standardized error codes for the Learnmap engine

pub mod rule {
    pub const PARSE_ERROR: &str = "RULE_1001";
    pub const EMPTY_RULE: &str = "RULE_1002";
}

pub mod schema {
    pub const CONFIG_ERROR: &str = "SCHEMA_2001";
    pub const INVALID_SCHEMA: &str = "SCHEMA_2002";
    pub const VALIDATION_FAILED: &str = "SCHEMA_2003";
}

pub mod not_found {
    pub const COLLECTION_NOT_FOUND: &str = "NOTFOUND_3001";
    pub const RECORD_NOT_FOUND: &str = "NOTFOUND_3002";
}

pub mod authorization {
    pub const LOOKUP_TIMEOUT: &str = "AUTHZ_4002";
    pub const STORAGE_FAILURE: &str = "AUTHZ_4003";
}

pub mod migration {
    pub const STEP_FAILED: &str = "MIGRATION_5001";
    pub const DUPLICATE_VERSION: &str = "MIGRATION_5002";
    pub const STATE_STORE_FAILED: &str = "MIGRATION_5003";
    pub const INCONSISTENT_STATE: &str = "MIGRATION_5004";
}

pub mod config {
    pub const LOAD_FAILED: &str = "CONFIG_6001";
    pub const VALIDATION_FAILED: &str = "CONFIG_6002";
}

pub const INTERNAL: &str = "INTERNAL_9001";
