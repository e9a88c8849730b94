use auth_rules::OperationKind;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "learnmap")]
#[command(version)]
#[command(about = "Operate the Learnmap authorization engine: migrations, schema and rule checks")]
#[command(long_about = None)]
pub struct Cli {
    /// YAML configuration file
    #[arg(long, short, global = true, env = "LEARNMAP_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log at debug level and print decision traces
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Apply, revert or inspect schema migrations
    Migrate {
        #[command(subcommand)]
        action: MigrateAction,
    },

    /// Inspect the installed schema
    Schema {
        #[command(subcommand)]
        action: SchemaAction,
    },

    /// Work with rule text
    Rule {
        #[command(subcommand)]
        action: RuleAction,
    },

    /// Decide one request against the installed schema
    Authorize {
        #[arg(long)]
        collection: String,

        /// list, view, create, update or delete
        #[arg(long, value_parser = parse_operation)]
        op: OperationKind,

        /// Authenticated user id; anonymous when omitted
        #[arg(long)]
        identity: Option<String>,

        #[arg(long, requires = "identity")]
        role: Option<String>,

        /// JSON file holding the target record (or candidate)
        #[arg(long)]
        record: PathBuf,

        /// JSON dataset `{ "<collection>": [records] }` for relation lookups
        #[arg(long)]
        data: Option<PathBuf>,
    },
}

#[derive(Subcommand, Debug)]
pub enum MigrateAction {
    /// Apply pending migrations
    Up {
        /// Stop after this version
        #[arg(long)]
        to: Option<u64>,
    },

    /// Revert the most recent migrations
    Down {
        #[arg(long, default_value_t = 1)]
        steps: usize,
    },

    /// Show applied and pending migrations
    Status,
}

#[derive(Subcommand, Debug)]
pub enum SchemaAction {
    /// Dump collection definitions as YAML
    Show {
        /// Collection name or id; all collections when omitted
        collection: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
pub enum RuleAction {
    /// Parse and resolve a rule, printing its normalised form
    Compile {
        #[arg(long)]
        collection: String,

        #[arg(long, value_parser = parse_operation)]
        op: OperationKind,

        rule: String,
    },
}

fn parse_operation(value: &str) -> Result<OperationKind, String> {
    value.parse().map_err(|e: auth_rules::AuthzError| e.to_string())
}
