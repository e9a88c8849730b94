//! Typed entities of the learnmap platform and their record mapping.

use crate::{
    error::{AuthzError, Result},
    models::{Identity, Record},
};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Collection names and fixed ids
pub mod collections {
    pub const USERS: &str = "users";
    pub const USERS_ID: &str = "_pb_users_auth_";
    pub const GROUPS: &str = "groups";
    pub const LEARNING_MAPS: &str = "learningmaps";
    pub const ASSIGNMENTS: &str = "assignments";
    pub const PROGRESS: &str = "progress";
}

/// Format of a student login code
pub const STUDENT_CODE_PATTERN: &str = r"^[A-Z0-9]{6}$";

lazy_static! {
    static ref STUDENT_CODE_REGEX: Regex = Regex::new(STUDENT_CODE_PATTERN).unwrap();
}

/// Six-character student login code
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StudentCode(String);

impl StudentCode {
    /// # Errors
    ///
    /// Returns [`AuthzError::Validation`] unless `code` is six upper-case
    /// letters or digits.
    pub fn parse(code: &str) -> Result<Self> {
        if STUDENT_CODE_REGEX.is_match(code) {
            Ok(Self(code.to_string()))
        } else {
            Err(AuthzError::Validation(format!(
                "Student code must match {STUDENT_CODE_PATTERN}"
            )))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for StudentCode {
    type Error = AuthzError;

    fn try_from(code: String) -> Result<Self> {
        Self::parse(&code)
    }
}

impl From<StudentCode> for String {
    fn from(code: StudentCode) -> Self {
        code.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Teacher,
    Student,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Teacher => "teacher",
            Role::Student => "student",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = AuthzError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "teacher" => Ok(Role::Teacher),
            "student" => Ok(Role::Student),
            other => Err(AuthzError::Validation(format!("Unknown role: {other}"))),
        }
    }
}

/// Credentials of a user, keyed by role
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserAccount {
    Teacher {
        email: String,
        /// Stored hash, never the plain password
        password_hash: Option<String>,
    },
    Student {
        code: StudentCode,
    },
}

impl UserAccount {
    pub fn role(&self) -> Role {
        match self {
            UserAccount::Teacher { .. } => Role::Teacher,
            UserAccount::Student { .. } => Role::Student,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "UserRow", into = "UserRow")]
pub struct User {
    pub id: String,
    pub display_name: String,
    pub account: UserAccount,
}

/// Flat persisted layout of a user
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRow {
    id: String,
    role: Role,
    display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    code: Option<StudentCode>,
}

impl TryFrom<UserRow> for User {
    type Error = AuthzError;

    fn try_from(row: UserRow) -> Result<Self> {
        let account = match row.role {
            Role::Teacher => UserAccount::Teacher {
                email: row.email.filter(|e| !e.is_empty()).ok_or_else(|| {
                    AuthzError::Validation(format!("Teacher '{}' has no email", row.id))
                })?,
                password_hash: row.password,
            },
            Role::Student => UserAccount::Student {
                code: row.code.ok_or_else(|| {
                    AuthzError::Validation(format!("Student '{}' has no login code", row.id))
                })?,
            },
        };
        Ok(User {
            id: row.id,
            display_name: row.display_name,
            account,
        })
    }
}

impl From<User> for UserRow {
    fn from(user: User) -> Self {
        let role = user.role();
        let (email, password, code) = match user.account {
            UserAccount::Teacher {
                email,
                password_hash,
            } => (Some(email), password_hash, None),
            UserAccount::Student { code } => (None, None, Some(code)),
        };
        UserRow {
            id: user.id,
            role,
            display_name: user.display_name,
            email,
            password,
            code,
        }
    }
}

impl User {
    pub fn teacher(id: &str, display_name: &str, email: &str) -> Self {
        Self {
            id: id.to_string(),
            display_name: display_name.to_string(),
            account: UserAccount::Teacher {
                email: email.to_string(),
                password_hash: None,
            },
        }
    }

    pub fn student(id: &str, display_name: &str, code: StudentCode) -> Self {
        Self {
            id: id.to_string(),
            display_name: display_name.to_string(),
            account: UserAccount::Student { code },
        }
    }

    pub fn role(&self) -> Role {
        self.account.role()
    }

    pub fn identity(&self) -> Identity {
        Identity::from(self)
    }
}

impl From<&User> for Identity {
    fn from(user: &User) -> Self {
        Identity::new(&user.id).with_role(user.role().as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearningMap {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    /// Opaque roadmap definition
    pub roadmap_data: Value,
    pub teacher: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub teacher: String,
    #[serde(default)]
    pub students: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub group: String,
    pub learningmap: String,
    pub teacher: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub student: String,
    pub assignment: String,
    /// Opaque per-student roadmap state
    pub roadmap_state: Value,
}

/// A typed entity stored in a fixed collection
pub trait Entity: Serialize + DeserializeOwned {
    const COLLECTION: &'static str;

    /// # Errors
    ///
    /// Returns [`AuthzError::Validation`] if the entity does not map to a record.
    fn to_record(&self) -> Result<Record> {
        let value = serde_json::to_value(self).map_err(|e| AuthzError::Validation(e.to_string()))?;
        serde_json::from_value(value).map_err(|e| AuthzError::Validation(e.to_string()))
    }

    /// # Errors
    ///
    /// Returns [`AuthzError::Validation`] when the record does not have the
    /// entity's shape.
    fn from_record(record: &Record) -> Result<Self> {
        let value = serde_json::to_value(record).map_err(|e| AuthzError::Validation(e.to_string()))?;
        serde_json::from_value(value).map_err(|e| {
            AuthzError::Validation(format!("Not a valid {} record: {}", Self::COLLECTION, e))
        })
    }
}

impl Entity for User {
    const COLLECTION: &'static str = collections::USERS;
}

impl Entity for LearningMap {
    const COLLECTION: &'static str = collections::LEARNING_MAPS;
}

impl Entity for Group {
    const COLLECTION: &'static str = collections::GROUPS;
}

impl Entity for Assignment {
    const COLLECTION: &'static str = collections::ASSIGNMENTS;
}

impl Entity for Progress {
    const COLLECTION: &'static str = collections::PROGRESS;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_student_code_format() {
        assert!(StudentCode::parse("AB12CD").is_ok());
        assert!(StudentCode::parse("ab12cd").is_err());
        assert!(StudentCode::parse("AB12C").is_err());
        assert!(StudentCode::parse("AB12CDE").is_err());
        assert!(serde_json::from_value::<StudentCode>(json!("AB-2CD")).is_err());
    }

    #[test]
    fn test_user_record_layout() {
        let student = User::student("s1", "Quiet Otter", StudentCode::parse("QW12ER").unwrap());
        let record = student.to_record().unwrap();

        assert_eq!(record.id(), Some("s1"));
        assert_eq!(record.get_str("role"), Some("student"));
        assert_eq!(record.get_str("displayName"), Some("Quiet Otter"));
        assert_eq!(record.get_str("code"), Some("QW12ER"));
        assert!(record.get("email").is_none());

        assert_eq!(User::from_record(&record).unwrap(), student);
    }

    #[test]
    fn test_user_variant_follows_role() {
        let teacher = Record::new("u1")
            .with_field("role", "teacher")
            .with_field("displayName", "Ms Rivera");
        let err = User::from_record(&teacher).unwrap_err();
        assert!(err.to_string().contains("no email"));

        let teacher = teacher.with_field("email", "rivera@school.example");
        let user = User::from_record(&teacher).unwrap();
        assert_eq!(user.role(), Role::Teacher);
        assert_eq!(user.identity(), Identity::teacher("u1"));

        let student = Record::new("s1")
            .with_field("role", "student")
            .with_field("displayName", "Quiet Otter");
        assert!(User::from_record(&student).is_err());
    }

    #[test]
    fn test_assignment_and_progress_records() {
        let assignment = Assignment {
            id: None,
            group: "g1".to_string(),
            learningmap: "m1".to_string(),
            teacher: "u1".to_string(),
        };
        let record = assignment.to_record().unwrap();
        assert_eq!(record.id(), None);
        assert_eq!(record.get_str("learningmap"), Some("m1"));

        let progress = Progress {
            id: Some("p1".to_string()),
            student: "s1".to_string(),
            assignment: "a1".to_string(),
            roadmap_state: json!({ "nodes": { "intro": "done" } }),
        };
        let record = progress.to_record().unwrap();
        assert_eq!(record.get("roadmapState"), Some(&json!({ "nodes": { "intro": "done" } })));
        assert_eq!(Progress::from_record(&record).unwrap(), progress);
    }

    #[test]
    fn test_role_parsing() {
        assert_eq!("teacher".parse::<Role>().unwrap(), Role::Teacher);
        assert!("admin".parse::<Role>().is_err());
    }
}
