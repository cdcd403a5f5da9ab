use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::store::Fields;

/// Collection holding one profile document per provider subject id.
pub const USERS_COLLECTION: &str = "users";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Student,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Durable application record about a user, keyed by the provider-issued
/// subject id.
///
/// `id`, `email`, `role` and `created_at` are write-once; `display_name`
/// and `photo_url` refresh from the provider on sign-in when it supplies a
/// value; `last_login` advances on every successful sign-in. The
/// application does not enforce email verification, so `email_verified` is
/// always written `true`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: String,
    pub email: String,
    pub display_name: String,
    pub role: Role,
    #[serde(rename = "photoURL", skip_serializing_if = "Option::is_none", default)]
    pub photo_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_login: DateTime<Utc>,
    pub email_verified: bool,
}

impl Profile {
    /// Serializes the profile to the stored document shape.
    pub fn to_fields(&self) -> Fields {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Fields::new(),
        }
    }

    /// Rebuilds a profile from a stored document.
    pub fn from_fields(fields: Fields) -> serde_json::Result<Self> {
        serde_json::from_value(Value::Object(fields))
    }
}

pub(crate) fn timestamp_value(time: &DateTime<Utc>) -> Value {
    Value::String(time.to_rfc3339())
}
