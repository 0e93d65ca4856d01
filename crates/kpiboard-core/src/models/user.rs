use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Label shown in place of a name when no user is loaded.
pub const PROFILE_PLACEHOLDER: &str = "Профиль";

/// Access role of a user inside their company.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Head,
    Supervisor,
    Admin,
    /// A role this client does not know about yet
    #[serde(untagged)]
    Other(String),
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Head => write!(f, "head"),
            Role::Supervisor => write!(f, "supervisor"),
            Role::Admin => write!(f, "admin"),
            Role::Other(role) => write!(f, "{}", role),
        }
    }
}

/// The current user as returned by `GET /auth/me`.
///
/// Every field is optional: the client only needs the name fields for
/// display, and a backend schema change must not break session restore.
/// Typed fields whose value does not parse read as `None`. Fields this
/// client does not model are kept in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct User {
    #[serde(default, deserialize_with = "deserialize_lenient")]
    pub id: Option<i64>,
    #[serde(default, deserialize_with = "deserialize_lenient")]
    pub login: Option<String>,
    #[serde(default, deserialize_with = "deserialize_lenient")]
    pub first_name: Option<String>,
    #[serde(default, deserialize_with = "deserialize_lenient")]
    pub last_name: Option<String>,
    #[serde(default, deserialize_with = "deserialize_date")]
    #[cfg_attr(feature = "ts", ts(type = "string | null"))]
    pub date_of_birth: Option<NaiveDate>,
    #[serde(default, deserialize_with = "deserialize_lenient")]
    pub salary: Option<i64>,
    #[serde(default, deserialize_with = "deserialize_lenient")]
    pub position_id: Option<i64>,
    #[serde(default, deserialize_with = "deserialize_lenient")]
    pub role: Option<Role>,
    #[serde(default, deserialize_with = "deserialize_timestamp")]
    #[cfg_attr(feature = "ts", ts(type = "string | null"))]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "deserialize_timestamp")]
    #[cfg_attr(feature = "ts", ts(type = "string | null"))]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    #[cfg_attr(feature = "ts", ts(skip))]
    pub extra: HashMap<String, serde_json::Value>,
}

impl User {
    /// Short name for the header: last-name initial then first name,
    /// e.g. "Т. Анна".
    pub fn display_name(&self) -> String {
        let first = self.first_name.as_deref().unwrap_or_default();
        match self.last_name.as_deref().and_then(|l| l.chars().next()) {
            Some(initial) => format!("{}. {}", initial, first).trim_end().to_string(),
            None if !first.is_empty() => first.to_string(),
            None => PROFILE_PLACEHOLDER.to_string(),
        }
    }

    pub fn full_name(&self) -> String {
        let parts: Vec<&str> = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .filter(|s| !s.is_empty())
            .collect();
        parts.join(" ")
    }
}

// Helper to deserialize any value as `Option<T>`, reading a mismatched
// type as None
fn deserialize_lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| serde_json::from_value(v).ok()))
}

// Timestamps arrive as RFC 3339, as naive date-times (taken as UTC) or as
// bare dates (midnight UTC)
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = raw.parse::<NaiveDateTime>() {
        return Some(naive.and_utc());
    }
    raw.parse::<NaiveDate>()
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    raw.trim()
        .parse::<NaiveDate>()
        .ok()
        .or_else(|| parse_timestamp(raw).map(|dt| dt.date_naive()))
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(Value::as_str).and_then(parse_timestamp))
}

fn deserialize_date<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(Value::as_str).and_then(parse_date))
}

/// Display name for an optional user, falling back to the profile label.
pub fn display_name_or_placeholder(user: Option<&User>) -> String {
    user.map(User::display_name)
        .unwrap_or_else(|| PROFILE_PLACEHOLDER.to_string())
}
