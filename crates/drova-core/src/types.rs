//! Session directory domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use uuid::Uuid;

/// Product id of the generic desktop environment
pub const DESKTOP_PRODUCT_ID: Uuid = Uuid::from_u128(0x9fd0eb43_b2bb_4ce3_93b8_9df63f209098);

/// Identity of the rented server as registered with the marketplace
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServerIdentity(pub String);

impl ServerIdentity {
    /// Create a new server identity
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the raw ID string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Auth token used against the session directory.
///
/// `Debug` is redacted so tokens never end up in logs.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthToken(String);

impl AuthToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Raw token, for the `X-Auth-Token` header
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AuthToken(***)")
    }
}

/// Rental session status as reported by the directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    New,
    Handshake,
    Active,
    Aborted,
    Finished,
}

impl SessionStatus {
    /// Session has been requested but the renter is not in yet
    pub fn is_starting(self) -> bool {
        matches!(self, SessionStatus::New | SessionStatus::Handshake)
    }

    /// Session is starting or in progress
    pub fn is_live(self) -> bool {
        self.is_starting() || self == SessionStatus::Active
    }

    /// Session is over
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionStatus::Aborted | SessionStatus::Finished)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::New => "NEW",
            SessionStatus::Handshake => "HANDSHAKE",
            SessionStatus::Active => "ACTIVE",
            SessionStatus::Aborted => "ABORTED",
            SessionStatus::Finished => "FINISHED",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of one rental session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub uuid: Uuid,
    pub product_id: Uuid,
    pub client_id: Uuid,
    #[serde(deserialize_with = "timestamp::deserialize")]
    pub created_on: DateTime<Utc>,
    #[serde(default, deserialize_with = "timestamp::deserialize_option")]
    pub finished_on: Option<DateTime<Utc>>,
    pub status: SessionStatus,
    pub creator_ip: IpAddr,
    #[serde(default)]
    pub abort_comment: Option<String>,
    #[serde(default)]
    pub score: Option<i64>,
    #[serde(default)]
    pub score_reason: Option<i64>,
    #[serde(default)]
    pub score_text: Option<String>,
    #[serde(default)]
    pub billing_type: Option<String>,
}

/// Body of the session listing endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionsResponse {
    pub sessions: Vec<SessionRecord>,
}

/// Product metadata; only the fields this system reads are kept
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductInfo {
    pub product_id: Uuid,
    pub use_default_desktop: bool,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub game_path: Option<String>,
    #[serde(default)]
    pub work_path: Option<String>,
    #[serde(default)]
    pub args: Option<String>,
}

/// Timestamps arrive either as RFC 3339 text (with or without offset)
/// or as epoch milliseconds.
mod timestamp {
    use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
    use serde::de::Error;
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Millis(i64),
        Text(String),
    }

    fn convert<E: Error>(raw: Raw) -> Result<DateTime<Utc>, E> {
        match raw {
            Raw::Millis(ms) => Utc
                .timestamp_millis_opt(ms)
                .single()
                .ok_or_else(|| E::custom(format!("timestamp out of range: {}", ms))),
            Raw::Text(text) => {
                if let Ok(dt) = DateTime::parse_from_rfc3339(&text) {
                    return Ok(dt.with_timezone(&Utc));
                }
                NaiveDateTime::parse_from_str(&text, "%Y-%m-%dT%H:%M:%S%.f")
                    .map(|naive| naive.and_utc())
                    .map_err(E::custom)
            }
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        convert(Raw::deserialize(deserializer)?)
    }

    pub fn deserialize_option<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<Raw>::deserialize(deserializer)?
            .map(convert)
            .transpose()
    }
}
