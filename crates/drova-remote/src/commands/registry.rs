//! Registry commands and the agent credential parser

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;

use drova_core::error::TokenError;
use drova_core::types::{AuthToken, ServerIdentity};

use super::quote;

/// Registry key where the marketplace agent keeps per-server credentials
pub const ESME_SERVERS_KEY: &str = r"HKEY_LOCAL_MACHINE\SOFTWARE\ITKey\Esme\servers";

/// Recursive query for the agent's `auth_token` value
#[derive(Debug, Clone, Copy, Default)]
pub struct RegQueryEsme;

impl fmt::Display for RegQueryEsme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "reg query {} /s /f auth_token", ESME_SERVERS_KEY)
    }
}

impl RegQueryEsme {
    /// Extract `(server identity, auth token)` from the query's stdout.
    ///
    /// Exactly one `auth_token` value must be present, and a
    /// `servers\<id>` key path must name the server.
    pub fn parse_auth_token(stdout: &str) -> Result<(ServerIdentity, AuthToken), TokenError> {
        static AUTH_TOKEN: OnceLock<Regex> = OnceLock::new();
        static SERVER_ID: OnceLock<Regex> = OnceLock::new();

        let auth_token = AUTH_TOKEN.get_or_init(|| {
            Regex::new(r"auth_token\s+REG_SZ\s+(?P<auth_token>\S+)").expect("valid regex")
        });
        let server_id = SERVER_ID
            .get_or_init(|| Regex::new(r"servers\\(?P<server_id>\S+)").expect("valid regex"));

        let mut tokens = auth_token.captures_iter(stdout);
        let token = tokens.next().ok_or(TokenError::AuthTokenMissing)?;
        if tokens.next().is_some() {
            return Err(TokenError::AuthTokenDuplicate);
        }

        let server = server_id
            .captures(stdout)
            .ok_or(TokenError::AuthTokenMissing)?;

        Ok((
            ServerIdentity::new(&server["server_id"]),
            AuthToken::new(&token["auth_token"]),
        ))
    }
}

/// Registry value types accepted by `reg add /t`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegValueType {
    Sz,
    ExpandSz,
    MultiSz,
    Dword,
    Qword,
    Binary,
}

impl RegValueType {
    pub fn as_str(self) -> &'static str {
        match self {
            RegValueType::Sz => "REG_SZ",
            RegValueType::ExpandSz => "REG_EXPAND_SZ",
            RegValueType::MultiSz => "REG_MULTI_SZ",
            RegValueType::Dword => "REG_DWORD",
            RegValueType::Qword => "REG_QWORD",
            RegValueType::Binary => "REG_BINARY",
        }
    }
}

impl fmt::Display for RegValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One named value under a registry key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegValue {
    pub key: String,
    pub name: String,
    pub kind: RegValueType,
    pub data: String,
}

impl RegValue {
    pub fn dword(key: impl Into<String>, name: impl Into<String>, data: u32) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
            kind: RegValueType::Dword,
            data: data.to_string(),
        }
    }

    pub fn string(key: impl Into<String>, name: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
            kind: RegValueType::Sz,
            data: data.into(),
        }
    }
}

/// `reg add`, creating a key or overwriting one value
#[derive(Debug, Clone)]
pub enum RegAdd<'a> {
    Key(&'a str),
    Value(&'a RegValue),
}

impl fmt::Display for RegAdd<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegAdd::Key(key) => write!(f, "reg add {} /f", quote(key)),
            RegAdd::Value(value) => write!(
                f,
                "reg add {} /f /v {} /t {} /d {}",
                quote(&value.key),
                quote(&value.name),
                value.kind,
                quote(&value.data)
            ),
        }
    }
}
