//! Shared fakes for the orchestrator integration tests

#![allow(dead_code)]

use std::collections::VecDeque;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use drova_core::config::{DrovaConfig, PollConfig, ProvisionConfig};
use drova_core::error::{DirectoryError, RemoteError};
use drova_core::traits::{CommandOutput, RemoteShell, SessionDirectory};
use drova_core::types::{
    AuthToken, ProductInfo, ServerIdentity, SessionRecord, SessionStatus, DESKTOP_PRODUCT_ID,
};

pub fn desktop_session(status: SessionStatus) -> SessionRecord {
    serde_json::from_value(serde_json::json!({
        "uuid": Uuid::new_v4(),
        "product_id": DESKTOP_PRODUCT_ID,
        "client_id": Uuid::new_v4(),
        "created_on": "2024-03-01T18:00:00Z",
        "status": status,
        "creator_ip": IpAddr::V4(Ipv4Addr::new(203, 0, 113, 7)),
    }))
    .unwrap()
}

/// Config with short delays, pointing at nothing in particular
pub fn fast_config() -> DrovaConfig {
    let mut config = DrovaConfig::default();
    config.remote.host = "127.0.0.1".into();
    config.remote.username = "gamer".into();
    config.remote.password = Some("pw".into());
    config.shadow_defender.password = "sd".into();
    config.shadow_defender.drives = "C".into();
    config.poll = PollConfig {
        interval: Duration::from_millis(20),
        token_ttl: Duration::from_secs(60),
    };
    config.provision = ProvisionConfig {
        freeze_settle: Duration::from_millis(5),
        kill_settle: Duration::from_millis(1),
        policy_settle: Duration::from_millis(5),
        revert_delay: Duration::from_millis(5),
    };
    config
}

/// Remote shell that records commands and answers the credential query
#[derive(Default)]
pub struct RecordingShell {
    commands: Mutex<Vec<String>>,
    closed: Mutex<usize>,
}

impl RecordingShell {
    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }

    pub fn position(&self, pattern: &str) -> Option<usize> {
        self.commands().iter().position(|c| c.contains(pattern))
    }

    pub fn closed(&self) -> usize {
        *self.closed.lock().unwrap()
    }
}

#[async_trait]
impl RemoteShell for RecordingShell {
    async fn run(&self, command: &str) -> Result<CommandOutput, RemoteError> {
        self.commands.lock().unwrap().push(command.to_string());
        if command.starts_with("reg query") {
            return Ok(CommandOutput::ok(
                "HKEY_LOCAL_MACHINE\\SOFTWARE\\ITKey\\Esme\\servers\\S1\r\n    auth_token    REG_SZ    T1\r\n",
            ));
        }
        Ok(CommandOutput::ok(Vec::new()))
    }

    async fn read_file(&self, path: &str) -> Result<Vec<u8>, RemoteError> {
        Err(RemoteError::File {
            path: path.to_string(),
            message: "no such file".into(),
        })
    }

    async fn write_file(&self, _path: &str, _contents: &[u8]) -> Result<(), RemoteError> {
        Ok(())
    }

    async fn exists(&self, _path: &str) -> Result<bool, RemoteError> {
        Ok(false)
    }

    async fn remove_file(&self, _path: &str) -> Result<(), RemoteError> {
        Ok(())
    }

    async fn close(&self) {
        *self.closed.lock().unwrap() += 1;
    }
}

type Answer = Result<Option<SessionRecord>, DirectoryError>;

/// Directory replaying a script of latest sessions; the last answer repeats
pub struct ScriptedDirectory {
    latest: Mutex<VecDeque<Answer>>,
}

impl ScriptedDirectory {
    pub fn new(script: Vec<Option<SessionRecord>>) -> Self {
        Self::with_answers(script.into_iter().map(Ok).collect())
    }

    pub fn with_answers(script: Vec<Answer>) -> Self {
        Self {
            latest: Mutex::new(script.into()),
        }
    }

    /// Replace whatever is left of the script with a single repeating answer
    pub fn set_latest(&self, session: Option<SessionRecord>) {
        let mut latest = self.latest.lock().unwrap();
        latest.clear();
        latest.push_back(Ok(session));
    }
}

#[async_trait]
impl SessionDirectory for ScriptedDirectory {
    async fn latest_session(
        &self,
        _server: &ServerIdentity,
        token: &AuthToken,
    ) -> Result<Option<SessionRecord>, DirectoryError> {
        assert_eq!(token.expose(), "T1");
        let mut latest = self.latest.lock().unwrap();
        if latest.len() > 1 {
            latest.pop_front().unwrap_or(Ok(None))
        } else {
            match latest.front() {
                Some(Ok(record)) => Ok(record.clone()),
                Some(Err(_)) => latest.pop_front().unwrap_or(Ok(None)),
                None => Ok(None),
            }
        }
    }

    async fn new_session(
        &self,
        _server: &ServerIdentity,
        _token: &AuthToken,
    ) -> Result<Option<SessionRecord>, DirectoryError> {
        Ok(None)
    }

    async fn product_info(
        &self,
        product_id: Uuid,
        _token: &AuthToken,
    ) -> Result<ProductInfo, DirectoryError> {
        Err(DirectoryError::NotFound(product_id.to_string()))
    }
}
