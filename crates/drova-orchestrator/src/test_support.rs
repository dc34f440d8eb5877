//! In-memory collaborators for unit tests

use std::collections::{HashMap, VecDeque};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use drova_core::error::{DirectoryError, RemoteError};
use drova_core::traits::{CommandOutput, RemoteShell, SessionDirectory};
use drova_core::types::{
    AuthToken, ProductInfo, ServerIdentity, SessionRecord, SessionStatus, DESKTOP_PRODUCT_ID,
};

pub const ESME_OUTPUT: &str = "\r\nHKEY_LOCAL_MACHINE\\SOFTWARE\\ITKey\\Esme\\servers\\S1\r\n    auth_token    REG_SZ    T1\r\n";

pub fn session(product_id: Uuid, status: SessionStatus) -> SessionRecord {
    SessionRecord {
        uuid: Uuid::new_v4(),
        product_id,
        client_id: Uuid::new_v4(),
        created_on: Utc::now(),
        finished_on: None,
        status,
        creator_ip: IpAddr::V4(Ipv4Addr::new(203, 0, 113, 7)),
        abort_comment: None,
        score: None,
        score_reason: None,
        score_text: None,
        billing_type: None,
    }
}

pub fn desktop(status: SessionStatus) -> SessionRecord {
    session(DESKTOP_PRODUCT_ID, status)
}

/// Remote shell that records every operation and serves files from memory
#[derive(Default)]
pub struct MockShell {
    pub log: Mutex<Vec<String>>,
    pub files: Mutex<HashMap<String, Vec<u8>>>,
    /// Commands containing one of these substrings exit with status 1
    pub failing: Mutex<Vec<String>>,
    /// Commands containing one of these substrings fail to reach the machine
    pub unreachable: Mutex<Vec<String>>,
    pub closed: Mutex<usize>,
}

impl MockShell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(self, path: &str, contents: &str) -> Self {
        self.files
            .lock()
            .unwrap()
            .insert(path.to_string(), contents.as_bytes().to_vec());
        self
    }

    pub fn fail_on(self, pattern: &str) -> Self {
        self.failing.lock().unwrap().push(pattern.to_string());
        self
    }

    pub fn unreachable_on(self, pattern: &str) -> Self {
        self.unreachable.lock().unwrap().push(pattern.to_string());
        self
    }

    pub fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub fn commands(&self) -> Vec<String> {
        self.log()
            .into_iter()
            .filter_map(|entry| entry.strip_prefix("run ").map(str::to_string))
            .collect()
    }

    pub fn count(&self, pattern: &str) -> usize {
        self.commands().iter().filter(|c| c.contains(pattern)).count()
    }

    pub fn closed(&self) -> usize {
        *self.closed.lock().unwrap()
    }

    pub fn file(&self, path: &str) -> Option<String> {
        self.files
            .lock()
            .unwrap()
            .get(path)
            .map(|b| String::from_utf8_lossy(b).into_owned())
    }
}

#[async_trait]
impl RemoteShell for MockShell {
    async fn run(&self, command: &str) -> Result<CommandOutput, RemoteError> {
        self.log.lock().unwrap().push(format!("run {}", command));

        if self
            .unreachable
            .lock()
            .unwrap()
            .iter()
            .any(|p| command.contains(p.as_str()))
        {
            return Err(RemoteError::Unreachable("mock".into()));
        }
        if self
            .failing
            .lock()
            .unwrap()
            .iter()
            .any(|p| command.contains(p.as_str()))
        {
            return Ok(CommandOutput::failed(1));
        }
        if command.starts_with("reg query") {
            return Ok(CommandOutput::ok(ESME_OUTPUT));
        }
        Ok(CommandOutput::ok(Vec::new()))
    }

    async fn read_file(&self, path: &str) -> Result<Vec<u8>, RemoteError> {
        self.log.lock().unwrap().push(format!("read {}", path));
        self.files
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| RemoteError::File {
                path: path.to_string(),
                message: "no such file".into(),
            })
    }

    async fn write_file(&self, path: &str, contents: &[u8]) -> Result<(), RemoteError> {
        self.log.lock().unwrap().push(format!("write {}", path));
        self.files
            .lock()
            .unwrap()
            .insert(path.to_string(), contents.to_vec());
        Ok(())
    }

    async fn exists(&self, path: &str) -> Result<bool, RemoteError> {
        Ok(self.files.lock().unwrap().contains_key(path))
    }

    async fn remove_file(&self, path: &str) -> Result<(), RemoteError> {
        self.log.lock().unwrap().push(format!("remove {}", path));
        self.files.lock().unwrap().remove(path);
        Ok(())
    }

    async fn close(&self) {
        *self.closed.lock().unwrap() += 1;
    }
}

/// Scripted directory; each queue repeats its last entry once drained
#[derive(Default)]
pub struct MockDirectory {
    pub latest: Mutex<VecDeque<Result<Option<SessionRecord>, DirectoryError>>>,
    pub starting: Mutex<VecDeque<Result<Option<SessionRecord>, DirectoryError>>>,
    pub products: Mutex<HashMap<Uuid, bool>>,
    pub latest_calls: Mutex<usize>,
    pub new_calls: Mutex<usize>,
    pub product_calls: Mutex<usize>,
}

impl MockDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn latest(self, script: Vec<Result<Option<SessionRecord>, DirectoryError>>) -> Self {
        *self.latest.lock().unwrap() = script.into();
        self
    }

    pub fn new_sessions(self, script: Vec<Result<Option<SessionRecord>, DirectoryError>>) -> Self {
        *self.starting.lock().unwrap() = script.into();
        self
    }

    pub fn product(self, product_id: Uuid, use_default_desktop: bool) -> Self {
        self.products
            .lock()
            .unwrap()
            .insert(product_id, use_default_desktop);
        self
    }

    pub fn latest_calls(&self) -> usize {
        *self.latest_calls.lock().unwrap()
    }

    pub fn product_calls(&self) -> usize {
        *self.product_calls.lock().unwrap()
    }

    fn next(
        queue: &Mutex<VecDeque<Result<Option<SessionRecord>, DirectoryError>>>,
    ) -> Result<Option<SessionRecord>, DirectoryError> {
        let mut queue = queue.lock().unwrap();
        if queue.len() > 1 {
            return queue.pop_front().unwrap_or(Ok(None));
        }
        match queue.front() {
            Some(Ok(record)) => Ok(record.clone()),
            Some(Err(_)) => queue.pop_front().unwrap_or(Ok(None)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl SessionDirectory for MockDirectory {
    async fn latest_session(
        &self,
        _server: &ServerIdentity,
        _token: &AuthToken,
    ) -> Result<Option<SessionRecord>, DirectoryError> {
        *self.latest_calls.lock().unwrap() += 1;
        Self::next(&self.latest)
    }

    async fn new_session(
        &self,
        _server: &ServerIdentity,
        _token: &AuthToken,
    ) -> Result<Option<SessionRecord>, DirectoryError> {
        *self.new_calls.lock().unwrap() += 1;
        Self::next(&self.starting)
    }

    async fn product_info(
        &self,
        product_id: Uuid,
        _token: &AuthToken,
    ) -> Result<ProductInfo, DirectoryError> {
        *self.product_calls.lock().unwrap() += 1;
        match self.products.lock().unwrap().get(&product_id) {
            Some(use_default_desktop) => Ok(ProductInfo {
                product_id,
                use_default_desktop: *use_default_desktop,
                title: "Game".into(),
                game_path: None,
                work_path: None,
                args: None,
            }),
            None => Err(DirectoryError::NotFound(product_id.to_string())),
        }
    }
}
