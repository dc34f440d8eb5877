//! Write-once handshake signal

use tokio::sync::watch;

/// Single-assignment boolean that any number of tasks can read or await.
///
/// The first call to [`resolve`](Self::resolve) wins; later calls are
/// ignored, so readers always observe the same value once it is set.
#[derive(Debug)]
pub struct HandshakeSignal {
    state: watch::Sender<Option<bool>>,
}

impl HandshakeSignal {
    /// Create an unresolved signal
    pub fn new() -> Self {
        let (state, _) = watch::channel(None);
        Self { state }
    }

    /// Resolve the signal. Returns `true` if this call set the value.
    pub fn resolve(&self, answered: bool) -> bool {
        self.state.send_if_modified(|value| {
            if value.is_none() {
                *value = Some(answered);
                true
            } else {
                false
            }
        })
    }

    /// Current value, `None` while unresolved
    pub fn get(&self) -> Option<bool> {
        *self.state.borrow()
    }

    /// Wait until the signal is resolved and return its value
    pub async fn wait(&self) -> bool {
        let mut rx = self.state.subscribe();
        let resolved = match rx.wait_for(Option::is_some).await {
            Ok(value) => *value,
            // The sender lives in `self`, so this only happens mid-teardown
            Err(_) => None,
        };
        resolved.unwrap_or(false)
    }
}

impl Default for HandshakeSignal {
    fn default() -> Self {
        Self::new()
    }
}
