//! Recording doubles for the credential chain

use async_trait::async_trait;
use cairn_sources::auth::{Platform, SessionProvider};
use std::sync::{Arc, Mutex};

/// Session provider that records every lookup
#[derive(Clone, Default)]
pub struct RecordingSession {
    token: Option<String>,
    calls: Arc<Mutex<Vec<Platform>>>,
}

impl RecordingSession {
    pub fn with_token(token: &str) -> Self {
        Self {
            token: Some(token.to_string()),
            calls: Arc::default(),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls(&self) -> Vec<Platform> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl SessionProvider for RecordingSession {
    async fn session_token(&self, platform: Platform) -> Option<String> {
        self.calls.lock().unwrap().push(platform);
        self.token.clone()
    }
}
