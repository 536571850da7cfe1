use std::collections::HashSet;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use rand::RngCore;
use tokio::sync::Mutex;

use crate::domain::ports::SessionState;

#[derive(Default)]
struct SessionData {
    nonces: Vec<String>,
    flags: HashSet<String>,
}

/// In-process session state: the nonce collection and one-shot flags.
///
/// One instance per visitor session. All access goes through a single mutex,
/// which is what makes nonce consumption atomic: two concurrent submits
/// carrying the same token serialize on the lock, and only the first one finds
/// the entry.
#[derive(Default)]
pub struct InMemorySession {
    data: Mutex<SessionData>,
}

impl InMemorySession {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionState for InMemorySession {
    async fn issue_nonce(&self) -> String {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        let nonce = STANDARD.encode(bytes);
        self.data.lock().await.nonces.push(nonce.clone());
        nonce
    }

    async fn consume_nonce(&self, nonce: &str) -> bool {
        let mut data = self.data.lock().await;
        match data.nonces.iter().position(|n| n == nonce) {
            Some(idx) => {
                data.nonces.remove(idx);
                true
            }
            None => false,
        }
    }

    async fn set_flag(&self, name: &str) {
        self.data.lock().await.flags.insert(name.to_string());
    }

    async fn take_flag(&self, name: &str) -> bool {
        self.data.lock().await.flags.remove(name)
    }
}
