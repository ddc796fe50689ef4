use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::trace;

use crate::error::{EngineError, EngineResult};
use crate::messages::ProtocolMessage;

/// Message delivery for pairwise connections. The engine holds only routing
/// metadata (pairwise DIDs, thread ids); how bytes reach the other agent is
/// this collaborator's concern.
#[async_trait]
pub trait MessageTransport: Send + Sync {
    /// Deliver a message to the agent owning `to_did`.
    async fn send(&self, to_did: &str, message: ProtocolMessage) -> EngineResult<()>;

    /// Consume pending messages addressed to `for_did`, optionally narrowed
    /// to one protocol thread. Consumed messages are not delivered twice.
    async fn fetch(
        &self,
        for_did: &str,
        thread_id: Option<&str>,
    ) -> EngineResult<Vec<ProtocolMessage>>;
}

/// Loopback transport backed by per-DID mailboxes. Deterministic substitute
/// for an agency so flows can run in-process.
pub struct InMemoryTransport {
    mailboxes: Mutex<HashMap<String, Vec<ProtocolMessage>>>,
}

impl InMemoryTransport {
    pub fn new() -> Self {
        InMemoryTransport {
            mailboxes: Mutex::new(HashMap::new()),
        }
    }

    pub fn pending(&self, for_did: &str) -> usize {
        self.mailboxes
            .lock()
            .expect("transport mailboxes poisoned")
            .get(for_did)
            .map(Vec::len)
            .unwrap_or(0)
    }
}

impl Default for InMemoryTransport {
    fn default() -> Self {
        InMemoryTransport::new()
    }
}

#[async_trait]
impl MessageTransport for InMemoryTransport {
    async fn send(&self, to_did: &str, message: ProtocolMessage) -> EngineResult<()> {
        if to_did.is_empty() {
            return Err(EngineError::Transport(
                "message has no destination did".to_string(),
            ));
        }
        trace!(to_did, thread_id = message.thread_id(), "transport send");
        let mut mailboxes = self
            .mailboxes
            .lock()
            .map_err(|_| EngineError::Internal("transport mailboxes poisoned".to_string()))?;
        mailboxes.entry(to_did.to_string()).or_default().push(message);
        Ok(())
    }

    async fn fetch(
        &self,
        for_did: &str,
        thread_id: Option<&str>,
    ) -> EngineResult<Vec<ProtocolMessage>> {
        let mut mailboxes = self
            .mailboxes
            .lock()
            .map_err(|_| EngineError::Internal("transport mailboxes poisoned".to_string()))?;
        let mailbox = match mailboxes.get_mut(for_did) {
            Some(mailbox) => mailbox,
            None => return Ok(Vec::new()),
        };

        match thread_id {
            None => Ok(std::mem::take(mailbox)),
            Some(thread_id) => {
                let mut matched = Vec::new();
                let mut rest = Vec::new();
                for message in mailbox.drain(..) {
                    if message.thread_id() == thread_id {
                        matched.push(message);
                    } else {
                        rest.push(message);
                    }
                }
                *mailbox = rest;
                Ok(matched)
            }
        }
    }
}
