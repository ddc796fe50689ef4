use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::{EngineError, EngineResult};
use crate::messages::{Presentation, PresentationRequest, ProtocolMessage};
use crate::protocols::{from_snapshot, to_snapshot};
use crate::transport::MessageTransport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VerifierState {
    Initialized,
    RequestSent,
    Accepted,
    Unfulfilled,
}

/// Verifier side of the proof presentation exchange.
///
/// Initialized -> RequestSent (send_request) -> Accepted (presentation
/// arrives and is checked; validity is recorded separately from state).
/// A problem report moves to Unfulfilled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proof {
    pub source_id: String,
    pub state: VerifierState,
    pub name: String,
    pub requested_attributes: Vec<String>,
    pub thread_id: Option<String>,
    pub their_did: Option<String>,
    pub presentation: Option<Presentation>,
    /// Whether the received presentation satisfied the request. Populated
    /// when Accepted.
    pub valid: Option<bool>,
}

impl Proof {
    pub fn create(source_id: &str, name: &str, requested_attributes: Vec<String>) -> Self {
        Proof {
            source_id: source_id.to_string(),
            state: VerifierState::Initialized,
            name: name.to_string(),
            requested_attributes,
            thread_id: None,
            their_did: None,
            presentation: None,
            valid: None,
        }
    }

    pub fn state(&self) -> VerifierState {
        self.state
    }

    pub fn thread_id(&self) -> Option<&str> {
        self.thread_id.as_deref()
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.state,
            VerifierState::Accepted | VerifierState::Unfulfilled
        )
    }

    pub async fn send_request(
        &mut self,
        transport: &dyn MessageTransport,
        their_did: &str,
    ) -> EngineResult<()> {
        if self.state != VerifierState::Initialized {
            return Err(EngineError::InvalidState(format!(
                "cannot send presentation request in state {:?}",
                self.state
            )));
        }
        let request = PresentationRequest {
            id: crate::messages::new_message_id(),
            thid: crate::messages::new_message_id(),
            name: self.name.clone(),
            requested_attributes: self.requested_attributes.clone(),
        };
        let thread_id = request.thid.clone();
        transport
            .send(their_did, ProtocolMessage::PresentationRequest(request))
            .await?;
        self.thread_id = Some(thread_id);
        self.their_did = Some(their_did.to_string());
        self.state = VerifierState::RequestSent;
        trace!(source_id = %self.source_id, "presentation request sent");
        Ok(())
    }

    /// A presentation satisfies the request when every requested attribute is
    /// revealed. Richer cryptographic verification is the proof backend's
    /// concern, outside this engine.
    fn verify(&self, presentation: &Presentation) -> bool {
        self.requested_attributes
            .iter()
            .all(|attr| presentation.revealed_attrs.contains_key(attr))
    }

    pub fn handle_message(&mut self, message: &ProtocolMessage) -> EngineResult<()> {
        if self.is_terminal() {
            return Ok(());
        }
        match (self.state, message) {
            (VerifierState::RequestSent, ProtocolMessage::Presentation(presentation)) => {
                if Some(presentation.thid.as_str()) != self.thread_id.as_deref() {
                    return Ok(());
                }
                self.valid = Some(self.verify(presentation));
                self.presentation = Some(presentation.clone());
                self.state = VerifierState::Accepted;
                trace!(source_id = %self.source_id, valid = ?self.valid, "presentation received");
            }
            (_, ProtocolMessage::ProblemReport(report)) => {
                if Some(report.thid.as_str()) != self.thread_id.as_deref() {
                    return Ok(());
                }
                self.state = VerifierState::Unfulfilled;
            }
            _ => {}
        }
        Ok(())
    }

    pub async fn update_state(
        &mut self,
        transport: &dyn MessageTransport,
        our_did: &str,
    ) -> EngineResult<()> {
        if self.is_terminal() {
            return Ok(());
        }
        let thread_id = match &self.thread_id {
            Some(thread_id) => thread_id.clone(),
            None => return Ok(()),
        };
        for message in transport.fetch(our_did, Some(&thread_id)).await? {
            self.handle_message(&message)?;
        }
        Ok(())
    }

    pub fn presentation(&self) -> EngineResult<&Presentation> {
        self.presentation.as_ref().ok_or_else(|| {
            EngineError::InvalidState("no presentation received yet".to_string())
        })
    }

    pub fn to_string(&self) -> EngineResult<String> {
        to_snapshot(self)
    }

    pub fn from_string(snapshot: &str) -> EngineResult<Self> {
        from_snapshot(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::InMemoryTransport;
    use std::collections::BTreeMap;

    fn presentation(thid: &str, attrs: &[(&str, &str)]) -> Presentation {
        Presentation {
            id: "p-1".to_string(),
            thid: thid.to_string(),
            cred_def_id: "cd-1".to_string(),
            revealed_attrs: attrs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            rev_reg_id: None,
            cred_rev_idx: None,
        }
    }

    #[tokio::test]
    async fn satisfied_presentation_is_accepted_valid() {
        let transport = InMemoryTransport::new();
        let mut proof = Proof::create("proof-1", "degree-check", vec!["degree".to_string()]);
        proof.send_request(&transport, "did:peer:alice-1").await.unwrap();

        let thid = proof.thread_id().unwrap().to_string();
        proof
            .handle_message(&ProtocolMessage::Presentation(presentation(
                &thid,
                &[("degree", "Maths")],
            )))
            .unwrap();
        assert_eq!(proof.state(), VerifierState::Accepted);
        assert_eq!(proof.valid, Some(true));
        assert_eq!(proof.presentation().unwrap().revealed_attrs["degree"], "Maths");
    }

    #[tokio::test]
    async fn missing_attributes_are_recorded_invalid_not_errored() {
        let transport = InMemoryTransport::new();
        let mut proof = Proof::create(
            "proof-1",
            "degree-check",
            vec!["degree".to_string(), "name".to_string()],
        );
        proof.send_request(&transport, "did:peer:alice-1").await.unwrap();

        let thid = proof.thread_id().unwrap().to_string();
        proof
            .handle_message(&ProtocolMessage::Presentation(presentation(
                &thid,
                &[("degree", "Maths")],
            )))
            .unwrap();
        assert_eq!(proof.state(), VerifierState::Accepted);
        assert_eq!(proof.valid, Some(false));
    }

    #[test]
    fn snapshot_roundtrip() {
        let proof = Proof::create("proof-1", "degree-check", vec!["degree".to_string()]);
        let snapshot = proof.to_string().unwrap();
        let restored = Proof::from_string(&snapshot).unwrap();
        assert_eq!(restored, proof);
        assert_eq!(restored.to_string().unwrap(), snapshot);
    }
}
