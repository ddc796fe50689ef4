use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::{EngineError, EngineResult};
use crate::messages::{Presentation, PresentationRequest, ProtocolMessage};
use crate::protocols::holder::HolderCredential;
use crate::protocols::{from_snapshot, to_snapshot};
use crate::transport::MessageTransport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProverState {
    RequestReceived,
    PresentationPrepared,
    PresentationSent,
    Accepted,
    Unfulfilled,
}

/// Prover side of the proof presentation exchange.
///
/// RequestReceived (from request) -> PresentationPrepared (generate_proof)
/// -> PresentationSent (send_proof) -> Accepted (ack arrives). Declining via
/// problem report moves to Unfulfilled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisclosedProof {
    pub source_id: String,
    pub state: ProverState,
    pub request: PresentationRequest,
    pub presentation: Option<Presentation>,
    pub their_did: Option<String>,
}

impl DisclosedProof {
    pub fn create_from_request(source_id: &str, request: PresentationRequest) -> Self {
        DisclosedProof {
            source_id: source_id.to_string(),
            state: ProverState::RequestReceived,
            request,
            presentation: None,
            their_did: None,
        }
    }

    pub fn state(&self) -> ProverState {
        self.state
    }

    pub fn thread_id(&self) -> &str {
        &self.request.thid
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.state, ProverState::Accepted | ProverState::Unfulfilled)
    }

    /// Build the presentation from a held credential, revealing the requested
    /// attributes. Fails when the credential cannot satisfy the request.
    pub fn generate_proof(&mut self, credential: &HolderCredential) -> EngineResult<()> {
        if self.state != ProverState::RequestReceived {
            return Err(EngineError::InvalidState(format!(
                "cannot generate proof in state {:?}",
                self.state
            )));
        }
        let values = credential.get_attributes()?;
        let mut revealed = std::collections::BTreeMap::new();
        for attr in &self.request.requested_attributes {
            let value = values.get(attr).ok_or_else(|| {
                EngineError::InvalidInput(format!(
                    "credential does not carry requested attribute {attr:?}"
                ))
            })?;
            revealed.insert(attr.clone(), value.clone());
        }

        self.presentation = Some(Presentation {
            id: crate::messages::new_message_id(),
            thid: self.request.thid.clone(),
            cred_def_id: credential.cred_def_id().to_string(),
            revealed_attrs: revealed,
            rev_reg_id: credential.rev_reg_id.clone(),
            cred_rev_idx: credential.cred_rev_idx,
        });
        self.state = ProverState::PresentationPrepared;
        trace!(source_id = %self.source_id, "presentation generated");
        Ok(())
    }

    pub async fn send_proof(
        &mut self,
        transport: &dyn MessageTransport,
        their_did: &str,
    ) -> EngineResult<()> {
        if self.state != ProverState::PresentationPrepared {
            return Err(EngineError::InvalidState(format!(
                "cannot send proof in state {:?}",
                self.state
            )));
        }
        let presentation = self
            .presentation
            .clone()
            .ok_or_else(|| EngineError::Internal("prepared proof is missing".to_string()))?;
        transport
            .send(their_did, ProtocolMessage::Presentation(presentation))
            .await?;
        self.their_did = Some(their_did.to_string());
        self.state = ProverState::PresentationSent;
        trace!(source_id = %self.source_id, "presentation sent");
        Ok(())
    }

    /// Refuse the presentation request.
    pub async fn decline_request(
        &mut self,
        transport: &dyn MessageTransport,
        their_did: &str,
        reason: &str,
    ) -> EngineResult<()> {
        if self.is_terminal() {
            return Err(EngineError::InvalidState(
                "presentation exchange already finished".to_string(),
            ));
        }
        let report = crate::messages::ProblemReport::new(&self.request.thid, reason);
        transport
            .send(their_did, ProtocolMessage::ProblemReport(report))
            .await?;
        self.state = ProverState::Unfulfilled;
        Ok(())
    }

    pub fn handle_message(&mut self, message: &ProtocolMessage) -> EngineResult<()> {
        if self.is_terminal() {
            return Ok(());
        }
        match (self.state, message) {
            (ProverState::PresentationSent, ProtocolMessage::Ack(ack)) => {
                if ack.thid != self.request.thid {
                    return Ok(());
                }
                self.state = ProverState::Accepted;
                trace!(source_id = %self.source_id, "presentation accepted");
            }
            (_, ProtocolMessage::ProblemReport(report)) => {
                if report.thid != self.request.thid {
                    return Ok(());
                }
                self.state = ProverState::Unfulfilled;
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
        let thread_id = self.request.thid.clone();
        for message in transport.fetch(our_did, Some(&thread_id)).await? {
            self.handle_message(&message)?;
        }
        Ok(())
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
    use crate::messages::{Ack, CredentialIssue, CredentialOffer};
    use crate::transport::InMemoryTransport;
    use std::collections::BTreeMap;

    fn accepted_credential() -> HolderCredential {
        let offer = CredentialOffer {
            id: "offer-1".to_string(),
            thid: "issue-thread".to_string(),
            cred_def_id: "cd-1".to_string(),
            attributes: BTreeMap::new(),
            comment: None,
        };
        let mut credential = HolderCredential::create_from_offer("held-1", offer);
        credential.state = crate::protocols::holder::HolderState::RequestSent;
        credential
            .handle_message(&ProtocolMessage::CredentialIssue(CredentialIssue {
                id: "m-1".to_string(),
                thid: "issue-thread".to_string(),
                cred_def_id: "cd-1".to_string(),
                values: [
                    ("name".to_string(), "Alice".to_string()),
                    ("degree".to_string(), "Maths".to_string()),
                ]
                .into(),
                rev_reg_id: None,
                cred_rev_idx: None,
            }))
            .unwrap();
        credential
    }

    fn request() -> PresentationRequest {
        PresentationRequest {
            id: "req-1".to_string(),
            thid: "proof-thread".to_string(),
            name: "degree-check".to_string(),
            requested_attributes: vec!["degree".to_string()],
        }
    }

    #[tokio::test]
    async fn generate_send_ack_flow() {
        let transport = InMemoryTransport::new();
        let mut prover = DisclosedProof::create_from_request("proof-1", request());
        let credential = accepted_credential();

        prover.generate_proof(&credential).unwrap();
        assert_eq!(prover.state(), ProverState::PresentationPrepared);

        prover.send_proof(&transport, "did:peer:verifier-1").await.unwrap();
        assert_eq!(prover.state(), ProverState::PresentationSent);

        prover
            .handle_message(&ProtocolMessage::Ack(Ack::new("proof-thread")))
            .unwrap();
        assert_eq!(prover.state(), ProverState::Accepted);
    }

    #[tokio::test]
    async fn missing_attribute_fails_generation() {
        let mut prover = DisclosedProof::create_from_request(
            "proof-1",
            PresentationRequest {
                requested_attributes: vec!["licence_no".to_string()],
                ..request()
            },
        );
        let credential = accepted_credential();
        let err = prover.generate_proof(&credential).unwrap_err();
        assert!(matches!(err, EngineError::InvalidInput(_)));
        assert_eq!(prover.state(), ProverState::RequestReceived);
    }

    #[tokio::test]
    async fn sending_before_generating_is_a_state_error() {
        let transport = InMemoryTransport::new();
        let mut prover = DisclosedProof::create_from_request("proof-1", request());
        let err = prover.send_proof(&transport, "did:peer:verifier-1").await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidState(_)));
    }

    #[test]
    fn snapshot_roundtrip() {
        let prover = DisclosedProof::create_from_request("proof-1", request());
        let snapshot = prover.to_string().unwrap();
        let restored = DisclosedProof::from_string(&snapshot).unwrap();
        assert_eq!(restored, prover);
        assert_eq!(restored.to_string().unwrap(), snapshot);
    }
}
