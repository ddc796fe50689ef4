use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::{EngineError, EngineResult};
use crate::messages::{CredentialIssue, CredentialOffer, ProtocolMessage};
use crate::protocols::{from_snapshot, to_snapshot};
use crate::transport::MessageTransport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IssuerState {
    Initialized,
    OfferSent,
    RequestReceived,
    Accepted,
    Unfulfilled,
}

/// Issuer side of the credential issuance exchange.
///
/// Initialized -> OfferSent (send_offer) -> RequestReceived (request arrives)
/// -> Accepted (send_credential). A problem report at any non-terminal point
/// moves to Unfulfilled. Accepted and Unfulfilled are terminal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssuerCredential {
    pub source_id: String,
    pub state: IssuerState,
    pub cred_def_id: String,
    pub attributes: BTreeMap<String, String>,
    pub thread_id: Option<String>,
    pub their_did: Option<String>,
    /// Set when issuing against a revocation registry.
    pub rev_reg_id: Option<String>,
    pub cred_rev_idx: Option<u32>,
}

impl IssuerCredential {
    pub fn create(
        source_id: &str,
        cred_def_id: &str,
        attributes: BTreeMap<String, String>,
    ) -> Self {
        IssuerCredential {
            source_id: source_id.to_string(),
            state: IssuerState::Initialized,
            cred_def_id: cred_def_id.to_string(),
            attributes,
            thread_id: None,
            their_did: None,
            rev_reg_id: None,
            cred_rev_idx: None,
        }
    }

    pub fn state(&self) -> IssuerState {
        self.state
    }

    pub fn thread_id(&self) -> Option<&str> {
        self.thread_id.as_deref()
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.state, IssuerState::Accepted | IssuerState::Unfulfilled)
    }

    /// Send the credential offer to the connection counterparty. Advances
    /// only on transport success; the offer's thread id correlates the rest
    /// of the exchange.
    pub async fn send_offer(
        &mut self,
        transport: &dyn MessageTransport,
        their_did: &str,
    ) -> EngineResult<()> {
        if self.state != IssuerState::Initialized {
            return Err(EngineError::InvalidState(format!(
                "cannot send offer in state {:?}",
                self.state
            )));
        }
        let offer = CredentialOffer {
            id: crate::messages::new_message_id(),
            thid: crate::messages::new_message_id(),
            cred_def_id: self.cred_def_id.clone(),
            attributes: self.attributes.clone(),
            comment: None,
        };
        let thread_id = offer.thid.clone();
        transport
            .send(their_did, ProtocolMessage::CredentialOffer(offer))
            .await?;
        self.thread_id = Some(thread_id);
        self.their_did = Some(their_did.to_string());
        self.state = IssuerState::OfferSent;
        trace!(source_id = %self.source_id, "credential offer sent");
        Ok(())
    }

    /// Attach revocation data before issuing.
    pub fn set_revocation(&mut self, rev_reg_id: &str, cred_rev_idx: u32) -> EngineResult<()> {
        if self.is_terminal() {
            return Err(EngineError::InvalidState(
                "credential already finished".to_string(),
            ));
        }
        self.rev_reg_id = Some(rev_reg_id.to_string());
        self.cred_rev_idx = Some(cred_rev_idx);
        Ok(())
    }

    /// Issue the credential answering the received request.
    pub async fn send_credential(
        &mut self,
        transport: &dyn MessageTransport,
    ) -> EngineResult<()> {
        if self.state != IssuerState::RequestReceived {
            return Err(EngineError::InvalidState(format!(
                "cannot send credential in state {:?}",
                self.state
            )));
        }
        let thread_id = self
            .thread_id
            .clone()
            .ok_or_else(|| EngineError::Internal("issuer has no thread id".to_string()))?;
        let their_did = self
            .their_did
            .clone()
            .ok_or_else(|| EngineError::Internal("issuer has no counterparty".to_string()))?;

        let credential = CredentialIssue {
            id: crate::messages::new_message_id(),
            thid: thread_id,
            cred_def_id: self.cred_def_id.clone(),
            values: self.attributes.clone(),
            rev_reg_id: self.rev_reg_id.clone(),
            cred_rev_idx: self.cred_rev_idx,
        };
        transport
            .send(&their_did, ProtocolMessage::CredentialIssue(credential))
            .await?;
        self.state = IssuerState::Accepted;
        trace!(source_id = %self.source_id, "credential issued");
        Ok(())
    }

    pub fn handle_message(&mut self, message: &ProtocolMessage) -> EngineResult<()> {
        if self.is_terminal() {
            return Ok(());
        }
        match (self.state, message) {
            (IssuerState::OfferSent, ProtocolMessage::CredentialRequest(request)) => {
                if Some(request.thid.as_str()) != self.thread_id.as_deref() {
                    return Ok(());
                }
                self.state = IssuerState::RequestReceived;
            }
            (_, ProtocolMessage::ProblemReport(report)) => {
                if Some(report.thid.as_str()) != self.thread_id.as_deref() {
                    return Ok(());
                }
                self.state = IssuerState::Unfulfilled;
                trace!(source_id = %self.source_id, explain = %report.explain, "issuance unfulfilled");
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
    use crate::messages::{CredentialRequest, ProblemReport};
    use crate::transport::InMemoryTransport;

    fn attributes() -> BTreeMap<String, String> {
        [("name", "Alice"), ("degree", "Maths")]
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn offer_request_issue_flow() {
        let transport = InMemoryTransport::new();
        let mut issuer =
            IssuerCredential::create("cred-1", "did:indy:sovrin:faber/cred_def/licence", attributes());

        issuer
            .send_offer(&transport, "did:peer:alice-1")
            .await
            .unwrap();
        assert_eq!(issuer.state(), IssuerState::OfferSent);
        let thread_id = issuer.thread_id().unwrap().to_string();

        let request = CredentialRequest {
            id: "m-1".to_string(),
            thid: thread_id,
            cred_def_id: issuer.cred_def_id.clone(),
            prover_did: "did:peer:alice-1".to_string(),
        };
        issuer
            .handle_message(&ProtocolMessage::CredentialRequest(request))
            .unwrap();
        assert_eq!(issuer.state(), IssuerState::RequestReceived);

        issuer.send_credential(&transport).await.unwrap();
        assert_eq!(issuer.state(), IssuerState::Accepted);
        assert!(issuer.is_terminal());
    }

    #[tokio::test]
    async fn problem_report_moves_to_unfulfilled() {
        let transport = InMemoryTransport::new();
        let mut issuer = IssuerCredential::create("cred-1", "cd-1", attributes());
        issuer
            .send_offer(&transport, "did:peer:alice-1")
            .await
            .unwrap();

        let report = ProblemReport::new(issuer.thread_id().unwrap(), "offer declined");
        issuer
            .handle_message(&ProtocolMessage::ProblemReport(report))
            .unwrap();
        assert_eq!(issuer.state(), IssuerState::Unfulfilled);

        // terminal: issuing now is a state error
        let err = issuer.send_credential(&transport).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidState(_)));
    }

    #[tokio::test]
    async fn sending_credential_before_request_is_a_state_error() {
        let transport = InMemoryTransport::new();
        let mut issuer = IssuerCredential::create("cred-1", "cd-1", attributes());
        let err = issuer.send_credential(&transport).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidState(_)));
    }

    #[test]
    fn snapshot_roundtrip() {
        let issuer = IssuerCredential::create("cred-1", "cd-1", attributes());
        let snapshot = issuer.to_string().unwrap();
        let restored = IssuerCredential::from_string(&snapshot).unwrap();
        assert_eq!(restored, issuer);
        assert_eq!(restored.to_string().unwrap(), snapshot);
    }
}
