use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::{EngineError, EngineResult};
use crate::messages::{CredentialOffer, CredentialRequest, ProtocolMessage};
use crate::protocols::{from_snapshot, to_snapshot};
use crate::transport::MessageTransport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HolderState {
    OfferReceived,
    RequestSent,
    Accepted,
    Unfulfilled,
    Revoked,
}

/// Holder side of the credential issuance exchange.
///
/// OfferReceived (from offer) -> RequestSent (send_request) -> Accepted
/// (credential arrives). A problem report moves to Unfulfilled. A published
/// revocation observed through `check_revocation` moves an accepted
/// credential to Revoked. Accepted is terminal for the exchange itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HolderCredential {
    pub source_id: String,
    pub state: HolderState,
    pub offer: CredentialOffer,
    pub thread_id: String,
    pub their_did: Option<String>,
    /// Issued attribute values, present once Accepted.
    pub values: BTreeMap<String, String>,
    pub rev_reg_id: Option<String>,
    pub cred_rev_idx: Option<u32>,
}

impl HolderCredential {
    /// Build from a received offer. The offer's thread id correlates the
    /// whole exchange.
    pub fn create_from_offer(source_id: &str, offer: CredentialOffer) -> Self {
        HolderCredential {
            source_id: source_id.to_string(),
            state: HolderState::OfferReceived,
            thread_id: offer.thid.clone(),
            offer,
            their_did: None,
            values: BTreeMap::new(),
            rev_reg_id: None,
            cred_rev_idx: None,
        }
    }

    pub fn state(&self) -> HolderState {
        self.state
    }

    pub fn thread_id(&self) -> &str {
        &self.thread_id
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.state,
            HolderState::Accepted | HolderState::Unfulfilled | HolderState::Revoked
        )
    }

    /// Offered attribute values (before acceptance) or issued values (after).
    pub fn get_attributes(&self) -> EngineResult<&BTreeMap<String, String>> {
        match self.state {
            HolderState::OfferReceived | HolderState::RequestSent => Ok(&self.offer.attributes),
            HolderState::Accepted | HolderState::Revoked => Ok(&self.values),
            HolderState::Unfulfilled => Err(EngineError::InvalidState(
                "cannot get attributes: issuance was unfulfilled".to_string(),
            )),
        }
    }

    pub fn cred_def_id(&self) -> &str {
        &self.offer.cred_def_id
    }

    /// Accept the offer by sending a credential request back to the issuer.
    pub async fn send_request(
        &mut self,
        transport: &dyn MessageTransport,
        our_did: &str,
        their_did: &str,
    ) -> EngineResult<()> {
        if self.state != HolderState::OfferReceived {
            return Err(EngineError::InvalidState(format!(
                "cannot send request in state {:?}",
                self.state
            )));
        }
        let request = CredentialRequest {
            id: crate::messages::new_message_id(),
            thid: self.thread_id.clone(),
            cred_def_id: self.offer.cred_def_id.clone(),
            prover_did: our_did.to_string(),
        };
        transport
            .send(their_did, ProtocolMessage::CredentialRequest(request))
            .await?;
        self.their_did = Some(their_did.to_string());
        self.state = HolderState::RequestSent;
        trace!(source_id = %self.source_id, "credential request sent");
        Ok(())
    }

    /// Decline the offer, reporting the reason to the issuer.
    pub async fn decline_offer(
        &mut self,
        transport: &dyn MessageTransport,
        their_did: &str,
        comment: &str,
    ) -> EngineResult<()> {
        if self.is_terminal() {
            return Err(EngineError::InvalidState(
                "credential exchange already finished".to_string(),
            ));
        }
        let report = crate::messages::ProblemReport::new(&self.thread_id, comment);
        transport
            .send(their_did, ProtocolMessage::ProblemReport(report))
            .await?;
        self.state = HolderState::Unfulfilled;
        Ok(())
    }

    pub fn handle_message(&mut self, message: &ProtocolMessage) -> EngineResult<()> {
        if self.is_terminal() {
            return Ok(());
        }
        match (self.state, message) {
            (HolderState::RequestSent, ProtocolMessage::CredentialIssue(credential)) => {
                if credential.thid != self.thread_id {
                    return Ok(());
                }
                self.values = credential.values.clone();
                self.rev_reg_id = credential.rev_reg_id.clone();
                self.cred_rev_idx = credential.cred_rev_idx;
                self.state = HolderState::Accepted;
                trace!(source_id = %self.source_id, "credential stored");
            }
            (_, ProtocolMessage::ProblemReport(report)) => {
                if report.thid != self.thread_id {
                    return Ok(());
                }
                self.state = HolderState::Unfulfilled;
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
        for message in transport.fetch(our_did, Some(&self.thread_id.clone())).await? {
            self.handle_message(&message)?;
        }
        Ok(())
    }

    /// Convergence check against a revocation registry status list: flips an
    /// accepted credential to Revoked when its index is revoked.
    pub fn check_revocation(&mut self, rev_reg_id: &str, revoked_indexes: &[u32]) -> bool {
        if self.state != HolderState::Accepted {
            return false;
        }
        let ours = match (&self.rev_reg_id, self.cred_rev_idx) {
            (Some(id), Some(idx)) if id == rev_reg_id => idx,
            _ => return false,
        };
        if revoked_indexes.contains(&ours) {
            self.state = HolderState::Revoked;
            trace!(source_id = %self.source_id, "credential revoked");
            return true;
        }
        false
    }

    pub fn to_string(&self) -> EngineResult<String> {
        to_snapshot(self)
    }

    pub fn from_string(snapshot: &str) -> EngineResult<Self> {
        from_snapshot(snapshot)
    }
}
