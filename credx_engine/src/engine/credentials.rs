use std::collections::BTreeMap;

use crate::engine::CredxEngine;
use crate::error::{EngineError, EngineResult};
use crate::messages::ProtocolMessage;
use crate::protocols::holder::{HolderCredential, HolderState};
use crate::protocols::issuer::{IssuerCredential, IssuerState};

/// Credential issuance operations, issuer and holder side. Operations that
/// talk to the counterparty take the connection handle carrying the exchange.
impl CredxEngine {
    // ---- issuer ----

    pub fn issuer_credential_create(
        &self,
        source_id: &str,
        cred_def_id: &str,
        attributes_json: &str,
    ) -> EngineResult<u32> {
        self.check_open()?;
        let attributes: BTreeMap<String, String> = serde_json::from_str(attributes_json)?;
        if attributes.is_empty() {
            return Err(EngineError::InvalidInput(
                "credential requires at least one attribute".to_string(),
            ));
        }
        let credential = IssuerCredential::create(source_id, cred_def_id, attributes);
        self.issuer_credentials.add(credential)
    }

    /// Reserve an index in a revocation registry for this credential.
    pub async fn issuer_credential_set_revocation(
        &self,
        handle: u32,
        rev_reg_handle: u32,
    ) -> EngineResult<u32> {
        self.check_open()?;
        let rev_entry = self.rev_regs.entry(rev_reg_handle)?;
        let mut registry = rev_entry.lock().await;
        let index = registry.next_credential_index()?;
        let rev_reg_id = registry.id().to_string();
        drop(registry);

        let entry = self.issuer_credentials.entry(handle)?;
        let mut credential = entry.lock().await;
        credential.set_revocation(&rev_reg_id, index)?;
        Ok(index)
    }

    pub async fn issuer_send_offer(
        &self,
        handle: u32,
        connection_handle: u32,
    ) -> EngineResult<()> {
        self.check_open()?;
        let (_, their_did) = self.connection_dids(connection_handle).await?;
        let entry = self.issuer_credentials.entry(handle)?;
        let mut credential = entry.lock().await;
        credential
            .send_offer(self.transport.as_ref(), &their_did)
            .await
    }

    pub async fn issuer_send_credential(&self, handle: u32) -> EngineResult<()> {
        self.check_open()?;
        let entry = self.issuer_credentials.entry(handle)?;
        let mut credential = entry.lock().await;
        credential.send_credential(self.transport.as_ref()).await
    }

    pub async fn issuer_update_state(
        &self,
        handle: u32,
        connection_handle: u32,
    ) -> EngineResult<IssuerState> {
        self.check_open()?;
        let (our_did, _) = self.connection_dids(connection_handle).await?;
        let entry = self.issuer_credentials.entry(handle)?;
        let mut credential = entry.lock().await;
        credential
            .update_state(self.transport.as_ref(), &our_did)
            .await?;
        Ok(credential.state())
    }

    pub async fn issuer_update_state_with_message(
        &self,
        handle: u32,
        message_json: &str,
    ) -> EngineResult<IssuerState> {
        self.check_open()?;
        let message = ProtocolMessage::from_json(message_json)?;
        let entry = self.issuer_credentials.entry(handle)?;
        let mut credential = entry.lock().await;
        credential.handle_message(&message)?;
        Ok(credential.state())
    }

    pub async fn issuer_get_state(&self, handle: u32) -> EngineResult<IssuerState> {
        self.check_open()?;
        let entry = self.issuer_credentials.entry(handle)?;
        let credential = entry.lock().await;
        Ok(credential.state())
    }

    pub async fn issuer_thread_id(&self, handle: u32) -> EngineResult<Option<String>> {
        self.check_open()?;
        let entry = self.issuer_credentials.entry(handle)?;
        let credential = entry.lock().await;
        Ok(credential.thread_id().map(str::to_string))
    }

    pub async fn issuer_credential_serialize(&self, handle: u32) -> EngineResult<String> {
        self.check_open()?;
        let entry = self.issuer_credentials.entry(handle)?;
        let credential = entry.lock().await;
        credential.to_string()
    }

    pub fn issuer_credential_deserialize(&self, snapshot: &str) -> EngineResult<u32> {
        self.check_open()?;
        let credential = IssuerCredential::from_string(snapshot)?;
        self.issuer_credentials.add(credential)
    }

    pub fn issuer_credential_release(&self, handle: u32) -> EngineResult<()> {
        self.issuer_credentials.release(handle)
    }

    // ---- holder ----

    /// Build a holder credential from a received offer message.
    pub fn credential_create_from_offer(
        &self,
        source_id: &str,
        offer_json: &str,
    ) -> EngineResult<u32> {
        self.check_open()?;
        let offer = match ProtocolMessage::from_json(offer_json)? {
            ProtocolMessage::CredentialOffer(offer) => offer,
            other => {
                return Err(EngineError::InvalidInput(format!(
                    "message on thread {:?} is not a credential offer",
                    other.thread_id()
                )))
            }
        };
        let credential = HolderCredential::create_from_offer(source_id, offer);
        self.holder_credentials.add(credential)
    }

    /// Fetch pending credential offers for a connection without consuming
    /// other traffic.
    pub async fn credential_get_offers(&self, connection_handle: u32) -> EngineResult<Vec<String>> {
        self.check_open()?;
        let (our_did, _) = self.connection_dids(connection_handle).await?;
        let messages = self.transport.fetch(&our_did, None).await?;
        let mut offers = Vec::new();
        for message in messages {
            match &message {
                ProtocolMessage::CredentialOffer(_) => offers.push(message.to_json()?),
                _ => self.transport.send(&our_did, message).await?,
            }
        }
        Ok(offers)
    }

    pub async fn credential_send_request(
        &self,
        handle: u32,
        connection_handle: u32,
    ) -> EngineResult<()> {
        self.check_open()?;
        let (our_did, their_did) = self.connection_dids(connection_handle).await?;
        let entry = self.holder_credentials.entry(handle)?;
        let mut credential = entry.lock().await;
        credential
            .send_request(self.transport.as_ref(), &our_did, &their_did)
            .await
    }

    pub async fn credential_decline_offer(
        &self,
        handle: u32,
        connection_handle: u32,
        comment: &str,
    ) -> EngineResult<()> {
        self.check_open()?;
        let (_, their_did) = self.connection_dids(connection_handle).await?;
        let entry = self.holder_credentials.entry(handle)?;
        let mut credential = entry.lock().await;
        credential
            .decline_offer(self.transport.as_ref(), &their_did, comment)
            .await
    }

    pub async fn credential_update_state(
        &self,
        handle: u32,
        connection_handle: u32,
    ) -> EngineResult<HolderState> {
        self.check_open()?;
        let (our_did, _) = self.connection_dids(connection_handle).await?;
        let entry = self.holder_credentials.entry(handle)?;
        let mut credential = entry.lock().await;
        credential
            .update_state(self.transport.as_ref(), &our_did)
            .await?;
        Ok(credential.state())
    }

    pub async fn credential_update_state_with_message(
        &self,
        handle: u32,
        message_json: &str,
    ) -> EngineResult<HolderState> {
        self.check_open()?;
        let message = ProtocolMessage::from_json(message_json)?;
        let entry = self.holder_credentials.entry(handle)?;
        let mut credential = entry.lock().await;
        credential.handle_message(&message)?;
        Ok(credential.state())
    }

    pub async fn credential_get_state(&self, handle: u32) -> EngineResult<HolderState> {
        self.check_open()?;
        let entry = self.holder_credentials.entry(handle)?;
        let credential = entry.lock().await;
        Ok(credential.state())
    }

    pub async fn credential_get_attributes(&self, handle: u32) -> EngineResult<String> {
        self.check_open()?;
        let entry = self.holder_credentials.entry(handle)?;
        let credential = entry.lock().await;
        Ok(serde_json::to_string(credential.get_attributes()?)?)
    }

    /// Convergence check of one held credential against a revocation
    /// registry's published status list.
    pub async fn credential_check_revocation(
        &self,
        handle: u32,
        rev_reg_handle: u32,
    ) -> EngineResult<HolderState> {
        self.check_open()?;
        let rev_entry = self.rev_regs.entry(rev_reg_handle)?;
        let registry = rev_entry.lock().await;
        let rev_reg_id = registry.id().to_string();
        let revoked = registry.revoked_indexes();
        drop(registry);

        let entry = self.holder_credentials.entry(handle)?;
        let mut credential = entry.lock().await;
        credential.check_revocation(&rev_reg_id, &revoked);
        Ok(credential.state())
    }

    pub async fn credential_serialize(&self, handle: u32) -> EngineResult<String> {
        self.check_open()?;
        let entry = self.holder_credentials.entry(handle)?;
        let credential = entry.lock().await;
        credential.to_string()
    }

    pub fn credential_deserialize(&self, snapshot: &str) -> EngineResult<u32> {
        self.check_open()?;
        let credential = HolderCredential::from_string(snapshot)?;
        self.holder_credentials.add(credential)
    }

    pub fn credential_release(&self, handle: u32) -> EngineResult<()> {
        self.holder_credentials.release(handle)
    }

    // ---- shared ----

    pub(crate) async fn connection_dids(
        &self,
        connection_handle: u32,
    ) -> EngineResult<(String, String)> {
        let entry = self.connections.entry(connection_handle)?;
        let connection = entry.lock().await;
        Ok((
            connection.pairwise_did.clone(),
            connection.their_did()?.to_string(),
        ))
    }
}
