use crate::engine::CredxEngine;
use crate::error::{EngineError, EngineResult};
use crate::messages::{Ack, ProtocolMessage};
use crate::protocols::prover::{DisclosedProof, ProverState};
use crate::protocols::verifier::{Proof, VerifierState};

/// Proof presentation operations, verifier and prover side.
impl CredxEngine {
    // ---- verifier ----

    pub fn proof_create(
        &self,
        source_id: &str,
        name: &str,
        requested_attributes_json: &str,
    ) -> EngineResult<u32> {
        self.check_open()?;
        let requested: Vec<String> = serde_json::from_str(requested_attributes_json)?;
        if requested.is_empty() {
            return Err(EngineError::InvalidInput(
                "proof request needs at least one attribute".to_string(),
            ));
        }
        self.proofs.add(Proof::create(source_id, name, requested))
    }

    pub async fn proof_send_request(
        &self,
        handle: u32,
        connection_handle: u32,
    ) -> EngineResult<()> {
        self.check_open()?;
        let (_, their_did) = self.connection_dids(connection_handle).await?;
        let entry = self.proofs.entry(handle)?;
        let mut proof = entry.lock().await;
        proof.send_request(self.transport.as_ref(), &their_did).await
    }

    /// Pull and apply new messages. When the presentation arrives, the
    /// verifier acknowledges it so the prover can finish.
    pub async fn proof_update_state(
        &self,
        handle: u32,
        connection_handle: u32,
    ) -> EngineResult<VerifierState> {
        self.check_open()?;
        let (our_did, their_did) = self.connection_dids(connection_handle).await?;
        let entry = self.proofs.entry(handle)?;
        let mut proof = entry.lock().await;
        let before = proof.state();
        proof.update_state(self.transport.as_ref(), &our_did).await?;
        let after = proof.state();

        if before != VerifierState::Accepted && after == VerifierState::Accepted {
            if let Some(thread_id) = proof.thread_id() {
                self.transport
                    .send(&their_did, ProtocolMessage::Ack(Ack::new(thread_id)))
                    .await?;
            }
        }
        Ok(after)
    }

    pub async fn proof_update_state_with_message(
        &self,
        handle: u32,
        message_json: &str,
    ) -> EngineResult<VerifierState> {
        self.check_open()?;
        let message = ProtocolMessage::from_json(message_json)?;
        let entry = self.proofs.entry(handle)?;
        let mut proof = entry.lock().await;
        proof.handle_message(&message)?;
        Ok(proof.state())
    }

    pub async fn proof_get_state(&self, handle: u32) -> EngineResult<VerifierState> {
        self.check_open()?;
        let entry = self.proofs.entry(handle)?;
        let proof = entry.lock().await;
        Ok(proof.state())
    }

    /// Whether the received presentation satisfied the request. Only
    /// meaningful once Accepted.
    pub async fn proof_is_valid(&self, handle: u32) -> EngineResult<bool> {
        self.check_open()?;
        let entry = self.proofs.entry(handle)?;
        let proof = entry.lock().await;
        proof.valid.ok_or_else(|| {
            EngineError::InvalidState("no presentation has been received".to_string())
        })
    }

    pub async fn proof_get_presentation(&self, handle: u32) -> EngineResult<String> {
        self.check_open()?;
        let entry = self.proofs.entry(handle)?;
        let proof = entry.lock().await;
        Ok(serde_json::to_string(proof.presentation()?)?)
    }

    pub async fn proof_serialize(&self, handle: u32) -> EngineResult<String> {
        self.check_open()?;
        let entry = self.proofs.entry(handle)?;
        let proof = entry.lock().await;
        proof.to_string()
    }

    pub fn proof_deserialize(&self, snapshot: &str) -> EngineResult<u32> {
        self.check_open()?;
        self.proofs.add(Proof::from_string(snapshot)?)
    }

    pub fn proof_release(&self, handle: u32) -> EngineResult<()> {
        self.proofs.release(handle)
    }

    // ---- prover ----

    /// Fetch pending presentation requests for a connection.
    pub async fn disclosed_proof_get_requests(
        &self,
        connection_handle: u32,
    ) -> EngineResult<Vec<String>> {
        self.check_open()?;
        let (our_did, _) = self.connection_dids(connection_handle).await?;
        let messages = self.transport.fetch(&our_did, None).await?;
        let mut requests = Vec::new();
        for message in messages {
            match &message {
                ProtocolMessage::PresentationRequest(_) => requests.push(message.to_json()?),
                _ => self.transport.send(&our_did, message).await?,
            }
        }
        Ok(requests)
    }

    pub fn disclosed_proof_create_from_request(
        &self,
        source_id: &str,
        request_json: &str,
    ) -> EngineResult<u32> {
        self.check_open()?;
        let request = match ProtocolMessage::from_json(request_json)? {
            ProtocolMessage::PresentationRequest(request) => request,
            other => {
                return Err(EngineError::InvalidInput(format!(
                    "message on thread {:?} is not a presentation request",
                    other.thread_id()
                )))
            }
        };
        self.disclosed_proofs
            .add(DisclosedProof::create_from_request(source_id, request))
    }

    /// Build the presentation from a held credential.
    pub async fn disclosed_proof_generate(
        &self,
        handle: u32,
        credential_handle: u32,
    ) -> EngineResult<()> {
        self.check_open()?;
        let credential = self.holder_credentials.get_cloned(credential_handle).await?;
        let entry = self.disclosed_proofs.entry(handle)?;
        let mut proof = entry.lock().await;
        proof.generate_proof(&credential)
    }

    pub async fn disclosed_proof_send(
        &self,
        handle: u32,
        connection_handle: u32,
    ) -> EngineResult<()> {
        self.check_open()?;
        let (_, their_did) = self.connection_dids(connection_handle).await?;
        let entry = self.disclosed_proofs.entry(handle)?;
        let mut proof = entry.lock().await;
        proof.send_proof(self.transport.as_ref(), &their_did).await
    }

    pub async fn disclosed_proof_decline(
        &self,
        handle: u32,
        connection_handle: u32,
        reason: &str,
    ) -> EngineResult<()> {
        self.check_open()?;
        let (_, their_did) = self.connection_dids(connection_handle).await?;
        let entry = self.disclosed_proofs.entry(handle)?;
        let mut proof = entry.lock().await;
        proof
            .decline_request(self.transport.as_ref(), &their_did, reason)
            .await
    }

    pub async fn disclosed_proof_update_state(
        &self,
        handle: u32,
        connection_handle: u32,
    ) -> EngineResult<ProverState> {
        self.check_open()?;
        let (our_did, _) = self.connection_dids(connection_handle).await?;
        let entry = self.disclosed_proofs.entry(handle)?;
        let mut proof = entry.lock().await;
        proof.update_state(self.transport.as_ref(), &our_did).await?;
        Ok(proof.state())
    }

    pub async fn disclosed_proof_update_state_with_message(
        &self,
        handle: u32,
        message_json: &str,
    ) -> EngineResult<ProverState> {
        self.check_open()?;
        let message = ProtocolMessage::from_json(message_json)?;
        let entry = self.disclosed_proofs.entry(handle)?;
        let mut proof = entry.lock().await;
        proof.handle_message(&message)?;
        Ok(proof.state())
    }

    pub async fn disclosed_proof_get_state(&self, handle: u32) -> EngineResult<ProverState> {
        self.check_open()?;
        let entry = self.disclosed_proofs.entry(handle)?;
        let proof = entry.lock().await;
        Ok(proof.state())
    }

    pub async fn disclosed_proof_serialize(&self, handle: u32) -> EngineResult<String> {
        self.check_open()?;
        let entry = self.disclosed_proofs.entry(handle)?;
        let proof = entry.lock().await;
        proof.to_string()
    }

    pub fn disclosed_proof_deserialize(&self, snapshot: &str) -> EngineResult<u32> {
        self.check_open()?;
        self.disclosed_proofs
            .add(DisclosedProof::from_string(snapshot)?)
    }

    pub fn disclosed_proof_release(&self, handle: u32) -> EngineResult<()> {
        self.disclosed_proofs.release(handle)
    }
}
