use std::sync::Arc;

use anyhow::{anyhow, Result};
use credx_engine::CredxEngine;

/// Wallet side of the demo: accepts the invitation, requests and stores the
/// credential, answers the proof request.
pub struct Holder {
    engine: Arc<CredxEngine>,
    protocol_data: HolderProtocolFlowData,
}

#[derive(Default)]
pub struct HolderProtocolFlowData {
    pub connection: Option<u32>,
    pub credential: Option<u32>,
    pub disclosed_proof: Option<u32>,
}

impl Holder {
    pub fn bootstrap(engine: Arc<CredxEngine>) -> Self {
        Holder {
            engine,
            protocol_data: Default::default(),
        }
    }

    pub fn connection(&self) -> u32 {
        self.protocol_data.connection.expect("connection not created")
    }

    /// Accept an invitation and run the invitee half of the handshake up to
    /// the request.
    pub async fn accept_invitation(&mut self, invitation: &str) -> Result<()> {
        let connection = self
            .engine
            .connection_create_from_invite("alice-to-faber", "Alice", invitation)?;
        self.engine.connection_connect(connection).await?;
        self.protocol_data.connection = Some(connection);
        Ok(())
    }

    /// After the inviter responded, acknowledge to complete.
    pub async fn finish_connection(&self) -> Result<()> {
        let connection = self.connection();
        self.engine.connection_update_state(connection).await?;
        self.engine.connection_send_ack(connection).await?;
        Ok(())
    }

    /// Take the pending offer and answer it with a credential request.
    pub async fn accept_offer(&mut self) -> Result<()> {
        let connection = self.connection();
        let offers = self.engine.credential_get_offers(connection).await?;
        let offer = offers
            .first()
            .ok_or_else(|| anyhow!("no credential offer waiting"))?;
        let credential = self.engine.credential_create_from_offer("alice-degree", offer)?;
        self.engine.credential_send_request(credential, connection).await?;
        self.protocol_data.credential = Some(credential);
        Ok(())
    }

    /// Pull the issued credential into the wallet object.
    pub async fn store_credential(&self) -> Result<()> {
        let credential = self.protocol_data.credential.expect("no offer accepted");
        self.engine
            .credential_update_state(credential, self.connection())
            .await?;
        Ok(())
    }

    pub async fn credential_attributes(&self) -> Result<String> {
        let credential = self.protocol_data.credential.expect("no credential stored");
        Ok(self.engine.credential_get_attributes(credential).await?)
    }

    /// Answer the pending presentation request from the held credential.
    pub async fn present_credential(&mut self) -> Result<()> {
        let connection = self.connection();
        let requests = self.engine.disclosed_proof_get_requests(connection).await?;
        let request = requests
            .first()
            .ok_or_else(|| anyhow!("no presentation request waiting"))?;
        let disclosed = self
            .engine
            .disclosed_proof_create_from_request("alice-presents", request)?;
        let credential = self.protocol_data.credential.expect("no credential stored");
        self.engine.disclosed_proof_generate(disclosed, credential).await?;
        self.engine.disclosed_proof_send(disclosed, connection).await?;
        self.protocol_data.disclosed_proof = Some(disclosed);
        Ok(())
    }

    /// Wait for the verifier's acknowledgement.
    pub async fn finish_presentation(&self) -> Result<()> {
        let disclosed = self.protocol_data.disclosed_proof.expect("nothing presented");
        self.engine
            .disclosed_proof_update_state(disclosed, self.connection())
            .await?;
        Ok(())
    }

    /// Convergence check of the held credential against the registry.
    pub async fn check_revocation(&self, rev_reg: u32) -> Result<String> {
        let credential = self.protocol_data.credential.expect("no credential stored");
        let state = self
            .engine
            .credential_check_revocation(credential, rev_reg)
            .await?;
        Ok(format!("{state:?}"))
    }
}
