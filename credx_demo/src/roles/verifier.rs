use std::sync::Arc;

use anyhow::Result;
use credx_engine::CredxEngine;

/// Verifier side of the demo. In this walk Faber both issues and verifies,
/// reusing its connection to Alice.
pub struct Verifier {
    engine: Arc<CredxEngine>,
    protocol_data: VerifierProtocolFlowData,
}

#[derive(Default)]
pub struct VerifierProtocolFlowData {
    pub proof: Option<u32>,
}

impl Verifier {
    pub fn bootstrap(engine: Arc<CredxEngine>) -> Self {
        Verifier {
            engine,
            protocol_data: Default::default(),
        }
    }

    pub async fn request_presentation(&mut self, connection: u32) -> Result<()> {
        let proof = self
            .engine
            .proof_create("faber-verifies", "degree-check", r#"["degree"]"#)?;
        self.engine.proof_send_request(proof, connection).await?;
        self.protocol_data.proof = Some(proof);
        Ok(())
    }

    /// Pull the presentation and report whether it satisfied the request.
    pub async fn verify_presentation(&self, connection: u32) -> Result<bool> {
        let proof = self.protocol_data.proof.expect("no request sent");
        self.engine.proof_update_state(proof, connection).await?;
        Ok(self.engine.proof_is_valid(proof).await?)
    }
}
