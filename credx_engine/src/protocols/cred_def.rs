use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::trace;

use multiledger_vdr::{CredDefDocument, Vdr, VdrError};

use crate::error::{EngineError, EngineResult};
use crate::protocols::{from_snapshot, to_snapshot, PublishState};
use crate::signer::TxnSigner;

/// A credential definition: binds an issuer's public key material to a
/// published schema. Local on creation, published once written to the
/// ledger; `update_state` is a convergence check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredDefObject {
    pub source_id: String,
    pub state: PublishState,
    pub cred_def: CredDefDocument,
    pub submitter_did: String,
    pub support_revocation: bool,
}

impl CredDefObject {
    pub fn create(
        source_id: &str,
        submitter_did: &str,
        schema_id: &str,
        tag: &str,
        support_revocation: bool,
    ) -> EngineResult<Self> {
        if tag.trim().is_empty() {
            return Err(EngineError::InvalidInput(
                "credential definition tag is empty".to_string(),
            ));
        }
        let id = format!("{submitter_did}/anoncreds/v0/CLAIM_DEF/{tag}");
        // key material itself comes from the proof backend; the definition
        // carries its shape
        let value = json!({
            "primary": { "ref": schema_id },
            "revocation": if support_revocation { json!({}) } else { json!(null) },
        });
        Ok(CredDefObject {
            source_id: source_id.to_string(),
            state: PublishState::Created,
            cred_def: CredDefDocument {
                id,
                schema_id: schema_id.to_string(),
                signature_type: "CL".to_string(),
                tag: tag.to_string(),
                value,
            },
            submitter_did: submitter_did.to_string(),
            support_revocation,
        })
    }

    pub fn id(&self) -> &str {
        &self.cred_def.id
    }

    pub fn state(&self) -> PublishState {
        self.state
    }

    pub async fn publish(&mut self, vdr: &Vdr, signer: &dyn TxnSigner) -> EngineResult<()> {
        if self.state == PublishState::Published {
            return Err(EngineError::InvalidState(
                "credential definition is already published".to_string(),
            ));
        }
        let params = serde_json::to_string(&self.cred_def).map_err(|err| {
            EngineError::Internal(format!("cannot serialize cred def: {err}"))
        })?;
        let prepared = vdr
            .prepare_creddef_txn(&params, &self.submitter_did, None)
            .await?;
        let signature = signer
            .sign(prepared.signature_spec, &prepared.bytes_to_sign)
            .await?;
        vdr.submit_txn(
            &prepared.namespace,
            prepared.signature_spec,
            &prepared.txn_bytes,
            &signature,
            None,
        )
        .await?;
        self.state = PublishState::Published;
        trace!(source_id = %self.source_id, id = %self.cred_def.id, "cred def published");
        Ok(())
    }

    pub async fn update_state(&mut self, vdr: &Vdr) -> EngineResult<PublishState> {
        match vdr.resolve_creddef(&self.cred_def.id).await {
            Ok(_) => self.state = PublishState::Published,
            Err(VdrError::NotFound(_)) => self.state = PublishState::Created,
            Err(err) => return Err(err.into()),
        }
        Ok(self.state)
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
    use crate::signer::KeyedDigestSigner;
    use multiledger_vdr::transport::in_memory::InMemoryLedgerNode;
    use std::sync::Arc;

    #[tokio::test]
    async fn publish_and_converge() {
        let node = Arc::new(InMemoryLedgerNode::new());
        node.seed_did("did:indy:sovrin:issuer", "issuer-vk");
        let genesis = serde_json::json!({"txn": {"type": "0"}}).to_string() + "\n";
        let mut builder = Vdr::builder();
        builder
            .register_indy_ledger(&["sovrin".to_string()], &genesis, None, node)
            .unwrap();
        let vdr = builder.finalize();
        let signer = KeyedDigestSigner::new("issuer-vk");

        let mut cred_def = CredDefObject::create(
            "cd-1",
            "did:indy:sovrin:issuer",
            "did:indy:sovrin:issuer/anoncreds/v0/SCHEMA/licence/1.0",
            "default",
            true,
        )
        .unwrap();

        assert_eq!(cred_def.update_state(&vdr).await.unwrap(), PublishState::Created);
        cred_def.publish(&vdr, &signer).await.unwrap();
        assert_eq!(cred_def.state(), PublishState::Published);
        assert_eq!(
            cred_def.update_state(&vdr).await.unwrap(),
            PublishState::Published
        );
    }

    #[test]
    fn blank_tag_is_rejected() {
        assert!(CredDefObject::create("cd", "did:indy:sovrin:issuer", "s-id", " ", false).is_err());
    }
}
