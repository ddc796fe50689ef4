use serde::{Deserialize, Serialize};
use tracing::trace;

use multiledger_vdr::{SchemaDocument, Vdr, VdrError};

use crate::error::{EngineError, EngineResult};
use crate::protocols::{from_snapshot, to_snapshot, PublishState};
use crate::signer::TxnSigner;

/// A credential schema: local on creation, published once it has been written
/// to the ledger. `update_state` is a convergence check against the ledger,
/// not a push.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaObject {
    pub source_id: String,
    pub state: PublishState,
    pub schema: SchemaDocument,
    pub submitter_did: String,
}

impl SchemaObject {
    pub fn create(
        source_id: &str,
        submitter_did: &str,
        name: &str,
        version: &str,
        attr_names: Vec<String>,
    ) -> EngineResult<Self> {
        if attr_names.is_empty() {
            return Err(EngineError::InvalidInput(
                "schema requires at least one attribute".to_string(),
            ));
        }
        let id = format!("{submitter_did}/anoncreds/v0/SCHEMA/{name}/{version}");
        Ok(SchemaObject {
            source_id: source_id.to_string(),
            state: PublishState::Created,
            schema: SchemaDocument {
                id,
                name: name.to_string(),
                version: version.to_string(),
                attr_names,
            },
            submitter_did: submitter_did.to_string(),
        })
    }

    pub fn id(&self) -> &str {
        &self.schema.id
    }

    pub fn state(&self) -> PublishState {
        self.state
    }

    /// Prepare, externally sign and submit the schema transaction. Moves to
    /// Published only when the ledger accepts the write.
    pub async fn publish(&mut self, vdr: &Vdr, signer: &dyn TxnSigner) -> EngineResult<()> {
        if self.state == PublishState::Published {
            return Err(EngineError::InvalidState(
                "schema is already published".to_string(),
            ));
        }
        let params = serde_json::to_string(&self.schema)
            .map_err(|err| EngineError::Internal(format!("cannot serialize schema: {err}")))?;
        let prepared = vdr
            .prepare_schema_txn(&params, &self.submitter_did, None)
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
        trace!(source_id = %self.source_id, id = %self.schema.id, "schema published");
        Ok(())
    }

    /// Check ledger presence and flip local state accordingly.
    pub async fn update_state(&mut self, vdr: &Vdr) -> EngineResult<PublishState> {
        match vdr.resolve_schema(&self.schema.id).await {
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
    use serde_json::json;
    use std::sync::Arc;

    fn vdr(node: Arc<InMemoryLedgerNode>) -> Vdr {
        let genesis = json!({"txn": {"type": "0"}}).to_string() + "\n";
        let mut builder = Vdr::builder();
        builder
            .register_indy_ledger(&["sovrin".to_string()], &genesis, None, node)
            .unwrap();
        builder.finalize()
    }

    #[tokio::test]
    async fn publish_then_converge() {
        let node = Arc::new(InMemoryLedgerNode::new());
        node.seed_did("did:indy:sovrin:issuer", "issuer-vk");
        let vdr = vdr(node);
        let signer = KeyedDigestSigner::new("issuer-vk");

        let mut schema = SchemaObject::create(
            "schema-1",
            "did:indy:sovrin:issuer",
            "licence",
            "1.0",
            vec!["name".to_string(), "licence_no".to_string()],
        )
        .unwrap();
        assert_eq!(schema.state(), PublishState::Created);

        // convergence check before the write still reports Created
        assert_eq!(schema.update_state(&vdr).await.unwrap(), PublishState::Created);

        schema.publish(&vdr, &signer).await.unwrap();
        assert_eq!(schema.state(), PublishState::Published);

        // republishing is a state error
        assert!(matches!(
            schema.publish(&vdr, &signer).await,
            Err(EngineError::InvalidState(_))
        ));

        // a restored copy converges to Published by looking at the ledger
        let mut restored =
            SchemaObject::from_string(&schema.to_string().unwrap()).unwrap();
        restored.state = PublishState::Created;
        assert_eq!(restored.update_state(&vdr).await.unwrap(), PublishState::Published);
    }

    #[test]
    fn empty_attribute_list_is_rejected() {
        let err = SchemaObject::create("s", "did:indy:sovrin:issuer", "licence", "1.0", vec![])
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidInput(_)));
    }
}
