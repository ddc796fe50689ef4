//! Multi-ledger Verifiable Data Registry.
//!
//! Routes fully-qualified DID / schema / credential definition identifiers to
//! registered ledger adapters (Indy, Cheqd) through a namespace registry,
//! with read-through resolution caching and a prepare / externally-sign /
//! submit transaction pipeline. Signing keys never enter this crate: prepare
//! operations emit `bytes_to_sign` and callers hand detached signatures back.

pub mod cache;
pub mod error;
pub mod id;
pub mod ledger;
pub mod transport;
pub mod types;
pub mod vdr;

pub use error::{VdrError, VdrResult};
pub use id::FullyQualifiedId;
pub use ledger::{Ledger, LedgerKind};
pub use transport::LedgerTransport;
pub use types::{
    CacheOptions, CredDefDocument, DidDocument, EndorsementSpec, PingStatus, PreparedTxn,
    ResourceType, SchemaDocument, SignatureSpec, TaaConfig,
};
pub use vdr::{Vdr, VdrBuilder};

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use crate::transport::in_memory::{keyed_signature, InMemoryLedgerNode};
    use crate::types::{CacheOptions, SchemaDocument};
    use crate::vdr::Vdr;

    fn genesis() -> String {
        json!({"txn": {"type": "0", "data": {"alias": "Node1"}}}).to_string() + "\n"
    }

    #[tokio::test]
    async fn schema_lifecycle_across_the_full_pipeline() {
        let node = Arc::new(InMemoryLedgerNode::new());
        node.seed_did("did:indy:sovrin:issuer", "issuer-vk");

        let mut builder = Vdr::builder();
        builder
            .register_indy_ledger(&["sovrin".to_string()], &genesis(), None, node.clone())
            .unwrap();
        let vdr = builder.finalize();

        let schema_id = "did:indy:sovrin:issuer/anoncreds/v0/SCHEMA/licence/1.0";
        let schema = json!({
            "id": schema_id,
            "name": "licence",
            "version": "1.0",
            "attrNames": ["name", "licence_no"],
        });

        // prepare, sign externally, submit
        let prepared = vdr
            .prepare_schema_txn(&schema.to_string(), "did:indy:sovrin:issuer", None)
            .await
            .unwrap();
        let signature = keyed_signature("issuer-vk", &prepared.bytes_to_sign);
        vdr.submit_txn(
            &prepared.namespace,
            prepared.signature_spec,
            &prepared.txn_bytes,
            &signature,
            None,
        )
        .await
        .unwrap();

        // resolve, once cold and once through the cache
        let resolved = vdr.resolve_schema(schema_id).await.unwrap();
        let resolved: SchemaDocument = serde_json::from_str(&resolved).unwrap();
        assert_eq!(resolved.name, "licence");
        assert_eq!(resolved.attr_names, vec!["name", "licence_no"]);

        let submissions = node.submission_count();
        let cached = vdr
            .resolve_schema_with_cache(schema_id, &CacheOptions::default())
            .await
            .unwrap();
        // first cached call fetches and stores
        assert_eq!(node.submission_count(), submissions + 1);
        let again = vdr
            .resolve_schema_with_cache(schema_id, &CacheOptions::default())
            .await
            .unwrap();
        assert_eq!(node.submission_count(), submissions + 1);
        assert_eq!(cached, again);
    }
}
