use std::str::from_utf8;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::trace;
use url::Url;

use crate::error::{VdrError, VdrResult};
use crate::id::FullyQualifiedId;
use crate::ledger::{Ledger, LedgerKind};
use crate::transport::LedgerTransport;
use crate::types::{EndorsementSpec, PingStatus};

/// Adapter for Cheqd-family ledgers: chain id plus an RPC node address list,
/// reached through an ABCI-style query/broadcast envelope.
pub struct CheqdLedger {
    name: String,
    chain_id: String,
    rpc_addresses: Vec<String>,
    transport: Arc<dyn LedgerTransport>,
}

impl CheqdLedger {
    pub fn create(
        chain_id: &str,
        rpc_addresses: &[String],
        transport: Arc<dyn LedgerTransport>,
    ) -> VdrResult<Self> {
        if chain_id.trim().is_empty() {
            return Err(VdrError::InvalidInput("chain id is empty".to_string()));
        }
        if rpc_addresses.is_empty() {
            return Err(VdrError::InvalidInput(
                "at least one rpc node address is required".to_string(),
            ));
        }
        for address in rpc_addresses {
            Url::parse(address).map_err(|err| {
                VdrError::InvalidInput(format!("invalid rpc node address {address}: {err}"))
            })?;
        }

        Ok(CheqdLedger {
            name: uuid::Uuid::new_v4().to_string(),
            chain_id: chain_id.to_string(),
            rpc_addresses: rpc_addresses.to_vec(),
            transport,
        })
    }

    pub fn chain_id(&self) -> &str {
        &self.chain_id
    }

    pub fn rpc_addresses(&self) -> &[String] {
        &self.rpc_addresses
    }

    /// A sign doc carrying one message, authored by the submitter. The doc
    /// bytes are both the transaction and the bytes to sign.
    fn sign_doc(
        &self,
        submitter_did: &str,
        msg_type: &str,
        value: Value,
    ) -> VdrResult<(Vec<u8>, Vec<u8>)> {
        FullyQualifiedId::parse(submitter_did)?;
        let doc = json!({
            "chain_id": self.chain_id,
            "author": submitter_did,
            "memo": "",
            "msgs": [ { "type": msg_type, "value": value } ],
        });
        let bytes = serde_json::to_vec(&doc)
            .map_err(|err| VdrError::Internal(format!("cannot serialize sign doc: {err}")))?;
        Ok((bytes.clone(), bytes))
    }

    fn query_request(&self, path: String) -> String {
        json!({ "method": "abci_query", "path": path }).to_string()
    }

    fn check_broadcast(&self, response: &str) -> VdrResult<String> {
        let parsed: Value = serde_json::from_str(response).map_err(|err| VdrError::Ledger {
            message: format!("unparseable ledger response: {err}"),
        })?;
        for phase in ["check_tx", "deliver_tx"] {
            if let Some(code) = parsed.pointer(&format!("/{phase}/code")).and_then(Value::as_i64) {
                if code != 0 {
                    return Err(VdrError::Ledger {
                        message: format!("{phase} failed with code {code}: {parsed}"),
                    });
                }
            }
        }
        Ok(response.to_string())
    }
}

fn value_or_not_found(response: &str, what: &str) -> VdrResult<String> {
    let parsed: Value = serde_json::from_str(response)?;
    match parsed.pointer("/response/value") {
        None | Some(Value::Null) => Err(VdrError::NotFound(format!("{what} not found on ledger"))),
        Some(value) => Ok(value.to_string()),
    }
}

#[async_trait]
impl Ledger for CheqdLedger {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn kind(&self) -> LedgerKind {
        LedgerKind::Cheqd
    }

    async fn ping(&self) -> VdrResult<PingStatus> {
        let request = json!({ "method": "abci_info" }).to_string();
        match self.transport.submit(&request).await {
            Ok(response) => Ok(PingStatus::success(response)),
            Err(err) => Ok(PingStatus::fail(err)),
        }
    }

    async fn submit_txn(
        &self,
        txn_bytes: &[u8],
        signature: &[u8],
        endorsement: Option<&str>,
    ) -> VdrResult<String> {
        trace!(signature_len = signature.len(), "cheqd submit_txn");
        let mut request = json!({
            "method": "broadcast_tx_commit",
            "tx": hex::encode(txn_bytes),
            "signature": hex::encode(signature),
        });
        if let Some(endorsement) = endorsement {
            let endorsement: Value = serde_json::from_str(endorsement).map_err(|err| {
                VdrError::InvalidInput(format!("malformed endorsement: {err}"))
            })?;
            request
                .as_object_mut()
                .expect("literal object")
                .insert("endorsement".into(), endorsement);
        }

        let response = self.transport.submit(&request.to_string()).await?;
        self.check_broadcast(&response)
    }

    async fn submit_raw_txn(&self, txn_bytes: &[u8]) -> VdrResult<String> {
        // raw transactions are a pre-encoded broadcast envelope
        let request = from_utf8(txn_bytes).map_err(|err| {
            VdrError::InvalidInput(format!("transaction bytes are not valid utf-8: {err}"))
        })?;
        let response = self.transport.submit(request).await?;
        self.check_broadcast(&response)
    }

    async fn submit_query(&self, query: &str) -> VdrResult<String> {
        self.transport.submit(query).await
    }

    async fn build_did_request(
        &self,
        txn_params: &str,
        submitter_did: &str,
        endorser: Option<&str>,
    ) -> VdrResult<(Vec<u8>, Vec<u8>)> {
        let _ = endorser;
        let doc: crate::types::DidDocument = serde_json::from_str(txn_params).map_err(|err| {
            VdrError::InvalidInput(format!("malformed did txn params {txn_params:?}: {err}"))
        })?;
        self.sign_doc(submitter_did, "MsgCreateDidDoc", json!(doc))
    }

    async fn build_schema_request(
        &self,
        txn_params: &str,
        submitter_did: &str,
        endorser: Option<&str>,
    ) -> VdrResult<(Vec<u8>, Vec<u8>)> {
        let _ = endorser;
        let schema: crate::types::SchemaDocument =
            serde_json::from_str(txn_params).map_err(|err| {
                VdrError::InvalidInput(format!("malformed schema params {txn_params:?}: {err}"))
            })?;
        self.sign_doc(submitter_did, "MsgCreateSchema", json!(schema))
    }

    async fn build_cred_def_request(
        &self,
        txn_params: &str,
        submitter_did: &str,
        endorser: Option<&str>,
    ) -> VdrResult<(Vec<u8>, Vec<u8>)> {
        let _ = endorser;
        let cred_def: crate::types::CredDefDocument =
            serde_json::from_str(txn_params).map_err(|err| {
                VdrError::InvalidInput(format!("malformed cred def params {txn_params:?}: {err}"))
            })?;
        self.sign_doc(submitter_did, "MsgCreateCredDef", json!(cred_def))
    }

    async fn build_resolve_did_request(&self, id: &str) -> VdrResult<String> {
        FullyQualifiedId::parse(id)?;
        Ok(self.query_request(format!("/did/{}", urlencoding::encode(id))))
    }

    async fn build_resolve_schema_request(&self, id: &str) -> VdrResult<String> {
        FullyQualifiedId::parse(id)?;
        Ok(self.query_request(format!("/resource/schema/{}", urlencoding::encode(id))))
    }

    async fn build_resolve_cred_def_request(&self, id: &str) -> VdrResult<String> {
        FullyQualifiedId::parse(id)?;
        Ok(self.query_request(format!("/resource/cred_def/{}", urlencoding::encode(id))))
    }

    async fn parse_resolve_did_response(&self, response: &str) -> VdrResult<String> {
        value_or_not_found(response, "did")
    }

    async fn parse_resolve_schema_response(&self, response: &str) -> VdrResult<String> {
        value_or_not_found(response, "schema")
    }

    async fn parse_resolve_cred_def_response(&self, response: &str) -> VdrResult<String> {
        value_or_not_found(response, "cred def")
    }

    fn prepare_endorsement_spec(
        &self,
        endorser: Option<&str>,
    ) -> VdrResult<Option<EndorsementSpec>> {
        Ok(endorser.map(|endorser| EndorsementSpec::Cheqd {
            txn_author: endorser.to_string(),
        }))
    }

    async fn cleanup(&self) -> VdrResult<()> {
        trace!(name = %self.name, "cheqd ledger cleanup");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::in_memory::{keyed_signature, InMemoryLedgerNode};

    #[test]
    fn create_validates_config() {
        let node = Arc::new(InMemoryLedgerNode::with_chain_id("cheqd-testnet-6"));
        assert!(CheqdLedger::create("", &["http://localhost:26657".into()], node.clone()).is_err());
        assert!(CheqdLedger::create("cheqd-testnet-6", &[], node.clone()).is_err());
        assert!(CheqdLedger::create("cheqd-testnet-6", &["nope".into()], node.clone()).is_err());
        let ledger = CheqdLedger::create(
            "cheqd-testnet-6",
            &["http://localhost:26657".into()],
            node,
        )
        .unwrap();
        assert_eq!(ledger.chain_id(), "cheqd-testnet-6");
    }

    #[tokio::test]
    async fn ping_reports_chain_info() {
        let node = Arc::new(InMemoryLedgerNode::with_chain_id("cheqd-testnet-6"));
        let ledger = CheqdLedger::create(
            "cheqd-testnet-6",
            &["http://localhost:26657".into()],
            node,
        )
        .unwrap();
        let status = ledger.ping().await.unwrap();
        assert!(status.is_success());
        assert!(status.message.contains("cheqd-testnet-6"));
    }

    #[tokio::test]
    async fn did_write_and_resolve() {
        let node = Arc::new(InMemoryLedgerNode::with_chain_id("cheqd-testnet-6"));
        node.seed_did("did:cheqd:testnet:author", "author-vk");
        let ledger = CheqdLedger::create(
            "cheqd-testnet-6",
            &["http://localhost:26657".into()],
            node,
        )
        .unwrap();

        let params = json!({
            "did": "did:cheqd:testnet:abc",
            "verkey": "vk-abc",
        })
        .to_string();
        let (txn_bytes, bytes_to_sign) = ledger
            .build_did_request(&params, "did:cheqd:testnet:author", None)
            .await
            .unwrap();
        let signature = keyed_signature("author-vk", &bytes_to_sign);
        ledger.submit_txn(&txn_bytes, &signature, None).await.unwrap();

        let request = ledger
            .build_resolve_did_request("did:cheqd:testnet:abc")
            .await
            .unwrap();
        let response = ledger.submit_query(&request).await.unwrap();
        let doc = ledger.parse_resolve_did_response(&response).await.unwrap();
        let doc: Value = serde_json::from_str(&doc).unwrap();
        assert_eq!(doc["verkey"], "vk-abc");
    }
}
