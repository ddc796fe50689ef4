use std::str::from_utf8;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tracing::trace;

use crate::error::{VdrError, VdrResult};
use crate::id::FullyQualifiedId;
use crate::ledger::{Ledger, LedgerKind};
use crate::transport::LedgerTransport;
use crate::types::{EndorsementSpec, PingStatus, TaaConfig};

// Indy transaction type codes
const NYM: &str = "1";
const GET_TXN: &str = "3";
const SCHEMA: &str = "101";
const CLAIM_DEF: &str = "102";
const GET_NYM: &str = "105";
const GET_SCHEMA: &str = "107";
const GET_CLAIM_DEF: &str = "108";

#[derive(Deserialize)]
struct NymTxnParams {
    dest: String,
    verkey: Option<String>,
    alias: Option<String>,
    role: Option<String>,
}

/// Adapter for Indy-family ledgers, bootstrapped from genesis transaction
/// data with optional transaction-author-agreement enforcement.
pub struct IndyLedger {
    name: String,
    genesis_txn_count: usize,
    taa: Option<TaaConfig>,
    transport: Arc<dyn LedgerTransport>,
}

impl IndyLedger {
    pub fn create(
        genesis_txn: &str,
        taa: Option<TaaConfig>,
        transport: Arc<dyn LedgerTransport>,
    ) -> VdrResult<Self> {
        // node transactions must be located in separate lines
        let mut count = 0;
        for line in genesis_txn.lines().filter(|l| !l.trim().is_empty()) {
            serde_json::from_str::<Value>(line).map_err(|err| {
                VdrError::InvalidInput(format!("malformed genesis transaction {line:?}: {err}"))
            })?;
            count += 1;
        }
        if count == 0 {
            return Err(VdrError::InvalidInput(
                "genesis transaction data is empty".to_string(),
            ));
        }
        if let Some(taa) = &taa {
            taa.validate()?;
        }

        Ok(IndyLedger {
            name: uuid::Uuid::new_v4().to_string(),
            genesis_txn_count: count,
            taa,
            transport,
        })
    }

    pub fn genesis_txn_count(&self) -> usize {
        self.genesis_txn_count
    }

    fn request_envelope(&self, submitter_did: &str, operation: Value) -> Value {
        json!({
            "identifier": submitter_did,
            "reqId": uuid::Uuid::new_v4().as_u128() as u64,
            "protocolVersion": 2,
            "operation": operation,
        })
    }

    fn write_request(
        &self,
        submitter_did: &str,
        operation: Value,
        endorser: Option<&str>,
    ) -> VdrResult<(Vec<u8>, Vec<u8>)> {
        // the submitter id also routes the transaction, so it must parse
        FullyQualifiedId::parse(submitter_did)?;

        let mut request = self.request_envelope(submitter_did, operation);
        let map = request
            .as_object_mut()
            .ok_or_else(|| VdrError::Internal("request envelope is not an object".to_string()))?;

        if let Some(taa) = &self.taa {
            map.insert("taaAcceptance".into(), taa_acceptance(taa));
        }
        if let Some(endorser) = endorser {
            map.insert("endorser".into(), json!(endorser));
        }

        let bytes = serde_json::to_vec(&request)
            .map_err(|err| VdrError::Internal(format!("cannot serialize request: {err}")))?;
        // Indy signs the full request body
        Ok((bytes.clone(), bytes))
    }

    fn read_request(&self, txn_type: &str, dest: &str) -> VdrResult<String> {
        FullyQualifiedId::parse(dest)?;
        let request = json!({
            "reqId": uuid::Uuid::new_v4().as_u128() as u64,
            "operation": { "type": txn_type, "dest": dest },
        });
        Ok(request.to_string())
    }
}

/// Unwrap an Indy node reply, surfacing REJECT/REQNACK reasons verbatim.
fn check_reply(response: &str) -> VdrResult<Value> {
    let response: Value = serde_json::from_str(response).map_err(|err| VdrError::Ledger {
        message: format!("unparseable ledger response: {err}"),
    })?;
    match response.get("op").and_then(Value::as_str) {
        Some("REPLY") => Ok(response["result"].clone()),
        _ => Err(VdrError::Ledger {
            message: response
                .get("reason")
                .and_then(Value::as_str)
                .unwrap_or(&response.to_string())
                .to_string(),
        }),
    }
}

fn taa_acceptance(taa: &TaaConfig) -> Value {
    let digest = match &taa.taa_digest {
        Some(digest) => digest.clone(),
        // digest over version || text, as the ledger computes it
        None => {
            let mut hasher = Sha256::new();
            hasher.update(taa.version.as_deref().unwrap_or_default().as_bytes());
            hasher.update(taa.text.as_deref().unwrap_or_default().as_bytes());
            hex::encode(hasher.finalize())
        }
    };
    json!({
        "mechanism": taa.acc_mech_type,
        "taaDigest": digest,
        "time": taa.acceptance_time(),
    })
}

fn data_or_not_found(result: Value, what: &str) -> VdrResult<String> {
    match result.get("data") {
        None | Some(Value::Null) => Err(VdrError::NotFound(format!("{what} not found on ledger"))),
        Some(data) => Ok(data.to_string()),
    }
}

#[async_trait]
impl Ledger for IndyLedger {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn kind(&self) -> LedgerKind {
        LedgerKind::Indy
    }

    async fn ping(&self) -> VdrResult<PingStatus> {
        let request = json!({
            "reqId": uuid::Uuid::new_v4().as_u128() as u64,
            "operation": { "type": GET_TXN, "ledgerId": 0, "data": 1 },
        });
        match self.transport.submit(&request.to_string()).await {
            Ok(response) => match check_reply(&response) {
                Ok(result) => Ok(PingStatus::success(result.to_string())),
                Err(err) => Ok(PingStatus::fail(err)),
            },
            Err(err) => Ok(PingStatus::fail(err)),
        }
    }

    async fn submit_txn(
        &self,
        txn_bytes: &[u8],
        signature: &[u8],
        endorsement: Option<&str>,
    ) -> VdrResult<String> {
        trace!(signature_len = signature.len(), "indy submit_txn");
        let txn = from_utf8(txn_bytes).map_err(|err| {
            VdrError::InvalidInput(format!("transaction bytes are not valid utf-8: {err}"))
        })?;
        let mut request: Value = serde_json::from_str(txn)
            .map_err(|err| VdrError::InvalidInput(format!("malformed transaction: {err}")))?;
        let map = request.as_object_mut().ok_or_else(|| {
            VdrError::InvalidInput("transaction is not a request object".to_string())
        })?;

        map.insert("signature".into(), json!(hex::encode(signature)));
        if let Some(endorsement) = endorsement {
            let endorsement: Value = serde_json::from_str(endorsement).map_err(|err| {
                VdrError::InvalidInput(format!("malformed endorsement: {err}"))
            })?;
            let endorser_signature = endorsement
                .get("signature")
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    VdrError::InvalidInput("endorsement has no signature".to_string())
                })?;
            map.insert("endorserSignature".into(), json!(endorser_signature));
        }

        let response = self.transport.submit(&request.to_string()).await?;
        check_reply(&response).map(|result| result.to_string())
    }

    async fn submit_raw_txn(&self, txn_bytes: &[u8]) -> VdrResult<String> {
        let txn = from_utf8(txn_bytes).map_err(|err| {
            VdrError::InvalidInput(format!("transaction bytes are not valid utf-8: {err}"))
        })?;
        let response = self.transport.submit(txn).await?;
        check_reply(&response).map(|result| result.to_string())
    }

    async fn submit_query(&self, query: &str) -> VdrResult<String> {
        let response = self.transport.submit(query).await?;
        check_reply(&response).map(|result| result.to_string())
    }

    async fn build_did_request(
        &self,
        txn_params: &str,
        submitter_did: &str,
        endorser: Option<&str>,
    ) -> VdrResult<(Vec<u8>, Vec<u8>)> {
        let params: NymTxnParams = serde_json::from_str(txn_params).map_err(|err| {
            VdrError::InvalidInput(format!("malformed did txn params {txn_params:?}: {err}"))
        })?;

        let mut operation = json!({ "type": NYM, "dest": params.dest });
        let op = operation.as_object_mut().expect("literal object");
        if let Some(verkey) = params.verkey {
            op.insert("verkey".into(), json!(verkey));
        }
        if let Some(alias) = params.alias {
            op.insert("alias".into(), json!(alias));
        }
        if let Some(role) = params.role {
            op.insert("role".into(), json!(role));
        }

        self.write_request(submitter_did, operation, endorser)
    }

    async fn build_schema_request(
        &self,
        txn_params: &str,
        submitter_did: &str,
        endorser: Option<&str>,
    ) -> VdrResult<(Vec<u8>, Vec<u8>)> {
        let schema: crate::types::SchemaDocument =
            serde_json::from_str(txn_params).map_err(|err| {
                VdrError::InvalidInput(format!("malformed schema params {txn_params:?}: {err}"))
            })?;
        self.write_request(
            submitter_did,
            json!({ "type": SCHEMA, "data": schema }),
            endorser,
        )
    }

    async fn build_cred_def_request(
        &self,
        txn_params: &str,
        submitter_did: &str,
        endorser: Option<&str>,
    ) -> VdrResult<(Vec<u8>, Vec<u8>)> {
        let cred_def: crate::types::CredDefDocument =
            serde_json::from_str(txn_params).map_err(|err| {
                VdrError::InvalidInput(format!("malformed cred def params {txn_params:?}: {err}"))
            })?;
        self.write_request(
            submitter_did,
            json!({ "type": CLAIM_DEF, "data": cred_def }),
            endorser,
        )
    }

    async fn build_resolve_did_request(&self, id: &str) -> VdrResult<String> {
        self.read_request(GET_NYM, id)
    }

    async fn build_resolve_schema_request(&self, id: &str) -> VdrResult<String> {
        self.read_request(GET_SCHEMA, id)
    }

    async fn build_resolve_cred_def_request(&self, id: &str) -> VdrResult<String> {
        self.read_request(GET_CLAIM_DEF, id)
    }

    async fn parse_resolve_did_response(&self, response: &str) -> VdrResult<String> {
        let result: Value = serde_json::from_str(response)?;
        data_or_not_found(result, "did")
    }

    async fn parse_resolve_schema_response(&self, response: &str) -> VdrResult<String> {
        let result: Value = serde_json::from_str(response)?;
        data_or_not_found(result, "schema")
    }

    async fn parse_resolve_cred_def_response(&self, response: &str) -> VdrResult<String> {
        let result: Value = serde_json::from_str(response)?;
        data_or_not_found(result, "cred def")
    }

    fn prepare_endorsement_spec(
        &self,
        endorser: Option<&str>,
    ) -> VdrResult<Option<EndorsementSpec>> {
        Ok(endorser.map(|endorser| EndorsementSpec::Indy {
            endorser_did: endorser.to_string(),
        }))
    }

    async fn cleanup(&self) -> VdrResult<()> {
        trace!(name = %self.name, "indy ledger cleanup");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::InMemoryLedgerNode;

    fn genesis() -> String {
        format!(
            "{}\n{}\n",
            json!({"txn": {"type": "0", "data": {"alias": "Node1"}}}),
            json!({"txn": {"type": "0", "data": {"alias": "Node2"}}}),
        )
    }

    #[test]
    fn create_validates_genesis() {
        let node = Arc::new(InMemoryLedgerNode::new());
        let ledger = IndyLedger::create(&genesis(), None, node.clone()).unwrap();
        assert_eq!(ledger.genesis_txn_count(), 2);

        assert!(IndyLedger::create("", None, node.clone()).is_err());
        assert!(IndyLedger::create("not json\n", None, node).is_err());
    }

    #[tokio::test]
    async fn did_request_roundtrip() {
        let node = Arc::new(InMemoryLedgerNode::new());
        node.seed_did("did:indy:test:trustee", "trustee-vk");
        let ledger = IndyLedger::create(&genesis(), None, node.clone()).unwrap();

        let (txn_bytes, bytes_to_sign) = ledger
            .build_did_request(
                &json!({"dest": "did:indy:test:abc", "verkey": "vk-abc"}).to_string(),
                "did:indy:test:trustee",
                None,
            )
            .await
            .unwrap();
        assert_eq!(txn_bytes, bytes_to_sign);

        let signature = crate::transport::in_memory::keyed_signature("trustee-vk", &bytes_to_sign);
        ledger.submit_txn(&txn_bytes, &signature, None).await.unwrap();

        let request = ledger
            .build_resolve_did_request("did:indy:test:abc")
            .await
            .unwrap();
        let response = ledger.submit_query(&request).await.unwrap();
        let doc = ledger.parse_resolve_did_response(&response).await.unwrap();
        let doc: Value = serde_json::from_str(&doc).unwrap();
        assert_eq!(doc["verkey"], "vk-abc");
    }

    #[tokio::test]
    async fn mismatched_signature_is_a_ledger_error() {
        let node = Arc::new(InMemoryLedgerNode::new());
        node.seed_did("did:indy:test:trustee", "trustee-vk");
        let ledger = IndyLedger::create(&genesis(), None, node).unwrap();

        let (txn_bytes, bytes_to_sign) = ledger
            .build_did_request(
                &json!({"dest": "did:indy:test:abc"}).to_string(),
                "did:indy:test:trustee",
                None,
            )
            .await
            .unwrap();

        let mut bad = bytes_to_sign.clone();
        bad.push(0xff);
        let signature = crate::transport::in_memory::keyed_signature("trustee-vk", &bad);
        let err = ledger.submit_txn(&txn_bytes, &signature, None).await.unwrap_err();
        assert!(matches!(err, VdrError::Ledger { ref message } if message.contains("signature")));
    }

    #[tokio::test]
    async fn taa_is_stamped_into_write_requests() {
        let node = Arc::new(InMemoryLedgerNode::new().require_taa("digest-1"));
        node.seed_did("did:indy:test:trustee", "trustee-vk");

        let taa = TaaConfig {
            text: None,
            version: None,
            taa_digest: Some("digest-1".to_string()),
            acc_mech_type: "on_file".to_string(),
            time: 1_700_000_123,
        };
        let ledger = IndyLedger::create(&genesis(), Some(taa), node.clone()).unwrap();
        let (txn_bytes, bytes_to_sign) = ledger
            .build_did_request(
                &json!({"dest": "did:indy:test:abc"}).to_string(),
                "did:indy:test:trustee",
                None,
            )
            .await
            .unwrap();
        let signature = crate::transport::in_memory::keyed_signature("trustee-vk", &bytes_to_sign);
        ledger.submit_txn(&txn_bytes, &signature, None).await.unwrap();

        // without the agreement the node refuses the write
        let bare = IndyLedger::create(&genesis(), None, node).unwrap();
        let (txn_bytes, bytes_to_sign) = bare
            .build_did_request(
                &json!({"dest": "did:indy:test:def"}).to_string(),
                "did:indy:test:trustee",
                None,
            )
            .await
            .unwrap();
        let signature = crate::transport::in_memory::keyed_signature("trustee-vk", &bytes_to_sign);
        assert!(bare.submit_txn(&txn_bytes, &signature, None).await.is_err());
    }
}
