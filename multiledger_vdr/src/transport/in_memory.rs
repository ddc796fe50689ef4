use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use crate::error::{VdrError, VdrResult};
use crate::transport::LedgerTransport;
use crate::types::{CredDefDocument, DidDocument, SchemaDocument};

/// Detached signature used against [`InMemoryLedgerNode`]: a SHA-256 keyed
/// digest over the bytes to sign. This is a stand-in for the external signer
/// contract, not a cryptographic signature scheme; the node exists so flow
/// tests and the demo can run without a live ledger.
pub fn keyed_signature(key: &str, bytes_to_sign: &[u8]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hasher.update([0u8]);
    hasher.update(bytes_to_sign);
    hasher.finalize().to_vec()
}

#[derive(Default)]
struct NodeState {
    nyms: HashMap<String, DidDocument>,
    schemas: HashMap<String, SchemaDocument>,
    cred_defs: HashMap<String, CredDefDocument>,
    height: u64,
}

/// An in-process ledger node speaking both the Indy request envelope and the
/// Cheqd broadcast/query envelope. One instance backs one registered adapter.
pub struct InMemoryLedgerNode {
    chain_id: String,
    state: Mutex<NodeState>,
    required_taa_digest: Option<String>,
    submissions: AtomicUsize,
}

impl InMemoryLedgerNode {
    pub fn new() -> Self {
        InMemoryLedgerNode {
            chain_id: "in-memory".to_string(),
            state: Mutex::new(NodeState::default()),
            required_taa_digest: None,
            submissions: AtomicUsize::new(0),
        }
    }

    pub fn with_chain_id(chain_id: &str) -> Self {
        InMemoryLedgerNode {
            chain_id: chain_id.to_string(),
            ..InMemoryLedgerNode::new()
        }
    }

    /// Make the node reject writes whose taaAcceptance digest does not match.
    pub fn require_taa(mut self, digest: &str) -> Self {
        self.required_taa_digest = Some(digest.to_string());
        self
    }

    /// Seed a DID with write permission, playing the role of a genesis trustee.
    pub fn seed_did(&self, did: &str, verkey: &str) {
        let mut state = self.state.lock().expect("ledger node state poisoned");
        state.nyms.insert(
            did.to_string(),
            DidDocument {
                did: did.to_string(),
                verkey: verkey.to_string(),
                role: Some("TRUSTEE".to_string()),
                alias: None,
            },
        );
    }

    /// Number of requests that reached the node. Lets tests assert that
    /// validation failures never touch the network.
    pub fn submission_count(&self) -> usize {
        self.submissions.load(Ordering::SeqCst)
    }

    fn handle(&self, request: &str) -> VdrResult<String> {
        self.submissions.fetch_add(1, Ordering::SeqCst);
        let request: Value = serde_json::from_str(request)
            .map_err(|err| reject(format!("unparseable request: {err}")))?;

        if request.get("method").is_some() {
            self.handle_cheqd(&request)
        } else {
            self.handle_indy(&request)
        }
    }

    // ---- Indy envelope ----

    fn handle_indy(&self, request: &Value) -> VdrResult<String> {
        let operation = request
            .get("operation")
            .ok_or_else(|| reject("request has no operation"))?;
        let op_type = operation
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| reject("operation has no type"))?;

        match op_type {
            // GET_TXN doubles as the liveness probe
            "3" => {
                let state = self.state.lock().expect("ledger node state poisoned");
                Ok(reply(json!({ "data": { "height": state.height } })))
            }
            "105" | "107" | "108" => self.handle_indy_read(op_type, operation),
            "1" | "101" | "102" => self.handle_indy_write(op_type, request, operation),
            other => Err(reject(format!("unsupported operation type {other}"))),
        }
    }

    fn handle_indy_read(&self, op_type: &str, operation: &Value) -> VdrResult<String> {
        let dest = operation
            .get("dest")
            .and_then(Value::as_str)
            .ok_or_else(|| reject("read operation has no dest"))?;

        let state = self.state.lock().expect("ledger node state poisoned");
        let data = match op_type {
            "105" => state.nyms.get(dest).map(|doc| json!(doc)),
            "107" => state.schemas.get(dest).map(|doc| json!(doc)),
            "108" => state.cred_defs.get(dest).map(|doc| json!(doc)),
            _ => unreachable!(),
        };

        Ok(reply(json!({ "data": data })))
    }

    fn handle_indy_write(
        &self,
        op_type: &str,
        request: &Value,
        operation: &Value,
    ) -> VdrResult<String> {
        let submitter = request
            .get("identifier")
            .and_then(Value::as_str)
            .ok_or_else(|| reject("write request has no identifier"))?;
        let signature = request
            .get("signature")
            .and_then(Value::as_str)
            .ok_or_else(|| reject("write request has no signature"))?;

        if let Some(required) = &self.required_taa_digest {
            let supplied = request
                .pointer("/taaAcceptance/taaDigest")
                .and_then(Value::as_str);
            if supplied != Some(required.as_str()) {
                return Err(reject("transaction author agreement not accepted"));
            }
        }

        // recompute the signed bytes: the request without its signature fields
        let mut unsigned = request.clone();
        if let Some(map) = unsigned.as_object_mut() {
            map.remove("signature");
            map.remove("endorserSignature");
        }
        let unsigned_bytes = serde_json::to_vec(&unsigned)
            .map_err(|err| reject(format!("cannot serialize request: {err}")))?;

        let mut state = self.state.lock().expect("ledger node state poisoned");
        let submitter_verkey = state
            .nyms
            .get(submitter)
            .map(|doc| doc.verkey.clone())
            .ok_or_else(|| reject(format!("unknown submitter {submitter}")))?;

        let expected = hex::encode(keyed_signature(&submitter_verkey, &unsigned_bytes));
        if signature != expected {
            return Err(reject("invalid signature"));
        }

        match op_type {
            "1" => {
                let dest = operation
                    .get("dest")
                    .and_then(Value::as_str)
                    .ok_or_else(|| reject("nym operation has no dest"))?;
                let doc = DidDocument {
                    did: dest.to_string(),
                    verkey: operation
                        .get("verkey")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    role: operation
                        .get("role")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                    alias: operation
                        .get("alias")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                };
                state.nyms.insert(dest.to_string(), doc);
            }
            "101" => {
                let doc: SchemaDocument = serde_json::from_value(operation.get("data").cloned().ok_or_else(|| reject("schema operation has no data"))?)
                    .map_err(|err| reject(format!("malformed schema: {err}")))?;
                state.schemas.insert(doc.id.clone(), doc);
            }
            "102" => {
                let doc: CredDefDocument = serde_json::from_value(operation.get("data").cloned().ok_or_else(|| reject("cred def operation has no data"))?)
                    .map_err(|err| reject(format!("malformed cred def: {err}")))?;
                state.cred_defs.insert(doc.id.clone(), doc);
            }
            _ => unreachable!(),
        }
        state.height += 1;

        Ok(reply(json!({ "data": null, "height": state.height })))
    }

    // ---- Cheqd envelope ----

    fn handle_cheqd(&self, request: &Value) -> VdrResult<String> {
        let method = request
            .get("method")
            .and_then(Value::as_str)
            .ok_or_else(|| reject("request has no method"))?;

        match method {
            "abci_info" => {
                let state = self.state.lock().expect("ledger node state poisoned");
                Ok(json!({
                    "response": {
                        "data": "in-memory-cheqd",
                        "chain_id": self.chain_id,
                        "last_block_height": state.height,
                    }
                })
                .to_string())
            }
            "abci_query" => {
                let path = request
                    .get("path")
                    .and_then(Value::as_str)
                    .ok_or_else(|| reject("query has no path"))?;
                self.handle_cheqd_query(path)
            }
            "broadcast_tx_commit" => self.handle_cheqd_broadcast(request),
            other => Err(reject(format!("unsupported method {other}"))),
        }
    }

    fn handle_cheqd_query(&self, path: &str) -> VdrResult<String> {
        let decode = |id: &str| {
            urlencoding::decode(id)
                .map(|id| id.into_owned())
                .map_err(|err| reject(format!("undecodable query path {path}: {err}")))
        };
        let state = self.state.lock().expect("ledger node state poisoned");
        let value = if let Some(id) = path.strip_prefix("/did/") {
            state.nyms.get(&decode(id)?).map(|doc| json!(doc))
        } else if let Some(id) = path.strip_prefix("/resource/schema/") {
            state.schemas.get(&decode(id)?).map(|doc| json!(doc))
        } else if let Some(id) = path.strip_prefix("/resource/cred_def/") {
            state.cred_defs.get(&decode(id)?).map(|doc| json!(doc))
        } else {
            return Err(reject(format!("unsupported query path {path}")));
        };

        Ok(json!({ "response": { "value": value } }).to_string())
    }

    fn handle_cheqd_broadcast(&self, request: &Value) -> VdrResult<String> {
        let tx_hex = request
            .get("tx")
            .and_then(Value::as_str)
            .ok_or_else(|| reject("broadcast has no tx"))?;
        let signature = request
            .get("signature")
            .and_then(Value::as_str)
            .ok_or_else(|| reject("broadcast has no signature"))?;

        let tx_bytes =
            hex::decode(tx_hex).map_err(|err| reject(format!("tx is not hex: {err}")))?;
        let sign_doc: Value = serde_json::from_slice(&tx_bytes)
            .map_err(|err| reject(format!("tx is not a sign doc: {err}")))?;

        let author = sign_doc
            .get("author")
            .and_then(Value::as_str)
            .ok_or_else(|| reject("sign doc has no author"))?;

        let mut state = self.state.lock().expect("ledger node state poisoned");
        let author_verkey = state
            .nyms
            .get(author)
            .map(|doc| doc.verkey.clone())
            .ok_or_else(|| reject(format!("unknown author {author}")))?;

        let expected = hex::encode(keyed_signature(&author_verkey, &tx_bytes));
        if signature != expected {
            return Err(reject("invalid signature"));
        }

        let msgs = sign_doc
            .get("msgs")
            .and_then(Value::as_array)
            .ok_or_else(|| reject("sign doc has no msgs"))?;
        for msg in msgs {
            let msg_type = msg
                .get("type")
                .and_then(Value::as_str)
                .ok_or_else(|| reject("msg has no type"))?;
            let value = msg
                .get("value")
                .cloned()
                .ok_or_else(|| reject("msg has no value"))?;
            match msg_type {
                "MsgCreateDidDoc" => {
                    let doc: DidDocument = serde_json::from_value(value)
                        .map_err(|err| reject(format!("malformed did doc: {err}")))?;
                    state.nyms.insert(doc.did.clone(), doc);
                }
                "MsgCreateSchema" => {
                    let doc: SchemaDocument = serde_json::from_value(value)
                        .map_err(|err| reject(format!("malformed schema: {err}")))?;
                    state.schemas.insert(doc.id.clone(), doc);
                }
                "MsgCreateCredDef" => {
                    let doc: CredDefDocument = serde_json::from_value(value)
                        .map_err(|err| reject(format!("malformed cred def: {err}")))?;
                    state.cred_defs.insert(doc.id.clone(), doc);
                }
                other => return Err(reject(format!("unsupported msg type {other}"))),
            }
        }
        state.height += 1;

        Ok(json!({
            "check_tx": { "code": 0 },
            "deliver_tx": { "code": 0 },
            "height": state.height,
        })
        .to_string())
    }
}

impl Default for InMemoryLedgerNode {
    fn default() -> Self {
        InMemoryLedgerNode::new()
    }
}

#[async_trait]
impl LedgerTransport for InMemoryLedgerNode {
    async fn submit(&self, request: &str) -> VdrResult<String> {
        self.handle(request)
    }
}

fn reply(result: Value) -> String {
    json!({ "op": "REPLY", "result": result }).to_string()
}

fn reject(reason: impl Into<String>) -> VdrError {
    VdrError::Ledger {
        message: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn read_of_unknown_nym_returns_null_data() {
        let node = InMemoryLedgerNode::new();
        let response = node
            .submit(&json!({"reqId": 1, "operation": {"type": "105", "dest": "did:indy:test:unknown"}}).to_string())
            .await
            .unwrap();
        let response: Value = serde_json::from_str(&response).unwrap();
        assert_eq!(response["op"], "REPLY");
        assert!(response["result"]["data"].is_null());
    }

    #[tokio::test]
    async fn write_with_wrong_signature_is_rejected() {
        let node = InMemoryLedgerNode::new();
        node.seed_did("did:indy:test:trustee", "trustee-vk");

        let mut request = json!({
            "identifier": "did:indy:test:trustee",
            "reqId": 2,
            "protocolVersion": 2,
            "operation": {"type": "1", "dest": "did:indy:test:abc", "verkey": "vk-abc"},
        });
        request.as_object_mut().unwrap().insert(
            "signature".into(),
            json!(hex::encode(keyed_signature("wrong-key", b"whatever"))),
        );

        let err = node.submit(&request.to_string()).await.unwrap_err();
        assert!(matches!(err, VdrError::Ledger { ref message } if message.contains("invalid signature")));
    }

    #[tokio::test]
    async fn seeded_trustee_can_write_nym() {
        let node = InMemoryLedgerNode::new();
        node.seed_did("did:indy:test:trustee", "trustee-vk");

        let unsigned = json!({
            "identifier": "did:indy:test:trustee",
            "reqId": 3,
            "protocolVersion": 2,
            "operation": {"type": "1", "dest": "did:indy:test:abc", "verkey": "vk-abc"},
        });
        let bytes = serde_json::to_vec(&unsigned).unwrap();
        let mut signed = unsigned;
        signed.as_object_mut().unwrap().insert(
            "signature".into(),
            json!(hex::encode(keyed_signature("trustee-vk", &bytes))),
        );
        node.submit(&signed.to_string()).await.unwrap();

        let response = node
            .submit(&json!({"reqId": 4, "operation": {"type": "105", "dest": "did:indy:test:abc"}}).to_string())
            .await
            .unwrap();
        let response: Value = serde_json::from_str(&response).unwrap();
        assert_eq!(response["result"]["data"]["verkey"], "vk-abc");
    }
}
