use async_trait::async_trait;

use multiledger_vdr::SignatureSpec;

use crate::error::EngineResult;

/// Detached-signature provider for ledger writes. The engine emits
/// `bytes_to_sign` plus the expected algorithm and receives the raw signature
/// back; private keys never enter the engine.
#[async_trait]
pub trait TxnSigner: Send + Sync {
    async fn sign(&self, spec: SignatureSpec, bytes_to_sign: &[u8]) -> EngineResult<Vec<u8>>;
}

/// Signer matching the keyed-digest scheme of the in-memory ledger node.
/// Test/demo use only.
pub struct KeyedDigestSigner {
    key: String,
}

impl KeyedDigestSigner {
    pub fn new(key: &str) -> Self {
        KeyedDigestSigner {
            key: key.to_string(),
        }
    }
}

#[async_trait]
impl TxnSigner for KeyedDigestSigner {
    async fn sign(&self, _spec: SignatureSpec, bytes_to_sign: &[u8]) -> EngineResult<Vec<u8>> {
        Ok(multiledger_vdr::transport::in_memory::keyed_signature(
            &self.key,
            bytes_to_sign,
        ))
    }
}
