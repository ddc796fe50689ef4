pub mod connection;
pub mod cred_def;
pub mod holder;
pub mod issuer;
pub mod oob;
pub mod prover;
pub mod public_agent;
pub mod rev_reg;
pub mod schema;
pub mod verifier;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

pub(crate) const SNAPSHOT_VERSION: &str = "1.0";

#[derive(Serialize, Deserialize)]
struct Snapshot<T> {
    version: String,
    data: T,
}

/// Serialize a protocol object into its versioned JSON snapshot.
pub(crate) fn to_snapshot<T: Serialize>(data: &T) -> EngineResult<String> {
    serde_json::to_string(&Snapshot {
        version: SNAPSHOT_VERSION.to_string(),
        data,
    })
    .map_err(|err| EngineError::Internal(format!("cannot serialize object: {err}")))
}

/// Reconstruct a protocol object from a snapshot produced by [`to_snapshot`].
/// The restored object behaves identically to the original from here on; no
/// protocol messages are replayed.
pub(crate) fn from_snapshot<T: DeserializeOwned>(json: &str) -> EngineResult<T> {
    let snapshot: Snapshot<T> = serde_json::from_str(json)
        .map_err(|err| EngineError::InvalidInput(format!("cannot parse object snapshot: {err}")))?;
    if snapshot.version != SNAPSHOT_VERSION {
        return Err(EngineError::InvalidInput(format!(
            "unsupported snapshot version {:?}",
            snapshot.version
        )));
    }
    Ok(snapshot.data)
}

/// Two-phase lifecycle for ledger-published artifacts (schema, credential
/// definition, revocation registry): local until published, published once
/// the ledger confirms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PublishState {
    Created,
    Published,
}
