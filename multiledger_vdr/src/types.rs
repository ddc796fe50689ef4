use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{VdrError, VdrResult};

/// Liveness/version report for a single registered namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingStatus {
    pub code: PingStatusCode,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PingStatusCode {
    Success,
    Fail,
}

impl PingStatus {
    pub fn success(message: impl Into<String>) -> Self {
        PingStatus {
            code: PingStatusCode::Success,
            message: message.into(),
        }
    }

    pub fn fail(err: impl std::fmt::Display) -> Self {
        PingStatus {
            code: PingStatusCode::Fail,
            message: err.to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == PingStatusCode::Success
    }
}

/// Signature algorithm a prepared transaction must be signed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignatureSpec {
    Ed25519,
    Secp256k1,
}

impl std::fmt::Display for SignatureSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignatureSpec::Ed25519 => write!(f, "Ed25519"),
            SignatureSpec::Secp256k1 => write!(f, "Secp256k1"),
        }
    }
}

/// What an endorser must co-sign, per ledger family.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "family")]
pub enum EndorsementSpec {
    Indy { endorser_did: String },
    Cheqd { txn_author: String },
}

/// An unsigned transaction produced by the prepare pipeline. Immutable once
/// produced; consumed exactly once by `submit_txn`, optionally passing through
/// an endorser first. The signing key never enters this crate: callers sign
/// `bytes_to_sign` externally and hand the detached signature back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreparedTxn {
    pub namespace: String,
    pub txn_bytes: Vec<u8>,
    pub signature_spec: SignatureSpec,
    pub bytes_to_sign: Vec<u8>,
    pub endorsement_spec: Option<EndorsementSpec>,
}

/// Caching options for `resolve_*_with_cache`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CacheOptions {
    /// Skip the cache read entirely and fetch from the ledger.
    pub no_cache: bool,
    /// Serve from cache only; a miss is a NotFound, no network call.
    pub no_update: bool,
    /// Do not write the fetched result back into the cache.
    pub no_store: bool,
    /// Only accept cached entries younger than this many seconds.
    pub min_fresh: Option<i64>,
}

impl CacheOptions {
    pub fn from_json(json: &str) -> VdrResult<Self> {
        if json.trim().is_empty() {
            return Ok(CacheOptions::default());
        }
        Ok(serde_json::from_str(json)?)
    }
}

/// Accepted transaction-author-agreement data for an Indy ledger. Either
/// `text` + `version` together, or `taa_digest` alone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaaConfig {
    pub text: Option<String>,
    pub version: Option<String>,
    pub taa_digest: Option<String>,
    pub acc_mech_type: String,
    pub time: i64,
}

impl TaaConfig {
    pub fn validate(&self) -> VdrResult<()> {
        match (&self.text, &self.version, &self.taa_digest) {
            (Some(_), Some(_), None) | (None, None, Some(_)) => Ok(()),
            _ => Err(VdrError::InvalidInput(
                "taa config requires either text and version together, or taa_digest alone"
                    .to_string(),
            )),
        }
    }

    /// Acceptance time rounded down to day precision. The exact timestamp is
    /// discarded before it reaches the ledger.
    pub fn acceptance_time(&self) -> i64 {
        const SECS_PER_DAY: i64 = 86400;
        self.time - self.time.rem_euclid(SECS_PER_DAY)
    }
}

/// Resource families the resolver serves. Each gets its own cache partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceType {
    Did,
    Schema,
    CredDef,
}

impl std::fmt::Display for ResourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceType::Did => write!(f, "did"),
            ResourceType::Schema => write!(f, "schema"),
            ResourceType::CredDef => write!(f, "cred_def"),
        }
    }
}

/// Resolved DID information.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DidDocument {
    pub did: String,
    pub verkey: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

/// Resolved schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaDocument {
    pub id: String,
    pub name: String,
    pub version: String,
    pub attr_names: Vec<String>,
}

/// Resolved credential definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredDefDocument {
    pub id: String,
    pub schema_id: String,
    #[serde(rename = "type")]
    pub signature_type: String,
    pub tag: String,
    pub value: serde_json::Value,
}

/// A timestamped cache entry. Entries are never partially valid: a fetch
/// either fully replaces the entry or leaves it untouched.
#[derive(Debug, Clone)]
pub struct CachedResource {
    pub value: serde_json::Value,
    pub cached_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taa_text_and_version() {
        let taa = TaaConfig {
            text: Some("agreement".to_string()),
            version: Some("1.0".to_string()),
            taa_digest: None,
            acc_mech_type: "on_file".to_string(),
            time: 1_700_000_123,
        };
        taa.validate().unwrap();
        assert_eq!(taa.acceptance_time() % 86400, 0);
        assert!(taa.acceptance_time() <= taa.time);
    }

    #[test]
    fn taa_digest_only() {
        let taa = TaaConfig {
            text: None,
            version: None,
            taa_digest: Some("abc123".to_string()),
            acc_mech_type: "on_file".to_string(),
            time: 0,
        };
        taa.validate().unwrap();
    }

    #[test]
    fn taa_rejects_mixed_forms() {
        let taa = TaaConfig {
            text: Some("agreement".to_string()),
            version: None,
            taa_digest: Some("abc123".to_string()),
            acc_mech_type: "on_file".to_string(),
            time: 0,
        };
        assert!(taa.validate().is_err());
    }

    #[test]
    fn cache_options_from_json() {
        let opts = CacheOptions::from_json("{}").unwrap();
        assert!(!opts.no_cache);

        let opts = CacheOptions::from_json(r#"{"noCache": true, "minFresh": 60}"#).unwrap();
        assert!(opts.no_cache);
        assert_eq!(opts.min_fresh, Some(60));

        let opts = CacheOptions::from_json("").unwrap();
        assert!(!opts.no_update);
    }
}
