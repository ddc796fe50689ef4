pub mod cheqd;
pub mod indy;

pub use cheqd::CheqdLedger;
pub use indy::IndyLedger;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::VdrResult;
use crate::types::{EndorsementSpec, PingStatus};

/// Ledger family of a registered adapter. Adding a family means adding a
/// variant and an adapter, not a subclass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerKind {
    Indy,
    Cheqd,
}

/// Capability set every ledger adapter implements. An adapter is immutable
/// after registration; one adapter instance may serve several namespaces.
///
/// Request building and response parsing are adapter concerns; the network is
/// reached through the adapter's injected [`crate::transport::LedgerTransport`].
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Unique name of this adapter instance, used to ping shared adapters once.
    fn name(&self) -> String;

    fn kind(&self) -> LedgerKind;

    /// Query liveness/version of the backing network. Failures are reported
    /// in-band as a fail status so a multi-namespace ping can partially succeed.
    async fn ping(&self) -> VdrResult<PingStatus>;

    /// Attach detached signature(s) to prepared transaction bytes and submit.
    async fn submit_txn(
        &self,
        txn_bytes: &[u8],
        signature: &[u8],
        endorsement: Option<&str>,
    ) -> VdrResult<String>;

    /// Submit transaction bytes that already carry their signatures.
    async fn submit_raw_txn(&self, txn_bytes: &[u8]) -> VdrResult<String>;

    /// Read-only query, no signature required.
    async fn submit_query(&self, query: &str) -> VdrResult<String>;

    async fn build_did_request(
        &self,
        txn_params: &str,
        submitter_did: &str,
        endorser: Option<&str>,
    ) -> VdrResult<(Vec<u8>, Vec<u8>)>;

    async fn build_schema_request(
        &self,
        txn_params: &str,
        submitter_did: &str,
        endorser: Option<&str>,
    ) -> VdrResult<(Vec<u8>, Vec<u8>)>;

    async fn build_cred_def_request(
        &self,
        txn_params: &str,
        submitter_did: &str,
        endorser: Option<&str>,
    ) -> VdrResult<(Vec<u8>, Vec<u8>)>;

    async fn build_resolve_did_request(&self, id: &str) -> VdrResult<String>;
    async fn build_resolve_schema_request(&self, id: &str) -> VdrResult<String>;
    async fn build_resolve_cred_def_request(&self, id: &str) -> VdrResult<String>;

    async fn parse_resolve_did_response(&self, response: &str) -> VdrResult<String>;
    async fn parse_resolve_schema_response(&self, response: &str) -> VdrResult<String>;
    async fn parse_resolve_cred_def_response(&self, response: &str) -> VdrResult<String>;

    fn prepare_endorsement_spec(
        &self,
        endorser: Option<&str>,
    ) -> VdrResult<Option<EndorsementSpec>>;

    /// Close network resources. Called once per adapter instance on cleanup.
    async fn cleanup(&self) -> VdrResult<()>;
}
