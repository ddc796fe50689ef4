pub mod http;
pub mod in_memory;

pub use http::HttpTransport;
pub use in_memory::InMemoryLedgerNode;

use async_trait::async_trait;

use crate::error::VdrResult;

/// Network seam between a ledger adapter and its ledger. Adapters build and
/// parse wire envelopes; the transport only moves request/response JSON.
///
/// Production code injects [`HttpTransport`]; tests and the demo inject
/// [`InMemoryLedgerNode`].
#[async_trait]
pub trait LedgerTransport: Send + Sync {
    async fn submit(&self, request: &str) -> VdrResult<String>;
}
