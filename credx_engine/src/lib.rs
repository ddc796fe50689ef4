//! Handle-based protocol engine for verifiable credential exchange.
//!
//! Protocol objects (connections, credentials, proofs, out-of-band
//! envelopes, revocation registries, public agents) are state machines
//! behind opaque integer handles, serializable to JSON snapshots and
//! released explicitly. Ledger artifacts are written through a
//! [`multiledger_vdr::Vdr`] with externally supplied signatures. Wallet
//! storage and message transport are injected collaborators.

pub mod dispatch;
pub mod engine;
pub mod error;
pub mod handle;
pub mod messages;
pub mod protocols;
pub mod signer;
pub mod transport;
pub mod wallet;

pub use dispatch::Dispatcher;
pub use engine::CredxEngine;
pub use error::{EngineError, EngineResult};
pub use signer::{KeyedDigestSigner, TxnSigner};
pub use transport::{InMemoryTransport, MessageTransport};
pub use wallet::{InMemoryWallet, Record, WalletQuery, WalletStore};
