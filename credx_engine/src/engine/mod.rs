mod anoncreds;
mod connections;
mod credentials;
mod oob;
mod proofs;
mod search;

use std::sync::Arc;

use tracing::trace;

use multiledger_vdr::Vdr;

use crate::dispatch::Dispatcher;
use crate::error::{EngineError, EngineResult};
use crate::handle::HandleRegistry;
use crate::protocols::connection::Connection;
use crate::protocols::cred_def::CredDefObject;
use crate::protocols::holder::HolderCredential;
use crate::protocols::issuer::IssuerCredential;
use crate::protocols::oob::{OutOfBandReceiver, OutOfBandSender};
use crate::protocols::prover::DisclosedProof;
use crate::protocols::public_agent::PublicAgent;
use crate::protocols::rev_reg::RevocationRegistry;
use crate::protocols::schema::SchemaObject;
use crate::protocols::verifier::Proof;
use crate::signer::TxnSigner;
use crate::transport::MessageTransport;
use crate::wallet::WalletStore;

pub(crate) struct SearchCursor {
    pub records: Vec<crate::wallet::Record>,
    pub position: usize,
}

/// The protocol object engine: handle tables for every object type, one VDR,
/// the wallet and transport collaborators, and the dispatch substrate.
///
/// One engine instance owns one `Vdr`; several engines (each with their own
/// VDR) can coexist, though a single engine per process is the expected
/// usage.
pub struct CredxEngine {
    pub(crate) vdr: Arc<Vdr>,
    pub(crate) wallet: Arc<dyn WalletStore>,
    pub(crate) transport: Arc<dyn MessageTransport>,
    pub(crate) signer: Arc<dyn TxnSigner>,
    dispatcher: Dispatcher,

    pub(crate) connections: HandleRegistry<Connection>,
    pub(crate) public_agents: HandleRegistry<PublicAgent>,
    pub(crate) issuer_credentials: HandleRegistry<IssuerCredential>,
    pub(crate) holder_credentials: HandleRegistry<HolderCredential>,
    pub(crate) proofs: HandleRegistry<Proof>,
    pub(crate) disclosed_proofs: HandleRegistry<DisclosedProof>,
    pub(crate) oob_senders: HandleRegistry<OutOfBandSender>,
    pub(crate) oob_receivers: HandleRegistry<OutOfBandReceiver>,
    pub(crate) schemas: HandleRegistry<SchemaObject>,
    pub(crate) cred_defs: HandleRegistry<CredDefObject>,
    pub(crate) rev_regs: HandleRegistry<RevocationRegistry>,
    pub(crate) searches: HandleRegistry<SearchCursor>,
}

impl CredxEngine {
    pub fn new(
        vdr: Arc<Vdr>,
        wallet: Arc<dyn WalletStore>,
        transport: Arc<dyn MessageTransport>,
        signer: Arc<dyn TxnSigner>,
    ) -> Self {
        CredxEngine {
            vdr,
            wallet,
            transport,
            signer,
            dispatcher: Dispatcher::new(),
            connections: HandleRegistry::new("connection"),
            public_agents: HandleRegistry::new("public-agent"),
            issuer_credentials: HandleRegistry::new("issuer-credential"),
            holder_credentials: HandleRegistry::new("holder-credential"),
            proofs: HandleRegistry::new("proof"),
            disclosed_proofs: HandleRegistry::new("disclosed-proof"),
            oob_senders: HandleRegistry::new("out-of-band-sender"),
            oob_receivers: HandleRegistry::new("out-of-band-receiver"),
            schemas: HandleRegistry::new("schema"),
            cred_defs: HandleRegistry::new("cred-def"),
            rev_regs: HandleRegistry::new("revocation-registry"),
            searches: HandleRegistry::new("wallet-search"),
        }
    }

    pub fn vdr(&self) -> &Arc<Vdr> {
        &self.vdr
    }

    /// The command/callback substrate for callers that demultiplex
    /// completions by correlation handle instead of awaiting futures.
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub(crate) fn check_open(&self) -> EngineResult<()> {
        if self.dispatcher.is_closed() {
            return Err(EngineError::Shutdown(
                "engine has been shut down".to_string(),
            ));
        }
        Ok(())
    }

    /// Fresh pairwise DID for one side of a new connection.
    pub(crate) fn new_pairwise_did() -> String {
        format!("did:peer:{}", uuid::Uuid::new_v4())
    }

    /// Shut down: reject new work, drain in-flight operations, close the VDR
    /// and drop every handle table. Any operation afterwards fails fast.
    pub async fn shutdown(&self) -> EngineResult<()> {
        trace!("engine shutting down");
        self.dispatcher.shutdown().await;
        self.vdr.cleanup().await?;

        self.connections.drain()?;
        self.public_agents.drain()?;
        self.issuer_credentials.drain()?;
        self.holder_credentials.drain()?;
        self.proofs.drain()?;
        self.disclosed_proofs.drain()?;
        self.oob_senders.drain()?;
        self.oob_receivers.drain()?;
        self.schemas.drain()?;
        self.cred_defs.drain()?;
        self.rev_regs.drain()?;
        self.searches.drain()?;
        Ok(())
    }
}
