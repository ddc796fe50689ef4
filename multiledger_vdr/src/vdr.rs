use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future::join_all;
use tracing::trace;

use crate::cache::ResolutionCache;
use crate::error::{VdrError, VdrResult};
use crate::id::FullyQualifiedId;
use crate::ledger::{CheqdLedger, IndyLedger, Ledger, LedgerKind};
use crate::transport::LedgerTransport;
use crate::types::{CacheOptions, PingStatus, PreparedTxn, ResourceType, SignatureSpec, TaaConfig};

fn signature_spec_for(kind: LedgerKind) -> SignatureSpec {
    match kind {
        LedgerKind::Indy => SignatureSpec::Ed25519,
        LedgerKind::Cheqd => SignatureSpec::Secp256k1,
    }
}

/// Builder for a [`Vdr`]. Ledgers are registered against namespace lists;
/// registering an already-present namespace is rejected.
pub struct VdrBuilder {
    namespaces: HashMap<String, Arc<dyn Ledger>>,
}

impl std::fmt::Debug for VdrBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VdrBuilder")
            .field("namespaces", &self.namespaces.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl VdrBuilder {
    pub fn new() -> Self {
        VdrBuilder {
            namespaces: HashMap::new(),
        }
    }

    fn validate_unique_namespaces(&self, namespace_list: &[String]) -> VdrResult<()> {
        if namespace_list.is_empty() {
            return Err(VdrError::InvalidInput(
                "namespace list is empty".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for namespace in namespace_list {
            if namespace.trim().is_empty() {
                return Err(VdrError::InvalidInput("namespace is empty".to_string()));
            }
            if self.namespaces.contains_key(namespace) || !seen.insert(namespace) {
                return Err(VdrError::InvalidInput(format!(
                    "unable to register namespace {namespace:?}: already registered"
                )));
            }
        }
        Ok(())
    }

    fn add_ledger(&mut self, namespace_list: &[String], ledger: Arc<dyn Ledger>) {
        for namespace in namespace_list {
            self.namespaces.insert(namespace.clone(), ledger.clone());
        }
    }

    /// Register an Indy ledger for the given namespaces, bootstrapped from
    /// genesis transaction data with optional TAA enforcement.
    pub fn register_indy_ledger(
        &mut self,
        namespace_list: &[String],
        genesis_txn: &str,
        taa_config: Option<TaaConfig>,
        transport: Arc<dyn LedgerTransport>,
    ) -> VdrResult<&mut Self> {
        self.validate_unique_namespaces(namespace_list)?;
        let ledger = IndyLedger::create(genesis_txn, taa_config, transport)?;
        self.add_ledger(namespace_list, Arc::new(ledger));
        trace!(?namespace_list, "registered indy ledger");
        Ok(self)
    }

    /// Register a Cheqd ledger for the given namespaces.
    pub fn register_cheqd_ledger(
        &mut self,
        namespace_list: &[String],
        chain_id: &str,
        rpc_addresses: &[String],
        transport: Arc<dyn LedgerTransport>,
    ) -> VdrResult<&mut Self> {
        self.validate_unique_namespaces(namespace_list)?;
        let ledger = CheqdLedger::create(chain_id, rpc_addresses, transport)?;
        self.add_ledger(namespace_list, Arc::new(ledger));
        trace!(?namespace_list, "registered cheqd ledger");
        Ok(self)
    }

    /// Finalize building and receive a [`Vdr`] providing a unified interface
    /// for interactions with the registered ledgers.
    pub fn finalize(self) -> Vdr {
        Vdr {
            namespaces: self.namespaces,
            cache: ResolutionCache::new(),
            closed: AtomicBool::new(false),
        }
    }
}

impl Default for VdrBuilder {
    fn default() -> Self {
        VdrBuilder::new()
    }
}

/// A Verifiable Data Registry: routes fully-qualified identifiers to the
/// registered ledger adapters and owns the resolution cache. Exclusive owner
/// of its adapters' lifetime; `cleanup` closes them and fails all later calls
/// fast. Multiple independent instances may coexist.
pub struct Vdr {
    namespaces: HashMap<String, Arc<dyn Ledger>>,
    cache: ResolutionCache,
    closed: AtomicBool,
}

impl Vdr {
    pub fn builder() -> VdrBuilder {
        VdrBuilder::new()
    }

    pub fn registered_namespaces(&self) -> Vec<String> {
        let mut namespaces: Vec<String> = self.namespaces.keys().cloned().collect();
        namespaces.sort();
        namespaces
    }

    fn check_open(&self) -> VdrResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(VdrError::Shutdown("vdr has been cleaned up".to_string()));
        }
        Ok(())
    }

    fn ledger_for_namespace(&self, namespace: &str) -> VdrResult<Arc<dyn Ledger>> {
        self.check_open()?;
        self.namespaces
            .get(namespace)
            .cloned()
            .ok_or_else(|| {
                VdrError::InvalidInput(format!(
                    "unable to get ledger for namespace {namespace:?}: not registered"
                ))
            })
    }

    fn ledger_for_id(&self, id: &str) -> VdrResult<(Arc<dyn Ledger>, FullyQualifiedId)> {
        let parsed = FullyQualifiedId::parse(id)?;
        let ledger = self.ledger_for_namespace(parsed.namespace())?;
        if let Some(kind) = parsed.ledger_kind() {
            if kind != ledger.kind() {
                return Err(VdrError::InvalidInput(format!(
                    "registered ledger type {:?} does not match the method of id {id:?}",
                    ledger.kind()
                )));
            }
        }
        Ok((ledger, parsed))
    }

    // ---- ping ----

    /// Query liveness of each namespace's ledger. Adapters shared between
    /// namespaces are pinged once; the result is fanned out per namespace.
    /// Partial failure is reported in-band per namespace.
    pub async fn ping(&self, namespace_list: &[String]) -> VdrResult<BTreeMap<String, PingStatus>> {
        trace!(?namespace_list, "ping");
        self.check_open()?;

        let mut by_ledger: HashMap<String, (Arc<dyn Ledger>, Vec<String>)> = HashMap::new();
        for namespace in namespace_list {
            let ledger = self.ledger_for_namespace(namespace)?;
            by_ledger
                .entry(ledger.name())
                .or_insert_with(|| (ledger, Vec::new()))
                .1
                .push(namespace.clone());
        }

        let futures = by_ledger.into_values().map(|(ledger, namespaces)| async move {
            let status = ledger.ping().await.unwrap_or_else(PingStatus::fail);
            (namespaces, status)
        });

        let mut statuses = BTreeMap::new();
        for (namespaces, status) in join_all(futures).await {
            for namespace in namespaces {
                statuses.insert(namespace, status.clone());
            }
        }
        Ok(statuses)
    }

    // ---- resolution ----

    pub async fn resolve_did(&self, fqdid: &str) -> VdrResult<String> {
        trace!(fqdid, "resolve_did");
        let (ledger, _) = self.ledger_for_id(fqdid)?;
        let request = ledger.build_resolve_did_request(fqdid).await?;
        let response = ledger.submit_query(&request).await?;
        ledger.parse_resolve_did_response(&response).await
    }

    pub async fn resolve_schema(&self, fqschema: &str) -> VdrResult<String> {
        trace!(fqschema, "resolve_schema");
        let (ledger, _) = self.ledger_for_id(fqschema)?;
        let request = ledger.build_resolve_schema_request(fqschema).await?;
        let response = ledger.submit_query(&request).await?;
        ledger.parse_resolve_schema_response(&response).await
    }

    pub async fn resolve_creddef(&self, fqcreddef: &str) -> VdrResult<String> {
        trace!(fqcreddef, "resolve_creddef");
        let (ledger, _) = self.ledger_for_id(fqcreddef)?;
        let request = ledger.build_resolve_cred_def_request(fqcreddef).await?;
        let response = ledger.submit_query(&request).await?;
        ledger.parse_resolve_cred_def_response(&response).await
    }

    pub async fn resolve_did_with_cache(
        &self,
        fqdid: &str,
        options: &CacheOptions,
    ) -> VdrResult<String> {
        self.resolve_with_cache(ResourceType::Did, fqdid, options)
            .await
    }

    pub async fn resolve_schema_with_cache(
        &self,
        fqschema: &str,
        options: &CacheOptions,
    ) -> VdrResult<String> {
        self.resolve_with_cache(ResourceType::Schema, fqschema, options)
            .await
    }

    pub async fn resolve_creddef_with_cache(
        &self,
        fqcreddef: &str,
        options: &CacheOptions,
    ) -> VdrResult<String> {
        self.resolve_with_cache(ResourceType::CredDef, fqcreddef, options)
            .await
    }

    async fn resolve_with_cache(
        &self,
        resource_type: ResourceType,
        id: &str,
        options: &CacheOptions,
    ) -> VdrResult<String> {
        self.check_open()?;
        if let Some(hit) = self.cache.get(resource_type, id, options)? {
            trace!(%resource_type, id, "cache hit");
            return Ok(hit);
        }
        if options.no_update {
            return Err(VdrError::NotFound(format!(
                "{resource_type} {id:?} not present in cache and no_update is set"
            )));
        }

        let document = match resource_type {
            ResourceType::Did => self.resolve_did(id).await?,
            ResourceType::Schema => self.resolve_schema(id).await?,
            ResourceType::CredDef => self.resolve_creddef(id).await?,
        };
        self.cache.store(resource_type, id, &document, options)?;
        Ok(document)
    }

    /// Drop a cache partition wholesale.
    pub fn purge_cache(&self, resource_type: ResourceType) -> VdrResult<()> {
        self.check_open()?;
        self.cache.purge(resource_type)
    }

    // ---- transaction preparation ----

    pub async fn prepare_did_txn(
        &self,
        txn_params: &str,
        submitter_did: &str,
        endorser: Option<&str>,
    ) -> VdrResult<PreparedTxn> {
        trace!(submitter_did, ?endorser, "prepare_did_txn");
        let (ledger, parsed) = self.ledger_for_id(submitter_did)?;
        let (txn_bytes, bytes_to_sign) = ledger
            .build_did_request(txn_params, submitter_did, endorser)
            .await?;
        self.prepared(&ledger, parsed, txn_bytes, bytes_to_sign, endorser)
    }

    pub async fn prepare_schema_txn(
        &self,
        txn_params: &str,
        submitter_did: &str,
        endorser: Option<&str>,
    ) -> VdrResult<PreparedTxn> {
        trace!(submitter_did, ?endorser, "prepare_schema_txn");
        let (ledger, parsed) = self.ledger_for_id(submitter_did)?;
        let (txn_bytes, bytes_to_sign) = ledger
            .build_schema_request(txn_params, submitter_did, endorser)
            .await?;
        self.prepared(&ledger, parsed, txn_bytes, bytes_to_sign, endorser)
    }

    pub async fn prepare_creddef_txn(
        &self,
        txn_params: &str,
        submitter_did: &str,
        endorser: Option<&str>,
    ) -> VdrResult<PreparedTxn> {
        trace!(submitter_did, ?endorser, "prepare_creddef_txn");
        let (ledger, parsed) = self.ledger_for_id(submitter_did)?;
        let (txn_bytes, bytes_to_sign) = ledger
            .build_cred_def_request(txn_params, submitter_did, endorser)
            .await?;
        self.prepared(&ledger, parsed, txn_bytes, bytes_to_sign, endorser)
    }

    fn prepared(
        &self,
        ledger: &Arc<dyn Ledger>,
        id: FullyQualifiedId,
        txn_bytes: Vec<u8>,
        bytes_to_sign: Vec<u8>,
        endorser: Option<&str>,
    ) -> VdrResult<PreparedTxn> {
        let endorsement_spec = ledger.prepare_endorsement_spec(endorser)?;
        Ok(PreparedTxn {
            namespace: id.namespace().to_string(),
            txn_bytes,
            signature_spec: signature_spec_for(ledger.kind()),
            bytes_to_sign,
            endorsement_spec,
        })
    }

    // ---- submission ----

    /// Submit a prepared transaction with its detached signature(s). The
    /// signing key never enters this crate.
    pub async fn submit_txn(
        &self,
        namespace: &str,
        signature_spec: SignatureSpec,
        txn_bytes: &[u8],
        signature: &[u8],
        endorsement: Option<&str>,
    ) -> VdrResult<String> {
        trace!(namespace, %signature_spec, "submit_txn");
        let ledger = self.ledger_for_namespace(namespace)?;
        if signature_spec != signature_spec_for(ledger.kind()) {
            return Err(VdrError::InvalidInput(format!(
                "signature spec {signature_spec} does not match ledger family of namespace {namespace:?}"
            )));
        }
        ledger.submit_txn(txn_bytes, signature, endorsement).await
    }

    pub async fn submit_raw_txn(&self, namespace: &str, txn_bytes: &[u8]) -> VdrResult<String> {
        trace!(namespace, "submit_raw_txn");
        let ledger = self.ledger_for_namespace(namespace)?;
        ledger.submit_raw_txn(txn_bytes).await
    }

    pub async fn submit_query(&self, namespace: &str, query: &str) -> VdrResult<String> {
        trace!(namespace, "submit_query");
        let ledger = self.ledger_for_namespace(namespace)?;
        ledger.submit_query(query).await
    }

    // ---- lifecycle ----

    /// Close ledger connections and fail all subsequent calls fast. Each
    /// distinct adapter is cleaned up once even when it serves several
    /// namespaces. Idempotent.
    pub async fn cleanup(&self) -> VdrResult<()> {
        trace!("cleanup");
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let mut visited: HashSet<String> = HashSet::new();
        for ledger in self.namespaces.values() {
            if visited.insert(ledger.name()) {
                ledger.cleanup().await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::in_memory::{keyed_signature, InMemoryLedgerNode};
    use serde_json::json;

    fn genesis() -> String {
        json!({"txn": {"type": "0", "data": {"alias": "Node1"}}}).to_string() + "\n"
    }

    fn indy_vdr(node: Arc<InMemoryLedgerNode>) -> Vdr {
        let mut builder = Vdr::builder();
        builder
            .register_indy_ledger(&["sovrin".to_string()], &genesis(), None, node)
            .unwrap();
        builder.finalize()
    }

    #[test]
    fn re_registration_is_rejected() {
        let node = Arc::new(InMemoryLedgerNode::new());
        let mut builder = Vdr::builder();
        builder
            .register_indy_ledger(&["sovrin".to_string()], &genesis(), None, node.clone())
            .unwrap();
        let err = builder
            .register_indy_ledger(&["sovrin".to_string()], &genesis(), None, node.clone())
            .unwrap_err();
        assert!(matches!(err, VdrError::InvalidInput(_)));

        // a duplicate inside one list is rejected too
        let err = builder
            .register_cheqd_ledger(
                &["cheqd:testnet".to_string(), "cheqd:testnet".to_string()],
                "cheqd-testnet-6",
                &["http://localhost:26657".to_string()],
                node,
            )
            .unwrap_err();
        assert!(matches!(err, VdrError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn routing_is_exclusive_per_namespace() {
        let indy_node = Arc::new(InMemoryLedgerNode::new());
        let cheqd_node = Arc::new(InMemoryLedgerNode::with_chain_id("cheqd-testnet-6"));
        indy_node.seed_did("did:indy:sovrin:onindy", "vk-indy");
        cheqd_node.seed_did("did:cheqd:testnet:oncheqd", "vk-cheqd");

        let mut builder = Vdr::builder();
        builder
            .register_indy_ledger(&["sovrin".to_string()], &genesis(), None, indy_node.clone())
            .unwrap()
            .register_cheqd_ledger(
                &["cheqd:testnet".to_string()],
                "cheqd-testnet-6",
                &["http://localhost:26657".to_string()],
                cheqd_node.clone(),
            )
            .unwrap();
        let vdr = builder.finalize();

        let doc = vdr.resolve_did("did:indy:sovrin:onindy").await.unwrap();
        assert!(doc.contains("vk-indy"));
        let doc = vdr.resolve_did("did:cheqd:testnet:oncheqd").await.unwrap();
        assert!(doc.contains("vk-cheqd"));

        // the indy DID only exists on the indy node, so the cheqd namespace
        // never sees the request
        assert!(vdr.resolve_did("did:cheqd:testnet:onindy").await.is_err());
    }

    #[tokio::test]
    async fn unregistered_namespace_fails_before_any_network_call() {
        let node = Arc::new(InMemoryLedgerNode::new());
        let vdr = indy_vdr(node.clone());

        let err = vdr.resolve_did("did:indy:sovrin2:abc").await.unwrap_err();
        assert!(matches!(err, VdrError::InvalidInput(_)));
        assert_eq!(node.submission_count(), 0);
    }

    #[tokio::test]
    async fn method_family_must_match_adapter() {
        let node = Arc::new(InMemoryLedgerNode::new());
        let mut builder = Vdr::builder();
        builder
            .register_indy_ledger(&["cheqd:testnet".to_string()], &genesis(), None, node)
            .unwrap();
        let vdr = builder.finalize();

        // namespace routes to an indy adapter, but the method says cheqd
        let err = vdr.resolve_did("did:cheqd:testnet:abc").await.unwrap_err();
        assert!(matches!(err, VdrError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn ping_reports_per_namespace_status() {
        let node = Arc::new(InMemoryLedgerNode::new());
        let mut builder = Vdr::builder();
        builder
            .register_indy_ledger(
                &["sovrin".to_string(), "sovrin:staging".to_string()],
                &genesis(),
                None,
                node,
            )
            .unwrap();
        let vdr = builder.finalize();

        let statuses = vdr
            .ping(&["sovrin".to_string(), "sovrin:staging".to_string()])
            .await
            .unwrap();
        assert_eq!(statuses.len(), 2);
        assert!(statuses["sovrin"].is_success());
        assert!(statuses["sovrin:staging"].is_success());

        let err = vdr.ping(&["unknown".to_string()]).await.unwrap_err();
        assert!(matches!(err, VdrError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn prepare_sign_submit_roundtrip() {
        let node = Arc::new(InMemoryLedgerNode::new());
        node.seed_did("did:indy:sovrin:trustee", "trustee-vk");
        let vdr = indy_vdr(node);

        let prepared = vdr
            .prepare_did_txn(
                &json!({"dest": "did:indy:sovrin:abc", "verkey": "vk-abc"}).to_string(),
                "did:indy:sovrin:trustee",
                None,
            )
            .await
            .unwrap();
        assert_eq!(prepared.namespace, "sovrin");
        assert_eq!(prepared.signature_spec, SignatureSpec::Ed25519);
        assert!(prepared.endorsement_spec.is_none());

        let signature = keyed_signature("trustee-vk", &prepared.bytes_to_sign);
        vdr.submit_txn(
            &prepared.namespace,
            prepared.signature_spec,
            &prepared.txn_bytes,
            &signature,
            None,
        )
        .await
        .unwrap();

        let doc = vdr.resolve_did("did:indy:sovrin:abc").await.unwrap();
        assert!(doc.contains("vk-abc"));
    }

    #[tokio::test]
    async fn endorser_yields_endorsement_spec() {
        let node = Arc::new(InMemoryLedgerNode::new());
        node.seed_did("did:indy:sovrin:author", "author-vk");
        let vdr = indy_vdr(node);

        let prepared = vdr
            .prepare_did_txn(
                &json!({"dest": "did:indy:sovrin:abc"}).to_string(),
                "did:indy:sovrin:author",
                Some("did:indy:sovrin:endorser"),
            )
            .await
            .unwrap();
        assert_eq!(
            prepared.endorsement_spec,
            Some(crate::types::EndorsementSpec::Indy {
                endorser_did: "did:indy:sovrin:endorser".to_string()
            })
        );
    }

    #[tokio::test]
    async fn signature_spec_mismatch_is_a_validation_error() {
        let node = Arc::new(InMemoryLedgerNode::new());
        let vdr = indy_vdr(node.clone());
        let before = node.submission_count();

        let err = vdr
            .submit_txn("sovrin", SignatureSpec::Secp256k1, b"{}", b"sig", None)
            .await
            .unwrap_err();
        assert!(matches!(err, VdrError::InvalidInput(_)));
        assert_eq!(node.submission_count(), before);
    }

    #[tokio::test]
    async fn cached_resolution_reads_through() {
        let node = Arc::new(InMemoryLedgerNode::new());
        node.seed_did("did:indy:sovrin:abc", "vk-abc");
        let vdr = indy_vdr(node.clone());

        let options = CacheOptions::default();
        vdr.resolve_did_with_cache("did:indy:sovrin:abc", &options)
            .await
            .unwrap();
        let after_first = node.submission_count();

        // second resolution is served from cache
        vdr.resolve_did_with_cache("did:indy:sovrin:abc", &options)
            .await
            .unwrap();
        assert_eq!(node.submission_count(), after_first);

        // no_update with a cold cache is a miss, not a fetch
        let cold = CacheOptions {
            no_update: true,
            ..Default::default()
        };
        let err = vdr
            .resolve_did_with_cache("did:indy:sovrin:other", &cold)
            .await
            .unwrap_err();
        assert!(matches!(err, VdrError::NotFound(_)));
        assert_eq!(node.submission_count(), after_first);
    }

    #[tokio::test]
    async fn cleanup_fails_subsequent_calls_fast() {
        let node = Arc::new(InMemoryLedgerNode::new());
        let vdr = indy_vdr(node);

        vdr.cleanup().await.unwrap();
        vdr.cleanup().await.unwrap(); // idempotent

        let err = vdr.resolve_did("did:indy:sovrin:abc").await.unwrap_err();
        assert!(matches!(err, VdrError::Shutdown(_)));
        let err = vdr.ping(&["sovrin".to_string()]).await.unwrap_err();
        assert!(matches!(err, VdrError::Shutdown(_)));
    }
}
