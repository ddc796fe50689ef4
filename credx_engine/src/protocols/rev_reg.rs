use bitvec::vec::BitVec;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::trace;

use multiledger_vdr::{CredDefDocument, Vdr, VdrError};

use crate::error::{EngineError, EngineResult};
use crate::protocols::{from_snapshot, to_snapshot, PublishState};
use crate::signer::TxnSigner;

/// A revocation registry: a ledger-published bitset over credential indexes
/// that lets an issuer revoke previously issued credentials.
///
/// Created -> Published two-phase lifecycle like schema/cred def. Revocations
/// are deferred: `revoke_entry` marks an index pending locally and
/// `publish_revocations` folds the pending set into the status list and
/// republishes it. `update_state` is a ledger convergence check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevocationRegistry {
    pub source_id: String,
    pub state: PublishState,
    pub rev_reg_id: String,
    pub cred_def_id: String,
    pub submitter_did: String,
    pub max_creds: u32,
    /// Issued-so-far counter; the next credential gets this index.
    pub next_index: u32,
    status_list: BitVec,
    pending: Vec<u32>,
}

impl RevocationRegistry {
    pub fn create(
        source_id: &str,
        submitter_did: &str,
        cred_def_id: &str,
        tag: &str,
        max_creds: u32,
    ) -> EngineResult<Self> {
        if max_creds == 0 {
            return Err(EngineError::InvalidInput(
                "revocation registry must hold at least one credential".to_string(),
            ));
        }
        let rev_reg_id = format!("{cred_def_id}/REV_REG/{tag}");
        Ok(RevocationRegistry {
            source_id: source_id.to_string(),
            state: PublishState::Created,
            rev_reg_id,
            cred_def_id: cred_def_id.to_string(),
            submitter_did: submitter_did.to_string(),
            max_creds,
            next_index: 0,
            status_list: BitVec::repeat(false, max_creds as usize),
            pending: Vec::new(),
        })
    }

    pub fn id(&self) -> &str {
        &self.rev_reg_id
    }

    pub fn state(&self) -> PublishState {
        self.state
    }

    /// Hand out the next credential index, or fail once the registry is full.
    pub fn next_credential_index(&mut self) -> EngineResult<u32> {
        if self.next_index >= self.max_creds {
            return Err(EngineError::InvalidState(format!(
                "revocation registry {} is full",
                self.rev_reg_id
            )));
        }
        let index = self.next_index;
        self.next_index += 1;
        Ok(index)
    }

    /// Indexes revoked on the ledger-visible status list.
    pub fn revoked_indexes(&self) -> Vec<u32> {
        self.status_list.iter_ones().map(|idx| idx as u32).collect()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Mark one credential revoked. Deferred until `publish_revocations`.
    pub fn revoke_entry(&mut self, index: u32) -> EngineResult<()> {
        if self.state != PublishState::Published {
            return Err(EngineError::InvalidState(
                "cannot revoke against an unpublished registry".to_string(),
            ));
        }
        if index >= self.max_creds {
            return Err(EngineError::InvalidInput(format!(
                "credential index {index} outside registry of size {}",
                self.max_creds
            )));
        }
        if self.status_list[index as usize] || self.pending.contains(&index) {
            return Err(EngineError::InvalidState(format!(
                "credential index {index} is already revoked"
            )));
        }
        self.pending.push(index);
        trace!(source_id = %self.source_id, index, "revocation pending");
        Ok(())
    }

    fn registry_document(&self) -> CredDefDocument {
        // the registry rides the ledger as an accumulator-style definition
        // artifact keyed by its own id
        CredDefDocument {
            id: self.rev_reg_id.clone(),
            schema_id: self.cred_def_id.clone(),
            signature_type: "CL_ACCUM".to_string(),
            tag: "rev-reg".to_string(),
            value: json!({
                "maxCredNum": self.max_creds,
                "revoked": self.revoked_indexes(),
            }),
        }
    }

    async fn write(&self, vdr: &Vdr, signer: &dyn TxnSigner) -> EngineResult<()> {
        let params = serde_json::to_string(&self.registry_document()).map_err(|err| {
            EngineError::Internal(format!("cannot serialize revocation registry: {err}"))
        })?;
        let prepared = vdr
            .prepare_creddef_txn(&params, &self.submitter_did, None)
            .await?;
        let signature = signer
            .sign(prepared.signature_spec, &prepared.bytes_to_sign)
            .await?;
        vdr.submit_txn(
            &prepared.namespace,
            prepared.signature_spec,
            &prepared.txn_bytes,
            &signature,
            None,
        )
        .await?;
        Ok(())
    }

    /// Publish the registry definition and its empty status list.
    pub async fn publish(&mut self, vdr: &Vdr, signer: &dyn TxnSigner) -> EngineResult<()> {
        if self.state == PublishState::Published {
            return Err(EngineError::InvalidState(
                "revocation registry is already published".to_string(),
            ));
        }
        self.write(vdr, signer).await?;
        self.state = PublishState::Published;
        trace!(source_id = %self.source_id, id = %self.rev_reg_id, "revocation registry published");
        Ok(())
    }

    /// Fold pending revocations into the status list and republish it. A
    /// no-op when nothing is pending.
    pub async fn publish_revocations(
        &mut self,
        vdr: &Vdr,
        signer: &dyn TxnSigner,
    ) -> EngineResult<usize> {
        if self.state != PublishState::Published {
            return Err(EngineError::InvalidState(
                "cannot publish revocations for an unpublished registry".to_string(),
            ));
        }
        if self.pending.is_empty() {
            return Ok(0);
        }

        // apply pending onto a scratch list first so a rejected write leaves
        // local state untouched
        let mut updated = self.status_list.clone();
        for &index in &self.pending {
            updated.set(index as usize, true);
        }
        let staged = RevocationRegistry {
            status_list: updated.clone(),
            pending: Vec::new(),
            ..self.clone()
        };
        staged.write(vdr, signer).await?;

        let published = self.pending.len();
        self.status_list = updated;
        self.pending.clear();
        trace!(source_id = %self.source_id, published, "revocations published");
        Ok(published)
    }

    pub async fn update_state(&mut self, vdr: &Vdr) -> EngineResult<PublishState> {
        match vdr.resolve_creddef(&self.rev_reg_id).await {
            Ok(_) => self.state = PublishState::Published,
            Err(VdrError::NotFound(_)) => self.state = PublishState::Created,
            Err(err) => return Err(err.into()),
        }
        Ok(self.state)
    }

    pub fn to_string(&self) -> EngineResult<String> {
        to_snapshot(self)
    }

    pub fn from_string(snapshot: &str) -> EngineResult<Self> {
        from_snapshot(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signer::KeyedDigestSigner;
    use multiledger_vdr::transport::in_memory::InMemoryLedgerNode;
    use std::sync::Arc;

    fn vdr(node: Arc<InMemoryLedgerNode>) -> Vdr {
        let genesis = json!({"txn": {"type": "0"}}).to_string() + "\n";
        let mut builder = Vdr::builder();
        builder
            .register_indy_ledger(&["sovrin".to_string()], &genesis, None, node)
            .unwrap();
        builder.finalize()
    }

    fn registry() -> RevocationRegistry {
        RevocationRegistry::create(
            "rr-1",
            "did:indy:sovrin:issuer",
            "did:indy:sovrin:issuer/anoncreds/v0/CLAIM_DEF/default",
            "r0",
            4,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn deferred_revocation_flow() {
        let node = Arc::new(InMemoryLedgerNode::new());
        node.seed_did("did:indy:sovrin:issuer", "issuer-vk");
        let vdr = vdr(node);
        let signer = KeyedDigestSigner::new("issuer-vk");

        let mut registry = registry();
        // revoking before publication is a state error
        assert!(matches!(
            registry.revoke_entry(0),
            Err(EngineError::InvalidState(_))
        ));

        registry.publish(&vdr, &signer).await.unwrap();
        assert_eq!(registry.state(), PublishState::Published);

        let idx = registry.next_credential_index().unwrap();
        registry.revoke_entry(idx).unwrap();
        assert_eq!(registry.pending_count(), 1);
        // the ledger-visible list has not moved yet
        assert!(registry.revoked_indexes().is_empty());

        let published = registry.publish_revocations(&vdr, &signer).await.unwrap();
        assert_eq!(published, 1);
        assert_eq!(registry.revoked_indexes(), vec![idx]);
        assert_eq!(registry.pending_count(), 0);

        // nothing pending: no-op
        assert_eq!(registry.publish_revocations(&vdr, &signer).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn double_revocation_and_bounds_are_rejected() {
        let node = Arc::new(InMemoryLedgerNode::new());
        node.seed_did("did:indy:sovrin:issuer", "issuer-vk");
        let vdr = vdr(node);
        let signer = KeyedDigestSigner::new("issuer-vk");

        let mut registry = registry();
        registry.publish(&vdr, &signer).await.unwrap();

        registry.revoke_entry(1).unwrap();
        assert!(matches!(
            registry.revoke_entry(1),
            Err(EngineError::InvalidState(_))
        ));
        assert!(matches!(
            registry.revoke_entry(99),
            Err(EngineError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn registry_capacity_is_enforced() {
        let mut registry = RevocationRegistry::create(
            "rr-1",
            "did:indy:sovrin:issuer",
            "cd-1",
            "r0",
            2,
        )
        .unwrap();
        registry.next_credential_index().unwrap();
        registry.next_credential_index().unwrap();
        assert!(matches!(
            registry.next_credential_index(),
            Err(EngineError::InvalidState(_))
        ));
    }

    #[test]
    fn snapshot_roundtrip_preserves_status_list() {
        let mut registry = registry();
        registry.state = PublishState::Published;
        registry.status_list.set(2, true);
        registry.pending.push(3);

        let snapshot = registry.to_string().unwrap();
        let restored = RevocationRegistry::from_string(&snapshot).unwrap();
        assert_eq!(restored, registry);
        assert_eq!(restored.revoked_indexes(), vec![2]);
        assert_eq!(restored.pending_count(), 1);
        assert_eq!(restored.to_string().unwrap(), snapshot);
    }
}
