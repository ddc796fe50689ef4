use crate::engine::CredxEngine;
use crate::error::EngineResult;
use crate::protocols::cred_def::CredDefObject;
use crate::protocols::rev_reg::RevocationRegistry;
use crate::protocols::schema::SchemaObject;
use crate::protocols::PublishState;

/// Ledger-published artifacts: schema, credential definition, revocation
/// registry. All three share the Created -> Published two-phase lifecycle;
/// `*_update_state` converges local state with the ledger instead of pushing.
impl CredxEngine {
    // ---- schema ----

    pub fn schema_create(
        &self,
        source_id: &str,
        issuer_did: &str,
        name: &str,
        version: &str,
        attr_names_json: &str,
    ) -> EngineResult<u32> {
        self.check_open()?;
        let attr_names: Vec<String> = serde_json::from_str(attr_names_json)?;
        let schema = SchemaObject::create(source_id, issuer_did, name, version, attr_names)?;
        self.schemas.add(schema)
    }

    pub async fn schema_publish(&self, handle: u32) -> EngineResult<()> {
        self.check_open()?;
        let entry = self.schemas.entry(handle)?;
        let mut schema = entry.lock().await;
        schema.publish(&self.vdr, self.signer.as_ref()).await
    }

    pub async fn schema_update_state(&self, handle: u32) -> EngineResult<PublishState> {
        self.check_open()?;
        let entry = self.schemas.entry(handle)?;
        let mut schema = entry.lock().await;
        schema.update_state(&self.vdr).await
    }

    pub async fn schema_get_id(&self, handle: u32) -> EngineResult<String> {
        self.check_open()?;
        let entry = self.schemas.entry(handle)?;
        let schema = entry.lock().await;
        Ok(schema.id().to_string())
    }

    pub async fn schema_get_state(&self, handle: u32) -> EngineResult<PublishState> {
        self.check_open()?;
        let entry = self.schemas.entry(handle)?;
        let schema = entry.lock().await;
        Ok(schema.state())
    }

    pub async fn schema_serialize(&self, handle: u32) -> EngineResult<String> {
        self.check_open()?;
        let entry = self.schemas.entry(handle)?;
        let schema = entry.lock().await;
        schema.to_string()
    }

    pub fn schema_deserialize(&self, snapshot: &str) -> EngineResult<u32> {
        self.check_open()?;
        self.schemas.add(SchemaObject::from_string(snapshot)?)
    }

    pub fn schema_release(&self, handle: u32) -> EngineResult<()> {
        self.schemas.release(handle)
    }

    // ---- credential definition ----

    pub fn cred_def_create(
        &self,
        source_id: &str,
        issuer_did: &str,
        schema_id: &str,
        tag: &str,
        support_revocation: bool,
    ) -> EngineResult<u32> {
        self.check_open()?;
        let cred_def =
            CredDefObject::create(source_id, issuer_did, schema_id, tag, support_revocation)?;
        self.cred_defs.add(cred_def)
    }

    pub async fn cred_def_publish(&self, handle: u32) -> EngineResult<()> {
        self.check_open()?;
        let entry = self.cred_defs.entry(handle)?;
        let mut cred_def = entry.lock().await;
        cred_def.publish(&self.vdr, self.signer.as_ref()).await
    }

    pub async fn cred_def_update_state(&self, handle: u32) -> EngineResult<PublishState> {
        self.check_open()?;
        let entry = self.cred_defs.entry(handle)?;
        let mut cred_def = entry.lock().await;
        cred_def.update_state(&self.vdr).await
    }

    pub async fn cred_def_get_id(&self, handle: u32) -> EngineResult<String> {
        self.check_open()?;
        let entry = self.cred_defs.entry(handle)?;
        let cred_def = entry.lock().await;
        Ok(cred_def.id().to_string())
    }

    pub async fn cred_def_get_state(&self, handle: u32) -> EngineResult<PublishState> {
        self.check_open()?;
        let entry = self.cred_defs.entry(handle)?;
        let cred_def = entry.lock().await;
        Ok(cred_def.state())
    }

    pub async fn cred_def_serialize(&self, handle: u32) -> EngineResult<String> {
        self.check_open()?;
        let entry = self.cred_defs.entry(handle)?;
        let cred_def = entry.lock().await;
        cred_def.to_string()
    }

    pub fn cred_def_deserialize(&self, snapshot: &str) -> EngineResult<u32> {
        self.check_open()?;
        self.cred_defs.add(CredDefObject::from_string(snapshot)?)
    }

    pub fn cred_def_release(&self, handle: u32) -> EngineResult<()> {
        self.cred_defs.release(handle)
    }

    // ---- revocation registry ----

    pub fn rev_reg_create(
        &self,
        source_id: &str,
        issuer_did: &str,
        cred_def_id: &str,
        tag: &str,
        max_creds: u32,
    ) -> EngineResult<u32> {
        self.check_open()?;
        let registry =
            RevocationRegistry::create(source_id, issuer_did, cred_def_id, tag, max_creds)?;
        self.rev_regs.add(registry)
    }

    pub async fn rev_reg_publish(&self, handle: u32) -> EngineResult<()> {
        self.check_open()?;
        let entry = self.rev_regs.entry(handle)?;
        let mut registry = entry.lock().await;
        registry.publish(&self.vdr, self.signer.as_ref()).await
    }

    /// Mark a credential index revoked; deferred until
    /// `rev_reg_publish_revocations`.
    pub async fn rev_reg_revoke_credential(&self, handle: u32, index: u32) -> EngineResult<()> {
        self.check_open()?;
        let entry = self.rev_regs.entry(handle)?;
        let mut registry = entry.lock().await;
        registry.revoke_entry(index)
    }

    /// Fold pending revocations into the published status list. Returns how
    /// many were published.
    pub async fn rev_reg_publish_revocations(&self, handle: u32) -> EngineResult<usize> {
        self.check_open()?;
        let entry = self.rev_regs.entry(handle)?;
        let mut registry = entry.lock().await;
        registry
            .publish_revocations(&self.vdr, self.signer.as_ref())
            .await
    }

    pub async fn rev_reg_update_state(&self, handle: u32) -> EngineResult<PublishState> {
        self.check_open()?;
        let entry = self.rev_regs.entry(handle)?;
        let mut registry = entry.lock().await;
        registry.update_state(&self.vdr).await
    }

    pub async fn rev_reg_get_id(&self, handle: u32) -> EngineResult<String> {
        self.check_open()?;
        let entry = self.rev_regs.entry(handle)?;
        let registry = entry.lock().await;
        Ok(registry.id().to_string())
    }

    pub async fn rev_reg_get_state(&self, handle: u32) -> EngineResult<PublishState> {
        self.check_open()?;
        let entry = self.rev_regs.entry(handle)?;
        let registry = entry.lock().await;
        Ok(registry.state())
    }

    pub async fn rev_reg_serialize(&self, handle: u32) -> EngineResult<String> {
        self.check_open()?;
        let entry = self.rev_regs.entry(handle)?;
        let registry = entry.lock().await;
        registry.to_string()
    }

    pub fn rev_reg_deserialize(&self, snapshot: &str) -> EngineResult<u32> {
        self.check_open()?;
        self.rev_regs
            .add(RevocationRegistry::from_string(snapshot)?)
    }

    pub fn rev_reg_release(&self, handle: u32) -> EngineResult<()> {
        self.rev_regs.release(handle)
    }
}
