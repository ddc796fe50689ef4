use std::sync::Arc;

use anyhow::Result;
use credx_engine::CredxEngine;

/// Institution side of the demo: publishes the ledger artifacts, runs the
/// inviter half of the connection and issues a revocable credential.
pub struct Issuer {
    engine: Arc<CredxEngine>,
    issuer_did: String,
    protocol_data: IssuerProtocolFlowData,
}

#[derive(Default)]
pub struct IssuerProtocolFlowData {
    pub connection: Option<u32>,
    pub schema: Option<u32>,
    pub cred_def: Option<u32>,
    pub rev_reg: Option<u32>,
    pub credential: Option<u32>,
    pub rev_idx: Option<u32>,
}

impl Issuer {
    pub fn bootstrap(engine: Arc<CredxEngine>, issuer_did: &str) -> Self {
        Issuer {
            engine,
            issuer_did: issuer_did.to_string(),
            protocol_data: Default::default(),
        }
    }

    /// Publish schema, credential definition and revocation registry, waiting
    /// on the convergence check for each.
    pub async fn publish_artifacts(&mut self) -> Result<String> {
        let schema = self.engine.schema_create(
            "demo-schema",
            &self.issuer_did,
            "degree",
            "1.0",
            r#"["name", "degree"]"#,
        )?;
        self.engine.schema_publish(schema).await?;
        let schema_id = self.engine.schema_get_id(schema).await?;

        let cred_def = self
            .engine
            .cred_def_create("demo-cred-def", &self.issuer_did, &schema_id, "default", true)?;
        self.engine.cred_def_publish(cred_def).await?;
        let cred_def_id = self.engine.cred_def_get_id(cred_def).await?;

        let rev_reg =
            self.engine
                .rev_reg_create("demo-rev-reg", &self.issuer_did, &cred_def_id, "r0", 16)?;
        self.engine.rev_reg_publish(rev_reg).await?;

        self.protocol_data.schema = Some(schema);
        self.protocol_data.cred_def = Some(cred_def);
        self.protocol_data.rev_reg = Some(rev_reg);
        Ok(cred_def_id)
    }

    /// Create the inviter connection and hand back the invitation JSON.
    pub async fn create_invitation(&mut self) -> Result<String> {
        let connection = self.engine.connection_create_inviter("faber-to-alice", "Faber")?;
        let invitation = self.engine.connection_create_invite(connection).await?;
        self.protocol_data.connection = Some(connection);
        Ok(invitation)
    }

    pub fn connection(&self) -> u32 {
        self.protocol_data.connection.expect("connection not created")
    }

    /// Take the received request and answer it.
    pub async fn respond_to_connection(&self) -> Result<()> {
        let connection = self.connection();
        self.engine.connection_update_state(connection).await?;
        self.engine.connection_send_response(connection).await?;
        Ok(())
    }

    /// Absorb the holder's ack, completing the handshake.
    pub async fn complete_connection(&self) -> Result<()> {
        self.engine.connection_update_state(self.connection()).await?;
        Ok(())
    }

    pub async fn offer_credential(&mut self, cred_def_id: &str) -> Result<()> {
        let credential = self.engine.issuer_credential_create(
            "demo-credential",
            cred_def_id,
            r#"{"name": "Alice", "degree": "Maths"}"#,
        )?;
        let rev_reg = self.protocol_data.rev_reg.expect("rev reg not published");
        let rev_idx = self
            .engine
            .issuer_credential_set_revocation(credential, rev_reg)
            .await?;
        self.engine.issuer_send_offer(credential, self.connection()).await?;
        self.protocol_data.credential = Some(credential);
        self.protocol_data.rev_idx = Some(rev_idx);
        Ok(())
    }

    /// Once the holder's request arrived, issue the credential.
    pub async fn issue_credential(&self) -> Result<()> {
        let credential = self.protocol_data.credential.expect("no offer sent");
        self.engine
            .issuer_update_state(credential, self.connection())
            .await?;
        self.engine.issuer_send_credential(credential).await?;
        Ok(())
    }

    /// Revoke the issued credential and publish the status list update.
    pub async fn revoke_issued_credential(&self) -> Result<usize> {
        let rev_reg = self.protocol_data.rev_reg.expect("rev reg not published");
        let rev_idx = self.protocol_data.rev_idx.expect("no revocable credential");
        self.engine.rev_reg_revoke_credential(rev_reg, rev_idx).await?;
        Ok(self.engine.rev_reg_publish_revocations(rev_reg).await?)
    }

    pub fn rev_reg(&self) -> u32 {
        self.protocol_data.rev_reg.expect("rev reg not published")
    }

    pub async fn connection_state(&self) -> Result<String> {
        let state = self.engine.connection_get_state(self.connection()).await?;
        Ok(format!("{state:?}"))
    }
}
