mod config;
mod roles;

use std::sync::Arc;

use anyhow::Result;
use serde_json::json;

use credx_engine::{CredxEngine, InMemoryTransport, InMemoryWallet, KeyedDigestSigner};
use multiledger_vdr::transport::in_memory::InMemoryLedgerNode;
use multiledger_vdr::Vdr;

use config::DemoConfig;
use roles::holder::Holder;
use roles::issuer::Issuer;
use roles::verifier::Verifier;

/// End-to-end walk: register a namespace, publish the anoncreds artifacts,
/// connect Faber and Alice, issue a revocable credential, present it, then
/// revoke it and watch the holder converge.
#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = DemoConfig::load();
    println!("1. setting up an in-memory {} ledger", config.namespace);

    let node = Arc::new(InMemoryLedgerNode::new());
    node.seed_did(&config.issuer_did, &config.issuer_verkey);

    let genesis = json!({"txn": {"type": "0", "data": {"alias": "DemoNode"}}}).to_string() + "\n";
    let mut builder = Vdr::builder();
    builder.register_indy_ledger(
        &[config.namespace.clone()],
        &genesis,
        None,
        node.clone(),
    )?;
    let vdr = Arc::new(builder.finalize());

    let statuses = vdr.ping(&[config.namespace.clone()]).await?;
    println!("   ping: {:?}", statuses[&config.namespace].code);

    let engine = Arc::new(CredxEngine::new(
        vdr,
        Arc::new(InMemoryWallet::new()),
        Arc::new(InMemoryTransport::new()),
        Arc::new(KeyedDigestSigner::new(&config.issuer_verkey)),
    ));

    println!("2. publishing schema, cred def and revocation registry");
    let mut issuer = Issuer::bootstrap(engine.clone(), &config.issuer_did);
    let cred_def_id = issuer.publish_artifacts().await?;
    println!("   cred def: {cred_def_id}");

    println!("3. connecting Faber and Alice");
    let invitation = issuer.create_invitation().await?;
    let mut holder = Holder::bootstrap(engine.clone());
    holder.accept_invitation(&invitation).await?;
    issuer.respond_to_connection().await?;
    holder.finish_connection().await?;
    issuer.complete_connection().await?;
    println!("   faber side: {}", issuer.connection_state().await?);

    println!("4. issuing a revocable credential");
    issuer.offer_credential(&cred_def_id).await?;
    holder.accept_offer().await?;
    issuer.issue_credential().await?;
    holder.store_credential().await?;
    println!("   stored: {}", holder.credential_attributes().await?);

    println!("5. presenting the credential");
    let mut verifier = Verifier::bootstrap(engine.clone());
    verifier.request_presentation(issuer.connection()).await?;
    holder.present_credential().await?;
    let valid = verifier.verify_presentation(issuer.connection()).await?;
    holder.finish_presentation().await?;
    println!("   presentation valid: {valid}");

    println!("6. revoking the credential");
    let published = issuer.revoke_issued_credential().await?;
    println!("   revocations published: {published}");
    let state = holder.check_revocation(issuer.rev_reg()).await?;
    println!("   holder credential state: {state}");

    println!("7. shutting down");
    engine.shutdown().await?;
    Ok(())
}
