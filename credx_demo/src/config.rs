use std::env;

use dotenv::dotenv;

/// Demo configuration, loaded from the environment with local defaults.
#[derive(Debug, Clone)]
pub struct DemoConfig {
    pub namespace: String,
    pub issuer_did: String,
    pub issuer_verkey: String,
}

impl DemoConfig {
    pub fn load() -> Self {
        dotenv().ok();

        DemoConfig {
            namespace: env::var("DEMO_NAMESPACE").unwrap_or_else(|_| "sovrin".to_string()),
            issuer_did: env::var("DEMO_ISSUER_DID")
                .unwrap_or_else(|_| "did:indy:sovrin:faber".to_string()),
            issuer_verkey: env::var("DEMO_ISSUER_VERKEY")
                .unwrap_or_else(|_| "faber-verkey".to_string()),
        }
    }
}
