use crate::error::{VdrError, VdrResult};
use crate::ledger::LedgerKind;

/// A fully-qualified identifier: a DID, schema id or credential definition id
/// whose namespace segment determines ledger routing.
///
/// Supported forms:
///   did:<namespace>:<id>                  e.g. did:sovrin:V4SG...
///   did:<method>:<namespace>:<id>         e.g. did:indy:sovrin:V4SG...
///   did:cheqd:<network>:<id>              namespace is "cheqd:<network>"
///   <did>/<resource...>                   schema / cred def paths
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FullyQualifiedId {
    pub method: String,
    pub namespace: String,
    pub id: String,
    /// Path after the DID part, e.g. "anoncreds/v0/SCHEMA/licence/1.0".
    pub resource_path: Option<String>,
}

impl FullyQualifiedId {
    pub fn parse(value: &str) -> VdrResult<Self> {
        let (did_part, resource_path) = match value.split_once('/') {
            Some((did, path)) => (did, Some(path.to_string())),
            None => (value, None),
        };

        let mut segments = did_part.split(':');
        match segments.next() {
            Some("did") => {}
            _ => {
                return Err(VdrError::InvalidInput(format!(
                    "id is not fully-qualified, expected did prefix: {value}"
                )))
            }
        }

        let rest: Vec<&str> = segments.collect();
        if rest.len() < 2 || rest.iter().any(|s| s.is_empty()) {
            return Err(VdrError::InvalidInput(format!(
                "id is missing a namespace or identifier: {value}"
            )));
        }

        let method = rest[0].to_string();
        let middle = &rest[1..rest.len() - 1];
        let id = rest[rest.len() - 1].to_string();

        // did:sovrin:abc uses its method as the namespace; cheqd keeps the
        // method as the namespace family prefix ("cheqd:testnet")
        let namespace = if middle.is_empty() {
            method.clone()
        } else if method == "cheqd" {
            format!("cheqd:{}", middle.join(":"))
        } else {
            middle.join(":")
        };

        Ok(FullyQualifiedId {
            method,
            namespace,
            id,
            resource_path,
        })
    }

    /// The namespace used for adapter routing.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn did(&self) -> String {
        if self.method == self.namespace {
            format!("did:{}:{}", self.namespace, self.id)
        } else if self.namespace.starts_with(&format!("{}:", self.method)) {
            format!("did:{}:{}", self.namespace, self.id)
        } else {
            format!("did:{}:{}:{}", self.method, self.namespace, self.id)
        }
    }

    /// Ledger family implied by the DID method, when the method names one.
    /// Methods like `did:sovrin` imply nothing; routing alone decides.
    pub fn ledger_kind(&self) -> Option<LedgerKind> {
        match self.method.as_str() {
            "indy" | "sov" => Some(LedgerKind::Indy),
            "cheqd" => Some(LedgerKind::Cheqd),
            _ => None,
        }
    }
}

impl std::fmt::Display for FullyQualifiedId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.resource_path {
            Some(path) => write!(f, "{}/{}", self.did(), path),
            None => write!(f, "{}", self.did()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_method_as_namespace() {
        let id = FullyQualifiedId::parse("did:sovrin:V4SGRU86Z58d6TV7PBUe6f").unwrap();
        assert_eq!(id.method, "sovrin");
        assert_eq!(id.namespace(), "sovrin");
        assert_eq!(id.id, "V4SGRU86Z58d6TV7PBUe6f");
        assert_eq!(id.ledger_kind(), None);
        assert_eq!(id.did(), "did:sovrin:V4SGRU86Z58d6TV7PBUe6f");
    }

    #[test]
    fn parse_fully_qualified_indy() {
        let id = FullyQualifiedId::parse("did:indy:sovrin:V4SGRU86Z58d6TV7PBUe6f").unwrap();
        assert_eq!(id.method, "indy");
        assert_eq!(id.namespace(), "sovrin");
        assert_eq!(id.ledger_kind(), Some(LedgerKind::Indy));
        assert_eq!(id.did(), "did:indy:sovrin:V4SGRU86Z58d6TV7PBUe6f");
    }

    #[test]
    fn parse_cheqd_network_namespace() {
        let id = FullyQualifiedId::parse("did:cheqd:testnet:zF7rhDBfUt9d1gJPjx7s1J").unwrap();
        assert_eq!(id.namespace(), "cheqd:testnet");
        assert_eq!(id.id, "zF7rhDBfUt9d1gJPjx7s1J");
        assert_eq!(id.ledger_kind(), Some(LedgerKind::Cheqd));
        assert_eq!(id.did(), "did:cheqd:testnet:zF7rhDBfUt9d1gJPjx7s1J");
    }

    #[test]
    fn parse_schema_path() {
        let id =
            FullyQualifiedId::parse("did:indy:sovrin:abc/anoncreds/v0/SCHEMA/licence/1.0").unwrap();
        assert_eq!(id.id, "abc");
        assert_eq!(
            id.resource_path.as_deref(),
            Some("anoncreds/v0/SCHEMA/licence/1.0")
        );
        assert_eq!(
            id.to_string(),
            "did:indy:sovrin:abc/anoncreds/v0/SCHEMA/licence/1.0"
        );
    }

    #[test]
    fn reject_malformed() {
        assert!(FullyQualifiedId::parse("sovrin:abc").is_err());
        assert!(FullyQualifiedId::parse("did:indy").is_err());
        assert!(FullyQualifiedId::parse("did::abc:def").is_err());
        assert!(FullyQualifiedId::parse("did:sovrin").is_err());
    }
}
