use async_trait::async_trait;
use url::Url;

use crate::error::{VdrError, VdrResult};
use crate::transport::LedgerTransport;

/// HTTP JSON transport for reaching a live ledger node.
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: Url,
}

impl HttpTransport {
    pub fn new(endpoint: &str) -> VdrResult<Self> {
        let endpoint = Url::parse(endpoint)
            .map_err(|err| VdrError::InvalidInput(format!("invalid node address {endpoint}: {err}")))?;
        Ok(HttpTransport {
            client: reqwest::Client::new(),
            endpoint,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl LedgerTransport for HttpTransport {
    async fn submit(&self, request: &str) -> VdrResult<String> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .header("content-type", "application/json")
            .body(request.to_string())
            .send()
            .await
            .map_err(|err| VdrError::Ledger {
                message: format!("node unreachable: {err}"),
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|err| VdrError::Ledger {
            message: format!("failed reading node response: {err}"),
        })?;

        if !status.is_success() {
            return Err(VdrError::Ledger {
                message: format!("node returned {status}: {body}"),
            });
        }
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_bad_endpoint() {
        assert!(HttpTransport::new("not a url").is_err());
        assert!(HttpTransport::new("http://localhost:9702").is_ok());
    }
}
