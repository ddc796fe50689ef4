use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::{EngineError, EngineResult};
use crate::messages::{ConnectionRequest, ProtocolMessage};
use crate::protocols::connection::{Connection, ConnectionRole, ConnectionState};
use crate::protocols::{from_snapshot, to_snapshot};
use crate::transport::MessageTransport;

/// Institution-side agent reachable at a public DID. Holds routing metadata
/// only; inbound connection requests are downloaded from the transport and
/// accepted into inviter connections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublicAgent {
    pub source_id: String,
    pub agent_did: String,
    pub service_endpoint: String,
}

impl PublicAgent {
    pub fn create(source_id: &str, agent_did: &str, service_endpoint: &str) -> EngineResult<Self> {
        if agent_did.is_empty() {
            return Err(EngineError::InvalidInput(
                "public agent requires a did".to_string(),
            ));
        }
        Ok(PublicAgent {
            source_id: source_id.to_string(),
            agent_did: agent_did.to_string(),
            service_endpoint: service_endpoint.to_string(),
        })
    }

    /// Connection requests addressed to the public DID that have not yet been
    /// accepted. Non-request traffic is left in place.
    pub async fn download_connection_requests(
        &self,
        transport: &dyn MessageTransport,
    ) -> EngineResult<Vec<ConnectionRequest>> {
        let messages = transport.fetch(&self.agent_did, None).await?;
        let mut requests = Vec::new();
        for message in messages {
            if let ProtocolMessage::ConnectionRequest(request) = message {
                requests.push(request);
            } else {
                // not ours to consume; push it back
                transport.send(&self.agent_did, message).await?;
            }
        }
        trace!(source_id = %self.source_id, count = requests.len(), "connection requests downloaded");
        Ok(requests)
    }

    /// Accept a downloaded request, producing an inviter connection already
    /// advanced to `Requested` with the requester as counterparty.
    pub fn accept_connection_request(
        &self,
        request: &ConnectionRequest,
        pairwise_did: &str,
    ) -> Connection {
        let mut connection = Connection::create_inviter(
            &format!("{}:{}", self.source_id, request.label),
            &request.label,
            pairwise_did,
        );
        connection.role = ConnectionRole::Inviter;
        connection.state = ConnectionState::Requested;
        connection.their_did = Some(request.did.clone());
        connection.thread_id = Some(request.thid.clone());
        connection
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
    use crate::messages::Ack;
    use crate::transport::InMemoryTransport;

    #[tokio::test]
    async fn downloads_requests_and_leaves_other_traffic() {
        let transport = InMemoryTransport::new();
        let agent = PublicAgent::create("agent-1", "did:indy:sovrin:faber", "in-process").unwrap();

        transport
            .send(
                "did:indy:sovrin:faber",
                ProtocolMessage::ConnectionRequest(ConnectionRequest {
                    id: "m-1".to_string(),
                    thid: "t-1".to_string(),
                    label: "Alice".to_string(),
                    did: "did:peer:alice-1".to_string(),
                }),
            )
            .await
            .unwrap();
        transport
            .send("did:indy:sovrin:faber", ProtocolMessage::Ack(Ack::new("t-2")))
            .await
            .unwrap();

        let requests = agent.download_connection_requests(&transport).await.unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].label, "Alice");
        // the ack is still waiting
        assert_eq!(transport.pending("did:indy:sovrin:faber"), 1);
    }

    #[tokio::test]
    async fn accepting_a_request_yields_a_requested_connection() {
        let transport = InMemoryTransport::new();
        let agent = PublicAgent::create("agent-1", "did:indy:sovrin:faber", "in-process").unwrap();
        let request = ConnectionRequest {
            id: "m-1".to_string(),
            thid: "t-1".to_string(),
            label: "Alice".to_string(),
            did: "did:peer:alice-1".to_string(),
        };

        let mut connection = agent.accept_connection_request(&request, "did:peer:faber-9");
        assert_eq!(connection.state(), ConnectionState::Requested);
        assert_eq!(connection.their_did().unwrap(), "did:peer:alice-1");

        // the accepted connection can continue the normal handshake
        connection.send_response(&transport).await.unwrap();
        assert_eq!(connection.state(), ConnectionState::Responded);
    }

    #[test]
    fn snapshot_roundtrip() {
        let agent = PublicAgent::create("agent-1", "did:indy:sovrin:faber", "in-process").unwrap();
        let snapshot = agent.to_string().unwrap();
        let restored = PublicAgent::from_string(&snapshot).unwrap();
        assert_eq!(restored, agent);
    }
}
