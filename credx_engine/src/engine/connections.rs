use tracing::trace;

use crate::engine::CredxEngine;
use crate::error::EngineResult;
use crate::messages::{ConnectionInvitation, ProtocolMessage};
use crate::protocols::connection::{Connection, ConnectionState};
use crate::protocols::public_agent::PublicAgent;

/// Connection operations. Every operation takes an opaque handle; mutating
/// operations serialize per handle through the registry's entry locks.
impl CredxEngine {
    pub fn connection_create_inviter(&self, source_id: &str, label: &str) -> EngineResult<u32> {
        self.check_open()?;
        let connection = Connection::create_inviter(source_id, label, &Self::new_pairwise_did());
        self.connections.add(connection)
    }

    pub fn connection_create_from_invite(
        &self,
        source_id: &str,
        label: &str,
        invitation_json: &str,
    ) -> EngineResult<u32> {
        self.check_open()?;
        let invitation: ConnectionInvitation = serde_json::from_str(invitation_json)?;
        let connection =
            Connection::create_invitee(source_id, label, &Self::new_pairwise_did(), invitation);
        self.connections.add(connection)
    }

    /// Inviter: create and return the invitation JSON to hand out of band.
    pub async fn connection_create_invite(&self, handle: u32) -> EngineResult<String> {
        self.check_open()?;
        let entry = self.connections.entry(handle)?;
        let mut connection = entry.lock().await;
        let invitation = connection.create_invite()?;
        Ok(serde_json::to_string(&invitation)?)
    }

    pub async fn connection_connect(&self, handle: u32) -> EngineResult<()> {
        self.check_open()?;
        let entry = self.connections.entry(handle)?;
        let mut connection = entry.lock().await;
        connection.connect(self.transport.as_ref()).await
    }

    pub async fn connection_send_response(&self, handle: u32) -> EngineResult<()> {
        self.check_open()?;
        let entry = self.connections.entry(handle)?;
        let mut connection = entry.lock().await;
        connection.send_response(self.transport.as_ref()).await
    }

    pub async fn connection_send_ack(&self, handle: u32) -> EngineResult<()> {
        self.check_open()?;
        let entry = self.connections.entry(handle)?;
        let mut connection = entry.lock().await;
        connection.send_ack(self.transport.as_ref()).await
    }

    /// Pull new messages for this connection's thread and apply them.
    pub async fn connection_update_state(&self, handle: u32) -> EngineResult<ConnectionState> {
        self.check_open()?;
        let entry = self.connections.entry(handle)?;
        let mut connection = entry.lock().await;
        connection.update_state(self.transport.as_ref()).await?;
        Ok(connection.state())
    }

    /// Apply one inbound message directly, without polling the transport.
    pub async fn connection_update_state_with_message(
        &self,
        handle: u32,
        message_json: &str,
    ) -> EngineResult<ConnectionState> {
        self.check_open()?;
        let message = ProtocolMessage::from_json(message_json)?;
        let entry = self.connections.entry(handle)?;
        let mut connection = entry.lock().await;
        connection.handle_message(&message)?;
        Ok(connection.state())
    }

    pub async fn connection_get_state(&self, handle: u32) -> EngineResult<ConnectionState> {
        self.check_open()?;
        let entry = self.connections.entry(handle)?;
        let connection = entry.lock().await;
        Ok(connection.state())
    }

    pub async fn connection_thread_id(&self, handle: u32) -> EngineResult<Option<String>> {
        self.check_open()?;
        let entry = self.connections.entry(handle)?;
        let connection = entry.lock().await;
        Ok(connection.thread_id().map(str::to_string))
    }

    pub async fn connection_pairwise_did(&self, handle: u32) -> EngineResult<String> {
        self.check_open()?;
        let entry = self.connections.entry(handle)?;
        let connection = entry.lock().await;
        Ok(connection.pairwise_did.clone())
    }

    pub async fn connection_their_did(&self, handle: u32) -> EngineResult<String> {
        self.check_open()?;
        let entry = self.connections.entry(handle)?;
        let connection = entry.lock().await;
        Ok(connection.their_did()?.to_string())
    }

    pub async fn connection_invite_details(&self, handle: u32) -> EngineResult<String> {
        self.check_open()?;
        let entry = self.connections.entry(handle)?;
        let connection = entry.lock().await;
        Ok(serde_json::to_string(connection.invite_details()?)?)
    }

    pub async fn connection_serialize(&self, handle: u32) -> EngineResult<String> {
        self.check_open()?;
        let entry = self.connections.entry(handle)?;
        let connection = entry.lock().await;
        connection.to_string()
    }

    pub fn connection_deserialize(&self, snapshot: &str) -> EngineResult<u32> {
        self.check_open()?;
        let connection = Connection::from_string(snapshot)?;
        self.connections.add(connection)
    }

    pub fn connection_release(&self, handle: u32) -> EngineResult<()> {
        self.connections.release(handle)
    }

    // ---- public agent ----

    pub fn public_agent_create(
        &self,
        source_id: &str,
        agent_did: &str,
        service_endpoint: &str,
    ) -> EngineResult<u32> {
        self.check_open()?;
        let agent = PublicAgent::create(source_id, agent_did, service_endpoint)?;
        self.public_agents.add(agent)
    }

    pub async fn public_agent_download_connection_requests(
        &self,
        handle: u32,
    ) -> EngineResult<Vec<String>> {
        self.check_open()?;
        let entry = self.public_agents.entry(handle)?;
        let agent = entry.lock().await;
        let requests = agent
            .download_connection_requests(self.transport.as_ref())
            .await?;
        let mut out = Vec::with_capacity(requests.len());
        for request in requests {
            out.push(serde_json::to_string(&request)?);
        }
        Ok(out)
    }

    /// Accept a downloaded connection request into a new inviter connection
    /// handle, already in `Requested` state.
    pub async fn public_agent_accept_connection_request(
        &self,
        handle: u32,
        request_json: &str,
    ) -> EngineResult<u32> {
        self.check_open()?;
        let request = serde_json::from_str(request_json)?;
        let entry = self.public_agents.entry(handle)?;
        let agent = entry.lock().await;
        let connection = agent.accept_connection_request(&request, &Self::new_pairwise_did());
        drop(agent);
        trace!("connection request accepted");
        self.connections.add(connection)
    }

    pub async fn public_agent_serialize(&self, handle: u32) -> EngineResult<String> {
        self.check_open()?;
        let entry = self.public_agents.entry(handle)?;
        let agent = entry.lock().await;
        agent.to_string()
    }

    pub fn public_agent_deserialize(&self, snapshot: &str) -> EngineResult<u32> {
        self.check_open()?;
        let agent = PublicAgent::from_string(snapshot)?;
        self.public_agents.add(agent)
    }

    pub fn public_agent_release(&self, handle: u32) -> EngineResult<()> {
        self.public_agents.release(handle)
    }
}
