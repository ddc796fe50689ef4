use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::{EngineError, EngineResult};
use crate::messages::{
    Ack, ConnectionInvitation, ConnectionRequest, ConnectionResponse, ProtocolMessage,
};
use crate::protocols::{from_snapshot, to_snapshot};
use crate::transport::MessageTransport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    Initialized,
    Invited,
    Requested,
    Responded,
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionRole {
    Inviter,
    Invitee,
}

/// Pairwise connection state machine.
///
/// Inviter: Initialized -> Invited (create_invite) -> Requested (request
/// arrives) -> Responded (send_response) -> Complete (ack arrives).
/// Invitee: Invited (from invitation) -> Requested (connect) -> Responded
/// (response arrives) -> Complete (send_ack).
///
/// Explicit calls advance state only when the transport accepts the message;
/// inbound messages advance deterministically by type. `Complete` is
/// terminal: only serialize / get-state / release remain valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    pub source_id: String,
    pub role: ConnectionRole,
    pub state: ConnectionState,
    /// Our pairwise DID on this connection.
    pub pairwise_did: String,
    pub their_did: Option<String>,
    pub thread_id: Option<String>,
    pub invitation: Option<ConnectionInvitation>,
    pub label: String,
}

impl Connection {
    pub fn create_inviter(source_id: &str, label: &str, pairwise_did: &str) -> Self {
        Connection {
            source_id: source_id.to_string(),
            role: ConnectionRole::Inviter,
            state: ConnectionState::Initialized,
            pairwise_did: pairwise_did.to_string(),
            their_did: None,
            thread_id: None,
            invitation: None,
            label: label.to_string(),
        }
    }

    /// Build an invitee connection from a received invitation. The invitation
    /// id becomes the protocol thread id.
    pub fn create_invitee(
        source_id: &str,
        label: &str,
        pairwise_did: &str,
        invitation: ConnectionInvitation,
    ) -> Self {
        Connection {
            source_id: source_id.to_string(),
            role: ConnectionRole::Invitee,
            state: ConnectionState::Invited,
            pairwise_did: pairwise_did.to_string(),
            their_did: Some(invitation.recipient_did.clone()),
            thread_id: Some(invitation.id.clone()),
            invitation: Some(invitation),
            label: label.to_string(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn thread_id(&self) -> Option<&str> {
        self.thread_id.as_deref()
    }

    pub fn their_did(&self) -> EngineResult<&str> {
        self.their_did.as_deref().ok_or_else(|| {
            EngineError::InvalidState("connection has no counterparty yet".to_string())
        })
    }

    pub fn is_terminal(&self) -> bool {
        self.state == ConnectionState::Complete
    }

    /// Inviter: produce the invitation to hand out of band.
    pub fn create_invite(&mut self) -> EngineResult<ConnectionInvitation> {
        if self.role != ConnectionRole::Inviter {
            return Err(EngineError::InvalidState(
                "only the inviter creates invitations".to_string(),
            ));
        }
        if self.state != ConnectionState::Initialized {
            return Err(EngineError::InvalidState(format!(
                "cannot create invite in state {:?}",
                self.state
            )));
        }
        let invitation =
            ConnectionInvitation::new(&self.label, &self.pairwise_did, "in-process");
        self.thread_id = Some(invitation.id.clone());
        self.invitation = Some(invitation.clone());
        self.state = ConnectionState::Invited;
        trace!(source_id = %self.source_id, "connection invited");
        Ok(invitation)
    }

    /// Invite details for re-display; valid any time after the invitation
    /// exists.
    pub fn invite_details(&self) -> EngineResult<&ConnectionInvitation> {
        self.invitation.as_ref().ok_or_else(|| {
            EngineError::InvalidState("connection has no invitation".to_string())
        })
    }

    /// Invitee: send the connection request. Advances only if the transport
    /// accepts the message.
    pub async fn connect(&mut self, transport: &dyn MessageTransport) -> EngineResult<()> {
        if self.role != ConnectionRole::Invitee || self.state != ConnectionState::Invited {
            return Err(EngineError::InvalidState(format!(
                "cannot connect as {:?} in state {:?}",
                self.role, self.state
            )));
        }
        let thread_id = self
            .thread_id
            .clone()
            .ok_or_else(|| EngineError::Internal("invitee has no thread id".to_string()))?;
        let request = ConnectionRequest {
            id: crate::messages::new_message_id(),
            thid: thread_id,
            label: self.label.clone(),
            did: self.pairwise_did.clone(),
        };
        transport
            .send(self.their_did()?, ProtocolMessage::ConnectionRequest(request))
            .await?;
        self.state = ConnectionState::Requested;
        trace!(source_id = %self.source_id, "connection requested");
        Ok(())
    }

    /// Inviter: answer a received request. Advances only on transport success.
    pub async fn send_response(&mut self, transport: &dyn MessageTransport) -> EngineResult<()> {
        if self.role != ConnectionRole::Inviter || self.state != ConnectionState::Requested {
            return Err(EngineError::InvalidState(format!(
                "cannot send response as {:?} in state {:?}",
                self.role, self.state
            )));
        }
        let thread_id = self
            .thread_id
            .clone()
            .ok_or_else(|| EngineError::Internal("inviter has no thread id".to_string()))?;
        let response = ConnectionResponse {
            id: crate::messages::new_message_id(),
            thid: thread_id,
            did: self.pairwise_did.clone(),
        };
        transport
            .send(self.their_did()?, ProtocolMessage::ConnectionResponse(response))
            .await?;
        self.state = ConnectionState::Responded;
        trace!(source_id = %self.source_id, "connection responded");
        Ok(())
    }

    /// Invitee: acknowledge the response, completing the connection.
    pub async fn send_ack(&mut self, transport: &dyn MessageTransport) -> EngineResult<()> {
        if self.role != ConnectionRole::Invitee || self.state != ConnectionState::Responded {
            return Err(EngineError::InvalidState(format!(
                "cannot send ack as {:?} in state {:?}",
                self.role, self.state
            )));
        }
        let thread_id = self
            .thread_id
            .clone()
            .ok_or_else(|| EngineError::Internal("invitee has no thread id".to_string()))?;
        transport
            .send(self.their_did()?, ProtocolMessage::Ack(Ack::new(&thread_id)))
            .await?;
        self.state = ConnectionState::Complete;
        trace!(source_id = %self.source_id, "connection complete");
        Ok(())
    }

    /// Apply one inbound message. Deterministic: the same message in the same
    /// state always yields the same next state; messages that do not fit the
    /// current state are ignored.
    pub fn handle_message(&mut self, message: &ProtocolMessage) -> EngineResult<()> {
        match (self.role, self.state, message) {
            (
                ConnectionRole::Inviter,
                ConnectionState::Invited,
                ProtocolMessage::ConnectionRequest(request),
            ) => {
                if Some(request.thid.as_str()) != self.thread_id.as_deref() {
                    return Ok(());
                }
                self.their_did = Some(request.did.clone());
                self.state = ConnectionState::Requested;
            }
            (
                ConnectionRole::Invitee,
                ConnectionState::Requested,
                ProtocolMessage::ConnectionResponse(response),
            ) => {
                if Some(response.thid.as_str()) != self.thread_id.as_deref() {
                    return Ok(());
                }
                self.their_did = Some(response.did.clone());
                self.state = ConnectionState::Responded;
            }
            (ConnectionRole::Inviter, ConnectionState::Responded, ProtocolMessage::Ack(ack)) => {
                if Some(ack.thid.as_str()) != self.thread_id.as_deref() {
                    return Ok(());
                }
                self.state = ConnectionState::Complete;
                trace!(source_id = %self.source_id, "connection complete");
            }
            _ => {}
        }
        Ok(())
    }

    /// Pull: ask the transport for new messages on this connection's thread
    /// and apply them. A no-op when nothing arrived.
    pub async fn update_state(&mut self, transport: &dyn MessageTransport) -> EngineResult<()> {
        if self.is_terminal() {
            return Ok(());
        }
        let thread_id = match &self.thread_id {
            Some(thread_id) => thread_id.clone(),
            None => return Ok(()),
        };
        let messages = transport
            .fetch(&self.pairwise_did, Some(&thread_id))
            .await?;
        for message in &messages {
            self.handle_message(message)?;
        }
        Ok(())
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
    use crate::transport::InMemoryTransport;

    async fn complete_pair(
        transport: &InMemoryTransport,
    ) -> (Connection, Connection) {
        let mut inviter = Connection::create_inviter("faber", "Faber", "did:peer:faber-1");
        let invitation = inviter.create_invite().unwrap();

        let mut invitee =
            Connection::create_invitee("alice", "Alice", "did:peer:alice-1", invitation);
        invitee.connect(transport).await.unwrap();

        inviter.update_state(transport).await.unwrap();
        assert_eq!(inviter.state(), ConnectionState::Requested);
        inviter.send_response(transport).await.unwrap();

        invitee.update_state(transport).await.unwrap();
        assert_eq!(invitee.state(), ConnectionState::Responded);
        invitee.send_ack(transport).await.unwrap();
        assert_eq!(invitee.state(), ConnectionState::Complete);

        inviter.update_state(transport).await.unwrap();
        assert_eq!(inviter.state(), ConnectionState::Complete);

        (inviter, invitee)
    }

    #[tokio::test]
    async fn full_handshake_completes_both_sides() {
        let transport = InMemoryTransport::new();
        let (inviter, invitee) = complete_pair(&transport).await;
        assert_eq!(inviter.their_did().unwrap(), "did:peer:alice-1");
        assert_eq!(invitee.their_did().unwrap(), "did:peer:faber-1");
        assert_eq!(inviter.thread_id(), invitee.thread_id());
    }

    #[tokio::test]
    async fn update_state_with_nothing_pending_is_a_noop() {
        let transport = InMemoryTransport::new();
        let mut inviter = Connection::create_inviter("faber", "Faber", "did:peer:faber-1");
        inviter.create_invite().unwrap();

        inviter.update_state(&transport).await.unwrap();
        assert_eq!(inviter.state(), ConnectionState::Invited);
    }

    #[tokio::test]
    async fn operations_invalid_for_state_are_state_errors() {
        let transport = InMemoryTransport::new();
        let mut inviter = Connection::create_inviter("faber", "Faber", "did:peer:faber-1");

        // responding before any request arrived
        let err = inviter.send_response(&transport).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidState(_)));

        // an invitee never creates invitations
        let invitation = inviter.create_invite().unwrap();
        let mut invitee =
            Connection::create_invitee("alice", "Alice", "did:peer:alice-1", invitation);
        let err = invitee.create_invite().unwrap_err();
        assert!(matches!(err, EngineError::InvalidState(_)));
    }

    #[tokio::test]
    async fn messages_for_other_threads_are_ignored() {
        let transport = InMemoryTransport::new();
        let mut inviter = Connection::create_inviter("faber", "Faber", "did:peer:faber-1");
        inviter.create_invite().unwrap();

        let stray = ConnectionRequest {
            id: "m-1".to_string(),
            thid: "some-other-thread".to_string(),
            label: "Mallory".to_string(),
            did: "did:peer:mallory-1".to_string(),
        };
        inviter
            .handle_message(&ProtocolMessage::ConnectionRequest(stray))
            .unwrap();
        assert_eq!(inviter.state(), ConnectionState::Invited);
        assert!(inviter.their_did.is_none());
    }

    #[tokio::test]
    async fn snapshot_roundtrip_preserves_behavior() {
        let transport = InMemoryTransport::new();
        let (inviter, _) = complete_pair(&transport).await;

        let snapshot = inviter.to_string().unwrap();
        let restored = Connection::from_string(&snapshot).unwrap();
        assert_eq!(restored, inviter);
        assert_eq!(restored.to_string().unwrap(), snapshot);
        assert_eq!(restored.state(), inviter.state());
    }
}
