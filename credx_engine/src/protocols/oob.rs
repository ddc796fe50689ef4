use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::{EngineError, EngineResult};
use crate::messages::{ConnectionInvitation, OobService, OutOfBandInvitation, ProtocolMessage};
use crate::protocols::connection::Connection;
use crate::protocols::{from_snapshot, to_snapshot};

/// Out-of-band sender: accumulates label, goal, handshake protocols, attached
/// messages and services into a single invitation envelope. Not a state
/// machine; once serialized the envelope is final.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutOfBandSender {
    pub source_id: String,
    pub invitation: OutOfBandInvitation,
}

impl OutOfBandSender {
    pub fn create(source_id: &str) -> Self {
        OutOfBandSender {
            source_id: source_id.to_string(),
            invitation: OutOfBandInvitation::new(),
        }
    }

    pub fn set_label(&mut self, label: &str) -> &mut Self {
        self.invitation.label = Some(label.to_string());
        self
    }

    pub fn set_goal(&mut self, goal: &str) -> &mut Self {
        self.invitation.goal = Some(goal.to_string());
        self
    }

    pub fn set_goal_code(&mut self, goal_code: &str) -> &mut Self {
        self.invitation.goal_code = Some(goal_code.to_string());
        self
    }

    pub fn append_handshake_protocol(&mut self, protocol: &str) -> &mut Self {
        self.invitation
            .handshake_protocols
            .push(protocol.to_string());
        self
    }

    /// Attach a request message to deliver with the invitation itself.
    pub fn append_message(&mut self, message: ProtocolMessage) -> EngineResult<&mut Self> {
        if matches!(message, ProtocolMessage::OutOfBandInvitation(_)) {
            return Err(EngineError::InvalidInput(
                "cannot nest an out-of-band invitation".to_string(),
            ));
        }
        self.invitation.requests.push(message);
        Ok(self)
    }

    pub fn append_service_did(&mut self, did: &str) -> &mut Self {
        self.invitation.services.push(OobService::Did(did.to_string()));
        self
    }

    pub fn append_service(&mut self, recipient_did: &str, service_endpoint: &str) -> &mut Self {
        self.invitation.services.push(OobService::Inline {
            recipient_did: recipient_did.to_string(),
            service_endpoint: service_endpoint.to_string(),
        });
        self
    }

    pub fn thread_id(&self) -> &str {
        &self.invitation.id
    }

    pub fn to_message(&self) -> ProtocolMessage {
        ProtocolMessage::OutOfBandInvitation(self.invitation.clone())
    }

    pub fn to_string(&self) -> EngineResult<String> {
        to_snapshot(self)
    }

    pub fn from_string(snapshot: &str) -> EngineResult<Self> {
        from_snapshot(snapshot)
    }
}

/// Out-of-band receiver: parses an incoming envelope, can extract the inner
/// message, and checks whether the envelope resumes an existing connection
/// before a new one is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutOfBandReceiver {
    pub source_id: String,
    pub invitation: OutOfBandInvitation,
}

impl OutOfBandReceiver {
    pub fn create_from_message(source_id: &str, message: &ProtocolMessage) -> EngineResult<Self> {
        match message {
            ProtocolMessage::OutOfBandInvitation(invitation) => Ok(OutOfBandReceiver {
                source_id: source_id.to_string(),
                invitation: invitation.clone(),
            }),
            other => Err(EngineError::InvalidInput(format!(
                "message is not an out-of-band invitation: {:?}",
                other.thread_id()
            ))),
        }
    }

    pub fn thread_id(&self) -> &str {
        &self.invitation.id
    }

    /// The first attached request message, when the envelope carries one.
    pub fn extract_message(&self) -> Option<&ProtocolMessage> {
        self.invitation.requests.first()
    }

    /// Dedup step run before `build_connection`: does this envelope reference
    /// a connection we already have? Matches the envelope thread id against
    /// connection threads and the sender's service DIDs against connection
    /// counterparties. Returns the first matching handle.
    pub fn connection_exists<'a, I>(&self, connections: I) -> Option<u32>
    where
        I: IntoIterator<Item = (u32, &'a Connection)>,
    {
        for (handle, connection) in connections {
            if connection.thread_id() == Some(self.thread_id()) {
                trace!(handle, "out-of-band envelope matches connection thread");
                return Some(handle);
            }
            if let Some(their_did) = &connection.their_did {
                if self.service_dids().any(|did| did == their_did.as_str()) {
                    trace!(handle, "out-of-band envelope matches connection counterparty");
                    return Some(handle);
                }
            }
        }
        None
    }

    fn service_dids(&self) -> impl Iterator<Item = &str> {
        self.invitation.services.iter().map(|service| match service {
            OobService::Did(did) => did.as_str(),
            OobService::Inline { recipient_did, .. } => recipient_did.as_str(),
        })
    }

    /// Build a fresh invitee connection from the envelope's first service.
    /// Callers are expected to have checked [`Self::connection_exists`] first.
    pub fn build_connection(&self, source_id: &str, label: &str, pairwise_did: &str) -> EngineResult<Connection> {
        let (recipient_did, service_endpoint) = match self.invitation.services.first() {
            Some(OobService::Inline {
                recipient_did,
                service_endpoint,
            }) => (recipient_did.clone(), service_endpoint.clone()),
            Some(OobService::Did(did)) => (did.clone(), "did-resolvable".to_string()),
            None => {
                return Err(EngineError::InvalidInput(
                    "out-of-band invitation carries no service".to_string(),
                ))
            }
        };
        let invitation = ConnectionInvitation {
            id: self.invitation.id.clone(),
            label: self.invitation.label.clone().unwrap_or_default(),
            recipient_did,
            service_endpoint,
        };
        Ok(Connection::create_invitee(
            source_id,
            label,
            pairwise_did,
            invitation,
        ))
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
    use crate::messages::{CredentialOffer, ProblemReport};
    use std::collections::BTreeMap;

    fn sender_with_service() -> OutOfBandSender {
        let mut sender = OutOfBandSender::create("oob-1");
        sender
            .set_label("Faber")
            .set_goal("issue a licence")
            .set_goal_code("issue-vc")
            .append_handshake_protocol("connections/1.0")
            .append_service("did:peer:faber-1", "in-process");
        sender
    }

    #[test]
    fn sender_accumulates_into_one_envelope() {
        let mut sender = sender_with_service();
        sender
            .append_message(ProtocolMessage::CredentialOffer(CredentialOffer {
                id: "offer-1".to_string(),
                thid: "thread-1".to_string(),
                cred_def_id: "cd-1".to_string(),
                attributes: BTreeMap::new(),
                comment: None,
            }))
            .unwrap();

        let message = sender.to_message();
        let receiver = OutOfBandReceiver::create_from_message("rcv-1", &message).unwrap();
        assert_eq!(receiver.thread_id(), sender.thread_id());
        assert!(matches!(
            receiver.extract_message(),
            Some(ProtocolMessage::CredentialOffer(_))
        ));
    }

    #[test]
    fn nesting_invitations_is_rejected() {
        let mut sender = sender_with_service();
        let nested = OutOfBandSender::create("oob-2").to_message();
        assert!(sender.append_message(nested).is_err());
    }

    #[test]
    fn receiver_rejects_non_invitation_messages() {
        let message = ProtocolMessage::ProblemReport(ProblemReport::new("t", "nope"));
        assert!(OutOfBandReceiver::create_from_message("rcv-1", &message).is_err());
    }

    #[test]
    fn existing_connection_is_found_not_duplicated() {
        let sender = sender_with_service();
        let receiver =
            OutOfBandReceiver::create_from_message("rcv-1", &sender.to_message()).unwrap();

        // a connection whose counterparty is the envelope's service did
        let mut existing = Connection::create_inviter("alice", "Alice", "did:peer:alice-1");
        existing.their_did = Some("did:peer:faber-1".to_string());

        let found = receiver.connection_exists([(41u32, &existing)]);
        assert_eq!(found, Some(41));

        // unrelated connections do not match
        let unrelated = Connection::create_inviter("bob", "Bob", "did:peer:bob-1");
        assert_eq!(receiver.connection_exists([(7u32, &unrelated)]), None);
    }

    #[test]
    fn build_connection_uses_the_envelope_service() {
        let sender = sender_with_service();
        let receiver =
            OutOfBandReceiver::create_from_message("rcv-1", &sender.to_message()).unwrap();

        let connection = receiver
            .build_connection("alice", "Alice", "did:peer:alice-1")
            .unwrap();
        assert_eq!(connection.their_did().unwrap(), "did:peer:faber-1");
        assert_eq!(connection.thread_id(), Some(receiver.thread_id()));
    }

    #[test]
    fn snapshot_roundtrip_both_sides() {
        let sender = sender_with_service();
        let snapshot = sender.to_string().unwrap();
        let restored = OutOfBandSender::from_string(&snapshot).unwrap();
        assert_eq!(restored, sender);

        let receiver =
            OutOfBandReceiver::create_from_message("rcv-1", &sender.to_message()).unwrap();
        let snapshot = receiver.to_string().unwrap();
        let restored = OutOfBandReceiver::from_string(&snapshot).unwrap();
        assert_eq!(restored, receiver);
        assert_eq!(restored.to_string().unwrap(), snapshot);
    }
}
