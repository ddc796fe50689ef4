use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

fn message_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Protocol messages exchanged over pairwise connections, tagged by type the
/// way agent-to-agent messages are on the wire. The thread id (`thid`) links
/// messages belonging to one logical exchange; envelope-opening messages use
/// their own id as the thread id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "@type")]
pub enum ProtocolMessage {
    #[serde(rename = "connections/1.0/invitation")]
    ConnectionInvitation(ConnectionInvitation),
    #[serde(rename = "connections/1.0/request")]
    ConnectionRequest(ConnectionRequest),
    #[serde(rename = "connections/1.0/response")]
    ConnectionResponse(ConnectionResponse),
    #[serde(rename = "notification/1.0/ack")]
    Ack(Ack),
    #[serde(rename = "issue-credential/1.0/offer-credential")]
    CredentialOffer(CredentialOffer),
    #[serde(rename = "issue-credential/1.0/request-credential")]
    CredentialRequest(CredentialRequest),
    #[serde(rename = "issue-credential/1.0/issue-credential")]
    CredentialIssue(CredentialIssue),
    #[serde(rename = "present-proof/1.0/request-presentation")]
    PresentationRequest(PresentationRequest),
    #[serde(rename = "present-proof/1.0/presentation")]
    Presentation(Presentation),
    #[serde(rename = "report-problem/1.0/problem-report")]
    ProblemReport(ProblemReport),
    #[serde(rename = "out-of-band/1.1/invitation")]
    OutOfBandInvitation(OutOfBandInvitation),
}

impl ProtocolMessage {
    pub fn thread_id(&self) -> &str {
        match self {
            ProtocolMessage::ConnectionInvitation(msg) => &msg.id,
            ProtocolMessage::ConnectionRequest(msg) => &msg.thid,
            ProtocolMessage::ConnectionResponse(msg) => &msg.thid,
            ProtocolMessage::Ack(msg) => &msg.thid,
            ProtocolMessage::CredentialOffer(msg) => &msg.thid,
            ProtocolMessage::CredentialRequest(msg) => &msg.thid,
            ProtocolMessage::CredentialIssue(msg) => &msg.thid,
            ProtocolMessage::PresentationRequest(msg) => &msg.thid,
            ProtocolMessage::Presentation(msg) => &msg.thid,
            ProtocolMessage::ProblemReport(msg) => &msg.thid,
            ProtocolMessage::OutOfBandInvitation(msg) => &msg.id,
        }
    }

    pub fn from_json(json: &str) -> EngineResult<Self> {
        serde_json::from_str(json)
            .map_err(|err| EngineError::InvalidInput(format!("cannot parse message: {err}")))
    }

    pub fn to_json(&self) -> EngineResult<String> {
        serde_json::to_string(self)
            .map_err(|err| EngineError::Internal(format!("cannot serialize message: {err}")))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionInvitation {
    #[serde(rename = "@id")]
    pub id: String,
    pub label: String,
    pub recipient_did: String,
    pub service_endpoint: String,
}

impl ConnectionInvitation {
    pub fn new(label: &str, recipient_did: &str, service_endpoint: &str) -> Self {
        ConnectionInvitation {
            id: message_id(),
            label: label.to_string(),
            recipient_did: recipient_did.to_string(),
            service_endpoint: service_endpoint.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionRequest {
    #[serde(rename = "@id")]
    pub id: String,
    pub thid: String,
    pub label: String,
    /// Pairwise DID the requester will use on this connection.
    pub did: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionResponse {
    #[serde(rename = "@id")]
    pub id: String,
    pub thid: String,
    /// Pairwise DID the responder will use on this connection.
    pub did: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ack {
    #[serde(rename = "@id")]
    pub id: String,
    pub thid: String,
}

impl Ack {
    pub fn new(thid: &str) -> Self {
        Ack {
            id: message_id(),
            thid: thid.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialOffer {
    #[serde(rename = "@id")]
    pub id: String,
    pub thid: String,
    pub cred_def_id: String,
    pub attributes: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialRequest {
    #[serde(rename = "@id")]
    pub id: String,
    pub thid: String,
    pub cred_def_id: String,
    pub prover_did: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialIssue {
    #[serde(rename = "@id")]
    pub id: String,
    pub thid: String,
    pub cred_def_id: String,
    pub values: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rev_reg_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cred_rev_idx: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresentationRequest {
    #[serde(rename = "@id")]
    pub id: String,
    pub thid: String,
    pub name: String,
    pub requested_attributes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Presentation {
    #[serde(rename = "@id")]
    pub id: String,
    pub thid: String,
    pub cred_def_id: String,
    pub revealed_attrs: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rev_reg_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cred_rev_idx: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProblemReport {
    #[serde(rename = "@id")]
    pub id: String,
    pub thid: String,
    pub explain: String,
}

impl ProblemReport {
    pub fn new(thid: &str, explain: &str) -> Self {
        ProblemReport {
            id: message_id(),
            thid: thid.to_string(),
            explain: explain.to_string(),
        }
    }
}

/// A service the out-of-band sender can be reached through: either a resolvable
/// DID or an inline endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OobService {
    Did(String),
    Inline {
        recipient_did: String,
        service_endpoint: String,
    },
}

/// Self-contained envelope used to bootstrap or resume a connection without a
/// prior channel. Not a long-running state machine: the sender accumulates
/// attachments and services before serialization, the receiver parses one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutOfBandInvitation {
    #[serde(rename = "@id")]
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub goal: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub goal_code: Option<String>,
    #[serde(default)]
    pub handshake_protocols: Vec<String>,
    #[serde(default)]
    pub services: Vec<OobService>,
    /// Attached request messages, e.g. a credential offer delivered with the
    /// invitation itself.
    #[serde(default)]
    pub requests: Vec<ProtocolMessage>,
}

impl OutOfBandInvitation {
    pub fn new() -> Self {
        OutOfBandInvitation {
            id: message_id(),
            label: None,
            goal: None,
            goal_code: None,
            handshake_protocols: Vec::new(),
            services: Vec::new(),
            requests: Vec::new(),
        }
    }
}

impl Default for OutOfBandInvitation {
    fn default() -> Self {
        OutOfBandInvitation::new()
    }
}

pub(crate) fn new_message_id() -> String {
    message_id()
}
