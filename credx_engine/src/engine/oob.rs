use serde::Deserialize;

use crate::engine::CredxEngine;
use crate::error::EngineResult;
use crate::messages::ProtocolMessage;
use crate::protocols::oob::{OutOfBandReceiver, OutOfBandSender};

#[derive(Deserialize)]
struct OobConfig {
    label: Option<String>,
    goal: Option<String>,
    goal_code: Option<String>,
    #[serde(default)]
    handshake_protocols: Vec<String>,
}

/// Out-of-band operations: sender accumulation and receiver
/// extraction/dedup.
impl CredxEngine {
    pub fn oob_sender_create(&self, source_id: &str, config_json: &str) -> EngineResult<u32> {
        self.check_open()?;
        let config: OobConfig = serde_json::from_str(config_json)?;
        let mut sender = OutOfBandSender::create(source_id);
        if let Some(label) = &config.label {
            sender.set_label(label);
        }
        if let Some(goal) = &config.goal {
            sender.set_goal(goal);
        }
        if let Some(goal_code) = &config.goal_code {
            sender.set_goal_code(goal_code);
        }
        for protocol in &config.handshake_protocols {
            sender.append_handshake_protocol(protocol);
        }
        self.oob_senders.add(sender)
    }

    pub async fn oob_sender_append_message(
        &self,
        handle: u32,
        message_json: &str,
    ) -> EngineResult<()> {
        self.check_open()?;
        let message = ProtocolMessage::from_json(message_json)?;
        let entry = self.oob_senders.entry(handle)?;
        let mut sender = entry.lock().await;
        sender.append_message(message)?;
        Ok(())
    }

    pub async fn oob_sender_append_service(
        &self,
        handle: u32,
        recipient_did: &str,
        service_endpoint: &str,
    ) -> EngineResult<()> {
        self.check_open()?;
        let entry = self.oob_senders.entry(handle)?;
        let mut sender = entry.lock().await;
        sender.append_service(recipient_did, service_endpoint);
        Ok(())
    }

    pub async fn oob_sender_append_service_did(&self, handle: u32, did: &str) -> EngineResult<()> {
        self.check_open()?;
        let entry = self.oob_senders.entry(handle)?;
        let mut sender = entry.lock().await;
        sender.append_service_did(did);
        Ok(())
    }

    /// The finished envelope as a message, ready to deliver out of band.
    pub async fn oob_sender_to_message(&self, handle: u32) -> EngineResult<String> {
        self.check_open()?;
        let entry = self.oob_senders.entry(handle)?;
        let sender = entry.lock().await;
        sender.to_message().to_json()
    }

    pub async fn oob_sender_thread_id(&self, handle: u32) -> EngineResult<String> {
        self.check_open()?;
        let entry = self.oob_senders.entry(handle)?;
        let sender = entry.lock().await;
        Ok(sender.thread_id().to_string())
    }

    pub async fn oob_sender_serialize(&self, handle: u32) -> EngineResult<String> {
        self.check_open()?;
        let entry = self.oob_senders.entry(handle)?;
        let sender = entry.lock().await;
        sender.to_string()
    }

    pub fn oob_sender_deserialize(&self, snapshot: &str) -> EngineResult<u32> {
        self.check_open()?;
        self.oob_senders.add(OutOfBandSender::from_string(snapshot)?)
    }

    pub fn oob_sender_release(&self, handle: u32) -> EngineResult<()> {
        self.oob_senders.release(handle)
    }

    // ---- receiver ----

    pub fn oob_receiver_create(&self, source_id: &str, message_json: &str) -> EngineResult<u32> {
        self.check_open()?;
        let message = ProtocolMessage::from_json(message_json)?;
        let receiver = OutOfBandReceiver::create_from_message(source_id, &message)?;
        self.oob_receivers.add(receiver)
    }

    pub async fn oob_receiver_extract_message(&self, handle: u32) -> EngineResult<Option<String>> {
        self.check_open()?;
        let entry = self.oob_receivers.entry(handle)?;
        let receiver = entry.lock().await;
        match receiver.extract_message() {
            Some(message) => Ok(Some(message.to_json()?)),
            None => Ok(None),
        }
    }

    pub async fn oob_receiver_thread_id(&self, handle: u32) -> EngineResult<String> {
        self.check_open()?;
        let entry = self.oob_receivers.entry(handle)?;
        let receiver = entry.lock().await;
        Ok(receiver.thread_id().to_string())
    }

    /// Does the envelope reference one of the given connections? Returns
    /// `(handle, true)` for the first match, `(0, false)` otherwise. Checked
    /// before `oob_receiver_build_connection` so repeated invitations do not
    /// breed duplicate connections.
    pub async fn oob_receiver_connection_exists(
        &self,
        handle: u32,
        connection_handles: &[u32],
    ) -> EngineResult<(u32, bool)> {
        self.check_open()?;
        let mut connections = Vec::with_capacity(connection_handles.len());
        for &connection_handle in connection_handles {
            let connection = self.connections.get_cloned(connection_handle).await?;
            connections.push((connection_handle, connection));
        }

        let entry = self.oob_receivers.entry(handle)?;
        let receiver = entry.lock().await;
        match receiver.connection_exists(
            connections
                .iter()
                .map(|(connection_handle, connection)| (*connection_handle, connection)),
        ) {
            Some(found) => Ok((found, true)),
            None => Ok((0, false)),
        }
    }

    /// Build a fresh invitee connection from the envelope.
    pub async fn oob_receiver_build_connection(
        &self,
        handle: u32,
        source_id: &str,
        label: &str,
    ) -> EngineResult<u32> {
        self.check_open()?;
        let entry = self.oob_receivers.entry(handle)?;
        let receiver = entry.lock().await;
        let connection =
            receiver.build_connection(source_id, label, &Self::new_pairwise_did())?;
        drop(receiver);
        self.connections.add(connection)
    }

    pub async fn oob_receiver_serialize(&self, handle: u32) -> EngineResult<String> {
        self.check_open()?;
        let entry = self.oob_receivers.entry(handle)?;
        let receiver = entry.lock().await;
        receiver.to_string()
    }

    pub fn oob_receiver_deserialize(&self, snapshot: &str) -> EngineResult<u32> {
        self.check_open()?;
        self.oob_receivers
            .add(OutOfBandReceiver::from_string(snapshot)?)
    }

    pub fn oob_receiver_release(&self, handle: u32) -> EngineResult<()> {
        self.oob_receivers.release(handle)
    }
}
