//! UDP Disconnect-Request client

use super::{CoaError, DisconnectSender, DisconnectTarget};
use crate::config::{CoaConfig, ConfigError};
use async_trait::async_trait;
use chrono::Utc;
use radius_proto::auth::generate_identifier;
use radius_proto::{DisconnectMessage, DisconnectReply, Packet, verify_response_authenticator};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, warn};

/// Sends Disconnect-Requests to the NAS CoA port
///
/// Each request uses its own ephemeral socket, so concurrent requests never
/// compete for identifiers or replies.
#[derive(Debug, Clone)]
pub struct CoaClient {
    bind_ip: IpAddr,
    port: u16,
    timeout: Duration,
    retries: u8,
}

impl CoaClient {
    pub fn new(config: &CoaConfig) -> Result<Self, ConfigError> {
        Ok(CoaClient {
            bind_ip: config.bind_ip()?,
            port: config.port,
            timeout: config.timeout(),
            retries: config.retries,
        })
    }

    fn message(target: &DisconnectTarget) -> DisconnectMessage {
        let mut message = DisconnectMessage::new(&target.username);
        if let Some(session_id) = &target.session_id {
            message = message.with_session_id(session_id);
        }
        // Framed-IP-Address is IPv4 only
        if let Some(IpAddr::V4(framed_ip)) = target.framed_ip {
            message = message.with_framed_ip(framed_ip);
        }
        if let Ok(timestamp) = u32::try_from(Utc::now().timestamp()) {
            message = message.with_event_timestamp(timestamp);
        }
        message
    }

    /// Wait until `deadline` for a verified reply to `request`
    async fn await_reply(
        socket: &UdpSocket,
        request: &Packet,
        secret: &[u8],
        deadline: Instant,
    ) -> Result<Option<DisconnectReply>, CoaError> {
        let mut buf = [0u8; Packet::MAX_LEN];
        loop {
            let len = match timeout_at(deadline, socket.recv(&mut buf)).await {
                Ok(received) => received?,
                Err(_) => return Ok(None),
            };

            let reply = match Packet::decode(&buf[..len]) {
                Ok(packet) => packet,
                Err(e) => {
                    debug!(error = %e, "Discarding malformed CoA reply");
                    continue;
                }
            };
            if reply.identifier != request.identifier {
                debug!(
                    expected = request.identifier,
                    got = reply.identifier,
                    "Discarding CoA reply with foreign identifier"
                );
                continue;
            }
            if !verify_response_authenticator(&reply, &request.authenticator, secret) {
                warn!(
                    identifier = reply.identifier,
                    "Discarding CoA reply with invalid Response Authenticator"
                );
                continue;
            }
            match DisconnectReply::from_packet(&reply) {
                Some(verdict) => return Ok(Some(verdict)),
                None => debug!(code = ?reply.code, "Discarding non-Disconnect reply"),
            }
        }
    }
}

#[async_trait]
impl DisconnectSender for CoaClient {
    async fn disconnect(&self, target: &DisconnectTarget) -> Result<(), CoaError> {
        let nas = SocketAddr::new(target.nas_ip, self.port);
        let socket = UdpSocket::bind(SocketAddr::new(self.bind_ip, 0)).await?;
        socket.connect(nas).await?;

        let secret = target.secret.as_bytes();
        let request = Self::message(target).to_packet(generate_identifier(), secret)?;
        let encoded = request.encode()?;

        let attempts = u32::from(self.retries) + 1;
        for attempt in 1..=attempts {
            socket.send(&encoded).await?;
            debug!(
                username = %target.username,
                nas = %nas,
                identifier = request.identifier,
                attempt,
                "Disconnect-Request sent"
            );

            let deadline = Instant::now() + self.timeout;
            match Self::await_reply(&socket, &request, secret, deadline).await? {
                Some(DisconnectReply::Ack) => return Ok(()),
                Some(nak @ DisconnectReply::Nak { .. }) => {
                    let reason = nak.reason().unwrap_or_default();
                    return Err(CoaError::Nak(reason));
                }
                None => {
                    debug!(username = %target.username, nas = %nas, attempt, "Disconnect-Request timed out")
                }
            }
        }

        Err(CoaError::Timeout {
            nas: target.nas_ip,
            attempts,
        })
    }
}
