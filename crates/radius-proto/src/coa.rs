//! Dynamic Authorization Extensions (RFC 5176)
//!
//! A Dynamic Authorization Client (the billing side) sends Disconnect-Request
//! packets to the Dynamic Authorization Server listening on the NAS, which
//! answers with Disconnect-ACK or Disconnect-NAK.
//!
//! # Example
//!
//! ```rust
//! use radius_proto::coa::{DisconnectMessage, DisconnectReply};
//! use radius_proto::{Code, Packet};
//! use radius_proto::auth::sign_response;
//!
//! let message = DisconnectMessage::new("alice").with_session_id("81200004");
//! let request = message.to_packet(7, b"nas-secret").unwrap();
//! assert_eq!(request.code, Code::DisconnectRequest);
//!
//! let mut ack = Packet::new(Code::DisconnectAck, 7, [0u8; 16]);
//! sign_response(&mut ack, &request.authenticator, b"nas-secret").unwrap();
//! assert_eq!(DisconnectReply::from_packet(&ack), Some(DisconnectReply::Ack));
//! ```

use crate::attributes::{Attribute, AttributeType};
use crate::auth::sign_request;
use crate::packet::{Code, Packet, PacketError};
use std::fmt;
use std::net::Ipv4Addr;

/// Default UDP port of a Dynamic Authorization Server (RFC 5176 Section 3)
pub const DEFAULT_COA_PORT: u16 = 3799;

/// Error-Cause values (RFC 5176 Section 3.6)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorCause {
    ResidualSessionContextRemoved = 201,
    InvalidEapPacket = 202,
    UnsupportedAttribute = 401,
    MissingAttribute = 402,
    NasIdentificationMismatch = 403,
    InvalidRequest = 404,
    UnsupportedService = 405,
    UnsupportedExtension = 406,
    InvalidAttributeValue = 407,
    AdministrativelyProhibited = 501,
    RequestNotRoutable = 502,
    SessionContextNotFound = 503,
    SessionContextNotRemovable = 504,
    OtherProxyProcessingError = 505,
    ResourcesUnavailable = 506,
    RequestInitiated = 507,
    MultipleSessionSelectionUnsupported = 508,
}

impl ErrorCause {
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            201 => Some(ErrorCause::ResidualSessionContextRemoved),
            202 => Some(ErrorCause::InvalidEapPacket),
            401 => Some(ErrorCause::UnsupportedAttribute),
            402 => Some(ErrorCause::MissingAttribute),
            403 => Some(ErrorCause::NasIdentificationMismatch),
            404 => Some(ErrorCause::InvalidRequest),
            405 => Some(ErrorCause::UnsupportedService),
            406 => Some(ErrorCause::UnsupportedExtension),
            407 => Some(ErrorCause::InvalidAttributeValue),
            501 => Some(ErrorCause::AdministrativelyProhibited),
            502 => Some(ErrorCause::RequestNotRoutable),
            503 => Some(ErrorCause::SessionContextNotFound),
            504 => Some(ErrorCause::SessionContextNotRemovable),
            505 => Some(ErrorCause::OtherProxyProcessingError),
            506 => Some(ErrorCause::ResourcesUnavailable),
            507 => Some(ErrorCause::RequestInitiated),
            508 => Some(ErrorCause::MultipleSessionSelectionUnsupported),
            _ => None,
        }
    }

    pub fn as_u32(self) -> u32 {
        self as u32
    }

    pub fn description(self) -> &'static str {
        match self {
            ErrorCause::ResidualSessionContextRemoved => "Residual Session Context Removed",
            ErrorCause::InvalidEapPacket => "Invalid EAP Packet (Ignored)",
            ErrorCause::UnsupportedAttribute => "Unsupported Attribute",
            ErrorCause::MissingAttribute => "Missing Attribute",
            ErrorCause::NasIdentificationMismatch => "NAS Identification Mismatch",
            ErrorCause::InvalidRequest => "Invalid Request",
            ErrorCause::UnsupportedService => "Unsupported Service",
            ErrorCause::UnsupportedExtension => "Unsupported Extension",
            ErrorCause::InvalidAttributeValue => "Invalid Attribute Value",
            ErrorCause::AdministrativelyProhibited => "Administratively Prohibited",
            ErrorCause::RequestNotRoutable => "Request Not Routable (Proxy)",
            ErrorCause::SessionContextNotFound => "Session Context Not Found",
            ErrorCause::SessionContextNotRemovable => "Session Context Not Removable",
            ErrorCause::OtherProxyProcessingError => "Other Proxy Processing Error",
            ErrorCause::ResourcesUnavailable => "Resources Unavailable",
            ErrorCause::RequestInitiated => "Request Initiated",
            ErrorCause::MultipleSessionSelectionUnsupported => {
                "Multiple Session Selection Unsupported"
            }
        }
    }
}

impl fmt::Display for ErrorCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.description(), self.as_u32())
    }
}

/// Session identification carried by a Disconnect-Request
///
/// `User-Name` alone is ambiguous when a user holds concurrent sessions, so
/// `Acct-Session-Id` and `Framed-IP-Address` are included whenever known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisconnectMessage {
    pub user_name: String,
    pub acct_session_id: Option<String>,
    pub framed_ip: Option<Ipv4Addr>,
    /// Seconds since the Unix epoch; lets the NAS reject replayed requests
    pub event_timestamp: Option<u32>,
}

impl DisconnectMessage {
    pub fn new(user_name: impl Into<String>) -> Self {
        DisconnectMessage {
            user_name: user_name.into(),
            acct_session_id: None,
            framed_ip: None,
            event_timestamp: None,
        }
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.acct_session_id = Some(session_id.into());
        self
    }

    pub fn with_framed_ip(mut self, framed_ip: Ipv4Addr) -> Self {
        self.framed_ip = Some(framed_ip);
        self
    }

    pub fn with_event_timestamp(mut self, timestamp: u32) -> Self {
        self.event_timestamp = Some(timestamp);
        self
    }

    /// Build a signed Disconnect-Request
    pub fn to_packet(&self, identifier: u8, secret: &[u8]) -> Result<Packet, PacketError> {
        let mut packet = Packet::new(Code::DisconnectRequest, identifier, [0u8; 16]);
        packet.add_attribute(Attribute::string(AttributeType::UserName, &self.user_name)?);
        if let Some(session_id) = &self.acct_session_id {
            packet.add_attribute(Attribute::string(AttributeType::AcctSessionId, session_id)?);
        }
        if let Some(framed_ip) = self.framed_ip {
            packet.add_attribute(Attribute::ipv4_addr(AttributeType::FramedIpAddress, framed_ip)?);
        }
        if let Some(timestamp) = self.event_timestamp {
            packet.add_attribute(Attribute::integer(AttributeType::EventTimestamp, timestamp)?);
        }
        sign_request(&mut packet, secret)?;
        Ok(packet)
    }

    /// Recover the session identification from a received Disconnect-Request
    pub fn from_packet(packet: &Packet) -> Option<Self> {
        if packet.code != Code::DisconnectRequest {
            return None;
        }
        Some(DisconnectMessage {
            user_name: packet.find_string(AttributeType::UserName)?,
            acct_session_id: packet.find_string(AttributeType::AcctSessionId),
            framed_ip: packet
                .find_attribute(AttributeType::FramedIpAddress)
                .and_then(|attr| attr.as_ipv4().ok()),
            event_timestamp: packet.find_integer(AttributeType::EventTimestamp),
        })
    }
}

/// Outcome reported by the NAS for a Disconnect-Request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReply {
    Ack,
    /// `error_cause` holds the raw Error-Cause value when the NAS sent one
    Nak { error_cause: Option<u32> },
}

impl DisconnectReply {
    /// Classify a reply packet; `None` if it is not a Disconnect reply
    pub fn from_packet(packet: &Packet) -> Option<Self> {
        match packet.code {
            Code::DisconnectAck => Some(DisconnectReply::Ack),
            Code::DisconnectNak => Some(DisconnectReply::Nak {
                error_cause: packet.find_integer(AttributeType::ErrorCause),
            }),
            _ => None,
        }
    }

    /// Human-readable reason for a NAK
    pub fn reason(&self) -> Option<String> {
        match self {
            DisconnectReply::Ack => None,
            DisconnectReply::Nak { error_cause: None } => {
                Some("NAS rejected the request without an Error-Cause".to_string())
            }
            DisconnectReply::Nak {
                error_cause: Some(value),
            } => Some(match ErrorCause::from_u32(*value) {
                Some(cause) => cause.to_string(),
                None => format!("Unknown Error-Cause ({})", value),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::verify_request_authenticator;

    #[test]
    fn test_disconnect_packet_attributes() {
        let message = DisconnectMessage::new("pelanggan-01")
            .with_session_id("81a0000f")
            .with_framed_ip(Ipv4Addr::new(10, 10, 0, 2))
            .with_event_timestamp(1_700_000_000);

        let packet = message.to_packet(9, b"mikrotik").unwrap();

        assert_eq!(packet.code, Code::DisconnectRequest);
        assert_eq!(packet.identifier, 9);
        assert_eq!(packet.attributes.len(), 4);
        assert!(verify_request_authenticator(&packet, b"mikrotik"));
        assert_eq!(DisconnectMessage::from_packet(&packet), Some(message));
    }

    #[test]
    fn test_username_only_request() {
        let packet = DisconnectMessage::new("VC123")
            .to_packet(1, b"s")
            .unwrap();
        assert_eq!(packet.attributes.len(), 1);
        assert_eq!(
            packet.find_string(AttributeType::UserName).as_deref(),
            Some("VC123")
        );
    }

    #[test]
    fn test_nak_reason() {
        let nak = Packet::new(Code::DisconnectNak, 1, [0u8; 16]).with_attribute(
            Attribute::integer(AttributeType::ErrorCause, 503).unwrap(),
        );
        let reply = DisconnectReply::from_packet(&nak).unwrap();
        assert_eq!(reply, DisconnectReply::Nak { error_cause: Some(503) });
        assert_eq!(
            reply.reason().as_deref(),
            Some("Session Context Not Found (503)")
        );

        let unknown = DisconnectReply::Nak { error_cause: Some(999) };
        assert_eq!(unknown.reason().as_deref(), Some("Unknown Error-Cause (999)"));
    }

    #[test]
    fn test_non_disconnect_reply_is_unclassified() {
        let accept = Packet::new(Code::AccessAccept, 1, [0u8; 16]);
        assert_eq!(DisconnectReply::from_packet(&accept), None);
        assert_eq!(DisconnectMessage::from_packet(&accept), None);
    }
}
