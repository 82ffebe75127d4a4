//! RADIUS Protocol Implementation
//!
//! Packet and attribute codec for RFC 2865/2866 plus the RFC 5176 Dynamic
//! Authorization messages used to disconnect live sessions.
//!
//! # Features
//!
//! - Packet encoding and decoding
//! - Request/Response Authenticator calculation and verification
//! - Disconnect-Request construction and Disconnect-ACK/NAK classification
//!
//! # Example
//!
//! ```rust
//! use radius_proto::{Attribute, AttributeType, Code, Packet};
//! use radius_proto::auth::sign_request;
//!
//! let mut packet = Packet::new(Code::DisconnectRequest, 1, [0u8; 16]);
//! packet.add_attribute(Attribute::string(AttributeType::UserName, "alice").unwrap());
//! sign_request(&mut packet, b"secret").unwrap();
//!
//! let bytes = packet.encode().unwrap();
//! assert_eq!(Packet::decode(&bytes).unwrap(), packet);
//! ```

pub mod attributes;
pub mod auth;
pub mod coa;
pub mod packet;

pub use attributes::{Attribute, AttributeType};
pub use auth::{
    calculate_request_authenticator, calculate_response_authenticator,
    generate_request_authenticator, sign_request, sign_response, verify_request_authenticator,
    verify_response_authenticator,
};
pub use coa::{DEFAULT_COA_PORT, DisconnectMessage, DisconnectReply, ErrorCause};
pub use packet::{Code, Packet, PacketError};
