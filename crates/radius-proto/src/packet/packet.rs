use super::Code;
use crate::attributes::{Attribute, AttributeType};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PacketError {
    #[error("Invalid packet length: {0}")]
    InvalidLength(usize),
    #[error("Invalid packet code: {0}")]
    InvalidCode(u8),
    #[error("Attribute error: {0}")]
    AttributeError(String),
    #[error("Packet too large: {0} bytes")]
    PacketTooLarge(usize),
}

/// One RADIUS datagram
///
/// Fixed 20-octet header (code, identifier, big-endian length, 16-octet
/// authenticator) followed by attributes. Access, Accounting and RFC 5176
/// Disconnect/CoA messages share the layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub code: Code,
    /// Matches replies to requests
    pub identifier: u8,
    pub authenticator: [u8; 16],
    pub attributes: Vec<Attribute>,
}

impl Packet {
    pub const HEADER_LEN: usize = 20;
    pub const MAX_LEN: usize = 4096;

    pub fn new(code: Code, identifier: u8, authenticator: [u8; 16]) -> Self {
        Packet {
            code,
            identifier,
            authenticator,
            attributes: Vec::new(),
        }
    }

    pub fn add_attribute(&mut self, attribute: Attribute) {
        self.attributes.push(attribute);
    }

    /// Builder-style variant of [`Packet::add_attribute`]
    pub fn with_attribute(mut self, attribute: Attribute) -> Self {
        self.attributes.push(attribute);
        self
    }

    pub fn encode(&self) -> Result<Vec<u8>, PacketError> {
        self.encode_with_authenticator(&self.authenticator)
    }

    /// Encode the packet with a substitute authenticator.
    ///
    /// Used to build the digest input for computed authenticators, where the
    /// authenticator field is zeroed or replaced by the request's.
    pub fn encode_with_authenticator(
        &self,
        authenticator: &[u8; 16],
    ) -> Result<Vec<u8>, PacketError> {
        let len = self.length();
        if len > Self::MAX_LEN {
            return Err(PacketError::PacketTooLarge(len));
        }

        let mut out = Vec::with_capacity(len);
        out.extend_from_slice(&[self.code.as_u8(), self.identifier]);
        out.extend_from_slice(&(len as u16).to_be_bytes());
        out.extend_from_slice(authenticator);
        self.attributes
            .iter()
            .try_for_each(|attr| attr.encode_into(&mut out))?;
        Ok(out)
    }

    pub fn decode(data: &[u8]) -> Result<Self, PacketError> {
        let Some(header) = data.get(..Self::HEADER_LEN) else {
            return Err(PacketError::InvalidLength(data.len()));
        };

        let code = Code::from_u8(header[0]).ok_or(PacketError::InvalidCode(header[0]))?;
        let declared = usize::from(u16::from_be_bytes([header[2], header[3]]));
        if !(Self::HEADER_LEN..=Self::MAX_LEN).contains(&declared) {
            return Err(PacketError::InvalidLength(declared));
        }
        // Octets past the declared length are padding
        let body = data
            .get(Self::HEADER_LEN..declared)
            .ok_or(PacketError::InvalidLength(data.len()))?;

        let mut authenticator = [0u8; 16];
        authenticator.copy_from_slice(&header[4..]);

        let mut attributes = Vec::new();
        let mut rest = body;
        while !rest.is_empty() {
            let attr = Attribute::decode(rest)?;
            rest = &rest[attr.encoded_length()..];
            attributes.push(attr);
        }

        Ok(Packet {
            code,
            identifier: header[1],
            authenticator,
            attributes,
        })
    }

    /// Encoded size in octets
    pub fn length(&self) -> usize {
        Self::HEADER_LEN
            + self
                .attributes
                .iter()
                .map(Attribute::encoded_length)
                .sum::<usize>()
    }

    pub fn find_attribute(&self, attr_type: AttributeType) -> Option<&Attribute> {
        self.attributes
            .iter()
            .find(|a| a.attr_type == attr_type.as_u8())
    }

    /// First attribute of the given type, decoded as UTF-8
    pub fn find_string(&self, attr_type: AttributeType) -> Option<String> {
        self.find_attribute(attr_type)
            .and_then(|attr| attr.as_string().ok())
    }

    /// First attribute of the given type, decoded as a 32-bit integer
    pub fn find_integer(&self, attr_type: AttributeType) -> Option<u32> {
        self.find_attribute(attr_type)
            .and_then(|attr| attr.as_integer().ok())
    }
}
