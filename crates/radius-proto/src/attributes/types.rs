/// Attributes allowed in RFC 5176 Disconnect messages
///
/// Session identification attributes (RFC 5176 §3) plus the few reply
/// attributes a NAS may echo back in an ACK or NAK.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum AttributeType {
    UserName = 1,
    NasIpAddress = 4,
    FramedIpAddress = 8,
    ReplyMessage = 18,
    State = 24,
    Class = 25,
    CalledStationId = 30,
    CallingStationId = 31,
    NasIdentifier = 32,
    ProxyState = 33,
    AcctSessionId = 44,
    /// Seconds since the Unix epoch; replay protection for dynamic authorization
    EventTimestamp = 55,
    MessageAuthenticator = 80,
    NasIpv6Address = 95,
    /// Reason code carried by a Disconnect-NAK
    ErrorCause = 101,
}

const KNOWN: &[AttributeType] = &[
    AttributeType::UserName,
    AttributeType::NasIpAddress,
    AttributeType::FramedIpAddress,
    AttributeType::ReplyMessage,
    AttributeType::State,
    AttributeType::Class,
    AttributeType::CalledStationId,
    AttributeType::CallingStationId,
    AttributeType::NasIdentifier,
    AttributeType::ProxyState,
    AttributeType::AcctSessionId,
    AttributeType::EventTimestamp,
    AttributeType::MessageAuthenticator,
    AttributeType::NasIpv6Address,
    AttributeType::ErrorCause,
];

impl AttributeType {
    pub fn from_u8(value: u8) -> Option<Self> {
        KNOWN.iter().copied().find(|t| t.as_u8() == value)
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}
