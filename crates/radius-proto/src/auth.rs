//! Authenticator computation (RFC 2865 Section 3, RFC 2866 Section 3,
//! RFC 5176 Section 3.5)

use crate::packet::{Packet, PacketError};
use rand::Rng;

const ZERO_AUTHENTICATOR: [u8; 16] = [0u8; 16];

/// Generate a random Request Authenticator (16 bytes) per RFC 2865 Section 3
pub fn generate_request_authenticator() -> [u8; 16] {
    let mut authenticator = [0u8; 16];
    rand::rng().fill(&mut authenticator);
    authenticator
}

/// Random packet identifier for a fresh request
pub fn generate_identifier() -> u8 {
    rand::rng().random()
}

fn digest(encoded: &[u8], secret: &[u8]) -> [u8; 16] {
    let mut context = md5::Context::new();
    context.consume(encoded);
    context.consume(secret);
    context.compute().0
}

/// Calculate the Request Authenticator of an Accounting-Request,
/// Disconnect-Request or CoA-Request
///
/// Request Authenticator = MD5(Code + ID + Length + 16 zero octets + Attributes + Secret)
pub fn calculate_request_authenticator(
    packet: &Packet,
    secret: &[u8],
) -> Result<[u8; 16], PacketError> {
    let encoded = packet.encode_with_authenticator(&ZERO_AUTHENTICATOR)?;
    Ok(digest(&encoded, secret))
}

/// Fill in the computed Request Authenticator of `packet`
pub fn sign_request(packet: &mut Packet, secret: &[u8]) -> Result<(), PacketError> {
    packet.authenticator = calculate_request_authenticator(packet, secret)?;
    Ok(())
}

/// Check the computed Request Authenticator of a received request
pub fn verify_request_authenticator(packet: &Packet, secret: &[u8]) -> bool {
    calculate_request_authenticator(packet, secret)
        .is_ok_and(|expected| expected == packet.authenticator)
}

/// Calculate Response Authenticator per RFC 2865 Section 3
///
/// Response Authenticator = MD5(Code + ID + Length + Request Authenticator + Attributes + Secret)
pub fn calculate_response_authenticator(
    packet: &Packet,
    request_authenticator: &[u8; 16],
    secret: &[u8],
) -> Result<[u8; 16], PacketError> {
    let encoded = packet.encode_with_authenticator(request_authenticator)?;
    Ok(digest(&encoded, secret))
}

/// Fill in the Response Authenticator of a reply to `request_authenticator`
pub fn sign_response(
    response: &mut Packet,
    request_authenticator: &[u8; 16],
    secret: &[u8],
) -> Result<(), PacketError> {
    response.authenticator =
        calculate_response_authenticator(response, request_authenticator, secret)?;
    Ok(())
}

/// Verify that a reply was produced by a peer holding `secret`
pub fn verify_response_authenticator(
    response: &Packet,
    request_authenticator: &[u8; 16],
    secret: &[u8],
) -> bool {
    calculate_response_authenticator(response, request_authenticator, secret)
        .is_ok_and(|expected| expected == response.authenticator)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::{Attribute, AttributeType};
    use crate::packet::Code;

    fn disconnect_request() -> Packet {
        Packet::new(Code::DisconnectRequest, 42, [0u8; 16])
            .with_attribute(Attribute::string(AttributeType::UserName, "alice").unwrap())
    }

    #[test]
    fn test_generate_authenticator() {
        let auth1 = generate_request_authenticator();
        let auth2 = generate_request_authenticator();
        assert_ne!(auth1, auth2);
    }

    #[test]
    fn test_request_authenticator_matches_manual_digest() {
        let secret = b"nas-secret";
        let packet = disconnect_request();

        let mut manual = packet.encode().unwrap();
        manual.extend_from_slice(secret);
        let expected = md5::compute(&manual).0;

        assert_eq!(
            calculate_request_authenticator(&packet, secret).unwrap(),
            expected
        );
    }

    #[test]
    fn test_signed_request_verifies_only_with_same_secret() {
        let mut packet = disconnect_request();
        sign_request(&mut packet, b"right").unwrap();

        assert!(verify_request_authenticator(&packet, b"right"));
        assert!(!verify_request_authenticator(&packet, b"wrong"));
    }

    #[test]
    fn test_response_authenticator() {
        let secret = b"sharedsecret";
        let request_auth = [1u8; 16];
        let mut response = Packet::new(Code::DisconnectAck, 42, [0u8; 16]);

        sign_response(&mut response, &request_auth, secret).unwrap();

        assert!(verify_response_authenticator(&response, &request_auth, secret));
        assert!(!verify_response_authenticator(&response, &[2u8; 16], secret));
        assert!(!verify_response_authenticator(&response, &request_auth, b"other"));
    }
}
