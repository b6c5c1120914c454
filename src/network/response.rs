//! Relay responses.
//!
//! Plaintext layout: `padding || (fromUser || packet)* || numMessages(u16be) || code`.
//! The fixed fields sit at the end so the receiver never needs the padding
//! length. Every failure here is reported as a [`ResponseCode`].

use super::keystream::encrypt_payload;
use super::packet::NetworkPacket;
use super::{
    GroupKeys, ResponseCode, NETWORK_MAC_SIZE, NONCE_SIZE, NUM_MESSAGES_SIZE, RESPONSE_CODE_SIZE,
    RESPONSE_MIN_SIZE, RESPONSE_PADDING_MAX, RESPONSE_PADDING_MIN,
};
use crate::error::{JerichoError, Result};
use crate::pad::{MessagePacket, MESSAGE_PACKET_SIZE};
use crate::primitives::{constant_time_compare, skein512, Digest512};
use crate::user::Callsign;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;

/// Size of one `fromUser || packet` record
pub const USER_MESSAGE_SIZE: usize = 1 + MESSAGE_PACKET_SIZE;

/// A message packet queued on the relay, tagged with its sender
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserMessage {
    pub from_user: Callsign,
    pub packet: MessagePacket,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponsePayload {
    pub code: ResponseCode,
    pub messages: Vec<UserMessage>,
}

impl ResponsePayload {
    pub fn code(code: ResponseCode) -> Self {
        Self {
            code,
            messages: Vec::new(),
        }
    }
}

fn response_error(code: ResponseCode) -> JerichoError {
    tracing::warn!(code = code.as_u8(), "{}", code.status_message());
    JerichoError::Response(code)
}

/// Serialize a response. Padding must lie within the response bounds.
pub fn serialize_response(payload: &ResponsePayload, padding: &[u8]) -> Result<Vec<u8>> {
    if !(RESPONSE_PADDING_MIN..=RESPONSE_PADDING_MAX).contains(&padding.len()) {
        return Err(JerichoError::InvalidPacket(format!(
            "response padding of {} bytes is outside {}..={}",
            padding.len(),
            RESPONSE_PADDING_MIN,
            RESPONSE_PADDING_MAX
        )));
    }
    let count = u16::try_from(payload.messages.len())
        .map_err(|_| JerichoError::InvalidPacket("too many messages for one response".into()))?;

    let records = payload.messages.len() * USER_MESSAGE_SIZE;
    let mut out =
        Vec::with_capacity(padding.len() + records + NUM_MESSAGES_SIZE + RESPONSE_CODE_SIZE);
    out.extend_from_slice(padding);
    for message in &payload.messages {
        out.push(message.from_user.letter());
        out.extend_from_slice(message.packet.as_bytes());
    }
    out.extend_from_slice(&count.to_be_bytes());
    out.push(payload.code.as_u8());
    Ok(out)
}

/// `Skein512(macKey || requestMac || responseNonce || responseCiphertext)`
pub fn authenticate_response(
    keys: &GroupKeys,
    request_mac: &[u8],
    nonce: &[u8],
    ciphertext: &[u8],
) -> Digest512 {
    skein512(&[keys.mac_key(), request_mac, nonce, ciphertext])
}

/// Decode and authenticate a raw response body against the request it
/// answers. A response bound to any other request fails with
/// [`ResponseCode::InvalidMac`].
pub fn verify_response(
    keys: &GroupKeys,
    raw: &str,
    request_mac: &Digest512,
) -> Result<NetworkPacket> {
    let bytes = STANDARD
        .decode(raw.trim())
        .map_err(|_| response_error(ResponseCode::DecodingOrValidationFailed))?;

    if bytes.len() < NETWORK_MAC_SIZE {
        return Err(response_error(ResponseCode::MacNotParsable));
    }
    if bytes.len() < RESPONSE_MIN_SIZE {
        return Err(response_error(ResponseCode::ResponseBelowMinLength));
    }

    let packet = NetworkPacket::from_bytes(&bytes)
        .map_err(|_| response_error(ResponseCode::ResponseParseFailed))?;
    let expected = authenticate_response(keys, request_mac, &packet.nonce, &packet.ciphertext);
    if !constant_time_compare(&expected, &packet.mac) {
        return Err(response_error(ResponseCode::InvalidMac));
    }
    Ok(packet)
}

pub fn decrypt_response(keys: &GroupKeys, packet: &NetworkPacket) -> Result<Vec<u8>> {
    encrypt_payload(keys.encryption_key(), &packet.nonce, &packet.ciphertext)
}

/// Parse decrypted response fields from the end backwards.
///
/// A non-success code is returned on its own; only a plain success carries
/// messages.
pub fn deserialize_response(data: &[u8]) -> Result<ResponsePayload> {
    let fixed = NUM_MESSAGES_SIZE + RESPONSE_CODE_SIZE;
    if data.len() < fixed {
        return Err(response_error(ResponseCode::ResponseParseFailed));
    }

    let code = ResponseCode::from_server_byte(data[data.len() - 1]);
    if code != ResponseCode::Success {
        return Ok(ResponsePayload::code(code));
    }

    let count_at = data.len() - fixed;
    let count = u16::from_be_bytes([data[count_at], data[count_at + 1]]) as usize;
    let records_len = count * USER_MESSAGE_SIZE;
    if records_len > count_at {
        return Err(response_error(ResponseCode::ResponseParseFailed));
    }

    let mut messages = Vec::with_capacity(count);
    for record in data[count_at - records_len..count_at].chunks_exact(USER_MESSAGE_SIZE) {
        let from_user = Callsign::from_letter(record[0])
            .ok_or_else(|| response_error(ResponseCode::InvalidFromUser))?;
        let packet = MessagePacket::from_slice(&record[1..])?;
        messages.push(UserMessage { from_user, packet });
    }

    Ok(ResponsePayload { code, messages })
}

/// Verify, decrypt and parse a raw response body
pub fn open_response(
    keys: &GroupKeys,
    raw: &str,
    request_mac: &Digest512,
) -> Result<ResponsePayload> {
    let packet = verify_response(keys, raw, request_mac)?;
    let plaintext = decrypt_response(keys, &packet)?;
    let payload = deserialize_response(&plaintext)?;
    tracing::debug!(
        code = payload.code.as_u8(),
        messages = payload.messages.len(),
        "verified response"
    );
    Ok(payload)
}

/// Relay side: encrypt and authenticate a response bound to `request_mac`
pub fn seal_response_with(
    keys: &GroupKeys,
    request_mac: &Digest512,
    payload: &ResponsePayload,
    padding: &[u8],
    nonce: [u8; NONCE_SIZE],
) -> Result<String> {
    let plaintext = serialize_response(payload, padding)?;
    let ciphertext = encrypt_payload(keys.encryption_key(), &nonce, &plaintext)?;
    let mac = authenticate_response(keys, request_mac, &nonce, &ciphertext);
    Ok(NetworkPacket { nonce, ciphertext, mac }.to_base64())
}
