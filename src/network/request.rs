//! Client requests to the relay.

use super::keystream::encrypt_payload;
use super::packet::NetworkPacket;
use super::{
    ApiAction, GroupKeys, ACTION_SIZE, FROM_USER_SIZE, MAX_MESSAGES_PER_REQUEST, NONCE_SIZE,
    PADDING_LENGTH_SIZE, REQUEST_PADDING_MAX, REQUEST_PADDING_MIN, TIMESTAMP_SIZE,
};
use crate::error::{JerichoError, Result};
use crate::pad::{MessagePacket, MESSAGE_PACKET_SIZE};
use crate::primitives::{skein512, Digest512};
use crate::rng::{random_int_in_range, random_vec};
use crate::user::Callsign;
use rand::{CryptoRng, RngCore};

/// Fixed fields around the padding and packets
const REQUEST_FIXED_SIZE: usize =
    PADDING_LENGTH_SIZE + TIMESTAMP_SIZE + FROM_USER_SIZE + ACTION_SIZE;

/// Timestamps are carried in 40 bits
const MAX_TIMESTAMP: u64 = (1 << 40) - 1;

/// Logical content of a request, before padding and encryption
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestPayload {
    pub from_user: Callsign,
    pub action: ApiAction,
    pub timestamp: u64,
    pub packets: Vec<MessagePacket>,
}

impl RequestPayload {
    pub fn send(from_user: Callsign, packets: Vec<MessagePacket>, timestamp: u64) -> Self {
        Self {
            from_user,
            action: ApiAction::Send,
            timestamp,
            packets,
        }
    }

    pub fn receive(from_user: Callsign, timestamp: u64) -> Self {
        Self {
            from_user,
            action: ApiAction::Receive,
            timestamp,
            packets: Vec::new(),
        }
    }

    pub fn test(from_user: Callsign, timestamp: u64) -> Self {
        Self {
            from_user,
            action: ApiAction::Test,
            timestamp,
            packets: Vec::new(),
        }
    }
}

/// `paddingLength(u16be) || padding || packets || timestamp(40-bit be) || fromUser || action`
pub fn serialize_request(payload: &RequestPayload, padding: &[u8]) -> Result<Vec<u8>> {
    if payload.packets.len() > MAX_MESSAGES_PER_REQUEST {
        return Err(JerichoError::InvalidPacket(format!(
            "{} message packets exceed the limit of {}",
            payload.packets.len(),
            MAX_MESSAGES_PER_REQUEST
        )));
    }
    if !(REQUEST_PADDING_MIN..=REQUEST_PADDING_MAX).contains(&padding.len()) {
        return Err(JerichoError::InvalidPacket(format!(
            "request padding of {} bytes is outside {}..={}",
            padding.len(),
            REQUEST_PADDING_MIN,
            REQUEST_PADDING_MAX
        )));
    }
    if payload.timestamp > MAX_TIMESTAMP {
        return Err(JerichoError::InvalidPacket(format!(
            "timestamp {} does not fit in {} bytes",
            payload.timestamp, TIMESTAMP_SIZE
        )));
    }

    let packets_len = payload.packets.len() * MESSAGE_PACKET_SIZE;
    let mut out = Vec::with_capacity(REQUEST_FIXED_SIZE + padding.len() + packets_len);
    out.extend_from_slice(&(padding.len() as u16).to_be_bytes());
    out.extend_from_slice(padding);
    for packet in &payload.packets {
        out.extend_from_slice(packet.as_bytes());
    }
    out.extend_from_slice(&payload.timestamp.to_be_bytes()[8 - TIMESTAMP_SIZE..]);
    out.push(payload.from_user.letter());
    out.push(payload.action.as_byte());
    Ok(out)
}

/// Parse a decrypted request. The padding length field is trusted only
/// after checking it against the bounds and the buffer size.
pub fn deserialize_request(data: &[u8]) -> Result<RequestPayload> {
    if data.len() < REQUEST_FIXED_SIZE + REQUEST_PADDING_MIN {
        return Err(JerichoError::InvalidPacket(format!(
            "request of {} bytes is too short",
            data.len()
        )));
    }

    let padding_len = u16::from_be_bytes([data[0], data[1]]) as usize;
    let tail_start = data.len() - (TIMESTAMP_SIZE + FROM_USER_SIZE + ACTION_SIZE);
    let packets_start = PADDING_LENGTH_SIZE + padding_len;
    let padding_in_range = (REQUEST_PADDING_MIN..=REQUEST_PADDING_MAX).contains(&padding_len);
    if !padding_in_range || packets_start > tail_start {
        return Err(JerichoError::InvalidPacket(format!(
            "request padding length {} is invalid",
            padding_len
        )));
    }

    let region = &data[packets_start..tail_start];
    if region.len() % MESSAGE_PACKET_SIZE != 0
        || region.len() / MESSAGE_PACKET_SIZE > MAX_MESSAGES_PER_REQUEST
    {
        return Err(JerichoError::InvalidPacket(format!(
            "message packet region of {} bytes is invalid",
            region.len()
        )));
    }
    let packets = region
        .chunks_exact(MESSAGE_PACKET_SIZE)
        .map(MessagePacket::from_slice)
        .collect::<Result<Vec<_>>>()?;

    let tail = &data[tail_start..];
    let mut timestamp = [0u8; 8];
    timestamp[8 - TIMESTAMP_SIZE..].copy_from_slice(&tail[..TIMESTAMP_SIZE]);

    let action = ApiAction::from_byte(tail[TIMESTAMP_SIZE + FROM_USER_SIZE])
        .ok_or_else(|| JerichoError::InvalidPacket("invalid API action in request".into()))?;
    let user_letter = tail[TIMESTAMP_SIZE];
    let from_user = Callsign::from_letter(user_letter)
        .ok_or_else(|| JerichoError::UnknownUser(format!("{:?}", user_letter as char)))?;

    Ok(RequestPayload {
        from_user,
        action,
        timestamp: u64::from_be_bytes(timestamp),
        packets,
    })
}

/// Random filler of a random length within the request bounds
pub fn request_padding<R: RngCore + CryptoRng + ?Sized>(rng: &mut R) -> Result<Vec<u8>> {
    let length = random_int_in_range(rng, REQUEST_PADDING_MIN as u64, REQUEST_PADDING_MAX as u64)?;
    random_vec(rng, length as usize)
}

/// `Skein512(macKey || groupId || nonce || ciphertext)`
pub fn authenticate(keys: &GroupKeys, nonce: &[u8], ciphertext: &[u8]) -> Digest512 {
    skein512(&[keys.mac_key(), keys.identifier().as_bytes(), nonce, ciphertext])
}

/// Base64 body ready for the transport, with the MAC the response must be
/// bound to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedRequest {
    pub body: String,
    pub mac: Digest512,
}

/// Serialize, encrypt and authenticate with explicit padding and nonce
pub fn seal_request_with(
    keys: &GroupKeys,
    payload: &RequestPayload,
    padding: &[u8],
    nonce: [u8; NONCE_SIZE],
) -> Result<SealedRequest> {
    let plaintext = serialize_request(payload, padding)?;
    let ciphertext = encrypt_payload(keys.encryption_key(), &nonce, &plaintext)?;
    let mac = authenticate(keys, &nonce, &ciphertext);

    let packet = NetworkPacket { nonce, ciphertext, mac };
    tracing::debug!(
        action = ?payload.action,
        packets = payload.packets.len(),
        padding = padding.len(),
        "sealed request"
    );
    Ok(SealedRequest {
        body: packet.to_base64(),
        mac,
    })
}

/// Seal a request with fresh random padding and nonce
pub fn seal_request<R: RngCore + CryptoRng + ?Sized>(
    keys: &GroupKeys,
    payload: &RequestPayload,
    rng: &mut R,
) -> Result<SealedRequest> {
    let padding = request_padding(rng)?;
    let mut nonce = [0u8; NONCE_SIZE];
    nonce.copy_from_slice(&random_vec(rng, NONCE_SIZE)?);
    seal_request_with(keys, payload, &padding, nonce)
}
