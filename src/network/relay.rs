//! Relay-side validation and response sealing.
//!
//! The relay is not part of the client, but the envelope is symmetric and
//! these functions let a group member (or a test) stand one up in-process.

use super::keystream::encrypt_payload;
use super::packet::NetworkPacket;
use super::request::{authenticate, deserialize_request, RequestPayload};
use super::response::{seal_response_with, ResponsePayload, UserMessage};
use super::transport::Transport;
use super::{
    ApiAction, GroupIdentifier, GroupKeys, ResponseCode, ACTION_SIZE, FROM_USER_SIZE,
    MAX_MESSAGES_PER_REQUEST, NETWORK_MAC_SIZE, NONCE_SIZE, NUM_MESSAGES_SIZE, PADDING_LENGTH_SIZE,
    REQUEST_PADDING_MAX, REQUEST_PADDING_MIN, RESPONSE_CODE_SIZE, RESPONSE_MIN_SIZE,
    RESPONSE_PADDING_MAX, RESPONSE_PADDING_MIN, TIMESTAMP_SIZE, TIMESTAMP_WINDOW,
};
use crate::error::{JerichoError, Result};
use crate::pad::{current_timestamp, MessagePacket, MESSAGE_PACKET_SIZE};
use crate::primitives::{constant_time_compare, Digest512};
use crate::rng::{random_int_in_range, random_vec};
use crate::user::Callsign;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};
use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

const REQUEST_FIELDS_SIZE: usize =
    PADDING_LENGTH_SIZE + TIMESTAMP_SIZE + FROM_USER_SIZE + ACTION_SIZE;

/// Smallest valid request ciphertext: minimum padding and no packets
pub const REQUEST_MIN_CIPHERTEXT: usize = REQUEST_FIELDS_SIZE + REQUEST_PADDING_MIN;

pub const REQUEST_MAX_CIPHERTEXT: usize =
    REQUEST_FIELDS_SIZE + REQUEST_PADDING_MAX + MAX_MESSAGES_PER_REQUEST * MESSAGE_PACKET_SIZE;

pub const REQUEST_MIN_SIZE: usize = NONCE_SIZE + REQUEST_MIN_CIPHERTEXT + NETWORK_MAC_SIZE;
pub const REQUEST_MAX_SIZE: usize = NONCE_SIZE + REQUEST_MAX_CIPHERTEXT + NETWORK_MAC_SIZE;

/// Largest random body sent in place of a response to a rejected request
pub const ERROR_RESPONSE_MAX_SIZE: usize = NONCE_SIZE
    + RESPONSE_PADDING_MAX * 2
    + NUM_MESSAGES_SIZE
    + RESPONSE_CODE_SIZE
    + NETWORK_MAC_SIZE;

pub const MIN_GROUP_USERS: usize = 2;

/// A group known to the relay. Only the first `users` callsigns may use it.
#[derive(Debug, Clone)]
pub struct RelayGroup {
    pub keys: GroupKeys,
    pub users: usize,
}

impl RelayGroup {
    pub fn new(keys: GroupKeys, users: usize) -> Self {
        Self { keys, users }
    }

    /// An out-of-range size falls back to the smallest group
    pub fn members(&self) -> &'static [Callsign] {
        let users = if (MIN_GROUP_USERS..=Callsign::ALL.len()).contains(&self.users) {
            self.users
        } else {
            MIN_GROUP_USERS
        };
        let all: &'static [Callsign] = &Callsign::ALL;
        &all[..users]
    }
}

/// Request nonces already accepted, with the time they were seen
#[derive(Debug, Default)]
pub struct NonceLedger {
    seen: HashMap<[u8; NONCE_SIZE], u64>,
}

impl NonceLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, nonce: &[u8; NONCE_SIZE]) -> bool {
        self.seen.contains_key(nonce)
    }

    /// Record `nonce`; false if it was already present
    pub fn record(&mut self, nonce: [u8; NONCE_SIZE], now: u64) -> bool {
        if self.seen.contains_key(&nonce) {
            return false;
        }
        self.seen.insert(nonce, now);
        true
    }

    /// Forget nonces older than twice the timestamp window. A replay of one
    /// of those fails the timestamp check instead.
    pub fn prune(&mut self, now: u64) {
        let horizon = now.saturating_sub(TIMESTAMP_WINDOW * 2);
        self.seen.retain(|_, seen_at| *seen_at >= horizon);
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

/// A request that passed every relay check
#[derive(Debug, Clone)]
pub struct OpenedRequest {
    pub group: GroupIdentifier,
    pub payload: RequestPayload,
    /// The response must be bound to this MAC
    pub mac: Digest512,
}

fn reject(reason: &str) -> JerichoError {
    tracing::warn!(reason, "rejected request");
    JerichoError::InvalidPacket(reason.to_string())
}

/// Validate and decrypt a request body.
///
/// Checks run in order: body length, base64, MAC against each known group,
/// timestamp window, nonce freshness, API action, sender membership, and
/// finally the packet count for sends. The nonce is recorded only once the
/// MAC and timestamp have verified.
pub fn open_request(
    groups: &[RelayGroup],
    body: &str,
    ledger: &mut NonceLedger,
    now: u64,
) -> Result<OpenedRequest> {
    let body = body.trim();
    let min_chars = REQUEST_MIN_SIZE.div_ceil(3) * 4;
    let max_chars = REQUEST_MAX_SIZE.div_ceil(3) * 4;
    if !(min_chars..=max_chars).contains(&body.len()) {
        return Err(reject("request is not a valid length"));
    }

    let bytes = STANDARD
        .decode(body)
        .map_err(|_| reject("request contains malformed base64"))?;
    let packet = NetworkPacket::from_bytes(&bytes)?;
    if !(REQUEST_MIN_CIPHERTEXT..=REQUEST_MAX_CIPHERTEXT).contains(&packet.ciphertext.len()) {
        return Err(reject("request ciphertext is not a valid length"));
    }

    let group = groups
        .iter()
        .find(|g| {
            let expected = authenticate(&g.keys, &packet.nonce, &packet.ciphertext);
            constant_time_compare(&expected, &packet.mac)
        })
        .ok_or_else(|| {
            tracing::warn!("no group verifies the request MAC");
            JerichoError::MacVerificationFailed("request".into())
        })?;

    let plaintext = encrypt_payload(
        group.keys.encryption_key(),
        &packet.nonce,
        &packet.ciphertext,
    )?;
    let tail = &plaintext[plaintext.len() - (TIMESTAMP_SIZE + FROM_USER_SIZE + ACTION_SIZE)..];
    let mut ts = [0u8; 8];
    ts[8 - TIMESTAMP_SIZE..].copy_from_slice(&tail[..TIMESTAMP_SIZE]);
    let sent = u64::from_be_bytes(ts);
    if sent < now.saturating_sub(TIMESTAMP_WINDOW) || sent > now + TIMESTAMP_WINDOW {
        return Err(reject("sent timestamp is outside the window, sync clocks"));
    }

    ledger.prune(now);
    if !ledger.record(packet.nonce, now) {
        return Err(reject("request nonce was already used"));
    }

    let payload = deserialize_request(&plaintext)?;
    if !group.members().contains(&payload.from_user) {
        return Err(reject("sender is not a member of the group"));
    }
    if payload.action == ApiAction::Send && payload.packets.is_empty() {
        return Err(reject("send request carries no message packets"));
    }

    tracing::debug!(user = %payload.from_user, action = ?payload.action, "accepted request");
    Ok(OpenedRequest {
        group: group.keys.identifier(),
        payload,
        mac: packet.mac,
    })
}

/// Seal a response with fresh random padding and nonce
pub fn seal_response<R: RngCore + CryptoRng + ?Sized>(
    keys: &GroupKeys,
    request_mac: &Digest512,
    payload: &ResponsePayload,
    rng: &mut R,
) -> Result<String> {
    let length = random_int_in_range(
        rng,
        RESPONSE_PADDING_MIN as u64,
        RESPONSE_PADDING_MAX as u64,
    )?;
    let padding = random_vec(rng, length as usize)?;
    let mut nonce = [0u8; NONCE_SIZE];
    nonce.copy_from_slice(&random_vec(rng, NONCE_SIZE)?);
    seal_response_with(keys, request_mac, payload, &padding, nonce)
}

/// Random bytes sized like a real response, returned for rejected requests
/// so an observer cannot tell a rejection from an answer
pub fn error_response_body<R: RngCore + CryptoRng + ?Sized>(rng: &mut R) -> Result<String> {
    let length = random_int_in_range(
        rng,
        RESPONSE_MIN_SIZE as u64,
        ERROR_RESPONSE_MAX_SIZE as u64,
    )?;
    Ok(STANDARD.encode(random_vec(rng, length as usize)?))
}

/// In-process relay holding messages in memory.
///
/// Sends are stored already read by their sender. A receive returns every
/// message from another member the caller has not read yet and marks it
/// read. Messages read by the whole group are dropped. Clones share state,
/// so each member's session can hold its own handle.
#[derive(Clone)]
pub struct MemoryRelay {
    groups: Arc<Vec<RelayGroup>>,
    state: Arc<Mutex<RelayState>>,
}

#[derive(Default)]
struct RelayState {
    ledger: NonceLedger,
    messages: Vec<StoredMessage>,
    offline: bool,
}

struct StoredMessage {
    group: GroupIdentifier,
    from_user: Callsign,
    packet: MessagePacket,
    read_by: BTreeSet<Callsign>,
}

impl MemoryRelay {
    pub fn new(groups: Vec<RelayGroup>) -> Self {
        Self {
            groups: Arc::new(groups),
            state: Arc::new(Mutex::new(RelayState::default())),
        }
    }

    fn state(&self) -> Result<MutexGuard<'_, RelayState>> {
        self.state
            .lock()
            .map_err(|_| JerichoError::Transport("relay state lock poisoned".into()))
    }

    /// While offline every request fails at the transport
    pub fn set_offline(&self, offline: bool) -> Result<()> {
        self.state()?.offline = offline;
        Ok(())
    }

    /// Messages not yet read by every member
    pub fn pending_messages(&self) -> Result<usize> {
        Ok(self.state()?.messages.len())
    }

    /// Answer one request body as the relay would at time `now`
    pub fn handle(&self, body: &str, now: u64) -> Result<String> {
        let mut state = self.state()?;
        let opened = match open_request(&self.groups, body, &mut state.ledger, now) {
            Ok(opened) => opened,
            Err(_) => return error_response_body(&mut OsRng),
        };
        let group = self
            .groups
            .iter()
            .find(|g| g.keys.identifier() == opened.group)
            .ok_or_else(|| JerichoError::InvalidConfig(format!("unknown group {}", opened.group)))?;

        let response = match opened.payload.action {
            ApiAction::Test => ResponsePayload::code(ResponseCode::Success),
            ApiAction::Send => {
                let from_user = opened.payload.from_user;
                for packet in &opened.payload.packets {
                    state.messages.push(StoredMessage {
                        group: opened.group,
                        from_user,
                        packet: *packet,
                        read_by: BTreeSet::from([from_user]),
                    });
                }
                ResponsePayload::code(ResponseCode::Success)
            }
            ApiAction::Receive => {
                let reader = opened.payload.from_user;
                let mut messages = Vec::new();
                for stored in state.messages.iter_mut() {
                    let unread = stored.group == opened.group
                        && stored.from_user != reader
                        && stored.read_by.insert(reader);
                    if unread {
                        messages.push(UserMessage {
                            from_user: stored.from_user,
                            packet: stored.packet,
                        });
                    }
                }
                let members = group.members().len();
                state.messages.retain(|m| m.read_by.len() < members);

                if messages.is_empty() {
                    ResponsePayload::code(ResponseCode::SuccessNoMessages)
                } else {
                    ResponsePayload {
                        code: ResponseCode::Success,
                        messages,
                    }
                }
            }
        };
        seal_response(&group.keys, &opened.mac, &response, &mut OsRng)
    }
}

impl Transport for MemoryRelay {
    fn send(&self, body: String) -> impl Future<Output = Result<String>> + Send {
        let reply = match self.state().map(|s| s.offline) {
            Ok(true) => Err(JerichoError::Transport("relay unreachable".into())),
            Ok(false) => self.handle(&body, current_timestamp()),
            Err(e) => Err(e),
        };
        async move { reply }
    }
}
