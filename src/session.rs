//! A group member's running client: sending, polling, decoys and the remote
//! wipe, on top of the pad store and the network protocol.

use crate::config::ClientConfig;
use crate::database::{EncryptedFile, FileStore, UnlockedDatabase};
use crate::decoy::{create_decoy_packet, DecoyScheduler};
use crate::error::{FatalError, JerichoError, Result};
use crate::network::{
    Backoff, BusyFlag, GroupKeys, RequestCycle, RequestPayload, RequestState, ResponseCode,
    ResponsePayload, Transport,
};
use crate::pad::codec::{decrypt_message, encrypt_message};
use crate::pad::store::{PadPersistence, PadStore};
use crate::pad::{current_timestamp, PadIdentifier, MESSAGE_SIZE};
use crate::rng::FailsafeRng;
use crate::user::Callsign;
use std::collections::BTreeMap;
use std::time::Duration;

/// A message with this text, sent and verified, wipes every member's pads
pub const AUTO_NUKE_TRIGGER: &str = "init auto nuke";

/// RNG draws covered by one persisted nonce reservation
const NONCE_RESERVATION: u64 = 1 << 20;

/// A new reservation is written once fewer than this many draws remain
const NONCE_LOW_WATER: u64 = 1 << 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub identifier: PadIdentifier,
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedMessage {
    pub from_user: Callsign,
    pub identifier: PadIdentifier,
    pub plaintext: String,
    pub timestamp: u64,
    /// False when the message MAC failed; the plaintext is then empty
    pub valid: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// Another poll was already in flight
    Skipped,
    NoMessages,
    /// Real messages, oldest first. Decoys are never included.
    Messages(Vec<ReceivedMessage>),
    /// A member triggered the remote wipe; the local pads are gone
    AutoNuke { initiated_by: Callsign },
}

pub struct Session<T: Transport, P: PadPersistence> {
    config: ClientConfig,
    keys: GroupKeys,
    store: PadStore<P>,
    rng: FailsafeRng,
    transport: T,
    cycle: RequestCycle,
    backoff: Backoff,
    busy: BusyFlag,
    decoys: DecoyScheduler,
    last_seen: BTreeMap<Callsign, u64>,
    first_check: bool,
    reserved_nonce: u64,
    nuked_by: Option<Callsign>,
}

impl<T: Transport> Session<T, EncryptedFile> {
    /// Session over an unlocked database that writes back to `file`
    pub fn from_database(
        unlocked: UnlockedDatabase,
        file: FileStore,
        transport: T,
    ) -> Result<Self> {
        let config = ClientConfig::from_pad_info(&unlocked.header.info);
        let rng = unlocked.header.info.failsafe_rng()?;
        let store = unlocked.into_store(file)?;
        Self::new(config, store, rng, transport)
    }
}

impl<T: Transport, P: PadPersistence> Session<T, P> {
    /// Start a session. The RNG nonce is reserved and saved before anything
    /// is drawn, so a crash can never replay a keystream.
    pub fn new(
        config: ClientConfig,
        store: PadStore<P>,
        rng: FailsafeRng,
        transport: T,
    ) -> Result<Self> {
        config.validate()?;
        if !rng.is_initialised() {
            return Err(FatalError::RngNotInitialised.into());
        }
        let keys = config.group_keys()?;
        let backoff = Backoff::new(config.poll_interval());
        let decoys = DecoyScheduler::new(config.decoys.clone());

        let mut session = Self {
            config,
            keys,
            store,
            rng,
            transport,
            cycle: RequestCycle::new(),
            backoff,
            busy: BusyFlag::new(),
            decoys,
            last_seen: BTreeMap::new(),
            first_check: true,
            reserved_nonce: 0,
            nuked_by: None,
        };
        session.reserve_rng_nonces()?;
        tracing::debug!(user = %session.config.user, "session started");
        Ok(session)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn user(&self) -> Callsign {
        self.config.user
    }

    pub fn store(&self) -> &PadStore<P> {
        &self.store
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn request_state(&self) -> RequestState {
        self.cycle.state()
    }

    /// Shared handle on the poll flag, for timers that want to skip a tick
    pub fn busy_flag(&self) -> BusyFlag {
        self.busy.clone()
    }

    /// Wait before the next poll, including any backoff
    pub fn poll_interval(&self) -> Duration {
        self.backoff.interval()
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.backoff.consecutive_failures()
    }

    pub fn pads_remaining(&self) -> usize {
        self.store.pad_count(self.config.user)
    }

    pub fn is_nuked(&self) -> bool {
        self.nuked_by.is_some()
    }

    pub fn nuked_by(&self) -> Option<Callsign> {
        self.nuked_by
    }

    /// Last time each member was seen, by message timestamp or poll time
    pub fn last_seen(&self) -> &BTreeMap<Callsign, u64> {
        &self.last_seen
    }

    /// Members seen within the activity window ending at `now`
    pub fn online_users(&self, now: u64) -> Vec<Callsign> {
        let window = self.decoys.settings().activity_window_secs;
        self.last_seen
            .iter()
            .filter(|(_, seen)| now.saturating_sub(**seen) <= window)
            .map(|(user, _)| *user)
            .collect()
    }

    fn ensure_active(&self) -> Result<()> {
        match self.nuked_by {
            Some(user) => Err(JerichoError::InvalidConfig(format!(
                "pads were wiped by an auto nuke from {}",
                user
            ))),
            None => Ok(()),
        }
    }

    /// Persist a nonce ahead of every draw this session can make before the
    /// next reservation
    fn reserve_rng_nonces(&mut self) -> Result<()> {
        let nonce = self.rng.nonce();
        if nonce.saturating_add(NONCE_LOW_WATER) < self.reserved_nonce {
            return Ok(());
        }
        let reserved = nonce.saturating_add(NONCE_RESERVATION);
        self.store.persistence_mut().set_rng_nonce(reserved);
        self.store.save()?;
        self.reserved_nonce = reserved;
        tracing::debug!(reserved, "reserved failsafe RNG nonces");
        Ok(())
    }

    async fn exchange(&mut self, payload: &RequestPayload) -> Result<ResponsePayload> {
        let timeout = self.config.request_timeout();
        self.cycle
            .exchange(&self.transport, &self.keys, payload, &mut self.rng, timeout)
            .await
    }

    /// Encrypt `text` with the next pad and post it to the relay.
    ///
    /// The pad is consumed even if sending fails. Sending the auto nuke
    /// trigger wipes the local pads once the relay has accepted it.
    pub async fn send_message(&mut self, text: &str) -> Result<SentMessage> {
        self.ensure_active()?;
        if text.is_empty() {
            return Err(JerichoError::InvalidPacket("message is empty".into()));
        }
        if text.len() > MESSAGE_SIZE {
            return Err(JerichoError::InvalidPacket(format!(
                "message is {} bytes, the limit is {}",
                text.len(),
                MESSAGE_SIZE
            )));
        }
        self.reserve_rng_nonces()?;

        let pad = self.store.allocate_for_sending(self.config.user)?;
        let timestamp = current_timestamp();
        let packet = encrypt_message(text, &pad, timestamp, &mut self.rng)?;
        let identifier = pad.identifier();
        drop(pad);

        let payload = RequestPayload::send(self.config.user, vec![packet], timestamp);
        let response = self.exchange(&payload).await?;
        if response.code != ResponseCode::Success {
            tracing::warn!(code = %response.code, "relay did not accept the message");
            return Err(JerichoError::Response(response.code));
        }
        tracing::debug!(%identifier, remaining = self.pads_remaining(), "message sent");

        if text.contains(AUTO_NUKE_TRIGGER) {
            self.auto_nuke(self.config.user)?;
        }
        Ok(SentMessage { identifier, timestamp })
    }

    /// Fetch and decrypt new messages.
    ///
    /// Failures double the poll interval; a success restores it. Packets
    /// with no matching pad are decoys and only count as activity. Pads of
    /// verified messages are deleted before returning.
    pub async fn check_for_messages(&mut self) -> Result<PollOutcome> {
        self.ensure_active()?;
        let Some(_guard) = self.busy.try_acquire() else {
            tracing::debug!("poll already in flight, skipping");
            return Ok(PollOutcome::Skipped);
        };
        self.reserve_rng_nonces()?;

        let now = current_timestamp();
        let payload = RequestPayload::receive(self.config.user, now);
        let response = match self.exchange(&payload).await {
            Ok(response) if response.code.is_success() => response,
            Ok(response) => {
                self.backoff.on_failure();
                return Err(JerichoError::Response(response.code));
            }
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                self.backoff.on_failure();
                return Err(e);
            }
        };
        if self.backoff.on_success() {
            tracing::debug!("connection restored, poll interval reset");
        }
        self.last_seen.insert(self.config.user, now);

        let outcome = self.process_messages(response, now);
        self.first_check = false;
        outcome
    }

    fn process_messages(&mut self, response: ResponsePayload, now: u64) -> Result<PollOutcome> {
        let mut received = Vec::new();
        let mut consumed = Vec::new();

        for message in &response.messages {
            let found = self
                .store
                .find_for_receiving(message.from_user, &message.packet);
            let Some((index, pad)) = found else {
                tracing::debug!(from = %message.from_user, "dropping decoy");
                // Everything queued before startup would look like live traffic
                if !self.first_check {
                    self.decoys.record_activity(now);
                    self.last_seen.insert(message.from_user, now);
                }
                continue;
            };

            let identifier = pad.identifier();
            let decrypted = decrypt_message(&message.packet, pad)?;
            if decrypted.valid && decrypted.plaintext.contains(AUTO_NUKE_TRIGGER) {
                tracing::warn!(from = %message.from_user, "auto nuke received");
                self.auto_nuke(message.from_user)?;
                return Ok(PollOutcome::AutoNuke {
                    initiated_by: message.from_user,
                });
            }

            if decrypted.valid {
                consumed.push((message.from_user, index));
                self.decoys.record_activity(decrypted.timestamp);
                let seen = self.last_seen.entry(message.from_user).or_default();
                *seen = (*seen).max(decrypted.timestamp);
            }
            received.push(ReceivedMessage {
                from_user: message.from_user,
                identifier,
                plaintext: decrypted.plaintext,
                timestamp: decrypted.timestamp,
                valid: decrypted.valid,
            });
        }

        self.store.delete_consumed(&consumed)?;

        if received.is_empty() {
            return Ok(PollOutcome::NoMessages);
        }
        received.sort_by_key(|m| m.timestamp);
        tracing::debug!(count = received.len(), "received messages");
        Ok(PollOutcome::Messages(received))
    }

    /// Random wait before the next decoy
    pub fn next_decoy_delay(&mut self) -> Result<Duration> {
        self.decoys.next_delay(&mut self.rng)
    }

    /// Send a decoy if decoys are enabled and another member was active
    /// recently. Returns whether one was sent.
    pub async fn send_decoy(&mut self) -> Result<bool> {
        self.ensure_active()?;
        if !self.decoys.should_send(current_timestamp()) {
            return Ok(false);
        }
        self.reserve_rng_nonces()?;

        let packet = create_decoy_packet(&self.store, &mut self.rng)?;
        let payload = RequestPayload::send(self.config.user, vec![packet], current_timestamp());
        let response = self.exchange(&payload).await?;
        if response.code != ResponseCode::Success {
            return Err(JerichoError::Response(response.code));
        }
        tracing::debug!("decoy sent");
        Ok(true)
    }

    /// Check authentication with the relay and its storage
    pub async fn test_connection(&mut self) -> Result<ResponseCode> {
        self.reserve_rng_nonces()?;
        let payload = RequestPayload::test(self.config.user, current_timestamp());
        let response = self.exchange(&payload).await?;
        Ok(response.code)
    }

    /// Destroy every local pad. Used on receipt of the trigger and after
    /// sending it; also callable directly.
    pub fn auto_nuke(&mut self, initiated_by: Callsign) -> Result<()> {
        self.nuked_by = Some(initiated_by);
        self.store.wipe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cascade::keys::MacKeys;
    use crate::network::{
        GroupIdentifier, MemoryRelay, RelayGroup, GROUP_IDENTIFIER_SIZE, GROUP_KEY_SIZE,
    };
    use crate::pad::store::{compute_index_macs, MemoryStore, PadInventory};
    use crate::pad::{OneTimePad, PAD_SIZE};
    use rand::rngs::StdRng;
    use rand::{RngCore, SeedableRng};

    fn config(user: Callsign) -> ClientConfig {
        ClientConfig {
            server_address_and_port: "relay.test:443".into(),
            group_identifier: vec![7; GROUP_IDENTIFIER_SIZE].into(),
            group_key: vec![8; GROUP_KEY_SIZE].into(),
            user,
            ..ClientConfig::default()
        }
    }

    fn relay() -> MemoryRelay {
        let identifier = GroupIdentifier::from_bytes([7; 8]);
        let keys = GroupKeys::derive(identifier, &[8; GROUP_KEY_SIZE]).unwrap();
        MemoryRelay::new(vec![RelayGroup::new(keys, 3)])
    }

    /// Both members hold identical copies of every bucket
    fn inventory() -> PadInventory {
        let mut rng = StdRng::seed_from_u64(42);
        let mut pads = PadInventory::new();
        let mut number = 0;
        for user in [Callsign::Alpha, Callsign::Bravo, Callsign::Charlie] {
            let bucket = (0..4)
                .map(|_| {
                    let mut bytes = [0u8; PAD_SIZE];
                    rng.fill_bytes(&mut bytes);
                    number += 1;
                    OneTimePad::new(number, bytes).unwrap()
                })
                .collect();
            pads.insert(user, bucket);
        }
        pads
    }

    fn session(user: Callsign, relay: &MemoryRelay) -> Session<MemoryRelay, MemoryStore> {
        let keys = MacKeys {
            keccak: [5; 64],
            skein: [6; 64],
        };
        let pads = inventory();
        let macs = compute_index_macs(&keys, &pads).unwrap();
        let store = PadStore::open(keys, pads, macs, MemoryStore::default()).unwrap();
        let rng = FailsafeRng::new([user.letter(); 32], 0);
        Session::new(config(user), store, rng, relay.clone()).unwrap()
    }

    #[tokio::test]
    async fn test_send_and_receive() {
        let relay = relay();
        let mut alpha = session(Callsign::Alpha, &relay);
        let mut bravo = session(Callsign::Bravo, &relay);

        // First poll drains nothing and ends the startup period
        assert_eq!(bravo.check_for_messages().await.unwrap(), PollOutcome::NoMessages);

        alpha.send_message("first").await.unwrap();
        alpha.send_message("second").await.unwrap();
        assert_eq!(alpha.pads_remaining(), 2);

        let PollOutcome::Messages(messages) = bravo.check_for_messages().await.unwrap() else {
            panic!("expected messages");
        };
        let texts: Vec<_> = messages.iter().map(|m| m.plaintext.as_str()).collect();
        assert_eq!(texts, ["first", "second"]);
        assert!(messages.iter().all(|m| m.valid && m.from_user == Callsign::Alpha));
        assert_eq!(bravo.store().pad_count(Callsign::Alpha), 2);
        assert!(bravo.online_users(current_timestamp()).contains(&Callsign::Alpha));

        assert_eq!(bravo.check_for_messages().await.unwrap(), PollOutcome::NoMessages);
    }

    #[tokio::test]
    async fn test_send_rejects_bad_lengths() {
        let relay = relay();
        let mut alpha = session(Callsign::Alpha, &relay);
        assert!(alpha.send_message("").await.is_err());
        assert!(alpha.send_message(&"x".repeat(MESSAGE_SIZE + 1)).await.is_err());
        assert_eq!(alpha.pads_remaining(), 4);
        alpha.send_message(&"x".repeat(MESSAGE_SIZE)).await.unwrap();
    }

    #[tokio::test]
    async fn test_backoff_follows_relay_health() {
        let relay = relay();
        let mut bravo = session(Callsign::Bravo, &relay);
        let base = bravo.poll_interval();

        relay.set_offline(true).unwrap();
        assert!(bravo.check_for_messages().await.is_err());
        assert!(bravo.check_for_messages().await.is_err());
        assert_eq!(bravo.poll_interval(), base * 4);
        assert_eq!(bravo.request_state(), RequestState::NetworkFailure);

        relay.set_offline(false).unwrap();
        bravo.check_for_messages().await.unwrap();
        assert_eq!(bravo.poll_interval(), base);
        assert_eq!(bravo.consecutive_failures(), 0);
    }

    #[tokio::test]
    async fn test_busy_poll_is_skipped() {
        let relay = relay();
        let mut bravo = session(Callsign::Bravo, &relay);
        let flag = bravo.busy_flag();
        let guard = flag.try_acquire().unwrap();
        assert_eq!(bravo.check_for_messages().await.unwrap(), PollOutcome::Skipped);
        drop(guard);
        assert_eq!(bravo.check_for_messages().await.unwrap(), PollOutcome::NoMessages);
    }

    #[tokio::test]
    async fn test_decoys_are_dropped() {
        let relay = relay();
        let mut alpha = session(Callsign::Alpha, &relay);
        let mut bravo = session(Callsign::Bravo, &relay);
        bravo.check_for_messages().await.unwrap();

        assert!(alpha.send_decoy().await.unwrap());
        assert_eq!(alpha.pads_remaining(), 4);
        assert_eq!(bravo.check_for_messages().await.unwrap(), PollOutcome::NoMessages);
        assert!(bravo.last_seen().contains_key(&Callsign::Alpha));
        assert_eq!(bravo.store().pad_count(Callsign::Alpha), 4);
    }

    #[tokio::test]
    async fn test_tampered_message_keeps_pad() {
        let relay = relay();
        let mut bravo = session(Callsign::Bravo, &relay);
        let alpha_pads = inventory();
        let pad = &alpha_pads[&Callsign::Alpha][0];

        let mut rng = StdRng::seed_from_u64(1);
        let packet = encrypt_message("hello", pad, current_timestamp(), &mut rng).unwrap();
        let mut bytes = *packet.as_bytes();
        bytes[20] ^= 1;
        let forged = crate::pad::MessagePacket::from_bytes(bytes);

        let keys = config(Callsign::Alpha).group_keys().unwrap();
        let sealed = crate::network::seal_request(
            &keys,
            &RequestPayload::send(Callsign::Alpha, vec![forged], current_timestamp()),
            &mut rng,
        )
        .unwrap();
        relay.handle(&sealed.body, current_timestamp()).unwrap();

        let PollOutcome::Messages(messages) = bravo.check_for_messages().await.unwrap() else {
            panic!("expected the forged message");
        };
        assert!(!messages[0].valid);
        assert!(messages[0].plaintext.is_empty());
        assert_eq!(bravo.store().pad_count(Callsign::Alpha), 4);
    }

    #[tokio::test]
    async fn test_auto_nuke_wipes_both_ends() {
        let relay = relay();
        let mut alpha = session(Callsign::Alpha, &relay);
        let mut bravo = session(Callsign::Bravo, &relay);

        alpha.send_message(AUTO_NUKE_TRIGGER).await.unwrap();
        assert!(alpha.is_nuked());
        assert!(alpha.store().is_empty());
        assert!(alpha.send_message("after").await.is_err());

        let outcome = bravo.check_for_messages().await.unwrap();
        assert_eq!(
            outcome,
            PollOutcome::AutoNuke {
                initiated_by: Callsign::Alpha
            }
        );
        assert!(bravo.store().is_empty());
        assert!(bravo.store().persistence().snapshot.is_none());
    }

    #[tokio::test]
    async fn test_rng_nonce_reserved_ahead() {
        let relay = relay();
        let mut alpha = session(Callsign::Alpha, &relay);
        let reserved = alpha.store().persistence().rng_nonce;
        assert_eq!(reserved, NONCE_RESERVATION);

        alpha.send_message("hi").await.unwrap();
        assert!(alpha.rng.nonce() < reserved);
        assert_eq!(alpha.store().persistence().rng_nonce, reserved);
    }

    #[tokio::test]
    async fn test_connection_check() {
        let relay = relay();
        let mut charlie = session(Callsign::Charlie, &relay);
        assert_eq!(charlie.test_connection().await.unwrap(), ResponseCode::Success);
        assert_eq!(charlie.request_state(), RequestState::Verified);
    }
}
