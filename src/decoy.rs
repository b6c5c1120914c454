//! Decoy traffic. While other members are online, random-looking packets are
//! sent at random intervals so an observer of the relay cannot tell when
//! real messages are written. Receivers find no pad for a decoy and drop it.

use crate::error::{JerichoError, Result};
use crate::pad::store::{PadPersistence, PadStore};
use crate::pad::{MessagePacket, PadIdentifier, MESSAGE_PACKET_SIZE, PAD_IDENTIFIER_SIZE};
use crate::rng::{random_int_in_range, random_vec};
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DecoySettings {
    pub enabled: bool,
    pub min_delay_secs: u64,
    pub max_delay_secs: u64,
    /// How recently another member must have been seen
    pub activity_window_secs: u64,
}

impl Default for DecoySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            min_delay_secs: 1,
            max_delay_secs: 90,
            activity_window_secs: 300,
        }
    }
}

impl DecoySettings {
    pub fn validate(&self) -> Result<()> {
        if self.min_delay_secs == 0 || self.min_delay_secs > self.max_delay_secs {
            return Err(JerichoError::InvalidConfig(format!(
                "decoy delay range {}..={} is invalid",
                self.min_delay_secs, self.max_delay_secs
            )));
        }
        Ok(())
    }
}

/// Random identifier plus random body. The identifier is redrawn until it
/// matches no pad in the inventory.
pub fn create_decoy_packet<P, R>(store: &PadStore<P>, rng: &mut R) -> Result<MessagePacket>
where
    P: PadPersistence,
    R: RngCore + CryptoRng + ?Sized,
{
    let identifier = loop {
        let candidate = PadIdentifier::from_slice(&random_vec(rng, PAD_IDENTIFIER_SIZE)?)?;
        if !store.contains_identifier(&candidate) {
            break candidate;
        }
        tracing::debug!("decoy identifier collided with a real pad, redrawing");
    };

    let mut bytes = [0u8; MESSAGE_PACKET_SIZE];
    bytes[..PAD_IDENTIFIER_SIZE].copy_from_slice(identifier.as_bytes());
    let body = random_vec(rng, MESSAGE_PACKET_SIZE - PAD_IDENTIFIER_SIZE)?;
    bytes[PAD_IDENTIFIER_SIZE..].copy_from_slice(&body);
    Ok(MessagePacket::from_bytes(bytes))
}

/// Decides when decoys go out
#[derive(Debug, Clone)]
pub struct DecoyScheduler {
    settings: DecoySettings,
    last_activity: Option<u64>,
}

impl DecoyScheduler {
    pub fn new(settings: DecoySettings) -> Self {
        Self {
            settings,
            last_activity: None,
        }
    }

    pub fn settings(&self) -> &DecoySettings {
        &self.settings
    }

    pub fn last_activity(&self) -> Option<u64> {
        self.last_activity
    }

    /// Note traffic from another member at `timestamp`
    pub fn record_activity(&mut self, timestamp: u64) {
        self.last_activity = Some(self.last_activity.map_or(timestamp, |t| t.max(timestamp)));
    }

    /// Whether another member was seen within the activity window.
    ///
    /// With no activity recorded yet the answer is yes, and the window is
    /// started now so silence from here on stops decoys after it closes.
    pub fn others_recently_active(&mut self, now: u64) -> bool {
        let window = self.settings.activity_window_secs;
        match self.last_activity {
            None => {
                self.last_activity = Some(now.saturating_sub(window));
                true
            }
            Some(last) => {
                let idle = now.saturating_sub(last);
                if idle > window {
                    tracing::debug!(
                        idle_secs = idle,
                        "no recent activity from other users, skipping decoy"
                    );
                }
                idle <= window
            }
        }
    }

    /// Uniformly random wait before the next decoy
    pub fn next_delay<R: RngCore + CryptoRng + ?Sized>(&self, rng: &mut R) -> Result<Duration> {
        let secs = random_int_in_range(
            rng,
            self.settings.min_delay_secs,
            self.settings.max_delay_secs,
        )?;
        Ok(Duration::from_secs(secs))
    }

    /// Whether a decoy due at `now` should actually be sent
    pub fn should_send(&mut self, now: u64) -> bool {
        self.settings.enabled && self.others_recently_active(now)
    }
}
