//! Pad inventory with per-user index MACs.
//!
//! Every consuming mutation is persisted before it returns, so a crash can
//! never leave a pad both spent and still stored.

use crate::cascade::keys::MacKeys;
use crate::cascade::mac::{cascade_mac, verify_cascade_mac};
use crate::error::{JerichoError, Result};
use crate::pad::{MessagePacket, OneTimePad, PadIdentifier};
use crate::primitives::Digest512;
use crate::user::Callsign;
use std::collections::BTreeMap;
use std::fmt;

/// Pads per user, in the order they were generated
pub type PadInventory = BTreeMap<Callsign, Vec<OneTimePad>>;

/// Index MAC per user
pub type IndexMacs = BTreeMap<Callsign, Vec<u8>>;

/// Storage slot for the pad inventory. Only "last write wins" is assumed;
/// consistency is re-checked through the index MACs on every load.
pub trait PadPersistence {
    fn save(&mut self, pads: &PadInventory, index_macs: &IndexMacs) -> Result<()>;

    /// Destroy everything held in the slot
    fn wipe(&mut self) -> Result<()>;

    /// Record the failsafe RNG position so it is stored with the next save
    fn set_rng_nonce(&mut self, _nonce: u64) {}
}

/// MAC input: callsign bytes followed by the concatenated lowercase hex pad
/// numbers, decoded back to bytes. An odd-length hex string gets one
/// leading zero.
fn index_mac_input(user: Callsign, pads: &[OneTimePad]) -> Result<Vec<u8>> {
    let mut numbers: String = pads.iter().map(|p| format!("{:x}", p.number())).collect();
    if numbers.len() % 2 == 1 {
        numbers.insert(0, '0');
    }

    let mut data = user.as_str().as_bytes().to_vec();
    data.extend_from_slice(&hex::decode(&numbers)?);
    Ok(data)
}

/// MAC over one user's ordered pad numbers
pub fn index_mac(keys: &MacKeys, user: Callsign, pads: &[OneTimePad]) -> Result<Digest512> {
    Ok(cascade_mac(keys, &index_mac_input(user, pads)?))
}

pub fn verify_index_integrity(
    keys: &MacKeys,
    user: Callsign,
    pads: &[OneTimePad],
    stored_mac: &[u8],
) -> bool {
    match index_mac_input(user, pads) {
        Ok(data) => verify_cascade_mac(keys, &data, stored_mac),
        Err(_) => false,
    }
}

/// Check every bucket. A failure for any single user fails the whole
/// inventory, as does a bucket without a MAC or a MAC without a bucket.
pub fn verify_all_indexes(
    keys: &MacKeys,
    pads: &PadInventory,
    index_macs: &IndexMacs,
) -> Result<()> {
    if pads.is_empty() || index_macs.is_empty() {
        return Err(JerichoError::InvalidPad("pad inventory is empty".into()));
    }

    for user in index_macs.keys() {
        if !pads.contains_key(user) {
            tracing::warn!(%user, "index MAC present for a missing pad bucket");
            return Err(JerichoError::IndexIntegrityFailed(*user));
        }
    }

    for (user, bucket) in pads {
        let verified = index_macs
            .get(user)
            .is_some_and(|mac| verify_index_integrity(keys, *user, bucket, mac));
        if !verified {
            tracing::warn!(%user, "pad index failed MAC verification");
            return Err(JerichoError::IndexIntegrityFailed(*user));
        }
    }
    Ok(())
}

/// Compute fresh index MACs for every bucket
pub fn compute_index_macs(keys: &MacKeys, pads: &PadInventory) -> Result<IndexMacs> {
    let mut macs = IndexMacs::new();
    for (user, bucket) in pads {
        macs.insert(*user, index_mac(keys, *user, bucket)?.to_vec());
    }
    Ok(macs)
}

/// Owner of the unlocked pad inventory
pub struct PadStore<P: PadPersistence> {
    mac_keys: MacKeys,
    pads: PadInventory,
    index_macs: IndexMacs,
    persistence: P,
}

impl<P: PadPersistence> fmt::Debug for PadStore<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: BTreeMap<Callsign, usize> =
            self.pads.iter().map(|(u, b)| (*u, b.len())).collect();
        f.debug_struct("PadStore")
            .field("pads", &counts)
            .finish_non_exhaustive()
    }
}

impl<P: PadPersistence> PadStore<P> {
    /// Take ownership of a loaded inventory. Fails unless every index MAC
    /// verifies.
    pub fn open(
        mac_keys: MacKeys,
        pads: PadInventory,
        index_macs: IndexMacs,
        persistence: P,
    ) -> Result<Self> {
        verify_all_indexes(&mac_keys, &pads, &index_macs)?;
        Ok(Self {
            mac_keys,
            pads,
            index_macs,
            persistence,
        })
    }

    pub fn pads(&self) -> &PadInventory {
        &self.pads
    }

    pub fn index_macs(&self) -> &IndexMacs {
        &self.index_macs
    }

    pub fn persistence(&self) -> &P {
        &self.persistence
    }

    pub fn persistence_mut(&mut self) -> &mut P {
        &mut self.persistence
    }

    pub fn pad_count(&self, user: Callsign) -> usize {
        self.pads.get(&user).map_or(0, Vec::len)
    }

    pub fn users(&self) -> impl Iterator<Item = Callsign> + '_ {
        self.pads.keys().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.pads.values().all(Vec::is_empty)
    }

    /// True if any bucket holds a pad with this identifier
    pub fn contains_identifier(&self, identifier: &PadIdentifier) -> bool {
        self.pads
            .values()
            .flatten()
            .any(|pad| pad.identifier() == *identifier)
    }

    fn refresh_index_mac(&mut self, user: Callsign) -> Result<()> {
        let bucket = self.pads.get(&user).map(Vec::as_slice).unwrap_or_default();
        let mac = index_mac(&self.mac_keys, user, bucket)?;
        self.index_macs.insert(user, mac.to_vec());
        Ok(())
    }

    /// Remove and return the earliest remaining pad for `user`. The removal
    /// is persisted first; if that fails the pad is discarded, never reused.
    pub fn allocate_for_sending(&mut self, user: Callsign) -> Result<OneTimePad> {
        let bucket = self
            .pads
            .get_mut(&user)
            .filter(|b| !b.is_empty())
            .ok_or(JerichoError::NoPadsAvailable(user))?;
        let pad = bucket.remove(0);

        self.refresh_index_mac(user)?;
        self.save()?;
        tracing::debug!(
            %user,
            pad = pad.number(),
            remaining = self.pad_count(user),
            "allocated pad"
        );
        Ok(pad)
    }

    /// Find the pad that decrypts `packet` in the sender's bucket. `None`
    /// is the normal outcome for decoy traffic.
    pub fn find_for_receiving(
        &self,
        from_user: Callsign,
        packet: &MessagePacket,
    ) -> Option<(usize, &OneTimePad)> {
        let identifier = packet.identifier();
        self.pads
            .get(&from_user)?
            .iter()
            .enumerate()
            .find(|(_, pad)| pad.identifier() == identifier)
    }

    /// Remove consumed pads by `(user, index)` and persist.
    ///
    /// Indexes refer to the buckets as they are before this call. Within a
    /// user they are removed highest first so earlier removals cannot shift
    /// later ones. Every index is validated before anything is touched.
    pub fn delete_consumed(&mut self, consumed: &[(Callsign, usize)]) -> Result<()> {
        if consumed.is_empty() {
            return Ok(());
        }
        verify_all_indexes(&self.mac_keys, &self.pads, &self.index_macs)?;

        let mut by_user: BTreeMap<Callsign, Vec<usize>> = BTreeMap::new();
        for &(user, index) in consumed {
            let len = self.pad_count(user);
            if index >= len {
                return Err(JerichoError::InvalidPad(format!(
                    "pad index {} out of range for {} ({} pads)",
                    index, user, len
                )));
            }
            by_user.entry(user).or_default().push(index);
        }

        for (user, mut indexes) in by_user {
            indexes.sort_unstable_by(|a, b| b.cmp(a));
            indexes.dedup();
            if let Some(bucket) = self.pads.get_mut(&user) {
                for index in &indexes {
                    bucket.remove(*index);
                }
            }
            self.refresh_index_mac(user)?;
            tracing::debug!(%user, removed = indexes.len(), "deleted consumed pads");
        }

        verify_all_indexes(&self.mac_keys, &self.pads, &self.index_macs)?;
        self.save()
    }

    /// Write the current inventory through the persistence slot
    pub fn save(&mut self) -> Result<()> {
        self.persistence.save(&self.pads, &self.index_macs)
    }

    /// Drop every pad and destroy the persisted copy
    pub fn wipe(&mut self) -> Result<()> {
        self.pads.clear();
        self.index_macs.clear();
        tracing::warn!("pad store wiped");
        self.persistence.wipe()
    }
}

/// In-memory slot, holding the last saved snapshot
#[derive(Default)]
pub struct MemoryStore {
    pub snapshot: Option<(PadInventory, IndexMacs)>,
    pub rng_nonce: u64,
    pub saves: usize,
    /// Make the next save fail, for exercising crash paths
    pub fail_next_save: bool,
}

impl PadPersistence for MemoryStore {
    fn save(&mut self, pads: &PadInventory, index_macs: &IndexMacs) -> Result<()> {
        if std::mem::take(&mut self.fail_next_save) {
            return Err(JerichoError::Io(std::io::Error::other("simulated save failure")));
        }
        self.snapshot = Some((pads.clone(), index_macs.clone()));
        self.saves += 1;
        Ok(())
    }

    fn wipe(&mut self) -> Result<()> {
        self.snapshot = None;
        Ok(())
    }

    fn set_rng_nonce(&mut self, nonce: u64) {
        self.rng_nonce = nonce;
    }
}
