//! The encrypted pad database document.
//!
//! A database is exported once per group member. Every member's file holds the
//! same sealed working keys and pads; only the sealed info differs (own
//! callsign and a personal failsafe RNG key). Import checks everything before
//! returning anything: keys, info, every pad, then every index MAC. A single
//! failure rejects the whole file.

use crate::cascade::at_rest::{open_info, open_pad, seal_info, seal_pad, SealedBlob, SealedPad};
use crate::cascade::kdf::{
    cascade_pbkdf, KdfParams, DEFAULT_KECCAK_ITERATIONS, DEFAULT_SKEIN_ITERATIONS, SALT_SIZE,
};
use crate::cascade::keys::{DatabaseKeys, SealedKeys};
use crate::error::{FatalError, JerichoError, Result};
use crate::network::{GroupIdentifier, GroupKeys};
use crate::pad::store::{
    compute_index_macs, verify_all_indexes, IndexMacs, PadInventory, PadPersistence, PadStore,
};
use crate::pad::{OneTimePad, PadIdentifier};
use crate::primitives::SALSA_KEY_SIZE;
use crate::rng::FailsafeRng;
use crate::user::Callsign;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Version written into every exported database
pub const PROGRAM_VERSION: &str = env!("JERICHO_VERSION");

/// Bytes serialized as a lowercase hex string
#[derive(Clone, PartialEq, Eq, Default)]
pub struct HexBytes(pub Vec<u8>);

impl HexBytes {
    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for HexBytes {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl fmt::Debug for HexBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HexBytes({} bytes)", self.0.len())
    }
}

impl Serialize for HexBytes {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(&self.0))
    }
}

impl<'de> Deserialize<'de> for HexBytes {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(&s).map(HexBytes).map_err(serde::de::Error::custom)
    }
}

/// Group and per-member settings, stored encrypted inside the database
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PadInfo {
    pub server_address_and_port: String,
    pub server_group_identifier: HexBytes,
    pub server_group_key: HexBytes,
    pub user: Callsign,
    pub user_nicknames: BTreeMap<Callsign, String>,
    pub failsafe_rng_key: HexBytes,
    pub failsafe_rng_nonce: u64,
}

impl fmt::Debug for PadInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PadInfo")
            .field("server_address_and_port", &self.server_address_and_port)
            .field("user", &self.user)
            .field("user_nicknames", &self.user_nicknames)
            .field("failsafe_rng_nonce", &self.failsafe_rng_nonce)
            .finish_non_exhaustive()
    }
}

impl PadInfo {
    /// Failsafe RNG keyed from this member's stored key and position
    pub fn failsafe_rng(&self) -> Result<FailsafeRng> {
        let key: [u8; SALSA_KEY_SIZE] =
            self.failsafe_rng_key.as_slice().try_into().map_err(|_| {
                JerichoError::InvalidConfig(format!(
                    "failsafe RNG key must be {} bytes, got {}",
                    SALSA_KEY_SIZE,
                    self.failsafe_rng_key.0.len()
                ))
            })?;
        Ok(FailsafeRng::new(key, self.failsafe_rng_nonce))
    }

    pub fn group_keys(&self) -> Result<GroupKeys> {
        let identifier = GroupIdentifier::from_slice(self.server_group_identifier.as_slice())?;
        GroupKeys::derive(identifier, self.server_group_key.as_slice())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CryptoSection {
    pub keys: HexBytes,
    pub keys_mac: HexBytes,
    /// Absent when the salt was exported as a separate keyfile
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pbkdf_salt: Option<HexBytes>,
    /// Absent when the iterations must be entered at unlock time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pbkdf_keccak_iterations: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pbkdf_skein_iterations: Option<u32>,
    pub pad_index_macs: BTreeMap<Callsign, HexBytes>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InfoSection {
    pub info: HexBytes,
    pub mac: HexBytes,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredPad {
    pub pad_num: u64,
    pub pad_identifier: HexBytes,
    pub pad: HexBytes,
    pub mac: HexBytes,
}

impl StoredPad {
    fn from_sealed(sealed: SealedPad) -> Self {
        Self {
            pad_num: sealed.pad_number,
            pad_identifier: HexBytes(sealed.identifier.as_bytes().to_vec()),
            pad: HexBytes(sealed.ciphertext),
            mac: HexBytes(sealed.mac),
        }
    }

    fn to_sealed(&self) -> Result<SealedPad> {
        Ok(SealedPad {
            pad_number: self.pad_num,
            identifier: PadIdentifier::from_slice(self.pad_identifier.as_slice())?,
            ciphertext: self.pad.0.clone(),
            mac: self.mac.0.clone(),
        })
    }
}

/// The exported JSON document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PadDatabase {
    pub program_version: String,
    pub crypto: CryptoSection,
    pub info: InfoSection,
    pub pads: BTreeMap<Callsign, Vec<StoredPad>>,
}

/// Settings chosen when exporting or re-keying a database
#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub keccak_iterations: u32,
    pub skein_iterations: u32,
    /// Store the iteration counts in the file
    pub store_iterations: bool,
    /// Hand the salt back as a keyfile instead of storing it in the file
    pub separate_keyfile: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            keccak_iterations: DEFAULT_KECCAK_ITERATIONS,
            skein_iterations: DEFAULT_SKEIN_ITERATIONS,
            store_iterations: true,
            separate_keyfile: false,
        }
    }
}

/// Values supplied at unlock time for anything not stored in the file
#[derive(Debug, Clone, Default)]
pub struct UnlockOptions {
    pub keyfile: Option<Vec<u8>>,
    pub keccak_iterations: Option<u32>,
    pub skein_iterations: Option<u32>,
}

/// Group-wide settings for a new export
#[derive(Debug, Clone)]
pub struct GroupSetup {
    pub server_address_and_port: String,
    pub group_identifier: GroupIdentifier,
    pub group_key: Vec<u8>,
    pub user_nicknames: BTreeMap<Callsign, String>,
}

/// One database per member plus the keyfile, if it was kept separate
#[derive(Debug, Clone)]
pub struct GroupExport {
    pub databases: BTreeMap<Callsign, PadDatabase>,
    pub keyfile: Option<HexBytes>,
}

fn seal_all_pads(
    keys: &DatabaseKeys,
    pads: &PadInventory,
) -> Result<BTreeMap<Callsign, Vec<StoredPad>>> {
    std::thread::scope(|scope| {
        let workers: Vec<_> = pads
            .iter()
            .map(|(user, bucket)| {
                let user = *user;
                let handle = scope.spawn(move || -> Result<Vec<StoredPad>> {
                    let mut stored = Vec::with_capacity(bucket.len());
                    for pad in bucket {
                        stored.push(StoredPad::from_sealed(seal_pad(keys, user, pad)?));
                    }
                    Ok(stored)
                });
                (user, handle)
            })
            .collect();

        let mut sealed = BTreeMap::new();
        for (user, handle) in workers {
            let bucket = handle.join().map_err(|_| {
                JerichoError::InvalidPad(format!("sealing pads for {} panicked", user))
            })??;
            sealed.insert(user, bucket);
        }
        Ok(sealed)
    })
}

fn open_all_pads(
    keys: &DatabaseKeys,
    stored: &BTreeMap<Callsign, Vec<StoredPad>>,
) -> Result<PadInventory> {
    std::thread::scope(|scope| {
        let workers: Vec<_> = stored
            .iter()
            .map(|(user, bucket)| {
                let user = *user;
                let handle = scope.spawn(move || -> Result<Vec<OneTimePad>> {
                    let mut pads = Vec::with_capacity(bucket.len());
                    for entry in bucket {
                        pads.push(open_pad(keys, user, &entry.to_sealed()?)?);
                    }
                    Ok(pads)
                });
                (user, handle)
            })
            .collect();

        let mut inventory = PadInventory::new();
        for (user, handle) in workers {
            let bucket = handle.join().map_err(|_| {
                JerichoError::InvalidPad(format!("opening pads for {} panicked", user))
            })??;
            inventory.insert(user, bucket);
        }
        Ok(inventory)
    })
}

fn random_salt<R: RngCore + CryptoRng + ?Sized>(rng: &mut R) -> Result<Vec<u8>> {
    let mut salt = vec![0u8; SALT_SIZE];
    rng.try_fill_bytes(&mut salt)
        .map_err(|e| FatalError::EntropySource(e.to_string()))?;
    Ok(salt)
}

/// Everything in a database except the pads themselves
pub struct DatabaseHeader {
    pub program_version: String,
    keys: DatabaseKeys,
    sealed_keys: SealedKeys,
    kdf: KdfParams,
    store_salt: bool,
    store_iterations: bool,
    pub info: PadInfo,
}

impl fmt::Debug for DatabaseHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseHeader")
            .field("program_version", &self.program_version)
            .field("info", &self.info)
            .finish_non_exhaustive()
    }
}

impl DatabaseHeader {
    pub fn keys(&self) -> &DatabaseKeys {
        &self.keys
    }

    pub fn kdf(&self) -> &KdfParams {
        &self.kdf
    }

    /// Seal `pads` and the info and build the full document
    pub fn assemble(&self, pads: &PadInventory, index_macs: &IndexMacs) -> Result<PadDatabase> {
        let info = seal_info(&self.keys, &self.info)?;
        Ok(PadDatabase {
            program_version: self.program_version.clone(),
            crypto: CryptoSection {
                keys: HexBytes(self.sealed_keys.ciphertext.clone()),
                keys_mac: HexBytes(self.sealed_keys.mac.clone()),
                pbkdf_salt: self.store_salt.then(|| HexBytes(self.kdf.salt.clone())),
                pbkdf_keccak_iterations: self
                    .store_iterations
                    .then_some(self.kdf.keccak_iterations),
                pbkdf_skein_iterations: self
                    .store_iterations
                    .then_some(self.kdf.skein_iterations),
                pad_index_macs: index_macs
                    .iter()
                    .map(|(user, mac)| (*user, HexBytes(mac.clone())))
                    .collect(),
            },
            info: InfoSection {
                info: HexBytes(info.ciphertext),
                mac: HexBytes(info.mac),
            },
            pads: seal_all_pads(&self.keys, pads)?,
        })
    }

    /// Re-seal the working keys under a new passphrase and salt. Pads keep
    /// their existing encryption.
    pub fn change_passphrase<R: RngCore + CryptoRng + ?Sized>(
        &mut self,
        passphrase: &str,
        options: &ExportOptions,
        rng: &mut R,
    ) -> Result<()> {
        let kdf = KdfParams {
            salt: random_salt(rng)?,
            keccak_iterations: options.keccak_iterations,
            skein_iterations: options.skein_iterations,
        };
        let master = cascade_pbkdf(passphrase, &kdf)?;
        self.sealed_keys = self.keys.seal(&master)?;
        self.kdf = kdf;
        self.store_salt = !options.separate_keyfile;
        self.store_iterations = options.store_iterations;
        tracing::info!("database passphrase changed");
        Ok(())
    }
}

/// A database after successful import
#[derive(Debug)]
pub struct UnlockedDatabase {
    pub header: DatabaseHeader,
    pub pads: PadInventory,
    pub index_macs: IndexMacs,
}

impl UnlockedDatabase {
    pub fn to_database(&self) -> Result<PadDatabase> {
        self.header.assemble(&self.pads, &self.index_macs)
    }

    /// Hand the inventory to a [`PadStore`] that writes through to `file`
    pub fn into_store(self, file: FileStore) -> Result<PadStore<EncryptedFile>> {
        let mac_keys = self.header.keys.mac.clone();
        let persistence = EncryptedFile {
            file,
            header: self.header,
        };
        PadStore::open(mac_keys, self.pads, self.index_macs, persistence)
    }
}

impl PadDatabase {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    fn kdf_params(&self, options: &UnlockOptions) -> Result<KdfParams> {
        let salt = match (&self.crypto.pbkdf_salt, &options.keyfile) {
            (Some(salt), _) => salt.0.clone(),
            (None, Some(keyfile)) => keyfile.clone(),
            (None, None) => {
                return Err(JerichoError::InvalidConfig(
                    "database has no PBKDF salt; supply the keyfile".into(),
                ))
            }
        };
        let keccak_iterations = self
            .crypto
            .pbkdf_keccak_iterations
            .or(options.keccak_iterations)
            .ok_or_else(|| JerichoError::InvalidConfig("Keccak PBKDF iterations required".into()))?;
        let skein_iterations = self
            .crypto
            .pbkdf_skein_iterations
            .or(options.skein_iterations)
            .ok_or_else(|| JerichoError::InvalidConfig("Skein PBKDF iterations required".into()))?;

        Ok(KdfParams {
            salt,
            keccak_iterations,
            skein_iterations,
        })
    }

    /// Derive the master key, then verify and decrypt keys, info, pads and
    /// index MACs in that order
    pub fn unlock(&self, passphrase: &str, options: &UnlockOptions) -> Result<UnlockedDatabase> {
        let kdf = self.kdf_params(options)?;
        let master = cascade_pbkdf(passphrase, &kdf)?;

        let sealed_keys = SealedKeys {
            ciphertext: self.crypto.keys.0.clone(),
            mac: self.crypto.keys_mac.0.clone(),
        };
        let keys = sealed_keys.open(&master)?;

        let info: PadInfo = open_info(
            &keys,
            &SealedBlob {
                ciphertext: self.info.info.0.clone(),
                mac: self.info.mac.0.clone(),
            },
        )?;

        let pads = open_all_pads(&keys, &self.pads)?;
        let index_macs: IndexMacs = self
            .crypto
            .pad_index_macs
            .iter()
            .map(|(user, mac)| (*user, mac.0.clone()))
            .collect();
        verify_all_indexes(&keys.mac, &pads, &index_macs)?;

        tracing::debug!(
            user = %info.user,
            buckets = pads.len(),
            pads = pads.values().map(Vec::len).sum::<usize>(),
            "database unlocked"
        );

        Ok(UnlockedDatabase {
            header: DatabaseHeader {
                program_version: self.program_version.clone(),
                keys,
                sealed_keys,
                kdf,
                store_salt: self.crypto.pbkdf_salt.is_some(),
                store_iterations: self.crypto.pbkdf_keccak_iterations.is_some(),
                info,
            },
            pads,
            index_macs,
        })
    }
}

/// Encrypt `pads` under fresh working keys and produce one database per
/// member in `setup.user_nicknames`
pub fn export_group<R: RngCore + CryptoRng + ?Sized>(
    passphrase: &str,
    setup: &GroupSetup,
    pads: &PadInventory,
    options: &ExportOptions,
    rng: &mut R,
) -> Result<GroupExport> {
    if setup.user_nicknames.is_empty() {
        return Err(JerichoError::InvalidConfig("group has no members".into()));
    }
    for user in setup.user_nicknames.keys() {
        if !pads.contains_key(user) {
            return Err(JerichoError::InvalidConfig(format!("no pads generated for {}", user)));
        }
    }
    // Fails early on a malformed group key
    GroupKeys::derive(setup.group_identifier, &setup.group_key)?;

    let kdf = KdfParams {
        salt: random_salt(rng)?,
        keccak_iterations: options.keccak_iterations,
        skein_iterations: options.skein_iterations,
    };
    let master = cascade_pbkdf(passphrase, &kdf)?;
    let keys = DatabaseKeys::generate(rng)?;
    let sealed_keys = keys.seal(&master)?;
    let index_macs = compute_index_macs(&keys.mac, pads)?;

    let mut header = DatabaseHeader {
        program_version: PROGRAM_VERSION.to_string(),
        keys,
        sealed_keys,
        kdf,
        store_salt: !options.separate_keyfile,
        store_iterations: options.store_iterations,
        info: PadInfo {
            server_address_and_port: setup.server_address_and_port.clone(),
            server_group_identifier: HexBytes(setup.group_identifier.as_bytes().to_vec()),
            server_group_key: HexBytes(setup.group_key.clone()),
            user: Callsign::Alpha,
            user_nicknames: setup.user_nicknames.clone(),
            failsafe_rng_key: HexBytes::default(),
            failsafe_rng_nonce: 0,
        },
    };

    let template = header.assemble(pads, &index_macs)?;
    let mut databases = BTreeMap::new();
    for user in setup.user_nicknames.keys() {
        let mut failsafe_key = vec![0u8; SALSA_KEY_SIZE];
        rng.try_fill_bytes(&mut failsafe_key)
            .map_err(|e| FatalError::EntropySource(e.to_string()))?;
        header.info.user = *user;
        header.info.failsafe_rng_key = HexBytes(failsafe_key);

        let sealed = seal_info(&header.keys, &header.info)?;
        let mut database = template.clone();
        database.info = InfoSection {
            info: HexBytes(sealed.ciphertext),
            mac: HexBytes(sealed.mac),
        };
        databases.insert(*user, database);
    }

    tracing::info!(members = databases.len(), "exported pad databases");
    Ok(GroupExport {
        databases,
        keyfile: options.separate_keyfile.then(|| HexBytes(header.kdf.salt.clone())),
    })
}

/// A database file on disk. Writes go to a sibling temporary file that is
/// then renamed over the original.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    pub fn load(&self) -> Result<PadDatabase> {
        let json = std::fs::read_to_string(&self.path)?;
        PadDatabase::from_json(&json)
    }

    pub fn save(&self, database: &PadDatabase) -> Result<()> {
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, database.to_json()?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    pub fn remove(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Persistence slot that re-seals the inventory into a [`FileStore`]
#[derive(Debug)]
pub struct EncryptedFile {
    file: FileStore,
    header: DatabaseHeader,
}

impl EncryptedFile {
    pub fn info(&self) -> &PadInfo {
        &self.header.info
    }

    pub fn file(&self) -> &FileStore {
        &self.file
    }
}

impl PadPersistence for EncryptedFile {
    fn save(&mut self, pads: &PadInventory, index_macs: &IndexMacs) -> Result<()> {
        let database = self.header.assemble(pads, index_macs)?;
        self.file.save(&database)
    }

    fn wipe(&mut self) -> Result<()> {
        self.file.remove()
    }

    fn set_rng_nonce(&mut self, nonce: u64) {
        self.header.info.failsafe_rng_nonce = nonce;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pad::PAD_SIZE;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use tempfile::tempdir;

    const PASSPHRASE: &str = "cascade of two";

    fn options() -> ExportOptions {
        ExportOptions {
            keccak_iterations: 2,
            skein_iterations: 3,
            ..ExportOptions::default()
        }
    }

    fn inventory(rng: &mut StdRng) -> PadInventory {
        let mut pads = PadInventory::new();
        let mut number = 0;
        for user in [Callsign::Alpha, Callsign::Bravo, Callsign::Charlie] {
            let mut bucket = Vec::new();
            for _ in 0..4 {
                let mut bytes = [0u8; PAD_SIZE];
                rng.fill_bytes(&mut bytes);
                bucket.push(OneTimePad::new(number, bytes).unwrap());
                number += 1;
            }
            pads.insert(user, bucket);
        }
        pads
    }

    fn setup() -> GroupSetup {
        let mut user_nicknames = BTreeMap::new();
        user_nicknames.insert(Callsign::Alpha, "Ann".to_string());
        user_nicknames.insert(Callsign::Bravo, "Bo".to_string());
        user_nicknames.insert(Callsign::Charlie, "Cy".to_string());
        GroupSetup {
            server_address_and_port: "https://relay.example:8443".into(),
            group_identifier: GroupIdentifier::from_bytes([1, 2, 3, 4, 5, 6, 7, 8]),
            group_key: vec![9u8; 64],
            user_nicknames,
        }
    }

    fn export(rng: &mut StdRng, options: &ExportOptions) -> (PadInventory, GroupExport) {
        let pads = inventory(rng);
        let export = export_group(PASSPHRASE, &setup(), &pads, options, rng).unwrap();
        (pads, export)
    }

    #[test]
    fn test_export_import_roundtrip() {
        let mut rng = StdRng::seed_from_u64(1);
        let (pads, export) = export(&mut rng, &options());
        assert_eq!(export.databases.len(), 3);
        assert!(export.keyfile.is_none());

        let unlocked = export.databases[&Callsign::Bravo]
            .unlock(PASSPHRASE, &UnlockOptions::default())
            .unwrap();
        assert_eq!(unlocked.pads, pads);
        assert_eq!(unlocked.header.info.user, Callsign::Bravo);
        assert_eq!(unlocked.header.info.user_nicknames[&Callsign::Charlie], "Cy");
        assert_eq!(unlocked.header.info.server_group_key.0, vec![9u8; 64]);
        assert_eq!(unlocked.header.info.failsafe_rng_key.0.len(), SALSA_KEY_SIZE);
    }

    #[test]
    fn test_members_get_distinct_failsafe_keys() {
        let mut rng = StdRng::seed_from_u64(2);
        let (_, export) = export(&mut rng, &options());
        let alpha = &export.databases[&Callsign::Alpha];
        let bravo = &export.databases[&Callsign::Bravo];
        let a = alpha.unlock(PASSPHRASE, &UnlockOptions::default()).unwrap();
        let b = bravo.unlock(PASSPHRASE, &UnlockOptions::default()).unwrap();
        assert_ne!(a.header.info.failsafe_rng_key, b.header.info.failsafe_rng_key);
        assert_eq!(alpha.pads, bravo.pads);
    }

    #[test]
    fn test_wrong_passphrase_rejected() {
        let mut rng = StdRng::seed_from_u64(3);
        let (_, export) = export(&mut rng, &options());
        let err = export.databases[&Callsign::Alpha]
            .unlock("wrong", &UnlockOptions::default())
            .unwrap_err();
        assert!(err.is_tamper());
    }

    #[test]
    fn test_any_tampered_pad_rejects_database() {
        let mut rng = StdRng::seed_from_u64(4);
        let (_, export) = export(&mut rng, &options());
        let mut database = export.databases[&Callsign::Alpha].clone();
        database.pads.get_mut(&Callsign::Charlie).unwrap()[2].pad.0[50] ^= 1;
        assert!(database.unlock(PASSPHRASE, &UnlockOptions::default()).unwrap_err().is_tamper());
    }

    #[test]
    fn test_moved_pad_rejects_database() {
        let mut rng = StdRng::seed_from_u64(5);
        let (_, export) = export(&mut rng, &options());
        let mut database = export.databases[&Callsign::Alpha].clone();
        let moved = database.pads.get_mut(&Callsign::Bravo).unwrap().remove(0);
        database.pads.get_mut(&Callsign::Alpha).unwrap().push(moved);
        assert!(database.unlock(PASSPHRASE, &UnlockOptions::default()).is_err());
    }

    #[test]
    fn test_dropped_pad_fails_index_check() {
        let mut rng = StdRng::seed_from_u64(6);
        let (_, export) = export(&mut rng, &options());
        let mut database = export.databases[&Callsign::Alpha].clone();
        database.pads.get_mut(&Callsign::Bravo).unwrap().remove(1);
        let err = database.unlock(PASSPHRASE, &UnlockOptions::default()).unwrap_err();
        assert!(matches!(err, JerichoError::IndexIntegrityFailed(Callsign::Bravo)));
    }

    #[test]
    fn test_separate_keyfile_and_iterations() {
        let mut rng = StdRng::seed_from_u64(7);
        let opts = ExportOptions {
            store_iterations: false,
            separate_keyfile: true,
            ..options()
        };
        let (_, export) = export(&mut rng, &opts);
        let keyfile = export.keyfile.clone().unwrap();
        let database = &export.databases[&Callsign::Alpha];
        assert!(database.crypto.pbkdf_salt.is_none());
        assert!(database.crypto.pbkdf_keccak_iterations.is_none());

        assert!(database.unlock(PASSPHRASE, &UnlockOptions::default()).is_err());
        let unlock = UnlockOptions {
            keyfile: Some(keyfile.0),
            keccak_iterations: Some(2),
            skein_iterations: Some(3),
        };
        database.unlock(PASSPHRASE, &unlock).unwrap();
    }

    #[test]
    fn test_change_passphrase_keeps_pads() {
        let mut rng = StdRng::seed_from_u64(8);
        let (_, export) = export(&mut rng, &options());
        let original = &export.databases[&Callsign::Alpha];
        let mut unlocked = original.unlock(PASSPHRASE, &UnlockOptions::default()).unwrap();
        unlocked
            .header
            .change_passphrase("new passphrase", &options(), &mut rng)
            .unwrap();

        let rekeyed = unlocked.to_database().unwrap();
        assert_eq!(rekeyed.pads, original.pads);
        assert_ne!(rekeyed.crypto.keys, original.crypto.keys);
        assert!(rekeyed.unlock(PASSPHRASE, &UnlockOptions::default()).is_err());
        rekeyed.unlock("new passphrase", &UnlockOptions::default()).unwrap();
    }

    #[test]
    fn test_json_field_names() {
        let mut rng = StdRng::seed_from_u64(9);
        let (_, export) = export(&mut rng, &options());
        let json = export.databases[&Callsign::Alpha].to_json().unwrap();
        let fields = [
            "programVersion",
            "keysMac",
            "pbkdfSalt",
            "padIndexMacs",
            "padNum",
            "padIdentifier",
        ];
        for field in fields {
            assert!(json.contains(field), "missing {}", field);
        }
        let parsed = PadDatabase::from_json(&json).unwrap();
        assert_eq!(parsed, export.databases[&Callsign::Alpha]);
    }

    #[test]
    fn test_file_store_persists_consumption() {
        let dir = tempdir().unwrap();
        let mut rng = StdRng::seed_from_u64(10);
        let (pads, export) = export(&mut rng, &options());
        let file = FileStore::new(dir.path().join("pads.json"));
        file.save(&export.databases[&Callsign::Alpha]).unwrap();

        let unlocked = file
            .load()
            .unwrap()
            .unlock(PASSPHRASE, &UnlockOptions::default())
            .unwrap();
        let mut store = unlocked.into_store(file.clone()).unwrap();
        let pad = store.allocate_for_sending(Callsign::Alpha).unwrap();
        assert_eq!(&pad, &pads[&Callsign::Alpha][0]);
        store.persistence_mut().set_rng_nonce(17);
        store.save().unwrap();

        let reloaded = file
            .load()
            .unwrap()
            .unlock(PASSPHRASE, &UnlockOptions::default())
            .unwrap();
        assert_eq!(reloaded.pads[&Callsign::Alpha].len(), 3);
        assert_eq!(reloaded.header.info.failsafe_rng_nonce, 17);

        store.wipe().unwrap();
        assert!(!file.exists());
    }

    #[test]
    fn test_export_validation() {
        let mut rng = StdRng::seed_from_u64(11);
        let pads = inventory(&mut rng);

        let mut bad = setup();
        bad.user_nicknames.insert(Callsign::Golf, "Gus".into());
        assert!(export_group(PASSPHRASE, &bad, &pads, &options(), &mut rng).is_err());

        let mut bad = setup();
        bad.group_key = vec![1u8; 10];
        assert!(export_group(PASSPHRASE, &bad, &pads, &options(), &mut rng).is_err());
    }
}
