use crate::database::{FileStore, UnlockOptions};
use crate::error::Result;
use std::path::Path;

/// Unlock a database file and describe its group and pad inventory
pub fn show_database_info(
    path: &Path,
    passphrase: &str,
    options: &UnlockOptions,
) -> Result<String> {
    let database = FileStore::new(path).load()?;
    let unlocked = database.unlock(passphrase, options)?;
    let info = &unlocked.header.info;

    let mut output = String::new();

    output.push_str("Jericho Pad Database\n");
    output.push_str("====================\n\n");

    output.push_str(&format!("File: {}\n", path.display()));
    output.push_str(&format!("Program version: {}\n", unlocked.header.program_version));
    output.push('\n');

    output.push_str("Group:\n");
    output.push_str(&format!("  Server: {}\n", info.server_address_and_port));
    output.push_str(&format!(
        "  Group identifier: {}\n",
        hex::encode(info.server_group_identifier.as_slice())
    ));
    output.push_str(&format!(
        "  User: {}{}\n",
        info.user,
        nickname(info.user_nicknames.get(&info.user))
    ));
    output.push_str(&format!("  Members: {}\n", info.user_nicknames.len()));
    output.push('\n');

    output.push_str("Pads remaining:\n");
    let mut total = 0;
    for (user, pads) in &unlocked.pads {
        output.push_str(&format!(
            "  {}{}: {}\n",
            user,
            nickname(info.user_nicknames.get(user)),
            pads.len()
        ));
        total += pads.len();
    }
    output.push_str(&format!("  Total: {}\n", total));

    Ok(output)
}

fn nickname(name: Option<&String>) -> String {
    match name {
        Some(name) if !name.is_empty() => format!(" ({})", name),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{export_group, ExportOptions, GroupSetup};
    use crate::network::GroupIdentifier;
    use crate::pad::store::PadInventory;
    use crate::pad::{OneTimePad, PAD_SIZE};
    use crate::user::Callsign;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    #[test]
    fn test_show_info() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("alpha.json");

        let mut pads = PadInventory::new();
        pads.insert(Callsign::Alpha, vec![OneTimePad::new(1, [1; PAD_SIZE]).unwrap()]);
        pads.insert(
            Callsign::Bravo,
            vec![
                OneTimePad::new(2, [2; PAD_SIZE]).unwrap(),
                OneTimePad::new(3, [3; PAD_SIZE]).unwrap(),
            ],
        );
        let setup = GroupSetup {
            server_address_and_port: "relay.test:443".into(),
            group_identifier: GroupIdentifier::from_bytes([4; 8]),
            group_key: vec![5; 64],
            user_nicknames: BTreeMap::from([
                (Callsign::Alpha, "Al".to_string()),
                (Callsign::Bravo, String::new()),
            ]),
        };
        let options = ExportOptions {
            keccak_iterations: 2,
            skein_iterations: 2,
            ..ExportOptions::default()
        };
        let mut rng = StdRng::seed_from_u64(11);
        let export = export_group("pw", &setup, &pads, &options, &mut rng).unwrap();
        FileStore::new(&path).save(&export.databases[&Callsign::Alpha]).unwrap();

        let info = show_database_info(&path, "pw", &UnlockOptions::default()).unwrap();
        assert!(info.contains("Server: relay.test:443"));
        assert!(info.contains("Group identifier: 0404040404040404"));
        assert!(info.contains("User: alpha (Al)"));
        assert!(info.contains("  bravo: 2\n"));
        assert!(info.contains("Total: 3"));
        assert!(!info.contains(&"05".repeat(64)));

        assert!(show_database_info(&path, "wrong", &UnlockOptions::default()).is_err());
    }
}
