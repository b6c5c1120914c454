use std::error::Error;
use std::fs;
use std::process::{Command, Output};
use tempfile::tempdir;

const PAD_HEX_BYTE: &str = "5e";

fn jericho_command() -> Command {
    Command::new(env!("CARGO_BIN_EXE_jericho"))
}

fn run(args: &[&str]) -> Result<Output, Box<dyn Error>> {
    Ok(jericho_command().args(args).output()?)
}

fn pad_hex() -> String {
    PAD_HEX_BYTE.repeat(192)
}

#[test]
fn version_flag_prints_build_information() -> Result<(), Box<dyn Error>> {
    let output = run(&["--version"])?;
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout)?;
    assert!(stdout.starts_with("jericho "), "unexpected version line: {}", stdout);
    assert!(stdout.contains("build"), "version output should include build value: {}", stdout);
    Ok(())
}

#[test]
fn running_without_subcommand_displays_help() -> Result<(), Box<dyn Error>> {
    let output = jericho_command().output()?;
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout)?;
    assert!(stdout.contains("encrypt"));
    assert!(stdout.contains("passphrase"));
    Ok(())
}

#[test]
fn encrypt_then_decrypt() -> Result<(), Box<dyn Error>> {
    let pad = pad_hex();
    let encrypted = run(&[
        "encrypt",
        "--pad",
        &pad,
        "--timestamp",
        "1600000000",
        "hello from alpha",
    ])?;
    assert!(
        encrypted.status.success(),
        "encrypt command failed: {}",
        String::from_utf8_lossy(&encrypted.stderr)
    );
    let packet = String::from_utf8(encrypted.stdout)?.trim().to_string();
    assert_eq!(packet.len(), 192 * 2);

    let decrypted = run(&["decrypt", "--pad", &pad, &packet])?;
    assert!(
        decrypted.status.success(),
        "decrypt command failed: {}",
        String::from_utf8_lossy(&decrypted.stderr)
    );
    let stdout = String::from_utf8(decrypted.stdout)?;
    assert!(stdout.contains("Message: hello from alpha"));
    assert!(stdout.contains("Timestamp: 1600000000"));
    Ok(())
}

#[test]
fn decrypt_rejects_tampered_packet() -> Result<(), Box<dyn Error>> {
    let pad = pad_hex();
    let encrypted = run(&["encrypt", "--pad", &pad, "secret"])?;
    let mut packet = String::from_utf8(encrypted.stdout)?.trim().to_string();
    // Flip a nibble inside the message ciphertext
    let flipped = if &packet[30..31] == "0" { "1" } else { "0" };
    packet.replace_range(30..31, flipped);

    let decrypted = run(&["decrypt", "--pad", &pad, &packet])?;
    assert!(!decrypted.status.success());
    assert!(String::from_utf8(decrypted.stderr)?.contains("Error:"));
    Ok(())
}

#[test]
fn encrypt_rejects_long_message() -> Result<(), Box<dyn Error>> {
    let long = "x".repeat(116);
    let output = run(&["encrypt", "--pad", &pad_hex(), &long])?;
    assert!(!output.status.success());
    Ok(())
}

#[test]
fn passphrase_checksum_is_repeatable() -> Result<(), Box<dyn Error>> {
    let salt = "ab".repeat(192);
    let args = [
        "passphrase",
        "--keccak-iterations",
        "3",
        "--skein-iterations",
        "3",
        "--salt",
        &salt,
        "a long shared passphrase",
    ];
    let first = String::from_utf8(run(&args)?.stdout)?;
    let second = String::from_utf8(run(&args)?.stdout)?;
    assert!(first.contains("Strength:"));
    assert!(first.contains("Checksum:"));
    assert_eq!(first, second);
    Ok(())
}

#[test]
fn info_reports_missing_and_unreadable_files() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let missing = dir.path().join("missing.json");
    let output = run(&["info", "--passphrase", "pw", missing.to_str().unwrap()])?;
    assert!(!output.status.success());

    let garbage = dir.path().join("garbage.json");
    fs::write(&garbage, b"{ not json")?;
    let output = run(&["info", "--passphrase", "pw", garbage.to_str().unwrap()])?;
    assert!(!output.status.success());
    assert!(String::from_utf8(output.stderr)?.contains("JSON"));
    Ok(())
}

#[test]
fn info_unlocks_exported_database() -> Result<(), Box<dyn Error>> {
    use jericho::database::{export_group, ExportOptions, GroupSetup};
    use jericho::network::GroupIdentifier;
    use jericho::pad::store::PadInventory;
    use jericho::{Callsign, FileStore, OneTimePad};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::BTreeMap;

    let dir = tempdir()?;
    let path = dir.path().join("bravo.json");

    let mut pads = PadInventory::new();
    for (n, user) in [Callsign::Alpha, Callsign::Bravo].into_iter().enumerate() {
        pads.insert(user, vec![OneTimePad::new(n as u64, [n as u8 + 1; 192])?]);
    }
    let setup = GroupSetup {
        server_address_and_port: "relay.test:8443".into(),
        group_identifier: GroupIdentifier::from_bytes([1; 8]),
        group_key: vec![2; 64],
        user_nicknames: BTreeMap::from([
            (Callsign::Alpha, "A".into()),
            (Callsign::Bravo, "B".into()),
        ]),
    };
    let options = ExportOptions {
        keccak_iterations: 4,
        skein_iterations: 4,
        ..ExportOptions::default()
    };
    let mut rng = StdRng::seed_from_u64(3);
    let export = export_group("open sesame", &setup, &pads, &options, &mut rng)?;
    FileStore::new(&path).save(&export.databases[&Callsign::Bravo])?;

    let output = run(&["info", "--passphrase", "open sesame", path.to_str().unwrap()])?;
    assert!(
        output.status.success(),
        "info command failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8(output.stdout)?;
    assert!(stdout.contains("User: bravo (B)"));
    assert!(stdout.contains("Server: relay.test:8443"));
    assert!(stdout.contains("Total: 2"));

    let wrong = run(&["info", "--passphrase", "closed", path.to_str().unwrap()])?;
    assert!(!wrong.status.success());
    Ok(())
}
