use clap::{Parser, Subcommand};
use jericho::cli::{
    analyse_passphrase, decrypt_with_pad, encrypt_with_pad, show_database_info, EncryptOptions,
    PassphraseOptions,
};
use jericho::UnlockOptions;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Version info from build.rs
const VERSION: &str = env!("JERICHO_VERSION");
const BUILD: &str = env!("JERICHO_BUILD");
const PROFILE: &str = env!("JERICHO_PROFILE");
const GIT_HASH: &str = env!("JERICHO_GIT_HASH");

fn get_version() -> &'static str {
    use std::sync::OnceLock;
    static VERSION_STRING: OnceLock<String> = OnceLock::new();
    VERSION_STRING
        .get_or_init(|| format!("{} {} build {} ({})", PROFILE, VERSION, BUILD, GIT_HASH))
}

#[derive(Parser)]
#[command(name = "jericho")]
#[command(author, about = "One-time pad messaging engine", long_about = None)]
struct Cli {
    /// Print version
    #[arg(short = 'V', long)]
    version: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Encrypt one message with a pad
    #[command(alias = "e")]
    Encrypt {
        /// Pad as hex
        #[arg(long, required = true)]
        pad: String,

        /// Message timestamp in seconds since the epoch (defaults to now)
        #[arg(long)]
        timestamp: Option<u64>,

        /// Message text, up to 115 bytes
        message: String,
    },

    /// Verify and decrypt one packet with its pad
    #[command(alias = "d")]
    Decrypt {
        /// Pad as hex
        #[arg(long, required = true)]
        pad: String,

        /// Packet as hex
        packet: String,
    },

    /// Unlock a pad database and show its contents
    #[command(alias = "i")]
    Info {
        /// Database passphrase
        #[arg(long, required = true)]
        passphrase: String,

        /// Keyfile holding the PBKDF salt as hex, if kept apart from the database
        #[arg(long)]
        keyfile: Option<PathBuf>,

        /// Keccak PBKDF iterations, if not stored in the database
        #[arg(long)]
        keccak_iterations: Option<u32>,

        /// Skein PBKDF iterations, if not stored in the database
        #[arg(long)]
        skein_iterations: Option<u32>,

        /// Database file
        file: PathBuf,
    },

    /// Estimate passphrase strength and print a key checksum
    #[command(alias = "p")]
    Passphrase {
        #[arg(long, default_value = "10000")]
        keccak_iterations: u32,

        #[arg(long, default_value = "10000")]
        skein_iterations: u32,

        /// PBKDF salt as hex (random if omitted)
        #[arg(long)]
        salt: Option<String>,

        passphrase: String,
    },
}

fn read_keyfile(path: Option<PathBuf>) -> jericho::Result<Option<Vec<u8>>> {
    match path {
        Some(path) => {
            let contents = std::fs::read_to_string(path)?;
            Ok(Some(hex::decode(contents.trim())?))
        }
        None => Ok(None),
    }
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if cli.version {
        println!("jericho {}", get_version());
        return ExitCode::SUCCESS;
    }

    let command = match cli.command {
        Some(cmd) => cmd,
        None => {
            use clap::CommandFactory;
            if let Err(e) = Cli::command().print_help() {
                eprintln!("Error: {}", e);
                return ExitCode::FAILURE;
            }
            println!();
            return ExitCode::SUCCESS;
        }
    };

    let result = match command {
        Commands::Encrypt { pad, timestamp, message } => {
            let options = EncryptOptions {
                pad_hex: pad,
                timestamp,
            };
            encrypt_with_pad(&message, &options).map(|packet| println!("{}", packet))
        }

        Commands::Decrypt { pad, packet } => decrypt_with_pad(&packet, &pad).map(|message| {
            println!("Timestamp: {}", message.timestamp);
            println!("Message: {}", message.plaintext);
        }),

        Commands::Info {
            passphrase,
            keyfile,
            keccak_iterations,
            skein_iterations,
            file,
        } => read_keyfile(keyfile).and_then(|keyfile| {
            let options = UnlockOptions {
                keyfile,
                keccak_iterations,
                skein_iterations,
            };
            show_database_info(&file, &passphrase, &options).map(|info| print!("{}", info))
        }),

        Commands::Passphrase {
            keccak_iterations,
            skein_iterations,
            salt,
            passphrase,
        } => salt
            .map(|s| hex::decode(s.trim()))
            .transpose()
            .map_err(jericho::JerichoError::from)
            .and_then(|salt| {
                let options = PassphraseOptions {
                    keccak_iterations,
                    skein_iterations,
                    salt,
                };
                analyse_passphrase(&passphrase, &options).map(|report| print!("{}", report))
            }),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
