//! cpost: CipherPost command-line client
//!
//! Commands:
//!   send <file> --conversation <id>   - encrypt and upload an attachment
//!   recv <descriptor> [--out <dir>]   - download and decrypt an attachment
//!   key ensure <id>                   - create the conversation key if absent
//!   key fingerprint <id>              - show a comparable key fingerprint
//!   key export <id> / key import <f>  - out-of-band key exchange
//!   config show                       - display effective configuration
//!
//! Storage credentials are read from AWS_ACCESS_KEY_ID and
//! AWS_SECRET_ACCESS_KEY environment variables.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use tracing::info;

use cpost_core::config::PostConfig;
use cpost_core::types::{TransferDirection, TransferStage};
use cpost_keystore::{FileKeyStore, KeyRecord, KeyStore};
use cpost_storage::{build_operator, OpendalStorage, StorageClient};
use cpost_transfer::{TransferPipeline, TransferSession, UploadRequest};

#[derive(Parser, Debug)]
#[command(
    name = "cpost",
    version,
    about = "CipherPost encrypted attachment client",
    long_about = "cpost: exchange end-to-end encrypted file attachments inside a conversation"
)]
struct Cli {
    /// Path to cipherpost.toml configuration file
    #[arg(
        long,
        short = 'c',
        env = "CPOST_CONFIG",
        default_value = "~/.config/cipherpost/cipherpost.toml"
    )]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "CPOST_LOG", default_value = "info")]
    log: String,

    /// Log format (json, text)
    #[arg(long, env = "CPOST_LOG_FORMAT", default_value = "text")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Debug, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Encrypt a file and upload it into a conversation
    Send {
        /// Local file to send
        file: PathBuf,
        /// Conversation identifier shared by both parties
        #[arg(long, short = 'C')]
        conversation: String,
        /// Recipient identity (informational)
        #[arg(long)]
        recipient: Option<String>,
        /// MIME type (default: guessed from the file extension)
        #[arg(long)]
        mime: Option<String>,
        /// Write the attachment descriptor JSON here (default: stdout)
        #[arg(long, short = 'o')]
        descriptor_out: Option<PathBuf>,
    },

    /// Download and decrypt an attachment from its descriptor
    Recv {
        /// Path to the attachment descriptor JSON
        descriptor: PathBuf,
        /// Directory to restore the file into (default: current directory)
        #[arg(long, short = 'o', default_value = ".")]
        out: PathBuf,
    },

    /// Conversation key management
    Key {
        #[command(subcommand)]
        action: KeyAction,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum KeyAction {
    /// Create the key for a conversation if it doesn't exist yet
    Ensure { conversation: String },
    /// Print a short fingerprint both parties can compare out loud
    Fingerprint { conversation: String },
    /// Print the key record for out-of-band transfer to the other party
    ///
    /// The output contains the raw key material. Share it only over an
    /// already-secure channel.
    Export { conversation: String },
    /// Import a key record exported by the other party
    Import { file: PathBuf },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Display the effective configuration
    Show,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log, &cli.log_format);

    let config = PostConfig::load(&expand_tilde(&cli.config))?;
    let keystore = FileKeyStore::open(expand_tilde(&config.keystore.dir))
        .context("opening conversation key store")?;

    match cli.command {
        Commands::Send {
            file,
            conversation,
            recipient,
            mime,
            descriptor_out,
        } => {
            let pipeline = build_pipeline(&config)?;
            let key = keystore.get_or_create_key(&conversation).await?;

            let request = UploadRequest {
                mime_type: mime.unwrap_or_else(|| guess_mime(&file).to_string()),
                path: file,
                file_name: None,
                conversation_id: conversation,
                recipient_id: recipient,
            };

            let session = TransferSession::new(TransferDirection::Upload);
            let bar = spawn_progress_bar(&session);
            let descriptor = pipeline.encrypt_and_upload(&key, &request, &session).await?;
            bar.await.ok();

            let json = descriptor.to_json()?;
            match descriptor_out {
                Some(path) => {
                    std::fs::write(&path, &json)
                        .with_context(|| format!("writing descriptor: {}", path.display()))?;
                    println!("sent. descriptor written to {}", path.display());
                }
                None => println!("{json}"),
            }
        }

        Commands::Recv { descriptor, out } => {
            let json = std::fs::read_to_string(&descriptor)
                .with_context(|| format!("reading descriptor: {}", descriptor.display()))?;
            let descriptor = cpost_core::types::AttachmentDescriptor::from_json(&json)
                .context("parsing attachment descriptor")?;

            let pipeline = build_pipeline(&config)?;
            let key = keystore
                .get_key(&descriptor.sender_conversation_id)
                .await?
                .with_context(|| {
                    format!(
                        "no key for conversation '{}' — import it with `cpost key import`",
                        descriptor.sender_conversation_id
                    )
                })?;

            let session = TransferSession::new(TransferDirection::Download);
            let bar = spawn_progress_bar(&session);
            let restored = pipeline
                .download_and_decrypt(&key, &descriptor, &session)
                .await?;
            bar.await.ok();

            let path = restored.save_to(&out).await?;
            println!("restored {} ({} bytes)", path.display(), restored.bytes.len());
        }

        Commands::Key { action } => match action {
            KeyAction::Ensure { conversation } => {
                let key = keystore.get_or_create_key(&conversation).await?;
                println!(
                    "key ready for '{conversation}' (fingerprint {})",
                    fingerprint(key.as_bytes())
                );
            }
            KeyAction::Fingerprint { conversation } => {
                let key = keystore
                    .get_key(&conversation)
                    .await?
                    .with_context(|| format!("no key for conversation '{conversation}'"))?;
                println!("{}", fingerprint(key.as_bytes()));
            }
            KeyAction::Export { conversation } => {
                let key = keystore
                    .get_key(&conversation)
                    .await?
                    .with_context(|| format!("no key for conversation '{conversation}'"))?;
                let record = KeyRecord::from_key(&key);
                println!("{}", serde_json::to_string_pretty(&record)?);
            }
            KeyAction::Import { file } => {
                let json = std::fs::read_to_string(&file)
                    .with_context(|| format!("reading key record: {}", file.display()))?;
                let record: KeyRecord =
                    serde_json::from_str(&json).context("parsing key record")?;
                let conversation = record.conversation_id.clone();
                let key = record.into_key()?;
                keystore.import_key(&key).await?;
                println!(
                    "imported key for '{conversation}' (fingerprint {})",
                    fingerprint(key.as_bytes())
                );
            }
        },

        Commands::Config { action } => match action {
            ConfigAction::Show => {
                println!("{}", toml::to_string_pretty(&config)?);
            }
        },
    }

    Ok(())
}

fn build_pipeline(config: &PostConfig) -> Result<TransferPipeline<impl StorageClient>> {
    let access_key = std::env::var("AWS_ACCESS_KEY_ID").unwrap_or_default();
    let secret_key = std::env::var("AWS_SECRET_ACCESS_KEY").unwrap_or_default();
    let op = build_operator(&config.storage, &access_key, &secret_key)?;

    let storage = OpendalStorage::new(
        op,
        config.storage.prefix.clone(),
        config.transfer.io_chunk_bytes,
    );
    info!(
        endpoint = %config.storage.endpoint,
        bucket = %config.storage.bucket,
        "storage client ready"
    );
    Ok(TransferPipeline::new(storage, config.transfer.clone()))
}

/// Render session events on a progress bar until the session terminates.
fn spawn_progress_bar(session: &TransferSession) -> tokio::task::JoinHandle<()> {
    let mut rx = session.subscribe();
    tokio::spawn(async move {
        let bar = ProgressBar::new(100);
        bar.set_style(
            ProgressStyle::with_template("{msg:>12} [{bar:40}] {pos:>3}%")
                .expect("static template")
                .progress_chars("=> "),
        );
        while let Ok(event) = rx.recv().await {
            bar.set_message(event.stage.to_string());
            bar.set_position(event.percent as u64);
            match event.stage {
                TransferStage::Complete => {
                    bar.finish_with_message("complete");
                    break;
                }
                TransferStage::Failed => {
                    bar.abandon_with_message(match event.failed_at {
                        Some(stage) => format!("failed during {stage}"),
                        None => "failed".into(),
                    });
                    break;
                }
                _ => {}
            }
        }
    })
}

fn fingerprint(key_bytes: &[u8]) -> String {
    blake3::hash(key_bytes).to_hex().as_str()[..16].to_string()
}

fn guess_mime(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("mp4") => "video/mp4",
        Some("webm") => "video/webm",
        Some("mp3") => "audio/mpeg",
        Some("ogg") => "audio/ogg",
        Some("pdf") => "application/pdf",
        Some("txt") => "text/plain",
        Some("json") => "application/json",
        _ => "application/octet-stream",
    }
}

fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(stripped) = path.strip_prefix("~") {
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home).join(stripped);
        }
    }
    path.to_path_buf()
}

fn init_logging(level: &str, format: &LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json())
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer())
                .init();
        }
    }
}
