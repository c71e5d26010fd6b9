//! SecureComm
//!
//! Command-line entry point for the envelope server and client.

use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use daemon::config::{default_config_path, Config};
use daemon::{EnvelopeServer, GreetingResponder, HttpTransport, MessageBody};
use protocol::{Client, Envelope, EnvelopeCodec, SharedKey};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, reload, EnvFilter, Registry};

/// Handle used to swap the log filter once the configuration is known.
type FilterHandle = reload::Handle<EnvFilter, Registry>;

/// SecureComm - authenticated envelope exchange over HTTP.
#[derive(Parser, Debug)]
#[command(name = "securecomm")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run the HTTP server until interrupted
    Serve,

    /// Send one sealed message to the backend and print the reply
    Send {
        /// Message to send (defaults to client.request_message)
        #[arg(long, short)]
        message: Option<String>,

        /// Backend URL (defaults to client.backend_url)
        #[arg(long, short)]
        url: Option<String>,
    },

    /// Generate a fresh shared key
    Keygen {
        /// Output encoding
        #[arg(long, short, value_enum, default_value = "hex")]
        format: KeyFormat,

        /// Write the key to this file instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Also point [crypto] key_file of the config file at the written key
        #[arg(long, requires = "output")]
        configure: bool,
    },

    /// Seal a message and print the envelope JSON
    Seal {
        /// Plaintext to seal (reads stdin if omitted)
        #[arg(long, short)]
        message: Option<String>,
    },

    /// Open an envelope JSON and print the plaintext
    Open {
        /// File containing the envelope (reads stdin if omitted)
        #[arg(long, short)]
        input: Option<PathBuf>,
    },
}

/// Text encoding for generated keys.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyFormat {
    /// 64 hexadecimal characters
    Hex,
    /// Standard padded base64
    Base64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing before anything logs; logs go to stderr so command output can be piped
    let rust_log = std::env::var("RUST_LOG").ok().filter(|v| !v.is_empty());
    let (subscriber, filter_handle) =
        build_subscriber(startup_filter(cli.verbose, rust_log.as_deref()), io::stderr);
    subscriber.init();

    let config = load_config(&cli)?;

    if let Some(filter) = config_filter(cli.verbose, rust_log.as_deref(), &config) {
        filter_handle
            .reload(filter)
            .context("Failed to apply configured log level")?;
    }

    let config_path = cli.config.clone().unwrap_or_else(default_config_path);

    match cli.command {
        Commands::Serve => run_server(&config).await?,
        Commands::Send { message, url } => {
            let message = message.unwrap_or_else(|| config.client.request_message.clone());
            let url = url.unwrap_or_else(|| config.client.backend_url.clone());
            run_send(&config, url, message).await?;
        }
        Commands::Keygen {
            format,
            output,
            configure,
        } => {
            let config_path = configure.then_some(config_path.as_path());
            run_keygen(format, output.as_deref(), config_path)?;
        }
        Commands::Seal { message } => {
            let codec = EnvelopeCodec::new(&config.shared_key()?);
            let plaintext = match message {
                Some(message) => message.into_bytes(),
                None => read_stdin()?,
            };
            let envelope = codec.seal(&plaintext)?;
            println!("{}", envelope.to_json()?);
        }
        Commands::Open { input } => {
            let codec = EnvelopeCodec::new(&config.shared_key()?);
            let json = match input {
                Some(path) => fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read envelope: {}", path.display()))?,
                None => String::from_utf8(read_stdin()?).context("Envelope is not UTF-8")?,
            };
            let envelope = Envelope::from_json(json.trim())?;
            let plaintext = codec.open(&envelope)?;

            let mut stdout = io::stdout().lock();
            stdout.write_all(&plaintext)?;
            stdout.write_all(b"\n")?;
        }
    }

    Ok(())
}

/// Build the subscriber with a reloadable filter in front of the formatter.
fn build_subscriber<W>(
    filter: EnvFilter,
    writer: W,
) -> (impl tracing::Subscriber + Send + Sync + 'static, FilterHandle)
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let (filter, handle) = reload::Layer::new(filter);
    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(writer));
    (subscriber, handle)
}

/// Filter used until the configuration has been loaded.
///
/// `--verbose` wins over `RUST_LOG`, which wins over the default `info`.
fn startup_filter(verbose: bool, rust_log: Option<&str>) -> EnvFilter {
    match (verbose, rust_log) {
        (true, _) => EnvFilter::new("debug"),
        (false, Some(directives)) => EnvFilter::new(directives),
        (false, None) => EnvFilter::new("info"),
    }
}

/// Filter for `daemon.log_level`, unless `--verbose` or `RUST_LOG` already chose one.
fn config_filter(verbose: bool, rust_log: Option<&str>, config: &Config) -> Option<EnvFilter> {
    if verbose || rust_log.is_some() {
        return None;
    }
    Some(EnvFilter::new(config.daemon.log_level.to_lowercase()))
}

/// Load the configuration file, apply environment overrides and validate.
fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = if let Some(config_path) = &cli.config {
        tracing::info!("Using config file: {:?}", config_path);
        Config::load(config_path)?
    } else {
        Config::load_default()?
    };

    // Apply environment variable overrides
    config.apply_env_overrides();

    // Validate configuration
    config.validate()?;

    Ok(config)
}

/// Run the HTTP server until SIGTERM or SIGINT.
async fn run_server(config: &Config) -> anyhow::Result<()> {
    let codec = Arc::new(EnvelopeCodec::new(&config.shared_key()?));
    let responder = Arc::new(GreetingResponder::new(
        config.server.response_message.clone(),
    ));

    let server = EnvelopeServer::bind(&config.server, codec, responder).await?;
    tracing::info!(
        "Listening on http://{}{}",
        server.local_addr()?,
        config.server.endpoint
    );

    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(server.serve(shutdown.clone()));

    wait_for_shutdown_signal().await?;
    tracing::info!("Received shutdown signal");

    shutdown.cancel();
    handle.await??;

    Ok(())
}

/// Run one exchange against `url`, printing the reply or the failure.
async fn run_send(config: &Config, url: String, message: String) -> anyhow::Result<()> {
    let codec = Arc::new(EnvelopeCodec::new(&config.shared_key()?));
    tracing::info!("Sending message to {}", url);
    let transport = HttpTransport::new(url, config.client.timeout())?;
    let client = Client::new(codec, transport);

    match client.request(&MessageBody::new(message).to_bytes()).await {
        Ok(plaintext) => {
            println!("{}", String::from_utf8_lossy(&plaintext));
            Ok(())
        }
        Err(e) => {
            eprintln!("Error ({}): {}", e.kind(), e);
            std::process::exit(1);
        }
    }
}

/// Generate a key and print it or write it to `output`.
///
/// With `config_path`, the config file is updated to load the written key.
fn run_keygen(
    format: KeyFormat,
    output: Option<&Path>,
    config_path: Option<&Path>,
) -> anyhow::Result<()> {
    let key = SharedKey::generate();
    let text = match format {
        KeyFormat::Hex => key.to_hex(),
        KeyFormat::Base64 => key.to_base64(),
    };

    match output {
        Some(path) => {
            write_key_file(path, &text)?;
            eprintln!("Key written to {}", path.display());

            if let Some(config_path) = config_path {
                register_key_file(config_path, path)?;
                eprintln!("Configuration updated: {}", config_path.display());
            }
        }
        None => println!("{}", text),
    }

    Ok(())
}

/// Point `[crypto] key_file` of the config file at `key_path`.
///
/// The file is re-read without environment overrides so that only the key
/// settings change. An inline `[crypto] key` is removed since it would take
/// precedence.
fn register_key_file(config_path: &Path, key_path: &Path) -> anyhow::Result<()> {
    let key_path = fs::canonicalize(key_path)
        .with_context(|| format!("Failed to resolve key file: {}", key_path.display()))?;

    let mut file_config = Config::load(config_path)?;
    file_config.crypto.key = None;
    file_config.crypto.key_file = Some(key_path);
    file_config.save(config_path)?;

    tracing::info!("Key file registered in {}", config_path.display());
    Ok(())
}

/// Write key text to `path`, readable only by the owner.
fn write_key_file(path: &Path, text: &str) -> anyhow::Result<()> {
    use std::os::unix::fs::OpenOptionsExt;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
    }

    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)
        .with_context(|| format!("Failed to create key file: {}", path.display()))?;
    writeln!(file, "{}", text)
        .with_context(|| format!("Failed to write key file: {}", path.display()))?;

    Ok(())
}

fn read_stdin() -> anyhow::Result<Vec<u8>> {
    let mut buffer = Vec::new();
    io::stdin()
        .read_to_end(&mut buffer)
        .context("Failed to read stdin")?;
    Ok(buffer)
}

/// Wait for a shutdown signal (SIGTERM or SIGINT).
async fn wait_for_shutdown_signal() -> io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    tokio::select! {
        _ = sigterm.recv() => {
            tracing::info!("Received SIGTERM");
        }
        _ = sigint.recv() => {
            tracing::info!("Received SIGINT");
        }
    }

    Ok(())
}
