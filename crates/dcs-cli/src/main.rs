//! dcs: local content-addressed encrypted storage CLI
//!
//! Commands:
//!   put <path>      - split, seal, and store a file
//!   get <id>        - retrieve and verify a file
//!   rm <id>         - delete a file's chunks and record
//!   ls              - list stored files
//!   info <id>       - show one file's record and chunks
//!   stats           - storage usage summary
//!   verify <id>     - check every chunk blob without decrypting
//!   keygen          - write a new raw key file
//!   config show     - display current configuration

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use secrecy::SecretString;

use dcs_core::config::{expand_tilde, DcsConfig};
use dcs_core::{format_bytes, FileMeta};
use dcs_crypto::{
    derive_key, generate_key, generate_salt, write_key_file, CryptoError, EncryptionKey,
    KdfParams, KeyFileProvider, KeyProvider, StaticKeyProvider, SALT_SIZE,
};
use dcs_engine::StorageNode;

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "dcs",
    version,
    about = "Content-addressed encrypted chunk storage",
    long_about = "dcs: store files as sealed, content-addressed chunks on local disk"
)]
struct Cli {
    /// Path to dcs.toml configuration file
    #[arg(long, short = 'c', env = "DCS_CONFIG", default_value = "~/.dcs/config.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(long, env = "DCS_LOG")]
    log: Option<String>,

    /// Log output format; overrides the config file
    #[arg(long, value_enum)]
    log_format: Option<LogFormat>,

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
    /// Store a local file
    Put {
        /// Local file to store
        path: PathBuf,
        /// Name to record (default: the file name)
        #[arg(long)]
        name: Option<String>,
        #[arg(long, default_value = "application/octet-stream")]
        content_type: String,
        #[arg(long, default_value = "")]
        owner: String,
        /// Persist chunks unencrypted
        #[arg(long)]
        plain: bool,
    },

    /// Retrieve a file by id
    Get {
        id: String,
        /// Output path (default: stdout)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },

    /// Delete a file by id
    Rm { id: String },

    /// List stored files
    Ls {
        /// Print records as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show one file's record
    Info {
        id: String,
        /// Print the record as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show storage usage
    Stats,

    /// Check that every chunk of a file is present and intact
    Verify { id: String },

    /// Generate a new 256-bit key file
    Keygen {
        /// Where to write the key (default: crypto.key_file or <data_dir>/dcs.key)
        #[arg(long)]
        out: Option<PathBuf>,
        /// Overwrite an existing key file
        #[arg(long)]
        force: bool,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the active configuration (merged defaults + config file)
    Show,
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = expand_tilde(&cli.config);
    let config = DcsConfig::load(&config_path)
        .with_context(|| format!("loading config: {}", config_path.display()))?;

    let level = cli.log.clone().unwrap_or_else(|| config.logging.level.clone());
    let format = cli.log_format.clone().unwrap_or(match config.logging.format.as_str() {
        "json" => LogFormat::Json,
        _ => LogFormat::Text,
    });
    init_logging(&level, &format);

    tracing::debug!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_path.display(),
        "dcs starting"
    );

    match cli.command {
        Commands::Put { path, name, content_type, owner, plain } => {
            cmd_put(&config, &path, name, content_type, owner, plain)
        }
        Commands::Get { id, output } => cmd_get(&config, &id, output.as_deref()),
        Commands::Rm { id } => cmd_rm(&config, &id),
        Commands::Ls { json } => cmd_ls(&config, json),
        Commands::Info { id, json } => cmd_info(&config, &id, json),
        Commands::Stats => cmd_stats(&config),
        Commands::Verify { id } => cmd_verify(&config, &id),
        Commands::Keygen { out, force } => cmd_keygen(&config, out.as_deref(), force),
        Commands::Config { action: ConfigAction::Show } => cmd_config_show(&config, &config_path),
    }
}

fn init_logging(level: &str, format: &LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // Logs go to stderr so `dcs get` can stream file bytes on stdout.
    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}

// ── Key sourcing ──────────────────────────────────────────────────────────────

/// Stands in for a key provider on commands that never touch plaintext.
struct NoKey;

impl KeyProvider for NoKey {
    fn key_for(&self, _file_id: &str) -> Result<EncryptionKey, CryptoError> {
        Err(CryptoError::KeyUnavailable("this command does not load a key".into()))
    }
}

/// Loads the configured key source the first time a key is asked for,
/// so unencrypted files never need one.
struct DeferredKey {
    config: DcsConfig,
    loaded: OnceLock<Arc<dyn KeyProvider>>,
}

impl DeferredKey {
    fn new(config: &DcsConfig) -> Self {
        Self {
            config: config.clone(),
            loaded: OnceLock::new(),
        }
    }
}

impl KeyProvider for DeferredKey {
    fn key_for(&self, file_id: &str) -> Result<EncryptionKey, CryptoError> {
        let provider = match self.loaded.get() {
            Some(provider) => provider,
            None => {
                let provider = key_provider(&self.config)
                    .map_err(|e| CryptoError::KeyUnavailable(format!("{e:#}")))?;
                self.loaded.get_or_init(|| provider)
            }
        };
        provider.key_for(file_id)
    }
}

/// Key file if configured, otherwise a passphrase-derived key.
///
/// The passphrase comes from `DCS_PASSPHRASE`, or an interactive prompt.
fn key_provider(config: &DcsConfig) -> Result<Arc<dyn KeyProvider>> {
    if let Some(path) = &config.crypto.key_file {
        let path = expand_tilde(path);
        let provider = KeyFileProvider::open(&path)
            .with_context(|| format!("opening key file: {}", path.display()))?;
        return Ok(Arc::new(provider));
    }

    let passphrase = match std::env::var("DCS_PASSPHRASE") {
        Ok(p) => SecretString::from(p),
        Err(_) => SecretString::from(
            rpassword::prompt_password("dcs passphrase: ").context("reading passphrase")?,
        ),
    };

    let salt = load_or_create_salt(&expand_tilde(&config.crypto.salt_file))?;
    let params = KdfParams {
        mem_cost_kib: config.crypto.argon2_mem_cost_kib,
        time_cost: config.crypto.argon2_time_cost,
        parallelism: config.crypto.argon2_parallelism,
    };
    let key = derive_key(&passphrase, &salt, &params).context("deriving key from passphrase")?;
    Ok(Arc::new(StaticKeyProvider::new(key)))
}

/// Read the KDF salt, creating it on first use.
fn load_or_create_salt(path: &Path) -> Result<[u8; SALT_SIZE]> {
    if path.exists() {
        let raw = std::fs::read(path).with_context(|| format!("reading salt: {}", path.display()))?;
        return raw.as_slice().try_into().map_err(|_| {
            anyhow::anyhow!(
                "salt file {} has {} bytes, expected {SALT_SIZE}",
                path.display(),
                raw.len()
            )
        });
    }

    let salt = generate_salt();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating salt dir: {}", parent.display()))?;
    }
    std::fs::write(path, salt).with_context(|| format!("writing salt: {}", path.display()))?;
    tracing::info!(path = %path.display(), "created new KDF salt");
    Ok(salt)
}

fn open_node(config: &DcsConfig, keys: Arc<dyn KeyProvider>) -> Result<StorageNode> {
    StorageNode::from_config(config, keys).context("opening storage node")
}

// ── `dcs put` ─────────────────────────────────────────────────────────────────

fn cmd_put(
    config: &DcsConfig,
    path: &Path,
    name: Option<String>,
    content_type: String,
    owner: String,
    plain: bool,
) -> Result<()> {
    let name = match name {
        Some(n) => n,
        None => path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .with_context(|| format!("no file name in {}", path.display()))?,
    };
    let data = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;

    let meta = FileMeta::new(name)
        .content_type(content_type)
        .owner(owner)
        .replicas(config.node.replicas)
        .encrypted(!plain);

    let node = open_node(config, Arc::new(DeferredKey::new(config)))?;
    let record = node
        .upload(meta, &data)
        .with_context(|| format!("storing {}", path.display()))?;

    println!("Stored:");
    println!("  id:      {}", record.id);
    println!("  name:    {}", record.name);
    println!("  size:    {}", format_bytes(record.size));
    println!("  chunks:  {}", record.chunks.len());
    println!("  on disk: {}", format_bytes(record.stored_size()));
    Ok(())
}

// ── `dcs get` ─────────────────────────────────────────────────────────────────

fn cmd_get(config: &DcsConfig, id: &str, output: Option<&Path>) -> Result<()> {
    let node = open_node(config, Arc::new(DeferredKey::new(config)))?;
    let (record, data) = node.download(id).with_context(|| format!("retrieving {id}"))?;

    match output {
        Some(out) => {
            std::fs::write(out, &data).with_context(|| format!("writing {}", out.display()))?;
            eprintln!("{} → {} ({})", record.name, out.display(), format_bytes(record.size));
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&data).context("writing to stdout")?;
            stdout.flush().context("flushing stdout")?;
        }
    }
    Ok(())
}

// ── `dcs rm` ──────────────────────────────────────────────────────────────────

fn cmd_rm(config: &DcsConfig, id: &str) -> Result<()> {
    let node = open_node(config, Arc::new(NoKey))?;
    let record = node.remove(id).with_context(|| format!("removing {id}"))?;
    println!("Removed {} ({}, {} chunks)", record.name, format_bytes(record.size), record.chunks.len());
    Ok(())
}

// ── `dcs ls` ──────────────────────────────────────────────────────────────────

fn cmd_ls(config: &DcsConfig, json: bool) -> Result<()> {
    let node = open_node(config, Arc::new(NoKey))?;
    let files = node.files().context("listing files")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&files).context("serializing records")?);
        return Ok(());
    }

    if files.is_empty() {
        println!("No files stored.");
        return Ok(());
    }

    println!("{:<16}  {:>10}  {:>6}  {:<5}  NAME", "ID", "SIZE", "CHUNKS", "ENC");
    for f in &files {
        println!(
            "{:<16}  {:>10}  {:>6}  {:<5}  {}",
            &f.id[..16.min(f.id.len())],
            format_bytes(f.size),
            f.chunks.len(),
            if f.encrypted { "yes" } else { "no" },
            f.name,
        );
    }
    Ok(())
}

// ── `dcs info` ────────────────────────────────────────────────────────────────

fn cmd_info(config: &DcsConfig, id: &str, json: bool) -> Result<()> {
    let node = open_node(config, Arc::new(NoKey))?;
    let record = node
        .get(id)
        .with_context(|| format!("looking up {id}"))?
        .with_context(|| format!("no file with id {id}"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&record).context("serializing record")?);
        return Ok(());
    }

    println!("id:           {}", record.id);
    println!("name:         {}", record.name);
    println!("size:         {}", format_bytes(record.size));
    println!("on disk:      {}", format_bytes(record.stored_size()));
    println!("content type: {}", record.content_type);
    if !record.owner.is_empty() {
        println!("owner:        {}", record.owner);
    }
    println!("encrypted:    {}", if record.encrypted { "yes" } else { "no" });
    println!("replicas:     {}", record.replicas);
    println!("hash:         {}", record.hash);
    println!("created:      {}", record.created_at);
    println!("updated:      {}", record.updated_at);
    println!("chunks:       {}", record.chunks.len());
    for chunk in &record.chunks {
        println!("  {:>4}  {}  {:>10}", chunk.index, chunk.id, format_bytes(chunk.size));
    }
    Ok(())
}

// ── `dcs stats` ───────────────────────────────────────────────────────────────

fn cmd_stats(config: &DcsConfig) -> Result<()> {
    let node = open_node(config, Arc::new(NoKey))?;
    let stats = node.stats().context("reading storage stats")?;

    println!("Node:     {}", config.node.id);
    println!("Files:    {}", stats.file_count);
    println!("Blobs:    {}", stats.blob_count);
    println!("Usage:    {} / {}", format_bytes(stats.usage), format_bytes(stats.capacity));
    if stats.capacity > 0 {
        println!("Used:     {:.1}%", stats.usage as f64 * 100.0 / stats.capacity as f64);
    }
    Ok(())
}

// ── `dcs verify` ──────────────────────────────────────────────────────────────

fn cmd_verify(config: &DcsConfig, id: &str) -> Result<()> {
    let node = open_node(config, Arc::new(NoKey))?;
    let record = node.verify(id).with_context(|| format!("verifying {id}"))?;
    println!("OK: {} ({} chunks intact)", record.name, record.chunks.len());
    Ok(())
}

// ── `dcs keygen` ──────────────────────────────────────────────────────────────

fn cmd_keygen(config: &DcsConfig, out: Option<&Path>, force: bool) -> Result<()> {
    let path = match (out, &config.crypto.key_file) {
        (Some(p), _) => p.to_path_buf(),
        (None, Some(p)) => expand_tilde(p),
        (None, None) => expand_tilde(&config.node.data_dir).join("dcs.key"),
    };

    if path.exists() && !force {
        anyhow::bail!(
            "key file already exists: {} (use --force to overwrite; files sealed under the old key become unreadable)",
            path.display()
        );
    }

    write_key_file(&path, &generate_key())
        .with_context(|| format!("writing key file: {}", path.display()))?;
    println!("Wrote key file: {}", path.display());
    if config.crypto.key_file.is_none() {
        println!("Set crypto.key_file = \"{}\" in your config to use it.", path.display());
    }
    Ok(())
}

// ── `dcs config show` ─────────────────────────────────────────────────────────

fn cmd_config_show(config: &DcsConfig, config_path: &Path) -> Result<()> {
    if config_path.exists() {
        println!("# Configuration from: {}", config_path.display());
    } else {
        println!("# Configuration: defaults (no file at {})", config_path.display());
    }
    println!();
    let rendered = toml::to_string_pretty(config).context("serializing config to TOML")?;
    print!("{rendered}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use tempfile::TempDir;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_put_flags() {
        let cli = Cli::parse_from(["dcs", "-c", "/tmp/x.toml", "put", "a.txt", "--plain", "--owner", "bob"]);
        match cli.command {
            Commands::Put { path, plain, owner, name, .. } => {
                assert_eq!(path, PathBuf::from("a.txt"));
                assert!(plain);
                assert_eq!(owner, "bob");
                assert!(name.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn salt_is_created_once() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("salt");

        let first = load_or_create_salt(&path).unwrap();
        let second = load_or_create_salt(&path).unwrap();
        assert_eq!(first, second);
        assert_eq!(std::fs::read(&path).unwrap().len(), SALT_SIZE);
    }

    #[test]
    fn short_salt_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("salt");
        std::fs::write(&path, b"short").unwrap();
        assert!(load_or_create_salt(&path).is_err());
    }

    #[test]
    fn parses_info() {
        let cli = Cli::parse_from(["dcs", "info", "abc123", "--json"]);
        match cli.command {
            Commands::Info { id, json } => {
                assert_eq!(id, "abc123");
                assert!(json);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    fn temp_config(dir: &TempDir) -> DcsConfig {
        let mut config = DcsConfig::default();
        config.node.chunk_size = 8;
        config.storage.path = dir.path().join("blobs");
        config.storage.index_path = dir.path().join("index.json");
        config.crypto.key_file = Some(dir.path().join("missing.key"));
        config
    }

    #[test]
    fn plain_files_never_load_a_key() {
        let dir = TempDir::new().unwrap();
        let config = temp_config(&dir);
        let node = open_node(&config, Arc::new(DeferredKey::new(&config))).unwrap();

        let record = node
            .upload(FileMeta::new("open").encrypted(false), b"no key needed here")
            .unwrap();
        assert_eq!(node.download(&record.id).unwrap().1, b"no key needed here");
        assert!(node.get(&record.id).unwrap().is_some());
    }

    #[test]
    fn deferred_key_reports_a_missing_key_file() {
        let dir = TempDir::new().unwrap();
        let config = temp_config(&dir);
        let err = DeferredKey::new(&config).key_for("x").unwrap_err();
        match err {
            CryptoError::KeyUnavailable(msg) => assert!(msg.contains("missing.key"), "{msg}"),
            other => panic!("expected KeyUnavailable, got {other:?}"),
        }
    }

    #[test]
    fn deferred_key_retries_after_a_failed_load() {
        let dir = TempDir::new().unwrap();
        let config = temp_config(&dir);
        let deferred = DeferredKey::new(&config);
        assert!(deferred.key_for("a").is_err());

        let key = generate_key();
        write_key_file(&dir.path().join("missing.key"), &key).unwrap();
        assert_eq!(deferred.key_for("a").unwrap().as_bytes(), key.as_bytes());
    }

    #[test]
    fn no_key_refuses() {
        assert!(matches!(NoKey.key_for("x"), Err(CryptoError::KeyUnavailable(_))));
    }
}
