use anyhow::{Context, Result};
use clap::Parser;
use std::{env, path::PathBuf, str::FromStr};

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage_dir: PathBuf,
    pub public_url: String,
    pub database_url: String,
    pub entities: PathBuf,
    pub upload_tmp_dir: PathBuf,
    pub max_upload_bytes: u64,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Image attachment service")]
pub struct Args {
    /// Host to bind to (overrides ATTACHMENTS_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides ATTACHMENTS_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Root directory for stored images (overrides ATTACHMENTS_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<PathBuf>,

    /// URL prefix images are served under (overrides ATTACHMENTS_PUBLIC_URL)
    #[arg(long)]
    pub public_url: Option<String>,

    /// Database URL (overrides ATTACHMENTS_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Entity type definitions (overrides ATTACHMENTS_ENTITIES)
    #[arg(long)]
    pub entities: Option<PathBuf>,

    /// Spool directory for incoming uploads (overrides ATTACHMENTS_UPLOAD_TMP_DIR)
    #[arg(long)]
    pub upload_tmp_dir: Option<PathBuf>,

    /// Largest accepted file part in bytes (overrides ATTACHMENTS_MAX_UPLOAD_BYTES)
    #[arg(long)]
    pub max_upload_bytes: Option<u64>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        let args = Args::parse();

        let env_host = env::var("ATTACHMENTS_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = parse_env("ATTACHMENTS_PORT", 3000)?;
        let env_storage = env::var("ATTACHMENTS_STORAGE_DIR").unwrap_or_else(|_| "./data/images".into());
        let env_public_url = env::var("ATTACHMENTS_PUBLIC_URL").unwrap_or_else(|_| "/images".into());
        let env_db = env::var("ATTACHMENTS_DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./data/meta/attachments.db".into());
        let env_entities =
            env::var("ATTACHMENTS_ENTITIES").unwrap_or_else(|_| "./config/entities.json".into());
        let env_tmp = env::var("ATTACHMENTS_UPLOAD_TMP_DIR").unwrap_or_else(|_| "./data/tmp".into());
        let env_max_upload = parse_env("ATTACHMENTS_MAX_UPLOAD_BYTES", 10 * 1024 * 1024)?;

        let cfg = Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            storage_dir: args.storage_dir.unwrap_or_else(|| env_storage.into()),
            public_url: args.public_url.unwrap_or(env_public_url),
            database_url: args.database_url.unwrap_or(env_db),
            entities: args.entities.unwrap_or_else(|| env_entities.into()),
            upload_tmp_dir: args.upload_tmp_dir.unwrap_or_else(|| env_tmp.into()),
            max_upload_bytes: args.max_upload_bytes.unwrap_or(env_max_upload),
        };

        Ok((cfg, args.migrate))
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(value) => value
            .parse::<T>()
            .with_context(|| format!("parsing {key} value `{value}`")),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("reading {key}")),
    }
}
