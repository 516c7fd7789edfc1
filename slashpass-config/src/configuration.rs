use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Yaml};
use s3::Region;
use s3::creds::Credentials;
use serde::{Deserialize, Serialize};
use url::Url;

pub const DEFAULT_HTTP_BIND_PORT: u16 = 8090;

pub const DEFAULT_SLACK_SERVER: &str = "https://slack.slashpass.co";

pub const DEFAULT_S3_REGION: &str = "us-east-1";

pub const DEFAULT_ONETIMESECRET_REGION: &str = "us";

pub const DEFAULT_KEY_BITS: usize = 2048;

pub const DEFAULT_REQUEST_TIMEOUT_SECONDS: u64 = 5;

/// A configuration value which must never end up in logs.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Sensitive(String);

impl Sensitive {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Sensitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[redacted]")
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    S3,
    Memory,
}

/// Relay configuration.
///
/// Field names double as (lower-cased) environment variable names, matching the variables of
/// existing deployments (`PASSWORD_STORAGE`, `BIP39`, `SLACK_SERVER`, ..).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Bucket holding all secrets, backups and the cached peer key.
    pub password_storage: String,
    pub storage_backend: StorageBackend,
    pub aws_s3_region: String,
    /// Custom S3 endpoint (MinIO, ..), addressed path-style when set.
    pub aws_s3_endpoint: Option<String>,
    pub aws_access_key_id: Option<Sensitive>,
    pub aws_secret_access_key: Option<Sensitive>,

    /// Base URL of the chat frontend, serving `/public_key` and `/t/{token}`.
    pub slack_server: String,
    /// Seed phrase the relay keypair is derived from.
    pub bip39: Option<Sensitive>,
    pub key_bits: usize,
    pub request_timeout_seconds: u64,

    pub onetimesecret_user: Option<String>,
    pub onetimesecret_key: Option<Sensitive>,
    pub onetimesecret_region: String,
    pub onetimesecret_endpoint: Option<Url>,

    pub http_bind_port: u16,
    pub log_level: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            password_storage: String::new(),
            storage_backend: StorageBackend::default(),
            aws_s3_region: DEFAULT_S3_REGION.to_string(),
            aws_s3_endpoint: None,
            aws_access_key_id: None,
            aws_secret_access_key: None,
            slack_server: DEFAULT_SLACK_SERVER.to_string(),
            bip39: None,
            key_bits: DEFAULT_KEY_BITS,
            request_timeout_seconds: DEFAULT_REQUEST_TIMEOUT_SECONDS,
            onetimesecret_user: None,
            onetimesecret_key: None,
            onetimesecret_region: DEFAULT_ONETIMESECRET_REGION.to_string(),
            onetimesecret_endpoint: None,
            http_bind_port: DEFAULT_HTTP_BIND_PORT,
            log_level: None,
        }
    }
}

impl Config {
    /// Checks the values every relay needs before it can start.
    pub fn validate(&self) -> Result<()> {
        if self.password_storage.trim().is_empty() {
            bail!("password_storage (storage bucket name) is not set");
        }
        match &self.bip39 {
            Some(seed) if !seed.expose().trim().is_empty() => {}
            _ => bail!("bip39 (keypair seed) is not set"),
        }
        self.slack_server_url()?;
        if self.request_timeout_seconds == 0 {
            bail!("request_timeout_seconds needs to be greater than zero");
        }
        Ok(())
    }

    pub fn slack_server_url(&self) -> Result<Url> {
        Url::parse(&self.slack_server).context("parsing slack_server url")
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    pub fn s3_region(&self) -> Result<Region> {
        match &self.aws_s3_endpoint {
            Some(endpoint) => Ok(Region::Custom {
                region: self.aws_s3_region.clone(),
                endpoint: endpoint.clone(),
            }),
            None => self
                .aws_s3_region
                .parse()
                .context("parsing s3 region given from config"),
        }
    }

    /// Static credentials when both key id and secret are configured, otherwise the default
    /// AWS credential chain (environment, profile, instance metadata).
    pub fn s3_credentials(&self) -> Result<Credentials> {
        let credentials = match (&self.aws_access_key_id, &self.aws_secret_access_key) {
            (Some(key_id), Some(secret)) => Credentials::new(
                Some(key_id.expose()),
                Some(secret.expose()),
                None,
                None,
                None,
            ),
            _ => Credentials::default(),
        };
        credentials.context("reading s3 credentials from config")
    }

    /// Base URL of the one-time secret service, `https://<region>.onetimesecret.com` unless
    /// overridden.
    pub fn onetimesecret_url(&self) -> Result<Url> {
        match &self.onetimesecret_endpoint {
            Some(url) => Ok(url.clone()),
            None => Url::parse(&format!(
                "https://{}.onetimesecret.com",
                self.onetimesecret_region
            ))
            .context("building onetimesecret url from region"),
        }
    }
}

#[derive(Parser, Serialize, Debug, Default)]
#[command(
    name = "slashpass",
    about = "Relay storing encrypted secrets for the slashpass chat integration",
    long_about = None,
    version
)]
pub struct Cli {
    /// Optional YAML configuration file, overridden by environment variables and arguments.
    #[arg(short = 'c', long, value_name = "PATH")]
    #[serde(skip_serializing)]
    config: Option<PathBuf>,

    #[arg(short = 'p', long, value_name = "PORT")]
    #[serde(skip_serializing_if = "Option::is_none")]
    http_bind_port: Option<u16>,

    #[arg(short = 'b', long = "bucket", value_name = "BUCKET")]
    #[serde(rename = "password_storage", skip_serializing_if = "Option::is_none")]
    password_storage: Option<String>,

    #[arg(short = 's', long, value_name = "URL")]
    #[serde(skip_serializing_if = "Option::is_none")]
    slack_server: Option<String>,

    #[arg(short = 'l', long, value_name = "LEVEL")]
    #[serde(skip_serializing_if = "Option::is_none")]
    log_level: Option<String>,
}

fn figment(cli: Cli) -> Figment {
    let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));
    if let Some(path) = &cli.config {
        figment = figment.merge(Yaml::file(path));
    }
    figment
        .merge(Env::raw())
        .merge(Serialized::defaults(cli))
}

/// Loads the configuration from defaults, an optional YAML file, environment variables and
/// command line arguments, in increasing order of priority.
pub fn load_config() -> Result<Config> {
    load_config_from(Cli::parse())
}

pub fn load_config_from(cli: Cli) -> Result<Config> {
    let config: Config = figment(cli).extract().context("loading configuration")?;
    config.validate()?;
    Ok(config)
}
