//! Typed configuration surface: defaults, JSON file overrides,
//! environment variables, and the process-wide root credential.
//!
//! Loaded once into a [`once_cell::sync::OnceCell`], mirroring
//! `control::config::settings()`'s initialise-once pattern.

use std::path::{Path, PathBuf};

use once_cell::sync::OnceCell;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::ConfigError;

const DEFAULT_PORT: u16 = 4113;
const DEFAULT_BACKLOG: i32 = 1;
const DEFAULT_BLOCK_FOR: i64 = 86_400;
const DEFAULT_MAX_MSG_LENGTH: usize = 1000;
const DEFAULT_PAGE_INBOX: i64 = 20;
const DEFAULT_PAGE_OUTBOX: i64 = 20;
const DEFAULT_RATE_LIMIT_M: i32 = 12;
const DEFAULT_RATE_LIMIT_H: i32 = 90;
const DEFAULT_MOTD: &str = "";

/// The subset of `Settings` that can come from a JSON config file; every
/// field is optional and backed by a default.
#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
struct FileSettings {
    log_file: Option<String>,
    backlog: Option<i32>,
    block_for: Option<i64>,
    max_msg_length: Option<usize>,
    page_inbox: Option<i64>,
    page_outbox: Option<i64>,
    port: Option<u16>,
    rate_limit_m: Option<i32>,
    rate_limit_h: Option<i32>,
    /// The message returned by the `motd` action. Not present in the
    /// reference implementation's config table; added so `motd` has
    /// somewhere to read its payload from.
    motd: Option<String>,
}

/// Where log lines are written.
#[derive(Debug, Clone)]
pub enum LogSink {
    Stderr,
    File(PathBuf),
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub host: String,
    pub port: u16,
    pub name: String,
    pub user: String,
    pub password: String,
}

impl DatabaseSettings {
    pub fn url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.user, self.password, self.host, self.port, self.name
        )
    }
}

/// The root administrator's credential, loaded from `ROOT_API_KEY` /
/// `ROOT_PASSWORD` and bcrypt-hashed once at startup — never stored in
/// the database, never re-hashed per request.
#[derive(Clone)]
pub struct RootCredentials {
    api_key: Uuid,
    password_hash: String,
}

impl std::fmt::Debug for RootCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RootCredentials")
            .field("api_key", &self.api_key)
            .field("password_hash", &"<redacted>")
            .finish()
    }
}

impl RootCredentials {
    pub fn load(api_key: Uuid, password: &str) -> Result<Self, ConfigError> {
        let password_hash = bcrypt::hash(password, bcrypt::DEFAULT_COST)
            .map_err(|_| ConfigError::InvalidRootApiKey)?;
        Ok(Self {
            api_key,
            password_hash,
        })
    }

    /// Verifies a wire credential against the root administrator.
    pub fn verify(&self, api_key: Uuid, password: Option<&str>) -> bool {
        if api_key != self.api_key {
            return false;
        }
        bcrypt::verify(password.unwrap_or(""), &self.password_hash).unwrap_or(false)
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub log_file: LogSink,
    pub backlog: i32,
    pub block_for: i64,
    pub max_msg_length: usize,
    pub page_inbox: i64,
    pub page_outbox: i64,
    pub port: u16,
    pub rate_limit_m: i32,
    pub rate_limit_h: i32,
    pub motd: String,
    pub database: DatabaseSettings,
    pub root: RootCredentials,
    /// Negative (quiet), zero (default) or positive (verbose); set from
    /// the `-q`/`-v` CLI flags, not from the config file.
    pub verbosity: i32,
}

impl Settings {
    pub fn log_warning(&self) -> bool {
        self.verbosity >= 0
    }

    pub fn log_info(&self) -> bool {
        self.verbosity > 0
    }

    pub fn log_debug(&self) -> bool {
        self.verbosity == i32::MAX
    }
}

fn require_env(name: &'static str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError::MissingEnv(name))
}

/// Loads settings from (in increasing priority) built-in defaults, an
/// optional JSON config file, and environment variables — mirroring
/// `control::config::load_settings`'s merge order.
pub fn load_settings(config_path: Option<&Path>, verbosity: i32) -> Result<Settings, ConfigError> {
    let mut builder = config::Config::builder();
    if let Some(path) = config_path {
        builder = builder.add_source(config::File::from(path).required(true));
    }
    let file: FileSettings = builder
        .add_source(config::Environment::with_prefix("TCHATATOR"))
        .build()?
        .try_deserialize()?;

    let root_api_key = require_env("ROOT_API_KEY")?;
    let root_api_key = Uuid::parse_str(&root_api_key).map_err(|_| ConfigError::InvalidRootApiKey)?;
    let root_password = require_env("ROOT_PASSWORD")?;

    Ok(Settings {
        log_file: match file.log_file.as_deref() {
            None | Some("-") => LogSink::Stderr,
            Some(path) => LogSink::File(PathBuf::from(path)),
        },
        backlog: file.backlog.unwrap_or(DEFAULT_BACKLOG),
        block_for: file.block_for.unwrap_or(DEFAULT_BLOCK_FOR),
        max_msg_length: file.max_msg_length.unwrap_or(DEFAULT_MAX_MSG_LENGTH),
        page_inbox: file.page_inbox.unwrap_or(DEFAULT_PAGE_INBOX),
        page_outbox: file.page_outbox.unwrap_or(DEFAULT_PAGE_OUTBOX),
        port: file.port.unwrap_or(DEFAULT_PORT),
        rate_limit_m: file.rate_limit_m.unwrap_or(DEFAULT_RATE_LIMIT_M),
        rate_limit_h: file.rate_limit_h.unwrap_or(DEFAULT_RATE_LIMIT_H),
        motd: file.motd.unwrap_or_else(|| DEFAULT_MOTD.to_string()),
        database: DatabaseSettings {
            host: require_env("DB_HOST")?,
            port: require_env("DB_PORT")?.parse().unwrap_or(5432),
            name: require_env("DB_NAME")?,
            user: require_env("DB_USER")?,
            password: require_env("DB_PASSWORD")?,
        },
        root: RootCredentials::load(root_api_key, &root_password)?,
        verbosity,
    })
}

static SETTINGS: OnceCell<Settings> = OnceCell::new();

/// Initialises the process-wide settings singleton. Must be called
/// exactly once, before [`settings`] is first used.
pub fn init(settings: Settings) {
    SETTINGS
        .set(settings)
        .unwrap_or_else(|_| panic!("settings already initialised"));
}

pub fn settings() -> &'static Settings {
    SETTINGS.get().expect("settings not initialised")
}

pub fn dump(settings: &Settings) {
    println!("CONFIGURATION");
    println!("backlog         {}", settings.backlog);
    println!("block_for       {} seconds", settings.block_for);
    println!(
        "log_file        {}",
        match &settings.log_file {
            LogSink::Stderr => "-".to_string(),
            LogSink::File(p) => p.display().to_string(),
        }
    );
    println!("max_msg_length  {} characters", settings.max_msg_length);
    println!("motd            {:?}", settings.motd);
    println!("page_inbox      {}", settings.page_inbox);
    println!("page_outbox     {}", settings.page_outbox);
    println!("port            {}", settings.port);
    println!("rate_limit_h    {}", settings.rate_limit_h);
    println!("rate_limit_m    {}", settings.rate_limit_m);
    println!();
    println!("log verbosity   {}", settings.verbosity);
}
