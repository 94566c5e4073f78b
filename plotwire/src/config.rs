//! Runtime settings, read from `PLOTWIRE_*` environment variables.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::bridge::staging::{DEFAULT_STAGING_THRESHOLD, StagingArea};
use crate::rpc::registration::RegistrationGate;
use crate::rpc::server::ServerConfig;

/// Port used when none is configured, or when 0 is given.
pub const DEFAULT_PORT: u16 = 8613;
pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_VIEW: &str = "Plot 1";
pub const DEFAULT_X_AXIS: &str = "X-Axis";
pub const DEFAULT_Y_AXIS: &str = "Y-Axis";
pub const DEFAULT_EXPORT_FILENAME: &str = "exported.svg";
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(5000);

pub const ENV_PORT: &str = "PLOTWIRE_PORT";
pub const ENV_HOST: &str = "PLOTWIRE_HOST";
pub const ENV_STAGING_DIR: &str = "PLOTWIRE_STAGING_DIR";
pub const ENV_STAGING_THRESHOLD: &str = "PLOTWIRE_STAGING_THRESHOLD";
pub const ENV_CONNECT_TIMEOUT_MS: &str = "PLOTWIRE_CONNECT_TIMEOUT_MS";
pub const ENV_REGISTRATION_TOKEN: &str = "PLOTWIRE_REGISTRATION_TOKEN";

#[derive(Clone)]
pub struct Settings {
    pub host: String,
    remote_port: u16,
    pub staging_dir: PathBuf,
    /// Arrays larger than this many bytes travel as staged files.
    pub staging_threshold: usize,
    pub connect_timeout: Duration,
    /// Capability token for `addHandlers`. `None` disables runtime registration.
    pub registration_token: Option<String>,
    default_view: String,
    pub export_filename: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            remote_port: DEFAULT_PORT,
            staging_dir: std::env::temp_dir(),
            staging_threshold: DEFAULT_STAGING_THRESHOLD,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            registration_token: None,
            default_view: DEFAULT_VIEW.to_string(),
            export_filename: DEFAULT_EXPORT_FILENAME.to_string(),
        }
    }
}

// The token stays out of logs.
impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("host", &self.host)
            .field("remote_port", &self.remote_port)
            .field("staging_dir", &self.staging_dir)
            .field("staging_threshold", &self.staging_threshold)
            .field("connect_timeout", &self.connect_timeout)
            .field(
                "registration_token",
                &self.registration_token.as_ref().map(|_| "<redacted>"),
            )
            .field("default_view", &self.default_view)
            .field("export_filename", &self.export_filename)
            .finish()
    }
}

impl Settings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from an arbitrary variable source.
    ///
    /// Unparseable values fall back to the default and are logged.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut settings = Self::default();

        if let Some(host) = lookup(ENV_HOST).filter(|h| !h.is_empty()) {
            settings.host = host;
        }
        if let Some(port) = parse_var::<u16>(&lookup, ENV_PORT) {
            settings.set_remote_port(port);
        }
        if let Some(dir) = lookup(ENV_STAGING_DIR).filter(|d| !d.is_empty()) {
            settings.staging_dir = PathBuf::from(dir);
        }
        if let Some(threshold) = parse_var::<usize>(&lookup, ENV_STAGING_THRESHOLD) {
            settings.staging_threshold = threshold;
        }
        if let Some(ms) = parse_var::<u64>(&lookup, ENV_CONNECT_TIMEOUT_MS) {
            settings.connect_timeout = Duration::from_millis(ms);
        }
        settings.registration_token = lookup(ENV_REGISTRATION_TOKEN).filter(|t| !t.is_empty());

        settings
    }

    pub fn remote_port(&self) -> u16 {
        self.remote_port
    }

    /// Set the renderer port; 0 restores [`DEFAULT_PORT`].
    pub fn set_remote_port(&mut self, port: u16) {
        self.remote_port = if port == 0 { DEFAULT_PORT } else { port };
    }

    pub fn remote_addr(&self) -> String {
        format!("{}:{}", self.host, self.remote_port)
    }

    pub fn default_view(&self) -> &str {
        &self.default_view
    }

    pub fn set_default_view(&mut self, view: impl Into<String>) {
        self.default_view = view.into();
    }

    pub fn staging_area(&self) -> StagingArea {
        StagingArea::new(self.staging_dir.clone(), self.staging_threshold)
    }

    pub fn registration_gate(&self) -> RegistrationGate {
        match &self.registration_token {
            Some(token) => RegistrationGate::with_token(token),
            None => RegistrationGate::disabled(),
        }
    }

    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            host: self.host.clone(),
            port: self.remote_port,
            staging: self.staging_area(),
        }
    }
}

fn parse_var<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "Ignoring unparseable setting");
            None
        }
    }
}
