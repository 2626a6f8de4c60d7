//! Application settings and the settings provider boundary

use super::ConfigError;
use crate::core::screen::Geometry;
use crate::core::session::{Credentials, LoginScript, SessionConfig, TimingConfig};
use crate::core::transcript::TranscriptFormat;
use crate::core::transport::{SshConfig, TelnetConfig, Transport, TransportType};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable that overrides the configured transport method
pub const METHOD_ENV: &str = "GREENSCREEN_TERMINAL_METHOD";

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Host connection
    pub terminal: TerminalSettings,
    /// Settle and poll timings
    pub timing: TimingSettings,
    /// Sign-on screen detection
    pub login: LoginSettings,
    /// Logging settings
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load config from the default location, with environment overrides.
    ///
    /// A missing file yields the defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = super::config_file().ok_or(ConfigError::NoConfigDir)?;
        let mut config = if path.exists() {
            Self::load_from(&path)?
        } else {
            Self::default()
        };
        config.apply_env();
        Ok(config)
    }

    /// Load config from `path`, without environment overrides
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Save config to `path`
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Save config to the default location
    pub fn save(&self) -> Result<(), ConfigError> {
        let path = super::config_file().ok_or(ConfigError::NoConfigDir)?;
        self.save_to(&path)
    }

    /// Apply [`METHOD_ENV`] if set
    pub fn apply_env(&mut self) {
        let value = std::env::var(METHOD_ENV).ok();
        self.apply_method_override(value.as_deref());
    }

    /// Switch transport method; unknown names keep the configured one
    pub fn apply_method_override(&mut self, value: Option<&str>) {
        let Some(value) = value.filter(|v| !v.trim().is_empty()) else {
            return;
        };
        match value.parse::<TransportType>() {
            Ok(method) => {
                tracing::debug!("Terminal method overridden to {}", method);
                self.terminal.method = method;
            }
            Err(_) => tracing::warn!(
                "Unknown terminal method {:?} in {}, keeping {}",
                value,
                METHOD_ENV,
                self.terminal.method
            ),
        }
    }

    /// Session configuration for `credentials`
    pub fn session_config(&self, credentials: &Credentials) -> Result<SessionConfig, ConfigError> {
        let terminal = self.terminal_settings()?;
        SessionConfig::from_settings(&terminal, credentials, &self.timing, &self.login)
    }
}

/// Host connection settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerminalSettings {
    /// Host name or address
    pub hostname: String,
    /// Port; the method's well-known port when unset
    pub port: Option<u16>,
    /// Connect timeout in seconds
    pub connect_timeout_secs: u64,
    /// Screen columns
    pub columns: u16,
    /// Screen rows
    pub rows: u16,
    /// Transport method
    pub method: TransportType,
    /// Terminal type announced to the host
    pub terminal_type: String,
    /// Private key for SSH; password authentication is used when unset
    pub private_key: Option<PathBuf>,
}

impl Default for TerminalSettings {
    fn default() -> Self {
        Self {
            hostname: "localhost".to_string(),
            port: None,
            connect_timeout_secs: 30,
            columns: 80,
            rows: 24,
            method: TransportType::Telnet,
            terminal_type: "vt320".to_string(),
            private_key: None,
        }
    }
}

impl TerminalSettings {
    /// Configured port, or the method's default
    pub fn effective_port(&self) -> u16 {
        self.port.unwrap_or(match self.method {
            TransportType::Ssh => 22,
            _ => 23,
        })
    }

    /// Screen size
    pub fn geometry(&self) -> Geometry {
        Geometry {
            columns: usize::from(self.columns),
            rows: usize::from(self.rows),
        }
    }
}

/// Settle and poll timings, in milliseconds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingSettings {
    /// Pause after typed text
    pub text_settle_ms: u64,
    /// Pause after a named key
    pub key_settle_ms: u64,
    /// Pause after a function key
    pub function_key_settle_ms: u64,
    /// Pause at the start of each pump
    pub read_settle_ms: u64,
    /// Pause between reads inside a pump
    pub burst_delay_ms: u64,
    /// Interval between checks in wait loops
    pub poll_interval_ms: u64,
    /// Largest frame one pump collects, in bytes
    pub read_buffer: usize,
    /// Pause before the first read on SSH
    pub ssh_opening_delay_ms: u64,
    /// Pause before the first read on Telnet
    pub telnet_opening_delay_ms: u64,
}

impl Default for TimingSettings {
    fn default() -> Self {
        Self {
            text_settle_ms: 500,
            key_settle_ms: 500,
            function_key_settle_ms: 1000,
            read_settle_ms: 100,
            burst_delay_ms: 50,
            poll_interval_ms: 100,
            read_buffer: 8192,
            ssh_opening_delay_ms: 2000,
            telnet_opening_delay_ms: 1000,
        }
    }
}

impl TimingSettings {
    /// Session timings
    pub fn to_timing(&self) -> TimingConfig {
        TimingConfig {
            text_settle: Duration::from_millis(self.text_settle_ms),
            key_settle: Duration::from_millis(self.key_settle_ms),
            function_key_settle: Duration::from_millis(self.function_key_settle_ms),
            read_settle: Duration::from_millis(self.read_settle_ms),
            burst_delay: Duration::from_millis(self.burst_delay_ms),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            read_buffer: self.read_buffer,
        }
    }
}

/// Sign-on screen detection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoginSettings {
    /// Text on the sign-on screen
    pub sign_on_marker: String,
    /// Text on the main menu
    pub main_menu_marker: String,
    /// Wait for the sign-on screen, seconds
    pub sign_on_timeout_secs: u64,
    /// Wait for the main menu, seconds
    pub main_menu_timeout_secs: u64,
}

impl Default for LoginSettings {
    fn default() -> Self {
        Self {
            sign_on_marker: "Sign On".to_string(),
            main_menu_marker: "MAIN".to_string(),
            sign_on_timeout_secs: 5,
            main_menu_timeout_secs: 15,
        }
    }
}

impl LoginSettings {
    /// Sign-on script for `credentials`
    pub fn script(&self, credentials: &Credentials) -> LoginScript {
        LoginScript {
            credentials: credentials.clone(),
            sign_on_marker: self.sign_on_marker.clone(),
            main_menu_marker: self.main_menu_marker.clone(),
            sign_on_timeout: Duration::from_secs(self.sign_on_timeout_secs),
            main_menu_timeout: Duration::from_secs(self.main_menu_timeout_secs),
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Text,
    /// One JSON object per event
    Json,
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` takes precedence
    pub level: String,
    /// Output format
    pub format: LogFormat,
    /// Directory for daily log files; stderr only when unset
    pub directory: Option<PathBuf>,
    /// Log file name prefix
    pub file_prefix: String,
    /// Session transcript file
    pub transcript: Option<PathBuf>,
    /// Session transcript format
    pub transcript_format: TranscriptFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
            directory: None,
            file_prefix: "greenscreen".to_string(),
            transcript: None,
            transcript_format: TranscriptFormat::Text,
        }
    }
}

/// Source of host connection settings, read once when a session is built
pub trait SettingsProvider {
    /// Resolve the terminal settings
    fn terminal_settings(&self) -> Result<TerminalSettings, ConfigError>;
}

impl SettingsProvider for AppConfig {
    fn terminal_settings(&self) -> Result<TerminalSettings, ConfigError> {
        if self.terminal.hostname.trim().is_empty() {
            return Err(ConfigError::MissingKey("hostname".to_string()));
        }
        Ok(self.terminal.clone())
    }
}

fn parse_key<T: std::str::FromStr>(
    map: &HashMap<String, String>,
    key: &str,
) -> Result<Option<T>, ConfigError> {
    match map.get(key) {
        None => Ok(None),
        Some(value) => value.trim().parse().map(Some).map_err(|_| ConfigError::Invalid {
            key: key.to_string(),
            value: value.clone(),
        }),
    }
}

/// Flat key/value settings: `hostname` (required), `port`, `connect_timeout`,
/// `columns`, `rows`, `method`, `terminal_type`
impl SettingsProvider for HashMap<String, String> {
    fn terminal_settings(&self) -> Result<TerminalSettings, ConfigError> {
        let defaults = TerminalSettings::default();
        let hostname = self
            .get("hostname")
            .map(|h| h.trim().to_string())
            .filter(|h| !h.is_empty())
            .ok_or_else(|| ConfigError::MissingKey("hostname".to_string()))?;

        Ok(TerminalSettings {
            hostname,
            port: parse_key(self, "port")?,
            connect_timeout_secs: parse_key(self, "connect_timeout")?
                .unwrap_or(defaults.connect_timeout_secs),
            columns: parse_key(self, "columns")?.unwrap_or(defaults.columns),
            rows: parse_key(self, "rows")?.unwrap_or(defaults.rows),
            method: parse_key(self, "method")?.unwrap_or(defaults.method),
            terminal_type: self
                .get("terminal_type")
                .cloned()
                .unwrap_or(defaults.terminal_type),
            private_key: self.get("private_key").map(PathBuf::from),
        })
    }
}

impl SessionConfig {
    /// Build a session configuration from resolved settings.
    ///
    /// SSH sessions authenticate at the transport; Telnet sessions get a
    /// sign-on script instead.
    pub fn from_settings(
        settings: &TerminalSettings,
        credentials: &Credentials,
        timing: &TimingSettings,
        login: &LoginSettings,
    ) -> Result<Self, ConfigError> {
        let port = settings.effective_port();
        let (transport, script) = match settings.method {
            TransportType::Ssh => {
                let mut ssh = SshConfig::new(&settings.hostname, &credentials.username)
                    .port(port)
                    .timeout(settings.connect_timeout_secs)
                    .terminal_size(u32::from(settings.columns), u32::from(settings.rows))
                    .terminal_type(&settings.terminal_type);
                ssh = match &settings.private_key {
                    Some(key) => ssh.private_key(key.clone(), None),
                    None if !credentials.password.is_empty() => ssh.password(&credentials.password),
                    None => ssh,
                };
                ssh.opening_delay = Duration::from_millis(timing.ssh_opening_delay_ms);
                (Transport::Ssh(ssh), None)
            }
            TransportType::Telnet => {
                let telnet = TelnetConfig::new(&settings.hostname)
                    .port(port)
                    .timeout(settings.connect_timeout_secs)
                    .terminal_type(&settings.terminal_type)
                    .window_size(settings.columns, settings.rows)
                    .opening_delay(Duration::from_millis(timing.telnet_opening_delay_ms));
                (Transport::Telnet(telnet), Some(login.script(credentials)))
            }
            TransportType::Virtual => {
                return Err(ConfigError::Invalid {
                    key: "method".to_string(),
                    value: settings.method.to_string(),
                })
            }
        };

        let mut config = SessionConfig::new(&settings.hostname, transport);
        config.login = script;
        config.timing = timing.to_timing();
        config.geometry = settings.geometry();
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::transport::SshAuth;

    fn map(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.terminal.method, TransportType::Telnet);
        assert_eq!(config.terminal.effective_port(), 23);
        assert_eq!(config.timing.to_timing(), TimingConfig::default());
        assert_eq!(config.login.sign_on_marker, "Sign On");
    }

    #[test]
    fn test_toml_roundtrip_and_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = AppConfig::default();
        config.terminal.hostname = "as400.example".to_string();
        config.terminal.method = TransportType::Ssh;
        config.timing.text_settle_ms = 250;
        config.save_to(&path).unwrap();

        let loaded = AppConfig::load_from(&path).unwrap();
        assert_eq!(loaded.terminal, config.terminal);
        assert_eq!(loaded.timing.text_settle_ms, 250);

        std::fs::write(&path, "[terminal]\nhostname = \"h\"\nmethod = \"ssh\"\n").unwrap();
        let partial = AppConfig::load_from(&path).unwrap();
        assert_eq!(partial.terminal.hostname, "h");
        assert_eq!(partial.terminal.effective_port(), 22);
        assert_eq!(partial.terminal.columns, 80);
    }

    #[test]
    fn test_bad_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[terminal\n").unwrap();
        assert!(matches!(AppConfig::load_from(&path), Err(ConfigError::Parse(_))));
        assert!(matches!(
            AppConfig::load_from(&dir.path().join("missing.toml")),
            Err(ConfigError::Io(_))
        ));
    }

    #[test]
    fn test_method_override() {
        let mut config = AppConfig::default();
        config.apply_method_override(Some("SSH"));
        assert_eq!(config.terminal.method, TransportType::Ssh);

        config.apply_method_override(Some("jtopen"));
        assert_eq!(config.terminal.method, TransportType::Ssh);

        config.apply_method_override(Some("telnet"));
        config.apply_method_override(None);
        assert_eq!(config.terminal.method, TransportType::Telnet);
    }

    #[test]
    fn test_map_provider() {
        let settings = map(&[
            ("hostname", "as400"),
            ("port", "2323"),
            ("columns", "132"),
            ("rows", "27"),
            ("method", "ssh"),
        ])
        .terminal_settings()
        .unwrap();

        assert_eq!(settings.hostname, "as400");
        assert_eq!(settings.effective_port(), 2323);
        assert_eq!(settings.geometry(), Geometry { columns: 132, rows: 27 });
        assert_eq!(settings.method, TransportType::Ssh);
        assert_eq!(settings.connect_timeout_secs, 30);
    }

    #[test]
    fn test_map_provider_errors() {
        assert!(matches!(
            map(&[("port", "23")]).terminal_settings(),
            Err(ConfigError::MissingKey(ref key)) if key == "hostname"
        ));
        assert!(matches!(
            map(&[("hostname", "h"), ("port", "telnet")]).terminal_settings(),
            Err(ConfigError::Invalid { ref key, .. }) if key == "port"
        ));
        assert!(matches!(
            map(&[("hostname", "h"), ("method", "5250")]).terminal_settings(),
            Err(ConfigError::Invalid { ref key, .. }) if key == "method"
        ));
    }

    #[test]
    fn test_telnet_session_config_has_login() {
        let settings = map(&[("hostname", "as400"), ("columns", "132"), ("rows", "27")])
            .terminal_settings()
            .unwrap();
        let creds = Credentials::new("QA", "pw");
        let config = SessionConfig::from_settings(
            &settings,
            &creds,
            &TimingSettings::default(),
            &LoginSettings::default(),
        )
        .unwrap();

        let login = config.login.expect("telnet signs on");
        assert_eq!(login.credentials.username, "QA");
        assert_eq!(login.main_menu_timeout, Duration::from_secs(15));
        match config.transport {
            Transport::Telnet(telnet) => {
                assert_eq!(telnet.port, 23);
                assert_eq!(telnet.opening_delay, Duration::from_millis(1000));
                assert_eq!((telnet.columns, telnet.rows), (132, 27));
            }
            other => panic!("unexpected transport {other:?}"),
        }
    }

    #[test]
    fn test_ssh_session_config_uses_password() {
        let mut config = AppConfig::default();
        config.terminal.hostname = "as400".to_string();
        config.terminal.method = TransportType::Ssh;

        let session = config.session_config(&Credentials::new("QA", "pw")).unwrap();
        assert!(session.login.is_none());
        match session.transport {
            Transport::Ssh(ssh) => {
                assert_eq!(ssh.port, 22);
                assert_eq!((ssh.term_width, ssh.term_height), (80, 24));
                assert!(matches!(ssh.auth, SshAuth::Password(ref p) if p == "pw"));
            }
            other => panic!("unexpected transport {other:?}"),
        }
    }

    #[test]
    fn test_empty_hostname_rejected() {
        let mut config = AppConfig::default();
        config.terminal.hostname = " ".to_string();
        assert!(matches!(
            config.session_config(&Credentials::default()),
            Err(ConfigError::MissingKey(_))
        ));
    }
}
