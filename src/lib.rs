//! # Greenscreen Core Library
//!
//! Drives screen-oriented host applications over SSH or Telnet and exposes
//! the remote screen as structured data: fields, labels and positions.
//!
//! ## Features
//!
//! - SSH-2 shells with a pseudo-terminal (libssh2) and Telnet streams
//! - Caller-driven session: every read is an explicit pump, every wait is
//!   bounded by a timeout
//! - Field discovery from `_`/`.` marker runs, with or without labels
//! - Function keys F1-F24 and cursor addressing for VT-style hosts
//! - Transcripts of everything sent and received
//! - CLI with exit codes
//!
//! ## Example
//!
//! ```rust,no_run
//! use greenscreen_core::{Credentials, Session, SessionConfig, TelnetConfig, Transport};
//! use greenscreen_core::core::session::LoginScript;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut config = SessionConfig::new("as400", Transport::Telnet(TelnetConfig::new("as400")));
//!     config.login = Some(LoginScript::new(Credentials::new("QA", "secret")));
//!
//!     let mut session = Session::new(config);
//!     session.connect().await?;
//!
//!     session.send_text("1").await?;
//!     let mut screen = session.screen().await?;
//!     screen.set_field_value(&mut session, "Last Name", "SMITH").await?;
//!
//!     if screen.wait_for_text(&mut session, "saved", Duration::from_secs(5)).await? {
//!         println!("{}", screen.text());
//!     }
//!
//!     session.disconnect().await;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod core;
pub mod utils;

// Re-exports for convenience
pub use crate::cli::{CliResult, ExitCodes, OutputFormat};
pub use crate::config::{AppConfig, ConfigError, SettingsProvider, TerminalSettings};
pub use crate::core::controller::{Controller, ControllerEvent};
pub use crate::core::keys::{FunctionKey, Key};
pub use crate::core::navigation::NavigationOutcome;
pub use crate::core::screen::{Field, FieldKind, FieldLocator, FieldOrigin, Geometry, Screen};
pub use crate::core::session::{
    Credentials, Session, SessionConfig, SessionError, SessionState, TimingConfig,
};
pub use crate::core::transcript::{Transcript, TranscriptFormat};
pub use crate::core::transport::{
    SshAuth, SshConfig, TelnetConfig, Transport, TransportError, TransportType,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
