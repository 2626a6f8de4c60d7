//! CLI exit codes
//!
//! Scripts driving a host branch on these, so the numbers are stable. Library
//! errors are folded onto them by the `From` impls on [`CliResult`].

use crate::config::ConfigError;
use crate::core::session::SessionError;
use crate::core::transport::TransportError;
use std::process::ExitCode;

/// Exit code constants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCodes;

impl ExitCodes {
    /// Command completed
    pub const SUCCESS: u8 = 0;
    /// Unclassified failure
    pub const ERROR: u8 = 1;
    /// Bad key name, key number or argument
    pub const USAGE: u8 = 2;
    /// Host could not be reached
    pub const UNREACHABLE: u8 = 3;
    /// Host did not answer in time
    pub const TIMEOUT: u8 = 4;
    /// Credentials rejected or sign-on screens not seen
    pub const SIGN_ON_FAILED: u8 = 5;
    /// Config file or settings unusable
    pub const CONFIG: u8 = 8;
    /// Connection dropped or used while closed
    pub const PROTOCOL: u8 = 9;
    /// Waited-for text never appeared
    pub const TEXT_NOT_FOUND: u8 = 16;
    /// Field missing from the screen
    pub const FIELD_ERROR: u8 = 17;
    /// Bug
    pub const INTERNAL: u8 = 127;
}

const TABLE: &[(u8, &str)] = &[
    (ExitCodes::SUCCESS, "Success"),
    (ExitCodes::ERROR, "General error"),
    (ExitCodes::USAGE, "Invalid key or argument"),
    (ExitCodes::UNREACHABLE, "Host unreachable"),
    (ExitCodes::TIMEOUT, "Host timed out"),
    (ExitCodes::SIGN_ON_FAILED, "Sign-on failed"),
    (ExitCodes::CONFIG, "Configuration error"),
    (ExitCodes::PROTOCOL, "Connection lost or not open"),
    (ExitCodes::TEXT_NOT_FOUND, "Text not found on screen"),
    (ExitCodes::FIELD_ERROR, "Field not found"),
    (ExitCodes::INTERNAL, "Internal error"),
];

/// Outcome of one CLI command
#[derive(Debug)]
pub enum CliResult {
    /// Completed, optionally with output for stdout
    Success(Option<String>),
    /// Failed with an exit code and a message for stderr
    Error(u8, String),
}

impl CliResult {
    /// Completed without output
    pub fn success() -> Self {
        Self::Success(None)
    }

    /// Completed with output
    pub fn success_with_message(msg: impl Into<String>) -> Self {
        Self::Success(Some(msg.into()))
    }

    /// Failed with `code`
    pub fn error(code: u8, msg: impl Into<String>) -> Self {
        Self::Error(code, msg.into())
    }

    /// `text` did not show up before the timeout
    pub fn pattern_not_found(text: &str) -> Self {
        Self::Error(
            ExitCodes::TEXT_NOT_FOUND,
            format!("Text not found on screen: {text}"),
        )
    }

    /// Process exit status
    pub fn code(&self) -> u8 {
        match self {
            Self::Success(_) => ExitCodes::SUCCESS,
            Self::Error(code, _) => *code,
        }
    }

    /// Output or error text
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Success(Some(msg)) | Self::Error(_, msg) => Some(msg),
            Self::Success(None) => None,
        }
    }

    /// Convert to `ExitCode`
    pub fn to_exit_code(&self) -> ExitCode {
        ExitCode::from(self.code())
    }

    /// Whether the command completed
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

impl From<TransportError> for CliResult {
    fn from(err: TransportError) -> Self {
        let code = match &err {
            TransportError::Unreachable(_) | TransportError::ConnectionFailed(_) => {
                ExitCodes::UNREACHABLE
            }
            TransportError::Timeout(_) => ExitCodes::TIMEOUT,
            TransportError::AuthRejected(_) => ExitCodes::SIGN_ON_FAILED,
            TransportError::ConfigError(_) => ExitCodes::CONFIG,
            TransportError::NotConnected | TransportError::Disconnected => ExitCodes::PROTOCOL,
            TransportError::IoError(_) | TransportError::SendError(_) => ExitCodes::ERROR,
        };
        Self::Error(code, err.to_string())
    }
}

impl From<SessionError> for CliResult {
    fn from(err: SessionError) -> Self {
        let code = match err {
            SessionError::Transport(e) => return e.into(),
            SessionError::LoginFailed { .. } => ExitCodes::SIGN_ON_FAILED,
            SessionError::InvalidFunctionKey(_) | SessionError::UnknownKey(_) => ExitCodes::USAGE,
            SessionError::FieldNotFound(_) => ExitCodes::FIELD_ERROR,
            SessionError::NotConnected => ExitCodes::PROTOCOL,
        };
        Self::Error(code, err.to_string())
    }
}

impl From<ConfigError> for CliResult {
    fn from(err: ConfigError) -> Self {
        Self::Error(ExitCodes::CONFIG, err.to_string())
    }
}

/// Short description of `code`
pub fn exit_code_description(code: u8) -> &'static str {
    TABLE
        .iter()
        .find(|(c, _)| *c == code)
        .map_or("Unknown error", |(_, text)| text)
}

/// Print the exit code table to stdout
pub fn print_exit_codes() {
    println!("Exit codes:");
    for (code, text) in TABLE {
        println!("  {code:>3}  {text}");
    }
}
