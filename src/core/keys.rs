//! Key encodings sent to VT-style hosts

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const ESC: &str = "\u{1b}";

/// Line terminator appended to typed text
pub const LINE_TERMINATOR: &str = "\r\n";

/// A function key, F1 through F24
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FunctionKey(u8);

impl FunctionKey {
    /// Validate a key number
    pub fn new(number: u8) -> Option<Self> {
        (1..=24).contains(&number).then_some(Self(number))
    }

    /// Key number (1-24)
    pub fn number(self) -> u8 {
        self.0
    }

    /// VT220 escape sequence for this key.
    ///
    /// F1-F12 follow the fixed table (which skips codes 16 and 22); F13-F24
    /// use `ESC[{n+10}~`.
    pub fn escape_sequence(self) -> String {
        let code = match self.0 {
            1 => 11,
            2 => 12,
            3 => 13,
            4 => 14,
            5 => 15,
            6 => 17,
            7 => 18,
            8 => 19,
            9 => 20,
            10 => 21,
            11 => 23,
            12 => 24,
            n => u16::from(n) + 10,
        };
        format!("{ESC}[{code}~")
    }
}

impl fmt::Display for FunctionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "F{}", self.0)
    }
}

/// Named special keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Key {
    /// Carriage return + line feed
    Enter,
    /// Horizontal tab
    Tab,
    /// Bare escape
    Escape,
}

impl Key {
    /// Control sequence sent for this key
    pub fn sequence(self) -> &'static str {
        match self {
            Self::Enter => LINE_TERMINATOR,
            Self::Tab => "\t",
            Self::Escape => ESC,
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Enter => write!(f, "ENTER"),
            Self::Tab => write!(f, "TAB"),
            Self::Escape => write!(f, "ESCAPE"),
        }
    }
}

/// Unrecognised key name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unsupported key: {0}")]
pub struct UnknownKey(pub String);

impl FromStr for Key {
    type Err = UnknownKey;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ENTER" => Ok(Self::Enter),
            "TAB" => Ok(Self::Tab),
            "ESCAPE" => Ok(Self::Escape),
            _ => Err(UnknownKey(s.to_string())),
        }
    }
}

/// Cursor positioning escape for a linear screen offset: `ESC[{row+1};{col+1}H`
pub fn cursor_position(offset: usize, width: usize) -> String {
    let width = width.max(1);
    let row = offset / width;
    let col = offset % width;
    format!("{ESC}[{};{}H", row + 1, col + 1)
}
