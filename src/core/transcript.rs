//! Session transcript
//!
//! Records what a session sent and which frames it received, with timestamps,
//! into a bounded in-memory buffer and optionally a file.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Transcript output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranscriptFormat {
    /// Plain text
    #[default]
    Text,
    /// Hex dump
    Hex,
    /// JSON lines
    JsonLines,
}

impl TranscriptFormat {
    /// Get file extension for format
    pub fn extension(self) -> &'static str {
        match self {
            Self::Text => "txt",
            Self::Hex => "hex",
            Self::JsonLines => "jsonl",
        }
    }
}

/// Data direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    /// Frame received from the host
    Received,
    /// Bytes written to the host
    Sent,
    /// Local note
    Info,
}

impl Direction {
    fn tag(self) -> &'static str {
        match self {
            Self::Received => "RX",
            Self::Sent => "TX",
            Self::Info => "##",
        }
    }
}

/// A single transcript entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptEntry {
    /// When the entry was recorded
    pub timestamp: DateTime<Local>,
    /// Direction
    pub direction: Direction,
    /// Raw bytes
    pub data: Vec<u8>,
}

impl TranscriptEntry {
    /// Create new entry
    pub fn new(direction: Direction, data: Vec<u8>) -> Self {
        Self {
            timestamp: Local::now(),
            direction,
            data,
        }
    }

    /// Text rendering; control characters are shown escaped
    pub fn to_text(&self) -> String {
        format!(
            "[{}] {} {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S%.3f"),
            self.direction.tag(),
            String::from_utf8_lossy(&self.data).escape_debug()
        )
    }

    /// Hex rendering
    pub fn to_hex(&self) -> String {
        let hex: Vec<String> = self.data.iter().map(|b| format!("{b:02X}")).collect();
        format!(
            "[{}] {} {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S%.3f"),
            self.direction.tag(),
            hex.join(" ")
        )
    }

    /// JSON line
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    fn render(&self, format: TranscriptFormat) -> String {
        match format {
            TranscriptFormat::Text => self.to_text(),
            TranscriptFormat::Hex => self.to_hex(),
            TranscriptFormat::JsonLines => self.to_json(),
        }
    }
}

/// Transcript recorder
pub struct Transcript {
    file: Option<BufWriter<File>>,
    format: TranscriptFormat,
    path: Option<PathBuf>,
    buffer: VecDeque<TranscriptEntry>,
    max_buffer: usize,
}

impl Default for Transcript {
    fn default() -> Self {
        Self::new()
    }
}

impl Transcript {
    /// In-memory only transcript
    pub fn new() -> Self {
        Self {
            file: None,
            format: TranscriptFormat::Text,
            path: None,
            buffer: VecDeque::new(),
            max_buffer: 1000,
        }
    }

    /// Transcript that also appends to `path`
    pub fn to_file(path: &Path, format: TranscriptFormat) -> std::io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let mut transcript = Self::new();
        transcript.file = Some(BufWriter::new(file));
        transcript.format = format;
        transcript.path = Some(path.to_path_buf());
        Ok(transcript)
    }

    /// File path, if writing to one
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Record an entry
    pub fn record(&mut self, direction: Direction, data: &[u8]) {
        let entry = TranscriptEntry::new(direction, data.to_vec());

        if let Some(ref mut file) = self.file {
            if let Err(e) = writeln!(file, "{}", entry.render(self.format)) {
                tracing::warn!("transcript write failed: {}", e);
            }
        }

        self.buffer.push_back(entry);
        while self.buffer.len() > self.max_buffer {
            self.buffer.pop_front();
        }
    }

    /// Record a local note
    pub fn note(&mut self, message: &str) {
        self.record(Direction::Info, message.as_bytes());
    }

    /// Buffered entries, oldest first
    pub fn entries(&self) -> &VecDeque<TranscriptEntry> {
        &self.buffer
    }

    /// Set max buffer size
    pub fn set_max_buffer(&mut self, size: usize) {
        self.max_buffer = size.max(1);
        let excess = self.buffer.len().saturating_sub(self.max_buffer);
        self.buffer.drain(..excess);
    }

    /// Flush to disk
    pub fn flush(&mut self) {
        if let Some(ref mut file) = self.file {
            let _ = file.flush();
        }
    }
}

impl Drop for Transcript {
    fn drop(&mut self) {
        self.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_is_bounded() {
        let mut transcript = Transcript::new();
        transcript.set_max_buffer(2);
        transcript.record(Direction::Sent, b"one");
        transcript.record(Direction::Received, b"two");
        transcript.note("three");

        let entries = transcript.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].data, b"two");
        assert_eq!(entries[1].direction, Direction::Info);
    }

    #[test]
    fn test_long_session_keeps_newest_entries() {
        let mut transcript = Transcript::new();
        transcript.set_max_buffer(100);
        for i in 0..10_000u32 {
            transcript.record(Direction::Received, i.to_string().as_bytes());
        }

        let entries = transcript.entries();
        assert_eq!(entries.len(), 100);
        assert_eq!(entries.front().unwrap().data, b"9900");
        assert_eq!(entries.back().unwrap().data, b"9999");
    }

    #[test]
    fn test_text_file_appends_across_opens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.txt");
        {
            let mut transcript = Transcript::to_file(&path, TranscriptFormat::Text).unwrap();
            assert_eq!(transcript.path(), Some(path.as_path()));
            transcript.record(Direction::Sent, b"QSECOFR\r\n");
            transcript.flush();
        }
        {
            let mut transcript = Transcript::to_file(&path, TranscriptFormat::Text).unwrap();
            transcript.note("reconnected");
        }

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("TX QSECOFR\\r\\n"));
        assert!(lines[1].ends_with("## reconnected"));
    }

    #[test]
    fn test_text_escapes_control_characters() {
        let entry = TranscriptEntry::new(Direction::Sent, b"\x1b[13~".to_vec());
        assert!(entry.to_text().ends_with("TX \\u{1b}[13~"));
        assert!(entry.to_hex().ends_with("TX 1B 5B 31 33 7E"));
    }

    #[test]
    fn test_json_lines_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.jsonl");
        {
            let mut transcript = Transcript::to_file(&path, TranscriptFormat::JsonLines).unwrap();
            transcript.record(Direction::Received, b"Sign On");
            transcript.record(Direction::Sent, b"USER\r\n");
        }

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: TranscriptEntry = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first.direction, Direction::Received);
        assert_eq!(first.data, b"Sign On");
    }
}
