//! Screen snapshots
//!
//! A [`Screen`] is an immutable copy of the session's buffer taken at one
//! point in time, together with the fields discovered in it. Anything that
//! talks to the host takes the [`Session`] explicitly and replaces the
//! snapshot afterwards; fields from an older snapshot must not be reused.

mod field;
mod scan;

pub use field::{Field, FieldKind, FieldOrigin};
pub use scan::{discover_fields, distinct_by_span, DiscoveryStrategy, LabeledRuns, UnlabeledRuns};

use super::keys::{cursor_position, Key};
use super::poll::Poller;
use super::session::{Session, SessionError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Terminal size in character cells
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Geometry {
    /// Columns per row
    pub columns: usize,
    /// Rows
    pub rows: usize,
}

impl Default for Geometry {
    fn default() -> Self {
        Self { columns: 80, rows: 24 }
    }
}

/// How to find a field on a screen
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldLocator {
    /// Position in scan order
    Index(usize),
    /// Label, case-insensitive
    Label(String),
    /// Linear screen offset inside the field
    Offset(usize),
}

impl From<usize> for FieldLocator {
    fn from(index: usize) -> Self {
        Self::Index(index)
    }
}

impl From<&str> for FieldLocator {
    fn from(label: &str) -> Self {
        Self::Label(label.to_string())
    }
}

impl fmt::Display for FieldLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index(i) => write!(f, "index {i}"),
            Self::Label(label) => write!(f, "label {label:?}"),
            Self::Offset(offset) => write!(f, "offset {offset}"),
        }
    }
}

/// One screen snapshot and its fields
#[derive(Debug, Clone, Default)]
pub struct Screen {
    text: String,
    fields: Vec<Field>,
    geometry: Geometry,
}

impl Screen {
    /// Snapshot `text` without touching a session
    pub fn from_text(text: &str, geometry: Geometry) -> Self {
        let fields = discover_fields(text);
        tracing::debug!("Screen scanned: {} fields", fields.len());
        Self {
            text: text.to_string(),
            fields,
            geometry,
        }
    }

    /// Pump the session, then snapshot its buffer
    pub async fn capture(session: &mut Session) -> Result<Self, SessionError> {
        session.read_current_screen().await?;
        Ok(Self::from_snapshot(session))
    }

    fn from_snapshot(session: &Session) -> Self {
        Self::from_text(session.current_screen(), session.geometry())
    }

    /// Replace this snapshot with a fresh one
    pub async fn refresh(&mut self, session: &mut Session) -> Result<(), SessionError> {
        *self = Self::capture(session).await?;
        Ok(())
    }

    /// Screen text
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Screen size used for cursor addressing
    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    /// Substring test
    pub fn contains_text(&self, text: &str) -> bool {
        self.text.contains(text)
    }

    /// Lines of the screen, `\n` or `\r\n` separated
    pub fn lines(&self) -> Vec<&str> {
        let mut lines: Vec<&str> = self.text.lines().collect();
        while lines.last().is_some_and(|line| line.is_empty()) {
            lines.pop();
        }
        lines
    }

    /// Line `n` (zero-based), or `""` when out of range
    pub fn line(&self, n: usize) -> &str {
        self.lines().get(n).copied().unwrap_or("")
    }

    /// All fields from both discovery passes, in scan order
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Fields with duplicate spans collapsed, labeled ones preferred
    pub fn distinct_fields(&self) -> Vec<Field> {
        distinct_by_span(&self.fields)
    }

    /// Field by scan order
    pub fn field(&self, index: usize) -> Option<&Field> {
        self.fields.get(index)
    }

    /// First field whose span contains `offset`
    pub fn field_at(&self, offset: usize) -> Option<&Field> {
        self.fields.iter().find(|f| f.contains_offset(offset))
    }

    /// First field whose label equals `label`, ignoring case
    pub fn field_by_label(&self, label: &str) -> Option<&Field> {
        let wanted = label.to_lowercase();
        self.fields
            .iter()
            .find(|f| f.label().is_some_and(|l| l.to_lowercase() == wanted))
    }

    fn position(&self, locator: &FieldLocator) -> Option<usize> {
        match locator {
            FieldLocator::Index(i) => (*i < self.fields.len()).then_some(*i),
            FieldLocator::Label(label) => {
                let wanted = label.to_lowercase();
                self.fields
                    .iter()
                    .position(|f| f.label().is_some_and(|l| l.to_lowercase() == wanted))
            }
            FieldLocator::Offset(offset) => self.fields.iter().position(|f| f.contains_offset(*offset)),
        }
    }

    /// Look a field up by any locator
    pub fn locate(&self, locator: &FieldLocator) -> Option<&Field> {
        self.position(locator).map(|i| &self.fields[i])
    }

    /// Type `value` into a field.
    ///
    /// Moves the cursor to the field start, then sends the value as text. The
    /// local field value is updated but not verified; refresh to see what the
    /// host accepted.
    pub async fn set_field_value(
        &mut self,
        session: &mut Session,
        locator: impl Into<FieldLocator>,
        value: &str,
    ) -> Result<(), SessionError> {
        let locator = locator.into();
        let Some(index) = self.position(&locator) else {
            tracing::warn!("Field not found: {}", locator);
            return Err(SessionError::FieldNotFound(locator.to_string()));
        };

        let field = &mut self.fields[index];
        field.set_value(value);
        let cursor = cursor_position(field.start(), self.geometry.columns);

        session.send_raw(cursor.as_bytes()).await?;
        session.send_text(value).await?;
        tracing::debug!("Set field {} to value '{}'", locator, value);
        Ok(())
    }

    /// Press a function key and snapshot the result
    pub async fn press_function_key(&mut self, session: &mut Session, number: u8) -> Result<(), SessionError> {
        session.send_function_key(number).await?;
        self.refresh(session).await
    }

    /// Press a named key and snapshot the result
    pub async fn press_key(&mut self, session: &mut Session, key: Key) -> Result<(), SessionError> {
        session.press(key).await?;
        self.refresh(session).await
    }

    /// Wait for `text`; the snapshot is refreshed when it appears
    pub async fn wait_for_text(
        &mut self,
        session: &mut Session,
        text: &str,
        timeout: Duration,
    ) -> Result<bool, SessionError> {
        let found = session.wait_for_text(text, timeout).await?;
        if found {
            self.refresh(session).await?;
        }
        Ok(found)
    }

    /// Refresh until the screen text differs from this snapshot's.
    ///
    /// Any difference counts, including cursor or clock artefacts.
    pub async fn wait_for_screen_change(
        &mut self,
        session: &mut Session,
        timeout: Duration,
    ) -> Result<bool, SessionError> {
        let baseline = self.text.clone();
        let poller = Poller::new(session.timing().poll_interval, timeout);

        while !poller.expired() {
            self.refresh(session).await?;
            if self.text != baseline {
                tracing::debug!("Screen change detected");
                return Ok(true);
            }
            poller.wait().await;
        }

        tracing::warn!("Timeout waiting for screen change");
        Ok(false)
    }

    /// Clear the session buffer and snapshot again
    pub async fn clear(&mut self, session: &mut Session) -> Result<(), SessionError> {
        session.clear_screen();
        self.refresh(session).await
    }

    /// Main menu heading visible
    pub fn is_main_menu(&self) -> bool {
        self.contains_text("MAIN MENU") || self.contains_text("Main Menu")
    }

    /// Prompt list (F4) visible
    pub fn is_selection_list(&self) -> bool {
        self.contains_text("Select one of the following")
            || self.contains_text("Position to")
            || self.contains_text("Type choices")
    }

    /// Error wording visible
    pub fn has_errors(&self) -> bool {
        ["Error", "ERROR", "Invalid", "INVALID"]
            .iter()
            .any(|marker| self.contains_text(marker))
    }

    /// Trimmed lines mentioning "error" or "invalid" in any case
    pub fn error_messages(&self) -> Vec<String> {
        self.lines()
            .into_iter()
            .filter(|line| {
                let lower = line.to_lowercase();
                lower.contains("error") || lower.contains("invalid")
            })
            .map(|line| line.trim().to_string())
            .collect()
    }
}

impl fmt::Display for Screen {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Screen {{ fields: {}, has_text: {} }}",
            self.fields.len(),
            !self.text.trim().is_empty()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::session::TimingConfig;
    use crate::core::transport::VirtualHost;
    use tokio::time::Instant;

    const ENTRY: &str = "NEW CONTRACT\nLast Name  : ____________________\nFirst Name : ____________________\n";

    async fn session_on(host: &VirtualHost) -> Session {
        let mut session =
            Session::with_transport("screen", Box::new(host.transport()), TimingConfig::default());
        session.connect().await.unwrap();
        session
    }

    #[test]
    fn test_lookups() {
        let screen = Screen::from_text("Name: ____", Geometry::default());

        assert_eq!(screen.fields().len(), 2);
        assert_eq!(screen.field(1).and_then(Field::label), Some("Name"));
        assert!(screen.field(2).is_none());
        assert_eq!(screen.field_by_label("NAME").map(Field::id), Some(1));
        assert!(screen.field_by_label("Nam").is_none());
        assert_eq!(screen.field_at(7).map(Field::id), Some(0));
        assert!(screen.field_at(10).is_none());
        assert!(screen.locate(&FieldLocator::Label("name".into())).is_some());
        assert_eq!(screen.distinct_fields().len(), 1);
    }

    #[test]
    fn test_lines() {
        let screen = Screen::from_text("ONE\r\nTWO\nTHREE\n\n", Geometry::default());
        assert_eq!(screen.lines(), vec!["ONE", "TWO", "THREE"]);
        assert_eq!(screen.line(1), "TWO");
        assert_eq!(screen.line(9), "");
    }

    #[test]
    fn test_classification() {
        let menu = Screen::from_text("   MAIN MENU\nSelection ===> __", Geometry::default());
        assert!(menu.is_main_menu());
        assert!(!menu.is_selection_list());
        assert!(!menu.has_errors());

        let prompt = Screen::from_text("Select one of the following:\n 1. Life", Geometry::default());
        assert!(prompt.is_selection_list());

        let failed = Screen::from_text(
            "NEW CONTRACT\n  Invalid date entered  \nCPF9801 error on submit\n",
            Geometry::default(),
        );
        assert!(failed.has_errors());
        assert_eq!(
            failed.error_messages(),
            vec!["Invalid date entered", "CPF9801 error on submit"]
        );
    }

    #[test]
    fn test_empty_screen() {
        let screen = Screen::from_text("MAIN MENU", Geometry::default());
        assert!(screen.fields().is_empty());
        assert_eq!(screen.to_string(), "Screen { fields: 0, has_text: true }");
    }

    #[tokio::test(start_paused = true)]
    async fn test_capture_without_markers() {
        let host = VirtualHost::new();
        host.push_frame("Work with Active Jobs");
        let mut session = session_on(&host).await;

        let screen = Screen::capture(&mut session).await.unwrap();
        assert_eq!(screen.text(), "Work with Active Jobs");
        assert!(screen.fields().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_field_value_positions_cursor() {
        let host = VirtualHost::new();
        host.push_frame(ENTRY);
        let mut session = session_on(&host).await;
        let mut screen = Screen::capture(&mut session).await.unwrap();

        let field = screen.field_by_label("First Name").unwrap();
        let expected_cursor = cursor_position(field.start(), 80);

        screen.set_field_value(&mut session, "first name", "JOHN").await.unwrap();

        assert_eq!(host.written_text(), format!("{expected_cursor}JOHN\r\n"));
        assert_eq!(screen.field_by_label("First Name").unwrap().value(), "JOHN");
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_unknown_field() {
        let host = VirtualHost::new();
        host.push_frame(ENTRY);
        let mut session = session_on(&host).await;
        let mut screen = Screen::capture(&mut session).await.unwrap();

        let err = screen
            .set_field_value(&mut session, "Policy", "X")
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::FieldNotFound(_)));
        assert!(screen
            .set_field_value(&mut session, 99usize, "X")
            .await
            .is_err());
        assert!(host.written().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_round_trip_through_echoing_host() {
        let host = VirtualHost::new();
        host.push_frame(ENTRY);
        host.respond_to(
            "SMITH",
            "NEW CONTRACT\nLast Name  : SMITH_______________\nFirst Name : ____________________\n",
        );
        let mut session = session_on(&host).await;
        let mut screen = Screen::capture(&mut session).await.unwrap();

        screen.set_field_value(&mut session, "Last Name", "SMITH").await.unwrap();
        screen.refresh(&mut session).await.unwrap();

        let field = screen.field_by_label("Last Name").unwrap();
        assert_eq!(field.value(), "SMITH");
        assert_eq!(field.length(), 20);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_screen_change_unchanged() {
        let host = VirtualHost::new();
        host.push_frame("MAIN MENU");
        let mut session = session_on(&host).await;
        let mut screen = Screen::capture(&mut session).await.unwrap();

        let start = Instant::now();
        let changed = screen
            .wait_for_screen_change(&mut session, Duration::from_secs(1))
            .await
            .unwrap();
        assert!(!changed);
        assert!(start.elapsed() >= Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_screen_change_detects_new_frame() {
        let host = VirtualHost::new();
        host.push_frame("MAIN MENU");
        let mut session = session_on(&host).await;
        let mut screen = Screen::capture(&mut session).await.unwrap();

        let remote = host.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(350)).await;
            remote.push_frame("BUSINESS MENU");
        });

        let changed = screen
            .wait_for_screen_change(&mut session, Duration::from_secs(5))
            .await
            .unwrap();
        assert!(changed);
        assert_eq!(screen.text(), "BUSINESS MENU");
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_text_refreshes_on_success() {
        let host = VirtualHost::new();
        let mut session = session_on(&host).await;
        let mut screen = Screen::default();

        host.push_frame("Name: ____");
        let found = screen
            .wait_for_text(&mut session, "Name", Duration::from_secs(1))
            .await
            .unwrap();
        assert!(found);
        assert_eq!(screen.text(), "Name: ____");
        assert_eq!(screen.fields().len(), 2);

        let missing = screen
            .wait_for_text(&mut session, "Address", Duration::ZERO)
            .await
            .unwrap();
        assert!(!missing);
    }

    #[tokio::test(start_paused = true)]
    async fn test_press_and_clear() {
        let host = VirtualHost::new();
        host.respond_to("\u{1b}[13~", "MAIN MENU");
        let mut session = session_on(&host).await;
        let mut screen = Screen::default();

        screen.press_function_key(&mut session, 3).await.unwrap();
        assert!(screen.is_main_menu());

        screen.press_key(&mut session, Key::Enter).await.unwrap();
        assert!(screen.is_main_menu());

        screen.clear(&mut session).await.unwrap();
        assert_eq!(screen.text(), "");
    }
}
