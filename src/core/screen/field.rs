//! Screen fields
//!
//! A [`Field`] is a region of screen text that looks like an input area. It is
//! derived from one snapshot and means nothing once the screen is re-read.

use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::OnceLock;

/// Accepted date shapes: `DD/MM/YYYY`, `YYYY-MM-DD`, `YYYYMMDD`
const DATE_SHAPES: [&str; 3] = [
    r"^[0-9]{2}/[0-9]{2}/[0-9]{4}$",
    r"^[0-9]{4}-[0-9]{2}-[0-9]{2}$",
    r"^[0-9]{8}$",
];

fn date_shapes() -> &'static [Regex] {
    static SHAPES: OnceLock<Vec<Regex>> = OnceLock::new();
    SHAPES.get_or_init(|| DATE_SHAPES.iter().filter_map(|p| Regex::new(p).ok()).collect())
}

/// Which discovery pass produced a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldOrigin {
    /// Bare run of `_`/`.` markers
    UnlabeledRun,
    /// Marker run preceded by `label:` or `label.`
    LabeledRun,
}

/// Field polarity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    /// Accepts input
    #[default]
    Input,
    /// Displays output
    Output,
    /// Static label text
    Label,
    /// Separator
    Separator,
    /// Not classified
    Unknown,
}

/// An addressable region of one screen snapshot.
///
/// `start` and `end` are byte offsets into the screen text, half-open.
/// Equality compares identity (id and span), not value.
#[derive(Debug, Clone, Serialize)]
pub struct Field {
    id: usize,
    start: usize,
    end: usize,
    length: usize,
    value: String,
    label: Option<String>,
    origin: FieldOrigin,
    kind: FieldKind,
    protected: bool,
}

impl Field {
    /// Field from a bare marker run; empty value
    pub fn unlabeled(id: usize, start: usize, end: usize) -> Self {
        Self {
            id,
            start,
            end,
            length: end.saturating_sub(start),
            value: String::new(),
            label: None,
            origin: FieldOrigin::UnlabeledRun,
            kind: FieldKind::Input,
            protected: false,
        }
    }

    /// Field from a labeled marker run, with whatever value was rendered in it
    pub fn labeled(id: usize, start: usize, end: usize, label: &str, value: &str) -> Self {
        Self {
            label: Some(label.trim().to_string()),
            value: value.to_string(),
            origin: FieldOrigin::LabeledRun,
            ..Self::unlabeled(id, start, end)
        }
    }

    /// Set the field kind
    #[must_use]
    pub fn with_kind(mut self, kind: FieldKind) -> Self {
        self.kind = kind;
        self
    }

    /// Mark the field protected
    #[must_use]
    pub fn protected(mut self, protected: bool) -> Self {
        self.protected = protected;
        self
    }

    /// Ordinal in scan order
    pub fn id(&self) -> usize {
        self.id
    }

    /// Start offset
    pub fn start(&self) -> usize {
        self.start
    }

    /// End offset (exclusive)
    pub fn end(&self) -> usize {
        self.end
    }

    /// Declared length
    pub fn length(&self) -> usize {
        self.length
    }

    /// Raw value
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Trimmed label, if any
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Discovery pass
    pub fn origin(&self) -> FieldOrigin {
        self.origin
    }

    /// Polarity
    pub fn kind(&self) -> FieldKind {
        self.kind
    }

    /// Protected flag
    pub fn is_protected(&self) -> bool {
        self.protected
    }

    /// Replace the local value. Nothing is sent to the host.
    pub fn set_value(&mut self, value: &str) {
        tracing::debug!("Field {} value set to: {}", self.id, value);
        self.value = value.to_string();
    }

    /// Clear the local value
    pub fn clear(&mut self) {
        self.set_value("");
    }

    /// True for an empty or whitespace-only value
    pub fn is_empty(&self) -> bool {
        self.value.trim().is_empty()
    }

    /// Value with surrounding whitespace removed
    pub fn value_as_str(&self) -> &str {
        self.value.trim()
    }

    /// Whether the raw value contains `text`
    pub fn contains(&self, text: &str) -> bool {
        self.value.contains(text)
    }

    /// Value as an integer; `None` (with a warning) when it does not parse
    pub fn as_integer(&self) -> Option<i64> {
        let value = self.value_as_str();
        if value.is_empty() {
            return None;
        }
        match value.parse() {
            Ok(n) => Some(n),
            Err(_) => {
                tracing::warn!("Cannot convert field value '{}' to integer", self.value);
                None
            }
        }
    }

    /// Value as a decimal; `None` (with a warning) when it does not parse
    pub fn as_decimal(&self) -> Option<f64> {
        let value = self.value_as_str();
        if value.is_empty() {
            return None;
        }
        match value.parse() {
            Ok(n) => Some(n),
            Err(_) => {
                tracing::warn!("Cannot convert field value '{}' to decimal", self.value);
                None
            }
        }
    }

    /// Whether the value parses as a number
    pub fn is_numeric(&self) -> bool {
        let value = self.value_as_str();
        !value.is_empty() && value.parse::<f64>().is_ok()
    }

    /// Label mentions "date" or "dt"
    pub fn is_date_like(&self) -> bool {
        self.label.as_deref().is_some_and(|label| {
            let label = label.to_lowercase();
            label.contains("date") || label.contains("dt")
        })
    }

    /// Label carries `*` or the word "required"
    pub fn is_required(&self) -> bool {
        self.label
            .as_deref()
            .is_some_and(|label| label.contains('*') || label.to_lowercase().contains("required"))
    }

    /// Required fields must be filled, date-like values must have a known
    /// shape, and values must fit the declared length. Failures are logged.
    pub fn is_valid(&self) -> bool {
        if self.is_empty() {
            if self.is_required() {
                tracing::warn!("Required field {} is empty", self.id);
                return false;
            }
            return true;
        }

        let value = self.value_as_str();
        if self.is_date_like() && !date_shapes().iter().any(|shape| shape.is_match(value)) {
            tracing::warn!("Field {} value '{}' is not a date", self.id, value);
            return false;
        }

        let chars = self.value.chars().count();
        if self.length > 0 && chars > self.length {
            tracing::warn!(
                "Field {} value length {} exceeds maximum {}",
                self.id,
                chars,
                self.length
            );
            return false;
        }

        true
    }

    /// Zero-based screen row of the start offset
    pub fn row(&self, width: usize) -> usize {
        self.start / width.max(1)
    }

    /// Zero-based screen column of the start offset
    pub fn column(&self, width: usize) -> usize {
        self.start % width.max(1)
    }

    /// Whether `offset` lies inside the span
    pub fn contains_offset(&self, offset: usize) -> bool {
        (self.start..self.end).contains(&offset)
    }

    pub(crate) fn same_span(&self, other: &Field) -> bool {
        self.start == other.start && self.end == other.end
    }
}

impl PartialEq for Field {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.start == other.start && self.end == other.end
    }
}

impl Eq for Field {}

impl Hash for Field {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
        self.start.hash(state);
        self.end.hash(state);
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} [{}..{}] len={}",
            self.id, self.start, self.end, self.length
        )?;
        if let Some(label) = &self.label {
            write!(f, " {label:?}")?;
        }
        if !self.value.is_empty() {
            write!(f, " = {:?}", self.value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_value(label: &str, value: &str, length: usize) -> Field {
        Field::labeled(0, 10, 10 + length, label, value)
    }

    #[test]
    fn test_emptiness() {
        assert!(Field::unlabeled(0, 0, 4).is_empty());
        assert!(with_value("Name", "", 4).is_empty());
        assert!(with_value("Name", "   ", 4).is_empty());
        assert!(!with_value("Qty", "0", 4).is_empty());
    }

    #[test]
    fn test_numeric_reads() {
        let qty = with_value("Qty", " 42 ", 6);
        assert_eq!(qty.as_integer(), Some(42));
        assert_eq!(qty.as_decimal(), Some(42.0));
        assert!(qty.is_numeric());

        let amount = with_value("Amount", "12.50", 8);
        assert_eq!(amount.as_integer(), None);
        assert_eq!(amount.as_decimal(), Some(12.5));

        let name = with_value("Name", "SMITH", 8);
        assert_eq!(name.as_integer(), None);
        assert_eq!(name.as_decimal(), None);
        assert!(!name.is_numeric());

        assert_eq!(Field::unlabeled(0, 0, 4).as_integer(), None);
        assert!(!Field::unlabeled(0, 0, 4).is_numeric());
    }

    #[test]
    fn test_required_validation() {
        let required = with_value("Last Name *", "", 10);
        assert!(required.is_required());
        assert!(!required.is_valid());

        let filled = with_value("Last Name *", "SMITH", 10);
        assert!(filled.is_valid());

        let keyword = with_value("Policy (required)", "", 10);
        assert!(keyword.is_required());
        assert!(!keyword.is_valid());

        assert!(!Field::unlabeled(0, 0, 4).is_required());
        assert!(Field::unlabeled(0, 0, 4).is_valid());
    }

    #[test]
    fn test_date_shapes() {
        for good in ["01/02/2024", "2024-02-01", "20240201"] {
            assert!(with_value("Start Date", good, 10).is_valid(), "{good}");
        }
        for bad in ["2024/02/01", "Feb 1 2024"] {
            assert!(!with_value("Start Date", bad, 10).is_valid(), "{bad}");
        }
        assert!(with_value("Birth Dt", "19800101", 8).is_date_like());
        assert!(with_value("Start Date", "", 10).is_valid());
    }

    #[test]
    fn test_length_limit() {
        assert!(with_value("Code", "ABCD", 4).is_valid());
        assert!(!with_value("Code", "ABCDE", 4).is_valid());
    }

    #[test]
    fn test_position_helpers() {
        let field = Field::unlabeled(3, 165, 170);
        assert_eq!(field.length(), 5);
        assert_eq!(field.row(80), 2);
        assert_eq!(field.column(80), 5);
        assert!(field.contains_offset(165));
        assert!(field.contains_offset(169));
        assert!(!field.contains_offset(170));
    }

    #[test]
    fn test_identity_equality() {
        let a = Field::unlabeled(1, 5, 9);
        let mut b = Field::labeled(1, 5, 9, "Name", "X");
        assert_eq!(a, b);
        b.set_value("other");
        assert_eq!(a, b);
        assert_ne!(a, Field::unlabeled(2, 5, 9));
    }

    #[test]
    fn test_contains_and_clear() {
        let mut field = with_value("Name", "SMITH JR", 10);
        assert!(field.contains("JR"));
        assert_eq!(field.value_as_str(), "SMITH JR");
        field.clear();
        assert!(field.is_empty());
        assert!(!field.contains("JR"));
    }

    #[test]
    fn test_defaults() {
        let field = Field::labeled(0, 0, 2, "  Name  ", "");
        assert_eq!(field.label(), Some("Name"));
        assert_eq!(field.origin(), FieldOrigin::LabeledRun);
        assert_eq!(field.kind(), FieldKind::Input);
        assert!(!field.is_protected());

        let field = field.with_kind(FieldKind::Output).protected(true);
        assert_eq!(field.kind(), FieldKind::Output);
        assert!(field.is_protected());
    }
}
