//! Field discovery
//!
//! Two independent passes over the screen text:
//!
//! 1. [`UnlabeledRuns`]: every run of two or more `_`/`.` characters.
//! 2. [`LabeledRuns`]: `label` + optional whitespace + `.` or `:` + a marker
//!    run. A value the host has already painted at the start of the input
//!    area (`Name: SMITH____`) is taken as the field value and included in
//!    the span.
//!
//! Results are concatenated without de-duplication, so the same run can come
//! back twice (once per pass). [`distinct_by_span`] collapses those.

use super::field::{Field, FieldOrigin};
use regex::Regex;
use std::sync::OnceLock;

const MARKER_RUN: &str = r"[_.]{2,}";
const LABELED_RUN: &str =
    r"(?P<label>[A-Za-z][A-Za-z0-9 \t]*?)[ \t]*[.:](?:[ \t]*(?P<value>[A-Za-z0-9][^_:\r\n]*?))?[ \t]*(?P<run>[_.]{2,})";

fn compiled(cell: &'static OnceLock<Option<Regex>>, pattern: &str) -> Option<&'static Regex> {
    cell.get_or_init(|| Regex::new(pattern).ok()).as_ref()
}

/// A field discovery pass
pub trait DiscoveryStrategy {
    /// Tag carried by fields this pass produces
    fn origin(&self) -> FieldOrigin;

    /// Scan `text`, numbering fields from `first_id`
    fn discover(&self, text: &str, first_id: usize) -> Vec<Field>;
}

/// Pass 1: bare marker runs
#[derive(Debug, Clone, Copy, Default)]
pub struct UnlabeledRuns;

impl DiscoveryStrategy for UnlabeledRuns {
    fn origin(&self) -> FieldOrigin {
        FieldOrigin::UnlabeledRun
    }

    fn discover(&self, text: &str, first_id: usize) -> Vec<Field> {
        static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
        let Some(re) = compiled(&PATTERN, MARKER_RUN) else {
            return Vec::new();
        };

        re.find_iter(text)
            .enumerate()
            .map(|(i, m)| Field::unlabeled(first_id + i, m.start(), m.end()))
            .collect()
    }
}

/// Pass 2: labeled marker runs
#[derive(Debug, Clone, Copy, Default)]
pub struct LabeledRuns;

impl DiscoveryStrategy for LabeledRuns {
    fn origin(&self) -> FieldOrigin {
        FieldOrigin::LabeledRun
    }

    fn discover(&self, text: &str, first_id: usize) -> Vec<Field> {
        static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
        let Some(re) = compiled(&PATTERN, LABELED_RUN) else {
            return Vec::new();
        };

        re.captures_iter(text)
            .filter_map(|caps| {
                let label = caps.name("label")?;
                let run = caps.name("run")?;
                let (start, value) = match caps.name("value") {
                    Some(value) => (value.start(), value.as_str().trim_end()),
                    None => (run.start(), ""),
                };
                Some((label.as_str(), start, run.end(), value))
            })
            .enumerate()
            .map(|(i, (label, start, end, value))| {
                Field::labeled(first_id + i, start, end, label, value)
            })
            .collect()
    }
}

/// Run both passes; labeled ids continue after the unlabeled ones
pub fn discover_fields(text: &str) -> Vec<Field> {
    let mut fields = UnlabeledRuns.discover(text, 0);
    let labeled = LabeledRuns.discover(text, fields.len());
    fields.extend(labeled);
    fields
}

/// Keep one field per span, preferring the labeled one, in scan order
pub fn distinct_by_span(fields: &[Field]) -> Vec<Field> {
    let mut distinct: Vec<Field> = Vec::with_capacity(fields.len());
    for field in fields {
        match distinct.iter_mut().find(|kept| kept.same_span(field)) {
            Some(kept) => {
                if kept.origin() == FieldOrigin::UnlabeledRun
                    && field.origin() == FieldOrigin::LabeledRun
                {
                    *kept = field.clone();
                }
            }
            None => distinct.push(field.clone()),
        }
    }
    distinct
}
