//! Structured exception model
//!
//! Every evaluation failure is a [`PklError`]: a message, a [`ErrorKind`],
//! an optional cause, source location, member name, hint, captured program
//! values, and a side-channel of inserted stack frames for constant-folded
//! nodes. Following the rest of this codebase's
//! convention, this is a hand-rolled `enum` + manual `Display`/`Error`
//! impls rather than a `thiserror` derive — there is exactly one error type
//! per crate and callers always match on its `kind`.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::value::Value;

/// The error taxonomy. These are *kinds*, not host exception
/// classes — a single `PklError` struct carries one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Normal user-visible evaluation failure with a source location.
    Eval,
    /// A member has no usable value; propagated through `force` when
    /// `allow_undef = false`.
    UndefinedValue,
    /// An `Eval` error produced while computing another value; the inner
    /// error is preserved for debugger tooling.
    Wrapped,
    /// Internal invariant violated (unreachable branch, corrupted state).
    Bug,
    /// Recursion depth exceeded.
    StackOverflow,
}

/// A named value captured at the point a [`PklError`] was raised, e.g.
/// `Value: true` for a failed type check.
#[derive(Debug, Clone)]
pub struct ProgramValue {
    pub name: String,
    pub value: Value,
}

/// A source location, deliberately minimal: the parser/lexer that produces
/// richer spans is an external collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSection {
    pub module_uri: String,
    pub start_line: u32,
    pub start_col: u32,
    pub end_line: u32,
    pub end_col: u32,
}

impl fmt::Display for SourceSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}-{}:{}",
            self.module_uri, self.start_line, self.start_col, self.end_line, self.end_col
        )
    }
}

/// A stack frame inserted by the engine so a constant-folded member's
/// diagnostics look identical to the dynamic path that would have produced
/// the same value.
#[derive(Debug, Clone)]
pub struct InsertedFrame {
    pub call_target: String,
    pub section: SourceSection,
}

/// The structured exception type used throughout the evaluation engine.
#[derive(Debug, Clone)]
pub struct PklError {
    pub kind: ErrorKind,
    pub message: String,
    /// Localization catalog key, when the message was produced from one.
    pub catalog_key: Option<String>,
    pub cause: Option<Arc<PklError>>,
    pub section: Option<SourceSection>,
    pub member_name: Option<String>,
    pub hint: Option<String>,
    pub program_values: Vec<ProgramValue>,
    /// Keyed by call target name; see [`InsertedFrame`].
    pub inserted_frames: HashMap<String, InsertedFrame>,
}

impl PklError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        PklError {
            kind,
            message: message.into(),
            catalog_key: None,
            cause: None,
            section: None,
            member_name: None,
            hint: None,
            program_values: Vec::new(),
            inserted_frames: HashMap::new(),
        }
    }

    pub fn eval(message: impl Into<String>) -> Self {
        PklError::new(ErrorKind::Eval, message)
    }

    pub fn bug(message: impl Into<String>) -> Self {
        PklError::new(ErrorKind::Bug, message)
    }

    pub fn undefined_value(member_name: impl Into<String>) -> Self {
        let name = member_name.into();
        PklError::new(ErrorKind::UndefinedValue, format!("undefined value: {name}"))
            .with_member_name(name)
    }

    /// Wraps `self` as the cause of a new `Wrapped` error computing `what`.
    pub fn wrapped(self, what: impl Into<String>) -> Self {
        PklError::new(ErrorKind::Wrapped, what).with_cause(self)
    }

    pub fn with_cause(mut self, cause: PklError) -> Self {
        self.cause = Some(Arc::new(cause));
        self
    }

    pub fn with_section(mut self, section: SourceSection) -> Self {
        self.section = Some(section);
        self
    }

    pub fn with_member_name(mut self, name: impl Into<String>) -> Self {
        self.member_name = Some(name.into());
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn with_program_value(mut self, name: impl Into<String>, value: Value) -> Self {
        self.program_values.push(ProgramValue {
            name: name.into(),
            value,
        });
        self
    }

    pub fn with_inserted_frame(
        mut self,
        call_target: impl Into<String>,
        section: SourceSection,
    ) -> Self {
        let target = call_target.into();
        self.inserted_frames.insert(
            target.clone(),
            InsertedFrame {
                call_target: target,
                section,
            },
        );
        self
    }

    /// A type-check failure at a read site.
    pub fn type_check_failed(expected: &str, value: &Value) -> Self {
        PklError::eval(format!(
            "expected a value of type `{expected}`, but got `{value:?}`"
        ))
        .with_program_value("Value", value.clone())
    }
}

impl fmt::Display for PklError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(section) = &self.section {
            write!(f, " ({section})")?;
        }
        if let Some(hint) = &self.hint {
            write!(f, "\n{hint}")?;
        }
        Ok(())
    }
}

impl std::error::Error for PklError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

impl From<String> for PklError {
    fn from(message: String) -> Self {
        PklError::eval(message)
    }
}

pub type PklResult<T> = Result<T, PklError>;

/// Damerau-Levenshtein edit distance, used to rank "did you mean" candidates
/// for `CannotFindMember`. Normalized to a 0.0 (no match) – 1.0
/// (identical) similarity; suggestions below ~0.77 are not offered.
pub fn similarity(a: &str, b: &str) -> f64 {
    let len = damerau_levenshtein(a, b);
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        1.0
    } else {
        1.0 - (len as f64 / max_len as f64)
    }
}

fn damerau_levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let (la, lb) = (a.len(), b.len());
    let mut d = vec![vec![0usize; lb + 1]; la + 1];
    for (i, row) in d.iter_mut().enumerate().take(la + 1) {
        row[0] = i;
    }
    for (j, cell) in d[0].iter_mut().enumerate().take(lb + 1) {
        *cell = j;
    }
    for i in 1..=la {
        for j in 1..=lb {
            let cost = if a[i - 1] == b[j - 1] { 0 } else { 1 };
            d[i][j] = (d[i - 1][j] + 1)
                .min(d[i][j - 1] + 1)
                .min(d[i - 1][j - 1] + cost);
            if i > 1 && j > 1 && a[i - 1] == b[j - 2] && a[i - 2] == b[j - 1] {
                d[i][j] = d[i][j].min(d[i - 2][j - 2] + cost);
            }
        }
    }
    d[la][lb]
}

/// Builds the "did you mean" suggestion list for a missing member lookup,
/// sorted by (similarity desc, name length difference asc), with a
/// similarity threshold of 0.77.
pub fn lookup_suggestions(missing: &str, candidates: &[String]) -> Vec<String> {
    const THRESHOLD: f64 = 0.77;
    let mut scored: Vec<(f64, usize, &String)> = candidates
        .iter()
        .map(|c| {
            (
                similarity(missing, c),
                (missing.len() as isize - c.len() as isize).unsigned_abs(),
                c,
            )
        })
        .filter(|(sim, _, _)| *sim >= THRESHOLD)
        .collect();
    scored.sort_by(|a, b| {
        b.0.partial_cmp(&a.0)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.1.cmp(&b.1))
    });
    scored.into_iter().map(|(_, _, c)| c.clone()).collect()
}

/// Builds the full `CannotFindMember` message: suggestions if any exist,
/// else all legal members, else "(none)".
pub fn cannot_find_member(missing: &str, all_members: &[String]) -> PklError {
    let suggestions = lookup_suggestions(missing, all_members);
    let hint = if !suggestions.is_empty() {
        format!("did you mean one of: {}?", suggestions.join(", "))
    } else if !all_members.is_empty() {
        format!("legal members: {}", all_members.join(", "))
    } else {
        "(none)".to_string()
    };
    PklError::eval(format!("cannot find member `{missing}`"))
        .with_member_name(missing)
        .with_hint(hint)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_strings_have_similarity_one() {
        assert_eq!(similarity("name", "name"), 1.0);
    }

    #[test]
    fn close_typo_passes_threshold() {
        // "heigth" vs "height": one transposition
        assert!(similarity("heigth", "height") >= 0.77);
    }

    #[test]
    fn unrelated_strings_fail_threshold() {
        assert!(similarity("abc", "xyz") < 0.77);
    }

    #[test]
    fn suggestions_sorted_by_similarity_desc() {
        let candidates = vec!["heigth".to_string(), "width".to_string()];
        let suggestions = lookup_suggestions("height", &candidates);
        assert_eq!(suggestions, vec!["heigth".to_string()]);
    }

    #[test]
    fn no_candidates_notes_none() {
        let err = cannot_find_member("foo", &[]);
        assert_eq!(err.hint.as_deref(), Some("(none)".to_string()).as_deref());
    }

    #[test]
    fn unrelated_candidates_list_all_members() {
        let err = cannot_find_member("foo", &["bar".to_string(), "baz".to_string()]);
        assert_eq!(err.hint.as_deref(), Some("legal members: bar, baz"));
    }
}
