//! Decoding of the symbolic executor's textual trace.
//!
//! The engine prints some banner text, then one record per executed command.
//! A record is a tag line such as `M@assign` followed by a fixed number of
//! payload lines whose meaning depends only on their position. After the last
//! record the engine may print the final store and heap on two more lines.

use std::fmt;

use indexmap::IndexMap;
use lazy_static::lazy_static;
use log::{debug, trace};
use regex::Regex;
use serde::Serialize;

use crate::error::{DecodeResult, TraceFormatError};

/// Marker every record tag line carries.
pub const SENTINEL: &str = "M@";

lazy_static! {
    static ref TAG_PATTERN: Regex = Regex::new(r"M@(\w+)").expect("tag pattern is a valid regex");
    static ref GROUP_SEPARATOR: Regex =
        Regex::new(r"\s*,\s*\(").expect("group separator is a valid regex");
    static ref COMPONENT_SEPARATOR: Regex =
        Regex::new(r"\s*,\s*").expect("component separator is a valid regex");
}

/// A store (variable to value) or heap (address to value) snapshot.
///
/// Iteration follows insertion order, which the diagram layout depends on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct HeapStoreMapping(IndexMap<String, String>);

impl HeapStoreMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses `[(k1, v1), (k2, v2), ...]`. Returns `None` when the brackets
    /// are missing or a pair does not have exactly two components.
    pub fn parse(text: &str) -> Option<Self> {
        let body = text.trim().strip_prefix('[')?.strip_suffix(']')?.trim();
        let mut mapping = Self::new();
        if body.is_empty() {
            return Some(mapping);
        }

        for group in GROUP_SEPARATOR.split(body) {
            let group = group.replace(['(', ')'], "");
            match COMPONENT_SEPARATOR.split(group.trim()).collect::<Vec<_>>().as_slice() {
                [key, value] if !key.is_empty() => mapping.insert(key.trim(), value.trim()),
                _ => return None,
            }
        }
        Some(mapping)
    }

    /// Later inserts of an existing key overwrite its value but keep its position.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for HeapStoreMapping {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut mapping = Self::new();
        for (key, value) in iter {
            mapping.insert(key, value);
        }
        mapping
    }
}

impl fmt::Display for HeapStoreMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, (key, value)) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "({key}, {value})")?;
        }
        f.write_str("]")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Assign,
    New,
    Dispose,
    Lookup,
    Mutate,
    Conditional,
}

impl RecordKind {
    pub fn from_tag(tag: &str) -> Option<Self> {
        let kind = match tag {
            "assign" => RecordKind::Assign,
            "new" => RecordKind::New,
            "dispose" => RecordKind::Dispose,
            "lookup" => RecordKind::Lookup,
            "mutate" => RecordKind::Mutate,
            "conditional" => RecordKind::Conditional,
            _ => return None,
        };
        Some(kind)
    }

    pub const fn tag(self) -> &'static str {
        match self {
            RecordKind::Assign => "assign",
            RecordKind::New => "new",
            RecordKind::Dispose => "dispose",
            RecordKind::Lookup => "lookup",
            RecordKind::Mutate => "mutate",
            RecordKind::Conditional => "conditional",
        }
    }

    /// Lines following the tag line. This table and [`RecordKind::stage`] are
    /// the whole wire contract with the engine.
    pub const fn payload_len(self) -> usize {
        match self {
            RecordKind::Assign
            | RecordKind::New
            | RecordKind::Lookup
            | RecordKind::Mutate => 6,
            RecordKind::Dispose => 5,
            RecordKind::Conditional => 4,
        }
    }

    /// Builds a stage from exactly [`RecordKind::payload_len`] lines, the
    /// first of which sits on line `first_line` of the trace.
    fn stage(self, payload: &[&str], first_line: usize) -> DecodeResult<Stage> {
        let mapping = |offset: usize| parse_mapping(payload[offset], first_line + offset);

        // (description, index of the initial store line, whether final state follows)
        let (description, state_at, has_final) = match (self, payload) {
            (RecordKind::Assign, [var, exp, ..]) => (format!("{var} := {exp}"), 2, true),
            (RecordKind::New, [var, exp, ..]) => (format!("{var} := new({exp})"), 2, true),
            (RecordKind::Mutate, [var, exp, ..]) => (format!("[{var}] := {exp}"), 2, true),
            (RecordKind::Lookup, [dst, src, ..]) => (format!("{dst} := [{src}]"), 2, true),
            (RecordKind::Dispose, [var, ..]) => (format!("free({var})"), 1, true),
            (RecordKind::Conditional, [cond, _, _, branch, ..]) => {
                (format!("if {cond} (taking branch: {branch})"), 1, false)
            }
            _ => unreachable!("payload is sized by payload_len"),
        };

        let initial_store = mapping(state_at)?;
        let initial_heap = mapping(state_at + 1)?;
        let (final_store, final_heap) = if has_final {
            (mapping(state_at + 2)?, mapping(state_at + 3)?)
        } else {
            (initial_store.clone(), initial_heap.clone())
        };

        Ok(Stage {
            kind: self,
            initial_heap,
            initial_store,
            final_heap,
            final_store,
            description,
        })
    }
}

/// One executed command with the state before and after it.
///
/// For a conditional the final state is the initial one; the taken branch
/// shows up as the stages that follow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Stage {
    pub kind: RecordKind,
    pub initial_heap: HeapStoreMapping,
    pub initial_store: HeapStoreMapping,
    pub final_heap: HeapStoreMapping,
    pub final_store: HeapStoreMapping,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FinalState {
    pub store: HeapStoreMapping,
    pub heap: HeapStoreMapping,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Trace {
    pub stages: Vec<Stage>,
    pub final_state: Option<FinalState>,
}

fn parse_mapping(text: &str, line: usize) -> DecodeResult<HeapStoreMapping> {
    HeapStoreMapping::parse(text).ok_or_else(|| TraceFormatError::MalformedMapping {
        line,
        text: text.to_owned(),
    })
}

/// Takes the payload of the record whose tag sits at `at`.
fn read_record<'a>(
    lines: &'a [&'a str],
    at: usize,
    kind: RecordKind,
) -> DecodeResult<&'a [&'a str]> {
    let start = at + 1;
    let end = start + kind.payload_len();
    lines.get(start..end).ok_or(TraceFormatError::TruncatedRecord {
        line: at + 1,
        tag: kind.tag(),
        expected: kind.payload_len(),
        available: lines.len().saturating_sub(start),
    })
}

/// Decodes the stages of a trace, ignoring any final state lines.
pub fn decode(text: &str) -> DecodeResult<Vec<Stage>> {
    decode_trace(text).map(|trace| trace.stages)
}

pub fn decode_trace(text: &str) -> DecodeResult<Trace> {
    let lines = text.lines().collect::<Vec<_>>();
    let mut cursor = lines
        .iter()
        .position(|line| line.contains(SENTINEL))
        .ok_or(TraceFormatError::MissingSentinel { sentinel: SENTINEL })?;
    debug!("skipped {cursor} lines of engine preamble");

    let mut stages = Vec::new();
    let mut final_state = None;

    while cursor < lines.len() {
        let line = lines[cursor];
        if line.trim().is_empty() {
            cursor += 1;
            continue;
        }

        if let Some(caps) = TAG_PATTERN.captures(line) {
            let tag = &caps[1];
            let kind = RecordKind::from_tag(tag).ok_or_else(|| TraceFormatError::UnknownTag {
                line: cursor + 1,
                tag: tag.to_owned(),
            })?;
            let payload = read_record(&lines, cursor, kind)?;
            let stage = kind.stage(payload, cursor + 2)?;
            trace!("line {}: {}", cursor + 1, stage.description);
            stages.push(stage);
            cursor += 1 + kind.payload_len();
            continue;
        }

        let rest = (cursor..lines.len())
            .filter(|&i| !lines[i].trim().is_empty())
            .collect::<Vec<_>>();
        match rest.as_slice() {
            [store, heap] if !lines[*heap].contains(SENTINEL) => {
                final_state = Some(FinalState {
                    store: parse_mapping(lines[*store], store + 1)?,
                    heap: parse_mapping(lines[*heap], heap + 1)?,
                });
            }
            _ => {
                return Err(TraceFormatError::UnexpectedLine {
                    line: cursor + 1,
                    text: line.to_owned(),
                })
            }
        }
        break;
    }

    debug!("decoded {} stages", stages.len());
    Ok(Trace {
        stages,
        final_state,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const ASSIGN_THEN_NEW: &str = "\
GNU Prolog 1.4.5
compiling symbex.pl for byte code...
M@assign
x
1
[]
[]
[(x, 1)]
[]
M@new
y
x
[(x, 1)]
[]
[(x, 1), (y, 3)]
[(3, 1)]
";

    #[test]
    fn test_parse_mapping() {
        let mapping = HeapStoreMapping::parse("[(x, 1), (y, a2)]").unwrap();
        let pairs = mapping.iter().collect::<Vec<_>>();
        assert_eq!(pairs, [("x", "1"), ("y", "a2")]);
        assert_eq!(mapping.to_string(), "[(x, 1), (y, a2)]");
    }

    #[test]
    fn test_parse_empty_mapping() {
        assert!(HeapStoreMapping::parse("[]").unwrap().is_empty());
        assert!(HeapStoreMapping::parse("  [ ]  ").unwrap().is_empty());
    }

    #[test]
    fn test_parse_mapping_tight_spacing() {
        let mapping = HeapStoreMapping::parse("[(x,1),(y,2)]").unwrap();
        assert_eq!(mapping.get("y"), Some("2"));
        assert_eq!(mapping.len(), 2);
    }

    #[test]
    fn test_duplicate_key_last_write_wins() {
        let mapping = HeapStoreMapping::parse("[(x, 1), (y, 2), (x, 3)]").unwrap();
        assert_eq!(mapping.iter().collect::<Vec<_>>(), [("x", "3"), ("y", "2")]);
    }

    #[test]
    fn test_malformed_mappings() {
        assert_eq!(HeapStoreMapping::parse("(x, 1)"), None);
        assert_eq!(HeapStoreMapping::parse("[(x)]"), None);
        assert_eq!(HeapStoreMapping::parse("[(x, 1, 2)]"), None);
    }

    #[test]
    fn test_decode_skips_preamble() {
        let stages = decode(ASSIGN_THEN_NEW).unwrap();
        assert_eq!(stages.len(), 2);

        assert_eq!(stages[0].kind, RecordKind::Assign);
        assert_eq!(stages[0].description, "x := 1");
        assert!(stages[0].initial_store.is_empty());
        assert!(stages[0].initial_heap.is_empty());
        assert_eq!(stages[0].final_store.get("x"), Some("1"));

        assert_eq!(stages[1].description, "y := new(x)");
        assert_eq!(stages[1].final_store.get("y"), Some("3"));
        assert_eq!(stages[1].final_heap.get("3"), Some("1"));
    }

    #[test]
    fn test_decode_conditional_keeps_state() {
        let text = "M@conditional\nlt(x, 1)\n[(x, 0)]\n[(1, 5)]\nthen\n";
        let stages = decode(text).unwrap();
        assert_eq!(stages.len(), 1);
        let stage = &stages[0];
        assert_eq!(stage.description, "if lt(x, 1) (taking branch: then)");
        assert_eq!(stage.final_store, stage.initial_store);
        assert_eq!(stage.final_heap, stage.initial_heap);
        assert_eq!(stage.initial_heap.get("1"), Some("5"));
    }

    #[test]
    fn test_decode_dispose_lookup_mutate() {
        let text = "\
M@mutate
p
7
[(p, 1)]
[(1, 0)]
[(p, 1)]
[(1, 7)]
M@lookup
q
p
[(p, 1)]
[(1, 7)]
[(p, 1), (q, 7)]
[(1, 7)]
M@dispose
p
[(p, 1), (q, 7)]
[(1, 7)]
[(p, 1), (q, 7)]
[]
";
        let descriptions = decode(text)
            .unwrap()
            .into_iter()
            .map(|stage| stage.description)
            .collect::<Vec<_>>();
        assert_eq!(descriptions, ["[p] := 7", "q := [p]", "free(p)"]);
    }

    #[test]
    fn test_decode_final_state() {
        let text = format!("{ASSIGN_THEN_NEW}[(x, 1), (y, 3)]\n[(3, 1)]\n");
        let trace = decode_trace(&text).unwrap();
        assert_eq!(trace.stages.len(), 2);
        let final_state = trace.final_state.unwrap();
        assert_eq!(final_state.store.to_string(), "[(x, 1), (y, 3)]");
        assert_eq!(final_state.heap.to_string(), "[(3, 1)]");
        assert!(decode_trace(ASSIGN_THEN_NEW).unwrap().final_state.is_none());
    }

    #[test]
    fn test_missing_sentinel() {
        assert_eq!(
            decode("no records here\n").unwrap_err(),
            TraceFormatError::MissingSentinel { sentinel: SENTINEL }
        );
    }

    #[test]
    fn test_unknown_tag() {
        assert_eq!(
            decode("banner\nM@while\nx\n").unwrap_err(),
            TraceFormatError::UnknownTag {
                line: 2,
                tag: "while".into()
            }
        );
    }

    #[test]
    fn test_truncated_record() {
        let err = decode("M@assign\nx\n1\n[]\n").unwrap_err();
        assert_eq!(
            err,
            TraceFormatError::TruncatedRecord {
                line: 1,
                tag: "assign",
                expected: 6,
                available: 3,
            }
        );
    }

    #[test]
    fn test_bad_mapping_line_reported() {
        let err = decode("M@dispose\np\n[(p, 1)]\nnot a list\n[]\n[]\n").unwrap_err();
        assert_eq!(
            err,
            TraceFormatError::MalformedMapping {
                line: 4,
                text: "not a list".into()
            }
        );
    }

    #[test]
    fn test_stray_text_after_records() {
        let text = format!("{ASSIGN_THEN_NEW}yes\n");
        assert_eq!(
            decode(&text).unwrap_err(),
            TraceFormatError::UnexpectedLine {
                line: 17,
                text: "yes".into()
            }
        );
    }
}
