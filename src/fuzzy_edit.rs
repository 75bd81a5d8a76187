//! # Fuzzy File Edit Engine
//!
//! LLM-proposed edits frequently mis-copy the exact indentation of the code they target.
//! This module locates the intended region anyway and splices the replacement in without
//! touching unrelated lines.
//!
//! ## Strategy
//!
//! 1.  **Exact**: the anchor's lines equal exactly one window of whole file lines.
//!     Partial-line hits do not count.
//! 2.  **Fuzzy**: otherwise every window of the anchor's line count is scored on a
//!     whitespace-insensitive axis. Each line is normalized (trailing whitespace dropped,
//!     internal whitespace runs collapsed) and its leading indentation is measured
//!     separately, so relative indentation depth survives normalization.
//!     The score is `0.9 * content + 0.1 * indentation`, where `content` is the
//!     length-weighted mean of per-line character similarity ratios and `indentation` is
//!     the share of lines whose relative depth agrees with the anchor.
//! 3.  **Line range**: the caller addresses lines directly; no search happens.
//!
//! A match is only used when it is unique and scores at or above the threshold. Ties are
//! reported as `AmbiguousMatch`, low scores as `NoConfidentMatch`, both carrying
//! diagnostics for the model to retry with. On success the replacement is re-indented to
//! the file's real indentation at the matched site.

use serde::Serialize;
use serde_json::{Value, json};
use sha1::{Digest, Sha1};
use similar::{ChangeTag, TextDiff};
use std::fmt;

/// Minimum score a fuzzy window needs to be applied.
pub const DEFAULT_MATCH_THRESHOLD: f32 = 0.85;

const CONTENT_WEIGHT: f32 = 0.9;
const INDENT_WEIGHT: f32 = 0.1;
const SCORE_EPSILON: f32 = 1e-6;
const TAB_WIDTH: usize = 4;

/// A 1-indexed, inclusive range of lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LineRange {
    pub start_line: usize,
    pub end_line: usize,
}

impl LineRange {
    pub fn new(start_line: usize, end_line: usize) -> Self {
        Self {
            start_line,
            end_line,
        }
    }

    fn from_window(start_idx: usize, len: usize) -> Self {
        Self::new(start_idx + 1, start_idx + len.max(1))
    }
}

impl fmt::Display for LineRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start_line, self.end_line)
    }
}

/// How the target region of an edit is described.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    /// A snippet of the current file content, matched exactly or fuzzily.
    Anchor(String),
    /// An explicit line range.
    LineRange(LineRange),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditRequest {
    /// Path relative to the workspace root. The engine itself never touches the disk.
    pub path: String,
    pub locator: Locator,
    pub replacement: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStrategy {
    Exact,
    Fuzzy,
    LineRange,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EditOutcome {
    pub content: String,
    pub content_hash: String,
    pub content_len: usize,
    pub matched: LineRange,
    pub lines_changed: usize,
    pub score: f32,
    pub strategy: MatchStrategy,
}

impl EditOutcome {
    pub fn is_noop(&self) -> bool {
        self.lines_changed == 0
    }

    /// Metadata reported back to the model. The new content itself is left out.
    pub fn summary(&self) -> Value {
        json!({
            "strategy": self.strategy,
            "matched_lines": self.matched,
            "score": round_score(self.score),
            "lines_changed": self.lines_changed,
            "content_hash": self.content_hash,
            "content_len": self.content_len,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EditFailureKind {
    InvalidRequest,
    NoConfidentMatch,
    AmbiguousMatch,
}

/// The closest region found for an anchor.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub range: LineRange,
    pub score: f32,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EditFailure {
    pub kind: EditFailureKind,
    pub message: String,
    pub best: Option<Candidate>,
    pub candidates: Vec<LineRange>,
}

impl EditFailure {
    fn invalid(message: impl Into<String>) -> Self {
        Self {
            kind: EditFailureKind::InvalidRequest,
            message: message.into(),
            best: None,
            candidates: Vec::new(),
        }
    }

    /// Structured diagnostics for the failed edit, `Null` when there are none.
    pub fn diagnostics(&self) -> Value {
        if self.best.is_none() && self.candidates.is_empty() {
            return Value::Null;
        }
        let mut details = serde_json::Map::new();
        if let Some(best) = &self.best {
            details.insert(
                "best_candidate".to_string(),
                json!({
                    "lines": best.range,
                    "score": round_score(best.score),
                    "text": best.text,
                }),
            );
        }
        if !self.candidates.is_empty() {
            details.insert("candidates".to_string(), json!(self.candidates));
        }
        Value::Object(details)
    }
}

impl fmt::Display for EditFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

pub type EditResult = Result<EditOutcome, EditFailure>;

/// Applies `EditRequest`s to in-memory file content.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FuzzyEditor {
    threshold: f32,
}

impl Default for FuzzyEditor {
    fn default() -> Self {
        Self::new(DEFAULT_MATCH_THRESHOLD)
    }
}

impl FuzzyEditor {
    pub fn new(threshold: f32) -> Self {
        Self {
            threshold: threshold.clamp(0.0, 1.0),
        }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn apply(&self, content: &str, request: &EditRequest) -> EditResult {
        let doc = Document::parse(content);
        match &request.locator {
            Locator::Anchor(anchor) => self.apply_anchor(&doc, anchor, &request.replacement),
            Locator::LineRange(range) => apply_line_range(&doc, *range, &request.replacement),
        }
    }

    fn apply_anchor(&self, doc: &Document<'_>, anchor: &str, replacement: &str) -> EditResult {
        if anchor.trim().is_empty() {
            return Err(EditFailure::invalid(
                "The search block is empty. Provide the lines to be replaced.",
            ));
        }

        let anchor_lines = trim_blank_edges(anchor.lines().collect());
        let window = anchor_lines.len();
        if window > doc.lines.len() {
            return Err(EditFailure {
                kind: EditFailureKind::NoConfidentMatch,
                message: format!(
                    "Match not found: the search block has {window} lines but the file only has {}.",
                    doc.lines.len()
                ),
                best: None,
                candidates: Vec::new(),
            });
        }

        // Exact strategy: whole lines only, every window counted so overlaps are seen.
        let exact: Vec<usize> = (0..=doc.lines.len() - window)
            .filter(|start| doc.lines[*start..*start + window] == anchor_lines[..])
            .collect();
        match exact.as_slice() {
            [start] => {
                let start = *start;
                let site = &doc.lines[start..start + window];
                let new_lines = reindent(replacement, &anchor_lines, site);
                let content = doc.render(start, start + window, &new_lines);
                return Ok(finish(
                    doc.source,
                    content,
                    LineRange::from_window(start, window),
                    1.0,
                    MatchStrategy::Exact,
                ));
            }
            [_, _, ..] => {
                return Err(ambiguous(
                    exact
                        .iter()
                        .map(|start| LineRange::from_window(*start, window))
                        .collect(),
                ));
            }
            [] => {}
        }

        // Fuzzy strategy.
        let anchor_norm: Vec<NormalizedLine> =
            anchor_lines.iter().map(|l| NormalizedLine::new(l)).collect();
        let file_norm: Vec<NormalizedLine> =
            doc.lines.iter().map(|l| NormalizedLine::new(l)).collect();

        let scores: Vec<f32> = (0..=doc.lines.len() - window)
            .map(|start| score_window(&file_norm[start..start + window], &anchor_norm))
            .collect();
        let best_score = scores.iter().copied().fold(f32::MIN, f32::max);
        let top: Vec<usize> = scores
            .iter()
            .enumerate()
            .filter(|(_, s)| (best_score - **s).abs() <= SCORE_EPSILON)
            .map(|(start, _)| start)
            .collect();
        let best_start = top[0];

        if best_score + SCORE_EPSILON < self.threshold {
            let best = Candidate {
                range: LineRange::from_window(best_start, window),
                score: best_score,
                text: doc.lines[best_start..best_start + window].join("\n"),
            };
            tracing::debug!(score = best_score, range = %best.range, "no confident fuzzy match");
            return Err(EditFailure {
                kind: EditFailureKind::NoConfidentMatch,
                message: format!(
                    "Match not found: the closest region (lines {}) scored {:.2}, below the required {:.2}. Re-read the file and copy the target lines exactly.",
                    best.range, best_score, self.threshold
                ),
                best: Some(best),
                candidates: Vec::new(),
            });
        }

        if top.len() > 1 {
            return Err(ambiguous(
                top.iter()
                    .map(|start| LineRange::from_window(*start, window))
                    .collect(),
            ));
        }

        let site = &doc.lines[best_start..best_start + window];
        let new_lines = reindent(replacement, &anchor_lines, site);
        let content = doc.render(best_start, best_start + window, &new_lines);
        tracing::debug!(score = best_score, start = best_start + 1, "fuzzy match applied");
        Ok(finish(
            doc.source,
            content,
            LineRange::from_window(best_start, window),
            best_score,
            MatchStrategy::Fuzzy,
        ))
    }
}

fn apply_line_range(doc: &Document<'_>, range: LineRange, replacement: &str) -> EditResult {
    if range.start_line == 0 || range.start_line > range.end_line {
        return Err(EditFailure::invalid(format!(
            "Invalid line range {range}: lines are 1-indexed and start_line must not exceed end_line."
        )));
    }
    if range.end_line > doc.lines.len() {
        return Err(EditFailure::invalid(format!(
            "Invalid line range {range}: the file only has {} lines.",
            doc.lines.len()
        )));
    }
    let start = range.start_line - 1;
    let site = &doc.lines[start..range.end_line];
    let new_lines = reindent(replacement, site, site);
    let content = doc.render(start, range.end_line, &new_lines);
    Ok(finish(
        doc.source,
        content,
        range,
        1.0,
        MatchStrategy::LineRange,
    ))
}

fn ambiguous(candidates: Vec<LineRange>) -> EditFailure {
    let listed = candidates
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    EditFailure {
        kind: EditFailureKind::AmbiguousMatch,
        message: format!(
            "Ambiguous match: the search block matches {} locations equally well (lines {listed}). Include more surrounding lines to make it unique.",
            candidates.len()
        ),
        best: None,
        candidates,
    }
}

fn finish(
    original: &str,
    content: String,
    matched: LineRange,
    score: f32,
    strategy: MatchStrategy,
) -> EditOutcome {
    let lines_changed = TextDiff::from_lines(original, content.as_str())
        .iter_all_changes()
        .filter(|change| change.tag() != ChangeTag::Equal)
        .count();
    EditOutcome {
        content_hash: short_hash(&content),
        content_len: content.len(),
        content,
        matched,
        lines_changed,
        score,
        strategy,
    }
}

/// First eight hex digits of the SHA-1 of `content`.
pub fn short_hash(content: &str) -> String {
    let digest = Sha1::digest(content.as_bytes());
    digest
        .iter()
        .take(4)
        .map(|b| format!("{b:02x}"))
        .collect()
}

fn round_score(score: f32) -> f64 {
    (f64::from(score) * 1000.0).round() / 1000.0
}

/// A file split into lines, remembering how to put it back together.
struct Document<'a> {
    source: &'a str,
    lines: Vec<&'a str>,
    eol: &'static str,
    trailing_newline: bool,
}

impl<'a> Document<'a> {
    fn parse(source: &'a str) -> Self {
        Self {
            source,
            lines: source.lines().collect(),
            eol: if source.contains("\r\n") { "\r\n" } else { "\n" },
            trailing_newline: source.ends_with('\n'),
        }
    }

    fn render(&self, start: usize, end: usize, replacement: &[String]) -> String {
        let mut out: Vec<&str> =
            Vec::with_capacity(self.lines.len() - (end - start) + replacement.len());
        out.extend_from_slice(&self.lines[..start]);
        out.extend(replacement.iter().map(String::as_str));
        out.extend_from_slice(&self.lines[end..]);

        let mut rendered = out.join(self.eol);
        if self.trailing_newline && !out.is_empty() {
            rendered.push_str(self.eol);
        }
        rendered
    }
}

#[derive(Debug)]
struct NormalizedLine {
    indent: usize,
    text: String,
}

impl NormalizedLine {
    fn new(line: &str) -> Self {
        Self {
            indent: indent_width(line),
            text: line.split_whitespace().collect::<Vec<_>>().join(" "),
        }
    }

    fn is_blank(&self) -> bool {
        self.text.is_empty()
    }
}

fn score_window(window: &[NormalizedLine], anchor: &[NormalizedLine]) -> f32 {
    let mut weighted = 0.0f32;
    let mut total_weight = 0.0f32;
    for (w, a) in window.iter().zip(anchor) {
        let weight = w.text.len().max(a.text.len()).max(1) as f32;
        let ratio = if w.text == a.text {
            1.0
        } else {
            TextDiff::from_chars(w.text.as_str(), a.text.as_str()).ratio()
        };
        weighted += ratio * weight;
        total_weight += weight;
    }
    let content = weighted / total_weight;

    let window_min = min_indent(window);
    let anchor_min = min_indent(anchor);
    let (mut agree, mut pairs) = (0usize, 0usize);
    for (w, a) in window.iter().zip(anchor) {
        if w.is_blank() || a.is_blank() {
            continue;
        }
        pairs += 1;
        if w.indent - window_min == a.indent - anchor_min {
            agree += 1;
        }
    }
    let indentation = if pairs == 0 {
        1.0
    } else {
        agree as f32 / pairs as f32
    };

    CONTENT_WEIGHT * content + INDENT_WEIGHT * indentation
}

fn min_indent(lines: &[NormalizedLine]) -> usize {
    lines
        .iter()
        .filter(|l| !l.is_blank())
        .map(|l| l.indent)
        .min()
        .unwrap_or(0)
}

/// Rewrites the leading whitespace of `replacement` so that it sits at the indentation of
/// `site` (the real file lines), given that it was written in the same frame as `anchor`.
fn reindent(replacement: &str, anchor: &[&str], site: &[&str]) -> Vec<String> {
    let rep_lines: Vec<&str> = replacement.lines().collect();
    if rep_lines.is_empty() {
        return Vec::new();
    }

    let anchor_min = anchor
        .iter()
        .filter(|l| !is_blank(l))
        .map(|l| indent_width(l))
        .min()
        .unwrap_or(0);
    let anchor_rel: Vec<Option<usize>> = anchor
        .iter()
        .map(|l| (!is_blank(l)).then(|| indent_width(l) - anchor_min))
        .collect();
    let rep_base = rep_lines
        .iter()
        .find(|l| !is_blank(l))
        .map(|l| indent_width(l).min(anchor_min))
        .unwrap_or(0);

    // The site indentation that corresponds to relative depth zero in the anchor frame.
    let frame = anchor_rel
        .iter()
        .zip(site)
        .find_map(|(rel, line)| match rel {
            Some(rel) if !is_blank(line) => Some(shift_indent(leading_ws(line), -(*rel as isize))),
            _ => None,
        })
        .or_else(|| {
            site.iter()
                .find(|l| !is_blank(l))
                .map(|l| leading_ws(l).to_string())
        })
        .unwrap_or_default();

    let mut last: Option<(String, usize)> = None;
    let mut out = Vec::with_capacity(rep_lines.len());
    for (j, line) in rep_lines.iter().enumerate() {
        if is_blank(line) {
            out.push(String::new());
            continue;
        }
        let rel = indent_width(line).saturating_sub(rep_base);
        let body = line.trim_start();
        let aligned = match (anchor_rel.get(j).copied().flatten(), site.get(j)) {
            (Some(anchor_depth), Some(site_line)) if anchor_depth == rel && !is_blank(site_line) => {
                Some(leading_ws(site_line).to_string())
            }
            _ => None,
        };
        let indent = aligned.unwrap_or_else(|| match &last {
            Some((prev, prev_rel)) => shift_indent(prev, rel as isize - *prev_rel as isize),
            None => shift_indent(&frame, rel as isize),
        });
        out.push(format!("{indent}{body}"));
        last = Some((indent, rel));
    }
    out
}

fn trim_blank_edges(mut lines: Vec<&str>) -> Vec<&str> {
    while lines.last().is_some_and(|l| is_blank(l)) {
        lines.pop();
    }
    let leading = lines.iter().take_while(|l| is_blank(l)).count();
    lines.drain(..leading);
    lines
}

fn is_blank(line: &str) -> bool {
    line.trim().is_empty()
}

fn leading_ws(line: &str) -> &str {
    &line[..line.len() - line.trim_start().len()]
}

fn indent_width(line: &str) -> usize {
    leading_ws(line)
        .chars()
        .map(|c| if c == '\t' { TAB_WIDTH } else { 1 })
        .sum()
}

/// Widens or narrows an indentation string by `delta` columns, keeping its style.
fn shift_indent(base: &str, delta: isize) -> String {
    if delta >= 0 {
        let delta = delta as usize;
        let uses_tabs = !base.is_empty() && base.chars().all(|c| c == '\t');
        let extra = if uses_tabs {
            "\t".repeat(delta.div_ceil(TAB_WIDTH))
        } else {
            " ".repeat(delta)
        };
        return format!("{base}{extra}");
    }

    let mut remaining = delta.unsigned_abs();
    let mut chars: Vec<char> = base.chars().collect();
    while remaining > 0 {
        match chars.pop() {
            Some('\t') => remaining = remaining.saturating_sub(TAB_WIDTH),
            Some(_) => remaining -= 1,
            None => break,
        }
    }
    chars.into_iter().collect()
}

#[cfg(test)]
#[path = "fuzzy_edit_tests.rs"]
mod tests;
