//! Decomposition of merge-conflicted text into candidate resolutions.
//!
//! A conflict block looks like:
//!
//! ```text
//! <<<<<<< HEAD
//! local text
//! =======
//! remote text
//! >>>>>>> refs/heads/new
//! ```
//!
//! The divider is optional (a block without one is head-only), and a block
//! may hold several dividers when more than two versions collided. Each
//! block is split into "middles" on its divider lines; the middles of every
//! block are appended, position by position, to the running candidates. When
//! the two sides or two consecutive blocks disagree on how many middles they
//! carry, the shorter list is padded by repeating its first entry.
//!
//! Nested blocks are resolved inside-out: an opening marker inside an open
//! block restarts it, so the innermost block is decomposed first and any
//! candidate still holding markers is decomposed again.

use std::sync::OnceLock;

use regex_lite::Regex;
use tracing::debug;

use crate::models::ConflictRegion;

fn open_marker() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^<{7}\s*HEAD(\s.*)?$").expect("valid open marker pattern"))
}

fn divider() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^={7}.*$").expect("valid divider pattern"))
}

fn close_marker() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^>{7}(\s.*)?$").expect("valid close marker pattern"))
}

fn strip_eol(line: &str) -> &str {
    line.trim_end_matches(['\n', '\r'])
}

/// One matched conflict block, as byte offsets into the scanned text.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ConflictBlock<'a> {
    /// Offset of the opening marker line.
    start: usize,
    /// Offset just past the closing marker line.
    end: usize,
    start_line: usize,
    end_line: usize,
    /// Text between the opening marker and the last divider.
    head: &'a str,
    /// Text between the last divider and the closing marker; `None` when
    /// the block has no divider at all.
    tail: Option<&'a str>,
}

struct OpenBlock {
    start: usize,
    body_start: usize,
    start_line: usize,
    divider: Option<(usize, usize)>,
}

/// Find every innermost conflict block, left to right.
fn scan(text: &str) -> Vec<ConflictBlock<'_>> {
    let mut blocks = Vec::new();
    let mut open: Option<OpenBlock> = None;
    let mut offset = 0;

    for (idx, line) in text.split_inclusive('\n').enumerate() {
        let line_start = offset;
        offset += line.len();
        let content = strip_eol(line);

        if open_marker().is_match(content) {
            open = Some(OpenBlock {
                start: line_start,
                body_start: offset,
                start_line: idx + 1,
                divider: None,
            });
            continue;
        }

        let Some(block) = open.as_mut() else {
            continue;
        };

        if divider().is_match(content) {
            block.divider = Some((line_start, offset));
        } else if close_marker().is_match(content) {
            let (head, tail) = match block.divider {
                Some((div_start, div_end)) => (
                    &text[block.body_start..div_start],
                    Some(&text[div_end..line_start]),
                ),
                None => (&text[block.body_start..line_start], None),
            };
            blocks.push(ConflictBlock {
                start: block.start,
                end: offset,
                start_line: block.start_line,
                end_line: idx + 1,
                head,
                tail,
            });
            open = None;
        }
    }

    blocks
}

/// Split a captured segment at every bare divider line.
fn split_middles(segment: &str) -> Vec<String> {
    let mut middles = vec![String::new()];
    for line in segment.split_inclusive('\n') {
        if divider().is_match(strip_eol(line)) {
            middles.push(String::new());
        } else if let Some(current) = middles.last_mut() {
            current.push_str(line);
        }
    }
    middles
}

/// Grow `items` to `width` entries by repeating its first entry.
pub(crate) fn pad_to_width<T: Clone>(mut items: Vec<T>, width: usize) -> Vec<T> {
    if let Some(first) = items.first().cloned() {
        while items.len() < width {
            items.push(first.clone());
        }
    }
    items
}

/// Append `prefix + middle[i]` to `acc[i]` after padding both to `width`.
fn zip_padded(acc: Vec<String>, prefix: &str, middles: &[String], width: usize) -> Vec<String> {
    let acc = if acc.is_empty() { vec![String::new()] } else { acc };
    let acc = pad_to_width(acc, width);
    let middles = pad_to_width(middles.to_vec(), width);
    acc.into_iter()
        .zip(middles)
        .map(|(mut candidate, middle)| {
            candidate.push_str(prefix);
            candidate.push_str(&middle);
            candidate
        })
        .collect()
}

fn dedup_in_order(candidates: Vec<String>) -> Vec<String> {
    let mut unique: Vec<String> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        if !unique.contains(&candidate) {
            unique.push(candidate);
        }
    }
    unique
}

/// Stateless decomposer of conflict-marked text.
pub struct MergeConflictExtractor;

impl MergeConflictExtractor {
    /// Reduce `text` to the ordered, duplicate-free list of texts it could
    /// resolve to. Text without a conflict block comes back unchanged as
    /// the only candidate.
    pub fn extract(text: &str) -> Vec<String> {
        let blocks = scan(text);
        if blocks.is_empty() {
            return vec![text.to_string()];
        }

        let mut heads: Vec<String> = Vec::new();
        let mut tails: Vec<String> = Vec::new();
        let mut last_end = 0;

        for block in &blocks {
            let prefix = &text[last_end..block.start];
            let head_middles = split_middles(block.head);
            let tail_middles = match block.tail {
                Some(tail) => split_middles(tail),
                None => head_middles.clone(),
            };

            let width = heads
                .len()
                .max(tails.len())
                .max(head_middles.len())
                .max(tail_middles.len());

            heads = zip_padded(heads, prefix, &head_middles, width);
            tails = zip_padded(tails, prefix, &tail_middles, width);
            last_end = block.end;
        }

        let suffix = &text[last_end..];
        let candidates: Vec<String> = heads
            .into_iter()
            .chain(tails)
            .map(|mut candidate| {
                candidate.push_str(suffix);
                candidate
            })
            .flat_map(|candidate| {
                if Self::has_conflict_markers(&candidate) {
                    Self::extract(&candidate)
                } else {
                    vec![candidate]
                }
            })
            .collect();

        let unique = dedup_in_order(candidates);
        debug!(blocks = blocks.len(), candidates = unique.len(), "extracted conflict candidates");
        unique
    }

    /// Whether `text` holds at least one complete conflict block.
    pub fn has_conflict_markers(text: &str) -> bool {
        !scan(text).is_empty()
    }

    /// Line spans of the innermost conflict blocks in `text`.
    pub fn marker_regions(text: &str) -> Vec<ConflictRegion> {
        scan(text)
            .into_iter()
            .map(|b| ConflictRegion {
                start_line: b.start_line,
                end_line: b.end_line,
            })
            .collect()
    }
}
