use std::ops::Range;
use std::sync::Arc;

use imara_diff::{Algorithm, Diff, Hunk, IndentHeuristic, IndentLevel, InternedInput};


const ALGORITHM: Algorithm = Algorithm::Histogram;

/// Split `text` into its lines.
///
/// A trailing separator does not produce an extra empty final line, and
/// `\r\n` endings are normalized away. Both sides of a projection must be
/// tokenized by this same rule.
pub fn tokenize(text: &str) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }
    let mut lines: Vec<String> = text
        .split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line).to_owned())
        .collect();
    if text.ends_with('\n') {
        lines.pop();
    }
    lines
}

/// The tracked line range within one revision's text.
///
/// `Empty` means the tracked range no longer exists in this revision, and by
/// construction in every older revision as well. Blocks are immutable and
/// compared structurally, never by identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    Lines(LineBlock),
    Empty,
}

/// A non-empty [`Block`]: the tokenized full text of one revision plus the
/// `[start, end)` line range tracked within it.
///
/// Invariant: `start <= end <= lines.len()` and `start < end`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineBlock {
    lines: Arc<[String]>,
    range: Range<u32>,
}

impl Block {
    /// Block over the caller's own text and selection.
    ///
    /// Out-of-bounds selections are clamped to the text; a selection that
    /// clamps to nothing is [`Block::Empty`].
    pub fn new(text: &str, selection: Range<u32>) -> Block {
        let lines: Arc<[String]> = tokenize(text).into();
        let end = selection.end.min(lines.len() as u32);
        let start = selection.start.min(end);
        if start == end {
            Block::Empty
        } else {
            Block::Lines(LineBlock {
                lines,
                range: start..end,
            })
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Block::Empty)
    }

    pub fn as_lines(&self) -> Option<&LineBlock> {
        match self {
            Block::Lines(block) => Some(block),
            Block::Empty => None,
        }
    }
}

impl LineBlock {
    /// Full tokenized text this block was computed against.
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Tracked `[start, end)` line range within [`lines`].
    ///
    /// [`lines`]: LineBlock::lines
    pub fn range(&self) -> Range<u32> {
        self.range.clone()
    }

    /// The tracked lines joined back into text, one terminator per line.
    pub fn content(&self) -> String {
        let mut out = String::new();
        for line in &self.lines[self.range.start as usize..self.range.end as usize] {
            out.push_str(line);
            out.push('\n');
        }
        out
    }

    /// Project the tracked range into `older_text`, the raw text of the
    /// immediately older revision.
    ///
    /// Runs a line diff between this block's text and `older_text`, then
    /// maps both range boundaries into the older coordinate space: a
    /// boundary in an equal region shifts by that region's fixed offset,
    /// while a boundary touching a hunk snaps to the hunk's old-side
    /// boundary, so the projected range always covers an overlapped hunk
    /// completely. A range fully consumed by deletions projects to
    /// [`Block::Empty`].
    pub fn project(&self, older_text: &str) -> Block {
        let older_lines = tokenize(older_text);

        let mut input = InternedInput::default();
        input.update_before(self.lines.iter().map(String::as_str));
        input.update_after(older_lines.iter().map(String::as_str));

        let mut diff = Diff::default();
        diff.compute_with(
            ALGORITHM,
            &input.before,
            &input.after,
            input.interner.num_tokens(),
        );
        diff.postprocess_with_heuristic(
            &input,
            IndentHeuristic::new(|token| {
                IndentLevel::for_ascii_line(input.interner[token].bytes(), 4)
            }),
        );

        let hunks: Vec<Hunk> = diff.hunks().collect();
        let start = map_boundary(self.range.start, &hunks, false);
        let end = map_boundary(self.range.end, &hunks, true);
        debug_assert!(start <= end);
        if start == end {
            Block::Empty
        } else {
            Block::Lines(LineBlock {
                lines: older_lines.into(),
                range: start..end,
            })
        }
    }
}

/// Map one range boundary from the block's coordinate space (the diff's
/// `before` side) into the older text's (`after` side).
///
/// `snap_to_end` distinguishes the exclusive end boundary, which snaps to an
/// overlapped hunk's old-side end, from the start boundary, which snaps to
/// its old-side start. A boundary that coincides with a pure old-side
/// insertion absorbs the inserted lines: over-inclusion is preferred over
/// silently dropping part of the tracked range.
fn map_boundary(pos: u32, hunks: &[Hunk], snap_to_end: bool) -> u32 {
    let mut shift = 0i64;
    for hunk in hunks {
        if pos < hunk.before.start {
            break;
        }
        if pos < hunk.before.end || (hunk.before.is_empty() && pos == hunk.before.start) {
            return if snap_to_end {
                hunk.after.end
            } else {
                hunk.after.start
            };
        }
        shift = i64::from(hunk.after.end) - i64::from(hunk.before.end);
    }
    (i64::from(pos) + shift) as u32
}
