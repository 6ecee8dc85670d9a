//! Line-level hunk application
//!
//! Hunks are applied in order against a working copy of the blob's lines.
//! Positions come from the new-side start of each hunk: everything before a
//! hunk has already been rewritten by the hunks preceding it, so the working
//! copy lines up with the new file there.

use crate::diff::{Hunk, LineTag};
use crate::error::{PatchError, Result};

/// Split content into lines, each keeping its `\n` terminator
pub fn split_lines(content: &[u8]) -> Vec<&[u8]> {
    content.split_inclusive(|b| *b == b'\n').collect()
}

/// Zero-based position of the first line a hunk touches
fn base_position(hunk: &Hunk) -> Option<usize> {
    if hunk.new_lines == 0 {
        // An empty range names the line before it
        Some(hunk.new_start)
    } else {
        hunk.new_start.checked_sub(1)
    }
}

/// Apply `hunks` to `original`, returning the new content.
///
/// Removed and context lines must match the working copy byte for byte, and
/// hunks must not go backwards. Any violation is reported as
/// [`PatchError::MalformedHunk`] for `path`.
pub fn apply_hunks(path: &str, original: &[u8], hunks: &[Hunk]) -> Result<Vec<u8>> {
    let malformed = |n: usize, reason: String| PatchError::MalformedHunk {
        path: path.to_string(),
        reason: format!("hunk {}: {}", n + 1, reason),
    };

    let mut lines = split_lines(original);
    let mut applied_up_to = 0usize;

    for (n, hunk) in hunks.iter().enumerate() {
        let base = base_position(hunk).ok_or_else(|| malformed(n, "new range starts at line 0".to_string()))?;
        if base < applied_up_to {
            return Err(malformed(
                n,
                format!("starts at line {} inside or before the previous hunk", base + 1),
            ));
        }

        let mut offset = 0usize;
        for line in &hunk.lines {
            let pos = base + offset;
            match line.tag {
                LineTag::Remove | LineTag::Context => {
                    let current = lines.get(pos).ok_or_else(|| {
                        malformed(n, format!("line {} is past the end of the file ({} lines)", pos + 1, lines.len()))
                    })?;
                    if *current != line.content.as_slice() {
                        let what = if line.tag == LineTag::Remove { "removed" } else { "context" };
                        return Err(malformed(n, format!("{} line {} does not match the file", what, pos + 1)));
                    }
                    if line.tag == LineTag::Remove {
                        lines.remove(pos);
                    } else {
                        offset += 1;
                    }
                }
                LineTag::Add => {
                    if pos > lines.len() {
                        return Err(malformed(
                            n,
                            format!("insert at line {} is past the end of the file ({} lines)", pos + 1, lines.len()),
                        ));
                    }
                    lines.insert(pos, line.content.as_slice());
                    offset += 1;
                }
            }
        }
        applied_up_to = base + offset;
    }

    Ok(lines.concat())
}
