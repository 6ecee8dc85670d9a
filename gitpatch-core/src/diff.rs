//! Unified diff parsing
//!
//! Accepts `git diff` output, extended headers included, as well as plain
//! `---`/`+++` unified diffs. Only the structure is checked here; whether a
//! hunk actually fits its file is decided when it is applied.
//!
//! Paths lose their first component (`a/`, `b/`) the way `git apply -p1`
//! strips them. Paths from `rename`/`copy` headers are used verbatim.

use std::borrow::Cow;

use crate::change::ChangeStatus;
use crate::error::{PatchError, Result};
use crate::guard::check_tree_path;
use crate::object::{FileMode, ObjectId};

/// Role of a line inside a hunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineTag {
    Context,
    Add,
    Remove,
}

/// One tagged hunk line; `content` keeps its line terminator unless the diff
/// marked it with `\ No newline at end of file`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HunkLine {
    pub tag: LineTag,
    pub content: Vec<u8>,
}

/// A `@@ -a,b +c,d @@` block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hunk {
    pub old_start: usize,
    pub old_lines: usize,
    /// 1-based line in the new file (for an empty new range: the line before it)
    pub new_start: usize,
    pub new_lines: usize,
    pub lines: Vec<HunkLine>,
}

/// All changes to a single file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDiff {
    pub status: ChangeStatus,
    /// `None` for added files
    pub old_path: Option<String>,
    /// `None` for deleted files
    pub new_path: Option<String>,
    pub old_mode: Option<FileMode>,
    pub new_mode: Option<FileMode>,
    pub hunks: Vec<Hunk>,
}

impl FileDiff {
    /// Path used in log lines and error messages
    pub fn display_path(&self) -> &str {
        self.new_path
            .as_deref()
            .or(self.old_path.as_deref())
            .unwrap_or_default()
    }

    /// Every path this diff touches
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.old_path.iter().chain(self.new_path.iter()).map(String::as_str)
    }

    /// Commit a gitlink points at after the change (`+Subproject commit <sha>`)
    pub fn submodule_target(&self) -> Option<ObjectId> {
        self.hunks
            .iter()
            .flat_map(|h| h.lines.iter())
            .filter(|l| l.tag == LineTag::Add)
            .filter_map(|l| {
                let text = std::str::from_utf8(&l.content).ok()?;
                let hex = text.trim_end().strip_prefix("Subproject commit ")?;
                ObjectId::from_hex(hex.get(..40)?).ok()
            })
            .last()
    }
}

fn invalid(line: usize, reason: impl Into<String>) -> PatchError {
    PatchError::InvalidDiff {
        line,
        reason: reason.into(),
    }
}

fn trim_eol(raw: &[u8]) -> &[u8] {
    let raw = raw.strip_suffix(b"\n").unwrap_or(raw);
    raw.strip_suffix(b"\r").unwrap_or(raw)
}

fn header_text(raw: &[u8]) -> Cow<'_, str> {
    String::from_utf8_lossy(trim_eol(raw))
}

/// Parse a C-quoted string at the start of `s`, returning it and the rest
fn unquote(s: &str) -> Option<(String, &str)> {
    let body = s.strip_prefix('"')?;
    let bytes = body.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'"' => return Some((String::from_utf8_lossy(&out).into_owned(), &body[i + 1..])),
            b'\\' => {
                let esc = *bytes.get(i + 1)?;
                i += 2;
                match esc {
                    b'n' => out.push(b'\n'),
                    b't' => out.push(b'\t'),
                    b'r' => out.push(b'\r'),
                    b'a' => out.push(0x07),
                    b'b' => out.push(0x08),
                    b'f' => out.push(0x0c),
                    b'v' => out.push(0x0b),
                    b'0'..=b'7' => {
                        let digits = bytes.get(i - 1..i + 2)?;
                        let text = std::str::from_utf8(digits).ok()?;
                        out.push(u8::from_str_radix(text, 8).ok()?);
                        i += 2;
                    }
                    other => out.push(other),
                }
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    None
}

fn strip_component(path: String) -> String {
    match path.split_once('/') {
        Some((_, rest)) if !rest.is_empty() => rest.to_string(),
        _ => path,
    }
}

/// Path of a `---`/`+++` line; `None` stands for `/dev/null`
fn parse_path_token(token: &str) -> Option<Option<String>> {
    let path = if token.starts_with('"') {
        unquote(token)?.0
    } else {
        // GNU diff appends a tab and a timestamp
        token.split('\t').next().unwrap_or(token).to_string()
    };
    if path == "/dev/null" {
        return Some(None);
    }
    Some(Some(strip_component(path)))
}

/// Split the `a/... b/...` pair of a `diff --git` line
fn parse_git_paths(rest: &str) -> Option<(String, String)> {
    if rest.starts_with('"') {
        let (old, tail) = unquote(rest)?;
        let tail = tail.strip_prefix(' ')?;
        let new = if tail.starts_with('"') {
            unquote(tail)?.0
        } else {
            tail.to_string()
        };
        return Some((old, new));
    }
    if let Some(idx) = rest.find(" \"") {
        let (new, _) = unquote(&rest[idx + 1..])?;
        return Some((rest[..idx].to_string(), new));
    }

    // Unquoted names may contain spaces; prefer the split that yields the
    // same name on both sides.
    if rest.len() % 2 == 1 {
        let mid = rest.len() / 2;
        if rest.as_bytes()[mid] == b' ' {
            let (old, new) = (&rest[..mid], &rest[mid + 1..]);
            if strip_component(old.to_string()) == strip_component(new.to_string()) {
                return Some((old.to_string(), new.to_string()));
            }
        }
    }
    rest.find(" b/")
        .map(|idx| (rest[..idx].to_string(), rest[idx + 1..].to_string()))
}

fn parse_range(s: &str) -> Option<(usize, usize)> {
    match s.split_once(',') {
        Some((start, len)) => Some((start.parse().ok()?, len.parse().ok()?)),
        None => Some((s.parse().ok()?, 1)),
    }
}

fn parse_hunk_header(line: &str) -> Option<(usize, usize, usize, usize)> {
    let rest = line.strip_prefix("@@ -")?;
    let end = rest.find(" @@")?;
    let (old, new) = rest[..end].split_once(" +")?;
    let (old_start, old_lines) = parse_range(old)?;
    let (new_start, new_lines) = parse_range(new)?;
    Some((old_start, old_lines, new_start, new_lines))
}

fn strip_newline(line: Option<&mut HunkLine>) {
    if let Some(line) = line {
        if line.content.last() == Some(&b'\n') {
            line.content.pop();
        }
    }
}

/// Read hunk body lines starting at `i` until the declared counts are used up
fn parse_hunk_body(lines: &[&[u8]], mut i: usize, header: (usize, usize, usize, usize)) -> Result<(Hunk, usize)> {
    let (old_start, old_lines, new_start, new_lines) = header;
    let (mut old_left, mut new_left) = (old_lines, new_lines);
    let mut body: Vec<HunkLine> = Vec::new();

    while old_left > 0 || new_left > 0 {
        let raw = *lines
            .get(i)
            .ok_or_else(|| invalid(i + 1, "hunk ends before its declared length"))?;
        let (tag, content) = match raw.first() {
            Some(b' ') => (LineTag::Context, &raw[1..]),
            Some(b'-') => (LineTag::Remove, &raw[1..]),
            Some(b'+') => (LineTag::Add, &raw[1..]),
            Some(b'\\') => {
                strip_newline(body.last_mut());
                i += 1;
                continue;
            }
            // Context line whose leading space was stripped by an editor
            Some(b'\n') => (LineTag::Context, raw),
            Some(b'\r') if raw == b"\r\n" => (LineTag::Context, raw),
            _ => return Err(invalid(i + 1, "unexpected line inside hunk")),
        };

        let fits = match tag {
            LineTag::Context if old_left > 0 && new_left > 0 => {
                old_left -= 1;
                new_left -= 1;
                true
            }
            LineTag::Remove if old_left > 0 => {
                old_left -= 1;
                true
            }
            LineTag::Add if new_left > 0 => {
                new_left -= 1;
                true
            }
            _ => false,
        };
        if !fits {
            return Err(invalid(i + 1, "hunk is longer than its header declares"));
        }

        body.push(HunkLine {
            tag,
            content: content.to_vec(),
        });
        i += 1;
    }

    if lines.get(i).and_then(|raw| raw.first()) == Some(&b'\\') {
        strip_newline(body.last_mut());
        i += 1;
    }

    let hunk = Hunk {
        old_start,
        old_lines,
        new_start,
        new_lines,
        lines: body,
    };
    Ok((hunk, i))
}

/// Header lines collected for one file until its hunks start
#[derive(Debug, Default)]
struct FileHeader {
    start_line: usize,
    is_git: bool,
    git_old: Option<String>,
    git_new: Option<String>,
    /// `Some(None)` is `/dev/null`
    minus: Option<Option<String>>,
    plus: Option<Option<String>>,
    rename_from: Option<String>,
    rename_to: Option<String>,
    copy_from: Option<String>,
    copy_to: Option<String>,
    new_file_mode: Option<FileMode>,
    deleted_file_mode: Option<FileMode>,
    old_mode: Option<FileMode>,
    new_mode: Option<FileMode>,
    index_mode: Option<FileMode>,
    hunks: Vec<Hunk>,
}

impl FileHeader {
    fn new(start_line: usize) -> Self {
        Self {
            start_line,
            ..Self::default()
        }
    }

    fn apply_extended(&mut self, text: &str, line: usize) -> Result<()> {
        let mode = |value: &str| {
            FileMode::parse(value.trim()).ok_or_else(|| invalid(line, format!("invalid file mode {:?}", value)))
        };
        let name = |value: &str| {
            if value.starts_with('"') {
                unquote(value)
                    .map(|(s, _)| s)
                    .ok_or_else(|| invalid(line, "unterminated quoted path"))
            } else {
                Ok(value.to_string())
            }
        };

        if let Some(v) = text.strip_prefix("new file mode ") {
            self.new_file_mode = Some(mode(v)?);
        } else if let Some(v) = text.strip_prefix("deleted file mode ") {
            self.deleted_file_mode = Some(mode(v)?);
        } else if let Some(v) = text.strip_prefix("old mode ") {
            self.old_mode = Some(mode(v)?);
        } else if let Some(v) = text.strip_prefix("new mode ") {
            self.new_mode = Some(mode(v)?);
        } else if let Some(v) = text.strip_prefix("rename from ") {
            self.rename_from = Some(name(v)?);
        } else if let Some(v) = text.strip_prefix("rename to ") {
            self.rename_to = Some(name(v)?);
        } else if let Some(v) = text.strip_prefix("copy from ") {
            self.copy_from = Some(name(v)?);
        } else if let Some(v) = text.strip_prefix("copy to ") {
            self.copy_to = Some(name(v)?);
        } else if let Some(v) = text.strip_prefix("index ") {
            // index <old>..<new>[ <mode>]
            if let Some((_, m)) = v.split_once(' ') {
                self.index_mode = Some(mode(m)?);
            }
        } else if text.starts_with("Binary files ") || text == "GIT binary patch" {
            return Err(invalid(line, "binary patches are not supported"));
        }
        Ok(())
    }

    fn finish(self) -> Result<FileDiff> {
        let line = self.start_line;
        let status = if self.new_file_mode.is_some() || matches!(self.minus, Some(None)) {
            ChangeStatus::Add
        } else if self.deleted_file_mode.is_some() || matches!(self.plus, Some(None)) {
            ChangeStatus::Delete
        } else if self.rename_from.is_some() || self.rename_to.is_some() {
            ChangeStatus::Rename
        } else if self.copy_from.is_some() || self.copy_to.is_some() {
            ChangeStatus::Copy
        } else {
            ChangeStatus::Modify
        };

        let old_path = self
            .rename_from
            .or(self.copy_from)
            .or(self.minus.flatten())
            .or(self.git_old);
        let new_path = self
            .rename_to
            .or(self.copy_to)
            .or(self.plus.flatten())
            .or(self.git_new);

        let old_mode = self.old_mode.or(self.deleted_file_mode).or(self.index_mode);
        let new_mode = self.new_mode.or(self.new_file_mode).or(self.index_mode);

        let diff = match status {
            ChangeStatus::Add => FileDiff {
                status,
                old_path: None,
                new_path: Some(new_path.ok_or_else(|| invalid(line, "added file has no path"))?),
                old_mode: None,
                new_mode,
                hunks: self.hunks,
            },
            ChangeStatus::Delete => FileDiff {
                status,
                old_path: Some(old_path.ok_or_else(|| invalid(line, "deleted file has no path"))?),
                new_path: None,
                old_mode,
                new_mode: None,
                hunks: self.hunks,
            },
            _ => {
                let old_path = old_path.ok_or_else(|| invalid(line, "file diff has no source path"))?;
                let new_path = new_path.unwrap_or_else(|| old_path.clone());
                if status == ChangeStatus::Modify && new_path != old_path {
                    return Err(invalid(
                        line,
                        format!("{:?} and {:?} differ without a rename or copy header", old_path, new_path),
                    ));
                }
                FileDiff {
                    status,
                    old_path: Some(old_path),
                    new_path: Some(new_path),
                    old_mode,
                    new_mode,
                    hunks: self.hunks,
                }
            }
        };
        for path in diff.paths() {
            check_tree_path(path).map_err(|reason| invalid(line, reason))?;
        }
        Ok(diff)
    }
}

/// Split a unified diff into per-file changes, in the order they appear
pub fn parse_unified_diff(input: &[u8]) -> Result<Vec<FileDiff>> {
    let lines: Vec<&[u8]> = input.split_inclusive(|b| *b == b'\n').collect();
    let mut files = Vec::new();
    let mut current: Option<FileHeader> = None;
    let mut i = 0;

    while i < lines.len() {
        let text = header_text(lines[i]);

        if let Some(rest) = text.strip_prefix("diff --git ") {
            if let Some(done) = current.take() {
                files.push(done.finish()?);
            }
            let mut header = FileHeader::new(i + 1);
            header.is_git = true;
            if let Some((old, new)) = parse_git_paths(rest) {
                header.git_old = Some(strip_component(old));
                header.git_new = Some(strip_component(new));
            }
            current = Some(header);
            i += 1;
            continue;
        }

        if text.starts_with("diff --cc ") || text.starts_with("diff --combined ") {
            return Err(invalid(i + 1, "combined diffs are not supported"));
        }

        if text.starts_with("--- ") {
            let plus_text = lines.get(i + 1).map(|raw| header_text(raw));
            if let Some(plus_text) = plus_text.filter(|t| t.starts_with("+++ ")) {
                let starts_new_file = match &current {
                    Some(h) => !h.is_git || h.minus.is_some() || !h.hunks.is_empty(),
                    None => true,
                };
                if starts_new_file {
                    if let Some(done) = current.take() {
                        files.push(done.finish()?);
                    }
                }
                let header = current.get_or_insert_with(|| FileHeader::new(i + 1));
                header.minus = Some(parse_path_token(&text[4..]).ok_or_else(|| invalid(i + 1, "bad --- path"))?);
                header.plus = Some(parse_path_token(&plus_text[4..]).ok_or_else(|| invalid(i + 2, "bad +++ path"))?);
                i += 2;
                continue;
            }
        }

        if text.starts_with("@@ ") {
            let header = current
                .as_mut()
                .ok_or_else(|| invalid(i + 1, "hunk outside of a file diff"))?;
            let range = parse_hunk_header(&text).ok_or_else(|| invalid(i + 1, "malformed hunk header"))?;
            let (hunk, next) = parse_hunk_body(&lines, i + 1, range)?;
            header.hunks.push(hunk);
            i = next;
            continue;
        }

        if text.starts_with("Binary files ") && text.ends_with(" differ") {
            return Err(invalid(i + 1, "binary patches are not supported"));
        }

        if let Some(header) = current.as_mut() {
            if header.hunks.is_empty() && header.minus.is_none() {
                header.apply_extended(&text, i + 1)?;
            }
        }
        i += 1;
    }

    if let Some(done) = current.take() {
        files.push(done.finish()?);
    }
    Ok(files)
}
