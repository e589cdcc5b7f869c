//! Unified diff generation and safe terminal rendering

use std::fmt::Write;

use console::Style;
use similar::{ChangeTag, DiffOp, TextDiff};

const DIFF_CONTEXT_LINES: usize = 3;

/// Diff generator for unified diffs between two versions of an item
pub struct DiffGenerator;

impl DiffGenerator {
    /// Generate a unified diff from `old` to `new`.
    ///
    /// Headers are `a/<name>` and `b/<name>`; hunks carry three lines of
    /// context. The output contains no timestamps or absolute paths, so the
    /// same inputs always produce the same text. Identical inputs yield only
    /// the two header lines.
    #[must_use]
    pub fn generate(old: &str, new: &str, name: &str) -> String {
        let diff = TextDiff::from_lines(old, new);
        let mut output = String::new();

        writeln!(output, "--- a/{name}").expect("Writing to String should never fail");
        writeln!(output, "+++ b/{name}").expect("Writing to String should never fail");

        for group in diff.grouped_ops(DIFF_CONTEXT_LINES) {
            output.push_str(&hunk_header(&group));

            for op in &group {
                for change in diff.iter_changes(op) {
                    let sign = match change.tag() {
                        ChangeTag::Delete => '-',
                        ChangeTag::Insert => '+',
                        ChangeTag::Equal => ' ',
                    };
                    let value = change.value();
                    let line = value.strip_suffix('\n').unwrap_or(value);

                    writeln!(output, "{sign}{line}").expect("Writing to String should never fail");
                    if change.missing_newline() {
                        output.push_str("\\ No newline at end of file\n");
                    }
                }
            }
        }

        output
    }

    /// Count `(added, removed)` lines between two versions
    #[must_use]
    pub fn count_changes(old: &str, new: &str) -> (usize, usize) {
        let diff = TextDiff::from_lines(old, new);

        let mut added = 0;
        let mut removed = 0;

        for change in diff.iter_all_changes() {
            match change.tag() {
                ChangeTag::Insert => added += 1,
                ChangeTag::Delete => removed += 1,
                ChangeTag::Equal => {}
            }
        }

        (added, removed)
    }
}

fn hunk_header(group: &[DiffOp]) -> String {
    let (Some(first), Some(last)) = (group.first(), group.last()) else {
        return String::new();
    };
    let old_start = first.old_range().start;
    let old_len = last.old_range().end - old_start;
    let new_start = first.new_range().start;
    let new_len = last.new_range().end - new_start;

    format!(
        "@@ -{} +{} @@\n",
        format_range(old_start, old_len),
        format_range(new_start, new_len)
    )
}

fn format_range(start: usize, len: usize) -> String {
    match len {
        0 => format!("{start},0"),
        1 => format!("{}", start + 1),
        _ => format!("{},{len}", start + 1),
    }
}

/// Remove terminal control sequences from untrusted text.
///
/// Strips CSI (`ESC [ ... final`), OSC (`ESC ] ... BEL` or `ESC ] ... ESC \`),
/// DCS/SOS/PM/APC string sequences (terminated by `ESC \`), their 8-bit C1
/// forms, two-byte escapes, and any other C0 control except tab and newline.
#[must_use]
pub fn sanitize_for_terminal(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\x1b' => match chars.next() {
                Some('[') => skip_csi(&mut chars),
                Some(']') => skip_string(&mut chars, true),
                Some('P' | 'X' | '^' | '_') => skip_string(&mut chars, false),
                // Two-byte escape (or a lone trailing ESC): drop both.
                Some(_) | None => {}
            },
            '\u{9b}' => skip_csi(&mut chars),
            '\u{9d}' => skip_string(&mut chars, true),
            '\u{90}' | '\u{98}' | '\u{9e}' | '\u{9f}' => skip_string(&mut chars, false),
            '\t' | '\n' => out.push(c),
            c if c.is_control() => {}
            c => out.push(c),
        }
    }

    out
}

fn skip_csi<I: Iterator<Item = char>>(chars: &mut std::iter::Peekable<I>) {
    // Parameter and intermediate bytes run until a final byte in 0x40..=0x7E.
    for c in chars.by_ref() {
        if ('\x40'..='\x7e').contains(&c) {
            break;
        }
    }
}

fn skip_string<I: Iterator<Item = char>>(chars: &mut std::iter::Peekable<I>, bel_ends: bool) {
    while let Some(c) = chars.next() {
        match c {
            '\x07' if bel_ends => return,
            '\u{9c}' => return,
            '\x1b' => {
                if chars.peek() == Some(&'\\') {
                    chars.next();
                }
                return;
            }
            _ => {}
        }
    }
}

/// Renders diff text for display, sanitizing before optional coloring
#[derive(Debug, Clone, Copy)]
pub struct DiffRenderer {
    color: bool,
}

impl DiffRenderer {
    /// Create a renderer; `color` forces ANSI styling on or off
    #[must_use]
    pub const fn new(color: bool) -> Self {
        Self { color }
    }

    /// Sanitize every line, then color it by its leading marker
    ///
    /// Only the `---`/`+++` lines before the first hunk are file headers;
    /// inside hunks they are removed or added content.
    #[must_use]
    pub fn render(&self, diff: &str) -> String {
        let mut output = String::with_capacity(diff.len());
        let mut in_header = true;

        for raw in diff.lines() {
            let line = sanitize_for_terminal(raw);
            if line.starts_with("@@") {
                in_header = false;
            }
            let styled = if self.color {
                Self::style_for(&line, in_header)
                    .map_or_else(|| line.clone(), |style| style.apply_to(&line).to_string())
            } else {
                line
            };
            output.push_str(&styled);
            output.push('\n');
        }

        output
    }

    fn style_for(line: &str, in_header: bool) -> Option<Style> {
        let style = if line.starts_with("@@") {
            Style::new().cyan()
        } else if in_header && (line.starts_with("+++") || line.starts_with("---")) {
            Style::new().bold()
        } else if line.starts_with('+') {
            Style::new().green()
        } else if line.starts_with('-') {
            Style::new().red()
        } else {
            return None;
        };
        Some(style.force_styling(true))
    }
}
