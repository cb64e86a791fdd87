//! Line-oriented editor for `key = value` documents with `[section]` headers.
//!
//! The editor never builds a document tree. Each line is classified on its
//! own and only the lines belonging to the edited key are touched, so
//! comments, blank lines, ordering, and unrelated keys survive verbatim.
//! The only global rewrite is output normalization: line endings become
//! `\n`, trailing blank lines are dropped, and the document ends with a
//! single newline.

use std::fmt;

use crate::error::ConfigError;

/// A validated dotted key path such as `provision.volume`.
///
/// Every segment except the last names the section; the last names the key.
/// A single-segment path addresses the root table. A path always has at
/// least one segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPath {
    section: Vec<String>,
    key: String,
}

impl KeyPath {
    /// Parse and validate a dotted key path.
    ///
    /// Segments must be non-empty and use only ASCII letters, digits, `_`,
    /// or `-`.
    ///
    /// ```
    /// use devbox_cli::config::editor::KeyPath;
    ///
    /// let path = KeyPath::parse("provision.volume").unwrap();
    /// assert_eq!(path.section().as_deref(), Some("provision"));
    /// assert_eq!(path.key(), "volume");
    /// assert!(KeyPath::parse("provision..volume").is_err());
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidKey`] for an empty path, an empty
    /// segment, or a segment with other characters.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidKey {
            key: raw.to_string(),
            reason: reason.to_string(),
        };
        let mut segments = Vec::new();
        for segment in raw.split('.') {
            if segment.is_empty() {
                return Err(invalid("empty segment"));
            }
            if !segment.chars().all(is_bare_key_char) {
                return Err(invalid(
                    "segments may only contain letters, digits, '_' and '-'",
                ));
            }
            segments.push(segment.to_string());
        }
        let key = segments.pop().ok_or_else(|| invalid("empty key"))?;
        Ok(Self {
            section: segments,
            key,
        })
    }

    /// The key name (last segment).
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The dotted section name, or `None` for a root-level key.
    #[must_use]
    pub fn section(&self) -> Option<String> {
        if self.section.is_empty() {
            None
        } else {
            Some(self.section.join("."))
        }
    }

    /// Whether the key lives in the root table.
    #[must_use]
    pub const fn is_root(&self) -> bool {
        self.section.is_empty()
    }
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in &self.section {
            write!(f, "{segment}.")?;
        }
        f.write_str(&self.key)
    }
}

/// A value written by [`format_assignment`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingValue {
    /// Quoted, escaped string.
    String(String),
    /// Bare `true` / `false`.
    Boolean(bool),
    /// Bare decimal integer.
    Integer(i64),
}

impl SettingValue {
    /// Interpret command-line input: `true`/`false` and integers are typed,
    /// anything else is a string.
    #[must_use]
    pub fn infer(raw: &str) -> Self {
        match raw {
            "true" => Self::Boolean(true),
            "false" => Self::Boolean(false),
            _ => raw
                .parse::<i64>()
                .map_or_else(|_| Self::String(raw.to_string()), Self::Integer),
        }
    }

    /// Render the value as it appears to the right of `=`.
    #[must_use]
    pub fn render(&self) -> String {
        match self {
            Self::String(s) => format!("\"{}\"", escape_string(s)),
            Self::Boolean(b) => b.to_string(),
            Self::Integer(i) => i.to_string(),
        }
    }
}

/// Escape a string for a double-quoted value.
///
/// Backslash, quote, newline, carriage return, and tab use their short
/// escapes; other control characters become `\uXXXX`.
#[must_use]
pub fn escape_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => out.push_str(&format!("\\u{:04X}", u32::from(c))),
            c => out.push(c),
        }
    }
    out
}

/// Build the assignment line `key = value`.
#[must_use]
pub fn format_assignment(key: &str, value: &SettingValue) -> String {
    format!("{key} = {}", value.render())
}

/// Classification of a single document line.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Line {
    /// `[name]`, with the dotted name normalized.
    Header(String),
    /// `[[name]]`; a section boundary that no key path addresses.
    TableArray,
    /// `key = …`, with quotes stripped from the key.
    Assignment(String),
    /// Blank lines, comments, and anything unrecognised.
    Other,
}

impl Line {
    const fn is_boundary(&self) -> bool {
        matches!(self, Self::Header(_) | Self::TableArray)
    }
}

const fn is_bare_key_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

fn classify(line: &str) -> Line {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Line::Other;
    }
    if trimmed.starts_with('[') {
        return parse_header(trimmed).unwrap_or(Line::Other);
    }
    assignment_key(trimmed).map_or(Line::Other, Line::Assignment)
}

/// Parse `[a.b]`, `[[a]]`, with an optional trailing `# comment`.
fn parse_header(trimmed: &str) -> Option<Line> {
    let is_array = trimmed.starts_with("[[");
    let (open, close) = if is_array { ("[[", "]]") } else { ("[", "]") };
    let rest = trimmed.strip_prefix(open)?;
    let end = rest.find(close)?;
    let name = rest.get(..end)?;
    let after = rest.get(end + close.len()..)?.trim_start();
    if !after.is_empty() && !after.starts_with('#') {
        return None;
    }
    if is_array {
        return Some(Line::TableArray);
    }
    let normalized: Vec<&str> = name
        .split('.')
        .map(|part| part.trim().trim_matches('"'))
        .collect();
    Some(Line::Header(normalized.join(".")))
}

/// Extract the key from `key = value` or `"key" = value`.
fn assignment_key(trimmed: &str) -> Option<String> {
    let (raw_key, _) = trimmed.split_once('=')?;
    let raw_key = raw_key.trim();
    if let Some(quoted) = raw_key
        .strip_prefix('"')
        .and_then(|k| k.strip_suffix('"'))
    {
        return Some(quoted.to_string());
    }
    if raw_key.is_empty() || !raw_key.chars().all(|c| is_bare_key_char(c) || c == '.') {
        return None;
    }
    Some(raw_key.to_string())
}

fn is_assignment_for(line: &str, key: &str) -> bool {
    matches!(classify(line), Line::Assignment(ref k) if k == key)
}

fn trim_trailing_blank(lines: &mut Vec<String>) {
    while lines.last().is_some_and(|l| l.trim().is_empty()) {
        lines.pop();
    }
}

fn render(mut lines: Vec<String>) -> String {
    trim_trailing_blank(&mut lines);
    if lines.is_empty() {
        return String::new();
    }
    let mut out = lines.join("\n");
    out.push('\n');
    out
}

/// Index of the first section boundary at or after `from`, or `lines.len()`.
fn next_boundary(lines: &[String], from: usize) -> usize {
    lines
        .iter()
        .skip(from)
        .position(|l| classify(l).is_boundary())
        .map_or(lines.len(), |offset| from + offset)
}

/// Replace the first assignment for `key` in `start..end`, dropping later
/// duplicates, or insert after the range's last non-blank line.
fn replace_or_insert(lines: &mut Vec<String>, start: usize, end: usize, key: &str, assignment: &str) {
    let matches: Vec<usize> = (start..end)
        .filter(|&i| lines.get(i).is_some_and(|l| is_assignment_for(l, key)))
        .collect();

    if let Some((&first, duplicates)) = matches.split_first() {
        for &i in duplicates.iter().rev() {
            lines.remove(i);
        }
        if let Some(line) = lines.get_mut(first) {
            *line = assignment.to_string();
        }
        return;
    }

    let at = (start..end)
        .rev()
        .find(|&i| lines.get(i).is_some_and(|l| !l.trim().is_empty()))
        .map_or(start, |i| i + 1);
    lines.insert(at, assignment.to_string());
    // Keep a root-level insertion visually apart from a header right below it.
    if start == 0 && at == end && end < lines.len().saturating_sub(1) {
        lines.insert(at + 1, String::new());
    }
}

/// Set `path` to the given assignment line.
///
/// For a sectioned key the section header is located and either the first
/// existing assignment is replaced in place (later duplicates in the same
/// section are dropped) or the assignment is inserted at the end of the
/// section, before any blank lines that separate it from the next header.
/// A missing section is appended, preceded by one blank line unless the
/// document is empty. Root-level keys are handled the same way within the
/// lines before the first header.
///
/// ```
/// use devbox_cli::config::editor::{KeyPath, upsert_key};
///
/// let path = KeyPath::parse("provision.volume").unwrap();
/// let doc = "# settings\n[provision]\nvolume = \"old\"\n";
/// assert_eq!(
///     upsert_key(doc, &path, "volume = \"new\""),
///     "# settings\n[provision]\nvolume = \"new\"\n"
/// );
/// ```
#[must_use]
pub fn upsert_key(content: &str, path: &KeyPath, assignment: &str) -> String {
    let mut lines: Vec<String> = content.lines().map(str::to_string).collect();

    match path.section() {
        None => {
            let end = next_boundary(&lines, 0);
            replace_or_insert(&mut lines, 0, end, path.key(), assignment);
        }
        Some(section) => {
            let header = lines
                .iter()
                .position(|l| matches!(classify(l), Line::Header(ref name) if *name == section));
            if let Some(header) = header {
                let start = header + 1;
                let end = next_boundary(&lines, start);
                replace_or_insert(&mut lines, start, end, path.key(), assignment);
            } else {
                trim_trailing_blank(&mut lines);
                if !lines.is_empty() {
                    lines.push(String::new());
                }
                lines.push(format!("[{section}]"));
                lines.push(assignment.to_string());
            }
        }
    }

    render(lines)
}

/// Remove every assignment of `key` that appears before the first section
/// header.
///
/// Keys inside sections are never touched. When nothing matches, `content`
/// is returned exactly as given (no normalization).
///
/// ```
/// use devbox_cli::config::editor::remove_root_key;
///
/// let doc = "manifest = \"a.toml\"\n[provision]\nmanifest = \"kept\"\n";
/// assert_eq!(remove_root_key(doc, "manifest"), "[provision]\nmanifest = \"kept\"\n");
/// assert_eq!(remove_root_key("x = 1\r\n", "y"), "x = 1\r\n");
/// ```
#[must_use]
pub fn remove_root_key(content: &str, key: &str) -> String {
    let lines: Vec<String> = content.lines().map(str::to_string).collect();
    let boundary = next_boundary(&lines, 0);

    let mut removed = false;
    let kept: Vec<String> = lines
        .into_iter()
        .enumerate()
        .filter_map(|(i, line)| {
            if i < boundary && is_assignment_for(&line, key) {
                removed = true;
                None
            } else {
                Some(line)
            }
        })
        .collect();

    if removed {
        render(kept)
    } else {
        content.to_string()
    }
}
