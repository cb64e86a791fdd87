//! ANSI styling for console output.

pub(super) const RED: &str = "\x1b[31m";
pub(super) const GREEN: &str = "\x1b[32m";
pub(super) const YELLOW: &str = "\x1b[33m";
pub(super) const GREY: &str = "\x1b[37m";
pub(super) const DIM: &str = "\x1b[2m";
pub(super) const BOLD_BLUE: &str = "\x1b[1;34m";
const RESET: &str = "\x1b[0m";

/// Wrap `text` in `code` and a reset.
pub(super) fn paint(code: &str, text: &str) -> String {
    format!("{code}{text}{RESET}")
}

#[derive(Clone, Copy)]
enum Scan {
    Text,
    Escape,
    Csi,
}

/// Remove escape sequences: CSI sequences up to their final byte
/// (`@`..=`~`) and two-byte escapes such as `ESC 7`.
pub(super) fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut state = Scan::Text;
    for c in s.chars() {
        state = match (state, c) {
            (Scan::Text, '\x1b') => Scan::Escape,
            (Scan::Text, c) => {
                out.push(c);
                Scan::Text
            }
            (Scan::Escape, '[') | (Scan::Csi, '\0'..='?' | '\u{7f}'..) => Scan::Csi,
            (Scan::Escape | Scan::Csi, _) => Scan::Text,
        };
    }
    out
}
