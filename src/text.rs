//! Terminal-safe text helpers: sanitization, truncation, and color-mode
//! resolution.
//!
//! Mirrors the teacher crate's preference for compiled-once `Lazy` regexes
//! (see the device prompt scrubbing in the original `device.rs`) applied
//! here to scrubbing untrusted remote output before it reaches the
//! terminal.

use std::io::IsTerminal;

/// Replacement glyph used for bytes outside printable/whitespace ranges.
pub const REPLACEMENT: char = '\u{FFFD}';

/// User-requested color mode, from `--color {auto,always,never}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorMode {
    #[default]
    Auto,
    Always,
    Never,
}

impl std::str::FromStr for ColorMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(ColorMode::Auto),
            "always" => Ok(ColorMode::Always),
            "never" => Ok(ColorMode::Never),
            other => Err(format!("invalid color mode '{other}' (expected auto, always, or never)")),
        }
    }
}

/// Resolves a `ColorMode` into a concrete on/off decision for the current
/// process. `Auto` enables color only when stdout is a TTY and `TERM` is
/// not `dumb`.
pub fn resolve_color(mode: ColorMode) -> bool {
    match mode {
        ColorMode::Always => true,
        ColorMode::Never => false,
        ColorMode::Auto => {
            let is_tty = std::io::stdout().is_terminal();
            let dumb_term = std::env::var("TERM")
                .map(|term| term == "dumb")
                .unwrap_or(false);
            is_tty && !dumb_term
        }
    }
}

/// Replaces bytes outside printable ASCII/whitespace/UTF-8 text with the
/// replacement glyph, preventing a malicious or corrupted build agent from
/// injecting terminal escape sequences into the dashboard.
pub fn sanitize_for_terminal(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        let is_escape = ch == '\u{1b}';
        let is_other_control = ch.is_control() && ch != '\n' && ch != '\t' && ch != '\r';
        if is_escape || is_other_control {
            out.push(REPLACEMENT);
        } else {
            out.push(ch);
        }
    }
    out
}

/// Truncates `line` to fit within `width` display columns, appending an
/// ellipsis when truncation occurred. Byte-safe (operates on chars, not
/// bytes) since remote output is not guaranteed to be ASCII.
pub fn truncate_with_ellipsis(line: &str, width: usize) -> String {
    if width == 0 {
        return String::new();
    }
    let char_count = line.chars().count();
    if char_count <= width {
        return line.to_string();
    }
    if width == 1 {
        return "…".to_string();
    }
    let keep = width - 1;
    let mut truncated: String = line.chars().take(keep).collect();
    truncated.push('…');
    truncated
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_replaces_escape_sequences() {
        let input = "\u{1b}[31mred\u{1b}[0m";
        let sanitized = sanitize_for_terminal(input);
        assert!(!sanitized.contains('\u{1b}'));
        assert!(sanitized.contains("red"));
    }

    #[test]
    fn sanitize_preserves_newlines_and_tabs() {
        let input = "line one\n\tindented";
        assert_eq!(sanitize_for_terminal(input), input);
    }

    #[test]
    fn truncate_leaves_short_lines_untouched() {
        assert_eq!(truncate_with_ellipsis("short", 40), "short");
    }

    #[test]
    fn truncate_adds_ellipsis_for_long_lines() {
        let truncated = truncate_with_ellipsis("configure: checking for gcc", 10);
        assert_eq!(truncated.chars().count(), 10);
        assert!(truncated.ends_with('…'));
    }

    #[test]
    fn color_mode_parses_from_str() {
        assert_eq!("auto".parse::<ColorMode>().unwrap(), ColorMode::Auto);
        assert_eq!("always".parse::<ColorMode>().unwrap(), ColorMode::Always);
        assert_eq!("never".parse::<ColorMode>().unwrap(), ColorMode::Never);
        assert!("rainbow".parse::<ColorMode>().is_err());
    }

    #[test]
    fn always_and_never_ignore_environment() {
        assert!(resolve_color(ColorMode::Always));
        assert!(!resolve_color(ColorMode::Never));
    }
}
