// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

// Shared reporting helpers: error-line highlighting and ANSI paint
// functions for verbose listings.

const BOLD: &str = "\x1b[1m";
const END: &str = "\x1b[m";

fn rgb(r: u8, g: u8, b: u8) -> String {
    format!("\x1b[38;2;{r};{g};{b}m")
}

/// Paint an address or other integer value.
pub fn paint_int(value: impl std::fmt::Display, use_color: bool) -> String {
    if use_color {
        format!("{BOLD}{}{value}{END}", rgb(255, 125, 0))
    } else {
        value.to_string()
    }
}

/// Paint a mnemonic.
pub fn paint_ins(name: &str, use_color: bool) -> String {
    if use_color {
        format!("{}{name}{END}", rgb(240, 240, 240))
    } else {
        name.to_string()
    }
}

/// Paint a label definition.
pub fn paint_label(name: &str, use_color: bool) -> String {
    if use_color {
        format!("{BOLD}{name}{END}")
    } else {
        name.to_string()
    }
}

pub fn highlight_line(line: &str, column: Option<usize>, use_color: bool) -> String {
    match column {
        Some(col) if col > 0 => {
            let idx = col - 1;
            if idx >= line.len() {
                if use_color {
                    return format!("{line}\x1b[31m^\x1b[0m");
                }
                return format!("{line}^");
            }
            let (head, tail) = line.split_at(idx);
            let ch = tail.chars().next().unwrap_or(' ');
            let rest = &tail[ch.len_utf8()..];
            if use_color {
                format!("{head}\x1b[31m{ch}\x1b[0m{rest}")
            } else {
                format!("{head}{ch}{rest}")
            }
        }
        _ => line.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn highlight_appends_caret_past_line_end() {
        assert_eq!(highlight_line("lc R0", Some(10), false), "lc R0^");
    }

    #[test]
    fn paint_is_identity_without_color() {
        assert_eq!(paint_ins("lc", false), "lc");
        assert_eq!(paint_int(0x1000, false), "4096");
    }

    #[test]
    fn paint_wraps_with_escapes_in_color_mode() {
        let painted = paint_label("main:", true);
        assert!(painted.starts_with("\x1b[1m"));
        assert!(painted.ends_with("\x1b[m"));
    }
}
