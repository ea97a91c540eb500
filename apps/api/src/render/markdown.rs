//! Line-local markdown classification for the PDF report.
//!
//! Each line is classified on its own by its leading characters. There is no
//! lookahead and no nesting: an indented bullet is just a bullet.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineKind<'a> {
    /// Level is clamped to 1..=3.
    Heading { level: u8, text: &'a str },
    Bullet(&'a str),
    /// `marker` keeps the source numbering, e.g. `"3."`.
    Numbered { marker: &'a str, text: &'a str },
    Rule,
    Blank,
    Body(&'a str),
}

pub fn classify_line(line: &str) -> LineKind<'_> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return LineKind::Blank;
    }

    let hashes = trimmed.chars().take_while(|&c| c == '#').count();
    if (1..=6).contains(&hashes) {
        let rest = &trimmed[hashes..];
        if rest.is_empty() || rest.starts_with(' ') {
            return LineKind::Heading {
                level: hashes.min(3) as u8,
                text: rest.trim(),
            };
        }
    }

    if is_rule(trimmed) {
        return LineKind::Rule;
    }

    for marker in ["- ", "* ", "+ ", "• "] {
        if let Some(rest) = trimmed.strip_prefix(marker) {
            return LineKind::Bullet(rest.trim());
        }
    }

    let digits = trimmed.chars().take_while(|c| c.is_ascii_digit()).count();
    if (1..=3).contains(&digits) {
        let rest = &trimmed[digits..];
        if rest.starts_with(". ") || rest.starts_with(") ") {
            return LineKind::Numbered {
                marker: &trimmed[..digits + 1],
                text: rest[2..].trim(),
            };
        }
    }

    LineKind::Body(trimmed)
}

/// Three or more of the same `-`, `*` or `_`, optionally space-separated.
fn is_rule(trimmed: &str) -> bool {
    let mut chars = trimmed.chars().filter(|c| !c.is_whitespace());
    let Some(first) = chars.next() else {
        return false;
    };
    if !matches!(first, '-' | '*' | '_') {
        return false;
    }
    let mut count = 1;
    for c in chars {
        if c != first {
            return false;
        }
        count += 1;
    }
    count >= 3
}

/// Removes bold/italic/code markers. Underscores inside words survive.
pub fn strip_inline(text: &str) -> String {
    let text = text.replace("**", "").replace("__", "").replace('`', "");
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());

    for (i, &c) in chars.iter().enumerate() {
        match c {
            '*' => {}
            '_' => {
                let prev = i.checked_sub(1).map(|j| chars[j]);
                let next = chars.get(i + 1).copied();
                let inside_word = prev.is_some_and(char::is_alphanumeric)
                    && next.is_some_and(char::is_alphanumeric);
                if inside_word {
                    out.push('_');
                }
            }
            _ => out.push(c),
        }
    }
    out
}

/// Placeholder for characters the built-in PDF fonts cannot show.
pub const PLACEHOLDER: char = '?';

/// Keeps Latin-1 printable characters, turns tabs into spaces, drops other
/// control characters and replaces everything else with `PLACEHOLDER`.
pub fn to_pdf_charset(text: &str) -> String {
    text.chars()
        .filter_map(|c| match c {
            '\t' => Some(' '),
            c if c.is_control() => None,
            c if (c as u32) <= 0xFF => Some(c),
            _ => Some(PLACEHOLDER),
        })
        .collect()
}
