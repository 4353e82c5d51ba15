// Text cleanup for extracted and pasted question text
use once_cell::sync::Lazy;
use regex::Regex;

static HORIZONTAL_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\t ]{2,}").expect("valid regex"));

/// Cleans PDF/OCR artifacts out of `raw`.
///
/// Non-breaking spaces become spaces, zero-width characters and soft hyphens
/// are dropped, a line break between two alphanumerics is joined with a space
/// and runs of horizontal whitespace collapse to one space. Other line breaks
/// survive. `normalize(normalize(x)) == normalize(x)`.
pub fn normalize(raw: &str) -> String {
    let mut cleaned = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '\u{00A0}' => cleaned.push(' '),
            '\u{200B}' | '\u{200C}' | '\u{200D}' | '\u{00AD}' => {}
            '\r' => {}
            _ => cleaned.push(c),
        }
    }

    let chars: Vec<char> = cleaned.chars().collect();
    let mut joined = String::with_capacity(cleaned.len());
    for (i, &c) in chars.iter().enumerate() {
        if c == '\n' && i > 0 && i + 1 < chars.len() {
            if chars[i - 1].is_alphanumeric() && chars[i + 1].is_alphanumeric() {
                joined.push(' ');
                continue;
            }
        }
        joined.push(c);
    }

    HORIZONTAL_RUN
        .replace_all(&joined, " ")
        .trim()
        .to_string()
}

/// Single-line variant for individual fields such as a choice or a stem.
pub fn clean_field(raw: &str) -> String {
    normalize(raw).split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_strips_invisible_characters() {
        assert_eq!(normalize("in\u{00AD}fla\u{200B}tion"), "inflation");
        assert_eq!(normalize("price\u{00A0}\u{00A0}level"), "price level");
    }

    #[test]
    fn test_joins_wrapped_lines_only_between_alphanumerics() {
        assert_eq!(normalize("opportunity\ncost"), "opportunity cost");
        assert_eq!(normalize("What is X?\nA) foo"), "What is X?\nA) foo");
        assert_eq!(normalize("line one.\r\nline two"), "line one.\nline two");
    }

    #[test]
    fn test_collapses_horizontal_runs() {
        assert_eq!(normalize("  a \t  b   "), "a b");
    }

    #[rstest]
    #[case("")]
    #[case("plain")]
    #[case("a\n\nb")]
    #[case("x \n y")]
    #[case("1\n2\n3")]
    #[case("a\u{200B}\nb")]
    #[case("tab\t\t\tthen\u{00A0} \u{00A0}space")]
    #[case(" \n lead and trail \n ")]
    #[case("A)\u{00AD}\nB)")]
    fn test_normalize_is_idempotent(#[case] input: &str) {
        let once = normalize(input);
        assert_eq!(normalize(&once), once);
    }

    #[test]
    fn test_clean_field_is_single_line() {
        assert_eq!(clean_field("Which of the\n following?"), "Which of the following?");
    }
}
