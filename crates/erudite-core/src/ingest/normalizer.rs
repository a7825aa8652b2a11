use unicode_normalization::UnicodeNormalization;

/// Cleaned text at or below this many characters carries no content.
pub const MATERIALITY_THRESHOLD: usize = 2;

const CURLY_DOUBLE_QUOTES: [char; 2] = ['\u{201C}', '\u{201D}'];

/// Clean a single-line value such as a title or heading.
///
/// Curly double quotes become straight quotes, the text is put through
/// compatibility decomposition (NFKD), and surrounding whitespace is
/// stripped.
#[must_use]
pub fn normalize(raw: &str) -> String {
    let quoted = straighten_quotes(raw);
    quoted.nfkd().collect::<String>().trim().to_string()
}

/// Clean paragraph or chapter prose into a single line.
///
/// Same as [`normalize`], except every embedded line break is replaced by one
/// space before decomposition.
#[must_use]
pub fn normalize_prose(raw: &str) -> String {
    let quoted = straighten_quotes(raw);
    let single_line = collapse_line_breaks(&quoted);
    single_line.nfkd().collect::<String>().trim().to_string()
}

/// Whether cleaned text survives the materiality filter.
#[must_use]
pub fn is_material(cleaned: &str) -> bool {
    cleaned.chars().count() > MATERIALITY_THRESHOLD
}

fn straighten_quotes(raw: &str) -> String {
    raw.replace(CURLY_DOUBLE_QUOTES, "\"")
}

fn collapse_line_breaks(text: &str) -> String {
    text.replace("\r\n", " ").replace(['\n', '\r'], " ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_curly_quotes_become_straight() {
        assert_eq!(
            normalize("\u{201C}Call me Ishmael.\u{201D}"),
            "\"Call me Ishmael.\""
        );
    }

    #[test]
    fn test_single_quotes_untouched() {
        assert_eq!(normalize("\u{2018}tis"), "\u{2018}tis");
    }

    #[test]
    fn test_strips_surrounding_whitespace() {
        assert_eq!(normalize("  \n Loomings. \t"), "Loomings.");
    }

    #[test]
    fn test_compatibility_decomposition() {
        // Ligature and no-break space fold to their compatibility forms.
        assert_eq!(normalize("\u{FB01}sh\u{00A0}oil"), "fish oil");
        // Precomposed letters decompose.
        assert_eq!(normalize("caf\u{00E9}"), "cafe\u{0301}");
    }

    #[test]
    fn test_prose_collapses_line_breaks() {
        assert_eq!(
            normalize_prose("Some years ago\nnever mind\r\nhow long"),
            "Some years ago never mind how long"
        );
    }

    #[test]
    fn test_plain_normalize_keeps_inner_line_breaks() {
        assert_eq!(normalize("CHAPTER 1.\nLoomings."), "CHAPTER 1.\nLoomings.");
    }

    #[test]
    fn test_deterministic() {
        let raw = "\u{201C}It is a way I have\u{201D}\nof driving off the spleen";
        assert_eq!(normalize_prose(raw), normalize_prose(raw));
    }

    #[test]
    fn test_materiality() {
        assert!(!is_material(""));
        assert!(!is_material("a"));
        assert!(!is_material("ab"));
        assert!(is_material("abc"));
        // Counted in characters, not bytes.
        assert!(!is_material("\u{00E9}\u{00E9}"));
    }
}
