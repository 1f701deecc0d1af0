//! Character-class filter for paraphrase input.
//!
//! Only the character classes are checked here. Whitespace-only text passes
//! this filter; rejecting blank input (after trimming) is done by
//! [`crate::service::ParaphraseRequest::validate`] before the text ever
//! reaches the model. Keep the two checks separate: merging them changes the
//! outcome for tab-only or newline-only input.

/// Control characters rejected even where another rule would accept them
/// (`\x0b` and `\x0c` are whitespace).
const FORBIDDEN_CHARS: &[char] = &[
    '\x00', '\x01', '\x02', '\x03', '\x04', '\x05', '\x06', '\x07', '\x08', '\x0b', '\x0c',
    '\x0e',
];

const PUNCTUATION: &[char] = &[
    '.', ',', '!', '?', ';', ':', '-', '—', '–', '"', '\'', '«', '»', '„',
];

pub struct TextValidator;

impl TextValidator {
    /// Returns `true` when `text` is non-empty and every character is accepted.
    pub fn is_valid(text: &str) -> bool {
        !text.is_empty() && text.chars().all(Self::is_allowed_char)
    }

    /// Drops every character that is not accepted, keeping the order of the rest.
    pub fn filter(text: &str) -> String {
        text.chars().filter(|&c| Self::is_allowed_char(c)).collect()
    }

    pub fn is_allowed_char(c: char) -> bool {
        if FORBIDDEN_CHARS.contains(&c) {
            return false;
        }

        is_cyrillic_letter(c)
            || c.is_ascii_alphabetic()
            || c.is_ascii_digit()
            || c.is_whitespace()
            || PUNCTUATION.contains(&c)
    }
}

fn is_cyrillic_letter(c: char) -> bool {
    matches!(c, 'а'..='я' | 'А'..='Я' | 'ё' | 'Ё')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_russian_english_and_mixed_text() {
        assert!(TextValidator::is_valid("Привет, это тест."));
        assert!(TextValidator::is_valid("Hello, this is a test."));
        assert!(TextValidator::is_valid("Hello привет 123"));
        assert!(TextValidator::is_valid("Ёлка и ёж"));
    }

    #[test]
    fn test_empty_text_is_invalid() {
        assert!(!TextValidator::is_valid(""));
    }

    #[test]
    fn test_whitespace_only_is_valid_at_this_layer() {
        assert!(TextValidator::is_valid("   "));
        assert!(TextValidator::is_valid("\t"));
        assert!(TextValidator::is_valid("\n\n"));
    }

    #[test]
    fn test_control_characters_are_rejected() {
        assert!(!TextValidator::is_valid("Hello\x00World"));
        for c in FORBIDDEN_CHARS {
            let text = format!("text{c}text");
            assert!(!TextValidator::is_valid(&text), "{c:?} should be rejected");
        }
        assert!(!TextValidator::is_valid("bell\x1b[0m"));
    }

    #[test]
    fn test_markup_and_foreign_scripts_are_rejected() {
        assert!(!TextValidator::is_valid("Hello<script>alert('xss')</script>"));
        assert!(!TextValidator::is_valid("Hello мир 你好"));
        assert!(!TextValidator::is_valid("price: 5$"));
        assert!(TextValidator::is_valid("Hello мир"));
    }

    #[test]
    fn test_quotes_and_dashes() {
        for text in [
            "Text with \"double quotes\"",
            "Text with 'single quotes'",
            "Text with «guillemets»",
            "Text with „low quotes„",
            "dash - en – em —",
        ] {
            assert!(TextValidator::is_valid(text), "{text:?} should be valid");
        }
    }

    #[test]
    fn test_typographic_double_quotes_are_not_accepted() {
        assert!(!TextValidator::is_valid("“x”"));
        assert!(!TextValidator::is_valid("Text with „low quotes“"));
        assert_eq!(TextValidator::filter("“x”"), "x");
        assert_eq!(TextValidator::filter("«Цитата» — это „пример“"), "«Цитата» — это „пример");
    }

    #[test]
    fn test_newlines_and_tabs_are_whitespace() {
        assert!(TextValidator::is_valid("Hello\nWorld\tTest\r\n"));
    }

    #[test]
    fn test_filter_removes_invalid_chars() {
        let filtered = TextValidator::filter("Hello<>World");
        assert_eq!(filtered, "HelloWorld");
        assert!(TextValidator::is_valid(&filtered));
    }

    #[test]
    fn test_filter_preserves_valid_chars_in_order() {
        assert_eq!(
            TextValidator::filter("Hello, привет 123"),
            "Hello, привет 123"
        );
        assert_eq!(TextValidator::filter("a\x00b\x0bc"), "abc");
    }

    #[test]
    fn test_filter_removes_malicious_patterns() {
        for text in [
            "Hello<script>alert('xss')</script>World",
            "Text with\x00null",
            "Normal<>Brackets",
        ] {
            let filtered = TextValidator::filter(text);
            assert!(TextValidator::is_valid(&filtered));
            assert!(!filtered.contains('<'));
            assert!(!filtered.contains('>'));
            assert!(!filtered.contains('\x00'));
        }
    }

    #[test]
    fn test_filter_is_idempotent_and_output_valid() {
        let samples = [
            "",
            "   ",
            "Привет<мир>!",
            "\x00\x01\x02",
            "mixed 你好 text © 2024",
            "tab\there\x0bvt",
            "«Цитата» — это „пример“",
        ];

        for sample in samples {
            let once = TextValidator::filter(sample);
            assert_eq!(TextValidator::filter(&once), once);
            if !once.is_empty() {
                assert!(TextValidator::is_valid(&once), "{once:?} should be valid");
            }
        }
    }

    #[test]
    fn test_very_long_text() {
        let text = "Тестовый текст ".repeat(1000);
        assert!(TextValidator::is_valid(&text));
    }

    #[test]
    fn test_every_ascii_control_outside_whitespace_is_rejected() {
        for byte in 0u8..0x20 {
            let c = byte as char;
            let text = format!("ok{c}");
            let accepted = matches!(c, '\t' | '\n' | '\r');
            assert_eq!(TextValidator::is_valid(&text), accepted, "byte {byte:#04x}");
        }
        assert!(!TextValidator::is_valid("ok\x7f"));
    }
}
