use anyhow::{anyhow, Result};
use isolang::Language;

/// Language utilities for ISO language code handling
///
/// This module validates and normalizes ISO 639-1 (2-letter) and ISO 639-2
/// (3-letter) language codes, and turns codes into display names for prompts
/// and logs.

/// ISO 639-2/B codes that differ from their 639-2/T counterpart
const PART2B_TO_PART2T: &[(&str, &str)] = &[
    ("fre", "fra"), // French
    ("ger", "deu"), // German
    ("dut", "nld"), // Dutch
    ("gre", "ell"), // Greek
    ("chi", "zho"), // Chinese
    ("cze", "ces"), // Czech
    ("ice", "isl"), // Icelandic
    ("per", "fas"), // Persian
    ("rum", "ron"), // Romanian
    ("slo", "slk"), // Slovak
    ("wel", "cym"), // Welsh
];

fn bibliographic_to_terminological(code: &str) -> Option<&'static str> {
    PART2B_TO_PART2T
        .iter()
        .find(|(b, _)| *b == code)
        .map(|(_, t)| *t)
}

/// Normalize a language code to ISO 639-2/T (3-letter) format
pub fn normalize_to_part2t(code: &str) -> Result<String> {
    let normalized = code.trim().to_lowercase();

    match normalized.len() {
        2 => {
            if let Some(lang) = Language::from_639_1(&normalized) {
                return Ok(lang.to_639_3().to_string());
            }
        }
        3 => {
            if Language::from_639_3(&normalized).is_some() {
                return Ok(normalized);
            }
            if let Some(part2t) = bibliographic_to_terminological(&normalized) {
                return Ok(part2t.to_string());
            }
        }
        _ => {}
    }

    Err(anyhow!("Invalid language code: {}", code))
}

/// Validate that a code is a recognized ISO 639-1 or ISO 639-2 code
pub fn validate_language_code(code: &str) -> Result<()> {
    normalize_to_part2t(code).map(|_| ())
}

/// Check if two language codes represent the same language
pub fn language_codes_match(code1: &str, code2: &str) -> bool {
    match (normalize_to_part2t(code1), normalize_to_part2t(code2)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Get the English language name for a code
pub fn get_language_name(code: &str) -> Result<String> {
    let normalized = normalize_to_part2t(code)?;
    let lang = Language::from_639_3(&normalized)
        .ok_or_else(|| anyhow!("Failed to get language from code: {}", normalized))?;
    Ok(lang.to_name().to_string())
}

/// Display name for prompts and logs; falls back to the raw code when the
/// code is not recognized.
pub fn display_name(code: &str) -> String {
    get_language_name(code).unwrap_or_else(|_| code.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_should_convert_two_letter_codes() {
        assert_eq!(normalize_to_part2t("en").unwrap(), "eng");
        assert_eq!(normalize_to_part2t("zh").unwrap(), "zho");
        assert_eq!(normalize_to_part2t("FR").unwrap(), "fra");
    }

    #[test]
    fn test_normalize_should_convert_bibliographic_codes() {
        assert_eq!(normalize_to_part2t("chi").unwrap(), "zho");
        assert_eq!(normalize_to_part2t("fre").unwrap(), "fra");
    }

    #[test]
    fn test_normalize_should_reject_unknown_codes() {
        assert!(normalize_to_part2t("xx").is_err());
        assert!(normalize_to_part2t("not-a-code").is_err());
    }

    #[test]
    fn test_language_codes_match_should_cross_code_lengths() {
        assert!(language_codes_match("zh", "zho"));
        assert!(language_codes_match("zh", "chi"));
        assert!(!language_codes_match("zh", "en"));
        assert!(!language_codes_match("zh", "bogus"));
    }

    #[test]
    fn test_display_name_should_resolve_known_codes() {
        assert_eq!(display_name("en"), "English");
        assert_eq!(display_name("zh"), "Chinese");
    }

    #[test]
    fn test_display_name_should_fall_back_to_raw_code() {
        assert_eq!(display_name("klingon"), "klingon");
    }
}
