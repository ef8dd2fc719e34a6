/*!
 * Similarity metric for approximate translation-memory lookup.
 *
 * Normalized edit distance: `1 - levenshtein(a, b) / max(len(a), len(b))`,
 * computed over characters. Bounded to [0, 1], symmetric, and exactly 1.0
 * only for identical strings. Case-sensitive: strings differing in case are
 * distinct source segments.
 */

/// Calculate similarity between two strings (0.0-1.0).
pub fn similarity(a: &str, b: &str) -> f64 {
    if a == b {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let a_len = a.chars().count();
    let b_len = b.chars().count();
    let distance = levenshtein_distance(a, b);
    let max_len = a_len.max(b_len);

    (1.0 - distance as f64 / max_len as f64).clamp(0.0, 1.0)
}

/// Calculate Levenshtein distance between two strings, per character.
pub fn levenshtein_distance(a: &str, b: &str) -> usize {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    let a_len = a_chars.len();
    let b_len = b_chars.len();

    if a_len == 0 {
        return b_len;
    }
    if b_len == 0 {
        return a_len;
    }

    // Two-row optimization for space efficiency
    let mut prev_row: Vec<usize> = (0..=b_len).collect();
    let mut curr_row: Vec<usize> = vec![0; b_len + 1];

    for i in 1..=a_len {
        curr_row[0] = i;

        for j in 1..=b_len {
            let cost = if a_chars[i - 1] == b_chars[j - 1] { 0 } else { 1 };
            curr_row[j] = (prev_row[j] + 1)
                .min(curr_row[j - 1] + 1)
                .min(prev_row[j - 1] + cost);
        }

        std::mem::swap(&mut prev_row, &mut curr_row);
    }

    prev_row[b_len]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_similarity_should_be_one_for_identical_strings() {
        assert_eq!(similarity("hello world", "hello world"), 1.0);
        assert_eq!(similarity("", ""), 1.0);
        assert_eq!(similarity("字句", "字句"), 1.0);
    }

    #[test]
    fn test_similarity_should_be_symmetric() {
        let pairs = [("kitten", "sitting"), ("abc", "abcd"), ("短句", "长句子")];
        for (a, b) in pairs {
            assert_eq!(similarity(a, b), similarity(b, a));
        }
    }

    #[test]
    fn test_similarity_should_be_bounded() {
        let pairs = [("kitten", "sitting"), ("", "x"), ("completely", "different")];
        for (a, b) in pairs {
            let s = similarity(a, b);
            assert!((0.0..=1.0).contains(&s), "similarity out of range: {}", s);
        }
    }

    #[test]
    fn test_similarity_should_not_be_one_for_case_difference() {
        assert!(similarity("Hello", "hello") < 1.0);
    }

    #[test]
    fn test_levenshtein_should_match_known_values() {
        assert_eq!(levenshtein_distance("kitten", "sitting"), 3);
        assert_eq!(levenshtein_distance("", "abc"), 3);
        assert_eq!(levenshtein_distance("abc", ""), 3);
        assert_eq!(levenshtein_distance("same", "same"), 0);
    }
}
