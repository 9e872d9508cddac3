/// Edit-distance similarity in `[0, 1]`.
///
/// Returns `0.0` when either side is empty, otherwise
/// `1 - levenshtein(a, b) / max(len(a), len(b))` counted in chars.
pub fn similar(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let distance = strsim::levenshtein(a, b);
    let max_len = a.chars().count().max(b.chars().count());
    1.0 - distance as f64 / max_len as f64
}

#[cfg(test)]
mod tests {
    use super::similar;

    #[test]
    fn identical_strings_score_one() {
        assert_eq!(similar("foo bar", "foo bar"), 1.0);
        assert_eq!(similar("x", "x"), 1.0);
    }

    #[test]
    fn empty_side_scores_zero() {
        assert_eq!(similar("", "anything"), 0.0);
        assert_eq!(similar("anything", ""), 0.0);
        assert_eq!(similar("", ""), 0.0);
    }

    #[test]
    fn score_is_symmetric() {
        let pairs = [("kitten", "sitting"), ("bar foo", "foo bar"), ("a", "abc")];
        for (a, b) in pairs {
            assert_eq!(similar(a, b), similar(b, a));
        }
    }

    #[test]
    fn score_follows_edit_distance() {
        // kitten -> sitting needs 3 edits over 7 chars
        let score = similar("kitten", "sitting");
        assert!((score - (1.0 - 3.0 / 7.0)).abs() < 1e-12);

        let score = similar("abcdefghij", "abcxxxxxxx");
        assert!((score - 0.3).abs() < 1e-12);
    }

    #[test]
    fn completely_different_strings_score_zero() {
        assert_eq!(similar("abc", "xyz"), 0.0);
    }
}
