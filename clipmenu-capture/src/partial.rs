//! Detection of "partial" clips: some applications (notably Chromium)
//! spam PRIMARY repeatedly while a selection is being dragged out, so
//! selecting "abc" produces three separate clips "a", "ab", "abc". This
//! treats a new clip arriving shortly after the last one as a
//! replacement rather than a new entry when one is a prefix or suffix
//! of the other.

use std::time::Duration;

/// Clips more than this far apart in time are never merged.
pub const PARTIAL_MAX_AGE: Duration = Duration::from_secs(2);

/// Is `a` a possible partial selection of `b`, or vice versa?
///
/// True when one string is a prefix of the other, or a suffix of the
/// other (covers both left-to-right and right-to-left drag-selection).
pub fn is_possible_partial(a: &str, b: &str) -> bool {
    let (shorter, longer) = if a.len() <= b.len() { (a, b) } else { (b, a) };

    if longer.as_bytes().starts_with(shorter.as_bytes()) {
        return true;
    }
    longer.as_bytes().ends_with(shorter.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_growth_is_partial() {
        assert!(is_possible_partial("a", "ab"));
        assert!(is_possible_partial("ab", "abc"));
    }

    #[test]
    fn suffix_growth_is_partial() {
        assert!(is_possible_partial("c", "bc"));
        assert!(is_possible_partial("bc", "abc"));
    }

    #[test]
    fn unrelated_text_is_not_partial() {
        assert!(!is_possible_partial("hello", "goodbye"));
    }

    #[test]
    fn identical_text_is_partial() {
        assert!(is_possible_partial("same", "same"));
    }

    #[test]
    fn empty_string_is_always_a_partial() {
        assert!(is_possible_partial("", "anything"));
    }
}
