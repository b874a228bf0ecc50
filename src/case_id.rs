//! Case id extraction from test titles.
//!
//! Test titles reference TestRail cases by embedding `C<digits>` tokens,
//! e.g. `"C1234 login works"` or `"logout C12 C13"`. The prefix is an
//! uppercase `C` and the token must stand on word boundaries on both sides,
//! so `"AC12"`, `"C12x"` and `"c12"` do not match.
//!
//! Changing this matching rule changes which results users see in TestRail,
//! so it should be treated as a breaking change.

use std::sync::LazyLock;

use regex::Regex;

static CASE_ID_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bC(\d+)\b").expect("case id pattern is valid"));

/// Extracts every case id referenced in `title`, in order of appearance.
///
/// Duplicates are preserved. A title without references yields an empty
/// vector.
///
/// # Example
///
/// ```
/// use testrail_reporter::case_id::title_to_case_ids;
///
/// assert_eq!(title_to_case_ids("login C12 then C7"), vec![12, 7]);
/// assert!(title_to_case_ids("no references here").is_empty());
/// ```
pub fn title_to_case_ids(title: &str) -> Vec<u64> {
    CASE_ID_PATTERN
        .captures_iter(title)
        .filter_map(|caps| {
            let digits = &caps[1];
            match digits.parse::<u64>() {
                Ok(id) => Some(id),
                Err(e) => {
                    tracing::debug!("Ignoring case reference C{}: {}", digits, e);
                    None
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_case_ids() {
        assert!(title_to_case_ids("").is_empty());
        assert!(title_to_case_ids("renders the dashboard").is_empty());
        assert!(title_to_case_ids("Case 12 is not a reference").is_empty());
    }

    #[test]
    fn test_ids_in_order() {
        assert_eq!(title_to_case_ids("C12 and then C7"), vec![12, 7]);
        assert_eq!(title_to_case_ids("login C100 works"), vec![100]);
        assert_eq!(title_to_case_ids("logout fails C200"), vec![200]);
    }

    #[test]
    fn test_duplicates_preserved() {
        assert_eq!(title_to_case_ids("C5 first, C5 again"), vec![5, 5]);
    }

    #[test]
    fn test_word_boundaries_required() {
        assert!(title_to_case_ids("ABC12").is_empty());
        assert!(title_to_case_ids("C12abc").is_empty());
        assert!(title_to_case_ids("C").is_empty());
        assert_eq!(title_to_case_ids("(C42)"), vec![42]);
        assert_eq!(title_to_case_ids("C1,C2:C3"), vec![1, 2, 3]);
    }

    #[test]
    fn test_prefix_is_case_sensitive() {
        assert!(title_to_case_ids("c12 lowercase").is_empty());
    }

    #[test]
    fn test_overflowing_id_is_skipped() {
        assert_eq!(
            title_to_case_ids("C99999999999999999999999 C3"),
            vec![3]
        );
    }
}
