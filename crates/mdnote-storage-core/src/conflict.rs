//! Advisory pre-flight version check.
//!
//! Independent of the adapters' own precondition enforcement: a clean check
//! does not guarantee the following write succeeds.

use crate::model::FileMetadata;

/// Outcome of comparing a caller's version token against the server's.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictCheck {
    /// Tokens match; the caller's view is current.
    Clean,
    /// Tokens differ; the item changed since the caller last read it.
    Conflict { last_known: String, current: String },
}

impl ConflictCheck {
    pub fn is_conflict(&self) -> bool {
        matches!(self, ConflictCheck::Conflict { .. })
    }
}

/// Stateless ETag comparison.
pub struct ConflictDetector;

impl ConflictDetector {
    /// Tokens are opaque and only compared for equality.
    pub fn has_conflict(last_known_etag: &str, current_etag: &str) -> bool {
        last_known_etag != current_etag
    }

    pub fn check(last_known_etag: &str, current_etag: &str) -> ConflictCheck {
        if Self::has_conflict(last_known_etag, current_etag) {
            ConflictCheck::Conflict {
                last_known: last_known_etag.to_string(),
                current: current_etag.to_string(),
            }
        } else {
            ConflictCheck::Clean
        }
    }

    /// Compare against freshly fetched metadata for the same item.
    pub fn check_metadata(last_known_etag: &str, current: &FileMetadata) -> ConflictCheck {
        Self::check(last_known_etag, &current.etag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equal_tokens_are_clean() {
        assert!(!ConflictDetector::has_conflict("abc", "abc"));
        assert_eq!(ConflictDetector::check("abc", "abc"), ConflictCheck::Clean);
    }

    #[test]
    fn test_different_tokens_conflict() {
        assert!(ConflictDetector::has_conflict("abc", "abd"));
        let check = ConflictDetector::check("abc", "abd");
        assert!(check.is_conflict());
        assert_eq!(
            check,
            ConflictCheck::Conflict {
                last_known: "abc".to_string(),
                current: "abd".to_string(),
            }
        );
    }

    #[test]
    fn test_tokens_are_not_ordered() {
        // "2" < "10" lexically but neither is "newer"; only inequality matters.
        assert!(ConflictDetector::has_conflict("10", "2"));
        assert!(ConflictDetector::has_conflict("2", "10"));
    }

    #[test]
    fn test_empty_last_known_conflicts_with_real_token() {
        assert!(ConflictDetector::has_conflict("", "v1"));
    }
}
