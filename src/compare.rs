//! Comparison of recorded state against desired configuration.
//!
//! `true` from any check here always means the two sides differ and the
//! caller has work to do.

/// Outcome of comparing a recorded list with a desired one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListComparison<T> {
    /// Whether the lists differ in length or at any position.
    pub differs: bool,
    /// Values recorded but no longer desired, in recorded order.
    pub to_remove: Vec<T>,
}

/// Compare `current` with `desired`.
///
/// The difference check is positional; `to_remove` is a set difference, so
/// a reordering differs but removes nothing.
pub fn compare_lists<T: PartialEq + Clone>(current: &[T], desired: &[T]) -> ListComparison<T> {
    ListComparison {
        differs: lists_differ(current, desired),
        to_remove: set_difference(current, desired),
    }
}

/// Positional inequality of two lists.
pub fn lists_differ<T: PartialEq>(current: &[T], desired: &[T]) -> bool {
    current.len() != desired.len() || current.iter().zip(desired).any(|(c, d)| c != d)
}

/// Values of `from` absent from `minus`, deduplicated, order preserved.
pub fn set_difference<T: PartialEq + Clone>(from: &[T], minus: &[T]) -> Vec<T> {
    let mut out: Vec<T> = Vec::new();
    for value in from {
        if !minus.contains(value) && !out.contains(value) {
            out.push(value.clone());
        }
    }
    out
}

/// `desired` with duplicates dropped, first occurrence kept.
pub fn dedup_preserving_order<T: PartialEq + Clone>(desired: &[T]) -> Vec<T> {
    let mut out: Vec<T> = Vec::with_capacity(desired.len());
    for value in desired {
        if !out.contains(value) {
            out.push(value.clone());
        }
    }
    out
}

/// The desired scalar if it differs from the recorded one.
pub fn changed_value<'a, T: PartialEq + ?Sized>(current: &T, desired: &'a T) -> Option<&'a T> {
    (current != desired).then_some(desired)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_identical_lists() {
        let cmp = compare_lists(&s(&["alice", "bob"]), &s(&["alice", "bob"]));
        assert!(!cmp.differs);
        assert!(cmp.to_remove.is_empty());
    }

    #[test]
    fn test_removal_is_set_difference() {
        let cmp = compare_lists(&s(&["alice", "bob", "carol"]), &s(&["carol", "alice"]));
        assert!(cmp.differs);
        assert_eq!(cmp.to_remove, s(&["bob"]));
    }

    #[test]
    fn test_reorder_differs_without_removals() {
        let cmp = compare_lists(&s(&["alice", "bob"]), &s(&["bob", "alice"]));
        assert!(cmp.differs);
        assert!(cmp.to_remove.is_empty());
    }

    #[test]
    fn test_set_difference_never_contains_desired() {
        let cases: [(&[&str], &[&str]); 5] = [
            (&[], &[]),
            (&["a"], &[]),
            (&[], &["a"]),
            (&["a", "b", "b", "c"], &["b"]),
            (&["x", "y"], &["y", "x", "z"]),
        ];
        for (previous, desired) in cases {
            let previous = s(previous);
            let desired = s(desired);
            let removed = set_difference(&previous, &desired);
            assert!(removed.iter().all(|r| !desired.contains(r)));
            assert!(removed.iter().all(|r| previous.contains(r)));
            for p in previous.iter().filter(|p| !desired.contains(p)) {
                assert!(removed.contains(p));
            }
        }
        assert_eq!(set_difference(&s(&["a", "b", "b"]), &s(&["a"])), s(&["b"]));
    }

    #[test]
    fn test_dedup_preserving_order() {
        assert_eq!(
            dedup_preserving_order(&s(&["b", "a", "b", "c", "a"])),
            s(&["b", "a", "c"])
        );
    }

    #[test]
    fn test_changed_value() {
        assert_eq!(changed_value("main", "develop"), Some("develop"));
        assert_eq!(changed_value("main", "main"), None);
        assert_eq!(changed_value(&3, &3), None);
    }
}
