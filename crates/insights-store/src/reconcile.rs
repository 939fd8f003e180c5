//! Idempotent application of row changes to keyed collections.

use insights_model::Keyed;

/// Where a record not yet present is placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Placement {
    Front,
    Back,
}

/// Replace the record with the same key in place, or insert it.
///
/// Returns true when the record was new.
pub(crate) fn upsert<T: Keyed>(items: &mut Vec<T>, item: T, placement: Placement) -> bool {
    if let Some(existing) = items.iter_mut().find(|i| i.key() == item.key()) {
        *existing = item;
        return false;
    }
    match placement {
        Placement::Front => items.insert(0, item),
        Placement::Back => items.push(item),
    }
    true
}

/// Remove the record with `key`. No-op when absent.
pub(crate) fn remove<T: Keyed>(items: &mut Vec<T>, key: &str) -> bool {
    let before = items.len();
    items.retain(|i| i.key() != key);
    items.len() != before
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Row(&'static str, u32);

    impl Keyed for Row {
        fn key(&self) -> &str {
            self.0
        }
    }

    #[test]
    fn repeated_insert_does_not_duplicate() {
        let mut rows = vec![Row("b", 1)];
        assert!(upsert(&mut rows, Row("a", 1), Placement::Front));
        assert!(!upsert(&mut rows, Row("a", 2), Placement::Front));
        assert_eq!(rows, vec![Row("a", 2), Row("b", 1)]);
    }

    #[test]
    fn back_placement_appends() {
        let mut rows = vec![Row("a", 1)];
        upsert(&mut rows, Row("b", 1), Placement::Back);
        assert_eq!(rows.last(), Some(&Row("b", 1)));
    }

    #[test]
    fn remove_missing_is_a_no_op() {
        let mut rows = vec![Row("a", 1)];
        assert!(!remove(&mut rows, "z"));
        assert!(remove(&mut rows, "a"));
        assert!(rows.is_empty());
    }
}
