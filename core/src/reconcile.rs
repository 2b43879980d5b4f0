//! Identity-based reconciliation of ordered lists.
//!
//! Given the identities of an existing list and of a new list, [`diff`] works out which existing
//! entries are kept (and where they go), which new entries have to be created, and which existing
//! entries are left over and have to be removed. The result always follows the new order.

use std::collections::HashMap;
use std::hash::Hash;

/// One entry of the new list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// The existing entry at `old` becomes the new entry at `new`.
    Keep { old: usize, new: usize },
    /// There is no existing entry for the new entry at `new`.
    Create { new: usize },
}

impl Step {
    /// Index in the new list.
    pub fn new_index(&self) -> usize {
        match *self {
            Step::Keep { new, .. } | Step::Create { new } => new,
        }
    }
}

/// The result of reconciling two lists.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Diff {
    /// One step per entry of the new list, in the new order.
    pub steps: Vec<Step>,
    /// Indices of unmatched existing entries, last first.
    pub removed: Vec<usize>,
}

impl Diff {
    /// Whether the new list is exactly the old list.
    pub fn is_identity(&self) -> bool {
        self.removed.is_empty()
            && self.steps.iter().enumerate().all(|(i, step)| match *step {
                Step::Keep { old, new } => old == i && new == i,
                Step::Create { .. } => false,
            })
    }
}

/// Reconciles `old` against `new` by identity.
///
/// If an identity occurs more than once, the first occurrences are paired up and any further
/// occurrences count as unmatched. Runs in linear time.
pub fn diff<K: Eq + Hash>(old: &[K], new: &[K]) -> Diff {
    // first occurrence of each identity in the old list
    let mut old_by_key: HashMap<&K, usize> = HashMap::with_capacity(old.len());
    for (i, key) in old.iter().enumerate() {
        old_by_key.entry(key).or_insert(i);
    }

    let mut kept = vec![false; old.len()];
    let mut steps = Vec::with_capacity(new.len());
    for (new_index, key) in new.iter().enumerate() {
        match old_by_key.remove(key) {
            Some(old_index) => {
                kept[old_index] = true;
                steps.push(Step::Keep {
                    old: old_index,
                    new: new_index,
                });
            }
            None => steps.push(Step::Create { new: new_index }),
        }
    }

    let removed = (0..old.len()).rev().filter(|i| !kept[*i]).collect();
    Diff { steps, removed }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_creates_and_removes_in_new_order() {
        // a, b, c => c, d, b
        let d = diff(&[1, 2, 3], &[3, 4, 2]);
        assert_eq!(
            d.steps,
            vec![
                Step::Keep { old: 2, new: 0 },
                Step::Create { new: 1 },
                Step::Keep { old: 1, new: 2 },
            ]
        );
        assert_eq!(d.removed, vec![0]);
    }

    #[test]
    fn removals_are_last_first() {
        let d = diff(&["a", "b", "c", "d"], &["c"]);
        assert_eq!(d.removed, vec![3, 1, 0]);
    }

    #[test]
    fn duplicate_identities_match_first_occurrence() {
        let d = diff(&[7, 7, 8], &[7, 7]);
        assert_eq!(
            d.steps,
            vec![Step::Keep { old: 0, new: 0 }, Step::Create { new: 1 }]
        );
        assert_eq!(d.removed, vec![2, 1]);
    }

    #[test]
    fn identity() {
        assert!(diff(&[1, 2], &[1, 2]).is_identity());
        assert!(!diff(&[1, 2], &[2, 1]).is_identity());
        assert!(diff::<u8>(&[], &[]).is_identity());
    }
}
