//! Sibling priority assignment
//!
//! Turns an anchor inside a priority-ordered sibling group into a concrete
//! priority, plus the sibling rewrites needed to make room for it. When no
//! integer gap exists the whole group is spread to multiples of the
//! configured spacing and the anchor is resolved again.

use crate::domain::errors::TreeError;
use crate::domain::value_objects::{NodeId, Priority};
use std::collections::HashSet;

/// One member of a sibling group, as seen by the ordering protocol.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SiblingSlot {
    pub id: NodeId,
    pub priority: Priority,
}

impl SiblingSlot {
    pub fn new(id: NodeId, priority: Priority) -> Self {
        Self { id, priority }
    }
}

/// Where the new priority must land, relative to a group sorted by
/// ascending priority.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Anchor {
    First,
    Last,
    /// Immediately left of the sibling at this index
    Before(usize),
    /// Immediately right of the sibling at this index
    After(usize),
    /// This exact priority, shifting occupants to the right
    Exact(Priority),
}

/// Resolved priority plus sibling rewrites to apply in the same transaction.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PriorityPlan {
    pub priority: Priority,
    pub updates: Vec<(NodeId, Priority)>,
    pub renumbered: bool,
}

/// Priorities for a spliced run plus the rewrites of existing siblings.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SplicePlan {
    pub assigned: Vec<(NodeId, Priority)>,
    pub updates: Vec<(NodeId, Priority)>,
    pub renumbered: bool,
}

/// Sibling ordering protocol.
#[derive(Clone, Copy, Debug)]
pub struct SiblingOrdering {
    spacing: Priority,
}

impl SiblingOrdering {
    pub fn new(spacing: Priority) -> Self {
        Self {
            spacing: spacing.max(2),
        }
    }

    /// Resolve `anchor` against `siblings` (ascending priority, the node
    /// being placed excluded).
    pub fn resolve(
        &self,
        parent: Option<NodeId>,
        siblings: &[SiblingSlot],
        anchor: Anchor,
    ) -> Result<PriorityPlan, TreeError> {
        check_index(parent, siblings, anchor)?;

        if let Anchor::Exact(priority) = anchor {
            if let Some(plan) = shift_for_exact(siblings, priority) {
                return Ok(plan);
            }
        } else if let Some(priority) = free_slot(siblings, anchor) {
            return Ok(PriorityPlan {
                priority,
                updates: Vec::new(),
                renumbered: false,
            });
        }

        // No room: spread the group and place again.
        let spread = self.renumber(parent, siblings)?;
        let anchor = match anchor {
            Anchor::Exact(priority) => {
                let index = siblings.partition_point(|s| s.priority < priority);
                if index == siblings.len() {
                    Anchor::Last
                } else {
                    Anchor::Before(index)
                }
            }
            other => other,
        };
        let priority =
            free_slot(&spread, anchor).ok_or(TreeError::PriorityConflict {
                parent,
                priority: spread.first().map(|s| s.priority).unwrap_or_default(),
            })?;

        let updates = spread
            .iter()
            .zip(siblings)
            .filter(|(new, old)| new.priority != old.priority)
            .map(|(new, _)| (new.id, new.priority))
            .collect();

        Ok(PriorityPlan {
            priority,
            updates,
            renumbered: true,
        })
    }

    /// Priorities for `incoming` placed as a run at index `at` of
    /// `siblings`, keeping the run's order. The run is spread evenly over
    /// the gap at `at`; when the gap is too small the combined group is
    /// renumbered.
    pub fn splice(
        &self,
        parent: Option<NodeId>,
        siblings: &[SiblingSlot],
        at: usize,
        incoming: &[NodeId],
    ) -> Result<SplicePlan, TreeError> {
        let at = at.min(siblings.len());
        if incoming.is_empty() {
            return Ok(SplicePlan::default());
        }

        let lo = at.checked_sub(1).map(|i| siblings[i].priority);
        let hi = siblings.get(at).map(|s| s.priority);
        if let Some(priorities) = spread_run(lo, hi, incoming.len(), self.spacing) {
            return Ok(SplicePlan {
                assigned: incoming.iter().copied().zip(priorities).collect(),
                updates: Vec::new(),
                renumbered: false,
            });
        }

        let combined: Vec<SiblingSlot> = siblings[..at]
            .iter()
            .copied()
            .chain(incoming.iter().map(|id| SiblingSlot::new(*id, 0)))
            .chain(siblings[at..].iter().copied())
            .collect();
        let spread = self.renumber(parent, &combined)?;

        let assigned = spread[at..at + incoming.len()]
            .iter()
            .map(|s| (s.id, s.priority))
            .collect();
        let updates = spread[..at]
            .iter()
            .chain(&spread[at + incoming.len()..])
            .zip(siblings)
            .filter(|(new, old)| new.priority != old.priority)
            .map(|(new, _)| (new.id, new.priority))
            .collect();

        Ok(SplicePlan {
            assigned,
            updates,
            renumbered: true,
        })
    }

    /// Spread a group to `0, spacing, 2 * spacing, ...` keeping its order.
    pub fn renumber(
        &self,
        parent: Option<NodeId>,
        siblings: &[SiblingSlot],
    ) -> Result<Vec<SiblingSlot>, TreeError> {
        siblings
            .iter()
            .enumerate()
            .map(|(i, s)| {
                (i as Priority)
                    .checked_mul(self.spacing)
                    .map(|p| SiblingSlot::new(s.id, p))
                    .ok_or_else(|| TreeError::Renumber {
                        parent,
                        reason: format!("{} siblings overflow the priority range", siblings.len()),
                    })
            })
            .collect()
    }
}

/// Binary-search index for sorted insertion.
///
/// `is_before(i)` tells whether sibling `i` sorts before the new node.
pub fn sorted_anchor(len: usize, is_before: impl Fn(usize) -> bool) -> Anchor {
    let (mut lo, mut hi) = (0, len);
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        if is_before(mid) {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }
    if lo == len {
        Anchor::Last
    } else {
        Anchor::Before(lo)
    }
}

/// Whether every priority in the group is distinct.
pub fn priorities_unique(slots: &[SiblingSlot]) -> bool {
    let mut seen = HashSet::with_capacity(slots.len());
    slots.iter().all(|s| seen.insert(s.priority))
}

fn check_index(
    parent: Option<NodeId>,
    siblings: &[SiblingSlot],
    anchor: Anchor,
) -> Result<(), TreeError> {
    match anchor {
        Anchor::Before(i) | Anchor::After(i) if i >= siblings.len() => {
            Err(TreeError::InvalidPosition(format!(
                "reference index {} out of range for {} siblings under {:?}",
                i,
                siblings.len(),
                parent
            )))
        }
        _ => Ok(()),
    }
}

fn free_slot(siblings: &[SiblingSlot], anchor: Anchor) -> Option<Priority> {
    let at = |i: usize| siblings.get(i).map(|s| s.priority);
    match anchor {
        Anchor::First => between(None, at(0)),
        Anchor::Last => between(siblings.last().map(|s| s.priority), None),
        Anchor::Before(i) => between(i.checked_sub(1).and_then(at), at(i)),
        Anchor::After(i) => between(at(i), at(i + 1)),
        Anchor::Exact(p) => (!siblings.iter().any(|s| s.priority == p)).then_some(p),
    }
}

fn between(lo: Option<Priority>, hi: Option<Priority>) -> Option<Priority> {
    match (lo, hi) {
        (None, None) => Some(0),
        (None, Some(hi)) => hi.checked_sub(1),
        (Some(lo), None) => lo.checked_add(1),
        (Some(lo), Some(hi)) => {
            let gap = hi as i128 - lo as i128;
            (gap >= 2).then(|| (lo as i128 + gap / 2) as Priority)
        }
    }
}

/// `len` distinct ascending priorities strictly between `lo` and `hi`.
fn spread_run(
    lo: Option<Priority>,
    hi: Option<Priority>,
    len: usize,
    spacing: Priority,
) -> Option<Vec<Priority>> {
    let len = len as i128;
    let (start, step) = match (lo, hi) {
        (None, None) => (0, spacing as i128),
        (Some(lo), None) => (lo as i128 + 1, 1),
        (None, Some(hi)) => (hi as i128 - len, 1),
        (Some(lo), Some(hi)) => {
            let gap = hi as i128 - lo as i128;
            if gap <= len {
                return None;
            }
            let step = gap / (len + 1);
            (lo as i128 + step, step)
        }
    };

    (0..len)
        .map(|i| Priority::try_from(start + i * step).ok())
        .collect()
}

/// Take `priority` and push the contiguous run of occupants starting at it
/// one step right. `None` when the run would overflow.
fn shift_for_exact(siblings: &[SiblingSlot], priority: Priority) -> Option<PriorityPlan> {
    let Some(start) = siblings.iter().position(|s| s.priority == priority) else {
        return Some(PriorityPlan {
            priority,
            updates: Vec::new(),
            renumbered: false,
        });
    };

    let mut updates = Vec::new();
    let mut expected = priority;
    for slot in &siblings[start..] {
        if slot.priority != expected {
            break;
        }
        let shifted = slot.priority.checked_add(1)?;
        updates.push((slot.id, shifted));
        expected = shifted;
    }

    Some(PriorityPlan {
        priority,
        updates,
        renumbered: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn group(priorities: &[Priority]) -> Vec<SiblingSlot> {
        priorities
            .iter()
            .enumerate()
            .map(|(i, p)| SiblingSlot::new(i as NodeId + 1, *p))
            .collect()
    }

    fn apply(siblings: &[SiblingSlot], plan: &PriorityPlan) -> Vec<SiblingSlot> {
        let mut result: Vec<SiblingSlot> = siblings
            .iter()
            .map(|s| {
                plan.updates
                    .iter()
                    .find(|(id, _)| *id == s.id)
                    .map(|(id, p)| SiblingSlot::new(*id, *p))
                    .unwrap_or(*s)
            })
            .collect();
        result.push(SiblingSlot::new(999, plan.priority));
        result
    }

    #[test]
    fn test_first_and_last_in_empty_group() {
        let ordering = SiblingOrdering::new(1024);
        assert_eq!(ordering.resolve(None, &[], Anchor::First).unwrap().priority, 0);
        assert_eq!(ordering.resolve(None, &[], Anchor::Last).unwrap().priority, 0);
    }

    #[test]
    fn test_first_and_last() {
        let ordering = SiblingOrdering::new(1024);
        let siblings = group(&[3, 7]);
        assert_eq!(
            ordering.resolve(None, &siblings, Anchor::First).unwrap().priority,
            2
        );
        assert_eq!(
            ordering.resolve(None, &siblings, Anchor::Last).unwrap().priority,
            8
        );
    }

    #[test]
    fn test_left_of_with_gap() {
        let ordering = SiblingOrdering::new(1024);
        let siblings = group(&[0, 10]);
        let plan = ordering
            .resolve(Some(1), &siblings, Anchor::Before(1))
            .unwrap();
        assert_eq!(plan.priority, 5);
        assert!(plan.updates.is_empty());
        assert!(!plan.renumbered);
    }

    /// A=0, B=1; insert left of B → renumber to A=0, B=1024, new=512.
    #[test]
    fn test_left_of_without_gap_renumbers() {
        let ordering = SiblingOrdering::new(1024);
        let siblings = group(&[0, 1]);
        let plan = ordering
            .resolve(Some(1), &siblings, Anchor::Before(1))
            .unwrap();

        assert!(plan.renumbered);
        assert_eq!(plan.priority, 512);
        assert_eq!(plan.updates, vec![(2, 1024)]);
    }

    #[test]
    fn test_right_of_last_sibling() {
        let ordering = SiblingOrdering::new(1024);
        let siblings = group(&[0, 1]);
        let plan = ordering
            .resolve(None, &siblings, Anchor::After(1))
            .unwrap();
        assert_eq!(plan.priority, 2);
    }

    #[test]
    fn test_exact_free_priority() {
        let ordering = SiblingOrdering::new(1024);
        let siblings = group(&[0, 5]);
        let plan = ordering
            .resolve(None, &siblings, Anchor::Exact(3))
            .unwrap();
        assert_eq!(plan.priority, 3);
        assert!(plan.updates.is_empty());
    }

    #[test]
    fn test_exact_shifts_contiguous_run() {
        let ordering = SiblingOrdering::new(1024);
        let siblings = group(&[0, 1, 2, 5]);
        let plan = ordering
            .resolve(None, &siblings, Anchor::Exact(1))
            .unwrap();

        assert_eq!(plan.priority, 1);
        assert_eq!(plan.updates, vec![(2, 2), (3, 3)]);
        assert!(priorities_unique(&apply(&siblings, &plan)));
    }

    #[test]
    fn test_exact_overflow_renumbers() {
        let ordering = SiblingOrdering::new(1024);
        let siblings = group(&[i64::MAX - 1, i64::MAX]);
        let plan = ordering
            .resolve(None, &siblings, Anchor::Exact(i64::MAX - 1))
            .unwrap();

        assert!(plan.renumbered);
        assert_eq!(plan.priority, -1);
        assert!(priorities_unique(&apply(&siblings, &plan)));
    }

    #[test]
    fn test_last_overflow_renumbers() {
        let ordering = SiblingOrdering::new(1024);
        let siblings = group(&[0, i64::MAX]);
        let plan = ordering.resolve(None, &siblings, Anchor::Last).unwrap();
        assert!(plan.renumbered);
        assert_eq!(plan.priority, 1025);
    }

    #[test]
    fn test_reference_out_of_range() {
        let ordering = SiblingOrdering::new(1024);
        let err = ordering
            .resolve(None, &group(&[0]), Anchor::After(3))
            .unwrap_err();
        assert!(matches!(err, TreeError::InvalidPosition(_)));
    }

    #[test]
    fn test_splice_into_gap() {
        let ordering = SiblingOrdering::new(1024);
        let siblings = group(&[0, 100]);
        let plan = ordering.splice(Some(1), &siblings, 1, &[7, 8]).unwrap();

        assert!(!plan.renumbered);
        assert!(plan.updates.is_empty());
        assert_eq!(plan.assigned, vec![(7, 33), (8, 66)]);
    }

    #[test]
    fn test_splice_at_edges() {
        let ordering = SiblingOrdering::new(1024);
        let siblings = group(&[5, 9]);

        let front = ordering.splice(None, &siblings, 0, &[7, 8]).unwrap();
        assert_eq!(front.assigned, vec![(7, 3), (8, 4)]);

        let back = ordering.splice(None, &siblings, 2, &[7]).unwrap();
        assert_eq!(back.assigned, vec![(7, 10)]);

        let alone = ordering.splice(None, &[], 0, &[7, 8]).unwrap();
        assert_eq!(alone.assigned, vec![(7, 0), (8, 1024)]);
    }

    #[test]
    fn test_splice_without_room_renumbers() {
        let ordering = SiblingOrdering::new(1024);
        let siblings = group(&[0, 1, 2]);
        let plan = ordering.splice(None, &siblings, 1, &[7, 8]).unwrap();

        assert!(plan.renumbered);
        assert_eq!(plan.assigned, vec![(7, 1024), (8, 2048)]);
        assert_eq!(plan.updates, vec![(2, 3072), (3, 4096)]);
    }

    #[test]
    fn test_sorted_anchor() {
        let names = ["apple", "cherry", "plum"];
        assert_eq!(sorted_anchor(3, |i| names[i] < "banana"), Anchor::Before(1));
        assert_eq!(sorted_anchor(3, |i| names[i] < "aardvark"), Anchor::Before(0));
        assert_eq!(sorted_anchor(3, |i| names[i] < "zucchini"), Anchor::Last);
    }

    proptest! {
        #[test]
        fn prop_resolved_priority_is_unique_and_ordered(
            priorities in proptest::collection::btree_set(-50i64..50, 0..12),
            pick in 0usize..16,
            side in 0u8..4,
        ) {
            let priorities: Vec<i64> = priorities.into_iter().collect();
            let siblings = group(&priorities);
            let anchor = match (side, siblings.is_empty()) {
                (_, true) | (0, _) => Anchor::First,
                (1, _) => Anchor::Last,
                (2, _) => Anchor::Before(pick % siblings.len()),
                _ => Anchor::After(pick % siblings.len()),
            };

            let plan = SiblingOrdering::new(1024).resolve(None, &siblings, anchor).unwrap();
            let mut result = apply(&siblings, &plan);
            prop_assert!(priorities_unique(&result));

            // Relative order of the existing siblings never changes.
            result.sort_by_key(|s| s.priority);
            let ids: Vec<NodeId> = result.iter().map(|s| s.id).filter(|id| *id != 999).collect();
            let original: Vec<NodeId> = siblings.iter().map(|s| s.id).collect();
            prop_assert_eq!(ids, original);

            // The new node lands where the anchor asked.
            let at = result.iter().position(|s| s.id == 999).unwrap();
            let expected = match anchor {
                Anchor::First => 0,
                Anchor::Last => siblings.len(),
                Anchor::Before(i) => i,
                Anchor::After(i) => i + 1,
                Anchor::Exact(_) => unreachable!(),
            };
            prop_assert_eq!(at, expected);
        }
    }
}
