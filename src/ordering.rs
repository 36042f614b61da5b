//! Placement of new tasks among their siblings.

use crate::errors::{Result, WorkflowError};

/// Computes the `order` value for a task about to be appended.
///
/// Must be fed a maximum read inside the same transaction as the append;
/// otherwise two concurrent creations can observe the same maximum and
/// produce duplicate order values.
pub struct TaskOrderingPolicy;

impl TaskOrderingPolicy {
    /// `1` for an empty workflow, `max + 1` otherwise. Edits may push a
    /// task's order to the numeric limit; the successor must then fail
    /// rather than wrap around to a non-positive order.
    pub fn next_order(current_max: Option<u32>) -> Result<u32> {
        match current_max {
            None => Ok(1),
            Some(max) => max.checked_add(1).ok_or_else(|| {
                WorkflowError::Inconsistency("task order space exhausted".to_string())
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn first_task_gets_order_one() {
        assert_eq!(TaskOrderingPolicy::next_order(None).unwrap(), 1);
    }

    #[test]
    fn next_order_ignores_gaps_left_by_deletions() {
        // Orders {1, 3, 4} after a deletion: only the maximum matters.
        assert_eq!(TaskOrderingPolicy::next_order(Some(4)).unwrap(), 5);
    }

    #[test]
    fn next_order_refuses_to_wrap_past_the_numeric_limit() {
        let err = TaskOrderingPolicy::next_order(Some(u32::MAX)).unwrap_err();
        assert_eq!(
            err,
            crate::errors::WorkflowError::Inconsistency("task order space exhausted".to_string())
        );
    }

    proptest! {
        #[test]
        fn next_order_is_the_successor_of_the_max(max in 0u32..1_000_000) {
            prop_assert_eq!(TaskOrderingPolicy::next_order(Some(max)).unwrap(), max + 1);
        }
    }
}
