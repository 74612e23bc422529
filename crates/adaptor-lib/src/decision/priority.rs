//! Priority and age based target selection
//!
//! Growth favours the most important task type, then the longest-running
//! one. Removal takes the least important task, newest first. Hosts use the
//! default flexibility ranking.

use super::base::{TargetSelector, TaskCandidate, TypeCandidate};

#[derive(Debug, Default, Clone, Copy)]
pub struct PrioritySelector;

impl TargetSelector for PrioritySelector {
    fn order_types(&self, candidates: &mut [TypeCandidate]) {
        candidates.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                // Oldest running type first, types with nothing running last
                .then_with(|| match (a.oldest_created, b.oldest_created) {
                    (Some(x), Some(y)) => x.cmp(&y),
                    (Some(_), None) => std::cmp::Ordering::Less,
                    (None, Some(_)) => std::cmp::Ordering::Greater,
                    (None, None) => std::cmp::Ordering::Equal,
                })
                .then_with(|| a.name.cmp(&b.name))
        });
    }

    fn order_removals(&self, candidates: &mut [TaskCandidate]) {
        candidates.sort_by(|a, b| {
            a.task
                .priority
                .cmp(&b.task.priority)
                .then(b.task.created_at.cmp(&a.task.created_at))
                .then_with(|| a.task.task_id.cmp(&b.task.task_id))
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Task;

    fn task(id: &str, created_at: i64, priority: i32) -> TaskCandidate {
        TaskCandidate {
            task: Task {
                task_id: id.to_string(),
                task_type: "worker".to_string(),
                application_id: "lammps".to_string(),
                deployment_id: "7".to_string(),
                host_name: "node-1".to_string(),
                created_at,
                priority,
            },
            power: 0.0,
        }
    }

    #[test]
    fn test_newest_low_priority_task_removed_first() {
        let mut candidates = vec![
            task("old", 10, 0),
            task("new", 30, 0),
            task("important", 40, 5),
            task("mid", 20, 0),
        ];
        PrioritySelector.order_removals(&mut candidates);

        let order: Vec<&str> = candidates.iter().map(|c| c.task.task_id.as_str()).collect();
        assert_eq!(order, vec!["new", "mid", "old", "important"]);
    }

    #[test]
    fn test_high_priority_then_oldest_type_grown() {
        let t = |name: &str, priority: i32, oldest: Option<i64>| TypeCandidate {
            name: name.to_string(),
            priority,
            running: 1,
            average_power: 0.0,
            oldest_created: oldest,
        };
        let mut candidates = vec![
            t("fresh", 0, None),
            t("young", 0, Some(50)),
            t("veteran", 0, Some(5)),
            t("critical", 3, Some(90)),
        ];
        PrioritySelector.order_types(&mut candidates);

        let order: Vec<&str> = candidates.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(order, vec!["critical", "veteran", "young", "fresh"]);
    }
}
