// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Task dependency tree.
//!
//! A [`TaskLayer`] is one generation of a job's execution plan: its tasks may
//! run concurrently, and every child layer depends on all of them.
//!
//! ```text
//!   root ─ [RunInstances(n1), RunInstances(n2)]
//!            │
//!            ▼
//!          [RegisterMetadata]
//!            │
//!            ▼
//!          [StartConfd(n1), StartConfd(n2)]   ← leaf
//! ```

use super::task::Task;

/// One generation of a task tree.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskLayer {
    /// Tasks that may run concurrently.
    pub tasks: Vec<Task>,
    /// Layers that run after every task in this one has finished.
    pub children: Vec<TaskLayer>,
}

impl TaskLayer {
    /// Create a leaf layer.
    pub fn new(tasks: Vec<Task>) -> Self {
        Self {
            tasks,
            children: Vec::new(),
        }
    }

    /// Attach a dependent layer.
    pub fn with_child(mut self, child: TaskLayer) -> Self {
        self.children.push(child);
        self
    }

    /// Build a linear chain, first layer at the root. Empty layers are dropped
    /// so no generation waits on nothing; an empty root is returned when every
    /// layer is empty.
    pub fn chain(layers: Vec<Vec<Task>>) -> Self {
        layers
            .into_iter()
            .rev()
            .filter(|tasks| !tasks.is_empty())
            .fold(None, |child: Option<TaskLayer>, tasks| {
                let layer = TaskLayer::new(tasks);
                Some(match child {
                    Some(child) => layer.with_child(child),
                    None => layer,
                })
            })
            .unwrap_or_default()
    }

    /// A layer without children.
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Number of generations from this layer down to the deepest leaf.
    pub fn depth(&self) -> usize {
        1 + self.children.iter().map(TaskLayer::depth).max().unwrap_or(0)
    }

    /// Number of tasks in this layer and all descendants.
    pub fn task_count(&self) -> usize {
        let mut count = 0;
        self.walk(&mut |_, layer| count += layer.tasks.len());
        count
    }

    /// Depth-first, pre-order traversal calling `f(parent, current)` for every
    /// layer. The root is visited with `parent = None`.
    pub fn walk<'a, F>(&'a self, f: &mut F)
    where
        F: FnMut(Option<&'a TaskLayer>, &'a TaskLayer),
    {
        self.walk_from(None, f);
    }

    fn walk_from<'a, F>(&'a self, parent: Option<&'a TaskLayer>, f: &mut F)
    where
        F: FnMut(Option<&'a TaskLayer>, &'a TaskLayer),
    {
        f(parent, self);
        for child in &self.children {
            child.walk_from(Some(self), f);
        }
    }

    /// All tasks in traversal order.
    pub fn all_tasks(&self) -> Vec<&Task> {
        let mut tasks = Vec::new();
        self.walk(&mut |_, layer| tasks.extend(layer.tasks.iter()));
        tasks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn task(action: &str) -> Task {
        Task::new("j-1", "", "qingcloud", action, json!({}))
    }

    #[test]
    fn test_chain_builds_linear_tree() {
        let tree = TaskLayer::chain(vec![
            vec![task("a1"), task("a2")],
            vec![],
            vec![task("b1")],
            vec![task("c1"), task("c2"), task("c3")],
        ]);

        assert_eq!(tree.depth(), 3);
        assert_eq!(tree.task_count(), 6);
        assert_eq!(tree.tasks.len(), 2);
        assert_eq!(tree.children[0].tasks[0].task_action, "b1");
        assert!(tree.children[0].children[0].is_leaf());
    }

    #[test]
    fn test_chain_of_empty_layers_is_empty_root() {
        let tree = TaskLayer::chain(vec![vec![], vec![]]);
        assert!(tree.tasks.is_empty());
        assert!(tree.is_leaf());
        assert_eq!(tree.task_count(), 0);
    }

    #[test]
    fn test_walk_visits_parent_before_children() {
        let tree = TaskLayer::new(vec![task("root")])
            .with_child(
                TaskLayer::new(vec![task("left")])
                    .with_child(TaskLayer::new(vec![task("left-leaf")])),
            )
            .with_child(TaskLayer::new(vec![task("right")]));

        let mut visits = Vec::new();
        tree.walk(&mut |parent, current| {
            visits.push((
                parent.map(|p| p.tasks[0].task_action.clone()),
                current.tasks[0].task_action.clone(),
            ));
        });

        assert_eq!(
            visits,
            vec![
                (None, "root".to_string()),
                (Some("root".to_string()), "left".to_string()),
                (Some("left".to_string()), "left-leaf".to_string()),
                (Some("root".to_string()), "right".to_string()),
            ]
        );
        assert_eq!(tree.depth(), 3);
        let actions: Vec<_> = tree.all_tasks().iter().map(|t| t.task_action.as_str()).collect();
        assert_eq!(actions, vec!["root", "left", "left-leaf", "right"]);
    }
}
