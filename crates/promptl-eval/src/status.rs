//! Per-node bookkeeping that lets a chain resume where it paused.
//!
//! Statuses live in a side table indexed by [`NodeId`], one slot per node of
//! the template. A node is identified together with its *iteration path*:
//! the indices of every `for` iteration enclosing it. The same node inside
//! two iterations of a loop is two distinct visits.

use promptl_parser::NodeId;

use crate::scope::Pointers;
use crate::value::Value;

/// Loop iteration indices enclosing a visit, outermost first.
pub type IterationPath = Vec<usize>;

/// What a block decided before a pause unwound through it.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Resume {
    #[default]
    None,
    /// The `if` branch taken.
    Branch(bool),
    /// The items of a `for` block, the iteration that paused and the index
    /// value bound for it.
    Iteration {
        items: Vec<Value>,
        index: usize,
        index_value: Option<Value>,
    },
}

/// Where a paused visit stood: the scope bindings at entry.
#[derive(Debug, Clone, PartialEq)]
pub struct PausePoint {
    pub path: IterationPath,
    pub pointers: Pointers,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeStatus {
    /// Set once the visit at this path ran to completion.
    pub completed_at: Option<IterationPath>,
    pub paused: Option<PausePoint>,
    pub resume: Resume,
}

/// The status table of one template.
#[derive(Debug, Clone, Default)]
pub struct Statuses {
    nodes: Vec<NodeStatus>,
}

impl Statuses {
    pub fn new(node_count: usize) -> Self {
        Self {
            nodes: vec![NodeStatus::default(); node_count],
        }
    }

    pub fn get(&self, id: NodeId) -> &NodeStatus {
        &self.nodes[id]
    }

    pub fn get_mut(&mut self, id: NodeId) -> &mut NodeStatus {
        &mut self.nodes[id]
    }

    pub fn is_completed(&self, id: NodeId, path: &IterationPath) -> bool {
        self.nodes[id].completed_at.as_ref() == Some(path)
    }

    /// Pointers saved when the visit at `path` paused, if it did.
    pub fn paused_pointers(&self, id: NodeId, path: &IterationPath) -> Option<&Pointers> {
        self.nodes[id]
            .paused
            .as_ref()
            .filter(|point| &point.path == path)
            .map(|point| &point.pointers)
    }

    pub fn mark_completed(&mut self, id: NodeId, path: &IterationPath) {
        let status = &mut self.nodes[id];
        status.completed_at = Some(path.clone());
        status.paused = None;
        status.resume = Resume::None;
    }

    pub fn mark_paused(&mut self, id: NodeId, path: &IterationPath, pointers: Pointers) {
        self.nodes[id].paused = Some(PausePoint {
            path: path.clone(),
            pointers,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completion_is_per_iteration_path() {
        let mut statuses = Statuses::new(2);
        statuses.mark_completed(1, &vec![0]);
        assert!(statuses.is_completed(1, &vec![0]));
        assert!(!statuses.is_completed(1, &vec![1]));
        assert!(!statuses.is_completed(0, &vec![]));
    }

    #[test]
    fn test_completion_clears_pause() {
        let mut statuses = Statuses::new(1);
        let pointers = Pointers::from([("x".to_string(), 0)]);
        statuses.mark_paused(0, &vec![], pointers.clone());
        statuses.get_mut(0).resume = Resume::Branch(true);
        assert_eq!(statuses.paused_pointers(0, &vec![]), Some(&pointers));
        assert_eq!(statuses.paused_pointers(0, &vec![3]), None);

        statuses.mark_completed(0, &vec![]);
        assert_eq!(statuses.get(0).paused, None);
        assert_eq!(statuses.get(0).resume, Resume::None);
    }
}
