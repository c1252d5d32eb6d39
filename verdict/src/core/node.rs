//! Live node tree mirroring the nesting of executing entities.
//!
//! The tree is a stack: the tail is the innermost running node. Closing a node
//! finalizes its status, folds in its children, and attaches it to its parent.

use anyhow::{Result, anyhow};

use crate::core::statistic::Entity;
use crate::core::status::{Status, most_severe};

/// One nested execution unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub entity: Entity,
    pub status: Option<Status>,
    /// Set when the node is expected to contain children (e.g. a scenario with steps).
    pub has_children: bool,
    pub children: Vec<Node>,
}

impl Node {
    pub fn new(entity: Entity) -> Self {
        Self {
            entity,
            status: None,
            has_children: false,
            children: Vec::new(),
        }
    }

    /// Raise the status to `candidate` if unset or if `candidate` is strictly worse.
    ///
    /// Returns true if the status changed.
    pub fn update_status(&mut self, candidate: Status) -> bool {
        match self.status {
            Some(current) if !candidate.is_worse_than(current) => false,
            _ => {
                self.status = Some(candidate);
                true
            }
        }
    }

    /// Composite steps only wrap other steps and are not counted on their own.
    pub fn is_composite_step(&self) -> bool {
        self.entity == Entity::Step && !self.children.is_empty()
    }
}

/// Summary of a node that was just closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClosedNode {
    pub entity: Entity,
    pub status: Status,
    /// Whether the node contributes to the statistics of its entity kind.
    pub counted: bool,
}

/// Per-worker stack of open nodes.
#[derive(Debug, Default)]
pub struct NodeTree {
    stack: Vec<Node>,
}

impl NodeTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a node under the current tail (or as a new root) and return it for decoration.
    pub fn start(&mut self, entity: Entity) -> &mut Node {
        self.stack.push(Node::new(entity));
        let last = self.stack.len() - 1;
        &mut self.stack[last]
    }

    pub fn tail(&self) -> Option<&Node> {
        self.stack.last()
    }

    /// Raise the status of the innermost open node.
    pub fn update_tail_status(&mut self, status: Status) -> Result<()> {
        let tail = self
            .stack
            .last_mut()
            .ok_or_else(|| anyhow!("no open node to update with status {}", status.label()))?;
        tail.update_status(status);
        Ok(())
    }

    /// Close the innermost open node and finalize its status.
    ///
    /// - A node expected to have children but without any is skipped.
    /// - Otherwise an unset status defaults to passed.
    /// - The most severe child status is folded in.
    pub fn end(&mut self) -> Result<ClosedNode> {
        let mut node = self
            .stack
            .pop()
            .ok_or_else(|| anyhow!("no open node to close"))?;

        if node.has_children && node.children.is_empty() {
            node.status = Some(Status::Skipped);
        } else if node.status.is_none() {
            node.status = Some(Status::Passed);
        }
        if let Some(worst_child) = most_severe(node.children.iter().filter_map(|child| child.status)) {
            node.update_status(worst_child);
        }

        let status = node.status.unwrap_or(Status::Passed);
        let closed = ClosedNode {
            entity: node.entity,
            status,
            counted: !node.is_composite_step(),
        };

        if let Some(parent) = self.stack.last_mut() {
            parent.children.push(node);
        }
        Ok(closed)
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    /// Drop every open node (used when a new root story starts a fresh tree).
    pub fn clear(&mut self) {
        self.stack.clear();
    }
}
