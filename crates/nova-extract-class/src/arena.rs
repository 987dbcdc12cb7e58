//! A small owned syntax tree, lowered from tree-sitter, that members are copied through.
//!
//! Tree-sitter trees are immutable and tied to the text they were parsed from. When a
//! member moves to the new class we lower it into a [`SyntaxArena`], deep-copy it with
//! [`clone_subtree`] into the destination arena and edit the copy there. The copy shares
//! no node identity with the original.
//!
//! Rendering is lossless: every leaf keeps its token text and the whitespace/comment gap
//! that preceded it in the original source.

use std::fmt;

use thiserror::Error;
use tree_sitter::Node;

use crate::edit::TextRange;
use crate::java::range_of;

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    #[must_use]
    pub fn idx(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ArenaError {
    #[error("unknown syntax node {0:?}")]
    UnknownNode(NodeId),
    #[error("syntax node {0:?} is not a token")]
    NotALeaf(NodeId),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyntaxNode {
    pub kind: &'static str,
    /// Field name under which this node hangs off its parent.
    pub field: Option<&'static str>,
    pub named: bool,
    /// Where the node came from in the source it was lowered from.
    pub origin: TextRange,
    /// Gap text (whitespace, stray characters) between the previous token and this one.
    pub leading: String,
    /// Token text; `None` for interior nodes.
    pub text: Option<String>,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SyntaxArena {
    nodes: Vec<SyntaxNode>,
}

impl SyntaxArena {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn alloc(&mut self, node: SyntaxNode) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    pub fn get(&self, id: NodeId) -> Result<&SyntaxNode, ArenaError> {
        self.nodes.get(id.idx()).ok_or(ArenaError::UnknownNode(id))
    }

    fn get_mut(&mut self, id: NodeId) -> Result<&mut SyntaxNode, ArenaError> {
        self.nodes.get_mut(id.idx()).ok_or(ArenaError::UnknownNode(id))
    }

    /// Lowers `node` (and everything below it) from a tree parsed from `source`.
    pub fn lower(&mut self, source: &str, node: Node<'_>) -> NodeId {
        let mut cursor = node.start_byte();
        self.lower_node(source, node, None, None, &mut cursor)
    }

    fn lower_node(
        &mut self,
        source: &str,
        node: Node<'_>,
        field: Option<&'static str>,
        parent: Option<NodeId>,
        gap_start: &mut usize,
    ) -> NodeId {
        let is_leaf = node.child_count() == 0;
        let (leading, text) = if is_leaf {
            let leading = source
                .get(*gap_start..node.start_byte())
                .unwrap_or_default()
                .to_string();
            *gap_start = node.end_byte();
            (leading, Some(source[node.byte_range()].to_string()))
        } else {
            (String::new(), None)
        };

        let id = self.alloc(SyntaxNode {
            kind: node.kind(),
            field,
            named: node.is_named(),
            origin: range_of(node),
            leading,
            text,
            parent,
            children: Vec::new(),
        });

        if !is_leaf {
            let mut tree_cursor = node.walk();
            if tree_cursor.goto_first_child() {
                loop {
                    let child = tree_cursor.node();
                    let child_field = tree_cursor.field_name();
                    let child_id = self.lower_node(source, child, child_field, Some(id), gap_start);
                    self.nodes[id.idx()].children.push(child_id);
                    if !tree_cursor.goto_next_sibling() {
                        break;
                    }
                }
            }
        }
        id
    }

    /// Pre-order traversal of `id` and its descendants.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            let Some(node) = self.nodes.get(next.idx()) else {
                continue;
            };
            out.push(next);
            stack.extend(node.children.iter().rev().copied());
        }
        out
    }

    /// The node below `root` lowered from `origin` with the given kind.
    pub fn find_by_origin(&self, root: NodeId, origin: TextRange, kind: &str) -> Option<NodeId> {
        self.descendants(root).into_iter().find(|id| {
            let node = &self.nodes[id.idx()];
            node.origin == origin && node.kind == kind
        })
    }

    pub fn set_text(&mut self, id: NodeId, text: impl Into<String>) -> Result<(), ArenaError> {
        let node = self.get_mut(id)?;
        match node.text.as_mut() {
            Some(existing) => {
                *existing = text.into();
                Ok(())
            }
            None => Err(ArenaError::NotALeaf(id)),
        }
    }

    /// Detaches `id` from its parent.
    ///
    /// The gap in front of the removed tokens moves to the token that followed them, so line
    /// structure survives removing e.g. a modifier that started a line.
    pub fn remove(&mut self, id: NodeId) -> Result<(), ArenaError> {
        let parent = self.get(id)?.parent;
        let leaves = self.leaves(id);
        let leading = match leaves.first() {
            Some(first) => self.get(*first)?.leading.clone(),
            None => String::new(),
        };

        let root = self.root_of(id);
        let all_leaves = self.leaves(root);
        let following = leaves
            .last()
            .and_then(|last| all_leaves.iter().position(|leaf| leaf == last))
            .and_then(|pos| all_leaves.get(pos + 1).copied());
        if let Some(following) = following {
            self.get_mut(following)?.leading = leading;
        }

        if let Some(parent) = parent {
            self.get_mut(parent)?.children.retain(|child| *child != id);
        }
        self.get_mut(id)?.parent = None;
        Ok(())
    }

    fn root_of(&self, mut id: NodeId) -> NodeId {
        while let Some(parent) = self.nodes.get(id.idx()).and_then(|node| node.parent) {
            id = parent;
        }
        id
    }

    /// Token nodes below `id`, in source order.
    pub fn leaves(&self, id: NodeId) -> Vec<NodeId> {
        self.descendants(id)
            .into_iter()
            .filter(|id| self.nodes[id.idx()].text.is_some())
            .collect()
    }

    /// Source text of `id`. The gap before its first token is not part of it.
    pub fn render(&self, id: NodeId) -> Result<String, ArenaError> {
        let mut out = String::new();
        for (idx, leaf) in self.leaves(id).into_iter().enumerate() {
            let node = self.get(leaf)?;
            if idx > 0 {
                out.push_str(&node.leading);
            }
            out.push_str(node.text.as_deref().unwrap_or_default());
        }
        Ok(out)
    }
}

/// Deep-copies `node` from `src` into `dest` and returns the id of the copy's root.
pub fn clone_subtree(
    src: &SyntaxArena,
    node: NodeId,
    dest: &mut SyntaxArena,
) -> Result<NodeId, ArenaError> {
    clone_into(src, node, None, dest)
}

fn clone_into(
    src: &SyntaxArena,
    node: NodeId,
    parent: Option<NodeId>,
    dest: &mut SyntaxArena,
) -> Result<NodeId, ArenaError> {
    let original = src.get(node)?;
    let copy = dest.alloc(SyntaxNode {
        children: Vec::new(),
        parent,
        ..original.clone()
    });
    for child in &original.children {
        let child_copy = clone_into(src, *child, Some(copy), dest)?;
        dest.get_mut(copy)?.children.push(child_copy);
    }
    Ok(copy)
}
