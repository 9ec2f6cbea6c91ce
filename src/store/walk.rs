use crate::error::{EmbedError, Result};
use crate::store::fs::EmbeddedFs;
use crate::store::node::{Node, NodeInfo};
use std::sync::Arc;

/// Visitor verdict for [`EmbeddedFs::walk`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkControl {
    Continue,
    /// On a directory: skip its contents. On a file: skip the remaining
    /// entries of the containing directory.
    SkipDir,
}

impl EmbeddedFs {
    /// Pre-order walk from `root`, visiting children in name order
    ///
    /// The visitor gets `Err` for a missing root or a dangling child and
    /// decides whether to continue. Any `Err` it returns stops the walk and
    /// is passed through. `SkipDir` never surfaces to the caller.
    pub fn walk<F>(&self, root: &str, mut visit: F) -> Result<()>
    where
        F: FnMut(&str, Result<&NodeInfo>) -> Result<WalkControl>,
    {
        // SkipDir from the top level is a normal completion
        match self.lookup(root) {
            Some(node) => self.walk_node(root, node, &mut visit)?,
            None => visit(root, Err(EmbedError::NotFound(root.to_string())))?,
        };
        Ok(())
    }

    fn walk_node<F>(&self, path: &str, node: Arc<Node>, visit: &mut F) -> Result<WalkControl>
    where
        F: FnMut(&str, Result<&NodeInfo>) -> Result<WalkControl>,
    {
        let children = match node.as_ref() {
            Node::Directory(dir) => dir.children.clone(),
            Node::File(_) => {
                let info = NodeInfo::embedded(node);
                return visit(path, Ok(&info));
            }
        };

        let info = NodeInfo::embedded(node);
        if visit(path, Ok(&info))? == WalkControl::SkipDir {
            return Ok(WalkControl::SkipDir);
        }

        for child in &children {
            let (control, child_is_dir) = match self.lookup(child) {
                Some(child_node) => {
                    let is_dir = child_node.is_dir();
                    (self.walk_node(child, child_node, visit)?, is_dir)
                }
                None => (
                    visit(child, Err(EmbedError::NotFound(child.clone())))?,
                    false,
                ),
            };

            if control == WalkControl::SkipDir && !child_is_dir {
                return Ok(WalkControl::SkipDir);
            }
        }

        Ok(WalkControl::Continue)
    }
}
