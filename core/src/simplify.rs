//! Rewrites on a built [`Cfg`]. Every pass leaves a graph that passes
//! [`Cfg::validate`].

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cfg::{BlockId, Cfg, Transition};
use crate::error::Result;

/// Which passes [`Cfg::simplify`] runs. Enabled passes always run in field
/// order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimplifyOptions {
    /// Splice out statement-free blocks that only jump on.
    pub eliminate_empty_jumps: bool,
    /// Rewrite branches on literal `true` as jumps.
    pub eliminate_true_branches: bool,
    /// Fold single-parent jump targets into their predecessor.
    pub merge_jump_chains: bool,
    /// One statement per block.
    pub split: bool,
}

impl Default for SimplifyOptions {
    fn default() -> Self {
        Self {
            eliminate_empty_jumps: true,
            eliminate_true_branches: true,
            merge_jump_chains: false,
            split: false,
        }
    }
}

impl SimplifyOptions {
    /// Every pass disabled.
    pub fn none() -> Self {
        Self {
            eliminate_empty_jumps: false,
            eliminate_true_branches: false,
            merge_jump_chains: false,
            split: false,
        }
    }
}

impl<'p> Cfg<'p> {
    pub fn simplify(&mut self, options: &SimplifyOptions) -> Result<()> {
        if options.eliminate_empty_jumps {
            self.eliminate_empty_jumps()?;
        }
        if options.eliminate_true_branches {
            self.eliminate_true_branches()?;
        }
        if options.merge_jump_chains {
            self.merge_jump_chains()?;
        }
        if options.split {
            self.split()?;
        }
        Ok(())
    }

    /// Splice out blocks that hold no statements and only jump on.
    pub fn eliminate_empty_jumps(&mut self) -> Result<()> {
        let mut removed = 0;
        while let Some((id, next)) = self.next_empty_jump() {
            let parents: Vec<BlockId> = self.block(id).parents.iter().copied().collect();
            for parent in parents {
                self.block_mut(parent).end.retarget(id, next);
            }
            if self.entry() == id {
                self.set_entry(next);
            }
            self.set_parents();
            removed += 1;
        }

        debug!(removed, "eliminated empty jumps");
        self.validate()?;
        Ok(())
    }

    fn next_empty_jump(&self) -> Option<(BlockId, BlockId)> {
        self.order().into_iter().find_map(|id| {
            let block = self.block(id);
            match block.end {
                Transition::Jump { next } if block.statements.is_empty() && next != id => {
                    Some((id, next))
                }
                _ => None,
            }
        })
    }

    /// Turn branches on a constant `true` into plain jumps.
    pub fn eliminate_true_branches(&mut self) -> Result<()> {
        let mut rewritten = 0;
        for id in self.order() {
            let block = self.block_mut(id);
            if let Transition::Branch {
                condition, then, ..
            } = block.end
            {
                if condition.is_always_true() {
                    block.end = Transition::Jump { next: then };
                    rewritten += 1;
                }
            }
        }

        debug!(rewritten, "eliminated always-taken branches");
        self.refresh()
    }

    /// Fold a block into its predecessor when that predecessor is its only
    /// parent and reaches it by a plain jump.
    pub fn merge_jump_chains(&mut self) -> Result<()> {
        let mut merged = 0;
        while let Some((head, tail)) = self.next_mergeable() {
            let absorbed = std::mem::take(&mut self.block_mut(tail).statements);
            let end = self.block(tail).end;
            let block = self.block_mut(head);
            block.statements.extend(absorbed);
            block.end = end;
            self.set_parents();
            merged += 1;
        }

        debug!(merged, "merged jump chains");
        self.validate()?;
        Ok(())
    }

    fn next_mergeable(&self) -> Option<(BlockId, BlockId)> {
        self.order().into_iter().find_map(|id| {
            let Transition::Jump { next } = self.block(id).end else {
                return None;
            };
            let only_parent = self.block(next).parents.len() == 1
                && self.block(next).parents.contains(&id);
            (next != id && next != self.entry() && only_parent).then_some((id, next))
        })
    }

    /// One statement per block. Block `b` with statements `s0..sn` keeps
    /// `s0` and its incoming edges; `si` moves to a new block `b_i`, and the
    /// last block takes over the transition `b` had.
    pub fn split(&mut self) -> Result<()> {
        let mut created = 0;
        for id in self.order() {
            if self.block(id).statements.len() < 2 {
                continue;
            }

            let block = self.block_mut(id);
            let rest = block.statements.split_off(1);
            let end = block.end;
            let label = block.label.clone();

            let mut previous = id;
            for (i, statement) in rest.into_iter().enumerate() {
                let next = self.add_labeled_block(format!("{label}_{}", i + 1), end);
                self.block_mut(next).statements.push(statement);
                self.block_mut(previous).end = Transition::Jump { next };
                previous = next;
                created += 1;
            }
        }

        debug!(created, "split blocks");
        self.refresh()
    }
}
