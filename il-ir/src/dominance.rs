//! Iterative dominator computation and dominance-frontier construction over a
//! [`ControlFlowGraph`].
//!
//! A Semi-NCA algorithm generalized over nested regions and both dominance and post-dominance
//! would buy nothing here — this engine has exactly one CFG shape per method, not a region tree —
//! so this module implements the textbook iterative fixpoint directly, scoped to a single
//! `ControlFlowGraph`.

use rustc_hash::FxHashSet;

use crate::adt::bitset::SubsetBitVector;
use crate::adt::graph::{reverse_postorder, Graph, InvertibleGraph};
use crate::cfg::{BlockId, ControlFlowGraph};

/// The result of running [`compute`] over a [`ControlFlowGraph`]: each reachable node's immediate
/// dominator, keyed by `BlockId`. Unreachable nodes (no path from `Entry`) have no entry.
#[derive(Debug, Clone, Default)]
pub struct DominatorTree {
    immediate_dominator: rustc_hash::FxHashMap<BlockId, BlockId>,
}

impl DominatorTree {
    pub fn immediate_dominator(&self, node: BlockId) -> Option<BlockId> {
        self.immediate_dominator.get(&node).copied()
    }

    /// `d` dominates `n` iff `d` appears on every path from `Entry` to `n`, i.e. `d == n` or `d`
    /// is an ancestor of `n` in the dominator tree (`n ∈ Dom(n)`).
    pub fn dominates(&self, d: BlockId, n: BlockId) -> bool {
        if d == n {
            return true;
        }
        let mut cursor = n;
        while let Some(idom) = self.immediate_dominator(cursor) {
            if idom == d {
                return true;
            }
            if idom == cursor {
                break;
            }
            cursor = idom;
        }
        false
    }
}

/// Computes the dominator tree of `cfg` and writes `immediate_dominator`/
/// `immediate_dominated` back into each [`CFGNode`](crate::cfg::CFGNode), matching the fields the
/// data model reserves for them.
///
/// Algorithm: initialize `Dom(Entry) = {Entry}`, `Dom(n) = all nodes` for every other reachable
/// node; iterate `Dom(n) = {n} ∪ (⋂ Dom(p) for p ∈ preds(n))` to a fixpoint in forward topological
/// order. The immediate dominator is the unique dominator distinct from `n` with the maximum
/// forward topological index.
pub fn compute(cfg: &mut ControlFlowGraph) -> DominatorTree {
    let entry = cfg.entry();
    let order = reverse_postorder(cfg, entry);
    let reachable: FxHashSet<BlockId> = order.iter().copied().collect();
    let index_of: rustc_hash::FxHashMap<BlockId, usize> = order
        .iter()
        .enumerate()
        .map(|(idx, &n)| (n, idx))
        .collect();

    // Dom(n) as a bitset over `order`'s indices: far cheaper to intersect than a node-keyed set.
    let n = order.len();
    let mut dom: Vec<SubsetBitVector> = vec![SubsetBitVector::full(n); n];
    dom[0] = SubsetBitVector::empty(n);
    dom[0].insert(0);

    let mut changed = true;
    while changed {
        changed = false;
        for (i, &node) in order.iter().enumerate().skip(1) {
            let preds: Vec<BlockId> = cfg
                .predecessors(node)
                .into_iter()
                .filter(|p| reachable.contains(p))
                .collect();
            if preds.is_empty() {
                continue;
            }
            let mut new_dom: Option<SubsetBitVector> = None;
            for p in preds {
                let pred_dom = &dom[index_of[&p]];
                new_dom = Some(match new_dom {
                    None => pred_dom.clone(),
                    Some(mut acc) => {
                        acc.intersect_with(pred_dom);
                        acc
                    }
                });
            }
            let mut new_dom = new_dom.unwrap_or_else(|| SubsetBitVector::empty(n));
            new_dom.insert(i);
            if new_dom != dom[i] {
                dom[i] = new_dom;
                changed = true;
            }
        }
    }

    log::debug!(target: "il-ir::dominance", "computed dominators for {} reachable node(s)", order.len());

    // `order` is already in forward-topological position, so the immediate dominator is simply
    // the highest-indexed member of `Dom(n)` other than `n` itself.
    let mut tree = DominatorTree::default();
    for (i, &node) in order.iter().enumerate() {
        if node == entry {
            continue;
        }
        let idom_idx = dom[i].iter_ones().filter(|&d| d != i).max();
        if let Some(idom_idx) = idom_idx {
            tree.immediate_dominator.insert(node, order[idom_idx]);
        }
    }

    for &node in &order {
        cfg.node_mut(node).immediate_dominator = tree.immediate_dominator(node);
        cfg.node_mut(node).immediate_dominated.clear();
    }
    for &node in &order {
        if let Some(idom) = tree.immediate_dominator(node) {
            cfg.node_mut(idom).immediate_dominated.push(node);
        }
    }

    tree
}

/// The dominance frontier of every node in a [`ControlFlowGraph`]: the set of nodes
/// "just outside" a node's dominated subtree, used by SSA construction to place Phi functions
///.
#[derive(Debug, Clone, Default)]
pub struct DominanceFrontier {
    frontier: rustc_hash::FxHashMap<BlockId, FxHashSet<BlockId>>,
}

impl DominanceFrontier {
    /// The dominance frontier of `node`, or an empty set if `node` has none.
    pub fn of(&self, node: BlockId) -> FxHashSet<BlockId> {
        self.frontier.get(&node).cloned().unwrap_or_default()
    }

    /// The iterated dominance frontier of a set of definition sites, used to place Phi functions
    /// for a single variable: repeatedly union in the frontier of newly added nodes
    /// until no more are added.
    pub fn iterated_frontier(&self, seeds: impl IntoIterator<Item = BlockId>) -> FxHashSet<BlockId> {
        let mut result: FxHashSet<BlockId> = FxHashSet::default();
        let mut worklist: Vec<BlockId> = seeds.into_iter().collect();
        while let Some(node) = worklist.pop() {
            for df_node in self.of(node) {
                if result.insert(df_node) {
                    worklist.push(df_node);
                }
            }
        }
        result
    }
}

/// Computes the dominance frontier of every node given an already-computed
/// [`DominatorTree`], and writes each node's frontier back into its `CFGNode`.
///
/// For each node `n` with ≥2 predecessors, walk upward from each predecessor `p` via
/// `ImmediateDominator` until (exclusive of) `ImmediateDominator(n)`, adding `n` to the frontier
/// of every node visited.
pub fn compute_frontier(cfg: &mut ControlFlowGraph, tree: &DominatorTree) -> DominanceFrontier {
    let mut frontier = DominanceFrontier::default();
    let entry = cfg.entry();
    let order = reverse_postorder(cfg, entry);

    for &node in &order {
        let preds: Vec<BlockId> = cfg.predecessors(node).into_iter().collect();
        if preds.len() < 2 {
            continue;
        }
        let idom_n = tree.immediate_dominator(node);
        for p in preds {
            let mut runner = p;
            loop {
                if Some(runner) == idom_n {
                    break;
                }
                frontier.frontier.entry(runner).or_default().insert(node);
                match tree.immediate_dominator(runner) {
                    Some(next) if next != runner => runner = next,
                    _ => break,
                }
            }
        }
    }

    for &node in &order {
        cfg.node_mut(node).dominance_frontier = frontier.of(node).clone();
    }

    frontier
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg::CfgMode;
    use crate::instruction::{ExceptionInformation, Instruction, InstructionKind};
    use crate::method_body::MethodBody;
    use crate::refs::TypeRef;
    use crate::value::{Value, Variable};
    use pretty_assertions::assert_eq;

    fn diamond_cfg() -> ControlFlowGraph {
        let c = Variable::local("c", TypeRef::named("bool"), false);
        let branch = Instruction::new(
            0,
            InstructionKind::ConditionalBranch {
                condition: Value::Variable(c),
                true_label: "L_0008".into(),
                false_label: "L_0004".into(),
            },
        );
        let left = Instruction::new(
            4,
            InstructionKind::UnconditionalBranch {
                target_label: "L_000C".into(),
            },
        );
        let right = Instruction::new(
            8,
            InstructionKind::UnconditionalBranch {
                target_label: "L_000C".into(),
            },
        );
        let join = Instruction::new(12, InstructionKind::Return { value: None });
        let body = MethodBody::new(
            vec![branch, left, right, join],
            vec![],
            vec![],
            ExceptionInformation::default(),
        );
        crate::cfg::build("M", &body, CfgMode::Normal).unwrap()
    }

    #[test]
    fn entry_dominates_every_reachable_node() {
        let mut cfg = diamond_cfg();
        let tree = compute(&mut cfg);
        let entry = cfg.entry();
        for node in cfg.node_ids() {
            if node == entry {
                continue;
            }
            if cfg.node(node).forward_index.is_some() {
                assert!(tree.dominates(entry, node));
            }
        }
    }

    #[test]
    fn diamond_join_node_dominates_only_itself_and_successors() {
        let mut cfg = diamond_cfg();
        let tree = compute(&mut cfg);
        // Block ids: 4=header, 5=left, 6=right, 7=join.
        let header = BlockId::from_u32(4);
        let left = BlockId::from_u32(5);
        let right = BlockId::from_u32(6);
        let join = BlockId::from_u32(7);
        assert_eq!(tree.immediate_dominator(left), Some(header));
        assert_eq!(tree.immediate_dominator(right), Some(header));
        assert_eq!(tree.immediate_dominator(join), Some(header));
    }

    #[test]
    fn join_node_is_in_branch_blocks_dominance_frontier() {
        let mut cfg = diamond_cfg();
        let tree = compute(&mut cfg);
        let frontier = compute_frontier(&mut cfg, &tree);
        let left = BlockId::from_u32(5);
        let join = BlockId::from_u32(7);
        assert!(frontier.of(left).contains(&join));
    }
}
