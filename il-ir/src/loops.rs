//! Back-edge detection and natural-loop discovery.
//!
//! `LoopForest`/`NaturalLoop` track loop-carried induction variables and canonicalization state
//! in some region-based IRs, but none of that applies here — this is the plain textbook algorithm:
//! a back edge `s -> t` iff `t` dominates `s`, and the natural loop it defines is the set of nodes
//! reachable from `s` by walking predecessors backward without crossing `t`.

use rustc_hash::FxHashSet;

use crate::adt::graph::{Graph, InvertibleGraph};
use crate::cfg::{BlockId, ControlFlowGraph};
use crate::dominance::DominatorTree;

/// A single natural loop: `header` dominates every node in `body`, and `body` is exactly the set
/// of nodes from which the loop's back edge's source is reachable without passing through
/// `header`.
#[derive(Debug, Clone)]
pub struct NaturalLoop {
    pub header: BlockId,
    /// The back edge's source node (the "latch").
    pub latch: BlockId,
    pub body: FxHashSet<BlockId>,
}

impl NaturalLoop {
    pub fn contains(&self, node: BlockId) -> bool {
        self.body.contains(&node)
    }
}

/// Every natural loop discovered in a [`ControlFlowGraph`], keyed by header. A header with
/// multiple back edges (e.g. a loop with two `continue`-like latches) yields multiple
/// [`NaturalLoop`]s sharing that header; callers that want one merged loop body per header should
/// union them.
#[derive(Debug, Clone, Default)]
pub struct LoopForest {
    loops: Vec<NaturalLoop>,
}

impl LoopForest {
    pub fn loops(&self) -> &[NaturalLoop] {
        &self.loops
    }

    pub fn loops_with_header(&self, header: BlockId) -> impl Iterator<Item = &NaturalLoop> {
        self.loops.iter().filter(move |l| l.header == header)
    }

    /// The innermost loop containing `node`, if any: the loop with the smallest body among those
    /// whose body contains `node`. Loop depth for `node` is the count of loops containing it.
    pub fn innermost_containing(&self, node: BlockId) -> Option<&NaturalLoop> {
        self.loops
            .iter()
            .filter(|l| l.contains(node))
            .min_by_key(|l| l.body.len())
    }

    pub fn depth(&self, node: BlockId) -> usize {
        self.loops.iter().filter(|l| l.contains(node)).count()
    }
}

/// Finds every back edge in `cfg` (an edge `s -> t` where `t` dominates `s`) and the natural loop
/// it defines.
pub fn compute(cfg: &ControlFlowGraph, dominators: &DominatorTree) -> LoopForest {
    let mut loops = Vec::new();

    for node in cfg.node_ids() {
        for succ in cfg.successors(node) {
            if dominators.dominates(succ, node) {
                let body = natural_loop_body(cfg, node, succ);
                loops.push(NaturalLoop {
                    header: succ,
                    latch: node,
                    body,
                });
            }
        }
    }

    log::debug!(target: "il-ir::loops", "discovered {} natural loop(s)", loops.len());
    LoopForest { loops }
}

/// The natural loop of back edge `latch -> header`: reverse-DFS from `latch`, collecting every
/// node reachable backward from it without stepping past `header`. `header` itself is
/// always a member.
fn natural_loop_body(cfg: &ControlFlowGraph, latch: BlockId, header: BlockId) -> FxHashSet<BlockId> {
    let mut body: FxHashSet<BlockId> = [header, latch].into_iter().collect();
    let mut stack = vec![latch];
    while let Some(node) = stack.pop() {
        for pred in cfg.predecessors(node) {
            if body.insert(pred) {
                stack.push(pred);
            }
        }
    }
    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg::CfgMode;
    use crate::dominance;
    use crate::instruction::{ExceptionInformation, Instruction, InstructionKind};
    use crate::method_body::MethodBody;
    use crate::refs::TypeRef;
    use crate::value::{Value, Variable};
    use pretty_assertions::assert_eq;

    /// `L_0000: if c goto L_0008 else fallthrough; L_0004: head.next = new Cons; goto L_0000;
    /// L_0008: return;` -- a simple `while` loop with header at offset 0.
    fn while_loop_cfg() -> ControlFlowGraph {
        let c = Variable::local("c", TypeRef::named("bool"), false);
        let header = Instruction::new(
            0,
            InstructionKind::ConditionalBranch {
                condition: Value::Variable(c),
                true_label: "L_0008".into(),
                false_label: "L_0004".into(),
            },
        );
        let body_result = Variable::local("head", TypeRef::named("Cons"), false);
        let body = Instruction::new(
            4,
            InstructionKind::CreateObject {
                result: body_result,
                ty: TypeRef::named("Cons"),
                args: vec![],
            },
        );
        let back_edge = Instruction::new(
            5,
            InstructionKind::UnconditionalBranch {
                target_label: "L_0000".into(),
            },
        );
        let exit = Instruction::new(8, InstructionKind::Return { value: None });
        let method_body = MethodBody::new(
            vec![header, body, back_edge, exit],
            vec![],
            vec![],
            ExceptionInformation::default(),
        );
        crate::cfg::build("M", &method_body, CfgMode::Normal).unwrap()
    }

    #[test]
    fn while_loop_has_one_natural_loop() {
        let mut cfg = while_loop_cfg();
        let tree = dominance::compute(&mut cfg);
        let forest = compute(&cfg, &tree);
        assert_eq!(forest.loops().len(), 1);
        let natural_loop = &forest.loops()[0];
        // Header is the block starting at offset 0 (id 4, the first BasicBlock).
        assert_eq!(natural_loop.header, BlockId::from_u32(4));
    }

    #[test]
    fn node_outside_loop_has_zero_depth() {
        let mut cfg = while_loop_cfg();
        let tree = dominance::compute(&mut cfg);
        let forest = compute(&cfg, &tree);
        let exit_block = cfg
            .basic_blocks()
            .find(|n| n.instructions.iter().any(|i| i.offset == 8))
            .unwrap()
            .id;
        assert_eq!(forest.depth(exit_block), 0);
    }
}
