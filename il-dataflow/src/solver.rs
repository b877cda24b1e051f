//! The generic monotone forward (and backward) dataflow solver.
//!
//! Grounded on `hir-analysis::lattice::LatticeLike` (`join`/`meet`) and `ChangeResult`
//! (`Changed`/`Unchanged`) naming from a prior MLIR-style dataflow framework, reused here under
//! the same names. That framework's own solver handles nested regions and call-graph dataflow,
//! with per-analysis-state dependency tracking through an unsafe bump allocator; this engine
//! analyzes one CFG at a time, so `WorklistSolver` reimplements the worklist
//! algorithm directly as a safe worklist over a `VecDeque<BlockId>` rather than inheriting that
//! generality (recorded in DESIGN.md).

use std::collections::VecDeque;

use il_ir::cfg::{BlockId, ControlFlowGraph};
use rustc_hash::{FxHashMap, FxHashSet};

/// Whether an update actually changed a lattice value, so a `Transfer` implementation can report
/// "no new information" without the solver needing to re-derive it via equality.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ChangeResult {
    Changed,
    Unchanged,
}

impl ChangeResult {
    pub fn did_change(self) -> bool {
        matches!(self, Self::Changed)
    }

    pub fn or(self, other: Self) -> Self {
        if self.did_change() || other.did_change() {
            Self::Changed
        } else {
            Self::Unchanged
        }
    }
}

/// The lattice and transfer-function contract a [`WorklistSolver`] needs from a dataflow problem:
/// `initial`, `compare` (equality), `join` (least upper bound), and `flow` (the
/// per-node transfer function).
///
/// Implementors must ensure `L` has finite height and that `join`/`flow` are monotone; the solver
/// relies on this for termination but cannot check it
/// itself short of the iteration-count safety assertion in
/// [`il_support::AnalysisConfig::assert_within_iteration_limit`].
pub trait Transfer {
    type Lattice: Clone;

    /// The value assigned to `node` before any predecessor information has flowed in. Usually
    /// bottom, except at `Entry` (or `Exit`, for a backward problem), which seeds the analysis.
    fn initial(&self, node: BlockId) -> Self::Lattice;

    /// Lattice equality, used to detect a fixpoint.
    fn compare(&self, a: &Self::Lattice, b: &Self::Lattice) -> bool;

    /// The least upper bound of `a` and `b`.
    fn join(&self, a: &Self::Lattice, b: &Self::Lattice) -> Self::Lattice;

    /// The transfer function: `node`'s output state given its input state.
    fn flow(&mut self, node: BlockId, input: &Self::Lattice) -> Self::Lattice;
}

/// Which direction a [`WorklistSolver`] traverses the CFG in ("backward solver is
/// symmetric, swapping successors/predecessors").
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

/// The dataflow state computed for every node of one [`ControlFlowGraph`]: `in[n]` and `out[n]`
/// for every node,
#[derive(Debug, Clone)]
pub struct SolverResult<L> {
    pub in_state: FxHashMap<BlockId, L>,
    pub out_state: FxHashMap<BlockId, L>,
}

impl<L> SolverResult<L> {
    pub fn in_of(&self, node: BlockId) -> &L {
        &self.in_state[&node]
    }

    pub fn out_of(&self, node: BlockId) -> &L {
        &self.out_state[&node]
    }
}

/// Runs `transfer` to a fixpoint over `cfg` in the given `direction` (worklist
/// algorithm).
///
/// Initializes `in[n] = initial(n)`, `out[n] = flow(n, in[n])` for every node in forward (or
/// backward) topological order, pushes every node onto a worklist, then repeatedly pops a node,
/// recomputes `in[n]` as the join of its predecessors' (successors', if backward) `out` states,
/// and re-flows if `in[n]` changed, enqueuing successors whose input may now have changed.
/// Terminates because the lattice has finite height and `join`/`flow` are monotone;
/// `config.iteration_limit` guards against a misbehaving lattice turning that guarantee into an
/// infinite loop.
pub fn solve<T: Transfer>(
    cfg: &ControlFlowGraph,
    direction: Direction,
    transfer: &mut T,
    config: &il_support::AnalysisConfig,
) -> SolverResult<T::Lattice> {
    let seed_order = topological_seed_order(cfg, direction);

    let mut in_state: FxHashMap<BlockId, T::Lattice> = FxHashMap::default();
    let mut out_state: FxHashMap<BlockId, T::Lattice> = FxHashMap::default();
    for &node in &seed_order {
        let seeded = transfer.initial(node);
        let out = transfer.flow(node, &seeded);
        in_state.insert(node, seeded);
        out_state.insert(node, out);
    }

    let mut queued: FxHashSet<BlockId> = seed_order.iter().copied().collect();
    let mut worklist: VecDeque<BlockId> = seed_order.into_iter().collect();

    let mut iterations: usize = 0;
    while let Some(node) = worklist.pop_front() {
        queued.remove(&node);
        iterations += 1;
        config.assert_within_iteration_limit(iterations);

        let upstream = flow_sources(cfg, direction, node);
        let mut new_in: Option<T::Lattice> = None;
        for up in upstream {
            let Some(up_out) = out_state.get(&up) else {
                continue;
            };
            new_in = Some(match new_in {
                None => up_out.clone(),
                Some(acc) => transfer.join(&acc, up_out),
            });
        }
        let Some(new_in) = new_in else { continue };

        let current_in = &in_state[&node];
        if transfer.compare(current_in, &new_in) {
            continue;
        }
        in_state.insert(node, new_in.clone());
        let new_out = transfer.flow(node, &new_in);
        let out_changed = !transfer.compare(&out_state[&node], &new_out);
        out_state.insert(node, new_out);

        if out_changed {
            for downstream in flow_targets(cfg, direction, node) {
                if queued.insert(downstream) {
                    worklist.push_back(downstream);
                }
            }
        }
    }

    log::debug!(
        target: "il-dataflow::solver",
        "worklist solver converged after {iterations} iteration(s) over {} node(s)",
        in_state.len()
    );

    SolverResult { in_state, out_state }
}

fn topological_seed_order(cfg: &ControlFlowGraph, direction: Direction) -> Vec<BlockId> {
    use il_ir::adt::graph::{reverse_postorder, Inverse};

    match direction {
        Direction::Forward => reverse_postorder(cfg, cfg.entry()),
        Direction::Backward => reverse_postorder(&Inverse(cfg), cfg.exit()),
    }
}

fn flow_sources(cfg: &ControlFlowGraph, direction: Direction, node: BlockId) -> Vec<BlockId> {
    use il_ir::adt::graph::InvertibleGraph;

    match direction {
        Direction::Forward => cfg.predecessors(node).into_iter().collect(),
        Direction::Backward => cfg.successors(node).into_iter().collect(),
    }
}

fn flow_targets(cfg: &ControlFlowGraph, direction: Direction, node: BlockId) -> Vec<BlockId> {
    use il_ir::adt::graph::{Graph, InvertibleGraph};

    match direction {
        Direction::Forward => cfg.successors(node).into_iter().collect(),
        Direction::Backward => cfg.predecessors(node).into_iter().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use il_ir::cfg::CfgMode;
    use il_ir::instruction::{ExceptionInformation, Instruction, InstructionKind};
    use il_ir::method_body::MethodBody;
    use il_ir::refs::TypeRef;
    use il_ir::value::Variable;
    use pretty_assertions::assert_eq;

    /// A trivial reaching-count analysis: `out[n] = in[n] + 1`, `join = max`. Used only to
    /// exercise the solver's fixpoint machinery, not a real analysis.
    struct CountUp;

    impl Transfer for CountUp {
        type Lattice = u32;

        fn initial(&self, node: BlockId) -> u32 {
            if node.as_u32() == 0 {
                0
            } else {
                0
            }
        }

        fn compare(&self, a: &u32, b: &u32) -> bool {
            a == b
        }

        fn join(&self, a: &u32, b: &u32) -> u32 {
            *a.max(b)
        }

        fn flow(&mut self, _node: BlockId, input: &u32) -> u32 {
            input + 1
        }
    }

    fn straight_line_cfg() -> ControlFlowGraph {
        let v = Variable::local("x", TypeRef::named("i32"), false);
        let load = Instruction::new(
            0,
            InstructionKind::Load {
                result: v.clone(),
                source: il_ir::value::Value::Constant {
                    payload: il_ir::refs::ConstantPayload::I64(1),
                    ty: TypeRef::named("i32"),
                },
            },
        );
        let ret = Instruction::new(4, InstructionKind::Return { value: None });
        let body = MethodBody::new(vec![load, ret], vec![], vec![v], ExceptionInformation::default());
        il_ir::cfg::build("M", &body, CfgMode::Normal).unwrap()
    }

    #[test]
    fn solver_reaches_a_fixpoint_on_a_straight_line_cfg() {
        let cfg = straight_line_cfg();
        let mut transfer = CountUp;
        let config = il_support::AnalysisConfig::default();
        let result = solve(&cfg, Direction::Forward, &mut transfer, &config);
        // Entry -> one basic block -> NormalExit -> Exit: four hops, counts up by one each time.
        assert_eq!(*result.out_of(cfg.exit()), 4);
    }

    #[test]
    fn rerunning_solve_on_a_converged_result_is_a_no_op() {
        let cfg = straight_line_cfg();
        let config = il_support::AnalysisConfig::default();
        let mut transfer = CountUp;
        let first = solve(&cfg, Direction::Forward, &mut transfer, &config);
        let mut transfer2 = CountUp;
        let second = solve(&cfg, Direction::Forward, &mut transfer2, &config);
        assert_eq!(first.out_of(cfg.exit()), second.out_of(cfg.exit()));
    }
}
