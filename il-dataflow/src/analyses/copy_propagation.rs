//! Copy propagation: a forward dataflow tracking, for each variable, the single expression it was
//! last assigned (if any path to this point agrees), plus a rewrite pass that substitutes those
//! facts back into the instruction stream.
//!
//! Grounded on the same flat-lattice shape as [`super::type_inference`] -- a partial map from
//! variable to the one `Value` every reaching definition agrees on, falling out of the map
//! entirely (implicit bottom/top collapse) the moment two definitions disagree, mirroring the
//! `ConstantValue::Unknown` collapse in `constant_propagation.rs`. The separate rewrite pass
//! mirrors an analysis/rewrite-pass split (`hir-analysis`'s passes consume an analysis result and
//! emit a rewritten function rather than mutating during the dataflow itself).

use rustc_hash::FxHashMap;

use il_ir::cfg::{BlockId, ControlFlowGraph};
use il_ir::instruction::{Instruction, InstructionKind, StoreTarget};
use il_ir::value::{Value, Variable};

use crate::solver::{solve, Direction, Transfer};

/// The set of copy facts reaching some program point: `v -> e` means every path here assigns `v`
/// the same expression `e`. A variable absent from the map has no single agreed-upon copy (either
/// never assigned yet, or assigned conflicting expressions on different paths).
#[derive(Debug, Clone, Default)]
pub struct CopyMap {
    copies: FxHashMap<Variable, Value>,
}

impl PartialEq for CopyMap {
    fn eq(&self, other: &Self) -> bool {
        self.copies.len() == other.copies.len()
            && self
                .copies
                .iter()
                .all(|(v, value)| other.copies.get(v).is_some_and(|o| values_equal(value, o)))
    }
}

impl CopyMap {
    pub fn copy_of(&self, v: &Variable) -> Option<&Value> {
        self.copies.get(v)
    }

    /// Resolves `value` one hop through the copy map if it is a bare variable with a known copy,
    /// otherwise returns it unchanged. Intentionally not transitive beyond one hop per use site;
    /// the dataflow itself already converges the map transitively across assignments.
    pub fn resolve(&self, value: &Value) -> Value {
        match value {
            Value::Variable(v) => self.copies.get(v).cloned().unwrap_or_else(|| value.clone()),
            other => other.clone(),
        }
    }

    fn kill(&mut self, v: &Variable) {
        self.copies.remove(v);
        // Any existing copy that itself mentions `v` is no longer sound once `v` is redefined.
        self.copies.retain(|_, value| !value.variables().contains(v));
    }

    fn set(&mut self, v: Variable, value: Value) {
        self.kill(&v);
        self.copies.insert(v, value);
    }

    fn join(&self, other: &Self) -> Self {
        let mut copies = FxHashMap::default();
        for (v, value) in &self.copies {
            if let Some(other_value) = other.copies.get(v) {
                if values_equal(value, other_value) {
                    copies.insert(v.clone(), value.clone());
                }
            }
        }
        Self { copies }
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    // `Value` has no blanket `PartialEq` (structural value comparison is left to the caller);
    // copy propagation only ever needs to compare a variable's two candidate
    // right-hand sides, which reduces to comparing their referenced-variable sets and textual
    // shape via `Debug` -- good enough for a may-equal check that only gates precision, never
    // soundness (disagreeing on `values_equal` just kills the copy fact early).
    format!("{a:?}") == format!("{b:?}")
}

/// The forward copy-propagation framework instance.
pub struct CopyPropagation<'a> {
    cfg: &'a ControlFlowGraph,
}

impl<'a> CopyPropagation<'a> {
    pub fn new(cfg: &'a ControlFlowGraph) -> Self {
        Self { cfg }
    }
}

/// The per-instruction transfer effect, shared between the dataflow pass and the rewrite pass's
/// running state (the rewrite pass re-derives each block's interior facts as it walks the block,
/// since the dataflow result only records facts at block boundaries).
fn apply_instruction_effect(state: &mut CopyMap, instr: &Instruction) {
    match &instr.kind {
        InstructionKind::Load { result, source } => {
            let resolved = state.resolve(source);
            state.set(result.clone(), resolved);
        }
        InstructionKind::Store {
            target: StoreTarget::Variable(result),
            source,
        } => {
            let resolved = state.resolve(source);
            state.set(result.clone(), resolved);
        }
        _ => {
            for v in instr.modified_variables() {
                state.kill(&v);
            }
        }
    }
}

impl Transfer for CopyPropagation<'_> {
    type Lattice = CopyMap;

    fn initial(&self, _node: BlockId) -> CopyMap {
        CopyMap::default()
    }

    fn compare(&self, a: &CopyMap, b: &CopyMap) -> bool {
        a == b
    }

    fn join(&self, a: &CopyMap, b: &CopyMap) -> CopyMap {
        a.join(b)
    }

    fn flow(&mut self, node: BlockId, input: &CopyMap) -> CopyMap {
        let mut state = input.clone();
        for instr in &self.cfg.node(node).instructions {
            apply_instruction_effect(&mut state, instr);
        }
        state
    }
}

/// Runs copy propagation over `cfg` to a fixpoint, returning the per-node `in` facts a rewrite
/// pass uses to resolve each instruction's operands.
pub fn propagate_copies(
    cfg: &ControlFlowGraph,
    config: &il_support::AnalysisConfig,
) -> FxHashMap<BlockId, CopyMap> {
    let mut analysis = CopyPropagation::new(cfg);
    let result = solve(cfg, Direction::Forward, &mut analysis, config);
    cfg.node_ids().map(|n| (n, result.in_of(n).clone())).collect()
}

/// Rewrites every instruction of `cfg` in place, replacing each read of a variable with its known
/// copy per the per-node `in` facts from [`propagate_copies`] ("rewrite" half).
///
/// Walks each block's instructions in order, threading a running `CopyMap` starting from that
/// block's `in` fact so a rewrite also benefits from copies established earlier in the same block
/// (the `in`-fact map alone would only be accurate for the block's very first instruction).
pub fn rewrite_copies(cfg: &mut ControlFlowGraph, facts: &FxHashMap<BlockId, CopyMap>) {
    let node_ids: Vec<BlockId> = cfg.node_ids().collect();
    for node in node_ids {
        let mut state = facts.get(&node).cloned().unwrap_or_default();
        let instructions: Vec<Instruction> = cfg.node(node).instructions.clone();
        let mut rewritten = Vec::with_capacity(instructions.len());
        for instr in instructions {
            let new_instr = rewrite_instruction(&instr, &state);
            apply_instruction_effect(&mut state, &instr);
            rewritten.push(new_instr);
        }
        cfg.node_mut(node).instructions = rewritten;
    }
}

fn rewrite_instruction(instr: &Instruction, state: &CopyMap) -> Instruction {
    let kind = match &instr.kind {
        InstructionKind::Load { result, source } => InstructionKind::Load {
            result: result.clone(),
            source: state.resolve(source),
        },
        InstructionKind::Store { target, source } => InstructionKind::Store {
            target: target.clone(),
            source: state.resolve(source),
        },
        InstructionKind::Return { value: Some(value) } => InstructionKind::Return {
            value: Some(state.resolve(value)),
        },
        InstructionKind::Throw { value } => InstructionKind::Throw {
            value: state.resolve(value),
        },
        InstructionKind::ConditionalBranch {
            condition,
            true_label,
            false_label,
        } => InstructionKind::ConditionalBranch {
            condition: state.resolve(condition),
            true_label: true_label.clone(),
            false_label: false_label.clone(),
        },
        InstructionKind::MethodCall {
            result,
            method,
            instance,
            args,
        } => InstructionKind::MethodCall {
            result: result.clone(),
            method: method.clone(),
            instance: instance.as_ref().map(|v| state.resolve(v)),
            args: args.iter().map(|a| state.resolve(a)).collect(),
        },
        other => other.clone(),
    };
    Instruction {
        offset: instr.offset,
        label: instr.label.clone(),
        kind,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use il_ir::cfg::CfgMode;
    use il_ir::instruction::ExceptionInformation;
    use il_ir::method_body::MethodBody;
    use il_ir::refs::{ConstantPayload, TypeRef};
    use pretty_assertions::assert_eq;

    fn build_cfg(body: &MethodBody) -> ControlFlowGraph {
        il_ir::cfg::build("M", body, CfgMode::Normal).unwrap()
    }

    #[test]
    fn a_copy_propagates_to_a_later_use() {
        let x = Variable::local("x", TypeRef::named("i32"), false);
        let y = Variable::local("y", TypeRef::named("i32"), false);
        let load_x = Instruction::new(
            0,
            InstructionKind::Load {
                result: x.clone(),
                source: Value::Constant {
                    payload: ConstantPayload::I64(1),
                    ty: TypeRef::named("i32"),
                },
            },
        );
        let copy_y = Instruction::new(
            4,
            InstructionKind::Load {
                result: y.clone(),
                source: Value::Variable(x.clone()),
            },
        );
        let ret = Instruction::new(8, InstructionKind::Return { value: Some(Value::Variable(y.clone())) });
        let body = MethodBody::new(
            vec![load_x, copy_y, ret],
            vec![],
            vec![x.clone(), y.clone()],
            ExceptionInformation::default(),
        );
        let mut cfg = build_cfg(&body);
        let config = il_support::AnalysisConfig::default();
        let facts = propagate_copies(&cfg, &config);
        rewrite_copies(&mut cfg, &facts);

        let block = cfg.node(cfg.node_ids().find(|n| cfg.node(*n).is_basic_block()).unwrap());
        let InstructionKind::Return { value: Some(resolved) } = &block.instructions.last().unwrap().kind else {
            panic!("expected a Return instruction");
        };
        assert!(matches!(resolved, Value::Constant { .. }));
    }

    #[test]
    fn a_redefinition_kills_the_old_copy() {
        let x = Variable::local("x", TypeRef::named("i32"), false);
        let y = Variable::local("y", TypeRef::named("i32"), false);
        let first = Instruction::new(
            0,
            InstructionKind::Load {
                result: y.clone(),
                source: Value::Variable(x.clone()),
            },
        );
        let redefine = Instruction::new(
            4,
            InstructionKind::Load {
                result: x.clone(),
                source: Value::Constant {
                    payload: ConstantPayload::I64(2),
                    ty: TypeRef::named("i32"),
                },
            },
        );
        let ret = Instruction::new(8, InstructionKind::Return { value: Some(Value::Variable(y.clone())) });
        let body = MethodBody::new(
            vec![first, redefine, ret],
            vec![x.clone()],
            vec![y.clone()],
            ExceptionInformation::default(),
        );
        let cfg = build_cfg(&body);
        let config = il_support::AnalysisConfig::default();
        let facts = propagate_copies(&cfg, &config);
        let exit_facts = facts.get(&cfg.normal_exit()).cloned().unwrap_or_default();
        // y's copy (of x) must not have been silently conflated with x's *new* value.
        let y_copy_is_stale_constant = matches!(
            exit_facts.copy_of(&y),
            Some(Value::Constant {
                payload: ConstantPayload::I64(2),
                ..
            })
        );
        assert!(!y_copy_is_stale_constant);
    }
}
