//! SSA construction: Phi placement at iterated dominance frontiers, followed by dominator-tree
//! preorder renaming into [`DerivedVariable`](il_ir::value::Variable::Derived) versions, with an
//! optional pruning pass dropping Phi nodes for variables that are not live into the block they
//! would be placed in.
//!
//! Grounded directly on `DominanceFrontier`/`DominatorTree` (the Phi-placement and renaming-order
//! machinery) and on [`super::live_variables`] for pruning; this is the classic Cytron et al.
//! construction -- dominance frontiers exist precisely to place Phi functions.

use rustc_hash::{FxHashMap, FxHashSet};

use il_ir::cfg::{BlockId, ControlFlowGraph};
use il_ir::dominance;
use il_ir::instruction::{Instruction, InstructionKind, StoreTarget};
use il_ir::method_body::MethodBody;
use il_ir::value::{Value, Variable};

use super::live_variables::{live_variables, LiveVariables};

/// One Phi node placed at some block: `origin` is the pre-SSA variable it merges, `result` the
/// fresh SSA version it defines (only valid once the owning block has been renamed), `operands`
/// the value flowing in from each predecessor that has been visited so far.
#[derive(Debug, Clone)]
pub struct PhiNode {
    pub origin: Variable,
    pub result: Variable,
    pub operands: FxHashMap<BlockId, Value>,
}

/// The SSA form of one method body: every block's Phi nodes plus its renamed non-Phi instructions,
/// in original order.
#[derive(Debug, Clone, Default)]
pub struct SsaProgram {
    pub phis: FxHashMap<BlockId, Vec<PhiNode>>,
    pub instructions: FxHashMap<BlockId, Vec<Instruction>>,
}

impl SsaProgram {
    pub fn phis_at(&self, block: BlockId) -> &[PhiNode] {
        self.phis.get(&block).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn instructions_at(&self, block: BlockId) -> &[Instruction] {
        self.instructions.get(&block).map(Vec::as_slice).unwrap_or(&[])
    }
}

#[derive(Debug, Default)]
struct RenameState {
    counters: FxHashMap<Variable, u32>,
    stacks: FxHashMap<Variable, Vec<Variable>>,
}

impl RenameState {
    /// Mints a fresh SSA version of `origin`, pushes it as `origin`'s current reaching definition,
    /// and returns it. The very first version minted for any variable is index 0, which -- per
    /// `DerivedVariable`'s naming convention -- renders with exactly `origin`'s own name, so an
    /// unmodified parameter's SSA name is indistinguishable from its original name.
    fn new_name(&mut self, origin: &Variable) -> Variable {
        let counter = self.counters.entry(origin.clone()).or_insert(0);
        let version = *counter;
        *counter += 1;
        let renamed = Variable::derived(origin.clone(), version);
        self.stacks.entry(origin.clone()).or_default().push(renamed.clone());
        renamed
    }
}

fn current(stacks: &FxHashMap<Variable, Vec<Variable>>, origin: &Variable) -> Value {
    match stacks.get(origin).and_then(|s| s.last()) {
        Some(v) => Value::Variable(v.clone()),
        None => Value::Variable(origin.clone()),
    }
}

/// Replaces every free occurrence of a variable in `value` with its current SSA version, leaving
/// variables with no reaching definition (malformed input, or a read before any write) untouched.
fn resolve_value(value: &Value, stacks: &FxHashMap<Variable, Vec<Variable>>) -> Value {
    let mut resolved = value.clone();
    for var in value.variables() {
        if let Some(top) = stacks.get(&var).and_then(|s| s.last()) {
            resolved = resolved.replace(&var, top);
        }
    }
    resolved
}

fn rewrite_store_target_uses(target: &StoreTarget, stacks: &FxHashMap<Variable, Vec<Variable>>) -> StoreTarget {
    match target {
        StoreTarget::Variable(v) => StoreTarget::Variable(v.clone()),
        StoreTarget::InstanceField { instance, field } => StoreTarget::InstanceField {
            instance: stacks
                .get(instance)
                .and_then(|s| s.last())
                .cloned()
                .unwrap_or_else(|| instance.clone()),
            field: field.clone(),
        },
        StoreTarget::StaticField { field } => StoreTarget::StaticField { field: field.clone() },
        StoreTarget::ArrayElement { array, indices } => StoreTarget::ArrayElement {
            array: Box::new(resolve_value(array, stacks)),
            indices: indices.iter().map(|i| resolve_value(i, stacks)).collect(),
        },
        StoreTarget::Dereference { pointer } => StoreTarget::Dereference {
            pointer: Box::new(resolve_value(pointer, stacks)),
        },
    }
}

/// Rewrites every read in `instr` to its current SSA version and, if `instr` defines a variable,
/// replaces the definition with `new_result`.
fn rewrite_instruction(
    instr: &Instruction,
    stacks: &FxHashMap<Variable, Vec<Variable>>,
    new_result: Option<Variable>,
) -> Instruction {
    let kind = match &instr.kind {
        InstructionKind::Load { source, .. } => InstructionKind::Load {
            result: new_result.expect("Load always defines a result"),
            source: resolve_value(source, stacks),
        },
        InstructionKind::Store {
            target: StoreTarget::Variable(_),
            source,
        } => InstructionKind::Store {
            target: StoreTarget::Variable(new_result.expect("a variable store always defines a result")),
            source: resolve_value(source, stacks),
        },
        InstructionKind::Store { target, source } => InstructionKind::Store {
            target: rewrite_store_target_uses(target, stacks),
            source: resolve_value(source, stacks),
        },
        InstructionKind::CreateObject { ty, args, .. } => InstructionKind::CreateObject {
            result: new_result.expect("CreateObject always defines a result"),
            ty: ty.clone(),
            args: args.iter().map(|a| resolve_value(a, stacks)).collect(),
        },
        InstructionKind::CreateArray { element_ty, lengths, .. } => InstructionKind::CreateArray {
            result: new_result.expect("CreateArray always defines a result"),
            element_ty: element_ty.clone(),
            lengths: lengths.iter().map(|l| resolve_value(l, stacks)).collect(),
        },
        InstructionKind::Convert { ty, source, .. } => InstructionKind::Convert {
            result: new_result.expect("Convert always defines a result"),
            ty: ty.clone(),
            source: resolve_value(source, stacks),
        },
        InstructionKind::MethodCall { method, instance, args, .. } => InstructionKind::MethodCall {
            result: new_result,
            method: method.clone(),
            instance: instance.as_ref().map(|v| resolve_value(v, stacks)),
            args: args.iter().map(|a| resolve_value(a, stacks)).collect(),
        },
        InstructionKind::Phi { operands, .. } => InstructionKind::Phi {
            result: new_result.expect("Phi always defines a result"),
            operands: operands.iter().map(|o| resolve_value(o, stacks)).collect(),
        },
        InstructionKind::Return { value } => InstructionKind::Return {
            value: value.as_ref().map(|v| resolve_value(v, stacks)),
        },
        InstructionKind::Throw { value } => InstructionKind::Throw {
            value: resolve_value(value, stacks),
        },
        InstructionKind::ConditionalBranch {
            condition,
            true_label,
            false_label,
        } => InstructionKind::ConditionalBranch {
            condition: resolve_value(condition, stacks),
            true_label: true_label.clone(),
            false_label: false_label.clone(),
        },
        InstructionKind::UnconditionalBranch { target_label } => InstructionKind::UnconditionalBranch {
            target_label: target_label.clone(),
        },
        InstructionKind::Switch {
            value,
            case_labels,
            default_label,
        } => InstructionKind::Switch {
            value: resolve_value(value, stacks),
            case_labels: case_labels.clone(),
            default_label: default_label.clone(),
        },
        InstructionKind::TryStart => InstructionKind::TryStart,
        InstructionKind::TryEnd => InstructionKind::TryEnd,
        InstructionKind::HandlerStart { kind } => InstructionKind::HandlerStart { kind: kind.clone() },
    };
    Instruction {
        offset: instr.offset,
        label: instr.label.clone(),
        kind,
    }
}

fn rename_block(
    cfg: &ControlFlowGraph,
    block: BlockId,
    method_body: &MethodBody,
    state: &mut RenameState,
    program: &mut SsaProgram,
) {
    let mut pushed: Vec<Variable> = Vec::new();

    if block == cfg.entry() {
        for param in &method_body.parameters {
            state.new_name(param);
            pushed.push(param.clone());
        }
    }

    if let Some(phis) = program.phis.get_mut(&block) {
        for phi in phis.iter_mut() {
            let origin = phi.origin.clone();
            phi.result = state.new_name(&origin);
            pushed.push(origin);
        }
    }

    let mut rewritten = Vec::with_capacity(cfg.node(block).instructions.len());
    for instr in &cfg.node(block).instructions {
        let new_result = instr.result().map(|v| {
            let renamed = state.new_name(&v);
            pushed.push(v);
            renamed
        });
        rewritten.push(rewrite_instruction(instr, &state.stacks, new_result));
    }
    program.instructions.insert(block, rewritten);

    for succ in cfg.node(block).successors.clone() {
        if let Some(phis) = program.phis.get_mut(&succ) {
            for phi in phis.iter_mut() {
                let value = current(&state.stacks, &phi.origin);
                phi.operands.insert(block, value);
            }
        }
    }

    for child in cfg.node(block).immediate_dominated.clone() {
        rename_block(cfg, child, method_body, state, program);
    }

    for v in pushed {
        if let Some(stack) = state.stacks.get_mut(&v) {
            stack.pop();
        }
    }
}

fn prune_dead_phis(program: &mut SsaProgram, live: &FxHashMap<BlockId, LiveVariables>) {
    for (block, phis) in program.phis.iter_mut() {
        let live_in = live.get(block).map(|l| &l.live_in);
        phis.retain(|phi| match live_in {
            Some(live_in) => live_in.contains(&phi.origin),
            None => true,
        });
    }
}

/// Constructs SSA form for `cfg`: places Phi nodes at the iterated dominance frontier of every
/// variable's definition sites, then renames every definition and use in dominator-tree preorder
/// in dominator-tree preorder. When `pruned` is set, drops Phi nodes whose merged variable is
/// not live into the block they were placed in ("pruned SSA").
pub fn construct_ssa(
    cfg: &mut ControlFlowGraph,
    method_body: &MethodBody,
    config: &il_support::AnalysisConfig,
    pruned: bool,
) -> SsaProgram {
    let tree = dominance::compute(cfg);
    let frontier = dominance::compute_frontier(cfg, &tree);

    let mut defsites: FxHashMap<Variable, FxHashSet<BlockId>> = FxHashMap::default();
    for node in cfg.node_ids() {
        for instr in &cfg.node(node).instructions {
            if let Some(v) = instr.result() {
                defsites.entry(v).or_default().insert(node);
            }
        }
    }
    for param in &method_body.parameters {
        defsites.entry(param.clone()).or_default().insert(cfg.entry());
    }

    let mut program = SsaProgram::default();
    for (var, sites) in &defsites {
        let idf = frontier.iterated_frontier(sites.iter().copied());
        for block in idf {
            let phis = program.phis.entry(block).or_default();
            if !phis.iter().any(|p| &p.origin == var) {
                phis.push(PhiNode {
                    origin: var.clone(),
                    result: var.clone(),
                    operands: FxHashMap::default(),
                });
            }
        }
    }

    let mut state = RenameState::default();
    rename_block(cfg, cfg.entry(), method_body, &mut state, &mut program);

    if pruned {
        let live = live_variables(cfg, config);
        prune_dead_phis(&mut program, &live);
    }

    program
}
