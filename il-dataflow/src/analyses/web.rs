//! Web analysis: reaching definitions followed by a union-find merge of every definition that
//! reaches a shared use, producing the maximal def-use-connected "webs" of each variable.
//!
//! Grounded on the `InstId`-identified reaching-definitions solution
//! (`Cfg::soln: Map<InstId, Set<InstId>>`) in `puranjaigarg783/program_analysis`'s
//! `rdef_ptrs.rs` (`other_examples/`): a definition is identified by its block and offset, and the
//! forward dataflow computes exactly the same "which defs reach this point" relation that analysis
//! keys its solution by. The union-find merge on top is this crate's own addition, grounding the
//! "webs" terminology.

use rustc_hash::{FxHashMap, FxHashSet};

use il_ir::cfg::{BlockId, ControlFlowGraph};
use il_ir::instruction::Offset;
use il_ir::value::Variable;

use crate::solver::{solve, Direction, Transfer};

/// A definition site: the block and bytecode offset of the instruction that performs it. Unique
/// per instruction, since offsets are monotone non-decreasing within a method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DefSite {
    pub block: BlockId,
    pub offset: Offset,
}

/// One web: every definition site of `variable` that is connected, transitively, by reaching a
/// common use.
#[derive(Debug, Clone)]
pub struct Web {
    pub variable: Variable,
    pub defs: FxHashSet<DefSite>,
}

/// The full web partition of a method body: every variable's definitions grouped into its
/// maximal def-use-connected webs.
#[derive(Debug, Clone, Default)]
pub struct Webs {
    pub webs: Vec<Web>,
}

impl Webs {
    pub fn web_containing(&self, def: DefSite) -> Option<&Web> {
        self.webs.iter().find(|w| w.defs.contains(&def))
    }
}

struct ReachingDefinitions<'a> {
    cfg: &'a ControlFlowGraph,
    all_defs_of: &'a FxHashMap<Variable, FxHashSet<DefSite>>,
}

impl Transfer for ReachingDefinitions<'_> {
    type Lattice = FxHashSet<DefSite>;

    fn initial(&self, _node: BlockId) -> FxHashSet<DefSite> {
        FxHashSet::default()
    }

    fn compare(&self, a: &FxHashSet<DefSite>, b: &FxHashSet<DefSite>) -> bool {
        a == b
    }

    fn join(&self, a: &FxHashSet<DefSite>, b: &FxHashSet<DefSite>) -> FxHashSet<DefSite> {
        a.union(b).copied().collect()
    }

    fn flow(&mut self, node: BlockId, input: &FxHashSet<DefSite>) -> FxHashSet<DefSite> {
        let mut reaching = input.clone();
        for instr in &self.cfg.node(node).instructions {
            if let Some(v) = instr.result() {
                if let Some(all) = self.all_defs_of.get(&v) {
                    reaching.retain(|d| !all.contains(d));
                }
                reaching.insert(DefSite {
                    block: node,
                    offset: instr.offset,
                });
            }
        }
        reaching
    }
}

/// A minimal union-find over [`DefSite`]s, path-compressing on `find` (union by arbitrary root,
/// not by rank -- webs are small enough per method that the asymptotics don't matter).
#[derive(Default)]
struct UnionFind {
    parent: FxHashMap<DefSite, DefSite>,
}

impl UnionFind {
    fn make_set(&mut self, d: DefSite) {
        self.parent.entry(d).or_insert(d);
    }

    fn find(&mut self, d: DefSite) -> DefSite {
        let parent = *self.parent.entry(d).or_insert(d);
        if parent == d {
            d
        } else {
            let root = self.find(parent);
            self.parent.insert(d, root);
            root
        }
    }

    fn union(&mut self, a: DefSite, b: DefSite) {
        let root_a = self.find(a);
        let root_b = self.find(b);
        if root_a != root_b {
            self.parent.insert(root_a, root_b);
        }
    }
}

/// Computes the web partition of `cfg`: runs reaching definitions to a fixpoint, then
/// unions every pair of definitions that reach a common use of the same variable.
pub fn compute_webs(cfg: &ControlFlowGraph, config: &il_support::AnalysisConfig) -> Webs {
    let mut all_defs_of: FxHashMap<Variable, FxHashSet<DefSite>> = FxHashMap::default();
    for node in cfg.node_ids() {
        for instr in &cfg.node(node).instructions {
            if let Some(v) = instr.result() {
                all_defs_of.entry(v).or_default().insert(DefSite {
                    block: node,
                    offset: instr.offset,
                });
            }
        }
    }

    let mut analysis = ReachingDefinitions {
        cfg,
        all_defs_of: &all_defs_of,
    };
    let result = solve(cfg, Direction::Forward, &mut analysis, config);

    let mut uf = UnionFind::default();
    for defs in all_defs_of.values() {
        for &d in defs {
            uf.make_set(d);
        }
    }

    for node in cfg.node_ids() {
        let mut reaching = result.in_of(node).clone();
        for instr in &cfg.node(node).instructions {
            for used in instr.used_variables() {
                if let Some(all) = all_defs_of.get(&used) {
                    let reaching_for_var: Vec<DefSite> =
                        reaching.iter().copied().filter(|d| all.contains(d)).collect();
                    for pair in reaching_for_var.windows(2) {
                        uf.union(pair[0], pair[1]);
                    }
                }
            }
            if let Some(v) = instr.result() {
                if let Some(all) = all_defs_of.get(&v) {
                    reaching.retain(|d| !all.contains(d));
                }
                reaching.insert(DefSite {
                    block: node,
                    offset: instr.offset,
                });
            }
        }
    }

    let def_to_var: FxHashMap<DefSite, Variable> = all_defs_of
        .iter()
        .flat_map(|(v, defs)| defs.iter().map(move |&d| (d, v.clone())))
        .collect();

    let mut groups: FxHashMap<DefSite, FxHashSet<DefSite>> = FxHashMap::default();
    for defs in all_defs_of.values() {
        for &d in defs {
            let root = uf.find(d);
            groups.entry(root).or_default().insert(d);
        }
    }

    let webs = groups
        .into_values()
        .map(|defs| {
            let variable = defs
                .iter()
                .next()
                .and_then(|d| def_to_var.get(d))
                .cloned()
                .expect("a web always has at least one definition");
            Web { variable, defs }
        })
        .collect();

    Webs { webs }
}

#[cfg(test)]
mod tests {
    use super::*;
    use il_ir::cfg::CfgMode;
    use il_ir::instruction::{ExceptionInformation, Instruction, InstructionKind};
    use il_ir::method_body::MethodBody;
    use il_ir::refs::{ConstantPayload, TypeRef};
    use il_ir::value::Value;
    use pretty_assertions::assert_eq;

    fn build_cfg(body: &MethodBody) -> ControlFlowGraph {
        il_ir::cfg::build("M", body, CfgMode::Normal).unwrap()
    }

    #[test]
    fn a_single_definition_used_twice_forms_one_web() {
        let x = Variable::local("x", TypeRef::named("i32"), false);
        let y = Variable::local("y", TypeRef::named("i32"), false);
        let def_x = Instruction::new(
            0,
            InstructionKind::Load {
                result: x.clone(),
                source: Value::Constant {
                    payload: ConstantPayload::I64(1),
                    ty: TypeRef::named("i32"),
                },
            },
        );
        let use_1 = Instruction::new(
            4,
            InstructionKind::Load {
                result: y.clone(),
                source: Value::Variable(x.clone()),
            },
        );
        let ret = Instruction::new(
            8,
            InstructionKind::Return {
                value: Some(Value::Variable(x.clone())),
            },
        );
        let body = MethodBody::new(vec![def_x, use_1, ret], vec![], vec![x.clone(), y], ExceptionInformation::default());
        let cfg = build_cfg(&body);
        let config = il_support::AnalysisConfig::default();
        let webs = compute_webs(&cfg, &config);
        let x_webs: Vec<&Web> = webs.webs.iter().filter(|w| w.variable == x).collect();
        assert_eq!(x_webs.len(), 1);
        assert_eq!(x_webs[0].defs.len(), 1);
    }

    #[test]
    fn branch_local_definitions_that_never_reach_a_common_use_form_separate_webs() {
        // `if c { x := 1; return x; } else { x := 2; return x; }` -- each branch's definition of
        // `x` reaches only its own branch's `return x`, never the other branch's use, so the two
        // defs never get unioned together despite sharing a name.
        let c = Variable::local("c", TypeRef::named("bool"), false);
        let x = Variable::local("x", TypeRef::named("i32"), false);
        let branch = Instruction::new(
            0,
            InstructionKind::ConditionalBranch {
                condition: Value::Variable(c.clone()),
                true_label: "L_0008".into(),
                false_label: "L_0004".into(),
            },
        );
        let left_def = Instruction::new(
            4,
            InstructionKind::Load {
                result: x.clone(),
                source: Value::Constant {
                    payload: ConstantPayload::I64(1),
                    ty: TypeRef::named("i32"),
                },
            },
        );
        let left_ret = Instruction::new(5, InstructionKind::Return { value: Some(Value::Variable(x.clone())) });
        let right_def = Instruction::new(
            8,
            InstructionKind::Load {
                result: x.clone(),
                source: Value::Constant {
                    payload: ConstantPayload::I64(2),
                    ty: TypeRef::named("i32"),
                },
            },
        );
        let right_ret = Instruction::new(9, InstructionKind::Return { value: Some(Value::Variable(x.clone())) });
        let body = MethodBody::new(
            vec![branch, left_def, left_ret, right_def, right_ret],
            vec![],
            vec![c, x.clone()],
            ExceptionInformation::default(),
        );
        let cfg = build_cfg(&body);
        let config = il_support::AnalysisConfig::default();
        let webs = compute_webs(&cfg, &config);
        let x_webs: Vec<&Web> = webs.webs.iter().filter(|w| w.variable == x).collect();
        assert_eq!(x_webs.len(), 2);
        assert!(x_webs.iter().all(|w| w.defs.len() == 1));
    }
}
