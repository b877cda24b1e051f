use std::collections::BTreeSet;

use cranelift_entity::PrimaryMap;
use il_support::AnalysisError;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::adt::graph::{reverse_postorder, Inverse};
use crate::instruction::{HandlerKind, InstructionKind, Offset};
use crate::method_body::MethodBody;

use super::node::{BlockId, CFGNode, NodeKind};
use super::region::{HandlerRegion, HandlerRegionKind, LoopRegion, ProtectedRegion, Region, RegionId};
use super::ControlFlowGraph;

/// Which of the builder's two output modes a [`build`] call produces.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CfgMode {
    /// Exception handlers excised: `Throw` routes to `NormalExit` and no region/exceptional-edge
    /// construction runs. Handler blocks are still built (splitting stays consistent between
    /// modes) but are unreachable, since nothing but an exceptional edge ever targets them.
    Normal,
    /// Handlers included, protected-region edges added, `Throw` routes to `ExceptionalExit`.
    Exceptional,
}

fn push_node(nodes: &mut PrimaryMap<BlockId, CFGNode>, kind: NodeKind) -> BlockId {
    let id = nodes.next_key();
    nodes.push(CFGNode::new(id, kind))
}

fn malformed(method_name: &str, reason: impl Into<String>) -> AnalysisError {
    AnalysisError::MalformedIr {
        method: method_name.into(),
        reason: reason.into().into(),
    }
}

/// Builds a [`ControlFlowGraph`] from `method`'s instruction stream.
pub fn build(
    method_name: &str,
    method: &MethodBody,
    mode: CfgMode,
) -> Result<ControlFlowGraph, AnalysisError> {
    if method.instructions.is_empty() {
        return Err(malformed(method_name, "method body has no instructions"));
    }

    let label_index = method.label_index();
    let resolve = |label: &str| -> Result<Offset, AnalysisError> {
        label_index
            .get(label)
            .copied()
            .ok_or_else(|| malformed(method_name, format!("branch target `{label}` has no owning instruction")))
    };

    let leaders = find_leaders(method, &label_index, method_name)?;
    let mut nodes: PrimaryMap<BlockId, CFGNode> = PrimaryMap::new();
    let entry = push_node(&mut nodes, NodeKind::Entry);
    let exit = push_node(&mut nodes, NodeKind::Exit);
    let normal_exit = push_node(&mut nodes, NodeKind::NormalExit);
    let exceptional_exit = push_node(&mut nodes, NodeKind::ExceptionalExit);
    debug_assert_eq!(entry.as_u32(), 0);
    debug_assert_eq!(exit.as_u32(), 1);
    debug_assert_eq!(normal_exit.as_u32(), 2);
    debug_assert_eq!(exceptional_exit.as_u32(), 3);

    // Node creation: one BasicBlock per leader, in offset order.
    let mut block_of_offset: FxHashMap<Offset, BlockId> = FxHashMap::default();
    let mut block_order: Vec<BlockId> = Vec::with_capacity(leaders.len());
    for &leader_offset in &leaders {
        let id = push_node(&mut nodes, NodeKind::BasicBlock);
        block_of_offset.insert(leader_offset, id);
        block_order.push(id);
    }

    // Assign instructions to blocks by walking the stream and tracking the current leader.
    let mut current_block: Option<BlockId> = None;
    for instr in &method.instructions {
        if let Some(&id) = block_of_offset.get(&instr.offset) {
            current_block = Some(id);
        }
        let id = current_block
            .ok_or_else(|| malformed(method_name, "first instruction is not a leader"))?;
        nodes[id].instructions.push(instr.clone());
    }

    let mut add_edge = |nodes: &mut PrimaryMap<BlockId, CFGNode>, from: BlockId, to: BlockId| {
        if !nodes[from].successors.contains(&to) {
            nodes[from].successors.push(to);
        }
        nodes[to].predecessors.insert(from);
    };

    // Entry always falls into the first block.
    add_edge(&mut nodes, entry, block_order[0]);

    for (i, &block_id) in block_order.iter().enumerate() {
        let last = nodes[block_id]
            .instructions
            .last()
            .cloned()
            .ok_or_else(|| malformed(method_name, "basic block has no instructions"))?;

        for target_label in last.branch_targets() {
            let target_offset = resolve(&target_label)?;
            let target_block = *block_of_offset.get(&target_offset).ok_or_else(|| {
                malformed(method_name, format!("branch target offset {target_offset} is not a leader"))
            })?;
            add_edge(&mut nodes, block_id, target_block);
        }

        match &last.kind {
            InstructionKind::Return { .. } => add_edge(&mut nodes, block_id, normal_exit),
            InstructionKind::Throw { .. } => {
                let target = match mode {
                    CfgMode::Exceptional => exceptional_exit,
                    CfgMode::Normal => normal_exit,
                };
                add_edge(&mut nodes, block_id, target);
            }
            _ => {}
        }

        if last.can_fall_through() {
            if let Some(&next_block) = block_order.get(i + 1) {
                add_edge(&mut nodes, block_id, next_block);
            } else {
                // Falls off the end of the method body: treat as an implicit return.
                add_edge(&mut nodes, block_id, normal_exit);
            }
        }
    }

    add_edge(&mut nodes, normal_exit, exit);
    add_edge(&mut nodes, exceptional_exit, exit);

    let regions = if mode == CfgMode::Exceptional {
        build_regions(method_name, method, &label_index, &block_of_offset, &block_order, &mut nodes)?
    } else {
        Vec::new()
    };

    let mut cfg = ControlFlowGraph { nodes, regions };
    finalize_indices(&mut cfg);
    add_loop_regions(&mut cfg);
    Ok(cfg)
}

/// Runs dominance and natural-loop discovery over a freshly built graph and folds the result back
/// in as `Region::Loop` entries, one per loop header (natural loops sharing a header, e.g. a loop
/// with more than one `continue`-like latch, are unioned into a single region).
fn add_loop_regions(cfg: &mut ControlFlowGraph) {
    let dominators = crate::dominance::compute(cfg);
    let forest = crate::loops::compute(cfg, &dominators);

    let mut by_header: FxHashMap<BlockId, FxHashSet<BlockId>> = FxHashMap::default();
    for natural_loop in forest.loops() {
        by_header.entry(natural_loop.header).or_default().extend(natural_loop.body.iter().copied());
    }

    let mut headers: Vec<BlockId> = by_header.keys().copied().collect();
    headers.sort_by_key(|h| h.as_u32());
    for header in headers {
        let nodes = by_header.remove(&header).unwrap();
        cfg.regions.push(Region::Loop(LoopRegion { header, nodes }));
    }
}

/// Leader identification.
fn find_leaders(
    method: &MethodBody,
    label_index: &FxHashMap<compact_str::CompactString, Offset>,
    method_name: &str,
) -> Result<BTreeSet<Offset>, AnalysisError> {
    let mut leaders = BTreeSet::new();
    leaders.insert(method.instructions[0].offset);

    let mut prev_was_terminator = false;
    for instr in &method.instructions {
        if prev_was_terminator {
            leaders.insert(instr.offset);
        }
        prev_was_terminator = instr.is_terminator();

        for label in instr.branch_targets() {
            let offset = label_index.get(&label).copied().ok_or_else(|| {
                malformed(method_name, format!("branch target `{label}` has no owning instruction"))
            })?;
            leaders.insert(offset);
        }
    }

    for block in &method.exception_information.protected_blocks {
        let start = label_index.get(&block.start_label).copied().ok_or_else(|| {
            malformed(method_name, format!("protected block start `{}` has no owning instruction", block.start_label))
        })?;
        leaders.insert(start);
        let handler_start = label_index.get(&block.handler_start_label).copied().ok_or_else(|| {
            malformed(
                method_name,
                format!("handler start `{}` has no owning instruction", block.handler_start_label),
            )
        })?;
        leaders.insert(handler_start);

        if let HandlerKind::Filter { filter_start_label } = &block.handler {
            let filter_start = label_index.get(filter_start_label).copied().ok_or_else(|| {
                malformed(method_name, format!("filter start `{filter_start_label}` has no owning instruction"))
            })?;
            leaders.insert(filter_start);
        }
    }

    Ok(leaders)
}

/// Region construction and exceptional edges (step 5).
fn build_regions(
    method_name: &str,
    method: &MethodBody,
    label_index: &FxHashMap<compact_str::CompactString, Offset>,
    block_of_offset: &FxHashMap<Offset, BlockId>,
    block_order: &[BlockId],
    nodes: &mut PrimaryMap<BlockId, CFGNode>,
) -> Result<Vec<Region>, AnalysisError> {
    let mut regions: Vec<Region> = Vec::new();

    struct PendingRegion {
        start: Offset,
        end: Offset,
        /// Lower bound of the handler region's block sweep: the filter's start offset for a
        /// `Filter` handler (the filter predicate's blocks belong to the handler region), or
        /// `handler_start` otherwise.
        handler_sweep_start: Offset,
        handler_end: Offset,
        protected_id: RegionId,
        handler_id: RegionId,
    }

    let mut pending = Vec::new();
    for block in &method.exception_information.protected_blocks {
        let resolve = |label: &str, what: &str| -> Result<Offset, AnalysisError> {
            label_index
                .get(label)
                .copied()
                .ok_or_else(|| malformed(method_name, format!("{what} `{label}` has no owning instruction")))
        };

        let start = resolve(&block.start_label, "protected block start")?;
        let end = resolve(&block.end_label, "protected block end")?;
        let handler_start = resolve(&block.handler_start_label, "handler start")?;
        let handler_end = resolve(&block.handler_end_label, "handler end")?;

        let (handler_kind, handler_sweep_start) = match &block.handler {
            HandlerKind::Catch { .. } => (HandlerRegionKind::Catch, handler_start),
            HandlerKind::Finally => (HandlerRegionKind::Finally, handler_start),
            HandlerKind::Fault => (HandlerRegionKind::Fault, handler_start),
            HandlerKind::Filter { filter_start_label } => {
                let filter_start = resolve(filter_start_label, "filter start")?;
                (
                    HandlerRegionKind::Filter { filter_header: block_of_offset[&filter_start] },
                    filter_start,
                )
            }
        };

        let protected_id = RegionId(regions.len());
        regions.push(Region::Protected(ProtectedRegion {
            header: block_of_offset[&start],
            nodes: FxHashSet::default(),
            handler: RegionId(protected_id.0 + 1),
        }));
        let handler_id = RegionId(regions.len());
        regions.push(Region::Handler(HandlerRegion {
            kind: handler_kind,
            header: block_of_offset[&handler_start],
            nodes: FxHashSet::default(),
            protected: protected_id,
        }));

        pending.push(PendingRegion {
            start,
            end,
            handler_sweep_start,
            handler_end,
            protected_id,
            handler_id,
        });
    }

    // Sweep leaders in offset order, tracking which regions are active at each block's start.
    for &block_id in block_order {
        let block_start = nodes[block_id]
            .instructions
            .first()
            .map(|i| i.offset)
            .unwrap_or(0);

        for region in &pending {
            if block_start >= region.start && block_start < region.end {
                if let Region::Protected(r) = &mut regions[region.protected_id.0] {
                    r.nodes.insert(block_id);
                }
            }
            if block_start >= region.handler_sweep_start && block_start < region.handler_end {
                if let Region::Handler(r) = &mut regions[region.handler_id.0] {
                    r.nodes.insert(block_id);
                }
            }
        }
    }

    // Exceptional edges: every node in a ProtectedRegion gets an edge to its handler's header.
    let mut exceptional_edges = Vec::new();
    for region in &regions {
        if let Region::Protected(r) = region {
            let handler_header = match &regions[r.handler.0] {
                Region::Handler(h) => h.header,
                _ => continue,
            };
            for &node_id in &r.nodes {
                exceptional_edges.push((node_id, handler_header));
            }
        }
    }
    for (from, to) in exceptional_edges {
        if !nodes[from].successors.contains(&to) {
            nodes[from].successors.push(to);
        }
        nodes[to].predecessors.insert(from);
    }

    Ok(regions)
}

fn finalize_indices(cfg: &mut ControlFlowGraph) {
    use crate::adt::graph::Graph as _;

    let forward_order = reverse_postorder(cfg, cfg.entry());
    for (idx, node) in forward_order.iter().enumerate() {
        cfg.node_mut(*node).forward_index = Some(idx as u32);
    }

    let backward_order = {
        let inverse = Inverse(&*cfg);
        reverse_postorder(&inverse, cfg.exit())
    };
    for (idx, node) in backward_order.iter().enumerate() {
        cfg.node_mut(*node).backward_index = Some(idx as u32);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::{ExceptionInformation, Instruction};
    use crate::refs::TypeRef;
    use crate::value::{Value, Variable};
    use pretty_assertions::assert_eq;

    fn ret() -> Instruction {
        Instruction::new(4, InstructionKind::Return { value: None })
    }

    #[test]
    fn straight_line_method_has_one_basic_block() {
        let v = Variable::local("x", TypeRef::named("i32"), false);
        let load = Instruction::new(
            0,
            InstructionKind::Load {
                result: v.clone(),
                source: Value::Constant {
                    payload: crate::refs::ConstantPayload::I64(1),
                    ty: TypeRef::named("i32"),
                },
            },
        );
        let body = MethodBody::new(vec![load, ret()], vec![], vec![v], ExceptionInformation::default());
        let cfg = build("M", &body, CfgMode::Normal).unwrap();
        assert_eq!(cfg.basic_blocks().count(), 1);
        assert!(cfg.check_exit_invariant());
    }

    #[test]
    fn conditional_branch_creates_two_successor_blocks() {
        let c = Variable::local("c", TypeRef::named("bool"), false);
        let branch = Instruction::new(
            0,
            InstructionKind::ConditionalBranch {
                condition: Value::Variable(c),
                true_label: "L_0008".into(),
                false_label: "L_0004".into(),
            },
        );
        let fallthrough_ret = Instruction::new(4, InstructionKind::Return { value: None });
        let target_ret = Instruction::new(8, InstructionKind::Return { value: None });
        let body = MethodBody::new(
            vec![branch, fallthrough_ret, target_ret],
            vec![],
            vec![],
            ExceptionInformation::default(),
        );
        let cfg = build("M", &body, CfgMode::Normal).unwrap();
        assert_eq!(cfg.basic_blocks().count(), 3);
    }

    #[test]
    fn missing_branch_target_is_malformed_ir() {
        let branch = Instruction::new(
            0,
            InstructionKind::UnconditionalBranch {
                target_label: "L_FFFF".into(),
            },
        );
        let body = MethodBody::new(vec![branch], vec![], vec![], ExceptionInformation::default());
        let err = build("M", &body, CfgMode::Normal).unwrap_err();
        assert!(matches!(err, AnalysisError::MalformedIr { .. }));
    }

    /// `try { throw } catch { return }`: the exceptional graph has an edge from the throwing block
    /// to the handler's header; the normal graph excises
    /// the try/catch and routes the throw straight to `NormalExit`.
    fn try_throw_catch_body() -> MethodBody {
        use crate::instruction::{ExceptionInformation, HandlerKind, ProtectedBlock};
        use crate::refs::ConstantPayload;

        let try_start = Instruction::new(0, InstructionKind::TryStart);
        let throw = Instruction::new(
            4,
            InstructionKind::Throw {
                value: Value::Constant {
                    payload: ConstantPayload::Null,
                    ty: TypeRef::named("Exception"),
                },
            },
        );
        let try_end = Instruction::new(8, InstructionKind::TryEnd);
        let handler_start = Instruction::new(
            8,
            InstructionKind::HandlerStart {
                kind: HandlerKind::Catch {
                    exception_type: TypeRef::named("Exception"),
                },
            },
        );
        let handler_ret = Instruction::new(9, InstructionKind::Return { value: None });

        let exception_information = ExceptionInformation {
            protected_blocks: vec![ProtectedBlock {
                start_label: "L_0000".into(),
                end_label: "L_0008".into(),
                handler: HandlerKind::Catch {
                    exception_type: TypeRef::named("Exception"),
                },
                handler_start_label: "L_0008".into(),
                handler_end_label: "L_0009".into(),
            }],
        };

        MethodBody::new(
            vec![try_start, throw, try_end, handler_start, handler_ret],
            vec![],
            vec![],
            exception_information,
        )
    }

    #[test]
    fn exceptional_mode_adds_an_edge_from_the_throw_block_to_the_handler_header() {
        let body = try_throw_catch_body();
        let cfg = build("M", &body, CfgMode::Exceptional).unwrap();

        let throw_block = cfg
            .basic_blocks()
            .find(|n| n.instructions.iter().any(|i| i.offset == 4))
            .unwrap();
        let handler_block = cfg
            .basic_blocks()
            .find(|n| n.instructions.iter().any(|i| i.offset == 8))
            .unwrap();
        assert!(throw_block.successors.contains(&handler_block.id));

        let protected = cfg
            .regions()
            .iter()
            .find(|r| matches!(r, super::Region::Protected(_)))
            .expect("a ProtectedRegion should have been built");
        assert!(protected.nodes().contains(&throw_block.id));
    }

    #[test]
    fn normal_mode_excises_the_handler_and_routes_throw_to_normal_exit() {
        let body = try_throw_catch_body();
        let cfg = build("M", &body, CfgMode::Normal).unwrap();
        assert!(cfg.regions().is_empty());

        let throw_block = cfg
            .basic_blocks()
            .find(|n| n.instructions.iter().any(|i| i.offset == 4))
            .unwrap();
        assert!(throw_block.successors.contains(&cfg.normal_exit()));
    }
}
