//! The TAC IR, its control-flow graph, and the dominator/loop analyses built on that graph.
//!
//! This crate owns everything downstream analyses (in `il-dataflow`) read but never mutate after
//! construction: `Value`/`Variable`/`Instruction`/`MethodBody`, the
//! `ControlFlowGraph` and its exception `Region`s, and the dominator tree,
//! dominance frontier, and natural-loop forest. The small collections shared across
//! both crates (`Multimap`, `SubsetBitVector`, the `Graph`/`InvertibleGraph` traversal traits)
//! live in `adt`.

pub mod adt;
pub mod cfg;
pub mod dominance;
pub mod instruction;
pub mod loops;
pub mod method_body;
pub mod refs;
pub mod value;

pub use cfg::{BlockId, CFGNode, CfgMode, ControlFlowGraph, NodeKind, Region};
pub use dominance::{DominanceFrontier, DominatorTree};
pub use instruction::{
    ExceptionInformation, HandlerKind, Instruction, InstructionKind, Offset, ProtectedBlock,
    StoreTarget,
};
pub use loops::{LoopForest, NaturalLoop};
pub use method_body::MethodBody;
pub use refs::{ConstantPayload, FieldRef, MethodRef, TypeRef};
pub use value::{
    DerivedVariable, LocalVariable, TemporalVariable, Value, Variable, RETURN_VARIABLE_NAME,
};
