//! The remaining framework analyses: instances of the generic monotone solver beyond points-to.
//! Each is grounded separately; see the per-module docs and `DESIGN.md`.

pub mod copy_propagation;
pub mod live_variables;
pub mod ssa;
pub mod type_inference;
pub mod web;

pub use copy_propagation::{propagate_copies, rewrite_copies, CopyMap};
pub use live_variables::{live_variables, LiveVariables};
pub use ssa::{construct_ssa, SsaProgram};
pub use type_inference::{infer_types, TypeFact, TypeState};
pub use web::{compute_webs, Webs};
