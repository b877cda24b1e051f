//! The generic monotone dataflow framework, the points-to graph and analysis, and the remaining
//! framework analysis instances.
//!
//! `il-dataflow` depends on `il-ir` for the IR model and CFG it runs over, and on `il-support` for
//! the `TypeResolver` collaborator and the error taxonomy, but never the reverse -- `il-ir` has no
//! knowledge of any analysis built on top of it.

pub mod analyses;
pub mod pointsto;
pub mod ptg;
pub mod solver;

pub use pointsto::PointsToAnalysis;
pub use ptg::{PointsToGraph, PtgContext, PtgId, PtgNodeData, PtgNodeId, PtgNodeKind};
pub use solver::{solve, ChangeResult, Direction, SolverResult, Transfer};
