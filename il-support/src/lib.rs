//! Shared support crate for the IR (`il-ir`) and dataflow (`il-dataflow`) crates: the error
//! taxonomy, solver configuration, and external-collaborator traits that both depend on without
//! depending on each other.

pub mod config;
pub mod error;
pub mod interfaces;

pub use config::AnalysisConfig;
pub use error::{AnalysisError, PartialResult, ReferenceKind};
pub use interfaces::{BytecodeLoader, Disassembler, TypeResolver};
