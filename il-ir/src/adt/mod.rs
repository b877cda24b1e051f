//! Small collections shared by the IR, CFG, and dataflow code ("supporting utilities").

pub mod bitset;
pub mod graph;
pub mod multimap;

pub use bitset::SubsetBitVector;
pub use graph::{reachable_from, reverse_postorder, Graph, InvertibleGraph, Inverse};
pub use multimap::Multimap;
