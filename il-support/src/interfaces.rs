//! The external collaborators this engine treats as opaque.
//!
//! These are deliberately expressed as bare traits with associated types rather than concrete
//! dependencies on `il-ir`'s IR model: a `BytecodeLoader`/`Disassembler` pair produces whatever
//! raw/TAC method-body representation a downstream driver chooses, and a `TypeResolver` resolves
//! whatever reference/definition types that driver's metadata model uses. `il-ir` and
//! `il-dataflow` are generic over an implementation of [`TypeResolver`] wherever they need one
//! (see `il-dataflow::pointsto`), rather than depending on a concrete resolver here.

/// Produces [`Self::RawMethodBody`] in raw stack-machine form: ordered bytecode instructions with
/// offsets, an exception table, and local variable signatures.
///
/// Bit-exact fidelity to the source assembly's instruction encoding is the loader's
/// responsibility, not the analysis core's.
pub trait BytecodeLoader {
    type MethodRef;
    type RawMethodBody;

    fn load_method_body(&self, method: &Self::MethodRef) -> Option<Self::RawMethodBody>;
}

/// Resolves type, method, and field metadata references encountered while lifting or analyzing a
/// method body.
///
/// The core never caches or invalidates resolver results itself; a `TypeResolver` is expected to
/// be safe for concurrent read, since distinct methods may be analyzed on separate threads
///.
pub trait TypeResolver {
    type TypeRef;
    type MethodRef;
    type FieldRef;
    type TypeDefinition;
    type MethodDefinition;
    type FieldDefinition;

    fn resolve_type(&self, ty: &Self::TypeRef) -> Option<Self::TypeDefinition>;
    fn resolve_method(&self, method: &Self::MethodRef) -> Option<Self::MethodDefinition>;
    fn resolve_field(&self, field: &Self::FieldRef) -> Option<Self::FieldDefinition>;

    fn is_delegate_type(&self, ty: &Self::TypeDefinition) -> bool;
    fn is_value_type(&self, ty: &Self::TypeDefinition) -> bool;
    /// Used by the pure-method heuristic in other framework analyses.
    fn is_container_type(&self, ty: &Self::TypeDefinition) -> bool;
}

/// Lifts a raw, stack-machine method body into this engine's TAC `MethodBody` representation.
///
/// Treated as an opaque producer: the analysis core makes no assumptions about how the lift is
/// performed, only that its output satisfies this crate's `MethodBody`/CFG invariants.
pub trait Disassembler {
    type RawMethodBody;
    type TacMethodBody;

    fn disassemble(&self, raw: Self::RawMethodBody) -> Self::TacMethodBody;
}
