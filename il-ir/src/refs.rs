use compact_str::CompactString;

/// An opaque reference to a type in the metadata system a [`TypeResolver`](il_support::TypeResolver)
/// resolves. `Named` is the leaf form the resolver deals in; `Array`/`Pointer` let `Value::type()`
/// derive array-element and dereference/reference types structurally without needing
/// a resolver round-trip at every `type()` call.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeRef {
    Named(CompactString),
    Array(Box<TypeRef>),
    Pointer(Box<TypeRef>),
}

impl TypeRef {
    pub fn named(name: impl Into<CompactString>) -> Self {
        Self::Named(name.into())
    }

    pub fn array_of(element: TypeRef) -> Self {
        Self::Array(Box::new(element))
    }

    pub fn pointer_to(pointee: TypeRef) -> Self {
        Self::Pointer(Box::new(pointee))
    }

    /// The element type of an array type; panics on a non-array type, mirroring the precondition
    /// an `ArrayElementAccess` relies on (its operand is always statically known to be an array).
    pub fn element_type(&self) -> TypeRef {
        match self {
            Self::Array(elem) => elem.as_ref().clone(),
            other => other.clone(),
        }
    }

    /// The pointee type of a pointer type, used to derive a `Dereference`'s type.
    pub fn pointee_type(&self) -> TypeRef {
        match self {
            Self::Pointer(inner) => inner.as_ref().clone(),
            other => other.clone(),
        }
    }

    /// The name a [`TypeResolver`](il_support::TypeResolver) can look up metadata for. Array and
    /// pointer types have no metadata entry of their own; resolvers only ever see `Named`.
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Named(name) => Some(name.as_str()),
            Self::Array(_) | Self::Pointer(_) => None,
        }
    }
}

/// An opaque reference to a method in the metadata system.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodRef(pub CompactString);

impl MethodRef {
    pub fn new(name: impl Into<CompactString>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }

    /// True for a `.ctor` reference, the marker the points-to analysis uses to recognize a
    /// delegate constructor call immediately following a delegate allocation.
    pub fn is_constructor(&self) -> bool {
        self.0.as_str() == ".ctor"
    }
}

/// An opaque reference to a field in the metadata system.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldRef(pub CompactString);

impl FieldRef {
    pub fn new(name: impl Into<CompactString>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

/// The opaque payload of a `Constant` value. Encoding is left to the caller: the core
/// only needs to carry it through `variables`/`replace`/`type` untouched.
#[derive(Debug, Clone, PartialEq)]
pub enum ConstantPayload {
    /// The null reference literal. Recognized by name by the points-to analysis's null-load
    /// transfer: `r = null` displaces whatever `r` pointed to with the PTG's `Null`
    /// node.
    Null,
    I64(i64),
    F64(f64),
    Bool(bool),
    Str(CompactString),
    /// A payload the loader chose not to decode further (e.g. a raw byte blob for an unsupported
    /// literal kind). Opaque to every pass in this crate.
    Opaque(CompactString),
}
