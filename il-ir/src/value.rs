use std::fmt;
use std::hash::{Hash, Hasher};

use compact_str::CompactString;
use rustc_hash::FxHashSet;

use crate::refs::{ConstantPayload, FieldRef, MethodRef, TypeRef};

/// A local, compiler-introduced temporary, or SSA-renamed variable.
///
/// Equality and hashing are by `name()` alone: two variables of different shape that happen to
/// carry the same name are the *same* variable as far as every pass in this crate is concerned.
/// Callers are responsible for choosing names so this identification is never accidental.
#[derive(Debug, Clone)]
pub enum Variable {
    Local(LocalVariable),
    Temporal(TemporalVariable),
    Derived(DerivedVariable),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LocalVariable {
    pub name: CompactString,
    pub ty: TypeRef,
    pub is_parameter: bool,
}

/// A compiler-introduced SSA-precursor temporary. Its name is synthesized as `base_name + index`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TemporalVariable {
    pub base_name: CompactString,
    pub index: u32,
    pub ty: TypeRef,
}

/// An SSA version of some other variable, produced by SSA construction. Shares `origin`'s type
/// and parameter-ness (for version 0 only — a Phi-introduced version of a parameter is not itself
/// "the parameter").
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DerivedVariable {
    pub origin: Box<Variable>,
    pub index: u32,
}

impl Variable {
    pub fn local(name: impl Into<CompactString>, ty: TypeRef, is_parameter: bool) -> Self {
        Self::Local(LocalVariable {
            name: name.into(),
            ty,
            is_parameter,
        })
    }

    pub fn temporal(base_name: impl Into<CompactString>, index: u32, ty: TypeRef) -> Self {
        Self::Temporal(TemporalVariable {
            base_name: base_name.into(),
            index,
            ty,
        })
    }

    pub fn derived(origin: Variable, index: u32) -> Self {
        Self::Derived(DerivedVariable {
            origin: Box::new(origin),
            index,
        })
    }

    /// The name this variable is identified by for equality, hashing, and substitution matching.
    pub fn name(&self) -> CompactString {
        match self {
            Self::Local(l) => l.name.clone(),
            Self::Temporal(t) => CompactString::from(format!("{}{}", t.base_name, t.index)),
            Self::Derived(d) => {
                if d.index == 0 {
                    d.origin.name()
                } else {
                    CompactString::from(format!("{}_{}", d.origin.name(), d.index))
                }
            }
        }
    }

    pub fn is_parameter(&self) -> bool {
        match self {
            Self::Local(l) => l.is_parameter,
            Self::Temporal(_) => false,
            Self::Derived(d) => d.index == 0 && d.origin.is_parameter(),
        }
    }

    pub fn ty(&self) -> TypeRef {
        match self {
            Self::Local(l) => l.ty.clone(),
            Self::Temporal(t) => t.ty.clone(),
            Self::Derived(d) => d.origin.ty(),
        }
    }

    /// The un-renamed root of a `Derived` chain, or `self` for a `Local`/`Temporal`.
    pub fn root(&self) -> &Variable {
        match self {
            Self::Derived(d) => d.origin.root(),
            other => other,
        }
    }
}

impl PartialEq for Variable {
    fn eq(&self, other: &Self) -> bool {
        self.name() == other.name()
    }
}

impl Eq for Variable {}

impl Hash for Variable {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name().hash(state);
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// The distinguished variable that `Return` copies its operand into.
pub const RETURN_VARIABLE_NAME: &str = "$RV";

/// A value or expression in the TAC IR. Operand positions ("values") and general positions
/// ("expressions") are distinguished only by where they appear, not by type — both are members of
/// this one sum type, the same shape as a single `Value` enum covering both roles.
#[derive(Debug, Clone)]
pub enum Value {
    Constant {
        payload: ConstantPayload,
        ty: TypeRef,
    },
    /// Singleton denoting "value not statically known" — synthesized when an unresolved reference
    /// forces a best-effort placeholder.
    UnknownValue,
    Variable(Variable),
    InstanceFieldAccess {
        instance: Variable,
        field: FieldRef,
        ty: TypeRef,
    },
    StaticFieldAccess {
        field: FieldRef,
        ty: TypeRef,
    },
    ArrayLengthAccess {
        instance: Variable,
    },
    ArrayElementAccess {
        array: Box<Value>,
        indices: Vec<Value>,
    },
    Dereference {
        pointer: Box<Value>,
    },
    /// Address-of. `target` is expected to be a `Variable`, field access, array element access, or
    /// another `Dereference` — any "referenceable"; this is a caller precondition, not something
    /// this type enforces structurally.
    Reference {
        target: Box<Value>,
    },
    StaticMethodReference {
        method: MethodRef,
    },
    VirtualMethodReference {
        instance: Box<Value>,
        method: MethodRef,
    },
}

impl Value {
    pub fn variable(v: Variable) -> Self {
        Self::Variable(v)
    }

    /// The set of variables syntactically mentioned. Definitions and pure function pointers
    /// contribute nothing; composite values union their operands.
    pub fn variables(&self) -> FxHashSet<Variable> {
        let mut out = FxHashSet::default();
        self.collect_variables(&mut out);
        out
    }

    fn collect_variables(&self, out: &mut FxHashSet<Variable>) {
        match self {
            Self::Constant { .. } | Self::UnknownValue | Self::StaticFieldAccess { .. } => {}
            Self::StaticMethodReference { .. } => {}
            Self::Variable(v) => {
                out.insert(v.clone());
            }
            Self::InstanceFieldAccess { instance, .. } => {
                out.insert(instance.clone());
            }
            Self::ArrayLengthAccess { instance } => {
                out.insert(instance.clone());
            }
            Self::ArrayElementAccess { array, indices } => {
                array.collect_variables(out);
                for index in indices {
                    index.collect_variables(out);
                }
            }
            Self::Dereference { pointer } => pointer.collect_variables(out),
            Self::Reference { target } => target.collect_variables(out),
            Self::VirtualMethodReference { instance, .. } => instance.collect_variables(out),
        }
    }

    /// Structural rewrite replacing every free occurrence of `old` by `new`. Returns a freshly
    /// constructed value when any child changed; otherwise returns a cheap clone of
    /// `self`, so the substitution law's "shares no mutable sub-structure with the input" holds by
    /// construction (every composite arm that touches a child always rebuilds its own wrapper).
    pub fn replace(&self, old: &Variable, new: &Variable) -> Value {
        match self {
            Self::Constant { .. }
            | Self::UnknownValue
            | Self::StaticFieldAccess { .. }
            | Self::StaticMethodReference { .. } => self.clone(),
            Self::Variable(v) => {
                if v == old {
                    Self::Variable(new.clone())
                } else {
                    self.clone()
                }
            }
            Self::InstanceFieldAccess {
                instance,
                field,
                ty,
            } => Self::InstanceFieldAccess {
                instance: if instance == old {
                    new.clone()
                } else {
                    instance.clone()
                },
                field: field.clone(),
                ty: ty.clone(),
            },
            Self::ArrayLengthAccess { instance } => Self::ArrayLengthAccess {
                instance: if instance == old {
                    new.clone()
                } else {
                    instance.clone()
                },
            },
            Self::ArrayElementAccess { array, indices } => Self::ArrayElementAccess {
                array: Box::new(array.replace(old, new)),
                indices: indices.iter().map(|i| i.replace(old, new)).collect(),
            },
            Self::Dereference { pointer } => Self::Dereference {
                pointer: Box::new(pointer.replace(old, new)),
            },
            Self::Reference { target } => Self::Reference {
                target: Box::new(target.replace(old, new)),
            },
            Self::VirtualMethodReference { instance, method } => Self::VirtualMethodReference {
                instance: Box::new(instance.replace(old, new)),
                method: method.clone(),
            },
        }
    }

    /// This value's static type: derived for array elements, dereferences, and references; stored
    /// for everything else.
    pub fn ty(&self) -> TypeRef {
        match self {
            Self::Constant { ty, .. } => ty.clone(),
            Self::UnknownValue => TypeRef::named("?"),
            Self::Variable(v) => v.ty(),
            Self::InstanceFieldAccess { ty, .. } | Self::StaticFieldAccess { ty, .. } => ty.clone(),
            Self::ArrayLengthAccess { .. } => TypeRef::named("i32"),
            Self::ArrayElementAccess { array, .. } => array.ty().element_type(),
            Self::Dereference { pointer } => pointer.ty().pointee_type(),
            Self::Reference { target } => TypeRef::pointer_to(target.ty()),
            Self::StaticMethodReference { .. } | Self::VirtualMethodReference { .. } => {
                TypeRef::named("delegate")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn var(name: &str) -> Variable {
        Variable::local(name, TypeRef::named("T"), false)
    }

    #[test]
    fn variable_equality_is_by_name_only() {
        let a = Variable::local("x", TypeRef::named("A"), false);
        let b = Variable::temporal("x", 0, TypeRef::named("B"));
        // Both render the same name ("x" and "x0" respectively differ) -- construct a genuine
        // name collision to exercise the invariant.
        let c = Variable::local("x", TypeRef::named("C"), true);
        assert_eq!(a, c);
        assert_ne!(a, b);
    }

    #[test]
    fn substitution_law_holds_for_field_access() {
        let x = var("x");
        let y = var("y");
        let value = Value::InstanceFieldAccess {
            instance: x.clone(),
            field: FieldRef::new("f"),
            ty: TypeRef::named("T"),
        };
        let replaced = value.replace(&x, &y);
        let expected_vars: FxHashSet<Variable> = [y.clone()].into_iter().collect();
        assert_eq!(replaced.variables(), expected_vars);
    }

    #[test]
    fn substitution_law_holds_for_array_element_access() {
        let x = var("x");
        let y = var("y");
        let idx = var("i");
        let value = Value::ArrayElementAccess {
            array: Box::new(Value::Variable(x.clone())),
            indices: vec![Value::Variable(idx.clone())],
        };
        let replaced = value.replace(&x, &y);
        let expected: FxHashSet<Variable> = [y.clone(), idx.clone()].into_iter().collect();
        assert_eq!(replaced.variables(), expected);
    }

    #[test]
    fn replace_is_inert_for_definitions() {
        let x = var("x");
        let y = var("y");
        let value = Value::Constant {
            payload: ConstantPayload::I64(1),
            ty: TypeRef::named("i64"),
        };
        let replaced = value.replace(&x, &y);
        assert!(replaced.variables().is_empty());
    }

    #[test]
    fn derived_variable_name_follows_index_convention() {
        let origin = var("x");
        let v0 = Variable::derived(origin.clone(), 0);
        let v1 = Variable::derived(origin, 1);
        assert_eq!(v0.name(), "x");
        assert_eq!(v1.name(), "x_1");
    }
}
