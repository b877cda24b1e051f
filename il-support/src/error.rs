use compact_str::CompactString;

/// The kind of metadata reference a [`TypeResolver`](crate::TypeResolver) failed to resolve.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ReferenceKind {
    Type,
    Method,
    Field,
}

impl core::fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            Self::Type => "type",
            Self::Method => "method",
            Self::Field => "field",
        })
    }
}

/// The error taxonomy of the analysis core.
///
/// `MalformedIr` and `InconsistentPtg` are surfaced to the caller; `UnresolvedReference` is
/// recovered from locally (see [`PartialResult`]) and only ever collected as a warning.
/// `AnalysisNonTermination` is deliberately not a variant here: the monotone framework rules it
/// out by construction, so if it is ever observed it indicates a bug in a lattice implementation,
/// not a runtime condition an analysis can recover from. See
/// [`crate::config::AnalysisConfig::iteration_limit`] for the assertion that guards against it.
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    /// CFG construction encountered an instruction referencing a label that no block owns, or a
    /// protected-block range whose `start` offset is not present in the instruction stream.
    #[error("malformed IR in method `{method}`: {reason}")]
    MalformedIr {
        method: CompactString,
        reason: CompactString,
    },

    /// A [`TypeResolver`](crate::TypeResolver) collaborator returned `None` for a needed
    /// reference. The caller substituted a best-effort placeholder and the result should be
    /// treated as partial.
    #[error("unresolved {kind} reference `{name}`; substituted a placeholder")]
    UnresolvedReference {
        kind: ReferenceKind,
        name: CompactString,
    },

    /// A [union](crate) of two points-to graphs encountered two nodes with equal ids but
    /// unequal kind or type. This is a contract violation indicating an id-collision bug
    /// upstream, not a recoverable condition.
    #[error("inconsistent points-to graph: node `{id}` reused with conflicting kind or type")]
    InconsistentPtg { id: CompactString },
}

/// Wraps an analysis result that may have recovered from one or more
/// [`AnalysisError::UnresolvedReference`] conditions.
///
/// A `PartialResult` whose `warnings` is empty is, semantically, a complete result; a non-empty
/// `warnings` means the caller should treat `value` as a best-effort approximation.
#[derive(Debug, Clone)]
pub struct PartialResult<T> {
    pub value: T,
    pub warnings: Vec<AnalysisError>,
}

impl<T> PartialResult<T> {
    pub fn complete(value: T) -> Self {
        Self {
            value,
            warnings: Vec::new(),
        }
    }

    pub fn is_partial(&self) -> bool {
        !self.warnings.is_empty()
    }

    pub fn push_warning(&mut self, warning: AnalysisError) {
        log::warn!(target: "il-analysis", "{warning}");
        self.warnings.push(warning);
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> PartialResult<U> {
        PartialResult {
            value: f(self.value),
            warnings: self.warnings,
        }
    }
}
