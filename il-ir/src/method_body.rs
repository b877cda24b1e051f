use compact_str::CompactString;
use rustc_hash::FxHashMap;

use crate::instruction::{ExceptionInformation, Instruction, Offset};
use crate::value::Variable;

/// A lifted method body: ordered instructions, parameters, declared locals, and the exception
/// table. Produced by a `Disassembler` collaborator; this crate only ever reads it.
#[derive(Debug, Clone, Default)]
pub struct MethodBody {
    pub instructions: Vec<Instruction>,
    pub parameters: Vec<Variable>,
    pub locals: Vec<Variable>,
    pub exception_information: ExceptionInformation,
}

impl MethodBody {
    pub fn new(
        instructions: Vec<Instruction>,
        parameters: Vec<Variable>,
        locals: Vec<Variable>,
        exception_information: ExceptionInformation,
    ) -> Self {
        Self {
            instructions,
            parameters,
            locals,
            exception_information,
        }
    }

    /// A label→offset index built on demand; used by the CFG builder to resolve branch targets
    /// and protected-block boundaries.
    pub fn label_index(&self) -> FxHashMap<CompactString, Offset> {
        self.instructions
            .iter()
            .map(|instr| (instr.label.clone(), instr.offset))
            .collect()
    }

    pub fn instruction_at_offset(&self, offset: Offset) -> Option<&Instruction> {
        // Offsets are monotone non-decreasing but not necessarily contiguous; binary search on the
        // sorted instruction stream.
        self.instructions
            .binary_search_by_key(&offset, |i| i.offset)
            .ok()
            .map(|idx| &self.instructions[idx])
    }

    pub fn index_of_offset(&self, offset: Offset) -> Option<usize> {
        self.instructions.binary_search_by_key(&offset, |i| i.offset).ok()
    }
}
