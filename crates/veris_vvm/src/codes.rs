//! The code space: packed instruction records and the opcode table.
//!
//! Instructions live in a flat array; a [`CodePtr`] is an index into it.
//! Index 0 is reserved so that zero can serve as the unresolved-label
//! sentinel during assembly. The opcode table is sorted by mnemonic and
//! searched by binary search; each entry declares the operand count and
//! the type of each operand slot.

use crate::functor::Ipoint;
use crate::vpi::VpiRef;

/// An index into the code space.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct CodePtr(u32);

impl CodePtr {
    /// The unresolved/null code pointer.
    pub const NULL: CodePtr = CodePtr(0);

    /// Creates a pointer from a raw index.
    pub fn from_raw(index: u32) -> Self {
        CodePtr(index)
    }

    /// The raw index.
    pub fn as_raw(self) -> u32 {
        self.0
    }

    /// True for the null sentinel.
    pub fn is_null(self) -> bool {
        self.0 == 0
    }

    /// The next sequential instruction.
    pub fn next(self) -> CodePtr {
        CodePtr(self.0 + 1)
    }
}

/// The executable operation of one instruction.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[allow(missing_docs)]
pub enum Opcode {
    Add,
    And,
    Assign,
    CmpS,
    CmpU,
    CmpX,
    CmpZ,
    Delay,
    Disable,
    End,
    Fork,
    Inv,
    Jmp,
    Jmp0,
    Jmp0xz,
    Jmp1,
    Join,
    Load,
    Mov,
    Noop,
    NorR,
    Or,
    Set,
    VpiCall,
    Wait,
    Xnor,
    Xor,
}

impl Opcode {
    /// The assembly mnemonic.
    pub fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Add => "%add",
            Opcode::And => "%and",
            Opcode::Assign => "%assign",
            Opcode::CmpS => "%cmp/s",
            Opcode::CmpU => "%cmp/u",
            Opcode::CmpX => "%cmp/x",
            Opcode::CmpZ => "%cmp/z",
            Opcode::Delay => "%delay",
            Opcode::Disable => "%disable",
            Opcode::End => "%end",
            Opcode::Fork => "%fork",
            Opcode::Inv => "%inv",
            Opcode::Jmp => "%jmp",
            Opcode::Jmp0 => "%jmp/0",
            Opcode::Jmp0xz => "%jmp/0xz",
            Opcode::Jmp1 => "%jmp/1",
            Opcode::Join => "%join",
            Opcode::Load => "%load",
            Opcode::Mov => "%mov",
            Opcode::Noop => "%noop",
            Opcode::NorR => "%nor/r",
            Opcode::Or => "%or",
            Opcode::Set => "%set",
            Opcode::VpiCall => "%vpi_call",
            Opcode::Wait => "%wait",
            Opcode::Xnor => "%xnor",
            Opcode::Xor => "%xor",
        }
    }
}

/// The type of one operand slot in the opcode table.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum OperandType {
    /// Place holder for an unused operand.
    None,
    /// An immediate unsigned integer.
    Number,
    /// A thread bit index, first slot.
    Bit1,
    /// A thread bit index, second slot.
    Bit2,
    /// A pointer into code space.
    CodePtr,
    /// A variable or net functor pointer.
    FuncPtr,
}

/// One row of the opcode table.
#[derive(Clone, Copy, Debug)]
pub struct OpcodeEntry {
    /// The mnemonic, including the leading `%`.
    pub mnemonic: &'static str,
    /// The opcode this row assembles to.
    pub opcode: Opcode,
    /// The required operand count.
    pub argc: usize,
    /// The type of each operand slot.
    pub args: [OperandType; 3],
}

const fn entry(
    mnemonic: &'static str,
    opcode: Opcode,
    argc: usize,
    args: [OperandType; 3],
) -> OpcodeEntry {
    OpcodeEntry {
        mnemonic,
        opcode,
        argc,
        args,
    }
}

use OperandType::{Bit1, Bit2, CodePtr as OpCodePtr, FuncPtr, None as OpNone, Number};

/// The opcode table, sorted by mnemonic for binary search.
///
/// `%fork`, `%disable`, and `%vpi_call` take symbol or string operands
/// and are assembled by special statement forms in the compiler, so they
/// do not appear here.
pub static OPCODE_TABLE: &[OpcodeEntry] = &[
    entry("%add", Opcode::Add, 3, [Bit1, Bit2, Number]),
    entry("%and", Opcode::And, 3, [Bit1, Bit2, Number]),
    entry("%assign", Opcode::Assign, 3, [FuncPtr, Bit1, Bit2]),
    entry("%cmp/s", Opcode::CmpS, 3, [Bit1, Bit2, Number]),
    entry("%cmp/u", Opcode::CmpU, 3, [Bit1, Bit2, Number]),
    entry("%cmp/x", Opcode::CmpX, 3, [Bit1, Bit2, Number]),
    entry("%cmp/z", Opcode::CmpZ, 3, [Bit1, Bit2, Number]),
    entry("%delay", Opcode::Delay, 1, [Number, OpNone, OpNone]),
    entry("%end", Opcode::End, 0, [OpNone, OpNone, OpNone]),
    entry("%inv", Opcode::Inv, 2, [Bit1, Bit2, OpNone]),
    entry("%jmp", Opcode::Jmp, 1, [OpCodePtr, OpNone, OpNone]),
    entry("%jmp/0", Opcode::Jmp0, 2, [OpCodePtr, Bit1, OpNone]),
    entry("%jmp/0xz", Opcode::Jmp0xz, 2, [OpCodePtr, Bit1, OpNone]),
    entry("%jmp/1", Opcode::Jmp1, 2, [OpCodePtr, Bit1, OpNone]),
    entry("%join", Opcode::Join, 0, [OpNone, OpNone, OpNone]),
    entry("%load", Opcode::Load, 2, [Bit1, FuncPtr, OpNone]),
    entry("%mov", Opcode::Mov, 3, [Bit1, Bit2, Number]),
    entry("%noop", Opcode::Noop, 0, [OpNone, OpNone, OpNone]),
    entry("%nor/r", Opcode::NorR, 3, [Bit1, Bit2, Number]),
    entry("%or", Opcode::Or, 3, [Bit1, Bit2, Number]),
    entry("%set", Opcode::Set, 2, [FuncPtr, Bit1, OpNone]),
    entry("%wait", Opcode::Wait, 1, [FuncPtr, OpNone, OpNone]),
    entry("%xnor", Opcode::Xnor, 3, [Bit1, Bit2, Number]),
    entry("%xor", Opcode::Xor, 3, [Bit1, Bit2, Number]),
];

/// Looks up a mnemonic in the opcode table by binary search.
pub fn opcode_lookup(mnemonic: &str) -> Option<&'static OpcodeEntry> {
    OPCODE_TABLE
        .binary_search_by(|e| e.mnemonic.cmp(mnemonic))
        .ok()
        .map(|i| &OPCODE_TABLE[i])
}

/// The extended operand block of a `%fork` instruction.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ForkExtend {
    /// The child thread's start address.
    pub cptr: CodePtr,
    /// The scope the child runs in.
    pub scope: VpiRef,
}

/// One packed instruction record.
#[derive(Clone, PartialEq, Debug)]
pub struct Instruction {
    /// The operation.
    pub opcode: Opcode,
    /// First thread bit index operand.
    pub bit_idx1: u32,
    /// Second thread bit index operand.
    pub bit_idx2: u32,
    /// Immediate number operand.
    pub number: u64,
    /// Code pointer operand.
    pub cptr: CodePtr,
    /// Functor pointer operand.
    pub iptr: Ipoint,
    /// Extended operands of `%fork`.
    pub fork: Option<Box<ForkExtend>>,
    /// VPI handle operand of `%vpi_call` and `%disable`.
    pub handle: Option<VpiRef>,
}

impl Instruction {
    /// Creates an instruction with all operands cleared.
    pub fn new(opcode: Opcode) -> Self {
        Self {
            opcode,
            bit_idx1: 0,
            bit_idx2: 0,
            number: 0,
            cptr: CodePtr::NULL,
            iptr: Ipoint::NULL,
            fork: None,
            handle: None,
        }
    }
}

/// The flat array of instructions.
///
/// Slot 0 is reserved so [`CodePtr::NULL`] never addresses a real
/// instruction.
#[derive(Debug, Default)]
pub struct CodeSpace {
    codes: Vec<Instruction>,
}

impl CodeSpace {
    /// Creates a code space with the reserved null slot.
    pub fn new() -> Self {
        Self {
            codes: vec![Instruction::new(Opcode::Noop)],
        }
    }

    /// Appends a cleared instruction, returning its pointer.
    pub fn allocate(&mut self) -> CodePtr {
        let ptr = CodePtr::from_raw(self.codes.len() as u32);
        self.codes.push(Instruction::new(Opcode::Noop));
        ptr
    }

    /// The pointer the next [`allocate`](Self::allocate) will return.
    pub fn next(&self) -> CodePtr {
        CodePtr::from_raw(self.codes.len() as u32)
    }

    /// The number of instructions, including the reserved slot.
    pub fn len(&self) -> usize {
        self.codes.len()
    }

    /// True when only the reserved slot exists.
    pub fn is_empty(&self) -> bool {
        self.codes.len() <= 1
    }

    /// Returns the instruction at `ptr`.
    ///
    /// # Panics
    ///
    /// Panics if the pointer is out of range.
    pub fn get(&self, ptr: CodePtr) -> &Instruction {
        &self.codes[ptr.as_raw() as usize]
    }

    /// Returns the instruction at `ptr` mutably.
    ///
    /// # Panics
    ///
    /// Panics if the pointer is out of range.
    pub fn get_mut(&mut self, ptr: CodePtr) -> &mut Instruction {
        &mut self.codes[ptr.as_raw() as usize]
    }

    /// Iterates the real instructions with their pointers, skipping the
    /// reserved slot.
    pub fn iter(&self) -> impl Iterator<Item = (CodePtr, &Instruction)> {
        self.codes
            .iter()
            .enumerate()
            .skip(1)
            .map(|(i, c)| (CodePtr::from_raw(i as u32), c))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_is_sorted() {
        for pair in OPCODE_TABLE.windows(2) {
            assert!(
                pair[0].mnemonic < pair[1].mnemonic,
                "{} out of order",
                pair[1].mnemonic
            );
        }
    }

    #[test]
    fn lookup_hits() {
        let e = opcode_lookup("%jmp/0xz").unwrap();
        assert_eq!(e.opcode, Opcode::Jmp0xz);
        assert_eq!(e.argc, 2);
        assert_eq!(e.args[0], OperandType::CodePtr);
        assert_eq!(e.args[1], OperandType::Bit1);

        let e = opcode_lookup("%set").unwrap();
        assert_eq!(e.opcode, Opcode::Set);
        assert_eq!(e.args[0], OperandType::FuncPtr);
    }

    #[test]
    fn lookup_every_entry() {
        for e in OPCODE_TABLE {
            assert_eq!(
                opcode_lookup(e.mnemonic).unwrap().opcode,
                e.opcode,
                "{} failed to round-trip",
                e.mnemonic
            );
        }
    }

    #[test]
    fn lookup_miss() {
        assert!(opcode_lookup("%bogus").is_none());
        assert!(opcode_lookup("%jm").is_none());
    }

    #[test]
    fn code_space_reserves_null() {
        let mut cs = CodeSpace::new();
        assert!(cs.is_empty());
        let p = cs.allocate();
        assert_eq!(p.as_raw(), 1);
        assert!(!p.is_null());
        assert!(CodePtr::NULL.is_null());
        assert_eq!(cs.next().as_raw(), 2);
    }

    #[test]
    fn codelabel_points_at_next_instruction() {
        let mut cs = CodeSpace::new();
        cs.allocate();
        let label_target = cs.next();
        let ptr = cs.allocate();
        assert_eq!(label_target, ptr);
    }

    #[test]
    fn mnemonics_match_table() {
        for e in OPCODE_TABLE {
            assert_eq!(e.opcode.mnemonic(), e.mnemonic);
        }
    }
}
