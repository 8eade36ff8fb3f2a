//! Flat instruction storage
//!
//! Every instruction of a module lives in one append-only array of 64-bit words. An
//! instruction is identified by the offset of its header word and always occupies four
//! consecutive words:
//!
//! ```text
//! +0  header    opcode | result_type << 8   (result_type 0xff = none)
//! +1  branch0   span of the primary body     (block, loop, if-true)
//! +2  branch1   span of the else body        (if-false)
//! +3  operands  span of the operand words
//! ```
//!
//! A span packs `len << 32 | offset`. Unused slots hold the null word (all bits set),
//! which is distinct from an empty span. Operand words hold raw payloads: indices and
//! depths, memarg align/offset pairs, or constants (i32 zero-extended, i64 as is, floats
//! as their bit patterns). Instruction sequences are spans whose words are instruction
//! ids.
//!
//! Sequences are decoded through a temporary singly linked list threaded through the
//! pool itself: each node word holds `next << 32 | instruction_id` and the chain is
//! copied into a contiguous run once its terminator is seen. Nested blocks therefore
//! need no growable list of their own.

use super::instruction::Instruction;
use super::module::ValueType;
use super::opcode::{Immediate, OpCode};
use super::reader::ByteCursor;
use super::DecodeError;

const NULL: u64 = u64::MAX;
const NO_RESULT_TYPE: u64 = 0xff;
const OPCODE_MASK: u64 = 0xff;
const RESULT_TYPE_SHIFT: u32 = 8;

const BRANCH_SLOT: u32 = 1;
const OPERANDS_SLOT: u32 = 3;
const WORDS_PER_INSTRUCTION: usize = 4;

const LINK_SHIFT: u32 = 32;
const LINK_VALUE_MASK: u64 = 0xffff_ffff;

/// Nesting limit of the materialised tree; decoding itself has none
pub const MAX_TREE_DEPTH: usize = 256;

const END: u8 = 0x0b;
const ELSE: u8 = 0x05;

/// A contiguous run of pool words
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub offset: u32,
    pub len: u32,
}

impl Span {
    pub const EMPTY: Span = Span { offset: 0, len: 0 };

    pub fn new(offset: u32, len: u32) -> Span {
        Span { offset, len }
    }

    pub fn pack(self) -> u64 {
        ((self.len as u64) << 32) | self.offset as u64
    }

    pub fn unpack(bits: u64) -> Span {
        Span {
            offset: (bits & 0xffff_ffff) as u32,
            len: (bits >> 32) as u32,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

#[derive(Debug, Clone)]
pub struct InstructionPool {
    data: Vec<u64>,
    operand_offset: usize,
    operand_count: u32,
}

impl Default for InstructionPool {
    fn default() -> Self {
        InstructionPool::new()
    }
}

impl InstructionPool {
    pub fn new() -> InstructionPool {
        let mut data = Vec::with_capacity(WORDS_PER_INSTRUCTION * 16);
        // offset 0 is never a valid id, it terminates linked lists
        data.push(0);
        InstructionPool {
            data,
            operand_offset: 0,
            operand_count: 0,
        }
    }

    /// Number of words in use
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.len() <= 1
    }

    // Writing -----------------------------------------------------------------

    /// Append a new instruction header plus its reserved slots, returning its id
    pub fn push_instruction(&mut self, op: OpCode, result_type: Option<ValueType>) -> u32 {
        let id = self.data.len() as u32;
        let result_bits = result_type.map_or(NO_RESULT_TYPE, |t| t.code() as u64);
        self.data.push(op.code() as u64 | (result_bits << RESULT_TYPE_SHIFT));
        self.data.push(NULL);
        self.data.push(NULL);
        self.data.push(NULL);
        id
    }

    /// Start staging an operand list at the current end of the pool
    pub fn begin_operands(&mut self) {
        self.operand_offset = self.data.len();
        self.operand_count = 0;
    }

    pub fn push_operand(&mut self, operand: u64) {
        self.data.push(operand);
        self.operand_count += 1;
    }

    /// Seal the staged operands and attach them to instruction `id`
    pub fn end_operands(&mut self, id: u32) -> Result<Span, DecodeError> {
        let span = Span::new(self.operand_offset as u32, self.operand_count);
        self.set_word(id + OPERANDS_SLOT, span.pack())?;
        self.operand_offset = 0;
        self.operand_count = 0;
        Ok(span)
    }

    pub fn set_branch(&mut self, id: u32, which: u32, span: Option<Span>) -> Result<(), DecodeError> {
        self.set_word(id + BRANCH_SLOT + which, span.map_or(NULL, Span::pack))
    }

    fn set_word(&mut self, index: u32, value: u64) -> Result<(), DecodeError> {
        let word = self
            .data
            .get_mut(index as usize)
            .ok_or(DecodeError::InvalidInstruction(index))?;
        *word = value;
        Ok(())
    }

    // Reading -----------------------------------------------------------------

    #[inline]
    fn word(&self, index: u32) -> Result<u64, DecodeError> {
        self.data
            .get(index as usize)
            .copied()
            .ok_or(DecodeError::InvalidInstruction(index))
    }

    #[inline]
    pub fn opcode(&self, id: u32) -> Result<OpCode, DecodeError> {
        OpCode::from_byte((self.word(id)? & OPCODE_MASK) as u8)
    }

    pub fn result_type(&self, id: u32) -> Result<Option<ValueType>, DecodeError> {
        let bits = (self.word(id)? >> RESULT_TYPE_SHIFT) & 0xff;
        if bits == NO_RESULT_TYPE {
            return Ok(None);
        }
        ValueType::decode(bits as u8).map(Some)
    }

    fn operand_span(&self, id: u32) -> Result<Option<Span>, DecodeError> {
        let bits = self.word(id + OPERANDS_SLOT)?;
        Ok(if bits == NULL { None } else { Some(Span::unpack(bits)) })
    }

    pub fn operand_count(&self, id: u32) -> Result<u32, DecodeError> {
        Ok(self.operand_span(id)?.map_or(0, |s| s.len))
    }

    #[inline]
    pub fn operand(&self, id: u32, index: u32) -> Result<u64, DecodeError> {
        let span = self.operand_span(id)?.unwrap_or(Span::EMPTY);
        if index >= span.len {
            return Err(DecodeError::OperandIndexOverflow {
                index,
                count: span.len,
            });
        }
        self.word(span.offset + index)
    }

    pub fn operands(&self, id: u32) -> Result<Vec<u64>, DecodeError> {
        let count = self.operand_count(id)?;
        (0..count).map(|i| self.operand(id, i)).collect()
    }

    /// Span of branch `which` (0 or 1), `None` when the slot is unset
    pub fn branch(&self, id: u32, which: u32) -> Result<Option<Span>, DecodeError> {
        let bits = self.word(id + BRANCH_SLOT + which)?;
        Ok(if bits == NULL { None } else { Some(Span::unpack(bits)) })
    }

    /// Id of the `index`th instruction of a flattened sequence
    #[inline]
    pub fn instruction_at(&self, span: Span, index: u32) -> Result<u32, DecodeError> {
        if index >= span.len {
            return Err(DecodeError::SpanIndexOverflow { index, len: span.len });
        }
        Ok(self.word(span.offset + index)? as u32)
    }

    // Decoding ----------------------------------------------------------------

    fn allocate_node(&mut self, value: u32) -> usize {
        let at = self.data.len();
        self.data.push(value as u64);
        at
    }

    fn push_node(&mut self, prev: usize, value: u32) -> usize {
        let at = self.data.len();
        self.data.push(value as u64);
        self.data[prev] |= (at as u64) << LINK_SHIFT;
        at
    }

    fn span_nodes(&mut self, head: usize) -> Span {
        let start = self.data.len();
        let mut count = 0;
        let mut cur = self.data[head];
        loop {
            self.data.push(cur & LINK_VALUE_MASK);
            count += 1;
            let next = (cur >> LINK_SHIFT) as usize;
            if next == 0 {
                break;
            }
            cur = self.data[next];
        }
        Span::new(start as u32, count)
    }

    fn append(&mut self, chain: &mut Chain, id: u32) {
        chain.tail = match chain.head {
            None => {
                let node = self.allocate_node(id);
                chain.head = Some(node);
                node
            }
            Some(_) => self.push_node(chain.tail, id),
        };
    }

    fn close(&mut self, chain: &Chain) -> Span {
        chain.head.map_or(Span::EMPTY, |head| self.span_nodes(head))
    }

    /// Decode instructions until one of `ends` is next, without consuming it
    ///
    /// Nested bodies are tracked on an explicit stack, so nesting depth is bounded only
    /// by the input.
    pub fn read_instructions_until(
        &mut self,
        cursor: &mut ByteCursor,
        ends: &[u8],
    ) -> Result<Span, DecodeError> {
        let mut root = Chain::default();
        let mut open: Vec<OpenBlock> = Vec::new();
        loop {
            let byte = cursor.peek()?;
            let terminated = match open.last() {
                None => ends.contains(&byte),
                Some(block) => block.terminated_by(byte),
            };
            if !terminated {
                match self.read_instruction(cursor)? {
                    Decoded::Instruction(id) => {
                        let chain = match open.last_mut() {
                            Some(block) => &mut block.body,
                            None => &mut root,
                        };
                        self.append(chain, id);
                    }
                    Decoded::Block(block) => open.push(block),
                }
                continue;
            }

            let mut block = match open.pop() {
                Some(block) => block,
                None => return Ok(self.close(&root)),
            };
            let span = self.close(&block.body);
            // the end or else delimiter
            cursor.read_u8()?;
            if byte == ELSE {
                block.then = Some(span);
                block.body = Chain::default();
                open.push(block);
                continue;
            }
            let (branch0, branch1) = match block.then {
                Some(then) => (then, Some(span)),
                None => (span, None),
            };
            self.set_branch(block.id, 0, Some(branch0))?;
            self.set_branch(block.id, 1, branch1)?;
            let parent = match open.last_mut() {
                Some(parent) => &mut parent.body,
                None => &mut root,
            };
            self.append(parent, block.id);
        }
    }

    /// Decode an `end`-terminated expression, consuming the `end`
    pub fn read_expression(&mut self, cursor: &mut ByteCursor) -> Result<Span, DecodeError> {
        let span = self.read_instructions_until(cursor, &[END])?;
        cursor.read_u8()?;
        Ok(span)
    }

    /// Decode one instruction; a structured instruction is returned open, its body unread
    fn read_instruction(&mut self, cursor: &mut ByteCursor) -> Result<Decoded, DecodeError> {
        let op = OpCode::from_byte(cursor.read_u8()?)?;
        let id = match op.immediate() {
            Immediate::None => match op {
                OpCode::Else | OpCode::End => return Err(DecodeError::UnexpectedDelimiter(op.mnemonic())),
                _ => self.push_instruction(op, None),
            },
            Immediate::Block => {
                let result_type = read_block_type(cursor)?;
                return Ok(Decoded::Block(OpenBlock {
                    id: self.push_instruction(op, result_type),
                    is_if: op == OpCode::If,
                    then: None,
                    body: Chain::default(),
                }));
            }
            Immediate::Index => {
                let id = self.push_instruction(op, None);
                self.begin_operands();
                self.push_operand(cursor.read_vu32()? as u64);
                self.end_operands(id)?;
                id
            }
            Immediate::BrTable => {
                let id = self.push_instruction(op, None);
                self.begin_operands();
                let count = cursor.read_vu32()?;
                for _ in 0..count {
                    self.push_operand(cursor.read_vu32()? as u64);
                }
                // default label goes last
                self.push_operand(cursor.read_vu32()? as u64);
                self.end_operands(id)?;
                id
            }
            Immediate::CallIndirect => {
                let id = self.push_instruction(op, None);
                self.begin_operands();
                self.push_operand(cursor.read_vu32()? as u64);
                self.end_operands(id)?;
                expect_zero_byte(cursor, op)?;
                id
            }
            Immediate::MemArg => {
                let id = self.push_instruction(op, None);
                self.begin_operands();
                // align, offset
                self.push_operand(cursor.read_vu32()? as u64);
                self.push_operand(cursor.read_vu32()? as u64);
                self.end_operands(id)?;
                id
            }
            Immediate::MemoryIndex => {
                expect_zero_byte(cursor, op)?;
                self.push_instruction(op, None)
            }
            Immediate::I32 | Immediate::I64 | Immediate::F32 | Immediate::F64 => {
                let value = match op.immediate() {
                    Immediate::I32 => cursor.read_vs32()? as u32 as u64,
                    Immediate::I64 => cursor.read_vs64()? as u64,
                    Immediate::F32 => cursor.read_u32()? as u64,
                    _ => cursor.read_u64()?,
                };
                let id = self.push_instruction(op, None);
                self.begin_operands();
                self.push_operand(value);
                self.end_operands(id)?;
                id
            }
        };
        Ok(Decoded::Instruction(id))
    }

    // Materialising -----------------------------------------------------------

    /// Rebuild the tree form of instruction `id`
    ///
    /// The tree is limited to [`MAX_TREE_DEPTH`] levels of nesting.
    pub fn to_instruction(&self, id: u32) -> Result<Instruction, DecodeError> {
        self.materialise(id, 0)
    }

    pub fn to_instructions(&self, span: Span) -> Result<Vec<Instruction>, DecodeError> {
        self.materialise_span(span, 0)
    }

    fn materialise(&self, id: u32, depth: usize) -> Result<Instruction, DecodeError> {
        let mut branches = [None, None];
        for (which, branch) in branches.iter_mut().enumerate() {
            if let Some(span) = self.branch(id, which as u32)? {
                if depth + 1 >= MAX_TREE_DEPTH {
                    return Err(DecodeError::NestingTooDeep(MAX_TREE_DEPTH));
                }
                *branch = Some(self.materialise_span(span, depth + 1)?);
            }
        }
        let [branch0, branch1] = branches;
        Ok(Instruction {
            op: self.opcode(id)?,
            result_type: self.result_type(id)?,
            operands: self.operands(id)?,
            branch0,
            branch1,
        })
    }

    fn materialise_span(&self, span: Span, depth: usize) -> Result<Vec<Instruction>, DecodeError> {
        (0..span.len)
            .map(|i| self.instruction_at(span, i).and_then(|id| self.materialise(id, depth)))
            .collect()
    }
}

/// Head and tail of a sequence's linked node chain
#[derive(Debug, Default)]
struct Chain {
    head: Option<usize>,
    tail: usize,
}

/// A block, loop or if whose body is still being decoded
#[derive(Debug)]
struct OpenBlock {
    id: u32,
    is_if: bool,
    /// Set once the `else` of an if has been read
    then: Option<Span>,
    body: Chain,
}

impl OpenBlock {
    fn terminated_by(&self, byte: u8) -> bool {
        byte == END || (byte == ELSE && self.is_if && self.then.is_none())
    }
}

enum Decoded {
    Instruction(u32),
    Block(OpenBlock),
}

fn read_block_type(cursor: &mut ByteCursor) -> Result<Option<ValueType>, DecodeError> {
    let byte = cursor.read_u8()?;
    if byte == 0x40 {
        return Ok(None);
    }
    ValueType::decode(byte)
        .map(Some)
        .map_err(|_| DecodeError::InvalidBlockType(byte))
}

fn expect_zero_byte(cursor: &mut ByteCursor, op: OpCode) -> Result<(), DecodeError> {
    if cursor.read_u8()? != 0 {
        return Err(DecodeError::ExpectedZeroByte(op.mnemonic()));
    }
    Ok(())
}
