//! Frame, label and operand stack allocation
//!
//! All frames of one execution share a single word arena. A frame's locals sit directly
//! below its operand stack, and its parameters are the top values of the caller's operand
//! stack, so a direct call moves no words at all:
//!
//! ```text
//! | caller locals | caller stack ... | callee locals (params, zeroed locals) | callee stack ...
//!                                     ^ locals_start                         ^ stack_base
//! ```
//!
//! Labels live in a second arena and frames in a third. All three are bounded by the
//! [`VmConfig`] limits.

use super::config::VmConfig;
use super::RuntimeError;
use crate::parser::pool::Span;

const TABLE_FLAG: u16 = 0x8000;
const INDEX_MASK: u16 = 0x7fff;

/// A callee reference: a direct function index, or a table slot resolved at call time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FunctionRef(u16);

impl FunctionRef {
    pub const MAX_INDEX: u32 = INDEX_MASK as u32;

    pub fn direct(index: u32) -> Result<FunctionRef, RuntimeError> {
        if index > Self::MAX_INDEX {
            return Err(RuntimeError::FunctionIndexOverflow(index));
        }
        Ok(FunctionRef(index as u16))
    }

    pub fn table(slot: u32) -> Result<FunctionRef, RuntimeError> {
        if slot > Self::MAX_INDEX {
            return Err(RuntimeError::FunctionIndexOverflow(slot));
        }
        Ok(FunctionRef(slot as u16 | TABLE_FLAG))
    }

    pub fn is_table(&self) -> bool {
        self.0 & TABLE_FLAG != 0
    }

    pub fn index(&self) -> u32 {
        (self.0 & INDEX_MASK) as u32
    }
}

/// Handle returned by `push_frame`, needed to pop the same frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameId(usize);

/// One active block, loop, if or function body scope
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Label {
    pub body: Span,
    pub pc: u32,
    /// Absolute operand stack height on entry
    pub stack_height: usize,
    pub has_result: bool,
    pub is_loop: bool,
}

/// Stack storage seen by the interpreter
///
/// Values are raw 64-bit words; i32 and f32 occupy the low half, zero-extended.
pub trait StackAllocator {
    /// Open a frame with `param_count + local_count` locals
    ///
    /// With `args` of `None` the parameters are the top `param_count` values of the
    /// caller's operand stack. Remaining locals start at zero.
    fn push_frame(
        &mut self,
        function: Option<FunctionRef>,
        param_count: u32,
        local_count: u32,
        args: Option<&[i64]>,
    ) -> Result<FrameId, RuntimeError>;

    /// Discard the topmost frame, which must be `id`
    fn pop_frame(&mut self, id: FrameId) -> Result<(), RuntimeError>;

    /// Pop frames until only `depth` remain
    fn unwind(&mut self, depth: usize);

    fn frame_count(&self) -> usize;

    fn current_function(&self) -> Option<FunctionRef>;

    fn push(&mut self, value: i64) -> Result<(), RuntimeError>;

    fn pop(&mut self) -> Result<i64, RuntimeError>;

    fn peek(&self) -> Result<i64, RuntimeError>;

    /// Absolute operand stack height
    fn stack_height(&self) -> usize;

    fn get_local(&self, index: u32) -> Result<i64, RuntimeError>;

    fn set_local(&mut self, index: u32, value: i64) -> Result<(), RuntimeError>;

    fn push_label(&mut self, has_result: bool, body: Span, is_loop: bool) -> Result<(), RuntimeError>;

    fn pop_label(&mut self) -> Result<Label, RuntimeError>;

    /// Pop the innermost label and restore the stack height it was entered with,
    /// keeping its result value if it has one
    fn pop_and_clear_label(&mut self) -> Result<(), RuntimeError>;

    /// Innermost label of the current frame
    fn current_label(&mut self) -> Option<&mut Label>;

    /// Labels held by the current frame
    fn label_count(&self) -> usize;

    /// `br depth`
    fn branch(&mut self, depth: u32) -> Result<(), RuntimeError>;

    fn reset(&mut self);

    fn push_i32(&mut self, value: i32) -> Result<(), RuntimeError> {
        self.push(value as u32 as i64)
    }

    fn pop_i32(&mut self) -> Result<i32, RuntimeError> {
        Ok(self.pop()? as i32)
    }

    fn push_i64(&mut self, value: i64) -> Result<(), RuntimeError> {
        self.push(value)
    }

    fn pop_i64(&mut self) -> Result<i64, RuntimeError> {
        self.pop()
    }

    fn push_f32(&mut self, value: f32) -> Result<(), RuntimeError> {
        self.push(value.to_bits() as i64)
    }

    fn pop_f32(&mut self) -> Result<f32, RuntimeError> {
        Ok(f32::from_bits(self.pop()? as u32))
    }

    fn push_f64(&mut self, value: f64) -> Result<(), RuntimeError> {
        self.push(value.to_bits() as i64)
    }

    fn pop_f64(&mut self) -> Result<f64, RuntimeError> {
        Ok(f64::from_bits(self.pop()? as u64))
    }

    fn push_bool(&mut self, value: bool) -> Result<(), RuntimeError> {
        self.push(value as i64)
    }
}

#[derive(Debug, Clone, Copy)]
struct FrameRecord {
    function: Option<FunctionRef>,
    locals_start: usize,
    local_count: usize,
    stack_base: usize,
    label_base: usize,
}

/// Bounds-checked `Vec` backed allocator
#[derive(Debug)]
pub struct ArrayStackAllocator {
    words: Vec<i64>,
    labels: Vec<Label>,
    frames: Vec<FrameRecord>,
    max_stack_words: usize,
    max_labels: usize,
    max_frames: usize,
}

impl Default for ArrayStackAllocator {
    fn default() -> Self {
        ArrayStackAllocator::new(&VmConfig::default())
    }
}

impl ArrayStackAllocator {
    pub fn new(config: &VmConfig) -> ArrayStackAllocator {
        ArrayStackAllocator {
            words: Vec::with_capacity(config.max_stack_words.min(4096)),
            labels: Vec::with_capacity(config.max_labels.min(1024)),
            frames: Vec::with_capacity(config.max_frames.min(256)),
            max_stack_words: config.max_stack_words,
            max_labels: config.max_labels,
            max_frames: config.max_frames,
        }
    }

    #[inline]
    fn frame(&self) -> Option<&FrameRecord> {
        self.frames.last()
    }

    #[inline]
    fn stack_base(&self) -> usize {
        self.frame().map_or(0, |f| f.stack_base)
    }

    #[inline]
    fn label_base(&self) -> usize {
        self.frame().map_or(0, |f| f.label_base)
    }

    fn local_slot(&self, index: u32) -> Result<usize, RuntimeError> {
        let frame = self.frame().ok_or(RuntimeError::LocalIndexOutOfBounds(index))?;
        if index as usize >= frame.local_count {
            return Err(RuntimeError::LocalIndexOutOfBounds(index));
        }
        Ok(frame.locals_start + index as usize)
    }
}

impl StackAllocator for ArrayStackAllocator {
    fn push_frame(
        &mut self,
        function: Option<FunctionRef>,
        param_count: u32,
        local_count: u32,
        args: Option<&[i64]>,
    ) -> Result<FrameId, RuntimeError> {
        if self.frames.len() >= self.max_frames {
            return Err(RuntimeError::FrameOverflow);
        }
        let param_count = param_count as usize;
        let locals_start = match args {
            None => {
                if self.words.len() - self.stack_base() < param_count {
                    return Err(RuntimeError::StackUnderflow);
                }
                self.words.len() - param_count
            }
            Some(args) => {
                if args.len() != param_count {
                    return Err(RuntimeError::ArgumentCountMismatch {
                        expected: param_count,
                        actual: args.len(),
                    });
                }
                if self.words.len() + param_count > self.max_stack_words {
                    return Err(RuntimeError::StackOverflow);
                }
                let start = self.words.len();
                self.words.extend_from_slice(args);
                start
            }
        };
        let stack_base = self.words.len() + local_count as usize;
        if stack_base > self.max_stack_words {
            return Err(RuntimeError::StackOverflow);
        }
        self.words.resize(stack_base, 0);

        let id = FrameId(self.frames.len());
        self.frames.push(FrameRecord {
            function,
            locals_start,
            local_count: param_count + local_count as usize,
            stack_base,
            label_base: self.labels.len(),
        });
        log::trace!("push frame {} for {:?}, {} locals", id.0, function, param_count + local_count as usize);
        Ok(id)
    }

    fn pop_frame(&mut self, id: FrameId) -> Result<(), RuntimeError> {
        if id.0 + 1 != self.frames.len() {
            return Err(RuntimeError::FrameOrderViolation);
        }
        let frame = self.frames.pop().ok_or(RuntimeError::FrameOrderViolation)?;
        self.words.truncate(frame.locals_start);
        self.labels.truncate(frame.label_base);
        log::trace!("pop frame {}", id.0);
        Ok(())
    }

    fn unwind(&mut self, depth: usize) {
        while self.frames.len() > depth {
            let top = FrameId(self.frames.len() - 1);
            // popping the top frame cannot violate order
            let _ = self.pop_frame(top);
        }
    }

    fn frame_count(&self) -> usize {
        self.frames.len()
    }

    fn current_function(&self) -> Option<FunctionRef> {
        self.frame().and_then(|f| f.function)
    }

    #[inline]
    fn push(&mut self, value: i64) -> Result<(), RuntimeError> {
        if self.words.len() >= self.max_stack_words {
            return Err(RuntimeError::StackOverflow);
        }
        self.words.push(value);
        Ok(())
    }

    #[inline]
    fn pop(&mut self) -> Result<i64, RuntimeError> {
        if self.words.len() <= self.stack_base() {
            return Err(RuntimeError::StackUnderflow);
        }
        self.words.pop().ok_or(RuntimeError::StackUnderflow)
    }

    fn peek(&self) -> Result<i64, RuntimeError> {
        if self.words.len() <= self.stack_base() {
            return Err(RuntimeError::StackUnderflow);
        }
        self.words.last().copied().ok_or(RuntimeError::StackUnderflow)
    }

    fn stack_height(&self) -> usize {
        self.words.len()
    }

    fn get_local(&self, index: u32) -> Result<i64, RuntimeError> {
        Ok(self.words[self.local_slot(index)?])
    }

    fn set_local(&mut self, index: u32, value: i64) -> Result<(), RuntimeError> {
        let slot = self.local_slot(index)?;
        self.words[slot] = value;
        Ok(())
    }

    fn push_label(&mut self, has_result: bool, body: Span, is_loop: bool) -> Result<(), RuntimeError> {
        if self.labels.len() >= self.max_labels {
            return Err(RuntimeError::LabelOverflow);
        }
        self.labels.push(Label {
            body,
            pc: 0,
            stack_height: self.words.len(),
            has_result,
            is_loop,
        });
        Ok(())
    }

    fn pop_label(&mut self) -> Result<Label, RuntimeError> {
        if self.labels.len() <= self.label_base() {
            return Err(RuntimeError::LabelUnderflow);
        }
        self.labels.pop().ok_or(RuntimeError::LabelUnderflow)
    }

    fn pop_and_clear_label(&mut self) -> Result<(), RuntimeError> {
        let label = self.pop_label()?;
        let result = if label.has_result { Some(self.pop()?) } else { None };
        if self.words.len() > label.stack_height {
            self.words.truncate(label.stack_height);
        }
        if let Some(value) = result {
            self.push(value)?;
        }
        Ok(())
    }

    #[inline]
    fn current_label(&mut self) -> Option<&mut Label> {
        if self.labels.len() <= self.label_base() {
            return None;
        }
        self.labels.last_mut()
    }

    fn label_count(&self) -> usize {
        self.labels.len() - self.label_base()
    }

    fn branch(&mut self, depth: u32) -> Result<(), RuntimeError> {
        if depth as usize >= self.label_count() {
            return Err(RuntimeError::LabelUnderflow);
        }
        let target = self.labels.len() - 1 - depth as usize;
        let label = self.labels[target];
        // a branch to a loop re-enters it and carries no value in the MVP
        let carried = if label.has_result && !label.is_loop {
            Some(self.pop()?)
        } else {
            None
        };
        self.labels.truncate(target + 1);
        self.words.truncate(label.stack_height);
        if let Some(value) = carried {
            self.push(value)?;
        }
        let target = &mut self.labels[target];
        target.pc = if label.is_loop { 0 } else { label.body.len };
        Ok(())
    }

    fn reset(&mut self) {
        self.words.clear();
        self.labels.clear();
        self.frames.clear();
    }
}
