//! WebAssembly instruction executor
//!
//! The dispatch loop never recurses for Wasm-to-Wasm calls or structured control flow.
//! Each iteration looks at the innermost label of the current frame: a label whose
//! program counter has run off the end of its body is popped (an implicit `end`),
//! otherwise the next instruction is fetched from the pool and dispatched. When the
//! frame runs out of labels, or executes `return`, its result is handed to the caller.
//!
//! Host functions are the only recursion point: they receive the instance and may call
//! back into it, which starts a nested `Executor` on the same stack allocator.

use std::rc::Rc;
use std::sync::Arc;

use super::imports::HostFunction;
use super::instance::{FunctionCode, ModuleInstance};
use super::ops::{self, Stack};
use super::stack::{FrameId, FunctionRef};
use super::RuntimeError;
use crate::parser::module::{Module, ValueType};
use crate::parser::opcode::OpCode;
use crate::parser::pool::{InstructionPool, Span};
use crate::parser::DecodeError;

type StackOp = fn(&mut Stack) -> Result<(), RuntimeError>;

/// What the loop does after an instruction
enum Flow {
    Continue,
    Return,
}

/// A frame pushed by this executor
struct CallFrame {
    id: FrameId,
    result_type: Option<ValueType>,
}

/// i32 and f32 results only own the low half of the word
#[inline]
fn mask_result(value_type: ValueType, raw: i64) -> i64 {
    if value_type.is_32_bit() {
        raw & 0xffff_ffff
    } else {
        raw
    }
}

/// Executes instructions against one module instance
pub struct Executor<'a> {
    instance: &'a mut ModuleInstance,
    frames: Vec<CallFrame>,
}

impl<'a> Executor<'a> {
    pub fn new(instance: &'a mut ModuleInstance) -> Self {
        Executor {
            instance,
            frames: Vec::new(),
        }
    }

    /// Call function `index` with arguments supplied by the embedder
    pub fn call(mut self, index: u32, args: &[i64]) -> Result<Option<i64>, RuntimeError> {
        let function = self
            .instance
            .functions
            .get(index as usize)
            .ok_or(RuntimeError::FunctionIndexOutOfBounds(index))?;
        let result_type = function.function_type.result();
        let param_count = function.function_type.parameters.len() as u32;

        match &function.code {
            FunctionCode::Host(host) => {
                let host = Rc::clone(host);
                self.call_host(host.as_ref(), result_type, args)
            }
            FunctionCode::Wasm { local_count, body } => {
                let (local_count, body) = (*local_count, *body);
                let id = self.instance.stack.push_frame(
                    Some(FunctionRef::direct(index)?),
                    param_count,
                    local_count,
                    Some(args),
                )?;
                self.enter_frame(id, result_type, body)?;
                self.run()
            }
        }
    }

    /// Evaluate a constant expression such as a global initialiser or segment offset
    pub fn evaluate(mut self, expr: Span, value_type: ValueType) -> Result<i64, RuntimeError> {
        let id = self.instance.stack.push_frame(None, 0, 0, Some(&[]))?;
        self.enter_frame(id, Some(value_type), expr)?;
        self.run()?.ok_or(RuntimeError::MissingResult)
    }

    fn enter_frame(&mut self, id: FrameId, result_type: Option<ValueType>, body: Span) -> Result<(), RuntimeError> {
        self.instance.stack.push_label(result_type.is_some(), body, false)?;
        self.frames.push(CallFrame { id, result_type });
        for hook in self.instance.hooks.iter_mut() {
            hook.on_new_frame()?;
        }
        Ok(())
    }

    /// Pop the current frame, returning `Some(result)` once the outermost frame is gone
    fn exit_frame(&mut self) -> Result<Option<Option<i64>>, RuntimeError> {
        let frame = self.frames.pop().ok_or(RuntimeError::FrameOrderViolation)?;
        let stack = &mut self.instance.stack;
        let result = match frame.result_type {
            Some(value_type) => Some(mask_result(value_type, stack.pop()?)),
            None => None,
        };
        stack.pop_frame(frame.id)?;
        for hook in self.instance.hooks.iter_mut() {
            hook.on_frame_exit()?;
        }

        if self.frames.is_empty() {
            return Ok(Some(result));
        }
        if let Some(value) = result {
            self.instance.stack.push(value)?;
        }
        Ok(None)
    }

    fn run(&mut self) -> Result<Option<i64>, RuntimeError> {
        let module = Arc::clone(&self.instance.module);
        let pool = &module.pool;

        loop {
            let next = match self.instance.stack.current_label() {
                Some(label) if label.pc < label.body.len => {
                    let at = (label.body, label.pc);
                    label.pc += 1;
                    Some(at)
                }
                Some(_) => {
                    self.instance.stack.pop_and_clear_label()?;
                    continue;
                }
                None => None,
            };

            let flow = match next {
                Some((body, pc)) => {
                    let id = pool.instruction_at(body, pc)?;
                    self.step(&module, pool, id)?
                }
                None => Flow::Return,
            };

            if let Flow::Return = flow {
                if let Some(result) = self.exit_frame()? {
                    return Ok(result);
                }
            }
        }
    }

    fn step(&mut self, module: &Module, pool: &InstructionPool, id: u32) -> Result<Flow, RuntimeError> {
        let op = pool.opcode(id)?;
        for hook in self.instance.hooks.iter_mut() {
            hook.on_instruction(op)?;
        }

        macro_rules! with_memory {
            (load $f:ident) => {
                ops::memory::$f(&mut *self.instance.stack, &self.instance.memory, pool.operand(id, 1)?)?
            };
            (store $f:ident) => {
                ops::memory::$f(&mut *self.instance.stack, &mut self.instance.memory, pool.operand(id, 1)?)?
            };
        }

        match op {
            // ----------------------------------------------------------------
            // Control
            OpCode::Unreachable => return Err(RuntimeError::Unreachable),
            OpCode::Nop => {}
            OpCode::Block | OpCode::Loop => {
                let body = pool.branch(id, 0)?.unwrap_or(Span::EMPTY);
                let has_result = pool.result_type(id)?.is_some();
                self.instance.stack.push_label(has_result, body, op == OpCode::Loop)?;
            }
            OpCode::If => {
                let condition = self.instance.stack.pop_i32()?;
                let which = if condition != 0 { 0 } else { 1 };
                let body = pool.branch(id, which)?.unwrap_or(Span::EMPTY);
                let has_result = pool.result_type(id)?.is_some();
                self.instance.stack.push_label(has_result, body, false)?;
            }
            OpCode::Else | OpCode::End => {
                return Err(DecodeError::UnexpectedDelimiter(op.mnemonic()).into());
            }
            OpCode::Br => {
                let depth = pool.operand(id, 0)? as u32;
                self.instance.stack.branch(depth)?;
            }
            OpCode::BrIf => {
                let depth = pool.operand(id, 0)? as u32;
                if self.instance.stack.pop_i32()? != 0 {
                    self.instance.stack.branch(depth)?;
                }
            }
            OpCode::BrTable => {
                let index = self.instance.stack.pop_i32()? as u32;
                let count = pool.operand_count(id)?;
                // the default depth is the last operand
                let default = count.saturating_sub(1);
                let depth = pool.operand(id, if index < default { index } else { default })?;
                self.instance.stack.branch(depth as u32)?;
            }
            OpCode::Return => return Ok(Flow::Return),
            OpCode::Call => {
                let index = pool.operand(id, 0)? as u32;
                self.call_function(index, FunctionRef::direct(index)?)?;
            }
            OpCode::CallIndirect => {
                let type_index = pool.operand(id, 0)? as u32;
                let slot = self.instance.stack.pop_i32()? as u32;
                let index = self
                    .instance
                    .table
                    .as_ref()
                    .and_then(|table| table.get(slot))
                    .ok_or(RuntimeError::UndefinedElement(slot))?;
                if self.instance.validate_function_type {
                    let expected = module.types.get(type_index as usize);
                    let actual = self.instance.functions.get(index as usize).map(|f| &f.function_type);
                    if expected.is_none() || expected != actual {
                        return Err(RuntimeError::SignatureMismatch);
                    }
                }
                self.call_function(index, FunctionRef::table(slot)?)?;
            }

            // ----------------------------------------------------------------
            // Parametric
            OpCode::Drop => ops::parametric::drop(&mut *self.instance.stack)?,
            OpCode::Select => ops::parametric::select(&mut *self.instance.stack)?,

            // ----------------------------------------------------------------
            // Variable
            OpCode::LocalGet => ops::variable::local_get(&mut *self.instance.stack, pool.operand(id, 0)? as u32)?,
            OpCode::LocalSet => ops::variable::local_set(&mut *self.instance.stack, pool.operand(id, 0)? as u32)?,
            OpCode::LocalTee => ops::variable::local_tee(&mut *self.instance.stack, pool.operand(id, 0)? as u32)?,
            OpCode::GlobalGet => {
                ops::variable::global_get(&mut *self.instance.stack, &self.instance.globals, pool.operand(id, 0)? as u32)?
            }
            OpCode::GlobalSet => ops::variable::global_set(
                &mut *self.instance.stack,
                &mut self.instance.globals,
                &self.instance.global_types,
                pool.operand(id, 0)? as u32,
            )?,

            // ----------------------------------------------------------------
            // Memory
            OpCode::I32Load => with_memory!(load i32_load),
            OpCode::I64Load => with_memory!(load i64_load),
            OpCode::F32Load => with_memory!(load f32_load),
            OpCode::F64Load => with_memory!(load f64_load),
            OpCode::I32Load8S => with_memory!(load i32_load8_s),
            OpCode::I32Load8U => with_memory!(load i32_load8_u),
            OpCode::I32Load16S => with_memory!(load i32_load16_s),
            OpCode::I32Load16U => with_memory!(load i32_load16_u),
            OpCode::I64Load8S => with_memory!(load i64_load8_s),
            OpCode::I64Load8U => with_memory!(load i64_load8_u),
            OpCode::I64Load16S => with_memory!(load i64_load16_s),
            OpCode::I64Load16U => with_memory!(load i64_load16_u),
            OpCode::I64Load32S => with_memory!(load i64_load32_s),
            OpCode::I64Load32U => with_memory!(load i64_load32_u),
            OpCode::I32Store => with_memory!(store i32_store),
            OpCode::I64Store => with_memory!(store i64_store),
            OpCode::F32Store => with_memory!(store f32_store),
            OpCode::F64Store => with_memory!(store f64_store),
            OpCode::I32Store8 => with_memory!(store i32_store8),
            OpCode::I32Store16 => with_memory!(store i32_store16),
            OpCode::I64Store8 => with_memory!(store i64_store8),
            OpCode::I64Store16 => with_memory!(store i64_store16),
            OpCode::I64Store32 => with_memory!(store i64_store32),
            OpCode::MemorySize => ops::memory::memory_size(&mut *self.instance.stack, &self.instance.memory)?,
            OpCode::MemoryGrow => {
                let before = self.instance.memory.pages();
                let result = ops::memory::memory_grow(&mut *self.instance.stack, &mut self.instance.memory)?;
                if result >= 0 {
                    let after = self.instance.memory.pages();
                    for hook in self.instance.hooks.iter_mut() {
                        hook.on_memory_grow(before, after)?;
                    }
                }
            }

            // ----------------------------------------------------------------
            // Constants are stored as the raw stack word
            OpCode::I32Const | OpCode::I64Const | OpCode::F32Const | OpCode::F64Const => {
                self.instance.stack.push(pool.operand(id, 0)? as i64)?;
            }

            _ => {
                let f = stack_op(op).ok_or(DecodeError::UnknownOpcode(op.code()))?;
                f(&mut *self.instance.stack)?;
            }
        }
        Ok(Flow::Continue)
    }

    /// `call` and `call_indirect` once the target is known
    fn call_function(&mut self, index: u32, reference: FunctionRef) -> Result<(), RuntimeError> {
        let function = self
            .instance
            .functions
            .get(index as usize)
            .ok_or(RuntimeError::FunctionIndexOutOfBounds(index))?;
        let result_type = function.function_type.result();
        let param_count = function.function_type.parameters.len();

        match &function.code {
            FunctionCode::Host(host) => {
                let host = Rc::clone(host);
                let mut args = vec![0; param_count];
                for arg in args.iter_mut().rev() {
                    *arg = self.instance.stack.pop()?;
                }
                if let Some(value) = self.call_host(host.as_ref(), result_type, &args)? {
                    self.instance.stack.push(value)?;
                }
            }
            FunctionCode::Wasm { local_count, body } => {
                let (local_count, body) = (*local_count, *body);
                let id = self
                    .instance
                    .stack
                    .push_frame(Some(reference), param_count as u32, local_count, None)?;
                self.enter_frame(id, result_type, body)?;
            }
        }
        Ok(())
    }

    fn call_host(
        &mut self,
        host: &dyn HostFunction,
        result_type: Option<ValueType>,
        args: &[i64],
    ) -> Result<Option<i64>, RuntimeError> {
        for hook in self.instance.hooks.iter_mut() {
            hook.on_host_function(host.name())?;
        }
        let result = host.execute(self.instance, args).map_err(|e| {
            log::warn!("host function {} failed: {}", host.name(), e);
            e
        })?;
        match (result_type, result) {
            (Some(value_type), Some(value)) => Ok(Some(mask_result(value_type, value))),
            (Some(_), None) => Err(RuntimeError::MissingResult),
            (None, _) => Ok(None),
        }
    }
}

/// Instructions that only touch the operand stack
fn stack_op(op: OpCode) -> Option<StackOp> {
    use ops::{bitwise, comparison, conversion, numeric};

    Some(match op {
        // comparison
        OpCode::I32Eqz => comparison::i32_eqz,
        OpCode::I32Eq => comparison::i32_eq,
        OpCode::I32Ne => comparison::i32_ne,
        OpCode::I32LtS => comparison::i32_lt_s,
        OpCode::I32LtU => comparison::i32_lt_u,
        OpCode::I32GtS => comparison::i32_gt_s,
        OpCode::I32GtU => comparison::i32_gt_u,
        OpCode::I32LeS => comparison::i32_le_s,
        OpCode::I32LeU => comparison::i32_le_u,
        OpCode::I32GeS => comparison::i32_ge_s,
        OpCode::I32GeU => comparison::i32_ge_u,
        OpCode::I64Eqz => comparison::i64_eqz,
        OpCode::I64Eq => comparison::i64_eq,
        OpCode::I64Ne => comparison::i64_ne,
        OpCode::I64LtS => comparison::i64_lt_s,
        OpCode::I64LtU => comparison::i64_lt_u,
        OpCode::I64GtS => comparison::i64_gt_s,
        OpCode::I64GtU => comparison::i64_gt_u,
        OpCode::I64LeS => comparison::i64_le_s,
        OpCode::I64LeU => comparison::i64_le_u,
        OpCode::I64GeS => comparison::i64_ge_s,
        OpCode::I64GeU => comparison::i64_ge_u,
        OpCode::F32Eq => comparison::f32_eq,
        OpCode::F32Ne => comparison::f32_ne,
        OpCode::F32Lt => comparison::f32_lt,
        OpCode::F32Gt => comparison::f32_gt,
        OpCode::F32Le => comparison::f32_le,
        OpCode::F32Ge => comparison::f32_ge,
        OpCode::F64Eq => comparison::f64_eq,
        OpCode::F64Ne => comparison::f64_ne,
        OpCode::F64Lt => comparison::f64_lt,
        OpCode::F64Gt => comparison::f64_gt,
        OpCode::F64Le => comparison::f64_le,
        OpCode::F64Ge => comparison::f64_ge,

        // integer arithmetic
        OpCode::I32Clz => bitwise::i32_clz,
        OpCode::I32Ctz => bitwise::i32_ctz,
        OpCode::I32Popcnt => bitwise::i32_popcnt,
        OpCode::I32Add => numeric::i32_add,
        OpCode::I32Sub => numeric::i32_sub,
        OpCode::I32Mul => numeric::i32_mul,
        OpCode::I32DivS => numeric::i32_div_s,
        OpCode::I32DivU => numeric::i32_div_u,
        OpCode::I32RemS => numeric::i32_rem_s,
        OpCode::I32RemU => numeric::i32_rem_u,
        OpCode::I32And => bitwise::i32_and,
        OpCode::I32Or => bitwise::i32_or,
        OpCode::I32Xor => bitwise::i32_xor,
        OpCode::I32Shl => bitwise::i32_shl,
        OpCode::I32ShrS => bitwise::i32_shr_s,
        OpCode::I32ShrU => bitwise::i32_shr_u,
        OpCode::I32Rotl => bitwise::i32_rotl,
        OpCode::I32Rotr => bitwise::i32_rotr,
        OpCode::I64Clz => bitwise::i64_clz,
        OpCode::I64Ctz => bitwise::i64_ctz,
        OpCode::I64Popcnt => bitwise::i64_popcnt,
        OpCode::I64Add => numeric::i64_add,
        OpCode::I64Sub => numeric::i64_sub,
        OpCode::I64Mul => numeric::i64_mul,
        OpCode::I64DivS => numeric::i64_div_s,
        OpCode::I64DivU => numeric::i64_div_u,
        OpCode::I64RemS => numeric::i64_rem_s,
        OpCode::I64RemU => numeric::i64_rem_u,
        OpCode::I64And => bitwise::i64_and,
        OpCode::I64Or => bitwise::i64_or,
        OpCode::I64Xor => bitwise::i64_xor,
        OpCode::I64Shl => bitwise::i64_shl,
        OpCode::I64ShrS => bitwise::i64_shr_s,
        OpCode::I64ShrU => bitwise::i64_shr_u,
        OpCode::I64Rotl => bitwise::i64_rotl,
        OpCode::I64Rotr => bitwise::i64_rotr,

        // float arithmetic
        OpCode::F32Abs => numeric::f32_abs,
        OpCode::F32Neg => numeric::f32_neg,
        OpCode::F32Ceil => numeric::f32_ceil,
        OpCode::F32Floor => numeric::f32_floor,
        OpCode::F32Trunc => numeric::f32_trunc,
        OpCode::F32Nearest => numeric::f32_nearest,
        OpCode::F32Sqrt => numeric::f32_sqrt,
        OpCode::F32Add => numeric::f32_add,
        OpCode::F32Sub => numeric::f32_sub,
        OpCode::F32Mul => numeric::f32_mul,
        OpCode::F32Div => numeric::f32_div,
        OpCode::F32Min => numeric::f32_min,
        OpCode::F32Max => numeric::f32_max,
        OpCode::F32Copysign => numeric::f32_copysign,
        OpCode::F64Abs => numeric::f64_abs,
        OpCode::F64Neg => numeric::f64_neg,
        OpCode::F64Ceil => numeric::f64_ceil,
        OpCode::F64Floor => numeric::f64_floor,
        OpCode::F64Trunc => numeric::f64_trunc,
        OpCode::F64Nearest => numeric::f64_nearest,
        OpCode::F64Sqrt => numeric::f64_sqrt,
        OpCode::F64Add => numeric::f64_add,
        OpCode::F64Sub => numeric::f64_sub,
        OpCode::F64Mul => numeric::f64_mul,
        OpCode::F64Div => numeric::f64_div,
        OpCode::F64Min => numeric::f64_min,
        OpCode::F64Max => numeric::f64_max,
        OpCode::F64Copysign => numeric::f64_copysign,

        // conversions
        OpCode::I32WrapI64 => conversion::i32_wrap_i64,
        OpCode::I32TruncF32S => conversion::i32_trunc_f32_s,
        OpCode::I32TruncF32U => conversion::i32_trunc_f32_u,
        OpCode::I32TruncF64S => conversion::i32_trunc_f64_s,
        OpCode::I32TruncF64U => conversion::i32_trunc_f64_u,
        OpCode::I64ExtendI32S => conversion::i64_extend_i32_s,
        OpCode::I64ExtendI32U => conversion::i64_extend_i32_u,
        OpCode::I64TruncF32S => conversion::i64_trunc_f32_s,
        OpCode::I64TruncF32U => conversion::i64_trunc_f32_u,
        OpCode::I64TruncF64S => conversion::i64_trunc_f64_s,
        OpCode::I64TruncF64U => conversion::i64_trunc_f64_u,
        OpCode::F32ConvertI32S => conversion::f32_convert_i32_s,
        OpCode::F32ConvertI32U => conversion::f32_convert_i32_u,
        OpCode::F32ConvertI64S => conversion::f32_convert_i64_s,
        OpCode::F32ConvertI64U => conversion::f32_convert_i64_u,
        OpCode::F32DemoteF64 => conversion::f32_demote_f64,
        OpCode::F64ConvertI32S => conversion::f64_convert_i32_s,
        OpCode::F64ConvertI32U => conversion::f64_convert_i32_u,
        OpCode::F64ConvertI64S => conversion::f64_convert_i64_s,
        OpCode::F64ConvertI64U => conversion::f64_convert_i64_u,
        OpCode::F64PromoteF32 => conversion::f64_promote_f32,
        OpCode::I32ReinterpretF32 => conversion::i32_reinterpret_f32,
        OpCode::I64ReinterpretF64 => conversion::i64_reinterpret_f64,
        OpCode::F32ReinterpretI32 => conversion::f32_reinterpret_i32,
        OpCode::F64ReinterpretI64 => conversion::f64_reinterpret_i64,

        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use crate::parser::module::{Limits, ValueType};
    use crate::parser::opcode::OpCode;
    use crate::parser::parse;
    use crate::runtime::test_utils::test::{Code, ExecutorTest, WasmModule};
    use crate::runtime::{Builder, FuelMeter, Hook, HostFn, ModuleInstance, RuntimeError, Value, VmConfig};

    fn instantiate(module: &WasmModule) -> ModuleInstance {
        let module = parse(&module.encode()).expect("Test module should decode");
        Builder::new(module).build().expect("Instantiation should succeed")
    }

    mod blocks {
        use super::*;

        #[test]
        fn block_result() {
            ExecutorTest::new()
                .block(OpCode::Block, Some(ValueType::I32))
                .i32_const(7)
                .inst(OpCode::End)
                .returns(vec![ValueType::I32])
                .expect_stack(vec![Value::I32(7)]);
        }

        #[test]
        fn empty_block_keeps_outer_stack() {
            ExecutorTest::new()
                .i32_const(3)
                .block(OpCode::Block, None)
                .inst(OpCode::End)
                .block(OpCode::Loop, None)
                .inst(OpCode::End)
                .returns(vec![ValueType::I32])
                .expect_stack(vec![Value::I32(3)]);
        }

        #[test]
        fn branch_restores_target_height() {
            // br 2 leaves exactly the outer value plus the carried result
            ExecutorTest::new()
                .i32_const(100)
                .block(OpCode::Block, Some(ValueType::I32))
                .i32_const(1)
                .block(OpCode::Block, None)
                .i32_const(2)
                .block(OpCode::Block, None)
                .i32_const(3)
                .i32_const(42)
                .index(OpCode::Br, 2)
                .inst(OpCode::End)
                .inst(OpCode::Drop)
                .inst(OpCode::End)
                .inst(OpCode::Drop)
                .i32_const(0)
                .inst(OpCode::End)
                .inst(OpCode::I32Add)
                .returns(vec![ValueType::I32])
                .expect_stack(vec![Value::I32(142)]);
        }

        #[test]
        fn br_if_falls_through_on_zero() {
            ExecutorTest::new()
                .block(OpCode::Block, Some(ValueType::I32))
                .i32_const(1)
                .i32_const(0)
                .index(OpCode::BrIf, 0)
                .inst(OpCode::Drop)
                .i32_const(2)
                .inst(OpCode::End)
                .returns(vec![ValueType::I32])
                .expect_stack(vec![Value::I32(2)]);
            ExecutorTest::new()
                .block(OpCode::Block, Some(ValueType::I32))
                .i32_const(1)
                .i32_const(1)
                .index(OpCode::BrIf, 0)
                .inst(OpCode::Drop)
                .i32_const(2)
                .inst(OpCode::End)
                .returns(vec![ValueType::I32])
                .expect_stack(vec![Value::I32(1)]);
        }

        #[test]
        fn branch_past_function_body_fails() {
            ExecutorTest::new()
                .index(OpCode::Br, 1)
                .expect_trap(RuntimeError::LabelUnderflow);
        }

        fn if_else(condition: i32) -> ExecutorTest {
            ExecutorTest::new()
                .arg(Value::I32(condition))
                .index(OpCode::LocalGet, 0)
                .block(OpCode::If, Some(ValueType::I32))
                .i32_const(10)
                .inst(OpCode::Else)
                .i32_const(20)
                .inst(OpCode::End)
                .returns(vec![ValueType::I32])
        }

        #[test]
        fn if_selects_branch() {
            if_else(1).expect_stack(vec![Value::I32(10)]);
            if_else(-5).expect_stack(vec![Value::I32(10)]);
            if_else(0).expect_stack(vec![Value::I32(20)]);
        }

        #[test]
        fn if_without_else() {
            ExecutorTest::new()
                .i32_const(5)
                .i32_const(0)
                .block(OpCode::If, None)
                .inst(OpCode::Unreachable)
                .inst(OpCode::End)
                .returns(vec![ValueType::I32])
                .expect_stack(vec![Value::I32(5)]);
        }

        fn br_table(index: i32) -> ExecutorTest {
            ExecutorTest::new()
                .arg(Value::I32(index))
                .block(OpCode::Block, None)
                .block(OpCode::Block, None)
                .block(OpCode::Block, None)
                .index(OpCode::LocalGet, 0)
                .br_table(&[0, 1], 2)
                .inst(OpCode::End)
                .i32_const(10)
                .inst(OpCode::Return)
                .inst(OpCode::End)
                .i32_const(11)
                .inst(OpCode::Return)
                .inst(OpCode::End)
                .i32_const(12)
                .returns(vec![ValueType::I32])
        }

        #[test]
        fn br_table_selects_depth() {
            br_table(0).expect_stack(vec![Value::I32(10)]);
            br_table(1).expect_stack(vec![Value::I32(11)]);
        }

        #[test]
        fn br_table_out_of_range_uses_default() {
            br_table(2).expect_stack(vec![Value::I32(12)]);
            br_table(1000).expect_stack(vec![Value::I32(12)]);
            br_table(-1).expect_stack(vec![Value::I32(12)]);
        }

        #[test]
        fn return_from_nested_block() {
            ExecutorTest::new()
                .block(OpCode::Block, None)
                .block(OpCode::Loop, None)
                .i32_const(9)
                .i32_const(5)
                .inst(OpCode::Return)
                .inst(OpCode::End)
                .inst(OpCode::End)
                .i32_const(6)
                .returns(vec![ValueType::I32])
                .expect_stack(vec![Value::I32(5)]);
        }

        #[test]
        fn unreachable_traps() {
            ExecutorTest::new()
                .inst(OpCode::Nop)
                .inst(OpCode::Unreachable)
                .expect_trap(RuntimeError::Unreachable);
        }
    }

    mod loops {
        use super::*;

        fn sum_to(n: i32) -> ExecutorTest {
            // i = 0; acc = 0; while i <= n { acc += i; i += 1 }
            ExecutorTest::new()
                .arg(Value::I32(n))
                .local(ValueType::I32)
                .local(ValueType::I32)
                .block(OpCode::Block, None)
                .block(OpCode::Loop, None)
                .index(OpCode::LocalGet, 1)
                .index(OpCode::LocalGet, 0)
                .inst(OpCode::I32GtS)
                .index(OpCode::BrIf, 1)
                .index(OpCode::LocalGet, 2)
                .index(OpCode::LocalGet, 1)
                .inst(OpCode::I32Add)
                .index(OpCode::LocalSet, 2)
                .index(OpCode::LocalGet, 1)
                .i32_const(1)
                .inst(OpCode::I32Add)
                .index(OpCode::LocalSet, 1)
                .index(OpCode::Br, 0)
                .inst(OpCode::End)
                .inst(OpCode::End)
                .index(OpCode::LocalGet, 2)
                .returns(vec![ValueType::I32])
        }

        #[test]
        fn counting_loop() {
            sum_to(10).expect_stack(vec![Value::I32(55)]);
            sum_to(0).expect_stack(vec![Value::I32(0)]);
            sum_to(1000).expect_stack(vec![Value::I32(500500)]);
        }

        #[test]
        fn loop_falls_out_at_end() {
            ExecutorTest::new()
                .block(OpCode::Loop, Some(ValueType::I64))
                .i64_const(4)
                .inst(OpCode::End)
                .returns(vec![ValueType::I64])
                .expect_stack(vec![Value::I64(4)]);
        }

        #[test]
        fn fuel_stops_infinite_loop() {
            let mut module = WasmModule::new();
            let t = module.signature(vec![], vec![]);
            let body = Code::new()
                .block(OpCode::Loop, None)
                .index(OpCode::Br, 0)
                .inst(OpCode::End)
                .into_bytes();
            let f = module.function(t, vec![], body);
            module.export_function("spin", f);

            let meter = FuelMeter::new(1000);
            let counter = meter.counter();
            let mut instance = Builder::new(parse(&module.encode()).unwrap())
                .hook(Box::new(meter))
                .build()
                .unwrap();
            assert_eq!(
                instance.execute_export("spin", &[]),
                Err(RuntimeError::InstructionBudgetExhausted)
            );
            assert_eq!(counter.get(), 0);

            // topping the meter up lets the instance run again
            counter.set(2);
            assert_eq!(
                instance.execute_export("spin", &[]),
                Err(RuntimeError::InstructionBudgetExhausted)
            );
        }
    }

    mod calls {
        use super::*;

        fn add_module() -> WasmModule {
            let mut module = WasmModule::new();
            let binary = module.signature(vec![ValueType::I32, ValueType::I32], vec![ValueType::I32]);
            let add = module.function(
                binary,
                vec![],
                Code::new()
                    .index(OpCode::LocalGet, 0)
                    .index(OpCode::LocalGet, 1)
                    .inst(OpCode::I32Add)
                    .into_bytes(),
            );
            module.export_function("add", add);
            let nullary = module.signature(vec![], vec![ValueType::I32]);
            let main = module.function(
                nullary,
                vec![],
                Code::new()
                    .i32_const(1000)
                    .i32_const(20)
                    .i32_const(22)
                    .index(OpCode::Call, add)
                    .inst(OpCode::I32Add)
                    .into_bytes(),
            );
            module.export_function("main", main);
            module
        }

        #[test]
        fn call_passes_params_and_result() {
            let mut instance = instantiate(&add_module());
            assert_eq!(instance.execute_export("main", &[]), Ok(Some(1042)));
            assert_eq!(
                instance.invoke("add", &[Value::I32(1), Value::I32(1)]),
                Ok(vec![Value::I32(2)])
            );
            assert_eq!(
                instance.invoke("add", &[Value::I32(1), Value::I32(-1)]),
                Ok(vec![Value::I32(0)])
            );
        }

        fn factorial_module() -> WasmModule {
            let mut module = WasmModule::new();
            let t = module.signature(vec![ValueType::I64], vec![ValueType::I64]);
            // fac(n) = n <= 1 ? 1 : n * fac(n - 1)
            let body = Code::new()
                .index(OpCode::LocalGet, 0)
                .i64_const(1)
                .inst(OpCode::I64LeS)
                .block(OpCode::If, Some(ValueType::I64))
                .i64_const(1)
                .inst(OpCode::Else)
                .index(OpCode::LocalGet, 0)
                .index(OpCode::LocalGet, 0)
                .i64_const(1)
                .inst(OpCode::I64Sub)
                .index(OpCode::Call, 0)
                .inst(OpCode::I64Mul)
                .inst(OpCode::End)
                .into_bytes();
            let fac = module.function(t, vec![], body);
            module.export_function("fac", fac);
            module
        }

        #[test]
        fn recursion() {
            let mut instance = instantiate(&factorial_module());
            assert_eq!(instance.invoke("fac", &[Value::I64(0)]), Ok(vec![Value::I64(1)]));
            assert_eq!(instance.invoke("fac", &[Value::I64(10)]), Ok(vec![Value::I64(3628800)]));
            assert_eq!(
                instance.invoke("fac", &[Value::I64(20)]),
                Ok(vec![Value::I64(2432902008176640000)])
            );
        }

        #[test]
        fn runaway_recursion_overflows_frames() {
            let mut module = WasmModule::new();
            let t = module.signature(vec![], vec![]);
            let f = module.function(t, vec![], Code::new().index(OpCode::Call, 0).into_bytes());
            module.export_function("f", f);
            let mut instance = Builder::new(parse(&module.encode()).unwrap())
                .config(VmConfig {
                    max_frames: 64,
                    ..VmConfig::default()
                })
                .build()
                .unwrap();
            assert_eq!(instance.execute_export("f", &[]), Err(RuntimeError::FrameOverflow));
            // the instance is usable again after the trap
            assert_eq!(instance.execute_export("f", &[]), Err(RuntimeError::FrameOverflow));
        }

        fn indirect_module() -> WasmModule {
            let mut module = WasmModule::new();
            let unary = module.signature(vec![ValueType::I32], vec![ValueType::I32]);
            let nullary = module.signature(vec![], vec![ValueType::I32]);
            let double = module.function(
                unary,
                vec![],
                Code::new()
                    .index(OpCode::LocalGet, 0)
                    .i32_const(2)
                    .inst(OpCode::I32Mul)
                    .into_bytes(),
            );
            let negate = module.function(
                unary,
                vec![],
                Code::new()
                    .i32_const(0)
                    .index(OpCode::LocalGet, 0)
                    .inst(OpCode::I32Sub)
                    .into_bytes(),
            );
            let constant = module.function(nullary, vec![], Code::new().i32_const(7).into_bytes());
            let binary = module.signature(vec![ValueType::I32, ValueType::I32], vec![ValueType::I32]);
            // dispatch(slot, x) = table[slot](x)
            let dispatch = module.function(
                binary,
                vec![],
                Code::new()
                    .index(OpCode::LocalGet, 1)
                    .index(OpCode::LocalGet, 0)
                    .call_indirect(unary)
                    .into_bytes(),
            );
            module.export_function("dispatch", dispatch);
            module.table(Limits { min: 4, max: None });
            module.element(0, vec![double, negate, constant]);
            module
        }

        #[test]
        fn call_indirect_through_table() {
            let mut instance = instantiate(&indirect_module());
            assert_eq!(
                instance.invoke("dispatch", &[Value::I32(0), Value::I32(21)]),
                Ok(vec![Value::I32(42)])
            );
            assert_eq!(
                instance.invoke("dispatch", &[Value::I32(1), Value::I32(21)]),
                Ok(vec![Value::I32(-21)])
            );
        }

        #[test]
        fn call_indirect_undefined_element() {
            let mut instance = instantiate(&indirect_module());
            // slot 3 exists but is empty, slot 9 is out of range
            assert_eq!(
                instance.invoke("dispatch", &[Value::I32(3), Value::I32(1)]),
                Err(RuntimeError::UndefinedElement(3))
            );
            assert_eq!(
                instance.invoke("dispatch", &[Value::I32(9), Value::I32(1)]),
                Err(RuntimeError::UndefinedElement(9))
            );
        }

        #[test]
        fn call_indirect_signature_checked_when_validating() {
            let module = parse(&indirect_module().encode()).unwrap();
            let mut instance = Builder::new(module).validate_function_type(true).build().unwrap();
            assert_eq!(
                instance.invoke("dispatch", &[Value::I32(2), Value::I32(1)]),
                Err(RuntimeError::SignatureMismatch)
            );
            assert_eq!(
                instance.invoke("dispatch", &[Value::I32(0), Value::I32(4)]),
                Ok(vec![Value::I32(8)])
            );
        }
    }

    mod host {
        use super::*;
        use crate::parser::module::FunctionType;

        fn host_module() -> WasmModule {
            let mut module = WasmModule::new();
            let unary = module.signature(vec![ValueType::I32], vec![ValueType::I32]);
            let nullary = module.signature(vec![], vec![ValueType::I32]);
            module.import_function("env", "triple", unary);
            let inner = module.function(nullary, vec![], Code::new().i32_const(5).into_bytes());
            module.export_function("inner", inner);
            let main = module.function(
                nullary,
                vec![],
                Code::new()
                    .i32_const(100)
                    .i32_const(4)
                    .index(OpCode::Call, 0)
                    .inst(OpCode::I32Add)
                    .into_bytes(),
            );
            module.export_function("main", main);
            module
        }

        fn triple_type() -> FunctionType {
            FunctionType::new(vec![ValueType::I32], vec![ValueType::I32])
        }

        #[test]
        fn host_function_called_inline() {
            let triple = HostFn::new("triple", triple_type(), |_: &mut ModuleInstance, args: &[i64]| {
                Ok(Some((args[0] as i32 * 3) as i64))
            });
            let module = parse(&host_module().encode()).unwrap();
            let mut instance = Builder::new(module).host_function(Rc::new(triple)).build().unwrap();
            assert_eq!(instance.invoke("main", &[]), Ok(vec![Value::I32(112)]));
        }

        #[test]
        fn host_function_reenters_instance() {
            let triple = HostFn::new("triple", triple_type(), |instance: &mut ModuleInstance, args: &[i64]| {
                let inner = instance.execute_export("inner", &[])?.unwrap_or(0);
                Ok(Some(args[0] * 3 + inner))
            });
            let module = parse(&host_module().encode()).unwrap();
            let mut instance = Builder::new(module).host_function(Rc::new(triple)).build().unwrap();
            assert_eq!(instance.invoke("main", &[]), Ok(vec![Value::I32(117)]));
            assert_eq!(instance.invoke("main", &[]), Ok(vec![Value::I32(117)]));
        }

        #[test]
        fn host_errors_propagate() {
            let failing = HostFn::new("triple", triple_type(), |_: &mut ModuleInstance, _: &[i64]| {
                Err(RuntimeError::Host("no".to_string()))
            });
            let module = parse(&host_module().encode()).unwrap();
            let mut instance = Builder::new(module).host_function(Rc::new(failing)).build().unwrap();
            assert_eq!(instance.invoke("main", &[]), Err(RuntimeError::Host("no".to_string())));
            assert_eq!(instance.invoke("inner", &[]), Ok(vec![Value::I32(5)]));
        }

        #[test]
        fn missing_host_result() {
            let silent = HostFn::new("triple", triple_type(), |_: &mut ModuleInstance, _: &[i64]| Ok(None));
            let module = parse(&host_module().encode()).unwrap();
            let mut instance = Builder::new(module).host_function(Rc::new(silent)).build().unwrap();
            assert_eq!(instance.invoke("main", &[]), Err(RuntimeError::MissingResult));
        }

        #[derive(Default)]
        struct Counts {
            frames: Rc<Cell<u32>>,
            exits: Rc<Cell<u32>>,
            hosts: Rc<Cell<u32>>,
        }

        impl Hook for Counts {
            fn on_new_frame(&mut self) -> Result<(), RuntimeError> {
                self.frames.set(self.frames.get() + 1);
                Ok(())
            }

            fn on_frame_exit(&mut self) -> Result<(), RuntimeError> {
                self.exits.set(self.exits.get() + 1);
                Ok(())
            }

            fn on_host_function(&mut self, name: &str) -> Result<(), RuntimeError> {
                assert_eq!(name, "triple");
                self.hosts.set(self.hosts.get() + 1);
                Ok(())
            }
        }

        #[test]
        fn hooks_observe_frames_and_hosts() {
            let counts = Counts::default();
            let (frames, exits, hosts) = (counts.frames.clone(), counts.exits.clone(), counts.hosts.clone());
            let triple = HostFn::new("triple", triple_type(), |_: &mut ModuleInstance, args: &[i64]| {
                Ok(Some(args[0] * 3))
            });
            let module = parse(&host_module().encode()).unwrap();
            let mut instance = Builder::new(module)
                .host_function(Rc::new(triple))
                .hook(Box::new(counts))
                .build()
                .unwrap();
            instance.invoke("main", &[]).unwrap();
            assert_eq!(frames.get(), 1);
            assert_eq!(exits.get(), 1);
            assert_eq!(hosts.get(), 1);
        }
    }
}
