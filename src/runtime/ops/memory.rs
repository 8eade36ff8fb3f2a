//! Memory operations for WebAssembly
//!
//! Loads and stores address memory with the popped base treated as unsigned 32-bit plus
//! the static offset immediate. Effective addresses above `i32::MAX` trap before the
//! bounds check.

use super::*;

const MAX_EFFECTIVE_ADDRESS: u64 = 0x7fff_ffff;

/// Pop the base address and add the static offset
#[inline]
fn effective_address(stack: &mut Stack, offset: u64) -> Result<u64, RuntimeError> {
    let base = stack.pop_i32()? as u32 as u64;
    let ea = base + offset;
    if ea > MAX_EFFECTIVE_ADDRESS {
        return Err(RuntimeError::MemoryAccessOverflow(ea));
    }
    Ok(ea)
}

// ============================================================================
// Loads
// ============================================================================

/// i32.load
pub fn i32_load(stack: &mut Stack, memory: &Memory, offset: u64) -> Result<(), RuntimeError> {
    let ea = effective_address(stack, offset)?;
    stack.push_i32(memory.read_u32(ea)? as i32)
}

/// i64.load
pub fn i64_load(stack: &mut Stack, memory: &Memory, offset: u64) -> Result<(), RuntimeError> {
    let ea = effective_address(stack, offset)?;
    stack.push_i64(memory.read_u64(ea)? as i64)
}

/// f32.load
pub fn f32_load(stack: &mut Stack, memory: &Memory, offset: u64) -> Result<(), RuntimeError> {
    let ea = effective_address(stack, offset)?;
    stack.push_f32(f32::from_bits(memory.read_u32(ea)?))
}

/// f64.load
pub fn f64_load(stack: &mut Stack, memory: &Memory, offset: u64) -> Result<(), RuntimeError> {
    let ea = effective_address(stack, offset)?;
    stack.push_f64(f64::from_bits(memory.read_u64(ea)?))
}

/// i32.load8_s
pub fn i32_load8_s(stack: &mut Stack, memory: &Memory, offset: u64) -> Result<(), RuntimeError> {
    let ea = effective_address(stack, offset)?;
    stack.push_i32(memory.read_u8(ea)? as i8 as i32)
}

/// i32.load8_u
pub fn i32_load8_u(stack: &mut Stack, memory: &Memory, offset: u64) -> Result<(), RuntimeError> {
    let ea = effective_address(stack, offset)?;
    stack.push_i32(memory.read_u8(ea)? as i32)
}

/// i32.load16_s
pub fn i32_load16_s(stack: &mut Stack, memory: &Memory, offset: u64) -> Result<(), RuntimeError> {
    let ea = effective_address(stack, offset)?;
    stack.push_i32(memory.read_u16(ea)? as i16 as i32)
}

/// i32.load16_u
pub fn i32_load16_u(stack: &mut Stack, memory: &Memory, offset: u64) -> Result<(), RuntimeError> {
    let ea = effective_address(stack, offset)?;
    stack.push_i32(memory.read_u16(ea)? as i32)
}

/// i64.load8_s
pub fn i64_load8_s(stack: &mut Stack, memory: &Memory, offset: u64) -> Result<(), RuntimeError> {
    let ea = effective_address(stack, offset)?;
    stack.push_i64(memory.read_u8(ea)? as i8 as i64)
}

/// i64.load8_u
pub fn i64_load8_u(stack: &mut Stack, memory: &Memory, offset: u64) -> Result<(), RuntimeError> {
    let ea = effective_address(stack, offset)?;
    stack.push_i64(memory.read_u8(ea)? as i64)
}

/// i64.load16_s
pub fn i64_load16_s(stack: &mut Stack, memory: &Memory, offset: u64) -> Result<(), RuntimeError> {
    let ea = effective_address(stack, offset)?;
    stack.push_i64(memory.read_u16(ea)? as i16 as i64)
}

/// i64.load16_u
pub fn i64_load16_u(stack: &mut Stack, memory: &Memory, offset: u64) -> Result<(), RuntimeError> {
    let ea = effective_address(stack, offset)?;
    stack.push_i64(memory.read_u16(ea)? as i64)
}

/// i64.load32_s
pub fn i64_load32_s(stack: &mut Stack, memory: &Memory, offset: u64) -> Result<(), RuntimeError> {
    let ea = effective_address(stack, offset)?;
    stack.push_i64(memory.read_u32(ea)? as i32 as i64)
}

/// i64.load32_u
pub fn i64_load32_u(stack: &mut Stack, memory: &Memory, offset: u64) -> Result<(), RuntimeError> {
    let ea = effective_address(stack, offset)?;
    stack.push_i64(memory.read_u32(ea)? as i64)
}

// ============================================================================
// Stores
// ============================================================================

/// i32.store
pub fn i32_store(stack: &mut Stack, memory: &mut Memory, offset: u64) -> Result<(), RuntimeError> {
    let value = stack.pop_i32()?;
    let ea = effective_address(stack, offset)?;
    memory.write_u32(ea, value as u32)
}

/// i64.store
pub fn i64_store(stack: &mut Stack, memory: &mut Memory, offset: u64) -> Result<(), RuntimeError> {
    let value = stack.pop_i64()?;
    let ea = effective_address(stack, offset)?;
    memory.write_u64(ea, value as u64)
}

/// f32.store
pub fn f32_store(stack: &mut Stack, memory: &mut Memory, offset: u64) -> Result<(), RuntimeError> {
    let value = stack.pop_f32()?;
    let ea = effective_address(stack, offset)?;
    memory.write_u32(ea, value.to_bits())
}

/// f64.store
pub fn f64_store(stack: &mut Stack, memory: &mut Memory, offset: u64) -> Result<(), RuntimeError> {
    let value = stack.pop_f64()?;
    let ea = effective_address(stack, offset)?;
    memory.write_u64(ea, value.to_bits())
}

/// i32.store8
pub fn i32_store8(stack: &mut Stack, memory: &mut Memory, offset: u64) -> Result<(), RuntimeError> {
    let value = stack.pop_i32()?;
    let ea = effective_address(stack, offset)?;
    memory.write_u8(ea, value as u8)
}

/// i32.store16
pub fn i32_store16(stack: &mut Stack, memory: &mut Memory, offset: u64) -> Result<(), RuntimeError> {
    let value = stack.pop_i32()?;
    let ea = effective_address(stack, offset)?;
    memory.write_u16(ea, value as u16)
}

/// i64.store8
pub fn i64_store8(stack: &mut Stack, memory: &mut Memory, offset: u64) -> Result<(), RuntimeError> {
    let value = stack.pop_i64()?;
    let ea = effective_address(stack, offset)?;
    memory.write_u8(ea, value as u8)
}

/// i64.store16
pub fn i64_store16(stack: &mut Stack, memory: &mut Memory, offset: u64) -> Result<(), RuntimeError> {
    let value = stack.pop_i64()?;
    let ea = effective_address(stack, offset)?;
    memory.write_u16(ea, value as u16)
}

/// i64.store32
pub fn i64_store32(stack: &mut Stack, memory: &mut Memory, offset: u64) -> Result<(), RuntimeError> {
    let value = stack.pop_i64()?;
    let ea = effective_address(stack, offset)?;
    memory.write_u32(ea, value as u32)
}

// ============================================================================
// Size and Growth
// ============================================================================

/// memory.size
pub fn memory_size(stack: &mut Stack, memory: &Memory) -> Result<(), RuntimeError> {
    stack.push_i32(memory.pages() as i32)
}

/// memory.grow
/// Pushes and returns the previous page count, or -1 if the grow was refused.
pub fn memory_grow(stack: &mut Stack, memory: &mut Memory) -> Result<i32, RuntimeError> {
    let delta = stack.pop_i32()? as u32;
    let result = memory.grow(delta);
    if result < 0 {
        log::warn!(
            "memory.grow by {} pages refused at {} pages (max {:?})",
            delta,
            memory.pages(),
            memory.max_pages()
        );
    }
    stack.push_i32(result)?;
    Ok(result)
}

#[cfg(test)]
mod tests {
    use crate::parser::module::{Limits, ValueType};
    use crate::parser::opcode::OpCode;
    use crate::runtime::test_utils::test::ExecutorTest;
    use crate::runtime::{RuntimeError, Value};

    #[test]
    fn store_then_load() {
        ExecutorTest::new()
            .with_memory()
            .i32_const(8)
            .i32_const(0x1234_5678)
            .mem(OpCode::I32Store, 0)
            .i32_const(0)
            .mem(OpCode::I32Load, 8)
            .returns(vec![ValueType::I32])
            .expect_stack(vec![Value::I32(0x1234_5678)]);
    }

    #[test]
    fn little_endian_layout() {
        ExecutorTest::new()
            .with_memory()
            .i32_const(0)
            .i32_const(0x1234_5678)
            .mem(OpCode::I32Store, 0)
            .i32_const(0)
            .mem(OpCode::I32Load8U, 0)
            .returns(vec![ValueType::I32])
            .expect_stack(vec![Value::I32(0x78)]);
    }

    fn load_after_i32_store16(value: i32, load: OpCode) -> ExecutorTest {
        ExecutorTest::new()
            .with_memory()
            .i32_const(0)
            .i32_const(value)
            .mem(OpCode::I32Store16, 0)
            .i32_const(0)
            .mem(load, 0)
            .returns(vec![ValueType::I32])
    }

    fn load_after_i64_store32(value: i64, load: OpCode) -> ExecutorTest {
        ExecutorTest::new()
            .with_memory()
            .i32_const(16)
            .i64_const(value)
            .mem(OpCode::I64Store32, 0)
            .i32_const(16)
            .mem(load, 0)
            .returns(vec![ValueType::I64])
    }

    #[test]
    fn sub_word_extension() {
        load_after_i32_store16(0xff80, OpCode::I32Load8S).expect_stack(vec![Value::I32(-128)]);
        load_after_i32_store16(0xff80, OpCode::I32Load8U).expect_stack(vec![Value::I32(0x80)]);
        load_after_i32_store16(0xff80, OpCode::I32Load16S).expect_stack(vec![Value::I32(-128)]);
        load_after_i32_store16(0xff80, OpCode::I32Load16U).expect_stack(vec![Value::I32(0xff80)]);

        load_after_i64_store32(-2, OpCode::I64Load32S).expect_stack(vec![Value::I64(-2)]);
        load_after_i64_store32(-2, OpCode::I64Load32U).expect_stack(vec![Value::I64(0xffff_fffe)]);
        load_after_i64_store32(-2, OpCode::I64Load8S).expect_stack(vec![Value::I64(-2)]);
        load_after_i64_store32(-2, OpCode::I64Load8U).expect_stack(vec![Value::I64(0xfe)]);
        load_after_i64_store32(-2, OpCode::I64Load16S).expect_stack(vec![Value::I64(-2)]);
        load_after_i64_store32(-2, OpCode::I64Load16U).expect_stack(vec![Value::I64(0xfffe)]);
    }

    #[test]
    fn stores_truncate() {
        ExecutorTest::new()
            .with_memory()
            .i32_const(0)
            .i32_const(-1)
            .mem(OpCode::I32Store, 0)
            .i32_const(1)
            .i64_const(0x1_0000_0000)
            .mem(OpCode::I64Store8, 0)
            .i32_const(0)
            .mem(OpCode::I32Load, 0)
            .returns(vec![ValueType::I32])
            .expect_stack(vec![Value::I32(0xffff_00ffu32 as i32)]);
    }

    #[test]
    fn float_round_trip() {
        ExecutorTest::new()
            .with_memory()
            .i32_const(0)
            .f64_const(-1.25)
            .mem(OpCode::F64Store, 0)
            .i32_const(0)
            .mem(OpCode::F64Load, 0)
            .returns(vec![ValueType::F64])
            .expect_stack(vec![Value::F64(-1.25)]);
        ExecutorTest::new()
            .with_memory()
            .i32_const(8)
            .f32_const(3.5)
            .mem(OpCode::F32Store, 0)
            .i32_const(4)
            .mem(OpCode::F32Load, 4)
            .returns(vec![ValueType::F32])
            .expect_stack(vec![Value::F32(3.5)]);
        ExecutorTest::new()
            .with_memory()
            .i32_const(0)
            .i64_const(-1)
            .mem(OpCode::I64Store, 0)
            .i32_const(0)
            .mem(OpCode::I64Load, 0)
            .returns(vec![ValueType::I64])
            .expect_stack(vec![Value::I64(-1)]);
    }

    #[test]
    fn out_of_bounds() {
        ExecutorTest::new()
            .with_memory()
            .i32_const(65533)
            .mem(OpCode::I32Load, 0)
            .returns(vec![ValueType::I32])
            .expect_trap(RuntimeError::MemoryAccessOverflow(65533));
        ExecutorTest::new()
            .with_memory()
            .i32_const(65532)
            .mem(OpCode::I32Load, 0)
            .returns(vec![ValueType::I32])
            .expect_stack(vec![Value::I32(0)]);
        ExecutorTest::new()
            .i32_const(0)
            .i32_const(1)
            .mem(OpCode::I32Store8, 0)
            .expect_trap(RuntimeError::MemoryAccessOverflow(0));
    }

    #[test]
    fn effective_address_limit() {
        ExecutorTest::new()
            .with_memory()
            .i32_const(-1)
            .mem(OpCode::I32Load8U, 1)
            .returns(vec![ValueType::I32])
            .expect_trap(RuntimeError::MemoryAccessOverflow(0x1_0000_0000));
        ExecutorTest::new()
            .with_memory()
            .i32_const(0x7fff_fff0)
            .mem(OpCode::I64Load, 0x10)
            .returns(vec![ValueType::I64])
            .expect_error("out of bounds memory access");
    }

    fn bounded(max: u32) -> ExecutorTest {
        ExecutorTest::new().memory(Limits { min: 1, max: Some(max) })
    }

    #[test]
    fn size_and_grow() {
        bounded(2)
            .i32_const(1)
            .inst(OpCode::MemoryGrow)
            .returns(vec![ValueType::I32])
            .expect_stack(vec![Value::I32(1)]);
        bounded(2)
            .i32_const(1)
            .inst(OpCode::MemoryGrow)
            .inst(OpCode::Drop)
            .inst(OpCode::MemorySize)
            .returns(vec![ValueType::I32])
            .expect_stack(vec![Value::I32(2)]);
    }

    #[test]
    fn grow_past_max_is_refused() {
        bounded(1)
            .i32_const(1)
            .inst(OpCode::MemoryGrow)
            .returns(vec![ValueType::I32])
            .expect_stack(vec![Value::I32(-1)]);
        bounded(1)
            .i32_const(1)
            .inst(OpCode::MemoryGrow)
            .inst(OpCode::Drop)
            .inst(OpCode::MemorySize)
            .returns(vec![ValueType::I32])
            .expect_stack(vec![Value::I32(1)]);
        bounded(3)
            .i32_const(-1)
            .inst(OpCode::MemoryGrow)
            .returns(vec![ValueType::I32])
            .expect_stack(vec![Value::I32(-1)]);
    }

    #[test]
    fn grown_pages_are_zeroed_and_usable() {
        ExecutorTest::new()
            .memory(Limits { min: 0, max: None })
            .i32_const(1)
            .inst(OpCode::MemoryGrow)
            .inst(OpCode::Drop)
            .i32_const(65535)
            .mem(OpCode::I32Load8U, 0)
            .returns(vec![ValueType::I32])
            .expect_stack(vec![Value::I32(0)]);
    }
}
