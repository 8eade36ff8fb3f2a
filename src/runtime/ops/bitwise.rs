//! Bitwise operations for WebAssembly
//!
//! Shift and rotate counts are taken modulo the operand width.

use super::*;

// ============================================================================
// Bit Counting
// ============================================================================

/// i32.clz
pub fn i32_clz(stack: &mut Stack) -> Result<(), RuntimeError> {
    let c = stack.pop_i32()?;
    stack.push_i32(c.leading_zeros() as i32)
}

/// i32.ctz
pub fn i32_ctz(stack: &mut Stack) -> Result<(), RuntimeError> {
    let c = stack.pop_i32()?;
    stack.push_i32(c.trailing_zeros() as i32)
}

/// i32.popcnt
pub fn i32_popcnt(stack: &mut Stack) -> Result<(), RuntimeError> {
    let c = stack.pop_i32()?;
    stack.push_i32(c.count_ones() as i32)
}

/// i64.clz
pub fn i64_clz(stack: &mut Stack) -> Result<(), RuntimeError> {
    let c = stack.pop_i64()?;
    stack.push_i64(c.leading_zeros() as i64)
}

/// i64.ctz
pub fn i64_ctz(stack: &mut Stack) -> Result<(), RuntimeError> {
    let c = stack.pop_i64()?;
    stack.push_i64(c.trailing_zeros() as i64)
}

/// i64.popcnt
pub fn i64_popcnt(stack: &mut Stack) -> Result<(), RuntimeError> {
    let c = stack.pop_i64()?;
    stack.push_i64(c.count_ones() as i64)
}

// ============================================================================
// Logical Operations
// ============================================================================

/// i32.and
pub fn i32_and(stack: &mut Stack) -> Result<(), RuntimeError> {
    let c2 = stack.pop_i32()?;
    let c1 = stack.pop_i32()?;
    stack.push_i32(c1 & c2)
}

/// i32.or
pub fn i32_or(stack: &mut Stack) -> Result<(), RuntimeError> {
    let c2 = stack.pop_i32()?;
    let c1 = stack.pop_i32()?;
    stack.push_i32(c1 | c2)
}

/// i32.xor
pub fn i32_xor(stack: &mut Stack) -> Result<(), RuntimeError> {
    let c2 = stack.pop_i32()?;
    let c1 = stack.pop_i32()?;
    stack.push_i32(c1 ^ c2)
}

/// i64.and
pub fn i64_and(stack: &mut Stack) -> Result<(), RuntimeError> {
    let c2 = stack.pop_i64()?;
    let c1 = stack.pop_i64()?;
    stack.push_i64(c1 & c2)
}

/// i64.or
pub fn i64_or(stack: &mut Stack) -> Result<(), RuntimeError> {
    let c2 = stack.pop_i64()?;
    let c1 = stack.pop_i64()?;
    stack.push_i64(c1 | c2)
}

/// i64.xor
pub fn i64_xor(stack: &mut Stack) -> Result<(), RuntimeError> {
    let c2 = stack.pop_i64()?;
    let c1 = stack.pop_i64()?;
    stack.push_i64(c1 ^ c2)
}

// ============================================================================
// Shifts and Rotations
// ============================================================================

/// i32.shl
pub fn i32_shl(stack: &mut Stack) -> Result<(), RuntimeError> {
    let c2 = stack.pop_i32()? as u32;
    let c1 = stack.pop_i32()?;
    stack.push_i32(c1.wrapping_shl(c2 % 32))
}

/// i32.shr_s
pub fn i32_shr_s(stack: &mut Stack) -> Result<(), RuntimeError> {
    let c2 = stack.pop_i32()? as u32;
    let c1 = stack.pop_i32()?;
    stack.push_i32(c1.wrapping_shr(c2 % 32))
}

/// i32.shr_u
pub fn i32_shr_u(stack: &mut Stack) -> Result<(), RuntimeError> {
    let c2 = stack.pop_i32()? as u32;
    let c1 = stack.pop_i32()? as u32;
    stack.push_i32(c1.wrapping_shr(c2 % 32) as i32)
}

/// i32.rotl
pub fn i32_rotl(stack: &mut Stack) -> Result<(), RuntimeError> {
    let c2 = stack.pop_i32()? as u32;
    let c1 = stack.pop_i32()?;
    stack.push_i32(c1.rotate_left(c2 % 32))
}

/// i32.rotr
pub fn i32_rotr(stack: &mut Stack) -> Result<(), RuntimeError> {
    let c2 = stack.pop_i32()? as u32;
    let c1 = stack.pop_i32()?;
    stack.push_i32(c1.rotate_right(c2 % 32))
}

/// i64.shl
pub fn i64_shl(stack: &mut Stack) -> Result<(), RuntimeError> {
    let c2 = stack.pop_i64()? as u64;
    let c1 = stack.pop_i64()?;
    stack.push_i64(c1.wrapping_shl((c2 % 64) as u32))
}

/// i64.shr_s
pub fn i64_shr_s(stack: &mut Stack) -> Result<(), RuntimeError> {
    let c2 = stack.pop_i64()? as u64;
    let c1 = stack.pop_i64()?;
    stack.push_i64(c1.wrapping_shr((c2 % 64) as u32))
}

/// i64.shr_u
pub fn i64_shr_u(stack: &mut Stack) -> Result<(), RuntimeError> {
    let c2 = stack.pop_i64()? as u64;
    let c1 = stack.pop_i64()? as u64;
    stack.push_i64(c1.wrapping_shr((c2 % 64) as u32) as i64)
}

/// i64.rotl
pub fn i64_rotl(stack: &mut Stack) -> Result<(), RuntimeError> {
    let c2 = stack.pop_i64()? as u64;
    let c1 = stack.pop_i64()?;
    stack.push_i64(c1.rotate_left((c2 % 64) as u32))
}

/// i64.rotr
pub fn i64_rotr(stack: &mut Stack) -> Result<(), RuntimeError> {
    let c2 = stack.pop_i64()? as u64;
    let c1 = stack.pop_i64()?;
    stack.push_i64(c1.rotate_right((c2 % 64) as u32))
}
