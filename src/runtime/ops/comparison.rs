//! Comparison operations for WebAssembly
//!
//! Every comparison pushes an i32 boolean. Float comparisons involving NaN are false,
//! except `ne` which is true.

use super::*;

// ============================================================================
// Integer Comparisons
// ============================================================================

/// i32.eqz
pub fn i32_eqz(stack: &mut Stack) -> Result<(), RuntimeError> {
    let c = stack.pop_i32()?;
    stack.push_bool(c == 0)
}

fn i32_cmp(stack: &mut Stack, cmp: fn(i32, i32) -> bool) -> Result<(), RuntimeError> {
    let c2 = stack.pop_i32()?;
    let c1 = stack.pop_i32()?;
    stack.push_bool(cmp(c1, c2))
}

fn u32_cmp(stack: &mut Stack, cmp: fn(u32, u32) -> bool) -> Result<(), RuntimeError> {
    let c2 = stack.pop_i32()? as u32;
    let c1 = stack.pop_i32()? as u32;
    stack.push_bool(cmp(c1, c2))
}

/// i32.eq
pub fn i32_eq(stack: &mut Stack) -> Result<(), RuntimeError> {
    i32_cmp(stack, |a, b| a == b)
}

/// i32.ne
pub fn i32_ne(stack: &mut Stack) -> Result<(), RuntimeError> {
    i32_cmp(stack, |a, b| a != b)
}

/// i32.lt_s
pub fn i32_lt_s(stack: &mut Stack) -> Result<(), RuntimeError> {
    i32_cmp(stack, |a, b| a < b)
}

/// i32.lt_u
pub fn i32_lt_u(stack: &mut Stack) -> Result<(), RuntimeError> {
    u32_cmp(stack, |a, b| a < b)
}

/// i32.gt_s
pub fn i32_gt_s(stack: &mut Stack) -> Result<(), RuntimeError> {
    i32_cmp(stack, |a, b| a > b)
}

/// i32.gt_u
pub fn i32_gt_u(stack: &mut Stack) -> Result<(), RuntimeError> {
    u32_cmp(stack, |a, b| a > b)
}

/// i32.le_s
pub fn i32_le_s(stack: &mut Stack) -> Result<(), RuntimeError> {
    i32_cmp(stack, |a, b| a <= b)
}

/// i32.le_u
pub fn i32_le_u(stack: &mut Stack) -> Result<(), RuntimeError> {
    u32_cmp(stack, |a, b| a <= b)
}

/// i32.ge_s
pub fn i32_ge_s(stack: &mut Stack) -> Result<(), RuntimeError> {
    i32_cmp(stack, |a, b| a >= b)
}

/// i32.ge_u
pub fn i32_ge_u(stack: &mut Stack) -> Result<(), RuntimeError> {
    u32_cmp(stack, |a, b| a >= b)
}

/// i64.eqz
pub fn i64_eqz(stack: &mut Stack) -> Result<(), RuntimeError> {
    let c = stack.pop_i64()?;
    stack.push_bool(c == 0)
}

fn i64_cmp(stack: &mut Stack, cmp: fn(i64, i64) -> bool) -> Result<(), RuntimeError> {
    let c2 = stack.pop_i64()?;
    let c1 = stack.pop_i64()?;
    stack.push_bool(cmp(c1, c2))
}

fn u64_cmp(stack: &mut Stack, cmp: fn(u64, u64) -> bool) -> Result<(), RuntimeError> {
    let c2 = stack.pop_i64()? as u64;
    let c1 = stack.pop_i64()? as u64;
    stack.push_bool(cmp(c1, c2))
}

/// i64.eq
pub fn i64_eq(stack: &mut Stack) -> Result<(), RuntimeError> {
    i64_cmp(stack, |a, b| a == b)
}

/// i64.ne
pub fn i64_ne(stack: &mut Stack) -> Result<(), RuntimeError> {
    i64_cmp(stack, |a, b| a != b)
}

/// i64.lt_s
pub fn i64_lt_s(stack: &mut Stack) -> Result<(), RuntimeError> {
    i64_cmp(stack, |a, b| a < b)
}

/// i64.lt_u
pub fn i64_lt_u(stack: &mut Stack) -> Result<(), RuntimeError> {
    u64_cmp(stack, |a, b| a < b)
}

/// i64.gt_s
pub fn i64_gt_s(stack: &mut Stack) -> Result<(), RuntimeError> {
    i64_cmp(stack, |a, b| a > b)
}

/// i64.gt_u
pub fn i64_gt_u(stack: &mut Stack) -> Result<(), RuntimeError> {
    u64_cmp(stack, |a, b| a > b)
}

/// i64.le_s
pub fn i64_le_s(stack: &mut Stack) -> Result<(), RuntimeError> {
    i64_cmp(stack, |a, b| a <= b)
}

/// i64.le_u
pub fn i64_le_u(stack: &mut Stack) -> Result<(), RuntimeError> {
    u64_cmp(stack, |a, b| a <= b)
}

/// i64.ge_s
pub fn i64_ge_s(stack: &mut Stack) -> Result<(), RuntimeError> {
    i64_cmp(stack, |a, b| a >= b)
}

/// i64.ge_u
pub fn i64_ge_u(stack: &mut Stack) -> Result<(), RuntimeError> {
    u64_cmp(stack, |a, b| a >= b)
}

// ============================================================================
// Float Comparisons
// ============================================================================

fn f32_cmp(stack: &mut Stack, cmp: fn(f32, f32) -> bool) -> Result<(), RuntimeError> {
    let c2 = stack.pop_f32()?;
    let c1 = stack.pop_f32()?;
    stack.push_bool(cmp(c1, c2))
}

fn f64_cmp(stack: &mut Stack, cmp: fn(f64, f64) -> bool) -> Result<(), RuntimeError> {
    let c2 = stack.pop_f64()?;
    let c1 = stack.pop_f64()?;
    stack.push_bool(cmp(c1, c2))
}

/// f32.eq
pub fn f32_eq(stack: &mut Stack) -> Result<(), RuntimeError> {
    f32_cmp(stack, |a, b| a == b)
}

/// f32.ne
pub fn f32_ne(stack: &mut Stack) -> Result<(), RuntimeError> {
    f32_cmp(stack, |a, b| a != b)
}

/// f32.lt
pub fn f32_lt(stack: &mut Stack) -> Result<(), RuntimeError> {
    f32_cmp(stack, |a, b| a < b)
}

/// f32.gt
pub fn f32_gt(stack: &mut Stack) -> Result<(), RuntimeError> {
    f32_cmp(stack, |a, b| a > b)
}

/// f32.le
pub fn f32_le(stack: &mut Stack) -> Result<(), RuntimeError> {
    f32_cmp(stack, |a, b| a <= b)
}

/// f32.ge
pub fn f32_ge(stack: &mut Stack) -> Result<(), RuntimeError> {
    f32_cmp(stack, |a, b| a >= b)
}

/// f64.eq
pub fn f64_eq(stack: &mut Stack) -> Result<(), RuntimeError> {
    f64_cmp(stack, |a, b| a == b)
}

/// f64.ne
pub fn f64_ne(stack: &mut Stack) -> Result<(), RuntimeError> {
    f64_cmp(stack, |a, b| a != b)
}

/// f64.lt
pub fn f64_lt(stack: &mut Stack) -> Result<(), RuntimeError> {
    f64_cmp(stack, |a, b| a < b)
}

/// f64.gt
pub fn f64_gt(stack: &mut Stack) -> Result<(), RuntimeError> {
    f64_cmp(stack, |a, b| a > b)
}

/// f64.le
pub fn f64_le(stack: &mut Stack) -> Result<(), RuntimeError> {
    f64_cmp(stack, |a, b| a <= b)
}

/// f64.ge
pub fn f64_ge(stack: &mut Stack) -> Result<(), RuntimeError> {
    f64_cmp(stack, |a, b| a >= b)
}
