//! Numeric operations for WebAssembly
//!
//! Arithmetic on the four value types:
//! - Integer add/sub/mul wrap modulo 2^N
//! - Signed division traps on a zero divisor and on MIN / -1; remainder only on zero
//! - Float ops are IEEE-754 binary32/binary64 with WebAssembly's NaN-propagating min/max

use super::*;

// ============================================================================
// Integer Binary Operations
// ============================================================================

/// i32.add
pub fn i32_add(stack: &mut Stack) -> Result<(), RuntimeError> {
    let c2 = stack.pop_i32()?;
    let c1 = stack.pop_i32()?;
    stack.push_i32(c1.wrapping_add(c2))
}

/// i32.sub
pub fn i32_sub(stack: &mut Stack) -> Result<(), RuntimeError> {
    let c2 = stack.pop_i32()?;
    let c1 = stack.pop_i32()?;
    stack.push_i32(c1.wrapping_sub(c2))
}

/// i32.mul
pub fn i32_mul(stack: &mut Stack) -> Result<(), RuntimeError> {
    let c2 = stack.pop_i32()?;
    let c1 = stack.pop_i32()?;
    stack.push_i32(c1.wrapping_mul(c2))
}

/// i32.div_s
/// Traps on a zero divisor, and on INT32_MIN / -1 whose result 2^31 does not fit.
pub fn i32_div_s(stack: &mut Stack) -> Result<(), RuntimeError> {
    let c2 = stack.pop_i32()?;
    let c1 = stack.pop_i32()?;
    if c2 == 0 {
        return Err(RuntimeError::DivideByZero);
    }
    if c1 == i32::MIN && c2 == -1 {
        return Err(RuntimeError::IntegerOverflow);
    }
    stack.push_i32(c1 / c2)
}

/// i32.div_u
pub fn i32_div_u(stack: &mut Stack) -> Result<(), RuntimeError> {
    let c2 = stack.pop_i32()? as u32;
    let c1 = stack.pop_i32()? as u32;
    if c2 == 0 {
        return Err(RuntimeError::DivideByZero);
    }
    stack.push_i32((c1 / c2) as i32)
}

/// i32.rem_s
/// INT32_MIN rem -1 is 0, not a trap.
pub fn i32_rem_s(stack: &mut Stack) -> Result<(), RuntimeError> {
    let c2 = stack.pop_i32()?;
    let c1 = stack.pop_i32()?;
    if c2 == 0 {
        return Err(RuntimeError::DivideByZero);
    }
    stack.push_i32(c1.wrapping_rem(c2))
}

/// i32.rem_u
pub fn i32_rem_u(stack: &mut Stack) -> Result<(), RuntimeError> {
    let c2 = stack.pop_i32()? as u32;
    let c1 = stack.pop_i32()? as u32;
    if c2 == 0 {
        return Err(RuntimeError::DivideByZero);
    }
    stack.push_i32((c1 % c2) as i32)
}

/// i64.add
pub fn i64_add(stack: &mut Stack) -> Result<(), RuntimeError> {
    let c2 = stack.pop_i64()?;
    let c1 = stack.pop_i64()?;
    stack.push_i64(c1.wrapping_add(c2))
}

/// i64.sub
pub fn i64_sub(stack: &mut Stack) -> Result<(), RuntimeError> {
    let c2 = stack.pop_i64()?;
    let c1 = stack.pop_i64()?;
    stack.push_i64(c1.wrapping_sub(c2))
}

/// i64.mul
pub fn i64_mul(stack: &mut Stack) -> Result<(), RuntimeError> {
    let c2 = stack.pop_i64()?;
    let c1 = stack.pop_i64()?;
    stack.push_i64(c1.wrapping_mul(c2))
}

/// i64.div_s
pub fn i64_div_s(stack: &mut Stack) -> Result<(), RuntimeError> {
    let c2 = stack.pop_i64()?;
    let c1 = stack.pop_i64()?;
    if c2 == 0 {
        return Err(RuntimeError::DivideByZero);
    }
    if c1 == i64::MIN && c2 == -1 {
        return Err(RuntimeError::IntegerOverflow);
    }
    stack.push_i64(c1 / c2)
}

/// i64.div_u
pub fn i64_div_u(stack: &mut Stack) -> Result<(), RuntimeError> {
    let c2 = stack.pop_i64()? as u64;
    let c1 = stack.pop_i64()? as u64;
    if c2 == 0 {
        return Err(RuntimeError::DivideByZero);
    }
    stack.push_i64((c1 / c2) as i64)
}

/// i64.rem_s
pub fn i64_rem_s(stack: &mut Stack) -> Result<(), RuntimeError> {
    let c2 = stack.pop_i64()?;
    let c1 = stack.pop_i64()?;
    if c2 == 0 {
        return Err(RuntimeError::DivideByZero);
    }
    stack.push_i64(c1.wrapping_rem(c2))
}

/// i64.rem_u
pub fn i64_rem_u(stack: &mut Stack) -> Result<(), RuntimeError> {
    let c2 = stack.pop_i64()? as u64;
    let c1 = stack.pop_i64()? as u64;
    if c2 == 0 {
        return Err(RuntimeError::DivideByZero);
    }
    stack.push_i64((c1 % c2) as i64)
}

// ============================================================================
// Float Unary Operations
// ============================================================================

fn f32_unop(stack: &mut Stack, op: fn(f32) -> f32) -> Result<(), RuntimeError> {
    let c = stack.pop_f32()?;
    stack.push_f32(op(c))
}

fn f64_unop(stack: &mut Stack, op: fn(f64) -> f64) -> Result<(), RuntimeError> {
    let c = stack.pop_f64()?;
    stack.push_f64(op(c))
}

/// f32.abs
pub fn f32_abs(stack: &mut Stack) -> Result<(), RuntimeError> {
    f32_unop(stack, f32::abs)
}

/// f32.neg
pub fn f32_neg(stack: &mut Stack) -> Result<(), RuntimeError> {
    f32_unop(stack, |c| -c)
}

/// f32.ceil
pub fn f32_ceil(stack: &mut Stack) -> Result<(), RuntimeError> {
    f32_unop(stack, f32::ceil)
}

/// f32.floor
pub fn f32_floor(stack: &mut Stack) -> Result<(), RuntimeError> {
    f32_unop(stack, f32::floor)
}

/// f32.trunc
pub fn f32_trunc(stack: &mut Stack) -> Result<(), RuntimeError> {
    f32_unop(stack, f32::trunc)
}

/// f32.nearest
/// Round to nearest, ties to even.
pub fn f32_nearest(stack: &mut Stack) -> Result<(), RuntimeError> {
    f32_unop(stack, f32::round_ties_even)
}

/// f32.sqrt
pub fn f32_sqrt(stack: &mut Stack) -> Result<(), RuntimeError> {
    f32_unop(stack, f32::sqrt)
}

/// f64.abs
pub fn f64_abs(stack: &mut Stack) -> Result<(), RuntimeError> {
    f64_unop(stack, f64::abs)
}

/// f64.neg
pub fn f64_neg(stack: &mut Stack) -> Result<(), RuntimeError> {
    f64_unop(stack, |c| -c)
}

/// f64.ceil
pub fn f64_ceil(stack: &mut Stack) -> Result<(), RuntimeError> {
    f64_unop(stack, f64::ceil)
}

/// f64.floor
pub fn f64_floor(stack: &mut Stack) -> Result<(), RuntimeError> {
    f64_unop(stack, f64::floor)
}

/// f64.trunc
pub fn f64_trunc(stack: &mut Stack) -> Result<(), RuntimeError> {
    f64_unop(stack, f64::trunc)
}

/// f64.nearest
pub fn f64_nearest(stack: &mut Stack) -> Result<(), RuntimeError> {
    f64_unop(stack, f64::round_ties_even)
}

/// f64.sqrt
pub fn f64_sqrt(stack: &mut Stack) -> Result<(), RuntimeError> {
    f64_unop(stack, f64::sqrt)
}

// ============================================================================
// Float Binary Operations
// ============================================================================

fn f32_binop(stack: &mut Stack, op: fn(f32, f32) -> f32) -> Result<(), RuntimeError> {
    let c2 = stack.pop_f32()?;
    let c1 = stack.pop_f32()?;
    stack.push_f32(op(c1, c2))
}

fn f64_binop(stack: &mut Stack, op: fn(f64, f64) -> f64) -> Result<(), RuntimeError> {
    let c2 = stack.pop_f64()?;
    let c1 = stack.pop_f64()?;
    stack.push_f64(op(c1, c2))
}

// NaN in, NaN out; -0 orders below +0
fn wasm_min_f32(a: f32, b: f32) -> f32 {
    if a.is_nan() || b.is_nan() {
        a + b
    } else if a == b {
        if a.is_sign_negative() {
            a
        } else {
            b
        }
    } else {
        a.min(b)
    }
}

fn wasm_max_f32(a: f32, b: f32) -> f32 {
    if a.is_nan() || b.is_nan() {
        a + b
    } else if a == b {
        if a.is_sign_positive() {
            a
        } else {
            b
        }
    } else {
        a.max(b)
    }
}

fn wasm_min_f64(a: f64, b: f64) -> f64 {
    if a.is_nan() || b.is_nan() {
        a + b
    } else if a == b {
        if a.is_sign_negative() {
            a
        } else {
            b
        }
    } else {
        a.min(b)
    }
}

fn wasm_max_f64(a: f64, b: f64) -> f64 {
    if a.is_nan() || b.is_nan() {
        a + b
    } else if a == b {
        if a.is_sign_positive() {
            a
        } else {
            b
        }
    } else {
        a.max(b)
    }
}

/// f32.add
pub fn f32_add(stack: &mut Stack) -> Result<(), RuntimeError> {
    f32_binop(stack, |a, b| a + b)
}

/// f32.sub
pub fn f32_sub(stack: &mut Stack) -> Result<(), RuntimeError> {
    f32_binop(stack, |a, b| a - b)
}

/// f32.mul
pub fn f32_mul(stack: &mut Stack) -> Result<(), RuntimeError> {
    f32_binop(stack, |a, b| a * b)
}

/// f32.div
pub fn f32_div(stack: &mut Stack) -> Result<(), RuntimeError> {
    f32_binop(stack, |a, b| a / b)
}

/// f32.min
pub fn f32_min(stack: &mut Stack) -> Result<(), RuntimeError> {
    f32_binop(stack, wasm_min_f32)
}

/// f32.max
pub fn f32_max(stack: &mut Stack) -> Result<(), RuntimeError> {
    f32_binop(stack, wasm_max_f32)
}

/// f32.copysign
pub fn f32_copysign(stack: &mut Stack) -> Result<(), RuntimeError> {
    f32_binop(stack, f32::copysign)
}

/// f64.add
pub fn f64_add(stack: &mut Stack) -> Result<(), RuntimeError> {
    f64_binop(stack, |a, b| a + b)
}

/// f64.sub
pub fn f64_sub(stack: &mut Stack) -> Result<(), RuntimeError> {
    f64_binop(stack, |a, b| a - b)
}

/// f64.mul
pub fn f64_mul(stack: &mut Stack) -> Result<(), RuntimeError> {
    f64_binop(stack, |a, b| a * b)
}

/// f64.div
pub fn f64_div(stack: &mut Stack) -> Result<(), RuntimeError> {
    f64_binop(stack, |a, b| a / b)
}

/// f64.min
pub fn f64_min(stack: &mut Stack) -> Result<(), RuntimeError> {
    f64_binop(stack, wasm_min_f64)
}

/// f64.max
pub fn f64_max(stack: &mut Stack) -> Result<(), RuntimeError> {
    f64_binop(stack, wasm_max_f64)
}

/// f64.copysign
pub fn f64_copysign(stack: &mut Stack) -> Result<(), RuntimeError> {
    f64_binop(stack, f64::copysign)
}
