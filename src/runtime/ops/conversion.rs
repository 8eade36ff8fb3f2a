//! Conversion operations for WebAssembly
//!
//! Float to integer truncation traps with `MathOverflow` on NaN and on values whose
//! truncation falls outside the target range. Integer to float conversion rounds to
//! nearest.

use super::*;

// ============================================================================
// Integer Width Conversions
// ============================================================================

/// i32.wrap_i64
pub fn i32_wrap_i64(stack: &mut Stack) -> Result<(), RuntimeError> {
    let c = stack.pop_i64()?;
    stack.push_i32(c as i32)
}

/// i64.extend_i32_s
pub fn i64_extend_i32_s(stack: &mut Stack) -> Result<(), RuntimeError> {
    let c = stack.pop_i32()?;
    stack.push_i64(c as i64)
}

/// i64.extend_i32_u
pub fn i64_extend_i32_u(stack: &mut Stack) -> Result<(), RuntimeError> {
    let c = stack.pop_i32()?;
    stack.push_i64(c as u32 as i64)
}

// ============================================================================
// Truncation
// ============================================================================

// f32 widens to f64 exactly, so one set of bounds serves both source widths.
// The bounds are the exclusive limits of the truncated value.
fn truncate(value: f64, lower_exclusive: f64, upper_exclusive: f64) -> Result<f64, RuntimeError> {
    if value.is_nan() {
        return Err(RuntimeError::MathOverflow);
    }
    let t = value.trunc();
    if t <= lower_exclusive || t >= upper_exclusive {
        return Err(RuntimeError::MathOverflow);
    }
    Ok(t)
}

const I32_LOWER: f64 = -2147483649.0;
const I32_UPPER: f64 = 2147483648.0;
const U32_UPPER: f64 = 4294967296.0;
const I64_UPPER: f64 = 9223372036854775808.0;
const U64_UPPER: f64 = 18446744073709551616.0;

fn trunc_i32_s(value: f64) -> Result<i32, RuntimeError> {
    Ok(truncate(value, I32_LOWER, I32_UPPER)? as i32)
}

fn trunc_i32_u(value: f64) -> Result<i32, RuntimeError> {
    Ok(truncate(value, -1.0, U32_UPPER)? as u32 as i32)
}

fn trunc_i64_s(value: f64) -> Result<i64, RuntimeError> {
    // -2^63 is representable, anything below it is not; there is no f64 between them
    if value.trunc() < -I64_UPPER {
        return Err(RuntimeError::MathOverflow);
    }
    Ok(truncate(value, f64::NEG_INFINITY, I64_UPPER)? as i64)
}

fn trunc_i64_u(value: f64) -> Result<i64, RuntimeError> {
    Ok(truncate(value, -1.0, U64_UPPER)? as u64 as i64)
}

/// i32.trunc_f32_s
pub fn i32_trunc_f32_s(stack: &mut Stack) -> Result<(), RuntimeError> {
    let c = stack.pop_f32()?;
    stack.push_i32(trunc_i32_s(c as f64)?)
}

/// i32.trunc_f32_u
pub fn i32_trunc_f32_u(stack: &mut Stack) -> Result<(), RuntimeError> {
    let c = stack.pop_f32()?;
    stack.push_i32(trunc_i32_u(c as f64)?)
}

/// i32.trunc_f64_s
pub fn i32_trunc_f64_s(stack: &mut Stack) -> Result<(), RuntimeError> {
    let c = stack.pop_f64()?;
    stack.push_i32(trunc_i32_s(c)?)
}

/// i32.trunc_f64_u
pub fn i32_trunc_f64_u(stack: &mut Stack) -> Result<(), RuntimeError> {
    let c = stack.pop_f64()?;
    stack.push_i32(trunc_i32_u(c)?)
}

/// i64.trunc_f32_s
pub fn i64_trunc_f32_s(stack: &mut Stack) -> Result<(), RuntimeError> {
    let c = stack.pop_f32()?;
    stack.push_i64(trunc_i64_s(c as f64)?)
}

/// i64.trunc_f32_u
pub fn i64_trunc_f32_u(stack: &mut Stack) -> Result<(), RuntimeError> {
    let c = stack.pop_f32()?;
    stack.push_i64(trunc_i64_u(c as f64)?)
}

/// i64.trunc_f64_s
pub fn i64_trunc_f64_s(stack: &mut Stack) -> Result<(), RuntimeError> {
    let c = stack.pop_f64()?;
    stack.push_i64(trunc_i64_s(c)?)
}

/// i64.trunc_f64_u
pub fn i64_trunc_f64_u(stack: &mut Stack) -> Result<(), RuntimeError> {
    let c = stack.pop_f64()?;
    stack.push_i64(trunc_i64_u(c)?)
}

// ============================================================================
// Integer to Float
// ============================================================================

/// f32.convert_i32_s
pub fn f32_convert_i32_s(stack: &mut Stack) -> Result<(), RuntimeError> {
    let c = stack.pop_i32()?;
    stack.push_f32(c as f32)
}

/// f32.convert_i32_u
pub fn f32_convert_i32_u(stack: &mut Stack) -> Result<(), RuntimeError> {
    let c = stack.pop_i32()?;
    stack.push_f32(c as u32 as f32)
}

/// f32.convert_i64_s
pub fn f32_convert_i64_s(stack: &mut Stack) -> Result<(), RuntimeError> {
    let c = stack.pop_i64()?;
    stack.push_f32(c as f32)
}

/// f32.convert_i64_u
pub fn f32_convert_i64_u(stack: &mut Stack) -> Result<(), RuntimeError> {
    let c = stack.pop_i64()?;
    // rounds once; converting bits 0..63 and then adding 2^63 rounds twice and can land one ulp low
    stack.push_f32(c as u64 as f32)
}

/// f64.convert_i32_s
pub fn f64_convert_i32_s(stack: &mut Stack) -> Result<(), RuntimeError> {
    let c = stack.pop_i32()?;
    stack.push_f64(c as f64)
}

/// f64.convert_i32_u
pub fn f64_convert_i32_u(stack: &mut Stack) -> Result<(), RuntimeError> {
    let c = stack.pop_i32()?;
    stack.push_f64(c as u32 as f64)
}

/// f64.convert_i64_s
pub fn f64_convert_i64_s(stack: &mut Stack) -> Result<(), RuntimeError> {
    let c = stack.pop_i64()?;
    stack.push_f64(c as f64)
}

/// f64.convert_i64_u
pub fn f64_convert_i64_u(stack: &mut Stack) -> Result<(), RuntimeError> {
    let c = stack.pop_i64()?;
    // rounds once; converting bits 0..63 and then adding 2^63 rounds twice and can land one ulp low
    stack.push_f64(c as u64 as f64)
}

// ============================================================================
// Float Width and Reinterpretation
// ============================================================================

/// f32.demote_f64
pub fn f32_demote_f64(stack: &mut Stack) -> Result<(), RuntimeError> {
    let c = stack.pop_f64()?;
    stack.push_f32(c as f32)
}

/// f64.promote_f32
pub fn f64_promote_f32(stack: &mut Stack) -> Result<(), RuntimeError> {
    let c = stack.pop_f32()?;
    stack.push_f64(c as f64)
}

/// i32.reinterpret_f32
pub fn i32_reinterpret_f32(stack: &mut Stack) -> Result<(), RuntimeError> {
    let c = stack.pop_f32()?;
    stack.push_i32(c.to_bits() as i32)
}

/// i64.reinterpret_f64
pub fn i64_reinterpret_f64(stack: &mut Stack) -> Result<(), RuntimeError> {
    let c = stack.pop_f64()?;
    stack.push_i64(c.to_bits() as i64)
}

/// f32.reinterpret_i32
pub fn f32_reinterpret_i32(stack: &mut Stack) -> Result<(), RuntimeError> {
    let c = stack.pop_i32()?;
    stack.push_f32(f32::from_bits(c as u32))
}

/// f64.reinterpret_i64
pub fn f64_reinterpret_i64(stack: &mut Stack) -> Result<(), RuntimeError> {
    let c = stack.pop_i64()?;
    stack.push_f64(f64::from_bits(c as u64))
}
