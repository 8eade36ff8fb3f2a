//! Typed views of raw stack words

use std::fmt;

use super::RuntimeError;
use crate::parser::module::ValueType;

/// A typed WebAssembly value
///
/// The interpreter works on untyped 64-bit words; `Value` is what embedders see.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
}

impl Value {
    pub fn typ(&self) -> ValueType {
        match self {
            Value::I32(_) => ValueType::I32,
            Value::I64(_) => ValueType::I64,
            Value::F32(_) => ValueType::F32,
            Value::F64(_) => ValueType::F64,
        }
    }

    /// Reinterpret a raw word as `value_type`, ignoring stale high bits of 32-bit types
    pub fn from_raw(value_type: ValueType, raw: i64) -> Value {
        match value_type {
            ValueType::I32 => Value::I32(raw as i32),
            ValueType::I64 => Value::I64(raw),
            ValueType::F32 => Value::F32(f32::from_bits(raw as u32)),
            ValueType::F64 => Value::F64(f64::from_bits(raw as u64)),
        }
    }

    /// The word this value occupies on the stack, 32-bit types zero-extended
    pub fn to_raw(&self) -> i64 {
        match self {
            Value::I32(v) => *v as u32 as i64,
            Value::I64(v) => *v,
            Value::F32(v) => v.to_bits() as i64,
            Value::F64(v) => v.to_bits() as i64,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Value::I32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::I64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f32(&self) -> Option<f32> {
        match self {
            Value::F32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::F64(v) => Some(*v),
            _ => None,
        }
    }

    /// Parse command line text as `value_type`
    ///
    /// Integers accept signed or unsigned decimal and `0x` hex; floats accept decimal or
    /// `0x`-prefixed raw bits.
    pub fn parse(value_type: ValueType, text: &str) -> Result<Value, RuntimeError> {
        let invalid = || RuntimeError::InvalidValue {
            value_type: value_type.to_string(),
            text: text.to_string(),
        };
        let hex = text.strip_prefix("0x");
        match value_type {
            ValueType::I32 => {
                let parsed = match hex {
                    Some(hex) => u32::from_str_radix(hex, 16).map(|v| v as i32),
                    None => text.parse::<i32>().or_else(|_| text.parse::<u32>().map(|v| v as i32)),
                };
                parsed.map(Value::I32).map_err(|_| invalid())
            }
            ValueType::I64 => {
                let parsed = match hex {
                    Some(hex) => u64::from_str_radix(hex, 16).map(|v| v as i64),
                    None => text.parse::<i64>().or_else(|_| text.parse::<u64>().map(|v| v as i64)),
                };
                parsed.map(Value::I64).map_err(|_| invalid())
            }
            ValueType::F32 => match hex {
                Some(hex) => u32::from_str_radix(hex, 16)
                    .map(|bits| Value::F32(f32::from_bits(bits)))
                    .map_err(|_| invalid()),
                None => text.parse::<f32>().map(Value::F32).map_err(|_| invalid()),
            },
            ValueType::F64 => match hex {
                Some(hex) => u64::from_str_radix(hex, 16)
                    .map(|bits| Value::F64(f64::from_bits(bits)))
                    .map_err(|_| invalid()),
                None => text.parse::<f64>().map(Value::F64).map_err(|_| invalid()),
            },
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::I32(v) => write!(f, "i32:{v}"),
            Value::I64(v) => write!(f, "i64:{v}"),
            Value::F32(v) => write!(f, "f32:{v:?}"),
            Value::F64(v) => write!(f, "f64:{v:?}"),
        }
    }
}
