//! Host functions
//!
//! Function imports are resolved by field name against the host functions registered on
//! the [`Builder`](super::instance::Builder). A host function runs inline in the dispatch
//! loop and receives the calling instance, so it may read memory or call back into
//! exported functions.

use std::fmt;

use super::instance::ModuleInstance;
use super::RuntimeError;
use crate::parser::module::FunctionType;

pub trait HostFunction {
    fn name(&self) -> &str;

    /// Additional import names this function answers to
    fn aliases(&self) -> &[String] {
        &[]
    }

    fn function_type(&self) -> &FunctionType;

    /// Arguments arrive as raw stack words in declaration order
    fn execute(&self, instance: &mut ModuleInstance, args: &[i64]) -> Result<Option<i64>, RuntimeError>;
}

impl fmt::Debug for dyn HostFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HostFunction({} {})", self.name(), self.function_type())
    }
}

/// A host function backed by a closure
pub struct HostFn<F> {
    name: String,
    aliases: Vec<String>,
    function_type: FunctionType,
    f: F,
}

impl<F> HostFn<F>
where
    F: Fn(&mut ModuleInstance, &[i64]) -> Result<Option<i64>, RuntimeError>,
{
    pub fn new(name: impl Into<String>, function_type: FunctionType, f: F) -> Self {
        HostFn {
            name: name.into(),
            aliases: Vec::new(),
            function_type,
            f,
        }
    }

    pub fn alias(mut self, name: impl Into<String>) -> Self {
        self.aliases.push(name.into());
        self
    }
}

impl<F> HostFunction for HostFn<F>
where
    F: Fn(&mut ModuleInstance, &[i64]) -> Result<Option<i64>, RuntimeError>,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn aliases(&self) -> &[String] {
        &self.aliases
    }

    fn function_type(&self) -> &FunctionType {
        &self.function_type
    }

    fn execute(&self, instance: &mut ModuleInstance, args: &[i64]) -> Result<Option<i64>, RuntimeError> {
        (self.f)(instance, args)
    }
}
