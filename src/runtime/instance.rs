//! Module instances
//!
//! A [`ModuleInstance`] owns everything a decoded module needs at run time: resolved
//! functions, the table, linear memory, globals and the stack allocator. It is built once
//! with a [`Builder`] and then called any number of times through `execute()`.

use std::collections::HashMap;
use std::convert::TryFrom;
use std::rc::Rc;
use std::sync::Arc;

use super::config::VmConfig;
use super::executor::Executor;
use super::hook::Hook;
use super::imports::HostFunction;
use super::memory::Memory;
use super::stack::{ArrayStackAllocator, FunctionRef, StackAllocator};
use super::table::Table;
use super::value::Value;
use super::RuntimeError;
use crate::parser::module::{ExportIndex, ExternalKind, FunctionType, GlobalType, Module, ValueType};
use crate::parser::pool::Span;

pub(crate) enum FunctionCode {
    Wasm { local_count: u32, body: Span },
    Host(Rc<dyn HostFunction>),
}

pub(crate) struct FunctionInstance {
    pub function_type: FunctionType,
    pub code: FunctionCode,
}

pub struct ModuleInstance {
    pub(crate) module: Arc<Module>,
    pub(crate) functions: Vec<FunctionInstance>,
    pub(crate) table: Option<Table>,
    pub(crate) memory: Memory,
    pub(crate) globals: Vec<i64>,
    pub(crate) global_types: Vec<GlobalType>,
    exports: HashMap<String, ExportIndex>,
    pub(crate) stack: Box<dyn StackAllocator>,
    pub(crate) hooks: Vec<Box<dyn Hook>>,
    pub(crate) validate_function_type: bool,
    /// Nesting of `execute()` calls, above zero while a host function re-enters
    depth: usize,
}

impl ModuleInstance {
    /// Run function `index` with raw arguments
    ///
    /// A top-level call starts from an empty stack. A nested call (from a host function)
    /// runs on top of the caller's frames and leaves them untouched, even on a trap.
    pub fn execute(&mut self, index: u32, args: &[i64]) -> Result<Option<i64>, RuntimeError> {
        let function = self
            .functions
            .get(index as usize)
            .ok_or(RuntimeError::FunctionIndexOutOfBounds(index))?;
        let expected = function.function_type.parameters.len();
        if args.len() != expected {
            return Err(RuntimeError::ArgumentCountMismatch {
                expected,
                actual: args.len(),
            });
        }
        self.enter(|executor| executor.call(index, args))
    }

    pub fn execute_export(&mut self, name: &str, args: &[i64]) -> Result<Option<i64>, RuntimeError> {
        let index = self.export_function(name)?;
        self.execute(index, args)
    }

    /// Typed call of an exported function
    pub fn invoke(&mut self, name: &str, args: &[Value]) -> Result<Vec<Value>, RuntimeError> {
        let index = self.export_function(name)?;
        let function_type = self
            .function_type(index)
            .cloned()
            .ok_or(RuntimeError::FunctionIndexOutOfBounds(index))?;
        if args.len() != function_type.parameters.len() {
            return Err(RuntimeError::ArgumentCountMismatch {
                expected: function_type.parameters.len(),
                actual: args.len(),
            });
        }
        for (arg, param) in args.iter().zip(&function_type.parameters) {
            if arg.typ() != *param {
                return Err(RuntimeError::InvalidValue {
                    value_type: param.to_string(),
                    text: arg.to_string(),
                });
            }
        }

        let raw: Vec<i64> = args.iter().map(Value::to_raw).collect();
        let result = self.execute(index, &raw)?;
        Ok(match (function_type.result(), result) {
            (Some(value_type), Some(raw)) => vec![Value::from_raw(value_type, raw)],
            _ => vec![],
        })
    }

    /// Evaluate a constant expression in the context of this instance
    pub(crate) fn evaluate(&mut self, expr: Span, value_type: ValueType) -> Result<i64, RuntimeError> {
        self.enter(|executor| executor.evaluate(expr, value_type))
    }

    fn enter<T>(&mut self, run: impl FnOnce(Executor<'_>) -> Result<T, RuntimeError>) -> Result<T, RuntimeError> {
        if self.depth == 0 {
            self.stack.reset();
        }
        let base = self.stack.frame_count();
        self.depth += 1;
        let result = run(Executor::new(self));
        self.depth -= 1;
        if let Err(e) = &result {
            log::debug!("trap at depth {}: {}", self.depth, e);
            self.stack.unwind(base);
        }
        result
    }

    fn export_function(&self, name: &str) -> Result<u32, RuntimeError> {
        match self.exports.get(name) {
            Some(ExportIndex::Function(index)) => Ok(*index),
            _ => Err(RuntimeError::UnknownExport(name.to_string())),
        }
    }

    pub fn contains_export(&self, name: &str) -> bool {
        self.exports.contains_key(name)
    }

    pub fn function_type(&self, index: u32) -> Option<&FunctionType> {
        self.functions.get(index as usize).map(|f| &f.function_type)
    }

    pub fn globals(&self) -> &[i64] {
        &self.globals
    }

    /// Typed view of global `index`
    pub fn global(&self, index: u32) -> Option<Value> {
        let value_type = self.global_types.get(index as usize)?.value_type;
        let raw = *self.globals.get(index as usize)?;
        Some(Value::from_raw(value_type, raw))
    }

    pub fn set_global(&mut self, index: u32, value: i64) -> Result<(), RuntimeError> {
        let global_type = self
            .global_types
            .get(index as usize)
            .ok_or(RuntimeError::GlobalIndexOutOfBounds(index))?;
        if !global_type.mutable {
            return Err(RuntimeError::ImmutableGlobal(index));
        }
        self.globals[index as usize] = value;
        Ok(())
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut Memory {
        &mut self.memory
    }

    pub fn table(&self) -> Option<&Table> {
        self.table.as_ref()
    }

    pub fn module(&self) -> &Module {
        &self.module
    }
}

/// Configures and instantiates a [`ModuleInstance`]
pub struct Builder {
    module: Arc<Module>,
    hosts: HashMap<String, Rc<dyn HostFunction>>,
    duplicate: Option<String>,
    hooks: Vec<Box<dyn Hook>>,
    globals: Option<Vec<i64>>,
    memory: Option<Memory>,
    validate_function_type: Option<bool>,
    config: VmConfig,
    stack: Option<Box<dyn StackAllocator>>,
}

impl Builder {
    pub fn new(module: impl Into<Arc<Module>>) -> Self {
        Builder {
            module: module.into(),
            hosts: HashMap::new(),
            duplicate: None,
            hooks: Vec::new(),
            globals: None,
            memory: None,
            validate_function_type: None,
            config: VmConfig::default(),
            stack: None,
        }
    }

    /// Register a host function under its name and every alias
    pub fn host_function(mut self, host: Rc<dyn HostFunction>) -> Self {
        let names = std::iter::once(host.name().to_string()).chain(host.aliases().iter().cloned());
        for name in names.collect::<Vec<_>>() {
            if self.hosts.contains_key(&name) {
                self.duplicate.get_or_insert(name);
                continue;
            }
            self.hosts.insert(name, Rc::clone(&host));
        }
        self
    }

    pub fn hook(mut self, hook: Box<dyn Hook>) -> Self {
        self.hooks.push(hook);
        self
    }

    /// Initial global values, replacing the module's initialisers
    pub fn globals(mut self, globals: Vec<i64>) -> Self {
        self.globals = Some(globals);
        self
    }

    pub fn memory(mut self, memory: Memory) -> Self {
        self.memory = Some(memory);
        self
    }

    /// Overrides `VmConfig::validate_function_type`
    pub fn validate_function_type(mut self, validate: bool) -> Self {
        self.validate_function_type = Some(validate);
        self
    }

    pub fn config(mut self, config: VmConfig) -> Self {
        self.config = config;
        self
    }

    /// Reuse an existing allocator instead of sizing a new one from the config
    pub fn stack_allocator(mut self, stack: Box<dyn StackAllocator>) -> Self {
        self.stack = Some(stack);
        self
    }

    pub fn build(self) -> Result<ModuleInstance, RuntimeError> {
        if let Some(name) = self.duplicate {
            return Err(RuntimeError::DuplicateHostFunction(name));
        }
        let module = Arc::clone(&self.module);
        let validate_function_type = self
            .validate_function_type
            .unwrap_or(self.config.validate_function_type);

        let mut functions = Vec::with_capacity(module.imports.len() + module.code.len());
        for import in &module.imports {
            let type_index = match import.external_kind {
                ExternalKind::Function(type_index) => type_index,
                _ => {
                    return Err(RuntimeError::UnsupportedImport {
                        module: import.module.clone(),
                        name: import.name.clone(),
                    })
                }
            };
            let host = self
                .hosts
                .get(&import.name)
                .ok_or_else(|| RuntimeError::UnknownHostFunction {
                    module: import.module.clone(),
                    name: import.name.clone(),
                })?;
            let function_type = module
                .types
                .get(type_index as usize)
                .cloned()
                .ok_or(RuntimeError::SignatureMismatch)?;
            if validate_function_type && *host.function_type() != function_type {
                return Err(RuntimeError::SignatureMismatch);
            }
            functions.push(FunctionInstance {
                function_type,
                code: FunctionCode::Host(Rc::clone(host)),
            });
        }

        let stack = match self.stack {
            Some(stack) => stack,
            None => Box::new(ArrayStackAllocator::new(&self.config)),
        };
        let mut instance = ModuleInstance {
            module: self.module,
            functions,
            table: None,
            memory: Memory::default(),
            globals: Vec::with_capacity(module.globals.len()),
            global_types: module.globals.iter().map(|g| g.global_type).collect(),
            exports: HashMap::new(),
            stack,
            hooks: self.hooks,
            validate_function_type,
            depth: 0,
        };

        match self.globals {
            Some(globals) => {
                if globals.len() != module.globals.len() {
                    return Err(RuntimeError::GlobalCountMismatch {
                        expected: module.globals.len(),
                        actual: globals.len(),
                    });
                }
                instance.globals = globals;
            }
            None => {
                // initialisers may read the globals defined before them
                for global in &module.globals {
                    let value = instance.evaluate(global.init, global.global_type.value_type)?;
                    instance.globals.push(value);
                }
            }
        }

        instance.table = module.tables.first().map(|t| Table::new(t.limits)).transpose()?;

        let imported = instance.functions.len();
        for (i, body) in module.code.iter().enumerate() {
            let index = (imported + i) as u32;
            let function_type = module
                .function_type(index)
                .cloned()
                .ok_or(RuntimeError::FunctionIndexOutOfBounds(index))?;
            instance.functions.push(FunctionInstance {
                function_type,
                code: FunctionCode::Wasm {
                    local_count: u32::try_from(body.locals.len()).unwrap_or(u32::MAX),
                    body: body.body,
                },
            });
        }

        if instance.functions.len() > FunctionRef::MAX_INDEX as usize {
            return Err(RuntimeError::FunctionIndexOverflow(instance.functions.len() as u32));
        }

        for element in &module.elements {
            let offset = instance.evaluate(element.offset, ValueType::I32)? as i32;
            if offset < 0 {
                return Err(RuntimeError::InvalidOffset(offset as i64));
            }
            let table = instance
                .table
                .as_mut()
                .ok_or(RuntimeError::UndefinedElement(offset as u32))?;
            table.init(offset as u32, &element.init)?;
        }

        if module.memories.len() > 1 {
            return Err(RuntimeError::MultipleMemories(module.memories.len()));
        }
        let page_limit = self.config.max_memory_pages;
        instance.memory = match (self.memory, module.memories.first()) {
            (Some(mut memory), _) => {
                memory.limit_pages(page_limit)?;
                memory
            }
            (None, Some(limits)) => Memory::with_page_limit(limits.min, limits.max, page_limit)?,
            (None, None) => Memory::with_page_limit(0, None, page_limit)?,
        };

        for data in &module.data {
            let offset = instance.evaluate(data.offset, ValueType::I32)? as i32;
            if offset < 0 {
                return Err(RuntimeError::InvalidOffset(offset as i64));
            }
            instance.memory.put(offset as u64, &data.init)?;
        }

        if let Some(start) = module.start {
            log::debug!("running start function {}", start);
            instance.execute(start, &[])?;
        }

        instance.exports = module
            .exports
            .iter()
            .map(|export| (export.name.clone(), export.index))
            .collect();


        log::debug!(
            "instantiated module: {} functions, {} globals, {} memory pages, table size {}",
            instance.functions.len(),
            instance.globals.len(),
            instance.memory.pages(),
            instance.table.as_ref().map_or(0, Table::size)
        );
        Ok(instance)
    }
}
