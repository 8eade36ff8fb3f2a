//! A WebAssembly MVP interpreter written in Rust.
//!
//! lotus decodes binary `.wasm` modules into a flat instruction pool and executes them
//! with a non-recursive stack-machine interpreter.
//!
//! # Modules
//!
//! - [`parser`] -- Binary format decoder. Reads `.wasm` bytes into a [`parser::module::Module`].
//! - [`runtime`] -- Instances, the interpreter loop, linear memory, tables and host functions.
//!
//! # Example
//!
//! Decode a module exporting `add`, instantiate it, and call the export:
//!
//! ```
//! use lotus::parser;
//! use lotus::runtime::{Builder, Value};
//!
//! let bytes = hex::decode(concat!(
//!     "0061736d01000000",
//!     "01070160027f7f017f",
//!     "03020100",
//!     "070701036164640000",
//!     "0a09010700200020016a0b",
//! ))
//! .unwrap();
//!
//! let module = parser::parse(&bytes).unwrap();
//! let mut instance = Builder::new(module).build().unwrap();
//! let results = instance.invoke("add", &[Value::I32(2), Value::I32(3)]).unwrap();
//! assert_eq!(results, vec![Value::I32(5)]);
//! ```
//!
//! # Scope
//!
//! Targets the WebAssembly 1.0 (MVP) binary format: one memory, one table, functions
//! with at most one result, and function imports only.

pub mod parser;
pub mod runtime;
