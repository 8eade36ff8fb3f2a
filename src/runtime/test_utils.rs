//! Test utilities for runtime testing
//!
//! A tiny module assembler plus a fluent `ExecutorTest` that wraps an instruction
//! sequence into a one-function module, decodes it and runs it on a fresh instance.
