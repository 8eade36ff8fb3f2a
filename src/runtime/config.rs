//! Interpreter resource limits
//!
//! Limits are fixed when the stack allocator is built and enforced by hard failure.

use serde::Deserialize;

use super::memory::MAX_PAGES;

pub const DEFAULT_MAX_FRAMES: usize = 16384;
pub const DEFAULT_MAX_STACK_WORDS: usize = 16384 * 64;
pub const DEFAULT_MAX_LABELS: usize = 16384 * 64;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct VmConfig {
    /// Operand stack plus locals, in 64-bit words, shared by all frames
    pub max_stack_words: usize,
    pub max_frames: usize,
    pub max_labels: usize,
    /// Linear memory ceiling in 64 KiB pages, whatever the module declares
    pub max_memory_pages: u32,
    /// Check signatures on `call_indirect` and host imports
    pub validate_function_type: bool,
}

impl Default for VmConfig {
    fn default() -> Self {
        VmConfig {
            max_stack_words: DEFAULT_MAX_STACK_WORDS,
            max_frames: DEFAULT_MAX_FRAMES,
            max_labels: DEFAULT_MAX_LABELS,
            max_memory_pages: MAX_PAGES,
            validate_function_type: false,
        }
    }
}

impl VmConfig {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
