//! WebAssembly linear memory implementation
//!
//! A growable, zero-initialised byte buffer sized in 64 KiB pages. Every access is bounds
//! checked against the current size; a failed access traps with `MemoryAccessOverflow`.

use byteorder::{ByteOrder, LittleEndian};

use super::RuntimeError;
use crate::parser::module::Limits;

/// WebAssembly page size in bytes (64KB)
pub const PAGE_SIZE: usize = 65536;

/// Maximum number of pages (2^16 = 64K pages = 4GB total)
pub const MAX_PAGES: u32 = 65536;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Memory {
    data: Vec<u8>,
    current_pages: u32,
    max_pages: Option<u32>,
    /// Embedder ceiling, never above `MAX_PAGES`
    page_limit: u32,
}

impl Default for Memory {
    fn default() -> Self {
        Memory {
            data: Vec::new(),
            current_pages: 0,
            max_pages: None,
            page_limit: MAX_PAGES,
        }
    }
}

/// `pages` zeroed pages, failing instead of aborting when the allocation is refused
fn zeroed_pages(pages: u32) -> Result<Vec<u8>, RuntimeError> {
    let len = pages as usize * PAGE_SIZE;
    let mut data = Vec::new();
    data.try_reserve_exact(len)
        .map_err(|_| RuntimeError::MemoryAllocation(pages))?;
    data.resize(len, 0);
    Ok(data)
}

impl Memory {
    /// Create a zeroed memory of `initial_pages`
    ///
    /// # Errors
    /// `InvalidLimits` when the initial size exceeds the maximum or either exceeds `MAX_PAGES`.
    pub fn new(initial_pages: u32, max_pages: Option<u32>) -> Result<Self, RuntimeError> {
        Memory::with_page_limit(initial_pages, max_pages, MAX_PAGES)
    }

    /// Like [`Memory::new`], with growth capped at `page_limit` pages
    ///
    /// # Errors
    /// `MemoryLimitExceeded` when `initial_pages` is above the limit, `MemoryAllocation`
    /// when the pages cannot be allocated.
    pub fn with_page_limit(initial_pages: u32, max_pages: Option<u32>, page_limit: u32) -> Result<Self, RuntimeError> {
        let max = max_pages.unwrap_or(MAX_PAGES);
        if initial_pages > max || max > MAX_PAGES {
            return Err(RuntimeError::InvalidLimits {
                min: initial_pages,
                max,
            });
        }
        let page_limit = page_limit.min(MAX_PAGES);
        if initial_pages > page_limit {
            return Err(RuntimeError::MemoryLimitExceeded {
                pages: initial_pages,
                limit: page_limit,
            });
        }
        Ok(Memory {
            data: zeroed_pages(initial_pages)?,
            current_pages: initial_pages,
            max_pages,
            page_limit,
        })
    }

    pub fn from_limits(limits: &Limits) -> Result<Self, RuntimeError> {
        Memory::new(limits.min, limits.max)
    }

    /// Apply an embedder page limit to an existing memory
    pub fn limit_pages(&mut self, limit: u32) -> Result<(), RuntimeError> {
        let limit = limit.min(self.page_limit);
        if self.current_pages > limit {
            return Err(RuntimeError::MemoryLimitExceeded {
                pages: self.current_pages,
                limit,
            });
        }
        self.page_limit = limit;
        Ok(())
    }

    pub fn page_limit(&self) -> u32 {
        self.page_limit
    }

    /// Current size in pages
    pub fn pages(&self) -> u32 {
        self.current_pages
    }

    pub fn max_pages(&self) -> Option<u32> {
        self.max_pages
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Grow by `delta_pages`, returning the previous size in pages or -1
    ///
    /// A refused grow leaves the memory untouched. New pages are zeroed.
    pub fn grow(&mut self, delta_pages: u32) -> i32 {
        let current = self.current_pages;
        let Some(new_pages) = current.checked_add(delta_pages) else {
            return -1;
        };
        if new_pages > self.max_pages.unwrap_or(MAX_PAGES).min(self.page_limit) {
            return -1;
        }
        let new_bytes = new_pages as usize * PAGE_SIZE;
        if self.data.try_reserve(new_bytes - self.data.len()).is_err() {
            return -1;
        }
        self.data.resize(new_bytes, 0);
        self.current_pages = new_pages;
        current as i32
    }

    #[inline]
    fn check_bounds(&self, addr: u64, size: usize) -> Result<usize, RuntimeError> {
        let end = addr
            .checked_add(size as u64)
            .ok_or(RuntimeError::MemoryAccessOverflow(addr))?;
        if end > self.data.len() as u64 {
            return Err(RuntimeError::MemoryAccessOverflow(addr));
        }
        Ok(addr as usize)
    }

    fn slice(&self, addr: u64, size: usize) -> Result<&[u8], RuntimeError> {
        let start = self.check_bounds(addr, size)?;
        Ok(&self.data[start..start + size])
    }

    fn slice_mut(&mut self, addr: u64, size: usize) -> Result<&mut [u8], RuntimeError> {
        let start = self.check_bounds(addr, size)?;
        Ok(&mut self.data[start..start + size])
    }

    /// Copy `bytes` in at `offset`, as a data segment does
    pub fn put(&mut self, offset: u64, bytes: &[u8]) -> Result<(), RuntimeError> {
        self.slice_mut(offset, bytes.len())?.copy_from_slice(bytes);
        Ok(())
    }

    pub fn read_bytes(&self, addr: u64, len: usize) -> Result<&[u8], RuntimeError> {
        self.slice(addr, len)
    }

    pub fn read_u8(&self, addr: u64) -> Result<u8, RuntimeError> {
        Ok(self.slice(addr, 1)?[0])
    }

    pub fn read_u16(&self, addr: u64) -> Result<u16, RuntimeError> {
        Ok(LittleEndian::read_u16(self.slice(addr, 2)?))
    }

    pub fn read_u32(&self, addr: u64) -> Result<u32, RuntimeError> {
        Ok(LittleEndian::read_u32(self.slice(addr, 4)?))
    }

    pub fn read_u64(&self, addr: u64) -> Result<u64, RuntimeError> {
        Ok(LittleEndian::read_u64(self.slice(addr, 8)?))
    }

    pub fn write_u8(&mut self, addr: u64, value: u8) -> Result<(), RuntimeError> {
        self.slice_mut(addr, 1)?[0] = value;
        Ok(())
    }

    pub fn write_u16(&mut self, addr: u64, value: u16) -> Result<(), RuntimeError> {
        LittleEndian::write_u16(self.slice_mut(addr, 2)?, value);
        Ok(())
    }

    pub fn write_u32(&mut self, addr: u64, value: u32) -> Result<(), RuntimeError> {
        LittleEndian::write_u32(self.slice_mut(addr, 4)?, value);
        Ok(())
    }

    pub fn write_u64(&mut self, addr: u64, value: u64) -> Result<(), RuntimeError> {
        LittleEndian::write_u64(self.slice_mut(addr, 8)?, value);
        Ok(())
    }
}
