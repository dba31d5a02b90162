//! Native address space access
//!
//! The native module owns a single flat address space. The bridge never keeps
//! pointers into it beyond one call; every access goes through [`NativeHeap`]:
//! allocate, free, and copy bytes in or out.
//!
//! [`LinearHeap`] is an in-process address space (a `Vec<u8>` above a non-zero
//! base) with a first-fit allocator. It backs modules that run inside the host
//! and keeps counters so leaks and double frees are observable.

use std::collections::BTreeMap;

/// Address inside the native address space. `0` is the null pointer.
pub type Ptr = usize;

/// Allocator and byte access for the native address space
pub trait NativeHeap {
    /// Allocate `size` bytes. Returns `None` when the allocator is exhausted.
    fn malloc(&mut self, size: usize) -> Option<Ptr>;

    /// Free a block returned by `malloc`. Freeing null is a no-op.
    fn free(&mut self, ptr: Ptr);

    /// Copy `data` into the address space starting at `ptr`.
    fn write(&mut self, ptr: Ptr, data: &[u8]);

    /// Copy `len` bytes out of the address space starting at `ptr`.
    fn read(&self, ptr: Ptr, len: usize) -> Vec<u8>;
}

/// Lowest address handed out by [`LinearHeap`]
pub const HEAP_BASE: Ptr = 0x0001_0000;

/// Allocation alignment, matching what `malloc` guarantees on wasm32
const ALIGN: usize = 8;

/// `None` when rounding up would overflow
#[inline(always)]
fn align_up(value: usize) -> Option<usize> {
    Some(value.checked_add(ALIGN - 1)? & !(ALIGN - 1))
}

/// Allocation counters
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HeapStats {
    /// Successful allocations
    pub allocations: u64,
    /// Successful frees
    pub frees: u64,
    /// Allocations refused for lack of space
    pub failed: u64,
    /// Frees of addresses that were not live (double free or garbage)
    pub invalid_frees: u64,
}

impl HeapStats {
    /// Blocks currently allocated
    pub fn live(&self) -> u64 {
        self.allocations - self.frees
    }
}

/// In-process native address space with a first-fit allocator
pub struct LinearHeap {
    bytes: Vec<u8>,
    base: Ptr,

    /// Live blocks: start address -> requested size
    blocks: BTreeMap<Ptr, usize>,

    stats: HeapStats,
}

impl LinearHeap {
    /// Create an address space of `size` bytes.
    pub fn new(size: usize) -> Self {
        LinearHeap {
            bytes: vec![0u8; size],
            base: HEAP_BASE,
            blocks: BTreeMap::new(),
            stats: HeapStats::default(),
        }
    }

    /// Total bytes in the address space
    pub fn capacity(&self) -> usize {
        self.bytes.len()
    }

    pub fn stats(&self) -> HeapStats {
        self.stats
    }

    /// Number of blocks currently allocated
    pub fn live_blocks(&self) -> usize {
        self.blocks.len()
    }

    /// Requested size of the live block starting at `ptr`
    pub fn block_size(&self, ptr: Ptr) -> Option<usize> {
        self.blocks.get(&ptr).copied()
    }

    /// Read a NUL-terminated string from the start of a live block.
    ///
    /// Returns `None` if `ptr` is not a live block. An unterminated block
    /// yields its whole contents.
    pub fn read_c_str(&self, ptr: Ptr) -> Option<String> {
        let size = self.block_size(ptr)?;
        let raw = self.read(ptr, size);
        let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
        Some(String::from_utf8_lossy(&raw[..end]).into_owned())
    }

    /// Translate an address range into an offset into `bytes`
    fn offset(&self, ptr: Ptr, len: usize) -> Option<usize> {
        let offset = ptr.checked_sub(self.base)?;
        if offset.checked_add(len)? > self.bytes.len() {
            return None;
        }
        Some(offset)
    }
}

impl NativeHeap for LinearHeap {
    fn malloc(&mut self, size: usize) -> Option<Ptr> {
        let end = self.base + self.bytes.len();
        // malloc(0) still hands out a unique address
        let Some(needed) = align_up(size.max(1)) else {
            self.stats.failed += 1;
            return None;
        };

        let mut cursor = self.base;
        for (&start, &len) in &self.blocks {
            if start >= cursor && start - cursor >= needed {
                break;
            }
            // Live blocks lie inside the address space, so this cannot overflow
            cursor = align_up(start + len.max(1)).unwrap_or(end);
        }

        if cursor.checked_add(needed).map_or(true, |top| top > end) {
            self.stats.failed += 1;
            return None;
        }

        self.blocks.insert(cursor, size);
        self.stats.allocations += 1;
        Some(cursor)
    }

    fn free(&mut self, ptr: Ptr) {
        if ptr == 0 {
            return;
        }
        if self.blocks.remove(&ptr).is_some() {
            self.stats.frees += 1;
        } else {
            self.stats.invalid_frees += 1;
        }
    }

    fn write(&mut self, ptr: Ptr, data: &[u8]) {
        // Unmapped - ignore
        if let Some(offset) = self.offset(ptr, data.len()) {
            self.bytes[offset..offset + data.len()].copy_from_slice(data);
        }
    }

    fn read(&self, ptr: Ptr, len: usize) -> Vec<u8> {
        match self.offset(ptr, len) {
            Some(offset) => self.bytes[offset..offset + len].to_vec(),
            // Unmapped - reads as zero
            None => vec![0u8; len],
        }
    }
}
