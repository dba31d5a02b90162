//! Buffer arena
//!
//! Scratch regions in the native address space for a single call. An [`Arena`]
//! borrows the heap for the duration of one command; every region it hands out
//! is released either explicitly or when the arena goes out of scope, so an
//! early `?` return can never leak native memory.

use crate::console_log;
use crate::error::{BridgeError, BridgeResult};
use crate::memory::{NativeHeap, Ptr};

/// Handle to a region allocated by an [`Arena`]
///
/// Handles are plain values; the arena keeps the authoritative list of which
/// ones are still live.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Region {
    id: u32,
    ptr: Ptr,
    size: usize,
}

impl Region {
    /// Native address of the first byte
    pub fn ptr(&self) -> Ptr {
        self.ptr
    }

    /// Usable size in bytes
    pub fn size(&self) -> usize {
        self.size
    }
}

/// Per-arena allocation counters
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ArenaStats {
    pub allocated: u32,
    pub released: u32,
    pub bytes: usize,
}

/// Scoped allocator over a [`NativeHeap`]
pub struct Arena<'h, H: NativeHeap + ?Sized> {
    heap: &'h mut H,
    live: Vec<Region>,
    next_id: u32,
    stats: ArenaStats,
}

impl<'h, H: NativeHeap + ?Sized> Arena<'h, H> {
    pub fn new(heap: &'h mut H) -> Self {
        Arena {
            heap,
            live: Vec::new(),
            next_id: 0,
            stats: ArenaStats::default(),
        }
    }

    /// Allocate a region of `size` bytes.
    pub fn allocate(&mut self, size: usize) -> BridgeResult<Region> {
        let ptr = match self.heap.malloc(size) {
            Some(ptr) if ptr != 0 => ptr,
            _ => return Err(BridgeError::OutOfMemory { requested: size }),
        };

        let region = Region {
            id: self.next_id,
            ptr,
            size,
        };
        self.next_id += 1;
        self.live.push(region);
        self.stats.allocated += 1;
        self.stats.bytes = self.stats.bytes.saturating_add(size);
        Ok(region)
    }

    /// Allocate an exactly-sized region holding `bytes`.
    pub fn allocate_with(&mut self, bytes: &[u8]) -> BridgeResult<Region> {
        let region = self.allocate(bytes.len())?;
        self.write(region, bytes)?;
        Ok(region)
    }

    /// Copy `bytes` into the start of `region`.
    pub fn write(&mut self, region: Region, bytes: &[u8]) -> BridgeResult<()> {
        self.check_live(region)?;
        if bytes.len() > region.size {
            return Err(BridgeError::SizeMismatch {
                capacity: region.size,
                len: bytes.len(),
            });
        }
        self.heap.write(region.ptr, bytes);
        Ok(())
    }

    /// Read at most `max_bytes` from `region` and decode them as UTF-8.
    ///
    /// Stops at the first NUL. A region with no terminator is read whole; the
    /// caller must validate the structure of the text before trusting it.
    pub fn read_utf8(&self, region: Region, max_bytes: usize) -> BridgeResult<String> {
        let (text, _) = self.read_terminated(region, max_bytes)?;
        Ok(text)
    }

    /// Read a NUL-terminated string that must fit inside `region`.
    pub fn read_c_str(&self, region: Region) -> BridgeResult<String> {
        let (text, terminated) = self.read_terminated(region, region.size)?;
        if !terminated {
            return Err(BridgeError::BufferOverflow {
                ceiling: region.size,
                len: region.size,
            });
        }
        Ok(text)
    }

    /// Copy the first `len` bytes of `region` out of the native heap.
    pub fn read_bytes(&self, region: Region, len: usize) -> BridgeResult<Vec<u8>> {
        self.check_live(region)?;
        if len > region.size {
            return Err(BridgeError::BufferOverflow {
                ceiling: region.size,
                len,
            });
        }
        Ok(self.heap.read(region.ptr, len))
    }

    /// Release `region`. Releasing a region twice is a no-op.
    pub fn release(&mut self, region: Region) {
        if let Some(idx) = self.live.iter().position(|r| r.id == region.id) {
            self.live.swap_remove(idx);
            self.heap.free(region.ptr);
            self.stats.released += 1;
        }
    }

    /// The heap itself, for invoking native calls while regions are live.
    pub fn native(&mut self) -> &mut H {
        &mut *self.heap
    }

    pub fn stats(&self) -> ArenaStats {
        self.stats
    }

    /// Regions not yet released
    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    fn check_live(&self, region: Region) -> BridgeResult<()> {
        if self.live.iter().any(|r| r.id == region.id) {
            Ok(())
        } else {
            Err(BridgeError::ReleasedRegion(region.id))
        }
    }

    fn read_terminated(&self, region: Region, max_bytes: usize) -> BridgeResult<(String, bool)> {
        self.check_live(region)?;
        let raw = self.heap.read(region.ptr, max_bytes.min(region.size));
        let (bytes, terminated) = match raw.iter().position(|&b| b == 0) {
            Some(end) => (&raw[..end], true),
            None => (&raw[..], false),
        };
        let text = std::str::from_utf8(bytes)
            .map_err(|e| BridgeError::DecodeError(e.to_string()))?;
        Ok((text.to_owned(), terminated))
    }
}

impl<H: NativeHeap + ?Sized> Drop for Arena<'_, H> {
    fn drop(&mut self) {
        if self.live.is_empty() {
            return;
        }
        console_log!("arena: releasing {} region(s) on scope exit", self.live.len());
        for region in std::mem::take(&mut self.live) {
            self.heap.free(region.ptr);
            self.stats.released += 1;
        }
    }
}
