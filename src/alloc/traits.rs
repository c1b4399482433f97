//! Allocator trait for shader code memory.

use crate::alloc::slab::CodeLocation;
use crate::core::error::Error;

/// Sub-allocator of GPU-visible, executable memory.
///
/// `alloc` returns a location inside a shared slab; the returned location
/// keeps its slab alive. `free` releases the range for reuse, but the slab
/// itself is only reclaimed when every location in it is gone.
pub trait Allocator: Send + Sync {
    fn alloc(&self, size: u64) -> Result<CodeLocation, Error>;
    fn free(&self, location: &CodeLocation);
}
