//! Shader-code memory.
//!
//! Compiled binaries live in GPU-visible executable slabs. The allocator is
//! an external seam ([`traits::Allocator`]); the crate ships a host-backed
//! implementation ([`slab::SlabAllocator`]) used by tests and headless
//! tooling. Slabs are reference-counted so replacing shader code is atomic
//! with pipeline destruction.

pub mod slab;
pub mod traits;
