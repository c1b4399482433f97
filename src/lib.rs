//! Pipeline compiler and PM4 state encoder for RDNA-class GPUs
//!
//! Deimos is the core of a Vulkan graphics/compute pipeline compiler: given
//! shader stages in SPIR-V and a fixed-function state description, it lowers
//! the stages through a pluggable front-end and back-end, links them, decides
//! how hardware stages are merged (NGG vs legacy geometry), and produces the
//! two PM4 register streams (context + config) that program the GPU's
//! fixed-function units, together with the compiled shader binaries placed in
//! an executable code slab.
//!
//! Deimos is a library. It never talks to a device: command submission,
//! descriptor management and the actual SPIR-V → ISA compilers are external
//! collaborators behind traits ([`ShaderFrontend`], [`ShaderBackend`],
//! [`Allocator`], [`BlobCache`]).
//!
//! # Example
//! ```ignore
//! use std::sync::Arc;
//! use deimos::prelude::*;
//!
//! // Describe the chip we are compiling for.
//! let gpu = GpuInfo::new(GfxLevel::Gfx11);
//!
//! // The assembler owns the shader variant cache and the external seams.
//! let assembler = PipelineAssembler::new(
//!     gpu,
//!     frontend.clone(),   // Arc<dyn ShaderFrontend>
//!     backend.clone(),    // Arc<dyn ShaderBackend>
//!     Arc::new(SlabAllocator::new(256 * 1024)),
//!     Some(Arc::new(MemoryBlobCache::default())),
//! );
//!
//! let vertex = ShaderCode::from_spirv(vk::ShaderStageFlags::VERTEX, vtx_code);
//! let fragment = ShaderCode::from_spirv(vk::ShaderStageFlags::FRAGMENT, frag_code);
//!
//! let pci = GraphicsPipelineBuilder::new("textured_quad")
//!     .vertex_input(0, vk::VertexInputRate::VERTEX)
//!     .vertex_attribute(0, 0, vk::Format::R32G32_SFLOAT)?
//!     .vertex_attribute(0, 1, vk::Format::R32G32_SFLOAT)?
//!     .color_format(vk::Format::R8G8B8A8_UNORM)
//!     .blend_attachment_none()
//!     .attach_shader(vertex)
//!     .attach_shader(fragment)
//!     .build();
//!
//! let pipeline = assembler.create_graphics(&pci)?;
//! // `pipeline.context_stream()` / `pipeline.config_stream()` now hold the
//! // complete register programming for this state vector.
//! ```
//!
//! For further documentation, check out the following modules
//! - [`pipeline`] for pipeline creation, builders and the assembler.
//! - [`shader`] for variant keys, the shader cache and stage linking.
//! - [`state`] for the fixed-function state reducers.
//! - [`emit`] for the PM4 stream encoders.
//! - [`alloc`] for the shader code slab allocator.

#[macro_use]
extern crate derivative;
#[macro_use]
extern crate log;

pub mod prelude;
pub use crate::prelude::*;

pub mod alloc;
pub mod blob;
pub mod core;
pub mod emit;
pub mod format;
pub mod pipeline;
pub mod shader;
pub mod state;
pub mod util;
