pub use ash::vk;

pub use crate::core::error::Error;
pub use crate::core::gpu_info::{GfxLevel, GpuInfo};

pub use crate::alloc::traits::Allocator;
pub use crate::alloc::slab::{CodeLocation, ShaderCodeSlab, SlabAllocator};

pub use crate::blob::{BlobCache, MemoryBlobCache};

pub use crate::shader::ir::{ShaderBackend, ShaderFrontend, ShaderIr, ShaderStage};
pub use crate::shader::cache::ShaderVariantCache;
pub use crate::shader::ShaderModule;

pub use crate::pipeline::assembler::PipelineAssembler;
pub use crate::pipeline::builder::{ComputePipelineBuilder, GraphicsPipelineBuilder};
pub use crate::pipeline::create_info::{ComputePipelineCreateInfo, GraphicsPipelineCreateInfo};
pub use crate::pipeline::shader_code::ShaderCode;
pub use crate::pipeline::{Pipeline, PipelineKind};
