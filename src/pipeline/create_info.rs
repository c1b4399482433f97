//! Description structs for pipeline creation.
//!
//! Everything here is plain data: the create info owns its arrays and holds
//! no pointers into caller memory, so it can be hashed, cloned and kept in
//! caches. Use the builders in [`builder`](crate::pipeline::builder) to
//! construct these correctly.

use ash::vk;
use bitflags::bitflags;

use crate::pipeline::shader_code::ShaderCode;

bitflags! {
    /// Creation behavior flags.
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
    pub struct PipelineFlags: u32 {
        /// Abort with `Error::CompileRequired` instead of compiling on a
        /// shader-variant cache miss.
        const FAIL_ON_CACHE_MISS = 1 << 0;
        /// Skip the blob cache entirely, both lookup and store.
        const SKIP_BLOB_CACHE = 1 << 1;
    }
}

/// Newtype wrapper for a Vulkan vertex attribute. Implements `Hash` and `Eq`.
#[derive(Debug, Copy, Clone)]
pub struct VertexAttribute(pub(crate) vk::VertexInputAttributeDescription);

impl VertexAttribute {
    pub fn location(&self) -> u32 {
        self.0.location
    }

    pub fn binding(&self) -> u32 {
        self.0.binding
    }

    pub fn format(&self) -> vk::Format {
        self.0.format
    }

    pub fn offset(&self) -> u32 {
        self.0.offset
    }
}

/// One vertex buffer binding. Unlike the Vulkan struct this carries the
/// instance divisor directly.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct VertexBinding {
    pub binding: u32,
    pub stride: u32,
    pub input_rate: vk::VertexInputRate,
    pub divisor: u32,
}

/// Input assembly state.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct InputAssemblyDesc {
    pub topology: vk::PrimitiveTopology,
    pub primitive_restart: bool,
}

/// Tessellation state; present iff the pipeline has tessellation stages.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct TessellationDesc {
    pub patch_control_points: u32,
}

/// Rasterization state. Includes the extension states that specialize
/// shader variants (provoking vertex, conservative raster, line mode).
#[derive(Debug, Copy, Clone)]
pub struct RasterizationDesc {
    pub discard_enable: bool,
    pub depth_clamp_enable: bool,
    pub polygon_mode: vk::PolygonMode,
    pub cull_mode: vk::CullModeFlags,
    pub front_face: vk::FrontFace,
    pub depth_bias_enable: bool,
    pub depth_bias_constant_factor: f32,
    pub depth_bias_clamp: f32,
    pub depth_bias_slope_factor: f32,
    pub line_width: f32,
    pub provoking_vertex_last: bool,
    pub conservative_mode: vk::ConservativeRasterizationModeEXT,
    pub line_mode: vk::LineRasterizationModeEXT,
    pub line_stipple: Option<(u32, u16)>,
    /// Explicit out-of-order rasterization opt-in; bypasses the
    /// order-invariance analysis.
    pub order_relaxed: bool,
}

impl Default for RasterizationDesc {
    fn default() -> Self {
        Self {
            discard_enable: false,
            depth_clamp_enable: false,
            polygon_mode: vk::PolygonMode::FILL,
            cull_mode: vk::CullModeFlags::NONE,
            front_face: vk::FrontFace::COUNTER_CLOCKWISE,
            depth_bias_enable: false,
            depth_bias_constant_factor: 0.0,
            depth_bias_clamp: 0.0,
            depth_bias_slope_factor: 0.0,
            line_width: 1.0,
            provoking_vertex_last: false,
            conservative_mode: vk::ConservativeRasterizationModeEXT::DISABLED,
            line_mode: vk::LineRasterizationModeEXT::DEFAULT,
            line_stipple: None,
            order_relaxed: false,
        }
    }
}

/// Newtype wrapper for Vulkan stencil face state. Implements `Hash` and `Eq`.
#[derive(Debug, Copy, Clone)]
pub struct StencilOps(pub(crate) vk::StencilOpState);

impl StencilOps {
    pub fn disabled() -> Self {
        StencilOps(vk::StencilOpState {
            fail_op: vk::StencilOp::KEEP,
            pass_op: vk::StencilOp::KEEP,
            depth_fail_op: vk::StencilOp::KEEP,
            compare_op: vk::CompareOp::ALWAYS,
            compare_mask: 0xff,
            write_mask: 0xff,
            reference: 0,
        })
    }

    pub fn inner(&self) -> &vk::StencilOpState {
        &self.0
    }
}

/// Depth/stencil state.
#[derive(Debug, Copy, Clone)]
pub struct DepthStencilDesc {
    pub depth_test_enable: bool,
    pub depth_write_enable: bool,
    pub depth_compare_op: vk::CompareOp,
    pub depth_bounds_test_enable: bool,
    pub stencil_test_enable: bool,
    pub front: StencilOps,
    pub back: StencilOps,
    pub min_depth_bounds: f32,
    pub max_depth_bounds: f32,
}

impl Default for DepthStencilDesc {
    fn default() -> Self {
        Self {
            depth_test_enable: false,
            depth_write_enable: false,
            depth_compare_op: vk::CompareOp::NEVER,
            depth_bounds_test_enable: false,
            stencil_test_enable: false,
            front: StencilOps::disabled(),
            back: StencilOps::disabled(),
            min_depth_bounds: 0.0,
            max_depth_bounds: 1.0,
        }
    }
}

/// Multisample state. The sample mask is stored by value.
#[derive(Debug, Copy, Clone)]
pub struct MultisampleDesc {
    pub samples: u32,
    pub sample_shading_enable: bool,
    pub min_sample_shading: f32,
    pub sample_mask: u32,
    pub alpha_to_coverage: bool,
    pub alpha_to_one: bool,
    pub sample_locations_enable: bool,
}

impl Default for MultisampleDesc {
    fn default() -> Self {
        Self {
            samples: 1,
            sample_shading_enable: false,
            min_sample_shading: 0.0,
            sample_mask: !0u32,
            alpha_to_coverage: false,
            alpha_to_one: false,
            sample_locations_enable: false,
        }
    }
}

/// Newtype wrapper for Vulkan per-attachment blend state. Implements `Hash`
/// and `Eq`.
#[derive(Debug, Copy, Clone)]
pub struct BlendAttachment(pub(crate) vk::PipelineColorBlendAttachmentState);

impl BlendAttachment {
    /// Write-through attachment: blending off, all channels written.
    pub fn none() -> Self {
        BlendAttachment(vk::PipelineColorBlendAttachmentState {
            blend_enable: vk::FALSE,
            src_color_blend_factor: vk::BlendFactor::ONE,
            dst_color_blend_factor: vk::BlendFactor::ZERO,
            color_blend_op: vk::BlendOp::ADD,
            src_alpha_blend_factor: vk::BlendFactor::ONE,
            dst_alpha_blend_factor: vk::BlendFactor::ZERO,
            alpha_blend_op: vk::BlendOp::ADD,
            color_write_mask: vk::ColorComponentFlags::RGBA,
        })
    }

    pub fn inner(&self) -> &vk::PipelineColorBlendAttachmentState {
        &self.0
    }
}

/// Whole-pipeline blend state.
#[derive(Debug, Clone)]
pub struct BlendDesc {
    pub logic_op_enable: bool,
    pub logic_op: vk::LogicOp,
    pub attachments: Vec<BlendAttachment>,
    pub constants: [f32; 4],
    /// Bit per attachment; cleared bits behave as a zero write mask.
    pub color_write_enables: u32,
}

impl Default for BlendDesc {
    fn default() -> Self {
        Self {
            logic_op_enable: false,
            logic_op: vk::LogicOp::COPY,
            attachments: Vec::new(),
            constants: [0.0; 4],
            color_write_enables: !0u32,
        }
    }
}

/// Render target description (dynamic-rendering style).
#[derive(Debug, Clone, Hash, PartialEq, Eq, Default)]
pub struct RenderingInfo {
    pub view_mask: u32,
    pub color_formats: Vec<vk::Format>,
    pub depth_format: Option<vk::Format>,
    pub stencil_format: Option<vk::Format>,
}

/// Static fragment shading rate state.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct FragmentShadingRateDesc {
    pub width: u32,
    pub height: u32,
    pub combiners: [vk::FragmentShadingRateCombinerOpKHR; 2],
}

impl Default for FragmentShadingRateDesc {
    fn default() -> Self {
        Self {
            width: 1,
            height: 1,
            combiners: [vk::FragmentShadingRateCombinerOpKHR::KEEP; 2],
        }
    }
}

/// Defines a full graphics pipeline. Use
/// [`GraphicsPipelineBuilder`](crate::GraphicsPipelineBuilder) to construct
/// this properly.
#[derive(Debug, Clone, Derivative)]
#[derivative(PartialEq, Eq, Hash)]
pub struct GraphicsPipelineCreateInfo {
    /// The shaders used in this pipeline.
    pub shaders: Vec<ShaderCode>,
    pub(crate) name: String,
    pub(crate) flags: PipelineFlags,
    pub(crate) vertex_bindings: Vec<VertexBinding>,
    pub(crate) vertex_attributes: Vec<VertexAttribute>,
    pub(crate) input_assembly: InputAssemblyDesc,
    pub(crate) tessellation: Option<TessellationDesc>,
    pub(crate) rasterization: RasterizationDesc,
    pub(crate) depth_stencil: DepthStencilDesc,
    pub(crate) multisample: MultisampleDesc,
    pub(crate) blend: BlendDesc,
    pub(crate) viewport_count: u32,
    pub(crate) rendering_info: RenderingInfo,
    pub(crate) shading_rate: Option<FragmentShadingRateDesc>,
    pub(crate) dynamic_states: Vec<vk::DynamicState>,
    pub(crate) discard_rectangle_count: u32,
}

impl GraphicsPipelineCreateInfo {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dynamic_states(&self) -> &[vk::DynamicState] {
        &self.dynamic_states
    }

    pub fn has_dynamic_state(&self, state: vk::DynamicState) -> bool {
        self.dynamic_states.contains(&state)
    }

    pub fn rendering_info(&self) -> &RenderingInfo {
        &self.rendering_info
    }
}

/// Defines a compute pipeline. Use
/// [`ComputePipelineBuilder`](crate::ComputePipelineBuilder) to construct
/// this.
#[derive(Debug, Clone, Derivative)]
#[derivative(PartialEq, Eq, Hash)]
pub struct ComputePipelineCreateInfo {
    /// The shader used in this compute pipeline.
    pub shader: Option<ShaderCode>,
    pub(crate) name: String,
    pub(crate) flags: PipelineFlags,
    pub(crate) required_subgroup_size: Option<u32>,
    pub(crate) require_full_subgroups: bool,
}

impl ComputePipelineCreateInfo {
    pub fn name(&self) -> &str {
        &self.name
    }
}
