//! Builders for pipeline create infos.
//!
//! The builders enforce the small invariants the raw structs cannot: vertex
//! attributes reference existing bindings and get packed offsets, and every
//! state block has a defined default.

use std::collections::HashMap;

use anyhow::Result;
use ash::vk;

use crate::core::error::Error;
use crate::pipeline::create_info::*;
use crate::pipeline::shader_code::ShaderCode;

/// Byte size of a vertex attribute format, for automatic offset packing.
fn attrib_size(format: vk::Format) -> u32 {
    match format {
        vk::Format::R8_UNORM | vk::Format::R8_SNORM | vk::Format::R8_UINT | vk::Format::R8_SINT => 1,
        vk::Format::R8G8_UNORM | vk::Format::R8G8_SNORM | vk::Format::R8G8_UINT
        | vk::Format::R8G8_SINT | vk::Format::R16_SFLOAT | vk::Format::R16_UNORM
        | vk::Format::R16_UINT | vk::Format::R16_SINT => 2,
        vk::Format::R8G8B8A8_UNORM
        | vk::Format::R8G8B8A8_SNORM
        | vk::Format::R8G8B8A8_UINT
        | vk::Format::R8G8B8A8_SINT
        | vk::Format::B8G8R8A8_UNORM
        | vk::Format::R16G16_SFLOAT
        | vk::Format::R16G16_UNORM
        | vk::Format::R32_SFLOAT
        | vk::Format::R32_UINT
        | vk::Format::R32_SINT
        | vk::Format::A2B10G10R10_UNORM_PACK32
        | vk::Format::A2R10G10B10_SNORM_PACK32
        | vk::Format::A2R10G10B10_SSCALED_PACK32
        | vk::Format::B10G11R11_UFLOAT_PACK32 => 4,
        vk::Format::R16G16B16A16_SFLOAT | vk::Format::R32G32_SFLOAT | vk::Format::R32G32_UINT => 8,
        vk::Format::R32G32B32_SFLOAT => 12,
        vk::Format::R32G32B32A32_SFLOAT | vk::Format::R32G32B32A32_UINT => 16,
        _ => 4,
    }
}

/// Used to facilitate creating a graphics pipeline create info.
#[derive(Debug)]
pub struct GraphicsPipelineBuilder {
    inner: GraphicsPipelineCreateInfo,
    vertex_binding_offsets: HashMap<u32, u32>,
}

impl GraphicsPipelineBuilder {
    /// Create a new pipeline description with default settings for
    /// everything.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: GraphicsPipelineCreateInfo {
                shaders: vec![],
                name: name.into(),
                flags: PipelineFlags::empty(),
                vertex_bindings: vec![],
                vertex_attributes: vec![],
                input_assembly: InputAssemblyDesc {
                    topology: vk::PrimitiveTopology::TRIANGLE_LIST,
                    primitive_restart: false,
                },
                tessellation: None,
                rasterization: RasterizationDesc::default(),
                depth_stencil: DepthStencilDesc::default(),
                multisample: MultisampleDesc::default(),
                blend: BlendDesc::default(),
                viewport_count: 1,
                rendering_info: RenderingInfo::default(),
                shading_rate: None,
                dynamic_states: vec![],
                discard_rectangle_count: 0,
            },
            vertex_binding_offsets: HashMap::new(),
        }
    }

    pub fn flags(mut self, flags: PipelineFlags) -> Self {
        self.inner.flags |= flags;
        self
    }

    /// Add a vertex input binding. Attributes must be added after their
    /// binding.
    pub fn vertex_input(mut self, binding: u32, rate: vk::VertexInputRate) -> Self {
        self.inner.vertex_bindings.push(VertexBinding {
            binding,
            stride: 0,
            input_rate: rate,
            divisor: 1,
        });
        self.vertex_binding_offsets.insert(binding, 0);
        self
    }

    /// Set the instance divisor of an existing binding.
    pub fn vertex_divisor(mut self, binding: u32, divisor: u32) -> Result<Self> {
        let b = self
            .inner
            .vertex_bindings
            .iter_mut()
            .find(|b| b.binding == binding)
            .ok_or(Error::NoVertexBinding)?;
        b.divisor = divisor;
        Ok(self)
    }

    /// Append a vertex attribute to a binding; the offset and the binding
    /// stride grow by the attribute size.
    /// # Errors
    /// Fails if the binding does not exist.
    pub fn vertex_attribute(
        mut self,
        binding: u32,
        location: u32,
        format: vk::Format,
    ) -> Result<Self> {
        let offset = self
            .vertex_binding_offsets
            .get_mut(&binding)
            .ok_or(Error::NoVertexBinding)?;
        self.inner.vertex_attributes.push(VertexAttribute(
            vk::VertexInputAttributeDescription {
                location,
                binding,
                format,
                offset: *offset,
            },
        ));
        let size = attrib_size(format);
        *offset += size;
        let b = self
            .inner
            .vertex_bindings
            .iter_mut()
            .find(|b| b.binding == binding)
            .ok_or(Error::NoVertexBinding)?;
        b.stride += size;
        Ok(self)
    }

    pub fn topology(mut self, topology: vk::PrimitiveTopology) -> Self {
        self.inner.input_assembly.topology = topology;
        self
    }

    pub fn primitive_restart(mut self, enable: bool) -> Self {
        self.inner.input_assembly.primitive_restart = enable;
        self
    }

    pub fn tessellation(mut self, patch_control_points: u32) -> Self {
        self.inner.tessellation = Some(TessellationDesc {
            patch_control_points,
        });
        self
    }

    pub fn polygon_mode(mut self, mode: vk::PolygonMode) -> Self {
        self.inner.rasterization.polygon_mode = mode;
        self
    }

    pub fn cull_mask(mut self, mask: vk::CullModeFlags) -> Self {
        self.inner.rasterization.cull_mode = mask;
        self
    }

    pub fn front_face(mut self, face: vk::FrontFace) -> Self {
        self.inner.rasterization.front_face = face;
        self
    }

    pub fn rasterizer_discard(mut self, enable: bool) -> Self {
        self.inner.rasterization.discard_enable = enable;
        self
    }

    pub fn depth_clamp(mut self, enable: bool) -> Self {
        self.inner.rasterization.depth_clamp_enable = enable;
        self
    }

    pub fn depth_bias(mut self, constant: f32, clamp: f32, slope: f32) -> Self {
        self.inner.rasterization.depth_bias_enable = true;
        self.inner.rasterization.depth_bias_constant_factor = constant;
        self.inner.rasterization.depth_bias_clamp = clamp;
        self.inner.rasterization.depth_bias_slope_factor = slope;
        self
    }

    pub fn provoking_vertex_last(mut self, enable: bool) -> Self {
        self.inner.rasterization.provoking_vertex_last = enable;
        self
    }

    pub fn conservative_raster(mut self, mode: vk::ConservativeRasterizationModeEXT) -> Self {
        self.inner.rasterization.conservative_mode = mode;
        self
    }

    pub fn line_mode(mut self, mode: vk::LineRasterizationModeEXT) -> Self {
        self.inner.rasterization.line_mode = mode;
        self
    }

    pub fn line_stipple(mut self, factor: u32, pattern: u16) -> Self {
        self.inner.rasterization.line_stipple = Some((factor, pattern));
        self
    }

    /// Promise the driver that rasterization order does not matter for the
    /// output of this pipeline.
    pub fn relaxed_rasterization_order(mut self) -> Self {
        self.inner.rasterization.order_relaxed = true;
        self
    }

    pub fn depth(mut self, test: bool, write: bool, op: vk::CompareOp) -> Self {
        self.inner.depth_stencil.depth_test_enable = test;
        self.inner.depth_stencil.depth_write_enable = write;
        self.inner.depth_stencil.depth_compare_op = op;
        self
    }

    pub fn depth_bounds(mut self, min: f32, max: f32) -> Self {
        self.inner.depth_stencil.depth_bounds_test_enable = true;
        self.inner.depth_stencil.min_depth_bounds = min;
        self.inner.depth_stencil.max_depth_bounds = max;
        self
    }

    pub fn stencil(mut self, front: vk::StencilOpState, back: vk::StencilOpState) -> Self {
        self.inner.depth_stencil.stencil_test_enable = true;
        self.inner.depth_stencil.front = StencilOps(front);
        self.inner.depth_stencil.back = StencilOps(back);
        self
    }

    pub fn samples(mut self, samples: u32) -> Self {
        self.inner.multisample.samples = samples;
        self
    }

    pub fn sample_shading(mut self, min_sample_shading: f32) -> Self {
        self.inner.multisample.sample_shading_enable = true;
        self.inner.multisample.min_sample_shading = min_sample_shading;
        self
    }

    pub fn sample_mask(mut self, mask: u32) -> Self {
        self.inner.multisample.sample_mask = mask;
        self
    }

    pub fn alpha_to_coverage(mut self, enable: bool) -> Self {
        self.inner.multisample.alpha_to_coverage = enable;
        self
    }

    /// Add a color attachment with blending disabled and all channels
    /// written.
    pub fn blend_attachment_none(mut self) -> Self {
        self.inner.blend.attachments.push(BlendAttachment::none());
        self
    }

    /// Add a color attachment with the given blend description.
    pub fn blend_attachment(mut self, attachment: vk::PipelineColorBlendAttachmentState) -> Self {
        self.inner.blend.attachments.push(BlendAttachment(attachment));
        self
    }

    /// Additive blending weighted by source alpha, the common transparency
    /// setup.
    pub fn blend_additive_unmasked(mut self) -> Self {
        self.inner.blend.attachments.push(BlendAttachment(
            vk::PipelineColorBlendAttachmentState {
                blend_enable: vk::TRUE,
                src_color_blend_factor: vk::BlendFactor::SRC_ALPHA,
                dst_color_blend_factor: vk::BlendFactor::ONE,
                color_blend_op: vk::BlendOp::ADD,
                src_alpha_blend_factor: vk::BlendFactor::ONE,
                dst_alpha_blend_factor: vk::BlendFactor::ONE,
                alpha_blend_op: vk::BlendOp::ADD,
                color_write_mask: vk::ColorComponentFlags::RGBA,
            },
        ));
        self
    }

    pub fn logic_op(mut self, op: vk::LogicOp) -> Self {
        self.inner.blend.logic_op_enable = true;
        self.inner.blend.logic_op = op;
        self
    }

    pub fn blend_constants(mut self, constants: [f32; 4]) -> Self {
        self.inner.blend.constants = constants;
        self
    }

    pub fn color_format(mut self, format: vk::Format) -> Self {
        self.inner.rendering_info.color_formats.push(format);
        self
    }

    pub fn depth_format(mut self, format: vk::Format) -> Self {
        self.inner.rendering_info.depth_format = Some(format);
        self
    }

    pub fn stencil_format(mut self, format: vk::Format) -> Self {
        self.inner.rendering_info.stencil_format = Some(format);
        self
    }

    pub fn view_mask(mut self, mask: u32) -> Self {
        self.inner.rendering_info.view_mask = mask;
        self
    }

    pub fn shading_rate(mut self, desc: FragmentShadingRateDesc) -> Self {
        self.inner.shading_rate = Some(desc);
        self
    }

    pub fn discard_rectangles(mut self, count: u32) -> Self {
        self.inner.discard_rectangle_count = count;
        self
    }

    pub fn dynamic_states(mut self, states: &[vk::DynamicState]) -> Self {
        self.inner.dynamic_states = states.to_vec();
        self
    }

    pub fn attach_shader(mut self, shader: ShaderCode) -> Self {
        self.inner.shaders.push(shader);
        self
    }

    /// Obtain the pipeline name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn build(self) -> GraphicsPipelineCreateInfo {
        self.inner
    }
}

/// Builder struct similar to [`GraphicsPipelineBuilder`], but for compute
/// pipelines. Since compute pipelines are much simpler, there is much less
/// work to do when building one.
#[derive(Debug)]
pub struct ComputePipelineBuilder {
    inner: ComputePipelineCreateInfo,
}

impl ComputePipelineBuilder {
    /// Create a new compute pipeline with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: ComputePipelineCreateInfo {
                shader: None,
                name: name.into(),
                flags: PipelineFlags::empty(),
                required_subgroup_size: None,
                require_full_subgroups: false,
            },
        }
    }

    pub fn flags(mut self, flags: PipelineFlags) -> Self {
        self.inner.flags |= flags;
        self
    }

    /// Set the compute shader that will be used for this pipeline. Note
    /// that compute pipelines can only have one shader.
    pub fn set_shader(mut self, shader: ShaderCode) -> Self {
        self.inner.shader = Some(shader);
        self
    }

    /// Force the subgroup size the shader runs with.
    pub fn required_subgroup_size(mut self, size: u32) -> Self {
        self.inner.required_subgroup_size = Some(size);
        self
    }

    /// Require that no partial subgroups appear in a workgroup.
    pub fn require_full_subgroups(mut self) -> Self {
        self.inner.require_full_subgroups = true;
        self
    }

    /// Obtain the pipeline name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn build(self) -> ComputePipelineCreateInfo {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attribute_offsets_pack() {
        let info = GraphicsPipelineBuilder::new("t")
            .vertex_input(0, vk::VertexInputRate::VERTEX)
            .vertex_attribute(0, 0, vk::Format::R32G32_SFLOAT)
            .unwrap()
            .vertex_attribute(0, 1, vk::Format::R32G32_SFLOAT)
            .unwrap()
            .build();
        assert_eq!(info.vertex_attributes[0].offset(), 0);
        assert_eq!(info.vertex_attributes[1].offset(), 8);
        assert_eq!(info.vertex_bindings[0].stride, 16);
    }

    #[test]
    fn attribute_without_binding_fails() {
        let r = GraphicsPipelineBuilder::new("t").vertex_attribute(0, 0, vk::Format::R32_SFLOAT);
        assert!(r.is_err());
    }
}
