use std::hash::{Hash, Hasher};

use crate::pipeline::create_info::{
    BlendAttachment, BlendDesc, DepthStencilDesc, MultisampleDesc, RasterizationDesc, StencilOps,
    VertexAttribute,
};
use crate::pipeline::shader_code::ShaderCode;

impl Hash for ShaderCode {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write(&self.id())
    }
}

impl PartialEq<Self> for ShaderCode {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for ShaderCode {}

impl Hash for VertexAttribute {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.location.hash(state);
        self.0.binding.hash(state);
        self.0.format.hash(state);
        self.0.offset.hash(state);
    }
}

impl PartialEq<Self> for VertexAttribute {
    fn eq(&self, other: &Self) -> bool {
        self.0.location == other.0.location
            && self.0.binding == other.0.binding
            && self.0.format == other.0.format
            && self.0.offset == other.0.offset
    }
}

impl Hash for StencilOps {
    fn hash<H: Hasher>(&self, hasher: &mut H) {
        self.0.fail_op.hash(hasher);
        self.0.pass_op.hash(hasher);
        self.0.depth_fail_op.hash(hasher);
        self.0.compare_op.hash(hasher);
        self.0.compare_mask.hash(hasher);
        self.0.write_mask.hash(hasher);
        self.0.reference.hash(hasher);
    }
}

impl PartialEq<Self> for StencilOps {
    fn eq(&self, other: &Self) -> bool {
        self.0.fail_op == other.0.fail_op
            && self.0.pass_op == other.0.pass_op
            && self.0.depth_fail_op == other.0.depth_fail_op
            && self.0.compare_op == other.0.compare_op
            && self.0.compare_mask == other.0.compare_mask
            && self.0.write_mask == other.0.write_mask
            && self.0.reference == other.0.reference
    }
}

impl Hash for BlendAttachment {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.blend_enable.hash(state);
        self.0.src_color_blend_factor.hash(state);
        self.0.dst_color_blend_factor.hash(state);
        self.0.color_blend_op.hash(state);
        self.0.src_alpha_blend_factor.hash(state);
        self.0.dst_alpha_blend_factor.hash(state);
        self.0.alpha_blend_op.hash(state);
        self.0.color_write_mask.hash(state);
    }
}

impl PartialEq<Self> for BlendAttachment {
    fn eq(&self, other: &Self) -> bool {
        self.0.blend_enable == other.0.blend_enable
            && self.0.src_color_blend_factor == other.0.src_color_blend_factor
            && self.0.dst_color_blend_factor == other.0.dst_color_blend_factor
            && self.0.color_blend_op == other.0.color_blend_op
            && self.0.src_alpha_blend_factor == other.0.src_alpha_blend_factor
            && self.0.dst_alpha_blend_factor == other.0.dst_alpha_blend_factor
            && self.0.alpha_blend_op == other.0.alpha_blend_op
            && self.0.color_write_mask == other.0.color_write_mask
    }
}

impl Hash for RasterizationDesc {
    fn hash<H: Hasher>(&self, hasher: &mut H) {
        self.discard_enable.hash(hasher);
        self.depth_clamp_enable.hash(hasher);
        self.polygon_mode.hash(hasher);
        self.cull_mode.hash(hasher);
        self.front_face.hash(hasher);
        self.depth_bias_enable.hash(hasher);
        self.depth_bias_constant_factor.to_bits().hash(hasher);
        self.depth_bias_clamp.to_bits().hash(hasher);
        self.depth_bias_slope_factor.to_bits().hash(hasher);
        self.line_width.to_bits().hash(hasher);
        self.provoking_vertex_last.hash(hasher);
        self.conservative_mode.hash(hasher);
        self.line_mode.hash(hasher);
        self.line_stipple.hash(hasher);
        self.order_relaxed.hash(hasher);
    }
}

impl PartialEq<Self> for RasterizationDesc {
    fn eq(&self, other: &Self) -> bool {
        self.discard_enable == other.discard_enable
            && self.depth_clamp_enable == other.depth_clamp_enable
            && self.polygon_mode == other.polygon_mode
            && self.cull_mode == other.cull_mode
            && self.front_face == other.front_face
            && self.depth_bias_enable == other.depth_bias_enable
            && self.depth_bias_constant_factor.to_bits() == other.depth_bias_constant_factor.to_bits()
            && self.depth_bias_clamp.to_bits() == other.depth_bias_clamp.to_bits()
            && self.depth_bias_slope_factor.to_bits() == other.depth_bias_slope_factor.to_bits()
            && self.line_width.to_bits() == other.line_width.to_bits()
            && self.provoking_vertex_last == other.provoking_vertex_last
            && self.conservative_mode == other.conservative_mode
            && self.line_mode == other.line_mode
            && self.line_stipple == other.line_stipple
            && self.order_relaxed == other.order_relaxed
    }
}

impl Hash for DepthStencilDesc {
    fn hash<H: Hasher>(&self, hasher: &mut H) {
        self.depth_test_enable.hash(hasher);
        self.depth_write_enable.hash(hasher);
        self.depth_compare_op.hash(hasher);
        self.depth_bounds_test_enable.hash(hasher);
        self.stencil_test_enable.hash(hasher);
        self.front.hash(hasher);
        self.back.hash(hasher);
        self.min_depth_bounds.to_bits().hash(hasher);
        self.max_depth_bounds.to_bits().hash(hasher);
    }
}

impl PartialEq<Self> for DepthStencilDesc {
    fn eq(&self, other: &Self) -> bool {
        self.depth_test_enable == other.depth_test_enable
            && self.depth_write_enable == other.depth_write_enable
            && self.depth_compare_op == other.depth_compare_op
            && self.depth_bounds_test_enable == other.depth_bounds_test_enable
            && self.stencil_test_enable == other.stencil_test_enable
            && self.front == other.front
            && self.back == other.back
            && self.min_depth_bounds.to_bits() == other.min_depth_bounds.to_bits()
            && self.max_depth_bounds.to_bits() == other.max_depth_bounds.to_bits()
    }
}

impl Hash for MultisampleDesc {
    fn hash<H: Hasher>(&self, hasher: &mut H) {
        self.samples.hash(hasher);
        self.sample_shading_enable.hash(hasher);
        self.min_sample_shading.to_bits().hash(hasher);
        self.sample_mask.hash(hasher);
        self.alpha_to_coverage.hash(hasher);
        self.alpha_to_one.hash(hasher);
        self.sample_locations_enable.hash(hasher);
    }
}

impl PartialEq<Self> for MultisampleDesc {
    fn eq(&self, other: &Self) -> bool {
        self.samples == other.samples
            && self.sample_shading_enable == other.sample_shading_enable
            && self.min_sample_shading.to_bits() == other.min_sample_shading.to_bits()
            && self.sample_mask == other.sample_mask
            && self.alpha_to_coverage == other.alpha_to_coverage
            && self.alpha_to_one == other.alpha_to_one
            && self.sample_locations_enable == other.sample_locations_enable
    }
}

impl Hash for BlendDesc {
    fn hash<H: Hasher>(&self, hasher: &mut H) {
        self.logic_op_enable.hash(hasher);
        self.logic_op.hash(hasher);
        self.attachments.hash(hasher);
        for c in &self.constants {
            c.to_bits().hash(hasher);
        }
        self.color_write_enables.hash(hasher);
    }
}

impl PartialEq<Self> for BlendDesc {
    fn eq(&self, other: &Self) -> bool {
        self.logic_op_enable == other.logic_op_enable
            && self.logic_op == other.logic_op
            && self.attachments == other.attachments
            && self.constants.iter().map(|c| c.to_bits()).eq(other.constants.iter().map(|c| c.to_bits()))
            && self.color_write_enables == other.color_write_enables
    }
}

impl Eq for VertexAttribute {}
impl Eq for StencilOps {}
impl Eq for BlendAttachment {}
impl Eq for RasterizationDesc {}
impl Eq for DepthStencilDesc {}
impl Eq for MultisampleDesc {}
impl Eq for BlendDesc {}
