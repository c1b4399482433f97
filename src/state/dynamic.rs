//! Resolution of which states stay dynamic.
//!
//! Starts from "everything may be dynamic" and prunes states that are
//! unreachable given the static configuration, then intersects with the
//! opt-ins the caller actually listed. The result tells the command
//! recorder which state-set commands it must emit per draw and which are
//! baked into the pipeline's register streams.

use ash::vk;
use bitflags::bitflags;

use crate::pipeline::create_info::GraphicsPipelineCreateInfo;

bitflags! {
    /// One bit per dynamic-state family.
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
    pub struct DynamicStates: u64 {
        const VIEWPORT = 1 << 0;
        const SCISSOR = 1 << 1;
        const LINE_WIDTH = 1 << 2;
        const DEPTH_BIAS = 1 << 3;
        const BLEND_CONSTANTS = 1 << 4;
        const DEPTH_BOUNDS = 1 << 5;
        const STENCIL_COMPARE_MASK = 1 << 6;
        const STENCIL_WRITE_MASK = 1 << 7;
        const STENCIL_REFERENCE = 1 << 8;
        const CULL_MODE = 1 << 9;
        const FRONT_FACE = 1 << 10;
        const PRIMITIVE_TOPOLOGY = 1 << 11;
        const VERTEX_INPUT_BINDING_STRIDE = 1 << 12;
        const DEPTH_TEST_ENABLE = 1 << 13;
        const DEPTH_WRITE_ENABLE = 1 << 14;
        const DEPTH_COMPARE_OP = 1 << 15;
        const DEPTH_BOUNDS_TEST_ENABLE = 1 << 16;
        const STENCIL_TEST_ENABLE = 1 << 17;
        const STENCIL_OP = 1 << 18;
        const RASTERIZER_DISCARD_ENABLE = 1 << 19;
        const DEPTH_BIAS_ENABLE = 1 << 20;
        const PRIMITIVE_RESTART_ENABLE = 1 << 21;
        const VERTEX_INPUT = 1 << 22;
        const DISCARD_RECTANGLE = 1 << 23;
        const SAMPLE_LOCATIONS = 1 << 24;
        const LINE_STIPPLE = 1 << 25;
        const FRAGMENT_SHADING_RATE = 1 << 26;
        const COLOR_WRITE_ENABLE = 1 << 27;
        const LOGIC_OP = 1 << 28;
        const PATCH_CONTROL_POINTS = 1 << 29;
    }
}

/// Resolved dynamic state of a pipeline.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct DynamicStateMask {
    /// States that are reachable for this pipeline at all.
    pub allowed: DynamicStates,
    /// States the recorder must set per draw: reachable and opted into.
    pub dynamic: DynamicStates,
}

impl DynamicStateMask {
    /// States baked into the register streams.
    pub fn is_static(&self, state: DynamicStates) -> bool {
        !self.dynamic.intersects(state)
    }
}

fn from_vk(state: vk::DynamicState) -> DynamicStates {
    match state {
        vk::DynamicState::VIEWPORT | vk::DynamicState::VIEWPORT_WITH_COUNT => {
            DynamicStates::VIEWPORT
        }
        vk::DynamicState::SCISSOR | vk::DynamicState::SCISSOR_WITH_COUNT => DynamicStates::SCISSOR,
        vk::DynamicState::LINE_WIDTH => DynamicStates::LINE_WIDTH,
        vk::DynamicState::DEPTH_BIAS => DynamicStates::DEPTH_BIAS,
        vk::DynamicState::BLEND_CONSTANTS => DynamicStates::BLEND_CONSTANTS,
        vk::DynamicState::DEPTH_BOUNDS => DynamicStates::DEPTH_BOUNDS,
        vk::DynamicState::STENCIL_COMPARE_MASK => DynamicStates::STENCIL_COMPARE_MASK,
        vk::DynamicState::STENCIL_WRITE_MASK => DynamicStates::STENCIL_WRITE_MASK,
        vk::DynamicState::STENCIL_REFERENCE => DynamicStates::STENCIL_REFERENCE,
        vk::DynamicState::CULL_MODE => DynamicStates::CULL_MODE,
        vk::DynamicState::FRONT_FACE => DynamicStates::FRONT_FACE,
        vk::DynamicState::PRIMITIVE_TOPOLOGY => DynamicStates::PRIMITIVE_TOPOLOGY,
        vk::DynamicState::VERTEX_INPUT_BINDING_STRIDE => {
            DynamicStates::VERTEX_INPUT_BINDING_STRIDE
        }
        vk::DynamicState::DEPTH_TEST_ENABLE => DynamicStates::DEPTH_TEST_ENABLE,
        vk::DynamicState::DEPTH_WRITE_ENABLE => DynamicStates::DEPTH_WRITE_ENABLE,
        vk::DynamicState::DEPTH_COMPARE_OP => DynamicStates::DEPTH_COMPARE_OP,
        vk::DynamicState::DEPTH_BOUNDS_TEST_ENABLE => DynamicStates::DEPTH_BOUNDS_TEST_ENABLE,
        vk::DynamicState::STENCIL_TEST_ENABLE => DynamicStates::STENCIL_TEST_ENABLE,
        vk::DynamicState::STENCIL_OP => DynamicStates::STENCIL_OP,
        vk::DynamicState::RASTERIZER_DISCARD_ENABLE => DynamicStates::RASTERIZER_DISCARD_ENABLE,
        vk::DynamicState::DEPTH_BIAS_ENABLE => DynamicStates::DEPTH_BIAS_ENABLE,
        vk::DynamicState::PRIMITIVE_RESTART_ENABLE => DynamicStates::PRIMITIVE_RESTART_ENABLE,
        vk::DynamicState::VERTEX_INPUT_EXT => DynamicStates::VERTEX_INPUT,
        vk::DynamicState::DISCARD_RECTANGLE_EXT => DynamicStates::DISCARD_RECTANGLE,
        vk::DynamicState::SAMPLE_LOCATIONS_EXT => DynamicStates::SAMPLE_LOCATIONS,
        vk::DynamicState::LINE_STIPPLE_EXT => DynamicStates::LINE_STIPPLE,
        vk::DynamicState::FRAGMENT_SHADING_RATE_KHR => DynamicStates::FRAGMENT_SHADING_RATE,
        vk::DynamicState::COLOR_WRITE_ENABLE_EXT => DynamicStates::COLOR_WRITE_ENABLE,
        vk::DynamicState::LOGIC_OP_EXT => DynamicStates::LOGIC_OP,
        vk::DynamicState::PATCH_CONTROL_POINTS_EXT => DynamicStates::PATCH_CONTROL_POINTS,
        _ => DynamicStates::empty(),
    }
}

/// Compute the dynamic-state mask for a graphics pipeline.
pub fn resolve(info: &GraphicsPipelineCreateInfo, is_mesh: bool) -> DynamicStateMask {
    let mut requested = DynamicStates::empty();
    for s in info.dynamic_states() {
        requested |= from_vk(*s);
    }

    let discard_dynamic = requested.contains(DynamicStates::RASTERIZER_DISCARD_ENABLE);

    // With rasterization statically off, only the pre-rasterization states
    // can ever matter.
    let mut allowed = if info.rasterization.discard_enable && !discard_dynamic {
        DynamicStates::PRIMITIVE_TOPOLOGY
            | DynamicStates::PRIMITIVE_RESTART_ENABLE
            | DynamicStates::VERTEX_INPUT_BINDING_STRIDE
            | DynamicStates::RASTERIZER_DISCARD_ENABLE
            | DynamicStates::VERTEX_INPUT
    } else {
        let mut allowed = DynamicStates::all();

        if !info.rasterization.depth_bias_enable
            && !requested.contains(DynamicStates::DEPTH_BIAS_ENABLE)
        {
            allowed &= !DynamicStates::DEPTH_BIAS;
        }
        if !info.depth_stencil.depth_bounds_test_enable
            && !requested.contains(DynamicStates::DEPTH_BOUNDS_TEST_ENABLE)
        {
            allowed &= !DynamicStates::DEPTH_BOUNDS;
        }
        if !info.depth_stencil.stencil_test_enable
            && !requested.contains(DynamicStates::STENCIL_TEST_ENABLE)
        {
            allowed &= !(DynamicStates::STENCIL_COMPARE_MASK
                | DynamicStates::STENCIL_WRITE_MASK
                | DynamicStates::STENCIL_REFERENCE);
        }
        if info.discard_rectangle_count == 0 {
            allowed &= !DynamicStates::DISCARD_RECTANGLE;
        }
        if !info.multisample.sample_locations_enable {
            allowed &= !DynamicStates::SAMPLE_LOCATIONS;
        }
        if info.rasterization.line_stipple.is_none() {
            allowed &= !DynamicStates::LINE_STIPPLE;
        }
        if info.shading_rate.is_none()
            && !requested.contains(DynamicStates::FRAGMENT_SHADING_RATE)
        {
            allowed &= !DynamicStates::FRAGMENT_SHADING_RATE;
        }
        let any_blend = info
            .blend
            .attachments
            .iter()
            .any(|a| a.0.blend_enable != vk::FALSE);
        if !any_blend {
            allowed &= !DynamicStates::BLEND_CONSTANTS;
        }
        if !info.blend.logic_op_enable && !requested.contains(DynamicStates::LOGIC_OP) {
            allowed &= !DynamicStates::LOGIC_OP;
        }
        if info.rendering_info.color_formats.is_empty() {
            allowed &= !DynamicStates::COLOR_WRITE_ENABLE;
        }
        allowed
    };

    // Mesh pipelines have no vertex input or input assembly at all.
    if is_mesh {
        allowed &= !(DynamicStates::VERTEX_INPUT
            | DynamicStates::VERTEX_INPUT_BINDING_STRIDE
            | DynamicStates::PRIMITIVE_RESTART_ENABLE
            | DynamicStates::PRIMITIVE_TOPOLOGY);
    }

    DynamicStateMask {
        allowed,
        dynamic: allowed & requested,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::builder::GraphicsPipelineBuilder;

    #[test]
    fn static_discard_leaves_only_preraster_states() {
        let mut info = GraphicsPipelineBuilder::new("t").build();
        info.rasterization.discard_enable = true;
        info.dynamic_states = vec![
            vk::DynamicState::DEPTH_BIAS,
            vk::DynamicState::PRIMITIVE_TOPOLOGY,
        ];
        let mask = resolve(&info, false);
        assert!(!mask.allowed.contains(DynamicStates::DEPTH_BIAS));
        assert!(mask.dynamic.contains(DynamicStates::PRIMITIVE_TOPOLOGY));
    }

    #[test]
    fn depth_bias_pruned_unless_enabled_somewhere() {
        let info = GraphicsPipelineBuilder::new("t")
            .dynamic_states(&[vk::DynamicState::DEPTH_BIAS])
            .build();
        let mask = resolve(&info, false);
        assert!(!mask.dynamic.contains(DynamicStates::DEPTH_BIAS));

        let info = GraphicsPipelineBuilder::new("t")
            .dynamic_states(&[
                vk::DynamicState::DEPTH_BIAS,
                vk::DynamicState::DEPTH_BIAS_ENABLE,
            ])
            .build();
        let mask = resolve(&info, false);
        assert!(mask.dynamic.contains(DynamicStates::DEPTH_BIAS));
    }

    #[test]
    fn opt_ins_are_monotone() {
        // Adding an opt-in may only grow the dynamic set.
        let base = GraphicsPipelineBuilder::new("t")
            .dynamic_states(&[vk::DynamicState::VIEWPORT])
            .build();
        let more = GraphicsPipelineBuilder::new("t")
            .dynamic_states(&[
                vk::DynamicState::VIEWPORT,
                vk::DynamicState::STENCIL_TEST_ENABLE,
                vk::DynamicState::STENCIL_REFERENCE,
            ])
            .build();
        let a = resolve(&base, false);
        let b = resolve(&more, false);
        assert_eq!(b.dynamic & a.dynamic, a.dynamic);
    }

    #[test]
    fn mesh_drops_vertex_input_states() {
        let info = GraphicsPipelineBuilder::new("t")
            .dynamic_states(&[
                vk::DynamicState::VERTEX_INPUT_EXT,
                vk::DynamicState::PRIMITIVE_TOPOLOGY,
            ])
            .build();
        let mask = resolve(&info, true);
        assert!(!mask.dynamic.contains(DynamicStates::VERTEX_INPUT));
        assert!(!mask.dynamic.contains(DynamicStates::PRIMITIVE_TOPOLOGY));
    }
}
