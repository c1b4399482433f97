//! Reduction of depth/stencil state and the order-invariance analysis that
//! gates out-of-order rasterization.

use ash::vk;

use crate::core::gpu_info::GpuInfo;
use crate::pipeline::create_info::{DepthStencilDesc, RasterizationDesc, RenderingInfo};
use crate::state::blend::BlendReduced;

// DB_DEPTH_CONTROL fields.
const STENCIL_ENABLE: u32 = 1 << 0;
const Z_ENABLE: u32 = 1 << 1;
const Z_WRITE_ENABLE: u32 = 1 << 2;
const DEPTH_BOUNDS_ENABLE: u32 = 1 << 3;
const fn s_zfunc(x: u32) -> u32 {
    (x & 0x7) << 4
}
const BACKFACE_ENABLE: u32 = 1 << 7;
const fn s_stencilfunc(x: u32) -> u32 {
    (x & 0x7) << 8
}
const fn s_stencilfunc_bf(x: u32) -> u32 {
    (x & 0x7) << 20
}

// DB_STENCIL_CONTROL op values.
const STENCIL_KEEP: u32 = 0x00;
const STENCIL_ZERO: u32 = 0x01;
const STENCIL_REPLACE_TEST: u32 = 0x03;
const STENCIL_ADD_CLAMP: u32 = 0x05;
const STENCIL_SUB_CLAMP: u32 = 0x06;
const STENCIL_INVERT: u32 = 0x07;
const STENCIL_ADD_WRAP: u32 = 0x08;
const STENCIL_SUB_WRAP: u32 = 0x09;

const fn s_stencil_fail(x: u32) -> u32 {
    x & 0xf
}
const fn s_stencil_zpass(x: u32) -> u32 {
    (x & 0xf) << 4
}
const fn s_stencil_zfail(x: u32) -> u32 {
    (x & 0xf) << 8
}
const fn s_stencil_fail_bf(x: u32) -> u32 {
    (x & 0xf) << 12
}
const fn s_stencil_zpass_bf(x: u32) -> u32 {
    (x & 0xf) << 16
}
const fn s_stencil_zfail_bf(x: u32) -> u32 {
    (x & 0xf) << 20
}

// DB_RENDER_OVERRIDE.
const DISABLE_VIEWPORT_CLAMP: u32 = 1 << 16;

/// Order invariance of a depth/stencil configuration.
///
/// `zs`: the final Z/S buffer contents do not depend on fragment order.
/// `pass_set`: the set of fragments passing the tests does not depend on
/// fragment order.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct OrderInvariance {
    pub zs: bool,
    pub pass_set: bool,
}

/// Reduced depth/stencil state.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct DepthStencilReduced {
    pub db_depth_control: u32,
    pub db_stencil_control: u32,
    pub db_render_control: u32,
    pub db_render_override: u32,
    pub db_render_override2: u32,
    pub order_invariance: OrderInvariance,
    /// A stencil attachment exists and the stencil test is on.
    pub stencil_test_enabled: bool,
    pub depth_write_enabled: bool,
}

fn translate_compare(op: vk::CompareOp) -> u32 {
    // The hardware encoding matches the API ordering.
    op.as_raw() as u32 & 0x7
}

fn translate_stencil_op(op: vk::StencilOp) -> u32 {
    match op {
        vk::StencilOp::KEEP => STENCIL_KEEP,
        vk::StencilOp::ZERO => STENCIL_ZERO,
        vk::StencilOp::REPLACE => STENCIL_REPLACE_TEST,
        vk::StencilOp::INCREMENT_AND_CLAMP => STENCIL_ADD_CLAMP,
        vk::StencilOp::DECREMENT_AND_CLAMP => STENCIL_SUB_CLAMP,
        vk::StencilOp::INVERT => STENCIL_INVERT,
        vk::StencilOp::INCREMENT_AND_WRAP => STENCIL_ADD_WRAP,
        vk::StencilOp::DECREMENT_AND_WRAP => STENCIL_SUB_WRAP,
        _ => STENCIL_KEEP,
    }
}

/// REPLACE is normally order invariant, except when the reference value is
/// produced by the fragment shader; tracking that is not worth it.
fn order_invariant_stencil_op(op: vk::StencilOp) -> bool {
    op != vk::StencilOp::INCREMENT_AND_CLAMP
        && op != vk::StencilOp::DECREMENT_AND_CLAMP
        && op != vk::StencilOp::REPLACE
}

/// Whether, assuming Z writes are disabled, this stencil face is order
/// invariant in both the buffer result and the passing set.
fn order_invariant_stencil_state(s: &vk::StencilOpState) -> bool {
    s.write_mask == 0
        || (s.compare_op == vk::CompareOp::ALWAYS
            && order_invariant_stencil_op(s.pass_op)
            && order_invariant_stencil_op(s.depth_fail_op))
        || (s.compare_op == vk::CompareOp::NEVER && order_invariant_stencil_op(s.fail_op))
}

/// Reduce depth/stencil state. When rasterizer discard is enabled the
/// source state is ignored and everything stays at the disabled defaults.
pub fn reduce(
    ds: &DepthStencilDesc,
    raster: &RasterizationDesc,
    rendering: &RenderingInfo,
) -> DepthStencilReduced {
    let mut out = DepthStencilReduced::default();
    out.order_invariance = OrderInvariance {
        zs: true,
        pass_set: true,
    };

    if raster.discard_enable {
        return out;
    }
    if !raster.depth_clamp_enable {
        out.db_render_override |= DISABLE_VIEWPORT_CLAMP;
    }

    let has_depth = rendering.depth_format.is_some();
    let has_stencil = rendering.stencil_format.is_some();
    let depth_test = ds.depth_test_enable && has_depth;
    let stencil_test = ds.stencil_test_enable && has_stencil;
    out.stencil_test_enabled = stencil_test;
    out.depth_write_enabled = depth_test && ds.depth_write_enable;

    let mut control = 0;
    if depth_test {
        control |= Z_ENABLE | s_zfunc(translate_compare(ds.depth_compare_op));
        if ds.depth_write_enable {
            control |= Z_WRITE_ENABLE;
        }
        if ds.depth_bounds_test_enable {
            control |= DEPTH_BOUNDS_ENABLE;
        }
    }
    if stencil_test {
        control |= STENCIL_ENABLE | BACKFACE_ENABLE;
        control |= s_stencilfunc(translate_compare(ds.front.0.compare_op));
        control |= s_stencilfunc_bf(translate_compare(ds.back.0.compare_op));
        out.db_stencil_control = s_stencil_fail(translate_stencil_op(ds.front.0.fail_op))
            | s_stencil_zpass(translate_stencil_op(ds.front.0.pass_op))
            | s_stencil_zfail(translate_stencil_op(ds.front.0.depth_fail_op))
            | s_stencil_fail_bf(translate_stencil_op(ds.back.0.fail_op))
            | s_stencil_zpass_bf(translate_stencil_op(ds.back.0.pass_op))
            | s_stencil_zfail_bf(translate_stencil_op(ds.back.0.depth_fail_op));
    }
    out.db_depth_control = control;

    if depth_test || stencil_test {
        out.order_invariance = compute_order_invariance(ds, depth_test, stencil_test);
    }

    out
}

fn compute_order_invariance(
    ds: &DepthStencilDesc,
    depth_test: bool,
    stencil_test: bool,
) -> OrderInvariance {
    let zfunc = if depth_test {
        ds.depth_compare_op
    } else {
        vk::CompareOp::ALWAYS
    };
    // Monotone comparisons give an order-independent final Z value.
    let zfunc_is_ordered = matches!(
        zfunc,
        vk::CompareOp::NEVER
            | vk::CompareOp::LESS
            | vk::CompareOp::LESS_OR_EQUAL
            | vk::CompareOp::GREATER
            | vk::CompareOp::GREATER_OR_EQUAL
    );
    let zfunc_all_or_nothing = matches!(zfunc, vk::CompareOp::ALWAYS | vk::CompareOp::NEVER);

    let depth_write = depth_test && ds.depth_write_enable;
    let stencil_write = stencil_test
        && (ds.front.0.write_mask != 0 || ds.back.0.write_mask != 0);

    if !stencil_test {
        OrderInvariance {
            zs: !depth_write || zfunc_is_ordered,
            pass_set: !depth_write || zfunc_all_or_nothing,
        }
    } else {
        let nozwrite_and_order_invariant_stencil = !depth_write
            && order_invariant_stencil_state(&ds.front.0)
            && order_invariant_stencil_state(&ds.back.0);
        OrderInvariance {
            zs: nozwrite_and_order_invariant_stencil || (!stencil_write && zfunc_is_ordered),
            pass_set: nozwrite_and_order_invariant_stencil
                || (!stencil_write && zfunc_all_or_nothing),
        }
    }
}

/// Decide whether the out-of-order rasterizer may be enabled for this
/// pipeline. `fs_writes_memory`/`fs_early_tests` come from fragment-shader
/// reflection; callers without a fragment shader pass `false`.
pub fn out_of_order_rast_ok(
    gpu: &GpuInfo,
    reduced: &DepthStencilReduced,
    blend: &BlendReduced,
    logic_op_enable: bool,
    order_relaxed: bool,
    fs_writes_memory: bool,
    fs_early_tests: bool,
) -> bool {
    if !gpu.has_out_of_order_rast {
        return false;
    }
    // The application promised order does not matter.
    if order_relaxed {
        return true;
    }
    let colormask = blend.cb_target_mask;
    if colormask != 0 && logic_op_enable {
        return false;
    }
    if !reduced.order_invariance.zs {
        return false;
    }
    // The set of PS invocations is always order invariant, except when early
    // tests let a racing fragment suppress this one's side effects.
    if fs_writes_memory && fs_early_tests && !reduced.order_invariance.pass_set {
        return false;
    }
    if colormask == 0 {
        return true;
    }
    // Every write-enabled, blend-enabled target must blend commutatively.
    let blended = colormask & blend.blend_enable_4bit;
    blended & blend.commutative_4bit == blended
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::gpu_info::GfxLevel;
    use crate::pipeline::create_info::StencilOps;

    fn depth_target() -> RenderingInfo {
        RenderingInfo {
            depth_format: Some(vk::Format::D32_SFLOAT),
            ..Default::default()
        }
    }

    fn depth_state(write: bool, cmp: vk::CompareOp) -> DepthStencilDesc {
        DepthStencilDesc {
            depth_test_enable: true,
            depth_write_enable: write,
            depth_compare_op: cmp,
            ..Default::default()
        }
    }

    #[test]
    fn discard_hides_downstream_state() {
        let raster = RasterizationDesc {
            discard_enable: true,
            ..Default::default()
        };
        let r = reduce(&depth_state(true, vk::CompareOp::LESS), &raster, &depth_target());
        assert_eq!(r.db_depth_control, 0);
        assert_eq!(r.order_invariance, OrderInvariance { zs: true, pass_set: true });
    }

    #[test]
    fn monotone_compare_is_zs_invariant() {
        let r = reduce(
            &depth_state(true, vk::CompareOp::LESS),
            &RasterizationDesc::default(),
            &depth_target(),
        );
        assert!(r.order_invariance.zs);
        assert!(!r.order_invariance.pass_set);
    }

    #[test]
    fn equal_compare_with_write_is_not_invariant() {
        let r = reduce(
            &depth_state(true, vk::CompareOp::EQUAL),
            &RasterizationDesc::default(),
            &depth_target(),
        );
        assert!(!r.order_invariance.zs);
    }

    #[test]
    fn stencil_clamp_ops_break_invariance() {
        let mut front = StencilOps::disabled();
        front.0.pass_op = vk::StencilOp::INCREMENT_AND_CLAMP;
        front.0.write_mask = 0xff;
        let ds = DepthStencilDesc {
            stencil_test_enable: true,
            front,
            back: front,
            ..Default::default()
        };
        let rendering = RenderingInfo {
            stencil_format: Some(vk::Format::S8_UINT),
            ..Default::default()
        };
        let r = reduce(&ds, &RasterizationDesc::default(), &rendering);
        assert!(!r.order_invariance.zs);
    }

    #[test]
    fn relaxed_order_hint_overrides_analysis() {
        let gpu = GpuInfo::new(GfxLevel::Gfx10);
        let r = reduce(
            &depth_state(true, vk::CompareOp::EQUAL),
            &RasterizationDesc::default(),
            &depth_target(),
        );
        let blend = BlendReduced::default();
        assert!(!out_of_order_rast_ok(&gpu, &r, &blend, false, false, false, false));
        assert!(out_of_order_rast_ok(&gpu, &r, &blend, false, true, false, false));
    }
}
