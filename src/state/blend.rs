//! Reduction of per-attachment blend state to color-block register values.
//!
//! Besides the raw `CB_BLEND*_CONTROL` words this computes the RB+
//! optimizer hints (`SX_MRT*_BLEND_OPT`), the SPI color export formats with
//! their hole-filling fixups, and the per-target commutativity bits the
//! out-of-order rasterizer decision consumes.

use ash::vk;

use crate::core::gpu_info::{GfxLevel, GpuInfo};
use crate::format;
use crate::pipeline::create_info::{BlendDesc, MultisampleDesc, RenderingInfo};

pub const MAX_RTS: usize = 8;

// CB_BLEND_CONTROL blend factors.
const BLEND_ZERO: u32 = 0x00;
const BLEND_ONE: u32 = 0x01;
const BLEND_SRC_COLOR: u32 = 0x02;
const BLEND_ONE_MINUS_SRC_COLOR: u32 = 0x03;
const BLEND_SRC_ALPHA: u32 = 0x04;
const BLEND_ONE_MINUS_SRC_ALPHA: u32 = 0x05;
const BLEND_DST_ALPHA: u32 = 0x06;
const BLEND_ONE_MINUS_DST_ALPHA: u32 = 0x07;
const BLEND_DST_COLOR: u32 = 0x08;
const BLEND_ONE_MINUS_DST_COLOR: u32 = 0x09;
const BLEND_SRC_ALPHA_SATURATE: u32 = 0x0a;
const BLEND_CONSTANT_COLOR: u32 = 0x0d;
const BLEND_ONE_MINUS_CONSTANT_COLOR: u32 = 0x0e;
const BLEND_SRC1_COLOR: u32 = 0x0f;
const BLEND_INV_SRC1_COLOR: u32 = 0x10;
const BLEND_SRC1_ALPHA: u32 = 0x11;
const BLEND_INV_SRC1_ALPHA: u32 = 0x12;
const BLEND_CONSTANT_ALPHA: u32 = 0x13;
const BLEND_ONE_MINUS_CONSTANT_ALPHA: u32 = 0x14;

// CB_BLEND_CONTROL combine functions.
const COMB_DST_PLUS_SRC: u32 = 0;
const COMB_SRC_MINUS_DST: u32 = 1;
const COMB_MIN_DST_SRC: u32 = 2;
const COMB_MAX_DST_SRC: u32 = 3;
const COMB_DST_MINUS_SRC: u32 = 4;

// SX_MRT_BLEND_OPT source/destination optimizations.
const OPT_PRESERVE_NONE_IGNORE_ALL: u32 = 0;
const OPT_PRESERVE_ALL_IGNORE_NONE: u32 = 1;
const OPT_PRESERVE_C1_IGNORE_C0: u32 = 2;
const OPT_PRESERVE_C0_IGNORE_C1: u32 = 3;
const OPT_PRESERVE_A1_IGNORE_A0: u32 = 4;
const OPT_PRESERVE_A0_IGNORE_A1: u32 = 5;
const OPT_PRESERVE_NONE_IGNORE_A0: u32 = 6;
const OPT_PRESERVE_NONE_IGNORE_NONE: u32 = 7;

// SX_MRT_BLEND_OPT combine functions.
const OPT_COMB_NONE: u32 = 0;
const OPT_COMB_ADD: u32 = 1;
const OPT_COMB_SUBTRACT: u32 = 2;
const OPT_COMB_MIN: u32 = 3;
const OPT_COMB_MAX: u32 = 4;
const OPT_COMB_REVSUBTRACT: u32 = 5;
const OPT_COMB_BLEND_DISABLED: u32 = 6;

// CB_BLEND_CONTROL field encoders.
const fn s_color_srcblend(x: u32) -> u32 {
    x & 0x1f
}
const fn s_color_comb_fcn(x: u32) -> u32 {
    (x & 0x7) << 5
}
const fn s_color_destblend(x: u32) -> u32 {
    (x & 0x1f) << 8
}
const fn s_alpha_srcblend(x: u32) -> u32 {
    (x & 0x1f) << 16
}
const fn s_alpha_comb_fcn(x: u32) -> u32 {
    (x & 0x7) << 21
}
const fn s_alpha_destblend(x: u32) -> u32 {
    (x & 0x1f) << 24
}
const SEPARATE_ALPHA_BLEND: u32 = 1 << 29;
const BLEND_ENABLE: u32 = 1 << 30;

// SX_MRT_BLEND_OPT field encoders.
const fn s_color_src_opt(x: u32) -> u32 {
    x & 0x7
}
const fn s_color_dst_opt(x: u32) -> u32 {
    (x & 0x7) << 4
}
const fn s_color_opt_fcn(x: u32) -> u32 {
    (x & 0x7) << 8
}
const fn s_alpha_src_opt(x: u32) -> u32 {
    (x & 0x7) << 16
}
const fn s_alpha_dst_opt(x: u32) -> u32 {
    (x & 0x7) << 20
}
const fn s_alpha_opt_fcn(x: u32) -> u32 {
    (x & 0x7) << 24
}
const COLOR_DST_OPT_MASK: u32 = 0x7 << 4;

// CB_COLOR_CONTROL fields.
const CB_MODE_DISABLE: u32 = 0;
const CB_MODE_NORMAL: u32 = 1;
const fn s_cb_mode(x: u32) -> u32 {
    (x & 0x7) << 4
}
const fn s_rop3(x: u32) -> u32 {
    (x & 0xff) << 16
}
const DISABLE_DUAL_QUAD: u32 = 1 << 7;
const ROP3_COPY: u32 = 0xcc;

// DB_ALPHA_TO_MASK fields.
const ALPHA_TO_MASK_ENABLE: u32 = 1;
const fn s_alpha_to_mask_offsets(o0: u32, o1: u32, o2: u32, o3: u32) -> u32 {
    (o0 << 8) | (o1 << 10) | (o2 << 12) | (o3 << 14)
}
const ALPHA_TO_MASK_OFFSET_ROUND: u32 = 1 << 16;

/// Reduced blend state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlendReduced {
    pub cb_blend_control: [u32; MAX_RTS],
    pub sx_mrt_blend_opt: [u32; MAX_RTS],
    pub cb_color_control: u32,
    /// Write mask, one nibble per target.
    pub cb_target_mask: u32,
    /// 0xf per target that has any write mask.
    pub cb_target_enabled_4bit: u32,
    /// 0xf per target with blending enabled.
    pub blend_enable_4bit: u32,
    /// Bit per target whose factors consume source alpha.
    pub need_src_alpha: u32,
    /// Channel mask per target whose blend is bitwise order-independent.
    pub commutative_4bit: u32,
    pub spi_shader_col_format: u32,
    pub cb_shader_mask: u32,
    pub col_format_is_int8: u32,
    pub col_format_is_int10: u32,
    pub col_format_is_float32: u32,
    pub db_alpha_to_mask: u32,
    pub mrt0_is_dual_src: bool,
}

impl Default for BlendReduced {
    fn default() -> Self {
        Self {
            cb_blend_control: [0; MAX_RTS],
            sx_mrt_blend_opt: [0; MAX_RTS],
            cb_color_control: s_cb_mode(CB_MODE_DISABLE) | s_rop3(ROP3_COPY),
            cb_target_mask: 0,
            cb_target_enabled_4bit: 0,
            blend_enable_4bit: 0,
            need_src_alpha: 0,
            commutative_4bit: 0,
            spi_shader_col_format: 0,
            cb_shader_mask: 0,
            col_format_is_int8: 0,
            col_format_is_int10: 0,
            col_format_is_float32: 0,
            db_alpha_to_mask: s_alpha_to_mask_offsets(3, 1, 0, 2) | ALPHA_TO_MASK_OFFSET_ROUND,
            mrt0_is_dual_src: false,
        }
    }
}

fn translate_factor(factor: vk::BlendFactor) -> u32 {
    match factor {
        vk::BlendFactor::ZERO => BLEND_ZERO,
        vk::BlendFactor::ONE => BLEND_ONE,
        vk::BlendFactor::SRC_COLOR => BLEND_SRC_COLOR,
        vk::BlendFactor::ONE_MINUS_SRC_COLOR => BLEND_ONE_MINUS_SRC_COLOR,
        vk::BlendFactor::DST_COLOR => BLEND_DST_COLOR,
        vk::BlendFactor::ONE_MINUS_DST_COLOR => BLEND_ONE_MINUS_DST_COLOR,
        vk::BlendFactor::SRC_ALPHA => BLEND_SRC_ALPHA,
        vk::BlendFactor::ONE_MINUS_SRC_ALPHA => BLEND_ONE_MINUS_SRC_ALPHA,
        vk::BlendFactor::DST_ALPHA => BLEND_DST_ALPHA,
        vk::BlendFactor::ONE_MINUS_DST_ALPHA => BLEND_ONE_MINUS_DST_ALPHA,
        vk::BlendFactor::CONSTANT_COLOR => BLEND_CONSTANT_COLOR,
        vk::BlendFactor::ONE_MINUS_CONSTANT_COLOR => BLEND_ONE_MINUS_CONSTANT_COLOR,
        vk::BlendFactor::CONSTANT_ALPHA => BLEND_CONSTANT_ALPHA,
        vk::BlendFactor::ONE_MINUS_CONSTANT_ALPHA => BLEND_ONE_MINUS_CONSTANT_ALPHA,
        vk::BlendFactor::SRC_ALPHA_SATURATE => BLEND_SRC_ALPHA_SATURATE,
        vk::BlendFactor::SRC1_COLOR => BLEND_SRC1_COLOR,
        vk::BlendFactor::ONE_MINUS_SRC1_COLOR => BLEND_INV_SRC1_COLOR,
        vk::BlendFactor::SRC1_ALPHA => BLEND_SRC1_ALPHA,
        vk::BlendFactor::ONE_MINUS_SRC1_ALPHA => BLEND_INV_SRC1_ALPHA,
        _ => BLEND_ZERO,
    }
}

fn translate_op(op: vk::BlendOp) -> u32 {
    match op {
        vk::BlendOp::ADD => COMB_DST_PLUS_SRC,
        vk::BlendOp::SUBTRACT => COMB_SRC_MINUS_DST,
        vk::BlendOp::REVERSE_SUBTRACT => COMB_DST_MINUS_SRC,
        vk::BlendOp::MIN => COMB_MIN_DST_SRC,
        vk::BlendOp::MAX => COMB_MAX_DST_SRC,
        _ => COMB_DST_PLUS_SRC,
    }
}

fn translate_logic_op(op: vk::LogicOp) -> u32 {
    match op {
        vk::LogicOp::CLEAR => 0x00,
        vk::LogicOp::NOR => 0x11,
        vk::LogicOp::AND_INVERTED => 0x22,
        vk::LogicOp::COPY_INVERTED => 0x33,
        vk::LogicOp::AND_REVERSE => 0x44,
        vk::LogicOp::INVERT => 0x55,
        vk::LogicOp::XOR => 0x66,
        vk::LogicOp::NAND => 0x77,
        vk::LogicOp::AND => 0x88,
        vk::LogicOp::EQUIVALENT => 0x99,
        vk::LogicOp::NO_OP => 0xaa,
        vk::LogicOp::OR_INVERTED => 0xbb,
        vk::LogicOp::COPY => 0xcc,
        vk::LogicOp::OR_REVERSE => 0xdd,
        vk::LogicOp::OR => 0xee,
        vk::LogicOp::SET => 0xff,
        _ => ROP3_COPY,
    }
}

fn is_dual_src(factor: vk::BlendFactor) -> bool {
    matches!(
        factor,
        vk::BlendFactor::SRC1_COLOR
            | vk::BlendFactor::ONE_MINUS_SRC1_COLOR
            | vk::BlendFactor::SRC1_ALPHA
            | vk::BlendFactor::ONE_MINUS_SRC1_ALPHA
    )
}

fn factor_uses_dst(factor: vk::BlendFactor) -> bool {
    matches!(
        factor,
        vk::BlendFactor::DST_COLOR
            | vk::BlendFactor::ONE_MINUS_DST_COLOR
            | vk::BlendFactor::DST_ALPHA
            | vk::BlendFactor::ONE_MINUS_DST_ALPHA
            | vk::BlendFactor::SRC_ALPHA_SATURATE
    )
}

/// `func(src * DST, dst * 0) -> func(src * 0, dst * SRC)`: rewrites a
/// destination factor on the source side into a source factor on the
/// destination side, which is what the RB+ optimizer can elide. Subtractions
/// reverse when the operands commute.
fn remove_dst(
    op: &mut vk::BlendOp,
    src: &mut vk::BlendFactor,
    dst: &mut vk::BlendFactor,
    expected_dst: vk::BlendFactor,
    replacement_src: vk::BlendFactor,
) {
    if *src == expected_dst && *dst == vk::BlendFactor::ZERO {
        *src = vk::BlendFactor::ZERO;
        *dst = replacement_src;
        if *op == vk::BlendOp::SUBTRACT {
            *op = vk::BlendOp::REVERSE_SUBTRACT;
        } else if *op == vk::BlendOp::REVERSE_SUBTRACT {
            *op = vk::BlendOp::SUBTRACT;
        }
    }
}

fn blend_opt_factor(factor: vk::BlendFactor, is_alpha: bool) -> u32 {
    match factor {
        vk::BlendFactor::ZERO => OPT_PRESERVE_NONE_IGNORE_ALL,
        vk::BlendFactor::ONE => OPT_PRESERVE_ALL_IGNORE_NONE,
        vk::BlendFactor::SRC_COLOR => {
            if is_alpha {
                OPT_PRESERVE_A1_IGNORE_A0
            } else {
                OPT_PRESERVE_C1_IGNORE_C0
            }
        }
        vk::BlendFactor::ONE_MINUS_SRC_COLOR => {
            if is_alpha {
                OPT_PRESERVE_A0_IGNORE_A1
            } else {
                OPT_PRESERVE_C0_IGNORE_C1
            }
        }
        vk::BlendFactor::SRC_ALPHA => OPT_PRESERVE_A1_IGNORE_A0,
        vk::BlendFactor::ONE_MINUS_SRC_ALPHA => OPT_PRESERVE_A0_IGNORE_A1,
        vk::BlendFactor::SRC_ALPHA_SATURATE => {
            if is_alpha {
                OPT_PRESERVE_ALL_IGNORE_NONE
            } else {
                OPT_PRESERVE_NONE_IGNORE_A0
            }
        }
        _ => OPT_PRESERVE_NONE_IGNORE_NONE,
    }
}

fn blend_opt_function(op: vk::BlendOp) -> u32 {
    match op {
        vk::BlendOp::ADD => OPT_COMB_ADD,
        vk::BlendOp::SUBTRACT => OPT_COMB_SUBTRACT,
        vk::BlendOp::REVERSE_SUBTRACT => OPT_COMB_REVSUBTRACT,
        vk::BlendOp::MIN => OPT_COMB_MIN,
        vk::BlendOp::MAX => OPT_COMB_MAX,
        _ => OPT_COMB_NONE,
    }
}

fn check_commutativity(
    commutative_4bit: &mut u32,
    op: vk::BlendOp,
    src: vk::BlendFactor,
    dst: vk::BlendFactor,
    chanmask: u32,
) {
    // A source factor is eligible when it does not depend on the destination.
    let src_allowed = matches!(
        src,
        vk::BlendFactor::ONE
            | vk::BlendFactor::SRC_COLOR
            | vk::BlendFactor::SRC_ALPHA
            | vk::BlendFactor::SRC_ALPHA_SATURATE
            | vk::BlendFactor::ZERO
            | vk::BlendFactor::ONE_MINUS_SRC_COLOR
            | vk::BlendFactor::ONE_MINUS_SRC_ALPHA
            | vk::BlendFactor::CONSTANT_COLOR
            | vk::BlendFactor::CONSTANT_ALPHA
            | vk::BlendFactor::ONE_MINUS_CONSTANT_COLOR
            | vk::BlendFactor::ONE_MINUS_CONSTANT_ALPHA
    );
    if dst == vk::BlendFactor::ONE && src_allowed {
        // Addition is commutative but float addition is not associative, so
        // different fragment orders can round differently. Only MIN and MAX
        // are bitwise order-independent.
        if op == vk::BlendOp::MIN || op == vk::BlendOp::MAX {
            *commutative_4bit |= chanmask;
        }
    }
}

fn cb_shader_mask(spi_shader_col_format: u32) -> u32 {
    let mut mask = 0;
    for i in 0..MAX_RTS {
        let nibble = match (spi_shader_col_format >> (4 * i)) & 0xf {
            format::SPI_SHADER_ZERO => 0x0,
            format::SPI_SHADER_32_R => 0x1,
            format::SPI_SHADER_32_GR => 0x3,
            format::SPI_SHADER_32_AR => 0x9,
            _ => 0xf,
        };
        mask |= nibble << (4 * i);
    }
    mask
}

/// Reduce the blend and render-target description to color-block state.
pub fn reduce(
    gpu: &GpuInfo,
    blend: &BlendDesc,
    multisample: &MultisampleDesc,
    rendering: &RenderingInfo,
) -> BlendReduced {
    let mut out = BlendReduced::default();

    for (i, att) in blend.attachments.iter().enumerate().take(MAX_RTS) {
        let att = &att.0;
        let write_enabled = blend.color_write_enables & (1 << i) != 0;
        if att.color_write_mask.is_empty() || !write_enabled {
            continue;
        }
        // Dual-source factors on MRT0 consume the MRT1 slot; every later
        // target is ignored by the hardware.
        if out.mrt0_is_dual_src {
            break;
        }

        out.cb_target_mask |= att.color_write_mask.as_raw() << (4 * i);
        out.cb_target_enabled_4bit |= 0xf << (4 * i);

        let mut op_rgb = att.color_blend_op;
        let mut src_rgb = att.src_color_blend_factor;
        let mut dst_rgb = att.dst_color_blend_factor;
        let mut op_a = att.alpha_blend_op;
        let mut src_a = att.src_alpha_blend_factor;
        let mut dst_a = att.dst_alpha_blend_factor;

        if i == 0
            && (is_dual_src(src_rgb)
                || is_dual_src(dst_rgb)
                || is_dual_src(src_a)
                || is_dual_src(dst_a))
        {
            out.mrt0_is_dual_src = true;
        }

        if att.blend_enable == vk::FALSE {
            out.sx_mrt_blend_opt[i] = s_color_opt_fcn(OPT_COMB_BLEND_DISABLED)
                | s_alpha_opt_fcn(OPT_COMB_BLEND_DISABLED);
            continue;
        }

        out.blend_enable_4bit |= 0xf << (4 * i);

        if src_rgb == vk::BlendFactor::SRC_ALPHA
            || dst_rgb == vk::BlendFactor::SRC_ALPHA
            || src_rgb == vk::BlendFactor::SRC_ALPHA_SATURATE
            || dst_rgb == vk::BlendFactor::SRC_ALPHA_SATURATE
            || src_rgb == vk::BlendFactor::ONE_MINUS_SRC_ALPHA
            || dst_rgb == vk::BlendFactor::ONE_MINUS_SRC_ALPHA
        {
            out.need_src_alpha |= 1 << i;
        }

        // MIN/MAX ignore the factors; the hardware wants (ONE, ONE).
        if op_rgb == vk::BlendOp::MIN || op_rgb == vk::BlendOp::MAX {
            src_rgb = vk::BlendFactor::ONE;
            dst_rgb = vk::BlendFactor::ONE;
        }
        if op_a == vk::BlendOp::MIN || op_a == vk::BlendOp::MAX {
            src_a = vk::BlendFactor::ONE;
            dst_a = vk::BlendFactor::ONE;
        }

        // Commute destination factors off the source side so RB+ sees them.
        remove_dst(&mut op_rgb, &mut src_rgb, &mut dst_rgb, vk::BlendFactor::DST_COLOR, vk::BlendFactor::SRC_COLOR);
        remove_dst(&mut op_a, &mut src_a, &mut dst_a, vk::BlendFactor::DST_COLOR, vk::BlendFactor::SRC_COLOR);
        remove_dst(&mut op_rgb, &mut src_rgb, &mut dst_rgb, vk::BlendFactor::DST_ALPHA, vk::BlendFactor::SRC_ALPHA);
        remove_dst(&mut op_a, &mut src_a, &mut dst_a, vk::BlendFactor::DST_ALPHA, vk::BlendFactor::SRC_ALPHA);

        let mut opt = s_color_src_opt(blend_opt_factor(src_rgb, false))
            | s_color_dst_opt(blend_opt_factor(dst_rgb, false))
            | s_color_opt_fcn(blend_opt_function(op_rgb))
            | s_alpha_src_opt(blend_opt_factor(src_a, true))
            | s_alpha_dst_opt(blend_opt_factor(dst_a, true))
            | s_alpha_opt_fcn(blend_opt_function(op_a));

        // A source factor that reads the destination invalidates whatever
        // the destination optimization claimed to preserve.
        if factor_uses_dst(src_rgb) {
            opt = (opt & !COLOR_DST_OPT_MASK) | s_color_dst_opt(OPT_PRESERVE_NONE_IGNORE_NONE);
        }
        if src_rgb == vk::BlendFactor::SRC_ALPHA_SATURATE
            && (dst_rgb == vk::BlendFactor::ZERO
                || dst_rgb == vk::BlendFactor::SRC_ALPHA
                || dst_rgb == vk::BlendFactor::SRC_ALPHA_SATURATE)
        {
            opt = (opt & !COLOR_DST_OPT_MASK) | s_color_dst_opt(OPT_PRESERVE_NONE_IGNORE_A0);
        }
        out.sx_mrt_blend_opt[i] = opt;

        let mut cntl = BLEND_ENABLE
            | s_color_comb_fcn(translate_op(op_rgb))
            | s_color_srcblend(translate_factor(src_rgb))
            | s_color_destblend(translate_factor(dst_rgb));
        if src_a != src_rgb || dst_a != dst_rgb || op_a != op_rgb {
            cntl |= SEPARATE_ALPHA_BLEND;
        }
        cntl |= s_alpha_comb_fcn(translate_op(op_a))
            | s_alpha_srcblend(translate_factor(src_a))
            | s_alpha_destblend(translate_factor(dst_a));
        out.cb_blend_control[i] = cntl;

        check_commutativity(&mut out.commutative_4bit, op_rgb, src_rgb, dst_rgb, 0x7 << (4 * i));
        check_commutativity(&mut out.commutative_4bit, op_a, src_a, dst_a, 0x8 << (4 * i));
    }

    compute_spi_color_formats(gpu, &mut out, multisample, rendering);

    let mut color_control = if out.cb_target_mask != 0 {
        s_cb_mode(CB_MODE_NORMAL)
    } else {
        s_cb_mode(CB_MODE_DISABLE)
    };
    color_control |= if blend.logic_op_enable {
        s_rop3(translate_logic_op(blend.logic_op))
    } else {
        s_rop3(ROP3_COPY)
    };
    // RB+ dual-quad mode breaks with dual-source blending and logic ops, and
    // with any blending at all from Gfx11 on.
    if gpu.has_rbplus
        && (out.mrt0_is_dual_src
            || blend.logic_op_enable
            || (gpu.gfx_level >= GfxLevel::Gfx11 && out.blend_enable_4bit != 0))
    {
        color_control |= DISABLE_DUAL_QUAD;
        debug!("RB+ dual-quad disabled for this pipeline");
    }
    out.cb_color_control = color_control;

    if multisample.alpha_to_coverage {
        out.db_alpha_to_mask |= ALPHA_TO_MASK_ENABLE;
    }

    out
}

fn compute_spi_color_formats(
    gpu: &GpuInfo,
    out: &mut BlendReduced,
    multisample: &MultisampleDesc,
    rendering: &RenderingInfo,
) {
    let mut col_format = 0u32;
    for (i, &fmt) in rendering.color_formats.iter().enumerate().take(MAX_RTS) {
        if fmt == vk::Format::UNDEFINED || (out.cb_target_mask >> (4 * i)) & 0xf == 0 {
            continue;
        }
        let enc = format::color_encoding(fmt);
        if !enc.is_valid() {
            continue;
        }
        let cf = format::choose_export_format(
            gpu,
            fmt,
            out.blend_enable_4bit & (0xf << (4 * i)) != 0,
            out.need_src_alpha & (1 << i) != 0,
        );
        if enc.is_int8 {
            out.col_format_is_int8 |= 1 << i;
        }
        if enc.is_int10 {
            out.col_format_is_int10 |= 1 << i;
        }
        if enc.is_float32 {
            out.col_format_is_float32 |= 1 << i;
        }
        col_format |= cf << (4 * i);
    }

    // Alpha-to-coverage without any color attachment still needs the alpha
    // channel of output 0 on the export bus.
    if col_format == 0 && multisample.alpha_to_coverage {
        col_format = format::SPI_SHADER_32_AR;
    }

    // The dual-source export occupies the MRT1 slot and must mirror MRT0.
    if out.mrt0_is_dual_src {
        col_format |= (col_format & 0xf) << 4;
    }

    // The SPI hangs on sparse export masks: plug every hole below the
    // highest enabled target with a single-channel export.
    if col_format != 0 {
        let num_targets = (31 - col_format.leading_zeros()) / 4 + 1;
        for i in 0..num_targets {
            if (col_format >> (4 * i)) & 0xf == format::SPI_SHADER_ZERO {
                col_format |= format::SPI_SHADER_32_R << (4 * i);
            }
        }
    }

    out.spi_shader_col_format = col_format;
    out.cb_shader_mask = cb_shader_mask(col_format);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::gpu_info::GfxLevel;
    use crate::pipeline::create_info::BlendAttachment;

    fn rgba8_targets(n: usize) -> RenderingInfo {
        RenderingInfo {
            view_mask: 0,
            color_formats: vec![vk::Format::R8G8B8A8_UNORM; n],
            depth_format: None,
            stencil_format: None,
        }
    }

    fn blend_with(attachments: Vec<BlendAttachment>) -> BlendDesc {
        BlendDesc {
            attachments,
            ..Default::default()
        }
    }

    fn enabled_attachment(
        src: vk::BlendFactor,
        dst: vk::BlendFactor,
        op: vk::BlendOp,
    ) -> BlendAttachment {
        let mut att = BlendAttachment::none();
        att.0.blend_enable = vk::TRUE;
        att.0.src_color_blend_factor = src;
        att.0.dst_color_blend_factor = dst;
        att.0.color_blend_op = op;
        att.0.src_alpha_blend_factor = src;
        att.0.dst_alpha_blend_factor = dst;
        att.0.alpha_blend_op = op;
        att
    }

    #[test]
    fn disabled_blend_still_exports() {
        let gpu = GpuInfo::new(GfxLevel::Gfx10_3);
        let r = reduce(
            &gpu,
            &blend_with(vec![BlendAttachment::none()]),
            &MultisampleDesc::default(),
            &rgba8_targets(1),
        );
        assert_eq!(r.blend_enable_4bit, 0);
        assert_eq!(r.cb_target_mask, 0xf);
        assert_eq!(r.spi_shader_col_format, format::SPI_SHADER_FP16_ABGR);
        assert_eq!(r.cb_shader_mask, 0xf);
    }

    #[test]
    fn zero_write_mask_masks_target_out() {
        let gpu = GpuInfo::new(GfxLevel::Gfx10_3);
        let mut att = BlendAttachment::none();
        att.0.color_write_mask = vk::ColorComponentFlags::empty();
        let r = reduce(
            &gpu,
            &blend_with(vec![att]),
            &MultisampleDesc::default(),
            &rgba8_targets(1),
        );
        assert_eq!(r.cb_target_mask, 0);
        assert_eq!(r.spi_shader_col_format, 0);
    }

    #[test]
    fn min_max_force_one_one_factors() {
        let gpu = GpuInfo::new(GfxLevel::Gfx10_3);
        let att = enabled_attachment(
            vk::BlendFactor::SRC_ALPHA,
            vk::BlendFactor::DST_ALPHA,
            vk::BlendOp::MAX,
        );
        let r = reduce(
            &gpu,
            &blend_with(vec![att]),
            &MultisampleDesc::default(),
            &rgba8_targets(1),
        );
        let cntl = r.cb_blend_control[0];
        assert_eq!(cntl & 0x1f, BLEND_ONE);
        assert_eq!((cntl >> 8) & 0x1f, BLEND_ONE);
        assert_eq!((cntl >> 5) & 0x7, COMB_MAX_DST_SRC);
        // dst == ONE after the rewrite, op is MAX: order-independent.
        assert_eq!(r.commutative_4bit, 0xf);
    }

    #[test]
    fn additive_blend_is_not_commutative() {
        let gpu = GpuInfo::new(GfxLevel::Gfx10_3);
        let att = enabled_attachment(
            vk::BlendFactor::ONE,
            vk::BlendFactor::ONE,
            vk::BlendOp::ADD,
        );
        let r = reduce(
            &gpu,
            &blend_with(vec![att]),
            &MultisampleDesc::default(),
            &rgba8_targets(1),
        );
        assert_eq!(r.commutative_4bit, 0);
    }

    #[test]
    fn hole_filling_has_no_zero_nibbles() {
        let gpu = GpuInfo::new(GfxLevel::Gfx10_3);
        // Target 0 masked out, target 2 written: holes at 0 and 1.
        let mut masked = BlendAttachment::none();
        masked.0.color_write_mask = vk::ColorComponentFlags::empty();
        let r = reduce(
            &gpu,
            &blend_with(vec![masked, masked, BlendAttachment::none()]),
            &MultisampleDesc::default(),
            &rgba8_targets(3),
        );
        assert_eq!(r.spi_shader_col_format & 0xf, format::SPI_SHADER_32_R);
        assert_eq!((r.spi_shader_col_format >> 4) & 0xf, format::SPI_SHADER_32_R);
        assert_eq!((r.spi_shader_col_format >> 8) & 0xf, format::SPI_SHADER_FP16_ABGR);
    }

    #[test]
    fn dual_src_mirrors_mrt0_and_disables_dual_quad() {
        let gpu = GpuInfo::new(GfxLevel::Gfx10_3);
        let att = enabled_attachment(
            vk::BlendFactor::SRC1_COLOR,
            vk::BlendFactor::ONE_MINUS_SRC1_COLOR,
            vk::BlendOp::ADD,
        );
        let r = reduce(
            &gpu,
            &blend_with(vec![att, BlendAttachment::none()]),
            &MultisampleDesc::default(),
            &rgba8_targets(2),
        );
        assert!(r.mrt0_is_dual_src);
        let mrt0 = r.spi_shader_col_format & 0xf;
        let mrt1 = (r.spi_shader_col_format >> 4) & 0xf;
        assert_eq!(mrt0, mrt1);
        assert_ne!(r.cb_color_control & DISABLE_DUAL_QUAD, 0);
    }

    #[test]
    fn alpha_to_coverage_without_attachments_exports_alpha() {
        let gpu = GpuInfo::new(GfxLevel::Gfx10_3);
        let ms = MultisampleDesc {
            alpha_to_coverage: true,
            ..Default::default()
        };
        let r = reduce(&gpu, &BlendDesc::default(), &ms, &RenderingInfo::default());
        assert_eq!(r.spi_shader_col_format, format::SPI_SHADER_32_AR);
        assert_ne!(r.db_alpha_to_mask & ALPHA_TO_MASK_ENABLE, 0);
    }
}
