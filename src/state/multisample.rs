//! Reduction of multisample, EQAA, conservative-raster and VRS state.

use ash::vk;

use crate::core::gpu_info::{GfxLevel, GpuInfo};
use crate::pipeline::create_info::{FragmentShadingRateDesc, MultisampleDesc, RasterizationDesc};

// PA_SC_AA_CONFIG fields.
const fn s_msaa_num_samples(x: u32) -> u32 {
    x & 0x7
}
const AA_MASK_CENTROID_DTMN: u32 = 1 << 4;
const fn s_max_sample_dist(x: u32) -> u32 {
    (x & 0xf) << 13
}
const fn s_msaa_exposed_samples(x: u32) -> u32 {
    (x & 0x7) << 20
}
const COVERED_CENTROID_IS_CENTER: u32 = 1 << 27;

// DB_EQAA fields.
const fn s_max_anchor_samples(x: u32) -> u32 {
    x & 0x7
}
const fn s_ps_iter_samples(x: u32) -> u32 {
    (x & 0x7) << 4
}
const fn s_mask_export_num_samples(x: u32) -> u32 {
    (x & 0x7) << 8
}
const fn s_alpha_to_mask_num_samples(x: u32) -> u32 {
    (x & 0x7) << 12
}
const HIGH_QUALITY_INTERSECTIONS: u32 = 1 << 16;
const INCOHERENT_EQAA_READS: u32 = 1 << 17;
const INTERPOLATE_COMP_Z: u32 = 1 << 18;
const STATIC_ANCHOR_ASSOCIATIONS: u32 = 1 << 20;

// PA_SC_MODE_CNTL_0 fields.
const MSAA_ENABLE: u32 = 1 << 0;
const VPORT_SCISSOR_ENABLE: u32 = 1 << 1;
const LINE_STIPPLE_ENABLE: u32 = 1 << 2;
const ALTERNATE_RBS_PER_TILE: u32 = 1 << 5;

// PA_SC_MODE_CNTL_1 fields.
pub(crate) const WALK_ALIGN8_PRIM_FITS_ST: u32 = 1 << 4;
pub(crate) const WALK_FENCE_ENABLE: u32 = 1 << 6;
pub(crate) const fn s_walk_fence_size(x: u32) -> u32 {
    (x & 0x7) << 7
}
pub(crate) const SUPERTILE_WALK_ORDER_ENABLE: u32 = 1 << 10;
pub(crate) const TILE_WALK_ORDER_ENABLE: u32 = 1 << 11;
pub(crate) const MULTI_SHADER_ENGINE_PRIM_DISCARD_ENABLE: u32 = 1 << 12;
pub(crate) const PS_ITER_SAMPLE: u32 = 1 << 16;
pub(crate) const FORCE_EOV_CNTDWN_ENABLE: u32 = 1 << 25;
pub(crate) const FORCE_EOV_REZ_ENABLE: u32 = 1 << 26;
pub(crate) const OUT_OF_ORDER_PRIMITIVE_ENABLE: u32 = 1 << 27;
pub(crate) const fn s_out_of_order_water_mark(x: u32) -> u32 {
    (x & 0x7) << 28
}

// PA_SC_CONSERVATIVE_RASTERIZATION_CNTL fields.
const OVER_RAST_ENABLE: u32 = 1 << 0;
const fn s_over_rast_sample_select(x: u32) -> u32 {
    (x & 0xf) << 1
}
const UNDER_RAST_ENABLE: u32 = 1 << 5;
const fn s_under_rast_sample_select(x: u32) -> u32 {
    (x & 0xf) << 6
}
const PBB_UNCERTAINTY_REGION_ENABLE: u32 = 1 << 10;
const NULL_SQUAD_AA_MASK_ENABLE: u32 = 1 << 11;
const PREZ_AA_MASK_ENABLE: u32 = 1 << 16;
const POSTZ_AA_MASK_ENABLE: u32 = 1 << 17;
const CENTROID_SAMPLE_OVERRIDE: u32 = 1 << 18;

// PA_CL_VRS_CNTL combiner fields.
pub const VRS_COMB_PASSTHRU: u32 = 0;
pub const VRS_COMB_OVERRIDE: u32 = 1;
pub const VRS_COMB_MIN: u32 = 2;
pub const VRS_COMB_MAX: u32 = 3;
const fn s_vertex_rate_combiner(x: u32) -> u32 {
    x & 0x7
}
const fn s_primitive_rate_combiner(x: u32) -> u32 {
    (x & 0x7) << 3
}
const fn s_htile_rate_combiner(x: u32) -> u32 {
    (x & 0x7) << 6
}
const fn s_sample_iter_combiner(x: u32) -> u32 {
    (x & 0x7) << 9
}

/// Reduced multisample state. `pa_sc_mode_cntl_1` still lacks the
/// out-of-order bits; the emitter adds them once the rasterization-order
/// decision is made.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct MultisampleReduced {
    pub num_samples: u32,
    pub log2_samples: u32,
    /// Fragment-shader iterations per pixel requested by sample shading.
    pub ps_iter_samples: u32,
    pub pa_sc_aa_config: u32,
    pub db_eqaa: u32,
    pub pa_sc_mode_cntl_0: u32,
    pub pa_sc_mode_cntl_1: u32,
    pub pa_sc_aa_mask: [u32; 2],
    pub pa_sc_conservative_rast_cntl: u32,
    /// Per-sample interpolation was forced by the line mode.
    pub uses_bresenham_lines: bool,
}

impl Default for MultisampleReduced {
    fn default() -> Self {
        Self {
            num_samples: 1,
            log2_samples: 0,
            ps_iter_samples: 1,
            pa_sc_aa_config: 0,
            db_eqaa: HIGH_QUALITY_INTERSECTIONS
                | INCOHERENT_EQAA_READS
                | INTERPOLATE_COMP_Z
                | STATIC_ANCHOR_ASSOCIATIONS,
            pa_sc_mode_cntl_0: VPORT_SCISSOR_ENABLE,
            pa_sc_mode_cntl_1: base_mode_cntl_1(),
            pa_sc_aa_mask: [0xffff_ffff; 2],
            pa_sc_conservative_rast_cntl: NULL_SQUAD_AA_MASK_ENABLE,
            uses_bresenham_lines: false,
        }
    }
}

const fn base_mode_cntl_1() -> u32 {
    WALK_ALIGN8_PRIM_FITS_ST
        | WALK_FENCE_ENABLE
        | s_walk_fence_size(3)
        | SUPERTILE_WALK_ORDER_ENABLE
        | TILE_WALK_ORDER_ENABLE
        | MULTI_SHADER_ENGINE_PRIM_DISCARD_ENABLE
        | FORCE_EOV_CNTDWN_ENABLE
        | FORCE_EOV_REZ_ENABLE
}

fn max_sample_dist(log2_samples: u32) -> u32 {
    // Largest programmed sample offset per sample count.
    const DIST: [u32; 5] = [0, 2, 4, 7, 8];
    DIST[log2_samples.min(4) as usize]
}

/// Reduce the multisample and related rasterization state.
pub fn reduce(
    gpu: &GpuInfo,
    ms: &MultisampleDesc,
    raster: &RasterizationDesc,
) -> MultisampleReduced {
    let mut out = MultisampleReduced::default();

    // Bresenham lines rasterize as if single-sampled: all sample locations
    // collapse to the pixel center and the mask is generated at 1x.
    let bresenham = raster.line_mode == vk::LineRasterizationModeEXT::BRESENHAM;
    out.uses_bresenham_lines = bresenham;
    let samples = if bresenham { 1 } else { ms.samples.max(1) };
    out.num_samples = ms.samples.max(1);
    out.log2_samples = samples.trailing_zeros();

    if gpu.gfx_level >= GfxLevel::Gfx9 {
        out.pa_sc_mode_cntl_0 |= ALTERNATE_RBS_PER_TILE;
    }
    if raster.line_stipple.is_some() {
        out.pa_sc_mode_cntl_0 |= LINE_STIPPLE_ENABLE;
    }

    let mask = ms.sample_mask & 0xffff;
    out.pa_sc_aa_mask = [mask | (mask << 16); 2];

    out.ps_iter_samples = if ms.sample_shading_enable {
        let wanted = (samples as f32 * ms.min_sample_shading).ceil() as u32;
        wanted.clamp(1, samples).next_power_of_two()
    } else {
        1
    };

    if samples > 1 || ms.sample_locations_enable {
        let log_samples = out.log2_samples;
        let log_ps_iter = out.ps_iter_samples.trailing_zeros();
        out.pa_sc_mode_cntl_0 |= MSAA_ENABLE;
        out.pa_sc_aa_config |= s_msaa_num_samples(log_samples)
            | AA_MASK_CENTROID_DTMN
            | s_max_sample_dist(max_sample_dist(log_samples))
            | s_msaa_exposed_samples(log_samples);
        if gpu.gfx_level >= GfxLevel::Gfx10_3 {
            out.pa_sc_aa_config |= COVERED_CENTROID_IS_CENTER;
        }
        out.db_eqaa |= s_max_anchor_samples(log_samples)
            | s_ps_iter_samples(log_ps_iter)
            | s_mask_export_num_samples(log_samples)
            | s_alpha_to_mask_num_samples(log_samples);
        if out.ps_iter_samples > 1 {
            out.pa_sc_mode_cntl_1 |= PS_ITER_SAMPLE;
        }
    }

    out.pa_sc_conservative_rast_cntl = conservative_rast_cntl(raster.conservative_mode);

    out
}

fn conservative_rast_cntl(mode: vk::ConservativeRasterizationModeEXT) -> u32 {
    match mode {
        vk::ConservativeRasterizationModeEXT::OVERESTIMATE => {
            PREZ_AA_MASK_ENABLE
                | POSTZ_AA_MASK_ENABLE
                | CENTROID_SAMPLE_OVERRIDE
                | OVER_RAST_ENABLE
                | s_over_rast_sample_select(0)
                | s_under_rast_sample_select(1)
                | PBB_UNCERTAINTY_REGION_ENABLE
        }
        vk::ConservativeRasterizationModeEXT::UNDERESTIMATE => {
            PREZ_AA_MASK_ENABLE
                | POSTZ_AA_MASK_ENABLE
                | CENTROID_SAMPLE_OVERRIDE
                | UNDER_RAST_ENABLE
                | s_over_rast_sample_select(1)
                | s_under_rast_sample_select(0)
        }
        _ => NULL_SQUAD_AA_MASK_ENABLE,
    }
}

pub const VRS_COMB_SATURATE: u32 = 4;

fn vrs_combiner(op: vk::FragmentShadingRateCombinerOpKHR) -> u32 {
    match op {
        vk::FragmentShadingRateCombinerOpKHR::KEEP => VRS_COMB_PASSTHRU,
        vk::FragmentShadingRateCombinerOpKHR::REPLACE => VRS_COMB_OVERRIDE,
        vk::FragmentShadingRateCombinerOpKHR::MIN => VRS_COMB_MIN,
        vk::FragmentShadingRateCombinerOpKHR::MAX => VRS_COMB_MAX,
        vk::FragmentShadingRateCombinerOpKHR::MUL => VRS_COMB_SATURATE,
        _ => VRS_COMB_PASSTHRU,
    }
}

/// Build PA_CL_VRS_CNTL. `force_sample_iter` is set when the fragment
/// shader observably iterates samples (reads the sample mask or runs
/// per-sample); the sample-iteration combiner must then override whatever
/// coarser rate the pipeline or primitive asked for.
pub fn vrs_cntl(rate: Option<&FragmentShadingRateDesc>, force_sample_iter: bool) -> u32 {
    let (vertex, htile) = match rate {
        Some(r) => (vrs_combiner(r.combiners[0]), vrs_combiner(r.combiners[1])),
        None => (VRS_COMB_PASSTHRU, VRS_COMB_PASSTHRU),
    };
    let mut cntl = s_vertex_rate_combiner(vertex)
        | s_primitive_rate_combiner(VRS_COMB_PASSTHRU)
        | s_htile_rate_combiner(htile);
    if force_sample_iter {
        cntl |= s_sample_iter_combiner(VRS_COMB_OVERRIDE);
    } else {
        cntl |= s_sample_iter_combiner(VRS_COMB_PASSTHRU);
    }
    cntl
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::gpu_info::GfxLevel;

    #[test]
    fn single_sample_has_no_aa_config() {
        let gpu = GpuInfo::new(GfxLevel::Gfx10_3);
        let r = reduce(&gpu, &MultisampleDesc::default(), &RasterizationDesc::default());
        assert_eq!(r.pa_sc_aa_config, 0);
        assert_eq!(r.num_samples, 1);
        assert_eq!(r.pa_sc_mode_cntl_0 & MSAA_ENABLE, 0);
    }

    #[test]
    fn msaa4_samples_and_eqaa() {
        let gpu = GpuInfo::new(GfxLevel::Gfx10_3);
        let ms = MultisampleDesc {
            samples: 4,
            ..Default::default()
        };
        let r = reduce(&gpu, &ms, &RasterizationDesc::default());
        assert_eq!(r.num_samples, 4);
        assert_eq!(r.pa_sc_aa_config & 0x7, 2);
        assert_eq!(r.db_eqaa & 0x7, 2);
        assert_ne!(r.pa_sc_mode_cntl_0 & MSAA_ENABLE, 0);
    }

    #[test]
    fn sample_shading_rounds_to_pow2() {
        let gpu = GpuInfo::new(GfxLevel::Gfx10_3);
        let ms = MultisampleDesc {
            samples: 8,
            sample_shading_enable: true,
            min_sample_shading: 0.4,
            ..Default::default()
        };
        let r = reduce(&gpu, &ms, &RasterizationDesc::default());
        // ceil(8 * 0.4) = 4, already a power of two.
        assert_eq!(r.ps_iter_samples, 4);
        assert_ne!(r.pa_sc_mode_cntl_1 & PS_ITER_SAMPLE, 0);
    }

    #[test]
    fn bresenham_lines_pin_mask_generation_to_1x() {
        let gpu = GpuInfo::new(GfxLevel::Gfx10_3);
        let ms = MultisampleDesc {
            samples: 4,
            ..Default::default()
        };
        let raster = RasterizationDesc {
            line_mode: vk::LineRasterizationModeEXT::BRESENHAM,
            ..Default::default()
        };
        let r = reduce(&gpu, &ms, &raster);
        assert_eq!(r.pa_sc_aa_config, 0);
        assert!(r.uses_bresenham_lines);
        // The attachment sample count is still 4 for the render backends.
        assert_eq!(r.num_samples, 4);
    }

    #[test]
    fn conservative_modes_are_distinct() {
        let over = conservative_rast_cntl(vk::ConservativeRasterizationModeEXT::OVERESTIMATE);
        let under = conservative_rast_cntl(vk::ConservativeRasterizationModeEXT::UNDERESTIMATE);
        let off = conservative_rast_cntl(vk::ConservativeRasterizationModeEXT::DISABLED);
        assert_ne!(over, under);
        assert_ne!(over & OVER_RAST_ENABLE, 0);
        assert_ne!(under & UNDER_RAST_ENABLE, 0);
        assert_ne!(over & PBB_UNCERTAINTY_REGION_ENABLE, 0);
        assert_eq!(under & PBB_UNCERTAINTY_REGION_ENABLE, 0);
        assert_eq!(off, NULL_SQUAD_AA_MASK_ENABLE);
    }

    #[test]
    fn sample_mask_replicates_to_both_registers() {
        let gpu = GpuInfo::new(GfxLevel::Gfx10_3);
        let ms = MultisampleDesc {
            samples: 4,
            sample_mask: 0x5,
            ..Default::default()
        };
        let r = reduce(&gpu, &ms, &RasterizationDesc::default());
        assert_eq!(r.pa_sc_aa_mask[0], 0x0005_0005);
        assert_eq!(r.pa_sc_aa_mask[1], 0x0005_0005);
    }
}
