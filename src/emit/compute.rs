//! Config stream emission for compute pipelines.

use crate::core::error::Error;
use crate::core::gpu_info::{GfxLevel, GpuInfo};
use crate::emit::pm4::Pm4Stream;
use crate::emit::regs::*;
use crate::emit::{RegisterStreams, CONFIG_STREAM_BUDGET};
use crate::shader::ShaderModule;
use crate::util::div_round_up;

const NUM_USER_SGPRS: u32 = 16;
const LDS_GRANULE: u32 = 512;

/// Emit the register streams for a compute pipeline. The context stream is
/// empty; everything compute needs is persistent state.
pub fn emit_compute(gpu: &GpuInfo, module: &ShaderModule) -> Result<RegisterStreams, Error> {
    let mut cfg = Pm4Stream::new(CONFIG_STREAM_BUDGET);
    let info = module.info();
    let wg = info.workgroup_size;

    cfg.set_reg_seq(COMPUTE_NUM_THREAD_X, &[wg[0], wg[1], wg[2]]);

    let va = module.entry_va();
    cfg.set_reg_seq(COMPUTE_PGM_LO, &[(va >> 8) as u32, (va >> 40) as u32]);

    let mut rsrc1 = s_rsrc1_vgprs(module.num_vgprs(), module.wave_size())
        | s_rsrc1_sgprs(module.num_sgprs())
        | s_rsrc1_float_mode(FLOAT_MODE_DEFAULT)
        | RSRC1_DX10_CLAMP;
    if gpu.gfx_level >= GfxLevel::Gfx10 {
        rsrc1 |= RSRC1_MEM_ORDERED;
        if module.wave_size() == 32 {
            rsrc1 |= RSRC1_WGP_MODE;
        }
    }

    let mut rsrc2 = s_cs_rsrc2_user_sgpr(NUM_USER_SGPRS)
        | CS_RSRC2_TGID_X_EN
        | CS_RSRC2_TGID_Y_EN
        | CS_RSRC2_TGID_Z_EN
        | CS_RSRC2_TG_SIZE_EN
        | s_cs_rsrc2_tidig_comp_cnt(if wg[2] > 1 {
            2
        } else if wg[1] > 1 {
            1
        } else {
            0
        })
        | s_cs_rsrc2_lds_size(div_round_up(module.lds_bytes(), LDS_GRANULE));
    if module.scratch_bytes_per_wave() > 0 {
        rsrc2 |= CS_RSRC2_SCRATCH_EN;
    }

    cfg.set_reg_seq(COMPUTE_PGM_RSRC1, &[rsrc1, rsrc2]);
    cfg.set_reg(COMPUTE_RESOURCE_LIMITS, compute_resource_limits(gpu, module));
    if gpu.gfx_level >= GfxLevel::Gfx10 {
        cfg.set_reg(COMPUTE_PGM_RSRC3, 0);
    }

    Ok(RegisterStreams {
        context: Vec::new(),
        config: cfg.finish()?,
    })
}

fn compute_resource_limits(gpu: &GpuInfo, module: &ShaderModule) -> u32 {
    let wg = module.info().workgroup_size;
    let threads = (wg[0] * wg[1] * wg[2]).max(1);
    let waves_per_threadgroup = div_round_up(threads, module.wave_size());

    let mut limits = s_waves_per_sh(0) | s_lock_threshold(0) | s_cu_group_count(0);
    // Pairing tiny threadgroups on one CU keeps the SPI pipelined.
    if gpu.gfx_level >= GfxLevel::Gfx10 && waves_per_threadgroup == 1 {
        limits |= s_tg_per_cu(2);
    }
    limits
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::alloc::slab::SlabAllocator;
    use crate::alloc::traits::Allocator;
    use crate::core::gpu_info::GfxLevel;
    use crate::shader::ir::{BinaryModule, ShaderInfo, ShaderStage};

    fn module(wg: [u32; 3], wave: u32) -> Arc<ShaderModule> {
        let allocator: Arc<dyn Allocator> = Arc::new(SlabAllocator::new(64 * 1024));
        let mut info = ShaderInfo::new(ShaderStage::Compute);
        info.workgroup_size = wg;
        info.wave_size = wave;
        ShaderModule::upload(
            allocator,
            info,
            &BinaryModule {
                code: vec![0; 64],
                entry_offset: 0,
                num_sgprs: 32,
                num_vgprs: 16,
                lds_bytes: 0,
                scratch_bytes_per_wave: 0,
                wave_size: wave,
            },
        )
        .unwrap()
    }

    #[test]
    fn subgroup32_limits() {
        let gpu = GpuInfo::new(GfxLevel::Gfx10_3);
        let m = module([32, 1, 1], 32);
        let limits = compute_resource_limits(&gpu, &m);
        // One wave per threadgroup: two threadgroups per CU.
        assert_eq!((limits >> 12) & 0xf, 2);

        let m = module([128, 1, 1], 32);
        let limits = compute_resource_limits(&gpu, &m);
        assert_eq!((limits >> 12) & 0xf, 0);
    }

    #[test]
    fn compute_stream_is_config_only() {
        let gpu = GpuInfo::new(GfxLevel::Gfx10_3);
        let m = module([64, 1, 1], 64);
        let streams = emit_compute(&gpu, &m).unwrap();
        assert!(streams.context.is_empty());
        assert!(!streams.config.is_empty());
    }
}
