//! Context/config stream emission for graphics pipelines.

use std::sync::Arc;

use crate::core::error::Error;
use crate::core::gpu_info::{GfxLevel, GpuInfo};
use crate::emit::pm4::Pm4Stream;
use crate::emit::regs::*;
use crate::emit::{
    carries_own_program, hw_stage_for, GeometrySolution, HwStage, RegisterStreams,
    CONFIG_STREAM_BUDGET, CONTEXT_STREAM_BUDGET,
};
use crate::format;
use crate::pipeline::create_info::GraphicsPipelineCreateInfo;
use crate::shader::geometry::{tess_prim_to_output, topology_to_output};
use crate::shader::ir::{slot, OutputPrim, ShaderInfo, ShaderStage, SysValues, TessDomain, TessSpacing};
use crate::shader::linker::LinkOutput;
use crate::shader::ShaderModule;
use crate::state::multisample;
use crate::state::ReducedState;
use crate::util::div_round_up;

const NUM_USER_SGPRS: u32 = 16;
const CU_EN_ALL: u32 = 0xffff;
/// LDS allocation granularity in bytes.
const LDS_GRANULE: u32 = 512;

/// Everything the graphics emitter consumes.
pub struct GraphicsEmitInput<'a> {
    pub gpu: &'a GpuInfo,
    pub state: &'a ReducedState,
    pub create_info: &'a GraphicsPipelineCreateInfo,
    /// Modules in pipeline order.
    pub modules: &'a [Arc<ShaderModule>],
    pub link: &'a LinkOutput,
    pub geometry: &'a GeometrySolution,
    pub out_of_order_rast: bool,
}

impl<'a> GraphicsEmitInput<'a> {
    fn module(&self, stage: ShaderStage) -> Option<&ShaderModule> {
        self.modules
            .iter()
            .find(|m| m.stage() == stage)
            .map(|m| m.as_ref())
    }

    fn last_vertex_module(&self) -> &ShaderModule {
        self.modules
            .iter()
            .rev()
            .find(|m| m.stage().is_vertex_like())
            .expect("graphics pipeline has a vertex-like stage")
            .as_ref()
    }
}

/// Emit both register streams for a graphics pipeline.
pub fn emit_graphics(input: &GraphicsEmitInput) -> Result<RegisterStreams, Error> {
    let mut ctx = Pm4Stream::new(CONTEXT_STREAM_BUDGET);
    let mut cfg = Pm4Stream::new(CONFIG_STREAM_BUDGET);

    emit_blend_state(&mut ctx, input);
    emit_depth_stencil_state(&mut ctx, input);
    emit_multisample_state(&mut ctx, input);
    emit_raster_state(&mut ctx, input);
    emit_geometry_config(&mut ctx, &mut cfg, input)?;
    emit_stage_programs(&mut ctx, &mut cfg, input)?;
    emit_fragment_state(&mut ctx, input);
    emit_binning_state(&mut ctx, input);

    Ok(RegisterStreams {
        context: ctx.finish()?,
        config: cfg.finish()?,
    })
}

fn emit_blend_state(ctx: &mut Pm4Stream, input: &GraphicsEmitInput) {
    let blend = &input.state.blend;
    ctx.set_reg(CB_COLOR_CONTROL, blend.cb_color_control);
    ctx.set_reg_seq(CB_TARGET_MASK, &[blend.cb_target_mask, blend.cb_shader_mask]);
    ctx.set_reg_seq(CB_BLEND0_CONTROL, &blend.cb_blend_control);
    if input.gpu.has_rbplus {
        // The RB-nonplus alternative is the absence of these writes; the
        // reducer computed both and the chip picks which one applies.
        ctx.set_reg_seq(SX_MRT0_BLEND_OPT, &blend.sx_mrt_blend_opt);
    }
    ctx.set_reg(SPI_SHADER_COL_FORMAT, blend.spi_shader_col_format);
    ctx.set_reg(DB_ALPHA_TO_MASK, blend.db_alpha_to_mask);
}

fn emit_depth_stencil_state(ctx: &mut Pm4Stream, input: &GraphicsEmitInput) {
    let ds = &input.state.depth_stencil;
    ctx.set_reg(DB_RENDER_CONTROL, ds.db_render_control);
    ctx.set_reg_seq(DB_RENDER_OVERRIDE, &[ds.db_render_override, ds.db_render_override2]);
    ctx.set_reg(DB_STENCIL_CONTROL, ds.db_stencil_control);
    ctx.set_reg(DB_DEPTH_CONTROL, ds.db_depth_control);
}

fn emit_multisample_state(ctx: &mut Pm4Stream, input: &GraphicsEmitInput) {
    let ms = &input.state.multisample;
    let mut mode_cntl_1 = ms.pa_sc_mode_cntl_1;
    if input.out_of_order_rast {
        mode_cntl_1 |=
            multisample::OUT_OF_ORDER_PRIMITIVE_ENABLE | multisample::s_out_of_order_water_mark(7);
    }
    ctx.set_reg(DB_EQAA, ms.db_eqaa);
    ctx.set_reg_seq(PA_SC_MODE_CNTL_0, &[ms.pa_sc_mode_cntl_0, mode_cntl_1]);
    ctx.set_reg(PA_SC_AA_CONFIG, ms.pa_sc_aa_config);
    ctx.set_reg_seq(PA_SC_AA_MASK_X0Y0_X1Y0, &ms.pa_sc_aa_mask);
    if input.gpu.gfx_level >= GfxLevel::Gfx10 {
        ctx.set_reg(
            PA_SC_CONSERVATIVE_RASTERIZATION_CNTL,
            ms.pa_sc_conservative_rast_cntl,
        );
    }
    if input.gpu.gfx_level.has_vrs() {
        let fs = input.module(ShaderStage::Fragment).map(|m| m.info().fs);
        let force_sample_iter = fs
            .map(|fs| fs.reads_sample_mask || fs.uses_sample_shading)
            .unwrap_or(false)
            || ms.ps_iter_samples > 1;
        ctx.set_reg(
            PA_CL_VRS_CNTL,
            multisample::vrs_cntl(input.create_info.shading_rate.as_ref(), force_sample_iter),
        );
    }
}

fn emit_raster_state(ctx: &mut Pm4Stream, input: &GraphicsEmitInput) {
    let raster = &input.create_info.rasterization;

    let mut clip_cntl = DX_CLIP_SPACE_DEF | DX_LINEAR_ATTR_CLIP_ENA;
    if raster.depth_clamp_enable {
        clip_cntl |= ZCLIP_NEAR_DISABLE | ZCLIP_FAR_DISABLE;
    }
    if raster.discard_enable {
        clip_cntl |= DX_RASTERIZATION_KILL;
    }
    clip_cntl |= VTE_VPORT_PROVOKE_DISABLE;
    ctx.set_reg(PA_CL_CLIP_CNTL, clip_cntl);

    ctx.set_reg(
        PA_CL_VTE_CNTL,
        VTE_VPORT_X_SCALE_ENA
            | VTE_VPORT_X_OFFSET_ENA
            | VTE_VPORT_Y_SCALE_ENA
            | VTE_VPORT_Y_OFFSET_ENA
            | VTE_VPORT_Z_SCALE_ENA
            | VTE_VPORT_Z_OFFSET_ENA
            | VTE_VTX_W0_FMT,
    );

    // PA_SU_SC_MODE_CNTL: cull mode, winding, polygon mode, provoking vertex.
    let mut su = 0u32;
    if raster.cull_mode.contains(ash::vk::CullModeFlags::FRONT) {
        su |= 1 << 0;
    }
    if raster.cull_mode.contains(ash::vk::CullModeFlags::BACK) {
        su |= 1 << 1;
    }
    if raster.front_face == ash::vk::FrontFace::CLOCKWISE {
        su |= 1 << 2;
    }
    if raster.polygon_mode != ash::vk::PolygonMode::FILL {
        let ptype = if raster.polygon_mode == ash::vk::PolygonMode::POINT {
            0
        } else {
            1
        };
        su |= (1 << 3) | (ptype << 5) | (ptype << 8);
    }
    if raster.depth_bias_enable {
        su |= (1 << 11) | (1 << 12);
    }
    if raster.provoking_vertex_last {
        su |= 1 << 19;
    }
    ctx.set_reg(PA_SU_SC_MODE_CNTL, su);
}

fn gs_out_prim(input: &GraphicsEmitInput) -> u32 {
    let prim = if let Some(mesh) = input.module(ShaderStage::Mesh) {
        mesh.info().mesh.output_prim
    } else if let Some(gs) = input.module(ShaderStage::Geometry) {
        gs.info().gs.output_prim
    } else if let Some(tes) = input.module(ShaderStage::TessEval) {
        tess_prim_to_output(tes.info().tess.domain, tes.info().tess.point_mode)
    } else {
        topology_to_output(input.create_info.input_assembly.topology)
    };
    match prim {
        OutputPrim::Points => OUTPRIM_POINTLIST,
        OutputPrim::LineStrip => OUTPRIM_LINESTRIP,
        OutputPrim::TriangleStrip => OUTPRIM_TRISTRIP,
    }
}

fn vgt_shader_stages_en(input: &GraphicsEmitInput) -> u32 {
    let gpu = input.gpu;
    let has_tess = input.module(ShaderStage::TessCtrl).is_some();
    let has_gs = input.module(ShaderStage::Geometry).is_some();
    let has_mesh = input.module(ShaderStage::Mesh).is_some();
    let ngg = input.geometry.is_ngg();

    let mut stages = 0u32;
    if has_tess {
        stages |= s_ls_en(LS_STAGE_ON) | HS_STAGE_ON;
    }
    if ngg {
        stages |= PRIMGEN_EN | s_es_en(ES_STAGE_REAL) | s_max_primgrp_in_wave(2);
        if has_gs || has_mesh {
            stages |= GS_STAGE_ON;
        }
        let passthrough = input
            .modules
            .iter()
            .rev()
            .find(|m| m.stage().is_vertex_like())
            .map(|m| m.info().ngg.is_passthrough)
            .unwrap_or(false);
        if passthrough {
            stages |= PRIMGEN_PASSTHRU_EN;
            if gpu.gfx_level >= GfxLevel::Gfx10_3 {
                stages |= PRIMGEN_PASSTHRU_NO_MSG;
            }
        }
        if gpu.gfx_level.has_ngg_streamout()
            && input.modules.iter().any(|m| m.info().xfb.is_some())
        {
            stages |= NGG_WAVE_ID_EN;
        }
    } else if has_gs {
        stages |= s_es_en(if has_tess { ES_STAGE_DS } else { ES_STAGE_REAL })
            | GS_STAGE_ON
            | s_vs_en(VS_STAGE_COPY_SHADER);
    } else if has_tess {
        stages |= s_vs_en(VS_STAGE_DS);
    } else {
        stages |= s_vs_en(VS_STAGE_REAL);
    }
    if has_tess && gpu.gfx_level.merged_shaders() {
        stages |= DYNAMIC_HS;
    }
    stages
}

fn emit_geometry_config(
    ctx: &mut Pm4Stream,
    cfg: &mut Pm4Stream,
    input: &GraphicsEmitInput,
) -> Result<(), Error> {
    let gpu = input.gpu;
    ctx.set_reg(VGT_SHADER_STAGES_EN, vgt_shader_stages_en(input));
    ctx.set_reg(VGT_GS_OUT_PRIM_TYPE, gs_out_prim(input));
    ctx.set_reg(VGT_REUSE_OFF, 0);

    // Primitive-id delivery to the hardware VS.
    let fs_reads_prim_id = input
        .module(ShaderStage::Fragment)
        .map(|m| m.info().reads(slot::PRIM_ID))
        .unwrap_or(false);
    let has_gs = input.module(ShaderStage::Geometry).is_some();
    ctx.set_reg(
        VGT_PRIMITIVEID_EN,
        if fs_reads_prim_id && !has_gs && !input.geometry.is_ngg() {
            PRIMITIVEID_EN
        } else if fs_reads_prim_id && input.geometry.is_ngg() && !has_gs {
            PRIMITIVEID_EN | NGG_DISABLE_PROVOK_REUSE
        } else {
            0
        },
    );

    if input.module(ShaderStage::TessCtrl).is_some() {
        let tes_info = input
            .module(ShaderStage::TessEval)
            .map(|m| m.info().clone())
            .unwrap_or_else(|| ShaderInfo::new(ShaderStage::TessEval));
        ctx.set_reg(VGT_TF_PARAM, vgt_tf_param(gpu, &tes_info));
    }

    match input.geometry {
        GeometrySolution::VertexOnly => {
            ctx.set_reg(VGT_GS_MODE, s_gs_mode(GS_MODE_OFF));
        }
        GeometrySolution::Legacy(gs_ring) => {
            let gs = input
                .module(ShaderStage::Geometry)
                .ok_or(Error::InternalAssertion("legacy geometry solution without GS"))?;
            let gs_info = gs.info();
            let mut mode = s_gs_mode(GS_MODE_SCENARIO_G)
                | GS_MODE_ES_WRITE_OPTIMIZE
                | GS_MODE_GS_WRITE_OPTIMIZE;
            if gpu.gfx_level >= GfxLevel::Gfx9 {
                mode |= GS_MODE_ONCHIP_GFX9;
            }
            ctx.set_reg(VGT_GS_MODE, mode);
            ctx.set_reg(
                VGT_GS_ONCHIP_CNTL,
                s_es_verts_per_subgrp(gs_ring.es_verts_per_subgroup)
                    | s_gs_prims_per_subgrp(gs_ring.gs_prims_per_subgroup)
                    | s_gs_inst_prims_in_subgrp(gs_ring.gs_inst_prims_in_subgroup),
            );
            if gpu.gfx_level >= GfxLevel::Gfx9 {
                ctx.set_reg(
                    VGT_GS_MAX_PRIMS_PER_SUBGROUP,
                    gs_ring.max_prims_per_subgroup,
                );
            }
            ctx.set_reg(VGT_ESGS_RING_ITEMSIZE, gs_ring.esgs_itemsize_dw);
            let vertex_dw = gs_info.gs.gsvs_vertex_dwords;
            ctx.set_reg(VGT_GSVS_RING_ITEMSIZE, vertex_dw * gs_info.gs.vertices_out.max(1));
            ctx.set_reg_seq(
                VGT_GSVS_RING_OFFSET_1,
                &[vertex_dw, vertex_dw * 2, vertex_dw * 3],
            );
            ctx.set_reg(VGT_GS_VERT_ITEMSIZE, vertex_dw);
            ctx.set_reg_seq(VGT_GS_VERT_ITEMSIZE_1, &[0, 0, 0]);
            ctx.set_reg(VGT_GS_MAX_VERT_OUT, gs_info.gs.vertices_out);
            ctx.set_reg(
                VGT_GS_INSTANCE_CNT,
                if gs_info.gs.invocations > 1 {
                    GS_INSTANCING_EN | s_gs_instance_cnt(gs_info.gs.invocations)
                } else {
                    0
                },
            );
        }
        GeometrySolution::Ngg(ngg) => {
            ctx.set_reg(VGT_GS_MODE, s_gs_mode(GS_MODE_OFF));
            ctx.set_reg(
                VGT_GS_ONCHIP_CNTL,
                s_es_verts_per_subgrp(ngg.hw_max_esverts)
                    | s_gs_prims_per_subgrp(ngg.max_gsprims)
                    | s_gs_inst_prims_in_subgrp(
                        ngg.max_gsprims
                            * input
                                .module(ShaderStage::Geometry)
                                .map(|g| g.info().gs.invocations.max(1))
                                .unwrap_or(1),
                    ),
            );
            ctx.set_reg(VGT_ESGS_RING_ITEMSIZE, 1);
            ctx.set_reg(VGT_GS_MAX_VERT_OUT, ngg.max_out_verts);
            if let Some(gs) = input.module(ShaderStage::Geometry) {
                let mut inst = if gs.info().gs.invocations > 1 {
                    GS_INSTANCING_EN | s_gs_instance_cnt(gs.info().gs.invocations)
                } else {
                    0
                };
                if ngg.max_vert_out_per_gs_instance {
                    inst |= EN_MAX_VERT_OUT_PER_GS_INSTANCE;
                }
                ctx.set_reg(VGT_GS_INSTANCE_CNT, inst);
            }
            ctx.set_reg(
                PA_CL_NGG_CNTL,
                NGG_VERTEX_REUSE_DEPTH_MAX | NGG_INDEX_BUF_EDGE_FLAG_ENA,
            );
            cfg.set_reg(GE_MAX_OUTPUT_PER_SUBGROUP, ngg.max_out_verts);
        }
    }

    emit_draw_dispatch_config(ctx, cfg, input);
    Ok(())
}

/// IA_MULTI_VGT_PARAM (pre-NGG) or GE_CNTL (NGG generations).
fn emit_draw_dispatch_config(ctx: &mut Pm4Stream, cfg: &mut Pm4Stream, input: &GraphicsEmitInput) {
    let gpu = input.gpu;
    let has_gs = input.module(ShaderStage::Geometry).is_some();
    let has_tess = input.module(ShaderStage::TessCtrl).is_some();
    let uses_prim_id = input
        .modules
        .iter()
        .any(|m| m.info().sysvals.contains(SysValues::PRIM_ID) || m.info().reads(slot::PRIM_ID));

    match input.geometry {
        GeometrySolution::Ngg(ngg) => {
            cfg.set_reg(
                GE_CNTL,
                s_ge_prim_grp_size(ngg.max_gsprims) | s_ge_vert_grp_size(ngg.hw_max_esverts),
            );
            cfg.set_reg(
                GE_PC_ALLOC,
                GE_PC_OVERSUB_EN | s_ge_pc_num_lines(128 * gpu.num_se - 1),
            );
        }
        _ => {
            let mut param = s_primgroup_size(127) | WD_SWITCH_ON_EOP;
            if has_gs && gpu.gfx_level <= GfxLevel::Gfx8 {
                // The ES/VS waves must drain before the GS ring wraps.
                param |= PARTIAL_ES_WAVE_ON | PARTIAL_VS_WAVE_ON;
            }
            if uses_prim_id || (has_tess && has_gs) {
                param |= SWITCH_ON_EOI;
            }
            if gpu.gfx_level >= GfxLevel::Gfx9 {
                cfg.set_reg(IA_MULTI_VGT_PARAM_GFX9, param);
            } else {
                ctx.set_reg(IA_MULTI_VGT_PARAM, param);
            }
        }
    }
}

fn vgt_tf_param(gpu: &GpuInfo, tes: &ShaderInfo) -> u32 {
    let tf_type = match tes.tess.domain {
        TessDomain::Isolines => TF_TYPE_ISOLINE,
        TessDomain::Triangles => TF_TYPE_TRIANGLE,
        TessDomain::Quads => TF_TYPE_QUAD,
    };
    let partitioning = match tes.tess.spacing {
        TessSpacing::Equal => TF_PART_INTEGER,
        TessSpacing::FractionalOdd => TF_PART_FRAC_ODD,
        TessSpacing::FractionalEven => TF_PART_FRAC_EVEN,
    };
    let topology = if tes.tess.point_mode {
        TF_TOPOLOGY_OUTPUT_POINT
    } else if tes.tess.domain == TessDomain::Isolines {
        TF_TOPOLOGY_OUTPUT_LINE
    } else if tes.tess.ccw {
        TF_TOPOLOGY_OUTPUT_TRIANGLE_CCW
    } else {
        TF_TOPOLOGY_OUTPUT_TRIANGLE_CW
    };
    let distribution = if gpu.gfx_level.has_distributed_tess() {
        TF_DIST_MODE_TRAPEZOIDS
    } else {
        TF_DIST_MODE_NO_DIST
    };
    s_tf_type(tf_type)
        | s_tf_partitioning(partitioning)
        | s_tf_topology(topology)
        | s_tf_distribution_mode(distribution)
}

fn rsrc1_for(gpu: &GpuInfo, module: &ShaderModule, feeder: Option<&ShaderModule>) -> u32 {
    let vgprs = module
        .num_vgprs()
        .max(feeder.map(|f| f.num_vgprs()).unwrap_or(0));
    let sgprs = module
        .num_sgprs()
        .max(feeder.map(|f| f.num_sgprs()).unwrap_or(0));
    let mut rsrc1 = s_rsrc1_vgprs(vgprs, module.wave_size())
        | s_rsrc1_sgprs(sgprs)
        | s_rsrc1_float_mode(FLOAT_MODE_DEFAULT)
        | RSRC1_DX10_CLAMP;
    if gpu.gfx_level >= GfxLevel::Gfx10 {
        rsrc1 |= RSRC1_MEM_ORDERED;
    }
    rsrc1
}

fn rsrc2_base(module: &ShaderModule, feeder: Option<&ShaderModule>) -> u32 {
    let mut rsrc2 = s_rsrc2_user_sgpr(NUM_USER_SGPRS);
    let scratch = module.scratch_bytes_per_wave()
        + feeder.map(|f| f.scratch_bytes_per_wave()).unwrap_or(0);
    if scratch > 0 {
        rsrc2 |= RSRC2_SCRATCH_EN;
    }
    rsrc2
}

fn set_pgm(cfg: &mut Pm4Stream, lo_reg: u32, module: &ShaderModule) {
    let va = module.entry_va();
    debug_assert_eq!(va & 0xff, 0, "shader entry must be 256-byte aligned");
    cfg.set_reg_seq(lo_reg, &[(va >> 8) as u32, (va >> 40) as u32]);
}

fn emit_stage_programs(
    ctx: &mut Pm4Stream,
    cfg: &mut Pm4Stream,
    input: &GraphicsEmitInput,
) -> Result<(), Error> {
    let gpu = input.gpu;
    let has_tess = input.module(ShaderStage::TessCtrl).is_some();
    let has_gs = input.module(ShaderStage::Geometry).is_some();
    let ngg = input.geometry.is_ngg();
    let last_vtx = input
        .modules
        .iter()
        .rev()
        .find(|m| m.stage().is_vertex_like())
        .map(|m| m.stage());

    for module in input.modules {
        let stage_is_ngg = ngg && Some(module.stage()) == last_vtx;
        let hw = hw_stage_for(gpu, module.stage(), has_tess, has_gs, stage_is_ngg);
        if !carries_own_program(gpu, hw) {
            continue;
        }
        let feeder = merged_feeder(input, module.stage(), hw);
        match hw {
            HwStage::Ps => emit_hw_ps_program(cfg, gpu, module),
            HwStage::Vs => emit_hw_vs(ctx, cfg, input, module),
            HwStage::Es => {
                set_pgm(cfg, SPI_SHADER_PGM_LO_ES, module);
                let mut rsrc2 = rsrc2_base(module, None);
                if module.stage() == ShaderStage::TessEval {
                    // Off-chip tess factors ride the LDS path.
                    rsrc2 |= RSRC2_OC_LDS_EN;
                }
                cfg.set_reg_seq(
                    SPI_SHADER_PGM_RSRC1_ES,
                    &[rsrc1_for(gpu, module, None), rsrc2],
                );
            }
            HwStage::Ls => {
                set_pgm(cfg, SPI_SHADER_PGM_LO_LS, module);
                cfg.set_reg_seq(
                    SPI_SHADER_PGM_RSRC1_LS,
                    &[rsrc1_for(gpu, module, None), rsrc2_base(module, None)],
                );
            }
            HwStage::Hs => {
                set_pgm(cfg, SPI_SHADER_PGM_LO_HS, module);
                let mut rsrc2 = rsrc2_base(module, feeder) | RSRC2_OC_LDS_EN;
                rsrc2 |= s_rsrc2_lds_size(div_round_up(module.lds_bytes(), LDS_GRANULE));
                cfg.set_reg_seq(
                    SPI_SHADER_PGM_RSRC1_HS,
                    &[rsrc1_for(gpu, module, feeder), rsrc2],
                );
                cfg.set_reg(SPI_SHADER_PGM_RSRC3_HS, CU_EN_ALL);
            }
            HwStage::Gs => emit_hw_gs(ctx, cfg, input, module, feeder)?,
            HwStage::Ngg => emit_hw_ngg(ctx, cfg, input, module, feeder)?,
            HwStage::Cs => {
                // Task shaders are dispatched through the compute path by
                // the command recorder; nothing to program here.
            }
        }
    }
    Ok(())
}

/// The API stage folded into a merged hardware program, if any.
fn merged_feeder<'a>(
    input: &'a GraphicsEmitInput,
    stage: ShaderStage,
    hw: HwStage,
) -> Option<&'a ShaderModule> {
    if !input.gpu.gfx_level.merged_shaders() {
        return None;
    }
    match (stage, hw) {
        (ShaderStage::TessCtrl, HwStage::Hs) => input.module(ShaderStage::Vertex),
        (ShaderStage::Geometry, HwStage::Gs) | (ShaderStage::Geometry, HwStage::Ngg) => input
            .module(ShaderStage::TessEval)
            .or_else(|| input.module(ShaderStage::Vertex)),
        _ => None,
    }
}

fn emit_hw_vs(
    ctx: &mut Pm4Stream,
    cfg: &mut Pm4Stream,
    input: &GraphicsEmitInput,
    module: &ShaderModule,
) {
    let gpu = input.gpu;
    set_pgm(cfg, SPI_SHADER_PGM_LO_VS, module);
    cfg.set_reg_seq(
        SPI_SHADER_PGM_RSRC1_VS,
        &[rsrc1_for(gpu, module, None), rsrc2_base(module, None)],
    );
    cfg.set_reg(SPI_SHADER_PGM_RSRC3_VS, CU_EN_ALL);
    // Late VS allocation keeps the PC from overflowing with param exports.
    let late_alloc = gpu.num_cu_per_se.saturating_sub(2) * 4;
    cfg.set_reg(SPI_SHADER_LATE_ALLOC_VS, late_alloc.min(64));

    emit_vertex_export_state(ctx, input, module.info());
}

fn emit_hw_gs(
    ctx: &mut Pm4Stream,
    cfg: &mut Pm4Stream,
    input: &GraphicsEmitInput,
    module: &ShaderModule,
    feeder: Option<&ShaderModule>,
) -> Result<(), Error> {
    let gpu = input.gpu;
    set_pgm(cfg, SPI_SHADER_PGM_LO_GS, module);
    let lds = match input.geometry {
        GeometrySolution::Legacy(ring) => ring.lds_granules * 128 * 4,
        _ => return Err(Error::InternalAssertion("legacy GS without a ring solution")),
    };
    let mut rsrc2 = rsrc2_base(module, feeder);
    if gpu.gfx_level.merged_shaders() {
        rsrc2 |= s_rsrc2_lds_size(div_round_up(lds, LDS_GRANULE)) | RSRC2_OC_LDS_EN;
    }
    cfg.set_reg_seq(
        SPI_SHADER_PGM_RSRC1_GS,
        &[rsrc1_for(gpu, module, feeder), rsrc2],
    );
    cfg.set_reg(SPI_SHADER_PGM_RSRC3_GS, CU_EN_ALL);

    // The copy shader that drains the GS ring lives in the same binary and
    // is dispatched as the hardware VS.
    set_pgm(cfg, SPI_SHADER_PGM_LO_VS, module);
    cfg.set_reg_seq(
        SPI_SHADER_PGM_RSRC1_VS,
        &[rsrc1_for(gpu, module, None), rsrc2_base(module, None)],
    );
    cfg.set_reg(SPI_SHADER_PGM_RSRC3_VS, CU_EN_ALL);
    cfg.set_reg(SPI_SHADER_LATE_ALLOC_VS, gpu.num_cu_per_se.saturating_sub(2) * 4);

    emit_vertex_export_state(ctx, input, module.info());
    Ok(())
}

fn emit_hw_ngg(
    ctx: &mut Pm4Stream,
    cfg: &mut Pm4Stream,
    input: &GraphicsEmitInput,
    module: &ShaderModule,
    feeder: Option<&ShaderModule>,
) -> Result<(), Error> {
    let gpu = input.gpu;
    let ngg = match input.geometry {
        GeometrySolution::Ngg(ngg) => ngg,
        _ => return Err(Error::InternalAssertion("NGG stage without an NGG solution")),
    };
    set_pgm(cfg, SPI_SHADER_PGM_LO_GS, module);
    let lds_bytes = module.lds_bytes().max(
        (ngg.max_esverts * ngg.esvert_lds_dw + ngg.ngg_emit_dw) * 4,
    );
    let rsrc2 = rsrc2_base(module, feeder)
        | s_rsrc2_lds_size(div_round_up(lds_bytes, LDS_GRANULE))
        | RSRC2_OC_LDS_EN;
    let mut rsrc1 = rsrc1_for(gpu, module, feeder);
    if module.wave_size() == 32 {
        rsrc1 |= RSRC1_WGP_MODE;
    }
    cfg.set_reg_seq(SPI_SHADER_PGM_RSRC1_GS, &[rsrc1, rsrc2]);
    cfg.set_reg(SPI_SHADER_PGM_RSRC3_GS, CU_EN_ALL);
    cfg.set_reg(SPI_SHADER_PGM_RSRC4_GS, CU_EN_ALL);

    // NGG exports attributes itself; the index format tells the PA how to
    // read the primitive connectivity exports.
    ctx.set_reg(SPI_SHADER_IDX_FORMAT, 1);
    emit_vertex_export_state(ctx, input, module.info());
    Ok(())
}

fn emit_hw_ps_program(cfg: &mut Pm4Stream, gpu: &GpuInfo, module: &ShaderModule) {
    set_pgm(cfg, SPI_SHADER_PGM_LO_PS, module);
    let mut rsrc2 = rsrc2_base(module, None);
    rsrc2 |= s_rsrc2_extra_lds_size_ps(div_round_up(module.lds_bytes(), LDS_GRANULE));
    cfg.set_reg_seq(
        SPI_SHADER_PGM_RSRC1_PS,
        &[rsrc1_for(gpu, module, None), rsrc2],
    );
    cfg.set_reg(SPI_SHADER_PGM_RSRC3_PS, CU_EN_ALL);
}

/// Position/parameter export configuration of the hardware vertex stage.
fn emit_vertex_export_state(ctx: &mut Pm4Stream, input: &GraphicsEmitInput, info: &ShaderInfo) {
    let num_params = info
        .driver_locations
        .iter()
        .filter(|&&l| l != crate::shader::ir::NO_LOCATION)
        .count() as u32;
    let mut out_config = s_vs_export_count(num_params.saturating_sub(1));
    if num_params == 0 {
        out_config |= VS_NO_PC_EXPORT;
    }
    ctx.set_reg(SPI_VS_OUT_CONFIG, out_config);

    // One position export, plus the misc vector when any of its users is
    // written.
    let misc_vec = info.writes(slot::PSIZ) || info.writes(slot::LAYER) || info.writes(slot::VIEWPORT);
    let clip_culls = (info.clip_dist_mask | info.cull_dist_mask) as u32;
    let mut pos_format = s_pos0_export_format(SPI_SHADER_4COMP);
    let mut num_pos = 1;
    if misc_vec {
        num_pos += 1;
    }
    if clip_culls & 0x0f != 0 {
        num_pos += 1;
    }
    if clip_culls & 0xf0 != 0 {
        num_pos += 1;
    }
    for i in 1..num_pos {
        pos_format |= s_pos0_export_format(SPI_SHADER_4COMP) << (4 * i);
    }
    ctx.set_reg(SPI_SHADER_POS_FORMAT, pos_format);

    let mut out_cntl = s_clip_dist_ena(clip_culls);
    if clip_culls & 0x0f != 0 {
        out_cntl |= VS_OUT_CCDIST0_VEC_ENA;
    }
    if clip_culls & 0xf0 != 0 {
        out_cntl |= VS_OUT_CCDIST1_VEC_ENA;
    }
    if misc_vec {
        out_cntl |= VS_OUT_MISC_VEC_ENA;
        if info.writes(slot::PSIZ) {
            out_cntl |= USE_VTX_POINT_SIZE;
        }
        if info.writes(slot::LAYER) {
            out_cntl |= USE_VTX_RENDER_TARGET_INDX;
        }
        if info.writes(slot::VIEWPORT) {
            out_cntl |= USE_VTX_VIEWPORT_INDX;
        }
    }
    if input.geometry.is_ngg() {
        out_cntl |= VS_OUT_MISC_SIDE_BUS_ENA;
    }
    ctx.set_reg(PA_CL_VS_OUT_CNTL, out_cntl);
}

fn emit_fragment_state(ctx: &mut Pm4Stream, input: &GraphicsEmitInput) {
    let Some(fs) = input.module(ShaderStage::Fragment) else {
        // Depth-only pipeline: nothing reads the interpolators.
        ctx.set_reg(SPI_PS_INPUT_ENA, PS_PERSP_CENTER_ENA);
        ctx.set_reg(SPI_PS_INPUT_ADDR, PS_PERSP_CENTER_ENA);
        ctx.set_reg(SPI_PS_IN_CONTROL, s_num_interp(0));
        ctx.set_reg(SPI_SHADER_Z_FORMAT, SPI_Z_EXPORT_ZERO);
        ctx.set_reg(DB_SHADER_CONTROL, s_db_z_order(Z_ORDER_EARLY_Z_THEN_LATE_Z));
        return;
    };
    let fs_info = fs.info();
    let producer = input.last_vertex_module().info();

    let (cntls, num_interp, num_prim_interp) = build_ps_input_table(input, producer, fs_info);
    if !cntls.is_empty() {
        ctx.set_reg_seq(SPI_PS_INPUT_CNTL_0, &cntls);
    }

    let mut in_control = s_num_interp(num_interp) | s_num_prim_interp(num_prim_interp);
    if fs_info.wave_size == 32 {
        in_control |= PS_W32_EN;
    }
    ctx.set_reg(SPI_PS_IN_CONTROL, in_control);

    let ena = ps_input_ena(input, fs_info);
    ctx.set_reg_seq(SPI_PS_INPUT_ENA, &[ena, ena]);

    let ps_iter = input.state.multisample.ps_iter_samples > 1 || fs_info.fs.uses_sample_shading;
    ctx.set_reg(
        SPI_BARYC_CNTL,
        s_baryc_pos_float_location(if ps_iter { 2 } else { 0 }) | BARYC_FRONT_FACE_ALL_BITS,
    );

    let z_format = if fs_info.fs.writes_z {
        if fs_info.fs.writes_stencil || fs_info.fs.writes_sample_mask {
            SPI_Z_EXPORT_32_GR
        } else {
            SPI_Z_EXPORT_32_R
        }
    } else if fs_info.fs.writes_stencil || fs_info.fs.writes_sample_mask {
        SPI_Z_EXPORT_32_GR
    } else {
        SPI_Z_EXPORT_ZERO
    };
    ctx.set_reg(SPI_SHADER_Z_FORMAT, z_format);

    ctx.set_reg(DB_SHADER_CONTROL, db_shader_control(input, fs_info));
}

fn build_ps_input_table(
    input: &GraphicsEmitInput,
    producer: &ShaderInfo,
    fs: &ShaderInfo,
) -> (Vec<u32>, u32, u32) {
    let is_mesh = input.module(ShaderStage::Mesh).is_some();
    let mut cntls: Vec<u32> = Vec::new();
    let mut num_prim = 0u32;

    let entry = |slot_idx: u32, flat: bool, prim_attr: bool| -> u32 {
        let loc = producer.driver_locations[slot_idx as usize];
        let mut v = if loc == crate::shader::ir::NO_LOCATION {
            // Producer never exported it: read the default constant.
            s_ps_input_offset(0x20) | s_ps_input_default_val(0)
        } else {
            s_ps_input_offset(loc as u32)
        };
        if flat || fs.fs.flat_inputs & slot::mask(slot_idx) != 0 {
            v |= PS_INPUT_FLAT_SHADE;
        }
        if fs.fs.float16_inputs & slot::mask(slot_idx) != 0 {
            v |= PS_INPUT_FP16_INTERP_MODE | PS_INPUT_ATTR0_VALID;
        }
        if prim_attr {
            v |= PS_INPUT_PRIM_ATTR;
        }
        v
    };

    // Fixed order: primitive id, layer, viewport, point coord, clip
    // distances, per-vertex user varyings; per-primitive entries close the
    // table.
    if fs.reads(slot::PRIM_ID) && !is_mesh {
        cntls.push(entry(slot::PRIM_ID, true, false));
    }
    if fs.reads(slot::LAYER) && fs.per_primitive_inputs & slot::mask(slot::LAYER) == 0 {
        cntls.push(entry(slot::LAYER, true, false));
    }
    if fs.reads(slot::VIEWPORT) && fs.per_primitive_inputs & slot::mask(slot::VIEWPORT) == 0 {
        cntls.push(entry(slot::VIEWPORT, true, false));
    }
    if fs.reads(slot::PNTC) {
        cntls.push(s_ps_input_offset(0x20) | PS_INPUT_PT_SPRITE_TEX);
    }
    if fs.fs.input_clips_culls > 0 {
        cntls.push(entry(slot::CLIP_DIST0, false, false));
        if fs.fs.input_clips_culls > 4 {
            cntls.push(entry(slot::CLIP_DIST1, false, false));
        }
    }
    for i in 0..slot::NUM_VARS {
        let s = slot::var(i);
        if fs.reads(s) && fs.per_primitive_inputs & slot::mask(s) == 0 {
            cntls.push(entry(s, false, false));
        }
    }
    let num_interp = cntls.len() as u32;

    // Per-primitive attributes must come last.
    let per_prim_specials = [slot::PRIM_ID, slot::LAYER, slot::VIEWPORT];
    for s in per_prim_specials {
        if fs.reads(s) && fs.per_primitive_inputs & slot::mask(s) != 0 {
            cntls.push(entry(s, true, true));
            num_prim += 1;
        }
    }
    for i in 0..slot::NUM_VARS {
        let s = slot::var(i);
        if fs.reads(s) && fs.per_primitive_inputs & slot::mask(s) != 0 {
            cntls.push(entry(s, false, true));
            num_prim += 1;
        }
    }

    if cntls.len() > 32 {
        error!("PS input table overflow: {} entries", cntls.len());
        cntls.truncate(32);
    }
    (cntls, num_interp, num_prim)
}

fn ps_input_ena(input: &GraphicsEmitInput, fs: &ShaderInfo) -> u32 {
    let mut ena = 0u32;
    let per_sample = input.state.multisample.ps_iter_samples > 1
        || fs.fs.uses_sample_shading
        || fs.sysvals.contains(SysValues::SAMPLE_ID);
    if fs.inputs_read != 0 || fs.sysvals.contains(SysValues::BARYCENTRICS) {
        ena |= if per_sample {
            PS_PERSP_SAMPLE_ENA
        } else {
            PS_PERSP_CENTER_ENA
        };
    }
    if fs.sysvals.contains(SysValues::FRAG_COORD) {
        ena |= PS_POS_X_FLOAT_ENA | PS_POS_Y_FLOAT_ENA | PS_POS_Z_FLOAT_ENA | PS_POS_W_FLOAT_ENA;
    }
    if fs.sysvals.contains(SysValues::FRONT_FACE) {
        ena |= PS_FRONT_FACE_ENA;
    }
    if fs.sysvals.contains(SysValues::SAMPLE_ID)
        || fs.sysvals.contains(SysValues::SAMPLE_POS)
    {
        ena |= PS_ANCILLARY_ENA;
    }
    if fs.fs.reads_sample_mask {
        ena |= PS_SAMPLE_COVERAGE_ENA;
    }
    // At least one interpolant must be enabled or the SPI wedges.
    if ena == 0 {
        ena = PS_PERSP_CENTER_ENA;
    }
    ena
}

fn db_shader_control(input: &GraphicsEmitInput, fs: &ShaderInfo) -> u32 {
    let gpu = input.gpu;
    let mut control = 0u32;
    if fs.fs.writes_z {
        control |= DB_Z_EXPORT_ENABLE;
    }
    if fs.fs.writes_stencil {
        control |= DB_STENCIL_TEST_VAL_EXPORT_ENABLE;
    }
    if fs.fs.can_discard {
        control |= DB_KILL_ENABLE;
    }
    if fs.fs.writes_sample_mask {
        control |= DB_MASK_EXPORT_ENABLE;
    }
    // Early Z is safe when the shader has no side effects that could be
    // observed for killed fragments, or when it asked for it explicitly.
    let z_order = if fs.fs.early_fragment_tests || !fs.writes_memory {
        Z_ORDER_EARLY_Z_THEN_LATE_Z
    } else {
        Z_ORDER_LATE_Z
    };
    control |= s_db_z_order(z_order);
    if fs.fs.early_fragment_tests {
        control |= DB_DEPTH_BEFORE_SHADER;
        if fs.fs.reads_sample_mask {
            control |= DB_PRE_SHADER_DEPTH_COVERAGE_ENABLE;
        }
    }
    if fs.writes_memory {
        control |= DB_EXEC_ON_HIER_FAIL;
    }
    if input.state.multisample.num_samples > 1 && input.create_info.multisample.alpha_to_coverage {
        control |= DB_COVERAGE_TO_MASK_ENABLE;
    }
    // RB+ exists but this pipeline may not use it.
    if gpu.has_rbplus && !gpu.rbplus_allowed {
        control |= DB_DUAL_QUAD_DISABLE;
    }
    control
}

/// The binning decision recorded on the pipeline: `Some(bin size)` when the
/// binner may run.
pub(crate) fn binning_decision(input: &GraphicsEmitInput) -> Option<(u32, u32)> {
    let gpu = input.gpu;
    if !gpu.gfx_level.has_pbb() || !gpu.pbb_allowed {
        return None;
    }
    let (color_bytes, _, depth_bytes) = render_target_cost(input);
    compute_bin_size(gpu, color_bytes, depth_bytes, input.state.multisample.num_samples)
}

fn render_target_cost(input: &GraphicsEmitInput) -> (u32, u32, u32) {
    let rendering = &input.create_info.rendering_info;
    let mut color_bytes = 0u32;
    let mut min_color_bpp = u32::MAX;
    for (i, &fmt) in rendering.color_formats.iter().enumerate() {
        if (input.state.blend.cb_target_mask >> (4 * i)) & 0xf == 0 {
            continue;
        }
        let b = format::byte_size(fmt);
        if b > 0 {
            color_bytes += b;
            min_color_bpp = min_color_bpp.min(b);
        }
    }
    let depth_bytes = format::depth_byte_size(rendering.depth_format, rendering.stencil_format);
    (color_bytes, min_color_bpp, depth_bytes)
}

fn emit_binning_state(ctx: &mut Pm4Stream, input: &GraphicsEmitInput) {
    let gpu = input.gpu;
    if !gpu.gfx_level.has_pbb() {
        return;
    }
    let samples = input.state.multisample.num_samples;
    let (color_bytes, min_color_bpp, depth_bytes) = render_target_cost(input);
    let bin = compute_bin_size(gpu, color_bytes, depth_bytes, samples);
    let cntl = match bin {
        Some((x, y)) if gpu.pbb_allowed => {
            let (x16, xext) = bin_size_extend(x);
            let (y16, yext) = bin_size_extend(y);
            let mut v = s_binning_mode(BINNING_ALLOWED)
                | s_context_states_per_bin(1)
                | s_persistent_states_per_bin(1)
                | s_fpovs_per_batch(63)
                | OPTIMAL_BIN_SELECTION
                | FLUSH_ON_BINNING_TRANSITION;
            if x16 {
                v |= BIN_SIZE_X_16;
            } else {
                v |= s_bin_size_x_extend(xext);
            }
            if y16 {
                v |= BIN_SIZE_Y_16;
            } else {
                v |= s_bin_size_y_extend(yext);
            }
            v
        }
        _ => {
            debug!("binning disabled (colors {color_bytes}B, depth {depth_bytes}B, {samples}x)");
            let mut v = s_binning_mode(BINNING_DISABLED_LEGACY_SC) | FLUSH_ON_BINNING_TRANSITION;
            if gpu.gfx_level >= GfxLevel::Gfx10 {
                // The disabled mode still wants a bin size programmed.
                let y = if min_color_bpp != u32::MAX && min_color_bpp <= 4 {
                    128
                } else {
                    64
                };
                let (_, xext) = bin_size_extend(128);
                let (_, yext) = bin_size_extend(y);
                v |= s_bin_size_x_extend(xext) | s_bin_size_y_extend(yext);
            }
            v
        }
    };
    ctx.set_reg(PA_SC_BINNER_CNTL_0, cntl);
}

/// Bin size from the per-chip table, `None` when the footprint is too large
/// to bin profitably.
fn compute_bin_size(
    gpu: &GpuInfo,
    color_bytes: u32,
    depth_bytes: u32,
    samples: u32,
) -> Option<(u32, u32)> {
    let pixel_cost = (color_bytes.max(1) + depth_bytes) * samples;
    // Tile memory scales with the render backends; heavier pixels get
    // smaller bins.
    let budget = gpu.num_rb() * 16 * 1024;
    let area = budget / pixel_cost.max(1);
    if area < 32 * 32 {
        return None;
    }
    let mut side = 16u32;
    while side * side * 4 <= area && side < 512 {
        side *= 2;
    }
    let x = (side * 2).min(512);
    let y = side.min(512);
    Some((x.max(16), y.max(16)))
}
