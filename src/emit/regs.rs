//! Register offsets and bitfield encoders for the fixed-function blocks the
//! pipeline programs. Offsets follow the hardware numbering; only registers
//! the emitter actually writes are listed.

#![allow(clippy::identity_op)]

// --- Context registers -------------------------------------------------

pub const DB_RENDER_CONTROL: u32 = 0x028000;
pub const DB_COUNT_CONTROL: u32 = 0x028004;
pub const DB_RENDER_OVERRIDE: u32 = 0x02800C;
pub const DB_RENDER_OVERRIDE2: u32 = 0x028010;
pub const CB_TARGET_MASK: u32 = 0x028238;
pub const CB_SHADER_MASK: u32 = 0x02823C;
pub const DB_STENCIL_CONTROL: u32 = 0x02842C;
pub const SPI_PS_INPUT_CNTL_0: u32 = 0x028644;
pub const SPI_VS_OUT_CONFIG: u32 = 0x0286C4;
pub const SPI_PS_INPUT_ENA: u32 = 0x0286CC;
pub const SPI_PS_INPUT_ADDR: u32 = 0x0286D0;
pub const SPI_PS_IN_CONTROL: u32 = 0x0286D8;
pub const SPI_BARYC_CNTL: u32 = 0x0286E0;
pub const SPI_SHADER_IDX_FORMAT: u32 = 0x028708;
pub const SPI_SHADER_POS_FORMAT: u32 = 0x02870C;
pub const SPI_SHADER_Z_FORMAT: u32 = 0x028710;
pub const SPI_SHADER_COL_FORMAT: u32 = 0x028714;
pub const SX_MRT0_BLEND_OPT: u32 = 0x028760;
pub const CB_BLEND0_CONTROL: u32 = 0x028780;
pub const DB_DEPTH_CONTROL: u32 = 0x028800;
pub const DB_EQAA: u32 = 0x028804;
pub const CB_COLOR_CONTROL: u32 = 0x028808;
pub const DB_SHADER_CONTROL: u32 = 0x02880C;
pub const PA_CL_CLIP_CNTL: u32 = 0x028810;
pub const PA_SU_SC_MODE_CNTL: u32 = 0x028814;
pub const PA_CL_VTE_CNTL: u32 = 0x028818;
pub const PA_CL_VS_OUT_CNTL: u32 = 0x02881C;
pub const PA_CL_NGG_CNTL: u32 = 0x028838;
pub const PA_CL_VRS_CNTL: u32 = 0x028848;
pub const VGT_GS_MODE: u32 = 0x028A40;
pub const VGT_GS_ONCHIP_CNTL: u32 = 0x028A44;
pub const PA_SC_MODE_CNTL_0: u32 = 0x028A48;
pub const PA_SC_MODE_CNTL_1: u32 = 0x028A4C;
pub const VGT_GSVS_RING_OFFSET_1: u32 = 0x028A60;
pub const VGT_GSVS_RING_OFFSET_2: u32 = 0x028A64;
pub const VGT_GSVS_RING_OFFSET_3: u32 = 0x028A68;
pub const VGT_GS_OUT_PRIM_TYPE: u32 = 0x028A6C;
pub const VGT_PRIMITIVEID_EN: u32 = 0x028A84;
pub const VGT_GS_MAX_PRIMS_PER_SUBGROUP: u32 = 0x028A94;
pub const IA_MULTI_VGT_PARAM: u32 = 0x028AA8;
pub const VGT_ESGS_RING_ITEMSIZE: u32 = 0x028AAC;
pub const VGT_GSVS_RING_ITEMSIZE: u32 = 0x028AB0;
pub const VGT_REUSE_OFF: u32 = 0x028AB4;
pub const VGT_GS_MAX_VERT_OUT: u32 = 0x028B38;
pub const VGT_SHADER_STAGES_EN: u32 = 0x028B54;
pub const VGT_GS_VERT_ITEMSIZE: u32 = 0x028B5C;
pub const VGT_GS_VERT_ITEMSIZE_1: u32 = 0x028B60;
pub const VGT_GS_VERT_ITEMSIZE_2: u32 = 0x028B64;
pub const VGT_GS_VERT_ITEMSIZE_3: u32 = 0x028B68;
pub const VGT_TF_PARAM: u32 = 0x028B6C;
pub const DB_ALPHA_TO_MASK: u32 = 0x028B70;
pub const VGT_GS_INSTANCE_CNT: u32 = 0x028B90;
pub const PA_SC_AA_CONFIG: u32 = 0x028BE0;
pub const PA_SC_AA_MASK_X0Y0_X1Y0: u32 = 0x028C38;
pub const PA_SC_AA_MASK_X0Y1_X1Y1: u32 = 0x028C3C;
pub const PA_SC_BINNER_CNTL_0: u32 = 0x028C44;
pub const PA_SC_CONSERVATIVE_RASTERIZATION_CNTL: u32 = 0x028C4C;

// --- SH registers ------------------------------------------------------

pub const SPI_SHADER_PGM_LO_PS: u32 = 0x00B020;
pub const SPI_SHADER_PGM_HI_PS: u32 = 0x00B024;
pub const SPI_SHADER_PGM_RSRC1_PS: u32 = 0x00B028;
pub const SPI_SHADER_PGM_RSRC2_PS: u32 = 0x00B02C;
pub const SPI_SHADER_PGM_RSRC3_PS: u32 = 0x00B01C;
pub const SPI_SHADER_PGM_RSRC3_VS: u32 = 0x00B118;
pub const SPI_SHADER_LATE_ALLOC_VS: u32 = 0x00B11C;
pub const SPI_SHADER_PGM_LO_VS: u32 = 0x00B120;
pub const SPI_SHADER_PGM_HI_VS: u32 = 0x00B124;
pub const SPI_SHADER_PGM_RSRC1_VS: u32 = 0x00B128;
pub const SPI_SHADER_PGM_RSRC2_VS: u32 = 0x00B12C;
pub const SPI_SHADER_PGM_RSRC4_GS: u32 = 0x00B204;
pub const SPI_SHADER_PGM_RSRC3_GS: u32 = 0x00B21C;
pub const SPI_SHADER_PGM_LO_GS: u32 = 0x00B220;
pub const SPI_SHADER_PGM_HI_GS: u32 = 0x00B224;
pub const SPI_SHADER_PGM_RSRC1_GS: u32 = 0x00B228;
pub const SPI_SHADER_PGM_RSRC2_GS: u32 = 0x00B22C;
pub const SPI_SHADER_PGM_LO_ES: u32 = 0x00B320;
pub const SPI_SHADER_PGM_HI_ES: u32 = 0x00B324;
pub const SPI_SHADER_PGM_RSRC1_ES: u32 = 0x00B328;
pub const SPI_SHADER_PGM_RSRC2_ES: u32 = 0x00B32C;
pub const SPI_SHADER_PGM_RSRC3_HS: u32 = 0x00B41C;
pub const SPI_SHADER_PGM_LO_HS: u32 = 0x00B420;
pub const SPI_SHADER_PGM_HI_HS: u32 = 0x00B424;
pub const SPI_SHADER_PGM_RSRC1_HS: u32 = 0x00B428;
pub const SPI_SHADER_PGM_RSRC2_HS: u32 = 0x00B42C;
pub const SPI_SHADER_PGM_LO_LS: u32 = 0x00B520;
pub const SPI_SHADER_PGM_HI_LS: u32 = 0x00B524;
pub const SPI_SHADER_PGM_RSRC1_LS: u32 = 0x00B528;
pub const SPI_SHADER_PGM_RSRC2_LS: u32 = 0x00B52C;

pub const COMPUTE_NUM_THREAD_X: u32 = 0x00B81C;
pub const COMPUTE_NUM_THREAD_Y: u32 = 0x00B820;
pub const COMPUTE_NUM_THREAD_Z: u32 = 0x00B824;
pub const COMPUTE_PGM_LO: u32 = 0x00B830;
pub const COMPUTE_PGM_HI: u32 = 0x00B834;
pub const COMPUTE_PGM_RSRC1: u32 = 0x00B848;
pub const COMPUTE_PGM_RSRC2: u32 = 0x00B84C;
pub const COMPUTE_RESOURCE_LIMITS: u32 = 0x00B854;
pub const COMPUTE_PGM_RSRC3: u32 = 0x00B8A0;

// --- UConfig registers -------------------------------------------------

pub const VGT_PRIMITIVE_TYPE: u32 = 0x030908;
pub const IA_MULTI_VGT_PARAM_GFX9: u32 = 0x030960;
pub const GE_CNTL: u32 = 0x03096C;
pub const GE_PC_ALLOC: u32 = 0x030980;
pub const GE_MAX_OUTPUT_PER_SUBGROUP: u32 = 0x030984;

// --- Field encoders ----------------------------------------------------

// SPI_SHADER_PGM_RSRC1 (all geometry/pixel stages).
pub const fn s_rsrc1_vgprs(num_vgprs: u32, wave_size: u32) -> u32 {
    // Wave32 allocates VGPRs in granules of 8, wave64 in granules of 4.
    let granule = if wave_size == 32 { 8 } else { 4 };
    ((num_vgprs + granule - 1) / granule).saturating_sub(1) & 0x3f
}
pub const fn s_rsrc1_sgprs(num_sgprs: u32) -> u32 {
    ((((num_sgprs + 7) / 8).saturating_sub(1)) & 0xf) << 6
}
pub const fn s_rsrc1_float_mode(x: u32) -> u32 {
    (x & 0xff) << 12
}
pub const RSRC1_DX10_CLAMP: u32 = 1 << 21;
pub const RSRC1_MEM_ORDERED: u32 = 1 << 25;
pub const RSRC1_WGP_MODE: u32 = 1 << 29;
/// Default IEEE float mode with denorm flushing for 32-bit.
pub const FLOAT_MODE_DEFAULT: u32 = 0xc0;

// SPI_SHADER_PGM_RSRC2.
pub const RSRC2_SCRATCH_EN: u32 = 1 << 0;
pub const fn s_rsrc2_user_sgpr(x: u32) -> u32 {
    (x & 0x1f) << 1
}
pub const RSRC2_OC_LDS_EN: u32 = 1 << 7;
pub const fn s_rsrc2_lds_size(granules: u32) -> u32 {
    (granules & 0xff) << 15
}
pub const fn s_rsrc2_extra_lds_size_ps(granules: u32) -> u32 {
    (granules & 0xff) << 24
}

// COMPUTE_PGM_RSRC2.
pub const CS_RSRC2_SCRATCH_EN: u32 = 1 << 0;
pub const fn s_cs_rsrc2_user_sgpr(x: u32) -> u32 {
    (x & 0x1f) << 1
}
pub const CS_RSRC2_TGID_X_EN: u32 = 1 << 7;
pub const CS_RSRC2_TGID_Y_EN: u32 = 1 << 8;
pub const CS_RSRC2_TGID_Z_EN: u32 = 1 << 9;
pub const CS_RSRC2_TG_SIZE_EN: u32 = 1 << 10;
pub const fn s_cs_rsrc2_tidig_comp_cnt(x: u32) -> u32 {
    (x & 0x3) << 11
}
pub const fn s_cs_rsrc2_lds_size(granules: u32) -> u32 {
    (granules & 0x1ff) << 15
}

// COMPUTE_RESOURCE_LIMITS.
pub const fn s_waves_per_sh(x: u32) -> u32 {
    x & 0x3ff
}
pub const fn s_tg_per_cu(x: u32) -> u32 {
    (x & 0xf) << 12
}
pub const fn s_lock_threshold(x: u32) -> u32 {
    (x & 0x3f) << 16
}
pub const fn s_cu_group_count(x: u32) -> u32 {
    (x & 0x7) << 24
}

// VGT_SHADER_STAGES_EN.
pub const fn s_ls_en(x: u32) -> u32 {
    x & 0x3
}
pub const LS_STAGE_ON: u32 = 1;
pub const HS_STAGE_ON: u32 = 1 << 3;
pub const fn s_es_en(x: u32) -> u32 {
    (x & 0x3) << 4
}
pub const ES_STAGE_DS: u32 = 1;
pub const ES_STAGE_REAL: u32 = 2;
pub const GS_STAGE_ON: u32 = 1 << 6;
pub const fn s_vs_en(x: u32) -> u32 {
    (x & 0x3) << 7
}
pub const VS_STAGE_REAL: u32 = 0;
pub const VS_STAGE_DS: u32 = 1;
pub const VS_STAGE_COPY_SHADER: u32 = 2;
pub const DYNAMIC_HS: u32 = 1 << 8;
pub const PRIMGEN_EN: u32 = 1 << 9;
pub const fn s_max_primgrp_in_wave(x: u32) -> u32 {
    (x & 0xf) << 11
}
pub const NGG_WAVE_ID_EN: u32 = 1 << 16;
pub const PRIMGEN_PASSTHRU_EN: u32 = 1 << 17;
pub const PRIMGEN_PASSTHRU_NO_MSG: u32 = 1 << 26;

// VGT_GS_MODE.
pub const GS_MODE_OFF: u32 = 0;
pub const GS_MODE_SCENARIO_G: u32 = 3;
pub const fn s_gs_mode(x: u32) -> u32 {
    x & 0x7
}
pub const GS_MODE_ONCHIP_GFX9: u32 = 1 << 3;
pub const GS_MODE_ES_WRITE_OPTIMIZE: u32 = 1 << 4;
pub const GS_MODE_GS_WRITE_OPTIMIZE: u32 = 1 << 5;

// VGT_GS_ONCHIP_CNTL.
pub const fn s_es_verts_per_subgrp(x: u32) -> u32 {
    x & 0x7ff
}
pub const fn s_gs_prims_per_subgrp(x: u32) -> u32 {
    (x & 0x7ff) << 11
}
pub const fn s_gs_inst_prims_in_subgrp(x: u32) -> u32 {
    (x & 0x3ff) << 22
}

// VGT_GS_INSTANCE_CNT.
pub const GS_INSTANCING_EN: u32 = 1 << 0;
pub const fn s_gs_instance_cnt(x: u32) -> u32 {
    (x & 0x7f) << 2
}
pub const EN_MAX_VERT_OUT_PER_GS_INSTANCE: u32 = 1 << 31;

// VGT_GS_OUT_PRIM_TYPE.
pub const OUTPRIM_POINTLIST: u32 = 0;
pub const OUTPRIM_LINESTRIP: u32 = 1;
pub const OUTPRIM_TRISTRIP: u32 = 2;

// VGT_PRIMITIVEID_EN.
pub const PRIMITIVEID_EN: u32 = 1 << 0;
pub const NGG_DISABLE_PROVOK_REUSE: u32 = 1 << 1;

// VGT_TF_PARAM.
pub const TF_TYPE_ISOLINE: u32 = 0;
pub const TF_TYPE_TRIANGLE: u32 = 1;
pub const TF_TYPE_QUAD: u32 = 2;
pub const fn s_tf_type(x: u32) -> u32 {
    x & 0x3
}
pub const TF_PART_INTEGER: u32 = 0;
pub const TF_PART_FRAC_ODD: u32 = 2;
pub const TF_PART_FRAC_EVEN: u32 = 3;
pub const fn s_tf_partitioning(x: u32) -> u32 {
    (x & 0x7) << 2
}
pub const TF_TOPOLOGY_OUTPUT_POINT: u32 = 0;
pub const TF_TOPOLOGY_OUTPUT_LINE: u32 = 1;
pub const TF_TOPOLOGY_OUTPUT_TRIANGLE_CW: u32 = 2;
pub const TF_TOPOLOGY_OUTPUT_TRIANGLE_CCW: u32 = 3;
pub const fn s_tf_topology(x: u32) -> u32 {
    (x & 0x7) << 5
}
pub const TF_DIST_MODE_NO_DIST: u32 = 0;
pub const TF_DIST_MODE_TRAPEZOIDS: u32 = 3;
pub const fn s_tf_distribution_mode(x: u32) -> u32 {
    (x & 0x3) << 17
}

// IA_MULTI_VGT_PARAM.
pub const fn s_primgroup_size(x: u32) -> u32 {
    x & 0xffff
}
pub const PARTIAL_VS_WAVE_ON: u32 = 1 << 16;
pub const SWITCH_ON_EOP: u32 = 1 << 17;
pub const PARTIAL_ES_WAVE_ON: u32 = 1 << 18;
pub const SWITCH_ON_EOI: u32 = 1 << 19;
pub const WD_SWITCH_ON_EOP: u32 = 1 << 20;

// GE_CNTL.
pub const fn s_ge_prim_grp_size(x: u32) -> u32 {
    x & 0x1ff
}
pub const fn s_ge_vert_grp_size(x: u32) -> u32 {
    (x & 0x1ff) << 16
}
pub const GE_PACKET_TO_ONE_PA: u32 = 1 << 26;

// GE_PC_ALLOC.
pub const GE_PC_OVERSUB_EN: u32 = 1 << 0;
pub const fn s_ge_pc_num_lines(x: u32) -> u32 {
    (x & 0x3ff) << 1
}

// SPI_VS_OUT_CONFIG.
pub const fn s_vs_export_count(x: u32) -> u32 {
    (x & 0x1f) << 1
}
pub const VS_NO_PC_EXPORT: u32 = 1 << 7;

// SPI_PS_INPUT_CNTL.
pub const fn s_ps_input_offset(x: u32) -> u32 {
    x & 0x3f
}
pub const fn s_ps_input_default_val(x: u32) -> u32 {
    (x & 0x3) << 8
}
pub const PS_INPUT_FLAT_SHADE: u32 = 1 << 10;
pub const PS_INPUT_PRIM_ATTR: u32 = 1 << 11;
pub const PS_INPUT_PT_SPRITE_TEX: u32 = 1 << 17;
pub const PS_INPUT_FP16_INTERP_MODE: u32 = 1 << 19;
pub const PS_INPUT_ATTR0_VALID: u32 = 1 << 24;

// SPI_PS_IN_CONTROL.
pub const fn s_num_interp(x: u32) -> u32 {
    x & 0x3f
}
pub const fn s_num_prim_interp(x: u32) -> u32 {
    (x & 0x1f) << 6
}
pub const PS_W32_EN: u32 = 1 << 15;

// SPI_PS_INPUT_ENA/ADDR bits.
pub const PS_PERSP_SAMPLE_ENA: u32 = 1 << 0;
pub const PS_PERSP_CENTER_ENA: u32 = 1 << 1;
pub const PS_PERSP_CENTROID_ENA: u32 = 1 << 2;
pub const PS_PERSP_PULL_MODEL_ENA: u32 = 1 << 3;
pub const PS_LINEAR_SAMPLE_ENA: u32 = 1 << 4;
pub const PS_LINEAR_CENTER_ENA: u32 = 1 << 5;
pub const PS_LINEAR_CENTROID_ENA: u32 = 1 << 6;
pub const PS_POS_X_FLOAT_ENA: u32 = 1 << 8;
pub const PS_POS_Y_FLOAT_ENA: u32 = 1 << 9;
pub const PS_POS_Z_FLOAT_ENA: u32 = 1 << 10;
pub const PS_POS_W_FLOAT_ENA: u32 = 1 << 11;
pub const PS_FRONT_FACE_ENA: u32 = 1 << 12;
pub const PS_ANCILLARY_ENA: u32 = 1 << 13;
pub const PS_SAMPLE_COVERAGE_ENA: u32 = 1 << 14;

// DB_SHADER_CONTROL.
pub const DB_Z_EXPORT_ENABLE: u32 = 1 << 0;
pub const DB_STENCIL_TEST_VAL_EXPORT_ENABLE: u32 = 1 << 1;
pub const fn s_db_z_order(x: u32) -> u32 {
    (x & 0x3) << 4
}
pub const Z_ORDER_LATE_Z: u32 = 0;
pub const Z_ORDER_EARLY_Z_THEN_LATE_Z: u32 = 1;
pub const DB_KILL_ENABLE: u32 = 1 << 6;
pub const DB_COVERAGE_TO_MASK_ENABLE: u32 = 1 << 7;
pub const DB_MASK_EXPORT_ENABLE: u32 = 1 << 8;
pub const DB_EXEC_ON_HIER_FAIL: u32 = 1 << 9;
pub const DB_EXEC_ON_NOOP: u32 = 1 << 10;
pub const DB_ALPHA_TO_MASK_DISABLE: u32 = 1 << 11;
pub const DB_DEPTH_BEFORE_SHADER: u32 = 1 << 12;
pub const fn s_db_conservative_z_export(x: u32) -> u32 {
    (x & 0x3) << 13
}
pub const DB_DUAL_QUAD_DISABLE: u32 = 1 << 15;
pub const DB_PRE_SHADER_DEPTH_COVERAGE_ENABLE: u32 = 1 << 23;

// SPI_BARYC_CNTL.
pub const fn s_baryc_pos_float_location(x: u32) -> u32 {
    x & 0x3
}
pub const BARYC_FRONT_FACE_ALL_BITS: u32 = 1 << 24;

// PA_CL_VS_OUT_CNTL.
pub const fn s_clip_dist_ena(mask: u32) -> u32 {
    mask & 0xff
}
pub const USE_VTX_POINT_SIZE: u32 = 1 << 16;
pub const USE_VTX_RENDER_TARGET_INDX: u32 = 1 << 17;
pub const USE_VTX_VIEWPORT_INDX: u32 = 1 << 18;
pub const VS_OUT_MISC_VEC_ENA: u32 = 1 << 20;
pub const VS_OUT_CCDIST0_VEC_ENA: u32 = 1 << 21;
pub const VS_OUT_CCDIST1_VEC_ENA: u32 = 1 << 22;
pub const VS_OUT_MISC_SIDE_BUS_ENA: u32 = 1 << 24;

// PA_CL_CLIP_CNTL.
pub const DX_CLIP_SPACE_DEF: u32 = 1 << 19;
pub const DX_RASTERIZATION_KILL: u32 = 1 << 22;
pub const DX_LINEAR_ATTR_CLIP_ENA: u32 = 1 << 24;
pub const VTE_VPORT_PROVOKE_DISABLE: u32 = 1 << 25;
pub const ZCLIP_NEAR_DISABLE: u32 = 1 << 26;
pub const ZCLIP_FAR_DISABLE: u32 = 1 << 27;

// PA_CL_VTE_CNTL.
pub const VTE_VPORT_X_SCALE_ENA: u32 = 1 << 0;
pub const VTE_VPORT_X_OFFSET_ENA: u32 = 1 << 1;
pub const VTE_VPORT_Y_SCALE_ENA: u32 = 1 << 2;
pub const VTE_VPORT_Y_OFFSET_ENA: u32 = 1 << 3;
pub const VTE_VPORT_Z_SCALE_ENA: u32 = 1 << 4;
pub const VTE_VPORT_Z_OFFSET_ENA: u32 = 1 << 5;
pub const VTE_VTX_XY_FMT: u32 = 1 << 8;
pub const VTE_VTX_Z_FMT: u32 = 1 << 9;
pub const VTE_VTX_W0_FMT: u32 = 1 << 10;

// PA_CL_NGG_CNTL.
pub const NGG_VERTEX_REUSE_DEPTH_MAX: u32 = 30 << 1;
pub const NGG_INDEX_BUF_EDGE_FLAG_ENA: u32 = 1 << 0;

// SPI_SHADER_POS_FORMAT / Z_FORMAT values.
pub const SPI_SHADER_4COMP: u32 = 4;
pub const fn s_pos0_export_format(x: u32) -> u32 {
    x & 0xf
}
pub const SPI_Z_EXPORT_ZERO: u32 = 0;
pub const SPI_Z_EXPORT_32_R: u32 = 1;
pub const SPI_Z_EXPORT_32_GR: u32 = 2;
pub const SPI_Z_EXPORT_32_AR: u32 = 3;

// PA_SC_BINNER_CNTL_0.
pub const BINNING_ALLOWED: u32 = 0;
pub const BINNING_DISABLED_LEGACY_SC: u32 = 3;
pub const fn s_binning_mode(x: u32) -> u32 {
    x & 0x3
}
pub const BIN_SIZE_X_16: u32 = 1 << 2;
pub const BIN_SIZE_Y_16: u32 = 1 << 3;
pub const fn s_bin_size_x_extend(log2_minus_5: u32) -> u32 {
    (log2_minus_5 & 0x7) << 4
}
pub const fn s_bin_size_y_extend(log2_minus_5: u32) -> u32 {
    (log2_minus_5 & 0x7) << 7
}
pub const fn s_context_states_per_bin(x: u32) -> u32 {
    (x & 0x7) << 10
}
pub const fn s_persistent_states_per_bin(x: u32) -> u32 {
    (x & 0x1f) << 13
}
pub const DISABLE_START_OF_PRIM: u32 = 1 << 18;
pub const fn s_fpovs_per_batch(x: u32) -> u32 {
    (x & 0xff) << 19
}
pub const OPTIMAL_BIN_SELECTION: u32 = 1 << 27;
pub const FLUSH_ON_BINNING_TRANSITION: u32 = 1 << 28;

/// Encode one axis of the bin size into the (16-flag, extend) pair.
pub fn bin_size_extend(size: u32) -> (bool, u32) {
    if size == 16 {
        (true, 0)
    } else {
        (false, 31 - size.leading_zeros() - 5)
    }
}
