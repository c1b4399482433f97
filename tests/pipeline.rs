//! End-to-end graphics pipeline scenarios.

use anyhow::Result;
use deimos::emit::regs;
use deimos::prelude::*;
use deimos::shader::ir::slot;
use deimos::state::dynamic::DynamicStates;

mod framework;

use framework::{basic_fs, basic_vs, find_reg, make_context};

const SPI_SHADER_FP16_ABGR: u32 = 4;

/// Fullscreen textured quad: one varying, no blending, 1x.
#[test]
fn textured_quad() -> Result<()> {
    let ctx = make_context(GfxLevel::Gfx10_3);
    let pci = GraphicsPipelineBuilder::new("quad")
        .vertex_input(0, vk::VertexInputRate::VERTEX)
        .vertex_attribute(0, 0, vk::Format::R32G32_SFLOAT)?
        .vertex_attribute(0, 1, vk::Format::R32G32_SFLOAT)?
        .color_format(vk::Format::R8G8B8A8_UNORM)
        .blend_attachment_none()
        .attach_shader(basic_vs(&ctx.compiler, 1))
        .attach_shader(basic_fs(&ctx.compiler, 1))
        .build();
    let pipeline = ctx.assembler.create_graphics(&pci)?;

    let ctx_stream = pipeline.context_stream();
    assert_eq!(
        find_reg(ctx_stream, regs::SPI_SHADER_COL_FORMAT),
        Some(SPI_SHADER_FP16_ABGR)
    );
    assert_eq!(find_reg(ctx_stream, regs::CB_SHADER_MASK), Some(0xf));
    assert_eq!(find_reg(ctx_stream, regs::CB_TARGET_MASK), Some(0xf));

    // Exactly one interpolated input, and it is not a point coordinate.
    let in_control = find_reg(ctx_stream, regs::SPI_PS_IN_CONTROL).unwrap();
    assert_eq!(in_control & 0x3f, 1);
    let input0 = find_reg(ctx_stream, regs::SPI_PS_INPUT_CNTL_0).unwrap();
    assert_eq!(input0 & regs::PS_INPUT_PT_SPRITE_TEX, 0);
    assert_eq!(input0 & 0x3f, 0);

    // Of the conditionally-allowed states only rasterizer-discard remains.
    let dynamic = pipeline.dynamic_state();
    assert!(dynamic.allowed.contains(DynamicStates::RASTERIZER_DISCARD_ENABLE));
    for pruned in [
        DynamicStates::DEPTH_BIAS,
        DynamicStates::DEPTH_BOUNDS,
        DynamicStates::STENCIL_COMPARE_MASK,
        DynamicStates::BLEND_CONSTANTS,
        DynamicStates::SAMPLE_LOCATIONS,
        DynamicStates::LINE_STIPPLE,
        DynamicStates::FRAGMENT_SHADING_RATE,
        DynamicStates::DISCARD_RECTANGLE,
    ] {
        assert!(!dynamic.allowed.contains(pruned), "{pruned:?} not pruned");
    }

    // Register stream hash is stable across independent creations.
    let again = ctx.assembler.create_graphics(&pci)?;
    assert_eq!(pipeline.stream_hash(), again.stream_hash());
    assert_eq!(pipeline.context_stream(), again.context_stream());
    assert_eq!(pipeline.config_stream(), again.config_stream());
    Ok(())
}

/// MSAA 4x + alpha-to-coverage + dual-source blending on MRT0.
#[test]
fn msaa_dual_source() -> Result<()> {
    let ctx = make_context(GfxLevel::Gfx10_3);
    let fs = ctx.compiler.shader(vk::ShaderStageFlags::FRAGMENT, |info| {
        info.fs.colors_written = 0x1;
        info.fs.dual_src_blend = true;
    });
    let pci = GraphicsPipelineBuilder::new("dual_src")
        .color_format(vk::Format::R8G8B8A8_UNORM)
        .blend_attachment(vk::PipelineColorBlendAttachmentState {
            blend_enable: vk::TRUE,
            src_color_blend_factor: vk::BlendFactor::SRC1_COLOR,
            dst_color_blend_factor: vk::BlendFactor::ONE_MINUS_SRC1_COLOR,
            color_blend_op: vk::BlendOp::ADD,
            src_alpha_blend_factor: vk::BlendFactor::SRC1_ALPHA,
            dst_alpha_blend_factor: vk::BlendFactor::ONE_MINUS_SRC1_ALPHA,
            alpha_blend_op: vk::BlendOp::ADD,
            color_write_mask: vk::ColorComponentFlags::RGBA,
        })
        .samples(4)
        .alpha_to_coverage(true)
        .attach_shader(basic_vs(&ctx.compiler, 0))
        .attach_shader(fs)
        .build();
    let pipeline = ctx.assembler.create_graphics(&pci)?;
    let state = pipeline.reduced_state();

    assert!(state.blend.mrt0_is_dual_src);
    // MRT1 mirrors MRT0's export format.
    let col_format = state.blend.spi_shader_col_format;
    assert_eq!(col_format & 0xf, (col_format >> 4) & 0xf);
    assert_ne!(col_format & 0xf, 0);
    // Alpha-to-mask enabled.
    assert_eq!(state.blend.db_alpha_to_mask & 1, 1);
    // Dual-quad disabled for dual-source blending.
    let color_control = find_reg(pipeline.context_stream(), regs::CB_COLOR_CONTROL).unwrap();
    assert_ne!(color_control & (1 << 7), 0);
    assert_eq!(state.multisample.num_samples, 4);
    let aa_config = find_reg(pipeline.context_stream(), regs::PA_SC_AA_CONFIG).unwrap();
    assert_eq!(aa_config & 0x7, 2);
    Ok(())
}

/// Legacy geometry path on gfx8-class hardware.
#[test]
fn legacy_geometry_gfx8() -> Result<()> {
    let ctx = make_context(GfxLevel::Gfx8);
    let gs = ctx.compiler.shader(vk::ShaderStageFlags::GEOMETRY, |info| {
        info.gs.invocations = 2;
        info.gs.vertices_out = 32;
        info.gs.vertices_in = 3;
        info.gs.gsvs_vertex_dwords = 32;
        info.inputs_read = slot::mask(slot::var(0));
        info.sysvals |= deimos::shader::ir::SysValues::PRIM_ID;
    });
    let fs = basic_fs(&ctx.compiler, 0);
    let pci = GraphicsPipelineBuilder::new("legacy_gs")
        .color_format(vk::Format::R8G8B8A8_UNORM)
        .blend_attachment_none()
        .attach_shader(basic_vs(&ctx.compiler, 8))
        .attach_shader(gs)
        .attach_shader(fs)
        .build();
    let pipeline = ctx.assembler.create_graphics(&pci)?;
    let ctx_stream = pipeline.context_stream();

    let param = find_reg(ctx_stream, regs::IA_MULTI_VGT_PARAM).unwrap();
    assert_ne!(param & regs::PARTIAL_ES_WAVE_ON, 0);
    assert_ne!(param & regs::PARTIAL_VS_WAVE_ON, 0);
    // A stage consumes the primitive id.
    assert_ne!(param & regs::SWITCH_ON_EOI, 0);

    // On-chip GS ring programmed with a nonzero LDS footprint.
    let onchip = find_reg(ctx_stream, regs::VGT_GS_ONCHIP_CNTL).unwrap();
    assert_ne!(onchip & 0x7ff, 0);
    assert_ne!((onchip >> 11) & 0x7ff, 0);
    // Legacy GS runs wave64.
    assert_eq!(
        pipeline.shader(ShaderStage::Geometry).unwrap().wave_size(),
        64
    );
    Ok(())
}

/// NGG vertex shader that must export the primitive id for the FS.
#[test]
fn ngg_prim_id_export() -> Result<()> {
    let ctx = make_context(GfxLevel::Gfx10);
    let fs = ctx.compiler.shader(vk::ShaderStageFlags::FRAGMENT, |info| {
        info.inputs_read = slot::mask(slot::PRIM_ID);
        info.fs.colors_written = 0x1;
    });
    let pci = GraphicsPipelineBuilder::new("ngg_primid")
        .color_format(vk::Format::R8G8B8A8_UNORM)
        .blend_attachment_none()
        .attach_shader(basic_vs(&ctx.compiler, 0))
        .attach_shader(fs)
        .build();
    let pipeline = ctx.assembler.create_graphics(&pci)?;

    let vs = pipeline.shader(ShaderStage::Vertex).unwrap();
    assert!(vs.info().ngg.is_ngg);
    assert!(!vs.info().ngg.is_passthrough);

    // The passthrough bit must not be set in the stage configuration.
    let stages = find_reg(pipeline.context_stream(), regs::VGT_SHADER_STAGES_EN).unwrap();
    assert_ne!(stages & regs::PRIMGEN_EN, 0);
    assert_eq!(stages & regs::PRIMGEN_PASSTHRU_EN, 0);

    // VERT_GRP_SIZE carries the quirk-adjusted ES limit: the raw limit is
    // wave-aligned, so the adjusted value can never be.
    let ge_cntl = find_reg(pipeline.config_stream(), regs::GE_CNTL).unwrap();
    let vert_grp = (ge_cntl >> 16) & 0x1ff;
    assert_ne!(vert_grp, 0);
    assert_ne!(vert_grp % 32, 0);
    Ok(())
}

/// Tessellation with point mode.
#[test]
fn tessellation_point_mode() -> Result<()> {
    let ctx = make_context(GfxLevel::Gfx10_3);
    let tcs = ctx
        .compiler
        .shader(vk::ShaderStageFlags::TESSELLATION_CONTROL, |info| {
            info.tess.tcs_vertices_out = 3;
        });
    let tes = ctx
        .compiler
        .shader(vk::ShaderStageFlags::TESSELLATION_EVALUATION, |info| {
            info.outputs_written = slot::mask(slot::POS);
            info.tess.domain = deimos::shader::ir::TessDomain::Triangles;
            info.tess.point_mode = true;
        });
    let pci = GraphicsPipelineBuilder::new("tess_points")
        .tessellation(3)
        .topology(vk::PrimitiveTopology::PATCH_LIST)
        .color_format(vk::Format::R8G8B8A8_UNORM)
        .blend_attachment_none()
        .attach_shader(basic_vs(&ctx.compiler, 0))
        .attach_shader(tcs)
        .attach_shader(tes)
        .attach_shader(basic_fs(&ctx.compiler, 0))
        .build();
    let pipeline = ctx.assembler.create_graphics(&pci)?;
    let ctx_stream = pipeline.context_stream();

    let tf = find_reg(ctx_stream, regs::VGT_TF_PARAM).unwrap();
    assert_eq!((tf >> 5) & 0x7, regs::TF_TOPOLOGY_OUTPUT_POINT);
    assert_eq!(tf & 0x3, regs::TF_TYPE_TRIANGLE);
    // The abstract output stays a triangle strip even in point mode.
    assert_eq!(
        find_reg(ctx_stream, regs::VGT_GS_OUT_PRIM_TYPE),
        Some(regs::OUTPRIM_TRISTRIP)
    );
    Ok(())
}

/// Rasterizer discard hides all downstream state.
#[test]
fn rasterizer_discard_defaults_downstream() -> Result<()> {
    let ctx = make_context(GfxLevel::Gfx10_3);
    let pci = GraphicsPipelineBuilder::new("discard")
        .rasterizer_discard(true)
        .depth_format(vk::Format::D32_SFLOAT)
        .depth(true, true, vk::CompareOp::LESS)
        .attach_shader(basic_vs(&ctx.compiler, 0))
        .build();
    let pipeline = ctx.assembler.create_graphics(&pci)?;
    // Depth state is defaulted, not programmed from the descriptor.
    assert_eq!(
        find_reg(pipeline.context_stream(), regs::DB_DEPTH_CONTROL),
        Some(0)
    );
    let dynamic = pipeline.dynamic_state();
    assert!(!dynamic.allowed.contains(DynamicStates::DEPTH_BIAS));
    assert!(dynamic.allowed.contains(DynamicStates::PRIMITIVE_TOPOLOGY));
    Ok(())
}

#[test]
fn bad_depth_format_is_rejected() {
    let ctx = make_context(GfxLevel::Gfx10_3);
    let pci = GraphicsPipelineBuilder::new("bad_depth")
        .depth_format(vk::Format::R8G8B8A8_UNORM)
        .attach_shader(basic_vs(&ctx.compiler, 0))
        .build();
    let err = ctx.assembler.create_graphics(&pci).unwrap_err();
    assert_eq!(
        err.downcast::<Error>().unwrap(),
        Error::UnsupportedFormat(vk::Format::R8G8B8A8_UNORM)
    );
}

/// Multiview injects a layer export and the register stream reflects it.
#[test]
fn multiview_layer_injection() -> Result<()> {
    let ctx = make_context(GfxLevel::Gfx10_3);
    let pci = GraphicsPipelineBuilder::new("multiview")
        .view_mask(0b11)
        .color_format(vk::Format::R8G8B8A8_UNORM)
        .blend_attachment_none()
        .attach_shader(basic_vs(&ctx.compiler, 0))
        .attach_shader(basic_fs(&ctx.compiler, 0))
        .build();
    let pipeline = ctx.assembler.create_graphics(&pci)?;
    let vs = pipeline.shader(ShaderStage::Vertex).unwrap();
    assert!(vs.info().writes(slot::LAYER));
    let out_cntl = find_reg(pipeline.context_stream(), regs::PA_CL_VS_OUT_CNTL).unwrap();
    assert_ne!(out_cntl & regs::USE_VTX_RENDER_TARGET_INDX, 0);
    assert_ne!(out_cntl & regs::VS_OUT_MISC_VEC_ENA, 0);
    Ok(())
}
