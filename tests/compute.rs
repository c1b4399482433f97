//! Compute pipeline scenarios.

use anyhow::Result;
use deimos::emit::regs;
use deimos::prelude::*;

mod framework;

use framework::{find_reg, make_context};

#[test]
fn required_subgroup_size_32() -> Result<()> {
    let ctx = make_context(GfxLevel::Gfx10_3);
    let cs = ctx.compiler.shader(vk::ShaderStageFlags::COMPUTE, |info| {
        info.workgroup_size = [32, 1, 1];
    });
    let pci = ComputePipelineBuilder::new("reduce")
        .set_shader(cs)
        .required_subgroup_size(32)
        .build();
    let pipeline = ctx.assembler.create_compute(&pci)?;

    let module = pipeline.shader(ShaderStage::Compute).unwrap();
    assert_eq!(module.wave_size(), 32);

    // 32 threads in wave32 is one wave per threadgroup: the SPI pairs two
    // threadgroups per CU.
    let limits = find_reg(pipeline.config_stream(), regs::COMPUTE_RESOURCE_LIMITS).unwrap();
    assert_eq!((limits >> 12) & 0xf, 2);

    assert_eq!(
        find_reg(pipeline.config_stream(), regs::COMPUTE_NUM_THREAD_X),
        Some(32)
    );
    assert_eq!(
        find_reg(pipeline.config_stream(), regs::COMPUTE_NUM_THREAD_Y),
        Some(1)
    );
    // Compute has no context state.
    assert!(pipeline.context_stream().is_empty());
    Ok(())
}

#[test]
fn full_subgroups_promote_to_wave64() -> Result<()> {
    let ctx = make_context(GfxLevel::Gfx10_3);
    let cs = ctx.compiler.shader(vk::ShaderStageFlags::COMPUTE, |info| {
        info.workgroup_size = [128, 1, 1];
    });
    let pci = ComputePipelineBuilder::new("prefix_sum")
        .set_shader(cs)
        .require_full_subgroups()
        .build();
    let pipeline = ctx.assembler.create_compute(&pci)?;
    assert_eq!(
        pipeline.shader(ShaderStage::Compute).unwrap().wave_size(),
        64
    );

    let limits = find_reg(pipeline.config_stream(), regs::COMPUTE_RESOURCE_LIMITS).unwrap();
    assert_eq!((limits >> 12) & 0xf, 0);
    Ok(())
}

#[test]
fn graphics_shader_in_compute_pipeline_fails() {
    let ctx = make_context(GfxLevel::Gfx10_3);
    let vs = framework::basic_vs(&ctx.compiler, 0);
    let pci = ComputePipelineBuilder::new("wrong").set_shader(vs).build();
    assert!(ctx.assembler.create_compute(&pci).is_err());
}
