//! Caching behavior across pipeline creations.

use anyhow::Result;
use deimos::pipeline::assembler::CreationFeedback;
use deimos::pipeline::create_info::PipelineFlags;
use deimos::prelude::*;

mod framework;

use framework::{basic_fs, basic_vs, make_context, make_context_with_blob};

fn quad_info(ctx: &framework::TestContext, name: &str) -> GraphicsPipelineCreateInfo {
    GraphicsPipelineBuilder::new(name)
        .color_format(vk::Format::R8G8B8A8_UNORM)
        .blend_attachment_none()
        .attach_shader(basic_vs(&ctx.compiler, 1))
        .attach_shader(basic_fs(&ctx.compiler, 1))
        .build()
}

#[test]
fn repeated_creation_hits_the_cache() -> Result<()> {
    let ctx = make_context(GfxLevel::Gfx10_3);
    let pci = quad_info(&ctx, "a");

    let mut feedback = CreationFeedback::default();
    // Keep the pipeline alive: non-default variants are cached weakly.
    let _first = ctx
        .assembler
        .create_graphics_with_feedback(&pci, &mut feedback)?;
    assert!(!feedback.cache_hit);
    assert_eq!(feedback.stages.len(), 2);

    let mut feedback = CreationFeedback::default();
    let _second = ctx
        .assembler
        .create_graphics_with_feedback(&pci, &mut feedback)?;
    assert!(feedback.cache_hit);
    assert!(feedback.stages.iter().all(|s| s.cache_hit));
    assert_eq!(ctx.assembler.cache().misses(), 2);
    Ok(())
}

#[test]
fn fail_on_cache_miss() -> Result<()> {
    let ctx = make_context(GfxLevel::Gfx10_3);
    let vs = basic_vs(&ctx.compiler, 1);
    let fs = basic_fs(&ctx.compiler, 1);
    let cold = GraphicsPipelineBuilder::new("cold")
        .flags(PipelineFlags::FAIL_ON_CACHE_MISS | PipelineFlags::SKIP_BLOB_CACHE)
        .color_format(vk::Format::R8G8B8A8_UNORM)
        .blend_attachment_none()
        .attach_shader(vs.clone())
        .attach_shader(fs.clone())
        .build();

    let err = ctx.assembler.create_graphics(&cold).unwrap_err();
    assert_eq!(err.downcast::<Error>()?, Error::CompileRequired);

    // Warm the cache, then the same request must succeed.
    let warm = GraphicsPipelineBuilder::new("warm")
        .color_format(vk::Format::R8G8B8A8_UNORM)
        .blend_attachment_none()
        .attach_shader(vs)
        .attach_shader(fs)
        .build();
    let _warm = ctx.assembler.create_graphics(&warm)?;
    assert!(ctx.assembler.create_graphics(&cold).is_ok());
    Ok(())
}

#[test]
fn blob_cache_survives_process_restart() -> Result<()> {
    let ctx = make_context(GfxLevel::Gfx10_3);
    let pci = quad_info(&ctx, "persisted");
    let first = ctx.assembler.create_graphics(&pci)?;
    assert!(ctx.blob.len() >= 2);

    // New assembler, same blob store. The test compiler assigns the same
    // payloads for identically-described shaders, so the shader ids match.
    let ctx2 = make_context_with_blob(GfxLevel::Gfx10_3, ctx.blob.clone());
    let pci2 = quad_info(&ctx2, "persisted");
    let mut feedback = CreationFeedback::default();
    let second = ctx2
        .assembler
        .create_graphics_with_feedback(&pci2, &mut feedback)?;
    assert!(feedback.cache_hit, "variants must come from the blob cache");

    // Invariant: a warm cache and a cold cache produce byte-identical
    // register streams.
    assert_eq!(first.context_stream(), second.context_stream());
    assert_eq!(first.config_stream(), second.config_stream());
    Ok(())
}

#[test]
fn equivalent_shaders_share_modules() -> Result<()> {
    let ctx = make_context(GfxLevel::Gfx10_3);
    let vs = basic_vs(&ctx.compiler, 1);
    let fs = basic_fs(&ctx.compiler, 1);
    let info = |name: &str| {
        GraphicsPipelineBuilder::new(name)
            .color_format(vk::Format::R8G8B8A8_UNORM)
            .blend_attachment_none()
            .attach_shader(vs.clone())
            .attach_shader(fs.clone())
            .build()
    };
    let a = ctx.assembler.create_graphics(&info("a"))?;
    let b = ctx.assembler.create_graphics(&info("b"))?;
    // Two creations with equivalent inputs dedupe to the same modules.
    assert!(std::sync::Arc::ptr_eq(
        a.shader(ShaderStage::Vertex).unwrap(),
        b.shader(ShaderStage::Vertex).unwrap()
    ));
    assert_eq!(a.layout_signature(), b.layout_signature());
    Ok(())
}

#[test]
fn concurrent_identical_creations_compile_once() -> Result<()> {
    let ctx = std::sync::Arc::new(make_context(GfxLevel::Gfx10_3));
    let pci = std::sync::Arc::new(quad_info(&ctx, "racy"));

    let threads: Vec<_> = (0..8)
        .map(|_| {
            let ctx = ctx.clone();
            let pci = pci.clone();
            std::thread::spawn(move || ctx.assembler.create_graphics(&pci))
        })
        .collect();
    // Join first so every pipeline stays alive while the others build.
    let pipelines: Vec<_> = threads
        .into_iter()
        .map(|t| t.join().unwrap().unwrap())
        .collect();
    let hashes: Vec<u64> = pipelines.iter().map(|p| p.stream_hash()).collect();
    assert!(hashes.windows(2).all(|w| w[0] == w[1]));
    // Single-flight: one compilation per stage, no matter the thread count.
    assert_eq!(ctx.assembler.cache().misses(), 2);
    Ok(())
}
