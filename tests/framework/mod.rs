//! Shared test harness: a stub shader front-end/back-end pair and helpers
//! to inspect emitted PM4 streams.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use deimos::prelude::*;
use deimos::shader::ir::{BinaryModule, ShaderInfo};
use deimos::shader::key::VariantKey;

const TEST_MAGIC: u32 = 0x0723_0203;

/// Registers shader descriptions and plays both compiler seams. The
/// back-end is deterministic over (payload, key), which the determinism
/// tests rely on.
pub struct TestCompiler {
    infos: Mutex<HashMap<u32, ShaderInfo>>,
    next_id: AtomicU32,
}

impl TestCompiler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            infos: Mutex::new(HashMap::new()),
            next_id: AtomicU32::new(1),
        })
    }

    /// Create a test shader whose reflection is set up by `build`.
    pub fn shader(
        self: &Arc<Self>,
        stage: vk::ShaderStageFlags,
        build: impl FnOnce(&mut ShaderInfo),
    ) -> ShaderCode {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let api_stage = ShaderStage::from_vk(stage).expect("valid test stage");
        let mut info = ShaderInfo::new(api_stage);
        build(&mut info);
        self.infos.lock().unwrap().insert(id, info);
        ShaderCode::from_spirv(stage, vec![TEST_MAGIC, id])
    }
}

impl ShaderFrontend for TestCompiler {
    fn spirv_to_ir(
        &self,
        stage: ShaderStage,
        code: &[u32],
        _entry: &str,
        _spec: &[(u32, u32)],
    ) -> Result<ShaderIr, Error> {
        if code.first() != Some(&TEST_MAGIC) {
            return Err(Error::InvalidShader("bad magic".into()));
        }
        let id = *code.get(1).ok_or(Error::InvalidShader("truncated".into()))?;
        let info = self
            .infos
            .lock()
            .map_err(Error::from)?
            .get(&id)
            .cloned()
            .ok_or(Error::InvalidShader("unregistered test shader".into()))?;
        if info.stage != stage {
            return Err(Error::InvalidShader("stage mismatch".into()));
        }
        let payload = code.iter().flat_map(|w| w.to_le_bytes()).collect();
        Ok(ShaderIr { info, payload })
    }
}

impl ShaderBackend for TestCompiler {
    fn ir_to_binary(
        &self,
        ir: &ShaderIr,
        key: &VariantKey,
        _gpu: &GpuInfo,
    ) -> Result<BinaryModule, Error> {
        // Byte-identical output for byte-identical (payload, key).
        let mut code = ir.payload.clone();
        code.extend_from_slice(&key.serialize());
        Ok(BinaryModule {
            code,
            entry_offset: 0,
            num_sgprs: 32,
            num_vgprs: 24,
            lds_bytes: 0,
            scratch_bytes_per_wave: 0,
            wave_size: ir.info.wave_size,
        })
    }
}

pub struct TestContext {
    pub compiler: Arc<TestCompiler>,
    pub assembler: PipelineAssembler,
    pub blob: Arc<MemoryBlobCache>,
}

/// Assembler wired to the stub compiler, a fresh slab heap and an
/// in-memory blob cache.
pub fn make_context(gfx_level: GfxLevel) -> TestContext {
    let _ = pretty_env_logger::try_init();
    let compiler = TestCompiler::new();
    let blob = Arc::new(MemoryBlobCache::default());
    let assembler = PipelineAssembler::new(
        GpuInfo::new(gfx_level),
        compiler.clone(),
        compiler.clone(),
        Arc::new(SlabAllocator::new(1024 * 1024)),
        Some(blob.clone()),
    );
    TestContext {
        compiler,
        assembler,
        blob,
    }
}

/// Context that shares a blob store with a previous context, as if the
/// process restarted with a warm disk cache.
pub fn make_context_with_blob(gfx_level: GfxLevel, blob: Arc<MemoryBlobCache>) -> TestContext {
    let compiler = TestCompiler::new();
    let assembler = PipelineAssembler::new(
        GpuInfo::new(gfx_level),
        compiler.clone(),
        compiler.clone(),
        Arc::new(SlabAllocator::new(1024 * 1024)),
        Some(blob.clone()),
    );
    TestContext {
        compiler,
        assembler,
        blob,
    }
}

// --- PM4 stream inspection ---------------------------------------------

fn reg_location(reg: u32) -> (u32, u32) {
    if (0x8000..0xB000).contains(&reg) {
        (0x68, 0x8000)
    } else if (0xB000..0xC000).contains(&reg) {
        (0x76, 0xB000)
    } else if (0x28000..0x30000).contains(&reg) {
        (0x69, 0x28000)
    } else {
        (0x79, 0x30000)
    }
}

/// Find the last value written to `reg` in a PM4 stream.
pub fn find_reg(stream: &[u32], reg: u32) -> Option<u32> {
    let (want_op, base) = reg_location(reg);
    let want_dw = (reg - base) >> 2;
    let mut found = None;
    let mut i = 0;
    while i < stream.len() {
        let header = stream[i];
        assert_eq!(header >> 30, 3, "not a type-3 packet");
        let op = (header >> 8) & 0xff;
        let payload = ((header >> 16) & 0x3fff) + 1;
        if op == want_op {
            let first_dw = stream[i + 1];
            for j in 0..payload - 1 {
                if first_dw + j == want_dw {
                    found = Some(stream[i + 2 + j as usize]);
                }
            }
        }
        i += 1 + payload as usize;
    }
    found
}

/// A plain vertex shader exporting position and `n` generic varyings.
pub fn basic_vs(compiler: &Arc<TestCompiler>, n: u32) -> ShaderCode {
    use deimos::shader::ir::slot;
    compiler.shader(vk::ShaderStageFlags::VERTEX, |info| {
        info.outputs_written = slot::mask(slot::POS);
        for i in 0..n {
            info.outputs_written |= slot::mask(slot::var(i));
        }
    })
}

/// A fragment shader reading `n` varyings and writing color 0.
pub fn basic_fs(compiler: &Arc<TestCompiler>, n: u32) -> ShaderCode {
    use deimos::shader::ir::slot;
    compiler.shader(vk::ShaderStageFlags::FRAGMENT, |info| {
        for i in 0..n {
            info.inputs_read |= slot::mask(slot::var(i));
        }
        info.fs.colors_written = 0x1;
    })
}
