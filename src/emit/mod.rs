//! Register-stream emission.
//!
//! The emitter turns reduced state plus compiled shader modules into the
//! two PM4 streams a pipeline owns: the context stream (draw-state
//! registers) and the config stream (persistent program registers).
//! Registers are always written in one canonical order, so identical inputs
//! produce byte-identical streams.

pub mod pm4;
pub mod regs;

mod compute;
mod graphics;

pub use compute::emit_compute;
pub use graphics::{emit_graphics, GraphicsEmitInput};
pub(crate) use graphics::binning_decision;

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::core::gpu_info::GpuInfo;
use crate::shader::geometry::{LegacyGsInfo, NggInfo};
use crate::shader::ir::ShaderStage;

/// Hardware dispatch path a shader is bound to.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum HwStage {
    /// Hardware vertex shader (the stage that exports position/params).
    Vs,
    /// Export shader feeding the legacy GS ring.
    Es,
    /// Local shader feeding tessellation.
    Ls,
    /// Hull shader (tessellation control; carries the merged LS+HS program
    /// on merged-stage generations).
    Hs,
    /// Legacy geometry shader (carries the merged ES+GS program on
    /// merged-stage generations).
    Gs,
    /// Primitive-generator (NGG) shader.
    Ngg,
    /// Pixel shader.
    Ps,
    /// Compute shader (also task shaders).
    Cs,
}

/// Pick the dispatch path for one API stage of a graphics pipeline.
/// `ngg` means this stage itself runs as the primitive generator (it is the
/// last vertex-like stage of an NGG pipeline).
pub fn hw_stage_for(
    gpu: &GpuInfo,
    stage: ShaderStage,
    has_tess: bool,
    has_gs: bool,
    ngg: bool,
) -> HwStage {
    let _ = gpu;
    match stage {
        ShaderStage::Fragment => HwStage::Ps,
        ShaderStage::Compute | ShaderStage::Task => HwStage::Cs,
        ShaderStage::Mesh => HwStage::Ngg,
        ShaderStage::TessCtrl => HwStage::Hs,
        ShaderStage::Geometry => {
            if ngg {
                HwStage::Ngg
            } else {
                HwStage::Gs
            }
        }
        ShaderStage::TessEval => {
            if ngg {
                HwStage::Ngg
            } else if has_gs {
                // Merged-stage generations fold this into the GS program;
                // the ES slot is still the dispatch path.
                HwStage::Es
            } else {
                HwStage::Vs
            }
        }
        ShaderStage::Vertex => {
            if ngg {
                HwStage::Ngg
            } else if has_tess {
                HwStage::Ls
            } else if has_gs {
                HwStage::Es
            } else {
                HwStage::Vs
            }
        }
    }
}

/// Is this API stage the one carrying the merged program's registers?
pub fn carries_own_program(gpu: &GpuInfo, hw: HwStage) -> bool {
    if !gpu.gfx_level.merged_shaders() {
        return true;
    }
    // On merged generations the LS and ES halves live inside the HS/GS
    // programs and get no register block of their own.
    !matches!(hw, HwStage::Ls | HwStage::Es)
}

/// Result of solving the geometry configuration for a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeometrySolution {
    /// No GS and no NGG: plain hardware VS.
    VertexOnly,
    Legacy(LegacyGsInfo),
    Ngg(NggInfo),
}

impl GeometrySolution {
    pub fn is_ngg(&self) -> bool {
        matches!(self, GeometrySolution::Ngg(_))
    }
}

/// The two register streams of a pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RegisterStreams {
    pub context: Vec<u32>,
    pub config: Vec<u32>,
}

impl RegisterStreams {
    /// Stable content hash over both streams, used by the determinism
    /// tests and for cheap pipeline equality checks.
    pub fn content_hash(&self) -> u64 {
        let mut h = DefaultHasher::new();
        self.context.hash(&mut h);
        self.config.hash(&mut h);
        h.finish()
    }
}

/// Dword budgets for the two streams. Generous; overflow means an emitter
/// bug, reported as `InternalAssertion`.
pub const CONTEXT_STREAM_BUDGET: usize = 512;
pub const CONFIG_STREAM_BUDGET: usize = 128;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::gpu_info::GfxLevel;

    #[test]
    fn hw_stage_mapping() {
        let gfx8 = GpuInfo::new(GfxLevel::Gfx8);
        let gfx11 = GpuInfo::new(GfxLevel::Gfx11);

        // VS feeding tessellation runs as LS.
        assert_eq!(
            hw_stage_for(&gfx8, ShaderStage::Vertex, true, false, false),
            HwStage::Ls
        );
        // VS feeding a legacy GS runs as ES.
        assert_eq!(
            hw_stage_for(&gfx8, ShaderStage::Vertex, false, true, false),
            HwStage::Es
        );
        // Plain VS.
        assert_eq!(
            hw_stage_for(&gfx8, ShaderStage::Vertex, false, false, false),
            HwStage::Vs
        );
        // NGG swallows the last vertex stage.
        assert_eq!(
            hw_stage_for(&gfx11, ShaderStage::Vertex, false, false, true),
            HwStage::Ngg
        );
        assert_eq!(
            hw_stage_for(&gfx11, ShaderStage::Mesh, false, false, true),
            HwStage::Ngg
        );
        // A TES feeding a legacy GS is an ES.
        assert_eq!(
            hw_stage_for(&gfx8, ShaderStage::TessEval, true, true, false),
            HwStage::Es
        );
    }

    #[test]
    fn merged_halves_have_no_program_block() {
        let gfx9 = GpuInfo::new(GfxLevel::Gfx9);
        let gfx8 = GpuInfo::new(GfxLevel::Gfx8);
        assert!(!carries_own_program(&gfx9, HwStage::Es));
        assert!(!carries_own_program(&gfx9, HwStage::Ls));
        assert!(carries_own_program(&gfx9, HwStage::Gs));
        assert!(carries_own_program(&gfx8, HwStage::Es));
    }
}
