//! IR summaries and the compiler seams.
//!
//! Deimos does not own a shader IR. The front-end ([`ShaderFrontend`], the
//! `SpirvToIR` seam) lowers SPIR-V into an opaque payload annotated with a
//! [`ShaderInfo`] summary; the linker and the geometry solver work purely on
//! the summaries, and the back-end ([`ShaderBackend`], the `IRToBinary` seam)
//! consumes the payload together with the variant key to produce machine
//! code. The payload is dropped as soon as the binary exists.

use bitflags::bitflags;

use crate::core::error::Error;
use crate::core::gpu_info::GpuInfo;
use crate::shader::key::VariantKey;

/// API shader stage. Ordering follows the pipeline order, which the linker
/// relies on when walking producer/consumer pairs.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ShaderStage {
    Task,
    Vertex,
    TessCtrl,
    TessEval,
    Geometry,
    Mesh,
    Fragment,
    Compute,
}

impl ShaderStage {
    pub fn from_vk(stage: ash::vk::ShaderStageFlags) -> Option<Self> {
        use ash::vk::ShaderStageFlags as F;
        Some(match stage {
            F::VERTEX => ShaderStage::Vertex,
            F::TESSELLATION_CONTROL => ShaderStage::TessCtrl,
            F::TESSELLATION_EVALUATION => ShaderStage::TessEval,
            F::GEOMETRY => ShaderStage::Geometry,
            F::FRAGMENT => ShaderStage::Fragment,
            F::COMPUTE => ShaderStage::Compute,
            F::TASK_EXT => ShaderStage::Task,
            F::MESH_EXT => ShaderStage::Mesh,
            _ => return None,
        })
    }

    /// Stages that can be the last vertex-processing stage of a pipeline.
    pub fn is_vertex_like(self) -> bool {
        matches!(
            self,
            ShaderStage::Vertex
                | ShaderStage::TessEval
                | ShaderStage::Geometry
                | ShaderStage::Mesh
        )
    }
}

/// IO slot numbering shared by all stages. Generic varyings start at
/// [`slot::VAR0`]; everything below is a dedicated slot.
pub mod slot {
    pub const POS: u32 = 0;
    pub const PSIZ: u32 = 1;
    pub const CLIP_DIST0: u32 = 2;
    pub const CLIP_DIST1: u32 = 3;
    pub const PRIM_ID: u32 = 4;
    pub const LAYER: u32 = 5;
    pub const VIEWPORT: u32 = 6;
    pub const TESS_LEVEL_OUTER: u32 = 7;
    pub const TESS_LEVEL_INNER: u32 = 8;
    /// Point sprite coordinate, fragment input only.
    pub const PNTC: u32 = 9;
    /// Mesh-shader primitive count; never allocated a param slot.
    pub const PRIM_COUNT: u32 = 10;
    /// Mesh-shader primitive index buffer; never allocated a param slot.
    pub const PRIM_INDICES: u32 = 11;
    pub const VAR0: u32 = 16;
    pub const NUM_VARS: u32 = 32;
    pub const NUM: u32 = VAR0 + NUM_VARS;

    pub const fn mask(s: u32) -> u64 {
        1u64 << s
    }

    pub const fn var(i: u32) -> u32 {
        VAR0 + i
    }
}

/// Driver location value for "not assigned".
pub const NO_LOCATION: u8 = 0xff;

bitflags! {
    /// System values a stage reads.
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
    pub struct SysValues: u32 {
        const VERTEX_ID = 1 << 0;
        const INSTANCE_ID = 1 << 1;
        const DRAW_ID = 1 << 2;
        const BASE_VERTEX = 1 << 3;
        const PRIM_ID = 1 << 4;
        const VIEW_INDEX = 1 << 5;
        const SAMPLE_ID = 1 << 6;
        const SAMPLE_POS = 1 << 7;
        const SAMPLE_MASK_IN = 1 << 8;
        const FRAG_COORD = 1 << 9;
        const FRONT_FACE = 1 << 10;
        const BARYCENTRICS = 1 << 11;
        const INVOCATION_ID = 1 << 12;
        const TESS_COORD = 1 << 13;
        const WORKGROUP_ID = 1 << 14;
        const LOCAL_INVOCATION_ID = 1 << 15;
        const SUBGROUP_ID = 1 << 16;
    }
}

/// Output primitive kind of a geometry-producing stage.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub enum OutputPrim {
    #[default]
    Points,
    LineStrip,
    TriangleStrip,
}

/// Tessellation abstract patch domain.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub enum TessDomain {
    #[default]
    Triangles,
    Quads,
    Isolines,
}

/// Tessellation partitioning.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub enum TessSpacing {
    #[default]
    Equal,
    FractionalOdd,
    FractionalEven,
}

/// Transform feedback layout of the last vertex stage.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub struct XfbInfo {
    /// Number of captured output dwords per vertex.
    pub num_outputs: u32,
    pub buffer_strides: [u32; 4],
}

/// Geometry-shader execution description.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct GsState {
    pub invocations: u32,
    pub vertices_out: u32,
    pub vertices_in: u32,
    pub input_adjacency: bool,
    pub output_prim: OutputPrim,
    /// Per-vertex emit size towards the GS-VS ring, in dwords.
    pub gsvs_vertex_dwords: u32,
}

impl Default for GsState {
    fn default() -> Self {
        Self {
            invocations: 1,
            vertices_out: 0,
            vertices_in: 3,
            input_adjacency: false,
            output_prim: OutputPrim::TriangleStrip,
            gsvs_vertex_dwords: 0,
        }
    }
}

/// Tessellation execution description, merged view of TCS and TES fields.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub struct TessState {
    pub domain: TessDomain,
    pub spacing: TessSpacing,
    pub point_mode: bool,
    pub ccw: bool,
    pub tcs_vertices_out: u32,
}

/// Fragment-shader facts the reducers and the emitter consume.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub struct FsState {
    pub early_fragment_tests: bool,
    pub reads_sample_mask: bool,
    pub uses_sample_shading: bool,
    pub writes_z: bool,
    pub writes_stencil: bool,
    pub writes_sample_mask: bool,
    pub can_discard: bool,
    /// Mask of color outputs written (bit per render target).
    pub colors_written: u32,
    pub dual_src_blend: bool,
    /// Number of input clip+cull distances consumed.
    pub input_clips_culls: u8,
    /// Per-slot flat-shaded inputs.
    pub flat_inputs: u64,
    /// Per-slot explicitly-interpolated inputs.
    pub explicit_inputs: u64,
    /// Per-slot 16-bit interpolated inputs.
    pub float16_inputs: u64,
}

/// Mesh-shader limits.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub struct MeshState {
    pub max_vertices: u32,
    pub max_primitives: u32,
    pub output_prim: OutputPrim,
}

/// NGG execution facts, filled in by the stage linker.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub struct NggState {
    pub is_ngg: bool,
    pub is_passthrough: bool,
    pub enable_culling: bool,
    /// The NGG entry is a single basic block, so primitives can be exported
    /// before the vertex loop finishes.
    pub early_prim_export: bool,
}

/// Reflection summary of one lowered shader. Produced by the front-end,
/// refined by the stage linker, consumed by the solver and the emitter.
#[derive(Debug, Clone, PartialEq)]
pub struct ShaderInfo {
    pub stage: ShaderStage,
    pub inputs_read: u64,
    pub outputs_written: u64,
    /// Mesh outputs that are per-primitive rather than per-vertex.
    pub per_primitive_outputs: u64,
    /// Fragment inputs that arrive per-primitive (mesh pipelines).
    pub per_primitive_inputs: u64,
    pub sysvals: SysValues,
    pub clip_dist_mask: u8,
    pub cull_dist_mask: u8,
    pub writes_memory: bool,
    /// The lowered entry point is one basic block.
    pub entry_single_block: bool,
    pub workgroup_size: [u32; 3],
    pub xfb: Option<XfbInfo>,
    pub gs: GsState,
    pub tess: TessState,
    pub fs: FsState,
    pub mesh: MeshState,
    /// Export parameter slot per IO slot, assigned during linking.
    pub driver_locations: [u8; slot::NUM as usize],
    pub ngg: NggState,
    /// Wave width selected during linking.
    pub wave_size: u32,
}

impl ShaderInfo {
    pub fn new(stage: ShaderStage) -> Self {
        Self {
            stage,
            inputs_read: 0,
            outputs_written: 0,
            per_primitive_outputs: 0,
            per_primitive_inputs: 0,
            sysvals: SysValues::empty(),
            clip_dist_mask: 0,
            cull_dist_mask: 0,
            writes_memory: false,
            entry_single_block: false,
            workgroup_size: [1, 1, 1],
            xfb: None,
            gs: GsState::default(),
            tess: TessState::default(),
            fs: FsState::default(),
            mesh: MeshState::default(),
            driver_locations: [NO_LOCATION; slot::NUM as usize],
            ngg: NggState::default(),
            wave_size: 64,
        }
    }

    pub fn writes(&self, s: u32) -> bool {
        self.outputs_written & slot::mask(s) != 0
    }

    pub fn reads(&self, s: u32) -> bool {
        self.inputs_read & slot::mask(s) != 0
    }

    /// Clip+cull distance count, rounded to full vec4 slots by the caller.
    pub fn num_clips_culls(&self) -> u32 {
        (self.clip_dist_mask | self.cull_dist_mask).count_ones()
    }
}

/// One lowered shader: the reflection summary plus the front-end's opaque
/// payload that the back-end consumes. The payload is the IR arena; it dies
/// with the `ShaderIr` right after code generation.
#[derive(Debug, Clone)]
pub struct ShaderIr {
    pub info: ShaderInfo,
    pub payload: Vec<u8>,
}

/// Compiled machine code plus its resource footprint, as returned by the
/// back-end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryModule {
    pub code: Vec<u8>,
    pub entry_offset: u32,
    pub num_sgprs: u32,
    pub num_vgprs: u32,
    pub lds_bytes: u32,
    pub scratch_bytes_per_wave: u32,
    pub wave_size: u32,
}

/// The `SpirvToIR` seam: lowers portable bytecode into an annotated IR.
/// Implementations must be deterministic over their inputs.
pub trait ShaderFrontend: Send + Sync {
    fn spirv_to_ir(
        &self,
        stage: ShaderStage,
        code: &[u32],
        entry: &str,
        spec_constants: &[(u32, u32)],
    ) -> Result<ShaderIr, Error>;
}

/// The `IRToBinary` seam: turns a linked IR into machine code. The variant
/// key carries every state bit the generated code may specialize on, so two
/// equal keys yield byte-identical binaries.
pub trait ShaderBackend: Send + Sync {
    fn ir_to_binary(
        &self,
        ir: &ShaderIr,
        key: &VariantKey,
        gpu: &GpuInfo,
    ) -> Result<BinaryModule, Error>;
}
