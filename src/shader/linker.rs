//! Inter-stage linking.
//!
//! Works on the IR summaries of all stages of one pipeline, in reverse
//! pipeline order: prunes dead varyings, injects implicit outputs (layer for
//! multiview, primitive id for the fragment shader), assigns export
//! parameter locations, classifies NGG against the legacy geometry path and
//! picks wave sizes. The summaries it produces are what the variant keys,
//! the geometry solver and the register emitter consume.

use ash::vk;

use crate::core::error::Error;
use crate::core::gpu_info::{GfxLevel, GpuInfo};
use crate::shader::ir::{slot, OutputPrim, ShaderIr, ShaderStage, SysValues, NO_LOCATION};

/// Cross-stage facts the linker needs besides the summaries themselves.
#[derive(Debug, Clone, Copy)]
pub struct LinkContext {
    pub gpu: GpuInfo,
    pub topology: vk::PrimitiveTopology,
    pub view_mask: u32,
    /// Final color export formats; zero nibbles prune fragment outputs.
    pub spi_shader_col_format: u32,
    pub cb_target_mask: u32,
    pub mrt0_dual_src: bool,
}

/// Per-pipeline linking results that do not live on a single stage.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinkOutput {
    /// ES→GS item size per vertex, in dwords.
    pub esgs_itemsize_dw: u32,
    /// Vertices each input primitive feeds to the last vertex stage.
    pub vertices_per_prim: u32,
    pub input_adjacency: bool,
}

/// Outputs that survive dead-varying elimination even when no stage reads
/// them: position family and tess factors.
const FIXED_OUTPUTS: u64 = slot::mask(slot::POS)
    | slot::mask(slot::PSIZ)
    | slot::mask(slot::CLIP_DIST0)
    | slot::mask(slot::CLIP_DIST1)
    | slot::mask(slot::TESS_LEVEL_OUTER)
    | slot::mask(slot::TESS_LEVEL_INNER)
    | slot::mask(slot::PRIM_COUNT)
    | slot::mask(slot::PRIM_INDICES);

/// Fragment inputs the hardware can synthesize (point coord) or default.
const FS_SYNTHESIZED_INPUTS: u64 = slot::mask(slot::PNTC);

const GENERIC_MASK: u64 = ((1u64 << slot::NUM_VARS) - 1) << slot::VAR0;

pub fn vertices_per_vk_prim(topology: vk::PrimitiveTopology) -> (u32, bool) {
    match topology {
        vk::PrimitiveTopology::POINT_LIST => (1, false),
        vk::PrimitiveTopology::LINE_LIST | vk::PrimitiveTopology::LINE_STRIP => (2, false),
        vk::PrimitiveTopology::LINE_LIST_WITH_ADJACENCY
        | vk::PrimitiveTopology::LINE_STRIP_WITH_ADJACENCY => (4, true),
        vk::PrimitiveTopology::TRIANGLE_LIST_WITH_ADJACENCY
        | vk::PrimitiveTopology::TRIANGLE_STRIP_WITH_ADJACENCY => (6, true),
        vk::PrimitiveTopology::PATCH_LIST => (1, false),
        _ => (3, false),
    }
}

/// Link all graphics stages. `stages` must be sorted in pipeline order and
/// have pairwise-distinct stage kinds.
pub fn link_graphics(ctx: &LinkContext, stages: &mut [ShaderIr]) -> Result<LinkOutput, Error> {
    if stages.is_empty() {
        return Err(Error::InvalidStageCombination("graphics pipeline without stages"));
    }
    for pair in stages.windows(2) {
        if pair[0].info.stage >= pair[1].info.stage {
            return Err(Error::InvalidStageCombination("stages out of order or duplicated"));
        }
    }

    let has_mesh = stages.iter().any(|s| s.info.stage == ShaderStage::Mesh);
    let has_gs = stages.iter().any(|s| s.info.stage == ShaderStage::Geometry);
    let has_tess = stages.iter().any(|s| s.info.stage == ShaderStage::TessEval);

    // Step 1: with a mesh shader, the fixed-value fragment inputs arrive
    // per-primitive instead of per-vertex.
    if has_mesh {
        if let Some(fs) = stage_mut(stages, ShaderStage::Fragment) {
            let specials = slot::mask(slot::PRIM_ID)
                | slot::mask(slot::LAYER)
                | slot::mask(slot::VIEWPORT);
            fs.info.per_primitive_inputs |= fs.info.inputs_read & specials;
        }
    }

    prune_fragment_outputs(ctx, stages);
    inject_multiview_layer(ctx, stages);
    inject_primitive_id(stages, has_gs, has_mesh);
    eliminate_dead_varyings(stages);
    remove_unused_point_size(ctx, stages, has_gs, has_tess, has_mesh);
    assign_driver_locations(stages);

    let out = link_geometry_io(ctx, stages, has_gs);
    classify_ngg(ctx, stages, &out, has_gs, has_tess, has_mesh)?;
    select_wave_sizes(ctx, stages);
    Ok(out)
}

/// Link a compute (or task-only) shader: wave-size selection only.
pub fn link_compute(
    gpu: &GpuInfo,
    ir: &mut ShaderIr,
    required_subgroup_size: Option<u32>,
    require_full_subgroups: bool,
) {
    let wg = ir.info.workgroup_size;
    let threads = wg[0] * wg[1] * wg[2];
    let mut wave = required_subgroup_size.unwrap_or(gpu.cs_wave_size);
    // "Full subgroups" on a wave32 chip wants wave64 when the workgroup
    // divides evenly, so no partial wave appears at the end.
    if require_full_subgroups
        && required_subgroup_size.is_none()
        && gpu.cs_wave_size == 32
        && threads % 64 == 0
    {
        wave = 64;
    }
    ir.info.wave_size = wave;
}

fn stage_mut(stages: &mut [ShaderIr], stage: ShaderStage) -> Option<&mut ShaderIr> {
    stages.iter_mut().find(|s| s.info.stage == stage)
}

fn stage_ref(stages: &[ShaderIr], stage: ShaderStage) -> Option<&ShaderIr> {
    stages.iter().find(|s| s.info.stage == stage)
}

fn last_vertex_stage_index(stages: &[ShaderIr]) -> usize {
    stages
        .iter()
        .rposition(|s| s.info.stage.is_vertex_like())
        .expect("graphics pipeline has a vertex-like stage")
}

/// Step 6: drop fragment color outputs whose export format is ZERO or whose
/// target mask nibble is empty. MRT0 survives under dual-source blending
/// even when masked.
fn prune_fragment_outputs(ctx: &LinkContext, stages: &mut [ShaderIr]) {
    let Some(fs) = stage_mut(stages, ShaderStage::Fragment) else {
        return;
    };
    let mut kept = 0u32;
    for i in 0..8 {
        let format_live = (ctx.spi_shader_col_format >> (4 * i)) & 0xf != 0;
        let target_live = (ctx.cb_target_mask >> (4 * i)) & 0xf != 0;
        if (format_live && target_live) || (i == 0 && ctx.mrt0_dual_src) {
            kept |= 1 << i;
        }
    }
    fs.info.fs.colors_written &= kept;
}

/// Step 8: multiview without an explicit layer output gets one injected in
/// the last vertex stage, sourced from the view index.
fn inject_multiview_layer(ctx: &LinkContext, stages: &mut [ShaderIr]) {
    if ctx.view_mask == 0 {
        return;
    }
    let last = last_vertex_stage_index(stages);
    let info = &mut stages[last].info;
    if !info.writes(slot::LAYER) {
        info.outputs_written |= slot::mask(slot::LAYER);
        info.sysvals |= SysValues::VIEW_INDEX;
        debug!("multiview: injected layer export in {:?}", info.stage);
    }
}

/// Step 5: the fragment shader reads the primitive id but the last vertex
/// stage does not export it; make it.
fn inject_primitive_id(stages: &mut [ShaderIr], has_gs: bool, has_mesh: bool) {
    let Some(fs) = stage_ref(stages, ShaderStage::Fragment) else {
        return;
    };
    if !fs.info.reads(slot::PRIM_ID) {
        return;
    }
    // GS and mesh shaders deliver the primitive id themselves.
    if has_gs || has_mesh {
        return;
    }
    let last = last_vertex_stage_index(stages);
    let info = &mut stages[last].info;
    if !info.writes(slot::PRIM_ID) {
        info.outputs_written |= slot::mask(slot::PRIM_ID);
        info.sysvals |= SysValues::PRIM_ID;
    }
}

/// Steps 3/4 at summary level: outputs nobody consumes die, inputs nobody
/// produces die. Transform feedback pins the producer side.
fn eliminate_dead_varyings(stages: &mut [ShaderIr]) {
    for i in 0..stages.len().saturating_sub(1) {
        let (a, b) = stages.split_at_mut(i + 1);
        let producer = &mut a[i].info;
        let consumer = &mut b[0].info;

        let mut keep = consumer.inputs_read | FIXED_OUTPUTS;
        if consumer.stage == ShaderStage::Fragment {
            keep |= slot::mask(slot::LAYER) | slot::mask(slot::VIEWPORT) | slot::mask(slot::PRIM_ID);
        }
        if producer.xfb.is_none() {
            let before = producer.outputs_written;
            producer.outputs_written &= keep;
            let dead = before & !producer.outputs_written;
            if dead != 0 {
                trace!(
                    "{:?}: eliminated {} dead output slots",
                    producer.stage,
                    dead.count_ones()
                );
            }
        }

        // Generic inputs with no producer read garbage; drop them. Special
        // slots fall back to default values in the interpolator table.
        let produced = producer.outputs_written | FS_SYNTHESIZED_INPUTS;
        consumer.inputs_read &= produced | !GENERIC_MASK;
    }
}

/// Step 7: point size only matters when something downstream rasterizes
/// points.
fn remove_unused_point_size(
    ctx: &LinkContext,
    stages: &mut [ShaderIr],
    has_gs: bool,
    has_tess: bool,
    has_mesh: bool,
) {
    let point_output = if has_mesh {
        stage_ref(stages, ShaderStage::Mesh)
            .map(|m| m.info.mesh.output_prim == OutputPrim::Points)
            .unwrap_or(false)
    } else if has_gs {
        stage_ref(stages, ShaderStage::Geometry)
            .map(|g| g.info.gs.output_prim == OutputPrim::Points)
            .unwrap_or(false)
    } else if has_tess {
        stage_ref(stages, ShaderStage::TessEval)
            .map(|t| t.info.tess.point_mode)
            .unwrap_or(false)
    } else {
        ctx.topology == vk::PrimitiveTopology::POINT_LIST
    };
    if point_output {
        return;
    }
    for s in stages.iter_mut() {
        s.info.outputs_written &= !slot::mask(slot::PSIZ);
    }
}

/// Assign dense export parameter slots per stage.
fn assign_driver_locations(stages: &mut [ShaderIr]) {
    for ir in stages.iter_mut() {
        let info = &mut ir.info;
        info.driver_locations = [NO_LOCATION; slot::NUM as usize];
        match info.stage {
            ShaderStage::Fragment => {
                // Fragment outputs use location (+1 for the dual-source
                // index); nothing to compact.
                for i in 0..8u32 {
                    if info.fs.colors_written & (1 << i) != 0 {
                        info.driver_locations[slot::var(i) as usize] = i as u8;
                    }
                }
            }
            ShaderStage::Mesh => {
                // Two dense streams: per-vertex then per-primitive, with the
                // primitive-count/indices outputs excluded from both.
                let excluded = slot::mask(slot::PRIM_COUNT) | slot::mask(slot::PRIM_INDICES);
                let mut next = 0u8;
                for s in param_slot_order() {
                    let m = slot::mask(s);
                    if m & excluded != 0 {
                        continue;
                    }
                    if info.outputs_written & !info.per_primitive_outputs & m != 0 {
                        info.driver_locations[s as usize] = next;
                        next += 1;
                    }
                }
                let mut next_prim = 0u8;
                for s in param_slot_order() {
                    let m = slot::mask(s);
                    if m & excluded != 0 {
                        continue;
                    }
                    if info.outputs_written & info.per_primitive_outputs & m != 0 {
                        info.driver_locations[s as usize] = next_prim;
                        next_prim += 1;
                    }
                }
            }
            _ => {
                let mut next = 0u8;
                for s in param_slot_order() {
                    if info.outputs_written & slot::mask(s) != 0 {
                        info.driver_locations[s as usize] = next;
                        next += 1;
                    }
                }
            }
        }
    }
}

/// Parameter export order: the special exports first, generic varyings by
/// location after them.
fn param_slot_order() -> impl Iterator<Item = u32> {
    [slot::PRIM_ID, slot::LAYER, slot::VIEWPORT]
        .into_iter()
        .chain((0..slot::NUM_VARS).map(slot::var))
}

/// Pairwise IO numbering towards the geometry stage: the ES→GS item size is
/// the number of linked slots times one vec4 (4 dwords) each.
fn link_geometry_io(ctx: &LinkContext, stages: &mut [ShaderIr], has_gs: bool) -> LinkOutput {
    let mut out = LinkOutput::default();
    let (verts, adjacency) = if let Some(gs) = stage_ref(stages, ShaderStage::Geometry) {
        (gs.info.gs.vertices_in, gs.info.gs.input_adjacency)
    } else if let Some(tes) = stage_ref(stages, ShaderStage::TessEval) {
        (
            match tes.info.tess.domain {
                crate::shader::ir::TessDomain::Triangles => 3,
                crate::shader::ir::TessDomain::Quads => 4,
                crate::shader::ir::TessDomain::Isolines => 2,
            },
            false,
        )
    } else {
        vertices_per_vk_prim(ctx.topology)
    };
    out.vertices_per_prim = verts;
    out.input_adjacency = adjacency;

    if has_gs {
        // The stage feeding the GS stores one vec4 per linked output.
        let feeder = stages
            .iter()
            .rev()
            .find(|s| {
                matches!(s.info.stage, ShaderStage::Vertex | ShaderStage::TessEval)
            })
            .map(|s| s.info.outputs_written & !FIXED_OUTPUTS | slot::mask(slot::POS))
            .unwrap_or(0);
        out.esgs_itemsize_dw = feeder.count_ones() * 4;
    }
    out
}

/// Pick NGG or the legacy geometry path for the last vertex stage.
fn classify_ngg(
    ctx: &LinkContext,
    stages: &mut [ShaderIr],
    link: &LinkOutput,
    has_gs: bool,
    has_tess: bool,
    has_mesh: bool,
) -> Result<(), Error> {
    let gpu = &ctx.gpu;
    let last = last_vertex_stage_index(stages);
    let has_xfb = stages.iter().any(|s| s.info.xfb.is_some());

    let mut use_ngg = gpu.gfx_level.has_ngg();
    if use_ngg && !gpu.gfx_level.ngg_required() {
        if has_tess && has_gs {
            let gs = stage_ref(stages, ShaderStage::Geometry).unwrap();
            if gs.info.gs.invocations * gs.info.gs.vertices_out > 256 {
                debug!("NGG: tess+GS subgroup too large, falling back to legacy");
                use_ngg = false;
            }
        }
        if has_xfb && !gpu.gfx_level.has_ngg_streamout() {
            debug!("NGG: streamout unsupported on this generation, using legacy");
            use_ngg = false;
        }
    }
    if gpu.gfx_level.ngg_required() && !use_ngg {
        return Err(Error::InternalAssertion("legacy geometry path on an NGG-only chip"));
    }

    let exports_prim_id = stages[last].info.writes(slot::PRIM_ID);
    let last_info = &mut stages[last].info;
    last_info.ngg.is_ngg = use_ngg || has_mesh;
    if !last_info.ngg.is_ngg {
        return Ok(());
    }

    // Culling wants real triangles from a VS or TES and a generation where
    // the cost model pays off.
    last_info.ngg.enable_culling = gpu.gfx_level >= GfxLevel::Gfx10_3
        && !has_gs
        && !has_mesh
        && !has_xfb
        && link.vertices_per_prim == 3;
    last_info.ngg.is_passthrough =
        !has_gs && !has_mesh && !has_xfb && !exports_prim_id && !last_info.ngg.enable_culling;
    last_info.ngg.early_prim_export = last_info.entry_single_block;
    Ok(())
}

/// Wave-size selection per stage.
fn select_wave_sizes(ctx: &LinkContext, stages: &mut [ShaderIr]) {
    let gpu = &ctx.gpu;
    let legacy_gs = stages
        .iter()
        .any(|s| s.info.stage == ShaderStage::Geometry && !s.info.ngg.is_ngg);

    for ir in stages.iter_mut() {
        let info = &mut ir.info;
        info.wave_size = match info.stage {
            ShaderStage::Fragment => gpu.ps_wave_size,
            ShaderStage::Task => gpu.cs_wave_size,
            ShaderStage::Compute => gpu.cs_wave_size,
            ShaderStage::Geometry if legacy_gs => 64,
            _ => {
                if gpu.gfx_level.has_ngg() {
                    gpu.ge_wave_size
                } else {
                    64
                }
            }
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shader::ir::{ShaderInfo, TessDomain};

    fn ir(stage: ShaderStage) -> ShaderIr {
        ShaderIr {
            info: ShaderInfo::new(stage),
            payload: Vec::new(),
        }
    }

    fn ctx(gfx: GfxLevel) -> LinkContext {
        LinkContext {
            gpu: GpuInfo::new(gfx),
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            view_mask: 0,
            spi_shader_col_format: 0xf,
            cb_target_mask: 0xf,
            mrt0_dual_src: false,
        }
    }

    #[test]
    fn dead_varying_elimination_is_symmetric() {
        let mut vs = ir(ShaderStage::Vertex);
        vs.info.outputs_written =
            slot::mask(slot::POS) | slot::mask(slot::var(0)) | slot::mask(slot::var(3));
        let mut fs = ir(ShaderStage::Fragment);
        fs.info.inputs_read = slot::mask(slot::var(0)) | slot::mask(slot::var(7));
        fs.info.fs.colors_written = 0x1;
        let mut stages = vec![vs, fs];
        link_graphics(&ctx(GfxLevel::Gfx10_3), &mut stages).unwrap();

        let vs = &stages[0].info;
        let fs = &stages[1].info;
        // var3 had no consumer, var7 had no producer.
        assert!(vs.writes(slot::var(0)));
        assert!(!vs.writes(slot::var(3)));
        assert!(fs.reads(slot::var(0)));
        assert!(!fs.reads(slot::var(7)));
        // Invariant: consumer inputs ⊆ producer outputs over generic slots.
        assert_eq!(fs.inputs_read & GENERIC_MASK & !vs.outputs_written, 0);
    }

    #[test]
    fn primitive_id_injected_for_fs() {
        let mut vs = ir(ShaderStage::Vertex);
        vs.info.outputs_written = slot::mask(slot::POS);
        let mut fs = ir(ShaderStage::Fragment);
        fs.info.inputs_read = slot::mask(slot::PRIM_ID);
        fs.info.fs.colors_written = 0x1;
        let mut stages = vec![vs, fs];
        link_graphics(&ctx(GfxLevel::Gfx10_3), &mut stages).unwrap();
        assert!(stages[0].info.writes(slot::PRIM_ID));
        // Exporting the primitive id forbids NGG passthrough.
        assert!(stages[0].info.ngg.is_ngg);
        assert!(!stages[0].info.ngg.is_passthrough);
    }

    #[test]
    fn multiview_injects_layer() {
        let mut c = ctx(GfxLevel::Gfx10_3);
        c.view_mask = 0b11;
        let mut vs = ir(ShaderStage::Vertex);
        vs.info.outputs_written = slot::mask(slot::POS);
        let mut stages = vec![vs, ir(ShaderStage::Fragment)];
        link_graphics(&c, &mut stages).unwrap();
        assert!(stages[0].info.writes(slot::LAYER));
        assert!(stages[0].info.sysvals.contains(SysValues::VIEW_INDEX));
    }

    #[test]
    fn point_size_removed_for_triangles() {
        let mut vs = ir(ShaderStage::Vertex);
        vs.info.outputs_written = slot::mask(slot::POS) | slot::mask(slot::PSIZ);
        let mut stages = vec![vs, ir(ShaderStage::Fragment)];
        link_graphics(&ctx(GfxLevel::Gfx10_3), &mut stages).unwrap();
        assert!(!stages[0].info.writes(slot::PSIZ));

        let mut c = ctx(GfxLevel::Gfx10_3);
        c.topology = vk::PrimitiveTopology::POINT_LIST;
        let mut vs = ir(ShaderStage::Vertex);
        vs.info.outputs_written = slot::mask(slot::POS) | slot::mask(slot::PSIZ);
        let mut stages = vec![vs, ir(ShaderStage::Fragment)];
        link_graphics(&c, &mut stages).unwrap();
        assert!(stages[0].info.writes(slot::PSIZ));
    }

    #[test]
    fn xfb_blocks_ngg_before_gfx11() {
        let mut vs = ir(ShaderStage::Vertex);
        vs.info.outputs_written = slot::mask(slot::POS) | slot::mask(slot::var(0));
        vs.info.xfb = Some(Default::default());
        let mut stages = vec![vs, ir(ShaderStage::Fragment)];
        link_graphics(&ctx(GfxLevel::Gfx10_3), &mut stages).unwrap();
        assert!(!stages[0].info.ngg.is_ngg);

        let mut vs = ir(ShaderStage::Vertex);
        vs.info.xfb = Some(Default::default());
        let mut stages = vec![vs, ir(ShaderStage::Fragment)];
        link_graphics(&ctx(GfxLevel::Gfx11), &mut stages).unwrap();
        assert!(stages[0].info.ngg.is_ngg);
        assert!(!stages[0].info.ngg.is_passthrough);
    }

    #[test]
    fn tess_gs_subgroup_limit_falls_back_to_legacy() {
        let mut tes = ir(ShaderStage::TessEval);
        tes.info.tess.domain = TessDomain::Triangles;
        let mut gs = ir(ShaderStage::Geometry);
        gs.info.gs.invocations = 2;
        gs.info.gs.vertices_out = 200;
        let mut stages = vec![ir(ShaderStage::Vertex), ir(ShaderStage::TessCtrl), tes, gs, ir(ShaderStage::Fragment)];
        link_graphics(&ctx(GfxLevel::Gfx10), &mut stages).unwrap();
        let gs = stage_ref(&stages, ShaderStage::Geometry).unwrap();
        assert!(!gs.info.ngg.is_ngg);
        // Legacy GS always runs wave64.
        assert_eq!(gs.info.wave_size, 64);
    }

    #[test]
    fn driver_locations_are_dense() {
        let mut vs = ir(ShaderStage::Vertex);
        vs.info.outputs_written = slot::mask(slot::POS)
            | slot::mask(slot::var(2))
            | slot::mask(slot::var(5))
            | slot::mask(slot::LAYER);
        let mut fs = ir(ShaderStage::Fragment);
        fs.info.inputs_read = slot::mask(slot::var(2)) | slot::mask(slot::var(5));
        let mut stages = vec![vs, fs];
        link_graphics(&ctx(GfxLevel::Gfx10_3), &mut stages).unwrap();
        let vs = &stages[0].info;
        assert_eq!(vs.driver_locations[slot::LAYER as usize], 0);
        assert_eq!(vs.driver_locations[slot::var(2) as usize], 1);
        assert_eq!(vs.driver_locations[slot::var(5) as usize], 2);
        assert_eq!(vs.driver_locations[slot::POS as usize], NO_LOCATION);
    }

    #[test]
    fn compute_wave_selection() {
        let gpu = GpuInfo::new(GfxLevel::Gfx10_3);
        let mut cs = ir(ShaderStage::Compute);
        cs.info.workgroup_size = [64, 1, 1];
        link_compute(&gpu, &mut cs, Some(32), false);
        assert_eq!(cs.info.wave_size, 32);

        let mut cs = ir(ShaderStage::Compute);
        cs.info.workgroup_size = [128, 1, 1];
        link_compute(&gpu, &mut cs, None, true);
        assert_eq!(cs.info.wave_size, 64);
    }
}
