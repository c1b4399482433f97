//! Geometry-pipeline solving: per-subgroup vertex/primitive counts, LDS
//! sizing and ring sizes for the legacy GS path and for NGG.

use crate::core::error::Error;
use crate::core::gpu_info::GpuInfo;
use crate::shader::ir::{OutputPrim, ShaderInfo, TessDomain};
use crate::shader::linker::LinkOutput;
use crate::util::align;

/// What the rasterizer ultimately receives from the geometry stages.
pub fn tess_prim_to_output(domain: TessDomain, point_mode: bool) -> OutputPrim {
    // Point mode is applied by the tessellator after primitive generation;
    // the abstract domain still reports its strip type here.
    let _ = point_mode;
    match domain {
        TessDomain::Triangles | TessDomain::Quads => OutputPrim::TriangleStrip,
        TessDomain::Isolines => OutputPrim::LineStrip,
    }
}

pub fn topology_to_output(topology: ash::vk::PrimitiveTopology) -> OutputPrim {
    use ash::vk::PrimitiveTopology as T;
    match topology {
        T::POINT_LIST => OutputPrim::Points,
        T::LINE_LIST | T::LINE_STRIP | T::LINE_LIST_WITH_ADJACENCY | T::LINE_STRIP_WITH_ADJACENCY => {
            OutputPrim::LineStrip
        }
        _ => OutputPrim::TriangleStrip,
    }
}

/// The guardband can only swallow clipping for filled triangles; points and
/// lines (including tessellation point mode) must really clip.
pub fn can_use_guardband(prim: OutputPrim, point_mode: bool) -> bool {
    prim == OutputPrim::TriangleStrip && !point_mode
}

// --- Legacy (gfx8/gfx9) on-chip GS -------------------------------------

/// Subgroup configuration of a legacy ES→GS→VS pipeline.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct LegacyGsInfo {
    pub es_verts_per_subgroup: u32,
    pub gs_prims_per_subgroup: u32,
    pub gs_inst_prims_in_subgroup: u32,
    pub max_prims_per_subgroup: u32,
    /// ESGS LDS footprint in dwords, already aligned to the 128-dword
    /// granule the register takes.
    pub lds_granules: u32,
    pub lds_dwords: u32,
    /// Per-ES-vertex ring item size in dwords.
    pub esgs_itemsize_dw: u32,
    pub workgroup_size: u32,
}

const MAX_OUT_PRIMS: u32 = 32 * 1024;
const MAX_ES_VERTS: u32 = 255;
const IDEAL_GS_PRIMS: u32 = 64;

/// Solve the on-chip GS subgroup layout for the legacy path.
pub fn legacy_gs_info(gpu: &GpuInfo, gs: &ShaderInfo, esgs_itemsize_dw: u32) -> LegacyGsInfo {
    let max_lds = gpu.gfx_level.legacy_gs_lds_budget();
    let invocations = gs.gs.invocations.max(1);
    let vertices_out = gs.gs.vertices_out.max(1);
    let adjacency = gs.gs.input_adjacency;
    let esgs_item = esgs_itemsize_dw.max(1);

    let mut max_gs_prims = if adjacency || invocations > 1 {
        127 / invocations
    } else {
        255
    };
    max_gs_prims = max_gs_prims.min(MAX_OUT_PRIMS / (vertices_out * invocations).max(1));
    let mut gs_prims = IDEAL_GS_PRIMS.min(max_gs_prims);

    let min_es_verts = (gs.gs.vertices_in / if adjacency { 2 } else { 1 }).max(1);
    let mut worst_case_es_verts = (min_es_verts * gs_prims).min(MAX_ES_VERTS);
    let mut esgs_lds = esgs_item * worst_case_es_verts;

    if esgs_lds > max_lds {
        gs_prims = (max_lds / (esgs_item * min_es_verts)).max(1);
        worst_case_es_verts = (min_es_verts * gs_prims).min(MAX_ES_VERTS);
        esgs_lds = esgs_item * worst_case_es_verts;
    }

    // Vertex reuse means a subgroup almost never needs the worst case; the
    // hardware only requires room for one fresh primitive at the end.
    let es_verts = worst_case_es_verts - (min_es_verts - 1);

    let gs_inst_prims = gs_prims * invocations;
    let out = LegacyGsInfo {
        es_verts_per_subgroup: es_verts,
        gs_prims_per_subgroup: gs_prims,
        gs_inst_prims_in_subgroup: gs_inst_prims,
        max_prims_per_subgroup: gs_inst_prims * vertices_out,
        lds_granules: align(esgs_lds, 128) / 128,
        lds_dwords: esgs_lds,
        esgs_itemsize_dw: esgs_item,
        workgroup_size: es_verts.max(gs_inst_prims).min(256),
    };
    trace!(
        "legacy GS subgroup: {} es verts, {} gs prims, {} lds dwords",
        out.es_verts_per_subgroup,
        out.gs_prims_per_subgroup,
        out.lds_dwords
    );
    out
}

// --- NGG ---------------------------------------------------------------

/// Subgroup configuration of an NGG pipeline.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct NggInfo {
    /// ES vertex limit programmed into the geometry engine. On the first
    /// NGG generation this under-reports the real limit (see the solver).
    pub hw_max_esverts: u32,
    pub max_esverts: u32,
    pub max_gsprims: u32,
    pub max_out_verts: u32,
    pub prim_amp_factor: u32,
    /// Multi-cycle mode: one GS instance per subgroup.
    pub max_vert_out_per_gs_instance: bool,
    pub esvert_lds_dw: u32,
    pub gsprim_lds_dw: u32,
    /// GS output staging area in dwords.
    pub ngg_emit_dw: u32,
    pub esgs_ring_bytes: u32,
    pub enable_vertex_grouping: bool,
    pub workgroup_size: u32,
}

fn clamp_gsprims_to_esverts(
    max_gsprims: &mut u32,
    max_esverts: u32,
    min_verts_per_prim: u32,
    use_adjacency: bool,
) {
    // Vertex reuse math: after the first primitive, each further primitive
    // introduces at most min_verts_per_prim new vertices (half that with
    // adjacency, where every other vertex is reused).
    let mut max_reuse = max_esverts - min_verts_per_prim;
    if use_adjacency {
        max_reuse /= 2;
    }
    *max_gsprims = (*max_gsprims).min(1 + max_reuse);
}

/// Solve the NGG subgroup layout for the last vertex stage.
///
/// `last` is the API stage running as NGG (VS, TES or GS); `gs` is the
/// geometry shader when present.
pub fn ngg_info(
    gpu: &GpuInfo,
    last: &ShaderInfo,
    gs: Option<&ShaderInfo>,
    link: &LinkOutput,
    esgs_itemsize_dw: u32,
    vs_exports_prim_id: bool,
) -> Result<NggInfo, Error> {
    let gfx_level = gpu.gfx_level;
    let wavesize = last.wave_size.max(32);
    let max_lds = gfx_level.ngg_lds_budget();

    let max_verts_per_prim = link.vertices_per_prim.max(1);
    let min_verts_per_prim = if gs.is_some() { max_verts_per_prim } else { 1 };
    let use_adjacency = link.input_adjacency;

    // The geometry engine cannot take a full 256-vertex group for every
    // input primitive type; the limit shrinks with the primitive arity.
    let max_esverts_base = 128u32.min(251 + max_verts_per_prim - 1);
    let mut max_gsprims_base = 128u32;

    let mut max_vert_out_per_gs_instance = false;
    let mut esvert_lds_size = 0u32;
    let mut gsprim_lds_size = 0u32;
    let mut max_out_verts_per_gsprim = 0u32;

    if let Some(gs) = gs {
        let invocations = gs.gs.invocations.max(1);
        max_out_verts_per_gsprim = gs.gs.vertices_out * invocations;
        if max_out_verts_per_gsprim <= 256 {
            if max_out_verts_per_gsprim > 0 {
                max_gsprims_base = max_gsprims_base.min(256 / max_out_verts_per_gsprim);
            }
        } else {
            // One GS instance per subgroup. Known-broken together with
            // tessellation, which the linker already routed to legacy.
            max_vert_out_per_gs_instance = true;
            max_gsprims_base = 1;
            max_out_verts_per_gsprim = gs.gs.vertices_out;
        }
        esvert_lds_size = esgs_itemsize_dw.max(1);
        gsprim_lds_size = (gs.gs.gsvs_vertex_dwords + 1) * max_out_verts_per_gsprim;
    } else {
        // VS/TES: LDS is only needed for streamout staging and for passing
        // the provoking vertex's primitive id.
        if let Some(xfb) = &last.xfb {
            esvert_lds_size = 4 * xfb.num_outputs + 1;
        }
        if vs_exports_prim_id {
            esvert_lds_size = esvert_lds_size.max(1);
        }
    }

    let mut max_esverts = max_esverts_base;
    let mut max_gsprims = max_gsprims_base;

    if esvert_lds_size > 0 {
        max_esverts = max_esverts.min(max_lds / esvert_lds_size);
    }
    if gsprim_lds_size > 0 {
        max_gsprims = max_gsprims.min(max_lds / gsprim_lds_size);
    }
    max_esverts = max_esverts.min(max_gsprims * max_verts_per_prim);
    clamp_gsprims_to_esverts(&mut max_gsprims, max_esverts, min_verts_per_prim, use_adjacency);

    if esvert_lds_size > 0 || gsprim_lds_size > 0 {
        // Scale both limits down proportionally to fit LDS.
        let lds_total = max_esverts * esvert_lds_size + max_gsprims * gsprim_lds_size;
        if lds_total > max_lds {
            max_esverts = max_esverts * max_lds / lds_total;
            max_gsprims = max_gsprims * max_lds / lds_total;
            max_esverts = max_esverts.min(max_gsprims * max_verts_per_prim);
            clamp_gsprims_to_esverts(&mut max_gsprims, max_esverts, min_verts_per_prim, use_adjacency);
        }
    }

    let min_esverts = gfx_level.ngg_min_esverts();
    let min_esverts_eff = if gfx_level.ngg_esverts_checked_late() {
        min_esverts - 1 + max_verts_per_prim
    } else {
        min_esverts
    };

    if !max_vert_out_per_gs_instance {
        // Round up to full waves, then re-apply every clamp; iterate to a
        // fixed point.
        loop {
            let orig_esverts = max_esverts;
            let orig_gsprims = max_gsprims;

            max_esverts = align(max_esverts, wavesize).min(max_esverts_base);
            if esvert_lds_size > 0 {
                max_esverts = max_esverts
                    .min((max_lds - max_gsprims * gsprim_lds_size) / esvert_lds_size);
            }
            max_esverts = max_esverts.min(max_gsprims * max_verts_per_prim);
            max_esverts = max_esverts.max(min_esverts_eff);

            max_gsprims = align(max_gsprims, wavesize).min(max_gsprims_base);
            if gsprim_lds_size > 0 {
                let usable_esverts = max_esverts.min(max_gsprims * max_verts_per_prim);
                max_gsprims = max_gsprims
                    .min((max_lds - usable_esverts * esvert_lds_size) / gsprim_lds_size);
            }
            clamp_gsprims_to_esverts(&mut max_gsprims, max_esverts, min_verts_per_prim, use_adjacency);

            if orig_esverts == max_esverts && orig_gsprims == max_gsprims {
                break;
            }
        }
    } else {
        max_esverts = max_esverts.max(min_esverts_eff);
    }

    let max_out_verts = if max_vert_out_per_gs_instance {
        max_out_verts_per_gsprim
    } else if let Some(gs) = gs {
        max_gsprims * gs.gs.invocations.max(1) * gs.gs.vertices_out
    } else {
        max_esverts
    };
    if max_out_verts > 256 {
        return Err(Error::InternalAssertion("NGG subgroup exceeds 256 output vertices"));
    }

    let prim_amp_factor = match gs {
        Some(gs) => gs.gs.vertices_out.max(1),
        None => 1,
    };

    // The GE checks the ES vertex count only after allocating a full
    // primitive on the first NGG generation; under-report the limit so the
    // check can never overcommit.
    let hw_max_esverts = if gfx_level.ngg_esverts_checked_late() {
        max_esverts - max_verts_per_prim + 1
    } else {
        max_esverts
    };

    let invocations = gs.map(|g| g.gs.invocations.max(1)).unwrap_or(1);
    let info = NggInfo {
        hw_max_esverts,
        max_esverts,
        max_gsprims,
        max_out_verts,
        prim_amp_factor,
        max_vert_out_per_gs_instance,
        esvert_lds_dw: esvert_lds_size,
        gsprim_lds_dw: gsprim_lds_size,
        ngg_emit_dw: max_gsprims * gsprim_lds_size,
        esgs_ring_bytes: max_esverts.min(max_gsprims * max_verts_per_prim) * esvert_lds_size * 4,
        enable_vertex_grouping: false,
        workgroup_size: max_esverts
            .max(max_gsprims * invocations)
            .max(max_out_verts)
            .max(prim_amp_factor),
    };
    trace!(
        "NGG subgroup: {} es verts ({} hw), {} gs prims, emit {} dw",
        info.max_esverts,
        info.hw_max_esverts,
        info.max_gsprims,
        info.ngg_emit_dw
    );
    Ok(info)
}

/// Mesh shaders drive NGG directly: one "primitive" per subgroup with the
/// shader's declared amplification.
pub fn mesh_ngg_info(gpu: &GpuInfo, mesh: &ShaderInfo) -> NggInfo {
    let api_workgroup = mesh.workgroup_size[0] * mesh.workgroup_size[1] * mesh.workgroup_size[2];
    NggInfo {
        hw_max_esverts: 1,
        max_esverts: 1,
        max_gsprims: 1,
        max_out_verts: mesh.mesh.max_vertices,
        prim_amp_factor: mesh.mesh.max_primitives,
        max_vert_out_per_gs_instance: false,
        esvert_lds_dw: 0,
        gsprim_lds_dw: 0,
        ngg_emit_dw: 0,
        esgs_ring_bytes: 0,
        enable_vertex_grouping: true,
        workgroup_size: api_workgroup.max(gpu.ge_wave_size),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::gpu_info::GfxLevel;
    use crate::shader::ir::ShaderStage;

    fn gs_info(invocations: u32, vertices_in: u32, vertices_out: u32, emit_dw: u32) -> ShaderInfo {
        let mut info = ShaderInfo::new(ShaderStage::Geometry);
        info.gs.invocations = invocations;
        info.gs.vertices_in = vertices_in;
        info.gs.vertices_out = vertices_out;
        info.gs.gsvs_vertex_dwords = emit_dw;
        info
    }

    #[test]
    fn legacy_gs_fits_lds_budget() {
        let gpu = GpuInfo::new(GfxLevel::Gfx8);
        let gs = gs_info(2, 3, 32, 32);
        let r = legacy_gs_info(&gpu, &gs, 32);
        assert!(r.lds_dwords <= gpu.gfx_level.legacy_gs_lds_budget());
        assert!(r.lds_dwords > 0);
        // Register granularity of 128 dwords.
        assert_eq!(r.lds_granules, align(r.lds_dwords, 128) / 128);
        assert!(r.gs_prims_per_subgroup <= 127 / 2);
        assert!(r.max_prims_per_subgroup <= 32 * 1024);
    }

    #[test]
    fn legacy_gs_large_items_shrink_subgroup() {
        let gpu = GpuInfo::new(GfxLevel::Gfx9);
        let gs = gs_info(1, 3, 4, 16);
        // Enormous per-vertex footprint forces the LDS refit path.
        let r = legacy_gs_info(&gpu, &gs, 512);
        assert!(r.lds_dwords <= gpu.gfx_level.legacy_gs_lds_budget());
        assert!(r.gs_prims_per_subgroup >= 1);
    }

    fn vs_link() -> LinkOutput {
        LinkOutput {
            esgs_itemsize_dw: 0,
            vertices_per_prim: 3,
            input_adjacency: false,
        }
    }

    #[test]
    fn ngg_vs_satisfies_lds_and_reuse_invariants() {
        let gpu = GpuInfo::new(GfxLevel::Gfx10);
        let mut vs = ShaderInfo::new(ShaderStage::Vertex);
        vs.wave_size = 32;
        let info = ngg_info(&gpu, &vs, None, &vs_link(), 0, true).unwrap();
        let lds = info.max_esverts * info.esvert_lds_dw + info.max_gsprims * info.gsprim_lds_dw;
        assert!(lds <= gpu.gfx_level.ngg_lds_budget());
        assert!(info.max_out_verts <= 256);
        assert!(info.max_gsprims <= 1 + (info.max_esverts - 1));
        // Prim-id export needs one LDS dword per ES thread.
        assert!(info.esvert_lds_dw >= 1);
        // Gfx10 under-reports the ES limit by verts_per_prim - 1.
        assert_eq!(info.hw_max_esverts, info.max_esverts - 2);
    }

    #[test]
    fn ngg_gs_respects_output_limit() {
        let gpu = GpuInfo::new(GfxLevel::Gfx10_3);
        let mut gs_stage = gs_info(2, 3, 16, 8);
        gs_stage.wave_size = 64;
        let link = LinkOutput {
            esgs_itemsize_dw: 16,
            vertices_per_prim: 3,
            input_adjacency: false,
        };
        let info = ngg_info(&gpu, &gs_stage, Some(&gs_stage), &link, 16, false).unwrap();
        assert!(info.max_out_verts <= 256);
        assert!(!info.max_vert_out_per_gs_instance);
        let lds = info.max_esverts * info.esvert_lds_dw + info.max_gsprims * info.gsprim_lds_dw;
        assert!(lds <= gpu.gfx_level.ngg_lds_budget());
        assert_eq!(info.hw_max_esverts, info.max_esverts);
    }

    #[test]
    fn ngg_gs_multi_cycle_mode() {
        let gpu = GpuInfo::new(GfxLevel::Gfx10_3);
        let mut gs_stage = gs_info(2, 3, 160, 4);
        gs_stage.wave_size = 64;
        // 2 * 160 = 320 > 256 forces one instance per subgroup.
        let link = LinkOutput {
            esgs_itemsize_dw: 4,
            vertices_per_prim: 3,
            input_adjacency: false,
        };
        let info = ngg_info(&gpu, &gs_stage, Some(&gs_stage), &link, 4, false).unwrap();
        assert!(info.max_vert_out_per_gs_instance);
        assert_eq!(info.max_gsprims, 1);
        assert_eq!(info.max_out_verts, 160);
    }

    #[test]
    fn mesh_uses_declared_limits() {
        let gpu = GpuInfo::new(GfxLevel::Gfx10_3);
        let mut mesh = ShaderInfo::new(ShaderStage::Mesh);
        mesh.mesh.max_vertices = 64;
        mesh.mesh.max_primitives = 126;
        mesh.workgroup_size = [128, 1, 1];
        let info = mesh_ngg_info(&gpu, &mesh);
        assert!(info.enable_vertex_grouping);
        assert_eq!(info.hw_max_esverts, 1);
        assert_eq!(info.max_out_verts, 64);
        assert_eq!(info.prim_amp_factor, 126);
        assert_eq!(info.workgroup_size, 128);
    }

    #[test]
    fn guardband_rules() {
        assert!(can_use_guardband(OutputPrim::TriangleStrip, false));
        assert!(!can_use_guardband(OutputPrim::TriangleStrip, true));
        assert!(!can_use_guardband(OutputPrim::Points, false));
        assert_eq!(
            tess_prim_to_output(TessDomain::Triangles, true),
            OutputPrim::TriangleStrip
        );
    }

}
