//! Compiled shaders: variant keys, the variant cache, stage linking and the
//! geometry solver.

pub mod cache;
pub mod geometry;
pub mod ir;
pub mod key;
pub mod linker;

use std::sync::Arc;

use crate::alloc::slab::CodeLocation;
use crate::alloc::traits::Allocator;
use crate::core::error::Error;
use crate::shader::ir::{
    BinaryModule, FsState, GsState, MeshState, NggState, OutputPrim, ShaderInfo, ShaderStage,
    SysValues, TessDomain, TessSpacing, TessState, XfbInfo,
};

/// A compiled shader variant: machine code living in an executable slab
/// plus the reflection the emitter needs. Reference-counted; the variant
/// cache holds weak references, so a module dies with its last pipeline.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct ShaderModule {
    info: ShaderInfo,
    location: CodeLocation,
    entry_offset: u32,
    num_sgprs: u32,
    num_vgprs: u32,
    lds_bytes: u32,
    scratch_bytes_per_wave: u32,
    wave_size: u32,
    #[derivative(Debug = "ignore")]
    allocator: Arc<dyn Allocator>,
}

impl ShaderModule {
    /// Place a compiled binary into the code heap.
    pub fn upload(
        allocator: Arc<dyn Allocator>,
        info: ShaderInfo,
        bin: &BinaryModule,
    ) -> Result<Arc<Self>, Error> {
        let location = allocator.alloc(bin.code.len().max(1) as u64)?;
        location.slab.upload(location.offset, &bin.code)?;
        Ok(Arc::new(Self {
            info,
            location,
            entry_offset: bin.entry_offset,
            num_sgprs: bin.num_sgprs,
            num_vgprs: bin.num_vgprs,
            lds_bytes: bin.lds_bytes,
            scratch_bytes_per_wave: bin.scratch_bytes_per_wave,
            wave_size: bin.wave_size,
            allocator,
        }))
    }

    pub fn info(&self) -> &ShaderInfo {
        &self.info
    }

    pub fn stage(&self) -> ShaderStage {
        self.info.stage
    }

    /// GPU virtual address of the entry point.
    pub fn entry_va(&self) -> u64 {
        self.location.gpu_va() + self.entry_offset as u64
    }

    pub fn code_size(&self) -> u64 {
        self.location.size
    }

    pub fn num_sgprs(&self) -> u32 {
        self.num_sgprs
    }

    pub fn num_vgprs(&self) -> u32 {
        self.num_vgprs
    }

    pub fn lds_bytes(&self) -> u32 {
        self.lds_bytes
    }

    pub fn scratch_bytes_per_wave(&self) -> u32 {
        self.scratch_bytes_per_wave
    }

    pub fn wave_size(&self) -> u32 {
        self.wave_size
    }

    /// Resource metadata as the back-end reported it.
    pub(crate) fn bin_meta(&self) -> BinaryModule {
        BinaryModule {
            code: Vec::new(),
            entry_offset: self.entry_offset,
            num_sgprs: self.num_sgprs,
            num_vgprs: self.num_vgprs,
            lds_bytes: self.lds_bytes,
            scratch_bytes_per_wave: self.scratch_bytes_per_wave,
            wave_size: self.wave_size,
        }
    }
}

impl Drop for ShaderModule {
    fn drop(&mut self) {
        self.allocator.free(&self.location);
    }
}

// ---------------------------------------------------------------------------
// Reflection serialization for the blob cache.

struct Writer(Vec<u8>);

impl Writer {
    fn u8(&mut self, v: u8) {
        self.0.push(v);
    }
    fn bool(&mut self, v: bool) {
        self.0.push(v as u8);
    }
    fn u32(&mut self, v: u32) {
        self.0.extend_from_slice(&v.to_le_bytes());
    }
    fn u64(&mut self, v: u64) {
        self.0.extend_from_slice(&v.to_le_bytes());
    }
}

struct Reader<'a> {
    bytes: &'a [u8],
    at: usize,
}

impl<'a> Reader<'a> {
    fn u8(&mut self) -> Option<u8> {
        let v = *self.bytes.get(self.at)?;
        self.at += 1;
        Some(v)
    }
    fn bool(&mut self) -> Option<bool> {
        Some(self.u8()? != 0)
    }
    fn u32(&mut self) -> Option<u32> {
        let v = u32::from_le_bytes(self.bytes.get(self.at..self.at + 4)?.try_into().ok()?);
        self.at += 4;
        Some(v)
    }
    fn u64(&mut self) -> Option<u64> {
        let v = u64::from_le_bytes(self.bytes.get(self.at..self.at + 8)?.try_into().ok()?);
        self.at += 8;
        Some(v)
    }
}

fn stage_to_u8(stage: ShaderStage) -> u8 {
    match stage {
        ShaderStage::Task => 0,
        ShaderStage::Vertex => 1,
        ShaderStage::TessCtrl => 2,
        ShaderStage::TessEval => 3,
        ShaderStage::Geometry => 4,
        ShaderStage::Mesh => 5,
        ShaderStage::Fragment => 6,
        ShaderStage::Compute => 7,
    }
}

fn stage_from_u8(v: u8) -> Option<ShaderStage> {
    Some(match v {
        0 => ShaderStage::Task,
        1 => ShaderStage::Vertex,
        2 => ShaderStage::TessCtrl,
        3 => ShaderStage::TessEval,
        4 => ShaderStage::Geometry,
        5 => ShaderStage::Mesh,
        6 => ShaderStage::Fragment,
        7 => ShaderStage::Compute,
        _ => return None,
    })
}

fn prim_to_u8(p: OutputPrim) -> u8 {
    match p {
        OutputPrim::Points => 0,
        OutputPrim::LineStrip => 1,
        OutputPrim::TriangleStrip => 2,
    }
}

fn prim_from_u8(v: u8) -> Option<OutputPrim> {
    Some(match v {
        0 => OutputPrim::Points,
        1 => OutputPrim::LineStrip,
        2 => OutputPrim::TriangleStrip,
        _ => return None,
    })
}

/// Serialize post-link reflection plus the binary's resource footprint.
pub(crate) fn serialize_reflection(info: &ShaderInfo, bin: &BinaryModule) -> Vec<u8> {
    let mut w = Writer(Vec::with_capacity(160));
    w.u8(stage_to_u8(info.stage));
    w.u64(info.inputs_read);
    w.u64(info.outputs_written);
    w.u64(info.per_primitive_outputs);
    w.u64(info.per_primitive_inputs);
    w.u32(info.sysvals.bits());
    w.u8(info.clip_dist_mask);
    w.u8(info.cull_dist_mask);
    w.bool(info.writes_memory);
    w.bool(info.entry_single_block);
    for d in info.workgroup_size {
        w.u32(d);
    }
    match &info.xfb {
        None => w.bool(false),
        Some(x) => {
            w.bool(true);
            w.u32(x.num_outputs);
            for s in x.buffer_strides {
                w.u32(s);
            }
        }
    }
    w.u32(info.gs.invocations);
    w.u32(info.gs.vertices_out);
    w.u32(info.gs.vertices_in);
    w.bool(info.gs.input_adjacency);
    w.u8(prim_to_u8(info.gs.output_prim));
    w.u32(info.gs.gsvs_vertex_dwords);
    w.u8(info.tess.domain as u8);
    w.u8(info.tess.spacing as u8);
    w.bool(info.tess.point_mode);
    w.bool(info.tess.ccw);
    w.u32(info.tess.tcs_vertices_out);
    w.bool(info.fs.early_fragment_tests);
    w.bool(info.fs.reads_sample_mask);
    w.bool(info.fs.uses_sample_shading);
    w.bool(info.fs.writes_z);
    w.bool(info.fs.writes_stencil);
    w.bool(info.fs.writes_sample_mask);
    w.bool(info.fs.can_discard);
    w.u32(info.fs.colors_written);
    w.bool(info.fs.dual_src_blend);
    w.u8(info.fs.input_clips_culls);
    w.u64(info.fs.flat_inputs);
    w.u64(info.fs.explicit_inputs);
    w.u64(info.fs.float16_inputs);
    w.u32(info.mesh.max_vertices);
    w.u32(info.mesh.max_primitives);
    w.u8(prim_to_u8(info.mesh.output_prim));
    for loc in info.driver_locations {
        w.u8(loc);
    }
    w.bool(info.ngg.is_ngg);
    w.bool(info.ngg.is_passthrough);
    w.bool(info.ngg.enable_culling);
    w.bool(info.ngg.early_prim_export);
    w.u32(info.wave_size);

    w.u32(bin.entry_offset);
    w.u32(bin.num_sgprs);
    w.u32(bin.num_vgprs);
    w.u32(bin.lds_bytes);
    w.u32(bin.scratch_bytes_per_wave);
    w.u32(bin.wave_size);
    w.0
}

/// Inverse of [`serialize_reflection`]. `None` on any truncation or bad tag;
/// the caller treats that as a cache miss.
pub(crate) fn deserialize_reflection(bytes: &[u8]) -> Option<(ShaderInfo, BinaryModule)> {
    let mut r = Reader { bytes, at: 0 };
    let stage = stage_from_u8(r.u8()?)?;
    let mut info = ShaderInfo::new(stage);
    info.inputs_read = r.u64()?;
    info.outputs_written = r.u64()?;
    info.per_primitive_outputs = r.u64()?;
    info.per_primitive_inputs = r.u64()?;
    info.sysvals = SysValues::from_bits_truncate(r.u32()?);
    info.clip_dist_mask = r.u8()?;
    info.cull_dist_mask = r.u8()?;
    info.writes_memory = r.bool()?;
    info.entry_single_block = r.bool()?;
    for d in &mut info.workgroup_size {
        *d = r.u32()?;
    }
    if r.bool()? {
        let num_outputs = r.u32()?;
        let mut buffer_strides = [0u32; 4];
        for s in &mut buffer_strides {
            *s = r.u32()?;
        }
        info.xfb = Some(XfbInfo {
            num_outputs,
            buffer_strides,
        });
    }
    info.gs = GsState {
        invocations: r.u32()?,
        vertices_out: r.u32()?,
        vertices_in: r.u32()?,
        input_adjacency: r.bool()?,
        output_prim: prim_from_u8(r.u8()?)?,
        gsvs_vertex_dwords: r.u32()?,
    };
    info.tess = TessState {
        domain: match r.u8()? {
            0 => TessDomain::Triangles,
            1 => TessDomain::Quads,
            2 => TessDomain::Isolines,
            _ => return None,
        },
        spacing: match r.u8()? {
            0 => TessSpacing::Equal,
            1 => TessSpacing::FractionalOdd,
            2 => TessSpacing::FractionalEven,
            _ => return None,
        },
        point_mode: r.bool()?,
        ccw: r.bool()?,
        tcs_vertices_out: r.u32()?,
    };
    info.fs = FsState {
        early_fragment_tests: r.bool()?,
        reads_sample_mask: r.bool()?,
        uses_sample_shading: r.bool()?,
        writes_z: r.bool()?,
        writes_stencil: r.bool()?,
        writes_sample_mask: r.bool()?,
        can_discard: r.bool()?,
        colors_written: r.u32()?,
        dual_src_blend: r.bool()?,
        input_clips_culls: r.u8()?,
        flat_inputs: r.u64()?,
        explicit_inputs: r.u64()?,
        float16_inputs: r.u64()?,
    };
    info.mesh = MeshState {
        max_vertices: r.u32()?,
        max_primitives: r.u32()?,
        output_prim: prim_from_u8(r.u8()?)?,
    };
    for loc in &mut info.driver_locations {
        *loc = r.u8()?;
    }
    info.ngg = NggState {
        is_ngg: r.bool()?,
        is_passthrough: r.bool()?,
        enable_culling: r.bool()?,
        early_prim_export: r.bool()?,
    };
    info.wave_size = r.u32()?;

    let bin = BinaryModule {
        code: Vec::new(),
        entry_offset: r.u32()?,
        num_sgprs: r.u32()?,
        num_vgprs: r.u32()?,
        lds_bytes: r.u32()?,
        scratch_bytes_per_wave: r.u32()?,
        wave_size: r.u32()?,
    };
    Some((info, bin))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shader::ir::slot;

    #[test]
    fn reflection_roundtrip() {
        let mut info = ShaderInfo::new(ShaderStage::Fragment);
        info.inputs_read = slot::mask(slot::var(0)) | slot::mask(slot::PRIM_ID);
        info.fs.colors_written = 0x3;
        info.fs.flat_inputs = slot::mask(slot::var(1));
        info.driver_locations[slot::var(0) as usize] = 2;
        info.wave_size = 64;
        let bin = BinaryModule {
            code: vec![1, 2, 3],
            entry_offset: 256,
            num_sgprs: 32,
            num_vgprs: 24,
            lds_bytes: 0,
            scratch_bytes_per_wave: 0,
            wave_size: 64,
        };
        let bytes = serialize_reflection(&info, &bin);
        let (info2, bin2) = deserialize_reflection(&bytes).unwrap();
        assert_eq!(info, info2);
        assert_eq!(bin.entry_offset, bin2.entry_offset);
        assert_eq!(bin.num_sgprs, bin2.num_sgprs);
        // Code bytes travel in the blob's code section, not here.
        assert!(bin2.code.is_empty());
    }

    #[test]
    fn truncated_reflection_is_rejected() {
        let info = ShaderInfo::new(ShaderStage::Vertex);
        let bin = BinaryModule {
            code: Vec::new(),
            entry_offset: 0,
            num_sgprs: 8,
            num_vgprs: 8,
            lds_bytes: 0,
            scratch_bytes_per_wave: 0,
            wave_size: 64,
        };
        let bytes = serialize_reflection(&info, &bin);
        assert!(deserialize_reflection(&bytes[..bytes.len() - 1]).is_none());
    }
}
