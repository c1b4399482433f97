//! Shader variant keys.
//!
//! A key captures exactly the state bits that can change the machine code
//! the back-end emits for one stage, and nothing more. Two equal keys must
//! yield byte-identical binaries, and equality is decided on the canonical
//! byte serialization alone, without consulting shader source.

use sha1::{Digest, Sha1};

use crate::core::gpu_info::GpuInfo;
use crate::shader::ir::ShaderStage;

/// Key of a vertex-shader variant: everything the fetch prolog and the
/// position path specialize on.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VertexKey {
    pub dynamic_inputs: bool,
    pub instance_rate_mask: u32,
    pub nontrivial_divisors: u32,
    pub post_shuffle: u32,
    pub alpha_adjust_lo: u32,
    pub alpha_adjust_hi: u32,
    /// Raw format values per location; 0 when the location is unused.
    pub attribute_formats: [i32; 32],
    pub bindings: [u8; 32],
    pub offsets: [u32; 32],
    pub strides: [u32; 32],
    pub topology: u32,
    pub provoking_vertex_last: bool,
    pub is_last_vertex_stage: bool,
    pub push_draw_id: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TessCtrlKey {
    pub input_vertices_per_patch: u32,
    pub vs_outputs_written: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TessEvalKey {
    pub clip_half_z: bool,
    pub is_last_vertex_stage: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GeometryKey {
    pub clip_half_z: bool,
    pub is_last_vertex_stage: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MeshKey {
    pub clip_half_z: bool,
}

/// Key of a fragment-shader variant: export formats, sample state and the
/// small lowerings that change codegen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FragmentKey {
    pub samples: u32,
    pub log2_ps_iter_samples: u32,
    pub spi_shader_col_format: u32,
    pub cb_target_mask: u32,
    pub mrt0_dual_src: bool,
    pub is_int8: u32,
    pub is_int10: u32,
    /// Targets whose NaN outputs must be canonicalized before export.
    pub nan_fixup_mask: u32,
    /// Point-sprite texture-coordinate replacement, bit per location.
    pub coord_replace_bits: u32,
    pub coord_replace_y_inverted: bool,
    pub force_vrs: bool,
    pub lower_discard_to_demote: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ComputeKey {
    /// 0 means "no requirement".
    pub required_subgroup_size: u32,
    pub require_full_subgroups: bool,
}

/// Stage-specific variant key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VariantKey {
    Vertex(Box<VertexKey>),
    TessCtrl(TessCtrlKey),
    TessEval(TessEvalKey),
    Geometry(GeometryKey),
    Mesh(MeshKey),
    Fragment(FragmentKey),
    Compute(ComputeKey),
}

impl VariantKey {
    /// The canonical "no specialization" key for a stage. The cache keeps a
    /// fast path for modules compiled with it.
    pub fn default_for(stage: ShaderStage) -> Self {
        match stage {
            ShaderStage::Vertex => VariantKey::Vertex(Box::default()),
            ShaderStage::TessCtrl => VariantKey::TessCtrl(TessCtrlKey::default()),
            ShaderStage::TessEval => VariantKey::TessEval(TessEvalKey::default()),
            ShaderStage::Geometry => VariantKey::Geometry(GeometryKey::default()),
            ShaderStage::Mesh => VariantKey::Mesh(MeshKey::default()),
            ShaderStage::Fragment => VariantKey::Fragment(FragmentKey::default()),
            ShaderStage::Task | ShaderStage::Compute => VariantKey::Compute(ComputeKey::default()),
        }
    }

    fn tag(&self) -> u8 {
        match self {
            VariantKey::Vertex(_) => 0,
            VariantKey::TessCtrl(_) => 1,
            VariantKey::TessEval(_) => 2,
            VariantKey::Geometry(_) => 3,
            VariantKey::Mesh(_) => 4,
            VariantKey::Fragment(_) => 5,
            VariantKey::Compute(_) => 6,
        }
    }

    /// Canonical byte serialization. Key equality is byte equality of this.
    pub fn serialize(&self) -> Vec<u8> {
        let mut w = KeyWriter::new();
        w.u8(self.tag());
        match self {
            VariantKey::Vertex(k) => {
                w.bool(k.dynamic_inputs);
                w.u32(k.instance_rate_mask);
                w.u32(k.nontrivial_divisors);
                w.u32(k.post_shuffle);
                w.u32(k.alpha_adjust_lo);
                w.u32(k.alpha_adjust_hi);
                for f in &k.attribute_formats {
                    w.u32(*f as u32);
                }
                w.bytes(&k.bindings);
                for v in &k.offsets {
                    w.u32(*v);
                }
                for v in &k.strides {
                    w.u32(*v);
                }
                w.u32(k.topology);
                w.bool(k.provoking_vertex_last);
                w.bool(k.is_last_vertex_stage);
                w.bool(k.push_draw_id);
            }
            VariantKey::TessCtrl(k) => {
                w.u32(k.input_vertices_per_patch);
                w.u64(k.vs_outputs_written);
            }
            VariantKey::TessEval(k) => {
                w.bool(k.clip_half_z);
                w.bool(k.is_last_vertex_stage);
            }
            VariantKey::Geometry(k) => {
                w.bool(k.clip_half_z);
                w.bool(k.is_last_vertex_stage);
            }
            VariantKey::Mesh(k) => {
                w.bool(k.clip_half_z);
            }
            VariantKey::Fragment(k) => {
                w.u32(k.samples);
                w.u32(k.log2_ps_iter_samples);
                w.u32(k.spi_shader_col_format);
                w.u32(k.cb_target_mask);
                w.bool(k.mrt0_dual_src);
                w.u32(k.is_int8);
                w.u32(k.is_int10);
                w.u32(k.nan_fixup_mask);
                w.u32(k.coord_replace_bits);
                w.bool(k.coord_replace_y_inverted);
                w.bool(k.force_vrs);
                w.bool(k.lower_discard_to_demote);
            }
            VariantKey::Compute(k) => {
                w.u32(k.required_subgroup_size);
                w.bool(k.require_full_subgroups);
            }
        }
        w.finish()
    }

    /// Cache hash of (chip, shader id, key). 20 bytes, stable across
    /// processes; doubles as the blob-cache key.
    pub fn variant_hash(&self, gpu: &GpuInfo, shader_id: &[u8; 20]) -> [u8; 20] {
        let mut h = Sha1::new();
        h.update(shader_id);
        h.update([gpu.gfx_level as u8]);
        h.update((gpu.ps_wave_size as u8).to_le_bytes());
        h.update((gpu.ge_wave_size as u8).to_le_bytes());
        h.update((gpu.cs_wave_size as u8).to_le_bytes());
        h.update(self.serialize());
        h.finalize().into()
    }
}

/// Little-endian byte writer for canonical key encoding.
struct KeyWriter {
    buf: Vec<u8>,
}

impl KeyWriter {
    fn new() -> Self {
        Self { buf: Vec::with_capacity(64) }
    }

    fn u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    fn bool(&mut self, v: bool) {
        self.buf.push(v as u8);
    }

    fn u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn bytes(&mut self, v: &[u8]) {
        self.buf.extend_from_slice(v);
    }

    fn finish(self) -> Vec<u8> {
        self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::gpu_info::GfxLevel;

    #[test]
    fn serialization_distinguishes_stages() {
        let a = VariantKey::default_for(ShaderStage::Vertex);
        let b = VariantKey::default_for(ShaderStage::Fragment);
        assert_ne!(a.serialize(), b.serialize());
    }

    #[test]
    fn equal_keys_equal_bytes() {
        let mut k1 = FragmentKey::default();
        k1.samples = 4;
        let mut k2 = FragmentKey::default();
        k2.samples = 4;
        assert_eq!(
            VariantKey::Fragment(k1).serialize(),
            VariantKey::Fragment(k2).serialize()
        );
        k2.samples = 2;
        assert_ne!(
            VariantKey::Fragment(k1).serialize(),
            VariantKey::Fragment(k2).serialize()
        );
    }

    #[test]
    fn hash_covers_generation() {
        let key = VariantKey::default_for(ShaderStage::Vertex);
        let id = [7u8; 20];
        let a = key.variant_hash(&GpuInfo::new(GfxLevel::Gfx10_3), &id);
        let b = key.variant_hash(&GpuInfo::new(GfxLevel::Gfx11), &id);
        assert_ne!(a, b);
    }
}
