//! Description of the target chip.
//!
//! Deimos compiles for one [`GpuInfo`] at a time. The struct is a plain
//! description: wave widths, shader-engine layout and feature bits, with
//! defaults derived from the [`GfxLevel`] generation. Generation-specific
//! quirk constants live here as methods so the reducers and the register
//! emitter never compare raw generation numbers inline.

/// Hardware generation the pipeline is compiled for.
///
/// Ordering is meaningful: later generations compare greater than earlier
/// ones, which the quirk helpers below rely on.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum GfxLevel {
    /// Legacy geometry only; separate ES/GS/VS hardware stages.
    Gfx8,
    /// First generation with merged LS+HS and ES+GS stages.
    Gfx9,
    /// First NGG generation. Wave32 capable.
    Gfx10,
    /// NGG with fixed ES-vertex accounting, VRS, mesh shaders.
    Gfx10_3,
    /// NGG-only geometry; legacy paths removed.
    Gfx11,
}

impl GfxLevel {
    /// NGG (primitive-generator) geometry pipelines exist on this generation.
    pub fn has_ngg(self) -> bool {
        self >= GfxLevel::Gfx10
    }

    /// The legacy VS/ES/GS paths no longer exist; every vertex-like pipeline
    /// must run as NGG.
    pub fn ngg_required(self) -> bool {
        self >= GfxLevel::Gfx11
    }

    /// VS+TCS and ES+GS run as single merged hardware shaders.
    pub fn merged_shaders(self) -> bool {
        self >= GfxLevel::Gfx9
    }

    /// Streamout can run from an NGG shader. Before this, transform feedback
    /// forces the legacy path.
    pub fn has_ngg_streamout(self) -> bool {
        self >= GfxLevel::Gfx11
    }

    /// Minimum ES vertices per NGG subgroup the geometry engine accepts.
    pub fn ngg_min_esverts(self) -> u32 {
        if self >= GfxLevel::Gfx10_3 {
            29
        } else {
            24
        }
    }

    /// The geometry engine checks the ES vertex count only after allocating
    /// space for a full primitive, so the solver has to under-report the
    /// limit by `verts_per_prim - 1`.
    pub fn ngg_esverts_checked_late(self) -> bool {
        self == GfxLevel::Gfx10
    }

    /// LDS budget in dwords for an NGG subgroup. 768 dwords are reserved by
    /// the geometry engine itself.
    pub fn ngg_lds_budget(self) -> u32 {
        8192 - 768
    }

    /// LDS budget in dwords for an on-chip legacy GS subgroup.
    pub fn legacy_gs_lds_budget(self) -> u32 {
        8192
    }

    /// The primitive batch binner exists.
    pub fn has_pbb(self) -> bool {
        self >= GfxLevel::Gfx9
    }

    /// Variable-rate shading exists.
    pub fn has_vrs(self) -> bool {
        self >= GfxLevel::Gfx10_3
    }

    /// Mesh/task shading exists.
    pub fn has_mesh_shading(self) -> bool {
        self >= GfxLevel::Gfx10_3
    }

    /// Tessellation factors can be distributed across shader engines.
    pub fn has_distributed_tess(self) -> bool {
        self >= GfxLevel::Gfx9
    }

    /// Wave32 execution exists (GE/PS/CS can run 32-wide).
    pub fn has_wave32(self) -> bool {
        self >= GfxLevel::Gfx10
    }
}

/// Plain description of the chip deimos compiles for.
///
/// Constructed with per-generation defaults through [`GpuInfo::new`]; the
/// `with_*` methods override individual properties for chips that deviate
/// from the generation baseline.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct GpuInfo {
    pub gfx_level: GfxLevel,
    /// Wave width of pixel shaders.
    pub ps_wave_size: u32,
    /// Wave width of the geometry-engine stages (VS/TES/GS/NGG).
    pub ge_wave_size: u32,
    /// Wave width of compute (and task) shaders.
    pub cs_wave_size: u32,
    pub num_se: u32,
    pub num_rb_per_se: u32,
    /// Physical CUs/WGPs per SE, used for late-alloc and binning limits.
    pub num_cu_per_se: u32,
    /// RB+ (dual-quad color optimization) is present on the chip.
    pub has_rbplus: bool,
    /// RB+ is present and may actually be used.
    pub rbplus_allowed: bool,
    /// Out-of-order rasterization can be enabled.
    pub has_out_of_order_rast: bool,
    /// The binner may be enabled for this device (driconf can veto it).
    pub pbb_allowed: bool,
}

impl GpuInfo {
    /// Chip description with the generation's baseline properties.
    pub fn new(gfx_level: GfxLevel) -> Self {
        let wave32 = gfx_level.has_wave32();
        Self {
            gfx_level,
            ps_wave_size: 64,
            ge_wave_size: if wave32 { 32 } else { 64 },
            cs_wave_size: if wave32 { 32 } else { 64 },
            num_se: if gfx_level >= GfxLevel::Gfx10 { 2 } else { 4 },
            num_rb_per_se: 4,
            num_cu_per_se: 10,
            has_rbplus: gfx_level >= GfxLevel::Gfx9,
            rbplus_allowed: gfx_level >= GfxLevel::Gfx10_3,
            has_out_of_order_rast: gfx_level >= GfxLevel::Gfx8 && gfx_level < GfxLevel::Gfx11,
            pbb_allowed: gfx_level.has_pbb(),
        }
    }

    pub fn with_wave_sizes(mut self, ps: u32, ge: u32, cs: u32) -> Self {
        debug_assert!(ps == 32 || ps == 64);
        self.ps_wave_size = ps;
        self.ge_wave_size = ge;
        self.cs_wave_size = cs;
        self
    }

    pub fn with_shader_engines(mut self, num_se: u32, num_rb_per_se: u32, num_cu_per_se: u32) -> Self {
        self.num_se = num_se;
        self.num_rb_per_se = num_rb_per_se;
        self.num_cu_per_se = num_cu_per_se;
        self
    }

    pub fn with_rbplus(mut self, present: bool, allowed: bool) -> Self {
        self.has_rbplus = present;
        self.rbplus_allowed = present && allowed;
        self
    }

    pub fn with_pbb(mut self, allowed: bool) -> Self {
        self.pbb_allowed = allowed && self.gfx_level.has_pbb();
        self
    }

    /// Total render backends, used by the binning tables.
    pub fn num_rb(&self) -> u32 {
        self.num_se * self.num_rb_per_se
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generation_ordering() {
        assert!(GfxLevel::Gfx8 < GfxLevel::Gfx9);
        assert!(GfxLevel::Gfx10 < GfxLevel::Gfx10_3);
        assert!(GfxLevel::Gfx11.ngg_required());
        assert!(!GfxLevel::Gfx9.has_ngg());
    }

    #[test]
    fn ngg_quirks() {
        assert_eq!(GfxLevel::Gfx10.ngg_min_esverts(), 24);
        assert_eq!(GfxLevel::Gfx10_3.ngg_min_esverts(), 29);
        assert!(GfxLevel::Gfx10.ngg_esverts_checked_late());
        assert!(!GfxLevel::Gfx10_3.ngg_esverts_checked_late());
    }
}
