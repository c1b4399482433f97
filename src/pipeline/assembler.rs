//! Top-level pipeline assembly.
//!
//! `create_*` is safe to call from any number of threads; within one call
//! the stages compile in parallel when the `rayon` feature is enabled.
//! Creation is all-or-nothing: on any failure every intermediate object is
//! released before the error is returned, and the creation feedback is
//! filled either way.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use ash::vk;
use static_assertions::assert_impl_all;

use crate::alloc::traits::Allocator;
use crate::blob::BlobCache;
use crate::core::error::Error;
use crate::core::gpu_info::GpuInfo;
use crate::emit::{self, GeometrySolution, GraphicsEmitInput, RegisterStreams};
use crate::pipeline::create_info::{
    ComputePipelineCreateInfo, GraphicsPipelineCreateInfo, PipelineFlags,
};
use crate::pipeline::{layout_signature_for, Pipeline, PipelineKind};
use crate::shader::cache::ShaderVariantCache;
use crate::shader::geometry;
use crate::shader::ir::{ShaderFrontend, ShaderBackend, ShaderIr, ShaderStage, SysValues};
use crate::shader::key::{
    ComputeKey, FragmentKey, GeometryKey, MeshKey, TessCtrlKey, TessEvalKey, VariantKey, VertexKey,
};
use crate::shader::linker::{self, LinkContext, LinkOutput};
use crate::shader::ShaderModule;
use crate::state::{blend, depth_stencil, dynamic, multisample, vertex_input, ReducedState};

/// Per-stage creation feedback.
#[derive(Debug, Clone, Default)]
pub struct StageFeedback {
    pub stage: Option<ShaderStage>,
    pub duration: Duration,
    pub cache_hit: bool,
}

/// Whole-pipeline creation feedback, filled on success and failure alike.
#[derive(Debug, Clone, Default)]
pub struct CreationFeedback {
    pub duration: Duration,
    /// Every stage came out of a cache; nothing was compiled.
    pub cache_hit: bool,
    pub stages: Vec<StageFeedback>,
}

/// Owns the shader variant cache and the external seams, and assembles
/// [`Pipeline`] objects.
pub struct PipelineAssembler {
    gpu: GpuInfo,
    frontend: Arc<dyn ShaderFrontend>,
    backend: Arc<dyn ShaderBackend>,
    allocator: Arc<dyn Allocator>,
    cache: ShaderVariantCache,
}

assert_impl_all!(PipelineAssembler: Send, Sync);
assert_impl_all!(Pipeline: Send, Sync);

struct CompileJob {
    stage: ShaderStage,
    id: [u8; 20],
    key: VariantKey,
    is_default: bool,
    ir: ShaderIr,
}

impl PipelineAssembler {
    pub fn new(
        gpu: GpuInfo,
        frontend: Arc<dyn ShaderFrontend>,
        backend: Arc<dyn ShaderBackend>,
        allocator: Arc<dyn Allocator>,
        blob: Option<Arc<dyn BlobCache>>,
    ) -> Self {
        Self {
            gpu,
            frontend,
            backend,
            allocator,
            cache: ShaderVariantCache::new(gpu, blob),
        }
    }

    pub fn gpu(&self) -> &GpuInfo {
        &self.gpu
    }

    pub fn cache(&self) -> &ShaderVariantCache {
        &self.cache
    }

    /// Create a graphics pipeline.
    pub fn create_graphics(&self, info: &GraphicsPipelineCreateInfo) -> Result<Pipeline> {
        let mut feedback = CreationFeedback::default();
        self.create_graphics_with_feedback(info, &mut feedback)
    }

    /// Create a graphics pipeline, filling `feedback` on both paths.
    pub fn create_graphics_with_feedback(
        &self,
        info: &GraphicsPipelineCreateInfo,
        feedback: &mut CreationFeedback,
    ) -> Result<Pipeline> {
        let start = Instant::now();
        let result = self.create_graphics_inner(info, feedback);
        feedback.duration = start.elapsed();
        feedback.cache_hit =
            !feedback.stages.is_empty() && feedback.stages.iter().all(|s| s.cache_hit);
        if let Err(err) = &result {
            debug!("pipeline `{}` creation failed: {err:#}", info.name());
        }
        result
    }

    /// Create a compute pipeline.
    pub fn create_compute(&self, info: &ComputePipelineCreateInfo) -> Result<Pipeline> {
        let mut feedback = CreationFeedback::default();
        self.create_compute_with_feedback(info, &mut feedback)
    }

    pub fn create_compute_with_feedback(
        &self,
        info: &ComputePipelineCreateInfo,
        feedback: &mut CreationFeedback,
    ) -> Result<Pipeline> {
        let start = Instant::now();
        let result = self.create_compute_inner(info, feedback);
        feedback.duration = start.elapsed();
        feedback.cache_hit =
            !feedback.stages.is_empty() && feedback.stages.iter().all(|s| s.cache_hit);
        result
    }

    fn create_graphics_inner(
        &self,
        info: &GraphicsPipelineCreateInfo,
        feedback: &mut CreationFeedback,
    ) -> Result<Pipeline> {
        // Sort stages into pipeline order and validate the combination.
        let mut stages: Vec<(ShaderStage, &crate::pipeline::shader_code::ShaderCode)> = info
            .shaders
            .iter()
            .map(|code| {
                ShaderStage::from_vk(code.stage())
                    .ok_or(Error::InvalidStageCombination("unknown stage kind"))
                    .map(|s| (s, code))
            })
            .collect::<std::result::Result<_, _>>()?;
        stages.sort_by_key(|(s, _)| *s);
        for pair in stages.windows(2) {
            if pair[0].0 == pair[1].0 {
                return Err(Error::InvalidStageCombination("duplicate stage kind").into());
            }
        }
        if stages.iter().any(|(s, _)| *s == ShaderStage::Compute) {
            return Err(
                Error::InvalidStageCombination("compute stage in a graphics pipeline").into(),
            );
        }
        if !stages.iter().any(|(s, _)| s.is_vertex_like()) {
            return Err(Error::InvalidStageCombination("no vertex-like stage").into());
        }
        let has_mesh = stages.iter().any(|(s, _)| *s == ShaderStage::Mesh);

        // Color formats without a hardware encoding are masked out by the
        // blend reducer, but a bad depth/stencil format cannot be hidden.
        for fmt in [
            info.rendering_info.depth_format,
            info.rendering_info.stencil_format,
        ]
        .into_iter()
        .flatten()
        {
            if !crate::format::is_depth_format(fmt) {
                return Err(Error::UnsupportedFormat(fmt).into());
            }
        }

        // Reduce the fixed-function state.
        let reduced = ReducedState {
            blend: blend::reduce(&self.gpu, &info.blend, &info.multisample, &info.rendering_info),
            depth_stencil: depth_stencil::reduce(
                &info.depth_stencil,
                &info.rasterization,
                &info.rendering_info,
            ),
            multisample: multisample::reduce(&self.gpu, &info.multisample, &info.rasterization),
            vertex_input: vertex_input::reduce(
                &info.vertex_bindings,
                &info.vertex_attributes,
                info.has_dynamic_state(vk::DynamicState::VERTEX_INPUT_EXT),
            ),
        };

        // Lower every stage to its IR summary and link. The front-end is
        // deterministic and cheap next to code generation, so it also runs
        // for pipelines that will be served entirely from the cache.
        let mut irs: Vec<ShaderIr> = Vec::with_capacity(stages.len());
        for (stage, code) in &stages {
            irs.push(self.frontend.spirv_to_ir(
                *stage,
                code.code(),
                code.entry(),
                code.spec_constants(),
            )?);
        }

        let link_ctx = LinkContext {
            gpu: self.gpu,
            topology: info.input_assembly.topology,
            view_mask: info.rendering_info.view_mask,
            spi_shader_col_format: reduced.blend.spi_shader_col_format,
            cb_target_mask: reduced.blend.cb_target_mask,
            mrt0_dual_src: reduced.blend.mrt0_is_dual_src,
        };
        let link = linker::link_graphics(&link_ctx, &mut irs)?;

        let geometry = self.solve_geometry(&irs, &link)?;

        // Build the per-stage variant keys and compile what is missing.
        let last_vtx = stages
            .iter()
            .rev()
            .find(|(s, _)| s.is_vertex_like())
            .map(|(s, _)| *s);
        let keys: Vec<VariantKey> = (0..stages.len())
            .map(|i| self.build_graphics_key(info, &reduced, &irs, i, last_vtx))
            .collect();
        let jobs: Vec<CompileJob> = stages
            .iter()
            .zip(irs)
            .zip(keys)
            .map(|(((stage, code), ir), key)| CompileJob {
                stage: *stage,
                id: code.id(),
                is_default: key == VariantKey::default_for(*stage),
                key,
                ir,
            })
            .collect();

        let modules = self.compile_jobs(&jobs, info.flags, feedback)?;

        let dynamic = dynamic::resolve(info, has_mesh);

        let fs = modules
            .iter()
            .find(|m| m.stage() == ShaderStage::Fragment)
            .map(|m| m.info().clone());
        let out_of_order = depth_stencil::out_of_order_rast_ok(
            &self.gpu,
            &reduced.depth_stencil,
            &reduced.blend,
            info.blend.logic_op_enable,
            info.rasterization.order_relaxed,
            fs.as_ref().map(|f| f.writes_memory).unwrap_or(false),
            fs.as_ref().map(|f| f.fs.early_fragment_tests).unwrap_or(false),
        );

        let emit_input = GraphicsEmitInput {
            gpu: &self.gpu,
            state: &reduced,
            create_info: info,
            modules: &modules,
            link: &link,
            geometry: &geometry,
            out_of_order_rast: out_of_order,
        };
        let streams = emit::emit_graphics(&emit_input)?;
        let binning_allowed = emit::binning_decision(&emit_input).is_some();

        let ids: Vec<[u8; 20]> = jobs.iter().map(|j| j.id).collect();
        Ok(Pipeline {
            kind: PipelineKind::Graphics,
            name: info.name().to_owned(),
            modules,
            streams,
            dynamic,
            state: reduced,
            binning_allowed,
            layout_signature: layout_signature_for(&ids),
        })
    }

    fn create_compute_inner(
        &self,
        info: &ComputePipelineCreateInfo,
        feedback: &mut CreationFeedback,
    ) -> Result<Pipeline> {
        let code = info
            .shader
            .as_ref()
            .ok_or(Error::InvalidStageCombination("compute pipeline without a shader"))?;
        let stage = ShaderStage::from_vk(code.stage())
            .filter(|s| *s == ShaderStage::Compute)
            .ok_or(Error::InvalidStageCombination("compute pipeline needs a compute shader"))?;

        let mut ir =
            self.frontend
                .spirv_to_ir(stage, code.code(), code.entry(), code.spec_constants())?;
        linker::link_compute(
            &self.gpu,
            &mut ir,
            info.required_subgroup_size,
            info.require_full_subgroups,
        );

        let key = VariantKey::Compute(ComputeKey {
            required_subgroup_size: info.required_subgroup_size.unwrap_or(0),
            require_full_subgroups: info.require_full_subgroups,
        });
        let jobs = vec![CompileJob {
            stage,
            id: code.id(),
            is_default: key == VariantKey::default_for(stage),
            key,
            ir,
        }];
        let modules = self.compile_jobs(&jobs, info.flags, feedback)?;

        let streams: RegisterStreams = emit::emit_compute(&self.gpu, &modules[0])?;
        let ids = [code.id()];
        Ok(Pipeline {
            kind: PipelineKind::Compute,
            name: info.name().to_owned(),
            modules,
            streams,
            dynamic: Default::default(),
            state: ReducedState::default(),
            binning_allowed: false,
            layout_signature: layout_signature_for(&ids),
        })
    }

    /// Compile (or fetch) every job, preserving order. Any failure releases
    /// the modules already produced.
    fn compile_jobs(
        &self,
        jobs: &[CompileJob],
        flags: PipelineFlags,
        feedback: &mut CreationFeedback,
    ) -> Result<Vec<Arc<ShaderModule>>> {
        let fail_on_miss = flags.contains(PipelineFlags::FAIL_ON_CACHE_MISS);
        let skip_blob = flags.contains(PipelineFlags::SKIP_BLOB_CACHE);

        let compile_one = |job: &CompileJob| -> std::result::Result<(Arc<ShaderModule>, bool, Duration), Error> {
            let t0 = Instant::now();
            let (module, hit) = self.cache.get_or_create(
                &job.id,
                &job.key,
                job.is_default,
                fail_on_miss,
                skip_blob,
                &self.allocator,
                || {
                    let bin = self.backend.ir_to_binary(&job.ir, &job.key, &self.gpu)?;
                    Ok((job.ir.info.clone(), bin))
                },
            )?;
            Ok((module, hit, t0.elapsed()))
        };

        #[cfg(feature = "rayon")]
        let results: Vec<_> = {
            use rayon::prelude::*;
            jobs.par_iter().map(compile_one).collect()
        };
        #[cfg(not(feature = "rayon"))]
        let results: Vec<_> = jobs.iter().map(compile_one).collect();

        let mut modules = Vec::with_capacity(jobs.len());
        let mut first_err = None;
        for (job, result) in jobs.iter().zip(results) {
            match result {
                Ok((module, hit, duration)) => {
                    feedback.stages.push(StageFeedback {
                        stage: Some(job.stage),
                        duration,
                        cache_hit: hit,
                    });
                    modules.push(module);
                }
                Err(err) => {
                    feedback.stages.push(StageFeedback {
                        stage: Some(job.stage),
                        duration: Duration::ZERO,
                        cache_hit: false,
                    });
                    first_err.get_or_insert(err);
                }
            }
        }
        match first_err {
            // Dropping `modules` releases every allocation made so far.
            Some(err) => Err(err.into()),
            None => Ok(modules),
        }
    }

    fn solve_geometry(
        &self,
        irs: &[ShaderIr],
        link: &LinkOutput,
    ) -> std::result::Result<GeometrySolution, Error> {
        let find = |stage: ShaderStage| irs.iter().find(|ir| ir.info.stage == stage);
        if let Some(mesh) = find(ShaderStage::Mesh) {
            return Ok(GeometrySolution::Ngg(geometry::mesh_ngg_info(
                &self.gpu, &mesh.info,
            )));
        }
        let last = irs
            .iter()
            .rev()
            .find(|ir| ir.info.stage.is_vertex_like())
            .ok_or(Error::InvalidStageCombination("no vertex-like stage"))?;
        let gs = find(ShaderStage::Geometry);
        if last.info.ngg.is_ngg {
            let ngg = geometry::ngg_info(
                &self.gpu,
                &last.info,
                gs.map(|g| &g.info),
                link,
                link.esgs_itemsize_dw,
                last.info.writes(crate::shader::ir::slot::PRIM_ID),
            )?;
            Ok(GeometrySolution::Ngg(ngg))
        } else if let Some(gs) = gs {
            Ok(GeometrySolution::Legacy(geometry::legacy_gs_info(
                &self.gpu,
                &gs.info,
                link.esgs_itemsize_dw,
            )))
        } else {
            Ok(GeometrySolution::VertexOnly)
        }
    }

    fn build_graphics_key(
        &self,
        info: &GraphicsPipelineCreateInfo,
        reduced: &ReducedState,
        irs: &[ShaderIr],
        index: usize,
        last_vtx: Option<ShaderStage>,
    ) -> VariantKey {
        let ir = &irs[index];
        let stage = ir.info.stage;
        let is_last = Some(stage) == last_vtx;
        match stage {
            ShaderStage::Vertex => {
                let vi = &reduced.vertex_input;
                let mut key = VertexKey {
                    dynamic_inputs: vi.dynamic,
                    instance_rate_mask: vi.instance_rate_inputs,
                    nontrivial_divisors: vi.nontrivial_divisors,
                    post_shuffle: vi.post_shuffle,
                    alpha_adjust_lo: vi.alpha_adjust_lo,
                    alpha_adjust_hi: vi.alpha_adjust_hi,
                    attribute_formats: [0; 32],
                    bindings: vi.bindings,
                    offsets: vi.offsets,
                    strides: vi.strides,
                    topology: info.input_assembly.topology.as_raw() as u32,
                    provoking_vertex_last: info.rasterization.provoking_vertex_last,
                    is_last_vertex_stage: is_last,
                    push_draw_id: ir.info.sysvals.contains(SysValues::DRAW_ID),
                };
                for (i, f) in vi.formats.iter().enumerate() {
                    key.attribute_formats[i] = f.as_raw();
                }
                VariantKey::Vertex(Box::new(key))
            }
            ShaderStage::TessCtrl => VariantKey::TessCtrl(TessCtrlKey {
                input_vertices_per_patch: info
                    .tessellation
                    .map(|t| t.patch_control_points)
                    .unwrap_or(0),
                vs_outputs_written: irs
                    .iter()
                    .find(|i| i.info.stage == ShaderStage::Vertex)
                    .map(|i| i.info.outputs_written)
                    .unwrap_or(0),
            }),
            ShaderStage::TessEval => VariantKey::TessEval(TessEvalKey {
                clip_half_z: true,
                is_last_vertex_stage: is_last,
            }),
            ShaderStage::Geometry => VariantKey::Geometry(GeometryKey {
                clip_half_z: true,
                is_last_vertex_stage: is_last,
            }),
            ShaderStage::Mesh => VariantKey::Mesh(MeshKey { clip_half_z: true }),
            ShaderStage::Fragment => {
                let blend = &reduced.blend;
                let ms = &reduced.multisample;
                VariantKey::Fragment(FragmentKey {
                    samples: ms.num_samples,
                    log2_ps_iter_samples: ms.ps_iter_samples.trailing_zeros(),
                    spi_shader_col_format: blend.spi_shader_col_format,
                    cb_target_mask: blend.cb_target_mask,
                    mrt0_dual_src: blend.mrt0_is_dual_src,
                    is_int8: blend.col_format_is_int8,
                    is_int10: blend.col_format_is_int10,
                    nan_fixup_mask: 0,
                    coord_replace_bits: 0,
                    coord_replace_y_inverted: false,
                    force_vrs: false,
                    lower_discard_to_demote: false,
                })
            }
            ShaderStage::Task | ShaderStage::Compute => VariantKey::Compute(ComputeKey::default()),
        }
    }
}
