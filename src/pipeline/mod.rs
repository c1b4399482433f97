//! Pipeline objects and their assembly.
//!
//! [`PipelineAssembler`](crate::PipelineAssembler) turns a create info into
//! a [`Pipeline`]: reduced state, compiled shader modules and the two PM4
//! register streams. Pipelines share their shader modules with the variant
//! cache and exclusively own everything else.

pub mod assembler;
pub mod builder;
pub mod create_info;
pub mod hash;
pub mod shader_code;

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::emit::RegisterStreams;
use crate::shader::ir::ShaderStage;
use crate::shader::ShaderModule;
use crate::state::dynamic::DynamicStateMask;
use crate::state::ReducedState;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum PipelineKind {
    Graphics,
    Compute,
}

/// A fully built pipeline. Replaying [`Pipeline::context_stream`] and
/// [`Pipeline::config_stream`] programs every fixed-function unit the
/// pipeline relies on; the command recorder only adds draw-time state.
#[derive(Debug)]
pub struct Pipeline {
    pub(crate) kind: PipelineKind,
    pub(crate) name: String,
    pub(crate) modules: Vec<Arc<ShaderModule>>,
    pub(crate) streams: RegisterStreams,
    pub(crate) dynamic: DynamicStateMask,
    /// Reduced-state summaries the command recorder consults at draw time.
    pub(crate) state: ReducedState,
    pub(crate) binning_allowed: bool,
    pub(crate) layout_signature: u64,
}

impl Pipeline {
    pub fn kind(&self) -> PipelineKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn context_stream(&self) -> &[u32] {
        &self.streams.context
    }

    pub fn config_stream(&self) -> &[u32] {
        &self.streams.config
    }

    /// Stable hash of both register streams.
    pub fn stream_hash(&self) -> u64 {
        self.streams.content_hash()
    }

    pub fn dynamic_state(&self) -> &DynamicStateMask {
        &self.dynamic
    }

    pub fn reduced_state(&self) -> &ReducedState {
        &self.state
    }

    pub fn binning_allowed(&self) -> bool {
        self.binning_allowed
    }

    /// Compatibility signature for the descriptor binder: two pipelines
    /// with equal signatures bind the same resource interface.
    pub fn layout_signature(&self) -> u64 {
        self.layout_signature
    }

    pub fn shader(&self, stage: ShaderStage) -> Option<&Arc<ShaderModule>> {
        self.modules.iter().find(|m| m.stage() == stage)
    }

    pub fn shaders(&self) -> &[Arc<ShaderModule>] {
        &self.modules
    }
}

pub(crate) fn layout_signature_for(ids: &[[u8; 20]]) -> u64 {
    let mut h = DefaultHasher::new();
    for id in ids {
        id.hash(&mut h);
    }
    h.finish()
}
