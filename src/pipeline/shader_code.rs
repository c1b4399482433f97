//! Shader source descriptions attached to pipeline create infos.

use ash::vk;
use sha1::{Digest, Sha1};

/// SPIR-V for one pipeline stage, plus entry point and specialization
/// constants. Content-addressable: two `ShaderCode`s with the same bytes,
/// entry and specialization map share an id and therefore share every
/// compiled variant.
#[derive(Debug, Clone)]
pub struct ShaderCode {
    stage: vk::ShaderStageFlags,
    code: Vec<u32>,
    entry: String,
    /// (constant id, raw value), kept sorted so the id is canonical.
    spec_constants: Vec<(u32, u32)>,
    id: [u8; 20],
}

impl ShaderCode {
    /// Wrap a SPIR-V binary. The entry point defaults to `main`.
    pub fn from_spirv(stage: vk::ShaderStageFlags, code: Vec<u32>) -> Self {
        let mut this = Self {
            stage,
            code,
            entry: String::from("main"),
            spec_constants: Vec::new(),
            id: [0; 20],
        };
        this.rehash();
        this
    }

    /// Select a different entry point.
    pub fn with_entry(mut self, entry: impl Into<String>) -> Self {
        self.entry = entry.into();
        self.rehash();
        self
    }

    /// Set a specialization constant. Values are raw 32-bit patterns.
    pub fn specialize(mut self, constant_id: u32, value: u32) -> Self {
        match self.spec_constants.binary_search_by_key(&constant_id, |e| e.0) {
            Ok(i) => self.spec_constants[i].1 = value,
            Err(i) => self.spec_constants.insert(i, (constant_id, value)),
        }
        self.rehash();
        self
    }

    fn rehash(&mut self) {
        let mut h = Sha1::new();
        for dw in &self.code {
            h.update(dw.to_le_bytes());
        }
        h.update([0u8]);
        h.update(self.entry.as_bytes());
        h.update([0u8]);
        for (id, value) in &self.spec_constants {
            h.update(id.to_le_bytes());
            h.update(value.to_le_bytes());
        }
        self.id = h.finalize().into();
    }

    pub fn stage(&self) -> vk::ShaderStageFlags {
        self.stage
    }

    pub fn code(&self) -> &[u32] {
        &self.code
    }

    pub fn entry(&self) -> &str {
        &self.entry
    }

    pub fn spec_constants(&self) -> &[(u32, u32)] {
        &self.spec_constants
    }

    /// Content id: SHA-1 over (bytes, entry, specialization map).
    pub fn id(&self) -> [u8; 20] {
        self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_covers_code_entry_and_spec() {
        let a = ShaderCode::from_spirv(vk::ShaderStageFlags::VERTEX, vec![1, 2, 3]);
        let b = ShaderCode::from_spirv(vk::ShaderStageFlags::VERTEX, vec![1, 2, 3]);
        assert_eq!(a.id(), b.id());

        let c = b.clone().with_entry("other");
        assert_ne!(a.id(), c.id());

        let d = a.clone().specialize(0, 7);
        assert_ne!(a.id(), d.id());
        // Specialization order does not matter.
        let e1 = a.clone().specialize(1, 1).specialize(2, 2);
        let e2 = a.clone().specialize(2, 2).specialize(1, 1);
        assert_eq!(e1.id(), e2.id());
    }
}
