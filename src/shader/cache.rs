//! The shader variant cache.
//!
//! Maps (shader id, variant key) to compiled modules. Lookups for the same
//! key are single-flighted: exactly one caller compiles, the rest block on
//! the entry's condition variable and receive the shared module. Different
//! keys compile concurrently. The cache holds weak references, so a module
//! is destroyed once the last pipeline using it is gone; the per-stage
//! default variant is the exception and is pinned for the cache lifetime.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, OnceLock, RwLock, Weak};

use crate::alloc::traits::Allocator;
use crate::blob::{self, BlobCache};
use crate::core::error::Error;
use crate::core::gpu_info::GpuInfo;
use crate::shader::ir::{BinaryModule, ShaderInfo};
use crate::shader::key::VariantKey;
use crate::shader::{deserialize_reflection, serialize_reflection, ShaderModule};

enum VariantSlot {
    /// A compilation is in flight; wait on the entry's condvar.
    Building,
    Ready(Weak<ShaderModule>),
}

struct ShaderEntry {
    /// Fast path for the canonical no-specialization variant. Install-once
    /// gives the release/acquire ordering readers need.
    default_variant: OnceLock<Arc<ShaderModule>>,
    variants: Mutex<HashMap<[u8; 20], VariantSlot>>,
    build_done: Condvar,
}

impl ShaderEntry {
    fn new() -> Self {
        Self {
            default_variant: OnceLock::new(),
            variants: Mutex::new(HashMap::new()),
            build_done: Condvar::new(),
        }
    }
}

/// See the module documentation.
pub struct ShaderVariantCache {
    gpu: GpuInfo,
    shaders: RwLock<HashMap<[u8; 20], Arc<ShaderEntry>>>,
    blob: Option<Arc<dyn BlobCache>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ShaderVariantCache {
    pub fn new(gpu: GpuInfo, blob: Option<Arc<dyn BlobCache>>) -> Self {
        Self {
            gpu,
            shaders: RwLock::new(HashMap::new()),
            blob,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    fn entry(&self, shader_id: &[u8; 20]) -> Result<Arc<ShaderEntry>, Error> {
        if let Some(entry) = self.shaders.read()?.get(shader_id) {
            return Ok(entry.clone());
        }
        let mut shaders = self.shaders.write()?;
        Ok(shaders
            .entry(*shader_id)
            .or_insert_with(|| Arc::new(ShaderEntry::new()))
            .clone())
    }

    /// Probe without compiling. Returns the module on a live hit.
    pub fn probe(
        &self,
        shader_id: &[u8; 20],
        key: &VariantKey,
        is_default: bool,
    ) -> Result<Option<Arc<ShaderModule>>, Error> {
        let entry = self.entry(shader_id)?;
        if is_default {
            if let Some(module) = entry.default_variant.get() {
                return Ok(Some(module.clone()));
            }
        }
        let hash = key.variant_hash(&self.gpu, shader_id);
        let variants = entry.variants.lock()?;
        if let Some(VariantSlot::Ready(weak)) = variants.get(&hash) {
            return Ok(weak.upgrade());
        }
        Ok(None)
    }

    /// Look up a variant, compiling it through `compile` on a miss.
    ///
    /// Returns the module and whether it came from a cache (in-memory or
    /// blob). With `fail_on_miss` a miss returns `Error::CompileRequired`
    /// without invoking `compile` and without claiming the slot.
    pub fn get_or_create(
        &self,
        shader_id: &[u8; 20],
        key: &VariantKey,
        is_default: bool,
        fail_on_miss: bool,
        skip_blob: bool,
        allocator: &Arc<dyn Allocator>,
        compile: impl FnOnce() -> Result<(ShaderInfo, BinaryModule), Error>,
    ) -> Result<(Arc<ShaderModule>, bool), Error> {
        let entry = self.entry(shader_id)?;

        // Default-variant fast path.
        if is_default {
            if let Some(module) = entry.default_variant.get() {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Ok((module.clone(), true));
            }
        }

        let hash = key.variant_hash(&self.gpu, shader_id);

        // Claim the slot or wait for whoever holds it.
        {
            enum Slot {
                Ready(Weak<ShaderModule>),
                Busy,
                Vacant,
            }
            let mut variants = entry.variants.lock()?;
            loop {
                let slot = match variants.get(&hash) {
                    Some(VariantSlot::Ready(weak)) => Slot::Ready(weak.clone()),
                    Some(VariantSlot::Building) => Slot::Busy,
                    None => Slot::Vacant,
                };
                match slot {
                    Slot::Ready(weak) => {
                        if let Some(module) = weak.upgrade() {
                            self.hits.fetch_add(1, Ordering::Relaxed);
                            return Ok((module, true));
                        }
                        // The last holder dropped it; rebuild.
                        variants.insert(hash, VariantSlot::Building);
                        break;
                    }
                    Slot::Busy => {
                        variants = entry.build_done.wait(variants)?;
                    }
                    Slot::Vacant => {
                        if fail_on_miss && (skip_blob || !self.blob_has(&hash)) {
                            return Err(Error::CompileRequired);
                        }
                        variants.insert(hash, VariantSlot::Building);
                        break;
                    }
                }
            }
        }

        let built = self.build_variant(&hash, skip_blob, allocator, compile);

        let mut variants = entry.variants.lock()?;
        match built {
            Ok((module, from_blob)) => {
                variants.insert(hash, VariantSlot::Ready(Arc::downgrade(&module)));
                drop(variants);
                entry.build_done.notify_all();
                if is_default {
                    // Keep the default pinned; later pipelines skip hashing.
                    let _ = entry.default_variant.set(module.clone());
                }
                if from_blob {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                } else {
                    self.misses.fetch_add(1, Ordering::Relaxed);
                }
                Ok((module, from_blob))
            }
            Err(err) => {
                variants.remove(&hash);
                drop(variants);
                entry.build_done.notify_all();
                Err(err)
            }
        }
    }

    fn blob_has(&self, hash: &[u8; 20]) -> bool {
        self.blob
            .as_deref()
            .and_then(|b| b.get(hash))
            .and_then(|bytes| blob::decode_entry(&bytes))
            .is_some()
    }

    fn build_variant(
        &self,
        hash: &[u8; 20],
        skip_blob: bool,
        allocator: &Arc<dyn Allocator>,
        compile: impl FnOnce() -> Result<(ShaderInfo, BinaryModule), Error>,
    ) -> Result<(Arc<ShaderModule>, bool), Error> {
        if !skip_blob {
            if let Some(blob) = self.blob.as_deref() {
                if let Some((info, bin)) = blob
                    .get(hash)
                    .and_then(|bytes| blob::decode_entry(&bytes))
                    .and_then(|(reflection, code)| {
                        deserialize_reflection(&reflection).map(|(info, mut bin)| {
                            bin.code = code;
                            (info, bin)
                        })
                    })
                {
                    trace!("shader variant {:02x?}… restored from blob cache", &hash[..4]);
                    let module = ShaderModule::upload(allocator.clone(), info, &bin)?;
                    return Ok((module, true));
                }
            }
        }

        trace!("shader variant {:02x?}… compiling", &hash[..4]);
        let (info, bin) = compile()?;
        let module = ShaderModule::upload(allocator.clone(), info.clone(), &bin)?;
        if !skip_blob {
            if let Some(blob) = self.blob.as_deref() {
                let entry = blob::encode_entry(&serialize_reflection(&info, &bin), &bin.code);
                blob.put(hash, &entry);
            }
        }
        Ok((module, false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc::slab::SlabAllocator;
    use crate::blob::MemoryBlobCache;
    use crate::core::gpu_info::GfxLevel;
    use crate::shader::ir::ShaderStage;

    fn test_bin() -> BinaryModule {
        BinaryModule {
            code: vec![0xde, 0xad, 0xbe, 0xef],
            entry_offset: 0,
            num_sgprs: 16,
            num_vgprs: 8,
            lds_bytes: 0,
            scratch_bytes_per_wave: 0,
            wave_size: 64,
        }
    }

    fn harness() -> (ShaderVariantCache, Arc<dyn Allocator>) {
        let cache = ShaderVariantCache::new(GpuInfo::new(GfxLevel::Gfx10_3), None);
        let allocator: Arc<dyn Allocator> = Arc::new(SlabAllocator::new(64 * 1024));
        (cache, allocator)
    }

    #[test]
    fn second_lookup_hits() {
        let (cache, allocator) = harness();
        let id = [1u8; 20];
        let key = VariantKey::default_for(ShaderStage::Vertex);
        let (a, hit_a) = cache
            .get_or_create(&id, &key, true, false, true, &allocator, || {
                Ok((ShaderInfo::new(ShaderStage::Vertex), test_bin()))
            })
            .unwrap();
        assert!(!hit_a);
        let (b, hit_b) = cache
            .get_or_create(&id, &key, true, false, true, &allocator, || {
                panic!("must not recompile")
            })
            .unwrap();
        assert!(hit_b);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.hits(), 1);
        assert_eq!(cache.misses(), 1);
    }

    #[test]
    fn fail_on_miss_does_not_compile() {
        let (cache, allocator) = harness();
        let id = [2u8; 20];
        let key = VariantKey::default_for(ShaderStage::Fragment);
        let r = cache.get_or_create(&id, &key, true, true, true, &allocator, || {
            panic!("compile forbidden")
        });
        assert!(matches!(r, Err(Error::CompileRequired)));
        // The failed lookup must not leave a claimed slot behind.
        let r = cache.get_or_create(&id, &key, true, false, true, &allocator, || {
            Ok((ShaderInfo::new(ShaderStage::Fragment), test_bin()))
        });
        assert!(r.is_ok());
    }

    #[test]
    fn blob_cache_restores_across_instances() {
        let blob: Arc<MemoryBlobCache> = Arc::new(MemoryBlobCache::default());
        let allocator: Arc<dyn Allocator> = Arc::new(SlabAllocator::new(64 * 1024));
        let gpu = GpuInfo::new(GfxLevel::Gfx10_3);
        let id = [3u8; 20];
        let key = VariantKey::default_for(ShaderStage::Compute);

        let cache = ShaderVariantCache::new(gpu, Some(blob.clone()));
        cache
            .get_or_create(&id, &key, true, false, false, &allocator, || {
                Ok((ShaderInfo::new(ShaderStage::Compute), test_bin()))
            })
            .unwrap();
        assert_eq!(blob.len(), 1);

        // A fresh cache with the same blob store must not recompile.
        let cache2 = ShaderVariantCache::new(gpu, Some(blob));
        let (_, hit) = cache2
            .get_or_create(&id, &key, true, false, false, &allocator, || {
                panic!("must restore from blob")
            })
            .unwrap();
        assert!(hit);
    }

    #[test]
    fn dead_variants_are_rebuilt() {
        let (cache, allocator) = harness();
        let id = [4u8; 20];
        // Non-default keys are held weakly.
        let key = VariantKey::Compute(crate::shader::key::ComputeKey {
            required_subgroup_size: 32,
            require_full_subgroups: false,
        });
        let (a, _) = cache
            .get_or_create(&id, &key, false, false, true, &allocator, || {
                Ok((ShaderInfo::new(ShaderStage::Compute), test_bin()))
            })
            .unwrap();
        drop(a);
        let rebuilt = std::cell::Cell::new(false);
        let _ = cache
            .get_or_create(&id, &key, false, false, true, &allocator, || {
                rebuilt.set(true);
                Ok((ShaderInfo::new(ShaderStage::Compute), test_bin()))
            })
            .unwrap();
        assert!(rebuilt.get());
    }
}
