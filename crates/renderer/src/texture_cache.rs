//! Reference-counted GPU textures keyed by their MTL texture options.
//!
//! Materials that reference the same image with the same options share one
//! upload. The cache is created by the host next to the device and handed to
//! every material; [`TextureCache::clear`] tears it down with the context.

use std::{
    collections::HashMap,
    sync::Arc,
    thread::{self, ThreadId},
};

use asset::{TextureData, TextureOptions};
use parking_lot::Mutex;

use crate::{
    device::{GpuDevice, TextureId, TextureUpload},
    error::RenderError,
};

pub type SharedTextureCache = Arc<Mutex<TextureCache>>;

#[derive(Debug)]
struct CacheEntry {
    id: TextureId,
    refs: usize,
    owner: ThreadId,
}

#[derive(Debug, Default)]
pub struct TextureCache {
    entries: HashMap<TextureOptions, CacheEntry>,
}

impl TextureCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedTextureCache {
        Arc::new(Mutex::new(Self::new()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn ref_count(&self, options: &TextureOptions) -> usize {
        self.entries.get(options).map_or(0, |e| e.refs)
    }

    /// Resident texture for `options`, uploading `decode()`'s mip chain on
    /// first use. Entries uploaded by another thread are stale and get
    /// uploaded again.
    pub fn acquire<F>(
        &mut self,
        device: &mut dyn GpuDevice,
        options: &TextureOptions,
        decode: F,
    ) -> Result<TextureId, RenderError>
    where
        F: FnOnce() -> anyhow::Result<Vec<TextureData>>,
    {
        let current = thread::current().id();
        if let Some(entry) = self.entries.get_mut(options) {
            if entry.owner == current {
                entry.refs += 1;
                return Ok(entry.id);
            }
            log::warn!(
                "Texture {} was uploaded by another GL context; uploading again",
                options.path.display()
            );
        }

        let levels = decode().map_err(|source| RenderError::Texture {
            path: options.path.clone(),
            source,
        })?;
        let label = options.path.display().to_string();
        let id = device.create_texture(&TextureUpload {
            label: &label,
            levels: &levels,
            clamp: options.clamp,
        })?;
        if let Some(base) = levels.first() {
            log::info!(
                "Uploaded texture {} ({}x{}, {} levels)",
                label,
                base.width,
                base.height,
                levels.len()
            );
        }

        let refs = self.ref_count(options) + 1;
        self.entries.insert(
            options.clone(),
            CacheEntry {
                id,
                refs,
                owner: current,
            },
        );
        Ok(id)
    }

    /// Drop one reference; the last one destroys the texture.
    pub fn release(&mut self, device: &mut dyn GpuDevice, options: &TextureOptions) {
        if let Some(id) = self.drop_ref(options) {
            device.destroy_texture(id);
        }
    }

    /// Drop one reference without touching the device. Used when the
    /// context that owned the texture is gone.
    pub fn abandon(&mut self, options: &TextureOptions) {
        self.drop_ref(options);
    }

    /// Destroy every resident texture regardless of references.
    pub fn clear(&mut self, device: &mut dyn GpuDevice) {
        for (_, entry) in self.entries.drain() {
            device.destroy_texture(entry.id);
        }
    }

    fn drop_ref(&mut self, options: &TextureOptions) -> Option<TextureId> {
        let entry = self.entries.get_mut(options)?;
        entry.refs = entry.refs.saturating_sub(1);
        if entry.refs > 0 {
            return None;
        }
        self.entries.remove(options).map(|e| e.id)
    }
}
