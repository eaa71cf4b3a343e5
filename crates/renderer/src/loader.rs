//! Background OBJ loading. Parsing, partitioning and texture decoding run on
//! a worker thread; the finished [`ObjRenderer`] (or the reason there is
//! none) is announced over a channel that the GL thread polls.

use std::{
    io,
    path::{Path, PathBuf},
    sync::Arc,
    thread,
    time::Duration,
};

use asset::{MaterialTable, load_mtl_from_path, load_obj_from_path, partition_scene};
use crossbeam::channel::{Receiver, RecvTimeoutError, Sender, unbounded};

use crate::{
    config::IlluminationPolicy,
    error::LoadError,
    object::ObjRenderer,
    shader::ShaderLibrary,
    texture_cache::SharedTextureCache,
};

/// Outcome of one load request.
#[derive(Debug)]
pub struct LoadedAsset {
    pub path: PathBuf,
    pub result: Result<ObjRenderer, LoadError>,
}

/// Spawns loader threads and collects their results.
#[derive(Debug)]
pub struct AssetLoader {
    shaders: Arc<ShaderLibrary>,
    textures: SharedTextureCache,
    policy: IlluminationPolicy,
    sender: Sender<LoadedAsset>,
    receiver: Receiver<LoadedAsset>,
}

impl AssetLoader {
    pub fn new(
        shaders: Arc<ShaderLibrary>,
        textures: SharedTextureCache,
        policy: IlluminationPolicy,
    ) -> Self {
        let (sender, receiver) = unbounded();
        Self {
            shaders,
            textures,
            policy,
            sender,
            receiver,
        }
    }

    /// Start loading `path` on a new thread.
    pub fn load(&self, path: impl Into<PathBuf>) -> io::Result<()> {
        let path = path.into();
        let shaders = Arc::clone(&self.shaders);
        let textures = Arc::clone(&self.textures);
        let policy = self.policy;
        let sender = self.sender.clone();
        let name = format!(
            "obj-loader-{}",
            path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default()
        );

        thread::Builder::new().name(name).spawn(move || {
            let result = load_obj_renderer(&path, shaders, textures, policy);
            if let Err(err) = &result {
                log::error!("Failed to load {}: {}", path.display(), err);
            }
            // The receiver is gone when the host shut down first.
            let _ = sender.send(LoadedAsset { path, result });
        })?;
        Ok(())
    }

    /// A finished load, if any, without blocking.
    pub fn poll(&self) -> Option<LoadedAsset> {
        self.receiver.try_recv().ok()
    }

    /// Block until a load finishes or `timeout` elapses.
    pub fn wait(&self, timeout: Duration) -> Option<LoadedAsset> {
        match self.receiver.recv_timeout(timeout) {
            Ok(asset) => Some(asset),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }
}

/// Parse an OBJ and its material libraries, partition it and build the
/// composite. Material libraries are resolved next to the OBJ and merged
/// before partitioning, so a missing material aborts the whole load.
pub fn load_obj_renderer(
    path: &Path,
    shaders: Arc<ShaderLibrary>,
    textures: SharedTextureCache,
    policy: IlluminationPolicy,
) -> Result<ObjRenderer, LoadError> {
    let scene = load_obj_from_path(path).map_err(|source| LoadError::Obj {
        path: path.to_path_buf(),
        source,
    })?;

    let base_dir = path.parent().unwrap_or_else(|| Path::new(""));
    let mut materials = MaterialTable::new();
    for lib in &scene.material_libs {
        let mtl_path = base_dir.join(lib);
        let table = load_mtl_from_path(&mtl_path).map_err(|source| LoadError::Mtl {
            path: mtl_path.clone(),
            source,
        })?;
        log::debug!("{}: {} materials", mtl_path.display(), table.len());
        materials.extend(table);
    }

    let partitions = partition_scene(&scene, &materials)?;
    log::debug!(
        "Partitioned {} polygons into {} sub-meshes",
        scene.polygons.len(),
        partitions.len()
    );

    let renderer = ObjRenderer::from_partitions(partitions, shaders, textures, policy)?;
    renderer.decode_textures();
    log::info!(
        "Creating renderer from {} parts and {} materials",
        renderer.part_count(),
        renderer.material_count()
    );
    Ok(renderer)
}
