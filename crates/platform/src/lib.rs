//! Platform layer: window, event loop and the GL thread.
//!
//! The event-loop thread owns the device and every GPU resource. The OBJ is
//! loaded on a worker thread and picked up here once it is ready; creation,
//! drawing and destruction of the resulting object all happen on this
//! thread.

use std::{
    path::PathBuf,
    sync::Arc,
    time::{Duration, Instant},
};

use anyhow::{Context, Result, anyhow};
use corelib::{Bounds3, LightingParameters, Quat, Vec4, camera::Camera, centered_anchor};
use renderer::{
    AssetLoader, LoadedAsset, ObjRenderer, RendererConfig, ShaderLibrary, SharedTextureCache,
    TextureCache, VirtualObject, WgpuDevice,
};
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    window::{Window, WindowId},
};

const FOV_Y_DEG: f32 = 45.0;
/// Radians per second of the anchor rotation.
const SPIN_RATE: f32 = 0.5;
/// How often the loader is polled while an asset is in flight.
const LOAD_POLL: Duration = Duration::from_millis(50);

/// Everything the host needs to know to open a window and show one OBJ.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub obj_path: PathBuf,
    pub backends: wgpu::Backends,
    pub width: u32,
    pub height: u32,
    pub show_fps: bool,
    /// Scale of the object on top of its framing.
    pub scale: f32,
    pub light_intensity: f32,
    pub renderer: RendererConfig,
}

/// Open a window, load `options.obj_path` and draw it until the window closes.
pub fn run_with_renderer(options: RunOptions) -> Result<()> {
    // Validate up front; lighting is rebuilt every frame from these values.
    LightingParameters::new(options.light_intensity, light_direction())
        .context("Invalid --light-intensity")?;

    let event_loop = EventLoop::new().context("Failed to create event loop")?;
    let mut viewer = Viewer::new(options)?;
    event_loop
        .run_app(&mut viewer)
        .map_err(|e| anyhow!("Event loop error: {e:?}"))?;

    match viewer.failure.take() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// World-space light direction (towards the light).
fn light_direction() -> Vec4 {
    Vec4::new(0.4, 1.0, 0.6, 0.0)
}

struct FpsCounter {
    frames: u32,
    since: Instant,
}

impl FpsCounter {
    fn new() -> Self {
        Self {
            frames: 0,
            since: Instant::now(),
        }
    }

    fn tick(&mut self) {
        self.frames += 1;
        let elapsed = self.since.elapsed();
        if elapsed >= Duration::from_secs(1) {
            log::info!("FPS: {:.1}", self.frames as f64 / elapsed.as_secs_f64());
            self.frames = 0;
            self.since = Instant::now();
        }
    }
}

struct Viewer {
    options: RunOptions,
    loader: AssetLoader,
    textures: SharedTextureCache,
    loading: bool,

    window: Option<Arc<Window>>,
    device: Option<WgpuDevice>,
    object: Option<ObjRenderer>,
    /// Object bounds re-centered at the origin and scaled.
    framed: Option<Bounds3>,

    start: Instant,
    fps: Option<FpsCounter>,
    failure: Option<anyhow::Error>,
}

impl Viewer {
    fn new(options: RunOptions) -> Result<Self> {
        let shaders = match &options.renderer.shader_dir {
            Some(dir) => ShaderLibrary::with_override_dir(dir),
            None => ShaderLibrary::builtin(),
        };
        let textures = TextureCache::shared();
        let loader = AssetLoader::new(
            Arc::new(shaders),
            Arc::clone(&textures),
            options.renderer.illumination,
        );
        loader
            .load(&options.obj_path)
            .context("Failed to start loader thread")?;
        log::info!("Loading {}", options.obj_path.display());

        let fps = options.show_fps.then(FpsCounter::new);
        Ok(Self {
            options,
            loader,
            textures,
            loading: true,
            window: None,
            device: None,
            object: None,
            framed: None,
            start: Instant::now(),
            fps,
            failure: None,
        })
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        log::error!("{err:#}");
        self.failure = Some(err);
        self.release_gpu();
        event_loop.exit();
    }

    fn accept(&mut self, event_loop: &ActiveEventLoop, asset: LoadedAsset) {
        self.loading = false;
        let mut object = match asset.result {
            Ok(object) => object,
            Err(err) => {
                let err = anyhow::Error::new(err)
                    .context(format!("Failed to load {}", asset.path.display()));
                self.fail(event_loop, err);
                return;
            }
        };
        object.set_scale_factor(self.options.scale);

        let bounds = object.bounds();
        let center = bounds.center();
        let scale = self.options.scale;
        self.framed = Some(Bounds3::new(
            (bounds.min - center) * scale,
            (bounds.max - center) * scale,
        ));
        log::info!("Loaded {}", asset.path.display());
        self.object = Some(object);
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop) {
        let (Some(device), Some(object), Some(framed)) =
            (self.device.as_mut(), self.object.as_mut(), self.framed)
        else {
            return;
        };

        let bounds = object.bounds();
        let t = self.start.elapsed().as_secs_f32();
        let rotation = Quat::from_rotation_y(t * SPIN_RATE);
        let anchor = centered_anchor(rotation, bounds.center(), self.options.scale);
        object.update_model_matrix(anchor, 1.0);

        let camera = Camera::framing(&framed, FOV_Y_DEG.to_radians(), device.aspect());
        // Keep the light fixed in the world while the object spins.
        let lighting = match LightingParameters::new(
            self.options.light_intensity,
            (rotation.inverse() * light_direction().truncate()).extend(0.0),
        ) {
            Ok(lighting) => lighting,
            Err(err) => {
                self.fail(event_loop, err.into());
                return;
            }
        };

        device.begin_frame();
        if let Err(err) = object.draw(device, camera.view(), camera.proj(), &lighting) {
            self.fail(event_loop, anyhow::Error::new(err).context("Failed to draw object"));
            return;
        }
        if let Err(err) = device.end_frame() {
            if WgpuDevice::is_surface_lost(&err) {
                log::warn!("Surface lost/outdated, recreating");
                device.recreate_surface();
            } else if matches!(err, wgpu::SurfaceError::OutOfMemory) {
                self.fail(event_loop, anyhow!("Out of GPU memory"));
                return;
            } else {
                log::warn!("Surface error: {err:?}");
            }
        }

        if let Some(fps) = &mut self.fps {
            fps.tick();
        }
    }

    /// Destroy every GPU resource on this thread and drop the device.
    fn release_gpu(&mut self) {
        let Some(device) = self.device.as_mut() else {
            return;
        };
        if let Some(object) = self.object.as_mut() {
            if let Err(err) = object.destroy(device) {
                log::warn!("Failed to destroy object: {err}");
            }
        }
        self.textures.lock().clear(device);
        self.device = None;
        log::info!("GPU resources released");
    }
}

impl ApplicationHandler for Viewer {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        let window = match &self.window {
            Some(window) => Arc::clone(window),
            None => {
                let attrs = Window::default_attributes()
                    .with_title("ObjView")
                    .with_inner_size(PhysicalSize::new(self.options.width, self.options.height));
                match event_loop.create_window(attrs) {
                    Ok(window) => {
                        let window = Arc::new(window);
                        log::info!(
                            "Window created: {}x{}",
                            window.inner_size().width,
                            window.inner_size().height
                        );
                        self.window = Some(Arc::clone(&window));
                        window
                    }
                    Err(err) => {
                        let err = anyhow::Error::new(err).context("Failed to create window");
                        self.fail(event_loop, err);
                        return;
                    }
                }
            }
        };

        if self.device.is_none() {
            // A fresh device after a suspend: objects re-create lazily on draw.
            let device = pollster::block_on(WgpuDevice::new(
                Arc::clone(&window),
                self.options.backends,
                &self.options.renderer,
            ));
            match device {
                Ok(device) => self.device = Some(device),
                Err(err) => {
                    let err = anyhow::Error::new(err).context("GPU initialization failed");
                    self.fail(event_loop, err);
                    return;
                }
            }
        }
        window.request_redraw();
    }

    fn suspended(&mut self, _event_loop: &ActiveEventLoop) {
        log::info!("Suspended; releasing the GPU context");
        self.release_gpu();
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested. Exiting event loop.");
                self.release_gpu();
                event_loop.exit();
            }
            WindowEvent::Resized(new_size) => {
                log::info!("Resized: {}x{}", new_size.width, new_size.height);
                if let Some(device) = self.device.as_mut() {
                    device.resize(new_size.width, new_size.height);
                }
            }
            WindowEvent::ScaleFactorChanged { scale_factor, .. } => {
                log::info!("Scale factor changed: {:.3}", scale_factor);
            }
            WindowEvent::RedrawRequested => self.redraw(event_loop),
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.loading {
            match self.loader.poll() {
                Some(asset) => self.accept(event_loop, asset),
                None => {
                    event_loop.set_control_flow(ControlFlow::WaitUntil(Instant::now() + LOAD_POLL));
                    return;
                }
            }
        }
        event_loop.set_control_flow(ControlFlow::Wait);
        if self.object.is_some() {
            if let Some(window) = &self.window {
                window.request_redraw();
            }
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.release_gpu();
        log::info!("Event loop exiting");
    }
}
