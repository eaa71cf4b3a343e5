//! Composite object lifecycle against the recording device:
//! - bounds and scale composition
//! - idempotent creation and shared-material teardown
//! - ownership checks across threads
//! - fatal construction errors
//! - background loading from OBJ/MTL files

use std::{
    fs,
    path::PathBuf,
    sync::Arc,
    thread,
    time::Duration,
};

use asset::{MaterialDefinition, PartitionError, SubMesh};
use corelib::{Bounds3, LightingParameters, Mat4, Vec3, transform::model_matrix};
use renderer::{
    AssetLoader, GpuCall, IlluminationPolicy, LoadError, MaterialBinding, ObjRenderer,
    RecordingDevice, RenderError, ShaderLibrary, SharedMaterial, SubMeshRenderer, TextureCache,
    VirtualObject, device::ShaderStage,
};

fn triangle_at(origin: [f32; 3]) -> SubMesh {
    let [x, y, z] = origin;
    SubMesh::new(
        vec![[x, y, z], [x + 1.0, y, z], [x, y + 1.0, z + 1.0]],
        vec![[0.0, 0.0, 1.0]; 3],
        vec![[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]],
        vec![0, 1, 2],
        vec![0],
        true,
    )
    .unwrap()
}

fn material(name: &str) -> SharedMaterial {
    MaterialBinding::new(
        Arc::new(MaterialDefinition::new(name)),
        Arc::new(ShaderLibrary::builtin()),
        TextureCache::shared(),
        IlluminationPolicy::FallbackToPhong,
    )
    .unwrap()
    .shared()
}

/// Three parts over two materials: `a`, `b`, `a`.
fn three_parts_two_materials() -> ObjRenderer {
    let a = material("a");
    let b = material("b");
    ObjRenderer::new(vec![
        SubMeshRenderer::new(triangle_at([0.0, 0.0, 0.0]), Arc::clone(&a)),
        SubMeshRenderer::new(triangle_at([2.0, -3.0, 0.0]), b),
        SubMeshRenderer::new(triangle_at([-1.0, 0.0, 4.0]), a),
    ])
    .unwrap()
}

fn temp_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("{name}-{}", std::process::id()));
    fs::create_dir_all(&dir).unwrap();
    dir
}

#[test]
fn bounds_are_union_of_parts() {
    let renderer = three_parts_two_materials();
    let bounds = renderer.bounds();
    assert_eq!(bounds.min, Vec3::new(-1.0, -3.0, 0.0));
    assert_eq!(bounds.max, Vec3::new(3.0, 1.0, 5.0));

    let single = ObjRenderer::new(vec![SubMeshRenderer::new(
        triangle_at([1.0, 1.0, 1.0]),
        material("only"),
    )])
    .unwrap();
    assert_eq!(
        single.bounds(),
        Bounds3::new(Vec3::new(1.0, 1.0, 1.0), Vec3::new(2.0, 2.0, 2.0))
    );
}

#[test]
fn scale_factors_compose() {
    let mut renderer = three_parts_two_materials();
    renderer.set_scale_factor(2.0);
    assert_eq!(renderer.scale_factor(), 2.0);
    let anchor = Mat4::from_translation(Vec3::new(0.5, 0.0, -2.0));
    renderer.update_model_matrix(anchor, 3.0);

    for part in renderer.parts() {
        assert_eq!(part.material().lock().model_matrix(), model_matrix(anchor, 6.0));
    }
}

#[test]
fn create_twice_allocates_once() {
    let mut device = RecordingDevice::new();
    let mut renderer = three_parts_two_materials();
    renderer.create_on_gl_thread(&mut device).unwrap();
    renderer.create_on_gl_thread(&mut device).unwrap();

    assert_eq!(device.count(|c| matches!(c, GpuCall::CreateProgram { .. })), 2);
    assert_eq!(device.count(|c| matches!(c, GpuCall::CreateBuffer { .. })), 6);
}

#[test]
fn shared_materials_are_destroyed_once() {
    let mut device = RecordingDevice::new();
    let mut renderer = three_parts_two_materials();
    assert_eq!(renderer.part_count(), 3);
    assert_eq!(renderer.material_count(), 2);

    renderer.create_on_gl_thread(&mut device).unwrap();
    renderer.destroy(&mut device).unwrap();

    assert_eq!(device.count(|c| matches!(c, GpuCall::DestroyProgram(_))), 2);
    assert_eq!(device.count(|c| matches!(c, GpuCall::DestroyBuffer(_))), 6);
    assert!(device.live_programs().is_empty());
    assert!(device.live_buffers().is_empty());
}

#[test]
fn draws_follow_partition_order() {
    let mut device = RecordingDevice::new();
    let mut renderer = three_parts_two_materials();
    renderer.update_model_matrix(Mat4::IDENTITY, 1.0);
    renderer
        .draw(&mut device, Mat4::IDENTITY, Mat4::IDENTITY, &LightingParameters::default())
        .unwrap();

    let drawn: Vec<_> = device
        .calls()
        .iter()
        .filter_map(|c| match c {
            GpuCall::DrawIndexed { index_buffer, .. } => Some(*index_buffer),
            _ => None,
        })
        .collect();
    let expected: Vec<_> = renderer
        .parts()
        .iter()
        .map(|p| p.geometry().index_buffer().unwrap())
        .collect();
    assert_eq!(drawn, expected);
    assert!(device.enabled_attributes().is_empty());
}

#[test]
fn destroy_from_foreign_thread_keeps_resources() {
    let mut device = RecordingDevice::new();
    let mut renderer = three_parts_two_materials();
    renderer.create_on_gl_thread(&mut device).unwrap();

    thread::scope(|s| {
        s.spawn(|| {
            // Best-effort at the composite level: refused parts are logged.
            renderer.destroy(&mut device).unwrap();
        });
    });
    assert_eq!(device.live_programs().len(), 2);
    assert_eq!(device.live_buffers().len(), 6);

    renderer.destroy(&mut device).unwrap();
    assert!(device.live_programs().is_empty());
    assert!(device.live_buffers().is_empty());
}

#[test]
fn new_context_reinitializes_every_part() {
    let mut device = RecordingDevice::new();
    let mut renderer = three_parts_two_materials();
    renderer.update_model_matrix(Mat4::IDENTITY, 1.0);
    renderer.create_on_gl_thread(&mut device).unwrap();
    let old_programs = device.live_programs();
    let old_buffers = device.live_buffers();

    thread::scope(|s| {
        s.spawn(|| {
            renderer.create_on_gl_thread(&mut device).unwrap();
            renderer
                .draw(&mut device, Mat4::IDENTITY, Mat4::IDENTITY, &LightingParameters::default())
                .unwrap();
            assert_eq!(device.count(|c| matches!(c, GpuCall::CreateProgram { .. })), 4);
            assert_eq!(device.count(|c| matches!(c, GpuCall::CreateBuffer { .. })), 12);
            assert_eq!(device.count(|c| matches!(c, GpuCall::DrawIndexed { .. })), 3);
            for part in renderer.parts() {
                assert!(!old_buffers.contains(&part.geometry().vertex_buffer().unwrap()));
                let program = part.material().lock().program().unwrap();
                assert!(!old_programs.contains(&program));
            }

            renderer.destroy(&mut device).unwrap();
        });
    });
    // Handles of the abandoned context are never released through it.
    assert_eq!(device.live_programs(), old_programs);
    assert_eq!(device.live_buffers(), old_buffers);
}

#[test]
fn failed_reinit_on_new_context_recovers_on_next_create() {
    let mut device = RecordingDevice::new();
    let mut renderer = three_parts_two_materials();
    renderer.update_model_matrix(Mat4::IDENTITY, 1.0);
    renderer.create_on_gl_thread(&mut device).unwrap();

    thread::scope(|s| {
        s.spawn(|| {
            device.fail_next_compile(ShaderStage::Fragment);
            assert!(renderer.create_on_gl_thread(&mut device).is_err());
        });
    });

    renderer.create_on_gl_thread(&mut device).unwrap();
    for part in renderer.parts() {
        assert!(part.geometry().index_buffer().is_some());
        let material = part.material().lock();
        assert!(material.is_created());
        assert!(material.program().is_some());
    }

    device.clear_calls();
    renderer
        .draw(&mut device, Mat4::IDENTITY, Mat4::IDENTITY, &LightingParameters::default())
        .unwrap();
    assert_eq!(device.count(|c| matches!(c, GpuCall::DrawIndexed { .. })), 3);
}

#[test]
fn compile_failure_leaves_nothing_behind() {
    let mut device = RecordingDevice::new();
    let a = material("a");
    a.lock().create_on_gl_thread(&mut device).unwrap();
    let mut renderer = ObjRenderer::new(vec![
        SubMeshRenderer::new(triangle_at([0.0, 0.0, 0.0]), a),
        SubMeshRenderer::new(triangle_at([1.0, 0.0, 0.0]), material("b")),
    ])
    .unwrap();

    device.fail_next_compile(ShaderStage::Fragment);
    let err = renderer.create_on_gl_thread(&mut device).unwrap_err();
    assert!(matches!(err, RenderError::Gpu(renderer::GpuError::ShaderCompile { .. })));
    assert!(device.live_programs().is_empty());
    assert!(device.live_buffers().is_empty());
    assert!(renderer.parts().iter().all(|p| !p.geometry().is_created()));
}

#[test]
fn unsupported_illumination_rejected_when_strict() {
    let mut definition = MaterialDefinition::new("glass");
    definition.illumination = asset::IlluminationModel::from_index(7).unwrap();
    let partitions = vec![asset::Partition {
        mesh: triangle_at([0.0, 0.0, 0.0]),
        material: Arc::new(definition),
    }];
    let result = ObjRenderer::from_partitions(
        partitions,
        Arc::new(ShaderLibrary::builtin()),
        TextureCache::shared(),
        IlluminationPolicy::Reject,
    );
    assert!(matches!(
        result,
        Err(RenderError::UnsupportedIlluminationModel { index: 7, .. })
    ));
}

#[test]
fn loader_builds_renderer_from_files() {
    let dir = temp_dir("loader-ok");
    fs::write(
        dir.join("scene.mtl"),
        "newmtl red\nKd 1 0 0\nillum 2\n\nnewmtl blue\nKd 0 0 1\nillum 1\n",
    )
    .unwrap();
    fs::write(
        dir.join("scene.obj"),
        "mtllib scene.mtl\n\
         v 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\n\
         usemtl red\nf 1 2 3\n\
         usemtl blue\nf 1 3 4\n\
         usemtl red\nf 2 3 4\n",
    )
    .unwrap();

    let loader = AssetLoader::new(
        Arc::new(ShaderLibrary::builtin()),
        TextureCache::shared(),
        IlluminationPolicy::default(),
    );
    loader.load(dir.join("scene.obj")).unwrap();
    let loaded = loader.wait(Duration::from_secs(30)).expect("loader timed out");
    assert_eq!(loaded.path, dir.join("scene.obj"));

    let mut renderer = loaded.result.unwrap();
    assert_eq!(renderer.part_count(), 2);
    assert_eq!(renderer.material_count(), 2);

    let mut device = RecordingDevice::new();
    renderer.create_on_gl_thread(&mut device).unwrap();
    renderer.destroy(&mut device).unwrap();
    assert!(device.live_programs().is_empty());
    fs::remove_dir_all(&dir).ok();
}

#[test]
fn loader_reports_missing_material() {
    let dir = temp_dir("loader-missing");
    fs::write(dir.join("scene.mtl"), "newmtl present\nKd 1 1 1\n").unwrap();
    fs::write(
        dir.join("scene.obj"),
        "mtllib scene.mtl\nv 0 0 0\nv 1 0 0\nv 0 1 0\nusemtl missing\nf 1 2 3\n",
    )
    .unwrap();

    let loader = AssetLoader::new(
        Arc::new(ShaderLibrary::builtin()),
        TextureCache::shared(),
        IlluminationPolicy::default(),
    );
    loader.load(dir.join("scene.obj")).unwrap();
    let loaded = loader.wait(Duration::from_secs(30)).expect("loader timed out");
    match loaded.result {
        Err(LoadError::Partition(PartitionError::MissingMaterial { name, .. })) => {
            assert_eq!(name, "missing")
        }
        other => panic!("expected missing material, got {other:?}"),
    }
    assert!(loader.poll().is_none());
    fs::remove_dir_all(&dir).ok();
}

#[test]
fn destroy_before_create_is_a_no_op() {
    let mut device = RecordingDevice::new();
    let mut renderer = three_parts_two_materials();
    renderer.destroy(&mut device).unwrap();
    assert!(device.calls().is_empty());
}
