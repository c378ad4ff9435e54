use glam::{Mat4, Vec3};
use tracing::{debug, trace};

use super::{
    CameraRecord, FaceRecord, InvalidResolution, LightRecord, LightType, MeshRecord, RecordKind,
    Resolution, SceneSnapshot, Topology,
};
use crate::{
    camera::Camera,
    math_utils::polygon_normal,
    scene::{Light, LightKind, ObjectData, ObjectKey, Scene},
};

/// Names matching this marker turn a mesh into a proxy light unless the
/// builder is configured otherwise.
pub const DEFAULT_PROXY_LIGHT_MARKER: &str = "LIGHT";

/// How mesh polygons are written into the snapshot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopologyMode {
    /// Plain index lists.
    #[default]
    Indices,
    /// Index lists paired with a world space face normal.
    Faces,
}

/// Walks a host `Scene` and captures everything the external renderer needs.
#[derive(Clone, Debug)]
pub struct SnapshotBuilder {
    topology: TopologyMode,
    proxy_light_marker: String,
}

impl Default for SnapshotBuilder {
    fn default() -> Self {
        Self {
            topology: TopologyMode::default(),
            proxy_light_marker: DEFAULT_PROXY_LIGHT_MARKER.to_string(),
        }
    }
}

impl SnapshotBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_topology(mut self, topology: TopologyMode) -> Self {
        self.topology = topology;
        self
    }

    pub fn with_proxy_light_marker(mut self, marker: impl Into<String>) -> Self {
        self.proxy_light_marker = marker.into();
        self
    }

    /// Returns `true` if an object called `name` should be exported as a
    /// proxy light. Both the marker itself and host duplicates of it such as
    /// `LIGHT.001` match.
    pub fn is_proxy_light(&self, name: &str) -> bool {
        match name.strip_prefix(self.proxy_light_marker.as_str()) {
            Some(rest) => rest.is_empty() || rest.starts_with('.'),
            None => false,
        }
    }

    /// Capture a snapshot of `scene` at its configured output resolution.
    #[tracing::instrument(level = "debug", skip_all, fields(objects = scene.len()))]
    pub fn build(&self, scene: &Scene) -> Result<SceneSnapshot, InvalidResolution> {
        let (width, height) = scene.render.scaled_size();
        let mut snapshot = SceneSnapshot::new(Resolution::new(width, height)?);

        for (key, object) in scene.objects() {
            // Objects always have a world matrix while they are in the scene.
            let Some(world) = scene.world_matrix(key) else {
                continue;
            };

            match &object.data {
                ObjectData::Mesh(_) => {
                    if let Some(mesh) = self.mesh_record(scene, key, world, &object.name) {
                        snapshot.scene.meshes.push(mesh);
                    }
                }
                ObjectData::Light(light) => {
                    snapshot.scene.lights.push(light_record(light, world));
                }
                ObjectData::Camera(camera) => {
                    if scene.active_camera() == Some(key) {
                        snapshot.scene.camera = Some(camera_record(camera, world));
                    } else {
                        trace!("ignoring inactive camera {}", object.name);
                    }
                }
            }
        }

        debug!(
            "captured {} meshes, {} lights, camera = {}",
            snapshot.scene.meshes.len(),
            snapshot.scene.lights.len(),
            snapshot.scene.camera.is_some()
        );

        Ok(snapshot)
    }

    fn mesh_record(
        &self,
        scene: &Scene,
        key: ObjectKey,
        world: Mat4,
        name: &str,
    ) -> Option<MeshRecord> {
        let ObjectData::Mesh(mesh) = &scene.get(key)?.data else {
            return None;
        };

        // The evaluated geometry is released when `evaluated` goes out of
        // scope, including the early return below.
        let evaluated = scene.evaluate_mesh(key)?;

        if evaluated.is_empty() {
            debug!("skipping mesh {name} with no geometry");
            return None;
        }

        let vertices: Vec<Vec3> = evaluated
            .positions
            .iter()
            .map(|p| world.transform_point3(*p))
            .collect();

        let topology = match self.topology {
            TopologyMode::Indices => Topology::Indices(evaluated.polygons.clone()),
            TopologyMode::Faces => Topology::Faces(
                evaluated
                    .polygons
                    .iter()
                    .map(|polygon| FaceRecord {
                        normal: polygon_normal(polygon.iter().map(|&i| vertices[i as usize])),
                        vertices: polygon.clone(),
                    })
                    .collect(),
            ),
        };

        Some(MeshRecord {
            vertices,
            topology,
            color: mesh.materials.first().map(|m| m.diffuse_color),
            kind: if self.is_proxy_light(name) {
                RecordKind::Light
            } else {
                RecordKind::Mesh
            },
        })
    }
}

fn light_record(light: &Light, world: Mat4) -> LightRecord {
    LightRecord {
        light_type: match light.kind {
            LightKind::Point => LightType::Point,
            LightKind::Sun => LightType::Sun,
            LightKind::Spot => LightType::Spot,
            LightKind::Area => LightType::Area,
        },
        location: world.transform_point3(Vec3::ZERO),
        color: light.color,
        energy: light.energy,
    }
}

fn camera_record(camera: &Camera, world: Mat4) -> CameraRecord {
    let (_, rotation, location) = world.to_scale_rotation_translation();
    let orientation = camera.orient(rotation);

    CameraRecord {
        location,
        rotation: orientation.euler,
        direction: orientation.direction,
        up: orientation.up,
        fov: camera.fov(),
        clip: camera.clip(),
    }
}

#[cfg(test)]
mod tests {
    use glam::{Quat, Vec4};

    use super::*;
    use crate::scene::{
        LightBuilder, Material, MeshData, Modifier, RenderSettings, SceneObject, Transform,
    };

    fn triangle() -> MeshData {
        MeshData::new(
            vec![
                Vec3::new(0.0, 0.0, 0.0),
                Vec3::new(1.0, 0.0, 0.0),
                Vec3::new(0.0, 1.0, 0.0),
            ],
            vec![vec![0, 1, 2]],
        )
        .unwrap()
    }

    fn small_scene() -> Scene {
        Scene::new(RenderSettings {
            resolution_x: 4,
            resolution_y: 3,
            resolution_percentage: 100,
        })
    }

    fn camera_object(name: &str, transform: Transform) -> SceneObject {
        SceneObject::new(name, transform, ObjectData::Camera(Camera::default()))
    }

    #[test]
    fn empty_scene_has_only_resolution() {
        let snapshot = SnapshotBuilder::new().build(&small_scene()).unwrap();

        assert_eq!(Resolution::new(4, 3).unwrap(), snapshot.resolution);
        assert!(snapshot.scene.meshes.is_empty());
        assert!(snapshot.scene.lights.is_empty());
        assert!(snapshot.scene.camera.is_none());
    }

    #[test]
    fn zero_resolution_is_rejected() {
        let scene = Scene::new(RenderSettings {
            resolution_x: 100,
            resolution_y: 100,
            resolution_percentage: 0,
        });

        assert_eq!(
            Err(InvalidResolution(0, 0)),
            SnapshotBuilder::new().build(&scene)
        );
    }

    #[test]
    fn mesh_vertices_are_in_world_space() {
        let mut scene = small_scene();
        let parent = scene.add(SceneObject::new(
            "root",
            Transform::from_translation(Vec3::new(0.0, 0.0, 5.0)),
            ObjectData::Light(LightBuilder::new(LightKind::Sun).build()),
        ));
        let mesh = scene.add(SceneObject::new(
            "tri",
            Transform::from_translation(Vec3::new(10.0, 0.0, 0.0)),
            ObjectData::Mesh(triangle()),
        ));
        scene.set_parent(mesh, Some(parent)).unwrap();

        let snapshot = SnapshotBuilder::new().build(&scene).unwrap();
        let record = &snapshot.scene.meshes[0];

        assert_eq!(
            vec![
                Vec3::new(10.0, 0.0, 5.0),
                Vec3::new(11.0, 0.0, 5.0),
                Vec3::new(10.0, 1.0, 5.0),
            ],
            record.vertices
        );
        assert_eq!(Topology::Indices(vec![vec![0, 1, 2]]), record.topology);
        assert_eq!(RecordKind::Mesh, record.kind);
        assert_eq!(None, record.color);
        assert!(record.indices_in_range());
    }

    #[test]
    fn first_material_sets_color() {
        let mut scene = small_scene();
        scene.add(SceneObject::new(
            "tri",
            Transform::default(),
            ObjectData::Mesh(
                triangle()
                    .with_material(Material::new("red", Vec4::new(1.0, 0.0, 0.0, 1.0)))
                    .with_material(Material::new("blue", Vec4::new(0.0, 0.0, 1.0, 1.0))),
            ),
        ));

        let snapshot = SnapshotBuilder::new().build(&scene).unwrap();
        assert_eq!(
            Some(Vec4::new(1.0, 0.0, 0.0, 1.0)),
            snapshot.scene.meshes[0].color
        );
    }

    #[test]
    fn proxy_light_marker_matches_name_and_duplicates() {
        let builder = SnapshotBuilder::new();

        assert!(builder.is_proxy_light("LIGHT"));
        assert!(builder.is_proxy_light("LIGHT.001"));
        assert!(!builder.is_proxy_light("LIGHTS"));
        assert!(!builder.is_proxy_light("Cube"));

        let builder = builder.with_proxy_light_marker("Emitter");
        assert!(builder.is_proxy_light("Emitter.002"));
        assert!(!builder.is_proxy_light("LIGHT"));
    }

    #[test]
    fn proxy_light_mesh_has_light_kind() {
        let mut scene = small_scene();
        scene.add(SceneObject::new(
            "LIGHT.001",
            Transform::default(),
            ObjectData::Mesh(triangle()),
        ));

        let snapshot = SnapshotBuilder::new().build(&scene).unwrap();
        assert_eq!(RecordKind::Light, snapshot.scene.meshes[0].kind);
    }

    #[test]
    fn faces_topology_carries_world_normals() {
        let mut scene = small_scene();
        scene.add(SceneObject::new(
            "tri",
            // Rotating +Z by 90 degrees around +X points it at -Y.
            Transform::from_translation_rotation(
                Vec3::ZERO,
                Quat::from_rotation_x(f32::to_radians(90.0)),
            ),
            ObjectData::Mesh(triangle()),
        ));

        let snapshot = SnapshotBuilder::new()
            .with_topology(TopologyMode::Faces)
            .build(&scene)
            .unwrap();

        let Topology::Faces(faces) = &snapshot.scene.meshes[0].topology else {
            panic!("expected faces topology");
        };
        assert_eq!(vec![0, 1, 2], faces[0].vertices);
        assert!(faces[0].normal.abs_diff_eq(Vec3::NEG_Y, 1e-5));
    }

    #[test]
    fn modifiers_are_applied_before_export() {
        let mut scene = small_scene();
        let quad = MeshData::new(
            vec![Vec3::ZERO, Vec3::X, Vec3::new(1.0, 1.0, 0.0), Vec3::Y],
            vec![vec![0, 1, 2, 3]],
        )
        .unwrap()
        .with_modifier(Modifier::Triangulate);
        scene.add(SceneObject::new("quad", Transform::default(), ObjectData::Mesh(quad)));

        let snapshot = SnapshotBuilder::new().build(&scene).unwrap();
        assert_eq!(
            Topology::Indices(vec![vec![0, 1, 2], vec![0, 2, 3]]),
            snapshot.scene.meshes[0].topology
        );
    }

    #[test]
    fn empty_meshes_are_skipped_and_released() {
        let mut scene = small_scene();
        scene.add(SceneObject::new(
            "empty",
            Transform::default(),
            ObjectData::Mesh(MeshData::default()),
        ));
        scene.add(SceneObject::new("tri", Transform::default(), ObjectData::Mesh(triangle())));

        let snapshot = SnapshotBuilder::new().build(&scene).unwrap();

        assert_eq!(1, snapshot.scene.meshes.len());
        assert_eq!(0, scene.live_evaluations());
    }

    #[test]
    fn lights_record_world_location() {
        let mut scene = small_scene();
        scene.add(SceneObject::new(
            "lamp",
            Transform::from_translation(Vec3::new(1.0, 2.0, 3.0)),
            ObjectData::Light(
                LightBuilder::new(LightKind::Area)
                    .color(Vec3::new(1.0, 0.9, 0.8))
                    .energy(250.0)
                    .build(),
            ),
        ));

        let snapshot = SnapshotBuilder::new().build(&scene).unwrap();
        assert_eq!(
            vec![LightRecord {
                light_type: LightType::Area,
                location: Vec3::new(1.0, 2.0, 3.0),
                color: Vec3::new(1.0, 0.9, 0.8),
                energy: 250.0,
            }],
            snapshot.scene.lights
        );
    }

    #[test]
    fn only_active_camera_is_recorded() {
        let mut scene = small_scene();
        scene.add(camera_object(
            "inactive",
            Transform::from_translation(Vec3::new(9.0, 9.0, 9.0)),
        ));
        let active = scene.add(camera_object(
            "active",
            Transform::from_translation_rotation(
                Vec3::new(0.0, -5.0, 1.0),
                Quat::from_rotation_x(f32::to_radians(80.0)),
            ),
        ));

        let snapshot = SnapshotBuilder::new().build(&scene).unwrap();
        assert!(snapshot.scene.camera.is_none());

        scene.set_active_camera(active).unwrap();
        let camera = SnapshotBuilder::new().build(&scene).unwrap().scene.camera.unwrap();

        assert!(camera.location.abs_diff_eq(Vec3::new(0.0, -5.0, 1.0), 1e-5));
        assert!((camera.direction.length() - 1.0).abs() < 1e-5);
        assert!((camera.up.length() - 1.0).abs() < 1e-5);
        assert!(camera.direction.dot(camera.up).abs() < 1e-5);
        assert_eq!(Camera::default().clip(), camera.clip);
        assert!((camera.rotation.x - f32::to_radians(80.0)).abs() < 1e-4);
    }
}
