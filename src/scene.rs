//! The host application's scene graph: objects with transforms, parent links
//! and per-kind data, plus the render settings a render request reads.
mod mesh;
mod shading;

pub use mesh::*;
pub use shading::*;

use std::cell::Cell;

use glam::{Mat4, Quat, Vec3};
use slotmap::{new_key_type, SlotMap};
use thiserror::Error;

use crate::camera::Camera;

new_key_type! {
    /// Identifies an object stored in a `Scene`.
    pub struct ObjectKey;
}

/// Local transform of a scene object relative to its parent.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Transform {
    pub fn from_translation(translation: Vec3) -> Self {
        Self {
            translation,
            ..Default::default()
        }
    }

    pub fn from_translation_rotation(translation: Vec3, rotation: Quat) -> Self {
        Self {
            translation,
            rotation,
            ..Default::default()
        }
    }

    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            translation: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

/// Data attached to a scene object. Objects of any other kind the host may
/// have (empties, curves, ...) are not representable and never reach the
/// bridge.
#[derive(Clone, Debug, PartialEq)]
pub enum ObjectData {
    Mesh(MeshData),
    Light(Light),
    Camera(Camera),
}

#[derive(Clone, Debug, PartialEq)]
pub struct SceneObject {
    pub name: String,
    pub transform: Transform,
    pub data: ObjectData,
    parent: Option<ObjectKey>,
}

impl SceneObject {
    pub fn new(name: impl Into<String>, transform: Transform, data: ObjectData) -> Self {
        Self {
            name: name.into(),
            transform,
            data,
            parent: None,
        }
    }

    pub fn parent(&self) -> Option<ObjectKey> {
        self.parent
    }
}

/// Output size settings of the scene.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderSettings {
    pub resolution_x: u32,
    pub resolution_y: u32,
    /// Percentage scale applied to both resolution axes.
    pub resolution_percentage: u32,
}

impl RenderSettings {
    /// Get the `(width, height)` of the image a render should produce after
    /// applying the resolution percentage.
    pub fn scaled_size(&self) -> (u32, u32) {
        let scale = |v: u32| {
            let scaled = u64::from(v) * u64::from(self.resolution_percentage) / 100;
            u32::try_from(scaled).unwrap_or(u32::MAX)
        };
        (scale(self.resolution_x), scale(self.resolution_y))
    }
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            resolution_x: 1920,
            resolution_y: 1080,
            resolution_percentage: 100,
        }
    }
}

/// A set of objects and associated properties that can be exported to the
/// external renderer.
#[derive(Default)]
pub struct Scene {
    objects: SlotMap<ObjectKey, SceneObject>,
    /// Insertion order of objects, used for stable iteration.
    order: Vec<ObjectKey>,
    active_camera: Option<ObjectKey>,
    pub render: RenderSettings,
    /// Number of evaluated meshes currently handed out and not yet released.
    live_evaluations: Cell<usize>,
}

impl Scene {
    pub fn new(render: RenderSettings) -> Self {
        Self {
            render,
            ..Default::default()
        }
    }

    /// Add an object to the scene and return its key.
    pub fn add(&mut self, object: SceneObject) -> ObjectKey {
        let key = self.objects.insert(object);
        self.order.push(key);
        key
    }

    /// Remove an object. Children of the removed object are reparented to the
    /// scene root.
    pub fn remove(&mut self, key: ObjectKey) -> Option<SceneObject> {
        let removed = self.objects.remove(key)?;
        self.order.retain(|k| *k != key);

        for object in self.objects.values_mut() {
            if object.parent == Some(key) {
                object.parent = None;
            }
        }

        if self.active_camera == Some(key) {
            self.active_camera = None;
        }

        Some(removed)
    }

    pub fn get(&self, key: ObjectKey) -> Option<&SceneObject> {
        self.objects.get(key)
    }

    pub fn get_mut(&mut self, key: ObjectKey) -> Option<&mut SceneObject> {
        self.objects.get_mut(key)
    }

    /// Iterate over all objects in the order they were added.
    pub fn objects(&self) -> impl Iterator<Item = (ObjectKey, &SceneObject)> {
        self.order.iter().map(|key| (*key, &self.objects[*key]))
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Attach `child` to `parent`, or detach it when `parent` is `None`.
    pub fn set_parent(
        &mut self,
        child: ObjectKey,
        parent: Option<ObjectKey>,
    ) -> Result<(), SceneError> {
        if !self.objects.contains_key(child) {
            return Err(SceneError::MissingObject);
        }

        if let Some(parent) = parent {
            if !self.objects.contains_key(parent) {
                return Err(SceneError::MissingObject);
            }

            // Walk up from the new parent; meeting the child means a cycle.
            let mut cursor = Some(parent);
            while let Some(key) = cursor {
                if key == child {
                    return Err(SceneError::ParentCycle);
                }
                cursor = self.objects[key].parent;
            }
        }

        self.objects[child].parent = parent;
        Ok(())
    }

    /// Make `key` the camera used for rendering.
    pub fn set_active_camera(&mut self, key: ObjectKey) -> Result<(), SceneError> {
        match self.objects.get(key).map(|o| &o.data) {
            Some(ObjectData::Camera(_)) => {
                self.active_camera = Some(key);
                Ok(())
            }
            Some(_) => Err(SceneError::NotACamera),
            None => Err(SceneError::MissingObject),
        }
    }

    pub fn active_camera(&self) -> Option<ObjectKey> {
        self.active_camera
    }

    /// Get the local to world transform of an object by composing its
    /// transform with every ancestor.
    pub fn world_matrix(&self, key: ObjectKey) -> Option<Mat4> {
        let mut world = self.objects.get(key)?.transform.matrix();
        let mut cursor = self.objects[key].parent;

        while let Some(parent) = cursor {
            let parent = &self.objects[parent];
            world = parent.transform.matrix() * world;
            cursor = parent.parent;
        }

        Some(world)
    }

    /// Evaluate the final geometry of a mesh object. Returns `None` if `key`
    /// is not a mesh object.
    pub fn evaluate_mesh(&self, key: ObjectKey) -> Option<EvaluatedMesh<'_>> {
        match &self.objects.get(key)?.data {
            ObjectData::Mesh(mesh) => Some(EvaluatedMesh::acquire(mesh, &self.live_evaluations)),
            _ => None,
        }
    }

    /// Number of evaluated meshes that have not yet been released.
    pub fn live_evaluations(&self) -> usize {
        self.live_evaluations.get()
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SceneError {
    #[error("the object does not exist in this scene")]
    MissingObject,
    #[error("parenting would create a cycle")]
    ParentCycle,
    #[error("only camera objects can be the active camera")]
    NotACamera,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point_light(name: &str, translation: Vec3) -> SceneObject {
        SceneObject::new(
            name,
            Transform::from_translation(translation),
            ObjectData::Light(LightBuilder::new(LightKind::Point).build()),
        )
    }

    #[test]
    fn scaled_size_applies_percentage() {
        let settings = RenderSettings {
            resolution_x: 1920,
            resolution_y: 1080,
            resolution_percentage: 50,
        };
        assert_eq!((960, 540), settings.scaled_size());

        let settings = RenderSettings {
            resolution_x: 3,
            resolution_y: 3,
            resolution_percentage: 33,
        };
        assert_eq!((0, 0), settings.scaled_size());
    }

    #[test]
    fn scaled_size_saturates_instead_of_wrapping() {
        let settings = RenderSettings {
            resolution_x: u32::MAX,
            resolution_y: 1080,
            resolution_percentage: 200,
        };
        assert_eq!((u32::MAX, 2160), settings.scaled_size());
    }

    #[test]
    fn objects_iterate_in_insertion_order() {
        let mut scene = Scene::default();
        let a = scene.add(point_light("a", Vec3::ZERO));
        let b = scene.add(point_light("b", Vec3::ZERO));
        let c = scene.add(point_light("c", Vec3::ZERO));
        scene.remove(b);

        let keys: Vec<ObjectKey> = scene.objects().map(|(k, _)| k).collect();
        assert_eq!(vec![a, c], keys);
    }

    #[test]
    fn world_matrix_composes_parents() {
        let mut scene = Scene::default();
        let parent = scene.add(point_light("parent", Vec3::new(1.0, 0.0, 0.0)));
        let child = scene.add(point_light("child", Vec3::new(0.0, 2.0, 0.0)));
        scene.set_parent(child, Some(parent)).unwrap();

        let world = scene.world_matrix(child).unwrap();
        assert_eq!(Vec3::new(1.0, 2.0, 0.0), world.transform_point3(Vec3::ZERO));
    }

    #[test]
    fn parent_cycles_are_refused() {
        let mut scene = Scene::default();
        let a = scene.add(point_light("a", Vec3::ZERO));
        let b = scene.add(point_light("b", Vec3::ZERO));

        scene.set_parent(b, Some(a)).unwrap();
        assert_eq!(Err(SceneError::ParentCycle), scene.set_parent(a, Some(b)));
        assert_eq!(Err(SceneError::ParentCycle), scene.set_parent(a, Some(a)));
    }

    #[test]
    fn removing_parent_detaches_children() {
        let mut scene = Scene::default();
        let a = scene.add(point_light("a", Vec3::X));
        let b = scene.add(point_light("b", Vec3::Y));
        scene.set_parent(b, Some(a)).unwrap();

        scene.remove(a);
        assert_eq!(None, scene.get(b).unwrap().parent());
        assert_eq!(
            Vec3::Y,
            scene.world_matrix(b).unwrap().transform_point3(Vec3::ZERO)
        );
    }

    #[test]
    fn only_cameras_can_be_active() {
        let mut scene = Scene::default();
        let light = scene.add(point_light("light", Vec3::ZERO));
        let camera = scene.add(SceneObject::new(
            "camera",
            Transform::default(),
            ObjectData::Camera(Camera::default()),
        ));

        assert_eq!(Err(SceneError::NotACamera), scene.set_active_camera(light));
        assert!(scene.set_active_camera(camera).is_ok());
        assert_eq!(Some(camera), scene.active_camera());

        scene.remove(camera);
        assert_eq!(None, scene.active_camera());
    }

    #[test]
    fn evaluate_mesh_only_for_mesh_objects() {
        let mut scene = Scene::default();
        let light = scene.add(point_light("light", Vec3::ZERO));
        let mesh = scene.add(SceneObject::new(
            "mesh",
            Transform::default(),
            ObjectData::Mesh(MeshData::new(vec![Vec3::ZERO; 3], vec![vec![0, 1, 2]]).unwrap()),
        ));

        assert!(scene.evaluate_mesh(light).is_none());

        let evaluated = scene.evaluate_mesh(mesh).unwrap();
        assert_eq!(1, scene.live_evaluations());
        drop(evaluated);
        assert_eq!(0, scene.live_evaluations());
    }
}
