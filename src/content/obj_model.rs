use std::path::Path;

use anyhow::Context;
use glam::Vec3;
use tracing::{debug, warn};

use crate::{
    platform::{load_as_string, load_relative_as_string},
    scene::{
        Material, MeshData, ObjectData, ObjectKey, Scene, SceneObject, Transform,
        DEFAULT_DIFFUSE_COLOR,
    },
};

/// Adds every model of an obj file to `scene` as a mesh object.
#[tracing::instrument(level = "info", skip(scene))]
pub fn load_obj_scene<P>(obj_file_path: P, scene: &mut Scene) -> anyhow::Result<Vec<ObjectKey>>
where
    P: AsRef<Path> + std::fmt::Debug,
{
    let obj_text = load_as_string(obj_file_path.as_ref())?;
    let base_dir = obj_file_path
        .as_ref()
        .parent()
        .unwrap_or_else(|| Path::new("."));

    load_obj_scene_from_str(&obj_text, base_dir, scene)
        .with_context(|| format!("failed to import {:?}", obj_file_path.as_ref()))
}

/// Adds the models of obj text to `scene`. Material libraries are looked up
/// relative to `base_dir`.
pub fn load_obj_scene_from_str(
    obj_text: &str,
    base_dir: &Path,
    scene: &mut Scene,
) -> anyhow::Result<Vec<ObjectKey>> {
    let mut obj_buf_reader = std::io::BufReader::new(std::io::Cursor::new(obj_text));

    // Polygons are kept as authored. Triangulation is a mesh modifier.
    let (obj_models, obj_materials) = tobj::load_obj_buf(
        &mut obj_buf_reader,
        &tobj::LoadOptions {
            triangulate: false,
            single_index: false,
            ..Default::default()
        },
        |mtl_file_path| match load_relative_as_string(base_dir, mtl_file_path) {
            Ok(mtl_text) => {
                tobj::load_mtl_buf(&mut std::io::BufReader::new(std::io::Cursor::new(mtl_text)))
            }
            Err(e) => {
                warn!("{e:#}");
                Err(tobj::LoadError::OpenFileFailed)
            }
        },
    )?;

    // Missing material libraries only cost the object its color.
    let materials: Vec<Material> = match obj_materials {
        Ok(obj_materials) => obj_materials.into_iter().map(create_material).collect(),
        Err(e) => {
            warn!("ignoring obj materials: {e}");
            Vec::new()
        }
    };

    let mut keys = Vec::with_capacity(obj_models.len());

    for model in obj_models {
        let mut mesh = create_mesh(&model.mesh)
            .with_context(|| format!("invalid geometry in obj model {}", model.name))?;

        if let Some(material) = model.mesh.material_id.and_then(|id| materials.get(id)) {
            mesh = mesh.with_material(material.clone());
        }

        debug!(
            "imported obj model {} with {} vertices and {} polygons",
            model.name,
            mesh.positions().len(),
            mesh.polygons().len()
        );

        keys.push(scene.add(SceneObject::new(
            model.name,
            Transform::default(),
            ObjectData::Mesh(mesh),
        )));
    }

    Ok(keys)
}

/// Creates a `Material` from an obj model's .mtl material.
fn create_material(mat: tobj::Material) -> Material {
    let diffuse_color = match mat.diffuse {
        Some(rgb) => Vec3::from(rgb).extend(mat.dissolve.unwrap_or(1.0)),
        None => DEFAULT_DIFFUSE_COLOR,
    };

    Material::new(mat.name, diffuse_color)
}

/// Convert tobj's flat buffers into mesh data.
fn create_mesh(obj_mesh: &tobj::Mesh) -> anyhow::Result<MeshData> {
    let positions: Vec<Vec3> = obj_mesh
        .positions
        .chunks_exact(3)
        .map(Vec3::from_slice)
        .collect();

    // tobj leaves `face_arities` empty when every face is a triangle.
    let polygons: Vec<Vec<u32>> = if obj_mesh.face_arities.is_empty() {
        obj_mesh
            .indices
            .chunks_exact(3)
            .map(<[u32]>::to_vec)
            .collect()
    } else {
        let mut next = 0;
        obj_mesh
            .face_arities
            .iter()
            .map(|arity| {
                let start = next;
                next += *arity as usize;
                obj_mesh.indices.get(start..next).unwrap_or_default().to_vec()
            })
            .collect()
    };

    Ok(MeshData::new(positions, polygons)?)
}

#[cfg(test)]
mod tests {
    use glam::Vec4;

    use super::*;

    const QUAD_AND_TRIANGLE: &str = "\
mtllib scene.mtl
o Floor
v 0 0 0
v 1 0 0
v 1 0 1
v 0 0 1
usemtl red
f 1 2 3 4
o Roof
v 0 2 0
v 1 2 0
v 0 2 1
f 5 6 7
";

    fn temp_dir(name: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("erpt-obj-{name}-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn mesh<'a>(scene: &'a Scene, key: ObjectKey) -> &'a MeshData {
        match &scene.get(key).unwrap().data {
            ObjectData::Mesh(mesh) => mesh,
            other => panic!("expected a mesh, got {other:?}"),
        }
    }

    #[test]
    fn import_models_as_mesh_objects() {
        let dir = temp_dir("models");
        std::fs::write(dir.join("scene.obj"), QUAD_AND_TRIANGLE).unwrap();
        std::fs::write(dir.join("scene.mtl"), "newmtl red\nKd 1 0 0\nd 0.5\n").unwrap();

        let mut scene = Scene::default();
        let keys = load_obj_scene(dir.join("scene.obj"), &mut scene).unwrap();
        std::fs::remove_dir_all(&dir).unwrap();

        assert_eq!(2, keys.len());
        assert_eq!("Floor", scene.get(keys[0]).unwrap().name);

        let floor = mesh(&scene, keys[0]);
        assert_eq!(4, floor.positions().len());
        assert_eq!(&[vec![0, 1, 2, 3]], floor.polygons());
        assert_eq!(Vec4::new(1.0, 0.0, 0.0, 0.5), floor.materials[0].diffuse_color);

        let roof = mesh(&scene, keys[1]);
        assert_eq!(3, roof.positions().len());
        assert_eq!(&[vec![0, 1, 2]], roof.polygons());
    }

    #[test]
    fn missing_material_library_is_not_fatal() {
        let dir = temp_dir("no-mtl");

        let mut scene = Scene::default();
        let keys = load_obj_scene_from_str(QUAD_AND_TRIANGLE, &dir, &mut scene).unwrap();
        std::fs::remove_dir_all(&dir).unwrap();

        assert_eq!(2, keys.len());
        assert!(mesh(&scene, keys[0]).materials.is_empty());
    }

    #[test]
    fn missing_obj_file_fails() {
        let mut scene = Scene::default();
        assert!(load_obj_scene("/definitely/not/here.obj", &mut scene).is_err());
        assert!(scene.is_empty());
    }
}
