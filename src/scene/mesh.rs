use std::{cell::Cell, ops::Deref};

use glam::Vec3;
use thiserror::Error;

use super::shading::Material;

/// An axis used by mesh modifiers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
    Z,
}

/// Modifiers are applied in order when a mesh is evaluated and never change
/// the source mesh data.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Modifier {
    /// Split every polygon with more than three corners into a triangle fan.
    Triangulate,
    /// Append a copy of the mesh reflected across the plane orthogonal to the
    /// given local axis.
    Mirror(Axis),
}

/// Mesh data owned by a mesh object in the host scene. Positions are in the
/// object's local space.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MeshData {
    positions: Vec<Vec3>,
    polygons: Vec<Vec<u32>>,
    pub materials: Vec<Material>,
    pub modifiers: Vec<Modifier>,
}

impl MeshData {
    /// Create mesh data from local space `positions` and `polygons` indexing
    /// into them.
    pub fn new(positions: Vec<Vec3>, polygons: Vec<Vec<u32>>) -> Result<Self, InvalidMesh> {
        for (polygon_index, polygon) in polygons.iter().enumerate() {
            if polygon.len() < 3 {
                return Err(InvalidMesh::TooFewCorners(polygon_index, polygon.len()));
            }

            if let Some(&i) = polygon.iter().find(|&&i| i as usize >= positions.len()) {
                return Err(InvalidMesh::IndexOutOfRange(polygon_index, i, positions.len()));
            }
        }

        Ok(Self {
            positions,
            polygons,
            materials: Vec::new(),
            modifiers: Vec::new(),
        })
    }

    pub fn with_material(mut self, material: Material) -> Self {
        self.materials.push(material);
        self
    }

    pub fn with_modifier(mut self, modifier: Modifier) -> Self {
        self.modifiers.push(modifier);
        self
    }

    pub fn positions(&self) -> &[Vec3] {
        &self.positions
    }

    pub fn polygons(&self) -> &[Vec<u32>] {
        &self.polygons
    }

    /// Produce the final geometry with every modifier applied.
    fn evaluate(&self) -> Geometry {
        let mut geometry = Geometry {
            positions: self.positions.clone(),
            polygons: self.polygons.clone(),
        };

        for modifier in &self.modifiers {
            match modifier {
                Modifier::Triangulate => geometry.triangulate(),
                Modifier::Mirror(axis) => geometry.mirror(*axis),
            }
        }

        geometry
    }
}

/// Final post-modifier geometry of a mesh in local space.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Geometry {
    pub positions: Vec<Vec3>,
    pub polygons: Vec<Vec<u32>>,
}

impl Geometry {
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty() || self.polygons.is_empty()
    }

    fn triangulate(&mut self) {
        self.polygons = self
            .polygons
            .iter()
            .flat_map(|polygon| {
                (1..polygon.len() - 1).map(move |i| vec![polygon[0], polygon[i], polygon[i + 1]])
            })
            .collect();
    }

    fn mirror(&mut self, axis: Axis) {
        let offset = self.positions.len() as u32;
        let scale = match axis {
            Axis::X => Vec3::new(-1.0, 1.0, 1.0),
            Axis::Y => Vec3::new(1.0, -1.0, 1.0),
            Axis::Z => Vec3::new(1.0, 1.0, -1.0),
        };

        let mirrored: Vec<Vec3> = self.positions.iter().map(|p| *p * scale).collect();
        self.positions.extend(mirrored);

        // Reflection flips handedness so winding is reversed to keep the
        // mirrored faces pointing outward.
        let mirrored: Vec<Vec<u32>> = self
            .polygons
            .iter()
            .map(|polygon| polygon.iter().rev().map(|i| i + offset).collect())
            .collect();
        self.polygons.extend(mirrored);
    }
}

/// Evaluated geometry borrowed from the scene's evaluation cache. The geometry
/// is released back to the scene when this guard is dropped.
pub struct EvaluatedMesh<'a> {
    geometry: Geometry,
    live_evaluations: &'a Cell<usize>,
}

impl<'a> EvaluatedMesh<'a> {
    pub(super) fn acquire(mesh: &MeshData, live_evaluations: &'a Cell<usize>) -> Self {
        live_evaluations.set(live_evaluations.get() + 1);

        Self {
            geometry: mesh.evaluate(),
            live_evaluations,
        }
    }
}

impl Deref for EvaluatedMesh<'_> {
    type Target = Geometry;

    fn deref(&self) -> &Self::Target {
        &self.geometry
    }
}

impl Drop for EvaluatedMesh<'_> {
    fn drop(&mut self) {
        self.live_evaluations
            .set(self.live_evaluations.get().saturating_sub(1));
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum InvalidMesh {
    #[error("polygon {0} has {1} corners but at least 3 are required")]
    TooFewCorners(usize, usize),
    #[error("polygon {0} references vertex {1} but the mesh only has {2} vertices")]
    IndexOutOfRange(usize, u32, usize),
}
