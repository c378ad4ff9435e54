//! Serializable description of a scene at the moment a render is requested.
//!
//! Field names follow the external renderer's JSON contract. Vector types use
//! glam's serde support which writes them as plain number arrays.
mod builder;

pub use builder::*;

use glam::{Vec3, Vec4};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Output image size in pixels. Both axes are always larger than zero.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "(u32, u32)", into = "(u32, u32)")]
pub struct Resolution {
    width: u32,
    height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Result<Self, InvalidResolution> {
        if width > 0 && height > 0 {
            Ok(Self { width, height })
        } else {
            Err(InvalidResolution(width, height))
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Number of `f32` channel values in an RGBA image of this size.
    pub fn channel_count(&self) -> usize {
        self.width as usize * self.height as usize * 4
    }
}

impl TryFrom<(u32, u32)> for Resolution {
    type Error = InvalidResolution;

    fn try_from((width, height): (u32, u32)) -> Result<Self, Self::Error> {
        Self::new(width, height)
    }
}

impl From<Resolution> for (u32, u32) {
    fn from(resolution: Resolution) -> Self {
        (resolution.width, resolution.height)
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("render resolution width and height must be larger than zero but width was {} and height was {}", .0, .1)]
pub struct InvalidResolution(pub u32, pub u32);

/// Root value sent to the external renderer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub struct SceneSnapshot {
    pub resolution: Resolution,
    pub scene: SceneContents,
}

impl SceneSnapshot {
    pub fn new(resolution: Resolution) -> Self {
        Self {
            resolution,
            scene: SceneContents::default(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub struct SceneContents {
    pub meshes: Vec<MeshRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub lights: Vec<LightRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub camera: Option<CameraRecord>,
}

/// Whether a mesh record is a renderable surface or a proxy light.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum RecordKind {
    Mesh = 0,
    Light = 1,
}

impl From<RecordKind> for u8 {
    fn from(kind: RecordKind) -> Self {
        kind as u8
    }
}

impl TryFrom<u8> for RecordKind {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(RecordKind::Mesh),
            1 => Ok(RecordKind::Light),
            other => Err(format!("unknown mesh kind {other}")),
        }
    }
}

/// A polygon with its world space normal.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub struct FaceRecord {
    pub normal: Vec3,
    pub vertices: Vec<u32>,
}

/// How a mesh record lists its polygons.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Topology {
    Indices(Vec<Vec<u32>>),
    Faces(Vec<FaceRecord>),
}

impl Topology {
    /// Iterate over the vertex indices of every polygon.
    pub fn polygons(&self) -> Box<dyn Iterator<Item = &[u32]> + '_> {
        match self {
            Topology::Indices(polygons) => Box::new(polygons.iter().map(Vec::as_slice)),
            Topology::Faces(faces) => Box::new(faces.iter().map(|f| f.vertices.as_slice())),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub struct MeshRecord {
    /// World space vertex positions.
    pub vertices: Vec<Vec3>,
    #[serde(flatten)]
    pub topology: Topology,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<Vec4>,
    pub kind: RecordKind,
}

impl MeshRecord {
    /// Returns `true` if every polygon index refers to an existing vertex.
    pub fn indices_in_range(&self) -> bool {
        let count = self.vertices.len();
        self.topology
            .polygons()
            .all(|polygon| polygon.iter().all(|&i| (i as usize) < count))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LightType {
    Point,
    Sun,
    Spot,
    Area,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub struct LightRecord {
    #[serde(rename = "TYPE")]
    pub light_type: LightType,
    pub location: Vec3,
    pub color: Vec3,
    pub energy: f32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub struct CameraRecord {
    pub location: Vec3,
    /// XYZ Euler angles in radians.
    pub rotation: Vec3,
    pub direction: Vec3,
    pub up: Vec3,
    /// Field of view in radians.
    pub fov: f32,
    /// Near and far clip distances.
    pub clip: (f32, f32),
}
