//! Byte level encoding of everything that crosses the bridge socket.
mod frame;
mod pixels;

pub use frame::*;
pub use pixels::*;

use thiserror::Error;

use crate::snapshot::{Resolution, SceneSnapshot};

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("failed to serialize scene snapshot: {0}")]
    Serialize(#[source] serde_json::Error),
    #[error("failed to parse scene snapshot: {0}")]
    Deserialize(#[source] serde_json::Error),
    #[error("frame does not start with a length prefix")]
    MissingLengthPrefix,
    #[error("frame length prefix {0:?} is not a valid length")]
    InvalidLengthPrefix(String),
    #[error("frame declares a {declared} byte payload but carries {actual} bytes")]
    FrameLengthMismatch { declared: usize, actual: usize },
    #[error("pixel payload is not valid utf8: {0}")]
    PixelsNotUtf8(#[from] std::str::Utf8Error),
    #[error("pixel payload is not a json array of numbers: {0}")]
    MalformedPixels(#[source] serde_json::Error),
    #[error("expected {expected} pixel channel values for a {resolution} image but received {actual}")]
    PixelCountMismatch {
        resolution: Resolution,
        expected: usize,
        actual: usize,
    },
}

/// Serialize `snapshot` to compact JSON. Identical snapshots always produce
/// identical bytes.
pub fn encode_snapshot(snapshot: &SceneSnapshot) -> Result<Vec<u8>, CodecError> {
    serde_json::to_vec(snapshot).map_err(CodecError::Serialize)
}

pub fn decode_snapshot(payload: &[u8]) -> Result<SceneSnapshot, CodecError> {
    serde_json::from_slice(payload).map_err(CodecError::Deserialize)
}

/// Serialize `snapshot` and wrap it in an outbound wire frame.
pub fn encode_snapshot_frame(snapshot: &SceneSnapshot) -> Result<Vec<u8>, CodecError> {
    Ok(encode_frame(&encode_snapshot(snapshot)?))
}

/// Build the payload of the legacy protocol: the resolution as plain ASCII
/// `"<width> <height>"` sent without a frame.
pub fn encode_legacy_resolution(resolution: Resolution) -> Vec<u8> {
    format!("{} {}", resolution.width(), resolution.height()).into_bytes()
}

#[cfg(test)]
mod tests {
    use glam::Vec3;

    use super::*;
    use crate::snapshot::{
        CameraRecord, FaceRecord, LightRecord, LightType, MeshRecord, RecordKind, Topology,
    };

    fn triangle_snapshot() -> SceneSnapshot {
        let mut snapshot = SceneSnapshot::new(Resolution::new(4, 3).unwrap());
        snapshot.scene.meshes.push(MeshRecord {
            vertices: vec![
                Vec3::new(0.0, 0.0, 0.0),
                Vec3::new(1.0, 0.0, 0.0),
                Vec3::new(0.0, 1.0, 0.0),
            ],
            topology: Topology::Indices(vec![vec![0, 1, 2]]),
            color: None,
            kind: RecordKind::Mesh,
        });
        snapshot
    }

    #[test]
    fn triangle_scene_frame_prefix_matches_payload() {
        let snapshot = triangle_snapshot();
        let payload = encode_snapshot(&snapshot).unwrap();
        let frame = encode_snapshot_frame(&snapshot).unwrap();

        let json: serde_json::Value = serde_json::from_slice(&payload).unwrap();
        assert_eq!(serde_json::json!([4, 3]), json["RESOLUTION"]);
        assert_eq!(
            serde_json::json!([[0, 1, 2]]),
            json["SCENE"]["MESHES"][0]["INDICES"]
        );
        assert!(json["SCENE"].get("CAMERA").is_none());
        assert!(json["SCENE"].get("LIGHTS").is_none());

        let prefix = reverse_digits(payload.len());
        assert!(frame.starts_with(prefix.as_bytes()));
        assert_eq!(payload.as_slice(), &frame[prefix.len()..]);
        assert_eq!(payload.as_slice(), decode_frame(&frame).unwrap());
    }

    #[test]
    fn encoding_is_deterministic() {
        let snapshot = triangle_snapshot();
        assert_eq!(
            encode_snapshot(&snapshot).unwrap(),
            encode_snapshot(&snapshot.clone()).unwrap()
        );
    }

    #[test]
    fn full_snapshot_survives_encoding() {
        let mut snapshot = triangle_snapshot();
        snapshot.scene.meshes.push(MeshRecord {
            vertices: vec![Vec3::ZERO, Vec3::X, Vec3::Y, Vec3::new(0.1, 0.2, 0.3)],
            topology: Topology::Faces(vec![FaceRecord {
                normal: Vec3::Z,
                vertices: vec![0, 1, 2, 3],
            }]),
            color: Some(glam::Vec4::new(0.5, 0.25, 0.125, 1.0)),
            kind: RecordKind::Light,
        });
        snapshot.scene.lights.push(LightRecord {
            light_type: LightType::Spot,
            location: Vec3::new(1.5, -2.0, 3.25),
            color: Vec3::ONE,
            energy: 100.0,
        });
        snapshot.scene.camera = Some(CameraRecord {
            location: Vec3::new(0.0, -10.0, 2.0),
            rotation: Vec3::new(1.3, 0.0, 0.1),
            direction: Vec3::NEG_Z,
            up: Vec3::Y,
            fov: 0.691_111_4,
            clip: (0.1, 100.0),
        });

        let decoded = decode_snapshot(&encode_snapshot(&snapshot).unwrap()).unwrap();
        assert_eq!(snapshot, decoded);
    }

    #[test]
    fn field_names_follow_renderer_contract() {
        let mut snapshot = triangle_snapshot();
        snapshot.scene.lights.push(LightRecord {
            light_type: LightType::Point,
            location: Vec3::ZERO,
            color: Vec3::ONE,
            energy: 10.0,
        });

        let json: serde_json::Value =
            serde_json::from_slice(&encode_snapshot(&snapshot).unwrap()).unwrap();
        let light = &json["SCENE"]["LIGHTS"][0];

        assert_eq!("POINT", light["TYPE"]);
        assert_eq!(serde_json::json!([0.0, 0.0, 0.0]), light["LOCATION"]);
        assert_eq!(0, json["SCENE"]["MESHES"][0]["KIND"]);
    }

    #[test]
    fn legacy_resolution_is_plain_text() {
        let payload = encode_legacy_resolution(Resolution::new(1920, 1080).unwrap());
        assert_eq!(b"1920 1080".as_slice(), payload.as_slice());
    }
}
