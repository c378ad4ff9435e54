//! Renders host scenes with an external path tracer.
//!
//! A render request captures the scene into a `SceneSnapshot`, sends it framed
//! over a loopback TCP connection to the external renderer and reads back a
//! flat RGBA float image, which is copied into the host's result image.
pub mod assembler;
pub mod bridge;
pub mod camera;
pub mod codec;
pub mod config;
pub mod content;
pub mod engine;
pub mod math_utils;
pub mod platform;
pub mod scene;
pub mod snapshot;

pub use engine::{RenderEngine, RenderError};
