//! Loading host scenes from content files on disk.
mod obj_model;

pub use obj_model::*;
