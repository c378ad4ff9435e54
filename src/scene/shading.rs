use glam::{Vec3, Vec4};

pub const DEFAULT_DIFFUSE_COLOR: Vec4 = Vec4::new(0.8, 0.8, 0.8, 1.0);

#[derive(Clone, Debug, PartialEq)]
pub struct Material {
    pub name: String,
    /// Base diffuse color with alpha.
    pub diffuse_color: Vec4,
}

impl Material {
    pub fn new(name: impl Into<String>, diffuse_color: Vec4) -> Self {
        Self {
            name: name.into(),
            diffuse_color,
        }
    }
}

impl Default for Material {
    fn default() -> Self {
        Self::new("Material", DEFAULT_DIFFUSE_COLOR)
    }
}

/// The kinds of light the host supports.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LightKind {
    Point,
    Sun,
    Spot,
    Area,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Light {
    pub kind: LightKind,
    /// The color of the light.
    pub color: Vec3,
    /// Emitted power. Watts for point, spot and area lights, irradiance for sun
    /// lights.
    pub energy: f32,
}

pub struct LightBuilder {
    light: Light,
}

impl LightBuilder {
    pub fn new(kind: LightKind) -> Self {
        LightBuilder {
            light: Light {
                kind,
                color: Vec3::ONE,
                energy: match kind {
                    LightKind::Sun => 1.0,
                    _ => 1000.0,
                },
            },
        }
    }

    pub fn build(self) -> Light {
        self.light
    }

    pub fn color(mut self, color: Vec3) -> Self {
        self.light.color = color;
        self
    }

    pub fn energy(mut self, energy: f32) -> Self {
        self.light.energy = energy;
        self
    }
}
