// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Material descriptions and the exact-color partition key

use serde::{Deserialize, Serialize};

/// RGBA color in 0-1 range as delivered by the geometry kernel
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rgba {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Rgba {
    #[inline]
    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// Exact bucket key for this color
    #[inline]
    pub fn key(&self) -> ColorKey {
        ColorKey::from(*self)
    }
}

impl From<[f32; 4]> for Rgba {
    fn from(c: [f32; 4]) -> Self {
        Self::new(c[0], c[1], c[2], c[3])
    }
}

/// Bit-exact color key. Two fragments share a bucket only when all four
/// channels are bitwise identical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ColorKey([u32; 4]);

impl From<Rgba> for ColorKey {
    fn from(c: Rgba) -> Self {
        // Collapse -0.0 onto 0.0 so the two zeros never split a bucket
        let bits = |v: f32| if v == 0.0 { 0 } else { v.to_bits() };
        Self([bits(c.r), bits(c.g), bits(c.b), bits(c.a)])
    }
}

impl std::fmt::Display for ColorKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let [r, g, b, a] = self.0.map(f32::from_bits);
        write!(f, "{}-{}-{}-{}", r, g, b, a)
    }
}

/// Render material for one bucket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Material {
    pub color: Rgba,
    pub opacity: f32,
    pub transparent: bool,
    pub double_sided: bool,
}

impl Material {
    /// Build the bucket material for a kernel color.
    ///
    /// Opacity follows alpha; any alpha other than 1 marks the material
    /// transparent. Kernel geometry has no reliable winding, so every
    /// bucket material renders both faces.
    pub fn from_color(color: Rgba) -> Self {
        Self {
            color,
            opacity: color.a,
            transparent: color.a != 1.0,
            double_sided: true,
        }
    }
}
