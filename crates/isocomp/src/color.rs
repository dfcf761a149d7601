//! Isovalue coloring.

use glam::{Vec3, Vec4};
use serde::{Deserialize, Serialize};

/// Built-in color maps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ColorMap {
    #[default]
    Viridis,
    Coolwarm,
    Rainbow,
}

const VIRIDIS: &[[f32; 3]] = &[
    [0.267, 0.004, 0.329],
    [0.282, 0.140, 0.457],
    [0.253, 0.265, 0.529],
    [0.206, 0.371, 0.553],
    [0.163, 0.471, 0.558],
    [0.127, 0.566, 0.550],
    [0.134, 0.658, 0.517],
    [0.266, 0.749, 0.440],
    [0.477, 0.821, 0.318],
    [0.741, 0.873, 0.150],
    [0.993, 0.906, 0.144],
];

const COOLWARM: &[[f32; 3]] = &[
    [0.230, 0.299, 0.754],
    [0.552, 0.690, 0.996],
    [0.866, 0.866, 0.866],
    [0.956, 0.604, 0.486],
    [0.706, 0.016, 0.150],
];

const RAINBOW: &[[f32; 3]] = &[
    [0.5, 0.0, 1.0],
    [0.0, 0.0, 1.0],
    [0.0, 1.0, 1.0],
    [0.0, 1.0, 0.0],
    [1.0, 1.0, 0.0],
    [1.0, 0.0, 0.0],
];

impl ColorMap {
    fn samples(self) -> &'static [[f32; 3]] {
        match self {
            Self::Viridis => VIRIDIS,
            Self::Coolwarm => COOLWARM,
            Self::Rainbow => RAINBOW,
        }
    }

    /// Samples the color map at `t` in `[0, 1]`.
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn sample(self, t: f32) -> Vec3 {
        let colors = self.samples();
        let t = if t.is_nan() { 0.0 } else { t.clamp(0.0, 1.0) };
        let n = colors.len() - 1;
        let idx = ((t * n as f32).floor() as usize).min(n - 1);
        let frac = t * n as f32 - idx as f32;
        Vec3::from(colors[idx]).lerp(Vec3::from(colors[idx + 1]), frac)
    }

    /// Color of isovalue `index` out of `count`, spread evenly over the map.
    #[allow(clippy::cast_precision_loss)]
    pub fn isovalue_color(self, index: usize, count: usize, opacity: f32) -> Vec4 {
        let t = if count <= 1 {
            0.5
        } else {
            index as f32 / (count - 1) as f32
        };
        self.sample(t).extend(opacity.clamp(0.0, 1.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoints() {
        assert_eq!(ColorMap::Viridis.sample(0.0), Vec3::new(0.267, 0.004, 0.329));
        let end = ColorMap::Coolwarm.sample(1.0);
        assert!((end - Vec3::new(0.706, 0.016, 0.150)).length() < 1e-6);
        assert_eq!(ColorMap::Rainbow.sample(-3.0), Vec3::new(0.5, 0.0, 1.0));
    }

    #[test]
    fn test_isovalue_color() {
        let single = ColorMap::Coolwarm.isovalue_color(0, 1, 0.5);
        assert!((single.truncate() - Vec3::splat(0.866)).length() < 1e-6);
        assert_eq!(single.w, 0.5);
        assert_eq!(
            ColorMap::Viridis.isovalue_color(2, 3, 2.0),
            ColorMap::Viridis.sample(1.0).extend(1.0)
        );
    }
}
