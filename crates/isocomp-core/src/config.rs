//! Configuration for isovalue selection, labelling and redistribution.

use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// How the isovalues of a contour request are chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ContourMethod {
    /// N levels spread across the value range.
    #[default]
    Levels,
    /// An explicit list of values.
    Values,
    /// Percentiles (0-100) of the value range.
    Percentiles,
}

/// Spacing of generated levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Scaling {
    /// Evenly spaced in value.
    #[default]
    Linear,
    /// Evenly spaced in log10 of the value.
    Log,
}

/// A request for isovalues on one variable.
///
/// Only the field matching [`method`](Self::method) is consulted: `n_levels` for
/// [`ContourMethod::Levels`], `values` for [`ContourMethod::Values`] and `percentiles`
/// for [`ContourMethod::Percentiles`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IsovalueSpec {
    /// Variable to contour. `None` uses the mesh's active scalars.
    pub variable: Option<String>,

    /// Selection method.
    pub method: ContourMethod,

    /// Number of levels for [`ContourMethod::Levels`].
    pub n_levels: usize,

    /// Explicit isovalues for [`ContourMethod::Values`].
    pub values: Vec<f64>,

    /// Percentiles for [`ContourMethod::Percentiles`].
    pub percentiles: Vec<f64>,

    /// User override of the data minimum.
    pub min: Option<f64>,

    /// User override of the data maximum.
    pub max: Option<f64>,

    /// Level spacing.
    pub scaling: Scaling,
}

impl Default for IsovalueSpec {
    fn default() -> Self {
        Self {
            variable: None,
            method: ContourMethod::Levels,
            n_levels: 10,
            values: Vec::new(),
            percentiles: Vec::new(),
            min: None,
            max: None,
            scaling: Scaling::Linear,
        }
    }
}

impl IsovalueSpec {
    /// Requests `n` levels across the value range.
    pub fn levels(n: usize) -> Self {
        Self {
            method: ContourMethod::Levels,
            n_levels: n,
            ..Self::default()
        }
    }

    /// Requests an explicit list of isovalues.
    pub fn values(values: impl Into<Vec<f64>>) -> Self {
        Self {
            method: ContourMethod::Values,
            values: values.into(),
            ..Self::default()
        }
    }

    /// Requests isovalues at the given percentiles of the value range.
    pub fn percentiles(percentiles: impl Into<Vec<f64>>) -> Self {
        Self {
            method: ContourMethod::Percentiles,
            percentiles: percentiles.into(),
            ..Self::default()
        }
    }

    /// Sets the contour variable.
    pub fn with_variable(mut self, name: impl Into<String>) -> Self {
        self.variable = Some(name.into());
        self
    }

    /// Overrides the data minimum.
    pub fn with_min(mut self, min: f64) -> Self {
        self.min = Some(min);
        self
    }

    /// Overrides the data maximum.
    pub fn with_max(mut self, max: f64) -> Self {
        self.max = Some(max);
        self
    }

    /// Switches to log spacing.
    pub fn with_log_scaling(mut self) -> Self {
        self.scaling = Scaling::Log;
        self
    }

    /// Returns true when the resolved value range is needed to produce isovalues.
    pub fn needs_extents(&self) -> bool {
        self.method != ContourMethod::Values
    }

    /// Returns true when both bounds are user supplied.
    pub fn has_user_extents(&self) -> bool {
        self.min.is_some() && self.max.is_some()
    }
}

/// How output fragments are labelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum LabelMode {
    /// One label per isovalue, formatted from the value.
    #[default]
    PerIsovalue,
    /// The same caller-supplied label on every fragment.
    Fixed(String),
}

/// Settings for one isosurface stage instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContourSettings {
    /// Isovalue request.
    pub isovalues: IsovalueSpec,

    /// Fragment labelling, fixed for the lifetime of the stage.
    pub labels: LabelMode,
}

/// Options for image-space redistribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedistributeOptions {
    /// Destination buffers with fewer cells than this duplicate points per cell;
    /// larger buffers share the input points and drop the unreferenced ones.
    pub point_dedup_threshold: usize,

    /// Skip cells whose points are all fully transparent.
    pub skip_transparent: bool,
}

impl Default for RedistributeOptions {
    fn default() -> Self {
        Self {
            point_dedup_threshold: 10_000,
            skip_transparent: true,
        }
    }
}

/// JSON loading and saving for configuration types.
pub trait JsonConfig: Serialize + DeserializeOwned {
    /// Parses a configuration from a JSON string.
    fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads a configuration from a JSON file.
    fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Serializes the configuration as pretty-printed JSON.
    fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl JsonConfig for IsovalueSpec {}
impl JsonConfig for ContourSettings {}
impl JsonConfig for RedistributeOptions {}
