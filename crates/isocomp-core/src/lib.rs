//! Core data model for isocomp-rs.
//!
//! This crate provides the types shared by the contouring and compositing stages:
//! - [`VolumeMesh`] and [`PolyData`] with named [`DataArray`] attributes
//! - [`IntervalTree`] and the [`DomainExtents`] view used to restrict domain loading
//! - [`RangeIndex`], the stabbing-query index behind both interval and range trees
//! - Configuration types and the [`IsocompError`] error type

// Documentation lints - internal functions don't need exhaustive panic/error docs
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
// Builder patterns return Self which doesn't need must_use
#![allow(clippy::must_use_candidate)]

pub mod attributes;
pub mod config;
pub mod error;
pub mod interval_tree;
pub mod poly;
pub mod range_index;
pub mod volume;

pub use attributes::{
    AttributeSet, Centering, DataArray, COLORS, GHOST_NODES, GHOST_ZONES, ORIGINAL_CELL_NUMBERS,
    ORIGINAL_NODE_NUMBERS,
};
pub use config::{
    ContourMethod, ContourSettings, IsovalueSpec, JsonConfig, LabelMode, RedistributeOptions,
    Scaling,
};
pub use error::{IsocompError, Result};
pub use interval_tree::{DomainExtents, IntervalTree};
pub use poly::{CellArray, CellKind, PolyCapacity, PolyData};
pub use range_index::RangeIndex;
pub use volume::{VolumeCell, VolumeGeometry, VolumeMesh};

// Re-export glam types for convenience
pub use glam::{Mat4, Vec3, Vec4};
