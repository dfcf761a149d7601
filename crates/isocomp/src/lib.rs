//! isocomp-rs: parallel isosurface extraction and image-space compositing.
//!
//! Every rank of an SPMD job holds some spatial domains of a volume mesh. The pipeline
//! contours them and then redistributes the resulting polygons so that each rank ends up
//! with all geometry covering its own horizontal band of the image.
//!
//! # Quick Start
//!
//! ```no_run
//! use isocomp::*;
//!
//! fn main() -> Result<()> {
//!     init_logging();
//!
//!     let mut mesh = VolumeMesh::uniform([16, 16, 16], Vec3::ZERO, Vec3::splat(0.1));
//!     let field = (0..mesh.num_points())
//!         .map(|i| (mesh.point(i) - Vec3::splat(0.75)).length())
//!         .collect();
//!     mesh.add_point_scalars("distance", field)?;
//!
//!     let config = PipelineConfig {
//!         contour: ContourSettings {
//!             isovalues: IsovalueSpec::values(vec![0.3, 0.5]),
//!             ..ContourSettings::default()
//!         },
//!         opacity: 0.5,
//!         ..PipelineConfig::default()
//!     };
//!     let context = RenderContext::new(Camera::default(), Viewport::new(800, 600));
//!     let output = RankPipeline::new(config).run(
//!         &[LocalDomain::new(0, mesh)],
//!         None,
//!         &context,
//!         &SelfComm,
//!     )?;
//!     println!("{} cells to composite", output.surface.num_cells());
//!     Ok(())
//! }
//! ```
//!
//! # Crates
//!
//! - [`isocomp_core`]: mesh model, configuration, interval tree, errors
//! - [`isocomp_contour`]: isovalue planning and the isosurface stage
//! - [`isocomp_composite`]: band partition, wire format, transports and redistribution

#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]

pub mod color;
pub mod pipeline;

pub use color::ColorMap;
pub use pipeline::{global_extents, LocalDomain, PipelineConfig, PipelineOutput, RankPipeline};

// Re-export core types
pub use isocomp_core::{
    AttributeSet, CellArray, CellKind, Centering, ContourMethod, ContourSettings, DataArray,
    DomainExtents, IntervalTree, IsocompError, IsovalueSpec, JsonConfig, LabelMode, Mat4,
    PolyData, RangeIndex, RedistributeOptions, Result, Scaling, Vec3, Vec4, VolumeCell,
    VolumeMesh, COLORS, GHOST_NODES, GHOST_ZONES, ORIGINAL_CELL_NUMBERS, ORIGINAL_NODE_NUMBERS,
};

// Re-export the isosurface stage
pub use isocomp_contour::{
    extract_isosurfaces, plan_contract, resolve_isovalues, scan_extents, CandidateCells,
    ContourPrimitive, ContractPlan, DomainRestriction, ExtractOutput, ExtractorState, Fragment,
    IsosurfaceExtractor, LabeledFragmentCollection, MarchingCells, ResolvedIsovalues,
    ScalarRangeTree,
};

// Re-export compositing types
pub use isocomp_composite::{
    BandPartition, Camera, Communicator, Destination, ImageSpaceRedistributor, ProjectionMode,
    RedistributeStats, RenderContext, SelfComm, ThreadComm, Viewport,
};

/// Installs the `env_logger` logger, configured by `RUST_LOG`.
///
/// Safe to call more than once; only the first call has an effect.
pub fn init_logging() {
    let _ = env_logger::try_init();
    log::debug!("isocomp-rs {} logging initialized", env!("CARGO_PKG_VERSION"));
}
