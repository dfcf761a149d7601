//! Isosurface stage for isocomp-rs.
//!
//! - [`planner`] resolves isovalues and the set of domains that must be loaded
//! - [`marching`] contours hexahedra and tetrahedra at one isovalue
//! - [`range_tree`] skips cells that cannot be crossed when several isovalues are requested
//! - [`extractor`] ties these together into the per-execution [`IsosurfaceExtractor`]

// Documentation lints - internal functions don't need exhaustive panic/error docs
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
// Mesh indices are u32 throughout
#![allow(clippy::cast_possible_truncation)]

pub mod extractor;
pub mod marching;
pub mod planner;
pub mod range_tree;
pub mod recenter;

pub use extractor::{
    extract_isosurfaces, scan_extents, ExtractOutput, ExtractorState, Fragment,
    IsosurfaceExtractor, LabeledFragmentCollection,
};
pub use marching::{CandidateCells, ContourPrimitive, MarchingCells};
pub use planner::{
    format_general, generate_levels, generate_percentiles, plan_contract, resolve_isovalues,
    restrict_domains, ContractPlan, DomainRestriction, ResolvedIsovalues,
};
pub use range_tree::ScalarRangeTree;
pub use recenter::recenter_to_nodes;
