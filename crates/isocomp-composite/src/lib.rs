//! Image-space redistribution for parallel transparency compositing.
//!
//! Each rank owns a horizontal band of the output image. [`ImageSpaceRedistributor`]
//! projects the local polygon geometry with the current [`Camera`], assigns every cell to
//! the bands it overlaps and exchanges the cells over a [`Communicator`].

// Documentation lints - internal functions don't need exhaustive panic/error docs
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
// Point ids are u32 on the wire and in cell arrays
#![allow(clippy::cast_possible_truncation)]

pub mod bands;
pub mod camera;
pub mod comm;
pub mod redistribute;
pub mod wire;

pub use bands::{BandPartition, Destination};
pub use camera::{Camera, DisplayTransform, ProjectionMode, RenderContext, Viewport};
pub use comm::{Communicator, SelfComm, ThreadComm};
pub use redistribute::{DestinationBuffers, ImageSpaceRedistributor, RedistributeStats};
