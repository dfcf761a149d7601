//! Per-domain scalar extents.

use crate::error::{IsocompError, Result};
use crate::range_index::RangeIndex;
use crate::volume::VolumeMesh;

/// Read-only view of per-domain value extents for one variable.
///
/// Implemented by [`IntervalTree`]; metadata servers may provide their own.
pub trait DomainExtents {
    /// Number of components of the indexed variable.
    fn dimension(&self) -> usize;

    /// Number of domains the extents cover.
    fn num_domains(&self) -> usize;

    /// Union of all domain extents, or `None` when unknown.
    fn global_extents(&self) -> Option<(f64, f64)>;

    /// Domains whose `[min, max]` contains `value`, ascending.
    fn domains_overlapping(&self, value: f64) -> Vec<usize>;
}

/// Interval tree over per-domain `[min, max]` extents of a scalar variable.
#[derive(Debug, Clone)]
pub struct IntervalTree {
    variable: String,
    index: RangeIndex,
}

impl IntervalTree {
    /// Builds the tree; `extents[d]` is the range of domain `d`.
    pub fn new(variable: impl Into<String>, extents: Vec<[f64; 2]>) -> Self {
        Self {
            variable: variable.into(),
            index: RangeIndex::build(extents),
        }
    }

    /// Builds the tree by scanning `variable` on every domain mesh.
    ///
    /// A domain without values gets a never-matching range.
    pub fn from_domains<'a>(
        variable: &str,
        domains: impl IntoIterator<Item = &'a VolumeMesh>,
    ) -> Result<Self> {
        let mut extents = Vec::new();
        for mesh in domains {
            let array = mesh
                .point_data()
                .get(variable)
                .or_else(|| mesh.cell_data().get(variable))
                .ok_or_else(|| IsocompError::VariableNotFound(variable.to_string()))?;
            extents.push(
                array
                    .range()
                    .map_or([f64::NAN, f64::NAN], |(lo, hi)| [f64::from(lo), f64::from(hi)]),
            );
        }
        log::debug!(
            "built interval tree for '{variable}' over {} domains",
            extents.len()
        );
        Ok(Self::new(variable, extents))
    }

    /// Name of the indexed variable.
    pub fn variable(&self) -> &str {
        &self.variable
    }

    /// Extents of domain `d`.
    pub fn domain_extents(&self, d: usize) -> [f64; 2] {
        self.index.range(d)
    }
}

impl DomainExtents for IntervalTree {
    fn dimension(&self) -> usize {
        1
    }

    fn num_domains(&self) -> usize {
        self.index.len()
    }

    fn global_extents(&self) -> Option<(f64, f64)> {
        self.index.extents()
    }

    fn domains_overlapping(&self, value: f64) -> Vec<usize> {
        let mut hits = Vec::new();
        self.index.stab(value, &mut hits);
        hits.into_iter().map(|d| d as usize).collect()
    }
}
