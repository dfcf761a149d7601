//! Named attribute arrays attached to points or cells.

use serde::{Deserialize, Serialize};

use crate::error::{IsocompError, Result};

/// Ghost flag per cell (non-zero marks a duplicated boundary cell).
pub const GHOST_ZONES: &str = "ghost_zones";
/// Ghost flag per point.
pub const GHOST_NODES: &str = "ghost_nodes";
/// Cell ids in the originating mesh.
pub const ORIGINAL_CELL_NUMBERS: &str = "original_cell_numbers";
/// Point ids in the originating mesh.
pub const ORIGINAL_NODE_NUMBERS: &str = "original_node_numbers";
/// RGBA point colors, 4 components in `[0, 1]`.
pub const COLORS: &str = "colors";

/// Where an attribute array lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Centering {
    /// One tuple per point.
    Node,
    /// One tuple per cell.
    Cell,
}

/// A named array of `components`-wide tuples.
#[derive(Debug, Clone, PartialEq)]
pub struct DataArray {
    name: String,
    components: usize,
    values: Vec<f32>,
}

impl DataArray {
    /// Creates an array. `values.len()` must be a multiple of `components`.
    pub fn new(name: impl Into<String>, components: usize, values: Vec<f32>) -> Result<Self> {
        let components = components.max(1);
        if values.len() % components != 0 {
            return Err(IsocompError::SizeMismatch {
                expected: values.len().next_multiple_of(components),
                actual: values.len(),
            });
        }
        Ok(Self {
            name: name.into(),
            components,
            values,
        })
    }

    /// Creates a single-component array.
    pub fn scalars(name: impl Into<String>, values: Vec<f32>) -> Self {
        Self {
            name: name.into(),
            components: 1,
            values,
        }
    }

    /// Creates an empty array with room for `tuples` tuples.
    pub fn with_capacity(name: impl Into<String>, components: usize, tuples: usize) -> Self {
        let components = components.max(1);
        Self {
            name: name.into(),
            components,
            values: Vec::with_capacity(tuples * components),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn components(&self) -> usize {
        self.components
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn values_mut(&mut self) -> &mut Vec<f32> {
        &mut self.values
    }

    /// Returns the number of tuples.
    pub fn len(&self) -> usize {
        self.values.len() / self.components
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns tuple `i`.
    pub fn tuple(&self, i: usize) -> &[f32] {
        &self.values[i * self.components..(i + 1) * self.components]
    }

    /// Appends tuple `i` of `other` (same width).
    pub fn push_tuple_from(&mut self, other: &DataArray, i: usize) {
        self.values.extend_from_slice(other.tuple(i));
    }

    /// Appends a tuple.
    pub fn push_tuple(&mut self, tuple: &[f32]) {
        debug_assert_eq!(tuple.len(), self.components);
        self.values.extend_from_slice(tuple);
    }

    /// Appends `lerp(a, b, t)` of two tuples of `source`.
    pub fn push_interpolated(&mut self, source: &DataArray, a: usize, b: usize, t: f32) {
        let (ta, tb) = (source.tuple(a), source.tuple(b));
        self.values
            .extend(ta.iter().zip(tb).map(|(&va, &vb)| va + t * (vb - va)));
    }

    /// Returns `(min, max)` over all values, or `None` if empty.
    pub fn range(&self) -> Option<(f32, f32)> {
        self.values.iter().fold(None, |acc, &v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
    }
}

/// An ordered collection of named arrays sharing one tuple count.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttributeSet {
    arrays: Vec<DataArray>,
    active_scalars: Option<String>,
}

impl AttributeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an array, replacing any array of the same name.
    pub fn insert(&mut self, array: DataArray) {
        match self.arrays.iter_mut().find(|a| a.name == array.name) {
            Some(slot) => *slot = array,
            None => self.arrays.push(array),
        }
    }

    pub fn get(&self, name: &str) -> Option<&DataArray> {
        self.arrays.iter().find(|a| a.name == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut DataArray> {
        self.arrays.iter_mut().find(|a| a.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Removes and returns the named array.
    pub fn remove(&mut self, name: &str) -> Option<DataArray> {
        let idx = self.arrays.iter().position(|a| a.name == name)?;
        if self.active_scalars.as_deref() == Some(name) {
            self.active_scalars = None;
        }
        Some(self.arrays.remove(idx))
    }

    pub fn iter(&self) -> impl Iterator<Item = &DataArray> {
        self.arrays.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut DataArray> {
        self.arrays.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.arrays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arrays.is_empty()
    }

    /// Returns the designated active scalar array name.
    pub fn active_scalars(&self) -> Option<&str> {
        self.active_scalars.as_deref()
    }

    /// Designates the active scalar array.
    pub fn set_active_scalars(&mut self, name: Option<String>) {
        self.active_scalars = name;
    }

    /// Returns an empty set with the same array names and widths, sized for `tuples`.
    pub fn empty_like(&self, tuples: usize) -> Self {
        Self {
            arrays: self
                .arrays
                .iter()
                .map(|a| DataArray::with_capacity(a.name.clone(), a.components, tuples))
                .collect(),
            active_scalars: self.active_scalars.clone(),
        }
    }

    /// Appends tuple `i` of each array in `source` to the matching array here.
    ///
    /// Both sets must have been created with the same layout (see [`empty_like`](Self::empty_like)).
    pub fn push_tuple_from(&mut self, source: &AttributeSet, i: usize) {
        for (dst, src) in self.arrays.iter_mut().zip(&source.arrays) {
            dst.push_tuple_from(src, i);
        }
    }

    /// Appends the interpolation of tuples `a` and `b` of `source`.
    pub fn push_interpolated(&mut self, source: &AttributeSet, a: usize, b: usize, t: f32) {
        for (dst, src) in self.arrays.iter_mut().zip(&source.arrays) {
            dst.push_interpolated(src, a, b, t);
        }
    }

    /// Checks every array has exactly `tuples` tuples.
    pub fn validate(&self, tuples: usize) -> Result<()> {
        for array in &self.arrays {
            if array.len() != tuples {
                return Err(IsocompError::SizeMismatch {
                    expected: tuples,
                    actual: array.len(),
                });
            }
        }
        Ok(())
    }
}
