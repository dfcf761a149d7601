//! Polygonal data: the output of contouring and the unit of redistribution.
//!
//! [`PolyData`] holds points, four cell arrays and point/cell attributes. Cell ids are
//! global across the four arrays: vertices first, then lines, polygons and triangle
//! strips. Cell attributes are indexed by that global id.

use glam::Vec3;

use crate::attributes::{AttributeSet, DataArray};
use crate::error::{IsocompError, Result};

/// The primitive kind of a polygonal cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CellKind {
    /// One or more unconnected points.
    Vertex,
    /// A polyline.
    Line,
    /// A planar polygon.
    Polygon,
    /// A triangle strip.
    Strip,
}

impl CellKind {
    /// All kinds in cell-id order.
    pub const ALL: [CellKind; 4] = [Self::Vertex, Self::Line, Self::Polygon, Self::Strip];

    /// Position of this kind in [`CellKind::ALL`].
    pub fn index(self) -> usize {
        match self {
            Self::Vertex => 0,
            Self::Line => 1,
            Self::Polygon => 2,
            Self::Strip => 3,
        }
    }
}

/// Variable-length cells stored as offsets into a flat connectivity list.
#[derive(Debug, Clone, PartialEq)]
pub struct CellArray {
    /// `offsets[i]..offsets[i + 1]` is cell `i`; always starts with 0.
    offsets: Vec<u32>,
    connectivity: Vec<u32>,
}

impl Default for CellArray {
    fn default() -> Self {
        Self::new()
    }
}

impl CellArray {
    pub fn new() -> Self {
        Self {
            offsets: vec![0],
            connectivity: Vec::new(),
        }
    }

    /// Creates an empty array with exact room for `cells` cells and `connectivity` ids.
    pub fn with_capacity(cells: usize, connectivity: usize) -> Self {
        let mut offsets = Vec::with_capacity(cells + 1);
        offsets.push(0);
        Self {
            offsets,
            connectivity: Vec::with_capacity(connectivity),
        }
    }

    /// Rebuilds an array from raw parts, validating the offsets.
    pub fn from_parts(offsets: Vec<u32>, connectivity: Vec<u32>) -> Result<Self> {
        let well_formed = offsets.first() == Some(&0)
            && offsets.windows(2).all(|w| w[0] <= w[1])
            && offsets.last().map(|&l| l as usize) == Some(connectivity.len());
        if !well_formed {
            return Err(IsocompError::Decode(format!(
                "malformed cell offsets ({} offsets, {} connectivity ids)",
                offsets.len(),
                connectivity.len()
            )));
        }
        Ok(Self {
            offsets,
            connectivity,
        })
    }

    /// Appends a cell.
    #[allow(clippy::cast_possible_truncation)]
    pub fn push(&mut self, point_ids: &[u32]) {
        self.connectivity.extend_from_slice(point_ids);
        self.offsets.push(self.connectivity.len() as u32);
    }

    /// Returns the number of cells.
    pub fn len(&self) -> usize {
        self.offsets.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the point ids of cell `i`.
    pub fn cell(&self, i: usize) -> &[u32] {
        &self.connectivity[self.offsets[i] as usize..self.offsets[i + 1] as usize]
    }

    pub fn iter(&self) -> impl Iterator<Item = &[u32]> {
        self.offsets
            .windows(2)
            .map(|w| &self.connectivity[w[0] as usize..w[1] as usize])
    }

    pub fn offsets(&self) -> &[u32] {
        &self.offsets
    }

    pub fn connectivity(&self) -> &[u32] {
        &self.connectivity
    }

    fn remap(&mut self, map: &[u32]) {
        for id in &mut self.connectivity {
            *id = map[*id as usize];
        }
    }
}

/// Exact sizes for building a [`PolyData`] without reallocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PolyCapacity {
    pub points: usize,
    /// Cells per kind, in [`CellKind::ALL`] order.
    pub cells: [usize; 4],
    /// Connectivity ids per kind, in [`CellKind::ALL`] order.
    pub connectivity: [usize; 4],
}

impl PolyCapacity {
    /// Accounts for one cell of `kind` with `num_ids` points.
    pub fn add_cell(&mut self, kind: CellKind, num_ids: usize) {
        self.cells[kind.index()] += 1;
        self.connectivity[kind.index()] += num_ids;
    }

    pub fn total_cells(&self) -> usize {
        self.cells.iter().sum()
    }

    pub fn total_connectivity(&self) -> usize {
        self.connectivity.iter().sum()
    }
}

/// Polygonal geometry with attributes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PolyData {
    pub points: Vec<Vec3>,
    pub verts: CellArray,
    pub lines: CellArray,
    pub polys: CellArray,
    pub strips: CellArray,
    pub point_data: AttributeSet,
    pub cell_data: AttributeSet,
}

impl PolyData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates polygon-only data from triangles.
    pub fn from_triangles(points: Vec<Vec3>, triangles: &[[u32; 3]]) -> Self {
        let mut polys = CellArray::with_capacity(triangles.len(), triangles.len() * 3);
        for tri in triangles {
            polys.push(tri);
        }
        Self {
            points,
            polys,
            ..Self::default()
        }
    }

    /// Creates empty data with exact capacity and the attribute layout of `layout`.
    pub fn with_capacity(capacity: &PolyCapacity, layout: &PolyData) -> Self {
        let kind_array =
            |k: CellKind| CellArray::with_capacity(capacity.cells[k.index()], capacity.connectivity[k.index()]);
        Self {
            points: Vec::with_capacity(capacity.points),
            verts: kind_array(CellKind::Vertex),
            lines: kind_array(CellKind::Line),
            polys: kind_array(CellKind::Polygon),
            strips: kind_array(CellKind::Strip),
            point_data: layout.point_data.empty_like(capacity.points),
            cell_data: layout.cell_data.empty_like(capacity.total_cells()),
        }
    }

    pub fn num_points(&self) -> usize {
        self.points.len()
    }

    pub fn num_cells(&self) -> usize {
        CellKind::ALL.iter().map(|&k| self.cells(k).len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.num_cells() == 0
    }

    pub fn cells(&self, kind: CellKind) -> &CellArray {
        match kind {
            CellKind::Vertex => &self.verts,
            CellKind::Line => &self.lines,
            CellKind::Polygon => &self.polys,
            CellKind::Strip => &self.strips,
        }
    }

    pub fn cells_mut(&mut self, kind: CellKind) -> &mut CellArray {
        match kind {
            CellKind::Vertex => &mut self.verts,
            CellKind::Line => &mut self.lines,
            CellKind::Polygon => &mut self.polys,
            CellKind::Strip => &mut self.strips,
        }
    }

    /// Iterates `(cell id, kind, point ids)` in cell-id order.
    pub fn iter_cells(&self) -> impl Iterator<Item = (usize, CellKind, &[u32])> {
        CellKind::ALL
            .into_iter()
            .flat_map(move |kind| self.cells(kind).iter().map(move |ids| (kind, ids)))
            .enumerate()
            .map(|(id, (kind, ids))| (id, kind, ids))
    }

    /// Checks that connectivity and attribute sizes are consistent.
    pub fn validate(&self) -> Result<()> {
        for (cell, _, ids) in self.iter_cells() {
            if let Some(&bad) = ids.iter().find(|&&p| p as usize >= self.points.len()) {
                return Err(IsocompError::PointOutOfRange {
                    cell,
                    point: bad,
                    num_points: self.points.len(),
                });
            }
        }
        self.point_data.validate(self.num_points())?;
        self.cell_data.validate(self.num_cells())
    }

    /// Drops points no cell references and renumbers the connectivity.
    #[allow(clippy::cast_possible_truncation)]
    pub fn remove_unused_points(&mut self) {
        let mut map = vec![u32::MAX; self.points.len()];
        let mut kept = Vec::new();
        for kind in CellKind::ALL {
            for &id in self.cells(kind).connectivity() {
                if map[id as usize] == u32::MAX {
                    map[id as usize] = kept.len() as u32;
                    kept.push(id as usize);
                }
            }
        }
        if kept.len() == self.points.len() && kept.iter().enumerate().all(|(i, &k)| i == k) {
            return;
        }

        self.points = kept.iter().map(|&i| self.points[i]).collect();
        let mut point_data = self.point_data.empty_like(kept.len());
        for &i in &kept {
            point_data.push_tuple_from(&self.point_data, i);
        }
        self.point_data = point_data;
        for kind in CellKind::ALL {
            self.cells_mut(kind).remap(&map);
        }
    }

    /// Merges several inputs into one.
    ///
    /// Cells keep their kind; within a kind they appear in input order. Only arrays present
    /// (same name and width) in every non-empty input are carried over.
    #[allow(clippy::cast_possible_truncation)]
    pub fn append(inputs: &[&PolyData]) -> PolyData {
        let non_empty: Vec<&PolyData> = inputs
            .iter()
            .copied()
            .filter(|p| p.num_points() > 0 || p.num_cells() > 0)
            .collect();
        if non_empty.is_empty() {
            return PolyData::new();
        }

        let point_data = common_layout(non_empty.iter().map(|p| &p.point_data));
        let cell_data = common_layout(non_empty.iter().map(|p| &p.cell_data));

        let mut capacity = PolyCapacity::default();
        for p in &non_empty {
            capacity.points += p.num_points();
            for kind in CellKind::ALL {
                capacity.cells[kind.index()] += p.cells(kind).len();
                capacity.connectivity[kind.index()] += p.cells(kind).connectivity().len();
            }
        }
        let layout = PolyData {
            point_data,
            cell_data,
            ..PolyData::new()
        };
        let mut out = PolyData::with_capacity(&capacity, &layout);

        let mut point_base = Vec::with_capacity(non_empty.len());
        for p in &non_empty {
            point_base.push(out.points.len() as u32);
            out.points.extend_from_slice(&p.points);
            for dst in out.point_data.iter_mut() {
                if let Some(src) = p.point_data.get(dst.name()) {
                    dst.values_mut().extend_from_slice(src.values());
                }
            }
        }

        let mut scratch = Vec::new();
        for kind in CellKind::ALL {
            for (p, &base) in non_empty.iter().zip(&point_base) {
                let first_id: usize = CellKind::ALL[..kind.index()]
                    .iter()
                    .map(|&k| p.cells(k).len())
                    .sum();
                for (local, ids) in p.cells(kind).iter().enumerate() {
                    scratch.clear();
                    scratch.extend(ids.iter().map(|&id| id + base));
                    out.cells_mut(kind).push(&scratch);
                    for dst in out.cell_data.iter_mut() {
                        if let Some(src) = p.cell_data.get(dst.name()) {
                            dst.push_tuple_from(src, first_id + local);
                        }
                    }
                }
            }
        }
        out
    }

    /// Returns the axis-aligned bounding box, or `None` if there are no points.
    pub fn bounding_box(&self) -> Option<(Vec3, Vec3)> {
        let first = *self.points.first()?;
        Some(
            self.points
                .iter()
                .fold((first, first), |(lo, hi), &p| (lo.min(p), hi.max(p))),
        )
    }
}

/// Returns an empty attribute set holding the arrays shared by all `sets`.
fn common_layout<'a>(mut sets: impl Iterator<Item = &'a AttributeSet>) -> AttributeSet {
    let Some(first) = sets.next() else {
        return AttributeSet::new();
    };
    let mut names: Vec<(String, usize)> = first
        .iter()
        .map(|a| (a.name().to_string(), a.components()))
        .collect();
    for set in sets {
        names.retain(|(name, comps)| set.get(name).is_some_and(|a| a.components() == *comps));
    }
    let mut layout = AttributeSet::new();
    for (name, comps) in names {
        layout.insert(DataArray::with_capacity(name, comps, 0));
    }
    if let Some(active) = first.active_scalars() {
        if layout.contains(active) {
            layout.set_active_scalars(Some(active.to_string()));
        }
    }
    layout
}
