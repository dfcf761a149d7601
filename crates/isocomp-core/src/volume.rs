//! Volumetric meshes: the input of isosurface extraction.
//!
//! A [`VolumeMesh`] pairs a geometry variant with point and cell attributes. Two
//! geometry kinds are supported:
//!
//! - [`VolumeGeometry::Rectilinear`] - a grid given by its coordinate axes. Points are
//!   numbered x-fastest, cells likewise, and every cell is a hexahedron.
//! - [`VolumeGeometry::Unstructured`] - explicit points and tetrahedral/hexahedral cells.
//!
//! Hexahedra use the usual ordering: points 0-3 walk the bottom face counter-clockwise,
//! points 4-7 are the matching top face points.

use glam::Vec3;

use crate::attributes::{AttributeSet, Centering, DataArray};
use crate::error::{IsocompError, Result};

/// One volumetric cell, by point ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeCell {
    /// Tetrahedron (4 points).
    Tet([u32; 4]),
    /// Hexahedron (8 points).
    Hex([u32; 8]),
}

impl VolumeCell {
    /// Returns the point ids of the cell.
    pub fn point_ids(&self) -> &[u32] {
        match self {
            Self::Tet(ids) => ids,
            Self::Hex(ids) => ids,
        }
    }
}

/// Geometry of a volume mesh.
#[derive(Debug, Clone, PartialEq)]
pub enum VolumeGeometry {
    /// Axis-aligned grid from per-axis node coordinates.
    Rectilinear { x: Vec<f32>, y: Vec<f32>, z: Vec<f32> },
    /// Explicit points and cells.
    Unstructured {
        points: Vec<Vec3>,
        cells: Vec<VolumeCell>,
    },
}

/// A volume mesh with attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeMesh {
    geometry: VolumeGeometry,
    point_data: AttributeSet,
    cell_data: AttributeSet,
}

impl VolumeMesh {
    /// Creates a rectilinear grid from its axis coordinates.
    pub fn rectilinear(x: Vec<f32>, y: Vec<f32>, z: Vec<f32>) -> Self {
        Self {
            geometry: VolumeGeometry::Rectilinear { x, y, z },
            point_data: AttributeSet::new(),
            cell_data: AttributeSet::new(),
        }
    }

    /// Creates a uniform grid with `dims` nodes per axis.
    pub fn uniform(dims: [usize; 3], origin: Vec3, spacing: Vec3) -> Self {
        #[allow(clippy::cast_precision_loss)]
        let axis = |n: usize, o: f32, s: f32| (0..n).map(|i| o + s * i as f32).collect();
        Self::rectilinear(
            axis(dims[0], origin.x, spacing.x),
            axis(dims[1], origin.y, spacing.y),
            axis(dims[2], origin.z, spacing.z),
        )
    }

    /// Creates an unstructured mesh, checking that every cell references valid points.
    pub fn unstructured(points: Vec<Vec3>, cells: Vec<VolumeCell>) -> Result<Self> {
        for (cell_id, cell) in cells.iter().enumerate() {
            if let Some(&bad) = cell
                .point_ids()
                .iter()
                .find(|&&p| p as usize >= points.len())
            {
                return Err(IsocompError::PointOutOfRange {
                    cell: cell_id,
                    point: bad,
                    num_points: points.len(),
                });
            }
        }
        Ok(Self {
            geometry: VolumeGeometry::Unstructured { points, cells },
            point_data: AttributeSet::new(),
            cell_data: AttributeSet::new(),
        })
    }

    pub fn geometry(&self) -> &VolumeGeometry {
        &self.geometry
    }

    /// Returns the node counts of a rectilinear grid.
    pub fn dims(&self) -> Option<[usize; 3]> {
        match &self.geometry {
            VolumeGeometry::Rectilinear { x, y, z } => Some([x.len(), y.len(), z.len()]),
            VolumeGeometry::Unstructured { .. } => None,
        }
    }

    pub fn num_points(&self) -> usize {
        match &self.geometry {
            VolumeGeometry::Rectilinear { x, y, z } => x.len() * y.len() * z.len(),
            VolumeGeometry::Unstructured { points, .. } => points.len(),
        }
    }

    pub fn num_cells(&self) -> usize {
        match &self.geometry {
            VolumeGeometry::Rectilinear { x, y, z } => {
                x.len().saturating_sub(1) * y.len().saturating_sub(1) * z.len().saturating_sub(1)
            }
            VolumeGeometry::Unstructured { cells, .. } => cells.len(),
        }
    }

    /// Returns the position of point `id`.
    pub fn point(&self, id: usize) -> Vec3 {
        match &self.geometry {
            VolumeGeometry::Rectilinear { x, y, z } => {
                let (nx, ny) = (x.len(), y.len());
                Vec3::new(x[id % nx], y[(id / nx) % ny], z[id / (nx * ny)])
            }
            VolumeGeometry::Unstructured { points, .. } => points[id],
        }
    }

    /// Returns cell `id`.
    #[allow(clippy::cast_possible_truncation)]
    pub fn cell(&self, id: usize) -> VolumeCell {
        match &self.geometry {
            VolumeGeometry::Rectilinear { x, y, .. } => {
                let (nx, ny) = (x.len(), y.len());
                let (cx, cy) = (nx - 1, ny - 1);
                let (i, j, k) = (id % cx, (id / cx) % cy, id / (cx * cy));
                let p = |i: usize, j: usize, k: usize| (i + nx * (j + ny * k)) as u32;
                VolumeCell::Hex([
                    p(i, j, k),
                    p(i + 1, j, k),
                    p(i + 1, j + 1, k),
                    p(i, j + 1, k),
                    p(i, j, k + 1),
                    p(i + 1, j, k + 1),
                    p(i + 1, j + 1, k + 1),
                    p(i, j + 1, k + 1),
                ])
            }
            VolumeGeometry::Unstructured { cells, .. } => cells[id],
        }
    }

    pub fn point_data(&self) -> &AttributeSet {
        &self.point_data
    }

    pub fn point_data_mut(&mut self) -> &mut AttributeSet {
        &mut self.point_data
    }

    pub fn cell_data(&self) -> &AttributeSet {
        &self.cell_data
    }

    pub fn cell_data_mut(&mut self) -> &mut AttributeSet {
        &mut self.cell_data
    }

    /// Adds a point array, checking its length.
    pub fn add_point_array(&mut self, array: DataArray) -> Result<()> {
        check_len(&array, self.num_points())?;
        self.point_data.insert(array);
        Ok(())
    }

    /// Adds a cell array, checking its length.
    pub fn add_cell_array(&mut self, array: DataArray) -> Result<()> {
        check_len(&array, self.num_cells())?;
        self.cell_data.insert(array);
        Ok(())
    }

    /// Adds a point scalar array and makes it the active scalars.
    pub fn add_point_scalars(&mut self, name: impl Into<String>, values: Vec<f32>) -> Result<()> {
        let name = name.into();
        self.add_point_array(DataArray::scalars(name.clone(), values))?;
        self.point_data.set_active_scalars(Some(name));
        Ok(())
    }

    /// Adds a cell scalar array and makes it the active scalars.
    pub fn add_cell_scalars(&mut self, name: impl Into<String>, values: Vec<f32>) -> Result<()> {
        let name = name.into();
        self.add_cell_array(DataArray::scalars(name.clone(), values))?;
        self.cell_data.set_active_scalars(Some(name));
        Ok(())
    }

    /// Returns where the named array lives. Point arrays win over cell arrays.
    pub fn centering_of(&self, name: &str) -> Option<Centering> {
        if self.point_data.contains(name) {
            Some(Centering::Node)
        } else if self.cell_data.contains(name) {
            Some(Centering::Cell)
        } else {
            None
        }
    }

    /// Returns the active scalar array name, preferring point data.
    pub fn active_scalars(&self) -> Option<&str> {
        self.point_data
            .active_scalars()
            .or_else(|| self.cell_data.active_scalars())
    }

    /// Returns a mesh with the same geometry and the given attributes.
    pub fn with_attributes(&self, point_data: AttributeSet, cell_data: AttributeSet) -> Self {
        Self {
            geometry: self.geometry.clone(),
            point_data,
            cell_data,
        }
    }

    /// Returns the axis-aligned bounding box, or `None` for an empty mesh.
    pub fn bounding_box(&self) -> Option<(Vec3, Vec3)> {
        if self.num_points() == 0 {
            return None;
        }
        let mut min = Vec3::splat(f32::MAX);
        let mut max = Vec3::splat(f32::MIN);
        for i in 0..self.num_points() {
            let p = self.point(i);
            min = min.min(p);
            max = max.max(p);
        }
        Some((min, max))
    }
}

fn check_len(array: &DataArray, tuples: usize) -> Result<()> {
    if array.len() == tuples {
        Ok(())
    } else {
        Err(IsocompError::SizeMismatch {
            expected: tuples,
            actual: array.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rectilinear_counts_and_points() {
        let mesh = VolumeMesh::uniform([3, 2, 2], Vec3::ZERO, Vec3::ONE);
        assert_eq!(mesh.num_points(), 12);
        assert_eq!(mesh.num_cells(), 2);
        assert_eq!(mesh.point(1), Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(mesh.point(4), Vec3::new(1.0, 1.0, 0.0));
        assert_eq!(mesh.point(11), Vec3::new(2.0, 1.0, 1.0));
    }

    #[test]
    fn test_rectilinear_hex_ordering() {
        let mesh = VolumeMesh::uniform([3, 2, 2], Vec3::ZERO, Vec3::ONE);
        let VolumeCell::Hex(ids) = mesh.cell(1) else {
            panic!("expected hex");
        };
        let pts: Vec<Vec3> = ids.iter().map(|&i| mesh.point(i as usize)).collect();
        assert_eq!(pts[0], Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(pts[2], Vec3::new(2.0, 1.0, 0.0));
        assert_eq!(pts[3], Vec3::new(1.0, 1.0, 0.0));
        assert_eq!(pts[6], Vec3::new(2.0, 1.0, 1.0));
    }

    #[test]
    fn test_unstructured_rejects_bad_ids() {
        let points = vec![Vec3::ZERO; 3];
        let err = VolumeMesh::unstructured(points, vec![VolumeCell::Tet([0, 1, 2, 3])]).unwrap_err();
        assert!(matches!(err, IsocompError::PointOutOfRange { point: 3, .. }));
    }

    #[test]
    fn test_centering_lookup() {
        let mut mesh = VolumeMesh::uniform([2, 2, 2], Vec3::ZERO, Vec3::ONE);
        mesh.add_point_scalars("p", vec![0.0; 8]).unwrap();
        mesh.add_cell_scalars("c", vec![1.0]).unwrap();
        assert_eq!(mesh.centering_of("p"), Some(Centering::Node));
        assert_eq!(mesh.centering_of("c"), Some(Centering::Cell));
        assert_eq!(mesh.centering_of("x"), None);
        assert_eq!(mesh.active_scalars(), Some("p"));
        assert!(mesh.add_cell_scalars("bad", vec![1.0, 2.0]).is_err());
    }
}
