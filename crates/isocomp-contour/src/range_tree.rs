//! Per-cell scalar ranges for fast cell rejection.

use isocomp_core::{RangeIndex, VolumeMesh};

/// Index over the `[min, max]` of a node-centered field on each cell.
///
/// Building costs one pass over the cells; it pays off when several isovalues are
/// contoured on the same domain.
#[derive(Debug, Clone)]
pub struct ScalarRangeTree {
    index: RangeIndex,
}

impl ScalarRangeTree {
    /// Builds the tree from node values `scalars` (one per point of `mesh`).
    pub fn build(mesh: &VolumeMesh, scalars: &[f32]) -> Self {
        let ranges = (0..mesh.num_cells())
            .map(|c| {
                let cell = mesh.cell(c);
                let (lo, hi) = cell.point_ids().iter().fold(
                    (f32::INFINITY, f32::NEG_INFINITY),
                    |(lo, hi), &p| {
                        let v = scalars[p as usize];
                        (lo.min(v), hi.max(v))
                    },
                );
                [f64::from(lo), f64::from(hi)]
            })
            .collect();
        Self {
            index: RangeIndex::build(ranges),
        }
    }

    pub fn num_cells(&self) -> usize {
        self.index.len()
    }

    /// Returns the ids of cells whose range contains `value`, ascending.
    ///
    /// `value` is rounded to `f32` first, the precision the cells are contoured at.
    pub fn cells_containing(&self, value: f64) -> Vec<u32> {
        #[allow(clippy::cast_possible_truncation)]
        let value = f64::from(value as f32);
        let mut cells = Vec::new();
        self.index.stab(value, &mut cells);
        cells
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn test_cells_containing() {
        let mesh = VolumeMesh::uniform([4, 2, 2], Vec3::ZERO, Vec3::ONE);
        let field: Vec<f32> = (0..mesh.num_points()).map(|i| mesh.point(i).x).collect();
        let tree = ScalarRangeTree::build(&mesh, &field);

        assert_eq!(tree.num_cells(), 3);
        assert_eq!(tree.cells_containing(0.5), vec![0]);
        assert_eq!(tree.cells_containing(1.0), vec![0, 1]);
        assert!(tree.cells_containing(3.5).is_empty());
    }

    #[test]
    fn test_value_rounded_to_field_precision() {
        let mesh = VolumeMesh::uniform([3, 2, 2], Vec3::ZERO, Vec3::ONE);
        let field: Vec<f32> = (0..mesh.num_points()).map(|i| mesh.point(i).x).collect();
        let tree = ScalarRangeTree::build(&mesh, &field);

        // Rounds to 1.0f32, the shared face of both cells
        assert_eq!(tree.cells_containing(1.000_000_01), vec![0, 1]);
    }
}
