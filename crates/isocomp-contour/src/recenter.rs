//! Cell-to-node recentering of the contour variable.

use isocomp_core::{AttributeSet, DataArray, IsocompError, Result, VolumeMesh};

/// Returns a working copy of `mesh` where `variable` is node-centered.
///
/// Each point receives the average of the cell values around it. Existing point arrays
/// are carried over unchanged, as are all cell arrays except `variable`, so ghost and
/// original-numbering arrays appear exactly once in the copy.
pub fn recenter_to_nodes(mesh: &VolumeMesh, variable: &str) -> Result<VolumeMesh> {
    let cell_values = mesh
        .cell_data()
        .get(variable)
        .ok_or_else(|| IsocompError::VariableNotFound(variable.to_string()))?;
    let components = cell_values.components();

    let mut sums = vec![0.0_f32; mesh.num_points() * components];
    let mut counts = vec![0_u32; mesh.num_points()];
    for c in 0..mesh.num_cells() {
        let tuple = cell_values.tuple(c);
        for &p in mesh.cell(c).point_ids() {
            let p = p as usize;
            counts[p] += 1;
            for (sum, &v) in sums[p * components..(p + 1) * components].iter_mut().zip(tuple) {
                *sum += v;
            }
        }
    }
    #[allow(clippy::cast_precision_loss)]
    for (p, &count) in counts.iter().enumerate() {
        if count > 0 {
            for sum in &mut sums[p * components..(p + 1) * components] {
                *sum /= count as f32;
            }
        }
    }

    let mut point_data = mesh.point_data().clone();
    point_data.insert(DataArray::new(variable, components, sums)?);
    point_data.set_active_scalars(Some(variable.to_string()));

    let mut cell_data = AttributeSet::new();
    for array in mesh.cell_data().iter().filter(|a| a.name() != variable) {
        cell_data.insert(array.clone());
    }

    log::debug!(
        "recentered '{variable}' onto {} points",
        mesh.num_points()
    );
    Ok(mesh.with_attributes(point_data, cell_data))
}
