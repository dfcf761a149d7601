//! Image-space redistribution.
//!
//! Every rank owns one horizontal band of display rows. Each local cell is sent to the
//! ranks whose band its projected bounding box overlaps, so afterwards every rank holds
//! all geometry that can cover its rows and can composite transparent surfaces in order.
//!
//! Destination buffers are built in two passes: a count pass sizes every buffer exactly,
//! then a fill pass copies cells without any reallocation.

use glam::Vec2;
use isocomp_core::{
    DataArray, IsocompError, PolyCapacity, PolyData, RedistributeOptions, Result, COLORS,
};

use crate::bands::{BandPartition, Destination};
use crate::camera::{DisplayTransform, RenderContext};
use crate::comm::Communicator;
use crate::wire;

/// Counters from one redistribution call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RedistributeStats {
    pub input_cells: usize,
    /// Cells skipped because every vertex has zero alpha.
    pub transparent_cells: usize,
    /// Cells overlapping no band.
    pub dropped_cells: usize,
    /// Cells placed in more than one destination buffer.
    pub multi_rank_cells: usize,
    pub bytes_sent: usize,
    pub bytes_received: usize,
    pub output_cells: usize,
}

/// Per-rank destination buffers for the local cells.
#[derive(Debug, Clone, Default)]
pub struct DestinationBuffers {
    /// One buffer per rank, indexed by rank.
    pub buffers: Vec<PolyData>,
    pub stats: RedistributeStats,
}

/// Repartitions polygon geometry across ranks by screen band.
#[derive(Debug, Clone, Default)]
pub struct ImageSpaceRedistributor {
    options: RedistributeOptions,
}

impl ImageSpaceRedistributor {
    pub fn new(options: RedistributeOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &RedistributeOptions {
        &self.options
    }

    /// Exchanges `local` with every rank of `comm` and returns the geometry this rank owns.
    ///
    /// Collective: every rank must call it. Fails with
    /// [`IsocompError::NoCamera`](isocomp_core::IsocompError::NoCamera) when `context` has no
    /// camera; that check happens before any communication.
    ///
    /// A rank that fails before the exchanges (invalid `local`, encoding error) returns
    /// without entering them, and the other ranks of the group stall in
    /// [`Communicator::all_to_all`].
    pub fn redistribute(
        &self,
        local: &PolyData,
        context: &RenderContext,
        comm: &dyn Communicator,
    ) -> Result<PolyData> {
        self.redistribute_with_stats(local, context, comm)
            .map(|(output, _)| output)
    }

    /// Like [`redistribute`](Self::redistribute), also returning the call's counters.
    pub fn redistribute_with_stats(
        &self,
        local: &PolyData,
        context: &RenderContext,
        comm: &dyn Communicator,
    ) -> Result<(PolyData, RedistributeStats)> {
        let transform = context.display_transform()?;
        let partition = BandPartition::new(context.viewport.height, comm.size());
        let DestinationBuffers {
            mut buffers,
            mut stats,
        } = self.build_buffers(local, &transform, &partition)?;

        let me = comm.rank();
        let mut own = Some(std::mem::take(&mut buffers[me])).filter(|b| !b.is_empty());

        // No self-send: the local buffer is merged directly
        let blobs = buffers
            .iter()
            .enumerate()
            .map(|(rank, buffer)| {
                if rank == me || buffer.is_empty() {
                    Ok(Vec::new())
                } else {
                    wire::encode(buffer)
                }
            })
            .collect::<Result<Vec<_>>>()?;
        drop(buffers);

        let send_counts: Vec<usize> = blobs.iter().map(Vec::len).collect();
        let send_displs = prefix_sum(&send_counts);
        let send = blobs.concat();
        drop(blobs);

        let recv_counts = comm.all_to_all(&send_counts)?;
        let recv_displs = prefix_sum(&recv_counts);
        let mut recv = vec![0u8; recv_counts.iter().sum()];
        comm.all_to_all_v(
            &send,
            &send_counts,
            &send_displs,
            &mut recv,
            &recv_counts,
            &recv_displs,
        )?;
        stats.bytes_sent = send.len();
        stats.bytes_received = recv.len();
        drop(send);

        let mut pieces = Vec::with_capacity(comm.size());
        for (rank, (&displ, &count)) in recv_displs.iter().zip(&recv_counts).enumerate() {
            if rank == me {
                pieces.extend(own.take());
            } else if count > 0 {
                pieces.push(wire::decode(&recv[displ..displ + count])?);
            }
        }
        let refs: Vec<&PolyData> = pieces.iter().collect();
        let output = PolyData::append(&refs);
        stats.output_cells = output.num_cells();

        log::debug!(
            "rank {me}: {} cells in, {} out, {} bytes sent, {} received",
            stats.input_cells,
            stats.output_cells,
            stats.bytes_sent,
            stats.bytes_received
        );
        Ok((output, stats))
    }

    /// Sorts the local cells into one exactly-sized buffer per band of `partition`.
    ///
    /// With a single band every non-transparent cell is kept, including off-screen ones.
    pub fn build_buffers(
        &self,
        local: &PolyData,
        transform: &DisplayTransform,
        partition: &BandPartition,
    ) -> Result<DestinationBuffers> {
        local.validate()?;
        let world_size = partition.world_size();
        let display: Vec<Option<Vec2>> = local
            .points
            .iter()
            .map(|&p| transform.to_display(p))
            .collect();
        let alpha = self
            .options
            .skip_transparent
            .then(|| local.point_data.get(COLORS))
            .flatten()
            .filter(|colors| colors.components() == 4);

        let mut stats = RedistributeStats {
            input_cells: local.num_cells(),
            ..RedistributeStats::default()
        };

        // Count pass
        let mut capacities = vec![PolyCapacity::default(); world_size];
        let mut tags = Vec::with_capacity(local.num_cells());
        for (_, kind, ids) in local.iter_cells() {
            let tag = if alpha.is_some_and(|colors| fully_transparent(colors, ids)) {
                stats.transparent_cells += 1;
                Destination::None
            } else if world_size == 1 {
                // A single band keeps everything, on screen or not
                Destination::Single(0)
            } else {
                match screen_bounds(&display, ids) {
                    Some((lo, hi)) => partition.destination(lo.y, hi.y),
                    None => Destination::None,
                }
            };
            if matches!(tag, Destination::Multiple(_)) {
                stats.multi_rank_cells += 1;
            }
            for rank in tag.ranks() {
                capacities[rank].add_cell(kind, ids.len());
                capacities[rank].points += ids.len();
            }
            tags.push(tag);
        }
        let placed = tags
            .iter()
            .filter(|t| !matches!(t, Destination::None))
            .count();
        stats.dropped_cells = stats.input_cells - stats.transparent_cells - placed;
        if stats.dropped_cells > 0 {
            log::warn!(
                "{} cells overlap no screen band and were dropped",
                stats.dropped_cells
            );
        }

        // Allocate pass
        let threshold = self.options.point_dedup_threshold;
        let mut compact = vec![false; world_size];
        let mut buffers: Vec<PolyData> = capacities
            .iter_mut()
            .zip(&mut compact)
            .map(|(capacity, shared)| {
                *shared = capacity.total_cells() >= threshold && capacity.total_cells() > 0;
                if *shared {
                    // Shares the local points; unused ones are removed after the fill
                    capacity.points = 0;
                    let mut buffer = PolyData::with_capacity(capacity, local);
                    buffer.points.clone_from(&local.points);
                    buffer.point_data.clone_from(&local.point_data);
                    buffer
                } else {
                    PolyData::with_capacity(capacity, local)
                }
            })
            .collect();

        // Fill pass
        let mut scratch = Vec::new();
        for ((cell, kind, ids), tag) in local.iter_cells().zip(&tags) {
            for rank in tag.ranks() {
                let buffer = &mut buffers[rank];
                if compact[rank] {
                    buffer.cells_mut(kind).push(ids);
                } else {
                    let base = u32::try_from(buffer.points.len()).map_err(|_| {
                        IsocompError::SizeMismatch {
                            expected: u32::MAX as usize,
                            actual: buffer.points.len(),
                        }
                    })?;
                    scratch.clear();
                    for (i, &id) in (0_u32..).zip(ids) {
                        buffer.points.push(local.points[id as usize]);
                        buffer.point_data.push_tuple_from(&local.point_data, id as usize);
                        scratch.push(base + i);
                    }
                    buffer.cells_mut(kind).push(&scratch);
                }
                buffer.cell_data.push_tuple_from(&local.cell_data, cell);
            }
        }
        for (buffer, &compacted) in buffers.iter_mut().zip(&compact) {
            if compacted {
                buffer.remove_unused_points();
            }
        }

        for (rank, buffer) in buffers.iter().enumerate() {
            log::debug!(
                "band {rank}: {} cells, {} points{}",
                buffer.num_cells(),
                buffer.num_points(),
                if compact[rank] { " (compacted)" } else { "" }
            );
        }
        Ok(DestinationBuffers { buffers, stats })
    }
}

/// Display-space bounds of a cell, ignoring points without a display position.
fn screen_bounds(display: &[Option<Vec2>], ids: &[u32]) -> Option<(Vec2, Vec2)> {
    ids.iter()
        .filter_map(|&id| display[id as usize])
        .fold(None, |acc, p| match acc {
            None => Some((p, p)),
            Some((lo, hi)) => Some((lo.min(p), hi.max(p))),
        })
}

/// A cell is transparent when all its vertices have zero alpha.
fn fully_transparent(colors: &DataArray, ids: &[u32]) -> bool {
    !ids.is_empty() && ids.iter().all(|&id| colors.tuple(id as usize)[3] <= 0.0)
}

fn prefix_sum(counts: &[usize]) -> Vec<usize> {
    counts
        .iter()
        .scan(0, |acc, &c| {
            let start = *acc;
            *acc += c;
            Some(start)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::{Camera, Viewport};
    use crate::comm::{SelfComm, ThreadComm};
    use glam::Vec3;
    use isocomp_core::{CellKind, IsocompError};
    use std::thread;

    /// World y in [-1, 1] maps onto display rows [0, 100].
    fn context() -> RenderContext {
        RenderContext::new(
            Camera::orthographic(Vec3::ZERO, 1.0, 1.0),
            Viewport::new(100, 100),
        )
    }

    /// One triangle per `(y_lo, y_hi)` span, with a per-cell id and per-point colors.
    fn triangles(spans: &[(f32, f32)], alpha: f32) -> PolyData {
        let mut points = Vec::new();
        let mut tris = Vec::new();
        for (i, &(lo, hi)) in (0_u32..).zip(spans) {
            points.extend([
                Vec3::new(-0.5, lo, 0.0),
                Vec3::new(0.5, lo, 0.0),
                Vec3::new(0.0, hi, 0.0),
            ]);
            tris.push([3 * i, 3 * i + 1, 3 * i + 2]);
        }
        let mut poly = PolyData::from_triangles(points, &tris);
        #[allow(clippy::cast_precision_loss)]
        let ids = (0..spans.len()).map(|i| i as f32).collect();
        poly.cell_data.insert(DataArray::scalars("id", ids));
        let colors = [0.2, 0.4, 0.6, alpha].repeat(3 * spans.len());
        poly.point_data
            .insert(DataArray::new(COLORS, 4, colors).unwrap());
        poly
    }

    fn buffers(local: &PolyData, world_size: usize, options: RedistributeOptions) -> DestinationBuffers {
        let context = context();
        let transform = context.display_transform().unwrap();
        ImageSpaceRedistributor::new(options)
            .build_buffers(local, &transform, &BandPartition::new(100, world_size))
            .unwrap()
    }

    #[test]
    fn test_straddling_cell_goes_to_both_bands() {
        let local = triangles(&[(-0.5, 0.5), (-0.8, -0.6)], 1.0);
        let out = buffers(&local, 2, RedistributeOptions::default());

        assert_eq!(out.stats.multi_rank_cells, 1);
        let lower = &out.buffers[0];
        let upper = &out.buffers[1];
        assert_eq!(lower.num_cells(), 2);
        assert_eq!(upper.num_cells(), 1);

        assert_eq!(upper.polys.cell(0), &[0, 1, 2]);
        assert_eq!(upper.points, local.points[..3].to_vec());
        assert_eq!(upper.cell_data.get("id").unwrap().values(), &[0.0]);
        assert_eq!(lower.cell_data.get("id").unwrap().values(), &[0.0, 1.0]);
        upper.validate().unwrap();
        lower.validate().unwrap();
    }

    #[test]
    fn test_offscreen_cell_is_dropped() {
        let local = triangles(&[(1.5, 2.0), (0.1, 0.2)], 1.0);
        let out = buffers(&local, 2, RedistributeOptions::default());
        assert_eq!(out.stats.dropped_cells, 1);
        assert_eq!(out.buffers[0].num_cells(), 0);
        assert_eq!(out.buffers[1].num_cells(), 1);
        assert_eq!(out.buffers[1].cell_data.get("id").unwrap().values(), &[1.0]);
    }

    #[test]
    fn test_transparent_cells_are_skipped() {
        let local = triangles(&[(0.1, 0.2)], 0.0);
        let out = buffers(&local, 2, RedistributeOptions::default());
        assert_eq!(out.stats.transparent_cells, 1);
        assert_eq!(out.stats.dropped_cells, 0);
        assert!(out.buffers.iter().all(PolyData::is_empty));

        let keep = RedistributeOptions {
            skip_transparent: false,
            ..RedistributeOptions::default()
        };
        assert_eq!(buffers(&local, 2, keep).buffers[1].num_cells(), 1);
    }

    #[test]
    fn test_point_sharing_above_threshold() {
        // Two triangles sharing an edge, plus an unrelated point
        let mut local = PolyData::from_triangles(
            vec![
                Vec3::new(0.0, 0.1, 0.0),
                Vec3::new(0.5, 0.1, 0.0),
                Vec3::new(0.0, 0.6, 0.0),
                Vec3::new(0.5, 0.6, 0.0),
                Vec3::new(0.0, -0.9, 0.0),
            ],
            &[[0, 1, 2], [1, 3, 2]],
        );
        local.lines.push(&[4, 4]);

        let duplicated = buffers(
            &local,
            2,
            RedistributeOptions {
                point_dedup_threshold: 10,
                ..RedistributeOptions::default()
            },
        );
        assert_eq!(duplicated.buffers[1].num_points(), 6);

        let shared = buffers(
            &local,
            2,
            RedistributeOptions {
                point_dedup_threshold: 1,
                ..RedistributeOptions::default()
            },
        );
        let upper = &shared.buffers[1];
        assert_eq!(upper.num_points(), 4);
        assert_eq!(upper.cells(CellKind::Polygon).len(), 2);
        upper.validate().unwrap();
        let lower = &shared.buffers[0];
        assert_eq!(lower.num_points(), 1);
        assert_eq!(lower.lines.cell(0), &[0, 0]);
    }

    #[test]
    fn test_single_rank_passes_visible_geometry_through() {
        let local = triangles(&[(-0.9, -0.1), (-0.5, 0.5), (0.2, 0.9)], 1.0);
        let (output, stats) = ImageSpaceRedistributor::default()
            .redistribute_with_stats(&local, &context(), &SelfComm)
            .unwrap();
        assert_eq!(output.num_cells(), 3);
        assert_eq!(output.num_points(), 9);
        assert_eq!(stats.bytes_sent, 0);
        assert_eq!(output.cell_data.get("id").unwrap().values(), &[0.0, 1.0, 2.0]);
    }

    #[test]
    fn test_single_rank_keeps_offscreen_cells() {
        let local = triangles(&[(0.1, 0.2), (1.5, 2.0)], 1.0);
        let (output, stats) = ImageSpaceRedistributor::default()
            .redistribute_with_stats(&local, &context(), &SelfComm)
            .unwrap();
        assert_eq!(stats.dropped_cells, 0);
        assert_eq!(output.num_cells(), 2);
        assert_eq!(output.cell_data.get("id").unwrap().values(), &[0.0, 1.0]);
        output.validate().unwrap();

        let transparent = triangles(&[(1.5, 2.0)], 0.0);
        let out = buffers(&transparent, 1, RedistributeOptions::default());
        assert_eq!(out.stats.transparent_cells, 1);
        assert!(out.buffers[0].is_empty());
    }

    #[test]
    fn test_missing_camera_is_fatal() {
        let context = RenderContext {
            camera: None,
            viewport: Viewport::new(100, 100),
        };
        let result = ImageSpaceRedistributor::default().redistribute(
            &triangles(&[(0.0, 0.1)], 1.0),
            &context,
            &SelfComm,
        );
        assert!(matches!(result, Err(IsocompError::NoCamera)));
    }

    #[test]
    fn test_empty_input_gives_empty_output() {
        let output = ImageSpaceRedistributor::default()
            .redistribute(&PolyData::new(), &context(), &SelfComm)
            .unwrap();
        assert!(output.is_empty());
        output.validate().unwrap();
    }

    #[test]
    fn test_two_ranks_exchange_by_band() {
        let handles: Vec<_> = ThreadComm::group(2)
            .into_iter()
            .map(|comm| {
                thread::spawn(move || {
                    // Rank 0 holds an upper triangle, rank 1 a lower one; both share a
                    // straddling triangle.
                    let local = if comm.rank() == 0 {
                        triangles(&[(0.2, 0.8), (-0.2, 0.2)], 1.0)
                    } else {
                        triangles(&[(-0.8, -0.2), (-0.3, 0.3)], 1.0)
                    };
                    ImageSpaceRedistributor::default()
                        .redistribute_with_stats(&local, &context(), &comm)
                        .unwrap()
                })
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        let (lower, lower_stats) = &results[0];
        let (upper, upper_stats) = &results[1];
        // Lower band: rank 0's straddler, rank 1's lower triangle and straddler
        assert_eq!(lower.num_cells(), 3);
        // Upper band: rank 0's upper triangle and straddler, rank 1's straddler
        assert_eq!(upper.num_cells(), 3);
        assert!(lower_stats.bytes_received > 0);
        assert_eq!(lower_stats.bytes_sent, upper_stats.bytes_received);
        lower.validate().unwrap();
        upper.validate().unwrap();
        for poly in [lower, upper] {
            assert!(poly.point_data.contains(COLORS));
            assert_eq!(poly.cell_data.get("id").unwrap().len(), 3);
        }
    }
}
