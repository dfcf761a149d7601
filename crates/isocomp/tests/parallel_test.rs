//! Multi-rank tests. Each rank runs on its own thread over a `ThreadComm` group.

use std::thread;

use isocomp::*;
use proptest::prelude::*;

fn sphere_domain(x0: f32) -> VolumeMesh {
    let mut mesh = VolumeMesh::uniform([5, 9, 9], Vec3::new(x0, -1.0, -1.0), Vec3::splat(0.25));
    let field = (0..mesh.num_points())
        .map(|i| mesh.point(i).length())
        .collect();
    mesh.add_point_scalars("distance", field).unwrap();
    mesh
}

fn context() -> RenderContext {
    let mut camera = Camera::default();
    camera.look_at_box(Vec3::splat(-1.0), Vec3::splat(1.0));
    RenderContext::new(camera, Viewport::new(120, 120))
}

/// Runs `f(comm)` on each rank of a group of `size` and returns the results by rank.
fn spmd<T, F>(size: usize, f: F) -> Vec<T>
where
    T: Send + 'static,
    F: Fn(ThreadComm) -> T + Send + Clone + 'static,
{
    let handles: Vec<_> = ThreadComm::group(size)
        .into_iter()
        .map(|comm| {
            let f = f.clone();
            thread::spawn(move || f(comm))
        })
        .collect();
    handles
        .into_iter()
        .map(|h| h.join().expect("rank panicked"))
        .collect()
}

#[test]
fn test_two_rank_pipeline_partitions_by_band() {
    let config = PipelineConfig {
        contour: ContourSettings {
            isovalues: IsovalueSpec::values(vec![0.5, 0.8]).with_variable("distance"),
            ..ContourSettings::default()
        },
        opacity: 0.3,
        ..PipelineConfig::default()
    };
    let tree = IntervalTree::from_domains("distance", [&sphere_domain(-1.0), &sphere_domain(0.0)])
        .unwrap();

    let results = spmd(2, move |comm| {
        let domain = LocalDomain::new(comm.rank(), sphere_domain(-1.0 + comm.rank() as f32));
        let local_cells = extract_isosurfaces(
            &MarchingCells,
            domain.index,
            &domain.mesh,
            Some("distance"),
            &ResolvedIsovalues::new(vec![0.5, 0.8]),
            &LabelMode::PerIsovalue,
        )
        .unwrap()
        .fragments()
        .map_or(0, LabeledFragmentCollection::num_cells);
        let output = RankPipeline::new(config.clone())
            .run(&[domain], Some(&tree), &context(), &comm)
            .unwrap();
        (local_cells, output)
    });

    let input_cells: usize = results.iter().map(|(cells, _)| cells).sum();
    let output_cells: usize = results.iter().map(|(_, o)| o.surface.num_cells()).sum();
    let multi: usize = results.iter().map(|(_, o)| o.stats.multi_rank_cells).sum();
    assert!(input_cells > 0);
    assert_eq!(output_cells, input_cells + multi);

    let partition = BandPartition::new(120, 2);
    let transform = context().display_transform().unwrap();
    for (rank, (_, output)) in results.iter().enumerate() {
        assert_eq!(output.fragments, 2);
        assert_eq!(output.stats.dropped_cells, 0);
        output.surface.validate().unwrap();

        // Every received cell touches the rank's band
        let band = partition.band(rank);
        for (_, _, ids) in output.surface.iter_cells() {
            let ys: Vec<f32> = ids
                .iter()
                .filter_map(|&id| transform.to_display(output.surface.points[id as usize]))
                .map(|p| p.y)
                .collect();
            let lo = ys.iter().copied().fold(f32::INFINITY, f32::min);
            let hi = ys.iter().copied().fold(f32::NEG_INFINITY, f32::max);
            assert!(hi >= band.start as f32 && lo < band.end as f32);
        }
    }
    assert_eq!(
        results[0].1.stats.bytes_sent,
        results[1].1.stats.bytes_received
    );
}

#[test]
fn test_ranks_agree_on_levels_without_tree() {
    // Rank 0 sees distances near the origin, rank 1 only far ones
    let results = spmd(2, |comm| {
        let mut domain = sphere_domain(-1.0);
        if comm.rank() == 1 {
            let scaled = domain
                .point_data()
                .get("distance")
                .unwrap()
                .values()
                .iter()
                .map(|v| v * 3.0)
                .collect();
            domain.add_point_scalars("distance", scaled).unwrap();
        }
        let config = PipelineConfig {
            contour: ContourSettings {
                isovalues: IsovalueSpec::levels(4),
                ..ContourSettings::default()
            },
            ..PipelineConfig::default()
        };
        let local = scan_extents("distance", [&domain]);
        let output = RankPipeline::new(config)
            .run(&[LocalDomain::new(comm.rank(), domain)], None, &context(), &comm)
            .unwrap();
        (local, output.isovalues)
    });

    let (lo0, hi0) = results[0].0.unwrap();
    let (_, hi1) = results[1].0.unwrap();
    assert!(hi1 > hi0);
    assert_eq!(results[0].1, results[1].1);
    let values = results[0].1.values();
    assert_eq!(values.len(), 4);
    let offset = (hi1 - lo0) / 5.0;
    assert!((values[0] - (lo0 + offset)).abs() < 1e-6);
    assert!((values[3] - (hi1 - offset)).abs() < 1e-6);
}

#[test]
fn test_global_extents_over_threads() {
    let results = spmd(3, |comm| {
        let local = match comm.rank() {
            0 => Some((1.0, 2.0)),
            1 => None,
            _ => Some((-4.0, 0.5)),
        };
        global_extents(local, &comm).unwrap()
    });
    assert!(results.iter().all(|r| *r == Some((-4.0, 2.0))));
}

#[test]
fn test_empty_ranks_still_participate() {
    let results = spmd(3, |comm| {
        let local = if comm.rank() == 2 {
            let mut mesh = PolyData::from_triangles(
                vec![
                    Vec3::new(-0.5, -0.9, 0.0),
                    Vec3::new(0.5, -0.9, 0.0),
                    Vec3::new(0.0, 0.9, 0.0),
                ],
                &[[0, 1, 2]],
            );
            mesh.cell_data.insert(DataArray::scalars("id", vec![7.0]));
            mesh
        } else {
            PolyData::new()
        };
        ImageSpaceRedistributor::default()
            .redistribute(&local, &context(), &comm)
            .unwrap()
    });
    // The tall triangle crosses every band
    for output in &results {
        assert_eq!(output.num_cells(), 1);
        assert_eq!(output.cell_data.get("id").unwrap().values(), &[7.0]);
        assert_eq!(output.polys.cell(0), &[0, 1, 2]);
    }
}

/// Triangle per `(x, y_lo, y_hi)`, narrow in x, tagged with its index as cell data.
fn triangles(spans: &[(f32, f32, f32)]) -> PolyData {
    let mut points = Vec::new();
    let mut tris = Vec::new();
    for (i, &(x, lo, hi)) in (0_u32..).zip(spans) {
        points.extend([
            Vec3::new(x - 0.1, lo, 0.0),
            Vec3::new(x + 0.1, lo, 0.0),
            Vec3::new(x, hi, 0.0),
        ]);
        tris.push([3 * i, 3 * i + 1, 3 * i + 2]);
    }
    PolyData::from_triangles(points, &tris)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_two_ranks_conserve_cells(
        per_rank in prop::collection::vec(
            prop::collection::vec((-0.8f32..0.8, -0.9f32..0.9, -0.9f32..0.9), 0..12),
            2,
        )
    ) {
        let inputs: Vec<PolyData> = per_rank.iter().map(|spans| triangles(spans)).collect();
        let input_cells: usize = inputs.iter().map(PolyData::num_cells).sum();
        let results = spmd(2, move |comm| {
            ImageSpaceRedistributor::default()
                .redistribute_with_stats(&inputs[comm.rank()], &context(), &comm)
                .unwrap()
        });

        let output_cells: usize = results.iter().map(|(o, _)| o.num_cells()).sum();
        let multi: usize = results.iter().map(|(_, s)| s.multi_rank_cells).sum();
        let dropped: usize = results.iter().map(|(_, s)| s.dropped_cells).sum();
        prop_assert_eq!(output_cells, input_cells - dropped + multi);
        for (output, _) in &results {
            prop_assert!(output.validate().is_ok());
        }
    }
}
