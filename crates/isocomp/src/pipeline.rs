//! The per-rank pipeline: isosurfaces of the local domains, composited by screen band.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use isocomp_composite::{
    Communicator, ImageSpaceRedistributor, RedistributeStats, RenderContext,
};
use isocomp_contour::{
    scan_extents, ExtractOutput, ExtractorState, IsosurfaceExtractor, ResolvedIsovalues,
};
use isocomp_core::{
    ContourSettings, DataArray, DomainExtents, IsocompError, JsonConfig, PolyData,
    RedistributeOptions, Result, VolumeMesh, COLORS,
};

use crate::color::ColorMap;

/// Everything one pipeline execution needs besides its data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub contour: ContourSettings,
    pub redistribute: RedistributeOptions,
    pub color_map: ColorMap,
    /// Opacity of every isosurface, in `[0, 1]`.
    pub opacity: f32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            contour: ContourSettings::default(),
            redistribute: RedistributeOptions::default(),
            color_map: ColorMap::default(),
            opacity: 1.0,
        }
    }
}

impl JsonConfig for PipelineConfig {}

/// A domain held by this rank.
#[derive(Debug, Clone)]
pub struct LocalDomain {
    pub index: usize,
    pub mesh: Arc<VolumeMesh>,
}

impl LocalDomain {
    pub fn new(index: usize, mesh: VolumeMesh) -> Self {
        Self {
            index,
            mesh: Arc::new(mesh),
        }
    }
}

/// Result of one execution on one rank.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub isovalues: ResolvedIsovalues,
    /// Local domains that were contoured, after restriction.
    pub contoured_domains: Vec<usize>,
    /// Non-empty fragments produced locally.
    pub fragments: usize,
    /// Geometry covering this rank's band, ready to composite.
    pub surface: PolyData,
    pub stats: RedistributeStats,
}

/// Runs contouring and redistribution for one rank.
#[derive(Debug, Clone, Default)]
pub struct RankPipeline {
    config: PipelineConfig,
}

impl RankPipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Executes the pipeline. Collective over `comm`.
    ///
    /// `tree` is the interval tree of the contoured variable, if the metadata has one.
    /// Without it, or when it has no extents, the value range is gathered from the data of
    /// every rank before any isovalue is generated.
    ///
    /// An error on one rank (missing variable, invalid mesh) returns before the collective
    /// exchanges, so the other ranks of the group stall waiting for it.
    pub fn run(
        &self,
        domains: &[LocalDomain],
        tree: Option<&dyn DomainExtents>,
        context: &RenderContext,
        comm: &dyn Communicator,
    ) -> Result<PipelineOutput> {
        if context.camera.is_none() {
            return Err(IsocompError::NoCamera);
        }

        let mut extractor = IsosurfaceExtractor::new(self.config.contour.clone());
        if extractor.plan(tree)? == ExtractorState::AwaitingExtents {
            let variable = self
                .config
                .contour
                .isovalues
                .variable
                .as_deref()
                .or_else(|| domains.first().and_then(|d| d.mesh.active_scalars()));
            let local = variable
                .and_then(|v| scan_extents(v, domains.iter().map(|d| d.mesh.as_ref())));
            extractor.supply_extents(global_extents(local, comm)?)?;
        }
        let isovalues = extractor.isovalues().cloned().unwrap_or_default();

        let mut contoured_domains = Vec::new();
        let mut colored = Vec::new();
        for domain in domains {
            if extractor
                .domain_restriction()
                .is_some_and(|r| !r.contains(domain.index))
            {
                log::debug!("domain {} skipped by restriction", domain.index);
                continue;
            }
            contoured_domains.push(domain.index);
            if let ExtractOutput::Fragments(collection) =
                extractor.execute(domain.index, Arc::clone(&domain.mesh))?
            {
                for fragment in &collection.fragments {
                    let index = isovalues
                        .values()
                        .iter()
                        .position(|v| v.to_bits() == fragment.isovalue.to_bits())
                        .unwrap_or(0);
                    colored.push(self.colorize(&fragment.surface, index, isovalues.len())?);
                }
            }
        }
        extractor.release_data();
        extractor.finish();

        let fragments = colored.len();
        let refs: Vec<&PolyData> = colored.iter().collect();
        let merged = PolyData::append(&refs);
        drop(colored);
        log::info!(
            "rank {}: {} fragments from {} domains, {} cells before redistribution",
            comm.rank(),
            fragments,
            contoured_domains.len(),
            merged.num_cells()
        );

        let (surface, stats) = ImageSpaceRedistributor::new(self.config.redistribute.clone())
            .redistribute_with_stats(&merged, context, comm)?;
        Ok(PipelineOutput {
            isovalues,
            contoured_domains,
            fragments,
            surface,
            stats,
        })
    }

    /// Copies `surface` with a uniform RGBA color per point.
    fn colorize(&self, surface: &PolyData, index: usize, count: usize) -> Result<PolyData> {
        let color = self
            .config
            .color_map
            .isovalue_color(index, count, self.config.opacity);
        let mut out = surface.clone();
        let values = color.to_array().repeat(out.num_points());
        out.point_data.insert(DataArray::new(COLORS, 4, values)?);
        Ok(out)
    }
}

/// Combines the extents of every rank. Collective over `comm`.
pub fn global_extents(
    local: Option<(f64, f64)>,
    comm: &dyn Communicator,
) -> Result<Option<(f64, f64)>> {
    const RECORD: usize = std::mem::size_of::<[f64; 2]>();
    let mine = local.map_or([f64::NAN; 2], |(lo, hi)| [lo, hi]);
    let size = comm.size();
    let send = bytemuck::bytes_of(&mine).repeat(size);
    let counts = vec![RECORD; size];
    let displs: Vec<usize> = (0..size).map(|r| r * RECORD).collect();
    let mut recv = vec![0u8; RECORD * size];
    comm.all_to_all_v(&send, &counts, &displs, &mut recv, &counts, &displs)?;

    let all: Vec<f64> = bytemuck::pod_collect_to_vec(&recv);
    Ok(all
        .chunks_exact(2)
        .filter(|r| !r[0].is_nan() && !r[1].is_nan())
        .fold(None, |acc, r| {
            Some(acc.map_or((r[0], r[1]), |(lo, hi): (f64, f64)| {
                (lo.min(r[0]), hi.max(r[1]))
            }))
        }))
}
