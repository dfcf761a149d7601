//! The isosurface stage.
//!
//! One [`IsosurfaceExtractor`] serves one pipeline execution over many domains:
//!
//! ```text
//! NeedsPlanning -> Restricting -> Ready ----------------------> Extracting -> Done
//!                              \-> AwaitingExtents -> Ready -/
//! ```
//!
//! Planning turns the isovalue request into isovalues and a domain restriction. When the
//! value range is unknown the stage waits for [`IsosurfaceExtractor::supply_extents`]; the
//! caller obtains the extents with a data pass over every domain (see [`scan_extents`]),
//! and restriction and streaming stay off for the rest of the execution.

use std::borrow::Cow;
use std::sync::Arc;

use isocomp_core::{
    Centering, ContourSettings, DomainExtents, IsocompError, LabelMode, PolyData, Result,
    VolumeMesh, GHOST_NODES,
};

use crate::marching::{CandidateCells, ContourPrimitive, MarchingCells};
use crate::planner::{plan_contract, resolve_isovalues, ContractPlan, DomainRestriction, ResolvedIsovalues};
use crate::range_tree::ScalarRangeTree;
use crate::recenter::recenter_to_nodes;

/// Lifecycle of an [`IsosurfaceExtractor`] within one execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractorState {
    /// Nothing resolved yet.
    NeedsPlanning,
    /// Computing isovalues and the domain restriction.
    Restricting,
    /// Waiting for the data extents of the variable.
    AwaitingExtents,
    /// Isovalues known, no domain processed yet.
    Ready,
    /// At least one domain processed.
    Extracting,
    /// Execution finished.
    Done,
}

impl ExtractorState {
    fn name(self) -> &'static str {
        match self {
            Self::NeedsPlanning => "needs planning",
            Self::Restricting => "restricting",
            Self::AwaitingExtents => "awaiting extents",
            Self::Ready => "ready",
            Self::Extracting => "extracting",
            Self::Done => "done",
        }
    }
}

/// The surface of one domain at one isovalue.
#[derive(Debug, Clone, PartialEq)]
pub struct Fragment {
    pub label: String,
    pub isovalue: f64,
    pub surface: PolyData,
}

/// All non-empty fragments of one domain.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LabeledFragmentCollection {
    pub domain: usize,
    pub fragments: Vec<Fragment>,
}

impl LabeledFragmentCollection {
    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.fragments.iter().map(|f| f.label.as_str())
    }

    /// Total cells over all fragments.
    pub fn num_cells(&self) -> usize {
        self.fragments.iter().map(|f| f.surface.num_cells()).sum()
    }
}

/// Result of extracting one domain.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractOutput {
    /// Contouring ran. The collection may be empty if no isovalue was crossed.
    Fragments(Arc<LabeledFragmentCollection>),
    /// There were no isovalues; nothing was contoured and the output is invalid.
    Invalidated,
}

impl ExtractOutput {
    /// Returns the fragments, if any were produced.
    pub fn fragments(&self) -> Option<&LabeledFragmentCollection> {
        match self {
            Self::Fragments(c) => Some(c),
            Self::Invalidated => None,
        }
    }
}

/// Contours `mesh` at every isovalue.
///
/// `variable` falls back to the mesh's active scalars. A cell-centered variable is first
/// recentered onto the nodes in a working copy owned by this call. With more than one
/// isovalue a [`ScalarRangeTree`] limits each pass to the cells that can be crossed.
/// Fragments without cells are dropped and ghost-node flags are removed from the rest.
pub fn extract_isosurfaces<P: ContourPrimitive + ?Sized>(
    primitive: &P,
    domain: usize,
    mesh: &VolumeMesh,
    variable: Option<&str>,
    isovalues: &ResolvedIsovalues,
    labels: &LabelMode,
) -> Result<ExtractOutput> {
    let variable = variable
        .or_else(|| mesh.active_scalars())
        .ok_or(IsocompError::NoActiveVariable)?;
    if isovalues.is_empty() {
        log::debug!("domain {domain}: no isovalues, output invalidated");
        return Ok(ExtractOutput::Invalidated);
    }

    let working: Cow<'_, VolumeMesh> = match mesh.centering_of(variable) {
        Some(Centering::Node) => Cow::Borrowed(mesh),
        Some(Centering::Cell) => Cow::Owned(recenter_to_nodes(mesh, variable)?),
        None => return Err(IsocompError::VariableNotFound(variable.to_string())),
    };
    let array = working
        .point_data()
        .get(variable)
        .ok_or_else(|| IsocompError::VariableNotFound(variable.to_string()))?;
    if array.components() != 1 {
        return Err(IsocompError::VariableNotFound(format!(
            "{variable} (has {} components, expected a scalar)",
            array.components()
        )));
    }
    let scalars = array.values();

    let tree = (isovalues.len() > 1).then(|| ScalarRangeTree::build(&working, scalars));

    let mut fragments = Vec::with_capacity(isovalues.len());
    for (isovalue, value_label) in isovalues.iter() {
        let candidates = tree.as_ref().map(|t| t.cells_containing(isovalue));
        let cells = match &candidates {
            Some(ids) => CandidateCells::Only(ids),
            None => CandidateCells::All,
        };
        let mut surface = primitive.contour_at(&working, scalars, isovalue, cells)?;
        if surface.is_empty() {
            log::debug!("domain {domain}: isovalue {value_label} produced no cells, dropped");
            continue;
        }
        surface.point_data.remove(GHOST_NODES);

        let label = match labels {
            LabelMode::PerIsovalue => value_label.to_string(),
            LabelMode::Fixed(label) => label.clone(),
        };
        fragments.push(Fragment {
            label,
            isovalue,
            surface,
        });
    }

    log::debug!(
        "domain {domain}: {} of {} isovalues produced geometry",
        fragments.len(),
        isovalues.len()
    );
    Ok(ExtractOutput::Fragments(Arc::new(LabeledFragmentCollection {
        domain,
        fragments,
    })))
}

/// Returns the `[min, max]` of `variable` across `domains`, or `None` if it has no values.
pub fn scan_extents<'a>(
    variable: &str,
    domains: impl IntoIterator<Item = &'a VolumeMesh>,
) -> Option<(f64, f64)> {
    domains
        .into_iter()
        .filter_map(|mesh| {
            mesh.point_data()
                .get(variable)
                .or_else(|| mesh.cell_data().get(variable))?
                .range()
        })
        .fold(None, |acc, (lo, hi)| {
            let (lo, hi) = (f64::from(lo), f64::from(hi));
            Some(acc.map_or((lo, hi), |(a, b): (f64, f64)| (a.min(lo), b.max(hi))))
        })
}

/// The isosurface stage for one pipeline execution.
pub struct IsosurfaceExtractor<P = MarchingCells> {
    settings: ContourSettings,
    primitive: P,
    state: ExtractorState,
    isovalues: Option<ResolvedIsovalues>,
    restriction: Option<DomainRestriction>,
    streaming: bool,
    input: Option<Arc<VolumeMesh>>,
    output: Option<Arc<LabeledFragmentCollection>>,
}

impl IsosurfaceExtractor<MarchingCells> {
    /// Creates a stage using the built-in marching cells primitive.
    pub fn new(settings: ContourSettings) -> Self {
        Self::with_primitive(settings, MarchingCells)
    }
}

impl<P: ContourPrimitive> IsosurfaceExtractor<P> {
    /// Creates a stage with a custom contouring primitive.
    pub fn with_primitive(settings: ContourSettings, primitive: P) -> Self {
        Self {
            settings,
            primitive,
            state: ExtractorState::NeedsPlanning,
            isovalues: None,
            restriction: None,
            streaming: true,
            input: None,
            output: None,
        }
    }

    pub fn settings(&self) -> &ContourSettings {
        &self.settings
    }

    pub fn state(&self) -> ExtractorState {
        self.state
    }

    /// Resolved isovalues, once known.
    pub fn isovalues(&self) -> Option<&ResolvedIsovalues> {
        self.isovalues.as_ref()
    }

    /// Domains that must be loaded; `None` means all of them.
    pub fn domain_restriction(&self) -> Option<&DomainRestriction> {
        self.restriction.as_ref()
    }

    /// Whether domains may be streamed one at a time this execution.
    pub fn streaming_allowed(&self) -> bool {
        self.streaming
    }

    /// Plans the execution against optional per-domain extents.
    pub fn plan(&mut self, extents: Option<&dyn DomainExtents>) -> Result<ExtractorState> {
        self.expect_state("plan", &[ExtractorState::NeedsPlanning])?;
        self.state = ExtractorState::Restricting;

        let plan = match plan_contract(&self.settings.isovalues, extents) {
            Ok(plan) => plan,
            Err(err) => {
                self.state = ExtractorState::NeedsPlanning;
                return Err(err);
            }
        };
        self.state = match plan {
            ContractPlan::Restricted { isovalues, domains } => {
                self.isovalues = Some(isovalues);
                self.restriction = Some(domains);
                ExtractorState::Ready
            }
            ContractPlan::Unrestricted { isovalues } => {
                self.isovalues = Some(isovalues);
                self.restriction = None;
                ExtractorState::Ready
            }
            ContractPlan::ExtentsRequired => {
                self.restriction = None;
                self.streaming = false;
                ExtractorState::AwaitingExtents
            }
        };
        Ok(self.state)
    }

    /// Supplies the data extents found by a pass over all domains.
    pub fn supply_extents(&mut self, extents: Option<(f64, f64)>) -> Result<()> {
        self.expect_state("supply extents", &[ExtractorState::AwaitingExtents])?;
        self.isovalues = Some(resolve_isovalues(&self.settings.isovalues, extents)?);
        self.restriction = None;
        self.streaming = false;
        self.state = ExtractorState::Ready;
        Ok(())
    }

    /// Contours one domain.
    pub fn execute(&mut self, domain: usize, mesh: Arc<VolumeMesh>) -> Result<ExtractOutput> {
        self.expect_state(
            "execute",
            &[ExtractorState::Ready, ExtractorState::Extracting],
        )?;
        let Some(isovalues) = self.isovalues.as_ref() else {
            return Err(self.state_error("execute"));
        };
        self.state = ExtractorState::Extracting;

        let output = extract_isosurfaces(
            &self.primitive,
            domain,
            &mesh,
            self.settings.isovalues.variable.as_deref(),
            isovalues,
            &self.settings.labels,
        )?;
        self.input = Some(mesh);
        self.output = match &output {
            ExtractOutput::Fragments(c) => Some(Arc::clone(c)),
            ExtractOutput::Invalidated => None,
        };
        Ok(output)
    }

    /// Ends the execution.
    pub fn finish(&mut self) {
        self.state = ExtractorState::Done;
    }

    /// Returns to [`ExtractorState::NeedsPlanning`] for another execution.
    pub fn reset(&mut self) {
        self.state = ExtractorState::NeedsPlanning;
        self.isovalues = None;
        self.restriction = None;
        self.streaming = true;
    }

    /// Drops the reference to the last input mesh. The last output is kept.
    pub fn release_data(&mut self) {
        self.input = None;
    }

    /// Whether the stage still holds its last input.
    pub fn holds_input(&self) -> bool {
        self.input.is_some()
    }

    /// The output of the most recent [`execute`](Self::execute).
    pub fn last_output(&self) -> Option<&Arc<LabeledFragmentCollection>> {
        self.output.as_ref()
    }

    fn expect_state(&self, operation: &'static str, allowed: &[ExtractorState]) -> Result<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(self.state_error(operation))
        }
    }

    fn state_error(&self, operation: &'static str) -> IsocompError {
        IsocompError::InvalidState {
            operation,
            state: self.state.name(),
        }
    }
}
