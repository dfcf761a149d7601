//! Isovalue resolution and domain restriction.
//!
//! Before any domain is read, the isosurface stage turns an [`IsovalueSpec`] into the final
//! list of isovalues and, when per-domain extents are available, the set of domains whose
//! value range can contain one of them. Only those domains need to be loaded.
//!
//! Level and percentile requests need the value range of the variable. The range comes from
//! the user's min/max overrides first, then from the interval tree's global extents. When
//! neither is available the plan is [`ContractPlan::ExtentsRequired`]: every domain must be
//! streamed and the isovalues resolved later from the actual data extents.

use isocomp_core::{ContourMethod, DomainExtents, IsocompError, IsovalueSpec, Result, Scaling};

/// Significant digits in generated labels.
const LABEL_PRECISION: usize = 9;

/// Final isovalues with one label each.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedIsovalues {
    values: Vec<f64>,
    labels: Vec<String>,
}

impl ResolvedIsovalues {
    /// Wraps `values`, generating their labels.
    pub fn new(values: Vec<f64>) -> Self {
        let labels = values
            .iter()
            .map(|&v| format_general(v, LABEL_PRECISION))
            .collect();
        Self { values, labels }
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterates `(value, label)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (f64, &str)> {
        self.values
            .iter()
            .copied()
            .zip(self.labels.iter().map(String::as_str))
    }
}

/// Sorted set of domain indices that must be loaded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DomainRestriction {
    domains: Vec<usize>,
}

impl DomainRestriction {
    pub fn domains(&self) -> &[usize] {
        &self.domains
    }

    pub fn contains(&self, domain: usize) -> bool {
        self.domains.binary_search(&domain).is_ok()
    }

    pub fn len(&self) -> usize {
        self.domains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }
}

/// Outcome of planning a contour request.
#[derive(Debug, Clone, PartialEq)]
pub enum ContractPlan {
    /// Isovalues are known and only `domains` can contain them.
    Restricted {
        isovalues: ResolvedIsovalues,
        domains: DomainRestriction,
    },
    /// Isovalues are known but no extents index exists; every domain is needed.
    Unrestricted { isovalues: ResolvedIsovalues },
    /// The value range is unknown. Every domain must be streamed and the isovalues
    /// resolved from the actual data extents.
    ExtentsRequired,
}

impl ContractPlan {
    /// Returns the isovalues, if they could be resolved.
    pub fn isovalues(&self) -> Option<&ResolvedIsovalues> {
        match self {
            Self::Restricted { isovalues, .. } | Self::Unrestricted { isovalues } => {
                Some(isovalues)
            }
            Self::ExtentsRequired => None,
        }
    }

    /// Returns the domain restriction, if one could be computed.
    pub fn restriction(&self) -> Option<&DomainRestriction> {
        match self {
            Self::Restricted { domains, .. } => Some(domains),
            _ => None,
        }
    }
}

/// Plans a contour request against optional per-domain extents.
pub fn plan_contract(
    spec: &IsovalueSpec,
    extents: Option<&dyn DomainExtents>,
) -> Result<ContractPlan> {
    let isovalues = if spec.needs_extents() {
        let data_extents = extents.and_then(|tree| tree.global_extents());
        if resolve_range(spec, data_extents).is_none() {
            log::info!("isovalue range unknown; all domains must be streamed");
            return Ok(ContractPlan::ExtentsRequired);
        }
        resolve_isovalues(spec, data_extents)?
    } else {
        ResolvedIsovalues::new(spec.values.clone())
    };

    let Some(tree) = extents else {
        log::info!(
            "no interval tree; contouring {} isovalues on all domains",
            isovalues.len()
        );
        return Ok(ContractPlan::Unrestricted { isovalues });
    };

    let domains = restrict_domains(isovalues.values(), tree);
    log::info!(
        "{} isovalues restrict loading to {} of {} domains",
        isovalues.len(),
        domains.len(),
        tree.num_domains()
    );
    Ok(ContractPlan::Restricted { isovalues, domains })
}

/// Resolves the final isovalues given the data extents (if known).
///
/// Explicit values pass through in input order. For levels and percentiles an
/// unresolvable or inverted range yields an empty list.
pub fn resolve_isovalues(
    spec: &IsovalueSpec,
    data_extents: Option<(f64, f64)>,
) -> Result<ResolvedIsovalues> {
    let values = match spec.method {
        ContourMethod::Values => spec.values.clone(),
        ContourMethod::Levels | ContourMethod::Percentiles => {
            let Some((lo, hi)) = resolve_range(spec, data_extents) else {
                log::warn!("isovalue range unresolved; nothing to contour");
                return Ok(ResolvedIsovalues::default());
            };
            if !lo.is_finite() || !hi.is_finite() || lo > hi {
                log::warn!("degenerate isovalue range [{lo}, {hi}]; nothing to contour");
                return Ok(ResolvedIsovalues::default());
            }
            if spec.method == ContourMethod::Levels {
                generate_levels(
                    lo,
                    hi,
                    spec.n_levels,
                    spec.scaling,
                    spec.min.is_some(),
                    spec.max.is_some(),
                )?
            } else {
                generate_percentiles(lo, hi, &spec.percentiles, spec.scaling)?
            }
        }
    };
    Ok(ResolvedIsovalues::new(values))
}

/// User overrides win over the data extents, bound by bound.
fn resolve_range(spec: &IsovalueSpec, data_extents: Option<(f64, f64)>) -> Option<(f64, f64)> {
    let lo = spec.min.or(data_extents.map(|(lo, _)| lo))?;
    let hi = spec.max.or(data_extents.map(|(_, hi)| hi))?;
    Some((lo, hi))
}

/// Generates `n` levels between `lo` and `hi`.
///
/// Each bound is inset by `(hi - lo) / (n + 1)` unless it is a user override. Under log
/// scaling the spacing and inset are computed on `log10` of the bounds, which must both be
/// positive. With `lo > hi` the levels descend from `lo`.
#[allow(clippy::cast_precision_loss)]
pub fn generate_levels(
    lo: f64,
    hi: f64,
    n: usize,
    scaling: Scaling,
    user_min: bool,
    user_max: bool,
) -> Result<Vec<f64>> {
    let (mut lo, mut hi) = to_scaled(lo, hi, scaling)?;
    if n == 0 {
        return Ok(Vec::new());
    }

    let offset = (hi - lo) / (n + 1) as f64;
    if !user_min {
        lo += offset;
    }
    if !user_max {
        hi -= offset;
    }

    let levels: Vec<f64> = if n == 1 {
        vec![lo]
    } else {
        let delta = (hi - lo) / (n - 1) as f64;
        (0..n).map(|i| lo + i as f64 * delta).collect()
    };
    Ok(from_scaled(levels, scaling))
}

/// Maps percentiles (0-100) onto `[lo, hi]`, in log10 space under log scaling.
pub fn generate_percentiles(
    lo: f64,
    hi: f64,
    percentiles: &[f64],
    scaling: Scaling,
) -> Result<Vec<f64>> {
    let (lo, hi) = to_scaled(lo, hi, scaling)?;
    let values = percentiles
        .iter()
        .map(|&p| lo + p * 0.01 * (hi - lo))
        .collect();
    Ok(from_scaled(values, scaling))
}

fn to_scaled(lo: f64, hi: f64, scaling: Scaling) -> Result<(f64, f64)> {
    match scaling {
        Scaling::Linear => Ok((lo, hi)),
        Scaling::Log => {
            if lo <= 0.0 || hi <= 0.0 {
                return Err(IsocompError::InvalidLimits { min: lo, max: hi });
            }
            Ok((lo.log10(), hi.log10()))
        }
    }
}

fn from_scaled(mut values: Vec<f64>, scaling: Scaling) -> Vec<f64> {
    if scaling == Scaling::Log {
        for v in &mut values {
            *v = 10f64.powf(*v);
        }
    }
    values
}

/// Unions the domains overlapping each isovalue into a sorted restriction.
pub fn restrict_domains(values: &[f64], extents: &dyn DomainExtents) -> DomainRestriction {
    let mut selected = vec![false; extents.num_domains()];
    for &value in values {
        for domain in extents.domains_overlapping(value) {
            if domain >= selected.len() {
                selected.resize(domain + 1, false);
            }
            selected[domain] = true;
        }
    }
    DomainRestriction {
        domains: selected
            .iter()
            .enumerate()
            .filter_map(|(d, &on)| on.then_some(d))
            .collect(),
    }
}

/// Formats `value` like C's `%.<precision>g`.
#[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]
pub fn format_general(value: f64, precision: usize) -> String {
    if value == 0.0 {
        return "0".to_string();
    }
    if !value.is_finite() {
        return value.to_string();
    }
    let precision = precision.max(1);
    let sci = format!("{:.*e}", precision - 1, value);
    let (mantissa, exponent) = sci.split_once('e').unwrap_or((sci.as_str(), "0"));
    let exponent: i32 = exponent.parse().unwrap_or(0);

    if exponent < -4 || exponent >= precision as i32 {
        let sign = if exponent < 0 { '-' } else { '+' };
        format!(
            "{}e{sign}{:02}",
            trim_fraction(mantissa),
            exponent.unsigned_abs()
        )
    } else {
        let decimals = (precision as i32 - 1 - exponent).max(0) as usize;
        trim_fraction(&format!("{value:.decimals$}")).to_string()
    }
}

fn trim_fraction(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use isocomp_core::IntervalTree;
    use proptest::prelude::*;

    fn assert_close(a: &[f64], b: &[f64]) {
        assert_eq!(a.len(), b.len(), "{a:?} vs {b:?}");
        for (x, y) in a.iter().zip(b) {
            assert!((x - y).abs() < 1e-9, "{a:?} vs {b:?}");
        }
    }

    /// Domain extents that report fixed answers per isovalue.
    struct FixedExtents;

    impl DomainExtents for FixedExtents {
        fn dimension(&self) -> usize {
            1
        }

        fn num_domains(&self) -> usize {
            4
        }

        fn global_extents(&self) -> Option<(f64, f64)> {
            None
        }

        fn domains_overlapping(&self, value: f64) -> Vec<usize> {
            if value == 2.0 {
                vec![3]
            } else if value == 4.0 {
                vec![7]
            } else {
                Vec::new()
            }
        }
    }

    #[test]
    fn test_five_linear_levels() {
        let levels = generate_levels(0.0, 10.0, 5, Scaling::Linear, false, false).unwrap();
        assert_close(
            &levels,
            &[10.0 / 6.0, 20.0 / 6.0, 5.0, 40.0 / 6.0, 50.0 / 6.0],
        );
    }

    #[test]
    fn test_single_level_is_inset_lo() {
        let levels = generate_levels(0.0, 10.0, 1, Scaling::Linear, false, false).unwrap();
        assert_close(&levels, &[5.0]);
        assert!(generate_levels(0.0, 10.0, 0, Scaling::Linear, false, false)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_user_bounds_are_exact() {
        let levels = generate_levels(0.0, 10.0, 3, Scaling::Linear, true, true).unwrap();
        assert_close(&levels, &[0.0, 5.0, 10.0]);
        let levels = generate_levels(0.0, 10.0, 3, Scaling::Linear, true, false).unwrap();
        assert_close(&levels, &[0.0, 3.75, 7.5]);
    }

    #[test]
    fn test_log_levels() {
        let levels = generate_levels(1.0, 1000.0, 4, Scaling::Log, true, true).unwrap();
        assert_close(&levels, &[1.0, 10.0, 100.0, 1000.0]);
    }

    #[test]
    fn test_log_rejects_non_positive_bounds() {
        let err = generate_levels(0.0, 10.0, 3, Scaling::Log, false, false).unwrap_err();
        assert!(matches!(err, IsocompError::InvalidLimits { .. }));
        assert!(err.is_configuration());
        assert!(generate_percentiles(-1.0, 10.0, &[50.0], Scaling::Log).is_err());
    }

    #[test]
    fn test_inverted_levels_descend() {
        let levels = generate_levels(10.0, 0.0, 3, Scaling::Linear, true, true).unwrap();
        assert_close(&levels, &[10.0, 5.0, 0.0]);
    }

    #[test]
    fn test_percentile_endpoints() {
        let values = generate_percentiles(2.0, 8.0, &[0.0, 50.0, 100.0], Scaling::Linear).unwrap();
        assert_close(&values, &[2.0, 5.0, 8.0]);
        let values = generate_percentiles(1.0, 100.0, &[0.0, 50.0, 100.0], Scaling::Log).unwrap();
        assert_close(&values, &[1.0, 10.0, 100.0]);
    }

    #[test]
    fn test_explicit_values_restriction() {
        let spec = IsovalueSpec::values(vec![2.0, 4.0]);
        let plan = plan_contract(&spec, Some(&FixedExtents)).unwrap();
        assert_eq!(plan.restriction().unwrap().domains(), &[3, 7]);
        assert_eq!(plan.isovalues().unwrap().values(), &[2.0, 4.0]);
    }

    #[test]
    fn test_explicit_values_keep_order() {
        let resolved = resolve_isovalues(&IsovalueSpec::values(vec![3.0, 1.0, 2.0]), None).unwrap();
        assert_eq!(resolved.values(), &[3.0, 1.0, 2.0]);
        assert_eq!(resolved.labels(), &["3", "1", "2"]);
    }

    #[test]
    fn test_levels_without_extents_require_streaming() {
        let plan = plan_contract(&IsovalueSpec::levels(5), Some(&FixedExtents)).unwrap();
        assert_eq!(plan, ContractPlan::ExtentsRequired);
        assert!(plan.isovalues().is_none());

        let plan = plan_contract(&IsovalueSpec::levels(5).with_min(0.0), None).unwrap();
        assert_eq!(plan, ContractPlan::ExtentsRequired);
    }

    #[test]
    fn test_user_extents_without_tree_are_unrestricted() {
        let spec = IsovalueSpec::levels(5).with_min(0.0).with_max(10.0);
        let plan = plan_contract(&spec, None).unwrap();
        let ContractPlan::Unrestricted { isovalues } = plan else {
            panic!("expected unrestricted plan");
        };
        assert_close(isovalues.values(), &[0.0, 2.5, 5.0, 7.5, 10.0]);
    }

    #[test]
    fn test_tree_extents_drive_levels_and_restriction() {
        let tree = IntervalTree::new("t", vec![[0.0, 2.0], [4.0, 6.0], [9.0, 10.0]]);
        let plan = plan_contract(&IsovalueSpec::levels(5), Some(&tree)).unwrap();
        let isovalues = plan.isovalues().unwrap();
        assert_close(
            isovalues.values(),
            &[10.0 / 6.0, 20.0 / 6.0, 5.0, 40.0 / 6.0, 50.0 / 6.0],
        );
        assert_eq!(plan.restriction().unwrap().domains(), &[0, 1]);
    }

    #[test]
    fn test_inverted_user_range_is_empty() {
        let spec = IsovalueSpec::levels(3).with_min(5.0).with_max(1.0);
        let resolved = resolve_isovalues(&spec, None).unwrap();
        assert!(resolved.is_empty());
    }

    #[test]
    fn test_log_spec_invalid_limits_propagate() {
        let spec = IsovalueSpec::percentiles(vec![10.0])
            .with_min(-1.0)
            .with_max(1.0)
            .with_log_scaling();
        assert!(matches!(
            plan_contract(&spec, None),
            Err(IsocompError::InvalidLimits { .. })
        ));
    }

    #[test]
    fn test_format_general() {
        assert_eq!(format_general(5.0, 9), "5");
        assert_eq!(format_general(10.0 / 6.0, 9), "1.66666667");
        assert_eq!(format_general(-0.25, 9), "-0.25");
        assert_eq!(format_general(1.5e10, 9), "1.5e+10");
        assert_eq!(format_general(1.0e-5, 9), "1e-05");
        assert_eq!(format_general(123_456_789.0, 9), "123456789");
        assert_eq!(format_general(0.0001, 9), "0.0001");
    }

    proptest! {
        #[test]
        fn linear_levels_are_evenly_spaced(
            lo in -1000.0f64..1000.0,
            width in 0.001f64..1000.0,
            n in 2usize..40,
        ) {
            let hi = lo + width;
            let levels = generate_levels(lo, hi, n, Scaling::Linear, false, false).unwrap();
            prop_assert_eq!(levels.len(), n);
            let offset = width / (n + 1) as f64;
            let tol = 1e-9 * (1.0 + lo.abs() + hi.abs());
            prop_assert!((levels[0] - (lo + offset)).abs() < tol);
            prop_assert!((levels[n - 1] - (hi - offset)).abs() < tol);
            let step = levels[1] - levels[0];
            for pair in levels.windows(2) {
                prop_assert!(pair[1] > pair[0]);
                prop_assert!(((pair[1] - pair[0]) - step).abs() < tol);
            }
        }

        #[test]
        fn restriction_is_exact_union(
            raw in prop::collection::vec((-50.0f64..50.0, 0.0f64..20.0), 1..60),
            values in prop::collection::vec(-60.0f64..70.0, 0..8),
        ) {
            let extents: Vec<[f64; 2]> = raw.iter().map(|&(lo, w)| [lo, lo + w]).collect();
            let tree = IntervalTree::new("v", extents.clone());
            let restriction = restrict_domains(&values, &tree);
            for (d, [lo, hi]) in extents.iter().enumerate() {
                let hit = values.iter().any(|v| lo <= v && v <= hi);
                prop_assert_eq!(restriction.contains(d), hit);
            }
        }
    }
}
