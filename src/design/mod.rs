//! Vessel-array configuration search: enumerate stage splits under flux and
//! fouling constraints, and close the concentrate-recycle loop when a
//! single pass cannot reach the recovery target.

pub mod optimizer;
pub(crate) mod recycle;

pub use optimizer::enumerate_configurations;

use crate::membranes::MembraneSpec;
use crate::models::{DEFAULT_FLUX_TARGETS_LMH, Deadline, FLUX_RELAXATION_FLOOR};

/// Shared search inputs, fixed for one optimize call.
pub(crate) struct SearchContext<'a> {
    pub membrane: &'a MembraneSpec,
    pub elements_per_vessel: u32,
    pub flux_targets_lmh: Vec<f64>,
    pub flux_tolerance: f64,
    pub min_concentrate_per_vessel_m3h: f64,
    pub deadline: Deadline,
}

impl SearchContext<'_> {
    pub fn vessel_area_m2(&self) -> f64 {
        f64::from(self.elements_per_vessel) * self.membrane.element_area_m2
    }

    /// Stage flux target; the last entry repeats for deeper stages.
    pub fn flux_target(&self, stage_idx: usize) -> f64 {
        let targets = if self.flux_targets_lmh.is_empty() {
            &DEFAULT_FLUX_TARGETS_LMH[..]
        } else {
            &self.flux_targets_lmh[..]
        };
        targets
            .get(stage_idx)
            .or_else(|| targets.last())
            .copied()
            .unwrap_or(DEFAULT_FLUX_TARGETS_LMH[0])
    }

    /// Stage permeate (m3/h) at target flux for `n` vessels.
    pub fn permeate_coef(&self, stage_idx: usize, n: u32) -> f64 {
        self.flux_target(stage_idx) * f64::from(n) * self.vessel_area_m2() / 1000.0
    }

    pub fn scale_window(&self) -> (f64, f64) {
        (FLUX_RELAXATION_FLOOR, 1.0 + self.flux_tolerance)
    }
}

/// Flows through one stage of an evaluated split.
#[derive(Clone, Copy, Debug)]
pub(crate) struct StageFlows {
    pub vessels: u32,
    pub feed_m3h: f64,
    pub permeate_m3h: f64,
    pub concentrate_m3h: f64,
}

/// A split that survived the hydraulic checks.
#[derive(Clone, Debug)]
pub(crate) struct SplitEval {
    pub stages: Vec<StageFlows>,
    /// Achieved flux as a fraction of the stage targets.
    pub scale: f64,
    /// True when the scale sits below the flux tolerance band.
    pub relaxed: bool,
}

impl SplitEval {
    pub fn total_permeate_m3h(&self) -> f64 {
        self.stages.iter().map(|s| s.permeate_m3h).sum()
    }
}

/// Check one vessel split against the flux window and the fouling minimum.
///
/// A single scale factor on the flux-target vector is solved so total
/// permeate meets `permeate_target_m3h`; too much area clamps at the
/// relaxation floor (overshooting the target), too little is infeasible.
pub(crate) fn evaluate_split(
    ctx: &SearchContext<'_>,
    feed_m3h: f64,
    permeate_target_m3h: f64,
    split: &[u32],
) -> Option<SplitEval> {
    if split.iter().any(|&n| n == 0) {
        return None;
    }
    let (floor, ceil) = ctx.scale_window();
    let coef_total: f64 = split
        .iter()
        .enumerate()
        .map(|(k, &n)| ctx.permeate_coef(k, n))
        .sum();
    if coef_total <= 0.0 {
        return None;
    }
    let wanted = permeate_target_m3h / coef_total;
    if wanted > ceil + 1e-9 {
        return None;
    }
    let scale = wanted.clamp(floor, ceil);

    let mut stages = Vec::with_capacity(split.len());
    let mut q = feed_m3h;
    for (k, &n) in split.iter().enumerate() {
        let qp = scale * ctx.permeate_coef(k, n);
        let qc = q - qp;
        if qp <= 0.0 || qc <= 0.0 {
            return None;
        }
        if qc / f64::from(n) < ctx.min_concentrate_per_vessel_m3h {
            return None;
        }
        stages.push(StageFlows {
            vessels: n,
            feed_m3h: q,
            permeate_m3h: qp,
            concentrate_m3h: qc,
        });
        q = qc;
    }
    Some(SplitEval {
        stages,
        scale,
        relaxed: scale < 1.0 - ctx.flux_tolerance,
    })
}
