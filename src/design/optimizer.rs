//! Stage-split enumeration. Strategy scales with problem size: exhaustive
//! for small vessel counts, geometric n1 progression for medium, binary
//! search for large. Splits that violate a constraint are pruned silently;
//! only an empty result after the recycle pass is an error.

use std::collections::BTreeSet;

use crate::design::recycle;
use crate::design::{SearchContext, SplitEval, evaluate_split};
use crate::error::RoError;
use crate::models::{Configuration, RecycleInfo, StageDesign, Warning};

const MAX_STAGES: usize = 3;
const EXHAUSTIVE_VESSEL_LIMIT: f64 = 100.0;
const GEOMETRIC_VESSEL_LIMIT: f64 = 1000.0;
const VESSEL_EXPLOSION_LIMIT: u32 = 500;

/// Enumerate every viable configuration for the request, ordered by stage
/// count then proximity of achieved to target recovery.
pub fn enumerate_configurations(
    ctx: &SearchContext<'_>,
    feed_flow_m3h: f64,
    target_recovery: f64,
    allow_recycle: bool,
    max_recycle_ratio: f64,
) -> Result<Vec<Configuration>, RoError> {
    let permeate_target = target_recovery * feed_flow_m3h;
    let mut seen: BTreeSet<Vec<u32>> = BTreeSet::new();
    let mut configs: Vec<Configuration> = Vec::new();

    for k in 1..=MAX_STAGES {
        ctx.deadline.check()?;
        for (split, eval) in viable_splits(ctx, feed_flow_m3h, permeate_target, k)? {
            if seen.insert(split.clone()) {
                configs.push(build_configuration(
                    ctx,
                    feed_flow_m3h,
                    target_recovery,
                    &eval,
                    None,
                ));
            }
        }
    }

    if configs.is_empty() && allow_recycle {
        for solved in recycle::solve(ctx, feed_flow_m3h, target_recovery, max_recycle_ratio)? {
            configs.push(build_configuration(
                ctx,
                feed_flow_m3h,
                target_recovery,
                &solved.eval,
                Some(solved.recycle),
            ));
        }
    }

    if configs.is_empty() {
        return Err(RoError::NoFeasibleConfiguration {
            detail: format!(
                "recovery target {:.0}% is unreachable at {feed_flow_m3h} m3/h{}",
                target_recovery * 100.0,
                if allow_recycle {
                    " even with maximum recycle"
                } else {
                    " without recycle"
                }
            ),
        });
    }

    configs.sort_by(|a, b| {
        let ka = a.stages.len();
        let kb = b.stages.len();
        let da = (a.system_recovery - target_recovery).abs();
        let db = (b.system_recovery - target_recovery).abs();
        ka.cmp(&kb).then(da.total_cmp(&db))
    });
    Ok(configs)
}

/// All viable splits for a fixed stage count, via the size-appropriate
/// strategy.
fn viable_splits(
    ctx: &SearchContext<'_>,
    feed_m3h: f64,
    permeate_target_m3h: f64,
    k: usize,
) -> Result<Vec<(Vec<u32>, SplitEval)>, RoError> {
    let est_vessels = permeate_target_m3h * 1000.0 / (ctx.flux_target(0) * ctx.vessel_area_m2());
    let mut out: Vec<(Vec<u32>, SplitEval)> = Vec::new();
    let mut seen: BTreeSet<Vec<u32>> = BTreeSet::new();
    let mut push = |split: Vec<u32>, eval: SplitEval| {
        if seen.insert(split.clone()) {
            out.push((split, eval));
        }
    };

    if est_vessels <= EXHAUSTIVE_VESSEL_LIMIT {
        exhaustive(ctx, feed_m3h, permeate_target_m3h, k, &mut push)?;
    } else if est_vessels <= GEOMETRIC_VESSEL_LIMIT {
        geometric(ctx, feed_m3h, permeate_target_m3h, k, &mut push)?;
    } else {
        binary(ctx, feed_m3h, permeate_target_m3h, k, est_vessels, &mut push)?;
    }
    Ok(out)
}

fn stage_vessel_bound(ctx: &SearchContext<'_>, feed_m3h: f64) -> u32 {
    (feed_m3h / ctx.min_concentrate_per_vessel_m3h).floor() as u32
}

fn exhaustive(
    ctx: &SearchContext<'_>,
    feed_m3h: f64,
    permeate_target_m3h: f64,
    k: usize,
    push: &mut impl FnMut(Vec<u32>, SplitEval),
) -> Result<(), RoError> {
    let bound = stage_vessel_bound(ctx, feed_m3h).min(160);
    let mut split = vec![1u32; k];
    enumerate_rec(ctx, feed_m3h, permeate_target_m3h, 0, bound, &mut split, push)
}

fn enumerate_rec(
    ctx: &SearchContext<'_>,
    feed_m3h: f64,
    permeate_target_m3h: f64,
    depth: usize,
    bound: u32,
    split: &mut Vec<u32>,
    push: &mut impl FnMut(Vec<u32>, SplitEval),
) -> Result<(), RoError> {
    if depth == split.len() {
        if let Some(eval) = evaluate_split(ctx, feed_m3h, permeate_target_m3h, split) {
            push(split.clone(), eval);
        }
        return Ok(());
    }
    ctx.deadline.check()?;
    for n in 1..=bound.max(1) {
        split[depth] = n;
        enumerate_rec(
            ctx,
            feed_m3h,
            permeate_target_m3h,
            depth + 1,
            bound,
            &mut *split,
            &mut *push,
        )?;
    }
    Ok(())
}

/// Equal-apparent-recovery tail derivation: given the lead-stage vessel
/// count, size each later stage for an even share of the remaining
/// permeate, then search the +-1 neighborhood.
pub(crate) fn derived_splits(
    ctx: &SearchContext<'_>,
    feed_m3h: f64,
    permeate_target_m3h: f64,
    k: usize,
    n1: u32,
    last_stage_extra: &[u32],
) -> Vec<Vec<u32>> {
    if k == 1 {
        return vec![vec![n1]];
    }
    let mut stage_sets: Vec<Vec<u32>> = vec![vec![n1]];
    let mut q = (feed_m3h - ctx.permeate_coef(0, n1)).max(1e-9);
    let mut produced = ctx.permeate_coef(0, n1);
    for stage_idx in 1..k {
        let remaining = (permeate_target_m3h - produced).max(0.0);
        let m = (k - stage_idx) as f64;
        let frac = (remaining / q).clamp(0.0, 0.95);
        let r_stage = 1.0 - (1.0 - frac).powf(1.0 / m);
        let ideal = r_stage * q * 1000.0 / (ctx.flux_target(stage_idx) * ctx.vessel_area_m2());
        let mid = (ideal.round() as i64).max(1) as u32;
        let mut set: Vec<u32> = (mid.saturating_sub(2).max(1)..=mid + 2).collect();
        // The fouling minimum caps the vessel count against the expected
        // stage concentrate; the cap is often the binding candidate.
        let cap = ((q * (1.0 - r_stage)) / ctx.min_concentrate_per_vessel_m3h).floor() as u32;
        if cap >= 1 {
            set.push(cap);
            if cap >= 2 {
                set.push(cap - 1);
            }
        }
        if stage_idx == k - 1 {
            for &extra in last_stage_extra {
                if extra >= 1 {
                    set.push(extra);
                }
            }
        }
        set.sort_unstable();
        set.dedup();
        stage_sets.push(set);
        let qp = ctx.permeate_coef(stage_idx, mid);
        produced += qp;
        q = (q - qp).max(1e-9);
    }

    let mut splits = vec![Vec::with_capacity(k)];
    for set in &stage_sets {
        let mut next = Vec::with_capacity(splits.len() * set.len());
        for prefix in &splits {
            for &n in set {
                let mut s = prefix.clone();
                s.push(n);
                next.push(s);
            }
        }
        splits = next;
    }
    splits
}

/// Ideal lead-stage vessel count for an even per-stage recovery share.
fn ideal_n1(ctx: &SearchContext<'_>, feed_m3h: f64, permeate_target_m3h: f64, k: usize) -> f64 {
    let train_recovery = (permeate_target_m3h / feed_m3h).clamp(0.01, 0.99);
    let r_stage = 1.0 - (1.0 - train_recovery).powf(1.0 / k as f64);
    r_stage * feed_m3h * 1000.0 / (ctx.flux_target(0) * ctx.vessel_area_m2())
}

fn geometric(
    ctx: &SearchContext<'_>,
    feed_m3h: f64,
    permeate_target_m3h: f64,
    k: usize,
    push: &mut impl FnMut(Vec<u32>, SplitEval),
) -> Result<(), RoError> {
    let center = ideal_n1(ctx, feed_m3h, permeate_target_m3h, k).max(1.0);
    let bound = stage_vessel_bound(ctx, feed_m3h);
    let mut n1 = (center / 2.0).max(1.0);
    while n1 <= center * 2.0 {
        ctx.deadline.check()?;
        let lead = (n1.round() as u32).clamp(1, bound.max(1));
        for split in derived_splits(ctx, feed_m3h, permeate_target_m3h, k, lead, &[]) {
            if let Some(eval) = evaluate_split(ctx, feed_m3h, permeate_target_m3h, &split) {
                push(split, eval);
            }
        }
        n1 *= 1.04;
    }
    Ok(())
}

fn binary(
    ctx: &SearchContext<'_>,
    feed_m3h: f64,
    permeate_target_m3h: f64,
    k: usize,
    est_vessels: f64,
    push: &mut impl FnMut(Vec<u32>, SplitEval),
) -> Result<(), RoError> {
    let bound = stage_vessel_bound(ctx, feed_m3h).max(1);
    let feasible = |n1: u32| -> bool {
        derived_splits(ctx, feed_m3h, permeate_target_m3h, k, n1, &[])
            .iter()
            .any(|split| evaluate_split(ctx, feed_m3h, permeate_target_m3h, split).is_some())
    };

    // Smallest workable lead-stage count; the ideal split sits near it.
    let (mut lo, mut hi) = (1u32, bound.min((est_vessels * 2.0) as u32).max(2));
    while lo < hi {
        ctx.deadline.check()?;
        let mid = lo + (hi - lo) / 2;
        if feasible(mid) {
            hi = mid;
        } else {
            lo = mid + 1;
        }
    }
    for lead in lo.saturating_sub(2).max(1)..=lo + 2 {
        for split in derived_splits(ctx, feed_m3h, permeate_target_m3h, k, lead, &[]) {
            if let Some(eval) = evaluate_split(ctx, feed_m3h, permeate_target_m3h, &split) {
                push(split, eval);
            }
        }
    }
    Ok(())
}

/// Assemble the public record for one surviving split.
pub(crate) fn build_configuration(
    ctx: &SearchContext<'_>,
    system_feed_m3h: f64,
    target_recovery: f64,
    eval: &SplitEval,
    recycle: Option<RecycleInfo>,
) -> Configuration {
    let area = ctx.vessel_area_m2();
    let mut warnings = Vec::new();
    if eval.relaxed {
        warnings.push(Warning::FluxRelaxed {
            flux_fraction_of_target: eval.scale,
        });
    }

    let stages: Vec<StageDesign> = eval
        .stages
        .iter()
        .enumerate()
        .map(|(idx, s)| {
            if s.vessels > VESSEL_EXPLOSION_LIMIT {
                warnings.push(Warning::VesselCountExplosion {
                    stage: idx + 1,
                    vessels: s.vessels,
                });
            }
            StageDesign {
                stage: idx + 1,
                vessel_count: s.vessels,
                elements_per_vessel: ctx.elements_per_vessel,
                membrane_area_m2: f64::from(s.vessels) * area,
                target_flux_lmh: ctx.flux_target(idx),
                achieved_flux_lmh: eval.scale * ctx.flux_target(idx),
                feed_flow_m3h: s.feed_m3h,
                permeate_flow_m3h: s.permeate_m3h,
                concentrate_flow_m3h: s.concentrate_m3h,
            }
        })
        .collect();

    let total_permeate: f64 = stages.iter().map(|s| s.permeate_flow_m3h).sum();
    let system_recovery = match &recycle {
        Some(r) => 1.0 - r.disposal_flow_m3h / system_feed_m3h,
        None => total_permeate / system_feed_m3h,
    };

    Configuration {
        stages,
        system_feed_flow_m3h: system_feed_m3h,
        system_recovery,
        target_recovery,
        target_met: system_recovery + 1e-9 >= target_recovery,
        recycle,
        sustainable_r_max: None,
        warnings,
    }
}
