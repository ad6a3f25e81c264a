//! pH-recovery optimization: a golden-section search over feed pH that
//! maximizes sustainable recovery, and reagent dosing to reach a chosen pH.

use serde::Serialize;

use crate::chemistry::engine::{ChemistryEngine, Reagent};
use crate::chemistry::validator::WaterComposition;
use crate::error::RoError;
use crate::models::{ChemicalDosing, Deadline};
use crate::scaling::{ScalingThresholds, sustainable_recovery};

/// Chemically sensible feed-pH window for polyamide RO.
pub const PH_MIN: f64 = 5.5;
pub const PH_MAX: f64 = 9.0;
const PH_INTERVAL_TOL: f64 = 0.05;
const PH_MATCH_TOL: f64 = 0.02;
const DOSE_CAP_MMOL_L: f64 = 200.0;
const GOLDEN: f64 = 0.618_033_988_749_894_8;

#[derive(Clone, Copy, Debug, Serialize)]
pub struct PhOptimum {
    pub ph: f64,
    pub sustainable_recovery: f64,
}

/// One reagent option to move the feed to a target pH.
#[derive(Clone, Debug, Serialize)]
pub struct DoseOption {
    pub reagent: Reagent,
    pub dose_mg_l: f64,
    pub cost_usd_m3: f64,
}

/// Find the reagent amount (mmol/L) that brings the water to `target_ph`.
/// Doubling search for an upper bracket, then bisection on the dose.
fn dose_for_ph(
    engine: &dyn ChemistryEngine,
    water: &WaterComposition,
    current_ph: f64,
    temperature_c: f64,
    reagent: Reagent,
    target_ph: f64,
    deadline: Deadline,
) -> Result<f64, RoError> {
    let raising = reagent.alkalinity_eq_per_mol() > 0.0;
    let reaches = |ph: f64| if raising { ph >= target_ph } else { ph <= target_ph };

    let mut hi = 0.1;
    loop {
        deadline.check()?;
        let state = engine.dose(water, current_ph, temperature_c, reagent, hi)?;
        if reaches(state.ph) {
            break;
        }
        hi *= 2.0;
        if hi > DOSE_CAP_MMOL_L {
            return Err(RoError::Chemistry {
                detail: format!(
                    "{} cannot reach pH {target_ph:.2} within {DOSE_CAP_MMOL_L} mmol/L",
                    reagent.label()
                ),
            });
        }
    }

    let mut lo = 0.0;
    for _ in 0..40 {
        deadline.check()?;
        let mid = 0.5 * (lo + hi);
        let state = engine.dose(water, current_ph, temperature_c, reagent, mid)?;
        if (state.ph - target_ph).abs() <= PH_MATCH_TOL {
            return Ok(mid);
        }
        if reaches(state.ph) {
            hi = mid;
        } else {
            lo = mid;
        }
    }
    Ok(0.5 * (lo + hi))
}

/// Adjust the water's carbonate system to a probe pH through the chemistry
/// engine, returning the adjusted composition.
pub fn titrate_to_ph(
    engine: &dyn ChemistryEngine,
    water: &WaterComposition,
    current_ph: f64,
    temperature_c: f64,
    target_ph: f64,
    deadline: Deadline,
) -> Result<WaterComposition, RoError> {
    if (target_ph - current_ph).abs() < PH_MATCH_TOL {
        return Ok(water.clone());
    }
    let reagent = if target_ph > current_ph {
        Reagent::SodiumHydroxide
    } else {
        Reagent::HydrochloricAcid
    };
    let mmol = dose_for_ph(
        engine,
        water,
        current_ph,
        temperature_c,
        reagent,
        target_ph,
        deadline,
    )?;
    let state = engine.dose(water, current_ph, temperature_c, reagent, mmol)?;
    Ok(state.composition)
}

/// Golden-section search over feed pH maximizing sustainable recovery.
/// Endpoints are evaluated too, so a monotone response still returns the
/// best boundary point.
pub fn maximize_sustainable_recovery(
    engine: &dyn ChemistryEngine,
    water: &WaterComposition,
    feed_ph: f64,
    temperature_c: f64,
    thresholds: &ScalingThresholds,
    deadline: Deadline,
) -> Result<PhOptimum, RoError> {
    let eval = |ph: f64| -> Result<f64, RoError> {
        deadline.check()?;
        let adjusted = titrate_to_ph(engine, water, feed_ph, temperature_c, ph, deadline)?;
        sustainable_recovery(engine, &adjusted, ph, temperature_c, thresholds, deadline)
    };

    let mut best = PhOptimum {
        ph: PH_MIN,
        sustainable_recovery: eval(PH_MIN)?,
    };
    let r_hi = eval(PH_MAX)?;
    if r_hi > best.sustainable_recovery {
        best = PhOptimum {
            ph: PH_MAX,
            sustainable_recovery: r_hi,
        };
    }

    let (mut a, mut b) = (PH_MIN, PH_MAX);
    let mut x1 = b - GOLDEN * (b - a);
    let mut x2 = a + GOLDEN * (b - a);
    let mut f1 = eval(x1)?;
    let mut f2 = eval(x2)?;
    while b - a > PH_INTERVAL_TOL {
        deadline.check()?;
        if f1 >= f2 {
            b = x2;
            x2 = x1;
            f2 = f1;
            x1 = b - GOLDEN * (b - a);
            f1 = eval(x1)?;
        } else {
            a = x1;
            x1 = x2;
            f1 = f2;
            x2 = a + GOLDEN * (b - a);
            f2 = eval(x2)?;
        }
        let (x, f) = if f1 >= f2 { (x1, f1) } else { (x2, f2) };
        if f > best.sustainable_recovery {
            best = PhOptimum {
                ph: x,
                sustainable_recovery: f,
            };
        }
    }
    Ok(best)
}

/// Reagent doses (mg/L) and unit costs to move the feed to `target_ph`,
/// cheapest first. Raising pH offers NaOH; lowering offers HCl and H2SO4.
pub fn chemical_dose_to_reach(
    engine: &dyn ChemistryEngine,
    water: &WaterComposition,
    current_ph: f64,
    temperature_c: f64,
    target_ph: f64,
    prices: &ChemicalDosing,
    deadline: Deadline,
) -> Result<Vec<DoseOption>, RoError> {
    if (target_ph - current_ph).abs() < PH_MATCH_TOL {
        return Ok(Vec::new());
    }
    let candidates: Vec<(Reagent, f64)> = if target_ph > current_ph {
        vec![(Reagent::SodiumHydroxide, prices.naoh_price_usd_kg)]
    } else {
        vec![
            (Reagent::HydrochloricAcid, prices.hcl_price_usd_kg),
            (Reagent::SulfuricAcid, prices.h2so4_price_usd_kg),
        ]
    };
    let mut options = Vec::new();
    for (reagent, price_usd_kg) in candidates {
        let mmol = dose_for_ph(
            engine,
            water,
            current_ph,
            temperature_c,
            reagent,
            target_ph,
            deadline,
        )?;
        let dose_mg_l = mmol * reagent.mw_g_mol();
        options.push(DoseOption {
            reagent,
            dose_mg_l,
            // mg/L is g/m^3; price is per kg.
            cost_usd_m3: dose_mg_l * 1e-3 * price_usd_kg,
        });
    }
    options.sort_by(|a, b| a.cost_usd_m3.total_cmp(&b.cost_usd_m3));
    Ok(options)
}
