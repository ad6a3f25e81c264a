use std::collections::BTreeMap;

use crate::adapters::density;
use crate::chemistry::engine::ChemistryEngine;
use crate::chemistry::validator::WaterComposition;
use crate::chemistry::{EA_SALT, EA_WATER, Ion, R_GAS, SpeciesClass, T_KELVIN, T_REF_K};
use crate::error::RoError;
use crate::membranes::MembraneSpec;
use crate::models::{Configuration, Deadline, StageDesign};
use crate::performance::{
    OperatingAssumptions, PerformanceResult, StagePerformance, SystemPerformance,
};

const LMH_TO_M_S: f64 = 1.0 / 3.6e6;
const ATMOSPHERIC_PA: f64 = 101_325.0;
/// Representative solute diffusivity for the film-model mass transfer
/// coefficient, m^2/s.
const D_REF_M2_S: f64 = 1.5e-9;
const RECYCLE_MAX_ITERATIONS: usize = 50;
const RECYCLE_TOLERANCE: f64 = 1e-3;

/// Osmotic coefficient: 0.93 at typical brackish strength, approaching 1
/// linearly at infinite dilution.
fn osmotic_coefficient(tds_mg_l: f64) -> f64 {
    1.0 - 0.07 * (tds_mg_l / 5000.0).min(1.0)
}

/// van 't Hoff osmotic pressure over the dissolved-species sum.
fn osmotic_pressure_pa(osmolar_mol_l: f64, tds_mg_l: f64, temperature_c: f64) -> f64 {
    osmotic_coefficient(tds_mg_l) * osmolar_mol_l * 1000.0 * R_GAS * (temperature_c + T_KELVIN)
}

/// Arrhenius correction from the 25 C catalog value.
fn arrhenius(value_25c: f64, activation_j_mol: f64, temperature_c: f64) -> f64 {
    let t_k = temperature_c + T_KELVIN;
    value_25c * ((activation_j_mol / R_GAS) * (1.0 / T_REF_K - 1.0 / t_k)).exp()
}

/// Film-model mass transfer coefficient from the Schock & Miquel spacer
/// correlation, Sh = 0.065 Re^0.875 Sc^0.25.
fn mass_transfer_coefficient(
    membrane: &MembraneSpec,
    crossflow_m_s: f64,
    tds_mg_l: f64,
    temperature_c: f64,
) -> f64 {
    let rho = density::rho_kg_m3(tds_mg_l, temperature_c);
    let mu = density::mu_pa_s(temperature_c);
    let d_h = 2.0 * membrane.spacer_height_m;
    let re = (rho * crossflow_m_s * d_h / mu).max(1.0);
    let sc = mu / (rho * D_REF_M2_S);
    let sh = 0.065 * re.powf(0.875) * sc.powf(0.25);
    sh * D_REF_M2_S / d_h
}

struct StageState {
    permeate: WaterComposition,
    concentrate: WaterComposition,
    feed_pressure_pa: f64,
    exit_pressure_pa: f64,
    osmotic_wall_pa: f64,
    ndp_pa: f64,
    flux_lmh: f64,
    beta: f64,
    rejection: BTreeMap<Ion, f64>,
}

/// One stage of the solution-diffusion cascade. Pure arithmetic; the
/// chemistry pass happens separately once flows and compositions settle.
fn stage_pass(
    stage_idx: usize,
    design: &StageDesign,
    membrane: &MembraneSpec,
    feed: &WaterComposition,
    temperature_c: f64,
) -> Result<StageState, RoError> {
    let q_f = design.feed_flow_m3h;
    let q_p = design.permeate_flow_m3h;
    let q_c = design.concentrate_flow_m3h;
    let stage_no = stage_idx + 1;

    let flux_lmh = q_p * 1000.0 / design.membrane_area_m2;
    let j_m_s = flux_lmh * LMH_TO_M_S;
    if j_m_s <= 0.0 {
        return Err(RoError::FluxOutOfRange {
            stage: stage_no,
            detail: format!("non-positive flux {flux_lmh:.2} LMH"),
        });
    }

    let a_w = arrhenius(membrane.a_w_m_s_pa, EA_WATER, temperature_c);
    let b_ref = arrhenius(membrane.b_ref_m_s, EA_SALT, temperature_c);

    // Pressure estimate uses the full-retention concentrate; the ion-level
    // mass balance below refines the actual brine.
    let cf = q_f / q_c;
    let feed_osmolar = feed.osmolar_total();
    let feed_tds = feed.tds_mg_l();
    let avg_osmolar = feed_osmolar * (1.0 + cf) / 2.0;
    let avg_tds = feed_tds * (1.0 + cf) / 2.0;
    let conc_osmolar = feed_osmolar * cf;
    let conc_tds = feed_tds * cf;

    let vessels = f64::from(design.vessel_count);
    let crossflow =
        (q_f + q_c) / 2.0 / 3600.0 / (vessels * membrane.channel_cross_section_m2);
    let k_mt = mass_transfer_coefficient(membrane, crossflow, avg_tds, temperature_c);
    let beta = (j_m_s / k_mt).exp();

    let pi_avg = osmotic_pressure_pa(avg_osmolar, avg_tds, temperature_c);
    let pi_conc = osmotic_pressure_pa(conc_osmolar, conc_tds, temperature_c);
    let ndp = j_m_s / a_w;
    let rho = density::rho_kg_m3(avg_tds, temperature_c);
    let dp_spacer = membrane.spacer_dp_coefficient
        * rho
        * crossflow
        * crossflow
        / 2.0
        * f64::from(design.elements_per_vessel);

    let feed_pressure = pi_avg * beta + ndp + dp_spacer;
    // The tail elements must retain positive driving pressure.
    if pi_conc >= feed_pressure - dp_spacer {
        return Err(RoError::FluxOutOfRange {
            stage: stage_no,
            detail: format!(
                "osmotic pressure {pi_conc:.2e} Pa at the concentrate end exceeds applied pressure"
            ),
        });
    }
    if feed_pressure > membrane.max_pressure_pa {
        return Err(RoError::PressureLimitExceeded {
            stage: stage_no,
            computed_pa: feed_pressure,
            limit_pa: membrane.max_pressure_pa,
        });
    }

    // Per-ion passage, then electroneutrality restored by shrinking the
    // excess side so no permeate species exceeds its feed value.
    let mut permeate_ions: BTreeMap<Ion, f64> = BTreeMap::new();
    for (ion, mg) in feed.iter() {
        let props = ion.props();
        let r = match props.class {
            SpeciesClass::Charged => {
                let b_i = b_ref * props.b_scale;
                let r_sd = 1.0 - b_i / (j_m_s + b_i);
                if props.charge.abs() >= 2 {
                    1.0 - (1.0 - r_sd) / membrane.divalent_amplification
                } else {
                    r_sd
                }
            }
            SpeciesClass::Neutral { rejection } => rejection,
        };
        let r = r.clamp(0.0, 1.0);
        permeate_ions.insert(ion, mg * (1.0 - r));
    }
    let permeate = WaterComposition::from_parts(permeate_ions).rebalanced_by_reduction();

    let mut rejection = BTreeMap::new();
    let mut concentrate_ions: BTreeMap<Ion, f64> = BTreeMap::new();
    for (ion, mg_f) in feed.iter() {
        let mg_p = permeate.get(ion);
        rejection.insert(ion, (1.0 - mg_p / mg_f).clamp(0.0, 1.0));
        concentrate_ions.insert(ion, (mg_f * q_f - mg_p * q_p) / q_c);
    }
    let concentrate = WaterComposition::from_parts(concentrate_ions);

    Ok(StageState {
        permeate,
        concentrate,
        feed_pressure_pa: feed_pressure,
        exit_pressure_pa: feed_pressure - dp_spacer,
        osmotic_wall_pa: pi_avg * beta,
        ndp_pa: ndp,
        flux_lmh,
        beta,
        rejection,
    })
}

/// Run the hydraulic cascade for a given stage-1 feed composition.
fn cascade(
    config: &Configuration,
    membrane: &MembraneSpec,
    stage1_feed: &WaterComposition,
    temperature_c: f64,
    deadline: Deadline,
) -> Result<Vec<(WaterComposition, StageState)>, RoError> {
    let mut states = Vec::with_capacity(config.stages.len());
    let mut feed = stage1_feed.clone();
    for (idx, design) in config.stages.iter().enumerate() {
        deadline.check()?;
        let state = stage_pass(idx, design, membrane, &feed, temperature_c)?;
        let next = state.concentrate.clone();
        states.push((feed, state));
        feed = next;
    }
    Ok(states)
}

/// Simulate one configuration against a validated feed.
pub fn simulate(
    config: &Configuration,
    membrane: &MembraneSpec,
    fresh_feed: &WaterComposition,
    feed_ph: f64,
    temperature_c: f64,
    engine: &dyn ChemistryEngine,
    assumptions: &OperatingAssumptions,
    deadline: Deadline,
) -> Result<PerformanceResult, RoError> {
    if config.stages.is_empty() {
        return Err(RoError::NoFeasibleConfiguration {
            detail: "configuration has no stages".into(),
        });
    }
    if temperature_c > membrane.max_temperature_c {
        return Err(RoError::FluxOutOfRange {
            stage: 0,
            detail: format!(
                "feed temperature {temperature_c} C above membrane rating {} C",
                membrane.max_temperature_c
            ),
        });
    }

    // Recycle makes the flow graph cyclic; converge the blended stage-1
    // composition as a fixed point before the chemistry pass.
    let stage1_feed = match &config.recycle {
        None => fresh_feed.clone(),
        Some(recycle) => {
            let q_fresh = config.system_feed_flow_m3h;
            let q_recycle = recycle.recycle_flow_m3h;
            let mut blend = fresh_feed.clone();
            let mut converged = false;
            for _ in 0..RECYCLE_MAX_ITERATIONS {
                deadline.check()?;
                let states = cascade(config, membrane, &blend, temperature_c, deadline)?;
                let brine = &states.last().expect("stages checked non-empty").1.concentrate;
                let target = fresh_feed.blended(q_fresh, brine, q_recycle);
                let old_tds = blend.tds_mg_l();
                blend = blend.blended(1.0, &target, 1.0); // 0.5 under-relaxation
                let rel = (blend.tds_mg_l() - old_tds).abs() / blend.tds_mg_l().max(1e-9);
                if rel < RECYCLE_TOLERANCE {
                    converged = true;
                    break;
                }
            }
            if !converged {
                return Err(RoError::ConvergenceFailure {
                    context: "recycle blend composition".into(),
                    iterations: RECYCLE_MAX_ITERATIONS,
                });
            }
            blend
        }
    };

    let states = cascade(config, membrane, &stage1_feed, temperature_c, deadline)?;

    // Chemistry pass: stage concentrate pH and saturation at the stage
    // concentration factor, chained so stage k+1 inherits the brine pH.
    let mut stage_records = Vec::with_capacity(states.len());
    let mut ph_in = feed_ph;
    let mut pump_total_kw = 0.0;
    for (idx, (feed, state)) in states.iter().enumerate() {
        deadline.check()?;
        let design = &config.stages[idx];
        let stage_cf = design.feed_flow_m3h / design.concentrate_flow_m3h;
        let chem = engine.concentrate(feed, ph_in, temperature_c, stage_cf)?;

        let pump_kw = design.feed_flow_m3h / 3600.0 * state.feed_pressure_pa
            / assumptions.pump_efficiency
            / 1000.0;
        pump_total_kw += pump_kw;

        stage_records.push(StagePerformance {
            stage: idx + 1,
            feed_flow_m3h: design.feed_flow_m3h,
            feed_tds_mg_l: feed.tds_mg_l(),
            permeate_flow_m3h: design.permeate_flow_m3h,
            permeate_tds_mg_l: state.permeate.tds_mg_l(),
            concentrate_flow_m3h: design.concentrate_flow_m3h,
            concentrate_tds_mg_l: state.concentrate.tds_mg_l(),
            feed_pressure_pa: state.feed_pressure_pa,
            osmotic_pressure_pa: state.osmotic_wall_pa,
            net_driving_pressure_pa: state.ndp_pa,
            observed_flux_lmh: state.flux_lmh,
            polarization_factor: state.beta,
            pump_power_kw: pump_kw,
            ion_rejection: state.rejection.clone(),
            feed_composition: feed.clone(),
            permeate_composition: state.permeate.clone(),
            concentrate_composition: state.concentrate.clone(),
            concentrate_ph: chem.ph,
            saturation: chem.saturation.clone(),
        });
        ph_in = chem.ph;
    }

    // System totals on the external-feed basis.
    let q_system_feed = config.system_feed_flow_m3h;
    let q_permeate: f64 = config.stages.iter().map(|s| s.permeate_flow_m3h).sum();
    let brine = &states.last().expect("stages checked non-empty").1;
    let q_disposal = config.disposal_flow_m3h();

    let mut permeate_mix: BTreeMap<Ion, f64> = BTreeMap::new();
    for record in &stage_records {
        for (ion, mg) in record.permeate_composition.iter() {
            *permeate_mix.entry(ion).or_insert(0.0) += mg * record.permeate_flow_m3h;
        }
    }
    let permeate_mix = WaterComposition::from_parts(
        permeate_mix
            .into_iter()
            .map(|(i, v)| (i, v / q_permeate))
            .collect(),
    );

    let mut system_rejection = BTreeMap::new();
    for (ion, mg_f) in fresh_feed.iter() {
        let r = (1.0 - permeate_mix.get(ion) / mg_f).clamp(0.0, 1.0);
        system_rejection.insert(ion, r);
    }

    let erd_credit_kw = match assumptions.erd_efficiency {
        Some(eff) => {
            eff * q_disposal / 3600.0 * (brine.exit_pressure_pa - ATMOSPHERIC_PA).max(0.0) / 1000.0
        }
        None => 0.0,
    };
    let specific_energy = ((pump_total_kw - erd_credit_kw) / q_permeate).max(0.0);

    let system = SystemPerformance {
        system_feed_flow_m3h: q_system_feed,
        permeate_flow_m3h: q_permeate,
        disposal_flow_m3h: q_disposal,
        system_recovery: 1.0 - q_disposal / q_system_feed,
        specific_energy_kwh_m3: specific_energy,
        feed_tds_mg_l: fresh_feed.tds_mg_l(),
        permeate_tds_mg_l: permeate_mix.tds_mg_l(),
        disposal_tds_mg_l: brine.concentrate.tds_mg_l(),
        ion_rejection: system_rejection,
    };

    let scaling = stage_records
        .last()
        .map(|s| s.saturation.clone())
        .unwrap_or_default();

    Ok(PerformanceResult {
        configuration: config.clone(),
        stages: stage_records,
        system,
        scaling,
        warnings: config.warnings.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn osmotic_coefficient_tends_to_unity_when_dilute() {
        assert!((osmotic_coefficient(0.0) - 1.0).abs() < 1e-12);
        assert!((osmotic_coefficient(5000.0) - 0.93).abs() < 1e-12);
        assert!((osmotic_coefficient(35_000.0) - 0.93).abs() < 1e-12);
    }

    #[test]
    fn seawater_osmotic_pressure_is_near_27_bar() {
        // ~1.12 mol/L dissolved species at 35 g/L
        let pi = osmotic_pressure_pa(1.12, 35_000.0, 25.0);
        assert!(pi > 24.0e5 && pi < 29.0e5, "pi = {pi}");
    }

    #[test]
    fn permeability_rises_with_temperature() {
        let a25 = 9.6e-12;
        let a35 = arrhenius(a25, EA_WATER, 35.0);
        let a15 = arrhenius(a25, EA_WATER, 15.0);
        assert!(a35 > a25 && a15 < a25);
        // ~2.7%/C doubling-ish slope sanity
        assert!(a35 / a25 > 1.2 && a35 / a25 < 1.45);
    }

    #[test]
    fn mass_transfer_coefficient_in_plausible_band() {
        let membrane = crate::membranes::lookup("BW30_PRO_400").unwrap();
        let k = mass_transfer_coefficient(membrane, 0.12, 4500.0, 25.0);
        assert!(k > 1.0e-5 && k < 1.0e-4, "k_mt = {k}");
    }
}
