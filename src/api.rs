//! The three public operations. Transport is out of scope; these are plain
//! functions over validated inputs, returning the crate failure envelope.

use serde::Serialize;

use crate::chemistry::engine::ChemistryEngine;
use crate::chemistry::validator::WaterComposition;
use crate::design::{SearchContext, enumerate_configurations};
use crate::economics::{self, EconomicResult};
use crate::error::RoError;
use crate::membranes::{self, MembraneGrade};
use crate::models::{
    Configuration, Deadline, Defaults, EconomicParams, OptimizeRequest, SimulateRequest, Warning,
};
use crate::performance::{self, OperatingAssumptions, PerformanceResult};
use crate::scaling::{ScalingThresholds, sustainable_recovery};

#[derive(Clone, Debug, Serialize)]
pub struct SimulationOutput {
    pub performance: PerformanceResult,
    pub economics: EconomicResult,
}

fn check_fraction(value: f64, what: &str) -> Result<(), RoError> {
    if !(value > 0.0 && value < 1.0) || !value.is_finite() {
        return Err(RoError::InvalidComposition {
            reason: format!("{what} {value} must lie in (0, 1)"),
        });
    }
    Ok(())
}

fn check_positive(value: f64, what: &str) -> Result<(), RoError> {
    if !(value > 0.0) || !value.is_finite() {
        return Err(RoError::InvalidComposition {
            reason: format!("{what} {value} must be positive"),
        });
    }
    Ok(())
}

/// Enumerate every viable vessel-array configuration for the request.
///
/// `engine` is only consulted when the request carries feed chemistry; it
/// then supplies the sustainable-recovery ceiling each configuration is
/// gated against.
pub fn optimize_ro_configuration(
    req: &OptimizeRequest,
    engine: Option<&dyn ChemistryEngine>,
    deadline: Deadline,
) -> Result<Vec<Configuration>, RoError> {
    check_positive(req.feed_flow_m3h, "feed flow")?;
    check_fraction(req.water_recovery_fraction, "recovery target")?;
    check_fraction(req.max_recycle_ratio, "max recycle ratio")?;
    check_positive(req.min_concentrate_flow_m3h_per_vessel, "fouling minimum")?;
    if req.elements_per_vessel == 0 || req.elements_per_vessel > 8 {
        return Err(RoError::InvalidComposition {
            reason: format!("elements per vessel {} outside 1..=8", req.elements_per_vessel),
        });
    }
    let membrane = membranes::lookup(&req.membrane_model)?;

    let ctx = SearchContext {
        membrane,
        elements_per_vessel: req.elements_per_vessel,
        flux_targets_lmh: req.flux_targets_lmh.clone().unwrap_or_default(),
        flux_tolerance: req.flux_tolerance,
        min_concentrate_per_vessel_m3h: req.min_concentrate_flow_m3h_per_vessel,
        deadline,
    };
    let mut configs = enumerate_configurations(
        &ctx,
        req.feed_flow_m3h,
        req.water_recovery_fraction,
        req.allow_recycle,
        req.max_recycle_ratio,
    )?;

    if let Some(raw) = &req.feed_ion_composition {
        let Some(engine) = engine else {
            return Err(RoError::Chemistry {
                detail: "feed chemistry supplied but no chemistry engine configured".into(),
            });
        };
        let water = WaterComposition::validate(raw, req.feed_tds_mg_l)?;
        let thresholds = ScalingThresholds::for_scenario(req.antiscalant);
        let r_max = sustainable_recovery(
            engine,
            &water,
            req.feed_ph,
            req.feed_temperature_c,
            &thresholds,
            deadline,
        )?;
        let explicit_flux_targets = req.flux_targets_lmh.is_some();
        for config in &mut configs {
            config.sustainable_r_max = Some(r_max);
            if config.system_recovery > r_max {
                config.warnings.push(Warning::SustainableRecoveryExceeded {
                    achieved_recovery: config.system_recovery,
                    sustainable_r_max: r_max,
                    note: "consider pH adjustment or a lower recovery target".into(),
                });
                if explicit_flux_targets {
                    config.warnings.push(Warning::FluxTargetConflict {
                        note: "fixed stage flux targets conflict with the sustainable-recovery \
                               ceiling; configurations returned unchanged"
                            .into(),
                    });
                }
            }
        }
    }
    Ok(configs)
}

/// Simulate a configuration and price it.
pub fn simulate_ro_system(
    req: &SimulateRequest,
    engine: &dyn ChemistryEngine,
    deadline: Deadline,
) -> Result<SimulationOutput, RoError> {
    let membrane = membranes::lookup(&req.membrane_model)?;
    let feed = WaterComposition::validate(&req.feed_ion_composition, req.feed_salinity_ppm)?;
    let params = req.economic_params.unwrap_or_default();
    let dosing = req.chemical_dosing.unwrap_or_default();
    let assumptions = OperatingAssumptions::from(&params);

    let performance = performance::simulate(
        &req.configuration,
        membrane,
        &feed,
        req.feed_ph,
        req.feed_temperature_c,
        engine,
        &assumptions,
        deadline,
    )?;
    let economics = economics::evaluate(&performance, &params, &dosing)?;
    Ok(SimulationOutput {
        performance,
        economics,
    })
}

/// Default economic and dosing parameters, grade-adjusted when a membrane
/// model is named (seawater grades cost more and usually justify an ERD).
pub fn get_defaults(membrane_model: Option<&str>) -> Result<Defaults, RoError> {
    let mut economic_params = EconomicParams::default();
    if let Some(model) = membrane_model {
        let membrane = membranes::lookup(model)?;
        if membrane.grade == MembraneGrade::Seawater {
            economic_params.membrane_cost_usd_m2 = 75.0;
            economic_params.erd.enabled = true;
        }
    }
    Ok(Defaults {
        economic_params,
        chemical_dosing: Default::default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_grade_aware() {
        let bw = get_defaults(Some("BW30_PRO_400")).unwrap();
        let sw = get_defaults(Some("SW30HRLE_440")).unwrap();
        assert!(!bw.economic_params.erd.enabled);
        assert!(sw.economic_params.erd.enabled);
        assert!(sw.economic_params.membrane_cost_usd_m2 > bw.economic_params.membrane_cost_usd_m2);
    }

    #[test]
    fn unknown_membrane_surfaces_from_defaults() {
        assert!(matches!(
            get_defaults(Some("NF90_400")),
            Err(RoError::UnknownMembrane { .. })
        ));
    }

    #[test]
    fn bad_recovery_fraction_is_rejected() {
        let req = OptimizeRequest {
            feed_flow_m3h: 100.0,
            water_recovery_fraction: 1.2,
            membrane_model: "BW30_PRO_400".into(),
            allow_recycle: true,
            max_recycle_ratio: 0.9,
            flux_targets_lmh: None,
            flux_tolerance: 0.1,
            min_concentrate_flow_m3h_per_vessel: 3.8,
            elements_per_vessel: 6,
            feed_ion_composition: None,
            feed_tds_mg_l: None,
            feed_temperature_c: 25.0,
            feed_ph: 7.5,
            antiscalant: Default::default(),
        };
        assert!(matches!(
            optimize_ro_configuration(&req, None, Deadline::none()),
            Err(RoError::InvalidComposition { .. })
        ));
    }
}
