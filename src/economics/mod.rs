//! Capital, operating cost, and levelized cost of water. Everything keys
//! off the simulated performance; the annual basis is the external-feed
//! permeate at the configured utilization.

use serde::Serialize;

use crate::error::RoError;
use crate::models::{ChemicalDosing, EconomicParams};
use crate::performance::PerformanceResult;

const HOURS_PER_YEAR: f64 = 8760.0;

#[derive(Clone, Debug, Serialize)]
pub struct CapitalBreakdown {
    /// One entry per stage, USD.
    pub pump_costs_usd: Vec<f64>,
    pub membrane_cost_usd: f64,
    pub erd_cost_usd: f64,
    pub cartridge_filter_cost_usd: f64,
    pub cip_system_cost_usd: f64,
    pub direct_total_usd: f64,
    pub total_capital_usd: f64,
}

#[derive(Clone, Debug, Serialize)]
pub struct OperatingBreakdown {
    pub electricity_usd_yr: f64,
    pub membrane_replacement_usd_yr: f64,
    pub antiscalant_usd_yr: f64,
    pub cip_chemicals_usd_yr: f64,
    pub fixed_om_usd_yr: f64,
    pub total_usd_yr: f64,
}

/// Levelized cost of water, split by contribution. The parts sum to
/// `total_usd_m3`.
#[derive(Clone, Debug, Serialize)]
pub struct LcowBreakdown {
    pub capital_recovery_usd_m3: f64,
    pub electricity_usd_m3: f64,
    pub membrane_replacement_usd_m3: f64,
    pub chemicals_usd_m3: f64,
    pub fixed_om_usd_m3: f64,
    pub total_usd_m3: f64,
}

#[derive(Clone, Debug, Serialize)]
pub struct EconomicResult {
    pub capital: CapitalBreakdown,
    pub operating: OperatingBreakdown,
    pub lcow: LcowBreakdown,
    pub capital_recovery_factor: f64,
    pub annual_permeate_m3: f64,
}

/// Capital-recovery factor `i(1+i)^N / ((1+i)^N - 1)`; the zero-interest
/// limit is straight-line 1/N.
pub fn capital_recovery_factor(wacc: f64, lifetime_yr: f64) -> Result<f64, RoError> {
    if lifetime_yr <= 0.0 {
        return Err(RoError::InvalidComposition {
            reason: format!("plant lifetime {lifetime_yr} yr must be positive"),
        });
    }
    if wacc < 0.0 {
        return Err(RoError::InvalidComposition {
            reason: format!("WACC {wacc} must be non-negative"),
        });
    }
    if wacc == 0.0 {
        return Ok(1.0 / lifetime_yr);
    }
    let growth = (1.0 + wacc).powf(lifetime_yr);
    Ok(wacc * growth / (growth - 1.0))
}

pub fn evaluate(
    performance: &PerformanceResult,
    params: &EconomicParams,
    dosing: &ChemicalDosing,
) -> Result<EconomicResult, RoError> {
    let crf = capital_recovery_factor(params.wacc, params.plant_lifetime_yr)?;
    let system = &performance.system;

    // Capital: pumps are priced low-pressure per L/s of stage feed below
    // the threshold, high-pressure per kW of shaft power above it.
    let mut pump_costs = Vec::with_capacity(performance.stages.len());
    for stage in &performance.stages {
        let cost = if stage.feed_pressure_pa < params.hp_pump_threshold_pa {
            let lps = stage.feed_flow_m3h * 1000.0 / 3600.0;
            lps * params.lp_pump_cost_usd_per_lps
        } else {
            stage.pump_power_kw * params.hp_pump_cost_usd_per_kw
        };
        pump_costs.push(cost);
    }

    let membrane_area: f64 = performance
        .configuration
        .stages
        .iter()
        .map(|s| s.membrane_area_m2)
        .sum();
    let membrane_cost = membrane_area * params.membrane_cost_usd_m2;

    let erd_cost = if params.erd.enabled {
        let brine = system.disposal_flow_m3h;
        if brine >= params.erd.isobaric_min_brine_m3h {
            brine * params.erd.isobaric_cost_usd_per_m3h
        } else {
            brine * params.erd.turbo_cost_usd_per_m3h
        }
    } else {
        0.0
    };

    let filter_cost = system.system_feed_flow_m3h * params.cartridge_filter_cost_usd_per_m3h;
    let direct = pump_costs.iter().sum::<f64>()
        + membrane_cost
        + erd_cost
        + filter_cost
        + params.cip_system_cost_usd;
    let total_capital = direct * params.indirect_cost_factor;

    // Operating
    let annual_permeate = system.permeate_flow_m3h * HOURS_PER_YEAR * params.utilization;
    let annual_feed = system.system_feed_flow_m3h * HOURS_PER_YEAR * params.utilization;
    let electricity =
        system.specific_energy_kwh_m3 * annual_permeate * params.electricity_price_usd_kwh;
    let membrane_replacement = membrane_cost * params.membrane_replacement_rate;
    // mg/L on the feed stream is g/m^3; price is per kg.
    let antiscalant =
        dosing.antiscalant_dose_mg_l * annual_feed * 1e-3 * dosing.antiscalant_price_usd_kg;
    let cip = dosing.cip_events_per_year * dosing.cip_chemical_cost_per_event_usd;
    let fixed_om = params.fixed_om.total() * total_capital;
    let opex_total = electricity + membrane_replacement + antiscalant + cip + fixed_om;

    let per_m3 = |usd_yr: f64| usd_yr / annual_permeate;
    let lcow = LcowBreakdown {
        capital_recovery_usd_m3: per_m3(crf * total_capital),
        electricity_usd_m3: per_m3(electricity),
        membrane_replacement_usd_m3: per_m3(membrane_replacement),
        chemicals_usd_m3: per_m3(antiscalant + cip),
        fixed_om_usd_m3: per_m3(fixed_om),
        total_usd_m3: per_m3(crf * total_capital + opex_total),
    };

    Ok(EconomicResult {
        capital: CapitalBreakdown {
            pump_costs_usd: pump_costs,
            membrane_cost_usd: membrane_cost,
            erd_cost_usd: erd_cost,
            cartridge_filter_cost_usd: filter_cost,
            cip_system_cost_usd: params.cip_system_cost_usd,
            direct_total_usd: direct,
            total_capital_usd: total_capital,
        },
        operating: OperatingBreakdown {
            electricity_usd_yr: electricity,
            membrane_replacement_usd_yr: membrane_replacement,
            antiscalant_usd_yr: antiscalant,
            cip_chemicals_usd_yr: cip,
            fixed_om_usd_yr: fixed_om,
            total_usd_yr: opex_total,
        },
        lcow,
        capital_recovery_factor: crf,
        annual_permeate_m3: annual_permeate,
    })
}
