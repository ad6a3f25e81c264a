//! Hybrid stage-by-stage performance model: solution-diffusion transport
//! with temperature correction and concentration polarization, plus a
//! chemistry pass on each stage concentrate.

pub mod simulator;

pub use simulator::simulate;

use std::collections::BTreeMap;

use serde::Serialize;

use crate::chemistry::Ion;
use crate::chemistry::engine::MineralSi;
use crate::chemistry::validator::WaterComposition;
use crate::models::{Configuration, EconomicParams, Warning};

/// Operating assumptions the simulator needs from the economics side.
#[derive(Clone, Copy, Debug)]
pub struct OperatingAssumptions {
    pub pump_efficiency: f64,
    /// ERD on the final brine; `None` when not installed.
    pub erd_efficiency: Option<f64>,
}

impl From<&EconomicParams> for OperatingAssumptions {
    fn from(params: &EconomicParams) -> Self {
        Self {
            pump_efficiency: params.pump_efficiency,
            erd_efficiency: params.erd.enabled.then_some(params.erd.efficiency),
        }
    }
}

/// Operating record for one stage.
#[derive(Clone, Debug, Serialize)]
pub struct StagePerformance {
    pub stage: usize,
    pub feed_flow_m3h: f64,
    pub feed_tds_mg_l: f64,
    pub permeate_flow_m3h: f64,
    pub permeate_tds_mg_l: f64,
    pub concentrate_flow_m3h: f64,
    pub concentrate_tds_mg_l: f64,
    pub feed_pressure_pa: f64,
    /// Feed-side average osmotic pressure at the membrane wall.
    pub osmotic_pressure_pa: f64,
    pub net_driving_pressure_pa: f64,
    pub observed_flux_lmh: f64,
    pub polarization_factor: f64,
    pub pump_power_kw: f64,
    pub ion_rejection: BTreeMap<Ion, f64>,
    pub feed_composition: WaterComposition,
    pub permeate_composition: WaterComposition,
    pub concentrate_composition: WaterComposition,
    pub concentrate_ph: f64,
    pub saturation: Vec<MineralSi>,
}

/// System totals, always on the external-feed basis. With recycle the
/// stage-1 feed is blended and larger; recovery, specific energy and
/// disposal figures here never use it.
#[derive(Clone, Debug, Serialize)]
pub struct SystemPerformance {
    pub system_feed_flow_m3h: f64,
    pub permeate_flow_m3h: f64,
    pub disposal_flow_m3h: f64,
    pub system_recovery: f64,
    pub specific_energy_kwh_m3: f64,
    pub feed_tds_mg_l: f64,
    pub permeate_tds_mg_l: f64,
    pub disposal_tds_mg_l: f64,
    pub ion_rejection: BTreeMap<Ion, f64>,
}

#[derive(Clone, Debug, Serialize)]
pub struct PerformanceResult {
    pub configuration: Configuration,
    pub stages: Vec<StagePerformance>,
    pub system: SystemPerformance,
    /// Saturation indices in the final brine.
    pub scaling: Vec<MineralSi>,
    pub warnings: Vec<Warning>,
}
