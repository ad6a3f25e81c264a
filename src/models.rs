use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::error::RoError;
use crate::scaling::AntiscalantScenario;

/// Request-scoped cancellation handle. The core checks it at stage
/// boundaries and at every bisection/golden-section/fixed-point iteration.
#[derive(Clone, Copy, Debug, Default)]
pub struct Deadline(Option<Instant>);

impl Deadline {
    pub fn none() -> Self {
        Self(None)
    }

    pub fn within(budget: Duration) -> Self {
        Self(Some(Instant::now() + budget))
    }

    pub fn at(instant: Instant) -> Self {
        Self(Some(instant))
    }

    pub fn check(&self) -> Result<(), RoError> {
        match self.0 {
            Some(t) if Instant::now() >= t => Err(RoError::Cancelled),
            _ => Ok(()),
        }
    }
}

/// Inputs for `optimize_ro_configuration`.
#[derive(Clone, Debug, Deserialize)]
pub struct OptimizeRequest {
    /// Fresh (external) feed flow, m3/h.
    pub feed_flow_m3h: f64,
    /// Target system recovery as a fraction of the fresh feed.
    pub water_recovery_fraction: f64,
    pub membrane_model: String,
    #[serde(default = "default_allow_recycle")]
    pub allow_recycle: bool,
    #[serde(default = "default_max_recycle_ratio")]
    pub max_recycle_ratio: f64,
    /// Per-stage flux targets, LMH. The last entry repeats for deeper
    /// stages. Defaults to [18, 15, 12].
    #[serde(default)]
    pub flux_targets_lmh: Option<Vec<f64>>,
    #[serde(default = "default_flux_tolerance")]
    pub flux_tolerance: f64,
    /// Fouling minimum: concentrate flow per vessel, m3/h.
    #[serde(default = "default_min_concentrate_flow")]
    pub min_concentrate_flow_m3h_per_vessel: f64,
    #[serde(default = "default_elements_per_vessel")]
    pub elements_per_vessel: u32,
    /// Optional feed chemistry; enables the sustainable-recovery gate.
    #[serde(default)]
    pub feed_ion_composition: Option<BTreeMap<String, f64>>,
    #[serde(default)]
    pub feed_tds_mg_l: Option<f64>,
    #[serde(default = "default_feed_temperature_c")]
    pub feed_temperature_c: f64,
    #[serde(default = "default_feed_ph")]
    pub feed_ph: f64,
    #[serde(default)]
    pub antiscalant: AntiscalantScenario,
}

/// Inputs for `simulate_ro_system`.
#[derive(Clone, Debug, Deserialize)]
pub struct SimulateRequest {
    pub configuration: Configuration,
    pub membrane_model: String,
    pub feed_ion_composition: BTreeMap<String, f64>,
    /// Reported feed salinity; reconciled against the summed ion map.
    #[serde(default)]
    pub feed_salinity_ppm: Option<f64>,
    #[serde(default = "default_feed_temperature_c")]
    pub feed_temperature_c: f64,
    #[serde(default = "default_feed_ph")]
    pub feed_ph: f64,
    #[serde(default)]
    pub economic_params: Option<EconomicParams>,
    #[serde(default)]
    pub chemical_dosing: Option<ChemicalDosing>,
}

fn default_allow_recycle() -> bool {
    true
}
fn default_max_recycle_ratio() -> f64 {
    0.9
}
fn default_flux_tolerance() -> f64 {
    0.1
}
fn default_min_concentrate_flow() -> f64 {
    3.8
}
fn default_elements_per_vessel() -> u32 {
    6
}
fn default_feed_temperature_c() -> f64 {
    25.0
}
fn default_feed_ph() -> f64 {
    7.5
}

pub const DEFAULT_FLUX_TARGETS_LMH: [f64; 3] = [18.0, 15.0, 12.0];

/// Hard floor on stage flux as a fraction of its target; tolerance is
/// relaxed down to this only when nothing tighter reaches the recovery.
pub const FLUX_RELAXATION_FLOOR: f64 = 0.70;

/// One pressure-vessel stage of a configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StageDesign {
    pub stage: usize,
    pub vessel_count: u32,
    pub elements_per_vessel: u32,
    pub membrane_area_m2: f64,
    pub target_flux_lmh: f64,
    pub achieved_flux_lmh: f64,
    pub feed_flow_m3h: f64,
    pub permeate_flow_m3h: f64,
    pub concentrate_flow_m3h: f64,
}

impl StageDesign {
    pub fn recovery(&self) -> f64 {
        self.permeate_flow_m3h / self.feed_flow_m3h
    }
}

/// Concentrate-recycle bookkeeping. `recycle_ratio` is the fraction of the
/// final-stage concentrate routed back to the fresh feed.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RecycleInfo {
    pub recycle_flow_m3h: f64,
    pub recycle_ratio: f64,
    pub disposal_flow_m3h: f64,
    #[serde(default)]
    pub disposal_tds_mg_l: Option<f64>,
}

/// A viable vessel-array configuration.
///
/// `system_feed_flow_m3h` is always the external fresh feed; with recycle
/// the stage-1 feed is larger (fresh + recycle) and must never be used as
/// the recovery basis.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Configuration {
    pub stages: Vec<StageDesign>,
    pub system_feed_flow_m3h: f64,
    pub system_recovery: f64,
    pub target_recovery: f64,
    pub target_met: bool,
    #[serde(default)]
    pub recycle: Option<RecycleInfo>,
    #[serde(default)]
    pub sustainable_r_max: Option<f64>,
    #[serde(default)]
    pub warnings: Vec<Warning>,
}

impl Configuration {
    pub fn total_permeate_m3h(&self) -> f64 {
        self.stages.iter().map(|s| s.permeate_flow_m3h).sum()
    }

    pub fn stage_1_feed_m3h(&self) -> f64 {
        self.stages.first().map(|s| s.feed_flow_m3h).unwrap_or(0.0)
    }

    pub fn disposal_flow_m3h(&self) -> f64 {
        match &self.recycle {
            Some(r) => r.disposal_flow_m3h,
            None => self
                .stages
                .last()
                .map(|s| s.concentrate_flow_m3h)
                .unwrap_or(0.0),
        }
    }
}

/// Non-fatal findings attached to a successful result.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Warning {
    SustainableRecoveryExceeded {
        achieved_recovery: f64,
        sustainable_r_max: f64,
        note: String,
    },
    VesselCountExplosion {
        stage: usize,
        vessels: u32,
    },
    FluxRelaxed {
        flux_fraction_of_target: f64,
    },
    FluxTargetConflict {
        note: String,
    },
}

/// Fixed-O&M line items, each a fraction of total capital per year.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct FixedOmFractions {
    pub maintenance: f64,
    pub labor: f64,
    pub laboratory: f64,
    pub insurance: f64,
}

impl Default for FixedOmFractions {
    fn default() -> Self {
        Self {
            maintenance: 0.02,
            labor: 0.015,
            laboratory: 0.005,
            insurance: 0.005,
        }
    }
}

impl FixedOmFractions {
    pub fn total(&self) -> f64 {
        self.maintenance + self.labor + self.laboratory + self.insurance
    }
}

/// Energy-recovery device on the final brine line. Sized as an isobaric
/// pressure exchanger above the brine-flow threshold, a turbocharger below.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ErdParams {
    pub enabled: bool,
    pub efficiency: f64,
    pub isobaric_min_brine_m3h: f64,
    pub isobaric_cost_usd_per_m3h: f64,
    pub turbo_cost_usd_per_m3h: f64,
}

impl Default for ErdParams {
    fn default() -> Self {
        Self {
            enabled: false,
            efficiency: 0.80,
            isobaric_min_brine_m3h: 15.0,
            isobaric_cost_usd_per_m3h: 3000.0,
            turbo_cost_usd_per_m3h: 1200.0,
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct EconomicParams {
    /// Weighted-average cost of capital, fraction per year.
    pub wacc: f64,
    pub plant_lifetime_yr: f64,
    /// Online fraction of the year.
    pub utilization: f64,
    pub electricity_price_usd_kwh: f64,
    pub membrane_cost_usd_m2: f64,
    /// Fraction of membrane capital replaced per year.
    pub membrane_replacement_rate: f64,
    pub pump_efficiency: f64,
    /// Low-pressure pump price, per L/s of stage feed flow.
    pub lp_pump_cost_usd_per_lps: f64,
    /// High-pressure pump price, per kW of shaft power.
    pub hp_pump_cost_usd_per_kw: f64,
    /// Feed pressure above which a stage pump is priced as high-pressure.
    pub hp_pump_threshold_pa: f64,
    pub cartridge_filter_cost_usd_per_m3h: f64,
    pub cip_system_cost_usd: f64,
    /// Total capital as a multiple of direct equipment cost.
    pub indirect_cost_factor: f64,
    pub fixed_om: FixedOmFractions,
    pub erd: ErdParams,
}

impl Default for EconomicParams {
    fn default() -> Self {
        Self {
            wacc: 0.08,
            plant_lifetime_yr: 20.0,
            utilization: 0.9,
            electricity_price_usd_kwh: 0.07,
            membrane_cost_usd_m2: 30.0,
            membrane_replacement_rate: 0.20,
            pump_efficiency: 0.80,
            lp_pump_cost_usd_per_lps: 1200.0,
            hp_pump_cost_usd_per_kw: 1800.0,
            hp_pump_threshold_pa: 45.0e5,
            cartridge_filter_cost_usd_per_m3h: 80.0,
            cip_system_cost_usd: 30_000.0,
            indirect_cost_factor: 2.5,
            fixed_om: FixedOmFractions::default(),
            erd: ErdParams::default(),
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ChemicalDosing {
    pub antiscalant_dose_mg_l: f64,
    pub antiscalant_price_usd_kg: f64,
    pub naoh_price_usd_kg: f64,
    pub hcl_price_usd_kg: f64,
    pub h2so4_price_usd_kg: f64,
    pub cip_chemical_cost_per_event_usd: f64,
    pub cip_events_per_year: f64,
}

impl Default for ChemicalDosing {
    fn default() -> Self {
        Self {
            antiscalant_dose_mg_l: 3.0,
            antiscalant_price_usd_kg: 2.5,
            naoh_price_usd_kg: 0.45,
            hcl_price_usd_kg: 0.18,
            h2so4_price_usd_kg: 0.12,
            cip_chemical_cost_per_event_usd: 1500.0,
            cip_events_per_year: 4.0,
        }
    }
}

/// Bundle returned by `get_defaults`.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct Defaults {
    pub economic_params: EconomicParams,
    pub chemical_dosing: ChemicalDosing,
}
