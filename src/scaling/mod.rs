//! Sustainable-recovery limits from scaling thermodynamics: concentrate the
//! feed, score saturation indices against antiscalant-aware thresholds, and
//! bisect for the highest recovery that stays clean.

pub mod ph;

use serde::{Deserialize, Serialize};

use crate::chemistry::engine::{ChemistryEngine, Mineral};
use crate::chemistry::validator::WaterComposition;
use crate::error::RoError;
use crate::models::Deadline;

/// Antiscalant program assumed when scoring saturation indices.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AntiscalantScenario {
    None,
    #[default]
    Standard,
    HighPerformance,
}

/// Per-mineral SI ceilings. These are configuration data; the search only
/// compares against them.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct ScalingThresholds {
    pub calcite: f64,
    pub gypsum: f64,
    pub anhydrite: f64,
    pub barite: f64,
    pub celestite: f64,
    pub fluorite: f64,
    pub amorphous_silica: f64,
}

impl ScalingThresholds {
    /// Saturation everywhere: no kinetic inhibition assumed.
    pub fn without_antiscalant() -> Self {
        Self {
            calcite: 0.0,
            gypsum: 0.0,
            anhydrite: 0.0,
            barite: 0.0,
            celestite: 0.0,
            fluorite: 0.0,
            amorphous_silica: 0.0,
        }
    }

    pub fn standard_antiscalant() -> Self {
        Self {
            calcite: 1.0,
            gypsum: 1.2,
            anhydrite: 1.0,
            barite: 2.0,
            celestite: 1.5,
            fluorite: 1.2,
            amorphous_silica: 1.0,
        }
    }

    pub fn high_performance_antiscalant() -> Self {
        Self {
            calcite: 1.5,
            gypsum: 1.8,
            anhydrite: 1.5,
            barite: 2.5,
            celestite: 1.8,
            fluorite: 1.5,
            amorphous_silica: 1.3,
        }
    }

    pub fn for_scenario(scenario: AntiscalantScenario) -> Self {
        match scenario {
            AntiscalantScenario::None => Self::without_antiscalant(),
            AntiscalantScenario::Standard => Self::standard_antiscalant(),
            AntiscalantScenario::HighPerformance => Self::high_performance_antiscalant(),
        }
    }

    pub fn limit(&self, mineral: Mineral) -> f64 {
        match mineral {
            Mineral::Calcite => self.calcite,
            Mineral::Gypsum => self.gypsum,
            Mineral::Anhydrite => self.anhydrite,
            Mineral::Barite => self.barite,
            Mineral::Celestite => self.celestite,
            Mineral::Fluorite => self.fluorite,
            Mineral::AmorphousSilica => self.amorphous_silica,
        }
    }
}

const R_LO: f64 = 0.10;
const R_HI: f64 = 0.99;
const R_RESOLUTION: f64 = 0.01;

/// Worst margin `max_i (SI_i - limit_i)` at recovery `r`. Positive means at
/// least one mineral exceeds its ceiling.
fn scaling_margin(
    engine: &dyn ChemistryEngine,
    water: &WaterComposition,
    ph: f64,
    temperature_c: f64,
    thresholds: &ScalingThresholds,
    recovery: f64,
) -> Result<f64, RoError> {
    let cf = 1.0 / (1.0 - recovery);
    let state = engine.concentrate(water, ph, temperature_c, cf)?;
    Ok(state
        .saturation
        .iter()
        .map(|s| s.si - thresholds.limit(s.mineral))
        .fold(f64::NEG_INFINITY, f64::max))
}

/// Maximum recovery at which every tracked mineral stays at or below its
/// threshold. Bisection on [0.10, 0.99] to 0.01 resolution; returns 0.0
/// when even the lower bound scales.
pub fn sustainable_recovery(
    engine: &dyn ChemistryEngine,
    water: &WaterComposition,
    ph: f64,
    temperature_c: f64,
    thresholds: &ScalingThresholds,
    deadline: Deadline,
) -> Result<f64, RoError> {
    deadline.check()?;
    if scaling_margin(engine, water, ph, temperature_c, thresholds, R_LO)? > 0.0 {
        return Ok(0.0);
    }
    if scaling_margin(engine, water, ph, temperature_c, thresholds, R_HI)? <= 0.0 {
        return Ok(R_HI);
    }
    let (mut lo, mut hi) = (R_LO, R_HI);
    while hi - lo > R_RESOLUTION {
        deadline.check()?;
        let mid = 0.5 * (lo + hi);
        if scaling_margin(engine, water, ph, temperature_c, thresholds, mid)? > 0.0 {
            hi = mid;
        } else {
            lo = mid;
        }
    }
    Ok(crate::chemistry::round_to(lo, 2))
}
