//! The chemistry-engine seam. Production runs go through the PHREEQC
//! adapter; the reduced model in [`crate::chemistry::equilibrium`]
//! implements the same trait for deterministic tests. Engine selection is
//! always explicit; a failed run is an error, never an approximation.

use serde::Serialize;

use crate::chemistry::validator::WaterComposition;
use crate::error::RoError;

/// Minerals tracked for scaling. The set is fixed; thresholds against the
/// reported indices are caller data.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Mineral {
    Calcite,
    Gypsum,
    Anhydrite,
    Barite,
    Celestite,
    Fluorite,
    AmorphousSilica,
}

impl Mineral {
    pub const ALL: [Mineral; 7] = [
        Mineral::Calcite,
        Mineral::Gypsum,
        Mineral::Anhydrite,
        Mineral::Barite,
        Mineral::Celestite,
        Mineral::Fluorite,
        Mineral::AmorphousSilica,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Mineral::Calcite => "calcite",
            Mineral::Gypsum => "gypsum",
            Mineral::Anhydrite => "anhydrite",
            Mineral::Barite => "barite",
            Mineral::Celestite => "celestite",
            Mineral::Fluorite => "fluorite",
            Mineral::AmorphousSilica => "amorphous_silica",
        }
    }

    /// Phase name in the PHREEQC databases.
    pub fn phreeqc_phase(self) -> &'static str {
        match self {
            Mineral::Calcite => "Calcite",
            Mineral::Gypsum => "Gypsum",
            Mineral::Anhydrite => "Anhydrite",
            Mineral::Barite => "Barite",
            Mineral::Celestite => "Celestite",
            Mineral::Fluorite => "Fluorite",
            Mineral::AmorphousSilica => "SiO2(a)",
        }
    }
}

/// One saturation index, `SI = log10(IAP/Ksp)`.
#[derive(Clone, Copy, Debug, Serialize)]
pub struct MineralSi {
    pub mineral: Mineral,
    pub si: f64,
}

/// Equilibrium state of a solution as fed (no water removal).
#[derive(Clone, Debug, Serialize)]
pub struct SolutionState {
    pub ph: f64,
    pub dissolved_co2_mg_l: f64,
    pub ionic_strength_mol_l: f64,
    pub saturation: Vec<MineralSi>,
}

/// Result of concentrating a solution by removing pure water.
#[derive(Clone, Debug, Serialize)]
pub struct ConcentrateState {
    pub composition: WaterComposition,
    pub ph: f64,
    pub dissolved_co2_mg_l: f64,
    pub saturation: Vec<MineralSi>,
}

/// pH-adjustment reagents the dosing calculator understands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Reagent {
    SodiumHydroxide,
    HydrochloricAcid,
    SulfuricAcid,
}

impl Reagent {
    pub fn label(self) -> &'static str {
        match self {
            Reagent::SodiumHydroxide => "NaOH",
            Reagent::HydrochloricAcid => "HCl",
            Reagent::SulfuricAcid => "H2SO4",
        }
    }

    pub fn mw_g_mol(self) -> f64 {
        match self {
            Reagent::SodiumHydroxide => 39.997,
            Reagent::HydrochloricAcid => 36.461,
            Reagent::SulfuricAcid => 98.079,
        }
    }

    /// Alkalinity contribution, eq per mol of reagent.
    pub fn alkalinity_eq_per_mol(self) -> f64 {
        match self {
            Reagent::SodiumHydroxide => 1.0,
            Reagent::HydrochloricAcid => -1.0,
            Reagent::SulfuricAcid => -2.0,
        }
    }
}

/// Outcome of adding a reagent to a solution.
#[derive(Clone, Debug)]
pub struct DosedState {
    pub composition: WaterComposition,
    pub ph: f64,
}

pub trait ChemistryEngine {
    /// Remove pure water until the solution is concentrated by `cf`
    /// (mol H2O removed = initial water mol x (1 - 1/cf)), then report the
    /// equilibrium state.
    fn concentrate(
        &self,
        water: &WaterComposition,
        ph: f64,
        temperature_c: f64,
        cf: f64,
    ) -> Result<ConcentrateState, RoError>;

    /// Add `mmol_per_l` of a reagent and report the re-equilibrated pH and
    /// the adjusted composition.
    fn dose(
        &self,
        water: &WaterComposition,
        ph: f64,
        temperature_c: f64,
        reagent: Reagent,
        mmol_per_l: f64,
    ) -> Result<DosedState, RoError>;

    /// Equilibrium state of the water as given.
    fn equilibrate(
        &self,
        water: &WaterComposition,
        ph: f64,
        temperature_c: f64,
    ) -> Result<SolutionState, RoError> {
        let state = self.concentrate(water, ph, temperature_c, 1.0)?;
        Ok(SolutionState {
            ph: state.ph,
            dissolved_co2_mg_l: state.dissolved_co2_mg_l,
            ionic_strength_mol_l: state.composition.ionic_strength(),
            saturation: state.saturation,
        })
    }
}
