pub mod adapters;
pub mod api;
pub mod chemistry;
pub mod design;
pub mod economics;
pub mod error;
pub mod membranes;
pub mod models;
pub mod performance;
pub mod scaling;

pub use crate::api::{SimulationOutput, get_defaults, optimize_ro_configuration, simulate_ro_system};
pub use crate::chemistry::engine::{
    ChemistryEngine, ConcentrateState, Mineral, MineralSi, Reagent, SolutionState,
};
pub use crate::chemistry::equilibrium::EquilibriumModel;
pub use crate::chemistry::validator::WaterComposition;
pub use crate::chemistry::{Ion, IonProps, SpeciesClass};
pub use crate::error::RoError;
pub use crate::membranes::{MembraneGrade, MembraneSpec};
pub use crate::models::{
    ChemicalDosing, Configuration, Deadline, Defaults, EconomicParams, OptimizeRequest,
    RecycleInfo, SimulateRequest, StageDesign, Warning,
};
pub use crate::performance::{PerformanceResult, StagePerformance, SystemPerformance};
pub use crate::scaling::ph::{PhOptimum, chemical_dose_to_reach, maximize_sustainable_recovery};
pub use crate::scaling::{AntiscalantScenario, ScalingThresholds, sustainable_recovery};
