// Chemistry constants, the ion registry, and unit helpers
pub mod engine;
pub mod equilibrium;
pub mod validator;

use serde::{Serialize, Serializer};

pub const R_GAS: f64 = 8.314_462_618; // J/(mol K)
pub const T_KELVIN: f64 = 273.15;
pub const T_REF_K: f64 = 298.15; // membrane permeabilities are cataloged at 25 C
pub const MW_WATER: f64 = 18.015_28; // g/mol
pub const WATER_MOL_PER_KG: f64 = 55.508;

// Arrhenius activation energies for membrane transport (J/mol)
pub const EA_WATER: f64 = 20_000.0;
pub const EA_SALT: f64 = 25_000.0;

pub const TINY: f64 = 1e-20;

/// Charge-balance residual above which the validator starts adjusting the
/// dominant counter-ion, and the hard limit past which it refuses.
pub const CHARGE_BALANCE_TRIGGER: f64 = 0.02;
pub const CHARGE_BALANCE_LIMIT: f64 = 0.10;
pub const TDS_RECONCILE_LIMIT: f64 = 0.10;

/// mg/L -> mol/L
pub fn mol_per_l(mg_l: f64, molar_mass_g_mol: f64) -> f64 {
    (mg_l.max(0.0)) / 1000.0 / molar_mass_g_mol.max(TINY)
}

/// Signed equivalents per liter for a charged species (eq/L).
pub fn eq_per_l(mg_l: f64, molar_mass_g_mol: f64, charge: i8) -> f64 {
    mol_per_l(mg_l, molar_mass_g_mol) * f64::from(charge)
}

pub fn round_to(x: f64, digits: i32) -> f64 {
    let p = 10f64.powi(digits);
    (x * p).round() / p
}

/// Transport class of a dissolved species. Charged species go through the
/// solution-diffusion rejection model; neutral and weak-acid species carry a
/// catalog rejection instead.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SpeciesClass {
    Charged,
    Neutral { rejection: f64 },
}

/// Static reference record for one ion, looked up through [`Ion::props`].
#[derive(Clone, Copy, Debug)]
pub struct IonProps {
    pub label: &'static str,
    pub mw_g_mol: f64,
    pub charge: i8,
    pub stokes_radius_m: f64,
    pub diffusivity_m2_s: f64,
    /// Multiplier on the membrane's reference salt permeability.
    pub b_scale: f64,
    pub class: SpeciesClass,
    /// PHREEQC master-species name for SOLUTION input blocks.
    pub phreeqc_master: &'static str,
}

/// The closed set of species the design core understands. Ordering is the
/// map ordering used everywhere a composition is serialized.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Ion {
    Na,
    K,
    Ca,
    Mg,
    Sr,
    Ba,
    Cl,
    SO4,
    HCO3,
    CO3,
    NO3,
    F,
    Br,
    SiO2,
    Boron,
}

impl Ion {
    pub const ALL: [Ion; 15] = [
        Ion::Na,
        Ion::K,
        Ion::Ca,
        Ion::Mg,
        Ion::Sr,
        Ion::Ba,
        Ion::Cl,
        Ion::SO4,
        Ion::HCO3,
        Ion::CO3,
        Ion::NO3,
        Ion::F,
        Ion::Br,
        Ion::SiO2,
        Ion::Boron,
    ];

    pub fn props(self) -> &'static IonProps {
        &REGISTRY[self as usize]
    }

    pub fn label(self) -> &'static str {
        self.props().label
    }

    pub fn charge(self) -> i8 {
        self.props().charge
    }

    pub fn mw(self) -> f64 {
        self.props().mw_g_mol
    }

    /// Resolve a caller-supplied label. Case-insensitive; underscores,
    /// spaces and caret notation are stripped, and `Ca2+`-style suffixes
    /// are accepted alongside the canonical `Ca+2`.
    pub fn parse(label: &str) -> Option<Ion> {
        let key: String = label
            .chars()
            .filter(|c| !matches!(c, '_' | ' ' | '^'))
            .collect::<String>()
            .to_ascii_lowercase();
        let key = key.as_str();
        let hit = match key {
            "na+" | "na" | "sodium" => Ion::Na,
            "k+" | "k" | "potassium" => Ion::K,
            "ca+2" | "ca2+" | "ca++" | "ca" | "calcium" => Ion::Ca,
            "mg+2" | "mg2+" | "mg++" | "mg" | "magnesium" => Ion::Mg,
            "sr+2" | "sr2+" | "sr++" | "sr" | "strontium" => Ion::Sr,
            "ba+2" | "ba2+" | "ba++" | "ba" | "barium" => Ion::Ba,
            "cl-" | "cl" | "chloride" => Ion::Cl,
            "so4-2" | "so42-" | "so4--" | "so4" | "sulfate" | "sulphate" => Ion::SO4,
            "hco3-" | "hco3" | "bicarbonate" => Ion::HCO3,
            "co3-2" | "co32-" | "co3--" | "co3" | "carbonate" => Ion::CO3,
            "no3-" | "no3" | "nitrate" => Ion::NO3,
            "f-" | "f" | "fluoride" => Ion::F,
            "br-" | "br" | "bromide" => Ion::Br,
            "sio2" | "h4sio4" | "si" | "silica" => Ion::SiO2,
            "b(oh)3" | "h3bo3" | "b" | "boron" => Ion::Boron,
            _ => return None,
        };
        Some(hit)
    }
}

/// Reference properties, indexed by [`Ion`] in declaration order.
static REGISTRY: [IonProps; 15] = [
    IonProps {
        label: "Na+",
        mw_g_mol: 22.989_769,
        charge: 1,
        stokes_radius_m: 1.84e-10,
        diffusivity_m2_s: 1.33e-9,
        b_scale: 1.0,
        class: SpeciesClass::Charged,
        phreeqc_master: "Na",
    },
    IonProps {
        label: "K+",
        mw_g_mol: 39.098_3,
        charge: 1,
        stokes_radius_m: 1.25e-10,
        diffusivity_m2_s: 1.96e-9,
        b_scale: 1.2,
        class: SpeciesClass::Charged,
        phreeqc_master: "K",
    },
    IonProps {
        label: "Ca+2",
        mw_g_mol: 40.078,
        charge: 2,
        stokes_radius_m: 3.10e-10,
        diffusivity_m2_s: 7.9e-10,
        b_scale: 0.10,
        class: SpeciesClass::Charged,
        phreeqc_master: "Ca",
    },
    IonProps {
        label: "Mg+2",
        mw_g_mol: 24.305,
        charge: 2,
        stokes_radius_m: 3.47e-10,
        diffusivity_m2_s: 7.06e-10,
        b_scale: 0.08,
        class: SpeciesClass::Charged,
        phreeqc_master: "Mg",
    },
    IonProps {
        label: "Sr+2",
        mw_g_mol: 87.62,
        charge: 2,
        stokes_radius_m: 3.10e-10,
        diffusivity_m2_s: 7.9e-10,
        b_scale: 0.10,
        class: SpeciesClass::Charged,
        phreeqc_master: "Sr",
    },
    IonProps {
        label: "Ba+2",
        mw_g_mol: 137.327,
        charge: 2,
        stokes_radius_m: 2.90e-10,
        diffusivity_m2_s: 8.5e-10,
        b_scale: 0.10,
        class: SpeciesClass::Charged,
        phreeqc_master: "Ba",
    },
    IonProps {
        label: "Cl-",
        mw_g_mol: 35.45,
        charge: -1,
        stokes_radius_m: 1.21e-10,
        diffusivity_m2_s: 2.03e-9,
        b_scale: 1.0,
        class: SpeciesClass::Charged,
        phreeqc_master: "Cl",
    },
    IonProps {
        label: "SO4-2",
        mw_g_mol: 96.06,
        charge: -2,
        stokes_radius_m: 3.79e-10,
        diffusivity_m2_s: 1.07e-9,
        b_scale: 0.06,
        class: SpeciesClass::Charged,
        phreeqc_master: "S(6)",
    },
    IonProps {
        label: "HCO3-",
        mw_g_mol: 61.016,
        charge: -1,
        stokes_radius_m: 2.07e-10,
        diffusivity_m2_s: 1.18e-9,
        b_scale: 0.9,
        class: SpeciesClass::Charged,
        phreeqc_master: "Alkalinity",
    },
    IonProps {
        label: "CO3-2",
        mw_g_mol: 60.008,
        charge: -2,
        stokes_radius_m: 2.66e-10,
        diffusivity_m2_s: 9.2e-10,
        b_scale: 0.06,
        class: SpeciesClass::Charged,
        phreeqc_master: "C(4)",
    },
    IonProps {
        label: "NO3-",
        mw_g_mol: 62.004,
        charge: -1,
        stokes_radius_m: 1.29e-10,
        diffusivity_m2_s: 1.9e-9,
        b_scale: 1.5,
        class: SpeciesClass::Charged,
        phreeqc_master: "N(5)",
    },
    IonProps {
        label: "F-",
        mw_g_mol: 18.998_403,
        charge: -1,
        stokes_radius_m: 1.66e-10,
        diffusivity_m2_s: 1.46e-9,
        b_scale: 0.8,
        class: SpeciesClass::Charged,
        phreeqc_master: "F",
    },
    IonProps {
        label: "Br-",
        mw_g_mol: 79.904,
        charge: -1,
        stokes_radius_m: 1.18e-10,
        diffusivity_m2_s: 2.01e-9,
        b_scale: 1.0,
        class: SpeciesClass::Charged,
        phreeqc_master: "Br",
    },
    IonProps {
        label: "SiO2",
        mw_g_mol: 60.084,
        charge: 0,
        stokes_radius_m: 2.60e-10,
        diffusivity_m2_s: 1.1e-9,
        b_scale: 0.0,
        class: SpeciesClass::Neutral { rejection: 0.98 },
        phreeqc_master: "Si",
    },
    IonProps {
        label: "B(OH)3",
        mw_g_mol: 61.833,
        charge: 0,
        stokes_radius_m: 2.44e-10,
        diffusivity_m2_s: 1.1e-9,
        b_scale: 0.0,
        class: SpeciesClass::Neutral { rejection: 0.65 },
        phreeqc_master: "B",
    },
];

impl Serialize for Ion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}
