//! Reduced aqueous-equilibrium model: Davies activity corrections, a
//! closed-system carbonate solver, and a fixed mineral Ksp table. It
//! implements [`ChemistryEngine`] so the test suite and offline estimates
//! can run without an external PHREEQC installation; production requests
//! select the PHREEQC adapter instead.

use std::collections::BTreeMap;

use crate::chemistry::engine::{
    ChemistryEngine, ConcentrateState, DosedState, Mineral, MineralSi, Reagent,
};
use crate::chemistry::validator::WaterComposition;
use crate::chemistry::{Ion, T_KELVIN, TINY};
use crate::error::RoError;

const MW_CO2: f64 = 44.009;
const LOG_KA_SILICIC: f64 = -9.84; // H4SiO4 = H+ + H3SiO4-
const LOG_K_SIO2_AM: f64 = -2.71; // amorphous silica solubility, mol/L

/// Carbonic acid first dissociation constant (Plummer & Busenberg).
fn log_k1(t_k: f64) -> f64 {
    -356.3094 - 0.060_919_64 * t_k + 21834.37 / t_k + 126.8339 * t_k.log10()
        - 1_684_915.0 / (t_k * t_k)
}

/// Second dissociation constant (Plummer & Busenberg).
fn log_k2(t_k: f64) -> f64 {
    -107.8871 - 0.032_528_49 * t_k + 5151.79 / t_k + 38.925_61 * t_k.log10()
        - 563_713.9 / (t_k * t_k)
}

/// Ion product of water (Harned & Owen fit).
fn p_kw(t_k: f64) -> f64 {
    4470.99 / t_k - 6.0875 + 0.017_06 * t_k
}

/// Debye-Huckel A parameter, linearized around 25 C.
fn davies_a(temperature_c: f64) -> f64 {
    0.4883 + 8.074e-4 * temperature_c
}

/// log10 activity coefficient for charge `z` at ionic strength `i`.
fn davies_log_gamma(z: i8, i: f64, temperature_c: f64) -> f64 {
    if z == 0 || i <= 0.0 {
        return 0.0;
    }
    let sqrt_i = i.sqrt();
    -davies_a(temperature_c) * f64::from(z).powi(2) * (sqrt_i / (1.0 + sqrt_i) - 0.3 * i)
}

fn log_ksp(mineral: Mineral, temperature_c: f64) -> f64 {
    let dt = temperature_c - 25.0;
    match mineral {
        Mineral::Calcite => -8.48 - 0.0055 * dt,
        Mineral::Gypsum => -4.58,
        Mineral::Anhydrite => -4.36 - 0.0070 * dt,
        Mineral::Barite => -9.97 + 0.0036 * dt,
        Mineral::Celestite => -6.63 - 0.0011 * dt,
        Mineral::Fluorite => -10.60 - 0.0020 * dt,
        Mineral::AmorphousSilica => LOG_K_SIO2_AM + 0.0077 * dt,
    }
}

#[derive(Clone, Copy, Debug)]
struct Carbonate {
    ct_mol_l: f64,
    alk_eq_l: f64,
}

#[derive(Clone, Copy, Debug)]
struct Speciation {
    hco3: f64,
    co3: f64,
    co2: f64,
    ph: f64,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct EquilibriumModel;

impl EquilibriumModel {
    pub fn new() -> Self {
        Self
    }

    /// Total inorganic carbon and alkalinity implied by the measured
    /// bicarbonate/carbonate at the stated pH.
    fn carbonate_from_input(
        water: &WaterComposition,
        ph: f64,
        temperature_c: f64,
        ionic_strength: f64,
    ) -> Carbonate {
        let t_k = temperature_c + T_KELVIN;
        let k1 = 10f64.powf(log_k1(t_k));
        let kw = 10f64.powf(-p_kw(t_k));
        let g1 = 10f64.powf(davies_log_gamma(1, ionic_strength, temperature_c));
        let a_h = 10f64.powf(-ph);

        let m_hco3 = water.molar(Ion::HCO3);
        let m_co3 = water.molar(Ion::CO3);
        let m_co2 = m_hco3 * a_h * g1 / k1;
        let oh = kw / (a_h * g1);
        let h_free = a_h / g1;
        Carbonate {
            ct_mol_l: m_hco3 + m_co3 + m_co2,
            alk_eq_l: m_hco3 + 2.0 * m_co3 + oh - h_free,
        }
    }

    /// Closed-system pH for a known CT/alkalinity pair. Alkalinity is
    /// monotone in pH, so bisection is safe.
    fn solve_ph(
        carb: Carbonate,
        temperature_c: f64,
        ionic_strength: f64,
    ) -> Result<Speciation, RoError> {
        let t_k = temperature_c + T_KELVIN;
        let k1 = 10f64.powf(log_k1(t_k));
        let k2 = 10f64.powf(log_k2(t_k));
        let kw = 10f64.powf(-p_kw(t_k));
        let g1 = 10f64.powf(davies_log_gamma(1, ionic_strength, temperature_c));
        let g2 = 10f64.powf(davies_log_gamma(2, ionic_strength, temperature_c));

        let species_at = |ph: f64| -> (Speciation, f64) {
            let a_h = 10f64.powf(-ph);
            let denom = 1.0 + a_h * g1 / k1 + k2 * g1 / (a_h * g2);
            let hco3 = carb.ct_mol_l / denom;
            let co3 = hco3 * k2 * g1 / (a_h * g2);
            let co2 = hco3 * a_h * g1 / k1;
            let oh = kw / (a_h * g1);
            let h_free = a_h / g1;
            let alk = hco3 + 2.0 * co3 + oh - h_free;
            (
                Speciation {
                    hco3,
                    co3,
                    co2,
                    ph,
                },
                alk - carb.alk_eq_l,
            )
        };

        let (mut lo, mut hi) = (2.0_f64, 12.5_f64);
        let (_, f_lo) = species_at(lo);
        let (_, f_hi) = species_at(hi);
        if f_lo > 0.0 || f_hi < 0.0 {
            return Err(RoError::Chemistry {
                detail: format!(
                    "carbonate equilibrium has no root in pH [2, 12.5] (alk {:.3e} eq/L)",
                    carb.alk_eq_l
                ),
            });
        }
        for _ in 0..80 {
            let mid = 0.5 * (lo + hi);
            let (_, f_mid) = species_at(mid);
            if f_mid < 0.0 {
                lo = mid;
            } else {
                hi = mid;
            }
        }
        Ok(species_at(0.5 * (lo + hi)).0)
    }

    fn saturation_indices(
        water: &WaterComposition,
        spec: Speciation,
        temperature_c: f64,
        ionic_strength: f64,
    ) -> Vec<MineralSi> {
        let g1 = 10f64.powf(davies_log_gamma(1, ionic_strength, temperature_c));
        let g2 = 10f64.powf(davies_log_gamma(2, ionic_strength, temperature_c));
        let a_h = 10f64.powf(-spec.ph);

        let a_ca = water.molar(Ion::Ca) * g2;
        let a_ba = water.molar(Ion::Ba) * g2;
        let a_sr = water.molar(Ion::Sr) * g2;
        let a_so4 = water.molar(Ion::SO4) * g2;
        let a_f = water.molar(Ion::F) * g1;
        let a_co3 = spec.co3 * g2;
        // Silica solubility is pH-dependent through the H4SiO4/H3SiO4-
        // partition; only the neutral acid counts toward the SI.
        let si_total = water.molar(Ion::SiO2);
        let a_h4sio4 = si_total / (1.0 + 10f64.powf(LOG_KA_SILICIC) / a_h);

        let mut out = Vec::new();
        let mut push = |mineral: Mineral, iap: f64| {
            if iap > 0.0 {
                out.push(MineralSi {
                    mineral,
                    si: iap.log10() - log_ksp(mineral, temperature_c),
                });
            }
        };
        push(Mineral::Calcite, a_ca * a_co3);
        push(Mineral::Gypsum, a_ca * a_so4);
        push(Mineral::Anhydrite, a_ca * a_so4);
        push(Mineral::Barite, a_ba * a_so4);
        push(Mineral::Celestite, a_sr * a_so4);
        push(Mineral::Fluorite, a_ca * a_f * a_f);
        push(Mineral::AmorphousSilica, a_h4sio4);
        out
    }

    /// Rebuild the ion map after concentration: conserved species scale,
    /// carbonate species follow the re-solved speciation.
    fn composition_at(water: &WaterComposition, cf: f64, spec: Speciation) -> WaterComposition {
        let mut ions: BTreeMap<Ion, f64> = BTreeMap::new();
        for (ion, mg) in water.iter() {
            if ion != Ion::HCO3 && ion != Ion::CO3 {
                ions.insert(ion, mg * cf);
            }
        }
        if spec.hco3 > TINY {
            ions.insert(Ion::HCO3, spec.hco3 * Ion::HCO3.mw() * 1000.0);
        }
        if spec.co3 > TINY {
            ions.insert(Ion::CO3, spec.co3 * Ion::CO3.mw() * 1000.0);
        }
        WaterComposition::from_parts(ions)
    }
}

impl ChemistryEngine for EquilibriumModel {
    fn concentrate(
        &self,
        water: &WaterComposition,
        ph: f64,
        temperature_c: f64,
        cf: f64,
    ) -> Result<ConcentrateState, RoError> {
        if !(cf >= 1.0) || !cf.is_finite() {
            return Err(RoError::Chemistry {
                detail: format!("concentration factor {cf} out of range"),
            });
        }
        let i_feed = water.ionic_strength();
        let carb = Self::carbonate_from_input(water, ph, temperature_c, i_feed);
        let concentrated = Carbonate {
            ct_mol_l: carb.ct_mol_l * cf,
            alk_eq_l: carb.alk_eq_l * cf,
        };
        let i_conc = i_feed * cf;
        let spec = Self::solve_ph(concentrated, temperature_c, i_conc)?;
        let composition = Self::composition_at(water, cf, spec);
        let saturation = Self::saturation_indices(&composition, spec, temperature_c, i_conc);
        Ok(ConcentrateState {
            composition,
            ph: spec.ph,
            dissolved_co2_mg_l: spec.co2 * MW_CO2 * 1000.0,
            saturation,
        })
    }

    fn dose(
        &self,
        water: &WaterComposition,
        ph: f64,
        temperature_c: f64,
        reagent: Reagent,
        mmol_per_l: f64,
    ) -> Result<DosedState, RoError> {
        if mmol_per_l < 0.0 {
            return Err(RoError::Chemistry {
                detail: format!("negative reagent dose {mmol_per_l} mmol/L"),
            });
        }
        let i_feed = water.ionic_strength();
        let carb = Self::carbonate_from_input(water, ph, temperature_c, i_feed);
        let dosed = Carbonate {
            ct_mol_l: carb.ct_mol_l,
            alk_eq_l: carb.alk_eq_l + reagent.alkalinity_eq_per_mol() * mmol_per_l / 1000.0,
        };

        let mut ions: BTreeMap<Ion, f64> = water.iter().collect();
        match reagent {
            Reagent::SodiumHydroxide => {
                *ions.entry(Ion::Na).or_insert(0.0) += mmol_per_l * Ion::Na.mw();
            }
            Reagent::HydrochloricAcid => {
                *ions.entry(Ion::Cl).or_insert(0.0) += mmol_per_l * Ion::Cl.mw();
            }
            Reagent::SulfuricAcid => {
                *ions.entry(Ion::SO4).or_insert(0.0) += mmol_per_l * Ion::SO4.mw();
            }
        }
        let base = WaterComposition::from_parts(ions);
        let spec = Self::solve_ph(dosed, temperature_c, base.ionic_strength())?;
        Ok(DosedState {
            composition: Self::composition_at(&base, 1.0, spec),
            ph: spec.ph,
        })
    }
}
