//! PHREEQC adapter: the production chemistry engine. Builds
//! SOLUTION/REACTION/SELECTED_OUTPUT decks, runs the external `phreeqc`
//! executable, and maps its selected output back into engine types. A run
//! that fails, does not converge, or cannot be parsed is a
//! [`RoError::Chemistry`]; there is no approximate fallback.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::chemistry::engine::{
    ChemistryEngine, ConcentrateState, DosedState, Mineral, MineralSi, Reagent,
};
use crate::chemistry::validator::WaterComposition;
use crate::chemistry::{Ion, WATER_MOL_PER_KG};
use crate::error::RoError;

static RUN_COUNTER: AtomicU64 = AtomicU64::new(0);

const DEFAULT_EXE: &str = "phreeqc";
const DEFAULT_DATABASE: &str = "/usr/local/share/phreeqc/database/phreeqc.dat";

/// Engine backed by a local PHREEQC installation. Sessions are
/// per-request; instances hold only paths and may be cloned freely.
#[derive(Clone, Debug)]
pub struct PhreeqcEngine {
    exe: PathBuf,
    database: PathBuf,
}

impl PhreeqcEngine {
    pub fn new(exe: impl Into<PathBuf>, database: impl Into<PathBuf>) -> Self {
        Self {
            exe: exe.into(),
            database: database.into(),
        }
    }

    /// Paths from `PHREEQC_EXE` / `PHREEQC_DATABASE`, with conventional
    /// install locations as defaults.
    pub fn from_env() -> Self {
        let exe = std::env::var("PHREEQC_EXE").unwrap_or_else(|_| DEFAULT_EXE.to_string());
        let db = std::env::var("PHREEQC_DATABASE").unwrap_or_else(|_| DEFAULT_DATABASE.to_string());
        Self::new(exe, db)
    }

    fn run_deck(&self, deck: &str) -> Result<String, RoError> {
        let id = RUN_COUNTER.fetch_add(1, Ordering::Relaxed);
        let dir = std::env::temp_dir();
        let stem = format!("rodesign-{}-{}", std::process::id(), id);
        let input = dir.join(format!("{stem}.pqi"));
        let output = dir.join(format!("{stem}.pqo"));
        let selected = dir.join(format!("{stem}.sel"));

        let deck = deck.replace("{SELECTED_FILE}", &selected.to_string_lossy());
        fs::write(&input, &deck).map_err(|e| RoError::Chemistry {
            detail: format!("could not write PHREEQC input: {e}"),
        })?;

        let result = Command::new(&self.exe)
            .arg(&input)
            .arg(&output)
            .arg(&self.database)
            .output();
        let selected_text = match result {
            Ok(out) if out.status.success() => {
                fs::read_to_string(&selected).map_err(|e| RoError::Chemistry {
                    detail: format!("PHREEQC selected output missing: {e}"),
                })
            }
            Ok(out) => Err(RoError::Chemistry {
                detail: format!(
                    "phreeqc exited with {}: {}",
                    out.status,
                    String::from_utf8_lossy(&out.stderr).trim()
                ),
            }),
            Err(e) => Err(RoError::Chemistry {
                detail: format!("could not launch '{}': {e}", self.exe.display()),
            }),
        };

        for path in [&input, &output, &selected] {
            let _ = fs::remove_file(path);
        }
        selected_text
    }

    pub fn exe(&self) -> &Path {
        &self.exe
    }
}

fn solution_block(water: &WaterComposition, ph: f64, temperature_c: f64) -> String {
    let mut block = String::from("SOLUTION 1\n    units mg/l\n");
    let _ = writeln!(block, "    temp {temperature_c:.2}");
    let _ = writeln!(block, "    pH {ph:.3}");

    // Carbonate enters as alkalinity; measured CO3-2 folds in as its
    // bicarbonate equivalent.
    let alk_as_hco3 = water.get(Ion::HCO3)
        + water.get(Ion::CO3) * (2.0 * Ion::HCO3.mw() / Ion::CO3.mw());
    if alk_as_hco3 > 0.0 {
        let _ = writeln!(block, "    Alkalinity {alk_as_hco3:.4} as HCO3");
    }
    for (ion, mg) in water.iter() {
        match ion {
            Ion::HCO3 | Ion::CO3 => continue,
            Ion::SiO2 => {
                let _ = writeln!(block, "    Si {mg:.4} as SiO2");
            }
            Ion::Boron => {
                let _ = writeln!(block, "    B {mg:.4} as B(OH)3");
            }
            Ion::SO4 => {
                let _ = writeln!(block, "    S(6) {mg:.4} as SO4");
            }
            Ion::NO3 => {
                let _ = writeln!(block, "    N(5) {mg:.4} as NO3");
            }
            _ => {
                let _ = writeln!(block, "    {} {mg:.4}", ion.props().phreeqc_master);
            }
        }
    }
    block
}

fn selected_output_block() -> String {
    let mut block = String::from(
        "SELECTED_OUTPUT 1\n    -file {SELECTED_FILE}\n    -reset false\n    -pH true\n    -water true\n    -molalities CO2\n",
    );
    let totals: Vec<&str> = [
        "Na", "K", "Ca", "Mg", "Sr", "Ba", "Cl", "S(6)", "C(4)", "N(5)", "F", "Br", "Si", "B",
    ]
    .to_vec();
    let _ = writeln!(block, "    -totals {}", totals.join(" "));
    let phases: Vec<&str> = Mineral::ALL.iter().map(|m| m.phreeqc_phase()).collect();
    let _ = writeln!(block, "    -si {}", phases.join(" "));
    block
}

fn concentrate_deck(water: &WaterComposition, ph: f64, temperature_c: f64, cf: f64) -> String {
    let mut deck = solution_block(water, ph, temperature_c);
    deck.push_str(&selected_output_block());
    if cf > 1.0 {
        let removed_mol = WATER_MOL_PER_KG * (1.0 - 1.0 / cf);
        let _ = writeln!(
            deck,
            "REACTION 1\n    H2O -1.0\n    {removed_mol:.6} moles"
        );
    }
    deck.push_str("END\n");
    deck
}

fn dose_deck(
    water: &WaterComposition,
    ph: f64,
    temperature_c: f64,
    reagent: Reagent,
    mmol_per_l: f64,
) -> String {
    let mut deck = solution_block(water, ph, temperature_c);
    deck.push_str(&selected_output_block());
    let _ = writeln!(
        deck,
        "REACTION 1\n    {} 1.0\n    {:.6} millimoles",
        reagent.label(),
        mmol_per_l
    );
    deck.push_str("END\n");
    deck
}

struct SelectedRow {
    columns: BTreeMap<String, f64>,
}

impl SelectedRow {
    fn get(&self, header: &str) -> Option<f64> {
        self.columns.get(header).copied()
    }

    /// Total element molality, mol/kgw, by master-species name.
    fn total(&self, master: &str) -> f64 {
        self.get(&format!("{master}(mol/kgw)")).unwrap_or(0.0)
    }
}

/// Parse the last data row of a PHREEQC selected-output table (the state
/// after the REACTION step).
fn parse_selected(text: &str) -> Result<SelectedRow, RoError> {
    let mut lines = text.lines().filter(|l| !l.trim().is_empty());
    let header_line = lines.next().ok_or_else(|| RoError::Chemistry {
        detail: "empty PHREEQC selected output".into(),
    })?;
    let headers: Vec<&str> = header_line.split_whitespace().collect();
    let last = lines.last().ok_or_else(|| RoError::Chemistry {
        detail: "PHREEQC selected output has no data rows".into(),
    })?;
    let values: Vec<&str> = last.split_whitespace().collect();
    if values.len() != headers.len() {
        return Err(RoError::Chemistry {
            detail: format!(
                "selected output column mismatch: {} headers, {} values",
                headers.len(),
                values.len()
            ),
        });
    }
    let mut columns = BTreeMap::new();
    for (h, v) in headers.iter().zip(values) {
        let parsed: f64 = v.parse().map_err(|_| RoError::Chemistry {
            detail: format!("unparseable selected-output value '{v}' for column '{h}'"),
        })?;
        columns.insert((*h).to_string(), parsed);
    }
    Ok(SelectedRow { columns })
}

fn saturation_from(row: &SelectedRow) -> Vec<MineralSi> {
    Mineral::ALL
        .iter()
        .filter_map(|&mineral| {
            let si = row.get(&format!("si_{}", mineral.phreeqc_phase()))?;
            // PHREEQC reports -999 for phases with absent constituents.
            if si <= -900.0 {
                return None;
            }
            Some(MineralSi { mineral, si })
        })
        .collect()
}

fn composition_from(row: &SelectedRow) -> WaterComposition {
    let mut ions: BTreeMap<Ion, f64> = BTreeMap::new();
    let mut put = |ion: Ion, mol_kgw: f64| {
        if mol_kgw > 0.0 {
            ions.insert(ion, mol_kgw * ion.mw() * 1000.0);
        }
    };
    put(Ion::Na, row.total("Na"));
    put(Ion::K, row.total("K"));
    put(Ion::Ca, row.total("Ca"));
    put(Ion::Mg, row.total("Mg"));
    put(Ion::Sr, row.total("Sr"));
    put(Ion::Ba, row.total("Ba"));
    put(Ion::Cl, row.total("Cl"));
    put(Ion::SO4, row.total("S(6)"));
    put(Ion::NO3, row.total("N(5)"));
    put(Ion::F, row.total("F"));
    put(Ion::Br, row.total("Br"));
    put(Ion::SiO2, row.total("Si"));
    put(Ion::Boron, row.total("B"));
    // Dissolved carbonate net of CO2(aq), carried as bicarbonate.
    let co2 = row.get("m_CO2(mol/kgw)").unwrap_or(0.0);
    let c_total = row.total("C(4)");
    put(Ion::HCO3, (c_total - co2).max(0.0));
    WaterComposition::from_parts(ions)
}

impl ChemistryEngine for PhreeqcEngine {
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
        let text = self.run_deck(&concentrate_deck(water, ph, temperature_c, cf))?;
        let row = parse_selected(&text)?;
        let ph_out = row.get("pH").ok_or_else(|| RoError::Chemistry {
            detail: "selected output has no pH column".into(),
        })?;
        let co2_mg_l = row.get("m_CO2(mol/kgw)").unwrap_or(0.0) * 44.009 * 1000.0;
        Ok(ConcentrateState {
            composition: composition_from(&row),
            ph: ph_out,
            dissolved_co2_mg_l: co2_mg_l,
            saturation: saturation_from(&row),
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
        let text = self.run_deck(&dose_deck(water, ph, temperature_c, reagent, mmol_per_l))?;
        let row = parse_selected(&text)?;
        let ph_out = row.get("pH").ok_or_else(|| RoError::Chemistry {
            detail: "selected output has no pH column".into(),
        })?;
        Ok(DosedState {
            composition: composition_from(&row),
            ph: ph_out,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn water() -> WaterComposition {
        WaterComposition::from_parts(
            [
                (Ion::Na, 1200.0),
                (Ion::Cl, 1850.0),
                (Ion::HCO3, 200.0),
                (Ion::SiO2, 20.0),
            ]
            .into_iter()
            .collect(),
        )
    }

    #[test]
    fn concentrate_deck_removes_water_for_the_target_cf() {
        let deck = concentrate_deck(&water(), 7.5, 25.0, 4.0);
        assert!(deck.contains("SOLUTION 1"));
        assert!(deck.contains("Alkalinity 200.0000 as HCO3"));
        assert!(deck.contains("Si 20.0000 as SiO2"));
        assert!(deck.contains("H2O -1.0"));
        // 55.508 * (1 - 1/4) = 41.631 mol
        assert!(deck.contains("41.631000 moles"));
        assert!(deck.contains("-si Calcite Gypsum Anhydrite Barite Celestite Fluorite SiO2(a)"));
    }

    #[test]
    fn dose_deck_uses_reagent_formula() {
        let deck = dose_deck(&water(), 7.5, 25.0, Reagent::SodiumHydroxide, 2.5);
        assert!(deck.contains("NaOH 1.0"));
        assert!(deck.contains("2.500000 millimoles"));
    }

    #[test]
    fn parses_a_selected_output_table() {
        let text = "\
pH m_CO2(mol/kgw) Na(mol/kgw) Cl(mol/kgw) C(4)(mol/kgw) si_Calcite si_Gypsum
7.1000e+00 1.2000e-04 5.2000e-02 5.1000e-02 3.4000e-03 -9.9900e+02 -4.5000e-01
7.8000e+00 8.0000e-05 2.0800e-01 2.0400e-01 1.3600e-02 4.1000e-01 2.0000e-01
";
        let row = parse_selected(text).unwrap();
        assert!((row.get("pH").unwrap() - 7.8).abs() < 1e-9);
        let comp = composition_from(&row);
        assert!(comp.get(Ion::Na) > 4000.0);
        let si = saturation_from(&row);
        assert!(si.iter().any(|s| s.mineral == Mineral::Calcite));
    }

    #[test]
    fn negative_999_si_rows_are_dropped() {
        let text = "\
pH si_Calcite si_Gypsum
7.0000e+00 -9.9900e+02 1.0000e-01
";
        let row = parse_selected(text).unwrap();
        let si = saturation_from(&row);
        assert_eq!(si.len(), 1);
        assert_eq!(si[0].mineral, Mineral::Gypsum);
    }
}
