//! Membrane element catalog. Entries are reference data; the simulator
//! treats them as immutable for the duration of an operation.

use serde::Serialize;

use crate::error::RoError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum MembraneGrade {
    Brackish,
    Seawater,
}

/// One element model. Water permeability `a_w` and the reference salt
/// permeability `b_ref` are cataloged at 25 C; per-ion salt permeabilities
/// are `b_ref` scaled by the ion registry's `b_scale`. The divalent
/// charge-amplification factor is a calibration constant, not a formula.
#[derive(Clone, Copy, Debug, Serialize)]
pub struct MembraneSpec {
    pub model: &'static str,
    pub grade: MembraneGrade,
    pub element_area_m2: f64,
    pub a_w_m_s_pa: f64,
    pub b_ref_m_s: f64,
    pub max_pressure_pa: f64,
    pub max_temperature_c: f64,
    pub spacer_height_m: f64,
    /// Dimensionless loss coefficient per element applied to rho*u^2/2.
    pub spacer_dp_coefficient: f64,
    /// Open feed-channel cross-section per element, m^2.
    pub channel_cross_section_m2: f64,
    pub nominal_flux_lmh: (f64, f64),
    pub divalent_amplification: f64,
}

pub static CATALOG: [MembraneSpec; 5] = [
    MembraneSpec {
        model: "BW30_PRO_400",
        grade: MembraneGrade::Brackish,
        element_area_m2: 37.2,
        a_w_m_s_pa: 9.6e-12,
        b_ref_m_s: 1.0e-7,
        max_pressure_pa: 41.0e5,
        max_temperature_c: 45.0,
        spacer_height_m: 7.11e-4,
        spacer_dp_coefficient: 520.0,
        channel_cross_section_m2: 0.0145,
        nominal_flux_lmh: (15.0, 25.0),
        divalent_amplification: 1.6,
    },
    MembraneSpec {
        model: "BW30_400_34",
        grade: MembraneGrade::Brackish,
        element_area_m2: 37.2,
        a_w_m_s_pa: 8.9e-12,
        b_ref_m_s: 9.0e-8,
        max_pressure_pa: 41.0e5,
        max_temperature_c: 45.0,
        spacer_height_m: 8.64e-4,
        spacer_dp_coefficient: 470.0,
        channel_cross_section_m2: 0.0168,
        nominal_flux_lmh: (14.0, 24.0),
        divalent_amplification: 1.6,
    },
    MembraneSpec {
        model: "ECO_PRO_440",
        grade: MembraneGrade::Brackish,
        element_area_m2: 40.9,
        a_w_m_s_pa: 1.18e-11,
        b_ref_m_s: 1.4e-7,
        max_pressure_pa: 41.0e5,
        max_temperature_c: 45.0,
        spacer_height_m: 7.11e-4,
        spacer_dp_coefficient: 520.0,
        channel_cross_section_m2: 0.0145,
        nominal_flux_lmh: (16.0, 27.0),
        divalent_amplification: 1.5,
    },
    MembraneSpec {
        model: "SW30HRLE_440",
        grade: MembraneGrade::Seawater,
        element_area_m2: 40.9,
        a_w_m_s_pa: 2.7e-12,
        b_ref_m_s: 1.1e-8,
        max_pressure_pa: 83.0e5,
        max_temperature_c: 45.0,
        spacer_height_m: 7.11e-4,
        spacer_dp_coefficient: 540.0,
        channel_cross_section_m2: 0.0145,
        nominal_flux_lmh: (11.0, 19.0),
        divalent_amplification: 2.0,
    },
    MembraneSpec {
        model: "SW30XHR_440",
        grade: MembraneGrade::Seawater,
        element_area_m2: 40.9,
        a_w_m_s_pa: 2.4e-12,
        b_ref_m_s: 8.0e-9,
        max_pressure_pa: 83.0e5,
        max_temperature_c: 45.0,
        spacer_height_m: 7.11e-4,
        spacer_dp_coefficient: 540.0,
        channel_cross_section_m2: 0.0145,
        nominal_flux_lmh: (10.0, 18.0),
        divalent_amplification: 2.0,
    },
];

/// Case-insensitive lookup; dashes and spaces are treated as `_`.
pub fn lookup(model: &str) -> Result<&'static MembraneSpec, RoError> {
    let key = normalize(model);
    CATALOG
        .iter()
        .find(|m| normalize(m.model) == key)
        .ok_or_else(|| RoError::UnknownMembrane {
            model: model.to_string(),
        })
}

fn normalize(model: &str) -> String {
    model
        .chars()
        .map(|c| match c {
            '-' | ' ' => '_',
            c => c.to_ascii_uppercase(),
        })
        .collect()
}
