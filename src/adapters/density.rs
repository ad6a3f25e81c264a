//! TEOS-10-backed water properties. TDS is mapped to Practical Salinity,
//! converted to Reference Salinity, and densities come from the `gsw`
//! 75-term polynomial at surface pressure.

use gsw as gsw_teos10;

/// Solution density (kg/m^3) at `tds_mg_l` and `temperature_c`.
/// Falls back to a linear brine estimate if the library rejects the input.
pub fn rho_kg_m3(tds_mg_l: f64, temperature_c: f64) -> f64 {
    let sp = (tds_mg_l.max(0.0)) / 1000.0;
    let sa = gsw_teos10::conversions::sr_from_sp(sp);
    gsw_teos10::volume::rho(sa, temperature_c, 0.0).unwrap_or(1000.0 + 0.75e-3 * tds_mg_l)
}

/// Dynamic viscosity of water (Pa s), Vogel correlation. Salinity
/// corrections are below a percent at brackish strength and are ignored.
pub fn mu_pa_s(temperature_c: f64) -> f64 {
    let t_k = temperature_c + 273.15;
    2.414e-5 * 10f64.powf(247.8 / (t_k - 140.0))
}
