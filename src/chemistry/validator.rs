//! Feed-water validation: label normalization, charge balance, and TDS
//! reconciliation. Everything downstream works on [`WaterComposition`],
//! which is immutable once built.

use std::collections::BTreeMap;

use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};

use crate::chemistry::{
    CHARGE_BALANCE_LIMIT, CHARGE_BALANCE_TRIGGER, Ion, TDS_RECONCILE_LIMIT, TINY, eq_per_l,
    mol_per_l,
};
use crate::error::RoError;

/// A validated ion map (mg/L) with reconciled TDS.
#[derive(Clone, Debug, PartialEq)]
pub struct WaterComposition {
    ions: BTreeMap<Ion, f64>,
    tds_mg_l: f64,
    /// Charge-balance residual of the caller's raw input, before any
    /// counter-ion adjustment.
    reported_residual: f64,
}

impl WaterComposition {
    /// Validate a raw label -> mg/L map against the ion registry.
    ///
    /// Steps: normalize labels, reject negatives and unknowns, auto-balance
    /// charge onto the dominant counter-ion when the residual exceeds the
    /// trigger, and reconcile the reported TDS against the summed
    /// concentrations.
    pub fn validate(
        raw: &BTreeMap<String, f64>,
        reported_tds_mg_l: Option<f64>,
    ) -> Result<Self, RoError> {
        let mut ions: BTreeMap<Ion, f64> = BTreeMap::new();
        for (label, &mg_l) in raw {
            let ion = Ion::parse(label).ok_or_else(|| RoError::InvalidComposition {
                reason: format!("unknown ion label '{label}'"),
            })?;
            if mg_l < 0.0 {
                return Err(RoError::InvalidComposition {
                    reason: format!("negative concentration for '{label}': {mg_l} mg/L"),
                });
            }
            if mg_l > 0.0 {
                *ions.entry(ion).or_insert(0.0) += mg_l;
            }
        }
        if ions.is_empty() {
            return Err(RoError::InvalidComposition {
                reason: "empty ion composition".into(),
            });
        }

        let reported_residual = charge_residual(&ions);
        if reported_residual.abs() > CHARGE_BALANCE_LIMIT {
            return Err(RoError::InvalidComposition {
                reason: format!(
                    "charge imbalance {:.1}% exceeds the {:.0}% limit",
                    reported_residual * 100.0,
                    CHARGE_BALANCE_LIMIT * 100.0
                ),
            });
        }
        if reported_residual.abs() > CHARGE_BALANCE_TRIGGER {
            absorb_imbalance(&mut ions)?;
        }

        let summed: f64 = ions.values().sum();
        if let Some(reported) = reported_tds_mg_l {
            if reported > 0.0 && ((reported - summed) / reported).abs() > TDS_RECONCILE_LIMIT {
                return Err(RoError::InvalidComposition {
                    reason: format!(
                        "reported TDS {reported:.0} mg/L differs from summed ions {summed:.0} mg/L by more than {:.0}%",
                        TDS_RECONCILE_LIMIT * 100.0
                    ),
                });
            }
        }

        Ok(Self {
            ions,
            tds_mg_l: summed,
            reported_residual,
        })
    }

    /// Internal constructor for derived waters (concentrates, permeates).
    /// Skips label handling; the caller owns the balance properties.
    pub(crate) fn from_parts(ions: BTreeMap<Ion, f64>) -> Self {
        let ions: BTreeMap<Ion, f64> = ions.into_iter().filter(|(_, v)| *v > 0.0).collect();
        let tds_mg_l = ions.values().sum();
        let reported_residual = charge_residual(&ions);
        Self {
            ions,
            tds_mg_l,
            reported_residual,
        }
    }

    pub fn get(&self, ion: Ion) -> f64 {
        self.ions.get(&ion).copied().unwrap_or(0.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Ion, f64)> + '_ {
        self.ions.iter().map(|(&i, &v)| (i, v))
    }

    pub fn tds_mg_l(&self) -> f64 {
        self.tds_mg_l
    }

    pub fn reported_residual(&self) -> f64 {
        self.reported_residual
    }

    pub fn charge_residual(&self) -> f64 {
        charge_residual(&self.ions)
    }

    pub fn molar(&self, ion: Ion) -> f64 {
        mol_per_l(self.get(ion), ion.mw())
    }

    /// Total dissolved-species molarity (mol/L), neutrals included. This is
    /// the concentration the van 't Hoff osmotic term sums over.
    pub fn osmolar_total(&self) -> f64 {
        self.iter().map(|(i, mg)| mol_per_l(mg, i.mw())).sum()
    }

    /// Ionic strength I = 1/2 sum(c_i z_i^2), mol/L.
    pub fn ionic_strength(&self) -> f64 {
        0.5 * self
            .iter()
            .map(|(i, mg)| mol_per_l(mg, i.mw()) * f64::from(i.charge()).powi(2))
            .sum::<f64>()
    }

    /// Uniformly scale every species (full-retention concentration).
    pub fn scaled(&self, factor: f64) -> Self {
        Self::from_parts(self.iter().map(|(i, mg)| (i, mg * factor)).collect())
    }

    /// Flow-weighted blend of two waters (recycle mixer).
    pub fn blended(&self, flow: f64, other: &Self, other_flow: f64) -> Self {
        let total = (flow + other_flow).max(TINY);
        let mut ions = BTreeMap::new();
        for ion in Ion::ALL {
            let mg = (self.get(ion) * flow + other.get(ion) * other_flow) / total;
            if mg > 0.0 {
                ions.insert(ion, mg);
            }
        }
        Self::from_parts(ions)
    }

    /// Restore electroneutrality by shrinking the dominant ion on the
    /// excess-charge side. Used on model-produced permeates, where shrinking
    /// keeps every concentration below its feed value.
    pub(crate) fn rebalanced_by_reduction(&self) -> Self {
        let residual_eq: f64 = self
            .iter()
            .map(|(i, mg)| eq_per_l(mg, i.mw(), i.charge()))
            .sum();
        if residual_eq.abs() < TINY {
            return self.clone();
        }
        let excess_sign = residual_eq.signum() as i8;
        let dominant = self
            .iter()
            .filter(|(i, _)| i.charge().signum() == excess_sign)
            .max_by(|a, b| {
                let ea = eq_per_l(a.1, a.0.mw(), a.0.charge()).abs();
                let eb = eq_per_l(b.1, b.0.mw(), b.0.charge()).abs();
                ea.total_cmp(&eb)
            });
        let Some((ion, mg)) = dominant else {
            return self.clone();
        };
        let delta_mg = residual_eq.abs() * ion.mw() / f64::from(ion.charge().abs()) * 1000.0;
        let mut ions = self.ions.clone();
        ions.insert(ion, (mg - delta_mg).max(0.0));
        Self::from_parts(ions)
    }

    pub fn to_label_map(&self) -> BTreeMap<&'static str, f64> {
        self.iter().map(|(i, mg)| (i.label(), mg)).collect()
    }
}

impl Serialize for WaterComposition {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("WaterComposition", 2)?;
        s.serialize_field("ions_mg_l", &self.to_label_map())?;
        s.serialize_field("tds_mg_l", &self.tds_mg_l)?;
        s.end()
    }
}

fn charge_residual(ions: &BTreeMap<Ion, f64>) -> f64 {
    let mut signed = 0.0;
    let mut total = 0.0;
    for (&ion, &mg) in ions {
        let eq = eq_per_l(mg, ion.mw(), ion.charge());
        signed += eq;
        total += eq.abs();
    }
    if total < TINY { 0.0 } else { signed / total }
}

/// Absorb the signed equivalent excess into the largest-magnitude ion of
/// opposite sign. Fails when no such counter-ion exists.
fn absorb_imbalance(ions: &mut BTreeMap<Ion, f64>) -> Result<(), RoError> {
    let signed: f64 = ions
        .iter()
        .map(|(&i, &mg)| eq_per_l(mg, i.mw(), i.charge()))
        .sum();
    let counter_sign = -(signed.signum() as i8);
    let counter = ions
        .iter()
        .filter(|(i, _)| i.charge().signum() == counter_sign)
        .max_by(|a, b| {
            let ea = eq_per_l(*a.1, a.0.mw(), a.0.charge()).abs();
            let eb = eq_per_l(*b.1, b.0.mw(), b.0.charge()).abs();
            ea.total_cmp(&eb)
        })
        .map(|(&i, _)| i);
    let Some(ion) = counter else {
        return Err(RoError::InvalidComposition {
            reason: "charge imbalance with no counter-ion available to absorb it".into(),
        });
    };
    let delta_mg = signed.abs() * ion.mw() / f64::from(ion.charge().abs()) * 1000.0;
    *ions.entry(ion).or_insert(0.0) += delta_mg;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn accepts_balanced_brackish_water() {
        let w = WaterComposition::validate(&raw(&[("Na+", 1200.0), ("Cl-", 1800.0)]), Some(3000.0))
            .unwrap();
        assert!((w.tds_mg_l() - 3000.0).abs() < 1.0);
        assert!(w.charge_residual().abs() < 0.05);
    }

    #[test]
    fn normalizes_varied_label_notations() {
        let w = WaterComposition::validate(
            &raw(&[("Na_+", 460.0), ("cl", 709.0), ("SO4_2-", 96.0)]),
            None,
        )
        .unwrap();
        assert!(w.get(Ion::Na) > 0.0);
        assert!(w.get(Ion::Cl) > 0.0);
        assert!(w.get(Ion::SO4) > 0.0);
    }

    #[test]
    fn rejects_negative_and_unknown() {
        let err = WaterComposition::validate(&raw(&[("Na+", -1.0)]), None);
        assert!(matches!(err, Err(RoError::InvalidComposition { .. })));
        let err = WaterComposition::validate(&raw(&[("Xx+", 10.0)]), None);
        assert!(matches!(err, Err(RoError::InvalidComposition { .. })));
    }

    #[test]
    fn auto_balances_moderate_imbalance_onto_counter_ion() {
        // ~6% cation excess; Cl- should absorb it.
        let w = WaterComposition::validate(&raw(&[("Na+", 1340.0), ("Cl-", 1800.0)]), None).unwrap();
        assert!(w.reported_residual() > CHARGE_BALANCE_TRIGGER);
        assert!(w.charge_residual().abs() < 1e-6);
        assert!(w.get(Ion::Cl) > 1800.0);
    }

    #[test]
    fn rejects_gross_imbalance() {
        let err = WaterComposition::validate(&raw(&[("Na+", 1200.0), ("Cl-", 100.0)]), None);
        assert!(matches!(err, Err(RoError::InvalidComposition { .. })));
    }

    #[test]
    fn rejects_tds_mismatch() {
        let err =
            WaterComposition::validate(&raw(&[("Na+", 1200.0), ("Cl-", 1800.0)]), Some(9000.0));
        assert!(matches!(err, Err(RoError::InvalidComposition { .. })));
    }

    #[test]
    fn rebalance_by_reduction_never_raises_a_species() {
        let w = WaterComposition::from_parts(
            [(Ion::Na, 50.0), (Ion::Ca, 4.0), (Ion::Cl, 120.0)]
                .into_iter()
                .collect(),
        );
        let balanced = w.rebalanced_by_reduction();
        assert!(balanced.charge_residual().abs() < 1e-9);
        for (ion, mg) in balanced.iter() {
            assert!(mg <= w.get(ion) + 1e-12);
        }
    }
}
