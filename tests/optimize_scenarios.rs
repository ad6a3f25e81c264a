use std::collections::BTreeMap;

use rodesign_rs::{
    AntiscalantScenario, Deadline, EquilibriumModel, OptimizeRequest, RoError, Warning,
    optimize_ro_configuration,
};

fn ions(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
    pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
}

fn request(feed_flow: f64, recovery: f64, membrane: &str) -> OptimizeRequest {
    OptimizeRequest {
        feed_flow_m3h: feed_flow,
        water_recovery_fraction: recovery,
        membrane_model: membrane.to_string(),
        allow_recycle: true,
        max_recycle_ratio: 0.9,
        flux_targets_lmh: None,
        flux_tolerance: 0.1,
        min_concentrate_flow_m3h_per_vessel: 3.8,
        elements_per_vessel: 6,
        feed_ion_composition: None,
        feed_tds_mg_l: None,
        feed_temperature_c: 25.0,
        feed_ph: 7.5,
        antiscalant: AntiscalantScenario::Standard,
    }
}

#[test]
fn two_stage_brackish_75_percent() {
    let req = request(100.0, 0.75, "BW30_PRO_400");
    let configs = optimize_ro_configuration(&req, None, Deadline::none()).unwrap();

    let two_stage: Vec<_> = configs.iter().filter(|c| c.stages.len() == 2).collect();
    assert!(!two_stage.is_empty(), "expected a 2-stage option");
    let c = two_stage[0];
    let n1 = c.stages[0].vessel_count as f64;
    let n2 = c.stages[1].vessel_count as f64;
    assert!(
        (n1 / n2 - 2.0).abs() < 0.25,
        "expected a ~2:1 taper, got {n1}:{n2}"
    );
    assert!((c.system_recovery - 0.75).abs() < 0.02);
    assert!(c.target_met);
    assert!(c.recycle.is_none());
}

#[test]
fn every_returned_configuration_closes_its_mass_balances() {
    let req = request(100.0, 0.85, "BW30_PRO_400");
    let configs = optimize_ro_configuration(&req, None, Deadline::none()).unwrap();
    assert!(!configs.is_empty());

    for c in &configs {
        // invariant: system recovery against disposal on the fresh-feed basis
        let disposal = c
            .recycle
            .as_ref()
            .map(|r| r.disposal_flow_m3h)
            .unwrap_or_else(|| c.stages.last().unwrap().concentrate_flow_m3h);
        let recovery = 1.0 - disposal / c.system_feed_flow_m3h;
        assert!((recovery - c.system_recovery).abs() < 1e-3);

        // invariant: per-stage flow closure
        for s in &c.stages {
            let gap = (s.feed_flow_m3h - s.permeate_flow_m3h - s.concentrate_flow_m3h).abs();
            assert!(gap / s.feed_flow_m3h < 1e-3);
        }

        // invariant: mixer closure when recycling
        if let Some(r) = &c.recycle {
            let stage1 = c.stages[0].feed_flow_m3h;
            let blended = c.system_feed_flow_m3h + r.recycle_flow_m3h;
            assert!((blended - stage1).abs() / stage1 < 1e-3);
        }

        // stage k+1 is fed by stage k's concentrate
        for pair in c.stages.windows(2) {
            let gap = (pair[0].concentrate_flow_m3h - pair[1].feed_flow_m3h).abs();
            assert!(gap / pair[1].feed_flow_m3h < 1e-9);
        }
    }
}

#[test]
fn high_recovery_needs_recycle_and_keeps_the_fresh_feed_basis() {
    let req = request(100.0, 0.85, "BW30_PRO_400");
    let configs = optimize_ro_configuration(&req, None, Deadline::none()).unwrap();

    for c in &configs {
        assert_eq!(c.stages.len(), 3);
        let r = c.recycle.as_ref().expect("85% brackish requires recycle");
        assert!(r.recycle_ratio > 0.0);
        assert!((c.system_feed_flow_m3h - 100.0).abs() < 1e-9);
        assert!((r.disposal_flow_m3h - 15.0).abs() < 1.0);
        assert!(c.system_recovery >= 0.85 - 1e-6 && c.system_recovery < 0.88);
        // the blended stage-1 feed is larger than the fresh feed
        assert!(c.stages[0].feed_flow_m3h > 100.0);
    }
}

#[test]
fn tiny_recovery_target_returns_the_trivial_train() {
    let req = request(100.0, 0.01, "BW30_PRO_400");
    let configs = optimize_ro_configuration(&req, None, Deadline::none()).unwrap();
    let first = &configs[0];
    assert_eq!(first.stages.len(), 1);
    assert_eq!(first.stages[0].vessel_count, 1);
    assert!(first.system_recovery >= 0.01);
}

#[test]
fn extreme_recovery_without_recycle_is_infeasible() {
    let mut req = request(100.0, 0.99, "BW30_PRO_400");
    req.allow_recycle = false;
    let err = optimize_ro_configuration(&req, None, Deadline::none());
    assert!(matches!(err, Err(RoError::NoFeasibleConfiguration { .. })));
}

#[test]
fn seawater_45_percent_is_a_single_stage() {
    let req = request(50.0, 0.45, "SW30HRLE_440");
    let configs = optimize_ro_configuration(&req, None, Deadline::none()).unwrap();
    assert_eq!(configs[0].stages.len(), 1);
    assert!((configs[0].system_recovery - 0.45).abs() < 0.02);
}

#[test]
fn unknown_membrane_is_rejected() {
    let req = request(100.0, 0.75, "NF270_400");
    assert!(matches!(
        optimize_ro_configuration(&req, None, Deadline::none()),
        Err(RoError::UnknownMembrane { .. })
    ));
}

#[test]
fn scaling_limited_feed_is_flagged_and_antiscalant_helps() {
    let engine = EquilibriumModel::new();
    let feed = ions(&[
        ("Ca2+", 400.0),
        ("SO4-2", 1000.0),
        ("HCO3-", 300.0),
        ("Na+", 200.0),
        ("Cl-", 150.0),
    ]);

    let mut req = request(100.0, 0.85, "BW30_PRO_400");
    req.feed_ion_composition = Some(feed.clone());
    req.antiscalant = AntiscalantScenario::None;
    let configs = optimize_ro_configuration(&req, Some(&engine as &dyn rodesign_rs::ChemistryEngine), Deadline::none()).unwrap();
    let r_none = configs[0].sustainable_r_max.expect("gate ran");
    assert!(r_none < 0.85);
    assert!(configs.iter().all(|c| c
        .warnings
        .iter()
        .any(|w| matches!(w, Warning::SustainableRecoveryExceeded { .. }))));

    req.antiscalant = AntiscalantScenario::HighPerformance;
    let configs = optimize_ro_configuration(&req, Some(&engine as &dyn rodesign_rs::ChemistryEngine), Deadline::none()).unwrap();
    let r_high = configs[0].sustainable_r_max.expect("gate ran");
    assert!(r_high > r_none, "antiscalant should raise the ceiling: {r_none} -> {r_high}");
    assert!(r_high < 0.85);
}

#[test]
fn explicit_flux_targets_plus_gating_surface_the_conflict() {
    let engine = EquilibriumModel::new();
    let mut req = request(100.0, 0.85, "BW30_PRO_400");
    req.flux_targets_lmh = Some(vec![18.0, 15.0, 12.0]);
    req.feed_ion_composition = Some(ions(&[
        ("Ca2+", 400.0),
        ("SO4-2", 1000.0),
        ("HCO3-", 300.0),
        ("Na+", 200.0),
        ("Cl-", 150.0),
    ]));
    req.antiscalant = AntiscalantScenario::None;
    let configs = optimize_ro_configuration(&req, Some(&engine as &dyn rodesign_rs::ChemistryEngine), Deadline::none()).unwrap();
    assert!(configs.iter().all(|c| c
        .warnings
        .iter()
        .any(|w| matches!(w, Warning::FluxTargetConflict { .. }))));
}

#[test]
fn deadline_cancellation_surfaces() {
    let req = request(100.0, 0.75, "BW30_PRO_400");
    let err = optimize_ro_configuration(
        &req,
        None,
        Deadline::within(std::time::Duration::ZERO),
    );
    assert!(matches!(err, Err(RoError::Cancelled)));
}
