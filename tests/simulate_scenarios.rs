use std::collections::BTreeMap;

use rodesign_rs::{
    AntiscalantScenario, Configuration, Deadline, EquilibriumModel, OptimizeRequest, RoError,
    SimulateRequest, membranes, optimize_ro_configuration, performance, simulate_ro_system,
};

fn ions(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
    pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
}

fn brackish_feed() -> BTreeMap<String, f64> {
    ions(&[("Na+", 1200.0), ("Cl-", 1800.0)])
}

fn seawater_feed() -> BTreeMap<String, f64> {
    ions(&[
        ("Na+", 10_800.0),
        ("Mg2+", 1_300.0),
        ("Ca2+", 410.0),
        ("K+", 390.0),
        ("Cl-", 19_400.0),
        ("SO4-2", 2_700.0),
    ])
}

fn optimize(feed_flow: f64, recovery: f64, membrane: &str) -> Vec<Configuration> {
    let req = OptimizeRequest {
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
    };
    optimize_ro_configuration(&req, None, Deadline::none()).unwrap()
}

fn simulate(
    configuration: Configuration,
    membrane: &str,
    feed: BTreeMap<String, f64>,
    salinity: Option<f64>,
) -> rodesign_rs::SimulationOutput {
    let engine = EquilibriumModel::new();
    let req = SimulateRequest {
        configuration,
        membrane_model: membrane.to_string(),
        feed_ion_composition: feed,
        feed_salinity_ppm: salinity,
        feed_temperature_c: 25.0,
        feed_ph: 7.5,
        economic_params: None,
        chemical_dosing: None,
    };
    simulate_ro_system(&req, &engine, Deadline::none()).unwrap()
}

fn check_invariants(out: &rodesign_rs::SimulationOutput) {
    let sys = &out.performance.system;

    // system recovery on the fresh-feed basis
    let expect = 1.0 - sys.disposal_flow_m3h / sys.system_feed_flow_m3h;
    assert!((sys.system_recovery - expect).abs() < 1e-3);

    // system-basis salt balance
    let mass_in = sys.system_feed_flow_m3h * sys.feed_tds_mg_l;
    let mass_out = sys.permeate_flow_m3h * sys.permeate_tds_mg_l
        + sys.disposal_flow_m3h * sys.disposal_tds_mg_l;
    assert!(
        (mass_in - mass_out).abs() / mass_in < 0.02,
        "salt balance off: in {mass_in:.0}, out {mass_out:.0}"
    );

    for stage in &out.performance.stages {
        // stage flow closure
        let gap =
            (stage.feed_flow_m3h - stage.permeate_flow_m3h - stage.concentrate_flow_m3h).abs();
        assert!(gap / stage.feed_flow_m3h < 1e-3);

        // permeate depleted, concentrate enriched, rejections in [0, 1]
        for (ion, mg_f) in stage.feed_composition.iter() {
            assert!(stage.permeate_composition.get(ion) <= mg_f + 1e-9);
            assert!(stage.concentrate_composition.get(ion) >= mg_f - 1e-9);
            let r = stage.ion_rejection.get(&ion).copied().unwrap();
            assert!((0.0..=1.0).contains(&r), "rejection {r} for {ion:?}");
        }

        // electroneutrality of every produced water
        assert!(stage.feed_composition.charge_residual().abs() < 0.05);
        assert!(stage.permeate_composition.charge_residual().abs() < 0.05);
        assert!(stage.concentrate_composition.charge_residual().abs() < 0.05);
    }

    // LCOW contributions add up
    let lcow = &out.economics.lcow;
    let parts = lcow.capital_recovery_usd_m3
        + lcow.electricity_usd_m3
        + lcow.membrane_replacement_usd_m3
        + lcow.chemicals_usd_m3
        + lcow.fixed_om_usd_m3;
    assert!((parts - lcow.total_usd_m3).abs() / lcow.total_usd_m3 < 0.01);
    assert!(out.economics.capital_recovery_factor > 0.0);
}

#[test]
fn brackish_75_percent_energy_and_cost_land_in_band() {
    let configs = optimize(100.0, 0.75, "BW30_PRO_400");
    let config = configs
        .iter()
        .find(|c| c.stages.len() == 2)
        .expect("2-stage option")
        .clone();
    let out = simulate(config, "BW30_PRO_400", brackish_feed(), Some(3000.0));
    check_invariants(&out);

    let sec = out.performance.system.specific_energy_kwh_m3;
    assert!((0.5..=2.0).contains(&sec), "SEC {sec} kWh/m3");
    let lcow = out.economics.lcow.total_usd_m3;
    assert!((0.15..=0.35).contains(&lcow), "LCOW {lcow} $/m3");
    assert!(out.performance.system.permeate_tds_mg_l < 200.0);
}

#[test]
fn seawater_45_percent_runs_hot_and_tight() {
    let configs = optimize(50.0, 0.45, "SW30HRLE_440");
    let config = configs[0].clone();
    assert_eq!(config.stages.len(), 1);
    let out = simulate(config, "SW30HRLE_440", seawater_feed(), Some(35_000.0));
    check_invariants(&out);

    let p_bar = out.performance.stages[0].feed_pressure_pa / 1e5;
    assert!((55.0..=75.0).contains(&p_bar), "feed pressure {p_bar} bar");
    let sec = out.performance.system.specific_energy_kwh_m3;
    assert!((3.0..=6.0).contains(&sec), "SEC {sec} kWh/m3");
    for (_, r) in &out.performance.stages[0].ion_rejection {
        assert!(*r >= 0.98, "seawater rejection {r}");
    }
}

#[test]
fn recycle_reporting_stays_on_the_fresh_feed_basis() {
    let configs = optimize(100.0, 0.85, "BW30_PRO_400");
    let config = configs[0].clone();
    assert!(config.recycle.is_some());
    let out = simulate(config, "BW30_PRO_400", brackish_feed(), Some(3000.0));
    check_invariants(&out);

    let sys = &out.performance.system;
    assert!((sys.system_feed_flow_m3h - 100.0).abs() < 1e-9);
    assert!((sys.disposal_flow_m3h - 15.0).abs() < 1.0);

    assert!(
        sys.system_recovery > 0.84 && sys.system_recovery < 0.87,
        "recovery {} reported off the fresh-feed basis",
        sys.system_recovery
    );
    let blended = out.performance.stages[0].feed_flow_m3h;
    assert!(blended > 100.0, "stage-1 feed should be blended");

    // disposal is concentrated several-fold over the feed
    assert!(sys.disposal_tds_mg_l > 3.0 * sys.feed_tds_mg_l);

    // markedly higher pressure than the 75% no-recycle case
    let max_p = |o: &rodesign_rs::SimulationOutput| {
        o.performance
            .stages
            .iter()
            .map(|s| s.feed_pressure_pa)
            .fold(0.0, f64::max)
    };
    let cfg75 = optimize(100.0, 0.75, "BW30_PRO_400")
        .iter()
        .find(|c| c.stages.len() == 2)
        .unwrap()
        .clone();
    let out75 = simulate(cfg75, "BW30_PRO_400", brackish_feed(), Some(3000.0));
    assert!(max_p(&out) > max_p(&out75));
}

/// The historical regression: with a heavy recycle, dividing permeate by
/// the blended stage-1 feed understates recovery drastically. The reported
/// number must stay on the fresh-feed basis.
#[test]
fn blended_feed_is_never_the_recovery_denominator() {
    let configs = optimize(100.0, 0.85, "BW30_PRO_400");
    let config = configs
        .iter()
        .max_by(|a, b| {
            let ra = a.recycle.as_ref().map(|r| r.recycle_ratio).unwrap_or(0.0);
            let rb = b.recycle.as_ref().map(|r| r.recycle_ratio).unwrap_or(0.0);
            ra.total_cmp(&rb)
        })
        .unwrap()
        .clone();
    assert!(config.recycle.as_ref().unwrap().recycle_ratio >= 0.3);
    let out = simulate(config, "BW30_PRO_400", brackish_feed(), Some(3000.0));
    let sys = &out.performance.system;
    let blended = out.performance.stages[0].feed_flow_m3h;
    let wrong_basis = sys.permeate_flow_m3h / blended;
    assert!(sys.system_recovery > 0.84);
    assert!(
        wrong_basis < sys.system_recovery - 0.05,
        "blended-basis recovery {wrong_basis} would mask the real {}",
        sys.system_recovery
    );
}

#[test]
fn half_recycle_configuration_passes_all_invariants() {
    let configs = optimize(100.0, 0.85, "BW30_PRO_400");
    let config = configs
        .iter()
        .find(|c| {
            c.recycle
                .as_ref()
                .is_some_and(|r| (r.recycle_ratio - 0.5).abs() < 0.01)
        })
        .expect("a 0.5 recycle-ratio option")
        .clone();
    let out = simulate(config, "BW30_PRO_400", brackish_feed(), Some(3000.0));
    check_invariants(&out);
    let r = out.performance.configuration.recycle.as_ref().unwrap();
    assert!((r.recycle_ratio - 0.5).abs() < 0.01);
}

/// A recycle record with ratio zero must behave exactly like the same
/// array with no recycle record at all.
#[test]
fn zero_recycle_is_equivalent_to_no_recycle() {
    let configs = optimize(100.0, 0.75, "BW30_PRO_400");
    let plain = configs
        .iter()
        .find(|c| c.stages.len() == 2)
        .unwrap()
        .clone();

    let mut with_null_recycle = plain.clone();
    with_null_recycle.recycle = Some(rodesign_rs::RecycleInfo {
        recycle_flow_m3h: 0.0,
        recycle_ratio: 0.0,
        disposal_flow_m3h: plain.stages.last().unwrap().concentrate_flow_m3h,
        disposal_tds_mg_l: None,
    });

    let a = simulate(plain, "BW30_PRO_400", brackish_feed(), Some(3000.0));
    let b = simulate(
        with_null_recycle,
        "BW30_PRO_400",
        brackish_feed(),
        Some(3000.0),
    );
    let s1a = &a.performance.stages[0];
    let s1b = &b.performance.stages[0];
    assert!((s1a.feed_pressure_pa - s1b.feed_pressure_pa).abs() < 1.0);
    assert!((s1a.permeate_tds_mg_l - s1b.permeate_tds_mg_l).abs() < 0.1);
    assert!(
        (a.performance.system.system_recovery - b.performance.system.system_recovery).abs() < 1e-6
    );
}

#[test]
fn membrane_at_its_exact_pressure_limit_solves() {
    let configs = optimize(100.0, 0.75, "BW30_PRO_400");
    let config = configs
        .iter()
        .find(|c| c.stages.len() == 2)
        .unwrap()
        .clone();
    let engine = EquilibriumModel::new();
    let feed = rodesign_rs::WaterComposition::validate(&brackish_feed(), Some(3000.0)).unwrap();
    let base = membranes::lookup("BW30_PRO_400").unwrap();
    let assumptions = performance::OperatingAssumptions {
        pump_efficiency: 0.8,
        erd_efficiency: None,
    };

    let probe = performance::simulate(
        &config,
        base,
        &feed,
        7.5,
        25.0,
        &engine,
        &assumptions,
        Deadline::none(),
    )
    .unwrap();
    let max_p = probe
        .stages
        .iter()
        .map(|s| s.feed_pressure_pa)
        .fold(0.0, f64::max);

    let mut at_limit = *base;
    at_limit.max_pressure_pa = max_p;
    assert!(
        performance::simulate(
            &config,
            &at_limit,
            &feed,
            7.5,
            25.0,
            &engine,
            &assumptions,
            Deadline::none(),
        )
        .is_ok()
    );

    let mut below_limit = *base;
    below_limit.max_pressure_pa = max_p - 1.0;
    let err = performance::simulate(
        &config,
        &below_limit,
        &feed,
        7.5,
        25.0,
        &engine,
        &assumptions,
        Deadline::none(),
    );
    assert!(matches!(err, Err(RoError::PressureLimitExceeded { .. })));
}

#[test]
fn osmotically_impossible_operating_point_is_flux_out_of_range() {
    // 90% recovery in one seawater stage: the concentrate-end osmotic
    // pressure overwhelms any feasible applied pressure.
    let configs = optimize(50.0, 0.45, "SW30HRLE_440");
    let mut config = configs[0].clone();
    let s = &mut config.stages[0];
    s.permeate_flow_m3h = 45.0;
    s.concentrate_flow_m3h = 5.0;
    s.achieved_flux_lmh = s.permeate_flow_m3h * 1000.0 / s.membrane_area_m2;
    config.system_recovery = 0.9;

    let engine = EquilibriumModel::new();
    let req = SimulateRequest {
        configuration: config,
        membrane_model: "SW30HRLE_440".into(),
        feed_ion_composition: seawater_feed(),
        feed_salinity_ppm: None,
        feed_temperature_c: 25.0,
        feed_ph: 7.5,
        economic_params: None,
        chemical_dosing: None,
    };
    let err = simulate_ro_system(&req, &engine, Deadline::none());
    assert!(matches!(err, Err(RoError::FluxOutOfRange { .. })));
}

#[test]
fn energy_recovery_device_lowers_specific_energy() {
    let configs = optimize(50.0, 0.45, "SW30HRLE_440");
    let config = configs[0].clone();
    let engine = EquilibriumModel::new();

    let base = SimulateRequest {
        configuration: config,
        membrane_model: "SW30HRLE_440".into(),
        feed_ion_composition: seawater_feed(),
        feed_salinity_ppm: Some(35_000.0),
        feed_temperature_c: 25.0,
        feed_ph: 7.5,
        economic_params: None,
        chemical_dosing: None,
    };
    let without = simulate_ro_system(&base, &engine, Deadline::none()).unwrap();

    let mut with_erd = base.clone();
    let mut params = rodesign_rs::get_defaults(Some("SW30HRLE_440"))
        .unwrap()
        .economic_params;
    assert!(params.erd.enabled);
    with_erd.economic_params = Some(params);
    let with = simulate_ro_system(&with_erd, &engine, Deadline::none()).unwrap();

    assert!(
        with.performance.system.specific_energy_kwh_m3
            < without.performance.system.specific_energy_kwh_m3
    );
    assert!(with.economics.capital.erd_cost_usd > 0.0);
}

#[test]
fn warmer_feed_needs_less_pressure() {
    let configs = optimize(100.0, 0.75, "BW30_PRO_400");
    let config = configs
        .iter()
        .find(|c| c.stages.len() == 2)
        .unwrap()
        .clone();
    let engine = EquilibriumModel::new();
    let at = |t: f64| {
        let req = SimulateRequest {
            configuration: config.clone(),
            membrane_model: "BW30_PRO_400".into(),
            feed_ion_composition: brackish_feed(),
            feed_salinity_ppm: None,
            feed_temperature_c: t,
            feed_ph: 7.5,
            economic_params: None,
            chemical_dosing: None,
        };
        simulate_ro_system(&req, &engine, Deadline::none())
            .unwrap()
            .performance
            .stages[0]
            .feed_pressure_pa
    };
    assert!(at(30.0) < at(20.0));
}
