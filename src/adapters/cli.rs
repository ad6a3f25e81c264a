use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;
use std::fs;
use std::io::{self, Read};
use std::time::Duration;

use crate::adapters::phreeqc::PhreeqcEngine;
use crate::api;
use crate::error::RoError;
use crate::models::{Deadline, OptimizeRequest, SimulateRequest};

#[derive(Parser, Debug)]
#[command(author, version, about = "RO train designer: optimize, simulate, defaults", long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Enumerate viable vessel-array configurations for a feed and target recovery
    Optimize(RequestArgs),
    /// Simulate a configuration's performance and levelized cost of water
    Simulate(RequestArgs),
    /// Print default economic and dosing parameters
    Defaults {
        #[arg(long, value_name = "MODEL")]
        membrane: Option<String>,
        #[arg(long)]
        json: bool,
    },
}

#[derive(clap::Args, Debug)]
pub struct RequestArgs {
    #[arg(long)]
    json: bool,
    #[arg(
        long,
        value_name = "FILE",
        help = "JSON request document; '-' reads from stdin"
    )]
    input: Option<String>,
    #[arg(
        long,
        value_name = "JSON",
        help = "Inline JSON request (overrides --input)"
    )]
    request_json: Option<String>,
    #[arg(long, value_name = "SECONDS", help = "Abort the computation after this long")]
    timeout: Option<f64>,
}

impl RequestArgs {
    fn deadline(&self) -> Deadline {
        match self.timeout {
            Some(s) if s > 0.0 => Deadline::within(Duration::from_secs_f64(s)),
            _ => Deadline::none(),
        }
    }
}

fn read_request<T: DeserializeOwned>(args: &RequestArgs) -> Result<T, RoError> {
    let doc = match (&args.request_json, &args.input) {
        (Some(inline), _) => inline.clone(),
        (None, Some(path)) if path == "-" => {
            let mut s = String::new();
            io::stdin()
                .read_to_string(&mut s)
                .map_err(|source| RoError::ReadStdin { source })?;
            s
        }
        (None, Some(path)) => fs::read_to_string(path).map_err(|source| RoError::ReadFile {
            path: path.clone(),
            source,
        })?,
        (None, None) => return Err(RoError::MissingInputData),
    };
    serde_json::from_str(&doc).map_err(|source| RoError::ParseRequestJson { source })
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), RoError> {
    let s = serde_json::to_string_pretty(value)
        .map_err(|source| RoError::SerializeOutput { source })?;
    println!("{}", s);
    Ok(())
}

pub fn dispatch(args: &Args) -> Result<(), RoError> {
    match &args.command {
        Command::Optimize(req_args) => {
            let req: OptimizeRequest = read_request(req_args)?;
            let engine = req.feed_ion_composition.as_ref().map(|_| PhreeqcEngine::from_env());
            let configs = api::optimize_ro_configuration(
                &req,
                engine
                    .as_ref()
                    .map(|e| e as &dyn crate::chemistry::engine::ChemistryEngine),
                req_args.deadline(),
            )?;
            if req_args.json {
                print_json(&configs)?;
            } else {
                for c in &configs {
                    let vessels: Vec<u32> = c.stages.iter().map(|s| s.vessel_count).collect();
                    let recycle = match &c.recycle {
                        Some(r) => format!(
                            ", recycle {:.0}% ({:.1} m3/h), disposal {:.1} m3/h",
                            r.recycle_ratio * 100.0,
                            r.recycle_flow_m3h,
                            r.disposal_flow_m3h
                        ),
                        None => String::new(),
                    };
                    println!(
                        "{}-stage {:?}: recovery {:.1}%{}{}",
                        c.stages.len(),
                        vessels,
                        c.system_recovery * 100.0,
                        recycle,
                        if c.warnings.is_empty() { "" } else { " [warnings]" }
                    );
                }
            }
            Ok(())
        }
        Command::Simulate(req_args) => {
            let req: SimulateRequest = read_request(req_args)?;
            let engine = PhreeqcEngine::from_env();
            let out = api::simulate_ro_system(&req, &engine, req_args.deadline())?;
            if req_args.json {
                print_json(&out)?;
            } else {
                let sys = &out.performance.system;
                println!("Recovery: {:.1}%", sys.system_recovery * 100.0);
                println!("Permeate: {:.1} m3/h at {:.0} mg/L", sys.permeate_flow_m3h, sys.permeate_tds_mg_l);
                println!(
                    "Disposal: {:.1} m3/h at {:.0} mg/L",
                    sys.disposal_flow_m3h, sys.disposal_tds_mg_l
                );
                println!("SEC: {:.2} kWh/m3", sys.specific_energy_kwh_m3);
                for stage in &out.performance.stages {
                    println!(
                        "  stage {}: {:.1} bar, flux {:.1} LMH, pump {:.1} kW",
                        stage.stage,
                        stage.feed_pressure_pa / 1e5,
                        stage.observed_flux_lmh,
                        stage.pump_power_kw
                    );
                }
                println!("LCOW: {:.3} $/m3", out.economics.lcow.total_usd_m3);
            }
            Ok(())
        }
        Command::Defaults { membrane, json } => {
            let defaults = api::get_defaults(membrane.as_deref())?;
            if *json {
                print_json(&defaults)?;
            } else {
                println!(
                    "Membrane cost: {:.0} $/m2",
                    defaults.economic_params.membrane_cost_usd_m2
                );
                println!("Electricity: {:.3} $/kWh", defaults.economic_params.electricity_price_usd_kwh);
                println!("WACC: {:.1}%", defaults.economic_params.wacc * 100.0);
                println!(
                    "ERD: {}",
                    if defaults.economic_params.erd.enabled { "enabled" } else { "disabled" }
                );
                println!(
                    "Antiscalant: {:.1} mg/L at {:.2} $/kg",
                    defaults.chemical_dosing.antiscalant_dose_mg_l,
                    defaults.chemical_dosing.antiscalant_price_usd_kg
                );
            }
            Ok(())
        }
    }
}
