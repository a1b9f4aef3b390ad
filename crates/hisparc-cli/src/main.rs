mod config;

use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;

use hisparc_core::analysis::{CoreDistancePoint, EfficiencyPoint};
use hisparc_core::batch::{default_plan, RunSummary};
use hisparc_core::event::ShowerEvent;
use hisparc_core::spectrum::SpectrumFit;
use hisparc_core::{
    do_full_reconstruction, reconstruct_angle_dt, reconstruction_efficiency, ErrorModel,
    FullReconstruction, PulseStore, ReconstructionStore, ShowerStore, SpectrumFitter,
    UncertaintyAnalysis, UncertaintyCurve,
};
use hisparc_store::SqliteStore;

use crate::config::Config;

#[derive(Parser)]
#[command(
    name = "hisparc",
    version,
    about = "Shower direction reconstruction for HiSPARC detector stations"
)]
struct Cli {
    /// Path to the SQLite dataset
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full reconstruction plan into a reconstruction table
    Reconstruct {
        /// Reconstruction table name (default from config)
        #[arg(short, long)]
        name: Option<String>,

        /// Replace an existing table
        #[arg(long)]
        recompute: bool,

        /// Seed of the dither RNG
        #[arg(long)]
        seed: Option<u64>,

        /// Minimum particle count on stations 1, 3 and 4
        #[arg(short = 'D', long)]
        min_density: Option<u16>,

        /// Only the first N events of each shower
        #[arg(long)]
        limit: Option<usize>,

        #[arg(long)]
        json: bool,
    },

    /// Reconstruct one direction from two arrival-time differences
    Direction {
        /// t1 - t3 in ns
        #[arg(long, allow_hyphen_values = true)]
        dt1: f64,

        /// t1 - t4 in ns
        #[arg(long, allow_hyphen_values = true)]
        dt2: f64,

        /// Station size in meters
        #[arg(long, default_value_t = 10.0)]
        size: f64,

        #[arg(long)]
        json: bool,
    },

    /// Measured and expected angle uncertainties of a reconstruction table
    Uncertainty {
        #[arg(short, long)]
        name: Option<String>,

        #[arg(long)]
        json: bool,
    },

    /// Reconstruction efficiency against core distance
    Efficiency {
        /// Simulation group, e.g. zenith_22_5
        #[arg(short, long)]
        simulation: String,

        /// Minimum particle count on stations 1, 3 and 4
        #[arg(short = 'N', long, default_value_t = 1)]
        min_particles: u16,

        #[arg(long)]
        json: bool,
    },

    /// Fit the pulse-height spectrum of a station
    FitSpectrum {
        /// Station id (default from config)
        #[arg(long)]
        station: Option<u32>,

        #[arg(long)]
        json: bool,
    },

    /// Import simulated events, one JSON object per line
    ImportEvents {
        #[arg(short, long)]
        simulation: String,

        /// Shower name within the simulation group
        #[arg(long)]
        shower: String,

        file: PathBuf,
    },

    /// Import pulse integrals, one value per line
    ImportIntegrals {
        #[arg(long)]
        station: u32,

        file: PathBuf,
    },

    /// List simulation groups and reconstruction tables
    Simulations,

    /// Show the active configuration
    Config,
}

fn default_db_path() -> PathBuf {
    directories::ProjectDirs::from("nl", "hisparc", "hisparc")
        .map(|dirs| dirs.data_dir().join("master.db"))
        .unwrap_or_else(|| PathBuf::from("master.db"))
}

fn open_store(db: Option<PathBuf>, cfg: &Config) -> Result<SqliteStore> {
    let path = db
        .or_else(|| cfg.store.path.as_ref().map(PathBuf::from))
        .unwrap_or_else(default_db_path);
    SqliteStore::new(&path).context("failed to open dataset")
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::WARN.into()),
        )
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config()?;

    let db = cli.db;
    let store = || open_store(db.clone(), &cfg);

    match cli.command {
        Commands::Reconstruct {
            name,
            recompute,
            seed,
            min_density,
            limit,
            json,
        } => cmd_reconstruct(
            &store()?,
            &cfg,
            name.as_deref(),
            recompute,
            seed,
            min_density,
            limit,
            json,
        ),
        Commands::Direction {
            dt1,
            dt2,
            size,
            json,
        } => cmd_direction(&cfg, dt1, dt2, size, json),
        Commands::Uncertainty { name, json } => {
            cmd_uncertainty(&store()?, &cfg, name.as_deref(), json)
        }
        Commands::Efficiency {
            simulation,
            min_particles,
            json,
        } => cmd_efficiency(&store()?, &simulation, min_particles, json),
        Commands::FitSpectrum { station, json } => {
            cmd_fit_spectrum(&store()?, &cfg, station, json)
        }
        Commands::ImportEvents {
            simulation,
            shower,
            file,
        } => cmd_import_events(&store()?, &simulation, &shower, &file),
        Commands::ImportIntegrals { station, file } => {
            cmd_import_integrals(&store()?, station, &file)
        }
        Commands::Simulations => cmd_simulations(&store()?),
        Commands::Config => cmd_config(&cfg),
    }
}

// ---------------------------------------------------------------------------
// Reconstruction
// ---------------------------------------------------------------------------

#[allow(clippy::too_many_arguments)]
fn cmd_reconstruct(
    store: &SqliteStore,
    cfg: &Config,
    name: Option<&str>,
    recompute: bool,
    seed: Option<u64>,
    min_density: Option<u16>,
    limit: Option<usize>,
    json: bool,
) -> Result<()> {
    let name = name.unwrap_or(&cfg.reconstruction.name);
    let layout = cfg.detectors.layout()?;
    let mut plan = default_plan(min_density.unwrap_or(cfg.reconstruction.min_density));
    if let Some(limit) = limit {
        plan = plan.into_iter().map(|run| run.with_limit(limit)).collect();
    }

    let mut rng = match seed.or(cfg.reconstruction.seed) {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };

    let result = do_full_reconstruction(store, name, &plan, &layout, recompute, &mut rng)
        .with_context(|| format!("reconstruction '{name}' failed"))?;

    let summaries = match result {
        FullReconstruction::Skipped => {
            println!("Reconstruction '{name}' exists; use --recompute to replace it.");
            return Ok(());
        }
        FullReconstruction::Completed(summaries) => summaries,
    };

    if json {
        return print_json(&summaries);
    }
    print_run_table(&plan, &summaries);
    println!();
    println!(
        "Reconstruction '{name}': {} events recorded.",
        store.count_events(name)?
    );
    Ok(())
}

fn print_run_table(plan: &[hisparc_core::ReconstructionRun], summaries: &[RunSummary]) {
    println!(
        "{:<22} {:>6} {:>5} {:>4} {:>8} {:>9} {:>8} {:>8}",
        "Simulation", "Zenith", "Bin", "Dith", "Events", "Passed", "Recorded", "Dropped"
    );
    println!("{}", "-".repeat(78));
    for (run, s) in plan.iter().zip(summaries) {
        let (bin, dither) = run
            .binning
            .map_or((0.0, false), |b| (b.width, b.randomize));
        println!(
            "{:<22} {:>6.1} {:>5.1} {:>4} {:>8} {:>9} {:>8} {:>8}",
            s.simulation,
            run.zenith.to_degrees(),
            bin,
            if dither { "yes" } else { "no" },
            s.events,
            s.passed_cut,
            s.recorded,
            s.dropped_invalid()
        );
    }
}

fn cmd_direction(cfg: &Config, dt1: f64, dt2: f64, size: f64, json: bool) -> Result<()> {
    let geometry = cfg.detectors.layout()?.geometry(size)?;
    let direction = reconstruct_angle_dt(dt1, dt2, &geometry);

    if json {
        return print_json(&serde_json::json!({
            "theta": direction.theta,
            "phi": direction.phi,
            "valid": direction.is_valid(),
        }));
    }
    if !direction.is_valid() {
        println!("No valid direction for dt1={dt1} ns, dt2={dt2} ns.");
        return Ok(());
    }
    println!(
        "theta = {:.4} rad ({:.2} deg)",
        direction.theta,
        direction.theta.to_degrees()
    );
    println!(
        "phi   = {:.4} rad ({:.2} deg)",
        direction.phi,
        direction.phi.to_degrees()
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// Analyses
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct UncertaintyReport {
    curves: Vec<UncertaintyCurve>,
    core_distances: Vec<CoreDistancePoint>,
}

fn cmd_uncertainty(
    store: &SqliteStore,
    cfg: &Config,
    name: Option<&str>,
    json: bool,
) -> Result<()> {
    let name = name.unwrap_or(&cfg.reconstruction.name);
    if !store.has_reconstruction(name)? {
        bail!("no reconstruction '{name}'; run `hisparc reconstruct` first");
    }

    let geometry = cfg.detectors.layout()?.geometry(10.0)?;
    let model = ErrorModel::new(cfg.reconstruction.timing_error);
    let analysis = UncertaintyAnalysis::new(store, name, geometry, model);

    let report = UncertaintyReport {
        curves: vec![
            analysis.vs_density()?,
            analysis.vs_zenith()?,
            analysis.vs_size()?,
            analysis.vs_bin_size()?,
        ],
        core_distances: analysis.core_distances()?,
    };

    if json {
        return print_json(&report);
    }
    for curve in &report.curves {
        print_curve(curve);
        println!();
    }
    print_core_distances(&report.core_distances);
    Ok(())
}

fn print_curve(curve: &UncertaintyCurve) {
    // Zenith settings are in radians; show degrees.
    let scale = if curve.parameter == "zenith" {
        180.0 / std::f64::consts::PI
    } else {
        1.0
    };

    println!("Uncertainty vs {}", curve.parameter);
    println!(
        "{:>10} {:>8} {:>12} {:>12} {:>12} {:>12}",
        "Value", "Events", "Theta (deg)", "Phi (deg)", "Exp. theta", "Exp. phi"
    );
    println!("{}", "-".repeat(72));
    for m in &curve.measured {
        let expected = curve
            .estimate
            .iter()
            .min_by(|a, b| (a.x - m.x).abs().total_cmp(&(b.x - m.x).abs()));
        let (et, ep) = expected.map_or((f64::NAN, f64::NAN), |e| (e.theta, e.phi));
        println!(
            "{:>10.2} {:>8} {:>12.3} {:>12.3} {:>12.3} {:>12.3}",
            m.x * scale,
            m.count,
            m.theta_std.to_degrees(),
            m.phi_std.to_degrees(),
            et.to_degrees(),
            ep.to_degrees()
        );
    }
}

fn print_core_distances(points: &[CoreDistancePoint]) {
    println!("Core distances at zenith 22.5 deg");
    println!("{:>4} {:>8} {:>10} {:>10}", "D", "Events", "Mean (m)", "Std (m)");
    println!("{}", "-".repeat(35));
    for p in points {
        println!(
            "{:>4} {:>8} {:>10.2} {:>10.2}",
            p.density, p.count, p.mean, p.std
        );
    }
}

fn cmd_efficiency(
    store: &SqliteStore,
    simulation: &str,
    min_particles: u16,
    json: bool,
) -> Result<()> {
    if store.list_showers(simulation)?.is_empty() {
        bail!("no showers in simulation '{simulation}'");
    }
    let points: Vec<EfficiencyPoint> =
        reconstruction_efficiency(store, simulation, min_particles)?;

    if json {
        return print_json(&points);
    }
    println!("Efficiency for {simulation}, N >= {min_particles}");
    println!("{:>16} {:>10}", "Core dist. (m)", "Efficiency");
    println!("{}", "-".repeat(27));
    for p in &points {
        println!("{:>7.1} - {:>6.1} {:>10.3}", p.r_lo, p.r_hi, p.efficiency);
    }
    Ok(())
}

fn cmd_fit_spectrum(
    store: &SqliteStore,
    cfg: &Config,
    station: Option<u32>,
    json: bool,
) -> Result<()> {
    let station = station.unwrap_or(cfg.spectrum.station);
    let integrals = store.pulse_integrals(station)?;
    if integrals.is_empty() {
        tracing::warn!(station, "no pulse integrals");
        bail!("no pulse integrals for station {station}");
    }

    let fitter = SpectrumFitter::new(cfg.spectrum.options());
    let fit: SpectrumFit = fitter
        .fit_integrals(&integrals)
        .with_context(|| format!("spectrum fit for station {station} failed"))?;

    if json {
        return print_json(&fit);
    }
    println!("Station {station}: {} pulse integrals", integrals.len());
    println!();
    println!("Power law    N = {:.4e}", fit.power_law.n);
    println!("             a = {:.4}", fit.power_law.a);
    println!("Landau       count_scale = {:.4e}", fit.landau.count_scale);
    println!("             mev_scale   = {:.4e} MeV/ADC", fit.landau.mev_scale);
    println!("             gauss_scale = {:.4} MeV", fit.landau.gauss_scale);
    println!("MIP peak     {:.0} ADC", fit.landau.mip_peak());
    println!(
        "Residual     {:.4e} ({} evaluations{})",
        fit.residual,
        fit.evaluations,
        if fit.converged { "" } else { ", not converged" }
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// Import and listing
// ---------------------------------------------------------------------------

fn cmd_import_events(
    store: &SqliteStore,
    simulation: &str,
    shower: &str,
    file: &Path,
) -> Result<()> {
    let reader = BufReader::new(
        std::fs::File::open(file).with_context(|| format!("opening {}", file.display()))?,
    );

    let mut observables = Vec::new();
    let mut coincidences = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("reading {}", file.display()))?;
        if line.trim().is_empty() {
            continue;
        }
        let event: ShowerEvent = serde_json::from_str(&line)
            .with_context(|| format!("{}:{}: invalid event", file.display(), i + 1))?;
        observables.push(event.observable);
        coincidences.push(event.coincidence);
    }

    store
        .import_shower(simulation, shower, &observables, &coincidences)
        .with_context(|| format!("importing shower {simulation}/{shower}"))?;
    println!(
        "Imported {} events into {simulation}/{shower}.",
        observables.len()
    );
    Ok(())
}

fn cmd_import_integrals(store: &SqliteStore, station: u32, file: &Path) -> Result<()> {
    let content =
        std::fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))?;
    let mut integrals = Vec::new();
    for (i, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let value: f64 = line
            .parse()
            .with_context(|| format!("{}:{}: invalid pulse integral", file.display(), i + 1))?;
        integrals.push(value);
    }

    let n = store.insert_pulse_integrals(station, &integrals)?;
    println!("Imported {n} pulse integrals for station {station}.");
    Ok(())
}

fn cmd_simulations(store: &SqliteStore) -> Result<()> {
    let simulations = store.list_simulations()?;
    if simulations.is_empty() {
        println!("No simulations yet.");
    } else {
        println!("{:<30} Showers", "Simulation");
        println!("{}", "-".repeat(40));
        for (simulation, count) in &simulations {
            println!("{simulation:<30} {count}");
        }
    }

    let reconstructions = store.list_reconstructions()?;
    if !reconstructions.is_empty() {
        println!();
        println!("{:<20} {:>8}  Created", "Reconstruction", "Events");
        println!("{}", "-".repeat(50));
        for r in &reconstructions {
            println!(
                "{:<20} {:>8}  {}",
                r.name,
                store.count_events(&r.name)?,
                r.created_at.format("%Y-%m-%d %H:%M")
            );
        }
    }
    Ok(())
}

fn cmd_config(cfg: &Config) -> Result<()> {
    println!("Config: {}", config::show_config_path());
    println!();
    println!("[store]");
    println!(
        "  path = {}",
        cfg.store
            .path
            .as_deref()
            .unwrap_or("(default platform path)")
    );
    println!();
    println!("[reconstruction]");
    println!("  name = {}", cfg.reconstruction.name);
    println!("  timing_error = {}", cfg.reconstruction.timing_error);
    println!("  min_density = {}", cfg.reconstruction.min_density);
    if let Some(seed) = cfg.reconstruction.seed {
        println!("  seed = {seed}");
    }
    println!();
    println!("[detectors]");
    for (i, [x, y]) in cfg.detectors.stations.iter().enumerate() {
        println!("  station {} = ({x}, {y})", i + 1);
    }
    println!();
    println!("[spectrum]");
    println!("  range_max = {}", cfg.spectrum.range_max);
    println!("  n_bins = {}", cfg.spectrum.n_bins);
    println!("  station = {}", cfg.spectrum.station);
    println!("  max_evaluations = {}", cfg.spectrum.max_evaluations);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use std::io::Write;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_direction_negative_times() {
        let cli = Cli::try_parse_from(["hisparc", "direction", "--dt1", "-3.5", "--dt2", "2"])
            .unwrap();
        match cli.command {
            Commands::Direction { dt1, dt2, size, .. } => {
                assert_eq!(dt1, -3.5);
                assert_eq!(dt2, 2.0);
                assert_eq!(size, 10.0);
            }
            _ => panic!("expected direction command"),
        }
    }

    #[test]
    fn test_import_events_and_integrals() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::new(&dir.path().join("master.db")).unwrap();

        let events = dir.path().join("events.jsonl");
        let mut f = std::fs::File::create(&events).unwrap();
        for id in 0..3 {
            writeln!(
                f,
                r#"{{"observable": {{"id": {id}, "t": [10.0, 11.0, 12.0, 13.0], "n": [2, 1, 3, 4], "r": 20.0, "phi": 0.1, "alpha": 0.2}}, "coincidence": {{"id": {id}, "r": 20.0, "phi": 0.1, "alpha": 0.5}}}}"#
            )
            .unwrap();
        }
        writeln!(f).unwrap();
        drop(f);

        cmd_import_events(&store, "zenith_22_5", "shower_0", &events).unwrap();
        let showers = store.list_showers("zenith_22_5").unwrap();
        assert_eq!(showers.len(), 1);
        let observables = store.observables(showers[0].id, None).unwrap();
        assert_eq!(observables.len(), 3);
        assert_eq!(observables[2].n, [2, 1, 3, 4]);
        assert_eq!(store.coincidences(showers[0].id, None).unwrap()[1].alpha, 0.5);

        let integrals = dir.path().join("integrals.txt");
        std::fs::write(&integrals, "1200\n5000.5\n\n4800\n").unwrap();
        cmd_import_integrals(&store, 601, &integrals).unwrap();
        assert_eq!(store.pulse_integrals(601).unwrap(), vec![1200.0, 5000.5, 4800.0]);
    }

    #[test]
    fn test_import_rejects_bad_line() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::in_memory().unwrap();
        let integrals = dir.path().join("integrals.txt");
        std::fs::write(&integrals, "1200\nnot-a-number\n").unwrap();
        let err = cmd_import_integrals(&store, 601, &integrals).unwrap_err();
        assert!(format!("{err:#}").contains(":2:"));
        assert!(store.pulse_integrals(601).unwrap().is_empty());
    }

    #[test]
    fn test_reconstruct_then_skip() {
        let store = SqliteStore::in_memory().unwrap();
        let cfg = Config::default();
        cmd_reconstruct(&store, &cfg, Some("full"), false, Some(1), None, None, false).unwrap();
        assert!(store.has_reconstruction("full").unwrap());
        // Second run without --recompute leaves the table alone.
        cmd_reconstruct(&store, &cfg, Some("full"), false, Some(1), None, None, true).unwrap();
        assert_eq!(store.list_reconstructions().unwrap().len(), 1);
    }
}
