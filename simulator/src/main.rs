use anyhow::Context;
use clap::Parser;
use pingercore::AzimuthReport;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use tokio::runtime::Builder as TokioBuilder;
use tokio::signal;
use workflow::config::WorkflowConfig;
use workflow::runner::{Runner, WorkflowResult};

mod generator;
mod workflow;

#[derive(Parser)]
#[command(author, version, about = "Simulated hydrophone driver for the pinger tracking core")]
struct Args {
    /// Load a workflow config from YAML
    #[arg(long)]
    workflow: Option<PathBuf>,
    /// Number of pulse periods to run; 0 runs until Ctrl+C
    #[arg(long)]
    cycles: Option<u64>,
    /// Pinger bearing from the sensor-1 axis [deg]
    #[arg(long)]
    bearing: Option<f64>,
    /// Horizontal range to the pinger [m]
    #[arg(long)]
    range: Option<f64>,
    /// Pinger depth below the array [m]
    #[arg(long)]
    depth: Option<f64>,
    #[arg(long)]
    noise: Option<f64>,
    #[arg(long)]
    seed: Option<u64>,
    /// Pace cycles in wall-clock time and stop on Ctrl+C
    #[arg(long, default_value_t = false)]
    realtime: bool,
    /// Emit reports and the final summary as JSON lines
    #[arg(long, default_value_t = false)]
    json: bool,
}

impl Args {
    fn apply(&self, config: &mut WorkflowConfig) {
        if let Some(cycles) = self.cycles {
            config.cycles = cycles;
        }
        if let Some(bearing) = self.bearing {
            config.scenario.bearing_deg = bearing;
        }
        if let Some(range) = self.range {
            config.scenario.horizontal_range = range;
        }
        if let Some(depth) = self.depth {
            config.scenario.depth = depth;
        }
        if let Some(noise) = self.noise {
            config.scenario.noise = noise;
        }
        if let Some(seed) = self.seed {
            config.scenario.seed = seed;
        }
    }
}

fn print_report(report: &AzimuthReport, json: bool) {
    if json {
        match serde_json::to_string(report) {
            Ok(line) => println!("{}", line),
            Err(err) => log::warn!("failed to serialize report {}: {}", report.cycle, err),
        }
    } else {
        println!(
            "cycle {:>5}  t={:>9.3}s  horizontal {:>7.2}° (raw {:>7.2}°)  v1 {:>7.2}°  v2 {:>7.2}°",
            report.cycle,
            report.timestamp,
            report.smoothed.horizontal,
            report.raw.horizontal,
            report.smoothed.vertical_one,
            report.smoothed.vertical_two
        );
    }
}

fn print_summary(result: &WorkflowResult, json: bool) -> anyhow::Result<()> {
    if json {
        let summary = serde_json::json!({
            "cycles": result.cycles_run,
            "locked": result.locked,
            "final_azimuth": result.final_azimuth,
            "final_gain": result.final_gain,
            "elapsed": result.elapsed,
            "metrics": result.metrics,
        });
        println!(
            "{}",
            serde_json::to_string(&summary).context("serializing run summary")?
        );
    } else {
        println!(
            "Run -> cycles {} ({:.1} s simulated), locked {}, reports {}, resyncs {}, degenerate {}, gain {:.3}",
            result.cycles_run,
            result.elapsed,
            result.locked,
            result.reports.len(),
            result.metrics.resyncs,
            result.metrics.degenerate,
            result.final_gain
        );
        if let Some(azimuth) = result.final_azimuth {
            println!(
                "Smoothed azimuth -> horizontal {:.2}°, vertical {:.2}° / {:.2}°",
                azimuth.horizontal, azimuth.vertical_one, azimuth.vertical_two
            );
        }
    }
    Ok(())
}

fn run_realtime(runner: Runner, json: bool) -> anyhow::Result<WorkflowResult> {
    let stop = Arc::new(AtomicBool::new(false));
    let (done_tx, done_rx) = mpsc::channel::<()>();

    let worker_stop = stop.clone();
    let worker = thread::spawn(move || {
        let result = runner.execute_until(&worker_stop, |report| print_report(report, json));
        let _ = done_tx.send(());
        result
    });

    log::info!("running in real time (Ctrl+C to stop)");
    let runtime = TokioBuilder::new_current_thread()
        .enable_all()
        .build()
        .context("creating runtime for signal handling")?;
    runtime.block_on(async {
        let finished = tokio::task::spawn_blocking(move || done_rx.recv());
        tokio::select! {
            _ = finished => {}
            interrupted = signal::ctrl_c() => {
                interrupted.context("awaiting Ctrl+C to exit")?;
                log::info!("stop requested, finishing current cycle");
                stop.store(true, Ordering::SeqCst);
            }
        }
        Ok::<(), anyhow::Error>(())
    })?;

    worker
        .join()
        .map_err(|_| anyhow::anyhow!("simulation worker panicked"))?
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut workflow_config = match &args.workflow {
        Some(path) => WorkflowConfig::load(path)?,
        None => WorkflowConfig::default(),
    };
    args.apply(&mut workflow_config);
    log::info!(
        "pinger at bearing {:.1}°, range {:.1} m, depth {:.1} m",
        workflow_config.scenario.bearing_deg,
        workflow_config.scenario.horizontal_range,
        workflow_config.scenario.depth
    );

    let runner = Runner::new(workflow_config).realtime(args.realtime);
    let result = if args.realtime {
        run_realtime(runner, args.json)?
    } else {
        runner.execute_until(&AtomicBool::new(false), |report| {
            print_report(report, args.json)
        })?
    };

    print_summary(&result, args.json)
}
