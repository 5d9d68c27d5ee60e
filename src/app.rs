use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use anyhow::Context;
use tracing::info;

use crate::cli::Args;
use crate::config::DriftConfig;
use crate::core::timebase::{Clock, ManualClock, Millis, SystemClock, sec_to_ms};
use crate::life::conductor::ConductorState;
use crate::life::ensemble::Ensemble;
use crate::life::synth::{RecordingSynth, SynthLog};

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub ticks: u64,
    pub performed_ms: Millis,
    pub triggers: BTreeMap<String, usize>,
    pub records: usize,
    pub final_state: ConductorState,
    pub interrupted: bool,
}

enum Driver {
    Offline(ManualClock),
    Realtime,
}

impl Driver {
    fn wait(&self, tick_ms: Millis) {
        match self {
            Driver::Offline(clock) => clock.advance(tick_ms),
            Driver::Realtime => thread::sleep(Duration::from_millis(tick_ms)),
        }
    }
}

/// Apply command-line overrides on top of the loaded config.
pub fn resolve_config(args: &Args) -> anyhow::Result<DriftConfig> {
    let mut cfg = DriftConfig::load_or_default(&args.config);
    if let Some(seed) = args.seed {
        cfg.run.seed = seed;
    }
    if let Some(duration) = args.duration {
        cfg.run.duration_sec = duration;
    }
    if let Some(tick_ms) = args.tick_ms {
        cfg.run.tick_ms = tick_ms;
    }
    cfg.validate().context("invalid configuration")?;
    Ok(cfg)
}

pub fn run(args: &Args, stop_flag: &Arc<AtomicBool>) -> anyhow::Result<RunSummary> {
    let cfg = resolve_config(args)?;
    let (driver, clock): (Driver, Rc<dyn Clock>) = if args.realtime {
        (Driver::Realtime, Rc::new(SystemClock))
    } else {
        let manual = ManualClock::new(0);
        (Driver::Offline(manual.clone()), Rc::new(manual))
    };

    let log = SynthLog::new();
    let summary = perform(&cfg, clock, &driver, &log, stop_flag)?;

    if let Some(path) = &args.json {
        write_log(&log, path).with_context(|| format!("failed to write command log to {path}"))?;
    }
    Ok(summary)
}

/// Drive one performance to completion, recording every synth command.
fn perform(
    cfg: &DriftConfig,
    clock: Rc<dyn Clock>,
    driver: &Driver,
    log: &SynthLog,
    stop_flag: &AtomicBool,
) -> anyhow::Result<RunSummary> {
    let synth_clock = clock.clone();
    let mut ensemble = Ensemble::from_config(cfg, clock.clone(), |name| {
        Box::new(RecordingSynth::new(name, synth_clock.clone(), log.clone()))
    })
    .context("failed to build ensemble")?;
    ensemble.init_all().context("failed to initialize agents")?;

    let start = clock.now_ms();
    let duration_ms = sec_to_ms(cfg.run.duration_sec);
    let tick_ms = cfg.run.tick_ms;
    ensemble.start();

    let mut triggers: BTreeMap<String, usize> = BTreeMap::new();
    let mut ticks = 0u64;
    let mut interrupted = false;
    while clock.now_ms().saturating_sub(start) < duration_ms {
        if stop_flag.load(Ordering::SeqCst) {
            interrupted = true;
            info!(target: "drift::ensemble", "interrupted");
            break;
        }
        driver.wait(tick_ms);
        let report = ensemble.tick().context("agent update failed")?;
        ticks += 1;
        for name in report.triggered {
            *triggers.entry(name).or_default() += 1;
        }
    }

    let final_state = ensemble.conductor().state();
    let performed_ms = clock.now_ms().saturating_sub(start);
    ensemble.dispose();

    let summary = RunSummary {
        ticks,
        performed_ms,
        triggers,
        records: log.len(),
        final_state,
        interrupted,
    };
    info!(
        target: "drift::ensemble",
        ticks = summary.ticks,
        performed_sec = performed_ms as f32 / 1000.0,
        records = summary.records,
        triggers = ?summary.triggers,
        phase = %final_state.phase,
        "performance finished"
    );
    Ok(summary)
}

fn write_log(log: &SynthLog, path: &str) -> io::Result<()> {
    if path == "-" {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        log.write_json_lines(&mut out)?;
        return out.flush();
    }
    let mut out = BufWriter::new(File::create(path)?);
    log.write_json_lines(&mut out)?;
    out.flush()
}
