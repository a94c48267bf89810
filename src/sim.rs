//! Run drivers: a single plant, a plant operation, and a benchmark sweep.

use std::thread;
use std::time::{Duration, Instant};

use tracing::info;

use crate::cluster::Cluster;
use crate::config::{PlantConfig, PollStrategy, ShutdownPolicy};
use crate::error::Result;
use crate::plant::Plant;
use crate::stats::PlantStats;

/// Settings shared by every run mode.
#[derive(Clone, Copy, Debug)]
pub struct RunSettings {
    pub config: PlantConfig,
    pub duration: Duration,
}

/// Best-effort CPU user/system time snapshot (seconds) on Unix platforms.
#[cfg(unix)]
fn cpu_times_seconds() -> Option<(f64, f64)> {
    use libc::{RUSAGE_SELF, getrusage, rusage};
    let mut usage = rusage {
        ru_utime: libc::timeval {
            tv_sec: 0,
            tv_usec: 0,
        },
        ru_stime: libc::timeval {
            tv_sec: 0,
            tv_usec: 0,
        },
        ru_maxrss: 0,
        ru_ixrss: 0,
        ru_idrss: 0,
        ru_isrss: 0,
        ru_minflt: 0,
        ru_majflt: 0,
        ru_nswap: 0,
        ru_inblock: 0,
        ru_oublock: 0,
        ru_msgsnd: 0,
        ru_msgrcv: 0,
        ru_nsignals: 0,
        ru_nvcsw: 0,
        ru_nivcsw: 0,
    };
    let rc = unsafe { getrusage(RUSAGE_SELF, &mut usage) };
    if rc != 0 {
        return None;
    }
    let user = usage.ru_utime.tv_sec as f64 + (usage.ru_utime.tv_usec as f64 / 1_000_000.0);
    let sys = usage.ru_stime.tv_sec as f64 + (usage.ru_stime.tv_usec as f64 / 1_000_000.0);
    Some((user, sys))
}

/// Stub on non-Unix platforms.
#[cfg(not(unix))]
fn cpu_times_seconds() -> Option<(f64, f64)> {
    None
}

fn format_cpu(value: Option<f64>) -> String {
    value
        .map(|v| format!("{v:.4}"))
        .unwrap_or_else(|| "NA".to_string())
}

fn poll_label(poll: PollStrategy) -> String {
    match poll {
        PollStrategy::Spin => "spin".to_string(),
        PollStrategy::Wait(timeout) => format!("wait{}ms", timeout.as_millis()),
    }
}

fn shutdown_label(shutdown: ShutdownPolicy) -> &'static str {
    match shutdown {
        ShutdownPolicy::Truncate => "truncate",
        ShutdownPolicy::Drain => "drain",
    }
}

/// Run one plant for the configured duration and print its summary.
pub fn run_plant(settings: RunSettings) -> Result<()> {
    let mut plant = Plant::new(0, settings.config)?;
    plant.start()?;
    thread::sleep(settings.duration);
    plant.stop();

    let stats = plant.stats();
    println!("PLANT SUMMARY");
    println!("plant={}", plant.label());
    for worker in plant.workers() {
        println!("{} handled={}", worker.name(), worker.oranges_handled());
    }
    println!("{stats}");
    println!("conserved={}", stats.is_conserved());
    Ok(())
}

/// Run several plants side by side and print the aggregated summary.
pub fn run_operation(plants: usize, settings: RunSettings) -> Result<()> {
    let mut cluster = Cluster::new(plants, settings.config)?;
    cluster.start()?;
    thread::sleep(settings.duration);
    cluster.stop();

    println!("OPERATION SUMMARY");
    for (plant, stats) in cluster.plants().iter().zip(cluster.plant_stats()) {
        println!(
            "{}: provided={} processed={} bottles={} waste={}",
            plant.label(),
            stats.provided,
            stats.processed,
            stats.bottles,
            stats.waste
        );
    }
    let total = cluster.stats();
    println!("plants={plants}");
    println!("{total}");
    println!("conserved={}", total.is_conserved());
    Ok(())
}

/// Aggregated metrics from a single benchmark run.
struct BenchResult {
    plants: usize,
    duration_ms: u128,
    poll: PollStrategy,
    shutdown: ShutdownPolicy,
    stats: PlantStats,
    elapsed_ms: f64,
    throughput: f64,
    cpu_user_s: Option<f64>,
    cpu_sys_s: Option<f64>,
}

fn benchmark_once(plants: usize, settings: RunSettings) -> Result<BenchResult> {
    let mut cluster = Cluster::new(plants, settings.config)?;
    let cpu_start = cpu_times_seconds();
    let start = Instant::now();
    cluster.start()?;
    thread::sleep(settings.duration);
    cluster.stop();
    let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;

    let stats = cluster.stats();
    let throughput = if elapsed_ms > 0.0 {
        stats.processed as f64 / (elapsed_ms / 1000.0)
    } else {
        0.0
    };
    let (cpu_user_s, cpu_sys_s) = match (cpu_start, cpu_times_seconds()) {
        (Some((user_start, sys_start)), Some((user_end, sys_end))) => {
            (Some(user_end - user_start), Some(sys_end - sys_start))
        }
        _ => (None, None),
    };

    Ok(BenchResult {
        plants,
        duration_ms: settings.duration.as_millis(),
        poll: settings.config.poll,
        shutdown: settings.config.shutdown,
        stats,
        elapsed_ms,
        throughput,
        cpu_user_s,
        cpu_sys_s,
    })
}

/// Sweep durations and poll strategies, printing one CSV row per run.
pub fn run_bench(
    plants: usize,
    durations_ms: &[u64],
    poll_waits_ms: &[u64],
    settings: RunSettings,
) -> Result<()> {
    println!(
        "plants,duration_ms,poll,shutdown,provided,processed,bottles,waste,elapsed_ms,throughput_oranges_per_s,cpu_user_s,cpu_sys_s"
    );
    for &duration_ms in durations_ms {
        for &wait_ms in poll_waits_ms {
            let mut run = settings;
            run.duration = Duration::from_millis(duration_ms);
            run.config.poll = PollStrategy::from_wait_ms(wait_ms);
            info!(duration_ms, wait_ms, "benchmark run");
            let result = benchmark_once(plants, run)?;
            println!(
                "{},{},{},{},{},{},{},{},{:.2},{:.2},{},{}",
                result.plants,
                result.duration_ms,
                poll_label(result.poll),
                shutdown_label(result.shutdown),
                result.stats.provided,
                result.stats.processed,
                result.stats.bottles,
                result.stats.waste,
                result.elapsed_ms,
                result.throughput,
                format_cpu(result.cpu_user_s),
                format_cpu(result.cpu_sys_s)
            );
            if !result.stats.is_conserved() {
                eprintln!("# violation,conservation");
            }
        }
    }
    Ok(())
}
