mod cluster;
mod config;
mod error;
mod logging;
mod orange;
mod plant;
mod sim;
mod stage_queue;
mod stats;
mod types;
mod worker;

use std::process::ExitCode;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use crate::config::{PlantConfig, PollStrategy, Roster, ShutdownPolicy};
use crate::sim::RunSettings;

#[derive(Parser)]
#[command(
    name = "juice_plant",
    version,
    about = "Multi-threaded orange juice plant simulation"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "warn", global = true)]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single plant (default)
    Plant {
        #[command(flatten)]
        run: RunArgs,
    },
    /// Run several independent plants together
    Operation {
        /// Number of plants
        #[arg(long, default_value_t = config::DEFAULT_PLANTS)]
        plants: usize,
        #[command(flatten)]
        run: RunArgs,
    },
    /// Sweep run durations and poll strategies, printing CSV
    Bench {
        /// Number of plants per run
        #[arg(long, default_value_t = 1)]
        plants: usize,
        /// Comma-separated run durations in milliseconds
        #[arg(long, value_delimiter = ',', default_values_t = [500u64, 1000, 2000])]
        durations_ms: Vec<u64>,
        /// Comma-separated poll waits in milliseconds (0 = spin)
        #[arg(long, value_delimiter = ',', default_values_t = [0u64, 1, 10])]
        poll_waits_ms: Vec<u64>,
        #[command(flatten)]
        run: RunArgs,
    },
}

#[derive(Args, Clone)]
struct RunArgs {
    /// How long the plant runs before it is stopped
    #[arg(long, default_value_t = config::DEFAULT_RUN_DURATION.as_millis() as u64)]
    duration_ms: u64,
    /// Bounded wait on an empty queue in milliseconds (0 = busy-poll)
    #[arg(long, default_value_t = 0)]
    poll_wait_ms: u64,
    /// Let every stage empty its input before stopping it
    #[arg(long)]
    drain: bool,
    /// Workers per role: fetchers,peelers,squeezers,bottlers,processors
    #[arg(long, default_value = "1,1,3,2,2", value_parser = parse_roster)]
    roster: Roster,
}

impl Default for RunArgs {
    fn default() -> Self {
        Self {
            duration_ms: config::DEFAULT_RUN_DURATION.as_millis() as u64,
            poll_wait_ms: 0,
            drain: false,
            roster: Roster::default(),
        }
    }
}

impl RunArgs {
    fn settings(&self) -> RunSettings {
        RunSettings {
            config: PlantConfig {
                roster: self.roster,
                poll: PollStrategy::from_wait_ms(self.poll_wait_ms),
                shutdown: if self.drain {
                    ShutdownPolicy::Drain
                } else {
                    ShutdownPolicy::Truncate
                },
                oranges_per_bottle: config::ORANGES_PER_BOTTLE,
            },
            duration: Duration::from_millis(self.duration_ms),
        }
    }
}

fn parse_roster(arg: &str) -> Result<Roster, String> {
    Roster::parse(arg).map_err(|err| err.to_string())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    logging::init(&cli.log_level);

    let command = cli.command.unwrap_or(Commands::Plant {
        run: RunArgs::default(),
    });
    let result = match command {
        Commands::Plant { run } => sim::run_plant(run.settings()),
        Commands::Operation { plants, run } => sim::run_operation(plants, run.settings()),
        Commands::Bench {
            plants,
            durations_ms,
            poll_waits_ms,
            run,
        } => sim::run_bench(plants, &durations_ms, &poll_waits_ms, run.settings()),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::from(2)
        }
    }
}
