use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;
use topology_engine::context::{RunContext, TieBreak};

#[derive(Parser, Debug, Clone)]
#[command(version, about = "Compiles a network definition into routing tables and optimized flows")]
pub struct CliOpt {
    /// Path to the YAML file containing the network definition
    pub definition: PathBuf,

    /// Print the resolved graph as JSON and exit
    #[arg(long)]
    pub draw: bool,

    /// Output format of `--draw`
    #[arg(long, value_enum, default_value_t = DrawFormat::Json)]
    pub draw_format: DrawFormat,

    /// Print the traffic engineering model in LP format and exit, without solving it
    #[arg(long)]
    pub lp: bool,

    /// Print the goodput obtained by each demand
    #[arg(long)]
    pub print_goodput: bool,

    /// The CBC-compatible solver executable used for traffic engineering
    #[arg(long, default_value = "cbc")]
    pub solver: String,

    /// How long the solver may run before we give up on traffic engineering
    #[arg(long, default_value_t = 30_000)]
    pub solver_timeout_ms: u64,

    /// The capacity of links whose interfaces declare none, in Mbps
    #[arg(long, default_value_t = 1000.0)]
    pub default_capacity_mbps: f64,

    /// How to choose between equal-cost next hops
    #[arg(long, value_enum, default_value_t = TieBreakOpt::Interface)]
    pub tie_break: TieBreakOpt,

    /// Log debug information to stderr
    #[arg(long, conflicts_with = "silent")]
    pub verbose: bool,

    /// Only log errors to stderr
    #[arg(long)]
    pub silent: bool,
}

#[derive(ValueEnum, Copy, Clone, Debug, PartialEq, Eq)]
pub enum DrawFormat {
    Json,
    /// Graphviz
    Dot,
}

#[derive(ValueEnum, Copy, Clone, Debug, PartialEq, Eq)]
pub enum TieBreakOpt {
    /// Smallest local interface name first
    Interface,
    /// Smallest neighbor name first
    Neighbor,
}

impl CliOpt {
    pub fn run_context(&self) -> RunContext {
        RunContext {
            default_capacity_mbps: self.default_capacity_mbps,
            solver_timeout: Duration::from_millis(self.solver_timeout_ms),
            tie_break: match self.tie_break {
                TieBreakOpt::Interface => TieBreak::InterfaceFirst,
                TieBreakOpt::Neighbor => TieBreak::NeighbourFirst,
            },
            cancellation: None,
        }
    }

    /// The default log filter, used unless `RUST_LOG` is set
    pub fn log_filter(&self) -> &'static str {
        if self.verbose {
            "debug"
        } else if self.silent {
            "error"
        } else {
            "warn,topology_engine=info,netcompile=info"
        }
    }
}
