use crate::config::cli::{CliOpt, DrawFormat};
use crate::config::load_definition;
use anyhow::Context;
use clap::Parser;
use topology_engine::traffic_engineering::build_model;
use topology_engine::traffic_engineering::solver::CommandSolver;
use tracing_subscriber::EnvFilter;

mod config;
mod draw;
mod report;

fn main() -> anyhow::Result<()> {
    let options = CliOpt::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(options.log_filter())),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();

    run(&options)
}

fn run(options: &CliOpt) -> anyhow::Result<()> {
    let ctx = options.run_context();
    let spec = load_definition(&options.definition)?;
    tracing::info!("loaded network definition from {}", options.definition.display());

    if options.draw || options.lp {
        let (topology, graph) = topology_engine::prepare(&ctx, spec)?;

        if options.draw {
            let description = graph.describe();
            match options.draw_format {
                DrawFormat::Json => {
                    let json = serde_json::to_string_pretty(&description)
                        .context("failed to serialize the graph description")?;
                    println!("{json}");
                }
                DrawFormat::Dot => print!("{}", draw::render_dot(&description)),
            }
        }

        if options.lp {
            let model = build_model(&graph, topology.demands());
            print!("{}", model.lp().to_lp_string());
        }

        return Ok(());
    }

    let solver = CommandSolver::new(options.solver.clone());
    let compiled = topology_engine::compile(&ctx, spec, &solver)?;
    report::print_report(&compiled, options.print_goodput);

    Ok(())
}
