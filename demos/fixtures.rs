use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use reach_rs::analysis::Analyzer;
use reach_rs::budget::Budget;
use reach_rs::config::AnalysisConfig;
use reach_rs::dot::function_to_dot;

#[path = "../tests/common/mod.rs"]
mod common;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Fixture {
    Test1,
    Test2,
}

#[derive(Debug, Parser)]
#[command(author, version)]
struct Cli {
    /// Fixture program to analyse.
    #[arg(value_enum, default_value = "test1")]
    fixture: Fixture,

    /// Call-string length of contexts.
    #[clap(long, value_name = "INT", default_value = "2")]
    depth: usize,

    /// Visits of a loop head before widening.
    #[clap(long, value_name = "INT", default_value = "3")]
    widen: usize,

    /// Maximum number of block transfers.
    #[clap(long, value_name = "INT")]
    steps: Option<u64>,

    /// Report straddling indices as unknown instead of unsafe.
    #[clap(long)]
    no_promote: bool,

    /// Write one DOT file per function into this directory.
    #[clap(long, value_name = "DIR")]
    dot: Option<PathBuf>,
}

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    simplelog::TermLogger::init(
        simplelog::LevelFilter::Info,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    )?;

    let time_total = std::time::Instant::now();

    let args = Cli::parse();
    println!("args = {:?}", args);

    let program = match args.fixture {
        Fixture::Test1 => common::test1(),
        Fixture::Test2 => common::test2(),
    };
    println!(
        "program: {} functions, {} call sites, {} access sites",
        program.functions().len(),
        program.call_sites().len(),
        program.sites().len()
    );

    let budget = match args.steps {
        Some(steps) => Budget::steps(steps),
        None => Budget::unlimited(),
    };
    let config = AnalysisConfig::default()
        .with_max_context_depth(args.depth)
        .with_max_widen_iterations(args.widen)
        .with_promote_bounded_violations(!args.no_promote)
        .with_budget(budget);
    let report = Analyzer::new(&program, config).run()?;

    println!("\nVerdicts:");
    for verdict in &report.verdicts {
        let site = program.site(verdict.site);
        println!(
            "{} {}[{}] at {}: {}",
            site.kind, site.array, site.index, site.location, verdict
        );
        for step in &verdict.witness {
            println!("    {}", step);
        }
    }
    if report.verdicts.is_empty() {
        println!("no access sites");
    }

    for diagnostic in &report.diagnostics {
        println!("warning: {}", diagnostic);
    }

    println!("\nCoverage:");
    for function in report.coverage.summary(&program) {
        println!("  {}", function);
    }
    println!("stats = {:?}", report.stats);

    if let Some(dir) = &args.dot {
        std::fs::create_dir_all(dir)?;
        for function in program.functions() {
            let dot = function_to_dot(&program, function, Some(&report.coverage), &report.verdicts)?;
            let path = dir.join(format!("{}.dot", function.name));
            std::fs::write(&path, dot)?;
            println!("wrote {}", path.display());
        }
    }

    println!("\nTotal time: {:?}", time_total.elapsed());

    Ok(())
}
