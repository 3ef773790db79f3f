/*
 * Taint Analysis CLI
 *
 * Usage:
 *   bytegraph-taint -a rules.json -s com.example -l program.json
 *   bytegraph-taint -a rules.json -s "com.a;com.b" -o report.sarif
 *
 * The analysis configuration (-a) is appended onto the embedded default
 * rule set. Start methods are selected by semicolon-separated class-name
 * prefixes (-s). With a database location (-l) the program snapshot is
 * loaded from disk; without one the analysis runs over an empty
 * in-memory program and exits cleanly with zero findings.
 */

use bytegraph_dataflow::features::taint::TaintRules;
use bytegraph_dataflow::{
    build_report, write_report, AnalysisOptions, Analyzer, Outcome, Program, TaintAnalyzer,
    TaintConfig, UnitManager, UnitResolver,
};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "bytegraph-taint",
    version,
    about = "Interprocedural taint analysis over JVM bytecode graphs"
)]
struct Args {
    /// Analysis configuration (JSON rules, appended to the defaults).
    #[arg(short = 'a', long = "analysisConf", value_name = "FILE")]
    analysis_conf: PathBuf,

    /// Database location; state persists there. In-memory when absent.
    #[arg(short = 'l', long = "dbLocation", value_name = "PATH")]
    db_location: Option<PathBuf>,

    /// Semicolon-separated class-name prefixes selecting start methods.
    #[arg(short = 's', long = "start", value_delimiter = ';', required = true)]
    start: Vec<String>,

    /// Report file; a .sarif extension selects SARIF output.
    #[arg(short = 'o', long = "output", default_value = "report.json")]
    output: PathBuf,

    /// Class path used for resolution. Defaults to $CLASSPATH.
    #[arg(long = "classpath", alias = "cp", value_name = "PATHS")]
    classpath: Option<String>,

    /// Unit partitioning strategy.
    #[arg(long = "units", value_enum, default_value_t = UnitResolver::Singleton)]
    units: UnitResolver,

    /// Analysis deadline in seconds.
    #[arg(long = "timeout", default_value_t = 100)]
    timeout_secs: u64,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    match run(args).await {
        Ok(outcome) => match outcome {
            Outcome::Complete | Outcome::Partial => ExitCode::SUCCESS,
            Outcome::Aborted => ExitCode::FAILURE,
        },
        Err(e) => {
            error!(error = %e, "analysis failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> bytegraph_dataflow::Result<Outcome> {
    let user_rules = TaintRules::load(&args.analysis_conf)?;
    let config = Arc::new(TaintConfig::with_user_rules(user_rules));
    let (sources, sinks, pass_through, sanitizers) = config.rule_counts();
    info!(sources, sinks, pass_through, sanitizers, "taint rules loaded");

    let classpath = args
        .classpath
        .or_else(|| std::env::var("CLASSPATH").ok())
        .unwrap_or_default();
    if !classpath.is_empty() {
        info!(%classpath, "resolving against class path");
    }

    let program = match &args.db_location {
        Some(path) => {
            let json = std::fs::read_to_string(path)?;
            Program::from_json(&json)?
        }
        None => Program::default(),
    };
    info!(
        methods = program.method_count(),
        statements = program.statement_count(),
        "program loaded"
    );

    let start_methods = program.methods_matching_class_prefixes(&args.start);
    if start_methods.is_empty() {
        info!("no start methods matched, emitting empty report");
    }

    let graph: Arc<Program> = Arc::new(program);
    let analyzer = Arc::new(TaintAnalyzer::new(graph.clone(), config));
    let options = AnalysisOptions {
        resolver: args.units,
        deadline: Duration::from_secs(args.timeout_secs),
        ..AnalysisOptions::default()
    };
    let manager = UnitManager::new(graph.clone(), options);
    let result = manager.run(analyzer.clone(), start_methods).await?;

    if analyzer.truncation_count() > 0 {
        info!(
            truncated = analyzer.truncation_count(),
            "access paths were cut to the depth bound"
        );
    }

    let report = build_report(analyzer.id(), &result, graph.as_ref());
    write_report(&report, &args.output)?;
    Ok(result.outcome)
}
