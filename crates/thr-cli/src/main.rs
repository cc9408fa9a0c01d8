use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use serde_json::{json, Value};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "thr", version = "0.3.0", about = "Interim throughput graphs from benchmark snapshots")]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug). RUST_LOG takes precedence.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Derive interval throughput and render one graph per thread-count pair.
    Render {
        #[arg(long = "data-path", alias = "data_path")]
        data_path: PathBuf,
        #[arg(long = "out-path", alias = "out_path")]
        out_path: PathBuf,
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        gnuplot: Option<String>,
        #[arg(long = "scripts-dir")]
        scripts_dir: Option<PathBuf>,
        #[arg(long)]
        json: bool,
    },
    /// Summarize groups and partitions without rendering.
    Describe {
        #[arg(long = "data-path", alias = "data_path")]
        data_path: PathBuf,
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let json_mode = command_json_mode(&cli.command);
    let result = run_command(cli.command);
    match result {
        Ok(Some(payload)) => {
            emit_json(&payload);
            Ok(())
        }
        Ok(None) => Ok(()),
        Err(err) => {
            if json_mode {
                emit_json(&json_error("command_failed", format!("{:#}", err), json!({})));
                std::process::exit(1);
            }
            Err(err)
        }
    }
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn run_command(command: Commands) -> Result<Option<Value>> {
    match command {
        Commands::Render {
            data_path,
            out_path,
            config,
            gnuplot,
            scripts_dir,
            json,
        } => {
            let settings = resolve_settings(config.as_deref(), gnuplot, scripts_dir)?;
            std::fs::create_dir_all(&out_path)?;
            let mut renderer = thr_runner::GnuplotRenderer::new(
                settings.gnuplot.clone(),
                settings.scripts_dir.clone(),
            )
            .with_workdir(&out_path);
            let report = thr_runner::render_data_file(&data_path, &settings, &mut renderer)?;
            info!(
                partitions = report.partitions.len(),
                out_path = %out_path.display(),
                "render complete"
            );
            if json {
                return Ok(Some(json!({
                    "ok": true,
                    "command": "render",
                    "data_path": data_path.display().to_string(),
                    "out_path": out_path.display().to_string(),
                    "render_spec": settings.render_spec,
                    "on_render_failure": settings.on_render_failure.as_str(),
                    "report": report_to_json(&report)
                })));
            }
            print_report(&report);
            println!("out_path: {}", out_path.display());
        }
        Commands::Describe { data_path, json } => {
            let summary = thr_runner::describe_data_file(&data_path)?;
            if json {
                return Ok(Some(json!({
                    "ok": true,
                    "command": "describe",
                    "data_path": data_path.display().to_string(),
                    "summary": summary_to_json(&summary)
                })));
            }
            print_summary(&summary);
        }
    }
    Ok(None)
}

fn resolve_settings(
    config: Option<&std::path::Path>,
    gnuplot: Option<String>,
    scripts_dir: Option<PathBuf>,
) -> Result<thr_runner::PlotSettings> {
    let mut settings = match config {
        Some(path) => thr_runner::PlotSettings::load(path)?,
        None => thr_runner::PlotSettings::default(),
    };
    if let Some(g) = gnuplot {
        settings.gnuplot = g;
    }
    if let Some(dir) = scripts_dir {
        settings.scripts_dir = dir;
    }
    Ok(settings)
}

fn emit_json(value: &Value) {
    match serde_json::to_string(value) {
        Ok(s) => println!("{}", s),
        Err(_) => println!(
            "{{\"ok\":false,\"error\":{{\"code\":\"serialization_error\",\"message\":\"failed to serialize JSON payload\",\"details\":{{}}}}}}"
        ),
    }
}

fn json_error(code: &str, message: String, details: Value) -> Value {
    json!({
        "ok": false,
        "error": {
            "code": code,
            "message": message,
            "details": details
        }
    })
}

fn command_json_mode(command: &Commands) -> bool {
    match command {
        Commands::Render { json, .. } | Commands::Describe { json, .. } => *json,
    }
}

fn summary_to_json(summary: &thr_runner::DataSummary) -> Value {
    json!({
        "rows": summary.rows,
        "groups": summary.groups,
        "partitions": summary
            .partitions
            .iter()
            .enumerate()
            .map(|(index, p)| json!({
                "index": index,
                "num_sched_threads": p.key.num_sched_threads,
                "num_exec_threads": p.key.num_exec_threads,
                "rows": p.rows,
                "undefined_throughput": p.undefined_throughput
            }))
            .collect::<Vec<_>>()
    })
}

fn report_to_json(report: &thr_runner::PipelineReport) -> Value {
    json!({
        "rows": report.rows,
        "groups": report.groups,
        "partitions": report
            .partitions
            .iter()
            .map(|p| json!({
                "index": p.index,
                "num_sched_threads": p.key.num_sched_threads,
                "num_exec_threads": p.key.num_exec_threads,
                "rows": p.rows,
                "undefined_throughput": p.undefined_throughput,
                "exit_code": p.exit_code,
                "succeeded": p.succeeded()
            }))
            .collect::<Vec<_>>()
    })
}

fn print_report(report: &thr_runner::PipelineReport) {
    println!("rows: {}", report.rows);
    println!("groups: {}", report.groups);
    println!("partitions: {}", report.partitions.len());
    for p in &report.partitions {
        let exit = match p.exit_code {
            Some(code) => code.to_string(),
            None => "signal".to_string(),
        };
        println!(
            "partition[{}]: {} rows={} undefined_throughput={} exit={}",
            p.index, p.key, p.rows, p.undefined_throughput, exit
        );
    }
}

fn print_summary(summary: &thr_runner::DataSummary) {
    println!("rows: {}", summary.rows);
    println!("groups: {}", summary.groups);
    println!("partitions: {}", summary.partitions.len());
    for (index, p) in summary.partitions.iter().enumerate() {
        println!(
            "partition[{}]: {} rows={} undefined_throughput={}",
            index, p.key, p.rows, p.undefined_throughput
        );
    }
}
