#![forbid(unsafe_code)]

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use conicrs_api::{Method, Solution, Solver};
use conicrs_core::math::Scalar;
use conicrs_core::options::SolveOptions;
use conicrs_core::problem::Problem;
use conicrs_core::tolerance::TolerancePolicy;
use conicrs_io::{read_json_problem, write_solution};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, Subscriber};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "conicrs")]
#[command(version, about = "Pure Rust LP/QP/SOCP solver")]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    Solve {
        #[arg(long)]
        problem: PathBuf,
        #[arg(long, value_enum, default_value = "ipm")]
        method: MethodArg,
        #[arg(long)]
        tol: Option<f64>,
        #[arg(long)]
        max_iters: Option<usize>,
        /// Wall-clock limit in seconds.
        #[arg(long)]
        time_limit: Option<u64>,
        #[arg(long)]
        output: Option<PathBuf>,
        /// Print the full solution as JSON instead of a summary.
        #[arg(long)]
        json: bool,
    },
    Check {
        #[arg(long)]
        problem: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum MethodArg {
    ActiveSet,
    Ipm,
    Simplex,
}

impl From<MethodArg> for Method {
    fn from(arg: MethodArg) -> Method {
        match arg {
            MethodArg::ActiveSet => Method::ActiveSet,
            MethodArg::Ipm => Method::InteriorPoint,
            MethodArg::Simplex => Method::Simplex,
        }
    }
}

struct SolveArgs {
    problem: PathBuf,
    method: Method,
    tol: Option<f64>,
    max_iters: Option<usize>,
    time_limit: Option<u64>,
    output: Option<PathBuf>,
    json: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    initialize_tracing(cli.log_json);
    match cli.command {
        Commands::Solve {
            problem,
            method,
            tol,
            max_iters,
            time_limit,
            output,
            json,
        } => solve_command(SolveArgs {
            problem,
            method: method.into(),
            tol,
            max_iters,
            time_limit,
            output,
            json,
        }),
        Commands::Check { problem } => check_command(problem),
    }
}

/// Logs always go to `writer`, so stdout carries nothing but the solution.
fn log_subscriber<W>(log_json: bool, writer: W) -> Box<dyn Subscriber + Send + Sync>
where
    W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer);
    if log_json {
        Box::new(builder.json().finish())
    } else {
        Box::new(builder.finish())
    }
}

fn initialize_tracing(log_json: bool) {
    tracing::subscriber::set_global_default(log_subscriber(log_json, std::io::stderr)).ok();
}

fn build_options(args: &SolveArgs) -> Result<SolveOptions<Scalar>> {
    let mut options = SolveOptions::<Scalar>::default();
    if let Some(tolerance) = args.tol {
        anyhow::ensure!(
            tolerance.is_finite() && tolerance > 0.0,
            "tolerance must be positive, got {tolerance}"
        );
        options = options.tolerance(TolerancePolicy::absolute(tolerance as Scalar));
    }
    if let Some(iters) = args.max_iters {
        options = options.max_iterations(iters);
    }
    if let Some(limit) = args.time_limit {
        options = options.max_time(Duration::from_secs(limit));
    }
    Ok(options)
}

fn load(path: &Path) -> Result<Problem<Scalar>> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    if extension != "json" {
        anyhow::bail!("Unsupported file extension: {:?}", extension);
    }
    Ok(read_json_problem(path)?.into_problem())
}

fn solve_command(args: SolveArgs) -> Result<()> {
    let options = build_options(&args)?;
    let problem = load(&args.problem)?;
    let solver = Solver::<Scalar>::new().method(args.method).options(options);
    let solution = solver
        .solve(&problem)
        .with_context(|| format!("failed to solve {:?}", args.problem))?;
    info!(status = ?solution.status(), iterations = solution.iterations(), "solve finished");
    emit_solution(&solution, args.output, args.json)
}

fn emit_solution(solution: &Solution<Scalar>, output: Option<PathBuf>, json: bool) -> Result<()> {
    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    if json {
        serde_json::to_writer_pretty(&mut handle, solution)?;
        handle.write_all(b"\n")?;
    } else {
        writeln!(
            handle,
            "status: {:?}\nobjective: {:.6}\niters: {}\nx: {:?}",
            solution.status(),
            solution.objective_value(),
            solution.iterations(),
            solution.point()
        )?;
    }
    handle.flush()?;
    if let Some(path) = output {
        write_solution(&path, solution)
            .with_context(|| format!("failed to write solution to {:?}", path))?;
    }
    Ok(())
}

fn check_command(path: PathBuf) -> Result<()> {
    let problem = load(&path).context("problem validation failed")?;
    println!(
        "{} problem with {} variables is valid.",
        problem.kind().to_uppercase(),
        problem.nvars()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().expect("lock").extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn json_logs_use_the_given_writer() {
        let captured = Captured::default();
        let sink = captured.clone();
        let subscriber = log_subscriber(true, move || sink.clone());
        tracing::subscriber::with_default(subscriber, || info!(iterations = 3, "search finished"));
        let text = String::from_utf8(captured.0.lock().expect("lock").clone()).expect("utf8");
        let line: serde_json::Value = serde_json::from_str(text.trim()).expect("json line");
        assert_eq!(line["fields"]["message"], "search finished");
        assert_eq!(line["fields"]["iterations"], 3);
    }
}
