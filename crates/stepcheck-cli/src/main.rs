//! Command-line interface for the stepcheck model checker.

use clap::{Args, Parser, Subcommand, ValueEnum};
use miette::{Diagnostic, NamedSource, SourceSpan};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use stepcheck_mc::linearize::linearize_state;
use stepcheck_mc::{
    FieldFilter, Heuristic, Interpreter, MatchMode, ProgressCounters, SearchConfig, SearchDriver,
    SearchReport, SearchStrategy, TracingListener, Verdict,
};
use stepcheck_prog::{Program, ProgramError, ProgramInterpreter};
use thiserror::Error;
use tracing::info;
use tracing_subscriber::EnvFilter;

const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("STEPCHECK_GIT_HASH"),
    " ",
    env!("STEPCHECK_GIT_DATE"),
    ", ",
    env!("STEPCHECK_BUILD_TARGET"),
    ")"
);

/// CLI error with source context for pretty printing.
#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    #[error("failed to read {path}: {message}")]
    IoError { path: String, message: String },

    #[error("parse error: {message}")]
    #[diagnostic(code(stepcheck::parse_error))]
    ParseError {
        message: String,
        #[source_code]
        src: NamedSource<Arc<String>>,
        #[label("here")]
        span: SourceSpan,
    },

    #[error("invalid program: {message}")]
    #[diagnostic(code(stepcheck::invalid_program))]
    ProgramError { message: String },

    #[error("check error: {message}")]
    #[diagnostic(code(stepcheck::check_error))]
    CheckError { message: String },
}

impl CliError {
    fn from_program_error(e: ProgramError, source: Arc<String>, filename: &str) -> Self {
        match e {
            ProgramError::Parse {
                message,
                line,
                column,
            } => {
                let offset = offset_of(&source, line, column);
                CliError::ParseError {
                    message,
                    src: NamedSource::new(filename, source),
                    span: (offset, 0).into(),
                }
            }
            other => CliError::ProgramError {
                message: other.to_string(),
            },
        }
    }

    fn check(e: impl std::error::Error) -> Self {
        CliError::CheckError {
            message: e.to_string(),
        }
    }
}

type CliResult<T> = Result<T, CliError>;

/// Byte offset of a 1-based line and column, clamped to the source.
fn offset_of(source: &str, line: usize, column: usize) -> usize {
    let mut offset = 0;
    for (i, text) in source.split_inclusive('\n').enumerate() {
        if i + 1 == line {
            let col = column.saturating_sub(1).min(text.trim_end_matches('\n').len());
            return offset + col;
        }
        offset += text.len();
    }
    source.len()
}

#[derive(Parser)]
#[command(name = "stepcheck", version = VERSION)]
#[command(about = "Explicit-state model checker for multi-threaded programs", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Explore every schedule and input choice of a program
    Check {
        /// Program file (JSON)
        #[arg(value_name = "FILE")]
        file: PathBuf,

        #[command(flatten)]
        search: SearchArgs,

        /// Log search progress once a second
        #[arg(long)]
        progress: bool,

        /// Show verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Print the fingerprint of a program's initial state
    Fingerprint {
        /// Program file (JSON)
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Leave matching fields out of the fingerprint (Class.field, field, prefix*)
        #[arg(long, value_name = "PATTERN")]
        exclude: Vec<String>,
    },

    /// Load and validate a program without checking it
    Validate {
        /// Program file (JSON)
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Show verbose output
        #[arg(short, long)]
        verbose: bool,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum StrategyArg {
    Dfs,
    Bfs,
    MostBlocked,
    Random,
}

/// Search options. Each flag that is given overrides the program's stored config.
#[derive(Args, Debug, Default)]
struct SearchArgs {
    /// Stop after this many distinct states
    #[arg(long)]
    max_states: Option<usize>,

    /// Do not expand states at this depth
    #[arg(long)]
    max_depth: Option<usize>,

    /// Keep searching after the first violation
    #[arg(long = "continue")]
    keep_going: bool,

    /// Exploration order
    #[arg(long, value_enum)]
    strategy: Option<StrategyArg>,

    /// Seed for the random strategy
    #[arg(long, default_value = "0")]
    seed: u64,

    /// Match states by 64-bit digest only (may miss states)
    #[arg(long)]
    hash_only: bool,

    /// Leave matching fields out of state matching (Class.field, field, prefix*)
    #[arg(long, value_name = "PATTERN")]
    exclude: Vec<String>,

    /// Wall-clock limit in seconds
    #[arg(long, value_name = "SECS")]
    time_limit: Option<u64>,

    /// Maximum memory usage in MB
    #[arg(long, value_name = "MB")]
    memory_limit: Option<usize>,

    /// Maximum frontier size for heuristic strategies
    #[arg(long)]
    queue_limit: Option<usize>,

    /// Disable deadlock checking
    #[arg(long)]
    no_deadlock: bool,

    /// Skip consistency checks on captured states
    #[arg(long)]
    no_validate: bool,
}

impl SearchArgs {
    fn apply(&self, mut config: SearchConfig) -> SearchConfig {
        if let Some(n) = self.max_states {
            config.max_states = Some(n);
        }
        if let Some(n) = self.max_depth {
            config.max_depth = Some(n);
        }
        if self.keep_going {
            config.halt_on_first_error = false;
        }
        if let Some(strategy) = self.strategy {
            config.strategy = match strategy {
                StrategyArg::Dfs => SearchStrategy::DepthFirst,
                StrategyArg::Bfs => SearchStrategy::Heuristic(Heuristic::BreadthFirst),
                StrategyArg::MostBlocked => SearchStrategy::Heuristic(Heuristic::MostBlocked),
                StrategyArg::Random => {
                    SearchStrategy::Heuristic(Heuristic::Random { seed: self.seed })
                }
            };
        }
        if self.hash_only {
            config.match_mode = MatchMode::HashOnly;
        }
        config.excluded_fields.extend(self.exclude.iter().cloned());
        if let Some(secs) = self.time_limit {
            config.max_time_secs = Some(secs);
        }
        if let Some(mb) = self.memory_limit {
            config.memory_limit_mb = Some(mb);
        }
        if let Some(n) = self.queue_limit {
            config.queue_limit = Some(n);
        }
        if self.no_deadlock {
            config.check_deadlock = false;
        }
        if self.no_validate {
            config.validate_snapshots = false;
        }
        config
    }
}

fn main() {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(2)
                .build(),
        )
    }))
    .ok();

    let cli = Cli::parse();

    let filter = if matches!(
        &cli.command,
        Commands::Check { verbose: true, .. } | Commands::Validate { verbose: true, .. }
    ) {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Check {
            file,
            search,
            progress,
            verbose,
        } => cmd_check(&file, &search, progress, verbose),
        Commands::Fingerprint { file, exclude } => cmd_fingerprint(&file, &exclude),
        Commands::Validate { file, verbose } => cmd_validate(&file, verbose),
    };

    match result {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("{:?}", miette::Report::new(e));
            std::process::exit(1);
        }
    }
}

fn load(file: &Path) -> CliResult<Program> {
    let filename = file.display().to_string();
    let source = Arc::new(fs::read_to_string(file).map_err(|e| CliError::IoError {
        path: filename.clone(),
        message: e.to_string(),
    })?);
    Program::from_json(&source).map_err(|e| CliError::from_program_error(e, source.clone(), &filename))
}

fn interpreter(program: Program) -> CliResult<ProgramInterpreter> {
    ProgramInterpreter::new(program).map_err(|e| CliError::ProgramError {
        message: e.to_string(),
    })
}

fn cmd_check(file: &Path, args: &SearchArgs, progress: bool, verbose: bool) -> CliResult<i32> {
    info!("loading {}...", file.display());
    let program = load(file)?;
    let mut config = args.apply(program.config.clone().unwrap_or_default());

    let counters = progress.then(|| Arc::new(ProgressCounters::new()));
    config.progress = counters.clone();

    let interp = interpreter(program)?;
    let mut driver = SearchDriver::new(interp, config);
    if verbose {
        driver.add_listener(Box::new(TracingListener));
    }

    let done = Arc::new(AtomicBool::new(false));
    let reporter = counters.map(|c| spawn_progress(c, done.clone()));

    info!("model checking...");
    let result = driver.run();
    done.store(true, Ordering::Relaxed);
    if let Some(handle) = reporter {
        handle.join().ok();
    }
    let report = result.map_err(CliError::check)?;

    print_report(&report);
    Ok(match report.verdict() {
        Verdict::PropertyHolds => 0,
        Verdict::ViolationFound => 1,
        Verdict::Incomplete => 2,
    })
}

fn spawn_progress(counters: Arc<ProgressCounters>, done: Arc<AtomicBool>) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let start = Instant::now();
        let mut last = Instant::now();
        while !done.load(Ordering::Relaxed) {
            thread::sleep(Duration::from_millis(50));
            if last.elapsed() < Duration::from_secs(1) {
                continue;
            }
            last = Instant::now();
            info!(
                states = counters.states.load(Ordering::Relaxed),
                depth = counters.depth.load(Ordering::Relaxed),
                frontier = counters.frontier.load(Ordering::Relaxed),
                transitions = counters.transitions.load(Ordering::Relaxed),
                elapsed_secs = start.elapsed().as_secs(),
                "progress"
            );
        }
    })
}

fn print_report(report: &SearchReport) {
    let stats = &report.stats;
    let secs = stats.elapsed.as_secs_f64();

    println!();
    match report.verdict() {
        Verdict::PropertyHolds => println!("Result: OK"),
        Verdict::ViolationFound => println!("Result: VIOLATION"),
        Verdict::Incomplete => println!("Result: INCOMPLETE"),
    }
    println!("  {}", report);

    for (n, v) in report.violations.iter().enumerate() {
        println!();
        println!("  Violation {}: {}", n + 1, v.violation);
        println!("  Path ({} steps):", v.path.len());
        for (i, step) in v.path.iter().enumerate() {
            println!("    {}: {}", i + 1, step);
        }
        println!("  State:");
        for line in v.state.to_string().lines() {
            println!("    {}", line);
        }
    }

    println!();
    println!("  States explored: {}", stats.unique_states);
    println!("  Revisited: {}", stats.revisited);
    println!("  End states: {}", stats.end_states);
    println!("  Transitions: {}", stats.transitions);
    println!("  Max depth: {}", stats.max_depth);
    println!("  Time: {:.2}s", secs);
    if secs > 0.0 {
        println!("  States/sec: {:.0}", stats.unique_states as f64 / secs);
    }
}

fn cmd_fingerprint(file: &Path, exclude: &[String]) -> CliResult<i32> {
    let interp = interpreter(load(file)?)?;
    let state = interp.initial_state().map_err(CliError::check)?;
    let filter = FieldFilter::new(exclude);
    let fp = linearize_state(interp.classes(), &filter, &state).map_err(CliError::check)?;

    println!("{}", fp);
    println!("words: {}", fp.len());
    println!("digest: {}", fp.digest());
    Ok(0)
}

fn cmd_validate(file: &Path, verbose: bool) -> CliResult<i32> {
    let program = load(file)?;
    let interp = interpreter(program)?;
    let program = interp.program();

    if let Some(name) = &program.name {
        println!("program {}", name);
    }
    println!("  {} classes", program.classes.len());
    for class in &program.classes {
        match &class.extends {
            Some(parent) => println!("    class {} extends {}", class.name, parent),
            None => println!("    class {}", class.name),
        }
    }
    println!("  {} globals", program.globals.len());
    println!("  {} threads", program.threads.len());
    for t in &program.threads {
        println!("    thread {} ({} ops)", t.name, t.ops.len());
        if verbose {
            for (pc, op) in t.ops.iter().enumerate() {
                println!("      {}: {:?}", pc, op);
            }
        }
    }

    println!("validate: ok");
    Ok(0)
}
