use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::rc::Rc;

use clap::{Parser, Subcommand, ValueEnum};
use tracing::debug;

use jsmm::ast::Tree;
use jsmm::config::RunConfig;
use jsmm::diagnostic::{Diagnostic, ansi::AnsiRenderer, json, registry};
use jsmm::host::Console;
use jsmm::interpreter::{OutputSink, RunContext};
use jsmm::lower::{Hooks, compile};

#[derive(Parser)]
#[command(name = "jsmm", version, about = "Run jsmm program trees and inspect their execution history")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging (use multiple times for increased verbosity)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a program tree (JSON as produced by the parser)
    Run(RunArgs),

    /// Explain an error code, e.g. `jsmm explain JSMM-R006`
    Explain {
        code: Option<String>,

        /// List every known code
        #[arg(long, conflicts_with = "code")]
        list: bool,
    },
}

#[derive(clap::Args)]
struct RunArgs {
    /// Program tree file
    ast: PathBuf,

    /// Run limits as JSON, e.g. {"max_execution_cost": 10000}
    #[arg(long)]
    config: Option<PathBuf>,

    /// Deepest allowed nesting of function calls
    #[arg(long)]
    max_call_depth: Option<usize>,

    /// Execution budget of the whole run
    #[arg(long)]
    max_cost: Option<u64>,

    /// Diagnostic format
    #[arg(long, value_enum, default_value = "ansi")]
    format: Format,

    /// Print the scope frames as they were at this step
    #[arg(long)]
    state: Option<usize>,

    /// Print the recorded scope events
    #[arg(long)]
    history: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Format {
    Ansi,
    Json,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    setup_logging(cli.verbose, cli.quiet);

    match cli.command {
        Commands::Run(args) => run_command(&args),
        Commands::Explain { code, list } => explain_command(code.as_deref(), list),
    }
}

fn setup_logging(verbose: u8, quiet: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("warn"),
            1 => EnvFilter::new("jsmm=debug"),
            _ => EnvFilter::new("jsmm=trace"),
        }
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();
}

// ── run ──────────────────────────────────────────────────────────────────────

fn run_command(args: &RunArgs) -> ExitCode {
    match execute(args) {
        Ok(ctx) => {
            if let Some(step) = args.state {
                print_json(&ctx.scope_tracker().get_state(step));
            }
            if args.history {
                print_json(ctx.scope_tracker().events());
            }
            match ctx.get_error() {
                Some(error) => {
                    let mut d = Diagnostic::from(error);
                    if let Some(source) = &ctx.tree().source {
                        d = d.with_source(source.clone());
                    }
                    report(&d, args.format);
                    ExitCode::from(1)
                }
                None => ExitCode::SUCCESS,
            }
        }
        Err(d) => {
            report(&d, args.format);
            ExitCode::from(2)
        }
    }
}

/// Load, lower and run the program. Console output is printed as it happens;
/// a program fault is left on the returned context.
fn execute(args: &RunArgs) -> Result<RunContext, Diagnostic> {
    let config = load_config(args)?;
    let text = std::fs::read_to_string(&args.ast)
        .map_err(|e| Diagnostic::error(format!("cannot read {}: {e}", args.ast.display())))?;
    let tree = Tree::from_json(&text).map_err(|e| {
        Diagnostic::error(format!("{} is not a program tree: {e}", args.ast.display())).with_code("JSMM-C002")
    })?;
    debug!(path = %args.ast.display(), nodes = tree.nodes.len(), "tree loaded");

    let program = compile(Rc::new(tree), &Hooks::new()).map_err(|e| Diagnostic::from(&e))?;
    let console = Console::new();
    let printer: Rc<dyn OutputSink> = Rc::new(Printer);
    let mut ctx = RunContext::new(
        Rc::new(program),
        config,
        vec![console.binding()],
        vec![console.clone() as Rc<dyn OutputSink>, printer],
    );
    console.attach(&mut ctx);
    ctx.run_program().map_err(|e| Diagnostic::error(format!("host failure: {e}")))?;
    Ok(ctx)
}

fn load_config(args: &RunArgs) -> Result<RunConfig, Diagnostic> {
    let mut config = match &args.config {
        Some(path) => read_config(path)?,
        None => RunConfig::default(),
    };
    if let Some(depth) = args.max_call_depth {
        config = config.with_max_call_stack_depth(depth);
    }
    if let Some(cost) = args.max_cost {
        config = config.with_max_execution_cost(cost);
    }
    Ok(config)
}

fn read_config(path: &Path) -> Result<RunConfig, Diagnostic> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| Diagnostic::error(format!("cannot read {}: {e}", path.display())))?;
    RunConfig::from_json(&text).map_err(|e| Diagnostic::error(format!("invalid config {}: {e}", path.display())))
}

/// Echoes `console.log` output to stdout as the program runs.
struct Printer;

impl OutputSink for Printer {
    fn output_event(&self, _ctx: &RunContext, event: &str, data: &serde_json::Value) {
        if event == "console.log" {
            if let Some(text) = data.get("text").and_then(serde_json::Value::as_str) {
                println!("{text}");
            }
        }
    }
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("error: cannot serialize history: {e}"),
    }
}

fn report(d: &Diagnostic, format: Format) {
    match format {
        Format::Ansi => {
            let renderer = AnsiRenderer { use_color: std::io::stderr().is_terminal() };
            eprint!("{}", renderer.render(d));
        }
        Format::Json => eprintln!("{}", json::render(d)),
    }
}

// ── explain ──────────────────────────────────────────────────────────────────

fn explain_command(code: Option<&str>, list: bool) -> ExitCode {
    let code = match code {
        Some(code) if !list => code,
        _ => {
            for entry in registry::REGISTRY {
                println!("{}  {}", entry.code, entry.short);
            }
            return ExitCode::SUCCESS;
        }
    };
    match registry::lookup(code) {
        Some(entry) => {
            print!("{}", entry.long);
            ExitCode::SUCCESS
        }
        None => {
            eprintln!("error: unknown error code `{code}`");
            ExitCode::from(2)
        }
    }
}
