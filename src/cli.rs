use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::config::Config;
use crate::interpreter::{Program, Value, Vm};

#[derive(Parser)]
#[command(name = "lute")]
#[command(about = "Lute - compile, run and schedule Lute scripts", long_about = None)]
pub struct Cli {
    /// Path to config file (overrides default search)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory named scripts are resolved against (overrides config)
    #[arg(long, global = true)]
    pub script_root: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Compile a script and report diagnostics
    Check {
        /// Script file
        file: PathBuf,

        /// Print the syntax tree as JSON
        #[arg(long)]
        dump_ast: bool,
    },

    /// Run a script to completion
    Run {
        /// Script file
        file: PathBuf,

        /// Begin block arguments: numbers, #hex references or strings
        args: Vec<String>,
    },

    /// Run a script in the background scheduler
    Background {
        /// Script file
        file: PathBuf,

        /// Begin block arguments: numbers, #hex references or strings
        args: Vec<String>,

        /// Number of scheduler ticks to drive
        #[arg(short = 't', long = "ticks", default_value = "10")]
        ticks: u32,

        /// Simulated milliseconds per tick
        #[arg(short = 'm', long = "tick-ms", default_value = "100")]
        tick_ms: u64,
    },

    /// List registered commands
    Commands,

    /// Print the effective configuration
    Config,
}

/// Run the CLI by parsing process arguments
pub fn run_cli() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    run_cli_with_args(cli, config)
}

/// Loads the configuration selected by the global flags
pub fn load_config(cli: &Cli) -> Result<Config> {
    Config::builder()
        .config_path(cli.config.clone())
        .script_root(cli.script_root.clone())
        .build()
}

/// Internal function that handles CLI commands
pub fn run_cli_with_args(cli: Cli, config: Config) -> Result<()> {
    match cli.command {
        Commands::Check { file, dump_ast } => {
            let vm = Vm::new(config);
            let program = compile(&vm, &file)?;

            for diagnostic in program.diagnostics() {
                println!("{}: {}", file.display(), diagnostic);
            }
            if dump_ast {
                if let Some(tree) = program.tree() {
                    println!("{}", serde_json::to_string_pretty(tree)?);
                }
            }

            if !program.is_valid() {
                anyhow::bail!(
                    "{} is not valid ({:?})",
                    program.name(),
                    program.state()
                );
            }
            println!("{}: OK", program.name());
        }

        Commands::Run { file, args } => {
            let mut vm = Vm::new(config);
            let program = compile_valid(&vm, &file)?;
            let arguments = args.iter().map(|a| parse_argument(a)).collect();

            let result = vm.run_program(&program, arguments);
            print_console(&mut vm);
            let value = result.with_context(|| format!("{} failed", program.name()))?;

            let value = value.unwrap_or(Value::Numeric(0.0));
            println!("{}", serde_json::to_string(&value.to_json())?);
        }

        Commands::Background {
            file,
            args,
            ticks,
            tick_ms,
        } => {
            let mut vm = Vm::new(config);
            let program = compile_valid(&vm, &file)?;
            let arguments = args.iter().map(|a| parse_argument(a)).collect();
            let id = vm.background(&program, arguments)?;
            println!("Backgrounded {} as context {}", program.name(), id.0);

            let elapsed = Duration::from_millis(tick_ms);
            for tick in 1..=ticks {
                let report = vm.tick(elapsed);
                print_console(&mut vm);

                for (id, value) in &report.completed {
                    let value = value.clone().unwrap_or(Value::Numeric(0.0));
                    println!("[tick {}] context {} finished: {}", tick, id.0, value);
                }
                for (id, reason) in &report.retired {
                    println!("[tick {}] context {} retired: {:?}", tick, id.0, reason);
                }
                if vm.background_count() == 0 {
                    break;
                }
            }
        }

        Commands::Commands => {
            let vm = Vm::new(config);
            for command in vm.commands().iter() {
                let info = command.info();
                let alias = info
                    .alias
                    .map(|a| format!(" (alias {})", a))
                    .unwrap_or_default();
                println!("{}{}", info.signature(), alias);
                if !info.description.is_empty() {
                    println!("    {}", info.description);
                }
            }
        }

        Commands::Config => {
            print!("{}", config.to_toml()?);
        }
    }

    Ok(())
}

fn compile(vm: &Vm, file: &Path) -> Result<Rc<Program>> {
    vm.compile_file(file)
        .with_context(|| format!("Failed to compile {}", file.display()))
}

fn compile_valid(vm: &Vm, file: &Path) -> Result<Rc<Program>> {
    let program = compile(vm, file)?;
    if !program.is_valid() {
        for diagnostic in program.diagnostics() {
            eprintln!("{}: {}", file.display(), diagnostic);
        }
        anyhow::bail!("{} failed to compile", file.display());
    }
    Ok(program)
}

fn print_console(vm: &mut Vm) {
    for line in vm.take_console() {
        println!("{}", line);
    }
}

/// Parses a command-line argument: `#hex` reference, number, otherwise string.
pub fn parse_argument(arg: &str) -> Value {
    if let Some(hex) = arg.strip_prefix('#') {
        if let Ok(handle) = u32::from_str_radix(hex, 16) {
            return Value::reference(handle);
        }
    }
    match arg.parse::<f64>() {
        Ok(n) if n.is_finite() => Value::Numeric(n),
        _ => Value::from(arg),
    }
}
