use std::path::PathBuf;

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand};

use verfilter::config::{FilterConfig, log_path};
use verfilter::driver::{
    build_resolver, logging_config, mode_for, parse_assignment, run_tasks, status, tasks_for,
};
use verfilter::probe::{DEFAULT_ARGUMENT, Probe, env_entry};
use verfilter::task::{Outcome, Processor, source_key};
use verfilter::version::cache::{Cache, RecordStore};
use verfilter::version::tracker::signature;

#[derive(Parser)]
#[command(name = "verfilter")]
#[command(
    version,
    about = "Include or drop lines of a file depending on installed program versions"
)]
struct Cli {
    /// Configuration file (JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase stderr log level (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Also write a debug log to verfilter.log in the data directory
    #[arg(long, global = true)]
    log_file: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Clone, Default)]
struct VersionArgs {
    /// Version of a program, e.g. `--set bash=5.2`; overrides the config
    #[arg(long = "set", value_name = "PROGRAM=VERSION", value_parser = parse_assignment)]
    set: Vec<(String, String)>,

    /// Compare all versions fuzzily instead of only `?`-suffixed operators
    #[arg(long)]
    global_fuzzy: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Filter `.ver` files, writing each next to its input without the extension
    Process {
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Output path (only with a single input)
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        versions: VersionArgs,

        /// Re-process even if the output is up to date
        #[arg(long)]
        force: bool,

        /// Neither read nor write dependency records
        #[arg(long)]
        no_cache: bool,
    },
    /// Print the programs referenced by files and the signature of their versions
    Signature {
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        #[command(flatten)]
        versions: VersionArgs,
    },
    /// Find the installed version of a program
    FindVersion {
        program: String,

        /// Argument making the program print its version
        #[arg(long, default_value = DEFAULT_ARGUMENT, allow_hyphen_values = true)]
        argument: String,

        /// Report as VAR_VERSION instead of PROGRAM_VERSION
        #[arg(long)]
        var: Option<String>,
    },
    /// List recorded files and whether their outputs are up to date
    Status {
        #[command(flatten)]
        versions: VersionArgs,
    },
    /// Remove the dependency records of files
    Forget {
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => FilterConfig::load(path)?,
        None => FilterConfig::default(),
    };
    let default_log = if cli.log_file {
        let path = log_path();
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("create log directory {}", dir.display()))?;
        }
        Some(path)
    } else {
        None
    };
    verfilter::logging::init(&logging_config(
        &config.logging,
        cli.verbose,
        default_log,
    ));

    match cli.command {
        Command::Process {
            inputs,
            output,
            versions,
            force,
            no_cache,
        } => {
            let tasks = tasks_for(inputs, output)?;
            let store = if no_cache { None } else { open_store(&config)? };
            let processor = Processor::new(
                mode_for(config.mode, versions.global_fuzzy),
                build_resolver(&config, &versions.set)?,
                store,
            )?
            .force(force);

            let results = run_tasks(&processor, &tasks);
            let mut failed = 0;
            for (task, result) in tasks.iter().zip(results) {
                match result {
                    Ok(Outcome::Written { .. }) => println!("wrote {}", task.output.display()),
                    Ok(Outcome::UpToDate) => println!("up to date {}", task.output.display()),
                    Err(e) => {
                        failed += 1;
                        eprintln!("error: {}: {}", task.input.display(), e);
                    }
                }
            }
            if failed > 0 {
                bail!("{} of {} files failed", failed, tasks.len());
            }
            Ok(())
        }
        Command::Signature { inputs, versions } => {
            let processor = Processor::<Cache>::new(
                mode_for(config.mode, versions.global_fuzzy),
                build_resolver(&config, &versions.set)?,
                None,
            )?;
            for input in inputs {
                let text = std::fs::read_to_string(&input)
                    .with_context(|| format!("read {}", input.display()))?;
                let programs = processor.referenced_programs(&text)?;

                println!("{}", input.display());
                for program in &programs {
                    match processor.resolver().resolve(program) {
                        Ok(version) => println!("  {} {}", program, version),
                        Err(e) => println!("  {} <{}>", program, e),
                    }
                }
                println!(
                    "  signature {}",
                    signature(processor.resolver(), &programs)
                );
            }
            Ok(())
        }
        Command::FindVersion {
            program,
            argument,
            var,
        } => {
            let version = Probe::with_argument(argument).find_version(&program)?;
            let (key, value) = env_entry(&program, var.as_deref(), &version);
            println!("{}={}", key, value);
            Ok(())
        }
        Command::Status { versions } => {
            let Some(store) = open_store(&config)? else {
                bail!("the record cache is disabled in the configuration");
            };
            let processor = Processor::new(
                mode_for(config.mode, versions.global_fuzzy),
                build_resolver(&config, &versions.set)?,
                Some(store),
            )?;
            for entry in status(&processor)? {
                let output = entry
                    .output
                    .map(|o| o.display().to_string())
                    .unwrap_or_else(|| "-".to_string());
                println!("{}\t{}\t{}", entry.state.as_str(), entry.source, output);
            }
            Ok(())
        }
        Command::Forget { inputs } => {
            let Some(store) = open_store(&config)? else {
                bail!("the record cache is disabled in the configuration");
            };
            for input in inputs {
                if store.remove_record(&source_key(&input))? {
                    println!("forgot {}", input.display());
                } else {
                    println!("no record for {}", input.display());
                }
            }
            Ok(())
        }
    }
}

fn open_store(config: &FilterConfig) -> anyhow::Result<Option<Cache>> {
    if !config.cache.enabled {
        return Ok(None);
    }
    let db_path = config.cache.db_path();
    if let Some(dir) = db_path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("create data directory {}", dir.display()))?;
    }
    Ok(Some(Cache::new(&db_path)?))
}
