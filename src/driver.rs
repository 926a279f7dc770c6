//! Command-line driver logic
//!
//! Everything the `verfilter` binary does besides argument parsing and
//! printing: assembling the resolver from config, `--set` and probes, turning
//! inputs into tasks, running them on worker threads, and reporting the state
//! of recorded sources.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::{info, warn};

use crate::config::{FilterConfig, LoggingConfig, ProbeConfig};
use crate::probe::env_entry;
use crate::task::{Outcome, Processor, Task};
use crate::version::cache::RecordStore;
use crate::version::error::{ConfigError, FilterError, TaskError};
use crate::version::operator::Mode;
use crate::version::resolver::{EnvironmentVersions, Resolver, parse_versions};
use crate::version::tracker::sha256_hex;
use crate::version::value::Version;

/// Parse a `PROGRAM=VERSION` assignment. The version is validated later.
pub fn parse_assignment(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((program, version)) if !program.is_empty() && !version.is_empty() => {
            Ok((program.to_string(), version.to_string()))
        }
        _ => Err(format!("expected PROGRAM=VERSION, got {:?}", s)),
    }
}

/// Configured versions with command-line assignments layered on top.
pub fn explicit_versions(
    configured: &HashMap<String, String>,
    assignments: &[(String, String)],
) -> Result<HashMap<String, Version>, FilterError> {
    let mut raw = configured.clone();
    raw.extend(assignments.iter().cloned());
    parse_versions(&raw)
}

/// Run the configured probes, returning the environment entries they found.
///
/// A probe that fails is only logged; markers needing its program then fail
/// with a missing version.
pub fn probe_entries(probes: &[ProbeConfig]) -> Result<Vec<(String, String)>, ConfigError> {
    let mut entries = Vec::new();
    for probe_cfg in probes {
        let probe = probe_cfg.probe().map_err(|source| ConfigError::Pattern {
            program: probe_cfg.program.clone(),
            source,
        })?;
        match probe.find_version(&probe_cfg.program) {
            Ok(version) => {
                let entry = env_entry(&probe_cfg.program, probe_cfg.var.as_deref(), &version);
                info!("Found {} {} ({})", probe_cfg.program, version, entry.0);
                entries.push(entry);
            }
            Err(e) => warn!("{}", e),
        }
    }
    Ok(entries)
}

/// Default resolver chain; probe results replace inherited variables.
pub fn resolver_from(
    explicit: HashMap<String, Version>,
    mut env: EnvironmentVersions,
    probed: Vec<(String, String)>,
) -> Resolver {
    for (key, value) in probed {
        env.set(key, value);
    }
    Resolver::with_defaults(explicit, env)
}

/// Resolver over config versions, `--set` assignments, the process
/// environment and the configured probes.
pub fn build_resolver(
    config: &FilterConfig,
    assignments: &[(String, String)],
) -> Result<Resolver, ConfigError> {
    let explicit = explicit_versions(&config.versions, assignments)?;
    let probed = probe_entries(&config.probes)?;
    Ok(resolver_from(
        explicit,
        EnvironmentVersions::from_process_env(),
        probed,
    ))
}

pub fn mode_for(configured: Mode, global_fuzzy: bool) -> Mode {
    if global_fuzzy { Mode::Global } else { configured }
}

/// Logging config after `-v` flags; `default_file` applies when the config
/// names no log file.
pub fn logging_config(
    cfg: &LoggingConfig,
    verbose: u8,
    default_file: Option<PathBuf>,
) -> LoggingConfig {
    let mut cfg = cfg.clone();
    match verbose {
        0 => {}
        1 => cfg.level = "info".to_string(),
        2 => cfg.level = "debug".to_string(),
        _ => cfg.level = "trace".to_string(),
    }
    if cfg.file.is_none() {
        cfg.file = default_file;
    }
    cfg
}

/// Tasks for the given inputs; an explicit output needs a single input.
pub fn tasks_for(inputs: Vec<PathBuf>, output: Option<PathBuf>) -> Result<Vec<Task>, TaskError> {
    match output {
        Some(output) => {
            let [input] = <[PathBuf; 1]>::try_from(inputs)
                .map_err(|inputs| TaskError::AmbiguousOutput(inputs.len()))?;
            Ok(vec![Task::new(input, output)])
        }
        None => inputs.into_iter().map(Task::for_input).collect(),
    }
}

/// Run every task on a pool of scoped worker threads sharing the processor.
///
/// Results come back in task order.
pub fn run_tasks<S: RecordStore>(
    processor: &Processor<S>,
    tasks: &[Task],
) -> Vec<Result<Outcome, TaskError>> {
    let workers = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .min(tasks.len())
        .max(1);
    let next = &AtomicUsize::new(0);

    let mut results: Vec<(usize, Result<Outcome, TaskError>)> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..workers)
            .map(|_| {
                scope.spawn(move || {
                    let mut done = Vec::new();
                    loop {
                        let i = next.fetch_add(1, Ordering::Relaxed);
                        let Some(task) = tasks.get(i) else {
                            break;
                        };
                        done.push((i, processor.run(task)));
                    }
                    done
                })
            })
            .collect();
        handles
            .into_iter()
            .flat_map(|h| h.join().unwrap_or_else(|e| std::panic::resume_unwind(e)))
            .collect()
    });
    results.sort_by_key(|(i, _)| *i);
    results.into_iter().map(|(_, result)| result).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceState {
    UpToDate,
    Stale,
    InputMissing,
}

impl SourceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceState::UpToDate => "up to date",
            SourceState::Stale => "stale",
            SourceState::InputMissing => "input missing",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceStatus {
    pub source: String,
    /// Output recorded for the source; `None` for records that predate it
    pub output: Option<PathBuf>,
    pub state: SourceState,
}

/// State of every recorded source, judged against its recorded output.
pub fn status<S: RecordStore>(processor: &Processor<S>) -> Result<Vec<SourceStatus>, TaskError> {
    let Some(store) = processor.store() else {
        return Ok(Vec::new());
    };

    let mut statuses = Vec::new();
    for source in store.list_sources()? {
        let Some(record) = store.get_record(&source)? else {
            continue;
        };
        let output = (!record.output.is_empty()).then(|| PathBuf::from(&record.output));

        let state = match (std::fs::read(Path::new(&source)), &output) {
            (Err(_), _) => SourceState::InputMissing,
            (Ok(_), None) => SourceState::Stale,
            (Ok(bytes), Some(output)) => {
                if processor.is_up_to_date(&source, &sha256_hex(&bytes), output)? {
                    SourceState::UpToDate
                } else {
                    SourceState::Stale
                }
            }
        };
        statuses.push(SourceStatus {
            source,
            output,
            state,
        });
    }
    Ok(statuses)
}
