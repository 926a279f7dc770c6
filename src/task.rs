//! Processing of a single `.ver` file
//!
//! A [`Processor`] reads the input, decides whether the existing output is
//! still valid, filters the text, replaces the output atomically, and stores
//! the dependency record for the next run.

use std::collections::BTreeSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::version::cache::{RecordStore, StoredRecord};
use crate::version::error::{FilterError, TaskError};
use crate::version::filter::{Filtered, LineFilter};
use crate::version::marker::MarkerGrammar;
use crate::version::operator::{Mode, OperatorSet};
use crate::version::resolver::Resolver;
use crate::version::tracker::{DependencyRecord, sha256_hex};

/// Extension of files carrying version markers
pub const SOURCE_EXTENSION: &str = "ver";

/// Output path for a marker file: `script.sh.ver` becomes `script.sh`.
pub fn output_for(input: &Path) -> Option<PathBuf> {
    match input.extension() {
        Some(ext) if ext == SOURCE_EXTENSION => Some(input.with_extension("")),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub input: PathBuf,
    pub output: PathBuf,
}

impl Task {
    pub fn new(input: PathBuf, output: PathBuf) -> Self {
        Self { input, output }
    }

    /// Task writing next to the input, with the `.ver` extension removed.
    pub fn for_input(input: PathBuf) -> Result<Self, TaskError> {
        let output = output_for(&input).ok_or_else(|| TaskError::NoOutput(input.clone()))?;
        Ok(Self { input, output })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The output was (re)written
    Written { programs: BTreeSet<String> },
    /// Nothing changed since the stored record
    UpToDate,
}

pub struct Processor<S: RecordStore> {
    mode: Mode,
    grammar: MarkerGrammar,
    resolver: Resolver,
    store: Option<S>,
    force: bool,
}

impl<S: RecordStore> Processor<S> {
    pub fn new(mode: Mode, resolver: Resolver, store: Option<S>) -> Result<Self, FilterError> {
        Ok(Self {
            mode,
            grammar: MarkerGrammar::new(OperatorSet::for_mode(mode))?,
            resolver,
            store,
            force: false,
        })
    }

    /// Re-process even when the stored record says the output is current.
    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    pub fn store(&self) -> Option<&S> {
        self.store.as_ref()
    }

    /// Filter text without touching the filesystem or the store.
    pub fn filter(&self, text: &str) -> Result<Filtered, FilterError> {
        LineFilter::new(&self.grammar, &self.resolver).process_text(text)
    }

    /// Programs the markers of `text` refer to; versions are not resolved.
    pub fn referenced_programs(&self, text: &str) -> Result<BTreeSet<String>, FilterError> {
        self.grammar.referenced_programs(text)
    }

    pub fn run(&self, task: &Task) -> Result<Outcome, TaskError> {
        let text = fs::read_to_string(&task.input).map_err(|source| TaskError::Io {
            path: task.input.clone(),
            source,
        })?;
        let source_key = source_key(&task.input);
        let output_key = output_key(&task.output);
        let input_hash = sha256_hex(text.as_bytes());

        if !self.force && self.is_up_to_date(&source_key, &input_hash, &task.output)? {
            debug!("{} is up to date", task.output.display());
            return Ok(Outcome::UpToDate);
        }

        let filtered = self.filter(&text)?;
        write_atomic(&task.output, filtered.text().as_bytes())?;
        info!(
            "Wrote {} ({} lines)",
            task.output.display(),
            filtered.lines.len()
        );

        if let Some(store) = &self.store {
            let record = StoredRecord {
                input_hash,
                output: output_key,
                mode: self.mode,
                dependencies: DependencyRecord::capture(&self.resolver, filtered.programs.clone()),
            };
            store.replace_record(&source_key, &record)?;
        }

        Ok(Outcome::Written {
            programs: filtered.programs,
        })
    }

    /// Whether the stored record proves the current output would not change.
    pub fn is_up_to_date(
        &self,
        source_key: &str,
        input_hash: &str,
        output: &Path,
    ) -> Result<bool, TaskError> {
        let Some(store) = &self.store else {
            return Ok(false);
        };
        let Some(record) = store.get_record(source_key)? else {
            debug!("No record for {}", source_key);
            return Ok(false);
        };

        if record.input_hash != input_hash {
            debug!("Input of {} changed", source_key);
            return Ok(false);
        }
        if record.output != output_key(output) {
            debug!(
                "Output of {} moved from {} to {}",
                source_key,
                record.output,
                output.display()
            );
            return Ok(false);
        }
        if record.mode != self.mode {
            debug!(
                "Mode of {} changed from {} to {}",
                source_key,
                record.mode.as_str(),
                self.mode.as_str()
            );
            return Ok(false);
        }
        if !output.exists() {
            debug!("Output {} is missing", output.display());
            return Ok(false);
        }
        if !record.dependencies.is_current(&self.resolver) {
            debug!(
                "Versions referenced by {} changed: {:?}",
                source_key, record.dependencies.programs
            );
            return Ok(false);
        }
        Ok(true)
    }
}

/// Key under which records for `input` are stored.
pub fn source_key(input: &Path) -> String {
    fs::canonicalize(input)
        .unwrap_or_else(|_| input.to_path_buf())
        .display()
        .to_string()
}

/// Key under which the output of a record is stored.
///
/// The output may not exist yet, so only its directory is canonicalized.
pub fn output_key(output: &Path) -> String {
    if let Ok(path) = fs::canonicalize(output) {
        return path.display().to_string();
    }
    let dir = match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    match (fs::canonicalize(dir), output.file_name()) {
        (Ok(dir), Some(name)) => dir.join(name).display().to_string(),
        _ => output.display().to_string(),
    }
}

/// Replace `path` with `contents` in one step, leaving it untouched on failure.
fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), TaskError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let io_err = |source: std::io::Error| TaskError::Io {
        path: path.to_path_buf(),
        source,
    };

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(io_err)?;
    tmp.write_all(contents).map_err(io_err)?;

    // Temporary files are created 0600; keep the mode of the file being
    // replaced, or use the usual 0644 for new outputs.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = fs::metadata(path)
            .map(|m| m.permissions().mode())
            .unwrap_or(0o644);
        tmp.as_file()
            .set_permissions(fs::Permissions::from_mode(mode))
            .map_err(io_err)?;
    }

    tmp.persist(path).map_err(|e| TaskError::Persist {
        path: path.to_path_buf(),
        source: e.error,
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::cache::MockRecordStore;
    use crate::version::resolver::EnvironmentVersions;
    use crate::version::value::Version;
    use rstest::rstest;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn resolver(versions: &[(&str, &str)]) -> Resolver {
        let explicit = versions
            .iter()
            .map(|(k, v)| (k.to_string(), Version::parse(v).unwrap()))
            .collect();
        Resolver::with_defaults(explicit, EnvironmentVersions::new(HashMap::new()))
    }

    #[rstest]
    #[case("run.sh.ver", Some("run.sh"))]
    #[case("dir/config.ver", Some("dir/config"))]
    #[case("notes.txt", None)]
    #[case("ver", None)]
    fn output_for_strips_ver_extension(#[case] input: &str, #[case] expected: Option<&str>) {
        assert_eq!(output_for(Path::new(input)), expected.map(PathBuf::from));
    }

    #[test]
    fn task_for_input_rejects_files_without_ver_extension() {
        let err = Task::for_input(PathBuf::from("plain.txt")).unwrap_err();

        assert!(matches!(err, TaskError::NoOutput(_)));
    }

    #[test]
    fn run_writes_filtered_output_and_stores_record() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("run.sh.ver");
        fs::write(&input, "#!/bin/sh\n@bash>=5@echo new\n@bash<5@echo old\n").unwrap();

        let mut store = MockRecordStore::new();
        store.expect_get_record().returning(|_| Ok(None));
        store
            .expect_replace_record()
            .withf(|_, record| {
                record.mode == Mode::Marker
                    && record.dependencies.programs == BTreeSet::from(["bash".to_string()])
            })
            .times(1)
            .returning(|_, _| Ok(()));

        let processor =
            Processor::new(Mode::Marker, resolver(&[("bash", "5.2")]), Some(store)).unwrap();
        let task = Task::for_input(input).unwrap();

        let outcome = processor.run(&task).unwrap();

        assert_eq!(
            outcome,
            Outcome::Written {
                programs: BTreeSet::from(["bash".to_string()])
            }
        );
        assert_eq!(fs::read_to_string(&task.output).unwrap(), "#!/bin/sh\necho new");
    }

    #[test]
    fn run_without_store_always_writes() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("a.ver");
        fs::write(&input, "plain").unwrap();
        let processor: Processor<MockRecordStore> =
            Processor::new(Mode::Marker, resolver(&[]), None).unwrap();
        let task = Task::for_input(input).unwrap();

        assert!(matches!(processor.run(&task).unwrap(), Outcome::Written { .. }));
        assert!(matches!(processor.run(&task).unwrap(), Outcome::Written { .. }));
    }

    #[test]
    fn run_leaves_previous_output_untouched_on_error() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("a.ver");
        let output = temp_dir.path().join("a");
        fs::write(&input, "@missing>1@line").unwrap();
        fs::write(&output, "previous").unwrap();

        let mut store = MockRecordStore::new();
        store.expect_get_record().returning(|_| Ok(None));
        store.expect_replace_record().never();

        let processor = Processor::new(Mode::Marker, resolver(&[]), Some(store)).unwrap();

        let err = processor.run(&Task::new(input, output.clone())).unwrap_err();

        assert!(matches!(
            err,
            TaskError::Filter(FilterError::MissingVersion(ref p)) if p == "missing"
        ));
        assert_eq!(fs::read_to_string(&output).unwrap(), "previous");
    }

    #[test]
    fn run_skips_when_record_matches() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("a.ver");
        let output = temp_dir.path().join("a");
        let text = "@bash>=4@x";
        fs::write(&input, text).unwrap();
        fs::write(&output, "x").unwrap();

        let resolver = resolver(&[("bash", "5")]);
        let record = StoredRecord {
            input_hash: sha256_hex(text.as_bytes()),
            output: output_key(&output),
            mode: Mode::Marker,
            dependencies: DependencyRecord::capture(
                &resolver,
                BTreeSet::from(["bash".to_string()]),
            ),
        };

        let mut store = MockRecordStore::new();
        store
            .expect_get_record()
            .returning(move |_| Ok(Some(record.clone())));
        store.expect_replace_record().never();

        let processor = Processor::new(Mode::Marker, resolver, Some(store)).unwrap();

        assert_eq!(
            processor.run(&Task::new(input, output)).unwrap(),
            Outcome::UpToDate
        );
    }

    #[test]
    fn run_rewrites_when_record_names_another_output() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("a.ver");
        let other = temp_dir.path().join("other");
        let output = temp_dir.path().join("a");
        let text = "@bash>=4@x";
        fs::write(&input, text).unwrap();
        fs::write(&other, "x").unwrap();
        fs::write(&output, "stale").unwrap();

        let resolver = resolver(&[("bash", "5")]);
        let record = StoredRecord {
            input_hash: sha256_hex(text.as_bytes()),
            output: output_key(&other),
            mode: Mode::Marker,
            dependencies: DependencyRecord::capture(
                &resolver,
                BTreeSet::from(["bash".to_string()]),
            ),
        };

        let mut store = MockRecordStore::new();
        store
            .expect_get_record()
            .returning(move |_| Ok(Some(record.clone())));
        store.expect_replace_record().times(1).returning(|_, _| Ok(()));

        let processor = Processor::new(Mode::Marker, resolver, Some(store)).unwrap();

        assert!(matches!(
            processor.run(&Task::new(input, output.clone())).unwrap(),
            Outcome::Written { .. }
        ));
        assert_eq!(fs::read_to_string(&output).unwrap(), "x");
    }

    #[test]
    fn output_key_matches_before_and_after_the_file_exists() {
        let temp_dir = TempDir::new().unwrap();
        let output = temp_dir.path().join("a");

        let before = output_key(&output);
        fs::write(&output, "x").unwrap();

        assert_eq!(before, output_key(&output));
    }

    #[test]
    fn force_reprocesses_even_when_record_matches() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("a.ver");
        let output = temp_dir.path().join("a");
        fs::write(&input, "x").unwrap();
        fs::write(&output, "stale").unwrap();

        let mut store = MockRecordStore::new();
        store.expect_get_record().never();
        store.expect_replace_record().times(1).returning(|_, _| Ok(()));

        let processor = Processor::new(Mode::Marker, resolver(&[]), Some(store))
            .unwrap()
            .force(true);

        assert!(matches!(
            processor.run(&Task::new(input, output.clone())).unwrap(),
            Outcome::Written { .. }
        ));
        assert_eq!(fs::read_to_string(&output).unwrap(), "x");
    }
}
