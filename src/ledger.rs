//! Transaction id lists for re-running a load on its failures.
//!
//! The failure ledger is a plain text file with one transaction id per line.
//! The same format is read back by `--only-ids` to restrict a later run to
//! exactly those records.

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::{LoadError, Result};
use crate::writer::WriteOutcome;

pub struct FailureLedger {
    path: PathBuf,
    out: BufWriter<File>,
    written: u64,
}

impl FailureLedger {
    /// Create (or truncate) the ledger at `path`.
    pub fn create(path: &Path) -> Result<Self> {
        let bad = |e: io::Error| LoadError::invalid_config("failed_ids", format!("{}: {e}", path.display()));
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(bad)?;
        }
        let file = File::create(path).map_err(bad)?;
        Ok(Self {
            path: path.to_path_buf(),
            out: BufWriter::new(file),
            written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Ids recorded so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Append the id of every failed or cancelled outcome.
    pub fn record(&mut self, outcomes: &[WriteOutcome]) -> io::Result<u64> {
        self.record_ids(outcomes.iter().filter_map(WriteOutcome::unwritten_id))
    }

    /// Append ids as they are, e.g. records never handed to the writer.
    pub fn record_ids<'a>(&mut self, ids: impl IntoIterator<Item = &'a str>) -> io::Result<u64> {
        let mut n = 0;
        for id in ids {
            writeln!(self.out, "{id}")?;
            n += 1;
        }
        self.written += n;
        Ok(n)
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}

/// Read an id list. Blank lines and lines starting with `#` are skipped.
pub fn read_id_list(path: &Path) -> Result<HashSet<String>> {
    let unavailable = |e: io::Error| LoadError::SourceUnavailable {
        path: path.display().to_string(),
        message: e.to_string(),
    };
    let file = File::open(path).map_err(unavailable)?;
    let mut ids = HashSet::new();
    for line in BufReader::new(file).lines() {
        let line = line.map_err(unavailable)?;
        let id = line.trim();
        if id.is_empty() || id.starts_with('#') {
            continue;
        }
        ids.insert(id.to_string());
    }
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::FailureKind;
    use crate::writer::WriteFailure;
    use tempfile::TempDir;

    #[test]
    fn test_ledger_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("failed.txt");
        let mut ledger = FailureLedger::create(&path).unwrap();
        let outcomes = vec![
            WriteOutcome::Success,
            WriteOutcome::Failure {
                transaction_id: "T000000001".to_string(),
                cause: WriteFailure {
                    kind: FailureKind::Timeout,
                    message: "slow".to_string(),
                },
            },
            WriteOutcome::Cancelled {
                transaction_id: "T000000002".to_string(),
            },
        ];
        assert_eq!(ledger.record(&outcomes).unwrap(), 2);
        ledger.flush().unwrap();
        assert_eq!(ledger.written(), 2);

        let ids = read_id_list(&path).unwrap();
        assert_eq!(
            ids,
            HashSet::from(["T000000001".to_string(), "T000000002".to_string()])
        );
    }

    #[test]
    fn test_id_list_skips_comments_and_blanks() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ids.txt");
        fs::write(&path, "# retry list\nT1\n\n  T2  \n").unwrap();
        assert_eq!(read_id_list(&path).unwrap().len(), 2);
    }

    #[test]
    fn test_missing_id_list() {
        let err = read_id_list(Path::new("/nonexistent/ids.txt")).unwrap_err();
        assert!(matches!(err, LoadError::SourceUnavailable { .. }));
    }
}
