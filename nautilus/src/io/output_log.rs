//! The active job's output log, `output.log`.
//!
//! Lines are appended by the capture thread and read back by relays at a byte
//! offset, so memory use does not grow with the job's output. A new job gets
//! a fresh file at the same path; readers of the previous job keep their own
//! handle and are unaffected.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::os::unix::fs::FileExt;
use std::path::Path;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use tracing::warn;

use crate::core::output::{LineClass, OutputRecord, classify_line};

/// Upper bound on bytes a single `read_from` returns, unless one line is longer.
const MAX_BATCH_BYTES: usize = 64 * 1024;

const READ_CHUNK: usize = 8 * 1024;

#[derive(Debug)]
pub struct OutputLog {
    writer: Mutex<File>,
    reader: File,
}

/// Complete lines read from the log, and where the next read starts.
#[derive(Debug, PartialEq, Eq)]
pub struct LogBatch {
    pub records: Vec<OutputRecord>,
    pub next_offset: u64,
}

impl OutputLog {
    /// Start an empty log at `path`, replacing any previous file.
    pub fn create(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create output log dir {}", parent.display()))?;
        }
        match fs::remove_file(path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("remove old output log {}", path.display()));
            }
        }
        let writer = OpenOptions::new()
            .create_new(true)
            .append(true)
            .open(path)
            .with_context(|| format!("create output log {}", path.display()))?;
        let reader =
            File::open(path).with_context(|| format!("open output log {}", path.display()))?;
        Ok(Self {
            writer: Mutex::new(writer),
            reader,
        })
    }

    /// Write one line and return how it classifies.
    pub fn append(&self, raw: &str) -> LineClass {
        let mut line = Vec::with_capacity(raw.len() + 1);
        line.extend_from_slice(raw.as_bytes());
        line.push(b'\n');
        if let Err(e) = self.writer.lock().write_all(&line) {
            warn!(err = %e, "failed to write output log");
        }
        classify_line(raw)
    }

    /// Complete lines starting at byte `offset`, numbered from `first_seq`.
    ///
    /// A trailing line without its newline yet is left for the next read.
    pub fn read_from(&self, offset: u64, first_seq: u64) -> Result<LogBatch> {
        let mut buf = Vec::new();
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            let pos = offset + buf.len() as u64;
            let n = self.reader.read_at(&mut chunk, pos).context("read output log")?;
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            if buf.len() >= MAX_BATCH_BYTES && buf.contains(&b'\n') {
                break;
            }
        }

        let Some(last_newline) = buf.iter().rposition(|&b| b == b'\n') else {
            return Ok(LogBatch {
                records: Vec::new(),
                next_offset: offset,
            });
        };
        let records = buf[..last_newline]
            .split(|&b| b == b'\n')
            .zip(first_seq..)
            .map(|(line, seq)| {
                OutputRecord::new(seq, String::from_utf8_lossy(line).into_owned())
            })
            .collect();
        let complete = last_newline + 1;

        Ok(LogBatch {
            records,
            next_offset: offset + complete as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::output::Color;

    fn log_in(temp: &tempfile::TempDir) -> OutputLog {
        OutputLog::create(&temp.path().join("state").join("output.log")).expect("create")
    }

    #[test]
    fn read_from_follows_appends_in_order() {
        let temp = tempfile::tempdir().expect("tempdir");
        let log = log_in(&temp);
        log.append("first");
        log.append("[green] second");

        let batch = log.read_from(0, 0).expect("read");
        assert_eq!(batch.records.len(), 2);
        assert_eq!(batch.records[0].raw, "first");
        assert_eq!(batch.records[1].seq, 1);
        assert_eq!(batch.records[1].class, LineClass::Colored(Color::Green));

        log.append("third");
        let batch = log.read_from(batch.next_offset, 2).expect("read");
        let raws: Vec<&str> = batch.records.iter().map(|r| r.raw.as_str()).collect();
        assert_eq!(raws, vec!["third"]);
        assert_eq!(batch.records[0].seq, 2);

        let empty = log.read_from(batch.next_offset, 3).expect("read");
        assert!(empty.records.is_empty());
        assert_eq!(empty.next_offset, batch.next_offset);
    }

    #[test]
    fn append_classifies_the_line() {
        let temp = tempfile::tempdir().expect("tempdir");
        let log = log_in(&temp);
        let class = log.append("[PROMPT:confirm:0] Proceed?");
        assert!(matches!(class, LineClass::Prompt(_)));
    }

    #[test]
    fn partial_line_waits_for_its_newline() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("output.log");
        let log = OutputLog::create(&path).expect("create");
        log.append("whole");
        OpenOptions::new()
            .append(true)
            .open(&path)
            .and_then(|mut f| f.write_all(b"half"))
            .expect("write partial");

        let batch = log.read_from(0, 0).expect("read");
        assert_eq!(batch.records.len(), 1);
        assert_eq!(batch.next_offset, 6);
    }

    #[test]
    fn large_output_is_read_in_bounded_batches() {
        let temp = tempfile::tempdir().expect("tempdir");
        let log = log_in(&temp);
        let line = "x".repeat(1000);
        for _ in 0..200 {
            log.append(&line);
        }

        let mut offset = 0;
        let mut seq = 0;
        let mut batches = 0;
        loop {
            let batch = log.read_from(offset, seq).expect("read");
            if batch.records.is_empty() {
                break;
            }
            assert!(batch.records.iter().all(|r| r.raw == line));
            seq += batch.records.len() as u64;
            offset = batch.next_offset;
            batches += 1;
        }
        assert_eq!(seq, 200);
        assert!(batches > 1);
    }

    #[test]
    fn new_log_replaces_file_but_old_reader_keeps_its_lines() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("output.log");
        fs::write(&path, "stale output\n").expect("seed");

        let old = OutputLog::create(&path).expect("create old");
        old.append("old job");
        let new = OutputLog::create(&path).expect("create new");
        new.append("new job");

        assert_eq!(fs::read_to_string(&path).expect("read"), "new job\n");
        let batch = old.read_from(0, 0).expect("read old");
        assert_eq!(batch.records[0].raw, "old job");
    }
}
