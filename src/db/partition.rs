//! Append-only JSONL log partitioned by UTC calendar day.
//!
//! Each partition is a file named `YYYY-MM-DD.jsonl` holding one JSON record
//! per line. A record becomes visible to readers only once its terminating
//! newline has been written.

use chrono::{DateTime, NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, ErrorKind, Read, Seek, SeekFrom, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;

const PARTITION_EXT: &str = "jsonl";

/// Storage error types.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("store lock poisoned")]
    Poisoned,
}

impl DbError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        DbError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// A record that can live in a day-partitioned log.
pub trait Record: Serialize + DeserializeOwned {
    /// Timestamp used for partitioning and windowing.
    fn timestamp(&self) -> DateTime<Utc>;
}

/// Day-partitioned append-only log of `T` records.
pub struct PartitionedLog<T> {
    dir: PathBuf,
    write_lock: Mutex<()>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Record> PartitionedLog<T> {
    /// Open (and create if needed) a log rooted at `dir`.
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self, DbError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|e| DbError::io(&dir, e))?;
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
            _marker: PhantomData,
        })
    }

    /// Path of the partition file for `date`.
    pub fn partition_path(&self, date: NaiveDate) -> PathBuf {
        self.dir.join(format!("{}.{}", date.format("%Y-%m-%d"), PARTITION_EXT))
    }

    /// Append records, each to the partition of its own UTC date.
    ///
    /// Arrival order is preserved within a partition.
    pub fn append(&self, records: &[T]) -> Result<(), DbError> {
        if records.is_empty() {
            return Ok(());
        }

        let mut by_day: BTreeMap<NaiveDate, Vec<Vec<u8>>> = BTreeMap::new();
        for record in records {
            let mut line = serde_json::to_vec(record)?;
            line.push(b'\n');
            by_day
                .entry(record.timestamp().date_naive())
                .or_default()
                .push(line);
        }

        let _guard = self.write_lock.lock().map_err(|_| DbError::Poisoned)?;

        for (date, lines) in by_day {
            let path = self.partition_path(date);
            let mut file = OpenOptions::new()
                .create(true)
                .read(true)
                .append(true)
                .open(&path)
                .map_err(|e| DbError::io(&path, e))?;

            // Terminate a fragment left by an interrupted write so it cannot
            // swallow the first new record.
            if ends_mid_record(&mut file).map_err(|e| DbError::io(&path, e))? {
                tracing::warn!("Terminating torn record at end of {}", path.display());
                file.write_all(b"\n").map_err(|e| DbError::io(&path, e))?;
            }

            // One write per record keeps each line whole under O_APPEND.
            for line in &lines {
                file.write_all(line).map_err(|e| DbError::io(&path, e))?;
            }
            file.sync_data().map_err(|e| DbError::io(&path, e))?;
        }

        Ok(())
    }

    /// Load every complete record of one partition, in file order.
    ///
    /// A missing partition yields an empty list.
    pub fn load_partition(&self, date: NaiveDate) -> Result<Vec<T>, DbError> {
        let path = self.partition_path(date);
        let file = match File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(DbError::io(&path, e)),
        };

        let mut reader = BufReader::new(file);
        let mut records = Vec::new();
        let mut line = String::new();
        let mut line_no = 0usize;

        loop {
            line.clear();
            let n = reader
                .read_line(&mut line)
                .map_err(|e| DbError::io(&path, e))?;
            if n == 0 || !line.ends_with('\n') {
                // EOF, or a record still being written.
                break;
            }
            line_no += 1;

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str(trimmed) {
                Ok(record) => records.push(record),
                Err(e) => tracing::warn!(
                    "Skipping malformed record {}:{}: {}",
                    path.display(),
                    line_no,
                    e
                ),
            }
        }

        Ok(records)
    }

    /// Load records with timestamps in `[start, end]`, most recent first.
    ///
    /// Reads only the partitions on disk whose date the range touches.
    pub fn load_range(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<T>, DbError> {
        if start > end {
            return Ok(Vec::new());
        }

        let (first_day, last_day) = (start.date_naive(), end.date_naive());
        let mut records = Vec::new();

        for day in self.partitions()? {
            if day < first_day || day > last_day {
                continue;
            }
            records.extend(
                self.load_partition(day)?
                    .into_iter()
                    .filter(|r| {
                        let ts = r.timestamp();
                        ts >= start && ts <= end
                    }),
            );
        }

        records.sort_by(|a, b| b.timestamp().cmp(&a.timestamp()));
        Ok(records)
    }

    /// Dates of all partitions currently on disk, ascending.
    pub fn partitions(&self) -> Result<Vec<NaiveDate>, DbError> {
        let entries = fs::read_dir(&self.dir).map_err(|e| DbError::io(&self.dir, e))?;

        let mut dates = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| DbError::io(&self.dir, e))?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(PARTITION_EXT) {
                continue;
            }
            if let Some(date) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
            {
                dates.push(date);
            }
        }

        dates.sort();
        Ok(dates)
    }

    /// Delete partitions dated strictly before `cutoff`. Returns how many went.
    pub fn remove_before(&self, cutoff: NaiveDate) -> Result<usize, DbError> {
        let _guard = self.write_lock.lock().map_err(|_| DbError::Poisoned)?;

        let mut removed = 0;
        for date in self.partitions()? {
            if date >= cutoff {
                continue;
            }
            let path = self.partition_path(date);
            fs::remove_file(&path).map_err(|e| DbError::io(&path, e))?;
            removed += 1;
        }
        Ok(removed)
    }
}

fn ends_mid_record(file: &mut File) -> std::io::Result<bool> {
    let len = file.metadata()?.len();
    if len == 0 {
        return Ok(false);
    }
    file.seek(SeekFrom::Start(len - 1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] != b'\n')
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Entry {
        id: u32,
        at: DateTime<Utc>,
    }

    impl Record for Entry {
        fn timestamp(&self) -> DateTime<Utc> {
            self.at
        }
    }

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    #[test]
    fn test_append_partitions_by_record_date() {
        let tmp = tempfile::tempdir().unwrap();
        let log: PartitionedLog<Entry> = PartitionedLog::open(tmp.path()).unwrap();

        let entries = vec![
            Entry { id: 1, at: at(2024, 3, 1, 23, 59) },
            Entry { id: 2, at: at(2024, 3, 2, 0, 1) },
            Entry { id: 3, at: at(2024, 3, 1, 23, 58) },
        ];
        log.append(&entries).unwrap();

        let day1 = log.load_partition(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()).unwrap();
        let ids: Vec<u32> = day1.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![1, 3]);

        let day2 = log.load_partition(NaiveDate::from_ymd_opt(2024, 3, 2).unwrap()).unwrap();
        assert_eq!(day2.len(), 1);
        assert_eq!(log.partitions().unwrap().len(), 2);
    }

    #[test]
    fn test_missing_partition_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let log: PartitionedLog<Entry> = PartitionedLog::open(tmp.path()).unwrap();
        let day = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        assert!(log.load_partition(day).unwrap().is_empty());
    }

    #[test]
    fn test_partial_and_malformed_lines_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        let log: PartitionedLog<Entry> = PartitionedLog::open(tmp.path()).unwrap();
        let day = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();

        log.append(&[Entry { id: 1, at: at(2024, 3, 1, 10, 0) }]).unwrap();

        let mut file = OpenOptions::new()
            .append(true)
            .open(log.partition_path(day))
            .unwrap();
        file.write_all(b"not json\n\n").unwrap();
        file.write_all(br#"{"id": 2, "at": "2024-03-01T1"#).unwrap();

        let loaded = log.load_partition(day).unwrap();
        assert_eq!(loaded, vec![Entry { id: 1, at: at(2024, 3, 1, 10, 0) }]);
    }

    #[test]
    fn test_append_after_torn_tail_keeps_new_record() {
        let tmp = tempfile::tempdir().unwrap();
        let log: PartitionedLog<Entry> = PartitionedLog::open(tmp.path()).unwrap();
        let day = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();

        log.append(&[Entry { id: 1, at: at(2024, 3, 1, 10, 0) }]).unwrap();
        let mut file = OpenOptions::new()
            .append(true)
            .open(log.partition_path(day))
            .unwrap();
        file.write_all(br#"{"id": 2, "at": "#).unwrap();
        drop(file);

        log.append(&[Entry { id: 3, at: at(2024, 3, 1, 11, 0) }]).unwrap();
        log.append(&[Entry { id: 4, at: at(2024, 3, 1, 12, 0) }]).unwrap();

        let ids: Vec<u32> = log.load_partition(day).unwrap().iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![1, 3, 4]);

        // Only the torn record was terminated; no blank lines accumulate.
        let raw = fs::read_to_string(log.partition_path(day)).unwrap();
        assert_eq!(raw.lines().count(), 4);
    }

    #[test]
    fn test_load_range_reads_only_existing_partitions() {
        let tmp = tempfile::tempdir().unwrap();
        let log: PartitionedLog<Entry> = PartitionedLog::open(tmp.path()).unwrap();

        log.append(&[Entry { id: 1, at: at(2024, 3, 1, 12, 0) }]).unwrap();
        fs::write(tmp.path().join("notes.txt"), "ignored").unwrap();

        let loaded = log
            .load_range(DateTime::<Utc>::MIN_UTC, at(2024, 3, 2, 0, 0))
            .unwrap();
        assert_eq!(loaded.len(), 1);

        let none = log
            .load_range(at(2024, 3, 2, 0, 0), DateTime::<Utc>::MAX_UTC)
            .unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn test_load_range_spans_midnight_and_sorts_descending() {
        let tmp = tempfile::tempdir().unwrap();
        let log: PartitionedLog<Entry> = PartitionedLog::open(tmp.path()).unwrap();

        log.append(&[
            Entry { id: 1, at: at(2024, 3, 1, 22, 0) },
            Entry { id: 2, at: at(2024, 3, 1, 23, 45) },
            Entry { id: 3, at: at(2024, 3, 2, 0, 20) },
            Entry { id: 4, at: at(2024, 3, 2, 0, 10) },
        ])
        .unwrap();

        let loaded = log
            .load_range(at(2024, 3, 1, 23, 30), at(2024, 3, 2, 0, 30))
            .unwrap();
        let ids: Vec<u32> = loaded.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![3, 4, 2]);
    }

    #[test]
    fn test_load_range_covers_more_than_two_days() {
        let tmp = tempfile::tempdir().unwrap();
        let log: PartitionedLog<Entry> = PartitionedLog::open(tmp.path()).unwrap();

        log.append(&[
            Entry { id: 1, at: at(2024, 3, 1, 12, 0) },
            Entry { id: 2, at: at(2024, 3, 3, 12, 0) },
        ])
        .unwrap();

        let loaded = log
            .load_range(at(2024, 3, 1, 0, 0), at(2024, 3, 3, 23, 0))
            .unwrap();
        assert_eq!(loaded.len(), 2);
    }

    #[test]
    fn test_remove_before() {
        let tmp = tempfile::tempdir().unwrap();
        let log: PartitionedLog<Entry> = PartitionedLog::open(tmp.path()).unwrap();

        log.append(&[
            Entry { id: 1, at: at(2024, 3, 1, 12, 0) },
            Entry { id: 2, at: at(2024, 3, 2, 12, 0) },
            Entry { id: 3, at: at(2024, 3, 3, 12, 0) },
        ])
        .unwrap();

        let removed = log
            .remove_before(NaiveDate::from_ymd_opt(2024, 3, 3).unwrap())
            .unwrap();
        assert_eq!(removed, 2);
        assert_eq!(
            log.partitions().unwrap(),
            vec![NaiveDate::from_ymd_opt(2024, 3, 3).unwrap()]
        );
    }
}
