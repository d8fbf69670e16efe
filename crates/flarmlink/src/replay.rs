//! Simulator logs: loading, replay cursor, and capture.
//!
//! A simulator log is UTF-8 text with one record per line:
//!
//! ```text
//! 0 $PFLAV,A,7.0,7.20,ALPS_2024*6B
//! 250 $GPGGA,120000,4800.000,N,00748.000,E,1,08,0.9,300.0,M,47.0,M,,*47
//! 1000 $PFLAU,0,1,2,1,0,,0,,*60
//! ```
//!
//! The number is the delay in milliseconds since the previous record (the
//! first record's delay counts from the start of the replay). Blank lines are
//! skipped. [`CaptureWriter`] writes exactly this format, so a recorded live
//! session replays unmodified.

use std::path::{Path, PathBuf};
use std::time::Duration;

use flarmlink_core::error::{Error, Result};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::time::Instant;

/// One record of a simulator log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulatorRecord {
    /// Delay since the previous record.
    pub delay: Duration,
    /// The raw sentence line.
    pub sentence: String,
}

/// A parsed simulator log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulatorLog {
    records: Vec<SimulatorRecord>,
}

impl SimulatorLog {
    /// Parse log text. Fails on the first malformed record.
    pub fn parse(text: &str) -> Result<Self> {
        let mut records = Vec::new();
        for (index, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }
            records.push(parse_record(line).map_err(|reason| Error::SimulatorLog {
                line: index + 1,
                reason,
            })?);
        }

        if records.is_empty() {
            return Err(Error::SimulatorLog {
                line: 0,
                reason: "log contains no records".into(),
            });
        }
        Ok(Self { records })
    }

    /// Read and parse a log file.
    pub async fn load(path: &Path) -> Result<Self> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| Error::SimulatorLog {
                line: 0,
                reason: format!("cannot read {}: {}", path.display(), e),
            })?;
        let log = Self::parse(&text)?;
        tracing::debug!(
            path = %path.display(),
            records = log.len(),
            duration_ms = log.duration().as_millis(),
            "loaded simulator log"
        );
        Ok(log)
    }

    pub fn records(&self) -> &[SimulatorRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Total replay time: the sum of all delays.
    pub fn duration(&self) -> Duration {
        self.records.iter().map(|r| r.delay).sum()
    }
}

fn parse_record(line: &str) -> std::result::Result<SimulatorRecord, String> {
    let (delay, sentence) = line
        .split_once(char::is_whitespace)
        .ok_or_else(|| format!("expected '<delay_ms> <sentence>', got {:?}", line))?;
    let delay_ms: u64 = delay
        .parse()
        .map_err(|_| format!("invalid delay {:?}", delay))?;
    let sentence = sentence.trim();
    if sentence.is_empty() {
        return Err("missing sentence".into());
    }
    Ok(SimulatorRecord {
        delay: Duration::from_millis(delay_ms),
        sentence: sentence.to_string(),
    })
}

/// Position of a replay within a [`SimulatorLog`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimulatorCursor {
    next: usize,
}

impl SimulatorCursor {
    /// A cursor at the first record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Index of the next record to deliver.
    pub fn position(&self) -> usize {
        self.next
    }

    /// The next record, or `None` at end of log.
    pub fn peek<'a>(&self, log: &'a SimulatorLog) -> Option<&'a SimulatorRecord> {
        log.records.get(self.next)
    }

    /// Take the next record and move past it.
    pub fn advance<'a>(&mut self, log: &'a SimulatorLog) -> Option<&'a SimulatorRecord> {
        let record = log.records.get(self.next)?;
        self.next += 1;
        Some(record)
    }
}

/// Records live sentences as a simulator log.
///
/// Each delay is the difference between whole-millisecond offsets from the
/// first record, so the delays of a capture sum to its true length.
pub struct CaptureWriter {
    writer: BufWriter<File>,
    path: PathBuf,
    started: Option<Instant>,
    written_ms: u64,
}

impl CaptureWriter {
    /// Create (or truncate) `path` for writing.
    pub async fn create(path: &Path) -> Result<Self> {
        let file = File::create(path).await?;
        tracing::info!(path = %path.display(), "capturing sentences");
        Ok(Self {
            writer: BufWriter::new(file),
            path: path.to_path_buf(),
            started: None,
            written_ms: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one sentence received at `now`.
    pub async fn record(&mut self, sentence: &str, now: Instant) -> Result<()> {
        let started = *self.started.get_or_insert(now);
        let elapsed_ms = now.saturating_duration_since(started).as_millis() as u64;
        let delay_ms = elapsed_ms.saturating_sub(self.written_ms);
        self.written_ms = elapsed_ms.max(self.written_ms);

        let record = format!("{} {}\n", delay_ms, sentence.trim());
        self.writer.write_all(record.as_bytes()).await?;
        Ok(())
    }

    /// Flush buffered records to disk.
    pub async fn flush(&mut self) -> Result<()> {
        self.writer.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOG: &str = "\
0 $PFLAV,A,7.0,7.20,ALPS_2024*6B

250 $GPGGA,120000,4800.000,N,00748.000,E,1,08,0.9,300.0,M,47.0,M,,*47\r
1000 $PFLAU,0,1,2,1,0,,0,,*60
";

    #[test]
    fn parse_skips_blank_lines() {
        let log = SimulatorLog::parse(LOG).unwrap();
        assert_eq!(log.len(), 3);
        assert_eq!(log.records()[1].delay, Duration::from_millis(250));
        assert!(log.records()[1].sentence.ends_with("*47"));
        assert_eq!(log.duration(), Duration::from_millis(1250));
    }

    #[test]
    fn malformed_record_reports_line_number() {
        let text = "0 $PFLAV,R*33\n\nsoon $PFLAE,A,0,0*33\n";
        match SimulatorLog::parse(text) {
            Err(Error::SimulatorLog { line, reason }) => {
                assert_eq!(line, 3);
                assert!(reason.contains("invalid delay"), "{reason}");
            }
            other => panic!("expected SimulatorLog error, got {other:?}"),
        }
    }

    #[test]
    fn record_without_sentence_rejected() {
        assert!(matches!(
            SimulatorLog::parse("0 $PFLAV,R*33\n250\n"),
            Err(Error::SimulatorLog { line: 2, .. })
        ));
    }

    #[test]
    fn negative_delay_rejected() {
        assert!(matches!(
            SimulatorLog::parse("-5 $PFLAV,R*33\n"),
            Err(Error::SimulatorLog { line: 1, .. })
        ));
    }

    #[test]
    fn empty_log_rejected() {
        assert!(matches!(
            SimulatorLog::parse("\n  \n"),
            Err(Error::SimulatorLog { line: 0, .. })
        ));
    }

    #[test]
    fn cursor_walks_records() {
        let log = SimulatorLog::parse(LOG).unwrap();
        let mut cursor = SimulatorCursor::new();
        assert_eq!(cursor.peek(&log).map(|r| r.delay), Some(Duration::ZERO));

        let mut sentences = Vec::new();
        while let Some(record) = cursor.advance(&log) {
            sentences.push(record.sentence.clone());
        }
        assert_eq!(sentences.len(), 3);
        assert_eq!(cursor.position(), 3);
        assert!(cursor.peek(&log).is_none());
    }

    #[tokio::test]
    async fn load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = SimulatorLog::load(&dir.path().join("missing.log"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::SimulatorLog { line: 0, .. }), "{err}");
    }

    #[tokio::test]
    async fn capture_replays_unmodified() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capture.log");

        let mut capture = CaptureWriter::create(&path).await.unwrap();
        let start = Instant::now();
        capture
            .record("$PFLAV,A,7.0,7.20,ALPS_2024*6B\r", start)
            .await
            .unwrap();
        capture
            .record("$PFLAE,A,0,0*33", start + Duration::from_millis(400))
            .await
            .unwrap();
        capture
            .record("$PFLAU,0,1,2,1,0,,0,,*60", start + Duration::from_millis(1400))
            .await
            .unwrap();
        capture.flush().await.unwrap();
        assert_eq!(capture.path(), path.as_path());

        let log = SimulatorLog::load(&path).await.unwrap();
        let delays: Vec<u64> = log
            .records()
            .iter()
            .map(|r| r.delay.as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![0, 400, 1000]);
        assert_eq!(log.records()[0].sentence, "$PFLAV,A,7.0,7.20,ALPS_2024*6B");
    }
}
