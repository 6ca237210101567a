//! Run persistence.
//!
//! Every debate run appends to a JSONL log, one record per line, flushed as
//! soon as it is written. A crash mid-debate therefore leaves a readable
//! partial log ending at the last completed turn, followed (when the
//! orchestrator gets the chance) by a terminal `failed` record.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use rand::RngExt;
use serde_json::json;

use crate::debate::Turn;
use crate::error::StorageError;
use crate::judge::Verdict;

/// Sink for debate run records.
///
/// Implementations must persist each record before returning, so that a
/// partial run is always recoverable up to the last completed turn.
pub trait TranscriptStore: Send {
    /// Record the start of a run: identity, question, roster, round count.
    fn record_start(
        &mut self,
        debate_id: &str,
        question: &str,
        roster: &[String],
        rounds: u32,
    ) -> Result<(), StorageError>;

    /// Record one completed turn.
    fn record_turn(&mut self, turn: &Turn) -> Result<(), StorageError>;

    /// Record the terminal verdict of a successful run.
    fn record_verdict(&mut self, verdict: &Verdict) -> Result<(), StorageError>;

    /// Record terminal failure; the log stays valid JSONL.
    fn record_failure(&mut self, reason: &str) -> Result<(), StorageError>;
}

/// JSONL logger writing one run file under a runs directory.
pub struct JsonlRunLogger {
    path: PathBuf,
    file: File,
}

impl JsonlRunLogger {
    /// Create `<dir>/<run_id>.jsonl`, creating the directory if needed.
    pub fn create(dir: impl AsRef<Path>, run_id: &str) -> Result<Self, StorageError> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let path = dir.join(format!("{}.jsonl", run_id));
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;
        Ok(Self { path, file })
    }

    /// Path of the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_record(&mut self, record: serde_json::Value) -> Result<(), StorageError> {
        let line = serde_json::to_string(&record)?;
        writeln!(self.file, "{}", line)?;
        self.file.flush()?;
        Ok(())
    }
}

impl TranscriptStore for JsonlRunLogger {
    fn record_start(
        &mut self,
        debate_id: &str,
        question: &str,
        roster: &[String],
        rounds: u32,
    ) -> Result<(), StorageError> {
        self.write_record(json!({
            "ts": Utc::now().to_rfc3339(),
            "event": "start",
            "debate_id": debate_id,
            "question": question,
            "roster": roster,
            "rounds": rounds,
        }))
    }

    fn record_turn(&mut self, turn: &Turn) -> Result<(), StorageError> {
        self.write_record(json!({
            "ts": turn.timestamp.to_rfc3339(),
            "event": "turn",
            "round": turn.round,
            "phase": turn.phase.as_str(),
            "speaker": turn.speaker,
            "target": turn.target,
            "text": turn.text,
        }))
    }

    fn record_verdict(&mut self, verdict: &Verdict) -> Result<(), StorageError> {
        self.write_record(json!({
            "ts": Utc::now().to_rfc3339(),
            "event": "end",
            "winner": verdict.winner,
            "scores": verdict.sheet,
            "rationale": verdict.rationale,
        }))
    }

    fn record_failure(&mut self, reason: &str) -> Result<(), StorageError> {
        self.write_record(json!({
            "ts": Utc::now().to_rfc3339(),
            "event": "failed",
            "reason": reason,
        }))
    }
}

/// In-memory store for embedding and tests. Records events in order.
#[derive(Debug, Default)]
pub struct MemoryStore {
    /// Recorded events in arrival order.
    pub events: Vec<StoreEvent>,
}

/// One recorded event, mirroring the JSONL record kinds.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent {
    Start { debate_id: String, question: String },
    Turn(Turn),
    Verdict(String),
    Failure(String),
}

impl TranscriptStore for MemoryStore {
    fn record_start(
        &mut self,
        debate_id: &str,
        question: &str,
        _roster: &[String],
        _rounds: u32,
    ) -> Result<(), StorageError> {
        self.events.push(StoreEvent::Start {
            debate_id: debate_id.to_string(),
            question: question.to_string(),
        });
        Ok(())
    }

    fn record_turn(&mut self, turn: &Turn) -> Result<(), StorageError> {
        self.events.push(StoreEvent::Turn(turn.clone()));
        Ok(())
    }

    fn record_verdict(&mut self, verdict: &Verdict) -> Result<(), StorageError> {
        self.events.push(StoreEvent::Verdict(verdict.winner.label()));
        Ok(())
    }

    fn record_failure(&mut self, reason: &str) -> Result<(), StorageError> {
        self.events.push(StoreEvent::Failure(reason.to_string()));
        Ok(())
    }
}

impl MemoryStore {
    /// Recorded turns, in arrival order.
    pub fn turns(&self) -> Vec<&Turn> {
        self.events
            .iter()
            .filter_map(|e| match e {
                StoreEvent::Turn(t) => Some(t),
                _ => None,
            })
            .collect()
    }
}

/// Generate a run id of the form `<prefix>-YYYYMMDDTHHMMSS-xxxxxx`.
pub fn make_run_id(prefix: &str) -> String {
    let stamp = Utc::now().format("%Y%m%dT%H%M%S");
    let suffix: u32 = rand::rng().random_range(0..0x100_0000);
    format!("{}-{}-{:06x}", prefix, stamp, suffix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debate::Phase;
    use crate::judge::{ScoreSheet, Winner};
    use std::io::BufRead;

    fn sample_turn() -> Turn {
        Turn {
            round: 1,
            phase: Phase::Propose,
            speaker: "A".to_string(),
            target: None,
            text: "an answer".to_string(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn run_id_has_prefix_stamp_and_suffix() {
        let id = make_run_id("debate");
        let parts: Vec<&str> = id.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "debate");
        assert_eq!(parts[1].len(), 15);
        assert_eq!(parts[2].len(), 6);
        assert_ne!(make_run_id("debate"), id);
    }

    #[test]
    fn jsonl_logger_writes_one_valid_record_per_line() {
        let dir = tempfile::tempdir().unwrap();
        let mut logger = JsonlRunLogger::create(dir.path(), "run-1").unwrap();

        logger
            .record_start("run-1", "q?", &["A".to_string(), "B".to_string()], 2)
            .unwrap();
        logger.record_turn(&sample_turn()).unwrap();
        logger
            .record_verdict(&Verdict {
                winner: Winner::Agent("A".to_string()),
                sheet: ScoreSheet::default(),
                rationale: "because".to_string(),
            })
            .unwrap();

        let file = File::open(logger.path()).unwrap();
        let lines: Vec<serde_json::Value> = std::io::BufReader::new(file)
            .lines()
            .map(|l| serde_json::from_str(&l.unwrap()).unwrap())
            .collect();

        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0]["event"], "start");
        assert_eq!(lines[1]["event"], "turn");
        assert_eq!(lines[1]["phase"], "propose");
        assert_eq!(lines[2]["event"], "end");
        assert_eq!(lines[2]["winner"]["agent"], "A");
    }

    #[test]
    fn failure_record_is_terminal_and_parseable() {
        let dir = tempfile::tempdir().unwrap();
        let mut logger = JsonlRunLogger::create(dir.path(), "run-2").unwrap();
        logger.record_turn(&sample_turn()).unwrap();
        logger.record_failure("agent B timed out").unwrap();

        let content = fs::read_to_string(logger.path()).unwrap();
        let last: serde_json::Value =
            serde_json::from_str(content.lines().last().unwrap()).unwrap();
        assert_eq!(last["event"], "failed");
        assert_eq!(last["reason"], "agent B timed out");
    }
}
