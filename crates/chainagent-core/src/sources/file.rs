use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};

use crate::error::RunnerError;
use crate::source::EventSource;
use crate::types::Block;

/// Replays blocks recorded as JSON Lines, one block per line.
///
/// Blank lines are skipped. The first record that does not parse, or whose
/// block number goes backwards or repeats, ends the source with
/// [`RunnerError::MalformedRecord`]; later records are never read.
pub struct FileSource {
    path: PathBuf,
    lines: Lines<BufReader<File>>,
    record: u64,
    last_number: Option<u64>,
    done: bool,
}

impl FileSource {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, RunnerError> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).await.map_err(|e| {
            RunnerError::Source(format!("cannot open {}: {e}", path.display()))
        })?;
        Ok(Self {
            path,
            lines: BufReader::new(file).lines(),
            record: 0,
            last_number: None,
            done: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Start over from the first record.
    pub async fn restart(&mut self) -> Result<(), RunnerError> {
        let file = File::open(&self.path).await?;
        self.lines = BufReader::new(file).lines();
        self.record = 0;
        self.last_number = None;
        self.done = false;
        Ok(())
    }
}

#[async_trait]
impl EventSource for FileSource {
    async fn next(&mut self) -> Result<Option<Block>, RunnerError> {
        if self.done {
            return Ok(None);
        }
        loop {
            let line = match self.lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => {
                    self.done = true;
                    return Ok(None);
                }
                Err(e) => {
                    self.done = true;
                    return Err(e.into());
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            self.record += 1;

            let block: Block = match serde_json::from_str(&line) {
                Ok(block) => block,
                Err(e) => {
                    self.done = true;
                    return Err(RunnerError::MalformedRecord {
                        record: self.record,
                        reason: e.to_string(),
                    });
                }
            };
            if let Some(last) = self.last_number {
                if block.number <= last {
                    self.done = true;
                    return Err(RunnerError::MalformedRecord {
                        record: self.record,
                        reason: format!("block {} does not follow block {last}", block.number),
                    });
                }
            }
            self.last_number = Some(block.number);
            return Ok(Some(block));
        }
    }
}
