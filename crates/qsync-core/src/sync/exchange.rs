//! File-based exchange
//!
//! The degraded transport: an append-only JSON-lines file shared between
//! replicas out of band (a synced folder, a copied file). Each line is one
//! delivery; its serial is its line number. A replica remembers how many
//! lines it has consumed.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::message::{Delivery, Update};
use super::transport::{Transport, TransportError, TransportResult};

/// Append-only JSON-lines exchange file
#[derive(Debug)]
pub struct FileExchange {
    path: PathBuf,
    max_payload_size: usize,
    /// Lines already returned by `poll`
    cursor: usize,
}

impl FileExchange {
    pub fn new(path: impl Into<PathBuf>, max_payload_size: usize) -> Self {
        Self {
            path: path.into(),
            max_payload_size,
            cursor: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every delivery in the file, ignoring the cursor
    ///
    /// Malformed lines are skipped with a warning.
    pub fn read_all(&self) -> TransportResult<Vec<Delivery>> {
        Ok(self
            .read_lines()?
            .iter()
            .enumerate()
            .filter_map(|(i, line)| decode_line(&self.path, i, line))
            .collect())
    }

    fn read_lines(&self) -> TransportResult<Vec<String>> {
        match fs::read_to_string(&self.path) {
            Ok(content) => Ok(content
                .lines()
                .filter(|line| !line.trim().is_empty())
                .map(str::to_string)
                .collect()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(self.io_error(e)),
        }
    }

    fn io_error(&self, source: io::Error) -> TransportError {
        TransportError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl Transport for FileExchange {
    fn max_payload_size(&self) -> usize {
        self.max_payload_size
    }

    fn send_update(&mut self, update: &Update, _description: &str) -> TransportResult<()> {
        let serial = self.read_lines()?.len() as u64 + 1;
        let line = Delivery::new(serial, update.clone()).encode()?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| self.io_error(e))?;
        writeln!(file, "{}", line).map_err(|e| self.io_error(e))?;

        debug!(serial, path = ?self.path, "Appended update to exchange file");
        Ok(())
    }

    fn poll(&mut self) -> TransportResult<Vec<Delivery>> {
        let lines = self.read_lines()?;
        let start = self.cursor.min(lines.len());
        let fresh = lines[start..]
            .iter()
            .enumerate()
            .filter_map(|(i, line)| decode_line(&self.path, start + i, line))
            .collect();
        self.cursor = lines.len();
        Ok(fresh)
    }

    fn name(&self) -> &str {
        "file"
    }

    fn source(&self) -> String {
        self.path.display().to_string()
    }
}

fn decode_line(path: &Path, index: usize, line: &str) -> Option<Delivery> {
    match Delivery::decode(line) {
        Ok(delivery) => Some(delivery),
        Err(e) => {
            warn!("Skipping malformed line {} in {:?}: {}", index + 1, path, e);
            None
        }
    }
}
