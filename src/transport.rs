//! Light controller transport.
//!
//! Writes are best-effort: a failed write is logged once, the link drops into
//! "lights unavailable" mode and further commands are discarded until
//! [`LightLink::reconnect`] succeeds. Audio never waits on the lights.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::{Command as Process, Stdio};
use std::sync::{Arc, Mutex};

use tracing::{debug, error, info, warn};

use crate::command::Command;
use crate::error::{LightsError, Result};

/// Anything a wire line can be written to
pub trait CommandSink: Send {
    /// Write one complete line (terminator included)
    fn write_line(&mut self, line: &str) -> io::Result<()>;
}

/// Sink over any byte writer: a serial device node, stdout, a file
pub struct WriterSink<W: Write + Send> {
    writer: W,
}

impl<W: Write + Send> WriterSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }
}

impl<W: Write + Send> CommandSink for WriterSink<W> {
    fn write_line(&mut self, line: &str) -> io::Result<()> {
        self.writer.write_all(line.as_bytes())?;
        self.writer.flush()
    }
}

/// Put a serial line into raw mode at `baud`; the same as running
/// `stty -F <path> <baud> raw -echo`.
pub fn configure_line(path: &Path, baud: u32) -> Result<()> {
    let status = Process::new("stty")
        .arg("-F")
        .arg(path)
        .args([baud.to_string().as_str(), "raw", "-echo"])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map_err(|e| LightsError::Transport(format!("cannot run stty: {}", e)))?;
    if !status.success() {
        return Err(LightsError::Transport(format!(
            "stty could not set {} baud on {} ({})",
            baud,
            path.display(),
            status
        )));
    }
    Ok(())
}

/// Open a serial device node for writing.
///
/// With a baud rate the line is configured first; a configuration failure is
/// logged and the device is still opened as-is. Without one the line settings
/// are left to the system.
pub fn open_serial(path: &Path, baud: Option<u32>) -> Result<WriterSink<std::fs::File>> {
    if let Some(baud) = baud {
        match configure_line(path, baud) {
            Ok(()) => debug!(baud, "Serial line configured"),
            Err(e) => warn!("{}; using current line settings", e),
        }
    }
    let file = OpenOptions::new()
        .write(true)
        .open(path)
        .map_err(|e| LightsError::Transport(format!("{}: {}", path.display(), e)))?;
    Ok(WriterSink::new(file))
}

/// Discards everything (no light hardware configured)
#[derive(Debug, Default)]
pub struct NullSink;

impl CommandSink for NullSink {
    fn write_line(&mut self, _line: &str) -> io::Result<()> {
        Ok(())
    }
}

/// Keeps every line in memory; clones share the same log
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    lines: Arc<Mutex<Vec<String>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lines written so far, terminators stripped
    pub fn lines(&self) -> Vec<String> {
        match self.lines.lock() {
            Ok(lines) => lines.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl CommandSink for RecordingSink {
    fn write_line(&mut self, line: &str) -> io::Result<()> {
        let mut lines = self
            .lines
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "recording sink poisoned"))?;
        lines.push(line.trim_end_matches('\n').to_string());
        Ok(())
    }
}

/// Best-effort link to the light controller
pub struct LightLink {
    sink: Option<Box<dyn CommandSink>>,
    /// Device to reopen on reconnect; `None` for injected sinks
    path: Option<PathBuf>,
    baud: Option<u32>,
}

impl LightLink {
    /// Link over an already-open sink
    pub fn new(sink: Box<dyn CommandSink>) -> Self {
        Self {
            sink: Some(sink),
            path: None,
            baud: None,
        }
    }

    /// Link without hardware; every command is dropped
    pub fn disabled() -> Self {
        Self::new(Box::new(NullSink))
    }

    /// Open the serial device at `path`. A failure leaves the link unavailable
    /// rather than returning an error.
    pub fn open(path: &Path, baud: Option<u32>) -> Self {
        let sink = match open_serial(path, baud) {
            Ok(sink) => {
                info!("Light controller on {}", path.display());
                Some(Box::new(sink) as Box<dyn CommandSink>)
            }
            Err(e) => {
                error!("{}; lights unavailable", e);
                None
            }
        };
        Self {
            sink,
            path: Some(path.to_path_buf()),
            baud,
        }
    }

    pub fn is_available(&self) -> bool {
        self.sink.is_some()
    }

    /// Send a command; empty commands are suppressed.
    /// Returns whether a line was actually written.
    pub fn send(&mut self, command: &Command) -> bool {
        let Some(line) = command.encode() else {
            return false;
        };
        let Some(sink) = self.sink.as_mut() else {
            debug!(command = %command, "lights unavailable; dropping command");
            return false;
        };

        match sink.write_line(&line) {
            Ok(()) => true,
            Err(e) => {
                error!("Light write failed: {}; lights unavailable until reconnect", e);
                self.sink = None;
                false
            }
        }
    }

    /// Reopen the serial device after a failure
    pub fn reconnect(&mut self) -> bool {
        if self.sink.is_some() {
            return true;
        }
        let Some(path) = self.path.clone() else {
            debug!("Light link has no device to reconnect to");
            return false;
        };
        *self = Self::open(&path, self.baud);
        self.is_available()
    }
}
