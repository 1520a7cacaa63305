//! Pseudo-terminal backend
//!
//! [`PtySpawner`] and [`PtyProcess`] keep the terminal manager independent of
//! the platform PTY. [`NativePtySpawner`] is the `portable-pty` implementation.

use std::io::{Read, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use portable_pty::{Child, ChildKiller, CommandBuilder, MasterPty, PtySize, native_pty_system};

use crate::types::TerminalError;

/// Receives decoded output chunks
pub type DataCallback = Box<dyn FnMut(String) + Send>;

/// Receives the exit code once the process ends
pub type ExitCallback = Box<dyn FnOnce(i32) + Send>;

const READ_BUFFER_SIZE: usize = 4096;

/// Options for spawning a shell on a pseudo-terminal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnOptions {
    pub shell: String,
    pub cwd: PathBuf,
    pub cols: u16,
    pub rows: u16,
    pub term: String,
}

impl SpawnOptions {
    /// 80x24 `xterm-256color` terminal running `shell` in `cwd`
    pub fn new(shell: impl Into<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            shell: shell.into(),
            cwd: cwd.into(),
            cols: 80,
            rows: 24,
            term: "xterm-256color".to_string(),
        }
    }
}

/// Spawns shell processes on pseudo-terminals
pub trait PtySpawner: Send + Sync + std::fmt::Debug {
    fn spawn(&self, options: SpawnOptions) -> Result<Arc<dyn PtyProcess>, TerminalError>;
}

/// Opaque handle to a running pseudo-terminal process
///
/// `on_data` and `on_exit` are meant to be registered once; output produced
/// before `on_data` is registered stays buffered in the PTY.
pub trait PtyProcess: Send + Sync + std::fmt::Debug {
    fn pid(&self) -> Option<u32>;
    fn write(&self, data: &str) -> Result<(), TerminalError>;
    fn resize(&self, cols: u16, rows: u16) -> Result<(), TerminalError>;
    fn kill(&self) -> Result<(), TerminalError>;
    fn on_data(&self, callback: DataCallback);
    fn on_exit(&self, callback: ExitCallback);
}

/// `portable-pty` backed spawner
#[derive(Debug, Default, Clone, Copy)]
pub struct NativePtySpawner;

impl PtySpawner for NativePtySpawner {
    fn spawn(&self, options: SpawnOptions) -> Result<Arc<dyn PtyProcess>, TerminalError> {
        let pair = native_pty_system()
            .openpty(PtySize {
                rows: options.rows,
                cols: options.cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| TerminalError::OpenFailed(e.to_string()))?;

        let mut cmd = CommandBuilder::new(&options.shell);
        cmd.cwd(&options.cwd);
        cmd.env("TERM", &options.term);

        let spawn_failed = |e: anyhow::Error| TerminalError::SpawnFailed {
            shell: options.shell.clone(),
            message: e.to_string(),
        };

        let child = pair.slave.spawn_command(cmd).map_err(spawn_failed)?;
        // Only the child keeps the slave open, so reads end when it exits
        drop(pair.slave);

        let reader = pair.master.try_clone_reader().map_err(spawn_failed)?;
        let writer = pair.master.take_writer().map_err(spawn_failed)?;
        let killer = child.clone_killer();
        let pid = child.process_id();

        tracing::debug!(
            pid = ?pid,
            shell = %options.shell,
            cwd = %options.cwd.display(),
            "Spawned pseudo-terminal process"
        );

        Ok(Arc::new(NativePtyProcess {
            pid,
            master: Mutex::new(pair.master),
            writer: Mutex::new(writer),
            killer: Mutex::new(killer),
            child: Mutex::new(Some(child)),
            reader: Mutex::new(Some(reader)),
        }))
    }
}

/// Process running on a native pseudo-terminal
pub struct NativePtyProcess {
    pid: Option<u32>,
    master: Mutex<Box<dyn MasterPty + Send>>,
    writer: Mutex<Box<dyn Write + Send>>,
    killer: Mutex<Box<dyn ChildKiller + Send + Sync>>,
    child: Mutex<Option<Box<dyn Child + Send + Sync>>>,
    reader: Mutex<Option<Box<dyn Read + Send>>>,
}

impl std::fmt::Debug for NativePtyProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativePtyProcess")
            .field("pid", &self.pid)
            .finish_non_exhaustive()
    }
}

impl PtyProcess for NativePtyProcess {
    fn pid(&self) -> Option<u32> {
        self.pid
    }

    fn write(&self, data: &str) -> Result<(), TerminalError> {
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| TerminalError::WriteFailed("writer lock poisoned".to_string()))?;
        writer
            .write_all(data.as_bytes())
            .and_then(|()| writer.flush())
            .map_err(|e| TerminalError::WriteFailed(e.to_string()))
    }

    fn resize(&self, cols: u16, rows: u16) -> Result<(), TerminalError> {
        let master = self
            .master
            .lock()
            .map_err(|_| TerminalError::ResizeFailed("master lock poisoned".to_string()))?;
        master
            .resize(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| TerminalError::ResizeFailed(e.to_string()))
    }

    fn kill(&self) -> Result<(), TerminalError> {
        let mut killer = self
            .killer
            .lock()
            .map_err(|_| TerminalError::KillFailed("killer lock poisoned".to_string()))?;
        killer
            .kill()
            .map_err(|e| TerminalError::KillFailed(e.to_string()))
    }

    fn on_data(&self, mut callback: DataCallback) {
        let Some(mut reader) = self.reader.lock().ok().and_then(|mut r| r.take()) else {
            tracing::warn!(pid = ?self.pid, "Output handler already registered");
            return;
        };
        let pid = self.pid;
        let spawned = std::thread::Builder::new()
            .name("pty-reader".to_string())
            .spawn(move || {
                let mut decoder = Utf8Decoder::default();
                let mut buf = [0u8; READ_BUFFER_SIZE];
                loop {
                    match reader.read(&mut buf) {
                        Ok(0) => break,
                        Ok(n) => {
                            let text = decoder.decode(&buf[..n]);
                            if !text.is_empty() {
                                callback(text);
                            }
                        }
                        Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                        // EIO once the child side closes
                        Err(e) => {
                            tracing::trace!(pid = ?pid, error = %e, "PTY read ended");
                            break;
                        }
                    }
                }
                let rest = decoder.finish();
                if !rest.is_empty() {
                    callback(rest);
                }
            });
        if let Err(e) = spawned {
            tracing::error!(pid = ?self.pid, error = %e, "Failed to start PTY reader thread");
        }
    }

    fn on_exit(&self, callback: ExitCallback) {
        let Some(mut child) = self.child.lock().ok().and_then(|mut c| c.take()) else {
            tracing::warn!(pid = ?self.pid, "Exit handler already registered");
            return;
        };
        let pid = self.pid;
        let spawned = std::thread::Builder::new()
            .name("pty-waiter".to_string())
            .spawn(move || {
                let code = match child.wait() {
                    Ok(status) => status.exit_code() as i32,
                    Err(e) => {
                        tracing::warn!(pid = ?pid, error = %e, "Failed to wait for PTY process");
                        -1
                    }
                };
                callback(code);
            });
        if let Err(e) = spawned {
            tracing::error!(pid = ?self.pid, error = %e, "Failed to start PTY waiter thread");
        }
    }
}

/// Incremental UTF-8 decoder
///
/// Holds back a trailing incomplete sequence until the next chunk completes
/// it. Invalid bytes are replaced with U+FFFD.
#[derive(Debug, Default)]
pub(crate) struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    pub(crate) fn decode(&mut self, chunk: &[u8]) -> String {
        self.pending.extend_from_slice(chunk);
        let split = self.pending.len() - incomplete_tail_len(&self.pending);
        let text = String::from_utf8_lossy(&self.pending[..split]).into_owned();
        self.pending.drain(..split);
        text
    }

    pub(crate) fn finish(&mut self) -> String {
        let text = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        text
    }
}

fn incomplete_tail_len(bytes: &[u8]) -> usize {
    match std::str::from_utf8(bytes) {
        Ok(_) => 0,
        Err(e) => match e.error_len() {
            None => bytes.len() - e.valid_up_to(),
            Some(invalid) => incomplete_tail_len(&bytes[e.valid_up_to() + invalid..]),
        },
    }
}
