//! In-memory PTY doubles for tests

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use super::pty::{DataCallback, ExitCallback, PtyProcess, PtySpawner, SpawnOptions};
use crate::types::TerminalError;

#[derive(Debug, Default)]
pub struct FakePtySpawner {
    pub spawned: Mutex<Vec<Arc<FakePty>>>,
    pub fail: AtomicBool,
    next_pid: AtomicU32,
}

impl FakePtySpawner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.spawned.lock().unwrap().len()
    }

    pub fn process(&self, index: usize) -> Arc<FakePty> {
        self.spawned.lock().unwrap()[index].clone()
    }
}

impl PtySpawner for FakePtySpawner {
    fn spawn(&self, options: SpawnOptions) -> Result<Arc<dyn PtyProcess>, TerminalError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(TerminalError::SpawnFailed {
                shell: options.shell,
                message: "no such file".to_string(),
            });
        }
        let pid = 1000 + self.next_pid.fetch_add(1, Ordering::SeqCst);
        let process = Arc::new(FakePty::new(pid, options));
        self.spawned.lock().unwrap().push(process.clone());
        Ok(process)
    }
}

pub struct FakePty {
    pub pid: u32,
    pub options: SpawnOptions,
    pub writes: Mutex<Vec<String>>,
    pub resizes: Mutex<Vec<(u16, u16)>>,
    pub kills: AtomicUsize,
    pub data_handlers: AtomicUsize,
    pub exit_handlers: AtomicUsize,
    pub fail_writes: AtomicBool,
    data: Mutex<Option<DataCallback>>,
    exit: Mutex<Option<ExitCallback>>,
}

impl std::fmt::Debug for FakePty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FakePty")
            .field("pid", &self.pid)
            .finish_non_exhaustive()
    }
}

impl FakePty {
    fn new(pid: u32, options: SpawnOptions) -> Self {
        Self {
            pid,
            options,
            writes: Mutex::new(Vec::new()),
            resizes: Mutex::new(Vec::new()),
            kills: AtomicUsize::new(0),
            data_handlers: AtomicUsize::new(0),
            exit_handlers: AtomicUsize::new(0),
            fail_writes: AtomicBool::new(false),
            data: Mutex::new(None),
            exit: Mutex::new(None),
        }
    }

    pub fn cwd(&self) -> PathBuf {
        self.options.cwd.clone()
    }

    pub fn emit(&self, chunk: &str) {
        if let Some(callback) = self.data.lock().unwrap().as_mut() {
            callback(chunk.to_string());
        }
    }

    pub fn exit(&self, code: i32) {
        let callback = self.exit.lock().unwrap().take();
        if let Some(callback) = callback {
            callback(code);
        }
    }
}

impl PtyProcess for FakePty {
    fn pid(&self) -> Option<u32> {
        Some(self.pid)
    }

    fn write(&self, data: &str) -> Result<(), TerminalError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(TerminalError::WriteFailed("broken pipe".to_string()));
        }
        self.writes.lock().unwrap().push(data.to_string());
        Ok(())
    }

    fn resize(&self, cols: u16, rows: u16) -> Result<(), TerminalError> {
        self.resizes.lock().unwrap().push((cols, rows));
        Ok(())
    }

    fn kill(&self) -> Result<(), TerminalError> {
        self.kills.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn on_data(&self, callback: DataCallback) {
        self.data_handlers.fetch_add(1, Ordering::SeqCst);
        *self.data.lock().unwrap() = Some(callback);
    }

    fn on_exit(&self, callback: ExitCallback) {
        self.exit_handlers.fetch_add(1, Ordering::SeqCst);
        *self.exit.lock().unwrap() = Some(callback);
    }
}
