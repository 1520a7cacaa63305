//! Terminal process manager
//!
//! Owns the registry of shell processes opened for the UI. Output and exit
//! notifications are forwarded over the IPC boundary.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::{DashMap, DashSet};
use serde::Serialize;
use serde_json::json;

use super::pty::{PtyProcess, PtySpawner, SpawnOptions};
use super::worktree::is_worktree_context;
use crate::ipc::IpcSender;
use crate::ipc::channels::{TERMINAL_DATA, TERMINAL_EXIT};
use crate::registry::Registry;
use crate::types::{AgentError, Result};

/// Delay before typing the initial command into a fresh shell
const INITIAL_COMMAND_DELAY: Duration = Duration::from_millis(200);

/// Live terminal owned by the manager
#[derive(Debug)]
pub struct TerminalEntry {
    pub id: String,
    pub cwd: PathBuf,
    pub process: Arc<dyn PtyProcess>,
    pub is_worktree_context: bool,
    /// Distinguishes successive processes registered under the same id
    instance: u64,
}

impl TerminalEntry {
    fn wiring_key(&self) -> WiringKey {
        (self.id.clone(), self.instance)
    }
}

/// Reply of `terminal.create`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminalCreated {
    pub id: String,
    pub is_worktree_context: bool,
}

impl From<&TerminalEntry> for TerminalCreated {
    fn from(entry: &TerminalEntry) -> Self {
        Self {
            id: entry.id.clone(),
            is_worktree_context: entry.is_worktree_context,
        }
    }
}

/// Platform default shell
pub fn default_shell() -> String {
    if cfg!(windows) {
        "powershell.exe".to_string()
    } else {
        unix_shell(std::env::var("SHELL").ok())
    }
}

fn unix_shell(shell_env: Option<String>) -> String {
    shell_env
        .filter(|shell| !shell.trim().is_empty())
        .unwrap_or_else(|| "/bin/bash".to_string())
}

/// Line ending that makes the platform shell run a typed command
fn command_line(command: &str) -> String {
    let ending = if cfg!(windows) { "\r" } else { "\n" };
    format!("{command}{ending}")
}

/// `(terminal id, process instance)`
type WiringKey = (String, u64);

pub struct TerminalManager {
    terminals: Arc<Registry<Arc<TerminalEntry>>>,
    /// Process instances whose output and exit handlers are registered
    wired: Arc<DashSet<WiringKey>>,
    /// Serializes creation per id while the shell is spawned
    creating: DashMap<String, Arc<tokio::sync::Mutex<()>>>,
    spawner: Arc<dyn PtySpawner>,
    sender: Arc<dyn IpcSender>,
    next_instance: AtomicU64,
    shell: String,
}

impl std::fmt::Debug for TerminalManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TerminalManager")
            .field("terminals", &self.terminals.len())
            .field("shell", &self.shell)
            .finish_non_exhaustive()
    }
}

impl TerminalManager {
    pub fn new(spawner: Arc<dyn PtySpawner>, sender: Arc<dyn IpcSender>) -> Self {
        Self {
            terminals: Arc::new(Registry::new()),
            wired: Arc::new(DashSet::new()),
            creating: DashMap::new(),
            spawner,
            sender,
            next_instance: AtomicU64::new(1),
            shell: default_shell(),
        }
    }

    /// Open a shell for `id`, or return the live one
    ///
    /// `initial_command` is typed into the shell shortly after a fresh spawn;
    /// it is ignored when the terminal already exists.
    pub async fn create(
        &self,
        id: &str,
        cwd: impl AsRef<Path>,
        initial_command: Option<String>,
    ) -> Result<TerminalCreated> {
        if let Some(entry) = self.terminals.get(id) {
            tracing::debug!(terminal_id = %id, "Terminal already exists, reusing");
            return Ok(entry.as_ref().into());
        }

        let lock = Arc::clone(self.creating.entry(id.to_string()).or_default().value());
        let result = {
            let _creating = lock.lock().await;
            self.create_locked(id, cwd.as_ref(), initial_command).await
        };
        drop(lock);
        // Last one out drops the per-id lock
        self.creating.remove_if(id, |_, lock| Arc::strong_count(lock) == 1);
        result
    }

    async fn create_locked(
        &self,
        id: &str,
        cwd: &Path,
        initial_command: Option<String>,
    ) -> Result<TerminalCreated> {
        if let Some(entry) = self.terminals.get(id) {
            tracing::debug!(terminal_id = %id, "Terminal created concurrently, reusing");
            return Ok(entry.as_ref().into());
        }

        let cwd = cwd.to_path_buf();
        let worktree = is_worktree_context(&cwd).await;

        // openpty and fork/exec block, keep them off the async workers
        let spawner = Arc::clone(&self.spawner);
        let options = SpawnOptions::new(self.shell.clone(), cwd.clone());
        let process = tokio::task::spawn_blocking(move || spawner.spawn(options))
            .await
            .map_err(|e| AgentError::internal(format!("terminal spawn task failed: {e}")))??;

        let spawned = Arc::new(TerminalEntry {
            id: id.to_string(),
            cwd: cwd.clone(),
            process,
            is_worktree_context: worktree,
            instance: self.next_instance.fetch_add(1, Ordering::Relaxed),
        });
        let (entry, inserted) = self
            .terminals
            .insert_if_absent(id, || Ok::<_, AgentError>(Arc::clone(&spawned)))?;
        if !inserted {
            tracing::warn!(terminal_id = %id, "Terminal registered during spawn, discarding the new shell");
            if let Err(e) = spawned.process.kill() {
                tracing::debug!(terminal_id = %id, error = %e, "Failed to kill surplus shell");
            }
        } else {
            tracing::info!(
                terminal_id = %id,
                pid = ?entry.process.pid(),
                cwd = %cwd.display(),
                is_worktree_context = worktree,
                "Terminal created"
            );
            if let Some(command) = initial_command.filter(|c| !c.is_empty()) {
                self.type_initial_command(&entry, command);
            }
        }
        if self.wired.insert(entry.wiring_key()) {
            self.wire(&entry);
        }
        Ok(entry.as_ref().into())
    }

    fn type_initial_command(&self, entry: &Arc<TerminalEntry>, command: String) {
        let terminals = Arc::clone(&self.terminals);
        let entry = Arc::clone(entry);
        tokio::spawn(async move {
            tokio::time::sleep(INITIAL_COMMAND_DELAY).await;
            let still_live = terminals
                .get(&entry.id)
                .is_some_and(|current| current.instance == entry.instance);
            if !still_live {
                tracing::debug!(terminal_id = %entry.id, "Terminal gone before its initial command");
                return;
            }
            if let Err(e) = entry.process.write(&command_line(&command)) {
                tracing::warn!(terminal_id = %entry.id, error = %e, "Failed to send initial command");
            }
        });
    }

    fn wire(&self, entry: &TerminalEntry) {
        let id = entry.id.clone();
        let sender = Arc::clone(&self.sender);
        entry.process.on_data(Box::new(move |chunk| {
            sender.send(TERMINAL_DATA, vec![json!(id), json!(chunk)]);
        }));

        let key = entry.wiring_key();
        let sender = Arc::clone(&self.sender);
        let terminals = Arc::clone(&self.terminals);
        let wired = Arc::clone(&self.wired);
        entry.process.on_exit(Box::new(move |code| {
            wired.remove(&key);
            let (id, instance) = key;
            let removed = terminals
                .remove_if(&id, |current| current.instance == instance)
                .is_some();
            if !removed && terminals.has(&id) {
                tracing::debug!(terminal_id = %id, "Ignoring exit of a replaced terminal process");
                return;
            }
            tracing::info!(terminal_id = %id, exit_code = code, "Terminal exited");
            sender.send(TERMINAL_EXIT, vec![json!(id), json!(code)]);
        }));
    }

    /// Forward input; absent ids and backend failures are logged only
    pub fn write(&self, id: &str, data: &str) {
        let Some(entry) = self.terminals.get(id) else {
            tracing::debug!(terminal_id = %id, "Write to unknown terminal ignored");
            return;
        };
        if let Err(e) = entry.process.write(data) {
            tracing::warn!(terminal_id = %id, error = %e, "Terminal write failed");
        }
    }

    pub fn resize(&self, id: &str, cols: u16, rows: u16) {
        let Some(entry) = self.terminals.get(id) else {
            tracing::debug!(terminal_id = %id, "Resize of unknown terminal ignored");
            return;
        };
        if let Err(e) = entry.process.resize(cols, rows) {
            tracing::warn!(terminal_id = %id, cols, rows, error = %e, "Terminal resize failed");
        }
    }

    /// Terminate the process and forget the terminal
    pub fn kill(&self, id: &str) {
        let Some(entry) = self.terminals.delete(id) else {
            return;
        };
        self.wired.remove(&entry.wiring_key());
        match entry.process.kill() {
            Ok(()) => tracing::info!(terminal_id = %id, "Terminal killed"),
            Err(e) => tracing::warn!(terminal_id = %id, error = %e, "Terminal kill failed"),
        }
    }

    pub fn kill_all(&self) {
        for id in self.terminals.ids() {
            self.kill(&id);
        }
    }

    /// Live terminal ids, sorted
    pub fn ids(&self) -> Vec<String> {
        let mut ids = self.terminals.ids();
        ids.sort();
        ids
    }

    pub fn has_terminal(&self, id: &str) -> bool {
        self.terminals.has(id)
    }

    pub fn terminal_count(&self) -> usize {
        self.terminals.len()
    }
}
