//! Terminal processes for the UI
//!
//! Shells run on pseudo-terminals owned by [`TerminalManager`]:
//! - `terminal.create`: spawn (or reuse) a shell in a working directory,
//!   optionally typing a startup command into a fresh one
//! - `terminal.write` / `terminal.resize`: forward input and window size
//! - `terminal.kill`: terminate and forget the shell
//!
//! Output and exit are pushed back as `terminal.data` and `terminal.exit`.

mod manager;
mod pty;
#[cfg(test)]
pub(crate) mod testing;
mod worktree;

pub use manager::{TerminalCreated, TerminalEntry, TerminalManager, default_shell};
pub use pty::{
    DataCallback, ExitCallback, NativePtyProcess, NativePtySpawner, PtyProcess, PtySpawner,
    SpawnOptions,
};
pub use worktree::is_worktree_context;
