//! Git worktree detection

use std::path::{Path, PathBuf};

use tokio::process::Command;

/// Check whether `cwd` lies inside a linked git worktree
///
/// Compares `git rev-parse --git-dir` against `--git-common-dir`; they only
/// differ in a linked worktree. Any failure resolves to `false`.
pub async fn is_worktree_context(cwd: &Path) -> bool {
    let (git_dir, common_dir) = tokio::join!(
        rev_parse(cwd, "--git-dir"),
        rev_parse(cwd, "--git-common-dir")
    );
    match (git_dir, common_dir) {
        (Some(git_dir), Some(common_dir)) => is_linked_worktree(cwd, &git_dir, &common_dir).await,
        _ => false,
    }
}

async fn rev_parse(cwd: &Path, flag: &str) -> Option<String> {
    let output = match Command::new("git")
        .args(["rev-parse", flag])
        .current_dir(cwd)
        .output()
        .await
    {
        Ok(output) => output,
        Err(e) => {
            tracing::debug!(cwd = %cwd.display(), error = %e, "git rev-parse failed to run");
            return None;
        }
    };
    if !output.status.success() {
        return None;
    }
    let value = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!value.is_empty()).then_some(value)
}

/// Both paths are resolved against `cwd` before comparing
pub(crate) async fn is_linked_worktree(cwd: &Path, git_dir: &str, common_dir: &str) -> bool {
    let (git_dir, common_dir) = tokio::join!(resolve(cwd, git_dir), resolve(cwd, common_dir));
    git_dir != common_dir
}

async fn resolve(cwd: &Path, path: &str) -> PathBuf {
    let joined = cwd.join(path);
    tokio::fs::canonicalize(&joined).await.unwrap_or(joined)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command as StdCommand;

    #[tokio::test]
    async fn test_is_linked_worktree() {
        let cwd = Path::new("/nonexistent/repo");
        assert!(!is_linked_worktree(cwd, ".git", ".git").await);
        assert!(
            is_linked_worktree(
                cwd,
                "/nonexistent/main/.git/worktrees/feature",
                "/nonexistent/main/.git"
            )
            .await
        );
    }

    #[tokio::test]
    async fn test_relative_and_absolute_git_dir_match() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join(".git")).unwrap();
        let absolute = dir.path().join(".git");
        assert!(!is_linked_worktree(dir.path(), ".git", absolute.to_str().unwrap()).await);
    }

    #[tokio::test]
    async fn test_missing_directory_is_not_worktree() {
        assert!(!is_worktree_context(Path::new("/definitely/not/here")).await);
    }

    #[tokio::test]
    async fn test_plain_directory_is_not_worktree() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!is_worktree_context(dir.path()).await);
    }

    fn git(cwd: &Path, args: &[&str]) -> bool {
        StdCommand::new("git")
            .args(args)
            .current_dir(cwd)
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    #[tokio::test]
    async fn test_linked_worktree_detected() {
        let dir = tempfile::tempdir().unwrap();
        let main = dir.path().join("main");
        std::fs::create_dir(&main).unwrap();

        let ready = git(&main, &["init", "-q"])
            && git(
                &main,
                &[
                    "-c",
                    "user.name=test",
                    "-c",
                    "user.email=test@example.com",
                    "commit",
                    "-q",
                    "--allow-empty",
                    "-m",
                    "init",
                ],
            )
            && git(&main, &["worktree", "add", "-q", "../linked"]);
        if !ready {
            // git unavailable
            return;
        }

        assert!(!is_worktree_context(&main).await);
        assert!(is_worktree_context(&dir.path().join("linked")).await);
    }
}
