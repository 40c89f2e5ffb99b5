use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use colored::Colorize;
use replkit_client::Session;
use tracing::{debug, warn};

use crate::context::CommandContext;
use crate::error::{CliError, Result};

const PREFIX: &str = "repl:";

#[derive(Debug, PartialEq)]
pub struct PathArg {
    pub path: String,
    pub is_repl: bool,
}

pub fn parse_path_arg(arg: &str) -> PathArg {
    match arg.strip_prefix(PREFIX) {
        Some(rest) => PathArg {
            path: rest.to_string(),
            is_repl: true,
        },
        None => PathArg {
            path: arg.to_string(),
            is_repl: false,
        },
    }
}

pub async fn execute(
    ctx: &CommandContext,
    src: &str,
    dest: &str,
    repl: Option<&str>,
    fail_fast: bool,
) -> Result<i32> {
    let src = parse_path_arg(src);
    let dest = parse_path_arg(dest);

    // Checked before any network activity.
    if !src.is_repl && !dest.is_repl {
        return Err(CliError::fatal(format!(
            "You specified two local paths. Prefix a path with {} to mark it \
             as being on the repl.",
            PREFIX.green()
        )));
    }

    let session = ctx.session(repl).await?;
    if src.is_repl && dest.is_repl {
        debug!(target = "replkit", "executing cp in repl");
        session
            .exec(vec!["cp".to_string(), src.path, dest.path])
            .await?;
        Ok(0)
    } else if dest.is_repl {
        copy_to_repl(&session, Path::new(&src.path), &dest.path, fail_fast).await
    } else {
        debug!(target = "replkit", path = %src.path, "reading remote file");
        let content = session.read(&src.path).await?;
        tokio::fs::write(&dest.path, &content).await?;
        Ok(0)
    }
}

/// Copies a local file or directory tree into the repl. Directory copies
/// keep going past individual failed writes unless `fail_fast` is set, and
/// always finish with exactly one snapshot request.
async fn copy_to_repl(
    session: &Session,
    src: &Path,
    dest: &str,
    fail_fast: bool,
) -> Result<i32> {
    let meta = tokio::fs::metadata(src).await?;
    let plan: Vec<(PathBuf, String)> = if meta.is_file() {
        vec![(src.to_path_buf(), dest.to_string())]
    } else if meta.is_dir() {
        let base = dest.trim_end_matches('/');
        collect_files(src)
            .await?
            .into_iter()
            .map(|relative| {
                let remote = if base.is_empty() {
                    slash_path(&relative)
                } else {
                    format!("{base}/{}", slash_path(&relative))
                };
                (src.join(&relative), remote)
            })
            .collect()
    } else {
        return Err(CliError::fatal(format!(
            "Not a regular file or directory: {}",
            src.display()
        )));
    };

    let mut first_error = None;
    let mut written = 0usize;
    for (local, remote) in plan {
        debug!(target = "replkit", local = %local.display(), %remote, "writing");
        let outcome = async {
            let content = tokio::fs::read(&local).await?;
            session.write(&remote, &content).await?;
            Ok::<_, CliError>(())
        }
        .await;
        match outcome {
            Ok(()) => written += 1,
            Err(error) => {
                eprintln!(
                    "{}",
                    format!("Failed to copy {}: {error}", local.display()).red()
                );
                if first_error.is_none() {
                    first_error = Some(error);
                }
                if fail_fast {
                    break;
                }
            }
        }
    }

    // One snapshot per batch, attempted even after failed writes so the
    // files that did land are persisted.
    if let Err(error) = session.snapshot().await {
        warn!(target = "replkit", %error, "snapshot failed");
    }

    match first_error {
        Some(error) => Err(error),
        None => {
            debug!(target = "replkit", written, "copy finished");
            Ok(0)
        }
    }
}

/// Walks a local directory iteratively, returning the sorted relative paths
/// of every regular file. Children that are neither files nor directories
/// are skipped.
pub async fn collect_files(root: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut queue = VecDeque::from([PathBuf::new()]);
    while let Some(relative) = queue.pop_front() {
        let mut entries = tokio::fs::read_dir(root.join(&relative)).await?;
        while let Some(entry) = entries.next_entry().await? {
            let kind = entry.file_type().await?;
            let child = relative.join(entry.file_name());
            if kind.is_dir() {
                queue.push_back(child);
            } else if kind.is_file() {
                files.push(child);
            }
        }
    }
    files.sort();
    Ok(files)
}

fn slash_path(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use replkit_client::FakeTransport;
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn parse_path_arg_detects_prefix() {
        assert_eq!(
            parse_path_arg("repl:src/main.py"),
            PathArg {
                path: "src/main.py".to_string(),
                is_repl: true,
            }
        );
        assert_eq!(
            parse_path_arg("local.txt"),
            PathArg {
                path: "local.txt".to_string(),
                is_repl: false,
            }
        );
    }

    fn fixture_tree() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "alpha").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub/b.txt"), "beta").unwrap();
        std::fs::write(dir.path().join("sub/c.txt"), "gamma").unwrap();
        dir
    }

    #[tokio::test]
    async fn collect_files_finds_nested_regular_files() {
        let dir = fixture_tree();
        let files = collect_files(dir.path()).await.unwrap();
        assert_eq!(
            files,
            vec![
                PathBuf::from("a.txt"),
                PathBuf::from("sub/b.txt"),
                PathBuf::from("sub/c.txt"),
            ]
        );
    }

    #[tokio::test]
    async fn directory_copy_writes_each_file_and_snapshots_once() {
        let dir = fixture_tree();
        let (transport, controller) = FakeTransport::new();
        let session = Session::with_transport(Arc::new(transport), "tok".to_string());

        let code = copy_to_repl(&session, dir.path(), "project", false)
            .await
            .unwrap();
        assert_eq!(code, 0);

        let writes = controller.sent_bodies("files");
        assert_eq!(writes.len(), 3);
        let paths: Vec<&str> = writes
            .iter()
            .map(|body| body["write"]["path"].as_str().unwrap())
            .collect();
        assert_eq!(paths, vec!["project/a.txt", "project/sub/b.txt", "project/sub/c.txt"]);
        assert_eq!(controller.sent_bodies("snapshot").len(), 1);
    }

    #[tokio::test]
    async fn failed_write_still_snapshots_once_and_reports_error() {
        let dir = fixture_tree();
        let (transport, controller) = FakeTransport::new();
        let session = Session::with_transport(Arc::new(transport), "tok".to_string());
        controller.queue_reply("files", json!({"error": "disk full"}));

        let result = copy_to_repl(&session, dir.path(), "project", false).await;
        assert!(result.is_err());
        // The two later writes still went out.
        assert_eq!(controller.sent_bodies("files").len(), 3);
        assert_eq!(controller.sent_bodies("snapshot").len(), 1);
    }

    #[tokio::test]
    async fn fail_fast_stops_after_first_failed_write() {
        let dir = fixture_tree();
        let (transport, controller) = FakeTransport::new();
        let session = Session::with_transport(Arc::new(transport), "tok".to_string());
        controller.queue_reply("files", json!({"error": "disk full"}));

        let result = copy_to_repl(&session, dir.path(), "project", true).await;
        assert!(result.is_err());
        assert_eq!(controller.sent_bodies("files").len(), 1);
        assert_eq!(controller.sent_bodies("snapshot").len(), 1);
    }
}
