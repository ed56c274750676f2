use crate::error::AppError;
use crate::model::{
    CancelToken, ConflictPolicy, LogSeverity, SourceDir, TransferLogEntry, TransferMode,
    TransferProgress, TransferReport,
};
use crate::path_norm;
use crate::tree::{FileTree, NodeId};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Numbered-suffix candidates tried by [`ConflictPolicy::Rename`] before
/// the file is given up on: `base-1.ext` through `base-10.ext`.
pub const RENAME_SUFFIX_LIMIT: usize = 10;

/// Filesystem primitives the executor needs. Kept behind a trait so the
/// conflict and precondition logic is testable without touching a disk.
pub trait Filesystem {
    fn exists(&self, path: &Path) -> bool;
    fn is_dir(&self, path: &Path) -> bool;
    fn create_dir_all(&self, path: &Path) -> io::Result<()>;
    fn free_bytes(&self, path: &Path) -> io::Result<u64>;
    fn copy(&self, src: &Path, dst: &Path) -> io::Result<()>;
    fn move_file(&self, src: &Path, dst: &Path) -> io::Result<()>;
}

/// The real thing. Moving falls back to copy-and-remove when a plain
/// rename fails, which happens whenever source and destination live on
/// different devices.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdFilesystem;

impl Filesystem for StdFilesystem {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        fs::create_dir_all(path)
    }

    fn free_bytes(&self, path: &Path) -> io::Result<u64> {
        fs2::available_space(path)
    }

    fn copy(&self, src: &Path, dst: &Path) -> io::Result<()> {
        fs::copy(src, dst).map(|_| ())
    }

    fn move_file(&self, src: &Path, dst: &Path) -> io::Result<()> {
        match fs::rename(src, dst) {
            Ok(()) => Ok(()),
            Err(_) => {
                fs::copy(src, dst)?;
                fs::remove_file(src)
            }
        }
    }
}

/// Everything the executor needs to know besides the tree itself.
#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub destination: PathBuf,
    pub mode: TransferMode,
    pub conflict_policy: ConflictPolicy,
}

/// Validates that a transfer may start at all. Checks run in a fixed
/// order and the first violation aborts with its own message; no file is
/// touched before all of them pass.
pub fn check_preconditions<F: Filesystem>(
    fs: &F,
    tree: &mut FileTree,
    request: &TransferRequest,
) -> Result<(), AppError> {
    let summary = tree
        .check_duplicates(FileTree::ROOT, true)
        .map_err(|_| AppError::InvalidRequest("file tree is unavailable".to_string()))?;

    if summary.files == 0 {
        return Err(AppError::Precondition(
            "there are no files to transfer".to_string(),
        ));
    }
    if summary.duplicates > 0 {
        return Err(AppError::Precondition(format!(
            "{} duplicate file names must be resolved first",
            summary.duplicates
        )));
    }
    if request.destination.as_os_str().is_empty() {
        return Err(AppError::Precondition(
            "no destination directory is set".to_string(),
        ));
    }
    if fs.exists(&request.destination) && !fs.is_dir(&request.destination) {
        return Err(AppError::Precondition(format!(
            "destination `{}` is not a directory",
            request.destination.display()
        )));
    }

    // The destination may not exist yet; free space is read from the
    // nearest existing ancestor, which is where it would be created.
    let mut probe = request.destination.as_path();
    while !fs.exists(probe) {
        match probe.parent() {
            Some(parent) => probe = parent,
            None => break,
        }
    }
    let free = fs.free_bytes(probe)?;
    let needed_mib = path_norm::ceil_mib(summary.bytes);
    let free_mib = path_norm::ceil_mib(free);
    if free_mib < needed_mib {
        return Err(AppError::Precondition(format!(
            "not enough free space at the destination: {} MiB needed, {} MiB available",
            needed_mib, free_mib
        )));
    }
    Ok(())
}

/// Runs the transfer: walks the tree's leaves in display order, creates
/// destination directories, resolves conflicts per the request's policy
/// and copies or moves each file. Per-file failures go into the report
/// log; only a failed precondition aborts the run as a whole.
pub fn execute<F, Prog>(
    fs: &F,
    tree: &mut FileTree,
    sources: &[SourceDir],
    request: &TransferRequest,
    cancel: &CancelToken,
    mut progress: Prog,
) -> Result<TransferReport, AppError>
where
    F: Filesystem,
    Prog: FnMut(TransferProgress),
{
    check_preconditions(fs, tree, request)?;

    let leaves = tree.leaves_in_order();
    let total = leaves.len();
    let stride = (total / 100).max(1);
    let mut report = TransferReport::default();

    for leaf in leaves {
        if cancel.is_cancelled() {
            report.cancelled = true;
            break;
        }
        report.processed += 1;

        let destination = request.destination.join(tree.full_path(leaf));
        transfer_one(fs, tree, sources, request, leaf, &destination, &mut report);

        if report.processed % stride == 0 || report.processed == total {
            progress(TransferProgress {
                processed: report.processed,
                total,
                current_path: Some(destination.display().to_string()),
                done: false,
                cancelled: false,
            });
        }
    }

    progress(TransferProgress {
        processed: report.processed,
        total,
        current_path: None,
        done: true,
        cancelled: report.cancelled,
    });
    Ok(report)
}

fn transfer_one<F: Filesystem>(
    fs: &F,
    tree: &mut FileTree,
    sources: &[SourceDir],
    request: &TransferRequest,
    leaf: NodeId,
    destination: &Path,
    report: &mut TransferReport,
) {
    let Some(data) = tree.leaf(leaf) else {
        return;
    };
    let Some(root) = sources.get(data.source_dir) else {
        report.failed += 1;
        report.log.push(TransferLogEntry {
            severity: LogSeverity::Error,
            path: destination.display().to_string(),
            message: "source directory is no longer known".to_string(),
        });
        return;
    };
    let source = root.path.join(&data.relative_source);
    let extension = data.extension.clone();

    if let Some(parent) = destination.parent() {
        if let Err(error) = fs.create_dir_all(parent) {
            report.failed += 1;
            report.log.push(TransferLogEntry {
                severity: LogSeverity::Error,
                path: parent.display().to_string(),
                message: format!("could not create directory: {}", error),
            });
            return;
        }
    }

    let target = if fs.exists(destination) {
        match request.conflict_policy {
            ConflictPolicy::Overwrite => destination.to_path_buf(),
            ConflictPolicy::Skip => {
                report.skipped += 1;
                report.log.push(TransferLogEntry {
                    severity: LogSeverity::Warning,
                    path: destination.display().to_string(),
                    message: "already exists, skipped".to_string(),
                });
                return;
            }
            ConflictPolicy::Rename => match rename_candidate(fs, destination, &extension) {
                Some(candidate) => candidate,
                None => {
                    report.failed += 1;
                    report.log.push(TransferLogEntry {
                        severity: LogSeverity::Error,
                        path: destination.display().to_string(),
                        message: format!(
                            "already exists and all {} rename candidates are taken",
                            RENAME_SUFFIX_LIMIT
                        ),
                    });
                    return;
                }
            },
        }
    } else {
        destination.to_path_buf()
    };

    let outcome = match request.mode {
        TransferMode::Copy => fs.copy(&source, &target),
        TransferMode::Move => fs.move_file(&source, &target),
    };
    match outcome {
        Ok(()) => {
            report.succeeded += 1;
            tree.mark_transferred(leaf);
        }
        Err(error) => {
            report.failed += 1;
            report.log.push(TransferLogEntry {
                severity: LogSeverity::Error,
                path: target.display().to_string(),
                message: error.to_string(),
            });
        }
    }
}

/// First free `base-N.ext` variant next to an occupied destination, or
/// `None` once the whole numbered range is taken.
fn rename_candidate<F: Filesystem>(
    fs: &F,
    destination: &Path,
    extension: &str,
) -> Option<PathBuf> {
    let name = destination.file_name()?.to_str()?;
    let stem = name.strip_suffix(extension).unwrap_or(name);
    let parent = destination.parent()?;
    (1..=RENAME_SUFFIX_LIMIT)
        .map(|n| parent.join(format!("{}-{}{}", stem, n, extension)))
        .find(|candidate| !fs.exists(candidate))
}
