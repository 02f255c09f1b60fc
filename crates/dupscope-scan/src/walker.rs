//! Deterministic files-before-subdirectories traversal built on jwalk.

use std::cmp::Ordering;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};

use jwalk::{Parallelism, WalkDir};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use dupscope_core::{FileDescriptor, ScanError, ScanWarning};

/// Traversal options.
#[derive(Debug, Clone, Copy, Default)]
pub struct WalkOptions {
    /// Descend into subdirectories of each root.
    pub recurse: bool,
    /// Log and skip unreadable entries instead of stopping.
    pub ignore_errors: bool,
}

/// Totals gathered during one traversal.
#[derive(Debug, Clone, Default)]
pub struct WalkSummary {
    /// Regular files emitted.
    pub files: u64,
    /// Bytes of the emitted files.
    pub bytes: u64,
    /// Directories entered.
    pub dirs: u64,
    /// Entries skipped under the ignore-errors policy.
    pub warnings: Vec<ScanWarning>,
}

/// Filesystem traverser producing one [`FileDescriptor`] per regular file.
///
/// Within a directory every file is emitted before any subdirectory is
/// entered; subdirectories are visited in lexicographic order. Symlinks and
/// non-regular files are skipped.
#[derive(Debug, Clone, Default)]
pub struct Walker {
    options: WalkOptions,
}

impl Walker {
    /// Create a walker with the given options.
    pub fn new(options: WalkOptions) -> Self {
        Self { options }
    }

    /// Walk every root, calling `visit` for each regular file.
    ///
    /// `cancel` is checked at every filesystem node. Returns
    /// [`ScanError::Interrupted`] when cancelled or when `visit` breaks.
    pub fn walk<F>(
        &self,
        roots: &[PathBuf],
        cancel: &CancellationToken,
        mut visit: F,
    ) -> Result<WalkSummary, ScanError>
    where
        F: FnMut(FileDescriptor) -> ControlFlow<()>,
    {
        let mut summary = WalkSummary::default();

        for root in roots {
            if cancel.is_cancelled() {
                return Err(ScanError::Interrupted);
            }

            let root_path = match root.canonicalize() {
                Ok(path) => path,
                Err(err) => {
                    self.tolerate(ScanError::io(root, err), &mut summary)?;
                    continue;
                }
            };

            debug!(root = %root_path.display(), "walking root");
            self.walk_root(&root_path, cancel, &mut visit, &mut summary)?;
        }

        Ok(summary)
    }

    /// Collect every file under `roots` into a vector.
    pub fn collect(&self, roots: &[PathBuf]) -> Result<Vec<FileDescriptor>, ScanError> {
        let mut files = Vec::new();
        self.walk(roots, &CancellationToken::new(), |file| {
            files.push(file);
            ControlFlow::Continue(())
        })?;
        Ok(files)
    }

    fn walk_root<F>(
        &self,
        root_path: &Path,
        cancel: &CancellationToken,
        visit: &mut F,
        summary: &mut WalkSummary,
    ) -> Result<(), ScanError>
    where
        F: FnMut(FileDescriptor) -> ControlFlow<()>,
    {
        let root_metadata = match std::fs::symlink_metadata(root_path) {
            Ok(metadata) => metadata,
            Err(err) => return self.tolerate(ScanError::io(root_path, err), summary),
        };

        // A root naming a single file yields just that file.
        if root_metadata.is_file() {
            if let (Some(folder), Some(name)) = (root_path.parent(), root_path.file_name()) {
                let file = FileDescriptor::new(folder, name, root_metadata.len());
                return emit(file, visit, summary);
            }
            return Ok(());
        }

        let walker = WalkDir::new(root_path)
            .parallelism(Parallelism::Serial)
            .skip_hidden(false)
            .follow_links(false)
            .min_depth(0)
            .max_depth(if self.options.recurse { usize::MAX } else { 1 })
            .process_read_dir(|_depth, _path, _state, children| {
                // Files first, then subdirectories, each by name.
                children.sort_by(|a, b| match (a, b) {
                    (Ok(a), Ok(b)) => a
                        .file_type
                        .is_dir()
                        .cmp(&b.file_type.is_dir())
                        .then_with(|| a.file_name.cmp(&b.file_name)),
                    (Ok(_), Err(_)) => Ordering::Less,
                    (Err(_), Ok(_)) => Ordering::Greater,
                    (Err(_), Err(_)) => Ordering::Equal,
                });
            });

        for entry_result in walker {
            if cancel.is_cancelled() {
                return Err(ScanError::Interrupted);
            }

            let entry = match entry_result {
                Ok(entry) => entry,
                Err(err) => {
                    self.tolerate(walk_error(err), summary)?;
                    continue;
                }
            };

            let file_type = entry.file_type;
            if file_type.is_dir() {
                summary.dirs += 1;
                continue;
            }
            if !file_type.is_file() {
                // Symlinks, sockets, fifos and devices.
                continue;
            }

            let path = entry.path();
            let metadata = match entry.metadata() {
                Ok(metadata) => metadata,
                Err(err) => {
                    self.tolerate(walk_error(err), summary)?;
                    continue;
                }
            };

            let Some(folder) = path.parent() else {
                continue;
            };
            let file = FileDescriptor::new(folder, &entry.file_name, metadata.len());
            emit(file, visit, summary)?;
        }

        Ok(())
    }

    /// Apply the ignore-errors policy to a traversal error.
    fn tolerate(&self, error: ScanError, summary: &mut WalkSummary) -> Result<(), ScanError> {
        if self.options.ignore_errors {
            warn!(%error, "skipping unreadable entry");
            summary.warnings.push(ScanWarning::from_error(&error));
            Ok(())
        } else {
            Err(error)
        }
    }
}

fn emit<F>(file: FileDescriptor, visit: &mut F, summary: &mut WalkSummary) -> Result<(), ScanError>
where
    F: FnMut(FileDescriptor) -> ControlFlow<()>,
{
    summary.files += 1;
    summary.bytes += file.size;
    match visit(file) {
        ControlFlow::Continue(()) => Ok(()),
        ControlFlow::Break(()) => Err(ScanError::Interrupted),
    }
}

fn walk_error(err: jwalk::Error) -> ScanError {
    let path = err.path().map(Path::to_path_buf).unwrap_or_default();
    let message = err.to_string();
    match err.into_io_error() {
        Some(source) => ScanError::io(path, source),
        None => ScanError::Walk { path, message },
    }
}
