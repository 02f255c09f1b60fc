//! Folder-by-folder duplicate reporting.

use std::ops::ControlFlow;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use dupscope_core::{FileDescriptor, ReportConfig, Stats};
use dupscope_index::{IndexError, IndexStore};
use dupscope_scan::{WalkOptions, Walker};

use crate::classify::{Classification, Classifier, lossy_path};
use crate::error::AnalyzeError;

/// One file in a folder report.
#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    /// File name within its folder.
    pub name: String,
    /// Size in bytes at walk time.
    pub size: u64,
    /// Relation to the rest of the index.
    pub classification: Classification,
    /// Whether the file passes the listing filters.
    pub listed: bool,
}

/// Classified files and counters for one folder.
#[derive(Debug, Clone, Serialize)]
pub struct FolderReport {
    /// Absolute folder path.
    #[serde(serialize_with = "lossy_path")]
    pub folder: PathBuf,
    /// Files sorted by name.
    pub files: Vec<FileReport>,
    /// Counters for this folder alone.
    pub stats: Stats,
    /// Whether the folder passes the duplication thresholds.
    pub visible: bool,
}

impl FolderReport {
    /// Files that pass the listing filters.
    pub fn listed_files(&self) -> impl Iterator<Item = &FileReport> {
        self.files.iter().filter(|f| f.listed)
    }
}

/// A complete report over all roots.
#[derive(Debug, Clone, Serialize)]
pub struct DuplicateReport {
    /// Every folder in walk order, visible or not.
    pub folders: Vec<FolderReport>,
    /// Counters over every folder.
    pub overall: Stats,
}

impl DuplicateReport {
    /// Folders that pass the duplication thresholds.
    pub fn visible_folders(&self) -> impl Iterator<Item = &FolderReport> {
        self.folders.iter().filter(|f| f.visible)
    }
}

/// Walks the report roots and classifies every file against the index.
///
/// Files are grouped by folder as the walk goes: a folder is classified and
/// handed to the caller as soon as the walk moves on to another folder, so
/// memory stays bounded by the largest folder rather than the whole tree.
pub struct DuplicateReporter {
    config: ReportConfig,
    store: Arc<IndexStore>,
    cancel: CancellationToken,
}

impl DuplicateReporter {
    pub fn new(config: ReportConfig, store: Arc<IndexStore>) -> Self {
        Self {
            config,
            store,
            cancel: CancellationToken::new(),
        }
    }

    /// Use an externally owned cancellation token.
    pub fn with_cancel_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Call `visit` once per folder holding at least one file and return the
    /// overall counters.
    pub fn for_each_folder<F>(&self, visit: F) -> Result<Stats, AnalyzeError>
    where
        F: FnMut(FolderReport),
    {
        let walker = Walker::new(WalkOptions {
            recurse: self.config.recurse,
            ignore_errors: self.config.ignore_errors,
        });

        let mut scope = FolderScope::new(self, visit);
        let mut failure = None;
        let walked = walker.walk(&self.config.roots, &self.cancel, |file| match scope.push(file) {
            Ok(()) => ControlFlow::Continue(()),
            Err(err) => {
                failure = Some(err);
                ControlFlow::Break(())
            }
        });

        if let Some(err) = failure {
            return Err(err.into());
        }
        let summary = walked?;
        let overall = scope.finish()?;

        info!(
            files = overall.file_count,
            duplicates = overall.duplicate_count,
            ignored = overall.ignored_count,
            warnings = summary.warnings.len(),
            "report complete"
        );
        Ok(overall)
    }

    /// Collect every folder into a single report.
    pub fn report(&self) -> Result<DuplicateReport, AnalyzeError> {
        let mut folders = Vec::new();
        let overall = self.for_each_folder(|folder| folders.push(folder))?;
        Ok(DuplicateReport { folders, overall })
    }

    /// Whether a folder passes both thresholds; both comparisons are inclusive
    /// and an undefined percentage counts as zero.
    pub fn is_visible(&self, stats: &Stats) -> bool {
        let by_count = stats.duplicate_percentage().unwrap_or(0.0);
        let by_bytes = stats.duplicate_byte_percentage().unwrap_or(0.0);
        self.config.min_dir_percent <= by_count.max(by_bytes)
            && self.config.min_dir_bytes <= stats.duplicate_bytes
    }

    /// Whether a file passes the listing filters. Statistics ignore them.
    pub fn is_listed(&self, size: u64, classification: &Classification) -> bool {
        size >= self.config.min_file_size
            && (!self.config.duplicates_only || classification.is_duplicate())
    }

    fn build_folder(
        &self,
        classifier: &Classifier<'_>,
        folder: PathBuf,
        mut files: Vec<FileDescriptor>,
    ) -> Result<FolderReport, IndexError> {
        files.sort_by(|a, b| a.name.cmp(&b.name));

        let mut stats = Stats::new();
        let mut reports = Vec::with_capacity(files.len());
        for file in files {
            let classification = classifier.classify(&file)?;
            match &classification {
                Classification::Unique => stats.add_unique(file.size),
                Classification::Duplicate { .. } => stats.add_duplicate(file.size),
                Classification::IgnoredZeroSize | Classification::IgnoredNotIndexed => {
                    stats.add_ignored(file.size)
                }
            }
            reports.push(FileReport {
                listed: self.is_listed(file.size, &classification),
                name: file.name.to_string_lossy().into_owned(),
                size: file.size,
                classification,
            });
        }

        let visible = self.is_visible(&stats);
        debug!(folder = %folder.display(), files = reports.len(), visible, "folder classified");
        Ok(FolderReport {
            folder,
            files: reports,
            stats,
            visible,
        })
    }
}

/// Files of the folder currently being walked.
struct FolderScope<'a, F> {
    reporter: &'a DuplicateReporter,
    classifier: Classifier<'a>,
    visit: F,
    current: Option<PathBuf>,
    files: Vec<FileDescriptor>,
    overall: Stats,
}

impl<'a, F> FolderScope<'a, F>
where
    F: FnMut(FolderReport),
{
    fn new(reporter: &'a DuplicateReporter, visit: F) -> Self {
        Self {
            reporter,
            classifier: Classifier::new(&reporter.store),
            visit,
            current: None,
            files: Vec::new(),
            overall: Stats::new(),
        }
    }

    fn push(&mut self, file: FileDescriptor) -> Result<(), IndexError> {
        if self.current.as_ref() != Some(&file.folder) {
            self.flush()?;
            self.current = Some(file.folder.clone());
        }
        self.files.push(file);
        Ok(())
    }

    fn flush(&mut self) -> Result<(), IndexError> {
        let Some(folder) = self.current.take() else {
            return Ok(());
        };
        let files = std::mem::take(&mut self.files);
        let report = self.reporter.build_folder(&self.classifier, folder, files)?;
        self.overall.merge(&report.stats);
        (self.visit)(report);
        Ok(())
    }

    fn finish(mut self) -> Result<Stats, IndexError> {
        self.flush()?;
        Ok(self.overall)
    }
}
