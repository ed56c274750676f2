use crate::error::AppError;
use crate::metadata::{KnownFileTypes, MetadataProvider};
use crate::model::{AliasTable, CancelToken, ScanFilter, ScanProgress, ScanStatus, ScanWarning, SourceDir};
use crate::path_norm;
use crate::resolver::TemplateResolver;
use crate::tree::{FileTree, LeafData, TreeSummary};
use std::path::{Path, MAIN_SEPARATOR};
use walkdir::{DirEntry, WalkDir};

/// Everything a finished scan hands back to the host: the proposed tree,
/// how the scan ended, the duplicate-checked totals and any per-file
/// problems that were recovered along the way.
#[derive(Debug)]
pub struct ScanResult {
    pub tree: FileTree,
    pub status: ScanStatus,
    pub summary: TreeSummary,
    pub warnings: Vec<ScanWarning>,
}

/// Rejects a source list containing the same directory twice or one
/// directory nested inside another. Nested roots would import the same
/// files twice.
pub fn validate_sources(sources: &[SourceDir]) -> Result<(), AppError> {
    for (i, a) in sources.iter().enumerate() {
        for b in &sources[i + 1..] {
            if path_norm::same_dir(&a.path, &b.path) {
                return Err(AppError::InvalidRequest(format!(
                    "source directories overlap: `{}` and `{}`",
                    a.path.display(),
                    b.path.display()
                )));
            }
        }
    }
    Ok(())
}

/// True when the destination equals or lies inside any selected source
/// directory. Hosts use this to reject a self-import before scanning.
pub fn destination_inside_sources(destination: &Path, sources: &[SourceDir]) -> bool {
    sources
        .iter()
        .filter(|source| source.selected)
        .any(|source| path_norm::same_dir(destination, &source.path))
}

/// Walks the selected source directories and builds the proposed
/// destination tree by rendering each accepted file's naming template.
///
/// Scanning is resumable in spirit but single-pass in practice: per-file
/// failures become warnings, cancellation is observed between directories
/// and the partial tree built so far is returned as-is.
pub struct Scanner<P> {
    provider: P,
    types: KnownFileTypes,
    resolver: TemplateResolver,
    aliases: AliasTable,
    filter: ScanFilter,
}

impl<P: MetadataProvider> Scanner<P> {
    pub fn new(
        provider: P,
        types: KnownFileTypes,
        resolver: TemplateResolver,
        aliases: AliasTable,
        filter: ScanFilter,
    ) -> Self {
        Self {
            provider,
            types,
            resolver,
            aliases,
            filter,
        }
    }

    pub fn scan<F>(
        &self,
        sources: &[SourceDir],
        cancel: &CancelToken,
        mut progress: F,
    ) -> Result<ScanResult, AppError>
    where
        F: FnMut(ScanProgress),
    {
        validate_sources(sources)?;

        let mut tree = FileTree::new();
        let mut warnings = Vec::new();
        let mut found = 0usize;
        let mut cancelled = false;

        'sources: for (index, source) in sources.iter().enumerate() {
            if !source.selected {
                continue;
            }
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }
            let walker = WalkDir::new(&source.path)
                .follow_links(true)
                .sort_by_file_name()
                .into_iter()
                .filter_entry(|entry| !is_hidden(entry));

            for entry in walker {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(error) => {
                        // Dangling symlinks vanish between listing and
                        // stat; those are skipped without a warning.
                        let not_found = error
                            .io_error()
                            .map(|io| io.kind() == std::io::ErrorKind::NotFound)
                            .unwrap_or(false);
                        if !not_found {
                            warnings.push(ScanWarning {
                                path: error
                                    .path()
                                    .map(|p| p.display().to_string())
                                    .unwrap_or_default(),
                                message: error.to_string(),
                            });
                        }
                        continue;
                    }
                };

                if entry.file_type().is_dir() {
                    if cancel.is_cancelled() {
                        cancelled = true;
                        break 'sources;
                    }
                    progress(ScanProgress {
                        current_dir: entry.path().display().to_string(),
                        found,
                    });
                    continue;
                }
                if !entry.file_type().is_file() {
                    continue;
                }

                let Some(kind) = self.types.kind_of(entry.path()) else {
                    continue;
                };
                if !self.filter.allows(kind) {
                    continue;
                }

                let metadata = match self.provider.metadata(entry.path()) {
                    Ok(metadata) => metadata,
                    Err(error) => {
                        warnings.push(ScanWarning {
                            path: entry.path().display().to_string(),
                            message: error.to_string(),
                        });
                        continue;
                    }
                };

                let (relative_dir, file_name) = self.render_name(&metadata);
                let original_name = entry.file_name().to_string_lossy().into_owned();
                let relative_source = entry
                    .path()
                    .strip_prefix(&source.path)
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|_| entry.path().to_path_buf());

                tree.insert(
                    &relative_dir,
                    &file_name,
                    LeafData {
                        source_dir: index,
                        relative_source,
                        original_name,
                        extension: metadata.extension.clone(),
                        kind,
                        metadata,
                    },
                );
                found += 1;
            }
        }

        let summary = tree
            .check_duplicates(FileTree::ROOT, true)
            .unwrap_or_default();
        let status = if cancelled {
            ScanStatus::Cancelled
        } else if summary.files == 0 {
            ScanStatus::NothingFound
        } else {
            ScanStatus::Completed
        };
        progress(ScanProgress {
            current_dir: String::new(),
            found,
        });

        Ok(ScanResult {
            tree,
            status,
            summary,
            warnings,
        })
    }

    /// Renders the file's template and repairs the result component by
    /// component, so no template can produce an invalid path.
    fn render_name(&self, metadata: &crate::model::FileMetadata) -> (String, String) {
        let template = self.resolver.resolve(&metadata.model);
        let rendered = template.render(metadata, &self.aliases);

        let directory: Vec<String> = rendered
            .directory
            .split(MAIN_SEPARATOR)
            .filter(|component| !component.trim().is_empty())
            .map(path_norm::sanitize_component)
            .collect();
        let file_name = path_norm::validate_file_name(&rendered.base, Some(&rendered.extension));
        (directory.join(&MAIN_SEPARATOR.to_string()), file_name)
    }
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .map(|name| name.starts_with('.'))
            .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::ExifMetadataProvider;
    use crate::template::Template;
    use std::fs;

    fn scanner() -> Scanner<ExifMetadataProvider> {
        Scanner::new(
            ExifMetadataProvider::default(),
            KnownFileTypes::default(),
            TemplateResolver::new(Vec::new()).unwrap(),
            AliasTable::new(),
            ScanFilter::default(),
        )
    }

    fn touch(path: &Path) {
        fs::write(path, b"data").unwrap();
    }

    #[test]
    fn scan_collects_known_files_and_keeps_names() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("IMG_0001.jpg"));
        touch(&dir.path().join("MVI_0002.mp4"));
        touch(&dir.path().join("notes.txt"));
        fs::create_dir(dir.path().join("sub")).unwrap();
        touch(&dir.path().join("sub").join("IMG_0003.CR2"));

        let sources = vec![SourceDir::new(dir.path())];
        let result = scanner()
            .scan(&sources, &CancelToken::new(), |_| {})
            .unwrap();

        assert_eq!(result.status, ScanStatus::Completed);
        assert_eq!(result.summary.files, 3);
        assert_eq!(result.summary.duplicates, 0);
        assert!(result.warnings.is_empty());

        let names: Vec<String> = result
            .tree
            .leaves_in_order()
            .iter()
            .map(|&id| result.tree.display_name(id).to_string())
            .collect();
        // fallback template keeps original names, extension lower-cased
        assert_eq!(names, ["IMG_0001.jpg", "IMG_0003.cr2", "MVI_0002.mp4"]);
    }

    #[test]
    fn scan_applies_filter() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("IMG_0001.jpg"));
        touch(&dir.path().join("MVI_0002.mp4"));

        let mut scanner = scanner();
        scanner.filter = ScanFilter {
            images: true,
            raw_images: true,
            video: false,
        };
        let sources = vec![SourceDir::new(dir.path())];
        let result = scanner
            .scan(&sources, &CancelToken::new(), |_| {})
            .unwrap();
        assert_eq!(result.summary.files, 1);
    }

    #[test]
    fn scan_skips_hidden_and_unselected() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join(".thumbnails")).unwrap();
        touch(&dir.path().join(".thumbnails").join("IMG_0001.jpg"));
        touch(&dir.path().join(".hidden.jpg"));
        touch(&dir.path().join("IMG_0002.jpg"));

        let other = tempfile::tempdir().unwrap();
        touch(&other.path().join("IMG_0003.jpg"));
        let mut unselected = SourceDir::new(other.path());
        unselected.selected = false;

        let sources = vec![SourceDir::new(dir.path()), unselected];
        let result = scanner()
            .scan(&sources, &CancelToken::new(), |_| {})
            .unwrap();
        assert_eq!(result.summary.files, 1);
    }

    #[test]
    fn empty_scan_reports_nothing_found() {
        let dir = tempfile::tempdir().unwrap();
        let sources = vec![SourceDir::new(dir.path())];
        let result = scanner()
            .scan(&sources, &CancelToken::new(), |_| {})
            .unwrap();
        assert_eq!(result.status, ScanStatus::NothingFound);
        assert!(result.tree.is_empty());
    }

    #[test]
    fn cancelled_token_stops_before_work() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("IMG_0001.jpg"));
        let cancel = CancelToken::new();
        cancel.cancel();
        let sources = vec![SourceDir::new(dir.path())];
        let result = scanner().scan(&sources, &cancel, |_| {}).unwrap();
        assert_eq!(result.status, ScanStatus::Cancelled);
        assert_eq!(result.summary.files, 0);
    }

    #[test]
    fn template_builds_directories() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("IMG_0001.jpg"));

        let sep = MAIN_SEPARATOR;
        let mut scanner = scanner();
        scanner.resolver = TemplateResolver::new(vec![(
            "*".to_string(),
            Template::compile(&format!("{{year}}{sep}{{month}}{sep}{{filename}}")).unwrap(),
        )])
        .unwrap();

        let sources = vec![SourceDir::new(dir.path())];
        let result = scanner
            .scan(&sources, &CancelToken::new(), |_| {})
            .unwrap();
        let leaf = result.tree.leaves_in_order()[0];
        let path = result.tree.full_path(leaf);
        assert_eq!(path.components().count(), 3);
        assert_eq!(path.file_name().unwrap(), "IMG_0001.jpg");
    }

    #[test]
    fn provider_warning_does_not_abort() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("IMG_0001.jpg"));

        struct Failing;
        impl MetadataProvider for Failing {
            fn metadata(
                &self,
                _path: &Path,
            ) -> Result<crate::model::FileMetadata, crate::metadata::MetadataError> {
                Err(crate::metadata::MetadataError::UnknownType)
            }
        }

        let scanner = Scanner::new(
            Failing,
            KnownFileTypes::default(),
            TemplateResolver::new(Vec::new()).unwrap(),
            AliasTable::new(),
            ScanFilter::default(),
        );
        let sources = vec![SourceDir::new(dir.path())];
        let result = scanner
            .scan(&sources, &CancelToken::new(), |_| {})
            .unwrap();
        assert_eq!(result.status, ScanStatus::NothingFound);
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn overlapping_sources_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("sub");
        fs::create_dir(&nested).unwrap();
        let sources = vec![SourceDir::new(dir.path()), SourceDir::new(&nested)];
        assert!(validate_sources(&sources).is_err());
        assert!(scanner().scan(&sources, &CancelToken::new(), |_| {}).is_err());
    }

    #[test]
    fn destination_check_honors_selection() {
        let dir = tempfile::tempdir().unwrap();
        let sources = vec![SourceDir::new(dir.path())];
        assert!(destination_inside_sources(&dir.path().join("out"), &sources));
        assert!(!destination_inside_sources(Path::new("/elsewhere"), &sources));

        let mut unselected = sources.clone();
        unselected[0].selected = false;
        assert!(!destination_inside_sources(&dir.path().join("out"), &unselected));
    }
}
