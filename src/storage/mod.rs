//! Durable JSON document storage for crawled content.

pub mod naming;

use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::{FolderOrganization, OrganizeBy};
use crate::models::{ArticleRecord, CategoryRecord, UrlKind};

const CRAWLER_VERSION: &str = env!("CARGO_PKG_VERSION");
const FILE_FORMAT_VERSION: &str = "1.0";

/// Serialize a JSON value to `path` through a sibling temp file, fsync, and
/// rename, so a crash can never leave a partial file behind. Output is
/// two-space indented with sorted keys.
pub fn write_json_atomic(path: &Path, value: &serde_json::Value) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    let tmp = path.with_extension("tmp");
    let data = serde_json::to_string_pretty(value)?;
    {
        let mut file = fs::File::create(&tmp)
            .with_context(|| format!("Failed to create temp file {}", tmp.display()))?;
        file.write_all(data.as_bytes())?;
        file.write_all(b"\n")?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)
        .with_context(|| format!("Failed to move {} into place", path.display()))?;
    Ok(())
}

/// Which bucket a document lands in under type-organized layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Category,
    Article,
    General,
}

impl ContentKind {
    fn subfolder(self) -> &'static str {
        match self {
            ContentKind::Category => "categories",
            ContentKind::Article => "articles",
            ContentKind::General => "general",
        }
    }
}

/// Storage size/count summary for the final report.
#[derive(Debug, Clone, Serialize)]
pub struct StorageStats {
    pub total_files: usize,
    pub category_files: usize,
    pub article_files: usize,
    pub total_size_bytes: u64,
    pub output_directory: PathBuf,
}

/// Writes content documents and tracks the set of relative paths already
/// created.
///
/// Uniqueness is checked against relative paths, so under non-flat layouts
/// two files may share a basename as long as they live in different
/// subfolders.
pub struct FileStore {
    output_dir: PathBuf,
    organize_by: OrganizeBy,
    category_folder: String,
    create_subfolders: bool,
    max_filename_length: usize,
    existing: Mutex<HashSet<String>>,
}

impl FileStore {
    pub fn new(
        output_dir: impl Into<PathBuf>,
        organization: &FolderOrganization,
        category_folder: String,
        max_filename_length: usize,
    ) -> Result<Self> {
        let output_dir = output_dir.into();
        fs::create_dir_all(&output_dir)
            .with_context(|| format!("Cannot create output directory {}", output_dir.display()))?;
        let store = Self {
            output_dir,
            organize_by: organization.organize_by,
            category_folder,
            create_subfolders: organization.create_subfolders,
            max_filename_length,
            existing: Mutex::new(HashSet::new()),
        };
        store.scan_existing();
        Ok(store)
    }

    /// Persist a category record; returns the path written.
    pub fn save_category(&self, record: &CategoryRecord) -> Result<PathBuf> {
        let filename =
            naming::sanitize_title(&record.title, UrlKind::Category, self.max_filename_length)?;
        let path = self
            .write_document(&filename, record, ContentKind::Category)
            .with_context(|| format!("Cannot save category data for {:?}", record.title))?;
        info!(title = %record.title, path = %path.display(), "Saved category");
        Ok(path)
    }

    /// Persist an article record; returns the path written.
    pub fn save_article(&self, record: &ArticleRecord) -> Result<PathBuf> {
        let filename =
            naming::sanitize_title(&record.title, UrlKind::Article, self.max_filename_length)?;
        let path = self
            .write_document(&filename, record, ContentKind::Article)
            .with_context(|| format!("Cannot save article data for {:?}", record.title))?;
        info!(title = %record.title, path = %path.display(), "Saved article");
        Ok(path)
    }

    /// Persist an arbitrary JSON payload under a sanitized basename.
    pub fn save_json(
        &self,
        basename: &str,
        payload: &serde_json::Value,
        kind: ContentKind,
    ) -> Result<PathBuf> {
        let mut filename = naming::sanitize_filename(basename, self.max_filename_length)?;
        if !filename.ends_with(".json") {
            filename.push_str(".json");
        }
        let path = self
            .write_document(&filename, payload, kind)
            .with_context(|| format!("Cannot save JSON data {basename:?}"))?;
        debug!(path = %path.display(), "Saved JSON document");
        Ok(path)
    }

    /// Whether a relative path has already been written (or pre-existed).
    pub fn exists(&self, relative_path: &str) -> bool {
        self.existing
            .lock()
            .expect("store lock poisoned")
            .contains(relative_path)
    }

    pub fn existing_files(&self) -> HashSet<String> {
        self.existing.lock().expect("store lock poisoned").clone()
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Count and measure what has been stored so far.
    pub fn storage_stats(&self) -> StorageStats {
        let existing = self.existing.lock().expect("store lock poisoned");
        let mut total_size_bytes = 0;
        let mut category_files = 0;
        for relative in existing.iter() {
            let name = Path::new(relative)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            if name.starts_with("category_") {
                category_files += 1;
            }
            if let Ok(meta) = fs::metadata(self.output_dir.join(relative)) {
                total_size_bytes += meta.len();
            }
        }
        StorageStats {
            total_files: existing.len(),
            category_files,
            article_files: existing.len() - category_files,
            total_size_bytes,
            output_directory: self.output_dir.clone(),
        }
    }

    /// Remove stray temp files left by an earlier crash. Returns how many
    /// were deleted.
    pub fn cleanup_temp_files(&self) -> usize {
        let mut removed = 0;
        for entry in WalkDir::new(&self.output_dir).into_iter().filter_map(|e| e.ok()) {
            let path = entry.path();
            if entry.file_type().is_file()
                && path.extension().is_some_and(|ext| ext == "tmp")
            {
                match fs::remove_file(path) {
                    Ok(()) => {
                        removed += 1;
                        debug!(path = %path.display(), "Removed temporary file");
                    }
                    Err(err) => warn!(path = %path.display(), %err, "Could not remove temp file"),
                }
            }
        }
        if removed > 0 {
            info!(removed, "Cleaned up temporary files");
        }
        removed
    }

    fn write_document<T: Serialize>(
        &self,
        filename: &str,
        payload: &T,
        kind: ContentKind,
    ) -> Result<PathBuf> {
        let target_dir = self.target_dir(kind);
        let relative = if target_dir.as_os_str().is_empty() {
            filename.to_string()
        } else {
            target_dir.join(filename).to_string_lossy().into_owned()
        };

        let unique_relative = {
            let mut existing = self.existing.lock().expect("store lock poisoned");
            let unique = naming::unique_name(&relative, &existing)?;
            existing.insert(unique.clone());
            unique
        };

        let path = self.output_dir.join(&unique_relative);
        let mut value = serde_json::to_value(payload)?;
        if let Some(map) = value.as_object_mut() {
            map.insert(
                "_metadata".to_string(),
                json!({
                    "saved_at": Utc::now(),
                    "crawler_version": CRAWLER_VERSION,
                    "file_format_version": FILE_FORMAT_VERSION,
                }),
            );
        }
        write_json_atomic(&path, &value)?;
        Ok(path)
    }

    /// Relative directory a document of this kind belongs in.
    fn target_dir(&self, kind: ContentKind) -> PathBuf {
        match self.organize_by {
            OrganizeBy::Flat => PathBuf::new(),
            OrganizeBy::Category => {
                let mut dir = PathBuf::from(&self.category_folder);
                if self.create_subfolders {
                    dir.push(kind.subfolder());
                }
                dir
            }
            OrganizeBy::Date => {
                let mut dir = PathBuf::from(Utc::now().format("%Y-%m-%d").to_string());
                if self.create_subfolders {
                    dir.push(kind.subfolder());
                }
                dir
            }
            OrganizeBy::Type => PathBuf::from(kind.subfolder()),
        }
    }

    /// Pre-populate the existing-names set from every JSON file already in
    /// the output root.
    fn scan_existing(&self) {
        let mut existing = self.existing.lock().expect("store lock poisoned");
        for entry in WalkDir::new(&self.output_dir).into_iter().filter_map(|e| e.ok()) {
            if entry.file_type().is_file()
                && entry.path().extension().is_some_and(|ext| ext == "json")
            {
                if let Ok(relative) = entry.path().strip_prefix(&self.output_dir) {
                    existing.insert(relative.to_string_lossy().into_owned());
                }
            }
        }
        debug!(count = existing.len(), "Loaded existing files");
    }
}
