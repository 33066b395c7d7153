//! Upload a local directory to a provisioned site bucket
//!
//! Sync only reads the status file. The plan is computed from a local
//! walk and one bucket listing; `dry_run` stops after planning, so it
//! never issues a mutating call.

use super::{Workflow, required};
use crate::error::{Result, SiteError};
use crate::provider::{RemoteObject, SiteProvider};
use crate::resource::PutObject;
use crate::state::{DeploymentRecord, Scope, keys};
use flate2::Compression;
use flate2::write::GzEncoder;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Instant, UNIX_EPOCH};

/// S3 accepts at most this many keys per delete request
const DELETE_BATCH: usize = 1000;

const DEFAULT_INVALIDATION: &str = "/*";

#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Local directory whose contents become the bucket root
    pub source: PathBuf,
    /// Invalidation paths; empty means `/*`
    pub invalidate: Vec<String>,
    /// Gzip text-like content
    pub gzip: bool,
    /// Glob patterns (matched against keys and file names) to leave alone
    pub exclude: Vec<String>,
    /// Remove remote objects that no longer exist locally
    pub delete: bool,
    pub dry_run: bool,
}

impl SyncOptions {
    pub fn new(source: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            invalidate: Vec::new(),
            gzip: false,
            exclude: Vec::new(),
            delete: true,
            dry_run: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadReason {
    Missing,
    SizeChanged,
    Newer,
}

impl std::fmt::Display for UploadReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UploadReason::Missing => write!(f, "new"),
            UploadReason::SizeChanged => write!(f, "size changed"),
            UploadReason::Newer => write!(f, "modified"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedUpload {
    pub key: String,
    pub path: PathBuf,
    pub size: u64,
    pub reason: UploadReason,
    pub content_type: &'static str,
    pub gzip: bool,
}

/// What a sync will change
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncPlan {
    pub bucket: String,
    pub distribution_id: String,
    pub uploads: Vec<PlannedUpload>,
    pub deletes: Vec<String>,
    pub unchanged: usize,
    pub invalidation_paths: Vec<String>,
}

impl SyncPlan {
    pub fn is_empty(&self) -> bool {
        self.uploads.is_empty() && self.deletes.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct SyncReport {
    pub plan: SyncPlan,
    pub dry_run: bool,
    pub invalidation_id: Option<String>,
    pub duration_ms: u64,
}

struct LocalFile {
    path: PathBuf,
    size: u64,
    modified: Option<i64>,
}

impl<P: SiteProvider + ?Sized> Workflow<'_, P> {
    /// Compute what a sync would do without changing anything
    pub async fn plan_sync(
        &self,
        record: &DeploymentRecord,
        options: &SyncOptions,
    ) -> Result<SyncPlan> {
        let bucket = required(record, Scope::Root, keys::BUCKET_NAME)?.to_string();
        let distribution_id = required(record, Scope::Root, keys::DISTRIBUTION_ID)?.to_string();

        let excludes = compile_excludes(&options.exclude)?;
        let local = walk_source(&options.source, &excludes)?;
        let remote: BTreeMap<String, RemoteObject> = self
            .provider
            .list_objects(&bucket)
            .await?
            .into_iter()
            .map(|o| (o.key.clone(), o))
            .collect();

        let mut uploads = Vec::new();
        let mut unchanged = 0;
        for (key, file) in &local {
            let content_type = content_type_for(key);
            let gzip = options.gzip && is_compressible(content_type);
            let reason = match remote.get(key) {
                None => Some(UploadReason::Missing),
                // compressed objects never match the local size
                Some(object) if !gzip && object.size != file.size => {
                    Some(UploadReason::SizeChanged)
                }
                Some(object) => match (file.modified, object.last_modified) {
                    (Some(local), Some(remote)) if local > remote => Some(UploadReason::Newer),
                    _ => None,
                },
            };
            match reason {
                Some(reason) => uploads.push(PlannedUpload {
                    key: key.clone(),
                    path: file.path.clone(),
                    size: file.size,
                    reason,
                    content_type,
                    gzip,
                }),
                None => unchanged += 1,
            }
        }

        let deletes = if options.delete {
            remote
                .keys()
                .filter(|key| !local.contains_key(*key) && !is_excluded(&excludes, key))
                .cloned()
                .collect()
        } else {
            Vec::new()
        };

        let invalidation_paths = if options.invalidate.is_empty() {
            vec![DEFAULT_INVALIDATION.to_string()]
        } else {
            options
                .invalidate
                .iter()
                .map(|p| {
                    if p.starts_with('/') {
                        p.clone()
                    } else {
                        format!("/{}", p)
                    }
                })
                .collect()
        };

        Ok(SyncPlan {
            bucket,
            distribution_id,
            uploads,
            deletes,
            unchanged,
            invalidation_paths,
        })
    }

    /// Upload changed files, delete stale objects and invalidate the cache
    pub async fn sync(&self, record: &DeploymentRecord, options: &SyncOptions) -> Result<SyncReport> {
        let started = Instant::now();
        let plan = self.plan_sync(record, options).await?;

        if options.dry_run {
            tracing::info!(
                "Dry run: {} uploads, {} deletes planned",
                plan.uploads.len(),
                plan.deletes.len()
            );
            return Ok(SyncReport {
                plan,
                dry_run: true,
                invalidation_id: None,
                duration_ms: started.elapsed().as_millis() as u64,
            });
        }

        for upload in &plan.uploads {
            let object = read_object(upload).await?;
            self.observer
                .on_message(&format!("upload {} ({})", upload.key, upload.reason));
            self.provider.put_object(&plan.bucket, object).await?;
        }

        for batch in plan.deletes.chunks(DELETE_BATCH) {
            for key in batch {
                self.observer.on_message(&format!("delete {}", key));
            }
            self.provider.delete_objects(&plan.bucket, batch).await?;
        }

        let invalidation_id = if plan.is_empty() {
            tracing::info!("Bucket {} already up to date", plan.bucket);
            None
        } else {
            let id = self
                .provider
                .create_invalidation(&plan.distribution_id, &plan.invalidation_paths)
                .await?;
            self.observer.on_message(&format!(
                "invalidation {} for {}",
                id,
                plan.invalidation_paths.join(" ")
            ));
            Some(id)
        };

        Ok(SyncReport {
            plan,
            dry_run: false,
            invalidation_id,
            duration_ms: started.elapsed().as_millis() as u64,
        })
    }
}

fn compile_excludes(patterns: &[String]) -> Result<Vec<glob::Pattern>> {
    patterns
        .iter()
        .map(|p| {
            glob::Pattern::new(p).map_err(|e| {
                SiteError::InvalidConfig(format!("invalid exclude pattern '{}': {}", p, e))
            })
        })
        .collect()
}

fn is_excluded(excludes: &[glob::Pattern], key: &str) -> bool {
    let file_name = key.rsplit('/').next().unwrap_or(key);
    excludes
        .iter()
        .any(|p| p.matches(key) || p.matches(file_name))
}

/// Every regular file under `source`, keyed by its bucket key
fn walk_source(source: &Path, excludes: &[glob::Pattern]) -> Result<BTreeMap<String, LocalFile>> {
    if !source.is_dir() {
        return Err(SiteError::InvalidConfig(format!(
            "{} is not a directory",
            source.display()
        )));
    }
    let root = source.to_str().ok_or_else(|| {
        SiteError::InvalidConfig(format!("{} is not valid UTF-8", source.display()))
    })?;
    let pattern = format!("{}/**/*", glob::Pattern::escape(root.trim_end_matches('/')));

    let entries = glob::glob(&pattern)
        .map_err(|e| SiteError::InvalidConfig(format!("cannot walk {}: {}", root, e)))?;

    let mut files = BTreeMap::new();
    for entry in entries {
        let path = entry.map_err(|e| SiteError::Io(e.into()))?;
        if !path.is_file() {
            continue;
        }
        let Some(key) = object_key(source, &path) else {
            continue;
        };
        if is_excluded(excludes, &key) {
            tracing::debug!("Excluded {}", key);
            continue;
        }
        let metadata = std::fs::metadata(&path)?;
        let modified = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64);
        files.insert(
            key,
            LocalFile {
                path,
                size: metadata.len(),
                modified,
            },
        );
    }
    Ok(files)
}

fn object_key(source: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(source).ok()?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

async fn read_object(upload: &PlannedUpload) -> Result<PutObject> {
    let raw = tokio::fs::read(&upload.path).await?;
    let (body, content_encoding) = if upload.gzip {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&raw)?;
        (encoder.finish()?, Some("gzip".to_string()))
    } else {
        (raw, None)
    };
    Ok(PutObject {
        key: upload.key.clone(),
        body,
        content_type: upload.content_type.to_string(),
        content_encoding,
        cache_control: cache_control_for(upload.content_type).to_string(),
    })
}

/// `Content-Type` for a key, by extension
pub fn content_type_for(key: &str) -> &'static str {
    let extension = Path::new(key)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match extension.as_str() {
        "html" | "htm" => "text/html; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "js" | "mjs" => "application/javascript",
        "json" | "map" => "application/json",
        "webmanifest" => "application/manifest+json",
        "xml" => "application/xml",
        "txt" => "text/plain; charset=utf-8",
        "md" => "text/markdown; charset=utf-8",
        "csv" => "text/csv; charset=utf-8",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "avif" => "image/avif",
        "ico" => "image/x-icon",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",
        "otf" => "font/otf",
        "pdf" => "application/pdf",
        "wasm" => "application/wasm",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "mp3" => "audio/mpeg",
        "zip" => "application/zip",
        _ => "application/octet-stream",
    }
}

/// Whether gzip is worth applying to this content type
pub fn is_compressible(content_type: &str) -> bool {
    let mime = content_type.split(';').next().unwrap_or_default().trim();
    mime.starts_with("text/")
        || matches!(
            mime,
            "application/javascript"
                | "application/json"
                | "application/manifest+json"
                | "application/xml"
                | "image/svg+xml"
                | "application/wasm"
        )
}

/// HTML revalidates on every request; everything else caches for a day
pub fn cache_control_for(content_type: &str) -> &'static str {
    if content_type.starts_with("text/html") {
        "no-cache"
    } else {
        "public, max-age=86400"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_types() {
        assert_eq!(content_type_for("index.html"), "text/html; charset=utf-8");
        assert_eq!(content_type_for("assets/APP.JS"), "application/javascript");
        assert_eq!(content_type_for("fonts/a.woff2"), "font/woff2");
        assert_eq!(content_type_for("LICENSE"), "application/octet-stream");
    }

    #[test]
    fn test_compressible_and_cache_control() {
        assert!(is_compressible("text/css; charset=utf-8"));
        assert!(is_compressible("image/svg+xml"));
        assert!(!is_compressible("image/png"));
        assert_eq!(cache_control_for("text/html; charset=utf-8"), "no-cache");
        assert_eq!(cache_control_for("image/png"), "public, max-age=86400");
    }

    #[test]
    fn test_exclude_matches_key_or_file_name() {
        let excludes = compile_excludes(&["*.map".into(), ".DS_Store".into()]).unwrap();
        assert!(is_excluded(&excludes, "js/app.js.map"));
        assert!(is_excluded(&excludes, "img/.DS_Store"));
        assert!(!is_excluded(&excludes, "js/app.js"));
        assert!(compile_excludes(&["[".into()]).is_err());
    }

    #[test]
    fn test_walk_source_keys() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("css")).unwrap();
        std::fs::write(dir.path().join("index.html"), "<h1>hi</h1>").unwrap();
        std::fs::write(dir.path().join("css/site.css"), "body{}").unwrap();
        std::fs::write(dir.path().join("notes.tmp"), "x").unwrap();

        let excludes = compile_excludes(&["*.tmp".into()]).unwrap();
        let files = walk_source(dir.path(), &excludes).unwrap();
        let keys: Vec<_> = files.keys().cloned().collect();
        assert_eq!(keys, vec!["css/site.css", "index.html"]);
        assert_eq!(files["index.html"].size, 11);
    }

    #[test]
    fn test_walk_source_requires_directory() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("public");
        assert!(matches!(
            walk_source(&missing, &[]),
            Err(SiteError::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn test_read_object_gzip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.js");
        std::fs::write(&path, "console.log('x');".repeat(50)).unwrap();

        let upload = PlannedUpload {
            key: "app.js".into(),
            path,
            size: 0,
            reason: UploadReason::Missing,
            content_type: "application/javascript",
            gzip: true,
        };
        let object = read_object(&upload).await.unwrap();
        assert_eq!(object.content_encoding.as_deref(), Some("gzip"));
        assert_eq!(&object.body[..2], &[0x1f, 0x8b]);
        assert_eq!(object.cache_control, "public, max-age=86400");
    }
}
