//! Disk storage for uploaded files.
//!
//! Three categories share one root directory: resumes, profile pictures and
//! company logos. Each one has its own folder, multipart field name and
//! accepted MIME types. Files are never overwritten: names carry a
//! millisecond timestamp and a random suffix.

use std::path::{Path, PathBuf};

use axum::extract::multipart::Field;
use rand::Rng;

use crate::error::Result;

/// Upload category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadKind {
    Resume,
    ProfilePicture,
    CompanyLogo,
}

impl UploadKind {
    pub const ALL: [UploadKind; 3] = [
        UploadKind::Resume,
        UploadKind::ProfilePicture,
        UploadKind::CompanyLogo,
    ];

    /// Folder below the uploads root.
    pub fn directory(&self) -> &'static str {
        match self {
            UploadKind::Resume => "resumes",
            UploadKind::ProfilePicture => "profile-pictures",
            UploadKind::CompanyLogo => "company-logos",
        }
    }

    /// Multipart field carrying the file.
    pub fn field_name(&self) -> &'static str {
        match self {
            UploadKind::Resume => "resume",
            UploadKind::ProfilePicture => "avatar",
            UploadKind::CompanyLogo => "logo",
        }
    }

    fn prefix(&self) -> &'static str {
        match self {
            UploadKind::Resume => "resume",
            UploadKind::ProfilePicture => "avatar",
            UploadKind::CompanyLogo => "logo",
        }
    }

    /// Accepted MIME types and their canonical extension.
    pub fn accepted(&self) -> &'static [(&'static str, &'static str)] {
        match self {
            UploadKind::Resume => &[
                ("application/pdf", ".pdf"),
                ("application/msword", ".doc"),
                (
                    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
                    ".docx",
                ),
            ],
            UploadKind::ProfilePicture => &[
                ("image/jpeg", ".jpg"),
                ("image/png", ".png"),
                ("image/gif", ".gif"),
                ("image/webp", ".webp"),
            ],
            UploadKind::CompanyLogo => &[
                ("image/jpeg", ".jpg"),
                ("image/png", ".png"),
                ("image/gif", ".gif"),
                ("image/webp", ".webp"),
                ("image/svg+xml", ".svg"),
            ],
        }
    }

    fn type_message(&self) -> &'static str {
        match self {
            UploadKind::Resume => "Only PDF, DOC and DOCX files are allowed.",
            UploadKind::ProfilePicture => {
                "Only JPEG, PNG, GIF and WEBP images are allowed."
            },
            UploadKind::CompanyLogo => {
                "Only JPEG, PNG, GIF, WEBP and SVG images are allowed."
            },
        }
    }

    /// Resolve the MIME type from the declared content type, falling back on
    /// the file extension when the client sent a generic one.
    pub fn resolve_mime(
        &self,
        content_type: Option<&str>,
        original_name: &str,
    ) -> Option<&'static str> {
        let accepted = self.accepted();

        if let Some(ct) = content_type {
            let ct = ct.split(';').next().unwrap_or_default().trim();
            if let Some((mime, _)) =
                accepted.iter().find(|(mime, _)| mime.eq_ignore_ascii_case(ct))
            {
                return Some(mime);
            }
            if ct != "application/octet-stream" && !ct.is_empty() {
                return None;
            }
        }

        let ext = extension(original_name)?;
        accepted
            .iter()
            .find(|(_, e)| *e == ext || (ext == ".jpeg" && *e == ".jpg"))
            .map(|(mime, _)| *mime)
    }
}

fn extension(name: &str) -> Option<String> {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{}", ext.to_ascii_lowercase()))
}

/// Errors raised by upload filters.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("No file uploaded. Please provide a `{}` file.", .0.field_name())]
    MissingFile(UploadKind),
    #[error("{}", .kind.type_message())]
    InvalidType { kind: UploadKind },
    #[error("File is too large. Maximum size is {}MB.", .max / (1024 * 1024))]
    TooLarge { kind: UploadKind, max: usize },
}

impl UploadError {
    /// Input responsible for the error.
    pub fn field(&self) -> &'static str {
        match self {
            UploadError::MissingFile(kind)
            | UploadError::InvalidType { kind }
            | UploadError::TooLarge { kind, .. } => kind.field_name(),
        }
    }
}

/// A file read from a multipart body, not yet persisted.
#[derive(Debug, Clone)]
pub struct IncomingFile {
    pub original_name: String,
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

impl IncomingFile {
    /// Drain a multipart field.
    pub async fn from_field(field: Field<'_>) -> Result<Self> {
        let original_name = field.file_name().unwrap_or("upload").to_string();
        let content_type = field.content_type().map(str::to_string);
        let data = field.bytes().await?.to_vec();

        Ok(Self {
            original_name,
            content_type,
            data,
        })
    }
}

/// File written on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredFile {
    pub filename: String,
    pub original_name: String,
    pub mime_type: &'static str,
    pub size: u64,
    pub path: PathBuf,
    pub url: String,
}

/// Uploads directory manager.
#[derive(Debug, Clone)]
pub struct Uploads {
    root: PathBuf,
    max_file_size: usize,
}

impl Uploads {
    /// Create a new [`Uploads`].
    pub fn new(root: impl Into<PathBuf>, max_file_size: usize) -> Self {
        Self {
            root: root.into(),
            max_file_size,
        }
    }

    /// Root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Maximum size of one file.
    pub fn max_file_size(&self) -> usize {
        self.max_file_size
    }

    /// Create every category folder.
    pub async fn ensure_dirs(&self) -> std::io::Result<()> {
        for kind in UploadKind::ALL {
            let dir = self.root.join(kind.directory());
            tokio::fs::create_dir_all(&dir).await?;
            tracing::debug!(dir = %dir.display(), "upload directory ready");
        }
        Ok(())
    }

    /// Absolute path of a stored file.
    pub fn path(&self, kind: UploadKind, filename: &str) -> PathBuf {
        // Only the last component is kept so a stored name cannot escape
        // its folder.
        let name = Path::new(filename)
            .file_name()
            .map(|n| n.to_owned())
            .unwrap_or_default();
        self.root.join(kind.directory()).join(name)
    }

    /// Public URL of a stored file.
    pub fn url(&self, kind: UploadKind, filename: &str) -> String {
        format!("/uploads/{}/{}", kind.directory(), filename)
    }

    /// Check type and size of an incoming file.
    pub fn check(
        &self,
        kind: UploadKind,
        file: &IncomingFile,
    ) -> std::result::Result<&'static str, UploadError> {
        let mime = kind
            .resolve_mime(file.content_type.as_deref(), &file.original_name)
            .ok_or(UploadError::InvalidType { kind })?;

        if file.data.is_empty() {
            return Err(UploadError::MissingFile(kind));
        }

        if file.data.len() > self.max_file_size {
            return Err(UploadError::TooLarge {
                kind,
                max: self.max_file_size,
            });
        }

        Ok(mime)
    }

    /// Validate and write a file on disk.
    pub async fn store(
        &self,
        kind: UploadKind,
        file: &IncomingFile,
    ) -> Result<StoredFile> {
        let mime = self.check(kind, file)?;
        let ext = extension(&file.original_name)
            .filter(|ext| kind.accepted().iter().any(|(_, e)| e == ext))
            .unwrap_or_else(|| {
                kind.accepted()
                    .iter()
                    .find(|(m, _)| *m == mime)
                    .map(|(_, e)| e.to_string())
                    .unwrap_or_default()
            });

        let filename = unique_filename(kind.prefix(), &ext);
        let path = self.path(kind, &filename);
        tokio::fs::write(&path, &file.data).await?;
        metrics::counter!("uploads_stored_total", "kind" => kind.directory())
            .increment(1);

        tracing::debug!(
            kind = kind.directory(),
            %filename,
            size = file.data.len(),
            "file stored"
        );

        Ok(StoredFile {
            url: self.url(kind, &filename),
            filename,
            original_name: file.original_name.clone(),
            mime_type: mime,
            size: file.data.len() as u64,
            path,
        })
    }

    /// Remove a stored file. Missing files and IO failures are only logged.
    pub async fn remove(&self, kind: UploadKind, filename: &str) -> bool {
        let path = self.path(kind, filename);

        match tokio::fs::try_exists(&path).await {
            Ok(true) => match tokio::fs::remove_file(&path).await {
                Ok(()) => true,
                Err(err) => {
                    tracing::warn!(error = %err, path = %path.display(), "cannot remove file");
                    false
                },
            },
            Ok(false) => {
                tracing::debug!(path = %path.display(), "file already gone");
                false
            },
            Err(err) => {
                tracing::warn!(error = %err, path = %path.display(), "cannot stat file");
                false
            },
        }
    }
}

fn unique_filename(prefix: &str, ext: &str) -> String {
    let millis = chrono::Utc::now().timestamp_millis();
    let suffix: u32 = rand::thread_rng().gen_range(0..1_000_000_000);
    format!("{prefix}-{millis}-{suffix:09}{ext}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pdf(size: usize) -> IncomingFile {
        IncomingFile {
            original_name: "Resume.PDF".into(),
            content_type: Some("application/pdf".into()),
            data: vec![b'%'; size],
        }
    }

    #[test]
    fn test_resolve_mime() {
        let kind = UploadKind::Resume;
        assert_eq!(
            kind.resolve_mime(Some("application/pdf"), "cv.pdf"),
            Some("application/pdf")
        );
        assert_eq!(
            kind.resolve_mime(Some("application/octet-stream"), "cv.docx"),
            Some(
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            )
        );
        assert_eq!(kind.resolve_mime(None, "cv.doc"), Some("application/msword"));
        assert_eq!(kind.resolve_mime(Some("image/png"), "cv.pdf"), None);
        assert_eq!(kind.resolve_mime(None, "cv.txt"), None);

        assert_eq!(
            UploadKind::ProfilePicture.resolve_mime(None, "me.JPEG"),
            Some("image/jpeg")
        );
    }

    #[test]
    fn test_check_limits() {
        let uploads = Uploads::new("/tmp", 1024);

        assert!(uploads.check(UploadKind::Resume, &pdf(1024)).is_ok());
        assert!(matches!(
            uploads.check(UploadKind::Resume, &pdf(1025)),
            Err(UploadError::TooLarge { max: 1024, .. })
        ));
        assert!(matches!(
            uploads.check(UploadKind::Resume, &pdf(0)),
            Err(UploadError::MissingFile(UploadKind::Resume))
        ));
        assert!(matches!(
            uploads.check(UploadKind::CompanyLogo, &pdf(10)),
            Err(UploadError::InvalidType { .. })
        ));
    }

    #[test]
    fn test_path_stays_in_folder() {
        let uploads = Uploads::new("/srv/uploads", 1024);
        assert_eq!(
            uploads.path(UploadKind::Resume, "../../etc/passwd"),
            PathBuf::from("/srv/uploads/resumes/passwd")
        );
    }

    #[tokio::test]
    async fn test_store_and_remove() {
        let dir = tempfile::tempdir().unwrap();
        let uploads = Uploads::new(dir.path(), 1024 * 1024);
        uploads.ensure_dirs().await.unwrap();

        let first = uploads.store(UploadKind::Resume, &pdf(128)).await.unwrap();
        let second = uploads.store(UploadKind::Resume, &pdf(128)).await.unwrap();

        assert_ne!(first.filename, second.filename);
        assert!(first.filename.starts_with("resume-"));
        assert!(first.filename.ends_with(".pdf"));
        assert_eq!(first.size, 128);
        assert_eq!(first.url, format!("/uploads/resumes/{}", first.filename));
        assert!(first.path.is_file());

        assert!(uploads.remove(UploadKind::Resume, &first.filename).await);
        assert!(!first.path.exists());
        // Second removal is a no-op.
        assert!(!uploads.remove(UploadKind::Resume, &first.filename).await);
    }

    #[tokio::test]
    async fn test_store_is_counted() {
        let recorder =
            metrics_exporter_prometheus::PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        let _guard = metrics::set_default_local_recorder(&recorder);

        let dir = tempfile::tempdir().unwrap();
        let uploads = Uploads::new(dir.path(), 1024 * 1024);
        uploads.ensure_dirs().await.unwrap();
        uploads.store(UploadKind::Resume, &pdf(64)).await.unwrap();
        assert!(uploads.store(UploadKind::Resume, &pdf(0)).await.is_err());

        assert!(
            handle
                .render()
                .contains("uploads_stored_total{kind=\"resumes\"} 1")
        );
    }
}
