use std::{
    io::Write,
    path::{Path, PathBuf},
};

use html2text::render::text_renderer::TrivialDecorator;
use reqwest::{header::CONTENT_TYPE, Client};
use tempfile::NamedTempFile;

use crate::{
    error::PipelineError,
    source::{is_remote, DocumentSource},
};

/// Wide enough that html2text never wraps a paragraph mid-sentence
const HTML_WRAP_WIDTH: usize = 10_000;

#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("Input file not found: {0}")]
    NotFound(PathBuf),
    #[error("HTTP error: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Download failed: {status} - {url}")]
    Download { status: u16, url: String },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Converter `{program}` failed: {message}")]
    Converter { program: String, message: String },
}

impl From<DocumentError> for PipelineError {
    fn from(value: DocumentError) -> Self {
        match value {
            DocumentError::NotFound(path) => {
                PipelineError::config(format!("input file not found: {}", path.display()))
            }
            other => PipelineError::collaborator("document source", other),
        }
    }
}

/// Fetches documents from disk or over HTTP and extracts their text.
///
/// Plain text and markdown are read as is and HTML is reduced to its text.
/// Everything else (PDF, DOCX, ...) goes through an external converter
/// program that prints markdown to stdout, `markitdown` by default.
#[derive(Debug, Clone)]
pub struct DocumentFetcher {
    client: Client,
    converter: String,
    download_dir: Option<PathBuf>,
}

impl Default for DocumentFetcher {
    fn default() -> Self {
        Self {
            client: Client::new(),
            converter: "markitdown".into(),
            download_dir: None,
        }
    }
}

impl DocumentFetcher {
    pub fn with_converter(mut self, program: impl Into<String>) -> Self {
        self.converter = program.into();
        self
    }

    /// Where URL downloads are staged, the system temp dir if unset
    pub fn with_download_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.download_dir = Some(dir.into());
        self
    }

    /// Downloads `url` into a temporary file that is deleted when dropped
    #[tracing::instrument(skip(self))]
    async fn download(&self, url: &str) -> Result<NamedTempFile, DocumentError> {
        let resp = self
            .client
            .get(url)
            .header("Accept-Language", "en-US,en;q=0.9")
            .send()
            .await
            .inspect_err(|e| tracing::error!(error = %e, "Failed to download document"))?;

        if !resp.status().is_success() {
            return Err(DocumentError::Download {
                status: resp.status().as_u16(),
                url: url.to_string(),
            });
        }

        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let extension = extension_for(url, content_type.as_deref());

        let bytes = resp.bytes().await?;
        let suffix = format!(".{extension}");
        let mut builder = tempfile::Builder::new();
        builder.prefix("read-aloud-download-").suffix(&suffix);
        let mut file = match &self.download_dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };
        file.write_all(&bytes)?;
        file.flush()?;

        tracing::debug!(path = ?file.path(), bytes = bytes.len(), "Downloaded document");
        Ok(file)
    }

    #[tracing::instrument(skip(self))]
    async fn extract(&self, path: &Path) -> Result<String, DocumentError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        match extension.as_str() {
            "txt" | "text" | "md" | "markdown" => Ok(tokio::fs::read_to_string(path).await?),
            "html" | "htm" => {
                let html = tokio::fs::read_to_string(path).await?;
                Ok(html_to_text(&html))
            }
            _ => self.convert(path).await,
        }
    }

    async fn convert(&self, path: &Path) -> Result<String, DocumentError> {
        let output = tokio::process::Command::new(&self.converter)
            .arg(path)
            .output()
            .await
            .map_err(|e| DocumentError::Converter {
                program: self.converter.clone(),
                message: e.to_string(),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DocumentError::Converter {
                program: self.converter.clone(),
                message: stderr.lines().last().unwrap_or("unknown error").to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl DocumentSource for DocumentFetcher {
    type Error = DocumentError;

    async fn fetch_text(&self, location: &str) -> Result<String, Self::Error> {
        if is_remote(location) {
            let download = self.download(location).await?;
            let text = self.extract(download.path()).await;
            // the download is removed whether or not extraction succeeded
            let path = download.path().to_path_buf();
            match download.close() {
                Ok(()) => tracing::debug!(?path, "Deleted temporary download"),
                Err(e) => tracing::warn!(error = ?e, ?path, "Failed to delete temporary download"),
            }
            return text;
        }

        let path = Path::new(location);
        if !path.exists() {
            return Err(DocumentError::NotFound(path.to_path_buf()));
        }
        self.extract(path).await
    }
}

fn extension_for(url: &str, content_type: Option<&str>) -> String {
    let from_mime = content_type.and_then(|mime| {
        let mime = mime.split(';').next().unwrap_or_default().trim();
        match mime {
            "application/pdf" => Some("pdf"),
            "text/html" | "application/xhtml+xml" => Some("html"),
            "text/plain" => Some("txt"),
            "text/markdown" => Some("md"),
            _ => None,
        }
    });
    if let Some(ext) = from_mime {
        return ext.to_string();
    }

    reqwest::Url::parse(url)
        .ok()
        .and_then(|u| {
            Path::new(u.path())
                .extension()
                .and_then(|e| e.to_str())
                .map(str::to_ascii_lowercase)
        })
        .filter(|ext| !ext.is_empty() && ext.len() <= 5)
        .unwrap_or_else(|| "html".into())
}

/// Reduces an HTML page to its readable text. Entities are decoded and
/// scripts, styles and link targets dropped; block boundaries become line
/// breaks.
pub fn html_to_text(html: &str) -> String {
    html2text::from_read_with_decorator(html.as_bytes(), HTML_WRAP_WIDTH, TrivialDecorator::new())
}
