//! Error types for media operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Broad failure class used for retry policy and error_message prefixes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Validation,
    Download,
    Processing,
    System,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Validation => "validation",
            FailureKind::Download => "download",
            FailureKind::Processing => "processing",
            FailureKind::System => "system",
        }
    }
}

/// Errors that can occur while fetching or processing audio.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("FFmpeg not found in PATH")]
    FfmpegNotFound,

    #[error("FFmpeg command failed: {message}")]
    FfmpegFailed {
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("Upstream returned HTTP {status}")]
    UpstreamStatus { status: u16 },

    #[error("Download failed: {message}")]
    DownloadFailed { message: String },

    #[error("Access to private networks is not allowed")]
    SsrfBlocked { detail: String },

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("URL exceeds maximum length")]
    UrlTooLong,

    #[error("Upstream served an HTML page instead of audio")]
    HtmlBody,

    #[error("Too many redirects")]
    RedirectLoop,

    #[error("Invalid interval: {0}")]
    InvalidInterval(String),

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Insufficient disk space in {0}")]
    DiskFull(PathBuf),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),
}

impl MediaError {
    /// Create an FFmpeg failure error.
    pub fn ffmpeg_failed(
        message: impl Into<String>,
        stderr: Option<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::FfmpegFailed {
            message: message.into(),
            stderr,
            exit_code,
        }
    }

    /// Create a download failure error.
    pub fn download_failed(message: impl Into<String>) -> Self {
        Self::DownloadFailed {
            message: message.into(),
        }
    }

    pub fn ssrf_blocked(detail: impl Into<String>) -> Self {
        Self::SsrfBlocked {
            detail: detail.into(),
        }
    }

    /// Failure class for retry policy and error_message prefixes.
    pub fn kind(&self) -> FailureKind {
        match self {
            MediaError::InvalidUrl(_)
            | MediaError::UrlTooLong
            | MediaError::SsrfBlocked { .. }
            | MediaError::InvalidInterval(_) => FailureKind::Validation,

            MediaError::UpstreamStatus { .. }
            | MediaError::DownloadFailed { .. }
            | MediaError::HtmlBody
            | MediaError::RedirectLoop
            | MediaError::Http(_) => FailureKind::Download,

            MediaError::FfmpegFailed { .. }
            | MediaError::Wav(_)
            | MediaError::JsonParse(_) => FailureKind::Processing,

            MediaError::FfmpegNotFound
            | MediaError::FileNotFound(_)
            | MediaError::DiskFull(_)
            | MediaError::Cancelled
            | MediaError::Timeout(_)
            | MediaError::Io(_) => FailureKind::System,
        }
    }

    /// Short machine-readable code within the failure class.
    pub fn code(&self) -> String {
        match self {
            MediaError::UpstreamStatus { status } => format!("http_{status}"),
            MediaError::SsrfBlocked { .. } => "ssrf_blocked".into(),
            MediaError::HtmlBody => "html_body".into(),
            MediaError::RedirectLoop => "redirect_loop".into(),
            MediaError::InvalidUrl(_) | MediaError::UrlTooLong => "bad_url".into(),
            MediaError::InvalidInterval(_) => "invalid_range".into(),
            MediaError::DownloadFailed { .. } | MediaError::Http(_) => "network".into(),
            MediaError::FfmpegFailed { .. } => "transcode_failed".into(),
            MediaError::Wav(_) => "crop_failed".into(),
            MediaError::JsonParse(_) => "encode_failed".into(),
            MediaError::DiskFull(_) => "disk_full".into(),
            MediaError::Timeout(_) => "timeout".into(),
            MediaError::Cancelled => "cancelled".into(),
            _ => "internal".into(),
        }
    }

    /// Format as the canonical `"<type>:<code>: <human>"` error message.
    pub fn classified_message(&self) -> String {
        format!("{}:{}: {}", self.kind().as_str(), self.code(), self)
    }

    /// Whether a retry could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self.kind() {
            FailureKind::Validation => false,
            FailureKind::Download => !matches!(self, MediaError::SsrfBlocked { .. }),
            FailureKind::Processing => true,
            FailureKind::System => !matches!(self, MediaError::Cancelled),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_status_classification() {
        let err = MediaError::UpstreamStatus { status: 503 };
        assert_eq!(err.kind(), FailureKind::Download);
        assert!(err.classified_message().starts_with("download:http_503"));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_validation_never_retries() {
        let err = MediaError::InvalidInterval("end before start".into());
        assert_eq!(err.kind(), FailureKind::Validation);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_ssrf_is_terminal() {
        let err = MediaError::ssrf_blocked("loopback");
        assert!(!err.is_retryable());
        assert!(err.classified_message().starts_with("download:ssrf_blocked"));
    }
}
