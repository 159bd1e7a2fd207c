use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::AcquireError;

/// A single rejected request parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

/// Every parameter that failed validation, in the order the fields were checked.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationError {
    pub fields: Vec<FieldError>,
    /// Errors that are not tied to one field (malformed query string).
    pub form: Vec<String>,
}

impl ValidationError {
    pub fn form(message: impl Into<String>) -> Self {
        Self {
            fields: Vec::new(),
            form: vec![message.into()],
        }
    }

    pub fn push(&mut self, field: &'static str, message: impl Into<String>) {
        self.fields.push(FieldError {
            field,
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.form.is_empty()
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.fields.iter().any(|f| f.field == field)
    }

    /// Groups messages by field name.
    pub fn field_errors(&self) -> BTreeMap<&'static str, Vec<String>> {
        let mut grouped: BTreeMap<&'static str, Vec<String>> = BTreeMap::new();
        for error in &self.fields {
            grouped
                .entry(error.field)
                .or_default()
                .push(error.message.clone());
        }
        grouped
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts: Vec<String> = self.form.clone();
        parts.extend(
            self.fields
                .iter()
                .map(|e| format!("{}: {}", e.field, e.message)),
        );
        write!(f, "{}", parts.join("; "))
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Clone, Error)]
pub enum CaptureError {
    #[error("Invalid query parameters: {0}")]
    Validation(#[from] ValidationError),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("Hostname not allowed. Must be one of: {}", .allowed.join(", "))]
    HostNotAllowed { host: String, allowed: Vec<String> },

    #[error("Navigation timeout of {} ms exceeded", .0.as_millis())]
    NavigationTimeout(Duration),

    #[error("Waiting for selector `{selector}` failed: timeout {} ms exceeded", .timeout.as_millis())]
    SelectorTimeout { selector: String, timeout: Duration },

    #[error("Capture queue is full ({waiting} requests waiting)")]
    ResourceExhausted { waiting: usize },

    #[error("Browser launch failed: {0}")]
    BrowserLaunchFailed(String),

    #[error("Page error: {0}")]
    PageError(String),

    #[error("Screenshot capture failed: {0}")]
    CaptureFailed(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CaptureError {
    /// HTTP status the routing layer should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            CaptureError::Validation(_) => 400,
            CaptureError::Unauthorized(_) => 401,
            CaptureError::Forbidden(_) | CaptureError::HostNotAllowed { .. } => 403,
            CaptureError::ResourceExhausted { .. } => 503,
            CaptureError::NavigationTimeout(_) | CaptureError::SelectorTimeout { .. } => 504,
            CaptureError::BrowserLaunchFailed(_)
            | CaptureError::PageError(_)
            | CaptureError::CaptureFailed(_)
            | CaptureError::Internal(_) => 500,
        }
    }

    /// Rejected by the options model or a security gate, before any browser work.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            CaptureError::Validation(_)
                | CaptureError::Unauthorized(_)
                | CaptureError::Forbidden(_)
                | CaptureError::HostNotAllowed { .. }
        )
    }

    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            CaptureError::NavigationTimeout(_) | CaptureError::SelectorTimeout { .. }
        )
    }

    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            CaptureError::Validation(_) => "validation",
            CaptureError::Unauthorized(_) => "unauthorized",
            CaptureError::Forbidden(_) => "forbidden",
            CaptureError::HostNotAllowed { .. } => "host_not_allowed",
            CaptureError::NavigationTimeout(_) => "navigation_timeout",
            CaptureError::SelectorTimeout { .. } => "selector_timeout",
            CaptureError::ResourceExhausted { .. } => "resource_exhausted",
            CaptureError::BrowserLaunchFailed(_) => "browser_launch_failed",
            CaptureError::PageError(_) => "page_error",
            CaptureError::CaptureFailed(_) => "capture_failed",
            CaptureError::Internal(_) => "internal",
        }
    }
}

impl From<AcquireError> for CaptureError {
    fn from(err: AcquireError) -> Self {
        CaptureError::Internal(format!("page pool closed: {err}"))
    }
}

impl From<chromiumoxide::error::CdpError> for CaptureError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        CaptureError::PageError(err.to_string())
    }
}
