use std::time::Duration;

use crate::cache::LayerKey;

/// Failure raised by a spatial source while opening or streaming records.
#[derive(Debug)]
pub struct SourceError {
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl std::fmt::Display for SourceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for SourceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as _)
    }
}

impl SourceError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

/// The rendering surface refused a data hand-off.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceError {
    pub message: String,
}

impl SurfaceError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for SurfaceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "rendering surface: {}", self.message)
    }
}

impl std::error::Error for SurfaceError {}

#[derive(Debug)]
pub enum LoadError {
    /// Caller named a layer that was never registered. A programming error.
    UnknownLayer(LayerKey),
    Source(SourceError),
    Surface(SurfaceError),
    /// A hand-off acknowledgment is already outstanding for this source.
    AckPending { source_id: String },
    /// The surface dropped the acknowledgment without completing it.
    AckDropped { source_id: String },
    AckTimeout { source_id: String, waited: Duration },
}

impl LoadError {
    /// Failures that a later trigger (pan, layer switch) may succeed on.
    pub fn is_transient(&self) -> bool {
        !matches!(self, LoadError::UnknownLayer(_))
    }
}

impl std::fmt::Display for LoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadError::UnknownLayer(key) => write!(f, "unknown layer: {key}"),
            LoadError::Source(err) => write!(f, "spatial source failed: {err}"),
            LoadError::Surface(err) => write!(f, "{err}"),
            LoadError::AckPending { source_id } => {
                write!(f, "acknowledgment already pending for source {source_id}")
            }
            LoadError::AckDropped { source_id } => {
                write!(f, "source {source_id} dropped its acknowledgment")
            }
            LoadError::AckTimeout { source_id, waited } => write!(
                f,
                "source {source_id} not acknowledged after {}ms",
                waited.as_millis()
            ),
        }
    }
}

impl std::error::Error for LoadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LoadError::Source(err) => Some(err),
            LoadError::Surface(err) => Some(err),
            _ => None,
        }
    }
}

impl From<SourceError> for LoadError {
    fn from(err: SourceError) -> Self {
        LoadError::Source(err)
    }
}

impl From<SurfaceError> for LoadError {
    fn from(err: SurfaceError) -> Self {
        LoadError::Surface(err)
    }
}
