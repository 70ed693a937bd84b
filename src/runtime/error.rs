use thiserror::Error;

/// Errors surfaced to embedders by the writer entry points.
///
/// Every precondition failure is raised before any text reaches the sink;
/// only [`ScmError::Io`] can occur once emission has started.
#[derive(Debug, Error)]
pub enum ScmError {
    #[error("port required")]
    ExpectedPort,
    #[error("attempt to use a closed port")]
    PortClosed,
    #[error("output port is required")]
    OutputPortRequired,
    #[error("string output port is required")]
    ExpectedStringPort,
    #[error("malformed error object")]
    MalformedErrorObject,
    #[error("output failed: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ScmError>;
