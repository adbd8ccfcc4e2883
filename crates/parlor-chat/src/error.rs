use parlor_types::ImageBlockedPayload;
use thiserror::Error;

/// Failures inside a tool invocation.
///
/// Validation, provider and storage errors are recoverable: the runner
/// folds them into a function result the model can react to. Safety
/// blocks terminate the turn and surface as an `imageBlocked` event.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("{0}")]
    Validation(String),

    #[error("{message}")]
    Safety {
        message: String,
        payload: Box<ImageBlockedPayload>,
    },

    #[error("{0}")]
    Provider(String),

    #[error("{0}")]
    Storage(String),
}

/// Turn-level failures surfaced through the stream multiplexer.
#[derive(Debug, Error)]
pub enum ChatError {
    /// Safety branch of the error path; carries the structured payload for
    /// the `imageBlocked` event.
    #[error("{message}")]
    ImageBlocked {
        message: String,
        payload: Box<ImageBlockedPayload>,
    },

    #[error("{0}")]
    Stream(String),

    #[error("Missing file extension in image payload")]
    MissingImageExtension,

    #[error("Filetype is not supported: {0}")]
    UnsupportedImage(String),

    #[error(transparent)]
    Persist(#[from] parlor_persist::PersistError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
