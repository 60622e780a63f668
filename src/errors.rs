use thiserror::Error;

#[derive(Error, Debug)]
pub enum FanControlError {
    #[error("no such device: {0}")]
    NoSuchDevice(String),

    #[error("operation not supported: {0}")]
    Unsupported(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
