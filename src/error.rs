use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("I/O error: {0}")]
    Io(String),
    #[error("transfer cannot start: {0}")]
    Precondition(String),
    #[error(transparent)]
    Template(#[from] crate::template::TemplateError),
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value.to_string())
    }
}
