use serde::Serialize;
use thiserror::Error;

/// One item of a batch that did not complete, with the backend's reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedItem {
    pub item: String,
    pub error: String,
}

impl FailedItem {
    pub fn new(item: impl Into<String>, error: impl ToString) -> Self {
        Self {
            item: item.into(),
            error: error.to_string(),
        }
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("{} item(s) failed: {}", .0.len(), failed_names(.0))]
    PartialBatch(Vec<FailedItem>),
}

fn failed_names(items: &[FailedItem]) -> String {
    items
        .iter()
        .map(|f| f.item.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Coarse error category carried by transfer tasks and notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Backend,
    Configuration,
    Validation,
    PartialBatch,
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Backend(_) => ErrorKind::Backend,
            AppError::Configuration(_) => ErrorKind::Configuration,
            AppError::Validation(_) => ErrorKind::Validation,
            AppError::PartialBatch(_) => ErrorKind::PartialBatch,
        }
    }

    /// Items this error is about, for user-facing reporting.
    pub fn failed_items(&self) -> &[FailedItem] {
        match self {
            AppError::PartialBatch(items) => items,
            _ => &[],
        }
    }
}

impl Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl From<aws_sdk_s3::Error> for AppError {
    fn from(err: aws_sdk_s3::Error) -> Self {
        AppError::Backend(err.to_string())
    }
}

impl<E> From<aws_sdk_s3::error::SdkError<E>> for AppError
where
    E: std::fmt::Debug,
{
    fn from(err: aws_sdk_s3::error::SdkError<E>) -> Self {
        AppError::Backend(format!("{:?}", err))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Backend(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Configuration(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
