use thiserror::Error;

#[derive(Debug, Error)]
pub enum MeterdError {
    #[error("metric already registered: {0}")]
    DuplicateName(String),
    #[error("invalid metric descriptor: {0}")]
    InvalidDescriptor(String),
    #[error("label mismatch for {metric}: expected {expected:?}, got {actual:?}")]
    LabelMismatch {
        metric: String,
        expected: Vec<String>,
        actual: Vec<String>,
    },
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("internal error: {0}")]
    Internal(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl MeterdError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DuplicateName(_) => "DuplicateNameError",
            Self::InvalidDescriptor(_) => "InvalidDescriptorError",
            Self::LabelMismatch { .. } => "LabelMismatchError",
            Self::InvalidArgument(_) => "InvalidArgumentError",
            Self::Internal(_) => "InternalError",
            Self::Io(_) => "IoError",
        }
    }

    pub fn poisoned(what: &str) -> Self {
        Self::Internal(format!("{what} lock poisoned"))
    }
}

pub type Result<T> = std::result::Result<T, MeterdError>;

#[cfg(test)]
mod tests {
    use super::MeterdError;

    #[test]
    fn kinds_are_stable() {
        assert_eq!(
            MeterdError::DuplicateName("x".to_string()).kind(),
            "DuplicateNameError"
        );
        assert_eq!(
            MeterdError::LabelMismatch {
                metric: "x".to_string(),
                expected: vec!["a".to_string()],
                actual: Vec::new(),
            }
            .kind(),
            "LabelMismatchError"
        );
        assert_eq!(
            MeterdError::poisoned("series").to_string(),
            "internal error: series lock poisoned"
        );
    }
}
