use crate::models::PostId;
use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("A match already exists for posts {0} and {1}")]
    DuplicateMatch(PostId, PostId),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),

    #[error("{cascade} failed at step '{step}' after {completed} completed step(s): {source}")]
    PartialCascadeFailure {
        cascade: String,
        step: &'static str,
        completed: usize,
        #[source]
        source: Box<EngineError>,
    },
}

impl EngineError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// True when retrying the same call later may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::StoreUnavailable(_) => true,
            Self::PartialCascadeFailure { source, .. } => source.is_retryable(),
            _ => false,
        }
    }

    /// The failing step, when this error came out of a cascade.
    pub fn failed_step(&self) -> Option<&'static str> {
        match self {
            Self::PartialCascadeFailure { step, .. } => Some(step),
            _ => None,
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_are_retryable() {
        let err: EngineError = StoreError::Unavailable("offline".into()).into();
        assert!(err.is_retryable());
        assert!(!EngineError::NotAuthenticated.is_retryable());
    }

    #[test]
    fn cascade_failure_reports_step_and_inner_retryability() {
        let err = EngineError::PartialCascadeFailure {
            cascade: "unmatch m1".to_string(),
            step: "delete_messages",
            completed: 0,
            source: Box::new(StoreError::Unavailable("offline".into()).into()),
        };
        assert_eq!(err.failed_step(), Some("delete_messages"));
        assert!(err.is_retryable());
        assert!(err.to_string().contains("delete_messages"));
    }

    #[test]
    fn duplicate_match_message_names_both_posts() {
        let err = EngineError::DuplicateMatch(PostId::new("p1"), PostId::new("p2"));
        assert_eq!(
            err.to_string(),
            "A match already exists for posts p1 and p2"
        );
    }
}
