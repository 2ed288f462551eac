use thiserror::Error;

pub type Result<T> = std::result::Result<T, ServiceError>;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("project not found: {0}")]
    ProjectNotFound(String),

    #[error("analysis job not found: {0}")]
    JobNotFound(String),

    /// A collaborator (store, cache, bus, project lookup) failed.
    #[error("{operation} failed: {source:#}")]
    Infrastructure {
        operation: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("analysis cancelled")]
    Cancelled,

    /// A worker group task died or misbehaved.
    #[error("pipeline error: {0}")]
    Pipeline(String),
}

impl ServiceError {
    pub fn infrastructure(operation: &'static str, source: anyhow::Error) -> Self {
        Self::Infrastructure { operation, source }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infrastructure_message_includes_cause_chain() {
        let source = anyhow::anyhow!("connection refused").context("saving job");
        let err = ServiceError::infrastructure("update job", source);
        assert_eq!(
            err.to_string(),
            "update job failed: saving job: connection refused"
        );
    }

    #[test]
    fn test_is_cancelled() {
        assert!(ServiceError::Cancelled.is_cancelled());
        assert!(!ServiceError::JobNotFound("x".into()).is_cancelled());
    }
}
