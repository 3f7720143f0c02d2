//! Per-request identity, correlation and cancellation.

use std::future::Future;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{RelationError, RelationResult};

/// What the transport layer knows about an inbound request.
#[derive(Debug, Clone)]
pub struct RequestScope {
    /// Authenticated user, if any.
    pub user_id: Option<Uuid>,
    /// Caller-supplied id echoed in every log line for this request.
    pub correlation_id: String,
    /// Fires when the inbound request is abandoned.
    pub cancellation: CancellationToken,
}

impl RequestScope {
    pub fn new(user_id: Uuid) -> Self {
        Self {
            user_id: Some(user_id),
            correlation_id: Uuid::new_v4().to_string(),
            cancellation: CancellationToken::new(),
        }
    }

    pub fn anonymous() -> Self {
        Self {
            user_id: None,
            correlation_id: Uuid::new_v4().to_string(),
            cancellation: CancellationToken::new(),
        }
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = correlation_id.into();
        self
    }

    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = cancellation;
        self
    }

    pub fn ensure_active(&self) -> RelationResult<()> {
        if self.cancellation.is_cancelled() {
            Err(RelationError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Drive `fut` unless the request is cancelled first.
    ///
    /// A dropped store future never commits, so cancellation leaves no
    /// partial state behind.
    pub async fn run<F, T>(&self, fut: F) -> RelationResult<T>
    where
        F: Future<Output = RelationResult<T>>,
    {
        self.ensure_active()?;
        tokio::select! {
            biased;
            _ = self.cancellation.cancelled() => Err(RelationError::Cancelled),
            result = fut => result,
        }
    }
}
