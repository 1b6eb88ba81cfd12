use thiserror::Error;

/// Failures surfaced by the request orchestration core.
///
/// Quota exhaustion, unknown categories and corrupt cache entries are not
/// errors: those degrade with a logged warning instead (see the rotation
/// selector and cache modules).
#[derive(Debug, Error)]
pub enum FeedError {
    /// Enqueue was rejected because the per-API queue is at capacity.
    /// The task was not queued; the queue itself never retries.
    #[error("request queue for '{api}' is full (capacity {capacity})")]
    QueueFull { api: String, capacity: usize },

    /// The queue's worker task has shut down and can no longer accept
    /// or settle work.
    #[error("request queue for '{api}' is no longer running")]
    QueueClosed { api: String },

    /// The in-flight task failed (network or parse error). Isolated to the
    /// task that failed; propagated so the caller can retry or back off.
    #[error(transparent)]
    Upstream(#[from] anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn test_queue_errors_name_the_api() {
        let full = FeedError::QueueFull {
            api: "coingecko".to_string(),
            capacity: 50,
        };
        assert_eq!(
            full.to_string(),
            "request queue for 'coingecko' is full (capacity 50)"
        );

        let closed = FeedError::QueueClosed {
            api: "coingecko".to_string(),
        };
        assert_eq!(
            closed.to_string(),
            "request queue for 'coingecko' is no longer running"
        );
    }

    #[test]
    fn test_upstream_is_transparent() {
        let upstream = FeedError::from(anyhow!("HTTP error: 500"));
        assert_eq!(upstream.to_string(), "HTTP error: 500");
        assert!(matches!(upstream, FeedError::Upstream(_)));
    }
}
