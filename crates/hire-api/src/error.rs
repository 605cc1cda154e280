use axum::http::StatusCode;
use hire_chat::ChatError;
use tracing::{error, warn};

/// Status code for a failed service call.
pub fn status_of(err: &ChatError) -> StatusCode {
    match err {
        ChatError::NotFound(_) => StatusCode::NOT_FOUND,
        ChatError::PermissionDenied(_) => StatusCode::FORBIDDEN,
        ChatError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
        ChatError::Conflict(_) => StatusCode::CONFLICT,
        ChatError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        ChatError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Run a blocking service call on the blocking pool.
pub async fn blocking<T, F>(f: F) -> Result<T, StatusCode>
where
    F: FnOnce() -> hire_chat::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map_err(|e| {
            if e.is_retryable() {
                warn!("retryable chat failure: {}", e);
            } else if matches!(e, ChatError::Internal(_)) {
                error!("chat call failed: {}", e);
            }
            status_of(&e)
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taxonomy_maps_to_statuses() {
        assert_eq!(status_of(&ChatError::NotFound("c".into())), StatusCode::NOT_FOUND);
        assert_eq!(status_of(&ChatError::PermissionDenied("c".into())), StatusCode::FORBIDDEN);
        assert_eq!(status_of(&ChatError::InvalidArgument("c".into())), StatusCode::BAD_REQUEST);
        assert_eq!(status_of(&ChatError::Conflict("c".into())), StatusCode::CONFLICT);
        assert_eq!(
            status_of(&ChatError::Unavailable("c".into())),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[tokio::test]
    async fn blocking_surfaces_service_errors() {
        let status = blocking(|| Err::<(), _>(ChatError::PermissionDenied("x".into())))
            .await
            .unwrap_err();
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(blocking(|| Ok(7)).await.unwrap(), 7);
    }
}
