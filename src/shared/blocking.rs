//! Usage: Run blocking filesystem work on the tokio blocking pool with a stable label.

use crate::shared::error::{AppError, AppResult};

pub async fn run<T, E>(
    label: &'static str,
    f: impl FnOnce() -> Result<T, E> + Send + 'static,
) -> AppResult<T>
where
    T: Send + 'static,
    E: Into<AppError> + Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(result) => result.map_err(Into::into),
        Err(join_err) => {
            // Panic payloads may echo file contents, so the JoinError text is not forwarded.
            if join_err.is_panic() {
                tracing::error!(label, "blocking task panicked");
                return Err(AppError::new(
                    "TASK_JOIN",
                    format!("{label}: task panicked"),
                ));
            }

            tracing::warn!(label, "blocking task cancelled");
            Err(AppError::new(
                "TASK_JOIN",
                format!("{label}: task cancelled"),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn run_returns_closure_result() {
        let value = run("test_ok", || Ok::<_, AppError>(41 + 1)).await.unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test]
    async fn run_maps_string_errors() {
        let err = run("test_err", || Err::<(), _>("SYSTEM_ERROR: disk gone".to_string()))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "SYSTEM_ERROR");
    }

    #[tokio::test]
    async fn run_reports_panics_without_payload() {
        let err = run("test_panic", || -> Result<(), AppError> { panic!("secret payload") })
            .await
            .unwrap_err();
        assert_eq!(err.code(), "TASK_JOIN");
        assert!(!err.to_string().contains("secret payload"));
    }
}
