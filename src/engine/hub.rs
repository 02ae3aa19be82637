use std::{future::Future, path::PathBuf, time::Duration};

use hf_hub::{Repo, RepoType, api::tokio::ApiBuilder};
use tokio::time;
use tracing::{debug, info};

use super::EngineError;

#[derive(Debug, Clone)]
pub struct ModelFiles {
    pub tokenizer: PathBuf,
    pub tokenizer_config: Option<PathBuf>,
    pub model_config: Option<PathBuf>,
    pub module: PathBuf,
}

pub async fn fetch_model_files(
    model_id: &str,
    revision: Option<&str>,
    module_file: &str,
    timeout: Duration,
) -> Result<ModelFiles, EngineError> {
    let repo = match revision {
        Some(rev) => Repo::with_revision(model_id.to_string(), RepoType::Model, rev.to_string()),
        None => Repo::new(model_id.to_string(), RepoType::Model),
    };

    info!(model_id, ?timeout, "fetching model files");
    run_with_deadline(timeout, async move {
        let api = ApiBuilder::new()
            .with_progress(false)
            .build()
            .map_err(|e| EngineError::Download(e.to_string()))?;
        let repo = api.repo(repo);

        let tokenizer = repo
            .get("tokenizer.json")
            .await
            .map_err(|e| EngineError::Download(format!("tokenizer.json: {e}")))?;
        let module = repo
            .get(module_file)
            .await
            .map_err(|e| EngineError::Download(format!("{module_file}: {e}")))?;

        // Absent metadata files only lose the chat template or eos lookup.
        let mut optional = Vec::with_capacity(2);
        for name in ["tokenizer_config.json", "config.json"] {
            match repo.get(name).await {
                Ok(path) => optional.push(Some(path)),
                Err(err) => {
                    debug!(file = name, error = %err, "optional model file unavailable");
                    optional.push(None);
                }
            }
        }
        let model_config = optional.pop().flatten();
        let tokenizer_config = optional.pop().flatten();

        Ok(ModelFiles {
            tokenizer,
            tokenizer_config,
            model_config,
            module,
        })
    })
    .await
}

/// Dropping `fetch` on timeout cancels any download still in flight.
pub async fn run_with_deadline<T, F>(timeout: Duration, fetch: F) -> Result<T, EngineError>
where
    F: Future<Output = Result<T, EngineError>>,
{
    time::timeout(timeout, fetch)
        .await
        .unwrap_or(Err(EngineError::DownloadTimeout(timeout)))
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;

    #[tokio::test]
    async fn fetch_finishing_in_time_returns_its_value() {
        let value = run_with_deadline(Duration::from_secs(5), async { Ok(7) })
            .await
            .unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn slow_fetch_times_out() {
        let err = run_with_deadline(Duration::from_millis(20), async {
            time::sleep(Duration::from_secs(3)).await;
            Ok(())
        })
        .await
        .unwrap_err();
        assert!(matches!(err, EngineError::DownloadTimeout(d) if d == Duration::from_millis(20)));
    }

    #[tokio::test]
    async fn fetch_errors_pass_through() {
        let err = run_with_deadline::<(), _>(Duration::from_secs(5), async {
            Err(EngineError::Download("404".into()))
        })
        .await
        .unwrap_err();
        assert_eq!(err.to_string(), "model download failed: 404");
    }

    #[test]
    fn runtime_exits_promptly_after_timed_out_fetch() {
        let started = Instant::now();
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .unwrap();
        let result = runtime.block_on(run_with_deadline::<(), _>(
            Duration::from_millis(50),
            async {
                time::sleep(Duration::from_secs(3)).await;
                Err(EngineError::Download("never reached".into()))
            },
        ));
        drop(runtime);

        assert!(matches!(result, Err(EngineError::DownloadTimeout(_))));
        assert!(started.elapsed() < Duration::from_secs(1), "{:?}", started.elapsed());
    }
}
