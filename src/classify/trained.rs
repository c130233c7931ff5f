//! Trained backend: lazily loads (or trains and persists) the multi-task
//! model on first use, at most once per process.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::{info, warn};

use super::ClassificationResult;
use super::model::{MultiTaskModel, TrainingOptions};
use crate::dataset::Dataset;
use crate::error::ModelError;

/// Load the model from `model_path`; if absent, train on `messages_path` and
/// persist before returning.
pub fn load_or_train(
    model_path: &Path,
    messages_path: &Path,
    options: &TrainingOptions,
) -> Result<MultiTaskModel, ModelError> {
    if model_path.is_file() {
        info!(path = %model_path.display(), "Loading trained classifier");
        return MultiTaskModel::load(model_path);
    }
    warn!(
        path = %model_path.display(),
        "No persisted model found, training from dataset"
    );
    train_and_save(messages_path, model_path, options)
}

/// Train on the dataset at `messages_path` and write the artifact to `model_path`.
pub fn train_and_save(
    messages_path: &Path,
    model_path: &Path,
    options: &TrainingOptions,
) -> Result<MultiTaskModel, ModelError> {
    let dataset = Dataset::load(messages_path)?;
    let model = MultiTaskModel::train(&dataset, options)?;
    model.save(model_path)?;
    info!(path = %model_path.display(), "Persisted trained classifier");
    Ok(model)
}

/// Process-lifetime handle to the trained model.
///
/// Concurrent first callers share one initialisation; a failed initialisation
/// leaves the handle empty so a later call may retry.
pub struct TrainedBackend {
    model_path: PathBuf,
    messages_path: PathBuf,
    options: TrainingOptions,
    model: OnceCell<Arc<MultiTaskModel>>,
}

impl TrainedBackend {
    pub fn new(model_path: impl Into<PathBuf>, messages_path: impl Into<PathBuf>) -> Self {
        Self {
            model_path: model_path.into(),
            messages_path: messages_path.into(),
            options: TrainingOptions::default(),
            model: OnceCell::new(),
        }
    }

    pub fn with_options(mut self, options: TrainingOptions) -> Self {
        self.options = options;
        self
    }

    pub fn is_loaded(&self) -> bool {
        self.model.initialized()
    }

    /// The shared model, initialising it on first call. Loading and training
    /// run on the blocking pool.
    pub async fn model(&self) -> Result<Arc<MultiTaskModel>, ModelError> {
        self.model
            .get_or_try_init(|| async {
                let model_path = self.model_path.clone();
                let messages_path = self.messages_path.clone();
                let options = self.options.clone();
                let model = tokio::task::spawn_blocking(move || {
                    load_or_train(&model_path, &messages_path, &options)
                })
                .await??;
                Ok::<_, ModelError>(Arc::new(model))
            })
            .await
            .cloned()
    }

    pub async fn classify(&self, text: &str) -> Result<ClassificationResult, ModelError> {
        let model = self.model().await?;
        Ok(model.predict(text))
    }
}

impl std::fmt::Debug for TrainedBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrainedBackend")
            .field("model_path", &self.model_path)
            .field("messages_path", &self.messages_path)
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MESSAGES: &str = "\
message_id,text,label,suggested_queue
1,someone used my card fraud alert,fraud,Fraud/Economic Crime Prevention
2,someone used my card fraud alert again,fraud,Fraud/Economic Crime Prevention
3,raise my credit limit please,credit,Credit/Risk
4,raise my credit limit please now,credit,Credit/Risk
";

    fn fast() -> TrainingOptions {
        TrainingOptions {
            iterations: 100,
            ..TrainingOptions::default()
        }
    }

    #[tokio::test]
    async fn trains_and_persists_on_first_use() {
        let dir = tempfile::tempdir().unwrap();
        let messages = dir.path().join("messages.csv");
        let model_path = dir.path().join("models").join("mtl_model.json");
        std::fs::write(&messages, MESSAGES).unwrap();

        let backend = TrainedBackend::new(&model_path, &messages).with_options(fast());
        assert!(!backend.is_loaded());

        let result = backend.classify("fraud alert on my card").await.unwrap();
        assert!((0.0..=1.0).contains(&result.confidence));
        assert!(backend.is_loaded());
        assert!(model_path.is_file());
    }

    #[tokio::test]
    async fn initialises_once() {
        let dir = tempfile::tempdir().unwrap();
        let messages = dir.path().join("messages.csv");
        let model_path = dir.path().join("mtl_model.json");
        std::fs::write(&messages, MESSAGES).unwrap();

        let backend = TrainedBackend::new(&model_path, &messages).with_options(fast());
        let first = backend.model().await.unwrap();
        // Removing the artifact must not matter once the handle is initialised.
        std::fs::remove_file(&model_path).unwrap();
        let second = backend.model().await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn concurrent_first_callers_share_one_model() {
        let dir = tempfile::tempdir().unwrap();
        let messages = dir.path().join("messages.csv");
        std::fs::write(&messages, MESSAGES).unwrap();

        let backend = TrainedBackend::new(dir.path().join("mtl_model.json"), &messages)
            .with_options(fast());
        let (first, second) = tokio::join!(backend.model(), backend.model());
        assert!(Arc::ptr_eq(&first.unwrap(), &second.unwrap()));
    }

    #[tokio::test]
    async fn missing_dataset_and_model_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let backend = TrainedBackend::new(
            dir.path().join("mtl_model.json"),
            dir.path().join("messages.csv"),
        );
        let err = backend.classify("anything").await.unwrap_err();
        assert!(matches!(err, ModelError::Dataset(_)));
        assert!(!backend.is_loaded());
    }
}
