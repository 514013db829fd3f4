//! Training, inference and the process-wide model cache

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

use super::dataset::{prepare_bytes, Dataset, FeatureTuple};
use super::forest::{ForestParams, RandomForest, Regressor};
use crate::config::ModelConfig;
use crate::error::{PredictorError, Result};

/// A fitted regressor plus what it was trained on
pub struct TrainedModel {
    forest: RandomForest,
    pub feature_names: Vec<String>,
    pub r2_train: f64,
    pub r2_test: f64,
    pub n_train: usize,
    pub n_test: usize,
    /// `sha256-<hex>` of the dataset bytes, when trained from a file
    pub dataset_fingerprint: Option<String>,
    pub trained_at: DateTime<Utc>,
}

impl TrainedModel {
    pub fn n_features(&self) -> usize {
        self.forest.n_features()
    }

    /// Score a request tuple, arranged in this model's feature order
    pub fn predict_tuple(&self, tuple: &FeatureTuple) -> Result<f64> {
        let row = tuple.row_for(&self.feature_names)?;
        predict(self, &row)
    }
}

/// `sha256-<hex>` content address
pub fn fingerprint(data: &[u8]) -> String {
    format!("sha256-{}", hex::encode(Sha256::digest(data)))
}

/// Shuffle-split row indices into (train, test)
///
/// The test set takes `ceil(test_fraction * n)` rows.
pub fn train_test_split(n: usize, test_fraction: f64, seed: u64) -> Result<(Vec<usize>, Vec<usize>)> {
    let n_test = ((n as f64) * test_fraction).ceil() as usize;
    if n_test == 0 || n_test >= n {
        return Err(PredictorError::DatasetError(format!(
            "{n} rows cannot be split with test fraction {test_fraction}"
        )));
    }

    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let train = indices.split_off(n_test);
    Ok((train, indices))
}

/// Fit the ensemble on a seeded split of `dataset` and score both halves
///
/// Poor fit is reported, never rejected.
pub fn train(dataset: &Dataset, config: &ModelConfig) -> Result<TrainedModel> {
    let (train_idx, test_idx) = train_test_split(dataset.len(), config.test_fraction, config.seed)?;

    let pick = |idx: &[usize]| -> (Vec<Vec<f64>>, Vec<f64>) {
        idx.iter()
            .map(|&i| (dataset.features[i].clone(), dataset.labels[i]))
            .unzip()
    };
    let (x_train, y_train) = pick(&train_idx);
    let (x_test, y_test) = pick(&test_idx);

    let forest = RandomForest::fit(
        &x_train,
        &y_train,
        ForestParams {
            n_trees: config.n_trees,
            seed: config.seed,
        },
    )?;

    let score = |x: &[Vec<f64>], y: &[f64]| -> Result<f64> {
        let predicted = forest.predict_rows(x)?;
        let r2: f64 = smartcore::metrics::r2(&y.to_vec(), &predicted);
        Ok(r2)
    };
    let r2_train = score(&x_train, &y_train)?;
    let r2_test = score(&x_test, &y_test)?;

    info!(
        trees = config.n_trees,
        seed = config.seed,
        n_train = x_train.len(),
        n_test = x_test.len(),
        r2_train,
        r2_test,
        "Trained regressor"
    );

    Ok(TrainedModel {
        forest,
        feature_names: dataset.feature_names.clone(),
        r2_train,
        r2_test,
        n_train: x_train.len(),
        n_test: x_test.len(),
        dataset_fingerprint: None,
        trained_at: Utc::now(),
    })
}

/// Predict one encoded row; the row arity must match the training features
pub fn predict(model: &TrainedModel, row: &[f64]) -> Result<f64> {
    model.forest.predict(row)
}

/// Read, fingerprint, encode and train from a dataset file
pub fn train_from_path(path: &Path, config: &ModelConfig) -> Result<TrainedModel> {
    let bytes = std::fs::read(path).map_err(|e| {
        PredictorError::DatasetError(format!("cannot read {}: {}", path.display(), e))
    })?;
    let dataset = prepare_bytes(&bytes)?;
    let mut model = train(&dataset, config)?;
    model.dataset_fingerprint = Some(fingerprint(&bytes));
    Ok(model)
}

/// Snapshot of the cache for operators
#[derive(Debug, Clone, Serialize)]
pub struct ModelStatus {
    pub dataset_path: PathBuf,
    pub loaded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trained_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub r2_train: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub r2_test: Option<f64>,
    /// Whether the file on disk no longer matches the trained fingerprint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stale: Option<bool>,
}

/// Lazily trained, process-wide model
///
/// The first caller trains; concurrent callers wait for that run instead of
/// starting their own. The model is replaced only by `reload`. Readers of
/// the published model never wait on a training run.
pub struct ModelCache {
    dataset_path: PathBuf,
    config: ModelConfig,
    published: RwLock<Option<Arc<TrainedModel>>>,
    /// Held for the whole of a training run
    training: Mutex<()>,
}

impl ModelCache {
    pub fn new<P: AsRef<Path>>(dataset_path: P, config: ModelConfig) -> Self {
        Self {
            dataset_path: dataset_path.as_ref().to_path_buf(),
            config,
            published: RwLock::new(None),
            training: Mutex::new(()),
        }
    }

    pub fn dataset_path(&self) -> &Path {
        &self.dataset_path
    }

    /// Published model, if any, without training
    pub async fn current(&self) -> Option<Arc<TrainedModel>> {
        self.published.read().await.clone()
    }

    pub async fn is_loaded(&self) -> bool {
        self.published.read().await.is_some()
    }

    async fn train_blocking(&self) -> Result<Arc<TrainedModel>> {
        let path = self.dataset_path.clone();
        let config = self.config.clone();
        info!(dataset = %path.display(), "Training regressor");

        let model = tokio::task::spawn_blocking(move || train_from_path(&path, &config))
            .await
            .map_err(|e| PredictorError::Internal(format!("training task failed: {e}")))??;
        Ok(Arc::new(model))
    }

    async fn publish(&self, model: &Arc<TrainedModel>) {
        *self.published.write().await = Some(Arc::clone(model));
    }

    /// Cached model, training it on first use
    pub async fn get_or_train(&self) -> Result<Arc<TrainedModel>> {
        if let Some(model) = self.current().await {
            return Ok(model);
        }

        let _training = self.training.lock().await;
        // Another caller may have finished while we waited
        if let Some(model) = self.current().await {
            return Ok(model);
        }

        let model = self.train_blocking().await?;
        self.publish(&model).await;
        Ok(model)
    }

    /// Retrain from the current file and replace the cached model
    ///
    /// On failure the previous model stays in place.
    pub async fn reload(&self) -> Result<Arc<TrainedModel>> {
        let _training = self.training.lock().await;
        let previous = self.current().await.and_then(|m| m.dataset_fingerprint.clone());

        match self.train_blocking().await {
            Ok(model) => {
                info!(
                    previous = previous.as_deref().unwrap_or("none"),
                    current = model.dataset_fingerprint.as_deref().unwrap_or("none"),
                    "Reloaded regressor"
                );
                self.publish(&model).await;
                Ok(model)
            }
            Err(e) => {
                warn!(error = %e, "Model reload failed, keeping previous model");
                Err(e)
            }
        }
    }

    pub async fn status(&self) -> ModelStatus {
        let model = self.current().await;

        let on_disk = tokio::fs::read(&self.dataset_path)
            .await
            .ok()
            .map(|bytes| fingerprint(&bytes));

        let fingerprint = model.as_ref().and_then(|m| m.dataset_fingerprint.clone());
        let stale = match (&fingerprint, &on_disk) {
            (Some(trained), Some(current)) => Some(trained != current),
            (Some(_), None) => Some(true),
            _ => None,
        };

        ModelStatus {
            dataset_path: self.dataset_path.clone(),
            loaded: model.is_some(),
            fingerprint,
            trained_at: model.as_ref().map(|m| m.trained_at),
            r2_train: model.as_ref().map(|m| m.r2_train),
            r2_test: model.as_ref().map(|m| m.r2_test),
            stale,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::ledger::{Region, Sex, YesNo};
    use std::time::Duration;
    use tempfile::TempDir;

    /// Deterministic synthetic insurance table
    pub fn synthetic_dataset_csv(rows: usize) -> String {
        let sexes = ["male", "female"];
        let smokers = ["yes", "no"];
        let regions = ["southeast", "southwest", "northeast", "northwest"];

        let mut out = String::from("age,sex,bmi,children,smoker,region,charges\n");
        for i in 0..rows {
            let age = 18 + (i * 7) % 47;
            let bmi = 18.0 + ((i * 13) % 200) as f64 / 10.0;
            let children = (i * 3) % 5;
            let smoker = smokers[(i / 3) % 2];
            let charges = 2000.0
                + 250.0 * age as f64
                + 120.0 * bmi
                + 400.0 * children as f64
                + if smoker == "yes" { 20000.0 } else { 0.0 };
            out.push_str(&format!(
                "{age},{},{bmi:.1},{children},{smoker},{},{charges:.2}\n",
                sexes[i % 2],
                regions[(i / 2) % 4],
            ));
        }
        out
    }

    fn reference_tuple() -> FeatureTuple {
        FeatureTuple {
            age: 30,
            sex: Sex::Male,
            bmi: 22.0,
            children: 0,
            smoker: YesNo::No,
            region: Region::Southeast,
        }
    }

    fn write_dataset(dir: &TempDir, rows: usize) -> PathBuf {
        let path = dir.path().join("insurance.csv");
        std::fs::write(&path, synthetic_dataset_csv(rows)).unwrap();
        path
    }

    #[test]
    fn test_split_sizes_and_disjointness() {
        let (train, test) = train_test_split(10, 0.2, 42).unwrap();
        assert_eq!(train.len(), 8);
        assert_eq!(test.len(), 2);

        let mut all: Vec<usize> = train.iter().chain(&test).copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..10).collect::<Vec<_>>());

        assert_eq!(train_test_split(10, 0.2, 42).unwrap(), (train, test));
        assert!(train_test_split(1, 0.2, 42).is_err());
    }

    #[test]
    fn test_end_to_end_reproducible() {
        let dir = TempDir::new().unwrap();
        let path = write_dataset(&dir, 80);
        let config = ModelConfig::default();

        let first = train_from_path(&path, &config).unwrap();
        let second = train_from_path(&path, &config).unwrap();

        let a = first.predict_tuple(&reference_tuple()).unwrap();
        let b = second.predict_tuple(&reference_tuple()).unwrap();
        assert_eq!(a.to_bits(), b.to_bits());
        assert!(a.is_finite() && a > 0.0);
        assert_eq!(first.dataset_fingerprint, second.dataset_fingerprint);
        assert_eq!(first.n_train + first.n_test, 80);
    }

    #[test]
    fn test_predict_is_deterministic() {
        let dir = TempDir::new().unwrap();
        let path = write_dataset(&dir, 40);
        let model = train_from_path(&path, &ModelConfig { n_trees: 20, ..ModelConfig::default() }).unwrap();

        let row = reference_tuple().row_for(&model.feature_names).unwrap();
        let first = predict(&model, &row).unwrap();
        for _ in 0..5 {
            assert_eq!(predict(&model, &row).unwrap().to_bits(), first.to_bits());
        }
    }

    #[test]
    fn test_predict_shape_mismatch() {
        let dir = TempDir::new().unwrap();
        let path = write_dataset(&dir, 40);
        let model = train_from_path(&path, &ModelConfig { n_trees: 5, ..ModelConfig::default() }).unwrap();

        assert!(matches!(
            predict(&model, &[30.0, 0.0, 22.0, 0.0, 1.0]),
            Err(PredictorError::ShapeMismatch { expected: 6, actual: 5 })
        ));
    }

    #[test]
    fn test_smoker_costs_more() {
        let dir = TempDir::new().unwrap();
        let path = write_dataset(&dir, 120);
        let model = train_from_path(&path, &ModelConfig { n_trees: 30, ..ModelConfig::default() }).unwrap();

        let non_smoker = model.predict_tuple(&reference_tuple()).unwrap();
        let smoker = model
            .predict_tuple(&FeatureTuple {
                smoker: YesNo::Yes,
                ..reference_tuple()
            })
            .unwrap();
        assert!(smoker > non_smoker);
    }

    #[tokio::test]
    async fn test_cache_trains_once_and_reloads() {
        let dir = TempDir::new().unwrap();
        let path = write_dataset(&dir, 40);
        let cache = ModelCache::new(&path, ModelConfig { n_trees: 5, ..ModelConfig::default() });

        let status = cache.status().await;
        assert!(!status.loaded);
        assert!(status.stale.is_none());

        let first = cache.get_or_train().await.unwrap();
        let again = cache.get_or_train().await.unwrap();
        assert!(Arc::ptr_eq(&first, &again));

        std::fs::write(&path, synthetic_dataset_csv(60)).unwrap();
        assert_eq!(cache.status().await.stale, Some(true));
        assert!(Arc::ptr_eq(&first, &cache.get_or_train().await.unwrap()));

        let reloaded = cache.reload().await.unwrap();
        assert_ne!(reloaded.dataset_fingerprint, first.dataset_fingerprint);
        let status = cache.status().await;
        assert!(status.loaded);
        assert_eq!(status.stale, Some(false));
    }

    #[tokio::test]
    async fn test_failed_reload_keeps_model() {
        let dir = TempDir::new().unwrap();
        let path = write_dataset(&dir, 40);
        let cache = ModelCache::new(&path, ModelConfig { n_trees: 5, ..ModelConfig::default() });
        let first = cache.get_or_train().await.unwrap();

        std::fs::write(&path, "not,a,dataset\n").unwrap();
        assert!(matches!(cache.reload().await, Err(PredictorError::DatasetError(_))));
        assert!(Arc::ptr_eq(&first, &cache.get_or_train().await.unwrap()));
    }

    #[tokio::test]
    async fn test_missing_dataset() {
        let dir = TempDir::new().unwrap();
        let cache = ModelCache::new(dir.path().join("absent.csv"), ModelConfig::default());
        assert!(matches!(cache.get_or_train().await, Err(PredictorError::DatasetError(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_requests_share_one_model() {
        let dir = TempDir::new().unwrap();
        let path = write_dataset(&dir, 60);
        let cache = Arc::new(ModelCache::new(&path, ModelConfig { n_trees: 10, ..ModelConfig::default() }));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                tokio::spawn(async move { cache.get_or_train().await })
            })
            .collect();

        let mut models = Vec::new();
        for handle in handles {
            models.push(handle.await.unwrap().unwrap());
        }
        assert!(models.iter().all(|m| Arc::ptr_eq(m, &models[0])));
        assert!(Arc::ptr_eq(&models[0], &cache.current().await.unwrap()));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_status_does_not_wait_for_training() {
        let dir = TempDir::new().unwrap();
        let path = write_dataset(&dir, 400);
        let cache = Arc::new(ModelCache::new(&path, ModelConfig { n_trees: 300, ..ModelConfig::default() }));

        let trainer = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move { cache.get_or_train().await })
        };
        // Let the trainer take the training lock
        tokio::time::sleep(Duration::from_millis(20)).await;

        let status = tokio::time::timeout(Duration::from_millis(200), cache.status())
            .await
            .expect("status blocked behind training");
        let loaded = tokio::time::timeout(Duration::from_millis(200), cache.is_loaded())
            .await
            .expect("is_loaded blocked behind training");
        assert_eq!(status.loaded, loaded);

        trainer.await.unwrap().unwrap();
        assert!(cache.is_loaded().await);
    }
}
