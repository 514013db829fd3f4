//! Prediction engine: dataset encoding, the random forest and the model cache

pub mod dataset;
pub mod engine;
pub mod forest;

pub use dataset::{prepare, prepare_bytes, Dataset, FeatureTuple, LABEL_COLUMN, TUPLE_COLUMNS};
pub use engine::{fingerprint, predict, train, train_from_path, ModelCache, ModelStatus, TrainedModel};
pub use forest::{ForestParams, RandomForest, Regressor};
