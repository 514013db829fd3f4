//! Random-forest regressor
//!
//! Wraps smartcore's `RandomForestRegressor`. Trees grow to purity on
//! bootstrap samples and every split considers all features. The seed fixes
//! the bootstrap draws, so identical inputs and seed give identical
//! predictions.

use smartcore::ensemble::random_forest_regressor::{
    RandomForestRegressor, RandomForestRegressorParameters,
};
use smartcore::linalg::basic::matrix::DenseMatrix;

use crate::error::{PredictorError, Result};

/// Fitted model that maps feature rows to scalars
pub trait Regressor: Send + Sync {
    fn n_features(&self) -> usize;

    /// Predict every row; rows must already have `n_features` columns
    fn predict_rows(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForestParams {
    pub n_trees: usize,
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_trees: 100,
            seed: 42,
        }
    }
}

type Inner = RandomForestRegressor<f64, f64, DenseMatrix<f64>, Vec<f64>>;

pub struct RandomForest {
    inner: Inner,
    n_trees: usize,
    n_features: usize,
}

impl RandomForest {
    /// Fit the ensemble on a row-major matrix
    pub fn fit(x: &[Vec<f64>], y: &[f64], params: ForestParams) -> Result<Self> {
        if x.is_empty() {
            return Err(PredictorError::DatasetError("cannot fit on zero rows".into()));
        }
        if x.len() != y.len() {
            return Err(PredictorError::DatasetError(format!(
                "{} feature rows but {} labels",
                x.len(),
                y.len()
            )));
        }
        if params.n_trees == 0 {
            return Err(PredictorError::Config("n_trees must be at least 1".into()));
        }

        let n_features = x[0].len();
        check_arity(x, n_features)?;

        let parameters = RandomForestRegressorParameters::default()
            .with_n_trees(params.n_trees as _)
            .with_m(n_features)
            .with_seed(params.seed);

        let matrix = DenseMatrix::from_2d_vec(&x.to_vec());
        let inner = Inner::fit(&matrix, &y.to_vec(), parameters)
            .map_err(|e| PredictorError::Internal(format!("Failed to fit regressor: {e}")))?;

        Ok(Self {
            inner,
            n_trees: params.n_trees,
            n_features,
        })
    }

    pub fn n_trees(&self) -> usize {
        self.n_trees
    }

    /// Predict a single row, checking its arity
    pub fn predict(&self, row: &[f64]) -> Result<f64> {
        let rows = [row.to_vec()];
        self.predict_rows(&rows)?
            .into_iter()
            .next()
            .ok_or_else(|| PredictorError::Internal("regressor returned no prediction".into()))
    }
}

impl Regressor for RandomForest {
    fn n_features(&self) -> usize {
        self.n_features
    }

    fn predict_rows(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        check_arity(rows, self.n_features)?;

        let matrix = DenseMatrix::from_2d_vec(&rows.to_vec());
        self.inner
            .predict(&matrix)
            .map_err(|e| PredictorError::Internal(format!("Prediction failed: {e}")))
    }
}

fn check_arity(rows: &[Vec<f64>], expected: usize) -> Result<()> {
    match rows.iter().find(|row| row.len() != expected) {
        Some(bad) => Err(PredictorError::ShapeMismatch {
            expected,
            actual: bad.len(),
        }),
        None => Ok(()),
    }
}
