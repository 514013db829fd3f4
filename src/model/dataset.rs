//! Training dataset loading and categorical encoding
//!
//! Encoding tables (shared by training and inference):
//!
//! | column | value     | code |
//! |--------|-----------|------|
//! | sex    | male      | 0    |
//! | sex    | female    | 1    |
//! | smoker | yes       | 0    |
//! | smoker | no        | 1    |
//! | region | southeast | 0    |
//! | region | southwest | 1    |
//! | region | northeast | 2    |
//! | region | northwest | 3    |

use csv::ReaderBuilder;
use std::path::Path;

use crate::error::{PredictorError, Result};
use crate::ledger::{Region, Sex, YesNo};

pub const LABEL_COLUMN: &str = "charges";

/// Feature columns a request tuple can fill, in tuple order
pub const TUPLE_COLUMNS: [&str; 6] = ["age", "sex", "bmi", "children", "smoker", "region"];

/// Encoded feature matrix and label vector
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    /// Column names of `features`, in file order
    pub feature_names: Vec<String>,
    /// Row-major feature matrix
    pub features: Vec<Vec<f64>>,
    pub labels: Vec<f64>,
}

impl Dataset {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }
}

/// Load and encode a dataset file
pub fn prepare<P: AsRef<Path>>(path: P) -> Result<Dataset> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|e| {
        PredictorError::DatasetError(format!("cannot read {}: {}", path.display(), e))
    })?;
    prepare_bytes(&bytes)
}

/// Encode an in-memory CSV dataset
pub fn prepare_bytes(bytes: &[u8]) -> Result<Dataset> {
    let dataset_err = |msg: String| PredictorError::DatasetError(msg);

    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(bytes);

    let header = reader
        .headers()
        .map_err(|e| dataset_err(format!("unreadable header: {e}")))?
        .clone();

    let label_idx = header
        .iter()
        .position(|h| h == LABEL_COLUMN)
        .ok_or_else(|| dataset_err(format!("label column '{LABEL_COLUMN}' not found")))?;

    let feature_cols: Vec<(usize, String)> = header
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != label_idx)
        .map(|(i, h)| (i, h.to_string()))
        .collect();

    let mut features = Vec::new();
    let mut labels = Vec::new();

    for (line, row) in reader.records().enumerate() {
        let row = row.map_err(|e| dataset_err(format!("row {}: {e}", line + 1)))?;

        let label = row
            .get(label_idx)
            .and_then(|v| v.parse::<f64>().ok())
            .ok_or_else(|| dataset_err(format!("row {}: invalid {LABEL_COLUMN}", line + 1)))?;

        let encoded = feature_cols
            .iter()
            .map(|(i, name)| {
                let raw = row.get(*i).unwrap_or_default();
                encode_value(name, raw).ok_or_else(|| {
                    dataset_err(format!("row {}: cannot encode {name}={raw:?}", line + 1))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        features.push(encoded);
        labels.push(label);
    }

    if labels.is_empty() {
        return Err(dataset_err("dataset has no rows".into()));
    }

    Ok(Dataset {
        feature_names: feature_cols.into_iter().map(|(_, name)| name).collect(),
        features,
        labels,
    })
}

fn encode_value(column: &str, raw: &str) -> Option<f64> {
    let lowered = raw.to_ascii_lowercase();
    match column {
        "sex" => match lowered.as_str() {
            "male" => Some(0.0),
            "female" => Some(1.0),
            _ => None,
        },
        "smoker" => match lowered.as_str() {
            "yes" => Some(0.0),
            "no" => Some(1.0),
            _ => None,
        },
        "region" => match lowered.as_str() {
            "southeast" => Some(0.0),
            "southwest" => Some(1.0),
            "northeast" => Some(2.0),
            "northwest" => Some(3.0),
            _ => None,
        },
        _ => raw.parse::<f64>().ok().filter(|v| v.is_finite()),
    }
}

/// Model inputs taken from a prediction request
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureTuple {
    pub age: u32,
    pub sex: Sex,
    pub bmi: f64,
    pub children: u32,
    pub smoker: YesNo,
    pub region: Region,
}

impl FeatureTuple {
    /// Encoded values in `TUPLE_COLUMNS` order
    pub fn encode(&self) -> [f64; 6] {
        let sex = match self.sex {
            Sex::Male => 0.0,
            Sex::Female => 1.0,
        };
        let smoker = match self.smoker {
            YesNo::Yes => 0.0,
            YesNo::No => 1.0,
        };
        let region = match self.region {
            Region::Southeast => 0.0,
            Region::Southwest => 1.0,
            Region::Northeast => 2.0,
            Region::Northwest => 3.0,
        };
        [
            f64::from(self.age),
            sex,
            self.bmi,
            f64::from(self.children),
            smoker,
            region,
        ]
    }

    /// Arrange the encoded tuple in a model's feature order
    ///
    /// A feature the tuple cannot supply is a shape mismatch.
    pub fn row_for(&self, feature_names: &[String]) -> Result<Vec<f64>> {
        let encoded = self.encode();
        let mismatch = || PredictorError::ShapeMismatch {
            expected: feature_names.len(),
            actual: TUPLE_COLUMNS.len(),
        };

        if feature_names.len() != TUPLE_COLUMNS.len() {
            return Err(mismatch());
        }

        feature_names
            .iter()
            .map(|name| {
                TUPLE_COLUMNS
                    .iter()
                    .position(|c| *c == name.as_str())
                    .map(|i| encoded[i])
                    .ok_or_else(mismatch)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
age,sex,bmi,children,smoker,region,charges
19,female,27.9,0,yes,southwest,16884.924
18,male,33.77,1,no,southeast,1725.5523
28,male,33,3,no,northwest,4449.462
";

    #[test]
    fn test_prepare_encodes_categoricals() {
        let dataset = prepare_bytes(SAMPLE.as_bytes()).unwrap();
        assert_eq!(dataset.feature_names, TUPLE_COLUMNS);
        assert_eq!(dataset.len(), 3);
        assert_eq!(dataset.features[0], vec![19.0, 1.0, 27.9, 0.0, 0.0, 1.0]);
        assert_eq!(dataset.features[1], vec![18.0, 0.0, 33.77, 1.0, 1.0, 0.0]);
        assert_eq!(dataset.features[2], vec![28.0, 0.0, 33.0, 3.0, 1.0, 3.0]);
        assert_eq!(dataset.labels, vec![16884.924, 1725.5523, 4449.462]);
    }

    #[test]
    fn test_missing_label_column() {
        let err = prepare_bytes(b"age,sex\n19,female\n").unwrap_err();
        assert!(matches!(err, PredictorError::DatasetError(_)));
    }

    #[test]
    fn test_unknown_category() {
        let err = prepare_bytes(
            b"age,sex,bmi,children,smoker,region,charges\n19,female,27.9,0,yes,midwest,100\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("region"));
    }

    #[test]
    fn test_unreadable_file() {
        let err = prepare("/nonexistent/insurance.csv").unwrap_err();
        assert!(matches!(err, PredictorError::DatasetError(_)));
    }

    #[test]
    fn test_empty_dataset() {
        let err = prepare_bytes(b"age,sex,bmi,children,smoker,region,charges\n").unwrap_err();
        assert!(matches!(err, PredictorError::DatasetError(_)));
    }

    #[test]
    fn test_tuple_encoding_matches_dataset() {
        let tuple = FeatureTuple {
            age: 18,
            sex: Sex::Male,
            bmi: 33.77,
            children: 1,
            smoker: YesNo::No,
            region: Region::Southeast,
        };
        let dataset = prepare_bytes(SAMPLE.as_bytes()).unwrap();
        assert_eq!(tuple.row_for(&dataset.feature_names).unwrap(), dataset.features[1]);
    }

    #[test]
    fn test_tuple_reorders_by_name() {
        let tuple = FeatureTuple {
            age: 40,
            sex: Sex::Female,
            bmi: 30.0,
            children: 2,
            smoker: YesNo::Yes,
            region: Region::Northeast,
        };
        let names: Vec<String> = ["region", "age", "sex", "bmi", "children", "smoker"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(
            tuple.row_for(&names).unwrap(),
            vec![2.0, 40.0, 1.0, 30.0, 2.0, 0.0]
        );
    }

    #[test]
    fn test_tuple_shape_mismatch() {
        let tuple = FeatureTuple {
            age: 40,
            sex: Sex::Female,
            bmi: 30.0,
            children: 2,
            smoker: YesNo::Yes,
            region: Region::Northeast,
        };
        let seven: Vec<String> = TUPLE_COLUMNS
            .iter()
            .map(|s| s.to_string())
            .chain(std::iter::once("steps".to_string()))
            .collect();
        assert!(matches!(
            tuple.row_for(&seven),
            Err(PredictorError::ShapeMismatch { expected: 7, actual: 6 })
        ));

        let renamed: Vec<String> = ["age", "sex", "bmi", "kids", "smoker", "region"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert!(tuple.row_for(&renamed).is_err());
    }
}
