//! Prediction record and the form input it is built from

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{PredictorError, Result};
use crate::model::FeatureTuple;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

macro_rules! labelled_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $label:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(
                #[serde(rename = $label)]
                $variant,
            )+
        }

        impl $name {
            pub fn label(&self) -> &'static str {
                match self {
                    $(Self::$variant => $label,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.label())
            }
        }
    };
}

labelled_enum!(Sex { Male => "Male", Female => "Female" });
labelled_enum!(YesNo { Yes => "Yes", No => "No" });
labelled_enum!(Region {
    Southeast => "Southeast",
    Southwest => "Southwest",
    Northeast => "Northeast",
    Northwest => "Northwest",
});
labelled_enum!(StressLevel { Low => "Low", Medium => "Medium", High => "High" });
labelled_enum!(DietType { Balanced => "Balanced", Junk => "Junk", HighProtein => "High Protein" });

/// One row of the prediction history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    #[serde(rename = "Full Name")]
    pub full_name: String,
    #[serde(rename = "Username")]
    pub username: String,
    #[serde(rename = "Age")]
    pub age: u32,
    #[serde(rename = "Sex")]
    pub sex: Sex,
    #[serde(rename = "BMI")]
    pub bmi: f64,
    #[serde(rename = "Children")]
    pub children: u32,
    #[serde(rename = "Smoker")]
    pub smoker: YesNo,
    #[serde(rename = "Region")]
    pub region: Region,
    #[serde(rename = "Alcohol Consumption")]
    pub alcohol_consumption: YesNo,
    #[serde(rename = "Family Disease History")]
    pub family_history: YesNo,
    #[serde(rename = "Stress Level")]
    pub stress_level: StressLevel,
    #[serde(rename = "Exercise Days")]
    pub exercise_days: u32,
    #[serde(rename = "Sleep Hours")]
    pub sleep_hours: u32,
    #[serde(rename = "Diet Type")]
    pub diet_type: DietType,
    #[serde(rename = "Predicted Cost")]
    pub predicted_cost: f64,
    #[serde(rename = "Timestamp", with = "timestamp_format")]
    pub timestamp: NaiveDateTime,
}

impl PredictionRecord {
    /// Column names in storage order
    pub const HEADER: [&'static str; 16] = [
        "Full Name",
        "Username",
        "Age",
        "Sex",
        "BMI",
        "Children",
        "Smoker",
        "Region",
        "Alcohol Consumption",
        "Family Disease History",
        "Stress Level",
        "Exercise Days",
        "Sleep Hours",
        "Diet Type",
        "Predicted Cost",
        "Timestamp",
    ];

    /// `(column, rendered value)` pairs in header order
    pub fn fields(&self) -> Vec<(&'static str, String)> {
        let values = [
            self.full_name.clone(),
            self.username.clone(),
            self.age.to_string(),
            self.sex.to_string(),
            format_float(self.bmi),
            self.children.to_string(),
            self.smoker.to_string(),
            self.region.to_string(),
            self.alcohol_consumption.to_string(),
            self.family_history.to_string(),
            self.stress_level.to_string(),
            self.exercise_days.to_string(),
            self.sleep_hours.to_string(),
            self.diet_type.to_string(),
            format_float(self.predicted_cost),
            self.timestamp.format(TIMESTAMP_FORMAT).to_string(),
        ];
        Self::HEADER.into_iter().zip(values).collect()
    }
}

/// Render a float the way a CSV reader expects: integral values keep `.0`
pub fn format_float(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e16 {
        format!("{value:.1}")
    } else {
        value.to_string()
    }
}

/// Submitted prediction form
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PredictionInput {
    #[serde(default)]
    pub full_name: String,
    pub age: u32,
    pub sex: Sex,
    pub bmi: f64,
    pub children: u32,
    pub smoker: YesNo,
    pub region: Region,
    pub alcohol_consumption: YesNo,
    pub family_history: YesNo,
    pub stress_level: StressLevel,
    pub exercise_days: u32,
    pub sleep_hours: u32,
    pub diet_type: DietType,
}

impl PredictionInput {
    /// Enforce the bounds of the form widgets
    pub fn validate(&self) -> Result<()> {
        fn check<T: PartialOrd + fmt::Display>(name: &str, value: T, min: T, max: T) -> Result<()> {
            if value < min || value > max {
                return Err(PredictorError::InvalidInput(format!(
                    "{name} must be between {min} and {max}"
                )));
            }
            Ok(())
        }

        check("Age", self.age, 0, 100)?;
        if !self.bmi.is_finite() {
            return Err(PredictorError::InvalidInput("BMI must be a number".into()));
        }
        check("BMI", self.bmi, 0.0, 60.0)?;
        check("Number of Children", self.children, 0, 10)?;
        check("Exercise Days/Week", self.exercise_days, 0, 7)?;
        check("Sleep Hours/Day", self.sleep_hours, 0, 24)?;
        Ok(())
    }

    /// The subset of the form the model scores
    pub fn features(&self) -> FeatureTuple {
        FeatureTuple {
            age: self.age,
            sex: self.sex,
            bmi: self.bmi,
            children: self.children,
            smoker: self.smoker,
            region: self.region,
        }
    }

    pub fn into_record(
        self,
        username: &str,
        predicted_cost: f64,
        timestamp: NaiveDateTime,
    ) -> PredictionRecord {
        PredictionRecord {
            full_name: self.full_name,
            username: username.to_string(),
            age: self.age,
            sex: self.sex,
            bmi: self.bmi,
            children: self.children,
            smoker: self.smoker,
            region: self.region,
            alcohol_consumption: self.alcohol_consumption,
            family_history: self.family_history,
            stress_level: self.stress_level,
            exercise_days: self.exercise_days,
            sleep_hours: self.sleep_hours,
            diet_type: self.diet_type,
            predicted_cost,
            timestamp,
        }
    }
}

mod timestamp_format {
    use super::TIMESTAMP_FORMAT;
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.format(TIMESTAMP_FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(&raw, TIMESTAMP_FORMAT).map_err(serde::de::Error::custom)
    }
}
