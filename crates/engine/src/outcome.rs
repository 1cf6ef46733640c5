//! One-line JSON results printed by `train-and-predict`

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Outcome {
    Trained { trained: bool },
    Prediction { prob_up: f64 },
    Error { error: String },
}

impl Outcome {
    pub fn trained() -> Self {
        Outcome::Trained { trained: true }
    }

    pub fn prediction(prob_up: f64) -> Self {
        Outcome::Prediction { prob_up }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Outcome::Error {
            error: message.into(),
        }
    }

    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl From<&PipelineError> for Outcome {
    fn from(err: &PipelineError) -> Self {
        Outcome::error(err.to_string())
    }
}
