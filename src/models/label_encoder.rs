//! Bidirectional mapping between target label strings and class indices.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Label encoder with classes in sorted order; a class's index is its rank.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelEncoder {
    /// Training run this encoder was fitted in
    run_id: String,
    classes: Vec<String>,
}

impl LabelEncoder {
    /// Fit on the observed labels.
    pub fn fit<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let classes: BTreeSet<String> = labels
            .into_iter()
            .map(|s| s.as_ref().to_string())
            .collect();
        Self {
            run_id: String::new(),
            classes: classes.into_iter().collect(),
        }
    }

    /// Tag the encoder with the run that produced it.
    pub fn for_run(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = run_id.into();
        self
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn n_classes(&self) -> usize {
        self.classes.len()
    }

    /// Index of a label, `None` if it was not seen at fit time.
    pub fn encode(&self, label: &str) -> Option<usize> {
        self.classes
            .binary_search_by(|c| c.as_str().cmp(label))
            .ok()
    }

    /// Label of a class index.
    pub fn decode(&self, index: usize) -> Option<&str> {
        self.classes.get(index).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sorted_indices() {
        let encoder = LabelEncoder::fit(["yes", "no", "no", "yes", "no"]);

        assert_eq!(encoder.classes(), &["no", "yes"]);
        assert_eq!(encoder.encode("no"), Some(0));
        assert_eq!(encoder.encode("yes"), Some(1));
        assert_eq!(encoder.encode("maybe"), None);
        assert_eq!(encoder.decode(2), None);
    }

    #[test]
    fn test_run_id_is_persisted() {
        let encoder = LabelEncoder::fit(["no", "yes"]).for_run("2024_01_02_03_04_05");
        let json = serde_json::to_value(&encoder).unwrap();

        assert_eq!(json["run_id"], "2024_01_02_03_04_05");
        assert_eq!(serde_json::from_value::<LabelEncoder>(json).unwrap(), encoder);
        assert!(serde_json::from_str::<LabelEncoder>(r#"{"classes": ["no", "yes"]}"#).is_err());
    }

    #[test]
    fn test_encode_decode_round_trip() {
        let encoder = LabelEncoder::fit(["subscribed", "declined", "pending"]);

        for label in encoder.classes() {
            let index = encoder.encode(label).unwrap();
            assert_eq!(encoder.decode(index), Some(label.as_str()));
        }
    }
}
