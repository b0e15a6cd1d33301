//! Source-precedence merge of field values into a case's field bag.
//!
//! Questionnaire answers are authoritative. Extraction may only fill keys whose questionnaire
//! value is empty, and never with an empty value of its own.

use serde::{Deserialize, Serialize};

use super::domain::{FieldMap, FieldSource, FieldValue};

#[derive(Debug, Clone, Copy)]
pub struct MergeOptions<'a> {
    pub source: FieldSource,
    /// Values the applicant typed; consulted for extraction merges.
    pub questionnaire: &'a FieldMap,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeOutcome {
    pub merged: FieldMap,
    /// Keys whose value actually changed, in key order.
    pub updated_keys: Vec<String>,
}

/// Merge `incoming` over `existing` without mutating either.
pub fn merge_fields(existing: &FieldMap, incoming: &FieldMap, options: MergeOptions<'_>) -> MergeOutcome {
    let mut merged = existing.clone();
    let mut updated_keys = Vec::new();

    for (key, value) in incoming {
        let applies = match options.source {
            FieldSource::Questionnaire => true,
            FieldSource::Extraction => {
                !value.is_empty()
                    && options
                        .questionnaire
                        .get(key)
                        .map(FieldValue::is_empty)
                        .unwrap_or(true)
            }
        };
        if !applies {
            continue;
        }

        if merged.get(key) != Some(value) {
            merged.insert(key.clone(), value.clone());
            updated_keys.push(key.clone());
        }
    }

    MergeOutcome {
        merged,
        updated_keys,
    }
}

/// Case-scoped field state with its questionnaire layer kept alongside.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldBag {
    values: FieldMap,
    questionnaire: FieldMap,
}

impl FieldBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn values(&self) -> &FieldMap {
        &self.values
    }

    pub fn questionnaire(&self) -> &FieldMap {
        &self.questionnaire
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.values.get(key)
    }

    /// Provenance tier currently backing `key`.
    pub fn source_of(&self, key: &str) -> Option<FieldSource> {
        match self.questionnaire.get(key) {
            Some(value) if !value.is_empty() => Some(FieldSource::Questionnaire),
            _ => self.values.contains_key(key).then_some(FieldSource::Extraction),
        }
    }

    /// Merge `incoming` from `source` and return the keys that changed.
    pub fn apply(&mut self, source: FieldSource, incoming: &FieldMap) -> Vec<String> {
        let outcome = merge_fields(
            &self.values,
            incoming,
            MergeOptions {
                source,
                questionnaire: &self.questionnaire,
            },
        );
        if source == FieldSource::Questionnaire {
            self.questionnaire
                .extend(incoming.iter().map(|(key, value)| (key.clone(), value.clone())));
        }
        self.values = outcome.merged;
        outcome.updated_keys
    }
}
