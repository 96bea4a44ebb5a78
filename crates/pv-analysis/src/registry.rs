//! Named voting-power models and their JSON exchange format.
//!
//! A registry always holds the default 4x/2x model under the id `default`;
//! it can be updated but never removed. User models get `model_<uuid>` ids,
//! imported ones `imported_<uuid>`.
//!
//! Exchange format, keyed by model id:
//!
//! ```json
//! {
//!   "default": {
//!     "name": "Default (4x/2x)",
//!     "description": "...",
//!     "params": { "equation": "reg_amount * 4 + reg_equivalent * 2" }
//!   }
//! }
//! ```

use std::fmt;

use eyre::{Result, WrapErr};
use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::enrich::EnrichedPosition;
use crate::scoring::{Formula, FormulaError, DEFAULT_FORMULA};

pub const DEFAULT_MODEL_ID: &str = "default";
pub const DEFAULT_MODEL_NAME: &str = "Default (4x/2x)";
pub const DEFAULT_MODEL_DESCRIPTION: &str =
    "REG in liquidity pools gets 4x votes, REG equivalent of other tokens gets 2x votes";

/// Description pre-filled for a new model.
pub const DRAFT_DESCRIPTION: &str = "Custom PowerVoting model";

/// A named formula.
#[derive(Clone, Debug, PartialEq)]
pub struct ScoringModel {
    pub id: String,
    pub name: String,
    pub description: String,
    pub formula: Formula,
}

impl ScoringModel {
    fn default_model() -> Self {
        Self {
            id: DEFAULT_MODEL_ID.to_string(),
            name: DEFAULT_MODEL_NAME.to_string(),
            description: DEFAULT_MODEL_DESCRIPTION.to_string(),
            formula: Formula::new(DEFAULT_FORMULA),
        }
    }

    pub fn is_default(&self) -> bool {
        self.id == DEFAULT_MODEL_ID
    }

    /// Voting power of one position under this model; failures score `0.0`.
    pub fn score(&self, position: &EnrichedPosition) -> f64 {
        self.formula.evaluate(
            position.reg_amount,
            position.reg_equivalent,
            &position.scoring_variables(),
        )
    }

    pub fn try_score(&self, position: &EnrichedPosition) -> Result<f64, FormulaError> {
        self.formula.try_evaluate(
            position.reg_amount,
            position.reg_equivalent,
            &position.scoring_variables(),
        )
    }
}

/// Pre-filled values for a new-model form.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModelDraft {
    pub name: String,
    pub description: String,
    pub formula: String,
}

/// Outcome of [`ModelRegistry::import`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ImportReport {
    /// Entries added to the registry.
    pub imported: usize,
    /// Entries dropped for a missing or mistyped field.
    pub skipped: usize,
    /// Ids assigned to the added entries, in document order.
    pub ids: Vec<String>,
}

/// Ordered collection of scoring models, default first.
#[derive(Clone, Debug, PartialEq)]
pub struct ModelRegistry {
    models: Vec<ScoringModel>,
    created: usize,
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelRegistry {
    /// Registry holding only the default model.
    pub fn new() -> Self {
        Self {
            models: vec![ScoringModel::default_model()],
            created: 0,
        }
    }

    /// Rebuild a registry from an exported document, keeping its ids.
    ///
    /// A `default` entry replaces the built-in default's fields. Invalid
    /// entries are skipped as in [`ModelRegistry::import`].
    ///
    /// # Errors
    /// Fails if the document is not a JSON object.
    pub fn restore(json: &str) -> Result<Self> {
        let document: ModelDocument =
            serde_json::from_str(json).wrap_err("failed to parse models document")?;

        let mut registry = Self::new();
        for (id, entry) in document.entries {
            let Some(model) = parse_entry(&id, entry) else {
                continue;
            };
            if id == DEFAULT_MODEL_ID {
                registry.models[0] = model.into_model(id);
            } else if registry.contains(&id) {
                warn!(model_id = %id, "duplicate model id, keeping the first entry");
            } else {
                registry.models.push(model.into_model(id));
                registry.created += 1;
            }
        }

        debug!(models = registry.len(), "registry restored");
        Ok(registry)
    }

    pub fn models(&self) -> &[ScoringModel] {
        &self.models
    }

    pub fn get(&self, id: &str) -> Option<&ScoringModel> {
        self.models.iter().find(|model| model.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    /// Never true: the default model cannot be removed.
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Add a model and return its fresh `model_<uuid>` id.
    ///
    /// The formula is stored as given; one that does not compile scores zero.
    pub fn create(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        formula: impl Into<String>,
    ) -> String {
        let id = self.fresh_id("model");
        let model = ScoringModel {
            id: id.clone(),
            name: name.into(),
            description: description.into(),
            formula: Formula::new(formula),
        };
        if let Some(err) = model.formula.compile_error() {
            warn!(model_id = %id, error = %err, "model formula does not compile");
        }
        self.models.push(model);
        self.created += 1;
        info!(model_id = %id, "model created");
        id
    }

    /// Replace a model's fields in place. Returns `false` for an unknown id.
    pub fn update(
        &mut self,
        id: &str,
        name: impl Into<String>,
        description: impl Into<String>,
        formula: impl Into<String>,
    ) -> bool {
        let Some(model) = self.models.iter_mut().find(|model| model.id == id) else {
            debug!(model_id = %id, "update of unknown model ignored");
            return false;
        };
        model.name = name.into();
        model.description = description.into();
        model.formula = Formula::new(formula);
        info!(model_id = %id, "model updated");
        true
    }

    /// Remove a model. The default model and unknown ids are left alone.
    pub fn delete(&mut self, id: &str) -> bool {
        if id == DEFAULT_MODEL_ID {
            debug!("default model cannot be deleted");
            return false;
        }
        let before = self.models.len();
        self.models.retain(|model| model.id != id);
        let removed = self.models.len() != before;
        if removed {
            info!(model_id = %id, "model deleted");
        }
        removed
    }

    /// Defaults for the next new-model form.
    pub fn draft(&self) -> ModelDraft {
        ModelDraft {
            name: format!("Model {}", self.created + 1),
            description: DRAFT_DESCRIPTION.to_string(),
            formula: DEFAULT_FORMULA.to_string(),
        }
    }

    /// Pretty-printed exchange document, in registry order.
    pub fn export(&self) -> Result<String> {
        serde_json::to_string_pretty(&ExportView(&self.models)).wrap_err("failed to serialize models")
    }

    /// Merge an exchange document into the registry under fresh
    /// `imported_<uuid>` ids.
    ///
    /// Entries missing `name`, `description` or `params.equation` are
    /// skipped. A `default` entry is ignored: the registry already has one.
    ///
    /// # Errors
    /// Fails, leaving the registry untouched, if the document is not a JSON
    /// object.
    pub fn import(&mut self, json: &str) -> Result<ImportReport> {
        let document: ModelDocument =
            serde_json::from_str(json).wrap_err("failed to parse models document")?;

        let mut report = ImportReport::default();
        for (id, entry) in document.entries {
            if id == DEFAULT_MODEL_ID {
                debug!("skipping default model entry on import");
                continue;
            }
            let Some(model) = parse_entry(&id, entry) else {
                report.skipped += 1;
                continue;
            };
            let new_id = self.fresh_id("imported");
            self.models.push(model.into_model(new_id.clone()));
            report.ids.push(new_id);
            report.imported += 1;
        }

        info!(
            imported = report.imported,
            skipped = report.skipped,
            "models imported"
        );
        Ok(report)
    }

    fn fresh_id(&self, prefix: &str) -> String {
        loop {
            let id = format!("{prefix}_{}", Uuid::new_v4());
            if !self.contains(&id) {
                return id;
            }
        }
    }
}

#[derive(Serialize, Deserialize)]
struct ModelParams<S> {
    equation: S,
}

/// One entry of the exchange format. Unknown fields are ignored.
#[derive(Serialize, Deserialize)]
struct ModelEntry<S> {
    name: S,
    description: S,
    params: ModelParams<S>,
}

impl ModelEntry<String> {
    fn into_model(self, id: String) -> ScoringModel {
        ScoringModel {
            id,
            name: self.name,
            description: self.description,
            formula: Formula::new(self.params.equation),
        }
    }
}

fn parse_entry(id: &str, entry: serde_json::Value) -> Option<ModelEntry<String>> {
    match serde_json::from_value(entry) {
        Ok(model) => Some(model),
        Err(err) => {
            warn!(model_id = %id, error = %err, "skipping invalid model entry");
            None
        }
    }
}

struct ExportView<'a>(&'a [ScoringModel]);

impl Serialize for ExportView<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.0.iter().map(|model| {
            (
                model.id.as_str(),
                ModelEntry {
                    name: model.name.as_str(),
                    description: model.description.as_str(),
                    params: ModelParams {
                        equation: model.formula.source(),
                    },
                },
            )
        }))
    }
}

/// Top-level document entries in file order.
struct ModelDocument {
    entries: Vec<(String, serde_json::Value)>,
}

impl<'de> Deserialize<'de> for ModelDocument {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct DocumentVisitor;

        impl<'de> Visitor<'de> for DocumentVisitor {
            type Value = ModelDocument;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a JSON object keyed by model id")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut entries = Vec::new();
                while let Some(entry) = map.next_entry::<String, serde_json::Value>()? {
                    entries.push(entry);
                }
                Ok(ModelDocument { entries })
            }
        }

        deserializer.deserialize_map(DocumentVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_registry_holds_the_default_model() {
        let registry = ModelRegistry::new();
        assert_eq!(registry.len(), 1);
        let model = registry.get(DEFAULT_MODEL_ID).expect("default model");
        assert_eq!(model.name, "Default (4x/2x)");
        assert_eq!(model.formula.source(), DEFAULT_FORMULA);
        assert!(model.is_default());
    }

    #[test]
    fn create_assigns_prefixed_unique_ids() {
        let mut registry = ModelRegistry::new();
        let a = registry.create("A", "first", "reg_amount");
        let b = registry.create("B", "second", "reg_equivalent");
        assert!(a.starts_with("model_"));
        assert_ne!(a, b);
        let ids: Vec<&str> = registry.models().iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec![DEFAULT_MODEL_ID, a.as_str(), b.as_str()]);
    }

    #[test]
    fn update_replaces_fields_and_ignores_unknown_ids() {
        let mut registry = ModelRegistry::new();
        let id = registry.create("A", "first", "reg_amount");
        assert!(registry.update(&id, "A2", "changed", "reg_amount * 3"));
        let model = registry.get(&id).expect("model");
        assert_eq!(model.name, "A2");
        assert_eq!(model.formula.source(), "reg_amount * 3");

        let before = registry.clone();
        assert!(!registry.update("missing", "x", "y", "z"));
        assert_eq!(registry, before);
    }

    #[test]
    fn default_model_cannot_be_deleted() {
        let mut registry = ModelRegistry::new();
        let id = registry.create("A", "first", "reg_amount");
        assert!(!registry.delete(DEFAULT_MODEL_ID));
        assert!(!registry.delete("missing"));
        assert!(registry.delete(&id));
        assert_eq!(registry.len(), 1);
        assert!(registry.contains(DEFAULT_MODEL_ID));
    }

    #[test]
    fn draft_counts_created_models() {
        let mut registry = ModelRegistry::new();
        assert_eq!(registry.draft().name, "Model 1");
        registry.create("A", "first", "reg_amount");
        let draft = registry.draft();
        assert_eq!(draft.name, "Model 2");
        assert_eq!(draft.description, DRAFT_DESCRIPTION);
        assert_eq!(draft.formula, DEFAULT_FORMULA);
    }

    #[test]
    fn export_uses_exchange_format_in_registry_order() {
        let mut registry = ModelRegistry::new();
        let id = registry.create("Zeta", "custom", "reg_amount * 10");
        let json = registry.export().expect("exports");

        let value: serde_json::Value = serde_json::from_str(&json).expect("valid json");
        assert_eq!(value[&id]["params"]["equation"], "reg_amount * 10");
        assert_eq!(value[DEFAULT_MODEL_ID]["name"], "Default (4x/2x)");
        assert!(json.find(DEFAULT_MODEL_ID) < json.find(&id));
    }

    #[test]
    fn import_assigns_fresh_ids_and_skips_invalid_entries() {
        let doc = r#"{
            "mine": { "name": "M", "description": "d", "params": { "equation": "reg_amount * 10" } },
            "broken": { "name": "B", "params": { "equation": "1" } },
            "default": { "name": "D", "description": "d", "params": { "equation": "1" } }
        }"#;

        let mut registry = ModelRegistry::new();
        let report = registry.import(doc).expect("imports");
        assert_eq!(report.imported, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(registry.len(), 2);

        let id = &report.ids[0];
        assert!(id.starts_with("imported_"));
        assert_eq!(registry.get(id).map(|m| m.name.as_str()), Some("M"));
        assert_eq!(
            registry.get(DEFAULT_MODEL_ID).map(|m| m.name.as_str()),
            Some(DEFAULT_MODEL_NAME)
        );
    }

    #[test]
    fn import_rejects_non_object_documents() {
        let mut registry = ModelRegistry::new();
        assert!(registry.import("[1, 2, 3]").is_err());
        assert!(registry.import("not json").is_err());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn export_then_import_preserves_models() {
        let mut source = ModelRegistry::new();
        source.create("A", "first", "reg_amount * 2");
        source.create("B", "second", "min(reg_amount, 100)");
        let json = source.export().expect("exports");

        let mut target = ModelRegistry::new();
        let report = target.import(&json).expect("imports");
        assert_eq!(report.imported, 2);

        let summary = |registry: &ModelRegistry| -> Vec<(String, String, String)> {
            registry
                .models()
                .iter()
                .map(|m| (m.name.clone(), m.description.clone(), m.formula.source().to_string()))
                .collect()
        };
        assert_eq!(summary(&source), summary(&target));
    }

    #[test]
    fn restore_keeps_ids_and_order() {
        let mut source = ModelRegistry::new();
        source.update(DEFAULT_MODEL_ID, "Tuned", "d", "reg_amount * 5");
        let b = source.create("B", "second", "reg_amount");
        let a = source.create("A", "first", "reg_equivalent");

        let restored = ModelRegistry::restore(&source.export().expect("exports")).expect("restores");
        assert_eq!(restored.models(), source.models());
        assert_eq!(restored.models()[1].id, b);
        assert_eq!(restored.models()[2].id, a);
        assert_eq!(restored.draft().name, "Model 3");
    }
}
