//! Scores every enriched position under every registered model and rolls the
//! results up per model and per owner.

use std::collections::HashMap;

use serde::Serialize;
use tracing::{info, warn};

use crate::enrich::EnrichedPosition;
use crate::registry::ModelRegistry;
use crate::scoring::FormulaError;

/// Scores of all positions under one model, in position order.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ModelScores {
    pub model_id: String,
    pub model_name: String,
    pub formula: String,
    pub scores: Vec<f64>,
}

/// A formula failure recorded while scoring. The affected score is `0.0`.
#[derive(Clone, Debug, PartialEq)]
pub struct ScoreDiagnostic {
    pub model_id: String,
    /// `None` when the formula failed to compile and hit every position.
    pub position_id: Option<String>,
    pub error: FormulaError,
}

/// Per-model score columns for one set of positions.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ScoreTable {
    pub columns: Vec<ModelScores>,
    pub diagnostics: Vec<ScoreDiagnostic>,
}

impl ScoreTable {
    pub fn column(&self, model_id: &str) -> Option<&ModelScores> {
        self.columns.iter().find(|column| column.model_id == model_id)
    }
}

/// Score every position with every model.
///
/// A model whose formula does not compile contributes a column of zeros and
/// one diagnostic; runtime failures produce one diagnostic per position.
#[tracing::instrument(skip_all, fields(models = registry.len(), positions = positions.len()))]
pub fn score_positions(registry: &ModelRegistry, positions: &[EnrichedPosition]) -> ScoreTable {
    let mut table = ScoreTable::default();

    for model in registry.models() {
        let mut scores = Vec::with_capacity(positions.len());

        if let Some(err) = model.formula.compile_error() {
            warn!(model_id = %model.id, error = %err, "model formula does not compile, scoring zero");
            scores.resize(positions.len(), 0.0);
            table.diagnostics.push(ScoreDiagnostic {
                model_id: model.id.clone(),
                position_id: None,
                error: err.clone(),
            });
        } else {
            for position in positions {
                let score = match model.try_score(position) {
                    Ok(score) => score,
                    Err(err) => {
                        warn!(model_id = %model.id, position_id = %position.id, error = %err, "error evaluating formula");
                        table.diagnostics.push(ScoreDiagnostic {
                            model_id: model.id.clone(),
                            position_id: Some(position.id.clone()),
                            error: err,
                        });
                        0.0
                    }
                };
                scores.push(score);
            }
        }

        table.columns.push(ModelScores {
            model_id: model.id.clone(),
            model_name: model.name.clone(),
            formula: model.formula.source().to_string(),
            scores,
        });
    }

    info!(diagnostics = table.diagnostics.len(), "scoring pass complete");
    table
}

/// Totals for one model over a set of positions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct ModelSummary {
    pub total_power: f64,
    /// Power of positions whose range contains the current price.
    pub active_power: f64,
    pub active_positions: usize,
    pub position_count: usize,
}

impl ModelSummary {
    /// `positions` and `scores` are paired by index.
    pub fn summarize(positions: &[EnrichedPosition], scores: &[f64]) -> Self {
        positions
            .iter()
            .zip(scores)
            .fold(Self::default(), |mut summary, (position, score)| {
                summary.total_power += score;
                summary.position_count += 1;
                if position.is_active {
                    summary.active_power += score;
                    summary.active_positions += 1;
                }
                summary
            })
    }
}

/// Positions per owner, most positions first, ties by owner address.
pub fn owner_position_counts(positions: &[EnrichedPosition]) -> Vec<(String, usize)> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for position in positions {
        *counts.entry(position.owner.as_str()).or_default() += 1;
    }

    let mut counts: Vec<(String, usize)> = counts
        .into_iter()
        .map(|(owner, count)| (owner.to_string(), count))
        .collect();
    counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    counts
}

/// Positions held by `owner`, compared case-insensitively.
pub fn filter_by_owner(positions: &[EnrichedPosition], owner: &str) -> Vec<EnrichedPosition> {
    positions
        .iter()
        .filter(|position| position.owner.eq_ignore_ascii_case(owner))
        .cloned()
        .collect()
}
