//! pv-analysis crate
//!
//! Turns raw pool positions into enriched holdings, scores them with
//! user-defined voting-power formulas, and manages the set of formulas.

pub mod curve;
pub mod enrich;
pub mod registry;
pub mod scoring;
pub mod voting;

pub use enrich::{EnrichedPosition, EnrichmentResult, EnrichmentWarning, PositionEnricher, PositionType};
pub use registry::{ImportReport, ModelDraft, ModelRegistry, ScoringModel, DEFAULT_MODEL_ID};
pub use scoring::{evaluate, try_evaluate, Formula, FormulaError, Value, Variables, DEFAULT_FORMULA};
pub use curve::{display_range, multiplier_curve, CurvePoint, CURVE_SAMPLES};
pub use voting::{
    filter_by_owner, owner_position_counts, score_positions, ModelScores, ModelSummary, ScoreDiagnostic, ScoreTable,
};
