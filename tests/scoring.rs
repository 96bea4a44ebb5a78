//! Integration tests for formula scoring over enriched positions.

mod common;

use common::reg_position;
use pv_analysis::curve::multiplier_curve;
use pv_analysis::scoring::{IS_ACTIVE, REG_AMOUNT};
use pv_analysis::{
    evaluate, score_positions, try_evaluate, Formula, FormulaError, ModelRegistry, ModelSummary,
    PositionEnricher, Variables, DEFAULT_FORMULA, DEFAULT_MODEL_ID,
};

/// The default model reproduces the enricher's fixed 4x / 2x total.
#[test]
fn default_model_matches_fixed_weights() {
    let result = PositionEnricher::default().enrich(&[
        reg_position("in", "0x1", -600, 600, 0),
        reg_position("below", "0x2", 600, 1_200, 0),
        reg_position("above", "0x3", -1_200, -600, 0),
    ]);
    let table = score_positions(&ModelRegistry::new(), &result.positions);
    let column = table.column(DEFAULT_MODEL_ID).expect("default column");

    for (position, score) in result.positions.iter().zip(&column.scores) {
        assert!(
            (score - position.power_total).abs() <= 1e-9 * position.power_total.max(1.0),
            "{}: {score} vs {}",
            position.id,
            position.power_total
        );
    }
}

/// Scoring the same inputs twice gives the same numbers.
#[test]
fn scoring_is_deterministic() {
    let mut registry = ModelRegistry::new();
    registry.create(
        "Decay",
        "",
        "reg_amount * (6 - 5 * min(relative_distance, 1.0)) + reg_equivalent * 2",
    );
    let result = PositionEnricher::default().enrich(&[
        reg_position("1", "0x1", -600, 600, 0),
        reg_position("2", "0x1", 2_000, 4_000, 0),
    ]);

    let first = score_positions(&registry, &result.positions);
    let second = score_positions(&registry, &result.positions);
    assert_eq!(first, second);
}

/// Activity gating zeroes out-of-range positions and leaves the rest.
#[test]
fn active_only_model_ignores_inactive_positions() {
    let mut registry = ModelRegistry::new();
    let gated = registry.create("Active only", "", "(reg_amount * 4 + reg_equivalent * 2) * is_active");
    let result = PositionEnricher::default().enrich(&[
        reg_position("in", "0x1", -600, 600, 0),
        reg_position("out", "0x1", 600, 1_200, 0),
    ]);

    let table = score_positions(&registry, &result.positions);
    let scores = &table.column(&gated).expect("gated column").scores;
    assert!(scores[0] > 0.0);
    assert_eq!(scores[1], 0.0);

    let summary = ModelSummary::summarize(&result.positions, scores);
    assert_eq!(summary.total_power, summary.active_power);
    assert_eq!(summary.active_positions, 1);
    assert_eq!(summary.position_count, 2);
}

/// Nothing outside the arithmetic vocabulary evaluates.
#[test]
fn formulas_cannot_escape_the_vocabulary() {
    let extra = Variables::new();
    for source in [
        "__import__('os').system('echo hi')",
        "open('/etc/passwd').read()",
        "reg_amount.__class__.__bases__",
        "[x for x in (1, 2)]",
        "exec('1')",
        "lambda: 1",
        "reg_amount if 1 else 0",
        "globals()",
    ] {
        assert_eq!(evaluate(10.0, source, 5.0, &extra), 0.0, "{source}");
        assert!(try_evaluate(10.0, source, 5.0, &extra).is_err(), "{source}");
    }
}

/// Variable substitution matches whole names only.
#[test]
fn substitution_is_whole_name() {
    let extra = Variables::new().with("reg", 100.0).with("amount", 1000.0);
    assert_eq!(evaluate(2.0, "reg_amount + reg + amount", 0.0, &extra), 1102.0);
}

/// Caller variables take precedence over the two canonical amounts.
#[test]
fn caller_variables_resolve_first() {
    let extra = Variables::new().with(REG_AMOUNT, 3.0).with(IS_ACTIVE, false);
    assert_eq!(evaluate(100.0, "reg_amount + is_active", 0.0, &extra), 3.0);
}

#[test]
fn runtime_errors_surface_through_try_evaluate() {
    let extra = Variables::new();
    assert_eq!(
        try_evaluate(1.0, "reg_amount / reg_equivalent", 0.0, &extra),
        Err(FormulaError::DivisionByZero)
    );
    assert_eq!(
        try_evaluate(1.0, "missing * 2", 0.0, &extra),
        Err(FormulaError::UnknownVariable("missing".into()))
    );
    assert_eq!(try_evaluate(10.0, DEFAULT_FORMULA, 5.0, &extra), Ok(50.0));
}

/// The curve reflects a distance-decay formula: peak at the current price.
#[test]
fn multiplier_curve_peaks_at_current_price() {
    let formula = Formula::new("reg_amount * (6 - 5 * min(relative_distance, 1.0))");
    let curve = multiplier_curve(&formula, 0.5, 1.5, 1.0, 101);

    let peak = curve
        .iter()
        .max_by(|a, b| a.multiplier.total_cmp(&b.multiplier))
        .expect("non-empty curve");
    assert!((peak.price - 1.0).abs() < 1e-9);
    assert!((peak.multiplier - 6.0).abs() < 1e-9);
    assert!((curve[0].multiplier - 3.5).abs() < 1e-9);
}
