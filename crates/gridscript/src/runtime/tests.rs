use rust_decimal::Decimal;

use crate::explain::{explain, ExplainOptions};
use crate::parser::parse_expression;
use crate::testing::TestWorld;
use crate::typecheck::{CheckContext, TypeState};
use crate::typeexp::TypeExp;

use super::*;

fn checked(world: &TestWorld, source: &str) -> crate::expr::Expr {
    let (expr, diags) = parse_expression(source);
    assert!(diags.is_empty(), "parse diagnostics for '{source}': {diags:?}");
    let mut ctx = CheckContext::new(world, &world.functions, &world.units, &world.types);
    let result = ctx.check_expression(&expr, &TypeState::new());
    assert!(
        result.is_some(),
        "'{source}' failed to check: {:?}",
        ctx.recorder.problems()
    );
    expr
}

fn eval_in(
    world: &TestWorld,
    source: &str,
    state: &EvaluateState,
) -> Result<ValueResult, EvalError> {
    let expr = checked(world, source);
    let ctx = EvalContext::new(world, &world.functions, &world.types);
    ctx.evaluate(&expr, state)
}

fn eval(world: &TestWorld, source: &str) -> Result<ValueResult, EvalError> {
    eval_in(world, source, &EvaluateState::new())
}

fn number(source: &str) -> Decimal {
    let world = TestWorld::new();
    match eval(&world, source).expect(source).value {
        Value::Number(value) => value,
        other => panic!("expected a number from '{source}', got {other}"),
    }
}

fn text(source: &str) -> String {
    let world = TestWorld::new();
    match eval(&world, source).expect(source).value {
        Value::Text(value) => value,
        other => panic!("expected text from '{source}', got {other}"),
    }
}

fn boolean(source: &str) -> bool {
    let world = TestWorld::new();
    match eval(&world, source).expect(source).value {
        Value::Bool(value) => value,
        other => panic!("expected a boolean from '{source}', got {other}"),
    }
}

#[test]
fn arithmetic_evaluates() {
    assert_eq!(number("(1 + 2 - 4)"), Decimal::from(-1));
    assert_eq!(number("(2 * 3 * 4)"), Decimal::from(24));
    assert_eq!(number("(7 / 2)"), Decimal::from_str_exact("3.5").unwrap());
    assert_eq!(number("(2 ^ 10)"), Decimal::from(1024));
}

#[test]
fn division_by_zero_is_a_user_error() {
    let world = TestWorld::new();
    let error = eval(&world, "(1 / 0)").unwrap_err();
    assert!(matches!(error.root_cause(), EvalError::DivisionByZero));
}

#[test]
fn match_selects_first_clause_whose_guard_passes() {
    // The binding is visible to the guard and the outcome of its own
    // clause only.
    assert_eq!(
        number("@match 5 @case v @given (v > 0) @then v @case @anything @then -1 @endmatch"),
        Decimal::from(5)
    );
    assert_eq!(
        number("@match -5 @case v @given (v > 0) @then v @case @anything @then -1 @endmatch"),
        Decimal::from(-1)
    );
}

#[test]
fn tolerance_pattern_uses_absolute_difference() {
    for (subject, expected) in [("5.05", "yes"), ("4.95", "yes"), ("5.2", "no")] {
        let source = format!(
            "@match {subject} @case (5 ± 0.1) @then \"yes\" @case @anything @then \"no\" @endmatch"
        );
        assert_eq!(text(&source), expected, "subject {subject}");
    }
}

#[test]
fn and_stops_at_first_false_operand() {
    // The second operand divides by zero; short-circuiting must keep it
    // unevaluated.
    assert!(!boolean("(false & ((1 / 0) > 1))"));
    assert!(boolean("(true | ((1 / 0) > 1))"));
}

#[test]
fn equality_and_comparison_chains_stop_at_first_failing_pair() {
    assert!(!boolean("(1 = 2 = (1 / 0))"));
    assert!(!boolean("(2 < 1 < (1 / 0))"));
    assert!(boolean("(1 = 1 = 1)"));
    assert!(boolean("(1 < 2 <= 2)"));
    assert!(boolean("(1 <> 2)"));
}

#[test]
fn no_matching_clause_names_the_subject() {
    let world = TestWorld::new();
    let error = eval(&world, "@match 2 @case 1 @then \"a\" @endmatch").unwrap_err();
    let EvalError::NoMatchingClause { subject } = error.root_cause() else {
        panic!("expected a no-matching-clause error, got {error}");
    };
    assert_eq!(subject, "2");
    // The enclosing match contributed a frame to the chain.
    assert!(!error.frames().is_empty());
}

#[test]
fn equal_pattern_compares_bound_values() {
    // `v` is bound by the definition, so using it as a pattern compares
    // instead of re-binding.
    assert_eq!(
        number(
            "@define v = 2 @then @match 2 @case v @then 10 @case @anything @then 20 @endmatch @enddefine"
        ),
        Decimal::from(10)
    );
    assert_eq!(
        number(
            "@define v = 3 @then @match 2 @case v @then 10 @case @anything @then 20 @endmatch @enddefine"
        ),
        Decimal::from(20)
    );
}

#[test]
fn define_threads_bindings_in_order() {
    assert_eq!(
        number("@define x = 5, y = (x + 1) @then (x + y) @enddefine"),
        Decimal::from(11)
    );
}

#[test]
fn define_pattern_equation_must_match() {
    let world = TestWorld::new();
    let error = eval(
        &world,
        "@define (v, 2) = (1, 3) @then v @enddefine",
    )
    .unwrap_err();
    assert!(matches!(
        error.root_cause(),
        EvalError::DefinitionMatchFailed { .. }
    ));
}

#[test]
fn lambda_applies_by_pattern() {
    assert_eq!(
        number("@call @function x @then (x * 2) @endfunction(5)"),
        Decimal::from(10)
    );
    assert_eq!(
        number("@call @function (a, b) @then (a + b) @endfunction((3, 4))"),
        Decimal::from(7)
    );
}

#[test]
fn implicit_call_becomes_a_function_value() {
    assert_eq!(
        number("@define f = @call abs(?) @then @call f(-3) @enddefine"),
        Decimal::from(3)
    );
}

#[test]
fn builtin_functions_evaluate() {
    assert_eq!(number("@call abs(-3)"), Decimal::from(3));
    assert_eq!(number("@call sum([1, 2, 3])"), Decimal::from(6));
    assert_eq!(number("@call length([1, 2, 3])"), Decimal::from(3));
    assert_eq!(number("@call minimum([3, 1, 2])"), Decimal::from(1));
    assert_eq!(number("@call maximum([3, 1, 2])"), Decimal::from(3));
}

#[test]
fn columns_resolve_by_row_and_whole() {
    let mut world = TestWorld::new();
    world.add_column(
        "price",
        TypeExp::plain_num(),
        vec![
            Value::Number(Decimal::from(1)),
            Value::Number(Decimal::from(2)),
            Value::Number(Decimal::from(3)),
        ],
    );
    let state = EvaluateState::new().with_row(1);
    let result = eval_in(&world, "(@column Data\\price * 10)", &state).unwrap();
    assert!(matches!(result.value, Value::Number(v) if v == Decimal::from(20)));

    let whole = eval(&world, "@call sum(@wholecolumn Data\\price)").unwrap();
    assert!(matches!(whole.value, Value::Number(v) if v == Decimal::from(6)));
}

#[test]
fn same_row_reference_needs_a_current_row() {
    let mut world = TestWorld::new();
    world.add_column("price", TypeExp::plain_num(), vec![Value::Number(Decimal::ONE)]);
    let error = eval(&world, "@column Data\\price").unwrap_err();
    assert!(matches!(error.root_cause(), EvalError::NoCurrentRow(_)));
}

#[test]
fn tagged_values_match_by_variant() {
    assert_eq!(
        number(
            "@match @tag Perhaps\\Is(5) @case @tag Perhaps\\Is(v) @then v @case @tag Perhaps\\Missing @then 0 @endmatch"
        ),
        Decimal::from(5)
    );
    assert_eq!(
        number(
            "@match @tag Perhaps\\Missing @case @tag Perhaps\\Is(v) @then v @case @tag Perhaps\\Missing @then 0 @endmatch"
        ),
        Decimal::from(0)
    );
}

#[test]
fn or_pattern_alternatives_share_an_outcome() {
    assert_eq!(
        text("@match 2 @case 1 @orcase 2 @then \"low\" @case @anything @then \"high\" @endmatch"),
        "low"
    );
}

#[test]
fn records_tuples_and_field_access() {
    assert_eq!(number("((x: 1, y: 2)#y + 1)"), Decimal::from(3));
    assert_eq!(
        number("@match (1, (2, 3)) @case (a, (b, c)) @then (a + b + c) @endmatch"),
        Decimal::from(6)
    );
}

#[test]
fn evaluation_state_is_unchanged_by_match_and_define() {
    let world = TestWorld::new();
    let result = eval(&world, "@define x = 5 @then x @enddefine").unwrap();
    assert!(result.state.lookup("x").is_none(), "bindings must not escape");
}

#[test]
fn explanation_is_recorded_only_on_request() {
    let mut world = TestWorld::new();
    world.add_column(
        "price",
        TypeExp::plain_num(),
        vec![Value::Number(Decimal::from(2))],
    );
    let silent = eval_in(
        &world,
        "(@column Data\\price + 1)",
        &EvaluateState::new().with_row(0),
    )
    .unwrap();
    assert!(silent.trace.is_none());

    let recorded = eval_in(
        &world,
        "(@column Data\\price + 1)",
        &EvaluateState::new().with_row(0).with_recording(true),
    )
    .unwrap();
    let trace = recorded.trace.expect("a trace when recording");
    let explanation = explain(&trace, &ExplainOptions::default()).unwrap();
    assert!(explanation.description.contains("= 3"), "{explanation:?}");
    let rendered = explanation.render();
    assert!(rendered.contains("price"), "{rendered}");
    assert!(rendered.contains("row 0"), "{rendered}");
}

#[test]
fn error_chain_carries_enclosing_frames() {
    let world = TestWorld::new();
    let error = eval(
        &world,
        "@define x = (1 / 0) @then x @enddefine",
    )
    .unwrap_err();
    assert!(matches!(error.root_cause(), EvalError::DivisionByZero));
    let frames = error.frames();
    assert!(!frames.is_empty());
    assert!(frames[0].expression.contains("@define"));
}

#[test]
#[should_panic(expected = "failed type-checking")]
fn evaluating_an_unchecked_tree_panics() {
    let world = TestWorld::new();
    let ctx = EvalContext::new(&world, &world.functions, &world.types);
    let _ = ctx.evaluate(
        &crate::expr::Expr::Unfinished("nope".to_string()),
        &EvaluateState::new(),
    );
}
