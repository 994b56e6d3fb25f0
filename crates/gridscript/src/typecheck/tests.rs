use rust_decimal::Decimal;

use crate::expr::Expr;
use crate::parser::parse_expression;
use crate::runtime::Value;
use crate::testing::TestWorld;
use crate::typeexp::TypeExp;
use crate::units::{Unit, UnitExp};

use super::{CheckContext, TypeState};

fn parse(source: &str) -> Expr {
    let (expr, diags) = parse_expression(source);
    assert!(diags.is_empty(), "diagnostics for '{source}': {diags:?}");
    expr
}

fn checked_type(world: &TestWorld, source: &str) -> TypeExp {
    let expr = parse(source);
    let mut ctx = CheckContext::new(world, &world.functions, &world.units, &world.types);
    let checked = ctx.check_expression(&expr, &TypeState::new());
    let checked = checked.unwrap_or_else(|| {
        panic!(
            "'{source}' failed to check: {:?}",
            ctx.recorder.problems()
        )
    });
    ctx.arena.resolve(&checked.ty)
}

fn check_failure(world: &TestWorld, source: &str) -> (Expr, Vec<String>, Vec<super::QuickFix>) {
    let expr = parse(source);
    let mut ctx = CheckContext::new(world, &world.functions, &world.units, &world.types);
    let checked = ctx.check_expression(&expr, &TypeState::new());
    assert!(checked.is_none(), "expected '{source}' to fail checking");
    let mut messages = Vec::new();
    let mut fixes = Vec::new();
    for problem in ctx.recorder.problems() {
        messages.push(problem.message.clone());
        fixes.extend(problem.quick_fixes.iter().cloned());
    }
    (expr, messages, fixes)
}

fn num(unit: Unit) -> TypeExp {
    TypeExp::Num(UnitExp::from_unit(&unit))
}

#[test]
fn literal_types() {
    let world = TestWorld::new();
    assert_eq!(checked_type(&world, "5"), TypeExp::plain_num());
    assert_eq!(checked_type(&world, "5{m}"), num(Unit::base("m")));
    assert_eq!(checked_type(&world, "\"hi\""), TypeExp::Text);
    assert_eq!(checked_type(&world, "true"), TypeExp::Bool);
    assert_eq!(
        checked_type(&world, "date{2024-01-15}"),
        TypeExp::Date(crate::typeexp::DateKind::YearMonthDay)
    );
}

#[test]
fn unit_arithmetic_types() {
    let world = TestWorld::new();
    assert_eq!(checked_type(&world, "(1{m} + 2{m})"), num(Unit::base("m")));
    assert_eq!(
        checked_type(&world, "(2{m} * 3{s})"),
        num(Unit::base("m").times(&Unit::base("s")))
    );
    assert_eq!(
        checked_type(&world, "(6{m} / 2{s})"),
        num(Unit::base("m").divide(&Unit::base("s")))
    );
    assert_eq!(
        checked_type(&world, "(2{m} ^ 2)"),
        num(Unit::base("m").raised_to(2))
    );
    // A raise by a non-literal exponent forces a dimensionless base.
    assert_eq!(checked_type(&world, "(2 ^ (1 / 2))"), TypeExp::plain_num());
}

#[test]
fn unit_mismatch_offers_literal_rewrite() {
    let world = TestWorld::new();
    let (expr, messages, fixes) = check_failure(&world, "(1{m} + 2{s})");
    assert!(messages.iter().any(|m| m.contains("unit mismatch")), "{messages:?}");
    let fix = fixes.first().expect("a quick fix on the literal");
    let repaired = fix.apply(&expr).unwrap();
    let mut ctx = CheckContext::new(&world, &world.functions, &world.units, &world.types);
    assert!(ctx.check_expression(&repaired, &TypeState::new()).is_some());
}

#[test]
fn unknown_unit_suggestion_resolves() {
    let world = TestWorld::new();
    let (expr, messages, fixes) = check_failure(&world, "1{meter}");
    assert!(messages.iter().any(|m| m.contains("meter")), "{messages:?}");
    let fix = fixes.first().expect("a suggestion for the near name");
    let repaired = fix.apply(&expr).unwrap();
    let mut ctx = CheckContext::new(&world, &world.functions, &world.units, &world.types);
    assert!(
        ctx.check_expression(&repaired, &TypeState::new()).is_some(),
        "applying the suggested unit must resolve"
    );
}

#[test]
fn unknown_identifier_offers_column_fix() {
    let mut world = TestWorld::new();
    world.add_column(
        "price",
        TypeExp::plain_num(),
        vec![Value::Number(Decimal::ONE)],
    );
    let (expr, messages, fixes) = check_failure(&world, "(price + 1)");
    assert!(messages.iter().any(|m| m.contains("unknown identifier")));
    let fix = fixes.first().expect("a column quick fix");
    let repaired = fix.apply(&expr).unwrap();
    let mut ctx = CheckContext::new(&world, &world.functions, &world.units, &world.types);
    assert!(ctx.check_expression(&repaired, &TypeState::new()).is_some());
}

#[test]
fn column_types_resolve() {
    let mut world = TestWorld::new();
    world.add_column("price", num(Unit::base("m")), Vec::new());
    assert_eq!(
        checked_type(&world, "@column Data\\price"),
        num(Unit::base("m"))
    );
    assert_eq!(
        checked_type(&world, "@wholecolumn Data\\price"),
        TypeExp::Array(Box::new(num(Unit::base("m"))))
    );
}

#[test]
fn match_pattern_binds_variable_for_guard_and_outcome() {
    let world = TestWorld::new();
    let ty = checked_type(
        &world,
        "@match 5 @case v @given (v > 0) @then v @case @anything @then -1 @endmatch",
    );
    assert_eq!(ty, TypeExp::plain_num());
}

#[test]
fn pattern_bindings_do_not_leak_across_clauses() {
    let world = TestWorld::new();
    let (_, messages, _) = check_failure(
        &world,
        "@match 1 @case v @then v @case @anything @then v @endmatch",
    );
    assert!(
        messages.iter().any(|m| m.contains("unknown identifier 'v'")),
        "{messages:?}"
    );
}

#[test]
fn duplicate_pattern_variable_is_reported() {
    let world = TestWorld::new();
    let (_, messages, _) = check_failure(&world, "@match (1, 2) @case (v, v) @then v @endmatch");
    assert!(
        messages.iter().any(|m| m.contains("declared twice")),
        "{messages:?}"
    );
}

#[test]
fn clause_outcomes_must_unify() {
    let world = TestWorld::new();
    let (_, messages, _) = check_failure(
        &world,
        "@match 1 @case 1 @then \"a\" @case @anything @then 2 @endmatch",
    );
    assert!(
        messages.iter().any(|m| m.contains("different types")),
        "{messages:?}"
    );
}

#[test]
fn alternative_patterns_must_declare_same_variables() {
    let world = TestWorld::new();
    let (_, messages, _) = check_failure(
        &world,
        "@match 1 @case v @orcase @anything @then 0 @endmatch",
    );
    assert!(
        messages
            .iter()
            .any(|m| m.contains("same variables")),
        "{messages:?}"
    );
}

#[test]
fn subject_and_pattern_types_unify() {
    let world = TestWorld::new();
    let (_, messages, _) = check_failure(&world, "@match 1 @case \"a\" @then 2 @endmatch");
    assert!(messages.iter().any(|m| m.contains("type mismatch")), "{messages:?}");
}

#[test]
fn tolerance_is_pattern_only() {
    let world = TestWorld::new();
    let (_, messages, _) = check_failure(&world, "(5 ± 1)");
    assert!(
        messages.iter().any(|m| m.contains("only allowed in a pattern")),
        "{messages:?}"
    );
    assert_eq!(
        checked_type(
            &world,
            "@match 5 @case (5 ± 0.1) @then 1 @case @anything @then 0 @endmatch"
        ),
        TypeExp::plain_num()
    );
}

#[test]
fn implicit_arg_makes_the_call_a_function() {
    let world = TestWorld::new();
    let ty = checked_type(&world, "@call abs(?)");
    let TypeExp::Function(params, result) = ty else {
        panic!("expected a function type");
    };
    assert_eq!(params.len(), 1);
    assert!(matches!(*result, TypeExp::Num(_)));
}

#[test]
fn bare_implicit_arg_is_rejected() {
    let world = TestWorld::new();
    let (_, messages, _) = check_failure(&world, "(? + 1)");
    assert!(
        messages.iter().any(|m| m.contains("call argument")),
        "{messages:?}"
    );
}

#[test]
fn comparing_functions_is_rejected() {
    let world = TestWorld::new();
    let (_, messages, _) = check_failure(&world, "(abs = abs)");
    assert!(
        messages.iter().any(|m| m.contains("cannot be compared")),
        "{messages:?}"
    );
}

#[test]
fn define_threads_pattern_bindings() {
    let world = TestWorld::new();
    assert_eq!(
        checked_type(&world, "@define x = 5, y = (x + 1) @then (x + y) @enddefine"),
        TypeExp::plain_num()
    );
}

#[test]
fn tagged_types_check_by_declared_variant() {
    let world = TestWorld::new();
    let ty = checked_type(&world, "@tag Perhaps\\Is(5)");
    assert!(matches!(ty, TypeExp::Tagged { ref name, .. } if name == "Perhaps"));
    let (_, messages, _) = check_failure(&world, "@tag Perhaps\\Is(\"x\")");
    assert!(messages.iter().any(|m| m.contains("type mismatch")), "{messages:?}");
    let (_, messages, _) = check_failure(&world, "@tag Perhaps\\Unknown");
    assert!(messages.iter().any(|m| m.contains("no tag")), "{messages:?}");
}

#[test]
fn sibling_errors_are_all_reported() {
    let world = TestWorld::new();
    let (_, messages, _) = check_failure(&world, "(nope1 + nope2)");
    assert!(messages.iter().any(|m| m.contains("nope1")));
    assert!(messages.iter().any(|m| m.contains("nope2")));
}

#[test]
fn invalid_ops_are_a_recorded_error() {
    let world = TestWorld::new();
    let (_, messages, _) = check_failure(&world, "1 + 2 * 3");
    assert!(
        messages.iter().any(|m| m.contains("mixed")),
        "{messages:?}"
    );
}

#[test]
fn types_are_recorded_per_node() {
    let world = TestWorld::new();
    let expr = parse("(1 + 2)");
    let mut ctx = CheckContext::new(&world, &world.functions, &world.units, &world.types);
    ctx.check_expression(&expr, &TypeState::new()).unwrap();
    let root = crate::expr::ExprPath::root();
    assert!(ctx.recorder.type_at(&root).is_some());
    assert!(ctx.recorder.type_at(&root.child(0)).is_some());
    assert!(ctx.recorder.type_at(&root.child(1)).is_some());
}
