use std::collections::BTreeMap;
use std::fmt;

use crate::units::{UnitExp, UnitVarId};

/// Index of a type variable cell in the checking arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TypeVarId(pub(crate) u32);

impl fmt::Display for TypeVarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

/// The temporal kinds a `Date` type can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DateKind {
    YearMonthDay,
    YearMonth,
    TimeOfDay,
    DateTime,
    DateTimeZoned,
}

impl DateKind {
    pub fn keyword(&self) -> &'static str {
        match self {
            DateKind::YearMonthDay => "date",
            DateKind::YearMonth => "dateym",
            DateKind::TimeOfDay => "time",
            DateKind::DateTime => "datetime",
            DateKind::DateTimeZoned => "datetimezoned",
        }
    }
}

/// The inference-time representation of an expression's type. Variables
/// reference cells in a `TypeArena` and live for a single check pass.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeExp {
    Num(UnitExp),
    Text,
    Bool,
    Date(DateKind),
    Function(Vec<TypeExp>, Box<TypeExp>),
    Tuple(Vec<TypeExp>),
    Record(BTreeMap<String, TypeExp>),
    Tagged {
        name: String,
        variants: Vec<TagVariant>,
    },
    Array(Box<TypeExp>),
    Var(TypeVarId),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TagVariant {
    pub name: String,
    pub payload: Option<TypeExp>,
}

impl TypeExp {
    pub fn plain_num() -> TypeExp {
        TypeExp::Num(UnitExp::one())
    }
}

impl fmt::Display for TypeExp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeExp::Num(unit) if unit.is_one() => write!(f, "Number"),
            TypeExp::Num(unit) => write!(f, "Number{{{unit}}}"),
            TypeExp::Text => write!(f, "Text"),
            TypeExp::Bool => write!(f, "Boolean"),
            TypeExp::Date(kind) => write!(f, "{}", kind.keyword()),
            TypeExp::Function(args, result) => {
                let rendered: Vec<String> = args.iter().map(|a| a.to_string()).collect();
                write!(f, "({}) -> {}", rendered.join(", "), result)
            }
            TypeExp::Tuple(items) => {
                let rendered: Vec<String> = items.iter().map(|i| i.to_string()).collect();
                write!(f, "({})", rendered.join(", "))
            }
            TypeExp::Record(fields) => {
                let rendered: Vec<String> =
                    fields.iter().map(|(n, t)| format!("{n}: {t}")).collect();
                write!(f, "({})", rendered.join(", "))
            }
            TypeExp::Tagged { name, .. } => write!(f, "{name}"),
            TypeExp::Array(element) => write!(f, "[{element}]"),
            TypeExp::Var(id) => write!(f, "{id}"),
        }
    }
}

/// Structured unification failure: which type was expected and which was
/// found, with a human-readable reason. Never a panic.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeMismatch {
    pub message: String,
    pub expected: Option<Box<TypeExp>>,
    pub found: Option<Box<TypeExp>>,
}

impl TypeMismatch {
    fn between(message: impl Into<String>, expected: TypeExp, found: TypeExp) -> Self {
        Self {
            message: message.into(),
            expected: Some(Box::new(expected)),
            found: Some(Box::new(found)),
        }
    }
}

impl fmt::Display for TypeMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.expected, &self.found) {
            (Some(expected), Some(found)) => {
                write!(f, "{} (expected {expected}, found {found})", self.message)
            }
            _ => write!(f, "{}", self.message),
        }
    }
}

/// Expected vs. found units when unit unification fails.
#[derive(Debug, Clone, PartialEq)]
pub struct UnitMismatch {
    pub expected: UnitExp,
    pub found: UnitExp,
}

/// Arena of mutable type- and unit-variable cells. Substitution happens by
/// binding a cell in place; `resolve` follows bindings with path
/// compression. Cells are only meaningful for the check pass that issued
/// them and are never persisted.
#[derive(Debug, Default)]
pub struct TypeArena {
    types: Vec<Option<TypeExp>>,
    units: Vec<Option<UnitExp>>,
}

impl TypeArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fresh_type_var(&mut self) -> TypeExp {
        let id = TypeVarId(self.types.len() as u32);
        self.types.push(None);
        TypeExp::Var(id)
    }

    pub fn fresh_unit_var(&mut self) -> UnitExp {
        let id = UnitVarId(self.units.len() as u32);
        self.units.push(None);
        UnitExp::var(id)
    }

    pub fn fresh_num(&mut self) -> TypeExp {
        let unit = self.fresh_unit_var();
        TypeExp::Num(unit)
    }

    /// Follow bindings until the representative form, compressing chains
    /// so later lookups are cheap.
    pub fn resolve(&mut self, ty: &TypeExp) -> TypeExp {
        match ty {
            TypeExp::Var(id) => {
                let Some(bound) = self.types[id.0 as usize].clone() else {
                    return ty.clone();
                };
                let resolved = self.resolve(&bound);
                self.types[id.0 as usize] = Some(resolved.clone());
                resolved
            }
            TypeExp::Num(unit) => TypeExp::Num(self.resolve_unit(unit)),
            TypeExp::Function(args, result) => TypeExp::Function(
                args.iter().map(|a| self.resolve(a)).collect(),
                Box::new(self.resolve(result)),
            ),
            TypeExp::Tuple(items) => {
                TypeExp::Tuple(items.iter().map(|i| self.resolve(i)).collect())
            }
            TypeExp::Record(fields) => TypeExp::Record(
                fields
                    .iter()
                    .map(|(name, field)| (name.clone(), self.resolve(field)))
                    .collect(),
            ),
            TypeExp::Tagged { name, variants } => TypeExp::Tagged {
                name: name.clone(),
                variants: variants
                    .iter()
                    .map(|variant| TagVariant {
                        name: variant.name.clone(),
                        payload: variant.payload.as_ref().map(|p| self.resolve(p)),
                    })
                    .collect(),
            },
            TypeExp::Array(element) => TypeExp::Array(Box::new(self.resolve(element))),
            TypeExp::Text | TypeExp::Bool | TypeExp::Date(_) => ty.clone(),
        }
    }

    /// Substitute bound unit variables and renormalize the product.
    pub fn resolve_unit(&mut self, unit: &UnitExp) -> UnitExp {
        let mut out = UnitExp {
            vars: BTreeMap::new(),
            bases: unit.bases.clone(),
        };
        for (id, power) in &unit.vars {
            match self.units[id.0 as usize].clone() {
                Some(bound) => {
                    let resolved = self.resolve_unit(&bound);
                    self.units[id.0 as usize] = Some(resolved.clone());
                    out = out.times(&resolved.raised_to(*power));
                }
                None => {
                    out = out.times(&UnitExp::var(*id).raised_to(*power));
                }
            }
        }
        out
    }

    fn bind_type(&mut self, var: TypeVarId, ty: TypeExp) -> Result<(), TypeMismatch> {
        if let TypeExp::Var(other) = &ty {
            if *other == var {
                return Ok(());
            }
        }
        if self.occurs(var, &ty) {
            return Err(TypeMismatch::between(
                "type is self-referential",
                TypeExp::Var(var),
                ty,
            ));
        }
        self.types[var.0 as usize] = Some(ty);
        Ok(())
    }

    fn occurs(&mut self, var: TypeVarId, ty: &TypeExp) -> bool {
        match self.resolve(ty) {
            TypeExp::Var(id) => id == var,
            TypeExp::Function(args, result) => {
                args.iter().any(|a| self.occurs(var, a)) || self.occurs(var, &result)
            }
            TypeExp::Tuple(items) => items.iter().any(|i| self.occurs(var, i)),
            TypeExp::Record(fields) => fields.values().any(|f| self.occurs(var, f)),
            TypeExp::Tagged { variants, .. } => variants
                .iter()
                .any(|v| v.payload.as_ref().is_some_and(|p| self.occurs(var, p))),
            TypeExp::Array(element) => self.occurs(var, &element),
            TypeExp::Num(_) | TypeExp::Text | TypeExp::Bool | TypeExp::Date(_) => false,
        }
    }

    fn bind_unit(&mut self, var: UnitVarId, unit: UnitExp) -> Result<(), ()> {
        if unit.contains_var(var) {
            return Err(());
        }
        self.units[var.0 as usize] = Some(unit);
        Ok(())
    }
}

/// Unify two types, mutating arena cells so the substitution is visible to
/// subsequent calls within the same check pass. Commutative.
pub fn unify_types(arena: &mut TypeArena, a: &TypeExp, b: &TypeExp) -> Result<(), TypeMismatch> {
    let a = arena.resolve(a);
    let b = arena.resolve(b);
    match (a, b) {
        (TypeExp::Var(a), TypeExp::Var(b)) if a == b => Ok(()),
        (TypeExp::Var(var), ty) | (ty, TypeExp::Var(var)) => arena.bind_type(var, ty),
        (TypeExp::Num(ua), TypeExp::Num(ub)) => {
            unify_units(arena, &ua, &ub).map_err(|mismatch| {
                TypeMismatch::between(
                    "unit mismatch",
                    TypeExp::Num(mismatch.expected),
                    TypeExp::Num(mismatch.found),
                )
            })
        }
        (TypeExp::Text, TypeExp::Text) => Ok(()),
        (TypeExp::Bool, TypeExp::Bool) => Ok(()),
        (TypeExp::Date(ka), TypeExp::Date(kb)) if ka == kb => Ok(()),
        (TypeExp::Function(args_a, result_a), TypeExp::Function(args_b, result_b)) => {
            if args_a.len() != args_b.len() {
                return Err(TypeMismatch::between(
                    "function arity mismatch",
                    TypeExp::Function(args_a, result_a),
                    TypeExp::Function(args_b, result_b),
                ));
            }
            for (a, b) in args_a.iter().zip(args_b.iter()) {
                unify_types(arena, a, b)?;
            }
            unify_types(arena, &result_a, &result_b)
        }
        (TypeExp::Tuple(items_a), TypeExp::Tuple(items_b)) => {
            if items_a.len() != items_b.len() {
                return Err(TypeMismatch::between(
                    "tuple length mismatch",
                    TypeExp::Tuple(items_a),
                    TypeExp::Tuple(items_b),
                ));
            }
            for (a, b) in items_a.iter().zip(items_b.iter()) {
                unify_types(arena, a, b)?;
            }
            Ok(())
        }
        (TypeExp::Record(fields_a), TypeExp::Record(fields_b)) => {
            if fields_a.len() != fields_b.len()
                || fields_a.keys().ne(fields_b.keys())
            {
                return Err(TypeMismatch::between(
                    "record fields mismatch",
                    TypeExp::Record(fields_a),
                    TypeExp::Record(fields_b),
                ));
            }
            for (name, a) in &fields_a {
                unify_types(arena, a, &fields_b[name])?;
            }
            Ok(())
        }
        (
            TypeExp::Tagged {
                name: name_a,
                variants: variants_a,
            },
            TypeExp::Tagged {
                name: name_b,
                variants: variants_b,
            },
        ) => {
            if name_a != name_b || variants_a.len() != variants_b.len() {
                return Err(TypeMismatch::between(
                    "tagged type mismatch",
                    TypeExp::Tagged {
                        name: name_a,
                        variants: variants_a,
                    },
                    TypeExp::Tagged {
                        name: name_b,
                        variants: variants_b,
                    },
                ));
            }
            for (a, b) in variants_a.iter().zip(variants_b.iter()) {
                if a.name != b.name {
                    return Err(TypeMismatch {
                        message: format!("variant '{}' does not match '{}'", a.name, b.name),
                        expected: None,
                        found: None,
                    });
                }
                match (&a.payload, &b.payload) {
                    (Some(pa), Some(pb)) => unify_types(arena, pa, pb)?,
                    (None, None) => {}
                    _ => {
                        return Err(TypeMismatch {
                            message: format!("variant '{}' differs in inner value", a.name),
                            expected: None,
                            found: None,
                        })
                    }
                }
            }
            Ok(())
        }
        (TypeExp::Array(element_a), TypeExp::Array(element_b)) => {
            unify_types(arena, &element_a, &element_b)
        }
        (a, b) => Err(TypeMismatch::between("type mismatch", a, b)),
    }
}

/// Fold a list pairwise left-to-right, failing on the first disagreeing
/// pair; the error names which position disagreed. Used for n-ary operator
/// operands and match-clause consistency.
pub fn unify_all(arena: &mut TypeArena, types: &[TypeExp]) -> Result<TypeExp, (usize, TypeMismatch)> {
    let mut iter = types.iter().enumerate();
    let Some((_, first)) = iter.next() else {
        return Ok(arena.fresh_type_var());
    };
    for (index, ty) in iter {
        unify_types(arena, first, ty).map_err(|mismatch| (index, mismatch))?;
    }
    Ok(arena.resolve(first))
}

/// Unify two unit expressions: the net exponent of their ratio must reduce
/// to zero once solved for embedded unit variables. Solving binds the
/// variable whose exponent divides every remaining exponent; the occurs
/// check keeps a variable from binding to a product containing itself.
pub fn unify_units(arena: &mut TypeArena, a: &UnitExp, b: &UnitExp) -> Result<(), UnitMismatch> {
    let a = arena.resolve_unit(a);
    let b = arena.resolve_unit(b);
    let ratio = a.divide(&b);
    solve_to_one(arena, &ratio).map_err(|()| UnitMismatch {
        expected: a,
        found: b,
    })
}

fn solve_to_one(arena: &mut TypeArena, ratio: &UnitExp) -> Result<(), ()> {
    if ratio.vars.is_empty() {
        return if ratio.bases.is_empty() { Ok(()) } else { Err(()) };
    }
    let (&var, &exponent) = ratio
        .vars
        .iter()
        .min_by_key(|(_, power)| power.unsigned_abs())
        .expect("non-empty vars");
    let mut rest = ratio.clone();
    rest.vars.remove(&var);
    // var^exponent * rest = 1  =>  var = rest^(-1/exponent)
    let solution = rest.raised_to(-1).root(exponent).ok_or(())?;
    arena.bind_unit(var, solution)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::Unit;

    fn num(unit: UnitExp) -> TypeExp {
        TypeExp::Num(unit)
    }

    #[test]
    fn unification_is_commutative() {
        let pairs: Vec<(TypeExp, TypeExp)> = vec![
            (TypeExp::Text, TypeExp::Text),
            (TypeExp::Text, TypeExp::Bool),
            (
                TypeExp::Tuple(vec![TypeExp::Text, TypeExp::plain_num()]),
                TypeExp::Tuple(vec![TypeExp::Text, TypeExp::Bool]),
            ),
            (
                num(UnitExp::from_unit(&Unit::base("m"))),
                num(UnitExp::from_unit(&Unit::base("s"))),
            ),
        ];
        for (a, b) in pairs {
            let mut left = TypeArena::new();
            let mut right = TypeArena::new();
            let forward = unify_types(&mut left, &a, &b).is_ok();
            let backward = unify_types(&mut right, &b, &a).is_ok();
            assert_eq!(forward, backward, "asymmetric result for {a} vs {b}");
        }
    }

    #[test]
    fn var_binds_both_directions() {
        let mut arena = TypeArena::new();
        let var = arena.fresh_type_var();
        unify_types(&mut arena, &var, &TypeExp::Text).unwrap();
        assert_eq!(arena.resolve(&var), TypeExp::Text);

        let mut arena = TypeArena::new();
        let var = arena.fresh_type_var();
        unify_types(&mut arena, &TypeExp::Bool, &var).unwrap();
        assert_eq!(arena.resolve(&var), TypeExp::Bool);
    }

    #[test]
    fn occurs_check_rejects_self_reference() {
        let mut arena = TypeArena::new();
        let var = arena.fresh_type_var();
        let list_of_var = TypeExp::Array(Box::new(var.clone()));
        assert!(unify_types(&mut arena, &var, &list_of_var).is_err());
    }

    #[test]
    fn substitution_is_visible_to_later_calls() {
        let mut arena = TypeArena::new();
        let var = arena.fresh_type_var();
        unify_types(&mut arena, &var, &TypeExp::Text).unwrap();
        // A second unification against the same variable must see Text.
        assert!(unify_types(&mut arena, &var, &TypeExp::Bool).is_err());
    }

    #[test]
    fn unit_variable_solves_to_quotient() {
        let mut arena = TypeArena::new();
        let m = UnitExp::from_unit(&Unit::base("m"));
        let var = arena.fresh_unit_var();
        // m * v  ~  m*s  =>  v = s
        let lhs = m.times(&var);
        let rhs = UnitExp::from_unit(&Unit::base("m").times(&Unit::base("s")));
        unify_units(&mut arena, &lhs, &rhs).unwrap();
        let solved = arena.resolve_unit(&var);
        assert_eq!(solved.to_unit().unwrap(), Unit::base("s"));
    }

    #[test]
    fn unit_variable_with_exponent_requires_divisibility() {
        let mut arena = TypeArena::new();
        let var = arena.fresh_unit_var();
        // v^2 ~ m^2  =>  v = m
        unify_units(
            &mut arena,
            &var.raised_to(2),
            &UnitExp::from_unit(&Unit::base("m").raised_to(2)),
        )
        .unwrap();
        assert_eq!(arena.resolve_unit(&var).to_unit().unwrap(), Unit::base("m"));

        let mut arena = TypeArena::new();
        let var = arena.fresh_unit_var();
        // v^2 ~ m has no integer solution
        assert!(unify_units(
            &mut arena,
            &var.raised_to(2),
            &UnitExp::from_unit(&Unit::base("m")),
        )
        .is_err());
    }

    #[test]
    fn unit_occurs_check_rejects_towers() {
        let mut arena = TypeArena::new();
        let var = arena.fresh_unit_var();
        let m = UnitExp::from_unit(&Unit::base("m"));
        // v ~ v*m would require an infinite tower
        assert!(unify_units(&mut arena, &var, &var.times(&m)).is_err());
    }

    #[test]
    fn unify_all_reports_disagreeing_pair() {
        let mut arena = TypeArena::new();
        let types = vec![TypeExp::Text, TypeExp::Text, TypeExp::Bool];
        let (index, _) = unify_all(&mut arena, &types).unwrap_err();
        assert_eq!(index, 2);
    }

    #[test]
    fn record_width_must_match() {
        let mut arena = TypeArena::new();
        let mut narrow = BTreeMap::new();
        narrow.insert("x".to_string(), TypeExp::Text);
        let mut wide = narrow.clone();
        wide.insert("y".to_string(), TypeExp::Bool);
        assert!(unify_types(
            &mut arena,
            &TypeExp::Record(narrow),
            &TypeExp::Record(wide)
        )
        .is_err());
    }
}
