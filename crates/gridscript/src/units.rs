use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

/// A resolved unit: named base units raised to non-zero integer powers.
/// Units form a commutative group under multiplication; the empty map is
/// the scalar (dimensionless) unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Unit {
    powers: BTreeMap<String, i32>,
}

impl Unit {
    pub fn scalar() -> Self {
        Self::default()
    }

    pub fn base(name: impl Into<String>) -> Self {
        let mut powers = BTreeMap::new();
        powers.insert(name.into(), 1);
        Self { powers }
    }

    pub fn from_powers(entries: impl IntoIterator<Item = (String, i32)>) -> Self {
        let mut powers = BTreeMap::new();
        for (name, power) in entries {
            let entry = powers.entry(name).or_insert(0);
            *entry += power;
        }
        powers.retain(|_, power| *power != 0);
        Self { powers }
    }

    pub fn is_scalar(&self) -> bool {
        self.powers.is_empty()
    }

    pub fn powers(&self) -> &BTreeMap<String, i32> {
        &self.powers
    }

    pub fn times(&self, other: &Unit) -> Unit {
        let mut powers = self.powers.clone();
        for (name, power) in &other.powers {
            let entry = powers.entry(name.clone()).or_insert(0);
            *entry += power;
        }
        powers.retain(|_, power| *power != 0);
        Unit { powers }
    }

    pub fn divide(&self, other: &Unit) -> Unit {
        self.times(&other.reciprocal())
    }

    pub fn reciprocal(&self) -> Unit {
        Unit {
            powers: self
                .powers
                .iter()
                .map(|(name, power)| (name.clone(), -power))
                .collect(),
        }
    }

    pub fn raised_to(&self, exponent: i32) -> Unit {
        if exponent == 0 {
            return Unit::scalar();
        }
        Unit {
            powers: self
                .powers
                .iter()
                .map(|(name, power)| (name.clone(), power * exponent))
                .collect(),
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_powers(f, self.powers.iter().map(|(n, p)| (n.clone(), *p)))
    }
}

fn write_powers(
    f: &mut fmt::Formatter<'_>,
    powers: impl Iterator<Item = (String, i32)>,
) -> fmt::Result {
    let mut numerator = Vec::new();
    let mut denominator = Vec::new();
    for (name, power) in powers {
        if power > 0 {
            numerator.push((name, power));
        } else {
            denominator.push((name, -power));
        }
    }
    if numerator.is_empty() && denominator.is_empty() {
        return write!(f, "1");
    }
    let render = |parts: &[(String, i32)]| {
        parts
            .iter()
            .map(|(name, power)| {
                if *power == 1 {
                    name.clone()
                } else {
                    format!("{name}^{power}")
                }
            })
            .collect::<Vec<_>>()
            .join("*")
    };
    if numerator.is_empty() {
        write!(f, "1/{}", render(&denominator))
    } else if denominator.is_empty() {
        write!(f, "{}", render(&numerator))
    } else {
        write!(f, "{}/{}", render(&numerator), render(&denominator))
    }
}

/// Index of a unit variable cell in the checking arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UnitVarId(pub(crate) u32);

impl fmt::Display for UnitVarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "u{}", self.0)
    }
}

/// Inference-time unit expression: a normalized product of base units and
/// unresolved unit variables, each with an integer exponent. Zero exponents
/// are never stored, so two equal products compare equal structurally.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UnitExp {
    pub(crate) vars: BTreeMap<UnitVarId, i32>,
    pub(crate) bases: BTreeMap<String, i32>,
}

impl UnitExp {
    pub fn one() -> Self {
        Self::default()
    }

    pub fn from_unit(unit: &Unit) -> Self {
        Self {
            vars: BTreeMap::new(),
            bases: unit.powers().clone(),
        }
    }

    pub fn var(id: UnitVarId) -> Self {
        let mut vars = BTreeMap::new();
        vars.insert(id, 1);
        Self {
            vars,
            bases: BTreeMap::new(),
        }
    }

    pub fn is_one(&self) -> bool {
        self.vars.is_empty() && self.bases.is_empty()
    }

    pub fn has_vars(&self) -> bool {
        !self.vars.is_empty()
    }

    pub fn contains_var(&self, id: UnitVarId) -> bool {
        self.vars.contains_key(&id)
    }

    pub fn times(&self, other: &UnitExp) -> UnitExp {
        let mut out = self.clone();
        for (id, power) in &other.vars {
            let entry = out.vars.entry(*id).or_insert(0);
            *entry += power;
        }
        for (name, power) in &other.bases {
            let entry = out.bases.entry(name.clone()).or_insert(0);
            *entry += power;
        }
        out.normalize();
        out
    }

    pub fn divide(&self, other: &UnitExp) -> UnitExp {
        self.times(&other.reciprocal())
    }

    pub fn reciprocal(&self) -> UnitExp {
        UnitExp {
            vars: self.vars.iter().map(|(id, p)| (*id, -p)).collect(),
            bases: self.bases.iter().map(|(n, p)| (n.clone(), -p)).collect(),
        }
    }

    pub fn raised_to(&self, exponent: i32) -> UnitExp {
        if exponent == 0 {
            return UnitExp::one();
        }
        UnitExp {
            vars: self.vars.iter().map(|(id, p)| (*id, p * exponent)).collect(),
            bases: self
                .bases
                .iter()
                .map(|(n, p)| (n.clone(), p * exponent))
                .collect(),
        }
    }

    /// Every exponent divided by `divisor`; `None` when any exponent is not
    /// an exact multiple (unit unification needs exact integer solutions).
    pub(crate) fn root(&self, divisor: i32) -> Option<UnitExp> {
        if divisor == 0 {
            return None;
        }
        let mut out = UnitExp::one();
        for (id, power) in &self.vars {
            if power % divisor != 0 {
                return None;
            }
            out.vars.insert(*id, power / divisor);
        }
        for (name, power) in &self.bases {
            if power % divisor != 0 {
                return None;
            }
            out.bases.insert(name.clone(), power / divisor);
        }
        Some(out)
    }

    /// The resolved `Unit`, if no variables remain.
    pub fn to_unit(&self) -> Option<Unit> {
        if self.has_vars() {
            return None;
        }
        Some(Unit::from_powers(
            self.bases.iter().map(|(n, p)| (n.clone(), *p)),
        ))
    }

    fn normalize(&mut self) {
        self.vars.retain(|_, power| *power != 0);
        self.bases.retain(|_, power| *power != 0);
    }
}

impl fmt::Display for UnitExp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let vars = self.vars.iter().map(|(id, p)| (id.to_string(), *p));
        let bases = self.bases.iter().map(|(n, p)| (n.clone(), *p));
        write_powers(f, bases.chain(vars))
    }
}

/// A unit expression as written in source, before resolution against the
/// registry: `m`, `m*s`, `m/s^2`, `s^2`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum UnitSyntax {
    Name(String),
    Product(Vec<UnitSyntax>),
    Quotient(Box<UnitSyntax>, Box<UnitSyntax>),
    Power(Box<UnitSyntax>, i32),
}

impl UnitSyntax {
    /// Resolve against the registry. Unknown names fail with the nearest
    /// registered names as recovery suggestions.
    pub fn as_unit(&self, units: &dyn UnitManager) -> Result<Unit, UnitResolveFailure> {
        match self {
            UnitSyntax::Name(name) => units.lookup(name).map_err(|err| UnitResolveFailure {
                message: err.to_string(),
                suggestions: suggest_unit_names(name, units),
            }),
            UnitSyntax::Product(parts) => {
                let mut unit = Unit::scalar();
                for part in parts {
                    unit = unit.times(&part.as_unit(units)?);
                }
                Ok(unit)
            }
            UnitSyntax::Quotient(numerator, denominator) => Ok(numerator
                .as_unit(units)?
                .divide(&denominator.as_unit(units)?)),
            UnitSyntax::Power(base, exponent) => Ok(base.as_unit(units)?.raised_to(*exponent)),
        }
    }
}

impl fmt::Display for UnitSyntax {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitSyntax::Name(name) => write!(f, "{name}"),
            UnitSyntax::Product(parts) => {
                let rendered: Vec<String> = parts.iter().map(|p| p.to_string()).collect();
                write!(f, "{}", rendered.join("*"))
            }
            UnitSyntax::Quotient(numerator, denominator) => {
                write!(f, "{numerator}/{denominator}")
            }
            UnitSyntax::Power(base, exponent) => write!(f, "{base}^{exponent}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UnitLookupError {
    #[error("unknown unit name '{0}'")]
    Unknown(String),
}

/// Failure to resolve a surface unit expression, with recovery suggestions
/// (nearest registered unit names) for quick-fix construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitResolveFailure {
    pub message: String,
    pub suggestions: Vec<String>,
}

/// Registry of named units; consumed by the checker, provided by the host.
pub trait UnitManager {
    fn lookup(&self, name: &str) -> Result<Unit, UnitLookupError>;
    fn known_unit_names(&self) -> Vec<String>;
}

/// Straightforward in-memory registry. Aliases resolve to the unit they
/// were registered against, so `metre` and `m` can share one base unit.
#[derive(Debug, Clone, Default)]
pub struct UnitRegistry {
    units: BTreeMap<String, Unit>,
}

impl UnitRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_base(&mut self, name: &str) {
        self.units.insert(name.to_string(), Unit::base(name));
    }

    pub fn register(&mut self, name: &str, unit: Unit) {
        self.units.insert(name.to_string(), unit);
    }
}

impl UnitManager for UnitRegistry {
    fn lookup(&self, name: &str) -> Result<Unit, UnitLookupError> {
        self.units
            .get(name)
            .cloned()
            .ok_or_else(|| UnitLookupError::Unknown(name.to_string()))
    }

    fn known_unit_names(&self) -> Vec<String> {
        self.units.keys().cloned().collect()
    }
}

fn suggest_unit_names(name: &str, units: &dyn UnitManager) -> Vec<String> {
    let mut scored: Vec<(usize, String)> = units
        .known_unit_names()
        .into_iter()
        .filter_map(|known| {
            let dist = edit_distance(name, &known);
            (dist <= name.len().max(2) / 2 + 1).then_some((dist, known))
        })
        .collect();
    scored.sort();
    scored.into_iter().map(|(_, name)| name).collect()
}

fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            current[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(current[j] + 1);
        }
        std::mem::swap(&mut prev, &mut current);
    }
    prev[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_group_laws() {
        let m = Unit::base("m");
        let s = Unit::base("s");
        let speed = m.divide(&s);
        assert_eq!(speed.times(&s), m);
        assert_eq!(speed.times(&speed.reciprocal()), Unit::scalar());
        assert_eq!(m.raised_to(2).divide(&m), m);
        assert_eq!(m.raised_to(0), Unit::scalar());
    }

    #[test]
    fn unit_display() {
        let m = Unit::base("m");
        let s = Unit::base("s");
        assert_eq!(m.divide(&s.raised_to(2)).to_string(), "m/s^2");
        assert_eq!(Unit::scalar().to_string(), "1");
        assert_eq!(s.reciprocal().to_string(), "1/s");
    }

    #[test]
    fn resolves_compound_unit_syntax() {
        let mut registry = UnitRegistry::new();
        registry.register_base("m");
        registry.register_base("s");
        let syntax = UnitSyntax::Quotient(
            Box::new(UnitSyntax::Name("m".to_string())),
            Box::new(UnitSyntax::Power(
                Box::new(UnitSyntax::Name("s".to_string())),
                2,
            )),
        );
        let unit = syntax.as_unit(&registry).unwrap();
        assert_eq!(unit, Unit::base("m").divide(&Unit::base("s").raised_to(2)));
    }

    #[test]
    fn unknown_unit_suggests_near_names() {
        let mut registry = UnitRegistry::new();
        registry.register_base("m");
        registry.register_base("s");
        registry.register("metre", Unit::base("m"));
        let failure = UnitSyntax::Name("meter".to_string())
            .as_unit(&registry)
            .unwrap_err();
        assert!(failure.suggestions.contains(&"metre".to_string()));
    }
}
