use std::collections::BTreeSet;

use num_traits::ToPrimitive;

use crate::columns::ColumnRefKind;
use crate::expr::{Expr, ExprPath, MatchExpr};
use crate::typeexp::{unify_all, unify_types, TypeExp};
use crate::units::{Unit, UnitExp, UnitSyntax};

use super::{
    Checked, CheckContext, CheckKind, CheckLocation, ConstraintKind, QuickFix, TypeState,
};

impl<'a> CheckContext<'a> {
    /// Check one node. Exactly one arm per expression kind; `None` is the
    /// recorded-error sentinel that makes ancestors stop while siblings
    /// keep being checked.
    pub(crate) fn check(
        &mut self,
        expr: &Expr,
        state: &TypeState,
        kind: CheckKind,
        location: CheckLocation,
        path: &ExprPath,
    ) -> Option<Checked> {
        let checked = self.check_inner(expr, state, kind, location, path);
        if let Some(checked) = &checked {
            self.recorder.record_type(path.clone(), checked.ty.clone());
        }
        checked
    }

    fn check_inner(
        &mut self,
        expr: &Expr,
        state: &TypeState,
        kind: CheckKind,
        location: CheckLocation,
        path: &ExprPath,
    ) -> Option<Checked> {
        match expr {
            Expr::Number { unit, .. } => {
                let ty = match unit {
                    None => TypeExp::Num(UnitExp::one()),
                    Some(syntax) => match syntax.as_unit(self.units) {
                        Ok(unit) => TypeExp::Num(UnitExp::from_unit(&unit)),
                        Err(failure) => {
                            let fixes = unit_name_fixes(expr, path, &failure.suggestions);
                            self.recorder.record(path.clone(), failure.message, fixes);
                            return None;
                        }
                    },
                };
                Some(Checked {
                    ty,
                    state: state.clone(),
                })
            }
            Expr::Text(_) => self.plain(TypeExp::Text, state),
            Expr::Bool(_) => self.plain(TypeExp::Bool, state),
            Expr::Temporal(literal) => self.plain(TypeExp::Date(literal.kind()), state),
            Expr::Column(reference) => match self.columns.get_column(reference) {
                Some(found) => {
                    let ty = match reference.kind {
                        ColumnRefKind::SameRow => found.column_type.clone(),
                        ColumnRefKind::WholeColumn => {
                            TypeExp::Array(Box::new(found.column_type.clone()))
                        }
                    };
                    self.plain(ty, state)
                }
                None => {
                    self.recorder.record(
                        path.clone(),
                        format!("unknown column '{reference}'"),
                        Vec::new(),
                    );
                    None
                }
            },
            Expr::Ident(name) => self.check_ident(name, state, kind, path),
            Expr::ImplicitArg => {
                self.recorder.record(
                    path.clone(),
                    "'?' is only allowed as a call argument",
                    Vec::new(),
                );
                None
            }
            Expr::Call { function, args } => self.check_call(function, args, state, path),
            Expr::Lambda { params, body } => {
                let mut inner = state.clone();
                let mut param_tys = Vec::new();
                let mut ok = true;
                self.push_declared();
                for (index, param) in params.iter().enumerate() {
                    let param_path = path.child(index as u32);
                    match self.check(
                        param,
                        &inner,
                        CheckKind::Pattern,
                        CheckLocation::Default,
                        &param_path,
                    ) {
                        Some(checked) => {
                            inner = checked.state;
                            param_tys.push(checked.ty);
                        }
                        None => ok = false,
                    }
                }
                self.pop_declared();
                let body_path = path.child(params.len() as u32);
                let body = self.check(
                    body,
                    &inner,
                    CheckKind::Expression,
                    CheckLocation::Default,
                    &body_path,
                );
                let body = body?;
                ok.then(|| Checked {
                    ty: TypeExp::Function(param_tys, Box::new(body.ty)),
                    state: state.clone(),
                })
            }
            Expr::And(items) | Expr::Or(items) => {
                let mut ok = true;
                for (index, item) in items.iter().enumerate() {
                    let item_path = path.child(index as u32);
                    match self.check(
                        item,
                        state,
                        CheckKind::Expression,
                        CheckLocation::Default,
                        &item_path,
                    ) {
                        Some(checked) => {
                            self.unify_or_record(&checked.ty, &TypeExp::Bool, &item_path, Vec::new());
                        }
                        None => ok = false,
                    }
                }
                ok.then(|| Checked {
                    ty: TypeExp::Bool,
                    state: state.clone(),
                })
            }
            Expr::AddSubtract { items, .. } => {
                let target = self.arena.fresh_num();
                let ok = self.check_numeric_run(items, &target, state, location, path);
                ok.then(|| Checked {
                    ty: target,
                    state: state.clone(),
                })
            }
            Expr::Times(items) => {
                let mut product = UnitExp::one();
                let mut ok = true;
                for (index, item) in items.iter().enumerate() {
                    let item_path = path.child(index as u32);
                    match self.check(
                        item,
                        state,
                        CheckKind::Expression,
                        CheckLocation::MultiplyDivide,
                        &item_path,
                    ) {
                        Some(checked) => {
                            let unit = self.arena.fresh_unit_var();
                            if self.unify_or_record(
                                &checked.ty,
                                &TypeExp::Num(unit.clone()),
                                &item_path,
                                Vec::new(),
                            ) {
                                product = product.times(&unit);
                            }
                        }
                        None => ok = false,
                    }
                }
                ok.then(|| Checked {
                    ty: TypeExp::Num(product),
                    state: state.clone(),
                })
            }
            Expr::Divide(left, right) => {
                let left_unit = self.arena.fresh_unit_var();
                let right_unit = self.arena.fresh_unit_var();
                let mut ok = true;
                for (index, (item, unit)) in
                    [(left, &left_unit), (right, &right_unit)].into_iter().enumerate()
                {
                    let item_path = path.child(index as u32);
                    match self.check(
                        item,
                        state,
                        CheckKind::Expression,
                        CheckLocation::MultiplyDivide,
                        &item_path,
                    ) {
                        Some(checked) => {
                            self.unify_or_record(
                                &checked.ty,
                                &TypeExp::Num(unit.clone()),
                                &item_path,
                                Vec::new(),
                            );
                        }
                        None => ok = false,
                    }
                }
                ok.then(|| Checked {
                    ty: TypeExp::Num(left_unit.divide(&right_unit)),
                    state: state.clone(),
                })
            }
            Expr::Raise { base, exponent } => self.check_raise(base, exponent, state, path),
            Expr::Comparison { items, .. } => {
                let target = self.arena.fresh_type_var();
                let ok = self.check_compared_run(
                    items,
                    &target,
                    state,
                    CheckLocation::Comparison,
                    path,
                );
                self.constrain(path, target, ConstraintKind::Orderable);
                ok.then(|| Checked {
                    ty: TypeExp::Bool,
                    state: state.clone(),
                })
            }
            Expr::Equal(items) => {
                let target = self.arena.fresh_type_var();
                let ok = self.check_compared_run(items, &target, state, location, path);
                self.constrain(path, target, ConstraintKind::Equatable);
                ok.then(|| Checked {
                    ty: TypeExp::Bool,
                    state: state.clone(),
                })
            }
            Expr::NotEqual(left, right) => {
                let target = self.arena.fresh_type_var();
                let items = [left.as_ref().clone(), right.as_ref().clone()];
                let ok = self.check_compared_run(&items, &target, state, location, path);
                self.constrain(path, target, ConstraintKind::Equatable);
                ok.then(|| Checked {
                    ty: TypeExp::Bool,
                    state: state.clone(),
                })
            }
            Expr::Tolerance { value, epsilon } => {
                if kind != CheckKind::Pattern {
                    self.recorder.record(
                        path.clone(),
                        "'±' is only allowed in a pattern",
                        Vec::new(),
                    );
                    return None;
                }
                let unit = self.arena.fresh_unit_var();
                let num = TypeExp::Num(unit);
                let mut ok = true;
                for (index, item) in [value, epsilon].into_iter().enumerate() {
                    let item_path = path.child(index as u32);
                    match self.check(
                        item,
                        state,
                        CheckKind::Expression,
                        CheckLocation::Default,
                        &item_path,
                    ) {
                        Some(checked) => {
                            self.unify_or_record(&checked.ty, &num, &item_path, Vec::new());
                        }
                        None => ok = false,
                    }
                }
                ok.then(|| Checked {
                    ty: num,
                    state: state.clone(),
                })
            }
            Expr::Tuple(items) => {
                let mut tys = Vec::new();
                let mut inner = state.clone();
                let mut ok = true;
                for (index, item) in items.iter().enumerate() {
                    let item_path = path.child(index as u32);
                    match self.check(item, &inner, kind, CheckLocation::Default, &item_path) {
                        Some(checked) => {
                            inner = checked.state;
                            tys.push(checked.ty);
                        }
                        None => ok = false,
                    }
                }
                ok.then(|| Checked {
                    ty: TypeExp::Tuple(tys),
                    state: inner,
                })
            }
            Expr::Record(fields) => {
                let mut tys = std::collections::BTreeMap::new();
                let mut inner = state.clone();
                let mut ok = true;
                for (index, (name, value)) in fields.iter().enumerate() {
                    let field_path = path.child(index as u32);
                    if tys.contains_key(name) {
                        self.recorder.record(
                            field_path.clone(),
                            format!("duplicate field '{name}'"),
                            Vec::new(),
                        );
                        ok = false;
                        continue;
                    }
                    match self.check(value, &inner, kind, CheckLocation::Default, &field_path) {
                        Some(checked) => {
                            inner = checked.state;
                            tys.insert(name.clone(), checked.ty);
                        }
                        None => ok = false,
                    }
                }
                ok.then(|| Checked {
                    ty: TypeExp::Record(tys),
                    state: inner,
                })
            }
            Expr::Array(items) => {
                let element = self.arena.fresh_type_var();
                let mut inner = state.clone();
                let mut ok = true;
                for (index, item) in items.iter().enumerate() {
                    let item_path = path.child(index as u32);
                    match self.check(item, &inner, kind, CheckLocation::Default, &item_path) {
                        Some(checked) => {
                            inner = checked.state;
                            self.unify_or_record(&checked.ty, &element, &item_path, Vec::new());
                        }
                        None => ok = false,
                    }
                }
                ok.then(|| Checked {
                    ty: TypeExp::Array(Box::new(self.arena.resolve(&element))),
                    state: inner,
                })
            }
            Expr::FieldAccess { base, field } => {
                let base_path = path.child(0);
                let base = self.check(
                    base,
                    state,
                    CheckKind::Expression,
                    CheckLocation::Default,
                    &base_path,
                )?;
                match self.arena.resolve(&base.ty) {
                    TypeExp::Record(fields) => match fields.get(field) {
                        Some(ty) => self.plain(ty.clone(), state),
                        None => {
                            self.recorder.record(
                                path.clone(),
                                format!("no field '{field}' in {}", TypeExp::Record(fields)),
                                Vec::new(),
                            );
                            None
                        }
                    },
                    TypeExp::Var(_) => {
                        self.recorder.record(
                            path.clone(),
                            "field access needs a known record type",
                            Vec::new(),
                        );
                        None
                    }
                    other => {
                        self.recorder.record(
                            path.clone(),
                            format!("cannot access field '{field}' of {other}"),
                            Vec::new(),
                        );
                        None
                    }
                }
            }
            Expr::Tag {
                type_name,
                tag_name,
                argument,
            } => self.check_tag(type_name, tag_name, argument.as_deref(), state, kind, path),
            Expr::Define { definitions, body } => {
                let mut inner = state.clone();
                let mut ok = true;
                let mut child = 0u32;
                for definition in definitions {
                    let pattern_path = path.child(child);
                    let value_path = path.child(child + 1);
                    child += 2;
                    let value = self.check(
                        &definition.value,
                        &inner,
                        CheckKind::Expression,
                        CheckLocation::Default,
                        &value_path,
                    );
                    self.push_declared();
                    let pattern = self.check(
                        &definition.pattern,
                        &inner,
                        CheckKind::Pattern,
                        CheckLocation::Default,
                        &pattern_path,
                    );
                    self.pop_declared();
                    match (pattern, value) {
                        (Some(pattern), Some(value)) => {
                            self.unify_or_record(&pattern.ty, &value.ty, &pattern_path, Vec::new());
                            inner = pattern.state;
                        }
                        _ => ok = false,
                    }
                }
                let body_path = path.child(child);
                let body = self.check(
                    body,
                    &inner,
                    CheckKind::Expression,
                    CheckLocation::Default,
                    &body_path,
                )?;
                ok.then(|| Checked {
                    ty: body.ty,
                    state: state.clone(),
                })
            }
            Expr::Match(match_expr) => self.check_match(match_expr, state, path),
            Expr::MatchAnything => {
                if kind != CheckKind::Pattern {
                    self.recorder.record(
                        path.clone(),
                        "'@anything' is only allowed in a pattern",
                        Vec::new(),
                    );
                    return None;
                }
                let ty = self.arena.fresh_type_var();
                self.plain(ty, state)
            }
            Expr::InvalidOps(_) => {
                self.recorder.record(
                    path.clone(),
                    "operators cannot be mixed without brackets",
                    Vec::new(),
                );
                None
            }
            Expr::Unfinished(text) => {
                self.recorder.record(
                    path.clone(),
                    format!("unfinished expression '{text}'"),
                    Vec::new(),
                );
                None
            }
        }
    }

    fn plain(&mut self, ty: TypeExp, state: &TypeState) -> Option<Checked> {
        Some(Checked {
            ty,
            state: state.clone(),
        })
    }

    fn check_ident(
        &mut self,
        name: &str,
        state: &TypeState,
        kind: CheckKind,
        path: &ExprPath,
    ) -> Option<Checked> {
        if kind == CheckKind::Pattern {
            if self.already_declared(name) {
                self.recorder.record(
                    path.clone(),
                    format!("variable '{name}' is declared twice in this pattern"),
                    Vec::new(),
                );
                return None;
            }
            if state.lookup(name).is_none() {
                // Pattern-as-binder: an unbound name always matches and
                // binds the candidate value.
                let var = self.arena.fresh_type_var();
                self.declare(name);
                return Some(Checked {
                    ty: var.clone(),
                    state: state.with(name, var),
                });
            }
            // A bound name compares for equality instead.
            let checked = self.lookup_candidates(name, state, path)?;
            self.constrain(path, checked.ty.clone(), ConstraintKind::Equatable);
            return Some(checked);
        }
        if state.lookup(name).is_some() {
            return self.lookup_candidates(name, state, path);
        }
        if let Some(def) = self.functions.lookup(name) {
            let ty = def.instantiate(&mut self.arena);
            return self.plain(ty, state);
        }
        let fixes: Vec<QuickFix> = self.columns.fix_for_ident(name, path).into_iter().collect();
        self.recorder.record(
            path.clone(),
            format!("unknown identifier '{name}'"),
            fixes,
        );
        None
    }

    fn lookup_candidates(
        &mut self,
        name: &str,
        state: &TypeState,
        path: &ExprPath,
    ) -> Option<Checked> {
        let candidates = state.lookup(name).cloned().unwrap_or_default();
        match unify_all(&mut self.arena, &candidates) {
            Ok(ty) => self.plain(ty, state),
            Err((_, mismatch)) => {
                self.recorder.record(
                    path.clone(),
                    format!("'{name}' has conflicting candidate types: {mismatch}"),
                    Vec::new(),
                );
                None
            }
        }
    }

    fn check_call(
        &mut self,
        function: &Expr,
        args: &[Expr],
        state: &TypeState,
        path: &ExprPath,
    ) -> Option<Checked> {
        let function_path = path.child(0);
        let function = self.check(
            function,
            state,
            CheckKind::Expression,
            CheckLocation::Default,
            &function_path,
        );
        let mut ok = function.is_some();
        let mut working = state.clone();
        let mut arg_tys = Vec::new();
        let mut param_tys = Vec::new();
        for (index, arg) in args.iter().enumerate() {
            let arg_path = path.child(1 + index as u32);
            if matches!(arg, Expr::ImplicitArg) {
                // A direct `?` turns this call into an implicit lambda;
                // the parameter gets an issued anonymous name.
                let var = self.arena.fresh_type_var();
                let (name, next) = working.issue_anonymous();
                working = next.with(&name, var.clone());
                self.recorder.record_type(arg_path, var.clone());
                param_tys.push(var.clone());
                arg_tys.push(var);
                continue;
            }
            match self.check(
                arg,
                &working,
                CheckKind::Expression,
                CheckLocation::Default,
                &arg_path,
            ) {
                Some(checked) => arg_tys.push(checked.ty),
                None => ok = false,
            }
        }
        if !ok {
            return None;
        }
        let function = function.expect("checked above");
        let result = self.arena.fresh_type_var();
        let wanted = TypeExp::Function(arg_tys, Box::new(result.clone()));
        if !self.unify_or_record(&function.ty, &wanted, path, Vec::new()) {
            return None;
        }
        let ty = if param_tys.is_empty() {
            self.arena.resolve(&result)
        } else {
            TypeExp::Function(param_tys, Box::new(self.arena.resolve(&result)))
        };
        self.plain(ty, state)
    }

    fn check_raise(
        &mut self,
        base: &Expr,
        exponent: &Expr,
        state: &TypeState,
        path: &ExprPath,
    ) -> Option<Checked> {
        let base_path = path.child(0);
        let exponent_path = path.child(1);
        let base = self.check(
            base,
            state,
            CheckKind::Expression,
            CheckLocation::Default,
            &base_path,
        );
        // Only a literal integer exponent can transform units; any other
        // exponent forces a dimensionless base.
        let literal_exponent = match exponent {
            Expr::Number { value, unit: None } if value.fract().is_zero() => value.to_i32(),
            _ => None,
        };
        match literal_exponent {
            Some(power) => {
                self.recorder
                    .record_type(exponent_path, TypeExp::plain_num());
                let base = base?;
                let unit = self.arena.fresh_unit_var();
                if !self.unify_or_record(
                    &base.ty,
                    &TypeExp::Num(unit.clone()),
                    &base_path,
                    Vec::new(),
                ) {
                    return None;
                }
                self.plain(TypeExp::Num(unit.raised_to(power)), state)
            }
            None => {
                let exponent = self.check(
                    exponent,
                    state,
                    CheckKind::Expression,
                    CheckLocation::Default,
                    &exponent_path,
                );
                let mut ok = true;
                if let Some(exponent) = exponent {
                    ok &= self.unify_or_record(
                        &exponent.ty,
                        &TypeExp::plain_num(),
                        &exponent_path,
                        Vec::new(),
                    );
                } else {
                    ok = false;
                }
                let base = base?;
                ok &= self.unify_or_record(&base.ty, &TypeExp::plain_num(), &base_path, Vec::new());
                ok.then(|| Checked {
                    ty: TypeExp::plain_num(),
                    state: state.clone(),
                })
            }
        }
    }

    /// Every operand a number with one shared unit (add/subtract).
    fn check_numeric_run(
        &mut self,
        items: &[Expr],
        target: &TypeExp,
        state: &TypeState,
        location: CheckLocation,
        path: &ExprPath,
    ) -> bool {
        let mut ok = true;
        for (index, item) in items.iter().enumerate() {
            let item_path = path.child(index as u32);
            match self.check(
                item,
                state,
                CheckKind::Expression,
                location,
                &item_path,
            ) {
                Some(checked) => {
                    let fixes = self.mismatch_fixes(item, &item_path, target, location);
                    self.unify_or_record(&checked.ty, target, &item_path, fixes);
                }
                None => ok = false,
            }
        }
        ok
    }

    /// Every operand unified to one type (equality/comparison chains).
    fn check_compared_run(
        &mut self,
        items: &[Expr],
        target: &TypeExp,
        state: &TypeState,
        location: CheckLocation,
        path: &ExprPath,
    ) -> bool {
        let mut ok = true;
        for (index, item) in items.iter().enumerate() {
            let item_path = path.child(index as u32);
            match self.check(item, state, CheckKind::Expression, location, &item_path) {
                Some(checked) => {
                    let fixes = self.mismatch_fixes(item, &item_path, target, location);
                    ok &= self.unify_or_record(&checked.ty, target, &item_path, fixes);
                }
                None => ok = false,
            }
        }
        ok
    }

    fn check_tag(
        &mut self,
        type_name: &str,
        tag_name: &str,
        argument: Option<&Expr>,
        state: &TypeState,
        kind: CheckKind,
        path: &ExprPath,
    ) -> Option<Checked> {
        let Some(def) = self.types.lookup_tag(type_name) else {
            self.recorder.record(
                path.clone(),
                format!("unknown tagged type '{type_name}'"),
                Vec::new(),
            );
            return None;
        };
        let Some(variant) = def.variant(tag_name).cloned() else {
            self.recorder.record(
                path.clone(),
                format!("type '{type_name}' has no tag '{tag_name}'"),
                Vec::new(),
            );
            return None;
        };
        match (&variant.payload, argument) {
            (Some(payload), Some(argument)) => {
                let argument_path = path.child(0);
                let checked = self.check(argument, state, kind, CheckLocation::Default, &argument_path)?;
                if !self.unify_or_record(&checked.ty, payload, &argument_path, Vec::new()) {
                    return None;
                }
                Some(Checked {
                    ty: def.as_type(),
                    state: checked.state,
                })
            }
            (Some(payload), None) => self.plain(
                TypeExp::Function(vec![payload.clone()], Box::new(def.as_type())),
                state,
            ),
            (None, None) => self.plain(def.as_type(), state),
            (None, Some(_)) => {
                self.recorder.record(
                    path.clone(),
                    format!("tag '{tag_name}' does not take an inner value"),
                    Vec::new(),
                );
                None
            }
        }
    }

    fn check_match(
        &mut self,
        match_expr: &MatchExpr,
        state: &TypeState,
        path: &ExprPath,
    ) -> Option<Checked> {
        let subject_path = path.child(0);
        let subject = self.check(
            &match_expr.subject,
            state,
            CheckKind::Expression,
            CheckLocation::Default,
            &subject_path,
        );
        let mut ok = subject.is_some();
        let subject_ty = match &subject {
            Some(checked) => checked.ty.clone(),
            None => self.arena.fresh_type_var(),
        };
        if match_expr.clauses.is_empty() {
            self.recorder.record(
                path.clone(),
                "a match needs at least one clause",
                Vec::new(),
            );
            return None;
        }

        let mut outcome_tys = Vec::new();
        let mut outcome_paths = Vec::new();
        let mut child = 1u32;
        for clause in &match_expr.clauses {
            if clause.patterns.is_empty() {
                self.recorder.record(
                    path.clone(),
                    "a clause needs at least one pattern",
                    Vec::new(),
                );
                ok = false;
            }
            let mut alternatives: Vec<(TypeState, BTreeSet<String>)> = Vec::new();
            for entry in &clause.patterns {
                let pattern_path = path.child(child);
                child += 1;
                self.push_declared();
                let pattern = self.check(
                    &entry.pattern,
                    state,
                    CheckKind::Pattern,
                    CheckLocation::Default,
                    &pattern_path,
                );
                let declared: BTreeSet<String> = self.pop_declared().into_iter().collect();
                match pattern {
                    Some(pattern) => {
                        let fixes = self.mismatch_fixes(
                            &entry.pattern,
                            &pattern_path,
                            &subject_ty,
                            CheckLocation::Default,
                        );
                        self.unify_or_record(&pattern.ty, &subject_ty, &pattern_path, fixes);
                        if !matches!(entry.pattern, Expr::MatchAnything) && declared.is_empty() {
                            // Compared rather than purely bound, so its
                            // values will need equality support.
                            self.constrain(
                                &pattern_path,
                                pattern.ty.clone(),
                                ConstraintKind::Equatable,
                            );
                        }
                        if let Some(guard) = &entry.guard {
                            let guard_path = path.child(child);
                            child += 1;
                            match self.check(
                                guard,
                                &pattern.state,
                                CheckKind::Expression,
                                CheckLocation::Default,
                                &guard_path,
                            ) {
                                Some(checked) => {
                                    self.unify_or_record(
                                        &checked.ty,
                                        &TypeExp::Bool,
                                        &guard_path,
                                        Vec::new(),
                                    );
                                }
                                None => ok = false,
                            }
                        }
                        alternatives.push((pattern.state, declared));
                    }
                    None => {
                        ok = false;
                        if entry.guard.is_some() {
                            child += 1;
                        }
                    }
                }
            }
            // Alternative patterns of one clause must agree on what they
            // declare; the outcome sees the first alternative's bindings.
            if let Some((first_state, first_set)) = alternatives.first() {
                for (other_state, other_set) in alternatives.iter().skip(1) {
                    if other_set != first_set {
                        self.recorder.record(
                            path.clone(),
                            "alternative patterns must declare the same variables",
                            Vec::new(),
                        );
                        ok = false;
                        continue;
                    }
                    for name in first_set {
                        let (Some(a), Some(b)) =
                            (first_state.lookup(name), other_state.lookup(name))
                        else {
                            continue;
                        };
                        if let (Some(a), Some(b)) = (a.first().cloned(), b.first().cloned()) {
                            if let Err(mismatch) = unify_types(&mut self.arena, &a, &b) {
                                self.recorder.record(
                                    path.clone(),
                                    format!("variable '{name}' differs between patterns: {mismatch}"),
                                    Vec::new(),
                                );
                                ok = false;
                            }
                        }
                    }
                }
            }
            let outcome_path = path.child(child);
            child += 1;
            let outcome_state = alternatives
                .first()
                .map(|(state, _)| state.clone())
                .unwrap_or_else(|| state.clone());
            match self.check(
                &clause.outcome,
                &outcome_state,
                CheckKind::Expression,
                CheckLocation::Default,
                &outcome_path,
            ) {
                Some(checked) => {
                    outcome_tys.push(checked.ty);
                    outcome_paths.push(outcome_path);
                }
                None => ok = false,
            }
        }
        let result = match unify_all(&mut self.arena, &outcome_tys) {
            Ok(ty) => ty,
            Err((index, mismatch)) => {
                let at = outcome_paths
                    .get(index)
                    .cloned()
                    .unwrap_or_else(|| path.clone());
                self.recorder.record(
                    at,
                    format!("clause outcomes have different types: {mismatch}"),
                    Vec::new(),
                );
                return None;
            }
        };
        ok.then(|| Checked {
            ty: result,
            state: state.clone(),
        })
    }

    fn unify_or_record(
        &mut self,
        found: &TypeExp,
        expected: &TypeExp,
        path: &ExprPath,
        fixes: Vec<QuickFix>,
    ) -> bool {
        match unify_types(&mut self.arena, expected, found) {
            Ok(()) => true,
            Err(mismatch) => {
                self.recorder.record(path.clone(), mismatch.to_string(), fixes);
                false
            }
        }
    }

    /// Unit quick-fixes for a mismatch at `item`: offered only outside
    /// multiply/divide contexts, and only for numeric literals whose unit
    /// annotation can simply be rewritten to the expected one.
    fn mismatch_fixes(
        &mut self,
        item: &Expr,
        item_path: &ExprPath,
        expected: &TypeExp,
        location: CheckLocation,
    ) -> Vec<QuickFix> {
        if location == CheckLocation::MultiplyDivide {
            return Vec::new();
        }
        let Expr::Number { value, unit: Some(_) } = item else {
            return Vec::new();
        };
        let TypeExp::Num(expected_unit) = self.arena.resolve(expected) else {
            return Vec::new();
        };
        let Some(expected_unit) = expected_unit.to_unit() else {
            return Vec::new();
        };
        let value = *value;
        let syntax = syntax_of_unit(&expected_unit);
        let title = if expected_unit.is_scalar() {
            "remove the unit".to_string()
        } else {
            format!("change unit to {{{expected_unit}}}")
        };
        vec![QuickFix::new(title, item_path.clone(), move || {
            Expr::Number {
                value,
                unit: syntax.clone(),
            }
        })]
    }

    fn push_declared(&mut self) {
        self.declared.push(Vec::new());
    }

    fn pop_declared(&mut self) -> Vec<String> {
        self.declared.pop().unwrap_or_default()
    }

    fn declare(&mut self, name: &str) {
        if let Some(top) = self.declared.last_mut() {
            top.push(name.to_string());
        }
    }

    fn already_declared(&self, name: &str) -> bool {
        self.declared
            .last()
            .is_some_and(|top| top.iter().any(|declared| declared == name))
    }
}

fn unit_name_fixes(expr: &Expr, path: &ExprPath, suggestions: &[String]) -> Vec<QuickFix> {
    let Expr::Number { value, .. } = expr else {
        return Vec::new();
    };
    let value = *value;
    suggestions
        .iter()
        .map(|suggestion| {
            let name = suggestion.clone();
            QuickFix::new(
                format!("change unit to {{{name}}}"),
                path.clone(),
                move || Expr::Number {
                    value,
                    unit: Some(UnitSyntax::Name(name.clone())),
                },
            )
        })
        .collect()
}

/// The surface syntax that denotes `unit`; `None` for the scalar unit
/// (meaning: drop the annotation). Negative powers render as `s^-1`,
/// which the unit grammar reads back directly.
fn syntax_of_unit(unit: &Unit) -> Option<UnitSyntax> {
    let mut parts: Vec<UnitSyntax> = unit
        .powers()
        .iter()
        .map(|(name, power)| {
            let base = UnitSyntax::Name(name.clone());
            if *power == 1 {
                base
            } else {
                UnitSyntax::Power(Box::new(base), *power)
            }
        })
        .collect();
    match parts.len() {
        0 => None,
        1 => parts.pop(),
        _ => Some(UnitSyntax::Product(parts)),
    }
}
