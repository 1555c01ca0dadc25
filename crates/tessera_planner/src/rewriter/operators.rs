use tessera_error::{DbError, ErrorKind, Result};
use tessera_types::field_type::MAX_FSP;
use tessera_types::{Datum, EvalType, FieldType, MysqlType, Time};

use super::ExpressionRewriter;
use crate::ast::build::default_type_for_value;
use crate::ast::{BinaryOp, ColumnName, UnaryOp, VariableExpr};
use crate::builder::{Clause, ColumnDefault};
use crate::expr::eval::{EmptyRow, constant, like_exact_pattern};
use crate::expr::function::{FuncName, new_function, new_function_base};
use crate::expr::{
    Constant,
    CorrelatedColumn,
    Expression,
    bool_type,
    check_args_not_multi_column_row,
    compose_cnf,
    compose_dnf,
    null,
};
use crate::logical::LogicalOperator;

fn binary_func_name(op: BinaryOp) -> FuncName {
    match op {
        BinaryOp::LogicAnd => FuncName::LogicAnd,
        BinaryOp::LogicOr => FuncName::LogicOr,
        BinaryOp::LogicXor => FuncName::LogicXor,
        BinaryOp::Eq => FuncName::Eq,
        BinaryOp::NotEq => FuncName::Ne,
        BinaryOp::NullEq => FuncName::NullEq,
        BinaryOp::Lt => FuncName::Lt,
        BinaryOp::LtEq => FuncName::Le,
        BinaryOp::Gt => FuncName::Gt,
        BinaryOp::GtEq => FuncName::Ge,
        BinaryOp::Plus => FuncName::Plus,
        BinaryOp::Minus => FuncName::Minus,
        BinaryOp::Mul => FuncName::Mul,
        BinaryOp::Div => FuncName::Div,
        BinaryOp::IntDiv => FuncName::IntDiv,
        BinaryOp::Mod => FuncName::Mod,
        BinaryOp::BitAnd => FuncName::BitAnd,
        BinaryOp::BitOr => FuncName::BitOr,
        BinaryOp::BitXor => FuncName::BitXor,
    }
}

pub(super) fn comparison_func_name(op: BinaryOp) -> Result<FuncName> {
    if !op.is_comparison() {
        return Err(DbError::new(format!("'{op}' is not a comparison operator")));
    }
    Ok(binary_func_name(op))
}

fn incorrect_param_count(name: &str) -> DbError {
    DbError::with_kind(
        ErrorKind::IncorrectParameterCount,
        format!("Incorrect parameter count in the call to native function '{name}'"),
    )
}

fn no_default_value(column: &str) -> DbError {
    DbError::with_kind(
        ErrorKind::NoDefaultValue,
        format!("Field '{column}' doesn't have a default value"),
    )
}

impl ExpressionRewriter<'_, '_> {
    /// Compare `l` and `r` with `op`, expanding row operands element-wise.
    ///
    /// Row equality is the conjunction of element equalities and row
    /// inequality the disjunction. Ordering comparisons compare the first
    /// pair of elements that differ, yielding NULL if that pair can't be
    /// decided.
    pub(super) fn construct_binary_op_function(
        &self,
        l: Expression,
        r: Expression,
        op: FuncName,
    ) -> Result<Expression> {
        let (l_len, r_len) = (l.row_len(), r.row_len());
        if l_len == 1 && r_len == 1 {
            return self.new_function(op, bool_type(), vec![l, r]);
        }
        if l_len != r_len {
            return Err(DbError::operand_columns(l_len));
        }
        match op {
            FuncName::Eq | FuncName::Ne | FuncName::NullEq => {
                let mut funcs = Vec::with_capacity(l_len);
                for idx in 0..l_len {
                    funcs.push(self.construct_binary_op_function(
                        l.row_arg(idx)?.clone(),
                        r.row_arg(idx)?.clone(),
                        op,
                    )?);
                }
                if op == FuncName::Ne {
                    compose_dnf(funcs)
                } else {
                    compose_cnf(funcs)
                }
            }
            _ => {
                let l0 = l.row_arg(0)?.clone();
                let r0 = r.row_arg(0)?.clone();
                let differ = new_function(FuncName::Ne, bool_type(), vec![l0.clone(), r0.clone()])?;
                let cmp_first = new_function(op, bool_type(), vec![l0, r0])?;
                let undecided = new_function(FuncName::IsNull, bool_type(), vec![differ.clone()])?;
                let cmp_rest = self.construct_binary_op_function(
                    l.pop_row_first_arg()?,
                    r.pop_row_first_arg()?,
                    op,
                )?;
                let rest = self.new_function(FuncName::If, bool_type(), vec![undecided, null(), cmp_rest])?;
                self.new_function(FuncName::If, bool_type(), vec![differ, cmp_first, rest])
            }
        }
    }

    fn not_to_expression(
        &self,
        not: bool,
        name: FuncName,
        ret_type: FieldType,
        args: Vec<Expression>,
    ) -> Result<Expression> {
        let func = self.new_function(name, ret_type.clone(), args)?;
        if !not {
            return Ok(func);
        }
        self.new_function(FuncName::UnaryNot, ret_type, vec![func])
    }

    pub(super) fn to_column(&mut self, name: &ColumnName) -> Result<()> {
        let field_list = Clause::FieldList.to_string();
        if let Some(col) = self.schema.find_column(name, &field_list)? {
            let col = col.clone();
            self.push(Expression::Column(col));
            return Ok(());
        }
        let mut outer_col = None;
        for schema in self.builder.outer_schemas.iter().rev() {
            if let Some(col) = schema.find_column(name, &field_list)? {
                outer_col = Some(col.clone());
                break;
            }
        }
        if let Some(col) = outer_col {
            self.push(Expression::CorrelatedColumn(CorrelatedColumn::new(col)));
            return Ok(());
        }
        if let (LogicalOperator::UnionAll(_), Some(table)) = (&self.plan, &name.table) {
            return Err(DbError::with_kind(
                ErrorKind::TablenameNotAllowedHere,
                format!(
                    "Table '{table}' from one of the SELECTs cannot be used in {}",
                    self.builder.cur_clause
                ),
            ));
        }
        if self.builder.cur_clause == Clause::GlobalOrderBy {
            self.builder.cur_clause = Clause::OrderBy;
        }
        Err(DbError::unknown_column(name, &self.builder.cur_clause.to_string()))
    }

    pub(super) fn param_marker(&mut self, order: usize) -> Result<()> {
        let value = self
            .builder
            .session
            .prepared_params
            .get(order)
            .cloned()
            .ok_or_else(|| {
                DbError::with_kind(
                    ErrorKind::IncorrectParameterCount,
                    "Incorrect arguments to EXECUTE",
                )
                .with_field("param", order)
            })?;
        let ret_type = default_type_for_value(&value);
        let mut param = Constant::new(value, ret_type.clone());
        if self.builder.session.use_plan_cache {
            let get_param = new_function_base(
                FuncName::GetParam,
                ret_type,
                vec![constant(
                    Datum::Int64(order as i64),
                    FieldType::new(MysqlType::LongLong),
                )],
            )?;
            param.deferred = Some(Box::new(get_param));
        }
        self.push(Expression::Constant(param));
        Ok(())
    }

    pub(super) fn rewrite_variable(&mut self, var: &VariableExpr) -> Result<()> {
        let name = var.name.to_ascii_lowercase();
        let name_const = constant(Datum::from(name.as_str()), FieldType::new(MysqlType::VarString));
        if !var.is_system {
            if var.value.is_some() {
                let value = self.pop()?;
                let ret_type = value.ret_type().clone();
                let func = self.new_function(FuncName::SetVar, ret_type, vec![name_const, value])?;
                self.push(func);
                return Ok(());
            }
            let func = self.new_function(
                FuncName::GetVar,
                FieldType::new(MysqlType::VarString),
                vec![name_const],
            )?;
            self.push(func);
            return Ok(());
        }

        let sys_var = self.builder.vars.system_var(&name).ok_or_else(|| {
            DbError::with_kind(
                ErrorKind::UnknownSystemVariable,
                format!("Unknown system variable '{name}'"),
            )
        })?;
        let value = sys_var.value(var.is_global, var.explicit_scope)?;
        let ret_type = default_type_for_value(&value);
        self.push(constant(value, ret_type));
        Ok(())
    }

    pub(super) fn func_call_to_expression(&mut self, name: &str, num_args: usize) -> Result<()> {
        let func = FuncName::from_name(name).ok_or_else(|| {
            let db = &self.builder.session.current_db;
            let qualified = if db.is_empty() {
                name.to_string()
            } else {
                format!("{db}.{name}")
            };
            DbError::with_kind(
                ErrorKind::FunctionNotExists,
                format!("FUNCTION {qualified} does not exist"),
            )
        })?;
        let mut args = self.pop_n(num_args)?;
        check_args_not_multi_column_row(&args)?;

        match func {
            FuncName::Ifnull => {
                if args.len() != 2 {
                    return Err(incorrect_param_count(name));
                }
                // A NOT NULL column never takes the fallback.
                if let Expression::Column(col) = &args[0] {
                    if col.ret_type.has_not_null_flag() {
                        let mut col = col.clone();
                        col.is_referenced = true;
                        self.push(Expression::Column(col));
                        return Ok(());
                    }
                }
            }
            FuncName::Nullif => {
                if args.len() != 2 {
                    return Err(incorrect_param_count(name));
                }
                let (Some(p2), Some(p1)) = (args.pop(), args.pop()) else {
                    return Err(incorrect_param_count(name));
                };
                let ret_type = p1.ret_type().clone();
                let cond = self.construct_binary_op_function(p1.clone(), p2, FuncName::Eq)?;
                let func = self.new_function(FuncName::If, ret_type, vec![cond, null(), p1])?;
                self.push(func);
                return Ok(());
            }
            _ => (),
        }

        if func.is_deferred() {
            let ret_type = crate::expr::function::infer_return_type(func, &args);
            let deferred = new_function_base(func, ret_type.clone(), args)?;
            if self.builder.session.use_plan_cache {
                self.push(Expression::Constant(Constant {
                    value: Datum::Null,
                    ret_type,
                    deferred: Some(Box::new(deferred)),
                }));
                return Ok(());
            }
            let all_constant = {
                let mut all = true;
                deferred.for_each_child(&mut |arg| {
                    all &= arg.as_plain_constant().is_some();
                    Ok(())
                })?;
                all
            };
            if all_constant {
                // Statement time is fixed when the plan is built.
                let value = deferred.eval(&self.builder.eval_context(), &EmptyRow)?;
                self.push(constant(value, ret_type));
            } else {
                self.push(deferred);
            }
            return Ok(());
        }

        let func = self.new_function_inferred(func, args)?;
        self.push(func);
        Ok(())
    }

    pub(super) fn unary_op_to_expression(&mut self, op: UnaryOp) -> Result<()> {
        let name = match op {
            // `+a` is `a`.
            UnaryOp::Plus => return Ok(()),
            UnaryOp::Minus => FuncName::UnaryMinus,
            UnaryOp::BitNeg => FuncName::BitNeg,
            UnaryOp::Not => FuncName::UnaryNot,
        };
        if self.top()?.row_len() != 1 {
            return Err(DbError::operand_columns(1));
        }
        let arg = self.pop()?;
        let func = self.new_function_inferred(name, vec![arg])?;
        self.push(func);
        Ok(())
    }

    pub(super) fn binary_op_to_expression(&mut self, op: BinaryOp) -> Result<()> {
        let args = self.pop_n(2)?;
        let name = binary_func_name(op);
        let func = if op.is_comparison() {
            let [l, r]: [Expression; 2] = args
                .try_into()
                .map_err(|_| DbError::new("Expected two operands"))?;
            self.construct_binary_op_function(l, r, name)?
        } else {
            check_args_not_multi_column_row(&args)?;
            self.new_function_inferred(name, args)?
        };
        self.push(func);
        Ok(())
    }

    pub(super) fn between_to_expression(&mut self, not: bool) -> Result<()> {
        let args = self.pop_n(3)?;
        check_args_not_multi_column_row(&args)?;
        let [expr, low, high]: [Expression; 3] = args
            .try_into()
            .map_err(|_| DbError::new("Expected three operands"))?;

        let ge = self.new_function(FuncName::Ge, bool_type(), vec![expr.clone(), low])?;
        let le = self.new_function(FuncName::Le, bool_type(), vec![expr, high])?;
        let func = self.not_to_expression(not, FuncName::LogicAnd, bool_type(), vec![ge, le])?;
        self.push(func);
        Ok(())
    }

    pub(super) fn case_to_expression(
        &mut self,
        has_value: bool,
        num_whens: usize,
        has_else: bool,
    ) -> Result<()> {
        let items = self.pop_n(2 * num_whens + has_else as usize)?;
        check_args_not_multi_column_row(&items)?;

        let args = if has_value {
            // CASE v WHEN w THEN r ... becomes CASE WHEN v = w THEN r ...
            let value = self.pop()?;
            let mut args = Vec::with_capacity(items.len());
            let mut items = items.into_iter();
            for _ in 0..num_whens {
                let (Some(when), Some(then)) = (items.next(), items.next()) else {
                    return Err(DbError::new("Incomplete WHEN clause"));
                };
                args.push(self.new_function(FuncName::Eq, bool_type(), vec![value.clone(), when])?);
                args.push(then);
            }
            args.extend(items);
            args
        } else {
            items
        };

        let func = self.new_function_inferred(FuncName::Case, args)?;
        self.push(func);
        Ok(())
    }

    pub(super) fn cast_to_expression(&mut self, target: &FieldType) -> Result<()> {
        self.top()?.check_not_multi_column_row()?;
        if target.eval_type() == EvalType::Duration && target.decimal > MAX_FSP {
            return Err(DbError::with_kind(
                ErrorKind::TooBigPrecision,
                format!(
                    "Too-big precision {} specified for 'CAST'. Maximum is {MAX_FSP}",
                    target.decimal
                ),
            ));
        }
        let arg = self.pop()?;
        let func = self.new_function(FuncName::Cast, target.clone(), vec![arg])?;
        self.push(func);
        Ok(())
    }

    pub(super) fn like_to_expression(&mut self, escape: char, not: bool) -> Result<()> {
        let args = self.pop_n(2)?;
        check_args_not_multi_column_row(&args)?;
        let [expr, pattern]: [Expression; 2] = args
            .try_into()
            .map_err(|_| DbError::new("Expected two operands"))?;

        // A pattern without wildcards is plain equality.
        let exact = match pattern.as_plain_constant() {
            Some(Datum::String(s)) => like_exact_pattern(s, escape),
            _ => None,
        };
        let func = match exact {
            Some(exact) => {
                let op = if not { FuncName::Ne } else { FuncName::Eq };
                let value = Datum::from(exact);
                let ty = default_type_for_value(&value);
                self.construct_binary_op_function(expr, constant(value, ty), op)?
            }
            None => {
                let escape = constant(
                    Datum::Int64(escape as i64),
                    FieldType::new(MysqlType::LongLong),
                );
                self.not_to_expression(not, FuncName::Like, bool_type(), vec![expr, pattern, escape])?
            }
        };
        self.push(func);
        Ok(())
    }

    pub(super) fn regexp_to_expression(&mut self, not: bool) -> Result<()> {
        let args = self.pop_n(2)?;
        check_args_not_multi_column_row(&args)?;
        let func = self.not_to_expression(not, FuncName::Regexp, bool_type(), args)?;
        self.push(func);
        Ok(())
    }

    pub(super) fn row_to_expression(&mut self, len: usize) -> Result<()> {
        let values = self.pop_n(len)?;
        let ret_type = values
            .first()
            .ok_or_else(|| DbError::new("Empty row constructor"))?
            .ret_type()
            .clone();
        let func = self.new_function(FuncName::Row, ret_type, values)?;
        self.push(func);
        Ok(())
    }

    /// `a IN (b, c)`. Rows or mixed types become `a = b OR a = c`.
    pub(super) fn in_to_expression(&mut self, list_len: usize, not: bool) -> Result<()> {
        let mut args = self.pop_n(list_len + 1)?;
        let row_len = args[0].row_len();
        if args[1..].iter().any(|a| a.row_len() != row_len) {
            return Err(DbError::operand_columns(row_len));
        }
        let left_type = args[0].ret_type();
        if left_type.tp == MysqlType::Null {
            self.push(null());
            return Ok(());
        }
        let left_eval = left_type.eval_type();
        let all_same_type = args[1..].iter().all(|a| {
            a.ret_type().tp == MysqlType::Null || a.ret_type().eval_type() == left_eval
        });

        let func = if all_same_type && row_len == 1 {
            self.not_to_expression(not, FuncName::In, bool_type(), args)?
        } else {
            let left = args.remove(0);
            let mut eqs = Vec::with_capacity(args.len());
            for arg in args {
                eqs.push(self.construct_binary_op_function(left.clone(), arg, FuncName::Eq)?);
            }
            let func = compose_dnf(eqs)?;
            if not {
                self.new_function(FuncName::UnaryNot, bool_type(), vec![func])?
            } else {
                func
            }
        };
        self.push(func);
        Ok(())
    }

    /// `ORDER BY n` or `ORDER BY ?`, one-based into the current schema.
    pub(super) fn position_to_column(&mut self, n: usize, has_param: bool) -> Result<()> {
        let mut pos = n as i64;
        let mut display = n.to_string();
        if has_param {
            display = "?".to_string();
            let value = self.top()?.as_plain_constant().cloned().ok_or_else(|| {
                DbError::new("Incorrect arguments to ORDER BY position")
            })?;
            if value.is_null() {
                // Ordering by NULL keeps the constant.
                return Ok(());
            }
            pos = value.to_i64()?;
            self.pop()?;
        }
        if pos > 0 && (pos as usize) <= self.schema.len() {
            let col = self.schema_column(pos as usize - 1)?;
            self.push(col);
            return Ok(());
        }
        Err(DbError::unknown_column(display, &self.builder.cur_clause.to_string()))
    }

    pub(super) fn is_null_to_expression(&mut self, not: bool) -> Result<()> {
        let arg = self.pop()?;
        arg.check_not_multi_column_row()?;
        let func = self.not_to_expression(not, FuncName::IsNull, bool_type(), vec![arg])?;
        self.push(func);
        Ok(())
    }

    pub(super) fn is_truth_to_expression(&mut self, truth: bool, not: bool) -> Result<()> {
        let arg = self.pop()?;
        arg.check_not_multi_column_row()?;
        let name = if truth {
            FuncName::IsTrue
        } else {
            FuncName::IsFalse
        };
        let func = self.not_to_expression(not, name, bool_type(), vec![arg])?;
        self.push(func);
        Ok(())
    }

    /// `VALUES(col)` inside `ON DUPLICATE KEY UPDATE`.
    pub(super) fn handle_values(&mut self, column: &ColumnName) -> Result<()> {
        let field_list = Clause::FieldList.to_string();
        let schema = match self.insert_plan {
            Some(insert) => &insert.table_schema,
            None => &self.schema,
        };
        let col = schema
            .find_column(column, &field_list)?
            .ok_or_else(|| DbError::unknown_column(&column.name, &field_list))?;
        let func = new_function_base(
            FuncName::Values,
            col.ret_type.clone(),
            vec![constant(
                Datum::Int64(col.index as i64),
                FieldType::new(MysqlType::LongLong),
            )],
        )?;
        self.push(func);
        Ok(())
    }

    /// `DEFAULT(col)`. The column itself was resolved by the child visit.
    pub(super) fn eval_default_expr(&mut self, name: Option<&ColumnName>) -> Result<()> {
        let Some(name) = name else {
            return Err(DbError::unsupported(
                "DEFAULT without a column is only valid as an inserted value",
            ));
        };
        let col = match self.pop()? {
            Expression::Column(col) => col,
            Expression::CorrelatedColumn(c) => c.column,
            _ => self
                .schema
                .find_column(name, "field list")?
                .cloned()
                .ok_or_else(|| DbError::unknown_column(name, "field list"))?,
        };

        // Computed columns, e.g. `(a + 1) AS c` in a derived table.
        let Some(table) = col.orig_table.as_deref() else {
            return Err(no_default_value(&col.name));
        };
        let db = col
            .db
            .clone()
            .unwrap_or_else(|| self.builder.session.current_db.clone());
        let col_name = col.orig_name.as_deref().unwrap_or(&col.name);
        let default = self
            .builder
            .subquery_builder()
            .column_default(&db, table, col_name)?;

        let value = match default {
            ColumnDefault::CurrentTimestamp if col.ret_type.tp == MysqlType::Datetime => null(),
            ColumnDefault::CurrentTimestamp if col.ret_type.tp == MysqlType::Timestamp => {
                let mut zero = Time::zero(MysqlType::Timestamp);
                zero.set_fsp(col.ret_type.decimal.clamp(0, MAX_FSP) as i8);
                let ret_type =
                    FieldType::new(MysqlType::Timestamp).with_decimal(col.ret_type.decimal);
                constant(Datum::Time(zero), ret_type)
            }
            ColumnDefault::CurrentTimestamp => {
                let now = new_function_base(FuncName::Now, col.ret_type.clone(), Vec::new())?
                    .eval(&self.builder.eval_context(), &EmptyRow)?;
                constant(now.convert_to(&col.ret_type)?, col.ret_type.clone())
            }
            ColumnDefault::Value(v) => constant(v.convert_to(&col.ret_type)?, col.ret_type.clone()),
            ColumnDefault::None => return Err(no_default_value(col_name)),
        };
        self.push(value);
        Ok(())
    }
}
