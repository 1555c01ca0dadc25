mod support;

use support::*;
use tessera_error::{ErrorKind, Result};
use tessera_planner::ast::build::{binary, col, func, lit, null};
use tessera_planner::ast::{
    BinaryOp,
    ColumnName,
    ExprNode,
    NodeId,
    SelectStmt,
    UnaryOp,
    VariableExpr,
    WhenClause,
};
use tessera_planner::builder::{Clause, ColumnDefault, InsertPlan, PlanBuilder};
use tessera_planner::expr::eval::{EmptyRow, EvalContext};
use tessera_planner::expr::{Expression, Schema};
use tessera_planner::logical::logical_setop::LogicalUnionAll;
use tessera_planner::logical::{LogicalOperator, Node};
use tessera_planner::rewriter::{rewrite, rewrite_insert_on_duplicate_update};
use tessera_types::{Datum, FieldType, MysqlType};

fn test_db() -> TestDb {
    TestDb::new(
        Catalog::new()
            .table("t", &[("a", int_type()), ("b", int_type())], vec![
                vec![Datum::Int64(3), Datum::Int64(10)],
                vec![Datum::Int64(1), Datum::Int64(30)],
                vec![Datum::Null, Datum::Int64(20)],
            ])
            .table("t2", &[("a", int_type())], Vec::new())
            .table("u", &[("w", int_not_null())], Vec::new())
            .table(
                "names",
                &[("name", FieldType::new(MysqlType::VarString).with_flen(32))],
                Vec::new(),
            )
            .table_with_defaults("d", vec![
                ("c", int_type(), ColumnDefault::Value(Datum::Int64(9))),
                ("n", int_type(), ColumnDefault::None),
                (
                    "ts",
                    FieldType::new(MysqlType::Timestamp),
                    ColumnDefault::CurrentTimestamp,
                ),
                (
                    "dt",
                    FieldType::new(MysqlType::Datetime),
                    ColumnDefault::CurrentTimestamp,
                ),
            ]),
    )
}

/// Rewrite `expr` against a scan of `table`.
fn rewrite_over(db: &TestDb, table: &str, expr: &ExprNode) -> Result<Expression> {
    let planner = MockPlanner {
        catalog: &db.catalog,
    };
    let mut builder = PlanBuilder::new(&db.session, &db.vars, &planner);
    let plan = planner.scan(&mut builder, table)?;
    let (expr, _) = rewrite(&mut builder, expr, plan, true)?;
    Ok(expr.expect("scalar rewrite returns an expression"))
}

fn variable(name: &str, value: Option<ExprNode>) -> ExprNode {
    ExprNode::Variable(VariableExpr {
        name: name.to_string(),
        is_system: false,
        is_global: false,
        explicit_scope: false,
        value: value.map(Box::new),
    })
}

fn system_variable(name: &str, is_global: bool, explicit_scope: bool) -> ExprNode {
    ExprNode::Variable(VariableExpr {
        name: name.to_string(),
        is_system: true,
        is_global,
        explicit_scope,
        value: None,
    })
}

#[test]
fn unknown_column_names_the_clause() {
    let db = test_db();
    let err = db.query(&select_from(vec![col("zz")], "t")).unwrap_err();
    assert_eq!(ErrorKind::UnknownColumn, err.kind());
    assert_eq!("Unknown column 'zz' in 'field list'", err.message());

    let err = db
        .query(&select_where(vec![col("a")], "t", binary(BinaryOp::Eq, col("t.zz"), lit(1_i64))))
        .unwrap_err();
    assert_eq!("Unknown column 't.zz' in 'where clause'", err.message());
}

#[test]
fn global_order_by_reported_as_order_clause() {
    let db = test_db();
    let planner = MockPlanner {
        catalog: &db.catalog,
    };
    let mut builder = PlanBuilder::new(&db.session, &db.vars, &planner);
    let plan = planner.scan(&mut builder, "t").unwrap();
    builder.cur_clause = Clause::GlobalOrderBy;
    let err = rewrite(&mut builder, &col("zz"), plan, true).unwrap_err();
    assert_eq!("Unknown column 'zz' in 'order clause'", err.message());
    assert_eq!(Clause::OrderBy, builder.cur_clause);
}

#[test]
fn ambiguous_and_qualified_columns() {
    let db = test_db();
    let planner = MockPlanner {
        catalog: &db.catalog,
    };
    let mut builder = PlanBuilder::new(&db.session, &db.vars, &planner);
    let left = planner.scan(&mut builder, "t").unwrap();
    let right = planner.scan(&mut builder, "t2").unwrap();
    let join = builder.build_join(
        left,
        right,
        tessera_planner::logical::logical_join::JoinType::Inner,
        Vec::new(),
    );

    let err = rewrite(&mut builder, &col("a"), join.clone(), true).unwrap_err();
    assert_eq!(ErrorKind::AmbiguousColumn, err.kind());

    let (expr, _) = rewrite(&mut builder, &col("t2.a"), join, true).unwrap();
    let expr = expr.unwrap();
    assert_eq!("t2.a", expr.to_string());
}

#[test]
fn table_name_not_allowed_after_union() {
    let db = test_db();
    let planner = MockPlanner {
        catalog: &db.catalog,
    };
    let mut builder = PlanBuilder::new(&db.session, &db.vars, &planner);
    let left = planner.scan(&mut builder, "t2").unwrap();
    let schema = left.schema().clone();
    let union = LogicalOperator::UnionAll(Node::new(LogicalUnionAll, schema, vec![left]));
    builder.cur_clause = Clause::GlobalOrderBy;

    let err = rewrite(&mut builder, &col("t.a"), union, true).unwrap_err();
    assert_eq!(ErrorKind::TablenameNotAllowedHere, err.kind());
    assert!(err.message().contains("global ORDER clause"), "{err}");
}

#[test]
fn outer_schema_gives_correlated_column() {
    let db = test_db();
    let planner = MockPlanner {
        catalog: &db.catalog,
    };
    let mut builder = PlanBuilder::new(&db.session, &db.vars, &planner);
    let outer = planner.scan(&mut builder, "t").unwrap();
    builder.outer_schemas.push(outer.schema().clone());
    let inner = planner.scan(&mut builder, "u").unwrap();

    let expr = binary(BinaryOp::Eq, col("w"), col("b"));
    let (expr, _) = rewrite(&mut builder, &expr, inner, true).unwrap();
    let expr = expr.unwrap();
    assert_eq!("eq(u.w, outer(t.b))", expr.to_string());
    let correlated = expr.correlated_columns();
    assert_eq!(1, correlated.len());
    assert_eq!("b", correlated[0].column.name);
}

#[test]
fn mapped_column_resolves_by_offset() {
    let db = test_db();
    let planner = MockPlanner {
        catalog: &db.catalog,
    };
    let mut builder = PlanBuilder::new(&db.session, &db.vars, &planner);
    let plan = planner.scan(&mut builder, "t").unwrap();
    builder.col_mapper.insert(NodeId(7), 1);

    let node = ExprNode::Column {
        id: NodeId(7),
        name: ColumnName::new("does_not_matter"),
    };
    let (expr, _) = rewrite(&mut builder, &node, plan, true).unwrap();
    assert_eq!("t.b", expr.unwrap().to_string());
}

#[test]
fn aggregate_outside_aggregation_is_invalid() {
    let db = test_db();
    let filter = binary(BinaryOp::Gt, agg(1, "count", vec![col("a")]), lit(1_i64));
    let err = db.query(&select_where(vec![col("a")], "t", filter)).unwrap_err();
    assert_eq!(ErrorKind::InvalidGroupFuncUse, err.kind());

    let window = ExprNode::Window {
        id: NodeId(2),
        name: "row_number".to_string(),
    };
    let err = db.eval(&window).unwrap_err();
    assert_eq!(ErrorKind::InvalidWindowFuncUse, err.kind());
}

#[test]
fn aggregate_in_field_list() {
    let db = test_db();
    let query = select_from(
        vec![
            agg(1, "count", vec![col("a")]),
            agg(2, "max", vec![col("b")]),
            agg(3, "sum", vec![col("a")]),
        ],
        "t",
    );
    let rows = db.query(&query).unwrap();
    assert_eq!(1, rows.len());
    assert_eq!(Datum::Int64(2), rows[0][0]);
    assert_eq!(Datum::Int64(30), rows[0][1]);
    assert_eq!(4, rows[0][2].to_i64().unwrap());
}

#[test]
fn row_operands() {
    let db = test_db();
    let row = |a: ExprNode, b: ExprNode| ExprNode::Row(vec![a, b]);

    let eq = binary(BinaryOp::Eq, row(lit(1_i64), lit(2_i64)), row(lit(1_i64), lit(2_i64)));
    assert_eq!(Datum::Int64(1), db.eval(&eq).unwrap());

    let ne = binary(BinaryOp::NotEq, row(lit(1_i64), lit(2_i64)), row(lit(1_i64), lit(3_i64)));
    assert_eq!(Datum::Int64(1), db.eval(&ne).unwrap());

    let lt = binary(BinaryOp::Lt, row(lit(1_i64), lit(2_i64)), row(lit(1_i64), lit(3_i64)));
    assert_eq!(Datum::Int64(1), db.eval(&lt).unwrap());

    let gt_first = binary(BinaryOp::Gt, row(lit(2_i64), lit(0_i64)), row(lit(1_i64), lit(9_i64)));
    assert_eq!(Datum::Int64(1), db.eval(&gt_first).unwrap());

    // First pair can't be decided.
    let unknown = binary(BinaryOp::Lt, row(null(), lit(2_i64)), row(lit(1_i64), lit(3_i64)));
    assert_eq!(Datum::Null, db.eval(&unknown).unwrap());

    let mismatch = binary(
        BinaryOp::Eq,
        row(lit(1_i64), lit(2_i64)),
        ExprNode::Row(vec![lit(1_i64), lit(2_i64), lit(3_i64)]),
    );
    let err = db.eval(&mismatch).unwrap_err();
    assert_eq!(ErrorKind::OperandColumns, err.kind());
    assert_eq!("Operand should contain 2 column(s)", err.message());
}

#[test]
fn row_not_allowed_as_value() {
    let db = test_db();
    let err = db.eval(&ExprNode::Row(vec![lit(1_i64), lit(2_i64)])).unwrap_err();
    assert_eq!(ErrorKind::OperandColumns, err.kind());

    let plus = binary(BinaryOp::Plus, ExprNode::Row(vec![lit(1_i64), lit(2_i64)]), lit(1_i64));
    assert_eq!(ErrorKind::OperandColumns, db.eval(&plus).unwrap_err().kind());

    let neg = ExprNode::Unary {
        op: UnaryOp::Minus,
        expr: Box::new(ExprNode::Row(vec![lit(1_i64), lit(2_i64)])),
    };
    assert_eq!(ErrorKind::OperandColumns, db.eval(&neg).unwrap_err().kind());
}

#[test]
fn unary_operators() {
    let db = test_db();
    let plus = ExprNode::Unary {
        op: UnaryOp::Plus,
        expr: Box::new(lit(4_i64)),
    };
    assert_eq!(Datum::Int64(4), db.eval(&plus).unwrap());

    let not = ExprNode::Unary {
        op: UnaryOp::Not,
        expr: Box::new(lit(0_i64)),
    };
    assert_eq!(Datum::Int64(1), db.eval(&not).unwrap());
}

#[test]
fn nullif_and_ifnull() {
    let db = test_db();
    assert_eq!(Datum::Null, db.eval(&func("nullif", vec![lit(1_i64), lit(1_i64)])).unwrap());
    assert_eq!(Datum::Int64(1), db.eval(&func("NULLIF", vec![lit(1_i64), lit(2_i64)])).unwrap());
    assert_eq!(Datum::Int64(5), db.eval(&func("ifnull", vec![null(), lit(5_i64)])).unwrap());

    let err = db.eval(&func("nullif", vec![lit(1_i64)])).unwrap_err();
    assert_eq!(ErrorKind::IncorrectParameterCount, err.kind());

    // NOT NULL column never needs the fallback.
    let expr = rewrite_over(&db, "u", &func("ifnull", vec![col("w"), lit(0_i64)])).unwrap();
    let Expression::Column(column) = expr else {
        panic!("expected column, got {expr}");
    };
    assert!(column.is_referenced);

    let expr = rewrite_over(&db, "t", &func("ifnull", vec![col("a"), lit(0_i64)])).unwrap();
    assert_eq!("ifnull(t.a, 0)", expr.to_string());
}

#[test]
fn unknown_function() {
    let db = test_db();
    let err = db.eval(&func("no_such_func", vec![lit(1_i64)])).unwrap_err();
    assert_eq!(ErrorKind::FunctionNotExists, err.kind());
    assert_eq!("FUNCTION test.no_such_func does not exist", err.message());
}

#[test]
fn like_without_wildcards_is_equality() {
    let db = test_db();
    let like = |pattern: &str, not: bool| ExprNode::Like {
        expr: Box::new(col("name")),
        pattern: Box::new(lit(pattern)),
        escape: '\\',
        not,
    };

    let expr = rewrite_over(&db, "names", &like("abc", false)).unwrap();
    assert_eq!("eq(names.name, 'abc')", expr.to_string());

    let expr = rewrite_over(&db, "names", &like("a\\%c", true)).unwrap();
    assert_eq!("ne(names.name, 'a%c')", expr.to_string());

    let expr = rewrite_over(&db, "names", &like("ab%", false)).unwrap();
    assert_eq!("like(names.name, 'ab%', 92)", expr.to_string());

    let expr = rewrite_over(&db, "names", &like("a_c", true)).unwrap();
    assert_eq!("not(like(names.name, 'a_c', 92))", expr.to_string());

    let matched = ExprNode::Like {
        expr: Box::new(lit("abcd")),
        pattern: Box::new(lit("a_c%")),
        escape: '\\',
        not: false,
    };
    assert_eq!(Datum::Int64(1), db.eval(&matched).unwrap());
}

#[test]
fn regexp_match() {
    let db = test_db();
    let re = |not: bool| ExprNode::Regexp {
        expr: Box::new(lit("tessera")),
        pattern: Box::new(lit("^tes+")),
        not,
    };
    assert_eq!(Datum::Int64(1), db.eval(&re(false)).unwrap());
    assert_eq!(Datum::Int64(0), db.eval(&re(true)).unwrap());
}

#[test]
fn between() {
    let db = test_db();
    let between = |v: i64, not: bool| ExprNode::Between {
        expr: Box::new(lit(v)),
        low: Box::new(lit(1_i64)),
        high: Box::new(lit(5_i64)),
        not,
    };
    assert_eq!(Datum::Int64(1), db.eval(&between(3, false)).unwrap());
    assert_eq!(Datum::Int64(1), db.eval(&between(5, false)).unwrap());
    assert_eq!(Datum::Int64(0), db.eval(&between(6, false)).unwrap());
    assert_eq!(Datum::Int64(0), db.eval(&between(3, true)).unwrap());

    let expr = rewrite_over(&db, "t", &ExprNode::Between {
        expr: Box::new(col("a")),
        low: Box::new(lit(1_i64)),
        high: Box::new(lit(5_i64)),
        not: false,
    })
    .unwrap();
    assert_eq!("and(ge(t.a, 1), le(t.a, 5))", expr.to_string());
}

#[test]
fn case_expressions() {
    let db = test_db();
    let whens = || {
        vec![
            WhenClause {
                when: lit(1_i64),
                then: lit("one"),
            },
            WhenClause {
                when: lit(2_i64),
                then: lit("two"),
            },
        ]
    };

    let simple = ExprNode::Case {
        value: Some(Box::new(lit(2_i64))),
        whens: whens(),
        else_clause: Some(Box::new(lit("other"))),
    };
    assert_eq!(Datum::from("two"), db.eval(&simple).unwrap());

    let no_match = ExprNode::Case {
        value: Some(Box::new(lit(7_i64))),
        whens: whens(),
        else_clause: None,
    };
    assert_eq!(Datum::Null, db.eval(&no_match).unwrap());

    let searched = ExprNode::Case {
        value: None,
        whens: vec![
            WhenClause {
                when: binary(BinaryOp::Gt, lit(1_i64), lit(2_i64)),
                then: lit("gt"),
            },
            WhenClause {
                when: binary(BinaryOp::Lt, lit(1_i64), lit(2_i64)),
                then: lit("lt"),
            },
        ],
        else_clause: Some(Box::new(lit("eq"))),
    };
    assert_eq!(Datum::from("lt"), db.eval(&searched).unwrap());

    let expr = rewrite_over(&db, "t", &ExprNode::Case {
        value: Some(Box::new(col("a"))),
        whens: whens(),
        else_clause: None,
    })
    .unwrap();
    assert_eq!("case(eq(t.a, 1), 'one', eq(t.a, 2), 'two')", expr.to_string());
}

#[test]
fn is_null_and_is_truth() {
    let db = test_db();
    let is_null = |e: ExprNode, not: bool| ExprNode::IsNull {
        expr: Box::new(e),
        not,
    };
    assert_eq!(Datum::Int64(1), db.eval(&is_null(null(), false)).unwrap());
    assert_eq!(Datum::Int64(1), db.eval(&is_null(lit(1_i64), true)).unwrap());

    let truth = |e: ExprNode, truth: bool, not: bool| ExprNode::IsTruth {
        expr: Box::new(e),
        truth,
        not,
    };
    assert_eq!(Datum::Int64(1), db.eval(&truth(lit(2_i64), true, false)).unwrap());
    assert_eq!(Datum::Int64(0), db.eval(&truth(null(), false, false)).unwrap());
    assert_eq!(Datum::Int64(1), db.eval(&truth(null(), true, true)).unwrap());
}

#[test]
fn cast_checks_duration_precision() {
    let db = test_db();
    let cast = |decimal: i32| ExprNode::Cast {
        expr: Box::new(lit("10:11:12")),
        target: FieldType::new(MysqlType::Duration).with_decimal(decimal),
    };
    let err = db.eval(&cast(7)).unwrap_err();
    assert_eq!(ErrorKind::TooBigPrecision, err.kind());
    assert_eq!("Too-big precision 7 specified for 'CAST'. Maximum is 6", err.message());

    assert!(db.eval(&cast(6)).is_ok());
}

#[test]
fn user_and_system_variables() {
    let db = test_db();
    let assigned = db.eval(&variable("X", Some(lit(5_i64)))).unwrap();
    assert_eq!(Datum::Int64(5), assigned);
    assert_eq!(Datum::Int64(5), db.eval(&variable("x", None)).unwrap());
    assert_eq!(Datum::Null, db.eval(&variable("unset", None)).unwrap());

    assert_eq!(
        Datum::Int64(1),
        db.eval(&system_variable("autocommit", false, false)).unwrap()
    );
    db.vars.set_session_var("autocommit", Datum::Int64(0)).unwrap();
    assert_eq!(
        Datum::Int64(0),
        db.eval(&system_variable("autocommit", false, false)).unwrap()
    );
    assert_eq!(
        Datum::Int64(1),
        db.eval(&system_variable("autocommit", true, true)).unwrap()
    );

    let err = db.eval(&system_variable("no_such_var", false, false)).unwrap_err();
    assert_eq!(ErrorKind::UnknownSystemVariable, err.kind());

    // Global-only variable read through an explicit session scope.
    let err = db.eval(&system_variable("version", false, true)).unwrap_err();
    assert_eq!(ErrorKind::UnknownSystemVariable, err.kind());
    // Session-only variable read globally.
    let err = db.eval(&system_variable("warning_count", true, true)).unwrap_err();
    assert_eq!(ErrorKind::UnknownSystemVariable, err.kind());
}

#[test]
fn param_markers() {
    let mut db = test_db();
    db.session.prepared_params = vec![Datum::Int64(7), Datum::from("x")];

    let marker = |order: usize| ExprNode::ParamMarker { order };
    assert_eq!(Datum::Int64(7), db.eval(&marker(0)).unwrap());
    assert_eq!(Datum::from("x"), db.eval(&marker(1)).unwrap());

    let err = db.eval(&marker(2)).unwrap_err();
    assert_eq!(ErrorKind::IncorrectParameterCount, err.kind());

    // A cached plan reads the parameter on every execution.
    db.session.use_plan_cache = true;
    let expr = rewrite_over(&db, "t", &marker(0)).unwrap();
    let Expression::Constant(constant) = &expr else {
        panic!("expected constant, got {expr}");
    };
    assert_eq!(Datum::Int64(7), constant.value);
    assert!(constant.deferred.is_some());

    let params = [Datum::Int64(8)];
    let ctx = EvalContext {
        params: &params,
        ..Default::default()
    };
    assert_eq!(Datum::Int64(8), expr.eval(&ctx, &EmptyRow).unwrap());
}

#[test]
fn deferred_functions() {
    let mut db = test_db();
    let expr = rewrite_over(&db, "t", &func("now", Vec::new())).unwrap();
    assert!(expr.as_plain_constant().is_some(), "{expr}");

    db.session.use_plan_cache = true;
    let expr = rewrite_over(&db, "t", &func("now", Vec::new())).unwrap();
    assert_eq!("deferred(now())", expr.to_string());
    assert!(expr.as_plain_constant().is_none());
}

#[test]
fn constant_folding() {
    let db = test_db();
    let expr = rewrite_over(
        &db,
        "t",
        &binary(BinaryOp::Plus, lit(1_i64), binary(BinaryOp::Mul, lit(2_i64), lit(3_i64))),
    )
    .unwrap();
    assert_eq!(Some(&Datum::Int64(7)), expr.as_plain_constant());

    // Arguments of benchmark() are evaluated on every iteration.
    let expr = rewrite_over(
        &db,
        "t",
        &func("benchmark", vec![
            lit(2_i64),
            binary(BinaryOp::Plus, lit(1_i64), lit(1_i64)),
        ]),
    )
    .unwrap();
    assert_eq!("benchmark(2, plus(1, 1))", expr.to_string());
}

#[test]
fn in_list_forms() {
    let db = test_db();
    let expr = rewrite_over(
        &db,
        "t",
        &in_list(col("a"), vec![lit(1_i64), lit(2_i64)], false),
    )
    .unwrap();
    assert_eq!("in(t.a, 1, 2)", expr.to_string());

    // Mixed types compare pairwise.
    let expr = rewrite_over(&db, "t", &in_list(col("a"), vec![lit(1_i64), lit("2")], true)).unwrap();
    assert_eq!("not(or(eq(t.a, 1), eq(t.a, '2')))", expr.to_string());

    assert_eq!(
        Datum::Null,
        db.eval(&in_list(null(), vec![lit(1_i64)], false)).unwrap()
    );
}

#[test]
fn order_by_position() {
    let db = test_db();
    let query = SelectStmt {
        order_by: vec![ExprNode::Position { n: 2, param: None }],
        ..select_from(vec![col("a"), col("b")], "t")
    };
    let rows = db.query(&query).unwrap();
    let bs: Vec<Datum> = rows.into_iter().map(|row| row[1].clone()).collect();
    assert_eq!(vec![Datum::Int64(10), Datum::Int64(20), Datum::Int64(30)], bs);

    let out_of_range = SelectStmt {
        order_by: vec![ExprNode::Position { n: 3, param: None }],
        ..select_from(vec![col("a"), col("b")], "t")
    };
    let err = db.query(&out_of_range).unwrap_err();
    assert_eq!("Unknown column '3' in 'order clause'", err.message());
}

#[test]
fn order_by_position_param() {
    let mut db = test_db();
    db.session.prepared_params = vec![Datum::Int64(1), Datum::Null];
    let by_param = |order: usize| SelectStmt {
        order_by: vec![ExprNode::Position {
            n: 0,
            param: Some(Box::new(ExprNode::ParamMarker { order })),
        }],
        ..select_from(vec![col("a")], "t")
    };

    let rows = db.query_column(&by_param(0)).unwrap();
    assert_eq!(vec![Datum::Null, Datum::Int64(1), Datum::Int64(3)], rows);

    // NULL position orders by a constant and keeps the input order.
    let rows = db.query_column(&by_param(1)).unwrap();
    assert_eq!(vec![Datum::Int64(3), Datum::Int64(1), Datum::Null], rows);
}

#[test]
fn default_values() {
    let db = test_db();
    let default = |name: &str| ExprNode::Default {
        name: Some(ColumnName::new(name)),
    };

    let expr = rewrite_over(&db, "d", &default("c")).unwrap();
    assert_eq!(Some(&Datum::Int64(9)), expr.as_plain_constant());

    let err = rewrite_over(&db, "d", &default("n")).unwrap_err();
    assert_eq!(ErrorKind::NoDefaultValue, err.kind());
    assert_eq!("Field 'n' doesn't have a default value", err.message());

    let expr = rewrite_over(&db, "d", &default("dt")).unwrap();
    assert_eq!(Some(&Datum::Null), expr.as_plain_constant());

    let expr = rewrite_over(&db, "d", &default("ts")).unwrap();
    match expr.as_plain_constant() {
        Some(Datum::Time(t)) => assert!(t.is_zero()),
        other => panic!("expected zero timestamp, got {other:?}"),
    }

    let err = rewrite_over(&db, "d", &ExprNode::Default { name: None }).unwrap_err();
    assert_eq!(ErrorKind::UnsupportedConstruct, err.kind());

    let err = rewrite_over(&db, "d", &default("missing")).unwrap_err();
    assert_eq!(ErrorKind::UnknownColumn, err.kind());
}

#[test]
fn default_of_computed_column() {
    let db = test_db();
    let planner = MockPlanner {
        catalog: &db.catalog,
    };
    let mut builder = PlanBuilder::new(&db.session, &db.vars, &planner);
    let computed = builder.new_column("c", int_type());
    let dual = builder.build_table_dual(1);
    let plan = builder.build_projection(dual, vec![tessera_planner::expr::one()], Schema::new(vec![computed]));

    let expr = ExprNode::Default {
        name: Some(ColumnName::new("c")),
    };
    let err = rewrite(&mut builder, &expr, plan, true).unwrap_err();
    assert_eq!(ErrorKind::NoDefaultValue, err.kind());
}

#[test]
fn values_reads_insert_row() {
    let db = test_db();
    let planner = MockPlanner {
        catalog: &db.catalog,
    };
    let mut builder = PlanBuilder::new(&db.session, &db.vars, &planner);
    let target = planner.scan(&mut builder, "t").unwrap();
    let insert = InsertPlan {
        table_name: "t".to_string(),
        table_schema: target.schema().clone(),
    };
    let mock_plan = planner.scan(&mut builder, "t").unwrap();

    // b = VALUES(b) + a
    let assignment = binary(
        BinaryOp::Plus,
        ExprNode::Values {
            column: ColumnName::new("b"),
        },
        col("a"),
    );
    let expr =
        rewrite_insert_on_duplicate_update(&mut builder, &assignment, mock_plan.clone(), &insert)
            .unwrap();
    assert_eq!("plus(values(1), t.a)", expr.to_string());

    let inserted = [Datum::Int64(100), Datum::Int64(40)];
    let existing = [Datum::Int64(2), Datum::Int64(0)];
    let ctx = EvalContext {
        insert_row: Some(&inserted),
        ..Default::default()
    };
    let row = tessera_planner::expr::eval::SchemaRow {
        schema: mock_plan.schema(),
        values: &existing,
    };
    assert_eq!(Datum::Int64(42), expr.eval(&ctx, &row).unwrap());

    let missing = ExprNode::Values {
        column: ColumnName::new("zz"),
    };
    let err = rewrite_insert_on_duplicate_update(&mut builder, &missing, mock_plan, &insert)
        .unwrap_err();
    assert_eq!(ErrorKind::UnknownColumn, err.kind());
}

#[test]
fn filter_without_value_yields_no_expression() {
    let db = test_db();
    let planner = MockPlanner {
        catalog: &db.catalog,
    };
    let mut builder = PlanBuilder::new(&db.session, &db.vars, &planner);
    let plan = planner.scan(&mut builder, "t").unwrap();
    let filter = in_subquery(col("a"), select_from(vec![col("a")], "t2"), false);
    let (expr, plan) = rewrite(&mut builder, &filter, plan, false).unwrap();
    assert!(expr.is_none());
    assert!(plan.explain().starts_with("Join(INNER)"), "{}", plan.explain());

    // Scalar context always produces a value.
    let plan = planner.scan(&mut builder, "t").unwrap();
    let filter = in_subquery(col("a"), select_from(vec![col("a")], "t2"), false);
    let (expr, _) = rewrite(&mut builder, &filter, plan, true).unwrap();
    assert_eq!("aux_col", expr.unwrap().to_string());
}
