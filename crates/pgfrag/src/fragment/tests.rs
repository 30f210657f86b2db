use super::*;
use crate::bindings;
use crate::finder::PlaceholderFinder;
use crate::guard::single_threaded_sync;
use std::io::Cursor;

fn frag(template: &str, bindings: &Bindings) -> SqlFragment {
    SqlFragment::new(template, bindings).unwrap()
}

#[test]
fn renders_question_markers_and_values() {
    let f = frag("SELECT * FROM t WHERE id = :id", &bindings! { "id" => 5 });
    assert_eq!(f.sql(), "SELECT * FROM t WHERE id = ?");
    assert_eq!(f.params(), vec![Value::Int(5)]);
    assert_eq!(f.original(), "SELECT * FROM t WHERE id = :id");
}

#[test]
fn numbered_rendering_counts_positions() {
    let f = frag(
        "a = :a AND b IN (:b) AND c = :a",
        &bindings! { "a" => 1, "b" => vec![2, 3] },
    );
    assert_eq!(f.to_pg_sql(), "a = $1 AND b IN ($2, $3) AND c = $4");
    assert_eq!(f.positions(), 4);
    assert_eq!(
        f.params(),
        vec![Value::Int(1), Value::Int(2), Value::Int(3), Value::Int(1)]
    );
}

#[test]
fn rendered_text_has_no_named_placeholders() {
    let f = frag(
        "SELECT :a::text, x FROM t WHERE y IN (:ids) AND z = :z/*BIGINT*/",
        &bindings! { "a" => "v", "ids" => vec![1_i64, 2], "z" => 3 },
    );
    assert_eq!(PlaceholderFinder::new(&f.sql()).placeholders().count(), 0);
    assert_eq!(f.params().len(), f.sql().matches('?').count());
}

#[test]
fn missing_binding_fails() {
    let err = SqlFragment::new("x = :missing", &Bindings::new()).unwrap_err();
    match err {
        FragError::PlaceholderNotFound { name } => assert_eq!(name, "missing"),
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn unknown_type_hint_fails() {
    let err = SqlFragment::new("x = :x/*NOPE*/", &bindings! { "x" => 1 }).unwrap_err();
    assert!(matches!(err, FragError::UnknownTypeName { .. }));
}

#[test]
fn typed_null_uses_the_hint() {
    let f = frag("x = :x/*BIGINT*/", &bindings! { "x" => Value::Null });
    let (ty, value) = f.bound_values()[0];
    assert_eq!(ty.name(), "BIGINT");
    assert_eq!(value, &Value::Null);

    let untyped = frag("x = :x", &bindings! { "x" => Value::Null });
    assert_eq!(untyped.bound_values()[0].0.name(), "NULL");
}

#[test]
fn hint_coerces_or_reports_mismatch() {
    let f = frag("x = :x/*BIGINT*/", &bindings! { "x" => 7 });
    assert_eq!(f.params(), vec![Value::BigInt(7)]);

    match SqlFragment::new("x = :x/*BIGINT*/", &bindings! { "x" => "seven" }) {
        Err(FragError::TypeMismatch {
            placeholder,
            expected,
            ..
        }) => {
            assert_eq!(placeholder, "x");
            assert_eq!(expected, "BIGINT");
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn argument_hint_coerces_list_elements() {
    let f = frag("id IN (:ids/*LIST<BIGINT>*/)", &bindings! { "ids" => vec![1, 2] });
    assert_eq!(f.params(), vec![Value::BigInt(1), Value::BigInt(2)]);
    assert_eq!(f.sql(), "id IN (?, ?)");
}

#[test]
fn list_expands_in_order() {
    let f = frag(":ids", &bindings! { "ids" => vec![1, 2, 3] });
    assert_eq!(f.sql(), "?, ?, ?");
    assert_eq!(f.params(), vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
}

#[test]
fn empty_list_renders_null() {
    let f = frag("id IN (:ids)", &bindings! { "ids" => Vec::<i64>::new() });
    assert_eq!(f.sql(), "id IN (NULL)");
    assert!(f.params().is_empty());
}

#[test]
fn nested_list_names_the_placeholder() {
    let nested = Value::List(vec![Value::list(vec![1]), Value::Int(2)]);
    match SqlFragment::new("x IN (:xs)", &bindings! { "xs" => nested }) {
        Err(FragError::NestedExpansion { placeholder }) => assert_eq!(placeholder, "xs"),
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn non_thread_safe_value_requires_guard() {
    let stream = || Value::binary_stream(Cursor::new(vec![1u8, 2]));
    match SqlFragment::new("INSERT INTO f VALUES (:body)", &bindings! { "body" => stream() }) {
        Err(FragError::NonThreadSafeViolation {
            placeholder,
            type_name,
        }) => {
            assert_eq!(placeholder, "body");
            assert_eq!(type_name, "BINARY_STREAM");
        }
        other => panic!("unexpected {other:?}"),
    }

    let f = single_threaded_sync(|| {
        SqlFragment::new("INSERT INTO f VALUES (:body)", &bindings! { "body" => stream() })
    })
    .unwrap();
    assert!(f.contains_non_thread_safe_value());
}

#[test]
fn and_scenario() {
    let f1 = frag("a = :a", &bindings! { "a" => 1 });
    let f2 = frag("b = :b", &bindings! { "b" => 2 });
    let joined = f1.and(f2);
    assert_eq!(joined.sql(), "a = ? AND b = ?");
    assert_eq!(joined.params(), vec![Value::Int(1), Value::Int(2)]);
    assert_eq!(joined.kind(), CompositionKind::And);
}

#[test]
fn same_operator_chains_without_parentheses() {
    let a = SqlFragment::text("a");
    let b = SqlFragment::text("b");
    let c = SqlFragment::text("c");
    assert_eq!(a.clone().and(b.clone()).and(c.clone()).sql(), "a AND b AND c");
    assert_eq!(a.or(b).or(c).sql(), "a OR b OR c");
}

#[test]
fn mixed_operators_are_parenthesized() {
    let a = SqlFragment::text("a");
    let b = SqlFragment::text("b");
    let c = SqlFragment::text("c");
    assert_eq!(a.clone().or(b.clone()).and(c.clone()).sql(), "(a OR b) AND c");
    assert_eq!(
        c.clone().and(a.clone().or(b.clone())).sql(),
        "c AND (a OR b)"
    );
    assert_eq!(a.and(b).or(c).sql(), "(a AND b) OR c");
}

#[test]
fn concat_is_never_boolean_joined() {
    let a = SqlFragment::text("a");
    let b = SqlFragment::text("b");
    let c = SqlFragment::text("c");
    let joined = a.or(b);
    assert_eq!(joined.kind(), CompositionKind::Or);

    let concatenated = SqlFragment::text("NOT ").concat(joined.clone());
    assert_eq!(concatenated.kind(), CompositionKind::Plain);
    assert_eq!(concatenated.and(c.clone()).sql(), "NOT a OR b AND c");

    let wrapped = SqlFragment::text("(")
        .concat(joined)
        .concat(SqlFragment::text(")"));
    assert_eq!(wrapped.and(c).sql(), "(a OR b) AND c");
}

#[test]
fn concat_is_associative() {
    let a = frag("a = :a", &bindings! { "a" => 1 });
    let b = frag(" AND b = :b", &bindings! { "b" => 2 });
    let c = frag(" AND c IN (:c)", &bindings! { "c" => vec![3, 4] });
    let left = a.clone().concat(b.clone()).concat(c.clone());
    let right = a.concat(b.concat(c));
    assert_eq!(left.sql(), right.sql());
    assert_eq!(left.to_pg_sql(), right.to_pg_sql());
    assert_eq!(left.params(), right.params());
}

#[test]
fn concat_with_separator() {
    let f = SqlFragment::text("SELECT 1").concat_with(" UNION ", SqlFragment::text("SELECT 2"));
    assert_eq!(f.sql(), "SELECT 1 UNION SELECT 2");
}

#[test]
fn blank_operands_are_dropped() {
    let a = frag("a = :a", &bindings! { "a" => 1 });
    assert_eq!(a.clone().and(SqlFragment::text("  ")).sql(), "a = ?");
    assert_eq!(SqlFragment::empty().or(a.clone()).sql(), "a = ?");
    assert_eq!(SqlFragment::empty().or(a).kind(), CompositionKind::Plain);
}

#[test]
fn and_all_skips_blank_fragments() {
    let parts = vec![
        SqlFragment::text("a"),
        SqlFragment::empty(),
        SqlFragment::text("b"),
        SqlFragment::text("c"),
    ];
    assert_eq!(SqlFragment::and_all(parts).sql(), "a AND b AND c");
    assert!(SqlFragment::or_all(Vec::new()).is_empty());
}

#[test]
fn emptiness_and_blankness() {
    assert!(SqlFragment::empty().is_empty());
    assert!(SqlFragment::text("").is_empty());
    assert!(!SqlFragment::text(" ").is_empty());
    assert!(SqlFragment::text(" \n").is_blank());
    assert!(!frag(":a", &bindings! { "a" => 1 }).is_blank());
}

#[test]
fn substitute_splices_fragments() {
    let filter = frag("status = :status", &bindings! { "status" => "active" });
    let limit = frag(":n", &bindings! { "n" => 10 });
    let base = frag(
        "SELECT * FROM users WHERE org = :org AND ${filter} LIMIT ${limit}",
        &bindings! { "org" => 3 },
    );
    let subs = Substitutions::new().with("filter", filter).with("limit", limit);
    let f = base.substitute(&subs).unwrap();
    assert_eq!(
        f.to_pg_sql(),
        "SELECT * FROM users WHERE org = $1 AND status = $2 LIMIT $3"
    );
    assert_eq!(
        f.params(),
        vec![Value::Int(3), Value::from("active"), Value::Int(10)]
    );
}

#[test]
fn substitute_is_strict_by_default() {
    let base = SqlFragment::text("SELECT ${cols} FROM t");
    match base.substitute(&Substitutions::new()) {
        Err(FragError::UnresolvedKeyword { keyword }) => assert_eq!(keyword, "cols"),
        other => panic!("unexpected {other:?}"),
    }
    let kept = base.substitute(&Substitutions::new().lenient()).unwrap();
    assert_eq!(kept.sql(), "SELECT ${cols} FROM t");
}

#[test]
fn markers_split_across_concat_are_resolved() {
    let split = SqlFragment::text("WHERE ${fil").concat(SqlFragment::text("ter}"));
    match split.substitute(&Substitutions::new()) {
        Err(FragError::UnresolvedKeyword { keyword }) => assert_eq!(keyword, "filter"),
        other => panic!("unexpected {other:?}"),
    }

    let filter = frag("a = :a", &bindings! { "a" => 1 });
    let f = split
        .concat(frag(" AND b = :b", &bindings! { "b" => 2 }))
        .substitute(&Substitutions::new().with("filter", filter))
        .unwrap();
    assert_eq!(f.to_pg_sql(), "WHERE a = $1 AND b = $2");
    assert_eq!(f.params(), vec![Value::Int(1), Value::Int(2)]);
}

#[test]
fn boolean_replacements_keep_their_grouping() {
    let either = frag("a = :a", &bindings! { "a" => 1 }).or(frag("b = :b", &bindings! { "b" => 2 }));
    let f = SqlFragment::text("x = 1 AND ${f}")
        .substitute(&Substitutions::new().with("f", either))
        .unwrap();
    assert_eq!(f.sql(), "x = 1 AND (a = ? OR b = ?)");
}

#[test]
fn blank_operands_keep_confidentiality() {
    let b = frag("b = :b", &bindings! { "b" => 2 });
    assert!(SqlFragment::empty().confidential().and(b.clone()).is_confidential());
    assert!(b.clone().or(SqlFragment::text(" ").confidential()).is_confidential());
    assert!(!SqlFragment::empty().and(b).is_confidential());
}

#[test]
fn confidentiality_propagates() {
    let secret = SqlFragment::new(
        "token = :token",
        &Bindings::new().bind_confidential("token", "s3cr3t"),
    )
    .unwrap();
    assert!(secret.is_confidential());
    let open = frag("id = :id", &bindings! { "id" => 1 });
    assert!(!open.is_confidential());
    assert!(open.clone().and(secret).is_confidential());
    assert!(open.confidential().is_confidential());
}

#[test]
fn placeholder_metadata_is_kept() {
    let f = frag("x = :x/*BIGINT*/", &bindings! { "x" => 1_i64 });
    let p = f.placeholders().next().unwrap();
    assert_eq!(p.name(), "x");
    assert_eq!(p.original_text(), ":x/*BIGINT*/");
    assert_eq!(p.render_expression(), "?");
    assert_eq!(p.hint().map(|h| h.name()), Some("BIGINT"));
    assert!(p.is_thread_safe());
}
