//! Unit tests for SQL compilation and record routing.
//!
//! These run against a recording connection so the exact statements sent
//! to the backend can be asserted.

use std::cell::RefCell;
use std::rc::Rc;

use neutron_db::{Backend, Connection, Database, DbError, Params, Result, Row, Value};

use crate::{Direction, Model, Operator};

#[derive(Debug, Clone, Default, PartialEq)]
struct User {
    id: Option<i64>,
    email: String,
    role: Option<String>,
}

impl Model for User {
    const TABLE: &'static str = "users";

    fn primary_key(&self) -> Option<i64> {
        self.id
    }

    fn set_primary_key(&mut self, key: Option<i64>) {
        self.id = key;
    }

    fn fields(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("email", self.email.as_str().into()),
            ("role", self.role.clone().into()),
        ]
    }

    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            id: row.try_get("id")?,
            email: row.try_get("email")?,
            role: row.try_get("role")?,
        })
    }
}

#[derive(Default)]
struct Recorder {
    statements: RefCell<Vec<(String, Vec<(String, Value)>)>>,
    fail_with: Option<&'static str>,
}

impl Recorder {
    fn sql(&self) -> Vec<String> {
        self.statements
            .borrow()
            .iter()
            .map(|(sql, _)| sql.clone())
            .collect()
    }

    fn record(&self, sql: &str, params: &Params) -> Result<()> {
        self.statements
            .borrow_mut()
            .push((sql.to_string(), params.to_vec()));
        match self.fail_with {
            Some(message) => Err(DbError::execution(sql, message)),
            None => Ok(()),
        }
    }
}

struct RecordingConnection(Rc<Recorder>);

impl Connection for RecordingConnection {
    fn backend(&self) -> Backend {
        Backend::Sqlite
    }

    fn execute(&self, sql: &str, params: &Params) -> Result<usize> {
        self.0.record(sql, params).map(|()| 1)
    }

    fn query(&self, sql: &str, params: &Params) -> Result<Vec<Row>> {
        self.0.record(sql, params).map(|()| Vec::new())
    }

    fn execute_batch(&self, sql: &str) -> Result<()> {
        self.0.record(sql, &[])
    }

    fn last_insert_id(&self) -> Result<i64> {
        Ok(42)
    }
}

fn recording_db() -> (Database, Rc<Recorder>) {
    let recorder = Rc::new(Recorder::default());
    let db = Database::from_connection(RecordingConnection(Rc::clone(&recorder)));
    (db, recorder)
}

fn failing_db() -> (Database, Rc<Recorder>) {
    let recorder = Rc::new(Recorder {
        fail_with: Some("disk I/O error"),
        ..Recorder::default()
    });
    let db = Database::from_connection(RecordingConnection(Rc::clone(&recorder)));
    (db, recorder)
}

fn user(email: &str, role: &str) -> User {
    User {
        id: None,
        email: email.to_string(),
        role: Some(role.to_string()),
    }
}

// ── SQL compilation ──────────────────────────────────────────────────

#[test]
fn compiles_predicates_order_and_paging() {
    let (db, _) = recording_db();
    let compiled = User::query(&db)
        .filter("role", "=", "admin")
        .filter("email", "like", "%@example.com")
        .order_by("email", "DESC")
        .limit(2)
        .offset(1)
        .to_sql()
        .expect("should compile");

    assert_eq!(
        compiled.sql,
        "SELECT * FROM \"users\" WHERE \"role\" = :role_0 AND \"email\" LIKE :email_1 \
         ORDER BY \"email\" DESC LIMIT 2 OFFSET 1"
    );
    assert_eq!(
        compiled.params,
        vec![
            ("role_0".to_string(), Value::from("admin")),
            ("email_1".to_string(), Value::from("%@example.com")),
        ]
    );
}

#[test]
fn repeated_column_gets_distinct_placeholders() {
    let (db, _) = recording_db();
    let compiled = User::query(&db)
        .filter("id", ">", 1)
        .filter("id", "<", 5)
        .to_sql()
        .expect("should compile");
    assert_eq!(
        compiled.sql,
        "SELECT * FROM \"users\" WHERE \"id\" > :id_0 AND \"id\" < :id_1"
    );
}

#[test]
fn compilation_is_deterministic() {
    let (db, _) = recording_db();
    let build = || {
        User::query(&db)
            .filter("role", "!=", "guest")
            .order_by("id", "asc")
            .limit(10)
            .to_sql()
            .expect("should compile")
    };
    assert_eq!(build(), build());
}

#[test]
fn invalid_direction_degrades_to_ascending_and_last_order_wins() {
    let (db, _) = recording_db();
    let compiled = User::query(&db)
        .order_by("role", "DESC")
        .order_by("email", "sideways")
        .to_sql()
        .expect("should compile");
    assert_eq!(compiled.sql, "SELECT * FROM \"users\" ORDER BY \"email\" ASC");

    assert_eq!(Direction::parse_lossy("desc"), Direction::Desc);
    assert_eq!(Direction::parse_lossy(" DESC "), Direction::Desc);
    assert_eq!(Direction::parse_lossy("DESCENDING"), Direction::Asc);
}

#[test]
fn offset_without_limit_uses_unbounded_limit() {
    let (db, _) = recording_db();
    let compiled = User::query(&db).offset(3).to_sql().expect("should compile");
    assert_eq!(compiled.sql, "SELECT * FROM \"users\" LIMIT -1 OFFSET 3");
}

#[test]
fn operators_parse_from_their_sql_spelling() {
    let cases = [
        ("=", Operator::Eq),
        ("!=", Operator::NotEq),
        ("<>", Operator::NotEq),
        (">", Operator::Gt),
        (">=", Operator::Gte),
        ("<", Operator::Lt),
        ("<=", Operator::Lte),
        ("LIKE", Operator::Like),
        ("like", Operator::Like),
    ];
    for (text, expected) in cases {
        assert_eq!(text.parse::<Operator>().expect(text), expected);
    }
    for bad in ["==", "OR", "= 1 OR 1 =", "IN", ""] {
        assert!(bad.parse::<Operator>().is_err(), "{bad:?} should be rejected");
    }
}

#[test]
fn each_query_starts_empty() {
    let (db, _) = recording_db();
    let mut first = User::query(&db);
    first.filter("role", "=", "admin").limit(1);
    assert_eq!(first.predicates().len(), 1);

    let second = User::query(&db).to_sql().expect("should compile");
    assert_eq!(second.sql, "SELECT * FROM \"users\"");
    assert!(second.params.is_empty());
}

// ── validation ───────────────────────────────────────────────────────

#[test]
fn unsafe_column_fails_before_any_sql_is_sent() {
    let (db, recorder) = recording_db();
    let err = User::query(&db)
        .filter("role = 'admin' OR 1", "=", 1)
        .get()
        .expect_err("should reject column");
    assert!(matches!(err, DbError::Validation(_)), "{err:?}");
    assert!(recorder.sql().is_empty(), "no statement may reach the backend");
}

#[test]
fn unsafe_operator_and_order_column_are_rejected() {
    let (db, recorder) = recording_db();

    let err = User::query(&db)
        .filter("role", "; DROP TABLE users", "x")
        .exists()
        .expect_err("should reject operator");
    assert!(matches!(err, DbError::Validation(_)));

    let err = User::query(&db)
        .order_by("email desc, id", "ASC")
        .one()
        .expect_err("should reject order column");
    assert!(matches!(err, DbError::Validation(_)));

    assert!(recorder.sql().is_empty());
}

#[test]
fn first_validation_error_is_reported() {
    let (db, _) = recording_db();
    let err = User::query(&db)
        .filter("", "=", 1)
        .filter("role", "??", 1)
        .to_sql()
        .expect_err("should fail");
    assert_eq!(err.to_string(), "validation error: identifier must not be empty");
}

// ── execution ────────────────────────────────────────────────────────

#[test]
fn exists_and_count_use_cheap_projections() {
    let (db, recorder) = recording_db();
    let found = User::query(&db)
        .filter("role", "=", "admin")
        .order_by("email", "DESC")
        .exists()
        .expect("should run");
    assert!(!found, "recording backend returns no rows");

    let count = User::query(&db)
        .filter("role", "=", "admin")
        .limit(3)
        .count()
        .expect("should run");
    assert_eq!(count, 0);

    assert_eq!(
        recorder.sql(),
        [
            "SELECT 1 FROM \"users\" WHERE \"role\" = :role_0 LIMIT 1",
            "SELECT COUNT(*) AS count FROM \"users\" WHERE \"role\" = :role_0",
        ]
    );
}

#[test]
fn one_does_not_change_the_builder() {
    let (db, recorder) = recording_db();
    let mut query = User::query(&db);
    query.filter("role", "=", "admin");

    assert_eq!(query.one().expect("should run"), None);
    assert_eq!(
        query.to_sql().expect("should compile").sql,
        "SELECT * FROM \"users\" WHERE \"role\" = :role_0"
    );
    assert_eq!(
        recorder.sql(),
        ["SELECT * FROM \"users\" WHERE \"role\" = :role_0 LIMIT 1"]
    );
}

#[test]
fn find_filters_on_the_primary_key() {
    let (db, recorder) = recording_db();
    assert_eq!(User::find(&db, 7).expect("should run"), None);

    let statements = recorder.statements.borrow();
    assert_eq!(statements[0].0, "SELECT * FROM \"users\" WHERE \"id\" = :id_0 LIMIT 1");
    assert_eq!(statements[0].1, vec![("id_0".to_string(), Value::Integer(7))]);
}

#[test]
fn save_inserts_then_updates() {
    let (db, recorder) = recording_db();
    let mut u = user("a@example.com", "admin");
    assert!(!u.is_persisted());

    u.save(&db).expect("insert should succeed");
    assert_eq!(u.id, Some(42), "id comes from last_insert_id");
    assert!(u.is_persisted());

    u.email = "b@example.com".to_string();
    u.save(&db).expect("update should succeed");

    let statements = recorder.statements.borrow();
    assert_eq!(
        statements[0].0,
        "INSERT INTO \"users\" (\"email\", \"role\") VALUES (:email, :role)"
    );
    assert_eq!(
        statements[1].0,
        "UPDATE \"users\" SET \"email\" = :set_email, \"role\" = :set_role WHERE \"id\" = :key_id"
    );
    assert_eq!(
        statements[1].1,
        vec![
            ("set_email".to_string(), Value::from("b@example.com")),
            ("set_role".to_string(), Value::from("admin")),
            ("key_id".to_string(), Value::Integer(42)),
        ]
    );
}

#[test]
fn delete_clears_primary_key_and_skips_transient_records() {
    let (db, recorder) = recording_db();

    let mut transient = user("t@example.com", "user");
    transient.delete(&db).expect("no-op delete");
    assert!(recorder.sql().is_empty());

    let mut saved = user("s@example.com", "user");
    saved.id = Some(9);
    saved.delete(&db).expect("delete should succeed");
    assert_eq!(saved.id, None);
    assert_eq!(recorder.sql(), ["DELETE FROM \"users\" WHERE \"id\" = :key_id"]);
}

#[test]
fn failed_insert_leaves_record_untouched() {
    let (db, _) = failing_db();
    let mut u = user("a@example.com", "admin");
    let before = u.clone();

    let err = u.save(&db).expect_err("backend rejects the insert");
    match &err {
        DbError::Execution { context, source } => {
            assert_eq!(context, "insert into users");
            assert_eq!(source.to_string(), "disk I/O error");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(u, before);
}

#[test]
fn failed_delete_keeps_primary_key() {
    let (db, _) = failing_db();
    let mut u = user("a@example.com", "admin");
    u.id = Some(3);
    assert!(u.delete(&db).is_err());
    assert_eq!(u.id, Some(3));
}

#[test]
fn query_errors_carry_table_context() {
    let (db, _) = failing_db();
    let err = User::all(&db).expect_err("backend rejects the select");
    assert!(
        err.to_string().starts_with("execution error (select from users)"),
        "{err}"
    );
}

#[test]
fn unconfigured_database_is_a_connection_error() {
    let db = Database::unconfigured();
    let err = User::all(&db).expect_err("no backend");
    assert!(matches!(err, DbError::Connection(_)));

    let mut u = user("a@example.com", "admin");
    let err = u.save(&db).expect_err("no backend");
    assert!(matches!(err, DbError::Connection(_)));
    assert_eq!(u.id, None);
}
