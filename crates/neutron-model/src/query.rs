//! Predicate accumulation and SQL compilation.
//!
//! The builder collects `(column, operator, value)` predicates, an optional
//! ordering and optional paging, then compiles them into one parameterised
//! statement. Column names are validated before they reach the SQL text;
//! values only ever travel as named parameters.

use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;

use neutron_db::{quote_identifier, validate_identifier, Database, DbError, Result, Value};

use crate::model::Model;

/// Comparison operators accepted by [`QueryBuilder::filter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    /// `=`
    Eq,
    /// `!=` (also accepted as `<>`)
    NotEq,
    /// `>`
    Gt,
    /// `>=`
    Gte,
    /// `<`
    Lt,
    /// `<=`
    Lte,
    /// `LIKE`
    Like,
}

impl Operator {
    /// SQL spelling of the operator.
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::NotEq => "!=",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::Like => "LIKE",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

impl FromStr for Operator {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "=" => Ok(Self::Eq),
            "!=" | "<>" => Ok(Self::NotEq),
            ">" => Ok(Self::Gt),
            ">=" => Ok(Self::Gte),
            "<" => Ok(Self::Lt),
            "<=" => Ok(Self::Lte),
            op if op.eq_ignore_ascii_case("like") => Ok(Self::Like),
            other => Err(DbError::Validation(format!(
                "unsupported operator '{other}'"
            ))),
        }
    }
}

/// Sort direction for [`QueryBuilder::order_by`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Direction {
    /// Ascending.
    #[default]
    Asc,
    /// Descending.
    Desc,
}

impl Direction {
    /// Parses `DESC` (any case); everything else becomes [`Direction::Asc`].
    pub fn parse_lossy(s: &str) -> Self {
        if s.trim().eq_ignore_ascii_case("desc") {
            Self::Desc
        } else {
            Self::Asc
        }
    }

    /// SQL keyword for the direction.
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// A single `column operator value` condition.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    /// Validated column name.
    pub column: String,
    /// Comparison operator.
    pub operator: Operator,
    /// Bound value.
    pub value: Value,
}

/// A statement ready to send: SQL text plus its named parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    /// SQL text with `:name` placeholders.
    pub sql: String,
    /// Parameter names (without `:`) and values, in placeholder order.
    pub params: Vec<(String, Value)>,
}

#[derive(Debug, Clone, Default)]
struct QueryState {
    predicates: Vec<Predicate>,
    order: Option<(String, Direction)>,
    limit: Option<u64>,
    offset: Option<u64>,
}

enum Projection {
    Rows,
    Exists,
    Count,
}

/// Chainable query over the table of model `M`.
///
/// Obtained from [`Model::query`]. Invalid input passed to a chaining
/// method is remembered and returned by the terminal method (`get`, `one`,
/// `exists`, `count`, `to_sql`) before anything is sent to the backend.
pub struct QueryBuilder<'db, M> {
    db: &'db Database,
    state: QueryState,
    error: Option<String>,
    _model: PhantomData<fn() -> M>,
}

impl<'db, M: Model> QueryBuilder<'db, M> {
    /// Starts an empty query over `M`'s table.
    pub fn new(db: &'db Database) -> Self {
        Self {
            db,
            state: QueryState::default(),
            error: None,
            _model: PhantomData,
        }
    }

    fn reject(&mut self, err: DbError) {
        if self.error.is_none() {
            self.error = Some(match err {
                DbError::Validation(msg) => msg,
                other => other.to_string(),
            });
        }
    }

    /// Adds `column operator value`; predicates are joined with `AND`.
    pub fn filter(&mut self, column: &str, operator: &str, value: impl Into<Value>) -> &mut Self {
        let checked = validate_identifier(column).and_then(|()| operator.parse::<Operator>());
        match checked {
            Ok(operator) => self.state.predicates.push(Predicate {
                column: column.to_string(),
                operator,
                value: value.into(),
            }),
            Err(e) => self.reject(e),
        }
        self
    }

    /// Orders by `column`. `direction` is `ASC` or `DESC`; anything else is
    /// treated as `ASC`. Only the last call is kept.
    pub fn order_by(&mut self, column: &str, direction: &str) -> &mut Self {
        match validate_identifier(column) {
            Ok(()) => {
                self.state.order = Some((column.to_string(), Direction::parse_lossy(direction)));
            }
            Err(e) => self.reject(e),
        }
        self
    }

    /// Caps the number of returned rows.
    pub fn limit(&mut self, n: u64) -> &mut Self {
        self.state.limit = Some(n);
        self
    }

    /// Skips the first `n` rows.
    pub fn offset(&mut self, n: u64) -> &mut Self {
        self.state.offset = Some(n);
        self
    }

    /// Predicates accumulated so far.
    pub fn predicates(&self) -> &[Predicate] {
        &self.state.predicates
    }

    /// Compiles the `SELECT *` statement without executing it.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Validation`] if any chained input was invalid.
    pub fn to_sql(&self) -> Result<CompiledQuery> {
        self.compile(&self.state, Projection::Rows)
    }

    /// Runs the query and hydrates every row into `M`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Validation`] for invalid input,
    /// [`DbError::Connection`] if the database is unavailable, or
    /// [`DbError::Execution`] / [`DbError::Hydration`] from the backend.
    pub fn get(&self) -> Result<Vec<M>> {
        let compiled = self.to_sql()?;
        self.fetch(&compiled)
    }

    /// Returns the first matching record, or `None` when nothing matches.
    ///
    /// # Errors
    ///
    /// Same as [`QueryBuilder::get`].
    pub fn one(&self) -> Result<Option<M>> {
        let mut state = self.state.clone();
        state.limit = Some(1);
        let compiled = self.compile(&state, Projection::Rows)?;
        Ok(self.fetch(&compiled)?.into_iter().next())
    }

    /// Returns `true` if at least one row matches the predicates.
    ///
    /// # Errors
    ///
    /// Same as [`QueryBuilder::get`].
    pub fn exists(&self) -> Result<bool> {
        let compiled = self.compile(&self.state, Projection::Exists)?;
        Ok(!self.run(&compiled)?.is_empty())
    }

    /// Counts rows matching the predicates. Ordering and paging are ignored.
    ///
    /// # Errors
    ///
    /// Same as [`QueryBuilder::get`].
    pub fn count(&self) -> Result<u64> {
        let compiled = self.compile(&self.state, Projection::Count)?;
        let rows = self.run(&compiled)?;
        let count = match rows.first() {
            Some(row) => row.try_get::<i64>("count")?,
            None => 0,
        };
        u64::try_from(count).map_err(|_| DbError::Hydration {
            column: "count".to_string(),
            message: format!("negative count {count}"),
        })
    }

    fn fetch(&self, compiled: &CompiledQuery) -> Result<Vec<M>> {
        self.run(compiled)?.iter().map(M::from_row).collect()
    }

    fn run(&self, compiled: &CompiledQuery) -> Result<Vec<neutron_db::Row>> {
        tracing::debug!(
            table = M::TABLE,
            sql = %compiled.sql,
            params = compiled.params.len(),
            "executing query"
        );
        self.db
            .query(&compiled.sql, &compiled.params)
            .map_err(|e| e.with_context(format!("select from {}", M::TABLE)))
    }

    fn compile(&self, state: &QueryState, projection: Projection) -> Result<CompiledQuery> {
        if let Some(msg) = &self.error {
            return Err(DbError::Validation(msg.clone()));
        }
        validate_identifier(M::TABLE)?;

        let select = match projection {
            Projection::Rows => "SELECT *",
            Projection::Exists => "SELECT 1",
            Projection::Count => "SELECT COUNT(*) AS count",
        };
        let mut sql = format!("{select} FROM {}", quote_identifier(M::TABLE));
        let mut params = Vec::with_capacity(state.predicates.len());

        for (idx, predicate) in state.predicates.iter().enumerate() {
            let name = format!("{}_{idx}", predicate.column);
            sql.push_str(if idx == 0 { " WHERE " } else { " AND " });
            sql.push_str(&format!(
                "{} {} :{name}",
                quote_identifier(&predicate.column),
                predicate.operator.as_sql()
            ));
            params.push((name, predicate.value.clone()));
        }

        match projection {
            Projection::Rows => {
                if let Some((column, direction)) = &state.order {
                    sql.push_str(&format!(
                        " ORDER BY {} {}",
                        quote_identifier(column),
                        direction.as_sql()
                    ));
                }
                match (state.limit, state.offset) {
                    (Some(limit), Some(offset)) => {
                        sql.push_str(&format!(" LIMIT {limit} OFFSET {offset}"));
                    }
                    (Some(limit), None) => sql.push_str(&format!(" LIMIT {limit}")),
                    // SQLite only accepts OFFSET after a LIMIT clause.
                    (None, Some(offset)) => sql.push_str(&format!(" LIMIT -1 OFFSET {offset}")),
                    (None, None) => {}
                }
            }
            Projection::Exists => sql.push_str(" LIMIT 1"),
            Projection::Count => {}
        }

        Ok(CompiledQuery { sql, params })
    }
}

impl<M> fmt::Debug for QueryBuilder<'_, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryBuilder")
            .field("state", &self.state)
            .field("error", &self.error)
            .finish()
    }
}
