//! The [`Model`] trait and its insert / update / delete routing.

use neutron_db::{quote_identifier, validate_identifier, Database, Result, Row, Value};

use crate::query::QueryBuilder;

/// A struct persisted as one row of one table.
///
/// Implementors declare their table, expose their primary key and list
/// their non-key fields in declaration order. A record counts as persisted
/// exactly when its primary key is set; [`Model::save`] uses that alone to
/// choose between `INSERT` and `UPDATE`.
pub trait Model: Sized {
    /// Table the model is stored in.
    const TABLE: &'static str;

    /// Primary-key column.
    const PRIMARY_KEY: &'static str = "id";

    /// Current primary key, `None` for a record that was never saved.
    fn primary_key(&self) -> Option<i64>;

    /// Replaces the primary key.
    fn set_primary_key(&mut self, key: Option<i64>);

    /// Non-key columns and their values, in declaration order.
    fn fields(&self) -> Vec<(&'static str, Value)>;

    /// Rebuilds a record from a `SELECT *` row.
    ///
    /// # Errors
    ///
    /// Returns [`neutron_db::DbError::Hydration`] if a column is missing or
    /// mistyped.
    fn from_row(row: &Row) -> Result<Self>;

    /// Returns `true` once the record has a primary key.
    fn is_persisted(&self) -> bool {
        self.primary_key().is_some()
    }

    /// Starts a fresh query over this model's table.
    fn query(db: &Database) -> QueryBuilder<'_, Self> {
        QueryBuilder::new(db)
    }

    /// Starts a fresh query with one predicate.
    fn filter<'db>(
        db: &'db Database,
        column: &str,
        operator: &str,
        value: impl Into<Value>,
    ) -> QueryBuilder<'db, Self> {
        let mut query = Self::query(db);
        query.filter(column, operator, value);
        query
    }

    /// Looks a record up by primary key.
    ///
    /// # Errors
    ///
    /// Propagates validation, connection and execution errors. A missing
    /// row is `Ok(None)`.
    fn find(db: &Database, id: i64) -> Result<Option<Self>> {
        Self::filter(db, Self::PRIMARY_KEY, "=", id).one()
    }

    /// Every row of the table in backend order.
    ///
    /// # Errors
    ///
    /// Propagates connection, execution and hydration errors.
    fn all(db: &Database) -> Result<Vec<Self>> {
        Self::query(db).get()
    }

    /// Inserts the record if it has no primary key, otherwise updates the
    /// row it points at. After an insert the backend-assigned ID is stored
    /// in the record. An update that matches no row succeeds silently.
    ///
    /// # Errors
    ///
    /// Returns [`neutron_db::DbError::Validation`] for unsafe field or table
    /// names and propagates connection and execution errors. On error the
    /// record is left unchanged.
    fn save(&mut self, db: &Database) -> Result<()> {
        match self.primary_key() {
            None => {
                let id = insert_row(db, Self::TABLE, &self.fields())?;
                self.set_primary_key(Some(id));
                Ok(())
            }
            Some(id) => update_row(db, Self::TABLE, Self::PRIMARY_KEY, id, &self.fields()),
        }
    }

    /// Deletes the row the record points at and clears its primary key.
    /// Deleting a record that was never saved does nothing.
    ///
    /// # Errors
    ///
    /// Propagates validation, connection and execution errors; the primary
    /// key is only cleared after the delete succeeds.
    fn delete(&mut self, db: &Database) -> Result<()> {
        let Some(id) = self.primary_key() else {
            return Ok(());
        };
        delete_row(db, Self::TABLE, Self::PRIMARY_KEY, id)?;
        self.set_primary_key(None);
        Ok(())
    }
}

fn validate_columns(table: &str, fields: &[(&'static str, Value)]) -> Result<()> {
    validate_identifier(table)?;
    fields
        .iter()
        .try_for_each(|(column, _)| validate_identifier(column))
}

fn insert_row(db: &Database, table: &str, fields: &[(&'static str, Value)]) -> Result<i64> {
    validate_columns(table, fields)?;

    let sql = if fields.is_empty() {
        format!("INSERT INTO {} DEFAULT VALUES", quote_identifier(table))
    } else {
        let columns: Vec<String> = fields.iter().map(|(c, _)| quote_identifier(c)).collect();
        let placeholders: Vec<String> = fields.iter().map(|(c, _)| format!(":{c}")).collect();
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_identifier(table),
            columns.join(", "),
            placeholders.join(", ")
        )
    };
    let params: Vec<(String, Value)> = fields
        .iter()
        .map(|(column, value)| (column.to_string(), value.clone()))
        .collect();

    tracing::debug!(table, columns = fields.len(), "inserting record");
    db.execute(&sql, &params)
        .map_err(|e| e.with_context(format!("insert into {table}")))?;
    db.last_insert_id()
}

fn update_row(
    db: &Database,
    table: &str,
    primary_key: &str,
    id: i64,
    fields: &[(&'static str, Value)],
) -> Result<()> {
    validate_columns(table, fields)?;
    validate_identifier(primary_key)?;
    if fields.is_empty() {
        return Ok(());
    }

    let assignments: Vec<String> = fields
        .iter()
        .map(|(column, _)| format!("{} = :set_{column}", quote_identifier(column)))
        .collect();
    let sql = format!(
        "UPDATE {} SET {} WHERE {} = :key_{primary_key}",
        quote_identifier(table),
        assignments.join(", "),
        quote_identifier(primary_key)
    );
    let mut params: Vec<(String, Value)> = fields
        .iter()
        .map(|(column, value)| (format!("set_{column}"), value.clone()))
        .collect();
    params.push((format!("key_{primary_key}"), Value::Integer(id)));

    let affected = db
        .execute(&sql, &params)
        .map_err(|e| e.with_context(format!("update {table}")))?;
    tracing::debug!(table, id, affected, "updated record");
    Ok(())
}

fn delete_row(db: &Database, table: &str, primary_key: &str, id: i64) -> Result<()> {
    validate_identifier(table)?;
    validate_identifier(primary_key)?;

    let sql = format!(
        "DELETE FROM {} WHERE {} = :key_{primary_key}",
        quote_identifier(table),
        quote_identifier(primary_key)
    );
    let affected = db
        .execute(&sql, &[(format!("key_{primary_key}"), Value::Integer(id))])
        .map_err(|e| e.with_context(format!("delete from {table}")))?;
    tracing::debug!(table, id, affected, "deleted record");
    Ok(())
}
