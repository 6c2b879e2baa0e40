//! Load functions - replace a PostgreSQL table with the contents of a Table

use crate::config::DatabaseConfig;
use crate::error::{EtlError, Result};
use crate::ingestion::types::{LoadStats, Table, Value};
use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::{Connection, Postgres, QueryBuilder};
use tracing::{debug, info, instrument, warn};

/// Postgres caps a statement at 65535 bind parameters
const MAX_BIND_PARAMS: usize = 65_535;
const MAX_ROWS_PER_INSERT: usize = 1_000;

/// Destination for the final table
#[async_trait]
pub trait TableSink {
    /// Replace the full contents of `table_name` with `table`
    async fn replace_table(&self, table: &Table, table_name: &str) -> Result<LoadStats>;
}

/// Column type chosen from the values a column holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlType {
    BigInt,
    Double,
    Text,
}

impl SqlType {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SqlType::BigInt => "BIGINT",
            SqlType::Double => "DOUBLE PRECISION",
            SqlType::Text => "TEXT",
        }
    }
}

/// Infer one SQL type per column
///
/// Any text makes a column TEXT; all-integral numbers make it BIGINT; other
/// numbers make it DOUBLE PRECISION. A column of only nulls is TEXT.
pub fn infer_column_types(table: &Table) -> Vec<SqlType> {
    (0..table.columns().len())
        .map(|idx| {
            let mut seen_number = false;
            let mut all_integral = true;

            for row in table.rows() {
                match &row[idx] {
                    Value::Null => {}
                    Value::Text(_) => return SqlType::Text,
                    Value::Number(n) => {
                        seen_number = true;
                        if n.fract() != 0.0 || *n < i64::MIN as f64 || *n >= i64::MAX as f64 {
                            all_integral = false;
                        }
                    }
                }
            }

            match (seen_number, all_integral) {
                (false, _) => SqlType::Text,
                (true, true) => SqlType::BigInt,
                (true, false) => SqlType::Double,
            }
        })
        .collect()
}

/// Quote an identifier for Postgres
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn create_table_sql(name: &str, table: &Table, types: &[SqlType]) -> String {
    let columns: Vec<String> = table
        .columns()
        .iter()
        .zip(types)
        .map(|(column, ty)| format!("{} {}", quote_ident(column), ty.as_sql()))
        .collect();

    format!("CREATE TABLE {} ({})", quote_ident(name), columns.join(", "))
}

fn rows_per_insert(columns: usize) -> usize {
    (MAX_BIND_PARAMS / columns.max(1)).clamp(1, MAX_ROWS_PER_INSERT)
}

fn text_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Number(n) => Some(n.to_string()),
        Value::Text(s) => Some(s.clone()),
    }
}

/// PostgreSQL sink; opens a fresh connection for every load
pub struct PgLoader {
    options: PgConnectOptions,
}

impl PgLoader {
    pub fn new(config: &DatabaseConfig) -> Self {
        Self::from_options(config.connect_options())
    }

    pub fn from_options(options: PgConnectOptions) -> Self {
        PgLoader { options }
    }

    async fn insert_rows(
        conn: &mut PgConnection,
        staging: &str,
        table: &Table,
        types: &[SqlType],
    ) -> Result<usize> {
        if table.columns().is_empty() {
            if !table.is_empty() {
                warn!("Table has {} rows but no columns, nothing to insert", table.len());
            }
            return Ok(0);
        }

        let column_list: Vec<String> = table.columns().iter().map(|c| quote_ident(c)).collect();
        let batch_size = rows_per_insert(table.columns().len());
        let mut inserted = 0;

        for chunk in table.rows().chunks(batch_size) {
            let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
                "INSERT INTO {} ({}) ",
                quote_ident(staging),
                column_list.join(", ")
            ));

            builder.push_values(chunk, |mut b, row| {
                for (value, ty) in row.iter().zip(types) {
                    match ty {
                        SqlType::BigInt => {
                            b.push_bind(value.as_f64().map(|n| n as i64));
                        }
                        SqlType::Double => {
                            b.push_bind(value.as_f64());
                        }
                        SqlType::Text => {
                            b.push_bind(text_value(value));
                        }
                    }
                }
            });

            let result = builder.build().execute(&mut *conn).await?;
            inserted += result.rows_affected() as usize;
            debug!("Inserted batch of {} rows into {}", chunk.len(), staging);
        }

        Ok(inserted)
    }
}

#[async_trait]
impl TableSink for PgLoader {
    /// Build the new table under a staging name, then swap it in
    ///
    /// Everything runs in one transaction, so readers see either the previous
    /// table or the complete new one, and a failed load leaves the previous
    /// table untouched.
    #[instrument(skip(self, table), fields(rows = table.len()))]
    async fn replace_table(&self, table: &Table, table_name: &str) -> Result<LoadStats> {
        info!("Loading {} rows into {}", table.len(), table_name);

        let mut conn = PgConnection::connect_with(&self.options)
            .await
            .map_err(|e| EtlError::Load(format!("Failed to connect to database: {}", e)))?;

        let staging = format!("etl_staging_{}", uuid::Uuid::new_v4().simple());
        let types = infer_column_types(table);

        let mut tx = conn.begin().await?;

        sqlx::query(&create_table_sql(&staging, table, &types))
            .execute(&mut *tx)
            .await?;
        debug!("Created staging table {}", staging);

        let inserted = Self::insert_rows(&mut *tx, &staging, table, &types).await?;

        sqlx::query(&format!("DROP TABLE IF EXISTS {}", quote_ident(table_name)))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!(
            "ALTER TABLE {} RENAME TO {}",
            quote_ident(&staging),
            quote_ident(table_name)
        ))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        conn.close().await?;

        let stats = LoadStats {
            table: table_name.to_string(),
            columns: table.columns().len(),
            inserted,
        };
        info!("Loaded data into {} table: {}", table_name, stats);

        Ok(stats)
    }
}
