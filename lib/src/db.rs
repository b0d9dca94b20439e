//! Reading from the DATASUS MySQL database.
//!
//! A connection is opened for each call and closed once the rows are read. The driver is async,
//! so each call runs to completion on its own current-thread runtime.
use crate::{config::DbConfig, frame::Frame, ArcStr, Context, Result};
use itertools::Itertools;
use qu::ick_use::*;
use sqlx::{
    mysql::{MySqlConnectOptions, MySqlConnection, MySqlRow},
    Connection, FromRow, Row,
};
use std::future::Future;

/// A `SELECT` over one table. Every column is cast to text, so any column type can be read into
/// optional strings.
#[derive(Debug, Clone, Copy)]
pub struct TableQuery<'a> {
    pub table: &'a str,
    pub columns: &'a [&'a str],
    /// A trusted SQL predicate, e.g. `co_status = 'ATIVO'`.
    pub filter: Option<&'a str>,
}

impl<'a> TableQuery<'a> {
    pub fn new(table: &'a str, columns: &'a [&'a str]) -> Self {
        Self {
            table,
            columns,
            filter: None,
        }
    }

    pub fn with_filter(mut self, filter: &'a str) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn sql(&self) -> Result<String> {
        ensure!(
            is_identifier(self.table),
            "invalid table name \"{}\"",
            self.table
        );
        let select = if self.columns.is_empty() {
            "*".to_owned()
        } else {
            for column in self.columns {
                ensure!(is_identifier(column), "invalid column name \"{}\"", column);
            }
            self.columns.iter().map(|col| cast_column(col)).join(", ")
        };
        let mut sql = format!("SELECT {} FROM `{}`", select, self.table);
        if let Some(filter) = self.filter {
            sql.push_str(" WHERE ");
            sql.push_str(filter);
        }
        Ok(sql)
    }
}

fn cast_column(name: &str) -> String {
    format!("CAST(`{0}` AS CHAR) AS `{0}`", name)
}

fn is_identifier(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
}

/// Run a query and decode every row.
pub fn fetch<T>(config: &DbConfig, query: &TableQuery) -> Result<Vec<T>>
where
    T: for<'r> FromRow<'r, MySqlRow> + Send + Unpin,
{
    let sql = query.sql()?;
    block_on(fetch_async(config, query.table, &sql))
}

async fn fetch_async<T>(config: &DbConfig, table: &str, sql: &str) -> Result<Vec<T>>
where
    T: for<'r> FromRow<'r, MySqlRow> + Send + Unpin,
{
    let mut conn = connect(config).await?;
    let rows = sqlx::query_as::<_, T>(sql)
        .fetch_all(&mut conn)
        .await
        .with_context(|| format!("while reading table `{}`", table))?;
    conn.close().await?;
    Ok(rows)
}

/// Like `fetch`, but a failure is logged and yields no rows.
pub fn fetch_or_empty<T>(config: &DbConfig, query: &TableQuery) -> Vec<T>
where
    T: for<'r> FromRow<'r, MySqlRow> + Send + Unpin,
{
    match fetch(config, query) {
        Ok(rows) => {
            event!(
                Level::INFO,
                "loaded {} rows from `{}`",
                rows.len(),
                query.table
            );
            rows
        }
        Err(error) => {
            event!(
                Level::ERROR,
                "could not load `{}`: {:#}",
                query.table,
                error
            );
            vec![]
        }
    }
}

/// Every column of `table` as text, for rows where `filter_column` equals `value`.
///
/// Column names are read from `INFORMATION_SCHEMA` first so that every column can be cast.
pub fn fetch_extract(
    config: &DbConfig,
    table: &str,
    filter_column: &str,
    value: &str,
) -> Result<Frame> {
    ensure!(is_identifier(table), "invalid table name \"{}\"", table);
    ensure!(
        is_identifier(filter_column),
        "invalid column name \"{}\"",
        filter_column
    );
    block_on(fetch_extract_async(config, table, filter_column, value))
}

async fn fetch_extract_async(
    config: &DbConfig,
    table: &str,
    filter_column: &str,
    value: &str,
) -> Result<Frame> {
    let mut conn = connect(config).await?;
    let columns: Vec<(String,)> = sqlx::query_as(
        "SELECT CAST(COLUMN_NAME AS CHAR) FROM INFORMATION_SCHEMA.COLUMNS \
         WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ? ORDER BY ORDINAL_POSITION",
    )
    .bind(&config.database)
    .bind(table)
    .fetch_all(&mut conn)
    .await
    .context("while listing columns")?;
    ensure!(!columns.is_empty(), "table `{}` has no columns", table);
    let columns: Vec<String> = columns.into_iter().map(|(name,)| name).collect();
    for column in columns.iter() {
        ensure!(is_identifier(column), "unexpected column name \"{}\"", column);
    }

    let sql = format!(
        "SELECT {} FROM `{}` WHERE `{}` = ?",
        columns.iter().map(|col| cast_column(col)).join(", "),
        table,
        filter_column
    );
    let rows = sqlx::query(&sql)
        .bind(value)
        .fetch_all(&mut conn)
        .await
        .with_context(|| format!("while reading table `{}`", table))?;
    conn.close().await?;

    let mut cells = Vec::with_capacity(rows.len());
    for row in rows {
        let row = (0..columns.len())
            .map(|idx| -> Result<Option<ArcStr>> {
                let value: Option<String> = row.try_get(idx)?;
                Ok(value.map(ArcStr::from))
            })
            .collect::<Result<Vec<_>>>()?;
        cells.push(row);
    }
    Frame::new(columns.into_iter().map(ArcStr::from).collect(), cells)
}

async fn connect(config: &DbConfig) -> Result<MySqlConnection> {
    let options = MySqlConnectOptions::new()
        .host(&config.host)
        .port(config.port)
        .database(&config.database)
        .username(&config.user)
        .password(&config.password);
    MySqlConnection::connect_with(&options).await.with_context(|| {
        format!(
            "could not connect to {}@{}:{}/{}",
            config.user, config.host, config.port, config.database
        )
    })
}

fn block_on<T>(fut: impl Future<Output = Result<T>>) -> Result<T> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("could not start database runtime")?;
    runtime.block_on(fut)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn select_casts_columns() {
        let sql = TableQuery::new("tb_municip", &["co_municip", "ds_nome"])
            .with_filter("co_status = 'ATIVO'")
            .sql()
            .unwrap();
        assert_eq!(
            sql,
            "SELECT CAST(`co_municip` AS CHAR) AS `co_municip`, \
             CAST(`ds_nome` AS CHAR) AS `ds_nome` FROM `tb_municip` WHERE co_status = 'ATIVO'"
        );
    }

    #[test]
    fn rejects_bad_identifiers() {
        assert!(TableQuery::new("pars; DROP", &[]).sql().is_err());
        assert!(TableQuery::new("pars", &["a b"]).sql().is_err());
        assert_eq!(
            TableQuery::new("pars", &[]).sql().unwrap(),
            "SELECT * FROM `pars`"
        );
    }

    #[test]
    fn unreachable_database_gives_no_rows() {
        let config = DbConfig {
            host: "127.0.0.1".into(),
            port: 1,
            ..DbConfig::default()
        };
        let rows: Vec<(Option<String>,)> =
            fetch_or_empty(&config, &TableQuery::new("s_cid", &["cd_cod"]));
        assert!(rows.is_empty());
    }
}
