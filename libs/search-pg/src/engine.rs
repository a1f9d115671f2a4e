//! Search engine - executes dynamic searches against PostgreSQL
//!
//! The engine is the single entry point for search-enabled services: it
//! validates the pagination envelope, resolves the entity configuration
//! from the registry, runs the count query and the data query on one
//! connection, and assembles the page.

use std::sync::Arc;

use sifter_core::config::SearchConfigRegistry;
use sifter_core::request::{Page, SearchRequest, MAX_PAGE_SIZE};
use sqlx::postgres::PgRow;
use sqlx::{FromRow, PgConnection, PgPool};
use tracing::debug;

use crate::error::{Error, Result};
use crate::query_builder::{BindValue, QueryBuilder, QueryFragment};

/// Executes searches for every registered entity.
pub struct SearchEngine {
    db_pool: PgPool,
    registry: Arc<SearchConfigRegistry>,
    max_page_size: u32,
}

impl SearchEngine {
    pub fn new(db_pool: PgPool, registry: Arc<SearchConfigRegistry>) -> Self {
        Self {
            db_pool,
            registry,
            max_page_size: MAX_PAGE_SIZE,
        }
    }

    pub fn with_max_page_size(mut self, max_page_size: u32) -> Self {
        self.max_page_size = max_page_size;
        self
    }

    /// Search a registered entity.
    pub async fn search<T>(&self, entity: &str, request: &SearchRequest) -> Result<Page<T>>
    where
        T: for<'r> FromRow<'r, PgRow> + Send + Unpin,
    {
        let mut conn = self.db_pool.acquire().await.map_err(Error::Database)?;
        self.search_with_connection(&mut conn, entity, request).await
    }

    /// Search using an existing connection (e.g. inside a transaction).
    pub async fn search_with_connection<T>(
        &self,
        conn: &mut PgConnection,
        entity: &str,
        request: &SearchRequest,
    ) -> Result<Page<T>>
    where
        T: for<'r> FromRow<'r, PgRow> + Send + Unpin,
    {
        self.run(conn, entity, request, None).await
    }

    /// Search with a caller-supplied base predicate appended to the
    /// generated one (see [`QueryFragment`] for the numbering contract).
    pub async fn search_with_base<T>(
        &self,
        entity: &str,
        request: &SearchRequest,
        base: &QueryFragment,
    ) -> Result<Page<T>>
    where
        T: for<'r> FromRow<'r, PgRow> + Send + Unpin,
    {
        let mut conn = self.db_pool.acquire().await.map_err(Error::Database)?;
        self.run(&mut conn, entity, request, Some(base)).await
    }

    async fn run<T>(
        &self,
        conn: &mut PgConnection,
        entity: &str,
        request: &SearchRequest,
        base: Option<&QueryFragment>,
    ) -> Result<Page<T>>
    where
        T: for<'r> FromRow<'r, PgRow> + Send + Unpin,
    {
        request.validate(self.max_page_size)?;

        let config = self
            .registry
            .get(entity)
            .ok_or_else(|| Error::UnknownEntity(entity.to_string()))?;

        let mut builder = QueryBuilder::new(config.as_ref(), request);
        if let Some(fragment) = base {
            builder = builder.with_base_fragment(fragment);
        }

        let (count_sql, count_binds) = builder.build_count_sql();
        debug!(entity, sql = %count_sql, "executing count query");
        let total = fetch_count(conn, &count_sql, count_binds).await?;

        // Pages past the end of the result set stay empty without touching
        // the database again.
        let content = if total > 0 && request.pagination.offset() < total {
            let (sql, binds) = builder.build_sql();
            debug!(entity, sql = %sql, "executing data query");
            fetch_rows(conn, &sql, binds).await?
        } else {
            Vec::new()
        };

        Ok(Page::new(
            content,
            request.pagination.page,
            request.pagination.size,
            total,
        ))
    }
}

async fn fetch_rows<T>(
    conn: &mut PgConnection,
    sql: &str,
    bind_values: Vec<BindValue>,
) -> Result<Vec<T>>
where
    T: for<'r> FromRow<'r, PgRow> + Send + Unpin,
{
    let mut query = sqlx::query_as::<_, T>(sql);
    for value in bind_values {
        query = match value {
            BindValue::Text(v) => query.bind(v),
            BindValue::Number(v) => query.bind(v),
            BindValue::DateTime(v) => query.bind(v),
            BindValue::TextArray(vs) => query.bind(vs),
        };
    }
    query.fetch_all(&mut *conn).await.map_err(Error::Database)
}

async fn fetch_count(
    conn: &mut PgConnection,
    sql: &str,
    bind_values: Vec<BindValue>,
) -> Result<i64> {
    let mut query = sqlx::query_scalar::<_, i64>(sql);
    for value in bind_values {
        query = match value {
            BindValue::Text(v) => query.bind(v),
            BindValue::Number(v) => query.bind(v),
            BindValue::DateTime(v) => query.bind(v),
            BindValue::TextArray(vs) => query.bind(vs),
        };
    }
    query.fetch_one(&mut *conn).await.map_err(Error::Database)
}
