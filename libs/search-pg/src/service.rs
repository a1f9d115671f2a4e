//! Search-enabled service layer
//!
//! Reusable base behavior for domain services: supply the shared engine
//! and the registered entity name, inherit the paged search operations.

use async_trait::async_trait;
use sifter_core::request::{Page, SearchRequest};
use sqlx::postgres::PgRow;
use sqlx::FromRow;

use crate::engine::SearchEngine;
use crate::error::Result;
use crate::query_builder::QueryFragment;

#[async_trait]
pub trait SearchableService: Send + Sync {
    /// Row type the entity materializes into.
    type Entity: for<'r> FromRow<'r, PgRow> + Send + Unpin;

    fn engine(&self) -> &SearchEngine;

    /// Entity name as registered in the [`SearchConfigRegistry`].
    ///
    /// [`SearchConfigRegistry`]: sifter_core::config::SearchConfigRegistry
    fn entity_name(&self) -> &str;

    async fn search_page(&self, request: &SearchRequest) -> Result<Page<Self::Entity>> {
        self.engine().search(self.entity_name(), request).await
    }

    async fn search_page_with_base(
        &self,
        request: &SearchRequest,
        base: &QueryFragment,
    ) -> Result<Page<Self::Entity>> {
        self.engine()
            .search_with_base(self.entity_name(), request, base)
            .await
    }
}
