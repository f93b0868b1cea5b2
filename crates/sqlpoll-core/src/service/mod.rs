pub mod in_memory;
pub mod pagination;

pub use in_memory::{InMemoryQueryService, StatusLookup};
pub use pagination::{DEFAULT_PAGE_SIZE, PaginationConfig, ResultPages};

use crate::models::{CoreError, QueryExecutionId, QueryExecutionRecord, QueryRequest, ResultPage};

pub type ServiceResult<T> = Result<T, CoreError>;

/// The remote query execution service. Implementations own transport, auth and signing.
pub trait QueryService: Send + Sync {
    fn submit(&self, request: &QueryRequest) -> ServiceResult<QueryExecutionId>;

    /// `Ok(None)` means the service answered but returned no record.
    fn get_execution(
        &self,
        execution_id: &QueryExecutionId,
    ) -> ServiceResult<Option<QueryExecutionRecord>>;

    fn get_results(
        &self,
        execution_id: &QueryExecutionId,
        max_results: u32,
        next_token: Option<&str>,
    ) -> ServiceResult<ResultPage>;

    fn cancel(&self, execution_id: &QueryExecutionId) -> ServiceResult<serde_json::Value>;

    /// Lazy page sequence over `get_results`. Nothing is fetched until the first page is pulled.
    fn paginate_results(
        &self,
        execution_id: &QueryExecutionId,
        config: PaginationConfig,
    ) -> ResultPages<'_>
    where
        Self: Sized,
    {
        ResultPages::new(self, execution_id.clone(), config)
    }
}
