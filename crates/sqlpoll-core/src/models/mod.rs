pub mod error;
pub mod operation;
pub mod query;
pub mod record;
pub mod request;

pub use error::{CoreError, CoreErrorKind};
pub use operation::QueryOperation;
pub use query::{
    FAILURE_STATES, INTERMEDIATE_STATES, OUTPUT_LOCATION_KEY, QueryContext, QueryExecutionId,
    QueryState, ResultConfiguration, SUCCESS_STATES, TERMINAL_STATES,
};
pub use record::{
    ColumnInfo, QueryExecutionRecord, QueryStatusRecord, ResultPage, ResultRow, ResultSet,
};
pub use request::{DEFAULT_WORKGROUP, QueryRequest};
