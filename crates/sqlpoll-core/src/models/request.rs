use serde::{Deserialize, Serialize};

use crate::models::{CoreError, CoreErrorKind, QueryContext, QueryOperation, ResultConfiguration};

pub const DEFAULT_WORKGROUP: &str = "primary";

/// Everything the service needs to start one execution.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct QueryRequest {
    #[serde(rename = "QueryString")]
    pub query: String,
    #[serde(rename = "QueryExecutionContext")]
    pub context: QueryContext,
    pub result_configuration: ResultConfiguration,
    #[serde(rename = "WorkGroup")]
    pub workgroup: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_request_token: Option<String>,
}

impl QueryRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            context: QueryContext::default(),
            result_configuration: ResultConfiguration::default(),
            workgroup: DEFAULT_WORKGROUP.to_string(),
            client_request_token: None,
        }
    }

    pub fn context(mut self, context: QueryContext) -> Self {
        self.context = context;
        self
    }

    pub fn result_configuration(mut self, result_configuration: ResultConfiguration) -> Self {
        self.result_configuration = result_configuration;
        self
    }

    pub fn workgroup(mut self, workgroup: impl Into<String>) -> Self {
        self.workgroup = workgroup.into();
        self
    }

    /// An empty token is dropped so the service never sees a blank idempotency key.
    pub fn client_request_token(mut self, token: impl Into<String>) -> Self {
        let token = token.into();
        self.client_request_token = if token.is_empty() { None } else { Some(token) };
        self
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.query.trim().is_empty() {
            return Err(invalid_argument("query text must not be empty"));
        }

        if self.workgroup.trim().is_empty() {
            return Err(invalid_argument("workgroup must not be empty"));
        }

        Ok(())
    }
}

fn invalid_argument(message: &str) -> CoreError {
    CoreError::new(CoreErrorKind::InvalidArgument, message).operation(QueryOperation::Submit)
}

#[cfg(test)]
mod tests {
    use super::{DEFAULT_WORKGROUP, QueryRequest};
    use crate::models::{CoreErrorKind, QueryContext, ResultConfiguration};

    #[test]
    fn defaults_to_primary_workgroup_without_token() {
        let request = QueryRequest::new("SELECT 1");
        assert_eq!(request.workgroup, DEFAULT_WORKGROUP);
        assert_eq!(request.client_request_token, None);
    }

    #[test]
    fn empty_token_is_not_included() {
        let request = QueryRequest::new("SELECT 1").client_request_token("");
        assert_eq!(request.client_request_token, None);

        let encoded = serde_json::to_value(&request).unwrap();
        assert!(encoded.get("ClientRequestToken").is_none());
    }

    #[test]
    fn serializes_with_service_field_names() {
        let request = QueryRequest::new("SELECT * FROM events")
            .context(QueryContext::new().with("Database", "analytics"))
            .result_configuration(ResultConfiguration::new().with_output_location("s3://out/"))
            .workgroup("reporting")
            .client_request_token("token-1");

        let encoded = serde_json::to_value(&request).unwrap();
        assert_eq!(encoded["QueryString"], "SELECT * FROM events");
        assert_eq!(encoded["QueryExecutionContext"]["Database"], "analytics");
        assert_eq!(encoded["ResultConfiguration"]["OutputLocation"], "s3://out/");
        assert_eq!(encoded["WorkGroup"], "reporting");
        assert_eq!(encoded["ClientRequestToken"], "token-1");
    }

    #[test]
    fn rejects_blank_query_text() {
        let error = QueryRequest::new("   ").validate().unwrap_err();
        assert_eq!(error.kind, CoreErrorKind::InvalidArgument);
    }
}
