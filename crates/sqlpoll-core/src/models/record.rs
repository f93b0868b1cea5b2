use serde::{Deserialize, Serialize};

use crate::models::{QueryExecutionId, ResultConfiguration};

/// Execution record as returned by the service. Every nested part is optional
/// because the service does not guarantee any of them.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct QueryExecutionRecord {
    #[serde(default, rename = "QueryExecutionId")]
    pub execution_id: QueryExecutionId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(default, rename = "WorkGroup", skip_serializing_if = "Option::is_none")]
    pub workgroup: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<QueryStatusRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_configuration: Option<ResultConfiguration>,
}

impl QueryExecutionRecord {
    pub fn new(execution_id: QueryExecutionId) -> Self {
        Self {
            execution_id,
            ..Self::default()
        }
    }

    pub fn raw_state(&self) -> Option<&str> {
        self.status.as_ref()?.state.as_deref()
    }

    pub fn state_change_reason(&self) -> Option<&str> {
        self.status.as_ref()?.state_change_reason.as_deref()
    }

    pub fn output_location(&self) -> Option<&str> {
        self.result_configuration.as_ref()?.output_location()
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct QueryStatusRecord {
    /// Raw state spelling; parsed by the lifecycle manager, not here.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_change_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submission_date_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_date_time: Option<String>,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ColumnInfo {
    pub name: String,
    #[serde(rename = "Type")]
    pub type_name: String,
}

pub type ResultRow = Vec<Option<String>>;

/// One page of results, passed through without interpreting the schema.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ResultPage {
    #[serde(default)]
    pub columns: Vec<ColumnInfo>,
    #[serde(default)]
    pub rows: Vec<ResultRow>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_token: Option<String>,
}

/// All pages of a traversal merged together.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ResultSet {
    pub columns: Vec<ColumnInfo>,
    pub rows: Vec<ResultRow>,
    pub pages: usize,
    /// Resume token when the traversal stopped at its item cap.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_token: Option<String>,
}
