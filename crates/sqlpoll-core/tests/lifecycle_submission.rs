use std::sync::Arc;
use std::time::Duration;

use sqlpoll_core::lifecycle::{ManagerConfig, QueryLifecycleManager, Sleeper};
use sqlpoll_core::models::{
    CoreError, CoreErrorKind, DEFAULT_WORKGROUP, QueryContext, QueryExecutionId, QueryOperation,
    QueryRequest, ResultConfiguration,
};
use sqlpoll_core::service::{InMemoryQueryService, QueryService};

struct NoopSleeper;

impl Sleeper for NoopSleeper {
    fn sleep(&self, _duration: Duration) {}
}

fn manager(service: &InMemoryQueryService) -> QueryLifecycleManager<InMemoryQueryService> {
    QueryLifecycleManager::with_config(
        service.clone(),
        ManagerConfig::new().sleep_time(Duration::ZERO),
    )
    .with_sleeper(Arc::new(NoopSleeper))
}

#[test]
fn run_query_sends_full_request_and_returns_service_id() {
    let service = InMemoryQueryService::new();
    let manager = manager(&service);

    let request = QueryRequest::new("SELECT * FROM events")
        .context(QueryContext::new().with("Database", "analytics"))
        .result_configuration(ResultConfiguration::new().with_output_location("s3://bucket/out/"))
        .workgroup("reporting")
        .client_request_token("req-1");

    let execution_id = manager.run_query(request).unwrap();
    assert_eq!(execution_id.as_str(), "exec-1");

    let submissions = service.submissions();
    assert_eq!(submissions.len(), 1);
    let sent = &submissions[0];
    assert_eq!(sent.query, "SELECT * FROM events");
    assert_eq!(sent.context.get("Database"), Some("analytics"));
    assert_eq!(
        sent.result_configuration.output_location(),
        Some("s3://bucket/out/")
    );
    assert_eq!(sent.workgroup, "reporting");
    assert_eq!(sent.client_request_token.as_deref(), Some("req-1"));
}

#[test]
fn defaults_apply_when_optional_inputs_are_omitted() {
    let service = InMemoryQueryService::new();
    let manager = manager(&service);

    manager
        .run_query(QueryRequest::new("SELECT 1").client_request_token(""))
        .unwrap();

    let sent = &service.submissions()[0];
    assert_eq!(sent.workgroup, DEFAULT_WORKGROUP);
    assert_eq!(sent.client_request_token, None);
    assert!(sent.context.is_empty());
}

#[test]
fn quiet_manager_still_submits() {
    let service = InMemoryQueryService::new();
    let manager =
        QueryLifecycleManager::with_config(service.clone(), ManagerConfig::new().log_query(false));

    let execution_id = manager.run_query(QueryRequest::new("SELECT 1")).unwrap();

    assert!(!manager.config().log_query);
    assert_eq!(
        service
            .get_execution(&execution_id)
            .unwrap()
            .and_then(|record| record.query),
        Some("SELECT 1".to_string())
    );
}

#[test]
fn empty_query_is_invalid_argument_without_service_call() {
    let service = InMemoryQueryService::new();
    let manager = manager(&service);

    let error = manager.run_query(QueryRequest::new("")).unwrap_err();

    assert_eq!(error.kind, CoreErrorKind::InvalidArgument);
    assert_eq!(error.operation, Some(QueryOperation::Submit));
    assert!(service.submissions().is_empty());
}

#[test]
fn service_submission_errors_propagate_unchanged() {
    let service = InMemoryQueryService::new();
    service.fail_submissions(CoreError::new(
        CoreErrorKind::Service,
        "workgroup is disabled",
    ));
    let manager = manager(&service);

    let error = manager.run_query(QueryRequest::new("SELECT 1")).unwrap_err();

    assert_eq!(error.kind, CoreErrorKind::Service);
    assert_eq!(error.message, "workgroup is disabled");
    assert_eq!(error.operation, Some(QueryOperation::Submit));
}

#[test]
fn stop_query_returns_raw_response_and_status_reads_cancelled() {
    let service = InMemoryQueryService::new();
    let manager = manager(&service);
    let execution_id = manager.run_query(QueryRequest::new("SELECT 1")).unwrap();

    let response = manager.stop_query(&execution_id).unwrap();

    assert_eq!(response["QueryExecutionId"], "exec-1");
    assert_eq!(service.cancel_requests(&execution_id), 1);
    assert_eq!(
        manager.check_query_status(&execution_id),
        Some(sqlpoll_core::models::QueryState::Cancelled)
    );
}

#[test]
fn stop_query_on_unknown_execution_propagates_not_found() {
    let service = InMemoryQueryService::new();
    let manager = manager(&service);

    let error = manager
        .stop_query(&QueryExecutionId::from("missing"))
        .unwrap_err();

    assert_eq!(error.kind, CoreErrorKind::NotFound);
    assert_eq!(error.operation, Some(QueryOperation::Stop));
}
