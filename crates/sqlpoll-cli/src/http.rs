use std::time::Duration;

use serde::Deserialize;
use sqlpoll_core::models::{
    CoreError, CoreErrorKind, QueryExecutionId, QueryExecutionRecord, QueryOperation,
    QueryRequest, ResultPage,
};
use sqlpoll_core::service::{QueryService, ServiceResult};
use url::Url;

pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Blocking JSON-over-HTTP query service.
pub struct HttpQueryService {
    agent: ureq::Agent,
    endpoint: Url,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SubmitResponse {
    query_execution_id: QueryExecutionId,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GetExecutionResponse {
    #[serde(default)]
    query_execution: Option<QueryExecutionRecord>,
}

impl HttpQueryService {
    /// Fails unless `endpoint` is an absolute http(s) URL.
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, CoreError> {
        let endpoint = Url::parse(endpoint.trim()).map_err(|error| {
            CoreError::new(
                CoreErrorKind::InvalidArgument,
                format!("invalid service endpoint '{endpoint}': {error}"),
            )
        })?;
        if !matches!(endpoint.scheme(), "http" | "https") || endpoint.cannot_be_a_base() {
            return Err(CoreError::new(
                CoreErrorKind::InvalidArgument,
                format!("service endpoint '{endpoint}' must be an http or https URL"),
            ));
        }

        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Ok(Self { agent, endpoint })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn route(&self, segments: &[&str]) -> Url {
        let mut url = self.endpoint.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }
}

impl QueryService for HttpQueryService {
    fn submit(&self, request: &QueryRequest) -> ServiceResult<QueryExecutionId> {
        let url = self.route(&["queries"]);
        let response = self
            .agent
            .request_url("POST", &url)
            .send_json(request)
            .map_err(|error| request_error(error, QueryOperation::Submit, None))?;

        let decoded: SubmitResponse = decode(response, QueryOperation::Submit, None)?;
        Ok(decoded.query_execution_id)
    }

    fn get_execution(
        &self,
        execution_id: &QueryExecutionId,
    ) -> ServiceResult<Option<QueryExecutionRecord>> {
        let url = self.route(&["queries", execution_id.as_str()]);
        let response = match self.agent.request_url("GET", &url).call() {
            Ok(response) => response,
            Err(ureq::Error::Status(404, _)) => return Ok(None),
            Err(error) => {
                return Err(request_error(
                    error,
                    QueryOperation::CheckStatus,
                    Some(execution_id),
                ));
            }
        };

        let decoded: GetExecutionResponse =
            decode(response, QueryOperation::CheckStatus, Some(execution_id))?;
        Ok(decoded.query_execution)
    }

    fn get_results(
        &self,
        execution_id: &QueryExecutionId,
        max_results: u32,
        next_token: Option<&str>,
    ) -> ServiceResult<ResultPage> {
        let mut url = self.route(&["queries", execution_id.as_str(), "results"]);
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("max_results", &max_results.to_string());
            if let Some(token) = next_token {
                query.append_pair("next_token", token);
            }
        }

        let response = self
            .agent
            .request_url("GET", &url)
            .call()
            .map_err(|error| {
                request_error(error, QueryOperation::FetchResults, Some(execution_id))
            })?;
        decode(response, QueryOperation::FetchResults, Some(execution_id))
    }

    fn cancel(&self, execution_id: &QueryExecutionId) -> ServiceResult<serde_json::Value> {
        let url = self.route(&["queries", execution_id.as_str(), "cancel"]);
        let response = self
            .agent
            .request_url("POST", &url)
            .call()
            .map_err(|error| request_error(error, QueryOperation::Stop, Some(execution_id)))?;
        decode(response, QueryOperation::Stop, Some(execution_id))
    }
}

fn decode<T: serde::de::DeserializeOwned>(
    response: ureq::Response,
    operation: QueryOperation,
    execution_id: Option<&QueryExecutionId>,
) -> ServiceResult<T> {
    response.into_json::<T>().map_err(|error| {
        CoreError::new(
            CoreErrorKind::ParseFailure,
            format!("failed to decode service response: {error}"),
        )
        .attribute(operation, execution_id)
    })
}

fn request_error(
    error: ureq::Error,
    operation: QueryOperation,
    execution_id: Option<&QueryExecutionId>,
) -> CoreError {
    let error = match error {
        ureq::Error::Status(code, response) => {
            let body = response
                .into_string()
                .map(|body| body.trim().to_string())
                .unwrap_or_default();
            status_error(code, &body)
        }
        ureq::Error::Transport(transport) => {
            CoreError::new(CoreErrorKind::Transport, transport.to_string())
        }
    };
    error.attribute(operation, execution_id)
}

fn status_error(code: u16, body: &str) -> CoreError {
    match code {
        404 => CoreError::new(
            CoreErrorKind::NotFound,
            format!("service returned 404: {body}"),
        ),
        400..=499 => CoreError::new(
            CoreErrorKind::InvalidArgument,
            format!("service rejected request ({code}): {body}"),
        ),
        _ => CoreError::new(
            CoreErrorKind::Service,
            format!("service error ({code}): {body}"),
        ),
    }
}

#[cfg(test)]
mod tests {
    use std::io::{BufRead, BufReader, Write};
    use std::net::TcpListener;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    use sqlpoll_core::lifecycle::QueryLifecycleManager;
    use sqlpoll_core::models::{CoreErrorKind, QueryExecutionId, QueryOperation, QueryState};
    use sqlpoll_core::service::QueryService;

    use super::{GetExecutionResponse, HttpQueryService, SubmitResponse, status_error};

    /// Serves one canned response per connection and reports each request line.
    fn serve(responses: Vec<(u16, &'static str)>) -> (String, mpsc::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let endpoint = format!("http://{}/api/", listener.local_addr().unwrap());
        let (sender, receiver) = mpsc::channel();

        thread::spawn(move || {
            for (code, body) in responses {
                let Ok((stream, _)) = listener.accept() else {
                    return;
                };
                let mut reader = BufReader::new(stream);
                let mut request_line = String::new();
                reader.read_line(&mut request_line).unwrap();
                loop {
                    let mut header = String::new();
                    reader.read_line(&mut header).unwrap();
                    if header.trim().is_empty() {
                        break;
                    }
                }
                let _ = sender.send(request_line.trim().to_string());

                let mut stream = reader.into_inner();
                write!(
                    stream,
                    "HTTP/1.1 {code} Canned\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                )
                .unwrap();
            }
        });

        (endpoint, receiver)
    }

    fn service(endpoint: &str) -> HttpQueryService {
        HttpQueryService::new(endpoint, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn endpoint_must_be_absolute_http_url() {
        for endpoint in ["localhost:8080", "not a url", "ftp://files.example.com", ""] {
            let error = HttpQueryService::new(endpoint, Duration::from_secs(1))
                .err()
                .unwrap();
            assert_eq!(error.kind, CoreErrorKind::InvalidArgument, "{endpoint}");
        }
    }

    #[test]
    fn routes_extend_endpoint_path_and_encode_ids() {
        let with_slash = service("http://localhost:8080/api/");
        let without_slash = service("http://localhost:8080/api");

        for client in [with_slash, without_slash] {
            assert_eq!(
                client.route(&["queries", "a/b c"]).as_str(),
                "http://localhost:8080/api/queries/a%2Fb%20c"
            );
        }
        assert_eq!(
            service("http://localhost:8080").route(&["queries"]).as_str(),
            "http://localhost:8080/queries"
        );
    }

    #[test]
    fn status_codes_map_to_error_kinds() {
        assert_eq!(status_error(404, "").kind, CoreErrorKind::NotFound);
        assert_eq!(status_error(400, "bad").kind, CoreErrorKind::InvalidArgument);
        assert_eq!(status_error(429, "").kind, CoreErrorKind::InvalidArgument);
        assert_eq!(status_error(500, "").kind, CoreErrorKind::Service);
        assert_eq!(status_error(503, "").kind, CoreErrorKind::Service);
        assert!(status_error(400, "no such table").message.contains("no such table"));
    }

    #[test]
    fn decodes_service_payloads() {
        let submitted: SubmitResponse =
            serde_json::from_str(r#"{ "QueryExecutionId": "q-9" }"#).unwrap();
        assert_eq!(submitted.query_execution_id.as_str(), "q-9");

        let fetched: GetExecutionResponse = serde_json::from_str(
            r#"{ "QueryExecution": { "QueryExecutionId": "q-9", "Status": { "State": "RUNNING" } } }"#,
        )
        .unwrap();
        assert_eq!(
            fetched.query_execution.and_then(|record| record.raw_state().map(str::to_string)),
            Some("RUNNING".to_string())
        );
    }

    #[test]
    fn not_found_and_empty_body_mean_no_record() {
        let (endpoint, requests) = serve(vec![(404, r#"{"Message":"gone"}"#), (200, "{}")]);
        let manager = QueryLifecycleManager::new(service(&endpoint));
        let id = QueryExecutionId::from("q-1");

        for _ in 0..2 {
            let error = manager.get_output_location(&id).unwrap_err();
            assert_eq!(error.kind, CoreErrorKind::MissingField);
            assert_eq!(error.operation, Some(QueryOperation::OutputLocation));
        }
        assert_eq!(requests.recv().unwrap(), "GET /api/queries/q-1 HTTP/1.1");
    }

    #[test]
    fn execution_record_is_read_from_nested_payload() {
        let (endpoint, _requests) = serve(vec![(
            200,
            r#"{"QueryExecution":{"Status":{"State":"SUCCEEDED"},"ResultConfiguration":{"OutputLocation":"s3://bucket/q-1.csv"}}}"#,
        )]);
        let service = service(&endpoint);

        let record = service
            .get_execution(&QueryExecutionId::from("q-1"))
            .unwrap()
            .unwrap();
        assert_eq!(
            record.raw_state().and_then(QueryState::parse),
            Some(QueryState::Succeeded)
        );
        assert_eq!(record.output_location(), Some("s3://bucket/q-1.csv"));
    }

    #[test]
    fn error_statuses_propagate_with_operation() {
        let (endpoint, requests) = serve(vec![
            (500, "internal"),
            (400, r#"{"Message":"bad token"}"#),
        ]);
        let service = service(&endpoint);
        let id = QueryExecutionId::from("q-1");

        let error = service.get_execution(&id).unwrap_err();
        assert_eq!(error.kind, CoreErrorKind::Service);
        assert_eq!(error.operation, Some(QueryOperation::CheckStatus));
        assert_eq!(error.execution_id, Some(id.clone()));

        let error = service.get_results(&id, 10, Some("t 1")).unwrap_err();
        assert_eq!(error.kind, CoreErrorKind::InvalidArgument);
        assert_eq!(error.operation, Some(QueryOperation::FetchResults));

        requests.recv().unwrap();
        assert_eq!(
            requests.recv().unwrap(),
            "GET /api/queries/q-1/results?max_results=10&next_token=t+1 HTTP/1.1"
        );
    }
}
