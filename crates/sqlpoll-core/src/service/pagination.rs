use std::iter::FusedIterator;

use serde::{Deserialize, Serialize};

use crate::models::{
    CoreError, CoreErrorKind, QueryExecutionId, QueryOperation, ResultPage, ResultSet,
};
use crate::service::{QueryService, ServiceResult};

pub const DEFAULT_PAGE_SIZE: u32 = 1000;

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct PaginationConfig {
    /// Cap on rows yielded across all pages.
    pub max_items: Option<usize>,
    /// Rows requested per service call.
    pub page_size: Option<u32>,
    /// A resume token from an earlier traversal, or a plain service continuation token.
    pub starting_token: Option<String>,
}

impl PaginationConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_items(mut self, max_items: usize) -> Self {
        self.max_items = Some(max_items);
        self
    }

    pub fn page_size(mut self, page_size: u32) -> Self {
        self.page_size = Some(page_size);
        self
    }

    pub fn starting_token(mut self, token: impl Into<String>) -> Self {
        self.starting_token = Some(token.into());
        self
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ResumeToken {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    next_token: Option<String>,
    skip: usize,
}

fn encode_resume_token(next_token: Option<String>, skip: usize) -> Option<String> {
    serde_json::to_string(&ResumeToken { next_token, skip }).ok()
}

fn decode_starting_token(token: Option<String>) -> (Option<String>, usize) {
    let Some(token) = token.filter(|token| !token.is_empty()) else {
        return (None, 0);
    };

    match serde_json::from_str::<ResumeToken>(&token) {
        Ok(resume) => (resume.next_token, resume.skip),
        Err(_) => (Some(token), 0),
    }
}

/// Finite, single-pass page sequence. A new traversal starts from `resume_token()`.
pub struct ResultPages<'a> {
    service: &'a dyn QueryService,
    execution_id: QueryExecutionId,
    page_size: u32,
    remaining: Option<usize>,
    request_token: Option<String>,
    skip: usize,
    resume_token: Option<String>,
    pages_fetched: usize,
    finished: bool,
}

impl<'a> ResultPages<'a> {
    pub fn new(
        service: &'a dyn QueryService,
        execution_id: QueryExecutionId,
        config: PaginationConfig,
    ) -> Self {
        let (request_token, skip) = decode_starting_token(config.starting_token);
        Self {
            service,
            execution_id,
            page_size: config.page_size.unwrap_or(DEFAULT_PAGE_SIZE),
            remaining: config.max_items,
            request_token,
            skip,
            resume_token: None,
            pages_fetched: 0,
            finished: false,
        }
    }

    pub fn execution_id(&self) -> &QueryExecutionId {
        &self.execution_id
    }

    pub fn pages_fetched(&self) -> usize {
        self.pages_fetched
    }

    /// Set once the item cap stops the traversal while more rows remain.
    pub fn resume_token(&self) -> Option<&str> {
        self.resume_token.as_deref()
    }

    /// Drains the remaining pages into one result set.
    pub fn build_full_result(mut self) -> ServiceResult<ResultSet> {
        let mut result = ResultSet::default();
        for page in self.by_ref() {
            let page = page?;
            if result.pages == 0 {
                result.columns = page.columns;
            }
            result.rows.extend(page.rows);
            result.pages += 1;
        }
        result.next_token = self.resume_token.take();
        Ok(result)
    }

    fn stop_at_cap(&mut self, continuation: Option<String>, skip: usize) {
        self.resume_token = encode_resume_token(continuation, skip);
        self.remaining = Some(0);
        self.finished = true;
    }
}

impl Iterator for ResultPages<'_> {
    type Item = ServiceResult<ResultPage>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        if self.remaining == Some(0) {
            self.finished = true;
            return None;
        }

        let mut page = match self.service.get_results(
            &self.execution_id,
            self.page_size,
            self.request_token.as_deref(),
        ) {
            Ok(page) => page,
            Err(error) => {
                self.finished = true;
                return Some(Err(
                    error.attribute(QueryOperation::Paginate, Some(&self.execution_id))
                ));
            }
        };
        self.pages_fetched += 1;

        if let Some(sent) = self.request_token.as_deref()
            && page.next_token.as_deref() == Some(sent)
        {
            self.finished = true;
            return Some(Err(CoreError::new(
                CoreErrorKind::Service,
                format!("service returned continuation token '{sent}' twice in a row"),
            )
            .operation(QueryOperation::Paginate)
            .execution_id(&self.execution_id)));
        }

        let offset = std::mem::take(&mut self.skip);
        if offset > 0 {
            page.rows.drain(..offset.min(page.rows.len()));
        }

        if let Some(remaining) = self.remaining {
            if page.rows.len() > remaining {
                page.rows.truncate(remaining);
                page.next_token = None;
                let continuation = self.request_token.clone();
                self.stop_at_cap(continuation, offset + remaining);
                return Some(Ok(page));
            }
            self.remaining = Some(remaining - page.rows.len());
        }

        match page.next_token.clone().filter(|token| !token.is_empty()) {
            Some(token) => {
                if self.remaining == Some(0) {
                    self.stop_at_cap(Some(token.clone()), 0);
                }
                self.request_token = Some(token);
            }
            None => self.finished = true,
        }

        Some(Ok(page))
    }
}

impl FusedIterator for ResultPages<'_> {}

#[cfg(test)]
mod tests {
    use super::{ResumeToken, decode_starting_token, encode_resume_token};

    #[test]
    fn plain_tokens_pass_through_unchanged() {
        assert_eq!(
            decode_starting_token(Some("abc123".to_string())),
            (Some("abc123".to_string()), 0)
        );
        assert_eq!(decode_starting_token(Some(String::new())), (None, 0));
        assert_eq!(decode_starting_token(None), (None, 0));
    }

    #[test]
    fn resume_tokens_round_trip_offset() {
        let token = encode_resume_token(Some("page-2".to_string()), 3).unwrap();
        let decoded: ResumeToken = serde_json::from_str(&token).unwrap();
        assert_eq!(decoded.next_token.as_deref(), Some("page-2"));
        assert_eq!(decoded.skip, 3);

        assert_eq!(
            decode_starting_token(Some(token)),
            (Some("page-2".to_string()), 3)
        );
    }

    #[test]
    fn first_page_resume_token_has_no_continuation() {
        let token = encode_resume_token(None, 5).unwrap();
        assert_eq!(decode_starting_token(Some(token)), (None, 5));
    }
}
