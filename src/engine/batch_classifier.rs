use std::collections::HashSet;

use crate::utils::{
    error::{GateError, GateResult},
    types::{DataQuery, ResolvedSource},
};

/// A query paired with the data source it resolved to
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedQuery {
    pub source: Option<ResolvedSource>,
    pub query: DataQuery,
}

/// A parsed batch, classified as it is built
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedRequest {
    has_expression: bool,
    queries: Vec<ParsedQuery>,
}

impl ParsedRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a query, noting whether it targets the expression engine
    pub fn add(&mut self, source: Option<ResolvedSource>, query: DataQuery) {
        if source.as_ref().is_some_and(ResolvedSource::is_expression) {
            self.has_expression = true;
        }
        self.queries.push(ParsedQuery { source, query });
    }

    pub fn has_expression(&self) -> bool {
        self.has_expression
    }

    pub fn queries(&self) -> &[ParsedQuery] {
        &self.queries
    }

    pub fn len(&self) -> usize {
        self.queries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }

    /// Number of distinct data source uids referenced by the batch
    pub fn distinct_source_count(&self) -> usize {
        self.queries
            .iter()
            .filter_map(|q| q.source.as_ref())
            .map(ResolvedSource::uid)
            .collect::<HashSet<_>>()
            .len()
    }

    /// Reject batches mixing data sources without an expression to join them
    pub fn validate(&self) -> GateResult<()> {
        if !self.has_expression && self.distinct_source_count() > 1 {
            return Err(GateError::bad_query("all queries must use the same datasource"));
        }
        Ok(())
    }
}
