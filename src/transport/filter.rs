//! Filter chains attached to transports at installation time.
//!
//! Inbound messages run through the chain front to back; replies run back to
//! front.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::config::ChannelArgs;

/// Name of the server-side adaptation filter.
pub const SERVER_ADAPTATION_FILTER: &str = "http_server";

/// Name of the general protocol filter.
pub const PROTOCOL_FILTER: &str = "http";

/// Error raised by a filter to reject a message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
    #[error("message of {size} bytes exceeds limit of {limit}")]
    MessageTooLarge { size: usize, limit: usize },

    #[error("empty message")]
    EmptyMessage,

    #[error("{filter}: {reason}")]
    Rejected { filter: &'static str, reason: String },
}

/// One request-processing stage.
pub trait Filter: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    /// Inspect or rewrite an inbound message.
    fn on_inbound(&self, message: Vec<u8>) -> Result<Vec<u8>, FilterError> {
        Ok(message)
    }

    /// Inspect or rewrite an outbound reply.
    fn on_outbound(&self, message: Vec<u8>) -> Result<Vec<u8>, FilterError> {
        Ok(message)
    }
}

/// Ordered list of filters.
#[derive(Debug, Clone, Default)]
pub struct FilterChain {
    filters: Vec<Arc<dyn Filter>>,
}

impl FilterChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, filter: Arc<dyn Filter>) {
        self.filters.push(filter);
    }

    pub fn extend(&mut self, filters: impl IntoIterator<Item = Arc<dyn Filter>>) {
        self.filters.extend(filters);
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.filters.iter().map(|f| f.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn process_inbound(&self, message: Vec<u8>) -> Result<Vec<u8>, FilterError> {
        self.filters
            .iter()
            .try_fold(message, |message, filter| filter.on_inbound(message))
    }

    pub fn process_outbound(&self, message: Vec<u8>) -> Result<Vec<u8>, FilterError> {
        self.filters
            .iter()
            .rev()
            .try_fold(message, |message, filter| filter.on_outbound(message))
    }
}

/// Server-side adaptation: enforces the inbound size limit.
#[derive(Debug, Clone)]
pub struct ServerAdaptationFilter {
    max_message_size: usize,
}

impl ServerAdaptationFilter {
    pub fn new(args: &ChannelArgs) -> Self {
        Self {
            max_message_size: args.max_message_size,
        }
    }
}

impl Filter for ServerAdaptationFilter {
    fn name(&self) -> &'static str {
        SERVER_ADAPTATION_FILTER
    }

    fn on_inbound(&self, message: Vec<u8>) -> Result<Vec<u8>, FilterError> {
        if message.len() > self.max_message_size {
            return Err(FilterError::MessageTooLarge {
                size: message.len(),
                limit: self.max_message_size,
            });
        }
        Ok(message)
    }
}

/// General protocol filter: every message must carry a payload.
#[derive(Debug, Clone, Default)]
pub struct ProtocolFilter;

impl Filter for ProtocolFilter {
    fn name(&self) -> &'static str {
        PROTOCOL_FILTER
    }

    fn on_inbound(&self, message: Vec<u8>) -> Result<Vec<u8>, FilterError> {
        if message.is_empty() {
            return Err(FilterError::EmptyMessage);
        }
        Ok(message)
    }
}

/// The fixed filters every server transport gets, in order.
pub fn extra_server_filters(args: &ChannelArgs) -> [Arc<dyn Filter>; 2] {
    [
        Arc::new(ServerAdaptationFilter::new(args)),
        Arc::new(ProtocolFilter),
    ]
}
