use async_trait::async_trait;
use thiserror::Error;

use crate::chart::ChartKind;
use crate::connection_session::ConnectionCredentials;
use crate::results_table::RowObject;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendReply<T> {
    Success(T),
    Failure(String),
    Missing,
}

impl<T> BackendReply<T> {
    /// Builds a reply from the optional wire fields. The error field wins, and
    /// empty strings count as absent.
    #[must_use]
    pub fn from_fields(payload: Option<T>, error: Option<String>) -> Self {
        if let Some(error) = error.filter(|message| !message.is_empty()) {
            return Self::Failure(error);
        }
        payload.map_or(Self::Missing, Self::Success)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct TransportError {
    message: String,
    detail: Option<String>,
}

impl TransportError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            detail: None,
        }
    }

    #[must_use]
    pub fn with_detail(message: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            detail: Some(detail.into()),
        }
    }

    #[must_use]
    pub fn surfaced(&self, fallback: &str) -> String {
        self.detail
            .clone()
            .unwrap_or_else(|| fallback.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectReply {
    pub status: Option<String>,
    pub message: Option<String>,
    pub error: Option<String>,
}

impl ConnectReply {
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.status.as_deref() == Some("success")
    }

    #[must_use]
    pub fn failure_message(&self) -> Option<&str> {
        self.message
            .as_deref()
            .filter(|message| !message.is_empty())
            .or_else(|| self.error.as_deref().filter(|error| !error.is_empty()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutedRows {
    pub rows: Vec<RowObject>,
    pub optimization_tips: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartPayload {
    pub image_base64: String,
    pub insights: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartRequest {
    pub sql: String,
    pub chart_type: ChartKind,
    pub chart_name: Option<String>,
}

#[async_trait]
pub trait QueryGateway: Send + Sync {
    async fn database_status(&self) -> Result<bool, TransportError>;

    async fn connect_database(
        &self,
        credentials: &ConnectionCredentials,
    ) -> Result<ConnectReply, TransportError>;

    async fn generate_sql(&self, prompt: &str) -> Result<BackendReply<String>, TransportError>;

    async fn execute_sql(&self, sql: &str)
        -> Result<BackendReply<ExecutedRows>, TransportError>;

    async fn download_csv(&self, sql: &str) -> Result<Vec<u8>, TransportError>;

    async fn generate_graph(
        &self,
        request: &ChartRequest,
    ) -> Result<BackendReply<ChartPayload>, TransportError>;
}


#[cfg(test)]
mod tests {
    use super::{BackendReply, ConnectReply, TransportError};

    #[test]
    fn error_field_takes_precedence_over_payload() {
        let reply = BackendReply::from_fields(Some("SELECT 1".to_string()), Some("boom".into()));
        assert_eq!(reply, BackendReply::Failure("boom".to_string()));
    }

    #[test]
    fn empty_strings_count_as_absent() {
        let reply: BackendReply<String> = BackendReply::from_fields(None, Some(String::new()));
        assert_eq!(reply, BackendReply::Missing);
    }

    #[test]
    fn surfaced_prefers_backend_detail() {
        let plain = TransportError::new("connection refused");
        assert_eq!(plain.surfaced("fallback"), "fallback");

        let detailed = TransportError::with_detail("400 Bad Request", "Database not connected.");
        assert_eq!(detailed.surfaced("fallback"), "Database not connected.");
    }

    #[test]
    fn connect_reply_reads_message_then_error() {
        let reply = ConnectReply {
            status: Some("error".to_string()),
            message: None,
            error: Some("Connection error: denied".to_string()),
        };
        assert!(!reply.succeeded());
        assert_eq!(reply.failure_message(), Some("Connection error: denied"));
    }
}
