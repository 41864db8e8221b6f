use std::fmt;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::gateway::{ConnectReply, QueryGateway, TransportError};

pub const DEFAULT_DATABASE_PORT: u16 = 3306;

const CONNECT_FAILED: &str = "Failed to connect to database";
const CONNECT_TRANSPORT_FAILED: &str = "Failed to connect. Please check your credentials.";

#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionCredentials {
    pub host: String,
    pub user: String,
    pub password: String,
    pub database: String,
    pub port: u16,
}

impl ConnectionCredentials {
    #[must_use]
    pub fn new(
        host: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
        database: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            user: user.into(),
            password: password.into(),
            database: database.into(),
            port: DEFAULT_DATABASE_PORT,
        }
    }

    pub fn validate(&self) -> Result<(), ConnectionError> {
        if self.user.is_empty() || self.password.is_empty() || self.database.is_empty() {
            return Err(ConnectionError::MissingFields);
        }
        if self.port == 0 {
            return Err(ConnectionError::InvalidPort);
        }
        Ok(())
    }
}

impl fmt::Debug for ConnectionCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionCredentials")
            .field("host", &self.host)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("database", &self.database)
            .field("port", &self.port)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Unknown,
    Disconnected,
    Connected,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionError {
    #[error("Please fill in all required fields")]
    MissingFields,
    #[error("Port must be between 1 and 65535")]
    InvalidPort,
    #[error("database connection is already established")]
    AlreadyConnected,
    #[error("{0}")]
    Rejected(String),
    #[error("{0}")]
    Transport(String),
}

/// Gate in front of every workflow operation. Once connected it stays
/// connected for the lifetime of the session.
#[derive(Debug, Default)]
pub struct ConnectionSession {
    state: ConnectionState,
    connecting: bool,
    last_error: Option<ConnectionError>,
}

impl ConnectionSession {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    #[must_use]
    pub fn is_gated(&self) -> bool {
        !self.is_connected()
    }

    #[must_use]
    pub fn is_connecting(&self) -> bool {
        self.connecting
    }

    #[must_use]
    pub fn last_error(&self) -> Option<&ConnectionError> {
        self.last_error.as_ref()
    }

    pub fn clear_error(&mut self) {
        self.last_error = None;
    }

    pub fn complete_status(&mut self, outcome: Result<bool, TransportError>) {
        if self.is_connected() {
            return;
        }

        match outcome {
            Ok(true) => {
                info!("backend reports an established database connection");
                self.state = ConnectionState::Connected;
            }
            Ok(false) => self.state = ConnectionState::Disconnected,
            Err(error) => {
                warn!(%error, "database status check failed");
                self.state = ConnectionState::Disconnected;
            }
        }
    }

    pub fn begin_connect(
        &mut self,
        credentials: &ConnectionCredentials,
    ) -> Result<(), ConnectionError> {
        let validation = if self.is_connected() {
            Err(ConnectionError::AlreadyConnected)
        } else {
            credentials.validate()
        };

        if let Err(error) = validation {
            self.last_error = Some(error.clone());
            return Err(error);
        }

        debug!(?credentials, "connecting database through backend");
        self.connecting = true;
        self.last_error = None;
        Ok(())
    }

    pub fn complete_connect(
        &mut self,
        outcome: Result<ConnectReply, TransportError>,
    ) -> Result<(), ConnectionError> {
        self.connecting = false;

        let result = match outcome {
            Ok(reply) if reply.succeeded() => Ok(()),
            Ok(reply) => Err(ConnectionError::Rejected(
                reply.failure_message().unwrap_or(CONNECT_FAILED).to_string(),
            )),
            Err(error) => Err(ConnectionError::Transport(
                error.surfaced(CONNECT_TRANSPORT_FAILED),
            )),
        };

        match &result {
            Ok(()) => {
                info!("database connected");
                self.state = ConnectionState::Connected;
                self.last_error = None;
            }
            Err(error) => {
                warn!(%error, "database connect failed");
                if !self.is_connected() {
                    self.state = ConnectionState::Disconnected;
                }
                self.last_error = Some(error.clone());
            }
        }
        result
    }

    pub async fn check_status<G: QueryGateway + ?Sized>(&mut self, gateway: &G) -> ConnectionState {
        let outcome = gateway.database_status().await;
        self.complete_status(outcome);
        self.state
    }

    pub async fn connect<G: QueryGateway + ?Sized>(
        &mut self,
        gateway: &G,
        credentials: &ConnectionCredentials,
    ) -> Result<(), ConnectionError> {
        self.begin_connect(credentials)?;
        let outcome = gateway.connect_database(credentials).await;
        self.complete_connect(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::{ConnectionCredentials, ConnectionError, ConnectionSession, ConnectionState};
    use crate::gateway::fake::{queued, FakeGateway};
    use crate::gateway::{ConnectReply, TransportError};

    fn sample_credentials() -> ConnectionCredentials {
        ConnectionCredentials::new("localhost", "root", "secret", "shop")
    }

    fn success_reply() -> ConnectReply {
        ConnectReply {
            status: Some("success".to_string()),
            message: Some("Successfully connected to database".to_string()),
            error: None,
        }
    }

    #[tokio::test]
    async fn status_connected_releases_gate_without_user_action() {
        let gateway = FakeGateway {
            status: queued(vec![Ok(true)]),
            ..FakeGateway::default()
        };
        let mut session = ConnectionSession::new();
        assert_eq!(session.state(), ConnectionState::Unknown);

        let state = session.check_status(&gateway).await;
        assert_eq!(state, ConnectionState::Connected);
        assert!(!session.is_gated());
    }

    #[tokio::test]
    async fn status_transport_failure_fails_closed() {
        let gateway = FakeGateway {
            status: queued(vec![Err(TransportError::new("connection refused"))]),
            ..FakeGateway::default()
        };
        let mut session = ConnectionSession::new();

        assert_eq!(
            session.check_status(&gateway).await,
            ConnectionState::Disconnected
        );
        assert!(session.is_gated());
    }

    #[tokio::test]
    async fn missing_password_fails_locally_without_backend_call() {
        let gateway = FakeGateway::default();
        let mut session = ConnectionSession::new();
        let mut credentials = sample_credentials();
        credentials.password.clear();

        let err = session
            .connect(&gateway, &credentials)
            .await
            .expect_err("connect should fail validation");
        assert_eq!(err, ConnectionError::MissingFields);
        assert_eq!(err.to_string(), "Please fill in all required fields");
        assert_eq!(gateway.calls(), 0);
    }

    #[tokio::test]
    async fn host_may_be_empty() {
        let gateway = FakeGateway {
            connect: queued(vec![Ok(success_reply())]),
            ..FakeGateway::default()
        };
        let mut session = ConnectionSession::new();
        let mut credentials = sample_credentials();
        credentials.host.clear();

        session
            .connect(&gateway, &credentials)
            .await
            .expect("connect should succeed");
        assert!(session.is_connected());
    }

    #[tokio::test]
    async fn rejected_connect_surfaces_server_message() {
        let gateway = FakeGateway {
            connect: queued(vec![
                Ok(ConnectReply {
                    status: Some("error".to_string()),
                    message: Some("Access denied for user".to_string()),
                    error: None,
                }),
                Ok(ConnectReply {
                    status: None,
                    message: None,
                    error: None,
                }),
            ]),
            ..FakeGateway::default()
        };
        let mut session = ConnectionSession::new();

        let err = session
            .connect(&gateway, &sample_credentials())
            .await
            .expect_err("first connect should be rejected");
        assert_eq!(err.to_string(), "Access denied for user");
        assert_eq!(session.state(), ConnectionState::Disconnected);

        let err = session
            .connect(&gateway, &sample_credentials())
            .await
            .expect_err("second connect should be rejected");
        assert_eq!(err.to_string(), "Failed to connect to database");
        assert!(session.is_gated());
    }

    #[tokio::test]
    async fn transport_failure_prefers_backend_detail() {
        let gateway = FakeGateway {
            connect: queued(vec![
                Err(TransportError::with_detail("422", "port: invalid integer")),
                Err(TransportError::new("connection reset")),
            ]),
            ..FakeGateway::default()
        };
        let mut session = ConnectionSession::new();

        let err = session
            .connect(&gateway, &sample_credentials())
            .await
            .expect_err("connect should fail");
        assert_eq!(err.to_string(), "port: invalid integer");

        let err = session
            .connect(&gateway, &sample_credentials())
            .await
            .expect_err("connect should fail");
        assert_eq!(
            err.to_string(),
            "Failed to connect. Please check your credentials."
        );
    }

    #[tokio::test]
    async fn connected_session_never_reverts() {
        let gateway = FakeGateway {
            connect: queued(vec![Ok(success_reply())]),
            status: queued(vec![Ok(false)]),
            ..FakeGateway::default()
        };
        let mut session = ConnectionSession::new();
        session
            .connect(&gateway, &sample_credentials())
            .await
            .expect("connect should succeed");

        assert_eq!(
            session.check_status(&gateway).await,
            ConnectionState::Connected
        );
        let err = session
            .connect(&gateway, &sample_credentials())
            .await
            .expect_err("second connect should be refused locally");
        assert_eq!(err, ConnectionError::AlreadyConnected);
        assert!(session.is_connected());
    }

    #[test]
    fn debug_output_redacts_password() {
        let rendered = format!("{:?}", sample_credentials());
        assert!(!rendered.contains("secret"));
        assert!(rendered.contains("<redacted>"));
    }
}
