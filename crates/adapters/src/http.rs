use async_trait::async_trait;
use nlq_core::chart::ChartKind;
use nlq_core::connection_session::ConnectionCredentials;
use nlq_core::gateway::{
    BackendReply, ChartPayload, ChartRequest, ConnectReply, ExecutedRows, QueryGateway,
    TransportError,
};
use nlq_core::results_table::RowObject;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

#[derive(Debug, Serialize)]
struct QueryBody<'a> {
    query: &'a str,
}

#[derive(Debug, Serialize)]
struct ConnectBody<'a> {
    host: &'a str,
    user: &'a str,
    password: &'a str,
    database: &'a str,
    port: u16,
}

#[derive(Debug, Serialize)]
struct GraphBody<'a> {
    sql_query: &'a str,
    chart_type: ChartKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    chart_name: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    #[serde(default)]
    connected: bool,
}

#[derive(Debug, Deserialize)]
struct ConnectResponse {
    status: Option<String>,
    message: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GenerateSqlResponse {
    sql_query: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ExecuteSqlResponse {
    results: Option<Vec<RowObject>>,
    error: Option<String>,
    optimization_tips: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GraphResponse {
    image_base64: Option<String>,
    insights: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct HttpGateway {
    base_url: String,
    client: Client,
}

impl HttpGateway {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, Client::new())
    }

    #[must_use]
    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { base_url, client }
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn post<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<Response, TransportError> {
        debug!(path, "POST backend");
        let response = self
            .client
            .post(self.endpoint(path))
            .json(body)
            .send()
            .await
            .map_err(to_transport_error)?;
        checked(path, response).await
    }

    async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, TransportError> {
        self.post(path, body)
            .await?
            .json::<T>()
            .await
            .map_err(to_transport_error)
    }
}

#[async_trait]
impl QueryGateway for HttpGateway {
    async fn database_status(&self) -> Result<bool, TransportError> {
        let path = "/database_status";
        debug!(path, "GET backend");
        let response = self
            .client
            .get(self.endpoint(path))
            .send()
            .await
            .map_err(to_transport_error)?;
        let status: StatusResponse = checked(path, response)
            .await?
            .json()
            .await
            .map_err(to_transport_error)?;
        Ok(status.connected)
    }

    async fn connect_database(
        &self,
        credentials: &ConnectionCredentials,
    ) -> Result<ConnectReply, TransportError> {
        let body = ConnectBody {
            host: &credentials.host,
            user: &credentials.user,
            password: &credentials.password,
            database: &credentials.database,
            port: credentials.port,
        };
        let response: ConnectResponse = self.post_json("/connect_database", &body).await?;
        Ok(ConnectReply {
            status: response.status,
            message: response.message,
            error: response.error,
        })
    }

    async fn generate_sql(&self, prompt: &str) -> Result<BackendReply<String>, TransportError> {
        let response: GenerateSqlResponse = self
            .post_json("/generate_sql", &QueryBody { query: prompt })
            .await?;
        let sql = response.sql_query.filter(|sql| !sql.is_empty());
        Ok(BackendReply::from_fields(sql, response.error))
    }

    async fn execute_sql(
        &self,
        sql: &str,
    ) -> Result<BackendReply<ExecutedRows>, TransportError> {
        let response: ExecuteSqlResponse = self
            .post_json("/execute_sql", &QueryBody { query: sql })
            .await?;
        let optimization_tips = response.optimization_tips;
        let executed = response.results.map(|rows| ExecutedRows {
            rows,
            optimization_tips,
        });
        Ok(BackendReply::from_fields(executed, response.error))
    }

    async fn download_csv(&self, sql: &str) -> Result<Vec<u8>, TransportError> {
        let payload = self
            .post("/download_csv", &QueryBody { query: sql })
            .await?
            .bytes()
            .await
            .map_err(to_transport_error)?;
        Ok(payload.to_vec())
    }

    async fn generate_graph(
        &self,
        request: &ChartRequest,
    ) -> Result<BackendReply<ChartPayload>, TransportError> {
        let body = GraphBody {
            sql_query: &request.sql,
            chart_type: request.chart_type,
            chart_name: request.chart_name.as_deref(),
        };
        let response: GraphResponse = self.post_json("/generate_graph", &body).await?;
        let insights = response.insights;
        let payload = response
            .image_base64
            .filter(|image| !image.is_empty())
            .map(|image_base64| ChartPayload {
                image_base64,
                insights,
            });
        Ok(BackendReply::from_fields(payload, response.error))
    }
}

async fn checked(path: &str, response: Response) -> Result<Response, TransportError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = format!("{path} returned {status}");
    warn!(path, %status, "backend returned an error status");
    Err(match error_detail(&body) {
        Some(detail) => TransportError::with_detail(message, detail),
        None => TransportError::new(message),
    })
}

/// Extracts a string `detail` field from an error body. Structured details
/// (such as request validation lists) are not surfaced verbatim.
fn error_detail(body: &str) -> Option<String> {
    let parsed: ErrorBody = serde_json::from_str(body).ok()?;
    parsed
        .detail
        .as_str()
        .filter(|detail| !detail.is_empty())
        .map(str::to_string)
}

fn to_transport_error(error: reqwest::Error) -> TransportError {
    TransportError::new(error.to_string())
}
