use std::fmt;

use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::epoch::{Epoch, EpochClock, Settled};
use crate::gateway::{BackendReply, ChartPayload, ChartRequest, QueryGateway, TransportError};
use crate::query_workflow::WorkflowError;

const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

const NO_SQL: &str = "No SQL query available";
const NO_RESULTS: &str = "Run a query that returns rows before charting";
const CHART_MISSING: &str = "Failed to generate graph";
const CHART_TRANSPORT_FAILED: &str = "Failed to generate graph. Please try again.";
const CHART_UNDECODABLE: &str = "Failed to decode chart image";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum ChartKind {
    #[default]
    Bar,
    Line,
    Pie,
    Scatter,
}

impl ChartKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bar => "bar",
            Self::Line => "line",
            Self::Pie => "pie",
            Self::Scatter => "scatter",
        }
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Bar => "Bar Chart",
            Self::Line => "Line Chart",
            Self::Pie => "Pie Chart",
            Self::Scatter => "Scatter Plot",
        }
    }

    #[must_use]
    pub fn next(self) -> Self {
        match self {
            Self::Bar => Self::Line,
            Self::Line => Self::Pie,
            Self::Pie => Self::Scatter,
            Self::Scatter => Self::Bar,
        }
    }
}

impl fmt::Display for ChartKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartImage {
    bytes: Vec<u8>,
    width: u32,
    height: u32,
}

impl ChartImage {
    #[must_use]
    pub fn from_base64(encoded: &str) -> Option<Self> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded.trim())
            .ok()?;
        Self::from_png(bytes)
    }

    #[must_use]
    pub fn from_png(bytes: Vec<u8>) -> Option<Self> {
        // Signature, then the IHDR chunk: length(4) type(4) width(4) height(4).
        if bytes.len() < 24 || bytes[..8] != PNG_SIGNATURE || &bytes[12..16] != b"IHDR" {
            return None;
        }
        let width = u32::from_be_bytes([bytes[16], bytes[17], bytes[18], bytes[19]]);
        let height = u32::from_be_bytes([bytes[20], bytes[21], bytes[22], bytes[23]]);
        Some(Self {
            bytes,
            width,
            height,
        })
    }

    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChartTicket(Epoch);

#[derive(Debug, Default)]
pub struct ChartPresenter {
    chart_type: ChartKind,
    chart_name: Option<String>,
    image: Option<ChartImage>,
    insights: Option<String>,
    error: Option<WorkflowError>,
    clock: EpochClock,
}

impl ChartPresenter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_chart_name(mut self, chart_name: Option<String>) -> Self {
        self.chart_name = chart_name.filter(|name| !name.trim().is_empty());
        self
    }

    #[must_use]
    pub fn chart_type(&self) -> ChartKind {
        self.chart_type
    }

    pub fn set_chart_type(&mut self, chart_type: ChartKind) {
        self.chart_type = chart_type;
    }

    #[must_use]
    pub fn image(&self) -> Option<&ChartImage> {
        self.image.as_ref()
    }

    #[must_use]
    pub fn insights(&self) -> Option<&str> {
        self.insights.as_deref()
    }

    #[must_use]
    pub fn error(&self) -> Option<&WorkflowError> {
        self.error.as_ref()
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.clock.is_in_flight()
    }

    #[must_use]
    pub fn can_generate(&self, has_results: bool) -> bool {
        has_results && !self.is_loading()
    }

    pub fn invalidate(&mut self) {
        self.clock.invalidate();
        self.image = None;
        self.insights = None;
        self.error = None;
    }

    pub fn begin(
        &mut self,
        sql: &str,
        has_results: bool,
    ) -> Result<(ChartTicket, ChartRequest), WorkflowError> {
        let validation = if !has_results {
            Err(WorkflowError::Validation(NO_RESULTS))
        } else if sql.trim().is_empty() {
            Err(WorkflowError::Validation(NO_SQL))
        } else {
            Ok(())
        };
        if let Err(error) = validation {
            self.error = Some(error.clone());
            return Err(error);
        }

        self.image = None;
        self.insights = None;
        self.error = None;
        let epoch = self.clock.begin();
        debug!(chart_type = %self.chart_type, "requesting chart");

        Ok((
            ChartTicket(epoch),
            ChartRequest {
                sql: sql.to_string(),
                chart_type: self.chart_type,
                chart_name: self.chart_name.clone(),
            },
        ))
    }

    pub fn complete(
        &mut self,
        ticket: ChartTicket,
        outcome: Result<BackendReply<ChartPayload>, TransportError>,
    ) -> Settled<Result<(), WorkflowError>> {
        if !self.clock.settle(ticket.0) {
            debug!("discarding stale chart reply");
            return Settled::Discarded;
        }

        let result = match outcome {
            Ok(BackendReply::Success(payload)) => {
                match ChartImage::from_base64(&payload.image_base64) {
                    Some(image) => {
                        self.image = Some(image);
                        self.insights = payload.insights.filter(|text| !text.is_empty());
                        Ok(())
                    }
                    None => Err(WorkflowError::Server(CHART_UNDECODABLE.to_string())),
                }
            }
            Ok(BackendReply::Failure(message)) => Err(WorkflowError::Server(message)),
            Ok(BackendReply::Missing) => Err(WorkflowError::Server(CHART_MISSING.to_string())),
            Err(error) => Err(WorkflowError::Transport(
                error.surfaced(CHART_TRANSPORT_FAILED),
            )),
        };

        if let Err(error) = &result {
            warn!(%error, "chart generation failed");
            self.image = None;
            self.insights = None;
            self.error = Some(error.clone());
        }
        Settled::Applied(result)
    }

    pub async fn generate<G: QueryGateway + ?Sized>(
        &mut self,
        gateway: &G,
        sql: &str,
        has_results: bool,
    ) -> Result<(), WorkflowError> {
        let (ticket, request) = self.begin(sql, has_results)?;
        let outcome = gateway.generate_graph(&request).await;
        match self.complete(ticket, outcome) {
            Settled::Applied(result) => result,
            Settled::Discarded => Ok(()),
        }
    }
}
