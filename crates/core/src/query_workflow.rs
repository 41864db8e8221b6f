use thiserror::Error;
use tracing::{debug, info, warn};

use crate::epoch::{Epoch, EpochClock, Settled};
use crate::gateway::{BackendReply, ExecutedRows, QueryGateway, TransportError};
use crate::results_table::{RowObject, TableView};

pub const CSV_DOWNLOAD_FILE_NAME: &str = "query_results.csv";

const EMPTY_PROMPT: &str = "Please enter a prompt";
const GENERATE_MISSING: &str = "Failed to generate SQL query";
const GENERATE_TRANSPORT_FAILED: &str = "Failed to generate query. Please try again.";
const EMPTY_SQL: &str = "No SQL query to execute";
const EXECUTE_MISSING: &str = "No results returned";
const EXECUTE_TRANSPORT_FAILED: &str = "Failed to execute SQL query. Please try again.";
const DOWNLOAD_TRANSPORT_FAILED: &str = "Failed to download CSV";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkflowError {
    #[error("{0}")]
    Validation(&'static str),
    #[error("{0}")]
    Server(String),
    #[error("{0}")]
    Transport(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowState {
    Idle,
    Generating,
    Ready,
    Executing,
    Executed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerateTicket(Epoch);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecuteTicket(Epoch);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadTicket(Epoch);

static EMPTY_TABLE: TableView = TableView::Empty;

#[derive(Debug)]
struct FetchedResults {
    rows: Vec<RowObject>,
    table: TableView,
}

impl FetchedResults {
    fn new(rows: Vec<RowObject>) -> Self {
        let table = TableView::from_rows(Some(rows.as_slice()));
        Self { rows, table }
    }
}

#[derive(Debug, Default)]
pub struct QueryWorkflow {
    prompt: String,
    sql: String,
    sql_revision: u64,
    results: Option<FetchedResults>,
    optimization_tips: Option<String>,
    generate_error: Option<WorkflowError>,
    execute_error: Option<WorkflowError>,
    generate_clock: EpochClock,
    execute_clock: EpochClock,
    download_clock: EpochClock,
}

impl QueryWorkflow {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn state(&self) -> WorkflowState {
        if self.generate_clock.is_in_flight() {
            WorkflowState::Generating
        } else if self.execute_clock.is_in_flight() {
            WorkflowState::Executing
        } else if self.results.is_some() {
            WorkflowState::Executed
        } else if self.sql.trim().is_empty() {
            WorkflowState::Idle
        } else {
            WorkflowState::Ready
        }
    }

    #[must_use]
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    #[must_use]
    pub fn sql(&self) -> &str {
        &self.sql
    }

    #[must_use]
    pub fn sql_revision(&self) -> u64 {
        self.sql_revision
    }

    #[must_use]
    pub fn results(&self) -> Option<&[RowObject]> {
        self.results
            .as_ref()
            .map(|fetched| fetched.rows.as_slice())
    }

    #[must_use]
    pub fn has_results(&self) -> bool {
        self.results
            .as_ref()
            .is_some_and(|fetched| !fetched.rows.is_empty())
    }

    #[must_use]
    pub fn table(&self) -> &TableView {
        self.results
            .as_ref()
            .map_or(&EMPTY_TABLE, |fetched| &fetched.table)
    }

    #[must_use]
    pub fn optimization_tips(&self) -> Option<&str> {
        self.optimization_tips.as_deref()
    }

    #[must_use]
    pub fn generate_error(&self) -> Option<&WorkflowError> {
        self.generate_error.as_ref()
    }

    #[must_use]
    pub fn execute_error(&self) -> Option<&WorkflowError> {
        self.execute_error.as_ref()
    }

    #[must_use]
    pub fn is_generating(&self) -> bool {
        self.generate_clock.is_in_flight()
    }

    #[must_use]
    pub fn is_executing(&self) -> bool {
        self.execute_clock.is_in_flight()
    }

    #[must_use]
    pub fn is_downloading(&self) -> bool {
        self.download_clock.is_in_flight()
    }

    #[must_use]
    pub fn can_download(&self) -> bool {
        !self.sql.trim().is_empty() && self.results.is_some() && !self.is_downloading()
    }

    pub fn set_prompt(&mut self, prompt: impl Into<String>) {
        let prompt = prompt.into();
        if prompt == self.prompt {
            return;
        }
        self.prompt = prompt;
        self.generate_clock.invalidate();
    }

    /// A hand edit of the SQL. Results fetched for the previous text are
    /// dropped and a pending generation no longer overwrites the editor.
    pub fn edit_sql(&mut self, sql: impl Into<String>) {
        let sql = sql.into();
        if sql == self.sql {
            return;
        }
        self.generate_clock.invalidate();
        self.replace_sql(sql);
    }

    fn replace_sql(&mut self, sql: String) {
        if sql == self.sql {
            return;
        }
        self.sql = sql;
        self.sql_revision += 1;
        self.execute_clock.invalidate();
        self.download_clock.invalidate();
        self.results = None;
        self.optimization_tips = None;
        self.execute_error = None;
    }

    pub fn begin_generate(
        &mut self,
        prompt: &str,
    ) -> Result<(GenerateTicket, String), WorkflowError> {
        self.set_prompt(prompt);
        if self.prompt.trim().is_empty() {
            let error = WorkflowError::Validation(EMPTY_PROMPT);
            self.generate_error = Some(error.clone());
            return Err(error);
        }

        self.generate_error = None;
        let epoch = self.generate_clock.begin();
        debug!(prompt = %self.prompt, "requesting SQL generation");
        Ok((GenerateTicket(epoch), self.prompt.clone()))
    }

    pub fn complete_generate(
        &mut self,
        ticket: GenerateTicket,
        outcome: Result<BackendReply<String>, TransportError>,
    ) -> Settled<Result<(), WorkflowError>> {
        if !self.generate_clock.settle(ticket.0) {
            debug!("discarding stale SQL generation reply");
            return Settled::Discarded;
        }

        let result = match outcome {
            Ok(BackendReply::Success(sql)) => {
                info!("SQL generated");
                self.replace_sql(sql);
                self.generate_error = None;
                Ok(())
            }
            Ok(BackendReply::Failure(message)) => Err(WorkflowError::Server(message)),
            Ok(BackendReply::Missing) => Err(WorkflowError::Server(GENERATE_MISSING.to_string())),
            Err(error) => Err(WorkflowError::Transport(
                error.surfaced(GENERATE_TRANSPORT_FAILED),
            )),
        };

        if let Err(error) = &result {
            warn!(%error, "SQL generation failed");
            self.generate_error = Some(error.clone());
        }
        Settled::Applied(result)
    }

    pub fn begin_execute(&mut self) -> Result<(ExecuteTicket, String), WorkflowError> {
        if self.sql.trim().is_empty() {
            let error = WorkflowError::Validation(EMPTY_SQL);
            self.execute_error = Some(error.clone());
            return Err(error);
        }

        self.execute_error = None;
        self.results = None;
        self.optimization_tips = None;
        let epoch = self.execute_clock.begin();
        debug!(sql = %self.sql, "executing SQL");
        Ok((ExecuteTicket(epoch), self.sql.clone()))
    }

    pub fn complete_execute(
        &mut self,
        ticket: ExecuteTicket,
        outcome: Result<BackendReply<ExecutedRows>, TransportError>,
    ) -> Settled<Result<(), WorkflowError>> {
        if !self.execute_clock.settle(ticket.0) {
            debug!("discarding stale execution reply");
            return Settled::Discarded;
        }

        let result = match outcome {
            Ok(BackendReply::Success(executed)) => {
                info!(rows = executed.rows.len(), "SQL executed");
                self.results = Some(FetchedResults::new(executed.rows));
                self.optimization_tips = executed
                    .optimization_tips
                    .filter(|tips| !tips.trim().is_empty());
                Ok(())
            }
            Ok(BackendReply::Failure(message)) => Err(WorkflowError::Server(message)),
            Ok(BackendReply::Missing) => Err(WorkflowError::Server(EXECUTE_MISSING.to_string())),
            Err(error) => Err(WorkflowError::Transport(
                error.surfaced(EXECUTE_TRANSPORT_FAILED),
            )),
        };

        if let Err(error) = &result {
            warn!(%error, "SQL execution failed");
            self.results = None;
            self.execute_error = Some(error.clone());
        }
        Settled::Applied(result)
    }

    /// `None` when there is nothing to export: blank SQL or no fetched
    /// result set. No error is recorded in that case.
    pub fn begin_download(&mut self) -> Option<(DownloadTicket, String)> {
        if self.sql.trim().is_empty() || self.results.is_none() {
            debug!("skipping CSV download without executed results");
            return None;
        }

        let epoch = self.download_clock.begin();
        Some((DownloadTicket(epoch), self.sql.clone()))
    }

    pub fn complete_download(
        &mut self,
        ticket: DownloadTicket,
        outcome: Result<Vec<u8>, TransportError>,
    ) -> Settled<Result<Vec<u8>, WorkflowError>> {
        if !self.download_clock.settle(ticket.0) {
            debug!("discarding stale CSV download");
            return Settled::Discarded;
        }

        match outcome {
            Ok(payload) => Settled::Applied(Ok(payload)),
            Err(error) => {
                let error = WorkflowError::Transport(error.surfaced(DOWNLOAD_TRANSPORT_FAILED));
                warn!(%error, "CSV download failed");
                self.execute_error = Some(error.clone());
                Settled::Applied(Err(error))
            }
        }
    }

    pub async fn generate<G: QueryGateway + ?Sized>(
        &mut self,
        gateway: &G,
        prompt: &str,
    ) -> Result<(), WorkflowError> {
        let (ticket, prompt) = self.begin_generate(prompt)?;
        let outcome = gateway.generate_sql(&prompt).await;
        applied(self.complete_generate(ticket, outcome))
    }

    pub async fn execute<G: QueryGateway + ?Sized>(
        &mut self,
        gateway: &G,
    ) -> Result<(), WorkflowError> {
        let (ticket, sql) = self.begin_execute()?;
        let outcome = gateway.execute_sql(&sql).await;
        applied(self.complete_execute(ticket, outcome))
    }

    pub async fn download_csv<G: QueryGateway + ?Sized>(
        &mut self,
        gateway: &G,
    ) -> Result<Option<Vec<u8>>, WorkflowError> {
        let Some((ticket, sql)) = self.begin_download() else {
            return Ok(None);
        };
        let outcome = gateway.download_csv(&sql).await;
        match self.complete_download(ticket, outcome) {
            Settled::Applied(result) => result.map(Some),
            Settled::Discarded => Ok(None),
        }
    }
}

fn applied(settled: Settled<Result<(), WorkflowError>>) -> Result<(), WorkflowError> {
    match settled {
        Settled::Applied(result) => result,
        Settled::Discarded => Ok(()),
    }
}
