use crate::chart::{ChartKind, ChartPresenter, ChartTicket};
use crate::epoch::Settled;
use crate::gateway::{
    BackendReply, ChartPayload, ChartRequest, ExecutedRows, QueryGateway, TransportError,
};
use crate::query_workflow::{
    DownloadTicket, ExecuteTicket, GenerateTicket, QueryWorkflow, WorkflowError,
};

#[derive(Debug, Default)]
pub struct QuerySession {
    workflow: QueryWorkflow,
    chart: ChartPresenter,
}

impl QuerySession {
    #[must_use]
    pub fn new(chart_name: Option<String>) -> Self {
        Self {
            workflow: QueryWorkflow::new(),
            chart: ChartPresenter::new().with_chart_name(chart_name),
        }
    }

    #[must_use]
    pub fn workflow(&self) -> &QueryWorkflow {
        &self.workflow
    }

    #[must_use]
    pub fn chart(&self) -> &ChartPresenter {
        &self.chart
    }

    #[must_use]
    pub fn can_chart(&self) -> bool {
        self.chart.can_generate(self.workflow.has_results())
    }

    pub fn set_prompt(&mut self, prompt: impl Into<String>) {
        self.workflow.set_prompt(prompt);
    }

    pub fn edit_sql(&mut self, sql: impl Into<String>) {
        let revision = self.workflow.sql_revision();
        self.workflow.edit_sql(sql);
        self.sync_chart(revision);
    }

    pub fn set_chart_type(&mut self, chart_type: ChartKind) {
        self.chart.set_chart_type(chart_type);
    }

    pub fn begin_generate(
        &mut self,
        prompt: &str,
    ) -> Result<(GenerateTicket, String), WorkflowError> {
        self.workflow.begin_generate(prompt)
    }

    pub fn complete_generate(
        &mut self,
        ticket: GenerateTicket,
        outcome: Result<BackendReply<String>, TransportError>,
    ) -> Settled<Result<(), WorkflowError>> {
        let revision = self.workflow.sql_revision();
        let settled = self.workflow.complete_generate(ticket, outcome);
        self.sync_chart(revision);
        settled
    }

    pub fn begin_execute(&mut self) -> Result<(ExecuteTicket, String), WorkflowError> {
        self.workflow.begin_execute()
    }

    pub fn complete_execute(
        &mut self,
        ticket: ExecuteTicket,
        outcome: Result<BackendReply<ExecutedRows>, TransportError>,
    ) -> Settled<Result<(), WorkflowError>> {
        let settled = self.workflow.complete_execute(ticket, outcome);
        if !settled.is_discarded() {
            self.drop_chart_without_results();
        }
        settled
    }

    pub fn begin_download(&mut self) -> Option<(DownloadTicket, String)> {
        self.workflow.begin_download()
    }

    pub fn complete_download(
        &mut self,
        ticket: DownloadTicket,
        outcome: Result<Vec<u8>, TransportError>,
    ) -> Settled<Result<Vec<u8>, WorkflowError>> {
        self.workflow.complete_download(ticket, outcome)
    }

    pub fn begin_chart(&mut self) -> Result<(ChartTicket, ChartRequest), WorkflowError> {
        let has_results = self.workflow.has_results();
        self.chart.begin(self.workflow.sql(), has_results)
    }

    pub fn complete_chart(
        &mut self,
        ticket: ChartTicket,
        outcome: Result<BackendReply<ChartPayload>, TransportError>,
    ) -> Settled<Result<(), WorkflowError>> {
        self.chart.complete(ticket, outcome)
    }

    pub async fn generate<G: QueryGateway + ?Sized>(
        &mut self,
        gateway: &G,
        prompt: &str,
    ) -> Result<(), WorkflowError> {
        let revision = self.workflow.sql_revision();
        let result = self.workflow.generate(gateway, prompt).await;
        self.sync_chart(revision);
        result
    }

    pub async fn execute<G: QueryGateway + ?Sized>(
        &mut self,
        gateway: &G,
    ) -> Result<(), WorkflowError> {
        let result = self.workflow.execute(gateway).await;
        self.drop_chart_without_results();
        result
    }

    pub async fn download_csv<G: QueryGateway + ?Sized>(
        &mut self,
        gateway: &G,
    ) -> Result<Option<Vec<u8>>, WorkflowError> {
        self.workflow.download_csv(gateway).await
    }

    pub async fn generate_chart<G: QueryGateway + ?Sized>(
        &mut self,
        gateway: &G,
    ) -> Result<(), WorkflowError> {
        let has_results = self.workflow.has_results();
        self.chart
            .generate(gateway, self.workflow.sql(), has_results)
            .await
    }

    fn drop_chart_without_results(&mut self) {
        if !self.workflow.has_results() {
            self.chart.invalidate();
        }
    }

    fn sync_chart(&mut self, revision_before: u64) {
        if self.workflow.sql_revision() != revision_before {
            self.chart.invalidate();
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::QuerySession;
    use crate::chart::tests::tiny_png_base64;
    use crate::chart::ChartKind;
    use crate::gateway::fake::{queued, FakeGateway};
    use crate::gateway::{BackendReply, ChartPayload, ExecutedRows, TransportError};

    fn executed() -> BackendReply<ExecutedRows> {
        BackendReply::Success(ExecutedRows {
            rows: vec![serde_json::from_value(json!({"month": "May", "total": 42}))
                .expect("row should deserialize")],
            optimization_tips: None,
        })
    }

    fn chart_reply() -> BackendReply<ChartPayload> {
        BackendReply::Success(ChartPayload {
            image_base64: tiny_png_base64(),
            insights: Some("May is the best month.".to_string()),
        })
    }

    #[tokio::test]
    async fn full_workflow_generate_execute_chart() {
        let gateway = FakeGateway {
            generate: queued(vec![Ok(BackendReply::Success(
                "SELECT month, total FROM sales".to_string(),
            ))]),
            execute: queued(vec![Ok(executed())]),
            graph: queued(vec![Ok(chart_reply())]),
            ..FakeGateway::default()
        };
        let mut session = QuerySession::new(None);
        assert!(!session.can_chart());

        session
            .generate(&gateway, "monthly sales")
            .await
            .expect("generate");
        session.execute(&gateway).await.expect("execute");
        assert!(session.can_chart());

        session.set_chart_type(ChartKind::Pie);
        session.generate_chart(&gateway).await.expect("chart");
        assert_eq!(session.chart().chart_type(), ChartKind::Pie);
        assert!(session.chart().image().is_some());
        assert_eq!(session.chart().insights(), Some("May is the best month."));
    }

    #[tokio::test]
    async fn editing_sql_removes_chart_and_results() {
        let gateway = FakeGateway {
            execute: queued(vec![Ok(executed())]),
            graph: queued(vec![Ok(chart_reply())]),
            ..FakeGateway::default()
        };
        let mut session = QuerySession::new(None);
        session.edit_sql("SELECT month, total FROM sales");
        session.execute(&gateway).await.expect("execute");
        session.generate_chart(&gateway).await.expect("chart");

        session.edit_sql("SELECT month, total FROM sales WHERE total > 10");
        assert!(!session.workflow().has_results());
        assert!(session.chart().image().is_none());
        assert!(session.chart().insights().is_none());
        assert!(!session.can_chart());
    }

    #[tokio::test]
    async fn failed_re_execution_clears_chart() {
        let gateway = FakeGateway {
            execute: queued(vec![
                Ok(executed()),
                Ok(BackendReply::Failure("table is locked".to_string())),
            ]),
            graph: queued(vec![Ok(chart_reply())]),
            ..FakeGateway::default()
        };
        let mut session = QuerySession::new(None);
        session.edit_sql("SELECT month, total FROM sales");
        session.execute(&gateway).await.expect("execute");
        session.generate_chart(&gateway).await.expect("chart");

        let err = session
            .execute(&gateway)
            .await
            .expect_err("second execution should fail");
        assert_eq!(err.to_string(), "table is locked");
        assert!(!session.workflow().has_results());
        assert!(session.chart().image().is_none());
        assert!(session.chart().insights().is_none());
    }

    #[test]
    fn applied_execute_failure_drops_chart_but_stale_reply_does_not() {
        let mut session = QuerySession::new(None);
        session.edit_sql("SELECT month, total FROM sales");
        let (ticket, _) = session.begin_execute().expect("execute");
        assert!(!session
            .complete_execute(ticket, Ok(executed()))
            .is_discarded());
        let (chart_ticket, _) = session.begin_chart().expect("chart");
        assert!(!session
            .complete_chart(chart_ticket, Ok(chart_reply()))
            .is_discarded());

        let (stale, _) = session.begin_execute().expect("execute");
        let (current, _) = session.begin_execute().expect("execute");
        assert!(session
            .complete_execute(stale, Err(TransportError::new("reset")))
            .is_discarded());
        assert!(session.chart().image().is_some());

        assert!(!session
            .complete_execute(current, Err(TransportError::new("reset")))
            .is_discarded());
        assert!(session.chart().image().is_none());
    }

    #[tokio::test]
    async fn regenerating_identical_sql_keeps_chart() {
        let sql = "SELECT month, total FROM sales";
        let gateway = FakeGateway {
            generate: queued(vec![
                Ok(BackendReply::Success(sql.to_string())),
                Ok(BackendReply::Success(sql.to_string())),
            ]),
            execute: queued(vec![Ok(executed())]),
            graph: queued(vec![Ok(chart_reply())]),
            ..FakeGateway::default()
        };
        let mut session = QuerySession::new(None);
        session.generate(&gateway, "sales").await.expect("generate");
        session.execute(&gateway).await.expect("execute");
        session.generate_chart(&gateway).await.expect("chart");

        session
            .generate(&gateway, "sales")
            .await
            .expect("regenerate");
        assert!(session.workflow().has_results());
        assert!(session.chart().image().is_some());
    }

    #[test]
    fn chart_in_flight_is_dropped_when_sql_changes() {
        let mut session = QuerySession::new(Some("Sales".to_string()));
        session.edit_sql("SELECT 1");
        let (ticket, _) = session.begin_execute().expect("execute");
        assert!(!session
            .complete_execute(ticket, Ok(executed()))
            .is_discarded());

        let (chart_ticket, request) = session.begin_chart().expect("chart");
        assert_eq!(request.chart_name.as_deref(), Some("Sales"));
        session.edit_sql("SELECT 2");
        assert!(session
            .complete_chart(chart_ticket, Ok(chart_reply()))
            .is_discarded());
        assert!(session.chart().image().is_none());
    }
}
