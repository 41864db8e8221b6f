use std::future::Future;
use std::io::{self, Stdout};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use nlq_adapters::export::{save_chart_image, save_csv_download};
use nlq_adapters::http::HttpGateway;
use nlq_core::chart::ChartTicket;
use nlq_core::config::{ClientConfig, ConnectionDefaults};
use nlq_core::connection_session::{ConnectionCredentials, ConnectionError, ConnectionSession};
use nlq_core::epoch::Settled;
use nlq_core::gateway::{
    BackendReply, ChartPayload, ConnectReply, ExecutedRows, QueryGateway, TransportError,
};
use nlq_core::query_workflow::{DownloadTicket, ExecuteTicket, GenerateTicket};
use nlq_core::session::QuerySession;
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::info;

mod render;

const TICK_RATE: Duration = Duration::from_millis(120);

#[derive(Debug, Error)]
pub enum TuiError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pane {
    Prompt,
    SqlEditor,
    Results,
    Chart,
}

impl Pane {
    fn next(self) -> Self {
        match self {
            Self::Prompt => Self::SqlEditor,
            Self::SqlEditor => Self::Results,
            Self::Results => Self::Chart,
            Self::Chart => Self::Prompt,
        }
    }

    fn previous(self) -> Self {
        match self {
            Self::Prompt => Self::Chart,
            Self::SqlEditor => Self::Prompt,
            Self::Results => Self::SqlEditor,
            Self::Chart => Self::Results,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Prompt => "Prompt",
            Self::SqlEditor => "SQL Editor",
            Self::Results => "Results",
            Self::Chart => "Graph Visualization",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FormField {
    Host,
    Port,
    User,
    Password,
    Database,
}

impl FormField {
    const ALL: [Self; 5] = [
        Self::Host,
        Self::Port,
        Self::User,
        Self::Password,
        Self::Database,
    ];

    fn next(self) -> Self {
        match self {
            Self::Host => Self::Port,
            Self::Port => Self::User,
            Self::User => Self::Password,
            Self::Password => Self::Database,
            Self::Database => Self::Host,
        }
    }

    fn previous(self) -> Self {
        match self {
            Self::Host => Self::Database,
            Self::Port => Self::Host,
            Self::User => Self::Port,
            Self::Password => Self::User,
            Self::Database => Self::Password,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Host => "Host",
            Self::Port => "Port",
            Self::User => "User *",
            Self::Password => "Password *",
            Self::Database => "Database *",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ConnectionForm {
    host: String,
    port: String,
    user: String,
    password: String,
    database: String,
    active_field: FormField,
}

impl ConnectionForm {
    fn from_defaults(defaults: &ConnectionDefaults) -> Self {
        Self {
            host: defaults.host.clone(),
            port: defaults.port.to_string(),
            user: defaults.user.clone(),
            password: String::new(),
            database: defaults.database.clone(),
            active_field: FormField::User,
        }
    }

    fn value(&self, field: FormField) -> &str {
        match field {
            FormField::Host => &self.host,
            FormField::Port => &self.port,
            FormField::User => &self.user,
            FormField::Password => &self.password,
            FormField::Database => &self.database,
        }
    }

    fn active_value_mut(&mut self) -> &mut String {
        match self.active_field {
            FormField::Host => &mut self.host,
            FormField::Port => &mut self.port,
            FormField::User => &mut self.user,
            FormField::Password => &mut self.password,
            FormField::Database => &mut self.database,
        }
    }

    fn input(&mut self, character: char) {
        if self.active_field == FormField::Port && !character.is_ascii_digit() {
            return;
        }
        self.active_value_mut().push(character);
    }

    fn backspace(&mut self) {
        self.active_value_mut().pop();
    }

    fn credentials(&self) -> Result<ConnectionCredentials, ConnectionError> {
        let mut credentials = ConnectionCredentials::new(
            self.host.clone(),
            self.user.clone(),
            self.password.clone(),
            self.database.clone(),
        );
        credentials.validate()?;
        credentials.port = self
            .port
            .parse::<u16>()
            .map_err(|_| ConnectionError::InvalidPort)?;
        Ok(credentials)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DirectionKey {
    Up,
    Down,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Msg {
    Quit,
    ToggleHelp,
    NextFocus,
    PreviousFocus,
    Submit,
    Input(char),
    Backspace,
    ExecuteSql,
    DownloadCsv,
    GenerateChart,
    CycleChartType,
    SaveChart,
    Navigate(DirectionKey),
    Tick,
}

#[derive(Debug)]
enum Completion {
    Status(Result<bool, TransportError>),
    Connect(Result<ConnectReply, TransportError>),
    Generate(GenerateTicket, Result<BackendReply<String>, TransportError>),
    Execute(ExecuteTicket, Result<BackendReply<ExecutedRows>, TransportError>),
    Download(DownloadTicket, Result<Vec<u8>, TransportError>),
    Chart(ChartTicket, Result<BackendReply<ChartPayload>, TransportError>),
}

struct TuiApp<G> {
    gateway: Arc<G>,
    runtime: Handle,
    completions_tx: UnboundedSender<Completion>,
    completions_rx: UnboundedReceiver<Completion>,
    api_url: String,
    download_dir: PathBuf,
    connection: ConnectionSession,
    form: ConnectionForm,
    session: QuerySession,
    pane: Pane,
    results_cursor: usize,
    show_help: bool,
    should_quit: bool,
    status_line: String,
}

impl<G: QueryGateway + 'static> TuiApp<G> {
    fn new(gateway: G, config: &ClientConfig, runtime: Handle) -> Self {
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        Self {
            gateway: Arc::new(gateway),
            runtime,
            completions_tx,
            completions_rx,
            api_url: config.api_base().to_string(),
            download_dir: config.download_dir.clone(),
            connection: ConnectionSession::new(),
            form: ConnectionForm::from_defaults(&config.connection),
            session: QuerySession::new(config.chart_name.clone()),
            pane: Pane::Prompt,
            results_cursor: 0,
            show_help: false,
            should_quit: false,
            status_line: "Checking database connection...".to_string(),
        }
    }

    fn handle(&mut self, msg: Msg) {
        match msg {
            Msg::Quit => self.should_quit = true,
            Msg::ToggleHelp => self.show_help = !self.show_help,
            Msg::Tick => self.drain_completions(),
            _ if self.connection.is_gated() => self.handle_gated(msg),
            Msg::NextFocus => self.pane = self.pane.next(),
            Msg::PreviousFocus => self.pane = self.pane.previous(),
            Msg::Submit => self.submit(),
            Msg::Input(character) => self.edit_focused(|text| text.push(character)),
            Msg::Backspace => self.edit_focused(|text| {
                text.pop();
            }),
            Msg::ExecuteSql => self.start_execute(),
            Msg::DownloadCsv => self.start_download(),
            Msg::GenerateChart => self.start_chart(),
            Msg::CycleChartType => {
                let chart_type = self.session.chart().chart_type().next();
                self.session.set_chart_type(chart_type);
                self.status_line = format!("Chart type: {}", chart_type.label());
            }
            Msg::SaveChart => self.save_chart(),
            Msg::Navigate(direction) => self.navigate_results(direction),
        }
    }

    fn handle_gated(&mut self, msg: Msg) {
        match msg {
            Msg::NextFocus | Msg::Navigate(DirectionKey::Down) => {
                self.form.active_field = self.form.active_field.next();
            }
            Msg::PreviousFocus | Msg::Navigate(DirectionKey::Up) => {
                self.form.active_field = self.form.active_field.previous();
            }
            Msg::Input(character) => {
                self.form.input(character);
                self.connection.clear_error();
            }
            Msg::Backspace => {
                self.form.backspace();
                self.connection.clear_error();
            }
            Msg::Submit => self.start_connect(),
            _ => self.status_line = "Connect to a database first".to_string(),
        }
    }

    fn edit_focused(&mut self, edit: impl FnOnce(&mut String)) {
        match self.pane {
            Pane::Prompt => {
                let mut prompt = self.session.workflow().prompt().to_string();
                edit(&mut prompt);
                self.session.set_prompt(prompt);
            }
            Pane::SqlEditor => {
                let mut sql = self.session.workflow().sql().to_string();
                edit(&mut sql);
                self.session.edit_sql(sql);
            }
            Pane::Results | Pane::Chart => {}
        }
    }

    fn submit(&mut self) {
        match self.pane {
            Pane::Prompt => self.start_generate(),
            Pane::SqlEditor => self.start_execute(),
            Pane::Results => self.start_download(),
            Pane::Chart => self.start_chart(),
        }
    }

    fn spawn<F>(&self, task: F)
    where
        F: Future<Output = Completion> + Send + 'static,
    {
        let completions = self.completions_tx.clone();
        self.runtime.spawn(async move {
            // The receiver only goes away when the UI exits.
            let _ = completions.send(task.await);
        });
    }

    fn start_status_check(&mut self) {
        let gateway = Arc::clone(&self.gateway);
        self.spawn(async move {
            Completion::Status(gateway.database_status().await)
        });
    }

    fn start_connect(&mut self) {
        if self.connection.is_connecting() {
            self.status_line = "Connection attempt already in progress".to_string();
            return;
        }

        let credentials = match self.form.credentials() {
            Ok(credentials) => credentials,
            Err(error) => {
                self.status_line = error.to_string();
                return;
            }
        };
        if let Err(error) = self.connection.begin_connect(&credentials) {
            self.status_line = error.to_string();
            return;
        }

        self.status_line = "Connecting...".to_string();
        let gateway = Arc::clone(&self.gateway);
        self.spawn(async move {
            Completion::Connect(gateway.connect_database(&credentials).await)
        });
    }

    fn start_generate(&mut self) {
        if self.session.workflow().is_generating() {
            self.status_line = "SQL generation already in progress".to_string();
            return;
        }

        let prompt = self.session.workflow().prompt().to_string();
        match self.session.begin_generate(&prompt) {
            Ok((ticket, prompt)) => {
                self.status_line = "Generating SQL...".to_string();
                let gateway = Arc::clone(&self.gateway);
                self.spawn(async move {
                    Completion::Generate(ticket, gateway.generate_sql(&prompt).await)
                });
            }
            Err(error) => self.status_line = error.to_string(),
        }
    }

    fn start_execute(&mut self) {
        if self.session.workflow().is_executing() {
            self.status_line = "Query already executing".to_string();
            return;
        }

        match self.session.begin_execute() {
            Ok((ticket, sql)) => {
                self.status_line = "Executing query...".to_string();
                self.results_cursor = 0;
                let gateway = Arc::clone(&self.gateway);
                self.spawn(async move {
                    Completion::Execute(ticket, gateway.execute_sql(&sql).await)
                });
            }
            Err(error) => self.status_line = error.to_string(),
        }
    }

    fn start_download(&mut self) {
        if !self.session.workflow().can_download() {
            if self.session.workflow().is_downloading() {
                self.status_line = "Download already in progress".to_string();
            }
            return;
        }

        let Some((ticket, sql)) = self.session.begin_download() else {
            return;
        };
        self.status_line = "Downloading CSV...".to_string();
        let gateway = Arc::clone(&self.gateway);
        self.spawn(async move {
            Completion::Download(ticket, gateway.download_csv(&sql).await)
        });
    }

    fn start_chart(&mut self) {
        if self.session.chart().is_loading() {
            self.status_line = "Chart generation already in progress".to_string();
            return;
        }

        match self.session.begin_chart() {
            Ok((ticket, request)) => {
                self.status_line = format!("Generating {}...", request.chart_type.label());
                let gateway = Arc::clone(&self.gateway);
                self.spawn(async move {
                    Completion::Chart(ticket, gateway.generate_graph(&request).await)
                });
            }
            Err(error) => self.status_line = error.to_string(),
        }
    }

    fn save_chart(&mut self) {
        let Some(image) = self.session.chart().image() else {
            self.status_line = "No chart to save".to_string();
            return;
        };
        self.status_line = match save_chart_image(&self.download_dir, image) {
            Ok(path) => format!("Saved chart to {}", path.display()),
            Err(error) => error.to_string(),
        };
    }

    fn navigate_results(&mut self, direction: DirectionKey) {
        let row_count = self.session.workflow().results().map_or(0, <[_]>::len);
        if row_count == 0 {
            return;
        }

        self.results_cursor = match direction {
            DirectionKey::Up => self.results_cursor.saturating_sub(1),
            DirectionKey::Down => (self.results_cursor + 1).min(row_count - 1),
        };
    }

    fn drain_completions(&mut self) {
        while let Ok(completion) = self.completions_rx.try_recv() {
            self.apply(completion);
        }
    }

    fn apply(&mut self, completion: Completion) {
        match completion {
            Completion::Status(outcome) => {
                self.connection.complete_status(outcome);
                self.status_line = if self.connection.is_connected() {
                    "Database connected".to_string()
                } else {
                    "Enter database credentials and press Enter to connect".to_string()
                };
            }
            Completion::Connect(outcome) => {
                self.status_line = match self.connection.complete_connect(outcome) {
                    Ok(()) => {
                        self.form.password.clear();
                        "Database connected".to_string()
                    }
                    Err(error) => error.to_string(),
                };
            }
            Completion::Generate(ticket, outcome) => {
                if let Settled::Applied(result) = self.session.complete_generate(ticket, outcome) {
                    self.status_line = match result {
                        Ok(()) => {
                            self.pane = Pane::SqlEditor;
                            "SQL generated. Edit it or press Enter to execute".to_string()
                        }
                        Err(error) => error.to_string(),
                    };
                }
            }
            Completion::Execute(ticket, outcome) => {
                if let Settled::Applied(result) = self.session.complete_execute(ticket, outcome) {
                    self.results_cursor = 0;
                    self.status_line = match result {
                        Ok(()) => {
                            let rows = self.session.workflow().results().map_or(0, <[_]>::len);
                            self.pane = Pane::Results;
                            format!("Query returned {rows} rows")
                        }
                        Err(error) => error.to_string(),
                    };
                }
            }
            Completion::Download(ticket, outcome) => {
                if let Settled::Applied(result) = self.session.complete_download(ticket, outcome) {
                    self.status_line = match result {
                        Ok(payload) => match save_csv_download(&self.download_dir, &payload) {
                            Ok(path) => format!("Saved {}", path.display()),
                            Err(error) => error.to_string(),
                        },
                        Err(error) => error.to_string(),
                    };
                }
            }
            Completion::Chart(ticket, outcome) => {
                if let Settled::Applied(result) = self.session.complete_chart(ticket, outcome) {
                    self.status_line = match result {
                        Ok(()) => "Chart ready. Ctrl+S saves it as chart.png".to_string(),
                        Err(error) => error.to_string(),
                    };
                }
            }
        }
    }
}

pub fn run(config: &ClientConfig) -> Result<(), TuiError> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    info!(api_url = config.api_base(), "starting terminal client");

    let gateway = HttpGateway::new(config.api_base());
    let mut app = TuiApp::new(gateway, config, runtime.handle().clone());
    app.start_status_check();

    let mut terminal = setup_terminal()?;
    let run_result = run_loop(&mut terminal, &mut app);
    let restore_result = restore_terminal(&mut terminal);

    if let Err(error) = run_result {
        restore_result?;
        return Err(error);
    }

    restore_result?;
    Ok(())
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>, TuiError> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;
    Ok(terminal)
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<(), TuiError> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

fn run_loop<G: QueryGateway + 'static>(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    app: &mut TuiApp<G>,
) -> Result<(), TuiError> {
    let mut last_tick = Instant::now();

    loop {
        terminal.draw(|frame| render::render(frame, app))?;

        let timeout = TICK_RATE
            .checked_sub(last_tick.elapsed())
            .unwrap_or(Duration::ZERO);
        if event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    if let Some(message) = map_key_event(key) {
                        app.handle(message);
                    }
                }
            }
        }

        if last_tick.elapsed() >= TICK_RATE {
            app.handle(Msg::Tick);
            last_tick = Instant::now();
        }

        if app.should_quit {
            break;
        }
    }

    Ok(())
}

fn map_key_event(key: KeyEvent) -> Option<Msg> {
    match (key.modifiers, key.code) {
        (KeyModifiers::CONTROL, KeyCode::Char('q')) => Some(Msg::Quit),
        (KeyModifiers::CONTROL, KeyCode::Char('e')) => Some(Msg::ExecuteSql),
        (KeyModifiers::CONTROL, KeyCode::Char('d')) => Some(Msg::DownloadCsv),
        (KeyModifiers::CONTROL, KeyCode::Char('g')) => Some(Msg::GenerateChart),
        (KeyModifiers::CONTROL, KeyCode::Char('t')) => Some(Msg::CycleChartType),
        (KeyModifiers::CONTROL, KeyCode::Char('s')) => Some(Msg::SaveChart),
        (_, KeyCode::F(1)) => Some(Msg::ToggleHelp),
        (_, KeyCode::Tab) => Some(Msg::NextFocus),
        (_, KeyCode::BackTab) => Some(Msg::PreviousFocus),
        (_, KeyCode::Enter) => Some(Msg::Submit),
        (_, KeyCode::Backspace) => Some(Msg::Backspace),
        (_, KeyCode::Up) => Some(Msg::Navigate(DirectionKey::Up)),
        (_, KeyCode::Down) => Some(Msg::Navigate(DirectionKey::Down)),
        (modifiers, KeyCode::Char(character)) if !modifiers.contains(KeyModifiers::CONTROL) => {
            Some(Msg::Input(character))
        }
        _ => None,
    }
}
