use nlq_core::connection_session::ConnectionState;
use nlq_core::query_workflow::WorkflowState;
use nlq_core::results_table::{ResultGrid, TableView, EMPTY_STATE_MESSAGE};
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table, Wrap};
use ratatui::Frame;

use super::{FormField, Pane, TuiApp};

const INDEX_COLUMN_WIDTH: u16 = 6;

pub(super) fn render<G>(frame: &mut Frame<'_>, app: &TuiApp<G>) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(12),
            Constraint::Length(4),
        ])
        .split(frame.area());

    render_header(frame, app, chunks[0]);
    render_workspace(frame, app, chunks[1]);
    render_footer(frame, app, chunks[2]);

    if app.connection.is_gated() {
        render_connection_gate(frame, app);
    }
    if app.show_help {
        render_help_popup(frame);
    }
}

fn render_header<G>(frame: &mut Frame<'_>, app: &TuiApp<G>, area: Rect) {
    let database = match app.connection.state() {
        ConnectionState::Unknown => "checking",
        ConnectionState::Disconnected => "not connected",
        ConnectionState::Connected => "connected",
    };
    let header = Paragraph::new(Line::from(vec![
        Span::styled(
            format!(" Pane: {} ", app.pane.name()),
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw(" | "),
        Span::raw(format!("Backend: {}", app.api_url)),
        Span::raw(" | "),
        Span::raw(format!("Database: {database}")),
        Span::raw(" | "),
        Span::raw(format!(
            "Workflow: {}",
            workflow_label(app.session.workflow().state())
        )),
    ]))
    .block(
        Block::default()
            .borders(Borders::ALL)
            .title("Natural Language to SQL"),
    );
    frame.render_widget(header, area);
}

fn render_workspace<G>(frame: &mut Frame<'_>, app: &TuiApp<G>, area: Rect) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(4),
            Constraint::Length(6),
            Constraint::Min(6),
        ])
        .split(area);
    let lower = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
        .split(rows[2]);

    render_prompt(frame, app, rows[0]);
    render_sql_editor(frame, app, rows[1]);
    render_results(frame, app, lower[0]);
    render_chart(frame, app, lower[1]);
}

fn pane_block<G>(app: &TuiApp<G>, pane: Pane) -> Block<'static> {
    let style = if app.pane == pane && !app.connection.is_gated() {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default()
    };
    Block::default()
        .borders(Borders::ALL)
        .border_style(style)
        .title(pane.name())
}

fn error_line(message: String) -> Line<'static> {
    Line::from(Span::styled(message, Style::default().fg(Color::Red)))
}

fn render_prompt<G>(frame: &mut Frame<'_>, app: &TuiApp<G>, area: Rect) {
    let workflow = app.session.workflow();
    let mut lines = vec![Line::from(format!("> {}", workflow.prompt()))];
    if workflow.is_generating() {
        lines.push(Line::from("Generating..."));
    } else if let Some(error) = workflow.generate_error() {
        lines.push(error_line(error.to_string()));
    }

    let prompt = Paragraph::new(lines)
        .block(pane_block(app, Pane::Prompt))
        .wrap(Wrap { trim: false });
    frame.render_widget(prompt, area);
}

fn render_sql_editor<G>(frame: &mut Frame<'_>, app: &TuiApp<G>, area: Rect) {
    let sql = app.session.workflow().sql();
    let text = if sql.is_empty() {
        vec![Line::from(Span::styled(
            "Generate SQL from a prompt or type it here",
            Style::default().fg(Color::DarkGray),
        ))]
    } else {
        sql.lines().map(|line| Line::from(line.to_string())).collect()
    };

    let editor = Paragraph::new(text)
        .block(pane_block(app, Pane::SqlEditor))
        .wrap(Wrap { trim: false });
    frame.render_widget(editor, area);
}

fn render_results<G>(frame: &mut Frame<'_>, app: &TuiApp<G>, area: Rect) {
    let workflow = app.session.workflow();
    let block = pane_block(app, Pane::Results);

    let tips = workflow.optimization_tips();
    let sections = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(3),
            Constraint::Length(if tips.is_some() { 4 } else { 0 }),
        ])
        .split(area);

    if workflow.is_executing() {
        frame.render_widget(Paragraph::new("Executing...").block(block), sections[0]);
    } else if let TableView::Grid(grid) = workflow.table() {
        render_grid(frame, grid, app.results_cursor, block, sections[0]);
    } else if let Some(error) = workflow.execute_error() {
        frame.render_widget(
            Paragraph::new(error_line(error.to_string()))
                .block(block)
                .wrap(Wrap { trim: false }),
            sections[0],
        );
    } else {
        frame.render_widget(
            Paragraph::new(EMPTY_STATE_MESSAGE).block(block),
            sections[0],
        );
    }

    if let Some(tips) = tips {
        let tips = Paragraph::new(tips.to_string())
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title("Optimization Tips"),
            )
            .wrap(Wrap { trim: true });
        frame.render_widget(tips, sections[1]);
    }
}

fn render_grid(
    frame: &mut Frame<'_>,
    grid: &ResultGrid,
    cursor: usize,
    block: Block<'static>,
    area: Rect,
) {
    // Borders and the header row take three lines.
    let visible_limit = usize::from(area.height.saturating_sub(3)).max(1);
    let window_start = cursor.saturating_sub(visible_limit.saturating_sub(1));

    let header = Row::new(grid.headers())
        .style(Style::default().add_modifier(Modifier::BOLD));
    let rows = grid
        .visible_rows(window_start, visible_limit)
        .iter()
        .map(|row| {
            let mut cells = vec![Cell::from(row.index.to_string())];
            cells.extend(row.cells.iter().map(|cell| Cell::from(cell.as_str())));
            let style = if row.index == cursor + 1 {
                Style::default().add_modifier(Modifier::REVERSED)
            } else {
                Style::default()
            };
            Row::new(cells).style(style)
        });
    let widths = std::iter::once(Constraint::Length(INDEX_COLUMN_WIDTH))
        .chain(grid.columns().iter().map(|_| Constraint::Min(6)));

    let table = Table::new(rows, widths)
        .header(header)
        .block(block.title_bottom(format!(" {} rows ", grid.len())));
    frame.render_widget(table, area);
}

fn render_chart<G>(frame: &mut Frame<'_>, app: &TuiApp<G>, area: Rect) {
    let chart = app.session.chart();
    let mut lines = vec![Line::from(format!(
        "Type: {} (Ctrl+T to change)",
        chart.chart_type().label()
    ))];

    if !app.session.can_chart() && !chart.is_loading() && chart.image().is_none() {
        lines.push(Line::from("Run a query that returns rows to enable charts"));
    } else if chart.is_loading() {
        lines.push(Line::from("Generating chart..."));
    } else if let Some(error) = chart.error() {
        lines.push(error_line(error.to_string()));
    } else if let Some(image) = chart.image() {
        let (width, height) = image.dimensions();
        lines.push(Line::from(format!(
            "PNG {width}x{height}, {} bytes. Ctrl+S to save",
            image.bytes().len()
        )));
    } else {
        lines.push(Line::from("Press Enter or Ctrl+G to generate"));
    }

    if let Some(insights) = chart.insights() {
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            "Insights",
            Style::default().add_modifier(Modifier::BOLD),
        )));
        lines.extend(insights.lines().map(|line| Line::from(line.to_string())));
    }

    let panel = Paragraph::new(lines)
        .block(pane_block(app, Pane::Chart))
        .wrap(Wrap { trim: true });
    frame.render_widget(panel, area);
}

fn render_footer<G>(frame: &mut Frame<'_>, app: &TuiApp<G>, area: Rect) {
    let hints = if app.connection.is_gated() {
        "Tab/Up/Down: field | Enter: connect | F1: help | Ctrl+Q: quit".to_string()
    } else {
        footer_hints(
            app.session.workflow().can_download(),
            app.session.can_chart(),
        )
    };
    let footer = Paragraph::new(vec![
        Line::from(hints),
        Line::from(format!("Status: {}", app.status_line)),
    ])
    .block(Block::default().borders(Borders::ALL).title("Keys"));
    frame.render_widget(footer, area);
}

fn footer_hints(can_download: bool, can_chart: bool) -> String {
    let mut hints = vec!["Tab: pane", "Enter: run pane action", "Ctrl+E: execute"];
    if can_download {
        hints.push("Ctrl+D: CSV");
    }
    if can_chart {
        hints.push("Ctrl+G: chart");
    }
    hints.extend(["F1: help", "Ctrl+Q: quit"]);
    hints.join(" | ")
}

fn render_connection_gate<G>(frame: &mut Frame<'_>, app: &TuiApp<G>) {
    let area = centered_rect(60, 60, frame.area());
    frame.render_widget(Clear, area);

    let mut lines = vec![
        Line::from("Connect to a MySQL database to continue."),
        Line::from(""),
    ];
    for field in FormField::ALL {
        let value = app.form.value(field);
        let shown = if field == FormField::Password {
            "*".repeat(value.chars().count())
        } else {
            value.to_string()
        };
        let marker = if field == app.form.active_field { ">" } else { " " };
        lines.push(Line::from(format!("{marker} {:<11} {shown}", field.label())));
    }
    lines.push(Line::from(""));
    if app.connection.is_connecting() {
        lines.push(Line::from("Connecting..."));
    } else if let Some(error) = app.connection.last_error() {
        lines.push(error_line(error.to_string()));
    }

    let gate = Paragraph::new(lines)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title("Database Connection"),
        )
        .wrap(Wrap { trim: false });
    frame.render_widget(gate, area);
}

fn render_help_popup(frame: &mut Frame<'_>) {
    let area = centered_rect(70, 70, frame.area());
    frame.render_widget(Clear, area);
    let help = Paragraph::new(vec![
        Line::from("Global keymap"),
        Line::from("Ctrl+Q: quit"),
        Line::from("F1: toggle help"),
        Line::from("Tab / Shift+Tab: cycle panes or form fields"),
        Line::from("Enter: connect, generate, execute, download or chart (by pane)"),
        Line::from("Ctrl+E: execute SQL"),
        Line::from("Ctrl+D: download results as query_results.csv"),
        Line::from("Ctrl+G: generate chart"),
        Line::from("Ctrl+T: cycle chart type"),
        Line::from("Ctrl+S: save chart as chart.png"),
        Line::from("Up / Down: move through result rows"),
    ])
    .block(Block::default().borders(Borders::ALL).title("Help"));
    frame.render_widget(help, area);
}

fn centered_rect(width_percent: u16, height_percent: u16, area: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100_u16 - height_percent) / 2),
            Constraint::Percentage(height_percent),
            Constraint::Percentage((100_u16 - height_percent) / 2),
        ])
        .split(area);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100_u16 - width_percent) / 2),
            Constraint::Percentage(width_percent),
            Constraint::Percentage((100_u16 - width_percent) / 2),
        ])
        .split(vertical[1])[1]
}

fn workflow_label(state: WorkflowState) -> &'static str {
    match state {
        WorkflowState::Idle => "idle",
        WorkflowState::Generating => "generating SQL",
        WorkflowState::Ready => "SQL ready",
        WorkflowState::Executing => "executing",
        WorkflowState::Executed => "results ready",
    }
}

#[cfg(test)]
mod tests {
    use nlq_core::query_workflow::WorkflowState;
    use ratatui::layout::Rect;

    use super::{centered_rect, footer_hints, workflow_label};

    #[test]
    fn centered_rect_stays_inside_area() {
        let area = Rect::new(0, 0, 100, 40);
        let popup = centered_rect(60, 50, area);
        assert_eq!(popup.width, 60);
        assert_eq!(popup.height, 20);
        assert_eq!(popup.x, 20);
        assert_eq!(popup.y, 10);
    }

    #[test]
    fn footer_only_offers_available_actions() {
        let idle = footer_hints(false, false);
        assert!(!idle.contains("Ctrl+D"));
        assert!(!idle.contains("Ctrl+G"));

        let ready = footer_hints(true, true);
        assert!(ready.contains("Ctrl+D: CSV"));
        assert!(ready.contains("Ctrl+G: chart"));
    }

    #[test]
    fn workflow_states_have_labels() {
        assert_eq!(workflow_label(WorkflowState::Idle), "idle");
        assert_eq!(workflow_label(WorkflowState::Executed), "results ready");
    }
}
