// 🖥️ Segment dashboard
// Overview of segment sizes, per-customer table with segment filter, and the
// metric distributions of each segment.

use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{BarChart, Block, Borders, Cell, Paragraph, Row, Table, TableState},
    Frame, Terminal,
};
use rfm_segmentation::{Metric, Segment, SegmentReport, SegmentedCustomer};
use std::io;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    Overview,
    Customers,
    Distributions,
}

impl Page {
    pub const ALL: [Page; 3] = [Page::Overview, Page::Customers, Page::Distributions];

    pub fn next(&self) -> Self {
        match self {
            Page::Overview => Page::Customers,
            Page::Customers => Page::Distributions,
            Page::Distributions => Page::Overview,
        }
    }

    pub fn previous(&self) -> Self {
        match self {
            Page::Overview => Page::Distributions,
            Page::Customers => Page::Overview,
            Page::Distributions => Page::Customers,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Page::Overview => "Overview",
            Page::Customers => "Customers",
            Page::Distributions => "Distributions",
        }
    }
}

pub struct App {
    pub source: String,
    pub customers: Vec<SegmentedCustomer>,
    pub report: SegmentReport,
    /// Indexes into `customers` that pass the active filter
    pub visible: Vec<usize>,
    pub filter: Option<Segment>,
    pub state: TableState,
    pub current_page: Page,
    pub show_detail: bool,
}

impl App {
    pub fn new(source: impl Into<String>, customers: Vec<SegmentedCustomer>) -> Self {
        let report = SegmentReport::build(&customers);
        let visible: Vec<usize> = (0..customers.len()).collect();

        let mut state = TableState::default();
        if !visible.is_empty() {
            state.select(Some(0));
        }

        Self {
            source: source.into(),
            customers,
            report,
            visible,
            filter: None,
            state,
            current_page: Page::Overview,
            show_detail: false,
        }
    }

    pub fn apply_filter(&mut self, filter: Option<Segment>) {
        self.filter = filter;
        self.visible = self
            .customers
            .iter()
            .enumerate()
            .filter(|(_, c)| filter.map_or(true, |segment| c.segment == segment))
            .map(|(i, _)| i)
            .collect();

        self.state
            .select(if self.visible.is_empty() { None } else { Some(0) });
    }

    pub fn selected_customer(&self) -> Option<&SegmentedCustomer> {
        self.state
            .selected()
            .and_then(|i| self.visible.get(i))
            .and_then(|&i| self.customers.get(i))
    }

    pub fn toggle_detail(&mut self) {
        self.show_detail = !self.show_detail;
    }

    pub fn next_page(&mut self) {
        self.current_page = self.current_page.next();
    }

    pub fn previous_page(&mut self) {
        self.current_page = self.current_page.previous();
    }

    pub fn next(&mut self) {
        self.move_by(1);
    }

    pub fn previous(&mut self) {
        self.move_by(-1);
    }

    pub fn page_down(&mut self) {
        self.move_by(10);
    }

    pub fn page_up(&mut self) {
        self.move_by(-10);
    }

    pub fn first(&mut self) {
        if !self.visible.is_empty() {
            self.state.select(Some(0));
        }
    }

    pub fn last(&mut self) {
        if !self.visible.is_empty() {
            self.state.select(Some(self.visible.len() - 1));
        }
    }

    // Clamps at both ends
    fn move_by(&mut self, delta: isize) {
        if self.visible.is_empty() {
            return;
        }
        let max = self.visible.len() as isize - 1;
        let current = self.state.selected().unwrap_or(0) as isize;
        self.state.select(Some((current + delta).clamp(0, max) as usize));
    }
}

pub fn run_ui(app: &mut App) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, app);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    res?;
    Ok(())
}

fn run_app<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
) -> io::Result<()> {
    loop {
        terminal.draw(|f| ui(f, app))?;

        if let Event::Key(key) = event::read()? {
            match key.code {
                KeyCode::Char('q') | KeyCode::Esc => return Ok(()),
                KeyCode::Enter => app.toggle_detail(),
                KeyCode::Tab => {
                    if key.modifiers.contains(KeyModifiers::SHIFT) {
                        app.previous_page();
                    } else {
                        app.next_page();
                    }
                }
                KeyCode::BackTab => app.previous_page(),
                KeyCode::Char(c @ '1'..='4') => {
                    let index = c as usize - '1' as usize;
                    app.apply_filter(Some(Segment::ALL[index]));
                    app.current_page = Page::Customers;
                }
                KeyCode::Char('c') => app.apply_filter(None),
                KeyCode::Down | KeyCode::Char('j') => app.next(),
                KeyCode::Up | KeyCode::Char('k') => app.previous(),
                KeyCode::PageDown => app.page_down(),
                KeyCode::PageUp => app.page_up(),
                KeyCode::Home => app.first(),
                KeyCode::End => app.last(),
                _ => {}
            }
        }
    }
}

fn ui(f: &mut Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header with navigation
            Constraint::Min(0),    // Content area
            Constraint::Length(3), // Status bar
        ])
        .split(f.size());

    render_header(f, chunks[0], app);

    match app.current_page {
        Page::Overview => render_overview(f, chunks[1], app),
        Page::Customers if app.show_detail => {
            let content_chunks = Layout::default()
                .direction(Direction::Horizontal)
                .constraints([Constraint::Percentage(65), Constraint::Percentage(35)])
                .split(chunks[1]);

            render_customers(f, content_chunks[0], app);
            render_detail_panel(f, content_chunks[1], app);
        }
        Page::Customers => render_customers(f, chunks[1], app),
        Page::Distributions => render_distributions(f, chunks[1], app),
    }

    render_status_bar(f, chunks[2], app);
}

fn segment_color(segment: Segment) -> Color {
    match segment {
        Segment::LoyalCustomer => Color::Green,
        Segment::PotentialLoyalist => Color::Cyan,
        Segment::AtRisk => Color::Yellow,
        Segment::ChurnRisk => Color::Red,
    }
}

fn render_header(f: &mut Frame, area: Rect, app: &App) {
    let mut tab_spans = vec![];
    for (i, page) in Page::ALL.iter().enumerate() {
        if i > 0 {
            tab_spans.push(Span::raw(" │ "));
        }

        let style = if *page == app.current_page {
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD | Modifier::UNDERLINED)
        } else {
            Style::default().fg(Color::DarkGray)
        };

        tab_spans.push(Span::styled(page.title().to_string(), style));
    }

    tab_spans.push(Span::raw("  |  "));
    tab_spans.push(Span::styled(
        format!("Customers: {}", app.report.total_customers),
        Style::default().fg(Color::White),
    ));
    tab_spans.push(Span::raw("  |  "));
    tab_spans.push(Span::styled(
        truncate(&app.source, 40),
        Style::default().fg(Color::DarkGray),
    ));

    let header = Paragraph::new(vec![Line::from(tab_spans)])
        .block(Block::default().borders(Borders::ALL).border_style(Style::default().fg(Color::Cyan)));

    f.render_widget(header, area);
}

fn render_overview(f: &mut Frame, area: Rect, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
        .split(area);

    let bars: Vec<(&str, u64)> = app
        .report
        .counts
        .iter()
        .map(|c| (c.segment.label(), c.count as u64))
        .collect();

    let chart = BarChart::default()
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::White))
                .title(" Customers per Segment "),
        )
        .data(&bars[..])
        .bar_width(20)
        .bar_gap(3)
        .bar_style(Style::default().fg(Color::Cyan))
        .value_style(Style::default().fg(Color::Black).bg(Color::Cyan));

    f.render_widget(chart, chunks[0]);

    let header_cells = ["Segment", "Customers", "Share", "Key"].iter().map(|h| {
        Cell::from(*h).style(
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        )
    });
    let header = Row::new(header_cells)
        .style(Style::default().bg(Color::DarkGray))
        .height(1);

    let rows = app.report.counts.iter().map(|c| {
        let key = Segment::ALL
            .iter()
            .position(|s| *s == c.segment)
            .map(|i| (i + 1).to_string())
            .unwrap_or_default();

        Row::new(vec![
            Cell::from(c.segment.label()).style(Style::default().fg(segment_color(c.segment))),
            Cell::from(c.count.to_string()),
            Cell::from(format!("{:.1}%", c.percentage)),
            Cell::from(key).style(Style::default().fg(Color::Yellow)),
        ])
        .height(1)
    });

    let table = Table::new(
        rows,
        [
            Constraint::Length(22),
            Constraint::Length(12),
            Constraint::Length(10),
            Constraint::Length(5),
        ],
    )
    .header(header)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White))
            .title(" Segment Share "),
    );

    f.render_widget(table, chunks[1]);
}

fn render_customers(f: &mut Frame, area: Rect, app: &mut App) {
    let header_cells = [
        "CustomerID", "Recency", "Frequency", "Monetary", "R", "F", "M", "RFM", "Score", "Segment",
    ]
    .iter()
    .map(|h| {
        Cell::from(*h).style(
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        )
    });

    let header = Row::new(header_cells)
        .style(Style::default().bg(Color::DarkGray))
        .height(1);

    let customers = &app.customers;
    let rows = app.visible.iter().map(|&i| {
        let customer = &customers[i];
        let scored = &customer.scored;
        let color = segment_color(customer.segment);

        let cells = vec![
            Cell::from(truncate(scored.metrics.customer_id.as_str(), 14)),
            Cell::from(scored.metrics.recency_days.to_string()),
            Cell::from(scored.metrics.frequency.to_string()),
            Cell::from(format!("{:.2}", scored.metrics.monetary)),
            Cell::from(scored.r_score.to_string()),
            Cell::from(scored.f_score.to_string()),
            Cell::from(scored.m_score.to_string()),
            Cell::from(scored.rfm_segment_code.clone()),
            Cell::from(scored.rfm_score.to_string()),
            Cell::from(customer.segment.label()).style(Style::default().fg(color)),
        ];

        Row::new(cells).height(1)
    });

    let title = match app.filter {
        Some(segment) => format!(" Customers - {} ", segment.label()),
        None => " Customers ".to_string(),
    };

    let table = Table::new(
        rows,
        [
            Constraint::Length(14),
            Constraint::Length(8),
            Constraint::Length(10),
            Constraint::Length(14),
            Constraint::Length(2),
            Constraint::Length(2),
            Constraint::Length(2),
            Constraint::Length(4),
            Constraint::Length(6),
            Constraint::Length(20),
        ],
    )
    .header(header)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White))
            .title(title),
    )
    .highlight_style(
        Style::default()
            .bg(Color::DarkGray)
            .add_modifier(Modifier::BOLD),
    )
    .highlight_symbol("→ ");

    f.render_stateful_widget(table, area, &mut app.state);
}

fn render_detail_panel(f: &mut Frame, area: Rect, app: &App) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow))
        .title(" Customer Details ");

    let customer = match app.selected_customer() {
        Some(c) => c,
        None => {
            f.render_widget(Paragraph::new("No customer selected").block(block), area);
            return;
        }
    };
    let scored = &customer.scored;
    let label = Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD);

    let content = vec![
        Line::from(""),
        Line::from(vec![
            Span::styled("  Customer: ", label),
            Span::raw(scored.metrics.customer_id.as_str().to_string()),
        ]),
        Line::from(""),
        Line::from(vec![
            Span::styled("  Recency: ", label),
            Span::raw(format!("{} days", scored.metrics.recency_days)),
            Span::styled(format!("  (R {})", scored.r_score), Style::default().fg(Color::Yellow)),
        ]),
        Line::from(vec![
            Span::styled("  Frequency: ", label),
            Span::raw(format!("{} lines", scored.metrics.frequency)),
            Span::styled(format!("  (F {})", scored.f_score), Style::default().fg(Color::Yellow)),
        ]),
        Line::from(vec![
            Span::styled("  Monetary: ", label),
            Span::raw(format!("{:.2}", scored.metrics.monetary)),
            Span::styled(format!("  (M {})", scored.m_score), Style::default().fg(Color::Yellow)),
        ]),
        Line::from(""),
        Line::from("  ─────────────────────────────"),
        Line::from(""),
        Line::from(vec![
            Span::styled("  RFM code: ", label),
            Span::raw(scored.rfm_segment_code.clone()),
        ]),
        Line::from(vec![
            Span::styled("  RFM score: ", label),
            Span::raw(scored.rfm_score.to_string()),
        ]),
        Line::from(vec![
            Span::styled("  Segment: ", label),
            Span::styled(
                customer.segment.label(),
                Style::default()
                    .fg(segment_color(customer.segment))
                    .add_modifier(Modifier::BOLD),
            ),
        ]),
        Line::from(""),
        Line::from(vec![Span::styled(
            "  Press Enter to close",
            Style::default()
                .fg(Color::DarkGray)
                .add_modifier(Modifier::ITALIC),
        )]),
    ];

    f.render_widget(Paragraph::new(content).block(block), area);
}

fn render_distributions(f: &mut Frame, area: Rect, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Ratio(1, 3),
            Constraint::Ratio(1, 3),
            Constraint::Ratio(1, 3),
        ])
        .split(area);

    for (metric, chunk) in Metric::ALL.iter().zip(chunks.iter()) {
        let header_cells = ["Segment", "min", "Q1", "median", "Q3", "max", "mean"]
            .iter()
            .map(|h| {
                Cell::from(*h).style(
                    Style::default()
                        .fg(Color::Yellow)
                        .add_modifier(Modifier::BOLD),
                )
            });
        let header = Row::new(header_cells)
            .style(Style::default().bg(Color::DarkGray))
            .height(1);

        let rows = app.report.distributions.iter().map(|d| {
            let s = d.metric(*metric);
            Row::new(vec![
                Cell::from(d.segment.label()).style(Style::default().fg(segment_color(d.segment))),
                Cell::from(format!("{:.2}", s.min)),
                Cell::from(format!("{:.2}", s.q1)),
                Cell::from(format!("{:.2}", s.median)),
                Cell::from(format!("{:.2}", s.q3)),
                Cell::from(format!("{:.2}", s.max)),
                Cell::from(format!("{:.2}", s.mean)),
            ])
            .height(1)
        });

        let table = Table::new(
            rows,
            [
                Constraint::Length(20),
                Constraint::Length(12),
                Constraint::Length(12),
                Constraint::Length(12),
                Constraint::Length(12),
                Constraint::Length(12),
                Constraint::Length(12),
            ],
        )
        .header(header)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::White))
                .title(format!(" {} by Segment ", metric.name())),
        );

        f.render_widget(table, *chunk);
    }
}

fn render_status_bar(f: &mut Frame, area: Rect, app: &App) {
    let selected = app.state.selected().map(|i| i + 1).unwrap_or(0);
    let total = app.visible.len();

    let mut status_spans = vec![Span::styled(
        format!(" Row: {}/{} ", selected, total),
        Style::default().fg(Color::Cyan),
    )];

    if let Some(segment) = app.filter {
        status_spans.push(Span::raw(" | "));
        status_spans.push(Span::styled(
            format!("Filter: {}", segment.label()),
            Style::default().fg(segment_color(segment)),
        ));
        status_spans.push(Span::raw(" ("));
        status_spans.push(Span::styled("c", Style::default().fg(Color::Yellow)));
        status_spans.push(Span::raw(" clear)"));
    }

    status_spans.push(Span::raw(" | "));
    status_spans.push(Span::styled("1-4", Style::default().fg(Color::Yellow)));
    status_spans.push(Span::raw(" Segment | "));
    status_spans.push(Span::styled("Enter", Style::default().fg(Color::Yellow)));
    status_spans.push(Span::raw(" Details | "));
    status_spans.push(Span::styled("Tab", Style::default().fg(Color::Yellow)));
    status_spans.push(Span::raw(" Page | "));
    status_spans.push(Span::styled("↑/↓", Style::default().fg(Color::Yellow)));
    status_spans.push(Span::raw(" Nav | "));
    status_spans.push(Span::styled("q", Style::default().fg(Color::Red)));
    status_spans.push(Span::raw(" Quit"));

    let status_bar = Paragraph::new(vec![Line::from(status_spans)]).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White)),
    );

    f.render_widget(status_bar, area);
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
