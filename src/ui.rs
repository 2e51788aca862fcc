use crate::comparison::{compare_items, compare_transactions, ChangeDirection, ComparisonRow};
use crate::db::{truncate, Transaction};
use crate::deduplication::find_duplicates;
use crate::labels::{format_change, format_period_label, EnglishLabels};
use crate::period::{get_next_period, get_previous_period, Granularity, PeriodIdentifier};
use anyhow::Result;
use chrono::NaiveDate;
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState},
    Frame, Terminal,
};
use std::collections::HashMap;
use std::io;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    Transactions,
    Trends,
}

impl Page {
    pub fn next(&self) -> Self {
        match self {
            Page::Transactions => Page::Trends,
            Page::Trends => Page::Transactions,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Page::Transactions => "Transactions",
            Page::Trends => "Trends",
        }
    }
}

pub struct App {
    pub transactions: Vec<Transaction>,
    pub duplicates: HashMap<String, Vec<String>>,
    pub state: TableState,
    pub current_page: Page,
    pub show_detail: bool,
    pub only_duplicates: bool,

    // Trends page
    pub granularity: Granularity,
    pub period: PeriodIdentifier,
    pub by_items: bool,
    pub trend_rows: Vec<ComparisonRow>,
    pub trend_error: Option<String>,
}

impl App {
    pub fn new(transactions: Vec<Transaction>, today: NaiveDate) -> Self {
        let duplicates = find_duplicates(&transactions);

        let mut state = TableState::default();
        if !transactions.is_empty() {
            state.select(Some(0));
        }

        let granularity = Granularity::Month;
        let mut app = Self {
            transactions,
            duplicates,
            state,
            current_page: Page::Transactions,
            show_detail: false,
            only_duplicates: false,
            granularity,
            period: PeriodIdentifier::containing(today, granularity),
            by_items: false,
            trend_rows: Vec::new(),
            trend_error: None,
        };
        app.refresh_trends();
        app
    }

    /// Rows on the Transactions page, honouring the duplicates filter
    pub fn visible_transactions(&self) -> Vec<&Transaction> {
        self.transactions
            .iter()
            .filter(|tx| !self.only_duplicates || self.is_duplicate(tx))
            .collect()
    }

    pub fn is_duplicate(&self, tx: &Transaction) -> bool {
        tx.id
            .as_deref()
            .map_or(false, |id| self.duplicates.contains_key(id))
    }

    pub fn selected_transaction(&self) -> Option<&Transaction> {
        self.state
            .selected()
            .and_then(|i| self.visible_transactions().get(i).copied())
    }

    pub fn toggle_detail(&mut self) {
        self.show_detail = !self.show_detail;
    }

    pub fn toggle_duplicates_filter(&mut self) {
        self.only_duplicates = !self.only_duplicates;
        let len = self.visible_transactions().len();
        self.state.select(if len == 0 { None } else { Some(0) });
    }

    pub fn next_page(&mut self) {
        self.current_page = self.current_page.next();
    }

    pub fn next(&mut self) {
        let len = self.visible_transactions().len();
        if len == 0 {
            return;
        }
        let i = match self.state.selected() {
            Some(i) if i + 1 < len => i + 1,
            _ => 0,
        };
        self.state.select(Some(i));
    }

    pub fn previous(&mut self) {
        let len = self.visible_transactions().len();
        if len == 0 {
            return;
        }
        let i = match self.state.selected() {
            Some(0) | None => len - 1,
            Some(i) => i - 1,
        };
        self.state.select(Some(i));
    }

    // ========================================================================
    // TRENDS
    // ========================================================================

    pub fn refresh_trends(&mut self) {
        let result = if self.by_items {
            compare_items(&self.transactions, &self.period, self.granularity)
        } else {
            compare_transactions(&self.transactions, &self.period, self.granularity)
        };

        match result {
            Ok(rows) => {
                self.trend_rows = rows;
                self.trend_error = None;
            }
            Err(e) => {
                self.trend_rows.clear();
                self.trend_error = Some(e.to_string());
            }
        }
    }

    pub fn previous_period(&mut self) {
        if let Ok(period) = get_previous_period(&self.period, self.granularity) {
            self.period = period;
            self.refresh_trends();
        }
    }

    pub fn next_period(&mut self) {
        if let Ok(period) = get_next_period(&self.period, self.granularity) {
            self.period = period;
            self.refresh_trends();
        }
    }

    /// Switch granularity, keeping the period anchored on its first day
    pub fn cycle_granularity(&mut self) {
        let anchor = period_start(&self.period);
        self.granularity = self.granularity.cycle();
        self.period = PeriodIdentifier::containing(anchor, self.granularity);
        self.refresh_trends();
    }

    pub fn toggle_items(&mut self) {
        self.by_items = !self.by_items;
        self.refresh_trends();
    }
}

/// First calendar day covered by a period
fn period_start(period: &PeriodIdentifier) -> NaiveDate {
    let month = match (period.month, period.quarter) {
        (Some(month), _) => month,
        (None, Some(quarter)) => (quarter - 1) * 3 + 1,
        (None, None) => 1,
    };
    let day = period.week.map_or(1, |week| (week - 1) * 7 + 1);

    NaiveDate::from_ymd_opt(period.year, month, day)
        .or_else(|| NaiveDate::from_ymd_opt(period.year, 1, 1))
        .unwrap_or_default()
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

    res.map_err(Into::into)
}

fn run_app<B: ratatui::backend::Backend>(terminal: &mut Terminal<B>, app: &mut App) -> io::Result<()> {
    loop {
        terminal.draw(|f| ui(f, app))?;

        let Event::Key(key) = event::read()? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }

        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => return Ok(()),
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => return Ok(()),
            KeyCode::Tab => app.next_page(),
            _ => match app.current_page {
                Page::Transactions => match key.code {
                    KeyCode::Enter => app.toggle_detail(),
                    KeyCode::Char('d') => app.toggle_duplicates_filter(),
                    KeyCode::Down | KeyCode::Char('j') => app.next(),
                    KeyCode::Up | KeyCode::Char('k') => app.previous(),
                    _ => {}
                },
                Page::Trends => match key.code {
                    KeyCode::Left | KeyCode::Char('h') => app.previous_period(),
                    KeyCode::Right | KeyCode::Char('l') => app.next_period(),
                    KeyCode::Char('g') => app.cycle_granularity(),
                    KeyCode::Char('i') => app.toggle_items(),
                    _ => {}
                },
            },
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
        Page::Transactions if app.show_detail => {
            let content = Layout::default()
                .direction(Direction::Horizontal)
                .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
                .split(chunks[1]);
            render_transactions(f, content[0], app);
            render_detail_panel(f, content[1], app);
        }
        Page::Transactions => render_transactions(f, chunks[1], app),
        Page::Trends => render_trends(f, chunks[1], app),
    }

    render_status_bar(f, chunks[2], app);
}

fn render_header(f: &mut Frame, area: Rect, app: &App) {
    let mut spans = vec![];
    for (i, page) in [Page::Transactions, Page::Trends].iter().enumerate() {
        if i > 0 {
            spans.push(Span::raw(" │ "));
        }
        let style = if *page == app.current_page {
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD | Modifier::UNDERLINED)
        } else {
            Style::default().fg(Color::DarkGray)
        };
        spans.push(Span::styled(page.title().to_string(), style));
    }

    spans.push(Span::raw("  |  "));
    spans.push(Span::styled(
        format!("Total: {}", app.transactions.len()),
        Style::default().fg(Color::White),
    ));
    spans.push(Span::raw("  |  "));
    spans.push(Span::styled(
        format!("⚠ {} possible duplicates", app.duplicates.len()),
        Style::default().fg(Color::Red),
    ));

    let header = Paragraph::new(Line::from(spans))
        .block(Block::default().borders(Borders::ALL).border_style(Style::default().fg(Color::Cyan)));

    f.render_widget(header, area);
}

fn header_row(titles: &[&'static str]) -> Row<'static> {
    let cells = titles.iter().map(|h| {
        Cell::from(*h).style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD))
    });
    Row::new(cells).style(Style::default().bg(Color::DarkGray)).height(1)
}

fn render_transactions(f: &mut Frame, area: Rect, app: &mut App) {
    let rows: Vec<Row> = app
        .visible_transactions()
        .into_iter()
        .map(|tx| {
            let duplicate = app.is_duplicate(tx);
            let style = if duplicate {
                Style::default().fg(Color::Red)
            } else {
                Style::default()
            };

            Row::new(vec![
                Cell::from(if duplicate { "⚠" } else { " " }),
                Cell::from(tx.date.clone()),
                Cell::from(tx.time.clone().unwrap_or_default()),
                Cell::from(truncate(tx.display_name(), 30)),
                Cell::from(truncate(&tx.category, 20)),
                Cell::from(tx.total.to_string()),
            ])
            .style(style)
        })
        .collect();

    let title = if app.only_duplicates {
        " Transactions (duplicates only) "
    } else {
        " Transactions "
    };

    let table = Table::new(
        rows,
        [
            Constraint::Length(2),
            Constraint::Length(12),
            Constraint::Length(6),
            Constraint::Length(32),
            Constraint::Length(22),
            Constraint::Length(12),
        ],
    )
    .header(header_row(&["", "Date", "Time", "Merchant", "Category", "Total"]))
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White))
            .title(title),
    )
    .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
    .highlight_symbol("→ ");

    f.render_stateful_widget(table, area, &mut app.state);
}

fn render_detail_panel(f: &mut Frame, area: Rect, app: &App) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow))
        .title(" Receipt Details ");

    let Some(tx) = app.selected_transaction() else {
        f.render_widget(Paragraph::new("No transaction selected").block(block), area);
        return;
    };

    let label = |name: &'static str| {
        Span::styled(name, Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD))
    };

    let mut content = vec![
        Line::from(vec![label("  Merchant: "), Span::raw(tx.merchant.clone())]),
        Line::from(vec![label("  Alias: "), Span::raw(tx.alias.clone().unwrap_or_default())]),
        Line::from(vec![label("  Date: "), Span::raw(format!("{} {}", tx.date, tx.time.as_deref().unwrap_or("")))]),
        Line::from(vec![
            label("  Total: "),
            Span::raw(format!("{} {}", tx.total, tx.currency.as_deref().unwrap_or(""))),
        ]),
        Line::from(vec![label("  Category: "), Span::raw(tx.category.clone())]),
        Line::from(vec![
            label("  Place: "),
            Span::raw(format!(
                "{} {}",
                tx.city.as_deref().unwrap_or(""),
                tx.country.as_deref().unwrap_or("")
            )),
        ]),
        Line::from(""),
    ];

    if let Some(dups) = tx.id.as_deref().and_then(|id| app.duplicates.get(id)) {
        content.push(Line::from(Span::styled(
            "  POSSIBLE DUPLICATE OF",
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        )));
        for id in dups {
            content.push(Line::from(format!("    {}", id)));
        }
        content.push(Line::from(""));
    }

    content.push(Line::from(Span::styled(
        "  ITEMS",
        Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD | Modifier::UNDERLINED),
    )));
    for item in &tx.items {
        let qty = item.qty.map(|q| format!(" x{}", q)).unwrap_or_default();
        content.push(Line::from(format!("    {}{}  {}", truncate(&item.name, 24), qty, item.price)));
    }

    f.render_widget(Paragraph::new(content).block(block), area);
}

fn render_trends(f: &mut Frame, area: Rect, app: &App) {
    let en = EnglishLabels;
    let current_label = format_period_label(&app.period, app.granularity, &en);
    let previous_label = get_previous_period(&app.period, app.granularity)
        .map(|p| format_period_label(&p, app.granularity, &en))
        .unwrap_or_default();

    let title = format!(
        " {} vs {} · {}{} ",
        current_label,
        previous_label,
        app.granularity,
        if app.by_items { " · items" } else { "" }
    );
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::White))
        .title(title);

    if let Some(error) = &app.trend_error {
        f.render_widget(Paragraph::new(error.clone()).block(block), area);
        return;
    }

    let rows: Vec<Row> = app
        .trend_rows
        .iter()
        .map(|row| {
            let color = match row.change_direction {
                ChangeDirection::Up => Color::Red,
                ChangeDirection::Down => Color::Green,
                ChangeDirection::New => Color::Yellow,
                ChangeDirection::Same => Color::White,
            };
            Row::new(vec![
                Cell::from(truncate(&row.category, 24)),
                Cell::from(format!("{:.0}", row.value)),
                Cell::from(format!("{:.0}", row.previous_value)),
                Cell::from(format_change(&row.change(), &en)).style(Style::default().fg(color)),
                Cell::from(row.count.to_string()),
            ])
        })
        .collect();

    let table = Table::new(
        rows,
        [
            Constraint::Length(26),
            Constraint::Length(14),
            Constraint::Length(14),
            Constraint::Length(12),
            Constraint::Length(8),
        ],
    )
    .header(header_row(&["Category", "Current", "Previous", "Change", "Count"]))
    .block(block);

    f.render_widget(table, area);
}

fn render_status_bar(f: &mut Frame, area: Rect, app: &App) {
    let key = |k: &'static str| Span::styled(k, Style::default().fg(Color::Yellow));

    let mut spans = match app.current_page {
        Page::Transactions => vec![
            Span::styled(
                format!(
                    " Row: {}/{} ",
                    app.state.selected().map(|i| i + 1).unwrap_or(0),
                    app.visible_transactions().len()
                ),
                Style::default().fg(Color::Cyan),
            ),
            Span::raw(" | "),
            key("Enter"),
            Span::raw(" Details | "),
            key("d"),
            Span::raw(" Duplicates only | "),
            key("↑/↓"),
            Span::raw(" Nav | "),
        ],
        Page::Trends => vec![
            key(" ←/→"),
            Span::raw(" Period | "),
            key("g"),
            Span::raw(" Granularity | "),
            key("i"),
            Span::raw(" Items | "),
        ],
    };
    spans.push(key("Tab"));
    spans.push(Span::raw(" Page | "));
    spans.push(Span::styled("q", Style::default().fg(Color::Red)));
    spans.push(Span::raw(" Quit"));

    let status_bar = Paragraph::new(Line::from(spans)).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White)),
    );

    f.render_widget(status_bar, area);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tx(id: &str, date: &str, time: &str, category: &str, total: i64) -> Transaction {
        Transaction {
            id: Some(id.to_string()),
            date: date.to_string(),
            merchant: "Test".to_string(),
            category: category.to_string(),
            total,
            time: Some(time.to_string()),
            ..Default::default()
        }
    }

    fn app() -> App {
        App::new(
            vec![
                tx("a", "2026-03-10", "14:00", "Supermarket", 100),
                tx("b", "2026-03-10", "14:20", "Supermarket", 100),
                tx("c", "2026-02-10", "09:00", "Supermarket", 50),
            ],
            NaiveDate::from_ymd_opt(2026, 3, 15).unwrap(),
        )
    }

    #[test]
    fn test_duplicates_filter() {
        let mut app = app();
        assert_eq!(app.visible_transactions().len(), 3);

        app.toggle_duplicates_filter();
        let ids: Vec<_> = app.visible_transactions().iter().filter_map(|t| t.id.clone()).collect();
        assert_eq!(ids, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(app.state.selected(), Some(0));
    }

    #[test]
    fn test_navigation_wraps() {
        let mut app = app();
        app.previous();
        assert_eq!(app.state.selected(), Some(2));
        app.next();
        assert_eq!(app.state.selected(), Some(0));
    }

    #[test]
    fn test_trends_follow_period_changes() {
        let mut app = app();
        assert_eq!(app.period, PeriodIdentifier::month(2026, 3));
        assert_eq!(app.trend_rows[0].value, 200.0);
        assert_eq!(app.trend_rows[0].previous_value, 50.0);

        app.previous_period();
        assert_eq!(app.period, PeriodIdentifier::month(2026, 2));
        assert_eq!(app.trend_rows[0].value, 50.0);

        app.next_period();
        assert_eq!(app.period, PeriodIdentifier::month(2026, 3));
    }

    #[test]
    fn test_cycle_granularity_keeps_anchor() {
        let mut app = app();
        app.cycle_granularity();
        assert_eq!(app.granularity, Granularity::Quarter);
        assert_eq!(app.period, PeriodIdentifier::quarter(2026, 1));

        app.cycle_granularity();
        assert_eq!(app.period, PeriodIdentifier::year(2026));

        app.cycle_granularity();
        assert_eq!(app.period, PeriodIdentifier::week(2026, 1, 1));
    }
}
