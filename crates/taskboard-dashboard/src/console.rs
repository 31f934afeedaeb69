//! Terminal console for the taskboard.
//!
//! Renders the latest [`DashboardView`] from the loop's `watch` channel and
//! turns key presses into [`UserAction`]s. The console holds no data of its
//! own beyond the focused base and the scroll offset.
//!
//! Launch with `taskboard` (the default mode).

use std::io::{self, Stdout};
use std::time::Duration;

use chrono::{DateTime, Utc};
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
    widgets::{Block, Borders, Paragraph},
    Frame, Terminal,
};
use tokio::sync::{mpsc, watch};

use taskboard_state::{EmptyReason, Projection};
use taskboard_sync::ChannelState;

use crate::dashboard::{format_delay, DashboardView, UserAction};
use crate::tui::LogCategory;

const BAR_WIDTH: usize = 20;

/// Result of a key press.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyOutcome {
    Nothing,
    Send(UserAction),
    Quit,
}

struct Console {
    views: watch::Receiver<DashboardView>,
    actions: mpsc::Sender<UserAction>,
    state: ConsoleState,
}

/// Local UI state: focused base and chart scroll.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsoleState {
    /// Focused base, tracked by name so it follows reorders.
    pub focus: Option<String>,
    pub chart_scroll: u16,
}

impl ConsoleState {
    fn focus_index(&self, view: &DashboardView) -> Option<usize> {
        let focus = self.focus.as_deref()?;
        view.bases.iter().position(|b| b.base == focus)
    }

    /// Focused base, falling back to the first one when the focus vanished.
    pub fn focused<'a>(&self, view: &'a DashboardView) -> Option<&'a str> {
        let index = self.focus_index(view).unwrap_or(0);
        view.bases.get(index).map(|b| b.base.as_str())
    }

    fn step_focus(&mut self, view: &DashboardView, delta: isize) {
        if view.bases.is_empty() {
            self.focus = None;
            return;
        }
        let current = self.focus_index(view).unwrap_or(0) as isize;
        let last = view.bases.len() as isize - 1;
        let next = (current + delta).clamp(0, last) as usize;
        self.focus = Some(view.bases[next].base.clone());
    }

    /// Map a key press to an outcome.
    pub fn handle_key(
        &mut self,
        code: KeyCode,
        modifiers: KeyModifiers,
        view: &DashboardView,
    ) -> KeyOutcome {
        match (code, modifiers) {
            (KeyCode::Char('c'), KeyModifiers::CONTROL) => KeyOutcome::Quit,
            (KeyCode::Char('q'), _) | (KeyCode::Esc, _) => KeyOutcome::Quit,
            (KeyCode::Up, _) | (KeyCode::Char('k'), _) => {
                self.step_focus(view, -1);
                KeyOutcome::Nothing
            }
            (KeyCode::Down, _) | (KeyCode::Char('j'), _) => {
                self.step_focus(view, 1);
                KeyOutcome::Nothing
            }
            (KeyCode::Char(' '), _) | (KeyCode::Enter, _) => match self.focused(view) {
                Some(base) => {
                    let base = base.to_string();
                    self.focus = Some(base.clone());
                    KeyOutcome::Send(UserAction::ToggleBase(base))
                }
                None => KeyOutcome::Nothing,
            },
            (KeyCode::Char('a'), _) => KeyOutcome::Send(UserAction::ToggleAll),
            (KeyCode::Char('K'), _) => self.move_focused(view, -1),
            (KeyCode::Char('J'), _) => self.move_focused(view, 1),
            (KeyCode::Char('r'), _) => KeyOutcome::Send(UserAction::Refresh),
            (KeyCode::Char('c'), _) => KeyOutcome::Send(UserAction::Reconnect),
            (KeyCode::PageUp, _) => {
                self.chart_scroll = self.chart_scroll.saturating_sub(5);
                KeyOutcome::Nothing
            }
            (KeyCode::PageDown, _) => {
                self.chart_scroll = self.chart_scroll.saturating_add(5);
                KeyOutcome::Nothing
            }
            _ => KeyOutcome::Nothing,
        }
    }

    fn move_focused(&mut self, view: &DashboardView, delta: isize) -> KeyOutcome {
        let Some(base) = self.focused(view).map(str::to_string) else {
            return KeyOutcome::Nothing;
        };
        self.focus = Some(base.clone());
        match move_request(view, &base, delta) {
            Some(action) => KeyOutcome::Send(action),
            None => KeyOutcome::Nothing,
        }
    }
}

/// Move `base` by `delta` within the displayed list. Hidden bases cannot move.
pub fn move_request(view: &DashboardView, base: &str, delta: isize) -> Option<UserAction> {
    let displayed = view.displayed_bases();
    let from = displayed.iter().position(|b| b == base)?;
    let to = from as isize + delta;
    if to < 0 || to >= displayed.len() as isize {
        return None;
    }
    Some(UserAction::MoveBase {
        from,
        to: to as usize,
    })
}

pub fn percent_bar(percent: u32, width: usize) -> String {
    let filled = ((percent.min(100) as usize) * width + 50) / 100;
    format!("{}{}", "#".repeat(filled), ".".repeat(width - filled))
}

pub fn format_age(last_updated: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    let Some(at) = last_updated else {
        return "never".to_string();
    };
    let secs = (now - at).num_seconds().max(0);
    let age = match secs {
        0..=59 => format!("{secs}s ago"),
        60..=3599 => format!("{}m ago", secs / 60),
        _ => format!("{}h ago", secs / 3600),
    };
    format!("{} ({age})", at.format("%H:%M:%S"))
}

pub fn channel_label(view: &DashboardView) -> (String, Color) {
    if !view.live_enabled {
        return ("off".to_string(), Color::DarkGray);
    }
    let Some(status) = view.channel else {
        return ("starting".to_string(), Color::DarkGray);
    };
    match status.state {
        ChannelState::Connected => ("connected".to_string(), Color::Green),
        ChannelState::Connecting => ("connecting".to_string(), Color::Yellow),
        ChannelState::Disconnected if status.exhausted => {
            ("gave up (c to reconnect)".to_string(), Color::Red)
        }
        ChannelState::Disconnected => match status.retry_in_ms {
            Some(ms) => (
                format!(
                    "retry #{} in {}",
                    status.attempt,
                    format_delay(Duration::from_millis(ms))
                ),
                Color::Yellow,
            ),
            None => ("disconnected".to_string(), Color::Red),
        },
    }
}

/// Chart panel content: one header per base, one block per chart.
pub fn chart_lines(projection: &Projection) -> Vec<Line<'static>> {
    if let Some(reason) = projection.empty_reason {
        let text = match reason {
            EmptyReason::NoBasesSelected => "  No bases selected. Press a to show all.",
            EmptyReason::NoData => "  No data.",
        };
        return vec![Line::from(Span::styled(
            text,
            Style::default().fg(Color::DarkGray),
        ))];
    }

    let mut lines = Vec::new();
    for group in &projection.groups {
        lines.push(Line::from(Span::styled(
            format!(" {}", group.label),
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        )));
        for chart in &group.charts {
            let mut header = vec![
                Span::styled(format!("   {}", chart.name), Style::default().fg(Color::White)),
                Span::styled(
                    format!("  total {}", chart.aggregate.total),
                    Style::default().fg(Color::Gray),
                ),
            ];
            if !chart.folded_subtasks.is_empty() {
                header.push(Span::styled(
                    format!("  +{} subtasks", chart.folded_subtasks.len()),
                    Style::default().fg(Color::DarkGray),
                ));
            }
            lines.push(Line::from(header));
            for point in &chart.aggregate.points {
                lines.push(Line::from(vec![
                    Span::styled(
                        format!("     {:<14}", point.label),
                        Style::default().fg(Color::Gray),
                    ),
                    Span::styled(
                        percent_bar(point.percent, BAR_WIDTH),
                        Style::default().fg(Color::Green),
                    ),
                    Span::styled(
                        format!(" {:>3}% ({})", point.percent, point.value),
                        Style::default().fg(Color::White),
                    ),
                ]));
            }
        }
        lines.push(Line::from(""));
    }
    lines
}

fn log_color(category: LogCategory) -> Color {
    match category {
        LogCategory::System => Color::Cyan,
        LogCategory::Data => Color::Green,
        LogCategory::Channel => Color::Yellow,
        LogCategory::View => Color::Gray,
        LogCategory::Error => Color::Red,
    }
}

impl Console {
    fn new(views: watch::Receiver<DashboardView>, actions: mpsc::Sender<UserAction>) -> Self {
        Self {
            views,
            actions,
            state: ConsoleState::default(),
        }
    }

    fn render(&self, frame: &mut Frame, view: &DashboardView) {
        let outer = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3), // Status bar
                Constraint::Min(8),    // Bases + charts + log
                Constraint::Length(1), // Key hints
            ])
            .split(frame.area());

        self.render_status_bar(frame, outer[0], view);
        self.render_main_area(frame, outer[1], view);
        self.render_hints(frame, outer[2]);
    }

    fn render_status_bar(&self, frame: &mut Frame, area: Rect, view: &DashboardView) {
        let block = Block::default()
            .title(" Taskboard ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan));

        let (channel, channel_color) = channel_label(view);
        let updated = if view.fetch_enabled || view.last_updated.is_some() {
            format_age(view.last_updated, Utc::now())
        } else {
            "endpoint not configured".to_string()
        };

        let status_line = Line::from(vec![
            Span::styled("  Live: ", Style::default().fg(Color::Gray)),
            Span::styled(channel, Style::default().fg(channel_color)),
            Span::styled("  |  Updated: ", Style::default().fg(Color::Gray)),
            Span::styled(updated, Style::default().fg(Color::White)),
            Span::styled("  |  Charts: ", Style::default().fg(Color::Gray)),
            Span::styled(
                view.projection.chart_count().to_string(),
                Style::default().fg(Color::Magenta),
            ),
            Span::styled("  |  Bases: ", Style::default().fg(Color::Gray)),
            Span::styled(
                format!(
                    "{}/{}",
                    view.projection.groups.len(),
                    view.bases.len()
                ),
                Style::default().fg(Color::LightCyan),
            ),
        ]);

        frame.render_widget(Paragraph::new(status_line).block(block), area);
    }

    fn render_main_area(&self, frame: &mut Frame, area: Rect, view: &DashboardView) {
        let columns = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([
                Constraint::Percentage(28), // Base picker
                Constraint::Percentage(72), // Charts + log
            ])
            .split(area);

        self.render_bases(frame, columns[0], view);

        let right_column = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Min(6),    // Charts
                Constraint::Length(8), // Event log
            ])
            .split(columns[1]);

        self.render_charts(frame, right_column[0], view);
        self.render_log(frame, right_column[1], view);
    }

    fn render_bases(&self, frame: &mut Frame, area: Rect, view: &DashboardView) {
        let all_marker = if view.selection.is_all() { "x" } else { " " };
        let block = Block::default()
            .title(format!(" Bases [{all_marker}] all "))
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Yellow));

        if view.bases.is_empty() {
            let text = Paragraph::new(Line::from(Span::styled(
                "  Waiting for data...",
                Style::default().fg(Color::DarkGray),
            )))
            .block(block);
            frame.render_widget(text, area);
            return;
        }

        let focused = self.state.focused(view);
        let lines: Vec<Line> = view
            .bases
            .iter()
            .map(|pick| {
                let is_focused = focused == Some(pick.base.as_str());
                let marker = if pick.selected { "[x]" } else { "[ ]" };
                let mut style = Style::default().fg(if pick.selected {
                    Color::White
                } else {
                    Color::DarkGray
                });
                if is_focused {
                    style = style.add_modifier(Modifier::REVERSED);
                }
                Line::from(Span::styled(format!(" {marker} {}", pick.label), style))
            })
            .collect();

        frame.render_widget(Paragraph::new(lines).block(block), area);
    }

    fn render_charts(&self, frame: &mut Frame, area: Rect, view: &DashboardView) {
        let block = Block::default()
            .title(format!(" Charts ({}) ", view.projection.chart_count()))
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White));

        let visible_height = area.height.saturating_sub(2) as usize;
        let visible: Vec<Line> = chart_lines(&view.projection)
            .into_iter()
            .skip(self.state.chart_scroll as usize)
            .take(visible_height)
            .collect();

        frame.render_widget(Paragraph::new(visible).block(block), area);
    }

    fn render_log(&self, frame: &mut Frame, area: Rect, view: &DashboardView) {
        let block = Block::default()
            .title(" Event Log ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White));

        let inner_height = area.height.saturating_sub(2) as usize;
        let start = view.log.len().saturating_sub(inner_height);
        let lines: Vec<Line> = view.log[start..]
            .iter()
            .map(|entry| {
                Line::from(vec![
                    Span::styled(
                        format!("  [{}] ", entry.timestamp.format("%H:%M:%S")),
                        Style::default().fg(Color::DarkGray),
                    ),
                    Span::styled(
                        format!("{:<5}", entry.category.tag()),
                        Style::default().fg(log_color(entry.category)),
                    ),
                    Span::styled(entry.message.clone(), Style::default().fg(Color::White)),
                ])
            })
            .collect();

        frame.render_widget(Paragraph::new(lines).block(block), area);
    }

    fn render_hints(&self, frame: &mut Frame, area: Rect) {
        let hints = Line::from(Span::styled(
            "  Up/Down focus  Space toggle  a all  K/J move  r refresh  c reconnect  q quit",
            Style::default().fg(Color::DarkGray),
        ));
        frame.render_widget(Paragraph::new(hints), area);
    }
}

/// Set up the terminal for TUI rendering.
fn setup_terminal() -> io::Result<Terminal<CrosstermBackend<Stdout>>> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    Terminal::new(backend)
}

/// Restore the terminal to its original state.
fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> io::Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

/// Run the console until the operator quits or the dashboard loop stops.
pub async fn run_console(
    views: watch::Receiver<DashboardView>,
    actions: mpsc::Sender<UserAction>,
) -> Result<(), anyhow::Error> {
    use std::io::IsTerminal;
    if !io::stdin().is_terminal() || !io::stdout().is_terminal() {
        return Err(anyhow::anyhow!(
            "Console requires a terminal (TTY); use --headless or --once."
        ));
    }

    // Set up panic hook to restore terminal.
    let original_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
        original_hook(panic_info);
    }));

    let mut terminal = setup_terminal()?;
    let mut console = Console::new(views, actions);

    let tick_rate = Duration::from_millis(100); // ~10fps

    loop {
        let view = console.views.borrow_and_update().clone();

        terminal.draw(|frame| {
            console.render(frame, &view);
        })?;

        if event::poll(tick_rate)? {
            if let Event::Key(key_event) = event::read()? {
                if key_event.kind == KeyEventKind::Press {
                    match console
                        .state
                        .handle_key(key_event.code, key_event.modifiers, &view)
                    {
                        KeyOutcome::Quit => break,
                        KeyOutcome::Send(action) => {
                            if console.actions.send(action).await.is_err() {
                                break; // Dashboard loop is gone.
                            }
                        }
                        KeyOutcome::Nothing => {}
                    }
                }
            }
        }
    }

    restore_terminal(&mut terminal)?;
    Ok(())
}
