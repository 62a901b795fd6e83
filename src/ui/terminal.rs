use {
    super::ConsoleView,
    crate::{persistence::SnapshotWriter, session::InventorySession},
    crossterm::event::{Event, KeyCode, KeyEventKind},
    ratatui::{backend::CrosstermBackend, Terminal},
    std::time::{Duration, Instant},
};

/// Keys the console reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleAction {
    Quit,
    CycleMetric,
    Clear,
    Export,
    ToggleRunning,
}

impl ConsoleAction {
    pub fn from_key(code: KeyCode) -> Option<Self> {
        match code {
            KeyCode::Char('q') | KeyCode::Esc => Some(ConsoleAction::Quit),
            KeyCode::Char('m') => Some(ConsoleAction::CycleMetric),
            KeyCode::Char('c') => Some(ConsoleAction::Clear),
            KeyCode::Char('e') => Some(ConsoleAction::Export),
            KeyCode::Char('s') => Some(ConsoleAction::ToggleRunning),
            _ => None,
        }
    }
}

/// Apply an operator action; returns false when the console should exit
pub async fn apply_action(
    action: ConsoleAction,
    session: &mut InventorySession,
    writer: &mut SnapshotWriter,
    view: &mut ConsoleView,
) -> bool {
    match action {
        ConsoleAction::Quit => return false,
        ConsoleAction::CycleMetric => {
            view.metric = view.metric.next();
        }
        ConsoleAction::Clear => {
            session.clear();
            view.message = Some("inventory cleared".to_string());
        }
        ConsoleAction::Export => {
            let rows = session.export();
            view.message = Some(match writer.write_snapshot(&rows).await {
                Ok(()) => {
                    log::info!("Exported {} tags ({})", rows.len(), writer.backend_type());
                    format!("exported {} tags", rows.len())
                }
                Err(e) => {
                    log::error!("Export failed: {}", e);
                    format!("export failed: {}", e)
                }
            });
        }
        ConsoleAction::ToggleRunning => {
            if session.is_running() {
                session.stop();
                view.message = Some("stopped".to_string());
            } else {
                session.start();
                view.message = Some("started".to_string());
            }
        }
    }
    true
}

/// Run the TUI event loop
///
/// The session is ticked on this loop every `tick_interval`, then drawn.
/// Rendering only reads session state between ticks.
pub async fn run_ui(
    session: &mut InventorySession,
    writer: &mut SnapshotWriter,
) -> Result<(), Box<dyn std::error::Error>> {
    // Setup terminal
    let stdout = std::io::stdout();
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    crossterm::terminal::enable_raw_mode()?;

    // Alternate screen keeps stderr logs from tearing the table
    crossterm::execute!(
        std::io::stdout(),
        crossterm::terminal::EnterAlternateScreen,
        crossterm::cursor::Hide
    )?;
    terminal.clear()?;

    let result = event_loop(&mut terminal, session, writer).await;

    // Cleanup - restore terminal state even if the loop failed
    crossterm::execute!(
        std::io::stdout(),
        crossterm::terminal::LeaveAlternateScreen,
        crossterm::cursor::Show
    )?;
    crossterm::terminal::disable_raw_mode()?;
    result
}

async fn event_loop(
    terminal: &mut Terminal<CrosstermBackend<std::io::Stdout>>,
    session: &mut InventorySession,
    writer: &mut SnapshotWriter,
) -> Result<(), Box<dyn std::error::Error>> {
    let tick_interval = session.config().tick_interval;
    let mut view = ConsoleView::default();
    let mut last_tick: Option<Instant> = None;

    loop {
        if last_tick.map_or(true, |t| t.elapsed() >= tick_interval) {
            session.tick();
            last_tick = Some(Instant::now());

            let area = terminal.size()?;
            let snapshot: &InventorySession = session;
            terminal.draw(|f| crate::ui::layout::render_layout(f, area, snapshot, &view))?;
        }

        // Wait for input until the next tick is due
        let timeout = last_tick
            .map(|t| tick_interval.saturating_sub(t.elapsed()))
            .unwrap_or(Duration::ZERO);
        if crossterm::event::poll(timeout)? {
            if let Event::Key(key) = crossterm::event::read()? {
                if key.kind != KeyEventKind::Press {
                    continue;
                }
                if let Some(action) = ConsoleAction::from_key(key.code) {
                    if !apply_action(action, session, writer, &mut view).await {
                        break;
                    }
                }
            }
        }
    }

    Ok(())
}
