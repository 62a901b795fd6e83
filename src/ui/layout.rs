use {
    super::{renderer, ConsoleView},
    crate::{
        registry::TagLifecycle,
        session::{InventorySession, SessionStats},
    },
    ratatui::{
        layout::{Constraint, Direction, Layout as RatLayout, Rect},
        style::{Color, Modifier, Style},
        symbols::Marker,
        text::{Line, Span},
        widgets::{Axis, Block, Borders, Cell, Chart, Dataset, GraphType, Paragraph, Row, Table},
        Frame,
    },
};

/// Render the main console layout
pub fn render_layout(f: &mut Frame, area: Rect, session: &InventorySession, view: &ConsoleView) {
    let stats = session.stats();

    let chunks = RatLayout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header
            Constraint::Min(0),    // Table + chart
            Constraint::Length(4), // Footer/Status
        ])
        .split(area);

    render_header(f, chunks[0], view);

    let body = RatLayout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(chunks[1]);

    render_tag_table(f, body[0], session);
    render_metric_chart(f, body[1], session, view);
    render_footer(f, chunks[2], &stats, view);
}

fn render_header(f: &mut Frame, area: Rect, view: &ConsoleView) {
    let header = Block::default().borders(Borders::ALL).title("tagscope - Live Tag Monitor");

    let text = vec![Line::from(vec![
        Span::styled("tagscope", Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)),
        Span::raw(format!(" | metric: {} ", view.metric.as_str())),
        Span::raw("| q quit, m metric, c clear, e export, s stop/start"),
    ])];

    f.render_widget(Paragraph::new(text).block(header), area);
}

fn render_tag_table(f: &mut Frame, area: Rect, session: &InventorySession) {
    let header = Row::new(vec!["Id", "EPC", "State", "Reads", "Rate", "RSSI", "Phase", "Mode"])
        .style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD));

    let rows: Vec<Row> = session
        .registry()
        .ordered()
        .into_iter()
        .map(|tag| {
            let color = renderer::identity_color(tag.identity);
            let state_style = match tag.lifecycle {
                TagLifecycle::Live => Style::default().fg(Color::Green),
                TagLifecycle::Stale => Style::default().fg(Color::DarkGray),
            };

            Row::new(vec![
                Cell::from(Span::styled(renderer::identity_marker(tag.identity), Style::default().fg(color))),
                Cell::from(renderer::format_epc(&tag.id.to_hex(), 12)),
                Cell::from(Span::styled(tag.lifecycle.as_str(), state_style)),
                Cell::from(tag.read_count.to_string()),
                Cell::from(format!("{:.1}", session.rate_for(&tag.id))),
                Cell::from(renderer::format_value(tag.rssi.latest().map(|s| s.value), 1)),
                Cell::from(format!("{:.2}", tag.last_raw_phase)),
                Cell::from(tag.last_mode.as_str()),
            ])
        })
        .collect();

    let widths = [
        Constraint::Length(5),  // Identity
        Constraint::Length(14), // EPC
        Constraint::Length(6),  // State
        Constraint::Length(7),  // Reads
        Constraint::Length(6),  // Rate
        Constraint::Length(7),  // RSSI
        Constraint::Length(6),  // Phase
        Constraint::Length(6),  // Mode
    ];

    let table = Table::new(rows, widths)
        .header(header)
        .block(Block::default().borders(Borders::ALL).title("Tags"));

    f.render_widget(table, area);
}

fn render_metric_chart(f: &mut Frame, area: Rect, session: &InventorySession, view: &ConsoleView) {
    let now = session.now();
    let span = session.config().window_max_age.as_secs_f64().max(1.0);

    // Only tags with an identity get a line; the rest share the fallback
    // marker in the table
    let series: Vec<(String, Color, Vec<(f64, f64)>)> = session
        .snapshot_all()
        .into_iter()
        .filter(|snap| snap.identity.is_some())
        .map(|snap| {
            let points = renderer::chart_points(snap.series(view.metric), now);
            (
                renderer::format_epc(&snap.id.to_hex(), 6),
                renderer::identity_color(snap.identity),
                points,
            )
        })
        .collect();

    let y_bounds = renderer::value_bounds(series.iter().map(|(_, _, p)| p.as_slice()), view.metric);

    let datasets: Vec<Dataset> = series
        .iter()
        .map(|(name, color, points)| {
            Dataset::default()
                .name(name.clone())
                .marker(Marker::Braille)
                .graph_type(GraphType::Line)
                .style(Style::default().fg(*color))
                .data(points)
        })
        .collect();

    let title = format!("{} ({})", view.metric.as_str(), renderer::metric_unit(view.metric));
    let chart = Chart::new(datasets)
        .block(Block::default().borders(Borders::ALL).title(title))
        .x_axis(
            Axis::default()
                .title("s")
                .style(Style::default().fg(Color::Gray))
                .bounds([-span, 0.0])
                .labels(vec![Span::raw(format!("-{:.0}", span)), Span::raw("0")]),
        )
        .y_axis(
            Axis::default()
                .style(Style::default().fg(Color::Gray))
                .bounds(y_bounds)
                .labels(vec![
                    Span::raw(format!("{:.1}", y_bounds[0])),
                    Span::raw(format!("{:.1}", y_bounds[1])),
                ]),
        );

    f.render_widget(chart, area);
}

fn render_footer(f: &mut Frame, area: Rect, stats: &SessionStats, view: &ConsoleView) {
    let status_color = if stats.running { Color::Green } else { Color::Red };

    let mut first = vec![
        Span::styled(renderer::format_status_line(stats), Style::default().fg(status_color)),
        Span::raw(format!(" | live {} stale {}", stats.live_tags, stats.stale_tags)),
    ];
    if let Some(message) = &view.message {
        first.push(Span::raw(" | "));
        first.push(Span::styled(message.clone(), Style::default().fg(Color::Cyan)));
    }

    let text = vec![
        Line::from(first),
        Line::from(Span::styled(
            renderer::format_counters(stats),
            Style::default().fg(Color::DarkGray),
        )),
    ];

    let footer = Block::default().borders(Borders::ALL).title("Status");
    f.render_widget(Paragraph::new(text).block(footer), area);
}
