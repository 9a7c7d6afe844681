use crate::app::App;
use crate::stream::JobFilter;
use crate::surface::{ActiveState, Badge, GridKey, StatusGrid};
use chrono::Utc;
use flowpulse_core::{palette::DisplayColor, ExecutionState};
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
};

const INDICATOR: &str = "\u{25a0}";
const NAME_WIDTH: usize = 24;

#[derive(Clone, Copy)]
struct BoardTheme {
    bg: Color,
    surface: Color,
    border: Color,
    title: Color,
    text: Color,
    muted: Color,
    accent: Color,
    ok: Color,
    critical: Color,
}

fn board_theme() -> BoardTheme {
    BoardTheme {
        bg: Color::Rgb(11, 18, 32),
        surface: Color::Rgb(17, 26, 46),
        border: Color::Rgb(71, 85, 105),
        title: Color::Rgb(191, 219, 254),
        text: Color::Rgb(226, 232, 240),
        muted: Color::Rgb(148, 163, 184),
        accent: Color::Rgb(56, 189, 248),
        ok: Color::Rgb(34, 197, 94),
        critical: Color::Rgb(239, 68, 68),
    }
}

/// Terminal color for a status indicator.
pub fn paint(color: DisplayColor) -> Color {
    match color.rgb() {
        Some((r, g, b)) => Color::Rgb(r, g, b),
        None => Color::White,
    }
}

pub fn render(frame: &mut ratatui::Frame, app: &App) {
    let size = frame.size();
    let theme = board_theme();
    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(4), Constraint::Min(0), Constraint::Length(3)])
        .split(size);
    frame.render_widget(render_header(app, theme, size.width), layout[0]);
    match app.filter() {
        JobFilter::All => frame.render_widget(render_overview(app, theme), layout[1]),
        JobFilter::Job(_) => render_job_view(frame, app, theme, layout[1]),
    }
    frame.render_widget(render_legend(theme), layout[2]);
    if app.help_open {
        render_help_overlay(frame, theme);
    }
}

fn panel(title: &str, theme: BoardTheme) -> Block<'static> {
    Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(theme.border))
        .style(Style::default().bg(theme.surface))
        .title(Span::styled(
            title.to_string(),
            Style::default()
                .fg(theme.title)
                .add_modifier(Modifier::BOLD),
        ))
}

fn render_header(app: &App, theme: BoardTheme, width: u16) -> Paragraph<'static> {
    let inner_width = width.saturating_sub(4) as usize;
    let server = match app.server_healthy {
        Some(true) => Span::styled("server ok", Style::default().fg(theme.ok)),
        Some(false) => Span::styled("server unreachable", Style::default().fg(theme.critical)),
        None => Span::styled("server ?", Style::default().fg(theme.muted)),
    };
    let last = match app.last_message_at {
        Some(at) => format!(
            "last update {}s ago",
            (Utc::now() - at).num_seconds().max(0)
        ),
        None => "waiting for updates".to_string(),
    };
    let view = match app.filter() {
        JobFilter::All => "overview".to_string(),
        JobFilter::Job(job) => format!("job {job}"),
    };
    let summary = format!(
        "{view} | {} | {last} | applied {} filtered {} discarded {}",
        ellipsize(&app.source_label, 32),
        app.stats.applied,
        app.stats.filtered,
        app.stats.discarded
    );
    let note = app
        .status_note
        .as_deref()
        .map(|note| format!("Last Action: {note}"))
        .unwrap_or_else(|| "Last Action: ready (? help)".to_string());

    Paragraph::new(Text::from(vec![
        Line::from(vec![
            server,
            Span::raw("  "),
            Span::styled(
                ellipsize(&summary, inner_width.saturating_sub(20).max(12)),
                Style::default().fg(theme.text),
            ),
        ]),
        Line::from(Span::styled(
            ellipsize(&note, inner_width.max(12)),
            Style::default().fg(theme.muted),
        )),
    ]))
    .style(Style::default().fg(theme.text).bg(theme.bg))
    .block(panel("flowpulse", theme).style(Style::default().bg(theme.bg)))
}

fn grid_spans(grid: Option<&StatusGrid>) -> Vec<Span<'static>> {
    match grid {
        Some(grid) if !grid.indicators().is_empty() => grid
            .indicators()
            .iter()
            .map(|color| Span::styled(format!("{INDICATOR} "), Style::default().fg(paint(*color))))
            .collect(),
        _ => vec![Span::raw("-")],
    }
}

fn badge_span(badge: Option<&Badge>, theme: BoardTheme) -> Span<'static> {
    match badge.and_then(Badge::state) {
        Some(ActiveState::Active) => Span::styled(
            "[active] ",
            Style::default().fg(theme.ok).add_modifier(Modifier::BOLD),
        ),
        Some(ActiveState::Inactive) => Span::styled("[paused] ", Style::default().fg(theme.muted)),
        None => Span::styled("[  ?   ] ", Style::default().fg(theme.muted)),
    }
}

fn name_span(name: &str, style: Style) -> Span<'static> {
    Span::styled(
        format!("{:<width$} ", ellipsize(name, NAME_WIDTH), width = NAME_WIDTH),
        style,
    )
}

fn render_overview(app: &App, theme: BoardTheme) -> Paragraph<'static> {
    let mut lines = Vec::new();
    for (index, (job, grid)) in app.surfaces.job_grids().enumerate() {
        let selected = index == app.selected;
        let marker = if selected { "> " } else { "  " };
        let name_style = if selected {
            Style::default().fg(theme.accent).add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(theme.text)
        };
        let mut spans = vec![
            Span::styled(marker, Style::default().fg(theme.accent)),
            badge_span(app.surfaces.badge(job), theme),
            name_span(job.as_str(), name_style),
        ];
        spans.extend(grid_spans(Some(grid)));
        lines.push(Line::from(spans));
    }
    if lines.is_empty() {
        lines.push(Line::from(Span::styled(
            "no jobs loaded yet",
            Style::default().fg(theme.muted),
        )));
    }
    Paragraph::new(Text::from(lines)).block(panel("Jobs", theme))
}

fn render_job_view(frame: &mut ratatui::Frame, app: &App, theme: BoardTheme, area: Rect) {
    let Some(job) = app.selected_job() else {
        return;
    };
    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(5), Constraint::Min(0)])
        .split(area);
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
        .split(layout[1]);

    let schedule = app
        .detail
        .as_ref()
        .map(|detail| detail.schedule.clone())
        .unwrap_or_default();
    let mut last_run = app
        .surfaces
        .last_run()
        .and_then(|label| label.text())
        .unwrap_or("Last run: -")
        .to_string();
    if let Some(at) = app.last_run_at() {
        last_run.push_str(&format!(" ({} ago)", format_age(Utc::now() - at)));
    }
    let mut run_line = vec![
        badge_span(app.surfaces.badge(job), theme),
        name_span(job.as_str(), Style::default().fg(theme.text).add_modifier(Modifier::BOLD)),
    ];
    run_line.extend(grid_spans(app.surfaces.grid(&GridKey::Job(job.clone()))));
    let summary = Paragraph::new(Text::from(vec![
        Line::from(run_line),
        Line::from(Span::styled(
            format!("schedule: {}", if schedule.is_empty() { "-" } else { &schedule }),
            Style::default().fg(theme.muted),
        )),
        Line::from(Span::styled(last_run, Style::default().fg(theme.text))),
    ]))
    .block(panel("Job", theme));
    frame.render_widget(summary, layout[0]);

    let mut task_lines: Vec<Line<'static>> = app
        .surfaces
        .task_grids()
        .map(|(task, grid)| {
            let mut spans = vec![name_span(task.as_str(), Style::default().fg(theme.text))];
            spans.extend(grid_spans(Some(grid)));
            Line::from(spans)
        })
        .collect();
    if task_lines.is_empty() {
        task_lines.push(Line::from(Span::styled(
            "no tasks loaded yet",
            Style::default().fg(theme.muted),
        )));
    }
    frame.render_widget(
        Paragraph::new(Text::from(task_lines)).block(panel("Tasks", theme)),
        columns[0],
    );

    let mut graph_lines: Vec<Line<'static>> = app
        .surfaces
        .graph_nodes()
        .map(|(task, node)| {
            let outline = node.outline().map(paint).unwrap_or(theme.border);
            let mut spans = vec![Span::styled(
                format!("[{task}]"),
                Style::default().fg(outline).add_modifier(Modifier::BOLD),
            )];
            if !node.downstream().is_empty() {
                let next: Vec<&str> = node.downstream().iter().map(|t| t.as_str()).collect();
                spans.push(Span::styled(
                    format!(" -> {}", next.join(", ")),
                    Style::default().fg(theme.muted),
                ));
            }
            Line::from(spans)
        })
        .collect();
    if graph_lines.is_empty() {
        graph_lines.push(Line::from(Span::styled(
            "graph unavailable",
            Style::default().fg(theme.muted),
        )));
    }
    frame.render_widget(
        Paragraph::new(Text::from(graph_lines))
            .block(panel("Graph", theme))
            .wrap(Wrap { trim: false }),
        columns[1],
    );
}

fn render_legend(theme: BoardTheme) -> Paragraph<'static> {
    let mut spans = Vec::new();
    for state in ExecutionState::ALL {
        spans.push(Span::styled(
            format!("{INDICATOR} "),
            Style::default().fg(paint(flowpulse_core::palette::color_for(state))),
        ));
        spans.push(Span::styled(
            format!("{state}  "),
            Style::default().fg(theme.muted),
        ));
    }
    Paragraph::new(Line::from(spans)).block(panel("Legend", theme))
}

fn render_help_overlay(frame: &mut ratatui::Frame, theme: BoardTheme) {
    let area = centered_rect(60, 60, frame.size());
    let lines = vec![
        Line::from(Span::styled(
            "Controls",
            Style::default()
                .fg(theme.title)
                .add_modifier(Modifier::BOLD),
        )),
        Line::from("  j/k      select job (overview)"),
        Line::from("  t        toggle schedule active"),
        Line::from("  s        submit a run"),
        Line::from("  r        re-query schedule status"),
        Line::from(""),
        Line::from("  ?        toggle this help"),
        Line::from("  Esc      close help"),
        Line::from("  q        quit"),
    ];
    frame.render_widget(Clear, area);
    frame.render_widget(
        Paragraph::new(Text::from(lines))
            .style(Style::default().fg(theme.text).bg(theme.surface))
            .block(panel("Help", theme))
            .wrap(Wrap { trim: false }),
        area,
    );
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100u16.saturating_sub(percent_y)) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100u16.saturating_sub(percent_y)) / 2),
        ])
        .split(area);
    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100u16.saturating_sub(percent_x)) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100u16.saturating_sub(percent_x)) / 2),
        ])
        .split(vertical[1])[1]
}

fn format_age(age: chrono::Duration) -> String {
    let secs = age.num_seconds().max(0);
    match secs {
        0..=59 => format!("{secs}s"),
        60..=3599 => format!("{}m", secs / 60),
        3600..=86_399 => format!("{}h", secs / 3600),
        _ => format!("{}d", secs / 86_400),
    }
}

fn ellipsize(input: &str, max: usize) -> String {
    if input.chars().count() <= max {
        return input.to_string();
    }
    if max <= 3 {
        return "...".chars().take(max).collect();
    }
    let prefix: String = input.chars().take(max - 3).collect();
    format!("{prefix}...")
}
