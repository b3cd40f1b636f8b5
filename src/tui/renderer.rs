//! Draws one frame of the dashboard from a plain-data snapshot.
//!
//! `Renderer::draw` is pure with respect to its `FrameSnapshot` input:
//! ratatui's own `Buffer` diffing against the previous frame is reused
//! rather than hand-rolled, since duplicating it on top of ratatui would
//! just reimplement `Buffer::diff`.

use std::time::Instant;

use ratatui::Frame;
use ratatui::layout::Rect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, Paragraph};

use crate::cache::TimingCache;
use crate::host::{Host, HostStatus};
use crate::phase::BuildPhase;
use crate::stats::{self, RunStatistics};
use crate::text::{sanitize_for_terminal, truncate_with_ellipsis};
use crate::tui::autoexit::AutoExitState;
use crate::tui::input::NavigationMode;
use crate::tui::layout::{GridLayout, grid_layout};

/// Resolved color policy, threaded through explicitly instead of a
/// global mutable flag.
#[derive(Debug, Clone, Copy)]
pub struct Theme {
    pub color_enabled: bool,
}

impl Theme {
    fn status_color(&self, status: HostStatus) -> Color {
        if !self.color_enabled {
            return Color::Reset;
        }
        match status {
            HostStatus::Active => Color::Yellow,
            HostStatus::Completed => Color::Green,
            HostStatus::Failed => Color::Red,
        }
    }
}

/// One host's rendered state, precomputed by the controller so the
/// renderer never reaches into `Host` internals.
pub struct HostView<'a> {
    pub label: String,
    pub status: HostStatus,
    pub phase: BuildPhase,
    pub lines: Vec<&'a str>,
    pub progress: Option<f64>,
    pub error: Option<&'a str>,
}

/// Everything the renderer needs for one frame, assembled by the
/// controller from host state, stats, countdown, focus, and nav mode.
pub struct FrameSnapshot<'a> {
    pub hosts: Vec<HostView<'a>>,
    pub stats: RunStatistics,
    pub auto_exit: AutoExitState,
    pub nav_mode: NavigationMode,
    pub focused_index: Option<usize>,
    pub show_help: bool,
    pub theme: Theme,
}

pub struct Renderer;

impl Renderer {
    pub fn draw(frame: &mut Frame, snapshot: &FrameSnapshot) {
        let area = frame.area();
        let header_height = 2u16.min(area.height);
        let header = Rect { x: area.x, y: area.y, width: area.width, height: header_height };
        let body = Rect {
            x: area.x,
            y: area.y + header_height,
            width: area.width,
            height: area.height.saturating_sub(header_height),
        };

        Self::draw_header(frame, header, snapshot);

        match snapshot.nav_mode {
            NavigationMode::FullScreen => {
                if let Some(index) = snapshot.focused_index.and_then(|i| snapshot.hosts.get(i)) {
                    Self::draw_host_tile(frame, body, index, snapshot.theme, true);
                }
            }
            _ => {
                let layout = grid_layout(body, snapshot.hosts.len());
                Self::draw_grid(frame, &layout, snapshot);
            }
        }

        if snapshot.nav_mode == NavigationMode::Menu {
            Self::draw_menu(frame, area, snapshot);
        }

        if snapshot.show_help {
            Self::draw_help(frame, area);
        }
    }

    fn draw_header(frame: &mut Frame, area: Rect, snapshot: &FrameSnapshot) {
        let stats = &snapshot.stats;
        let countdown = match snapshot.auto_exit {
            AutoExitState::Counting { remaining } => format!(" | exiting in {}s", remaining.as_secs()),
            _ => String::new(),
        };
        let text = format!(
            "redland-forge | {} succeeded, {} failed, {} running{}",
            stats.succeeded, stats.failed, stats.in_flight, countdown
        );
        frame.render_widget(Paragraph::new(sanitize_for_terminal(&text)), area);
    }

    fn draw_grid(frame: &mut Frame, layout: &GridLayout, snapshot: &FrameSnapshot) {
        for (host, rect) in snapshot.hosts.iter().zip(layout.tiles.iter()) {
            Self::draw_host_tile(frame, *rect, host, snapshot.theme, false);
        }
    }

    fn draw_host_tile(frame: &mut Frame, area: Rect, host: &HostView, theme: Theme, full: bool) {
        let progress_label = match host.progress {
            Some(fraction) => format!(" {:.0}%", fraction * 100.0),
            None => String::new(),
        };
        let title = format!("{} [{}]{}", host.label, host.phase, progress_label);
        let border_style = Style::default().fg(theme.status_color(host.status));
        let block = Block::default().title(title).borders(Borders::ALL).border_style(border_style);
        let inner = block.inner(area);
        frame.render_widget(block, area);

        let visible_rows = inner.height as usize;
        let lines: Vec<Line> = host
            .lines
            .iter()
            .rev()
            .take(if full { visible_rows } else { visible_rows.min(host.lines.len()) })
            .rev()
            .map(|line| {
                let sanitized = sanitize_for_terminal(line);
                let truncated = truncate_with_ellipsis(&sanitized, inner.width as usize);
                Line::from(Span::raw(truncated))
            })
            .collect();

        frame.render_widget(Paragraph::new(lines), inner);

        if let Some(error) = host.error {
            let error_rect = Rect { x: inner.x, y: inner.y + inner.height.saturating_sub(1), width: inner.width, height: 1.min(inner.height) };
            let style = Style::default().fg(theme.status_color(HostStatus::Failed)).add_modifier(Modifier::BOLD);
            let text = truncate_with_ellipsis(&sanitize_for_terminal(error), inner.width as usize);
            frame.render_widget(Paragraph::new(Span::styled(text, style)), error_rect);
        }
    }

    fn draw_menu(frame: &mut Frame, area: Rect, snapshot: &FrameSnapshot) {
        let menu_rect = crate::tui::layout::menu_layout(area);
        frame.render_widget(Clear, menu_rect);
        let items: Vec<Line> = snapshot
            .hosts
            .iter()
            .enumerate()
            .map(|(i, h)| Line::from(format!("{}. {} [{}]", i + 1, h.label, h.phase)))
            .collect();
        let block = Block::default().title("Hosts").borders(Borders::ALL);
        frame.render_widget(Paragraph::new(items).block(block), menu_rect);
    }

    fn draw_help(frame: &mut Frame, area: Rect) {
        let menu_rect = crate::tui::layout::menu_layout(area);
        frame.render_widget(Clear, menu_rect);
        let text = "q quit | h help | arrows navigate | Enter full-screen | Tab menu | m minimize";
        let block = Block::default().title("Help").borders(Borders::ALL);
        frame.render_widget(Paragraph::new(text).block(block), menu_rect);
    }
}

/// Builds the per-host views the renderer needs from live host state,
/// including the cache-derived progress fraction (`None` when no cache
/// entry exists or caching is disabled for the run). Kept separate from
/// `Renderer` so the controller can unit test the projection without a
/// live terminal.
pub fn project_hosts<'a>(
    hosts: &'a [Host],
    tile_line_budget: usize,
    cache: Option<&TimingCache>,
    now: Instant,
) -> Vec<HostView<'a>> {
    hosts
        .iter()
        .map(|host| HostView {
            label: host.id().to_string(),
            status: host.status(),
            phase: host.phase(),
            lines: host.output().tail(tile_line_budget),
            progress: stats::host_progress_fraction(host, cache, now),
            error: host.error(),
        })
        .collect()
}
