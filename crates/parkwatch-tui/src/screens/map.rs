//! Map screen: every site at its coordinates, colored by how full it is.

use std::cell::Cell;
use std::sync::Arc;

use color_eyre::eyre::Result;
use crossterm::event::{KeyCode, KeyEvent, MouseButton, MouseEvent, MouseEventKind};
use ratatui::Frame;
use ratatui::layout::{Constraint, Layout, Rect};
use ratatui::style::{Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::canvas::Canvas;
use ratatui::widgets::{Block, BorderType, Borders, Paragraph};

use parkwatch_core::{GeoBounds, GeoPoint, OccupancySnapshot, Site, SiteOccupancy, SiteRegistry};

use crate::action::Action;
use crate::component::Component;
use crate::theme;

/// Share of the site spread added around the map edges.
const BOUNDS_PADDING: f64 = 0.15;
/// Minimum padding in degrees, for a single site or sites on one line.
const MIN_PADDING_DEG: f64 = 0.005;

pub struct MapScreen {
    focused: bool,
    registry: Arc<SiteRegistry>,
    snapshot: Arc<OccupancySnapshot>,
    selected: usize,
    bounds: Option<GeoBounds>,
    /// Canvas area from the last render, for mouse hit-testing.
    canvas_area: Cell<Rect>,
}

impl MapScreen {
    pub fn new(registry: Arc<SiteRegistry>) -> Self {
        let bounds = registry
            .bounds()
            .map(|b| b.padded(BOUNDS_PADDING, MIN_PADDING_DEG));
        Self {
            focused: false,
            registry,
            snapshot: Arc::new(OccupancySnapshot::empty()),
            selected: 0,
            bounds,
            canvas_area: Cell::new(Rect::default()),
        }
    }

    fn select_next(&mut self) {
        if !self.registry.is_empty() {
            self.selected = (self.selected + 1) % self.registry.len();
        }
    }

    fn select_prev(&mut self) {
        if !self.registry.is_empty() {
            self.selected = (self.selected + self.registry.len() - 1) % self.registry.len();
        }
    }

    fn open_selected(&self) -> Option<Action> {
        self.registry
            .by_index(self.selected)
            .map(|site| Action::OpenSite(site.id.clone()))
    }

    /// Index of the site whose marker or label covers `(column, row)`.
    fn hit_test(&self, column: u16, row: u16) -> Option<usize> {
        let area = self.canvas_area.get();
        let bounds = self.bounds?;
        if !area.contains((column, row).into()) {
            return None;
        }

        self.registry
            .summaries(&self.snapshot)
            .enumerate()
            .filter_map(|(index, (site, occupancy))| {
                let (x, y) = project(site.location, bounds, area)?;
                let label_width = u16::try_from(marker_text(index, site, occupancy).chars().count())
                    .unwrap_or(u16::MAX);
                let distance = if row == y && column >= x && column - x < label_width {
                    0
                } else {
                    u32::from(column.abs_diff(x)) + u32::from(row.abs_diff(y))
                };
                (distance <= 1).then_some((distance, index))
            })
            .min()
            .map(|(_, index)| index)
    }

    fn marker_line(&self, index: usize, site: &Site, occupancy: SiteOccupancy) -> Line<'static> {
        let selected = index == self.selected;
        let label_style = if selected {
            Style::default()
                .fg(theme::ELECTRIC_PURPLE)
                .bg(theme::BG_HIGHLIGHT)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(theme::DIM_WHITE)
        };
        let text = marker_text(index, site, occupancy);
        let (glyph, rest) = text.split_at(MARKER_GLYPH.len());
        Line::from(vec![
            Span::styled(glyph.to_owned(), Style::default().fg(theme::load_color(occupancy))),
            Span::styled(rest.to_owned(), label_style),
        ])
    }

    fn render_legend(frame: &mut Frame, area: Rect) {
        let dot = |color| Span::styled("● ", Style::default().fg(color));
        let line = Line::from(vec![
            Span::raw(" "),
            dot(theme::SUCCESS_GREEN),
            Span::styled("<50%  ", theme::key_hint()),
            dot(theme::ELECTRIC_YELLOW),
            Span::styled("<90%  ", theme::key_hint()),
            dot(theme::CORAL),
            Span::styled("full  ", theme::key_hint()),
            dot(theme::BORDER_GRAY),
            Span::styled("no data   ", theme::key_hint()),
            Span::styled("j/k ", theme::key_hint_key()),
            Span::styled("select  ", theme::key_hint()),
            Span::styled("Enter ", theme::key_hint_key()),
            Span::styled("open", theme::key_hint()),
        ]);
        frame.render_widget(Paragraph::new(line), area);
    }
}

const MARKER_GLYPH: &str = "●";

/// `● 1 Show par1 3/12 free`, the text printed at a site's location.
fn marker_text(index: usize, site: &Site, occupancy: SiteOccupancy) -> String {
    format!(
        "{MARKER_GLYPH} {} {} {}/{} free",
        index + 1,
        site.label,
        occupancy.free,
        occupancy.total()
    )
}

/// Terminal cell where the canvas draws `point`, or `None` outside `bounds`.
///
/// Mirrors the canvas label placement: both axes are scaled onto
/// `size - 1` cells and truncated, with latitude growing upwards.
#[allow(
    clippy::as_conversions,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn project(point: GeoPoint, bounds: GeoBounds, area: Rect) -> Option<(u16, u16)> {
    if !bounds.contains(point) || area.width == 0 || area.height == 0 {
        return None;
    }
    let lon_span = bounds.max_lon - bounds.min_lon;
    let lat_span = bounds.max_lat - bounds.min_lat;
    if lon_span <= 0.0 || lat_span <= 0.0 {
        return None;
    }

    let cols = f64::from(area.width) - 1.0;
    let rows = f64::from(area.height) - 1.0;
    let x = ((point.lon - bounds.min_lon) * cols / lon_span) as u16;
    let y = ((bounds.max_lat - point.lat) * rows / lat_span) as u16;
    Some((area.x + x, area.y + y))
}

impl Component for MapScreen {
    fn handle_key_event(&mut self, key: KeyEvent) -> Result<Option<Action>> {
        match key.code {
            KeyCode::Char('j') | KeyCode::Down | KeyCode::Right => self.select_next(),
            KeyCode::Char('k') | KeyCode::Up | KeyCode::Left => self.select_prev(),
            KeyCode::Enter => return Ok(self.open_selected()),
            _ => {}
        }
        Ok(None)
    }

    fn handle_mouse_event(&mut self, mouse: MouseEvent) -> Result<Option<Action>> {
        if let MouseEventKind::Down(MouseButton::Left) = mouse.kind {
            if let Some(index) = self.hit_test(mouse.column, mouse.row) {
                self.selected = index;
                return Ok(self.open_selected());
            }
        }
        Ok(None)
    }

    fn update(&mut self, action: &Action) -> Result<Option<Action>> {
        match action {
            Action::SnapshotUpdated(snapshot) => self.snapshot = Arc::clone(snapshot),
            Action::OpenSite(id) => {
                if let Some(index) = self.registry.index_of(id) {
                    self.selected = index;
                }
            }
            _ => {}
        }
        Ok(None)
    }

    fn render(&self, frame: &mut Frame, area: Rect) {
        let block = Block::default()
            .title(format!(" Map · {} sites ", self.registry.len()))
            .title_style(theme::title_style())
            .borders(Borders::ALL)
            .border_type(BorderType::Rounded)
            .border_style(if self.focused {
                theme::border_focused()
            } else {
                theme::border_default()
            });
        let inner = block.inner(area);
        frame.render_widget(block, area);

        let layout = Layout::vertical([Constraint::Min(1), Constraint::Length(1)]).split(inner);
        let canvas_area = layout[0];
        self.canvas_area.set(canvas_area);

        let Some(bounds) = self.bounds else {
            frame.render_widget(
                Paragraph::new(Line::styled(
                    " No sites configured. Add [sites] to the config file.",
                    theme::key_hint(),
                )),
                canvas_area,
            );
            return;
        };

        let canvas = Canvas::default()
            .background_color(theme::BG_DARK)
            .x_bounds([bounds.min_lon, bounds.max_lon])
            .y_bounds([bounds.min_lat, bounds.max_lat])
            .paint(|ctx| {
                for (index, (site, occupancy)) in self.registry.summaries(&self.snapshot).enumerate()
                {
                    ctx.print(
                        site.location.lon,
                        site.location.lat,
                        self.marker_line(index, site, occupancy),
                    );
                }
            });
        frame.render_widget(canvas, canvas_area);

        Self::render_legend(frame, layout[1]);
    }

    fn set_focused(&mut self, focused: bool) {
        self.focused = focused;
    }
}
