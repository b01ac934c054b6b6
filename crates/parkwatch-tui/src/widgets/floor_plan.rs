//! Floor-plan widget: one marker per display row, placed by scaling the
//! row's normalized position into the widget's inner area.
//!
//! Occupied spots get a 3×2 block, free spots a single ring.

use ratatui::buffer::Buffer;
use ratatui::layout::{Alignment, Rect};
use ratatui::style::{Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, BorderType, Borders, Paragraph, Widget};

use parkwatch_core::{
    ContainerSize, DisplayRow, ModalView, PixelPosition, SpotStatus, resolve_pixel_position,
};

use crate::theme;

const OCCUPIED_GLYPH: &str = "█";
const FREE_GLYPH: &str = "○";

/// Marker footprint in cells as `(width, height)`.
pub fn marker_size(status: SpotStatus) -> (u16, u16) {
    match status {
        SpotStatus::Occupied => (3, 2),
        SpotStatus::Free => (1, 1),
    }
}

/// The cells a row's marker covers inside `inner`.
///
/// The marker's top-left corner sits at the resolved position; markers
/// that would spill past the right or bottom edge are pulled back inside.
pub fn marker_rect(row: &DisplayRow, inner: Rect) -> Rect {
    let (width, height) = marker_size(row.status);
    let width = width.min(inner.width);
    let height = height.min(inner.height);

    let container = ContainerSize::new(f64::from(inner.width), f64::from(inner.height));
    let PixelPosition { x, y } = resolve_pixel_position(row.position, container);

    Rect::new(
        inner.x + cell_offset(x, inner.width - width),
        inner.y + cell_offset(y, inner.height - height),
        width,
        height,
    )
}

/// Whole cells from the edge, clamped to `0..=max`.
#[allow(
    clippy::as_conversions,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
fn cell_offset(value: f64, max: u16) -> u16 {
    if value.is_nan() {
        return 0;
    }
    value.floor().clamp(0.0, f64::from(max)) as u16
}

pub struct FloorPlan<'a> {
    modal: &'a ModalView,
    label: &'a str,
    stale: bool,
}

impl<'a> FloorPlan<'a> {
    pub fn new(modal: &'a ModalView, label: &'a str) -> Self {
        Self {
            modal,
            label,
            stale: false,
        }
    }

    /// Mark the plan as older than the latest snapshot.
    pub fn stale(mut self, stale: bool) -> Self {
        self.stale = stale;
        self
    }

    fn block(&self) -> Block<'a> {
        let title = if self.modal.background.is_empty() {
            format!(" {} ", self.label)
        } else {
            format!(" {} · {} ", self.label, self.modal.background)
        };

        let counts = Line::from(vec![
            Span::styled(
                format!(" {} occupied ", self.modal.occupied_count()),
                Style::default().fg(theme::ERROR_RED),
            ),
            Span::styled(
                format!(" {} free ", self.modal.free_count()),
                Style::default().fg(theme::SUCCESS_GREEN),
            ),
        ]);

        let mut hints = vec![
            Span::styled(" u ", theme::key_hint_key()),
            Span::styled("refresh ", theme::key_hint()),
            Span::styled(" esc ", theme::key_hint_key()),
            Span::styled("close ", theme::key_hint()),
        ];
        if self.stale {
            hints.insert(
                0,
                Span::styled(
                    " newer data available ",
                    Style::default()
                        .fg(theme::ELECTRIC_YELLOW)
                        .add_modifier(Modifier::BOLD),
                ),
            );
        }

        Block::default()
            .title(title)
            .title_style(theme::title_style())
            .title_bottom(counts)
            .title_bottom(Line::from(hints).alignment(Alignment::Right))
            .borders(Borders::ALL)
            .border_type(BorderType::Rounded)
            .border_style(theme::border_focused())
            .style(Style::default().bg(theme::BG_DARK))
    }
}

impl Widget for FloorPlan<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let block = self.block();
        let inner = block.inner(area);
        block.render(area, buf);

        if inner.width == 0 || inner.height == 0 {
            return;
        }

        if self.modal.rows.is_empty() {
            Paragraph::new(Line::styled(
                "No spots reported for this site",
                theme::key_hint(),
            ))
            .alignment(Alignment::Center)
            .render(Rect::new(inner.x, inner.y + inner.height / 2, inner.width, 1), buf);
            return;
        }

        // Free markers first so an occupied block is never hidden by a
        // neighbouring ring.
        let ordered = self
            .modal
            .rows
            .iter()
            .filter(|row| row.status == SpotStatus::Free)
            .chain(
                self.modal
                    .rows
                    .iter()
                    .filter(|row| row.status == SpotStatus::Occupied),
            );

        for row in ordered {
            let rect = marker_rect(row, inner);
            let style = Style::default().fg(theme::spot_color(row.status));
            let glyph = match row.status {
                SpotStatus::Occupied => OCCUPIED_GLYPH,
                SpotStatus::Free => FREE_GLYPH,
            };
            for y in rect.top()..rect.bottom() {
                for x in rect.left()..rect.right() {
                    buf[(x, y)].set_symbol(glyph).set_style(style);
                }
            }
        }
    }
}
