//! Sites screen: registry table with live counts.

use std::sync::Arc;

use color_eyre::eyre::Result;
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::Frame;
use ratatui::layout::{Constraint, Rect};
use ratatui::style::Style;
use ratatui::text::Line;
use ratatui::widgets::{Block, BorderType, Borders, Cell, Paragraph, Row, Table, TableState};

use parkwatch_core::{OccupancySnapshot, SiteOccupancy, SiteRegistry};

use crate::action::Action;
use crate::component::Component;
use crate::theme;

pub struct SitesScreen {
    focused: bool,
    registry: Arc<SiteRegistry>,
    snapshot: Arc<OccupancySnapshot>,
    table_state: TableState,
}

impl SitesScreen {
    pub fn new(registry: Arc<SiteRegistry>) -> Self {
        let mut table_state = TableState::default();
        if !registry.is_empty() {
            table_state.select(Some(0));
        }
        Self {
            focused: false,
            registry,
            snapshot: Arc::new(OccupancySnapshot::empty()),
            table_state,
        }
    }

    fn selected_index(&self) -> usize {
        self.table_state.selected().unwrap_or(0)
    }

    fn move_selection(&mut self, delta: isize) {
        let len = self.registry.len();
        if len == 0 {
            return;
        }
        let next = self
            .selected_index()
            .saturating_add_signed(delta)
            .min(len - 1);
        self.table_state.select(Some(next));
    }
}

/// `"67%"`, or a dash when the site reports no spots.
fn load_text(occupancy: SiteOccupancy) -> String {
    occupancy
        .ratio()
        .map_or_else(|| "—".to_owned(), |r| format!("{:.0}%", r * 100.0))
}

impl Component for SitesScreen {
    fn handle_key_event(&mut self, key: KeyEvent) -> Result<Option<Action>> {
        match key.code {
            KeyCode::Char('j') | KeyCode::Down => self.move_selection(1),
            KeyCode::Char('k') | KeyCode::Up => self.move_selection(-1),
            KeyCode::Char('g') | KeyCode::Home => self.table_state.select(Some(0)),
            KeyCode::Char('G') | KeyCode::End => {
                if !self.registry.is_empty() {
                    self.table_state.select(Some(self.registry.len() - 1));
                }
            }
            KeyCode::Enter => {
                return Ok(self
                    .registry
                    .by_index(self.selected_index())
                    .map(|site| Action::OpenSite(site.id.clone())));
            }
            _ => {}
        }
        Ok(None)
    }

    fn update(&mut self, action: &Action) -> Result<Option<Action>> {
        match action {
            Action::SnapshotUpdated(snapshot) => self.snapshot = Arc::clone(snapshot),
            Action::OpenSite(id) => {
                if let Some(index) = self.registry.index_of(id) {
                    self.table_state.select(Some(index));
                }
            }
            _ => {}
        }
        Ok(None)
    }

    fn render(&self, frame: &mut Frame, area: Rect) {
        let block = Block::default()
            .title(format!(" Sites ({}) ", self.registry.len()))
            .title_style(theme::title_style())
            .borders(Borders::ALL)
            .border_type(BorderType::Rounded)
            .border_style(if self.focused {
                theme::border_focused()
            } else {
                theme::border_default()
            });

        if self.registry.is_empty() {
            let inner = block.inner(area);
            frame.render_widget(block, area);
            frame.render_widget(
                Paragraph::new(Line::styled(" No sites configured.", theme::key_hint())),
                inner,
            );
            return;
        }

        let header = Row::new(
            ["#", "Site", "Label", "Lat", "Lon", "Occupied", "Free", "Load", "Background"]
                .into_iter()
                .map(|h| Cell::from(h).style(theme::table_header())),
        );

        let selected = self.selected_index();
        let rows: Vec<Row> = self
            .registry
            .summaries(&self.snapshot)
            .enumerate()
            .map(|(i, (site, occupancy))| {
                let prefix = if i == selected { "▸" } else { " " };
                Row::new(vec![
                    Cell::from(format!("{prefix}{}", i + 1)),
                    Cell::from(site.id.clone()),
                    Cell::from(site.label.clone()),
                    Cell::from(format!("{:.4}", site.location.lat)),
                    Cell::from(format!("{:.4}", site.location.lon)),
                    Cell::from(occupancy.occupied.to_string())
                        .style(Style::default().fg(theme::ERROR_RED)),
                    Cell::from(occupancy.free.to_string())
                        .style(Style::default().fg(theme::SUCCESS_GREEN)),
                    Cell::from(load_text(occupancy))
                        .style(Style::default().fg(theme::load_color(occupancy))),
                    Cell::from(site.background.clone()),
                ])
                .style(theme::table_row())
            })
            .collect();

        let widths = [
            Constraint::Length(4),
            Constraint::Min(10),
            Constraint::Min(12),
            Constraint::Length(9),
            Constraint::Length(9),
            Constraint::Length(9),
            Constraint::Length(6),
            Constraint::Length(6),
            Constraint::Min(16),
        ];

        let table = Table::new(rows, widths)
            .header(header)
            .block(block)
            .row_highlight_style(theme::table_selected());

        let mut state = self.table_state;
        frame.render_stateful_widget(table, area, &mut state);
    }

    fn set_focused(&mut self, focused: bool) {
        self.focused = focused;
    }
}
