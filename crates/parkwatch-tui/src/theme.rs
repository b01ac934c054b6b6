//! Palette and semantic styles.

use ratatui::style::{Color, Modifier, Style};

use parkwatch_core::{SiteOccupancy, SpotStatus};

// ── Palette ───────────────────────────────────────────────────────────

pub const ELECTRIC_PURPLE: Color = Color::Rgb(225, 53, 255); // #e135ff
pub const NEON_CYAN: Color = Color::Rgb(128, 255, 234); // #80ffea
pub const CORAL: Color = Color::Rgb(255, 106, 193); // #ff6ac1
pub const ELECTRIC_YELLOW: Color = Color::Rgb(241, 250, 140); // #f1fa8c
pub const SUCCESS_GREEN: Color = Color::Rgb(80, 250, 123); // #50fa7b
pub const ERROR_RED: Color = Color::Rgb(255, 99, 99); // #ff6363

pub const DIM_WHITE: Color = Color::Rgb(189, 193, 207); // #bdc1cf
pub const BORDER_GRAY: Color = Color::Rgb(98, 114, 164); // #6272a4
pub const BG_HIGHLIGHT: Color = Color::Rgb(40, 42, 54); // #282a36
pub const BG_DARK: Color = Color::Rgb(30, 31, 41); // #1e1f29

// ── Occupancy colors ──────────────────────────────────────────────────

pub fn spot_color(status: SpotStatus) -> Color {
    match status {
        SpotStatus::Occupied => ERROR_RED,
        SpotStatus::Free => SUCCESS_GREEN,
    }
}

/// Site marker color by how full the site is. Sites that report no
/// spots are drawn dim.
pub fn load_color(occupancy: SiteOccupancy) -> Color {
    match occupancy.ratio() {
        None => BORDER_GRAY,
        Some(r) if r < 0.5 => SUCCESS_GREEN,
        Some(r) if r < 0.9 => ELECTRIC_YELLOW,
        Some(_) => CORAL,
    }
}

// ── Semantic styles ───────────────────────────────────────────────────

pub fn title_style() -> Style {
    Style::default().fg(NEON_CYAN).add_modifier(Modifier::BOLD)
}

pub fn border_focused() -> Style {
    Style::default().fg(ELECTRIC_PURPLE)
}

pub fn border_default() -> Style {
    Style::default().fg(BORDER_GRAY)
}

pub fn table_header() -> Style {
    Style::default()
        .fg(NEON_CYAN)
        .add_modifier(Modifier::BOLD | Modifier::UNDERLINED)
}

pub fn table_row() -> Style {
    Style::default().fg(DIM_WHITE)
}

pub fn table_selected() -> Style {
    Style::default()
        .fg(ELECTRIC_PURPLE)
        .bg(BG_HIGHLIGHT)
        .add_modifier(Modifier::BOLD)
}

pub fn tab_active() -> Style {
    Style::default()
        .fg(ELECTRIC_PURPLE)
        .add_modifier(Modifier::BOLD)
}

pub fn tab_inactive() -> Style {
    Style::default().fg(DIM_WHITE)
}

/// Key hint text (e.g. "q quit  ? help").
pub fn key_hint() -> Style {
    Style::default().fg(BORDER_GRAY)
}

pub fn key_hint_key() -> Style {
    Style::default().fg(NEON_CYAN).add_modifier(Modifier::BOLD)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_color_thresholds() {
        let occ = |occupied, free| SiteOccupancy { occupied, free };
        assert_eq!(load_color(occ(0, 0)), BORDER_GRAY);
        assert_eq!(load_color(occ(1, 3)), SUCCESS_GREEN);
        assert_eq!(load_color(occ(3, 1)), ELECTRIC_YELLOW);
        assert_eq!(load_color(occ(9, 0)), CORAL);
    }
}
