//! Application core: the action loop and the overlays drawn above the active screen.
//!
//! The floor-plan modal lives here rather than in a screen: it sits on top
//! of whichever tab is active and captures input while open.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use color_eyre::eyre::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseEvent};
use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::Style,
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, Clear, Paragraph, Tabs},
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use parkwatch_core::{ConnectionState, FeedClient, OccupancySnapshot, SiteRegistry, ViewController};

use crate::action::{Action, Notification, NotificationLevel};
use crate::component::Component;
use crate::data_bridge::run_data_bridge;
use crate::event::{Event, EventReader};
use crate::screen::ScreenId;
use crate::screens::create_screens;
use crate::theme;
use crate::tui::Tui;
use crate::widgets::floor_plan::FloorPlan;

const TICK_RATE: Duration = Duration::from_millis(250);
const RENDER_RATE: Duration = Duration::from_millis(33);
const NOTIFICATION_TTL: Duration = Duration::from_secs(4);
/// How long shutdown waits for the feed to close its connection.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

pub struct App {
    active_screen: ScreenId,
    screens: HashMap<ScreenId, Box<dyn Component>>,
    running: bool,
    registry: Arc<SiteRegistry>,
    /// Owns the modal. Reads the store only on open and refresh.
    view: ViewController,
    client: FeedClient,
    /// Latest snapshot, for the status bar.
    snapshot: Arc<OccupancySnapshot>,
    connection: ConnectionState,
    help_visible: bool,
    notification: Option<(Notification, Instant)>,
    action_tx: mpsc::UnboundedSender<Action>,
    action_rx: mpsc::UnboundedReceiver<Action>,
    data_cancel: CancellationToken,
}

impl App {
    pub fn new(registry: SiteRegistry, client: FeedClient) -> Self {
        let (action_tx, action_rx) = mpsc::unbounded_channel();
        let registry = Arc::new(registry);
        let screens = create_screens(&registry).into_iter().collect();
        let view = ViewController::new(client.store().clone());
        let snapshot = client.store().snapshot();

        Self {
            active_screen: ScreenId::default(),
            screens,
            running: true,
            registry,
            view,
            client,
            snapshot,
            connection: ConnectionState::Disconnected,
            help_visible: false,
            notification: None,
            action_tx,
            action_rx,
            data_cancel: CancellationToken::new(),
        }
    }

    /// Run until the user quits, then stop the feed and restore the terminal.
    pub async fn run(&mut self) -> Result<()> {
        let mut tui = Tui::new()?;
        tui.enter()?;

        if let Some(screen) = self.screens.get_mut(&self.active_screen) {
            screen.set_focused(true);
        }

        let bridge = tokio::spawn(run_data_bridge(
            self.client.clone(),
            self.action_tx.clone(),
            self.data_cancel.clone(),
        ));
        let mut events = EventReader::new(TICK_RATE, RENDER_RATE);

        info!("TUI event loop started");

        while self.running {
            let Some(event) = events.next().await else {
                break;
            };

            if let Some(action) = self.map_event(event)? {
                self.action_tx.send(action)?;
            }

            while let Ok(action) = self.action_rx.try_recv() {
                self.process_action(&action)?;

                if let Action::Render = action {
                    tui.draw(|frame| self.render(frame))?;
                }
            }
        }

        self.data_cancel.cancel();
        events.stop();
        if tokio::time::timeout(SHUTDOWN_GRACE, bridge).await.is_err() {
            warn!("feed did not shut down in time");
        }
        tui.exit();
        info!("TUI event loop ended");
        Ok(())
    }

    fn map_event(&mut self, event: Event) -> Result<Option<Action>> {
        match event {
            Event::Key(key) => self.handle_key_event(key),
            Event::Mouse(mouse) => self.handle_mouse_event(mouse),
            Event::Resize | Event::Render => Ok(Some(Action::Render)),
            Event::Tick => Ok(Some(Action::Tick)),
        }
    }

    /// Global keys first, then the modal's keys while it is open, then the
    /// active screen.
    fn handle_key_event(&mut self, key: KeyEvent) -> Result<Option<Action>> {
        if key.modifiers == KeyModifiers::CONTROL && key.code == KeyCode::Char('c') {
            return Ok(Some(Action::Quit));
        }

        if self.help_visible {
            return match key.code {
                KeyCode::Esc | KeyCode::Char('?') => Ok(Some(Action::ToggleHelp)),
                _ => Ok(None),
            };
        }

        if self.view.modal().is_some() {
            return Ok(match key.code {
                KeyCode::Char('u' | 'r') => Some(Action::RefreshSite),
                KeyCode::Esc | KeyCode::Char('x') => Some(Action::CloseSite),
                KeyCode::Char('q') => Some(Action::Quit),
                KeyCode::Char('?') => Some(Action::ToggleHelp),
                _ => None,
            });
        }

        match (key.modifiers, key.code) {
            (KeyModifiers::NONE, KeyCode::Char('q')) => return Ok(Some(Action::Quit)),
            (_, KeyCode::Char('?')) => return Ok(Some(Action::ToggleHelp)),
            (KeyModifiers::NONE, KeyCode::Tab) => {
                return Ok(Some(Action::SwitchScreen(self.active_screen.next())));
            }
            (_, KeyCode::BackTab) => {
                return Ok(Some(Action::SwitchScreen(self.active_screen.prev())));
            }
            (KeyModifiers::NONE, KeyCode::Char(c @ '1'..='9')) => {
                return Ok(self.site_shortcut(c));
            }
            _ => {}
        }

        if let Some(screen) = self.screens.get_mut(&self.active_screen) {
            return screen.handle_key_event(key);
        }
        Ok(None)
    }

    fn handle_mouse_event(&mut self, mouse: MouseEvent) -> Result<Option<Action>> {
        if self.help_visible || self.view.modal().is_some() {
            return Ok(None);
        }
        if let Some(screen) = self.screens.get_mut(&self.active_screen) {
            return screen.handle_mouse_event(mouse);
        }
        Ok(None)
    }

    /// `1`–`9` open the site at that position in the registry.
    fn site_shortcut(&self, digit: char) -> Option<Action> {
        let n = usize::try_from(digit.to_digit(10)?).ok()?;
        self.registry
            .by_index(n.checked_sub(1)?)
            .map(|site| Action::OpenSite(site.id.clone()))
    }

    fn process_action(&mut self, action: &Action) -> Result<()> {
        match action {
            Action::Quit => self.running = false,

            Action::Render => {}

            Action::Tick => {
                if let Some((_, shown)) = &self.notification {
                    if shown.elapsed() > NOTIFICATION_TTL {
                        self.notification = None;
                    }
                }
            }

            Action::SwitchScreen(target) => {
                if *target != self.active_screen {
                    debug!("switching screen: {} → {}", self.active_screen, target);
                    if let Some(screen) = self.screens.get_mut(&self.active_screen) {
                        screen.set_focused(false);
                    }
                    self.active_screen = *target;
                    if let Some(screen) = self.screens.get_mut(&self.active_screen) {
                        screen.set_focused(true);
                    }
                }
            }

            Action::ToggleHelp => self.help_visible = !self.help_visible,

            Action::SnapshotUpdated(snapshot) => {
                self.snapshot = Arc::clone(snapshot);
                self.broadcast(action)?;
            }

            Action::ConnectionChanged(state) => {
                if *state != self.connection {
                    info!(?state, "feed connection state changed");
                }
                self.connection = state.clone();
            }

            Action::OpenSite(id) => {
                self.open_site(id);
                self.broadcast(action)?;
            }

            Action::RefreshSite => {
                if self.view.refresh() {
                    if let Some(modal) = self.view.modal() {
                        debug!(site = %modal.site_id, rows = modal.rows.len(), "modal refreshed");
                    }
                }
            }

            Action::CloseSite => self.view.close_site(),

            Action::Notify(notification) => {
                self.notification = Some((notification.clone(), Instant::now()));
            }

            Action::DismissNotification => self.notification = None,
        }
        Ok(())
    }

    fn open_site(&mut self, id: &str) {
        let site = match self.registry.require(id) {
            Ok(site) => site,
            Err(e) => {
                warn!(error = %e, "cannot open site");
                self.notification = Some((Notification::warning(e.to_string()), Instant::now()));
                return;
            }
        };
        let modal = self.view.open_registered(site);
        info!(
            site = id,
            occupied = modal.occupied_count(),
            free = modal.free_count(),
            "site opened"
        );
    }

    /// Deliver an action to every screen so they stay in sync.
    fn broadcast(&mut self, action: &Action) -> Result<()> {
        for screen in self.screens.values_mut() {
            if let Some(follow_up) = screen.update(action)? {
                self.action_tx.send(follow_up)?;
            }
        }
        Ok(())
    }

    // ── Rendering ────────────────────────────────────────────────

    fn render(&self, frame: &mut Frame) {
        let area = frame.area();
        let [content_area, tab_area, status_area] = Layout::vertical([
            Constraint::Min(1),
            Constraint::Length(1),
            Constraint::Length(1),
        ])
        .areas(area);

        if let Some(screen) = self.screens.get(&self.active_screen) {
            screen.render(frame, content_area);
        }
        self.render_tab_bar(frame, tab_area);
        self.render_status_bar(frame, status_area, Utc::now());

        // Overlays, topmost last
        self.render_modal(frame, content_area);
        if let Some((notification, _)) = &self.notification {
            render_notification(frame, area, notification);
        }
        if self.help_visible {
            render_help_overlay(frame, area);
        }
    }

    fn render_modal(&self, frame: &mut Frame, area: Rect) {
        let Some(modal) = self.view.modal() else {
            return;
        };
        let label = self
            .registry
            .get(&modal.site_id)
            .map_or(modal.site_id.as_str(), |site| site.label.as_str());

        let popup = centered_rect(
            area,
            area.width.saturating_sub(area.width / 10),
            area.height.saturating_sub(area.height / 10),
        );
        frame.render_widget(Clear, popup);
        frame.render_widget(
            FloorPlan::new(modal, label).stale(self.view.is_stale()),
            popup,
        );
    }

    fn render_tab_bar(&self, frame: &mut Frame, area: Rect) {
        let titles: Vec<Line> = ScreenId::ALL
            .iter()
            .map(|&id| {
                let style = if id == self.active_screen {
                    theme::tab_active()
                } else {
                    theme::tab_inactive()
                };
                Line::from(Span::styled(format!(" {} ", id.label()), style))
            })
            .collect();

        let tabs = Tabs::new(titles)
            .divider(Span::styled("│", theme::key_hint()))
            .select(
                ScreenId::ALL
                    .iter()
                    .position(|&s| s == self.active_screen)
                    .unwrap_or(0),
            );
        frame.render_widget(tabs, area);
    }

    fn render_status_bar(&self, frame: &mut Frame, area: Rect, now: DateTime<Utc>) {
        let mut spans = vec![Span::raw(" "), connection_indicator(&self.connection)];
        spans.push(Span::styled(" │ ", theme::key_hint()));
        spans.push(Span::styled(
            snapshot_summary(&self.snapshot, now),
            Style::default().fg(theme::DIM_WHITE),
        ));
        if self.view.is_stale() {
            spans.push(Span::styled(" │ ", theme::key_hint()));
            spans.push(Span::styled(
                "newer data, u to refresh",
                Style::default().fg(theme::ELECTRIC_YELLOW),
            ));
        }
        spans.push(Span::styled(
            " │ ? help  Tab screens  1-9 open  q quit",
            theme::key_hint(),
        ));
        frame.render_widget(Paragraph::new(Line::from(spans)), area);
    }
}

fn connection_indicator(state: &ConnectionState) -> Span<'static> {
    match state {
        ConnectionState::Connected => {
            Span::styled("● live", Style::default().fg(theme::SUCCESS_GREEN))
        }
        ConnectionState::Connecting => {
            Span::styled("◐ connecting", Style::default().fg(theme::ELECTRIC_YELLOW))
        }
        ConnectionState::Reconnecting { attempt } => Span::styled(
            format!("◐ reconnecting (attempt {attempt})"),
            Style::default().fg(theme::ELECTRIC_YELLOW),
        ),
        ConnectionState::Disconnected => {
            Span::styled("○ disconnected", Style::default().fg(theme::ERROR_RED))
        }
        ConnectionState::Failed => {
            Span::styled("✗ feed unavailable", Style::default().fg(theme::ERROR_RED))
        }
    }
}

/// `"12 spots · updated 1m 5s ago"`, or a waiting hint before the first
/// snapshot arrives.
fn snapshot_summary(snapshot: &OccupancySnapshot, now: DateTime<Utc>) -> String {
    let Some(received_at) = snapshot.received_at() else {
        return "waiting for data".to_owned();
    };
    let age = (now - received_at).to_std().unwrap_or_default();
    let age = humantime::format_duration(Duration::from_secs(age.as_secs()));
    let spots = snapshot.len();
    let noun = if spots == 1 { "spot" } else { "spots" };
    format!("{spots} {noun} · updated {age} ago")
}

fn centered_rect(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    Rect::new(
        area.x + (area.width - width) / 2,
        area.y + (area.height - height) / 2,
        width,
        height,
    )
}

fn render_help_overlay(frame: &mut Frame, area: Rect) {
    let help_area = centered_rect(
        area,
        52.min(area.width.saturating_sub(4)),
        20.min(area.height.saturating_sub(4)),
    );
    frame.render_widget(Clear, help_area);

    let block = Block::default()
        .title(" Keys ")
        .title_style(theme::title_style())
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(theme::border_focused())
        .style(Style::default().bg(theme::BG_DARK));
    let inner = block.inner(help_area);
    frame.render_widget(block, help_area);

    let section = |title: &'static str| {
        Line::from(Span::styled(
            format!("  {title}"),
            Style::default().fg(theme::NEON_CYAN),
        ))
    };
    let key = |keys: &'static str, what: &'static str| {
        Line::from(vec![
            Span::styled(format!("  {keys:<12}"), theme::key_hint_key()),
            Span::styled(what, theme::key_hint()),
        ])
    };

    let lines = vec![
        section("Navigation"),
        key("Tab", "Next screen"),
        key("j/k ↑/↓", "Select site"),
        key("Enter", "Open selected site"),
        key("1-9", "Open site by number"),
        key("click", "Open site under cursor"),
        Line::from(""),
        section("Floor plan"),
        key("u / r", "Refresh from latest data"),
        key("Esc / x", "Close"),
        Line::from(""),
        section("Global"),
        key("?", "This help"),
        key("q", "Quit"),
        Line::from(""),
        Line::from(Span::styled("  Esc or ? to close", theme::key_hint())),
    ];
    frame.render_widget(Paragraph::new(lines), inner);
}

/// Toast in the bottom-right corner, above the status bar.
fn render_notification(frame: &mut Frame, area: Rect, notification: &Notification) {
    let msg_len = u16::try_from(notification.message.chars().count()).unwrap_or(u16::MAX);
    let width = msg_len.saturating_add(6).clamp(20, 60).min(area.width);
    let height = 3u16.min(area.height);
    let x = area.width.saturating_sub(width + 1);
    let y = area.height.saturating_sub(height + 2);
    let toast_area = Rect::new(area.x + x, area.y + y, width, height);

    let (border_color, icon) = match notification.level {
        NotificationLevel::Error => (theme::ERROR_RED, "✗"),
        NotificationLevel::Warning => (theme::ELECTRIC_YELLOW, "!"),
        NotificationLevel::Info => (theme::NEON_CYAN, "·"),
    };

    frame.render_widget(Clear, toast_area);
    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(border_color))
        .style(Style::default().bg(theme::BG_DARK));
    let inner = block.inner(toast_area);
    frame.render_widget(block, toast_area);

    let line = Line::from(vec![
        Span::styled(format!(" {icon} "), Style::default().fg(border_color)),
        Span::styled(
            notification.message.as_str(),
            Style::default().fg(theme::DIM_WHITE),
        ),
    ]);
    frame.render_widget(Paragraph::new(line), inner);
}

#[cfg(test)]
mod tests {
    use parkwatch_core::{
        FeedConfig, GeoPoint, NormalizedPosition, OccupancyEntries, OccupancyStore, PositionMap,
        Site, SpotStatus,
    };
    use pretty_assertions::assert_eq;
    use ratatui::{Terminal, backend::TestBackend};

    use super::*;

    fn site(id: &str, background: &str, positions: &[(&str, f64, f64)]) -> Site {
        Site {
            id: id.into(),
            label: format!("Show {}", id.trim_end_matches(".mp4")),
            location: GeoPoint::new(52.25, 104.25),
            background: background.into(),
            positions: positions
                .iter()
                .map(|&(spot, x, y)| (spot.to_owned(), NormalizedPosition::new(x, y)))
                .collect::<PositionMap>(),
        }
    }

    fn entries(pairs: &[(&str, &str)]) -> OccupancyEntries {
        pairs
            .iter()
            .map(|&(k, v)| (k.to_owned(), v.to_owned()))
            .collect()
    }

    fn app() -> App {
        let registry = SiteRegistry::new([
            site(
                "par1.mp4",
                "background1.png",
                &[("1", 12.0, 8.0), ("2", 20.0, 8.0)],
            ),
            site("par2.mp4", "background2.png", &[("1", 50.0, 50.0)]),
        ]);
        let endpoint = "http://127.0.0.1:9".parse().unwrap();
        let client = FeedClient::new(FeedConfig::new(endpoint), OccupancyStore::new());
        client.store().replace(entries(&[
            ("par1.mp4/1", "1"),
            ("par1.mp4/2", "0"),
            ("par2.mp4/1", "1"),
        ]));
        App::new(registry, client)
    }

    fn press(app: &mut App, code: KeyCode) -> Option<Action> {
        app.handle_key_event(KeyEvent::new(code, KeyModifiers::NONE))
            .unwrap()
    }

    fn dispatch(app: &mut App, code: KeyCode) {
        if let Some(action) = press(app, code) {
            app.process_action(&action).unwrap();
        }
    }

    fn statuses(app: &App) -> Vec<(String, SpotStatus)> {
        app.view
            .modal()
            .map(|m| m.rows.iter().map(|r| (r.spot_id.clone(), r.status)).collect())
            .unwrap_or_default()
    }

    #[test]
    fn number_key_opens_site_in_registry_order() {
        let mut app = app();
        assert!(matches!(press(&mut app, KeyCode::Char('2')), Some(Action::OpenSite(ref id)) if id == "par2.mp4"));
        assert!(press(&mut app, KeyCode::Char('9')).is_none());

        dispatch(&mut app, KeyCode::Char('1'));
        let modal = app.view.modal().unwrap();
        assert_eq!(modal.site_id, "par1.mp4");
        assert_eq!(
            statuses(&app),
            vec![
                ("1".to_owned(), SpotStatus::Occupied),
                ("2".to_owned(), SpotStatus::Free)
            ]
        );
    }

    #[test]
    fn opening_another_site_replaces_modal() {
        let mut app = app();
        dispatch(&mut app, KeyCode::Char('1'));
        app.process_action(&Action::OpenSite("par2.mp4".into()))
            .unwrap();

        let modal = app.view.modal().unwrap();
        assert_eq!(modal.site_id, "par2.mp4");
        assert_eq!(modal.background, "background2.png");
        assert_eq!(statuses(&app), vec![("1".to_owned(), SpotStatus::Occupied)]);
    }

    #[test]
    fn modal_waits_for_refresh() {
        let mut app = app();
        dispatch(&mut app, KeyCode::Char('1'));

        app.client
            .store()
            .replace(entries(&[("par1.mp4/1", "0"), ("par1.mp4/2", "0")]));
        let snapshot = app.client.store().snapshot();
        app.process_action(&Action::SnapshotUpdated(snapshot))
            .unwrap();

        assert!(app.view.is_stale());
        assert_eq!(statuses(&app)[0].1, SpotStatus::Occupied);

        dispatch(&mut app, KeyCode::Char('u'));
        assert!(!app.view.is_stale());
        assert_eq!(statuses(&app)[0].1, SpotStatus::Free);
    }

    #[test]
    fn modal_captures_keys_and_closes() {
        let mut app = app();
        dispatch(&mut app, KeyCode::Char('1'));

        assert!(press(&mut app, KeyCode::Tab).is_none());
        assert!(press(&mut app, KeyCode::Char('2')).is_none());

        dispatch(&mut app, KeyCode::Char('x'));
        assert!(app.view.modal().is_none());

        dispatch(&mut app, KeyCode::Char('1'));
        dispatch(&mut app, KeyCode::Esc);
        assert!(app.view.modal().is_none());
    }

    #[test]
    fn refresh_without_modal_is_noop() {
        let mut app = app();
        app.process_action(&Action::RefreshSite).unwrap();
        assert!(app.view.modal().is_none());
    }

    #[test]
    fn unknown_site_warns_instead_of_opening() {
        let mut app = app();
        app.process_action(&Action::OpenSite("nope.mp4".into()))
            .unwrap();
        assert!(app.view.modal().is_none());
        let (toast, _) = app.notification.as_ref().unwrap();
        assert_eq!(toast.level, NotificationLevel::Warning);
    }

    #[test]
    fn tab_cycles_screens() {
        let mut app = app();
        dispatch(&mut app, KeyCode::Tab);
        assert_eq!(app.active_screen, ScreenId::Sites);
        dispatch(&mut app, KeyCode::Tab);
        assert_eq!(app.active_screen, ScreenId::Map);
    }

    #[test]
    fn help_swallows_other_keys() {
        let mut app = app();
        dispatch(&mut app, KeyCode::Char('?'));
        assert!(app.help_visible);
        assert!(press(&mut app, KeyCode::Char('1')).is_none());
        dispatch(&mut app, KeyCode::Esc);
        assert!(!app.help_visible);
    }

    #[test]
    fn summary_reports_age() {
        let store = OccupancyStore::new();
        assert_eq!(
            snapshot_summary(&store.snapshot(), Utc::now()),
            "waiting for data"
        );

        store.replace(entries(&[("par1.mp4/1", "1")]));
        let snapshot = store.snapshot();
        let later = snapshot.received_at().unwrap() + chrono::TimeDelta::seconds(65);
        assert_eq!(
            snapshot_summary(&snapshot, later),
            "1 spot · updated 1m 5s ago"
        );
    }

    #[test]
    fn open_modal_is_drawn_over_the_screen() {
        let mut app = app();
        dispatch(&mut app, KeyCode::Char('1'));

        let mut terminal = Terminal::new(TestBackend::new(100, 30)).unwrap();
        terminal.draw(|frame| app.render(frame)).unwrap();
        let text: String = terminal
            .backend()
            .buffer()
            .content()
            .iter()
            .map(ratatui::buffer::Cell::symbol)
            .collect();

        assert!(text.contains("Show par1 · background1.png"));
        assert!(text.contains("1 occupied"));
        assert!(text.contains("1 free"));
    }
}
