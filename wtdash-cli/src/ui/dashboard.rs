//! Environment table over the live snapshot, with tmux-backed terminal
//! sessions in the native region beside it.

use std::io;
use std::time::Duration;

use crossterm::event::{self, Event as CEvent, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::{
    Frame, Terminal,
    backend::Backend,
    layout::{Constraint, Direction, Layout, Rect},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState},
};
use tracing::{debug, warn};

use wtdash_core::model::{EnvKind, Environment};
use wtdash_core::session::{PaneLayout, Session, SessionId, Size, Zoom};
use wtdash_core::store::{EnvStore, Snapshot};

use super::theme::theme;
use crate::mux::{Controller, MuxError};
use crate::scheduler::Refresher;

const POLL: Duration = Duration::from_millis(100);

/// Rows below the main area (key hints and session tabs)
const FOOTER: u16 = 1;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Focus {
    #[default]
    Table,
    /// Keys go to the active session
    Terminal,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Action {
    None,
    Refresh,
    Quit,
    /// Open a session in the selected environment
    Open,
    /// Close the active session
    Close,
    NextTab,
    Zoom(Zoom),
    Input(Vec<u8>),
    Resize(Size),
}

#[derive(Debug, Default)]
pub struct Dashboard {
    pub selected: usize,
    pub focus: Focus,
    /// Last failed session action, shown in the footer
    pub message: Option<String>,
}

impl Dashboard {
    pub fn handle_key(&mut self, code: KeyCode, modifiers: KeyModifiers, len: usize) -> Action {
        if self.focus == Focus::Terminal {
            if code == KeyCode::Char('g') && modifiers.contains(KeyModifiers::CONTROL) {
                self.focus = Focus::Table;
                return Action::None;
            }
            return key_bytes(code, modifiers).map_or(Action::None, Action::Input);
        }

        match code {
            KeyCode::Char('q') | KeyCode::Esc => Action::Quit,
            KeyCode::Char('c') if modifiers.contains(KeyModifiers::CONTROL) => Action::Quit,
            KeyCode::Char('r') => Action::Refresh,
            KeyCode::Char('j') | KeyCode::Down => {
                if self.selected + 1 < len {
                    self.selected += 1;
                }
                Action::None
            }
            KeyCode::Char('k') | KeyCode::Up => {
                self.selected = self.selected.saturating_sub(1);
                Action::None
            }
            KeyCode::Enter if len > 0 => {
                self.focus = Focus::Terminal;
                Action::Open
            }
            KeyCode::Char('i') => {
                self.focus = Focus::Terminal;
                Action::None
            }
            KeyCode::Tab => Action::NextTab,
            KeyCode::Char('x') => Action::Close,
            KeyCode::Char('z') => Action::Zoom(Zoom::Native),
            KeyCode::Char('Z') => Action::Zoom(Zoom::Control),
            _ => Action::None,
        }
    }

    /// Keep the selection inside a list that may have shrunk
    fn clamp(&mut self, len: usize) {
        self.selected = self.selected.min(len.saturating_sub(1));
    }

    pub fn render(&mut self, f: &mut Frame, snapshot: &Snapshot, project: &str, view: &NativeView) {
        self.clamp(snapshot.environments.len());

        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(3), Constraint::Length(FOOTER)])
            .split(f.area());

        let (control, native) = regions(chunks[0], view);
        if let Some(area) = control {
            self.render_table(f, area, snapshot, project);
        }
        if let Some(area) = native {
            let lines: Vec<Line> = view
                .screen
                .iter()
                .map(|l| Line::from(l.as_str()))
                .collect();
            f.render_widget(Paragraph::new(lines).style(theme().text_style()), area);
        }
        f.render_widget(Paragraph::new(self.footer(view)), chunks[1]);
    }

    fn render_table(&self, f: &mut Frame, area: Rect, snapshot: &Snapshot, project: &str) {
        let theme = theme();
        let header = Row::new(
            ["", "ALIAS", "BRANCH", "KIND", "CONTAINER", "DOMAIN", "UP", "CPU", "MEM"]
                .into_iter()
                .map(Cell::from),
        )
        .style(theme.header_style());

        let rows = snapshot.environments.iter().map(env_row);
        let widths = [
            Constraint::Length(2),
            Constraint::Min(10),
            Constraint::Min(12),
            Constraint::Length(9),
            Constraint::Min(14),
            Constraint::Min(16),
            Constraint::Length(7),
            Constraint::Length(7),
            Constraint::Length(9),
        ];

        let title = format!(" {} · {} environments ", project, snapshot.environments.len());
        let table = Table::new(rows, widths)
            .header(header)
            .row_highlight_style(theme.selection_style())
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .border_style(theme.border_style())
                    .title(title),
            );

        let mut state = TableState::default();
        if !snapshot.environments.is_empty() {
            state.select(Some(self.selected));
        }
        f.render_stateful_widget(table, area, &mut state);
    }

    fn footer(&self, view: &NativeView) -> Line<'static> {
        let theme = theme();
        let mut spans = Vec::new();

        for session in &view.sessions {
            let active = view.layout.active_tab.as_deref() == Some(session.id.as_str());
            let label = if session.exited() {
                format!(" {} (exit {}) ", session.label, session.exit_code)
            } else {
                format!(" {} ", session.label)
            };
            spans.push(Span::styled(label, theme.tab_style(session, active)));
        }
        if !view.sessions.is_empty() {
            spans.push(Span::raw(" "));
        }

        let hints: &[(&str, &str)] = match self.focus {
            Focus::Table => &[
                ("j/k", "select"),
                ("enter", "open"),
                ("tab", "next"),
                ("x", "close"),
                ("z", "zoom"),
                ("r", "refresh"),
                ("q", "quit"),
            ],
            Focus::Terminal => &[("ctrl-g", "back")],
        };
        for (key, what) in hints {
            spans.push(Span::styled(format!(" {key} "), theme.key_hint_style()));
            spans.push(Span::styled(what.to_string(), theme.text_dim_style()));
        }

        if let Some(message) = &self.message {
            spans.push(Span::styled(format!("  {message}"), theme.error_style()));
        }
        Line::from(spans)
    }
}

/// Control and native areas under the current layout. Without sessions the
/// table takes the whole main area.
fn regions(main: Rect, view: &NativeView) -> (Option<Rect>, Option<Rect>) {
    if view.sessions.is_empty() {
        return (Some(main), None);
    }
    match view.layout.zoom {
        Zoom::Native => (None, Some(main)),
        Zoom::Control => (Some(main), None),
        Zoom::None => {
            let parts = Layout::default()
                .direction(Direction::Horizontal)
                .constraints([
                    Constraint::Length(view.layout.control_size().width),
                    Constraint::Length(1),
                    Constraint::Min(0),
                ])
                .split(main);
            (Some(parts[0]), Some(parts[2]))
        }
    }
}

fn env_row(env: &Environment) -> Row<'static> {
    let theme = theme();
    let observed = &env.observed;
    let dash = || "-".to_string();
    let kind = match env.kind {
        EnvKind::Container => "container",
        EnvKind::LocalOnly => "local",
    };
    let container = if env.is_container() {
        env.stats_key().to_string()
    } else {
        dash()
    };

    Row::new(vec![
        Cell::from(theme.env_icon(env)).style(theme.env_style(env)),
        Cell::from(env.alias.clone()).style(theme.text_style()),
        Cell::from(env.branch.clone()),
        Cell::from(kind),
        Cell::from(container),
        Cell::from(env.domain.clone()),
        Cell::from(observed.uptime.clone().unwrap_or_else(dash)),
        Cell::from(observed.cpu.clone().unwrap_or_else(dash)),
        Cell::from(observed.mem.clone().unwrap_or_else(dash)),
    ])
    .style(theme.text_dim_style())
}

/// Bytes a terminal sends for a key press
pub fn key_bytes(code: KeyCode, modifiers: KeyModifiers) -> Option<Vec<u8>> {
    let bytes = match code {
        KeyCode::Char(c) if modifiers.contains(KeyModifiers::CONTROL) => {
            let c = c.to_ascii_lowercase();
            if !c.is_ascii_lowercase() {
                return None;
            }
            vec![c as u8 & 0x1f]
        }
        KeyCode::Char(c) => {
            let mut buf = [0u8; 4];
            let mut bytes = c.encode_utf8(&mut buf).as_bytes().to_vec();
            if modifiers.contains(KeyModifiers::ALT) {
                bytes.insert(0, 0x1b);
            }
            bytes
        }
        KeyCode::Enter => vec![b'\r'],
        KeyCode::Tab => vec![b'\t'],
        KeyCode::BackTab => b"\x1b[Z".to_vec(),
        KeyCode::Backspace => vec![0x7f],
        KeyCode::Esc => vec![0x1b],
        KeyCode::Up => b"\x1b[A".to_vec(),
        KeyCode::Down => b"\x1b[B".to_vec(),
        KeyCode::Right => b"\x1b[C".to_vec(),
        KeyCode::Left => b"\x1b[D".to_vec(),
        KeyCode::Home => b"\x1b[H".to_vec(),
        KeyCode::End => b"\x1b[F".to_vec(),
        KeyCode::Insert => b"\x1b[2~".to_vec(),
        KeyCode::Delete => b"\x1b[3~".to_vec(),
        KeyCode::PageUp => b"\x1b[5~".to_vec(),
        KeyCode::PageDown => b"\x1b[6~".to_vec(),
        _ => return None,
    };
    Some(bytes)
}

/// What the native region shows in one frame
#[derive(Clone, Debug, Default)]
pub struct NativeView {
    pub layout: PaneLayout,
    pub sessions: Vec<Session>,
    /// Captured screen of the active session
    pub screen: Vec<String>,
}

/// Terminal sessions hosted for the dashboard. The tmux session is only
/// created once the first environment is opened.
pub struct Terminals {
    controller: Controller,
    hosting: bool,
    screen: Vec<String>,
}

impl Terminals {
    pub fn new(controller: Controller) -> Self {
        Self {
            controller,
            hosting: false,
            screen: Vec::new(),
        }
    }

    pub fn view(&self) -> NativeView {
        NativeView {
            layout: self.controller.layout().clone(),
            sessions: self.controller.sessions(),
            screen: self.screen.clone(),
        }
    }

    fn active(&self) -> Option<SessionId> {
        self.controller.layout().active_tab.clone()
    }

    /// Carry out a session action. `selected` is the highlighted
    /// environment and `total` the size of the main area.
    pub async fn apply(
        &mut self,
        action: Action,
        selected: Option<&Environment>,
        total: Size,
    ) -> Result<(), MuxError> {
        match action {
            Action::Open => {
                let Some(env) = selected else {
                    return Ok(());
                };
                if !self.hosting {
                    self.controller.setup_layout(total).await?;
                    self.hosting = true;
                }
                let id = self.controller.open(&env.alias, &env.path, None).await?;
                self.controller.select_tab(&id).await
            }
            Action::Close => {
                let Some(id) = self.active() else {
                    return Ok(());
                };
                self.screen.clear();
                self.controller.close(&id).await
            }
            Action::NextTab => {
                let sessions = self.controller.sessions();
                if sessions.is_empty() {
                    return Ok(());
                }
                let current = self.active();
                let next = sessions
                    .iter()
                    .position(|s| current.as_deref() == Some(s.id.as_str()))
                    .map_or(0, |i| (i + 1) % sessions.len());
                self.screen.clear();
                self.controller.select_tab(&sessions[next].id).await
            }
            Action::Zoom(region) => self.controller.toggle_zoom(region).await,
            Action::Input(bytes) => match self.active() {
                Some(id) => self.controller.send_input(&id, &bytes).await,
                None => Ok(()),
            },
            Action::Resize(total) if self.hosting => self.controller.resize_layout(total).await,
            Action::Resize(_) | Action::None | Action::Refresh | Action::Quit => Ok(()),
        }
    }

    /// Re-capture the active session's screen
    pub async fn capture(&mut self) {
        let Some(id) = self.active() else {
            self.screen.clear();
            return;
        };
        match self.controller.capture(&id).await {
            Ok(lines) => self.screen = lines,
            Err(e) => debug!(session = %id, error = %e, "capture failed"),
        }
    }

    pub async fn shutdown(&mut self) {
        if self.hosting {
            self.controller.shutdown().await;
            self.hosting = false;
        }
    }
}

/// Size of the main area for a terminal of `width` x `height`
fn main_size(width: u16, height: u16) -> Size {
    Size::new(width, height.saturating_sub(FOOTER))
}

/// Draw the dashboard until the user quits. Each frame reads whatever
/// snapshot is current; probes never block rendering.
pub async fn run<B: Backend>(
    terminal: &mut Terminal<B>,
    store: &EnvStore,
    refresher: &Refresher,
    terminals: &mut Terminals,
    project: &str,
) -> io::Result<()> {
    let mut dashboard = Dashboard::default();

    loop {
        let snapshot = store.current();
        if terminals.hosting {
            terminals.capture().await;
        }
        let view = terminals.view();
        if view.sessions.is_empty() {
            dashboard.focus = Focus::Table;
        }
        terminal.draw(|f| dashboard.render(f, &snapshot, project, &view))?;

        if !event::poll(POLL)? {
            continue;
        }
        let action = match event::read()? {
            CEvent::Key(KeyEvent {
                code,
                modifiers,
                kind: KeyEventKind::Press,
                ..
            }) => dashboard.handle_key(code, modifiers, snapshot.environments.len()),
            CEvent::Resize(width, height) => Action::Resize(main_size(width, height)),
            _ => continue,
        };

        match action {
            Action::Quit => return Ok(()),
            Action::Refresh => refresher.refresh_now(),
            Action::None => {}
            action => {
                let area = terminal.size()?;
                let total = main_size(area.width, area.height);
                let selected = snapshot.environments.get(dashboard.selected);
                match terminals.apply(action, selected, total).await {
                    Ok(()) => dashboard.message = None,
                    Err(e) => {
                        warn!(error = %e, "session action failed");
                        dashboard.message = Some(e.to_string());
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use ratatui::backend::TestBackend;

    use super::*;
    use crate::exec::CommandOutput;
    use crate::exec::fake::FakeRunner;
    use wtdash_core::config::TmuxConfig;
    use wtdash_core::model::Observed;
    use wtdash_core::session::SessionPhase;

    fn snapshot() -> Snapshot {
        let envs = vec![
            Environment {
                path: PathBuf::from("/trees/feat"),
                name: "feat".into(),
                alias: "feat".into(),
                kind: EnvKind::Container,
                container: "shop-feat".into(),
                domain: "feat.localhost".into(),
                observed: Observed {
                    running: true,
                    container_exists: true,
                    cpu: Some("3.2%".into()),
                    ..Default::default()
                },
                ..Default::default()
            },
            Environment {
                path: PathBuf::from("/trees/spike"),
                name: "spike".into(),
                alias: "spike".into(),
                kind: EnvKind::LocalOnly,
                ..Default::default()
            },
        ];
        Snapshot {
            version: 1,
            environments: Arc::new(envs),
            updated_at: None,
        }
    }

    fn screen(terminal: &Terminal<TestBackend>) -> String {
        terminal
            .backend()
            .buffer()
            .content()
            .iter()
            .map(|cell| cell.symbol())
            .collect()
    }

    /// tmux that hands out sequential window ids and never loses a pane
    fn tmux() -> Arc<FakeRunner> {
        let windows = AtomicU32::new(0);
        Arc::new(FakeRunner::new(move |_, args| match args[2].as_str() {
            "display-message" | "new-window" => {
                let n = windows.fetch_add(1, Ordering::SeqCst) + 1;
                CommandOutput::ok(format!("@{n} %{n}\n"))
            }
            "list-panes" => CommandOutput::ok("0 \n"),
            "capture-pane" => CommandOutput::ok("$ npm run dev\n"),
            _ => CommandOutput::ok(""),
        }))
    }

    fn terminals(runner: &Arc<FakeRunner>) -> Terminals {
        Terminals::new(Controller::new(runner.clone(), &TmuxConfig::default()))
    }

    #[test]
    fn test_selection_stays_in_bounds() {
        let mut dashboard = Dashboard::default();
        let none = KeyModifiers::NONE;
        assert_eq!(dashboard.handle_key(KeyCode::Char('k'), none, 2), Action::None);
        assert_eq!(dashboard.selected, 0);
        dashboard.handle_key(KeyCode::Char('j'), none, 2);
        dashboard.handle_key(KeyCode::Char('j'), none, 2);
        assert_eq!(dashboard.selected, 1);
        assert_eq!(dashboard.handle_key(KeyCode::Char('r'), none, 2), Action::Refresh);
        assert_eq!(dashboard.handle_key(KeyCode::Char('q'), none, 2), Action::Quit);
    }

    #[test]
    fn test_table_keys_map_to_session_actions() {
        let mut dashboard = Dashboard::default();
        let none = KeyModifiers::NONE;
        assert_eq!(dashboard.handle_key(KeyCode::Enter, none, 0), Action::None);
        assert_eq!(dashboard.focus, Focus::Table);

        assert_eq!(dashboard.handle_key(KeyCode::Tab, none, 2), Action::NextTab);
        assert_eq!(dashboard.handle_key(KeyCode::Char('x'), none, 2), Action::Close);
        assert_eq!(
            dashboard.handle_key(KeyCode::Char('z'), none, 2),
            Action::Zoom(Zoom::Native)
        );
        assert_eq!(
            dashboard.handle_key(KeyCode::Char('Z'), KeyModifiers::SHIFT, 2),
            Action::Zoom(Zoom::Control)
        );

        assert_eq!(dashboard.handle_key(KeyCode::Enter, none, 2), Action::Open);
        assert_eq!(dashboard.focus, Focus::Terminal);
    }

    #[test]
    fn test_terminal_focus_forwards_keys() {
        let mut dashboard = Dashboard {
            focus: Focus::Terminal,
            ..Default::default()
        };
        let none = KeyModifiers::NONE;
        let ctrl = KeyModifiers::CONTROL;

        assert_eq!(
            dashboard.handle_key(KeyCode::Char('q'), none, 2),
            Action::Input(b"q".to_vec())
        );
        assert_eq!(
            dashboard.handle_key(KeyCode::Char('c'), ctrl, 2),
            Action::Input(vec![0x03])
        );
        assert_eq!(
            dashboard.handle_key(KeyCode::Up, none, 2),
            Action::Input(b"\x1b[A".to_vec())
        );
        assert_eq!(dashboard.handle_key(KeyCode::Char('g'), ctrl, 2), Action::None);
        assert_eq!(dashboard.focus, Focus::Table);
    }

    #[test]
    fn test_key_bytes() {
        let none = KeyModifiers::NONE;
        assert_eq!(key_bytes(KeyCode::Enter, none), Some(vec![b'\r']));
        assert_eq!(key_bytes(KeyCode::Backspace, none), Some(vec![0x7f]));
        assert_eq!(key_bytes(KeyCode::Char('é'), none), Some("é".as_bytes().to_vec()));
        assert_eq!(
            key_bytes(KeyCode::Char('b'), KeyModifiers::ALT),
            Some(vec![0x1b, b'b'])
        );
        assert_eq!(key_bytes(KeyCode::Char('1'), KeyModifiers::CONTROL), None);
        assert_eq!(key_bytes(KeyCode::F(5), none), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_input_and_tabs() {
        let runner = tmux();
        let mut terminals = terminals(&runner);
        let snapshot = snapshot();
        let total = Size::new(120, 39);

        terminals
            .apply(Action::Open, snapshot.environments.first(), total)
            .await
            .unwrap();
        assert_eq!(
            runner.calls_matching("new-session"),
            vec!["tmux -L wtdash new-session -d -s wtdash -x 71 -y 39"]
        );
        assert!(runner.calls_matching("respawn-pane")[0].contains("-c /trees/feat"));

        terminals
            .apply(Action::Input(b"ls\r".to_vec()), None, total)
            .await
            .unwrap();
        assert_eq!(
            runner.calls_matching("send-keys"),
            vec!["tmux -L wtdash send-keys -t %1 -H 6c 73 0d"]
        );

        terminals
            .apply(Action::Open, snapshot.environments.get(1), total)
            .await
            .unwrap();
        let view = terminals.view();
        assert_eq!(view.sessions.len(), 2);
        assert_eq!(view.layout.active_tab.as_deref(), Some(view.sessions[1].id.as_str()));
        assert_eq!(runner.calls_matching("new-session").len(), 1);

        terminals.apply(Action::NextTab, None, total).await.unwrap();
        assert_eq!(
            terminals.view().layout.active_tab.as_deref(),
            Some(view.sessions[0].id.as_str())
        );
        assert!(!runner.calls_matching("select-window -t @1").is_empty());

        terminals.capture().await;
        assert_eq!(terminals.view().screen, vec!["$ npm run dev"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_zoom_and_resize() {
        let runner = tmux();
        let mut terminals = terminals(&runner);
        let snapshot = snapshot();
        let total = Size::new(120, 39);
        terminals
            .apply(Action::Open, snapshot.environments.first(), total)
            .await
            .unwrap();

        terminals
            .apply(Action::Zoom(Zoom::Native), None, total)
            .await
            .unwrap();
        assert!(!runner
            .calls_matching("resize-pane -t %1 -x 120 -y 39")
            .is_empty());

        terminals
            .apply(Action::Resize(Size::new(100, 30)), None, total)
            .await
            .unwrap();
        assert!(!runner
            .calls_matching("resize-window -t @1 -x 100 -y 30")
            .is_empty());

        terminals.apply(Action::Close, None, total).await.unwrap();
        assert_eq!(runner.calls_matching("kill-window -t @1").len(), 1);
        let view = terminals.view();
        assert!(view.sessions.is_empty());
        assert!(view.layout.active_tab.is_none());

        terminals.shutdown().await;
        assert_eq!(runner.calls_matching("kill-session").len(), 1);
    }

    #[tokio::test]
    async fn test_resize_before_any_session_is_a_no_op() {
        let runner = tmux();
        let mut terminals = terminals(&runner);
        terminals
            .apply(Action::Resize(Size::new(100, 30)), None, Size::new(100, 30))
            .await
            .unwrap();
        terminals.shutdown().await;
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn test_render_rows() {
        let mut terminal = Terminal::new(TestBackend::new(120, 8)).unwrap();
        let mut dashboard = Dashboard {
            selected: 5,
            ..Default::default()
        };
        terminal
            .draw(|f| dashboard.render(f, &snapshot(), "shop", &NativeView::default()))
            .unwrap();

        let screen = screen(&terminal);
        assert!(screen.contains("shop-feat"));
        assert!(screen.contains("3.2%"));
        assert!(screen.contains("spike"));
        assert!(screen.contains("2 environments"));
        assert_eq!(dashboard.selected, 1);
    }

    #[test]
    fn test_render_native_region_and_tabs() {
        let mut session = Session::new("s1".into(), "feat");
        session.phase = SessionPhase::Alive;
        let mut done = Session::new("s2".into(), "spike");
        done.mark_exited(Some(2));

        let mut layout = PaneLayout::new(Size::new(120, 9), 48);
        layout.active_tab = Some("s1".into());
        let mut view = NativeView {
            layout,
            sessions: vec![session, done],
            screen: vec!["ready on :3000".into()],
        };

        let mut terminal = Terminal::new(TestBackend::new(120, 10)).unwrap();
        let mut dashboard = Dashboard::default();
        terminal
            .draw(|f| dashboard.render(f, &snapshot(), "shop", &view))
            .unwrap();
        let shown = screen(&terminal);
        assert!(shown.contains("ready on :3000"));
        assert!(shown.contains("spike (exit 2)"));
        assert!(shown.contains("environments"));

        view.layout.toggle_zoom(Zoom::Native);
        terminal
            .draw(|f| dashboard.render(f, &snapshot(), "shop", &view))
            .unwrap();
        let shown = screen(&terminal);
        assert!(shown.contains("ready on :3000"));
        assert!(!shown.contains("environments"));
    }
}
