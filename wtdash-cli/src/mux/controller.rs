use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use wtdash_core::config::TmuxConfig;
use wtdash_core::session::{PaneLayout, Session, SessionId, SessionPhase, Size, Zoom};

use super::tmux::{self, MuxError, TMUX, Tmux, WindowHandle};
use crate::exec::CommandRunner;

/// How often each session's pane is polled
pub const MONITOR_INTERVAL: Duration = Duration::from_millis(200);

/// How long transient poll failures are tolerated before a session is
/// declared exited
pub const STALE_AFTER: Duration = Duration::from_secs(1);

/// How long `close` waits for the monitor to observe the exit
pub const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Bytes per `send-keys` call
const SEND_CHUNK: usize = 256;

struct Entry {
    tx: watch::Sender<Session>,
    monitor: JoinHandle<()>,
}

impl Entry {
    fn session(&self) -> Session {
        self.tx.borrow().clone()
    }
}

/// Owns the tmux server that hosts every native terminal session
pub struct Controller {
    runner: Arc<dyn CommandRunner>,
    tmux: Tmux,
    session_name: String,
    shell: Option<String>,
    entries: Vec<Entry>,
    layout: PaneLayout,
    first_window_free: bool,
}

impl Controller {
    pub fn new(runner: Arc<dyn CommandRunner>, config: &TmuxConfig) -> Self {
        Self {
            runner,
            tmux: Tmux::new(config.socket.clone()),
            session_name: config.session.clone(),
            shell: config.shell.clone(),
            entries: Vec::new(),
            layout: PaneLayout::new(Size::default(), config.control_width),
            first_window_free: false,
        }
    }

    async fn exec(&self, args: Vec<String>) -> Result<String, MuxError> {
        self.runner
            .run(TMUX, &args)
            .await
            .map_err(MuxError::classify)
    }

    pub fn tmux(&self) -> &Tmux {
        &self.tmux
    }

    pub fn session_name(&self) -> &str {
        &self.session_name
    }

    pub fn layout(&self) -> &PaneLayout {
        &self.layout
    }

    /// Start the hosting tmux session sized to the native region. A stale
    /// session left on the socket by an earlier run is replaced.
    pub async fn setup_layout(&mut self, total: Size) -> Result<(), MuxError> {
        self.layout.total = total;
        let size = self.bootstrap_size();

        let created = self
            .exec(self.tmux.new_session(&self.session_name, size))
            .await;
        if let Err(e) = created {
            if !e.to_string().contains("duplicate session") {
                return Err(e);
            }
            debug!(session = %self.session_name, "replacing stale tmux session");
            self.exec(self.tmux.kill_session(&self.session_name)).await?;
            self.exec(self.tmux.new_session(&self.session_name, size))
                .await?;
        }

        self.exec(self.tmux.set_option("remain-on-exit", "on"))
            .await?;
        self.exec(self.tmux.set_option("window-size", "manual"))
            .await?;
        self.first_window_free = true;
        info!(session = %self.session_name, width = size.width, height = size.height, "tmux layout ready");
        Ok(())
    }

    fn bootstrap_size(&self) -> Size {
        let native = self.layout.native_size();
        if native.is_empty() {
            Size::new(80, 24)
        } else {
            native
        }
    }

    fn command(&self, command: Option<Vec<String>>) -> Vec<String> {
        command
            .or_else(|| self.shell.clone().map(|shell| vec![shell]))
            .unwrap_or_default()
    }

    /// Open a terminal session running `command` (or the configured shell)
    /// in `cwd`. The first session reuses the bootstrap window.
    pub async fn open(
        &mut self,
        label: &str,
        cwd: &Path,
        command: Option<Vec<String>>,
    ) -> Result<SessionId, MuxError> {
        let command = self.command(command);
        let handle = if self.first_window_free {
            self.exec(self.tmux.respawn_pane(&self.session_name, cwd, &command))
                .await?;
            self.exec(self.tmux.rename_window(&self.session_name, label))
                .await?;
            let output = self.exec(self.tmux.current_window(&self.session_name)).await?;
            self.first_window_free = false;
            tmux::parse_window(&output)?
        } else {
            let output = self
                .exec(self.tmux.new_window(&self.session_name, label, cwd, &command))
                .await?;
            tmux::parse_window(&output)?
        };

        let id = uuid::Uuid::new_v4().to_string();
        let WindowHandle { window, pane } = handle;
        let mut session = Session::new(id.clone(), label);
        session.window = window;
        session.pane = pane.clone();
        session.phase = SessionPhase::Alive;

        let (tx, _rx) = watch::channel(session);
        let monitor = tokio::spawn(monitor(
            self.runner.clone(),
            self.tmux.clone(),
            pane,
            tx.clone(),
        ));
        self.entries.push(Entry { tx, monitor });
        info!(session = %id, label, "terminal session opened");

        if self.layout.active_tab.is_none() {
            self.layout.active_tab = Some(id.clone());
        }
        self.apply_layout().await?;
        Ok(id)
    }

    fn entry(&self, id: &str) -> Result<&Entry, MuxError> {
        self.entries
            .iter()
            .find(|e| e.tx.borrow().id == id)
            .ok_or_else(|| MuxError::UnknownSession(id.to_string()))
    }

    pub fn subscribe(&self, id: &str) -> Option<watch::Receiver<Session>> {
        self.entry(id).ok().map(|e| e.tx.subscribe())
    }

    /// Current state of every session, in open order
    pub fn sessions(&self) -> Vec<Session> {
        self.entries.iter().map(Entry::session).collect()
    }

    /// Forward raw input bytes to a live session
    pub async fn send_input(&self, id: &str, bytes: &[u8]) -> Result<(), MuxError> {
        let session = self.entry(id)?.session();
        if !session.alive() {
            return Err(MuxError::NotFound(session.pane));
        }
        for chunk in bytes.chunks(SEND_CHUNK) {
            self.exec(self.tmux.send_keys_hex(&session.pane, chunk))
                .await?;
        }
        Ok(())
    }

    /// Current screen of a session's pane. Dead panes stay capturable
    /// under remain-on-exit.
    pub async fn capture(&self, id: &str) -> Result<Vec<String>, MuxError> {
        let session = self.entry(id)?.session();
        let output = self.exec(self.tmux.capture_pane(&session.pane)).await?;
        Ok(output.lines().map(str::to_string).collect())
    }

    /// Resize one session's pane
    pub async fn resize(&self, id: &str, size: Size) -> Result<(), MuxError> {
        let session = self.entry(id)?.session();
        self.exec(self.tmux.resize_pane(&session.pane, size))
            .await
            .map(|_| ())
    }

    /// Kill a session's window and wait until its exit is observable
    pub async fn close(&mut self, id: &str) -> Result<(), MuxError> {
        let position = self
            .entries
            .iter()
            .position(|e| e.tx.borrow().id == id)
            .ok_or_else(|| MuxError::UnknownSession(id.to_string()))?;

        // Dead panes linger under remain-on-exit, so the window is always killed
        let session = self.entries[position].session();
        match self.exec(self.tmux.kill_window(&session.window)).await {
            Ok(_) => {}
            Err(e) if e.is_terminal() => debug!(session = %id, error = %e, "window already gone"),
            Err(e) => return Err(e),
        }

        let entry = self.entries.remove(position);
        let mut rx = entry.tx.subscribe();
        let observed = matches!(
            tokio::time::timeout(CLOSE_TIMEOUT, rx.wait_for(|s| !s.alive())).await,
            Ok(Ok(_))
        );
        if !observed {
            warn!(session = %id, "monitor did not observe close in time");
            entry.tx.send_modify(|s| s.mark_exited(None));
        }
        entry.monitor.abort();
        info!(session = %id, "terminal session closed");

        if self.layout.active_tab.as_deref() == Some(id) {
            self.layout.active_tab = self
                .entries
                .iter()
                .map(Entry::session)
                .find(Session::alive)
                .map(|s| s.id);
        }
        self.apply_layout().await
    }

    pub async fn resize_layout(&mut self, total: Size) -> Result<(), MuxError> {
        self.layout.total = total;
        self.apply_layout().await
    }

    pub async fn toggle_zoom(&mut self, region: Zoom) -> Result<(), MuxError> {
        self.layout.toggle_zoom(region);
        self.apply_layout().await
    }

    pub async fn select_tab(&mut self, id: &str) -> Result<(), MuxError> {
        self.entry(id)?;
        self.layout.active_tab = Some(id.to_string());
        self.apply_layout().await
    }

    /// Size every live pane to the native region and show the active tab.
    /// Panes that vanished are left to their monitors.
    async fn apply_layout(&self) -> Result<(), MuxError> {
        let native = self.layout.native_size();
        let live: Vec<Session> = self
            .entries
            .iter()
            .map(Entry::session)
            .filter(Session::alive)
            .collect();

        if !native.is_empty() {
            for session in &live {
                let resized = match self
                    .exec(self.tmux.resize_window(&session.window, native))
                    .await
                {
                    Ok(_) => self.resize(&session.id, native).await,
                    Err(e) => Err(e),
                };
                match resized {
                    Ok(()) | Err(MuxError::NotFound(_)) => {}
                    Err(e) => return Err(e),
                }
            }
        }

        let active = self
            .layout
            .active_tab
            .as_deref()
            .and_then(|id| live.iter().find(|s| s.id == id));
        if let Some(session) = active {
            match self.exec(self.tmux.select_window(&session.window)).await {
                Ok(_) | Err(MuxError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Stop every monitor and tear down the hosting session
    pub async fn shutdown(&mut self) {
        for entry in self.entries.drain(..) {
            entry.tx.send_modify(|s| s.mark_exited(None));
            entry.monitor.abort();
        }
        if let Err(e) = self.exec(self.tmux.kill_session(&self.session_name)).await {
            debug!(error = %e, "tmux session teardown failed");
        }
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        for entry in &self.entries {
            entry.monitor.abort();
        }
    }
}

/// Poll one pane until it dies or its handle stops resolving
async fn monitor(
    runner: Arc<dyn CommandRunner>,
    tmux: Tmux,
    pane: String,
    tx: watch::Sender<Session>,
) {
    let mut ticker = tokio::time::interval(MONITOR_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut failing_since: Option<Instant> = None;

    loop {
        ticker.tick().await;
        if tx.borrow().exited() {
            return;
        }

        let polled = runner
            .run(TMUX, &tmux.pane_state(&pane))
            .await
            .map_err(MuxError::classify)
            .and_then(|output| tmux::parse_pane_state(&output));

        let exit = match polled {
            Ok(state) => {
                failing_since = None;
                state.dead.then_some(state.status)
            }
            Err(e) if e.is_terminal() => {
                debug!(pane = %pane, error = %e, "pane handle gone");
                Some(None)
            }
            Err(e) => {
                let since = *failing_since.get_or_insert_with(Instant::now);
                if since.elapsed() >= STALE_AFTER {
                    warn!(pane = %pane, error = %e, "pane unreachable, marking exited");
                    Some(None)
                } else {
                    None
                }
            }
        };

        if let Some(code) = exit {
            tx.send_modify(|s| s.mark_exited(code));
            let session = tx.borrow();
            info!(session = %session.id, code = session.exit_code, "terminal session exited");
            return;
        }
    }
}
