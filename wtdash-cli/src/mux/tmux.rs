//! tmux argument builders and output decoding.
//!
//! Everything runs on a dedicated server (`-L <socket>`) so the user's own
//! tmux sessions are never touched.

use std::path::Path;

use wtdash_core::session::Size;

use crate::exec::ExecError;

pub const TMUX: &str = "tmux";

/// Format printed when a window is created or looked up
const WINDOW_FORMAT: &str = "#{window_id} #{pane_id}";

/// Format printed by the pane monitor
const PANE_FORMAT: &str = "#{pane_dead} #{pane_dead_status}";

#[derive(Debug, thiserror::Error)]
pub enum MuxError {
    #[error("tmux target not found: {0}")]
    NotFound(String),

    #[error("tmux server is gone: {0}")]
    ServerGone(String),

    #[error("unknown session {0}")]
    UnknownSession(String),

    #[error("unexpected tmux output: {0:?}")]
    Parse(String),

    #[error(transparent)]
    Exec(#[from] ExecError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl MuxError {
    /// Sort a failed tmux call into not-found, server-gone or other
    pub fn classify(err: ExecError) -> Self {
        let stderr = err.stderr().to_lowercase();
        if stderr.contains("can't find") || stderr.contains("no such") {
            MuxError::NotFound(err.stderr().to_string())
        } else if stderr.contains("no server running")
            || stderr.contains("error connecting")
            || stderr.contains("server exited")
        {
            MuxError::ServerGone(err.stderr().to_string())
        } else {
            MuxError::Exec(err)
        }
    }

    /// The handle will never resolve again
    pub fn is_terminal(&self) -> bool {
        matches!(self, MuxError::NotFound(_) | MuxError::ServerGone(_))
    }
}

/// Window and pane handles of a freshly created window
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WindowHandle {
    pub window: String,
    pub pane: String,
}

pub fn parse_window(output: &str) -> Result<WindowHandle, MuxError> {
    let mut parts = output.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some(window), Some(pane)) if window.starts_with('@') && pane.starts_with('%') => {
            Ok(WindowHandle {
                window: window.to_string(),
                pane: pane.to_string(),
            })
        }
        _ => Err(MuxError::Parse(output.trim().to_string())),
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PaneState {
    pub dead: bool,
    /// Exit status of a dead pane; `None` when killed by a signal
    pub status: Option<i32>,
}

pub fn parse_pane_state(output: &str) -> Result<PaneState, MuxError> {
    let line = output.lines().next().unwrap_or_default();
    let mut parts = line.split_whitespace();
    let dead = match parts.next() {
        Some("1") => true,
        Some("0") => false,
        _ => return Err(MuxError::Parse(output.trim().to_string())),
    };
    let status = parts.next().and_then(|s| s.parse().ok());
    Ok(PaneState { dead, status })
}

/// Hex-encode bytes for `send-keys -H`
pub fn hex_keys(bytes: &[u8]) -> Vec<String> {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[derive(Clone, Debug)]
pub struct Tmux {
    socket: String,
}

impl Tmux {
    pub fn new(socket: impl Into<String>) -> Self {
        Self {
            socket: socket.into(),
        }
    }

    fn command(&self, parts: &[&str]) -> Vec<String> {
        let mut args = vec!["-L".to_string(), self.socket.clone()];
        args.extend(parts.iter().map(|s| s.to_string()));
        args
    }

    pub fn new_session(&self, session: &str, size: Size) -> Vec<String> {
        self.command(&[
            "new-session",
            "-d",
            "-s",
            session,
            "-x",
            &size.width.to_string(),
            "-y",
            &size.height.to_string(),
        ])
    }

    pub fn kill_session(&self, session: &str) -> Vec<String> {
        self.command(&["kill-session", "-t", session])
    }

    pub fn set_option(&self, name: &str, value: &str) -> Vec<String> {
        self.command(&["set-option", "-g", name, value])
    }

    /// Restart the session's current window with `command` in `cwd`
    pub fn respawn_pane(&self, session: &str, cwd: &Path, command: &[String]) -> Vec<String> {
        let target = format!("{session}:");
        let cwd = cwd.to_string_lossy();
        let mut args = self.command(&["respawn-pane", "-k", "-t", &target, "-c", &cwd]);
        args.extend(command.iter().cloned());
        args
    }

    pub fn rename_window(&self, session: &str, label: &str) -> Vec<String> {
        let target = format!("{session}:");
        self.command(&["rename-window", "-t", &target, label])
    }

    pub fn current_window(&self, session: &str) -> Vec<String> {
        let target = format!("{session}:");
        self.command(&["display-message", "-p", "-t", &target, WINDOW_FORMAT])
    }

    pub fn new_window(
        &self,
        session: &str,
        label: &str,
        cwd: &Path,
        command: &[String],
    ) -> Vec<String> {
        let target = format!("{session}:");
        let cwd = cwd.to_string_lossy();
        let mut args = self.command(&[
            "new-window",
            "-d",
            "-P",
            "-F",
            WINDOW_FORMAT,
            "-t",
            &target,
            "-n",
            label,
            "-c",
            &cwd,
        ]);
        args.extend(command.iter().cloned());
        args
    }

    pub fn pane_state(&self, pane: &str) -> Vec<String> {
        self.command(&["list-panes", "-t", pane, "-F", PANE_FORMAT])
    }

    /// Visible contents of a pane as plain text, one line per row
    pub fn capture_pane(&self, pane: &str) -> Vec<String> {
        self.command(&["capture-pane", "-p", "-t", pane])
    }

    pub fn send_keys_hex(&self, pane: &str, bytes: &[u8]) -> Vec<String> {
        let mut args = self.command(&["send-keys", "-t", pane, "-H"]);
        args.extend(hex_keys(bytes));
        args
    }

    pub fn resize_pane(&self, pane: &str, size: Size) -> Vec<String> {
        self.command(&[
            "resize-pane",
            "-t",
            pane,
            "-x",
            &size.width.to_string(),
            "-y",
            &size.height.to_string(),
        ])
    }

    pub fn resize_window(&self, window: &str, size: Size) -> Vec<String> {
        self.command(&[
            "resize-window",
            "-t",
            window,
            "-x",
            &size.width.to_string(),
            "-y",
            &size.height.to_string(),
        ])
    }

    pub fn kill_window(&self, window: &str) -> Vec<String> {
        self.command(&["kill-window", "-t", window])
    }

    pub fn select_window(&self, window: &str) -> Vec<String> {
        self.command(&["select-window", "-t", window])
    }

    pub fn attach(&self, session: &str) -> Vec<String> {
        self.command(&["attach-session", "-t", session])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failed(stderr: &str) -> ExecError {
        ExecError::Failed {
            program: TMUX.into(),
            code: Some(1),
            stderr: stderr.into(),
        }
    }

    #[test]
    fn test_classify() {
        assert!(matches!(
            MuxError::classify(failed("can't find pane: %9")),
            MuxError::NotFound(_)
        ));
        assert!(matches!(
            MuxError::classify(failed("no server running on /tmp/tmux-0/wtdash")),
            MuxError::ServerGone(_)
        ));
        assert!(matches!(
            MuxError::classify(failed("error connecting to /tmp/tmux-0/wtdash")),
            MuxError::ServerGone(_)
        ));
        let other = MuxError::classify(failed("resource temporarily unavailable"));
        assert!(matches!(other, MuxError::Exec(_)));
        assert!(!other.is_terminal());
    }

    #[test]
    fn test_parse_window() {
        let handle = parse_window("@3 %7\n").unwrap();
        assert_eq!(handle.window, "@3");
        assert_eq!(handle.pane, "%7");
        assert!(parse_window("").is_err());
        assert!(parse_window("3 7").is_err());
    }

    #[test]
    fn test_parse_pane_state() {
        assert_eq!(
            parse_pane_state("0 \n").unwrap(),
            PaneState {
                dead: false,
                status: None
            }
        );
        assert_eq!(
            parse_pane_state("1 130\n").unwrap(),
            PaneState {
                dead: true,
                status: Some(130)
            }
        );
        assert!(parse_pane_state("garbage").is_err());
    }

    #[test]
    fn test_new_window_args() {
        let tmux = Tmux::new("wtdash");
        let args = tmux.new_window("wtdash", "feat", Path::new("/trees/feat"), &["zsh".into()]);
        assert_eq!(
            args,
            vec![
                "-L",
                "wtdash",
                "new-window",
                "-d",
                "-P",
                "-F",
                "#{window_id} #{pane_id}",
                "-t",
                "wtdash:",
                "-n",
                "feat",
                "-c",
                "/trees/feat",
                "zsh",
            ]
        );
    }

    #[test]
    fn test_send_keys_hex() {
        let tmux = Tmux::new("s");
        assert_eq!(
            tmux.send_keys_hex("%1", b"ls\n"),
            vec!["-L", "s", "send-keys", "-t", "%1", "-H", "6c", "73", "0a"]
        );
    }

    #[test]
    fn test_resize_pane_args() {
        let tmux = Tmux::new("s");
        assert_eq!(
            tmux.resize_pane("%2", Size::new(80, 24)),
            vec!["-L", "s", "resize-pane", "-t", "%2", "-x", "80", "-y", "24"]
        );
    }
}
