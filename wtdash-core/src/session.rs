//! Terminal session and pane layout types.
//!
//! Sessions live in an external multiplexer. The handles stored here are
//! names the multiplexer hands back and can stop resolving at any time.

use serde::Serialize;

/// Exit code of a session whose exit status is not known
pub const UNKNOWN_EXIT: i32 = -1;

pub type SessionId = String;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionPhase {
    #[default]
    Starting,
    Alive,
    Exited,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Session {
    pub id: SessionId,
    pub label: String,
    pub phase: SessionPhase,
    pub exit_code: i32,
    /// Multiplexer window id, e.g. `@3`
    pub window: String,
    /// Multiplexer pane id, e.g. `%7`
    pub pane: String,
}

impl Session {
    pub fn new(id: SessionId, label: impl Into<String>) -> Self {
        Self {
            id,
            label: label.into(),
            phase: SessionPhase::Starting,
            exit_code: UNKNOWN_EXIT,
            window: String::new(),
            pane: String::new(),
        }
    }

    pub fn alive(&self) -> bool {
        self.phase == SessionPhase::Alive
    }

    pub fn exited(&self) -> bool {
        self.phase == SessionPhase::Exited
    }

    /// Move to `Exited`; a known code replaces an unknown one but never the
    /// other way round.
    pub fn mark_exited(&mut self, code: Option<i32>) {
        self.phase = SessionPhase::Exited;
        if let Some(code) = code {
            self.exit_code = code;
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Zoom {
    #[default]
    None,
    /// Control region fills the screen
    Control,
    /// Native region fills the screen
    Native,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Size {
    pub width: u16,
    pub height: u16,
}

impl Size {
    pub fn new(width: u16, height: u16) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Width of the divider between the two regions
const DIVIDER: u16 = 1;

/// Two-region screen layout: the control region on the left, the native
/// terminal region on the right.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PaneLayout {
    pub total: Size,
    pub control_width: u16,
    pub zoom: Zoom,
    pub active_tab: Option<SessionId>,
}

impl PaneLayout {
    pub fn new(total: Size, control_width: u16) -> Self {
        Self {
            total,
            control_width,
            zoom: Zoom::None,
            active_tab: None,
        }
    }

    /// Size of the native region under the current zoom
    pub fn native_size(&self) -> Size {
        match self.zoom {
            Zoom::Native => self.total,
            Zoom::Control => Size::new(0, 0),
            Zoom::None => {
                let used = self.control_width.saturating_add(DIVIDER);
                Size::new(self.total.width.saturating_sub(used), self.total.height)
            }
        }
    }

    /// Size of the control region under the current zoom
    pub fn control_size(&self) -> Size {
        match self.zoom {
            Zoom::Control => self.total,
            Zoom::Native => Size::new(0, 0),
            Zoom::None => Size::new(self.control_width.min(self.total.width), self.total.height),
        }
    }

    /// Zoom `region`, or unzoom when it already fills the screen
    pub fn toggle_zoom(&mut self, region: Zoom) {
        self.zoom = if self.zoom == region { Zoom::None } else { region };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_session_defaults() {
        let session = Session::new("s1".into(), "feat");
        assert_eq!(session.phase, SessionPhase::Starting);
        assert_eq!(session.exit_code, UNKNOWN_EXIT);
        assert!(!session.alive());
    }

    #[test]
    fn test_mark_exited_keeps_known_code() {
        let mut session = Session::new("s1".into(), "feat");
        session.mark_exited(Some(3));
        session.mark_exited(None);
        assert!(session.exited());
        assert_eq!(session.exit_code, 3);
    }

    #[test]
    fn test_native_size_follows_zoom() {
        let mut layout = PaneLayout::new(Size::new(200, 50), 48);
        assert_eq!(layout.native_size(), Size::new(151, 50));
        assert_eq!(layout.control_size(), Size::new(48, 50));

        layout.toggle_zoom(Zoom::Native);
        assert_eq!(layout.native_size(), Size::new(200, 50));
        assert_eq!(layout.control_size(), Size::new(0, 0));

        layout.toggle_zoom(Zoom::Native);
        assert_eq!(layout.zoom, Zoom::None);

        layout.toggle_zoom(Zoom::Control);
        assert!(layout.native_size().is_empty());
    }

    #[test]
    fn test_narrow_screen_saturates() {
        let layout = PaneLayout::new(Size::new(30, 10), 48);
        assert_eq!(layout.native_size(), Size::new(0, 10));
        assert_eq!(layout.control_size(), Size::new(30, 10));
    }
}
