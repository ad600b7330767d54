//! UI Theme Module - Consistent color palette and style helpers
//!
//! Palette tokens rather than hard-coded colors, plus helpers that map
//! environment and service state onto icons and styles.

use ratatui::style::{Color, Modifier, Style};

use wtdash_core::model::{Environment, Health, ServiceStatus};
use wtdash_core::session::Session;

/// Color palette tokens for the theme
#[derive(Clone, Debug)]
pub struct Palette {
    /// Panel border color
    pub panel_border: Color,
    /// Primary text color
    pub text: Color,
    /// Dimmed text (secondary info)
    pub text_dim: Color,
    /// Muted text (tertiary info, absent)
    pub text_muted: Color,
    /// Accent color (highlights, focus)
    pub accent: Color,
    /// Running, healthy
    pub success: Color,
    /// Starting, stopped container
    pub warn: Color,
    /// Failed
    pub error: Color,
    /// Host processes
    pub info: Color,
    pub selection_bg: Color,
    pub selection_fg: Color,
    pub key_hint: Color,
}

impl Default for Palette {
    fn default() -> Self {
        Self::dark()
    }
}

impl Palette {
    /// VS Code-esque dark theme
    pub fn dark() -> Self {
        Self {
            panel_border: Color::Rgb(60, 60, 60),
            text: Color::Rgb(212, 212, 212),
            text_dim: Color::Rgb(150, 150, 150),
            text_muted: Color::Rgb(100, 100, 100),
            accent: Color::Rgb(79, 193, 255),      // Light blue
            success: Color::Rgb(78, 201, 176),     // Teal green
            warn: Color::Rgb(220, 180, 100),       // Amber
            error: Color::Rgb(244, 135, 113),      // Coral red
            info: Color::Rgb(156, 220, 254),       // Light cyan
            selection_bg: Color::Rgb(38, 79, 120), // Dark blue
            selection_fg: Color::White,
            key_hint: Color::Rgb(206, 145, 120), // Soft orange
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct Theme {
    pub palette: Palette,
}

impl Theme {
    /// Icon for an environment's combined kind and runtime state
    pub fn env_icon(&self, env: &Environment) -> &'static str {
        match env.sort_rank() {
            0 if env.observed.health == Health::Starting => "◐",
            0 | 1 => "●",
            2 => "◌",
            3 => "○",
            _ => "·",
        }
    }

    pub fn env_style(&self, env: &Environment) -> Style {
        let color = match env.sort_rank() {
            0 if env.observed.health == Health::Starting => self.palette.warn,
            0 => self.palette.success,
            1 => self.palette.info,
            2 => self.palette.warn,
            3 => self.palette.text_dim,
            _ => self.palette.text_muted,
        };
        Style::default().fg(color)
    }

    /// Style for process-manager service status
    pub fn service_style(&self, status: ServiceStatus) -> Style {
        let color = match status {
            ServiceStatus::Online => self.palette.success,
            ServiceStatus::Stopped => self.palette.error,
            ServiceStatus::Unknown => self.palette.text_muted,
        };
        Style::default().fg(color)
    }

    /// Session tab in the footer; exited sessions keep their tab until closed
    pub fn tab_style(&self, session: &Session, active: bool) -> Style {
        if active {
            self.selection_style()
        } else if session.exited() {
            Style::default().fg(self.palette.error)
        } else {
            self.text_dim_style()
        }
    }

    pub fn error_style(&self) -> Style {
        Style::default().fg(self.palette.error)
    }

    /// Style for key hints in footer
    pub fn key_hint_style(&self) -> Style {
        Style::default().fg(self.palette.key_hint)
    }

    pub fn border_style(&self) -> Style {
        Style::default().fg(self.palette.panel_border)
    }

    /// Style for selected rows
    pub fn selection_style(&self) -> Style {
        Style::default()
            .bg(self.palette.selection_bg)
            .fg(self.palette.selection_fg)
            .add_modifier(Modifier::BOLD)
    }

    pub fn header_style(&self) -> Style {
        Style::default()
            .fg(self.palette.accent)
            .add_modifier(Modifier::BOLD)
    }

    pub fn text_style(&self) -> Style {
        Style::default().fg(self.palette.text)
    }

    pub fn text_dim_style(&self) -> Style {
        Style::default().fg(self.palette.text_dim)
    }
}

static DEFAULT_THEME: std::sync::OnceLock<Theme> = std::sync::OnceLock::new();

pub fn theme() -> &'static Theme {
    DEFAULT_THEME.get_or_init(Theme::default)
}
