//! Dashboard colour themes.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
    Paper,
    Windows31,
}

/// Colours and fonts used to render a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Palette {
    pub background: &'static str,
    pub surface: &'static str,
    pub text: &'static str,
    pub muted: &'static str,
    pub primary: &'static str,
    pub success: &'static str,
    pub error: &'static str,
    pub warning: &'static str,
    pub font_family: &'static str,
    pub radius_px: u8,
}

const SANS: &str = r#""Inter", "Roboto", "Helvetica", "Arial", sans-serif"#;

impl Theme {
    pub const ALL: [Theme; 4] = [Theme::Light, Theme::Dark, Theme::Paper, Theme::Windows31];

    pub fn name(self) -> &'static str {
        match self {
            Theme::Light => "light",
            Theme::Dark => "dark",
            Theme::Paper => "paper",
            Theme::Windows31 => "windows31",
        }
    }

    pub fn palette(self) -> Palette {
        match self {
            Theme::Light => Palette {
                background: "#f9fafc",
                surface: "#ffffff",
                text: "#0f172a",
                muted: "#64748b",
                primary: "#1e6aff",
                success: "#10b981",
                error: "#f04a63",
                warning: "#ff9914",
                font_family: SANS,
                radius_px: 12,
            },
            Theme::Dark => Palette {
                background: "#0f172a",
                surface: "#1a253a",
                text: "#f8fafc",
                muted: "#94a3b8",
                primary: "#4f86ff",
                success: "#32d583",
                error: "#ff4d6d",
                warning: "#ffad33",
                font_family: SANS,
                radius_px: 12,
            },
            Theme::Paper => Palette {
                background: "#FAF6E9",
                surface: "#FFFBF0",
                text: "#2D3748",
                muted: "#718096",
                primary: "#FF6B6B",
                success: "#66BB6A",
                error: "#FF5252",
                warning: "#FFB746",
                font_family: r#""Comic Neue", "Marker Felt", cursive, sans-serif"#,
                radius_px: 16,
            },
            Theme::Windows31 => Palette {
                background: "#C0C0C0",
                surface: "#FFFFFF",
                text: "#000000",
                muted: "#333333",
                primary: "#000080",
                success: "#008000",
                error: "#FF0000",
                warning: "#FF8000",
                font_family: r#""MS Sans Serif", "Microsoft Sans Serif", sans-serif"#,
                radius_px: 0,
            },
        }
    }

    /// CSS custom properties for the page root.
    pub fn css_vars(self) -> String {
        let p = self.palette();
        format!(
            ":root {{ --bg: {}; --surface: {}; --text: {}; --muted: {}; --primary: {}; \
             --success: {}; --error: {}; --warning: {}; --font: {}; --radius: {}px; }}",
            p.background,
            p.surface,
            p.text,
            p.muted,
            p.primary,
            p.success,
            p.error,
            p.warning,
            p.font_family,
            p.radius_px
        )
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown theme: {0}")]
pub struct UnknownTheme(pub String);

impl FromStr for Theme {
    type Err = UnknownTheme;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Theme::ALL
            .into_iter()
            .find(|t| t.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownTheme(s.to_string()))
    }
}
