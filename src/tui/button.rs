//! "Sign in with Microsoft" button widget

use ratatui::{
    buffer::Buffer,
    layout::{Alignment, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Widget},
};
use serde::{Deserialize, Serialize};

const LOGO_RED: Color = Color::Rgb(0xF2, 0x50, 0x22);
const LOGO_GREEN: Color = Color::Rgb(0x7F, 0xBA, 0x00);
const LOGO_BLUE: Color = Color::Rgb(0x00, 0xA4, 0xEF);
const LOGO_YELLOW: Color = Color::Rgb(0xFF, 0xB9, 0x00);

/// Visual theme of the default button face
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum ButtonTheme {
    #[default]
    Light,
    Dark,
    #[value(name = "light_short")]
    LightShort,
    #[value(name = "dark_short")]
    DarkShort,
}

struct Palette {
    background: Color,
    text: Color,
    border: Color,
}

impl ButtonTheme {
    pub fn label(&self) -> &'static str {
        match self {
            ButtonTheme::Light | ButtonTheme::Dark => "Sign in with Microsoft",
            ButtonTheme::LightShort | ButtonTheme::DarkShort => "Sign in",
        }
    }

    fn palette(&self) -> Palette {
        match self {
            ButtonTheme::Light | ButtonTheme::LightShort => Palette {
                background: Color::Rgb(0xFF, 0xFF, 0xFF),
                text: Color::Rgb(0x5E, 0x5E, 0x5E),
                border: Color::Rgb(0x8C, 0x8C, 0x8C),
            },
            ButtonTheme::Dark | ButtonTheme::DarkShort => Palette {
                background: Color::Rgb(0x2F, 0x2F, 0x2F),
                text: Color::Rgb(0xFF, 0xFF, 0xFF),
                border: Color::Rgb(0x2F, 0x2F, 0x2F),
            },
        }
    }
}

/// What the button shows
#[derive(Debug, Clone, Default)]
pub enum ButtonContent<'a> {
    /// Themed logo and label
    #[default]
    Default,
    /// Caller-supplied content, shown without the themed face
    Custom(Line<'a>),
}

/// The sign-in control. Activation is handled by whoever owns the area.
#[derive(Debug, Clone)]
pub struct LoginButton<'a> {
    theme: ButtonTheme,
    content: ButtonContent<'a>,
    class_name: Option<&'a str>,
    focused: bool,
}

impl<'a> LoginButton<'a> {
    /// Rows taken by the button, borders included.
    pub const HEIGHT: u16 = 3;

    pub fn new(theme: ButtonTheme) -> Self {
        Self {
            theme,
            content: ButtonContent::Default,
            class_name: None,
            focused: false,
        }
    }

    pub fn content(mut self, content: ButtonContent<'a>) -> Self {
        self.content = content;
        self
    }

    pub fn class_name(mut self, class_name: Option<&'a str>) -> Self {
        self.class_name = class_name;
        self
    }

    pub fn focused(mut self, focused: bool) -> Self {
        self.focused = focused;
        self
    }

    /// Columns the button needs to show its content unclipped.
    pub fn width(&self) -> u16 {
        let content = match &self.content {
            // logo (2) + space + label
            ButtonContent::Default => 3 + self.theme.label().chars().count(),
            ButtonContent::Custom(line) => line.width(),
        };
        // padding (2 each side) + borders
        (content + 6).min(u16::MAX as usize) as u16
    }

    fn face(&self) -> Line<'static> {
        let palette = self.theme.palette();
        let mut text = Style::default().fg(palette.text).bg(palette.background);
        if self.focused {
            text = text.add_modifier(Modifier::BOLD);
        }
        Line::from(vec![
            // Upper half-blocks draw the four squares of the logo in two cells.
            Span::styled("▀", Style::default().fg(LOGO_RED).bg(LOGO_BLUE)),
            Span::styled("▀", Style::default().fg(LOGO_GREEN).bg(LOGO_YELLOW)),
            Span::styled(" ", text),
            Span::styled(self.theme.label(), text),
        ])
    }
}

impl Widget for LoginButton<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let mut block = Block::default().borders(Borders::ALL);
        if let Some(title) = self.class_name {
            block = block.title(format!(" {} ", title));
        }

        let line = match &self.content {
            ButtonContent::Default => {
                let palette = self.theme.palette();
                let mut border = Style::default().fg(palette.border).bg(palette.background);
                if self.focused {
                    border = border.add_modifier(Modifier::BOLD);
                }
                block = block
                    .border_style(border)
                    .style(Style::default().bg(palette.background));
                self.face()
            }
            ButtonContent::Custom(line) => line.clone(),
        };

        let inner = block.inner(area);
        block.render(area, buf);
        Paragraph::new(line)
            .alignment(Alignment::Center)
            .render(inner, buf);
    }
}
