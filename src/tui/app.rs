//! Inline button screen and its event loop

use anyhow::Result;
use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind, MouseButton,
    MouseEventKind,
};
use crossterm::execute;
use ratatui::layout::{Position, Rect};
use ratatui::style::{Color, Style};
use ratatui::text::Line;
use ratatui::widgets::Paragraph;
use ratatui::{DefaultTerminal, TerminalOptions, Viewport};
use std::io::stdout;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Duration;

use super::button::LoginButton;

/// Target frame rate for UI updates (~30 fps)
const FRAME_DURATION_MS: u64 = 33;

const HINT: &str = "Enter, Space or click to sign in, q to quit";

/// How the button screen ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The button was activated; the caller starts the sign-in.
    Activated,
    Cancelled,
}

struct ButtonScreen<'a> {
    button: LoginButton<'a>,
    /// Where the button was last drawn, for mouse hit testing
    button_area: Rect,
    outcome: Option<Outcome>,
}

impl<'a> ButtonScreen<'a> {
    fn new(button: LoginButton<'a>) -> Self {
        Self {
            button: button.focused(true),
            button_area: Rect::default(),
            outcome: None,
        }
    }

    fn handle_event(&mut self, event: Event) {
        match event {
            Event::Key(key) if key.kind == KeyEventKind::Press => match key.code {
                KeyCode::Enter | KeyCode::Char(' ') => self.outcome = Some(Outcome::Activated),
                KeyCode::Char('q') | KeyCode::Esc => self.outcome = Some(Outcome::Cancelled),
                _ => {}
            },
            Event::Mouse(mouse) if mouse.kind == MouseEventKind::Down(MouseButton::Left) => {
                if self
                    .button_area
                    .contains(Position::new(mouse.column, mouse.row))
                {
                    self.outcome = Some(Outcome::Activated);
                }
            }
            _ => {}
        }
    }

    fn render(&mut self, frame: &mut ratatui::Frame) {
        let area = frame.area();
        self.button_area = Rect {
            width: self.button.width().min(area.width),
            height: LoginButton::HEIGHT.min(area.height),
            ..area
        };
        frame.render_widget(self.button.clone(), self.button_area);

        if area.height > LoginButton::HEIGHT {
            let hint = Rect {
                y: area.y + LoginButton::HEIGHT,
                height: 1,
                ..area
            };
            frame.render_widget(
                Paragraph::new(Line::styled(HINT, Style::default().fg(Color::DarkGray))),
                hint,
            );
        }
    }
}

/// Show `button` inline until it is activated or dismissed.
///
/// The terminal is restored before returning, also when drawing panics.
pub fn run(button: LoginButton<'_>) -> Result<Outcome> {
    let mut terminal = ratatui::try_init_with_options(TerminalOptions {
        viewport: Viewport::Inline(LoginButton::HEIGHT + 1),
    })?;
    let mut screen = ButtonScreen::new(button);
    let result = catch_unwind(AssertUnwindSafe(|| -> Result<Outcome> {
        execute!(stdout(), EnableMouseCapture)?;
        run_screen(&mut terminal, &mut screen)
    }));
    let _ = execute!(stdout(), DisableMouseCapture);
    ratatui::restore();
    println!();

    match result {
        Ok(r) => r,
        Err(e) => std::panic::resume_unwind(e),
    }
}

fn run_screen(terminal: &mut DefaultTerminal, screen: &mut ButtonScreen<'_>) -> Result<Outcome> {
    loop {
        terminal.draw(|frame| screen.render(frame))?;
        if event::poll(Duration::from_millis(FRAME_DURATION_MS))? {
            screen.handle_event(event::read()?);
        }
        if let Some(outcome) = screen.outcome {
            return Ok(outcome);
        }
    }
}
