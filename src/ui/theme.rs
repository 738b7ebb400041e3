//! Color decisions for human output
//!
//! Status lines go to stdout and diagnostics to stderr; each stream gets its
//! own color decision.

use owo_colors::Style;
use std::sync::OnceLock;

/// What a piece of output means, independent of how it is drawn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Title,
    Done,
    Failure,
    Notice,
    Key,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Theme {
    color: bool,
}

impl Theme {
    pub fn new(color: bool) -> Self {
        Self { color }
    }

    /// Follows console's terminal and `CLICOLOR` detection for `stream`
    pub fn detect(stream: Stream) -> Self {
        match stream {
            Stream::Stdout => Self::new(console::colors_enabled()),
            Stream::Stderr => Self::new(console::colors_enabled_stderr()),
        }
    }

    pub fn is_colored(&self) -> bool {
        self.color
    }

    pub fn style(&self, role: Role) -> Style {
        if !self.color {
            return Style::new();
        }
        match role {
            Role::Title => Style::new().cyan().bold(),
            Role::Done => Style::new().green().bold(),
            Role::Failure => Style::new().red().bold(),
            Role::Notice => Style::new().yellow(),
            Role::Key => Style::new().dimmed(),
        }
    }
}

pub fn theme(stream: Stream) -> Theme {
    static STDOUT: OnceLock<Theme> = OnceLock::new();
    static STDERR: OnceLock<Theme> = OnceLock::new();

    let cell = match stream {
        Stream::Stdout => &STDOUT,
        Stream::Stderr => &STDERR,
    };
    *cell.get_or_init(|| Theme::detect(stream))
}
