use crate::config::ColorChoice;
use is_terminal::IsTerminal;
use owo_colors::{OwoColorize, Style};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Time,
    DeviceLine,
    DeviceId,
    DeviceName,
    SynReport,
    Failure,
    Key,
    Rel,
    Abs,
    Other,
}

impl Role {
    fn style(self) -> Style {
        match self {
            Role::Time => Style::new().green(),
            Role::DeviceLine => Style::new().cyan(),
            Role::DeviceId => Style::new().bright_yellow(),
            Role::DeviceName => Style::new().bright_green(),
            Role::SynReport => Style::new().bright_black(),
            Role::Failure => Style::new().bright_red(),
            Role::Key => Style::new().bright_cyan().bold(),
            Role::Rel => Style::new().bright_yellow().bold(),
            Role::Abs => Style::new().bright_magenta().bold(),
            Role::Other => Style::new().cyan(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Palette {
    enabled: bool,
}

impl Palette {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    /// `--color` wins over `--no-color`, which wins over the config file.
    pub fn resolve(force: bool, disable: bool, choice: ColorChoice) -> Self {
        let enabled = if force {
            true
        } else if disable {
            false
        } else {
            match choice {
                ColorChoice::Always => true,
                ColorChoice::Never => false,
                ColorChoice::Auto => std::io::stdout().is_terminal(),
            }
        };
        Self::new(enabled)
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn paint(&self, role: Role, text: &str) -> String {
        if self.enabled {
            text.style(role.style()).to_string()
        } else {
            text.to_string()
        }
    }
}
