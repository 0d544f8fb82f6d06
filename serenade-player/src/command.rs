/// Keyboard commands read from stdin, one per line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// `p` or an empty line
    Toggle,
    /// `r`: reload the lyrics and play from the top
    Replay,
    /// `o`: reload the lyrics without playing
    Reopen,
    /// `c`: close the player
    Close,
    /// `s`: print the current view
    Status,
    Help,
    Quit,
}

impl Command {
    /// Parse a line of user input. Returns `None` for unknown input.
    #[must_use]
    pub fn parse(input: &str) -> Option<Self> {
        let command = match input.trim().to_ascii_lowercase().as_str() {
            "" | "p" | "play" | "pause" => Self::Toggle,
            "r" | "replay" => Self::Replay,
            "o" | "open" => Self::Reopen,
            "c" | "close" => Self::Close,
            "s" | "status" => Self::Status,
            "h" | "?" | "help" => Self::Help,
            "q" | "quit" | "exit" => Self::Quit,
            _ => return None,
        };
        Some(command)
    }
}

pub const HELP: &str = "\
Commands:
  p / Enter  play or pause
  r          replay from the first line
  o          reload lyrics
  c          close
  s          show status
  q          quit (Ctrl+C also works)";
