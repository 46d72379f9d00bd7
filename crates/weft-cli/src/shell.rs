// SPDX-License-Identifier: AGPL-3.0-only

//! Console line classification.

use weft_engine::Command;

/// What one console line means.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// A control command (`/quit`, `/stop`, `/reset`).
    Control(Command),
    /// A generation prompt.
    Prompt(String),
    /// Blank line, nothing to do.
    Empty,
}

/// Classify a console line.
///
/// Unknown slash-words are treated as prompts, matching the legacy console.
pub fn classify(line: &str) -> Input {
    let trimmed = line.trim_end_matches(['\r', '\n']);
    match trimmed {
        "" => Input::Empty,
        "/quit" => Input::Control(Command::Shutdown),
        "/stop" => Input::Control(Command::Stop),
        "/reset" => Input::Control(Command::Reset),
        other => Input::Prompt(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_map_to_controls() {
        assert_eq!(classify("/quit"), Input::Control(Command::Shutdown));
        assert_eq!(classify("/stop"), Input::Control(Command::Stop));
        assert_eq!(classify("/reset"), Input::Control(Command::Reset));
    }

    #[test]
    fn text_becomes_prompt() {
        assert_eq!(
            classify("tell me a story"),
            Input::Prompt("tell me a story".to_string())
        );
    }

    #[test]
    fn unknown_slash_word_is_a_prompt() {
        assert_eq!(classify("/frobnicate"), Input::Prompt("/frobnicate".to_string()));
    }

    #[test]
    fn blank_lines_are_empty() {
        assert_eq!(classify(""), Input::Empty);
        assert_eq!(classify("\n"), Input::Empty);
        assert_eq!(classify("\r\n"), Input::Empty);
    }
}
