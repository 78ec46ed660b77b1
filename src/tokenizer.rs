//! Splits raw chat text into a command-recognition result.
//!
//! Tokenization is a pure function of the text and the configured prefix:
//! no registry lookup happens here, so unknown commands still tokenize as
//! commands and are simply ignored by the dispatcher.

/// Result of tokenizing one chat line against the command prefix.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TokenBin {
    pub is_command: bool,
    /// Lower-cased command name. Empty when `is_command` is false.
    pub command: String,
    /// Arguments in message order, case preserved.
    pub args: Vec<String>,
}

impl TokenBin {
    fn not_command() -> Self {
        Self::default()
    }
}

/// Tokenizes `text` against `prefix`.
///
/// The prefix test is case-insensitive and anchored at the start of the text.
/// The remainder is split on whitespace, tolerating runs of separators; the
/// first token is lower-cased as the command name, the rest are arguments.
/// A prefix with nothing after it is not a command.
pub fn tokenize(text: &str, prefix: &str) -> TokenBin {
    if prefix.is_empty()
        || text.len() < prefix.len()
        || !text.is_char_boundary(prefix.len())
        || !text[..prefix.len()].eq_ignore_ascii_case(prefix)
    {
        return TokenBin::not_command();
    }

    let mut parts = text[prefix.len()..].split_whitespace();
    let command = match parts.next() {
        Some(first) => first.to_lowercase(),
        None => return TokenBin::not_command(),
    };

    TokenBin {
        is_command: true,
        command,
        args: parts.map(str::to_string).collect(),
    }
}
