//! Row format mini-language.
//!
//! A format string such as `%p%t%c%t%r%n` is parsed once into a
//! [`FormatProgram`] and then expanded for every instruction into colored
//! text runs (see [`FormatProgram::render_row`]).
//!
//! | token | expands to                                   |
//! |-------|----------------------------------------------|
//! | `%p`  | absolute position, 8 hex digits and a space  |
//! | `%P`  | position relative to the decode base         |
//! | `%x`  | raw instruction bytes as hex pairs           |
//! | `%c`  | mnemonic                                     |
//! | `%r`  | operands                                     |
//! | `%t`  | jump to the next tab column                  |
//! | `%n`  | line feed                                    |
//! | `%%`  | a literal `%`                                |

mod render;

pub use self::render::*;

use std::fmt;
use std::str::FromStr;

/// Default row layout: position, opcode and operands on tab columns.
pub const DEFAULT_FORMAT: &str = "%p%t%c%t%r%n";

/// One element of a parsed format string
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatToken {
    Literal(char),
    Position,
    RelativePosition,
    RawHex,
    Mnemonic,
    Operands,
    TabStop,
    Newline,
    PercentLiteral,
}

impl FormatToken {
    fn from_letter(c: char) -> Option<Self> {
        Some(match c {
            'p' => FormatToken::Position,
            'P' => FormatToken::RelativePosition,
            'x' => FormatToken::RawHex,
            'c' => FormatToken::Mnemonic,
            'r' => FormatToken::Operands,
            't' => FormatToken::TabStop,
            'n' => FormatToken::Newline,
            '%' => FormatToken::PercentLiteral,
            _ => return None,
        })
    }
}

/// Errors raised while parsing a format string
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormatError {
    #[error("unknown format token '%{token}' at offset {offset}")]
    UnknownToken { token: char, offset: usize },
}

/// A parsed format string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatProgram {
    source: String,
    tokens: Vec<FormatToken>,
}

impl FormatProgram {
    /// Parse `source` into tokens. A lone `%` at the very end is dropped.
    pub fn parse(source: &str) -> Result<Self, FormatError> {
        let mut tokens = Vec::with_capacity(source.len());
        let mut chars = source.char_indices();

        while let Some((offset, c)) = chars.next() {
            if c != '%' {
                tokens.push(FormatToken::Literal(c));
                continue;
            }

            match chars.next() {
                Some((_, letter)) => match FormatToken::from_letter(letter) {
                    Some(token) => tokens.push(token),
                    None => return Err(FormatError::UnknownToken { token: letter, offset }),
                },
                None => {
                    log::debug!("dropping trailing '%' in format string {:?}", source);
                }
            }
        }

        Ok(Self {
            source: source.to_string(),
            tokens,
        })
    }

    pub fn tokens(&self) -> &[FormatToken] {
        &self.tokens
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}

impl Default for FormatProgram {
    fn default() -> Self {
        Self::parse(DEFAULT_FORMAT).expect("default format string is valid")
    }
}

impl FromStr for FormatProgram {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for FormatProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.source)
    }
}
