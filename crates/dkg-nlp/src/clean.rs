//! Raw text cleanup applied before coreference resolution
//!
//! Encyclopedia-style articles carry layout artifacts that confuse both the
//! coreference model and the parser: paragraph breaks without terminal
//! punctuation, citation markers, parenthetical asides (pronunciations,
//! dates of birth) and sentences glued together after a period.

use dkg_core::CleanupConfig;
use regex::Regex;

use crate::{NlpError, Result};

/// Deterministic text normalizer
#[derive(Debug, Clone)]
pub struct TextCleaner {
    config: CleanupConfig,
    newlines: Regex,
    reference_markers: Regex,
    parentheticals: Regex,
}

impl TextCleaner {
    /// Build a cleaner for the given step selection
    pub fn new(config: CleanupConfig) -> Result<Self> {
        Ok(Self {
            config,
            newlines: compile(r"\n+")?,
            reference_markers: compile(r"\[\d+\]")?,
            parentheticals: compile(r"\([^()]*\)")?,
        })
    }

    /// Apply the enabled cleanup steps in order
    pub fn clean(&self, text: &str) -> String {
        let mut text = text.to_string();

        if self.config.collapse_newlines {
            text = self.newlines.replace_all(&text, ". ").into_owned();
        }
        if self.config.strip_reference_markers {
            text = self.reference_markers.replace_all(&text, " ").into_owned();
        }
        if self.config.strip_parentheticals {
            text = self.parentheticals.replace_all(&text, " ").into_owned();
        }
        if self.config.fix_punctuation_spacing {
            text = space_after_punctuation(&text);
        }

        text
    }
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| NlpError::Pattern(e.to_string()))
}

/// Insert a space after `.` or `,` when the next character is neither
/// whitespace nor a digit, so `1.5` and `10,000` survive.
fn space_after_punctuation(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + text.len() / 16);
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        out.push(c);
        if matches!(c, '.' | ',') {
            if let Some(next) = chars.peek() {
                if !next.is_whitespace() && !next.is_ascii_digit() {
                    out.push(' ');
                }
            }
        }
    }

    out
}
