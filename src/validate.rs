use std::borrow::Cow;
use std::collections::BTreeSet;

use rustyline::completion::{Completer, Pair};
use rustyline::highlight::{CmdKind, Highlighter};
use rustyline::hint::Hinter;
use rustyline::validate::{ValidationContext, ValidationResult, Validator};
use rustyline::{Context, Helper, Result};

use crate::context::ParserContext;
use crate::cycle::Parser;
use crate::multiline;
use crate::parser::MiniParser;

/// Words offered by tab-completion before any user definitions exist.
const KEYWORDS: &[&str] = &[
    "and", "break", "class", "def", "do", "else", "elsif", "end", "false", "if", "next", "nil",
    "not", "or", "p", "print", "puts", "raise", "return", "self", "then", "true", "unless",
    "until", "while",
];

/// The rustyline helper for the REPL.
///
/// Keeps reading continuation lines while the buffer is syntactically open,
/// and completes keywords plus names the host registers.
pub struct SourceValidator {
    context: ParserContext,
    /// Names defined by the running program, synced before each readline.
    pub known_words: BTreeSet<String>,
}

impl Default for SourceValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceValidator {
    pub fn new() -> Self {
        Self::with_context(ParserContext::new())
    }

    pub fn with_context(context: ParserContext) -> Self {
        SourceValidator {
            context,
            known_words: BTreeSet::new(),
        }
    }

    /// Whether `source` needs another line before it can run.
    ///
    /// Blank input is never held open; the host skips it instead.
    pub fn needs_more_input(&self, source: &str) -> bool {
        if source.trim().is_empty() {
            return false;
        }
        let attempt = MiniParser.parse(source, &self.context);
        multiline::is_incomplete(&attempt.state)
    }

    /// Replace the set of user-defined names.
    pub fn update_words(&mut self, words: impl IntoIterator<Item = String>) {
        self.known_words.clear();
        self.known_words.extend(words);
    }
}

impl Helper for SourceValidator {}

// ========== Validator ==========

impl Validator for SourceValidator {
    fn validate(&self, ctx: &mut ValidationContext) -> Result<ValidationResult> {
        if self.needs_more_input(ctx.input()) {
            Ok(ValidationResult::Incomplete)
        } else {
            Ok(ValidationResult::Valid(None))
        }
    }
}

// ========== Completer ==========

impl Completer for SourceValidator {
    type Candidate = Pair;

    fn complete(&self, line: &str, pos: usize, _ctx: &Context<'_>) -> Result<(usize, Vec<Pair>)> {
        let (start, word) = find_word_at(line, pos);
        if word.is_empty() {
            return Ok((pos, Vec::new()));
        }

        let mut completions: Vec<Pair> = KEYWORDS
            .iter()
            .copied()
            .chain(self.known_words.iter().map(String::as_str))
            .filter(|w| w.starts_with(word))
            .map(|w| Pair {
                display: w.to_string(),
                replacement: w.to_string(),
            })
            .collect();
        completions.sort_by(|a, b| a.display.cmp(&b.display));
        completions.dedup_by(|a, b| a.display == b.display);
        Ok((start, completions))
    }
}

/// Find the identifier being typed at the cursor.
/// Returns (start_position, word_slice).
fn find_word_at(line: &str, pos: usize) -> (usize, &str) {
    let prefix = &line[..pos];
    let start = prefix
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_alphanumeric() || *c == '_')
        .last()
        .map_or(pos, |(i, _)| i);
    (start, &line[start..pos])
}

// ========== Highlighter / Hinter (no-op) ==========

impl Highlighter for SourceValidator {
    fn highlight_char(&self, _line: &str, _pos: usize, _kind: CmdKind) -> bool {
        false
    }

    fn highlight_prompt<'b, 's: 'b, 'p: 'b>(&'s self, prompt: &'p str, _default: bool) -> Cow<'b, str> {
        Cow::Borrowed(prompt)
    }
}

impl Hinter for SourceValidator {
    type Hint = String;

    fn hint(&self, _line: &str, _pos: usize, _ctx: &Context<'_>) -> Option<String> {
        None
    }
}
