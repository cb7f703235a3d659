//! # lexgen: table-driven lexer generation core
//!
//! The lexical half of a parser generator: token definitions written as
//! regular expressions, grouped into named lexical states, become the
//! registries, automata, and compressed tables a generated scanner consumes.
//!
//! ## Architecture
//!
//! ```text
//!  token productions
//!        │
//!        ▼
//!  ┌──────────────────────────────────────────────┐
//!  │ 1. Token registry:                           │
//!  │    dense ordinals, behavioral classification │
//!  │    (token / skip / more / special), labels   │
//!  │                                              │
//!  │ 2. Per-lexical-state automata:               │
//!  │    literal trie + Thompson fragments,        │
//!  │    closure-set enumeration                   │
//!  │                                              │
//!  │ 3. Table compression:                        │
//!  │    wide ranges -> deduplicated bit vectors,  │
//!  │    state sets -> emission pool spans         │
//!  │                                              │
//!  │ 4. Unmatchability analysis:                  │
//!  │    shadowed-alternative warnings             │
//!  └──────────────────────────────────────────────┘
//!        │
//!        ▼
//!  LexerTables (consumed by the scanner code generator)
//! ```
//!
//! Matching follows longest-match-first-declared-wins: the longest matching
//! alternative wins, and among equal-length matches the lowest ordinal
//! (declared first) wins. Everything here exists to make that rule cheap in
//! the generated scanner.
//!
//! The crate performs no I/O and parses no grammar text; a front end hands
//! in [`TokenProduction`]s and a [`Diagnostics`] sink, and a code generator
//! consumes the resulting [`LexerTables`].

pub mod automata;
pub mod diagnostics;
pub mod lexer_data;
pub mod lexical_state;
pub mod pattern;
pub mod registry;
pub mod shadowing;

#[cfg(test)]
mod tests;

pub use diagnostics::{Diagnostic, Diagnostics, Severity};
pub use lexer_data::{GenerationBlocked, LexerData, LexerTables, DEFAULT_STATE};
pub use lexical_state::LexicalStateData;
pub use pattern::Pattern;
pub use registry::{Ordinal, TokenCategory, TokenDef, TokenRegistry};
pub use shadowing::{check_unmatchability, ChoiceInfo};

/// Generation-mode switches, supplied by the surrounding configuration
/// layer; this crate only reads them.
#[derive(Debug, Clone, Copy, Default)]
pub struct LexerConfig {
    /// Fold ASCII letter ranges before automaton construction and encoding,
    /// so `while` also matches `WHILE`.
    pub ignore_case: bool,
    /// Lift the fixed capacity of the encoder's scratch array (set when the
    /// generated scanner buffers tokens of unlimited length).
    pub unbounded_token_buffers: bool,
}

/// One regular-expression definition inside a token production.
#[derive(Debug, Clone)]
pub struct TokenRule {
    /// Display label; may be empty or invalid, in which case a valid
    /// identifier is synthesized during the build pass.
    pub label: String,
    pub pattern: Pattern,
    /// Usable only as a sub-pattern of other definitions, never matched
    /// directly.
    pub private_def: bool,
    /// Whether a lexical action is attached to a match of this rule.
    pub has_action: bool,
}

impl TokenRule {
    pub fn new(label: impl Into<String>, pattern: Pattern) -> Self {
        TokenRule {
            label: label.into(),
            pattern,
            private_def: false,
            has_action: false,
        }
    }
}

/// A token-production declaration: one or more rules scoped to one or more
/// lexical states, with a shared behavioral category.
#[derive(Debug, Clone)]
pub struct TokenProduction {
    /// Names of the lexical states this production belongs to; empty means
    /// the default state.
    pub lexical_states: Vec<String>,
    pub kind: TokenCategory,
    pub rules: Vec<TokenRule>,
}

impl TokenProduction {
    /// A normal-token production in the default state.
    pub fn tokens(rules: Vec<TokenRule>) -> Self {
        TokenProduction {
            lexical_states: Vec::new(),
            kind: TokenCategory::Token,
            rules,
        }
    }
}
