//! Token registry and behavioral classification.
//!
//! The registry owns the ordered list of token definitions and assigns each a
//! dense, immutable ordinal in declaration order. Ordinal 0 is always the
//! synthetic end-of-input token. Classification into the four behavioral
//! categories (token / skip / more / special) is recorded in bit-indexed sets
//! over the ordinal space, which keeps the mutual-exclusivity invariant a
//! one-line check.
//!
//! Label and literal lookups are linear scans over all registered tokens.
//! That is O(n) per call, which is fine at realistic token counts (hundreds);
//! replacing them with a hash index would change iteration-order-dependent
//! tie-breaking and must not be done casually.

use crate::pattern::Pattern;

/// Dense zero-based identifier of a token definition, also its position in
/// generated dispatch tables.
pub type Ordinal = u32;

/// The four mutually exclusive behavioral categories a matched token can
/// have. `Token` is the default when a production declares no kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenCategory {
    /// Produces a normal token.
    Token,
    /// Matched but discarded.
    Skip,
    /// Matched and appended to an accumulating buffer; no token yet.
    More,
    /// Matched and reported to the consumer outside the normal token stream.
    Special,
}

/// A registered token definition.
#[derive(Debug, Clone)]
pub struct TokenDef {
    /// Assigned by the registry; immutable afterwards.
    pub ordinal: Ordinal,
    /// Display label. Becomes a valid identifier after `ensure_labels_valid`.
    pub label: String,
    pub pattern: Pattern,
    /// Usable only as a sub-pattern, never matched directly.
    pub private_def: bool,
    /// Index of the owning lexical state (the first state the definition was
    /// declared in). Resolved during the build pass.
    pub lexical_state: usize,
}

/// Bit-indexed set over the token ordinal space.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenSet {
    words: Vec<u64>,
}

impl TokenSet {
    pub fn new() -> Self {
        TokenSet { words: Vec::new() }
    }

    pub fn set(&mut self, ordinal: Ordinal) {
        let word = ordinal as usize / 64;
        if word >= self.words.len() {
            self.words.resize(word + 1, 0);
        }
        self.words[word] |= 1u64 << (ordinal % 64);
    }

    pub fn get(&self, ordinal: Ordinal) -> bool {
        self.words
            .get(ordinal as usize / 64)
            .is_some_and(|w| w & (1u64 << (ordinal % 64)) != 0)
    }

    pub fn cardinality(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.cardinality() == 0
    }

    /// Member ordinals in ascending order.
    pub fn members(&self) -> Vec<Ordinal> {
        let mut out = Vec::with_capacity(self.cardinality());
        for (i, &w) in self.words.iter().enumerate() {
            let mut bits = w;
            while bits != 0 {
                let bit = bits.trailing_zeros();
                out.push(i as Ordinal * 64 + bit);
                bits &= bits - 1;
            }
        }
        out
    }
}

/// Append-only registry of token definitions plus their classification sets.
#[derive(Debug)]
pub struct TokenRegistry {
    defs: Vec<TokenDef>,
    token_set: TokenSet,
    skip_set: TokenSet,
    more_set: TokenSet,
    special_set: TokenSet,
    has_skip_actions: bool,
    has_more_actions: bool,
}

impl TokenRegistry {
    /// A fresh registry holding only the synthetic end-of-input token at
    /// ordinal 0, which is always a member of the token set.
    pub fn new() -> Self {
        let mut registry = TokenRegistry {
            defs: Vec::new(),
            token_set: TokenSet::new(),
            skip_set: TokenSet::new(),
            more_set: TokenSet::new(),
            special_set: TokenSet::new(),
            has_skip_actions: false,
            has_more_actions: false,
        };
        registry.register(TokenDef {
            ordinal: 0,
            label: "EOF".to_string(),
            pattern: Pattern::EndOfFile,
            private_def: false,
            lexical_state: 0,
        });
        registry.token_set.set(0);
        registry
    }

    /// Append a definition and assign it the next dense ordinal.
    /// There is no removal operation; the registry is append-only.
    pub fn register(&mut self, mut def: TokenDef) -> Ordinal {
        let ordinal = self.defs.len() as Ordinal;
        def.ordinal = ordinal;
        self.defs.push(def);
        ordinal
    }

    /// Record category membership for an ordinal.
    ///
    /// `has_action` marks an attached lexical action; it is what flips the
    /// `has_skip_actions` / `has_more_actions` summaries, independently of
    /// set membership.
    ///
    /// # Panics
    ///
    /// Panics if `ordinal` is outside the dense range, or if the ordinal was
    /// already classified into a different category. Both indicate a bug in
    /// the caller, not bad grammar input.
    pub fn classify(&mut self, ordinal: Ordinal, category: TokenCategory, has_action: bool) {
        assert!(
            (ordinal as usize) < self.defs.len(),
            "classify: ordinal {} outside dense range 0..{}",
            ordinal,
            self.defs.len()
        );
        let already = self.skip_set.get(ordinal)
            || self.more_set.get(ordinal)
            || self.special_set.get(ordinal)
            || (ordinal != 0 && self.token_set.get(ordinal));
        assert!(!already, "classify: ordinal {} classified twice", ordinal);

        match category {
            TokenCategory::Token => self.token_set.set(ordinal),
            TokenCategory::Skip => {
                self.skip_set.set(ordinal);
                if has_action {
                    self.has_skip_actions = true;
                }
            }
            TokenCategory::More => {
                self.more_set.set(ordinal);
                if has_action {
                    self.has_more_actions = true;
                }
            }
            TokenCategory::Special => self.special_set.set(ordinal),
        }
    }

    pub fn token_count(&self) -> usize {
        self.defs.len()
    }

    pub fn token(&self, ordinal: Ordinal) -> &TokenDef {
        &self.defs[ordinal as usize]
    }

    pub fn token_name(&self, ordinal: Ordinal) -> &str {
        &self.defs[ordinal as usize].label
    }

    pub fn tokens(&self) -> &[TokenDef] {
        &self.defs
    }

    /// Look a definition up by label. Linear scan, first match wins.
    pub fn lookup(&self, label: &str) -> Option<&TokenDef> {
        self.defs.iter().find(|d| d.label == label)
    }

    pub(crate) fn set_lexical_state(&mut self, ordinal: Ordinal, state: usize) {
        self.defs[ordinal as usize].lexical_state = state;
    }

    /// Exact-match lookup of the label for a string-literal token, in
    /// ordinal order. Lets the front end merge duplicate literal definitions
    /// emitted by different grammar rules into one token.
    pub fn string_literal_label(&self, image: &str) -> Option<&str> {
        self.defs
            .iter()
            .find(|d| d.pattern.literal_image() == Some(image))
            .map(|d| d.label.as_str())
    }

    /// Rewrite every label that is not a valid identifier.
    ///
    /// The synthesized label is `_TOKEN_<position>`, except that a
    /// string-literal token whose upper-cased image is itself a valid,
    /// unused identifier gets that image, keeping generated identifiers
    /// readable for literal keywords. Idempotent; must run after all
    /// registration and before any consumer reads labels.
    pub fn ensure_labels_valid(&mut self) {
        for i in 0..self.defs.len() {
            if is_identifier(&self.defs[i].label) {
                continue;
            }
            let mut label = format!("_TOKEN_{}", i);
            if let Some(image) = self.defs[i].pattern.literal_image() {
                let upper = image.to_uppercase();
                if is_identifier(&upper) && !self.label_in_use(&upper) {
                    label = upper;
                }
            }
            self.defs[i].label = label;
        }
    }

    fn label_in_use(&self, label: &str) -> bool {
        self.defs.iter().any(|d| d.label == label)
    }

    pub fn token_set(&self) -> &TokenSet {
        &self.token_set
    }

    pub fn skip_set(&self) -> &TokenSet {
        &self.skip_set
    }

    pub fn more_set(&self) -> &TokenSet {
        &self.more_set
    }

    pub fn special_set(&self) -> &TokenSet {
        &self.special_set
    }

    pub fn has_token(&self, ordinal: Ordinal) -> bool {
        self.token_set.get(ordinal)
    }

    pub fn has_skip(&self, ordinal: Ordinal) -> bool {
        self.skip_set.get(ordinal)
    }

    pub fn has_more(&self, ordinal: Ordinal) -> bool {
        self.more_set.get(ordinal)
    }

    pub fn has_special(&self, ordinal: Ordinal) -> bool {
        self.special_set.get(ordinal)
    }

    /// True iff the skip set has at least one member.
    pub fn has_any_skip(&self) -> bool {
        !self.skip_set.is_empty()
    }

    pub fn has_any_more(&self) -> bool {
        !self.more_set.is_empty()
    }

    pub fn has_any_special(&self) -> bool {
        !self.special_set.is_empty()
    }

    /// True iff some skip definition carries an attached lexical action.
    pub fn has_skip_actions(&self) -> bool {
        self.has_skip_actions
    }

    pub fn has_more_actions(&self) -> bool {
        self.has_more_actions
    }
}

impl Default for TokenRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether `s` is usable as an identifier in generated code: a letter or
/// underscore followed by letters, digits, or underscores.
pub fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_')
}
