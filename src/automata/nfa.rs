//! NFA construction from token patterns.
//!
//! String-literal definitions within one lexical state are built as a
//! prefix-sharing trie directly in the state's NFA: common prefixes like
//! `=`/`==` or `true`/`try` share states, reducing state count. All other
//! patterns compile to Thompson fragments: fresh start/accept state pairs
//! wired with epsilon transitions.
//!
//! ASCII transitions are byte-labeled; ranges reaching past the ASCII span
//! become wide moves on the owning state and are encoded into bit-vector
//! tables after the state's automaton is complete.

use super::{AsciiClass, Nfa, NfaFragment, NfaState, StateId, ASCII_SPAN};
use crate::pattern::Pattern;
use crate::registry::{Ordinal, TokenRegistry};
use crate::LexerConfig;

/// Error from compiling a single token pattern. Reported to the shared
/// diagnostic sink by the lexical-state builder; never aborts the pass.
#[derive(Debug, Clone)]
pub struct PatternError {
    pub message: String,
}

impl PatternError {
    fn new(message: impl Into<String>) -> Self {
        PatternError { message: message.into() }
    }
}

impl std::fmt::Display for PatternError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for PatternError {}

/// Compiles `Pattern`s into Thompson fragments inside one state's NFA.
///
/// References are expanded by inline compilation of the referenced
/// definition, with a visiting stack guarding against reference cycles.
pub(crate) struct Compiler<'a> {
    registry: &'a TokenRegistry,
    config: &'a LexerConfig,
    visiting: Vec<String>,
}

impl<'a> Compiler<'a> {
    pub fn new(registry: &'a TokenRegistry, config: &'a LexerConfig) -> Self {
        Compiler { registry, config, visiting: Vec::new() }
    }

    pub fn compile(&mut self, nfa: &mut Nfa, pattern: &Pattern) -> Result<NfaFragment, PatternError> {
        match pattern {
            Pattern::Literal { image } => Ok(self.compile_literal(nfa, image)),
            Pattern::CharClass { ranges, negated } => self.compile_char_class(nfa, ranges, *negated),
            Pattern::Sequence(items) => {
                let mut fragments = Vec::with_capacity(items.len());
                for item in items {
                    fragments.push(self.compile(nfa, item)?);
                }
                Ok(link_concat(nfa, fragments))
            }
            Pattern::Choice(alternatives) => {
                if alternatives.is_empty() {
                    return Err(PatternError::new("alternation with no alternatives"));
                }
                let alt_start = nfa.add_state(NfaState::new());
                let alt_accept = nfa.add_state(NfaState::new());
                for alternative in alternatives {
                    let frag = self.compile(nfa, alternative)?;
                    nfa.add_epsilon(alt_start, frag.start);
                    nfa.add_epsilon(frag.accept, alt_accept);
                }
                Ok(NfaFragment { start: alt_start, accept: alt_accept })
            }
            Pattern::Repeat { inner, min, max } => {
                if let Some(max) = max {
                    if max < min {
                        return Err(PatternError::new(format!(
                            "repetition bound {{{},{}}} has max below min",
                            min, max
                        )));
                    }
                }
                let frag = self.compile(nfa, inner)?;
                Ok(apply_repeat(nfa, frag, *min, *max))
            }
            Pattern::Reference(label) => {
                let def = self.registry.lookup(label).ok_or_else(|| {
                    PatternError::new(format!("reference to undefined token <{}>", label))
                })?;
                if self.visiting.iter().any(|l| l == label) {
                    return Err(PatternError::new(format!(
                        "recursive reference to token <{}>",
                        label
                    )));
                }
                self.visiting.push(label.clone());
                let pattern = def.pattern.clone();
                let result = self.compile(nfa, &pattern);
                self.visiting.pop();
                result
            }
            Pattern::EndOfFile => {
                Err(PatternError::new("end-of-input marker cannot appear inside a pattern"))
            }
        }
    }

    /// Chain of single-unit transitions; empty images yield an epsilon
    /// fragment.
    fn compile_literal(&self, nfa: &mut Nfa, image: &str) -> NfaFragment {
        let start = nfa.add_state(NfaState::new());
        let mut current = start;
        for unit in image.encode_utf16() {
            let next = nfa.add_state(NfaState::new());
            if unit < ASCII_SPAN {
                let byte = unit as u8;
                if self.config.ignore_case && byte.is_ascii_alphabetic() {
                    nfa.add_transition(current, next, AsciiClass::Single(byte.to_ascii_lowercase()));
                    nfa.add_transition(current, next, AsciiClass::Single(byte.to_ascii_uppercase()));
                } else {
                    nfa.add_transition(current, next, AsciiClass::Single(byte));
                }
            } else {
                nfa.add_wide_move(current, next, (unit, unit));
            }
            current = next;
        }
        NfaFragment { start, accept: current }
    }

    fn compile_char_class(
        &self,
        nfa: &mut Nfa,
        ranges: &[(u16, u16)],
        negated: bool,
    ) -> Result<NfaFragment, PatternError> {
        for &(lo, hi) in ranges {
            if lo > hi {
                return Err(PatternError::new(format!(
                    "character range {:#06x}-{:#06x} is reversed",
                    lo, hi
                )));
            }
        }
        let mut merged = sort_and_merge_ranges(ranges);
        if self.config.ignore_case {
            merged = fold_case_ranges(&merged);
        }
        if negated {
            merged = complement_ranges(&merged);
        }
        if merged.is_empty() {
            return Err(PatternError::new("character class matches no code unit"));
        }

        let start = nfa.add_state(NfaState::new());
        let accept = nfa.add_state(NfaState::new());
        for (lo, hi) in merged {
            add_range_transition(nfa, start, accept, lo, hi);
        }
        Ok(NfaFragment { start, accept })
    }
}

/// Add one inclusive code-unit range, splitting it at the ASCII span.
fn add_range_transition(nfa: &mut Nfa, from: StateId, to: StateId, lo: u16, hi: u16) {
    if lo < ASCII_SPAN {
        let ascii_hi = hi.min(ASCII_SPAN - 1) as u8;
        let ascii_lo = lo as u8;
        if ascii_lo == ascii_hi {
            nfa.add_transition(from, to, AsciiClass::Single(ascii_lo));
        } else {
            nfa.add_transition(from, to, AsciiClass::Range(ascii_lo, ascii_hi));
        }
    }
    if hi >= ASCII_SPAN {
        nfa.add_wide_move(from, to, (lo.max(ASCII_SPAN), hi));
    }
}

/// Sort ranges and merge overlapping or adjacent ones.
pub(crate) fn sort_and_merge_ranges(ranges: &[(u16, u16)]) -> Vec<(u16, u16)> {
    let mut sorted = ranges.to_vec();
    sorted.sort_unstable();
    let mut merged: Vec<(u16, u16)> = Vec::with_capacity(sorted.len());
    for (lo, hi) in sorted {
        match merged.last_mut() {
            Some(last) if lo <= last.1.saturating_add(1) => {
                last.1 = last.1.max(hi);
            }
            _ => merged.push((lo, hi)),
        }
    }
    merged
}

/// Complement a merged, sorted range list over the full code-unit space.
pub(crate) fn complement_ranges(ranges: &[(u16, u16)]) -> Vec<(u16, u16)> {
    let mut out = Vec::with_capacity(ranges.len() + 1);
    let mut next = 0u16;
    for &(lo, hi) in ranges {
        if lo > next {
            out.push((next, lo - 1));
        }
        if hi == u16::MAX {
            return out;
        }
        next = hi + 1;
    }
    out.push((next, u16::MAX));
    out
}

/// Widen ranges so ASCII letters match both cases.
pub(crate) fn fold_case_ranges(ranges: &[(u16, u16)]) -> Vec<(u16, u16)> {
    const UPPER: (u16, u16) = (b'A' as u16, b'Z' as u16);
    const LOWER: (u16, u16) = (b'a' as u16, b'z' as u16);
    const CASE_GAP: u16 = b'a' as u16 - b'A' as u16;

    let mut folded = ranges.to_vec();
    for &(lo, hi) in ranges {
        if let Some((lo, hi)) = intersect((lo, hi), UPPER) {
            folded.push((lo + CASE_GAP, hi + CASE_GAP));
        }
        if let Some((lo, hi)) = intersect((lo, hi), LOWER) {
            folded.push((lo - CASE_GAP, hi - CASE_GAP));
        }
    }
    sort_and_merge_ranges(&folded)
}

fn intersect(a: (u16, u16), b: (u16, u16)) -> Option<(u16, u16)> {
    let lo = a.0.max(b.0);
    let hi = a.1.min(b.1);
    (lo <= hi).then_some((lo, hi))
}

/// Link fragments into a single concatenation fragment. Each fragment's
/// accept state is epsilon-connected to the next fragment's start.
fn link_concat(nfa: &mut Nfa, mut fragments: Vec<NfaFragment>) -> NfaFragment {
    if fragments.is_empty() {
        let s = nfa.add_state(NfaState::new());
        return NfaFragment { start: s, accept: s };
    }
    if fragments.len() == 1 {
        return fragments.remove(0);
    }
    let mut result = fragments.remove(0);
    for next in fragments {
        nfa.add_epsilon(result.accept, next.start);
        result = NfaFragment { start: result.start, accept: next.accept };
    }
    result
}

/// Apply bounded repetition `{min,max}` by expanding to concatenated copies:
/// `min` mandatory copies, then either a Kleene star (unbounded) or
/// `max - min` epsilon-bypassed optional copies.
fn apply_repeat(nfa: &mut Nfa, frag: NfaFragment, min: u32, max: Option<u32>) -> NfaFragment {
    match (min, max) {
        (0, None) => apply_star(nfa, frag),
        (1, None) => {
            /* a+ : new_start -> frag.start, frag.accept -> frag.start, frag.accept -> new_accept */
            let new_start = nfa.add_state(NfaState::new());
            let new_accept = nfa.add_state(NfaState::new());
            nfa.add_epsilon(new_start, frag.start);
            nfa.add_epsilon(frag.accept, frag.start);
            nfa.add_epsilon(frag.accept, new_accept);
            NfaFragment { start: new_start, accept: new_accept }
        }
        (0, Some(1)) => apply_optional(nfa, frag),
        _ => {
            let mut copies: Vec<NfaFragment> = Vec::with_capacity(min as usize + 2);
            for _ in 0..min {
                copies.push(clone_fragment(nfa, &frag));
            }
            match max {
                None => {
                    let star_copy = clone_fragment(nfa, &frag);
                    copies.push(apply_star(nfa, star_copy));
                }
                Some(max) => {
                    for _ in 0..(max - min) {
                        let opt_copy = clone_fragment(nfa, &frag);
                        copies.push(apply_optional(nfa, opt_copy));
                    }
                }
            }
            link_concat(nfa, copies)
        }
    }
}

fn apply_star(nfa: &mut Nfa, frag: NfaFragment) -> NfaFragment {
    /* a* : new_start -> frag.start, frag.accept -> frag.start, new_start -> new_accept, frag.accept -> new_accept */
    let new_start = nfa.add_state(NfaState::new());
    let new_accept = nfa.add_state(NfaState::new());
    nfa.add_epsilon(new_start, frag.start);
    nfa.add_epsilon(new_start, new_accept);
    nfa.add_epsilon(frag.accept, frag.start);
    nfa.add_epsilon(frag.accept, new_accept);
    NfaFragment { start: new_start, accept: new_accept }
}

fn apply_optional(nfa: &mut Nfa, frag: NfaFragment) -> NfaFragment {
    /* a? : new_start -> frag.start, new_start -> new_accept, frag.accept -> new_accept */
    let new_start = nfa.add_state(NfaState::new());
    let new_accept = nfa.add_state(NfaState::new());
    nfa.add_epsilon(new_start, frag.start);
    nfa.add_epsilon(new_start, new_accept);
    nfa.add_epsilon(frag.accept, new_accept);
    NfaFragment { start: new_start, accept: new_accept }
}

/// Clone an NFA fragment by creating fresh states with the same transitions.
fn clone_fragment(nfa: &mut Nfa, frag: &NfaFragment) -> NfaFragment {
    use std::collections::{HashMap, HashSet};

    /* Collect all states reachable from frag.start */
    let mut visited: Vec<StateId> = Vec::new();
    let mut queue: Vec<StateId> = vec![frag.start];
    let mut seen = HashSet::new();
    seen.insert(frag.start);

    while let Some(state) = queue.pop() {
        visited.push(state);
        let s = &nfa.states[state as usize];
        for &(_, target) in &s.transitions {
            if seen.insert(target) {
                queue.push(target);
            }
        }
        for &(_, target) in &s.wide_moves {
            if seen.insert(target) {
                queue.push(target);
            }
        }
        for &target in &s.epsilon {
            if seen.insert(target) {
                queue.push(target);
            }
        }
    }

    let mut mapping: HashMap<StateId, StateId> = HashMap::new();
    for &old_id in &visited {
        let new_id = nfa.add_state(NfaState::new());
        mapping.insert(old_id, new_id);
    }

    for &old_id in &visited {
        let old_state = nfa.states[old_id as usize].clone();
        let new_id = mapping[&old_id];
        for (class, target) in old_state.transitions {
            if let Some(&new_target) = mapping.get(&target) {
                nfa.add_transition(new_id, new_target, class);
            }
        }
        for (range, target) in old_state.wide_moves {
            if let Some(&new_target) = mapping.get(&target) {
                nfa.add_wide_move(new_id, new_target, range);
            }
        }
        for target in old_state.epsilon {
            if let Some(&new_target) = mapping.get(&target) {
                nfa.add_epsilon(new_id, new_target);
            }
        }
    }

    NfaFragment { start: mapping[&frag.start], accept: mapping[&frag.accept] }
}

/// Build a prefix-sharing trie for ASCII string-literal definitions.
///
/// Common prefixes (`=`/`==`, `true`/`try`) share states by construction.
/// When two literals end at the same state, the accept ordinal resolves to
/// the lowest (first-declared definition wins ties). Returns the trie root;
/// the caller wires an epsilon from the state's start to it.
pub(crate) fn build_literal_trie(
    nfa: &mut Nfa,
    literals: &[(Ordinal, &str)],
    config: &LexerConfig,
) -> StateId {
    let trie_root = nfa.add_state(NfaState::new());

    for &(ordinal, image) in literals {
        debug_assert!(image.is_ascii() && !image.is_empty());

        let mut current = trie_root;
        let bytes = image.as_bytes();

        for (i, &raw) in bytes.iter().enumerate() {
            let byte = if config.ignore_case { raw.to_ascii_lowercase() } else { raw };
            let is_last = i == bytes.len() - 1;

            let existing = nfa.states[current as usize]
                .transitions
                .iter()
                .find_map(|&(class, target)| match class {
                    AsciiClass::Single(b) if b == byte => Some(target),
                    _ => None,
                });

            let next = match existing {
                Some(target) => target,
                None => {
                    let next = nfa.add_state(NfaState::new());
                    nfa.add_transition(current, next, AsciiClass::Single(byte));
                    if config.ignore_case && byte.is_ascii_alphabetic() {
                        nfa.add_transition(current, next, AsciiClass::Single(byte.to_ascii_uppercase()));
                    }
                    next
                }
            };
            current = next;

            if is_last {
                let state = &mut nfa.states[current as usize];
                state.accept = Some(match state.accept {
                    Some(existing) => existing.min(ordinal),
                    None => ordinal,
                });
            }
        }
    }

    trie_root
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::Pattern;
    use crate::registry::{TokenDef, TokenRegistry};

    fn compile_one(pattern: &Pattern) -> (Nfa, NfaFragment) {
        let registry = TokenRegistry::new();
        let config = LexerConfig::default();
        let mut nfa = Nfa::new();
        let frag = Compiler::new(&registry, &config)
            .compile(&mut nfa, pattern)
            .expect("pattern should compile");
        (nfa, frag)
    }

    /// Simulate the NFA on a sequence of code units, reporting whether the
    /// fragment's accept state is reachable after consuming all of them.
    fn accepts(nfa: &Nfa, frag: &NfaFragment, input: &str) -> bool {
        let mut current = super::super::epsilon_closure(nfa, &[frag.start]);
        for unit in input.encode_utf16() {
            let mut next: Vec<StateId> = Vec::new();
            for &s in &current {
                for &(class, target) in &nfa.states[s as usize].transitions {
                    if unit < ASCII_SPAN && class.contains(unit as u8) {
                        next.push(target);
                    }
                }
                for &((lo, hi), target) in &nfa.states[s as usize].wide_moves {
                    if unit >= lo && unit <= hi {
                        next.push(target);
                    }
                }
            }
            if next.is_empty() {
                return false;
            }
            current = super::super::epsilon_closure(nfa, &next);
        }
        current.contains(&frag.accept)
    }

    #[test]
    fn test_literal_chain() {
        let (nfa, frag) = compile_one(&Pattern::literal("=="));
        assert!(accepts(&nfa, &frag, "=="));
        assert!(!accepts(&nfa, &frag, "="));
        assert!(!accepts(&nfa, &frag, "==="));
    }

    #[test]
    fn test_char_class_ranges() {
        let (nfa, frag) = compile_one(&Pattern::char_class(vec![
            (b'a' as u16, b'z' as u16),
            (b'0' as u16, b'9' as u16),
        ]));
        assert!(accepts(&nfa, &frag, "m"));
        assert!(accepts(&nfa, &frag, "7"));
        assert!(!accepts(&nfa, &frag, "M"));
    }

    #[test]
    fn test_negated_char_class() {
        let (nfa, frag) = compile_one(&Pattern::CharClass {
            ranges: vec![(b'"' as u16, b'"' as u16)],
            negated: true,
        });
        assert!(accepts(&nfa, &frag, "x"));
        assert!(accepts(&nfa, &frag, "\u{0394}"));
        assert!(!accepts(&nfa, &frag, "\""));
    }

    #[test]
    fn test_wide_class_spans_ascii_boundary() {
        let (nfa, frag) = compile_one(&Pattern::char_class(vec![(b'a' as u16, 0x00FF)]));
        assert!(accepts(&nfa, &frag, "q"));
        assert!(accepts(&nfa, &frag, "\u{00E9}"));
        assert!(!accepts(&nfa, &frag, "A"));
    }

    #[test]
    fn test_sequence_and_choice() {
        let pattern = Pattern::Sequence(vec![
            Pattern::literal("0"),
            Pattern::Choice(vec![Pattern::literal("x"), Pattern::literal("b")]),
        ]);
        let (nfa, frag) = compile_one(&pattern);
        assert!(accepts(&nfa, &frag, "0x"));
        assert!(accepts(&nfa, &frag, "0b"));
        assert!(!accepts(&nfa, &frag, "0"));
    }

    #[test]
    fn test_star_plus_optional() {
        let (nfa, frag) = compile_one(&Pattern::star(Pattern::literal("a")));
        assert!(accepts(&nfa, &frag, ""));
        assert!(accepts(&nfa, &frag, "aaa"));

        let (nfa, frag) = compile_one(&Pattern::plus(Pattern::literal("a")));
        assert!(!accepts(&nfa, &frag, ""));
        assert!(accepts(&nfa, &frag, "aa"));

        let (nfa, frag) = compile_one(&Pattern::optional(Pattern::literal("a")));
        assert!(accepts(&nfa, &frag, ""));
        assert!(accepts(&nfa, &frag, "a"));
        assert!(!accepts(&nfa, &frag, "aa"));
    }

    #[test]
    fn test_bounded_repeat() {
        let pattern = Pattern::Repeat {
            inner: Box::new(Pattern::literal("a")),
            min: 2,
            max: Some(3),
        };
        let (nfa, frag) = compile_one(&pattern);
        assert!(!accepts(&nfa, &frag, "a"));
        assert!(accepts(&nfa, &frag, "aa"));
        assert!(accepts(&nfa, &frag, "aaa"));
        assert!(!accepts(&nfa, &frag, "aaaa"));
    }

    #[test]
    fn test_unbounded_repeat() {
        let pattern = Pattern::Repeat {
            inner: Box::new(Pattern::literal("a")),
            min: 2,
            max: None,
        };
        let (nfa, frag) = compile_one(&pattern);
        assert!(!accepts(&nfa, &frag, "a"));
        assert!(accepts(&nfa, &frag, "aa"));
        assert!(accepts(&nfa, &frag, "aaaaaa"));
    }

    #[test]
    fn test_reference_inlines_target() {
        let mut registry = TokenRegistry::new();
        registry.register(TokenDef {
            ordinal: 0,
            label: "DIGIT".to_string(),
            pattern: Pattern::char_class(vec![(b'0' as u16, b'9' as u16)]),
            private_def: true,
            lexical_state: 0,
        });
        let config = LexerConfig::default();
        let mut nfa = Nfa::new();
        let frag = Compiler::new(&registry, &config)
            .compile(&mut nfa, &Pattern::plus(Pattern::reference("DIGIT")))
            .expect("reference should resolve");
        assert!(accepts(&nfa, &frag, "42"));
        assert!(!accepts(&nfa, &frag, "4a"));
    }

    #[test]
    fn test_undefined_reference_is_an_error() {
        let registry = TokenRegistry::new();
        let config = LexerConfig::default();
        let mut nfa = Nfa::new();
        let err = Compiler::new(&registry, &config)
            .compile(&mut nfa, &Pattern::reference("NOPE"))
            .unwrap_err();
        assert!(err.message.contains("undefined token <NOPE>"));
    }

    #[test]
    fn test_recursive_reference_is_an_error() {
        let mut registry = TokenRegistry::new();
        registry.register(TokenDef {
            ordinal: 0,
            label: "LOOP".to_string(),
            pattern: Pattern::Sequence(vec![
                Pattern::literal("a"),
                Pattern::reference("LOOP"),
            ]),
            private_def: true,
            lexical_state: 0,
        });
        let config = LexerConfig::default();
        let mut nfa = Nfa::new();
        let err = Compiler::new(&registry, &config)
            .compile(&mut nfa, &Pattern::reference("LOOP"))
            .unwrap_err();
        assert!(err.message.contains("recursive reference"));
    }

    #[test]
    fn test_ignore_case_literal() {
        let registry = TokenRegistry::new();
        let config = LexerConfig { ignore_case: true, ..LexerConfig::default() };
        let mut nfa = Nfa::new();
        let frag = Compiler::new(&registry, &config)
            .compile(&mut nfa, &Pattern::literal("while"))
            .expect("literal should compile");
        assert!(accepts(&nfa, &frag, "while"));
        assert!(accepts(&nfa, &frag, "WHILE"));
        assert!(accepts(&nfa, &frag, "While"));
    }

    #[test]
    fn test_ignore_case_char_class() {
        let registry = TokenRegistry::new();
        let config = LexerConfig { ignore_case: true, ..LexerConfig::default() };
        let mut nfa = Nfa::new();
        let frag = Compiler::new(&registry, &config)
            .compile(&mut nfa, &Pattern::char_class(vec![(b'a' as u16, b'f' as u16)]))
            .expect("class should compile");
        assert!(accepts(&nfa, &frag, "c"));
        assert!(accepts(&nfa, &frag, "C"));
        assert!(!accepts(&nfa, &frag, "G"));
    }

    #[test]
    fn test_trie_shares_prefixes() {
        let mut nfa = Nfa::new();
        let config = LexerConfig::default();
        let root = build_literal_trie(&mut nfa, &[(1, "="), (2, "==")], &config);

        assert_eq!(nfa.states[root as usize].transitions.len(), 1);
        let eq_state = nfa.states[root as usize].transitions[0].1;
        assert_eq!(nfa.states[eq_state as usize].accept, Some(1));
        assert_eq!(nfa.states[eq_state as usize].transitions.len(), 1);
        let eq_eq_state = nfa.states[eq_state as usize].transitions[0].1;
        assert_eq!(nfa.states[eq_eq_state as usize].accept, Some(2));
    }

    #[test]
    fn test_trie_accept_conflict_takes_lowest_ordinal() {
        let mut nfa = Nfa::new();
        let config = LexerConfig::default();
        let root = build_literal_trie(&mut nfa, &[(3, "if"), (1, "if")], &config);

        let f = |s: StateId| nfa.states[s as usize].transitions[0].1;
        let end = f(f(root));
        assert_eq!(nfa.states[end as usize].accept, Some(1));
    }

    #[test]
    fn test_range_merge_and_complement() {
        assert_eq!(
            sort_and_merge_ranges(&[(10, 20), (15, 30), (31, 40), (50, 60)]),
            vec![(10, 40), (50, 60)]
        );
        assert_eq!(
            complement_ranges(&[(0, 9), (20, u16::MAX)]),
            vec![(10, 19)]
        );
        assert_eq!(complement_ranges(&[]), vec![(0, u16::MAX)]);
    }
}
