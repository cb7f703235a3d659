//! Per-lexical-state automaton construction.
//!
//! Each named lexical state collects the token rules declared under its name
//! and compiles them into one NFA reachable from the state's start state:
//! ASCII string literals share a prefix trie, everything else becomes a
//! Thompson fragment. Alternatives are wired in ordinal order so the
//! generated scanner's longest-match-first-declared-wins rule falls out of
//! lowest-ordinal accept resolution.
//!
//! After compilation the state's reachable closure sets are enumerated once:
//! every set is finalized through the shared emission pool, grows the
//! maximum simultaneous-state-set size (which sizes runtime scanner
//! buffers), and wide ranges are folded and encoded through the shared
//! character-class encoder.

use std::collections::{BTreeSet, HashSet};

use log::debug;

use crate::automata::encode::CharClassEncoder;
use crate::automata::nfa::{build_literal_trie, sort_and_merge_ranges, Compiler};
use crate::automata::state_sets::StateSetPool;
use crate::automata::{epsilon_closure, Nfa, StateId};
use crate::diagnostics::Diagnostics;
use crate::pattern::Pattern;
use crate::registry::{Ordinal, TokenDef, TokenRegistry};
use crate::shadowing::{ChoiceAlt, ChoiceInfo};
use crate::LexerConfig;

/// A named automaton-building context. Created once per declared state name
/// (plus the implicit default state), mutated only by `process` during the
/// single build pass, never deleted.
#[derive(Debug)]
pub struct LexicalStateData {
    name: String,
    index: usize,
    /// Ordinals of the rules declared under this state, in declaration
    /// order.
    rules: Vec<Ordinal>,
    nfa: Nfa,
    initial_closure: Vec<StateId>,
    /// Encoded wide-move method per NFA state that has wide transitions.
    wide_methods: Vec<(StateId, u32)>,
}

impl LexicalStateData {
    pub(crate) fn new(name: impl Into<String>, index: usize) -> Self {
        LexicalStateData {
            name: name.into(),
            index,
            rules: Vec::new(),
            nfa: Nfa::new(),
            initial_closure: Vec::new(),
            wide_methods: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Ordinals of this state's rules, in declaration order.
    pub fn rules(&self) -> &[Ordinal] {
        &self.rules
    }

    pub fn nfa(&self) -> &Nfa {
        &self.nfa
    }

    /// Epsilon closure of the start state, computed by `process`.
    pub fn initial_closure(&self) -> &[StateId] {
        &self.initial_closure
    }

    pub fn wide_methods(&self) -> &[(StateId, u32)] {
        &self.wide_methods
    }

    pub(crate) fn add_rule(&mut self, ordinal: Ordinal) {
        self.rules.push(ordinal);
    }

    /// Compile this state's rules and measure the result.
    ///
    /// Returns the choice constructs the state produced (for the
    /// unmatchability pass) and the largest simultaneous closure-set size
    /// seen. Compile failures go to the sink and skip only the failing rule.
    pub(crate) fn process(
        &mut self,
        registry: &TokenRegistry,
        config: &LexerConfig,
        encoder: &mut CharClassEncoder,
        pool: &mut StateSetPool,
        diagnostics: &mut Diagnostics,
    ) -> (Vec<ChoiceInfo>, usize) {
        let start = self.nfa.start;

        // ASCII literals share one prefix trie.
        let literals: Vec<(Ordinal, &str)> = self
            .rules
            .iter()
            .filter_map(|&ordinal| {
                let def = registry.token(ordinal);
                trie_literal(def).map(|image| (ordinal, image))
            })
            .collect();
        if !literals.is_empty() {
            let trie_root = build_literal_trie(&mut self.nfa, &literals, config);
            self.nfa.add_epsilon(start, trie_root);
        }

        // Remaining rules compile to Thompson fragments in ordinal order.
        let mut choices = Vec::new();
        for &ordinal in &self.rules {
            let def = registry.token(ordinal);
            if def.private_def || trie_literal(def).is_some() {
                continue;
            }
            let mut compiler = Compiler::new(registry, config);
            match compiler.compile(&mut self.nfa, &def.pattern) {
                Ok(frag) => {
                    self.nfa.add_epsilon(start, frag.start);
                    let accept = &mut self.nfa.states[frag.accept as usize].accept;
                    *accept = Some(match *accept {
                        Some(existing) => existing.min(ordinal),
                        None => ordinal,
                    });
                }
                Err(err) => diagnostics.add_error(&def.label, err.to_string()),
            }
            if let Pattern::Choice(alternatives) = &def.pattern {
                choices.push(self.choice_info(def, alternatives, registry));
            }
        }

        self.encode_wide_moves(encoder);
        let max_set_size = self.enumerate_closure_sets(pool);

        debug!(
            "lexical state {}: {} rules, {} nfa states, {} wide methods, max set {}",
            self.name,
            self.rules.len(),
            self.nfa.states.len(),
            self.wide_methods.len(),
            max_set_size
        );

        (choices, max_set_size)
    }

    fn choice_info(
        &self,
        def: &TokenDef,
        alternatives: &[Pattern],
        registry: &TokenRegistry,
    ) -> ChoiceInfo {
        let alternatives = alternatives
            .iter()
            .map(|alternative| {
                let referenced = match alternative {
                    Pattern::Reference(label) => registry.lookup(label),
                    _ => None,
                };
                match referenced {
                    Some(r) => ChoiceAlt {
                        ordinal: r.ordinal,
                        label: r.label.clone(),
                        private_def: r.private_def,
                        lexical_state: r.lexical_state,
                    },
                    // Inline alternatives have no ordinal of their own.
                    None => ChoiceAlt {
                        ordinal: 0,
                        label: String::new(),
                        private_def: false,
                        lexical_state: def.lexical_state,
                    },
                }
            })
            .collect();
        ChoiceInfo {
            ordinal: def.ordinal,
            label: def.label.clone(),
            lexical_state: def.lexical_state,
            alternatives,
        }
    }

    /// Fold each state's wide ranges into one merged set and run it through
    /// the shared encoder.
    fn encode_wide_moves(&mut self, encoder: &mut CharClassEncoder) {
        for id in 0..self.nfa.states.len() {
            let ranges: Vec<(u16, u16)> = self.nfa.states[id]
                .wide_moves
                .iter()
                .map(|&(range, _)| range)
                .collect();
            if ranges.is_empty() {
                continue;
            }
            let merged = sort_and_merge_ranges(&ranges);
            let method = encoder.encode(&merged);
            self.wide_methods.push((id as StateId, method));
        }
    }

    /// Worklist enumeration of the reachable closure sets, finalizing each
    /// through the emission pool. Returns the largest set size seen.
    fn enumerate_closure_sets(&mut self, pool: &mut StateSetPool) -> usize {
        let start_closure = epsilon_closure(&self.nfa, &[self.nfa.start]);
        let mut max_size = start_closure.len();
        pool.indices_for(&start_closure);

        let mut seen: HashSet<Vec<StateId>> = HashSet::new();
        seen.insert(start_closure.clone());
        let mut worklist = vec![start_closure.clone()];
        self.initial_closure = start_closure;

        while let Some(set) = worklist.pop() {
            // ASCII successors, one candidate per byte.
            for byte in 0..crate::automata::ASCII_SPAN as u8 {
                let mut targets: Vec<StateId> = Vec::new();
                for &s in &set {
                    for &(class, target) in &self.nfa.states[s as usize].transitions {
                        if class.contains(byte) {
                            targets.push(target);
                        }
                    }
                }
                self.visit_successor(targets, pool, &mut seen, &mut worklist, &mut max_size);
            }

            // Wide successors: one candidate per distinct sub-interval of
            // the set's wide ranges, probed at each interval's low bound.
            let mut cuts: BTreeSet<u16> = BTreeSet::new();
            for &s in &set {
                for &((lo, hi), _) in &self.nfa.states[s as usize].wide_moves {
                    cuts.insert(lo);
                    if hi < u16::MAX {
                        cuts.insert(hi + 1);
                    }
                }
            }
            for &probe in &cuts {
                let mut targets: Vec<StateId> = Vec::new();
                for &s in &set {
                    for &((lo, hi), target) in &self.nfa.states[s as usize].wide_moves {
                        if probe >= lo && probe <= hi {
                            targets.push(target);
                        }
                    }
                }
                self.visit_successor(targets, pool, &mut seen, &mut worklist, &mut max_size);
            }
        }

        max_size
    }

    fn visit_successor(
        &self,
        targets: Vec<StateId>,
        pool: &mut StateSetPool,
        seen: &mut HashSet<Vec<StateId>>,
        worklist: &mut Vec<Vec<StateId>>,
        max_size: &mut usize,
    ) {
        if targets.is_empty() {
            return;
        }
        let closure = epsilon_closure(&self.nfa, &targets);
        if seen.insert(closure.clone()) {
            pool.indices_for(&closure);
            *max_size = (*max_size).max(closure.len());
            worklist.push(closure);
        }
    }
}

/// The literal image, if this rule belongs in the state's prefix trie:
/// non-private, non-empty, all-ASCII string literals.
fn trie_literal(def: &TokenDef) -> Option<&str> {
    if def.private_def {
        return None;
    }
    match def.pattern.literal_image() {
        Some(image) if !image.is_empty() && image.is_ascii() => Some(image),
        _ => None,
    }
}
