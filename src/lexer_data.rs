//! Generation-pass orchestration and outbound tables.
//!
//! `LexerData` owns everything one generation run produces: the token
//! registry, the lexical states, the shared character-class encoder, and the
//! state-set emission pool. `build_data` is the single pass that distributes
//! token productions to their states, compiles each state's automaton, and
//! runs the unmatchability check across all produced choices.
//!
//! The pass never aborts early: configuration problems accumulate in the
//! diagnostic sink so one run surfaces as many as possible. `tables` then
//! refuses to hand data to code generation once the sink holds an error.

use std::collections::HashMap;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::automata::encode::{BitVec256, CharClassEncoder, NonAsciiMove};
use crate::automata::state_sets::StateSetPool;
use crate::automata::StateId;
use crate::diagnostics::Diagnostics;
use crate::lexical_state::LexicalStateData;
use crate::registry::{is_identifier, Ordinal, TokenDef, TokenRegistry};
use crate::shadowing::check_unmatchability;
use crate::{LexerConfig, TokenProduction};

/// Name of the implicit lexical state every grammar starts in.
pub const DEFAULT_STATE: &str = "DEFAULT";

/// A registered production awaiting distribution to its lexical states.
#[derive(Debug)]
struct ProductionRecord {
    state_names: Vec<String>,
    ordinals: Vec<Ordinal>,
}

/// All data computed for the lexer of one grammar.
#[derive(Debug)]
pub struct LexerData {
    config: LexerConfig,
    registry: TokenRegistry,
    lexical_states: Vec<LexicalStateData>,
    productions: Vec<ProductionRecord>,
    encoder: CharClassEncoder,
    state_sets: StateSetPool,
    /// Largest simultaneous automaton-state-set size seen anywhere; sizes
    /// runtime scanner buffers. Grows monotonically, never shrinks.
    state_set_size: usize,
}

impl LexerData {
    pub fn new(config: LexerConfig) -> Self {
        let encoder = CharClassEncoder::new(&config);
        let mut data = LexerData {
            config,
            registry: TokenRegistry::new(),
            lexical_states: Vec::new(),
            productions: Vec::new(),
            encoder,
            state_sets: StateSetPool::new(),
            state_set_size: 0,
        };
        data.add_lexical_state(DEFAULT_STATE);
        data
    }

    /// Declare a lexical state. Declaring an existing name again is a no-op.
    pub fn add_lexical_state(&mut self, name: &str) {
        if self.state_index(name).is_none() {
            let index = self.lexical_states.len();
            self.lexical_states.push(LexicalStateData::new(name, index));
        }
    }

    /// Register a production: every rule gets the next dense ordinal and its
    /// category membership immediately; distribution to lexical states
    /// happens in `build_data`. A production naming no state belongs to the
    /// default state.
    pub fn add_token_production(&mut self, production: TokenProduction) {
        let TokenProduction { lexical_states, kind, rules } = production;
        let state_names = if lexical_states.is_empty() {
            vec![DEFAULT_STATE.to_string()]
        } else {
            lexical_states
        };
        let mut ordinals = Vec::with_capacity(rules.len());
        for rule in rules {
            let ordinal = self.registry.register(TokenDef {
                ordinal: 0,
                label: rule.label,
                pattern: rule.pattern,
                private_def: rule.private_def,
                lexical_state: 0,
            });
            self.registry.classify(ordinal, kind, rule.has_action);
            ordinals.push(ordinal);
        }
        self.productions.push(ProductionRecord { state_names, ordinals });
    }

    /// The single generation pass.
    pub fn build_data(&mut self, diagnostics: &mut Diagnostics) {
        self.registry.ensure_labels_valid();
        for def in self.registry.tokens() {
            if !is_identifier(&def.label) {
                diagnostics.add_error(
                    &def.label,
                    "token label is not a valid identifier after synthesis",
                );
            }
        }

        self.distribute_productions(diagnostics);
        self.check_duplicate_literals(diagnostics);

        let Self {
            ref config,
            ref registry,
            ref mut lexical_states,
            ref mut encoder,
            ref mut state_sets,
            ref mut state_set_size,
            ..
        } = *self;

        let mut all_choices = Vec::new();
        for state in lexical_states.iter_mut() {
            let (choices, max_set_size) =
                state.process(registry, config, encoder, state_sets, diagnostics);
            all_choices.extend(choices);
            expand_state_set_size(state_set_size, max_set_size);
        }

        for choice in &all_choices {
            check_unmatchability(choice, diagnostics);
        }

        debug!(
            "build pass: {} tokens, {} lexical states, {} bit vectors, {} wide methods, \
             {} pooled state sets, max simultaneous set {}",
            self.registry.token_count(),
            self.lexical_states.len(),
            self.encoder.lohi_byte_count(),
            self.encoder.methods().len(),
            self.state_sets.ordered().len(),
            self.state_set_size,
        );
    }

    fn distribute_productions(&mut self, diagnostics: &mut Diagnostics) {
        let Self {
            ref mut registry,
            ref mut lexical_states,
            ref productions,
            ..
        } = *self;

        // Ordinal 0 (end-of-input) already owns the default state.
        let mut primary_assigned = vec![false; registry.token_count()];
        primary_assigned[0] = true;

        for record in productions {
            for name in &record.state_names {
                let index = lexical_states.iter().position(|s| s.name() == name);
                let Some(index) = index else {
                    let construct = record
                        .ordinals
                        .first()
                        .map(|&o| registry.token_name(o).to_string())
                        .unwrap_or_else(|| "token production".to_string());
                    diagnostics.add_error(
                        construct,
                        format!("lexical state \"{}\" has not been declared", name),
                    );
                    continue;
                };
                for &ordinal in &record.ordinals {
                    lexical_states[index].add_rule(ordinal);
                    if !primary_assigned[ordinal as usize] {
                        primary_assigned[ordinal as usize] = true;
                        registry.set_lexical_state(ordinal, index);
                    }
                }
            }
        }
    }

    /// The same literal image declared twice in one lexical state can never
    /// both match; the front end should have merged them via
    /// `string_literal_label`.
    fn check_duplicate_literals(&self, diagnostics: &mut Diagnostics) {
        for state in &self.lexical_states {
            let mut seen: HashMap<&str, Ordinal> = HashMap::new();
            for &ordinal in state.rules() {
                let def = self.registry.token(ordinal);
                if def.private_def {
                    continue;
                }
                let Some(image) = def.pattern.literal_image() else {
                    continue;
                };
                if let Some(&first) = seen.get(image) {
                    diagnostics.add_error(
                        &def.label,
                        format!(
                            "duplicate definition of string literal {:?} in lexical state {} \
                             (first defined as {})",
                            image,
                            state.name(),
                            self.registry.token_name(first),
                        ),
                    );
                } else {
                    seen.insert(image, ordinal);
                }
            }
        }
    }

    pub fn registry(&self) -> &TokenRegistry {
        &self.registry
    }

    pub fn token_count(&self) -> usize {
        self.registry.token_count()
    }

    pub fn token_name(&self, ordinal: Ordinal) -> &str {
        self.registry.token_name(ordinal)
    }

    pub fn string_literal_label(&self, image: &str) -> Option<&str> {
        self.registry.string_literal_label(image)
    }

    pub fn lexical_states(&self) -> &[LexicalStateData] {
        &self.lexical_states
    }

    /// Look a state up by name. Linear scan, first match wins.
    pub fn lexical_state(&self, name: &str) -> Option<&LexicalStateData> {
        self.lexical_states.iter().find(|s| s.name() == name)
    }

    pub fn state_index(&self, name: &str) -> Option<usize> {
        self.lexical_states.iter().position(|s| s.name() == name)
    }

    pub fn state_name(&self, index: usize) -> &str {
        self.lexical_states[index].name()
    }

    pub fn num_lexical_states(&self) -> usize {
        self.lexical_states.len()
    }

    pub fn state_set_size(&self) -> usize {
        self.state_set_size
    }

    /// Grow the buffer-sizing measurement. Monotonic: a smaller value never
    /// shrinks it.
    pub fn expand_state_set_size(&mut self, size: usize) {
        expand_state_set_size(&mut self.state_set_size, size);
    }

    pub fn bit_vectors(&self) -> &[BitVec256] {
        self.encoder.bit_vectors()
    }

    pub fn non_ascii_moves(&self) -> &[NonAsciiMove] {
        self.encoder.methods()
    }

    pub fn ordered_state_sets(&self) -> &[Vec<StateId>] {
        self.state_sets.ordered()
    }

    /// Snapshot the outbound tables for code generation.
    ///
    /// Refuses once the sink holds a fatal error: every index in the
    /// snapshot is hardcoded into generated code, and a half-built table is
    /// worse than none.
    pub fn tables(&self, diagnostics: &Diagnostics) -> Result<LexerTables, GenerationBlocked> {
        if diagnostics.has_errors() {
            return Err(GenerationBlocked { error_count: diagnostics.error_count() });
        }
        Ok(LexerTables {
            tokens: self
                .registry
                .tokens()
                .iter()
                .map(|d| TokenSummary {
                    label: d.label.clone(),
                    private_def: d.private_def,
                    literal_image: d.pattern.literal_image().map(str::to_string),
                    lexical_state: d.lexical_state,
                })
                .collect(),
            token_members: self.registry.token_set().members(),
            skip_members: self.registry.skip_set().members(),
            more_members: self.registry.more_set().members(),
            special_members: self.registry.special_set().members(),
            has_skip: self.registry.has_any_skip(),
            has_more: self.registry.has_any_more(),
            has_special: self.registry.has_any_special(),
            has_skip_actions: self.registry.has_skip_actions(),
            has_more_actions: self.registry.has_more_actions(),
            state_set_size: self.state_set_size,
            lexical_states: self
                .lexical_states
                .iter()
                .map(|s| StateSummary {
                    name: s.name().to_string(),
                    nfa_states: s.nfa().states.len(),
                    wide_methods: s.wide_methods().len(),
                })
                .collect(),
            bit_vectors: self.encoder.bit_vectors().to_vec(),
            non_ascii_moves: self.encoder.methods().to_vec(),
            ordered_state_sets: self.state_sets.ordered().to_vec(),
        })
    }
}

/// One registry entry in the outbound snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSummary {
    pub label: String,
    pub private_def: bool,
    pub literal_image: Option<String>,
    pub lexical_state: usize,
}

/// One lexical state in the outbound snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateSummary {
    pub name: String,
    pub nfa_states: usize,
    pub wide_methods: usize,
}

/// Everything the scanner code generator consumes. Index values are part of
/// the contract: generated code hardcodes them as array offsets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LexerTables {
    pub tokens: Vec<TokenSummary>,
    pub token_members: Vec<Ordinal>,
    pub skip_members: Vec<Ordinal>,
    pub more_members: Vec<Ordinal>,
    pub special_members: Vec<Ordinal>,
    pub has_skip: bool,
    pub has_more: bool,
    pub has_special: bool,
    pub has_skip_actions: bool,
    pub has_more_actions: bool,
    pub state_set_size: usize,
    pub lexical_states: Vec<StateSummary>,
    pub bit_vectors: Vec<BitVec256>,
    pub non_ascii_moves: Vec<NonAsciiMove>,
    pub ordered_state_sets: Vec<Vec<StateId>>,
}

impl LexerTables {
    pub fn to_json_string(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json_str(json: &str) -> serde_json::Result<LexerTables> {
        serde_json::from_str(json)
    }
}

fn expand_state_set_size(current: &mut usize, size: usize) {
    if *current < size {
        *current = size;
    }
}

/// Returned when outbound tables are requested after fatal errors.
#[derive(Debug, Clone)]
pub struct GenerationBlocked {
    pub error_count: usize,
}

impl std::fmt::Display for GenerationBlocked {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "cannot emit lexer tables: {} configuration error(s) were reported",
            self.error_count
        )
    }
}

impl std::error::Error for GenerationBlocked {}
