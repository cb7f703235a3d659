//! Static dead-pattern detection for choice constructs.
//!
//! Under longest-match-first-declared-wins semantics, an alternative that
//! was declared earlier in the same lexical state always wins a tie against
//! a later choice containing it, so the choice can never be selected when
//! both match the same input. The finding is advisory: the shadowed choice
//! still gets a valid ordinal and label, it just cannot win at scan time.

use crate::diagnostics::Diagnostics;
use crate::registry::Ordinal;

/// One alternative inside a choice construct. Alternatives that are inline
/// patterns rather than references to declared definitions carry ordinal 0
/// and are never reported.
#[derive(Debug, Clone)]
pub struct ChoiceAlt {
    pub ordinal: Ordinal,
    pub label: String,
    pub private_def: bool,
    /// Primary (first-declared) lexical state of the referenced definition.
    pub lexical_state: usize,
}

/// A compiled choice-of-alternatives construct, as produced by lexical-state
/// processing.
#[derive(Debug, Clone)]
pub struct ChoiceInfo {
    pub ordinal: Ordinal,
    pub label: String,
    pub lexical_state: usize,
    pub alternatives: Vec<ChoiceAlt>,
}

/// Warn about every alternative that shadows `choice`: not private, a
/// strictly positive ordinal strictly below the choice's own, and declared
/// in the same lexical state.
///
/// TODO: a definition reachable from multiple lexical states is only
/// checked against shadowing within its primary state; cross-state
/// shadowing goes undetected.
pub fn check_unmatchability(choice: &ChoiceInfo, diagnostics: &mut Diagnostics) {
    for alt in &choice.alternatives {
        if !alt.private_def
            && alt.ordinal > 0
            && alt.ordinal < choice.ordinal
            && alt.lexical_state == choice.lexical_state
        {
            diagnostics.add_warning(
                &choice.label,
                format!(
                    "regular expression {} can never be matched as {}",
                    alt.label, choice.label
                ),
            );
        }
    }
}
