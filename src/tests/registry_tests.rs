//! Registry behavior as seen through the full generation surface.

use crate::{
    Diagnostics, LexerConfig, LexerData, Pattern, TokenCategory, TokenProduction, TokenRule,
};

/// Helper: a one-rule normal-token production in the default state.
fn token(label: &str, pattern: Pattern) -> TokenProduction {
    TokenProduction::tokens(vec![TokenRule::new(label, pattern)])
}

fn letters_plus() -> Pattern {
    Pattern::plus(Pattern::char_class(vec![
        (b'a' as u16, b'z' as u16),
        (b'A' as u16, b'Z' as u16),
    ]))
}

#[test]
fn test_eof_plus_ident_scenario() {
    let mut data = LexerData::new(LexerConfig::default());
    data.add_token_production(token("PLUS", Pattern::literal("+")));
    data.add_token_production(token("IDENT", letters_plus()));

    let mut diags = Diagnostics::new();
    data.build_data(&mut diags);

    assert_eq!(data.token_count(), 3);
    assert_eq!(data.token_name(0), "EOF");
    assert_eq!(data.string_literal_label("+"), Some("PLUS"));
    assert_eq!(data.token_name(2), "IDENT");
    assert!(!diags.has_errors());
}

#[test]
fn test_label_synthesis_through_build() {
    let mut data = LexerData::new(LexerConfig::default());
    for i in 1..5 {
        data.add_token_production(token(&format!("T{}", i), Pattern::literal(format!("x{}", i))));
    }
    // Position 5, invalid identifier label.
    data.add_token_production(token("2x", letters_plus()));
    // Anonymous keyword literal gets its upper-cased image.
    data.add_token_production(token("", Pattern::literal("while")));

    let mut diags = Diagnostics::new();
    data.build_data(&mut diags);

    assert_eq!(data.token_name(5), "_TOKEN_5");
    assert_eq!(data.token_name(6), "WHILE");
}

#[test]
fn test_classification_summaries_through_build() {
    let mut data = LexerData::new(LexerConfig::default());
    data.add_token_production(TokenProduction {
        lexical_states: Vec::new(),
        kind: TokenCategory::Skip,
        rules: vec![TokenRule {
            label: "WS".to_string(),
            pattern: Pattern::plus(Pattern::char_class(vec![(b' ' as u16, b' ' as u16)])),
            private_def: false,
            has_action: true,
        }],
    });
    data.add_token_production(TokenProduction {
        lexical_states: Vec::new(),
        kind: TokenCategory::Special,
        rules: vec![TokenRule::new(
            "COMMENT",
            Pattern::Sequence(vec![
                Pattern::literal("//"),
                Pattern::star(Pattern::CharClass {
                    ranges: vec![(b'\n' as u16, b'\n' as u16)],
                    negated: true,
                }),
            ]),
        )],
    });
    data.add_token_production(token("IDENT", letters_plus()));

    let mut diags = Diagnostics::new();
    data.build_data(&mut diags);
    let registry = data.registry();

    assert!(registry.has_any_skip());
    assert!(registry.has_skip_actions());
    assert!(registry.has_any_special());
    assert!(!registry.has_any_more());
    assert!(!registry.has_more_actions());

    // Ordinal 0 is always in the token set; each other ordinal sits in
    // exactly one set.
    assert!(registry.has_token(0));
    for ordinal in 1..registry.token_count() as u32 {
        let memberships = [
            registry.has_token(ordinal),
            registry.has_skip(ordinal),
            registry.has_more(ordinal),
            registry.has_special(ordinal),
        ];
        assert_eq!(
            memberships.iter().filter(|&&m| m).count(),
            1,
            "ordinal {} must be in exactly one set",
            ordinal
        );
    }
}

#[test]
fn test_more_category_registered() {
    let mut data = LexerData::new(LexerConfig::default());
    data.add_lexical_state("IN_STRING");
    data.add_token_production(TokenProduction {
        lexical_states: vec!["IN_STRING".to_string()],
        kind: TokenCategory::More,
        rules: vec![TokenRule::new(
            "STRING_CHAR",
            Pattern::CharClass { ranges: vec![(b'"' as u16, b'"' as u16)], negated: true },
        )],
    });

    let mut diags = Diagnostics::new();
    data.build_data(&mut diags);

    assert!(data.registry().has_any_more());
    assert!(!data.registry().has_more_actions());
    assert!(!diags.has_errors());
}
