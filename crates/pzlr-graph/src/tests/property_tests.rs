//! Property-based tests for declarations and block names.
//!
//! Run with: cargo test --features proptest --package pzlr-graph property_tests

#![cfg(feature = "proptest")]

use crate::block_name::{BlockType, is_block_name};
use crate::declaration::{Declaration, DeclarationParser, DeclarationRecord};
use proptest::prelude::*;

/// Strategy for valid block names such as `b-foo` or `i-base_2`.
fn block_name_strategy() -> impl Strategy<Value = String> {
    "[ibpgv]-[a-z0-9][a-z0-9_-]{0,10}"
}

/// Strategy for dependency references, optionally `@` or package prefixed.
fn reference_strategy() -> impl Strategy<Value = String> {
    (
        prop_oneof![Just(String::new()), Just("@".to_string()), "[a-z]{1,6}/"],
        block_name_strategy(),
    )
        .prop_map(|(prefix, name)| format!("{prefix}{name}"))
}

/// Library identifiers, including inner spaces, quotes and backslashes.
fn lib_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z@./][a-zA-Z0-9@/._ '\"`$\\\\-]{0,14}[a-zA-Z0-9]"
}

fn record_strategy() -> impl Strategy<Value = DeclarationRecord> {
    (
        block_name_strategy(),
        prop::option::of(reference_strategy()),
        prop::bool::ANY,
        prop::collection::vec(reference_strategy(), 0..5),
        prop::collection::vec(lib_strategy(), 0..5),
    )
        .prop_map(|(name, parent, mixin, dependencies, libs)| DeclarationRecord {
            name,
            // The text form carries either a parent or the mixin flag.
            parent: if mixin { None } else { parent },
            mixin: Some(mixin),
            dependencies: Some(dependencies),
            libs: Some(libs),
        })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// validate(parse(serialize(validate(d)))) == validate(d)
    #[test]
    fn prop_declaration_text_round_trip(record in record_strategy()) {
        let declaration = Declaration::validate(record).unwrap();
        let text = declaration.to_string();

        let parsed = Declaration::parse(&text).unwrap();
        prop_assert_eq!(&parsed, &declaration);

        let cached = DeclarationParser::new();
        prop_assert_eq!(cached.parse(&text).unwrap(), declaration.clone());
        prop_assert_eq!(cached.parse(&text).unwrap(), declaration);
        prop_assert_eq!(cached.len(), 1);
    }

    /// Records survive the JSON shape used by lock files.
    #[test]
    fn prop_declaration_record_round_trip(record in record_strategy()) {
        let declaration = Declaration::validate(record).unwrap();
        let json = serde_json::to_string(&declaration).unwrap();
        let back: Declaration = serde_json::from_str(&json).unwrap();
        prop_assert_eq!(back, declaration);
    }

    /// Any library string is either rejected up front or survives the text form.
    #[test]
    fn prop_accepted_libs_round_trip(lib in "\\PC{0,12}|[ ,\t\n\\\\'a-z]{0,12}") {
        let record = DeclarationRecord {
            name: "b-foo".to_string(),
            libs: Some(vec![lib]),
            ..Default::default()
        };
        if let Ok(declaration) = Declaration::validate(record) {
            let parsed = Declaration::parse(&declaration.to_string()).unwrap();
            prop_assert_eq!(parsed, declaration);
        }
    }

    /// Every generated name is accepted and typed by its first character.
    #[test]
    fn prop_block_type_follows_prefix(name in block_name_strategy()) {
        prop_assert!(is_block_name(&name));
        let code = name.chars().next().unwrap();
        prop_assert_eq!(BlockType::of(&name), BlockType::from_code(code));
    }

    /// Parsing never panics on arbitrary input.
    #[test]
    fn prop_parse_never_panics(source in ".{0,200}") {
        let _ = Declaration::parse(&source);
    }
}
