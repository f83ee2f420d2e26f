//! Declaration text parser.
//!
//! The accepted language is a single call chain:
//!
//! ```text
//! package(<name>)
//!     [.extends(<name | null>) | .mixin()]
//!     [.dependencies(<args>)] [.libs(<args>)]
//! ```
//!
//! `dependencies` and `libs` may follow each other in either order. Arguments
//! are string literals (single, double or backtick quoted), arrays of strings,
//! or `null`/`undefined`. Each string is further split on commas. Leading
//! directive strings such as `'use strict';` and comments are ignored.

use dashmap::DashMap;
use std::sync::Arc;
use winnow::{
    Parser, Result as WResult,
    ascii::multispace1,
    combinator::{alt, delimited, eof, fail, opt, preceded, repeat, separated, terminated},
    error::{ContextError, StrContext},
    token::{any, one_of, take_till, take_until, take_while},
};

use super::{Declaration, DeclarationError, DeclarationRecord};

// Whitespace and comments between tokens
fn trivia(input: &mut &str) -> WResult<()> {
    repeat(0.., alt((multispace1.void(), line_comment, block_comment))).parse_next(input)
}

fn line_comment(input: &mut &str) -> WResult<()> {
    ("//", take_till(0.., '\n')).void().parse_next(input)
}

fn block_comment(input: &mut &str) -> WResult<()> {
    ("/*", take_until(0.., "*/"), "*/").void().parse_next(input)
}

// Parse identifier: ASCII alphanumeric, `_` and `$`, not starting with a digit
fn identifier<'s>(input: &mut &'s str) -> WResult<&'s str> {
    (
        one_of(|c: char| c.is_ascii_alphabetic() || c == '_' || c == '$'),
        take_while(0.., |c: char| c.is_ascii_alphanumeric() || c == '_' || c == '$'),
    )
        .take()
        .parse_next(input)
}

// Parse string literal: '...', "..." or `...` without interpolation
fn string_literal(input: &mut &str) -> WResult<String> {
    let quote = one_of(['\'', '"', '`']).parse_next(input)?;

    let mut value = String::new();
    loop {
        match any.parse_next(input)? {
            c if c == quote => return Ok(value),
            '$' if quote == '`' && input.starts_with('{') => {
                return fail
                    .context(StrContext::Label("template interpolation"))
                    .parse_next(input);
            }
            '\\' => match any.parse_next(input)? {
                'n' => value.push('\n'),
                't' => value.push('\t'),
                'r' => value.push('\r'),
                '0' => value.push('\0'),
                // Line continuation
                '\n' => {}
                c => value.push(c),
            },
            '\n' if quote != '`' => {
                return fail
                    .context(StrContext::Label("string literal"))
                    .parse_next(input);
            }
            c => value.push(c),
        }
    }
}

// `null` or `undefined`
fn null(input: &mut &str) -> WResult<()> {
    identifier
        .verify(|id: &str| matches!(id, "null" | "undefined"))
        .void()
        .parse_next(input)
}

#[derive(Debug, Clone)]
enum Arg {
    Str(String),
    Null,
    List(Vec<Option<String>>),
}

// Comma separated items, trailing comma allowed
fn comma_list<'s, O>(
    item: impl Parser<&'s str, O, ContextError>,
) -> impl Parser<&'s str, Vec<O>, ContextError> {
    terminated(
        separated(0.., terminated(item, trivia), (',', trivia)),
        opt((',', trivia)),
    )
}

// Parse array argument: ['a', null, "b"]
fn list(input: &mut &str) -> WResult<Vec<Option<String>>> {
    let item = alt((string_literal.map(Some), null.value(None)));
    delimited(('[', trivia), comma_list(item), ']')
        .context(StrContext::Label("array"))
        .parse_next(input)
}

fn arg(input: &mut &str) -> WResult<Arg> {
    alt((
        string_literal.map(Arg::Str),
        null.value(Arg::Null),
        list.map(Arg::List),
    ))
    .parse_next(input)
}

// Parse call arguments: ('a', ['b'], null)
fn call_args(input: &mut &str) -> WResult<Vec<Arg>> {
    delimited(('(', trivia), comma_list(arg), ')')
        .context(StrContext::Label("call arguments"))
        .parse_next(input)
}

// Leading directive strings: 'use strict';
fn directives(input: &mut &str) -> WResult<()> {
    repeat(0.., (string_literal, trivia, opt(';'), trivia)).parse_next(input)
}

/// Position in the call chain, deciding which method may come next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Package,
    Head,
    Dependencies,
    Libs,
}

impl Stage {
    fn allows(self, method: &str) -> bool {
        match method {
            "extends" | "mixin" => self == Stage::Package,
            "dependencies" => self != Stage::Dependencies,
            "libs" => self != Stage::Libs,
            _ => false,
        }
    }
}

/// Remaining input plus the source it was sliced from, for error offsets.
struct Cursor<'s> {
    source: &'s str,
    rest: &'s str,
}

impl<'s> Cursor<'s> {
    fn offset(&self) -> usize {
        self.source.len() - self.rest.len()
    }

    fn run<O>(
        &mut self,
        mut parser: impl Parser<&'s str, O, ContextError>,
    ) -> Result<O, DeclarationError> {
        parser.parse_next(&mut self.rest).map_err(|error| {
            let mut message = error.to_string();
            if message.is_empty() {
                message = "unexpected input".to_string();
            }
            DeclarationError::syntax(self.offset(), message)
        })
    }
}

/// Flatten call arguments into a list of names.
fn flatten(args: Vec<Arg>) -> Vec<String> {
    let mut names = Vec::new();
    let mut push = |value: &str| {
        names.extend(
            value
                .split(',')
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string),
        );
    };

    for arg in args {
        match arg {
            Arg::Str(value) => push(value.as_str()),
            Arg::Null => {}
            Arg::List(items) => items.iter().flatten().for_each(|v| push(v.as_str())),
        }
    }

    names
}

/// Parse declaration text into an unchecked record.
pub(crate) fn parse_record(source: &str) -> Result<DeclarationRecord, DeclarationError> {
    let mut cursor = Cursor {
        source,
        rest: source,
    };

    cursor.run((trivia, directives))?;

    let offset = cursor.offset();
    if cursor.run(identifier)? != "package" {
        return Err(DeclarationError::syntax(offset, "expected package(...)"));
    }

    let name = match cursor.run(preceded(trivia, call_args))?.into_iter().next() {
        Some(Arg::Str(name)) => name,
        _ => return Err(DeclarationError::field("name", "a block name is required")),
    };

    let mut record = DeclarationRecord {
        name,
        ..Default::default()
    };

    let mut stage = Stage::Package;
    while cursor.run(preceded(trivia, opt('.')))?.is_some() {
        cursor.run(trivia)?;
        let offset = cursor.offset();
        let method = cursor.run(identifier)?;
        if !stage.allows(method) {
            return Err(DeclarationError::syntax(
                offset,
                format!(".{method}() is not allowed here"),
            ));
        }

        let args = cursor.run(preceded(trivia, call_args))?;
        stage = match method {
            "extends" => {
                record.parent = match args.into_iter().next() {
                    Some(Arg::Str(parent)) => Some(parent),
                    Some(Arg::Null) | None => None,
                    Some(Arg::List(_)) => {
                        return Err(DeclarationError::field("parent", "expected a single name"));
                    }
                };
                Stage::Head
            }
            "mixin" => {
                record.mixin = Some(true);
                Stage::Head
            }
            "dependencies" => {
                record.dependencies = Some(flatten(args));
                Stage::Dependencies
            }
            _ => {
                record.libs = Some(flatten(args));
                Stage::Libs
            }
        };
    }

    cursor
        .run((opt(';'), trivia, eof))
        .map_err(|_| DeclarationError::syntax(cursor.offset(), "unexpected input after declaration"))?;

    Ok(record)
}

/// Parse `source` only if it contains a declaration at all.
///
/// Returns `None` for files without a `package(` call.
pub fn parse_if_declared(source: &str) -> Option<Result<Declaration, DeclarationError>> {
    source.contains("package(").then(|| Declaration::parse(source))
}

/// Memoizing declaration parser.
///
/// Results are keyed by the exact source text, so identical manifests in
/// several layers (or reread after a touch) are parsed once.
#[derive(Debug, Clone, Default)]
pub struct DeclarationParser {
    cache: Arc<DashMap<String, Result<Declaration, DeclarationError>>>,
}

impl DeclarationParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(&self, source: &str) -> Result<Declaration, DeclarationError> {
        if let Some(hit) = self.cache.get(source) {
            return hit.value().clone();
        }

        let result = Declaration::parse(source);
        self.cache.insert(source.to_string(), result.clone());
        result
    }

    /// Number of distinct sources seen.
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_chain() {
        let decl = Declaration::parse(
            "package('b-foo')\n\t.extends('b-bar')\n\t.dependencies('b-baz')\n\t.libs('jquery');",
        )
        .unwrap();

        assert_eq!(decl.name(), "b-foo");
        assert_eq!(decl.parent(), Some("b-bar"));
        assert_eq!(decl.dependencies(), ["b-baz"]);
        assert_eq!(decl.libs(), ["jquery"]);
    }

    #[test]
    fn parses_mixin_form() {
        let decl = Declaration::parse("package('b-foo').mixin();").unwrap();
        assert!(decl.is_mixin());
        assert_eq!(decl.parent(), None);
    }

    #[test]
    fn libs_may_precede_dependencies() {
        let decl =
            Declaration::parse("package(\"b-foo\").libs(`a`, 'b').dependencies(['b-x', null])")
                .unwrap();
        assert_eq!(decl.libs(), ["a", "b"]);
        assert_eq!(decl.dependencies(), ["b-x"]);
    }

    #[test]
    fn comma_separated_strings_are_split() {
        let decl = Declaration::parse("package('b-foo').dependencies('b-a, b-b ,b-c', 'b-a')")
            .unwrap();
        assert_eq!(decl.dependencies(), ["b-a", "b-b", "b-c", "b-a"]);
    }

    #[test]
    fn null_parent_means_none() {
        let decl = Declaration::parse("package('b-foo').extends(null);").unwrap();
        assert_eq!(decl.parent(), None);
    }

    #[test]
    fn header_comments_and_directives_are_ignored() {
        let source = "'use strict';\n\n/*!\n * Header\n */\n\n// note\npackage('i-block') // trailing\n\t.dependencies('b-a');\n";
        let decl = Declaration::parse(source).unwrap();
        assert_eq!(decl.name(), "i-block");
        assert_eq!(decl.dependencies(), ["b-a"]);
    }

    #[test]
    fn escaped_quotes_survive() {
        let decl = Declaration::parse(r"package('b-foo').libs('it\'s')").unwrap();
        assert_eq!(decl.libs(), ["it's"]);
    }

    #[test]
    fn rejects_extends_after_mixin() {
        let err = Declaration::parse("package('b-foo').mixin().extends('b-bar')").unwrap_err();
        assert!(matches!(err, DeclarationError::Syntax { .. }));
    }

    #[test]
    fn rejects_repeated_dependencies_call() {
        let err =
            Declaration::parse("package('b-foo').dependencies('b-a').dependencies('b-b')")
                .unwrap_err();
        assert!(matches!(err, DeclarationError::Syntax { .. }));
    }

    #[test]
    fn rejects_arbitrary_code() {
        for source in [
            "require('fs').unlinkSync('/')",
            "package('b-foo'); process.exit(1)",
            "package(name)",
            "package(`b-${x}`)",
            "package('b-foo').extends('b-bar'",
        ] {
            assert!(Declaration::parse(source).is_err(), "{source}");
        }
    }

    #[test]
    fn invalid_names_are_field_errors() {
        let err = Declaration::parse("package('foo')").unwrap_err();
        assert_eq!(err.field_name(), Some("name"));

        let err = Declaration::parse("package()").unwrap_err();
        assert_eq!(err.field_name(), Some("name"));
    }

    #[test]
    fn parse_if_declared_skips_plain_files() {
        assert!(parse_if_declared("export default 1;").is_none());
        assert!(parse_if_declared("package('b-foo');").unwrap().is_ok());
    }

    #[test]
    fn parser_memoizes_by_source() {
        let parser = DeclarationParser::new();
        let a = parser.parse("package('b-foo');").unwrap();
        let b = parser.parse("package('b-foo');").unwrap();
        parser.parse("package('b-bar');").unwrap();
        assert!(parser.parse("package('nope');").is_err());

        assert_eq!(a, b);
        assert_eq!(parser.len(), 3);
    }

    #[test]
    fn serialized_form_parses_back() {
        let decl = Declaration::parse(
            "package('b-foo').extends('core/b-bar').dependencies('@b-a', 'b-b').libs('x.y')",
        )
        .unwrap();
        assert_eq!(Declaration::parse(&decl.to_string()).unwrap(), decl);
    }
}
