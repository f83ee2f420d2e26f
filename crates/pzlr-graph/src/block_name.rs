//! Component naming grammar.
//!
//! A block name is a type character, a dash and a lowercase identifier
//! (`b-button`, `p-index`). References to other blocks may additionally be
//! prefixed with `@` or with a dependency package path (`core/b-button`).

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

static BLOCK_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[ibpgv]-[a-z0-9][a-z0-9\-_]*$").expect("block name regex"));

static BLOCK_REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(@|[a-z][a-z0-9\-_]*/)?[ibpgv]-[a-z0-9][a-z0-9\-_]*$")
        .expect("block reference regex")
});

/// Kind of component, derived from the first character of its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockType {
    Interface,
    Block,
    Page,
    Global,
    Virtual,
}

impl BlockType {
    /// Every type, in type-code order.
    pub const ALL: [BlockType; 5] = [
        BlockType::Interface,
        BlockType::Block,
        BlockType::Page,
        BlockType::Global,
        BlockType::Virtual,
    ];

    pub fn from_code(code: char) -> Option<Self> {
        match code {
            'i' => Some(BlockType::Interface),
            'b' => Some(BlockType::Block),
            'p' => Some(BlockType::Page),
            'g' => Some(BlockType::Global),
            'v' => Some(BlockType::Virtual),
            _ => None,
        }
    }

    pub fn code(self) -> char {
        match self {
            BlockType::Interface => 'i',
            BlockType::Block => 'b',
            BlockType::Page => 'p',
            BlockType::Global => 'g',
            BlockType::Virtual => 'v',
        }
    }

    /// Type of a block name, `None` when the name is not a block name.
    pub fn of(name: &str) -> Option<Self> {
        if !is_block_name(name) {
            return None;
        }
        name.chars().next().and_then(Self::from_code)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BlockType::Interface => "interface",
            BlockType::Block => "block",
            BlockType::Page => "page",
            BlockType::Global => "global",
            BlockType::Virtual => "virtual",
        }
    }
}

impl fmt::Display for BlockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returns true if `name` is a plain block name.
pub fn is_block_name(name: &str) -> bool {
    BLOCK_NAME.is_match(name)
}

/// Returns true if `name` may be used as a parent or dependency reference.
pub fn is_block_reference(name: &str) -> bool {
    BLOCK_REFERENCE.is_match(name)
}

/// Glob character class matching every type code, e.g. `[ibpgv]`.
pub(crate) fn type_code_class() -> String {
    let codes: String = BlockType::ALL.iter().map(|t| t.code()).collect();
    format!("[{codes}]")
}
