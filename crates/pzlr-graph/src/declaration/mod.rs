//! Component declarations.
//!
//! A declaration names a component and lists what it builds on:
//!
//! ```text
//! package('b-foo')
//!     .extends('b-bar')
//!     .dependencies('b-baz')
//!     .libs('jquery');
//! ```
//!
//! The text form is parsed by [`parser`] without evaluating any code. The
//! record form ([`DeclarationRecord`]) is what appears in lock files and in
//! programmatic construction; [`Declaration::validate`] turns either into a
//! checked [`Declaration`].

pub mod parser;

pub use parser::{DeclarationParser, parse_if_declared};

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::block_name::{BlockType, is_block_name, is_block_reference};

/// Errors produced while reading a declaration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeclarationError {
    /// The text does not follow the `package(...)` call-chain grammar.
    #[error("Syntax error at offset {offset}: {message}")]
    Syntax { offset: usize, message: String },

    /// A field violates the component naming grammar.
    #[error("Invalid declaration field \"{field}\": {message}")]
    InvalidField { field: String, message: String },
}

impl DeclarationError {
    pub(crate) fn syntax(offset: usize, message: impl Into<String>) -> Self {
        DeclarationError::Syntax {
            offset,
            message: message.into(),
        }
    }

    pub(crate) fn field(field: impl Into<String>, message: impl Into<String>) -> Self {
        DeclarationError::InvalidField {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Name of the offending field, if the error concerns one.
    pub fn field_name(&self) -> Option<&str> {
        match self {
            DeclarationError::Syntax { .. } => None,
            DeclarationError::InvalidField { field, .. } => Some(field),
        }
    }
}

/// Unchecked declaration fields. Missing fields take their defaults during
/// validation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclarationRecord {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mixin: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependencies: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub libs: Option<Vec<String>>,
}

/// A validated component declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "DeclarationRecord", into = "DeclarationRecord")]
pub struct Declaration {
    name: String,
    block_type: BlockType,
    parent: Option<String>,
    mixin: bool,
    dependencies: Vec<String>,
    libs: Vec<String>,
}

impl Declaration {
    /// Parse declaration text. See [`DeclarationParser`] for a memoizing variant.
    pub fn parse(source: &str) -> Result<Self, DeclarationError> {
        parser::parse_record(source).and_then(Self::validate)
    }

    /// Check a record against the naming grammar and fill in defaults.
    pub fn validate(record: DeclarationRecord) -> Result<Self, DeclarationError> {
        let DeclarationRecord {
            name,
            parent,
            mixin,
            dependencies,
            libs,
        } = record;

        if !is_block_name(&name) {
            return Err(DeclarationError::field(
                "name",
                format!("\"{name}\" is not a valid block name"),
            ));
        }

        let block_type = BlockType::of(&name)
            .ok_or_else(|| DeclarationError::field("name", "unknown block type"))?;

        if let Some(parent) = parent.as_deref().filter(|p| !is_block_reference(p)) {
            return Err(DeclarationError::field(
                "parent",
                format!("\"{parent}\" is not a valid block reference"),
            ));
        }

        let dependencies = dependencies.unwrap_or_default();
        for (i, dependency) in dependencies.iter().enumerate() {
            if !is_block_reference(dependency) {
                return Err(DeclarationError::field(
                    format!("dependencies[{i}]"),
                    format!("\"{dependency}\" is not a valid block reference"),
                ));
            }
        }

        let libs = libs.unwrap_or_default();
        for (i, lib) in libs.iter().enumerate() {
            if !is_lib_name(lib) {
                return Err(DeclarationError::field(
                    format!("libs[{i}]"),
                    format!("{lib:?} is not a valid library identifier"),
                ));
            }
        }

        Ok(Self {
            name,
            block_type,
            parent,
            mixin: mixin.unwrap_or(false),
            dependencies,
            libs,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn block_type(&self) -> BlockType {
        self.block_type
    }

    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    pub fn is_mixin(&self) -> bool {
        self.mixin
    }

    /// Own dependencies in declaration order, duplicates included.
    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    pub fn libs(&self) -> &[String] {
        &self.libs
    }

    /// Fold a lower-layer declaration of the same component into this one.
    ///
    /// The parent is taken only if none is set; dependencies and libraries are
    /// merged keeping the first occurrence of each value.
    pub(crate) fn absorb(&mut self, ancestor: &Declaration) {
        if self.parent.is_none() {
            self.parent = ancestor.parent.clone();
        }
        self.dependencies = union(&self.dependencies, &ancestor.dependencies);
        self.libs = union(&self.libs, &ancestor.libs);
    }
}

/// Library identifiers are opaque but must survive the text form, where
/// list items are split on commas and trimmed.
fn is_lib_name(lib: &str) -> bool {
    !lib.is_empty()
        && lib.trim() == lib
        && !lib.chars().any(|c| c == ',' || c.is_control())
}

fn union(first: &[String], second: &[String]) -> Vec<String> {
    first
        .iter()
        .chain(second)
        .cloned()
        .collect::<IndexSet<_>>()
        .into_iter()
        .collect()
}

impl TryFrom<DeclarationRecord> for Declaration {
    type Error = DeclarationError;

    fn try_from(record: DeclarationRecord) -> Result<Self, Self::Error> {
        Self::validate(record)
    }
}

impl From<Declaration> for DeclarationRecord {
    fn from(declaration: Declaration) -> Self {
        DeclarationRecord {
            name: declaration.name,
            parent: declaration.parent,
            mixin: declaration.mixin.then_some(true),
            dependencies: Some(declaration.dependencies),
            libs: Some(declaration.libs),
        }
    }
}

impl FromStr for Declaration {
    type Err = DeclarationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn quote(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('\'');
    for c in value.chars() {
        match c {
            '\\' => quoted.push_str("\\\\"),
            '\'' => quoted.push_str("\\'"),
            '\n' => quoted.push_str("\\n"),
            '\r' => quoted.push_str("\\r"),
            '\t' => quoted.push_str("\\t"),
            c => quoted.push(c),
        }
    }
    quoted.push('\'');
    quoted
}

fn quote_list(values: &[String]) -> String {
    values
        .iter()
        .map(|v| quote(v))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Renders the declaration back into its text form.
impl fmt::Display for Declaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "package({})", quote(&self.name))?;

        if self.mixin {
            f.write_str("\n\t.mixin()")?;
        } else if let Some(parent) = &self.parent {
            write!(f, "\n\t.extends({})", quote(parent))?;
        }

        if !self.dependencies.is_empty() {
            write!(f, "\n\t.dependencies({})", quote_list(&self.dependencies))?;
        }

        if !self.libs.is_empty() {
            write!(f, "\n\t.libs({})", quote_list(&self.libs))?;
        }

        f.write_str(";")
    }
}
