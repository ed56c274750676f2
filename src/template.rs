use crate::model::{AliasTable, FileMetadata};
use crate::path_norm::{self, PLACEHOLDER};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::MAIN_SEPARATOR;
use thiserror::Error;

/// The fixed set of metadata placeholders a naming template may reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldKind {
    Year,
    Month,
    Day,
    Hour,
    Minute,
    Second,
    Model,
    Alias,
    Prefix,
    Number,
    TypeShort,
    TypeLong,
    OriginalName,
}

impl FieldKind {
    pub const ALL: [FieldKind; 13] = [
        FieldKind::Year,
        FieldKind::Month,
        FieldKind::Day,
        FieldKind::Hour,
        FieldKind::Minute,
        FieldKind::Second,
        FieldKind::Model,
        FieldKind::Alias,
        FieldKind::Prefix,
        FieldKind::Number,
        FieldKind::TypeShort,
        FieldKind::TypeLong,
        FieldKind::OriginalName,
    ];

    /// Short mnemonic accepted inside braces, e.g. `{y}`.
    pub fn short_name(self) -> &'static str {
        match self {
            FieldKind::Year => "y",
            FieldKind::Month => "mon",
            FieldKind::Day => "d",
            FieldKind::Hour => "h",
            FieldKind::Minute => "m",
            FieldKind::Second => "s",
            FieldKind::Model => "o",
            FieldKind::Alias => "a",
            FieldKind::Prefix => "p",
            FieldKind::Number => "n",
            FieldKind::TypeShort => "t",
            FieldKind::TypeLong => "l",
            FieldKind::OriginalName => "f",
        }
    }

    /// Long name accepted inside braces and produced by `Display`.
    pub fn long_name(self) -> &'static str {
        match self {
            FieldKind::Year => "year",
            FieldKind::Month => "month",
            FieldKind::Day => "day",
            FieldKind::Hour => "hour",
            FieldKind::Minute => "minute",
            FieldKind::Second => "second",
            FieldKind::Model => "model",
            FieldKind::Alias => "alias",
            FieldKind::Prefix => "prefix",
            FieldKind::Number => "number",
            FieldKind::TypeShort => "type",
            FieldKind::TypeLong => "longtype",
            FieldKind::OriginalName => "filename",
        }
    }

    /// Matches an already trimmed, lower-cased field name.
    pub fn from_name(name: &str) -> Option<FieldKind> {
        Self::ALL
            .iter()
            .copied()
            .find(|field| name == field.short_name() || name == field.long_name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateNode {
    Literal(String),
    Field(FieldKind),
}

/// Compile error: 0-based character offset into the template string plus
/// the reason. A template that fails to compile must not be used.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("offset {position}: {reason}")]
pub struct TemplateError {
    pub position: usize,
    pub reason: TemplateErrorReason,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateErrorReason {
    #[error("empty template")]
    Empty,
    #[error("empty field name")]
    EmptyField,
    #[error("unknown field name `{0}`")]
    UnknownField(String),
    #[error("unterminated field reference")]
    UnterminatedField,
    #[error("unexpected `{0}`")]
    UnexpectedBrace(char),
    #[error("literal text contains reserved characters `{0}`")]
    ReservedChars(String),
    #[error("template must not start or end with `.`")]
    DotBoundary,
}

fn err(position: usize, reason: TemplateErrorReason) -> TemplateError {
    TemplateError { position, reason }
}

/// A compiled naming template: an ordered sequence of literal runs and
/// field references. Immutable once built, so a single instance can be
/// shared by any number of files.
///
/// The native path separator in literal text is a directory boundary at
/// evaluation time; that is how templates create subdirectories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    nodes: Vec<TemplateNode>,
}

/// Evaluation output. The extension is always the source file's own
/// lower-cased extension; templates never control it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedName {
    pub directory: String,
    pub base: String,
    pub extension: String,
}

impl Template {
    pub fn compile(input: &str) -> Result<Self, TemplateError> {
        let chars: Vec<char> = input.chars().collect();

        // A leading separator would only produce an empty first path
        // component; strip it silently.
        let mut start = 0;
        while start < chars.len() && chars[start] == MAIN_SEPARATOR {
            start += 1;
        }
        if start >= chars.len() {
            return Err(err(start, TemplateErrorReason::Empty));
        }
        if chars[start] == '.' {
            return Err(err(start, TemplateErrorReason::DotBoundary));
        }
        if chars[chars.len() - 1] == '.' {
            return Err(err(chars.len() - 1, TemplateErrorReason::DotBoundary));
        }

        let mut nodes: Vec<TemplateNode> = Vec::new();
        let mut literal = String::new();
        let mut literal_start = start;
        let mut i = start;

        while i < chars.len() {
            match chars[i] {
                // A doubled delimiter escapes to one literal character.
                '{' if chars.get(i + 1) == Some(&'{') => {
                    literal.push('{');
                    i += 2;
                }
                '}' if chars.get(i + 1) == Some(&'}') => {
                    literal.push('}');
                    i += 2;
                }
                '}' => return Err(err(i, TemplateErrorReason::UnexpectedBrace('}'))),
                '{' => {
                    flush_literal(&mut nodes, &mut literal, literal_start)?;
                    let field_start = i + 1;
                    let mut j = field_start;
                    while j < chars.len() && chars[j] != '}' {
                        if chars[j] == '{' {
                            return Err(err(j, TemplateErrorReason::UnexpectedBrace('{')));
                        }
                        j += 1;
                    }
                    if j >= chars.len() {
                        return Err(err(chars.len(), TemplateErrorReason::UnterminatedField));
                    }
                    let name: String = chars[field_start..j].iter().collect();
                    let name = name.trim().to_lowercase();
                    if name.is_empty() {
                        return Err(err(j, TemplateErrorReason::EmptyField));
                    }
                    let field = FieldKind::from_name(&name)
                        .ok_or_else(|| err(j, TemplateErrorReason::UnknownField(name)))?;
                    nodes.push(TemplateNode::Field(field));
                    i = j + 1;
                    literal_start = i;
                }
                c => {
                    literal.push(c);
                    i += 1;
                }
            }
        }
        flush_literal(&mut nodes, &mut literal, literal_start)?;

        if nodes.is_empty() {
            return Err(err(start, TemplateErrorReason::Empty));
        }
        Ok(Self { nodes })
    }

    pub fn nodes(&self) -> &[TemplateNode] {
        &self.nodes
    }

    /// Renders the template against a file's metadata. Fields resolving
    /// to an empty value substitute a placeholder character so that no
    /// path component ever becomes empty. Everything up to the last
    /// separator is the relative directory, the rest is the base name.
    pub fn render(&self, metadata: &FileMetadata, aliases: &AliasTable) -> RenderedName {
        let mut out = String::new();
        for node in &self.nodes {
            match node {
                TemplateNode::Literal(text) => out.push_str(text),
                TemplateNode::Field(field) => out.push_str(&field_value(*field, metadata, aliases)),
            }
        }

        let (directory, base) = match out.rfind(MAIN_SEPARATOR) {
            Some(pos) => (out[..pos].to_string(), out[pos + 1..].to_string()),
            None => (String::new(), out),
        };
        RenderedName {
            directory,
            base,
            extension: metadata.extension.clone(),
        }
    }
}

fn flush_literal(
    nodes: &mut Vec<TemplateNode>,
    literal: &mut String,
    run_start: usize,
) -> Result<(), TemplateError> {
    if literal.is_empty() {
        return Ok(());
    }
    let reserved: String = literal
        .chars()
        .filter(|c| path_norm::is_reserved_template_char(*c))
        .collect();
    if !reserved.is_empty() {
        return Err(err(run_start, TemplateErrorReason::ReservedChars(reserved)));
    }
    let text = std::mem::take(literal);
    // Adjacent runs coalesce so a template round-trips through Display
    // to an equal node sequence.
    if let Some(TemplateNode::Literal(prev)) = nodes.last_mut() {
        prev.push_str(&text);
    } else {
        nodes.push(TemplateNode::Literal(text));
    }
    Ok(())
}

fn field_value(field: FieldKind, metadata: &FileMetadata, aliases: &AliasTable) -> String {
    let value = match field {
        FieldKind::Year => metadata.year.clone(),
        FieldKind::Month => metadata.month.clone(),
        FieldKind::Day => metadata.day.clone(),
        FieldKind::Hour => metadata.hour.clone(),
        FieldKind::Minute => metadata.minute.clone(),
        FieldKind::Second => metadata.second.clone(),
        FieldKind::Model => metadata.model.clone(),
        FieldKind::Alias => {
            if metadata.model.is_empty() {
                String::new()
            } else {
                aliases
                    .get(&metadata.model.to_lowercase())
                    .cloned()
                    .unwrap_or_default()
            }
        }
        FieldKind::Prefix => metadata.prefix.clone(),
        FieldKind::Number => metadata.number.clone(),
        FieldKind::TypeShort => metadata.kind.short_str().to_string(),
        FieldKind::TypeLong => metadata.kind.long_str().to_string(),
        FieldKind::OriginalName => metadata.original_stem.clone(),
    };
    if value.is_empty() {
        PLACEHOLDER.to_string()
    } else {
        value
    }
}

impl fmt::Display for Template {
    /// Parseable form: literal braces doubled, fields as `{longname}`.
    fn fmt(&self, out: &mut fmt::Formatter<'_>) -> fmt::Result {
        for node in &self.nodes {
            match node {
                TemplateNode::Literal(text) => {
                    for c in text.chars() {
                        match c {
                            '{' => out.write_str("{{")?,
                            '}' => out.write_str("}}")?,
                            _ => write!(out, "{}", c)?,
                        }
                    }
                }
                TemplateNode::Field(field) => write!(out, "{{{}}}", field.long_name())?,
            }
        }
        Ok(())
    }
}
