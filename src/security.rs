//! Identifier validation and escaping for SQL built from tool arguments.
//!
//! Table names passed to `get_table_details` are spliced into SQL text, so they
//! are validated and wrapped in bracket notation first.

use crate::error::ServerError;

/// Maximum length for SQL Server identifiers.
pub const MAX_IDENTIFIER_LENGTH: usize = 128;

/// Character sequences never accepted inside a table name.
const FORBIDDEN_SEQUENCES: [&str; 8] = ["--", "/*", "*/", ";", "'", "\"", "\\", "\x00"];

/// A table name split into optional schema and local name, both unquoted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualifiedName {
    pub schema: Option<String>,
    pub name: String,
}

impl QualifiedName {
    /// Bracket-escaped form, e.g. `[dbo].[Sales]`.
    pub fn escaped(&self) -> String {
        match &self.schema {
            Some(schema) => format!("{}.{}", quote(schema), quote(&self.name)),
            None => quote(&self.name),
        }
    }
}

/// Reject identifiers that are empty, too long or contain SQL metacharacters.
pub fn validate_identifier(identifier: &str) -> Result<(), ServerError> {
    let trimmed = identifier.trim();
    if trimmed.is_empty() {
        return Err(ServerError::invalid_input("Table name cannot be empty"));
    }

    if trimmed.len() > MAX_IDENTIFIER_LENGTH * 2 + 1 {
        return Err(ServerError::invalid_input(format!(
            "Table name exceeds maximum length of {} characters",
            MAX_IDENTIFIER_LENGTH
        )));
    }

    if let Some(pattern) = FORBIDDEN_SEQUENCES.iter().find(|p| trimmed.contains(*p)) {
        return Err(ServerError::invalid_input(format!(
            "Table name contains forbidden character sequence: {}",
            pattern.escape_debug()
        )));
    }

    Ok(())
}

/// Split `schema.name` (either part optionally bracketed).
///
/// Dots inside brackets are part of the name.
pub fn parse_qualified_name(identifier: &str) -> Result<QualifiedName, ServerError> {
    let parts = split_parts(identifier.trim());

    let (schema, name) = match parts.as_slice() {
        [name] => (None, name.as_str()),
        [schema, name] => (Some(schema.as_str()), name.as_str()),
        _ => {
            return Err(ServerError::invalid_input(format!(
                "Expected `table` or `schema.table`, got '{}'",
                identifier
            )))
        }
    };

    let schema = schema.map(unquote).transpose()?;
    let name = unquote(name)?;

    Ok(QualifiedName { schema, name })
}

/// Validate and escape a possibly qualified table name.
pub fn safe_table_name(identifier: &str) -> Result<QualifiedName, ServerError> {
    validate_identifier(identifier)?;
    parse_qualified_name(identifier)
}

fn split_parts(identifier: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut in_brackets = false;

    for c in identifier.chars() {
        match c {
            '[' => {
                in_brackets = true;
                current.push(c);
            }
            ']' => {
                in_brackets = false;
                current.push(c);
            }
            '.' if !in_brackets => parts.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    parts.push(current);
    parts
}

fn unquote(part: &str) -> Result<String, ServerError> {
    let trimmed = part.trim();
    let clean = trimmed
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .unwrap_or(trimmed)
        .trim();

    if clean.is_empty() {
        return Err(ServerError::invalid_input("Identifier part cannot be empty"));
    }
    if clean.len() > MAX_IDENTIFIER_LENGTH {
        return Err(ServerError::invalid_input(format!(
            "Identifier exceeds maximum length of {} characters",
            MAX_IDENTIFIER_LENGTH
        )));
    }

    Ok(clean.to_string())
}

fn quote(part: &str) -> String {
    format!("[{}]", part.replace(']', "]]"))
}
