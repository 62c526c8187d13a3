//! Column metadata consumed by the constraint sanitizer and the repository.

use crate::models::entity::AttributeValue;

/// Storage class of a column, following SQLite's type-affinity rules.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColumnKind {
    Integer,
    Real,
    Numeric,
    Text,
    Blob,
}

impl ColumnKind {
    /// Derive the affinity from a declared column type such as `VARCHAR(64)`.
    pub fn from_declared(declared: &str) -> Self {
        let upper = declared.to_ascii_uppercase();
        if upper.contains("INT") {
            Self::Integer
        } else if upper.contains("CHAR") || upper.contains("CLOB") || upper.contains("TEXT") {
            Self::Text
        } else if upper.is_empty() || upper.contains("BLOB") {
            Self::Blob
        } else if upper.contains("REAL") || upper.contains("FLOA") || upper.contains("DOUB") {
            Self::Real
        } else {
            Self::Numeric
        }
    }

    pub fn is_numeric(self) -> bool {
        matches!(self, Self::Integer | Self::Real | Self::Numeric)
    }

    /// Zero of this kind, or `None` for non-numeric columns.
    pub fn zero_value(self) -> Option<AttributeValue> {
        match self {
            Self::Integer | Self::Numeric => Some(AttributeValue::Integer(0)),
            Self::Real => Some(AttributeValue::Real(0.0)),
            Self::Text | Self::Blob => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ColumnMeta {
    pub name: String,
    pub kind: ColumnKind,
    pub nullable: bool,
    /// Declared default, when it is a plain literal.
    pub default: Option<AttributeValue>,
    /// Any default is declared, including expressions like `CURRENT_TIMESTAMP`.
    pub has_default: bool,
    pub primary_key: bool,
}

impl ColumnMeta {
    pub fn new(name: impl Into<String>, kind: ColumnKind) -> Self {
        Self {
            name: name.into(),
            kind,
            nullable: true,
            default: None,
            has_default: false,
            primary_key: false,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn with_default(mut self, default: AttributeValue) -> Self {
        self.default = Some(default);
        self.has_default = true;
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    /// Whether an insert must supply a value for this column.
    pub fn is_required(&self) -> bool {
        !self.nullable && !self.has_default && !self.primary_key
    }
}

/// Parse the literal text SQLite reports as a column default.
///
/// Expressions such as `CURRENT_TIMESTAMP` yield `None`.
pub fn parse_default_literal(literal: &str) -> Option<AttributeValue> {
    let trimmed = literal.trim();
    let unwrapped = trimmed
        .strip_prefix('(')
        .and_then(|s| s.strip_suffix(')'))
        .unwrap_or(trimmed)
        .trim();

    if unwrapped.eq_ignore_ascii_case("NULL") {
        return None;
    }
    if let Some(inner) = unwrapped
        .strip_prefix('\'')
        .and_then(|s| s.strip_suffix('\''))
    {
        return Some(AttributeValue::Text(inner.replace("''", "'")));
    }
    if let Ok(int) = unwrapped.parse::<i64>() {
        return Some(AttributeValue::Integer(int));
    }
    if let Ok(real) = unwrapped.parse::<f64>() {
        return Some(AttributeValue::Real(real));
    }
    None
}
