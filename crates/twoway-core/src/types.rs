//! SQL type system for bind parameters

use serde::{Deserialize, Serialize};

/// Portable SQL type attached to a bind parameter
///
/// Either inferred from the bound value or declared on an output marker
/// (`/*@out total:INTEGER*/`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SqlType {
    /// Boolean type
    Bool,

    /// Integer type (any precision)
    Int,

    /// Floating point (any precision)
    Float,

    /// Decimal with precision and scale
    Decimal {
        precision: Option<u16>,
        scale: Option<u16>,
    },

    /// String/text type
    String,

    /// Date (no time component)
    Date,

    /// Timestamp (with time component)
    Timestamp,

    /// Binary data
    Binary,

    /// JSON/Variant type
    Json,

    /// Vendor type the engine does not model; passed through by name
    Other { name: String },
}

impl SqlType {
    /// Parse a declared type name such as `INTEGER`, `varchar` or `decimal(10, 2)`
    pub fn parse(data_type: &str) -> SqlType {
        let lower = data_type.trim().to_lowercase();

        match lower.as_str() {
            // Integers
            "int" | "integer" | "bigint" | "smallint" | "tinyint" | "int64" | "int4" | "int8" => {
                SqlType::Int
            }

            // Floats
            "float" | "double" | "real" | "float64" | "float8" => SqlType::Float,

            // Decimals
            s if s.starts_with("decimal") || s.starts_with("numeric") => {
                // Format: decimal(precision, scale) or numeric(precision, scale)
                if let (Some(start), Some(end)) = (s.find('('), s.find(')')) {
                    let params = &s[start + 1..end];
                    let parts: Vec<&str> = params.split(',').map(|s| s.trim()).collect();

                    let precision = parts.first().and_then(|p| p.parse().ok());
                    let scale = parts.get(1).and_then(|s| s.parse().ok());

                    return SqlType::Decimal { precision, scale };
                }
                SqlType::Decimal {
                    precision: None,
                    scale: None,
                }
            }

            // Strings
            "string" | "varchar" | "char" | "text" | "clob" | "character varying" | "character" => {
                SqlType::String
            }

            // Booleans
            "bool" | "boolean" | "bit" => SqlType::Bool,

            "date" => SqlType::Date,

            "timestamp" | "datetime" | "timestamp_ntz" | "timestamp_ltz" | "timestamp_tz" => {
                SqlType::Timestamp
            }

            "blob" | "binary" | "varbinary" | "bytea" => SqlType::Binary,

            "json" | "jsonb" | "variant" => SqlType::Json,

            _ => SqlType::Other { name: data_type.trim().to_uppercase() },
        }
    }

    /// Infer the type of a bound value
    ///
    /// Returns `None` when no scalar type fits (null, arrays, objects); the
    /// parameter is then bound untyped.
    pub fn infer(value: &serde_json::Value) -> Option<SqlType> {
        match value {
            serde_json::Value::Bool(_) => Some(SqlType::Bool),
            serde_json::Value::Number(n) if n.is_i64() || n.is_u64() => Some(SqlType::Int),
            serde_json::Value::Number(_) => Some(SqlType::Float),
            serde_json::Value::String(_) => Some(SqlType::String),
            serde_json::Value::Null
            | serde_json::Value::Array(_)
            | serde_json::Value::Object(_) => None,
        }
    }
}

impl std::fmt::Display for SqlType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bool => write!(f, "BOOL"),
            Self::Int => write!(f, "INT"),
            Self::Float => write!(f, "FLOAT"),
            Self::Decimal { precision, scale } => {
                match (precision, scale) {
                    (Some(p), Some(s)) => write!(f, "DECIMAL({}, {})", p, s),
                    (Some(p), None) => write!(f, "DECIMAL({})", p),
                    _ => write!(f, "DECIMAL"),
                }
            }
            Self::String => write!(f, "STRING"),
            Self::Date => write!(f, "DATE"),
            Self::Timestamp => write!(f, "TIMESTAMP"),
            Self::Binary => write!(f, "BINARY"),
            Self::Json => write!(f, "JSON"),
            Self::Other { name } => write!(f, "{}", name),
        }
    }
}

/// Direction of a bind parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterDirection {
    /// Value supplied to the statement
    In,

    /// Value produced by the statement (stored procedure OUT)
    Out,

    /// Supplied and produced
    InOut,
}

impl std::fmt::Display for ParameterDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::In => write!(f, "in"),
            Self::Out => write!(f, "out"),
            Self::InOut => write!(f, "inout"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sql_type_display() {
        assert_eq!(SqlType::Bool.to_string(), "BOOL");
        assert_eq!(
            SqlType::Decimal { precision: Some(10), scale: Some(2) }.to_string(),
            "DECIMAL(10, 2)"
        );
    }

    #[test]
    fn parse_declared_types() {
        assert_eq!(SqlType::parse("INTEGER"), SqlType::Int);
        assert_eq!(SqlType::parse("varchar"), SqlType::String);
        assert_eq!(SqlType::parse("timestamp"), SqlType::Timestamp);
        assert_eq!(SqlType::parse("cursor"), SqlType::Other { name: "CURSOR".to_string() });

        match SqlType::parse("decimal(10, 2)") {
            SqlType::Decimal { precision, scale } => {
                assert_eq!(precision, Some(10));
                assert_eq!(scale, Some(2));
            }
            other => panic!("Expected Decimal type, got {:?}", other),
        }
    }

    #[test]
    fn infer_from_values() {
        assert_eq!(SqlType::infer(&json!(true)), Some(SqlType::Bool));
        assert_eq!(SqlType::infer(&json!(42)), Some(SqlType::Int));
        assert_eq!(SqlType::infer(&json!(4.5)), Some(SqlType::Float));
        assert_eq!(SqlType::infer(&json!("x")), Some(SqlType::String));
        assert_eq!(SqlType::infer(&json!(null)), None);
        assert_eq!(SqlType::infer(&json!({"a": 1})), None);
    }
}
