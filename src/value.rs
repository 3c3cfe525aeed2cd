use std::{fmt, str::FromStr};

use rust_decimal::{Decimal, prelude::ToPrimitive};

/// A literal value appearing in a query expression.
///
/// Literals flow unchanged from the syntax tree into the semantic tree and
/// finally into the positional argument list of a generated SQL fragment.
///
/// # Number Representation
///
/// - Integers that fit in 64 bits stay [`Literal::Integer`]
/// - Plain decimals and oversized integers become [`Literal::Decimal`]
///   (exact, up to 28 significant digits)
/// - Exponent forms, and decimals too wide for `Decimal`, become
///   [`Literal::Double`]
///
/// # Examples
///
/// ```
/// use odata_sql::Literal;
///
/// assert_eq!(Literal::from_number("42"), Some(Literal::Integer(42)));
/// assert!(matches!(Literal::from_number("1.5"), Some(Literal::Decimal(_))));
/// assert!(matches!(Literal::from_number("1e3"), Some(Literal::Double(_))));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    /// `null`
    Null,

    /// `true` / `false`
    Boolean(bool),

    /// 64-bit signed integer
    Integer(i64),

    /// Exact decimal
    Decimal(Decimal),

    /// Floating-point number
    Double(f64),

    /// String content with quote escapes already removed
    String(String),

    /// `YYYY-MM-DD`
    Date(String),

    /// `HH:MM:SS[.fff]`
    TimeOfDay(String),

    /// ISO 8601 date-time with optional offset
    DateTimeOffset(String),

    /// Lower-cased 8-4-4-4-12 GUID text
    Guid(String),

    /// `geography'...'` or `geometry'...'`
    Spatial(SpatialLiteral),
}

/// Whether a spatial literal is round-earth or flat-earth.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpatialKind {
    Geography,
    Geometry,
}

/// A spatial literal split into its reference system and well-known text.
///
/// # Examples
/// ```text
/// geography'SRID=4326;POINT(-122.1 47.6)'
/// geometry'POLYGON((0 0,1 0,1 1,0 0))'
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct SpatialLiteral {
    pub kind: SpatialKind,
    pub srid: i32,
    pub wkt: String,
}

impl SpatialLiteral {
    /// Default reference system: WGS 84 for geography, unspecified for geometry.
    pub fn default_srid(kind: SpatialKind) -> i32 {
        match kind {
            SpatialKind::Geography => 4326,
            SpatialKind::Geometry => 0,
        }
    }

    /// Parse the quoted body of a spatial literal.
    ///
    /// Returns `None` when the `SRID=` prefix is malformed or the well-known
    /// text is empty.
    pub fn parse(kind: SpatialKind, body: &str) -> Option<Self> {
        let body = body.trim();
        let (srid, wkt) = match body.split_once(';') {
            Some((prefix, rest)) => {
                let (key, value) = prefix.split_once('=')?;
                if !key.trim().eq_ignore_ascii_case("SRID") {
                    return None;
                }
                (value.trim().parse::<i32>().ok()?, rest.trim())
            }
            None => (Self::default_srid(kind), body),
        };

        if wkt.is_empty() || !wkt.starts_with(|c: char| c.is_ascii_alphabetic()) {
            return None;
        }

        Some(SpatialLiteral {
            kind,
            srid,
            wkt: wkt.to_string(),
        })
    }
}

impl Literal {
    /// Convert validated number text into the narrowest exact literal.
    pub fn from_number(text: &str) -> Option<Literal> {
        let has_exponent = text.contains(['e', 'E']);
        let has_fraction = text.contains('.');

        if !has_exponent && !has_fraction {
            if let Ok(n) = text.parse::<i64>() {
                return Some(Literal::Integer(n));
            }
        }

        if !has_exponent {
            if let Ok(d) = Decimal::from_str(text) {
                return Some(Literal::Decimal(d));
            }
        }

        text.parse::<f64>()
            .ok()
            .filter(|f| f.is_finite())
            .map(Literal::Double)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            Literal::Integer(_) | Literal::Decimal(_) | Literal::Double(_)
        )
    }

    /// Get as integer, only when the value is integral and in 64-bit range
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Literal::Integer(n) => Some(*n),
            Literal::Decimal(d) if d.is_integer() => d.to_i64(),
            _ => None,
        }
    }

    /// Whether a numeric literal lies within `[-2^63, 2^63 - 1]`.
    ///
    /// Non-numeric literals are trivially in range.
    pub fn fits_i64(&self) -> bool {
        match self {
            Literal::Integer(_) => true,
            Literal::Decimal(d) => {
                *d >= Decimal::from(i64::MIN) && *d <= Decimal::from(i64::MAX)
            }
            // 2^63 is exactly representable; i64::MAX is not.
            Literal::Double(f) => *f >= -9_223_372_036_854_775_808.0 && *f < 9_223_372_036_854_775_808.0,
            _ => true,
        }
    }

    /// Human-readable literal kind, used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Literal::Null => "null",
            Literal::Boolean(_) => "boolean",
            Literal::Integer(_) => "integer",
            Literal::Decimal(_) => "decimal",
            Literal::Double(_) => "double",
            Literal::String(_) => "string",
            Literal::Date(_) => "date",
            Literal::TimeOfDay(_) => "time",
            Literal::DateTimeOffset(_) => "date-time",
            Literal::Guid(_) => "GUID",
            Literal::Spatial(s) => match s.kind {
                SpatialKind::Geography => "geography",
                SpatialKind::Geometry => "geometry",
            },
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Null => f.write_str("null"),
            Literal::Boolean(b) => write!(f, "{}", b),
            Literal::Integer(n) => write!(f, "{}", n),
            Literal::Decimal(d) => write!(f, "{}", d),
            Literal::Double(n) => write!(f, "{}", n),
            Literal::String(s) => write!(f, "'{}'", s.replace('\'', "''")),
            Literal::Date(s) | Literal::TimeOfDay(s) | Literal::DateTimeOffset(s) | Literal::Guid(s) => {
                f.write_str(s)
            }
            Literal::Spatial(s) => {
                let prefix = match s.kind {
                    SpatialKind::Geography => "geography",
                    SpatialKind::Geometry => "geometry",
                };
                write!(f, "{}'SRID={};{}'", prefix, s.srid, s.wkt)
            }
        }
    }
}
