use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{filter::Function, model::PrimitiveType};

/// Target SQL back end.
///
/// The builder's walk is dialect-agnostic; everything that differs between
/// back ends is answered here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    #[default]
    Sqlite,
    Postgres,
    MySql,
    SqlServer,
}

impl Dialect {
    pub const ALL: [Dialect; 4] = [
        Dialect::Sqlite,
        Dialect::Postgres,
        Dialect::MySql,
        Dialect::SqlServer,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Dialect::Sqlite => "sqlite",
            Dialect::Postgres => "postgres",
            Dialect::MySql => "mysql",
            Dialect::SqlServer => "sqlserver",
        }
    }

    /// Whether a computed column may be referenced by name in WHERE/HAVING.
    pub fn supports_alias_in_predicate(&self) -> bool {
        matches!(self, Dialect::Sqlite)
    }

    /// Template dropping the fractional part of `$` toward zero, for the
    /// ceiling/floor idiom. A plain integer cast rounds on Postgres and MySQL.
    pub fn truncate(&self) -> &'static str {
        match self {
            Dialect::Sqlite | Dialect::SqlServer => "CAST($ AS INTEGER)",
            Dialect::Postgres => "CAST(TRUNC($) AS INTEGER)",
            Dialect::MySql => "CAST(TRUNCATE($, 0) AS SIGNED)",
        }
    }

    /// Type name for `CAST(x AS <type>)`, if the back end has one.
    pub fn cast_type(&self, ty: PrimitiveType) -> Option<&'static str> {
        use PrimitiveType as P;

        let name = match (self, ty) {
            (_, P::Duration | P::Geography | P::Geometry) => return None,

            (Dialect::Sqlite, P::Boolean) => "INTEGER",
            (Dialect::Sqlite, t) if t.is_integral() => "INTEGER",
            (Dialect::Sqlite, P::Decimal) => "NUMERIC",
            (Dialect::Sqlite, P::Double | P::Single) => "REAL",
            (Dialect::Sqlite, P::Binary) => "BLOB",
            (Dialect::Sqlite, _) => "TEXT",

            (Dialect::Postgres, P::Boolean) => "BOOLEAN",
            (Dialect::Postgres, P::Byte | P::SByte | P::Int16) => "SMALLINT",
            (Dialect::Postgres, P::Int32) => "INTEGER",
            (Dialect::Postgres, P::Int64) => "BIGINT",
            (Dialect::Postgres, P::Decimal) => "NUMERIC",
            (Dialect::Postgres, P::Double) => "DOUBLE PRECISION",
            (Dialect::Postgres, P::Single) => "REAL",
            (Dialect::Postgres, P::Date) => "DATE",
            (Dialect::Postgres, P::TimeOfDay) => "TIME",
            (Dialect::Postgres, P::DateTimeOffset) => "TIMESTAMPTZ",
            (Dialect::Postgres, P::Guid) => "UUID",
            (Dialect::Postgres, P::Binary) => "BYTEA",
            (Dialect::Postgres, _) => "TEXT",

            (Dialect::MySql, t) if t.is_integral() => "SIGNED",
            (Dialect::MySql, P::Boolean) => "UNSIGNED",
            (Dialect::MySql, P::Decimal) => "DECIMAL(65, 30)",
            (Dialect::MySql, P::Double) => "DOUBLE",
            (Dialect::MySql, P::Single) => "FLOAT",
            (Dialect::MySql, P::Date) => "DATE",
            (Dialect::MySql, P::TimeOfDay) => "TIME",
            (Dialect::MySql, P::DateTimeOffset) => "DATETIME",
            (Dialect::MySql, P::Guid) => "CHAR(36)",
            (Dialect::MySql, P::Binary) => "BINARY",
            (Dialect::MySql, _) => "CHAR",

            (Dialect::SqlServer, P::Boolean) => "BIT",
            (Dialect::SqlServer, P::Byte | P::SByte) => "TINYINT",
            (Dialect::SqlServer, P::Int16) => "SMALLINT",
            (Dialect::SqlServer, P::Int32) => "INT",
            (Dialect::SqlServer, P::Int64) => "BIGINT",
            (Dialect::SqlServer, P::Decimal) => "DECIMAL(38, 10)",
            (Dialect::SqlServer, P::Double) => "FLOAT",
            (Dialect::SqlServer, P::Single) => "REAL",
            (Dialect::SqlServer, P::Date) => "DATE",
            (Dialect::SqlServer, P::TimeOfDay) => "TIME",
            (Dialect::SqlServer, P::DateTimeOffset) => "DATETIMEOFFSET",
            (Dialect::SqlServer, P::Guid) => "UNIQUEIDENTIFIER",
            (Dialect::SqlServer, P::Binary) => "VARBINARY(MAX)",
            (Dialect::SqlServer, _) => "NVARCHAR(MAX)",
        };
        Some(name)
    }

    /// Date/time component extraction. `$` marks the operand.
    pub fn date_part(&self, function: Function) -> Option<&'static str> {
        use Function as F;

        let template = match (self, function) {
            (Dialect::Sqlite, F::Year) => "CAST(strftime('%Y', $) AS INTEGER)",
            (Dialect::Sqlite, F::Month) => "CAST(strftime('%m', $) AS INTEGER)",
            (Dialect::Sqlite, F::Day) => "CAST(strftime('%d', $) AS INTEGER)",
            (Dialect::Sqlite, F::Hour) => "CAST(strftime('%H', $) AS INTEGER)",
            (Dialect::Sqlite, F::Minute) => "CAST(strftime('%M', $) AS INTEGER)",
            (Dialect::Sqlite, F::Second) => "CAST(strftime('%S', $) AS INTEGER)",
            (Dialect::Sqlite, F::FractionalSeconds) => {
                "(CAST(strftime('%f', $) AS REAL) - CAST(strftime('%S', $) AS INTEGER))"
            }
            (Dialect::Sqlite, F::Date) => "date($)",
            (Dialect::Sqlite, F::Time) => "time($)",

            (Dialect::Postgres, F::Year) => "EXTRACT(YEAR FROM $)",
            (Dialect::Postgres, F::Month) => "EXTRACT(MONTH FROM $)",
            (Dialect::Postgres, F::Day) => "EXTRACT(DAY FROM $)",
            (Dialect::Postgres, F::Hour) => "EXTRACT(HOUR FROM $)",
            (Dialect::Postgres, F::Minute) => "EXTRACT(MINUTE FROM $)",
            (Dialect::Postgres, F::Second) => "FLOOR(EXTRACT(SECOND FROM $))",
            (Dialect::Postgres, F::FractionalSeconds) => {
                "(EXTRACT(SECOND FROM $) - FLOOR(EXTRACT(SECOND FROM $)))"
            }
            (Dialect::Postgres, F::TotalOffsetMinutes) => "(EXTRACT(TIMEZONE FROM $) / 60)",
            (Dialect::Postgres, F::Date) => "CAST($ AS DATE)",
            (Dialect::Postgres, F::Time) => "CAST($ AS TIME)",

            (Dialect::MySql, F::Year) => "YEAR($)",
            (Dialect::MySql, F::Month) => "MONTH($)",
            (Dialect::MySql, F::Day) => "DAY($)",
            (Dialect::MySql, F::Hour) => "HOUR($)",
            (Dialect::MySql, F::Minute) => "MINUTE($)",
            (Dialect::MySql, F::Second) => "SECOND($)",
            (Dialect::MySql, F::FractionalSeconds) => "(MICROSECOND($) / 1000000.0)",
            (Dialect::MySql, F::Date) => "DATE($)",
            (Dialect::MySql, F::Time) => "TIME($)",

            (Dialect::SqlServer, F::Year) => "DATEPART(year, $)",
            (Dialect::SqlServer, F::Month) => "DATEPART(month, $)",
            (Dialect::SqlServer, F::Day) => "DATEPART(day, $)",
            (Dialect::SqlServer, F::Hour) => "DATEPART(hour, $)",
            (Dialect::SqlServer, F::Minute) => "DATEPART(minute, $)",
            (Dialect::SqlServer, F::Second) => "DATEPART(second, $)",
            (Dialect::SqlServer, F::FractionalSeconds) => "(DATEPART(nanosecond, $) / 1000000000.0)",
            (Dialect::SqlServer, F::TotalOffsetMinutes) => "DATEPART(tzoffset, $)",
            (Dialect::SqlServer, F::Date) => "CAST($ AS DATE)",
            (Dialect::SqlServer, F::Time) => "CAST($ AS TIME)",

            _ => return None,
        };
        Some(template)
    }

    /// Templates for the string functions with a native spelling.
    pub fn string_function(&self, function: Function) -> Option<&'static str> {
        use Function as F;

        let template = match (self, function) {
            (_, F::ToLower) => "LOWER($)",
            (_, F::ToUpper) => "UPPER($)",
            (Dialect::SqlServer, F::Trim) => "LTRIM(RTRIM($))",
            (_, F::Trim) => "TRIM($)",
            (Dialect::MySql, F::Length) => "CHAR_LENGTH($)",
            (Dialect::SqlServer, F::Length) => "LEN($)",
            (_, F::Length) => "LENGTH($)",

            // Zero-based, like the query language.
            (Dialect::Sqlite, F::IndexOf) => "(INSTR($, $) - 1)",
            (Dialect::Postgres, F::IndexOf) => "(STRPOS($, $) - 1)",
            (Dialect::MySql, F::IndexOf) => "(LOCATE($2, $1) - 1)",
            (Dialect::SqlServer, F::IndexOf) => "(CHARINDEX($2, $1) - 1)",

            (Dialect::Sqlite | Dialect::MySql, F::MatchesPattern) => "$ REGEXP $",
            (Dialect::Postgres, F::MatchesPattern) => "$ ~ $",

            _ => return None,
        };
        Some(template)
    }

    pub fn now(&self) -> &'static str {
        match self {
            Dialect::Sqlite => "CURRENT_TIMESTAMP",
            Dialect::Postgres | Dialect::MySql => "NOW()",
            Dialect::SqlServer => "SYSDATETIMEOFFSET()",
        }
    }

    /// Concatenation of already-rendered operands, as a template.
    pub fn concat(&self, count: usize) -> String {
        let slots = vec!["$"; count];
        match self {
            Dialect::Sqlite | Dialect::Postgres => format!("({})", slots.join(" || ")),
            Dialect::MySql | Dialect::SqlServer => format!("CONCAT({})", slots.join(", ")),
        }
    }

    /// `substring(s, start[, length])` with a zero-based start.
    pub fn substring(&self, with_length: bool) -> &'static str {
        match (self, with_length) {
            (Dialect::Sqlite, false) => "SUBSTR($, $ + 1)",
            (Dialect::Sqlite, true) => "SUBSTR($, $ + 1, $)",
            (Dialect::Postgres, false) => "SUBSTRING($ FROM $ + 1)",
            (Dialect::Postgres, true) => "SUBSTRING($ FROM $ + 1 FOR $)",
            (Dialect::MySql, false) => "SUBSTRING($, $ + 1)",
            (Dialect::MySql, true) => "SUBSTRING($, $ + 1, $)",
            (Dialect::SqlServer, false) => "SUBSTRING($1, $2 + 1, LEN($1))",
            (Dialect::SqlServer, true) => "SUBSTRING($, $ + 1, $)",
        }
    }

    /// Spatial function templates: the subject, then the literal if any.
    pub fn spatial(&self, function: Function) -> Option<&'static str> {
        let template = match (self, function) {
            (Dialect::SqlServer, Function::GeoIntersects) => "($.STIntersects($) = 1)",
            (Dialect::SqlServer, Function::GeoDistance) => "$.STDistance($)",
            (Dialect::SqlServer, Function::GeoLength) => "$.STLength()",
            (_, Function::GeoIntersects) => "ST_Intersects($, $)",
            (_, Function::GeoDistance) => "ST_Distance($, $)",
            (_, Function::GeoLength) => "ST_Length($)",
            _ => return None,
        };
        Some(template)
    }

    /// Constructor for a spatial literal bound as `(wkt, srid)`.
    pub fn spatial_literal(&self, geography: bool) -> &'static str {
        match (self, geography) {
            (Dialect::SqlServer, true) => "geography::STGeomFromText(?, ?)",
            (Dialect::SqlServer, false) => "geometry::STGeomFromText(?, ?)",
            (Dialect::Postgres, true) => "ST_GeogFromText(?, ?)",
            _ => "ST_GeomFromText(?, ?)",
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Dialect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sqlite" => Ok(Dialect::Sqlite),
            "postgres" | "postgresql" => Ok(Dialect::Postgres),
            "mysql" | "mariadb" => Ok(Dialect::MySql),
            "sqlserver" | "mssql" => Ok(Dialect::SqlServer),
            other => Err(format!(
                "unknown dialect '{}', expected one of: sqlite, postgres, mysql, sqlserver",
                other
            )),
        }
    }
}
