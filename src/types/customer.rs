//! Customer record schema: the contract every scored record must satisfy.
//!
//! Numeric fields are bounded, categorical fields are closed enums. Strings
//! are trimmed and lowercased before matching; anything outside the domain
//! is rejected rather than treated as missing.

use crate::data::frame::{normalize_category, Cell};
use crate::error::SchemaError;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// A closed categorical domain with a total mapping from normalized text.
pub trait Categorical: Sized + Copy + 'static {
    const ALL: &'static [Self];

    fn as_str(&self) -> &'static str;

    fn parse(normalized: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|v| v.as_str() == normalized)
    }
}

macro_rules! categorical {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $value:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant),+
        }

        impl Categorical for $name {
            const ALL: &'static [$name] = &[$($name::$variant),+];

            fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $value),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }
    };
}

categorical!(
    /// Occupation category
    Job {
        Admin => "admin.",
        Unknown => "unknown",
        Unemployed => "unemployed",
        Management => "management",
        Housemaid => "housemaid",
        Entrepreneur => "entrepreneur",
        Student => "student",
        BlueCollar => "blue-collar",
        SelfEmployed => "self-employed",
        Retired => "retired",
        Technician => "technician",
        Services => "services",
    }
);

categorical!(
    Marital {
        Married => "married",
        Divorced => "divorced",
        Single => "single",
    }
);

categorical!(
    Education {
        Unknown => "unknown",
        Secondary => "secondary",
        Primary => "primary",
        Tertiary => "tertiary",
    }
);

categorical!(
    /// Shared domain of the default, housing and loan flags
    YesNo {
        Yes => "yes",
        No => "no",
    }
);

categorical!(
    /// Channel of the last contact
    Contact {
        Unknown => "unknown",
        Telephone => "telephone",
        Cellular => "cellular",
    }
);

categorical!(
    Month {
        Jan => "jan",
        Feb => "feb",
        Mar => "mar",
        Apr => "apr",
        May => "may",
        Jun => "jun",
        Jul => "jul",
        Aug => "aug",
        Sep => "sep",
        Oct => "oct",
        Nov => "nov",
        Dec => "dec",
    }
);

categorical!(
    /// Outcome of the previous marketing campaign
    Poutcome {
        Unknown => "unknown",
        Other => "other",
        Failure => "failure",
        Success => "success",
    }
);

/// Closed bounds for the numeric fields, as (name, min, max).
pub const NUMERIC_BOUNDS: &[(&str, f64, f64)] = &[
    ("age", 18.0, 110.0),
    ("balance", -1e9, 1e9),
    ("duration", 0.0, 100_000.0),
    ("campaign", 0.0, 1000.0),
    ("pdays", -1.0, 5000.0),
    ("previous", 0.0, 10_000.0),
    ("day", 1.0, 31.0),
];

/// Every accepted field, numeric first, in declaration order.
pub const FIELDS: &[&str] = &[
    "age",
    "balance",
    "duration",
    "campaign",
    "pdays",
    "previous",
    "day",
    "job",
    "marital",
    "education",
    "default",
    "housing",
    "loan",
    "contact",
    "month",
    "poutcome",
];

/// A validated customer record
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Customer {
    pub age: i64,
    pub balance: f64,
    pub duration: i64,
    pub campaign: i64,
    pub pdays: i64,
    pub previous: i64,
    pub day: i64,

    pub job: Job,
    pub marital: Marital,
    pub education: Education,
    pub default: YesNo,
    pub housing: YesNo,
    pub loan: YesNo,
    pub contact: Contact,
    pub month: Month,
    pub poutcome: Poutcome,
}

impl Customer {
    /// Validate a raw JSON record against the schema.
    pub fn validate(raw: &Value) -> Result<Self, SchemaError> {
        let obj = raw.as_object().ok_or_else(|| SchemaError::WrongType {
            field: "record".to_string(),
            expected: "an object",
        })?;

        if let Some(extra) = obj.keys().find(|k| !FIELDS.contains(&k.as_str())) {
            return Err(SchemaError::UnexpectedField {
                field: extra.clone(),
            });
        }

        Ok(Self {
            age: integer(obj, "age")?,
            balance: number(obj, "balance")?,
            duration: integer(obj, "duration")?,
            campaign: integer(obj, "campaign")?,
            pdays: integer(obj, "pdays")?,
            previous: integer(obj, "previous")?,
            day: integer(obj, "day")?,
            job: category(obj, "job")?,
            marital: category(obj, "marital")?,
            education: category(obj, "education")?,
            default: category(obj, "default")?,
            housing: category(obj, "housing")?,
            loan: category(obj, "loan")?,
            contact: category(obj, "contact")?,
            month: category(obj, "month")?,
            poutcome: category(obj, "poutcome")?,
        })
    }

    /// Raw cell for a feature name, or `None` if the name is not a field.
    pub fn cell(&self, name: &str) -> Option<Cell> {
        let cell = match name {
            "age" => Cell::Number(self.age as f64),
            "balance" => Cell::Number(self.balance),
            "duration" => Cell::Number(self.duration as f64),
            "campaign" => Cell::Number(self.campaign as f64),
            "pdays" => Cell::Number(self.pdays as f64),
            "previous" => Cell::Number(self.previous as f64),
            "day" => Cell::Number(self.day as f64),
            "job" => Cell::from(self.job.as_str()),
            "marital" => Cell::from(self.marital.as_str()),
            "education" => Cell::from(self.education.as_str()),
            "default" => Cell::from(self.default.as_str()),
            "housing" => Cell::from(self.housing.as_str()),
            "loan" => Cell::from(self.loan.as_str()),
            "contact" => Cell::from(self.contact.as_str()),
            "month" => Cell::from(self.month.as_str()),
            "poutcome" => Cell::from(self.poutcome.as_str()),
            _ => return None,
        };
        Some(cell)
    }

    /// All fields keyed by name, ready to become a frame row.
    pub fn to_record(&self) -> BTreeMap<String, Cell> {
        FIELDS
            .iter()
            .filter_map(|name| self.cell(name).map(|c| (name.to_string(), c)))
            .collect()
    }
}

fn required<'a>(obj: &'a Map<String, Value>, field: &str) -> Result<&'a Value, SchemaError> {
    match obj.get(field) {
        Some(Value::Null) | None => Err(SchemaError::MissingField {
            field: field.to_string(),
        }),
        Some(v) => Ok(v),
    }
}

fn bounds(field: &str) -> (f64, f64) {
    NUMERIC_BOUNDS
        .iter()
        .find(|(name, _, _)| *name == field)
        .map(|&(_, min, max)| (min, max))
        .unwrap_or((f64::NEG_INFINITY, f64::INFINITY))
}

fn number(obj: &Map<String, Value>, field: &str) -> Result<f64, SchemaError> {
    let value = required(obj, field)?
        .as_f64()
        .filter(|v| v.is_finite())
        .ok_or_else(|| SchemaError::WrongType {
            field: field.to_string(),
            expected: "a number",
        })?;

    let (min, max) = bounds(field);
    if value < min || value > max {
        return Err(SchemaError::OutOfRange {
            field: field.to_string(),
            value,
            min,
            max,
        });
    }
    Ok(value)
}

fn integer(obj: &Map<String, Value>, field: &str) -> Result<i64, SchemaError> {
    let value = number(obj, field)?;
    if value.fract() != 0.0 {
        return Err(SchemaError::WrongType {
            field: field.to_string(),
            expected: "an integer",
        });
    }
    Ok(value as i64)
}

fn category<T: Categorical>(obj: &Map<String, Value>, field: &str) -> Result<T, SchemaError> {
    let raw = required(obj, field)?
        .as_str()
        .ok_or_else(|| SchemaError::WrongType {
            field: field.to_string(),
            expected: "a string",
        })?;

    let normalized = normalize_category(raw);
    T::parse(&normalized).ok_or_else(|| SchemaError::UnknownCategory {
        field: field.to_string(),
        value: raw.to_string(),
        allowed: T::ALL
            .iter()
            .map(|v| v.as_str())
            .collect::<Vec<_>>()
            .join(", "),
    })
}
