//! Units of measure and base-unit normalization.
//!
//! Every quantity is reduced to a base unit of its measurement family before
//! any arithmetic: kilograms for mass, liters for volume, and the unit itself
//! for anything counted. Grams and milliliters are the only scaled units
//! (`/ 1000`); every other unit passes through unchanged.

use core::fmt;
use core::hash::{Hash, Hasher};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

const THOUSAND: Decimal = Decimal::from_parts(1000, 0, 0, false, 0);

/// Measurement family of a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeasureFamily {
    /// Weighed quantities, base unit `Kg`.
    Mass,
    /// Liquid quantities, base unit `L`.
    Volume,
    /// Counted or otherwise unscaled quantities.
    Count,
}

/// A unit of measure as stored on lots and recipe requirements.
///
/// Parsing is case-insensitive for the four known symbols, so `"G"`, `"g"`
/// and `"kg"` are recognized. Unknown unit strings are kept verbatim in
/// [`Unit::Other`] and treated as already canonical; they compare and hash
/// ignoring ASCII case, so `"PCS"` and `"pcs"` are the same unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Unit {
    Gram,
    Kilogram,
    Milliliter,
    Liter,
    Other(String),
}

impl Unit {
    /// Parse a unit symbol.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        let trimmed = s.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "g" => Self::Gram,
            "kg" => Self::Kilogram,
            "ml" => Self::Milliliter,
            "l" => Self::Liter,
            _ => Self::Other(trimmed.to_owned()),
        }
    }

    /// The stored symbol (`g`, `Kg`, `ml`, `L`, or the verbatim string).
    #[must_use]
    pub fn symbol(&self) -> &str {
        match self {
            Self::Gram => "g",
            Self::Kilogram => "Kg",
            Self::Milliliter => "ml",
            Self::Liter => "L",
            Self::Other(symbol) => symbol,
        }
    }

    #[must_use]
    pub const fn family(&self) -> MeasureFamily {
        match self {
            Self::Gram | Self::Kilogram => MeasureFamily::Mass,
            Self::Milliliter | Self::Liter => MeasureFamily::Volume,
            Self::Other(_) => MeasureFamily::Count,
        }
    }

    /// The base unit all quantities of this unit are expressed in.
    #[must_use]
    pub fn base_unit(&self) -> Self {
        match self {
            Self::Gram | Self::Kilogram => Self::Kilogram,
            Self::Milliliter | Self::Liter => Self::Liter,
            Self::Other(_) => self.clone(),
        }
    }

    /// Unit used when reporting amounts or shortages: `g` becomes `Kg`,
    /// `ml` becomes `L`, everything else is unchanged.
    #[must_use]
    pub fn display_unit(&self) -> Self {
        self.base_unit()
    }

    /// Whether quantities in this unit are divided by 1000 to reach the base.
    #[must_use]
    pub const fn is_scaled(&self) -> bool {
        matches!(self, Self::Gram | Self::Milliliter)
    }

    /// Convert a quantity in this unit to its base unit.
    #[must_use]
    pub fn to_base(&self, quantity: Decimal) -> Decimal {
        if self.is_scaled() {
            quantity / THOUSAND
        } else {
            quantity
        }
    }

    /// Convert a base-unit quantity back into this unit.
    ///
    /// Returns `None` if the scaled quantity overflows.
    #[must_use]
    pub fn from_base(&self, quantity: Decimal) -> Option<Decimal> {
        if self.is_scaled() {
            quantity.checked_mul(THOUSAND)
        } else {
            Some(quantity)
        }
    }
}

/// Normalize a `(quantity, unit)` pair to its base-unit quantity and family.
///
/// ```
/// use pantry_core::{MeasureFamily, Unit, normalize};
/// use rust_decimal::Decimal;
///
/// let (grams, family) = normalize(Decimal::new(1000, 0), &Unit::Gram);
/// let (kilos, _) = normalize(Decimal::ONE, &Unit::Kilogram);
/// assert_eq!(grams, kilos);
/// assert_eq!(family, MeasureFamily::Mass);
/// ```
#[must_use]
pub fn normalize(quantity: Decimal, unit: &Unit) -> (Decimal, MeasureFamily) {
    (unit.to_base(quantity), unit.family())
}

impl PartialEq for Unit {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Other(a), Self::Other(b)) => a.eq_ignore_ascii_case(b),
            _ => core::mem::discriminant(self) == core::mem::discriminant(other),
        }
    }
}

impl Eq for Unit {}

impl Hash for Unit {
    fn hash<H: Hasher>(&self, state: &mut H) {
        core::mem::discriminant(self).hash(state);
        if let Self::Other(symbol) = self {
            for byte in symbol.bytes() {
                byte.to_ascii_lowercase().hash(state);
            }
        }
    }
}

impl Default for Unit {
    fn default() -> Self {
        Self::Kilogram
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl std::str::FromStr for Unit {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl From<String> for Unit {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<&str> for Unit {
    fn from(value: &str) -> Self {
        Self::parse(value)
    }
}

impl From<Unit> for String {
    fn from(unit: Unit) -> Self {
        unit.symbol().to_owned()
    }
}
