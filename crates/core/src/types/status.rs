//! Status enums for stock lots.

use serde::{Deserialize, Serialize};

/// Availability of a stock lot at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "pantry.lot_status", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum LotStatus {
    /// Unconsumed, unexpired and with quantity left.
    Available,
    /// Past its expiry date.
    Expired,
    /// Stamped as consumed by a preparation.
    Consumed,
    /// Unconsumed but with nothing left.
    Depleted,
}

impl std::fmt::Display for LotStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Available => write!(f, "available"),
            Self::Expired => write!(f, "expired"),
            Self::Consumed => write!(f, "consumed"),
            Self::Depleted => write!(f, "depleted"),
        }
    }
}

impl std::str::FromStr for LotStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "available" => Ok(Self::Available),
            "expired" => Ok(Self::Expired),
            "consumed" => Ok(Self::Consumed),
            "depleted" => Ok(Self::Depleted),
            _ => Err(format!("invalid lot status: {s}")),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_display_from_str_agree() {
        for status in [
            LotStatus::Available,
            LotStatus::Expired,
            LotStatus::Consumed,
            LotStatus::Depleted,
        ] {
            assert_eq!(status.to_string().parse::<LotStatus>().unwrap(), status);
        }
    }

    #[test]
    fn test_invalid_status() {
        assert!("spoiled".parse::<LotStatus>().is_err());
    }
}
