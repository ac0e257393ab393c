use std::{
    fmt,
    ops::Neg,
    str::FromStr,
};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::EngineError;

/// Signed money amount represented as **integer grosze** (1/100 PLN).
///
/// Use this type for **all** monetary values in the engine (balances, request
/// amounts, invoice totals) to avoid floating-point drift. Amounts with more
/// than two decimals cannot be represented, which is exactly the precision the
/// ledger stores.
///
/// The value is signed:
/// - positive = credit / increase
/// - negative = debit / decrease
///
/// # Examples
///
/// ```rust
/// use engine::MoneyCents;
///
/// let amount = MoneyCents::new(12_34);
/// assert_eq!(amount.cents(), 1234);
/// assert_eq!(amount.to_string(), "12.34");
/// ```
///
/// Parsing from user input (accepts `.` or `,` as decimal separator; rejects >
/// 2 decimals):
///
/// ```rust
/// use engine::MoneyCents;
///
/// assert_eq!("10".parse::<MoneyCents>().unwrap().cents(), 1000);
/// assert_eq!("10,5".parse::<MoneyCents>().unwrap().cents(), 1050);
/// assert!("12.345".parse::<MoneyCents>().is_err());
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct MoneyCents(i64);

impl MoneyCents {
    pub const ZERO: MoneyCents = MoneyCents(0);

    /// Creates a new amount from integer grosze.
    #[must_use]
    pub const fn new(cents: i64) -> Self {
        Self(cents)
    }

    /// Returns the raw value in grosze.
    #[must_use]
    pub const fn cents(self) -> i64 {
        self.0
    }

    /// Returns `true` if the amount is 0.
    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Returns `true` if the amount is positive.
    #[must_use]
    pub const fn is_positive(self) -> bool {
        self.0 > 0
    }

    /// Returns `true` if the amount is negative.
    #[must_use]
    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }

    /// Checked addition (returns `None` on overflow).
    #[must_use]
    pub fn checked_add(self, rhs: MoneyCents) -> Option<MoneyCents> {
        self.0.checked_add(rhs.0).map(MoneyCents)
    }

    /// Formats the amount with the currency suffix used in notifications.
    #[must_use]
    pub fn display_pln(self) -> String {
        format!("{self} zł")
    }
}

impl fmt::Display for MoneyCents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let zloty = abs / 100;
        let grosze = abs % 100;
        write!(f, "{sign}{zloty}.{grosze:02}")
    }
}

impl Neg for MoneyCents {
    type Output = MoneyCents;

    fn neg(self) -> Self::Output {
        MoneyCents(-self.0)
    }
}

impl FromStr for MoneyCents {
    type Err = EngineError;

    /// Parses `"12"`, `"12.3"`, `"12,30"` or `"-0.01"` into grosze.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| EngineError::BadRequest(format!("invalid amount: {reason}"));

        let trimmed = s.trim();
        let (negative, digits) = match trimmed.as_bytes().first() {
            Some(b'-') => (true, trimmed[1..].trim_start()),
            Some(b'+') => (false, trimmed[1..].trim_start()),
            _ => (false, trimmed),
        };
        if digits.is_empty() {
            return Err(invalid("empty"));
        }

        let (whole, fraction) = match digits.split_once(['.', ',']) {
            Some((whole, fraction)) => (whole, fraction),
            None => (digits, ""),
        };
        let all_digits = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
        if whole.is_empty() || !all_digits(whole) || !all_digits(fraction) {
            return Err(invalid("expected a decimal number"));
        }
        if fraction.len() > 2 {
            return Err(EngineError::BadRequest(
                "amount must have at most 2 decimals".to_string(),
            ));
        }

        let too_large = || invalid("too large");
        let whole: i64 = whole.parse().map_err(|_| too_large())?;
        let grosze = format!("{fraction:0<2}")
            .parse::<i64>()
            .map_err(|_| invalid("expected a decimal number"))?;
        let total = whole
            .checked_mul(100)
            .and_then(|value| value.checked_add(grosze))
            .ok_or_else(too_large)?;

        Ok(MoneyCents(if negative { -total } else { total }))
    }
}

impl Serialize for MoneyCents {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for MoneyCents {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
