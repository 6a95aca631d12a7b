use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};
use thiserror::Error;

/// Type alias for donor identifiers.
pub type DonorId = String;

/// Error type for donation creation.
#[derive(Debug, Clone, Error)]
pub enum DonationError {
    /// The date is not a valid `M/d/yyyy` calendar date.
    #[error("Invalid donation date '{value}' for donor '{donor_id}' (expected M/d/yyyy).")]
    InvalidDate {
        /// The donor the row belongs to.
        donor_id: DonorId,

        /// The date text as found in the CSV file.
        value: String,
    },

    /// Donation amounts must be positive.
    #[error("Donation amount must be strictly positive ({amount} given for donor '{donor_id}').")]
    NonPositiveAmount {
        /// The donor the row belongs to.
        donor_id: DonorId,

        /// The amount as found in the CSV file.
        amount: Decimal,
    },

    /// A lifetime amount cannot hold the sum exactly.
    #[error("Lifetime amount of donor '{donor_id}' cannot hold {lifetime_amount} + {amount} without rounding.")]
    AmountOverflow {
        /// The donor the total belongs to.
        donor_id: DonorId,

        /// The total before the addition.
        lifetime_amount: Decimal,

        /// The amount that was added.
        amount: Decimal,
    },
}

/// A donation row as it comes out of a CSV file. The amount is already numeric
/// but the date is still text.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CSVDonationEntity {
    #[serde(rename = "DonorID")]
    pub donor_id: DonorId,

    #[serde(rename = "Name")]
    pub name: String,

    #[serde(rename = "Amount", deserialize_with = "deserialize_amount")]
    pub amount: Decimal,

    #[serde(rename = "Date")]
    pub date: String,
}

/// Amounts are read from their text form so no binary float is ever involved.
fn deserialize_amount<'de, D>(deserializer: D) -> Result<Decimal, D::Error>
where
    D: Deserializer<'de>,
{
    let text = String::deserialize(deserializer)?;

    Decimal::from_str_exact(text.trim()).map_err(serde::de::Error::custom)
}

/// A validated donation: positive amount and a real calendar date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DonationRecord {
    pub donor_id: DonorId,
    pub name: String,
    pub amount: Decimal,
    pub date: NaiveDate,
}

impl DonationRecord {
    /// Create a new donation record.
    ///
    /// ```
    /// use chrono::NaiveDate;
    /// use rust_decimal::Decimal;
    /// use rust_decimal_macros::dec;
    /// use donor_ledger::model::{DonationError, DonationRecord};
    ///
    /// let date = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
    /// let record = DonationRecord::new("D1", "Alice", dec!(50), date).unwrap();
    /// assert_eq!(record.amount, dec!(50));
    ///
    /// // amounts of zero or less are not allowed
    /// let error = DonationRecord::new("D1", "Alice", Decimal::ZERO, date).unwrap_err();
    /// assert!(matches!(error, DonationError::NonPositiveAmount { amount, .. } if amount == Decimal::ZERO));
    /// ```
    pub fn new(
        donor_id: impl Into<DonorId>,
        name: impl Into<String>,
        amount: Decimal,
        date: NaiveDate,
    ) -> Result<Self, DonationError> {
        let donor_id = donor_id.into();
        let amount = check_positive_amount(&donor_id, amount)?;

        Ok(Self {
            donor_id,
            name: name.into(),
            amount,
            date,
        })
    }
}

impl TryFrom<CSVDonationEntity> for DonationRecord {
    type Error = DonationError;

    fn try_from(entity: CSVDonationEntity) -> Result<Self, Self::Error> {
        let date = parse_donation_date(&entity.date).ok_or_else(|| DonationError::InvalidDate {
            donor_id: entity.donor_id.clone(),
            value: entity.date.clone(),
        })?;

        Self::new(entity.donor_id, entity.name, entity.amount, date)
    }
}

/// Check if the given amount is strictly positive.
fn check_positive_amount(donor_id: &str, amount: Decimal) -> Result<Decimal, DonationError> {
    if amount <= Decimal::ZERO {
        return Err(DonationError::NonPositiveAmount {
            donor_id: donor_id.to_string(),
            amount,
        });
    }

    Ok(amount)
}

/// Parse a `M/d/yyyy` date: one or two digit month and day, four digit year.
/// The shape is checked before `chrono` parses it, so signed or wider years
/// are rejected.
///
/// ```
/// use chrono::NaiveDate;
/// use donor_ledger::model::parse_donation_date;
///
/// assert_eq!(parse_donation_date("3/4/2024"), NaiveDate::from_ymd_opt(2024, 3, 4));
/// assert_eq!(parse_donation_date("12/31/1999"), NaiveDate::from_ymd_opt(1999, 12, 31));
/// assert_eq!(parse_donation_date("2024-03-04"), None);
/// assert_eq!(parse_donation_date("2/30/2024"), None);
/// ```
pub fn parse_donation_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    let mut parts = text.split('/');
    let (month, day, year) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() {
        return None;
    }
    if !is_digits(month, 1..=2) || !is_digits(day, 1..=2) || !is_digits(year, 4..=4) {
        return None;
    }

    NaiveDate::parse_from_str(text, "%m/%d/%Y").ok()
}

fn is_digits(text: &str, width: std::ops::RangeInclusive<usize>) -> bool {
    width.contains(&text.len()) && text.bytes().all(|b| b.is_ascii_digit())
}
