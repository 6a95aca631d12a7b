use std::collections::BTreeMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;

use super::{DonationError, DonationRecord, DonorId};

/// A lifetime-giving table: one aggregate per donor, ordered by donor ID.
pub type Snapshot = BTreeMap<DonorId, DonorAggregate>;

/// It represents what a donor has given so far.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DonorAggregate {
    /// The donor ID, unique in a snapshot.
    pub donor_id: DonorId,

    /// The donor name.
    pub name: String,

    /// The sum of every donation of the donor.
    pub lifetime_amount: Decimal,

    /// The date of the most recent donation.
    pub last_donation: NaiveDate,
}

impl DonorAggregate {
    /// Creates a new aggregate.
    pub fn new(
        donor_id: impl Into<DonorId>,
        name: impl Into<String>,
        lifetime_amount: Decimal,
        last_donation: NaiveDate,
    ) -> Self {
        Self {
            donor_id: donor_id.into(),
            name: name.into(),
            lifetime_amount,
            last_donation,
        }
    }

    /// Adds a donation of the same donor to the aggregate. The amount is added
    /// to the lifetime amount and the last donation date moves forward if the
    /// donation is more recent. The name is left untouched: the first row seen
    /// for a donor names it. Fails with [DonationError::AmountOverflow] when
    /// the sum cannot be held exactly.
    ///
    /// ```
    /// use chrono::NaiveDate;
    /// use rust_decimal_macros::dec;
    /// use donor_ledger::model::{DonationRecord, DonorAggregate};
    ///
    /// let march = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();
    /// let january = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
    ///
    /// let mut aggregate = DonorAggregate::from(&DonationRecord::new("D1", "Alice", dec!(25), march).unwrap());
    /// aggregate.add_donation(&DonationRecord::new("D1", "Alicia", dec!(50), january).unwrap()).unwrap();
    ///
    /// assert_eq!(aggregate.name, "Alice");
    /// assert_eq!(aggregate.lifetime_amount, dec!(75));
    /// assert_eq!(aggregate.last_donation, march);
    /// ```
    pub fn add_donation(&mut self, donation: &DonationRecord) -> Result<(), DonationError> {
        debug_assert_eq!(self.donor_id, donation.donor_id);
        self.lifetime_amount = self.exact_sum(donation.amount)?;
        self.last_donation = self.last_donation.max(donation.date);

        Ok(())
    }

    /// Folds a freshly aggregated batch of the same donor into this existing
    /// aggregate. Totals are summed, the latest date is kept and the name of
    /// the incoming batch replaces the existing one. On
    /// [DonationError::AmountOverflow] the aggregate is left unchanged.
    ///
    /// ```
    /// use chrono::NaiveDate;
    /// use rust_decimal_macros::dec;
    /// use donor_ledger::model::DonorAggregate;
    ///
    /// let mut existing = DonorAggregate::new("D1", "Alice", dec!(75), NaiveDate::from_ymd_opt(2024, 3, 4).unwrap());
    /// let incoming = DonorAggregate::new("D1", "Alice B.", dec!(20), NaiveDate::from_ymd_opt(2024, 4, 1).unwrap());
    /// existing.absorb(incoming).unwrap();
    ///
    /// assert_eq!(existing.name, "Alice B.");
    /// assert_eq!(existing.lifetime_amount, dec!(95));
    /// assert_eq!(existing.last_donation, NaiveDate::from_ymd_opt(2024, 4, 1).unwrap());
    ///
    /// // an older batch does not move the last donation date back
    /// let late_file = DonorAggregate::new("D1", "Alice", dec!(5), NaiveDate::from_ymd_opt(2023, 12, 24).unwrap());
    /// existing.absorb(late_file).unwrap();
    ///
    /// assert_eq!(existing.lifetime_amount, dec!(100));
    /// assert_eq!(existing.last_donation, NaiveDate::from_ymd_opt(2024, 4, 1).unwrap());
    /// ```
    pub fn absorb(&mut self, incoming: DonorAggregate) -> Result<(), DonationError> {
        debug_assert_eq!(self.donor_id, incoming.donor_id);
        self.lifetime_amount = self.exact_sum(incoming.lifetime_amount)?;
        self.name = incoming.name;
        self.last_donation = self.last_donation.max(incoming.last_donation);

        Ok(())
    }

    /// `Decimal` addition rounds away digits past 96 bits of mantissa and
    /// panics past its range. A sum is exact when it keeps the scale of its
    /// most precise operand.
    fn exact_sum(&self, amount: Decimal) -> Result<Decimal, DonationError> {
        self.lifetime_amount
            .checked_add(amount)
            .filter(|sum| sum.scale() >= self.lifetime_amount.scale().max(amount.scale()))
            .ok_or_else(|| DonationError::AmountOverflow {
                donor_id: self.donor_id.clone(),
                lifetime_amount: self.lifetime_amount,
                amount,
            })
    }
}

impl From<&DonationRecord> for DonorAggregate {
    fn from(donation: &DonationRecord) -> Self {
        Self {
            donor_id: donation.donor_id.clone(),
            name: donation.name.clone(),
            lifetime_amount: donation.amount,
            last_donation: donation.date,
        }
    }
}
