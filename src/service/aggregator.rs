use std::collections::btree_map::Entry;

use crate::adapter::RecordSet;
use crate::model::{DonationError, DonationRecord, DonorAggregate, Snapshot};
use crate::Result;

/// Aggregate a batch of CSV rows per donor.
///
/// Every row is validated first (date, amount) and the whole batch is rejected
/// on the first invalid row, so a batch is either fully aggregated or not at
/// all.
///
/// ```
/// use rust_decimal_macros::dec;
/// use donor_ledger::adapter::RecordSet;
/// use donor_ledger::model::{CSVDonationEntity, DonationError};
/// use donor_ledger::service::aggregate;
///
/// let row = |donor: &str, amount, date: &str| CSVDonationEntity {
///     donor_id: donor.to_string(),
///     name: "Alice".to_string(),
///     amount,
///     date: date.to_string(),
/// };
/// let mut record_set = RecordSet::default();
/// record_set.rows = vec![row("D1", dec!(50), "1/2/2024"), row("D1", dec!(25), "3/4/2024")];
///
/// let snapshot = aggregate(&record_set).unwrap();
/// assert_eq!(snapshot["D1"].lifetime_amount, dec!(75));
///
/// record_set.rows.push(row("D1", dec!(1), "2024-05-06"));
/// let error = aggregate(&record_set).unwrap_err();
/// assert!(matches!(
///     error.downcast_ref::<DonationError>(),
///     Some(DonationError::InvalidDate { .. })
/// ));
/// ```
pub fn aggregate(record_set: &RecordSet) -> Result<Snapshot> {
    let donations = record_set
        .rows
        .iter()
        .cloned()
        .map(DonationRecord::try_from)
        .collect::<std::result::Result<Vec<_>, DonationError>>()?;

    aggregate_donations(&donations)
}

/// Group validated donations by donor. The total is the sum of the amounts,
/// the last donation is the most recent date and the name is the one of the
/// donor's first donation in iteration order. Fails with
/// [DonationError::AmountOverflow] when a total cannot be held exactly.
pub fn aggregate_donations<'a>(
    donations: impl IntoIterator<Item = &'a DonationRecord>,
) -> Result<Snapshot> {
    let mut snapshot = Snapshot::new();

    for donation in donations {
        match snapshot.entry(donation.donor_id.clone()) {
            Entry::Occupied(mut entry) => entry.get_mut().add_donation(donation)?,
            Entry::Vacant(entry) => {
                entry.insert(DonorAggregate::from(donation));
            }
        }
    }

    Ok(snapshot)
}
