use std::collections::btree_map::Entry;

use crate::model::Snapshot;
use crate::Result;

/// The result of a merge with what changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutcome {
    /// The new authoritative table.
    pub snapshot: Snapshot,

    /// Donors seen for the first time.
    pub new_donors: usize,

    /// Donors that were already in the table and gave again.
    pub updated_donors: usize,
}

/// Merge a freshly aggregated batch into the existing table.
///
/// Without an existing table the batch becomes the table. Otherwise donors of
/// both sides get their totals summed, the latest date and the incoming name,
/// and donors of one side only are carried through unchanged.
///
/// Merging the same batch twice counts it twice: the caller must make sure a
/// batch is merged once. A total that cannot be held exactly fails the whole
/// merge with [DonationError::AmountOverflow](crate::model::DonationError).
///
/// ```
/// use chrono::NaiveDate;
/// use rust_decimal_macros::dec;
/// use donor_ledger::model::{DonorAggregate, Snapshot};
/// use donor_ledger::service::merge;
///
/// let alice = |amount, date| DonorAggregate::new("D1", "Alice", amount, date);
/// let existing = Snapshot::from([("D1".to_string(), alice(dec!(75), NaiveDate::from_ymd_opt(2024, 3, 4).unwrap()))]);
/// let incoming = Snapshot::from([("D1".to_string(), alice(dec!(20), NaiveDate::from_ymd_opt(2024, 4, 1).unwrap()))]);
///
/// let merged = merge(incoming.clone(), Some(existing)).unwrap();
/// assert_eq!(merged["D1"], alice(dec!(95), NaiveDate::from_ymd_opt(2024, 4, 1).unwrap()));
///
/// // first run
/// assert_eq!(merge(incoming.clone(), None).unwrap(), incoming);
/// ```
pub fn merge(incoming: Snapshot, existing: Option<Snapshot>) -> Result<Snapshot> {
    Ok(merge_report(incoming, existing)?.snapshot)
}

/// Same as [merge] but also counts the new and updated donors.
pub fn merge_report(incoming: Snapshot, existing: Option<Snapshot>) -> Result<MergeOutcome> {
    let Some(mut merged) = existing else {
        return Ok(MergeOutcome {
            new_donors: incoming.len(),
            updated_donors: 0,
            snapshot: incoming,
        });
    };
    let mut new_donors = 0;
    let mut updated_donors = 0;

    for (donor_id, aggregate) in incoming {
        match merged.entry(donor_id) {
            Entry::Occupied(mut entry) => {
                entry.get_mut().absorb(aggregate)?;
                updated_donors += 1;
            }
            Entry::Vacant(entry) => {
                entry.insert(aggregate);
                new_donors += 1;
            }
        }
    }

    Ok(MergeOutcome {
        snapshot: merged,
        new_donors,
        updated_donors,
    })
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    use crate::model::{DonationError, DonorAggregate};

    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn snapshot(aggregates: &[(&str, &str, Decimal, NaiveDate)]) -> Snapshot {
        aggregates
            .iter()
            .map(|(donor_id, name, amount, last)| {
                (
                    donor_id.to_string(),
                    DonorAggregate::new(*donor_id, *name, *amount, *last),
                )
            })
            .collect()
    }

    #[test]
    fn test_first_run_is_identity() {
        for incoming in [
            Snapshot::new(),
            snapshot(&[("D1", "Alice", dec!(75), date(2024, 3, 4))]),
            snapshot(&[
                ("D1", "Alice", dec!(75), date(2024, 3, 4)),
                ("D2", "Bob", dec!(10), date(2024, 1, 1)),
            ]),
        ] {
            let outcome = merge_report(incoming.clone(), None).unwrap();

            assert_eq!(outcome.snapshot, incoming);
            assert_eq!(outcome.new_donors, incoming.len());
            assert_eq!(outcome.updated_donors, 0);
        }
    }

    #[test]
    fn test_union_of_donors() {
        let existing = snapshot(&[
            ("D1", "Alice", dec!(75), date(2024, 3, 4)),
            ("D2", "Bob", dec!(10), date(2024, 1, 1)),
        ]);
        let incoming = snapshot(&[
            ("D1", "Alice Smith", dec!(20.05), date(2024, 2, 1)),
            ("D3", "Carol", dec!(5), date(2024, 4, 1)),
        ]);

        let outcome = merge_report(incoming, Some(existing)).unwrap();

        assert_eq!(outcome.new_donors, 1);
        assert_eq!(outcome.updated_donors, 1);
        assert_eq!(
            outcome.snapshot,
            snapshot(&[
                // older incoming date keeps the existing last donation
                ("D1", "Alice Smith", dec!(95.05), date(2024, 3, 4)),
                ("D2", "Bob", dec!(10), date(2024, 1, 1)),
                ("D3", "Carol", dec!(5), date(2024, 4, 1)),
            ])
        );
    }

    #[test]
    fn test_totals_never_decrease() {
        let existing = snapshot(&[("D1", "Alice", dec!(75), date(2024, 3, 4))]);
        let incoming = snapshot(&[("D1", "Alice", dec!(0.01), date(2024, 3, 5))]);

        let merged = merge(incoming, Some(existing.clone())).unwrap();

        assert!(merged["D1"].lifetime_amount >= existing["D1"].lifetime_amount);
        assert_eq!(merged["D1"].lifetime_amount, dec!(75.01));
    }

    #[test]
    fn test_merge_into_empty_table() {
        let incoming = snapshot(&[("D1", "Alice", dec!(1), date(2024, 3, 4))]);
        let outcome = merge_report(incoming.clone(), Some(Snapshot::new())).unwrap();

        assert_eq!(outcome.snapshot, incoming);
        assert_eq!(outcome.new_donors, 1);
    }

    #[test]
    fn test_merging_twice_double_counts() {
        let incoming = snapshot(&[("D1", "Alice", dec!(20), date(2024, 4, 1))]);
        let once = merge(incoming.clone(), None).unwrap();
        let twice = merge(incoming, Some(once)).unwrap();

        assert_eq!(twice["D1"].lifetime_amount, dec!(40));
    }

    #[test]
    fn test_total_past_decimal_range_fails_merge() {
        let existing = snapshot(&[("D1", "Alice", Decimal::MAX, date(2024, 3, 4))]);
        let incoming = snapshot(&[
            ("D0", "Zoe", dec!(3), date(2024, 4, 1)),
            ("D1", "Alice", dec!(1), date(2024, 4, 1)),
        ]);

        let error = merge_report(incoming, Some(existing)).unwrap_err();

        assert!(matches!(
            error.downcast_ref::<DonationError>(),
            Some(DonationError::AmountOverflow { donor_id, lifetime_amount, .. })
            if donor_id == "D1" && *lifetime_amount == Decimal::MAX
        ));
    }

    #[test]
    fn test_total_that_would_round_fails_merge() {
        let existing = snapshot(&[("D1", "Alice", dec!(7922816251426433759354395033), date(2024, 3, 4))]);
        let incoming = snapshot(&[("D1", "Alice", dec!(0.01), date(2024, 4, 1))]);

        let error = merge(incoming, Some(existing)).unwrap_err();

        assert!(matches!(
            error.downcast_ref::<DonationError>(),
            Some(DonationError::AmountOverflow { .. })
        ));
    }
}
