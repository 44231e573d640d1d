//! Stock rotation policies and eligible-lot ordering.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use lotline_core::DomainError;

use crate::lot::Lot;

/// Rotation policy deciding which lots serve an order first.
///
/// Configured per SKU/warehouse position (see `ReorderPolicy`); callers may
/// override it per allocation. Never hardcoded in the walk itself.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RotationPolicy {
    /// First-expire-first-out: ascending expiration, lots without an
    /// expiration last, ties broken by ascending receipt.
    #[default]
    Fefo,
    /// First-in-first-out: ascending receipt.
    Fifo,
    /// Last-in-first-out: descending receipt.
    Lifo,
}

impl core::fmt::Display for RotationPolicy {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            RotationPolicy::Fefo => "fefo",
            RotationPolicy::Fifo => "fifo",
            RotationPolicy::Lifo => "lifo",
        };
        f.write_str(s)
    }
}

impl FromStr for RotationPolicy {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fefo" => Ok(RotationPolicy::Fefo),
            "fifo" => Ok(RotationPolicy::Fifo),
            "lifo" => Ok(RotationPolicy::Lifo),
            other => Err(DomainError::validation(format!(
                "unknown rotation policy '{other}' (expected fefo, fifo or lifo)"
            ))),
        }
    }
}

/// Filter eligible lots and order them for the given rotation policy.
///
/// Eligibility excludes lots with a non-sellable quality status and lots with
/// zero unreserved quantity. Ordering is fully deterministic: every policy
/// tie-breaks on the position-unique lot number last.
pub fn eligible_in_rotation_order<'a>(
    lots: impl IntoIterator<Item = &'a Lot>,
    policy: RotationPolicy,
) -> Vec<&'a Lot> {
    let mut eligible: Vec<&Lot> = lots.into_iter().filter(|l| l.is_eligible()).collect();

    match policy {
        RotationPolicy::Fefo => {
            // `None` expirations sort last: (is_none, date) keeps dated lots first.
            eligible.sort_by_key(|l| {
                (
                    l.expiration.is_none(),
                    l.expiration,
                    l.received_at,
                    l.lot_number,
                )
            });
        }
        RotationPolicy::Fifo => {
            eligible.sort_by_key(|l| (l.received_at, l.lot_number));
        }
        RotationPolicy::Lifo => {
            eligible.sort_by_key(|l| (core::cmp::Reverse(l.received_at), core::cmp::Reverse(l.lot_number)));
        }
    }

    eligible
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lot::{LotId, QualityStatus};
    use chrono::{NaiveDate, TimeZone, Utc};

    fn lot(number: u32, day: u32, expiration: Option<NaiveDate>) -> Lot {
        Lot {
            id: LotId::new(),
            lot_number: number,
            initial_quantity: 10,
            current_quantity: 10,
            reserved_quantity: 0,
            expiration,
            best_before: None,
            quality: QualityStatus::Passed,
            bin_location: None,
            received_at: Utc.with_ymd_and_hms(2024, 1, day, 12, 0, 0).unwrap(),
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn fefo_orders_by_expiration_with_nulls_last() {
        let a = lot(1, 3, Some(date(2024, 3, 1)));
        let b = lot(2, 2, Some(date(2024, 1, 1)));
        let c = lot(3, 1, None);

        let ordered = eligible_in_rotation_order([&a, &b, &c], RotationPolicy::Fefo);
        let numbers: Vec<u32> = ordered.iter().map(|l| l.lot_number).collect();
        assert_eq!(numbers, vec![2, 1, 3]);
    }

    #[test]
    fn fefo_ties_break_by_receipt_date() {
        let exp = Some(date(2024, 2, 1));
        let early = lot(1, 1, exp);
        let late = lot(2, 5, exp);

        let ordered = eligible_in_rotation_order([&late, &early], RotationPolicy::Fefo);
        let numbers: Vec<u32> = ordered.iter().map(|l| l.lot_number).collect();
        assert_eq!(numbers, vec![1, 2]);
    }

    #[test]
    fn fifo_and_lifo_are_mirrored() {
        let first = lot(1, 1, None);
        let second = lot(2, 2, None);
        let third = lot(3, 3, None);
        let all = vec![second.clone(), third.clone(), first.clone()];

        let fifo: Vec<u32> = eligible_in_rotation_order(all.iter(), RotationPolicy::Fifo)
            .iter()
            .map(|l| l.lot_number)
            .collect();
        let lifo: Vec<u32> = eligible_in_rotation_order(all.iter(), RotationPolicy::Lifo)
            .iter()
            .map(|l| l.lot_number)
            .collect();

        assert_eq!(fifo, vec![1, 2, 3]);
        assert_eq!(lifo, vec![3, 2, 1]);
    }

    #[test]
    fn excludes_quarantined_failed_and_exhausted_lots() {
        let mut quarantined = lot(1, 1, None);
        quarantined.quality = QualityStatus::Quarantined;
        let mut failed = lot(2, 2, None);
        failed.quality = QualityStatus::Failed;
        let mut exhausted = lot(3, 3, None);
        exhausted.reserved_quantity = exhausted.current_quantity;
        let good = lot(4, 4, None);

        let all = vec![quarantined, failed, exhausted, good];
        let ordered = eligible_in_rotation_order(all.iter(), RotationPolicy::Fifo);
        assert_eq!(ordered.len(), 1);
        assert_eq!(ordered[0].lot_number, 4);
    }

    #[test]
    fn rotation_policy_parses_case_insensitively() {
        assert_eq!("FEFO".parse::<RotationPolicy>().unwrap(), RotationPolicy::Fefo);
        assert_eq!("fifo".parse::<RotationPolicy>().unwrap(), RotationPolicy::Fifo);
        assert_eq!("Lifo".parse::<RotationPolicy>().unwrap(), RotationPolicy::Lifo);
        assert!("newest".parse::<RotationPolicy>().is_err());
    }
}
