//! [`Reservation`]-related read definitions.

use std::fmt;

use common::DateRange;
use derive_more::{Deref, From};

use crate::domain::Reservation;
#[cfg(doc)]
use crate::domain::{reservation::Status, Room};

/// [`Reservation`] holding its [`Room`] (either [`Status::Confirmed`] or
/// [`Status::CheckedIn`]).
#[derive(Clone, Debug, Deref, From)]
pub struct Active<T>(pub T);

/// [`Reservation`] awaiting its payment ([`Status::Pending`]).
#[derive(Clone, Debug, Deref, From)]
pub struct Pending<T>(pub T);

/// Result of checking a [`Room`] availability for some stay.
#[derive(Clone, Debug, Default)]
pub struct Availability {
    /// [`Active`] [`Reservation`]s overlapping the requested stay.
    pub conflicts: Vec<Active<Reservation>>,
}

impl Availability {
    /// Builds an [`Availability`] of the provided `stay` among the given
    /// [`Active`] [`Reservation`]s of the same [`Room`].
    #[must_use]
    pub fn among(
        stay: &DateRange,
        active: impl IntoIterator<Item = Active<Reservation>>,
    ) -> Self {
        Self {
            conflicts: active
                .into_iter()
                .filter(|r| r.stay.overlaps(stay))
                .collect(),
        }
    }

    /// Indicates whether the requested stay is free.
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.conflicts.is_empty()
    }

    /// Returns the stays of the conflicting [`Reservation`]s.
    #[must_use]
    pub fn conflicting_stays(&self) -> Conflicts {
        self.conflicts.iter().map(|r| r.stay).collect()
    }
}

/// Stays of [`Active`] [`Reservation`]s conflicting with a requested one.
#[derive(Clone, Debug, Default, Deref, Eq, PartialEq)]
pub struct Conflicts(Vec<DateRange>);

impl FromIterator<DateRange> for Conflicts {
    fn from_iter<I: IntoIterator<Item = DateRange>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for Conflicts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (n, stay) in self.0.iter().enumerate() {
            if n > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{stay}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod spec {
    use common::DateTime;

    use crate::domain::{
        payment,
        reservation::spec::{pending, stay},
        Reservation,
    };

    use super::{Active, Availability};

    fn active(from: u8, to: u8) -> Active<Reservation> {
        let mut r = pending(stay(from, to));
        let receipt = payment::Receipt {
            reference: r.reference.clone().into(),
            amount: r.total,
            method: None,
            paid_at: None,
        };
        r.confirm(&receipt, DateTime::now()).unwrap();
        Active(r)
    }

    #[test]
    fn reports_all_conflicts() {
        let availability = Availability::among(
            &stay(3, 8),
            [active(1, 4), active(5, 6), active(7, 9), active(10, 12)],
        );

        assert!(!availability.is_available());
        assert_eq!(
            *availability.conflicting_stays(),
            [stay(1, 4), stay(5, 6), stay(7, 9)],
        );
        assert_eq!(
            availability.conflicting_stays().to_string(),
            "2031-03-01..2031-03-04, 2031-03-05..2031-03-06, \
             2031-03-07..2031-03-09",
        );
    }

    #[test]
    fn back_to_back_stays_are_available() {
        let availability =
            Availability::among(&stay(5, 8), [active(2, 5), active(8, 10)]);

        assert!(availability.is_available());
    }
}
