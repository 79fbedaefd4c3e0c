//! Ordered-table lookup
//!
//! A bisection primitive that works on either sort order, and the line
//! locator built on it for the descending line list.

use crate::error::{TransportError, TransportResult};

/// Sort direction of a table handed to [`binary_search`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

impl SortOrder {
    /// Whether `entry` lies on the near side of `value`
    ///
    /// True for a prefix of the table and false for the rest.
    #[inline]
    fn before(self, entry: f64, value: f64) -> bool {
        match self {
            SortOrder::Ascending => entry <= value,
            SortOrder::Descending => entry > value,
        }
    }
}

/// Bracket `value` inside `x[imin..=imax]`
///
/// Ascending tables return the largest `k` with `x[k] <= value`.
/// Descending tables return the largest `k` with `x[k] > value`, or `imin`
/// when `value` equals `x[imin]`.
///
/// Values outside `[x[imin], x[imax]]` (in table order) are an error.
pub fn binary_search(
    x: &[f64],
    value: f64,
    imin: usize,
    imax: usize,
    order: SortOrder,
) -> TransportResult<usize> {
    if imin > imax || imax >= x.len() {
        return Err(TransportError::InvalidSearchRange {
            imin,
            imax,
            len: x.len(),
        });
    }
    let (lower, upper) = match order {
        SortOrder::Ascending => (x[imin], x[imax]),
        SortOrder::Descending => (x[imax], x[imin]),
    };
    if value.is_nan() || value < lower || value > upper {
        return Err(TransportError::OutOfDomain { value, lower, upper });
    }

    let (mut lo, mut hi) = (imin, imax);
    while hi - lo > 2 {
        let mid = lo + (hi - lo) / 2;
        if order.before(x[mid], value) {
            lo = mid;
        } else {
            hi = mid;
        }
    }

    // At most three candidates left
    Ok((lo..=hi)
        .rev()
        .find(|&k| order.before(x[k], value))
        .unwrap_or(lo))
}

/// Index of the next line a packet at frequency `nu` will redshift into
///
/// For a strictly descending `lines`, returns `k` with
/// `lines[k - 1] > nu >= lines[k]`. Frequencies at or above the first line
/// give `0`; frequencies below the last line give `lines.len()`.
pub fn line_search(lines: &[f64], nu: f64) -> TransportResult<usize> {
    let Some(&last) = lines.last() else {
        return Ok(0);
    };
    if nu >= lines[0] {
        return Ok(0);
    }
    if nu < last {
        return Ok(lines.len());
    }
    Ok(binary_search(lines, nu, 0, lines.len() - 1, SortOrder::Descending)? + 1)
}
