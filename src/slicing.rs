//! Index specifications and their resolution against an index space.
//!
//! Resolution follows Python sequence semantics: negative values count
//! from the end of the axis, slice bounds are clamped to the axis, and the
//! element count of a stepped slice rounds up so a trailing partial step
//! still contributes one element.

use std::ops::{Range, RangeFrom, RangeFull, RangeTo};

use ndarray::SliceInfoElem;

use crate::error::{ImageError, Result};

/// Selection applied to one axis of an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisIndex {
    /// A single position; the axis is removed from the result.
    Index(isize),
    /// A (possibly stepped) range; the axis is kept.
    Slice {
        start: Option<isize>,
        stop: Option<isize>,
        step: isize,
    },
    /// The whole axis.
    Full,
}

impl AxisIndex {
    pub fn range(start: isize, stop: isize) -> Self {
        AxisIndex::Slice {
            start: Some(start),
            stop: Some(stop),
            step: 1,
        }
    }

    pub fn stepped(start: isize, stop: isize, step: isize) -> Self {
        AxisIndex::Slice {
            start: Some(start),
            stop: Some(stop),
            step,
        }
    }

    /// Whole axis with a step, i.e. `::step`.
    pub fn every(step: isize) -> Self {
        AxisIndex::Slice {
            start: None,
            stop: None,
            step,
        }
    }
}

impl From<isize> for AxisIndex {
    fn from(index: isize) -> Self {
        AxisIndex::Index(index)
    }
}

impl From<Range<isize>> for AxisIndex {
    fn from(range: Range<isize>) -> Self {
        AxisIndex::range(range.start, range.end)
    }
}

impl From<RangeFrom<isize>> for AxisIndex {
    fn from(range: RangeFrom<isize>) -> Self {
        AxisIndex::Slice {
            start: Some(range.start),
            stop: None,
            step: 1,
        }
    }
}

impl From<RangeTo<isize>> for AxisIndex {
    fn from(range: RangeTo<isize>) -> Self {
        AxisIndex::Slice {
            start: None,
            stop: Some(range.end),
            step: 1,
        }
    }
}

impl From<RangeFull> for AxisIndex {
    fn from(_: RangeFull) -> Self {
        AxisIndex::Full
    }
}

/// An [`AxisIndex`] resolved against a concrete extent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedAxis {
    Fixed(usize),
    Range { start: usize, step: isize, len: usize },
}

impl ResolvedAxis {
    /// Position in the parent axis of the first selected element.
    pub fn start(&self) -> usize {
        match *self {
            ResolvedAxis::Fixed(index) => index,
            ResolvedAxis::Range { start, .. } => start,
        }
    }

    pub fn step(&self) -> isize {
        match *self {
            ResolvedAxis::Fixed(_) => 1,
            ResolvedAxis::Range { step, .. } => step,
        }
    }

    /// Extent kept in the result, `None` if the axis is dropped.
    pub fn len(&self) -> Option<usize> {
        match *self {
            ResolvedAxis::Fixed(_) => None,
            ResolvedAxis::Range { len, .. } => Some(len),
        }
    }

    /// Equivalent ndarray slice element. ndarray walks a negative step from
    /// the end of its range, so the range is expressed as `[last, first]`.
    pub(crate) fn slice_info(&self) -> SliceInfoElem {
        match *self {
            ResolvedAxis::Fixed(index) => SliceInfoElem::Index(index as isize),
            ResolvedAxis::Range { len: 0, .. } => SliceInfoElem::Slice {
                start: 0,
                end: Some(0),
                step: 1,
            },
            ResolvedAxis::Range { start, step, len } => {
                let first = start as isize;
                let last = first + (len as isize - 1) * step;
                let (lo, hi) = if step > 0 { (first, last) } else { (last, first) };
                SliceInfoElem::Slice {
                    start: lo,
                    end: Some(hi + 1),
                    step,
                }
            }
        }
    }
}

/// Resolve `key` against `shape`. Missing trailing entries select the
/// whole axis.
pub fn resolve(key: &[AxisIndex], shape: &[usize]) -> Result<Vec<ResolvedAxis>> {
    if key.len() > shape.len() {
        return Err(ImageError::TooManyIndices {
            given: key.len(),
            rank: shape.len(),
        });
    }
    shape
        .iter()
        .enumerate()
        .map(|(axis, &extent)| {
            let index = key.get(axis).copied().unwrap_or(AxisIndex::Full);
            resolve_axis(axis, index, extent)
        })
        .collect()
}

fn resolve_axis(axis: usize, index: AxisIndex, extent: usize) -> Result<ResolvedAxis> {
    match index {
        AxisIndex::Index(i) => {
            let wrapped = if i < 0 { i + extent as isize } else { i };
            if wrapped < 0 || wrapped >= extent as isize {
                return Err(ImageError::IndexOutOfBounds {
                    axis,
                    index: i,
                    extent,
                });
            }
            Ok(ResolvedAxis::Fixed(wrapped as usize))
        }
        AxisIndex::Full => Ok(ResolvedAxis::Range {
            start: 0,
            step: 1,
            len: extent,
        }),
        AxisIndex::Slice { start, stop, step } => {
            let (start, len) = slice_bounds(start, stop, step, extent)?;
            Ok(ResolvedAxis::Range { start, step, len })
        }
    }
}

/// First index and element count of `start:stop:step` over `extent`.
fn slice_bounds(
    start: Option<isize>,
    stop: Option<isize>,
    step: isize,
    extent: usize,
) -> Result<(usize, usize)> {
    if step == 0 {
        return Err(ImageError::value("slice step cannot be zero"));
    }
    let n = extent as isize;

    let (first, count) = if step > 0 {
        let clamp = |v: isize| {
            let v = if v < 0 { v + n } else { v };
            v.clamp(0, n)
        };
        let lo = start.map_or(0, clamp);
        let hi = stop.map_or(n, clamp);
        let count = if hi > lo { (hi - lo - 1) / step + 1 } else { 0 };
        (lo, count)
    } else {
        // The stop bound is exclusive and may sit one before the axis (-1).
        let clamp = |v: isize| {
            let v = if v < 0 { v + n } else { v };
            v.clamp(-1, n - 1)
        };
        let hi = start.map_or(n - 1, clamp);
        let lo = stop.map_or(-1, clamp);
        let count = if hi > lo { (hi - lo - 1) / (-step) + 1 } else { 0 };
        (hi, count)
    };

    Ok((first.max(0) as usize, count as usize))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn lens(key: &[AxisIndex], shape: &[usize]) -> Vec<Option<usize>> {
        resolve(key, shape).unwrap().iter().map(|r| r.len()).collect()
    }

    #[test]
    fn integer_drops_axis_and_trailing_axes_are_full() {
        assert_eq!(lens(&[AxisIndex::Index(3)], &[21, 64, 64]), vec![None, Some(64), Some(64)]);
    }

    #[test]
    fn stepped_counts_round_up() {
        assert_eq!(lens(&[AxisIndex::stepped(0, 20, 2)], &[21]), vec![Some(10)]);
        assert_eq!(lens(&[AxisIndex::stepped(0, 21, 2)], &[21]), vec![Some(11)]);
        assert_eq!(lens(&[AxisIndex::every(3)], &[10]), vec![Some(4)]);
        assert_eq!(lens(&[AxisIndex::range(3, 5)], &[21]), vec![Some(2)]);
    }

    #[test]
    fn negative_bounds_wrap() {
        let r = resolve(&[(-3isize..-1).into()], &[10]).unwrap();
        assert_eq!(r[0], ResolvedAxis::Range { start: 7, step: 1, len: 2 });
        let r = resolve(&[(-1isize).into()], &[10]).unwrap();
        assert_eq!(r[0], ResolvedAxis::Fixed(9));
    }

    #[test]
    fn out_of_range_bounds_clamp() {
        assert_eq!(lens(&[AxisIndex::range(-100, 100)], &[5]), vec![Some(5)]);
        assert_eq!(lens(&[AxisIndex::range(4, 2)], &[5]), vec![Some(0)]);
    }

    #[test]
    fn negative_step_walks_backwards() {
        let r = resolve(&[AxisIndex::every(-2)], &[5]).unwrap();
        assert_eq!(r[0], ResolvedAxis::Range { start: 4, step: -2, len: 3 });
        assert_eq!(
            r[0].slice_info(),
            SliceInfoElem::Slice { start: 0, end: Some(5), step: -2 }
        );
        let r = resolve(&[AxisIndex::stepped(3, 0, -1)], &[5]).unwrap();
        assert_eq!(r[0], ResolvedAxis::Range { start: 3, step: -1, len: 3 });
    }

    #[test]
    fn zero_step_is_a_value_error() {
        let err = resolve(&[AxisIndex::every(0)], &[5]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Value);
    }

    #[test]
    fn out_of_bounds_integer_is_an_index_error() {
        let err = resolve(&[5isize.into()], &[5]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Index);
        let err = resolve(&[(-6isize).into()], &[5]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Index);
    }

    #[test]
    fn too_many_indices() {
        let err = resolve(&[AxisIndex::Full, AxisIndex::Full], &[5]).unwrap_err();
        assert!(matches!(err, ImageError::TooManyIndices { given: 2, rank: 1 }));
    }

    #[test]
    fn positive_step_slice_info() {
        let r = resolve(&[AxisIndex::stepped(1, 8, 3)], &[10]).unwrap();
        assert_eq!(
            r[0].slice_info(),
            SliceInfoElem::Slice { start: 1, end: Some(8), step: 3 }
        );
    }
}
