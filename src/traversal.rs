//! Chunked traversal of an index space and reassembly of the chunks.
//!
//! A generator yields `(where, values)` pairs; [`write_data`] consumes the
//! same kind of pairs and puts the values back. Feeding the output of a
//! generator over `x` into `write_data` on a zero-filled buffer of the same
//! shape reproduces `x` exactly.

use std::ops::Range;

use log::debug;
use ndarray::{Array1, ArrayD, ArrayViewD, ArrayViewMutD, Axis};

use crate::error::{ImageError, Result};
use crate::indexable::{Indexable, IndexableMut};
use crate::parcels::{Parcel, ParcelLabel, Parcels};

/// Leading-axis slabs of a buffer, each paired with its index.
pub struct DataGenerator<'a, T, I> {
    view: ArrayViewD<'a, T>,
    indices: I,
}

impl<'a, T, I> Iterator for DataGenerator<'a, T, I>
where
    I: Iterator<Item = usize>,
{
    type Item = (usize, ArrayViewD<'a, T>);

    fn next(&mut self) -> Option<Self::Item> {
        let index = self.indices.next()?;
        Some((index, self.view.clone().index_axis_move(Axis(0), index)))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.indices.size_hint()
    }
}

impl<T, I: ExactSizeIterator<Item = usize>> ExactSizeIterator for DataGenerator<'_, T, I> {}

/// Yield `(i, target[i])` for every index along the leading axis.
///
/// A rank-0 buffer has no leading axis and yields nothing.
pub fn data_generator<B: Indexable>(target: &B) -> DataGenerator<'_, B::Elem, Range<usize>> {
    let extent = target.shape().first().copied().unwrap_or(0);
    DataGenerator {
        view: target.view(),
        indices: 0..extent,
    }
}

/// Yield `(i, target[i])` for the given leading-axis indices, in order.
///
/// # Errors
///
/// Returns [`ImageError::IndexOutOfBounds`] before yielding anything if
/// one of the indices does not address the leading axis.
pub fn data_generator_at<B, I>(
    target: &B,
    indices: I,
) -> Result<DataGenerator<'_, B::Elem, std::vec::IntoIter<usize>>>
where
    B: Indexable,
    I: IntoIterator<Item = usize>,
{
    let extent = target.shape().first().copied().unwrap_or(0);
    let indices: Vec<usize> = indices.into_iter().collect();
    if let Some(&index) = indices.iter().find(|&&i| i >= extent) {
        return Err(ImageError::IndexOutOfBounds {
            axis: 0,
            index: index as isize,
            extent,
        });
    }
    Ok(DataGenerator {
        view: target.view(),
        indices: indices.into_iter(),
    })
}

/// Masked selections of a buffer, one per parcel.
pub struct ParcelGenerator<'a, 'p, T, L> {
    view: ArrayViewD<'a, T>,
    parcels: Parcels<'p, L>,
}

impl<T: Clone, L: ParcelLabel> Iterator for ParcelGenerator<'_, '_, T, L> {
    type Item = (Parcel<L>, Array1<T>);

    fn next(&mut self) -> Option<Self::Item> {
        let parcel = self.parcels.next()?;
        let values: Array1<T> = self
            .view
            .iter()
            .zip(parcel.mask().iter())
            .filter(|(_, selected)| **selected)
            .map(|(value, _)| value.clone())
            .collect();
        Some((parcel, values))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.parcels.size_hint()
    }
}

/// Yield `(parcel, values)` with the target's elements under each mask, in
/// logical index order.
///
/// # Errors
///
/// Returns [`ImageError::Value`] if the label array and the target differ
/// in shape.
pub fn parcel_generator<'a, 'p, B, L>(
    target: &'a B,
    parcels: Parcels<'p, L>,
) -> Result<ParcelGenerator<'a, 'p, B::Elem, L>>
where
    B: Indexable,
    L: ParcelLabel,
{
    if parcels.shape() != target.shape() {
        return Err(ImageError::value(format!(
            "label array of shape {:?} does not cover a target of shape {:?}",
            parcels.shape(),
            target.shape()
        )));
    }
    Ok(ParcelGenerator {
        view: target.view(),
        parcels,
    })
}

/// A generator item that knows where its values go.
pub trait Placement<T> {
    fn place(self, destination: &mut ArrayViewMutD<'_, T>) -> Result<()>;
}

impl<T: Clone> Placement<T> for (usize, ArrayViewD<'_, T>) {
    fn place(self, destination: &mut ArrayViewMutD<'_, T>) -> Result<()> {
        place_slab(destination, self.0, &self.1)
    }
}

impl<T: Clone> Placement<T> for (usize, ArrayD<T>) {
    fn place(self, destination: &mut ArrayViewMutD<'_, T>) -> Result<()> {
        place_slab(destination, self.0, &self.1.view())
    }
}

impl<L, T: Clone> Placement<T> for (Parcel<L>, Array1<T>)
where
    L: ParcelLabel,
{
    fn place(self, destination: &mut ArrayViewMutD<'_, T>) -> Result<()> {
        let (parcel, values) = self;
        if parcel.mask().shape() != destination.shape() {
            return Err(ImageError::value(format!(
                "mask of shape {:?} does not fit a destination of shape {:?}",
                parcel.mask().shape(),
                destination.shape()
            )));
        }
        if parcel.count() != values.len() {
            return Err(ImageError::value(format!(
                "parcel {:?} selects {} elements but {} values were given",
                parcel.label(),
                parcel.count(),
                values.len()
            )));
        }
        let slots = destination
            .iter_mut()
            .zip(parcel.mask().iter())
            .filter(|(_, selected)| **selected)
            .map(|(slot, _)| slot);
        for (slot, value) in slots.zip(values.iter()) {
            *slot = value.clone();
        }
        Ok(())
    }
}

fn place_slab<T: Clone>(
    destination: &mut ArrayViewMutD<'_, T>,
    index: usize,
    slab: &ArrayViewD<'_, T>,
) -> Result<()> {
    let extent = destination.shape().first().copied().unwrap_or(0);
    if index >= extent {
        return Err(ImageError::IndexOutOfBounds {
            axis: 0,
            index: index as isize,
            extent,
        });
    }
    let mut target = destination.index_axis_mut(Axis(0), index);
    if target.shape() != slab.shape() {
        return Err(ImageError::value(format!(
            "slab of shape {:?} does not fit destination slab of shape {:?}",
            slab.shape(),
            target.shape()
        )));
    }
    target.assign(slab);
    Ok(())
}

/// Store every item of `generator` into `destination`.
///
/// Items are placed in order, so a later item overwrites an earlier one
/// where they overlap. Stops at the first item that does not fit.
pub fn write_data<B, I>(destination: &mut B, generator: I) -> Result<()>
where
    B: IndexableMut,
    I: IntoIterator,
    I::Item: Placement<B::Elem>,
{
    let mut view = destination.view_mut();
    let mut placed = 0usize;
    for item in generator {
        item.place(&mut view)?;
        placed += 1;
    }
    debug!("write_data placed {placed} chunks into shape {:?}", view.shape());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::parcels::parcels;
    use ndarray::{Array, IxDyn, arr2};

    fn ramp(shape: &[usize]) -> ArrayD<f64> {
        let len = shape.iter().product::<usize>();
        Array::from_shape_vec(IxDyn(shape), (0..len).map(|v| v as f64).collect()).unwrap()
    }

    #[test]
    fn leading_axis_round_trip() {
        let x = ramp(&[3, 4, 2]);
        let mut y = ArrayD::<f64>::zeros(IxDyn(&[3, 4, 2]));
        write_data(&mut y, data_generator(&x)).unwrap();
        assert_eq!(x, y);
    }

    #[test]
    fn generators_are_restartable() {
        let x = ramp(&[3, 2]);
        let first: Vec<usize> = data_generator(&x).map(|(i, _)| i).collect();
        let second: Vec<usize> = data_generator(&x).map(|(i, _)| i).collect();
        assert_eq!(first, vec![0, 1, 2]);
        assert_eq!(first, second);
        assert_eq!(data_generator(&x).len(), 3);
    }

    #[test]
    fn explicit_indices_are_validated_up_front() {
        let x = ramp(&[3, 2]);
        let picked: Vec<f64> = data_generator_at(&x, [2, 0])
            .unwrap()
            .map(|(_, s)| s[[0]])
            .collect();
        assert_eq!(picked, vec![4.0, 0.0]);
        let err = data_generator_at(&x, [1, 3]).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Index);
    }

    #[test]
    fn owned_items_are_placed_too() {
        let mut y = ArrayD::<f64>::zeros(IxDyn(&[2, 2]));
        let items = vec![(1usize, ndarray::arr1(&[5.0, 6.0]).into_dyn())];
        write_data(&mut y, items).unwrap();
        assert_eq!(y, arr2(&[[0.0, 0.0], [5.0, 6.0]]).into_dyn());
    }

    #[test]
    fn misfit_items_are_rejected() {
        let mut y = ArrayD::<f64>::zeros(IxDyn(&[2, 2]));
        let wrong_shape = vec![(0usize, ndarray::arr1(&[1.0, 2.0, 3.0]).into_dyn())];
        assert_eq!(write_data(&mut y, wrong_shape).unwrap_err().kind(), ErrorKind::Value);
        let wrong_index = vec![(2usize, ndarray::arr1(&[1.0, 2.0]).into_dyn())];
        assert_eq!(write_data(&mut y, wrong_index).unwrap_err().kind(), ErrorKind::Index);
    }

    #[test]
    fn parcel_round_trip() {
        let x = ramp(&[2, 3]);
        let labels = arr2(&[[1, 0, 1], [2, 2, 0]]).into_dyn();
        let chunks: Vec<(Parcel<i32>, Array1<f64>)> = parcel_generator(&x, parcels(&labels, None))
            .unwrap()
            .collect();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[1].1, ndarray::arr1(&[0.0, 2.0]));
        assert_eq!(chunks.iter().map(|(_, v)| v.len()).sum::<usize>(), x.len());

        let mut y = ArrayD::<f64>::zeros(IxDyn(&[2, 3]));
        write_data(&mut y, chunks).unwrap();
        assert_eq!(x, y);
    }

    #[test]
    fn parcel_generator_checks_shape() {
        let x = ramp(&[2, 3]);
        let labels = arr2(&[[1, 0], [2, 2]]).into_dyn();
        let err = parcel_generator(&x, parcels(&labels, None)).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Value);
    }

    #[test]
    fn parcel_values_must_match_count() {
        let labels = arr2(&[[1, 0], [1, 1]]).into_dyn();
        let parcel = parcels(&labels, Some(&[1][..])).next().unwrap();
        let mut y = ArrayD::<f64>::zeros(IxDyn(&[2, 2]));
        let err = write_data(&mut y, vec![(parcel, ndarray::arr1(&[1.0]))]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Value);
    }
}
