//! Label-defined regions of an index space.

use std::cmp::Ordering;
use std::fmt::Debug;

use ndarray::{ArrayD, ArrayViewD};

use crate::indexable::Indexable;

/// Element type usable as a parcel label.
///
/// NaN labels (for float types) form one group of their own.
pub trait ParcelLabel: Copy + PartialOrd + Debug {
    fn is_nan(&self) -> bool {
        false
    }
}

macro_rules! impl_integer_label {
    ($($t:ty),*) => {
        $(impl ParcelLabel for $t {})*
    };
}

impl_integer_label!(u8, u16, u32, u64, i8, i16, i32, i64, usize, isize);

impl ParcelLabel for f32 {
    fn is_nan(&self) -> bool {
        f32::is_nan(*self)
    }
}

impl ParcelLabel for f64 {
    fn is_nan(&self) -> bool {
        f64::is_nan(*self)
    }
}

fn same_group<L: ParcelLabel>(a: L, b: L) -> bool {
    a == b || (a.is_nan() && b.is_nan())
}

/// Ascending order with NaN after every number.
fn label_order<L: ParcelLabel>(a: &L, b: &L) -> Ordering {
    a.partial_cmp(b)
        .unwrap_or_else(|| a.is_nan().cmp(&b.is_nan()))
}

/// One region: the label and a boolean mask over the label array.
#[derive(Debug, Clone, PartialEq)]
pub struct Parcel<L> {
    label: L,
    mask: ArrayD<bool>,
    count: usize,
}

impl<L: Copy> Parcel<L> {
    pub fn label(&self) -> L {
        self.label
    }

    pub fn mask(&self) -> &ArrayD<bool> {
        &self.mask
    }

    /// Number of selected elements.
    pub fn count(&self) -> usize {
        self.count
    }

    pub fn into_mask(self) -> ArrayD<bool> {
        self.mask
    }
}

/// Lazy sequence of [`Parcel`]s, one per label.
pub struct Parcels<'a, L> {
    label_array: ArrayViewD<'a, L>,
    labels: std::vec::IntoIter<L>,
}

impl<L> Parcels<'_, L> {
    /// Shape of the label array, which every mask shares.
    pub fn shape(&self) -> &[usize] {
        self.label_array.shape()
    }
}

impl<L: ParcelLabel> Iterator for Parcels<'_, L> {
    type Item = Parcel<L>;

    fn next(&mut self) -> Option<Self::Item> {
        let label = self.labels.next()?;
        let mask = self.label_array.mapv(|v| same_group(v, label));
        let count = mask.iter().filter(|&&selected| selected).count();
        Some(Parcel { label, mask, count })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.labels.size_hint()
    }
}

impl<L: ParcelLabel> ExactSizeIterator for Parcels<'_, L> {}

/// Partition `label_array` by value.
///
/// With `labels`, exactly those labels are visited in the given order; a
/// label missing from the array yields an empty mask. Without, every
/// distinct value is visited in ascending order, NaN last, and the masks
/// partition the array.
pub fn parcels<'a, B, L>(label_array: &'a B, labels: Option<&[L]>) -> Parcels<'a, L>
where
    B: Indexable<Elem = L>,
    L: ParcelLabel,
{
    let view = label_array.view();
    let labels = match labels {
        Some(labels) => labels.to_vec(),
        None => distinct_labels(&view),
    };
    Parcels {
        label_array: view,
        labels: labels.into_iter(),
    }
}

fn distinct_labels<L: ParcelLabel>(view: &ArrayViewD<'_, L>) -> Vec<L> {
    let mut values: Vec<L> = view.iter().copied().collect();
    values.sort_by(label_order);
    values.dedup_by(|a, b| same_group(*a, *b));
    values
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{IxDyn, arr2};

    #[test]
    fn distinct_labels_partition_the_array() {
        let labels = arr2(&[[3, 1, 3], [2, 1, 7]]).into_dyn();
        let found: Vec<Parcel<i32>> = parcels(&labels, None).collect();
        let order: Vec<i32> = found.iter().map(Parcel::label).collect();
        assert_eq!(order, vec![1, 2, 3, 7]);
        assert_eq!(found.iter().map(Parcel::count).sum::<usize>(), labels.len());

        let mut covered = ArrayD::<u8>::zeros(IxDyn(&[2, 3]));
        for parcel in &found {
            covered.zip_mut_with(parcel.mask(), |c, &m| *c += m as u8);
        }
        assert!(covered.iter().all(|&c| c == 1));
    }

    #[test]
    fn explicit_labels_fix_subset_and_order() {
        let labels = arr2(&[[3, 1, 3], [2, 1, 7]]).into_dyn();
        let found: Vec<(i32, usize)> = parcels(&labels, Some(&[3, 9, 1][..]))
            .map(|p| (p.label(), p.count()))
            .collect();
        assert_eq!(found, vec![(3, 2), (9, 0), (1, 2)]);
    }

    #[test]
    fn nan_is_its_own_group_visited_last() {
        let labels = arr2(&[[f64::NAN, 0.5], [-1.0, f64::NAN]]).into_dyn();
        let found: Vec<Parcel<f64>> = parcels(&labels, None).collect();
        assert_eq!(found.len(), 3);
        assert_eq!(found[0].label(), -1.0);
        assert_eq!(found[1].label(), 0.5);
        assert!(found[2].label().is_nan());
        assert_eq!(found[2].count(), 2);
        assert!(found[2].mask()[[0, 0]]);
    }

    #[test]
    fn parcels_are_lazy_and_sized() {
        let labels = arr2(&[[0u8, 1], [1, 1]]).into_dyn();
        let mut iter = parcels(&labels, None);
        assert_eq!(iter.len(), 2);
        assert_eq!(iter.shape(), &[2, 2]);
        assert_eq!(iter.next().map(|p| p.count()), Some(1));
        assert_eq!(iter.len(), 1);
    }
}
