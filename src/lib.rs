//! # voxmap
//!
//! N-dimensional scientific images: a data buffer paired with a coordinate
//! map, an affine transform that sends every index of the buffer to a
//! point in a named physical space.
//!
//! Slicing an image with integers, ranges and steps yields a new image that
//! views the same buffer and whose affine has been updated so that every
//! surviving index still lands on the same physical point. Images can be
//! traversed slab by slab along the leading axis or region by region with a
//! label array, and the chunks can be written back into a buffer of the
//! same shape.
//!
//! Images are read from NIfTI-1 files (`.nii`, `.nii.gz`) and from
//! directories of DICOM files, and written as NIfTI-1. DICOM slices are
//! decoded in parallel using rayon.
//!
//! Any container that implements [`Indexable`] can back an image; ndarray
//! arrays and views do so out of the box.
//!
//! # Examples
//!
//! ## Slicing a loaded image
//!
//! Read a volume, take the tenth axial plane and map one of its voxels to
//! physical coordinates.
//!
//! ```no_run
//! # use voxmap::{load_image, AxisIndex};
//! let image = load_image("anatomical.nii.gz")?;
//! let plane = image.slice(&[AxisIndex::Index(10)])?;
//! let point = plane.coordmap().to_physical(&[32.0, 32.0])?;
//! println!("{:?} -> {:?}", plane.shape(), point);
//! # Ok::<(), voxmap::ImageError>(())
//! ```
//!
//! ## Copying an image slab by slab
//!
//! ```
//! # use voxmap::{data_generator, fromarray, write_data};
//! # use ndarray::{ArrayD, IxDyn};
//! let source = fromarray(ArrayD::from_elem(IxDyn(&[3, 4]), 2.0), None)?;
//! let mut copy = fromarray(ArrayD::<f64>::zeros(IxDyn(&[3, 4])), None)?;
//! write_data(&mut copy, data_generator(&source))?;
//! assert_eq!(source.to_array(), copy.to_array());
//! # Ok::<(), voxmap::ImageError>(())
//! ```

pub mod affine;
pub mod coordmap;
pub mod enums;
pub mod error;
pub mod image;
pub mod indexable;
pub mod io;
pub mod parcels;
pub mod slicing;
pub mod traversal;

pub use affine::AffineTransform;
pub use coordmap::CoordinateMap;
pub use enums::{DataType, SortBy};
pub use error::{ErrorKind, FormatError, ImageError, Result};
pub use image::{Image, fromarray};
pub use indexable::{Indexable, IndexableMut};
pub use io::{Header, HeaderValue, load_image, save_image};
pub use parcels::{Parcel, parcels};
pub use slicing::AxisIndex;
pub use traversal::{data_generator, data_generator_at, parcel_generator, write_data};
