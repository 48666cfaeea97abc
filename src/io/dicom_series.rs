//! DICOM series loader.
//!
//! A directory of single-frame `.dcm` files is stacked into a volume of
//! shape `(slice, row, column)`. Slices are decoded in parallel with rayon.
//! The affine comes from ImageOrientationPatient, ImagePositionPatient and
//! PixelSpacing, and maps indices to patient coordinates.
//!
//! Files are assumed to belong to one series and acquisition; only the
//! first frame of each file is used.

use std::fs;
use std::path::Path;

use dicom::core::Tag;
use dicom::object::{FileDicomObject, InMemDicomObject, open_file};
use dicom::pixeldata::{ConvertOptions, PixelDecoder, VoiLutOption};
use dicom_dictionary_std::tags;
use log::{debug, warn};
use nalgebra::{DMatrix, Vector3};
use ndarray::{Array2, Array3, s};
use rayon::prelude::*;

use super::{Header, LoadedVolume, Loader};
use crate::affine::AffineTransform;
use crate::enums::SortBy;
use crate::error::{FormatError, ImageError, Result};

const INPUT_NAMES: [&str; 3] = ["slice", "row", "column"];
const OUTPUT_NAMES: [&str; 3] = ["xspace", "yspace", "zspace"];

#[derive(Debug, Clone, Copy, Default)]
pub struct DicomSeries {
    pub sort_by: SortBy,
}

/// One decoded slice with the attributes used to order and place it.
struct SliceImage {
    order: Option<f64>,
    position: Option<Vector3<f64>>,
    pixels: Array2<f64>,
}

impl Loader for DicomSeries {
    fn load(&self, path: &Path) -> Result<LoadedVolume> {
        self.load_from_directory(path).map_err(|source| ImageError::Load {
            path: path.to_path_buf(),
            source,
        })
    }
}

impl DicomSeries {
    pub fn new(sort_by: SortBy) -> Self {
        Self { sort_by }
    }

    /// Load a volume from DICOM objects
    ///
    /// # Errors
    ///
    /// Returns error if no valid images found, dimensions are inconsistent
    /// or spacing information is missing.
    pub fn load_from_dicom_objects(
        &self,
        dicom_objects: &[FileDicomObject<InMemDicomObject>],
    ) -> std::result::Result<LoadedVolume, FormatError> {
        let mut slices: Vec<SliceImage> = dicom_objects
            .par_iter()
            .filter_map(|dicom_object| self.extract_slice(dicom_object))
            .collect();

        if slices.len() < dicom_objects.len() {
            warn!(
                "Skipped {} DICOM objects without decodable pixel data or sort key",
                dicom_objects.len() - slices.len()
            );
        }
        if slices.is_empty() {
            return Err(FormatError::NoValidImages);
        }

        self.sort_slices(&mut slices);
        Self::validate_dimensions(&slices)?;

        let (row_spacing, column_spacing, slice_thickness) =
            Self::get_spacing(dicom_objects).ok_or(FormatError::MissingSpacing)?;
        let orientation = dicom_objects.iter().find_map(Self::get_orientation);
        let transform = Self::build_transform(
            &slices,
            orientation,
            (row_spacing, column_spacing, slice_thickness),
        )?;
        let data = Self::build_volume_array(&slices).into_dyn();
        debug!("Loaded DICOM series with shape {:?}", data.shape());

        Ok(LoadedVolume {
            data,
            transform,
            header: Some(Self::build_header(&dicom_objects[0], slices.len())),
        })
    }

    /// Load a volume from file paths
    pub fn load_from_file_paths(
        &self,
        paths: &[impl AsRef<Path> + Sync],
    ) -> std::result::Result<LoadedVolume, FormatError> {
        let objects: std::result::Result<Vec<_>, _> = paths
            .par_iter()
            .map(|path| open_file(path.as_ref()))
            .collect();

        self.load_from_dicom_objects(&objects?)
    }

    /// Load a volume from every `.dcm` file directly inside `path`.
    ///
    /// Files are opened in name order; subdirectories are not searched.
    pub fn load_from_directory(
        &self,
        path: impl AsRef<Path>,
    ) -> std::result::Result<LoadedVolume, FormatError> {
        let mut paths = Vec::new();
        for entry in fs::read_dir(path.as_ref())? {
            let candidate = entry?.path();
            if candidate.is_file() && has_dicom_extension(&candidate) {
                paths.push(candidate);
            }
        }
        if paths.is_empty() {
            return Err(FormatError::NoValidImages);
        }
        paths.sort();
        debug!(
            "Found {} DICOM files in {}",
            paths.len(),
            path.as_ref().display()
        );

        self.load_from_file_paths(&paths)
    }

    fn extract_slice(
        &self,
        dicom_object: &FileDicomObject<InMemDicomObject>,
    ) -> Option<SliceImage> {
        let order = self.sort_key(dicom_object)?;
        let pixels = Self::decode_image(dicom_object)?;
        Some(SliceImage {
            order,
            position: Self::get_position(dicom_object),
            pixels,
        })
    }

    /// Key the slice is ordered by. The outer `None` drops the object:
    /// position sorting needs a position, the other keys may be missing.
    fn sort_key(&self, dicom_object: &FileDicomObject<InMemDicomObject>) -> Option<Option<f64>> {
        match self.sort_by {
            SortBy::ImagePositionPatient => Self::get_position(dicom_object).map(|p| Some(p.z)),
            SortBy::TablePosition => Some(float_attribute(dicom_object, tags::TABLE_POSITION)),
            SortBy::InstanceNumber => {
                Some(int_attribute(dicom_object, tags::INSTANCE_NUMBER).map(|n| n as f64))
            }
            SortBy::None => Some(None),
        }
    }

    fn get_position(dicom_object: &FileDicomObject<InMemDicomObject>) -> Option<Vector3<f64>> {
        let pos = dicom_object
            .element(tags::IMAGE_POSITION_PATIENT)
            .ok()?
            .to_multi_float64()
            .ok()?;
        (pos.len() == 3).then(|| Vector3::new(pos[0], pos[1], pos[2]))
    }

    /// Row and column direction cosines.
    fn get_orientation(
        dicom_object: &FileDicomObject<InMemDicomObject>,
    ) -> Option<(Vector3<f64>, Vector3<f64>)> {
        let cosines = dicom_object
            .element(tags::IMAGE_ORIENTATION_PATIENT)
            .ok()?
            .to_multi_float64()
            .ok()?;
        (cosines.len() == 6).then(|| {
            (
                Vector3::new(cosines[0], cosines[1], cosines[2]),
                Vector3::new(cosines[3], cosines[4], cosines[5]),
            )
        })
    }

    /// Decode the first frame with the modality rescale applied and no
    /// windowing, so values stay in physical units.
    fn decode_image(dicom_object: &FileDicomObject<InMemDicomObject>) -> Option<Array2<f64>> {
        let pixel_data = dicom_object.decode_pixel_data().ok()?;
        let options = ConvertOptions::new().with_voi_lut(VoiLutOption::Identity);
        pixel_data
            .to_ndarray_with_options::<f32>(&options)
            .ok()
            .map(|arr| arr.slice_move(s![0, .., .., 0]).mapv(f64::from))
    }

    fn sort_slices(&self, slices: &mut [SliceImage]) {
        if !matches!(self.sort_by, SortBy::None) {
            slices.sort_by(|a, b| {
                a.order
                    .partial_cmp(&b.order)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
        }

        if matches!(self.sort_by, SortBy::ImagePositionPatient) {
            slices.reverse();
        }
    }

    fn validate_dimensions(slices: &[SliceImage]) -> std::result::Result<(), FormatError> {
        let first_dim = slices[0].pixels.dim();
        if slices.iter().any(|slice| slice.pixels.dim() != first_dim) {
            return Err(FormatError::InconsistentDimensions);
        }
        Ok(())
    }

    fn build_volume_array(slices: &[SliceImage]) -> Array3<f64> {
        let (height, width) = slices[0].pixels.dim();
        let depth = slices.len();
        let mut volume = Array3::<f64>::zeros((depth, height, width));

        for (i, slice) in slices.iter().enumerate() {
            volume.slice_mut(s![i, .., ..]).assign(&slice.pixels);
        }

        volume
    }

    /// Row spacing, column spacing and slice thickness.
    fn get_spacing(dicom_objects: &[FileDicomObject<InMemDicomObject>]) -> Option<(f64, f64, f64)> {
        dicom_objects.iter().find_map(|dicom_object| {
            let pixel_spacing = dicom_object
                .element(tags::PIXEL_SPACING)
                .ok()?
                .to_multi_float64()
                .ok()?;

            let slice_thickness = float_attribute(dicom_object, tags::SLICE_THICKNESS)?;

            Some((*pixel_spacing.first()?, *pixel_spacing.get(1)?, slice_thickness))
        })
    }

    /// Index `(slice, row, column)` to patient coordinates. The slice step
    /// is the signed distance between the first two slice positions along
    /// the slice normal, or the slice thickness when that is unavailable.
    fn build_transform(
        slices: &[SliceImage],
        orientation: Option<(Vector3<f64>, Vector3<f64>)>,
        (row_spacing, column_spacing, slice_thickness): (f64, f64, f64),
    ) -> std::result::Result<AffineTransform, FormatError> {
        let (row_cosine, column_cosine) =
            orientation.unwrap_or((Vector3::x(), Vector3::y()));
        let normal = row_cosine.cross(&column_cosine);
        let origin = slices[0].position.unwrap_or_else(Vector3::zeros);

        let slice_step = match (slices.first(), slices.get(1)) {
            (
                Some(SliceImage { position: Some(p0), .. }),
                Some(SliceImage { position: Some(p1), .. }),
            ) => {
                let step = (p1 - p0).dot(&normal);
                if step == 0.0 { slice_thickness } else { step }
            }
            _ => slice_thickness,
        };

        // Moving down a row follows the column cosine and vice versa.
        let columns = [
            normal * slice_step,
            column_cosine * row_spacing,
            row_cosine * column_spacing,
        ];
        let matrix = DMatrix::from_fn(4, 4, |r, c| match (r, c) {
            (3, 3) => 1.0,
            (3, _) => 0.0,
            (r, 3) => origin[r],
            (r, c) => columns[c][r],
        });
        AffineTransform::new(matrix, INPUT_NAMES, OUTPUT_NAMES)
            .map_err(|e| FormatError::Geometry(e.to_string()))
    }

    fn build_header(dicom_object: &FileDicomObject<InMemDicomObject>, slices: usize) -> Header {
        let mut header = Header::new();
        let text_fields = [
            ("modality", tags::MODALITY),
            ("series_description", tags::SERIES_DESCRIPTION),
            ("series_instance_uid", tags::SERIES_INSTANCE_UID),
            ("patient_id", tags::PATIENT_ID),
        ];
        for (name, tag) in text_fields {
            if let Some(value) = dicom_object
                .element(tag)
                .ok()
                .and_then(|e| e.to_str().ok())
            {
                header.insert(name, value.trim().to_string());
            }
        }
        if let Some(thickness) = float_attribute(dicom_object, tags::SLICE_THICKNESS) {
            header.insert("slice_thickness", thickness);
        }
        for (name, tag) in [("rows", tags::ROWS), ("columns", tags::COLUMNS)] {
            if let Some(value) = int_attribute(dicom_object, tag) {
                header.insert(name, value);
            }
        }
        header.insert("number_of_slices", slices as i64);
        header
    }
}

fn has_dicom_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("dcm"))
}

fn float_attribute(dicom_object: &FileDicomObject<InMemDicomObject>, tag: Tag) -> Option<f64> {
    dicom_object.element(tag).ok()?.to_float64().ok()
}

fn int_attribute(dicom_object: &FileDicomObject<InMemDicomObject>, tag: Tag) -> Option<i64> {
    dicom_object.element(tag).ok()?.to_int::<i64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use dicom::core::{DataElement, VR, dicom_value};
    use dicom::dictionary_std::uids;
    use dicom::object::FileMetaTableBuilder;
    use ndarray::arr2;

    /// A 2x3 unsigned 16-bit CT slice at height `z` whose pixels count up
    /// from `first`.
    fn ct_slice(z: f64, first: u16, with_pixels: bool) -> FileDicomObject<InMemDicomObject> {
        let meta = FileMetaTableBuilder::new()
            .transfer_syntax(uids::EXPLICIT_VR_LITTLE_ENDIAN)
            .media_storage_sop_class_uid(uids::CT_IMAGE_STORAGE)
            .media_storage_sop_instance_uid(format!("2.25.{first}"))
            .build()
            .unwrap();
        let mut object = FileDicomObject::new_empty_with_meta(meta);
        let elements = [
            DataElement::new(tags::MODALITY, VR::CS, dicom_value!(Str, "CT")),
            DataElement::new(tags::ROWS, VR::US, dicom_value!(U16, [2])),
            DataElement::new(tags::COLUMNS, VR::US, dicom_value!(U16, [3])),
            DataElement::new(tags::SAMPLES_PER_PIXEL, VR::US, dicom_value!(U16, [1])),
            DataElement::new(
                tags::PHOTOMETRIC_INTERPRETATION,
                VR::CS,
                dicom_value!(Str, "MONOCHROME2"),
            ),
            DataElement::new(tags::BITS_ALLOCATED, VR::US, dicom_value!(U16, [16])),
            DataElement::new(tags::BITS_STORED, VR::US, dicom_value!(U16, [16])),
            DataElement::new(tags::HIGH_BIT, VR::US, dicom_value!(U16, [15])),
            DataElement::new(tags::PIXEL_REPRESENTATION, VR::US, dicom_value!(U16, [0])),
            DataElement::new(tags::PIXEL_SPACING, VR::DS, dicom_value!(F64, [0.5, 0.75])),
            DataElement::new(tags::SLICE_THICKNESS, VR::DS, dicom_value!(F64, [3.0])),
            DataElement::new(
                tags::IMAGE_ORIENTATION_PATIENT,
                VR::DS,
                dicom_value!(F64, [1.0, 0.0, 0.0, 0.0, 1.0, 0.0]),
            ),
            DataElement::new(
                tags::IMAGE_POSITION_PATIENT,
                VR::DS,
                dicom_value!(F64, [-100.0, -50.0, z]),
            ),
        ];
        for element in elements {
            object.put_element(element);
        }
        if with_pixels {
            let pixels: Vec<u16> = (first..first + 6).collect();
            object.put_element(DataElement::new(
                tags::PIXEL_DATA,
                VR::OW,
                dicom::core::PrimitiveValue::U16(pixels.into()),
            ));
        }
        object
    }

    #[test]
    fn decodes_in_memory_objects_into_a_volume() {
        let objects = [
            ct_slice(10.0, 1, true),
            ct_slice(12.5, 11, true),
            ct_slice(15.0, 21, false),
        ];
        let volume = DicomSeries::default().load_from_dicom_objects(&objects).unwrap();

        // Position sorting puts the highest slice first.
        assert_eq!(volume.data.shape(), &[2, 2, 3]);
        assert_eq!(volume.data[[0, 0, 0]], 11.0);
        assert_eq!(volume.data[[1, 1, 2]], 6.0);
        assert_eq!(
            volume.transform.apply(&[1.0, 1.0, 2.0]).unwrap(),
            vec![-100.0 + 2.0 * 0.75, -50.0 + 0.5, 10.0]
        );

        let header = volume.header.unwrap();
        assert_eq!(header.get("modality").and_then(|v| v.as_str()), Some("CT"));
        assert_eq!(header.get("number_of_slices").and_then(|v| v.as_i64()), Some(2));
        assert_eq!(header.get("rows").and_then(|v| v.as_i64()), Some(2));
    }

    #[test]
    fn objects_without_pixels_are_not_a_volume() {
        let objects = [ct_slice(10.0, 1, false)];
        assert!(matches!(
            DicomSeries::default().load_from_dicom_objects(&objects),
            Err(FormatError::NoValidImages)
        ));
    }

    fn slice_at(z: f64, value: f64) -> SliceImage {
        SliceImage {
            order: Some(z),
            position: Some(Vector3::new(-100.0, -50.0, z)),
            pixels: arr2(&[[value, value], [value, value]]),
        }
    }

    #[test]
    fn transform_follows_positions_and_spacing() {
        let slices = [slice_at(10.0, 1.0), slice_at(12.5, 2.0)];
        let transform = DicomSeries::build_transform(&slices, None, (0.5, 0.75, 3.0)).unwrap();
        assert_eq!(
            transform.apply(&[1.0, 2.0, 4.0]).unwrap(),
            vec![-100.0 + 4.0 * 0.75, -50.0 + 2.0 * 0.5, 12.5]
        );
        assert_eq!(transform.input_names()[0], "slice");
    }

    #[test]
    fn transform_falls_back_to_thickness() {
        let mut slices = [slice_at(10.0, 1.0), slice_at(12.5, 2.0)];
        slices[1].position = None;
        let transform = DicomSeries::build_transform(&slices, None, (1.0, 1.0, 3.0)).unwrap();
        assert_eq!(transform.apply(&[1.0, 0.0, 0.0]).unwrap()[2], 13.0);
    }

    #[test]
    fn image_position_sort_is_descending() {
        let series = DicomSeries::new(SortBy::ImagePositionPatient);
        let mut slices = vec![slice_at(1.0, 1.0), slice_at(3.0, 3.0), slice_at(2.0, 2.0)];
        series.sort_slices(&mut slices);
        let order: Vec<f64> = slices.iter().filter_map(|s| s.order).collect();
        assert_eq!(order, vec![3.0, 2.0, 1.0]);
    }

    #[test]
    fn volume_stacks_slices_along_leading_axis() {
        let slices = [slice_at(0.0, 1.0), slice_at(1.0, 2.0)];
        let volume = DicomSeries::build_volume_array(&slices);
        assert_eq!(volume.dim(), (2, 2, 2));
        assert_eq!(volume[[1, 0, 1]], 2.0);
    }

    #[test]
    fn inconsistent_dimensions_are_rejected() {
        let mut slices = vec![slice_at(0.0, 1.0), slice_at(1.0, 2.0)];
        slices[1].pixels = Array2::zeros((3, 2));
        assert!(matches!(
            DicomSeries::validate_dimensions(&slices),
            Err(FormatError::InconsistentDimensions)
        ));
    }

    #[test]
    fn empty_directory_is_a_runtime_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = DicomSeries::default().load(dir.path()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Runtime);
    }
}
