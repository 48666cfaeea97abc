//! Single-file NIfTI-1 (`.nii`, `.nii.gz`).
//!
//! Voxels are stored in Fortran order with `dim[1]` being the first array
//! axis. Besides the standard sform, the writer stores the full homogeneous
//! matrix, the axis names and the shape in a comment extension, so images
//! of any rank and any affine read back exactly. Files written by other
//! tools fall back to sform, then qform, then pixdim.

use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::Path;

use byteorder::{BigEndian, ByteOrder, LittleEndian, WriteBytesExt};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use log::{debug, info, warn};
use nalgebra::DMatrix;
use ndarray::{ArrayD, IxDyn, ShapeBuilder};

use super::{Header, HeaderValue, LoadedVolume, Loader, Saver};
use crate::affine::AffineTransform;
use crate::enums::DataType;
use crate::error::{FormatError, ImageError, Result};
use crate::image::Image;
use crate::indexable::Indexable;

const HEADER_SIZE: usize = 348;
const MAGIC_BYTES: &[u8; 4] = b"n+1\0";
const MAX_RANK: usize = 7;
const COMMENT_ECODE: i32 = 6;
const GEOMETRY_TAG: &str = "voxmap-geometry";

const INPUT_NAMES: [&str; MAX_RANK] = ["i", "j", "k", "l", "m", "n", "o"];
const OUTPUT_NAMES: [&str; MAX_RANK] =
    ["xspace", "yspace", "zspace", "time", "dim4", "dim5", "dim6"];

/// NIfTI-1 header field byte offsets.
mod offsets {
    pub const SIZEOF_HDR: usize = 0;
    pub const DIM_INFO: usize = 39;
    pub const DIM: usize = 40;
    pub const INTENT_P1: usize = 56;
    pub const INTENT_P2: usize = 60;
    pub const INTENT_P3: usize = 64;
    pub const INTENT_CODE: usize = 68;
    pub const DATATYPE: usize = 70;
    pub const BITPIX: usize = 72;
    pub const SLICE_START: usize = 74;
    pub const PIXDIM: usize = 76;
    pub const VOX_OFFSET: usize = 108;
    pub const SCL_SLOPE: usize = 112;
    pub const SCL_INTER: usize = 116;
    pub const SLICE_END: usize = 120;
    pub const SLICE_CODE: usize = 122;
    pub const XYZT_UNITS: usize = 123;
    pub const CAL_MAX: usize = 124;
    pub const CAL_MIN: usize = 128;
    pub const SLICE_DURATION: usize = 132;
    pub const TOFFSET: usize = 136;
    pub const DESCRIP: usize = 148;
    pub const AUX_FILE: usize = 228;
    pub const QFORM_CODE: usize = 252;
    pub const SFORM_CODE: usize = 254;
    pub const QUATERN_B: usize = 256;
    pub const QOFFSET_X: usize = 268;
    pub const SROW_X: usize = 280;
    pub const INTENT_NAME: usize = 328;
    pub const MAGIC: usize = 344;
    pub const EXTENDER: usize = 348;
}

use offsets::*;

#[derive(Clone, Copy)]
enum Field {
    Float(usize),
    Short(usize),
    Byte(usize),
    Text(usize, usize),
}

/// Header fields exposed through [`Header`].
const FIELDS: [(&str, Field); 16] = [
    ("dim_info", Field::Byte(DIM_INFO)),
    ("intent_p1", Field::Float(INTENT_P1)),
    ("intent_p2", Field::Float(INTENT_P2)),
    ("intent_p3", Field::Float(INTENT_P3)),
    ("intent_code", Field::Short(INTENT_CODE)),
    ("slice_start", Field::Short(SLICE_START)),
    ("slice_end", Field::Short(SLICE_END)),
    ("slice_code", Field::Byte(SLICE_CODE)),
    ("xyzt_units", Field::Byte(XYZT_UNITS)),
    ("cal_max", Field::Float(CAL_MAX)),
    ("cal_min", Field::Float(CAL_MIN)),
    ("slice_duration", Field::Float(SLICE_DURATION)),
    ("toffset", Field::Float(TOFFSET)),
    ("descrip", Field::Text(DESCRIP, 80)),
    ("aux_file", Field::Text(AUX_FILE, 24)),
    ("intent_name", Field::Text(INTENT_NAME, 16)),
];

/// NIfTI-1 loader and saver.
#[derive(Debug, Clone, Copy, Default)]
pub struct Nifti;

pub fn is_nifti_path(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_ascii_lowercase)
        .is_some_and(|name| name.ends_with(".nii") || name.ends_with(".nii.gz"))
}

fn is_gzip_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("gz"))
}

fn nifti_error(message: impl Into<String>) -> FormatError {
    FormatError::Nifti(message.into())
}

impl Loader for Nifti {
    fn load(&self, path: &Path) -> Result<LoadedVolume> {
        read_volume(path).map_err(|source| ImageError::Load {
            path: path.to_path_buf(),
            source,
        })
    }
}

impl Saver for Nifti {
    fn save<B>(&self, image: &Image<B>, path: &Path, dtype: Option<DataType>) -> Result<()>
    where
        B: Indexable,
        B::Elem: Copy + Into<f64>,
    {
        write_volume(image, path, dtype).map_err(|source| ImageError::Save {
            path: path.to_path_buf(),
            source,
        })
    }
}

fn read_volume(path: &Path) -> std::result::Result<LoadedVolume, FormatError> {
    let raw = fs::read(path)?;
    let bytes = if raw.starts_with(&[0x1f, 0x8b]) {
        let mut decompressed = Vec::new();
        GzDecoder::new(raw.as_slice()).read_to_end(&mut decompressed)?;
        decompressed
    } else {
        raw
    };

    if bytes.len() < HEADER_SIZE {
        return Err(nifti_error(format!(
            "file too short: {} bytes, need at least {}",
            bytes.len(),
            HEADER_SIZE
        )));
    }
    let sizeof_hdr = &bytes[SIZEOF_HDR..SIZEOF_HDR + 4];
    let volume = if LittleEndian::read_i32(sizeof_hdr) == HEADER_SIZE as i32 {
        parse::<LittleEndian>(&bytes)?
    } else if BigEndian::read_i32(sizeof_hdr) == HEADER_SIZE as i32 {
        parse::<BigEndian>(&bytes)?
    } else {
        return Err(nifti_error("sizeof_hdr is not 348"));
    };
    debug!(
        "Loaded NIfTI {} with shape {:?}",
        path.display(),
        volume.data.shape()
    );
    Ok(volume)
}

fn parse<E: ByteOrder>(bytes: &[u8]) -> std::result::Result<LoadedVolume, FormatError> {
    if &bytes[MAGIC..MAGIC + 4] != MAGIC_BYTES {
        return Err(nifti_error("invalid NIfTI magic"));
    }

    let rank = E::read_i16(&bytes[DIM..DIM + 2]);
    if !(1..=MAX_RANK as i16).contains(&rank) {
        return Err(nifti_error(format!("dim[0] must be 1..=7, got {rank}")));
    }
    let dims = (0..rank as usize)
        .map(|axis| {
            let offset = DIM + 2 + axis * 2;
            let extent = E::read_i16(&bytes[offset..offset + 2]);
            usize::try_from(extent)
                .map_err(|_| nifti_error(format!("dimension {axis} is negative: {extent}")))
        })
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let code = E::read_i16(&bytes[DATATYPE..DATATYPE + 2]);
    let datatype = DataType::from_code(code)
        .ok_or_else(|| nifti_error(format!("unsupported data type {code}")))?;
    let bitpix = E::read_i16(&bytes[BITPIX..BITPIX + 2]);
    if bitpix as usize != datatype.byte_size() * 8 {
        return Err(nifti_error(format!(
            "bitpix {bitpix} does not match datatype {code}"
        )));
    }

    let vox_offset = E::read_f32(&bytes[VOX_OFFSET..VOX_OFFSET + 4]);
    if !vox_offset.is_finite() || vox_offset.fract() != 0.0 || vox_offset < HEADER_SIZE as f32 {
        return Err(nifti_error(format!("invalid vox_offset {vox_offset}")));
    }
    let vox_offset = vox_offset as usize;
    if vox_offset > bytes.len() {
        return Err(nifti_error(format!(
            "vox_offset {vox_offset} lies past the end of the {} byte file",
            bytes.len()
        )));
    }

    let count = element_count(&dims)
        .ok_or_else(|| nifti_error(format!("dimensions {dims:?} are too large")))?;
    let end = count
        .checked_mul(datatype.byte_size())
        .and_then(|needed| needed.checked_add(vox_offset))
        .ok_or_else(|| nifti_error(format!("dimensions {dims:?} are too large")))?;
    let raw = bytes
        .get(vox_offset..end)
        .ok_or_else(|| nifti_error(format!("expected {} bytes of voxel data", end - vox_offset)))?;
    let values = decode::<E>(raw, datatype);

    let (shape, transform) = match read_geometry::<E>(bytes, vox_offset)? {
        Some((shape, transform)) if element_count(&shape) == Some(count) => (shape, transform),
        _ => (dims.clone(), foreign_transform::<E>(bytes, dims.len())?),
    };
    let mut data = ArrayD::from_shape_vec(IxDyn(&shape).f(), values)
        .map_err(|e| nifti_error(format!("voxel data does not fit shape {shape:?}: {e}")))?;

    let slope = E::read_f32(&bytes[SCL_SLOPE..SCL_SLOPE + 4]) as f64;
    let inter = E::read_f32(&bytes[SCL_INTER..SCL_INTER + 4]) as f64;
    if slope != 0.0 && (slope != 1.0 || inter != 0.0) {
        data.par_mapv_inplace(|v| v * slope + inter);
    }

    Ok(LoadedVolume {
        data,
        transform,
        header: Some(read_fields::<E>(bytes)),
    })
}

/// Number of voxels spanned by `dims`, or `None` if it overflows.
fn element_count(dims: &[usize]) -> Option<usize> {
    dims.iter().try_fold(1usize, |total, &extent| total.checked_mul(extent))
}

fn decode<E: ByteOrder>(raw: &[u8], datatype: DataType) -> Vec<f64> {
    raw.chunks_exact(datatype.byte_size())
        .map(|c| match datatype {
            DataType::U8 => c[0] as f64,
            DataType::I16 => E::read_i16(c) as f64,
            DataType::U16 => E::read_u16(c) as f64,
            DataType::I32 => E::read_i32(c) as f64,
            DataType::F32 => E::read_f32(c) as f64,
            DataType::F64 => E::read_f64(c),
        })
        .collect()
}

fn read_fields<E: ByteOrder>(bytes: &[u8]) -> Header {
    let mut header = Header::new();
    for (name, field) in FIELDS {
        let value = match field {
            Field::Float(o) => HeaderValue::Float(E::read_f32(&bytes[o..o + 4]) as f64),
            Field::Short(o) => HeaderValue::Int(E::read_i16(&bytes[o..o + 2]).into()),
            Field::Byte(o) => HeaderValue::Int(bytes[o].into()),
            Field::Text(o, len) => HeaderValue::Text(
                String::from_utf8_lossy(&bytes[o..o + len])
                    .trim_end_matches('\0')
                    .to_string(),
            ),
        };
        header.insert(name, value);
    }
    header
}

/// Walk the extension list looking for the geometry comment.
fn read_geometry<E: ByteOrder>(
    bytes: &[u8],
    vox_offset: usize,
) -> std::result::Result<Option<(Vec<usize>, AffineTransform)>, FormatError> {
    if bytes.get(EXTENDER).copied().unwrap_or(0) == 0 {
        return Ok(None);
    }
    let mut offset = HEADER_SIZE + 4;
    while offset + 8 <= vox_offset {
        let esize = E::read_i32(&bytes[offset..offset + 4]);
        let ecode = E::read_i32(&bytes[offset + 4..offset + 8]);
        let Ok(esize) = usize::try_from(esize) else {
            break;
        };
        if esize < 8 || offset + esize > vox_offset {
            break;
        }
        if ecode == COMMENT_ECODE {
            let text = String::from_utf8_lossy(&bytes[offset + 8..offset + esize]);
            let text = text.trim_end_matches('\0');
            if text.starts_with(GEOMETRY_TAG) {
                return decode_geometry(text).map(Some);
            }
        }
        offset += esize;
    }
    Ok(None)
}

fn encode_geometry(
    transform: &AffineTransform,
    shape: &[usize],
) -> std::result::Result<String, FormatError> {
    let names = transform.input_names().iter().chain(transform.output_names());
    for name in names {
        if name.contains(['\t', '\n']) {
            return Err(nifti_error(format!("axis name {name:?} contains a tab or newline")));
        }
    }

    let mut text = String::from(GEOMETRY_TAG);
    text.push_str("\nshape");
    for extent in shape {
        text.push_str(&format!("\t{extent}"));
    }
    text.push_str("\ninputs");
    for name in transform.input_names() {
        text.push_str(&format!("\t{name}"));
    }
    text.push_str("\noutputs");
    for name in transform.output_names() {
        text.push_str(&format!("\t{name}"));
    }
    let matrix = transform.matrix();
    for r in 0..matrix.nrows() {
        text.push_str("\nrow");
        for c in 0..matrix.ncols() {
            // Debug formatting is the shortest text that parses back exactly.
            text.push_str(&format!("\t{:?}", matrix[(r, c)]));
        }
    }
    text.push('\n');
    Ok(text)
}

fn decode_geometry(text: &str) -> std::result::Result<(Vec<usize>, AffineTransform), FormatError> {
    let mut shape = Vec::new();
    let mut inputs = Vec::new();
    let mut outputs = Vec::new();
    let mut rows: Vec<Vec<f64>> = Vec::new();

    for line in text.lines().skip(1) {
        let mut fields = line.split('\t');
        let key = fields.next().unwrap_or_default();
        match key {
            "shape" => {
                shape = fields
                    .map(|f| f.parse::<usize>())
                    .collect::<std::result::Result<_, _>>()
                    .map_err(|e| nifti_error(format!("bad geometry shape: {e}")))?;
            }
            "inputs" => inputs = fields.map(str::to_string).collect(),
            "outputs" => outputs = fields.map(str::to_string).collect(),
            "row" => rows.push(
                fields
                    .map(|f| f.parse::<f64>())
                    .collect::<std::result::Result<_, _>>()
                    .map_err(|e| nifti_error(format!("bad geometry row: {e}")))?,
            ),
            _ => {}
        }
    }

    let ncols = inputs.len() + 1;
    if rows.len() != outputs.len() + 1 || rows.iter().any(|row| row.len() != ncols) {
        return Err(nifti_error("geometry matrix does not match its axis names"));
    }
    let matrix = DMatrix::from_fn(rows.len(), ncols, |r, c| rows[r][c]);
    let transform = AffineTransform::new(matrix, inputs, outputs)
        .map_err(|e| nifti_error(format!("bad geometry transform: {e}")))?;
    if transform.input_ndim() != shape.len() {
        return Err(nifti_error("geometry shape does not match its transform"));
    }
    Ok((shape, transform))
}

/// Transform for files without our geometry extension: spatial part from
/// sform, qform or pixdim, extra axes scaled by their pixdim.
fn foreign_transform<E: ByteOrder>(
    bytes: &[u8],
    rank: usize,
) -> std::result::Result<AffineTransform, FormatError> {
    let f32_at = |o: usize| E::read_f32(&bytes[o..o + 4]) as f64;
    let pixdim: Vec<f64> = (0..8).map(|i| f32_at(PIXDIM + i * 4)).collect();
    let spacing = |axis: usize| {
        let v = pixdim[axis + 1].abs();
        if v == 0.0 { 1.0 } else { v }
    };

    let sform_code = E::read_i16(&bytes[SFORM_CODE..SFORM_CODE + 2]);
    let qform_code = E::read_i16(&bytes[QFORM_CODE..QFORM_CODE + 2]);
    let spatial: [[f64; 4]; 3] = if sform_code > 0 {
        std::array::from_fn(|r| std::array::from_fn(|c| f32_at(SROW_X + r * 16 + c * 4)))
    } else if qform_code > 0 {
        let [b, c, d] = std::array::from_fn(|i| f32_at(QUATERN_B + i * 4));
        let offset: [f64; 3] = std::array::from_fn(|i| f32_at(QOFFSET_X + i * 4));
        quaternion_rows(b, c, d, offset, [spacing(0), spacing(1), spacing(2)], pixdim[0])
    } else {
        std::array::from_fn(|r| std::array::from_fn(|c| if r == c { spacing(r) } else { 0.0 }))
    };

    let outputs = 3 + rank.saturating_sub(3);
    let toffset = f32_at(TOFFSET);
    let matrix = DMatrix::from_fn(outputs + 1, rank + 1, |r, c| {
        if r == outputs {
            return if c == rank { 1.0 } else { 0.0 };
        }
        if r < 3 {
            return match c {
                c if c == rank => spatial[r][3],
                c if c < 3 => spatial[r][c],
                _ => 0.0,
            };
        }
        match c {
            c if c == r => spacing(r),
            c if c == rank && r == 3 => toffset,
            _ => 0.0,
        }
    });
    let inputs = INPUT_NAMES[..rank].iter().copied();
    AffineTransform::new(matrix, inputs, OUTPUT_NAMES[..outputs].iter().copied())
        .map_err(|e| nifti_error(format!("bad header transform: {e}")))
}

fn quaternion_rows(
    b: f64,
    c: f64,
    d: f64,
    offset: [f64; 3],
    spacing: [f64; 3],
    qfac: f64,
) -> [[f64; 4]; 3] {
    let a = (1.0 - b * b - c * c - d * d).max(0.0).sqrt();
    let qfac = if qfac < 0.0 { -1.0 } else { 1.0 };
    let [i, j, k] = [spacing[0], spacing[1], spacing[2] * qfac];
    [
        [
            (a * a + b * b - c * c - d * d) * i,
            2.0 * (b * c - a * d) * j,
            2.0 * (b * d + a * c) * k,
            offset[0],
        ],
        [
            2.0 * (b * c + a * d) * i,
            (a * a - b * b + c * c - d * d) * j,
            2.0 * (c * d - a * b) * k,
            offset[1],
        ],
        [
            2.0 * (b * d - a * c) * i,
            2.0 * (c * d + a * b) * j,
            (a * a - b * b - c * c + d * d) * k,
            offset[2],
        ],
    ]
}

fn write_volume<B>(
    image: &Image<B>,
    path: &Path,
    dtype: Option<DataType>,
) -> std::result::Result<(), FormatError>
where
    B: Indexable,
    B::Elem: Copy + Into<f64>,
{
    let dtype = dtype.unwrap_or(DataType::F64);
    let shape = image.shape();
    if shape.len() > MAX_RANK {
        return Err(nifti_error(format!(
            "rank {} exceeds the NIfTI-1 limit of {MAX_RANK}",
            shape.len()
        )));
    }
    let dims: Vec<usize> = if shape.is_empty() { vec![1] } else { shape.to_vec() };
    if let Some(&extent) = dims.iter().find(|&&e| e > i16::MAX as usize) {
        return Err(nifti_error(format!("extent {extent} does not fit NIfTI-1")));
    }

    // Reversed axes iterate in Fortran order.
    let values: Vec<f64> = image.as_array().t().iter().map(|&v| v.into()).collect();
    let (slope, inter) = scaling(&values, dtype);

    let transform = image.coordmap().transform();
    let geometry = encode_geometry(transform, shape)?;
    let esize = (8 + geometry.len()).div_ceil(16) * 16;
    let vox_offset = HEADER_SIZE + 4 + esize;

    let mut buf = vec![0u8; vox_offset];
    LittleEndian::write_i32(&mut buf[SIZEOF_HDR..SIZEOF_HDR + 4], HEADER_SIZE as i32);
    LittleEndian::write_i16(&mut buf[DIM..DIM + 2], dims.len() as i16);
    for (axis, &extent) in dims.iter().enumerate() {
        let offset = DIM + 2 + axis * 2;
        LittleEndian::write_i16(&mut buf[offset..offset + 2], extent as i16);
    }
    LittleEndian::write_i16(&mut buf[DATATYPE..DATATYPE + 2], dtype.code());
    LittleEndian::write_i16(&mut buf[BITPIX..BITPIX + 2], (dtype.byte_size() * 8) as i16);
    LittleEndian::write_f32(&mut buf[VOX_OFFSET..VOX_OFFSET + 4], vox_offset as f32);
    LittleEndian::write_f32(&mut buf[SCL_SLOPE..SCL_SLOPE + 4], slope as f32);
    LittleEndian::write_f32(&mut buf[SCL_INTER..SCL_INTER + 4], inter as f32);
    write_spatial(&mut buf, transform);
    if let Ok(header) = image.header() {
        let lossy = write_fields(&mut buf, header);
        if !lossy.is_empty() {
            debug!("{} header entries of {} will not round-trip", lossy.len(), path.display());
        }
    }
    buf[MAGIC..MAGIC + 4].copy_from_slice(MAGIC_BYTES);

    buf[EXTENDER] = 1;
    let ext = HEADER_SIZE + 4;
    LittleEndian::write_i32(&mut buf[ext..ext + 4], esize as i32);
    LittleEndian::write_i32(&mut buf[ext + 4..ext + 8], COMMENT_ECODE);
    buf[ext + 8..ext + 8 + geometry.len()].copy_from_slice(geometry.as_bytes());

    buf.reserve(values.len() * dtype.byte_size());
    encode(&values, dtype, slope, inter, &mut buf)?;

    if is_gzip_path(path) {
        let mut encoder = GzEncoder::new(File::create(path)?, Compression::default());
        encoder.write_all(&buf)?;
        encoder.finish()?;
    } else {
        fs::write(path, &buf)?;
    }
    info!(
        "Saved NIfTI {} with shape {:?} as {:?}",
        path.display(),
        shape,
        dtype
    );
    Ok(())
}

/// sform and pixdim from the first three input and output axes.
fn write_spatial(buf: &mut [u8], transform: &AffineTransform) {
    let (n, m) = (transform.input_ndim(), transform.output_ndim());
    let matrix = transform.matrix();

    LittleEndian::write_f32(&mut buf[PIXDIM..PIXDIM + 4], 1.0);
    for c in 0..n.min(MAX_RANK) {
        let norm = (0..m).map(|r| matrix[(r, c)].powi(2)).sum::<f64>().sqrt();
        let offset = PIXDIM + (c + 1) * 4;
        LittleEndian::write_f32(&mut buf[offset..offset + 4], norm as f32);
    }

    if n < 3 || m < 3 {
        return;
    }
    for r in 0..3 {
        for c in 0..4 {
            let value = if c < 3 { matrix[(r, c)] } else { matrix[(r, n)] };
            let offset = SROW_X + r * 16 + c * 4;
            LittleEndian::write_f32(&mut buf[offset..offset + 4], value as f32);
        }
    }
    LittleEndian::write_i16(&mut buf[SFORM_CODE..SFORM_CODE + 2], 2);
}

/// Store the header entries that have a NIfTI-1 field. Returns the keys
/// that will not read back as they were given.
fn write_fields(buf: &mut [u8], header: &Header) -> Vec<String> {
    let mut lossy = Vec::new();
    for (key, _) in header.iter() {
        if !FIELDS.iter().any(|(name, _)| *name == key) {
            warn!("Header entry {key:?} has no NIfTI-1 field and is not saved");
            lossy.push(key.to_string());
        }
    }

    for (name, field) in FIELDS {
        let Some(value) = header.get(name) else {
            continue;
        };
        let stored = match field {
            Field::Float(o) => value.as_f64().map(|v| {
                LittleEndian::write_f32(&mut buf[o..o + 4], v as f32);
                true
            }),
            Field::Short(o) => value.as_i64().map(|v| {
                let clamped = v.clamp(i16::MIN.into(), i16::MAX.into());
                LittleEndian::write_i16(&mut buf[o..o + 2], clamped as i16);
                clamped == v
            }),
            Field::Byte(o) => value.as_i64().map(|v| {
                let clamped = v.clamp(0, u8::MAX.into());
                buf[o] = clamped as u8;
                clamped == v
            }),
            Field::Text(o, len) => value.as_str().map(|text| {
                let bytes = text.as_bytes();
                let n = bytes.len().min(len - 1);
                buf[o..o + len].fill(0);
                buf[o..o + n].copy_from_slice(&bytes[..n]);
                n == bytes.len()
            }),
        };
        match stored {
            Some(true) => {}
            Some(false) => {
                warn!("Header entry {name:?} = {value:?} was truncated to fit NIfTI-1");
                lossy.push(name.to_string());
            }
            None => {
                warn!("Header entry {name:?} = {value:?} has the wrong type and is not saved");
                lossy.push(name.to_string());
            }
        }
    }
    lossy
}

/// `scl_slope` and `scl_inter` for storing `values` as `dtype`.
///
/// Integer values already in range are stored as they are; anything else
/// is mapped linearly from `min..=max` onto the range of the type.
fn scaling(values: &[f64], dtype: DataType) -> (f64, f64) {
    let Some((lo, hi)) = dtype.integer_range() else {
        return (1.0, 0.0);
    };
    if values
        .iter()
        .all(|&v| v.fract() == 0.0 && (lo..=hi).contains(&v))
    {
        return (1.0, 0.0);
    }

    let (min, max) = values
        .iter()
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(a, b), &v| (a.min(v), b.max(v)));
    if !min.is_finite() {
        return (1.0, 0.0);
    }
    // Stored as f32 in the header; round now so encoding sees the same values.
    let slope = if max > min { (max - min) / (hi - lo) } else { 1.0 };
    let slope = f64::from(slope as f32);
    let inter = f64::from((min - lo * slope) as f32);
    warn!(
        "Rescaling values in [{min}, {max}] to {dtype:?} with slope {slope} and intercept {inter}"
    );
    (slope, inter)
}

fn encode(
    values: &[f64],
    dtype: DataType,
    slope: f64,
    inter: f64,
    out: &mut Vec<u8>,
) -> io::Result<()> {
    let range = dtype.integer_range();
    for &v in values {
        let stored = match range {
            Some((lo, hi)) => ((v - inter) / slope).round().clamp(lo, hi),
            None => v,
        };
        match dtype {
            DataType::U8 => out.write_u8(stored as u8)?,
            DataType::I16 => out.write_i16::<LittleEndian>(stored as i16)?,
            DataType::U16 => out.write_u16::<LittleEndian>(stored as u16)?,
            DataType::I32 => out.write_i32::<LittleEndian>(stored as i32)?,
            DataType::F32 => out.write_f32::<LittleEndian>(stored as f32)?,
            DataType::F64 => out.write_f64::<LittleEndian>(stored)?,
        }
    }
    Ok(())
}
