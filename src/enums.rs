/// Order in which the slices of a DICOM series are stacked along the
/// leading axis.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortBy {
    #[default]
    ImagePositionPatient,
    TablePosition,
    InstanceNumber,
    None,
}

/// On-disk element type requested when saving an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    U8,
    I16,
    U16,
    I32,
    F32,
    F64,
}

impl DataType {
    /// NIfTI `datatype` code.
    pub const fn code(self) -> i16 {
        match self {
            DataType::U8 => 2,
            DataType::I16 => 4,
            DataType::I32 => 8,
            DataType::F32 => 16,
            DataType::F64 => 64,
            DataType::U16 => 512,
        }
    }

    pub fn from_code(code: i16) -> Option<Self> {
        match code {
            2 => Some(DataType::U8),
            4 => Some(DataType::I16),
            8 => Some(DataType::I32),
            16 => Some(DataType::F32),
            64 => Some(DataType::F64),
            512 => Some(DataType::U16),
            _ => None,
        }
    }

    pub const fn byte_size(self) -> usize {
        match self {
            DataType::U8 => 1,
            DataType::I16 | DataType::U16 => 2,
            DataType::I32 | DataType::F32 => 4,
            DataType::F64 => 8,
        }
    }

    pub const fn is_integer(self) -> bool {
        !matches!(self, DataType::F32 | DataType::F64)
    }

    /// Representable range of an integer type, `None` for floats.
    pub fn integer_range(self) -> Option<(f64, f64)> {
        match self {
            DataType::U8 => Some((u8::MIN as f64, u8::MAX as f64)),
            DataType::I16 => Some((i16::MIN as f64, i16::MAX as f64)),
            DataType::U16 => Some((u16::MIN as f64, u16::MAX as f64)),
            DataType::I32 => Some((i32::MIN as f64, i32::MAX as f64)),
            DataType::F32 | DataType::F64 => None,
        }
    }
}
