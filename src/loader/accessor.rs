use gltf::accessor::{DataType, Dimensions};

use crate::{error::ImportError, vfs::Blob};

/// Reads the elements of a glTF accessor with any stride and component type.
/// The bounds are checked once on creation, reads never go past the buffer.
pub struct AccessorReader<'a> {
    index: usize,
    buffer: Option<(usize, &'a [u8])>,
    base_offset: usize,
    stride: usize,
    count: usize,
    data_type: DataType,
    dimensions: Dimensions,
    normalized: bool,
}

impl<'a> AccessorReader<'a> {
    pub fn new(accessor: &gltf::Accessor<'_>, buffers: &'a [Blob]) -> Result<Self, ImportError> {
        let index = accessor.index();
        let data_type = accessor.data_type();
        let dimensions = accessor.dimensions();
        let element_size = data_type.size() * dimensions.multiplicity();
        let count = accessor.count();

        if accessor.sparse().is_some() {
            log::warn!(
                "Accessor {} is sparse, which is not supported. Reading the base values.",
                index
            );
        }

        let mut reader = Self {
            index,
            buffer: None,
            base_offset: 0,
            stride: element_size,
            count,
            data_type,
            dimensions,
            normalized: accessor.normalized(),
        };

        // Accessors without a view are all zeros
        let Some(view) = accessor.view() else {
            return Ok(reader);
        };

        let buffer_index = view.buffer().index();
        let buffer = buffers
            .get(buffer_index)
            .ok_or(ImportError::AccessorOutOfBounds { accessor: index })?;
        let view_end = view
            .offset()
            .checked_add(view.length())
            .filter(|end| *end <= buffer.len())
            .ok_or(ImportError::AccessorOutOfBounds { accessor: index })?;

        reader.stride = view.stride().unwrap_or(element_size);
        reader.base_offset = view
            .offset()
            .checked_add(accessor.offset())
            .ok_or(ImportError::AccessorOutOfBounds { accessor: index })?;
        reader.buffer = Some((buffer_index, buffer.as_slice()));

        if count > 0 {
            let end = (count - 1)
                .checked_mul(reader.stride)
                .and_then(|v| v.checked_add(reader.base_offset))
                .and_then(|v| v.checked_add(element_size));
            if !matches!(end, Some(end) if end <= view_end) {
                return Err(ImportError::AccessorOutOfBounds { accessor: index });
            }
        }

        Ok(reader)
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    /// Fails with [`ImportError::UnsupportedAccessor`] unless the layout is one of the allowed ones.
    pub fn expect(
        self,
        usage: &'static str,
        data_types: &[DataType],
        dimensions: &[Dimensions],
    ) -> Result<Self, ImportError> {
        if data_types.contains(&self.data_type) && dimensions.contains(&self.dimensions) {
            Ok(self)
        } else {
            Err(ImportError::UnsupportedAccessor {
                accessor: self.index,
                usage,
                layout: format!("{:?} of {:?}", self.dimensions, self.data_type),
            })
        }
    }

    /// The buffer index and byte offset of an element, if the accessor has a buffer view.
    pub fn element_location(&self, element: usize) -> Option<(usize, usize)> {
        let (buffer_index, _) = self.buffer?;
        (element < self.count).then(|| (buffer_index, self.base_offset + element * self.stride))
    }

    fn element_bytes(&self, element: usize) -> Option<&'a [u8]> {
        let (_, data) = self.buffer?;
        if element >= self.count {
            return None;
        }
        let start = self.base_offset + element * self.stride;
        let size = self.data_type.size() * self.dimensions.multiplicity();
        data.get(start..start + size)
    }

    fn component(&self, bytes: &[u8], component: usize, normalize: bool) -> f32 {
        let offset = component * self.data_type.size();
        let Some(b) = bytes.get(offset..offset + self.data_type.size()) else {
            return 0.0;
        };
        match self.data_type {
            DataType::I8 => {
                let v = b[0] as i8 as f32;
                if normalize { (v / 127.0).max(-1.0) } else { v }
            }
            DataType::U8 => {
                let v = b[0] as f32;
                if normalize { v / 255.0 } else { v }
            }
            DataType::I16 => {
                let v = i16::from_le_bytes([b[0], b[1]]) as f32;
                if normalize { (v / 32767.0).max(-1.0) } else { v }
            }
            DataType::U16 => {
                let v = u16::from_le_bytes([b[0], b[1]]) as f32;
                if normalize { v / 65535.0 } else { v }
            }
            DataType::U32 => u32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f32,
            DataType::F32 => f32::from_le_bytes([b[0], b[1], b[2], b[3]]),
        }
    }

    fn read_with<const N: usize>(&self, element: usize, normalize: bool) -> [f32; N] {
        let mut result = [0.0; N];
        if let Some(bytes) = self.element_bytes(element) {
            let components = self.dimensions.multiplicity().min(N);
            for (c, value) in result.iter_mut().enumerate().take(components) {
                *value = self.component(bytes, c, normalize);
            }
        }
        result
    }

    /// Reads up to `N` components as floats, honoring the normalized flag. Missing components are zero.
    pub fn read_floats<const N: usize>(&self, element: usize) -> [f32; N] {
        self.read_with(element, self.normalized)
    }

    /// Like [`Self::read_floats`], but integer components are always normalized.
    pub fn read_unorm<const N: usize>(&self, element: usize) -> [f32; N] {
        self.read_with(element, true)
    }

    pub fn read_index(&self, element: usize) -> u32 {
        let Some(b) = self.element_bytes(element) else {
            return 0;
        };
        match self.data_type {
            DataType::U8 => b[0] as u32,
            DataType::U16 => u16::from_le_bytes([b[0], b[1]]) as u32,
            DataType::U32 => u32::from_le_bytes([b[0], b[1], b[2], b[3]]),
            _ => 0,
        }
    }

    pub fn read_u16x4(&self, element: usize) -> [u16; 4] {
        let Some(b) = self.element_bytes(element) else {
            return [0; 4];
        };
        let mut result = [0u16; 4];
        for (c, value) in result
            .iter_mut()
            .enumerate()
            .take(self.dimensions.multiplicity())
        {
            *value = match self.data_type {
                DataType::U8 => b[c] as u16,
                DataType::U16 => u16::from_le_bytes([b[c * 2], b[c * 2 + 1]]),
                _ => 0,
            };
        }
        result
    }
}
