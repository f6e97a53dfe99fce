use crate::CtabError;

/// Bounds-checked little-endian reader over a metadata block.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ByteReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub(crate) fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    pub(crate) fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns a reader over the same block positioned at `offset`.
    pub(crate) fn fork(&self, offset: usize) -> Result<Self, CtabError> {
        if offset > self.bytes.len() {
            return Err(CtabError::out_of_bounds(format!(
                "offset {offset} is outside block length {}",
                self.bytes.len()
            )));
        }
        Ok(Self {
            bytes: self.bytes,
            pos: offset,
        })
    }

    fn take(&mut self, n: usize, what: &str) -> Result<&'a [u8], CtabError> {
        let end = self.pos.checked_add(n).ok_or_else(|| {
            CtabError::out_of_bounds(format!("offset overflows when reading {what}"))
        })?;
        let slice = self.bytes.get(self.pos..end).ok_or_else(|| {
            CtabError::out_of_bounds(format!(
                "need {n} bytes for {what} at {}..{end}, but block length is {}",
                self.pos,
                self.bytes.len()
            ))
        })?;
        self.pos = end;
        Ok(slice)
    }

    pub(crate) fn read_u16_le(&mut self, what: &str) -> Result<u16, CtabError> {
        let b = self.take(2, what)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub(crate) fn read_u32_le(&mut self, what: &str) -> Result<u32, CtabError> {
        let b = self.take(4, what)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Reads a NUL-terminated string starting at `offset`.
    ///
    /// The terminator must lie inside the block; a name running off the end is corruption.
    pub(crate) fn read_cstring_at(&self, offset: usize, what: &str) -> Result<String, CtabError> {
        let tail = self.bytes.get(offset..).ok_or_else(|| {
            CtabError::out_of_bounds(format!(
                "{what} offset {offset} is outside block length {}",
                self.bytes.len()
            ))
        })?;
        let nul = tail.iter().position(|&b| b == 0).ok_or_else(|| {
            CtabError::corrupt(format!("{what} at offset {offset} is not NUL-terminated"))
        })?;
        Ok(String::from_utf8_lossy(&tail[..nul]).into_owned())
    }
}
