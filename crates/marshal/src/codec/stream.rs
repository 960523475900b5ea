//! Big-endian primitive stream used by the legacy format
//!
//! Strings are UTF-8 with an unsigned 16-bit length prefix; byte blobs and
//! long strings use a signed 32-bit prefix. Optional values are a boolean
//! presence byte followed by the value.

/// Errors from primitive stream reads and writes
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    #[error("unexpected end of stream: needed {needed} bytes, {remaining} left")]
    UnexpectedEof { needed: usize, remaining: usize },

    #[error("invalid UTF-8 in string field")]
    InvalidUtf8,

    #[error("string of {0} bytes exceeds the 65535-byte limit")]
    StringTooLong(usize),

    #[error("invalid boolean byte {0}")]
    InvalidBool(u8),

    #[error("negative length {0}")]
    NegativeLength(i32),

    #[error("length {0} exceeds the signed 32-bit limit")]
    LengthTooLarge(usize),

    #[error("unsupported legacy format version {0}")]
    UnsupportedVersion(i16),

    #[error("invalid strategy selector {0}")]
    InvalidStrategySelector(i32),

    #[error("{0} unread bytes after end of snapshot")]
    TrailingBytes(usize),

    #[error("timer repeat limit {0} cannot be stored")]
    RepeatLimitOutOfRange(i64),

    #[error("timestamp out of range: {0}")]
    InvalidTimestamp(i64),
}

/// Append-only output buffer
#[derive(Debug, Default)]
pub struct DataOutput {
    buf: Vec<u8>,
}

impl DataOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn write_bool(&mut self, value: bool) {
        self.buf.push(u8::from(value));
    }

    pub fn write_i16(&mut self, value: i16) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_u16(&mut self, value: u16) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_i32(&mut self, value: i32) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_i64(&mut self, value: i64) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_utf(&mut self, value: &str) -> Result<(), StreamError> {
        let len = u16::try_from(value.len()).map_err(|_| StreamError::StringTooLong(value.len()))?;
        self.write_u16(len);
        self.buf.extend_from_slice(value.as_bytes());
        Ok(())
    }

    /// Collection length as a signed 32-bit count
    pub fn write_len(&mut self, len: usize) -> Result<(), StreamError> {
        let len = i32::try_from(len).map_err(|_| StreamError::LengthTooLarge(len))?;
        self.write_i32(len);
        Ok(())
    }

    pub fn write_bytes(&mut self, value: &[u8]) -> Result<(), StreamError> {
        self.write_len(value.len())?;
        self.buf.extend_from_slice(value);
        Ok(())
    }

    /// String without the 16-bit limit
    pub fn write_long_string(&mut self, value: &str) -> Result<(), StreamError> {
        self.write_bytes(value.as_bytes())
    }

    pub fn write_opt_utf(&mut self, value: Option<&str>) -> Result<(), StreamError> {
        self.write_bool(value.is_some());
        match value {
            Some(v) => self.write_utf(v),
            None => Ok(()),
        }
    }

    pub fn write_opt_i64(&mut self, value: Option<i64>) {
        self.write_bool(value.is_some());
        if let Some(v) = value {
            self.write_i64(v);
        }
    }
}

/// Cursor over an input slice
#[derive(Debug)]
pub struct DataInput<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> DataInput<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn take(&mut self, needed: usize) -> Result<&'a [u8], StreamError> {
        if self.remaining() < needed {
            return Err(StreamError::UnexpectedEof {
                needed,
                remaining: self.remaining(),
            });
        }
        let slice = &self.bytes[self.pos..self.pos + needed];
        self.pos += needed;
        Ok(slice)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], StreamError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn read_bool(&mut self) -> Result<bool, StreamError> {
        match self.take_array::<1>()? {
            [0] => Ok(false),
            [1] => Ok(true),
            [b] => Err(StreamError::InvalidBool(b)),
        }
    }

    pub fn read_i16(&mut self) -> Result<i16, StreamError> {
        Ok(i16::from_be_bytes(self.take_array()?))
    }

    pub fn read_u16(&mut self) -> Result<u16, StreamError> {
        Ok(u16::from_be_bytes(self.take_array()?))
    }

    pub fn read_i32(&mut self) -> Result<i32, StreamError> {
        Ok(i32::from_be_bytes(self.take_array()?))
    }

    pub fn read_u32(&mut self) -> Result<u32, StreamError> {
        Ok(u32::from_be_bytes(self.take_array()?))
    }

    pub fn read_i64(&mut self) -> Result<i64, StreamError> {
        Ok(i64::from_be_bytes(self.take_array()?))
    }

    pub fn read_utf(&mut self) -> Result<String, StreamError> {
        let len = usize::from(self.read_u16()?);
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| StreamError::InvalidUtf8)
    }

    pub fn read_len(&mut self) -> Result<usize, StreamError> {
        let len = self.read_i32()?;
        usize::try_from(len).map_err(|_| StreamError::NegativeLength(len))
    }

    pub fn read_bytes(&mut self) -> Result<Vec<u8>, StreamError> {
        let len = self.read_len()?;
        Ok(self.take(len)?.to_vec())
    }

    pub fn read_long_string(&mut self) -> Result<String, StreamError> {
        String::from_utf8(self.read_bytes()?).map_err(|_| StreamError::InvalidUtf8)
    }

    pub fn read_opt_utf(&mut self) -> Result<Option<String>, StreamError> {
        if self.read_bool()? {
            Ok(Some(self.read_utf()?))
        } else {
            Ok(None)
        }
    }

    pub fn read_opt_i64(&mut self) -> Result<Option<i64>, StreamError> {
        if self.read_bool()? {
            Ok(Some(self.read_i64()?))
        } else {
            Ok(None)
        }
    }

    /// Fail unless the whole input was consumed
    pub fn finish(self) -> Result<(), StreamError> {
        match self.remaining() {
            0 => Ok(()),
            n => Err(StreamError::TrailingBytes(n)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitives_are_big_endian() {
        let mut out = DataOutput::new();
        out.write_i16(1);
        out.write_i32(-2);
        out.write_i64(3);
        assert_eq!(
            out.into_bytes(),
            vec![0, 1, 0xff, 0xff, 0xff, 0xfe, 0, 0, 0, 0, 0, 0, 0, 3]
        );
    }

    #[test]
    fn test_mixed_sequence_reads_back() {
        let mut out = DataOutput::new();
        out.write_utf("node-1").unwrap();
        out.write_opt_utf(None).unwrap();
        out.write_opt_i64(Some(42));
        out.write_bytes(&[9, 8]).unwrap();
        out.write_bool(true);

        let bytes = out.into_bytes();
        let mut input = DataInput::new(&bytes);
        assert_eq!(input.read_utf().unwrap(), "node-1");
        assert_eq!(input.read_opt_utf().unwrap(), None);
        assert_eq!(input.read_opt_i64().unwrap(), Some(42));
        assert_eq!(input.read_bytes().unwrap(), vec![9, 8]);
        assert!(input.read_bool().unwrap());
        assert!(input.finish().is_ok());
    }

    #[test]
    fn test_truncated_input() {
        let mut input = DataInput::new(&[0, 5, b'a']);
        assert_eq!(
            input.read_utf(),
            Err(StreamError::UnexpectedEof {
                needed: 5,
                remaining: 1
            })
        );
    }

    #[test]
    fn test_string_limit() {
        let long = "x".repeat(70_000);
        let mut out = DataOutput::new();
        assert_eq!(out.write_utf(&long), Err(StreamError::StringTooLong(70_000)));
        out.write_long_string(&long).unwrap();
        let bytes = out.into_bytes();
        assert_eq!(DataInput::new(&bytes).read_long_string().unwrap(), long);
    }

    #[test]
    fn test_oversized_length_is_rejected() {
        let mut out = DataOutput::new();
        assert_eq!(
            out.write_len(usize::MAX),
            Err(StreamError::LengthTooLarge(usize::MAX))
        );
        assert!(out.write_len(i32::MAX as usize).is_ok());
        assert_eq!(
            out.write_len(i32::MAX as usize + 1),
            Err(StreamError::LengthTooLarge(i32::MAX as usize + 1))
        );
        assert_eq!(out.len(), 4);
    }

    #[test]
    fn test_negative_length_and_bad_bool() {
        let mut input = DataInput::new(&[0xff, 0xff, 0xff, 0xff]);
        assert_eq!(input.read_bytes(), Err(StreamError::NegativeLength(-1)));

        let mut input = DataInput::new(&[7]);
        assert_eq!(input.read_bool(), Err(StreamError::InvalidBool(7)));
    }

    #[test]
    fn test_trailing_bytes() {
        let mut input = DataInput::new(&[0, 1, 2]);
        input.read_i16().unwrap();
        assert_eq!(input.finish(), Err(StreamError::TrailingBytes(1)));
    }
}
