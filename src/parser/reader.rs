use byteorder::{ByteOrder, LittleEndian};

use super::DecodeError;

/// A bounds-checked forward-only cursor over a borrowed byte buffer
///
/// Sub-cursors share the parent's backing slice, nothing is copied.
#[derive(Debug, Clone)]
pub struct ByteCursor<'a> {
    bytes: &'a [u8],
    pos: usize,
    // absolute offset of `bytes[0]` in the outermost buffer, for error reporting
    base: usize,
}

impl<'a> ByteCursor<'a> {
    pub fn new(bytes: &'a [u8]) -> ByteCursor<'a> {
        ByteCursor {
            bytes,
            pos: 0,
            base: 0,
        }
    }
}

impl<'a> ByteCursor<'a> {
    // Basic operations --------------------------------------------------------
    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn offset(&self) -> usize {
        self.base + self.pos
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn peek(&self) -> Result<u8, DecodeError> {
        self.bytes
            .get(self.pos)
            .copied()
            .ok_or(DecodeError::UnexpectedEof(self.offset()))
    }

    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        let byte = self.peek()?;
        self.pos += 1;
        Ok(byte)
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        if len > self.remaining() {
            return Err(DecodeError::UnexpectedEof(self.base + self.bytes.len()));
        }
        let bytes = &self.bytes[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    pub fn read_all(&mut self) -> &'a [u8] {
        let bytes = &self.bytes[self.pos..];
        self.pos = self.bytes.len();
        bytes
    }

    /// Carve the next `len` bytes off as an independent cursor and skip past them
    pub fn sub_cursor(&mut self, len: usize) -> Result<ByteCursor<'a>, DecodeError> {
        let base = self.offset();
        let bytes = self.read_bytes(len)?;
        Ok(ByteCursor { bytes, pos: 0, base })
    }

    // Read and interpret types ------------------------------------------------

    // le
    pub fn read_u32(&mut self) -> Result<u32, DecodeError> {
        Ok(LittleEndian::read_u32(self.read_bytes(4)?))
    }

    // le
    pub fn read_u64(&mut self) -> Result<u64, DecodeError> {
        Ok(LittleEndian::read_u64(self.read_bytes(8)?))
    }

    pub fn read_f32(&mut self) -> Result<f32, DecodeError> {
        Ok(LittleEndian::read_f32(self.read_bytes(4)?))
    }

    pub fn read_f64(&mut self) -> Result<f64, DecodeError> {
        Ok(LittleEndian::read_f64(self.read_bytes(8)?))
    }

    pub fn read_var_uint(&mut self, max_bits: u32) -> Result<u64, DecodeError> {
        read_vu(&mut || self.read_u8(), max_bits)
    }

    pub fn read_var_int(&mut self, max_bits: u32) -> Result<i64, DecodeError> {
        read_vs(&mut || self.read_u8(), max_bits)
    }

    pub fn read_vu32(&mut self) -> Result<u32, DecodeError> {
        self.read_var_uint(32).map(|v| v as u32)
    }

    pub fn read_vu64(&mut self) -> Result<u64, DecodeError> {
        self.read_var_uint(64)
    }

    pub fn read_vs32(&mut self) -> Result<i32, DecodeError> {
        self.read_var_int(32).map(|v| v as i32)
    }

    pub fn read_vs64(&mut self) -> Result<i64, DecodeError> {
        self.read_var_int(64)
    }

    pub fn read_u8vec(&mut self) -> Result<&'a [u8], DecodeError> {
        let len = self.read_vu32()?;
        self.read_bytes(len as usize)
    }

    pub fn read_string(&mut self) -> Result<String, DecodeError> {
        let bytes = self.read_u8vec()?;
        String::from_utf8(bytes.to_vec()).map_err(|_| DecodeError::InvalidUtf8)
    }

    /// Read a LEB128 length prefix then that many elements
    pub fn read_vec<T, F>(&mut self, mut read_one: F) -> Result<Vec<T>, DecodeError>
    where
        F: FnMut(&mut Self) -> Result<T, DecodeError>,
    {
        let len = self.read_vu32()?;
        // cap the up-front reservation, the length prefix is untrusted
        let mut items = Vec::with_capacity((len as usize).min(self.remaining()));
        for _ in 0..len {
            items.push(read_one(self)?);
        }
        Ok(items)
    }
}

/// Decode an unsigned LEB128 integer of at most `max_bits` significant bits
///
/// Fails with `InvalidLeb128` when more than `ceil(max_bits / 7)` groups are present and
/// with `Overflow` when the final group carries bits beyond `max_bits`.
pub fn read_vu<F>(reader: &mut F, max_bits: u32) -> Result<u64, DecodeError>
where
    F: FnMut() -> Result<u8, DecodeError>,
{
    let mut result: u64 = 0;
    let mut shift: u32 = 0;
    let mut n = max_bits;
    loop {
        let b = reader()? as u64;
        if b & 0x80 == 0 {
            if n < 64 && b >= (1u64 << n) {
                return Err(DecodeError::Overflow(max_bits));
            }
            return Ok(result | (b << shift));
        }
        if n <= 7 {
            return Err(DecodeError::InvalidLeb128);
        }
        result |= (b & 0x7f) << shift;
        shift += 7;
        n -= 7;
    }
}

/// Decode a signed LEB128 integer of at most `max_bits` significant bits
///
/// The final group must be a valid sign extension of the remaining bit budget.
pub fn read_vs<F>(reader: &mut F, max_bits: u32) -> Result<i64, DecodeError>
where
    F: FnMut() -> Result<u8, DecodeError>,
{
    let mut result: i64 = 0;
    let mut shift: u32 = 0;
    let mut n = max_bits;
    loop {
        let b = reader()? as i64;
        // largest positive payload the remaining bits can hold
        let sign_bit = if n >= 8 { 64 } else { 1i64 << (n - 1) };
        if b < 64 {
            if b >= sign_bit {
                return Err(DecodeError::Overflow(max_bits));
            }
            return Ok(result.wrapping_add(b.wrapping_shl(shift)));
        }
        if b < 128 {
            if b + sign_bit < 128 {
                return Err(DecodeError::Overflow(max_bits));
            }
            return Ok(result.wrapping_add((b - 128).wrapping_shl(shift)));
        }
        if n <= 7 {
            return Err(DecodeError::InvalidLeb128);
        }
        result = result.wrapping_add((b - 128).wrapping_shl(shift));
        shift += 7;
        n -= 7;
    }
}

pub fn emit_vu(v: u64) -> Vec<u8> {
    let mut result: Vec<u8> = vec![];
    let mut value = v;
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            result.push(byte);
            return result;
        }
        result.push(byte | 0x80);
    }
}

pub fn emit_vs(v: i64) -> Vec<u8> {
    let mut result: Vec<u8> = vec![];
    let mut value = v;
    let mut more = true;
    while more {
        let mut byte = (value & 0x7f) as u8;
        value >>= 7;
        if (value == 0 && (byte & 0x40) == 0) || (value == -1 && (byte & 0x40) != 0) {
            more = false;
        } else {
            byte |= 0x80;
        }
        result.push(byte);
    }
    result
}

pub fn emit_vu32(v: u32) -> Vec<u8> {
    emit_vu(v as u64)
}

pub fn emit_vu64(v: u64) -> Vec<u8> {
    emit_vu(v)
}

pub fn emit_vs32(v: i32) -> Vec<u8> {
    emit_vs(v as i64)
}

pub fn emit_vs64(v: i64) -> Vec<u8> {
    emit_vs(v)
}

pub fn emit_f32(v: f32) -> Vec<u8> {
    v.to_le_bytes().to_vec()
}

pub fn emit_f64(v: f64) -> Vec<u8> {
    v.to_le_bytes().to_vec()
}

#[cfg(test)]
fn cursor(bytes: &[u8]) -> ByteCursor<'_> {
    ByteCursor::new(bytes)
}

#[test]
fn test_peek_and_read() {
    let bytes = [0x01, 0x02];
    let mut c = cursor(&bytes);
    assert_eq!(c.peek(), Ok(0x01));
    assert_eq!(c.peek(), Ok(0x01));
    assert_eq!(c.read_u8(), Ok(0x01));
    assert_eq!(c.read_u8(), Ok(0x02));
    assert_eq!(c.peek(), Err(DecodeError::UnexpectedEof(2)));
    assert_eq!(c.read_u8(), Err(DecodeError::UnexpectedEof(2)));
}

#[test]
fn test_read_bytes() {
    let bytes = [1, 2, 3, 4, 5];
    let mut c = cursor(&bytes);
    assert_eq!(c.read_bytes(2), Ok(&bytes[0..2]));
    assert_eq!(c.remaining(), 3);
    assert!(c.read_bytes(4).is_err());
    // a failed read does not advance
    assert_eq!(c.remaining(), 3);
    assert_eq!(c.read_bytes(3), Ok(&bytes[2..5]));
    assert!(c.is_empty());
}

#[test]
fn test_sub_cursor() {
    let bytes = [0x80, 0x80, 0x80, 0x80, 0x78];
    let mut parent = cursor(&bytes);
    let mut child = parent.sub_cursor(2).expect("Failed to carve sub cursor");
    assert_eq!(parent.remaining(), 3);
    assert_eq!(child.remaining(), 2);
    assert_eq!(parent.read_all(), &[0x80, 0x80, 0x78]);
    assert_eq!(child.read_all(), &[0x80, 0x80]);

    let mut parent = cursor(&bytes);
    parent.read_u8().unwrap();
    let mut child = parent.sub_cursor(1).unwrap();
    child.read_u8().unwrap();
    // errors report the absolute offset
    assert_eq!(child.read_u8(), Err(DecodeError::UnexpectedEof(2)));
    assert!(parent.sub_cursor(10).is_err());
}

#[test]
fn test_read_u32() {
    let read = |v: Vec<u8>| cursor(&v).read_u32().expect("Failed to read u32");

    assert_eq!(read(vec![0, 0, 0, 0]), 0);
    assert_eq!(read(vec![1, 0, 0, 0]), 1);
    assert_eq!(read(vec![0x00, 0x61, 0x73, 0x6d]), 0x6d736100);
    assert_eq!(read(vec![0xff, 0xff, 0xff, 0xff]), 0xffffffff);
    assert!(cursor(&[1, 2, 3]).read_u32().is_err());
}

#[test]
fn test_read_u64() {
    let read = |v: Vec<u8>| cursor(&v).read_u64().expect("Failed to read u64");

    assert_eq!(read(vec![0, 0, 0, 0, 0, 0, 0, 0]), 0);
    assert_eq!(read(vec![1, 0, 0, 0, 0, 0, 0, 0]), 1);
    assert_eq!(
        read(vec![0xef, 0xcd, 0xab, 0x89, 0x67, 0x45, 0x23, 0x01]),
        0x0123456789abcdef
    );
}

#[test]
fn test_read_vu32() {
    let read = |v: Vec<u8>| cursor(&v).read_vu32().expect("Failed to read vu32");

    assert_eq!(read(vec![0]), 0);
    assert_eq!(read(vec![1]), 1);
    assert_eq!(read(vec![0x08]), 8);
    assert_eq!(read(vec![0b11100101, 0b10001110, 0b00100110]), 624485);
    assert_eq!(read(vec![0x7f]), 127);
    assert_eq!(read(vec![0x80, 0x7f]), 16256);
    assert_eq!(read(vec![0xb4, 0x07]), 0x3b4);
    assert_eq!(read(vec![0x8c, 0x08]), 0x40c);
    assert_eq!(read(vec![0x80, 0x80, 0x80, 0xfd, 0x07]), 2141192192);
    assert_eq!(read(vec![0xff, 0xff, 0xff, 0xff, 0xf]), 0xffffffff);
    assert_eq!(read(vec![128, 128, 128, 128, 8]), 0x80000000);
    // redundant zero padding within the group budget is fine
    assert_eq!(read(vec![0x81, 0x80, 0x00]), 1);
}

#[test]
fn test_read_vu32_errors() {
    let read = |v: Vec<u8>| cursor(&v).read_vu32();

    // the fifth group may only carry four bits
    assert_eq!(read(vec![0xff, 0xff, 0xff, 0xff, 0x1f]), Err(DecodeError::Overflow(32)));
    assert_eq!(read(vec![0x80, 0x80, 0x80, 0x80, 0x10]), Err(DecodeError::Overflow(32)));
    // six groups never fit
    assert_eq!(read(vec![0x80, 0x80, 0x80, 0x80, 0x80, 0x00]), Err(DecodeError::InvalidLeb128));
    // truncated
    assert_eq!(read(vec![0x80, 0x80]), Err(DecodeError::UnexpectedEof(2)));
}

#[test]
fn test_read_vu64() {
    let read = |v: Vec<u8>| cursor(&v).read_vu64().expect("Failed to read vu64");

    assert_eq!(read(vec![0]), 0);
    assert_eq!(read(vec![0x08]), 8);
    assert_eq!(read(vec![0x80, 0x7f]), 16256);
    assert_eq!(read(vec![0x80, 0x80, 0x80, 0xfd, 0x07]), 2141192192);
    assert_eq!(read(vec![0xff, 0xff, 0xff, 0xff, 0xf]), 0xffffffff);
    assert_eq!(
        read(vec![0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x01]),
        u64::MAX
    );
    assert_eq!(
        cursor(&[0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x02]).read_vu64(),
        Err(DecodeError::Overflow(64))
    );
}

#[test]
fn test_read_var_uint_odd_width() {
    // seven bits fit in one group, the eighth needs a second one carrying a single bit
    let read = |v: Vec<u8>| cursor(&v).read_var_uint(8);
    assert_eq!(read(vec![0x7f]), Ok(0x7f));
    assert_eq!(read(vec![0xff, 0x01]), Ok(0xff));
    assert_eq!(read(vec![0xff, 0x02]), Err(DecodeError::Overflow(8)));
    assert_eq!(cursor(&[0x01]).read_var_uint(1), Ok(1));
    assert_eq!(cursor(&[0x02]).read_var_uint(1), Err(DecodeError::Overflow(1)));
}

#[test]
fn test_read_vs32() {
    let read = |v: Vec<u8>| cursor(&v).read_vs32().expect("Failed to read vs32");

    assert_eq!(read(vec![0]), 0);
    assert_eq!(read(vec![1]), 1);
    assert_eq!(read(vec![0b11100101, 0b10001110, 0b00100110]), 624485);
    assert_eq!(read(vec![0xb4, 0x07]), 0x3b4);
    assert_eq!(read(vec![0x7f]), -1);
    assert_eq!(read(vec![0x80, 0x7f]), -128);
    assert_eq!(read(vec![0b10011011, 0b11110001, 0b01011001]), -624485);
    assert_eq!(read(vec![0x80, 0x80, 0x80, 0x80, 0x78]), -2147483648);
    assert_eq!(read(vec![0xff, 0xff, 0xff, 0xff, 0x07]), 2147483647);
    assert_eq!(read(vec![0x80, 0x40]), -8192);
    assert_eq!(read(vec![0x80, 0xc0, 0x00]), 8192);
    assert_eq!(read(vec![135, 0x01]), 135);
}

#[test]
fn test_read_vs32_errors() {
    let read = |v: Vec<u8>| cursor(&v).read_vs32();

    // 0x08 in the last group would set bit 31 without sign extending
    assert_eq!(read(vec![0xff, 0xff, 0xff, 0xff, 0x08]), Err(DecodeError::Overflow(32)));
    // negative final group that is not a full sign extension
    assert_eq!(read(vec![0x80, 0x80, 0x80, 0x80, 0x70]), Err(DecodeError::Overflow(32)));
    assert_eq!(read(vec![0x80, 0x80, 0x80, 0x80, 0x80, 0x00]), Err(DecodeError::InvalidLeb128));
}

#[test]
fn test_read_vs64() {
    let read = |v: Vec<u8>| cursor(&v).read_vs64().expect("Failed to read vs64");

    assert_eq!(read(vec![0]), 0);
    assert_eq!(read(vec![0x7f]), -1);
    assert_eq!(read(vec![0x80, 0x7f]), -128);
    assert_eq!(read(vec![0x80, 0x80, 0x80, 0x80, 0x78]), -2147483648);
    assert_eq!(read(vec![0xff, 0xff, 0xff, 0xff, 0x07]), 2147483647);
    assert_eq!(read(vec![0x80, 0x40]), -8192);
    assert_eq!(read(vec![0x80, 0xc0, 0x00]), 8192);
    assert_eq!(read(vec![135, 0x01]), 135);
    assert_eq!(
        read(vec![128, 128, 128, 128, 128, 128, 128, 252, 255, 0]),
        0x7ff8000000000000
    );
    assert_eq!(
        read(vec![128, 128, 128, 128, 128, 128, 128, 128, 128, 127]),
        i64::MIN
    );
    assert_eq!(
        cursor(&[128, 128, 128, 128, 128, 128, 128, 128, 128, 1]).read_vs64(),
        Err(DecodeError::Overflow(64))
    );
}

#[test]
fn test_emit_vu32() {
    assert_eq!(emit_vu32(0), vec![0]);
    assert_eq!(emit_vu32(624485), vec![0b11100101, 0b10001110, 0b00100110]);
    assert_eq!(emit_vu32(16256), vec![0x80, 0x7f]);
    assert_eq!(emit_vu32(0xffffffff), vec![0xff, 0xff, 0xff, 0xff, 0xf]);
    assert_eq!(emit_vu32(0x80000000), vec![128, 128, 128, 128, 8]);
}

#[test]
fn test_emit_vs32() {
    assert_eq!(emit_vs32(0), vec![0]);
    assert_eq!(emit_vs32(-1), vec![0x7f]);
    assert_eq!(emit_vs32(-128), vec![0x80, 0x7f]);
    assert_eq!(emit_vs32(-624485), vec![0b10011011, 0b11110001, 0b01011001]);
    assert_eq!(emit_vs32(i32::MIN), vec![128, 128, 128, 128, 120]);
}

#[test]
fn test_emit_vs64() {
    assert_eq!(emit_vs64(0x7ff8000000000000), vec![128, 128, 128, 128, 128, 128, 128, 252, 255, 0]);
    assert_eq!(emit_vs64(i64::MIN), vec![128, 128, 128, 128, 128, 128, 128, 128, 128, 127]);
}

#[test]
fn test_leb128_random_round_trip() {
    use rand::Rng;

    let mut rng = rand::thread_rng();
    for _ in 0..2000 {
        let v: u32 = rng.gen();
        assert_eq!(cursor(&emit_vu32(v)).read_vu32(), Ok(v));
        let v: u64 = rng.gen();
        assert_eq!(cursor(&emit_vu64(v)).read_vu64(), Ok(v));
        let v: i32 = rng.gen();
        assert_eq!(cursor(&emit_vs32(v)).read_vs32(), Ok(v));
        let v: i64 = rng.gen();
        assert_eq!(cursor(&emit_vs64(v)).read_vs64(), Ok(v));
    }
    for v in [0u32, 1, 63, 64, 127, 128, 8191, 8192, u32::MAX] {
        assert_eq!(cursor(&emit_vu32(v)).read_vu32(), Ok(v));
    }
    for v in [0i32, -1, 63, 64, -64, -65, i32::MIN, i32::MAX] {
        assert_eq!(cursor(&emit_vs32(v)).read_vs32(), Ok(v));
    }
}

#[test]
fn test_read_f32() {
    let read = |v: Vec<u8>| cursor(&v).read_f32().expect("Failed to read f32");

    assert!(read(vec![0, 0, 192, 127]).is_nan());
    assert_eq!(read(vec![0, 0, 0, 128]).to_bits(), 0x80000000);
    assert_eq!(read(vec![219, 15, 201, 64]), 6.28318548202514648);
    assert_eq!(read(vec![255, 255, 127, 127]), 3.4028234e+38);
    assert_eq!(emit_f32(1.0e10), vec![249, 2, 21, 80]);
}

#[test]
fn test_read_f64() {
    let read = |v: Vec<u8>| cursor(&v).read_f64().expect("Failed to read f64");

    assert!(read(vec![0, 0, 0, 0, 0, 0, 248, 127]).is_nan());
    assert_eq!(read(vec![24, 45, 68, 84, 251, 33, 25, 64]), 6.28318530717958623);
    assert_eq!(read(vec![255, 255, 255, 255, 255, 255, 239, 127]), 1.7976931348623157e+308);
    assert_eq!(emit_f64(1.0e100), vec![125, 195, 148, 37, 173, 73, 178, 84]);
}

#[test]
fn test_read_string_and_vec() {
    let bytes = [0x03, b'a', b'd', b'd', 0x02, 0x05, 0x06];
    let mut c = cursor(&bytes);
    assert_eq!(c.read_string(), Ok("add".to_string()));
    assert_eq!(c.read_vec(|c| c.read_u8()), Ok(vec![5, 6]));

    assert_eq!(cursor(&[0x01, 0xff]).read_string(), Err(DecodeError::InvalidUtf8));
}
