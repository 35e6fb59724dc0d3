use std::io::{self, Read, Seek, SeekFrom};

use serde::{Deserialize, Serialize};

/// Byte order applied uniformly to every number in one encoded document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Endian {
    /// Wii U
    Big,
    /// Switch
    #[default]
    Little,
}

impl Endian {
    pub fn from_big(big_endian: bool) -> Self {
        if big_endian { Endian::Big } else { Endian::Little }
    }

    pub fn is_big(self) -> bool {
        self == Endian::Big
    }

    pub fn u16_bytes(self, v: u16) -> [u8; 2] {
        match self {
            Endian::Big => v.to_be_bytes(),
            Endian::Little => v.to_le_bytes(),
        }
    }

    pub fn u24_bytes(self, v: u32) -> [u8; 3] {
        match self {
            Endian::Big => {
                let b = v.to_be_bytes();
                [b[1], b[2], b[3]]
            }
            Endian::Little => {
                let b = v.to_le_bytes();
                [b[0], b[1], b[2]]
            }
        }
    }

    pub fn u32_bytes(self, v: u32) -> [u8; 4] {
        match self {
            Endian::Big => v.to_be_bytes(),
            Endian::Little => v.to_le_bytes(),
        }
    }
}

pub struct ByteReader<R> {
    inner: R,
    endian: Endian,
}

impl<R: Read + Seek> ByteReader<R> {
    pub fn new(inner: R, endian: Endian) -> Self {
        Self { inner, endian }
    }

    pub fn endian(&self) -> Endian {
        self.endian
    }

    pub fn set_endian(&mut self, endian: Endian) {
        self.endian = endian;
    }

    pub fn read_u8(&mut self) -> io::Result<u8> {
        let mut buf = [0u8; 1];
        self.inner.read_exact(&mut buf)?;
        Ok(buf[0])
    }

    pub fn read_u16(&mut self) -> io::Result<u16> {
        let mut buf = [0u8; 2];
        self.inner.read_exact(&mut buf)?;
        Ok(match self.endian {
            Endian::Big => u16::from_be_bytes(buf),
            Endian::Little => u16::from_le_bytes(buf),
        })
    }

    pub fn read_u24(&mut self) -> io::Result<u32> {
        let mut buf = [0u8; 3];
        self.inner.read_exact(&mut buf)?;
        Ok(match self.endian {
            Endian::Big => u32::from_be_bytes([0, buf[0], buf[1], buf[2]]),
            Endian::Little => u32::from_le_bytes([buf[0], buf[1], buf[2], 0]),
        })
    }

    pub fn read_u32(&mut self) -> io::Result<u32> {
        let mut buf = [0u8; 4];
        self.inner.read_exact(&mut buf)?;
        Ok(match self.endian {
            Endian::Big => u32::from_be_bytes(buf),
            Endian::Little => u32::from_le_bytes(buf),
        })
    }

    pub fn read_i32(&mut self) -> io::Result<i32> {
        self.read_u32().map(|v| v as i32)
    }

    pub fn read_f32(&mut self) -> io::Result<f32> {
        self.read_u32().map(f32::from_bits)
    }

    pub fn read_bytes(&mut self, n: usize) -> io::Result<Vec<u8>> {
        let mut buf = vec![0u8; n];
        self.inner.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// Read a null-terminated string starting at the current position.
    pub fn read_null_terminated_string(&mut self) -> io::Result<String> {
        let mut bytes = Vec::new();
        loop {
            let b = self.read_u8()?;
            if b == 0 {
                break;
            }
            bytes.push(b);
        }
        String::from_utf8(bytes).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    pub fn position(&mut self) -> io::Result<u64> {
        self.inner.stream_position()
    }

    pub fn seek_to(&mut self, pos: u64) -> io::Result<()> {
        self.inner.seek(SeekFrom::Start(pos))?;
        Ok(())
    }

    pub fn len(&mut self) -> io::Result<u64> {
        let cur = self.position()?;
        let end = self.inner.seek(SeekFrom::End(0))?;
        self.inner.seek(SeekFrom::Start(cur))?;
        Ok(end)
    }

    pub fn is_empty(&mut self) -> io::Result<bool> {
        Ok(self.len()? == 0)
    }
}
