//! Fixed-layout records of the PKZIP container.
//!
//! Each record decodes from a byte slice and encodes into any [`Write`]r.
//! Decoding always checks the 4-byte signature before reading any other
//! field. All integers are little-endian.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use chrono::{DateTime, Datelike, NaiveDate, Timelike};
use std::io::{self, Cursor, Read, Write};

use crate::error::{Result, ZipError};

/// ZIP compression methods
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMethod {
    Stored,
    Deflate,
    Unknown(u16),
}

impl CompressionMethod {
    pub fn from_u16(value: u16) -> Self {
        match value {
            0 => CompressionMethod::Stored,
            8 => CompressionMethod::Deflate,
            _ => CompressionMethod::Unknown(value),
        }
    }

    pub fn as_u16(&self) -> u16 {
        match self {
            CompressionMethod::Stored => 0,
            CompressionMethod::Deflate => 8,
            CompressionMethod::Unknown(v) => *v,
        }
    }
}

/// General purpose flag: sizes and CRC follow the payload in a data descriptor.
pub const FLAG_DATA_DESCRIPTOR: u16 = 0x0008;
/// General purpose flag: name and comment are UTF-8.
pub const FLAG_UTF8: u16 = 0x0800;

/// External attribute bit marking a folder (MS-DOS directory attribute).
pub const ATTR_DIRECTORY: u32 = 0x10;

/// Version written into `version made by` and, for deflated entries,
/// `version needed to extract` (2.0).
pub const VERSION_DEFLATE: u16 = 20;
/// `version needed to extract` for stored entries and folders (1.0).
pub const VERSION_STORED: u16 = 10;

pub const DATA_DESCRIPTOR_SIGNATURE: u32 = 0x08074b50;

/// Packed MS-DOS date and time, two-second resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DosDateTime {
    pub time: u16,
    pub date: u16,
}

impl DosDateTime {
    /// Earliest representable instant, 1980-01-01 00:00:00.
    pub const MIN: DosDateTime = DosDateTime {
        time: 0,
        date: 1 << 5 | 1,
    };

    pub fn new(year: u16, month: u8, day: u8, hour: u8, minute: u8, second: u8) -> Self {
        let date = (year.saturating_sub(1980) & 0x7F) << 9 | (month as u16 & 0x0F) << 5 | (day as u16 & 0x1F);
        let time = (hour as u16 & 0x1F) << 11 | (minute as u16 & 0x3F) << 5 | (second as u16 / 2 & 0x1F);
        Self { time, date }
    }

    /// Convert seconds since the epoch. Odd seconds round down and
    /// instants outside 1980..=2107 clamp to the nearest end of the range.
    ///
    /// The fields are filled in UTC. Info-ZIP and PclZip write local time
    /// instead, so their archives read back shifted by the local UTC offset.
    pub fn from_unix(secs: i64) -> Self {
        let Some(dt) = DateTime::from_timestamp(secs, 0) else {
            return Self::MIN;
        };
        let year = dt.year();
        if year < 1980 {
            return Self::MIN;
        }
        if year > 2107 {
            return Self::new(2107, 12, 31, 23, 59, 58);
        }
        Self::new(
            year as u16,
            dt.month() as u8,
            dt.day() as u8,
            dt.hour() as u8,
            dt.minute() as u8,
            dt.second() as u8,
        )
    }

    /// Convert back to seconds since the epoch, reading the fields as UTC
    /// (see [`DosDateTime::from_unix`]). Out-of-range fields
    /// (month 0, day 0, hour 25...) fall back to 1980-01-01.
    pub fn to_unix(&self) -> i64 {
        let (year, month, day) = self.date_parts();
        let (hour, minute, second) = self.time_parts();
        NaiveDate::from_ymd_opt(year as i32, month as u32, day as u32)
            .and_then(|d| d.and_hms_opt(hour as u32, minute as u32, second as u32))
            .map(|dt| dt.and_utc().timestamp())
            .unwrap_or(315_532_800)
    }

    /// Parse modification date to (year, month, day)
    pub fn date_parts(&self) -> (u16, u8, u8) {
        let day = (self.date & 0x1F) as u8;
        let month = ((self.date >> 5) & 0x0F) as u8;
        let year = ((self.date >> 9) & 0x7F) + 1980;
        (year, month, day)
    }

    /// Parse modification time to (hour, minute, second)
    pub fn time_parts(&self) -> (u8, u8, u8) {
        let second = ((self.time & 0x1F) * 2) as u8;
        let minute = ((self.time >> 5) & 0x3F) as u8;
        let hour = ((self.time >> 11) & 0x1F) as u8;
        (hour, minute, second)
    }
}

fn check_signature(data: &[u8], signature: u32, record: &str) -> Result<()> {
    if data.len() < 4 || u32::from_le_bytes([data[0], data[1], data[2], data[3]]) != signature {
        return Err(ZipError::format(format!("invalid {record} signature")));
    }
    Ok(())
}

fn truncated(record: &str) -> impl Fn(io::Error) -> ZipError + '_ {
    move |_| ZipError::format(format!("truncated {record}"))
}

fn read_vec(cursor: &mut Cursor<&[u8]>, len: usize, record: &str) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; len];
    cursor.read_exact(&mut buf).map_err(truncated(record))?;
    Ok(buf)
}

/// Local File Header (LFH) - 30 bytes plus name and extra field
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LocalFileHeader {
    pub version_needed: u16,
    pub flags: u16,
    pub compression: u16,
    pub modified: DosDateTime,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub file_name: Vec<u8>,
    pub extra: Vec<u8>,
}

impl LocalFileHeader {
    pub const SIGNATURE: u32 = 0x04034b50;
    pub const SIZE: usize = 30;

    /// Length of the name and extra field announced by a fixed header.
    pub fn variable_len(fixed: &[u8]) -> Result<usize> {
        check_signature(fixed, Self::SIGNATURE, "local file header")?;
        if fixed.len() < Self::SIZE {
            return Err(ZipError::format("truncated local file header"));
        }
        let name_len = u16::from_le_bytes([fixed[26], fixed[27]]) as usize;
        let extra_len = u16::from_le_bytes([fixed[28], fixed[29]]) as usize;
        Ok(name_len + extra_len)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        const RECORD: &str = "local file header";
        check_signature(data, Self::SIGNATURE, RECORD)?;
        if data.len() < Self::SIZE {
            return Err(ZipError::format("truncated local file header"));
        }

        let mut cursor = Cursor::new(&data[4..]);
        let err = truncated(RECORD);
        let version_needed = cursor.read_u16::<LittleEndian>().map_err(&err)?;
        let flags = cursor.read_u16::<LittleEndian>().map_err(&err)?;
        let compression = cursor.read_u16::<LittleEndian>().map_err(&err)?;
        let time = cursor.read_u16::<LittleEndian>().map_err(&err)?;
        let date = cursor.read_u16::<LittleEndian>().map_err(&err)?;
        let crc32 = cursor.read_u32::<LittleEndian>().map_err(&err)?;
        let compressed_size = cursor.read_u32::<LittleEndian>().map_err(&err)?;
        let uncompressed_size = cursor.read_u32::<LittleEndian>().map_err(&err)?;
        let name_len = cursor.read_u16::<LittleEndian>().map_err(&err)? as usize;
        let extra_len = cursor.read_u16::<LittleEndian>().map_err(&err)? as usize;

        Ok(Self {
            version_needed,
            flags,
            compression,
            modified: DosDateTime { time, date },
            crc32,
            compressed_size,
            uncompressed_size,
            file_name: read_vec(&mut cursor, name_len, RECORD)?,
            extra: read_vec(&mut cursor, extra_len, RECORD)?,
        })
    }

    pub fn encoded_len(&self) -> usize {
        Self::SIZE + self.file_name.len() + self.extra.len()
    }

    pub fn write_to<W: Write + ?Sized>(&self, w: &mut W) -> io::Result<()> {
        let mut buf = Vec::with_capacity(self.encoded_len());
        buf.write_u32::<LittleEndian>(Self::SIGNATURE)?;
        buf.write_u16::<LittleEndian>(self.version_needed)?;
        buf.write_u16::<LittleEndian>(self.flags)?;
        buf.write_u16::<LittleEndian>(self.compression)?;
        buf.write_u16::<LittleEndian>(self.modified.time)?;
        buf.write_u16::<LittleEndian>(self.modified.date)?;
        buf.write_u32::<LittleEndian>(self.crc32)?;
        buf.write_u32::<LittleEndian>(self.compressed_size)?;
        buf.write_u32::<LittleEndian>(self.uncompressed_size)?;
        buf.write_u16::<LittleEndian>(len_u16(&self.file_name)?)?;
        buf.write_u16::<LittleEndian>(len_u16(&self.extra)?)?;
        buf.extend_from_slice(&self.file_name);
        buf.extend_from_slice(&self.extra);
        w.write_all(&buf)
    }
}

/// Central Directory File Header (CDFH) - 46 bytes plus name, extra, comment
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CentralFileHeader {
    pub version_made_by: u16,
    pub version_needed: u16,
    pub flags: u16,
    pub compression: u16,
    pub modified: DosDateTime,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub disk_number_start: u16,
    pub internal_attrs: u16,
    pub external_attrs: u32,
    pub lfh_offset: u32,
    pub file_name: Vec<u8>,
    pub extra: Vec<u8>,
    pub comment: Vec<u8>,
}

impl CentralFileHeader {
    pub const SIGNATURE: u32 = 0x02014b50;
    pub const MIN_SIZE: usize = 46;

    /// Decode one record from the front of `data`.
    ///
    /// Returns the record and the number of bytes it occupied.
    pub fn from_bytes(data: &[u8]) -> Result<(Self, usize)> {
        const RECORD: &str = "central directory file header";
        check_signature(data, Self::SIGNATURE, RECORD)?;
        if data.len() < Self::MIN_SIZE {
            return Err(ZipError::format("truncated central directory file header"));
        }

        let mut cursor = Cursor::new(&data[4..]);
        let err = truncated(RECORD);
        let version_made_by = cursor.read_u16::<LittleEndian>().map_err(&err)?;
        let version_needed = cursor.read_u16::<LittleEndian>().map_err(&err)?;
        let flags = cursor.read_u16::<LittleEndian>().map_err(&err)?;
        let compression = cursor.read_u16::<LittleEndian>().map_err(&err)?;
        let time = cursor.read_u16::<LittleEndian>().map_err(&err)?;
        let date = cursor.read_u16::<LittleEndian>().map_err(&err)?;
        let crc32 = cursor.read_u32::<LittleEndian>().map_err(&err)?;
        let compressed_size = cursor.read_u32::<LittleEndian>().map_err(&err)?;
        let uncompressed_size = cursor.read_u32::<LittleEndian>().map_err(&err)?;
        let name_len = cursor.read_u16::<LittleEndian>().map_err(&err)? as usize;
        let extra_len = cursor.read_u16::<LittleEndian>().map_err(&err)? as usize;
        let comment_len = cursor.read_u16::<LittleEndian>().map_err(&err)? as usize;
        let disk_number_start = cursor.read_u16::<LittleEndian>().map_err(&err)?;
        let internal_attrs = cursor.read_u16::<LittleEndian>().map_err(&err)?;
        let external_attrs = cursor.read_u32::<LittleEndian>().map_err(&err)?;
        let lfh_offset = cursor.read_u32::<LittleEndian>().map_err(&err)?;

        let header = Self {
            version_made_by,
            version_needed,
            flags,
            compression,
            modified: DosDateTime { time, date },
            crc32,
            compressed_size,
            uncompressed_size,
            disk_number_start,
            internal_attrs,
            external_attrs,
            lfh_offset,
            file_name: read_vec(&mut cursor, name_len, RECORD)?,
            extra: read_vec(&mut cursor, extra_len, RECORD)?,
            comment: read_vec(&mut cursor, comment_len, RECORD)?,
        };
        let consumed = 4 + cursor.position() as usize;
        Ok((header, consumed))
    }

    pub fn encoded_len(&self) -> usize {
        Self::MIN_SIZE + self.file_name.len() + self.extra.len() + self.comment.len()
    }

    pub fn write_to<W: Write + ?Sized>(&self, w: &mut W) -> io::Result<()> {
        let mut buf = Vec::with_capacity(self.encoded_len());
        buf.write_u32::<LittleEndian>(Self::SIGNATURE)?;
        buf.write_u16::<LittleEndian>(self.version_made_by)?;
        buf.write_u16::<LittleEndian>(self.version_needed)?;
        buf.write_u16::<LittleEndian>(self.flags)?;
        buf.write_u16::<LittleEndian>(self.compression)?;
        buf.write_u16::<LittleEndian>(self.modified.time)?;
        buf.write_u16::<LittleEndian>(self.modified.date)?;
        buf.write_u32::<LittleEndian>(self.crc32)?;
        buf.write_u32::<LittleEndian>(self.compressed_size)?;
        buf.write_u32::<LittleEndian>(self.uncompressed_size)?;
        buf.write_u16::<LittleEndian>(len_u16(&self.file_name)?)?;
        buf.write_u16::<LittleEndian>(len_u16(&self.extra)?)?;
        buf.write_u16::<LittleEndian>(len_u16(&self.comment)?)?;
        buf.write_u16::<LittleEndian>(self.disk_number_start)?;
        buf.write_u16::<LittleEndian>(self.internal_attrs)?;
        buf.write_u32::<LittleEndian>(self.external_attrs)?;
        buf.write_u32::<LittleEndian>(self.lfh_offset)?;
        buf.extend_from_slice(&self.file_name);
        buf.extend_from_slice(&self.extra);
        buf.extend_from_slice(&self.comment);
        w.write_all(&buf)
    }
}

/// End of Central Directory (EOCD) - 22 bytes minimum
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EndOfCentralDirectory {
    pub disk_number: u16,
    pub disk_with_cd: u16,
    pub disk_entries: u16,
    pub total_entries: u16,
    pub cd_size: u32,
    pub cd_offset: u32,
    pub comment: Vec<u8>,
}

impl EndOfCentralDirectory {
    pub const SIGNATURE: u32 = 0x06054b50;
    pub const SIZE: usize = 22;
    /// Fixed record plus the largest possible comment.
    pub const MAX_SIZE: usize = Self::SIZE + u16::MAX as usize;

    /// Build a single-disk trailer.
    pub fn new(entries: u16, cd_size: u32, cd_offset: u32, comment: Vec<u8>) -> Self {
        Self {
            disk_number: 0,
            disk_with_cd: 0,
            disk_entries: entries,
            total_entries: entries,
            cd_size,
            cd_offset,
            comment,
        }
    }

    /// Comment length announced by a fixed record.
    pub fn comment_len(fixed: &[u8]) -> Result<usize> {
        check_signature(fixed, Self::SIGNATURE, "end of central directory")?;
        if fixed.len() < Self::SIZE {
            return Err(ZipError::format("truncated end of central directory"));
        }
        Ok(u16::from_le_bytes([fixed[20], fixed[21]]) as usize)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        const RECORD: &str = "end of central directory";
        check_signature(data, Self::SIGNATURE, RECORD)?;
        if data.len() < Self::SIZE {
            return Err(ZipError::format("truncated end of central directory"));
        }

        let mut cursor = Cursor::new(&data[4..]);
        let err = truncated(RECORD);
        let disk_number = cursor.read_u16::<LittleEndian>().map_err(&err)?;
        let disk_with_cd = cursor.read_u16::<LittleEndian>().map_err(&err)?;
        let disk_entries = cursor.read_u16::<LittleEndian>().map_err(&err)?;
        let total_entries = cursor.read_u16::<LittleEndian>().map_err(&err)?;
        let cd_size = cursor.read_u32::<LittleEndian>().map_err(&err)?;
        let cd_offset = cursor.read_u32::<LittleEndian>().map_err(&err)?;
        let comment_len = cursor.read_u16::<LittleEndian>().map_err(&err)? as usize;

        Ok(Self {
            disk_number,
            disk_with_cd,
            disk_entries,
            total_entries,
            cd_size,
            cd_offset,
            comment: read_vec(&mut cursor, comment_len, RECORD)?,
        })
    }

    pub fn encoded_len(&self) -> usize {
        Self::SIZE + self.comment.len()
    }

    pub fn write_to<W: Write + ?Sized>(&self, w: &mut W) -> io::Result<()> {
        let mut buf = Vec::with_capacity(self.encoded_len());
        buf.write_u32::<LittleEndian>(Self::SIGNATURE)?;
        buf.write_u16::<LittleEndian>(self.disk_number)?;
        buf.write_u16::<LittleEndian>(self.disk_with_cd)?;
        buf.write_u16::<LittleEndian>(self.disk_entries)?;
        buf.write_u16::<LittleEndian>(self.total_entries)?;
        buf.write_u32::<LittleEndian>(self.cd_size)?;
        buf.write_u32::<LittleEndian>(self.cd_offset)?;
        buf.write_u16::<LittleEndian>(len_u16(&self.comment)?)?;
        buf.extend_from_slice(&self.comment);
        w.write_all(&buf)
    }
}

fn len_u16(field: &[u8]) -> io::Result<u16> {
    u16::try_from(field.len()).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            "variable-length field exceeds 65535 bytes",
        )
    })
}
