//! IPFIX abstract data types and their wire codecs.
//!
//! References:
//! - <https://datatracker.ietf.org/doc/html/rfc7011#section-6>
//! - <https://datatracker.ietf.org/doc/html/rfc7012>
//!
//! Every multi-octet quantity on the wire is big-endian. Unsigned and signed
//! integers support reduced-length encoding (RFC 7011 Section 6.2), and
//! `float64` may be reduced to four octets by emitting a `float32`.

use crate::IpfixError;

use nom::Err as NomErr;
use nom::IResult;
use nom::bytes::complete::take;
use nom::error::{Error as NomError, ErrorKind};
use nom::number::complete::{be_f32, be_f64, be_u8, be_u16, be_u32, be_u64, be_u128};
use serde::Serialize;

use std::net::{Ipv4Addr, Ipv6Addr};
use std::time::{Duration, SystemTime};

/// Field length sentinel marking a variable-length Information Element.
pub const VARLEN: u16 = 65535;

/// Seconds between the NTP epoch (1900-01-01) and the Unix epoch (1970-01-01).
const NTP_EPOCH_OFFSET: u64 = 2_208_988_800;

/// Abstract data types registered for IPFIX Information Elements (RFC 7012).
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy, Serialize)]
pub enum IeType {
    OctetArray,
    Unsigned8,
    Unsigned16,
    Unsigned32,
    Unsigned64,
    Signed8,
    Signed16,
    Signed32,
    Signed64,
    Float32,
    Float64,
    Boolean,
    MacAddress,
    String,
    DateTimeSeconds,
    DateTimeMilliseconds,
    DateTimeMicroseconds,
    DateTimeNanoseconds,
    Ipv4Address,
    Ipv6Address,
}

impl IeType {
    /// Length in octets a field of this type occupies by default.
    /// Octet arrays and strings have no natural width and default to [`VARLEN`].
    pub fn natural_length(&self) -> u16 {
        match self {
            Self::OctetArray | Self::String => VARLEN,
            Self::Unsigned8 | Self::Signed8 | Self::Boolean => 1,
            Self::Unsigned16 | Self::Signed16 => 2,
            Self::Unsigned32
            | Self::Signed32
            | Self::Float32
            | Self::DateTimeSeconds
            | Self::Ipv4Address => 4,
            Self::MacAddress => 6,
            Self::Unsigned64
            | Self::Signed64
            | Self::Float64
            | Self::DateTimeMilliseconds
            | Self::DateTimeMicroseconds
            | Self::DateTimeNanoseconds => 8,
            Self::Ipv6Address => 16,
        }
    }

    /// Whether a field of this type may be declared with the given length.
    ///
    /// Integers accept any length up to their natural width (reduced-length
    /// encoding), `float64` accepts 4 or 8, and octet arrays and strings
    /// accept anything including [`VARLEN`].
    pub fn accepts_length(&self, length: u16) -> bool {
        match self {
            Self::OctetArray | Self::String => length > 0,
            Self::Unsigned8
            | Self::Unsigned16
            | Self::Unsigned32
            | Self::Unsigned64
            | Self::Signed8
            | Self::Signed16
            | Self::Signed32
            | Self::Signed64 => length >= 1 && length <= self.natural_length(),
            Self::Float64 => length == 4 || length == 8,
            _ => length == self.natural_length(),
        }
    }

    /// Looks up a type by its registry name, e.g. `"unsigned64"`.
    pub fn from_name(name: &str) -> Option<Self> {
        let ty = match name {
            "octetArray" => Self::OctetArray,
            "unsigned8" => Self::Unsigned8,
            "unsigned16" => Self::Unsigned16,
            "unsigned32" => Self::Unsigned32,
            "unsigned64" => Self::Unsigned64,
            "signed8" => Self::Signed8,
            "signed16" => Self::Signed16,
            "signed32" => Self::Signed32,
            "signed64" => Self::Signed64,
            "float32" => Self::Float32,
            "float64" => Self::Float64,
            "boolean" => Self::Boolean,
            "macAddress" => Self::MacAddress,
            "string" => Self::String,
            "dateTimeSeconds" => Self::DateTimeSeconds,
            "dateTimeMilliseconds" => Self::DateTimeMilliseconds,
            "dateTimeMicroseconds" => Self::DateTimeMicroseconds,
            "dateTimeNanoseconds" => Self::DateTimeNanoseconds,
            "ipv4Address" => Self::Ipv4Address,
            "ipv6Address" => Self::Ipv6Address,
            _ => return None,
        };
        Some(ty)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::OctetArray => "octetArray",
            Self::Unsigned8 => "unsigned8",
            Self::Unsigned16 => "unsigned16",
            Self::Unsigned32 => "unsigned32",
            Self::Unsigned64 => "unsigned64",
            Self::Signed8 => "signed8",
            Self::Signed16 => "signed16",
            Self::Signed32 => "signed32",
            Self::Signed64 => "signed64",
            Self::Float32 => "float32",
            Self::Float64 => "float64",
            Self::Boolean => "boolean",
            Self::MacAddress => "macAddress",
            Self::String => "string",
            Self::DateTimeSeconds => "dateTimeSeconds",
            Self::DateTimeMilliseconds => "dateTimeMilliseconds",
            Self::DateTimeMicroseconds => "dateTimeMicroseconds",
            Self::DateTimeNanoseconds => "dateTimeNanoseconds",
            Self::Ipv4Address => "ipv4Address",
            Self::Ipv6Address => "ipv6Address",
        }
    }
}

/// Holds a decoded field with its relevant datatype.
#[derive(Debug, PartialEq, PartialOrd, Clone, Serialize)]
pub enum FieldValue {
    Bytes(Vec<u8>),
    Unsigned(u64),
    Signed(i64),
    Float(f64),
    Boolean(bool),
    MacAddr([u8; 6]),
    String(String),
    DateTime(SystemTime),
    Ip4Addr(Ipv4Addr),
    Ip6Addr(Ipv6Addr),
}

impl FieldValue {
    /// Encodes the value for a field of type `ie_type` declared with `length`
    /// octets. For [`VARLEN`] fields the exact value bytes are returned and
    /// the caller writes the length prefix.
    pub fn to_wire(&self, ie_type: IeType, length: u16) -> Result<Vec<u8>, IpfixError> {
        match (ie_type, self) {
            (IeType::OctetArray, FieldValue::Bytes(b)) => {
                if length != VARLEN && b.len() != usize::from(length) {
                    return Err(IpfixError::IncompatibleValue {
                        context: format!(
                            "octetArray value of {} octets in a {length}-octet field",
                            b.len()
                        ),
                    });
                }
                Ok(b.clone())
            }
            (
                IeType::Unsigned8 | IeType::Unsigned16 | IeType::Unsigned32 | IeType::Unsigned64,
                FieldValue::Unsigned(v),
            ) => Ok(v.to_be_bytes()[8 - int_width(length)?..].to_vec()),
            (
                IeType::Signed8 | IeType::Signed16 | IeType::Signed32 | IeType::Signed64,
                FieldValue::Signed(v),
            ) => Ok(v.to_be_bytes()[8 - int_width(length)?..].to_vec()),
            (IeType::Float32, FieldValue::Float(f)) => Ok((*f as f32).to_be_bytes().to_vec()),
            (IeType::Float64, FieldValue::Float(f)) => {
                if length == 4 {
                    Ok((*f as f32).to_be_bytes().to_vec())
                } else {
                    Ok(f.to_be_bytes().to_vec())
                }
            }
            (IeType::Boolean, FieldValue::Boolean(b)) => Ok(vec![if *b { 1 } else { 2 }]),
            (IeType::MacAddress, FieldValue::MacAddr(mac)) => Ok(mac.to_vec()),
            (IeType::String, FieldValue::String(s)) => {
                let bytes = s.as_bytes();
                if length == VARLEN {
                    return Ok(bytes.to_vec());
                }
                // Fixed-length strings are padded with NUL octets.
                if bytes.len() > usize::from(length) {
                    return Err(IpfixError::IncompatibleValue {
                        context: format!(
                            "string of {} octets in a {length}-octet field",
                            bytes.len()
                        ),
                    });
                }
                let mut out = bytes.to_vec();
                out.resize(usize::from(length), 0);
                Ok(out)
            }
            (IeType::DateTimeSeconds, FieldValue::DateTime(t)) => {
                Ok((unix_duration(t)?.as_secs() as u32).to_be_bytes().to_vec())
            }
            (IeType::DateTimeMilliseconds, FieldValue::DateTime(t)) => {
                Ok((unix_duration(t)?.as_millis() as u64).to_be_bytes().to_vec())
            }
            (IeType::DateTimeMicroseconds, FieldValue::DateTime(t)) => {
                let d = unix_duration(t)?;
                let frac = (u64::from(d.subsec_micros()) << 32) / 1_000_000;
                Ok(ntp_bytes(d.as_secs(), frac as u32))
            }
            (IeType::DateTimeNanoseconds, FieldValue::DateTime(t)) => {
                let d = unix_duration(t)?;
                let frac = (u64::from(d.subsec_nanos()) << 32) / 1_000_000_000;
                Ok(ntp_bytes(d.as_secs(), frac as u32))
            }
            (IeType::Ipv4Address, FieldValue::Ip4Addr(ip)) => Ok(ip.octets().to_vec()),
            (IeType::Ipv6Address, FieldValue::Ip6Addr(ip)) => Ok(ip.octets().to_vec()),
            (ty, value) => Err(IpfixError::IncompatibleValue {
                context: format!("{value:?} cannot encode as {}", ty.name()),
            }),
        }
    }

    /// Decodes a field of type `ie_type` occupying `length` octets. For
    /// variable-length fields the caller resolves the length prefix first and
    /// passes the actual value length.
    pub fn from_wire(i: &[u8], ie_type: IeType, length: u16) -> IResult<&[u8], FieldValue> {
        match ie_type {
            IeType::OctetArray => {
                let (i, taken) = take(usize::from(length))(i)?;
                Ok((i, FieldValue::Bytes(taken.to_vec())))
            }
            IeType::Unsigned8 | IeType::Unsigned16 | IeType::Unsigned32 | IeType::Unsigned64 => {
                let (i, v) = be_uint(i, length)?;
                Ok((i, FieldValue::Unsigned(v)))
            }
            IeType::Signed8 | IeType::Signed16 | IeType::Signed32 | IeType::Signed64 => {
                let (i, v) = be_int(i, length)?;
                Ok((i, FieldValue::Signed(v)))
            }
            IeType::Float32 => {
                let (i, f) = be_f32(i)?;
                Ok((i, FieldValue::Float(f64::from(f))))
            }
            IeType::Float64 => {
                if length == 4 {
                    let (i, f) = be_f32(i)?;
                    Ok((i, FieldValue::Float(f64::from(f))))
                } else {
                    let (i, f) = be_f64(i)?;
                    Ok((i, FieldValue::Float(f)))
                }
            }
            IeType::Boolean => {
                let (rest, b) = be_u8(i)?;
                match b {
                    1 => Ok((rest, FieldValue::Boolean(true))),
                    2 => Ok((rest, FieldValue::Boolean(false))),
                    _ => Err(NomErr::Error(NomError::new(i, ErrorKind::Fail))),
                }
            }
            IeType::MacAddress => {
                let (rest, taken) = take(6_usize)(i)?;
                let mac: [u8; 6] = taken
                    .try_into()
                    .map_err(|_| NomErr::Error(NomError::new(i, ErrorKind::Fail)))?;
                Ok((rest, FieldValue::MacAddr(mac)))
            }
            IeType::String => {
                let (i, taken) = take(usize::from(length))(i)?;
                let s = String::from_utf8_lossy(taken);
                // Fixed-length strings arrive NUL-padded.
                Ok((i, FieldValue::String(s.trim_end_matches('\0').to_string())))
            }
            IeType::DateTimeSeconds => {
                let (i, secs) = be_u32(i)?;
                let t = SystemTime::UNIX_EPOCH + Duration::from_secs(u64::from(secs));
                Ok((i, FieldValue::DateTime(t)))
            }
            IeType::DateTimeMilliseconds => {
                let (i, millis) = be_u64(i)?;
                let t = SystemTime::UNIX_EPOCH + Duration::from_millis(millis);
                Ok((i, FieldValue::DateTime(t)))
            }
            IeType::DateTimeMicroseconds => {
                let (rest, (secs, frac)) = ntp_parts(i)?;
                let micros = (u64::from(frac) * 1_000_000) >> 32;
                let t = SystemTime::UNIX_EPOCH
                    + Duration::from_secs(secs)
                    + Duration::from_micros(micros);
                Ok((rest, FieldValue::DateTime(t)))
            }
            IeType::DateTimeNanoseconds => {
                let (rest, (secs, frac)) = ntp_parts(i)?;
                let nanos = (u64::from(frac) * 1_000_000_000) >> 32;
                let t = SystemTime::UNIX_EPOCH
                    + Duration::from_secs(secs)
                    + Duration::from_nanos(nanos);
                Ok((rest, FieldValue::DateTime(t)))
            }
            IeType::Ipv4Address => {
                let (i, taken) = be_u32(i)?;
                Ok((i, FieldValue::Ip4Addr(Ipv4Addr::from(taken))))
            }
            IeType::Ipv6Address => {
                let (i, taken) = be_u128(i)?;
                Ok((i, FieldValue::Ip6Addr(Ipv6Addr::from(taken))))
            }
        }
    }
}

fn int_width(length: u16) -> Result<usize, IpfixError> {
    if length == 0 || length > 8 {
        return Err(IpfixError::IncompatibleValue {
            context: format!("integer field of {length} octets"),
        });
    }
    Ok(usize::from(length))
}

fn unix_duration(t: &SystemTime) -> Result<Duration, IpfixError> {
    t.duration_since(SystemTime::UNIX_EPOCH)
        .map_err(|_| IpfixError::IncompatibleValue {
            context: "timestamp precedes the Unix epoch".to_string(),
        })
}

fn ntp_bytes(unix_secs: u64, frac: u32) -> Vec<u8> {
    let mut out = Vec::with_capacity(8);
    out.extend_from_slice(&((unix_secs + NTP_EPOCH_OFFSET) as u32).to_be_bytes());
    out.extend_from_slice(&frac.to_be_bytes());
    out
}

fn ntp_parts(i: &[u8]) -> IResult<&[u8], (u64, u32)> {
    let (rest, raw_secs) = be_u32(i)?;
    let (rest, frac) = be_u32(rest)?;
    let secs = u64::from(raw_secs)
        .checked_sub(NTP_EPOCH_OFFSET)
        .ok_or_else(|| NomErr::Error(NomError::new(i, ErrorKind::Fail)))?;
    Ok((rest, (secs, frac)))
}

/// Reads a big-endian unsigned integer of 1 to 8 octets.
fn be_uint(i: &[u8], length: u16) -> IResult<&[u8], u64> {
    if length == 0 || length > 8 {
        return Err(NomErr::Error(NomError::new(i, ErrorKind::Fail)));
    }
    let (i, taken) = take(usize::from(length))(i)?;
    let v = taken.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b));
    Ok((i, v))
}

/// Reads a big-endian two's-complement integer of 1 to 8 octets,
/// sign-extending reduced-length values.
fn be_int(i: &[u8], length: u16) -> IResult<&[u8], i64> {
    if length == 0 || length > 8 {
        return Err(NomErr::Error(NomError::new(i, ErrorKind::Fail)));
    }
    let (i, taken) = take(usize::from(length))(i)?;
    let mut v: i64 = if taken[0] & 0x80 != 0 { -1 } else { 0 };
    for b in taken {
        v = (v << 8) | i64::from(*b);
    }
    Ok((i, v))
}

/// Reads a variable-length field's length prefix: one octet below 255,
/// otherwise the octet 255 followed by a big-endian u16.
pub fn parse_varlen_length(i: &[u8]) -> IResult<&[u8], u16> {
    let (rest, short) = be_u8(i)?;
    if short < 255 {
        Ok((rest, u16::from(short)))
    } else {
        be_u16(rest)
    }
}

/// Appends a varlen length prefix, picking the short form whenever possible.
pub fn write_varlen_length(length: usize, out: &mut Vec<u8>) -> Result<(), IpfixError> {
    let length = u16::try_from(length).map_err(|_| IpfixError::IncompatibleValue {
        context: format!("variable-length value of {length} octets exceeds 65535"),
    })?;
    if length < 255 {
        out.push(length as u8);
    } else {
        out.push(255);
        out.extend_from_slice(&length.to_be_bytes());
    }
    Ok(())
}
