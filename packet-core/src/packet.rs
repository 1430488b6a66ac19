//! ILP packets
//!
//! Every packet is a type byte followed by a variable-length envelope:
//!
//! ```text
//! Prepare (12): amount u64 | expires_at 17 ASCII "YYYYMMDDHHmmssfff" | condition [32]
//!               | destination var-octets | data var-octets
//! Fulfill (13): fulfillment [32] | data var-octets
//! Reject  (14): code [3] | triggered_by var-octets | message var-octets | data var-octets
//! ```

use crate::{
    condition::fulfillment_matches,
    oer::{Reader, Writer},
    Address, Error, ErrorCode, Result,
};
use bytes::Bytes;
use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Timelike, Utc};
use std::fmt;

/// Maximum size of the data field
pub const MAX_DATA_SIZE: usize = 32_767;

const TIMESTAMP_LENGTH: usize = 17;

/// Packet type byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketType {
    /// Prepare
    Prepare = 12,
    /// Fulfill
    Fulfill = 13,
    /// Reject
    Reject = 14,
}

impl TryFrom<u8> for PacketType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            12 => Ok(PacketType::Prepare),
            13 => Ok(PacketType::Fulfill),
            14 => Ok(PacketType::Reject),
            other => Err(Error::UnknownPacketType(other)),
        }
    }
}

/// Conditional transfer request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prepare {
    /// Destination address
    pub destination: Address,
    /// Amount in the sending peer's asset units
    pub amount: u64,
    /// Expiry (millisecond precision on the wire)
    pub expires_at: DateTime<Utc>,
    /// SHA-256 execution condition
    pub execution_condition: [u8; 32],
    /// End-to-end data
    pub data: Bytes,
}

/// Successful reply carrying the condition preimage
#[derive(Clone, PartialEq, Eq)]
pub struct Fulfill {
    /// 32-byte preimage of the execution condition
    pub fulfillment: [u8; 32],
    /// End-to-end data
    pub data: Bytes,
}

/// Failure reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reject {
    /// Error code
    pub code: ErrorCode,
    /// Address of the node that produced the reject
    pub triggered_by: Option<Address>,
    /// Human-readable message
    pub message: String,
    /// Machine-readable details
    pub data: Bytes,
}

/// Reply to a Prepare
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Fulfilled
    Fulfill(Fulfill),
    /// Rejected
    Reject(Reject),
}

/// Any ILP packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    /// Prepare
    Prepare(Prepare),
    /// Fulfill
    Fulfill(Fulfill),
    /// Reject
    Reject(Reject),
}

impl Prepare {
    /// Encode to OER
    pub fn to_bytes(&self) -> Bytes {
        let destination = self.destination.as_str().as_bytes();
        let mut envelope =
            Writer::with_capacity(8 + TIMESTAMP_LENGTH + 32 + destination.len() + self.data.len() + 8);
        envelope.write_u64(self.amount);
        envelope.write_bytes(format_timestamp(&self.expires_at).as_bytes());
        envelope.write_bytes(&self.execution_condition);
        envelope.write_var_octet_string(destination);
        envelope.write_var_octet_string(&self.data);
        wrap(PacketType::Prepare, &envelope.finalize())
    }

    /// Whether the Prepare has expired at `now`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    fn read_envelope(reader: &mut Reader<'_>) -> Result<Self> {
        let amount = reader.read_u64()?;
        let expires_at = parse_timestamp(reader.read_bytes(TIMESTAMP_LENGTH)?)?;
        let execution_condition = reader.read_array::<32>()?;
        let destination = Address::try_from(reader.read_var_octet_string()?)?;
        let data = read_data(reader)?;
        Ok(Self {
            destination,
            amount,
            expires_at,
            execution_condition,
            data,
        })
    }
}

impl Fulfill {
    /// Create fulfill with empty data
    pub fn new(fulfillment: [u8; 32]) -> Self {
        Self {
            fulfillment,
            data: Bytes::new(),
        }
    }

    /// Encode to OER
    pub fn to_bytes(&self) -> Bytes {
        let mut envelope = Writer::with_capacity(32 + self.data.len() + 4);
        envelope.write_bytes(&self.fulfillment);
        envelope.write_var_octet_string(&self.data);
        wrap(PacketType::Fulfill, &envelope.finalize())
    }

    /// Whether this fulfill satisfies `condition`
    pub fn matches(&self, condition: &[u8; 32]) -> bool {
        fulfillment_matches(&self.fulfillment, condition)
    }

    fn read_envelope(reader: &mut Reader<'_>) -> Result<Self> {
        let fulfillment = reader.read_array::<32>()?;
        let data = read_data(reader)?;
        Ok(Self { fulfillment, data })
    }
}

impl fmt::Debug for Fulfill {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fulfill")
            .field("fulfillment", &hex::encode(self.fulfillment))
            .field("data_len", &self.data.len())
            .finish()
    }
}

impl Reject {
    /// Create reject with empty data
    pub fn new(code: ErrorCode, message: impl Into<String>, triggered_by: Option<Address>) -> Self {
        Self {
            code,
            triggered_by,
            message: message.into(),
            data: Bytes::new(),
        }
    }

    /// Attach data
    pub fn with_data(mut self, data: Bytes) -> Self {
        self.data = data;
        self
    }

    /// Encode to OER
    pub fn to_bytes(&self) -> Bytes {
        let triggered_by = self
            .triggered_by
            .as_ref()
            .map(|a| a.as_str().as_bytes())
            .unwrap_or_default();
        let mut envelope = Writer::new();
        envelope.write_bytes(self.code.as_bytes());
        envelope.write_var_octet_string(triggered_by);
        envelope.write_var_octet_string(self.message.as_bytes());
        envelope.write_var_octet_string(&self.data);
        wrap(PacketType::Reject, &envelope.finalize())
    }

    fn read_envelope(reader: &mut Reader<'_>) -> Result<Self> {
        let code = ErrorCode::from_bytes(reader.read_array::<3>()?)?;
        let triggered_by = reader.read_var_octet_string()?;
        // Foreign implementations sometimes leave this empty or malformed
        let triggered_by = Address::try_from(triggered_by).ok();
        let message = String::from_utf8_lossy(reader.read_var_octet_string()?).into_owned();
        let data = read_data(reader)?;
        Ok(Self {
            code,
            triggered_by,
            message,
            data,
        })
    }
}

impl Reply {
    /// Encode to OER
    pub fn to_bytes(&self) -> Bytes {
        match self {
            Reply::Fulfill(fulfill) => fulfill.to_bytes(),
            Reply::Reject(reject) => reject.to_bytes(),
        }
    }

    /// Decode a Fulfill or Reject
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        match Packet::from_bytes(bytes)? {
            Packet::Fulfill(fulfill) => Ok(Reply::Fulfill(fulfill)),
            Packet::Reject(reject) => Ok(Reply::Reject(reject)),
            Packet::Prepare(_) => Err(Error::InvalidPacket(
                "expected a Fulfill or Reject, got a Prepare".to_string(),
            )),
        }
    }

    /// Whether this is a Fulfill
    pub fn is_fulfill(&self) -> bool {
        matches!(self, Reply::Fulfill(_))
    }

    /// Reject code, if rejected
    pub fn reject_code(&self) -> Option<ErrorCode> {
        match self {
            Reply::Reject(reject) => Some(reject.code),
            Reply::Fulfill(_) => None,
        }
    }
}

impl From<Fulfill> for Reply {
    fn from(fulfill: Fulfill) -> Self {
        Reply::Fulfill(fulfill)
    }
}

impl From<Reject> for Reply {
    fn from(reject: Reject) -> Self {
        Reply::Reject(reject)
    }
}

impl Packet {
    /// Decode any packet
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(bytes);
        let packet_type = PacketType::try_from(reader.read_u8()?)?;
        let envelope = reader.read_var_octet_string()?;
        reader.ensure_empty()?;

        let mut reader = Reader::new(envelope);
        let packet = match packet_type {
            PacketType::Prepare => Packet::Prepare(Prepare::read_envelope(&mut reader)?),
            PacketType::Fulfill => Packet::Fulfill(Fulfill::read_envelope(&mut reader)?),
            PacketType::Reject => Packet::Reject(Reject::read_envelope(&mut reader)?),
        };
        reader.ensure_empty()?;
        Ok(packet)
    }

    /// Encode to OER
    pub fn to_bytes(&self) -> Bytes {
        match self {
            Packet::Prepare(prepare) => prepare.to_bytes(),
            Packet::Fulfill(fulfill) => fulfill.to_bytes(),
            Packet::Reject(reject) => reject.to_bytes(),
        }
    }
}

impl TryFrom<&[u8]> for Prepare {
    type Error = Error;

    fn try_from(bytes: &[u8]) -> Result<Self> {
        match Packet::from_bytes(bytes)? {
            Packet::Prepare(prepare) => Ok(prepare),
            _ => Err(Error::InvalidPacket("expected a Prepare".to_string())),
        }
    }
}

fn wrap(packet_type: PacketType, envelope: &[u8]) -> Bytes {
    let mut writer = Writer::with_capacity(envelope.len() + 4);
    writer.write_u8(packet_type as u8);
    writer.write_var_octet_string(envelope);
    writer.finalize()
}

fn read_data(reader: &mut Reader<'_>) -> Result<Bytes> {
    let data = reader.read_var_octet_string()?;
    if data.len() > MAX_DATA_SIZE {
        return Err(Error::InvalidPacket(format!(
            "data field of {} bytes exceeds {}",
            data.len(),
            MAX_DATA_SIZE
        )));
    }
    Ok(Bytes::copy_from_slice(data))
}

/// Format as the 17-character interledger timestamp `YYYYMMDDHHmmssfff`
pub fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    format!(
        "{:04}{:02}{:02}{:02}{:02}{:02}{:03}",
        timestamp.year(),
        timestamp.month(),
        timestamp.day(),
        timestamp.hour(),
        timestamp.minute(),
        timestamp.second(),
        timestamp.timestamp_subsec_millis().min(999)
    )
}

/// Parse a 17-character interledger timestamp
pub fn parse_timestamp(bytes: &[u8]) -> Result<DateTime<Utc>> {
    let invalid = || Error::InvalidTimestamp(String::from_utf8_lossy(bytes).into_owned());
    if bytes.len() != TIMESTAMP_LENGTH || !bytes.iter().all(u8::is_ascii_digit) {
        return Err(invalid());
    }

    let field = |start: usize, end: usize| -> u32 {
        bytes[start..end]
            .iter()
            .fold(0u32, |acc, b| acc * 10 + (b - b'0') as u32)
    };

    let date = NaiveDate::from_ymd_opt(field(0, 4) as i32, field(4, 6), field(6, 8))
        .ok_or_else(invalid)?;
    let datetime = date
        .and_hms_milli_opt(field(8, 10), field(10, 12), field(12, 14), field(14, 17))
        .ok_or_else(invalid)?;
    Ok(Utc.from_utc_datetime(&datetime))
}
