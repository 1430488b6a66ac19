//! Connector-to-Connector Protocol (CCP) messages
//!
//! Route exchange between neighbours. Both messages travel as the data of
//! a Prepare carrying the peer-protocol condition.
//!
//! ```text
//! RouteControlRequest (peer.route.control):
//!   mode u8 | routing_table_id [16] | last_known_epoch u32 | features var-uint + var-octets*
//!
//! RouteUpdateRequest (peer.route.update):
//!   routing_table_id [16] | current_epoch u32 | from_epoch u32 | to_epoch u32
//!   | hold_down_time u32 | speaker var-octets
//!   | new_routes var-uint + (prefix | path var-uint + var-octets* | auth [32] | props)*
//!   | withdrawn_routes var-uint + var-octets*
//! ```

use crate::{
    condition::PEER_PROTOCOL_CONDITION,
    oer::{Reader, Writer},
    Address, Error, Prepare, Result,
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Destination of route control requests
pub const CCP_CONTROL_DESTINATION: &str = "peer.route.control";

/// Destination of route update requests
pub const CCP_UPDATE_DESTINATION: &str = "peer.route.update";

const PROTOCOL: &str = "CCP";

/// Sender mode requested by the receiver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Mode {
    /// Do not send updates
    Idle = 0,
    /// Send updates
    Sync = 1,
}

impl TryFrom<u8> for Mode {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Mode::Idle),
            1 => Ok(Mode::Sync),
            other => Err(Error::payload(PROTOCOL, format!("unknown mode {}", other))),
        }
    }
}

/// Asks a neighbour to start or stop sending route updates
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteControlRequest {
    /// Requested mode
    pub mode: Mode,
    /// Routing table the requester last heard from
    pub last_known_routing_table_id: Uuid,
    /// Last epoch the requester applied
    pub last_known_epoch: u32,
    /// Optional features
    pub features: Vec<String>,
}

/// Route property
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteProp {
    /// Optional flag
    pub is_optional: bool,
    /// Transitive flag
    pub is_transitive: bool,
    /// Partial flag
    pub is_partial: bool,
    /// Value is UTF-8
    pub is_utf8: bool,
    /// Property id
    pub id: u16,
    /// Raw value
    pub value: Bytes,
}

/// Advertised route
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CcpRoute {
    /// Address prefix (a bare scheme is allowed)
    pub prefix: String,
    /// Nodes the advertisement has traversed, nearest first
    pub path: Vec<String>,
    /// Route authentication
    pub auth: [u8; 32],
    /// Properties
    pub props: Vec<RouteProp>,
}

/// Incremental routing table update
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteUpdateRequest {
    /// Sender's routing table id
    pub routing_table_id: Uuid,
    /// Sender's current epoch
    pub current_epoch_index: u32,
    /// First epoch covered by this update
    pub from_epoch_index: u32,
    /// Epoch after applying this update
    pub to_epoch_index: u32,
    /// How long routes stay valid without refresh (ms)
    pub hold_down_time: u32,
    /// Sender address
    pub speaker: Address,
    /// Added or changed routes
    pub new_routes: Vec<CcpRoute>,
    /// Withdrawn prefixes
    pub withdrawn_routes: Vec<String>,
}

impl RouteControlRequest {
    /// Encode payload
    pub fn encode(&self) -> Bytes {
        let mut writer = Writer::new();
        writer.write_u8(self.mode as u8);
        writer.write_bytes(self.last_known_routing_table_id.as_bytes());
        writer.write_u32(self.last_known_epoch);
        write_strings(&mut writer, &self.features);
        writer.finalize()
    }

    /// Decode payload
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(bytes);
        let mode = Mode::try_from(reader.read_u8()?)?;
        let last_known_routing_table_id = Uuid::from_bytes(reader.read_array::<16>()?);
        let last_known_epoch = reader.read_u32()?;
        let features = read_strings(&mut reader)?;
        reader.ensure_empty()?;
        Ok(Self {
            mode,
            last_known_routing_table_id,
            last_known_epoch,
            features,
        })
    }

    /// Wrap in a Prepare
    pub fn to_prepare(&self, expires_at: DateTime<Utc>) -> Result<Prepare> {
        peer_prepare(CCP_CONTROL_DESTINATION, self.encode(), expires_at)
    }
}

impl RouteProp {
    fn meta(&self) -> u8 {
        (self.is_optional as u8) << 7
            | (self.is_transitive as u8) << 6
            | (self.is_partial as u8) << 5
            | (self.is_utf8 as u8) << 4
    }
}

impl CcpRoute {
    fn write(&self, writer: &mut Writer) {
        writer.write_var_octet_string(self.prefix.as_bytes());
        write_strings(writer, &self.path);
        writer.write_bytes(&self.auth);
        writer.write_var_uint(self.props.len() as u64);
        for prop in &self.props {
            writer.write_u8(prop.meta());
            writer.write_u16(prop.id);
            writer.write_var_octet_string(&prop.value);
        }
    }

    fn read(reader: &mut Reader<'_>) -> Result<Self> {
        let prefix = read_string(reader)?;
        if !Address::is_valid_prefix(&prefix) {
            return Err(Error::payload(
                PROTOCOL,
                format!("invalid route prefix {:?}", prefix),
            ));
        }
        let path = read_strings(reader)?;
        let auth = reader.read_array::<32>()?;
        let count = read_count(reader)?;
        let mut props = Vec::with_capacity(count.min(64));
        for _ in 0..count {
            let meta = reader.read_u8()?;
            let id = reader.read_u16()?;
            let value = Bytes::copy_from_slice(reader.read_var_octet_string()?);
            props.push(RouteProp {
                is_optional: meta & 0x80 != 0,
                is_transitive: meta & 0x40 != 0,
                is_partial: meta & 0x20 != 0,
                is_utf8: meta & 0x10 != 0,
                id,
                value,
            });
        }
        Ok(Self {
            prefix,
            path,
            auth,
            props,
        })
    }
}

impl RouteUpdateRequest {
    /// Encode payload
    pub fn encode(&self) -> Bytes {
        let mut writer = Writer::new();
        writer.write_bytes(self.routing_table_id.as_bytes());
        writer.write_u32(self.current_epoch_index);
        writer.write_u32(self.from_epoch_index);
        writer.write_u32(self.to_epoch_index);
        writer.write_u32(self.hold_down_time);
        writer.write_var_octet_string(self.speaker.as_str().as_bytes());
        writer.write_var_uint(self.new_routes.len() as u64);
        for route in &self.new_routes {
            route.write(&mut writer);
        }
        write_strings(&mut writer, &self.withdrawn_routes);
        writer.finalize()
    }

    /// Decode payload
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(bytes);
        let routing_table_id = Uuid::from_bytes(reader.read_array::<16>()?);
        let current_epoch_index = reader.read_u32()?;
        let from_epoch_index = reader.read_u32()?;
        let to_epoch_index = reader.read_u32()?;
        let hold_down_time = reader.read_u32()?;
        let speaker = Address::try_from(reader.read_var_octet_string()?)
            .map_err(|e| Error::payload(PROTOCOL, e.to_string()))?;

        let count = read_count(&mut reader)?;
        let mut new_routes = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            new_routes.push(CcpRoute::read(&mut reader)?);
        }
        let withdrawn_routes = read_strings(&mut reader)?;
        reader.ensure_empty()?;

        if from_epoch_index > to_epoch_index {
            return Err(Error::payload(
                PROTOCOL,
                format!(
                    "from epoch {} is after to epoch {}",
                    from_epoch_index, to_epoch_index
                ),
            ));
        }

        Ok(Self {
            routing_table_id,
            current_epoch_index,
            from_epoch_index,
            to_epoch_index,
            hold_down_time,
            speaker,
            new_routes,
            withdrawn_routes,
        })
    }

    /// Wrap in a Prepare
    pub fn to_prepare(&self, expires_at: DateTime<Utc>) -> Result<Prepare> {
        peer_prepare(CCP_UPDATE_DESTINATION, self.encode(), expires_at)
    }
}

fn peer_prepare(destination: &str, data: Bytes, expires_at: DateTime<Utc>) -> Result<Prepare> {
    Ok(Prepare {
        destination: Address::new(destination)?,
        amount: 0,
        expires_at,
        execution_condition: PEER_PROTOCOL_CONDITION,
        data,
    })
}

fn read_count(reader: &mut Reader<'_>) -> Result<usize> {
    let count = reader.read_var_uint()?;
    // Every element takes at least one byte
    if count > reader.remaining() as u64 {
        return Err(Error::payload(
            PROTOCOL,
            format!("count {} exceeds remaining {} bytes", count, reader.remaining()),
        ));
    }
    Ok(count as usize)
}

fn read_string(reader: &mut Reader<'_>) -> Result<String> {
    std::str::from_utf8(reader.read_var_octet_string()?)
        .map(str::to_string)
        .map_err(|_| Error::payload(PROTOCOL, "string is not valid UTF-8"))
}

fn read_strings(reader: &mut Reader<'_>) -> Result<Vec<String>> {
    let count = read_count(reader)?;
    let mut strings = Vec::with_capacity(count);
    for _ in 0..count {
        strings.push(read_string(reader)?);
    }
    Ok(strings)
}

fn write_strings(writer: &mut Writer, strings: &[String]) {
    writer.write_var_uint(strings.len() as u64);
    for s in strings {
        writer.write_var_octet_string(s.as_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_request_layout() {
        let request = RouteControlRequest {
            mode: Mode::Sync,
            last_known_routing_table_id: Uuid::nil(),
            last_known_epoch: 32,
            features: vec!["foo".to_string()],
        };
        let bytes = request.encode();

        let mut expected = vec![1u8];
        expected.extend_from_slice(&[0u8; 16]);
        expected.extend_from_slice(&[0, 0, 0, 32]);
        expected.extend_from_slice(&[1, 1, 3, b'f', b'o', b'o']);
        assert_eq!(&bytes[..], &expected[..]);

        assert_eq!(RouteControlRequest::decode(&bytes).unwrap(), request);
    }

    #[test]
    fn test_update_request_decodes_what_it_encodes() {
        let update = RouteUpdateRequest {
            routing_table_id: Uuid::new_v4(),
            current_epoch_index: 52,
            from_epoch_index: 50,
            to_epoch_index: 52,
            hold_down_time: 45_000,
            speaker: Address::new("test.alice").unwrap(),
            new_routes: vec![CcpRoute {
                prefix: "test.alice.bob".to_string(),
                path: vec!["test.alice".to_string()],
                auth: [7u8; 32],
                props: vec![RouteProp {
                    is_optional: true,
                    is_transitive: true,
                    is_partial: false,
                    is_utf8: true,
                    id: 9,
                    value: Bytes::from_static(b"hi"),
                }],
            }],
            withdrawn_routes: vec!["test.alice.carl".to_string()],
        };
        let decoded = RouteUpdateRequest::decode(&update.encode()).unwrap();
        assert_eq!(decoded, update);
    }

    #[test]
    fn test_bare_scheme_prefix_allowed() {
        let update = RouteUpdateRequest {
            routing_table_id: Uuid::nil(),
            current_epoch_index: 1,
            from_epoch_index: 0,
            to_epoch_index: 1,
            hold_down_time: 0,
            speaker: Address::new("test.parent").unwrap(),
            new_routes: vec![CcpRoute {
                prefix: "test".to_string(),
                path: vec![],
                auth: [0u8; 32],
                props: vec![],
            }],
            withdrawn_routes: vec![],
        };
        assert!(RouteUpdateRequest::decode(&update.encode()).is_ok());
    }

    #[test]
    fn test_unknown_mode_rejected() {
        let mut bytes = vec![7u8];
        bytes.extend_from_slice(&[0u8; 16]);
        bytes.extend_from_slice(&[0, 0, 0, 0, 1, 0]);
        assert!(RouteControlRequest::decode(&bytes).is_err());
    }

    #[test]
    fn test_inflated_count_rejected() {
        let mut bytes = vec![1u8];
        bytes.extend_from_slice(&[0u8; 16]);
        bytes.extend_from_slice(&[0, 0, 0, 0]);
        // claims 200 features with nothing following
        bytes.extend_from_slice(&[1, 200]);
        assert!(RouteControlRequest::decode(&bytes).is_err());
    }
}
