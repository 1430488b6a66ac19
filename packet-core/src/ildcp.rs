//! Interledger Dynamic Configuration Protocol (ILDCP)
//!
//! A child asks its parent for an address by sending a zero-amount Prepare
//! to `peer.config`. The parent fulfills it with:
//!
//! ```text
//! client_address var-octets | asset_scale u8 | asset_code var-octets
//! ```

use crate::{
    condition::{PEER_PROTOCOL_CONDITION, PEER_PROTOCOL_FULFILLMENT},
    oer::{Reader, Writer},
    Address, Error, Fulfill, Prepare, Result,
};
use bytes::Bytes;
use chrono::{DateTime, Utc};

/// Destination of ILDCP requests
pub const ILDCP_DESTINATION: &str = "peer.config";

const PROTOCOL: &str = "ILDCP";

/// Build an ILDCP request Prepare
pub fn request(expires_at: DateTime<Utc>) -> Result<Prepare> {
    Ok(Prepare {
        destination: Address::new(ILDCP_DESTINATION)?,
        amount: 0,
        expires_at,
        execution_condition: PEER_PROTOCOL_CONDITION,
        data: Bytes::new(),
    })
}

/// Whether a Prepare is an ILDCP request
pub fn is_request(prepare: &Prepare) -> bool {
    prepare.destination.as_str() == ILDCP_DESTINATION
}

/// Configuration handed to a child
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IldcpResponse {
    /// Address assigned to the requester
    pub client_address: Address,
    /// Asset scale
    pub asset_scale: u8,
    /// Asset code
    pub asset_code: String,
}

impl IldcpResponse {
    /// Encode the response payload
    pub fn encode(&self) -> Bytes {
        let mut writer = Writer::new();
        writer.write_var_octet_string(self.client_address.as_str().as_bytes());
        writer.write_u8(self.asset_scale);
        writer.write_var_octet_string(self.asset_code.as_bytes());
        writer.finalize()
    }

    /// Decode a response payload
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(bytes);
        let client_address = Address::try_from(reader.read_var_octet_string()?)
            .map_err(|e| Error::payload(PROTOCOL, e.to_string()))?;
        let asset_scale = reader.read_u8()?;
        let asset_code = std::str::from_utf8(reader.read_var_octet_string()?)
            .map_err(|_| Error::payload(PROTOCOL, "asset code is not valid UTF-8"))?
            .to_string();
        reader.ensure_empty()?;
        Ok(Self {
            client_address,
            asset_scale,
            asset_code,
        })
    }

    /// Wrap into a Fulfill
    pub fn to_fulfill(&self) -> Fulfill {
        Fulfill {
            fulfillment: PEER_PROTOCOL_FULFILLMENT,
            data: self.encode(),
        }
    }
}

impl TryFrom<&Fulfill> for IldcpResponse {
    type Error = Error;

    fn try_from(fulfill: &Fulfill) -> Result<Self> {
        IldcpResponse::decode(&fulfill.data)
    }
}
