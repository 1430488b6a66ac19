//! Echo protocol payloads
//!
//! ```text
//! "ECHOECHOECHOECHO" | 0u8 | source_address var-octets   (request)
//! "ECHOECHOECHOECHO" | 1u8                               (response)
//! ```

use crate::{
    oer::{Reader, Writer},
    Address, Error, Result,
};
use bytes::Bytes;

/// Prefix of every echo payload
pub const ECHO_PREFIX: &[u8; 16] = b"ECHOECHOECHOECHO";

const PROTOCOL: &str = "Echo";

/// Echo payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EchoMessage {
    /// Asks the receiver to send a response back to `source`
    Request {
        /// Where the response should go
        source: Address,
    },
    /// Response to an earlier request
    Response,
}

impl EchoMessage {
    /// Whether `data` starts with the echo prefix
    pub fn is_echo(data: &[u8]) -> bool {
        data.starts_with(ECHO_PREFIX)
    }

    /// Encode
    pub fn encode(&self) -> Bytes {
        let mut writer = Writer::with_capacity(ECHO_PREFIX.len() + 1);
        writer.write_bytes(ECHO_PREFIX);
        match self {
            EchoMessage::Request { source } => {
                writer.write_u8(0);
                writer.write_var_octet_string(source.as_str().as_bytes());
            }
            EchoMessage::Response => writer.write_u8(1),
        }
        writer.finalize()
    }

    /// Decode
    pub fn decode(data: &[u8]) -> Result<Self> {
        if !Self::is_echo(data) {
            return Err(Error::payload(PROTOCOL, "missing ECHO prefix"));
        }
        let mut reader = Reader::new(&data[ECHO_PREFIX.len()..]);
        match reader.read_u8()? {
            0 => {
                let source = Address::try_from(reader.read_var_octet_string()?)
                    .map_err(|e| Error::payload(PROTOCOL, e.to_string()))?;
                Ok(EchoMessage::Request { source })
            }
            1 => Ok(EchoMessage::Response),
            other => Err(Error::payload(
                PROTOCOL,
                format!("unexpected echo type {}", other),
            )),
        }
    }
}
