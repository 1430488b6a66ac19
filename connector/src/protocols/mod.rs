//! Peer protocol controllers (ILDCP, CCP, Echo)

pub mod ccp;
pub mod echo;
pub mod ildcp;

pub use ccp::CcpRule;
pub use echo::{EchoAction, EchoController};
pub use ildcp::{request_config, IldcpRule};
