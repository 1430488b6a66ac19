//! Routing: the prefix table and route exchange with neighbours

pub mod ccp;
pub mod table;

pub use ccp::{build_update, AppliedUpdate, CcpSession, LocalNode, Neighbour};
pub use table::{Route, RouteOrigin, RoutingTable};
