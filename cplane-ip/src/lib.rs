//! IPv4 Next-Hop Table (§4.5) and its bundled `/32`-only Host Route Table
//! collaborator (§4.6), plus the control-plane handler semantics that
//! `cplane-api` wires to the transport.

pub mod clock;
pub mod handlers;
pub mod nexthop;
pub mod route;

pub use clock::{Clock, ManualClock, SystemClock};
pub use handlers::{NhListEntry, nh_add, nh_del, nh_list};
pub use nexthop::{NextHop, NextHopTable};
pub use route::HostRouteTable;
