//! Topic subscriptions and multi-hop routing: which topics a node cares
//! about, and through which direct peers the other endpoints of the mesh can
//! be reached.

pub mod filter;
pub mod routing_table;
