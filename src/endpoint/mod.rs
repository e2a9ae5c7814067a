//! Endpoints, peerings and the orchestration between them: accepting links,
//! exchanging filters and routing advertisements, dispatching data messages
//! to local subscribers and further along the mesh, and tearing peerings
//! down gracefully with the BYE handshake.

pub mod endpoint;
pub mod endpoint_config;
pub mod endpoint_driver;
pub mod endpoint_events;
pub mod endpoint_id;
pub mod endpoint_state;
pub mod messages;
pub mod peering;
