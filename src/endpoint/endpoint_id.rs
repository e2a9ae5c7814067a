use std::fmt::{Debug, Formatter};

use uuid::Uuid;

/// Globally unique identifier of an endpoint: 128 random bits, drawn once
/// when the endpoint starts. There is no registry and no coordination -
/// uniqueness is probabilistic, which is plenty for routing-table keys.
///
/// NB: A restarted node gets a fresh id. That is intentional: peers must not
///  confuse the restarted instance with its previous incarnation, whose
///  channel state is gone.
#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct EndpointId(Uuid);

impl EndpointId {
    pub fn random() -> EndpointId {
        EndpointId(Uuid::new_v4())
    }

    pub fn from_u128(value: u128) -> EndpointId {
        EndpointId(Uuid::from_u128(value))
    }
}

impl Debug for EndpointId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        // the first eight hex digits are unique enough for log output
        let full = self.0.simple().to_string();
        write!(f, "[{}]", &full[..8])
    }
}
