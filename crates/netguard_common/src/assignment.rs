//! Desired gateway assignment.
//!
//! A pure function from interface identity to one of the two gateways,
//! used both for auto-repair and for judging whether an existing route is
//! ideal during failback. Deliberately decoupled from display-name parsing:
//! only the numeric index matters.

use crate::types::{GatewayPair, IfIndex};
use std::net::Ipv4Addr;

/// Deterministic target gateway for an interface: even indices map to the
/// primary gateway, odd indices to the backup.
pub fn desired_gateway(index: IfIndex, gateways: &GatewayPair) -> Ipv4Addr {
    if index % 2 == 0 {
        gateways.primary
    } else {
        gateways.backup
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair() -> GatewayPair {
        GatewayPair::new(
            "172.25.0.101".parse().unwrap(),
            "172.25.0.102".parse().unwrap(),
        )
    }

    #[test]
    fn test_parity_split() {
        let p = pair();
        assert_eq!(desired_gateway(2, &p), p.primary);
        assert_eq!(desired_gateway(4, &p), p.primary);
        assert_eq!(desired_gateway(3, &p), p.backup);
        assert_eq!(desired_gateway(7, &p), p.backup);
    }

    #[test]
    fn test_assignment_is_stable() {
        let p = pair();
        for idx in 0..64 {
            assert_eq!(desired_gateway(idx, &p), desired_gateway(idx, &p));
        }
    }
}
