//! Endpoint ordering and filtering.
//!
//! Resolution turns the raw endpoint list of a reference into an ordered
//! candidate list in four steps:
//!
//! 1. keep only endpoints matching the invocation mode (datagram or stream)
//! 2. order them by the selection policy
//! 3. if the reference is secure, keep only secure endpoints (falling back
//!    to the unfiltered list when none is secure)
//! 4. stable-partition by security according to `prefer_secure`

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use wayfarer_core::{shuffle, RandomProvider};

use super::Endpoint;
use crate::InvocationMode;

/// Order in which endpoints are tried.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EndpointSelection {
    /// Fresh uniformly random permutation on every resolution.
    #[default]
    Random,
    /// Declaration order.
    Ordered,
}

/// Error for an endpoint selection name that is neither `Random` nor `Ordered`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("illegal endpoint selection `{0}`, expected `Random` or `Ordered`")]
pub struct ParseEndpointSelectionError(pub String);

impl FromStr for EndpointSelection {
    type Err = ParseEndpointSelectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "Random" => Ok(Self::Random),
            "Ordered" => Ok(Self::Ordered),
            other => Err(ParseEndpointSelectionError(other.to_string())),
        }
    }
}

impl fmt::Display for EndpointSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Random => f.write_str("Random"),
            Self::Ordered => f.write_str("Ordered"),
        }
    }
}

/// Order `endpoints` according to `policy`.
///
/// `Ordered` returns them unchanged, `Random` returns a permutation drawn
/// from `random`.
pub fn select(
    endpoints: &[Endpoint],
    policy: EndpointSelection,
    random: &dyn RandomProvider,
) -> Vec<Endpoint> {
    let mut ordered = endpoints.to_vec();
    if policy == EndpointSelection::Random {
        shuffle(random, &mut ordered);
    }
    ordered
}

/// Produce the ordered candidate list for one connection attempt.
///
/// Never fails; an empty result means no endpoint is usable for `mode`.
pub fn filter_endpoints(
    endpoints: &[Endpoint],
    mode: InvocationMode,
    secure: bool,
    prefer_secure: bool,
    policy: EndpointSelection,
    random: &dyn RandomProvider,
) -> Vec<Endpoint> {
    let datagram = mode.is_datagram();
    let usable: Vec<Endpoint> = endpoints
        .iter()
        .filter(|endpoint| endpoint.is_datagram() == datagram)
        .cloned()
        .collect();

    let mut candidates = select(&usable, policy, random);

    if secure {
        let secure_only: Vec<Endpoint> = candidates
            .iter()
            .filter(|endpoint| endpoint.is_secure())
            .cloned()
            .collect();
        if secure_only.is_empty() {
            tracing::debug!(
                candidates = candidates.len(),
                "no secure endpoint available, keeping insecure candidates"
            );
        } else {
            candidates = secure_only;
        }
    }

    // sort_by_key is stable, so the policy order survives within each group.
    if prefer_secure {
        candidates.sort_by_key(|endpoint| !endpoint.is_secure());
    } else {
        candidates.sort_by_key(|endpoint| endpoint.is_secure());
    }
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use wayfarer_core::{SeededRandomProvider, ThreadRandomProvider};

    fn hosts(endpoints: &[Endpoint]) -> Vec<&str> {
        endpoints.iter().map(|e| e.host.as_str()).collect()
    }

    #[test]
    fn test_ordered_keeps_declaration_order() {
        let random = SeededRandomProvider::new(7);
        let endpoints = vec![
            Endpoint::tcp("e1", 1),
            Endpoint::tcp("e2", 2),
            Endpoint::tcp("e3", 3),
        ];
        let ordered = select(&endpoints, EndpointSelection::Ordered, &random);
        assert_eq!(hosts(&ordered), vec!["e1", "e2", "e3"]);
    }

    #[test]
    fn test_random_is_permutation_and_covers_every_first_position() {
        let random = ThreadRandomProvider::new();
        let endpoints = vec![
            Endpoint::tcp("e1", 1),
            Endpoint::tcp("e2", 2),
            Endpoint::tcp("e3", 3),
        ];

        let mut firsts = HashSet::new();
        for _ in 0..1_000 {
            let shuffled = select(&endpoints, EndpointSelection::Random, &random);
            let mut sorted = shuffled.clone();
            sorted.sort();
            assert_eq!(sorted, endpoints);
            firsts.insert(shuffled[0].host.clone());
        }
        assert_eq!(firsts.len(), 3);
    }

    #[test]
    fn test_datagram_mode_keeps_only_datagram_endpoints() {
        let random = SeededRandomProvider::new(1);
        let endpoints = vec![Endpoint::tcp("stream", 1), Endpoint::udp("dgram", 2)];

        let datagram = filter_endpoints(
            &endpoints,
            InvocationMode::Datagram,
            false,
            false,
            EndpointSelection::Ordered,
            &random,
        );
        assert_eq!(hosts(&datagram), vec!["dgram"]);

        let twoway = filter_endpoints(
            &endpoints,
            InvocationMode::Twoway,
            false,
            false,
            EndpointSelection::Ordered,
            &random,
        );
        assert_eq!(hosts(&twoway), vec!["stream"]);
    }

    #[test]
    fn test_secure_reference_drops_insecure_endpoints() {
        let random = SeededRandomProvider::new(1);
        let endpoints = vec![
            Endpoint::tcp("plain", 1),
            Endpoint::ssl("tls", 2),
            Endpoint::tcp("plain2", 3),
        ];
        let filtered = filter_endpoints(
            &endpoints,
            InvocationMode::Twoway,
            true,
            false,
            EndpointSelection::Ordered,
            &random,
        );
        assert_eq!(hosts(&filtered), vec!["tls"]);
    }

    #[test]
    fn test_secure_reference_falls_back_when_nothing_is_secure() {
        let random = SeededRandomProvider::new(1);
        let endpoints = vec![Endpoint::tcp("a", 1), Endpoint::tcp("b", 2)];
        let filtered = filter_endpoints(
            &endpoints,
            InvocationMode::Twoway,
            true,
            false,
            EndpointSelection::Ordered,
            &random,
        );
        assert_eq!(hosts(&filtered), vec!["a", "b"]);
    }

    #[test]
    fn test_prefer_secure_partitions_stably() {
        let random = SeededRandomProvider::new(1);
        let endpoints = vec![
            Endpoint::tcp("t1", 1),
            Endpoint::ssl("s1", 2),
            Endpoint::tcp("t2", 3),
            Endpoint::ssl("s2", 4),
        ];

        let preferred = filter_endpoints(
            &endpoints,
            InvocationMode::Twoway,
            false,
            true,
            EndpointSelection::Ordered,
            &random,
        );
        assert_eq!(hosts(&preferred), vec!["s1", "s2", "t1", "t2"]);

        let insecure_first = filter_endpoints(
            &endpoints,
            InvocationMode::Twoway,
            false,
            false,
            EndpointSelection::Ordered,
            &random,
        );
        assert_eq!(hosts(&insecure_first), vec!["t1", "t2", "s1", "s2"]);
    }

    #[test]
    fn test_selection_parse() {
        assert_eq!("Ordered".parse(), Ok(EndpointSelection::Ordered));
        assert_eq!(" Random ".parse(), Ok(EndpointSelection::Random));
        assert_eq!(
            "Sequential".parse::<EndpointSelection>(),
            Err(ParseEndpointSelectionError("Sequential".to_string()))
        );
    }
}
