//! Text rendering of bindings for `port` and `ps` style output.
//!
//! Every function sorts its input first, so identical state always renders
//! identically regardless of insertion order.

use crate::error::ParseError;
use crate::mapping::{Binding, Protocol};
use crate::range::PortRange;
use crate::spec::Exposure;
use crate::table::sort_for_display;

/// `hostAddress:hostPort`, one per binding (`port <id> <port>`).
pub fn port_lines(bindings: &[Binding]) -> Vec<String> {
    sorted(bindings)
        .iter()
        .map(|b| b.host_socket().to_string())
        .collect()
}

/// `containerPort/protocol -> hostAddress:hostPort`, one per binding (`port <id>`).
pub fn container_lines(bindings: &[Binding]) -> Vec<String> {
    sorted(bindings)
        .iter()
        .map(|b| format!("{}/{} -> {}", b.container_port, b.protocol, b.host_socket()))
        .collect()
}

/// The PORTS column of `ps`.
///
/// Published ports render as `hostAddress:hostPort->containerPort/protocol`;
/// exposed ports without any binding render as `containerPort/protocol`.
pub fn ps_ports(bindings: &[Binding], exposed: &[Exposure]) -> String {
    let mut entries: Vec<((u16, Protocol, u16), String)> = bindings
        .iter()
        .map(|b| {
            (
                (b.container_port, b.protocol, b.host_port),
                format!("{}->{}/{}", b.host_socket(), b.container_port, b.protocol),
            )
        })
        .collect();

    for exposure in exposed {
        for port in exposure.range.ports() {
            let published = bindings
                .iter()
                .any(|b| b.container_port == port && b.protocol == exposure.protocol);
            let key = (port, exposure.protocol, 0);
            if !published && !entries.iter().any(|(k, _)| *k == key) {
                entries.push((key, format!("{}/{}", port, exposure.protocol)));
            }
        }
    }

    entries.sort_by_key(|(key, _)| *key);
    entries
        .into_iter()
        .map(|(_, text)| text)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Parses the `PORT[/PROTO]` argument of a `port` query.
pub fn parse_port_query(arg: &str) -> Result<(u16, Option<Protocol>), ParseError> {
    let (port, protocol) = match arg.trim().split_once('/') {
        Some((port, proto)) => (port, Some(proto.parse::<Protocol>()?)),
        None => (arg.trim(), None),
    };
    let range = PortRange::parse(port)?;
    if !range.is_single() {
        return Err(ParseError::InvalidRange(arg.to_string()));
    }
    Ok((range.start, protocol))
}

fn sorted(bindings: &[Binding]) -> Vec<Binding> {
    let mut bindings = bindings.to_vec();
    sort_for_display(&mut bindings);
    bindings
}
