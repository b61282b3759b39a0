//! End-to-end publish/query/unpublish scenarios against the public API.

use std::net::{IpAddr, Ipv4Addr};
use std::sync::{Arc, Barrier};
use std::thread;

use portpub::render::{container_lines, port_lines};
use portpub::{ParseError, PortError, PortMapper, PortSpec, Protocol};
use portpub_config::EngineConfig;

const ANY: IpAddr = IpAddr::V4(Ipv4Addr::UNSPECIFIED);

fn mapper() -> PortMapper {
    portpub_core::tracing_init::init_for_testing();
    PortMapper::new(&EngineConfig::default().with_ephemeral(45000, 45099))
        .expect("default config should be valid")
}

fn full_query(mapper: &PortMapper, id: &str) -> Vec<String> {
    container_lines(&mapper.query_by_container(id, None).expect("query should succeed"))
}

fn port_query(mapper: &PortMapper, id: &str, port: u16) -> Vec<String> {
    port_lines(&mapper.query_one(id, port, Protocol::Tcp).expect("query should succeed"))
}

#[test]
fn test_single_port() {
    let mapper = mapper();
    mapper.publish_raw("first", &["9876:80"]).unwrap();

    assert_eq!(port_query(&mapper, "first", 80), vec!["0.0.0.0:9876"]);
    assert_eq!(full_query(&mapper, "first"), vec!["80/tcp -> 0.0.0.0:9876"]);

    mapper.unpublish("first").unwrap();
    assert!(full_query(&mapper, "first").is_empty());
}

#[test]
fn test_three_ports_sorted_by_container_port() {
    let mapper = mapper();
    let specs = PortSpec::parse_list("9878:82,9876:80,9877:81").unwrap();
    mapper.publish("three", &specs).unwrap();

    assert_eq!(port_query(&mapper, "three", 80), vec!["0.0.0.0:9876"]);
    assert_eq!(
        full_query(&mapper, "three"),
        vec![
            "80/tcp -> 0.0.0.0:9876",
            "81/tcp -> 0.0.0.0:9877",
            "82/tcp -> 0.0.0.0:9878",
        ]
    );
}

#[test]
fn test_two_host_ports_into_one_container_port() {
    let mapper = mapper();
    mapper
        .publish_raw("fan-in", &["9999:80", "9876:80", "9877:81", "9878:82"])
        .unwrap();

    assert_eq!(
        port_query(&mapper, "fan-in", 80),
        vec!["0.0.0.0:9876", "0.0.0.0:9999"]
    );
    assert_eq!(
        full_query(&mapper, "fan-in"),
        vec![
            "80/tcp -> 0.0.0.0:9876",
            "80/tcp -> 0.0.0.0:9999",
            "81/tcp -> 0.0.0.0:9877",
            "82/tcp -> 0.0.0.0:9878",
        ]
    );
}

#[test]
fn test_invalid_ranges_are_rejected_without_side_effects() {
    let mapper = mapper();
    for invalid in ["9090-9089:80", "9090-:80", "-9090:80"] {
        let err = mapper.publish_raw("bad", &[invalid]).unwrap_err();
        assert!(
            matches!(err, PortError::Parse(ParseError::InvalidRange(_))),
            "{} should be InvalidRange, got {:?}",
            invalid,
            err
        );
    }
    assert!(mapper.containers().unwrap().is_empty());
    assert!(mapper.pool_snapshot().unwrap().is_empty());
}

#[test]
fn test_host_range_to_container_range() {
    let mapper = mapper();
    mapper.publish_raw("ranged", &["9800-9803:80-83"]).unwrap();

    assert_eq!(
        full_query(&mapper, "ranged"),
        vec![
            "80/tcp -> 0.0.0.0:9800",
            "81/tcp -> 0.0.0.0:9801",
            "82/tcp -> 0.0.0.0:9802",
            "83/tcp -> 0.0.0.0:9803",
        ]
    );
}

#[test]
fn test_mixed_protocols_in_same_host_range() {
    let mapper = mapper();
    mapper
        .publish_raw("mixed", &["8000-8080:80", "8000-8080:80/udp"])
        .unwrap();

    assert_eq!(
        full_query(&mapper, "mixed"),
        vec!["80/tcp -> 0.0.0.0:8000", "80/udp -> 0.0.0.0:8000"]
    );
}

#[test]
fn test_protocol_independence() {
    let mapper = mapper();
    mapper.publish_raw("tcp-side", &["8000:80"]).unwrap();
    mapper.publish_raw("udp-side", &["8000:80/udp"]).unwrap();

    assert!(mapper.is_occupied(ANY, Protocol::Tcp, 8000).unwrap());
    assert!(mapper.is_occupied(ANY, Protocol::Udp, 8000).unwrap());

    mapper.unpublish("udp-side").unwrap();
    assert!(mapper.is_occupied(ANY, Protocol::Tcp, 8000).unwrap());
    assert!(!mapper.is_occupied(ANY, Protocol::Udp, 8000).unwrap());
    assert_eq!(full_query(&mapper, "tcp-side"), vec!["80/tcp -> 0.0.0.0:8000"]);
}

#[test]
fn test_host_range_reused_after_release() {
    let mapper = mapper();

    let mut round = || {
        let ids = ["range-0", "range-1", "range-2"];
        let picked: Vec<u16> = ids
            .iter()
            .map(|id| {
                let bindings = mapper.publish_raw(id, &["9090-9092:80"]).unwrap();
                assert_eq!(bindings.len(), 1);
                assert_eq!(bindings[0].container_port, 80);
                bindings[0].host_port
            })
            .collect();

        // The range is now full.
        assert!(matches!(
            mapper.publish_raw("range-3", &["9090-9092:80"]),
            Err(PortError::ExhaustedRange { .. })
        ));

        for id in ids {
            assert_eq!(mapper.unpublish(id).unwrap().len(), 1);
        }
        assert!(mapper.pool_snapshot().unwrap().is_empty());
        picked
    };

    let first = round();
    let second = round();
    assert_eq!(first, vec![9090, 9091, 9092]);
    assert_eq!(first, second);
}

#[test]
fn test_range_reuse_is_identical() {
    let mapper = mapper();
    for spec in ["9800-9803:80-83", "80-83", "127.0.0.1:7000:70/udp"] {
        let first = mapper.publish_raw("reuse", &[spec]).unwrap();
        mapper.unpublish("reuse").unwrap();
        let second = mapper.publish_raw("reuse", &[spec]).unwrap();
        mapper.unpublish("reuse").unwrap();
        assert_eq!(first, second, "reuse of {} differed", spec);
    }
    mapper.verify_consistency().unwrap();
}

#[test]
fn test_round_trip_positional_pairing() {
    let mapper = mapper();
    for (i, (host, container)) in [((20000, 20009), (1000, 1009)), ((30000, 30000), (443, 443))]
        .into_iter()
        .enumerate()
    {
        let id = format!("rt-{}", i);
        let raw = format!("{}-{}:{}-{}", host.0, host.1, container.0, container.1);
        mapper.publish_raw(&id, &[raw]).unwrap();

        let pairs: Vec<(u16, u16)> = mapper
            .query_by_container(&id, None)
            .unwrap()
            .iter()
            .map(|b| (b.container_port, b.host_port))
            .collect();
        let expected: Vec<(u16, u16)> = (container.0..=container.1).zip(host.0..=host.1).collect();
        assert_eq!(pairs, expected);
    }
}

#[test]
fn test_atomicity_for_every_failing_position() {
    let n = 5;
    for k in 0..n {
        let mapper = mapper();
        mapper.publish_raw("holder", &["7777:7777"]).unwrap();

        let raw: Vec<String> = (0..n)
            .map(|i| {
                if i == k {
                    "7777:99".to_string()
                } else {
                    format!("{}:{}", 7000 + i, 80 + i)
                }
            })
            .collect();

        let err = mapper.publish_raw("victim", &raw).unwrap_err();
        assert!(matches!(err, PortError::PortUnavailable { port: 7777, .. }));
        assert!(mapper.query_by_container("victim", None).unwrap().is_empty());
        assert_eq!(mapper.pool_snapshot().unwrap().occupied(ANY, Protocol::Tcp), vec![7777]);
        mapper.verify_consistency().unwrap();

        // A parse failure at position k leaves nothing behind either.
        let mut raw = raw;
        raw[k] = "9090-:80".to_string();
        assert!(matches!(
            mapper.publish_raw("victim", &raw),
            Err(PortError::Parse(_))
        ));
        assert!(mapper.query_by_container("victim", None).unwrap().is_empty());
    }
}

#[test]
fn test_concurrent_publish_of_same_host_port() {
    let mapper = Arc::new(mapper());
    let contenders = 8;
    let barrier = Arc::new(Barrier::new(contenders));

    let handles: Vec<_> = (0..contenders)
        .map(|i| {
            let mapper = Arc::clone(&mapper);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                let own_port = format!("{}:80", 10000 + i);
                mapper.publish_raw(&format!("racer-{}", i), &["8443:443", own_port.as_str()])
            })
        })
        .collect();

    let results: Vec<_> = handles
        .into_iter()
        .map(|h| h.join().expect("thread should complete successfully"))
        .collect();

    let winners = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1);
    for result in &results {
        if let Err(e) = result {
            assert!(matches!(e, PortError::PortUnavailable { port: 8443, .. }));
        }
    }

    let pool = mapper.pool_snapshot().unwrap();
    assert_eq!(pool.occupied(ANY, Protocol::Tcp).iter().filter(|p| **p == 8443).count(), 1);
    // Losers rolled back their second port too.
    assert_eq!(pool.len(), 2);
    mapper.verify_consistency().unwrap();
}

#[test]
fn test_concurrent_ephemeral_publishes_never_share_ports() {
    let mapper = Arc::new(mapper());
    let handles: Vec<_> = (0..10)
        .map(|i| {
            let mapper = Arc::clone(&mapper);
            thread::spawn(move || {
                let id = format!("eph-{}", i);
                for _ in 0..5 {
                    mapper.publish_raw(&id, &["80-81"]).unwrap();
                    mapper.unpublish(&id).unwrap();
                }
                mapper.publish_raw(&id, &["80-81"]).unwrap()
            })
        })
        .collect();

    let mut ports: Vec<u16> = handles
        .into_iter()
        .flat_map(|h| h.join().expect("thread should complete successfully"))
        .map(|b| b.host_port)
        .collect();
    ports.sort_unstable();
    ports.dedup();
    assert_eq!(ports.len(), 20);
    assert!(ports.iter().all(|p| (45000..=45099).contains(p)));
    mapper.verify_consistency().unwrap();
}

#[test]
fn test_addresses_are_independent_pool_keys() {
    let mapper = mapper();
    mapper.publish_raw("wild", &["8080:80"]).unwrap();
    mapper.publish_raw("local", &["127.0.0.1:8080:80"]).unwrap();

    assert_eq!(port_query(&mapper, "local", 80), vec!["127.0.0.1:8080"]);
    assert!(matches!(
        mapper.publish_raw("again", &["127.0.0.1:8080:81"]),
        Err(PortError::PortUnavailable { .. })
    ));
}

#[test]
fn test_publish_all_exposed_ports() {
    let mapper = mapper();
    let exposed = [
        portpub::Exposure::parse("80").unwrap(),
        portpub::Exposure::parse("443").unwrap(),
    ];
    mapper
        .publish("all", &PortSpec::publish_all(&exposed, &[]))
        .unwrap();

    let ps = portpub::render::ps_ports(&mapper.query_by_container("all", None).unwrap(), &exposed);
    assert_eq!(ps, "0.0.0.0:45000->80/tcp, 0.0.0.0:45001->443/tcp");
}
