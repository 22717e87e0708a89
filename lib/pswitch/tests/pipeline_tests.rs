// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! End-to-end pipeline scenarios.
//!
//! Each test single-steps packets through a pipeline bound to the
//! scripted engine in `common`, advancing virtual time by hand and
//! asserting on the results the scheduler would see.

mod common;

use anyhow::Result;
use common::*;
use itertools::Itertools;
use pswitch::api::InstanceType;
use pswitch::api::MirrorSession;
use pswitch::api::PacketType;
use pswitch::api::SwitchConfig;
use pswitch::api::SwitchError;
use pswitch::engine::ParseFault;
use pswitch::engine::meta::fields;
use pswitch::engine::pipeline::DropReason;
use pswitch::engine::pipeline::EgressResult;
use pswitch::engine::pipeline::IngressResult;
use pswitch::engine::pipeline::PipelineState;
use pswitch::engine::pipeline::Transmission;
use pswitch::time::SimTime;

fn ms(n: u64) -> SimTime {
    SimTime::from_millis(n)
}

/// Advance far enough that every queued item is eligible, then drain
/// one transmission.
fn expect_transmit(
    pipe: &mut pswitch::engine::pipeline::Pipeline<StubEngine>,
    now: SimTime,
) -> Transmission {
    match pipe.process_egress(now) {
        Some(EgressResult::Transmit(tx)) => tx,
        other => panic!("expected a transmission, got {:?}", other),
    }
}

#[test]
fn normal_forwarding() {
    let mut net = StubEngine::with_ingress(
        0,
        IngressProgram { priority: Some(0), ..IngressProgram::forward(1) },
    );
    net.queueing = true;
    let mut pipe = pipeline(SwitchConfig::default(), net);

    let pkt = pipe.new_packet(vec![0xaa, 0xbb, 0xcc]);
    pipe.receive_packet(pkt, 0, 0x0800, 0x0202_0202, ms(0)).unwrap();

    assert_eq!(
        pipe.process_ingress(ms(0)),
        Some(IngressResult::Queued { port: 1, priority: 0 })
    );
    // Not eligible before 1/rate has elapsed.
    assert!(pipe.process_egress(ms(0)).is_none());

    let tx = expect_transmit(&mut pipe, ms(1));
    assert_eq!(tx.egress_port, 1);
    assert_eq!(tx.protocol, 0x0800);
    assert_eq!(tx.destination, 0x0202_0202);
    assert_eq!(tx.packet.data(), &[0xaa, 0xbb, 0xcc]);

    // Nothing was ahead of it in its class.
    let seen = &pipe.network().egress_seen[0];
    assert_eq!(seen.get(fields::ENQ_QDEPTH), Some(0));
    assert_eq!(seen.get(fields::DEQ_QDEPTH), Some(0));
    assert!(seen.get(fields::DEQ_TIMEDELTA).unwrap() >= 1_000);

    let stats = pipe.stats_snap();
    assert_eq!(stats.in_received, 1);
    assert_eq!(stats.ingress_passes, 1);
    assert_eq!(stats.egress_passes, 1);
    assert_eq!(stats.transmits, 1);

    // The relay is a one-shot map: nothing may linger.
    assert_eq!(pipe.relay_live(), 0);
}

#[test]
fn unprogrammed_ingress_drops() {
    // No program for port 0: the decision stays the drop spec.
    let mut pipe = pipeline(SwitchConfig::default(), StubEngine::default());

    let pkt = pipe.new_packet(vec![1]);
    pipe.receive_packet(pkt, 0, 0, 0, ms(0)).unwrap();

    assert_eq!(
        pipe.process_ingress(ms(0)),
        Some(IngressResult::Drop { reason: DropReason::Policy })
    );
    assert!(pipe.process_egress(ms(5)).is_none());
    assert_eq!(pipe.stats_snap().ingress_policy_drops, 1);
    assert_eq!(pipe.stats_snap().transmits, 0);
    assert_eq!(pipe.relay_live(), 0);
}

#[test]
fn egress_policy_drop() {
    let mut net = StubEngine::with_ingress(0, IngressProgram::forward(1));
    net.egress_drop_ports = vec![1];
    let mut pipe = pipeline(SwitchConfig::default(), net);

    let pkt = pipe.new_packet(vec![1]);
    pipe.receive_packet(pkt, 0, 0, 0, ms(0)).unwrap();
    pipe.process_ingress(ms(0)).unwrap();

    match pipe.process_egress(ms(1)) {
        Some(EgressResult::Drop { reason: DropReason::Policy }) => {}
        other => panic!("expected egress drop, got {:?}", other),
    }
    assert_eq!(pipe.stats_snap().egress_policy_drops, 1);
    assert_eq!(pipe.relay_live(), 0);
}

#[test]
fn resubmit_restarts_ingress_with_listed_fields_only() {
    let mut net = StubEngine::with_ingress(
        0,
        IngressProgram {
            resubmit_list: Some(1),
            set_fields: vec![("meta.tag".to_string(), 5)],
            ..Default::default()
        },
    );
    net.field_lists.insert(1, vec!["meta.tag".to_string()]);
    net.on_resubmit = Some(IngressProgram::forward(1));
    let mut pipe = pipeline(SwitchConfig::default(), net);

    let pkt = pipe.new_packet(vec![7, 7]);
    pipe.receive_packet(pkt, 0, 0, 0, ms(0)).unwrap();

    assert_eq!(pipe.process_ingress(ms(0)), Some(IngressResult::Resubmit));

    // The re-injected item sits at the head of the high tier with
    // only the listed fields carried over.
    let front = pipe.input_buffer().front().expect("re-injected item");
    assert_eq!(pipe.input_buffer().high_len(), 1);
    assert_eq!(front.ptype, PacketType::Resubmit);
    assert_eq!(front.meta.instance_type, InstanceType::Resubmit);
    assert!(front.carried.has("meta.tag"));
    assert!(!front.carried.has("hdr.b0"));
    assert_eq!(front.carried.len(), 1);

    // Second pass forwards; the packet still makes it out.
    assert_eq!(
        pipe.process_ingress(ms(0)),
        Some(IngressResult::Queued { port: 1, priority: 0 })
    );
    let tx = expect_transmit(&mut pipe, ms(1));
    assert_eq!(tx.packet.data(), &[7, 7]);
    assert_eq!(pipe.stats_snap().resubmits, 1);
    assert_eq!(pipe.relay_live(), 0);
}

#[test]
fn multicast_replicates_to_each_target() {
    let mut net = StubEngine::with_ingress(
        0,
        IngressProgram { mcast_grp: Some(7), ..Default::default() },
    );
    net.groups.insert(
        7,
        vec![
            pswitch::engine::Replica { egress_port: 2, rid: 1 },
            pswitch::engine::Replica { egress_port: 3, rid: 2 },
        ],
    );
    let mut pipe = pipeline(SwitchConfig::default(), net);

    let pkt = pipe.new_packet(vec![4, 4, 4]);
    pipe.receive_packet(pkt, 0, 0x86dd, 9, ms(0)).unwrap();

    assert_eq!(
        pipe.process_ingress(ms(0)),
        Some(IngressResult::Multicast { copies: 2 })
    );

    let tx1 = expect_transmit(&mut pipe, ms(1));
    let tx2 = expect_transmit(&mut pipe, ms(1));
    assert!(pipe.process_egress(ms(5)).is_none());

    let ports =
        [tx1.egress_port, tx2.egress_port].into_iter().sorted().collect_vec();
    assert_eq!(ports, vec![2, 3]);
    assert_eq!(tx1.packet.data(), &[4, 4, 4]);
    assert_eq!(tx2.packet.data(), &[4, 4, 4]);

    // Each copy carried a distinct replication id.
    let rids = pipe
        .network()
        .egress_seen
        .iter()
        .map(|fs| fs.get(fields::EGRESS_RID).unwrap())
        .sorted()
        .collect_vec();
    assert_eq!(rids, vec![1, 2]);

    assert_eq!(pipe.stats_snap().multicast_replicas, 2);
    assert_eq!(pipe.stats_snap().transmits, 2);
    assert_eq!(pipe.relay_live(), 0);
}

#[test]
fn unprogrammed_multicast_group_discards() {
    let net = StubEngine::with_ingress(
        0,
        IngressProgram { mcast_grp: Some(9), ..Default::default() },
    );
    let mut pipe = pipeline(SwitchConfig::default(), net);

    let pkt = pipe.new_packet(vec![1]);
    pipe.receive_packet(pkt, 0, 0, 0, ms(0)).unwrap();
    assert_eq!(
        pipe.process_ingress(ms(0)),
        Some(IngressResult::Multicast { copies: 0 })
    );
    assert_eq!(pipe.relay_live(), 0);
}

#[test]
fn ingress_mirror_clones_to_session_port() -> Result<()> {
    let mut net = StubEngine::with_ingress(
        0,
        IngressProgram {
            clone_session: Some((5, 2)),
            ..IngressProgram::forward(1)
        },
    );
    net.field_lists.insert(2, vec!["hdr.b0".to_string()]);
    let mut pipe = pipeline(SwitchConfig::default(), net);

    pipe.mirror_add(
        5,
        MirrorSession {
            egress_port_valid: true,
            egress_port: 3,
            ..Default::default()
        },
    )?;

    let pkt = pipe.new_packet(vec![0x42, 9]);
    pipe.receive_packet(pkt, 0, 0, 0, ms(0))?;

    // The original continues to its own egress class.
    assert_eq!(
        pipe.process_ingress(ms(0)),
        Some(IngressResult::Queued { port: 1, priority: 0 })
    );

    let tx1 = expect_transmit(&mut pipe, ms(1));
    let tx2 = expect_transmit(&mut pipe, ms(1));
    let ports =
        [tx1.egress_port, tx2.egress_port].into_iter().sorted().collect_vec();
    assert_eq!(ports, vec![1, 3]);

    // Mirror copy is marked as an ingress clone; the original is not.
    let itypes = pipe
        .network()
        .egress_seen
        .iter()
        .map(|fs| fs.get(fields::INSTANCE_TYPE).unwrap())
        .sorted()
        .collect_vec();
    assert_eq!(
        itypes,
        vec![
            InstanceType::Normal.as_field(),
            InstanceType::IngressClone.as_field()
        ]
    );

    assert_eq!(pipe.stats_snap().ingress_clones, 1);
    assert_eq!(pipe.relay_live(), 0);
    Ok(())
}

#[test]
fn unconfigured_mirror_session_is_ignored() {
    let net = StubEngine::with_ingress(
        0,
        IngressProgram {
            clone_session: Some((5, 0)),
            ..IngressProgram::forward(1)
        },
    );
    let mut pipe = pipeline(SwitchConfig::default(), net);

    let pkt = pipe.new_packet(vec![1]);
    pipe.receive_packet(pkt, 0, 0, 0, ms(0)).unwrap();
    assert_eq!(
        pipe.process_ingress(ms(0)),
        Some(IngressResult::Queued { port: 1, priority: 0 })
    );
    assert_eq!(pipe.stats_snap().ingress_clones, 0);

    expect_transmit(&mut pipe, ms(1));
    assert_eq!(pipe.stats_snap().transmits, 1);
}

#[test]
fn egress_mirror_clones_once() -> Result<()> {
    let mut net = StubEngine::with_ingress(0, IngressProgram::forward(1));
    net.egress_clone = Some((9, 0));
    let mut pipe = pipeline(SwitchConfig::default(), net);

    pipe.mirror_add(
        9,
        MirrorSession {
            egress_port_valid: true,
            egress_port: 2,
            ..Default::default()
        },
    )?;

    let pkt = pipe.new_packet(vec![6]);
    pipe.receive_packet(pkt, 0, 0, 0, ms(0))?;
    pipe.process_ingress(ms(0));

    let tx1 = expect_transmit(&mut pipe, ms(1));
    assert_eq!(tx1.egress_port, 1);

    // The clone was admitted during the first egress pass and paces
    // out one delay later.
    let tx2 = expect_transmit(&mut pipe, ms(2));
    assert_eq!(tx2.egress_port, 2);
    assert!(pipe.process_egress(ms(10)).is_none());

    assert_eq!(pipe.stats_snap().egress_clones, 1);
    assert_eq!(pipe.stats_snap().transmits, 2);
    assert_eq!(pipe.relay_live(), 0);
    Ok(())
}

#[test]
fn recirculate_reenters_ingress() {
    let mut net = StubEngine::with_ingress(0, IngressProgram::forward(1));
    net.egress_recirc_list = Some(3);
    net.field_lists.insert(3, vec![]);
    net.on_recirculate = Some(IngressProgram {
        set_fields: vec![("recirculated".to_string(), 1)],
        ..IngressProgram::forward(2)
    });
    let mut pipe = pipeline(SwitchConfig::default(), net);

    let pkt = pipe.new_packet(vec![3, 3]);
    pipe.receive_packet(pkt, 0, 0, 0, ms(0)).unwrap();
    pipe.process_ingress(ms(0));

    match pipe.process_egress(ms(1)) {
        Some(EgressResult::Recirculate) => {}
        other => panic!("expected recirculation, got {:?}", other),
    }

    let front = pipe.input_buffer().front().expect("re-injected item");
    assert_eq!(front.ptype, PacketType::Recirculate);
    assert_eq!(front.meta.instance_type, InstanceType::Recirculate);

    assert_eq!(
        pipe.process_ingress(ms(1)),
        Some(IngressResult::Queued { port: 2, priority: 0 })
    );
    let tx = expect_transmit(&mut pipe, ms(2));
    assert_eq!(tx.egress_port, 2);
    assert_eq!(tx.packet.data(), &[3, 3]);

    assert_eq!(pipe.stats_snap().recirculates, 1);
    assert_eq!(pipe.stats_snap().transmits, 1);
    assert_eq!(pipe.relay_live(), 0);
}

#[test]
fn egress_class_admission_drop() {
    let net = StubEngine::with_ingress(0, IngressProgram::forward(1));
    let mut pipe = pipeline(SwitchConfig::default(), net);
    pipe.set_queue_capacity(1, Some(0), 1).unwrap();

    for _ in 0..2 {
        let pkt = pipe.new_packet(vec![0]);
        pipe.receive_packet(pkt, 0, 0, 0, ms(0)).unwrap();
    }

    assert_eq!(
        pipe.process_ingress(ms(0)),
        Some(IngressResult::Queued { port: 1, priority: 0 })
    );
    assert_eq!(
        pipe.process_ingress(ms(0)),
        Some(IngressResult::Drop { reason: DropReason::QueueFull })
    );
    assert_eq!(pipe.stats_snap().queue_admission_drops, 1);
    assert_eq!(pipe.egress_class_depth(1, 0), 1);
    assert_eq!(pipe.relay_live(), 0);
}

#[test]
fn out_of_range_priority_drops() {
    let net = StubEngine::with_ingress(
        0,
        IngressProgram { priority: Some(8), ..IngressProgram::forward(1) },
    );
    let mut pipe = pipeline(SwitchConfig::default(), net);

    let pkt = pipe.new_packet(vec![0]);
    pipe.receive_packet(pkt, 0, 0, 0, ms(0)).unwrap();
    assert_eq!(
        pipe.process_ingress(ms(0)),
        Some(IngressResult::Drop { reason: DropReason::PriorityRange })
    );
    assert_eq!(pipe.stats_snap().priority_range_drops, 1);
    assert_eq!(pipe.relay_live(), 0);
}

#[test]
fn bounded_input_buffer_drops_arrivals() {
    let cfg =
        SwitchConfig { input_capacity: Some(1), ..Default::default() };
    let net = StubEngine::with_ingress(0, IngressProgram::forward(1));
    let mut pipe = pipeline(cfg, net);

    for _ in 0..3 {
        let pkt = pipe.new_packet(vec![0]);
        pipe.receive_packet(pkt, 0, 0, 0, ms(0)).unwrap();
    }

    assert_eq!(pipe.stats_snap().in_admission_drops, 2);
    assert!(pipe.process_ingress(ms(0)).is_some());
    assert!(pipe.process_ingress(ms(0)).is_none());
}

#[test]
fn learning_notification_forwarded() {
    let net = StubEngine::with_ingress(
        0,
        IngressProgram { learn_list: Some(4), ..IngressProgram::forward(1) },
    );
    let mut pipe = pipeline(SwitchConfig::default(), net);

    let pkt = pipe.new_packet(vec![0]);
    pipe.receive_packet(pkt, 0, 0, 0, ms(0)).unwrap();
    pipe.process_ingress(ms(0));

    let learned = &pipe.network().learned;
    assert_eq!(learned.len(), 1);
    assert_eq!(learned[0].0, 4);
    assert_eq!(pipe.stats_snap().learn_notifies, 1);
}

#[test]
fn parse_fault_is_recorded_not_fatal() {
    let mut net = StubEngine::with_ingress(0, IngressProgram::forward(1));
    net.parse_fault = Some(ParseFault::Checksum);
    let mut pipe = pipeline(SwitchConfig::default(), net);

    let pkt = pipe.new_packet(vec![0]);
    pipe.receive_packet(pkt, 0, 0, 0, ms(0)).unwrap();
    assert_eq!(
        pipe.process_ingress(ms(0)),
        Some(IngressResult::Queued { port: 1, priority: 0 })
    );

    expect_transmit(&mut pipe, ms(1));
    let seen = &pipe.network().egress_seen[0];
    assert_eq!(seen.get(fields::CHECKSUM_ERROR), Some(1));
    assert_eq!(seen.get(fields::PARSER_ERROR), Some(1));
}

#[test]
fn transport_framing_is_stripped() {
    let mut net = StubEngine::with_ingress(0, IngressProgram::forward(1));
    net.framing = 4;
    let mut pipe = pipeline(SwitchConfig::default(), net);

    let pkt = pipe.new_packet(vec![9, 8, 7]);
    pipe.receive_packet(pkt, 0, 0, 0, ms(0)).unwrap();
    pipe.process_ingress(ms(0));

    let tx = expect_transmit(&mut pipe, ms(1));
    assert_eq!(tx.packet.data(), &[9, 8, 7]);
}

#[test]
fn stop_sentinel_halts_the_pipeline() {
    let mut pipe =
        pipeline(SwitchConfig::default(), StubEngine::default());

    pipe.signal_stop().unwrap();
    assert_eq!(pipe.process_ingress(ms(0)), Some(IngressResult::Stop));
    assert_eq!(pipe.state(), PipelineState::Stopped);

    let pkt = pipe.new_packet(vec![0]);
    let err = pipe.receive_packet(pkt, 0, 0, 0, ms(0)).unwrap_err();
    assert!(matches!(err, SwitchError::BadState(_)));
    assert!(pipe.process_ingress(ms(0)).is_none());
}

#[test]
fn bad_config_is_fatal() {
    let cfg = SwitchConfig { ports: 0, ..Default::default() };
    let res = pswitch::engine::pipeline::Pipeline::new(
        cfg,
        StubEngine::default(),
        test_logger(),
    );
    assert!(matches!(res, Err(SwitchError::BadConfig(_))));
}

#[test]
fn arrival_on_unknown_port_is_rejected() {
    let mut pipe =
        pipeline(SwitchConfig::default(), StubEngine::default());
    let pkt = pipe.new_packet(vec![0]);
    let err = pipe.receive_packet(pkt, 9, 0, 0, ms(0)).unwrap_err();
    assert_eq!(err, SwitchError::BadPort { port: 9, ports: 4 });
}

#[test]
fn peek_matches_next_egress_dequeue() {
    // Spread items across ports so the random policy has a real
    // choice to make; the peeked payload must be the one transmitted.
    let mut net = StubEngine::with_ingress(0, IngressProgram::forward(1));
    net.ingress.insert(1, IngressProgram::forward(2));
    net.ingress.insert(2, IngressProgram::forward(3));
    let mut pipe = pipeline(SwitchConfig::default(), net);

    for in_port in 0..3u16 {
        let pkt = pipe.new_packet(vec![in_port as u8; 4]);
        pipe.receive_packet(pkt, in_port, 0, 0, ms(0)).unwrap();
        pipe.process_ingress(ms(0));
    }

    for _ in 0..3 {
        let peeked =
            pipe.peek_egress(ms(1)).expect("eligible item").packet.data()
                .to_vec();
        let tx = expect_transmit(&mut pipe, ms(1));
        assert_eq!(tx.packet.data(), &peeked[..]);
    }
    assert!(pipe.process_egress(ms(10)).is_none());
}
