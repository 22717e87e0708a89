// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! The pipeline controller.
//!
//! Orchestrates one ingress pass and one egress pass per packet
//! around calls into the match-action engine, implementing the
//! drop / clone / resubmit / recirculate / multicast state machine,
//! and owns every piece of engine state: the translation boundary,
//! both queues, the mirror table, the rng, the stats, and the logger.
//! Nothing is reached through ambient globals.
//!
//! All handlers are run-to-completion and single-threaded: the
//! embedding simulator's event scheduler calls [`Pipeline::receive_packet`]
//! on arrival and drives [`Pipeline::process_ingress`] /
//! [`Pipeline::process_egress`] from scheduled events, passing the
//! current simulated time into each call. Within one pass, all side
//! effects for a single packet (clone dispatch, resubmission,
//! enqueue) complete before the handler returns.

use crate::api::Direction;
use crate::api::InstanceType;
use crate::api::Metadata;
use crate::api::PORT_DROP;
use crate::api::PacketType;
use crate::api::ParserError;
use crate::api::PipelineStats;
use crate::api::MirrorSession;
use crate::api::SwitchConfig;
use crate::api::SwitchError;
use crate::engine::ParseFault;
use crate::engine::QueueItem;
use crate::engine::SwitchImpl;
use crate::engine::bridge::Bridge;
use crate::engine::bridge::CloneKind;
use crate::engine::bridge::PacketRecord;
use crate::engine::egress_queue::ClassSnap;
use crate::engine::egress_queue::EgressQueueBuffer;
use crate::engine::input_queue::InputBuffer;
use crate::engine::meta;
use crate::engine::meta::fields;
use crate::engine::mirror::MirrorTable;
use crate::engine::packet::EnginePacket;
use crate::engine::packet::FieldSet;
use crate::engine::packet::REG_PACKET_LENGTH;
use crate::engine::packet::SimPacket;
use crate::time::SimTime;
use core::fmt;
use core::fmt::Display;
use slog::Logger;
use slog::debug;
use slog::error;
use slog::info;
use slog::o;
use slog::warn;

/// Lifecycle of a pipeline.
///
/// ```text
/// Pipeline::new() --> Ready -- start() --> Running
/// Running -- signal_stop() ... sentinel dequeued --> Stopped
/// ```
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PipelineState {
    /// Created and configured, not yet accepting traffic.
    Ready,

    /// Accepting and processing traffic.
    Running,

    /// The stop sentinel has drained; packet operations are inert.
    Stopped,
}

impl Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            PipelineState::Ready => "ready",
            PipelineState::Running => "running",
            PipelineState::Stopped => "stopped",
        };
        write!(f, "{}", s)
    }
}

/// Why a packet's pass ended without the packet surviving.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DropReason {
    /// The match-action decision was the drop spec.
    Policy,

    /// The egress queue class was at capacity.
    QueueFull,

    /// The packet carried a priority at or above the configured
    /// count.
    PriorityRange,

    /// The egress spec named a nonexistent port.
    PortRange,
}

impl Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            DropReason::Policy => "policy",
            DropReason::QueueFull => "queue-full",
            DropReason::PriorityRange => "priority-range",
            DropReason::PortRange => "port-range",
        };
        write!(f, "{}", s)
    }
}

/// The outcome of one ingress pass.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum IngressResult {
    /// The packet died here; any clones it spawned live on.
    Drop { reason: DropReason },

    /// Re-injected into the Input Buffer's high tier; the original is
    /// gone.
    Resubmit,

    /// Fanned out to `copies` egress classes; the original is gone.
    Multicast { copies: u16 },

    /// Admitted to the egress class `(port, priority)`.
    Queued { port: u16, priority: u8 },

    /// The stop sentinel drained; the pipeline is now stopped.
    Stop,
}

/// The outcome of one egress pass.
#[derive(Debug)]
pub enum EgressResult {
    /// The packet died here; any clones it spawned live on.
    Drop { reason: DropReason },

    /// Re-injected into the Input Buffer's high tier instead of
    /// transmitting.
    Recirculate,

    /// Hand this to the device layer's send operation.
    Transmit(Transmission),
}

/// A packet leaving the pipeline, with the delivery context recovered
/// at back-translation.
#[derive(Debug)]
pub struct Transmission {
    pub packet: SimPacket,
    pub egress_port: u16,
    pub destination: u64,
    pub protocol: u16,
}

/// The packet pipeline of one simulated switch.
///
/// The pipeline is generic over the match-action engine
/// implementation `N`: traffic semantics live behind [`SwitchImpl`],
/// orchestration and queueing live here.
pub struct Pipeline<N: SwitchImpl> {
    cfg: SwitchConfig,
    state: PipelineState,
    net: N,
    bridge: Bridge,
    input: InputBuffer,
    egress: EgressQueueBuffer,
    mirrors: MirrorTable,
    stats: PipelineStats,
    log: Logger,
}

impl<N: SwitchImpl> Pipeline<N> {
    /// Create a pipeline. A bad configuration is fatal: nothing is
    /// constructed and no packet will ever be accepted.
    pub fn new(
        cfg: SwitchConfig,
        net: N,
        log: Logger,
    ) -> Result<Self, SwitchError> {
        cfg.validate()?;

        let egress = EgressQueueBuffer::new(
            cfg.ports,
            cfg.priorities,
            cfg.queue,
            cfg.policy,
            cfg.seed
        );

        Ok(Self {
            state: PipelineState::Ready,
            net,
            bridge: Bridge::new(cfg.headroom),
            input: InputBuffer::new(cfg.input_capacity),
            egress,
            mirrors: MirrorTable::new(cfg.mirror_max),
            stats: PipelineStats::default(),
            log: log.new(o!("unit" => "pipeline")),
            cfg,
        })
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// The match-action engine implementation bound to this pipeline.
    pub fn network(&self) -> &N {
        &self.net
    }

    /// Mutable access to the engine implementation, for programming
    /// its tables.
    pub fn network_mut(&mut self) -> &mut N {
        &mut self.net
    }

    pub fn start(&mut self) -> Result<(), SwitchError> {
        if self.state != PipelineState::Ready {
            return Err(SwitchError::BadState(self.state.to_string()));
        }

        self.state = PipelineState::Running;
        info!(self.log, "pipeline running";
            "ports" => self.cfg.ports,
            "priorities" => self.cfg.priorities
        );
        Ok(())
    }

    /// Enqueue the stop sentinel. The pipeline keeps processing until
    /// the sentinel reaches the head of the Input Buffer.
    pub fn signal_stop(&mut self) -> Result<(), SwitchError> {
        self.check_running()?;
        // The sentinel rides the high tier and is never bounded out.
        let _ = self.input.enqueue(QueueItem::sentinel());
        Ok(())
    }

    /// Mint a SimPacket in the uid space the pipeline's own
    /// back-translations draw from. The device layer should create
    /// arrival packets through this so uids stay unique everywhere.
    pub fn new_packet(&mut self, data: Vec<u8>) -> SimPacket {
        let uid = self.bridge.next_sim_uid();
        SimPacket::new(uid, data)
    }

    /// Arrival entry point: file the packet into the Input Buffer's
    /// low tier. An over-capacity buffer drops the arrival and
    /// reports it; that is not an error to the caller.
    pub fn receive_packet(
        &mut self,
        packet: SimPacket,
        in_port: u16,
        protocol: u16,
        destination: u64,
        now: SimTime,
    ) -> Result<(), SwitchError> {
        self.check_running()?;

        if in_port >= self.cfg.ports {
            return Err(SwitchError::BadPort {
                port: in_port,
                ports: self.cfg.ports,
            });
        }

        self.stats.in_received += 1;

        let meta = Metadata {
            ingress_port: in_port,
            protocol,
            destination,
            packet_type: PacketType::Normal,
            packet_length: packet.len() as u64,
            sim_uid: packet.uid(),
            ..Default::default()
        };

        let item = QueueItem {
            packet,
            ptype: PacketType::Normal,
            meta,
            carried: FieldSet::default(),
            enqueued_at: now,
        };
        self.enqueue_input(item);
        Ok(())
    }

    /// Run one ingress pass: dequeue one item from the Input Buffer
    /// and drive it through parse, ingress match-action, and the
    /// decision chain. Returns `None` when the buffer is empty (or
    /// the pipeline is not running); callers re-poll or are
    /// event-driven.
    pub fn process_ingress(&mut self, now: SimTime) -> Option<IngressResult> {
        if self.state != PipelineState::Running {
            return None;
        }

        let item = self.input.dequeue()?;
        if item.ptype == PacketType::Sentinel {
            self.state = PipelineState::Stopped;
            info!(self.log, "pipeline stopped");
            return Some(IngressResult::Stop);
        }

        self.stats.ingress_passes += 1;
        let QueueItem { packet, ptype, mut meta, carried, .. } = item;

        let mut pkt = self.bridge.to_engine(
            packet,
            meta.ingress_port,
            meta.protocol,
            meta.destination
        );
        meta.engine_id = pkt.id();

        // Snapshot the pre-parse buffer; the resubmit and
        // ingress-mirror paths restart from it.
        pkt.save();

        if let Err(fault) = self.net.parse(&mut pkt) {
            meta.parser_error = match fault {
                ParseFault::Checksum => ParserError::Checksum,
                ParseFault::Other => ParserError::Other,
            };
            if meta.parser_error == ParserError::Checksum {
                meta.checksum_error = true;
                pkt.fields_mut().set(fields::CHECKSUM_ERROR, 1);
            }
            pkt.fields_mut()
                .set(fields::PARSER_ERROR, meta.parser_error.as_field());
            debug!(self.log, "parse fault";
                "engine_id" => pkt.id(),
                "fault" => ?fault
            );
        }

        meta.ingress_timestamp = now.as_micros();
        meta.instance_type = match ptype {
            PacketType::Normal => InstanceType::Normal,
            PacketType::Resubmit => InstanceType::Resubmit,
            PacketType::Recirculate => InstanceType::Recirculate,
            // Handled above.
            PacketType::Sentinel => unreachable!(),
        };
        meta.packet_length = pkt.len() as u64;
        pkt.set_reg(REG_PACKET_LENGTH, meta.packet_length);

        let fs = pkt.fields_mut();
        fs.set(fields::INGRESS_PORT, meta.ingress_port as u64);
        fs.set(fields::INGRESS_TIMESTAMP, meta.ingress_timestamp);
        fs.set(fields::INSTANCE_TYPE, meta.instance_type.as_field());
        fs.set(fields::PACKET_LENGTH, meta.packet_length);
        fs.merge(&carried);

        self.net.ingress_apply(&mut pkt);
        meta::load(&mut meta, pkt.fields());

        // The decision chain. Mirror and learning are side effects;
        // resubmit, multicast, and unicast are terminal for the pass.
        if let Some(session) = pkt.fields_mut().take(fields::CLONE_SESSION) {
            let list =
                pkt.fields_mut().take(fields::CLONE_FIELD_LIST).unwrap_or(0);
            self.mirror_clone(
                &pkt,
                &meta,
                session as u16,
                list as u32,
                InstanceType::IngressClone,
                now
            );
        }

        if let Some(list) = pkt.fields_mut().take(fields::LEARN_LIST) {
            self.stats.learn_notifies += 1;
            self.net.learn(list as u32, &pkt);
        }

        if let Some(list) = pkt.fields_mut().take(fields::RESUBMIT_LIST) {
            return Some(self.resubmit(pkt, &meta, list as u32, now));
        }

        if meta.mcast_grp != 0 {
            return Some(self.replicate_out(pkt, meta, now));
        }

        Some(self.unicast(pkt, meta, now))
    }

    /// Run one egress pass: dequeue one item from the Egress Queue
    /// Buffer (per the port-selection policy) and drive it through
    /// egress match-action, deparse, and out. Returns `None` when no
    /// class has an eligible head.
    pub fn process_egress(&mut self, now: SimTime) -> Option<EgressResult> {
        if self.state != PipelineState::Running {
            return None;
        }

        let item = self.egress.dequeue(now)?;
        self.stats.egress_passes += 1;
        let QueueItem { packet, mut meta, carried, enqueued_at, .. } = item;

        let mut pkt = self.bridge.to_engine(
            packet,
            meta.ingress_port,
            meta.protocol,
            meta.destination
        );
        meta.engine_id = pkt.id();
        meta.egress_timestamp = now.as_micros();

        // Reconstitute the flattened state into the field workspace.
        meta::store(&meta, pkt.fields_mut());
        pkt.fields_mut().merge(&carried);
        pkt.set_reg(REG_PACKET_LENGTH, meta.packet_length);

        if meta.queueing {
            if meta.priority >= self.cfg.priorities {
                return Some(
                    self.drop_pkt(&pkt, DropReason::PriorityRange, Direction::Egress)
                );
            }

            meta.deq_timedelta = now.delta_as_micros(enqueued_at);
            meta.deq_qdepth =
                self.egress.class_depth(meta.egress_port, meta.priority)
                    as u32;
            let fs = pkt.fields_mut();
            fs.set(fields::DEQ_TIMEDELTA, meta.deq_timedelta);
            fs.set(fields::DEQ_QDEPTH, meta.deq_qdepth as u64);
        }

        self.net.egress_apply(&mut pkt);
        meta::load(&mut meta, pkt.fields());

        if let Some(session) = pkt.fields_mut().take(fields::CLONE_SESSION) {
            let list =
                pkt.fields_mut().take(fields::CLONE_FIELD_LIST).unwrap_or(0);
            self.mirror_clone(
                &pkt,
                &meta,
                session as u16,
                list as u32,
                InstanceType::EgressClone,
                now
            );
        }

        if meta.egress_spec == PORT_DROP {
            self.stats.egress_policy_drops += 1;
            return Some(self.drop_pkt(&pkt, DropReason::Policy, Direction::Egress));
        }

        self.net.deparse(&mut pkt);

        if let Some(list) = pkt.fields_mut().take(fields::RECIRCULATE_LIST) {
            return Some(self.recirculate(pkt, &meta, list as u32, now));
        }

        let (mut sim, record) = self.bridge.to_sim(&pkt);
        let record = self.recover(record, pkt.id());

        // Drop the framing header the deparser reintroduced for
        // pipeline transport.
        let framing = self.net.framing_len();
        if framing > 0 {
            sim.strip_front(framing);
        }

        self.stats.transmits += 1;
        debug!(self.log, "transmit";
            "uid" => sim.uid(),
            "port" => meta.egress_port
        );

        Some(EgressResult::Transmit(Transmission {
            packet: sim,
            egress_port: meta.egress_port,
            destination: record.destination,
            protocol: record.protocol,
        }))
    }

    /// The item the next egress pass would take, per the same policy.
    pub fn peek_egress(&mut self, now: SimTime) -> Option<&QueueItem> {
        self.egress.peek(now)
    }

    // ================================================================
    // Control plane
    // ================================================================

    pub fn mirror_add(
        &mut self,
        id: u16,
        cfg: MirrorSession,
    ) -> Result<(), SwitchError> {
        self.mirrors.add(id, cfg)
    }

    pub fn mirror_delete(&mut self, id: u16) -> Result<(), SwitchError> {
        self.mirrors.delete(id)
    }

    pub fn mirror_get(&self, id: u16) -> Option<MirrorSession> {
        self.mirrors.get(id)
    }

    /// Adjust the service rate of one egress class, or all classes of
    /// a port. Applies to future admissions.
    pub fn set_queue_rate(
        &mut self,
        port: u16,
        priority: Option<u8>,
        pps: u64,
    ) -> Result<(), SwitchError> {
        self.egress.set_rate(port, priority, pps)
    }

    /// Adjust the admission limit of one egress class, or all classes
    /// of a port.
    pub fn set_queue_capacity(
        &mut self,
        port: u16,
        priority: Option<u8>,
        capacity: usize,
    ) -> Result<(), SwitchError> {
        self.egress.set_capacity(port, priority, capacity)
    }

    // ================================================================
    // Observability
    // ================================================================

    pub fn stats_snap(&self) -> PipelineStats {
        self.stats
    }

    pub fn input_buffer(&self) -> &InputBuffer {
        &self.input
    }

    pub fn egress_class_depth(&self, port: u16, priority: u8) -> usize {
        self.egress.class_depth(port, priority)
    }

    pub fn queue_dump(&self) -> Vec<ClassSnap> {
        self.egress.dump()
    }

    /// Live forward/reverse relay pairs in the translation boundary.
    /// Zero whenever no packet is inside an engine pass.
    pub fn relay_live(&self) -> usize {
        self.bridge.live()
    }

    // ================================================================
    // Internals
    // ================================================================

    fn check_running(&self) -> Result<(), SwitchError> {
        if self.state != PipelineState::Running {
            return Err(SwitchError::BadState(self.state.to_string()));
        }
        Ok(())
    }

    fn enqueue_input(&mut self, item: QueueItem) {
        if let Err(item) = self.input.enqueue(item) {
            self.stats.in_admission_drops += 1;
            warn!(self.log, "input buffer full; arrival dropped";
                "uid" => item.packet.uid(),
                "port" => item.meta.ingress_port
            );
        }
    }

    /// Terminal drop of an engine packet: tear down its relay entries
    /// so the boundary cannot leak, and account for it.
    fn drop_pkt(
        &mut self,
        pkt: &EnginePacket,
        reason: DropReason,
        dir: Direction,
    ) -> EgressResult {
        match reason {
            DropReason::PriorityRange => {
                self.stats.priority_range_drops += 1;
                error!(self.log, "priority out of range; packet dropped";
                    "dir" => %dir,
                    "engine_id" => pkt.id()
                );
            }
            _ => {
                debug!(self.log, "packet dropped";
                    "dir" => %dir,
                    "engine_id" => pkt.id(),
                    "reason" => %reason
                );
            }
        }
        self.bridge.discard(pkt);
        EgressResult::Drop { reason }
    }

    /// Ingress step 5: normal unicast toward the egress queue.
    fn unicast(
        &mut self,
        mut pkt: EnginePacket,
        mut meta: Metadata,
        now: SimTime,
    ) -> IngressResult {
        if meta.egress_spec == PORT_DROP {
            self.stats.ingress_policy_drops += 1;
            debug!(self.log, "policy drop";
                "dir" => %Direction::Ingress,
                "engine_id" => pkt.id()
            );
            self.bridge.discard(&pkt);
            return IngressResult::Drop { reason: DropReason::Policy };
        }

        meta.instance_type = InstanceType::Normal;
        meta.egress_port = meta.egress_spec;
        let fs = pkt.fields_mut();
        fs.set(fields::INSTANCE_TYPE, meta.instance_type.as_field());
        fs.set(fields::EGRESS_PORT, meta.egress_port as u64);

        match self.enqueue_egress(pkt, meta, now) {
            Ok((port, priority)) => IngressResult::Queued { port, priority },
            Err(reason) => IngressResult::Drop { reason },
        }
    }

    /// Flatten an engine packet into a QueueItem and admit it to its
    /// egress class, stamping enqueue-side queueing metadata when the
    /// engine exposes the fields.
    fn enqueue_egress(
        &mut self,
        mut pkt: EnginePacket,
        mut meta: Metadata,
        now: SimTime,
    ) -> Result<(u16, u8), DropReason> {
        if meta.priority >= self.cfg.priorities {
            self.stats.priority_range_drops += 1;
            error!(self.log, "priority out of range; packet dropped";
                "engine_id" => pkt.id(),
                "priority" => meta.priority
            );
            self.bridge.discard(&pkt);
            return Err(DropReason::PriorityRange);
        }

        if meta.egress_port >= self.cfg.ports {
            self.stats.port_range_drops += 1;
            error!(self.log, "egress spec names nonexistent port";
                "engine_id" => pkt.id(),
                "port" => meta.egress_port
            );
            self.bridge.discard(&pkt);
            return Err(DropReason::PortRange);
        }

        meta.queueing = pkt.fields().has(fields::ENQ_TIMESTAMP);
        if meta.queueing {
            meta.enq_timestamp = now.as_micros();
            meta.enq_qdepth = self
                .egress
                .class_depth(meta.egress_port, meta.priority)
                as u32;
            let fs = pkt.fields_mut();
            fs.set(fields::ENQ_TIMESTAMP, meta.enq_timestamp);
            fs.set(fields::ENQ_QDEPTH, meta.enq_qdepth as u64);
        }

        let carried = meta::split_carried(pkt.fields());
        let (sim, record) = self.bridge.to_sim(&pkt);
        let record = self.recover(record, pkt.id());
        meta.ingress_port = record.ingress_port;
        meta.protocol = record.protocol;
        meta.destination = record.destination;
        meta.sim_uid = sim.uid();

        let port = meta.egress_port;
        let priority = meta.priority;
        let item = QueueItem {
            packet: sim,
            ptype: PacketType::Normal,
            meta,
            carried,
            enqueued_at: now,
        };

        match self.egress.enqueue(item, now) {
            Ok(()) => Ok((port, priority)),
            Err(item) => {
                self.stats.queue_admission_drops += 1;
                warn!(self.log, "egress class full; packet dropped";
                    "uid" => item.packet.uid(),
                    "port" => port,
                    "priority" => priority
                );
                Err(DropReason::QueueFull)
            }
        }
    }

    /// Ingress/egress mirroring: look up the session, build the
    /// clone, copy the listed fields, and dispatch it. The caller's
    /// packet is never diverted.
    fn mirror_clone(
        &mut self,
        src: &EnginePacket,
        base: &Metadata,
        session: u16,
        list: u32,
        which: InstanceType,
        now: SimTime,
    ) {
        let Some(sess) = self.mirrors.get(session) else {
            debug!(self.log, "mirror session not configured";
                "session" => session
            );
            return;
        };

        let kind = match which {
            InstanceType::IngressClone => CloneKind::PreParse,
            _ => CloneKind::FreshFields,
        };
        let mut clone = self.bridge.clone_packet(src, kind);
        self.net.copy_fields(src.fields(), clone.fields_mut(), list);

        match which {
            InstanceType::IngressClone => self.stats.ingress_clones += 1,
            _ => self.stats.egress_clones += 1,
        }

        let len = clone.len() as u64;
        let fs = clone.fields_mut();
        fs.set(fields::INSTANCE_TYPE, which.as_field());
        fs.set(fields::PACKET_LENGTH, len);
        let priority = fs.get(fields::PRIORITY).unwrap_or(0) as u8;
        clone.set_reg(REG_PACKET_LENGTH, len);

        let mut cmeta = Metadata {
            ingress_port: base.ingress_port,
            instance_type: which,
            packet_length: len,
            priority,
            packet_type: PacketType::Normal,
            ..Default::default()
        };

        if sess.mgid_valid {
            let copies = self.fanout(clone, &cmeta, sess.mgid, now);
            debug!(self.log, "mirror clone replicated";
                "session" => session,
                "mgid" => sess.mgid,
                "copies" => copies
            );
        } else if sess.egress_port_valid {
            cmeta.egress_spec = sess.egress_port;
            cmeta.egress_port = sess.egress_port;
            let fs = clone.fields_mut();
            fs.set(fields::EGRESS_SPEC, sess.egress_port as u64);
            fs.set(fields::EGRESS_PORT, sess.egress_port as u64);
            if let Err(reason) = self.enqueue_egress(clone, cmeta, now) {
                debug!(self.log, "mirror clone dropped";
                    "session" => session,
                    "reason" => %reason
                );
            }
        } else {
            // A session with no valid target swallows the clone.
            self.bridge.discard(&clone);
        }
    }

    /// Ingress step 3: restart ingress on the pre-parse buffer,
    /// carrying only the listed fields. Terminal for this pass.
    fn resubmit(
        &mut self,
        mut pkt: EnginePacket,
        base: &Metadata,
        list: u32,
        now: SimTime,
    ) -> IngressResult {
        self.stats.resubmits += 1;

        let mut carried = FieldSet::default();
        self.net.copy_fields(pkt.fields(), &mut carried, list);

        pkt.restore_saved();
        let (sim, record) = self.bridge.to_sim(&pkt);
        let record = self.recover(record, pkt.id());

        let meta = Metadata {
            ingress_port: base.ingress_port,
            protocol: record.protocol,
            destination: record.destination,
            instance_type: InstanceType::Resubmit,
            packet_type: PacketType::Resubmit,
            packet_length: sim.len() as u64,
            sim_uid: sim.uid(),
            ..Default::default()
        };

        debug!(self.log, "resubmit";
            "uid" => sim.uid(),
            "list" => list
        );

        let item = QueueItem {
            packet: sim,
            ptype: PacketType::Resubmit,
            meta,
            carried,
            enqueued_at: now,
        };
        self.enqueue_input(item);
        IngressResult::Resubmit
    }

    /// Egress tail: re-inject at the parser instead of transmitting,
    /// carrying only the listed fields.
    fn recirculate(
        &mut self,
        pkt: EnginePacket,
        base: &Metadata,
        list: u32,
        now: SimTime,
    ) -> EgressResult {
        self.stats.recirculates += 1;

        let mut carried = FieldSet::default();
        self.net.copy_fields(pkt.fields(), &mut carried, list);

        let (sim, record) = self.bridge.to_sim(&pkt);
        let record = self.recover(record, pkt.id());

        let meta = Metadata {
            ingress_port: base.ingress_port,
            protocol: record.protocol,
            destination: record.destination,
            instance_type: InstanceType::Recirculate,
            packet_type: PacketType::Recirculate,
            packet_length: sim.len() as u64,
            sim_uid: sim.uid(),
            ..Default::default()
        };

        debug!(self.log, "recirculate";
            "uid" => sim.uid(),
            "list" => list
        );

        let item = QueueItem {
            packet: sim,
            ptype: PacketType::Recirculate,
            meta,
            carried,
            enqueued_at: now,
        };
        self.enqueue_input(item);
        EgressResult::Recirculate
    }

    /// Ingress step 4: multicast replication of the packet itself.
    fn replicate_out(
        &mut self,
        mut pkt: EnginePacket,
        mut meta: Metadata,
        now: SimTime,
    ) -> IngressResult {
        meta.instance_type = InstanceType::Replication;
        pkt.fields_mut()
            .set(fields::INSTANCE_TYPE, meta.instance_type.as_field());

        let mgid = meta.mcast_grp;
        let copies = self.fanout(pkt, &meta, mgid, now);
        self.stats.multicast_replicas += copies as u64;
        IngressResult::Multicast { copies }
    }

    /// Clone `src` once per replication-engine target and admit each
    /// copy; the source itself is always discarded.
    fn fanout(
        &mut self,
        src: EnginePacket,
        base: &Metadata,
        mgid: u16,
        now: SimTime,
    ) -> u16 {
        let replicas = self.net.replicate(mgid);
        if replicas.is_empty() {
            debug!(self.log, "unprogrammed multicast group";
                "mgid" => mgid,
                "engine_id" => src.id()
            );
            self.bridge.discard(&src);
            return 0;
        }

        let mut copies = 0;
        for replica in replicas {
            let mut cpkt = self.bridge.clone_packet(&src, CloneKind::Full);
            let fs = cpkt.fields_mut();
            fs.set(fields::EGRESS_RID, replica.rid as u64);
            fs.set(fields::EGRESS_SPEC, replica.egress_port as u64);
            fs.set(fields::EGRESS_PORT, replica.egress_port as u64);

            let mut cmeta = base.clone();
            cmeta.egress_rid = replica.rid;
            cmeta.egress_spec = replica.egress_port;
            cmeta.egress_port = replica.egress_port;

            if self.enqueue_egress(cpkt, cmeta, now).is_ok() {
                copies += 1;
            }
        }

        self.bridge.discard(&src);
        copies
    }

    fn recover(
        &mut self,
        record: Option<PacketRecord>,
        engine_id: u64,
    ) -> PacketRecord {
        match record {
            Some(record) => record,
            None => {
                self.stats.relay_misses += 1;
                error!(self.log,
                    "no relay entry at back-translation; blank record";
                    "engine_id" => engine_id
                );
                PacketRecord::default()
            }
        }
    }
}
