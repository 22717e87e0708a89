// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Shared test harness: a scripted match-action engine and helpers
//! for single-stepping packets through the pipeline.

use pswitch::api::InstanceType;
use pswitch::api::PORT_DROP;
use pswitch::api::SwitchConfig;
use pswitch::engine::ParseFault;
use pswitch::engine::Replica;
use pswitch::engine::SwitchImpl;
use pswitch::engine::meta::fields;
use pswitch::engine::packet::EnginePacket;
use pswitch::engine::packet::FieldSet;
use pswitch::engine::pipeline::Pipeline;
use slog::Drain;
use slog::Logger;
use slog::o;
use std::collections::BTreeMap;

/// What the scripted ingress tables do to a packet.
///
/// One program is selected per pass: by instance type for re-injected
/// packets, else by ingress port.
#[derive(Clone, Debug, Default)]
pub struct IngressProgram {
    /// Decision written to `egress_spec`; `None` leaves the drop spec
    /// in place so an unprogrammed port drops, like a miss on a real
    /// table.
    pub egress_spec: Option<u16>,
    pub priority: Option<u8>,
    pub mcast_grp: Option<u16>,
    pub resubmit_list: Option<u32>,
    pub clone_session: Option<(u16, u32)>,
    pub learn_list: Option<u32>,

    /// Extra user fields the tables write, e.g. scratch metadata.
    pub set_fields: Vec<(String, u64)>,
}

impl IngressProgram {
    pub fn forward(port: u16) -> Self {
        Self { egress_spec: Some(port), ..Default::default() }
    }

    fn run(&self, fs: &mut FieldSet) {
        let spec = self.egress_spec.unwrap_or(PORT_DROP);
        fs.set(fields::EGRESS_SPEC, spec as u64);

        if let Some(prio) = self.priority {
            fs.set(fields::PRIORITY, prio as u64);
        }

        if let Some(mgid) = self.mcast_grp {
            fs.set(fields::MCAST_GRP, mgid as u64);
        }

        if let Some(list) = self.resubmit_list {
            fs.set(fields::RESUBMIT_LIST, list as u64);
        }

        if let Some((session, list)) = self.clone_session {
            fs.set(fields::CLONE_SESSION, session as u64);
            fs.set(fields::CLONE_FIELD_LIST, list as u64);
        }

        if let Some(list) = self.learn_list {
            fs.set(fields::LEARN_LIST, list as u64);
        }

        for (name, val) in &self.set_fields {
            fs.set(name, *val);
        }
    }
}

/// A scripted match-action engine.
///
/// The parser lifts the first two payload bytes into `hdr.b0` /
/// `hdr.b1` so field-list copies have something header-like to carry;
/// the ingress "tables" replay the programs installed per port (and
/// per instance type for resubmitted/recirculated passes); egress
/// behavior is a handful of switches. The deparser prepends
/// `framing` bytes of transport header, which the pipeline strips
/// before transmission.
#[derive(Default)]
pub struct StubEngine {
    pub ingress: BTreeMap<u16, IngressProgram>,
    pub on_resubmit: Option<IngressProgram>,
    pub on_recirculate: Option<IngressProgram>,

    /// Set the recirculate list at egress for packets that do not
    /// carry the `recirculated` marker field.
    pub egress_recirc_list: Option<u32>,

    /// Egress mirror request, skipped for packets that are themselves
    /// egress clones.
    pub egress_clone: Option<(u16, u32)>,

    /// Drop (at egress) packets leaving through these ports.
    pub egress_drop_ports: Vec<u16>,

    /// Multicast groups for `replicate`.
    pub groups: BTreeMap<u16, Vec<Replica>>,

    /// Field lists for `copy_fields`.
    pub field_lists: BTreeMap<u32, Vec<String>>,

    /// Expose the queueing metadata fields to the pipeline.
    pub queueing: bool,

    /// Fail every parse this way.
    pub parse_fault: Option<ParseFault>,

    /// Transport framing bytes the deparser prepends.
    pub framing: usize,

    /// Learning notifications received: `(list_id, engine_id)`.
    pub learned: Vec<(u32, u64)>,

    /// Field workspace observed at each egress apply.
    pub egress_seen: Vec<FieldSet>,
}

impl StubEngine {
    pub fn with_ingress(port: u16, prog: IngressProgram) -> Self {
        let mut eng = Self::default();
        eng.ingress.insert(port, prog);
        eng
    }
}

impl SwitchImpl for StubEngine {
    fn parse(&mut self, pkt: &mut EnginePacket) -> Result<(), ParseFault> {
        let b0 = pkt.data().first().copied().unwrap_or(0);
        let b1 = pkt.data().get(1).copied().unwrap_or(0);
        pkt.fields_mut().set("hdr.b0", b0 as u64);
        pkt.fields_mut().set("hdr.b1", b1 as u64);

        if self.queueing {
            // Exposing the fields is what opts the packet into
            // queueing metadata.
            pkt.fields_mut().set(fields::ENQ_TIMESTAMP, 0);
            pkt.fields_mut().set(fields::ENQ_QDEPTH, 0);
        }

        match self.parse_fault {
            Some(fault) => Err(fault),
            None => Ok(()),
        }
    }

    fn ingress_apply(&mut self, pkt: &mut EnginePacket) {
        let itype = pkt.fields().get(fields::INSTANCE_TYPE).unwrap_or(0);
        let in_port =
            pkt.fields().get(fields::INGRESS_PORT).unwrap_or(0) as u16;

        let prog = match InstanceType::from_field(itype) {
            Some(InstanceType::Resubmit) => self.on_resubmit.clone(),
            Some(InstanceType::Recirculate) => self.on_recirculate.clone(),
            _ => self.ingress.get(&in_port).cloned(),
        };

        if let Some(prog) = prog {
            prog.run(pkt.fields_mut());
        }
    }

    fn egress_apply(&mut self, pkt: &mut EnginePacket) {
        self.egress_seen.push(pkt.fields().clone());

        let port = pkt.fields().get(fields::EGRESS_PORT).unwrap_or(0) as u16;
        if self.egress_drop_ports.contains(&port) {
            pkt.fields_mut().set(fields::EGRESS_SPEC, PORT_DROP as u64);
            return;
        }

        let itype = pkt.fields().get(fields::INSTANCE_TYPE).unwrap_or(0);
        if let Some((session, list)) = self.egress_clone {
            if itype != InstanceType::EgressClone.as_field() {
                pkt.fields_mut().set(fields::CLONE_SESSION, session as u64);
                pkt.fields_mut().set(fields::CLONE_FIELD_LIST, list as u64);
            }
        }

        if let Some(list) = self.egress_recirc_list {
            if !pkt.fields().has("recirculated") {
                pkt.fields_mut().set(fields::RECIRCULATE_LIST, list as u64);
            }
        }
    }

    fn deparse(&mut self, pkt: &mut EnginePacket) {
        if self.framing > 0 {
            let mut framed = vec![0xfe; self.framing];
            framed.extend_from_slice(pkt.data());
            *pkt.data_mut() = framed;
        }
    }

    fn copy_fields(&self, src: &FieldSet, dst: &mut FieldSet, list_id: u32) {
        let Some(names) = self.field_lists.get(&list_id) else {
            return;
        };

        for name in names {
            if let Some(val) = src.get(name) {
                dst.set(name, val);
            }
        }
    }

    fn learn(&mut self, list_id: u32, pkt: &EnginePacket) {
        self.learned.push((list_id, pkt.id()));
    }

    fn replicate(&mut self, mgid: u16) -> Vec<Replica> {
        self.groups.get(&mgid).cloned().unwrap_or_default()
    }

    fn framing_len(&self) -> usize {
        self.framing
    }
}

/// A quiet logger unless RUST_LOG says otherwise.
pub fn test_logger() -> Logger {
    let decorator =
        slog_term::PlainSyncDecorator::new(slog_term::TestStdoutWriter);
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_envlogger::new(drain).fuse();
    Logger::root(drain, o!())
}

/// A started pipeline over the given engine.
pub fn pipeline(
    cfg: SwitchConfig,
    net: StubEngine,
) -> Pipeline<StubEngine> {
    let mut pipe = Pipeline::new(cfg, net, test_logger())
        .expect("test config must validate");
    pipe.start().expect("fresh pipeline starts");
    pipe
}
