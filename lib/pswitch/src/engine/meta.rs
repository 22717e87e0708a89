// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Metadata reconstitution.
//!
//! [`Metadata`] is the pipeline's typed view of a packet's state; the
//! engine sees the same state as named fields in the packet's
//! workspace. This module owns the standard-field vocabulary and the
//! store/load translation between the two views, used at every
//! crossing between the packet universes.

use crate::api::InstanceType;
use crate::api::Metadata;
use crate::api::ParserError;
use crate::engine::packet::FieldSet;

/// The standard metadata field names.
///
/// `CLONE_SESSION` through `LEARN_LIST` are side-effect requests: the
/// engine's tables set them, the pipeline consumes them (read and
/// clear) after each apply.
pub mod fields {
    pub const INGRESS_PORT: &str = "ingress_port";
    pub const EGRESS_SPEC: &str = "egress_spec";
    pub const EGRESS_PORT: &str = "egress_port";
    pub const INSTANCE_TYPE: &str = "instance_type";
    pub const PACKET_LENGTH: &str = "packet_length";
    pub const ENQ_TIMESTAMP: &str = "enq_timestamp";
    pub const ENQ_QDEPTH: &str = "enq_qdepth";
    pub const DEQ_TIMEDELTA: &str = "deq_timedelta";
    pub const DEQ_QDEPTH: &str = "deq_qdepth";
    pub const INGRESS_TIMESTAMP: &str = "ingress_timestamp";
    pub const EGRESS_TIMESTAMP: &str = "egress_timestamp";
    pub const MCAST_GRP: &str = "mcast_grp";
    pub const EGRESS_RID: &str = "egress_rid";
    pub const CHECKSUM_ERROR: &str = "checksum_error";
    pub const PARSER_ERROR: &str = "parser_error";
    pub const PRIORITY: &str = "priority";

    pub const CLONE_SESSION: &str = "clone_session";
    pub const CLONE_FIELD_LIST: &str = "clone_field_list";
    pub const RESUBMIT_LIST: &str = "resubmit_list";
    pub const RECIRCULATE_LIST: &str = "recirculate_list";
    pub const LEARN_LIST: &str = "learn_list";

    pub const STANDARD: &[&str] = &[
        INGRESS_PORT,
        EGRESS_SPEC,
        EGRESS_PORT,
        INSTANCE_TYPE,
        PACKET_LENGTH,
        ENQ_TIMESTAMP,
        ENQ_QDEPTH,
        DEQ_TIMEDELTA,
        DEQ_QDEPTH,
        INGRESS_TIMESTAMP,
        EGRESS_TIMESTAMP,
        MCAST_GRP,
        EGRESS_RID,
        CHECKSUM_ERROR,
        PARSER_ERROR,
        PRIORITY,
        CLONE_SESSION,
        CLONE_FIELD_LIST,
        RESUBMIT_LIST,
        RECIRCULATE_LIST,
        LEARN_LIST,
    ];
}

/// Write the metadata into the field workspace. Used on the egress
/// pass to reconstitute the state that was flattened when the packet
/// crossed the Egress Queue Buffer. Queueing fields are written only
/// when the packet tracks them.
pub fn store(meta: &Metadata, fs: &mut FieldSet) {
    fs.set(fields::INGRESS_PORT, meta.ingress_port as u64);
    fs.set(fields::EGRESS_SPEC, meta.egress_spec as u64);
    fs.set(fields::EGRESS_PORT, meta.egress_port as u64);
    fs.set(fields::INSTANCE_TYPE, meta.instance_type.as_field());
    fs.set(fields::PACKET_LENGTH, meta.packet_length);
    fs.set(fields::INGRESS_TIMESTAMP, meta.ingress_timestamp);
    fs.set(fields::EGRESS_TIMESTAMP, meta.egress_timestamp);
    fs.set(fields::MCAST_GRP, meta.mcast_grp as u64);
    fs.set(fields::EGRESS_RID, meta.egress_rid as u64);
    fs.set(fields::CHECKSUM_ERROR, meta.checksum_error as u64);
    fs.set(fields::PARSER_ERROR, meta.parser_error.as_field());
    fs.set(fields::PRIORITY, meta.priority as u64);

    if meta.queueing {
        fs.set(fields::ENQ_TIMESTAMP, meta.enq_timestamp);
        fs.set(fields::ENQ_QDEPTH, meta.enq_qdepth as u64);
        fs.set(fields::DEQ_TIMEDELTA, meta.deq_timedelta);
        fs.set(fields::DEQ_QDEPTH, meta.deq_qdepth as u64);
    }
}

/// Read the engine-writable decision fields back into the metadata
/// after a table apply. Fields the engine did not touch keep their
/// previous value.
pub fn load(meta: &mut Metadata, fs: &FieldSet) {
    if let Some(v) = fs.get(fields::EGRESS_SPEC) {
        meta.egress_spec = v as u16;
    }

    if let Some(v) = fs.get(fields::PRIORITY) {
        meta.priority = v as u8;
    }

    if let Some(v) = fs.get(fields::MCAST_GRP) {
        meta.mcast_grp = v as u16;
    }

    if let Some(v) = fs.get(fields::EGRESS_RID) {
        meta.egress_rid = v as u16;
    }

    if let Some(v) = fs.get(fields::PACKET_LENGTH) {
        meta.packet_length = v;
    }

    if let Some(v) = fs.get(fields::CHECKSUM_ERROR) {
        meta.checksum_error = v != 0;
    }

    if let Some(v) = fs.get(fields::PARSER_ERROR) {
        meta.parser_error = ParserError::from_field(v);
    }

    if let Some(it) =
        fs.get(fields::INSTANCE_TYPE).and_then(InstanceType::from_field)
    {
        meta.instance_type = it;
    }
}

/// Extract the fields that are not part of the standard vocabulary.
/// These are engine-private values (parsed headers, user metadata)
/// that must ride across a queue crossing alongside the [`Metadata`].
pub fn split_carried(fs: &FieldSet) -> FieldSet {
    let mut carried = FieldSet::default();
    for (name, val) in fs.iter() {
        if !fields::STANDARD.contains(&name) {
            carried.set(name, val);
        }
    }
    carried
}
