//! Per-controller request batches.
//!
//! A list of tags is resolved and grouped by controller so each controller is
//! addressed with one batched request. Within a group, `addresses[i]` is the
//! device address of `tags[i]`; unresolved tags are kept apart and never sent
//! to a driver.

use std::collections::BTreeMap;

use tracing::warn;

use super::resolver::{ResolvedAddress, TagResolver};

/// The tags routed to one controller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ControllerPacket {
    /// Device addresses, aligned with `tags`.
    pub addresses: Vec<String>,
    pub tags: Vec<String>,
    /// Tags bound to the `UNDF` sentinel.
    pub unresolved: Vec<String>,
}

impl ControllerPacket {
    pub fn push(&mut self, tag: &str, address: &ResolvedAddress) {
        match address {
            ResolvedAddress::Device(address) => {
                self.addresses.push(address.clone());
                self.tags.push(tag.to_string());
            }
            ResolvedAddress::Unresolved => self.unresolved.push(tag.to_string()),
        }
    }

    /// Tag/address pairs.
    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.tags
            .iter()
            .map(String::as_str)
            .zip(self.addresses.iter().map(String::as_str))
    }

    /// Every tag in the group, resolved or not.
    pub fn all_tags(&self) -> impl Iterator<Item = &str> {
        self.tags
            .iter()
            .chain(self.unresolved.iter())
            .map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty() && self.unresolved.is_empty()
    }
}

/// Groups keyed by controller id, in id order.
///
/// The empty id collects tags that named no usable controller; it is never
/// dispatched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ControllerPackets {
    groups: BTreeMap<String, ControllerPacket>,
    /// Tags the resolver refused (strict mode).
    rejected: Vec<String>,
}

impl ControllerPackets {
    /// Resolve `tags` and group them. Tags the resolver rejects are logged and
    /// kept out of every group.
    pub fn build<S: AsRef<str>>(resolver: &TagResolver, tags: &[S]) -> Self {
        let mut packets = Self::default();
        for tag in tags {
            let tag = tag.as_ref();
            match resolver.resolve(tag) {
                Ok(packet) => packets
                    .groups
                    .entry(packet.controller)
                    .or_default()
                    .push(tag, &packet.address),
                Err(e) => {
                    warn!(tag, "dropping tag: {}", e);
                    packets.rejected.push(tag.to_string());
                }
            }
        }
        packets
    }

    pub fn get(&self, controller: &str) -> Option<&ControllerPacket> {
        self.groups.get(controller)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ControllerPacket)> {
        self.groups.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Groups that name a controller.
    pub fn dispatchable(&self) -> impl Iterator<Item = (&str, &ControllerPacket)> {
        self.iter().filter(|(id, _)| !id.is_empty())
    }

    /// Tags that named no controller at all.
    pub fn orphaned(&self) -> impl Iterator<Item = &str> {
        self.groups
            .get("")
            .into_iter()
            .flat_map(ControllerPacket::all_tags)
    }

    /// Tags the resolver refused, in input order.
    pub fn rejected(&self) -> &[String] {
        &self.rejected
    }

    pub fn controllers(&self) -> impl Iterator<Item = &str> {
        self.dispatchable().map(|(id, _)| id)
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}
