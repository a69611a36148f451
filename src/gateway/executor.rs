//! Batched read, find and write across controllers.
//!
//! One task per controller group, run concurrently on a `JoinSet`. Results
//! are merged once every group has answered; a failing group never keeps the
//! others from reporting.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

use crate::core::data::{Reading, TagValues, Value};
use crate::core::error::{GatewayError, Result};

use super::packet::{ControllerPacket, ControllerPackets};
use super::registry::{Controller, ControllerRegistry};

/// Merged read result: every requested tag plus the first error seen.
#[derive(Debug, Default)]
pub struct ReadOutcome {
    pub error: Option<GatewayError>,
    pub values: TagValues,
}

impl ReadOutcome {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// `Err` if any group failed, discarding the partial values.
    pub fn into_result(self) -> Result<TagValues> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.values),
        }
    }

    fn record_error(&mut self, error: GatewayError) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }
}

/// Per-controller result of a batched write.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WriteReport {
    /// Controllers whose write succeeded.
    pub written: Vec<String>,
    /// Controllers skipped because writing is not allowed.
    pub skipped: Vec<String>,
    /// Controllers whose driver reported an error.
    pub failed: Vec<String>,
    /// Tags that could not be routed to a controller.
    pub unresolved: Vec<String>,
}

/// Batched write result.
///
/// `error` is the first driver error if any controller failed, otherwise a
/// permission error if any controller was skipped.
#[derive(Debug, Default)]
pub struct WriteOutcome {
    pub error: Option<GatewayError>,
    pub report: WriteReport,
}

impl WriteOutcome {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    pub fn into_result(self) -> Result<WriteReport> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.report),
        }
    }
}

/// A group's readings, or the error that made them all undefined.
pub(crate) struct GroupRead {
    pub values: TagValues,
    pub error: Option<GatewayError>,
}

/// Read the active items of one controller and map them onto the group's tags.
///
/// Does not touch the active item set; the caller registers addresses.
pub(crate) async fn read_group(controller: &Controller, packet: &ControllerPacket) -> GroupRead {
    let mut values = undefined_for(packet.unresolved.iter());

    if packet.addresses.is_empty() {
        return GroupRead {
            values,
            error: None,
        };
    }

    match controller.driver().read_all_items().await {
        Ok(mut items) => {
            for (tag, address) in packet.pairs() {
                values.insert(tag.to_string(), Reading::from_driver(items.remove(address)));
            }
            GroupRead {
                values,
                error: None,
            }
        }
        Err(e) => {
            warn!(controller = %controller.id(), "read failed: {}", e);
            values.extend(undefined_for(packet.tags.iter()));
            GroupRead {
                values,
                error: Some(attribute(controller.id(), e)),
            }
        }
    }
}

/// Read every tag in `packets`.
///
/// Addresses are added to each controller's active item set first. Tags that
/// cannot be read (unresolved, unknown controller, failed group) read as
/// [`Reading::Undefined`].
pub async fn read_many(registry: &ControllerRegistry, packets: &ControllerPackets) -> ReadOutcome {
    dispatch(registry, packets, |controller, packet| async move {
        controller.driver().add_items(&packet.addresses);
        read_group(&controller, &packet).await
    })
    .await
}

/// Point lookups of already-registered addresses.
pub async fn find_many(registry: &ControllerRegistry, packets: &ControllerPackets) -> ReadOutcome {
    dispatch(registry, packets, |controller, packet| async move {
        let mut values = undefined_for(packet.unresolved.iter());
        for (tag, address) in packet.pairs() {
            let found = controller.driver().find_item(address).await;
            values.insert(tag.to_string(), Reading::from_driver(found));
        }
        GroupRead {
            values,
            error: None,
        }
    })
    .await
}

async fn dispatch<F, Fut>(
    registry: &ControllerRegistry,
    packets: &ControllerPackets,
    per_group: F,
) -> ReadOutcome
where
    F: Fn(Arc<Controller>, ControllerPacket) -> Fut,
    Fut: std::future::Future<Output = GroupRead> + Send + 'static,
{
    let mut outcome = ReadOutcome {
        error: None,
        values: undefined_for(packets.orphaned()),
    };

    let mut set = JoinSet::new();
    for (id, packet) in packets.dispatchable() {
        match registry.get(id) {
            Some(controller) => {
                set.spawn(per_group(Arc::clone(controller), packet.clone()));
            }
            None => {
                outcome.values.extend(undefined_for(packet.all_tags()));
                if !packet.tags.is_empty() {
                    outcome.record_error(GatewayError::ControllerNotFound(id.to_string()));
                }
            }
        }
    }

    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(group) => {
                outcome.values.extend(group.values);
                if let Some(e) = group.error {
                    outcome.record_error(e);
                }
            }
            Err(e) => {
                error!("read task failed: {}", e);
                outcome.record_error(GatewayError::Internal(e.to_string()));
            }
        }
    }

    debug!(tags = outcome.values.len(), ok = outcome.is_ok(), "batch read finished");
    outcome
}

enum GroupWrite {
    Written(String),
    Failed(String, GatewayError),
}

/// Write `items` (tag -> value) grouped by controller.
///
/// Controllers without `allow_write` are skipped and logged; the others are
/// written concurrently.
pub async fn write_many(
    registry: &ControllerRegistry,
    packets: &ControllerPackets,
    items: &HashMap<String, Value>,
) -> WriteOutcome {
    let mut report = WriteReport {
        unresolved: packets
            .rejected()
            .iter()
            .map(String::as_str)
            .chain(packets.orphaned())
            .map(str::to_string)
            .collect(),
        ..Default::default()
    };
    let mut prohibited = None;

    let mut set = JoinSet::new();
    for (id, packet) in packets.dispatchable() {
        report.unresolved.extend(packet.unresolved.iter().cloned());
        if packet.tags.is_empty() {
            continue;
        }

        let Some(controller) = registry.get(id) else {
            warn!(controller = id, "write to undefined controller");
            report.unresolved.extend(packet.tags.iter().cloned());
            continue;
        };

        if !controller.allow_write() {
            let err = GatewayError::write_prohibited(controller.id(), packet.tags[0].as_str());
            error!("{}", err);
            report.skipped.push(controller.id().to_string());
            prohibited.get_or_insert(err);
            continue;
        }

        let values: Vec<Value> = packet
            .tags
            .iter()
            .map(|tag| items.get(tag).cloned().unwrap_or_default())
            .collect();
        let controller = Arc::clone(controller);
        let addresses = packet.addresses.clone();
        set.spawn(async move {
            match controller.driver().write_items(&addresses, &values).await {
                Ok(()) => GroupWrite::Written(controller.id().to_string()),
                Err(e) => {
                    error!(controller = %controller.id(), "write failed: {}", e);
                    GroupWrite::Failed(controller.id().to_string(), attribute(controller.id(), e))
                }
            }
        });
    }

    let mut failure = None;
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(GroupWrite::Written(id)) => report.written.push(id),
            Ok(GroupWrite::Failed(id, e)) => {
                report.failed.push(id);
                failure.get_or_insert(e);
            }
            Err(e) => {
                error!("write task failed: {}", e);
                failure.get_or_insert(GatewayError::Internal(e.to_string()));
            }
        }
    }

    report.written.sort();
    report.failed.sort();

    WriteOutcome {
        error: failure.or(prohibited),
        report,
    }
}

/// Attribute a driver-side error to a controller.
fn attribute(controller: &str, error: GatewayError) -> GatewayError {
    match error {
        GatewayError::Driver { .. } => error,
        other => GatewayError::driver(controller, other.to_string()),
    }
}

fn undefined_for<I, S>(tags: I) -> TagValues
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    tags.into_iter()
        .map(|t| (t.as_ref().to_string(), Reading::Undefined))
        .collect()
}
