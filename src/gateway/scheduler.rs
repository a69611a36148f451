//! Subscriptions and poll loops.
//!
//! A subscription is identified by a fingerprint of its ordered tag list.
//! Subscribing registers the tags' addresses with their controllers once,
//! then runs one poll loop per controller:
//!
//! ```text
//! start = now
//! read_all_items -> handler(update)
//! sleep(min(interval, max(0, interval - (now - start))))
//! ```
//!
//! so a slow read does not push later cycles back. Stopping a loop bumps its
//! generation and signals the watch channel; a read already in flight runs to
//! completion and its update is still delivered, but no further cycle starts.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::core::data::TagValues;
use crate::core::error::{GatewayError, Result};

use super::executor::read_group;
use super::packet::{ControllerPacket, ControllerPackets};
use super::registry::{Controller, ControllerRegistry};

/// Identifier of a subscription: SHA-256 of its tag list, hex encoded.
///
/// Order-sensitive: the same tags in a different order are a different
/// subscription.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct SubscriptionToken(String);

impl SubscriptionToken {
    /// Fingerprint an ordered tag list.
    pub fn for_tags<S: AsRef<str>>(tags: &[S]) -> Self {
        let mut hasher = Sha256::new();
        for tag in tags {
            hasher.update(tag.as_ref().as_bytes());
            hasher.update([0u8]);
        }
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubscriptionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for SubscriptionToken {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SubscriptionToken {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for SubscriptionToken {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Subscription options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscribeOptions {
    /// Target period between cycle starts. Zero polls back to back.
    pub interval: Duration,

    /// Deliver an empty update every interval for tags that named no usable
    /// controller, so the caller still hears back about them.
    pub emit_empty_for_missing: bool,
}

impl SubscribeOptions {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            emit_empty_for_missing: false,
        }
    }

    #[must_use]
    pub fn with_emit_empty_for_missing(mut self, emit: bool) -> Self {
        self.emit_empty_for_missing = emit;
        self
    }
}

/// One poll cycle's result for one controller.
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionUpdate {
    pub token: SubscriptionToken,
    /// Controller the values come from; empty for the missing-tags heartbeat.
    pub controller: String,
    pub values: TagValues,
}

/// Callback receiving subscription updates.
pub type UpdateHandler = Arc<dyn Fn(SubscriptionUpdate) + Send + Sync>;

/// Public view of an active subscription.
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionInfo {
    pub token: SubscriptionToken,
    pub tags: Vec<String>,
    pub controllers: Vec<String>,
    pub interval_ms: u64,
    pub created_at: DateTime<Utc>,
}

struct PollTask {
    controller: Option<Arc<Controller>>,
    addresses: Vec<String>,
    generation: Arc<AtomicU64>,
    cancel: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl PollTask {
    /// Stop rescheduling. An in-flight cycle still completes.
    fn stop(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.cancel.send_replace(true);
    }
}

struct Subscription {
    tags: Vec<String>,
    interval: Duration,
    created_at: DateTime<Utc>,
    tasks: Vec<PollTask>,
}

/// Active subscriptions and their poll loops.
pub struct PollScheduler {
    registry: Arc<ControllerRegistry>,
    subscriptions: DashMap<SubscriptionToken, Subscription>,
    /// Subscription reference counts per (controller, address).
    item_refs: DashMap<(String, String), usize>,
}

impl PollScheduler {
    pub fn new(registry: Arc<ControllerRegistry>) -> Self {
        Self {
            registry,
            subscriptions: DashMap::new(),
            item_refs: DashMap::new(),
        }
    }

    pub fn contains(&self, token: &SubscriptionToken) -> bool {
        self.subscriptions.contains_key(token)
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    /// Start polling `packets` under `token`.
    ///
    /// Returns `None` without starting anything when the token is already
    /// active. Must be called from within a tokio runtime.
    pub fn subscribe(
        &self,
        token: SubscriptionToken,
        tags: Vec<String>,
        packets: &ControllerPackets,
        options: SubscribeOptions,
        handler: UpdateHandler,
    ) -> Option<SubscriptionToken> {
        let entry = match self.subscriptions.entry(token.clone()) {
            Entry::Occupied(_) => {
                debug!(%token, "subscription already active");
                return None;
            }
            Entry::Vacant(entry) => entry,
        };

        let mut tasks = Vec::new();
        let mut missing: Vec<String> = packets.orphaned().map(str::to_string).collect();

        for (id, packet) in packets.dispatchable() {
            let Some(controller) = self.registry.get(id) else {
                warn!(controller = id, "subscription names undefined controller");
                missing.extend(packet.all_tags().map(str::to_string));
                continue;
            };

            self.retain_items(controller, &packet.addresses);
            tasks.push(spawn_poll(
                Arc::clone(controller),
                packet.clone(),
                token.clone(),
                options.interval,
                Arc::clone(&handler),
            ));
        }

        if options.emit_empty_for_missing && !missing.is_empty() {
            tasks.push(spawn_heartbeat(token.clone(), options.interval, handler));
        }

        info!(
            %token,
            tags = tags.len(),
            loops = tasks.len(),
            interval_ms = options.interval.as_millis() as u64,
            "subscription started"
        );

        entry.insert(Subscription {
            tags,
            interval: options.interval,
            created_at: Utc::now(),
            tasks,
        });
        Some(token)
    }

    /// Stop a subscription and release its addresses.
    pub fn unsubscribe(&self, token: &str) -> Result<()> {
        let (token, subscription) = self
            .subscriptions
            .remove(&SubscriptionToken::from(token))
            .ok_or_else(|| GatewayError::UnknownSubscription(token.to_string()))?;

        for task in &subscription.tasks {
            task.stop();
            if let Some(controller) = &task.controller {
                self.release_items(controller, &task.addresses);
            }
        }

        info!(%token, "subscription removed");
        Ok(())
    }

    /// Stop every subscription and wait for their loops to exit.
    pub async fn shutdown(&self) {
        let tokens: Vec<SubscriptionToken> =
            self.subscriptions.iter().map(|e| e.key().clone()).collect();

        let mut handles = Vec::new();
        for token in tokens {
            if let Some((_, subscription)) = self.subscriptions.remove(&token) {
                for task in subscription.tasks {
                    task.stop();
                    if let Some(controller) = &task.controller {
                        self.release_items(controller, &task.addresses);
                    }
                    handles.push(task.handle);
                }
            }
        }

        for handle in handles {
            if let Err(e) = handle.await {
                warn!("poll loop ended abnormally: {}", e);
            }
        }
    }

    /// Active subscriptions, oldest first.
    pub fn list(&self) -> Vec<SubscriptionInfo> {
        let mut infos: Vec<SubscriptionInfo> = self
            .subscriptions
            .iter()
            .map(|entry| {
                let sub = entry.value();
                SubscriptionInfo {
                    token: entry.key().clone(),
                    tags: sub.tags.clone(),
                    controllers: sub
                        .tasks
                        .iter()
                        .filter_map(|t| t.controller.as_ref().map(|c| c.id().to_string()))
                        .collect(),
                    interval_ms: sub.interval.as_millis() as u64,
                    created_at: sub.created_at,
                }
            })
            .collect();
        infos.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.token.cmp(&b.token)));
        infos
    }

    /// Count one more subscriber per address; the first one registers the item.
    ///
    /// The driver call happens while the count's entry is held, so a concurrent
    /// release of the same address cannot interleave with it.
    fn retain_items(&self, controller: &Controller, addresses: &[String]) {
        for address in addresses {
            let mut count = self
                .item_refs
                .entry((controller.id().to_string(), address.clone()))
                .or_insert(0);
            *count += 1;
            if *count == 1 {
                controller.driver().add_items(std::slice::from_ref(address));
            }
        }
    }

    /// Drop one subscriber per address; the last one removes the item.
    fn release_items(&self, controller: &Controller, addresses: &[String]) {
        for address in addresses {
            let key = (controller.id().to_string(), address.clone());
            if let Entry::Occupied(mut entry) = self.item_refs.entry(key) {
                let count = entry.get_mut();
                *count = count.saturating_sub(1);
                if *count == 0 {
                    entry.remove();
                    controller.driver().remove_items(std::slice::from_ref(address));
                }
            }
        }
    }
}

impl fmt::Debug for PollScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PollScheduler")
            .field("subscriptions", &self.subscriptions.len())
            .finish()
    }
}

/// Delay before the next cycle, given how long this one took.
pub fn next_delay(interval: Duration, elapsed: Duration) -> Duration {
    interval.saturating_sub(elapsed).min(interval)
}

fn spawn_poll(
    controller: Arc<Controller>,
    packet: ControllerPacket,
    token: SubscriptionToken,
    interval: Duration,
    handler: UpdateHandler,
) -> PollTask {
    let generation = Arc::new(AtomicU64::new(0));
    let (cancel, cancelled) = watch::channel(false);
    let addresses = packet.addresses.clone();

    let handle = tokio::spawn(poll_loop(
        Arc::clone(&controller),
        packet,
        token,
        interval,
        handler,
        Arc::clone(&generation),
        cancelled,
    ));

    PollTask {
        controller: Some(controller),
        addresses,
        generation,
        cancel,
        handle,
    }
}

async fn poll_loop(
    controller: Arc<Controller>,
    packet: ControllerPacket,
    token: SubscriptionToken,
    interval: Duration,
    handler: UpdateHandler,
    generation: Arc<AtomicU64>,
    mut cancelled: watch::Receiver<bool>,
) {
    let issued = generation.load(Ordering::Acquire);

    loop {
        let started = Instant::now();
        let group = read_group(&controller, &packet).await;
        if let Some(e) = &group.error {
            debug!(%token, controller = %controller.id(), "poll cycle failed: {}", e);
        }

        handler(SubscriptionUpdate {
            token: token.clone(),
            controller: controller.id().to_string(),
            values: group.values,
        });

        if generation.load(Ordering::Acquire) != issued {
            break;
        }

        let delay = next_delay(interval, started.elapsed());
        if delay.is_zero() {
            tokio::task::yield_now().await;
            if *cancelled.borrow() {
                break;
            }
            continue;
        }

        tokio::select! {
            _ = cancelled.changed() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }

    debug!(%token, controller = %controller.id(), "poll loop stopped");
}

fn spawn_heartbeat(
    token: SubscriptionToken,
    interval: Duration,
    handler: UpdateHandler,
) -> PollTask {
    let generation = Arc::new(AtomicU64::new(0));
    let (cancel, mut cancelled) = watch::channel(false);
    // Empty updates carry no read, so never spin.
    let period = interval.max(Duration::from_millis(1));

    let handle = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancelled.changed() => break,
                _ = tokio::time::sleep(period) => {
                    handler(SubscriptionUpdate {
                        token: token.clone(),
                        controller: String::new(),
                        values: HashMap::new(),
                    });
                }
            }
        }
    });

    PollTask {
        controller: None,
        addresses: Vec::new(),
        generation,
        cancel,
        handle,
    }
}
