//! Notification bus
//!
//! Subscriptions are registered once, when the run list is built, in terms
//! of [`ResourceHandle`]s. After each resource the engine posts whether it
//! changed; the bus performs immediate notifications on the spot and queues
//! delayed ones. The delayed queue holds each `(target, action)` pair once,
//! in the order it was first queued, and is drained a single time at the
//! end of the run.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::resource::ResourceId;
use crate::types::{Action, ApplyResult};

/// What makes a subscription fire
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    /// The source resource changed during this run
    #[default]
    Changed,
    /// The source resource was evaluated, changed or not
    Always,
}

/// When a notified action is performed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Timing {
    /// Right after the source resource
    #[serde(alias = "immediately")]
    Immediate,
    /// Once, after every resource has been evaluated
    #[default]
    Delayed,
}

impl fmt::Display for Timing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Immediate => "immediately",
            Self::Delayed => "delayed",
        })
    }
}

/// Position of a resource in the run list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceHandle(pub usize);

impl ResourceHandle {
    pub fn index(self) -> usize {
        self.0
    }
}

/// A resolved notification edge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subscription {
    pub source: ResourceHandle,
    pub trigger: Trigger,
    pub target: ResourceHandle,
    pub action: Action,
    pub timing: Timing,
}

/// A notified action the bus asks the engine to perform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    pub source: ResourceHandle,
    pub target: ResourceHandle,
    pub action: Action,
    pub timing: Timing,
}

/// A notified action that was performed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FiredNotification {
    pub source: ResourceId,
    pub target: ResourceId,
    pub action: Action,
    pub timing: Timing,
    pub result: ApplyResult,
}

impl fmt::Display for FiredNotification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {} :{} ({}): {}",
            self.source, self.target, self.action, self.timing, self.result
        )
    }
}

/// Routes change records to subscribed actions
#[derive(Debug, Default)]
pub struct NotificationBus {
    subscriptions: Vec<Subscription>,
    queue: Vec<Delivery>,
}

impl NotificationBus {
    pub fn new(subscriptions: impl IntoIterator<Item = Subscription>) -> Self {
        Self {
            subscriptions: subscriptions.into_iter().collect(),
            queue: Vec::new(),
        }
    }

    pub fn register(&mut self, subscription: Subscription) {
        self.subscriptions.push(subscription);
    }

    /// Post the outcome of `source`
    ///
    /// Immediate subscriptions are handed to `perform` in registration
    /// order; delayed ones are queued unless their `(target, action)` pair
    /// is already waiting. Stops at the first error from `perform`.
    pub fn notify<E>(
        &mut self,
        source: ResourceHandle,
        changed: bool,
        mut perform: impl FnMut(Delivery) -> Result<(), E>,
    ) -> Result<(), E> {
        let matching: Vec<Subscription> = self
            .subscriptions
            .iter()
            .filter(|s| s.source == source && (changed || s.trigger == Trigger::Always))
            .copied()
            .collect();

        for sub in matching {
            let delivery = Delivery {
                source: sub.source,
                target: sub.target,
                action: sub.action,
                timing: sub.timing,
            };
            match sub.timing {
                Timing::Immediate => perform(delivery)?,
                Timing::Delayed => self.enqueue(delivery),
            }
        }
        Ok(())
    }

    fn enqueue(&mut self, delivery: Delivery) {
        let queued = self
            .queue
            .iter()
            .any(|d| d.target == delivery.target && d.action == delivery.action);
        if queued {
            log::debug!(
                "Delayed :{} on #{} already queued",
                delivery.action,
                delivery.target.0
            );
        } else {
            self.queue.push(delivery);
        }
    }

    /// Delayed notifications waiting for the end of the run
    pub fn pending(&self) -> &[Delivery] {
        &self.queue
    }

    /// Perform every queued delayed notification once, emptying the queue
    pub fn drain<E>(&mut self, mut perform: impl FnMut(Delivery) -> Result<(), E>) -> Result<(), E> {
        for delivery in std::mem::take(&mut self.queue) {
            perform(delivery)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sub(source: usize, target: usize, action: Action, timing: Timing) -> Subscription {
        Subscription {
            source: ResourceHandle(source),
            trigger: Trigger::Changed,
            target: ResourceHandle(target),
            action,
            timing,
        }
    }

    fn collect(bus: &mut NotificationBus, source: usize, changed: bool) -> Vec<Delivery> {
        let mut fired = Vec::new();
        bus.notify::<()>(ResourceHandle(source), changed, |d| {
            fired.push(d);
            Ok(())
        })
        .unwrap();
        fired
    }

    #[test]
    fn test_immediate_fires_only_on_change() {
        let mut bus = NotificationBus::new([sub(0, 2, Action::Restart, Timing::Immediate)]);

        assert!(collect(&mut bus, 0, false).is_empty());
        let fired = collect(&mut bus, 0, true);
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].target, ResourceHandle(2));
        assert!(bus.pending().is_empty());
    }

    #[test]
    fn test_always_trigger_fires_without_change() {
        let mut bus = NotificationBus::default();
        bus.register(Subscription {
            trigger: Trigger::Always,
            ..sub(0, 1, Action::Run, Timing::Immediate)
        });
        assert_eq!(collect(&mut bus, 0, false).len(), 1);
    }

    #[test]
    fn test_delayed_dedup_keeps_first_order() {
        let mut bus = NotificationBus::new([
            sub(0, 5, Action::Restart, Timing::Delayed),
            sub(1, 6, Action::Run, Timing::Delayed),
            sub(2, 5, Action::Restart, Timing::Delayed),
            sub(3, 5, Action::Reload, Timing::Delayed),
        ]);

        for source in 0..4 {
            assert!(collect(&mut bus, source, true).is_empty());
        }
        assert_eq!(bus.pending().len(), 3);

        let mut drained = Vec::new();
        bus.drain::<()>(|d| {
            drained.push((d.target.0, d.action));
            Ok(())
        })
        .unwrap();

        assert_eq!(
            drained,
            vec![(5, Action::Restart), (6, Action::Run), (5, Action::Reload)]
        );
        assert!(bus.pending().is_empty());
    }

    #[test]
    fn test_notify_stops_at_first_error() {
        let mut bus = NotificationBus::new([
            sub(0, 1, Action::Restart, Timing::Immediate),
            sub(0, 2, Action::Restart, Timing::Immediate),
        ]);
        let mut calls = 0;
        let result = bus.notify(ResourceHandle(0), true, |_| {
            calls += 1;
            Err("boom")
        });
        assert_eq!(result, Err("boom"));
        assert_eq!(calls, 1);
    }
}
