//! [`SyncHub`]: in-process fan-out of change notifications, one broadcast
//! channel per group.
//!
//! ```text
//! Engine (write path)
//!       │ ChangeNotification
//!       ▼
//! SyncHub
//!   └── groups: group_id → broadcast::Sender
//!         │
//!         ▼
//!   subscribers (SSE streams, one per connected client)
//! ```
//!
//! Delivery is best effort. A subscriber that falls more than the channel
//! capacity behind loses the oldest messages and must pull fresh state.

use std::{
  collections::HashMap,
  sync::{PoisonError, RwLock},
};

use drinkr_core::sync::{ChangeNotification, Notifier};
use tokio::sync::broadcast;
use uuid::Uuid;

pub struct SyncHub {
  capacity: usize,
  groups:   RwLock<HashMap<Uuid, broadcast::Sender<ChangeNotification>>>,
}

impl SyncHub {
  pub fn new(capacity: usize) -> Self {
    Self {
      capacity: capacity.max(1),
      groups:   RwLock::default(),
    }
  }

  /// Receive every notification published for `group_id` from now on.
  ///
  /// Also drops the channels of other groups whose subscribers have all
  /// gone, so abandoned groups do not wait for a notification to be pruned.
  pub fn subscribe(&self, group_id: Uuid) -> broadcast::Receiver<ChangeNotification> {
    let mut groups = self.groups.write().unwrap_or_else(PoisonError::into_inner);
    groups.retain(|id, tx| *id == group_id || tx.receiver_count() > 0);
    groups
      .entry(group_id)
      .or_insert_with(|| broadcast::channel(self.capacity).0)
      .subscribe()
  }

  #[cfg(test)]
  fn subscriber_count(&self, group_id: Uuid) -> usize {
    let groups = self.groups.read().unwrap_or_else(PoisonError::into_inner);
    groups.get(&group_id).map_or(0, |tx| tx.receiver_count())
  }
}

impl Notifier for SyncHub {
  fn notify(&self, notification: ChangeNotification) {
    let group_id = notification.group_id;
    let delivered = {
      let groups = self.groups.read().unwrap_or_else(PoisonError::into_inner);
      match groups.get(&group_id) {
        // send fails only when nobody is listening.
        Some(tx) => tx.send(notification).is_ok(),
        None => return,
      }
    };

    // Everyone has gone; drop the channel so idle groups cost nothing.
    if !delivered {
      let mut groups = self.groups.write().unwrap_or_else(PoisonError::into_inner);
      if groups.get(&group_id).is_some_and(|tx| tx.receiver_count() == 0) {
        groups.remove(&group_id);
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use drinkr_core::{
    sync::{Change, MembershipChange},
    user::UserId,
  };

  use super::*;

  fn joined(group_id: Uuid, user: &str) -> ChangeNotification {
    ChangeNotification {
      group_id,
      change: Change::MembershipChanged {
        user_id: UserId::from(user),
        change:  MembershipChange::Joined,
        role:    None,
      },
    }
  }

  #[tokio::test]
  async fn subscribers_only_see_their_group() {
    let hub = SyncHub::new(8);
    let (g1, g2) = (Uuid::new_v4(), Uuid::new_v4());
    let mut rx1 = hub.subscribe(g1);
    let mut rx2 = hub.subscribe(g2);

    hub.notify(joined(g1, "a"));

    assert_eq!(rx1.recv().await.unwrap(), joined(g1, "a"));
    assert!(matches!(
      rx2.try_recv(),
      Err(broadcast::error::TryRecvError::Empty)
    ));
  }

  #[test]
  fn unsubscribed_groups_are_dropped() {
    let hub = SyncHub::new(8);
    let g = Uuid::new_v4();
    let rx = hub.subscribe(g);
    assert_eq!(hub.subscriber_count(g), 1);

    drop(rx);
    hub.notify(joined(g, "a"));
    assert_eq!(hub.subscriber_count(g), 0);
    assert!(hub.groups.read().unwrap().is_empty());
  }

  #[test]
  fn subscribing_prunes_abandoned_groups() {
    let hub = SyncHub::new(8);
    let (g1, g2, g3) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    drop(hub.subscribe(g1));
    let _kept = hub.subscribe(g2);

    let _rx = hub.subscribe(g3);
    let groups = hub.groups.read().unwrap();
    assert!(!groups.contains_key(&g1));
    assert!(groups.contains_key(&g2));
    assert!(groups.contains_key(&g3));
  }

  #[tokio::test]
  async fn lagging_subscriber_is_told_so() {
    let hub = SyncHub::new(2);
    let g = Uuid::new_v4();
    let mut rx = hub.subscribe(g);
    for user in ["a", "b", "c"] {
      hub.notify(joined(g, user));
    }
    assert!(matches!(
      rx.recv().await,
      Err(broadcast::error::RecvError::Lagged(1))
    ));
    assert_eq!(rx.recv().await.unwrap(), joined(g, "b"));
  }
}
