//! [`EventCursor`]: a lazy, paged walk over one group's event log.

use std::{collections::VecDeque, sync::Arc};

use drinkr_core::{
  Result,
  event::{DrinkEvent, EventId},
  store::GroupStore,
};
use uuid::Uuid;

use crate::{config::RetryPolicy, retry};

/// Events fetched from the store per round trip.
pub const EVENT_PAGE_SIZE: usize = 256;

/// Yields a group's events with `event_id` greater than the starting point,
/// in log order, fetching them from the store one page at a time.
///
/// The cursor is restartable: [`EventCursor::position`] is the id of the last
/// event handed out, and a new cursor started from it continues exactly where
/// this one stopped.
pub struct EventCursor<S> {
  store:     Arc<S>,
  retry:     RetryPolicy,
  group_id:  Uuid,
  position:  Option<EventId>,
  page:      VecDeque<DrinkEvent>,
  page_size: usize,
  exhausted: bool,
}

impl<S: GroupStore> EventCursor<S> {
  pub(crate) fn new(
    store: Arc<S>,
    retry: RetryPolicy,
    group_id: Uuid,
    after: Option<EventId>,
    page_size: usize,
  ) -> Self {
    Self {
      store,
      retry,
      group_id,
      position: after,
      page: VecDeque::new(),
      page_size: page_size.max(1),
      exhausted: false,
    }
  }

  pub fn group_id(&self) -> Uuid { self.group_id }

  /// Id of the last event returned by [`Self::next`], or the starting point if
  /// nothing has been returned yet.
  pub fn position(&self) -> Option<EventId> { self.position }

  pub async fn next(&mut self) -> Result<Option<DrinkEvent>> {
    if self.page.is_empty() && !self.exhausted {
      self.fill().await?;
    }
    let event = self.page.pop_front();
    if let Some(e) = &event {
      self.position = Some(e.event_id);
    }
    Ok(event)
  }

  /// Up to `n` further events.
  pub async fn take(&mut self, n: usize) -> Result<Vec<DrinkEvent>> {
    let mut out = Vec::with_capacity(n.min(self.page_size));
    while out.len() < n {
      match self.next().await? {
        Some(event) => out.push(event),
        None => break,
      }
    }
    Ok(out)
  }

  /// Drain the remainder of the log.
  pub async fn collect(mut self) -> Result<Vec<DrinkEvent>> {
    let mut out = Vec::new();
    while let Some(event) = self.next().await? {
      out.push(event);
    }
    Ok(out)
  }

  /// Fetch the next page. Only called once the buffered page is drained, so
  /// `position` is also the last event fetched.
  pub(crate) async fn fill(&mut self) -> Result<()> {
    let (store, group_id, after, limit) =
      (&self.store, self.group_id, self.position, self.page_size);
    let batch = retry::run(&self.retry, "list_events", || {
      store.list_events(group_id, after, limit)
    })
    .await?;
    self.exhausted = batch.len() < self.page_size;
    self.page.extend(batch);
    Ok(())
  }
}
