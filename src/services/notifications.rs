use tokio::sync::broadcast;

use crate::models::ListEvent;

const CHANNEL_CAPACITY: usize = 256;

/// Fan-out of list mutations to whatever renders or observes them
///
/// Publishing never blocks and never fails the mutation that triggered it;
/// slow subscribers lose the oldest events.
#[derive(Clone)]
pub struct ListEvents {
    tx: broadcast::Sender<ListEvent>,
}

impl Default for ListEvents {
    fn default() -> Self {
        Self::new()
    }
}

impl ListEvents {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn publish(&self, event: ListEvent) {
        let kind = event.kind();
        let user_id = event.user_id();
        match self.tx.send(event) {
            Ok(receivers) => {
                tracing::debug!(event = kind, user_id = %user_id, receivers, "List event published")
            }
            Err(_) => tracing::trace!(event = kind, user_id = %user_id, "No list event subscribers"),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ListEvent> {
        self.tx.subscribe()
    }

    /// Spawns a task that logs every event until the channel closes
    pub fn spawn_logger(&self) -> tokio::task::JoinHandle<()> {
        let mut rx = self.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => log_event(&event),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "List event logger lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}

fn log_event(event: &ListEvent) {
    match event {
        ListEvent::FilmAdded {
            user_id,
            entry,
            created,
        } => tracing::info!(
            user_id = %user_id,
            entry_id = %entry.entry_id,
            title = %entry.title,
            order = entry.order,
            new_film = created,
            "Film added to list"
        ),
        ListEvent::FilmRemoved {
            user_id,
            entry_id,
            film_id,
        } => tracing::info!(
            user_id = %user_id,
            entry_id = %entry_id,
            film_id = %film_id,
            "Film removed from list"
        ),
        ListEvent::ListReordered { user_id, changed } => {
            tracing::info!(user_id = %user_id, changed, "List reordered")
        }
        ListEvent::ImageAttached {
            user_id,
            film_id,
            image,
        } => tracing::info!(
            user_id = %user_id,
            film_id = %film_id,
            image = %image,
            "Poster image attached"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UserId;

    #[tokio::test]
    async fn test_subscribers_receive_published_events() {
        let events = ListEvents::new();
        let mut rx = events.subscribe();

        let user_id = UserId::new();
        events.publish(ListEvent::ListReordered {
            user_id,
            changed: 3,
        });

        let received = rx.recv().await.unwrap();
        assert_eq!(received.user_id(), user_id);
        assert_eq!(received.kind(), "list_reordered");
    }

    #[test]
    fn test_publish_without_subscribers_is_silent() {
        let events = ListEvents::new();
        events.publish(ListEvent::ListReordered {
            user_id: UserId::new(),
            changed: 0,
        });
    }
}
