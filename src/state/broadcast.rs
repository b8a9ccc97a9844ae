use std::collections::HashMap;

use dashmap::DashMap;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

use crate::{
    dto::sse::ServerEvent,
    state::game::{GameId, PlayerId},
};

/// Fan-out of game events to one bounded channel per connected player.
///
/// Sends never block: a player whose channel is full or closed is dropped
/// from the registry and has to reconnect.
pub struct Broadcaster {
    channels: DashMap<GameId, HashMap<PlayerId, mpsc::Sender<ServerEvent>>>,
    capacity: usize,
}

impl Broadcaster {
    /// Create a broadcaster whose per-player channels hold `capacity` events.
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Open a fresh channel for `player`, closing any previous one.
    pub fn register(&self, game: GameId, player: PlayerId) -> mpsc::Receiver<ServerEvent> {
        let (tx, rx) = mpsc::channel(self.capacity);
        let replaced = self.channels.entry(game).or_default().insert(player, tx);
        debug!(
            game_id = %game,
            player_id = %player,
            replaced = replaced.is_some(),
            "registered event channel"
        );
        rx
    }

    /// Drop the channel of `player`. Returns whether one was registered.
    pub fn unregister(&self, game: &GameId, player: &PlayerId) -> bool {
        let removed = self
            .channels
            .get_mut(game)
            .and_then(|mut players| players.remove(player))
            .is_some();
        self.channels
            .remove_if(game, |_, players| players.is_empty());
        removed
    }

    /// Drop every channel of `game`.
    pub fn unregister_game(&self, game: &GameId) {
        self.channels.remove(game);
    }

    /// Whether `player` currently has an open channel.
    pub fn is_registered(&self, game: &GameId, player: &PlayerId) -> bool {
        self.channels
            .get(game)
            .is_some_and(|players| players.contains_key(player))
    }

    /// Number of open channels for `game`.
    pub fn connected(&self, game: &GameId) -> usize {
        self.channels.get(game).map_or(0, |players| players.len())
    }

    /// Deliver `event` to a single player.
    pub fn send_to(&self, game: &GameId, player: &PlayerId, event: ServerEvent) -> bool {
        let Some(tx) = self
            .channels
            .get(game)
            .and_then(|players| players.get(player).cloned())
        else {
            return false;
        };

        match deliver(&tx, event) {
            Ok(()) => true,
            Err(reason) => {
                warn!(game_id = %game, player_id = %player, reason, "event delivery failed");
                self.unregister_sender(game, player, &tx);
                false
            }
        }
    }

    /// Deliver `event` to every player of `game`, returning the number of successful sends.
    pub fn send_to_all(&self, game: &GameId, event: &ServerEvent) -> usize {
        let recipients: Vec<(PlayerId, mpsc::Sender<ServerEvent>)> = match self.channels.get(game) {
            Some(players) => players
                .iter()
                .map(|(player, tx)| (*player, tx.clone()))
                .collect(),
            None => return 0,
        };

        let mut delivered = 0;
        for (player, tx) in recipients {
            match deliver(&tx, event.clone()) {
                Ok(()) => delivered += 1,
                Err(reason) => {
                    warn!(
                        game_id = %game,
                        player_id = %player,
                        event = event.kind.as_str(),
                        reason,
                        "event delivery failed"
                    );
                    self.unregister_sender(game, &player, &tx);
                }
            }
        }
        delivered
    }

    /// Remove `player` only if their channel is still the one that failed.
    fn unregister_sender(
        &self,
        game: &GameId,
        player: &PlayerId,
        failed: &mpsc::Sender<ServerEvent>,
    ) {
        if let Some(mut players) = self.channels.get_mut(game) {
            if players
                .get(player)
                .is_some_and(|current| current.same_channel(failed))
            {
                players.remove(player);
            }
        }
        self.channels
            .remove_if(game, |_, players| players.is_empty());
    }
}

fn deliver(tx: &mpsc::Sender<ServerEvent>, event: ServerEvent) -> Result<(), &'static str> {
    tx.try_send(event).map_err(|err| match err {
        TrySendError::Full(_) => "channel full",
        TrySendError::Closed(_) => "channel closed",
    })
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::dto::sse::EventKind;

    #[test]
    fn send_to_all_skips_and_unregisters_failing_player() {
        let broadcaster = Broadcaster::new(4);
        let game = Uuid::new_v4();
        let players: Vec<PlayerId> = (0..3).map(|_| Uuid::new_v4()).collect();

        let mut first = broadcaster.register(game, players[0]);
        let dropped = broadcaster.register(game, players[1]);
        let mut third = broadcaster.register(game, players[2]);
        drop(dropped);

        let delivered = broadcaster.send_to_all(&game, &ServerEvent::bare(EventKind::QuestionStop));

        assert_eq!(delivered, 2);
        assert!(!broadcaster.is_registered(&game, &players[1]));
        assert_eq!(broadcaster.connected(&game), 2);
        assert_eq!(first.try_recv().unwrap().kind, EventKind::QuestionStop);
        assert_eq!(third.try_recv().unwrap().kind, EventKind::QuestionStop);
    }

    #[test]
    fn full_channel_counts_as_failure() {
        let broadcaster = Broadcaster::new(1);
        let game = Uuid::new_v4();
        let player = Uuid::new_v4();
        let mut rx = broadcaster.register(game, player);

        assert!(broadcaster.send_to(&game, &player, ServerEvent::bare(EventKind::Init)));
        assert!(!broadcaster.send_to(&game, &player, ServerEvent::bare(EventKind::QuestionStart)));
        assert!(!broadcaster.is_registered(&game, &player));
        assert_eq!(rx.try_recv().unwrap().kind, EventKind::Init);
    }

    #[test]
    fn events_arrive_in_emission_order() {
        let broadcaster = Broadcaster::new(8);
        let game = Uuid::new_v4();
        let player = Uuid::new_v4();
        let mut rx = broadcaster.register(game, player);

        for kind in [
            EventKind::QuestionStart,
            EventKind::QuestionStop,
            EventKind::ShowAnswer,
        ] {
            broadcaster.send_to_all(&game, &ServerEvent::bare(kind));
        }

        let received: Vec<EventKind> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|event| event.kind)
            .collect();
        assert_eq!(
            received,
            vec![
                EventKind::QuestionStart,
                EventKind::QuestionStop,
                EventKind::ShowAnswer
            ]
        );
    }

    #[test]
    fn registering_again_replaces_previous_channel() {
        let broadcaster = Broadcaster::new(4);
        let game = Uuid::new_v4();
        let player = Uuid::new_v4();
        let mut stale = broadcaster.register(game, player);
        let mut fresh = broadcaster.register(game, player);

        assert!(broadcaster.send_to(&game, &player, ServerEvent::bare(EventKind::Init)));
        assert!(stale.try_recv().is_err());
        assert_eq!(fresh.try_recv().unwrap().kind, EventKind::Init);
        assert_eq!(broadcaster.connected(&game), 1);
    }

    #[test]
    fn games_are_isolated() {
        let broadcaster = Broadcaster::new(4);
        let (game_a, game_b) = (Uuid::new_v4(), Uuid::new_v4());
        let mut rx_a = broadcaster.register(game_a, Uuid::new_v4());
        let mut rx_b = broadcaster.register(game_b, Uuid::new_v4());

        assert_eq!(
            broadcaster.send_to_all(&game_a, &ServerEvent::bare(EventKind::GameFinished)),
            1
        );
        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_err());
        assert!(!broadcaster.unregister(&game_b, &Uuid::new_v4()));
    }
}
