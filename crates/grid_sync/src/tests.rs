// Include tests
#[cfg(test)]
mod tests {
    use crate::connection::ConnectionId;
    use crate::dispatch::Inbox;
    use crate::messaging::{Achievements, ServerMessage};
    use crate::*;
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn world() -> WorldConfig {
        WorldConfig {
            seed: Some(7),
            ..Default::default()
        }
    }

    fn engine_with(store: Arc<dyn PlayerStore>) -> Engine {
        Engine::new(&world(), store)
    }

    async fn connect(engine: &Engine) -> (ConnectionId, Inbox) {
        let (outbox, inbox) = mpsc::unbounded_channel();
        let connection_id = engine.allocate_connection_id();
        let outcome = engine
            .process(GameEvent::Connect {
                connection_id,
                outbox,
            })
            .await;
        assert_eq!(outcome, Outcome::Applied);
        (connection_id, inbox)
    }

    async fn join(engine: &Engine, connection_id: ConnectionId, name: &str, room: &str) -> Outcome {
        engine
            .process(GameEvent::Join {
                connection_id,
                identity: Identity::from(name),
                room: Some(RoomId::from(room)),
            })
            .await
    }

    async fn move_to(engine: &Engine, connection_id: ConnectionId, x: i32, y: i32) -> Outcome {
        engine
            .process(GameEvent::Move {
                connection_id,
                position: Position::new(x, y),
            })
            .await
    }

    async fn disconnect(engine: &Engine, connection_id: ConnectionId) -> Outcome {
        engine
            .process(GameEvent::Disconnect { connection_id })
            .await
    }

    fn drain(inbox: &mut Inbox) -> Vec<ServerMessage> {
        let mut messages = Vec::new();
        while let Ok(message) = inbox.try_recv() {
            messages.push(message.as_ref().clone());
        }
        messages
    }

    fn names(messages: &[ServerMessage]) -> Vec<&'static str> {
        messages.iter().map(ServerMessage::event_name).collect()
    }

    /// A backend that is down for every call.
    struct UnavailableStore;

    #[async_trait]
    impl PlayerStore for UnavailableStore {
        async fn find_stats(&self, _: &Identity) -> Result<Option<StatsRecord>, StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }

        async fn upsert_stats(&self, _: StatsRecord) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }

        async fn find_avatar(&self, _: &Identity) -> Result<Option<String>, StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }

        async fn update_achievements(&self, _: &Identity, _: Achievements) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
    }

    #[tokio::test]
    async fn test_multi_tab_session_lifecycle() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine_with(store.clone());
        let alice = Identity::from("A");

        let (observer, mut observer_inbox) = connect(&engine).await;
        assert_eq!(join(&engine, observer, "B", "main").await, Outcome::Applied);
        drain(&mut observer_inbox);

        let (tab_one, mut tab_one_inbox) = connect(&engine).await;
        assert_eq!(join(&engine, tab_one, "A", "main").await, Outcome::Applied);
        let first_bootstrap = drain(&mut tab_one_inbox);
        assert_eq!(
            names(&first_bootstrap),
            vec!["player_data", "game_state", "cell_painted", "grid_state"]
        );
        let first_view = match &first_bootstrap[0] {
            ServerMessage::PlayerData(view) => view.clone(),
            other => panic!("unexpected message {other:?}"),
        };
        assert_eq!(
            names(&drain(&mut observer_inbox)),
            vec!["player_joined", "cell_painted", "grid_state"]
        );

        let spawn = engine.presence_of(&alice).await.unwrap().position;
        let target = if spawn == Position::new(3, 4) {
            Position::new(4, 4)
        } else {
            Position::new(3, 4)
        };

        assert_eq!(move_to(&engine, tab_one, target.x, target.y).await, Outcome::Applied);
        let seen = drain(&mut observer_inbox);
        assert_eq!(names(&seen), vec!["player_moved", "cell_painted"]);
        match &seen[1] {
            ServerMessage::CellPainted(cell) => {
                assert_eq!((cell.x, cell.y), (target.x, target.y));
                assert_eq!(cell.username, alice);
            }
            other => panic!("unexpected message {other:?}"),
        }
        {
            let state = engine.state().lock().await;
            // The spawn cell is never cleared by moving away
            assert_eq!(state.grid().owner_of(spawn), Some(&alice));
            assert_eq!(state.grid().owner_of(target), Some(&alice));
        }

        // Second tab gets a bootstrap; nobody hears about it
        let (tab_two, mut tab_two_inbox) = connect(&engine).await;
        drain(&mut tab_one_inbox);
        assert_eq!(join(&engine, tab_two, "A", "main").await, Outcome::Applied);
        let second_bootstrap = drain(&mut tab_two_inbox);
        assert_eq!(
            names(&second_bootstrap),
            vec!["player_data", "game_state", "grid_state"]
        );
        match &second_bootstrap[0] {
            ServerMessage::PlayerData(view) => {
                assert_eq!(view.username, alice);
                assert_eq!(view.color, first_view.color);
                assert_eq!(view.position, target);
            }
            other => panic!("unexpected message {other:?}"),
        }
        assert!(drain(&mut observer_inbox).is_empty());
        assert!(drain(&mut tab_one_inbox).is_empty());

        assert_eq!(disconnect(&engine, tab_one).await, Outcome::Applied);
        assert!(drain(&mut observer_inbox).is_empty());
        assert!(store.stats_of(&alice).is_none());
        assert!(engine.presence_of(&alice).await.is_some());

        assert_eq!(disconnect(&engine, tab_two).await, Outcome::Applied);
        assert_eq!(
            drain(&mut observer_inbox),
            vec![ServerMessage::PlayerLeft {
                username: alice.clone()
            }]
        );
        assert!(engine.presence_of(&alice).await.is_none());

        let stats = store.stats_of(&alice).unwrap();
        assert_eq!(stats.games_played, 1);
        assert_eq!(stats.total_score, 2);
        assert_eq!(stats.max_score, 2);
        assert_eq!(stats.min_score, 2);
    }

    #[tokio::test]
    async fn test_ownership_flips_to_latest_painter() {
        let engine = engine_with(Arc::new(MemoryStore::new()));
        let alice = Identity::from("A");
        let bob = Identity::from("B");

        let (a, _a_inbox) = connect(&engine).await;
        let (b, _b_inbox) = connect(&engine).await;
        join(&engine, a, "A", "main").await;
        join(&engine, b, "B", "main").await;

        assert_eq!(move_to(&engine, a, 10, 10).await, Outcome::Applied);
        let before = engine.score_of(&alice).await;
        assert_eq!(move_to(&engine, b, 10, 10).await, Outcome::Applied);

        let state = engine.state().lock().await;
        assert_eq!(state.grid().owner_of(Position::new(10, 10)), Some(&bob));
        assert_eq!(state.score_of(&alice), before - 1);
    }

    #[tokio::test]
    async fn test_late_joiner_sees_existing_players() {
        let engine = engine_with(Arc::new(MemoryStore::new()));
        let (a, _a_inbox) = connect(&engine).await;
        let (b, mut b_inbox) = connect(&engine).await;
        join(&engine, a, "A", "main").await;
        join(&engine, b, "B", "main").await;

        let bootstrap = drain(&mut b_inbox);
        match &bootstrap[1] {
            ServerMessage::GameState { players } => {
                assert_eq!(players.len(), 1);
                assert_eq!(players[0].username, Identity::from("A"));
            }
            other => panic!("unexpected message {other:?}"),
        }
        match bootstrap.last() {
            Some(ServerMessage::GridState { user_colors, .. }) => {
                assert!(user_colors.contains_key(&Identity::from("A")));
                assert!(user_colors.contains_key(&Identity::from("B")));
            }
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_rooms_scope_broadcasts() {
        let engine = engine_with(Arc::new(MemoryStore::new()));
        let (a, _a_inbox) = connect(&engine).await;
        let (b, mut b_inbox) = connect(&engine).await;
        join(&engine, a, "A", "side").await;
        join(&engine, b, "B", "main").await;
        drain(&mut b_inbox);

        assert_eq!(move_to(&engine, a, 1, 1).await, Outcome::Applied);
        assert_eq!(disconnect(&engine, a).await, Outcome::Applied);
        assert!(drain(&mut b_inbox).is_empty());
    }

    #[tokio::test]
    async fn test_rejoin_keeps_color_and_position() {
        let engine = engine_with(Arc::new(MemoryStore::new()));
        let alice = Identity::from("A");

        let (first, _first_inbox) = connect(&engine).await;
        join(&engine, first, "A", "main").await;
        move_to(&engine, first, 12, 6).await;
        let before = engine.presence_of(&alice).await.unwrap();
        disconnect(&engine, first).await;

        let (second, _second_inbox) = connect(&engine).await;
        join(&engine, second, "A", "side").await;
        let after = engine.presence_of(&alice).await.unwrap();

        assert_eq!(after.color, before.color);
        assert_eq!(after.position, Position::new(12, 6));
        assert_eq!(after.room, RoomId::from("side"));
    }

    #[tokio::test]
    async fn test_stats_accumulate_across_sessions() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine_with(store.clone());
        let alice = Identity::from("A");

        let mut scores = Vec::new();
        for steps in [1, 4, 0] {
            let (conn, _inbox) = connect(&engine).await;
            join(&engine, conn, "A", "main").await;
            for step in 0..steps {
                move_to(&engine, conn, step, 20).await;
            }
            scores.push(engine.score_of(&alice).await);
            disconnect(&engine, conn).await;
        }

        let stats = store.stats_of(&alice).unwrap();
        assert_eq!(stats.games_played, 3);
        assert_eq!(stats.total_score, scores.iter().sum::<u64>());
        assert_eq!(stats.max_score, *scores.iter().max().unwrap());
        assert_eq!(stats.min_score, *scores.iter().min().unwrap());
        assert!(stats.min_score <= stats.max_score);
        assert!((stats.average_score - stats.total_score as f64 / 3.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_invalid_events_are_dropped() {
        let engine = engine_with(Arc::new(MemoryStore::new()));

        assert_eq!(
            move_to(&engine, 999, 1, 1).await,
            Outcome::Dropped(DropReason::NotJoined)
        );
        assert_eq!(
            disconnect(&engine, 999).await,
            Outcome::Dropped(DropReason::UnknownConnection)
        );
        assert_eq!(
            join(&engine, 999, "A", "main").await,
            Outcome::Dropped(DropReason::UnknownConnection)
        );

        let (conn, _inbox) = connect(&engine).await;
        assert_eq!(
            move_to(&engine, conn, 1, 1).await,
            Outcome::Dropped(DropReason::NotJoined)
        );
        assert_eq!(join(&engine, conn, "A", "main").await, Outcome::Applied);
        assert_eq!(
            join(&engine, conn, "A", "main").await,
            Outcome::Dropped(DropReason::AlreadyJoined)
        );
        assert_eq!(
            move_to(&engine, conn, 25, 0).await,
            Outcome::Dropped(DropReason::OutOfBounds)
        );
        assert_eq!(
            move_to(&engine, conn, -1, 3).await,
            Outcome::Dropped(DropReason::OutOfBounds)
        );

        // A never-joined connection closes silently
        let (bare, _bare_inbox) = connect(&engine).await;
        assert_eq!(disconnect(&engine, bare).await, Outcome::Applied);
    }

    #[tokio::test]
    async fn test_store_outage_does_not_block_sessions() {
        let engine = engine_with(Arc::new(UnavailableStore));
        let (observer, mut observer_inbox) = connect(&engine).await;
        join(&engine, observer, "B", "main").await;

        let (conn, _inbox) = connect(&engine).await;
        assert_eq!(join(&engine, conn, "A", "main").await, Outcome::Applied);
        assert_eq!(
            engine.presence_of(&Identity::from("A")).await.unwrap().avatar,
            None
        );
        assert_eq!(disconnect(&engine, conn).await, Outcome::Applied);
        assert_eq!(
            names(&drain(&mut observer_inbox)).last(),
            Some(&"player_left")
        );

        let outcome = engine
            .process(GameEvent::AchievementUpdate {
                identity: Identity::from("A"),
                achievements: Achievements::new(),
            })
            .await;
        assert_eq!(outcome, Outcome::Applied);
    }

    #[tokio::test]
    async fn test_avatar_and_achievements_pass_through() {
        let store = Arc::new(MemoryStore::new());
        let alice = Identity::from("A");
        store.set_avatar(alice.clone(), "avatars/a.png");
        let engine = engine_with(store.clone());

        let (conn, mut inbox) = connect(&engine).await;
        join(&engine, conn, "A", "main").await;
        match drain(&mut inbox).first() {
            Some(ServerMessage::PlayerData(view)) => {
                assert_eq!(view.avatar.as_deref(), Some("avatars/a.png"));
            }
            other => panic!("unexpected message {other:?}"),
        }

        let mut flags = Achievements::new();
        flags.insert("fiftyPoints".into(), true);
        engine
            .process(GameEvent::AchievementUpdate {
                identity: alice.clone(),
                achievements: flags.clone(),
            })
            .await;
        assert_eq!(store.achievements_of(&alice), Some(flags));
    }

    #[tokio::test]
    async fn test_tab_joining_while_last_tab_closes_gets_avatar() {
        let store = Arc::new(MemoryStore::new());
        let alice = Identity::from("A");
        store.set_avatar(alice.clone(), "avatars/a.png");
        let engine = Arc::new(engine_with(store.clone()));

        let (tab_one, _tab_one_inbox) = connect(&engine).await;
        join(&engine, tab_one, "A", "main").await;
        let (tab_two, mut tab_two_inbox) = connect(&engine).await;

        // Queue the join and the close behind a held lock, join first
        let guard = engine.state().lock().await;
        let joining = tokio::spawn({
            let engine = engine.clone();
            async move { join(&engine, tab_two, "A", "main").await }
        });
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        let closing = tokio::spawn({
            let engine = engine.clone();
            async move { disconnect(&engine, tab_one).await }
        });
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        drop(guard);

        assert_eq!(joining.await.unwrap(), Outcome::Applied);
        assert_eq!(closing.await.unwrap(), Outcome::Applied);

        let record = engine.presence_of(&alice).await.unwrap();
        assert_eq!(record.avatar.as_deref(), Some("avatars/a.png"));
        match drain(&mut tab_two_inbox).first() {
            Some(ServerMessage::PlayerData(view)) => {
                assert_eq!(view.avatar.as_deref(), Some("avatars/a.png"));
            }
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_rejoin_after_full_disconnect_looks_avatar_up() {
        let store = Arc::new(MemoryStore::new());
        let alice = Identity::from("A");
        store.set_avatar(alice.clone(), "avatars/a.png");
        let engine = Arc::new(engine_with(store.clone()));

        let (tab_one, _tab_one_inbox) = connect(&engine).await;
        join(&engine, tab_one, "A", "main").await;
        assert_eq!(disconnect(&engine, tab_one).await, Outcome::Applied);
        assert!(engine.presence_of(&alice).await.is_none());

        let (tab_two, _tab_two_inbox) = connect(&engine).await;
        assert_eq!(join(&engine, tab_two, "A", "main").await, Outcome::Applied);
        assert_eq!(
            engine.presence_of(&alice).await.unwrap().avatar.as_deref(),
            Some("avatars/a.png")
        );
    }

    #[tokio::test]
    async fn test_connection_limit_refuses_extra_sockets() {
        use tokio_tungstenite::connect_async;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let config = ServerConfig {
            max_connections: 1,
            world: world(),
            ..Default::default()
        };
        let server = Arc::new(create_server_with_config(config, Arc::new(MemoryStore::new())));
        assert_eq!(server.config().max_connections, 1);
        let serving = server.clone();
        tokio::spawn(async move { serving.serve(listener).await });

        let (first, _) = connect_async(format!("ws://{addr}")).await.unwrap();
        assert_eq!(server.active_connections(), 1);

        let refused = tokio::time::timeout(
            Duration::from_secs(5),
            connect_async(format!("ws://{addr}")),
        )
        .await
        .expect("timed out waiting for refusal");
        assert!(refused.is_err());
        assert_eq!(server.active_connections(), 1);

        drop(first);
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while server.active_connections() > 0 {
            assert!(tokio::time::Instant::now() < deadline, "connection never released");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        server.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_avatar_change_applies_to_active_identity() {
        let engine = engine_with(Arc::new(MemoryStore::new()));
        let alice = Identity::from("A");
        let change = |avatar: &str| GameEvent::AvatarChange {
            identity: alice.clone(),
            avatar: Some(avatar.to_string()),
        };

        assert_eq!(
            engine.process(change("early.png")).await,
            Outcome::Dropped(DropReason::NotJoined)
        );

        let (conn, _inbox) = connect(&engine).await;
        join(&engine, conn, "A", "main").await;
        assert_eq!(engine.process(change("new.png")).await, Outcome::Applied);
        assert_eq!(
            engine.presence_of(&alice).await.unwrap().avatar.as_deref(),
            Some("new.png")
        );
    }

    #[tokio::test]
    async fn test_concurrent_moves_keep_scores_consistent() {
        let engine = Arc::new(engine_with(Arc::new(MemoryStore::new())));
        let mut inboxes = Vec::new();
        let mut tasks = Vec::new();

        for name in ["A", "B", "C", "D"] {
            let (conn, inbox) = connect(&engine).await;
            join(&engine, conn, name, "main").await;
            inboxes.push(inbox);

            let engine = engine.clone();
            tasks.push(tokio::spawn(async move {
                for step in 0..50 {
                    move_to(&engine, conn, step % 5, step % 7).await;
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let state = engine.state().lock().await;
        let total: u64 = ["A", "B", "C", "D"]
            .iter()
            .map(|name| state.score_of(&Identity::from(*name)))
            .sum();
        assert_eq!(total as usize, state.grid().painted_count());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_websocket_round_trip() {
        use futures_util::{SinkExt, StreamExt};
        use tokio_tungstenite::{connect_async, tungstenite::Message};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let config = ServerConfig {
            world: world(),
            ..Default::default()
        };
        let server = Arc::new(create_server_with_config(config, Arc::new(MemoryStore::new())));
        let serving = server.clone();
        tokio::spawn(async move { serving.serve(listener).await });

        let (mut socket, _) = connect_async(format!("ws://{addr}")).await.unwrap();

        async fn next_event(
            socket: &mut (impl StreamExt<Item = Result<Message, tokio_tungstenite::tungstenite::Error>>
                      + Unpin),
        ) -> serde_json::Value {
            loop {
                let frame = tokio::time::timeout(Duration::from_secs(5), socket.next())
                    .await
                    .expect("timed out waiting for a frame")
                    .unwrap()
                    .unwrap();
                if let Message::Text(text) = frame {
                    return serde_json::from_str(text.as_str()).unwrap();
                }
            }
        }

        socket
            .send(Message::Text(
                r#"{"event":"join_game","data":{"username":"alice"}}"#.into(),
            ))
            .await
            .unwrap();
        let mut seen = Vec::new();
        for _ in 0..4 {
            seen.push(next_event(&mut socket).await["event"].as_str().unwrap().to_string());
        }
        assert_eq!(seen, ["player_data", "game_state", "cell_painted", "grid_state"]);

        // Garbage is logged and ignored; the connection stays usable
        socket.send(Message::Text("not json".into())).await.unwrap();
        socket
            .send(Message::Text(
                r#"{"event":"move","data":{"position":{"x":2,"y":3}}}"#.into(),
            ))
            .await
            .unwrap();
        let moved = next_event(&mut socket).await;
        assert_eq!(moved["event"], "player_moved");
        assert_eq!(moved["data"]["position"]["x"], 2);
        assert_eq!(next_event(&mut socket).await["event"], "cell_painted");

        server.shutdown().await.unwrap();
    }
}
