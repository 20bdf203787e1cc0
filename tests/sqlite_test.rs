//! Daemon over a real SQLite file, including a restart

mod harness;

use std::sync::Arc;

use duelist::combat::dice::ScriptedDice;
use duelist::persistence::{CharacterRepository, SessionStatus, TurnAction};
use duelist::Daemon;
use harness::{test_config, warrior, COMMUNITY};
use tempfile::TempDir;

async fn open(path: &str) -> Daemon {
    Daemon::with_dice(test_config(), Some(path), Arc::new(ScriptedDice::new([2])))
        .await
        .expect("Failed to open daemon")
}

#[tokio::test]
async fn test_battle_survives_restart() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let db_path = temp_dir.path().join("duelist.db");
    let db_path = db_path.to_str().unwrap();

    let battle_id = {
        let daemon = open(db_path).await;
        let store = daemon.store();
        store.upsert_character(&warrior("alice")).await.unwrap();
        store.upsert_character(&warrior("bob")).await.unwrap();

        let service = daemon.service();
        let pending = service
            .create_challenge(COMMUNITY, "alice", "bob")
            .await
            .unwrap();
        service.accept_challenge(&pending.id, "bob").await.unwrap();
        service.perform_defend(&pending.id, "alice").unwrap();
        service.flush().await;

        let turns = store.turns_for(&pending.id).await.unwrap();
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].action, TurnAction::Defend);
        pending.id
    };

    let daemon = open(db_path).await;
    let report = daemon.recover().await.unwrap();
    assert_eq!(report.resumed, 1);
    assert_eq!(report.aborted, 0);

    let service = daemon.service();
    let battle = service.get_battle(&battle_id).unwrap();
    assert_eq!(battle.current_turn.as_deref(), Some("bob"));
    assert_eq!(battle.turn_number, 2);
    // The defend bonus is restored with the session
    assert_eq!(battle.effective_ac_bonus("alice"), 2);

    service.forfeit(&battle_id, "bob").unwrap();
    service.flush().await;

    let store = daemon.store();
    let session = store.session(&battle_id).await.unwrap().unwrap();
    assert_eq!(session.status, SessionStatus::Completed);
    assert_eq!(session.winner.as_deref(), Some("alice"));

    let alice = store.find_character(COMMUNITY, "alice").await.unwrap().unwrap();
    assert_eq!(alice.progression.wins, 1);
    let bob = store.find_character(COMMUNITY, "bob").await.unwrap().unwrap();
    assert_eq!(bob.progression.losses, 1);
}

#[tokio::test]
async fn test_daemon_shutdown_stops_run() {
    let daemon = Arc::new(open_memory().await);
    let runner = {
        let daemon = daemon.clone();
        tokio::spawn(async move { daemon.run().await })
    };

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    daemon.shutdown();
    tokio::time::timeout(std::time::Duration::from_secs(5), runner)
        .await
        .expect("daemon did not stop")
        .unwrap()
        .unwrap();
}

async fn open_memory() -> Daemon {
    Daemon::new(test_config(), None).await.unwrap()
}
