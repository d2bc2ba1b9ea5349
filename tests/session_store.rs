//! Session persistence through the public store API

use tempfile::TempDir;

use tutor_cli::core::{ConversationBuffer, ModelId, Role, SessionStore};
use tutor_cli::storage::{ChatSession, JsonSessionStore, SessionMessage};

fn conversation(question: &str, answer: &str) -> ChatSession {
    let mut buffer = ConversationBuffer::new();
    buffer.append_user(question);
    let pending = buffer.reserve_reply(ModelId::Llama);
    let reply = buffer.take_reply(pending.message_id).unwrap();
    buffer.complete_reply(reply, answer, Some(ModelId::Llama));
    buffer.snapshot()
}

#[test]
fn test_sessions_survive_restart() {
    let temp = TempDir::new().unwrap();
    let first = conversation("What is a VLAN?", "A VLAN is...");
    let second = conversation("What is a trunk?", "A trunk carries...");
    {
        let store = JsonSessionStore::new(temp.path()).unwrap();
        store.upsert(&first).unwrap();
        store.upsert(&second).unwrap();
    }

    let store = JsonSessionStore::new(temp.path()).unwrap();
    let loaded = store.load();
    assert_eq!(loaded, vec![second.clone(), first.clone()]);

    let resumed = ConversationBuffer::from_session(loaded[1].clone());
    assert_eq!(resumed.title(), "What is a VLAN?");
    assert_eq!(resumed.messages()[1].model_used, Some(ModelId::Llama));
}

#[test]
fn test_one_corrupt_record_among_valid_ones() {
    let temp = TempDir::new().unwrap();
    let store = JsonSessionStore::new(temp.path()).unwrap();
    let sessions = [
        conversation("one", "1"),
        conversation("two", "2"),
        conversation("three", "3"),
    ];

    let mut records: Vec<serde_json::Value> = sessions
        .iter()
        .map(|s| serde_json::to_value(s).unwrap())
        .collect();
    // Message without a role
    records.insert(
        1,
        serde_json::json!({
            "id": "session_bad",
            "title": "bad",
            "messages": [{"id": 1, "content": "x", "timestamp": "2024-05-01T10:00:00Z"}],
            "createdAt": "2024-05-01T10:00:00Z"
        }),
    );
    std::fs::write(
        store.path(),
        serde_json::to_string(&records).unwrap(),
    )
    .unwrap();

    let loaded = store.load();
    assert_eq!(loaded.len(), 3);
    let titles: Vec<&str> = loaded.iter().map(|s| s.title.as_str()).collect();
    assert_eq!(titles, vec!["one", "two", "three"]);

    // The next write drops the corrupt record
    store.upsert(&sessions[1]).unwrap();
    let raw = std::fs::read_to_string(store.path()).unwrap();
    assert!(!raw.contains("session_bad"));
}

#[test]
fn test_invalid_utf8_record_does_not_wipe_store() {
    let temp = TempDir::new().unwrap();
    let store = JsonSessionStore::new(temp.path()).unwrap();
    let sessions = [
        conversation("one", "1"),
        conversation("two", "2"),
        conversation("three", "3"),
    ];
    store.save_all(&sessions).unwrap();

    // Splice a record whose title holds a lone 0xff byte before the closing bracket
    let mut bytes = std::fs::read(store.path()).unwrap();
    let close = bytes.iter().rposition(|b| *b == b']').unwrap();
    bytes.truncate(close);
    bytes.extend_from_slice(
        b",{\"id\":\"session_bad\",\"title\":\"\xff\",\"messages\":[],\"createdAt\":\"2024-05-01T10:00:00Z\"}]",
    );
    std::fs::write(store.path(), &bytes).unwrap();

    let loaded = store.load();
    for session in &sessions {
        assert!(loaded.iter().any(|s| s.id == session.id));
    }

    store.upsert(&conversation("four", "4")).unwrap();
    let after = store.load();
    assert!(after.len() >= 4);
    for session in &sessions {
        assert!(after.iter().any(|s| s.id == session.id));
    }
}

#[test]
fn test_export_document() {
    let temp = TempDir::new().unwrap();
    let store = JsonSessionStore::new(temp.path()).unwrap();
    let mut session = conversation("Explain NAT", "NAT translates...");
    session
        .messages
        .push(SessionMessage::new(3, Role::User, "and PAT?"));
    store.upsert(&session).unwrap();

    let document = store.get(&session.id).unwrap().export();
    assert_eq!(document.session_id, session.id);
    assert_eq!(document.messages.len(), 3);
    assert_eq!(document.messages[2].content, "and PAT?");

    let value = serde_json::to_value(&document).unwrap();
    assert!(value["exportedAt"].is_string());
    assert!(value["messages"][0].get("modelUsed").is_none());
    assert!(store.get("session_missing").is_err());
}
