//! Session runtime integration tests
//!
//! Drive sessions end to end through the directory with a scripted
//! completion backend: streamed and blocking turns, failure handling,
//! mention ordering, forking, concurrency and the event bridge.

mod common;

use std::sync::Arc;
use std::time::Duration;

use a3s_chorus::llm::{CompletionError, MessageContent, Role};
use a3s_chorus::mention::parse_mentions;
use a3s_chorus::pool::InvocationPool;
use a3s_chorus::stream::{self, event_frame};
use a3s_chorus::types::{SYSTEM_SPEAKER, USER_SPEAKER};
use a3s_chorus::{ChatEvent, SessionStore, Subscription};
use common::{event_data, event_names, fixture, parse_records, Script};
use futures::StreamExt;
use tokio::sync::Notify;

fn drain(sub: &mut Subscription) -> Vec<ChatEvent> {
    std::iter::from_fn(|| sub.try_recv()).collect()
}

// ─── Scenarios ───────────────────────────────────────────────────

#[tokio::test]
async fn test_streamed_reply_scenario() {
    let fx = fixture();
    fx.client.push("dev", Script::Reply(vec!["Hi", " there"]));

    let session = fx.directory.create(Some("S"), "be terse").await.unwrap();
    let mut events = session.subscribe();

    let names = fx.agents.snapshot();
    let mentioned = parse_mentions("@Dev hello", &names.names());
    assert_eq!(mentioned, vec!["Dev"]);

    session.chat("@Dev hello", vec![], &mentioned).await.unwrap();

    let history = session.messages().await;
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].speaker, USER_SPEAKER);
    assert_eq!(history[0].content, "@Dev hello");
    assert_eq!(history[1].speaker, "Dev");
    assert_eq!(history[1].content, "Hi there");

    let events = drain(&mut events);
    assert_eq!(
        events,
        vec![
            ChatEvent::StreamStart {
                speaker: "Dev".into()
            },
            ChatEvent::StreamDelta {
                speaker: "Dev".into(),
                delta: "Hi".into()
            },
            ChatEvent::StreamDelta {
                speaker: "Dev".into(),
                delta: " there".into()
            },
            ChatEvent::StreamEnd {
                speaker: "Dev".into(),
                content: "Hi there".into()
            },
        ]
    );

    let request = &fx.client.requests()[0];
    assert_eq!(request.messages[0].role, Role::System);
    assert!(request.messages[0].content.text().ends_with("be terse"));

    // Persisted with the reply
    let saved = fx.store.load(session.id()).await.unwrap().unwrap();
    assert_eq!(saved.messages.len(), 2);
}

#[tokio::test]
async fn test_unknown_agent_scenario() {
    let fx = fixture();
    let session = fx.directory.create(Some("S"), "").await.unwrap();
    session.add_user_message("hello", vec![]).await.unwrap();
    let mut events = session.subscribe();

    assert_eq!(session.invoke_agent("Ghost").await.unwrap(), None);

    let events = drain(&mut events);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].name(), "message");
    assert_eq!(events[0].speaker(), SYSTEM_SPEAKER);
    assert_eq!(session.messages().await.len(), 1);
    assert!(fx.client.requests().is_empty());
}

#[tokio::test]
async fn test_delete_missing_message_scenario() {
    let fx = fixture();
    let session = fx.directory.create(Some("S"), "").await.unwrap();
    session.add_user_message("keep me", vec![]).await.unwrap();
    let before = session.messages().await;

    assert!(!session.delete_message("not-a-message").await.unwrap());
    assert_eq!(session.messages().await, before);
}

// ─── Turn termination ────────────────────────────────────────────

#[tokio::test]
async fn test_failure_mid_stream_still_ends_turn() {
    let fx = fixture();
    fx.client.push(
        "dev",
        Script::FailAfter(
            vec!["partial"],
            CompletionError::Network("connection reset".into()),
        ),
    );
    let session = fx.directory.create(Some("S"), "").await.unwrap();
    let mut events = session.subscribe();

    let reply = session.invoke_agent("Dev").await.unwrap().unwrap();
    assert!(reply.starts_with("[invocation failed] NetworkError"));

    let events = drain(&mut events);
    let terminal: Vec<_> = events.iter().filter(|e| e.is_terminal()).collect();
    assert_eq!(terminal.len(), 1);
    assert_eq!(
        terminal[0],
        &ChatEvent::StreamEnd {
            speaker: "Dev".into(),
            content: reply.clone()
        }
    );
    assert_eq!(events.last().unwrap().name(), "stream_end");

    let history = session.messages().await;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].content, reply);
}

#[tokio::test]
async fn test_failure_before_stream_still_ends_turn() {
    let fx = fixture();
    fx.client.push(
        "dev",
        Script::Fail(CompletionError::Auth {
            status: 401,
            body: "bad key".into(),
        }),
    );
    let session = fx.directory.create(Some("S"), "").await.unwrap();
    let mut events = session.subscribe();

    session.invoke_agent("Dev").await.unwrap();

    let names: Vec<_> = drain(&mut events).iter().map(|e| e.name()).collect();
    assert_eq!(names, vec!["stream_start", "stream_end"]);
    assert!(session.messages().await[0]
        .content
        .starts_with("[invocation failed] AuthError"));
}

#[tokio::test]
async fn test_blocking_agent_failure_is_one_message() {
    let fx = fixture();
    fx.client.push(
        "critic",
        Script::Fail(CompletionError::RateLimited {
            status: 429,
            body: "slow down".into(),
        }),
    );
    let session = fx.directory.create(Some("S"), "").await.unwrap();
    let mut events = session.subscribe();

    session.invoke_agent("Critic").await.unwrap();

    let events = drain(&mut events);
    assert_eq!(events.len(), 1);
    match &events[0] {
        ChatEvent::Message { speaker, content } => {
            assert_eq!(speaker, "Critic");
            assert!(content.starts_with("[invocation failed] RateLimited"));
        }
        other => panic!("unexpected event: {:?}", other),
    }
    assert_eq!(session.messages().await.len(), 1);
}

// ─── Mentions ────────────────────────────────────────────────────

#[tokio::test]
async fn test_chat_appends_n_plus_one_in_mention_order() {
    let fx = fixture();
    fx.client.push("pm", Script::Reply(vec!["Ship the MVP."]));
    fx.client.push("critic", Script::Reply(vec!["Too risky."]));
    fx.client.push("dev", Script::Reply(vec!["Two days."]));

    let session = fx.directory.create(Some("S"), "").await.unwrap();
    let message = "@PM scope it, @Critic poke holes, @Dev estimate. @PM again";
    let registry = fx.agents.snapshot();
    let mentioned = parse_mentions(message, &registry.names());
    assert_eq!(mentioned, vec!["PM", "Critic", "Dev"]);

    let user_id = session.chat(message, vec![], &mentioned).await.unwrap();

    let history = session.messages().await;
    let speakers: Vec<_> = history.iter().map(|m| m.speaker.as_str()).collect();
    assert_eq!(speakers, vec![USER_SPEAKER, "PM", "Critic", "Dev"]);
    assert_eq!(history[0].id, user_id);

    // Dev, invoked last, saw both earlier replies as other participants
    let requests = fx.client.requests();
    let dev_request = requests.iter().find(|r| r.model == "dev").unwrap();
    let replayed: Vec<_> = dev_request.messages[1..]
        .iter()
        .map(|m| (m.role, m.content.text()))
        .collect();
    assert_eq!(
        replayed,
        vec![
            (Role::User, format!("[user]: {message}")),
            (Role::User, "[PM]: Ship the MVP.".to_string()),
            (Role::User, "[Critic]: Too risky.".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_own_turns_replay_as_assistant() {
    let fx = fixture();
    fx.client.push("dev", Script::Reply(vec!["first"]));
    fx.client.push("dev", Script::Reply(vec!["second"]));
    let session = fx.directory.create(Some("S"), "").await.unwrap();

    session
        .chat("@Dev go", vec![], &["Dev".to_string()])
        .await
        .unwrap();
    session
        .chat("@Dev again", vec!["aGVsbG8=".into()], &["Dev".to_string()])
        .await
        .unwrap();

    let second = &fx.client.requests()[1];
    assert_eq!(second.messages[2].role, Role::Assistant);
    assert_eq!(second.messages[2].content.text(), "first");
    match &second.messages[3].content {
        MessageContent::Parts(parts) => assert_eq!(parts.len(), 2),
        other => panic!("expected multimodal parts, got {:?}", other),
    }
}

// ─── Registry hot swap ───────────────────────────────────────────

#[tokio::test]
async fn test_registry_swap_applies_to_next_invocation() {
    let fx = fixture();
    let session = fx.directory.create(Some("S"), "").await.unwrap();

    fx.agents.replace(
        a3s_chorus::AgentRegistry::new(vec![common::agent("Newcomer", "new")]).unwrap(),
    );
    fx.client.push("new", Script::Reply(vec!["hello"]));

    assert_eq!(session.invoke_agent("Dev").await.unwrap(), None);
    assert_eq!(
        session.invoke_agent("Newcomer").await.unwrap().as_deref(),
        Some("hello")
    );
}

// ─── Fork ────────────────────────────────────────────────────────

#[tokio::test]
async fn test_fork_is_prefix_with_fresh_ids() {
    let fx = fixture();
    fx.client.push("dev", Script::Reply(vec!["reply one"]));
    fx.client.push("dev", Script::Reply(vec!["reply two"]));

    let source = fx.directory.create(Some("Source"), "be terse").await.unwrap();
    source
        .chat("@Dev one", vec![], &["Dev".to_string()])
        .await
        .unwrap();
    source
        .chat("@Dev two", vec![], &["Dev".to_string()])
        .await
        .unwrap();
    let source_history = source.messages().await;
    let cut = &source_history[1];

    let fork = fx
        .directory
        .fork(source.id(), &cut.id, Some("Branch"))
        .await
        .unwrap();
    let forked = fork.snapshot().await;

    assert_eq!(forked.name, "Branch");
    assert_eq!(forked.global_prompt, "be terse");
    assert_eq!(forked.messages.len(), 2);
    for (copy, original) in forked.messages.iter().zip(&source_history) {
        assert_eq!(copy.speaker, original.speaker);
        assert_eq!(copy.content, original.content);
        assert_ne!(copy.id, original.id);
    }
    assert!(fx.store.load(fork.id()).await.unwrap().is_some());

    // Source untouched
    assert_eq!(source.messages().await.len(), 4);
}

#[tokio::test]
async fn test_fork_missing_message_is_not_found() {
    let fx = fixture();
    let source = fx.directory.create(Some("S"), "").await.unwrap();
    let err = fx
        .directory
        .fork(source.id(), "nope", None)
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

// ─── Concurrency ─────────────────────────────────────────────────

#[tokio::test]
async fn test_sessions_do_not_block_each_other() {
    let fx = fixture();
    let gate = Arc::new(Notify::new());
    fx.client.push("dev", Script::Gated(gate.clone(), vec!["late"]));
    fx.client.push("pm", Script::Reply(vec!["quick"]));

    let slow = fx.directory.create(Some("slow"), "").await.unwrap();
    let fast = fx.directory.create(Some("fast"), "").await.unwrap();

    let slow_task = {
        let slow = slow.clone();
        tokio::spawn(async move { slow.invoke_agent("Dev").await })
    };

    let quick = tokio::time::timeout(Duration::from_secs(2), fast.invoke_agent("PM"))
        .await
        .expect("other session was not blocked")
        .unwrap();
    assert_eq!(quick.as_deref(), Some("quick"));

    gate.notify_one();
    let late = slow_task.await.unwrap().unwrap();
    assert_eq!(late.as_deref(), Some("late"));
}

#[tokio::test]
async fn test_concurrent_appends_keep_unique_ids() {
    let fx = fixture();
    let session = fx.directory.create(Some("S"), "").await.unwrap();

    let handles: Vec<_> = (0..20)
        .map(|i| {
            let session = session.clone();
            tokio::spawn(async move {
                session
                    .add_user_message(&format!("msg {i}"), vec![])
                    .await
                    .unwrap()
            })
        })
        .collect();

    let mut ids = Vec::new();
    for handle in handles {
        ids.push(handle.await.unwrap());
    }

    let history = session.messages().await;
    assert_eq!(history.len(), 20);
    let mut stored: Vec<_> = history.iter().map(|m| m.id.clone()).collect();
    stored.sort();
    stored.dedup();
    assert_eq!(stored.len(), 20);
    ids.sort();
    assert_eq!(ids, stored);
}

#[tokio::test]
async fn test_same_agent_invocations_are_serialized() {
    let fx = fixture();
    let gate = Arc::new(Notify::new());
    fx.client.push("dev", Script::Gated(gate.clone(), vec!["first"]));
    fx.client.push("dev", Script::Reply(vec!["second"]));

    let session = fx.directory.create(Some("S"), "").await.unwrap();
    let first = {
        let session = session.clone();
        tokio::spawn(async move { session.invoke_agent("Dev").await })
    };

    // Wait until the first invocation has reached the backend
    while fx.client.requests().is_empty() {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let second = {
        let session = session.clone();
        tokio::spawn(async move { session.invoke_agent("Dev").await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(fx.client.requests().len(), 1);

    gate.notify_one();
    first.await.unwrap().unwrap();
    second.await.unwrap().unwrap();

    let requests = fx.client.requests();
    assert_eq!(requests.len(), 2);
    let last = requests[1].messages.last().unwrap();
    assert_eq!(last.role, Role::Assistant);
    assert_eq!(last.content.text(), "first");

    let contents: Vec<_> = session
        .messages()
        .await
        .into_iter()
        .map(|m| m.content)
        .collect();
    assert_eq!(contents, vec!["first", "second"]);
}

// ─── Event bridge ────────────────────────────────────────────────

#[tokio::test]
async fn test_bridge_emits_every_event_before_done() {
    let fx = fixture();
    let chunks: Vec<&'static str> = vec!["a"; 200];
    fx.client.push("dev", Script::Reply(chunks));

    let session = fx.directory.create(Some("S"), "").await.unwrap();
    let pool = InvocationPool::new(2);

    let subscription = session.subscribe();
    let task = {
        let session = session.clone();
        pool.spawn(async move {
            session
                .chat("@Dev go", vec![], &["Dev".to_string()])
                .await
        })
    };

    let body: Vec<String> = stream::event_stream(
        session.id().to_string(),
        subscription,
        task,
        |outcome, _| {
            let id = outcome.ok().and_then(|r| r.ok());
            vec![event_frame(
                "user_message_id",
                serde_json::json!({ "message_id": id }),
            )]
        },
    )
    .map(|r| r.unwrap())
    .collect()
    .await;

    let records = parse_records(&body.concat());
    assert_eq!(records[0], ("0".to_string(), serde_json::json!("")));

    let names = event_names(&records);
    assert_eq!(names.first().map(String::as_str), Some("session"));
    assert_eq!(names.iter().filter(|n| *n == "stream_delta").count(), 200);
    let tail: Vec<_> = names[names.len() - 3..].iter().map(String::as_str).collect();
    assert_eq!(tail, vec!["stream_end", "user_message_id", "done"]);

    let start = event_data(&records, "stream_start").unwrap();
    let end = event_data(&records, "stream_end").unwrap();
    assert_eq!(start["message_id"], end["message_id"]);
    assert_eq!(end["content"].as_str().unwrap().len(), 200);

    let user_id = event_data(&records, "user_message_id").unwrap()["message_id"]
        .as_str()
        .unwrap()
        .to_string();
    assert_eq!(session.messages().await[0].id, user_id);

    // Listener removed once the body finished
    assert_eq!(session.listener_count(), 0);
}

#[tokio::test]
async fn test_dropped_body_keeps_invocation_running() {
    let fx = fixture();
    let gate = Arc::new(Notify::new());
    fx.client.push("dev", Script::Gated(gate.clone(), vec!["persisted"]));

    let session = fx.directory.create(Some("S"), "").await.unwrap();
    let pool = InvocationPool::new(1);
    let subscription = session.subscribe();
    let task = {
        let session = session.clone();
        pool.spawn(async move { session.invoke_agent("Dev").await })
    };

    let mut body = Box::pin(stream::event_stream(
        session.id().to_string(),
        subscription,
        task,
        |_, _| Vec::new(),
    ));
    // Read the open and session records, then disconnect
    body.next().await.unwrap().unwrap();
    body.next().await.unwrap().unwrap();
    drop(body);
    assert_eq!(session.listener_count(), 0);

    gate.notify_one();
    for _ in 0..100 {
        if !session.messages().await.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let saved = fx.store.load(session.id()).await.unwrap().unwrap();
    assert_eq!(saved.messages[0].content, "persisted");
}
