// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::Connection;
use serde_json::{json, Value};

use sqlsage::agent::orchestrator::CANCELLED_NOTICE;
use sqlsage::agent::state::NOT_EXECUTED_NOTICE;
use sqlsage::agent::{AbortReason, ConversationState, LoopObserver};
use sqlsage::checkpoint::{CheckpointStore, MemoryCheckpointStore};
use sqlsage::database::{Database, SqliteDatabase};
use sqlsage::error::{Error, Result};
use sqlsage::llm::message::{ActionRequest, Message, Role};
use sqlsage::llm::mock_provider::{MockProvider, MockResponse, MockToolCall};
use sqlsage::session::{Capabilities, RunConfig, Session};

fn sakila() -> Arc<dyn Database> {
    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch(
        "CREATE TABLE actor (
            actor_id INTEGER PRIMARY KEY,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL
        );
        CREATE TABLE film (
            film_id INTEGER PRIMARY KEY,
            title TEXT NOT NULL,
            release_year INTEGER,
            rental_rate REAL
        );
        CREATE TABLE film_actor (
            actor_id INTEGER NOT NULL REFERENCES actor(actor_id),
            film_id INTEGER NOT NULL REFERENCES film(film_id),
            PRIMARY KEY (actor_id, film_id)
        );
        INSERT INTO actor VALUES (1, 'PENELOPE', 'GUINESS'), (2, 'NICK', 'WAHLBERG');
        INSERT INTO film VALUES
            (1, 'ACADEMY DINOSAUR', 2006, 0.99),
            (2, 'ACE GOLDFINGER', 2006, 4.99),
            (3, 'ADAPTATION HOLES', 2006, 2.99);
        INSERT INTO film_actor VALUES (1, 1), (1, 2), (2, 3);",
    )
    .unwrap();
    Arc::new(SqliteDatabase::from_connection(conn))
}

fn scripted(script: Vec<MockResponse>) -> Arc<MockProvider> {
    Arc::new(MockProvider::new().with_script(script))
}

fn config(thread_id: &str, provider: Arc<MockProvider>, database: Arc<dyn Database>) -> RunConfig {
    RunConfig::new(thread_id, Capabilities::new(provider, "test-model", database))
}

fn roles(messages: &[Message]) -> Vec<Role> {
    messages.iter().map(|m| m.role).collect()
}

fn content_json(message: &Message) -> Value {
    serde_json::from_str(&message.content).unwrap()
}

#[tokio::test]
async fn test_list_tables_then_answer() {
    let session = Session::in_memory();
    let provider = scripted(vec![
        MockResponse::tool_call("call_1", "list_tables", json!({})),
        MockResponse::text("The database has three tables: actor, film and film_actor."),
    ]);

    let transcript = session
        .run_turn("What tables are there?", config("a", provider.clone(), sakila()))
        .await
        .unwrap();

    assert_eq!(
        roles(&transcript.messages),
        vec![Role::System, Role::User, Role::Assistant, Role::Tool, Role::Assistant]
    );
    let tool = &transcript.messages[3];
    assert_eq!(tool.responding_to.as_deref(), Some("call_1"));
    assert!(!tool.is_error);
    assert_eq!(
        content_json(tool)["tables"],
        json!(["actor", "film", "film_actor"])
    );
    assert_eq!(
        transcript.final_answer,
        "The database has three tables: actor, film and film_actor."
    );
    assert_eq!(transcript.steps, 2);
    assert!(transcript.last_query_sql.is_none());

    // The second model call saw the tool result
    let requests = provider.recorded_requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1].messages.len(), 4);
}

#[tokio::test]
async fn test_drop_rejected_then_corrected_select() {
    let session = Session::in_memory();
    let database = sakila();
    let provider = scripted(vec![
        MockResponse::tool_call("call_1", "run_query", json!({"query": "DROP TABLE film"})),
        MockResponse::tool_call(
            "call_2",
            "run_query",
            json!({"query": "SELECT COUNT(*) AS film_count FROM film"}),
        ),
        MockResponse::text("There are 3 films."),
    ]);

    let transcript = session
        .run_turn("How many films are there?", config("b", provider, database.clone()))
        .await
        .unwrap();

    let tools: Vec<&Message> = transcript
        .messages
        .iter()
        .filter(|m| m.role == Role::Tool)
        .collect();
    assert_eq!(tools.len(), 2);
    assert!(tools[0].is_error);
    assert_eq!(content_json(tools[0])["error"]["kind"], "Rejected");
    assert!(!tools[1].is_error);
    assert_eq!(content_json(tools[1])["rows"], json!([[3]]));

    assert_eq!(transcript.final_answer, "There are 3 films.");
    assert_eq!(
        transcript.last_query_sql.as_deref(),
        Some("SELECT COUNT(*) AS film_count FROM film")
    );
    assert_eq!(transcript.steps, 3);

    // The table is still there
    assert!(database
        .list_tables()
        .await
        .unwrap()
        .contains(&"film".to_string()));
}

#[tokio::test]
async fn test_describe_missing_table_recovers() {
    let session = Session::in_memory();
    let provider = scripted(vec![
        MockResponse::tool_call("call_1", "describe_table", json!({"table_name": "ghost"})),
        MockResponse::text("There is no table named ghost."),
    ]);

    let transcript = session
        .run_turn("Describe the ghost table", config("c", provider, sakila()))
        .await
        .unwrap();

    let tool = &transcript.messages[3];
    assert!(tool.is_error);
    assert_eq!(content_json(tool)["error"]["kind"], "NotFound");
    assert_eq!(transcript.final_answer, "There is no table named ghost.");
}

#[derive(Default)]
struct ActionCounter {
    actions: AtomicUsize,
}

impl LoopObserver for ActionCounter {
    fn on_action(&self, _request: &ActionRequest) {
        self.actions.fetch_add(1, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn test_step_bound_aborts_after_one_assistant_message() {
    let session = Session::in_memory();
    let database = sakila();
    let provider = scripted(vec![MockResponse::tool_call(
        "call_1",
        "list_tables",
        json!({}),
    )]);
    let counter = Arc::new(ActionCounter::default());

    let report = session
        .run_turn(
            "Keep going",
            config("d", provider.clone(), database.clone())
                .with_max_steps(1)
                .with_observer(counter.clone()),
        )
        .await
        .unwrap_err();

    assert_eq!(
        report.reason,
        AbortReason::RecursionLimitExceeded { max_steps: 1 }
    );
    assert_eq!(
        roles(&report.messages),
        vec![Role::System, Role::User, Role::Assistant]
    );
    assert_eq!(counter.actions.load(Ordering::SeqCst), 0);
    assert_eq!(provider.call_count(), 1);
    assert!(report.user_message().contains("1 reasoning steps"));

    // The unanswered request is closed when the thread is resumed
    let retry = scripted(vec![MockResponse::text("There are three tables.")]);
    let transcript = session
        .run_turn("Just answer", config("d", retry, database))
        .await
        .unwrap();
    let repair = &transcript.messages[3];
    assert_eq!(repair.role, Role::Tool);
    assert_eq!(repair.responding_to.as_deref(), Some("call_1"));
    assert_eq!(repair.content, NOT_EXECUTED_NOTICE);
    assert_eq!(transcript.final_answer, "There are three tables.");
}

#[tokio::test]
async fn test_actions_answered_in_issue_order() {
    let session = Session::in_memory();
    let provider = scripted(vec![
        MockResponse::tool_calls(vec![
            MockToolCall::new("c_a", "describe_table", json!({"table_name": "film"})),
            MockToolCall::new("c_b", "list_tables_tool", json!({})),
            MockToolCall::new("c_c", "execute_sql_tool", json!({"query": "SELECT 1"})),
        ]),
        MockResponse::text("done"),
    ]);

    let transcript = session
        .run_turn("Look around", config("order", provider, sakila()))
        .await
        .unwrap();

    let answered: Vec<&str> = transcript.messages[3..6]
        .iter()
        .map(|m| {
            assert_eq!(m.role, Role::Tool);
            m.responding_to.as_deref().unwrap()
        })
        .collect();
    assert_eq!(answered, vec!["c_a", "c_b", "c_c"]);
    assert_eq!(transcript.messages[6].role, Role::Assistant);
}

#[tokio::test]
async fn test_follow_up_question_on_same_thread() {
    let session = Session::in_memory();
    let database = sakila();

    let first = scripted(vec![
        MockResponse::tool_call(
            "call_1",
            "run_query",
            json!({"query": "SELECT COUNT(*) FROM actor"}),
        ),
        MockResponse::text("There are 2 actors."),
    ]);
    session
        .run_turn("How many actors?", config("multi", first, database.clone()))
        .await
        .unwrap();

    let second = scripted(vec![MockResponse::text("Their names are Penelope and Nick.")]);
    let transcript = session
        .run_turn("What are their names?", config("multi", second.clone(), database))
        .await
        .unwrap();

    let systems = transcript
        .messages
        .iter()
        .filter(|m| m.role == Role::System)
        .count();
    assert_eq!(systems, 1);
    assert_eq!(transcript.run_start, 5);
    assert_eq!(
        roles(transcript.run_messages()),
        vec![Role::User, Role::Assistant]
    );
    assert_eq!(transcript.steps, 1);
    // This run issued no SQL
    assert!(transcript.last_query_sql.is_none());
    // The model saw the whole thread
    assert_eq!(second.last_request().unwrap().messages.len(), 6);

    let history = session.history("multi").await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].sql.as_deref(), Some("SELECT COUNT(*) FROM actor"));
    assert_eq!(history[0].response.as_deref(), Some("There are 2 actors."));
    assert_eq!(history[1].query, "What are their names?");
    assert!(history[1].sql.is_none());
}

#[tokio::test]
async fn test_request_ids_unique_across_turns() {
    let session = Session::in_memory();
    let database = sakila();

    for question in ["What tables are there?", "And now?"] {
        let provider = scripted(vec![
            MockResponse::tool_call("call_1", "list_tables", json!({})),
            MockResponse::text("actor, film and film_actor."),
        ]);
        session
            .run_turn(question, config("dup", provider, database.clone()))
            .await
            .unwrap();
    }

    let saved = session.store().load("dup").await.unwrap().unwrap();
    let ids: Vec<&str> = saved
        .messages()
        .iter()
        .flat_map(|m| m.requested_actions.iter().map(|r| r.id.as_str()))
        .collect();
    assert_eq!(ids.len(), 2);
    assert_eq!(ids[0], "call_1");
    assert_ne!(ids[1], "call_1");

    // Each answer attaches to its own request
    let answered: Vec<&str> = saved
        .messages()
        .iter()
        .filter(|m| m.role == Role::Tool)
        .filter_map(|m| m.responding_to.as_deref())
        .collect();
    assert_eq!(answered, ids);
}

#[tokio::test]
async fn test_threads_are_isolated() {
    let session = Arc::new(Session::in_memory());

    let run = |thread: &'static str, question: &'static str| {
        let session = session.clone();
        async move {
            let provider = Arc::new(
                MockProvider::new()
                    .with_script(vec![
                        MockResponse::tool_call(format!("{}_1", thread), "list_tables", json!({})),
                        MockResponse::text(format!("answer for {}", thread)),
                    ])
                    .with_delay(Duration::from_millis(10)),
            );
            session
                .run_turn(question, config(thread, provider, sakila()))
                .await
                .unwrap()
        }
    };

    let (left, right) = tokio::join!(run("left", "question left"), run("right", "question right"));

    assert_eq!(left.final_answer, "answer for left");
    assert_eq!(right.final_answer, "answer for right");
    assert!(left.messages.iter().all(|m| !m.content.contains("question right")));
    assert!(right.messages.iter().all(|m| !m.content.contains("question left")));

    let ids_left: Vec<_> = left.messages.iter().map(|m| m.id).collect();
    assert!(right.messages.iter().all(|m| !ids_left.contains(&m.id)));
    assert_eq!(session.threads().await.unwrap(), vec!["left", "right"]);
}

#[tokio::test]
async fn test_same_thread_runs_queue() {
    let session = Arc::new(Session::in_memory());
    let provider = Arc::new(
        MockProvider::new()
            .with_response("ok")
            .with_delay(Duration::from_millis(30)),
    );
    let database = sakila();

    let first = {
        let session = session.clone();
        let config = config("shared", provider.clone(), database.clone());
        tokio::spawn(async move { session.run_turn("first", config).await })
    };
    let second = {
        let session = session.clone();
        let config = config("shared", provider.clone(), database.clone());
        tokio::spawn(async move { session.run_turn("second", config).await })
    };

    first.await.unwrap().unwrap();
    second.await.unwrap().unwrap();

    let state = session.store().load("shared").await.unwrap().unwrap();
    assert_eq!(
        roles(state.messages()),
        vec![
            Role::System,
            Role::User,
            Role::Assistant,
            Role::User,
            Role::Assistant
        ]
    );
}

#[tokio::test]
async fn test_resume_closes_dangling_requests() {
    let store = Arc::new(MemoryCheckpointStore::new());

    let mut interrupted = ConversationState::new("resume");
    interrupted.push(Message::system("sys")).unwrap();
    interrupted.push(Message::user("old question")).unwrap();
    interrupted
        .push(Message::assistant_with_actions(
            "",
            vec![
                ActionRequest::new("old_1", "list_tables", json!({})),
                ActionRequest::new("old_2", "list_tables", json!({})),
            ],
        ))
        .unwrap();
    interrupted
        .push(Message::tool_result("old_1", "{\"tables\":[]}", false))
        .unwrap();
    interrupted.step_count = 1;
    store.save("resume", &interrupted).await.unwrap();

    let session = Session::new(store.clone());
    let provider = scripted(vec![MockResponse::text("fresh answer")]);
    let transcript = session
        .run_turn("new question", config("resume", provider, sakila()))
        .await
        .unwrap();

    let repair = &transcript.messages[4];
    assert_eq!(repair.role, Role::Tool);
    assert_eq!(repair.responding_to.as_deref(), Some("old_2"));
    assert!(repair.is_error);
    assert_eq!(repair.content, NOT_EXECUTED_NOTICE);

    assert_eq!(transcript.run_start, 5);
    assert_eq!(transcript.messages[5].content, "new question");
    assert_eq!(transcript.final_answer, "fresh answer");
    assert_eq!(transcript.steps, 1);

    // Earlier history is untouched
    assert_eq!(&transcript.messages[..4], interrupted.messages());
}

struct CancelOnFirstAction {
    flag: Arc<AtomicBool>,
}

impl LoopObserver for CancelOnFirstAction {
    fn on_action(&self, _request: &ActionRequest) {
        self.flag.store(true, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn test_cancellation_leaves_thread_resumable() {
    let session = Session::in_memory();
    let database = sakila();
    let flag = Arc::new(AtomicBool::new(false));

    let provider = scripted(vec![MockResponse::tool_calls(vec![
        MockToolCall::new("c1", "list_tables", json!({})),
        MockToolCall::new("c2", "describe_table", json!({"table_name": "film"})),
    ])]);
    let report = session
        .run_turn(
            "cancel me",
            config("cancel", provider.clone(), database.clone())
                .with_cancel_flag(flag.clone())
                .with_observer(Arc::new(CancelOnFirstAction { flag: flag.clone() })),
        )
        .await
        .unwrap_err();

    assert_eq!(report.reason, AbortReason::Cancelled);
    assert_eq!(provider.call_count(), 1);

    let saved = session.store().load("cancel").await.unwrap().unwrap();
    let last = saved.messages().last().unwrap();
    assert_eq!(last.responding_to.as_deref(), Some("c2"));
    assert_eq!(last.content, CANCELLED_NOTICE);
    assert!(saved.pending_actions().is_empty());

    let retry = scripted(vec![MockResponse::text("resumed fine")]);
    let transcript = session
        .run_turn("try again", config("cancel", retry, database))
        .await
        .unwrap();
    assert_eq!(transcript.final_answer, "resumed fine");
}

#[tokio::test]
async fn test_model_failure_keeps_saved_state() {
    let session = Session::in_memory();
    let provider = scripted(vec![
        MockResponse::tool_call("call_1", "list_tables", json!({})),
        MockResponse::failure("service unavailable"),
    ]);

    let report = session
        .run_turn("Tables?", config("fail", provider, sakila()))
        .await
        .unwrap_err();

    assert!(matches!(
        report.reason,
        AbortReason::ModelInvocationFailed { .. }
    ));
    assert!(report.user_message().contains("service unavailable"));

    let saved = session.store().load("fail").await.unwrap().unwrap();
    assert_eq!(saved.messages(), report.messages.as_slice());
    assert_eq!(
        roles(saved.messages()),
        vec![Role::System, Role::User, Role::Assistant, Role::Tool]
    );
}

/// Store that fails every save after the first `allowed`
struct FlakyStore {
    inner: MemoryCheckpointStore,
    allowed: AtomicUsize,
}

#[async_trait]
impl CheckpointStore for FlakyStore {
    async fn load(&self, thread_id: &str) -> Result<Option<ConversationState>> {
        self.inner.load(thread_id).await
    }

    async fn save(&self, thread_id: &str, state: &ConversationState) -> Result<()> {
        let left = self.allowed.load(Ordering::SeqCst);
        if left == 0 {
            return Err(Error::Checkpoint("disk full".to_string()));
        }
        self.allowed.store(left - 1, Ordering::SeqCst);
        self.inner.save(thread_id, state).await
    }

    async fn threads(&self) -> Result<Vec<String>> {
        self.inner.threads().await
    }
}

#[tokio::test]
async fn test_checkpoint_failure_aborts_without_corruption() {
    let store = Arc::new(FlakyStore {
        inner: MemoryCheckpointStore::new(),
        allowed: AtomicUsize::new(2),
    });
    let session = Session::new(store.clone());
    let provider = scripted(vec![
        MockResponse::tool_call("call_1", "list_tables", json!({})),
        MockResponse::text("never reached"),
    ]);

    let report = session
        .run_turn("Tables?", config("flaky", provider.clone(), sakila()))
        .await
        .unwrap_err();

    assert_eq!(
        report.reason,
        AbortReason::CheckpointIo {
            detail: "Checkpoint error: disk full".to_string()
        }
    );
    assert_eq!(provider.call_count(), 1);

    // Seed and first reasoning step were saved; the failed save changed nothing
    let saved = store.inner.load("flaky").await.unwrap().unwrap();
    assert_eq!(
        roles(saved.messages()),
        vec![Role::System, Role::User, Role::Assistant]
    );
    assert_eq!(saved.pending_actions().len(), 1);
}

#[tokio::test]
async fn test_read_only_database_refuses_writes_even_when_trusted() {
    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch("CREATE TABLE t (x INTEGER); INSERT INTO t VALUES (1);")
        .unwrap();
    let database: Arc<dyn Database> =
        Arc::new(SqliteDatabase::from_connection(conn).with_read_only(true));

    let session = Session::in_memory();
    let provider = scripted(vec![
        MockResponse::tool_call("call_1", "run_query", json!({"query": "DELETE FROM t"})),
        MockResponse::text("I cannot delete rows."),
    ]);

    let transcript = session
        .run_turn(
            "Delete everything",
            config("trust", provider, database.clone())
                .with_read_only(sqlsage::tools::ReadOnlyPolicy::Trust),
        )
        .await
        .unwrap();

    assert!(transcript.messages[3].is_error);
    let count = database.run_query("SELECT COUNT(*) FROM t").await.unwrap();
    assert_eq!(count.row_count(), 1);
    assert_eq!(count.rows[0][0], sqlsage::database::CellValue::Integer(1));
}
