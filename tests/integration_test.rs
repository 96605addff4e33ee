//! Integration tests for minions-rs.

#![allow(clippy::expect_used)]

use async_trait::async_trait;
use minions_rs::chunking::{Chunker, FixedChunker, reconstruct};
use minions_rs::client::{CallResult, ChatOptions, Client};
use minions_rs::core::{Message, Usage};
use minions_rs::error::{ClientError, Error, ObserverError};
use minions_rs::protocol::{
    Budget, CancelToken, Minion, MinionConfig, Minions, MinionsConfig, PartialAnswer,
    RetryPolicy, RunStatus, Speaker,
};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

type Reply = Result<CallResult, ClientError>;

/// Client that pops scripted replies and records every conversation it sees.
struct Scripted {
    name: &'static str,
    replies: Mutex<VecDeque<Reply>>,
    fallback: Option<String>,
    seen: Mutex<Vec<Vec<Message>>>,
}

impl Scripted {
    fn new(name: &'static str, replies: Vec<Reply>) -> Arc<Self> {
        Arc::new(Self {
            name,
            replies: Mutex::new(replies.into()),
            fallback: None,
            seen: Mutex::new(Vec::new()),
        })
    }

    fn repeating(name: &'static str, reply: &str) -> Arc<Self> {
        Arc::new(Self {
            name,
            replies: Mutex::new(VecDeque::new()),
            fallback: Some(reply.to_string()),
            seen: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.seen.lock().len()
    }

    fn conversation(&self, call: usize) -> Vec<Message> {
        self.seen.lock()[call].clone()
    }
}

#[async_trait]
impl Client for Scripted {
    async fn chat(&self, messages: &[Message], _options: &ChatOptions) -> Reply {
        self.seen.lock().push(messages.to_vec());
        if let Some(reply) = self.replies.lock().pop_front() {
            return reply;
        }
        Ok(CallResult::single(
            self.fallback.clone().unwrap_or_default(),
            Usage::new(1, 1),
        ))
    }

    fn model_name(&self) -> &str {
        self.name
    }
}

/// Map-phase client answering per section; fails fatally on `fail_section`.
struct Sections {
    fail_section: Option<usize>,
}

#[async_trait]
impl Client for Sections {
    async fn chat(&self, messages: &[Message], _options: &ChatOptions) -> Reply {
        let prompt = messages.last().map_or("", |m| m.content.as_str());
        let id = (0..64)
            .find(|id| prompt.contains(&format!("<section id=\"{id}\"")))
            .expect("map prompt names its section");
        if Some(id) == self.fail_section {
            return Err(ClientError::fatal("model crashed").with_usage(Usage::new(7, 0)));
        }
        Ok(CallResult::single(
            format!(r#"{{"relevant": true, "answer": "part {id}"}}"#),
            Usage::new(100, 10),
        ))
    }

    fn model_name(&self) -> &str {
        "sections"
    }
}

fn ok(text: &str, usage: Usage) -> Reply {
    Ok(CallResult::single(text, usage))
}

fn fast_retry() -> RetryPolicy {
    RetryPolicy::default().with_initial_delay(Duration::from_millis(1))
}

const FINAL: &str = r#"{"decision": "provide_final_answer", "answer": "42"}"#;

#[tokio::test]
async fn test_minion_converges_in_one_round() {
    let local = Scripted::new("local", vec![ok("done", Usage::new(50, 5))]);
    let remote = Scripted::new("remote", vec![ok(FINAL, Usage::new(20, 8))]);

    let outcome = Minion::new(Arc::clone(&local), Arc::clone(&remote))
        .with_config(MinionConfig::default().with_max_rounds(1))
        .run("What is the answer?", "The answer is 42.")
        .await
        .expect("valid config");

    assert_eq!(outcome.status(), RunStatus::Converged);
    assert!(outcome.converged);
    assert_eq!(outcome.rounds_used, 1);
    assert_eq!(outcome.final_answer, "42");
    assert_eq!(outcome.total_usage, Usage::new(70, 13));

    let rounds = outcome.trace.rounds();
    assert_eq!(rounds.len(), 2);
    assert_eq!(rounds[0].speaker, Speaker::Local);
    assert_eq!(rounds[1].speaker, Speaker::Remote);
    assert!(rounds[1].is_final);

    // The remote sees the worker's report, never the raw context.
    let remote_view = remote.conversation(0);
    assert!(remote_view.iter().all(|m| !m.content.contains("The answer is 42.")));
    assert!(remote_view.last().expect("report").content.contains("done"));
}

#[tokio::test]
async fn test_minion_unconverged_returns_last_remote_output() {
    let local = Scripted::new(
        "local",
        vec![ok("first look", Usage::new(1, 1)), ok("second look", Usage::new(1, 1))],
    );
    let remote = Scripted::new(
        "remote",
        vec![
            ok(
                r#"{"decision": "request_additional_info", "message": "check page 2"}"#,
                Usage::new(1, 1),
            ),
            ok("  still unsure, maybe 41  ", Usage::new(1, 1)),
        ],
    );

    let outcome = Minion::new(Arc::clone(&local), Arc::clone(&remote))
        .with_config(MinionConfig::default().with_max_rounds(2))
        .run("task", "context")
        .await
        .expect("valid config");

    assert_eq!(outcome.status(), RunStatus::Unconverged);
    assert!(!outcome.converged);
    assert!(outcome.error.is_none());
    assert_eq!(outcome.rounds_used, 2);
    assert_eq!(outcome.final_answer, "still unsure, maybe 41");
    assert_eq!(outcome.trace.rounds().len(), 4);
    assert_eq!(outcome.total_usage.total_tokens(), 8);

    // The follow-up request reaches the worker as its next user turn.
    let second = local.conversation(1);
    assert_eq!(second.last().expect("follow-up").content, "check page 2");
}

#[test]
fn test_chunking_with_overlap() {
    let text: String = (0..1000u32)
        .map(|i| char::from(b'a' + u8::try_from(i % 26).expect("< 26")))
        .collect();
    let chunks = FixedChunker::with_size_and_overlap(300, 50)
        .chunk(&text, None)
        .expect("chunk");

    assert_eq!(chunks.len(), 4);
    for (i, chunk) in chunks.iter().enumerate() {
        assert_eq!(chunk.id, i);
        assert!(chunk.size() <= 300);
    }
    for pair in chunks.windows(2) {
        let tail = &pair[0].text[pair[0].text.len() - 50..];
        assert_eq!(&pair[1].text[..50], tail);
        assert_eq!(pair[1].overlap_len, 50);
    }
    assert_eq!(reconstruct(&chunks), text);
}

#[tokio::test]
async fn test_minions_survives_failed_chunk() {
    let remote = Scripted::new(
        "remote",
        vec![ok(
            r#"{"decision": "provide_final_answer", "answer": "parts 0, 1 and 3"}"#,
            Usage::new(40, 4),
        )],
    );

    let outcome = Minions::new(
        Sections {
            fail_section: Some(2),
        },
        Arc::clone(&remote),
    )
    .with_config(MinionsConfig::default().with_chunking(300, 50))
    .run("collect the parts", &"x".repeat(1000))
    .await
    .expect("valid config");

    assert_ne!(outcome.status(), RunStatus::Failed);
    assert!(outcome.converged);
    assert_eq!(outcome.final_answer, "parts 0, 1 and 3");

    let chunks = outcome.trace.chunks();
    assert_eq!(chunks.len(), 4);
    assert!(matches!(chunks[2].partial, PartialAnswer::Failed { .. }));
    assert_eq!(chunks.iter().filter(|c| c.partial.answer().is_some()).count(), 3);

    let synthesis = remote.conversation(0);
    let prompt = &synthesis.last().expect("synthesis prompt").content;
    assert_eq!(prompt.matches("<partial section=").count(), 3);
    assert!(!prompt.contains("part 2"));

    // Three relevant chunks, the failed chunk's usage, and the synthesis call.
    assert_eq!(outcome.total_usage, Usage::new(3 * 100 + 7 + 40, 3 * 10 + 4));
}

#[tokio::test]
async fn test_observer_failure_on_first_round() {
    let local = Scripted::repeating("local", "report");
    let remote = Scripted::repeating("remote", "keep going");

    let outcome = Minion::new(Arc::clone(&local), Arc::clone(&remote))
        .with_observer(|_: Speaker, _: &Message, _: bool| -> Result<(), ObserverError> {
            Err(ObserverError::new("user aborted"))
        })
        .run("task", "context")
        .await
        .expect("valid config");

    assert_eq!(outcome.status(), RunStatus::Failed);
    assert_eq!(outcome.trace.rounds().len(), 1);
    assert!(outcome.error.as_ref().is_some_and(Error::is_observer));
    assert_eq!(remote.calls(), 0);
    assert_eq!(outcome.total_usage, Usage::new(1, 1));
}

#[tokio::test]
async fn test_usage_includes_retried_attempts() {
    let local = Scripted::new(
        "local",
        vec![
            Err(ClientError::retryable("rate limited").with_usage(Usage::new(3, 0))),
            ok("found it", Usage::new(10, 2)),
        ],
    );
    let remote = Scripted::new("remote", vec![ok(FINAL, Usage::new(5, 5))]);

    let outcome = Minion::new(Arc::clone(&local), Arc::clone(&remote))
        .with_config(MinionConfig::default().with_retry(fast_retry()))
        .run("task", "context")
        .await
        .expect("valid config");

    assert!(outcome.converged);
    assert_eq!(local.calls(), 2);
    assert_eq!(outcome.trace.rounds()[0].usage, Usage::new(13, 2));
    assert_eq!(outcome.total_usage, Usage::new(18, 7));
}

#[tokio::test]
async fn test_retries_stop_at_max_attempts() {
    let local = Scripted::new(
        "local",
        vec![
            Err(ClientError::retryable("timeout")),
            Err(ClientError::retryable("timeout")),
            ok("unreachable", Usage::zero()),
        ],
    );
    let remote = Scripted::repeating("remote", FINAL);

    let outcome = Minion::new(Arc::clone(&local), remote)
        .with_config(
            MinionConfig::default().with_retry(fast_retry().with_max_attempts(2)),
        )
        .run("task", "context")
        .await
        .expect("valid config");

    assert_eq!(outcome.status(), RunStatus::Failed);
    assert_eq!(local.calls(), 2);
    assert!(outcome.trace.rounds().is_empty());
}

#[tokio::test]
async fn test_cancelled_before_start() {
    let token = CancelToken::new();
    token.cancel();
    let local = Scripted::repeating("local", "report");
    let remote = Scripted::repeating("remote", FINAL);

    let outcome = Minion::new(Arc::clone(&local), remote)
        .with_config(MinionConfig::default().with_budget(Budget::unlimited().with_cancel(token)))
        .run("task", "context")
        .await
        .expect("valid config");

    assert_eq!(outcome.status(), RunStatus::Failed);
    assert!(matches!(outcome.error, Some(Error::Cancelled { .. })));
    assert_eq!(local.calls(), 0);
    assert!(outcome.total_usage.is_zero());
}

#[tokio::test]
async fn test_call_budget_stops_minion() {
    let local = Scripted::repeating("local", "report");
    let remote = Scripted::repeating("remote", "need more");

    let outcome = Minion::new(local, remote)
        .with_config(
            MinionConfig::default()
                .with_max_rounds(3)
                .with_budget(Budget::unlimited().with_max_calls(3)),
        )
        .run("task", "context")
        .await
        .expect("valid config");

    assert_eq!(outcome.status(), RunStatus::Failed);
    assert_eq!(outcome.trace.rounds().len(), 3);
    assert_eq!(outcome.rounds_used, 1);
    assert!(
        outcome
            .error
            .as_ref()
            .is_some_and(|e| e.to_string().contains("call budget of 3 exhausted"))
    );
    assert_eq!(outcome.final_answer, "need more");
}

#[tokio::test]
async fn test_call_budget_skips_remaining_chunks() {
    let remote = Scripted::repeating("remote", FINAL);

    let outcome = Minions::new(Sections { fail_section: None }, Arc::clone(&remote))
        .with_config(
            MinionsConfig::default()
                .with_chunking(300, 50)
                .with_max_concurrency(1)
                .with_budget(Budget::unlimited().with_max_calls(2)),
        )
        .run("task", &"x".repeat(1000))
        .await
        .expect("valid config");

    assert_eq!(outcome.status(), RunStatus::Failed);
    assert!(matches!(outcome.error, Some(Error::Cancelled { .. })));
    let skipped = outcome
        .trace
        .chunks()
        .iter()
        .filter(|c| matches!(c.partial, PartialAnswer::Skipped { .. }))
        .count();
    assert_eq!(skipped, 2);
    assert_eq!(remote.calls(), 0);
    assert_eq!(outcome.total_usage, Usage::new(200, 20));
}

#[tokio::test]
async fn test_minions_rejects_empty_context() {
    let local = Scripted::repeating("local", "x");
    let remote = Scripted::repeating("remote", FINAL);

    let result = Minions::new(Arc::clone(&local), remote).run("task", "").await;
    assert!(matches!(result, Err(Error::Chunking(_))));
    assert_eq!(local.calls(), 0);
}

#[cfg(unix)]
mod cli {
    use assert_cmd::Command;
    use predicates::prelude::*;
    use tempfile::TempDir;

    fn bin() -> Command {
        let mut cmd = Command::cargo_bin("minions-rs").expect("binary builds");
        cmd.env_remove("MINIONS_PROMPT_DIR")
            .env_remove("MINIONS_LOCAL_CMD")
            .env_remove("MINIONS_REMOTE_CMD")
            .env_remove("RUST_LOG");
        cmd
    }

    #[test]
    fn test_chunk_command_json() {
        let temp_dir = TempDir::new().expect("temp dir");
        let file = temp_dir.path().join("ctx.txt");
        std::fs::write(&file, "y".repeat(1000)).expect("write");

        let output = bin()
            .args(["--format", "json", "chunk"])
            .arg(&file)
            .args(["--chunk-size", "300", "--overlap", "50"])
            .output()
            .expect("run");
        assert!(output.status.success());

        let value: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json");
        assert_eq!(value["context_bytes"], 1000);
        assert_eq!(value["chunks"].as_array().expect("array").len(), 4);
    }

    #[test]
    fn test_chunk_command_missing_file() {
        bin()
            .args(["chunk", "/nonexistent/ctx.txt"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("file not found"));
    }

    #[test]
    fn test_prompts_init_writes_templates() {
        let temp_dir = TempDir::new().expect("temp dir");
        let dir = temp_dir.path().join("prompts");

        bin()
            .args(["prompts", "init"])
            .arg(&dir)
            .assert()
            .success()
            .stdout(predicate::str::contains("Wrote 4 templates"));
        assert!(dir.join("synthesis.md").exists());
    }

    #[test]
    fn test_minion_command_with_shell_backends() {
        let temp_dir = TempDir::new().expect("temp dir");
        let context = temp_dir.path().join("record.txt");
        std::fs::write(&context, "Dose: 5mg daily.").expect("write");
        let trace = temp_dir.path().join("out/trace.json");

        let local_script = temp_dir.path().join("local.sh");
        std::fs::write(
            &local_script,
            "cat >/dev/null\necho '{\"responses\":[\"The record says 5mg.\"],\"usage\":{\"prompt_tokens\":30,\"completion_tokens\":6}}'\n",
        )
        .expect("write");
        let remote_script = temp_dir.path().join("remote.sh");
        std::fs::write(
            &remote_script,
            "cat >/dev/null\necho '{\"responses\":[\"{\\\"decision\\\":\\\"provide_final_answer\\\",\\\"answer\\\":\\\"5mg\\\"}\"],\"usage\":{\"prompt_tokens\":12,\"completion_tokens\":4}}'\n",
        )
        .expect("write");

        let output = bin()
            .args(["--format", "json", "minion", "What dose?", "--context"])
            .arg(&context)
            .arg("--local-cmd")
            .arg(format!("sh {}", local_script.display()))
            .arg("--remote-cmd")
            .arg(format!("sh {}", remote_script.display()))
            .arg("--output")
            .arg(&trace)
            .output()
            .expect("run");
        assert!(
            output.status.success(),
            "stderr: {}",
            String::from_utf8_lossy(&output.stderr)
        );

        let value: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json");
        assert_eq!(value["status"], "converged");
        assert_eq!(value["final_answer"], "5mg");
        assert_eq!(value["total_usage"]["total_tokens"], 52);

        let saved: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&trace).expect("trace written"))
                .expect("json");
        assert_eq!(saved["trace"]["rounds"].as_array().expect("rounds").len(), 2);
    }
}

mod properties {
    use super::*;
    use minions_rs::chunking::{ChunkPlan, expected_chunk_count};
    use proptest::prelude::*;

    fn usage() -> impl Strategy<Value = Usage> {
        (0u64..1_000_000, 0u64..1_000_000).prop_map(|(p, c)| Usage::new(p, c))
    }

    proptest! {
        #[test]
        fn usage_combine_is_associative(a in usage(), b in usage(), c in usage()) {
            prop_assert_eq!(
                Usage::combine(Usage::combine(a, b), c),
                Usage::combine(a, Usage::combine(b, c))
            );
        }

        #[test]
        fn usage_combine_is_commutative(a in usage(), b in usage()) {
            prop_assert_eq!(Usage::combine(a, b), Usage::combine(b, a));
        }

        #[test]
        fn usage_zero_is_identity(a in usage()) {
            prop_assert_eq!(Usage::combine(a, Usage::zero()), a);
            prop_assert_eq!(Usage::combine(Usage::zero(), a), a);
        }

        #[test]
        fn usage_saturates(p in any::<u64>(), c in any::<u64>()) {
            let big = Usage::new(u64::MAX, u64::MAX);
            prop_assert_eq!(Usage::combine(big, Usage::new(p, c)), big);
        }

        #[test]
        fn chunks_cover_ascii_text(
            len in 1usize..3000,
            chunk_size in 1usize..500,
            overlap_pct in 0usize..90,
        ) {
            let overlap = chunk_size * overlap_pct / 100;
            let text = "abcdefghij".repeat(len / 10 + 1)[..len].to_string();
            let chunks = FixedChunker::from_plan(ChunkPlan::new(chunk_size, overlap))
                .chunk(&text, None)
                .expect("valid plan");

            prop_assert_eq!(chunks.len(), expected_chunk_count(len, chunk_size, overlap));
            prop_assert!(chunks.iter().all(|c| c.size() <= chunk_size));
            prop_assert_eq!(reconstruct(&chunks), text);
        }

        #[test]
        fn chunks_cover_unicode_text(s in "[a-zé世🦀 ]{1,400}", chunk_size in 8usize..64) {
            let chunks = FixedChunker::with_size_and_overlap(chunk_size, chunk_size / 4)
                .chunk(&s, None)
                .expect("valid plan");
            prop_assert_eq!(reconstruct(&chunks), s);
        }
    }
}
