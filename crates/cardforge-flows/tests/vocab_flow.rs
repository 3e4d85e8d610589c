use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;

use cardforge_core::config::AppConfig;
use cardforge_core::error::{CardforgeError, Result};
use cardforge_core::traits::TextGenerator;
use cardforge_core::types::{GenerateRequest, NoteRecord};
use cardforge_flows::keys;
use cardforge_flows::prompts::{EXTRACT_ROOT_SYSTEM, PARSE_WORD_SYSTEM};
use cardforge_flows::{FlowDeps, VocabFlow, VocabOutcome};
use cardforge_test_utils::{ConstantSpeech, MemoryStore, Reply, ScriptedGenerator};

const PARSED: &str = r#"Here you go:
```json
{
  "word": "학생",
  "meaning": "學生",
  "pos": "n",
  "examples": [
    {"type": "casual", "kr": "저는 학생이에요.", "zh": "我是學生。"},
    {"type": "formal", "kr": "그는 대학생입니다.", "zh": "他是大學生。"}
  ]
}
```"#;

fn generator() -> ScriptedGenerator {
    ScriptedGenerator::new()
        .on(PARSE_WORD_SYSTEM, Reply::Text(PARSED.into()))
        .on(EXTRACT_ROOT_SYSTEM, Reply::Text(r#"{"root": "學生"}"#.into()))
}

fn deps(generator: ScriptedGenerator, store: MemoryStore) -> FlowDeps {
    FlowDeps::new(
        Arc::new(generator),
        Arc::new(store),
        Arc::new(ConstantSpeech::default()),
        Arc::new(AppConfig::default()),
    )
}

fn flow(generator: ScriptedGenerator, store: MemoryStore) -> VocabFlow {
    VocabFlow::new(&deps(generator, store)).unwrap()
}

fn seeded_note(word: &str, tags: &[&str]) -> NoteRecord {
    NoteRecord::new("Korean::Auto", "Korean Vocabulary")
        .field("Word", word)
        .field("Meaning", "old")
        .with_tags(tags.iter().map(|t| t.to_string()).collect())
}

fn created(outcome: VocabOutcome) -> cardforge_flows::VocabCard {
    match outcome {
        VocabOutcome::Created(card) => card,
        other => panic!("expected a created card, got {:?}", other),
    }
}

#[tokio::test]
async fn test_new_word_creates_card() {
    let store = MemoryStore::new();
    let flow = flow(generator(), store.clone());

    let result = flow.execute("학생", false).await.unwrap();
    assert!(!result.is_skipped());
    assert_eq!(result.state.get_bool(keys::EXISTS), Some(false));

    let card = cardforge_flows::VocabCard::from_state(&result.state).unwrap();
    assert_eq!(card.meaning, "學生");
    assert_eq!(card.pos, "n");
    assert_eq!(card.pos_zh, "名詞");
    assert_eq!(card.examples.len(), 2);
    assert_eq!(card.root.as_deref(), Some("學生"));
    assert_eq!(card.tags, vec!["korean_auto", "root_學生", "pos_n"]);
    assert!(card.audio_filename.starts_with("vocab_"));

    let note = store.note(card.anki_note_id).unwrap();
    assert_eq!(note.get("Word"), Some("학생"));
    assert_eq!(note.get("Audio"), Some(format!("[sound:{}]", card.audio_filename).as_str()));
    assert_eq!(note.get("POS"), Some("名詞"));
    assert_eq!(note.get("ExampleKorean2"), Some("그는 대학생입니다."));
    assert_eq!(note.fields.len(), 8);
    assert_eq!(note.tags, card.tags);
    assert!(store.media(&card.audio_filename).is_some());
    assert_eq!(store.writes(), vec!["store_media", "add"]);
}

#[tokio::test]
async fn test_continue_path_runs_each_node_once() {
    let flow = flow(generator(), MemoryStore::new());
    let result = flow.execute("학생", false).await.unwrap();

    let mut executed = result.executed();
    executed.sort();
    assert_eq!(
        executed,
        vec![
            "build_examples",
            "build_tags",
            "check_duplicate",
            "extract_root",
            "fanout",
            "generate_tts",
            "parse_word",
            "send_to_anki",
            "store_audio",
        ]
    );
}

#[tokio::test]
async fn test_existing_word_is_skipped() {
    let store = MemoryStore::new();
    let id = store.insert(seeded_note("학생", &["korean_auto"]));
    let generator = generator();
    let flow = flow(generator.clone(), store.clone());

    let result = flow.execute("학생", false).await.unwrap();
    assert!(result.is_skipped());
    assert_eq!(result.state.get_bool(keys::EXISTS), Some(true));
    assert_eq!(result.state.get_int(keys::ANKI_NOTE_ID), Some(id));
    assert!(!result.state.contains(keys::MEANING));
    assert!(!result.state.contains(keys::POS));
    assert_eq!(result.executed(), vec!["check_duplicate"]);

    assert_eq!(
        flow.run("학생", false).await.unwrap(),
        VocabOutcome::Skipped { anki_note_id: id }
    );
    assert!(generator.calls().is_empty());
    assert!(store.writes().is_empty());
}

#[tokio::test]
async fn test_parse_failure_aborts_before_any_write() {
    let store = MemoryStore::new();
    let generator = ScriptedGenerator::new()
        .on(PARSE_WORD_SYSTEM, Reply::Fail("rate limited".into()))
        .on(EXTRACT_ROOT_SYSTEM, Reply::Text(r#"{"root": "學生"}"#.into()));
    let flow = flow(generator, store.clone());

    let err = flow.run("학생", false).await.unwrap_err();
    assert_eq!(err.failed_step(), Some("parse_word"));
    assert!(matches!(err.root_cause(), CardforgeError::LlmRequest(_)));
    assert!(store.writes().is_empty());
}

#[tokio::test]
async fn test_malformed_parse_reply_is_step_failure() {
    let generator = ScriptedGenerator::new()
        .on(PARSE_WORD_SYSTEM, Reply::Text(r#"{"word": "학생", "pos": "noun"}"#.into()))
        .on(EXTRACT_ROOT_SYSTEM, Reply::Text(r#"{"root": "N"}"#.into()));
    let err = flow(generator, MemoryStore::new())
        .run("학생", false)
        .await
        .unwrap_err();
    assert_eq!(err.failed_step(), Some("parse_word"));
    assert!(matches!(err.root_cause(), CardforgeError::LlmParse(_)));
}

#[tokio::test]
async fn test_root_failure_degrades() {
    let store = MemoryStore::new();
    let generator = ScriptedGenerator::new()
        .on(PARSE_WORD_SYSTEM, Reply::Text(PARSED.into()))
        .on(EXTRACT_ROOT_SYSTEM, Reply::Fail("timeout".into()));

    let result = flow(generator, store.clone())
        .execute("학생", false)
        .await
        .unwrap();
    assert!(result.state.contains(keys::ROOT));
    assert_eq!(result.state.get_str(keys::ROOT), None);
    assert!(result
        .state
        .get_str(keys::ROOT_ERROR)
        .unwrap()
        .contains("timeout"));

    let card = cardforge_flows::VocabCard::from_state(&result.state).unwrap();
    assert_eq!(card.root, None);
    assert_eq!(card.tags, vec!["korean_auto", "pos_n"]);
    assert!(store.note(card.anki_note_id).is_some());
}

#[tokio::test]
async fn test_invalid_root_fails_run() {
    let generator = ScriptedGenerator::new()
        .on(PARSE_WORD_SYSTEM, Reply::Text(PARSED.into()))
        .on(EXTRACT_ROOT_SYSTEM, Reply::Text(r#"{"root": "hak-saeng"}"#.into()));
    let err = flow(generator, MemoryStore::new())
        .run("학생", false)
        .await
        .unwrap_err();
    assert_eq!(err.failed_step(), Some("extract_root"));
}

#[tokio::test]
async fn test_native_word_gets_native_tag() {
    let generator = ScriptedGenerator::new()
        .on(PARSE_WORD_SYSTEM, Reply::Text(PARSED.into()))
        .on(EXTRACT_ROOT_SYSTEM, Reply::Text(r#"{"root": "N"}"#.into()));
    let result = flow(generator, MemoryStore::new())
        .execute("학생", false)
        .await
        .unwrap();
    assert_eq!(result.state.get_str(keys::ROOT_TAG), Some("native_kor"));
    assert_eq!(
        result.state.get_strings(keys::TAGS),
        vec!["korean_auto", "native_kor", "pos_n"]
    );
}

#[tokio::test]
async fn test_force_update_rewrites_existing_note() {
    let store = MemoryStore::new();
    let id = store.insert(seeded_note(
        "학생",
        &["korean_auto", "native_kor", "pos_v", "my_deck_tag"],
    ));

    let card = created(flow(generator(), store.clone()).run("학생", true).await.unwrap());
    assert_eq!(card.anki_note_id, id);
    assert_eq!(store.note_count(), 1);

    let note = store.note(id).unwrap();
    assert_eq!(note.get("Meaning"), Some("學生"));
    assert_eq!(note.tags, vec!["my_deck_tag", "korean_auto", "root_學生", "pos_n"]);
    assert!(!store.writes().contains(&"add".to_string()));
}

#[tokio::test]
async fn test_missing_tags_are_retried_once() {
    let store = MemoryStore::new();
    let id = store.insert(seeded_note("학생", &["korean_auto"]));
    store.drop_next_tag_add();

    created(flow(generator(), store.clone()).run("학생", true).await.unwrap());

    let note = store.note(id).unwrap();
    assert_eq!(note.tags, vec!["korean_auto", "root_學生", "pos_n"]);
    let tag_adds = store.ops().iter().filter(|op| *op == "add_tags").count();
    assert_eq!(tag_adds, 2);
}

#[tokio::test]
async fn test_store_unreachable_is_reported_as_unavailable() {
    let store = MemoryStore::new();
    store.set_unavailable(true);
    let err = flow(generator(), store).run("학생", false).await.unwrap_err();
    assert!(err.is_unavailable());
    assert_eq!(err.failed_step(), Some("check_duplicate"));
}

#[tokio::test]
async fn test_runs_are_deterministic() {
    let first = flow(generator(), MemoryStore::new())
        .execute("학생", false)
        .await
        .unwrap();
    let second = flow(generator(), MemoryStore::new())
        .execute("학생", false)
        .await
        .unwrap();
    assert_eq!(first.state, second.state);
    assert_eq!(first.executed(), second.executed());
}

/// Delays replies whose system prompt contains `slow`.
struct Delayed {
    inner: ScriptedGenerator,
    slow: &'static str,
}

impl TextGenerator for Delayed {
    fn generate(&self, request: GenerateRequest) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            if request.system_prompt.contains(self.slow) {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            self.inner.generate(request).await
        })
    }
}

#[tokio::test(start_paused = true)]
async fn test_fan_in_independent_of_completion_order() {
    let mut states = Vec::new();
    for slow in [PARSE_WORD_SYSTEM, EXTRACT_ROOT_SYSTEM] {
        let mut deps = deps(generator(), MemoryStore::new());
        deps.generator = Arc::new(Delayed {
            inner: generator(),
            slow,
        });
        let result = VocabFlow::new(&deps)
            .unwrap()
            .execute("학생", false)
            .await
            .unwrap();
        assert_eq!(
            result.state.get_strings(keys::TAGS),
            vec!["korean_auto", "root_學生", "pos_n"]
        );
        states.push(result.state);
    }
    assert_eq!(states[0], states[1]);
}
