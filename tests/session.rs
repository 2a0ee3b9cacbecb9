//! Session behaviour against a real SQLite collection, with fake embedding
//! and chat providers so nothing leaves the machine.

use anyhow::Result;
use async_trait::async_trait;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use vecstore::config::Config;
use vecstore::error::VecstoreError;
use vecstore::progress::{NoProgress, RecordingProgress};
use vecstore::session::{
    AskRequest, Providers, Session, CITATION_LABEL, DELETE_NOTICE, PROGRESS_ADDING,
    PROGRESS_COMPARING, PROGRESS_DELETING, PROGRESS_UPDATING, UNSELECT_FILE,
};
use vecstore_core::chat::{ChatMessage, ChatModel};
use vecstore_core::embedding::Embedder;
use vecstore_core::models::Document;

// ─── Fakes ──────────────────────────────────────────────────────────

/// Embeds by keyword presence and counts every call.
#[derive(Default)]
struct KeywordEmbedder {
    calls: AtomicUsize,
}

#[async_trait]
impl Embedder for KeywordEmbedder {
    fn model_name(&self) -> &str {
        "keyword-test"
    }
    fn dims(&self) -> usize {
        3
    }
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts
            .iter()
            .map(|t| {
                let t = t.to_lowercase();
                vec![
                    if t.contains("alpha") { 1.0 } else { 0.0 },
                    if t.contains("beta") { 1.0 } else { 0.0 },
                    0.1,
                ]
            })
            .collect())
    }
}

/// Always answers the same thing and remembers what it was asked.
#[derive(Default)]
struct RecordingChat {
    prompts: Mutex<Vec<Vec<ChatMessage>>>,
}

#[async_trait]
impl ChatModel for RecordingChat {
    fn model_name(&self) -> &str {
        "recording"
    }
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        self.prompts.lock().unwrap().push(messages.to_vec());
        Ok("canned answer".to_string())
    }
}

struct FakeProviders {
    embedder: Arc<KeywordEmbedder>,
    chat: Arc<RecordingChat>,
}

impl Providers for FakeProviders {
    fn embedder(&self) -> Result<Arc<dyn Embedder>> {
        Ok(self.embedder.clone())
    }
    fn chat_model(&self, _model: Option<&str>) -> Result<Arc<dyn ChatModel>> {
        Ok(self.chat.clone())
    }
}

struct Harness {
    _tmp: TempDir,
    collection: String,
    embedder: Arc<KeywordEmbedder>,
    chat: Arc<RecordingChat>,
    session: Session,
}

impl Harness {
    fn new() -> Self {
        let tmp = TempDir::new().unwrap();
        let collection = tmp.path().join("kb").to_string_lossy().into_owned();
        let embedder = Arc::new(KeywordEmbedder::default());
        let chat = Arc::new(RecordingChat::default());
        let session = Session::new(
            Config::minimal(),
            Arc::new(FakeProviders {
                embedder: embedder.clone(),
                chat: chat.clone(),
            }),
        );
        Self {
            _tmp: tmp,
            collection,
            embedder,
            chat,
            session,
        }
    }

    /// A second session over the same collection directory and fakes.
    fn reopen(&self) -> Session {
        Session::new(
            Config::minimal(),
            Arc::new(FakeProviders {
                embedder: self.embedder.clone(),
                chat: self.chat.clone(),
            }),
        )
    }

    async fn add(&mut self, source: &str, texts: &[&str]) -> Result<usize> {
        let docs: Vec<Document> = texts
            .iter()
            .map(|t| Document::new(*t).with_source(source))
            .collect();
        let outcome = self
            .session
            .add_file(
                Some(self.collection.as_str()),
                Some(Path::new(source)),
                &docs,
                &NoProgress,
            )
            .await?;
        Ok(outcome.chunks)
    }

    async fn count(&self) -> usize {
        self.session
            .collection()
            .unwrap()
            .store()
            .count()
            .await
            .unwrap()
    }
}

fn code(err: &anyhow::Error) -> Option<&'static str> {
    err.downcast_ref::<VecstoreError>().map(|e| e.code())
}

// ─── Collection lifecycle ───────────────────────────────────────────

#[tokio::test]
async fn test_create_rejects_empty_and_relative_paths() {
    let mut h = Harness::new();

    let err = h.session.create_collection("  ").await.unwrap_err();
    assert_eq!(code(&err), Some("missing_path"));

    let err = h.session.create_collection("kb/relative").await.unwrap_err();
    assert_eq!(code(&err), Some("invalid_path"));
    assert!(h.session.collection().is_none());

    let path = h.collection.clone();
    h.session.create_collection(&path).await.unwrap();
    assert_eq!(
        h.session.collection().unwrap().path(),
        Path::new(&h.collection)
    );
}

#[tokio::test]
async fn test_load_requires_a_path() {
    let mut h = Harness::new();
    let err = h.session.load_collection(None).await.unwrap_err();
    assert_eq!(code(&err), Some("missing_path"));
    let err = h.session.load_collection(Some("")).await.unwrap_err();
    assert_eq!(code(&err), Some("missing_path"));
}

#[tokio::test]
async fn test_load_lists_distinct_base_names_for_both_separators() {
    let mut h = Harness::new();
    h.add("/srv/docs/unix.md", &["alpha one", "alpha two"])
        .await
        .unwrap();
    h.add(r"C:\Users\me\win.txt", &["beta one", "beta two"])
        .await
        .unwrap();
    h.add(r"D:\mixed/path\deep.pdf", &["gamma"]).await.unwrap();

    let mut fresh = h.reopen();
    let outcome = fresh.load_collection(Some(h.collection.as_str())).await.unwrap();
    assert_eq!(outcome.files, vec!["deep.pdf", "unix.md", "win.txt"]);
    assert!(!outcome.notice.is_empty());
}

// ─── Ingestion ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_add_requires_file_then_collection() {
    let mut h = Harness::new();
    let docs = vec![Document::new("x").with_source("/a/x.txt")];

    let err = h
        .session
        .add_file(Some(h.collection.as_str()), None, &docs, &NoProgress)
        .await
        .unwrap_err();
    assert_eq!(code(&err), Some("no_file_chosen"));

    let err = h
        .session
        .add_file(None, Some(Path::new("/a/x.txt")), &docs, &NoProgress)
        .await
        .unwrap_err();
    assert_eq!(code(&err), Some("no_collection"));
}

#[tokio::test]
async fn test_add_reports_progress_checkpoints() {
    let mut h = Harness::new();
    let progress = RecordingProgress::new();
    let docs = vec![
        Document::new("alpha").with_source("/a/notes.txt"),
        Document::new("beta").with_source("/a/notes.txt"),
    ];
    let outcome = h
        .session
        .add_file(
            Some(h.collection.as_str()),
            Some(Path::new("/a/notes.txt")),
            &docs,
            &progress,
        )
        .await
        .unwrap();

    assert_eq!(outcome.file_name, "notes.txt");
    assert_eq!(outcome.chunks, 2);
    let events = progress.events();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].fraction, 0.3);
    assert_eq!(events[0].desc, PROGRESS_UPDATING);
    assert_eq!(events[1].fraction, 1.0);
    assert_eq!(events[1].desc, PROGRESS_ADDING);
}

#[tokio::test]
async fn test_duplicate_base_name_is_rejected_and_collection_unchanged() {
    let mut h = Harness::new();
    h.add("/home/a/report.txt", &["alpha one", "alpha two"])
        .await
        .unwrap();
    assert_eq!(h.count().await, 2);

    // Same base name from another directory, and with Windows separators.
    for other in ["/tmp/upload/report.txt", r"C:\tmp\report.txt"] {
        let err = h.add(other, &["beta"]).await.unwrap_err();
        assert_eq!(code(&err), Some("duplicate_file"), "for {}", other);
        assert_eq!(h.count().await, 2);
    }
}

#[tokio::test]
async fn test_ingest_file_reads_from_disk_and_persists() {
    let mut h = Harness::new();
    let file = h._tmp.path().join("guide.md");
    std::fs::write(&file, "# Guide\n\nAlpha is the first letter.\n\nBeta comes next.").unwrap();

    let outcome = h
        .session
        .ingest_file(Some(h.collection.as_str()), Some(file.as_path()), &NoProgress)
        .await
        .unwrap();
    assert_eq!(outcome.file_name, "guide.md");
    assert!(outcome.chunks >= 1);

    let mut fresh = h.reopen();
    let loaded = fresh.load_collection(Some(h.collection.as_str())).await.unwrap();
    assert_eq!(loaded.files, vec!["guide.md"]);

    let err = fresh
        .ingest_file(Some(h.collection.as_str()), Some(file.as_path()), &NoProgress)
        .await
        .unwrap_err();
    assert_eq!(code(&err), Some("duplicate_file"));
}

#[tokio::test]
async fn test_ingest_unsupported_file_is_invalid_request() {
    let mut h = Harness::new();
    let file = h._tmp.path().join("clip.mp4");
    std::fs::write(&file, [0u8, 1, 2]).unwrap();
    let err = h
        .session
        .ingest_file(Some(h.collection.as_str()), Some(file.as_path()), &NoProgress)
        .await
        .unwrap_err();
    assert_eq!(code(&err), Some("invalid_request"));
}

// ─── Deletion ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_delete_before_any_collection_is_not_initialized() {
    let mut h = Harness::new();
    let err = h
        .session
        .delete_file("a.txt", &NoProgress)
        .await
        .unwrap_err();
    assert_eq!(code(&err), Some("not_initialized"));
}

#[tokio::test]
async fn test_deleting_missing_file_is_not_found_and_collection_unchanged() {
    let mut h = Harness::new();
    h.add("/d/keep.txt", &["alpha"]).await.unwrap();

    let progress = RecordingProgress::new();
    let err = h
        .session
        .delete_file("missing.txt", &progress)
        .await
        .unwrap_err();
    assert_eq!(code(&err), Some("file_not_found"));
    assert_eq!(h.count().await, 1);

    let descs: Vec<_> = progress.events().into_iter().map(|e| e.desc).collect();
    assert_eq!(descs, vec![PROGRESS_COMPARING]);
}

#[tokio::test]
async fn test_delete_removes_only_the_named_file() {
    let mut h = Harness::new();
    h.add("/d/keep.txt", &["alpha"]).await.unwrap();
    h.add(r"C:\d\drop.txt", &["beta one", "beta two"])
        .await
        .unwrap();

    let progress = RecordingProgress::new();
    let outcome = h.session.delete_file("drop.txt", &progress).await.unwrap();
    assert_eq!(outcome.removed, 2);
    assert_eq!(outcome.notice, DELETE_NOTICE);
    assert_eq!(h.count().await, 1);
    assert_eq!(h.session.current_files().await.unwrap(), vec!["keep.txt"]);

    let events = progress.events();
    assert_eq!(events[0].fraction, 0.9);
    assert_eq!(events[1].fraction, 1.0);
    assert_eq!(events[1].desc, PROGRESS_DELETING);
}

// ─── Questions ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_ask_without_collection_uses_bare_model() {
    let mut h = Harness::new();
    let answer = h
        .session
        .ask(&AskRequest {
            question: "What is alpha?".into(),
            ..AskRequest::default()
        })
        .await
        .unwrap();

    assert!(answer.result.ends_with(CITATION_LABEL));
    assert!(answer.result.starts_with("canned answer"));
    assert!(answer.source_documents.is_empty());
    assert!(answer.notice.is_some());
    assert_eq!(h.embedder.calls.load(Ordering::SeqCst), 0);
    assert!(h.session.collection().is_none());

    let prompts = h.chat.prompts.lock().unwrap().clone();
    assert_eq!(prompts, vec![vec![ChatMessage::user("What is alpha?")]]);
}

#[tokio::test]
async fn test_history_holds_pending_answer_until_resolved() {
    let mut h = Harness::new();
    h.session
        .ask(&AskRequest {
            question: "first?".into(),
            ..AskRequest::default()
        })
        .await
        .unwrap();

    assert_eq!(h.session.history().len(), 1);
    assert_eq!(h.session.history()[0].answer, None);
    assert!(h.session.pending().is_some());

    let turn = h.session.resolve_pending().unwrap().clone();
    assert_eq!(turn.question, "first?");
    assert_eq!(turn.answer.as_deref(), Some("canned answer\nCited documents:"));
    assert!(h.session.pending().is_none());
    assert!(h.session.resolve_pending().is_none());
}

#[tokio::test]
async fn test_ask_with_file_filter_restricts_retrieval() {
    let mut h = Harness::new();
    h.add("/kb/alpha.txt", &["alpha facts", "more alpha"])
        .await
        .unwrap();
    h.add("/kb/beta.txt", &["beta facts", "alpha and beta"])
        .await
        .unwrap();

    let answer = h
        .session
        .ask(&AskRequest {
            question: "tell me about alpha".into(),
            collection_path: Some(h.collection.clone()),
            file: Some("beta.txt".into()),
            ..AskRequest::default()
        })
        .await
        .unwrap();

    assert_eq!(answer.result, "canned answer");
    assert_eq!(answer.source_filter.as_deref(), Some("/kb/beta.txt"));
    assert!(!answer.source_documents.is_empty());
    assert!(answer
        .source_documents
        .iter()
        .all(|d| d.source() == Some("/kb/beta.txt")));
}

#[tokio::test]
async fn test_ask_unselected_or_unknown_file_searches_whole_collection() {
    let mut h = Harness::new();
    h.add("/kb/alpha.txt", &["alpha facts"]).await.unwrap();
    h.add("/kb/beta.txt", &["beta facts"]).await.unwrap();

    for file in [Some(UNSELECT_FILE), Some("nothing-like-it.pdf"), None] {
        let answer = h
            .session
            .ask(&AskRequest {
                question: "alpha or beta".into(),
                collection_path: Some(h.collection.clone()),
                file: file.map(str::to_string),
                ..AskRequest::default()
            })
            .await
            .unwrap();
        assert!(answer.source_filter.is_none(), "for {:?}", file);
        let mut sources: Vec<_> = answer
            .source_documents
            .iter()
            .filter_map(|d| d.source())
            .collect();
        sources.sort();
        assert_eq!(sources, vec!["/kb/alpha.txt", "/kb/beta.txt"]);
    }
}

#[tokio::test]
async fn test_ask_rejects_unknown_chain_type_and_empty_question() {
    let mut h = Harness::new();
    let err = h
        .session
        .ask(&AskRequest {
            question: "q".into(),
            chain_type: Some("summarize".into()),
            ..AskRequest::default()
        })
        .await
        .unwrap_err();
    assert_eq!(code(&err), Some("invalid_request"));

    let err = h
        .session
        .ask(&AskRequest {
            question: "   ".into(),
            ..AskRequest::default()
        })
        .await
        .unwrap_err();
    assert_eq!(code(&err), Some("invalid_request"));
    assert!(h.session.history().is_empty());
}
