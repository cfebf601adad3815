use std::path::Path;
use std::sync::{Arc, Mutex};

use rustyrag::embedding::HashEmbeddingClient;
use rustyrag::loader::{DocumentLoader, LoadError, Page, PdfLoader};
use rustyrag::processing::chunking::ChunkSettings;
use rustyrag::processing::{ProcessingError, RagService, RetrievalError};
use rustyrag::store::StoreError;
use tempfile::TempDir;

/// Loader returning whatever pages the test last configured, per requested path.
#[derive(Default)]
struct ScriptedLoader {
    documents: Mutex<Vec<(String, Vec<Page>)>>,
}

impl ScriptedLoader {
    fn set(&self, source: &str, pages: &[&str]) {
        let pages = pages
            .iter()
            .enumerate()
            .map(|(page, text)| Page {
                source: source.to_string(),
                page,
                text: text.to_string(),
            })
            .collect();
        let mut documents = self.documents.lock().unwrap();
        documents.retain(|(name, _)| name != source);
        documents.push((source.to_string(), pages));
    }
}

impl DocumentLoader for ScriptedLoader {
    fn load(&self, path: &Path) -> Result<Vec<Page>, LoadError> {
        let key = path.to_string_lossy();
        self.documents
            .lock()
            .unwrap()
            .iter()
            .find(|(name, _)| *name == key)
            .map(|(_, pages)| pages.clone())
            .ok_or_else(|| LoadError::NotFound(path.to_path_buf()))
    }
}

struct Harness {
    _dir: TempDir,
    loader: Arc<ScriptedLoader>,
    service: RagService,
}

fn harness() -> Harness {
    let dir = tempfile::tempdir().expect("tempdir");
    let loader = Arc::new(ScriptedLoader::default());
    let service = RagService::new(
        loader.clone(),
        Arc::new(HashEmbeddingClient::new("hash-embedding", 64)),
        dir.path().join("DBs"),
        ChunkSettings {
            max_size: 80,
            overlap: 10,
        },
    );
    Harness {
        _dir: dir,
        loader,
        service,
    }
}

async fn stored_ids(harness: &Harness, collection: &str) -> Vec<String> {
    let store = harness.service.store();
    let handle = store.open(collection).await.expect("open");
    let mut ids: Vec<String> = store
        .existing_ids(&handle)
        .await
        .expect("ids")
        .into_iter()
        .collect();
    ids.sort();
    ids
}

const LONG_PAGE: &str = "The reactor cooling loop is inspected weekly. Pumps are rotated every month. \
    Valves are replaced after five years of service. Operators log every pressure reading.";

#[tokio::test]
async fn reindexing_unchanged_input_adds_nothing() {
    let harness = harness();
    harness
        .loader
        .set("manual.pdf", &[LONG_PAGE, "Appendix with contact numbers."]);

    let first = harness
        .service
        .index(Path::new("manual.pdf"), "plant")
        .await
        .expect("first run");
    assert!(first.added_count >= 3, "long page should split: {first:?}");
    assert_eq!(first.added_count, first.chunks_total);
    assert_eq!(first.pages_loaded, 2);
    let ids_after_first = stored_ids(&harness, "plant").await;
    assert_eq!(ids_after_first.len(), first.added_count);

    let second = harness
        .service
        .index(Path::new("manual.pdf"), "plant")
        .await
        .expect("second run");
    assert_eq!(second.added_count, 0);
    assert_eq!(second.skipped_existing, first.chunks_total);
    assert_eq!(second.existing_before, first.added_count);
    assert_eq!(second.stale_count, 0);
    assert_eq!(stored_ids(&harness, "plant").await, ids_after_first);
}

#[tokio::test]
async fn disjoint_documents_accumulate() {
    let harness = harness();
    harness.loader.set("a.pdf", &["Alpha page one.", "Alpha page two."]);
    harness.loader.set("b.pdf", &["Bravo page one."]);

    let a = harness
        .service
        .index(Path::new("a.pdf"), "docs")
        .await
        .expect("index a");
    let b = harness
        .service
        .index(Path::new("b.pdf"), "docs")
        .await
        .expect("index b");

    assert_eq!(a.added_count, 2);
    assert_eq!(b.added_count, 1);
    assert_eq!(
        stored_ids(&harness, "docs").await,
        vec!["a.pdf:0:0", "a.pdf:1:0", "b.pdf:0:0"]
    );
}

#[tokio::test]
async fn identities_follow_page_numbers_across_blank_pages() {
    let harness = harness();
    harness
        .loader
        .set("gaps.pdf", &["First page.", "   ", "Third page."]);

    let summary = harness
        .service
        .index(Path::new("gaps.pdf"), "docs")
        .await
        .expect("index");
    assert_eq!(summary.pages_loaded, 3);
    assert_eq!(summary.chunks_total, 2);
    assert_eq!(
        stored_ids(&harness, "docs").await,
        vec!["gaps.pdf:0:0", "gaps.pdf:2:0"]
    );
}

#[tokio::test]
async fn empty_collection_yields_empty_context() {
    let harness = harness();
    let prompt = harness
        .service
        .build_prompt("fresh", "Anything?", Some(3))
        .await
        .expect("prompt");
    assert!(prompt.results.is_empty());
    assert_eq!(
        prompt.prompt,
        "Answer the question based only on the following context:\n\n\n\n---\n\n\
         Answer the question based on the above context: Anything?"
    );
}

#[tokio::test]
async fn results_are_bounded_by_collection_size() {
    let harness = harness();
    harness
        .loader
        .set("short.pdf", &["One.", "Two.", "Three."]);
    harness
        .service
        .index(Path::new("short.pdf"), "docs")
        .await
        .expect("index");

    let prompt = harness
        .service
        .build_prompt("docs", "Two.", Some(5))
        .await
        .expect("prompt");
    assert_eq!(prompt.results.len(), 3);
    assert_eq!(prompt.results[0].text, "Two.");
    assert_eq!(prompt.results[0].metadata.id, "short.pdf:1:0");
    assert!(
        prompt
            .results
            .windows(2)
            .all(|pair| pair[0].score >= pair[1].score)
    );

    let texts: Vec<&str> = prompt.results.iter().map(|hit| hit.text.as_str()).collect();
    let expected_context = texts.join("\n\n---\n\n");
    assert_eq!(
        prompt.prompt,
        format!(
            "Answer the question based only on the following context:\n\n{expected_context}\n\n---\n\n\
             Answer the question based on the above context: Two."
        )
    );
}

#[tokio::test]
async fn non_positive_k_is_rejected() {
    let harness = harness();
    let error = harness
        .service
        .build_prompt("docs", "q", Some(0))
        .await
        .unwrap_err();
    assert!(matches!(error, RetrievalError::Store(StoreError::InvalidK(0))));
}

#[tokio::test]
async fn delete_wipes_collection_state() {
    let harness = harness();
    harness.loader.set("a.pdf", &["Alpha."]);
    harness
        .service
        .index(Path::new("a.pdf"), "docs")
        .await
        .expect("index");

    assert!(harness.service.delete_collection("docs").await.expect("delete"));
    assert!(harness.service.list_collections().await.expect("list").is_empty());

    let prompt = harness
        .service
        .build_prompt("docs", "Alpha.", None)
        .await
        .expect("prompt");
    assert!(prompt.results.is_empty());

    let rerun = harness
        .service
        .index(Path::new("a.pdf"), "docs")
        .await
        .expect("reindex");
    assert_eq!(rerun.added_count, 1);
}

#[tokio::test]
async fn edited_content_is_reported_stale_and_left_untouched() {
    let harness = harness();
    harness.loader.set("a.pdf", &["Original wording."]);
    harness
        .service
        .index(Path::new("a.pdf"), "docs")
        .await
        .expect("index");

    harness.loader.set("a.pdf", &["Edited wording."]);
    let summary = harness
        .service
        .index(Path::new("a.pdf"), "docs")
        .await
        .expect("reindex");
    assert_eq!(summary.added_count, 0);
    assert_eq!(summary.stale_count, 1);

    let prompt = harness
        .service
        .build_prompt("docs", "wording", Some(1))
        .await
        .expect("prompt");
    assert_eq!(prompt.results[0].text, "Original wording.");
}

#[tokio::test]
async fn load_failure_aborts_before_touching_storage() {
    let harness = harness();
    let error = harness
        .service
        .index(Path::new("missing.pdf"), "docs")
        .await
        .unwrap_err();
    assert!(matches!(error, ProcessingError::Load(LoadError::NotFound(_))));
    assert!(harness.service.list_collections().await.expect("list").is_empty());
}

#[tokio::test]
async fn concurrent_runs_on_one_collection_do_not_duplicate() {
    let harness = harness();
    harness.loader.set("a.pdf", &[LONG_PAGE]);

    let (first, second) = tokio::join!(
        harness.service.index(Path::new("a.pdf"), "docs"),
        harness.service.index(Path::new("a.pdf"), "docs"),
    );
    let first = first.expect("first run");
    let second = second.expect("second run");

    assert_eq!(first.added_count + second.added_count, first.chunks_total);
    assert_eq!(stored_ids(&harness, "docs").await.len(), first.chunks_total);
}

#[tokio::test]
async fn invalid_collection_names_are_rejected() {
    let harness = harness();
    harness.loader.set("a.pdf", &["Alpha."]);
    let error = harness
        .service
        .index(Path::new("a.pdf"), "../escape")
        .await
        .unwrap_err();
    assert!(matches!(
        error,
        ProcessingError::Store(StoreError::InvalidCollectionName(_))
    ));
}

#[tokio::test]
async fn pdf_directory_without_documents_indexes_nothing() {
    let dir = tempfile::tempdir().expect("tempdir");
    let inbox = dir.path().join("inbox");
    std::fs::create_dir_all(&inbox).expect("inbox");
    std::fs::write(inbox.join("notes.txt"), "not a pdf").expect("write");

    let service = RagService::new(
        Arc::new(PdfLoader::new()),
        Arc::new(HashEmbeddingClient::new("hash-embedding", 16)),
        dir.path().join("DBs"),
        ChunkSettings::default(),
    );
    let summary = service.index(&inbox, "docs").await.expect("index");
    assert_eq!(summary.pages_loaded, 0);
    assert_eq!(summary.added_count, 0);
}
