use async_trait::async_trait;
use diabetes_rag_core::{
    AnswerSynthesizer, BuildOptions, ChunkingConfig, Embedder, EmbeddingError, IndexBuilder,
    IndexOrigin, QueryEngine, QueryError, ResponseMode, SynthesisError,
};
use std::fs;
use std::sync::Arc;
use tempfile::tempdir;

/// Bag of hashed lowercase words.
struct WordHashEmbedder;

impl WordHashEmbedder {
    fn vector(text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; 96];
        for word in text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|word| word.len() > 3)
        {
            let mut hash = 1469598103934665603u64;
            for byte in word.bytes() {
                hash ^= byte as u64;
                hash = hash.wrapping_mul(1099511628211);
            }
            vector[(hash % 96) as usize] += 1.0;
        }
        vector
    }
}

#[async_trait]
impl Embedder for WordHashEmbedder {
    fn model_identity(&self) -> String {
        "test:word-hash".to_string()
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts.iter().map(|text| Self::vector(text)).collect())
    }
}

struct EchoSynthesizer;

#[async_trait]
impl AnswerSynthesizer for EchoSynthesizer {
    async fn complete(&self, prompt: &str) -> Result<String, SynthesisError> {
        Ok(format!("answered from {} prompt chars", prompt.chars().count()))
    }
}

struct DownSynthesizer;

#[async_trait]
impl AnswerSynthesizer for DownSynthesizer {
    async fn complete(&self, _prompt: &str) -> Result<String, SynthesisError> {
        Err(SynthesisError::BackendResponse {
            status: 500,
            details: "internal error".to_string(),
        })
    }
}

fn write_corpus(dir: &std::path::Path) {
    fs::write(
        dir.join("insuline.txt"),
        "L'insuline est une hormone produite par le pancréas. \
         Elle permet au glucose d'entrer dans les cellules.\n\n\
         Dans le DT1, le pancréas ne produit plus d'insuline.",
    )
    .unwrap();
    fs::write(
        dir.join("alimentation.md"),
        "# Alimentation\n\nUne alimentation équilibrée limite les pics de glycémie. \
         Les fibres ralentissent l'absorption des sucres.",
    )
    .unwrap();
    fs::write(
        dir.join("activite.txt"),
        "L'activité physique régulière améliore la sensibilité à l'insuline \
         et aide au contrôle du poids.",
    )
    .unwrap();
    fs::write(dir.join("notes.docx"), "ignored format").unwrap();
}

fn options(documents: &std::path::Path, storage: &std::path::Path) -> BuildOptions {
    let mut options = BuildOptions::new(documents, storage);
    options.chunking = ChunkingConfig::new(120, 20).unwrap();
    options.embed_batch_size = 2;
    options
}

#[tokio::test]
async fn build_persist_reload_and_answer() {
    let documents = tempdir().unwrap();
    let storage = tempdir().unwrap();
    write_corpus(documents.path());
    let location = storage.path().join("index");
    let embedder: Arc<dyn Embedder> = Arc::new(WordHashEmbedder);

    let built = IndexBuilder::new(options(documents.path(), &location), Arc::clone(&embedder))
        .build_or_load()
        .await
        .unwrap();
    assert_eq!(built.origin, IndexOrigin::Built);
    assert!(location.join("manifest.json").is_file());
    assert!(location.join("entries.json").is_file());

    let reloaded = IndexBuilder::new(options(documents.path(), &location), Arc::clone(&embedder))
        .build_or_load()
        .await
        .unwrap();
    assert_eq!(reloaded.origin, IndexOrigin::Loaded);
    assert_eq!(reloaded.index.len(), built.index.len());

    let engine = QueryEngine::new(reloaded.index, embedder, 3)
        .unwrap()
        .with_synthesizer(Arc::new(EchoSynthesizer), ResponseMode::Compact);

    let passages = engine
        .query("Quel organe produit l'insuline ?")
        .await
        .unwrap();
    assert!(!passages.is_empty());
    assert!(passages.len() <= 3);
    assert_eq!(passages.hits[0].chunk.source_name(), "insuline.txt");
    assert!(passages
        .hits
        .windows(2)
        .all(|pair| pair[0].score >= pair[1].score));

    let answer = engine.answer("Quel organe produit l'insuline ?").await.unwrap();
    assert!(answer.synthesis.is_ok());
    let citations = answer.citations();
    assert_eq!(citations[0].rank, 1);
    assert_eq!(citations[0].source_name, "insuline.txt");
}

#[tokio::test]
async fn synthesis_outage_still_returns_passages() {
    let documents = tempdir().unwrap();
    let storage = tempdir().unwrap();
    write_corpus(documents.path());
    let embedder: Arc<dyn Embedder> = Arc::new(WordHashEmbedder);

    let ready = IndexBuilder::new(
        options(documents.path(), &storage.path().join("index")),
        Arc::clone(&embedder),
    )
    .build_or_load()
    .await
    .unwrap();
    let engine = QueryEngine::new(ready.index, embedder, 2)
        .unwrap()
        .with_synthesizer(Arc::new(DownSynthesizer), ResponseMode::Refine);

    let answer = engine
        .answer("Comment l'alimentation agit sur la glycémie ?")
        .await
        .unwrap();

    assert!(matches!(
        answer.synthesis,
        Err(SynthesisError::BackendResponse { status: 500, .. })
    ));
    assert_eq!(answer.cited_passages.len(), 2);

    assert!(matches!(
        engine.answer("  ").await,
        Err(QueryError::EmptyQuery)
    ));
}
