use std::{env, sync::Once};

use rustyrag::{config, embedding, generation};

static INIT: Once = Once::new();

fn set_default_env(key: &str, value: &str) {
    let needs_value = env::var(key).map(|v| v.trim().is_empty()).unwrap_or(true);
    if needs_value {
        // SAFETY: Tests run serially via Once and we intentionally mutate process env.
        unsafe {
            env::set_var(key, value);
        }
    }
}

fn init_config_once() {
    INIT.call_once(|| {
        set_default_env("EMBEDDING_PROVIDER", "ollama");
        set_default_env("EMBEDDING_MODEL", "nomic-embed-text");
        set_default_env("EMBEDDING_DIMENSION", "768");
        set_default_env("OLLAMA_URL", "http://127.0.0.1:11434");
        set_default_env("GENERATION_MODEL", "mistral");
        config::init_config();
    });
}

#[tokio::test]
#[ignore = "Requires live Ollama embeddings"]
async fn live_ollama_embedding_roundtrip() {
    init_config_once();
    let config = config::get_config();
    let client = embedding::get_embedding_client(config).expect("embedding client");
    let vectors = client
        .generate_embeddings(vec!["rusty-rag live embedding".to_string()])
        .await
        .expect("failed to request embeddings from provider");
    assert_eq!(vectors.len(), 1, "expected embedding per input chunk");
    assert_eq!(
        vectors[0].len(),
        config.embedding_dimension,
        "embedding dimension mismatch"
    );
}

#[tokio::test]
#[ignore = "Requires live Ollama generation model"]
async fn live_ollama_generation_answers() {
    init_config_once();
    let model = generation::get_language_model(config::get_config())
        .expect("language model")
        .expect("GENERATION_MODEL set");
    let answer = model
        .generate("Reply with the single word: ready")
        .await
        .expect("failed to generate answer");
    assert!(!answer.is_empty());
}
