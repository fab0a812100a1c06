//! Deterministic providers and collaborators shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use querymind_rs::db::{QueryExecutor, QueryOutcome};
use querymind_rs::ml::{Embedding, EmbeddingProvider};
use querymind_rs::{CompletionProvider, QueryMindError, Result};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Words that get their own embedding dimension
const VOCABULARY: &[&str] = &[
    "customer", "order", "product", "user", "email", "total", "price", "invoice", "planet", "shipment",
];

/// Embeds text as a bag of vocabulary words plus a small bias
pub struct KeywordEmbedder {
    pub calls: AtomicUsize,
    fail: bool,
    fail_batches: bool,
    model: &'static str,
}

impl KeywordEmbedder {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail: false,
            fail_batches: false,
            model: "keyword-bag",
        }
    }

    /// Same vectors, reported under another model name
    pub fn named(model: &'static str) -> Self {
        Self { model, ..Self::new() }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }

    /// Embeds single questions but fails every multi-text index build
    pub fn failing_batches() -> Self {
        Self {
            fail_batches: true,
            ..Self::new()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

pub fn keyword_vector(text: &str) -> Embedding {
    let lowered = text.to_lowercase();
    let mut vector: Embedding = VOCABULARY
        .iter()
        .map(|word| lowered.matches(word).count() as f32)
        .collect();
    vector.push(0.1);
    vector
}

#[async_trait]
impl EmbeddingProvider for KeywordEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail || (self.fail_batches && texts.len() > 1) {
            return Err(QueryMindError::Embedding("embedding server unreachable".to_string()));
        }
        Ok(texts.iter().map(|t| keyword_vector(t)).collect())
    }

    fn model_name(&self) -> &str {
        self.model
    }
}

/// Replies with fixed text and records every prompt
pub struct ScriptedCompletion {
    reply: std::result::Result<String, String>,
    pub prompts: Mutex<Vec<String>>,
}

impl ScriptedCompletion {
    pub fn replying(text: &str) -> Self {
        Self {
            reply: Ok(text.to_string()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(reason: &str) -> Self {
        Self {
            reply: Err(reason.to_string()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.prompts.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl CompletionProvider for ScriptedCompletion {
    async fn complete(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.reply.clone().map_err(QueryMindError::Completion)
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

/// Records executed statements and answers with a fixed outcome
pub struct RecordingExecutor {
    outcome: std::result::Result<QueryOutcome, String>,
    pub executed: Mutex<Vec<String>>,
}

impl RecordingExecutor {
    pub fn returning(outcome: QueryOutcome) -> Self {
        Self {
            outcome: Ok(outcome),
            executed: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(reason: &str) -> Self {
        Self {
            outcome: Err(reason.to_string()),
            executed: Mutex::new(Vec::new()),
        }
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }
}

impl QueryExecutor for RecordingExecutor {
    fn execute(&self, sql: &str) -> Result<QueryOutcome> {
        self.executed.lock().unwrap().push(sql.to_string());
        self.outcome.clone().map_err(QueryMindError::Database)
    }
}

pub const SHOP_SCHEMA: &str = "CREATE TABLE `customers` (
  `id` int NOT NULL,
  `name` varchar(100),
  `email` varchar(255),
  PRIMARY KEY (`id`)
) ENGINE=InnoDB;

CREATE TABLE `orders` (
  `id` int NOT NULL,
  `customer_id` int,
  `total` decimal(10,2)
) ENGINE=InnoDB;

CREATE TABLE `products` (
  `id` int NOT NULL,
  `name` varchar(100),
  `price` decimal(10,2)
) ENGINE=InnoDB;
";
