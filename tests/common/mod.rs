#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};

use docvec::embedder::{Embedder, EmbedderOptions, RetryPolicy};
use docvec::docvec_core::embedding::{EmbeddingError, EmbeddingProvider};

pub const DIMS: usize = 32;

/// Deterministic offline provider: letter-frequency vectors.
#[derive(Default)]
pub struct HashProvider {
    pub calls: AtomicUsize,
    pub texts: AtomicUsize,
}

impl HashProvider {
    pub fn vector_for(text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; DIMS];
        for b in text.to_lowercase().bytes() {
            v[b as usize % DIMS] += 1.0;
        }
        v
    }

    pub fn texts_embedded(&self) -> usize {
        self.texts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingProvider for HashProvider {
    fn model_name(&self) -> &str {
        "hash-test"
    }
    fn dims(&self) -> usize {
        DIMS
    }
    fn max_batch_size(&self) -> usize {
        8
    }
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.texts.fetch_add(texts.len(), Ordering::SeqCst);
        Ok(texts.iter().map(|t| Self::vector_for(t)).collect())
    }
}

pub fn embedder(provider: Arc<HashProvider>) -> Embedder {
    Embedder::new(
        provider,
        EmbedderOptions {
            batch_size: 8,
            concurrency: 2,
            timeout: Duration::from_secs(10),
            retry: RetryPolicy {
                max_retries: 1,
                base_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(2),
            },
        },
    )
}

/// A one-page PDF whose text is `lines`, one per line, in Courier.
pub fn pdf_with_lines(lines: &[String]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => font_id,
        },
    });

    let mut operations = vec![
        Operation::new("BT", vec![]),
        Operation::new("Tf", vec!["F1".into(), 10.into()]),
        Operation::new("TL", vec![12.into()]),
        Operation::new("Td", vec![40.into(), 760.into()]),
    ];
    for line in lines {
        operations.push(Operation::new("Tj", vec![Object::string_literal(line.as_str())]));
        operations.push(Operation::new("T*", vec![]));
    }
    operations.push(Operation::new("ET", vec![]));
    let content = Content { operations };

    let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
    });
    let pages = dictionary! {
        "Type" => "Pages",
        "Kids" => vec![page_id.into()],
        "Count" => 1,
        "Resources" => resources_id,
        "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages));
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut out = Vec::new();
    doc.save_to(&mut out).unwrap();
    out
}

/// 200 words over 10 lines.
pub fn two_hundred_words() -> Vec<String> {
    (0..10)
        .map(|line| {
            (0..20)
                .map(|w| format!("word{}", line * 20 + w))
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect()
}
