use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::{debug, error};
use uuid::Uuid;

use super::DocumentOutcome;
use crate::recognition::{Document, RecognitionService};
use crate::record::assemble;
use crate::TARGET_PIPELINE;

/// Runs recognition and record assembly for documents, with a cap on how
/// many recognition calls are in flight.
#[derive(Clone)]
pub struct DocumentProcessor {
    recognizer: Arc<dyn RecognitionService>,
    max_concurrent_requests: usize,
}

impl DocumentProcessor {
    pub fn new(recognizer: Arc<dyn RecognitionService>, max_concurrent_requests: usize) -> Self {
        DocumentProcessor {
            recognizer,
            max_concurrent_requests: max_concurrent_requests.max(1),
        }
    }

    /// Recognise one document and turn its entities into records stamped
    /// with the source file and job. Failures are captured in the outcome.
    pub async fn process_document(&self, job_id: Uuid, document: &Document) -> DocumentOutcome {
        let file_name = document.file_name.clone();

        match self.recognizer.extract_entities(document).await {
            Ok(entities) => {
                let records: Vec<_> = assemble(&entities)
                    .into_iter()
                    .map(|record| record.with_source(&file_name, job_id))
                    .collect();
                debug!(
                    target: TARGET_PIPELINE,
                    "{}: {} records from {} entities", file_name, records.len(), entities.len()
                );
                DocumentOutcome::Extracted { file_name, records }
            }
            Err(e) => {
                error!(target: TARGET_PIPELINE, "Error processing {}: {:#}", file_name, e);
                DocumentOutcome::Failed {
                    file_name,
                    error: format!("{:#}", e),
                }
            }
        }
    }

    /// Process a group of documents concurrently. Outcomes come back in
    /// input order.
    pub async fn process_group(&self, job_id: Uuid, documents: &[Document]) -> Vec<DocumentOutcome> {
        stream::iter(documents.iter().map(|document| self.process_document(job_id, document)))
            .buffered(self.max_concurrent_requests)
            .collect()
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{Entity, EntityType, ExtractedEntities};
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Returns one contact per document; fails for names starting with "bad"
    #[derive(Default)]
    struct StubRecognizer {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl RecognitionService for StubRecognizer {
        async fn extract_entities(&self, document: &Document) -> Result<ExtractedEntities> {
            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(current, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if document.file_name.starts_with("bad") {
                return Err(anyhow!("unreadable scan"));
            }
            Ok(ExtractedEntities::from(vec![
                Entity::new(EntityType::Name, "John Smith", 0.9),
                Entity::new(EntityType::Mobile, "0412345678", 0.9),
                Entity::new(EntityType::Address, "12 Example Street Brisbane", 0.9),
            ]))
        }
    }

    fn documents(names: &[&str]) -> Vec<Document> {
        names.iter().map(|name| Document::new(name, b"%PDF".to_vec())).collect()
    }

    #[tokio::test]
    async fn test_process_document_stamps_source() {
        let processor = DocumentProcessor::new(Arc::new(StubRecognizer::default()), 2);
        let job_id = Uuid::new_v4();

        match processor.process_document(job_id, &documents(&["a.pdf"])[0]).await {
            DocumentOutcome::Extracted { file_name, records } => {
                assert_eq!(file_name, "a.pdf");
                assert_eq!(records.len(), 1);
                assert_eq!(records[0].source_file.as_deref(), Some("a.pdf"));
                assert_eq!(records[0].job_id, Some(job_id));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_process_group_keeps_order_and_failures() {
        let processor = DocumentProcessor::new(Arc::new(StubRecognizer::default()), 3);
        let outcomes = processor
            .process_group(Uuid::new_v4(), &documents(&["a.pdf", "bad.pdf", "c.pdf"]))
            .await;

        let names: Vec<&str> = outcomes.iter().map(DocumentOutcome::file_name).collect();
        assert_eq!(names, vec!["a.pdf", "bad.pdf", "c.pdf"]);
        assert!(!outcomes[0].is_failed());
        assert!(outcomes[1].is_failed());
        assert!(!outcomes[2].is_failed());

        if let DocumentOutcome::Failed { error, .. } = &outcomes[1] {
            assert!(error.contains("unreadable scan"));
        }
    }

    #[tokio::test]
    async fn test_process_group_bounds_concurrency() {
        let recognizer = Arc::new(StubRecognizer::default());
        let processor = DocumentProcessor::new(recognizer.clone(), 2);
        let names: Vec<String> = (0..8).map(|i| format!("doc{}.pdf", i)).collect();
        let names: Vec<&str> = names.iter().map(String::as_str).collect();

        let outcomes = processor.process_group(Uuid::new_v4(), &documents(&names)).await;
        assert_eq!(outcomes.len(), 8);
        assert_eq!(recognizer.peak.load(Ordering::SeqCst), 2);
    }
}
