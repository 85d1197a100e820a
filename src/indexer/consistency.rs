// Index consistency validation
// Every vector row must map to exactly one docstore row with the same position

#[cfg(test)]
mod tests;

use anyhow::Result;
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

use crate::database::{DocStore, VectorStore};

/// Consistency check results between the docstore and the vector table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsistencyReport {
    /// Number of chunks in the docstore
    pub docstore_chunks: usize,
    /// Number of vectors in LanceDB
    pub vector_embeddings: usize,
    /// Positions stored in the docstore without a vector
    pub missing_vectors: Vec<u64>,
    /// Positions with a vector but no docstore row
    pub orphaned_vectors: Vec<u64>,
    /// Positions that appear more than once in the vector table
    pub duplicate_vectors: Vec<u64>,
    /// Overall consistency status
    pub is_consistent: bool,
}

/// Compares the positions held by both halves of an index
pub struct ConsistencyValidator<'a> {
    docs: &'a DocStore,
    vectors: &'a VectorStore,
}

impl<'a> ConsistencyValidator<'a> {
    #[inline]
    pub fn new(docs: &'a DocStore, vectors: &'a VectorStore) -> Self {
        Self { docs, vectors }
    }

    #[inline]
    pub async fn validate_consistency(&self) -> Result<ConsistencyReport> {
        info!("Starting index consistency validation");

        let doc_positions = self.docs.list_positions().await?;
        debug!("Found {} chunks in docstore", doc_positions.len());

        let vector_positions = self.vectors.list_positions().await?;
        debug!("Found {} vectors in LanceDB", vector_positions.len());

        let report = ConsistencyReport::compare(&doc_positions, &vector_positions);

        if report.is_consistent {
            info!("Index consistency validation passed");
        } else {
            warn!("Index consistency validation found issues");
            log_consistency_issues(&report);
        }

        Ok(report)
    }
}

fn log_consistency_issues(report: &ConsistencyReport) {
    if !report.missing_vectors.is_empty() {
        warn!(
            "Found {} docstore chunks without vectors",
            report.missing_vectors.len()
        );
    }

    if !report.orphaned_vectors.is_empty() {
        warn!(
            "Found {} vectors without docstore chunks",
            report.orphaned_vectors.len()
        );
    }

    if !report.duplicate_vectors.is_empty() {
        warn!(
            "Found {} positions with more than one vector",
            report.duplicate_vectors.len()
        );
    }
}

impl ConsistencyReport {
    /// Build a report from the position lists of both stores
    #[inline]
    #[must_use]
    pub fn compare(doc_positions: &[u64], vector_positions: &[u64]) -> Self {
        let docs: BTreeSet<u64> = doc_positions.iter().copied().collect();

        let mut vectors = BTreeSet::new();
        let mut duplicates = BTreeSet::new();
        for &position in vector_positions {
            if !vectors.insert(position) {
                duplicates.insert(position);
            }
        }

        let missing_vectors: Vec<u64> = docs.difference(&vectors).copied().collect();
        let orphaned_vectors: Vec<u64> = vectors.difference(&docs).copied().collect();
        let duplicate_vectors: Vec<u64> = duplicates.into_iter().collect();

        let is_consistent = missing_vectors.is_empty()
            && orphaned_vectors.is_empty()
            && duplicate_vectors.is_empty();

        Self {
            docstore_chunks: doc_positions.len(),
            vector_embeddings: vector_positions.len(),
            missing_vectors,
            orphaned_vectors,
            duplicate_vectors,
            is_consistent,
        }
    }

    /// Get a human-readable summary of the consistency report
    #[inline]
    pub fn summary(&self) -> String {
        if self.is_consistent {
            format!(
                "Index is consistent: {} chunks in docstore, {} vectors in LanceDB",
                self.docstore_chunks, self.vector_embeddings
            )
        } else {
            format!(
                "Index inconsistencies found: {} chunks without vectors, {} orphaned vectors, {} duplicated positions",
                self.missing_vectors.len(),
                self.orphaned_vectors.len(),
                self.duplicate_vectors.len()
            )
        }
    }

    /// Get the total number of consistency issues
    #[inline]
    pub fn total_issues(&self) -> usize {
        self.missing_vectors.len() + self.orphaned_vectors.len() + self.duplicate_vectors.len()
    }
}
