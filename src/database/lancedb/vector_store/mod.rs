
use super::EmbeddingRecord;
use crate::HelperError;
use arrow::array::{Array, FixedSizeListArray, Float32Array, RecordBatchIterator, UInt64Array};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use futures::TryStreamExt;
use lancedb::{
    Connection, DistanceType, Table,
    query::{ExecutableQuery, QueryBase, Select},
};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

const TABLE_NAME: &str = "embeddings";

/// Vector database store using LanceDB for similarity search
pub struct VectorStore {
    connection: Connection,
    table: Table,
    vector_dimension: usize,
}

impl std::fmt::Debug for VectorStore {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorStore")
            .field("table", &TABLE_NAME)
            .field("vector_dimension", &self.vector_dimension)
            .finish_non_exhaustive()
    }
}

/// Search result from vector similarity search
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchResult {
    /// Position of the matching chunk
    pub position: u64,
    /// Cosine distance to the query (0 is identical)
    pub distance: f32,
}

impl SearchResult {
    #[inline]
    #[must_use]
    pub fn similarity_score(&self) -> f32 {
        1.0 - self.distance
    }
}

impl VectorStore {
    /// Create a fresh, empty embeddings table under `dir`, replacing any existing one
    #[inline]
    pub async fn create(dir: &Path, vector_dimension: usize) -> Result<Self, HelperError> {
        if vector_dimension == 0 {
            return Err(HelperError::Database(
                "Vector dimension must be greater than zero".to_string(),
            ));
        }

        std::fs::create_dir_all(dir).map_err(|e| {
            HelperError::Database(format!("Failed to create vector database directory: {}", e))
        })?;

        let connection = Self::connect(dir).await?;
        Self::drop_table_if_exists(&connection).await?;

        info!(
            "Creating embeddings table with {} dimensions at {:?}",
            vector_dimension, dir
        );
        let table = connection
            .create_empty_table(TABLE_NAME, Self::create_schema(vector_dimension))
            .execute()
            .await
            .map_err(|e| HelperError::Database(format!("Failed to create table: {}", e)))?;

        Ok(Self {
            connection,
            table,
            vector_dimension,
        })
    }

    /// Open an existing embeddings table under `dir`
    #[inline]
    pub async fn open(dir: &Path) -> Result<Self, HelperError> {
        if !dir.is_dir() {
            return Err(HelperError::Database(format!(
                "Vector database not found at {}",
                dir.display()
            )));
        }

        let connection = Self::connect(dir).await?;
        let table = connection
            .open_table(TABLE_NAME)
            .execute()
            .await
            .map_err(|e| HelperError::Database(format!("Failed to open table: {}", e)))?;

        let vector_dimension = Self::detect_vector_dimension(&table).await?;
        debug!("Opened embeddings table with {} dimensions", vector_dimension);

        Ok(Self {
            connection,
            table,
            vector_dimension,
        })
    }

    async fn connect(dir: &Path) -> Result<Connection, HelperError> {
        let uri = dir.to_string_lossy().to_string();
        debug!("Connecting to LanceDB at {}", uri);

        lancedb::connect(&uri).execute().await.map_err(|e| {
            error!("Failed to connect to LanceDB: {}", e);
            HelperError::Database(format!("Failed to connect to LanceDB: {}", e))
        })
    }

    /// Detect vector dimension from existing table schema
    async fn detect_vector_dimension(table: &Table) -> Result<usize, HelperError> {
        let schema = table
            .schema()
            .await
            .map_err(|e| HelperError::Database(format!("Failed to get table schema: {}", e)))?;

        schema
            .fields()
            .iter()
            .find(|field| field.name() == "vector")
            .and_then(|field| match field.data_type() {
                DataType::FixedSizeList(_, size) => usize::try_from(*size).ok(),
                _ => None,
            })
            .ok_or_else(|| {
                HelperError::Database(
                    "Could not find vector column or determine dimension".to_string(),
                )
            })
    }

    fn create_schema(vector_dim: usize) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("position", DataType::UInt64, false),
            Field::new(
                "vector",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, false)),
                    vector_dim as i32,
                ),
                false,
            ),
        ]))
    }

    #[inline]
    #[must_use]
    pub fn vector_dimension(&self) -> usize {
        self.vector_dimension
    }

    /// Append a batch of embeddings
    #[inline]
    pub async fn add_batch(&self, records: &[EmbeddingRecord]) -> Result<(), HelperError> {
        if records.is_empty() {
            debug!("No embeddings to store");
            return Ok(());
        }

        let record_batch = self.create_record_batch(records)?;
        let schema = record_batch.schema();
        let reader = RecordBatchIterator::new(std::iter::once(Ok(record_batch)), schema);

        self.table
            .add(reader)
            .execute()
            .await
            .map_err(|e| HelperError::Database(format!("Failed to insert embeddings: {}", e)))?;

        debug!("Stored batch of {} embeddings", records.len());
        Ok(())
    }

    fn create_record_batch(&self, records: &[EmbeddingRecord]) -> Result<RecordBatch, HelperError> {
        let vector_dim = self.vector_dimension;

        let mut positions = Vec::with_capacity(records.len());
        let mut flat_values = Vec::with_capacity(records.len() * vector_dim);
        for record in records {
            if record.vector.len() != vector_dim {
                return Err(HelperError::Database(format!(
                    "Embedding at position {} has {} dimensions, table expects {}",
                    record.position,
                    record.vector.len(),
                    vector_dim
                )));
            }
            positions.push(record.position);
            flat_values.extend_from_slice(&record.vector);
        }

        let field = Arc::new(Field::new("item", DataType::Float32, false));
        let vector_array = FixedSizeListArray::try_new(
            field,
            vector_dim as i32,
            Arc::new(Float32Array::from(flat_values)),
            None,
        )
        .map_err(|e| HelperError::Database(format!("Failed to create vector array: {}", e)))?;

        let arrays: Vec<Arc<dyn Array>> = vec![
            Arc::new(UInt64Array::from(positions)),
            Arc::new(vector_array),
        ];

        RecordBatch::try_new(Self::create_schema(vector_dim), arrays)
            .map_err(|e| HelperError::Database(format!("Failed to create record batch: {}", e)))
    }

    /// Exact cosine search over every stored vector
    ///
    /// Results are ordered by ascending distance; equal distances keep
    /// ascending position order so repeated queries are stable.
    #[inline]
    pub async fn search(
        &self,
        query_vector: &[f32],
        limit: usize,
    ) -> Result<Vec<SearchResult>, HelperError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        if query_vector.len() != self.vector_dimension {
            return Err(HelperError::Database(format!(
                "Query has {} dimensions, index expects {}",
                query_vector.len(),
                self.vector_dimension
            )));
        }

        debug!("Searching for similar vectors with limit: {}", limit);

        let stream = self
            .table
            .vector_search(query_vector)
            .map_err(|e| HelperError::Database(format!("Failed to create vector search: {}", e)))?
            .column("vector")
            .distance_type(DistanceType::Cosine)
            .select(Select::columns(&["position"]))
            .limit(limit)
            .execute()
            .await
            .map_err(|e| HelperError::Database(format!("Failed to execute search: {}", e)))?;

        let batches: Vec<RecordBatch> = stream
            .try_collect()
            .await
            .map_err(|e| HelperError::Database(format!("Failed to read result stream: {}", e)))?;

        let mut results = Vec::new();
        for batch in &batches {
            results.extend(Self::parse_search_batch(batch)?);
        }

        results.sort_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then(a.position.cmp(&b.position))
        });
        results.truncate(limit);

        debug!("Vector search returned {} results", results.len());
        Ok(results)
    }

    fn parse_search_batch(batch: &RecordBatch) -> Result<Vec<SearchResult>, HelperError> {
        let positions = Self::position_column(batch)?;

        let distances = batch
            .column_by_name("_distance")
            .ok_or_else(|| HelperError::Database("Missing _distance column".to_string()))?
            .as_any()
            .downcast_ref::<Float32Array>()
            .ok_or_else(|| HelperError::Database("Invalid _distance column type".to_string()))?;

        Ok((0..batch.num_rows())
            .map(|row| SearchResult {
                position: positions.value(row),
                distance: if distances.is_null(row) {
                    f32::MAX
                } else {
                    distances.value(row)
                },
            })
            .collect())
    }

    fn position_column(batch: &RecordBatch) -> Result<&UInt64Array, HelperError> {
        batch
            .column_by_name("position")
            .ok_or_else(|| HelperError::Database("Missing position column".to_string()))?
            .as_any()
            .downcast_ref::<UInt64Array>()
            .ok_or_else(|| HelperError::Database("Invalid position column type".to_string()))
    }

    /// Every stored position, sorted ascending
    #[inline]
    pub async fn list_positions(&self) -> Result<Vec<u64>, HelperError> {
        let stream = self
            .table
            .query()
            .select(Select::columns(&["position"]))
            .execute()
            .await
            .map_err(|e| HelperError::Database(format!("Failed to query positions: {}", e)))?;

        let batches: Vec<RecordBatch> = stream
            .try_collect()
            .await
            .map_err(|e| HelperError::Database(format!("Failed to read result stream: {}", e)))?;

        let mut positions = Vec::new();
        for batch in &batches {
            positions.extend(Self::position_column(batch)?.values().iter().copied());
        }
        positions.sort_unstable();
        Ok(positions)
    }

    /// Get the total number of embeddings stored
    #[inline]
    pub async fn count_embeddings(&self) -> Result<u64, HelperError> {
        let count = self
            .table
            .count_rows(None)
            .await
            .map_err(|e| HelperError::Database(format!("Failed to count rows: {}", e)))?;

        Ok(count as u64)
    }

    /// Compact the table files once a build has finished writing
    #[inline]
    pub async fn optimize(&self) -> Result<(), HelperError> {
        debug!("Optimizing vector database");

        self.table
            .optimize(lancedb::table::OptimizeAction::All)
            .await
            .map_err(|e| HelperError::Database(format!("Failed to optimize table: {}", e)))?;

        info!("Vector database optimization completed");
        Ok(())
    }

    /// Check that the table is listed and readable
    #[inline]
    pub async fn validate_integrity(&self) -> Result<bool, HelperError> {
        debug!("Validating vector database integrity");

        let table_names = match self.connection.table_names().execute().await {
            Ok(names) => names,
            Err(e) => {
                error!("Failed to list tables during integrity check: {}", e);
                return Ok(false);
            }
        };

        if !table_names.iter().any(|name| name == TABLE_NAME) {
            warn!("Embeddings table missing during integrity check");
            return Ok(false);
        }

        match self.table.count_rows(None).await {
            Ok(count) => {
                debug!("Vector database integrity check passed, {} rows found", count);
                Ok(true)
            }
            Err(e) => {
                error!("Failed to count rows during integrity check: {}", e);
                Ok(false)
            }
        }
    }

    async fn drop_table_if_exists(connection: &Connection) -> Result<(), HelperError> {
        let table_names = connection.table_names().execute().await.map_err(|e| {
            HelperError::Database(format!("Failed to list tables for drop: {}", e))
        })?;

        if table_names.iter().any(|name| name == TABLE_NAME) {
            info!("Dropping existing embeddings table");
            connection
                .drop_table(TABLE_NAME)
                .await
                .map_err(|e| HelperError::Database(format!("Failed to drop table: {}", e)))?;
        }

        Ok(())
    }
}
