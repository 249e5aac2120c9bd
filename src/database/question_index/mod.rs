
use arrow::array::{Array, FixedSizeListArray, Float32Array, RecordBatchIterator, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use futures::TryStreamExt;
use lancedb::{
    Connection, DistanceType,
    query::{ExecutableQuery, QueryBase},
};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use crate::SupportError;

const TABLE_NAME: &str = "questions";

/// Nearest-neighbor index over the corpus of normalized question documents.
///
/// Rebuilds are total: the existing table is dropped and recreated from the
/// new corpus, never patched, so stale paraphrases cannot survive a dataset
/// edit. Distances are cosine (lower = more similar).
pub struct QuestionIndex {
    connection: Connection,
    table_name: String,
}

/// One row inserted at rebuild time.
#[derive(Debug, Clone)]
pub struct IndexRecord {
    pub id: String,
    pub vector: Vec<f32>,
    pub document: String,
    pub created_at: String,
}

/// One nearest-neighbor search hit.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct IndexedDocument {
    pub document: String,
    pub distance: f32,
}

impl QuestionIndex {
    /// Open (or create) the index database under `db_path`.
    #[inline]
    pub async fn new<P: AsRef<Path>>(db_path: P) -> Result<Self, SupportError> {
        let db_path = db_path.as_ref();
        debug!("Initializing LanceDB at path: {:?}", db_path);

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                SupportError::Index(format!("Failed to create vector database directory: {}", e))
            })?;
        }

        let uri = format!("file://{}", db_path.display());
        let connection = lancedb::connect(&uri)
            .execute()
            .await
            .map_err(|e| SupportError::Index(format!("Failed to connect to LanceDB: {}", e)))?;

        Ok(Self {
            connection,
            table_name: TABLE_NAME.to_string(),
        })
    }

    /// Whether a populated question table exists.
    #[inline]
    pub async fn exists(&self) -> Result<bool, SupportError> {
        let table_names = self
            .connection
            .table_names()
            .execute()
            .await
            .map_err(|e| SupportError::Index(format!("Failed to list tables: {}", e)))?;

        if !table_names.contains(&self.table_name) {
            return Ok(false);
        }

        Ok(self.count().await? > 0)
    }

    /// Number of indexed documents.
    #[inline]
    pub async fn count(&self) -> Result<usize, SupportError> {
        let table = self.open_table().await?;
        let count = table
            .count_rows(None)
            .await
            .map_err(|e| SupportError::Index(format!("Failed to count rows: {}", e)))?;
        Ok(count)
    }

    /// Replace the whole index with `records`: drop, recreate, insert.
    #[inline]
    pub async fn rebuild(&self, records: &[IndexRecord]) -> Result<(), SupportError> {
        self.drop_index().await?;

        if records.is_empty() {
            info!("Rebuild requested with no records; index left empty");
            return Ok(());
        }

        let dimension = records[0].vector.len();
        if records.iter().any(|r| r.vector.len() != dimension) {
            return Err(SupportError::Index(
                "All index records must share one vector dimension".to_string(),
            ));
        }

        let schema = create_schema(dimension);
        self.connection
            .create_empty_table(&self.table_name, Arc::clone(&schema))
            .execute()
            .await
            .map_err(|e| SupportError::Index(format!("Failed to create table: {}", e)))?;

        let record_batch = create_record_batch(records, &schema, dimension)?;
        let table = self.open_table().await?;

        let reader = RecordBatchIterator::new(std::iter::once(Ok(record_batch)), schema);
        table
            .add(reader)
            .execute()
            .await
            .map_err(|e| SupportError::Index(format!("Failed to insert records: {}", e)))?;

        info!("Rebuilt question index with {} documents", records.len());
        Ok(())
    }

    /// Return the `k` nearest documents to `query_vector` by cosine distance.
    #[inline]
    pub async fn search(
        &self,
        query_vector: &[f32],
        k: usize,
    ) -> Result<Vec<IndexedDocument>, SupportError> {
        debug!("Searching question index with limit: {}", k);

        let table = self.open_table().await?;

        let query = table
            .vector_search(query_vector)
            .map_err(|e| SupportError::Index(format!("Failed to create vector search: {}", e)))?
            .distance_type(DistanceType::Cosine)
            .column("vector")
            .limit(k);

        let mut results = query
            .execute()
            .await
            .map_err(|e| SupportError::Index(format!("Failed to execute search: {}", e)))?;

        let mut hits = Vec::new();
        while let Some(batch) = results
            .try_next()
            .await
            .map_err(|e| SupportError::Index(format!("Failed to read result stream: {}", e)))?
        {
            hits.extend(parse_search_batch(&batch)?);
        }

        debug!("Parsed {} search results", hits.len());
        Ok(hits)
    }

    /// Drop the question table if it exists.
    #[inline]
    pub async fn drop_index(&self) -> Result<(), SupportError> {
        let table_names = self
            .connection
            .table_names()
            .execute()
            .await
            .map_err(|e| SupportError::Index(format!("Failed to list tables for drop: {}", e)))?;

        if table_names.contains(&self.table_name) {
            info!("Dropping existing question table");
            self.connection
                .drop_table(&self.table_name)
                .await
                .map_err(|e| SupportError::Index(format!("Failed to drop table: {}", e)))?;
        }

        Ok(())
    }

    async fn open_table(&self) -> Result<lancedb::Table, SupportError> {
        self.connection
            .open_table(&self.table_name)
            .execute()
            .await
            .map_err(|e| SupportError::Index(format!("Failed to open table: {}", e)))
    }
}

fn create_schema(dimension: usize) -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new(
            "vector",
            DataType::FixedSizeList(
                Arc::new(Field::new("item", DataType::Float32, false)),
                dimension as i32,
            ),
            false,
        ),
        Field::new("document", DataType::Utf8, false),
        Field::new("created_at", DataType::Utf8, false),
    ]))
}

fn create_record_batch(
    records: &[IndexRecord],
    schema: &Arc<Schema>,
    dimension: usize,
) -> Result<RecordBatch, SupportError> {
    let len = records.len();

    let mut ids = Vec::with_capacity(len);
    let mut documents = Vec::with_capacity(len);
    let mut created_ats = Vec::with_capacity(len);
    let mut flat_values = Vec::with_capacity(len * dimension);

    for record in records {
        ids.push(record.id.as_str());
        documents.push(record.document.as_str());
        created_ats.push(record.created_at.as_str());
        flat_values.extend_from_slice(&record.vector);
    }

    let values_array = Float32Array::from(flat_values);
    let field = Arc::new(Field::new("item", DataType::Float32, false));
    let vector_array =
        FixedSizeListArray::try_new(field, dimension as i32, Arc::new(values_array), None)
            .map_err(|e| SupportError::Index(format!("Failed to create vector array: {}", e)))?;

    let arrays: Vec<Arc<dyn arrow::array::Array>> = vec![
        Arc::new(StringArray::from(ids)),
        Arc::new(vector_array),
        Arc::new(StringArray::from(documents)),
        Arc::new(StringArray::from(created_ats)),
    ];

    RecordBatch::try_new(Arc::clone(schema), arrays)
        .map_err(|e| SupportError::Index(format!("Failed to create record batch: {}", e)))
}

fn parse_search_batch(batch: &RecordBatch) -> Result<Vec<IndexedDocument>, SupportError> {
    let num_rows = batch.num_rows();

    let documents = batch
        .column_by_name("document")
        .ok_or_else(|| SupportError::Index("Missing document column".to_string()))?
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| SupportError::Index("Invalid document column type".to_string()))?;

    let distances = batch
        .column_by_name("_distance")
        .map(|col| col.as_any().downcast_ref::<Float32Array>());

    let mut hits = Vec::with_capacity(num_rows);
    for row in 0..num_rows {
        let distance = distances
            .flatten()
            .map_or(0.0, |d| if d.is_null(row) { 0.0 } else { d.value(row) });

        hits.push(IndexedDocument {
            document: documents.value(row).to_string(),
            distance,
        });
    }

    Ok(hits)
}
