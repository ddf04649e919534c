//! CRUD access to one collection of the document store.
//!
//! Bodies are stored as JSON text next to the 16 byte identity. Mutations are
//! single statements (`json_set`, `json_remove`, `DELETE`) so concurrent
//! calls on the same document never lose each other's fields.

use futures::stream::{BoxStream, StreamExt};
use sqlx::SqlitePool;

use crate::document::{self, Document};
use crate::document_id::DocumentId;
use crate::error::ProviderError;
use crate::filter;
use crate::store::validate_name;

const SELECT_ALL: &str =
    "SELECT id, body FROM documents WHERE db_name = ? AND collection = ? ORDER BY seq";

const SELECT_ONE: &str =
    "SELECT id, body FROM documents WHERE db_name = ? AND collection = ? AND id = ?";

const SELECT_AT: &str = "SELECT id, body FROM documents WHERE db_name = ? AND collection = ? \
     ORDER BY seq LIMIT 1 OFFSET ?";

/// Result of [`DocumentProvider::delete`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// A document was removed.
    Deleted,
    /// Nothing carried that identity; no-op.
    NotFound,
}

/// Result of [`DocumentProvider::add_update`].
#[derive(Debug, Clone, PartialEq)]
pub enum Saved {
    Created(DocumentId),
    Updated(Document),
}

impl Saved {
    /// Identity of the saved document.
    pub fn id(&self) -> Option<DocumentId> {
        match self {
            Saved::Created(id) => Some(*id),
            Saved::Updated(doc) => document::identity_of(doc).ok().flatten(),
        }
    }
}

/// A provider bound to one (database, collection) pair.
///
/// Holds nothing but the pool handle and its binding, so clones can be
/// shared freely between concurrent requests.
#[derive(Debug, Clone)]
pub struct DocumentProvider {
    pool: SqlitePool,
    database: String,
    collection: String,
}

impl DocumentProvider {
    pub(crate) fn new(pool: SqlitePool, database: String, collection: String) -> Self {
        Self {
            pool,
            database,
            collection,
        }
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Inserts `doc` under a fresh identity and returns it.
    ///
    /// Any identity the caller supplied is discarded.
    pub async fn create(&self, doc: &Document) -> Result<DocumentId, ProviderError> {
        let body = document::strip_identity(doc);
        let id = DocumentId::new();

        sqlx::query("INSERT INTO documents (db_name, collection, id, body) VALUES (?, ?, ?, ?)")
            .bind(&self.database)
            .bind(&self.collection)
            .bind(id.as_bytes().as_slice())
            .bind(serde_json::to_string(&body)?)
            .execute(&self.pool)
            .await?;

        tracing::debug!("Created {}/{}/{}", self.database, self.collection, id);

        Ok(id)
    }

    /// Returns every document matching `filter`, identities externalized.
    ///
    /// No match is an empty vector.
    pub async fn read(&self, filter: &Document) -> Result<Vec<Document>, ProviderError> {
        let rows: Vec<(Vec<u8>, String)> = match document::identity_of(filter)? {
            Some(id) => {
                sqlx::query_as(SELECT_ONE)
                    .bind(&self.database)
                    .bind(&self.collection)
                    .bind(id.as_bytes().as_slice())
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                sqlx::query_as(SELECT_ALL)
                    .bind(&self.database)
                    .bind(&self.collection)
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        let mut docs = Vec::new();
        for (id, body) in rows {
            let doc = hydrate(&id, &body)?;
            if filter::matches(filter, &doc) {
                docs.push(doc);
            }
        }
        Ok(docs)
    }

    /// Sets the fields of `doc` on the stored document with the same
    /// identity and returns the result.
    pub async fn update(&self, doc: &Document) -> Result<Document, ProviderError> {
        let id = document::require_identity(doc)?;
        let fields = document::strip_identity(doc);

        if fields.is_empty() {
            return self
                .get_by_identity(id)
                .await?
                .ok_or_else(|| ProviderError::NotFound(id.to_string()));
        }

        let mut sql = String::from("UPDATE documents SET body = json_set(body");
        let mut args = Vec::with_capacity(fields.len() * 2);
        for (field, value) in &fields {
            sql.push_str(", ?, json(?)");
            args.push(field_path(field)?);
            args.push(serde_json::to_string(value)?);
        }
        sql.push_str(") WHERE db_name = ? AND collection = ? AND id = ? RETURNING body");

        let mut query = sqlx::query_scalar::<_, String>(&sql);
        for arg in args {
            query = query.bind(arg);
        }
        let body = query
            .bind(&self.database)
            .bind(&self.collection)
            .bind(id.as_bytes().as_slice())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ProviderError::NotFound(id.to_string()))?;

        tracing::debug!(
            "Updated {} field(s) of {}/{}/{}",
            fields.len(),
            self.database,
            self.collection,
            id
        );

        hydrate(id.as_bytes(), &body)
    }

    /// Removes the document with the identity of `doc`.
    pub async fn delete(&self, doc: &Document) -> Result<DeleteOutcome, ProviderError> {
        let id = document::require_identity(doc)?;

        let result =
            sqlx::query("DELETE FROM documents WHERE db_name = ? AND collection = ? AND id = ?")
                .bind(&self.database)
                .bind(&self.collection)
                .bind(id.as_bytes().as_slice())
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            tracing::debug!("Delete of {}/{}/{} was a no-op", self.database, self.collection, id);
            return Ok(DeleteOutcome::NotFound);
        }

        tracing::debug!("Deleted {}/{}/{}", self.database, self.collection, id);
        Ok(DeleteOutcome::Deleted)
    }

    /// Updates when `doc` carries an identity, creates otherwise.
    pub async fn add_update(&self, doc: &Document) -> Result<Saved, ProviderError> {
        match document::identity_of(doc)? {
            Some(_) => self.update(doc).await.map(Saved::Updated),
            None => self.create(doc).await.map(Saved::Created),
        }
    }

    /// Removes every non-identity field named in `doc` from the stored
    /// document. The values in `doc` are ignored.
    pub async fn unset(&self, doc: &Document) -> Result<Document, ProviderError> {
        let id = document::require_identity(doc)?;
        let fields = document::strip_identity(doc);

        if fields.is_empty() {
            return self
                .get_by_identity(id)
                .await?
                .ok_or_else(|| ProviderError::NotFound(id.to_string()));
        }

        let paths = fields
            .keys()
            .map(|field| field_path(field))
            .collect::<Result<Vec<_>, _>>()?;

        let placeholders = vec!["?"; paths.len()].join(", ");
        let sql = format!(
            "UPDATE documents SET body = json_remove(body, {}) \
             WHERE db_name = ? AND collection = ? AND id = ? RETURNING body",
            placeholders
        );

        let mut query = sqlx::query_scalar::<_, String>(&sql);
        for path in paths {
            query = query.bind(path);
        }
        let body = query
            .bind(&self.database)
            .bind(&self.collection)
            .bind(id.as_bytes().as_slice())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ProviderError::NotFound(id.to_string()))?;

        tracing::debug!(
            "Unset {} field(s) of {}/{}/{}",
            fields.len(),
            self.database,
            self.collection,
            id
        );

        hydrate(id.as_bytes(), &body)
    }

    /// Looks up one document by identity.
    pub async fn get_by_identity(&self, id: DocumentId) -> Result<Option<Document>, ProviderError> {
        let row: Option<(Vec<u8>, String)> = sqlx::query_as(SELECT_ONE)
            .bind(&self.database)
            .bind(&self.collection)
            .bind(id.as_bytes().as_slice())
            .fetch_optional(&self.pool)
            .await?;

        row.map(|(id, body)| hydrate(&id, &body)).transpose()
    }

    /// Looks up the `offset`-th document in insertion order.
    ///
    /// Evaluated against the collection as it is now; offsets shift when
    /// documents are added or removed between calls.
    pub async fn get_by_offset(&self, offset: usize) -> Result<Option<Document>, ProviderError> {
        let offset = i64::try_from(offset).unwrap_or(i64::MAX);
        let row: Option<(Vec<u8>, String)> = sqlx::query_as(SELECT_AT)
            .bind(&self.database)
            .bind(&self.collection)
            .bind(offset)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|(id, body)| hydrate(&id, &body)).transpose()
    }

    /// Same as [`read`](Self::read).
    pub async fn get_by_filter(&self, filter: &Document) -> Result<Vec<Document>, ProviderError> {
        self.read(filter).await
    }

    /// Streams every document of the collection.
    ///
    /// Each call issues a fresh query, so the sequence can be restarted by
    /// calling `iter` again.
    pub fn iter(&self) -> BoxStream<'_, Result<Document, ProviderError>> {
        sqlx::query_as::<_, (Vec<u8>, String)>(SELECT_ALL)
            .bind(self.database.clone())
            .bind(self.collection.clone())
            .fetch(&self.pool)
            .map(|row| {
                let (id, body) = row?;
                hydrate(&id, &body)
            })
            .boxed()
    }

    /// Number of documents in the collection.
    pub async fn count(&self) -> Result<u64, ProviderError> {
        let n: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM documents WHERE db_name = ? AND collection = ?",
        )
        .bind(&self.database)
        .bind(&self.collection)
        .fetch_one(&self.pool)
        .await?;

        Ok(n.max(0) as u64)
    }

    /// Installs a unique index on a top-level `field` of this collection.
    ///
    /// Documents without the field are not constrained.
    pub async fn ensure_unique(&self, field: &str) -> Result<(), ProviderError> {
        validate_name(field)?;

        let sql = format!(
            "CREATE UNIQUE INDEX IF NOT EXISTS \"uniq_{db}_{coll}_{field}\" \
             ON documents (db_name, collection, json_extract(body, '$.\"{field}\"')) \
             WHERE db_name = '{db}' AND collection = '{coll}'",
            db = self.database,
            coll = self.collection,
            field = field,
        );
        sqlx::query(&sql).execute(&self.pool).await?;

        tracing::debug!(
            "Ensured unique index on {}/{}.{}",
            self.database,
            self.collection,
            field
        );
        Ok(())
    }
}

/// Builds a JSON path addressing a top-level field.
fn field_path(field: &str) -> Result<String, ProviderError> {
    if field.is_empty() || field.contains('"') {
        return Err(ProviderError::InvalidName(field.to_string()));
    }
    Ok(format!("$.\"{}\"", field))
}

fn hydrate(id: &[u8], body: &str) -> Result<Document, ProviderError> {
    let id = DocumentId::from_slice(id)?;
    let body: Document = serde_json::from_str(body)?;
    Ok(document::with_external_identity(id, &body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::doc;
    use crate::store::Store;
    use futures::TryStreamExt;
    use serde_json::json;
    use tempfile::TempDir;

    struct TestContext {
        store: Store,
        provider: DocumentProvider,
        _temp_dir: TempDir,
    }

    async fn setup() -> TestContext {
        let temp_dir = TempDir::new().unwrap();
        let store = Store::open(temp_dir.path().join("test.db")).await.unwrap();
        let provider = store.provider("test_db", "cases").unwrap();
        TestContext {
            store,
            provider,
            _temp_dir: temp_dir,
        }
    }

    fn id_doc(id: DocumentId) -> Document {
        doc(json!({"id": id.to_external()}))
    }

    #[tokio::test]
    async fn test_create_discards_supplied_identity() {
        let ctx = setup().await;
        let supplied = DocumentId::new();

        let id = ctx
            .provider
            .create(&doc(json!({"id": supplied.to_external(), "title": "Flu"})))
            .await
            .unwrap();

        assert_ne!(id, supplied);
        assert!(ctx.provider.get_by_identity(supplied).await.unwrap().is_none());

        let stored = ctx.provider.get_by_identity(id).await.unwrap().unwrap();
        assert_eq!(stored, doc(json!({"id": id.to_external(), "title": "Flu"})));
    }

    #[tokio::test]
    async fn test_read_empty_is_not_an_error() {
        let ctx = setup().await;
        let docs = ctx.provider.read(&Document::new()).await.unwrap();
        assert!(docs.is_empty());
    }

    #[tokio::test]
    async fn test_read_with_filter() {
        let ctx = setup().await;
        ctx.provider
            .create(&doc(json!({"title": "Flu", "severity": 2})))
            .await
            .unwrap();
        ctx.provider
            .create(&doc(json!({"title": "Cold", "severity": 1})))
            .await
            .unwrap();

        let docs = ctx
            .provider
            .read(&doc(json!({"severity": {"$gte": 2}})))
            .await
            .unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0]["title"], json!("Flu"));
        assert!(docs[0]["id"].is_string());
    }

    #[tokio::test]
    async fn test_read_by_identity_in_either_form() {
        let ctx = setup().await;
        let id = ctx.provider.create(&doc(json!({"n": 1}))).await.unwrap();
        ctx.provider.create(&doc(json!({"n": 2}))).await.unwrap();

        let by_external = ctx.provider.read(&id_doc(id)).await.unwrap();
        assert_eq!(by_external.len(), 1);

        let by_internal = ctx
            .provider
            .read(&doc(json!({"_id": id.to_internal()})))
            .await
            .unwrap();
        assert_eq!(by_internal, by_external);
    }

    #[tokio::test]
    async fn test_read_rejects_malformed_identity() {
        let ctx = setup().await;
        let result = ctx.provider.read(&doc(json!({"id": 12}))).await;
        assert!(matches!(result, Err(ProviderError::MalformedIdentity(_))));
    }

    #[tokio::test]
    async fn test_update_merges_fields() {
        let ctx = setup().await;
        let id = ctx
            .provider
            .create(&doc(json!({"title": "Flu", "severity": 2})))
            .await
            .unwrap();

        let updated = ctx
            .provider
            .update(&doc(json!({"id": id.to_external(), "severity": 3, "notes": {"a": [1]}})))
            .await
            .unwrap();

        assert_eq!(
            updated,
            doc(json!({"id": id.to_external(), "title": "Flu", "severity": 3, "notes": {"a": [1]}}))
        );
    }

    #[tokio::test]
    async fn test_update_requires_identity() {
        let ctx = setup().await;
        let result = ctx.provider.update(&doc(json!({"title": "x"}))).await;
        assert!(matches!(result, Err(ProviderError::MissingIdentity)));
    }

    #[tokio::test]
    async fn test_update_unknown_identity_is_not_found() {
        let ctx = setup().await;
        let result = ctx
            .provider
            .update(&doc(json!({"id": DocumentId::new().to_external(), "title": "x"})))
            .await;
        assert!(matches!(result, Err(ProviderError::NotFound(_))));
        assert_eq!(ctx.provider.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_update_rejects_quoted_field_names() {
        let ctx = setup().await;
        let id = ctx.provider.create(&doc(json!({"a": 1}))).await.unwrap();
        let result = ctx
            .provider
            .update(&doc(json!({"id": id.to_external(), "a\"b": 1})))
            .await;
        assert!(matches!(result, Err(ProviderError::InvalidName(_))));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let ctx = setup().await;
        let id = ctx.provider.create(&doc(json!({"a": 1}))).await.unwrap();

        let first = ctx.provider.delete(&id_doc(id)).await.unwrap();
        let second = ctx.provider.delete(&id_doc(id)).await.unwrap();

        assert_eq!(first, DeleteOutcome::Deleted);
        assert_eq!(second, DeleteOutcome::NotFound);
    }

    #[tokio::test]
    async fn test_delete_requires_identity() {
        let ctx = setup().await;
        let result = ctx.provider.delete(&doc(json!({"a": 1}))).await;
        assert!(matches!(result, Err(ProviderError::MissingIdentity)));
    }

    #[tokio::test]
    async fn test_add_update_dispatch() {
        let ctx = setup().await;

        let saved = ctx
            .provider
            .add_update(&doc(json!({"title": "Flu"})))
            .await
            .unwrap();
        let Saved::Created(id) = saved else {
            panic!("expected a create, got {:?}", saved);
        };
        assert_eq!(ctx.provider.count().await.unwrap(), 1);

        let saved = ctx
            .provider
            .add_update(&doc(json!({"id": id.to_external(), "title": "Cold"})))
            .await
            .unwrap();
        assert!(matches!(saved, Saved::Updated(_)));
        assert_eq!(saved.id(), Some(id));
        assert_eq!(ctx.provider.count().await.unwrap(), 1);

        let stored = ctx.provider.get_by_identity(id).await.unwrap().unwrap();
        assert_eq!(stored["title"], json!("Cold"));
    }

    #[tokio::test]
    async fn test_unset_removes_named_fields_only() {
        let ctx = setup().await;
        let id = ctx
            .provider
            .create(&doc(json!({"name": "Ann", "token": "t", "timeout": 5})))
            .await
            .unwrap();

        let after = ctx
            .provider
            .unset(&doc(json!({"id": id.to_external(), "token": "", "timeout": ""})))
            .await
            .unwrap();

        assert_eq!(after, doc(json!({"id": id.to_external(), "name": "Ann"})));
    }

    #[tokio::test]
    async fn test_unset_unknown_identity_is_not_found() {
        let ctx = setup().await;
        let result = ctx
            .provider
            .unset(&doc(json!({"id": DocumentId::new().to_external(), "a": ""})))
            .await;
        assert!(matches!(result, Err(ProviderError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_get_by_offset_follows_insertion_order() {
        let ctx = setup().await;
        let first = ctx.provider.create(&doc(json!({"n": 0}))).await.unwrap();
        let second = ctx.provider.create(&doc(json!({"n": 1}))).await.unwrap();

        let at0 = ctx.provider.get_by_offset(0).await.unwrap().unwrap();
        assert_eq!(at0["n"], json!(0));
        assert!(ctx.provider.get_by_offset(2).await.unwrap().is_none());

        // Offsets are recomputed on each call
        ctx.provider.delete(&id_doc(first)).await.unwrap();
        let at0 = ctx.provider.get_by_offset(0).await.unwrap().unwrap();
        assert_eq!(at0["id"], json!(second.to_external()));
    }

    #[tokio::test]
    async fn test_iter_is_restartable() {
        let ctx = setup().await;
        for n in 0..3 {
            ctx.provider.create(&doc(json!({"n": n}))).await.unwrap();
        }

        let first: Vec<Document> = ctx.provider.iter().try_collect().await.unwrap();
        ctx.provider.create(&doc(json!({"n": 3}))).await.unwrap();
        let second: Vec<Document> = ctx.provider.iter().try_collect().await.unwrap();

        assert_eq!(first.len(), 3);
        assert_eq!(second.len(), 4);
        assert_eq!(&second[..3], &first[..]);
    }

    #[tokio::test]
    async fn test_collections_are_isolated() {
        let ctx = setup().await;
        let other = ctx.store.provider("test_db", "users").unwrap();
        let other_db = ctx.store.provider("other_db", "cases").unwrap();

        let id = ctx.provider.create(&doc(json!({"a": 1}))).await.unwrap();

        assert_eq!(other.count().await.unwrap(), 0);
        assert_eq!(other_db.count().await.unwrap(), 0);
        assert!(other.get_by_identity(id).await.unwrap().is_none());
        assert_eq!(other.delete(&id_doc(id)).await.unwrap(), DeleteOutcome::NotFound);
    }

    #[tokio::test]
    async fn test_ensure_unique_rejects_duplicates() {
        let ctx = setup().await;
        ctx.provider.ensure_unique("email").await.unwrap();
        ctx.provider.ensure_unique("email").await.unwrap();

        ctx.provider
            .create(&doc(json!({"email": "a@x.com"})))
            .await
            .unwrap();
        let dup = ctx.provider.create(&doc(json!({"email": "a@x.com"}))).await;
        assert!(matches!(dup, Err(ProviderError::DuplicateKey(_))));

        // Missing field is unconstrained, other collections too
        ctx.provider.create(&doc(json!({"x": 1}))).await.unwrap();
        ctx.provider.create(&doc(json!({"x": 2}))).await.unwrap();
        let other = ctx.store.provider("test_db", "users").unwrap();
        other
            .create(&doc(json!({"email": "a@x.com"})))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_concurrent_updates_keep_both_fields() {
        let ctx = setup().await;
        let id = ctx.provider.create(&doc(json!({"a": 0, "b": 0}))).await.unwrap();

        let p1 = ctx.provider.clone();
        let p2 = ctx.provider.clone();
        let d1 = doc(json!({"id": id.to_external(), "a": 1}));
        let d2 = doc(json!({"id": id.to_external(), "b": 2}));

        let (r1, r2) = tokio::join!(
            tokio::spawn(async move { p1.update(&d1).await }),
            tokio::spawn(async move { p2.update(&d2).await }),
        );
        r1.unwrap().unwrap();
        r2.unwrap().unwrap();

        let stored = ctx.provider.get_by_identity(id).await.unwrap().unwrap();
        assert_eq!(stored["a"], json!(1));
        assert_eq!(stored["b"], json!(2));
    }
}
