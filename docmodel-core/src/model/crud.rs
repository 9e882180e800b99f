use bson::{Bson, Document, ser::serialize_to_bson};
use futures::TryStreamExt;
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

use super::{
    BatchSaveOutcome, BatchUpdateOutcome, Model, collection_of, identity_of, with_identity,
};
use crate::{
    backend::StoreBackend,
    error::{DocumentStoreError, DocumentStoreResult},
    page::PageRequest,
    query::{Expr, Filter, Query, Sort},
    record::{
        AUDIT_FIELD, Actor, AuditEntry, AuditTrail, CollectionSpec, ID_FIELD, Record, RecordExt,
        UPDATED_SUMMARY, decode, id_key,
    },
    update::{Update, UpdateOp},
};

impl<B: StoreBackend> Model<B> {
    /// Inserts a record and returns its identity.
    ///
    /// The collection is bootstrapped first. When an actor is given, a creation entry is
    /// stamped on the record's audit trail before the insert. Records serialized without an
    /// `_id` receive a fresh ObjectId.
    pub async fn save<R: Record>(
        &self,
        record: &mut R,
        actor: Option<&dyn Actor>,
    ) -> DocumentStoreResult<Bson> {
        let collection = collection_of(record)?;
        self.ensure_one(&*record).await;

        if let Some(actor) = actor {
            record.mark_created_by(actor);
        }

        self.backend
            .insert_one(&collection, with_identity(record.to_document()?))
            .await
    }

    /// Inserts records in one unordered batch.
    ///
    /// A rejected record (e.g. a duplicate identity) does not stop the others. Identities of
    /// the inserted records come back in response order, rejected records in input order.
    /// All records must share one collection.
    pub async fn batch_save<R: Record>(
        &self,
        mut records: Vec<R>,
        actor: Option<&dyn Actor>,
    ) -> DocumentStoreResult<BatchSaveOutcome<R>> {
        let Some(collection) = shared_collection(&records)? else {
            return Ok(BatchSaveOutcome::default());
        };
        self.ensure_one(&records[0]).await;

        if let Some(actor) = actor {
            for record in records.iter_mut() {
                record.mark_created_by(actor);
            }
        }

        let documents = records
            .iter()
            .map(|record| record.to_document().map(with_identity))
            .collect::<DocumentStoreResult<Vec<Document>>>()?;

        let outcome = self.backend.insert_many(&collection, documents).await?;
        if !outcome.failures.is_empty() {
            warn!(
                collection = collection.as_str(),
                failed = outcome.failures.len(),
                inserted = outcome.inserted.len(),
                "batch insert partially failed"
            );
        }

        let rejected = outcome
            .failures
            .iter()
            .map(|failure| failure.index)
            .collect::<HashSet<_>>();

        Ok(BatchSaveOutcome {
            inserted: outcome.inserted.into_iter().map(|(_, id)| id).collect(),
            failed: take_positions(records, &rejected),
            failures: outcome.failures,
        })
    }

    /// Upserts records by identity in one unordered batch.
    ///
    /// `fields` selects the fields each record writes. When an actor is given, an update
    /// entry is pushed to each stored trail, and appended to the in-memory trail of every
    /// record the database accepted.
    pub async fn batch_update<R, F>(
        &self,
        mut records: Vec<R>,
        fields: F,
        actor: Option<&dyn Actor>,
    ) -> DocumentStoreResult<BatchUpdateOutcome<R>>
    where
        R: Record,
        F: Fn(&R) -> Document,
    {
        let Some(collection) = shared_collection(&records)? else {
            return Ok(BatchUpdateOutcome::default());
        };
        self.ensure_one(&records[0]).await;

        let mut operations = Vec::with_capacity(records.len());
        let mut entries = Vec::with_capacity(records.len());
        for record in records.iter_mut() {
            let id = identity_of(record)?;
            let mut update = Update::set(fields(&*record));

            let entry = match actor {
                Some(actor) if record.audit_trail_mut().is_some() => {
                    Some(AuditEntry::new(actor, UPDATED_SUMMARY))
                }
                _ => None,
            };
            if let Some(entry) = &entry {
                update = update.with_push(AUDIT_FIELD, serialize_to_bson(entry)?);
            }

            entries.push(entry);
            operations.push(UpdateOp::new(Some(Filter::id(id)), update).upsert());
        }

        let outcome = self.backend.bulk_update(&collection, operations).await?;
        if !outcome.failures.is_empty() {
            warn!(
                collection = collection.as_str(),
                failed = outcome.failures.len(),
                "batch update partially failed"
            );
        }

        let rejected = outcome
            .failures
            .iter()
            .map(|failure| failure.index)
            .collect::<HashSet<_>>();

        for (index, (record, entry)) in records.iter_mut().zip(entries).enumerate() {
            if rejected.contains(&index) {
                continue;
            }
            if let (Some(entry), Some(trail)) = (entry, record.audit_trail_mut()) {
                trail.push(entry);
            }
        }

        Ok(BatchUpdateOutcome {
            matched: outcome.matched,
            modified: outcome.modified,
            upserted: outcome.upserted.into_iter().map(|(_, id)| id).collect(),
            failed: take_positions(records, &rejected),
            failures: outcome.failures,
        })
    }

    /// Deletes every document of the collection matching `filter`.
    pub async fn remove_all<S: CollectionSpec + ?Sized>(
        &self,
        spec: &S,
        filter: Option<Expr>,
    ) -> DocumentStoreResult<u64> {
        self.backend
            .delete_many(&collection_of(spec)?, filter)
            .await
    }

    /// Deletes the stored document of `record`.
    pub async fn remove_by_id<R: Record>(&self, record: &R) -> DocumentStoreResult<u64> {
        self.backend
            .delete_one(&collection_of(record)?, Some(Filter::id(identity_of(record)?)))
            .await
    }

    /// Sets `fields` on the stored document of `record` and returns the modified count.
    ///
    /// When an actor is given, the whole trail plus an update entry is written along with
    /// the fields, and the entry is appended to the record's trail once the write succeeds.
    /// Unlike
    /// [`update_all`](Model::update_all), this overwrites the stored trail, so entries
    /// appended concurrently by other writers are lost; use `update_all` with an identity
    /// filter when that matters.
    pub async fn update_one<R: Record>(
        &self,
        record: &mut R,
        fields: Document,
        actor: Option<&dyn Actor>,
    ) -> DocumentStoreResult<u64> {
        let collection = collection_of(record)?;
        let id = identity_of(record)?;
        let mut update = Update::set(fields);

        let staged = match actor {
            Some(actor) => staged_trail(record, actor),
            None => None,
        };
        if let Some(trail) = &staged {
            update = update.with_set(AUDIT_FIELD, serialize_to_bson(trail.entries())?);
        }

        let modified = self
            .backend
            .update_one(&collection, Some(Filter::id(id)), update, false)
            .await?
            .modified;

        if let (Some(staged), Some(trail)) = (staged, record.audit_trail_mut()) {
            *trail = staged;
        }

        Ok(modified)
    }

    /// Sets `fields` on every document matching `filter` and returns the modified count.
    ///
    /// When an actor is given, one update entry is pushed onto every matched trail server
    /// side; the documents are never fetched.
    pub async fn update_all<S: CollectionSpec + ?Sized>(
        &self,
        spec: &S,
        filter: Option<Expr>,
        fields: Document,
        actor: Option<&dyn Actor>,
    ) -> DocumentStoreResult<u64> {
        let mut update = Update::set(fields);

        if let Some(actor) = actor {
            update = update.with_push(
                AUDIT_FIELD,
                serialize_to_bson(&AuditEntry::new(actor, UPDATED_SUMMARY))?,
            );
        }

        Ok(self
            .backend
            .update_many(&collection_of(spec)?, filter, update)
            .await?
            .modified)
    }

    /// Removes the named fields from every document matching `filter`.
    pub async fn unset_fields<S, N>(
        &self,
        spec: &S,
        filter: Option<Expr>,
        names: impl IntoIterator<Item = N>,
    ) -> DocumentStoreResult<u64>
    where
        S: CollectionSpec + ?Sized,
        N: AsRef<str>,
    {
        Ok(self
            .backend
            .update_many(&collection_of(spec)?, filter, Update::unset(names))
            .await?
            .modified)
    }

    /// Writes `record` over its stored document, inserting it when missing.
    ///
    /// When an actor is given, an update entry is appended to the record's trail before
    /// the write and removed again if the write fails.
    pub async fn upsert<R: Record>(
        &self,
        record: &mut R,
        actor: Option<&dyn Actor>,
    ) -> DocumentStoreResult<Bson> {
        let collection = collection_of(record)?;
        let id = identity_of(record)?;
        self.ensure_one(&*record).await;

        let previous = match actor {
            Some(actor) => record.audit_trail_mut().map(|trail| {
                let previous = trail.clone();
                trail.append(actor, UPDATED_SUMMARY);
                previous
            }),
            None => None,
        };

        let written = match record.to_document() {
            Ok(mut fields) => {
                fields.remove(ID_FIELD);
                self.backend
                    .update_one(&collection, Some(Filter::id(id.clone())), Update::set(fields), true)
                    .await
                    .map(|_| ())
            }
            Err(err) => Err(err),
        };

        if let Err(err) = written {
            if let (Some(previous), Some(trail)) = (previous, record.audit_trail_mut()) {
                *trail = previous;
            }
            return Err(err);
        }

        Ok(id)
    }

    /// Reloads `record` from its stored document.
    pub async fn find_by_id<R: Record>(&self, record: &mut R) -> DocumentStoreResult<()> {
        let id = identity_of(record)?;
        self.find_one(record, Some(Filter::id(id))).await
    }

    /// Decodes the first document matching `filter` into `record`.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::NotFound`] when nothing matches.
    pub async fn find_one<R: Record>(
        &self,
        record: &mut R,
        filter: Option<Expr>,
    ) -> DocumentStoreResult<()> {
        let collection = collection_of(record)?;
        let query = Query { filter, limit: Some(1), ..Query::default() };

        match self.backend.find(&collection, query).await?.into_iter().next() {
            Some(document) => {
                *record = R::from_document(document)?;
                Ok(())
            }
            None => Err(DocumentStoreError::NotFound(collection)),
        }
    }

    /// Returns every record matching `filter`, decoded as the prototype's type.
    ///
    /// Zero matches is an empty list, not an error.
    pub async fn find<R: Record>(
        &self,
        prototype: &R,
        filter: Option<Expr>,
    ) -> DocumentStoreResult<Vec<R>> {
        self.find_by_query(prototype, Query::filtered(filter)).await
    }

    /// Returns every record matching a query with sort, skip and limit options.
    pub async fn find_by_query<R: Record>(
        &self,
        prototype: &R,
        query: Query,
    ) -> DocumentStoreResult<Vec<R>> {
        self.backend
            .find(&collection_of(prototype)?, query)
            .await?
            .into_iter()
            .map(R::from_document)
            .collect()
    }

    /// Returns one page of records matching `filter`.
    ///
    /// Non-positive `limit` and `page` fall back to 50 and 1; `page` is 1-indexed.
    pub async fn page_find<R: Record>(
        &self,
        prototype: &R,
        filter: Option<Expr>,
        limit: i64,
        page: i64,
    ) -> DocumentStoreResult<Vec<R>> {
        self.page_find_sorted(prototype, filter, Vec::new(), limit, page)
            .await
    }

    /// Like [`page_find`](Model::page_find), ordering rows by `sort` before paging.
    pub async fn page_find_sorted<R: Record>(
        &self,
        prototype: &R,
        filter: Option<Expr>,
        sort: Vec<Sort>,
        limit: i64,
        page: i64,
    ) -> DocumentStoreResult<Vec<R>> {
        let request = PageRequest::new(limit, page);
        let query = Query {
            filter,
            sort,
            offset: Some(request.skip()),
            limit: Some(request.limit() as u64),
        };

        self.find_by_query(prototype, query).await
    }

    /// Streams every record matching `filter` through `callback`.
    ///
    /// Each row is decoded into a fresh value and handed to `callback` in cursor order. An
    /// error from `callback` stops the stream and is returned as is. Once the cursor is
    /// exhausted, the last decoded row replaces `prototype`; with zero rows `prototype` is
    /// left untouched.
    pub async fn find_and_exec<R, F>(
        &self,
        prototype: &mut R,
        filter: Option<Expr>,
        callback: F,
    ) -> DocumentStoreResult<()>
    where
        R: Record,
        F: FnMut(&R) -> DocumentStoreResult<()>,
    {
        self.find_and_exec_by_query(prototype, Query::filtered(filter), callback)
            .await
    }

    /// Like [`find_and_exec`](Model::find_and_exec) with sort, skip and limit options.
    pub async fn find_and_exec_by_query<R, F>(
        &self,
        prototype: &mut R,
        query: Query,
        mut callback: F,
    ) -> DocumentStoreResult<()>
    where
        R: Record,
        F: FnMut(&R) -> DocumentStoreResult<()>,
    {
        let collection = collection_of(prototype)?;
        let mut cursor = self.backend.find_stream(&collection, query).await?;
        let mut last = None;

        while let Some(document) = cursor.try_next().await? {
            let row = R::from_document(document)?;
            callback(&row)?;
            last = Some(row);
        }

        if let Some(row) = last {
            *prototype = row;
        }

        Ok(())
    }

    /// Counts documents matching `filter` directly against the collection.
    pub async fn count_documents<S: CollectionSpec + ?Sized>(
        &self,
        spec: &S,
        filter: Option<Expr>,
    ) -> DocumentStoreResult<u64> {
        self.backend
            .count_documents(&collection_of(spec)?, filter, self.config.count_max_time)
            .await
    }

    /// Looks up many records by identity with one query.
    ///
    /// Returns one entry per requested id, in request order: the decoded record, or
    /// [`DocumentStoreError::NotFound`] for ids without a stored document.
    pub async fn batch_find_by_id<R: Record>(
        &self,
        prototype: &R,
        ids: Vec<Bson>,
    ) -> DocumentStoreResult<Vec<DocumentStoreResult<R>>> {
        let collection = collection_of(prototype)?;
        let found = self
            .backend
            .find(&collection, Query::filtered(Some(Filter::ids(ids.iter().cloned()))))
            .await?
            .into_iter()
            .filter_map(|document| {
                let key = document.get(ID_FIELD).map(id_key)?;
                Some((key, document))
            })
            .collect::<HashMap<_, _>>();
        debug!(
            collection = collection.as_str(),
            requested = ids.len(),
            found = found.len(),
            "batch lookup"
        );

        Ok(ids
            .iter()
            .map(|id| match found.get(&id_key(id)) {
                Some(document) => decode(document.clone()),
                None => Err(DocumentStoreError::NotFound(collection.clone())),
            })
            .collect())
    }
}

/// Returns a copy of the record's trail with an update entry appended.
fn staged_trail<R: Record>(record: &mut R, actor: &dyn Actor) -> Option<AuditTrail> {
    let mut staged = record.audit_trail_mut()?.clone();
    staged.append(actor, UPDATED_SUMMARY);
    Some(staged)
}

/// Returns the collection all `records` belong to, or `None` for an empty batch.
fn shared_collection<R: Record>(records: &[R]) -> DocumentStoreResult<Option<String>> {
    let Some(first) = records.first() else {
        return Ok(None);
    };
    let collection = collection_of(first)?;

    match records.iter().find(|record| record.collection_name() != collection) {
        Some(other) => Err(DocumentStoreError::Usage(format!(
            "batch mixes collections {} and {}",
            collection,
            other.collection_name(),
        ))),
        None => Ok(Some(collection)),
    }
}

/// Moves the records at the given positions out of `records`, keeping input order.
fn take_positions<R>(records: Vec<R>, positions: &HashSet<usize>) -> Vec<R> {
    if positions.is_empty() {
        return Vec::new();
    }

    records
        .into_iter()
        .enumerate()
        .filter(|(index, _)| positions.contains(index))
        .map(|(_, record)| record)
        .collect()
}
