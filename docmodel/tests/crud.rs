mod support;

use docmodel::{
    bson::{Bson, doc, oid::ObjectId},
    memory::InMemoryStore,
    prelude::*,
    record::{CREATED_SUMMARY, UPDATED_SUMMARY},
};
use support::{Item, Note, Operator, account, item, seed_items};

fn model() -> Model<InMemoryStore> {
    Model::new(InMemoryStore::new())
}

fn keys(items: &[Item]) -> Vec<&str> {
    items.iter().map(|item| item.key.as_str()).collect()
}

#[tokio::test]
async fn save_then_find_by_id_round_trips() {
    let model = model();
    let mut saved = item("k1", "alpha", 1);
    saved.tags = vec!["red".into()];

    let id = model.save(&mut saved, Some(&Operator)).await.unwrap();
    assert_eq!(id, Bson::from("k1"));
    assert_eq!(saved.records.len(), 1);
    assert_eq!(saved.records.entries()[0].summary, CREATED_SUMMARY);

    let mut loaded = Item { key: "k1".into(), ..Item::default() };
    model.find_by_id(&mut loaded).await.unwrap();

    assert_eq!(loaded, saved);
}

#[tokio::test]
async fn save_assigns_an_identity_when_missing() {
    let model = model();
    let mut note = Note { id: None, text: "hello".into() };

    let id = model.save(&mut note, None).await.unwrap();
    assert!(matches!(id, Bson::ObjectId(_)));

    let notes = model.find(&Note::default(), None).await.unwrap();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].id.map(Bson::ObjectId), Some(id));
}

#[tokio::test]
async fn single_lookups_without_matches_are_not_found() {
    let model = model();
    seed_items(&model, 2).await;

    let mut missing = Item::default();
    let err = model
        .find_one(&mut missing, Some(Filter::eq("name", "nobody")))
        .await
        .unwrap_err();
    assert!(err.is_not_found());

    let mut unknown = item("zz", "", 0);
    assert!(model.find_by_id(&mut unknown).await.unwrap_err().is_not_found());

    // Multi-row reads treat zero matches as an empty result.
    let none = model.find(&Item::default(), Some(Filter::eq("name", "nobody"))).await.unwrap();
    assert!(none.is_empty());
}

#[tokio::test]
async fn addressing_a_record_without_identity_is_a_usage_error() {
    let model = model();
    let mut anonymous = Item::default();

    assert!(model.find_by_id(&mut anonymous).await.unwrap_err().is_usage());
    assert!(model.remove_by_id(&anonymous).await.unwrap_err().is_usage());
    assert!(model.upsert(&mut anonymous, None).await.unwrap_err().is_usage());
}

#[tokio::test]
async fn batch_save_reports_the_rejected_record() {
    let model = model();
    let records = vec![
        item("k1", "one", 1),
        item("k2", "two", 2),
        item("k2", "duplicate", 3),
        item("k3", "three", 4),
    ];

    let outcome = model.batch_save(records, Some(&Operator)).await.unwrap();

    assert_eq!(outcome.inserted, vec![Bson::from("k1"), Bson::from("k2"), Bson::from("k3")]);
    assert_eq!(outcome.failed.len(), 1);
    assert_eq!(outcome.failed[0].name, "duplicate");
    assert_eq!(outcome.failures[0].index, 2);
    assert!(outcome.is_partial());
    assert_eq!(model.count_documents(&Item::default(), None).await.unwrap(), 3);
}

#[tokio::test]
async fn empty_batches_are_no_ops() {
    let model = model();

    let saved = model.batch_save(Vec::<Item>::new(), None).await.unwrap();
    assert!(saved.inserted.is_empty() && saved.failed.is_empty());

    let updated = model
        .batch_update(Vec::<Item>::new(), |_| doc! {}, None)
        .await
        .unwrap();
    assert_eq!(updated.modified, 0);
}

#[tokio::test]
async fn batch_update_upserts_and_appends_audit() {
    let model = model();
    model.save(&mut item("k1", "one", 1), Some(&Operator)).await.unwrap();

    let outcome = model
        .batch_update(
            vec![item("k1", "one", 10), item("k2", "two", 20)],
            |record| doc! { "name": record.name.clone(), "rank": record.rank },
            Some(&Operator),
        )
        .await
        .unwrap();

    assert_eq!((outcome.matched, outcome.modified), (1, 1));
    assert_eq!(outcome.upserted, vec![Bson::from("k2")]);
    assert!(outcome.failed.is_empty());

    let mut first = item("k1", "", 0);
    model.find_by_id(&mut first).await.unwrap();
    assert_eq!(first.rank, 10);
    let summaries = first
        .records
        .entries()
        .iter()
        .map(|entry| entry.summary.as_str())
        .collect::<Vec<_>>();
    assert_eq!(summaries, vec![CREATED_SUMMARY, UPDATED_SUMMARY]);

    let mut second = item("k2", "", 0);
    model.find_by_id(&mut second).await.unwrap();
    assert_eq!(second.rank, 20);
    assert_eq!(second.records.len(), 1);
}

#[tokio::test]
async fn batch_update_reports_the_rejected_record() {
    let model = model();
    model.save(&mut item("k1", "one", 1), Some(&Operator)).await.unwrap();
    model
        .backend()
        .insert_one("items", doc! { "_id": "k2", "name": "two", "rank": 2, "records": "broken" })
        .await
        .unwrap();

    let outcome = model
        .batch_update(
            vec![item("k1", "one", 10), item("k2", "two", 20), item("k3", "three", 30)],
            |record| doc! { "rank": record.rank },
            Some(&Operator),
        )
        .await
        .unwrap();

    assert_eq!(outcome.failures.len(), 1);
    assert_eq!(outcome.failures[0].index, 1);
    assert_eq!(outcome.failed.len(), 1);
    assert_eq!(outcome.failed[0].key, "k2");
    assert!(outcome.failed[0].records.is_empty());
    assert_eq!(outcome.upserted, vec![Bson::from("k3")]);

    let ranks = model
        .find_by_query(
            &Item::default(),
            Query::builder()
                .filter(Filter::ids([Bson::from("k1"), Bson::from("k3")]))
                .sort("rank", SortDirection::Asc)
                .build(),
        )
        .await
        .unwrap()
        .iter()
        .map(|item| item.rank)
        .collect::<Vec<_>>();
    assert_eq!(ranks, vec![10, 30]);
}

#[tokio::test]
async fn batch_update_without_changes_reports_zero_modified() {
    let model = model();
    model.save(&mut item("k1", "one", 1), None).await.unwrap();

    let outcome = model
        .batch_update(vec![item("k1", "one", 1)], |record| doc! { "rank": record.rank }, None)
        .await
        .unwrap();

    assert_eq!((outcome.matched, outcome.modified), (1, 0));
    assert!(outcome.failures.is_empty());
}

#[tokio::test]
async fn update_one_writes_the_whole_trail() {
    let model = model();
    let mut saved = item("k1", "one", 1);
    model.save(&mut saved, Some(&Operator)).await.unwrap();

    let modified = model
        .update_one(&mut saved, doc! { "name": "renamed" }, Some(&Operator))
        .await
        .unwrap();
    assert_eq!(modified, 1);
    assert_eq!(saved.records.len(), 2);

    let mut loaded = item("k1", "", 0);
    model.find_by_id(&mut loaded).await.unwrap();
    assert_eq!(loaded.name, "renamed");
    assert_eq!(loaded.records, saved.records);
}

#[tokio::test]
async fn failed_update_one_leaves_the_trail_unchanged() {
    let model = model();
    let mut saved = item("k1", "one", 1);
    model.save(&mut saved, Some(&Operator)).await.unwrap();

    let result = model
        .update_one(&mut saved, doc! { "_id": "other" }, Some(&Operator))
        .await;

    assert!(result.is_err());
    assert_eq!(saved.records.len(), 1);
}

#[tokio::test]
async fn update_all_appends_one_entry_per_match() {
    let model = model();
    seed_items(&model, 3).await;

    let modified = model
        .update_all(
            &Item::default(),
            Some(Filter::gte("rank", 2)),
            doc! { "name": "bulk" },
            Some(&Operator),
        )
        .await
        .unwrap();
    assert_eq!(modified, 2);

    let items = model
        .find_by_query(&Item::default(), Query::builder().sort("rank", SortDirection::Asc).build())
        .await
        .unwrap();
    let trail_lengths = items.iter().map(|item| item.records.len()).collect::<Vec<_>>();

    assert_eq!(trail_lengths, vec![1, 2, 2]);
    assert_eq!(items[2].name, "bulk");
    assert_eq!(items[2].records.last().unwrap().summary, UPDATED_SUMMARY);
}

#[tokio::test]
async fn unset_fields_removes_them_from_matches() {
    let model = model();
    for key in ["k1", "k2"] {
        let mut tagged = item(key, key, 1);
        tagged.tags = vec!["x".into()];
        model.save(&mut tagged, None).await.unwrap();
    }

    let modified = model
        .unset_fields(&Item::default(), None, ["tags"])
        .await
        .unwrap();

    assert_eq!(modified, 2);
    assert_eq!(
        model.count_documents(&Item::default(), Some(Filter::exists("tags"))).await.unwrap(),
        0
    );
}

#[tokio::test]
async fn upsert_inserts_then_overwrites() {
    let model = model();
    let mut record = item("k9", "first", 1);

    let id = model.upsert(&mut record, Some(&Operator)).await.unwrap();
    assert_eq!(id, Bson::from("k9"));

    record.name = "second".into();
    model.upsert(&mut record, Some(&Operator)).await.unwrap();

    let stored = model.find(&Item::default(), None).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].name, "second");
    assert_eq!(stored[0].records.len(), 2);
}

#[tokio::test]
async fn failed_upserts_leave_the_trail_unchanged() {
    let model = model();
    model.save(&mut account("a1", "x@example.com"), None).await.unwrap();

    let mut clash = account("a2", "x@example.com");
    let result = model.upsert(&mut clash, Some(&Operator)).await;

    assert!(matches!(result, Err(DocumentStoreError::DocumentAlreadyExists(..))));
    assert!(clash.records.is_empty());
}

#[tokio::test]
async fn removals_return_deleted_counts() {
    let model = model();
    seed_items(&model, 3).await;

    assert_eq!(model.remove_by_id(&item("i1", "", 0)).await.unwrap(), 1);
    assert_eq!(model.remove_by_id(&item("i1", "", 0)).await.unwrap(), 0);
    assert_eq!(
        model.remove_all(&Item::default(), Some(Filter::gte("rank", 2))).await.unwrap(),
        2
    );
    assert_eq!(model.count_documents(&Item::default(), None).await.unwrap(), 0);
}

#[tokio::test]
async fn batch_find_by_id_keeps_request_order() {
    let model = model();
    for key in ["k1", "k2", "k3"] {
        model.save(&mut item(key, key, 1), None).await.unwrap();
    }

    let results = model
        .batch_find_by_id(&Item::default(), vec!["k2".into(), "k1".into(), "k4".into()])
        .await
        .unwrap();

    assert_eq!(results.len(), 3);
    assert_eq!(results[0].as_ref().unwrap().key, "k2");
    assert_eq!(results[1].as_ref().unwrap().key, "k1");
    assert!(results[2].as_ref().unwrap_err().is_not_found());
}

#[tokio::test]
async fn batch_find_by_id_tells_strings_from_object_ids() {
    let model = model();
    let oid = ObjectId::new();
    model.save(&mut item(&oid.to_hex(), "hex", 1), None).await.unwrap();

    let results = model
        .batch_find_by_id(&Item::default(), vec![Bson::ObjectId(oid), Bson::String(oid.to_hex())])
        .await
        .unwrap();

    assert!(results[0].as_ref().unwrap_err().is_not_found());
    assert_eq!(results[1].as_ref().unwrap().name, "hex");
}

#[tokio::test]
async fn page_find_defaults_to_fifty_rows_of_page_one() {
    let model = model();
    seed_items(&model, 60).await;
    let prototype = Item::default();

    let defaulted = model.page_find(&prototype, None, 0, 0).await.unwrap();
    let explicit = model.page_find(&prototype, None, 50, 1).await.unwrap();
    assert_eq!(defaulted.len(), 50);
    assert_eq!(defaulted, explicit);

    let rest = model.page_find(&prototype, None, 50, 2).await.unwrap();
    assert_eq!(rest.len(), 10);
}

#[tokio::test]
async fn page_find_sorted_orders_before_paging() {
    let model = model();
    seed_items(&model, 12).await;

    let page = model
        .page_find_sorted(&Item::default(), None, vec![Sort::desc("rank")], 5, 2)
        .await
        .unwrap();

    assert_eq!(keys(&page), vec!["i7", "i6", "i5", "i4", "i3"]);
}

#[tokio::test]
async fn find_and_exec_streams_rows_then_copies_the_last_back() {
    let model = model();
    seed_items(&model, 3).await;

    let mut prototype = Item::default();
    let mut seen = Vec::new();
    model
        .find_and_exec_by_query(
            &mut prototype,
            Query::builder().sort("rank", SortDirection::Asc).build(),
            |row: &Item| {
                seen.push(row.key.clone());
                Ok(())
            },
        )
        .await
        .unwrap();

    assert_eq!(seen, vec!["i1", "i2", "i3"]);
    assert_eq!(prototype.key, "i3");
}

#[tokio::test]
async fn find_and_exec_stops_at_the_first_callback_error() {
    let model = model();
    seed_items(&model, 3).await;

    let mut prototype = item("proto", "", 0);
    let mut calls = 0;
    let err = model
        .find_and_exec(&mut prototype, None, |_: &Item| {
            calls += 1;
            if calls == 2 {
                return Err(DocumentStoreError::Aborted("enough".into()));
            }
            Ok(())
        })
        .await
        .unwrap_err();

    assert!(matches!(err, DocumentStoreError::Aborted(_)));
    assert_eq!(calls, 2);
    assert_eq!(prototype.key, "proto");
}

#[tokio::test]
async fn find_and_exec_without_rows_leaves_the_prototype() {
    let model = model();
    let mut prototype = item("proto", "", 0);

    model
        .find_and_exec(&mut prototype, Some(Filter::eq("rank", 99)), |_: &Item| Ok(()))
        .await
        .unwrap();

    assert_eq!(prototype.key, "proto");
}

#[tokio::test]
async fn find_source_runs_its_bound_query() {
    let model = model();
    seed_items(&model, 4).await;

    let query = Query::builder()
        .filter(Filter::lte("rank", 3))
        .sort("rank", SortDirection::Desc)
        .build();
    let mut source = model.find_source(Item::default(), query);

    let mut ranks = Vec::new();
    source
        .exec(&mut |row: &Item| {
            ranks.push(row.rank);
            Ok(())
        })
        .await
        .unwrap();

    assert_eq!(ranks, vec![3, 2, 1]);
    assert_eq!(source.into_prototype().key, "i1");
}
