mod support;

use docmodel::{memory::InMemoryStore, prelude::*};
use serde_json::Value;
use support::{Item, OrderLine, seed_items, seed_orders};

fn name_row(item: &Item) -> Row {
    let mut row = Row::new();
    row.insert("name".into(), Value::from(item.name.clone()));
    row
}

fn sku_row(line: &OrderLine) -> Row {
    let mut row = Row::new();
    row.insert("sku".into(), Value::from(line.line.sku.clone()));
    row.insert("order".into(), Value::from(line.order.clone()));
    row
}

#[tokio::test]
async fn query_source_pairs_count_with_formatted_rows() {
    let model = Model::new(InMemoryStore::new());
    seed_items(&model, 12).await;

    let source = model.pagination_source(Item::default(), None, vec![Sort::asc("rank")]);

    assert_eq!(source.count().await.unwrap(), 12);

    let rows = source.data(5, 3, &name_row).await.unwrap().unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["name"], "item 11");
}

#[tokio::test]
async fn data_without_matches_is_none() {
    let model = Model::new(InMemoryStore::new());
    seed_items(&model, 3).await;

    let source = model.pagination_source(Item::default(), Some(Filter::gt("rank", 10)), Vec::new());

    assert_eq!(source.data(10, 1, &name_row).await.unwrap(), None);
    assert_eq!(source.count().await.unwrap(), 0);
}

#[tokio::test]
async fn page_carries_navigation() {
    let model = Model::new(InMemoryStore::new());
    seed_items(&model, 12).await;

    let source = model.pagination_source(Item::default(), None, vec![Sort::asc("rank")]);
    let page = source.page(PageRequest::new(5, 2), &name_row).await.unwrap();

    assert_eq!(page.items.len(), 5);
    assert_eq!(page.count, 12);
    assert_eq!(page.next_page, Some(3));
    assert_eq!(page.previous_page, Some(1));
    assert_eq!(page.items[0]["name"], "item 6");

    let last = source.page(PageRequest::new(5, 3), &name_row).await.unwrap();
    assert_eq!(last.next_page, None);
}

#[tokio::test]
async fn empty_page_has_no_items() {
    let model = Model::new(InMemoryStore::new());

    let source = model.pagination_source(Item::default(), None, Vec::new());
    let page = source.page(PageRequest::default(), &name_row).await.unwrap();

    assert!(page.items.is_empty());
    assert_eq!(page.count, 0);
    assert_eq!(page.next_page, None);
}

#[tokio::test]
async fn pipeline_sources_choose_their_count() {
    let model = Model::new(InMemoryStore::new());
    seed_orders(&model).await;

    let direct = model.pipe_pagination_source(OrderLine::default(), None, vec![Sort::asc("lines.sku")]);
    let counted = model.pipe_counted_pagination_source(OrderLine::default(), None, vec![Sort::asc("lines.sku")]);

    assert!(!direct.counts_through_pipeline());
    assert!(counted.counts_through_pipeline());
    assert_eq!(direct.count().await.unwrap(), 4);
    assert_eq!(counted.count().await.unwrap(), 5);

    let rows = counted.data(2, 2, &sku_row).await.unwrap().unwrap();
    let skus = rows.iter().map(|row| row["sku"].clone()).collect::<Vec<_>>();
    assert_eq!(skus, vec![Value::from("c"), Value::from("d")]);

    let page = counted.page(PageRequest::new(2, 3), &sku_row).await.unwrap();
    assert_eq!(page.items.len(), 1);
    assert_eq!(page.count, 5);
    assert_eq!(page.next_page, None);
    assert_eq!(page.previous_page, Some(2));
}

#[tokio::test]
async fn pipeline_source_without_matches_is_none() {
    let model = Model::new(InMemoryStore::new());
    seed_orders(&model).await;

    let source = model.pipe_counted_pagination_source(
        OrderLine::default(),
        Some(Filter::eq("customer", "nobody")),
        Vec::new(),
    );

    assert_eq!(source.data(0, 0, &sku_row).await.unwrap(), None);
    assert_eq!(source.count().await.unwrap(), 0);
}
