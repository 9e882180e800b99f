mod support;

use docmodel::{memory::InMemoryStore, prelude::*};
use support::{OrderLine, seed_orders};

async fn model() -> Model<InMemoryStore> {
    let model = Model::new(InMemoryStore::new());
    seed_orders(&model).await;
    model
}

fn skus(rows: &[OrderLine]) -> Vec<&str> {
    rows.iter().map(|row| row.line.sku.as_str()).collect()
}

#[tokio::test]
async fn pipe_find_decodes_every_pipeline_row() {
    let model = model().await;

    let rows = model.pipe_find(&OrderLine::default(), None).await.unwrap();

    assert_eq!(skus(&rows), vec!["c", "a", "b", "d", "e"]);
    assert_eq!(rows[3].order, "o4");
    assert_eq!(rows[3].line.qty, 3);
}

#[tokio::test]
async fn pipe_find_one_decodes_the_first_row_or_fails() {
    let model = model().await;

    let mut row = OrderLine::default();
    model
        .pipe_find_one(&mut row, Some(Filter::eq("customer", "bob")))
        .await
        .unwrap();
    assert_eq!(row.line.sku, "b");

    let err = model
        .pipe_find_one(&mut row, Some(Filter::eq("customer", "nobody")))
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn page_pipe_find_sorts_before_skipping_and_limiting() {
    let model = model().await;

    let page = model
        .page_pipe_find(&OrderLine::default(), None, vec![Sort::asc("lines.sku")], 2, 2)
        .await
        .unwrap();

    assert_eq!(skus(&page), vec!["c", "d"]);
}

#[tokio::test]
async fn page_pipe_find_defaults_non_positive_paging() {
    let model = model().await;

    let page = model
        .page_pipe_find(&OrderLine::default(), None, Vec::new(), -1, 0)
        .await
        .unwrap();

    assert_eq!(page.len(), 5);
}

#[tokio::test]
async fn pipeline_counts_differ_from_direct_counts() {
    let model = model().await;
    let spec = OrderLine::default();

    assert_eq!(model.count_aggr_documents(&spec, None).await.unwrap(), 5);
    assert_eq!(model.count_documents(&spec, None).await.unwrap(), 4);

    let alice = Some(Filter::eq("customer", "alice"));
    assert_eq!(model.count_aggr_documents(&spec, alice.clone()).await.unwrap(), 2);
    assert_eq!(model.count_documents(&spec, alice).await.unwrap(), 2);
}

#[tokio::test]
async fn pipeline_count_of_nothing_is_zero() {
    let model = model().await;

    let count = model
        .count_aggr_documents(&OrderLine::default(), Some(Filter::eq("customer", "nobody")))
        .await
        .unwrap();

    assert_eq!(count, 0);
}

#[tokio::test]
async fn pipe_find_and_exec_streams_in_cursor_order() {
    let model = model().await;

    let mut spec = OrderLine::default();
    let mut seen = Vec::new();
    model
        .pipe_find_and_exec(&mut spec, Some(Filter::eq("customer", "carol")), |row: &OrderLine| {
            seen.push(row.line.sku.clone());
            Ok(())
        })
        .await
        .unwrap();

    assert_eq!(seen, vec!["d", "e"]);
    assert_eq!(spec.line.sku, "e");
}

#[tokio::test]
async fn pipe_find_source_streams_its_bound_filter() {
    let model = model().await;
    let mut source = model.pipe_find_source(OrderLine::default(), Some(Filter::eq("customer", "alice")));

    let mut orders = Vec::new();
    source
        .exec(&mut |row: &OrderLine| {
            orders.push(row.order.clone());
            Ok(())
        })
        .await
        .unwrap();

    assert_eq!(orders, vec!["o1", "o1"]);
    assert_eq!(source.prototype().line.sku, "a");
}
