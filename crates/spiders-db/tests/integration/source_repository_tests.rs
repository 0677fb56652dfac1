use spiders_core::models::Source;
use spiders_core::rules::{ExtractRule, HtmlRule, JsonRule};
use spiders_core::traits::SourceStore;
use spiders_db::{NewSource, SourceRepository};
use uuid::Uuid;

use crate::integration::common::setup_test_db;

#[tokio::test]
async fn save_and_load_decodes_rules_in_order() {
    let (pool, _container) = setup_test_db().await;
    let repo = SourceRepository::new(pool);

    let mut new_source = NewSource::new(
        "feed",
        serde_json::json!({
            "zeta": {"html": {"selector": "h1"}},
            "alpha": {"json": {"path": "data.id"}},
            "items": {"html": {"selector": "li", "list": true}}
        }),
    );
    new_source.use_proxy = true;
    new_source.timeout_secs = 12;
    new_source.headers = serde_json::json!({"User-Agent": "spiders"});
    new_source.params = serde_json::json!({
        "scroll": "items",
        "query": [{"name": "after", "value": "$1"}]
    });

    let record = repo.save(&new_source).await.unwrap();
    let source: Source = repo.get(record.id).await.unwrap().unwrap();

    assert_eq!(source.slug, "feed");
    assert!(source.use_proxy);
    assert_eq!(source.timeout_secs, 12);
    assert_eq!(source.headers["User-Agent"], "spiders");

    let fields: Vec<_> = source
        .extract_rules
        .iter()
        .map(|r| r.field.as_str())
        .collect();
    assert_eq!(fields, vec!["zeta", "alpha", "items"]);
    assert_eq!(
        source.extract_rules.iter().nth(1).unwrap().rule,
        ExtractRule::Json(JsonRule::path("data.id"))
    );
    assert_eq!(
        source.extract_rules.iter().nth(2).unwrap().rule,
        ExtractRule::Html(HtmlRule::all("li"))
    );
    assert_eq!(source.scroll.unwrap().scroll, "items");
}

#[tokio::test]
async fn save_same_slug_replaces_config() {
    let (pool, _container) = setup_test_db().await;
    let repo = SourceRepository::new(pool);

    let first = repo
        .save(&NewSource::new("feed", serde_json::json!({})))
        .await
        .unwrap();
    let mut update = NewSource::new("feed", serde_json::json!({}));
    update.timeout_secs = 60;
    let second = repo.save(&update).await.unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(second.timeout, 60);
    assert_eq!(repo.list().await.unwrap().len(), 1);
    assert!(repo.get_by_slug("feed").await.unwrap().is_some());
}

#[tokio::test]
async fn missing_source_is_none() {
    let (pool, _container) = setup_test_db().await;
    let repo = SourceRepository::new(pool);

    assert!(repo.get(Uuid::new_v4()).await.unwrap().is_none());
    assert!(repo.get_by_slug("nope").await.unwrap().is_none());
}
