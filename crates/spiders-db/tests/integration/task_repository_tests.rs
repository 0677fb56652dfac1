use spiders_core::models::{NewTask, TaskStatus, compute_hash};
use spiders_core::traits::TaskStore;
use spiders_db::TaskRepository;
use uuid::Uuid;

use crate::integration::common::{insert_source, setup_test_db};

#[tokio::test]
async fn upsert_inserts_pending_task() {
    let (pool, _container) = setup_test_db().await;
    let source_id = insert_source(&pool, "news").await;
    let repo = TaskRepository::new(pool);

    let outcome = repo
        .upsert(&NewTask::new(None, source_id, "https://example.com/a"))
        .await
        .unwrap();

    assert!(outcome.inserted);
    let task = outcome.task;
    assert_eq!(task.url, "https://example.com/a");
    assert_eq!(task.url_hash, compute_hash("https://example.com/a"));
    assert_eq!(task.status, TaskStatus::Pending);
    assert_eq!(task.extract_result, serde_json::json!({}));
    assert!(task.parent_id.is_none());
}

#[tokio::test]
async fn upsert_resubmission_resets_existing_row() {
    let (pool, _container) = setup_test_db().await;
    let source_id = insert_source(&pool, "news").await;
    let other_source = insert_source(&pool, "archive").await;
    let repo = TaskRepository::new(pool);

    let first = repo
        .upsert(&NewTask::new(None, source_id, "https://example.com/a"))
        .await
        .unwrap()
        .task;
    repo.complete(first.id, &serde_json::json!({"title": "Kept"}))
        .await
        .unwrap();

    let parent = Uuid::new_v4();
    let second = repo
        .upsert(&NewTask::new(Some(parent), other_source, "https://example.com/a"))
        .await
        .unwrap();

    assert!(!second.inserted);
    assert_eq!(second.task.id, first.id);
    assert_eq!(second.task.status, TaskStatus::Pending);
    assert_eq!(second.task.parent_id, Some(parent));
    assert_eq!(second.task.source_id, other_source);
    assert_eq!(second.task.extract_result, serde_json::json!({"title": "Kept"}));
}

#[tokio::test]
async fn concurrent_upserts_create_one_row() {
    let (pool, _container) = setup_test_db().await;
    let source_id = insert_source(&pool, "news").await;
    let repo = TaskRepository::new(pool);

    let new_task = NewTask::new(None, source_id, "https://example.com/race");
    let (a, b, c) = tokio::join!(
        repo.upsert(&new_task),
        repo.upsert(&new_task),
        repo.upsert(&new_task)
    );
    let outcomes = [a.unwrap(), b.unwrap(), c.unwrap()];

    assert_eq!(outcomes.iter().filter(|o| o.inserted).count(), 1);
    assert!(outcomes.iter().all(|o| o.task.id == outcomes[0].task.id));

    let found = repo
        .find_by_url(&new_task.url_hash, &new_task.url)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.id, outcomes[0].task.id);
}

#[tokio::test]
async fn update_status_and_complete() {
    let (pool, _container) = setup_test_db().await;
    let source_id = insert_source(&pool, "news").await;
    let repo = TaskRepository::new(pool);

    let task = repo
        .upsert(&NewTask::new(None, source_id, "https://example.com/a"))
        .await
        .unwrap()
        .task;

    repo.update_status(task.id, TaskStatus::Failed).await.unwrap();
    let failed = repo.get(task.id).await.unwrap().unwrap();
    assert_eq!(failed.status, TaskStatus::Failed);

    repo.complete(task.id, &serde_json::json!({"items": ["1", "2"]}))
        .await
        .unwrap();
    let done = repo.get(task.id).await.unwrap().unwrap();
    assert_eq!(done.status, TaskStatus::Succeeded);
    assert_eq!(done.extract_result, serde_json::json!({"items": ["1", "2"]}));
}

#[tokio::test]
async fn complete_unknown_task_is_not_found() {
    let (pool, _container) = setup_test_db().await;
    let repo = TaskRepository::new(pool);

    let err = repo
        .complete(Uuid::new_v4(), &serde_json::json!({}))
        .await
        .unwrap_err();
    assert!(matches!(err, spiders_core::AppError::NotFound(_)));
}

#[tokio::test]
async fn scan_returns_only_requested_status() {
    let (pool, _container) = setup_test_db().await;
    let source_id = insert_source(&pool, "news").await;
    let repo = TaskRepository::new(pool);

    let a = repo
        .upsert(&NewTask::new(None, source_id, "https://example.com/a"))
        .await
        .unwrap()
        .task;
    let b = repo
        .upsert(&NewTask::new(None, source_id, "https://example.com/b"))
        .await
        .unwrap()
        .task;
    repo.update_status(a.id, TaskStatus::Failed).await.unwrap();

    assert_eq!(repo.scan(TaskStatus::Failed).await.unwrap(), vec![a.id]);
    assert_eq!(repo.scan(TaskStatus::Pending).await.unwrap(), vec![b.id]);
    assert!(repo.scan(TaskStatus::Succeeded).await.unwrap().is_empty());
}

#[tokio::test]
async fn lookups_by_source_and_missing_ids() {
    let (pool, _container) = setup_test_db().await;
    let source_id = insert_source(&pool, "news").await;
    let repo = TaskRepository::new(pool);

    assert!(repo.get(Uuid::new_v4()).await.unwrap().is_none());
    assert!(repo.get_by_source_id(source_id).await.unwrap().is_none());

    let task = repo
        .upsert(&NewTask::new(None, source_id, "https://example.com/a"))
        .await
        .unwrap()
        .task;
    assert_eq!(
        repo.get_by_source_id(source_id).await.unwrap().unwrap().id,
        task.id
    );
    assert_eq!(repo.list_recent(10).await.unwrap().len(), 1);
}
