mod common;

use chrono::{Duration, Utc};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use common::sample_project;
use memory_sync::shared::{Config, MemoryService, MemoryStore, Namespace, TaggingMode};

fn service() -> (Arc<MemoryStore>, MemoryService) {
    let store = Arc::new(MemoryStore::new());
    let service = MemoryService::new(&Config::default(), store.clone());
    (store, service)
}

const TECHNICAL: &str = "fix the compile error in the parser function";

#[tokio::test]
async fn test_full_buffer_is_categorized() {
    let (_store, service) = service();

    for _ in 0..5 {
        service
            .conversations
            .add_message("user", TECHNICAL)
            .await
            .unwrap();
    }
    assert_eq!(service.buffer().pending(), 0);
    service.shutdown().await;

    let history = service.conversations.get_history(10).await.unwrap();
    assert_eq!(history.len(), 5);
    for message in &history {
        assert_eq!(message.tags, vec!["category:technical".to_string()]);
    }
}

#[tokio::test]
async fn test_partial_buffer_is_not_categorized() {
    let (_store, service) = service();

    for _ in 0..4 {
        service
            .conversations
            .add_message("assistant", TECHNICAL)
            .await
            .unwrap();
    }
    service.shutdown().await;

    let history = service.conversations.get_history(10).await.unwrap();
    assert!(history.iter().all(|m| m.tags.is_empty()));
}

#[tokio::test]
async fn test_manual_mode_holds_until_switched_back() {
    let (_store, service) = service();
    service.buffer().set_mode(TaggingMode::Manual);

    for _ in 0..7 {
        service
            .conversations
            .add_message("user", TECHNICAL)
            .await
            .unwrap();
    }
    assert_eq!(service.buffer().pending(), 7);

    assert_eq!(service.buffer().set_mode(TaggingMode::Automatic), 7);
    assert_eq!(service.buffer().pending(), 0);
    service.shutdown().await;

    let tagged = service
        .conversations
        .get_messages_by_tag("category:technical", 20)
        .await
        .unwrap();
    assert_eq!(tagged.len(), 7);
}

#[tokio::test]
async fn test_conversation_tag_is_applied_and_kept() {
    let (_store, service) = service();
    service.buffer().set_tag("sprint-9");

    let message = service
        .conversations
        .add_message("user", "hello")
        .await
        .unwrap();
    assert_eq!(message.tags, vec!["sprint-9".to_string()]);

    let found = service
        .conversations
        .tag_messages(&[message.id.clone(), "missing-id".to_string()], "reviewed")
        .await
        .unwrap();
    assert_eq!(found, 1);

    let tagged = service
        .conversations
        .get_messages_by_tag("reviewed", 5)
        .await
        .unwrap();
    assert_eq!(
        tagged[0].tags,
        vec!["sprint-9".to_string(), "reviewed".to_string()]
    );
    service.shutdown().await;
}

#[tokio::test]
async fn test_validation_errors() {
    let (_store, service) = service();
    let conversations = &service.conversations;

    assert!(conversations.add_message("project", "x").await.is_err());
    assert!(conversations.add_message("robot", "x").await.is_err());
    assert!(conversations.add_message("user", "   ").await.is_err());
    assert!(conversations.search("", 5).await.is_err());
    assert!(conversations.tag_messages(&[], "t").await.is_err());
    assert!(
        conversations
            .tag_messages(&["id".to_string()], " ")
            .await
            .is_err()
    );
    assert!(conversations.get_messages_by_tag("", 5).await.is_err());
    assert!(conversations.delete_message(" ").await.is_err());
    service.shutdown().await;
}

#[tokio::test]
async fn test_project_files_stay_out_of_conversation_queries() {
    let dir = TempDir::new().unwrap();
    sample_project(dir.path());
    let (store, service) = service();

    service
        .projects
        .index_project(dir.path(), None, &CancellationToken::new())
        .await
        .unwrap();
    service
        .conversations
        .add_message("user", "remember to buy milk")
        .await
        .unwrap();

    let hits = service.conversations.search("milk", 10).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].message.content, "remember to buy milk");

    assert_eq!(service.conversations.count_messages().await.unwrap(), 1);
    assert_eq!(service.conversations.delete_all_messages().await.unwrap(), 1);
    assert_eq!(store.len(Namespace::ProjectFiles), 3);

    let stats = service.stats().await.unwrap();
    assert_eq!(stats.messages, 0);
    assert_eq!(stats.project_files, 3);
    service.shutdown().await;
}

#[tokio::test]
async fn test_delete_by_id_and_range() {
    let (store, service) = service();
    let conversations = &service.conversations;

    let first = conversations.add_message("user", "one").await.unwrap();
    conversations.add_message("assistant", "two").await.unwrap();
    conversations.add_message("user", "three").await.unwrap();

    assert!(conversations.delete_message(&first.id).await.unwrap());
    assert!(!conversations.delete_message(&first.id).await.unwrap());

    let an_hour_ago = Utc::now() - Duration::hours(1);
    assert_eq!(
        conversations
            .delete_messages_in_range(None, Some(an_hour_ago))
            .await
            .unwrap(),
        0
    );
    assert_eq!(
        conversations
            .delete_messages_in_range(Some(an_hour_ago), None)
            .await
            .unwrap(),
        2
    );
    assert!(store.is_empty(Namespace::Conversation));
    service.shutdown().await;
}

#[tokio::test]
async fn test_history_order_and_summary() {
    let (store, service) = service();
    let conversations = &service.conversations;

    let mut ids = Vec::new();
    for text in ["first", "second", "third"] {
        ids.push(conversations.add_message("user", text).await.unwrap().id);
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }

    let latest_two = conversations.get_history(2).await.unwrap();
    let contents: Vec<&str> = latest_two.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["second", "third"]);

    conversations.set_summary(&ids[0], "opening line").await.unwrap();
    let all = conversations.get_history(10).await.unwrap();
    assert_eq!(all[0].summary.as_deref(), Some("opening line"));

    assert!(conversations.set_summary("no-such-id", "x").await.is_err());
    assert_eq!(store.len(Namespace::Conversation), 3);
    service.shutdown().await;
}

#[tokio::test]
async fn test_history_reaches_newest_beyond_scan_limit() {
    let mut config = Config::default();
    config.history.max_scan = 3;
    let service = MemoryService::new(&config, Arc::new(MemoryStore::new()));
    service.buffer().set_mode(TaggingMode::Manual);
    service.buffer().set_tag("batch");

    for i in 0..10 {
        service
            .conversations
            .add_message("user", &format!("m{i}"))
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
    }

    let contents = |messages: Vec<memory_sync::shared::Message>| -> Vec<String> {
        messages.into_iter().map(|m| m.content).collect()
    };
    assert_eq!(
        contents(service.conversations.get_history(2).await.unwrap()),
        vec!["m8", "m9"]
    );
    assert_eq!(
        contents(service.conversations.get_history(50).await.unwrap()),
        vec!["m7", "m8", "m9"]
    );
    assert_eq!(
        contents(
            service
                .conversations
                .get_messages_by_tag("batch", 2)
                .await
                .unwrap()
        ),
        vec!["m9", "m8"]
    );
    service.shutdown().await;
}
