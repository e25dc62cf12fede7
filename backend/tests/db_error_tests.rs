//! Tests for repository errors and their mapping at the engine boundary.

use xpl_history::db::repository::{ErrorContext, RepositoryError};
use xpl_history::EngineError;

#[test]
fn test_error_context_chaining() {
    let ctx = ErrorContext::new("insert_day")
        .with_entity("day_cache")
        .with_entity_id("meter@power")
        .retryable();

    assert_eq!(ctx.operation.as_deref(), Some("insert_day"));
    assert_eq!(ctx.entity.as_deref(), Some("day_cache"));
    assert_eq!(ctx.entity_id.as_deref(), Some("meter@power"));
    assert!(ctx.retryable);

    let display = ctx.to_string();
    assert!(display.contains("operation=insert_day"));
    assert!(display.contains("id=meter@power"));
    assert!(display.contains("retryable=true"));
}

#[test]
fn test_duplicate_key() {
    let err = RepositoryError::duplicate_key_with_context(
        "day already cached",
        ErrorContext::new("insert_day").with_entity_id("meter@power"),
    );
    assert!(err.is_duplicate_key());
    assert!(!err.is_not_found());
    assert!(!err.is_retryable());
    assert!(err.to_string().contains("Duplicate key"));
}

#[test]
fn test_retryable_kinds() {
    assert!(RepositoryError::connection("socket closed").is_retryable());
    assert!(RepositoryError::connection_with_context(
        "cache unavailable",
        ErrorContext::new("insert_day")
    )
    .is_retryable());
    assert!(!RepositoryError::query("bad range").is_retryable());
    assert!(!RepositoryError::configuration("no backend").is_retryable());
}

#[test]
fn test_with_operation() {
    let err = RepositoryError::query("scan failed").with_operation("fetch");
    assert_eq!(err.context().operation.as_deref(), Some("fetch"));
    assert!(err.to_string().contains("operation=fetch"));
}

#[test]
fn test_engine_error_mapping() {
    let missing = RepositoryError::not_found_with_context(
        "unknown device",
        ErrorContext::new("fetch").with_entity_id("ghost@temp"),
    );
    match EngineError::from(missing) {
        EngineError::NotFound { device_key } => assert_eq!(device_key, "ghost@temp"),
        other => panic!("unexpected {:?}", other),
    }

    let mapped = EngineError::from_repository("kitchen@temp", RepositoryError::not_found("gone"));
    assert!(mapped.is_not_found());
    assert!(mapped.to_string().contains("kitchen@temp"));

    let source = EngineError::from_repository("kitchen@temp", RepositoryError::query("io"));
    assert!(matches!(source, EngineError::Source(_)));
    assert!(std::error::Error::source(&source).is_some());
}

#[test]
fn test_plain_messages_are_internal() {
    let err: RepositoryError = "lock poisoned".into();
    assert!(matches!(err, RepositoryError::InternalError { .. }));
}
