//! Tests for notification emission and filtering.

use zgate_messages::{
    Notification, NotificationCategory, NotificationManager, NotificationSeverity,
    NotificationSink,
};

#[test]
fn test_filter_by_category_and_severity() {
    let manager = NotificationManager::new();
    manager.notify(
        NotificationSeverity::Error,
        "2-0-49: sensor type missing",
        NotificationCategory::Core,
    );
    manager.notify(
        NotificationSeverity::Critical,
        "Connection lost to Z-Wave device ID #4",
        NotificationCategory::Connection,
    );
    manager.notify(
        NotificationSeverity::Info,
        "Z-Wave device ID #4 is back to life",
        NotificationCategory::Connection,
    );

    assert_eq!(manager.list_by_category(NotificationCategory::Connection).len(), 2);
    assert_eq!(manager.list_by_category(NotificationCategory::Module).len(), 0);
    assert_eq!(
        manager
            .list_by_min_severity(NotificationSeverity::Error)
            .len(),
        2
    );

    let stats = manager.stats();
    assert_eq!(stats.total, 3);
    assert_eq!(stats.errors, 2);
}

#[test]
fn test_get_and_delete() {
    let manager = NotificationManager::new();
    let n = Notification::new(
        NotificationSeverity::Warning,
        "Unknown postfix directive 'blink'",
        NotificationCategory::Module,
    );
    let id = n.id.clone();
    manager.push(n);

    assert_eq!(manager.get(&id).unwrap().category, NotificationCategory::Module);
    manager.delete(&id).unwrap();
    assert!(manager.get(&id).is_err());
}

#[tokio::test]
async fn test_subscribers_receive_notifications() {
    let manager = NotificationManager::new();
    let mut rx = manager.subscribe();

    let sink: &dyn NotificationSink = &manager;
    sink.notify(
        NotificationSeverity::Error,
        "Device 7 has been reset locally",
        NotificationCategory::Connection,
    );

    let received = rx.recv().await.unwrap();
    assert_eq!(received.message, "Device 7 has been reset locally");
    assert_eq!(received.severity, NotificationSeverity::Error);
}
