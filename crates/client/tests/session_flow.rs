//! End-to-end session flow over the in-memory transport.

use std::sync::Arc;

use replkit_client::{Error, FakeTransport, Session};
use serde_json::json;

#[tokio::test]
async fn write_batch_then_snapshot_then_close() {
    let (transport, controller) = FakeTransport::new();
    let session = Session::with_transport(Arc::new(transport), "tok".to_string());

    session.write("src/a.py", b"a = 1").await.unwrap();
    session.write("src/b.py", b"b = 2").await.unwrap();
    session.snapshot().await.unwrap();

    let writes = controller.sent_bodies("files");
    assert_eq!(writes.len(), 2);
    assert_eq!(writes[0]["write"]["path"], "src/a.py");
    assert_eq!(writes[1]["write"]["path"], "src/b.py");
    assert_eq!(
        controller.sent_bodies("snapshot"),
        vec![json!({"fsSnapshot": {}})]
    );
    // One channel each despite repeated use.
    assert_eq!(controller.open_count("files"), 1);
    assert_eq!(controller.open_count("snapshot"), 1);

    let files = session.channel("files").await.unwrap();
    session.close().await;
    session.close().await; // close is idempotent

    let result = files.request(json!({"read": {"path": "src/a.py"}})).await;
    assert!(matches!(result, Err(Error::ConnectionClosed)));
}

#[tokio::test]
async fn remote_error_reply_surfaces_to_caller() {
    let (transport, controller) = FakeTransport::new();
    let session = Session::with_transport(Arc::new(transport), "tok".to_string());

    controller.queue_reply("files", json!({"error": "no such file"}));

    match session.read("missing.py").await {
        Err(Error::Channel(message)) => assert_eq!(message, "no such file"),
        other => panic!("expected channel error, got {other:?}"),
    }
}
