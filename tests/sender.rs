mod support;

use mailsender::{
    error::Error,
    models::message::MessageStatus,
    sender,
    smtp::{LocalSmtp, Transport},
    store,
};
use std::{sync::Arc, time::Duration};
use support::{sample_send_request, SmtpSink, TestDb};
use tokio::sync::watch;

const DOMAIN: &str = "local";

#[tokio::test]
async fn delivers_over_smtp_and_marks_sent() {
    let db = TestDb::new().await;
    let sink = SmtpSink::start().await;
    let transport = LocalSmtp::new("127.0.0.1", sink.port);

    let uids = store::enqueue(&db.pool, DOMAIN, &sample_send_request(0))
        .await
        .unwrap();
    let msg = store::dequeue(&db.pool).await.unwrap().unwrap();
    sender::send_message(&db.pool, &transport, &msg).await.unwrap();

    let received = sink.received();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].from, "admin@example.com");
    assert_eq!(received[0].rcpts, vec!["foo@example.com", "bar@example.com"]);
    assert!(received[0]
        .data
        .contains(&format!("Message-Id: <{}>\r\n", uids[0])));
    assert!(received[0].data.contains("This is a test mail body"));

    assert_eq!(db.status_of(&uids[0]).await, (MessageStatus::Sent.code(), None));
    assert_eq!(db.count("bodies").await, 0);
}

#[tokio::test]
async fn smtp_rejection_abandons_message() {
    let db = TestDb::new().await;
    let sink = SmtpSink::start().await;
    sink.fail_deliveries(true);
    let transport = LocalSmtp::new("127.0.0.1", sink.port);

    let uids = store::enqueue(&db.pool, DOMAIN, &sample_send_request(2))
        .await
        .unwrap();
    let msg = store::dequeue(&db.pool).await.unwrap().unwrap();
    sender::send_message(&db.pool, &transport, &msg).await.unwrap();

    let (status, err) = db.status_of(&uids[0]).await;
    assert_eq!(status, MessageStatus::Abandoned.code());
    assert!(err.unwrap().contains("simulated smtp error"));
    assert_eq!(db.count("bodies").await, 0);
}

#[tokio::test]
async fn unreachable_mta_abandons_message() {
    let db = TestDb::new().await;
    let port = {
        let l = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        l.local_addr().unwrap().port()
    };
    let transport = LocalSmtp::new("127.0.0.1", port);

    let uids = store::enqueue(&db.pool, DOMAIN, &sample_send_request(0))
        .await
        .unwrap();
    assert!(sender::send_next(&db.pool, &transport).await.unwrap());
    assert!(!sender::send_next(&db.pool, &transport).await.unwrap());

    let (status, err) = db.status_of(&uids[0]).await;
    assert_eq!(status, MessageStatus::Abandoned.code());
    assert!(err.is_some());
}

#[tokio::test]
async fn failed_abandon_is_combined_with_delivery_error() {
    let db = TestDb::new().await;
    let sink = SmtpSink::start().await;
    sink.fail_deliveries(true);
    let transport = LocalSmtp::new("127.0.0.1", sink.port);

    store::enqueue(&db.pool, DOMAIN, &sample_send_request(0))
        .await
        .unwrap();
    let msg = store::dequeue(&db.pool).await.unwrap().unwrap();
    db.pool.close().await;

    let err = sender::send_message(&db.pool, &transport, &msg)
        .await
        .unwrap_err();
    let Error::Combined(delivery, abandon) = &err else {
        panic!("expected both failures, got {err}");
    };
    assert!(matches!(**delivery, Error::Smtp(_)), "{delivery}");
    assert!(matches!(**abandon, Error::Db(_)), "{abandon}");
    let text = err.to_string();
    assert!(text.contains("simulated smtp error"), "{text}");
    assert!(text.contains("database error"), "{text}");
}

#[tokio::test]
async fn loop_drains_queue_and_stops() {
    let db = TestDb::new().await;
    let sink = SmtpSink::start().await;
    let transport: Arc<dyn Transport> = Arc::new(LocalSmtp::new("127.0.0.1", sink.port));

    let uids = store::enqueue(&db.pool, DOMAIN, &sample_send_request(1))
        .await
        .unwrap();
    let (stop, rx) = watch::channel(false);
    let handle = tokio::spawn(sender::run_sender_loop(db.pool.clone(), transport, rx));

    let mut sent = 0;
    for _ in 0..100 {
        tokio::time::sleep(Duration::from_millis(50)).await;
        sent = 0;
        for uid in &uids {
            if db.status_of(uid).await.0 == MessageStatus::Sent.code() {
                sent += 1;
            }
        }
        if sent == uids.len() {
            break;
        }
    }
    assert_eq!(sent, 2);
    assert_eq!(sink.received().len(), 2);

    stop.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("sender loop did not stop")
        .unwrap();
}
