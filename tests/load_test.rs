//! Concurrent sessions against one server.

use std::sync::Arc;
use std::time::{Duration, Instant};

use smtp_intake::config::DeliveryMode;
use smtp_intake::storage::MemoryStore;

mod common;
use common::{reply_code, start_server, test_config, SmtpClient};

async fn run_load(mode: DeliveryMode) {
    let mut config = test_config();
    config.rate_limit.max_connections_per_ip = 100;
    config.delivery.mode = mode;
    let store = Arc::new(MemoryStore::new());
    let server = start_server(config, store.clone()).await;

    let concurrency = 20;
    let messages_per_client = 10;
    let start = Instant::now();

    let mut tasks = Vec::new();
    for client_id in 0..concurrency {
        let addr = server.addr;
        tasks.push(tokio::spawn(async move {
            let mut client = SmtpClient::connect(addr).await;
            client.open_transaction(&format!("c{client_id}@x.com"), "sink@y.com").await;

            let mut accepted = 0;
            for n in 0..messages_per_client {
                let body = format!("Subject: {client_id}-{n}\r\n\r\nload\r\n");
                if reply_code(&client.send_data(&body).await) == 250 {
                    accepted += 1;
                }
                client.cmd(&format!("MAIL FROM:<c{client_id}@x.com>")).await;
                client.cmd("RCPT TO:<sink@y.com>").await;
            }
            client.cmd("QUIT").await;
            accepted
        }));
    }

    let mut accepted = 0;
    for task in tasks {
        accepted += task.await.unwrap();
    }
    let elapsed = start.elapsed();
    println!("{mode:?}: {accepted} messages in {elapsed:?}");

    server.stop().await.unwrap();

    assert_eq!(accepted, concurrency * messages_per_client);
    assert_eq!(store.len(), concurrency * messages_per_client);
    assert!(elapsed < Duration::from_secs(30));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_sessions_direct() {
    run_load(DeliveryMode::Direct).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_sessions_queued() {
    run_load(DeliveryMode::Queued).await;
}
