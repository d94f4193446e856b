//! ---
//! aso_section: "04-observability"
//! aso_subsection: "tests"
//! aso_type: "source"
//! aso_scope: "test"
//! aso_description: "Scrape round trip against the /metrics exporter."
//! aso_version: "v0.0.0-prealpha"
//! aso_owner: "tbd"
//! ---
use std::net::SocketAddr;

use aso_metrics::prometheus::{IntCounter, Opts};
use aso_metrics::{new_registry, spawn_http_server};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn serves_registered_metrics() {
    let registry = new_registry();
    let counter = IntCounter::with_opts(Opts::new("aso_test_scrapes_total", "test counter"))
        .expect("counter");
    registry
        .register(Box::new(counter.clone()))
        .expect("register");
    counter.inc_by(3);

    let server = spawn_http_server(registry, SocketAddr::from(([127, 0, 0, 1], 0)))
        .expect("spawn exporter");
    let mut stream = TcpStream::connect(server.addr()).await.expect("connect");
    stream
        .write_all(b"GET /metrics HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .expect("send request");
    let mut response = String::new();
    stream
        .read_to_string(&mut response)
        .await
        .expect("read response");

    assert!(response.starts_with("HTTP/1.1 200"));
    assert!(response.contains("aso_test_scrapes_total 3"));
    server.shutdown().await.expect("shutdown");
}
