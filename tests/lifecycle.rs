//! End-to-end tests against a real listener, spoken to over raw HTTP/1.1.

use std::net::SocketAddr;
use std::time::Duration;

use tern::{Error, Logger, Method, Router, Server, ServiceConfig, State, StatusCode, Stop, handler_fn, middleware};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};

fn config(shutdown_timeout: Duration) -> ServiceConfig {
    ServiceConfig {
        address: "127.0.0.1:0".to_owned(),
        write_timeout: Duration::from_secs(10),
        shutdown_timeout,
        ..ServiceConfig::default()
    }
}

/// A router whose only route sleeps for `delay`, reporting entry on `entered`.
fn sleepy(delay: Duration, entered: mpsc::Sender<()>) -> Router {
    let log = Logger::detached();
    Router::with_middleware(log.clone(), [middleware::errors(log)]).on(
        Method::Get,
        "/slow",
        handler_fn(move |w, _req| {
            let entered = entered.clone();
            Box::pin(async move {
                let _ = entered.send(()).await;
                tokio::time::sleep(delay).await;
                w.text(StatusCode::OK, "done")?;
                Ok(())
            })
        }),
    )
}

async fn send(addr: SocketAddr, request: &str) -> std::io::Result<String> {
    let mut stream = TcpStream::connect(addr).await?;
    stream.write_all(request.as_bytes()).await?;
    let mut raw = Vec::new();
    stream.read_to_end(&mut raw).await?;
    Ok(String::from_utf8_lossy(&raw).into_owned())
}

fn get(path: &str) -> String {
    format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
}

#[tokio::test]
async fn serves_routes_and_translates_failures() {
    let log = Logger::detached();
    let app = Router::with_middleware(log.clone(), [middleware::logger(log.clone()), middleware::errors(log.clone())])
        .on(Method::Get, "/v1/items/{id}", handler_fn(|w, req| {
            Box::pin(async move {
                let id = req.param("id").unwrap_or_default().to_owned();
                if id == "0" {
                    return Err(tern::Failure::new("item not found", StatusCode::NOT_FOUND));
                }
                w.respond_json(&serde_json::json!({ "id": id }), StatusCode::OK)?;
                Ok(())
            })
        }));

    let listening = Server::new(config(Duration::from_secs(1)), log).start(app);
    let addr = listening.local_addr().await.unwrap();

    let ok = send(addr, &get("/v1/items/42")).await.unwrap();
    assert!(ok.starts_with("HTTP/1.1 200"), "{ok}");
    assert!(ok.ends_with(r#"{"id":"42"}"#), "{ok}");

    let missing = send(addr, &get("/v1/items/0")).await.unwrap();
    assert!(missing.starts_with("HTTP/1.1 404"), "{missing}");
    assert!(missing.ends_with(r#"{"error":"item not found"}"#), "{missing}");

    let unrouted = send(addr, &get("/v1/items")).await.unwrap();
    assert!(unrouted.starts_with("HTTP/1.1 404"), "{unrouted}");

    assert_eq!(listening.wait_for(async {}).await.unwrap(), Stop::Graceful);
}

#[tokio::test]
async fn graceful_shutdown_completes_in_flight_request() {
    let (entered_tx, mut entered) = mpsc::channel(1);
    let app = sleepy(Duration::from_millis(200), entered_tx);

    let listening = Server::new(config(Duration::from_secs(2)), Logger::detached()).start(app);
    let addr = listening.local_addr().await.unwrap();
    let state = listening.state();

    let client = tokio::spawn(async move { send(addr, &get("/slow")).await });
    entered.recv().await.unwrap();

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let waiting = tokio::spawn(listening.wait_for(async move {
        let _ = stop_rx.await;
    }));
    stop_tx.send(()).unwrap();

    let response = client.await.unwrap().unwrap();
    assert!(response.starts_with("HTTP/1.1 200"), "{response}");
    assert!(response.ends_with("done"), "{response}");

    assert_eq!(waiting.await.unwrap().unwrap(), Stop::Graceful);
    assert_eq!(*state.borrow(), State::Stopped);
}

#[tokio::test]
async fn new_connections_are_refused_after_shutdown() {
    let (entered_tx, _entered) = mpsc::channel(1);
    let listening = Server::new(config(Duration::from_secs(1)), Logger::detached())
        .start(sleepy(Duration::ZERO, entered_tx));
    let addr = listening.local_addr().await.unwrap();

    listening.wait_for(async {}).await.unwrap();

    assert!(TcpStream::connect(addr).await.is_err());
}

#[tokio::test]
async fn request_exceeding_shutdown_timeout_is_cut_off() {
    let (entered_tx, mut entered) = mpsc::channel(1);
    let app = sleepy(Duration::from_secs(5), entered_tx);

    let listening = Server::new(config(Duration::from_millis(100)), Logger::detached()).start(app);
    let addr = listening.local_addr().await.unwrap();

    let client = tokio::spawn(async move { send(addr, &get("/slow")).await });
    entered.recv().await.unwrap();

    let stop = listening.wait_for(async {}).await.unwrap();
    assert_eq!(stop, Stop::Forced { remaining: 1 });

    // The connection is closed without a response.
    let cut = tokio::time::timeout(Duration::from_secs(2), client).await.unwrap().unwrap();
    if let Ok(body) = cut {
        assert!(body.is_empty(), "unexpected response: {body}");
    }
}

#[tokio::test]
async fn stalled_body_is_answered_with_408() {
    let (entered_tx, _entered) = mpsc::channel(1);
    let cfg = ServiceConfig { read_timeout: Duration::from_millis(100), ..config(Duration::from_secs(1)) };
    let listening = Server::new(cfg, Logger::detached()).start(sleepy(Duration::ZERO, entered_tx));
    let addr = listening.local_addr().await.unwrap();

    // Announces ten bytes, sends three, then goes quiet.
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(b"POST /slow HTTP/1.1\r\nHost: localhost\r\nContent-Length: 10\r\n\r\nabc")
        .await
        .unwrap();

    let mut buf = [0u8; 256];
    let n = tokio::time::timeout(Duration::from_secs(2), stream.read(&mut buf)).await.unwrap().unwrap();
    let head = String::from_utf8_lossy(&buf[..n]);
    assert!(head.starts_with("HTTP/1.1 408"), "{head}");

    listening.wait_for(async {}).await.unwrap();
}

#[tokio::test]
async fn handler_past_write_timeout_gets_no_response() {
    let (entered_tx, _entered) = mpsc::channel(1);
    let cfg = ServiceConfig { write_timeout: Duration::from_millis(100), ..config(Duration::from_secs(1)) };
    let listening = Server::new(cfg, Logger::detached()).start(sleepy(Duration::from_millis(500), entered_tx));
    let addr = listening.local_addr().await.unwrap();

    let dropped = tokio::time::timeout(Duration::from_secs(2), send(addr, &get("/slow"))).await.unwrap();
    if let Ok(body) = dropped {
        assert!(body.is_empty(), "unexpected response: {body}");
    }

    listening.wait_for(async {}).await.unwrap();
}

/// Panics when dropped, as a connection's request state would if its
/// teardown went wrong.
struct PanicOnDrop;

impl Drop for PanicOnDrop {
    fn drop(&mut self) {
        panic!("connection state torn down mid-request");
    }
}

#[tokio::test]
async fn panic_while_force_closing_is_reported() {
    let (entered_tx, mut entered) = mpsc::channel(1);
    let log = Logger::detached();
    let app = Router::new(log).on(Method::Get, "/stuck", handler_fn(move |w, _req| {
        let entered = entered_tx.clone();
        Box::pin(async move {
            let _state = PanicOnDrop;
            let _ = entered.send(()).await;
            tokio::time::sleep(Duration::from_secs(5)).await;
            w.text(StatusCode::OK, "unreachable")?;
            Ok(())
        })
    }));

    let listening = Server::new(config(Duration::from_millis(100)), Logger::detached()).start(app);
    let addr = listening.local_addr().await.unwrap();
    let state = listening.state();

    let _client = tokio::spawn(async move { send(addr, &get("/stuck")).await });
    entered.recv().await.unwrap();

    let err = listening.wait_for(async {}).await.unwrap_err();

    assert!(matches!(err, Error::ForcedClose(_)), "unexpected error: {err}");
    assert_eq!(*state.borrow(), State::Failed);
}

#[tokio::test]
async fn bind_conflict_is_fatal() {
    let first = Server::new(config(Duration::from_secs(1)), Logger::detached()).start(Router::new(Logger::detached()));
    let addr = first.local_addr().await.unwrap();

    let clash = ServiceConfig { address: addr.to_string(), ..config(Duration::from_secs(1)) };
    let second = Server::new(clash, Logger::detached()).start(Router::new(Logger::detached()));

    let err = second.wait_for(std::future::pending()).await.unwrap_err();
    assert!(matches!(err, Error::Bind { .. }), "unexpected error: {err}");
    assert!(err.is_fatal());

    first.wait_for(async {}).await.unwrap();
}
