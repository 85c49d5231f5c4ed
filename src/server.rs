//! HTTP server wiring: the socket endpoint upgrade and the plain-HTTP
//! fallback render.
//!
//! One task is spawned per accepted TCP connection; a connection that
//! upgrades at the scope's endpoint becomes a live session, anything else is
//! answered over http1. Session faults are isolated per connection.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use futures_util::StreamExt;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{header, Method, Request, Response, StatusCode};
use hyper_tungstenite::HyperWebsocket;
use hyper_util::rt::TokioIo;
use indexmap::IndexMap;
use tokio::net::TcpListener;
use tungstenite::Message;

use crate::error::LiveError;
use crate::protocol::Connect;
use crate::session::ViewSession;
use crate::view::{LiveContext, LiveScope};

/// The server: a [`LiveScope`] routing table plus an accept loop.
pub struct LiveServer {
    scope: Arc<LiveScope>,
}

impl LiveServer {
    pub fn new(scope: LiveScope) -> Self {
        Self {
            scope: Arc::new(scope),
        }
    }

    /// Bind `addr` and serve until the process exits.
    pub async fn serve(self, addr: SocketAddr) -> Result<(), LiveError> {
        let listener = TcpListener::bind(addr).await?;
        println!("[live] listening on http://{addr}");
        self.serve_on(listener).await
    }

    /// Serve on an already-bound listener.
    pub async fn serve_on(self, listener: TcpListener) -> Result<(), LiveError> {
        loop {
            let (stream, peer) = listener.accept().await?;
            let scope = self.scope.clone();

            tokio::spawn(async move {
                let io = TokioIo::new(stream);
                let service =
                    service_fn(move |req| handle_request(req, scope.clone()));

                if let Err(e) = http1::Builder::new()
                    .serve_connection(io, service)
                    .with_upgrades()
                    .await
                {
                    eprintln!("[live] connection error from {peer}: {e}");
                }
            });
        }
    }
}

async fn handle_request(
    mut req: Request<Incoming>,
    scope: Arc<LiveScope>,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    let path = req.uri().path().to_string();

    if hyper_tungstenite::is_upgrade_request(&req) {
        if path != scope.endpoint() {
            return Ok(plain(StatusCode::NOT_FOUND, "no such socket endpoint"));
        }

        let (response, websocket) = match hyper_tungstenite::upgrade(&mut req, None) {
            Ok(result) => result,
            Err(e) => {
                eprintln!("[live] upgrade error: {e}");
                return Ok(plain(StatusCode::BAD_REQUEST, "websocket upgrade failed"));
            }
        };

        tokio::spawn(handle_socket(websocket, scope));
        return Ok(response);
    }

    if req.method() != Method::GET {
        return Ok(plain(StatusCode::METHOD_NOT_ALLOWED, "method not allowed"));
    }

    match scope.resolve(&path) {
        Some(route) => {
            let parameters = parse_query(req.uri().query().unwrap_or(""));
            let ctx = LiveContext::new(false, parameters);
            let mut instance = route.instantiate(&ctx);
            instance.mount();
            let content = instance.render();

            Ok(Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, "text/html; charset=utf-8")
                .body(Full::new(Bytes::from(content)))
                .unwrap())
        }
        None => Ok(plain(StatusCode::NOT_FOUND, "not found")),
    }
}

/// Complete the upgrade, run the connect handshake, and drive the session.
async fn handle_socket(websocket: HyperWebsocket, scope: Arc<LiveScope>) {
    let mut socket = match websocket.await {
        Ok(ws) => ws,
        Err(e) => {
            eprintln!("[live] websocket handshake error: {e}");
            return;
        }
    };

    // The first text frame must be the connect handshake.
    let connect = loop {
        match socket.next().await {
            None | Some(Ok(Message::Close(_))) => return,
            Some(Err(e)) => {
                eprintln!("[live] transport error before handshake: {e}");
                return;
            }
            Some(Ok(Message::Text(text))) => match Connect::decode(&text) {
                Ok(connect) => break connect,
                Err(e) => {
                    eprintln!("[live] bad handshake: {e}");
                    let _ = socket.close(None).await;
                    return;
                }
            },
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
            Some(Ok(_)) => {
                eprintln!("[live] bad handshake: {}", LiveError::BinaryFrame);
                let _ = socket.close(None).await;
                return;
            }
        }
    };

    let Some(route) = scope.resolve(&connect.path) else {
        // Fatal to the session, closed immediately, never retried; no
        // render is ever sent.
        eprintln!("[live] {}", LiveError::UnknownPath(connect.path));
        let _ = socket.close(None).await;
        return;
    };

    let path = connect.path.clone();
    let ctx = LiveContext::new(true, connect.parameters);
    let instance = route.instantiate(&ctx);
    let session = ViewSession::new(socket, instance, scope.render_delay());
    let id = session.id();

    eprintln!("[live] session {id} joined {path}");
    match session.run().await {
        Ok(()) => eprintln!("[live] session {id} closed"),
        Err(e) => eprintln!("[live] session {id} failed: {e}"),
    }
}

fn plain(status: StatusCode, body: &'static str) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .body(Full::new(Bytes::from(body)))
        .unwrap()
}

/// Minimal query-string parsing: `a=1&b=two`, `+` and `%XX` decoded.
fn parse_query(query: &str) -> IndexMap<String, String> {
    let mut parameters = IndexMap::new();
    for pair in query.split('&') {
        if pair.is_empty() {
            continue;
        }
        let (key, value) = match pair.split_once('=') {
            Some((key, value)) => (key, value),
            None => (pair, ""),
        };
        parameters.insert(percent_decode(key), percent_decode(value));
    }
    parameters
}

fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => out.push(b' '),
            b'%' => match (hex(bytes.get(i + 1)), hex(bytes.get(i + 2))) {
                (Some(hi), Some(lo)) => {
                    out.push(hi * 16 + lo);
                    i += 2;
                }
                _ => out.push(b'%'),
            },
            b => out.push(b),
        }
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex(byte: Option<&u8>) -> Option<u8> {
    byte.and_then(|b| (*b as char).to_digit(16)).map(|d| d as u8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::OperationRegistry;
    use crate::protocol::{ClientEvent, ServerUpdate};
    use crate::state::ReactiveState;
    use crate::view::LiveView;
    use futures_util::SinkExt;
    use pretty_assertions::assert_eq;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;
    use tokio::time::timeout;

    struct Counter;

    impl LiveView for Counter {
        fn operations(&self, ops: &mut OperationRegistry) {
            ops.register("increment", |state| {
                let count = state.get_i64("count").unwrap_or(0);
                state.set("count", count + 1);
            });
        }

        fn render(&self, state: &ReactiveState) -> String {
            format!("<p>Count = {}</p>", state.get_i64("count").unwrap_or(0))
        }
    }

    fn counter_scope() -> LiveScope {
        let mut scope = LiveScope::new();
        scope.view(
            "/counter",
            || Counter,
            |ctx| {
                let initial = ctx
                    .parameter("initial")
                    .and_then(|v| v.parse::<i64>().ok())
                    .unwrap_or(0);
                ReactiveState::new().with("count", initial)
            },
        );
        scope
    }

    async fn start() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(LiveServer::new(counter_scope()).serve_on(listener));
        addr
    }

    async fn raw_get(addr: SocketAddr, target: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let request =
            format!("GET {target} HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\r\n");
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut response = Vec::new();
        stream.read_to_end(&mut response).await.unwrap();
        String::from_utf8_lossy(&response).into_owned()
    }

    #[test]
    fn query_parsing() {
        let params = parse_query("initial=5&name=ada+l&pct=%2F");
        assert_eq!(params.get("initial").map(String::as_str), Some("5"));
        assert_eq!(params.get("name").map(String::as_str), Some("ada l"));
        assert_eq!(params.get("pct").map(String::as_str), Some("/"));
        assert!(parse_query("").is_empty());
    }

    #[tokio::test]
    async fn http_fallback_renders_the_initial_document() {
        let addr = start().await;
        let response = raw_get(addr, "/counter?initial=5").await;

        assert!(response.starts_with("HTTP/1.1 200 OK"), "{response}");
        assert!(response.contains("text/html; charset=utf-8"), "{response}");
        assert!(response.contains("<p>Count = 5</p>"), "{response}");
    }

    #[tokio::test]
    async fn http_unknown_path_is_404() {
        let addr = start().await;
        let response = raw_get(addr, "/missing").await;
        assert!(response.starts_with("HTTP/1.1 404"), "{response}");
    }

    #[tokio::test]
    async fn live_session_over_a_real_upgrade() {
        let addr = start().await;
        let stream = TcpStream::connect(addr).await.unwrap();
        let (mut socket, _) =
            tokio_tungstenite::client_async(format!("ws://{addr}/live"), stream)
                .await
                .unwrap();

        let connect = Connect::new("/counter").parameter("initial", "5");
        socket
            .send(Message::Text(connect.encode().unwrap()))
            .await
            .unwrap();

        let first = next_render(&mut socket).await;
        assert_eq!(first, "<p>Count = 5</p>");

        let invoke = ClientEvent::Invoke {
            identifier: "increment".to_string(),
        };
        socket
            .send(Message::Text(invoke.encode().unwrap()))
            .await
            .unwrap();
        assert_eq!(next_render(&mut socket).await, "<p>Count = 6</p>");

        socket.close(None).await.unwrap();
    }

    #[tokio::test]
    async fn handshake_to_unregistered_path_closes_without_a_render() {
        let addr = start().await;
        let stream = TcpStream::connect(addr).await.unwrap();
        let (mut socket, _) =
            tokio_tungstenite::client_async(format!("ws://{addr}/live"), stream)
                .await
                .unwrap();

        socket
            .send(Message::Text(Connect::new("/missing").encode().unwrap()))
            .await
            .unwrap();

        // The connection closes; no text frame ever arrives.
        let saw_text = timeout(Duration::from_secs(2), async {
            while let Some(frame) = socket.next().await {
                if matches!(frame, Ok(Message::Text(_))) {
                    return true;
                }
            }
            false
        })
        .await
        .unwrap();
        assert!(!saw_text);
    }

    #[tokio::test]
    async fn upgrade_on_a_non_endpoint_path_is_404() {
        let addr = start().await;
        let stream = TcpStream::connect(addr).await.unwrap();
        let result =
            tokio_tungstenite::client_async(format!("ws://{addr}/counter"), stream).await;
        assert!(result.is_err());
    }

    async fn next_render<S>(socket: &mut tokio_tungstenite::WebSocketStream<S>) -> String
    where
        S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
    {
        loop {
            let frame = timeout(Duration::from_secs(2), socket.next())
                .await
                .expect("timed out waiting for a frame")
                .expect("stream ended while waiting for a render")
                .expect("transport error");
            if let Message::Text(text) = frame {
                match ServerUpdate::decode(&text).expect("undecodable update") {
                    ServerUpdate::Render { html } => return html,
                }
            }
        }
    }
}
