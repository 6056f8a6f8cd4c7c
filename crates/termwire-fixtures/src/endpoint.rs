//! Stub terminal-streaming endpoints.
//!
//! Every endpoint binds `127.0.0.1:0`, serves any number of connections, and
//! records what clients send. Dropping the [`EndpointHandle`] stops the
//! listener and every open connection.

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::{JoinHandle, JoinSet};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

/// A message received from a client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Received {
    Binary(Vec<u8>),
    Text(String),
}

type Log = Arc<Mutex<Vec<Received>>>;

fn record(log: &Log, message: Received) {
    if let Ok(mut entries) = log.lock() {
        entries.push(message);
    }
}

/// A running stub endpoint.
pub struct EndpointHandle {
    addr: SocketAddr,
    received: Log,
    task: JoinHandle<()>,
}

impl EndpointHandle {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// `ws://` URL of the endpoint.
    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Everything received so far, across all connections, in arrival order.
    pub fn received(&self) -> Vec<Received> {
        self.received
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    pub fn received_binary(&self) -> Vec<Vec<u8>> {
        self.received()
            .into_iter()
            .filter_map(|message| match message {
                Received::Binary(bytes) => Some(bytes),
                Received::Text(_) => None,
            })
            .collect()
    }

    pub fn received_text(&self) -> Vec<String> {
        self.received()
            .into_iter()
            .filter_map(|message| match message {
                Received::Text(text) => Some(text),
                Received::Binary(_) => None,
            })
            .collect()
    }
}

impl Drop for EndpointHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn spawn_endpoint<F, Fut>(handler: F) -> io::Result<EndpointHandle>
where
    F: Fn(TcpStream, Log) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind(("127.0.0.1", 0)).await?;
    let addr = listener.local_addr()?;
    let received: Log = Arc::default();
    let log = Arc::clone(&received);
    let task = tokio::spawn(async move {
        // Dropping the set (when this task is aborted) aborts every connection.
        let mut connections = JoinSet::new();
        while let Ok((stream, _peer)) = listener.accept().await {
            connections.spawn(handler(stream, Arc::clone(&log)));
        }
    });
    Ok(EndpointHandle {
        addr,
        received,
        task,
    })
}

/// Echoes every binary message back verbatim as exactly one binary frame.
///
/// A text message of the form `{"type":"resize","cols":C,"rows":R}` is
/// answered with a `{"type":"resize_ack",...}` text message, which a
/// well-behaved client ignores.
pub struct EchoEndpoint;

impl EchoEndpoint {
    pub async fn spawn() -> io::Result<EndpointHandle> {
        spawn_endpoint(echo_connection).await
    }
}

async fn echo_connection(stream: TcpStream, log: Log) {
    let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
        return;
    };
    while let Some(Ok(message)) = ws.next().await {
        let reply = match message {
            Message::Binary(bytes) => {
                record(&log, Received::Binary(bytes.to_vec()));
                Some(Message::Binary(bytes))
            }
            Message::Text(text) => {
                record(&log, Received::Text(text.as_str().to_owned()));
                resize_ack(text.as_str()).map(Message::text)
            }
            // Close replies are queued by tungstenite and flushed on the next poll.
            _ => None,
        };
        if let Some(reply) = reply {
            if ws.send(reply).await.is_err() {
                break;
            }
        }
    }
}

fn resize_ack(text: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(text).ok()?;
    if value.get("type")?.as_str()? != "resize" {
        return None;
    }
    let ack = serde_json::json!({
        "type": "resize_ack",
        "cols": value.get("cols")?,
        "rows": value.get("rows")?,
    });
    Some(ack.to_string())
}

/// What a [`ScriptedEndpoint`] does after sending its chunks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AfterScript {
    /// Keep the connection open until the client closes it.
    Hold,
    /// Send a close frame, then wait for the client to finish.
    Close,
    /// Drop the TCP connection without a closing handshake.
    Drop,
}

/// Sends a fixed sequence of binary chunks to each client as soon as it
/// connects, regardless of what the client sends.
#[derive(Clone, Debug)]
pub struct ScriptedEndpoint {
    chunks: Vec<Vec<u8>>,
    gap: Duration,
    after: AfterScript,
    noise: bool,
}

impl ScriptedEndpoint {
    pub fn new<I, C>(chunks: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<Vec<u8>>,
    {
        Self {
            chunks: chunks.into_iter().map(Into::into).collect(),
            gap: Duration::from_millis(10),
            after: AfterScript::Hold,
            noise: false,
        }
    }

    /// Pause between consecutive chunks.
    #[must_use]
    pub fn gap(mut self, gap: Duration) -> Self {
        self.gap = gap;
        self
    }

    #[must_use]
    pub fn after(mut self, after: AfterScript) -> Self {
        self.after = after;
        self
    }

    /// Precede every chunk with a text message and a ping.
    #[must_use]
    pub fn with_noise(mut self) -> Self {
        self.noise = true;
        self
    }

    pub async fn spawn(self) -> io::Result<EndpointHandle> {
        spawn_endpoint(move |stream, log| scripted_connection(stream, log, self.clone())).await
    }
}

async fn scripted_connection(stream: TcpStream, log: Log, script: ScriptedEndpoint) {
    let Ok(ws) = tokio_tungstenite::accept_async(stream).await else {
        return;
    };
    let (mut sink, mut source) = ws.split();
    match script.after {
        AfterScript::Hold => {
            let _ = tokio::join!(
                send_script(&mut sink, &script),
                record_incoming(&mut source, &log)
            );
        }
        AfterScript::Close => {
            let writer = async {
                let _ = send_script(&mut sink, &script).await;
                let _ = sink.close().await;
            };
            tokio::join!(writer, record_incoming(&mut source, &log));
        }
        AfterScript::Drop => {
            tokio::select! {
                _ = send_script(&mut sink, &script) => {}
                () = record_incoming(&mut source, &log) => {}
            }
        }
    }
}

async fn send_script<S>(sink: &mut S, script: &ScriptedEndpoint) -> Result<(), WsError>
where
    S: Sink<Message, Error = WsError> + Unpin,
{
    for (index, chunk) in script.chunks.iter().enumerate() {
        if index > 0 {
            tokio::time::sleep(script.gap).await;
        }
        if script.noise {
            let status = serde_json::json!({ "type": "status", "note": "noise" });
            sink.send(Message::text(status.to_string())).await?;
            sink.send(Message::Ping(b"noise".to_vec().into())).await?;
        }
        sink.send(Message::binary(chunk.clone())).await?;
    }
    Ok(())
}

async fn record_incoming<S>(source: &mut S, log: &Log)
where
    S: Stream<Item = Result<Message, WsError>> + Unpin,
{
    while let Some(Ok(message)) = source.next().await {
        match message {
            Message::Binary(bytes) => record(log, Received::Binary(bytes.to_vec())),
            Message::Text(text) => record(log, Received::Text(text.as_str().to_owned())),
            _ => {}
        }
    }
}

/// Accepts TCP connections but never completes the WebSocket handshake.
pub struct StalledEndpoint;

impl StalledEndpoint {
    pub async fn spawn() -> io::Result<EndpointHandle> {
        spawn_endpoint(|stream, _log| async move {
            let _held = stream;
            std::future::pending::<()>().await;
        })
        .await
    }
}
