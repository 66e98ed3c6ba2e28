use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::{sink, stream};
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::core::connection::{ConnectionError, Connector, Transport};

/// In-memory [`Connector`]. Every successful connect hands the server side
/// of the link to the test through the peers channel.
pub struct FakeConnector {
    peers: mpsc::UnboundedSender<FakePeer>,
    refuse: AtomicBool,
    attempts: AtomicUsize,
}

impl FakeConnector {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<FakePeer>) {
        let (peers, rx) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            peers,
            refuse: AtomicBool::new(false),
            attempts: AtomicUsize::new(0),
        });
        (connector, rx)
    }

    pub fn set_refusing(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(&self, url: &str) -> Result<Transport, ConnectionError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.refuse.load(Ordering::SeqCst) {
            return Err(ConnectionError::Connect("connection refused".into()));
        }

        let (client_tx, from_client) = mpsc::unbounded_channel::<String>();
        let (to_client, client_rx) = mpsc::unbounded_channel::<Result<String, ConnectionError>>();

        let sink = sink::unfold(
            client_tx,
            |tx: mpsc::UnboundedSender<String>, text: String| async move {
                tx.send(text).map(|()| tx).map_err(|_| ConnectionError::Closed)
            },
        );
        let stream = stream::unfold(client_rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        });

        self.peers
            .send(FakePeer {
                url: url.to_string(),
                from_client,
                to_client,
            })
            .map_err(|_| ConnectionError::Connect("test harness gone".into()))?;

        Ok(Transport {
            sink: Box::pin(sink),
            stream: Box::pin(stream),
        })
    }
}

/// Server side of a fake link. Dropping it closes the link.
pub struct FakePeer {
    pub url: String,
    pub from_client: mpsc::UnboundedReceiver<String>,
    pub to_client: mpsc::UnboundedSender<Result<String, ConnectionError>>,
}

impl FakePeer {
    /// Next frame the client sent, or `None` once the client hung up.
    pub async fn next_sent(&mut self) -> Option<String> {
        self.from_client.recv().await
    }

    pub fn push(&self, frame: &str) {
        let _ = self.to_client.send(Ok(frame.to_string()));
    }

    pub fn push_value(&self, frame: Value) {
        self.push(&frame.to_string());
    }

    pub fn push_entities(&self, entities: Value) {
        self.push_value(serde_json::json!({
            "type": "entities_extracted",
            "data": {"entities_extracted": entities}
        }));
    }

    pub fn fail(&self, error: ConnectionError) {
        let _ = self.to_client.send(Err(error));
    }
}

/// Request captured by [`serve_once`].
#[derive(Debug)]
pub struct CapturedRequest {
    pub request_line: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

/// Answer exactly one HTTP request on a loopback port with `status` and
/// `body`. Returns the base URL and a handle resolving to what was received.
pub async fn serve_once(
    status: u16,
    body: &str,
) -> (String, JoinHandle<Result<CapturedRequest, String>>) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("listener should bind");
    let addr = listener.local_addr().expect("local addr should resolve");
    let body = body.to_string();

    let handle = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.map_err(|err| err.to_string())?;
        let captured = read_http_request(&mut stream).await?;
        let response = format!(
            "HTTP/1.1 {status} {}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
            reason_phrase(status),
            body.len()
        );
        stream
            .write_all(response.as_bytes())
            .await
            .map_err(|err| err.to_string())?;
        let _ = stream.shutdown().await;
        Ok(captured)
    });

    (format!("http://{addr}"), handle)
}

/// Client that ignores proxy settings from the environment.
pub fn direct_client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .build()
        .expect("client should build")
}

fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        404 => "Not Found",
        422 => "Unprocessable Entity",
        500 => "Internal Server Error",
        _ => "Status",
    }
}

async fn read_http_request(stream: &mut TcpStream) -> Result<CapturedRequest, String> {
    let mut buffer = Vec::new();
    let mut header_end = None;
    while header_end.is_none() {
        let mut chunk = [0_u8; 1024];
        let read = stream
            .read(&mut chunk)
            .await
            .map_err(|err| err.to_string())?;
        if read == 0 {
            return Err("Unexpected EOF while reading HTTP headers".to_string());
        }
        buffer.extend_from_slice(&chunk[..read]);
        header_end = buffer
            .windows(4)
            .position(|window| window == b"\r\n\r\n")
            .map(|index| index + 4);
    }

    let header_end = header_end.expect("header end should exist");
    let header_text =
        std::str::from_utf8(&buffer[..header_end]).map_err(|err| err.to_string())?;
    let mut lines = header_text.split("\r\n").filter(|line| !line.is_empty());
    let request_line = lines
        .next()
        .ok_or_else(|| "Missing HTTP request line".to_string())?
        .to_string();

    let mut headers = Vec::new();
    let mut content_length = 0_usize;
    for line in lines {
        let mut parts = line.splitn(2, ':');
        let Some(name) = parts.next() else {
            continue;
        };
        let value = parts.next().unwrap_or_default().trim().to_string();
        if name.eq_ignore_ascii_case("content-length") {
            content_length = value.parse::<usize>().map_err(|err| err.to_string())?;
        }
        headers.push((name.to_string(), value));
    }

    let mut body = buffer[header_end..].to_vec();
    while body.len() < content_length {
        let mut chunk = vec![0_u8; content_length - body.len()];
        let read = stream
            .read(&mut chunk)
            .await
            .map_err(|err| err.to_string())?;
        if read == 0 {
            return Err("Unexpected EOF while reading HTTP body".to_string());
        }
        body.extend_from_slice(&chunk[..read]);
    }
    body.truncate(content_length);

    Ok(CapturedRequest {
        request_line,
        headers,
        body,
    })
}
