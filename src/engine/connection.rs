//! Engine connection supervision
//!
//! [`run_engine_supervisor`] keeps a transport connected for the lifetime of
//! the server. Each session is reported as `Connected`, the messages it
//! carried and `Disconnected`; after a session ends or a connect attempt
//! fails the supervisor waits a fixed interval and tries again.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, trace, warn};

use super::messages::{EngineMessage, EngineRequest};

/// What the supervisor reports to the service
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    Connected,
    Message(EngineMessage),
    Disconnected,
}

/// A way of reaching the engine
#[async_trait]
pub trait EngineTransport: Send + Sync {
    /// Opens a session; the stream ends when the session does
    async fn connect(&self) -> anyhow::Result<BoxStream<'static, EngineMessage>>;

    fn describe(&self) -> String;
}

/// Runs until `shutdown` fires or the event receiver goes away
pub async fn run_engine_supervisor(
    transport: Arc<dyn EngineTransport>,
    events: mpsc::Sender<EngineEvent>,
    reconnect_interval: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    info!("Engine supervisor started for {}", transport.describe());
    loop {
        let session = tokio::select! {
            _ = shutdown.recv() => break,
            session = transport.connect() => session,
        };

        match session {
            Ok(mut messages) => {
                info!("Connected to engine at {}", transport.describe());
                if events.send(EngineEvent::Connected).await.is_err() {
                    return;
                }
                loop {
                    let message = tokio::select! {
                        _ = shutdown.recv() => {
                            debug!("Engine supervisor received shutdown signal");
                            return;
                        }
                        message = messages.next() => message,
                    };
                    match message {
                        Some(message) => {
                            if events.send(EngineEvent::Message(message)).await.is_err() {
                                return;
                            }
                        }
                        None => break,
                    }
                }
                warn!("Engine connection lost, serving the last known type database");
                if events.send(EngineEvent::Disconnected).await.is_err() {
                    return;
                }
            }
            Err(e) => {
                debug!("Engine not reachable at {}: {:#}", transport.describe(), e);
            }
        }

        tokio::select! {
            _ = shutdown.recv() => break,
            _ = tokio::time::sleep(reconnect_interval) => {}
        }
    }
    debug!("Engine supervisor terminated");
}

/// Line-delimited JSON over TCP
#[derive(Debug, Clone)]
pub struct TcpJsonTransport {
    address: String,
}

impl TcpJsonTransport {
    pub fn new(address: impl Into<String>) -> Self {
        Self { address: address.into() }
    }
}

#[async_trait]
impl EngineTransport for TcpJsonTransport {
    async fn connect(&self) -> anyhow::Result<BoxStream<'static, EngineMessage>> {
        let stream = TcpStream::connect(&self.address)
            .await
            .with_context(|| format!("Failed to connect to {}", self.address))?;
        let (read_half, mut write_half) = stream.into_split();

        let mut request = serde_json::to_string(&EngineRequest::RequestDebugDatabase)?;
        request.push('\n');
        write_half.write_all(request.as_bytes()).await.context("Failed to request type database")?;

        let (tx, rx) = mpsc::channel::<EngineMessage>(256);
        tokio::spawn(async move {
            // Held so the peer does not see a half-closed socket
            let _write_half = write_half;
            let mut lines = BufReader::new(read_half).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) if line.trim().is_empty() => continue,
                    Ok(Some(line)) => match EngineMessage::decode(&line) {
                        Ok(message) => {
                            if tx.send(message).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => warn!("Skipping undecodable engine message: {}", e),
                    },
                    Ok(None) => break,
                    Err(e) => {
                        warn!("Engine read failed: {}", e);
                        break;
                    }
                }
            }
            trace!("Engine reader task terminated");
        });

        Ok(ReceiverStream::new(rx).boxed())
    }

    fn describe(&self) -> String {
        self.address.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::net::TcpListener;

    /// First attempt yields a short session, later attempts fail
    struct ScriptedTransport {
        attempts: AtomicUsize,
    }

    #[async_trait]
    impl EngineTransport for ScriptedTransport {
        async fn connect(&self) -> anyhow::Result<BoxStream<'static, EngineMessage>> {
            if self.attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                let messages = vec![
                    EngineMessage::TypeDump { fragment: serde_json::json!({}) },
                    EngineMessage::EndOfDump,
                ];
                Ok(futures::stream::iter(messages).boxed())
            } else {
                anyhow::bail!("engine offline")
            }
        }

        fn describe(&self) -> String {
            "scripted".into()
        }
    }

    #[tokio::test]
    async fn test_supervisor_reports_session_and_retries() {
        let transport = Arc::new(ScriptedTransport { attempts: AtomicUsize::new(0) });
        let (tx, mut rx) = mpsc::channel(16);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let handle = tokio::spawn(run_engine_supervisor(
            transport.clone(),
            tx,
            Duration::from_millis(5),
            shutdown_rx,
        ));

        assert_eq!(rx.recv().await, Some(EngineEvent::Connected));
        assert!(matches!(rx.recv().await, Some(EngineEvent::Message(EngineMessage::TypeDump { .. }))));
        assert_eq!(rx.recv().await, Some(EngineEvent::Message(EngineMessage::EndOfDump)));
        assert_eq!(rx.recv().await, Some(EngineEvent::Disconnected));

        while transport.attempts.load(Ordering::SeqCst) < 3 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        shutdown_tx.send(()).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_tcp_transport_requests_and_decodes_lines() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();

        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let (read_half, mut write_half) = socket.into_split();
            let mut lines = BufReader::new(read_half).lines();
            let request = lines.next_line().await.unwrap().unwrap();
            write_half
                .write_all(b"{\"type\":\"typeDump\",\"fragment\":{\"types\":[]}}\ngarbage\n{\"type\":\"endOfDump\"}\n")
                .await
                .unwrap();
            request
        });

        let transport = TcpJsonTransport::new(address);
        let messages: Vec<EngineMessage> = transport.connect().await.unwrap().collect().await;

        assert_eq!(server.await.unwrap(), r#"{"type":"requestDebugDatabase"}"#);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1], EngineMessage::EndOfDump);
    }
}
