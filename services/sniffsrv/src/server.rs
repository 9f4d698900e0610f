//! TCP listener and per-connection workers
//!
//! The bridge connects as a client and streams raw RTU bytes. Each connection
//! gets its own task and its own `FrameExtractor`; the engine is shared.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::config::SnifferConfig;
use crate::error::{Result, SniffSrvError};
use crate::protocols::modbus::{FrameExtractor, FrameLimits, RawFrame};
use crate::publisher::{dispatch, Publisher};
use crate::sniffer::{SharedEngine, SnifferEngine};

/// Pause after a failed accept before trying again
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Reads one connection and feeds its frames to the engine
pub struct ConnectionWorker {
    peer: SocketAddr,
    extractor: FrameExtractor,
    engine: SharedEngine,
    publisher: Arc<dyn Publisher>,
    read_buffer_size: usize,
}

impl ConnectionWorker {
    pub fn new(
        peer: SocketAddr,
        limits: FrameLimits,
        engine: SharedEngine,
        publisher: Arc<dyn Publisher>,
        read_buffer_size: usize,
    ) -> Self {
        Self {
            peer,
            extractor: FrameExtractor::new(limits),
            engine,
            publisher,
            read_buffer_size: read_buffer_size.max(1),
        }
    }

    /// Process one chunk of received bytes; returns the number of frames handled
    pub fn ingest(&mut self, data: &[u8], now: Instant) -> usize {
        let mut handled = 0;
        for bytes in self.extractor.extract(data) {
            let frame = match RawFrame::parse(bytes, now) {
                Ok(frame) => frame,
                Err(e) => {
                    warn!("{}: extracted frame rejected: {}", self.peer, e);
                    continue;
                },
            };
            trace!("{}: frame {}", self.peer, common::hex::encode_spaced(frame.as_bytes()));

            let outcome = self.engine.lock().process_frame(frame);
            dispatch(self.publisher.as_ref(), &outcome);
            handled += 1;
        }
        handled
    }

    pub async fn run(mut self, mut stream: TcpStream, shutdown: CancellationToken) {
        let mut buf = vec![0u8; self.read_buffer_size];

        loop {
            tokio::select! {
                () = shutdown.cancelled() => {
                    debug!("{}: shutdown requested", self.peer);
                    break;
                }
                read = stream.read(&mut buf) => match read {
                    Ok(0) => {
                        info!("{}: connection closed by peer", self.peer);
                        break;
                    }
                    Ok(n) => {
                        trace!("{}: RX {} bytes", self.peer, n);
                        self.ingest(&buf[..n], Instant::now());
                    }
                    Err(e) => {
                        warn!("{}: read failed: {}", self.peer, e);
                        break;
                    }
                }
            }
        }

        let stats = self.extractor.stats();
        info!(
            "{}: worker finished ({} frames, {} noise bytes, {} bytes dropped in {} cleanups, {} left buffered)",
            self.peer,
            stats.frames,
            stats.noise_bytes,
            stats.dropped_bytes,
            stats.cleanups,
            self.extractor.buffered().len()
        );
    }
}

/// Accepts bridge connections and spawns a worker for each
pub struct SnifferServer {
    engine: SharedEngine,
    publisher: Arc<dyn Publisher>,
    limits: FrameLimits,
    read_buffer_size: usize,
}

impl SnifferServer {
    pub fn new(
        engine: SharedEngine,
        publisher: Arc<dyn Publisher>,
        limits: FrameLimits,
        read_buffer_size: usize,
    ) -> Self {
        Self {
            engine,
            publisher,
            limits,
            read_buffer_size,
        }
    }

    /// Build the engine from a validated configuration
    pub fn from_config(config: &SnifferConfig, publisher: Arc<dyn Publisher>) -> Result<Self> {
        let registers = Arc::new(config.decoder.build_register_map()?);
        let engine = SnifferEngine::new(registers, config.stats.publish_interval).shared();
        Ok(Self::new(
            engine,
            publisher,
            config.framing,
            config.server.read_buffer_size,
        ))
    }

    pub async fn bind(addr: SocketAddr) -> Result<TcpListener> {
        TcpListener::bind(addr)
            .await
            .map_err(|e| SniffSrvError::io(format!("Failed to bind {}: {}", addr, e)))
    }

    pub fn engine(&self) -> &SharedEngine {
        &self.engine
    }

    /// Accept connections until `shutdown` fires, then wait for the workers
    pub async fn run(&self, listener: TcpListener, shutdown: CancellationToken) -> Result<()> {
        let local = listener.local_addr()?;
        info!("Sniffer listening on {}", local);

        let mut workers = JoinSet::new();
        loop {
            tokio::select! {
                () = shutdown.cancelled() => {
                    info!("Shutdown requested, no longer accepting connections");
                    break;
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        info!("Connection from {}", peer);
                        let worker = ConnectionWorker::new(
                            peer,
                            self.limits,
                            Arc::clone(&self.engine),
                            Arc::clone(&self.publisher),
                            self.read_buffer_size,
                        );
                        workers.spawn(worker.run(stream, shutdown.child_token()));
                    }
                    Err(e) => {
                        warn!("Accept failed: {}", e);
                        tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
                    }
                },
                Some(joined) = workers.join_next(), if !workers.is_empty() => {
                    if let Err(e) = joined {
                        error!("Connection worker failed: {}", e);
                    }
                }
            }
        }

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                error!("Connection worker failed: {}", e);
            }
        }

        let snapshot = self.engine.lock().snapshot();
        info!(
            "Sniffer stopped: {} frames, {} valid, {} errors",
            snapshot.global.counters.total_frames,
            snapshot.global.counters.valid_frames,
            snapshot.global.counters.errors
        );
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::protocols::modbus::crc;
    use crate::publisher::{ChannelPublisher, PublishEvent};
    use crate::sniffer::RegisterMap;

    fn with_crc(body: &[u8]) -> Vec<u8> {
        let mut v = body.to_vec();
        crc::append(&mut v);
        v
    }

    fn worker() -> (ConnectionWorker, tokio::sync::mpsc::UnboundedReceiver<PublishEvent>) {
        let engine = SnifferEngine::new(Arc::new(RegisterMap::heat_pump()), 50).shared();
        let (publisher, rx) = ChannelPublisher::new();
        let worker = ConnectionWorker::new(
            "127.0.0.1:9".parse().unwrap(),
            FrameLimits::default(),
            engine,
            Arc::new(publisher),
            1024,
        );
        (worker, rx)
    }

    #[test]
    fn test_ingest_two_frames_in_one_chunk() {
        let (mut worker, mut rx) = worker();
        let mut chunk = with_crc(&[0x01, 0x04, 0x08, 0x34, 0x00, 0x02]);
        chunk.extend(with_crc(&[0x01, 0x04, 0x04, 0x00, 0xE6, 0x00, 0x7D]));

        assert_eq!(worker.ingest(&chunk, Instant::now()), 2);
        assert!(matches!(rx.try_recv().unwrap(), PublishEvent::Frame(_)));
        match rx.try_recv().unwrap() {
            PublishEvent::Readings(r) => {
                assert_eq!(r.readings[0].name, "Compressor AC Voltage");
                assert_eq!(r.readings[1].name, "Compressor AC Current");
            },
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_ingest_split_frame() {
        let (mut worker, mut rx) = worker();
        let frame = with_crc(&[0x01, 0x03, 0x08, 0x34, 0x00, 0x02]);
        assert_eq!(worker.ingest(&frame[..3], Instant::now()), 0);
        assert_eq!(worker.ingest(&frame[3..], Instant::now()), 1);
        assert!(matches!(rx.try_recv().unwrap(), PublishEvent::Frame(_)));
    }

    #[tokio::test]
    async fn test_run_stops_on_cancel() {
        let engine = SnifferEngine::new(Arc::new(RegisterMap::heat_pump()), 50).shared();
        let (publisher, _rx) = ChannelPublisher::new();
        let server = SnifferServer::new(engine, Arc::new(publisher), FrameLimits::default(), 1024);
        let listener = SnifferServer::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();

        let token = CancellationToken::new();
        token.cancel();
        tokio::time::timeout(Duration::from_secs(5), server.run(listener, token))
            .await
            .unwrap()
            .unwrap();
    }
}
