//! End-to-end tests: a fake bridge connects over loopback TCP and streams raw
//! RTU bytes; events are observed through `ChannelPublisher`.

#![allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable

use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use sniffsrv::protocols::modbus::{crc, FrameKind};
use sniffsrv::sniffer::{ReadingValue, SharedEngine};
use sniffsrv::{ChannelPublisher, PublishEvent, SnifferConfig, SnifferServer};

struct Harness {
    addr: std::net::SocketAddr,
    engine: SharedEngine,
    events: UnboundedReceiver<PublishEvent>,
    shutdown: CancellationToken,
    handle: JoinHandle<sniffsrv::Result<()>>,
}

async fn start(config: SnifferConfig) -> Harness {
    let (publisher, events) = ChannelPublisher::new();
    let server = SnifferServer::from_config(&config, Arc::new(publisher)).unwrap();
    let engine = Arc::clone(server.engine());
    let listener = SnifferServer::bind("127.0.0.1:0".parse().unwrap())
        .await
        .unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = CancellationToken::new();
    let token = shutdown.clone();
    let handle = tokio::spawn(async move { server.run(listener, token).await });

    Harness {
        addr,
        engine,
        events,
        shutdown,
        handle,
    }
}

impl Harness {
    async fn next_event(&mut self) -> PublishEvent {
        tokio::time::timeout(Duration::from_secs(5), self.events.recv())
            .await
            .expect("timed out waiting for event")
            .expect("publisher channel closed")
    }

    async fn stop(self) {
        self.shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(5), self.handle)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }
}

fn with_crc(body: &[u8]) -> Vec<u8> {
    let mut v = body.to_vec();
    crc::append(&mut v);
    v
}

/// Read input registers 2100..2101
fn voltage_request() -> Vec<u8> {
    with_crc(&[0x01, 0x04, 0x08, 0x34, 0x00, 0x02])
}

/// 230 V, 12.5 A
fn voltage_response() -> Vec<u8> {
    with_crc(&[0x01, 0x04, 0x04, 0x00, 0xE6, 0x00, 0x7D])
}

fn expect_readings(event: PublishEvent) -> sniffsrv::sniffer::DecodedReadings {
    match event {
        PublishEvent::Readings(r) => r,
        other => panic!("expected readings, got {:?}", other),
    }
}

#[tokio::test]
async fn test_two_frames_in_one_write_are_decoded_in_order() {
    let mut harness = start(SnifferConfig::default()).await;
    let mut bridge = TcpStream::connect(harness.addr).await.unwrap();

    let mut chunk = voltage_request();
    chunk.extend(voltage_response());
    bridge.write_all(&chunk).await.unwrap();

    match harness.next_event().await {
        PublishEvent::Frame(record) => {
            assert_eq!(record.kind, FrameKind::Request);
            assert_eq!(record.raw_hex, "01 04 08 34 00 02 32 65");
        },
        other => panic!("expected request record, got {:?}", other),
    }

    let decoded = expect_readings(harness.next_event().await);
    assert_eq!(decoded.device_id, 0x01);
    assert_eq!(decoded.start_address, 2100);
    assert!(decoded.latency_ms.is_some());
    assert_eq!(decoded.readings.len(), 2);
    assert_eq!(decoded.readings[0].name, "Compressor AC Voltage");
    assert_eq!(decoded.readings[0].value, ReadingValue::Number(230.0));
    let current = decoded.readings[1].value.as_f64().unwrap();
    assert!((current - 12.5).abs() < 1e-9);

    harness.stop().await;
}

#[tokio::test]
async fn test_garbage_between_frames_is_discarded() {
    let mut harness = start(SnifferConfig::default()).await;
    let mut bridge = TcpStream::connect(harness.addr).await.unwrap();

    let mut chunk = vec![0x00, 0x55, 0xAA];
    chunk.extend(voltage_request());
    chunk.extend([0x13, 0x37]);
    chunk.extend(voltage_response());
    bridge.write_all(&chunk).await.unwrap();

    assert!(matches!(harness.next_event().await, PublishEvent::Frame(_)));
    let decoded = expect_readings(harness.next_event().await);
    assert_eq!(decoded.readings.len(), 2);

    let global = *harness.engine.lock().stats().global();
    assert_eq!(global.total_frames, 2);
    assert_eq!(global.valid_frames, 2);
    assert_eq!(global.errors, 0);

    harness.stop().await;
}

#[tokio::test]
async fn test_frame_split_across_writes() {
    let mut harness = start(SnifferConfig::default()).await;
    let mut bridge = TcpStream::connect(harness.addr).await.unwrap();

    let request = voltage_request();
    bridge.write_all(&request[..5]).await.unwrap();
    bridge.flush().await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    bridge.write_all(&request[5..]).await.unwrap();

    assert!(matches!(harness.next_event().await, PublishEvent::Frame(_)));
    harness.stop().await;
}

#[tokio::test]
async fn test_noise_flood_resynchronizes() {
    let mut harness = start(SnifferConfig::default()).await;
    let mut bridge = TcpStream::connect(harness.addr).await.unwrap();

    bridge.write_all(&[0x55; 600]).await.unwrap();
    let mut frames = voltage_request();
    frames.extend(voltage_response());
    bridge.write_all(&frames).await.unwrap();

    assert!(matches!(harness.next_event().await, PublishEvent::Frame(_)));
    let decoded = expect_readings(harness.next_event().await);
    assert_eq!(decoded.start_address, 2100);

    harness.stop().await;
}

#[tokio::test]
async fn test_connections_share_statistics() {
    let mut config = SnifferConfig::default();
    config.stats.publish_interval = 3;
    let mut harness = start(config).await;

    let mut first = TcpStream::connect(harness.addr).await.unwrap();
    let mut second = TcpStream::connect(harness.addr).await.unwrap();

    first.write_all(&voltage_request()).await.unwrap();
    assert!(matches!(harness.next_event().await, PublishEvent::Frame(_)));

    // Write single register on device 2, then its exception response
    second
        .write_all(&with_crc(&[0x02, 0x06, 0x07, 0xCF, 0x00, 0x03]))
        .await
        .unwrap();
    assert!(matches!(harness.next_event().await, PublishEvent::Frame(_)));
    second
        .write_all(&with_crc(&[0x02, 0x83, 0x02]))
        .await
        .unwrap();

    match harness.next_event().await {
        PublishEvent::Frame(record) => {
            assert_eq!(record.kind, FrameKind::ErrorResponse);
            assert!(record.latency_ms.is_some());
        },
        other => panic!("expected error response record, got {:?}", other),
    }
    match harness.next_event().await {
        PublishEvent::Stats(snapshot) => {
            assert_eq!(snapshot.global.counters.valid_frames, 3);
            assert_eq!(snapshot.global.quality, 1.0);
            let ids: Vec<u8> = snapshot.devices.iter().map(|d| d.device_id).collect();
            assert_eq!(ids, vec![1, 2]);
        },
        other => panic!("expected stats snapshot, got {:?}", other),
    }

    harness.stop().await;
}

#[tokio::test]
async fn test_closed_connection_does_not_stop_server() {
    let mut harness = start(SnifferConfig::default()).await;

    let mut gone = TcpStream::connect(harness.addr).await.unwrap();
    gone.write_all(&[0x01, 0x04, 0x08]).await.unwrap();
    drop(gone);

    let mut bridge = TcpStream::connect(harness.addr).await.unwrap();
    bridge.write_all(&voltage_request()).await.unwrap();
    assert!(matches!(harness.next_event().await, PublishEvent::Frame(_)));

    harness.stop().await;
}
