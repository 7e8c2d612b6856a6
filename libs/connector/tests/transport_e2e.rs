//! Control socket in, TCP push socket out

use outgoing_connector::{
    run_dispatch_loop, ClusterId, ConnectorId, ConnectorManager, ControlListener, DispatchExit,
    InMemoryDescriptorStore, LifecycleState, SendFacade, SocketKind, StandardBaseProtocol,
    TransportSocketFactory, UnixControlPublisher, WorkerConfig,
};
use outgoing_connector::{ConnectorDescriptor, ControlMessage, ControlPublisher};
use serde_json::Map;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;

async fn read_frame(stream: &mut tokio::net::TcpStream) -> Vec<u8> {
    let len = stream.read_u32().await.unwrap() as usize;
    let mut payload = vec![0u8; len];
    stream.read_exact(&mut payload).await.unwrap();
    payload
}

#[tokio::test]
async fn control_messages_drive_a_real_push_socket() {
    let peer = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = format!("tcp://{}", peer.local_addr().unwrap());

    let store = InMemoryDescriptorStore::new().with_descriptor(
        ClusterId(1),
        ConnectorDescriptor::new(ConnectorId(3), "orders", &address, SocketKind::Push),
    );

    let manager = ConnectorManager::start(
        &store,
        ClusterId(1),
        ConnectorId(3),
        Arc::new(TransportSocketFactory::new().with_timeout(Duration::from_secs(2))),
        Arc::new(StandardBaseProtocol),
        WorkerConfig::default(),
    )
    .await
    .unwrap();
    assert_eq!(manager.state().await, LifecycleState::Active { has_worker: true });

    let (mut peer_stream, _) = peer.accept().await.unwrap();

    let dir = tempfile::tempdir().unwrap();
    let control_path = dir.path().join("orders.sock");
    let (_listener, mut queue) = ControlListener::bind(&control_path, 64).unwrap();

    let facade = SendFacade::new(UnixControlPublisher::new(&control_path));
    facade.send("first", "orders", Vec::new(), Map::new()).await.unwrap();
    facade.send("not mine", "billing", Vec::new(), Map::new()).await.unwrap();
    facade.send("second", "orders", Vec::new(), Map::new()).await.unwrap();
    facade
        .publisher()
        .publish(ControlMessage::delete("orders"))
        .await
        .unwrap();

    let exit = tokio::time::timeout(Duration::from_secs(5), run_dispatch_loop(&manager, &mut queue))
        .await
        .unwrap();
    assert_eq!(exit, DispatchExit::Terminated);
    assert_eq!(manager.state().await, LifecycleState::Stopped);

    assert_eq!(read_frame(&mut peer_stream).await, b"first");
    assert_eq!(read_frame(&mut peer_stream).await, b"second");

    // Delete closed the socket, so the peer sees end of stream
    let mut rest = Vec::new();
    peer_stream.read_to_end(&mut rest).await.unwrap();
    assert!(rest.is_empty());
}

#[tokio::test]
async fn unreachable_peer_leaves_connector_without_worker() {
    let peer = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = format!("tcp://{}", peer.local_addr().unwrap());
    drop(peer);

    let manager = ConnectorManager::with_descriptor(
        ClusterId(1),
        ConnectorDescriptor::new(ConnectorId(3), "orders", &address, SocketKind::Push),
        Arc::new(TransportSocketFactory::new().with_timeout(Duration::from_millis(500))),
        Arc::new(StandardBaseProtocol),
        WorkerConfig::default(),
    )
    .await;

    assert_eq!(manager.state().await, LifecycleState::Active { has_worker: false });
    assert!(manager.worker_stats().await.is_none());
}
