//! End-to-end scenarios over the in-memory network.

use std::time::Duration;

use anyhow::{Context, Result};
use svs::store::{SqliteStore, Store};
use svs::{FetchResult, HandlingPolicy, NamingScheme, SvsError, SvsNode, VectorOrdering};
use svs_testkit::{init_tracing, name, TestGroup};
use tokio::sync::mpsc;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(30);

async fn next(rx: &mut mpsc::UnboundedReceiver<FetchResult>) -> Result<FetchResult> {
    timeout(WAIT, rx.recv())
        .await
        .context("timed out waiting for a fetch result")?
        .context("result channel closed")
}

#[tokio::test(start_paused = true)]
async fn test_publish_reaches_every_peer() -> Result<()> {
    init_tracing();
    let group = TestGroup::new("/ndn/chat");
    let (alice, _alice_rx) = group.join("/alice").await;
    let (bob, mut bob_rx) = group.join("/bob").await;
    let (carol, mut carol_rx) = group.join("/carol").await;

    assert_eq!(alice.publish(&b"hello"[..]).await?, 1);

    for rx in [&mut bob_rx, &mut carol_rx] {
        let result = next(rx).await?;
        assert_eq!(result.source, name("/alice"));
        assert_eq!(result.seq, 1);
        let packet = result.packet().context("fetch failed")?;
        assert_eq!(packet.content().as_ref(), b"hello");
        assert_eq!(packet.name().to_string(), "/ndn/chat/data/alice/seq=1");
    }
    assert_eq!(bob.seq_of(&name("/alice")), 1);
    assert_eq!(carol.seq_of(&name("/alice")), 1);

    for node in [alice, bob, carol] {
        node.shutdown().await;
    }
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_late_joiner_catches_up_on_periodic_sync() -> Result<()> {
    init_tracing();
    let group = TestGroup::new("/g");
    let (alice, _alice_rx) = group.join("/alice").await;
    for i in 0..3u8 {
        alice.publish(vec![i]).await?;
    }

    let (bob, mut bob_rx) = group.join("/bob").await;
    let mut seqs = Vec::new();
    for _ in 0..3 {
        let result = next(&mut bob_rx).await?;
        assert_eq!(result.source, name("/alice"));
        let packet = result.packet().context("fetch failed")?;
        assert_eq!(packet.content().as_ref(), &[(result.seq - 1) as u8]);
        seqs.push(result.seq);
    }
    seqs.sort_unstable();
    assert_eq!(seqs, vec![1, 2, 3]);
    assert_eq!(bob.seq_of(&name("/alice")), 3);

    alice.shutdown().await;
    bob.shutdown().await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_group_converges() -> Result<()> {
    init_tracing();
    let group = TestGroup::new("/g");
    let sources = ["/n0", "/n1", "/n2", "/n3"];
    let mut nodes = Vec::new();
    for source in sources {
        nodes.push(group.join(source).await);
    }

    for (node, _) in &nodes {
        node.publish(&b"x"[..]).await?;
        node.publish(&b"y"[..]).await?;
    }

    // Every node fetches the other three sources' two packets.
    for (_, rx) in &mut nodes {
        for _ in 0..6 {
            assert!(next(rx).await?.packet().is_some());
        }
    }

    let reference = nodes[0].0.state_vector();
    assert_eq!(reference.total(), 8);
    for (node, _) in &nodes[1..] {
        for source in sources {
            assert_eq!(node.seq_of(&name(source)), 2);
        }
        assert_eq!(node.state_vector().len(), reference.len());
    }

    for (node, _) in nodes {
        node.shutdown().await;
    }
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_source_oriented_latest_first_group_converges() -> Result<()> {
    init_tracing();
    let group = TestGroup::new("/g");
    let sources = ["/n0", "/n1", "/n2"];
    let mut nodes = Vec::new();
    for source in sources {
        let mut config = group.config(source);
        config.naming = NamingScheme::SourceOriented;
        config.handling = HandlingPolicy::EqualTraffic;
        config.sync.formal_encoding = false;
        config.sync.ordering = VectorOrdering::LatestEntriesFirst;
        config.sync.efficient_suppression = true;
        nodes.push(group.join_with(config).await);
    }

    for round in 0..3u8 {
        for (node, _) in &nodes {
            node.publish(vec![round]).await?;
        }
    }

    // Every node fetches the other two sources' three packets.
    for (_, rx) in &mut nodes {
        for _ in 0..6 {
            let result = next(rx).await?;
            let packet = result.packet().context("fetch failed")?;
            let expected = format!("{}/g/data/seq={}", result.source, result.seq);
            assert_eq!(packet.name().to_string(), expected);
            assert_eq!(packet.content().as_ref(), &[(result.seq - 1) as u8]);
        }
    }

    for (node, _) in &nodes {
        let vector = node.state_vector();
        assert_eq!(vector.ordering(), VectorOrdering::LatestEntriesFirst);
        assert_eq!(vector.len(), 3);
        assert_eq!(vector.total(), 9);
        for source in sources {
            assert_eq!(node.seq_of(&name(source)), 3);
        }
    }

    for (node, _) in nodes {
        node.shutdown().await;
    }
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_manual_handling_fetches_only_on_request() -> Result<()> {
    init_tracing();
    let group = TestGroup::new("/g");
    let (alice, _alice_rx) = group.join("/alice").await;
    let mut config = group.config("/bob");
    config.handling = HandlingPolicy::Manual;
    let (bob, mut bob_rx) = group.join_with(config).await;
    let mut missing = bob.subscribe();

    alice.publish(&b"one"[..]).await?;
    alice.publish(&b"two"[..]).await?;

    let mut high = 0;
    while high < 2 {
        let batch = timeout(WAIT, missing.recv())
            .await?
            .context("subscription closed")?;
        for range in batch {
            assert_eq!(range.source, name("/alice"));
            high = high.max(range.high_seq);
        }
    }
    assert!(bob_rx.try_recv().is_err());

    bob.need_data(&name("/alice"), 2).await;
    let result = next(&mut bob_rx).await?;
    assert_eq!(result.seq, 2);
    assert_eq!(result.packet().context("fetch failed")?.content().as_ref(), b"two");

    alice.shutdown().await;
    bob.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_published_packets_persist_in_sqlite() -> Result<()> {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("alice.db");

    let group = TestGroup::new("/g");
    let mut config = group.config("/alice");
    config.storage_path = Some(path.clone());
    let (alice, _rx) = group.join_with(config).await;
    alice.publish(&b"kept"[..]).await?;
    alice.shutdown().await;

    let store = SqliteStore::open(&path)?;
    let key = name("/g/data/alice/seq=1").encode();
    let wire = store.get(&key).await?.context("packet not stored")?;
    let packet = svs::DataPacket::decode(&wire)?;
    assert_eq!(packet.content().as_ref(), b"kept");
    store.close().await?;
    Ok(())
}

#[tokio::test]
async fn test_open_rejects_invalid_config() {
    let group = TestGroup::new("/g");
    let mut config = group.config("/alice");
    config.sync.sync_interval = Duration::ZERO;
    let transport = std::sync::Arc::new(group.network.create_transport().await);

    let result = SvsNode::open_with_channel(transport, config).await;
    assert!(matches!(result, Err(SvsError::Sync(_))));
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_is_idempotent_and_stops_serving() -> Result<()> {
    let group = TestGroup::new("/g");
    let (alice, _alice_rx) = group.join("/alice").await;
    alice.publish(&b"gone"[..]).await?;
    alice.shutdown().await;
    alice.shutdown().await;

    let (bob, mut bob_rx) = group.join("/bob").await;
    bob.need_data(&name("/alice"), 1).await;
    let result = next(&mut bob_rx).await?;
    assert!(result.packet().is_none());

    bob.shutdown().await;
    Ok(())
}
