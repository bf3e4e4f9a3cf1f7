//! Four-node walk-through: bring-up, placement, failure, rejoin.
//!
//! Runs entirely in-process on loopback TCP and prints where each row
//! lands after every membership change.
//!
//! ```text
//! cargo run --example cluster
//! ```

use bonito::{
    HandoffConfig, MembershipEvent, MembershipObserver, PhysicalNode,
    RedistributionCoordinator, RingConfig, Row, RowFileStore, RowStore, SharedRing, SyncServer,
    TcpSyncTransport,
};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::time::sleep;

struct Node {
    info: PhysicalNode,
    ring: Arc<SharedRing>,
    store: Arc<RowFileStore>,
    observer: Arc<MembershipObserver>,
}

async fn start_node(
    dir: &std::path::Path,
    id: &str,
    port: u16,
) -> Result<Node, Box<dyn std::error::Error>> {
    let info = PhysicalNode::new(id, "127.0.0.1", port);

    let ring = SharedRing::new(RingConfig::new(3, 2))?;
    ring.add_node(info.clone())?;
    let store = Arc::new(RowFileStore::open(dir, id).await?);
    let coordinator = RedistributionCoordinator::new(
        id,
        ring.clone(),
        store.clone(),
        Arc::new(TcpSyncTransport::default()),
        HandoffConfig::from_env(),
    );

    let server = SyncServer::new(info.addr().parse()?, coordinator.clone());
    tokio::spawn(server.run());

    let observer = MembershipObserver::new(ring.clone(), coordinator);
    Ok(Node {
        info,
        ring,
        store,
        observer,
    })
}

async fn free_ports(count: usize) -> Vec<u16> {
    let mut ports = Vec::with_capacity(count);
    for _ in 0..count {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        ports.push(listener.local_addr().unwrap().port());
    }
    ports
}

fn demo_row(page_id: &str, hash_key: u64) -> Row {
    let now = Utc::now();
    Row {
        page_id: page_id.to_string(),
        component_id: "btn1".to_string(),
        timestamp: now,
        event: "click".to_string(),
        created_at: now,
        updated_at: now,
        hash_key,
    }
}

async fn print_placement(nodes: &[&Node], rows: &[Row]) {
    for row in rows {
        let mut holders = Vec::new();
        for node in nodes {
            if node.store.contains(&row.key()).await {
                holders.push(node.info.id.clone());
            }
        }
        holders.sort();
        println!("  row page_id={:<3} token={:<20} -> {:?}", row.page_id, row.hash_key, holders);
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let dir = tempfile::tempdir()?;
    let ports = free_ports(5).await;

    let mut nodes = Vec::new();
    for i in 0..4 {
        nodes.push(start_node(dir.path(), &format!("node_{}", i), ports[i]).await?);
    }
    sleep(Duration::from_millis(100)).await;

    // Seed one row per node, the way an ingesting application would.
    let rows = vec![
        demo_row("19", 13502972256853596262),
        demo_row("86", 4392469504148276032),
        demo_row("42", 13154972877196513132),
        demo_row("93", 14458771382211144428),
    ];
    for (node, row) in nodes.iter().zip(&rows) {
        node.store.insert(row.clone()).await?;
    }

    println!("before membership converges:");
    print_placement(&nodes.iter().collect::<Vec<_>>(), &rows).await;

    // Introduce everyone to everyone; each join triggers redistribution.
    for i in 0..nodes.len() {
        for j in 0..nodes.len() {
            if i != j {
                let _ = nodes[i]
                    .observer
                    .observe(MembershipEvent::NodeJoined(nodes[j].info.clone()));
            }
        }
    }
    sleep(Duration::from_secs(2)).await;

    println!("\nafter convergence (replication factor 2):");
    print_placement(&nodes.iter().collect::<Vec<_>>(), &rows).await;

    // node_1 dies; survivors rebalance.
    println!("\nmarking node_1 dead...");
    for node in &nodes {
        if node.info.id != "node_1" {
            let _ = node
                .observer
                .observe(MembershipEvent::NodeMarkedDead("node_1".to_string()));
        }
    }
    sleep(Duration::from_secs(2)).await;

    let survivors: Vec<&Node> = nodes.iter().filter(|n| n.info.id != "node_1").collect();
    println!("after failure rebalance (survivors only):");
    print_placement(&survivors, &rows).await;

    // A fresh node joins and takes over its share of the ring.
    println!("\njoining node_4...");
    let node_4 = start_node(dir.path(), "node_4", ports[4]).await?;
    for survivor in &survivors {
        node_4.ring.add_node(survivor.info.clone())?;
    }
    sleep(Duration::from_millis(100)).await;
    for node in &survivors {
        let _ = node
            .observer
            .observe(MembershipEvent::NodeJoined(node_4.info.clone()));
    }
    sleep(Duration::from_secs(2)).await;

    let mut final_nodes: Vec<&Node> = survivors.clone();
    final_nodes.push(&node_4);
    println!("after node_4 joined:");
    print_placement(&final_nodes, &rows).await;

    println!("\nreplica sets under node_0's final ring:");
    let snapshot = nodes[0].ring.snapshot();
    for row in &rows {
        println!(
            "  token {:<20} -> {:?}",
            row.hash_key,
            snapshot.replicas_for(row.hash_key)
        );
    }

    Ok(())
}
