use std::sync::Arc;
use std::time::Duration;

use futures::future::try_join_all;
use tokio::time::Instant;
use tracing::debug;
use tracing::warn;

use crate::metrics::PROBE_FAILURES;
use crate::metrics::PROBE_GATEWAY;
use crate::metrics::PROBE_PEER;
use crate::metrics::PROBE_STORE;
use crate::push_latest;
use crate::utils::async_task::with_timeout;
use crate::AgentConnection;
use crate::DetentionTimer;
use crate::NetworkTestParams;
use crate::NodeItem;
use crate::Result;
use crate::StorePerf;

/// Source address the server presents on its own network probes
pub const GATEWAY_PROBE_SOURCE: &str = "n2n://nodes_monitor";

/// A peer the node under test exchanges traffic with
#[derive(Clone)]
pub struct PeerProbe {
    pub connection: Arc<dyn AgentConnection>,
    pub rpc_address: String,
}

/// Inputs of one round of health probes, captured under the item lock
#[derive(Clone)]
pub struct ProbePlan {
    pub connection: Arc<dyn AgentConnection>,
    /// Skips the server round trip when the node has no address yet
    pub rpc_address: Option<String>,
    pub peers: Vec<PeerProbe>,
    pub store_perf_count: u32,
    pub timeout: Duration,
}

/// `None` marks a probe that had nothing to test
#[derive(Debug, Default)]
pub struct ProbeResults {
    pub store: Option<Result<StorePerf>>,
    /// Round trip in ms
    pub gateway: Option<Result<f64>>,
    pub peers: Option<Result<()>>,
}

/// Runs the storage, server and peer probes concurrently; each has its own
/// timeout and its own failure slot.
pub async fn run_probes(plan: ProbePlan) -> ProbeResults {
    let store = probe_store(plan.connection.as_ref(), plan.store_perf_count, plan.timeout);
    let gateway = async {
        match plan.rpc_address.as_deref() {
            Some(address) => Some(probe_gateway(plan.connection.as_ref(), address, plan.timeout).await),
            None => None,
        }
    };
    let peers = async {
        match plan.rpc_address.as_deref() {
            Some(address) if !plan.peers.is_empty() => {
                Some(probe_peers(&plan.peers, address, plan.timeout).await)
            }
            _ => None,
        }
    };
    let (store, gateway, peers) = tokio::join!(store, gateway, peers);
    ProbeResults {
        store: Some(store),
        gateway,
        peers,
    }
}

pub async fn probe_store(
    connection: &dyn AgentConnection,
    count: u32,
    timeout: Duration,
) -> Result<StorePerf> {
    with_timeout("test_store_perf", timeout, connection.test_store_perf(count)).await
}

/// Server to node round trip against the node's advertised address
pub async fn probe_gateway(
    connection: &dyn AgentConnection,
    rpc_address: &str,
    timeout: Duration,
) -> Result<f64> {
    let started = Instant::now();
    with_timeout(
        "test_network_perf",
        timeout,
        connection.test_network_perf(NetworkTestParams::ping(GATEWAY_PROBE_SOURCE, rpc_address)),
    )
    .await?;
    Ok(started.elapsed().as_secs_f64() * 1000.0)
}

/// Every peer dials the node under test; the first failure fails the probe
pub async fn probe_peers(
    peers: &[PeerProbe],
    target: &str,
    timeout: Duration,
) -> Result<()> {
    try_join_all(peers.iter().map(|peer| {
        with_timeout(
            "test_network_perf_to_peer",
            timeout,
            peer.connection
                .test_network_perf_to_peer(NetworkTestParams::ping(&peer.rpc_address, target)),
        )
    }))
    .await?;
    Ok(())
}

/// Folds probe results into the item: latency rings on success, flags and
/// detention timers on failure. Returns true when the item changed.
pub fn apply_probe_results(
    item: &mut NodeItem,
    results: &ProbeResults,
    now: u64,
    max_latencies: usize,
) -> bool {
    let mut changed = false;
    let node_id = item.node.id.clone();

    match &results.store {
        Some(Ok(perf)) => {
            push_latest(&mut item.node.latency_of_disk_read, perf.read.iter().copied(), max_latencies);
            push_latest(&mut item.node.latency_of_disk_write, perf.write.iter().copied(), max_latencies);
            if item.storage_not_exist.take().is_some() {
                warn!(%node_id, "agent storage is available again");
            }
            if item.auth_failed.take().is_some() {
                warn!(%node_id, "agent storage authentication recovered");
            }
            changed = true;
        }
        Some(Err(e)) => {
            PROBE_FAILURES.with_label_values(&[PROBE_STORE]).inc();
            if e.is_storage_not_exist() {
                if item.storage_not_exist.is_none() {
                    warn!(%node_id, ?e, "agent storage does not exist");
                    item.storage_not_exist = Some(now);
                }
            } else if e.is_auth_failed() && item.auth_failed.is_none() {
                warn!(%node_id, ?e, "agent storage authentication failed");
                item.auth_failed = Some(now);
            }
            debug!(%node_id, ?e, "store probe failed");
            DetentionTimer::record(&mut item.detention.io_test_errors, now);
            changed = true;
        }
        None => {}
    }

    match &results.gateway {
        Some(Ok(took_ms)) => {
            push_latest(&mut item.node.latency_to_server, [*took_ms], max_latencies);
            changed = true;
        }
        Some(Err(e)) => {
            PROBE_FAILURES.with_label_values(&[PROBE_GATEWAY]).inc();
            warn!(%node_id, ?e, "server network probe failed");
            DetentionTimer::record(&mut item.detention.gateway_errors, now);
            changed = true;
        }
        None => {}
    }

    if let Some(Err(e)) = &results.peers {
        PROBE_FAILURES.with_label_values(&[PROBE_PEER]).inc();
        warn!(%node_id, ?e, "peer network probe failed");
        DetentionTimer::record(&mut item.detention.n2n_errors, now);
        changed = true;
    }
    changed
}
