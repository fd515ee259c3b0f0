use log::{debug, info, warn};
use std::collections::HashSet;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::sync::Semaphore;
use tokio::time::timeout;

use super::address_space::candidate_addresses;
use super::interface::{self, InterfacePrefix};
use crate::error::DiscoveryError;

pub const DEFAULT_PORT: u16 = 2001;
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Called once for every peer as soon as its probe succeeds
pub type PeerCallback = Arc<dyn Fn(SocketAddr) + Send + Sync>;

/// Configuration for a subnet scan
#[derive(Clone)]
pub struct ScanConfig {
    /// Port the peers listen on
    pub port: u16,
    /// How long a single connection attempt may take
    pub probe_timeout: Duration,
    /// Upper bound on simultaneous connection attempts, `None` for unbounded
    pub max_concurrent_probes: Option<usize>,
    /// Keep the scanning interface's own address among the candidates
    pub include_self: bool,
    /// Restrict the scan to one interface
    pub device: Option<String>,
    /// Optional streaming callback for discovered peers
    pub on_peer_found: Option<PeerCallback>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            max_concurrent_probes: None,
            include_self: false,
            device: None,
            on_peer_found: None,
        }
    }
}

/// Outcome of one connection attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeResult {
    pub address: Ipv4Addr,
    pub reachable: bool,
}

/// Try to open a TCP connection to `address:port` within `limit`.
///
/// The connection is closed right away, nothing is exchanged. Any failure
/// simply reports the address as unreachable.
pub async fn probe(address: Ipv4Addr, port: u16, limit: Duration) -> ProbeResult {
    let target = SocketAddrV4::new(address, port);
    let reachable = match timeout(limit, TcpStream::connect(target)).await {
        Ok(Ok(stream)) => {
            drop(stream);
            true
        }
        Ok(Err(e)) => {
            debug!("Probe {} failed: {}", target, e);
            false
        }
        Err(_) => {
            debug!("Probe {} timed out", target);
            false
        }
    };

    ProbeResult { address, reachable }
}

/// Probe every candidate concurrently and return the ones that answered.
///
/// Each candidate gets its own task. With a concurrency cap the tasks wait on a
/// semaphore before connecting. All tasks are joined before the set is returned.
pub async fn probe_all(
    candidates: Vec<Ipv4Addr>,
    config: &ScanConfig,
) -> HashSet<Ipv4Addr> {
    let discovered = Arc::new(Mutex::new(HashSet::new()));
    let limiter = config
        .max_concurrent_probes
        .map(|cap| Arc::new(Semaphore::new(cap.max(1))));

    let mut handles = Vec::with_capacity(candidates.len());
    for address in candidates {
        let discovered = discovered.clone();
        let limiter = limiter.clone();
        let callback = config.on_peer_found.clone();
        let port = config.port;
        let limit = config.probe_timeout;

        handles.push(tokio::spawn(async move {
            let _permit = match &limiter {
                Some(semaphore) => match semaphore.clone().acquire_owned().await {
                    Ok(permit) => Some(permit),
                    Err(_) => return,
                },
                None => None,
            };

            let result = probe(address, port, limit).await;
            if !result.reachable {
                return;
            }

            let newly_found = match discovered.lock() {
                Ok(mut set) => set.insert(result.address),
                Err(poisoned) => poisoned.into_inner().insert(result.address),
            };
            if newly_found {
                if let Some(cb) = callback {
                    cb(SocketAddr::V4(SocketAddrV4::new(result.address, port)));
                }
            }
        }));
    }

    for handle in handles {
        if let Err(e) = handle.await {
            warn!("Probe task panicked: {}", e);
        }
    }

    let found = match discovered.lock() {
        Ok(mut set) => std::mem::take(&mut *set),
        Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
    };
    found
}

/// Collect the candidates of every prefix, each prefix enumerated on its own.
pub fn collect_candidates(prefixes: &[InterfacePrefix], include_self: bool) -> Vec<Ipv4Addr> {
    let mut seen = HashSet::new();
    let mut candidates = Vec::new();
    for prefix in prefixes {
        for address in candidate_addresses(prefix, include_self) {
            if seen.insert(address) {
                candidates.push(address);
            }
        }
    }
    candidates
}

/// Scan the local subnets for listening peers.
///
/// Returns the discovered `address:port` pairs sorted by address.
pub async fn scan(config: &ScanConfig) -> Result<Vec<SocketAddr>, DiscoveryError> {
    let prefixes = interface::discover_prefixes(config.device.as_deref())?;
    scan_prefixes(&prefixes, config).await
}

/// Scan an explicit set of prefixes
pub async fn scan_prefixes(
    prefixes: &[InterfacePrefix],
    config: &ScanConfig,
) -> Result<Vec<SocketAddr>, DiscoveryError> {
    let candidates = collect_candidates(prefixes, config.include_self);
    let candidate_count = candidates.len();

    if let Some(cap) = config.max_concurrent_probes {
        info!("Probing {} addresses on port {} (at most {} at once)", candidate_count, config.port, cap);
    } else {
        info!("Probing {} addresses on port {}", candidate_count, config.port);
        if candidate_count > 4096 {
            warn!("Unbounded scan of {} addresses, consider a concurrency cap", candidate_count);
        }
    }

    let start_time = Instant::now();
    let found = probe_all(candidates, config).await;

    let mut peers: Vec<Ipv4Addr> = found.into_iter().collect();
    peers.sort();

    info!(
        "Scan complete: {}/{} addresses reachable in {:.2}s",
        peers.len(),
        candidate_count,
        start_time.elapsed().as_secs_f32()
    );

    Ok(peers
        .into_iter()
        .map(|ip| SocketAddr::V4(SocketAddrV4::new(ip, config.port)))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    fn quick_config(port: u16) -> ScanConfig {
        ScanConfig {
            port,
            probe_timeout: Duration::from_millis(500),
            ..ScanConfig::default()
        }
    }

    #[tokio::test]
    async fn test_probe_reports_listening_host() {
        let _ = env_logger::builder().is_test(true).try_init();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let result = probe(Ipv4Addr::LOCALHOST, port, Duration::from_secs(1)).await;
        assert!(result.reachable);
    }

    #[tokio::test]
    async fn test_probe_all_returns_only_reachable_candidates() {
        let _ = env_logger::builder().is_test(true).try_init();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        // Nothing listens on 127.0.0.2 / 127.0.0.3 for this port
        let candidates = vec![
            Ipv4Addr::new(127, 0, 0, 1),
            Ipv4Addr::new(127, 0, 0, 2),
            Ipv4Addr::new(127, 0, 0, 3),
        ];

        let found = probe_all(candidates, &quick_config(port)).await;
        assert_eq!(found, HashSet::from([Ipv4Addr::new(127, 0, 0, 1)]));
    }

    #[tokio::test]
    async fn test_probe_all_streams_and_respects_cap() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let streamed = Arc::new(Mutex::new(Vec::<SocketAddr>::new()));
        let sink = streamed.clone();
        let on_found: PeerCallback = Arc::new(move |addr: SocketAddr| {
            sink.lock().unwrap().push(addr);
        });
        let config = ScanConfig {
            max_concurrent_probes: Some(1),
            on_peer_found: Some(on_found),
            ..quick_config(port)
        };

        let found = probe_all(
            vec![Ipv4Addr::new(127, 0, 0, 1), Ipv4Addr::new(127, 0, 0, 4)],
            &config,
        )
        .await;

        assert_eq!(found.len(), 1);
        let streamed = streamed.lock().unwrap();
        assert_eq!(*streamed, vec![SocketAddr::from(([127, 0, 0, 1], port))]);
    }

    #[tokio::test]
    async fn test_empty_candidate_set() {
        let found = probe_all(Vec::new(), &quick_config(1)).await;
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn test_scan_prefixes_with_self_included() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let prefix = InterfacePrefix::new(
            "lo".to_string(),
            Ipv4Addr::new(127, 0, 0, 1),
            Ipv4Addr::new(255, 255, 255, 252),
        );

        let with_self = ScanConfig {
            include_self: true,
            ..quick_config(port)
        };
        let peers = scan_prefixes(&[prefix.clone()], &with_self).await.unwrap();
        assert_eq!(peers, vec![SocketAddr::from(([127, 0, 0, 1], port))]);

        let peers = scan_prefixes(&[prefix], &quick_config(port)).await.unwrap();
        assert!(peers.is_empty());
    }

    #[test]
    fn test_disjoint_prefixes_enumerated_independently() {
        let prefixes = vec![
            InterfacePrefix::new(
                "eth0".to_string(),
                Ipv4Addr::new(192, 168, 1, 1),
                Ipv4Addr::new(255, 255, 255, 252),
            ),
            InterfacePrefix::new(
                "eth0".to_string(),
                Ipv4Addr::new(10, 0, 0, 1),
                Ipv4Addr::new(255, 255, 255, 254),
            ),
        ];

        let candidates = collect_candidates(&prefixes, true);
        assert_eq!(candidates.len(), 6);
        assert!(candidates.contains(&Ipv4Addr::new(192, 168, 1, 3)));
        assert!(candidates.contains(&Ipv4Addr::new(10, 0, 0, 0)));
    }
}
