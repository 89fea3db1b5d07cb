// ============================================================================
// TCP Vitals Probe - Main Entry Point
// ============================================================================
//
// Dials one or more TCP endpoints and prints the kernel's view of each
// connection (RTT, congestion window, retransmissions, SO_SNDBUF...).
//
// Usage:
//   tcp-vitals [--json] [--timeout SECS] [--watch SECS] <HOST:PORT>...
//
// HOST may be a name, an address, "[v6addr]", or a host variable:
//   $inner_ip        first local private IPv4 address
//   $iface<name>     first IPv4 address of interface <name>
//
// Architecture:
// - Worker threads (thread pool): dial targets and run queries in parallel
// - Main thread: collects results over a channel and prints them in order
// - Watch mode: re-queries the same connections until Ctrl+C
//
// ============================================================================

use core::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::env;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::process::ExitCode;
use std::sync::{Arc, mpsc};
use std::time::{Duration, Instant};

use serde::Serialize;
use threadpool::ThreadPool;

use tcp_vitals::netutil::eval_ip_var;
use tcp_vitals::{
    DEFAULT_CONNECT_TIMEOUT_SECS, MIN_WATCH_INTERVAL_SECS, TcpInfo, get_ca_state_name,
    get_tcp_state_name, is_supported, query_tcp_health,
};

// ============================================================================
// CONFIGURATION
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
struct ProbeConfig {
    targets: Vec<String>,
    json: bool,
    timeout: Duration,
    watch: Option<Duration>,
}

const USAGE: &str = "usage: tcp-vitals [--json] [--timeout SECS] [--watch SECS] <HOST:PORT>...";

impl ProbeConfig {
    /// Parse command line arguments (program name already skipped)
    fn from_args<I: IntoIterator<Item = String>>(args: I) -> Result<Self, String> {
        let mut config = ProbeConfig {
            targets: Vec::new(),
            json: false,
            timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            watch: None,
        };

        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--json" => config.json = true,
                "--timeout" => {
                    let secs = parse_secs("--timeout", args.next())?;
                    if secs == 0 {
                        return Err("--timeout must be at least 1 second".to_string());
                    }
                    config.timeout = Duration::from_secs(secs);
                }
                "--watch" => {
                    let secs = parse_secs("--watch", args.next())?;
                    config.watch = Some(Duration::from_secs(secs.max(MIN_WATCH_INTERVAL_SECS)));
                }
                "-h" | "--help" => return Err(USAGE.to_string()),
                flag if flag.starts_with("--") => {
                    return Err(format!("unknown option {flag}\n{USAGE}"));
                }
                _ => config.targets.push(arg),
            }
        }

        if config.targets.is_empty() {
            return Err(USAGE.to_string());
        }
        Ok(config)
    }
}

fn parse_secs(flag: &str, value: Option<String>) -> Result<u64, String> {
    let value = value.ok_or_else(|| format!("{flag} needs a value in seconds"))?;
    value
        .parse()
        .map_err(|_| format!("{flag}: invalid number of seconds: {value}"))
}

// ============================================================================
// TARGET RESOLUTION
// ============================================================================

/// Split `host:port`, expand host variables, resolve to the first address
fn resolve_target(target: &str) -> Result<SocketAddr, String> {
    let (host, port) = target
        .rsplit_once(':')
        .ok_or_else(|| format!("{target}: expected HOST:PORT"))?;
    let port: u16 = port
        .parse()
        .map_err(|_| format!("{target}: invalid port {port}"))?;
    let host = host.trim_start_matches('[').trim_end_matches(']');
    let host = eval_ip_var(host).map_err(|e| format!("{target}: {e}"))?;

    (host.as_str(), port)
        .to_socket_addrs()
        .map_err(|e| format!("{target}: {e}"))?
        .next()
        .ok_or_else(|| format!("{target}: no addresses found"))
}

fn dial(target: &str, timeout: Duration) -> Result<TcpStream, String> {
    let addr = resolve_target(target)?;
    log::debug!("dialing {target} at {addr}");
    TcpStream::connect_timeout(&addr, timeout).map_err(|e| format!("{target}: {e}"))
}

// ============================================================================
// REPORTING
// ============================================================================

/// One line of output: either a snapshot or the reason there isn't one
#[derive(Debug, Serialize)]
struct ProbeReport<'a> {
    target: &'a str,
    round: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    peer: Option<SocketAddr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tcp_info: Option<TcpInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn render_text(report: &ProbeReport<'_>) -> String {
    let mut out = String::new();
    let peer = report
        .peer
        .map_or_else(|| "-".to_string(), |p| p.to_string());
    out.push_str(&format!(
        "==== {} ({}) round {} ====\n",
        report.target, peer, report.round
    ));

    match (&report.tcp_info, &report.error) {
        (Some(info), _) => {
            out.push_str(&format!(
                "State:              {} (ca: {})\n",
                get_tcp_state_name(info.state),
                get_ca_state_name(info.ca_state)
            ));
            out.push_str(&format!("RTT:                {:.3} ms\n", info.rtt_ms()));
            out.push_str(&format!("RTT variance:       {:.3} ms\n", info.rtt_var_ms()));
            out.push_str(&format!("Total retransmits:  {}\n", info.total_retrans));
            out.push_str(&format!("Unacked segments:   {}\n", info.unacked));
            out.push_str(&format!("Receive space:      {}\n", info.rcv_space));
            out.push_str(&format!("Congestion window:  {}\n", info.snd_cwnd));
            out.push_str(&format!("Slow-start thresh:  {}\n", info.snd_ssthresh));
            out.push_str(&format!("Send MSS:           {}\n", info.snd_mss));
            out.push_str(&format!("SO_SNDBUF:          {}\n", info.snd_buf_size));
        }
        (None, Some(error)) => out.push_str(&format!("Error:              {error}\n")),
        (None, None) => {}
    }

    out
}

fn emit(report: &ProbeReport<'_>, json: bool) {
    if json {
        match serde_json::to_string(report) {
            Ok(line) => println!("{line}"),
            Err(e) => log::error!("cannot serialize report for {}: {e}", report.target),
        }
    } else {
        print!("{}", render_text(report));
    }
}

// ============================================================================
// PROBE ROUNDS
// ============================================================================

type Dialed = Result<Arc<TcpStream>, String>;

/// Dial every target on the pool; results come back in target order
fn dial_all(pool: &ThreadPool, config: &ProbeConfig) -> Vec<Dialed> {
    let (tx, rx) = mpsc::channel();
    for (index, target) in config.targets.iter().enumerate() {
        let tx = tx.clone();
        let target = target.clone();
        let timeout = config.timeout;
        pool.execute(move || {
            let result = dial(&target, timeout).map(Arc::new);
            // Receiver outlives the pool jobs; a send error means main is gone.
            let _ = tx.send((index, result));
        });
    }
    drop(tx);

    let mut dialed: Vec<(usize, Dialed)> = rx.iter().collect();
    dialed.sort_by_key(|(index, _)| *index);
    dialed.into_iter().map(|(_, result)| result).collect()
}

/// Query every connected stream once and print the reports. Returns the
/// number of targets that produced no snapshot.
fn query_round(pool: &ThreadPool, config: &ProbeConfig, dialed: &[Dialed], round: u64) -> usize {
    let (tx, rx) = mpsc::channel();
    for (index, conn) in dialed.iter().enumerate() {
        if let Ok(stream) = conn {
            let tx = tx.clone();
            let stream = Arc::clone(stream);
            pool.execute(move || {
                let result = query_tcp_health(&*stream);
                let _ = tx.send((index, result));
            });
        }
    }
    drop(tx);

    let mut results: Vec<_> = rx.iter().collect();
    results.sort_by_key(|(index, _)| *index);
    let mut results = results.into_iter().peekable();

    let mut failures = 0;
    for (index, conn) in dialed.iter().enumerate() {
        let target = config.targets[index].as_str();
        let report = match conn {
            Ok(stream) => {
                let peer = stream.peer_addr().ok();
                match results.next_if(|(i, _)| *i == index) {
                    Some((_, Ok(info))) => ProbeReport {
                        target,
                        round,
                        peer,
                        tcp_info: Some(info),
                        error: None,
                    },
                    Some((_, Err(e))) => {
                        failures += 1;
                        ProbeReport {
                            target,
                            round,
                            peer,
                            tcp_info: None,
                            error: Some(e.to_string()),
                        }
                    }
                    None => {
                        failures += 1;
                        ProbeReport {
                            target,
                            round,
                            peer,
                            tcp_info: None,
                            error: Some("query worker did not report".to_string()),
                        }
                    }
                }
            }
            Err(e) => {
                failures += 1;
                if round > 1 {
                    continue; // dial failures are only reported once
                }
                ProbeReport {
                    target,
                    round,
                    peer: None,
                    tcp_info: None,
                    error: Some(e.clone()),
                }
            }
        };
        emit(&report, config.json);
    }

    failures
}

/// Sleep for `interval`, waking early if `running` is cleared
///
/// An interval past the clock's range has no deadline: only `running` ends it.
fn sleep_while_running(interval: Duration, running: &AtomicBool) {
    let deadline = Instant::now().checked_add(interval);
    while running.load(AtomicOrdering::SeqCst) && deadline.is_none_or(|d| Instant::now() < d) {
        std::thread::sleep(Duration::from_millis(100));
    }
}

// ============================================================================
// MAIN
// ============================================================================

fn main() -> ExitCode {
    env_logger::init();

    let config = match ProbeConfig::from_args(env::args().skip(1)) {
        Ok(config) => config,
        Err(message) => {
            eprintln!("{message}");
            return ExitCode::from(2);
        }
    };

    if !is_supported() {
        log::warn!("TCP_INFO is not available on this platform; every query will fail");
    }

    // Same sizing rule as an I/O-bound server pool, capped by the work we have
    let cpu_count = std::thread::available_parallelism()
        .map(std::num::NonZero::get)
        .unwrap_or(4);
    let thread_count = (cpu_count * 2).clamp(4, 16).min(config.targets.len());
    log::info!(
        "probing {} target(s) with {thread_count} worker(s)",
        config.targets.len()
    );
    let pool = ThreadPool::new(thread_count);

    let dialed = dial_all(&pool, &config);
    let mut failures = query_round(&pool, &config, &dialed, 1);

    if let Some(interval) = config.watch {
        let running = Arc::new(AtomicBool::new(true));
        let r = Arc::clone(&running);
        if let Err(e) = ctrlc::set_handler(move || r.store(false, AtomicOrdering::SeqCst)) {
            log::error!("cannot install Ctrl-C handler: {e}");
            return ExitCode::FAILURE;
        }

        let mut round = 1;
        loop {
            sleep_while_running(interval, &running);
            if !running.load(AtomicOrdering::SeqCst) {
                break;
            }
            round += 1;
            failures = query_round(&pool, &config, &dialed, round);
        }
        log::info!("stopped after {round} round(s)");
    }

    pool.join();

    if failures > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_config_defaults() {
        let config = ProbeConfig::from_args(args(&["example.com:80"])).unwrap();
        assert_eq!(config.targets, vec!["example.com:80"]);
        assert!(!config.json);
        assert_eq!(config.timeout, Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS));
        assert_eq!(config.watch, None);
    }

    #[test]
    fn test_config_all_options() {
        let config = ProbeConfig::from_args(args(&[
            "--json", "--timeout", "2", "--watch", "10", "a:1", "b:2",
        ]))
        .unwrap();
        assert!(config.json);
        assert_eq!(config.timeout, Duration::from_secs(2));
        assert_eq!(config.watch, Some(Duration::from_secs(10)));
        assert_eq!(config.targets, vec!["a:1", "b:2"]);
    }

    #[test]
    fn test_config_watch_floor() {
        let config = ProbeConfig::from_args(args(&["--watch", "0", "a:1"])).unwrap();
        assert_eq!(config.watch, Some(Duration::from_secs(MIN_WATCH_INTERVAL_SECS)));
    }

    #[test]
    fn test_huge_watch_interval_sleeps_until_stopped() {
        let config =
            ProbeConfig::from_args(args(&["--watch", &u64::MAX.to_string(), "a:1"])).unwrap();
        let interval = config.watch.expect("watch interval");
        assert_eq!(interval, Duration::from_secs(u64::MAX));

        let running = Arc::new(AtomicBool::new(true));
        let stopper = {
            let running = Arc::clone(&running);
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(150));
                running.store(false, AtomicOrdering::SeqCst);
            })
        };

        let started = Instant::now();
        sleep_while_running(interval, &running);
        assert!(started.elapsed() >= Duration::from_millis(100));
        stopper.join().expect("stopper thread");
    }

    #[test]
    fn test_sleep_returns_at_deadline() {
        let started = Instant::now();
        sleep_while_running(Duration::from_millis(200), &AtomicBool::new(true));
        assert!(started.elapsed() >= Duration::from_millis(200));
    }

    #[test]
    fn test_config_errors() {
        assert!(ProbeConfig::from_args(args(&[])).is_err());
        assert!(ProbeConfig::from_args(args(&["--timeout"])).is_err());
        assert!(ProbeConfig::from_args(args(&["--timeout", "x", "a:1"])).is_err());
        assert!(ProbeConfig::from_args(args(&["--timeout", "0", "a:1"])).is_err());
        assert!(ProbeConfig::from_args(args(&["--bogus", "a:1"])).is_err());
    }

    #[test]
    fn test_resolve_target_literals() {
        assert_eq!(
            resolve_target("127.0.0.1:8080").unwrap(),
            "127.0.0.1:8080".parse::<SocketAddr>().unwrap()
        );
        assert_eq!(
            resolve_target("[::1]:443").unwrap(),
            "[::1]:443".parse::<SocketAddr>().unwrap()
        );
    }

    #[test]
    fn test_resolve_target_errors() {
        assert!(resolve_target("no-port").is_err());
        assert!(resolve_target("127.0.0.1:notaport").is_err());
        assert!(resolve_target("127.0.0.1:70000").is_err());
    }

    #[test]
    fn test_render_text_snapshot() {
        let info = TcpInfo {
            state: tcp_vitals::TCP_ESTABLISHED,
            rtt: 12_345,
            snd_cwnd: 10,
            snd_buf_size: 16_384,
            ..TcpInfo::default()
        };
        let report = ProbeReport {
            target: "db:5432",
            round: 1,
            peer: None,
            tcp_info: Some(info),
            error: None,
        };
        let text = render_text(&report);
        assert!(text.starts_with("==== db:5432 (-) round 1 ===="));
        assert!(text.contains("ESTABLISHED (ca: OPEN)"));
        assert!(text.contains("12.345 ms"));
        assert!(text.contains("SO_SNDBUF:          16384"));
    }

    #[test]
    fn test_report_json_omits_absent_fields() {
        let report = ProbeReport {
            target: "db:5432",
            round: 3,
            peer: None,
            tcp_info: None,
            error: Some("refused".to_string()),
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["target"], "db:5432");
        assert_eq!(json["round"], 3);
        assert_eq!(json["error"], "refused");
        assert!(json.get("tcp_info").is_none());
        assert!(json.get("peer").is_none());
    }
}
