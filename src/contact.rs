use crate::types::DnsError;
use async_trait::async_trait;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

/// Classic UDP DNS payload limit.
pub const MAX_UDP_PAYLOAD: usize = 512;

/// Result of a single send/receive attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attempt {
    /// A datagram arrived before the timeout.
    Reply(Vec<u8>),
    /// Nothing arrived within the per-attempt timeout.
    TimedOut,
}

/// One round trip over some datagram transport.
///
/// Implementations own their socket for exactly one call and release it
/// before returning, whatever the outcome.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn attempt(
        &self,
        server:  SocketAddr,
        payload: &[u8],
        timeout: Duration,
    ) -> Result<Attempt, DnsError>;
}

/// Plain UDP: a fresh ephemeral socket per attempt.
#[derive(Debug, Default, Clone, Copy)]
pub struct UdpTransport;

#[async_trait]
impl Transport for UdpTransport {
    async fn attempt(
        &self,
        server:  SocketAddr,
        payload: &[u8],
        timeout: Duration,
    ) -> Result<Attempt, DnsError> {
        let local: SocketAddr = if server.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };

        let sock = UdpSocket::bind(local)
            .await
            .map_err(|e| DnsError::Socket(format!("can't bind UDP socket: {e}")))?;

        sock.send_to(payload, server)
            .await
            .map_err(|e| DnsError::Socket(format!("can't send DNS packet to {server}: {e}")))?;

        let mut buf = [0u8; MAX_UDP_PAYLOAD];
        match tokio::time::timeout(timeout, sock.recv_from(&mut buf)).await {
            Ok(Ok((size, from))) => {
                if from != server {
                    warn!(expected = %server, received_from = %from, "reply from unexpected source");
                }
                Ok(Attempt::Reply(buf[..size].to_vec()))
            }
            Ok(Err(e)) => Err(DnsError::Socket(format!("can't read DNS packet from {server}: {e}"))),
            Err(_) => Ok(Attempt::TimedOut),
        }
    }
}

/// Where an exchange stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeState {
    Idle,
    AwaitingReply { attempt: u32 },
    Done,
    /// Every attempt timed out.
    Exhausted,
    /// The transport failed with something other than a timeout.
    Failed,
}

/// A reply accepted at the transport layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Raw datagram, not yet validated.
    pub bytes: Vec<u8>,
    /// Attempts made, including the successful one.
    pub attempts: u32,
    /// Wall-clock time from the first send to the reply.
    pub elapsed: Duration,
}

impl Reply {
    /// Retries consumed: attempts beyond the first.
    pub fn retries(&self) -> u32 {
        self.attempts.saturating_sub(1)
    }
}

/// Sends one query to one server, retrying on timeout.
///
/// Attempts run strictly one after another; the first datagram received is
/// the reply. Id and flag checks belong to the classifier.
#[derive(Debug)]
pub struct Exchange<T> {
    transport:   T,
    server:      SocketAddr,
    timeout:     Duration,
    max_retries: u32,
    state:       ExchangeState,
    attempts:    u32,
}

impl<T: Transport> Exchange<T> {
    /// # Errors
    /// `DnsError::Argument` if `max_retries` or `timeout` is zero.
    pub fn new(
        transport:   T,
        server:      SocketAddr,
        timeout:     Duration,
        max_retries: u32,
    ) -> Result<Self, DnsError> {
        if max_retries == 0 {
            return Err(DnsError::Argument("max retries must be at least 1".into()));
        }
        if timeout.is_zero() {
            return Err(DnsError::Argument("timeout must be positive".into()));
        }

        Ok(Self {
            transport,
            server,
            timeout,
            max_retries,
            state: ExchangeState::Idle,
            attempts: 0,
        })
    }

    pub fn state(&self) -> ExchangeState {
        self.state
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    #[cfg(test)]
    fn transport(&self) -> &T {
        &self.transport
    }

    /// Runs the retry loop until a datagram arrives or the budget is spent.
    ///
    /// Only timeouts are retried. Socket errors end the exchange at once.
    pub async fn send(&mut self, payload: &[u8]) -> Result<Reply, DnsError> {
        if self.state != ExchangeState::Idle {
            return Err(DnsError::Argument("exchange already used".into()));
        }

        let started = Instant::now();
        while self.attempts < self.max_retries {
            self.attempts += 1;
            self.state = ExchangeState::AwaitingReply { attempt: self.attempts };
            debug!(server = %self.server, attempt = self.attempts, bytes = payload.len(), "sending query");

            let outcome = self.transport.attempt(self.server, payload, self.timeout).await;
            match outcome {
                Ok(Attempt::Reply(bytes)) => {
                    self.state = ExchangeState::Done;
                    let elapsed = started.elapsed();
                    info!(
                        server = %self.server,
                        attempts = self.attempts,
                        bytes = bytes.len(),
                        elapsed_ms = elapsed.as_millis() as u64,
                        "reply received"
                    );
                    return Ok(Reply { bytes, attempts: self.attempts, elapsed });
                }
                Ok(Attempt::TimedOut) => {
                    warn!(server = %self.server, attempt = self.attempts, timeout = ?self.timeout, "attempt timed out");
                }
                Err(e) => {
                    warn!(server = %self.server, attempt = self.attempts, error = %e, "transport failed");
                    self.state = ExchangeState::Failed;
                    return Err(e);
                }
            }
        }

        self.state = ExchangeState::Exhausted;
        Err(DnsError::MaxRetriesExceeded { attempts: self.attempts })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Replays a fixed script of attempt outcomes, then times out forever.
    struct Scripted {
        script: Mutex<Vec<Result<Attempt, DnsError>>>,
        calls:  AtomicU32,
        seen_timeout: Mutex<Option<Duration>>,
    }

    impl Scripted {
        fn new(mut script: Vec<Result<Attempt, DnsError>>) -> Self {
            script.reverse();
            Self {
                script: Mutex::new(script),
                calls: AtomicU32::new(0),
                seen_timeout: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl Transport for Scripted {
        async fn attempt(
            &self,
            _server: SocketAddr,
            _payload: &[u8],
            timeout: Duration,
        ) -> Result<Attempt, DnsError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.seen_timeout.lock().unwrap() = Some(timeout);
            self.script.lock().unwrap().pop().unwrap_or(Ok(Attempt::TimedOut))
        }
    }

    fn server() -> SocketAddr {
        "192.0.2.1:53".parse().unwrap()
    }

    #[tokio::test]
    async fn always_timing_out_spends_the_whole_budget() {
        let mut exchange = Exchange::new(Scripted::new(Vec::new()), server(), Duration::from_secs(5), 3).unwrap();

        let result = exchange.send(&[0u8; 12]).await;
        assert_eq!(result, Err(DnsError::MaxRetriesExceeded { attempts: 3 }));
        assert_eq!(exchange.transport().calls.load(Ordering::SeqCst), 3);
        assert_eq!(exchange.attempts(), 3);
        assert_eq!(exchange.state(), ExchangeState::Exhausted);
    }

    #[tokio::test]
    async fn reply_on_second_attempt_counts_one_retry() {
        let transport = Scripted::new(vec![Ok(Attempt::TimedOut), Ok(Attempt::Reply(vec![1, 2, 3]))]);
        let mut exchange = Exchange::new(transport, server(), Duration::from_secs(2), 3).unwrap();

        let reply = exchange.send(&[0u8; 12]).await.unwrap();
        assert_eq!(reply.bytes, vec![1, 2, 3]);
        assert_eq!(reply.attempts, 2);
        assert_eq!(reply.retries(), 1);
        assert_eq!(exchange.transport().calls.load(Ordering::SeqCst), 2);
        assert_eq!(exchange.state(), ExchangeState::Done);
    }

    #[tokio::test]
    async fn per_attempt_timeout_is_passed_through() {
        let transport = Scripted::new(vec![Ok(Attempt::Reply(vec![0]))]);
        let mut exchange = Exchange::new(transport, server(), Duration::from_millis(750), 1).unwrap();
        assert_eq!(exchange.timeout(), Duration::from_millis(750));
        assert_eq!(exchange.max_retries(), 1);

        exchange.send(&[0u8; 12]).await.unwrap();
        let seen = *exchange.transport().seen_timeout.lock().unwrap();
        assert_eq!(seen, Some(Duration::from_millis(750)));
    }

    #[tokio::test]
    async fn socket_errors_are_not_retried() {
        let transport = Scripted::new(vec![Err(DnsError::Socket("unreachable".into()))]);
        let mut exchange = Exchange::new(transport, server(), Duration::from_secs(1), 3).unwrap();

        let result = exchange.send(&[0u8; 12]).await;
        assert!(matches!(result, Err(DnsError::Socket(_))));
        assert_eq!(exchange.transport().calls.load(Ordering::SeqCst), 1);
        assert_eq!(exchange.state(), ExchangeState::Failed);
    }

    #[tokio::test]
    async fn udp_attempt_over_ipv6_loopback() {
        // Hosts without IPv6 loopback have nothing to test here.
        let Ok(responder) = UdpSocket::bind((Ipv6Addr::LOCALHOST, 0)).await else {
            return;
        };
        let server = responder.local_addr().unwrap();

        tokio::spawn(async move {
            let mut buf = [0u8; MAX_UDP_PAYLOAD];
            if let Ok((n, from)) = responder.recv_from(&mut buf).await {
                responder.send_to(&buf[..n], from).await.unwrap();
            }
        });

        let outcome = UdpTransport.attempt(server, b"ping", Duration::from_secs(2)).await;
        assert_eq!(outcome, Ok(Attempt::Reply(b"ping".to_vec())));
    }

    #[tokio::test]
    async fn exchange_is_single_use() {
        let transport = Scripted::new(vec![Ok(Attempt::Reply(vec![0]))]);
        let mut exchange = Exchange::new(transport, server(), Duration::from_secs(1), 1).unwrap();
        assert_eq!(exchange.state(), ExchangeState::Idle);
        exchange.send(&[0u8; 12]).await.unwrap();
        assert!(matches!(exchange.send(&[0u8; 12]).await, Err(DnsError::Argument(_))));
    }

    #[test]
    fn zero_budget_is_rejected() {
        assert!(Exchange::new(Scripted::new(Vec::new()), server(), Duration::from_secs(1), 0).is_err());
        assert!(Exchange::new(Scripted::new(Vec::new()), server(), Duration::ZERO, 3).is_err());
    }
}
