//! Per-IP token-bucket limiter (§4.12). A direct translation of the Go
//! original's `core/utils/limiter/limiter.go` (`IPRateLimiter`, a
//! mutex-guarded `map[string]*rate.Limiter` with lazy per-IP allocation),
//! using `governor` for the bucket and `dashmap` in place of the
//! mutex+map pair.

use std::net::IpAddr;
use std::num::NonZeroU32;
use std::sync::Arc;

use dashmap::DashMap;
use governor::{Quota, RateLimiter};
use nonzero_ext::nonzero;

type IpLimiter = RateLimiter<governor::state::NotKeyed, governor::state::InMemoryState, governor::clock::DefaultClock>;

pub struct IpRateLimiter {
    quota: Quota,
    buckets: DashMap<IpAddr, Arc<IpLimiter>>,
}

impl IpRateLimiter {
    pub fn new(requests_per_second: u32, burst: u32) -> Self {
        let rps = NonZeroU32::new(requests_per_second).unwrap_or(nonzero!(1u32));
        let burst = NonZeroU32::new(burst).unwrap_or(rps);
        let quota = Quota::per_second(rps).allow_burst(burst);
        IpRateLimiter { quota, buckets: DashMap::new() }
    }

    fn bucket_for(&self, ip: IpAddr) -> Arc<IpLimiter> {
        self.buckets.entry(ip).or_insert_with(|| Arc::new(RateLimiter::direct(self.quota))).clone()
    }

    /// `true` when `ip` is allowed to proceed right now.
    pub fn check(&self, ip: IpAddr) -> bool {
        self.bucket_for(ip).check().is_ok()
    }
}

/// Extracts the client address per §4.1: first entry of `X-Forwarded-For`,
/// falling back to the socket's remote address.
pub fn client_ip(forwarded_for: Option<&str>, remote: IpAddr) -> IpAddr {
    forwarded_for
        .and_then(|header| header.split(',').next())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .and_then(|s| s.parse().ok())
        .unwrap_or(remote)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_burst_then_throttles() {
        let limiter = IpRateLimiter::new(1, 2);
        let ip: IpAddr = "127.0.0.1".parse().unwrap();
        assert!(limiter.check(ip));
        assert!(limiter.check(ip));
        assert!(!limiter.check(ip));
    }

    #[test]
    fn per_ip_buckets_are_independent() {
        let limiter = IpRateLimiter::new(1, 1);
        let a: IpAddr = "127.0.0.1".parse().unwrap();
        let b: IpAddr = "127.0.0.2".parse().unwrap();
        assert!(limiter.check(a));
        assert!(!limiter.check(a));
        assert!(limiter.check(b));
    }

    #[test]
    fn client_ip_prefers_forwarded_for_header() {
        let remote: IpAddr = "10.0.0.1".parse().unwrap();
        assert_eq!(client_ip(Some("203.0.113.7, 10.0.0.1"), remote), "203.0.113.7".parse::<IpAddr>().unwrap());
        assert_eq!(client_ip(None, remote), remote);
        assert_eq!(client_ip(Some(""), remote), remote);
    }
}
