use crate::error::AppError;
use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};
use governor::{
    clock::{Clock, DefaultClock},
    state::keyed::DashMapStateStore,
    Quota, RateLimiter,
};
use std::{
    fmt,
    net::{IpAddr, SocketAddr},
    num::NonZeroU32,
    str::FromStr,
    sync::Arc,
    time::Duration,
};

/// A request budget per client, written as `<count>/<unit>` (e.g. `60/minute`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    pub requests: u32,
    pub unit: WindowUnit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowUnit {
    Second,
    Minute,
    Hour,
    Day,
}

impl WindowUnit {
    pub fn duration(self) -> Duration {
        match self {
            WindowUnit::Second => Duration::from_secs(1),
            WindowUnit::Minute => Duration::from_secs(60),
            WindowUnit::Hour => Duration::from_secs(60 * 60),
            WindowUnit::Day => Duration::from_secs(24 * 60 * 60),
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            WindowUnit::Second => "second",
            WindowUnit::Minute => "minute",
            WindowUnit::Hour => "hour",
            WindowUnit::Day => "day",
        }
    }
}

impl FromStr for WindowUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unit = s.trim().to_lowercase();
        match unit.trim_end_matches('s') {
            "second" | "sec" => Ok(WindowUnit::Second),
            "minute" | "min" => Ok(WindowUnit::Minute),
            "hour" => Ok(WindowUnit::Hour),
            "day" => Ok(WindowUnit::Day),
            _ => Err(format!("Invalid rate limit unit: {}", s.trim())),
        }
    }
}

impl RateLimit {
    pub fn window(&self) -> Duration {
        self.unit.duration()
    }
}

impl FromStr for RateLimit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (count, unit) = s
            .split_once('/')
            .or_else(|| s.split_once(" per "))
            .ok_or_else(|| format!("Invalid rate limit '{}': expected <count>/<unit>", s))?;

        let requests: u32 = count
            .trim()
            .parse()
            .map_err(|_| format!("Invalid rate limit count: {}", count.trim()))?;
        if requests == 0 {
            return Err(format!("Rate limit count must be positive: {}", s));
        }

        Ok(RateLimit {
            requests,
            unit: unit.parse()?,
        })
    }
}

impl fmt::Display for RateLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.requests, self.unit.as_str())
    }
}

/// Admission check for one client. Implementations hold their own counters
/// and must be safe to share across concurrently running requests.
pub trait ClientRateLimiter: Send + Sync + 'static {
    /// `Ok` admits the request; `Err` carries the wait before the next
    /// request from this client would be admitted.
    fn check(&self, client: IpAddr) -> Result<(), Duration>;

    /// Drops bookkeeping for clients whose budget has fully recovered.
    fn housekeeping(&self) {}
}

pub type SharedRateLimiter = Arc<dyn ClientRateLimiter>;

/// In-process limiter keyed by client IP, backed by governor's GCRA.
pub struct IpRateLimiter {
    inner: RateLimiter<IpAddr, DashMapStateStore<IpAddr>, DefaultClock>,
}

impl IpRateLimiter {
    pub fn new(limit: &RateLimit) -> Result<Self, AppError> {
        let burst = NonZeroU32::new(limit.requests).ok_or_else(|| {
            AppError::ConfigError(anyhow::anyhow!("Rate limit count must be positive"))
        })?;
        let period = limit.window() / limit.requests;
        let quota = Quota::with_period(period)
            .ok_or_else(|| {
                AppError::ConfigError(anyhow::anyhow!(
                    "Rate limit {} leaves no time between requests",
                    limit
                ))
            })?
            .allow_burst(burst);

        Ok(Self {
            inner: RateLimiter::dashmap(quota),
        })
    }
}

impl ClientRateLimiter for IpRateLimiter {
    fn check(&self, client: IpAddr) -> Result<(), Duration> {
        self.inner
            .check_key(&client)
            .map_err(|negative| negative.wait_time_from(DefaultClock::default().now()))
    }

    fn housekeeping(&self) {
        self.inner.retain_recent();
        self.inner.shrink_to_fit();
    }
}

/// Create the default keyed rate limiter (by IP)
pub fn create_ip_rate_limiter(limit: &RateLimit) -> Result<SharedRateLimiter, AppError> {
    Ok(Arc::new(IpRateLimiter::new(limit)?))
}

/// Limiter handed to [`ip_rate_limit_middleware`].
#[derive(Clone)]
pub struct RateLimitState {
    pub limiter: SharedRateLimiter,
    /// Key on the first `x-forwarded-for` hop. Only safe behind a proxy that
    /// overwrites the header; clients can otherwise pick their own key.
    pub trust_forwarded_for: bool,
}

/// Resolves the client address from the peer address recorded by
/// `into_make_service_with_connect_info`. With `trust_forwarded_for`, the
/// first `x-forwarded-for` hop takes precedence.
pub fn client_ip(request: &Request, trust_forwarded_for: bool) -> Option<IpAddr> {
    let forwarded_ip = trust_forwarded_for
        .then(|| request.headers().get("x-forwarded-for"))
        .flatten()
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .and_then(|s| s.trim().parse::<IpAddr>().ok());

    forwarded_ip.or_else(|| {
        request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip())
    })
}

/// Middleware for IP-based rate limiting
pub async fn ip_rate_limit_middleware(
    State(state): State<RateLimitState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    match client_ip(&request, state.trust_forwarded_for) {
        Some(ip) => match state.limiter.check(ip) {
            Ok(()) => Ok(next.run(request).await),
            Err(wait_time) => {
                tracing::warn!(client = %ip, wait_ms = wait_time.as_millis() as u64, "Rate limit exceeded");
                Err(AppError::TooManyRequests(
                    "Rate limit exceeded. Please try again later.".to_string(),
                    Some(wait_time.as_secs_f64().ceil() as u64),
                ))
            }
        },
        None => {
            tracing::warn!("Could not determine IP for rate limiting");
            Ok(next.run(request).await)
        }
    }
}
