use std::time::Duration;

#[derive(Clone)]
pub struct ClientConfig {
    pub timeout: TimeoutSetting,
    /// How many unconsumed messages may be in flight per call direction
    /// before send suspends.
    pub window: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self { timeout: TimeoutSetting::default(), window: 32 }
    }
}

#[derive(Clone)]
pub struct ServerConfig {
    pub timeout: TimeoutSetting,
    /// Same bound as the client-side window, applied to handler-produced responses.
    pub window: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { timeout: TimeoutSetting::default(), window: 32 }
    }
}

#[derive(Clone, Copy)]
pub struct TimeoutSetting {
    /// Per-call budget applied when the caller sets none. None means calls
    /// without an explicit deadline run unbounded.
    pub call_timeout: Option<Duration>,
    /// After a terminal status, how long a session may spend emitting its
    /// final control frame and unwinding before the stream is torn down.
    pub grace: Duration,
    /// How long the server waits for the header frame of a newly opened
    /// call stream.
    pub handshake_timeout: Duration,
}

impl Default for TimeoutSetting {
    fn default() -> Self {
        Self {
            call_timeout: None,
            grace: Duration::from_secs(1),
            handshake_timeout: Duration::from_secs(5),
        }
    }
}
