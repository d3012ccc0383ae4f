//! WiFi station-mode adapter.
//!
//! Implements [`ConnectivityPort`] — the hexagonal boundary for network
//! connectivity.  The feeder works offline (button feeding, calibration);
//! WiFi only carries the HTTP API, MQTT, and SNTP, so connection failures
//! degrade features rather than block boot.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: real driver calls through
//!   `esp_idf_svc::wifi::BlockingWifi`.
//! - **all other targets**: simulation stubs for host-side tests.
//!
//! ## Reconnection policy
//!
//! After a drop, retries are spaced by a doubling backoff (2 s up to a
//! 60 s ceiling), clocked against monotonic uptime passed into `poll`.

use core::fmt;
use log::{error, info, warn};

// ───────────────────────────────────────────────────────────────
// Port trait
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectivityError {
    NoCredentials,
    InvalidSsid,
    InvalidPassword,
    ConnectionFailed,
    AlreadyConnected,
}

impl fmt::Display for ConnectivityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Self::NoCredentials => "no WiFi credentials configured",
            Self::InvalidSsid => "SSID must be 1-32 printable ASCII bytes",
            Self::InvalidPassword => "password must be 8-64 bytes, or empty for open APs",
            Self::ConnectionFailed => "association with the AP failed",
            Self::AlreadyConnected => "already connected",
        };
        f.write_str(msg)
    }
}

pub trait ConnectivityPort {
    fn connect(&mut self) -> Result<(), ConnectivityError>;
    fn is_connected(&self) -> bool;
    fn poll(&mut self, now_ms: u64);
    fn set_credentials(&mut self, ssid: &str, password: &str) -> Result<(), ConnectivityError>;
}

// ───────────────────────────────────────────────────────────────
// Adapter
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WifiState {
    Disconnected,
    Connected,
    /// Link lost; next attempt due at `retry_at_ms` uptime.
    Reconnecting { attempt: u32, retry_at_ms: u64 },
}

const INITIAL_BACKOFF_SECS: u64 = 2;
const MAX_BACKOFF_SECS: u64 = 60;

pub struct WifiAdapter {
    state: WifiState,
    ssid: heapless::String<32>,
    password: heapless::String<64>,
    backoff_secs: u64,
    #[cfg(target_os = "espidf")]
    driver: esp_idf_svc::wifi::BlockingWifi<esp_idf_svc::wifi::EspWifi<'static>>,
    #[cfg(not(target_os = "espidf"))]
    sim_connects: u32,
}

impl WifiAdapter {
    #[cfg(target_os = "espidf")]
    pub fn new(
        driver: esp_idf_svc::wifi::BlockingWifi<esp_idf_svc::wifi::EspWifi<'static>>,
    ) -> Self {
        Self {
            state: WifiState::Disconnected,
            ssid: heapless::String::new(),
            password: heapless::String::new(),
            backoff_secs: INITIAL_BACKOFF_SECS,
            driver,
        }
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn new() -> Self {
        Self {
            state: WifiState::Disconnected,
            ssid: heapless::String::new(),
            password: heapless::String::new(),
            backoff_secs: INITIAL_BACKOFF_SECS,
            sim_connects: 0,
        }
    }

    pub fn state(&self) -> WifiState {
        self.state
    }

    fn on_connected(&mut self) {
        self.state = WifiState::Connected;
        self.backoff_secs = INITIAL_BACKOFF_SECS;
    }

    fn schedule_retry(&mut self, attempt: u32, now_ms: u64) {
        self.state = WifiState::Reconnecting {
            attempt,
            retry_at_ms: now_ms + self.backoff_secs * 1_000,
        };
        self.backoff_secs = (self.backoff_secs * 2).min(MAX_BACKOFF_SECS);
    }

    // ── Platform-specific ─────────────────────────────────────

    #[cfg(target_os = "espidf")]
    fn platform_connect(&mut self) -> Result<(), ConnectivityError> {
        use esp_idf_svc::wifi::{AuthMethod, ClientConfiguration, Configuration};

        let auth_method = if self.password.is_empty() {
            AuthMethod::None
        } else {
            AuthMethod::WPA2Personal
        };
        let sta = Configuration::Client(ClientConfiguration {
            ssid: self.ssid.clone(),
            password: self.password.clone(),
            auth_method,
            ..Default::default()
        });

        let mut join = || -> Result<(), esp_idf_svc::sys::EspError> {
            self.driver.set_configuration(&sta)?;
            self.driver.start()?;
            self.driver.connect()?;
            self.driver.wait_netif_up()
        };
        join().map_err(|e| {
            warn!("WiFi(espidf): {:?}", e);
            ConnectivityError::ConnectionFailed
        })
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_connect(&mut self) -> Result<(), ConnectivityError> {
        self.sim_connects = self.sim_connects.wrapping_add(1);
        info!(
            "WiFi(sim): joined '{}' (attempt {})",
            self.ssid, self.sim_connects
        );
        Ok(())
    }

    #[cfg(target_os = "espidf")]
    fn platform_is_connected(&self) -> bool {
        self.driver.is_connected().unwrap_or(false)
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_is_connected(&self) -> bool {
        self.state == WifiState::Connected
    }
}

// ───────────────────────────────────────────────────────────────
// ConnectivityPort
// ───────────────────────────────────────────────────────────────

impl ConnectivityPort for WifiAdapter {
    fn connect(&mut self) -> Result<(), ConnectivityError> {
        if self.ssid.is_empty() {
            return Err(ConnectivityError::NoCredentials);
        }
        if self.state == WifiState::Connected {
            return Err(ConnectivityError::AlreadyConnected);
        }

        info!("WiFi: connecting to '{}'", self.ssid);
        match self.platform_connect() {
            Ok(()) => {
                self.on_connected();
                info!("WiFi: connected");
                Ok(())
            }
            Err(e) => {
                error!("WiFi: {}", e);
                self.schedule_retry(0, 0);
                Err(e)
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.platform_is_connected()
    }

    fn poll(&mut self, now_ms: u64) {
        match self.state {
            WifiState::Connected if !self.platform_is_connected() => {
                warn!("WiFi: link lost");
                self.schedule_retry(0, now_ms);
            }
            WifiState::Reconnecting {
                attempt,
                retry_at_ms,
            } if now_ms >= retry_at_ms => {
                info!("WiFi: reconnect attempt {}", attempt + 1);
                if self.platform_connect().is_ok() {
                    self.on_connected();
                    info!("WiFi: reconnected");
                } else {
                    self.schedule_retry(attempt + 1, now_ms);
                }
            }
            _ => {}
        }
    }

    fn set_credentials(&mut self, ssid: &str, password: &str) -> Result<(), ConnectivityError> {
        let printable = |s: &str| s.bytes().all(|b| (0x20..=0x7E).contains(&b));
        if ssid.is_empty() || ssid.len() > 32 || !printable(ssid) {
            return Err(ConnectivityError::InvalidSsid);
        }
        if !password.is_empty() && !(8..=64).contains(&password.len()) {
            return Err(ConnectivityError::InvalidPassword);
        }

        self.ssid = heapless::String::try_from(ssid).map_err(|_| ConnectivityError::InvalidSsid)?;
        self.password = heapless::String::try_from(password)
            .map_err(|_| ConnectivityError::InvalidPassword)?;
        info!("WiFi: credentials set (SSID='{}')", self.ssid);
        Ok(())
    }
}

// ───────────────────────────────────────────────────────────────
// Tests
// ───────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_bad_credentials() {
        let mut a = WifiAdapter::new();
        assert_eq!(
            a.set_credentials("", "password123"),
            Err(ConnectivityError::InvalidSsid)
        );
        assert_eq!(
            a.set_credentials("MyNet", "short"),
            Err(ConnectivityError::InvalidPassword)
        );
        assert_eq!(
            a.set_credentials("MyNet\u{7f}", "password123"),
            Err(ConnectivityError::InvalidSsid)
        );
    }

    #[test]
    fn accepts_open_network_and_wpa2() {
        let mut a = WifiAdapter::new();
        assert!(a.set_credentials("OpenCafe", "").is_ok());
        assert!(a.set_credentials("HomeWiFi", "mysecret8").is_ok());
    }

    #[test]
    fn connect_without_credentials_fails() {
        let mut a = WifiAdapter::new();
        assert_eq!(a.connect(), Err(ConnectivityError::NoCredentials));
    }

    #[test]
    fn connect_and_double_connect() {
        let mut a = WifiAdapter::new();
        a.set_credentials("TestNet", "password1").unwrap();
        a.connect().unwrap();
        assert!(a.is_connected());
        assert_eq!(a.connect(), Err(ConnectivityError::AlreadyConnected));
    }

    #[test]
    fn backoff_doubles_up_to_ceiling() {
        let mut a = WifiAdapter::new();
        let mut delays = vec![];
        for _ in 0..7 {
            delays.push(a.backoff_secs);
            a.schedule_retry(0, 0);
        }
        assert_eq!(delays, vec![2, 4, 8, 16, 32, 60, 60]);
    }

    #[test]
    fn retry_waits_for_its_deadline() {
        let mut a = WifiAdapter::new();
        a.set_credentials("TestNet", "password1").unwrap();
        a.schedule_retry(0, 10_000);
        let WifiState::Reconnecting { retry_at_ms, .. } = a.state() else {
            panic!("expected reconnecting state");
        };
        assert_eq!(retry_at_ms, 12_000);

        // Before the deadline nothing happens; at the deadline it rejoins.
        a.poll(11_000);
        assert!(!a.is_connected());
        a.poll(12_000);
        assert!(a.is_connected());
    }
}
