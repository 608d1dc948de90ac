//! Retry-until-success helpers for application start-up.
//!
//! [`ConnectionManager`] never retries on its own beyond the modem probe;
//! these loops are the unbounded policy applications usually want at boot.

use embassy_time::{Duration, Timer};

use crate::connection::{BrokerOptions, ConnectionManager, Credentials};
use crate::error::Error;
use crate::transport::ModemTransport;

/// Delay between two connection attempts.
pub const RETRY_DELAY: Duration = Duration::from_millis(1000);

/// Join the network, retrying every `delay` until it works.
/// An already established session counts as success. Returns the number
/// of failed attempts.
pub async fn connect_until_successful<T: ModemTransport>(
    manager: &mut ConnectionManager<'_, T>,
    credentials: &Credentials<'_>,
    delay: Duration,
) -> u32 {
    let mut failures = 0;
    loop {
        let e = match manager.connect(credentials).await {
            Ok(()) | Err(Error::AlreadyConnected) => break,
            Err(e) => e,
        };
        failures += 1;
        warn!("bringup: join attempt {} failed: {}", failures, e.describe());
        Timer::after(delay).await;
    }
    info!("bringup: network up after {} failed attempts", failures);
    failures
}

/// Open the broker session, retrying every `delay` until it works.
/// An already established session counts as success. Returns the number
/// of failed attempts.
pub async fn connect_broker_until_successful<T: ModemTransport>(
    manager: &mut ConnectionManager<'_, T>,
    broker: &BrokerOptions<'_>,
    delay: Duration,
) -> u32 {
    let mut failures = 0;
    loop {
        let e = match manager.connect_broker(broker).await {
            Ok(()) | Err(Error::AlreadyConnected) => break,
            Err(e) => e,
        };
        failures += 1;
        warn!("bringup: broker attempt {} failed: {}", failures, e.describe());
        Timer::after(delay).await;
    }
    info!("bringup: broker session up after {} failed attempts", failures);
    failures
}
