//! Price Poller: keeps the session's price quote fresh.
//!
//! Each tick awaits its request before the next tick is taken, so requests
//! never overlap. Ticks missed while a slow request is outstanding are skipped.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::backend_client::ExchangeBackend;
use crate::config::PollingConfig;
use crate::errors::WalletResult;
use crate::session::SessionManager;
use crate::wallet_error;

const MIN_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Clone)]
pub struct PricePoller {
    backend: Arc<dyn ExchangeBackend>,
    session: SessionManager,
    interval: Duration,
    scale: u64,
}

impl PricePoller {
    pub fn new(
        backend: Arc<dyn ExchangeBackend>,
        session: SessionManager,
        interval: Duration,
        scale: u64,
    ) -> Self {
        Self {
            backend,
            session,
            interval: interval.max(MIN_INTERVAL),
            scale: scale.max(1),
        }
    }

    pub fn from_config(
        backend: Arc<dyn ExchangeBackend>,
        session: SessionManager,
        config: &PollingConfig,
    ) -> Self {
        Self::new(backend, session, config.price_interval(), config.price_scale)
    }

    /// Fetch the price once and store it. A failure leaves the previous quote
    /// in place, marked stale.
    pub async fn poll_once(&self) -> WalletResult<f64> {
        let result = self.fetch_price().await;
        match &result {
            Ok(price) => {
                log::debug!("Price updated: {}", price);
                self.session.set_quote(*price);
            }
            Err(err) => {
                log::warn!("Price fetch failed: {}", err);
                self.session.mark_quote_stale();
            }
        }
        result
    }

    async fn fetch_price(&self) -> WalletResult<f64> {
        let response = self.backend.get_price().await?;
        if !response.success {
            return Err(wallet_error!(
                InvalidResponse,
                "Backend reported the price as unavailable"
            ));
        }
        Ok(response.price as f64 / self.scale as f64)
    }

    /// Start polling on the current runtime.
    pub fn spawn(self) -> PollerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        log::info!(
            "Starting price poller, will run every {} seconds",
            self.interval.as_secs_f64()
        );
        let task = tokio::spawn(self.run(shutdown_rx));
        PollerHandle {
            shutdown: shutdown_tx,
            task,
        }
    }

    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {}
            }

            tokio::select! {
                _ = shutdown.changed() => {
                    log::debug!("Price poll cancelled by shutdown");
                    break;
                }
                _ = self.poll_once() => {}
            }
        }

        log::info!("Price poller stopped");
    }
}

/// Running poller. Dropping the handle stops it as well.
pub struct PollerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl PollerHandle {
    /// Stop polling, cancelling a request that is still in flight.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            if !e.is_cancelled() {
                log::error!("Price poller task failed: {}", e);
            }
        }
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::types::PriceResponse;
    use crate::errors::WalletError;
    use crate::mock::MockBackend;

    fn poller(backend: Arc<MockBackend>, session: SessionManager) -> PricePoller {
        PricePoller::new(backend, session, Duration::from_millis(10), 100)
    }

    #[tokio::test]
    async fn price_is_scaled_by_one_hundred() {
        let backend = Arc::new(MockBackend::new());
        backend.set_price(250);
        let session = SessionManager::new();

        let price = poller(backend, session.clone()).poll_once().await.unwrap();
        assert_eq!(price, 2.5);
        assert_eq!(session.quote().unwrap().price, 2.5);
    }

    #[tokio::test]
    async fn unsuccessful_price_keeps_previous_quote() {
        let backend = Arc::new(MockBackend::new());
        let session = SessionManager::new();
        let poller = poller(backend.clone(), session.clone());

        backend.set_price(250);
        poller.poll_once().await.unwrap();

        backend.set_price_response(Ok(PriceResponse {
            price: 999,
            success: false,
        }));
        assert!(poller.poll_once().await.is_err());

        let quote = session.quote().unwrap();
        assert_eq!(quote.price, 2.5);
        assert!(quote.stale);
    }

    #[tokio::test]
    async fn network_failure_marks_quote_stale() {
        let backend = Arc::new(MockBackend::new());
        let session = SessionManager::new();
        let poller = poller(backend.clone(), session.clone());

        poller.poll_once().await.unwrap();
        backend.set_price_response(Err(WalletError::ConnectionTimeout));
        assert_eq!(poller.poll_once().await, Err(WalletError::ConnectionTimeout));
        assert!(session.quote().unwrap().stale);

        backend.set_price(300);
        poller.poll_once().await.unwrap();
        let quote = session.quote().unwrap();
        assert_eq!(quote.price, 3.0);
        assert!(!quote.stale);
    }

    #[tokio::test]
    async fn spawned_poller_updates_until_stopped() {
        let backend = Arc::new(MockBackend::new());
        backend.set_price(150);
        let session = SessionManager::new();
        let handle = poller(backend.clone(), session.clone()).spawn();

        for _ in 0..200 {
            if backend.price_calls() >= 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(backend.price_calls() >= 2);
        assert_eq!(session.quote().unwrap().price, 1.5);
        assert!(handle.is_running());

        handle.stop().await;
        let calls = backend.price_calls();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(backend.price_calls(), calls);
    }

    #[tokio::test]
    async fn dropped_handle_stops_polling() {
        let backend = Arc::new(MockBackend::new());
        let handle = poller(backend.clone(), SessionManager::new()).spawn();

        for _ in 0..200 {
            if backend.price_calls() >= 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        drop(handle);
        tokio::time::sleep(Duration::from_millis(30)).await;
        let calls = backend.price_calls();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(backend.price_calls(), calls);
    }

    #[tokio::test]
    async fn zero_interval_is_clamped() {
        let backend = Arc::new(MockBackend::new());
        backend.set_price(250);
        let session = SessionManager::new();
        let handle =
            PricePoller::new(backend.clone(), session.clone(), Duration::ZERO, 100).spawn();

        for _ in 0..200 {
            if session.quote().is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(handle.is_running());
        assert_eq!(session.quote().unwrap().price, 2.5);
        handle.stop().await;
    }

    #[tokio::test]
    async fn slow_requests_do_not_overlap() {
        let backend = Arc::new(MockBackend::new());
        backend.set_price_delay(Duration::from_millis(60));
        let session = SessionManager::new();
        let handle = poller(backend.clone(), session.clone()).spawn();

        tokio::time::sleep(Duration::from_millis(150)).await;
        handle.stop().await;

        // Overlapping requests on a 10ms interval would number in the tens.
        assert!(backend.price_calls() <= 4, "calls: {}", backend.price_calls());
    }

    #[tokio::test]
    async fn stop_cancels_request_in_flight() {
        let backend = Arc::new(MockBackend::new());
        backend.set_price(400);
        backend.set_price_delay(Duration::from_secs(30));
        let session = SessionManager::new();
        let handle = poller(backend.clone(), session.clone()).spawn();

        for _ in 0..200 {
            if backend.price_calls() >= 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        tokio::time::timeout(Duration::from_secs(5), handle.stop())
            .await
            .expect("stop should not wait for the pending request");
        assert!(session.quote().is_none());
    }
}
