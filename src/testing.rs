// Test doubles shared by the unit tests

use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

use crate::ledger::client::LedgerClient;
use crate::ledger::models::{ExternalWallet, Transaction, WalletStatus, WalletType};
use crate::ledger::LedgerContext;
use crate::store::{LedgerStores, MemoryLedgerStore, WalletStore};
use crate::wallet::api::{ExternalWalletApi, WalletApiError};

/// Wallet provider with scripted transfer outcomes
///
/// Transfers succeed unless a result was queued with `push_transfer_result`.
/// After `hold_transfers`, each transfer waits for `release_transfer`.
pub struct MockWalletApi {
    transfers: Mutex<Vec<Transaction>>,
    transfer_results: Mutex<VecDeque<Result<String, WalletApiError>>>,
    balance_result: Mutex<Result<Decimal, WalletApiError>>,
    balance_calls: AtomicUsize,
    hold: AtomicBool,
    started: Notify,
    release: Notify,
}

impl MockWalletApi {
    pub fn new() -> Self {
        Self {
            transfers: Mutex::new(Vec::new()),
            transfer_results: Mutex::new(VecDeque::new()),
            balance_result: Mutex::new(Ok(Decimal::ZERO)),
            balance_calls: AtomicUsize::new(0),
            hold: AtomicBool::new(false),
            started: Notify::new(),
            release: Notify::new(),
        }
    }

    pub fn hold_transfers(&self) {
        self.hold.store(true, Ordering::SeqCst);
    }

    /// Waits until a held transfer reached the provider
    pub async fn transfer_started(&self) {
        self.started.notified().await;
    }

    pub fn release_transfer(&self) {
        self.release.notify_one();
    }

    pub fn push_transfer_result(&self, result: Result<String, WalletApiError>) {
        self.transfer_results.lock().push_back(result);
    }

    pub fn set_balance_result(&self, result: Result<Decimal, WalletApiError>) {
        *self.balance_result.lock() = result;
    }

    pub fn transfers(&self) -> Vec<Transaction> {
        self.transfers.lock().clone()
    }

    pub fn balance_calls(&self) -> usize {
        self.balance_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExternalWalletApi for MockWalletApi {
    async fn transfer(
        &self,
        _wallet: &ExternalWallet,
        transaction: &Transaction,
    ) -> Result<String, WalletApiError> {
        let default_id = {
            let mut transfers = self.transfers.lock();
            transfers.push(transaction.clone());
            format!("tx-{}", transfers.len())
        };

        if self.hold.load(Ordering::SeqCst) {
            self.started.notify_one();
            self.release.notified().await;
        }

        self.transfer_results
            .lock()
            .pop_front()
            .unwrap_or(Ok(default_id))
    }

    async fn fetch_balance(&self, _wallet: &ExternalWallet) -> Result<Decimal, WalletApiError> {
        self.balance_calls.fetch_add(1, Ordering::SeqCst);
        self.balance_result.lock().clone()
    }
}

#[derive(Default)]
pub struct RecordingClient {
    notifications: Mutex<Vec<String>>,
    disconnected: Mutex<Vec<WalletType>>,
}

impl RecordingClient {
    pub fn notifications(&self) -> Vec<String> {
        self.notifications.lock().clone()
    }

    pub fn disconnected(&self) -> Vec<WalletType> {
        self.disconnected.lock().clone()
    }
}

impl LedgerClient for RecordingClient {
    fn show_notification(&self, kind: &str, _args: &[String]) {
        self.notifications.lock().push(kind.to_string());
    }

    fn wallet_disconnected(&self, wallet_type: WalletType) {
        self.disconnected.lock().push(wallet_type);
    }
}

pub fn connected_wallet() -> ExternalWallet {
    ExternalWallet {
        wallet_type: WalletType::Uphold,
        address: "a1b2c3d4-card".to_string(),
        token: "token".to_string(),
        status: WalletStatus::Verified,
    }
}

pub struct TestHarness {
    pub context: LedgerContext,
    pub store: Arc<MemoryLedgerStore>,
    pub api: Arc<MockWalletApi>,
    pub client: Arc<RecordingClient>,
}

pub async fn test_context(wallet: Option<ExternalWallet>) -> TestHarness {
    let store = Arc::new(MemoryLedgerStore::new());
    if let Some(wallet) = wallet {
        store.save_external_wallet(wallet).await.unwrap();
    }

    let client = Arc::new(RecordingClient::default());
    let context = LedgerContext::new(LedgerStores::from_backend(store.clone()), client.clone());

    TestHarness {
        context,
        store,
        api: Arc::new(MockWalletApi::new()),
        client,
    }
}
