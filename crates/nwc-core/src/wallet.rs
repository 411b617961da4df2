//! The boundary between the provider and whatever actually moves sats:
//! a single [`HostWallet`] trait, analogous to `cdk-common`'s `MintPayment`
//! trait, with a [`fake`] backend analogous to `cdk-fake-wallet` for tests
//! and zero-config development.
//!
//! Every method is keyed by `wallet_id`, the named sub-account a
//! [`crate::store::ClientKey`] is bound to: a host wallet backend may serve
//! several distinct ledgers behind one process, and nothing upstream of this
//! trait should need to know that.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// The state of a previously-initiated payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentState {
    /// Settled on the host wallet's ledger.
    Settled,
    /// Not yet settled, not yet known to have failed.
    Pending,
    /// Will never settle.
    Failed,
}

/// Result of a successful `pay_invoice`/`multi_pay_invoice` leg.
///
/// `preimage` may be empty: some backends report a payment as accepted
/// before it settles. Callers must treat an empty `preimage` as "poll
/// [`HostWallet::check_transaction_status`] for the final result", not as
/// failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentResult {
    /// Preimage of the paid invoice, hex. Empty if not yet known.
    pub preimage: String,
    /// Fee actually charged, in millisatoshis.
    pub fees_paid_msats: u64,
}

/// A single entry in the host wallet's transaction history, as returned by
/// `list_transactions`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    /// `"incoming"` or `"outgoing"`.
    pub transaction_type: String,
    /// Bolt11 invoice string, if one exists for this transaction.
    pub invoice: Option<String>,
    /// Payment hash, hex.
    pub payment_hash: String,
    /// Amount, in millisatoshis.
    pub amount_msats: u64,
    /// Routing fees, in millisatoshis.
    pub fees_msats: u64,
    /// Invoice description, if any.
    pub description: Option<String>,
    /// Preimage, if settled.
    pub preimage: Option<String>,
    /// Seconds since epoch the transaction was created.
    pub created_at: u64,
    /// Seconds since epoch the transaction settled, if it has.
    pub settled_at: Option<u64>,
}

/// Whatever system actually custodies funds and moves sats on the provider's
/// behalf, treated as an external collaborator; this trait is the seam.
#[async_trait]
pub trait HostWallet: Send + Sync {
    /// Pay a bolt11 invoice from `wallet_id`'s ledger, up to
    /// `amount_msats_override` for amountless invoices. May return before
    /// the payment settles; see [`PaymentResult`].
    async fn pay_invoice(
        &self,
        wallet_id: &str,
        bolt11: &str,
        amount_msats_override: Option<u64>,
    ) -> Result<PaymentResult, Error>;

    /// Issue an invoice against `wallet_id` for `amount_msats` with the
    /// given `description`, expiring after `expiry_secs`.
    async fn make_invoice(
        &self,
        wallet_id: &str,
        amount_msats: u64,
        description: &str,
        expiry_secs: u64,
    ) -> Result<Transaction, Error>;

    /// Look up a transaction on `wallet_id`'s ledger by payment hash
    /// (incoming or outgoing).
    async fn lookup_invoice(&self, wallet_id: &str, payment_hash: &str) -> Result<Option<Transaction>, Error>;

    /// List `wallet_id`'s transactions, most recent first, filtered by the
    /// given window, `unpaid` inclusion flag, and optional `transaction_type`
    /// (`"incoming"`/`"outgoing"`); `limit`/`offset` paginate the already
    /// filtered result, so every filter must be applied before pagination.
    #[allow(clippy::too_many_arguments)]
    async fn list_transactions(
        &self,
        wallet_id: &str,
        from: Option<u64>,
        until: Option<u64>,
        limit: Option<u64>,
        offset: Option<u64>,
        unpaid: bool,
        transaction_type: Option<&str>,
    ) -> Result<Vec<Transaction>, Error>;

    /// Current balance of `wallet_id`, in millisatoshis.
    async fn get_balance(&self, wallet_id: &str) -> Result<u64, Error>;

    /// Poll for the current state of a payment on `wallet_id`'s ledger by
    /// payment hash. Used to wait out the gap between `pay_invoice`
    /// returning and the payment actually settling.
    async fn check_transaction_status(
        &self,
        wallet_id: &str,
        payment_hash: &str,
    ) -> Result<Option<Transaction>, Error>;
}

/// An in-memory host wallet with per-`wallet_id` balances, instant
/// settlement, and a ledger shared across all wallet ids in one process.
/// Used for tests and zero-config development; mirrors `cdk-fake-wallet`.
pub mod fake {
    use std::collections::HashMap;
    use std::time::{SystemTime, UNIX_EPOCH};

    use bitcoin::hashes::{sha256, Hash};
    use bitcoin::secp256k1::{Secp256k1, SecretKey};
    use lightning_invoice::{Currency, InvoiceBuilder, PaymentSecret};
    use rand::RngCore;
    use tokio::sync::Mutex;

    use super::*;

    fn random_bytes32() -> [u8; 32] {
        let mut bytes = [0u8; 32];
        RngCore::fill_bytes(&mut rand::rngs::OsRng, &mut bytes);
        bytes
    }

    fn now() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock before epoch")
            .as_secs()
    }

    /// See [module docs](self).
    pub struct FakeWallet {
        initial_balance_msats: u64,
        balances: Mutex<HashMap<String, u64>>,
        transactions: Mutex<Vec<(String, Transaction)>>,
    }

    impl FakeWallet {
        /// A fake wallet whose wallet ids start out seeded with
        /// `initial_balance_msats`, assigned lazily on first use.
        pub fn new(initial_balance_msats: u64) -> Self {
            Self {
                initial_balance_msats,
                balances: Mutex::new(HashMap::new()),
                transactions: Mutex::new(Vec::new()),
            }
        }
    }

    impl Default for FakeWallet {
        fn default() -> Self {
            Self::new(u64::MAX / 2)
        }
    }

    #[async_trait]
    impl HostWallet for FakeWallet {
        async fn pay_invoice(
            &self,
            wallet_id: &str,
            bolt11: &str,
            amount_msats_override: Option<u64>,
        ) -> Result<PaymentResult, Error> {
            let invoice: lightning_invoice::Bolt11Invoice = bolt11.parse()?;
            let amount_msats = amount_msats_override
                .or_else(|| invoice.amount_milli_satoshis())
                .ok_or_else(|| Error::PaymentFailed("amountless invoice with no override".into()))?;

            let mut balances = self.balances.lock().await;
            let balance = balances.entry(wallet_id.to_string()).or_insert(self.initial_balance_msats);
            if amount_msats > *balance {
                return Err(Error::PaymentFailed("insufficient balance".into()));
            }
            *balance -= amount_msats;
            drop(balances);

            let preimage = random_bytes32();

            let mut transactions = self.transactions.lock().await;
            transactions.push((
                wallet_id.to_string(),
                Transaction {
                    transaction_type: "outgoing".into(),
                    invoice: Some(bolt11.to_string()),
                    payment_hash: hex::encode(invoice.payment_hash().to_byte_array()),
                    amount_msats,
                    fees_msats: 0,
                    description: Some(invoice.description().to_string()).filter(|d| !d.is_empty()),
                    preimage: Some(hex::encode(preimage)),
                    created_at: now(),
                    settled_at: Some(now()),
                },
            ));

            Ok(PaymentResult {
                preimage: hex::encode(preimage),
                fees_paid_msats: 0,
            })
        }

        async fn make_invoice(
            &self,
            wallet_id: &str,
            amount_msats: u64,
            description: &str,
            expiry_secs: u64,
        ) -> Result<Transaction, Error> {
            let secp = Secp256k1::new();
            let node_secret = SecretKey::new(&mut bitcoin::secp256k1::rand::rngs::OsRng);
            let preimage = random_bytes32();
            let payment_hash = sha256::Hash::hash(&preimage);
            let payment_secret = random_bytes32();

            let invoice = InvoiceBuilder::new(Currency::Bitcoin)
                .description(description.to_string())
                .payment_hash(payment_hash)
                .payment_secret(PaymentSecret(payment_secret))
                .amount_milli_satoshis(amount_msats)
                .current_timestamp()
                .expiry_time(std::time::Duration::from_secs(expiry_secs))
                .min_final_cltv_expiry_delta(18)
                .build_signed(|hash| secp.sign_ecdsa_recoverable(hash, &node_secret))
                .map_err(|e| Error::Wallet(e.to_string()))?;

            let transaction = Transaction {
                transaction_type: "incoming".into(),
                invoice: Some(invoice.to_string()),
                payment_hash: hex::encode(payment_hash.to_byte_array()),
                amount_msats,
                fees_msats: 0,
                description: Some(description.to_string()),
                preimage: None,
                created_at: now(),
                settled_at: None,
            };

            self.balances.lock().await.entry(wallet_id.to_string()).or_insert(self.initial_balance_msats);
            self.transactions
                .lock()
                .await
                .push((wallet_id.to_string(), transaction.clone()));
            Ok(transaction)
        }

        async fn lookup_invoice(&self, wallet_id: &str, payment_hash: &str) -> Result<Option<Transaction>, Error> {
            Ok(self
                .transactions
                .lock()
                .await
                .iter()
                .find(|(w, t)| w == wallet_id && t.payment_hash == payment_hash)
                .map(|(_, t)| t.clone()))
        }

        async fn list_transactions(
            &self,
            wallet_id: &str,
            from: Option<u64>,
            until: Option<u64>,
            limit: Option<u64>,
            offset: Option<u64>,
            unpaid: bool,
            transaction_type: Option<&str>,
        ) -> Result<Vec<Transaction>, Error> {
            let transactions = self.transactions.lock().await;
            let mut filtered: Vec<Transaction> = transactions
                .iter()
                .rev()
                .filter(|(w, _)| w == wallet_id)
                .map(|(_, t)| t)
                .filter(|t| from.is_none_or(|f| t.created_at >= f))
                .filter(|t| until.is_none_or(|u| t.created_at <= u))
                .filter(|t| unpaid || t.settled_at.is_some() || t.transaction_type == "outgoing")
                .filter(|t| transaction_type.is_none_or(|ty| t.transaction_type == ty))
                .cloned()
                .collect();

            if let Some(offset) = offset {
                filtered = filtered.into_iter().skip(offset as usize).collect();
            }
            if let Some(limit) = limit {
                filtered.truncate(limit as usize);
            }
            Ok(filtered)
        }

        async fn get_balance(&self, wallet_id: &str) -> Result<u64, Error> {
            Ok(*self
                .balances
                .lock()
                .await
                .get(wallet_id)
                .unwrap_or(&self.initial_balance_msats))
        }

        async fn check_transaction_status(
            &self,
            wallet_id: &str,
            payment_hash: &str,
        ) -> Result<Option<Transaction>, Error> {
            self.lookup_invoice(wallet_id, payment_hash).await
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        const WALLET: &str = "default";

        #[tokio::test]
        async fn make_then_lookup_invoice() {
            let wallet = FakeWallet::new(0);
            let tx = wallet.make_invoice(WALLET, 21_000, "coffee", 3600).await.unwrap();
            let found = wallet.lookup_invoice(WALLET, &tx.payment_hash).await.unwrap();
            assert_eq!(found.unwrap().amount_msats, 21_000);
        }

        #[tokio::test]
        async fn pay_invoice_respects_balance() {
            let payer = FakeWallet::new(1_000);
            let payee = FakeWallet::new(0);
            let invoice = payee.make_invoice(WALLET, 2_000, "too much", 3600).await.unwrap();

            let err = payer
                .pay_invoice(WALLET, invoice.invoice.as_ref().unwrap(), None)
                .await
                .unwrap_err();
            assert!(matches!(err, Error::PaymentFailed(_)));
        }

        #[tokio::test]
        async fn pay_invoice_deducts_balance_and_returns_preimage() {
            let payer = FakeWallet::new(10_000);
            let payee = FakeWallet::new(0);
            let invoice = payee.make_invoice(WALLET, 2_000, "coffee", 3600).await.unwrap();

            let result = payer
                .pay_invoice(WALLET, invoice.invoice.as_ref().unwrap(), None)
                .await
                .unwrap();
            assert_eq!(result.preimage.len(), 64);
            assert_eq!(payer.get_balance(WALLET).await.unwrap(), 8_000);
        }

        #[tokio::test]
        async fn balances_are_independent_per_wallet_id() {
            let wallet = FakeWallet::new(5_000);
            let invoice = wallet.make_invoice("b", 1_000, "x", 3600).await.unwrap();
            wallet.pay_invoice("a", invoice.invoice.as_ref().unwrap(), None).await.unwrap();

            assert_eq!(wallet.get_balance("a").await.unwrap(), 4_000);
            assert_eq!(wallet.get_balance("b").await.unwrap(), 5_000);
        }

        #[tokio::test]
        async fn list_transactions_is_scoped_to_wallet_id() {
            let wallet = FakeWallet::new(0);
            wallet.make_invoice("a", 1_000, "for a", 3600).await.unwrap();
            wallet.make_invoice("b", 2_000, "for b", 3600).await.unwrap();

            let a_txs = wallet
                .list_transactions("a", None, None, None, None, true, None)
                .await
                .unwrap();
            assert_eq!(a_txs.len(), 1);
            assert_eq!(a_txs[0].amount_msats, 1_000);
        }

        #[tokio::test]
        async fn check_transaction_status_reports_settled_payment() {
            let payer = FakeWallet::new(10_000);
            let payee = FakeWallet::new(0);
            let invoice = payee.make_invoice(WALLET, 2_000, "coffee", 3600).await.unwrap();
            payer
                .pay_invoice(WALLET, invoice.invoice.as_ref().unwrap(), None)
                .await
                .unwrap();

            let status = payer
                .check_transaction_status(WALLET, &invoice.payment_hash)
                .await
                .unwrap();
            assert!(status.unwrap().preimage.is_some());
        }
    }
}
