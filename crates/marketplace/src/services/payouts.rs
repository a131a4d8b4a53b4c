//! Farmer earnings and payout requests.
//!
//! Earnings are computed remotely by the `get_farmer_earnings` database
//! function. A payout request is only accepted while it fits the available
//! balance; approving and sending the money happens outside the marketplace.

use std::sync::Arc;

use rural_grow_core::{PayoutStatus, Price, UserId};
use serde_json::json;
use thiserror::Error;
use tracing::{info, instrument};

use crate::baas::{
    AccessToken, BaasError, DataApi, EarningsSummary, Order, PaymentMethod, PayoutRequest, Query,
};

const PAYOUTS: &str = "payout_requests";
const EARNINGS_FUNCTION: &str = "get_farmer_earnings";

/// Errors from payout operations.
#[derive(Debug, Error)]
pub enum PayoutError {
    /// Input rejected before any remote call.
    #[error("invalid payout: {0}")]
    Invalid(String),

    #[error("requested {requested} exceeds available balance {available}")]
    InsufficientBalance { requested: Price, available: Price },

    #[error(transparent)]
    Baas(#[from] BaasError),
}

/// Earnings and payout request access.
#[derive(Clone)]
pub struct Payouts {
    data: Arc<dyn DataApi>,
}

impl Payouts {
    #[must_use]
    pub fn new(data: Arc<dyn DataApi>) -> Self {
        Self { data }
    }

    /// Earned, available and pending totals for `farmer`.
    ///
    /// # Errors
    ///
    /// Returns `PayoutError::Baas` if the database function fails.
    pub async fn summary(
        &self,
        farmer: UserId,
        token: Option<&AccessToken>,
    ) -> Result<EarningsSummary, PayoutError> {
        let value = self
            .data
            .rpc(EARNINGS_FUNCTION, json!({ "farmer_id": farmer }), token)
            .await?;
        if value.is_null() {
            return Ok(EarningsSummary::default());
        }
        Ok(serde_json::from_value(value).map_err(BaasError::from)?)
    }

    /// Payout requests made by `farmer`, newest first.
    ///
    /// # Errors
    ///
    /// Returns `PayoutError::Baas` if the lookup fails.
    pub async fn payout_requests(
        &self,
        farmer: UserId,
        token: Option<&AccessToken>,
    ) -> Result<Vec<PayoutRequest>, PayoutError> {
        let query = Query::table(PAYOUTS)
            .eq("farmer_id", farmer)
            .order("created_at", Order::Desc);
        Ok(self.data.select_as(&query, token).await?)
    }

    /// Ask for `amount` of the available balance to be paid out.
    ///
    /// # Errors
    ///
    /// Returns `PayoutError::Invalid` for a non-positive amount or blank
    /// account details, `PayoutError::InsufficientBalance` if the amount
    /// exceeds the available balance, or `PayoutError::Baas` if a remote call
    /// fails.
    #[instrument(skip(self, amount, method, token), fields(%amount))]
    pub async fn request_payout(
        &self,
        farmer: UserId,
        amount: Price,
        method: PaymentMethod,
        token: Option<&AccessToken>,
    ) -> Result<PayoutRequest, PayoutError> {
        if amount <= Price::ZERO {
            return Err(PayoutError::Invalid("amount must be positive".to_owned()));
        }
        validate_method(&method)?;

        let available = self.summary(farmer, token).await?.available_balance;
        if amount > available {
            return Err(PayoutError::InsufficientBalance {
                requested: amount,
                available,
            });
        }

        let row = json!({
            "farmer_id": farmer,
            "amount": amount,
            "status": PayoutStatus::Pending,
            "payment_method": method,
        });
        let created = self
            .data
            .insert(PAYOUTS, vec![row], token)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| PayoutError::Invalid("payout request was not stored".to_owned()))?;
        let created: PayoutRequest = serde_json::from_value(created).map_err(BaasError::from)?;

        info!(payout_id = %created.id, "Payout requested");
        Ok(created)
    }
}

fn validate_method(method: &PaymentMethod) -> Result<(), PayoutError> {
    let PaymentMethod::BankTransfer {
        account_name,
        account_number,
        bank_name,
    } = method;
    for (field, value) in [
        ("account name", account_name),
        ("account number", account_number),
        ("bank name", bank_name),
    ] {
        if value.trim().is_empty() {
            return Err(PayoutError::Invalid(format!("{field} is required")));
        }
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::baas::memory::MemoryBackend;

    fn bank() -> PaymentMethod {
        PaymentMethod::BankTransfer {
            account_name: "Wanjiru Kamau".to_owned(),
            account_number: "0123456789".to_owned(),
            bank_name: "Equity Bank".to_owned(),
        }
    }

    fn sold(backend: &MemoryBackend, farmer: UserId, total: u32, status: &str) {
        backend.insert_row(
            "orders",
            json!({
                "buyer_id": UserId::generate(),
                "farmer_id": farmer,
                "quantity": 1,
                "total_price": total,
                "status": status,
            }),
        );
    }

    #[tokio::test]
    async fn test_summary_splits_earned_and_pending() {
        let backend = MemoryBackend::new();
        let farmer = UserId::generate();
        sold(&backend, farmer, 1000, "delivered");
        sold(&backend, farmer, 300, "shipped");
        sold(&backend, farmer, 50, "cancelled");
        sold(&backend, UserId::generate(), 9000, "delivered");

        let summary = Payouts::new(Arc::new(backend))
            .summary(farmer, None)
            .await
            .unwrap();

        assert_eq!(summary.total_earnings, Price::from_units(1000));
        assert_eq!(summary.available_balance, Price::from_units(1000));
        assert_eq!(summary.pending_balance, Price::from_units(300));
    }

    #[tokio::test]
    async fn test_payout_reduces_available_balance() {
        let backend = MemoryBackend::new();
        let farmer = UserId::generate();
        sold(&backend, farmer, 1000, "delivered");
        let payouts = Payouts::new(Arc::new(backend.clone()));

        let created = payouts
            .request_payout(farmer, Price::from_units(400), bank(), None)
            .await
            .unwrap();

        assert_eq!(created.status, PayoutStatus::Pending);
        assert_eq!(created.payment_method, bank());
        assert_eq!(backend.rows(PAYOUTS)[0]["payment_method"]["type"], "bank_transfer");
        let summary = payouts.summary(farmer, None).await.unwrap();
        assert_eq!(summary.available_balance, Price::from_units(600));
        assert_eq!(payouts.payout_requests(farmer, None).await.unwrap(), vec![created]);
    }

    #[tokio::test]
    async fn test_payout_above_balance_is_refused() {
        let backend = MemoryBackend::new();
        let farmer = UserId::generate();
        sold(&backend, farmer, 500, "delivered");
        let payouts = Payouts::new(Arc::new(backend.clone()));

        let err = payouts
            .request_payout(farmer, Price::from_units(501), bank(), None)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PayoutError::InsufficientBalance { available, .. } if available == Price::from_units(500)
        ));
        assert!(backend.rows(PAYOUTS).is_empty());
    }

    #[tokio::test]
    async fn test_invalid_payout_is_rejected_locally() {
        let backend = MemoryBackend::new();
        let farmer = UserId::generate();
        backend.fail_table(EARNINGS_FUNCTION, 1);
        let payouts = Payouts::new(Arc::new(backend.clone()));
        let blank_bank = PaymentMethod::BankTransfer {
            account_name: "Wanjiru Kamau".to_owned(),
            account_number: " ".to_owned(),
            bank_name: "Equity Bank".to_owned(),
        };

        assert!(matches!(
            payouts.request_payout(farmer, Price::ZERO, bank(), None).await,
            Err(PayoutError::Invalid(_))
        ));
        assert!(matches!(
            payouts
                .request_payout(farmer, Price::from_units(10), blank_bank, None)
                .await,
            Err(PayoutError::Invalid(_))
        ));
        // The earnings function was never reached
        assert!(matches!(
            payouts.summary(farmer, None).await,
            Err(PayoutError::Baas(_))
        ));
    }
}
