use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

use crate::domain::ports::PaymentGatewayRef;
use crate::error::{RegistrationError, Result};

/// Converts integer minor-unit amounts between currencies using the rates and
/// multipliers served by the payment gateway.
///
/// All arithmetic happens on minor units and is rounded exactly once, at the
/// end, to the nearest integer with ties away from zero.
pub struct CurrencyConverter {
    gateway: PaymentGatewayRef,
}

impl CurrencyConverter {
    pub fn new(gateway: PaymentGatewayRef) -> Self {
        Self { gateway }
    }

    /// Converts `amount_minor` from `from` to `to`. Identity when the
    /// currencies match. Any failure to obtain a rate or multiplier is
    /// `RateUnavailable`; callers must treat that as blocking and never
    /// substitute zero.
    pub async fn convert(&self, from: &str, to: &str, amount_minor: i64) -> Result<i64> {
        if from == to {
            return Ok(amount_minor);
        }

        let unavailable = || RegistrationError::RateUnavailable {
            from: from.to_string(),
            to: to.to_string(),
        };

        let rates = self
            .gateway
            .exchange_rates(from)
            .await
            .map_err(|_| unavailable())?;
        let rate = *rates.get(to).ok_or_else(unavailable)?;

        let multipliers = self
            .gateway
            .currency_multipliers()
            .await
            .map_err(|_| unavailable())?;
        let from_mult = *multipliers.get(from).ok_or_else(unavailable)?;
        let to_mult = *multipliers.get(to).ok_or_else(unavailable)?;

        let major = Decimal::from(amount_minor) / Decimal::from(from_mult);
        let converted = major * rate * Decimal::from(to_mult);
        converted
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
            .to_i64()
            .ok_or_else(unavailable)
    }
}
