//! Sale request types and structural validation.

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Comparison tolerance for monetary amounts.
pub const AMOUNT_TOLERANCE: f64 = 0.01;

/// One line of a sale: a product and how many units at what price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaleLine {
    pub product_id: i64,
    pub quantity: u32,
    pub unit_price: f64,
}

impl SaleLine {
    pub fn new(product_id: i64, quantity: u32, unit_price: f64) -> Self {
        Self {
            product_id,
            quantity,
            unit_price,
        }
    }

    /// Line subtotal: quantity * unit price.
    pub fn subtotal(&self) -> f64 {
        f64::from(self.quantity) * self.unit_price
    }
}

/// The immutable input of a saga: who buys what, where.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaleRequest {
    pub user_id: i64,
    pub store_id: i64,
    pub lines: Vec<SaleLine>,
}

impl SaleRequest {
    pub fn new(user_id: i64, store_id: i64, lines: Vec<SaleLine>) -> Self {
        Self {
            user_id,
            store_id,
            lines,
        }
    }

    /// Checks the structural invariants the orchestrator enforces before
    /// creating any persisted saga: positive user and store ids, at least
    /// one line, positive quantities, non-negative prices.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.user_id <= 0 {
            return Err(DomainError::InvalidRequest(
                "user_id must be positive".to_string(),
            ));
        }
        if self.store_id <= 0 {
            return Err(DomainError::InvalidRequest(
                "store_id must be positive".to_string(),
            ));
        }
        if self.lines.is_empty() {
            return Err(DomainError::InvalidRequest(
                "sale must contain at least one line".to_string(),
            ));
        }
        for line in &self.lines {
            if line.product_id <= 0 {
                return Err(DomainError::InvalidRequest(format!(
                    "product_id must be positive, got {}",
                    line.product_id
                )));
            }
            if line.quantity == 0 {
                return Err(DomainError::InvalidRequest(format!(
                    "quantity must be positive for product {}",
                    line.product_id
                )));
            }
            if line.unit_price < 0.0 || !line.unit_price.is_finite() {
                return Err(DomainError::InvalidRequest(format!(
                    "unit_price must be a non-negative number for product {}",
                    line.product_id
                )));
            }
        }
        Ok(())
    }

    /// Sum of all line subtotals.
    pub fn total_amount(&self) -> f64 {
        self.lines.iter().map(SaleLine::subtotal).sum()
    }
}

/// Compares two monetary amounts within [`AMOUNT_TOLERANCE`].
pub fn amounts_match(a: f64, b: f64) -> bool {
    (a - b).abs() <= AMOUNT_TOLERANCE
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_request() -> SaleRequest {
        SaleRequest::new(1, 1, vec![SaleLine::new(1, 2, 10.0)])
    }

    #[test]
    fn test_valid_request_passes() {
        assert!(valid_request().validate().is_ok());
    }

    #[test]
    fn test_non_positive_ids_rejected() {
        let mut req = valid_request();
        req.user_id = 0;
        assert!(req.validate().is_err());

        let mut req = valid_request();
        req.store_id = -5;
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_empty_lines_rejected() {
        let req = SaleRequest::new(1, 1, vec![]);
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_zero_quantity_rejected() {
        let req = SaleRequest::new(1, 1, vec![SaleLine::new(1, 0, 10.0)]);
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_negative_price_rejected() {
        let req = SaleRequest::new(1, 1, vec![SaleLine::new(1, 1, -0.01)]);
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_nan_price_rejected() {
        let req = SaleRequest::new(1, 1, vec![SaleLine::new(1, 1, f64::NAN)]);
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_total_amount() {
        let req = SaleRequest::new(
            1,
            1,
            vec![SaleLine::new(1, 2, 10.0), SaleLine::new(2, 1, 5.5)],
        );
        assert!(amounts_match(req.total_amount(), 25.5));
    }

    #[test]
    fn test_amounts_match_tolerance() {
        assert!(amounts_match(20.0, 20.009));
        assert!(!amounts_match(20.0, 20.02));
    }
}
