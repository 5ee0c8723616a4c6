//! Sale creation service contract and in-memory implementation.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use domain::SaleRequest;

use super::ServiceError;

/// Result of a confirmed sale.
#[derive(Debug, Clone, PartialEq)]
pub struct SaleCreation {
    pub sale_id: i64,
    pub total_amount: f64,
}

/// Trait for creating the final sale record once payment has cleared.
#[async_trait]
pub trait SaleService: Send + Sync {
    /// Creates the sale from the original request, referencing the payment
    /// transaction that funded it.
    async fn create_sale(
        &self,
        request: &SaleRequest,
        transaction_id: &str,
    ) -> Result<SaleCreation, ServiceError>;
}

#[derive(Debug, Default)]
struct InMemorySaleState {
    sales: Vec<SaleCreation>,
    next_id: i64,
    fail_create: Option<ServiceError>,
}

/// In-memory sale service for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemorySaleService {
    state: Arc<RwLock<InMemorySaleState>>,
}

impl InMemorySaleService {
    /// Creates a new in-memory sale service.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every create call fail with the given error.
    pub fn set_fail_on_create(&self, error: Option<ServiceError>) {
        self.state.write().unwrap().fail_create = error;
    }

    /// Returns the number of sales created.
    pub fn sale_count(&self) -> usize {
        self.state.read().unwrap().sales.len()
    }
}

#[async_trait]
impl SaleService for InMemorySaleService {
    async fn create_sale(
        &self,
        request: &SaleRequest,
        _transaction_id: &str,
    ) -> Result<SaleCreation, ServiceError> {
        let mut state = self.state.write().unwrap();

        if let Some(error) = &state.fail_create {
            return Err(error.clone());
        }

        state.next_id += 1;
        let sale = SaleCreation {
            sale_id: state.next_id,
            total_amount: request.total_amount(),
        };
        state.sales.push(sale.clone());

        Ok(sale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::SaleLine;

    #[tokio::test]
    async fn test_create_sale_totals_lines() {
        let service = InMemorySaleService::new();
        let request = SaleRequest::new(1, 1, vec![SaleLine::new(1, 2, 10.0)]);

        let sale = service.create_sale(&request, "TXN-0001").await.unwrap();
        assert_eq!(sale.sale_id, 1);
        assert!((sale.total_amount - 20.0).abs() < f64::EPSILON);
        assert_eq!(service.sale_count(), 1);
    }

    #[tokio::test]
    async fn test_fail_on_create() {
        let service = InMemorySaleService::new();
        service.set_fail_on_create(Some(ServiceError::Status(500)));

        let request = SaleRequest::new(1, 1, vec![SaleLine::new(1, 2, 10.0)]);
        let result = service.create_sale(&request, "TXN-0001").await;
        assert!(matches!(result, Err(ServiceError::Status(500))));
        assert_eq!(service.sale_count(), 0);
    }
}
