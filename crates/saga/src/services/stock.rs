//! Stock service contract and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use super::ServiceError;

/// One line of a batch stock verification request.
#[derive(Debug, Clone, PartialEq)]
pub struct StockCheckItem {
    pub store_id: i64,
    pub product_id: i64,
    pub quantity: u32,
}

/// Available quantity reported for a product.
#[derive(Debug, Clone, PartialEq)]
pub struct StockAvailability {
    pub product_id: i64,
    pub available: u32,
}

/// Result of a batch stock verification.
#[derive(Debug, Clone, PartialEq)]
pub struct StockVerificationOutcome {
    /// True when every requested quantity is available.
    pub verified: bool,
    pub availability: Vec<StockAvailability>,
    /// Product ids whose available quantity is below the requested one.
    pub insufficient: Vec<i64>,
}

/// Trait for stock verification, reservation, and release.
///
/// Reservation and release are single-item operations; the reservation step
/// drives them one line at a time.
#[async_trait]
pub trait StockService: Send + Sync {
    /// Verifies availability for a batch of items.
    async fn verify(
        &self,
        items: Vec<StockCheckItem>,
    ) -> Result<StockVerificationOutcome, ServiceError>;

    /// Reserves a quantity of one product. Returns the reservation ID
    /// issued by the stock service.
    async fn reserve(
        &self,
        store_id: i64,
        product_id: i64,
        quantity: u32,
    ) -> Result<String, ServiceError>;

    /// Releases a previously made reservation.
    async fn release(&self, reservation_id: &str) -> Result<(), ServiceError>;
}

#[derive(Debug, Default)]
struct InMemoryStockState {
    available: HashMap<i64, u32>,
    reservations: HashMap<String, (i64, u32)>,
    next_id: u32,
    fail_verify: Option<ServiceError>,
    transient_verify_failures: u32,
    fail_reserve_product: Option<i64>,
    fail_release: Option<ServiceError>,
}

/// In-memory stock service for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStockService {
    state: Arc<RwLock<InMemoryStockState>>,
}

impl InMemoryStockService {
    /// Creates a new in-memory stock service.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the available quantity for a product.
    pub fn set_available(&self, product_id: i64, quantity: u32) {
        self.state
            .write()
            .unwrap()
            .available
            .insert(product_id, quantity);
    }

    /// Makes every verify call fail with the given error.
    pub fn set_fail_on_verify(&self, error: Option<ServiceError>) {
        self.state.write().unwrap().fail_verify = error;
    }

    /// Makes the next `n` verify calls fail with a retryable 503 before
    /// recovering.
    pub fn set_transient_verify_failures(&self, n: u32) {
        self.state.write().unwrap().transient_verify_failures = n;
    }

    /// Makes reservation fail for one specific product, leaving earlier
    /// lines of the same batch reservable.
    pub fn set_fail_on_reserve_product(&self, product_id: Option<i64>) {
        self.state.write().unwrap().fail_reserve_product = product_id;
    }

    /// Makes every release call fail with the given error.
    pub fn set_fail_on_release(&self, error: Option<ServiceError>) {
        self.state.write().unwrap().fail_release = error;
    }

    /// Returns the number of active reservations.
    pub fn reservation_count(&self) -> usize {
        self.state.read().unwrap().reservations.len()
    }

    /// Returns true if a reservation exists with the given ID.
    pub fn has_reservation(&self, reservation_id: &str) -> bool {
        self.state
            .read()
            .unwrap()
            .reservations
            .contains_key(reservation_id)
    }
}

#[async_trait]
impl StockService for InMemoryStockService {
    async fn verify(
        &self,
        items: Vec<StockCheckItem>,
    ) -> Result<StockVerificationOutcome, ServiceError> {
        let mut state = self.state.write().unwrap();

        if state.transient_verify_failures > 0 {
            state.transient_verify_failures -= 1;
            return Err(ServiceError::Status(503));
        }
        if let Some(error) = &state.fail_verify {
            return Err(error.clone());
        }

        let mut availability = Vec::with_capacity(items.len());
        let mut insufficient = Vec::new();
        for item in &items {
            let available = state.available.get(&item.product_id).copied().unwrap_or(0);
            availability.push(StockAvailability {
                product_id: item.product_id,
                available,
            });
            if available < item.quantity {
                insufficient.push(item.product_id);
            }
        }

        Ok(StockVerificationOutcome {
            verified: insufficient.is_empty(),
            availability,
            insufficient,
        })
    }

    async fn reserve(
        &self,
        _store_id: i64,
        product_id: i64,
        quantity: u32,
    ) -> Result<String, ServiceError> {
        let mut state = self.state.write().unwrap();

        if state.fail_reserve_product == Some(product_id) {
            return Err(ServiceError::Rejected(format!(
                "cannot reserve product {product_id}"
            )));
        }

        let available = state.available.get(&product_id).copied().unwrap_or(0);
        if available < quantity {
            return Err(ServiceError::Rejected(format!(
                "insufficient stock for product {product_id}"
            )));
        }

        state.available.insert(product_id, available - quantity);
        state.next_id += 1;
        let reservation_id = format!("RSV-{:04}", state.next_id);
        state
            .reservations
            .insert(reservation_id.clone(), (product_id, quantity));

        Ok(reservation_id)
    }

    async fn release(&self, reservation_id: &str) -> Result<(), ServiceError> {
        let mut state = self.state.write().unwrap();

        if let Some(error) = &state.fail_release {
            return Err(error.clone());
        }

        if let Some((product_id, quantity)) = state.reservations.remove(reservation_id) {
            let available = state.available.get(&product_id).copied().unwrap_or(0);
            state.available.insert(product_id, available + quantity);
        }
        Ok(())
    }
}
