//! Typed sale context accumulated by successful steps.
//!
//! Each step writes exactly one optional section; sections are only ever
//! added, never removed or replaced, so later steps' preconditions are
//! plain field accesses.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::request::SaleRequest;

/// Per-product outcome of a stock verification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifiedItem {
    pub product_id: i64,
    pub requested: u32,
    pub available: u32,
}

impl VerifiedItem {
    pub fn is_sufficient(&self) -> bool {
        self.available >= self.requested
    }
}

/// Section written by the stock verification step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockVerificationData {
    pub verified: bool,
    pub items: Vec<VerifiedItem>,
    pub verified_at: DateTime<Utc>,
}

/// One reserved line, carrying the reservation id the stock service issued.
///
/// The downstream id is stored at the moment of reservation so compensation
/// never has to re-derive it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReservedItem {
    pub product_id: i64,
    pub quantity: u32,
    pub reservation_id: String,
}

/// Section written by the stock reservation step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockReservationData {
    pub items: Vec<ReservedItem>,
    pub reserved_at: DateTime<Utc>,
}

/// Section written by the payment step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentData {
    pub transaction_id: String,
    pub amount: f64,
    pub processed_at: DateTime<Utc>,
}

/// Section written by the order confirmation step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaleResultData {
    pub sale_id: i64,
    pub total_amount: f64,
    pub confirmed_at: DateTime<Utc>,
}

/// One undo action recorded during a compensation pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompensationAction {
    pub action: String,
    pub data: serde_json::Value,
    pub completed: bool,
    pub recorded_at: DateTime<Utc>,
}

/// Summary written onto the saga when a compensation pass finishes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompensationSummary {
    pub compensated: Vec<String>,
    pub failed: Vec<String>,
    pub requires_manual_intervention: bool,
    pub completed_at: DateTime<Utc>,
}

/// The context fragment a successful step returns, one variant per section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "section", content = "data")]
pub enum StepOutput {
    StockVerification(StockVerificationData),
    StockReservation(StockReservationData),
    Payment(PaymentData),
    SaleResult(SaleResultData),
}

impl StepOutput {
    /// Name of the section this output fills.
    pub fn section(&self) -> &'static str {
        match self {
            StepOutput::StockVerification(_) => "stock_verification",
            StepOutput::StockReservation(_) => "stock_reservation",
            StepOutput::Payment(_) => "payment",
            StepOutput::SaleResult(_) => "sale_result",
        }
    }
}

/// The growing, append-only record a saga carries through its pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaleContext {
    pub sale_request: SaleRequest,
    pub stock_verification: Option<StockVerificationData>,
    pub stock_reservation: Option<StockReservationData>,
    pub payment: Option<PaymentData>,
    pub sale_result: Option<SaleResultData>,
    pub compensation_actions: Vec<CompensationAction>,
}

impl SaleContext {
    pub fn new(sale_request: SaleRequest) -> Self {
        Self {
            sale_request,
            stock_verification: None,
            stock_reservation: None,
            payment: None,
            sale_result: None,
            compensation_actions: Vec::new(),
        }
    }

    /// Merges a step's output into the context.
    ///
    /// Sections are write-once; filling a section twice is an ordering bug
    /// and fails loudly.
    pub fn apply(&mut self, output: StepOutput) -> Result<(), DomainError> {
        let section = output.section();
        let slot_taken = match &output {
            StepOutput::StockVerification(_) => self.stock_verification.is_some(),
            StepOutput::StockReservation(_) => self.stock_reservation.is_some(),
            StepOutput::Payment(_) => self.payment.is_some(),
            StepOutput::SaleResult(_) => self.sale_result.is_some(),
        };
        if slot_taken {
            return Err(DomainError::ContextSectionAlreadySet(section));
        }
        match output {
            StepOutput::StockVerification(data) => self.stock_verification = Some(data),
            StepOutput::StockReservation(data) => self.stock_reservation = Some(data),
            StepOutput::Payment(data) => self.payment = Some(data),
            StepOutput::SaleResult(data) => self.sale_result = Some(data),
        }
        Ok(())
    }

    /// Appends an undo action to the compensation trail.
    pub fn record_compensation_action(&mut self, action: CompensationAction) {
        self.compensation_actions.push(action);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::SaleLine;

    fn context() -> SaleContext {
        SaleContext::new(SaleRequest::new(1, 1, vec![SaleLine::new(1, 2, 10.0)]))
    }

    fn verification() -> StockVerificationData {
        StockVerificationData {
            verified: true,
            items: vec![VerifiedItem {
                product_id: 1,
                requested: 2,
                available: 10,
            }],
            verified_at: Utc::now(),
        }
    }

    #[test]
    fn test_apply_fills_section() {
        let mut ctx = context();
        ctx.apply(StepOutput::StockVerification(verification())).unwrap();
        assert!(ctx.stock_verification.is_some());
    }

    #[test]
    fn test_sections_are_write_once() {
        let mut ctx = context();
        ctx.apply(StepOutput::StockVerification(verification())).unwrap();
        let err = ctx
            .apply(StepOutput::StockVerification(verification()))
            .unwrap_err();
        assert!(matches!(
            err,
            DomainError::ContextSectionAlreadySet("stock_verification")
        ));
        // Original section untouched
        assert!(ctx.stock_verification.unwrap().verified);
    }

    #[test]
    fn test_verified_item_sufficiency() {
        let item = VerifiedItem {
            product_id: 1,
            requested: 2,
            available: 1,
        };
        assert!(!item.is_sufficient());
    }

    #[test]
    fn test_serialization_roundtrip() {
        let mut ctx = context();
        ctx.apply(StepOutput::StockVerification(verification())).unwrap();
        ctx.record_compensation_action(CompensationAction {
            action: "release_stock".to_string(),
            data: serde_json::json!({"reservation_id": "RSV-1"}),
            completed: true,
            recorded_at: Utc::now(),
        });

        let json = serde_json::to_string(&ctx).unwrap();
        let deserialized: SaleContext = serde_json::from_str(&json).unwrap();
        assert_eq!(ctx, deserialized);
    }
}
