//! Append-only audit record of saga state transitions.

use chrono::{DateTime, Utc};
use common::SagaId;
use domain::SagaState;
use serde::{Deserialize, Serialize};

/// One row of the saga audit trail.
///
/// Created once per state transition and never mutated afterwards. The
/// orchestration core reads it back only for history queries; control flow
/// never depends on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SagaStepLog {
    pub saga_id: SagaId,
    pub step_name: String,
    pub from_state: SagaState,
    pub to_state: SagaState,
    pub timestamp: DateTime<Utc>,
    pub duration_ms: u64,
    pub success: bool,
    pub error: Option<String>,
}

impl SagaStepLog {
    /// Creates a log row stamped with the current time.
    pub fn new(
        saga_id: SagaId,
        step_name: impl Into<String>,
        from_state: SagaState,
        to_state: SagaState,
        duration_ms: u64,
        success: bool,
        error: Option<String>,
    ) -> Self {
        Self {
            saga_id,
            step_name: step_name.into(),
            from_state,
            to_state,
            timestamp: Utc::now(),
            duration_ms,
            success,
            error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_stamps_timestamp() {
        let before = Utc::now();
        let log = SagaStepLog::new(
            SagaId::new(1),
            "stock_verification",
            SagaState::Initiated,
            SagaState::StockVerifying,
            12,
            true,
            None,
        );
        assert!(log.timestamp >= before);
        assert_eq!(log.step_name, "stock_verification");
        assert!(log.success);
        assert!(log.error.is_none());
    }

    #[test]
    fn test_serialization_roundtrip() {
        let log = SagaStepLog::new(
            SagaId::new(3),
            "payment_processing",
            SagaState::PaymentProcessing,
            SagaState::PaymentFailed,
            250,
            false,
            Some("payment declined".to_string()),
        );
        let json = serde_json::to_string(&log).unwrap();
        let deserialized: SagaStepLog = serde_json::from_str(&json).unwrap();
        assert_eq!(log, deserialized);
    }
}
