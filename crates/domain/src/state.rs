//! Saga state machine.

use serde::{Deserialize, Serialize};

/// The state of a sale saga in its lifecycle.
///
/// State transitions:
/// ```text
/// INITIATED ──► STOCK_VERIFYING ──┬──► STOCK_VERIFIED ──► STOCK_RESERVING ──┬──► STOCK_RESERVED
///                                 └──► STOCK_VERIFICATION_FAILED            └──► STOCK_RESERVATION_FAILED
/// STOCK_RESERVED ──► PAYMENT_PROCESSING ──┬──► PAYMENT_PROCESSED ──► ORDER_CONFIRMING ──┬──► SALE_CONFIRMED
///                                         └──► PAYMENT_FAILED                           └──► ORDER_CONFIRMATION_FAILED
/// PAYMENT_FAILED ──► COMPENSATING_STOCK ──┬──► COMPENSATED
///                                         └──► FAILED
/// ORDER_CONFIRMATION_FAILED ──► COMPENSATING_PAYMENT ──► COMPENSATING_STOCK
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SagaState {
    /// Saga created, no step attempted yet.
    Initiated,

    /// Stock verification step in progress.
    StockVerifying,
    /// Stock verification succeeded.
    StockVerified,
    /// Stock verification failed (terminal, nothing to compensate).
    StockVerificationFailed,

    /// Stock reservation step in progress.
    StockReserving,
    /// All requested lines reserved.
    StockReserved,
    /// Stock reservation failed (terminal; the step rolls back its own
    /// partial progress before reporting failure).
    StockReservationFailed,

    /// Payment step in progress.
    PaymentProcessing,
    /// Payment captured.
    PaymentProcessed,
    /// Payment failed; the stock reservation must be compensated.
    PaymentFailed,

    /// Order confirmation step in progress.
    OrderConfirming,
    /// Sale confirmed (terminal success state).
    SaleConfirmed,
    /// Order confirmation failed; payment and stock must be compensated.
    OrderConfirmationFailed,

    /// Refunding the captured payment.
    CompensatingPayment,
    /// Releasing the stock reservation.
    CompensatingStock,
    /// All compensations succeeded (terminal).
    Compensated,
    /// Saga failed; compensation was incomplete or an unexpected error
    /// escaped the pipeline (terminal).
    Failed,
}

impl SagaState {
    /// Every state, in declaration order. Used to exercise the full
    /// transition table in tests.
    pub const ALL: [SagaState; 17] = [
        SagaState::Initiated,
        SagaState::StockVerifying,
        SagaState::StockVerified,
        SagaState::StockVerificationFailed,
        SagaState::StockReserving,
        SagaState::StockReserved,
        SagaState::StockReservationFailed,
        SagaState::PaymentProcessing,
        SagaState::PaymentProcessed,
        SagaState::PaymentFailed,
        SagaState::OrderConfirming,
        SagaState::SaleConfirmed,
        SagaState::OrderConfirmationFailed,
        SagaState::CompensatingPayment,
        SagaState::CompensatingStock,
        SagaState::Compensated,
        SagaState::Failed,
    ];

    /// The statically defined set of states reachable from this one.
    ///
    /// Terminal states return an empty slice.
    pub fn allowed_transitions(&self) -> &'static [SagaState] {
        match self {
            SagaState::Initiated => &[SagaState::StockVerifying],
            SagaState::StockVerifying => &[
                SagaState::StockVerified,
                SagaState::StockVerificationFailed,
            ],
            SagaState::StockVerified => &[SagaState::StockReserving],
            SagaState::StockReserving => &[
                SagaState::StockReserved,
                SagaState::StockReservationFailed,
            ],
            SagaState::StockReserved => &[SagaState::PaymentProcessing],
            SagaState::PaymentProcessing => {
                &[SagaState::PaymentProcessed, SagaState::PaymentFailed]
            }
            SagaState::PaymentProcessed => &[SagaState::OrderConfirming],
            SagaState::OrderConfirming => &[
                SagaState::SaleConfirmed,
                SagaState::OrderConfirmationFailed,
            ],
            SagaState::PaymentFailed => &[SagaState::CompensatingStock],
            SagaState::OrderConfirmationFailed => &[SagaState::CompensatingPayment],
            SagaState::CompensatingPayment => &[SagaState::CompensatingStock],
            SagaState::CompensatingStock => &[SagaState::Compensated, SagaState::Failed],
            SagaState::StockVerificationFailed
            | SagaState::StockReservationFailed
            | SagaState::SaleConfirmed
            | SagaState::Compensated
            | SagaState::Failed => &[],
        }
    }

    /// Returns true if `to` is in this state's allowed-next set.
    pub fn is_valid_transition(&self, to: SagaState) -> bool {
        self.allowed_transitions().contains(&to)
    }

    /// Returns true if this state has no outgoing transitions.
    pub fn is_terminal(&self) -> bool {
        self.allowed_transitions().is_empty()
    }

    /// Returns true for the single successful terminal state.
    pub fn is_success(&self) -> bool {
        matches!(self, SagaState::SaleConfirmed)
    }

    /// Returns true for any step-failure or saga-failure state.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            SagaState::StockVerificationFailed
                | SagaState::StockReservationFailed
                | SagaState::PaymentFailed
                | SagaState::OrderConfirmationFailed
                | SagaState::Failed
        )
    }

    /// Returns true while compensation is running.
    pub fn is_compensating(&self) -> bool {
        matches!(
            self,
            SagaState::CompensatingPayment | SagaState::CompensatingStock
        )
    }

    /// Returns true for the failure states that have completed steps behind
    /// them worth undoing. Stock verification and reservation failures leave
    /// no allocated resources, so they never trigger compensation.
    pub fn can_trigger_compensation(&self) -> bool {
        matches!(
            self,
            SagaState::PaymentFailed | SagaState::OrderConfirmationFailed
        )
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            SagaState::Initiated => "INITIATED",
            SagaState::StockVerifying => "STOCK_VERIFYING",
            SagaState::StockVerified => "STOCK_VERIFIED",
            SagaState::StockVerificationFailed => "STOCK_VERIFICATION_FAILED",
            SagaState::StockReserving => "STOCK_RESERVING",
            SagaState::StockReserved => "STOCK_RESERVED",
            SagaState::StockReservationFailed => "STOCK_RESERVATION_FAILED",
            SagaState::PaymentProcessing => "PAYMENT_PROCESSING",
            SagaState::PaymentProcessed => "PAYMENT_PROCESSED",
            SagaState::PaymentFailed => "PAYMENT_FAILED",
            SagaState::OrderConfirming => "ORDER_CONFIRMING",
            SagaState::SaleConfirmed => "SALE_CONFIRMED",
            SagaState::OrderConfirmationFailed => "ORDER_CONFIRMATION_FAILED",
            SagaState::CompensatingPayment => "COMPENSATING_PAYMENT",
            SagaState::CompensatingStock => "COMPENSATING_STOCK",
            SagaState::Compensated => "COMPENSATED",
            SagaState::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for SagaState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for SagaState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SagaState::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| format!("unknown saga state '{s}'"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        let terminal = [
            SagaState::StockVerificationFailed,
            SagaState::StockReservationFailed,
            SagaState::SaleConfirmed,
            SagaState::Compensated,
            SagaState::Failed,
        ];
        for state in SagaState::ALL {
            assert_eq!(state.is_terminal(), terminal.contains(&state), "{state}");
        }
    }

    #[test]
    fn test_transition_validity_matches_table() {
        for from in SagaState::ALL {
            for to in SagaState::ALL {
                let expected = from.allowed_transitions().contains(&to);
                assert_eq!(from.is_valid_transition(to), expected, "{from} -> {to}");
            }
        }
    }

    #[test]
    fn test_happy_path_chain() {
        let chain = [
            SagaState::Initiated,
            SagaState::StockVerifying,
            SagaState::StockVerified,
            SagaState::StockReserving,
            SagaState::StockReserved,
            SagaState::PaymentProcessing,
            SagaState::PaymentProcessed,
            SagaState::OrderConfirming,
            SagaState::SaleConfirmed,
        ];
        for pair in chain.windows(2) {
            assert!(pair[0].is_valid_transition(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_compensation_branches() {
        assert!(SagaState::PaymentFailed.is_valid_transition(SagaState::CompensatingStock));
        assert!(!SagaState::PaymentFailed.is_valid_transition(SagaState::CompensatingPayment));

        assert!(
            SagaState::OrderConfirmationFailed.is_valid_transition(SagaState::CompensatingPayment)
        );
        assert!(SagaState::CompensatingPayment.is_valid_transition(SagaState::CompensatingStock));
        assert!(SagaState::CompensatingStock.is_valid_transition(SagaState::Compensated));
        assert!(SagaState::CompensatingStock.is_valid_transition(SagaState::Failed));
    }

    #[test]
    fn test_no_skipping_in_progress_states() {
        assert!(!SagaState::Initiated.is_valid_transition(SagaState::StockVerified));
        assert!(!SagaState::StockVerified.is_valid_transition(SagaState::StockReserved));
        assert!(!SagaState::StockReserved.is_valid_transition(SagaState::PaymentProcessed));
    }

    #[test]
    fn test_can_trigger_compensation() {
        for state in SagaState::ALL {
            let expected = matches!(
                state,
                SagaState::PaymentFailed | SagaState::OrderConfirmationFailed
            );
            assert_eq!(state.can_trigger_compensation(), expected, "{state}");
        }
    }

    #[test]
    fn test_predicates() {
        assert!(SagaState::SaleConfirmed.is_success());
        assert!(!SagaState::Compensated.is_success());
        assert!(SagaState::PaymentFailed.is_failure());
        assert!(!SagaState::PaymentProcessed.is_failure());
        assert!(SagaState::CompensatingPayment.is_compensating());
        assert!(SagaState::CompensatingStock.is_compensating());
        assert!(!SagaState::Compensated.is_compensating());
    }

    #[test]
    fn test_serde_names_are_screaming_snake() {
        let json = serde_json::to_string(&SagaState::StockVerificationFailed).unwrap();
        assert_eq!(json, "\"STOCK_VERIFICATION_FAILED\"");
        let state: SagaState = serde_json::from_str("\"COMPENSATING_PAYMENT\"").unwrap();
        assert_eq!(state, SagaState::CompensatingPayment);
    }

    #[test]
    fn test_from_str_roundtrip() {
        for state in SagaState::ALL {
            assert_eq!(state.as_str().parse::<SagaState>().unwrap(), state);
        }
        assert!("BOGUS_STATE".parse::<SagaState>().is_err());
    }

    #[test]
    fn test_display_matches_serde() {
        for state in SagaState::ALL {
            let json = serde_json::to_string(&state).unwrap();
            assert_eq!(json, format!("\"{}\"", state.as_str()));
        }
    }
}
