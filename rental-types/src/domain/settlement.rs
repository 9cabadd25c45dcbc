//! Settlement at vehicle return.
//!
//! Reconciles the deposit against late, cleaning and repair charges and
//! decides between the refund branch and the additional-payment branch.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::money::Money;
use crate::error::DomainError;

/// Kind of an additional charge assessed at return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ChargeKind {
    LateFee,
    CleaningFee,
    RepairFee,
}

/// One line of the booking's additional charges.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AdditionalCharge {
    pub kind: ChargeKind,
    #[schema(value_type = i64, example = 300000)]
    pub amount: Money,
    pub description: String,
}

/// Staff-entered figures for a return inspection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SettlementInput {
    /// Replaces the computed late fee when set.
    pub late_fee_override: Option<Money>,
    pub cleaning_fee: Money,
    pub repair_fee: Money,
}

/// Policy knobs for the late fee.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LateFeePolicy {
    /// Penalty multiplier in percent of the hourly rate (150 = ×1.5).
    pub multiplier_percent: i64,
}

impl Default for LateFeePolicy {
    fn default() -> Self {
        Self {
            multiplier_percent: 150,
        }
    }
}

/// Which branch of the state machine a settlement selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "branch", rename_all = "snake_case")]
pub enum SettlementOutcome {
    /// Deposit covers the charges; `refund` goes back to the renter.
    Refund { refund: Money },
    /// Charges exceed the deposit; the renter owes `owed` through the gateway.
    Owing { owed: Money },
}

/// Result of a return inspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settlement {
    pub charges: Vec<AdditionalCharge>,
    pub total: Money,
    pub outcome: SettlementOutcome,
}

/// Whole hours late, rounding any started hour up. Zero when on time.
pub fn late_hours(scheduled_return: DateTime<Utc>, actual_return: DateTime<Utc>) -> i64 {
    let late_seconds = (actual_return - scheduled_return).num_seconds();
    if late_seconds <= 0 {
        return 0;
    }
    (late_seconds + 3599) / 3600
}

/// `hours × hourly_rate × multiplier`, rounded half-up to the đồng.
pub fn late_fee(
    hours: i64,
    hourly_rate: Money,
    policy: LateFeePolicy,
) -> Result<Money, DomainError> {
    let scaled = hours
        .checked_mul(hourly_rate.amount())
        .and_then(|v| v.checked_mul(policy.multiplier_percent))
        .and_then(|v| v.checked_add(50))
        .ok_or_else(|| DomainError::ValidationError("Late fee overflow".into()))?;
    Money::new(scaled / 100)
}

impl Settlement {
    /// Computes the settlement for a vehicle returned at `returned_at`.
    pub fn assess(
        deposit: Money,
        hourly_rate: Money,
        scheduled_return: DateTime<Utc>,
        returned_at: DateTime<Utc>,
        input: SettlementInput,
        policy: LateFeePolicy,
    ) -> Result<Settlement, DomainError> {
        let mut charges = Vec::new();

        match input.late_fee_override {
            Some(fee) if !fee.is_zero() => charges.push(AdditionalCharge {
                kind: ChargeKind::LateFee,
                amount: fee,
                description: "Late return (assessed by staff)".into(),
            }),
            Some(_) => {}
            None => {
                let hours = late_hours(scheduled_return, returned_at);
                let fee = late_fee(hours, hourly_rate, policy)?;
                if !fee.is_zero() {
                    charges.push(AdditionalCharge {
                        kind: ChargeKind::LateFee,
                        amount: fee,
                        description: format!(
                            "Late return: {}h × {} × {}%",
                            hours, hourly_rate, policy.multiplier_percent
                        ),
                    });
                }
            }
        }

        if !input.cleaning_fee.is_zero() {
            charges.push(AdditionalCharge {
                kind: ChargeKind::CleaningFee,
                amount: input.cleaning_fee,
                description: "Cleaning fee".into(),
            });
        }

        if !input.repair_fee.is_zero() {
            charges.push(AdditionalCharge {
                kind: ChargeKind::RepairFee,
                amount: input.repair_fee,
                description: "Repair fee".into(),
            });
        }

        let total = Money::checked_sum(charges.iter().map(|c| c.amount))?;
        let outcome = if total <= deposit {
            SettlementOutcome::Refund {
                refund: deposit.saturating_sub(total),
            }
        } else {
            SettlementOutcome::Owing {
                owed: total.saturating_sub(deposit),
            }
        };

        Ok(Settlement {
            charges,
            total,
            outcome,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn vnd(amount: i64) -> Money {
        Money::new(amount).unwrap()
    }

    fn scheduled() -> DateTime<Utc> {
        "2026-03-01T10:00:00Z".parse().unwrap()
    }

    #[test]
    fn test_late_hours_rounds_started_hours_up() {
        let due = scheduled();
        assert_eq!(late_hours(due, due - Duration::minutes(30)), 0);
        assert_eq!(late_hours(due, due), 0);
        assert_eq!(late_hours(due, due + Duration::seconds(1)), 1);
        assert_eq!(late_hours(due, due + Duration::minutes(61)), 2);
    }

    #[test]
    fn test_late_fee_applies_multiplier() {
        let fee = late_fee(2, vnd(100_000), LateFeePolicy::default()).unwrap();
        assert_eq!(fee, vnd(300_000));
    }

    #[test]
    fn test_on_time_return_refunds_full_deposit() {
        let s = Settlement::assess(
            vnd(500_000),
            vnd(100_000),
            scheduled(),
            scheduled(),
            SettlementInput::default(),
            LateFeePolicy::default(),
        )
        .unwrap();
        assert!(s.charges.is_empty());
        assert_eq!(
            s.outcome,
            SettlementOutcome::Refund {
                refund: vnd(500_000)
            }
        );
    }

    #[test]
    fn test_charges_within_deposit() {
        let s = Settlement::assess(
            vnd(500_000),
            vnd(100_000),
            scheduled(),
            scheduled() + Duration::minutes(90),
            SettlementInput::default(),
            LateFeePolicy::default(),
        )
        .unwrap();
        assert_eq!(s.charges.len(), 1);
        assert_eq!(s.charges[0].kind, ChargeKind::LateFee);
        assert_eq!(s.total, vnd(300_000));
        assert_eq!(
            s.outcome,
            SettlementOutcome::Refund {
                refund: vnd(200_000)
            }
        );
    }

    #[test]
    fn test_charges_exceeding_deposit_owe_difference() {
        let s = Settlement::assess(
            vnd(500_000),
            vnd(100_000),
            scheduled(),
            scheduled(),
            SettlementInput {
                late_fee_override: Some(vnd(700_000)),
                ..Default::default()
            },
            LateFeePolicy::default(),
        )
        .unwrap();
        assert_eq!(
            s.outcome,
            SettlementOutcome::Owing {
                owed: vnd(200_000)
            }
        );
    }

    #[test]
    fn test_charges_equal_to_deposit_refund_zero() {
        let s = Settlement::assess(
            vnd(500_000),
            vnd(100_000),
            scheduled(),
            scheduled(),
            SettlementInput {
                late_fee_override: None,
                cleaning_fee: vnd(200_000),
                repair_fee: vnd(300_000),
            },
            LateFeePolicy::default(),
        )
        .unwrap();
        assert_eq!(s.charges.len(), 2);
        assert_eq!(s.outcome, SettlementOutcome::Refund { refund: Money::ZERO });
    }

    #[test]
    fn test_zero_override_waives_late_fee() {
        let s = Settlement::assess(
            vnd(500_000),
            vnd(100_000),
            scheduled(),
            scheduled() + Duration::hours(5),
            SettlementInput {
                late_fee_override: Some(Money::ZERO),
                ..Default::default()
            },
            LateFeePolicy::default(),
        )
        .unwrap();
        assert!(s.charges.is_empty());
    }

    #[test]
    fn test_overflowing_fees_are_rejected() {
        let result = Settlement::assess(
            vnd(500_000),
            vnd(100_000),
            scheduled(),
            scheduled(),
            SettlementInput {
                late_fee_override: None,
                cleaning_fee: vnd(i64::MAX),
                repair_fee: vnd(i64::MAX),
            },
            LateFeePolicy::default(),
        );
        assert!(matches!(result, Err(DomainError::ValidationError(_))));
    }

    #[test]
    fn test_late_fee_overflow_is_an_error() {
        let result = late_fee(i64::MAX / 100, vnd(i64::MAX), LateFeePolicy::default());
        assert!(matches!(result, Err(DomainError::ValidationError(_))));

        let result = Settlement::assess(
            vnd(500_000),
            vnd(i64::MAX / 2),
            scheduled(),
            scheduled() + Duration::hours(3),
            SettlementInput::default(),
            LateFeePolicy::default(),
        );
        assert!(result.is_err());
    }
}
