use chrono::{Duration, Months, NaiveDate};
use rust_decimal::Decimal;

use crate::decimal::{Money, Rate};
use crate::domain::Installment;
use crate::errors::{EngineError, Result};
use crate::types::{AmortizationType, LoanId, PaymentFrequency};

/// loan terms the calculator turns into a schedule
#[derive(Debug, Clone)]
pub struct ScheduleParams {
    pub principal: Money,
    pub rate: Rate,
    pub installments: u32,
    pub frequency: PaymentFrequency,
    pub amortization: AmortizationType,
    pub start_date: NaiveDate,
}

/// generated schedule plus the interest the loan will earn over its life
#[derive(Debug, Clone)]
pub struct GeneratedSchedule {
    pub installments: Vec<Installment>,
    pub total_interest: Money,
}

/// build the full installment schedule for a loan; pure, re-invocable
/// when an approval edits the terms (callers discard the old rows)
pub fn build_schedule(loan_id: LoanId, params: &ScheduleParams) -> Result<GeneratedSchedule> {
    if params.installments == 0 {
        return Err(EngineError::validation("schedule needs at least one installment"));
    }
    if !params.principal.is_positive() {
        return Err(EngineError::validation("principal must be positive"));
    }
    if params.rate.as_decimal().is_sign_negative() {
        return Err(EngineError::validation("interest rate cannot be negative"));
    }

    match params.amortization {
        AmortizationType::Simple => simple_schedule(loan_id, params),
        AmortizationType::French => french_schedule(loan_id, params),
    }
}

/// due date of installment `i` (1-based)
pub fn due_date(start: NaiveDate, frequency: PaymentFrequency, i: u32) -> Result<NaiveDate> {
    let date = match frequency {
        PaymentFrequency::Daily => start.checked_add_signed(Duration::days(i as i64)),
        PaymentFrequency::Weekly => start.checked_add_signed(Duration::days(7 * i as i64)),
        PaymentFrequency::Biweekly => start.checked_add_signed(Duration::days(15 * i as i64)),
        PaymentFrequency::Monthly => start.checked_add_months(Months::new(i)),
    };
    date.ok_or_else(|| EngineError::validation("due date out of calendar range"))
}

/// flat interest: equal capital and equal interest shares, the final
/// installment absorbs the rounding residue so the totals conserve
fn simple_schedule(loan_id: LoanId, params: &ScheduleParams) -> Result<GeneratedSchedule> {
    let n = params.installments;
    let total_interest =
        Money::from_decimal(params.principal.as_decimal() * params.rate.as_decimal());

    let capital_share = params.principal / Decimal::from(n);
    let interest_share = total_interest / Decimal::from(n);

    let mut installments = Vec::with_capacity(n as usize);
    let mut capital_assigned = Money::ZERO;
    let mut interest_assigned = Money::ZERO;

    for i in 1..=n {
        let (capital, interest) = if i == n {
            (
                params.principal - capital_assigned,
                total_interest - interest_assigned,
            )
        } else {
            (capital_share, interest_share)
        };
        capital_assigned += capital;
        interest_assigned += interest;

        installments.push(Installment::new(
            loan_id,
            i,
            due_date(params.start_date, params.frequency, i)?,
            capital + interest,
            capital,
            interest,
        ));
    }

    Ok(GeneratedSchedule { installments, total_interest })
}

/// annuity: fixed total payment c = P*r / (1 - (1+r)^-n); interest on
/// the running balance, the last installment absorbs the residual
/// balance to force it to exactly zero
fn french_schedule(loan_id: LoanId, params: &ScheduleParams) -> Result<GeneratedSchedule> {
    let r = params.rate.per_period(params.frequency);
    if r.is_zero() {
        return equal_principal_schedule(loan_id, params);
    }

    let n = params.installments;
    let mut compound = Decimal::ONE;
    let base = Decimal::ONE + r;
    for _ in 0..n {
        compound *= base;
    }
    let fixed_payment =
        Money::from_decimal(params.principal.as_decimal() * r * compound / (compound - Decimal::ONE));

    let mut installments = Vec::with_capacity(n as usize);
    let mut balance = params.principal;
    let mut total_interest = Money::ZERO;

    for i in 1..=n {
        let interest = Money::from_decimal(balance.as_decimal() * r);
        let capital = if i == n {
            balance
        } else {
            (fixed_payment - interest).min(balance)
        };
        balance -= capital;
        total_interest += interest;

        installments.push(Installment::new(
            loan_id,
            i,
            due_date(params.start_date, params.frequency, i)?,
            capital + interest,
            capital,
            interest,
        ));
    }

    Ok(GeneratedSchedule { installments, total_interest })
}

/// zero-rate fallback: principal split evenly, no interest
fn equal_principal_schedule(loan_id: LoanId, params: &ScheduleParams) -> Result<GeneratedSchedule> {
    let n = params.installments;
    let capital_share = params.principal / Decimal::from(n);

    let mut installments = Vec::with_capacity(n as usize);
    let mut capital_assigned = Money::ZERO;

    for i in 1..=n {
        let capital = if i == n {
            params.principal - capital_assigned
        } else {
            capital_share
        };
        capital_assigned += capital;

        installments.push(Installment::new(
            loan_id,
            i,
            due_date(params.start_date, params.frequency, i)?,
            capital,
            capital,
            Money::ZERO,
        ));
    }

    Ok(GeneratedSchedule { installments, total_interest: Money::ZERO })
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn params(
        principal: i64,
        rate_pct: u32,
        n: u32,
        frequency: PaymentFrequency,
        amortization: AmortizationType,
    ) -> ScheduleParams {
        ScheduleParams {
            principal: Money::from_major(principal),
            rate: Rate::from_percentage(rate_pct),
            installments: n,
            frequency,
            amortization,
            start_date: date(2026, 1, 1),
        }
    }

    #[test]
    fn test_simple_flat_schedule() {
        // the canonical field loan: 1,000,000 at 20% over 10 months
        let schedule = build_schedule(
            Uuid::new_v4(),
            &params(1_000_000, 20, 10, PaymentFrequency::Monthly, AmortizationType::Simple),
        )
        .unwrap();

        assert_eq!(schedule.total_interest, Money::from_major(200_000));
        assert_eq!(schedule.installments.len(), 10);
        for cuota in &schedule.installments {
            assert_eq!(cuota.amount, Money::from_major(120_000));
            assert_eq!(cuota.capital_portion, Money::from_major(100_000));
            assert_eq!(cuota.interest_portion, Money::from_major(20_000));
        }
        assert_eq!(schedule.installments[0].due_date, date(2026, 2, 1));
        assert_eq!(schedule.installments[9].due_date, date(2026, 11, 1));
    }

    #[test]
    fn test_simple_conservation_with_awkward_split() {
        // 100,000 over 7 installments does not divide evenly
        let schedule = build_schedule(
            Uuid::new_v4(),
            &params(100_000, 15, 7, PaymentFrequency::Weekly, AmortizationType::Simple),
        )
        .unwrap();

        let capital: Money = schedule.installments.iter().map(|c| c.capital_portion).sum();
        let interest: Money = schedule.installments.iter().map(|c| c.interest_portion).sum();
        let total: Money = schedule.installments.iter().map(|c| c.amount).sum();

        assert_eq!(capital, Money::from_major(100_000));
        assert_eq!(interest, schedule.total_interest);
        assert_eq!(total, Money::from_major(100_000) + schedule.total_interest);
    }

    #[test]
    fn test_french_conservation() {
        let schedule = build_schedule(
            Uuid::new_v4(),
            &params(500_000, 5, 12, PaymentFrequency::Monthly, AmortizationType::French),
        )
        .unwrap();

        // capital portions rebuild the principal exactly; the last row
        // absorbed whatever rounding drift accumulated
        let capital: Money = schedule.installments.iter().map(|c| c.capital_portion).sum();
        assert_eq!(capital, Money::from_major(500_000));

        // interest declines as the balance declines
        for pair in schedule.installments.windows(2) {
            assert!(pair[1].interest_portion <= pair[0].interest_portion);
        }
    }

    #[test]
    fn test_french_equal_payments_except_last() {
        let schedule = build_schedule(
            Uuid::new_v4(),
            &params(300_000, 4, 6, PaymentFrequency::Monthly, AmortizationType::French),
        )
        .unwrap();

        let c = schedule.installments[0].amount;
        for cuota in &schedule.installments[..5] {
            assert_eq!(cuota.amount, c);
        }
        // last row may differ by the rounding residue only
        let last = schedule.installments[5].amount;
        assert!((last - c).abs() < Money::from_major(1));
    }

    #[test]
    fn test_french_zero_rate_falls_back_to_equal_principal() {
        let schedule = build_schedule(
            Uuid::new_v4(),
            &params(90_000, 0, 3, PaymentFrequency::Monthly, AmortizationType::French),
        )
        .unwrap();

        assert_eq!(schedule.total_interest, Money::ZERO);
        for cuota in &schedule.installments {
            assert_eq!(cuota.capital_portion, Money::from_major(30_000));
            assert_eq!(cuota.interest_portion, Money::ZERO);
        }
    }

    #[test]
    fn test_french_sub_monthly_divisors() {
        // daily collection divides the monthly rate by 30
        let daily = build_schedule(
            Uuid::new_v4(),
            &params(100_000, 12, 30, PaymentFrequency::Daily, AmortizationType::French),
        )
        .unwrap();
        let monthly = build_schedule(
            Uuid::new_v4(),
            &params(100_000, 12, 30, PaymentFrequency::Monthly, AmortizationType::French),
        )
        .unwrap();
        assert!(daily.total_interest < monthly.total_interest);
    }

    #[test]
    fn test_due_dates_per_frequency() {
        let start = date(2026, 1, 1);
        assert_eq!(due_date(start, PaymentFrequency::Daily, 3).unwrap(), date(2026, 1, 4));
        assert_eq!(due_date(start, PaymentFrequency::Weekly, 2).unwrap(), date(2026, 1, 15));
        assert_eq!(due_date(start, PaymentFrequency::Biweekly, 2).unwrap(), date(2026, 1, 31));
        assert_eq!(due_date(start, PaymentFrequency::Monthly, 1).unwrap(), date(2026, 2, 1));
    }

    #[test]
    fn test_monthly_due_date_clamps_short_months() {
        let start = date(2026, 1, 31);
        assert_eq!(due_date(start, PaymentFrequency::Monthly, 1).unwrap(), date(2026, 2, 28));
        assert_eq!(due_date(start, PaymentFrequency::Monthly, 3).unwrap(), date(2026, 4, 30));
    }

    #[test]
    fn test_rejects_empty_schedule() {
        let bad = params(100, 10, 0, PaymentFrequency::Monthly, AmortizationType::Simple);
        assert!(build_schedule(Uuid::new_v4(), &bad).is_err());
    }
}
