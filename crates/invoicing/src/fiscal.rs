//! Fiscal computation engine.
//!
//! Derives per-line amounts and document totals from line inputs using exact
//! decimal arithmetic only. Per line:
//!
//! ```text
//! gross    = quantity * unit_price
//! discount = gross * discount_rate / 100
//! net      = gross - discount
//! tax      = net * tax_rate / 100
//! total    = net + tax
//! ```
//!
//! Every product is rounded once, half away from zero, to three decimals (see
//! [`fatoora_core::money`]). Document totals are plain sums of those rounded
//! line values, so `Σ net == total_ht` and `Σ tax == total_tva` hold exactly.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use fatoora_core::{Money, Quantity, Rate};

/// Default flat stamp duty, in the invoice currency.
pub const DEFAULT_STAMP_DUTY: Money = Money::from_millimes(1_000);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FiscalError {
    #[error("arithmetic overflow computing {0}")]
    Overflow(&'static str),
}

fn overflow(what: &'static str) -> FiscalError {
    FiscalError::Overflow(what)
}

/// Tax a line is subject to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaxType {
    /// Value added tax.
    #[default]
    Vat,
    /// Professional development fund levy.
    Fodec,
    /// Consumption duty.
    ConsumptionDuty,
}

impl TaxType {
    pub fn code(&self) -> &'static str {
        match self {
            TaxType::Vat => "I-1602",
            TaxType::Fodec => "I-1603",
            TaxType::ConsumptionDuty => "I-1604",
        }
    }
}

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FiscalConfig {
    /// Charged once per invoice when any line's item is subject to stamp duty.
    pub stamp_duty: Money,
}

impl Default for FiscalConfig {
    fn default() -> Self {
        Self {
            stamp_duty: DEFAULT_STAMP_DUTY,
        }
    }
}

impl FiscalConfig {
    pub fn with_stamp_duty(mut self, amount: Money) -> Self {
        self.stamp_duty = amount;
        self
    }

    /// Defaults overridden by `FATOORA_STAMP_DUTY` when it holds a valid,
    /// non-negative amount.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(raw) = std::env::var("FATOORA_STAMP_DUTY") {
            match raw.parse::<Money>() {
                Ok(amount) if !amount.is_negative() => config.stamp_duty = amount,
                _ => {
                    tracing::warn!(value = %raw, "ignoring invalid FATOORA_STAMP_DUTY");
                }
            }
        }
        config
    }
}

/// Inputs of one line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineInput {
    pub quantity: Quantity,
    pub unit_price: Money,
    pub discount_rate: Rate,
    pub tax_type: TaxType,
    pub tax_rate: Rate,
    /// The referenced item is subject to stamp duty.
    pub stamp_duty: bool,
}

/// Derived amounts of one line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineAmounts {
    pub gross: Money,
    pub discount: Money,
    pub net: Money,
    pub tax: Money,
    pub total: Money,
}

/// Aggregated base and tax for one (tax type, rate) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxGroup {
    pub tax_type: TaxType,
    pub rate: Rate,
    pub taxable_amount: Money,
    pub tax_amount: Money,
}

/// Everything the engine derives for a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentTotals {
    /// Per-line amounts, in input order.
    pub lines: Vec<LineAmounts>,
    pub total_gross: Money,
    pub total_discount: Money,
    /// Net before tax.
    pub total_ht: Money,
    /// Ordered by tax type, then rate.
    pub taxes: Vec<TaxGroup>,
    pub total_tva: Money,
    pub stamp_duty: Money,
    pub total_ttc: Money,
}

fn sum<'a>(
    values: impl IntoIterator<Item = &'a Money>,
    what: &'static str,
) -> Result<Money, FiscalError> {
    values
        .into_iter()
        .try_fold(Money::ZERO, |acc, v| acc.checked_add(*v))
        .ok_or_else(|| overflow(what))
}

/// Pure computation over line inputs. Holds no state besides its config.
#[derive(Debug, Clone, Default)]
pub struct FiscalEngine {
    config: FiscalConfig,
}

impl FiscalEngine {
    pub fn new(config: FiscalConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FiscalConfig {
        &self.config
    }

    pub fn compute_line(&self, input: &LineInput) -> Result<LineAmounts, FiscalError> {
        let gross = input
            .quantity
            .times(input.unit_price)
            .ok_or_else(|| overflow("line gross"))?;
        let discount = gross
            .percent(input.discount_rate)
            .ok_or_else(|| overflow("line discount"))?;
        let net = gross
            .checked_sub(discount)
            .ok_or_else(|| overflow("line net"))?;
        let tax = net
            .percent(input.tax_rate)
            .ok_or_else(|| overflow("line tax"))?;
        let total = net.checked_add(tax).ok_or_else(|| overflow("line total"))?;

        Ok(LineAmounts {
            gross,
            discount,
            net,
            tax,
            total,
        })
    }

    pub fn compute(&self, inputs: &[LineInput]) -> Result<DocumentTotals, FiscalError> {
        let lines = inputs
            .iter()
            .map(|input| self.compute_line(input))
            .collect::<Result<Vec<_>, _>>()?;

        let total_gross = sum(lines.iter().map(|l| &l.gross), "total gross")?;
        let total_discount = sum(lines.iter().map(|l| &l.discount), "total discount")?;
        let total_ht = sum(lines.iter().map(|l| &l.net), "total net")?;

        let mut groups: BTreeMap<(TaxType, Rate), (Money, Money)> = BTreeMap::new();
        for (input, amounts) in inputs.iter().zip(&lines) {
            let (base, tax) = groups
                .entry((input.tax_type, input.tax_rate))
                .or_insert((Money::ZERO, Money::ZERO));
            *base = base
                .checked_add(amounts.net)
                .ok_or_else(|| overflow("taxable amount"))?;
            *tax = tax
                .checked_add(amounts.tax)
                .ok_or_else(|| overflow("tax amount"))?;
        }
        let taxes: Vec<TaxGroup> = groups
            .into_iter()
            .map(|((tax_type, rate), (taxable_amount, tax_amount))| TaxGroup {
                tax_type,
                rate,
                taxable_amount,
                tax_amount,
            })
            .collect();
        let total_tva = sum(taxes.iter().map(|g| &g.tax_amount), "total tax")?;

        let stamp_duty = if inputs.iter().any(|l| l.stamp_duty) {
            self.config.stamp_duty
        } else {
            Money::ZERO
        };

        let total_ttc = total_ht
            .checked_add(total_tva)
            .and_then(|t| t.checked_add(stamp_duty))
            .ok_or_else(|| overflow("total with tax"))?;

        Ok(DocumentTotals {
            lines,
            total_gross,
            total_discount,
            total_ht,
            taxes,
            total_tva,
            stamp_duty,
            total_ttc,
        })
    }
}

impl LineInput {
    /// Convenience constructor for a VAT line without stamp duty.
    pub fn vat(
        quantity: Decimal,
        unit_price: Decimal,
        discount: Decimal,
        vat: Decimal,
    ) -> fatoora_core::DomainResult<Self> {
        Ok(Self {
            quantity: Quantity::new(quantity)?,
            unit_price: Money::exact(unit_price)?,
            discount_rate: Rate::new(discount)?,
            tax_type: TaxType::Vat,
            tax_rate: Rate::new(vat)?,
            stamp_duty: false,
        })
    }

    pub fn with_stamp_duty(mut self) -> Self {
        self.stamp_duty = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn engine() -> FiscalEngine {
        FiscalEngine::default()
    }

    fn reference_lines() -> Vec<LineInput> {
        vec![
            LineInput::vat(dec!(2), dec!(100.000), dec!(0), dec!(19)).unwrap(),
            LineInput::vat(dec!(1), dec!(50.500), dec!(10), dec!(7)).unwrap(),
            LineInput::vat(dec!(5), dec!(10.333), dec!(0), dec!(19)).unwrap(),
        ]
    }

    #[test]
    fn reference_three_line_document() {
        let totals = engine().compute(&reference_lines()).unwrap();

        assert_eq!(totals.lines[0].net.to_string(), "200.000");
        assert_eq!(totals.lines[1].discount.to_string(), "5.050");
        assert_eq!(totals.lines[1].net.to_string(), "45.450");
        assert_eq!(totals.lines[2].net.to_string(), "51.665");
        assert_eq!(totals.total_ht.to_string(), "297.115");

        assert_eq!(totals.taxes.len(), 2);
        let seven = &totals.taxes[0];
        assert_eq!(seven.rate.percent(), dec!(7));
        assert_eq!(seven.taxable_amount.to_string(), "45.450");
        assert_eq!(seven.tax_amount.to_string(), "3.182");
        let nineteen = &totals.taxes[1];
        assert_eq!(nineteen.rate.percent(), dec!(19));
        assert_eq!(nineteen.taxable_amount.to_string(), "251.665");
        assert_eq!(nineteen.tax_amount.to_string(), "47.816");

        assert_eq!(totals.total_tva.to_string(), "50.998");
        assert_eq!(totals.stamp_duty, Money::ZERO);
        assert_eq!(totals.total_ttc.to_string(), "348.113");
    }

    #[test]
    fn stamp_duty_is_a_presence_test() {
        let mut lines = reference_lines();
        lines[1] = lines[1].clone().with_stamp_duty();
        let totals = engine().compute(&lines).unwrap();
        assert_eq!(totals.stamp_duty.to_string(), "1.000");
        assert_eq!(totals.total_ttc.to_string(), "349.113");

        let tiny = vec![
            LineInput::vat(dec!(0.001), dec!(0.001), dec!(0), dec!(19))
                .unwrap()
                .with_stamp_duty(),
        ];
        let totals = engine().compute(&tiny).unwrap();
        assert_eq!(totals.stamp_duty.to_string(), "1.000");
    }

    #[test]
    fn configured_stamp_duty_is_used_verbatim() {
        let config = FiscalConfig::default().with_stamp_duty(Money::new(dec!(0.600)));
        let engine = FiscalEngine::new(config);
        let lines = vec![
            LineInput::vat(dec!(1), dec!(10), dec!(0), dec!(0))
                .unwrap()
                .with_stamp_duty(),
        ];
        let totals = engine.compute(&lines).unwrap();
        assert_eq!(totals.stamp_duty.to_string(), "0.600");
        assert_eq!(totals.total_ttc.to_string(), "10.600");
    }

    #[test]
    fn empty_document_is_all_zeroes() {
        let totals = engine().compute(&[]).unwrap();
        assert!(totals.taxes.is_empty());
        assert_eq!(totals.total_ttc.to_string(), "0.000");
    }

    #[test]
    fn float_hostile_inputs_stay_exact() {
        // 0.1 * 3 and 19% are the classic binary-float traps.
        let lines: Vec<_> = (0..10)
            .map(|_| LineInput::vat(dec!(0.1), dec!(3), dec!(0), dec!(19)).unwrap())
            .collect();
        let totals = engine().compute(&lines).unwrap();
        assert_eq!(totals.total_ht.to_string(), "3.000");
        // each line: 0.300 * 0.19 = 0.057
        assert_eq!(totals.total_tva.to_string(), "0.570");
        assert_eq!(totals.taxes[0].tax_amount, totals.total_tva);
    }

    #[test]
    fn groups_split_by_tax_type_at_equal_rates() {
        let mut fodec = LineInput::vat(dec!(1), dec!(100), dec!(0), dec!(1)).unwrap();
        fodec.tax_type = TaxType::Fodec;
        let vat = LineInput::vat(dec!(1), dec!(100), dec!(0), dec!(1)).unwrap();
        let totals = engine().compute(&[fodec, vat]).unwrap();
        assert_eq!(totals.taxes.len(), 2);
        assert_eq!(totals.taxes[0].tax_type, TaxType::Vat);
        assert_eq!(totals.taxes[1].tax_type, TaxType::Fodec);
    }

    #[test]
    fn full_discount_zeroes_the_line() {
        let line = LineInput::vat(dec!(3), dec!(9.999), dec!(100), dec!(19)).unwrap();
        let amounts = engine().compute_line(&line).unwrap();
        assert_eq!(amounts.gross.to_string(), "29.997");
        assert!(amounts.net.is_zero());
        assert!(amounts.tax.is_zero());
    }

    #[test]
    fn stamp_duty_from_env() {
        unsafe { std::env::set_var("FATOORA_STAMP_DUTY", "0.600") };
        assert_eq!(FiscalConfig::from_env().stamp_duty.to_string(), "0.600");
        unsafe { std::env::set_var("FATOORA_STAMP_DUTY", "-1") };
        assert_eq!(FiscalConfig::from_env().stamp_duty, DEFAULT_STAMP_DUTY);
        unsafe { std::env::remove_var("FATOORA_STAMP_DUTY") };
    }

    fn line() -> impl Strategy<Value = LineInput> {
        (
            0u64..100_000_000,
            0u64..10_000_000,
            0u32..=10_000,
            prop::sample::select(vec![0u32, 700, 1300, 1900]),
            any::<bool>(),
        )
            .prop_map(|(qty, price, discount, vat, stamp)| LineInput {
                quantity: Quantity::new(Decimal::new(qty as i64, 3)).unwrap(),
                unit_price: Money::new(Decimal::new(price as i64, 3)),
                discount_rate: Rate::new(Decimal::new(discount as i64, 2)).unwrap(),
                tax_type: TaxType::Vat,
                tax_rate: Rate::new(Decimal::new(vat as i64, 2)).unwrap(),
                stamp_duty: stamp,
            })
    }

    proptest! {
        #[test]
        fn sums_reconcile_exactly(lines in prop::collection::vec(line(), 0..40)) {
            let totals = engine().compute(&lines).unwrap();

            let net: Decimal = totals.lines.iter().map(|l| l.net.amount()).sum();
            prop_assert_eq!(net, totals.total_ht.amount());

            let tax: Decimal = totals.taxes.iter().map(|g| g.tax_amount.amount()).sum();
            prop_assert_eq!(tax, totals.total_tva.amount());

            let base: Decimal = totals.taxes.iter().map(|g| g.taxable_amount.amount()).sum();
            prop_assert_eq!(base, totals.total_ht.amount());

            prop_assert_eq!(
                totals.total_ttc.amount(),
                totals.total_ht.amount() + totals.total_tva.amount() + totals.stamp_duty.amount()
            );
            prop_assert_eq!(totals.total_ttc.amount().scale(), 3);
        }

        #[test]
        fn line_identities_hold(line in line()) {
            let a = engine().compute_line(&line).unwrap();
            prop_assert_eq!(a.net.amount(), a.gross.amount() - a.discount.amount());
            prop_assert_eq!(a.total.amount(), a.net.amount() + a.tax.amount());
            prop_assert!(!a.net.is_negative());
        }
    }
}
