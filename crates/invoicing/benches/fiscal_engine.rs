use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use chrono::{NaiveDate, Utc};
use fatoora_core::{Money, Quantity, Rate};
use fatoora_invoicing::{
    DocumentFamily, DocumentType, FiscalEngine, IdentifierKind, Invoice, InvoiceId,
    InvoiceLineInput, LineInput, NewInvoice, Party, PartyIdentifier,
};
use rust_decimal::Decimal;

/// Lines cycling through a handful of rates and discounts so several tax
/// groups are produced.
fn lines(count: usize) -> Vec<LineInput> {
    let rates = [19i64, 13, 7, 0];
    (0..count)
        .map(|i| {
            LineInput::vat(
                Decimal::new(1 + (i as i64 % 9), 0),
                Decimal::new(10_333 + i as i64 * 17, 3),
                Decimal::new((i as i64 % 4) * 5, 0),
                Decimal::new(rates[i % rates.len()], 0),
            )
            .unwrap()
        })
        .collect()
}

fn bench_compute(c: &mut Criterion) {
    let engine = FiscalEngine::default();
    let mut group = c.benchmark_group("fiscal_compute");

    for count in [1usize, 10, 100, 1_000] {
        let inputs = lines(count);
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &inputs, |b, inputs| {
            b.iter(|| engine.compute(black_box(inputs)).unwrap());
        });
    }

    group.finish();
}

fn bench_draft_editing(c: &mut Criterion) {
    let engine = FiscalEngine::default();
    let sender = Party::new(
        PartyIdentifier::new(IdentifierKind::TaxRegistration, "1234567ABM000").unwrap(),
        "Bench SARL",
    );
    let receiver = Party::new(
        PartyIdentifier::new(IdentifierKind::NationalId, "01234567").unwrap(),
        "Client",
    );

    let mut group = c.benchmark_group("draft_editing");
    group.bench_function("add_50_lines", |b| {
        b.iter(|| {
            let mut invoice = Invoice::draft(
                NewInvoice {
                    id: InvoiceId::generate(),
                    number: "FA-BENCH".to_string(),
                    document_type: DocumentType::Invoice,
                    family: DocumentFamily::Current,
                    sender: sender.clone(),
                    receiver: receiver.clone(),
                    issue_date: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
                    due_date: None,
                    billing_period: None,
                },
                Utc::now(),
            );
            for i in 0..50i64 {
                let line = InvoiceLineInput::new(
                    "SKU",
                    "item",
                    Quantity::new(Decimal::new(i + 1, 0)).unwrap(),
                    Money::from_millimes(1_250 + i),
                    Rate::new(Decimal::new(19, 0)).unwrap(),
                );
                invoice.add_line(line, &engine, Utc::now()).unwrap();
            }
            black_box(invoice)
        });
    });
    group.finish();
}

criterion_group!(benches, bench_compute, bench_draft_editing);
criterion_main!(benches);
