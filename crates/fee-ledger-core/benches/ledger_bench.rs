use criterion::{criterion_group, criterion_main, Criterion};
use fee_ledger_core::{
    defaulters, records_to_horizontal, summarize, ExportFilter, FeeRecord, FeeStatus, MONTH_NAMES,
};

fn mk_record(index: usize) -> FeeRecord {
    let student = index / 24;
    let month = index % 24;
    let paid = (index * 7) % 5 != 0;
    FeeRecord {
        student_id: format!("VK{student:04}"),
        student_name: format!("Student {student}"),
        father_name: format!("Father {}", student % 97),
        mobile_number: format!("98{student:08}"),
        month: format!("{} {}", MONTH_NAMES[month % 12], 2024 + month / 12),
        fee_status: if paid { FeeStatus::Paid } else { FeeStatus::NotPaid },
        receipt_number: if paid { format!("RCP-{index:06}") } else { String::new() },
    }
}

fn bench_aggregates(c: &mut Criterion) {
    let records = (0..12_000).map(mk_record).collect::<Vec<_>>();

    c.bench_function("summary_12000_records", |b| {
        b.iter(|| summarize(&records));
    });

    c.bench_function("defaulters_12000_records", |b| {
        b.iter(|| {
            let report = defaulters(&records, 2);
            if report.total == 0 {
                panic!("defaulters benchmark produced an empty report");
            }
        });
    });
}

fn bench_export(c: &mut Criterion) {
    let records = (0..12_000).map(mk_record).collect::<Vec<_>>();

    c.bench_function("export_horizontal_12000_records", |b| {
        b.iter(|| records_to_horizontal(&records, ExportFilter::All));
    });
}

criterion_group!(ledger_benches, bench_aggregates, bench_export);
criterion_main!(ledger_benches);
