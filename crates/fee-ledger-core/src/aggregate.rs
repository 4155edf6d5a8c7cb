use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::month::{compare_months, sort_months, SortDirection};
use crate::{normalize_month_key, FeeRecord, FeeStatus, LedgerError, StudentIdentity};

/// Page size used when a caller asks for a page without naming a size.
pub const DEFAULT_PER_PAGE: usize = 50;

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Default)]
pub struct Summary {
    pub total: usize,
    pub paid: usize,
    pub unpaid: usize,
    pub total_students: usize,
    pub months: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct StudentProfile {
    pub student_name: String,
    pub father_name: String,
    pub total_months: usize,
    pub paid_months: usize,
    pub unpaid_months: usize,
    pub records: Vec<FeeRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct Defaulter {
    pub student_name: String,
    pub father_name: String,
    pub student_id: String,
    pub mobile_number: String,
    pub unpaid_count: usize,
    pub unpaid_months: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Default)]
pub struct DefaulterReport {
    pub defaulters: Vec<Defaulter>,
    pub total: usize,
    pub min_months: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct UniqueStudent {
    pub name: String,
    pub father: String,
    pub student_id: String,
    pub mobile: String,
    pub display: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Default)]
pub struct RecordQuery {
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub month: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub receipt: Option<String>,
    #[serde(default)]
    pub page: Option<usize>,
    #[serde(default)]
    pub per_page: Option<usize>,
}

impl RecordQuery {
    fn matches(&self, record: &FeeRecord) -> bool {
        if let Some(needle) = non_empty_lower(self.search.as_deref()) {
            let hit = [
                &record.student_name,
                &record.father_name,
                &record.student_id,
                &record.mobile_number,
                &record.receipt_number,
            ]
            .iter()
            .any(|field| field.to_lowercase().contains(&needle));
            if !hit {
                return false;
            }
        }
        if let Some(month) = non_empty_lower(self.month.as_deref()) {
            if normalize_month_key(&record.month) != month {
                return false;
            }
        }
        if let Some(status) = non_empty_lower(self.status.as_deref()) {
            if FeeStatus::from_text(&status) != record.fee_status {
                return false;
            }
        }
        if let Some(receipt) = non_empty_lower(self.receipt.as_deref()) {
            if !record.receipt_number.to_lowercase().contains(&receipt) {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq)]
pub struct Pagination {
    pub page: usize,
    pub per_page: usize,
    pub total_pages: usize,
    pub has_next: bool,
    pub has_prev: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Default)]
pub struct RecordListing {
    pub records: Vec<FeeRecord>,
    pub total: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,
}

fn non_empty_lower(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|value| !value.is_empty()).map(str::to_lowercase)
}

/// Fleet-wide counts. `paid + unpaid == total` and `total_students <= total`.
#[must_use]
pub fn summarize(records: &[FeeRecord]) -> Summary {
    let total = records.len();
    let paid = records.iter().filter(|record| record.is_paid()).count();
    let total_students = records.iter().map(FeeRecord::student).collect::<HashSet<_>>().len();

    let mut seen = HashSet::new();
    let mut months = records
        .iter()
        .map(|record| record.month.trim())
        .filter(|month| !month.is_empty() && seen.insert(month.to_string()))
        .map(str::to_string)
        .collect::<Vec<_>>();
    sort_months(&mut months, SortDirection::Ascending);

    Summary { total, paid, unpaid: total - paid, total_students, months }
}

/// All records of one student in storage order, with paid and unpaid counts.
///
/// # Errors
/// Returns [`LedgerError::NotFound`] when no record belongs to `student`.
pub fn student_profile(
    records: &[FeeRecord],
    student: &StudentIdentity,
) -> Result<StudentProfile, LedgerError> {
    let owned = records.iter().filter(|record| student.matches(record)).cloned().collect::<Vec<_>>();
    if owned.is_empty() {
        return Err(LedgerError::NotFound(format!("no records for student {student}")));
    }

    let paid_months = owned.iter().filter(|record| record.is_paid()).count();
    Ok(StudentProfile {
        student_name: student.student_name.clone(),
        father_name: student.father_name.clone(),
        total_months: owned.len(),
        paid_months,
        unpaid_months: owned.len() - paid_months,
        records: owned,
    })
}

/// Students with at least `min_months` unpaid records, most unpaid first.
#[must_use]
pub fn defaulters(records: &[FeeRecord], min_months: usize) -> DefaulterReport {
    let mut grouped: Vec<Defaulter> = Vec::new();
    let mut positions: HashMap<StudentIdentity, usize> = HashMap::new();

    for record in records.iter().filter(|record| !record.is_paid()) {
        let position = *positions.entry(record.student()).or_insert_with(|| {
            grouped.push(Defaulter {
                student_name: record.student_name.clone(),
                father_name: record.father_name.clone(),
                student_id: record.student_id.clone(),
                mobile_number: record.mobile_number.clone(),
                unpaid_count: 0,
                unpaid_months: Vec::new(),
            });
            grouped.len() - 1
        });
        let entry = &mut grouped[position];
        entry.unpaid_count += 1;
        entry.unpaid_months.push(record.month.clone());
    }

    let mut defaulters = grouped
        .into_iter()
        .filter(|defaulter| defaulter.unpaid_count >= min_months)
        .map(|mut defaulter| {
            defaulter
                .unpaid_months
                .sort_by(|left, right| compare_months(left, right, SortDirection::Ascending));
            defaulter
        })
        .collect::<Vec<_>>();
    defaulters.sort_by(|left, right| right.unpaid_count.cmp(&left.unpaid_count));

    DefaulterReport { total: defaulters.len(), defaulters, min_months }
}

/// Distinct students by trimmed name and father, sorted by lowercase name.
#[must_use]
pub fn unique_students(records: &[FeeRecord]) -> Vec<UniqueStudent> {
    let mut seen = HashSet::new();
    let mut students = Vec::new();
    for record in records {
        let name = record.student_name.trim();
        let father = record.father_name.trim();
        if name.is_empty() || !seen.insert((name.to_string(), father.to_string())) {
            continue;
        }
        students.push(UniqueStudent {
            name: name.to_string(),
            father: father.to_string(),
            student_id: record.student_id.trim().to_string(),
            mobile: record.mobile_number.trim().to_string(),
            display: format!("{name} (F: {father})"),
        });
    }
    students.sort_by_key(|student| student.name.to_lowercase());
    students
}

/// Filter records in storage order and optionally cut one page.
#[must_use]
pub fn list_records(records: &[FeeRecord], query: &RecordQuery) -> RecordListing {
    let matched = records.iter().filter(|record| query.matches(record)).cloned().collect::<Vec<_>>();
    let total = matched.len();

    if query.page.is_none() && query.per_page.is_none() {
        return RecordListing { records: matched, total, pagination: None };
    }

    let per_page = query.per_page.filter(|size| *size > 0).unwrap_or(DEFAULT_PER_PAGE);
    let page = query.page.unwrap_or(1).max(1);
    let total_pages = total.div_ceil(per_page);
    let start = (page - 1).saturating_mul(per_page);
    let records = matched.into_iter().skip(start).take(per_page).collect();

    RecordListing {
        records,
        total,
        pagination: Some(Pagination {
            page,
            per_page,
            total_pages,
            has_next: page < total_pages,
            has_prev: page > 1,
        }),
    }
}
