//! Demo roster: ten students with January 2026 and December 2025 records.

use crate::{FeeStatus, NewRecord};

const STUDENTS: [(&str, &str, &str); 10] = [
    ("VK001", "Aarav Patel", "Rajesh Patel"),
    ("VK002", "Priya Sharma", "Suresh Sharma"),
    ("VK003", "Rohan Gupta", "Anil Gupta"),
    ("VK004", "Sneha Verma", "Prakash Verma"),
    ("VK005", "Amit Singh", "Vikram Singh"),
    ("VK006", "Kavya Mishra", "Deepak Mishra"),
    ("VK007", "Arjun Kumar", "Ramesh Kumar"),
    ("VK008", "Ananya Joshi", "Sanjay Joshi"),
    ("VK009", "Rahul Sharma", "Mohan Sharma"),
    ("VK010", "Meera Agarwal", "Vinod Agarwal"),
];

/// `(month, receipt suffix, paid flags by student)`.
const MONTHS: [(&str, &str, [bool; 10]); 2] = [
    ("January 2026", "JAN26", [true, false, true, false, true, true, false, true, true, false]),
    ("December 2025", "DEC25", [true, true, true, false, true, true, true, true, false, true]),
];

#[must_use]
pub fn sample_roster() -> Vec<NewRecord> {
    let mut roster = Vec::with_capacity(STUDENTS.len() * MONTHS.len());
    for (position, (student_id, student_name, father_name)) in STUDENTS.iter().enumerate() {
        for (month, suffix, paid) in &MONTHS {
            let is_paid = paid[position];
            roster.push(NewRecord {
                student_id: (*student_id).to_string(),
                student_name: (*student_name).to_string(),
                father_name: (*father_name).to_string(),
                mobile_number: String::new(),
                month: (*month).to_string(),
                fee_status: Some(if is_paid { FeeStatus::Paid } else { FeeStatus::NotPaid }),
                receipt_number: if is_paid {
                    format!("RCP-{:03}-{suffix}", position + 1)
                } else {
                    String::new()
                },
            });
        }
    }
    roster
}
