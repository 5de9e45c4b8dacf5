use std::fmt;

use chrono::{DateTime, TimeZone};
use serde_json::{json, Value};

/// Column headers of the audit sheet, in row order.
pub const LOG_HEADERS: [&str; 7] = [
    "Timestamp",
    "SUNet ID",
    "User Message",
    "Assistant Response",
    "Message Length",
    "Response Length",
    "Assistant Type",
];

/// Which assistant answered, as written to the last log column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    CourseScheduler,
    AdminInfo,
    Assistant,
    Error,
}

impl Category {
    pub fn label(&self) -> &'static str {
        match self {
            Category::CourseScheduler => "Course Scheduler",
            Category::AdminInfo => "Admin Info",
            Category::Assistant => "Assistant",
            Category::Error => "Error",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One completed exchange, ready to append to the audit sheet.
#[derive(Debug, Clone, PartialEq)]
pub struct InteractionRecord {
    pub timestamp: String,
    pub user_id: String,
    pub input: String,
    pub output: String,
    pub category: Category,
}

impl InteractionRecord {
    pub fn new<Tz>(at: DateTime<Tz>, user_id: &str, input: &str, output: &str, category: Category) -> Self
    where
        Tz: TimeZone,
        Tz::Offset: fmt::Display,
    {
        InteractionRecord {
            timestamp: at.format("%Y-%m-%d %H:%M:%S %Z").to_string(),
            user_id: user_id.to_string(),
            input: input.to_string(),
            output: output.to_string(),
            category,
        }
    }

    /// Lengths count characters, not bytes.
    pub fn input_len(&self) -> usize {
        self.input.chars().count()
    }

    pub fn output_len(&self) -> usize {
        self.output.chars().count()
    }

    pub fn to_row(&self) -> Vec<Value> {
        vec![
            json!(self.timestamp),
            json!(self.user_id),
            json!(self.input),
            json!(self.output),
            json!(self.input_len()),
            json!(self.output_len()),
            json!(self.category.label()),
        ]
    }
}

pub fn header_row() -> Vec<Value> {
    LOG_HEADERS.iter().map(|h| json!(h)).collect()
}
