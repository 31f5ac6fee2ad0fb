use chrono::Local;

use crate::snapshot::ResourceRecord;

const SEPARATOR: &str = "---";

/// Browser link for a file, by Google Workspace type.
pub fn file_link(record: &ResourceRecord) -> String {
    let id = &record.id;
    match record.mime_type.as_str() {
        "application/vnd.google-apps.spreadsheet" => {
            format!("https://docs.google.com/spreadsheets/d/{id}")
        }
        "application/vnd.google-apps.document" => {
            format!("https://docs.google.com/document/d/{id}")
        }
        "application/vnd.google-apps.presentation" => {
            format!("https://docs.google.com/presentation/d/{id}")
        }
        _ => format!("https://drive.google.com/file/d/{id}/view"),
    }
}

fn entry(record: &ResourceRecord) -> String {
    let time = record
        .modified_time
        .with_timezone(&Local)
        .format("%Y-%m-%d %H:%M");
    format!(
        "{} modified at {time}.\n\n{}\n{SEPARATOR}",
        record.name,
        file_link(record)
    )
}

pub fn file_modified(record: &ResourceRecord) -> String {
    format!("🤖\n{}", entry(record))
}

pub fn unread_updates(records: &[ResourceRecord]) -> String {
    let mut message = String::from("🤖 Unread updates:\n\n");
    for record in records {
        message.push_str(&entry(record));
        message.push_str("\n\n");
    }
    message.truncate(message.trim_end().len());
    message
}
