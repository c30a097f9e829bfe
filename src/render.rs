// src/render.rs — Terminal presentation helpers

use crate::core::types::{Message, ProductRow};

/// Rows shown inline before pointing at the downloadable report.
pub const TABLE_PREVIEW_ROWS: usize = 10;

/// Prettify a snake_case column name for table headers
/// ("expiration_date" -> "Expiration Date").
fn prettify_column(name: &str) -> String {
    name.split('_')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn cell_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Render product rows as a markdown table preview: up to
/// [`TABLE_PREVIEW_ROWS`] rows, with a note when more exist. Columns come
/// from the first row (key-sorted, so output is deterministic). Empty
/// input renders nothing.
pub fn products_table(rows: &[ProductRow]) -> String {
    let Some(first) = rows.first() else {
        return String::new();
    };
    let columns: Vec<&String> = first.keys().collect();

    let mut table = String::from("\n\n| ");
    table.push_str(
        &columns
            .iter()
            .map(|c| prettify_column(c))
            .collect::<Vec<_>>()
            .join(" | "),
    );
    table.push_str(" |\n| ");
    table.push_str(&vec!["---"; columns.len()].join(" | "));
    table.push_str(" |\n");

    for row in rows.iter().take(TABLE_PREVIEW_ROWS) {
        table.push_str("| ");
        table.push_str(
            &columns
                .iter()
                .map(|c| row.get(*c).map(cell_text).unwrap_or_default())
                .collect::<Vec<_>>()
                .join(" | "),
        );
        table.push_str(" |\n");
    }

    if rows.len() > TABLE_PREVIEW_ROWS {
        table.push_str(&format!(
            "\n*This is a preview showing the first {TABLE_PREVIEW_ROWS} of {} products. \
             For the complete list, download the full report below.*",
            rows.len()
        ));
    } else {
        table.push_str("\n*This is a preview. For the complete list, download the full report below.*");
    }

    table
}

/// Print a message to the terminal: sender marker, text, then download
/// affordances for any structured attachments.
pub fn print_message(message: &Message) {
    let marker = match message.sender {
        crate::core::types::Sender::User => "you",
        crate::core::types::Sender::Assistant => "assistant",
    };
    println!("[{marker}] {}", message.text.trim_end());

    for attachment in &message.attachments {
        println!(
            "  attachment: {} ({})",
            attachment.filename,
            crate::util::format_file_size(attachment.bytes)
        );
    }
    if let Some(csv) = &message.csv {
        println!("  csv: {} -> {}", csv.filename, csv.url);
    }
    println!();
}

/// An assistant-styled error line (run/report failures are rendered, not
/// thrown).
pub fn print_assistant_error(text: &str) {
    eprintln!("[assistant] {text}\n");
}
