//! `ndm list` – show every saved download.

use anyhow::Result;
use ndm_core::format::format_bytes;
use ndm_core::model::DownloadRecord;
use ndm_core::store::{self, Store};

pub fn run_list() -> Result<()> {
    let records = Store::new(store::default_store_path()?).load()?;
    if records.is_empty() {
        println!("No downloads.");
        return Ok(());
    }
    println!("{:<8} {:<11} {:>7} {:>10}  {}", "ID", "STATUS", "DONE", "SIZE", "FILE");
    for r in &records {
        println!("{}", row(r));
    }
    Ok(())
}

fn row(r: &DownloadRecord) -> String {
    let id = r.id.to_string();
    let size = if r.total_bytes > 0 {
        format_bytes(r.total_bytes)
    } else {
        "-".to_string()
    };
    let mut line = format!(
        "{:<8} {:<11} {:>6.1}% {:>10}  {}",
        &id[..8],
        r.status.as_str(),
        r.overall_progress() * 100.0,
        size,
        r.file_name
    );
    if let Some(msg) = &r.error_message {
        line.push_str(&format!("  ({})", msg));
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndm_core::model::Status;
    use std::path::PathBuf;

    #[test]
    fn failed_row_shows_message() {
        let mut r = DownloadRecord::new("http://h/a.iso", "a.iso", PathBuf::from("/d/a.iso"));
        r.status = Status::Failed;
        r.error_message = Some("Cancelled".into());
        let line = row(&r);
        assert!(line.starts_with(&r.id.to_string()[..8]));
        assert!(line.contains("failed"));
        assert!(line.contains("   0.0%"));
        assert!(line.contains(" -  a.iso"));
        assert!(line.ends_with("(Cancelled)"));
    }
}
