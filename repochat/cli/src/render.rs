//! Terminal rendering

use std::io::Write;

use repochat_core::{ClientMessage, CodeReference, RepositoryRecord};

/// One-line summary of a repository record
pub fn record_line(record: &RepositoryRecord) -> String {
    let mut line = format!(
        "{:<36}  {:<10}  {:>4.0}%",
        record.repo_id,
        record.status,
        record.progress_fraction() * 100.0
    );
    if let (Some(done), Some(total)) = (record.processed_files, record.total_files) {
        line.push_str(&format!("  {done}/{total} files"));
    }
    line.push_str("  ");
    line.push_str(&record.repo_url);
    if let Some(ref error) = record.error {
        line.push_str(&format!("  ({error})"));
    }
    line
}

/// Print a list of repositories, newest first
pub fn print_repositories(repositories: &[RepositoryRecord]) {
    if repositories.is_empty() {
        println!("No repositories yet.");
        return;
    }
    for record in repositories {
        println!("{}", record_line(record));
    }
}

/// Print references attached to an answer
pub fn print_references(references: &[CodeReference]) {
    if references.is_empty() {
        return;
    }
    println!();
    println!("References:");
    for reference in references {
        println!("  {} [{}]", reference.location(), reference.language());
    }
}

/// Render a conversation update as it arrives
pub fn render_turn_message(message: &ClientMessage) {
    match message {
        ClientMessage::ContentAppended { delta, .. } => {
            let mut stdout = std::io::stdout().lock();
            // Broken pipe on stdout is not worth aborting the turn for
            let _ = stdout.write_all(delta.as_bytes());
            let _ = stdout.flush();
        }
        ClientMessage::TurnClosed { .. } => println!(),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use repochat_core::RepoStatus;

    #[test]
    fn test_record_line() {
        let mut record = RepositoryRecord::queued("r1", "https://github.com/octo/widgets")
            .with_status(RepoStatus::Processing);
        record.progress = Some(0.5);
        record.processed_files = Some(5);
        record.total_files = Some(10);

        let line = record_line(&record);
        assert!(line.contains("processing"));
        assert!(line.contains("50%"));
        assert!(line.contains("5/10 files"));
        assert!(line.ends_with("https://github.com/octo/widgets"));
    }
}
