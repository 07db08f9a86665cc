use console::style;

use crate::types::{GenerationJob, JobStatus};

pub struct Output;

impl Output {
    pub fn new() -> Self {
        Self
    }

    pub fn success(&self, message: &str) {
        println!("{} {}", style("✓").green(), message);
    }

    pub fn error(&self, message: &str) {
        eprintln!("{} {}", style("✗").red(), message);
    }

    pub fn warning(&self, message: &str) {
        println!("{} {}", style("⚠").yellow(), message);
    }

    pub fn info(&self, message: &str) {
        println!("{} {}", style("ℹ").blue(), message);
    }

    pub fn header(&self, message: &str) {
        println!("\n{}", style(message).bold().underlined());
    }

    pub fn section(&self, message: &str) {
        println!("\n{}", style(message).bold());
        println!("{}", "─".repeat(40));
    }

    pub fn field(&self, label: &str, value: impl std::fmt::Display) {
        println!("  {:<12} {}", style(label).dim(), value);
    }

    /// Status word colored by outcome
    pub fn status(&self, status: JobStatus) -> String {
        match status {
            JobStatus::Processing => style(status.as_str()).yellow().to_string(),
            JobStatus::Completed => style(status.as_str()).green().to_string(),
            JobStatus::Failed => style(status.as_str()).red().to_string(),
        }
    }

    /// Full job record: metadata, then the document
    pub fn job(&self, job: &GenerationJob) {
        self.section(&format!("Job {}", job.id));
        self.field("Status", self.status(job.status));
        self.field("Owner", &job.owner);
        if let Some(message) = &job.status_message {
            self.field("Message", message);
        }
        self.field("Created", job.created_at.to_rfc3339());
        self.field("Updated", job.updated_at.to_rfc3339());

        self.section("Document");
        match serde_json::to_string_pretty(&job.document) {
            Ok(text) => println!("{}", text),
            Err(_) => println!("{}", job.document),
        }
    }

    /// One-line job summary for listings
    pub fn job_row(&self, job: &GenerationJob) {
        let message = job.status_message.as_deref().unwrap_or("");
        println!(
            "  {}  {:<20}  {}  {}",
            job.id,
            self.status(job.status),
            style(job.created_at.format("%Y-%m-%d %H:%M:%S")).dim(),
            message
        );
    }
}

impl Default for Output {
    fn default() -> Self {
        Self::new()
    }
}
