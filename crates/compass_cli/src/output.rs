use compass_core::notify::{Affordance, NotificationLevel, Notifier};
use owo_colors::OwoColorize;

/// Standard output formatting for the CLI
#[derive(Debug, Clone, Copy, Default)]
pub struct Output;

impl Output {
    pub fn new() -> Self {
        Self
    }

    /// Print a system/status message (indented)
    pub fn status(&self, message: &str) {
        println!("  {}", message.dimmed());
    }

    /// Print an info message (indented)
    pub fn info(&self, label: &str, value: &str) {
        println!("  {} {}", label.bright_blue(), value);
    }

    /// Print a success message (indented)
    pub fn success(&self, message: &str) {
        println!("  {} {}", "✓".bright_green(), message);
    }

    /// Print an error message (indented)
    pub fn error(&self, message: &str) {
        println!("  {} {}", "✗".bright_red(), message);
    }

    /// Print a warning message (indented)
    pub fn warning(&self, message: &str) {
        println!("  {} {}", "⚠".yellow(), message);
    }

    /// Print a section header
    pub fn section(&self, title: &str) {
        println!();
        println!("{}", title.bright_cyan().bold());
        println!("{}", "─".repeat(40).dimmed());
    }

    /// Print a list item (already indented)
    pub fn list_item(&self, item: &str) {
        println!("    • {}", item);
    }

    /// Print a "working on it" status message
    pub fn working(&self, label: &str) {
        println!("  {} {}...", "[...]".dimmed(), label);
    }

    /// Print a key-value pair (indented)
    pub fn kv(&self, key: &str, value: &str) {
        println!("  {} {}", format!("{}:", key).dimmed(), value);
    }

    /// Print a table-like header
    pub fn table_header(&self, columns: &[&str]) {
        let header = columns.join(" | ");
        println!("  {}", header.bright_white().bold());
        println!("  {}", "─".repeat(header.chars().count()).dimmed());
    }

    /// Print a table row
    pub fn table_row(&self, cells: &[&str]) {
        println!("  {}", cells.join(" | "));
    }
}

/// Shows service notifications on the terminal
#[derive(Debug, Clone, Copy, Default)]
pub struct CliNotifier {
    output: Output,
}

impl Notifier for CliNotifier {
    fn notify(&self, level: NotificationLevel, title: &str, message: &str) {
        let line = format!("{}: {}", title.bold(), message);
        match level {
            NotificationLevel::Info => self.output.info("ℹ", &line),
            NotificationLevel::Success => self.output.success(&line),
            NotificationLevel::Warning => self.output.warning(&line),
            NotificationLevel::Error => self.output.error(&line),
        }
    }

    fn set_busy(&self, affordance: Affordance, busy: bool) {
        if busy {
            self.output.working(busy_label(affordance));
        }
    }

    fn celebrate(&self) {
        println!("  {}", "🎉 🎉 🎉".bright_magenta());
    }
}

fn busy_label(affordance: Affordance) -> &'static str {
    match affordance {
        Affordance::SosButton => "Sending SOS alert",
        Affordance::ReportButton => "Sending report",
        Affordance::TestButton => "Testing Twilio",
        Affordance::StatusIndicator => "Checking server",
    }
}

/// Yes/no in colour
pub fn format_flag(value: bool, yes: &str, no: &str) -> String {
    if value {
        yes.bright_green().to_string()
    } else {
        no.bright_red().to_string()
    }
}

/// Format a timestamp as relative time
pub fn format_relative_time(time: chrono::DateTime<chrono::Utc>) -> String {
    let now = chrono::Utc::now();
    let duration = now.signed_duration_since(time);

    if duration.num_seconds() < 60 {
        format!("{} seconds ago", duration.num_seconds().max(0))
            .dimmed()
            .to_string()
    } else if duration.num_minutes() < 60 {
        format!("{} minutes ago", duration.num_minutes())
            .dimmed()
            .to_string()
    } else if duration.num_hours() < 24 {
        format!("{} hours ago", duration.num_hours())
            .dimmed()
            .to_string()
    } else if duration.num_days() < 30 {
        format!("{} days ago", duration.num_days())
            .dimmed()
            .to_string()
    } else {
        time.format("%Y-%m-%d").to_string().dimmed().to_string()
    }
}
