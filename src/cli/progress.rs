//! Progress display module
//!
//! Handles displaying task events and download progress in the CLI.

use std::collections::HashMap;
use std::io::{self, Write};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::rpc::{Gid, StatusSnapshot, TaskStatus};
use crate::tracker::{Task, TaskEvent};

/// Download statistics for progress display
#[derive(Debug, Clone, Default)]
pub struct DownloadStats {
    /// Total bytes downloaded
    pub downloaded: u64,
    /// Total bytes to download, 0 while unknown
    pub total: u64,
    /// Total bytes uploaded
    pub uploaded: u64,
    /// Download speed in bytes per second
    pub download_speed: f64,
    /// Upload speed in bytes per second
    pub upload_speed: f64,
    /// Number of connections
    pub connections: usize,
    /// Tasks the engine is working on
    pub active: usize,
    /// Download progress (0.0 to 1.0)
    pub progress: f64,
}

impl DownloadStats {
    /// Create new download stats
    pub fn new() -> Self {
        Self::default()
    }

    /// Stats of a single snapshot
    pub fn from_snapshot(snapshot: &StatusSnapshot) -> Self {
        Self {
            downloaded: snapshot.completed_length,
            total: snapshot.total_length,
            uploaded: snapshot.uploaded_length,
            download_speed: snapshot.download_speed as f64,
            upload_speed: snapshot.upload_speed as f64,
            connections: snapshot.connections as usize,
            active: usize::from(snapshot.status == TaskStatus::Active),
            progress: snapshot.progress(),
        }
    }

    /// Sum over every loaded task
    pub fn aggregate(tasks: &[Arc<Task>]) -> Self {
        let mut stats = tasks
            .iter()
            .filter_map(|t| t.snapshot())
            .map(|s| Self::from_snapshot(&s))
            .fold(Self::default(), |mut acc, s| {
                acc.downloaded += s.downloaded;
                acc.total += s.total;
                acc.uploaded += s.uploaded;
                acc.download_speed += s.download_speed;
                acc.upload_speed += s.upload_speed;
                acc.connections += s.connections;
                acc.active += s.active;
                acc
            });
        stats.progress = if stats.total == 0 {
            0.0
        } else {
            stats.downloaded as f64 / stats.total as f64
        };
        stats
    }

    /// Format bytes to human readable string
    pub fn format_bytes(bytes: u64) -> String {
        const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
        let mut size = bytes as f64;
        let mut unit_index = 0;

        while size >= 1024.0 && unit_index < UNITS.len() - 1 {
            size /= 1024.0;
            unit_index += 1;
        }

        format!("{:.2} {}", size, UNITS[unit_index])
    }

    /// Format speed to human readable string
    pub fn format_speed(bytes_per_sec: f64) -> String {
        format!("{}/s", Self::format_bytes(bytes_per_sec as u64))
    }

    /// Format duration to human readable string
    pub fn format_duration(duration: Duration) -> String {
        let total_secs = duration.as_secs();
        let hours = total_secs / 3600;
        let minutes = (total_secs % 3600) / 60;
        let seconds = total_secs % 60;

        if hours > 0 {
            format!("{}h {}m {}s", hours, minutes, seconds)
        } else if minutes > 0 {
            format!("{}m {}s", minutes, seconds)
        } else {
            format!("{}s", seconds)
        }
    }

    /// Calculate ETA based on download speed and remaining bytes
    pub fn calculate_eta(downloaded: u64, total: u64, speed: f64) -> Option<Duration> {
        if speed <= 0.0 || downloaded >= total {
            return None;
        }

        let remaining = total.saturating_sub(downloaded) as f64;
        let eta_secs = remaining / speed;
        Some(Duration::from_secs_f64(eta_secs))
    }
}

fn status_label(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Unknown => "pending",
        TaskStatus::Active => "active",
        TaskStatus::Waiting => "waiting",
        TaskStatus::Paused => "paused",
        TaskStatus::Error => "error",
        TaskStatus::Complete => "complete",
        TaskStatus::Removed => "removed",
    }
}

/// Progress display for CLI
pub struct ProgressDisplay {
    /// Start time of the session
    start_time: Instant,
    /// Last update time
    last_update: Option<Instant>,
    /// Update interval
    update_interval: Duration,
    /// Quiet mode (no progress output)
    quiet: bool,
    /// Names given on the command line, until the engine reports its own
    labels: HashMap<Gid, String>,
    /// Last status printed per task
    last_status: HashMap<Gid, TaskStatus>,
}

impl ProgressDisplay {
    /// Create a new progress display
    pub fn new(quiet: bool) -> Self {
        Self::with_interval(quiet, Duration::from_millis(500))
    }

    /// Create a progress display with custom update interval
    pub fn with_interval(quiet: bool, interval: Duration) -> Self {
        Self {
            start_time: Instant::now(),
            last_update: None,
            update_interval: interval,
            quiet,
            labels: HashMap::new(),
            last_status: HashMap::new(),
        }
    }

    /// Remember a name for a submitted task
    pub fn set_label(&mut self, gid: Gid, label: impl Into<String>) {
        self.labels.insert(gid, label.into());
    }

    /// Engine-reported name, else the submitted label, else the GID
    pub fn label_for(&self, task: &Task) -> String {
        task.snapshot()
            .and_then(|s| s.name().map(str::to_string))
            .or_else(|| self.labels.get(&task.gid()).cloned())
            .unwrap_or_else(|| task.gid().to_string())
    }

    /// One-line summary of a task
    pub fn task_line(&self, task: &Task) -> String {
        let label = self.label_for(task);
        let Some(snapshot) = task.snapshot() else {
            return format!("[{}] {} (pending)", task.gid(), label);
        };

        let stats = DownloadStats::from_snapshot(&snapshot);
        let mut line = format!(
            "[{}] {} {} {:.1}% | {} / {}",
            task.gid(),
            label,
            status_label(snapshot.status),
            stats.progress * 100.0,
            DownloadStats::format_bytes(stats.downloaded),
            DownloadStats::format_bytes(stats.total),
        );
        if snapshot.status == TaskStatus::Active {
            line.push_str(&format!(" | ↓ {}", DownloadStats::format_speed(stats.download_speed)));
        }
        if let Some(message) = snapshot.error_message.as_deref().filter(|m| !m.is_empty()) {
            line.push_str(&format!(" | {} ({})", message, snapshot.error_code));
        }
        line
    }

    /// Print what an event means to the user
    pub fn handle_event(&mut self, event: &TaskEvent) -> io::Result<()> {
        match event {
            TaskEvent::TopLevelTaskAdded(task) => {
                let line = format!("Added {}", self.task_line(task));
                self.print_status(&line)
            }
            TaskEvent::FollowedTaskAdded { parent, task } => {
                let line = format!("{} continues as {}", self.label_for(parent), self.task_line(task));
                self.print_status(&line)
            }
            TaskEvent::StatusUpdated(task) => {
                let status = task.status();
                let previous = self.last_status.insert(task.gid(), status);
                if previous != Some(status) && status != TaskStatus::Active {
                    let line = self.task_line(task);
                    self.print_status(&line)?;
                }
                Ok(())
            }
            TaskEvent::SessionFaulted { reason } => self.print_error(&format!("Engine session failed: {}", reason)),
            TaskEvent::TaskAdded(_) => Ok(()),
        }
    }

    /// Aggregate progress bar line
    pub fn progress_line(&self, stats: &DownloadStats) -> String {
        let progress_percent = stats.progress * 100.0;

        let bar_width: usize = 40;
        let filled = ((progress_percent / 100.0 * bar_width as f64) as usize).min(bar_width);
        let empty = bar_width - filled;
        let bar: String = "=".repeat(filled) + &" ".repeat(empty);

        let eta = DownloadStats::calculate_eta(stats.downloaded, stats.total, stats.download_speed);
        let eta_str = eta
            .map(DownloadStats::format_duration)
            .unwrap_or_else(|| "∞".to_string());

        format!(
            "[{}] {:.1}% | {} / {} | ↓ {} | ↑ {} | Active: {} | ETA: {}",
            bar,
            progress_percent,
            DownloadStats::format_bytes(stats.downloaded),
            DownloadStats::format_bytes(stats.total),
            DownloadStats::format_speed(stats.download_speed),
            DownloadStats::format_speed(stats.upload_speed),
            stats.active,
            eta_str,
        )
    }

    /// Redraw the progress bar, at most once per interval
    pub fn update(&mut self, tasks: &[Arc<Task>]) -> io::Result<()> {
        if self.quiet {
            return Ok(());
        }

        if self.last_update.is_some_and(|t| t.elapsed() < self.update_interval) {
            return Ok(());
        }
        self.last_update = Some(Instant::now());

        let line = self.progress_line(&DownloadStats::aggregate(tasks));
        print!("\r\x1b[2K{}", line);
        io::stdout().flush()
    }

    /// Print the final per-task summary
    pub fn print_summary(&self, tasks: &[Arc<Task>]) -> io::Result<()> {
        if self.quiet {
            return Ok(());
        }

        print!("\r\x1b[2K");
        println!();
        println!("Session Summary:");
        for task in tasks {
            let indent = if task.is_top_level() { "" } else { "  " };
            println!("  {}{}", indent, self.task_line(task));
        }
        let stats = DownloadStats::aggregate(tasks);
        println!("  Uploaded: {}", DownloadStats::format_bytes(stats.uploaded));
        println!("  Elapsed Time: {}", DownloadStats::format_duration(self.elapsed()));
        io::stdout().flush()
    }

    /// Print a status message
    pub fn print_status(&self, message: &str) -> io::Result<()> {
        if self.quiet {
            return Ok(());
        }

        println!("\r\x1b[2K{}", message);
        Ok(())
    }

    /// Print an error message
    pub fn print_error(&self, message: &str) -> io::Result<()> {
        eprintln!("\r\x1b[2KError: {}", message);
        Ok(())
    }

    /// Get the elapsed time since start
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Check if quiet mode is enabled
    pub fn is_quiet(&self) -> bool {
        self.quiet
    }
}
