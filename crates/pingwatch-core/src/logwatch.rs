//! Probe log sink with size-triggered rotation.
//!
//! Every probe outcome is appended as one line. After each append the log
//! size is compared against `threshold_ratio * max_size`; crossing it renames
//! the log to a timestamped archive, starts a fresh file, and sends a notice.
//! A cooldown limits rotations (and therefore notices) to one per window.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::config::LogConfig;
use crate::notify::Notifier;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogState {
    pub current_size: u64,
    /// Time of the last rotation. Set on every rotation, including when no
    /// notifier is configured and the notice is dropped, so the cooldown
    /// limits rotations the same way with or without a channel.
    pub last_rotation_notice_at: Option<DateTime<Utc>>,
}

/// Result of one size check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogCheck {
    BelowThreshold,
    Rotated { archive: PathBuf },
    /// Over threshold, but a rotation already happened within the cooldown window.
    CooldownActive,
    /// An I/O error prevented the check or the rotation. Already logged.
    Failed,
}

pub struct LogGrowthMonitor {
    config: LogConfig,
    state: Mutex<LogState>,
    notifier: Option<Notifier>,
}

impl LogGrowthMonitor {
    pub fn new(config: LogConfig, notifier: Option<Notifier>) -> Self {
        Self {
            config,
            state: Mutex::new(LogState::default()),
            notifier,
        }
    }

    pub fn config(&self) -> &LogConfig {
        &self.config
    }

    pub fn path(&self) -> &Path {
        &self.config.path
    }

    pub async fn state(&self) -> LogState {
        self.state.lock().await.clone()
    }

    /// Append a line and run the size check, both under the state lock.
    pub async fn record(&self, line: &str) -> LogCheck {
        self.record_at(line, Utc::now()).await
    }

    pub async fn record_at(&self, line: &str, now: DateTime<Utc>) -> LogCheck {
        let mut state = self.state.lock().await;
        if let Err(e) = append_line(&self.config.path, line).await {
            error!(path = %self.config.path.display(), error = %e, "Failed to append to probe log");
            return LogCheck::Failed;
        }
        self.check_locked(&mut state, now).await
    }

    pub async fn after_append(&self) -> LogCheck {
        self.after_append_at(Utc::now()).await
    }

    pub async fn after_append_at(&self, now: DateTime<Utc>) -> LogCheck {
        let mut state = self.state.lock().await;
        self.check_locked(&mut state, now).await
    }

    async fn check_locked(&self, state: &mut LogState, now: DateTime<Utc>) -> LogCheck {
        let path = &self.config.path;
        let size = match fs::metadata(path).await {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == ErrorKind::NotFound => 0,
            Err(e) => {
                error!(path = %path.display(), error = %e, "Failed to read probe log size");
                return LogCheck::Failed;
            }
        };
        state.current_size = size;

        let threshold = self.config.threshold_bytes();
        if size <= threshold {
            return LogCheck::BelowThreshold;
        }

        if !self.cooldown_elapsed(state, now) {
            debug!(
                path = %path.display(),
                size,
                threshold,
                "Probe log over threshold, rotation suppressed by cooldown"
            );
            return LogCheck::CooldownActive;
        }

        let archive = match rotate(path, now).await {
            Ok(archive) => archive,
            Err(e) => {
                error!(path = %path.display(), error = %e, "Failed to rotate probe log");
                return LogCheck::Failed;
            }
        };

        state.current_size = 0;
        state.last_rotation_notice_at = Some(match state.last_rotation_notice_at {
            Some(prev) if prev > now => prev,
            _ => now,
        });

        info!(
            path = %path.display(),
            archive = %archive.display(),
            size,
            "Rotated probe log"
        );

        match &self.notifier {
            Some(notifier) => {
                notifier.send(format!(
                    "Probe log {} reached {} bytes (threshold {} of {} max) and was rotated to {}",
                    path.display(),
                    size,
                    threshold,
                    self.config.max_size,
                    archive.display()
                ));
            }
            None => warn!("No notification channel configured, rotation notice dropped"),
        }

        LogCheck::Rotated { archive }
    }

    fn cooldown_elapsed(&self, state: &LogState, now: DateTime<Utc>) -> bool {
        match state.last_rotation_notice_at {
            None => true,
            Some(last) => match (now - last).to_std() {
                Ok(elapsed) => elapsed > self.config.cooldown,
                Err(_) => false,
            },
        }
    }
}

async fn append_line(path: &Path, line: &str) -> std::io::Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(line.as_bytes()).await?;
    file.write_all(b"\n").await?;
    file.flush().await
}

/// Rename the log to `<name>.<YYYYmmdd-HHMMSS>` and recreate it empty.
async fn rotate(path: &Path, now: DateTime<Utc>) -> std::io::Result<PathBuf> {
    let archive = archive_path(path, now).await?;
    fs::rename(path, &archive).await?;
    fs::File::create(path).await?;
    Ok(archive)
}

async fn archive_path(path: &Path, now: DateTime<Utc>) -> std::io::Result<PathBuf> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "pingwatch.log".to_string());
    let stamp = now.format("%Y%m%d-%H%M%S");

    let mut candidate = path.with_file_name(format!("{}.{}", file_name, stamp));
    let mut n = 1u32;
    while fs::try_exists(&candidate).await? {
        candidate = path.with_file_name(format!("{}.{}-{}", file_name, stamp, n));
        n += 1;
    }
    Ok(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use crate::config::RetryPolicy;
    use crate::notify::testing::RecordingChannel;

    fn t(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    fn small_log(dir: &Path) -> LogConfig {
        LogConfig::default()
            .with_path(dir.join("probes.log"))
            .with_max_size(100)
            .with_threshold_ratio(0.9)
            .with_cooldown(Duration::from_secs(3600))
    }

    async fn fill(path: &Path, bytes: usize) {
        let mut content = fs::read(path).await.unwrap_or_default();
        content.extend(std::iter::repeat(b'x').take(bytes));
        fs::write(path, content).await.unwrap();
    }

    #[tokio::test]
    async fn below_threshold_does_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let monitor = LogGrowthMonitor::new(small_log(dir.path()), None);
        fill(monitor.path(), 90).await;

        assert_eq!(monitor.after_append_at(t(0)).await, LogCheck::BelowThreshold);
        let state = monitor.state().await;
        assert_eq!(state.current_size, 90);
        assert_eq!(state.last_rotation_notice_at, None);
    }

    #[tokio::test]
    async fn missing_log_counts_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let monitor = LogGrowthMonitor::new(small_log(dir.path()), None);
        assert_eq!(monitor.after_append_at(t(0)).await, LogCheck::BelowThreshold);
    }

    #[tokio::test]
    async fn rotation_archives_content_and_empties_log() {
        let dir = tempfile::tempdir().unwrap();
        let monitor = LogGrowthMonitor::new(small_log(dir.path()), None);
        fill(monitor.path(), 95).await;

        let archive = match monitor.after_append_at(t(0)).await {
            LogCheck::Rotated { archive } => archive,
            other => panic!("expected rotation, got {:?}", other),
        };

        assert_eq!(fs::metadata(monitor.path()).await.unwrap().len(), 0);
        assert_eq!(fs::read(&archive).await.unwrap(), vec![b'x'; 95]);
        assert!(archive
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("probes.log.2023"));

        let state = monitor.state().await;
        assert_eq!(state.current_size, 0);
        assert_eq!(state.last_rotation_notice_at, Some(t(0)));
    }

    #[tokio::test]
    async fn cooldown_gates_rotation_and_notice() {
        let dir = tempfile::tempdir().unwrap();
        let (channel, mut rx) = RecordingChannel::new();
        let notifier = Notifier::new(channel, RetryPolicy::default());
        let monitor = LogGrowthMonitor::new(small_log(dir.path()), Some(notifier));

        fill(monitor.path(), 95).await;
        assert!(matches!(
            monitor.after_append_at(t(0)).await,
            LogCheck::Rotated { .. }
        ));
        let notice = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(notice.contains("rotated"), "{}", notice);

        fill(monitor.path(), 95).await;
        assert_eq!(monitor.after_append_at(t(600)).await, LogCheck::CooldownActive);
        assert_eq!(fs::metadata(monitor.path()).await.unwrap().len(), 95);
        assert!(
            tokio::time::timeout(Duration::from_millis(200), rx.recv())
                .await
                .is_err(),
            "no notice expected inside the cooldown window"
        );

        assert!(matches!(
            monitor.after_append_at(t(3700)).await,
            LogCheck::Rotated { .. }
        ));
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(monitor.state().await.last_rotation_notice_at, Some(t(3700)));
    }

    #[tokio::test]
    async fn many_checks_inside_window_rotate_once() {
        let dir = tempfile::tempdir().unwrap();
        let monitor = LogGrowthMonitor::new(small_log(dir.path()), None);

        let mut rotations = 0;
        for i in 0..20 {
            fill(monitor.path(), 50).await;
            if let LogCheck::Rotated { .. } = monitor.after_append_at(t(i * 60)).await {
                rotations += 1;
            }
        }
        assert_eq!(rotations, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_records_rotate_once() {
        let dir = tempfile::tempdir().unwrap();
        let monitor = Arc::new(LogGrowthMonitor::new(small_log(dir.path()), None));

        let handles: Vec<_> = (0..64)
            .map(|i| {
                let monitor = Arc::clone(&monitor);
                tokio::spawn(async move {
                    monitor
                        .record_at(&format!("line {:02} xxxxxxxx", i), t(0))
                        .await
                })
            })
            .collect();

        let mut rotations = 0;
        for handle in handles {
            if let LogCheck::Rotated { .. } = handle.await.unwrap() {
                rotations += 1;
            }
        }
        assert_eq!(rotations, 1);

        let mut archives = 0;
        let mut entries = fs::read_dir(dir.path()).await.unwrap();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            if entry.file_name().to_string_lossy().starts_with("probes.log.") {
                archives += 1;
            }
        }
        assert_eq!(archives, 1);
    }

    #[tokio::test]
    async fn record_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let monitor = LogGrowthMonitor::new(small_log(dir.path()), None);
        monitor.record_at("first", t(0)).await;
        monitor.record_at("second", t(1)).await;

        let content = fs::read_to_string(monitor.path()).await.unwrap();
        assert_eq!(content, "first\nsecond\n");
        assert_eq!(monitor.state().await.current_size, content.len() as u64);
    }

    #[tokio::test]
    async fn notice_time_never_moves_backwards() {
        let dir = tempfile::tempdir().unwrap();
        let config = small_log(dir.path()).with_cooldown(Duration::ZERO);
        let monitor = LogGrowthMonitor::new(config, None);

        fill(monitor.path(), 95).await;
        monitor.after_append_at(t(100)).await;
        fill(monitor.path(), 95).await;
        assert_eq!(monitor.after_append_at(t(50)).await, LogCheck::CooldownActive);
        assert_eq!(monitor.state().await.last_rotation_notice_at, Some(t(100)));
    }

    #[tokio::test]
    async fn unwritable_log_reports_failure() {
        let dir = tempfile::tempdir().unwrap();
        let config = small_log(dir.path()).with_path(dir.path().join("missing").join("probes.log"));
        let monitor = LogGrowthMonitor::new(config, None);
        assert_eq!(monitor.record_at("line", t(0)).await, LogCheck::Failed);
    }
}
