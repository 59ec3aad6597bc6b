//! Trigger engine: interval and cron firings, each running a rotation pass

use chrono::{DateTime, Local, Utc};
use chrono_tz::Tz;
use cron::Schedule;
use pmrotate_core::{Config, EvaluationRequest, Trigger};
use pmrotate_ipc::ProcessSource;
use pmrotate_logs::{Discovery, RotationOutcome, Rotator};
use pmrotate_notify::NotificationManager;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// What one pass did
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PassSummary {
    pub evaluated: usize,
    pub rotated: usize,
    pub failed: usize,
    /// The process table could not be fetched; only supervisor logs were evaluated
    pub discovery_failed: bool,
}

/// Main daemon struct
pub struct Daemon {
    config: Arc<Config>,
    discovery: Discovery,
    rotator: Arc<Rotator>,
}

impl Daemon {
    pub fn new(
        config: Arc<Config>,
        source: Arc<dyn ProcessSource>,
        alerts: Arc<NotificationManager>,
    ) -> Self {
        Self::with_rotator(
            Arc::clone(&config),
            source,
            Rotator::new(config, alerts),
        )
    }

    /// Build around a preconfigured rotator
    pub fn with_rotator(config: Arc<Config>, source: Arc<dyn ProcessSource>, rotator: Rotator) -> Self {
        Self {
            discovery: Discovery::new(source, config.rotate_module),
            config,
            rotator: Arc::new(rotator),
        }
    }

    pub fn rotator(&self) -> &Arc<Rotator> {
        &self.rotator
    }

    /// Run both trigger sources until cancelled
    pub async fn run(self: Arc<Self>) {
        info!(
            "Polling every {}s, forced rotation on '{}'",
            self.config.worker_interval.as_secs(),
            self.config.rotate_cron
        );

        tokio::join!(
            Arc::clone(&self).interval_loop(),
            Arc::clone(&self).cron_loop()
        );
    }

    async fn interval_loop(self: Arc<Self>) {
        let period = self.config.worker_interval;
        let mut ticker = time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            info!("interval triggered");
            self.fire(Trigger::Interval);
        }
    }

    async fn cron_loop(self: Arc<Self>) {
        let mut last_fired = Utc::now();

        loop {
            let Some(next) = next_wakeup(
                &self.config.rotate_schedule,
                self.config.timezone,
                last_fired,
                Utc::now(),
            ) else {
                warn!("Cron schedule '{}' has no upcoming firing", self.config.rotate_cron);
                return;
            };
            debug!("Next forced rotation at {}", next);

            let wait = (next - Utc::now()).to_std().unwrap_or(Duration::ZERO);
            time::sleep(wait).await;

            info!("cron triggered");
            self.fire(Trigger::Cron);
            last_fired = next;
        }
    }

    /// Start a pass in the background so a slow pass never delays the next firing
    fn fire(self: &Arc<Self>, trigger: Trigger) {
        let daemon = Arc::clone(self);
        tokio::spawn(async move {
            daemon.run_pass(trigger).await;
        });
    }

    /// Discover the current log files and evaluate each one concurrently.
    ///
    /// The supervisor's own logs are queued before discovery, so a failed
    /// or slow process listing never holds them back; the application logs
    /// are skipped for this pass on failure.
    pub async fn run_pass(&self, trigger: Trigger) -> PassSummary {
        let force = trigger.force();
        let mut summary = PassSummary::default();
        let mut tasks = JoinSet::new();

        let supervisor_logs = self
            .config
            .supervisor_logs()
            .into_iter()
            .map(|path| EvaluationRequest::new(path, force));
        for request in supervisor_logs {
            self.spawn_evaluation(&mut tasks, request);
        }

        match self.discovery.discover(force).await {
            Ok(requests) => {
                for request in requests {
                    self.spawn_evaluation(&mut tasks, request);
                }
            }
            Err(e) => {
                error!("{} pass: cannot list processes: {}", trigger, e);
                summary.discovery_failed = true;
            }
        }
        summary.evaluated = tasks.len();

        while let Some(result) = tasks.join_next().await {
            match result {
                Ok(RotationOutcome::Rotated { .. }) => summary.rotated += 1,
                Ok(RotationOutcome::Failed) => summary.failed += 1,
                Ok(RotationOutcome::Skipped) => {}
                Err(e) => {
                    warn!("Evaluation task failed: {}", e);
                    summary.failed += 1;
                }
            }
        }

        info!(
            "{} pass done: {} evaluated, {} rotated, {} failed, {} files watched",
            trigger,
            summary.evaluated,
            summary.rotated,
            summary.failed,
            self.rotator.watched().len()
        );
        summary
    }

    fn spawn_evaluation(&self, tasks: &mut JoinSet<RotationOutcome>, request: EvaluationRequest) {
        let rotator = Arc::clone(&self.rotator);
        tasks.spawn(async move { rotator.process(&request.path, request.force).await });
    }
}

/// Next firing of `schedule` strictly after `after`, evaluated in `tz` or local time
pub fn next_fire(
    schedule: &Schedule,
    tz: Option<Tz>,
    after: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    match tz {
        Some(tz) => schedule
            .after(&after.with_timezone(&tz))
            .next()
            .map(|t| t.with_timezone(&Utc)),
        None => schedule
            .after(&after.with_timezone(&Local))
            .next()
            .map(|t| t.with_timezone(&Utc)),
    }
}

/// Next firing to wait for. Firings missed while the host was suspended or
/// the loop was starved collapse into none: the schedule resumes from `now`.
pub fn next_wakeup(
    schedule: &Schedule,
    tz: Option<Tz>,
    last_fired: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    next_fire(schedule, tz, last_fired.max(now))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use pmrotate_core::config::{ConfigFile, SizeSetting};
    use pmrotate_core::{Error, ManagedProcess, Result};
    use pmrotate_ipc::{ReconnectPolicy, SupervisorClient};
    use std::path::{Path, PathBuf};
    use std::str::FromStr;
    use tempfile::TempDir;

    struct StaticSource(Vec<ManagedProcess>);

    #[async_trait]
    impl ProcessSource for StaticSource {
        async fn list_processes(&self) -> Result<Vec<ManagedProcess>> {
            Ok(self.0.clone())
        }
    }

    struct BrokenSource;

    #[async_trait]
    impl ProcessSource for BrokenSource {
        async fn list_processes(&self) -> Result<Vec<ManagedProcess>> {
            Err(Error::supervisor("process table unavailable"))
        }
    }

    fn midnight() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap()
    }

    fn config(home: &Path, max_size: u64) -> Arc<Config> {
        let file = ConfigFile {
            max_size: Some(SizeSetting::Bytes(max_size)),
            timezone: Some("UTC".to_string()),
            supervisor_home: Some(home.to_path_buf()),
            ..Default::default()
        };
        Arc::new(file.into_config().unwrap())
    }

    fn daemon(config: Arc<Config>, source: Arc<dyn ProcessSource>) -> Daemon {
        let rotator = Rotator::new(Arc::clone(&config), Arc::new(NotificationManager::default()))
            .with_clock(midnight);
        Daemon::with_rotator(config, source, rotator)
    }

    fn write_log(dir: &Path, name: &str, bytes: usize) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, vec![b'x'; bytes]).unwrap();
        path
    }

    fn len(path: &Path) -> u64 {
        std::fs::metadata(path).unwrap().len()
    }

    #[tokio::test]
    async fn test_interval_pass_rotates_only_large_files() {
        let dir = TempDir::new().unwrap();
        let big = write_log(dir.path(), "big.log", 2048);
        let small = write_log(dir.path(), "small.log", 10);
        write_log(dir.path(), "pm2.log", 10);

        let source = Arc::new(StaticSource(vec![
            ManagedProcess::new("big").with_out_log(big.to_string_lossy()),
            ManagedProcess::new("small").with_out_log(small.to_string_lossy()),
        ]));
        let daemon = daemon(config(dir.path(), 1024), source);

        let summary = daemon.run_pass(Trigger::Interval).await;
        assert_eq!(summary.evaluated, 4);
        assert_eq!(summary.rotated, 1);
        assert_eq!(summary.failed, 0);
        assert!(!summary.discovery_failed);

        assert_eq!(len(&big), 0);
        assert_eq!(len(&small), 10);
        assert_eq!(len(&dir.path().join("big__2024-01-15_00-00-00.log")), 2048);

        // Missing agent.log is skipped, not watched
        assert_eq!(daemon.rotator().watched().len(), 3);
    }

    #[tokio::test]
    async fn test_cron_pass_forces_every_non_empty_file() {
        let dir = TempDir::new().unwrap();
        let small = write_log(dir.path(), "small.log", 10);
        let empty = write_log(dir.path(), "empty.log", 0);
        write_log(dir.path(), "pm2.log", 5);

        let source = Arc::new(StaticSource(vec![ManagedProcess::new("small")
            .with_out_log(small.to_string_lossy())
            .with_err_log(empty.to_string_lossy())]));
        let daemon = daemon(config(dir.path(), 1024 * 1024), source);

        let summary = daemon.run_pass(Trigger::Cron).await;
        assert_eq!(summary.rotated, 2);
        assert_eq!(len(&small), 0);
        assert!(dir.path().join("small__2024-01-15_00-00-00.log").exists());
        assert!(dir.path().join("pm2__2024-01-15_00-00-00.log").exists());
        assert!(!dir.path().join("empty__2024-01-15_00-00-00.log").exists());
    }

    #[tokio::test]
    async fn test_supervisor_failure_still_rotates_own_logs() {
        let dir = TempDir::new().unwrap();
        write_log(dir.path(), "agent.log", 4096);

        let daemon = daemon(config(dir.path(), 1024), Arc::new(BrokenSource));

        let summary = daemon.run_pass(Trigger::Interval).await;
        assert!(summary.discovery_failed);
        assert_eq!(summary.evaluated, 2);
        assert_eq!(summary.rotated, 1);
        assert_eq!(len(&dir.path().join("agent.log")), 0);
    }

    #[tokio::test]
    async fn test_clustered_instances_rotate_once() {
        let dir = TempDir::new().unwrap();
        let shared = write_log(dir.path(), "api.log", 2048);

        let instance = ManagedProcess::new("api")
            .with_instances(4)
            .with_out_log(shared.to_string_lossy());
        let source = Arc::new(StaticSource(vec![instance.clone(), instance.clone(), instance]));
        let daemon = daemon(config(dir.path(), 1024), source);

        let summary = daemon.run_pass(Trigger::Interval).await;
        assert_eq!(summary.rotated, 1);
        // api.log plus the two supervisor logs
        assert_eq!(summary.evaluated, 3);
    }

    #[test]
    fn test_next_fire_in_timezone() {
        let schedule = Schedule::from_str("0 0 0 * * *").unwrap();
        // 09:00 in Tokyo, next midnight there is 15:00 UTC
        let next = next_fire(&schedule, Some(chrono_tz::Asia::Tokyo), midnight()).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 1, 15, 15, 0, 0).unwrap());
    }

    #[test]
    fn test_next_fire_is_strictly_after() {
        let schedule = Schedule::from_str("0 0 0 * * *").unwrap();
        let next = next_fire(&schedule, Some(chrono_tz::UTC), midnight()).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 1, 16, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_missed_firings_are_coalesced() {
        let schedule = Schedule::from_str("0 0 0 * * *").unwrap();
        let last_fired = midnight();
        // Woke up two and a half days later
        let now = Utc.with_ymd_and_hms(2024, 1, 17, 12, 0, 0).unwrap();

        let next = next_wakeup(&schedule, Some(chrono_tz::UTC), last_fired, now).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 1, 18, 0, 0, 0).unwrap());
        assert!(next > now);
    }

    #[test]
    fn test_next_wakeup_after_on_time_firing() {
        let schedule = Schedule::from_str("0 0 0 * * *").unwrap();
        let now = midnight() + chrono::Duration::milliseconds(3);

        let next = next_wakeup(&schedule, Some(chrono_tz::UTC), midnight(), now).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 1, 16, 0, 0, 0).unwrap());
    }

    /// Answers the handshake ping, then never answers again
    fn spawn_silent_supervisor(socket: &Path) {
        use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

        let listener = tokio::net::UnixListener::bind(socket).unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                tokio::spawn(async move {
                    let mut reader = BufReader::new(stream);
                    let mut line = String::new();
                    if reader.read_line(&mut line).await.unwrap_or(0) == 0 {
                        return;
                    }
                    if reader.get_mut().write_all(b"{\"type\":\"pong\"}\n").await.is_err() {
                        return;
                    }
                    loop {
                        line.clear();
                        if reader.read_line(&mut line).await.unwrap_or(0) == 0 {
                            return;
                        }
                    }
                });
            }
        });
    }

    #[tokio::test]
    async fn test_silent_supervisor_does_not_stall_pass() {
        let dir = TempDir::new().unwrap();
        write_log(dir.path(), "pm2.log", 4096);
        let socket = dir.path().join("rpc.sock");
        spawn_silent_supervisor(&socket);

        let client = SupervisorClient::new(socket).with_policy(ReconnectPolicy {
            max_attempts: 1,
            delay: Duration::from_millis(10),
            request_timeout: Duration::from_millis(200),
        });
        client.connect().await.unwrap();
        let daemon = daemon(config(dir.path(), 1024), Arc::new(client));

        let summary = time::timeout(Duration::from_secs(5), daemon.run_pass(Trigger::Interval))
            .await
            .expect("pass should finish without a supervisor answer");
        assert!(summary.discovery_failed);
        assert_eq!(summary.rotated, 1);
        assert_eq!(len(&dir.path().join("pm2.log")), 0);
        assert!(dir.path().join("pm2__2024-01-15_00-00-00.log").exists());
    }
}
