//! Command dispatch - evaluates resolved schedules against "now" and sends
//! the matching commands.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Datelike, Timelike, Utc, Weekday};
use chrono_tz::Tz;
use fleetsync_domain::{ClockTime, PlanningCommand, Result};
use tracing::{debug, info, instrument};

use super::ports::{CommandExecutor, PlanningSource};
use super::resolver::resolve_schedules;

/// Outcome counters for one dispatch run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchReport {
    /// Plannings with at least one matching payload.
    pub plannings_matched: usize,
    /// Individual command sends performed.
    pub commands_sent: usize,
}

/// Dispatches time-windowed commands to the devices of each active planning.
///
/// Scheduling data is fetched fresh each run; the resolved tables live only
/// for the duration of the run. Executor failures are not caught inside the
/// send loop - a single device's failure aborts dispatch for the remainder
/// of the run and surfaces at the job's top-level handler.
pub struct CommandDispatcher {
    source: Arc<dyn PlanningSource>,
    executor: Arc<dyn CommandExecutor>,
    /// Reference timezone schedule windows are evaluated in. Host-local
    /// time is never used.
    timezone: Tz,
}

impl CommandDispatcher {
    pub fn new(source: Arc<dyn PlanningSource>, executor: Arc<dyn CommandExecutor>, timezone: Tz) -> Self {
        Self { source, executor, timezone }
    }

    /// Run one dispatch pass at the current time.
    #[instrument(skip(self))]
    pub async fn send_commands(&self) -> Result<DispatchReport> {
        let now = Utc::now().with_timezone(&self.timezone);

        let devices = self.source.get_devices().await?;
        let layers = self.source.get_layers().await?;
        let plannings = self.source.get_plannings().await?;
        let schedules = self.source.get_schedules().await?;

        let resolved =
            resolve_schedules(&layers, &plannings, &schedules, &devices, now.date_naive());

        let day = now.weekday();
        let minute_of_day = ClockTime::from_hm(now.hour() as u16, now.minute() as u16)
            .unwrap_or(ClockTime::MIDNIGHT);

        self.dispatch_at(&resolved, day, minute_of_day).await
    }

    /// Dispatch the payloads of `day` whose window strictly contains `now`.
    ///
    /// Split out from [`send_commands`](Self::send_commands) so the window
    /// matching can be exercised at a fixed instant.
    pub async fn dispatch_at(
        &self,
        resolved: &HashMap<String, PlanningCommand>,
        day: Weekday,
        now: ClockTime,
    ) -> Result<DispatchReport> {
        let mut report = DispatchReport::default();

        for command in resolved.values() {
            let mut matched = false;

            for payload in command.commands_for(day) {
                if !payload.matches(now) {
                    debug!(
                        planning_id = %command.planning_id,
                        command_id = %payload.command_id,
                        window_start = %payload.start,
                        window_end = %payload.end,
                        now = %now,
                        "payload window does not contain now"
                    );
                    continue;
                }
                matched = true;

                info!(
                    planning_id = %command.planning_id,
                    command_id = %payload.command_id,
                    device_count = command.device_ids.len(),
                    "dispatching scheduled command"
                );

                // Executor failures propagate: remaining devices in this
                // batch miss the run and catch up on the next trigger.
                for device_id in &command.device_ids {
                    self.executor.execute_command(device_id, &payload.command_id).await?;
                    report.commands_sent += 1;
                }
            }

            if matched {
                report.plannings_matched += 1;
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use fleetsync_domain::{Device, FleetError, Layer, PayloadCommand, Planning, Schedule};

    use super::*;

    struct EmptySource;

    #[async_trait]
    impl PlanningSource for EmptySource {
        async fn get_devices(&self) -> Result<Vec<Device>> {
            Ok(Vec::new())
        }

        async fn get_layers(&self) -> Result<Vec<Layer>> {
            Ok(Vec::new())
        }

        async fn get_plannings(&self) -> Result<Vec<Planning>> {
            Ok(Vec::new())
        }

        async fn get_schedules(&self) -> Result<Vec<Schedule>> {
            Ok(Vec::new())
        }
    }

    #[derive(Default)]
    struct RecordingExecutor {
        sent: Mutex<Vec<(String, String)>>,
        fail_on: Option<String>,
        calls: AtomicUsize,
    }

    impl RecordingExecutor {
        fn failing_on(device_id: &str) -> Self {
            Self { fail_on: Some(device_id.to_string()), ..Self::default() }
        }
    }

    #[async_trait]
    impl CommandExecutor for RecordingExecutor {
        async fn execute_command(&self, device_id: &str, command_id: &str) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_on.as_deref() == Some(device_id) {
                return Err(FleetError::Dispatch(format!("device {device_id} unreachable")));
            }
            self.sent.lock().unwrap().push((device_id.to_string(), command_id.to_string()));
            Ok(())
        }
    }

    fn dispatcher(executor: Arc<RecordingExecutor>) -> CommandDispatcher {
        CommandDispatcher::new(Arc::new(EmptySource), executor, chrono_tz::Europe::Paris)
    }

    fn resolved_with(command: PlanningCommand) -> HashMap<String, PlanningCommand> {
        HashMap::from([(command.planning_id.clone(), command)])
    }

    fn day_window_command() -> PlanningCommand {
        let mut command = PlanningCommand::new("P1");
        command.device_ids = vec!["dev-1".into(), "dev-2".into()];
        command.commands_by_day.insert(
            Weekday::Tue,
            vec![PayloadCommand {
                command_id: "C-DAY".into(),
                start: ClockTime::from_hm(8, 0).unwrap(),
                end: ClockTime::from_hm(18, 0).unwrap(),
            }],
        );
        command
    }

    #[tokio::test]
    async fn matching_window_dispatches_to_every_device_in_order() {
        let executor = Arc::new(RecordingExecutor::default());
        let dispatcher = dispatcher(executor.clone());

        let report = dispatcher
            .dispatch_at(
                &resolved_with(day_window_command()),
                Weekday::Tue,
                ClockTime::from_hm(8, 30).unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(report.commands_sent, 2);
        assert_eq!(report.plannings_matched, 1);
        assert_eq!(
            *executor.sent.lock().unwrap(),
            vec![
                ("dev-1".to_string(), "C-DAY".to_string()),
                ("dev-2".to_string(), "C-DAY".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn window_bounds_do_not_match() {
        let executor = Arc::new(RecordingExecutor::default());
        let dispatcher = dispatcher(executor.clone());
        let resolved = resolved_with(day_window_command());

        for now in [ClockTime::from_hm(8, 0).unwrap(), ClockTime::from_hm(18, 0).unwrap()] {
            let report = dispatcher.dispatch_at(&resolved, Weekday::Tue, now).await.unwrap();
            assert_eq!(report.commands_sent, 0);
        }

        assert!(executor.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn only_current_weekday_is_inspected() {
        let executor = Arc::new(RecordingExecutor::default());
        let dispatcher = dispatcher(executor.clone());

        let report = dispatcher
            .dispatch_at(
                &resolved_with(day_window_command()),
                Weekday::Wed,
                ClockTime::from_hm(8, 30).unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(report.commands_sent, 0);
    }

    #[tokio::test]
    async fn full_day_off_day_payload_matches_any_time_inside() {
        let executor = Arc::new(RecordingExecutor::default());
        let dispatcher = dispatcher(executor.clone());

        let mut command = PlanningCommand::new("P1");
        command.device_ids = vec!["dev-1".into()];
        command
            .commands_by_day
            .insert(Weekday::Sat, vec![PayloadCommand::full_day("C-OFF")]);

        let report = dispatcher
            .dispatch_at(
                &resolved_with(command),
                Weekday::Sat,
                ClockTime::from_hm(23, 59).unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(report.commands_sent, 1);
        assert_eq!(
            *executor.sent.lock().unwrap(),
            vec![("dev-1".to_string(), "C-OFF".to_string())]
        );
    }

    #[tokio::test]
    async fn executor_failure_aborts_remaining_devices() {
        let executor = Arc::new(RecordingExecutor::failing_on("dev-1"));
        let dispatcher = dispatcher(executor.clone());

        let result = dispatcher
            .dispatch_at(
                &resolved_with(day_window_command()),
                Weekday::Tue,
                ClockTime::from_hm(12, 0).unwrap(),
            )
            .await;

        assert!(result.is_err());
        // dev-2 never received the command on this run
        assert_eq!(executor.calls.load(Ordering::SeqCst), 1);
        assert!(executor.sent.lock().unwrap().is_empty());
    }
}
