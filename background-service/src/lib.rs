use chrono::{DateTime, Duration as ChronoDuration, Timelike, Utc};
use crossposter_core::{ConfigError, CoreError, ErrorExt};
use std::future::Future;
use tracing::{error, info};

/// Runs a job at fixed daily slots: every `slot_hours` hours starting at
/// midnight UTC.
pub struct BackgroundService {
    slot_hours: u32,
}

impl BackgroundService {
    pub fn new(slot_hours: u32) -> Result<Self, CoreError> {
        if slot_hours == 0 || slot_hours > 24 {
            return Err(ConfigError::InvalidValue {
                field: "slot_hours".to_string(),
                value: slot_hours.to_string(),
            }
            .into());
        }
        Ok(Self { slot_hours })
    }

    pub fn slot_hours(&self) -> u32 {
        self.slot_hours
    }

    /// First slot strictly after `now`. Slots restart at midnight when
    /// `slot_hours` does not divide the day evenly.
    pub fn next_run_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let midnight = now
            .with_hour(0)
            .and_then(|t| t.with_minute(0))
            .and_then(|t| t.with_second(0))
            .and_then(|t| t.with_nanosecond(0))
            .unwrap_or(now);
        let tomorrow = midnight + ChronoDuration::days(1);

        let step = ChronoDuration::hours(i64::from(self.slot_hours));
        let mut slot = midnight;
        while slot <= now {
            slot += step;
        }
        slot.min(tomorrow)
    }

    /// Runs `job` once; failures are logged and swallowed.
    pub async fn run_once<F, Fut>(&self, job: &mut F) -> bool
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<(), CoreError>>,
    {
        match job().await {
            Ok(()) => {
                info!("Scheduled job finished");
                true
            }
            Err(e) => {
                e.log_error();
                error!("Scheduled job failed: {}", e.user_friendly_message());
                false
            }
        }
    }

    /// Sleeps until each slot and runs `job`, until `shutdown` resolves.
    pub async fn run<F, Fut, S>(&self, mut job: F, shutdown: S) -> Result<(), CoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<(), CoreError>>,
        S: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        info!("Scheduler started with {}h slots", self.slot_hours);

        loop {
            let now = Utc::now();
            let next = self.next_run_after(now);
            let wait = (next - now).to_std().unwrap_or_default();
            info!("Next run at {}", next.format("%Y-%m-%d %H:%M UTC"));

            tokio::select! {
                _ = &mut shutdown => {
                    info!("Scheduler stopping");
                    return Ok(());
                }
                _ = tokio::time::sleep(wait) => {
                    self.run_once(&mut job).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use crossposter_core::FetchError;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 17, h, m, 0).unwrap()
    }

    #[test]
    fn test_three_hour_slots() {
        let service = BackgroundService::new(3).unwrap();
        assert_eq!(service.next_run_after(at(0, 0)), at(3, 0));
        assert_eq!(service.next_run_after(at(1, 30)), at(3, 0));
        assert_eq!(service.next_run_after(at(3, 0)), at(6, 0));
        assert_eq!(service.next_run_after(at(20, 59)), at(21, 0));
        assert_eq!(
            service.next_run_after(at(22, 10)),
            Utc.with_ymd_and_hms(2024, 5, 18, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_uneven_slots_restart_at_midnight() {
        let service = BackgroundService::new(5).unwrap();
        assert_eq!(service.next_run_after(at(19, 0)), at(20, 0));
        assert_eq!(
            service.next_run_after(at(21, 0)),
            Utc.with_ymd_and_hms(2024, 5, 18, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_invalid_slot_hours() {
        assert!(matches!(
            BackgroundService::new(0),
            Err(CoreError::Config(ConfigError::InvalidValue { .. }))
        ));
        assert!(BackgroundService::new(25).is_err());
        assert_eq!(BackgroundService::new(24).unwrap().slot_hours(), 24);
    }

    #[test]
    fn test_failed_job_does_not_propagate() {
        let service = BackgroundService::new(3).unwrap();
        let mut calls = 0;
        let mut job = || {
            calls += 1;
            async {
                Err(CoreError::Fetch(FetchError::NoEligiblePost {
                    subreddit: "memes".to_string(),
                }))
            }
        };
        assert!(!tokio_test::block_on(service.run_once(&mut job)));
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn test_shutdown_stops_before_first_slot() {
        let service = BackgroundService::new(3).unwrap();
        let mut ran = false;
        let result = service
            .run(
                || {
                    ran = true;
                    async { Ok(()) }
                },
                async {},
            )
            .await;
        assert!(result.is_ok());
        assert!(!ran);
    }
}
