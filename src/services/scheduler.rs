use crate::errors::{Result, QuoteHubError};
use crate::services::quote_service::QuoteService;
use chrono::{DateTime, Duration as ChronoDuration, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use log::{error, info, warn};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// 每日定时抓取计划
#[derive(Debug, Clone)]
pub struct CrawlScheduler {
    times: Vec<NaiveTime>,
    timezone: Tz,
}

impl CrawlScheduler {
    pub fn new(mut times: Vec<NaiveTime>, timezone: Tz) -> Result<Self> {
        if times.is_empty() {
            return Err(QuoteHubError::ConfigError("At least one schedule time is required".to_string()));
        }
        times.sort();
        times.dedup();
        Ok(Self { times, timezone })
    }

    pub fn times(&self) -> &[NaiveTime] {
        &self.times
    }

    /// 计算严格晚于 `now` 的下一次触发时间
    pub fn next_fire_after(&self, now: DateTime<Tz>) -> Option<DateTime<Tz>> {
        let today = now.date_naive();
        for offset in 0..=2 {
            let date = today + ChronoDuration::days(offset);
            for time in &self.times {
                let candidate = self
                    .timezone
                    .from_local_datetime(&date.and_time(*time))
                    .earliest();
                if let Some(candidate) = candidate {
                    if candidate > now {
                        return Some(candidate);
                    }
                }
            }
        }
        None
    }

    /// 在后台任务中按计划运行，每次触发时重新读取代码列表文件
    pub fn start(self, service: Arc<QuoteService>) -> ScheduleHandle {
        let (stop_tx, mut stop_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            let mut ticks = 0usize;
            loop {
                let now = Utc::now().with_timezone(&self.timezone);
                let Some(next) = self.next_fire_after(now) else {
                    error!("Could not compute next schedule time, stopping scheduler");
                    break;
                };
                let wait = (next - now).to_std().unwrap_or_default();
                info!("Next scheduled crawl at {}", next);

                tokio::select! {
                    _ = tokio::time::sleep(wait) => {}
                    _ = stop_rx.changed() => break,
                }
                if *stop_rx.borrow() {
                    break;
                }

                ticks += 1;
                info!("Scheduled crawl #{} started", ticks);
                match service.run_codes_file().await {
                    Ok(report) => info!("Scheduled crawl #{} wrote {} rows", ticks, report.rows_written),
                    Err(e) => warn!("Scheduled crawl #{} failed: {}", ticks, e),
                }
            }
            info!("Scheduler stopped after {} crawls", ticks);
            ticks
        });

        ScheduleHandle { stop_tx, task }
    }
}

/// 运行中的定时任务句柄
pub struct ScheduleHandle {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<usize>,
}

impl ScheduleHandle {
    /// 停止定时任务并等待正在执行的抓取结束，返回已执行的次数
    ///
    /// 正在进行的抓取不会被中断，只阻止下一次触发。
    pub async fn stop(self) -> usize {
        let _ = self.stop_tx.send(true);
        match self.task.await {
            Ok(ticks) => ticks,
            Err(e) => {
                error!("Scheduler task ended abnormally: {}", e);
                0
            }
        }
    }
}
