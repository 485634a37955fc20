//! 报表处理流程 - 流程层
//!
//! 核心职责：定义三种报表形态的完整流程
//!
//! 流程顺序：
//! 1. 导航到报表页 → 搜索 → 选择
//! 2. 配置参数（日期区间 / 单月 / 月份区间）
//! 3. 执行 → 下载 CSV → 下载 XLSX → 关闭弹窗

use tracing::{info, warn};

use crate::error::AppResult;
use crate::infrastructure::PageDriver;
use crate::models::{
    normalize_file_stem, DownloadArtifact, LogicalPage, ReportFormat, ReportParams,
    ReportRequest, SessionState,
};
use crate::services::{Navigator, ReportService};
use crate::workflow::batch::BatchOutcome;

/// 每次执行后依次下载的格式
pub const DOWNLOAD_FORMATS: [ReportFormat; 2] = [ReportFormat::Csv, ReportFormat::Xlsx];

/// 报表处理流程
///
/// - 决定每种报表形态的步骤顺序
/// - 不持有任何资源（driver / session 由编排层传入）
/// - 只依赖业务能力（services）
pub struct ReportFlow {
    navigator: Navigator,
    reports: ReportService,
}

impl ReportFlow {
    pub fn new(navigator: Navigator, reports: ReportService) -> Self {
        Self { navigator, reports }
    }

    pub fn navigator(&self) -> &Navigator {
        &self.navigator
    }

    pub fn reports(&self) -> &ReportService {
        &self.reports
    }

    /// 按请求形态分派
    ///
    /// 单次形态成功时结果中只有一项（文件名）。
    pub async fn execute<D: PageDriver + ?Sized>(
        &self,
        driver: &D,
        session: &mut SessionState,
        request: &ReportRequest,
    ) -> AppResult<BatchOutcome> {
        let code = request.code.as_str();
        let title = request.title.as_str();
        match &request.params {
            ReportParams::DateRange { from, to } => {
                self.date_range_report(driver, session, code, title, from, to)
                    .await?;
                Ok(single(normalize_file_stem(&[code, from, to])))
            }
            ReportParams::MonthList { labels } => {
                self.month_report(driver, session, code, title, labels).await
            }
            ReportParams::MonthRange {
                from_label,
                to_label,
            } => {
                self.month_range_report(driver, session, code, title, from_label, to_label)
                    .await?;
                Ok(single(normalize_file_stem(&[code, from_label, to_label])))
            }
        }
    }

    /// 日期区间报表，文件名 `<code>_<from>_<to>`
    pub async fn date_range_report<D: PageDriver + ?Sized>(
        &self,
        driver: &D,
        session: &mut SessionState,
        code: &str,
        title: &str,
        from: &str,
        to: &str,
    ) -> AppResult<Vec<DownloadArtifact>> {
        let stem = normalize_file_stem(&[code, from, to]);
        self.open_report(driver, session, code, title).await?;
        self.reports
            .select_date_range(driver, session, from, to)
            .await?;
        self.run_and_download(driver, session, &stem).await
    }

    /// 月份列表报表：搜索选择一次，每个月单独执行并下载
    ///
    /// 单月失败记录在结果中，继续处理后面的月份。
    pub async fn month_report<D: PageDriver + ?Sized>(
        &self,
        driver: &D,
        session: &mut SessionState,
        code: &str,
        title: &str,
        labels: &[String],
    ) -> AppResult<BatchOutcome> {
        self.open_report(driver, session, code, title).await?;

        let mut outcome = BatchOutcome::new();
        for label in labels {
            info!("🗓️ [{}] 处理月份: {}", code, label);
            let stem = normalize_file_stem(&[code, label]);
            let result = async {
                self.reports
                    .select_single_month(driver, session, label)
                    .await?;
                self.run_and_download(driver, session, &stem).await
            }
            .await;
            outcome.record(code, label, result);
        }

        outcome.log_summary(code);
        Ok(outcome)
    }

    /// 月份区间报表，文件名 `<code>_<from>_<to>`
    pub async fn month_range_report<D: PageDriver + ?Sized>(
        &self,
        driver: &D,
        session: &mut SessionState,
        code: &str,
        title: &str,
        from_label: &str,
        to_label: &str,
    ) -> AppResult<Vec<DownloadArtifact>> {
        let stem = normalize_file_stem(&[code, from_label, to_label]);
        self.open_report(driver, session, code, title).await?;
        self.reports
            .select_month_range(driver, session, from_label, to_label)
            .await?;
        self.run_and_download(driver, session, &stem).await
    }

    /// 每个月各执行一次起止相同的月份区间报表
    pub async fn month_range_report_monthly<D: PageDriver + ?Sized>(
        &self,
        driver: &D,
        session: &mut SessionState,
        code: &str,
        title: &str,
        labels: &[String],
    ) -> AppResult<BatchOutcome> {
        let mut outcome = BatchOutcome::new();
        for label in labels {
            info!("🗓️ [{}] 处理月份: {}", code, label);
            let result = self
                .month_range_report(driver, session, code, title, label, label)
                .await;
            outcome.record(code, label, result);
        }

        outcome.log_summary(code);
        Ok(outcome)
    }

    /// 导航到报表页并搜索、选择报表
    async fn open_report<D: PageDriver + ?Sized>(
        &self,
        driver: &D,
        session: &mut SessionState,
        code: &str,
        title: &str,
    ) -> AppResult<()> {
        self.navigator
            .navigate_to(driver, session, LogicalPage::Report)
            .await?;
        self.reports.search(driver, session, code).await?;
        self.reports.select(driver, session, title).await
    }

    /// 执行报表并按 [`DOWNLOAD_FORMATS`] 下载；无论成败都关闭弹窗
    async fn run_and_download<D: PageDriver + ?Sized>(
        &self,
        driver: &D,
        session: &SessionState,
        stem: &str,
    ) -> AppResult<Vec<DownloadArtifact>> {
        let popup = self.reports.run(driver, session).await?;

        let mut artifacts = Vec::with_capacity(DOWNLOAD_FORMATS.len());
        let mut result = Ok(());
        for format in DOWNLOAD_FORMATS {
            match self.reports.download(driver, &popup, stem, format).await {
                Ok(artifact) => artifacts.push(artifact),
                Err(e) => {
                    result = Err(e);
                    break;
                }
            }
        }

        if let Err(e) = self.reports.close_popup(driver, &popup).await {
            warn!("⚠️ 关闭报表弹窗失败: {}", e);
        }

        result.map(|()| artifacts)
    }
}

fn single(label: String) -> BatchOutcome {
    BatchOutcome {
        succeeded: vec![label],
        failed: Vec::new(),
    }
}
