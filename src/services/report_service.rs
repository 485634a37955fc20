//! 报表服务 - 业务能力层
//!
//! 只负责单步报表操作：搜索、选择、参数配置、执行、等待、导出下载，
//! 以及诊所列表 / 报表导航表单的 HTML 快照。流程顺序由 workflow 层决定。

use std::path::{Path, PathBuf};
use std::time::Duration;

use regex::Regex;
use tracing::{debug, info};

use crate::error::{AppError, AppResult, FileError, ReportError};
use crate::infrastructure::{ElementState, LoadState, PageDriver, Scope, ViewportId};
use crate::models::{DownloadArtifact, ReportFormat, SessionState};
use crate::utils::truncate_text;

const SEARCH_INPUT: &str = "#userSearch";
const SEARCH_BUTTON: &str = "#dosearch";
const REPORT_ENTRY: &str = "#mainbutton1";
const SINGLE_DATE_INPUT: &str = "#ServiceDate";
const FROM_DATE_INPUT: &str = "#FromServiceDate";
const TO_DATE_INPUT: &str = "#ToServiceDate";
const MONTH_SELECT: &str = "select[name='ClosingDate']";
const FROM_MONTH_SELECT: &str = "select[name='FromClosingDate']";
const TO_MONTH_SELECT: &str = "select[name='ToClosingDate']";
const RUN_BUTTON: &str = "input[name='submitbtn']";
const ERROR_PANEL: &str = "#ctl02_ctl00";
const EXPORT_BUTTON: &str = "#ReportViewerControl_ctl05_ctl04_ctl00_ButtonLink";
const EXPORT_MENU: &str = "#ReportViewerControl_ctl05_ctl04_ctl00_Menu";
const CLINIC_TABLE: &str = "#gvClinicList";
const REPORT_FORM: &str = "#form1";
const OUTER_HTML: &str = "el => el.outerHTML";

/// 报表弹窗状态；加载失败以错误返回
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportStatus {
    Loaded,
}

/// 报表服务
///
/// 职责：
/// - 每个方法只做一步页面操作
/// - 搜索 / 选择记录在 `SessionState` 中，重复调用直接跳过
/// - 不决定下载哪些格式，也不处理批量
pub struct ReportService {
    timeout: Duration,
    report_timeout: Duration,
    download_dir: PathBuf,
}

impl ReportService {
    /// # 参数
    /// - `timeout`: 普通元素等待超时
    /// - `report_timeout`: 报表加载 / 下载超时
    /// - `download_dir`: 下载与快照落地目录
    pub fn new(timeout: Duration, report_timeout: Duration, download_dir: PathBuf) -> Self {
        Self {
            timeout,
            report_timeout,
            download_dir,
        }
    }

    pub fn download_dir(&self) -> &Path {
        &self.download_dir
    }

    /// 在导航框架中搜索报表
    pub async fn search<D: PageDriver + ?Sized>(
        &self,
        driver: &D,
        session: &mut SessionState,
        name: &str,
    ) -> AppResult<()> {
        if session.last_searched_report.as_deref() == Some(name) {
            debug!("报表 {} 已搜索，跳过", name);
            return Ok(());
        }

        let nav = session.nav_scope()?;
        driver.fill(&nav, SEARCH_INPUT, name).await?;
        driver.click(&nav, SEARCH_BUTTON).await?;
        info!("🔍 已搜索报表: {}", name);

        session.last_searched_report = Some(name.to_string());
        session.last_selected_report = None;
        Ok(())
    }

    /// 等待标题出现后选中报表
    pub async fn select<D: PageDriver + ?Sized>(
        &self,
        driver: &D,
        session: &mut SessionState,
        title: &str,
    ) -> AppResult<()> {
        if session.last_selected_report.as_deref() == Some(title) {
            debug!("报表 {} 已选中，跳过", title);
            return Ok(());
        }

        let content = session.content_scope()?;
        driver
            .wait_for_load_state(&content, LoadState::NetworkIdle, self.timeout)
            .await?;
        driver
            .wait_for_text(&content, REPORT_ENTRY, title, self.timeout)
            .await?;
        driver.click(&content, REPORT_ENTRY).await?;
        info!("📋 已选择报表: {}", title);

        session.last_selected_report = Some(title.to_string());
        Ok(())
    }

    pub async fn select_single_date<D: PageDriver + ?Sized>(
        &self,
        driver: &D,
        session: &SessionState,
        date: &str,
    ) -> AppResult<()> {
        let content = session.content_scope()?;
        self.ready(driver, &content, SINGLE_DATE_INPUT).await?;
        driver.fill(&content, SINGLE_DATE_INPUT, date).await?;
        info!("📅 日期: {}", date);
        Ok(())
    }

    pub async fn select_date_range<D: PageDriver + ?Sized>(
        &self,
        driver: &D,
        session: &SessionState,
        from: &str,
        to: &str,
    ) -> AppResult<()> {
        let content = session.content_scope()?;
        self.ready(driver, &content, FROM_DATE_INPUT).await?;
        driver.fill(&content, FROM_DATE_INPUT, from).await?;
        driver.fill(&content, TO_DATE_INPUT, to).await?;
        info!("📅 日期区间: {} ~ {}", from, to);
        Ok(())
    }

    pub async fn select_single_month<D: PageDriver + ?Sized>(
        &self,
        driver: &D,
        session: &SessionState,
        label: &str,
    ) -> AppResult<()> {
        let content = session.content_scope()?;
        self.ready(driver, &content, MONTH_SELECT).await?;
        driver.select_option(&content, MONTH_SELECT, label).await?;
        info!("📅 月份: {}", label);
        Ok(())
    }

    pub async fn select_month_range<D: PageDriver + ?Sized>(
        &self,
        driver: &D,
        session: &SessionState,
        from_label: &str,
        to_label: &str,
    ) -> AppResult<()> {
        let content = session.content_scope()?;
        self.ready(driver, &content, FROM_MONTH_SELECT).await?;
        driver
            .select_option(&content, FROM_MONTH_SELECT, from_label)
            .await?;
        driver.select_option(&content, TO_MONTH_SELECT, to_label).await?;
        info!("📅 月份区间: {} ~ {}", from_label, to_label);
        Ok(())
    }

    /// 按顺序点击 (取消勾选, 全选) 控件对
    ///
    /// 每一对必须先取消再全选，否则会残留上一次的选择。
    pub async fn apply_parameter_filter<D: PageDriver + ?Sized>(
        &self,
        driver: &D,
        session: &SessionState,
        pairs: &[(&str, &str)],
    ) -> AppResult<()> {
        let content = session.content_scope()?;
        for (uncheck, select_all) in pairs {
            self.ready(driver, &content, uncheck).await?;
            driver.click(&content, uncheck).await?;
            driver.click(&content, select_all).await?;
        }
        info!("✓ 参数过滤已应用 ({} 组)", pairs.len());
        Ok(())
    }

    /// 提交报表，返回新打开的弹窗，并把主视口切回前台
    pub async fn run<D: PageDriver + ?Sized>(
        &self,
        driver: &D,
        session: &SessionState,
    ) -> AppResult<ViewportId> {
        let content = session.content_scope()?;
        self.ready(driver, &content, RUN_BUTTON).await?;
        let popup = driver
            .click_expect_viewport(&content, RUN_BUTTON, self.timeout)
            .await?;
        driver.bring_to_front(&Scope::Primary).await?;
        info!("🚀 报表已提交，弹窗: {}", popup);
        Ok(popup)
    }

    /// 等待弹窗加载完成并检查错误面板
    ///
    /// 超时内未加载完成返回 `ReportError::PopupNotLoaded`。
    pub async fn await_ready<D: PageDriver + ?Sized>(
        &self,
        driver: &D,
        popup: &ViewportId,
        timeout: Duration,
    ) -> AppResult<ReportStatus> {
        let scope = Scope::Viewport(popup.clone());
        driver
            .wait_for_load_state(&scope, LoadState::NetworkIdle, timeout)
            .await
            .map_err(|e| ReportError::PopupNotLoaded {
                reason: e.to_string(),
            })?;
        driver.bring_to_front(&scope).await?;

        if driver.is_visible(&scope, ERROR_PANEL).await? {
            let text = driver.inner_text(&scope, ERROR_PANEL).await?;
            let message = collapse_whitespace(&text);
            debug!("报表错误面板: {}", truncate_text(&message, 200));
            return Err(ReportError::Execution { message }.into());
        }

        debug!("报表加载完成");
        Ok(ReportStatus::Loaded)
    }

    /// 从弹窗导出报表并保存为 `<download_dir>/<file_name>.<ext>`
    pub async fn download<D: PageDriver + ?Sized>(
        &self,
        driver: &D,
        popup: &ViewportId,
        file_name: &str,
        format: ReportFormat,
    ) -> AppResult<DownloadArtifact> {
        self.await_ready(driver, popup, self.report_timeout).await?;

        let scope = Scope::Viewport(popup.clone());
        let link = format!("{} a[title='{}']", EXPORT_MENU, format.menu_label());
        let full_name = format!("{}.{}", file_name, format.extension());
        let destination = self.download_dir.join(&full_name);

        let saved = async {
            driver
                .wait_for_selector(&scope, EXPORT_BUTTON, ElementState::Visible, self.timeout)
                .await?;
            driver.click(&scope, EXPORT_BUTTON).await?;
            driver
                .wait_for_selector(&scope, EXPORT_MENU, ElementState::Visible, self.timeout)
                .await?;
            driver
                .wait_for_selector(&scope, &link, ElementState::Visible, self.timeout)
                .await?;
            driver
                .click_expect_download(&scope, &link, &destination, self.report_timeout)
                .await
        }
        .await
        .map_err(|e| AppError::download_failed(&full_name, e.to_string()))?;

        info!("📥 {} 报表已下载: {}", format, saved.display());
        Ok(DownloadArtifact {
            file_name: full_name,
            format,
            path: saved,
        })
    }

    pub async fn close_popup<D: PageDriver + ?Sized>(
        &self,
        driver: &D,
        popup: &ViewportId,
    ) -> AppResult<()> {
        driver.close_viewport(popup).await
    }

    /// 保存诊所列表表格的 HTML（需已在诊所页）
    pub async fn clinic_data<D: PageDriver + ?Sized>(
        &self,
        driver: &D,
        file_name: &str,
    ) -> AppResult<PathBuf> {
        let page = Scope::Primary;
        driver
            .wait_for_selector(&page, CLINIC_TABLE, ElementState::Visible, self.timeout)
            .await?;
        info!("✓ 诊所列表已加载");
        let html = driver.evaluate(&page, CLINIC_TABLE, OUTER_HTML).await?;
        self.write_snapshot(file_name, html.as_str().unwrap_or_default())
            .await
    }

    /// 保存报表导航表单的 HTML（需已在报表页）
    pub async fn report_data<D: PageDriver + ?Sized>(
        &self,
        driver: &D,
        session: &SessionState,
        file_name: &str,
    ) -> AppResult<PathBuf> {
        let nav = session.nav_scope()?;
        // 表单只需存在于 DOM 中，不要求可见
        driver
            .wait_for_selector(&nav, REPORT_FORM, ElementState::Attached, self.timeout)
            .await?;
        let html = driver.evaluate(&nav, REPORT_FORM, OUTER_HTML).await?;
        let path = self
            .write_snapshot(file_name, html.as_str().unwrap_or_default())
            .await?;
        info!("✓ 报表数据已保存");
        Ok(path)
    }

    /// 等待元素可见；参数表单在选中报表后才重新加载出来
    async fn ready<D: PageDriver + ?Sized>(
        &self,
        driver: &D,
        scope: &Scope,
        selector: &str,
    ) -> AppResult<()> {
        driver
            .wait_for_selector(scope, selector, ElementState::Visible, self.timeout)
            .await
    }

    async fn write_snapshot(&self, file_name: &str, html: &str) -> AppResult<PathBuf> {
        let path = self.download_dir.join(file_name);
        tokio::fs::write(&path, html)
            .await
            .map_err(|source| FileError::WriteFailed {
                path: path.clone(),
                source,
            })?;
        info!("💾 已保存: {}", path.display());
        Ok(path)
    }
}

/// 合并错误面板中的连续空白
fn collapse_whitespace(text: &str) -> String {
    match Regex::new(r"\s+") {
        Ok(re) => re.replace_all(text.trim(), " ").to_string(),
        Err(_) => text.trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::{FrameHandle, ScriptedDriver};
    use crate::models::{LogicalPage, ReportFrames};

    fn report_session() -> SessionState {
        let mut session = SessionState::new();
        session.enter_page(
            LogicalPage::Report,
            Some(ReportFrames {
                main: FrameHandle::new("reportMainWindow"),
                nav: Some(FrameHandle::new("NavFrame")),
                content: Some(FrameHandle::new("PVRC_MainStage")),
            }),
        );
        session
    }

    fn service(dir: &Path) -> ReportService {
        ReportService::new(
            Duration::from_secs(1),
            Duration::from_secs(5),
            dir.to_path_buf(),
        )
    }

    #[test]
    fn whitespace_is_collapsed() {
        assert_eq!(
            collapse_whitespace("  An error occurred\n\n   during processing. "),
            "An error occurred during processing."
        );
    }

    #[tokio::test]
    async fn search_and_select_are_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let driver = ScriptedDriver::new();
        let reports = service(dir.path());
        let mut session = report_session();

        for _ in 0..2 {
            reports.search(&driver, &mut session, "CNT 17").await.unwrap();
            reports
                .select(&driver, &mut session, "Practice, CNT 17")
                .await
                .unwrap();
        }

        assert_eq!(driver.count_calls("click frame:NavFrame #dosearch"), 1);
        assert_eq!(driver.count_calls("click frame:PVRC_MainStage #mainbutton1"), 1);
    }

    #[tokio::test]
    async fn new_search_forgets_previous_selection() {
        let dir = tempfile::tempdir().unwrap();
        let driver = ScriptedDriver::new();
        let reports = service(dir.path());
        let mut session = report_session();

        reports.search(&driver, &mut session, "CNT 17").await.unwrap();
        reports.select(&driver, &mut session, "Practice").await.unwrap();
        reports.search(&driver, &mut session, "CNT 4").await.unwrap();
        reports.select(&driver, &mut session, "Practice").await.unwrap();

        assert_eq!(driver.count_calls("click frame:PVRC_MainStage #mainbutton1"), 2);
    }

    #[tokio::test]
    async fn parameter_filter_unchecks_before_selecting_all() {
        let dir = tempfile::tempdir().unwrap();
        let driver = ScriptedDriver::new();
        let session = report_session();

        service(dir.path())
            .apply_parameter_filter(&driver, &session, &[("#uncheckA", "#allA"), ("#uncheckB", "#allB")])
            .await
            .unwrap();

        let clicks: Vec<String> = driver
            .calls()
            .into_iter()
            .filter(|c| c.starts_with("click"))
            .collect();
        assert_eq!(
            clicks,
            vec![
                "click frame:PVRC_MainStage #uncheckA",
                "click frame:PVRC_MainStage #allA",
                "click frame:PVRC_MainStage #uncheckB",
                "click frame:PVRC_MainStage #allB",
            ]
        );
    }

    #[tokio::test]
    async fn configuration_waits_for_reloaded_parameter_form() {
        let dir = tempfile::tempdir().unwrap();
        let driver = ScriptedDriver::scripted(|s| {
            s.late_selectors.insert(FROM_DATE_INPUT.to_string());
            s.late_selectors.insert(MONTH_SELECT.to_string());
        });
        let reports = service(dir.path());
        let session = report_session();

        reports
            .select_date_range(&driver, &session, "05/01/2022", "02/24/2026")
            .await
            .unwrap();
        reports
            .select_single_month(&driver, &session, "Jan 2024")
            .await
            .unwrap();

        let calls = driver.calls();
        assert_eq!(
            &calls[..2],
            &[
                "wait frame:PVRC_MainStage #FromServiceDate Visible",
                "fill frame:PVRC_MainStage #FromServiceDate 05/01/2022",
            ]
        );
        let wait_month = calls
            .iter()
            .position(|c| c == "wait frame:PVRC_MainStage select[name='ClosingDate'] Visible")
            .unwrap();
        let pick_month = calls
            .iter()
            .position(|c| c.starts_with("select frame:PVRC_MainStage select[name='ClosingDate']"))
            .unwrap();
        assert!(wait_month < pick_month);
    }

    #[tokio::test]
    async fn missing_parameter_form_fails_before_filling() {
        let dir = tempfile::tempdir().unwrap();
        let driver = ScriptedDriver::scripted(|s| {
            s.failing_selectors.insert(SINGLE_DATE_INPUT.to_string());
        });

        let err = service(dir.path())
            .select_single_date(&driver, &report_session(), "01/16/2026")
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Driver(_)));
        assert_eq!(driver.count_calls("fill"), 0);
    }

    #[tokio::test]
    async fn popup_that_never_loads_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let driver = ScriptedDriver::scripted(|s| {
            s.stalled_scopes.insert("viewport:popup-1".to_string());
        });

        let err = service(dir.path())
            .download(&driver, &ViewportId::new("popup-1"), "X", ReportFormat::Csv)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Report(ReportError::PopupNotLoaded { .. })));
        assert_eq!(driver.count_calls("download"), 0);
    }

    #[tokio::test]
    async fn run_brings_primary_back_to_front() {
        let dir = tempfile::tempdir().unwrap();
        let driver = ScriptedDriver::new();
        let session = report_session();

        let popup = service(dir.path()).run(&driver, &session).await.unwrap();

        assert_eq!(popup.as_str(), "popup-1");
        let calls = driver.calls();
        assert_eq!(calls.last().map(String::as_str), Some("front page"));
    }

    #[tokio::test]
    async fn error_panel_raises_execution_error() {
        let dir = tempfile::tempdir().unwrap();
        let driver = ScriptedDriver::scripted(|s| {
            s.visible.insert(
                ERROR_PANEL.to_string(),
                "Report failed:\n  no data for period".to_string(),
            );
        });
        let popup = ViewportId::new("popup-1");

        let err = service(dir.path())
            .download(&driver, &popup, "CNT_17", ReportFormat::Csv)
            .await
            .unwrap_err();

        match err {
            AppError::Report(ReportError::Execution { message }) => {
                assert_eq!(message, "Report failed: no data for period");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(driver.count_calls("download"), 0);
    }

    /// 捕获 ERROR 级别日志输出
    #[derive(Clone, Default)]
    struct ErrorLog(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for ErrorLog {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn propagated_report_errors_are_not_logged_as_errors_here() {
        let dir = tempfile::tempdir().unwrap();
        let log = ErrorLog::default();
        let writer = log.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::ERROR)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            tokio_test::block_on(async {
                let panel = ScriptedDriver::scripted(|s| {
                    s.visible.insert(ERROR_PANEL.to_string(), "no data".to_string());
                });
                let missing_link = ScriptedDriver::scripted(|s| {
                    s.failing_selectors.insert(EXPORT_BUTTON.to_string());
                });
                let reports = service(dir.path());
                let popup = ViewportId::new("popup-1");

                assert!(reports.download(&panel, &popup, "X", ReportFormat::Csv).await.is_err());
                assert!(reports
                    .download(&missing_link, &popup, "X", ReportFormat::Csv)
                    .await
                    .is_err());
            });
        });

        assert!(log.0.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn download_uses_format_label_and_extension() {
        let dir = tempfile::tempdir().unwrap();
        let driver = ScriptedDriver::new();
        let popup = ViewportId::new("popup-1");

        let artifact = service(dir.path())
            .download(&driver, &popup, "CNT_17_1_1_2026", ReportFormat::Xlsx)
            .await
            .unwrap();

        assert_eq!(artifact.file_name, "CNT_17_1_1_2026.xlsx");
        assert_eq!(artifact.path, dir.path().join("CNT_17_1_1_2026.xlsx"));
        assert!(artifact.path.exists());
        assert_eq!(
            driver.count_calls(&format!("download viewport:popup-1 {} a[title='Excel']", EXPORT_MENU)),
            1
        );
    }

    #[tokio::test]
    async fn missing_export_link_is_a_download_error() {
        let dir = tempfile::tempdir().unwrap();
        let link = format!("{} a[title='PDF']", EXPORT_MENU);
        let driver = ScriptedDriver::scripted(|s| {
            s.failing_selectors.insert(link.clone());
        });

        let err = service(dir.path())
            .download(&driver, &ViewportId::new("popup-1"), "X", ReportFormat::Pdf)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Report(ReportError::Download { .. })));
    }

    #[tokio::test]
    async fn clinic_and_report_snapshots_are_written() {
        let dir = tempfile::tempdir().unwrap();
        let driver = ScriptedDriver::scripted(|s| {
            s.evaluations.insert(
                CLINIC_TABLE.to_string(),
                serde_json::json!("<table id=\"gvClinicList\"></table>"),
            );
            s.evaluations
                .insert(REPORT_FORM.to_string(), serde_json::json!("<form id=\"form1\"></form>"));
        });
        let reports = service(dir.path());

        let clinic = reports.clinic_data(&driver, "ClinicData.html").await.unwrap();
        let report = reports
            .report_data(&driver, &report_session(), "ClinicReport.html")
            .await
            .unwrap();

        assert_eq!(
            std::fs::read_to_string(clinic).unwrap(),
            "<table id=\"gvClinicList\"></table>"
        );
        assert_eq!(
            std::fs::read_to_string(report).unwrap(),
            "<form id=\"form1\"></form>"
        );
        assert_eq!(driver.count_calls("wait frame:NavFrame #form1 Attached"), 1);
    }

    #[tokio::test]
    async fn configuration_requires_report_frames() {
        let dir = tempfile::tempdir().unwrap();
        let driver = ScriptedDriver::new();
        let session = SessionState::new();

        let err = service(dir.path())
            .select_single_date(&driver, &session, "01/16/2026")
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Navigation(_)));
        assert!(driver.calls().is_empty());
    }
}
