use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::models::months::normalize_file_stem;

/// 报表导出格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    Xml,
    Csv,
    Pdf,
    Mhtml,
    Xlsx,
    Tiff,
    Docx,
    Txt,
}

impl ReportFormat {
    pub const ALL: [ReportFormat; 8] = [
        ReportFormat::Xml,
        ReportFormat::Csv,
        ReportFormat::Pdf,
        ReportFormat::Mhtml,
        ReportFormat::Xlsx,
        ReportFormat::Tiff,
        ReportFormat::Docx,
        ReportFormat::Txt,
    ];

    /// 导出菜单中对应链接的 title
    pub fn menu_label(self) -> &'static str {
        match self {
            ReportFormat::Xml => "XML file with report data",
            ReportFormat::Csv => "CSV (comma delimited)",
            ReportFormat::Pdf => "PDF",
            ReportFormat::Mhtml => "MHTML (web archive)",
            ReportFormat::Xlsx => "Excel",
            ReportFormat::Tiff => "TIFF file",
            ReportFormat::Docx => "Word",
            ReportFormat::Txt => "TXT (Pipe delimited)",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ReportFormat::Xml => "xml",
            ReportFormat::Csv => "csv",
            ReportFormat::Pdf => "pdf",
            ReportFormat::Mhtml => "mhtml",
            ReportFormat::Xlsx => "xlsx",
            ReportFormat::Tiff => "tiff",
            ReportFormat::Docx => "docx",
            ReportFormat::Txt => "txt",
        }
    }
}

impl fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ReportFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        ReportFormat::ALL
            .into_iter()
            .find(|f| f.extension() == wanted)
            .ok_or_else(|| ConfigError::UnknownFormat {
                format: s.to_string(),
            })
    }
}

/// 报表参数形态
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportParams {
    /// 日期区间（MM/DD/YYYY）
    DateRange { from: String, to: String },
    /// 离散月份列表，每个月单独执行
    MonthList { labels: Vec<String> },
    /// 月份区间
    MonthRange { from_label: String, to_label: String },
}

/// 一次报表请求
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportRequest {
    /// 报表内部代码，如 "CNT 17"
    pub code: String,
    /// 报表列表中显示的标题，如 "Practice, CNT 17"
    pub title: String,
    pub params: ReportParams,
}

impl ReportRequest {
    pub fn date_range(code: &str, title: &str, from: &str, to: &str) -> Self {
        Self {
            code: code.to_string(),
            title: title.to_string(),
            params: ReportParams::DateRange {
                from: from.to_string(),
                to: to.to_string(),
            },
        }
    }

    pub fn month_list(code: &str, title: &str, labels: &[String]) -> Self {
        Self {
            code: code.to_string(),
            title: title.to_string(),
            params: ReportParams::MonthList {
                labels: labels.to_vec(),
            },
        }
    }

    pub fn month_range(code: &str, title: &str, from_label: &str, to_label: &str) -> Self {
        Self {
            code: code.to_string(),
            title: title.to_string(),
            params: ReportParams::MonthRange {
                from_label: from_label.to_string(),
                to_label: to_label.to_string(),
            },
        }
    }

    /// 输出文件名（不含扩展名）
    ///
    /// 月份列表的每个月各自成文件，这里返回每个月对应的文件名。
    pub fn file_stems(&self) -> Vec<String> {
        match &self.params {
            ReportParams::DateRange { from, to } => {
                vec![normalize_file_stem(&[&self.code, from, to])]
            }
            ReportParams::MonthRange {
                from_label,
                to_label,
            } => vec![normalize_file_stem(&[&self.code, from_label, to_label])],
            ReportParams::MonthList { labels } => labels
                .iter()
                .map(|label| normalize_file_stem(&[&self.code, label]))
                .collect(),
        }
    }
}

/// 已保存的下载文件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadArtifact {
    /// 文件名（含扩展名）
    pub file_name: String,
    pub format: ReportFormat,
    pub path: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_format_has_a_menu_label() {
        assert_eq!(ReportFormat::Csv.menu_label(), "CSV (comma delimited)");
        assert_eq!(ReportFormat::Xlsx.menu_label(), "Excel");
        assert_eq!(ReportFormat::Txt.menu_label(), "TXT (Pipe delimited)");
        for format in ReportFormat::ALL {
            assert!(!format.menu_label().is_empty());
            assert_eq!(format.extension().parse::<ReportFormat>().unwrap(), format);
        }
    }

    #[test]
    fn unknown_format_is_rejected() {
        assert!(matches!(
            "html".parse::<ReportFormat>(),
            Err(ConfigError::UnknownFormat { .. })
        ));
    }

    #[test]
    fn date_range_stem() {
        let request = ReportRequest::date_range("PAY 28", "Practice, PAY 28", "05/01/2022", "02/24/2026");
        assert_eq!(request.file_stems(), vec!["PAY_28_05_01_2022_02_24_2026"]);
    }

    #[test]
    fn month_list_stems_are_per_month() {
        let labels = vec!["Jan 2024".to_string(), "Mar 2024".to_string()];
        let request = ReportRequest::month_list("CNT 4", "Practice, CNT 4", &labels);
        assert_eq!(request.file_stems(), vec!["CNT_4_Jan_2024", "CNT_4_Mar_2024"]);
    }
}
