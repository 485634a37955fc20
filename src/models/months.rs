//! 报表日期参数工具：月份枚举与输出文件名规范化

use chrono::{Datelike, NaiveDate};

use crate::error::{AppResult, ConfigError};

/// 门户日期输入格式（MM/DD/YYYY）
pub const PORTAL_DATE_FORMAT: &str = "%m/%d/%Y";

/// 月份标签格式，例如 "August 2024"
pub const MONTH_LABEL_FORMAT: &str = "%B %Y";

/// 解析门户格式日期
pub fn parse_portal_date(value: &str) -> AppResult<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), PORTAL_DATE_FORMAT).map_err(|_| {
        ConfigError::InvalidDate {
            value: value.to_string(),
            expected: "MM/DD/YYYY".to_string(),
        }
        .into()
    })
}

/// 解析月份标签（"May 2022"）为该月第一天
pub fn parse_month_label(label: &str) -> AppResult<NaiveDate> {
    NaiveDate::parse_from_str(&format!("1 {}", label.trim()), "%d %B %Y").map_err(|_| {
        ConfigError::InvalidDate {
            value: label.to_string(),
            expected: "<Month> YYYY".to_string(),
        }
        .into()
    })
}

pub fn month_label(date: NaiveDate) -> String {
    date.format(MONTH_LABEL_FORMAT).to_string()
}

/// 列出两个日期之间（含首尾）的所有月份标签，升序
///
/// 参数顺序无关：from 晚于 to 时会自动交换。
pub fn months_between(from: &str, to: &str) -> AppResult<Vec<String>> {
    let mut start = parse_portal_date(from)?;
    let mut end = parse_portal_date(to)?;
    if start > end {
        std::mem::swap(&mut start, &mut end);
    }

    let mut months = Vec::new();
    let (mut year, mut month) = (start.year(), start.month());
    while (year, month) <= (end.year(), end.month()) {
        if let Some(first) = NaiveDate::from_ymd_opt(year, month, 1) {
            months.push(month_label(first));
        }
        if month == 12 {
            year += 1;
            month = 1;
        } else {
            month += 1;
        }
    }
    Ok(months)
}

/// 由报表代码和参数拼出输出文件名（不含扩展名），空格和斜杠替换为下划线
pub fn normalize_file_stem(parts: &[&str]) -> String {
    parts.join("_").replace([' ', '/'], "_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn month_range_spans_both_ends() {
        let months = months_between("05/01/2022", "02/24/2026").unwrap();
        assert_eq!(months.first().map(String::as_str), Some("May 2022"));
        assert_eq!(months.last().map(String::as_str), Some("February 2026"));
        assert_eq!(months.len(), 46);
        assert_eq!(months[7], "December 2022");
        assert_eq!(months[8], "January 2023");
    }

    #[test]
    fn month_range_is_order_independent() {
        let forward = months_between("05/01/2022", "02/24/2026").unwrap();
        let backward = months_between("02/24/2026", "05/01/2022").unwrap();
        assert_eq!(forward, backward);
    }

    #[test]
    fn single_day_yields_single_month() {
        assert_eq!(months_between("1/1/2026", "1/16/2026").unwrap(), vec!["January 2026"]);
    }

    #[test]
    fn rejects_malformed_dates() {
        assert!(months_between("2022-05-01", "02/24/2026").unwrap_err().is_config());
    }

    #[test]
    fn month_labels_parse() {
        let date = parse_month_label("August 2024").unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2024, 8, 1).unwrap());
        assert!(parse_month_label("BAD").is_err());
    }

    #[test]
    fn file_stem_replaces_spaces_and_slashes() {
        assert_eq!(
            normalize_file_stem(&["PAY 28", "05/01/2022", "02/24/2026"]),
            "PAY_28_05_01_2022_02_24_2026"
        );
        assert_eq!(normalize_file_stem(&["CNT 4", "August 2024"]), "CNT_4_August_2024");
    }
}
