use chrono::NaiveDate;
use reqwest::blocking::Client;
use serde_json::{json, Value};
use std::time::Duration;

use crate::aggregator::ScanReport;
use crate::config::NotifyConfig;
use crate::errors::ScanResult;
use crate::scan_err;
use crate::source::Notifier;
use crate::types::ResultRow;

/// 钉钉机器人 Markdown 推送
pub struct DingTalkNotifier {
    config: NotifyConfig,
    client: Client,
}

impl DingTalkNotifier {
    pub fn new(config: NotifyConfig) -> ScanResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { config, client })
    }

    pub fn is_configured(&self) -> bool {
        self.webhook().is_some()
    }

    fn webhook(&self) -> Option<&str> {
        self.config
            .webhook_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
    }

    pub fn title(date: NaiveDate) -> String {
        format!("📈 A 股策略扫描结果 - {}", date.format("%Y-%m-%d"))
    }

    /// 渲染消息正文，只展示每个策略排在前面的股票
    pub fn build_message(&self, report: &ScanReport, date: NaiveDate) -> String {
        let only_rising = self.config.only_rising;
        let picked: Vec<(_, Vec<&ResultRow>)> = report
            .results
            .iter()
            .map(|(strategy, rows)| {
                let rows: Vec<&ResultRow> = rows
                    .iter()
                    .filter(|r| !only_rising || r.change_percent > 0.0)
                    .collect();
                (strategy, rows)
            })
            .filter(|(_, rows)| !rows.is_empty())
            .collect();

        let shown: usize = picked.iter().map(|(_, rows)| rows.len()).sum();
        let total = report.total_signals();

        let mut lines = vec![
            "## 📈 A 股策略扫描结果\n".to_string(),
            format!("**日期**: {}\n", date.format("%Y-%m-%d")),
            format!("**信号**: {}/{} 只强势股\n", shown, total),
        ];

        if shown == 0 {
            lines.push("> ⚠️ 今日无强势股信号".to_string());
            return lines.join("\n");
        }

        let top_n = self.config.top_n;
        for (strategy, rows) in picked {
            lines.push(format!("### {}（{}只）", strategy.label(), rows.len()));
            lines.push(String::new());
            lines.push("| 代码 | 名称 | 价格 | 涨幅 |".to_string());
            lines.push("|------|------|------|------|".to_string());
            for r in rows.iter().take(top_n) {
                let change = if r.change_percent > 0.0 {
                    format!("+{:.2}%", r.change_percent)
                } else {
                    format!("{:.2}%", r.change_percent)
                };
                lines.push(format!("| {} | {} | ¥{:.2} | {} |", r.code, r.name, r.price, change));
            }
            if rows.len() > top_n {
                lines.push(format!("\n> ...共{}只，详见数据库", rows.len()));
            }
            lines.push(String::new());
        }
        lines.join("\n")
    }

    pub fn payload(&self, report: &ScanReport, date: NaiveDate) -> Value {
        json!({
            "msgtype": "markdown",
            "markdown": {
                "title": Self::title(date),
                "text": self.build_message(report, date),
            },
            "at": { "isAtAll": true },
        })
    }
}

impl Notifier for DingTalkNotifier {
    fn notify(&self, report: &ScanReport, date: NaiveDate) -> ScanResult<()> {
        let url = self
            .webhook()
            .ok_or_else(|| scan_err!(Notify, "未配置钉钉 Webhook URL"))?;

        let response = self.client.post(url).json(&self.payload(report, date)).send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(scan_err!(Notify, "HTTP {}", status));
        }

        let body: Value = response.json()?;
        match body.get("errcode").and_then(Value::as_i64) {
            Some(0) => Ok(()),
            _ => Err(scan_err!(Notify, "钉钉返回错误: {}", body)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::StrategyId;
    use crate::types::Signal;

    fn row(code: &str, change: f64) -> ResultRow {
        ResultRow {
            code: code.to_string(),
            name: format!("股票{}", code),
            price: 12.5,
            change_percent: change,
            signal: Signal::new("均线金叉", ""),
        }
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 3).unwrap()
    }

    #[test]
    fn message_keeps_rising_rows_and_caps_per_strategy() {
        let notifier = DingTalkNotifier::new(NotifyConfig::default()).unwrap();
        let mut report = ScanReport::new(&[StrategyId::GoldenCross, StrategyId::MacdCross]);
        for i in 0..7 {
            report.push(StrategyId::GoldenCross, row(&format!("60000{}", i), 1.0 + i as f64));
        }
        report.push(StrategyId::MacdCross, row("000001", -1.2));

        let text = notifier.build_message(&report, date());
        assert!(text.contains("**信号**: 7/8 只强势股"));
        assert!(text.contains("🔺 均线金叉（7只）"));
        assert!(!text.contains("MACD"));
        assert!(text.contains("| 600000 | 股票600000 | ¥12.50 | +1.00% |"));
        assert!(!text.contains("600005"));
        assert!(text.contains("...共7只"));
    }

    #[test]
    fn message_without_rising_rows() {
        let notifier = DingTalkNotifier::new(NotifyConfig::default()).unwrap();
        let mut report = ScanReport::new(&[StrategyId::GoldenCross]);
        report.push(StrategyId::GoldenCross, row("600000", 0.0));
        let text = notifier.build_message(&report, date());
        assert!(text.contains("今日无强势股信号"));
    }

    #[test]
    fn missing_webhook_is_an_error() {
        let notifier = DingTalkNotifier::new(NotifyConfig::default()).unwrap();
        assert!(!notifier.is_configured());
        let report = ScanReport::default();
        assert!(notifier.notify(&report, date()).is_err());
    }

    #[test]
    fn payload_is_markdown() {
        let notifier = DingTalkNotifier::new(NotifyConfig::default()).unwrap();
        let payload = notifier.payload(&ScanReport::default(), date());
        assert_eq!(payload["msgtype"], "markdown");
        assert_eq!(payload["markdown"]["title"], "📈 A 股策略扫描结果 - 2024-06-03");
    }
}
