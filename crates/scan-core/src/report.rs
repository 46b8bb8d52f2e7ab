//! 终端输出的扫描与回测报告。

use std::fmt::Write;

use crate::aggregator::{BacktestResult, ScanReport};

const RULE: &str = "======================================================================";
const THIN_RULE: &str = "----------------------------------------------------------------------";
/// 每个策略最多列出的股票数
const MAX_ROWS: usize = 20;
const DESC_CHARS: usize = 35;
const TOP_TRADES: usize = 5;

fn signed_pct(x: f64) -> String {
    if x > 0.0 {
        format!("+{:.2}%", x)
    } else if x < 0.0 {
        format!("{:.2}%", x)
    } else {
        "0.00%".to_string()
    }
}

fn banner(out: &mut String, title: &str) {
    let _ = writeln!(out, "\n{}", RULE);
    let _ = writeln!(out, "                    {}", title);
    let _ = writeln!(out, "{}\n", RULE);
}

pub fn format_scan_report(report: &ScanReport) -> String {
    let mut out = String::new();
    banner(&mut out, "📊 扫描结果汇总");

    let _ = writeln!(out, "  总计信号：{} 只股票\n", report.total_signals());
    for (strategy, rows) in &report.results {
        let status = if rows.is_empty() { "⚪" } else { "✅" };
        let _ = writeln!(out, "  {} {}: {} 只", status, strategy, rows.len());
    }
    let _ = writeln!(out, "\n{}\n", RULE);

    for (strategy, rows) in &report.results {
        let name = strategy.as_str().to_uppercase();
        if rows.is_empty() {
            let _ = writeln!(out, "⚪ {}: 无信号\n", name);
            continue;
        }

        let _ = writeln!(out, "🔥 {}（共 {} 只）", name, rows.len());
        let _ = writeln!(out, "{}", THIN_RULE);
        let _ = writeln!(
            out,
            "  {:<4} {:<8} {:<12} {:>8} {:>10}   信号说明",
            "序号", "代码", "名称", "价格", "涨幅"
        );
        let _ = writeln!(
            out,
            "  {} {} {} {} {}   {}",
            "-".repeat(4),
            "-".repeat(8),
            "-".repeat(12),
            "-".repeat(8),
            "-".repeat(10),
            "-".repeat(30)
        );

        for (idx, r) in rows.iter().take(MAX_ROWS).enumerate() {
            let desc: String = r.signal.description.chars().take(DESC_CHARS).collect();
            let _ = writeln!(
                out,
                "  {:<4} {:<8} {:<12} {:>8.2} {:>10}   {}",
                idx + 1,
                r.code,
                r.name,
                r.price,
                signed_pct(r.change_percent),
                desc
            );
        }
        if rows.len() > MAX_ROWS {
            let _ = writeln!(out, "\n  ... 还有 {} 只，详见数据库", rows.len() - MAX_ROWS);
        }
        let _ = writeln!(out);
    }
    out
}

pub fn format_backtest_report(result: &BacktestResult) -> String {
    let stats = &result.stats;
    let mut out = String::new();
    banner(&mut out, &format!("📊 {} 回测报告", result.strategy));

    let _ = writeln!(out, "  信号总数：{} 次", stats.total_signals);
    let _ = writeln!(out, "  盈利次数：{} 次", stats.win_count);
    let _ = writeln!(out, "  亏损次数：{} 次", stats.loss_count);
    let _ = writeln!(out, "  持有天数：{} 天\n", stats.holding_days);

    let _ = writeln!(out, "  📈 胜率：{:.2}%", stats.win_rate);
    let _ = writeln!(out, "  📊 平均收益：{:+.2}%", stats.avg_return);
    let _ = writeln!(out, "  💰 累计收益：{:+.2}%\n", stats.total_return);

    let _ = writeln!(out, "  单笔最大盈利：{:+.2}%", stats.max_return);
    let _ = writeln!(out, "  单笔最大亏损：{:+.2}%\n", stats.min_return);

    if !result.trades.is_empty() {
        let _ = writeln!(out, "  🏆 最佳交易 TOP {}:", TOP_TRADES);
        for (idx, t) in result.top_trades(TOP_TRADES).iter().enumerate() {
            let _ = writeln!(
                out,
                "    {}. {} | {}→{} | {:+.2}%",
                idx + 1,
                t.code,
                t.buy_date,
                t.sell_date,
                t.return_pct
            );
        }
    }
    let _ = writeln!(out, "\n{}", RULE);
    out
}

pub fn format_comparison(results: &[BacktestResult]) -> String {
    let mut out = String::new();
    banner(&mut out, "📊 策略对比汇总");

    let _ = writeln!(
        out,
        "  {:<20} {:>10} {:>12} {:>12} {:>10}",
        "策略", "胜率", "平均收益", "累计收益", "信号数"
    );
    let _ = writeln!(
        out,
        "  {} {} {} {} {}",
        "-".repeat(20),
        "-".repeat(10),
        "-".repeat(12),
        "-".repeat(12),
        "-".repeat(10)
    );
    for r in results {
        let s = &r.stats;
        let _ = writeln!(
            out,
            "  {:<20} {:>9.2}% {:>+11.2}% {:>+11.2}% {:>10}",
            r.strategy.as_str(),
            s.win_rate,
            s.avg_return,
            s.total_return,
            s.total_signals
        );
    }
    let _ = writeln!(out, "\n{}", RULE);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::StrategyId;
    use crate::types::{ResultRow, Signal, TradeRecord};
    use chrono::NaiveDate;

    fn row(i: usize) -> ResultRow {
        ResultRow {
            code: format!("{:06}", 600000 + i),
            name: "测试".to_string(),
            price: 10.0,
            change_percent: 1.5,
            signal: Signal::new("均线金叉", "一".repeat(50)),
        }
    }

    #[test]
    fn scan_report_caps_rows_and_descriptions() {
        let mut report = ScanReport::new(&[StrategyId::GoldenCross, StrategyId::MacdCross]);
        for i in 0..25 {
            report.push(StrategyId::GoldenCross, row(i));
        }
        let text = format_scan_report(&report);
        assert!(text.contains("总计信号：25 只股票"));
        assert!(text.contains("⚪ MACD_CROSS: 无信号"));
        assert!(text.contains("600019"));
        assert!(!text.contains("600020"));
        assert!(text.contains("还有 5 只"));
        assert!(text.contains(&"一".repeat(35)));
        assert!(!text.contains(&"一".repeat(36)));
        assert!(text.contains("+1.50%"));
    }

    #[test]
    fn backtest_report_lists_top_trades() {
        let d = NaiveDate::from_ymd_opt(2024, 4, 1).unwrap();
        let mut result = BacktestResult::new(StrategyId::RsiOversold);
        for (i, ret) in [1.0, -3.0, 7.5].into_iter().enumerate() {
            result.add_trade(TradeRecord {
                code: format!("00000{}", i),
                buy_date: d,
                buy_price: 10.0,
                sell_date: d,
                sell_price: 10.0,
                return_pct: ret,
            });
        }
        result.finalize(5);
        let text = format_backtest_report(&result);
        assert!(text.contains("rsi_oversold 回测报告"));
        assert!(text.contains("信号总数：3 次"));
        assert!(text.contains("1. 000002 | 2024-04-01→2024-04-01 | +7.50%"));
        assert!(text.contains("单笔最大亏损：-3.00%"));

        let table = format_comparison(&[result]);
        assert!(table.contains("rsi_oversold"));
        assert!(table.contains("66.67%"));
    }
}
