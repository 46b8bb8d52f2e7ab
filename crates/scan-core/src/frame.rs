//! polars 与行情结构之间的转换，以及 CSV / Feather 文件读写。

use chrono::NaiveDate;
use polars::prelude::*;
use std::fs::File;
use std::path::Path;

use crate::aggregator::BacktestResult;
use crate::errors::{ErrorContext, ScanError::Validation, ScanResult};
use crate::scan_err;
use crate::types::PriceBar;

pub const BAR_COLUMNS: [&str; 7] = ["date", "open", "close", "high", "low", "volume", "amount"];

pub fn validate_dataframe(df: &DataFrame) -> ScanResult<()> {
    for &col in &BAR_COLUMNS {
        if df.column(col).is_err() {
            return Err(Validation(format!("DataFrame 缺少必需列: {}", col)));
        }
    }
    if df.height() == 0 {
        return Err(Validation("DataFrame 为空".to_string()));
    }

    let total_nulls = BAR_COLUMNS
        .iter()
        .filter_map(|name| df.column(name).ok())
        .map(|c| c.null_count())
        .sum::<usize>();
    if total_nulls > 0 {
        return Err(Validation(format!("DataFrame 含有 {} 个空值", total_nulls)));
    }

    Ok(())
}

/// 支持 `2024-01-02`、`20240102` 以及带时间的写法
pub fn parse_date(s: &str) -> ScanResult<NaiveDate> {
    let s = s.trim();
    let day = s.split_whitespace().next().unwrap_or(s);
    match NaiveDate::parse_from_str(day, "%Y-%m-%d") {
        Ok(d) => Ok(d),
        Err(_) => Ok(NaiveDate::parse_from_str(day, "%Y%m%d")?),
    }
}

fn f64_column(df: &DataFrame, name: &str) -> ScanResult<Vec<f64>> {
    let column = df.column(name)?.cast(&DataType::Float64)?;
    column
        .f64()?
        .into_iter()
        .map(|v| v.ok_or_else(|| scan_err!(Validation, "{} 列存在无法转换的值", name)))
        .collect()
}

fn str_column(df: &DataFrame, name: &str) -> ScanResult<Vec<String>> {
    let column = df.column(name)?.cast(&DataType::String)?;
    column
        .str()?
        .into_iter()
        .map(|v| {
            v.map(str::to_string)
                .ok_or_else(|| scan_err!(Validation, "{} 列存在空值", name))
        })
        .collect()
}

/// 单只股票的 DataFrame 转换为按日期升序的 K 线
pub fn bars_from_frame(df: &DataFrame) -> ScanResult<Vec<PriceBar>> {
    validate_dataframe(df)?;

    let sorted = df
        .clone()
        .lazy()
        .sort(["date"], SortMultipleOptions::default())
        .collect()?;

    let dates = str_column(&sorted, "date")?
        .iter()
        .map(|s| parse_date(s))
        .collect::<ScanResult<Vec<_>>>()?;
    let open = f64_column(&sorted, "open")?;
    let close = f64_column(&sorted, "close")?;
    let high = f64_column(&sorted, "high")?;
    let low = f64_column(&sorted, "low")?;
    let volume = f64_column(&sorted, "volume")?;
    let amount = f64_column(&sorted, "amount")?;

    Ok((0..dates.len())
        .map(|i| PriceBar {
            date: dates[i],
            open: open[i],
            close: close[i],
            high: high[i],
            low: low[i],
            volume: volume[i],
            amount: amount[i],
        })
        .collect())
}

pub fn bars_to_frame(bars: &[PriceBar]) -> ScanResult<DataFrame> {
    let df = df![
        "date" => bars.iter().map(|b| b.date.format("%Y-%m-%d").to_string()).collect::<Vec<_>>(),
        "open" => bars.iter().map(|b| b.open).collect::<Vec<_>>(),
        "close" => bars.iter().map(|b| b.close).collect::<Vec<_>>(),
        "high" => bars.iter().map(|b| b.high).collect::<Vec<_>>(),
        "low" => bars.iter().map(|b| b.low).collect::<Vec<_>>(),
        "volume" => bars.iter().map(|b| b.volume).collect::<Vec<_>>(),
        "amount" => bars.iter().map(|b| b.amount).collect::<Vec<_>>(),
    ]?;
    Ok(df)
}

/// 按扩展名读取 `.csv` 或 `.feather` / `.ipc` 文件。
///
/// `all_str` 为 true 时 CSV 不做类型推断，所有列按字符串读取，
/// 用于保留股票代码的前导零。
pub fn read_frame(path: &Path, all_str: bool) -> ScanResult<DataFrame> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    let label = path.display().to_string();

    let df = match ext.as_str() {
        "csv" => {
            let mut options = CsvReadOptions::default().with_has_header(true);
            if all_str {
                options = options.with_infer_schema_length(Some(0));
            }
            options
                .try_into_reader_with_file_path(Some(path.to_path_buf()))
                .context(&label)?
                .finish()
                .context(&label)?
        }
        "feather" | "ipc" | "arrow" => {
            let file = File::open(path).context(&label)?;
            IpcReader::new(file).finish().context(&label)?
        }
        other => return Err(scan_err!(Validation, "不支持的文件类型 {}: {}", other, label)),
    };
    Ok(df)
}

/// 把回测交易记录展开为一张表，每行带上策略名
pub fn trades_to_frame<'a, I>(results: I) -> ScanResult<DataFrame>
where
    I: IntoIterator<Item = &'a BacktestResult>,
{
    let mut strategy = Vec::new();
    let mut code = Vec::new();
    let mut buy_date = Vec::new();
    let mut buy_price = Vec::new();
    let mut sell_date = Vec::new();
    let mut sell_price = Vec::new();
    let mut return_pct = Vec::new();

    for result in results {
        for t in &result.trades {
            strategy.push(result.strategy.as_str().to_string());
            code.push(t.code.clone());
            buy_date.push(t.buy_date.format("%Y-%m-%d").to_string());
            buy_price.push(t.buy_price);
            sell_date.push(t.sell_date.format("%Y-%m-%d").to_string());
            sell_price.push(t.sell_price);
            return_pct.push(t.return_pct);
        }
    }

    let df = df![
        "strategy" => strategy,
        "code" => code,
        "buy_date" => buy_date,
        "buy_price" => buy_price,
        "sell_date" => sell_date,
        "sell_price" => sell_price,
        "return_pct" => return_pct,
    ]?;
    Ok(df)
}

pub fn write_csv(df: &mut DataFrame, path: &Path) -> ScanResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = File::create(path).context(&path.display().to_string())?;
    CsvWriter::new(&mut file).include_header(true).finish(df)?;
    Ok(())
}

/// 导出全部策略的交易明细，返回写出的行数
pub fn write_trades_csv(results: &[BacktestResult], path: &Path) -> ScanResult<usize> {
    let mut df = trades_to_frame(results)?;
    write_csv(&mut df, path)?;
    Ok(df.height())
}
